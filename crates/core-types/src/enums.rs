use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declares a closed set of string-valued states that map one-to-one onto the values a
/// `VARCHAR` column's named `CHECK ... IN (...)` constraint admits.
macro_rules! schema_enum {
    ($(#[$meta:meta])* $name:ident, $label:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// All variants, in schema order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The literal stored in the database column.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($text => Ok($name::$variant),)+
                    other => Err(CoreError::InvalidInput($label.to_string(), other.to_string())),
                }
            }
        }
    };
}

schema_enum!(
    /// The role column of `Users`.
    UserRole, "user_role" {
        Donor => "donor",
        Campaigner => "campaigner",
        Admin => "admin",
    }
);

schema_enum!(
    /// Lifecycle of a campaign. Only `Active` campaigns accept donations.
    CampaignStatus, "campaign status" {
        Draft => "draft",
        Active => "active",
        Completed => "completed",
        Cancelled => "cancelled",
    }
);

schema_enum!(
    DonationStatus, "donation status" {
        Pending => "pending",
        Completed => "completed",
        Failed => "failed",
        Refunded => "refunded",
    }
);

schema_enum!(
    PaymentMethod, "payment_method" {
        CreditCard => "credit_card",
        Paypal => "paypal",
        BankTransfer => "bank_transfer",
        Crypto => "crypto",
    }
);

impl CampaignStatus {
    pub fn accepts_donations(&self) -> bool {
        matches!(self, CampaignStatus::Active)
    }
}

/// The statement type recorded in the query log.
///
/// Anything that is not one of the well-known verbs keeps its upper-cased leading token,
/// so a CTE is logged as `WITH` unless the caller tags it explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
    Call,
    Show,
    Other(String),
}

impl QueryKind {
    /// Infers the kind from the first whitespace-delimited token of the trimmed text.
    pub fn infer(sql: &str) -> Self {
        let token = sql.trim().split_whitespace().next().unwrap_or_default();
        Self::from_token(token)
    }

    /// Builds a kind from a single keyword, case-insensitively.
    pub fn from_token(token: &str) -> Self {
        let upper = token.to_ascii_uppercase();
        match upper.as_str() {
            "SELECT" => QueryKind::Select,
            "INSERT" => QueryKind::Insert,
            "UPDATE" => QueryKind::Update,
            "DELETE" => QueryKind::Delete,
            "CALL" => QueryKind::Call,
            "SHOW" => QueryKind::Show,
            _ => QueryKind::Other(upper),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            QueryKind::Select => "SELECT",
            QueryKind::Insert => "INSERT",
            QueryKind::Update => "UPDATE",
            QueryKind::Delete => "DELETE",
            QueryKind::Call => "CALL",
            QueryKind::Show => "SHOW",
            QueryKind::Other(token) => token,
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
