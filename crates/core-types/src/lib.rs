//! # CF Tracker Core Types
//!
//! The shared vocabulary of the workspace: the scalar values that travel in and out of
//! SQL statements, the rows and report results built from them, the query-log records,
//! and the domain enums of the crowdfunding schema.
//!
//! This crate has no knowledge of the database driver. It is the Layer 0 crate every
//! other crate depends on.

pub mod enums;
pub mod error;
pub mod query_log;
pub mod row;
pub mod value;

// Re-export the core types to provide a clean public API.
pub use enums::{CampaignStatus, DonationStatus, PaymentMethod, QueryKind, UserRole};
pub use error::CoreError;
pub use query_log::{QueryLogEntry, QueryLogRecord};
pub use row::{ReportResult, Row};
pub use value::SqlValue;
