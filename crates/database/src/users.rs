//! User accounts. Every change is written together with its `User_Audit_Log` row in one
//! transaction.

use crate::builder::UpdateBuilder;
use crate::error::DbError;
use crate::executor::{RequestContext, TransactionContext};
use crate::statement::Statement;
use argon2::{
    Argon2,
    password_hash::{PasswordHasher, SaltString},
};
use chrono::NaiveDateTime;
use core_types::{Row, UserRole};
use rand_core::OsRng;
use rust_decimal::Decimal;
use serde::Serialize;

/// Columns an update may touch. `username` and `password_hash` are fixed after creation.
pub const UPDATABLE_COLUMNS: &[&str] = &[
    "full_name",
    "email",
    "user_role",
    "account_balance",
    "is_active",
];

const USER_COLUMNS: &str = "user_id, username, email, full_name, user_role, account_balance, \
                            is_active, created_at";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub user_id: u64,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
    pub account_balance: Decimal,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

impl User {
    pub fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            user_id: row.u64("user_id")?,
            username: row.text("username")?.to_string(),
            email: row.text("email")?.to_string(),
            full_name: row.text("full_name")?.to_string(),
            role: row.text("user_role")?.parse()?,
            account_balance: row.decimal_or_zero("account_balance")?,
            is_active: row.i64("is_active")? != 0,
            created_at: row.datetime("created_at")?,
        })
    }

    /// The audited fields, as stored in `old_values` / `new_values`.
    fn snapshot(&self) -> String {
        serde_json::json!({
            "full_name": self.full_name,
            "email": self.email,
            "user_role": self.role,
            "account_balance": self.account_balance,
            "is_active": self.is_active,
        })
        .to_string()
    }
}

/// Input for [`create_user`]. The plain-text password is hashed before it leaves the
/// process.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub role: UserRole,
    pub account_balance: Decimal,
}

impl NewUser {
    fn validate(&self) -> Result<(), DbError> {
        if self.username.trim().is_empty() {
            return Err(DbError::invalid("username", "must not be empty"));
        }
        if !self.email.contains('@') {
            return Err(DbError::invalid("email", "must be an email address"));
        }
        if self.password.is_empty() {
            return Err(DbError::invalid("password", "must not be empty"));
        }
        if self.full_name.trim().is_empty() {
            return Err(DbError::invalid("full_name", "must not be empty"));
        }
        Ok(())
    }
}

/// A partial update. `None` leaves the column unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<UserRole>,
    pub account_balance: Option<Decimal>,
    pub is_active: Option<bool>,
}

impl UserChanges {
    fn builder(&self) -> Result<UpdateBuilder, DbError> {
        UpdateBuilder::new("Users", UPDATABLE_COLUMNS)
            .set_opt("full_name", self.full_name.clone())?
            .set_opt("email", self.email.clone())?
            .set_opt("user_role", self.role.map(|r| r.as_str()))?
            .set_opt("account_balance", self.account_balance)?
            .set_opt("is_active", self.is_active)
    }
}

pub fn hash_password(password: &str) -> Result<String, DbError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| DbError::PasswordHash(e.to_string()))
}

fn audit(user_id: u64, action: &str, old: Option<String>, new: Option<String>) -> Statement {
    Statement::new(
        "INSERT INTO User_Audit_Log (user_id, action_type, old_values, new_values) \
         VALUES (:user_id, :action, :old_values, :new_values)",
    )
    .bind("user_id", user_id)
    .bind("action", action)
    .bind("old_values", old)
    .bind("new_values", new)
}

async fn lock_user(tx: &mut TransactionContext<'_>, user_id: u64) -> Result<User, DbError> {
    let stmt = Statement::new(format!(
        "SELECT {USER_COLUMNS} FROM Users WHERE user_id = :user_id FOR UPDATE"
    ))
    .bind("user_id", user_id);
    let row = tx
        .fetch_optional(&stmt)
        .await?
        .ok_or(DbError::NotFound("user"))?;
    User::from_row(&row)
}

pub async fn get_user(ctx: &RequestContext, user_id: u64) -> Result<User, DbError> {
    let stmt = Statement::new(format!("SELECT {USER_COLUMNS} FROM Users WHERE user_id = :user_id"))
        .bind("user_id", user_id);
    let row = ctx
        .fetch_optional(&stmt)
        .await?
        .ok_or(DbError::NotFound("user"))?;
    User::from_row(&row)
}

/// Creates an account and returns its id.
pub async fn create_user(ctx: &RequestContext, user: &NewUser) -> Result<u64, DbError> {
    user.validate()?;
    let password_hash = hash_password(&user.password)?;

    let mut tx = ctx.begin().await?;
    let inserted = tx
        .fetch(
            &Statement::new(
                "INSERT INTO Users \
                 (username, email, password_hash, full_name, user_role, account_balance) \
                 VALUES (:username, :email, :password_hash, :full_name, :user_role, :account_balance)",
            )
            .bind("username", user.username.trim())
            .bind("email", user.email.trim())
            .bind("password_hash", password_hash)
            .bind("full_name", user.full_name.trim())
            .bind("user_role", user.role.as_str())
            .bind("account_balance", user.account_balance),
        )
        .await?;
    let user_id = inserted
        .last_insert_id
        .ok_or(DbError::NotFound("inserted user id"))?;

    let created = lock_user(&mut tx, user_id).await?;
    tx.fetch(&audit(user_id, "INSERT", None, Some(created.snapshot())))
        .await?;
    tx.commit().await?;

    tracing::info!(user_id, username = %created.username, "Created user");
    Ok(user_id)
}

/// Applies a partial update and records the before/after snapshot.
pub async fn update_user(
    ctx: &RequestContext,
    user_id: u64,
    changes: &UserChanges,
) -> Result<User, DbError> {
    let stmt = changes.builder()?.build("user_id", user_id)?;

    let mut tx = ctx.begin().await?;
    let before = lock_user(&mut tx, user_id).await?;
    tx.fetch(&stmt).await?;
    let after = lock_user(&mut tx, user_id).await?;
    tx.fetch(&audit(
        user_id,
        "UPDATE",
        Some(before.snapshot()),
        Some(after.snapshot()),
    ))
    .await?;
    tx.commit().await?;

    tracing::info!(user_id, "Updated user");
    Ok(after)
}

pub async fn delete_user(ctx: &RequestContext, user_id: u64) -> Result<(), DbError> {
    let mut tx = ctx.begin().await?;
    let before = lock_user(&mut tx, user_id).await?;
    tx.fetch(&audit(user_id, "DELETE", Some(before.snapshot()), None))
        .await?;
    tx.fetch(&Statement::new("DELETE FROM Users WHERE user_id = :user_id").bind("user_id", user_id))
        .await?;
    tx.commit().await?;

    tracing::info!(user_id, "Deleted user");
    Ok(())
}
