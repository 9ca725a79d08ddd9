use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use database::{ConstraintKind, DbError, QueryErrorKind};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// A message safe to show for a constraint violation. The server's own diagnostic is
/// only used to tell which column or constraint was hit.
pub fn constraint_message(kind: &ConstraintKind, diagnostic: &str) -> String {
    match kind {
        ConstraintKind::Unique if diagnostic.contains("username") || diagnostic.contains("email") => {
            "UNIQUE constraint violation: Username or email already exists!".to_string()
        }
        ConstraintKind::Unique if diagnostic.contains("category_name") || diagnostic.contains("uq_categories") => {
            "A category with this name already exists".to_string()
        }
        ConstraintKind::Unique => "A record with the same unique value already exists".to_string(),
        ConstraintKind::Check(Some(name)) => match name.as_str() {
            "chk_account_balance" => "Account balance must be >= 0".to_string(),
            "chk_user_role" => "Invalid user role".to_string(),
            "chk_goal_amount" => "Goal amount must be greater than 0".to_string(),
            "chk_campaign_dates" => "End date must not be before the start date".to_string(),
            "chk_campaign_status" => "Invalid campaign status".to_string(),
            "chk_donation_amount" => "Donation amount must be greater than 0".to_string(),
            "chk_payment_method" => "Invalid payment method".to_string(),
            other => format!("Value violates constraint {other}"),
        },
        ConstraintKind::Check(None) => "A value is outside its allowed range".to_string(),
        ConstraintKind::ForeignKey => {
            "The referenced record does not exist or is still in use".to_string()
        }
        ConstraintKind::NotNull => "A required field is missing".to_string(),
    }
}

impl AppError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message.clone()),
            AppError::Database(err) => match err {
                DbError::InvalidParameter { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
                DbError::UnknownReport(_) | DbError::NotFound(_) => {
                    (StatusCode::NOT_FOUND, err.to_string())
                }
                DbError::Rejected(reason) => (StatusCode::UNPROCESSABLE_ENTITY, reason.clone()),
                DbError::Query(query_err) => match query_err.kind() {
                    QueryErrorKind::Constraint(kind) => (
                        StatusCode::CONFLICT,
                        constraint_message(kind, &query_err.diagnostic()),
                    ),
                    QueryErrorKind::Timeout => (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "The database did not answer in time".to_string(),
                    ),
                    QueryErrorKind::Connection => (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "The database is unavailable".to_string(),
                    ),
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "An internal database error occurred".to_string(),
                    ),
                },
                DbError::Connection(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "The database is unavailable".to_string(),
                ),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal database error occurred".to_string(),
                ),
            },
        }
    }
}

/// Converts `AppError` into the API's error envelope. Read endpoints get an empty data set
/// alongside the message.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            tracing::error!(error = ?self, "Request failed.");
        } else {
            tracing::debug!(error = %self, %status, "Request rejected.");
        }

        let body = Json(json!({ "status": "error", "message": message, "data": [] }));
        (status, body).into_response()
    }
}
