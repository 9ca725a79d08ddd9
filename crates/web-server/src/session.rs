use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;

pub const SESSION_HEADER: &str = "x-session-id";

// Width of `Query_Log.user_session`.
const MAX_SESSION_LEN: usize = 128;

/// The caller's session id, taken from the `x-session-id` header or freshly generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session(pub String);

impl Session {
    pub fn from_header(value: Option<&str>) -> Self {
        let id = value
            .map(str::trim)
            .filter(|id| !id.is_empty() && id.len() <= MAX_SESSION_LEN)
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Session(id)
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Session {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok());
        Ok(Session::from_header(header))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_value_is_kept() {
        assert_eq!(Session::from_header(Some(" abc-123 ")).id(), "abc-123");
    }

    #[test]
    fn missing_or_oversized_header_gets_a_fresh_id() {
        let generated = Session::from_header(None);
        assert!(uuid::Uuid::parse_str(generated.id()).is_ok());

        let long = "x".repeat(MAX_SESSION_LEN + 1);
        assert_ne!(Session::from_header(Some(&long)).id(), long);
        assert_ne!(Session::from_header(Some("  ")).id(), "");
    }
}
