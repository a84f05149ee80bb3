pub mod discovery;
pub mod domains;
pub mod search;

use serde::Deserialize;
use utoipa::IntoParams;

use crate::services::{DomainError, SessionError};
use crate::utils::ApiError;

/// Shared pagination query parameters: page >= 0, 1 <= size <= 100.
#[derive(Debug, Deserialize, IntoParams)]
pub struct PaginationParams {
    #[serde(default)]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub size: i64,
}

fn default_page_size() -> i64 {
    20
}

impl PaginationParams {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.page < 0 {
            return Err(ApiError::validation_error("page must be >= 0"));
        }
        if !(1..=100).contains(&self.size) {
            return Err(ApiError::validation_error("size must be between 1 and 100"));
        }
        Ok(())
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound(msg) => ApiError::not_found(msg),
            SessionError::InvalidState(msg) => ApiError::conflict(msg),
            SessionError::Database(e) => ApiError::Database(e),
            SessionError::Serialization(e) => {
                ApiError::internal_error(format!("serialization error: {}", e))
            },
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidUrl(msg) => ApiError::validation_error(msg),
            DomainError::NotFound(msg) => ApiError::not_found(msg),
            DomainError::Database(e) => ApiError::Database(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_bounds_are_enforced() {
        assert!(PaginationParams { page: 0, size: 20 }.validate().is_ok());
        assert!(PaginationParams { page: 3, size: 100 }.validate().is_ok());
        assert!(PaginationParams { page: -1, size: 20 }.validate().is_err());
        assert!(PaginationParams { page: 0, size: 0 }.validate().is_err());
        assert!(PaginationParams { page: 0, size: 101 }.validate().is_err());
    }
}
