pub mod decimal;
pub mod error;

pub use error::{ApiError, ApiResult};
