//! HTTP API handlers for repscore

pub mod error;
pub mod health;
pub mod reports;
pub mod scores;

pub use error::{ApiError, ApiResult};
pub use health::health_routes;
pub use reports::report_routes;
pub use scores::score_routes;
