//! HTTP middleware: per-IP rate limiting and request logging.

pub mod logging;
pub mod rate_limit;

pub use logging::request_logging;
pub use rate_limit::{rate_limit_middleware, IpRateLimiter};
