pub mod middleware;
pub mod rate_limit;

pub use rate_limit::{client_key, RateDecision, RateLimiter};
