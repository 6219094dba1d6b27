// crates/backend-lib/src/middleware/mod.rs

//! Request admission: rate limiting and authentication checks.

pub mod gate;
pub mod rate_limit;

pub use gate::{bearer_token, RequestGate};
pub use rate_limit::{client_key, Bucket, ClientAddr, RateLimiter};
