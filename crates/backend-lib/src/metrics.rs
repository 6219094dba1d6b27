// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const AUTH_SUCCESS: &str = "auth.success";
pub const AUTH_FAILURE: &str = "auth.failure";
pub const TOKEN_ISSUED: &str = "token.issued";
pub const SESSION_CREATED: &str = "session.created";
pub const RATE_LIMITED: &str = "rate_limit.rejected";
