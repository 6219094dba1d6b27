// ============================
// crates/backend-lib/src/handlers/mod.rs
// ============================
//! HTTP handlers for the JSON API.

pub mod api;

pub use api::{authenticate, get_vplan, health, logout};
