// ============================
// vplan-backend-lib/src/auth/mod.rs
// ============================
//! Authentication: providers, API tokens and cookie sessions.

mod credentials;
mod debug;
pub mod password;
mod provider;
pub mod session;
pub mod token;
pub mod token_generator;

pub use credentials::CredentialsProvider;
pub use debug::{DebugAuthProvider, DEBUG_PASSWORD, DEBUG_USERNAME};
pub use password::{hash_password, hash_password_with_params, verify_password};
pub use provider::{build_provider, AuthProvider, AuthResponse};
pub use session::{clear_session_cookie, parse_cookie, Session, SessionManager, SESSION_COOKIE};
pub use token::TokenIssuer;
pub use token_generator::generate_secure_token;
