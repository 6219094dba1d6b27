// ============================
// crates/backend-lib/src/auth/token_generator.rs
// ============================
//! Random secrets for API tokens and session cookie ids.
//!
//! Both are handed to clients as-is and looked up verbatim, so they only
//! need to be unguessable and safe to place in a header or cookie.
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;

/// Entropy behind every token and session id
const SECRET_BYTES: usize = 32;

/// Length of a secret produced by [`generate_secure_token`]
pub const TOKEN_LEN: usize = 43;

/// Fresh secret of [`TOKEN_LEN`] URL-safe base64 characters
pub fn generate_secure_token() -> String {
    encode_random(SECRET_BYTES)
}

fn encode_random(len: usize) -> String {
    let mut raw = vec![0u8; len];
    rand::rng().fill_bytes(&mut raw);
    URL_SAFE_NO_PAD.encode(raw)
}
