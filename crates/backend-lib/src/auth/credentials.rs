// =============
// crates/backend-lib/src/auth/credentials.rs
// =============
//! Auth provider backed by accounts declared in the configuration.
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use serde_json::json;

use super::password::verify_password;
use super::provider::{sha256_hex, AuthProvider, AuthResponse};
use crate::config::UserEntry;
use crate::error::AppError;

/// Accounts keyed by username, each with an scrypt hash and groups.
///
/// The identity is derived from the username alone, so it survives
/// password changes. A non-empty `group` must be one of the account's
/// groups.
pub struct CredentialsProvider {
    users: Arc<HashMap<String, UserEntry>>,
    /// Hash verified for unknown usernames so they cost the same as known ones
    timing_hash: String,
}

impl CredentialsProvider {
    pub fn new(entries: Vec<UserEntry>) -> anyhow::Result<Self> {
        let Some(first) = entries.first() else {
            bail!("no users configured");
        };
        let timing_hash = first.password_hash.clone();

        let mut users = HashMap::with_capacity(entries.len());
        for entry in entries {
            if entry.username.is_empty() {
                bail!("configured user with an empty username");
            }
            if users.contains_key(&entry.username) {
                bail!("user {} is configured twice", entry.username);
            }
            users.insert(entry.username.clone(), entry);
        }

        Ok(Self {
            users: Arc::new(users),
            timing_hash,
        })
    }
}

#[async_trait]
impl AuthProvider for CredentialsProvider {
    fn name(&self) -> &'static str {
        "credentials"
    }

    async fn authenticate(
        &self,
        username: &str,
        group: &str,
        password: &str,
    ) -> Result<AuthResponse, AppError> {
        let users = Arc::clone(&self.users);
        let timing_hash = self.timing_hash.clone();
        let (username, group, password) =
            (username.to_string(), group.to_string(), password.to_string());

        // scrypt runs on the blocking pool
        let matched = tokio::task::spawn_blocking(move || match users.get(&username) {
            Some(user) => {
                let ok = verify_password(&user.password_hash, &password)
                    && (group.is_empty() || user.groups.iter().any(|g| *g == group));
                ok.then(|| user.clone())
            },
            None => {
                let _ = verify_password(&timing_hash, &password);
                None
            },
        })
        .await
        .map_err(|_| AppError::Unauthorized)?;

        let user = matched.ok_or(AppError::Unauthorized)?;
        Ok(AuthResponse {
            ident: sha256_hex(&["user:", &user.username]),
            ctx: json!({
                "display_name": user.display_name.as_deref().unwrap_or(&user.username),
                "groups": user.groups,
            }),
        })
    }
}
