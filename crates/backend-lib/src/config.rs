// ============================
// vplan-backend-lib/src/config.rs
// ============================
//! Configuration management.
//!
//! Settings are layered: built-in defaults, then a TOML file, then
//! `VPLAN_`-prefixed environment variables (`__` separates sections,
//! e.g. `VPLAN_SERVER__BIND_ADDR`).
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Config file read when no explicit path is given
pub const DEFAULT_CONFIG_FILE: &str = "vplan.toml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "VPLAN_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    /// Fallback log filter when `RUST_LOG` is unset
    pub log_level: String,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub tokens: TokenSettings,
    pub sessions: SessionSettings,
    pub rate_limit: RateLimitSettings,
    pub web: WebSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_addr: SocketAddr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// SQLite file, `:memory:` for a throwaway database
    pub path: PathBuf,
}

/// Which [`crate::auth::AuthProvider`] backs logins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Fixed `test`/`passwd` credential, development only
    Debug,
    /// Users declared under `auth.users`
    Credentials,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub provider: ProviderKind,
    pub users: Vec<UserEntry>,
}

/// One configured account for the credentials provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserEntry {
    pub username: String,
    /// scrypt hash in PHC string format
    pub password_hash: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenSettings {
    /// Lifetime of an API token
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Cookie max-age for `session = 1`
    pub default_max_age_secs: u64,
    /// Cookie max-age for `session > 1` ("remember me")
    pub remember_max_age_secs: u64,
    /// Add the `Secure` attribute to the session cookie
    pub secure_cookie: bool,
}

/// Budget of one rate limit bucket
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BucketLimit {
    pub window_secs: u64,
    pub max_requests: u32,
}

impl BucketLimit {
    pub const fn new(window_secs: u64, max_requests: u32) -> Self {
        Self {
            window_secs,
            max_requests,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub authenticate: BucketLimit,
    pub logout: BucketLimit,
    pub get_vplan: BucketLimit,
    /// Key clients by `X-Forwarded-For` / `X-Real-IP` instead of the TCP
    /// peer. Only enable behind a reverse proxy that overwrites them.
    pub trust_proxy_headers: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSettings {
    /// Directory with the frontend, served for every non-API path
    pub static_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            log_level: "info".to_string(),
            database: DatabaseSettings::default(),
            auth: AuthSettings::default(),
            tokens: TokenSettings::default(),
            sessions: SessionSettings::default(),
            rate_limit: RateLimitSettings::default(),
            web: WebSettings::default(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("vplan.db"),
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Debug,
            users: Vec::new(),
        }
    }
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 60 * 60 * 24 * 30, // 30 days
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_max_age_secs: 60 * 60 * 24,       // 1 day
            remember_max_age_secs: 60 * 60 * 24 * 30, // 30 days
            secure_cookie: false,
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            authenticate: BucketLimit::new(60, 5),
            logout: BucketLimit::new(60, 5),
            get_vplan: BucketLimit::new(60, 60),
            trust_proxy_headers: false,
        }
    }
}

impl Settings {
    /// Load settings from defaults, the config file and the environment.
    ///
    /// With `path == None` the file is `vplan.toml` in the working
    /// directory and may be absent. An explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => {
                if !p.exists() {
                    bail!("config file {} does not exist", p.display());
                }
                p.to_path_buf()
            },
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            bail!("invalid log level: {}", self.log_level);
        }
        if self.tokens.ttl_secs == 0 {
            bail!("tokens.ttl_secs must be greater than zero");
        }
        if self.sessions.default_max_age_secs == 0 || self.sessions.remember_max_age_secs == 0 {
            bail!("session max-age values must be greater than zero");
        }
        for (name, limit) in [
            ("authenticate", &self.rate_limit.authenticate),
            ("logout", &self.rate_limit.logout),
            ("getVPlan", &self.rate_limit.get_vplan),
        ] {
            if limit.window_secs == 0 || limit.max_requests == 0 {
                bail!("rate limit bucket {name} needs a non-zero window and budget");
            }
        }
        if self.auth.provider == ProviderKind::Credentials && self.auth.users.is_empty() {
            bail!("the credentials provider needs at least one entry in auth.users");
        }
        Ok(())
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.tokens.ttl_secs)
    }
}
