// ==========================
// tests/unit/config_tests.rs
// ==========================
//! Settings as the server sees them, plus provider construction.
use vplan_backend_lib::{
    auth::{build_provider, hash_password_with_params},
    config::{ProviderKind, Settings, UserEntry},
    storage::SqliteStorage,
    AppState,
};
use std::sync::Arc;

#[test]
fn test_default_settings_use_debug_provider() {
    let settings = Settings::default();
    assert!(settings.validate().is_ok());
    let provider = build_provider(&settings.auth).unwrap();
    assert_eq!(provider.name(), "debug");
}

#[test]
fn test_credentials_provider_without_users_is_rejected() {
    let mut settings = Settings::default();
    settings.auth.provider = ProviderKind::Credentials;
    assert!(settings.validate().is_err());

    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    assert!(AppState::new(storage, settings).is_err());
}

#[tokio::test]
async fn test_credentials_provider_from_settings() {
    let mut settings = Settings::default();
    settings.auth.provider = ProviderKind::Credentials;
    settings.auth.users = vec![UserEntry {
        username: "mueller".to_string(),
        password_hash: hash_password_with_params("geheim", 4, 8, 1).unwrap(),
        groups: vec!["staff".to_string()],
        display_name: Some("Frau Müller".to_string()),
    }];
    assert!(settings.validate().is_ok());

    let provider = build_provider(&settings.auth).unwrap();
    assert_eq!(provider.name(), "credentials");

    let auth = provider.authenticate("mueller", "staff", "geheim").await.unwrap();
    assert_eq!(auth.ctx["display_name"], "Frau Müller");
    assert!(provider.authenticate("mueller", "students", "geheim").await.is_err());
    assert!(provider.authenticate("mueller", "", "falsch").await.is_err());
}
