// =========================
// tests/unit/token_tests.rs
// =========================
//! `TokenIssuer` against a real SQLite file.
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;
use vplan_backend_lib::{
    auth::{token_generator::TOKEN_LEN, TokenIssuer},
    storage::{SqliteStorage, Storage},
};

fn issuer(temp_dir: &TempDir) -> TokenIssuer {
    let storage = SqliteStorage::open(temp_dir.path().join("tokens.db")).unwrap();
    TokenIssuer::new(Arc::new(storage), Duration::from_secs(3600))
}

#[tokio::test]
async fn test_issued_token_validates_to_ident() {
    let temp_dir = TempDir::new().unwrap();
    let tokens = issuer(&temp_dir);

    let (token, expire) = tokens.issue_or_renew("ident-a").await.unwrap();
    assert_eq!(token.len(), TOKEN_LEN);
    assert!(expire > Utc::now());
    assert_eq!(expire.timestamp_subsec_nanos(), 0);
    assert_eq!(tokens.validate(&token).await.unwrap().as_deref(), Some("ident-a"));
}

#[tokio::test]
async fn test_tokens_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let (token, _) = issuer(&temp_dir).issue_or_renew("ident-b").await.unwrap();

    let reopened = issuer(&temp_dir);
    assert_eq!(reopened.validate(&token).await.unwrap().as_deref(), Some("ident-b"));
}

#[tokio::test]
async fn test_concurrent_logins_leave_one_record() {
    let temp_dir = TempDir::new().unwrap();
    let storage = Arc::new(SqliteStorage::open(temp_dir.path().join("tokens.db")).unwrap());
    let tokens = Arc::new(TokenIssuer::new(storage.clone(), Duration::from_secs(3600)));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let tokens = Arc::clone(&tokens);
            tokio::spawn(async move { tokens.issue_or_renew("ident-c").await })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    let (stored, _) = storage.get_user_api_token("ident-c").await.unwrap().unwrap();
    assert_eq!(tokens.validate(&stored).await.unwrap().as_deref(), Some("ident-c"));
}
