use super::*;

#[tokio::test]
async fn static_credential_returns_its_token() {
    let provider = StaticCredential::new("abc123");
    assert_eq!(provider.token().await, Ok("abc123".to_owned()));
}

#[tokio::test]
async fn static_credential_rejects_blank_token() {
    let provider = StaticCredential::new("  ");
    assert!(matches!(provider.token().await, Err(CredentialError::Missing(_))));
}

#[test]
fn static_credential_debug_redacts_token() {
    let rendered = format!("{:?}", StaticCredential::new("secret-token"));
    assert!(!rendered.contains("secret-token"));
}

#[tokio::test]
async fn env_credential_reports_unset_variable() {
    let provider = EnvCredential::new("CONVO_TEST_TOKEN_THAT_IS_NEVER_SET");
    let err = provider.token().await.unwrap_err();
    assert!(matches!(err, CredentialError::Missing(msg) if msg.contains("not set")));
}

#[tokio::test]
async fn env_credential_reads_current_value() {
    // PATH is set in every test environment; only presence is checked here.
    let provider = EnvCredential::new("PATH");
    assert!(provider.token().await.is_ok());
}

#[tokio::test]
async fn providers_work_behind_trait_objects() {
    let provider: std::sync::Arc<dyn CredentialProvider> = std::sync::Arc::new(StaticCredential::new("t"));
    assert_eq!(provider.token().await.unwrap(), "t");
}
