//! Ticket acquisition integration tests.
//!
//! Runs the full exchange against a stubbed tenant endpoint that also
//! publishes the tenant's JWKS.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use anyhow::Result;
use system_user_client::{
    ClientConfig, ExposeSecret, SecretString, SystemUserClient, SystemUserDescriptor,
    SystemUserError, ValidationFailure,
};
use system_user_test_utils::{
    MockSystemUserEndpoint, TestKeypair, TestTokenBuilder, TEST_AUDIENCE_TEMPLATE,
    TEST_ISSUER_TEMPLATE,
};

const TENANT: &str = "sod";

fn descriptor() -> SystemUserDescriptor {
    SystemUserDescriptor::new(TENANT, SecretString::from("SYS-4f1c-secret"))
        .expect("valid descriptor")
        .with_context_identifier("Cust12345")
        .with_client_secret(SecretString::from("partner-client-secret"))
}

fn config(endpoint: &MockSystemUserEndpoint) -> ClientConfig {
    ClientConfig::default()
        .with_endpoint_template(&endpoint.endpoint_template())
        .and_then(|c| c.with_jwks_template(&endpoint.jwks_template()))
        .and_then(|c| c.with_trust_templates(TEST_ISSUER_TEMPLATE, TEST_AUDIENCE_TEMPLATE))
        .expect("valid templates")
}

async fn setup(keypair: &TestKeypair) -> (MockSystemUserEndpoint, SystemUserClient) {
    let endpoint = MockSystemUserEndpoint::start().await;
    endpoint.mount_jwks(TENANT, &[keypair]).await;
    let client = SystemUserClient::new(descriptor(), config(&endpoint)).expect("client");
    (endpoint, client)
}

#[tokio::test]
async fn test_valid_token_returns_ticket_and_stores_identity() -> Result<()> {
    let keypair = TestKeypair::new(1, "tenant-key-01");
    let (endpoint, client) = setup(&keypair).await;
    let token = keypair.sign(&TestTokenBuilder::for_tenant(TENANT).with_ticket("7T:abc123").build());
    endpoint.mount_token(TENANT, &token).await;

    let ticket = client.get_system_user_ticket().await?;

    assert_eq!(ticket.expose_secret(), "7T:abc123");
    let identity = client.last_claims_identity().expect("identity stored");
    assert_eq!(identity.find("ticket").unwrap().value, "7T:abc123");
    Ok(())
}

#[tokio::test]
async fn test_ticket_claim_matched_case_insensitively() -> Result<()> {
    let keypair = TestKeypair::new(1, "tenant-key-01");
    let (endpoint, client) = setup(&keypair).await;
    let claims = TestTokenBuilder::for_tenant(TENANT)
        .without_ticket()
        .with_claim("Ticket", serde_json::json!("7T:mixed-case"))
        .build();
    endpoint.mount_token(TENANT, &keypair.sign(&claims)).await;

    let ticket = client.get_system_user_ticket().await?;

    assert_eq!(ticket.expose_secret(), "7T:mixed-case");
    Ok(())
}

#[tokio::test]
async fn test_configured_ticket_claim_name() -> Result<()> {
    let keypair = TestKeypair::new(1, "tenant-key-01");
    let endpoint = MockSystemUserEndpoint::start().await;
    endpoint.mount_jwks(TENANT, &[&keypair]).await;
    let claim = "http://schemes.superoffice.net/identity/ticket";
    let claims = TestTokenBuilder::for_tenant(TENANT)
        .without_ticket()
        .with_claim(claim, serde_json::json!("7T:schemed"))
        .build();
    endpoint.mount_token(TENANT, &keypair.sign(&claims)).await;

    let client = SystemUserClient::new(descriptor(), config(&endpoint).with_ticket_claim(claim))?;
    let ticket = client.get_system_user_ticket().await?;

    assert_eq!(ticket.expose_secret(), "7T:schemed");
    Ok(())
}

#[tokio::test]
async fn test_remote_rejection_carries_message_verbatim() {
    let keypair = TestKeypair::new(1, "tenant-key-01");
    let (endpoint, client) = setup(&keypair).await;
    endpoint
        .mount_rejection(TENANT, "System user token is not valid for Cust12345")
        .await;

    let err = client.get_system_user_ticket().await.unwrap_err();

    match err {
        SystemUserError::RemoteRejection(message) => {
            assert_eq!(message, "System user token is not valid for Cust12345");
        }
        other => panic!("expected RemoteRejection, got {other:?}"),
    }
    assert!(client.last_claims_identity().is_none());
}

#[tokio::test]
async fn test_forged_signature_is_token_validation_error() {
    let trusted = TestKeypair::new(1, "tenant-key-01");
    let attacker = TestKeypair::new(66, "tenant-key-01");
    let (endpoint, client) = setup(&trusted).await;
    let token = attacker.sign(&TestTokenBuilder::for_tenant(TENANT).with_ticket("7T:forged").build());
    endpoint.mount_token(TENANT, &token).await;

    let err = client.get_system_user_ticket().await.unwrap_err();

    match &err {
        SystemUserError::TokenValidation {
            token: rejected,
            sub_domain,
            failure,
        } => {
            assert_eq!(*failure, ValidationFailure::InvalidSignature);
            assert_eq!(sub_domain, TENANT);
            assert_eq!(rejected.expose_secret(), token);
        }
        other => panic!("expected TokenValidation, got {other:?}"),
    }
    assert!(!err.to_string().contains(&token));
    assert!(client.last_claims_identity().is_none());
}

#[tokio::test]
async fn test_expired_token_reports_expiry() {
    let keypair = TestKeypair::new(1, "tenant-key-01");
    let (endpoint, client) = setup(&keypair).await;
    let token = keypair.sign(&TestTokenBuilder::for_tenant(TENANT).expires_in(-3600).build());
    endpoint.mount_token(TENANT, &token).await;

    let err = client.get_system_user_ticket().await.unwrap_err();

    assert_eq!(err.validation_failure(), Some(&ValidationFailure::Expired));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_token_for_other_tenant_rejected() {
    let keypair = TestKeypair::new(1, "tenant-key-01");
    let (endpoint, client) = setup(&keypair).await;
    let token = keypair.sign(&TestTokenBuilder::for_tenant("another-tenant").build());
    endpoint.mount_token(TENANT, &token).await;

    let err = client.get_system_user_ticket().await.unwrap_err();

    assert_eq!(err.validation_failure(), Some(&ValidationFailure::InvalidIssuer));
}

#[tokio::test]
async fn test_wrong_audience_rejected() {
    let keypair = TestKeypair::new(1, "tenant-key-01");
    let (endpoint, client) = setup(&keypair).await;
    let token = keypair.sign(
        &TestTokenBuilder::for_tenant(TENANT)
            .with_audience("spn:someone-else")
            .build(),
    );
    endpoint.mount_token(TENANT, &token).await;

    let err = client.get_system_user_ticket().await.unwrap_err();

    assert_eq!(err.validation_failure(), Some(&ValidationFailure::InvalidAudience));
}

#[tokio::test]
async fn test_unknown_kid_rejected() {
    let published = TestKeypair::new(1, "tenant-key-01");
    let unpublished = TestKeypair::new(2, "tenant-key-02");
    let (endpoint, client) = setup(&published).await;
    endpoint
        .mount_token(TENANT, &unpublished.sign(&TestTokenBuilder::for_tenant(TENANT).build()))
        .await;

    let err = client.get_system_user_ticket().await.unwrap_err();

    assert_eq!(
        err.validation_failure(),
        Some(&ValidationFailure::UnknownSigningKey)
    );
    // Initial fetch plus one forced refresh, never more.
    assert_eq!(endpoint.jwks_fetch_count().await, 2);
}

#[tokio::test]
async fn test_rotated_signing_key_accepted_while_cache_is_fresh() -> Result<()> {
    let old = TestKeypair::new(1, "tenant-key-old");
    let new = TestKeypair::new(2, "tenant-key-new");
    let endpoint = MockSystemUserEndpoint::start().await;
    endpoint.mount_jwks_once(TENANT, &[&old]).await;
    endpoint.mount_jwks(TENANT, &[&old, &new]).await;
    let client = SystemUserClient::new(descriptor(), config(&endpoint))?;

    let before = old.sign(&TestTokenBuilder::for_tenant(TENANT).with_ticket("7T:old").build());
    assert!(client.validate(&before).await?.is_valid());
    assert_eq!(endpoint.jwks_fetch_count().await, 1);

    // The tenant now signs with a key the cached JWKS does not contain.
    let after = new.sign(&TestTokenBuilder::for_tenant(TENANT).with_ticket("7T:new").build());
    endpoint.mount_token(TENANT, &after).await;

    let ticket = client.get_system_user_ticket().await?;

    assert_eq!(ticket.expose_secret(), "7T:new");
    assert_eq!(endpoint.jwks_fetch_count().await, 2);

    // The refreshed set is cached, so the old key still works without a fetch.
    assert!(client.validate(&before).await?.is_valid());
    assert_eq!(endpoint.jwks_fetch_count().await, 2);
    Ok(())
}

#[tokio::test]
async fn test_missing_ticket_claim_is_protocol_contract_error() {
    let keypair = TestKeypair::new(1, "tenant-key-01");
    let (endpoint, client) = setup(&keypair).await;
    let token = keypair.sign(&TestTokenBuilder::for_tenant(TENANT).without_ticket().build());
    endpoint.mount_token(TENANT, &token).await;

    let err = client.get_system_user_ticket().await.unwrap_err();

    assert!(matches!(err, SystemUserError::ProtocolContract(_)));
    // The token itself was valid, so its identity is still stored.
    let identity = client.last_claims_identity().expect("identity stored");
    assert!(identity.find("ticket").is_none());
}

#[tokio::test]
async fn test_each_call_performs_fresh_exchange() -> Result<()> {
    let keypair = TestKeypair::new(1, "tenant-key-01");
    let (endpoint, client) = setup(&keypair).await;
    let first = keypair.sign(&TestTokenBuilder::for_tenant(TENANT).with_ticket("7T:first").build());
    let second = keypair.sign(&TestTokenBuilder::for_tenant(TENANT).with_ticket("7T:second").build());
    endpoint.mount_token_once(TENANT, &first).await;
    endpoint.mount_token_once(TENANT, &second).await;

    let ticket_one = client.get_system_user_ticket().await?;
    let ticket_two = client.get_system_user_ticket().await?;

    assert_eq!(ticket_one.expose_secret(), "7T:first");
    assert_eq!(ticket_two.expose_secret(), "7T:second");
    assert_eq!(endpoint.exchange_count().await, 2);

    // Last write wins.
    let identity = client.last_claims_identity().expect("identity stored");
    assert_eq!(identity.find("ticket").unwrap().value, "7T:second");
    Ok(())
}

#[tokio::test]
async fn test_request_body_round_trips_to_descriptor() -> Result<()> {
    let keypair = TestKeypair::new(1, "tenant-key-01");
    let (endpoint, client) = setup(&keypair).await;
    endpoint
        .mount_token(TENANT, &keypair.sign(&TestTokenBuilder::for_tenant(TENANT).build()))
        .await;

    client.get_system_user_ticket().await?;

    let bodies = endpoint.exchange_bodies().await;
    assert_eq!(bodies.len(), 1);
    let received: SystemUserDescriptor = serde_json::from_value(bodies.into_iter().next().unwrap())?;
    let sent = descriptor();

    assert_eq!(received.sub_domain(), sent.sub_domain());
    assert_eq!(
        received.system_user_token().expose_secret(),
        sent.system_user_token().expose_secret()
    );
    assert_eq!(received.context_identifier(), sent.context_identifier());
    assert_eq!(
        received.client_secret().map(|s| s.expose_secret()),
        Some("partner-client-secret")
    );
    Ok(())
}

#[tokio::test]
async fn test_exchange_for_token_returns_raw_result() -> Result<()> {
    let keypair = TestKeypair::new(1, "tenant-key-01");
    let (endpoint, client) = setup(&keypair).await;
    let token = keypair.sign(&TestTokenBuilder::for_tenant(TENANT).build());
    endpoint.mount_token(TENANT, &token).await;

    let result = client.exchange_for_token().await?;

    assert!(result.is_success());
    assert_eq!(result.token().unwrap().expose_secret(), token);
    // Exchanging alone never touches the stored identity.
    assert!(client.last_claims_identity().is_none());
    Ok(())
}

#[tokio::test]
async fn test_validate_then_ticket_identity_matches() -> Result<()> {
    let keypair = TestKeypair::new(1, "tenant-key-01");
    let (_endpoint, client) = setup(&keypair).await;
    let token = keypair.sign(&TestTokenBuilder::for_tenant(TENANT).with_ticket("7T:direct").build());

    let outcome = client.validate(&token).await?;

    assert!(outcome.is_valid());
    assert_eq!(
        outcome.claims_identity().unwrap().find("ticket").unwrap().value,
        "7T:direct"
    );
    assert_eq!(client.last_claims_identity().as_ref(), outcome.claims_identity());
    Ok(())
}
