//! Builder patterns for test data construction
//!
//! Provides a fluent API for the claims of a system user token.

use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Issuer template matching the stub tenant.
pub const TEST_ISSUER_TEMPLATE: &str = "https://{subdomain}.test.local";

/// Audience template matching the stub tenant.
pub const TEST_AUDIENCE_TEMPLATE: &str = "spn:{subdomain}.test.local";

/// Builder for system user token claims.
///
/// Defaults to a token the stub tenant accepts: matching `iss` and `aud`,
/// `iat`/`nbf` now, `exp` in one hour, and a `ticket` claim.
///
/// # Example
/// ```rust,ignore
/// let claims = TestTokenBuilder::for_tenant("sod")
///     .with_ticket("7T:abc")
///     .expires_in(-60)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct TestTokenBuilder {
    claims: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Claims for `sub_domain` under the stub tenant templates.
    pub fn for_tenant(sub_domain: &str) -> Self {
        let now = Utc::now().timestamp();
        let mut claims = Map::new();
        claims.insert(
            "iss".to_string(),
            json!(TEST_ISSUER_TEMPLATE.replace("{subdomain}", sub_domain)),
        );
        claims.insert(
            "aud".to_string(),
            json!(TEST_AUDIENCE_TEMPLATE.replace("{subdomain}", sub_domain)),
        );
        claims.insert("sub".to_string(), json!("system-user"));
        claims.insert("ticket".to_string(), json!(format!("7T:test-ticket-{sub_domain}")));
        claims.insert("iat".to_string(), json!(now));
        claims.insert("nbf".to_string(), json!(now));
        claims.insert("exp".to_string(), json!(now + 3600));

        Self { claims }
    }

    /// Set the ticket claim.
    pub fn with_ticket(self, ticket: &str) -> Self {
        self.with_claim("ticket", json!(ticket))
    }

    /// Drop the ticket claim.
    pub fn without_ticket(self) -> Self {
        self.without_claim("ticket")
    }

    pub fn with_issuer(self, issuer: &str) -> Self {
        self.with_claim("iss", json!(issuer))
    }

    pub fn with_audience(self, audience: &str) -> Self {
        self.with_claim("aud", json!(audience))
    }

    /// Set expiration in seconds from now (negative for the past).
    pub fn expires_in(self, seconds: i64) -> Self {
        let exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self.with_claim("exp", json!(exp))
    }

    /// Set not-before in seconds from now.
    pub fn not_before_in(self, seconds: i64) -> Self {
        let nbf = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self.with_claim("nbf", json!(nbf))
    }

    /// Set issued-at in seconds from now.
    pub fn issued_in(self, seconds: i64) -> Self {
        let iat = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self.with_claim("iat", json!(iat))
    }

    /// Set or replace any claim.
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    /// Remove a claim.
    pub fn without_claim(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        Value::Object(self.claims)
    }
}
