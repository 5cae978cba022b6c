//! Stub of a tenant's system user and JWKS endpoints.
//!
//! Paths mirror the real layout with the subdomain moved into the path so
//! one server can host several tenants:
//!
//! - `POST /{subdomain}/Login/api/PartnerSystemUser/Authenticate`
//! - `GET  /{subdomain}/login/.well-known/jwks`

use crate::crypto_fixtures::TestKeypair;
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path of the exchange endpoint below the tenant prefix.
pub const EXCHANGE_PATH: &str = "Login/api/PartnerSystemUser/Authenticate";

/// Path of the JWKS endpoint below the tenant prefix.
pub const JWKS_PATH: &str = "login/.well-known/jwks";

/// A wiremock server standing in for the identity endpoint.
pub struct MockSystemUserEndpoint {
    server: MockServer,
}

impl MockSystemUserEndpoint {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Endpoint template for the client configuration.
    pub fn endpoint_template(&self) -> String {
        format!("{}/{{subdomain}}/{EXCHANGE_PATH}", self.server.uri())
    }

    /// JWKS template for the client configuration.
    pub fn jwks_template(&self) -> String {
        format!("{}/{{subdomain}}/{JWKS_PATH}", self.server.uri())
    }

    fn exchange(sub_domain: &str) -> wiremock::MockBuilder {
        Mock::given(method("POST")).and(path(format!("/{sub_domain}/{EXCHANGE_PATH}")))
    }

    /// Answer every exchange for `sub_domain` with `token`.
    pub async fn mount_token(&self, sub_domain: &str, token: &str) {
        Self::exchange(sub_domain)
            .respond_with(success_response(token))
            .mount(&self.server)
            .await;
    }

    /// Answer the next exchange for `sub_domain` with `token`.
    ///
    /// Mounted responses are used in mounting order, each once.
    pub async fn mount_token_once(&self, sub_domain: &str, token: &str) {
        Self::exchange(sub_domain)
            .respond_with(success_response(token))
            .up_to_n_times(1)
            .mount(&self.server)
            .await;
    }

    /// Answer with `token` after `delay`.
    pub async fn mount_delayed_token(&self, sub_domain: &str, token: &str, delay: Duration) {
        Self::exchange(sub_domain)
            .respond_with(success_response(token).set_delay(delay))
            .mount(&self.server)
            .await;
    }

    /// Answer with `IsSuccessful: false` and `message`.
    pub async fn mount_rejection(&self, sub_domain: &str, message: &str) {
        Self::exchange(sub_domain)
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "IsSuccessful": false,
                "Token": null,
                "ErrorMessage": message,
            })))
            .mount(&self.server)
            .await;
    }

    /// Answer with a bare HTTP status.
    pub async fn mount_status(&self, sub_domain: &str, status: u16) {
        Self::exchange(sub_domain)
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Answer with a 200 and an arbitrary body.
    pub async fn mount_raw_body(&self, sub_domain: &str, body: &str) {
        Self::exchange(sub_domain)
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    /// Publish `keypairs` as the tenant's JWKS.
    pub async fn mount_jwks(&self, sub_domain: &str, keypairs: &[&TestKeypair]) {
        let keys: Vec<Value> = keypairs.iter().map(|kp| kp.jwk_json()).collect();

        Mock::given(method("GET"))
            .and(path(format!("/{sub_domain}/{JWKS_PATH}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })))
            .mount(&self.server)
            .await;
    }

    /// Publish `keypairs` for the next JWKS fetch only. Mount the longer
    /// lived key set afterwards to simulate a rotation.
    pub async fn mount_jwks_once(&self, sub_domain: &str, keypairs: &[&TestKeypair]) {
        let keys: Vec<Value> = keypairs.iter().map(|kp| kp.jwk_json()).collect();

        Mock::given(method("GET"))
            .and(path(format!("/{sub_domain}/{JWKS_PATH}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })))
            .up_to_n_times(1)
            .mount(&self.server)
            .await;
    }

    /// Number of JWKS requests received for any tenant.
    pub async fn jwks_fetch_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.method.as_str() == "GET" && r.url.path().ends_with(JWKS_PATH))
            .count()
    }

    /// Number of exchange requests received for any tenant.
    pub async fn exchange_count(&self) -> usize {
        self.exchange_bodies().await.len()
    }

    /// JSON bodies of every exchange request received, in order.
    pub async fn exchange_bodies(&self) -> Vec<Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.method.as_str() == "POST" && r.url.path().ends_with(EXCHANGE_PATH))
            .map(|r| serde_json::from_slice(&r.body).expect("exchange body is JSON"))
            .collect()
    }
}

fn success_response(token: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "IsSuccessful": true,
        "Token": token,
        "ErrorMessage": null,
    }))
}
