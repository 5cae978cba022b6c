//! Transport invoker.
//!
//! Performs exactly one POST per exchange and turns the response into a
//! [`TokenExchangeResult`]. No retries; the caller decides.
//!
//! Failure classes are kept apart:
//! - send failure: `Transport`
//! - non-2xx status: `UnexpectedStatus`
//! - body that is not the expected JSON: `InvalidResponse`
//! - endpoint-reported failure: `TokenExchangeResult::Failure`, not an error
//! - reqwest timeout: `Cancelled`

use crate::config::{AmbientNetwork, ClientConfig, ConfigError};
use crate::errors::SystemUserError;
use crate::request::SystemUserRequest;
use common::secret::{ExposeSecret, SecretString};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::instrument;

const JSON: &str = "application/json";

/// Settings for internally built HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub timeout: Duration,
    pub connect_timeout: Duration,

    /// Proxy settings, present only when default credentials are enabled.
    pub ambient: Option<AmbientNetwork>,
}

impl TransportOptions {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            timeout: config.http_timeout,
            connect_timeout: config.connect_timeout,
            ambient: if config.use_default_credentials {
                config.ambient.clone()
            } else {
                None
            },
        }
    }
}

/// Build an HTTP client from explicit options.
///
/// Proxy settings are never read from the process environment here. Without
/// an explicit proxy the client connects directly.
///
/// # Errors
///
/// Returns `Configuration` for an unparseable proxy URL and `Transport` if
/// the TLS backend cannot be initialized.
pub fn build_http_client(options: &TransportOptions) -> Result<reqwest::Client, SystemUserError> {
    let mut builder = reqwest::Client::builder()
        .timeout(options.timeout)
        .connect_timeout(options.connect_timeout);

    let proxy_url = options
        .ambient
        .as_ref()
        .and_then(|a| a.proxy_url.as_deref().map(|url| (a, url)));

    builder = match proxy_url {
        Some((ambient, url)) => {
            let mut proxy = reqwest::Proxy::all(url).map_err(|e| {
                SystemUserError::Configuration(ConfigError::InvalidValue {
                    name: "HTTPS_PROXY".to_string(),
                    reason: e.to_string(),
                })
            })?;
            if let Some(username) = ambient.proxy_username.as_deref() {
                let password = ambient
                    .proxy_password
                    .as_ref()
                    .map_or("", |p| p.expose_secret());
                proxy = proxy.basic_auth(username, password);
            }
            tracing::debug!(target: "sysuser.transport", "Using ambient proxy");
            builder.proxy(proxy)
        }
        None => builder.no_proxy(),
    };

    builder.build().map_err(|e| {
        tracing::error!(target: "sysuser.transport", error = %e, "Failed to build HTTP client");
        SystemUserError::Transport(format!("failed to build HTTP client: {e}"))
    })
}

/// Outcome of a completed exchange.
#[derive(Debug, Clone)]
pub enum TokenExchangeResult {
    Success { token: SecretString },
    Failure { error_message: String },
}

impl TokenExchangeResult {
    pub fn is_success(&self) -> bool {
        matches!(self, TokenExchangeResult::Success { .. })
    }

    pub fn token(&self) -> Option<&SecretString> {
        match self {
            TokenExchangeResult::Success { token } => Some(token),
            TokenExchangeResult::Failure { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            TokenExchangeResult::Success { .. } => None,
            TokenExchangeResult::Failure { error_message } => Some(error_message),
        }
    }
}

/// Response body of the system user endpoint.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ExchangeResponse {
    #[serde(alias = "isSuccessful")]
    is_successful: bool,

    #[serde(default, alias = "token")]
    token: Option<String>,

    #[serde(default, alias = "errorMessage")]
    error_message: Option<String>,
}

impl ExchangeResponse {
    fn into_result(self) -> Result<TokenExchangeResult, SystemUserError> {
        if !self.is_successful {
            return Ok(TokenExchangeResult::Failure {
                error_message: self.error_message.unwrap_or_default(),
            });
        }

        match self.token {
            Some(token) if !token.is_empty() => Ok(TokenExchangeResult::Success {
                token: SecretString::from(token),
            }),
            _ => Err(SystemUserError::InvalidResponse(
                "endpoint reported success without a token".to_string(),
            )),
        }
    }
}

impl fmt::Debug for ExchangeResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeResponse")
            .field("is_successful", &self.is_successful)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("error_message", &self.error_message)
            .finish()
    }
}

/// Sends exchange requests.
#[derive(Debug, Clone)]
pub struct Transport {
    http_client: Option<reqwest::Client>,
    options: TransportOptions,
}

impl Transport {
    /// An injected client is used as-is; otherwise one is built per call.
    pub fn new(http_client: Option<reqwest::Client>, options: TransportOptions) -> Self {
        Self {
            http_client,
            options,
        }
    }

    /// Client for auxiliary requests such as JWKS fetches.
    pub(crate) fn shared_client(&self) -> Result<reqwest::Client, SystemUserError> {
        match &self.http_client {
            Some(client) => Ok(client.clone()),
            None => build_http_client(&self.options),
        }
    }

    /// POST the request once and parse the endpoint's answer.
    #[instrument(skip_all, fields(url = %request.url()))]
    pub async fn exchange(
        &self,
        request: &SystemUserRequest,
    ) -> Result<TokenExchangeResult, SystemUserError> {
        let client = self.shared_client()?;

        let response = client
            .post(request.url())
            .header(CONTENT_TYPE, JSON)
            .header(ACCEPT, JSON)
            .body(request.body().expose_secret().to_string())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    tracing::warn!(target: "sysuser.transport", "System user request timed out");
                    return SystemUserError::Cancelled;
                }
                tracing::error!(target: "sysuser.transport", error = %e, "System user request failed");
                SystemUserError::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                target: "sysuser.transport",
                status = status.as_u16(),
                "System user endpoint returned error status"
            );
            return Err(SystemUserError::UnexpectedStatus {
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                return SystemUserError::Cancelled;
            }
            SystemUserError::Transport(format!("failed to read response body: {e}"))
        })?;

        let parsed: ExchangeResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::warn!(target: "sysuser.transport", error = %e, "Unparseable system user response");
            SystemUserError::InvalidResponse(format!("failed to parse response body: {e}"))
        })?;

        tracing::debug!(
            target: "sysuser.transport",
            is_successful = parsed.is_successful,
            "System user response received"
        );

        parsed.into_result()
    }
}
