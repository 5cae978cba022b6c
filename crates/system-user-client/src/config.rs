//! System user client configuration.
//!
//! Configuration is built in code through the `with_*` methods or loaded
//! from environment variables via [`ClientConfig::from_vars`]. Proxy
//! credentials are redacted in Debug output.
//!
//! Ambient network settings (proxy URL and proxy credentials) are never read
//! implicitly. They are resolved from the environment only when
//! `SYSTEM_USER_USE_DEFAULT_CREDENTIALS` is set, and are then carried as an
//! explicit [`AmbientNetwork`] value into the HTTP client builder.

use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Placeholder substituted with the tenant subdomain in every template.
pub const SUBDOMAIN_PLACEHOLDER: &str = "{subdomain}";

/// Default system user endpoint.
pub const DEFAULT_ENDPOINT_TEMPLATE: &str =
    "https://{subdomain}.superoffice.com/Login/api/PartnerSystemUser/Authenticate";

/// Default JWKS endpoint publishing the tenant's signing keys.
pub const DEFAULT_JWKS_TEMPLATE: &str = "https://{subdomain}.superoffice.com/login/.well-known/jwks";

/// Default expected `iss` claim.
pub const DEFAULT_ISSUER_TEMPLATE: &str = "https://{subdomain}.superoffice.com";

/// Default expected `aud` claim.
pub const DEFAULT_AUDIENCE_TEMPLATE: &str = "spn:{subdomain}.superoffice.com";

/// Default name of the claim carrying the ticket (matched case-insensitively).
pub const DEFAULT_TICKET_CLAIM: &str = "ticket";

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connection timeout for internally built HTTP clients.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default leeway applied to `exp` and `nbf`.
pub const DEFAULT_LEEWAY: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("Invalid system user descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Invalid tenant template '{0}': must contain {{subdomain}}")]
    InvalidTemplate(String),
}

/// A URL or claim value parameterized by the tenant subdomain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantTemplate(String);

impl TenantTemplate {
    /// Parse a template, requiring the `{subdomain}` placeholder.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidTemplate` if the placeholder is missing.
    pub fn parse(template: impl Into<String>) -> Result<Self, ConfigError> {
        let template = template.into();
        if !template.contains(SUBDOMAIN_PLACEHOLDER) {
            return Err(ConfigError::InvalidTemplate(template));
        }
        Ok(Self(template))
    }

    /// Substitute the tenant subdomain.
    pub fn render(&self, sub_domain: &str) -> String {
        self.0.replace(SUBDOMAIN_PLACEHOLDER, sub_domain)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn builtin(template: &str) -> Self {
        Self(template.to_string())
    }
}

/// Proxy settings for the current execution context.
///
/// Only consulted when default credentials are enabled and no HTTP client
/// was injected.
#[derive(Debug, Clone, Default)]
pub struct AmbientNetwork {
    /// Proxy for all outbound requests.
    pub proxy_url: Option<String>,

    /// Proxy basic-auth user.
    pub proxy_username: Option<String>,

    /// Proxy basic-auth password.
    pub proxy_password: Option<SecretString>,
}

impl AmbientNetwork {
    /// Resolve ambient proxy settings from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let non_empty = |key: &str| vars.get(key).filter(|v| !v.is_empty()).cloned();

        Self {
            proxy_url: non_empty("HTTPS_PROXY").or_else(|| non_empty("https_proxy")),
            proxy_username: non_empty("PROXY_USERNAME"),
            proxy_password: non_empty("PROXY_PASSWORD").map(SecretString::from),
        }
    }
}

/// Per-instance knobs for [`crate::SystemUserClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// System user endpoint.
    pub endpoint: TenantTemplate,

    /// JWKS endpoint used by the default key resolver.
    pub jwks: TenantTemplate,

    /// Expected `iss` claim.
    pub issuer: TenantTemplate,

    /// Expected `aud` claim.
    pub audience: TenantTemplate,

    /// Claim type holding the ticket.
    pub ticket_claim: String,

    /// Injected HTTP client. When set, the transport settings below are
    /// ignored.
    pub http_client: Option<reqwest::Client>,

    /// Use the ambient proxy and credentials for internally built clients.
    pub use_default_credentials: bool,

    /// Resolved ambient network settings.
    pub ambient: Option<AmbientNetwork>,

    /// Whole-request timeout for internally built clients.
    pub http_timeout: Duration,

    /// Connect timeout for internally built clients.
    pub connect_timeout: Duration,

    /// Leeway for `exp` and `nbf`.
    pub leeway: Duration,

    /// Tolerance for `iat` values in the future.
    pub clock_skew: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: TenantTemplate::builtin(DEFAULT_ENDPOINT_TEMPLATE),
            jwks: TenantTemplate::builtin(DEFAULT_JWKS_TEMPLATE),
            issuer: TenantTemplate::builtin(DEFAULT_ISSUER_TEMPLATE),
            audience: TenantTemplate::builtin(DEFAULT_AUDIENCE_TEMPLATE),
            ticket_claim: DEFAULT_TICKET_CLAIM.to_string(),
            http_client: None,
            use_default_credentials: false,
            ambient: None,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            leeway: DEFAULT_LEEWAY,
            clock_skew: DEFAULT_CLOCK_SKEW,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = vars.get("SYSTEM_USER_ENDPOINT_TEMPLATE") {
            config.endpoint = TenantTemplate::parse(value.as_str())?;
        }
        if let Some(value) = vars.get("SYSTEM_USER_JWKS_TEMPLATE") {
            config.jwks = TenantTemplate::parse(value.as_str())?;
        }
        if let Some(value) = vars.get("SYSTEM_USER_ISSUER_TEMPLATE") {
            config.issuer = TenantTemplate::parse(value.as_str())?;
        }
        if let Some(value) = vars.get("SYSTEM_USER_AUDIENCE_TEMPLATE") {
            config.audience = TenantTemplate::parse(value.as_str())?;
        }

        if let Some(value) = vars.get("SYSTEM_USER_TICKET_CLAIM") {
            if value.trim().is_empty() {
                return Err(invalid("SYSTEM_USER_TICKET_CLAIM", "must not be empty"));
            }
            config.ticket_claim = value.clone();
        }

        if let Some(value) = vars.get("SYSTEM_USER_USE_DEFAULT_CREDENTIALS") {
            config.use_default_credentials = parse_bool("SYSTEM_USER_USE_DEFAULT_CREDENTIALS", value)?;
        }
        if config.use_default_credentials {
            config.ambient = Some(AmbientNetwork::from_vars(vars));
        }

        if let Some(value) = vars.get("SYSTEM_USER_HTTP_TIMEOUT_SECONDS") {
            let secs = parse_secs("SYSTEM_USER_HTTP_TIMEOUT_SECONDS", value)?;
            if secs == 0 {
                return Err(invalid(
                    "SYSTEM_USER_HTTP_TIMEOUT_SECONDS",
                    "must be greater than 0",
                ));
            }
            config.http_timeout = Duration::from_secs(secs);
        }

        if let Some(value) = vars.get("SYSTEM_USER_JWT_LEEWAY_SECONDS") {
            let secs = parse_secs("SYSTEM_USER_JWT_LEEWAY_SECONDS", value)?;
            config.leeway = bounded_skew("SYSTEM_USER_JWT_LEEWAY_SECONDS", secs)?;
        }

        if let Some(value) = vars.get("SYSTEM_USER_JWT_CLOCK_SKEW_SECONDS") {
            let secs = parse_secs("SYSTEM_USER_JWT_CLOCK_SKEW_SECONDS", value)?;
            config.clock_skew = bounded_skew("SYSTEM_USER_JWT_CLOCK_SKEW_SECONDS", secs)?;
        }

        Ok(config)
    }

    /// Set the system user endpoint template.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidTemplate` if `{subdomain}` is missing.
    pub fn with_endpoint_template(mut self, template: &str) -> Result<Self, ConfigError> {
        self.endpoint = TenantTemplate::parse(template)?;
        Ok(self)
    }

    /// Set the JWKS endpoint template.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidTemplate` if `{subdomain}` is missing.
    pub fn with_jwks_template(mut self, template: &str) -> Result<Self, ConfigError> {
        self.jwks = TenantTemplate::parse(template)?;
        Ok(self)
    }

    /// Set the expected issuer and audience templates.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidTemplate` if `{subdomain}` is missing.
    pub fn with_trust_templates(mut self, issuer: &str, audience: &str) -> Result<Self, ConfigError> {
        self.issuer = TenantTemplate::parse(issuer)?;
        self.audience = TenantTemplate::parse(audience)?;
        Ok(self)
    }

    /// Set the ticket claim name.
    #[must_use]
    pub fn with_ticket_claim(mut self, claim: impl Into<String>) -> Self {
        self.ticket_claim = claim.into();
        self
    }

    /// Inject an HTTP client.
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Enable default credentials with explicitly resolved ambient settings.
    #[must_use]
    pub fn with_default_credentials(mut self, ambient: AmbientNetwork) -> Self {
        self.use_default_credentials = true;
        self.ambient = Some(ambient);
        self
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Set the `exp`/`nbf` leeway.
    #[must_use]
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(invalid(name, format!("expected a boolean, got '{other}'"))),
    }
}

fn parse_secs(name: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|e| {
        invalid(
            name,
            format!("must be a valid non-negative integer, got '{value}': {e}"),
        )
    })
}

fn bounded_skew(name: &str, secs: u64) -> Result<Duration, ConfigError> {
    if secs > MAX_CLOCK_SKEW.as_secs() {
        return Err(invalid(
            name,
            format!(
                "must not exceed {} seconds, got {secs}",
                MAX_CLOCK_SKEW.as_secs()
            ),
        ));
    }
    Ok(Duration::from_secs(secs))
}
