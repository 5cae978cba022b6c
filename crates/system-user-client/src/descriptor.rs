//! System user descriptor.
//!
//! The immutable input of the exchange: which tenant to talk to and the
//! pre-shared credentials identifying the integration. Secrets are held as
//! `SecretString` and redacted in Debug output.
//!
//! The wire shape uses PascalCase field names:
//!
//! ```json
//! {"SubDomain":"sod","SystemUserToken":"SYS-...","ContextIdentifier":"Cust12345","ClientSecret":"..."}
//! ```

use crate::config::ConfigError;
use common::secret::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

/// Maximum length of a DNS label.
const MAX_SUBDOMAIN_LEN: usize = 63;

/// Tenant subdomain plus the system user credentials.
#[derive(Debug, Clone)]
pub struct SystemUserDescriptor {
    sub_domain: String,
    system_user_token: SecretString,
    context_identifier: Option<String>,
    client_secret: Option<SecretString>,
}

impl SystemUserDescriptor {
    /// Create a descriptor for a tenant.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidDescriptor` if the subdomain is empty or
    /// not a DNS label, or if the system user token is empty.
    pub fn new(
        sub_domain: impl Into<String>,
        system_user_token: SecretString,
    ) -> Result<Self, ConfigError> {
        let sub_domain = sub_domain.into();
        validate_sub_domain(&sub_domain)?;

        if system_user_token.expose_secret().trim().is_empty() {
            return Err(ConfigError::InvalidDescriptor(
                "system user token must not be empty".to_string(),
            ));
        }

        Ok(Self {
            sub_domain,
            system_user_token,
            context_identifier: None,
            client_secret: None,
        })
    }

    /// Load a descriptor from environment-style variables.
    ///
    /// Reads `SYSTEM_USER_SUBDOMAIN`, `SYSTEM_USER_TOKEN` and the optional
    /// `SYSTEM_USER_CONTEXT_IDENTIFIER` / `SYSTEM_USER_CLIENT_SECRET`.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let sub_domain = vars
            .get("SYSTEM_USER_SUBDOMAIN")
            .ok_or_else(|| ConfigError::MissingEnvVar("SYSTEM_USER_SUBDOMAIN".to_string()))?;
        let token = vars
            .get("SYSTEM_USER_TOKEN")
            .ok_or_else(|| ConfigError::MissingEnvVar("SYSTEM_USER_TOKEN".to_string()))?;

        let mut descriptor = Self::new(sub_domain.as_str(), SecretString::from(token.as_str()))?;

        if let Some(ctx) = vars
            .get("SYSTEM_USER_CONTEXT_IDENTIFIER")
            .filter(|v| !v.is_empty())
        {
            descriptor = descriptor.with_context_identifier(ctx.as_str());
        }
        if let Some(secret) = vars
            .get("SYSTEM_USER_CLIENT_SECRET")
            .filter(|v| !v.is_empty())
        {
            descriptor = descriptor.with_client_secret(SecretString::from(secret.as_str()));
        }

        Ok(descriptor)
    }

    /// Set the partner's customer context identifier.
    #[must_use]
    pub fn with_context_identifier(mut self, context_identifier: impl Into<String>) -> Self {
        self.context_identifier = Some(context_identifier.into());
        self
    }

    /// Set the partner application's client secret.
    #[must_use]
    pub fn with_client_secret(mut self, client_secret: SecretString) -> Self {
        self.client_secret = Some(client_secret);
        self
    }

    pub fn sub_domain(&self) -> &str {
        &self.sub_domain
    }

    pub fn system_user_token(&self) -> &SecretString {
        &self.system_user_token
    }

    pub fn context_identifier(&self) -> Option<&str> {
        self.context_identifier.as_deref()
    }

    pub fn client_secret(&self) -> Option<&SecretString> {
        self.client_secret.as_ref()
    }
}

fn validate_sub_domain(sub_domain: &str) -> Result<(), ConfigError> {
    if sub_domain.is_empty() {
        return Err(ConfigError::InvalidDescriptor(
            "tenant subdomain must not be empty".to_string(),
        ));
    }

    let valid_chars = sub_domain
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-');
    if sub_domain.len() > MAX_SUBDOMAIN_LEN
        || !valid_chars
        || sub_domain.starts_with('-')
        || sub_domain.ends_with('-')
    {
        return Err(ConfigError::InvalidDescriptor(format!(
            "tenant subdomain '{sub_domain}' is not a valid DNS label"
        )));
    }

    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DescriptorRef<'a> {
    sub_domain: &'a str,
    system_user_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    context_identifier: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_secret: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescriptorOwned {
    sub_domain: String,
    system_user_token: String,
    #[serde(default)]
    context_identifier: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
}

impl Serialize for SystemUserDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        DescriptorRef {
            sub_domain: &self.sub_domain,
            system_user_token: self.system_user_token.expose_secret(),
            context_identifier: self.context_identifier.as_deref(),
            client_secret: self.client_secret.as_ref().map(|s| s.expose_secret()),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SystemUserDescriptor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let owned = DescriptorOwned::deserialize(deserializer)?;
        let mut descriptor = Self::new(owned.sub_domain, SecretString::from(owned.system_user_token))
            .map_err(serde::de::Error::custom)?;
        descriptor.context_identifier = owned.context_identifier;
        descriptor.client_secret = owned.client_secret.map(SecretString::from);
        Ok(descriptor)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn descriptor() -> SystemUserDescriptor {
        SystemUserDescriptor::new("sod", SecretString::from("SYS-abc-123"))
            .unwrap()
            .with_context_identifier("Cust12345")
            .with_client_secret(SecretString::from("partner-secret"))
    }

    #[test]
    fn test_new_rejects_empty_subdomain() {
        let result = SystemUserDescriptor::new("", SecretString::from("SYS-abc"));
        assert!(matches!(result, Err(ConfigError::InvalidDescriptor(_))));
    }

    #[test]
    fn test_new_rejects_non_dns_subdomain() {
        for bad in ["sod.evil.com", "-sod", "sod-", "s o d", "sod/../x"] {
            let result = SystemUserDescriptor::new(bad, SecretString::from("SYS-abc"));
            assert!(
                matches!(result, Err(ConfigError::InvalidDescriptor(_))),
                "'{bad}' should be rejected"
            );
        }
    }

    #[test]
    fn test_new_rejects_empty_token() {
        let result = SystemUserDescriptor::new("sod", SecretString::from("  "));
        assert!(matches!(result, Err(ConfigError::InvalidDescriptor(_))));
    }

    #[test]
    fn test_serializes_pascal_case() {
        let json: serde_json::Value = serde_json::to_value(descriptor()).unwrap();

        assert_eq!(json["SubDomain"], "sod");
        assert_eq!(json["SystemUserToken"], "SYS-abc-123");
        assert_eq!(json["ContextIdentifier"], "Cust12345");
        assert_eq!(json["ClientSecret"], "partner-secret");
    }

    #[test]
    fn test_serialization_omits_absent_partner_fields() {
        let d = SystemUserDescriptor::new("sod", SecretString::from("SYS-abc")).unwrap();
        let json = serde_json::to_string(&d).unwrap();

        assert!(!json.contains("ContextIdentifier"));
        assert!(!json.contains("ClientSecret"));
    }

    #[test]
    fn test_deserialize_validates() {
        let json = r#"{"SubDomain":"","SystemUserToken":"SYS-abc"}"#;
        assert!(serde_json::from_str::<SystemUserDescriptor>(json).is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let debug_str = format!("{:?}", descriptor());

        assert!(debug_str.contains("sod"));
        assert!(!debug_str.contains("SYS-abc-123"));
        assert!(!debug_str.contains("partner-secret"));
    }

    #[test]
    fn test_from_vars() {
        let vars: HashMap<String, String> = [
            ("SYSTEM_USER_SUBDOMAIN", "online"),
            ("SYSTEM_USER_TOKEN", "SYS-xyz"),
            ("SYSTEM_USER_CONTEXT_IDENTIFIER", "Cust777"),
        ]
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();

        let d = SystemUserDescriptor::from_vars(&vars).unwrap();
        assert_eq!(d.sub_domain(), "online");
        assert_eq!(d.system_user_token().expose_secret(), "SYS-xyz");
        assert_eq!(d.context_identifier(), Some("Cust777"));
        assert!(d.client_secret().is_none());
    }

    #[test]
    fn test_from_vars_missing_token() {
        let vars: HashMap<String, String> =
            HashMap::from([("SYSTEM_USER_SUBDOMAIN".to_string(), "online".to_string())]);

        let result = SystemUserDescriptor::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "SYSTEM_USER_TOKEN"));
    }
}
