//! Request builder for the system user exchange.
//!
//! Pure: substitutes the tenant subdomain into the endpoint template and
//! serializes the descriptor. No I/O.

use crate::config::{ConfigError, TenantTemplate};
use crate::descriptor::SystemUserDescriptor;
use crate::errors::SystemUserError;
use common::secret::SecretString;
use std::fmt;

/// A fully built exchange request.
#[derive(Clone)]
pub struct SystemUserRequest {
    url: String,
    body: SecretString,
}

impl SystemUserRequest {
    /// Build the request for `descriptor` against the `endpoint` template.
    ///
    /// # Errors
    ///
    /// Returns `SystemUserError::Configuration` if the descriptor cannot be
    /// serialized, which only happens for a broken serializer.
    pub fn build(
        descriptor: &SystemUserDescriptor,
        endpoint: &TenantTemplate,
    ) -> Result<Self, SystemUserError> {
        let url = endpoint.render(descriptor.sub_domain());
        let body = serde_json::to_string(descriptor).map_err(|e| {
            SystemUserError::Configuration(ConfigError::InvalidDescriptor(format!(
                "failed to serialize descriptor: {e}"
            )))
        })?;

        Ok(Self {
            url,
            body: SecretString::from(body),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// JSON body. Contains the system user token.
    pub fn body(&self) -> &SecretString {
        &self.body
    }
}

impl fmt::Debug for SystemUserRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemUserRequest")
            .field("url", &self.url)
            .field("body", &"[REDACTED]")
            .finish()
    }
}
