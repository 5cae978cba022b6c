//! System user client error types.
//!
//! One enum covers every failure surfaced by [`crate::SystemUserClient`]:
//! - Configuration: invalid descriptor or settings, fatal
//! - Transport, UnexpectedStatus, InvalidResponse: the exchange did not
//!   produce a usable response, caller may retry
//! - RemoteRejection: the endpoint answered and refused, message verbatim
//! - TokenValidation: a security event carrying the offending token
//! - ProtocolContract: the endpoint violated its contract
//! - Cancelled: timeout or caller cancellation, never re-wrapped
//!
//! Display output never contains secrets. The rejected token is kept as a
//! `SecretString` so it can be inspected deliberately but not logged by
//! accident.

use crate::config::ConfigError;
use crate::validator::ValidationFailure;
use common::secret::SecretString;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SystemUserError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Request send failed, verify configuration: {0}")]
    Transport(String),

    #[error("Request send failed, verify configuration: endpoint returned HTTP {status}")]
    UnexpectedStatus { status: u16 },

    #[error("Invalid response from system user endpoint: {0}")]
    InvalidResponse(String),

    #[error("System user token exchange failed: {0}")]
    RemoteRejection(String),

    #[error("Token validation failed for tenant '{sub_domain}': {failure}")]
    TokenValidation {
        token: SecretString,
        sub_domain: String,
        #[source]
        failure: ValidationFailure,
    },

    #[error("Protocol contract violated: {0}")]
    ProtocolContract(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl SystemUserError {
    /// Returns true for failures where another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SystemUserError::Transport(_)
                | SystemUserError::UnexpectedStatus { .. }
                | SystemUserError::InvalidResponse(_)
        )
    }

    /// The failed check, for `TokenValidation` errors.
    pub fn validation_failure(&self) -> Option<&ValidationFailure> {
        match self {
            SystemUserError::TokenValidation { failure, .. } => Some(failure),
            _ => None,
        }
    }

    /// Bounded label for metrics.
    pub fn outcome_label(&self) -> &'static str {
        match self {
            SystemUserError::Configuration(_) => "configuration",
            SystemUserError::Transport(_)
            | SystemUserError::UnexpectedStatus { .. }
            | SystemUserError::InvalidResponse(_) => "transport",
            SystemUserError::RemoteRejection(_) => "rejected",
            SystemUserError::TokenValidation { .. } => "invalid_token",
            SystemUserError::ProtocolContract(_) => "contract_violation",
            SystemUserError::Cancelled => "cancelled",
        }
    }
}
