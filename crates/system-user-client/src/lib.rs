//! System User Client Library
//!
//! Obtains a short-lived ticket for a non-interactive integration principal
//! in two stages:
//!
//! 1. Exchange the pre-shared [`SystemUserDescriptor`] for a signed token at
//!    the tenant's system user endpoint
//! 2. Verify that token against the tenant's signing keys, issuer and
//!    audience before trusting its `ticket` claim
//!
//! # Usage
//!
//! ```rust,ignore
//! use system_user_client::{ClientConfig, SecretString, SystemUserClient, SystemUserDescriptor};
//!
//! let descriptor = SystemUserDescriptor::new("online", SecretString::from("SYS-..."))?
//!     .with_context_identifier("Cust12345");
//! let client = SystemUserClient::new(descriptor, ClientConfig::default())?;
//!
//! let ticket = client.get_system_user_ticket().await?;
//! ```
//!
//! # Modules
//!
//! - `config` - Client configuration and tenant templates
//! - `descriptor` - The system user descriptor
//! - `request` - Request builder
//! - `transport` - HTTP exchange
//! - `keys` - Signing key resolution (static keys or tenant JWKS)
//! - `validator` - Token validation
//! - `claims` - Claims identity and ticket
//! - `client` - The orchestrating client
//! - `errors` - Error taxonomy

pub mod claims;
pub mod client;
pub mod config;
pub mod descriptor;
pub mod errors;
pub mod keys;
pub mod observability;
pub mod request;
pub mod transport;
pub mod validator;

pub use claims::{Claim, ClaimsIdentity, Ticket};
pub use client::SystemUserClient;
pub use common::secret::{ExposeSecret, SecretString};
pub use config::{AmbientNetwork, ClientConfig, ConfigError, TenantTemplate};
pub use descriptor::SystemUserDescriptor;
pub use errors::SystemUserError;
pub use keys::{
    JwksKeyResolver, KeyFamily, KeyResolutionError, KeyResolver, StaticKeyResolver, TenantTrust,
    VerificationKey,
};
pub use request::SystemUserRequest;
pub use transport::{TokenExchangeResult, Transport, TransportOptions};
pub use validator::{TokenValidator, ValidationFailure, ValidationOutcome};
pub use tokio_util::sync::CancellationToken;
