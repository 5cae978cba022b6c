//! # System User Test Utilities
//!
//! Shared test utilities for the system user client.
//!
//! This crate provides:
//! - Deterministic Ed25519 fixtures (`TestKeypair`) that sign tokens and
//!   publish themselves as JWKs
//! - A fixed RSA key (`TestRsaKeypair`) for the RS256/RS384/RS512 path
//! - A claims builder for system user tokens (`TestTokenBuilder`)
//! - A wiremock stub of the tenant's system user and JWKS endpoints
//!   (`MockSystemUserEndpoint`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use system_user_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let keypair = TestKeypair::new(1, "tenant-key");
//!     let endpoint = MockSystemUserEndpoint::start().await;
//!
//!     let token = keypair.sign(&TestTokenBuilder::for_tenant("sod").with_ticket("7T:abc").build());
//!     endpoint.mount_token("sod", &token).await;
//!     endpoint.mount_jwks("sod", &[&keypair]).await;
//! }
//! ```

pub mod crypto_fixtures;
pub mod mock_endpoint;
pub mod rsa_fixtures;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use mock_endpoint::*;
pub use rsa_fixtures::*;
pub use token_builders::*;
