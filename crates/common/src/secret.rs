//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used for every credential the system
//! user client handles: the pre-shared system user token, the partner
//! client secret, the signed token returned by the exchange, and the
//! extracted ticket.
//!
//! `SecretString` implements `Debug` with redaction, so a struct deriving
//! `Debug` that holds one is safe to log via `{:?}` or tracing fields.
//! Secrets are zeroized on drop.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct Descriptor {
//!     sub_domain: String,
//!     system_user_token: SecretString,
//! }
//!
//! let d = Descriptor {
//!     sub_domain: "online".to_string(),
//!     system_user_token: SecretString::from("SYS-123"),
//! };
//!
//! assert!(!format!("{d:?}").contains("SYS-123"));
//! assert_eq!(d.system_user_token.expose_secret(), "SYS-123");
//! ```

pub use secrecy::{ExposeSecret, SecretString};
