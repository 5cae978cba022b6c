//! Common utilities and types shared across the system user client crates.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT utilities (header parsing, size limits, clock skew)
pub mod jwt;
