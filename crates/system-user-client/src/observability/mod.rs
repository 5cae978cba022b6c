//! Observability helpers for the system user client.
//!
//! The crate only records metrics through the `metrics` facade. Installing
//! a recorder/exporter is left to the embedding application.

pub mod metrics;
