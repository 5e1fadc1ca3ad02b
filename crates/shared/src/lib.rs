//! Shared types, errors, and configuration for Tributo.
//!
//! This crate provides common types used across all other crates:
//! - RUT tax identifiers with check-digit validation
//! - Integer-peso amount helpers with banker's rounding
//! - The application-wide DTE error taxonomy
//! - Configuration management

pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, AuthorityConfig, AuthorityEnvironment, SigningConfig, SweepConfig};
pub use error::{DteError, DteResult};
pub use types::Rut;
