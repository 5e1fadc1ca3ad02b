//! Application configuration management.

use std::path::PathBuf;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::types::Rut;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Tax authority endpoint configuration.
    pub authority: AuthorityConfig,
    /// Enrollment certificate / key material.
    #[serde(default)]
    pub signing: SigningConfig,
    /// Background status-polling sweep configuration.
    #[serde(default)]
    pub sweep: SweepConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Which authority host set to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorityEnvironment {
    /// Test environment (maullin).
    Certification,
    /// Production environment (palena).
    Production,
}

/// Tax authority endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorityConfig {
    /// Environment selection (certification or production host set).
    pub environment: AuthorityEnvironment,
    /// Per-call network timeout in seconds. Short by design: there is no
    /// retry inside a call, only at the next sweep.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Enrollment resolution number, echoed in every submission envelope.
    #[serde(default)]
    pub resolution_number: u32,
    /// Enrollment resolution date, echoed in every submission envelope.
    #[serde(default = "default_resolution_date")]
    pub resolution_date: NaiveDate,
}

fn default_resolution_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Enrollment certificate and key material for authority authentication.
///
/// When either path is absent the orchestrator runs in mock mode: issuance
/// and submission produce synthetic, clearly-marked results. When both are
/// present the live path is always taken.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SigningConfig {
    /// PEM certificate path.
    #[serde(default)]
    pub cert_path: Option<PathBuf>,
    /// PEM private key path.
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    /// RUT of the certificate holder, used as the envelope sender.
    #[serde(default)]
    pub sender_rut: Option<Rut>,
}

impl SigningConfig {
    /// True when both certificate and key paths are configured.
    #[must_use]
    pub const fn has_credentials(&self) -> bool {
        self.cert_path.is_some() && self.key_path.is_some()
    }
}

/// Background status-polling sweep configuration.
///
/// Intervals are injectable so tests can run the sweep with millisecond
/// ticks instead of production minutes.
#[derive(Debug, Clone, Deserialize)]
pub struct SweepConfig {
    /// Seconds between sweeps.
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
    /// Maximum number of SENT documents polled per sweep.
    #[serde(default = "default_sweep_batch")]
    pub batch_size: u64,
    /// Milliseconds to pause between consecutive status queries, to avoid
    /// hammering the authority endpoint.
    #[serde(default = "default_inter_call_delay")]
    pub inter_call_delay_ms: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval(),
            batch_size: default_sweep_batch(),
            inter_call_delay_ms: default_inter_call_delay(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    300 // 5 minutes
}

fn default_sweep_batch() -> u64 {
    25
}

fn default_inter_call_delay() -> u64 {
    500
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("TRIBUTO").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
