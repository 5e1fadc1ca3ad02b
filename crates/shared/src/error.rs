//! Application-wide error taxonomy for DTE issuance.
//!
//! Every failure in the issuance pipeline falls into one of these classes.
//! The classification drives operational behavior: configuration and
//! exhaustion errors block issuance and must alert an operator; transient
//! errors leave persisted state untouched and wait for the next sweep.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using `DteError`.
pub type DteResult<T> = Result<T, DteError>;

/// DTE issuance error types.
#[derive(Debug, Error)]
pub enum DteError {
    /// Missing or unreadable certificate, key, or other operator-provided
    /// material. Fatal, never retryable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No CAF covers the requested organization / document type.
    #[error("No CAF registered for organization {organization_id}, document type {dte_type}")]
    NoCafRegistered {
        /// Tenant organization.
        organization_id: Uuid,
        /// Authority document type code.
        dte_type: i32,
    },

    /// Every CAF for this document type has consumed its full folio range.
    #[error("Folio range exhausted for document type {dte_type}")]
    FolioRangeExhausted {
        /// Authority document type code.
        dte_type: i32,
    },

    /// Computed totals do not satisfy the document subtype's
    /// reconciliation rule. The document must not be signed or submitted.
    #[error("Totals reconciliation failed: {0}")]
    Reconciliation(String),

    /// Cryptographic signing failed (malformed key, signature error).
    #[error("Signing error: {0}")]
    Signing(String),

    /// The authority rejected the request with its own diagnostic code.
    #[error("Authority rejected request (code {code}): {detail}")]
    AuthorityRejected {
        /// Authority status code (e.g., non-"00" token exchange status).
        code: String,
        /// Human-readable diagnostic.
        detail: String,
    },

    /// Timeout or connection failure talking to the authority.
    /// Retryable on the next scheduled attempt.
    #[error("Transient network error: {0}")]
    Transient(String),

    /// Invalid lifecycle transition (e.g., submitting a rejected document).
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: String,
        /// Target status.
        to: String,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DteError {
    /// Returns a stable machine-readable code for logs and persisted
    /// status messages.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION",
            Self::NoCafRegistered { .. } => "NO_CAF_REGISTERED",
            Self::FolioRangeExhausted { .. } => "FOLIO_RANGE_EXHAUSTED",
            Self::Reconciliation(_) => "RECONCILIATION",
            Self::Signing(_) => "SIGNING",
            Self::AuthorityRejected { .. } => "AUTHORITY_REJECTED",
            Self::Transient(_) => "TRANSIENT",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Database(_) => "DATABASE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether the operation may succeed if re-attempted later without
    /// any operator intervention.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Database(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            DteError::Configuration(String::new()).error_code(),
            "CONFIGURATION"
        );
        assert_eq!(
            DteError::FolioRangeExhausted { dte_type: 33 }.error_code(),
            "FOLIO_RANGE_EXHAUSTED"
        );
        assert_eq!(
            DteError::NoCafRegistered {
                organization_id: Uuid::nil(),
                dte_type: 33
            }
            .error_code(),
            "NO_CAF_REGISTERED"
        );
        assert_eq!(
            DteError::AuthorityRejected {
                code: "-07".into(),
                detail: String::new()
            }
            .error_code(),
            "AUTHORITY_REJECTED"
        );
    }

    #[test]
    fn test_retryability() {
        assert!(DteError::Transient("timeout".into()).is_retryable());
        assert!(DteError::Database("pool".into()).is_retryable());

        assert!(!DteError::Configuration("no cert".into()).is_retryable());
        assert!(!DteError::FolioRangeExhausted { dte_type: 33 }.is_retryable());
        assert!(!DteError::Reconciliation("drift".into()).is_retryable());
        assert!(
            !DteError::AuthorityRejected {
                code: "-02".into(),
                detail: String::new()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            DteError::FolioRangeExhausted { dte_type: 61 }.to_string(),
            "Folio range exhausted for document type 61"
        );
        assert_eq!(
            DteError::AuthorityRejected {
                code: "-07".into(),
                detail: "bad signature".into()
            }
            .to_string(),
            "Authority rejected request (code -07): bad signature"
        );
    }
}
