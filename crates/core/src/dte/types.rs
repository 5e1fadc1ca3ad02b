//! Domain types for electronic tax documents.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tributo_shared::{DteError, Rut};
use uuid::Uuid;

/// Authority document type codes modeled by this system.
///
/// Only the minimum set needed to issue an invoice, credit note, debit
/// note, or receipt is covered; the authority's full catalogue is out of
/// scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DteType {
    /// Electronic invoice (33).
    Invoice,
    /// Tax-exempt electronic invoice (34).
    ExemptInvoice,
    /// Electronic receipt / boleta (39).
    Receipt,
    /// Electronic debit note (56).
    DebitNote,
    /// Electronic credit note (61).
    CreditNote,
}

impl DteType {
    /// The authority's numeric type code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Invoice => 33,
            Self::ExemptInvoice => 34,
            Self::Receipt => 39,
            Self::DebitNote => 56,
            Self::CreditNote => 61,
        }
    }

    /// Maps an authority type code back to a `DteType`.
    ///
    /// # Errors
    ///
    /// Returns `DteError::Internal` for codes outside the modeled set.
    pub fn from_code(code: i32) -> Result<Self, DteError> {
        match code {
            33 => Ok(Self::Invoice),
            34 => Ok(Self::ExemptInvoice),
            39 => Ok(Self::Receipt),
            56 => Ok(Self::DebitNote),
            61 => Ok(Self::CreditNote),
            other => Err(DteError::Internal(format!(
                "Unsupported DTE type code: {other}"
            ))),
        }
    }
}

/// Lifecycle status of a fiscal document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DteStatus {
    /// Created from an invoice, not yet issued.
    Pending,
    /// Folio assigned, stamped, built, and signed.
    Generated,
    /// Uploaded to the authority; awaiting acceptance.
    Sent,
    /// Accepted by the authority. Terminal.
    Accepted,
    /// Rejected by the authority or failed irrecoverably. Terminal.
    Rejected,
}

impl DteStatus {
    /// Stable string form, used for persistence and status messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Generated => "GENERATED",
            Self::Sent => "SENT",
            Self::Accepted => "ACCEPTED",
            Self::Rejected => "REJECTED",
        }
    }

    /// Parses the persisted string form.
    ///
    /// # Errors
    ///
    /// Returns `DteError::Internal` for unknown values.
    pub fn parse(value: &str) -> Result<Self, DteError> {
        match value {
            "PENDING" => Ok(Self::Pending),
            "GENERATED" => Ok(Self::Generated),
            "SENT" => Ok(Self::Sent),
            "ACCEPTED" => Ok(Self::Accepted),
            "REJECTED" => Ok(Self::Rejected),
            other => Err(DteError::Internal(format!("Unknown DTE status: {other}"))),
        }
    }

    /// Check if a status transition is valid.
    ///
    /// Valid transitions:
    /// - Pending -> Generated (issue)
    /// - Pending -> Rejected (issue failed after folio reservation;
    ///   the folio stays burnt)
    /// - Generated -> Sent (submit)
    /// - Generated -> Rejected (submit failed irrecoverably)
    /// - Sent -> Accepted | Rejected (poll)
    #[must_use]
    pub fn is_valid_transition(from: Self, to: Self) -> bool {
        matches!(
            (from, to),
            (Self::Pending, Self::Generated | Self::Rejected)
                | (Self::Generated, Self::Sent | Self::Rejected)
                | (Self::Sent, Self::Accepted | Self::Rejected)
        )
    }

    /// Validates a transition, producing a typed error on violation.
    ///
    /// # Errors
    ///
    /// Returns `DteError::InvalidTransition` if the transition is not in
    /// the lifecycle table.
    pub fn transition(from: Self, to: Self) -> Result<Self, DteError> {
        if Self::is_valid_transition(from, to) {
            Ok(to)
        } else {
            Err(DteError::InvalidTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }
}

/// Acceptance state reported by the authority for a submitted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorityState {
    /// The batch was accepted.
    Accepted,
    /// The batch was rejected; the document will not become valid.
    Rejected,
    /// Still in the authority's queue; poll again later.
    Processing,
}

/// A party to a document: issuer or receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    /// Tax identifier.
    pub rut: Rut,
    /// Legal name.
    pub legal_name: String,
    /// Line of business, required for issuers.
    #[serde(default)]
    pub activity: Option<String>,
    /// Street address.
    #[serde(default)]
    pub address: Option<String>,
    /// Commune.
    #[serde(default)]
    pub commune: Option<String>,
}

/// A single priced line of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Item description.
    pub description: String,
    /// Quantity.
    pub quantity: Decimal,
    /// Unit price.
    pub unit_price: Decimal,
    /// Line total (quantity x unit price, pre-rounded by the pricing
    /// layer).
    pub total: Decimal,
    /// Tax-exempt lines contribute zero to the tax total regardless of
    /// price.
    #[serde(default)]
    pub exempt: bool,
}

/// Monetary totals of a document, in whole pesos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    /// Net (taxed) amount.
    pub net: Decimal,
    /// Tax-exempt amount.
    pub exempt: Decimal,
    /// Tax amount.
    pub tax: Decimal,
    /// Global discount applied before tax.
    pub discount: Decimal,
    /// Grand total.
    pub total: Decimal,
}

/// Reference from a correcting document to the original one.
///
/// A signed document is immutable; a correction is always a new credit or
/// debit note pointing back at the original, never an edit in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Type code of the referenced document.
    pub referenced_type: i32,
    /// Folio of the referenced document.
    pub referenced_folio: i64,
    /// Authority reference-reason code (1 = voids, 2 = corrects text,
    /// 3 = corrects amounts).
    pub reason_code: i32,
    /// Free-text reason.
    pub reason: String,
}

/// Read-only issuance view of a fully priced invoice, as handed over by
/// the invoice CRUD layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiscalDocument {
    /// Document id in the business layer.
    pub id: Uuid,
    /// Tenant organization.
    pub organization_id: Uuid,
    /// Authority document type.
    pub dte_type: DteType,
    /// Issue date.
    pub issue_date: NaiveDate,
    /// Issuing company.
    pub issuer: Party,
    /// Receiving party.
    pub receiver: Party,
    /// Ordered line items.
    pub items: Vec<LineItem>,
    /// Pre-computed totals to reconcile against.
    pub totals: Totals,
    /// Reference to an original document (credit/debit notes).
    #[serde(default)]
    pub reference: Option<Reference>,
}

/// An issued, signed document. Immutable once produced.
#[derive(Debug, Clone)]
pub struct SignedDocument {
    /// Document id in the business layer.
    pub document_id: Uuid,
    /// Assigned folio.
    pub folio: i64,
    /// Full signed XML body.
    pub xml: String,
    /// Production timestamp.
    pub generated_at: DateTime<Utc>,
}

/// A document awaiting acceptance, as selected by the polling sweep.
#[derive(Debug, Clone)]
pub struct SentDocument {
    /// Document id in the business layer.
    pub document_id: Uuid,
    /// Tenant organization.
    pub organization_id: Uuid,
    /// Issuing company tax id (status queries are keyed by it).
    pub issuer: Rut,
    /// Authority tracking identifier.
    pub track_id: String,
}
