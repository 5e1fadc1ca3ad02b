//! Issuance orchestrator.
//!
//! Sequences the pipeline over two persistence seams ([`FolioAllocator`],
//! [`DocumentStore`]) and the authority clients. The service owns no
//! storage and no HTTP server; callers compose it with concrete
//! implementations at startup.
//!
//! A reserved folio is never returned to the pool. When any step after
//! reservation fails, the document is recorded as rejected with the burnt
//! folio attached, and a retry starts over with a fresh folio. Gaps in
//! the folio sequence are legal; reuse is not.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, instrument, warn};
use tributo_shared::{AuthorityConfig, DteError, DteResult, SigningConfig};
use uuid::Uuid;

use crate::dte::authority::{Endpoints, SessionClient, UploadClient};
use crate::dte::builder::{self, EnvelopeParams};
use crate::dte::caf::Caf;
use crate::dte::credentials::Credentials;
use crate::dte::ted;
use crate::dte::totals::TotalsPolicy;
use crate::dte::types::{
    AuthorityState, DteStatus, DteType, FiscalDocument, SentDocument, SignedDocument,
};
use crate::dte::xmldsig::{self, SignatureTarget};

/// Prefix of synthetic tracking identifiers produced in mock mode.
pub const MOCK_TRACK_PREFIX: &str = "MOCK-";

/// Marker comment embedded in mock-mode documents.
const MOCK_MARKER: &str = "<!--MOCK DOCUMENT: NOT SIGNED, NOT LEGALLY VALID-->";

/// A folio reserved from a CAF, together with the CAF that backs it.
#[derive(Debug, Clone)]
pub struct ReservedFolio {
    /// The reserved folio number.
    pub folio: i64,
    /// The CAF the folio was drawn from.
    pub caf: Caf,
}

/// Atomic folio reservation.
#[async_trait]
pub trait FolioAllocator: Send + Sync {
    /// Reserves the next unused folio for an organization and document
    /// type. Two concurrent calls must never observe the same folio.
    ///
    /// # Errors
    ///
    /// `DteError::NoCafRegistered` when no CAF covers the pair,
    /// `FolioRangeExhausted` when every registered CAF is spent,
    /// `Database` on storage failures.
    async fn reserve_folio(
        &self,
        organization_id: Uuid,
        dte_type: DteType,
    ) -> DteResult<ReservedFolio>;
}

/// Persistence of document lifecycle state.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Current lifecycle status of a document.
    async fn status_of(&self, document_id: Uuid) -> DteResult<DteStatus>;

    /// Records a successful issuance: folio, signed XML, GENERATED.
    async fn record_generated(
        &self,
        document: &FiscalDocument,
        signed: &SignedDocument,
    ) -> DteResult<()>;

    /// Records an irrecoverable failure: REJECTED, with the burnt folio
    /// when one was reserved.
    async fn record_rejected(
        &self,
        document_id: Uuid,
        folio: Option<i64>,
        message: &str,
    ) -> DteResult<()>;

    /// Loads the signed XML of a GENERATED document.
    async fn load_generated(&self, document_id: Uuid) -> DteResult<SignedDocument>;

    /// Records a successful upload: SENT with its tracking identifier.
    async fn record_sent(&self, document_id: Uuid, track_id: &str) -> DteResult<()>;

    /// Records the authority's terminal verdict on a SENT document.
    async fn record_verdict(
        &self,
        document_id: Uuid,
        state: AuthorityState,
        message: Option<&str>,
    ) -> DteResult<()>;

    /// SENT documents awaiting a verdict, oldest first, bounded.
    async fn list_sent(&self, limit: u64) -> DteResult<Vec<SentDocument>>;
}

/// Whether the service talks to the real authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuerMode {
    /// Full pipeline against the configured authority host.
    Live,
    /// No credentials configured: local pipeline only, synthetic
    /// submission results. For development and staging.
    Mock,
}

/// Outcome of [`DteService::issue`].
#[derive(Debug, Clone)]
pub struct IssueOutcome {
    /// The issued document.
    pub document_id: Uuid,
    /// Folio consumed from the CAF.
    pub folio: i64,
    /// Resulting status (always GENERATED on success).
    pub status: DteStatus,
}

/// Outcome of [`DteService::submit`].
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    /// The submitted document.
    pub document_id: Uuid,
    /// Authority tracking identifier (synthetic in mock mode).
    pub track_id: String,
    /// Resulting status (always SENT on success).
    pub status: DteStatus,
}

/// The issuance orchestrator.
pub struct DteService {
    allocator: Arc<dyn FolioAllocator>,
    store: Arc<dyn DocumentStore>,
    session: SessionClient,
    upload: UploadClient,
    signing: SigningConfig,
    authority: AuthorityConfig,
    mode: IssuerMode,
}

impl DteService {
    /// Composes the service from its seams and configuration.
    ///
    /// The mode is fixed here: mock when certificate material is absent,
    /// live otherwise. It never changes at runtime.
    ///
    /// # Errors
    ///
    /// Returns `DteError::Configuration` when the HTTP client cannot be
    /// built from the configured timeout.
    pub fn new(
        allocator: Arc<dyn FolioAllocator>,
        store: Arc<dyn DocumentStore>,
        authority: &AuthorityConfig,
        signing: SigningConfig,
    ) -> DteResult<Self> {
        let endpoints = Endpoints::for_environment(authority.environment);
        Self::with_endpoints(allocator, store, authority, signing, endpoints)
    }

    /// Like [`Self::new`] with explicit endpoints, for pointing the
    /// clients at a non-default host.
    ///
    /// # Errors
    ///
    /// Returns `DteError::Configuration` when the HTTP client cannot be
    /// built.
    pub fn with_endpoints(
        allocator: Arc<dyn FolioAllocator>,
        store: Arc<dyn DocumentStore>,
        authority: &AuthorityConfig,
        signing: SigningConfig,
        endpoints: Endpoints,
    ) -> DteResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(authority.timeout_secs))
            .build()
            .map_err(|e| DteError::Configuration(format!("Cannot build HTTP client: {e}")))?;

        let mode = if signing.has_credentials() {
            IssuerMode::Live
        } else {
            IssuerMode::Mock
        };

        Ok(Self {
            allocator,
            store,
            session: SessionClient::new(http.clone(), endpoints.clone()),
            upload: UploadClient::new(http, endpoints),
            signing,
            authority: authority.clone(),
            mode,
        })
    }

    /// The mode fixed at construction.
    #[must_use]
    pub const fn mode(&self) -> IssuerMode {
        self.mode
    }

    /// Issues a document: validates totals, reserves a folio, stamps,
    /// builds, and signs. PENDING -> GENERATED.
    ///
    /// Reconciliation failures happen before reservation and burn
    /// nothing. Failures after reservation record the document as
    /// REJECTED with the burnt folio and are final for this attempt.
    ///
    /// # Errors
    ///
    /// `Reconciliation`, `NoCafRegistered`, `FolioRangeExhausted`,
    /// `Signing`, `InvalidTransition` (document not PENDING), `Database`.
    #[instrument(skip(self, document), fields(document_id = %document.id, dte_type = document.dte_type.code()))]
    pub async fn issue(&self, document: &FiscalDocument) -> DteResult<IssueOutcome> {
        let current = self.store.status_of(document.id).await?;
        DteStatus::transition(current, DteStatus::Generated)?;

        // Validate before touching the folio pool
        TotalsPolicy::for_type(document.dte_type).validate(&document.items, &document.totals)?;

        let reserved = self
            .allocator
            .reserve_folio(document.organization_id, document.dte_type)
            .await?;
        info!(folio = reserved.folio, "Folio reserved");

        let generated_at = Utc::now();
        let xml = match self.produce(document, &reserved, generated_at) {
            Ok(xml) => xml,
            Err(err) => {
                warn!(folio = reserved.folio, error = %err, "Issuance failed after reservation; folio is burnt");
                self.store
                    .record_rejected(
                        document.id,
                        Some(reserved.folio),
                        &format!("{}: {err}", err.error_code()),
                    )
                    .await?;
                return Err(err);
            }
        };

        let signed = SignedDocument {
            document_id: document.id,
            folio: reserved.folio,
            xml,
            generated_at,
        };
        self.store.record_generated(document, &signed).await?;
        info!(folio = signed.folio, "Document generated");

        Ok(IssueOutcome {
            document_id: document.id,
            folio: signed.folio,
            status: DteStatus::Generated,
        })
    }

    /// Stamp, build, and sign. Pure local work.
    fn produce(
        &self,
        document: &FiscalDocument,
        reserved: &ReservedFolio,
        generated_at: chrono::DateTime<Utc>,
    ) -> DteResult<String> {
        let stamp = ted::stamp(&reserved.caf, reserved.folio, document, generated_at)?;
        let xml = builder::build(document, reserved.folio, &stamp, generated_at);

        match self.mode {
            IssuerMode::Live => {
                let credentials = Credentials::load(&self.signing)?;
                let target = SignatureTarget::DocumentRoot {
                    id: format!("DTE-{}-{}", document.dte_type.code(), reserved.folio),
                };
                xmldsig::sign(&xml, &target, &credentials)
            }
            IssuerMode::Mock => Ok(mark_mock(&xml)),
        }
    }

    /// Submits a GENERATED document. GENERATED -> SENT.
    ///
    /// A document that is already SENT, ACCEPTED, or REJECTED is refused;
    /// correcting a signed document means issuing a credit or debit note,
    /// never re-submitting.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` when the document is not GENERATED.
    /// `Transient` failures leave the document GENERATED for a later
    /// retry; non-retryable failures record it as REJECTED.
    #[instrument(skip(self, document), fields(document_id = %document.id))]
    pub async fn submit(&self, document: &FiscalDocument) -> DteResult<SubmitOutcome> {
        let current = self.store.status_of(document.id).await?;
        DteStatus::transition(current, DteStatus::Sent)?;

        let signed = self.store.load_generated(document.id).await?;

        let track_id = match self.mode {
            IssuerMode::Mock => format!("{MOCK_TRACK_PREFIX}{}", document.id.simple()),
            IssuerMode::Live => match self.upload_live(document, &signed).await {
                Ok(track_id) => track_id,
                Err(err) if err.is_retryable() => {
                    warn!(error = %err, "Submission failed; document stays GENERATED");
                    return Err(err);
                }
                Err(err) => {
                    warn!(error = %err, "Submission rejected irrecoverably");
                    self.store
                        .record_rejected(
                            document.id,
                            Some(signed.folio),
                            &format!("{}: {err}", err.error_code()),
                        )
                        .await?;
                    return Err(err);
                }
            },
        };

        self.store.record_sent(document.id, &track_id).await?;
        info!(%track_id, "Document sent");

        Ok(SubmitOutcome {
            document_id: document.id,
            track_id,
            status: DteStatus::Sent,
        })
    }

    /// Envelope, sign, authenticate, upload.
    async fn upload_live(
        &self,
        document: &FiscalDocument,
        signed: &SignedDocument,
    ) -> DteResult<String> {
        let credentials = Credentials::load(&self.signing)?;
        let issuer = document.issuer.rut;
        let sender = self.signing.sender_rut.unwrap_or(issuer);

        let params = EnvelopeParams {
            issuer,
            sender,
            resolution_number: self.authority.resolution_number,
            resolution_date: self.authority.resolution_date,
            signed_at: Utc::now(),
        };
        let envelope = builder::build_envelope(&params, &[(document.dte_type.code(), &signed.xml)]);
        let envelope = xmldsig::sign(
            &envelope,
            &SignatureTarget::Envelope {
                id: "SetDoc".to_string(),
            },
            &credentials,
        )?;

        let token = self.session.authenticate(&credentials).await?;
        let file_name = format!("envio_{}_{}.xml", document.dte_type.code(), signed.folio);
        self.upload
            .submit(&token, issuer, sender, &file_name, &envelope)
            .await
    }

    /// Polls the authority for a SENT document's verdict. SENT ->
    /// ACCEPTED | REJECTED; an in-flight answer changes nothing.
    ///
    /// # Errors
    ///
    /// `Transient` for network failures (the document stays SENT),
    /// `AuthorityRejected` for malformed status responses, `Database` on
    /// persistence failures.
    #[instrument(skip(self, sent), fields(document_id = %sent.document_id, track_id = %sent.track_id))]
    pub async fn poll(&self, sent: &SentDocument) -> DteResult<AuthorityState> {
        let (state, message) = match self.mode {
            IssuerMode::Mock => (
                AuthorityState::Accepted,
                Some("Mock acceptance".to_string()),
            ),
            IssuerMode::Live => {
                let credentials = Credentials::load(&self.signing)?;
                let token = self.session.authenticate(&credentials).await?;
                let report = self
                    .upload
                    .check_status(&token, sent.issuer, &sent.track_id)
                    .await?;
                (report.state, report.message)
            }
        };

        match state {
            AuthorityState::Processing => {
                info!("Still processing");
            }
            AuthorityState::Accepted | AuthorityState::Rejected => {
                self.store
                    .record_verdict(sent.document_id, state, message.as_deref())
                    .await?;
                info!(?state, "Verdict recorded");
            }
        }
        Ok(state)
    }

    /// SENT documents awaiting a verdict, for the polling sweep.
    ///
    /// # Errors
    ///
    /// `Database` on storage failures.
    pub async fn pending_verdicts(&self, limit: u64) -> DteResult<Vec<SentDocument>> {
        self.store.list_sent(limit).await
    }
}

/// Inserts the mock marker right after the XML declaration.
fn mark_mock(xml: &str) -> String {
    match xml.find("?>") {
        Some(end) => format!("{}{MOCK_MARKER}{}", &xml[..end + 2], &xml[end + 2..]),
        None => format!("{MOCK_MARKER}{xml}"),
    }
}
