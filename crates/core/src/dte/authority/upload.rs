//! Document pipeline: multipart upload and status query.

use reqwest::multipart::{Form, Part};
use tracing::{debug, instrument};
use tributo_shared::{DteError, Rut};

use crate::dte::authority::Endpoints;
use crate::dte::types::AuthorityState;
use crate::dte::xml::find_tag_text;

/// The authority's upload gateway predates modern browsers and rejects
/// unknown user agents outright.
const USER_AGENT: &str = "Mozilla/4.0 (compatible; PROG 1.0; Tributo)";

/// Outcome of a status query.
#[derive(Debug, Clone)]
pub struct StatusReport {
    /// Terminal or in-flight verdict.
    pub state: AuthorityState,
    /// The authority's human-readable gloss, when present.
    pub message: Option<String>,
}

/// Client for the upload and status endpoints.
#[derive(Debug, Clone)]
pub struct UploadClient {
    http: reqwest::Client,
    endpoints: Endpoints,
}

impl UploadClient {
    /// Builds an upload client over a shared HTTP client.
    #[must_use]
    pub fn new(http: reqwest::Client, endpoints: Endpoints) -> Self {
        Self { http, endpoints }
    }

    /// Uploads a signed envelope and returns the tracking identifier.
    ///
    /// The envelope is sent as a Latin-1 file part; the gateway does not
    /// accept UTF-8 payloads.
    ///
    /// # Errors
    ///
    /// `DteError::Transient` for network failures, `AuthorityRejected`
    /// when the gateway answers with a non-zero reception status or no
    /// tracking identifier.
    #[instrument(skip(self, token, envelope_xml), fields(issuer = %issuer))]
    pub async fn submit(
        &self,
        token: &str,
        issuer: Rut,
        sender: Rut,
        file_name: &str,
        envelope_xml: &str,
    ) -> Result<String, DteError> {
        // WINDOWS_1252 is the Latin-1 superset the gateway actually
        // decodes with.
        let (encoded, _, _) = encoding_rs::WINDOWS_1252.encode(envelope_xml);
        let archive = Part::bytes(encoded.into_owned())
            .file_name(file_name.to_string())
            .mime_str("text/xml")
            .map_err(|e| DteError::Internal(format!("Cannot build upload part: {e}")))?;

        let form = Form::new()
            .text("rutSender", sender.body().to_string())
            .text("dvSender", sender.dv().to_string())
            .text("rutCompany", issuer.body().to_string())
            .text("dvCompany", issuer.dv().to_string())
            .part("archivo", archive);

        let body = self
            .http
            .post(self.endpoints.upload_url())
            .header(reqwest::header::COOKIE, format!("TOKEN={token}"))
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .multipart(form)
            .send()
            .await
            .map_err(transient)?
            .text()
            .await
            .map_err(transient)?;

        check_reception(&body)?;
        let track_id = find_tag_text(&body, "TRACKID").ok_or_else(|| {
            DteError::AuthorityRejected {
                code: "NO_TRACKID".to_string(),
                detail: "Upload response carried no <TRACKID>".to_string(),
            }
        })?;
        debug!(%track_id, "Envelope accepted for processing");
        Ok(track_id)
    }

    /// Queries the processing status of a prior upload.
    ///
    /// # Errors
    ///
    /// `DteError::Transient` for network failures, `AuthorityRejected`
    /// when the response carries no status at all.
    #[instrument(skip(self, token), fields(issuer = %issuer, %track_id))]
    pub async fn check_status(
        &self,
        token: &str,
        issuer: Rut,
        track_id: &str,
    ) -> Result<StatusReport, DteError> {
        let body = self
            .http
            .get(self.endpoints.status_url())
            .query(&[
                ("rut", issuer.body().to_string()),
                ("dv", issuer.dv().to_string()),
                ("trackId", track_id.to_string()),
            ])
            .header(reqwest::header::COOKIE, format!("TOKEN={token}"))
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(transient)?
            .text()
            .await
            .map_err(transient)?;

        let code = find_tag_text(&body, "ESTADO").ok_or_else(|| {
            DteError::AuthorityRejected {
                code: "NO_STATUS".to_string(),
                detail: "Status response carried no <ESTADO>".to_string(),
            }
        })?;

        Ok(StatusReport {
            state: map_processing_state(&code),
            message: find_tag_text(&body, "GLOSA"),
        })
    }
}

/// Maps a processing status code to a verdict. Unknown codes stay
/// in-flight so the sweep keeps polling instead of guessing.
fn map_processing_state(code: &str) -> AuthorityState {
    match code {
        "EPR" => AuthorityState::Accepted,
        "RCT" | "RFR" | "RSC" | "RPR" => AuthorityState::Rejected,
        _ => AuthorityState::Processing,
    }
}

/// Checks the `<STATUS>` of a reception receipt; `0` means queued.
fn check_reception(body: &str) -> Result<(), DteError> {
    let Some(code) = find_tag_text(body, "STATUS") else {
        return Err(DteError::AuthorityRejected {
            code: "NO_RECEPTION_STATUS".to_string(),
            detail: "Upload response carried no <STATUS>".to_string(),
        });
    };

    if code == "0" {
        return Ok(());
    }

    let detail = match code.as_str() {
        "1" => "Sender not authorized to upload for this company",
        "2" => "Upload file is damaged or empty",
        "3" => "Upload file exceeds the size limit",
        "5" => "Session not authenticated",
        _ => "Gateway refused the upload",
    };
    Err(DteError::AuthorityRejected {
        code,
        detail: detail.to_string(),
    })
}

/// Wraps a reqwest failure as retryable.
fn transient(err: reqwest::Error) -> DteError {
    DteError::Transient(format!("Authority call failed: {err}"))
}
