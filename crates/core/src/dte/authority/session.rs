//! Session handshake: seed, signed seed, token.
//!
//! Every authenticated call to the authority needs a token, and every
//! token starts from a single-use seed. The flow is always the full
//! three steps; tokens are deliberately never cached, because their
//! server-side lifetime is opaque and a stale token fails in ways that
//! are indistinguishable from certificate problems.

use tracing::{debug, instrument};
use tributo_shared::DteError;

use crate::dte::authority::Endpoints;
use crate::dte::credentials::Credentials;
use crate::dte::xml::find_tag_text;
use crate::dte::xmldsig::{self, SignatureTarget};

/// Client for the seed/token endpoints.
#[derive(Debug, Clone)]
pub struct SessionClient {
    http: reqwest::Client,
    endpoints: Endpoints,
}

impl SessionClient {
    /// Builds a session client over a shared HTTP client.
    #[must_use]
    pub fn new(http: reqwest::Client, endpoints: Endpoints) -> Self {
        Self { http, endpoints }
    }

    /// Runs the full handshake and returns a fresh token.
    ///
    /// # Errors
    ///
    /// `DteError::Transient` for network failures, `Signing` when the
    /// seed request cannot be signed, `AuthorityRejected` when either
    /// endpoint answers with a non-success status.
    #[instrument(skip(self, credentials))]
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<String, DteError> {
        let seed = self.fetch_seed().await?;
        debug!(seed_len = seed.len(), "Obtained seed");
        self.exchange_seed(&seed, credentials).await
    }

    /// Requests a single-use seed: an argument-less SOAP call.
    async fn fetch_seed(&self) -> Result<String, DteError> {
        let body = self
            .soap_call(self.endpoints.seed_url(), &soap_envelope("<getSeed/>"))
            .await?;

        check_status(&body)?;
        find_tag_text(&body, "SEMILLA").ok_or_else(|| {
            DteError::AuthorityRejected {
                code: "NO_SEED".to_string(),
                detail: "Seed response carried no <SEMILLA>".to_string(),
            }
        })
    }

    /// Signs the seed and exchanges it for a token.
    async fn exchange_seed(
        &self,
        seed: &str,
        credentials: &Credentials,
    ) -> Result<String, DteError> {
        let request = format!("<getToken><item><Semilla>{seed}</Semilla></item></getToken>");
        let signed = xmldsig::sign(&request, &SignatureTarget::RequestRoot, credentials)?;

        // The signed request travels as a CDATA argument of the SOAP call,
        // so its markup survives the outer envelope untouched.
        let envelope =
            soap_envelope(&format!("<getToken><pszXml><![CDATA[{signed}]]></pszXml></getToken>"));
        let body = self.soap_call(self.endpoints.token_url(), &envelope).await?;

        check_status(&body)?;
        find_tag_text(&body, "TOKEN").ok_or_else(|| {
            DteError::AuthorityRejected {
                code: "NO_TOKEN".to_string(),
                detail: "Token response carried no <TOKEN>".to_string(),
            }
        })
    }

    /// Posts a SOAP envelope and returns the response body as text.
    async fn soap_call(&self, url: String, envelope: &str) -> Result<String, DteError> {
        self.http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "text/xml; charset=UTF-8")
            .header("SOAPAction", "\"\"")
            .body(envelope.to_string())
            .send()
            .await
            .map_err(transient)?
            .text()
            .await
            .map_err(transient)
    }
}

/// Wraps a call body in the SOAP 1.1 envelope the handshake endpoints
/// expect.
fn soap_envelope(body: &str) -> String {
    format!(
        "<SOAP-ENV:Envelope xmlns:SOAP-ENV=\"http://schemas.xmlsoap.org/soap/envelope/\">\
         <SOAP-ENV:Body>{body}</SOAP-ENV:Body></SOAP-ENV:Envelope>"
    )
}

/// Maps the `<ESTADO>` code of a handshake response; `"00"` is success.
fn check_status(body: &str) -> Result<(), DteError> {
    let Some(code) = find_tag_text(body, "ESTADO") else {
        return Err(DteError::AuthorityRejected {
            code: "NO_STATUS".to_string(),
            detail: "Response carried no <ESTADO>".to_string(),
        });
    };

    if code == "00" {
        return Ok(());
    }

    let detail = find_tag_text(body, "GLOSA").unwrap_or_else(|| {
        match code.as_str() {
            "-02" => "Malformed request",
            "-06" => "Invalid or revoked certificate",
            "-07" => "Invalid request signature",
            _ => "Authority refused the request",
        }
        .to_string()
    });

    Err(DteError::AuthorityRejected { code, detail })
}

/// Wraps a reqwest failure as retryable.
fn transient(err: reqwest::Error) -> DteError {
    DteError::Transient(format!("Authority call failed: {err}"))
}
