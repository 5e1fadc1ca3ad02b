//! Clients for the tax authority's public endpoints.
//!
//! Two independent surfaces: the session handshake (seed, token) and the
//! document pipeline (upload, status query). Both speak the authority's
//! legacy formats: XML-wrapped payloads, cookie-carried tokens, numeric
//! status codes.

pub mod session;
pub mod upload;

pub use session::SessionClient;
pub use upload::UploadClient;

use tributo_shared::AuthorityEnvironment;

/// Resolved endpoint URLs for one authority host set.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base_url: String,
}

impl Endpoints {
    /// Endpoints for the configured environment.
    #[must_use]
    pub fn for_environment(environment: AuthorityEnvironment) -> Self {
        let host = match environment {
            AuthorityEnvironment::Certification => "maullin.sii.cl",
            AuthorityEnvironment::Production => "palena.sii.cl",
        };
        Self {
            base_url: format!("https://{host}"),
        }
    }

    /// Endpoints rooted at an arbitrary base URL. Used by tests to point
    /// the clients at a local mock server.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// Seed request endpoint.
    #[must_use]
    pub fn seed_url(&self) -> String {
        format!("{}/DTEWS/CrSeed.jws", self.base_url)
    }

    /// Seed-to-token exchange endpoint.
    #[must_use]
    pub fn token_url(&self) -> String {
        format!("{}/DTEWS/GetTokenFromSeed.jws", self.base_url)
    }

    /// Multipart document upload endpoint.
    #[must_use]
    pub fn upload_url(&self) -> String {
        format!("{}/cgi_dte/UPL/DTEUpload", self.base_url)
    }

    /// Submission status query endpoint.
    #[must_use]
    pub fn status_url(&self) -> String {
        format!("{}/DTEWS/QueryEstUp.jws", self.base_url)
    }
}
