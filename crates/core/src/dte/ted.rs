//! Electronic stamp (TED) construction and signing.
//!
//! The stamp is a compact `<DD>` data block in a fixed, authority-mandated
//! field order, signed with SHA1-with-RSA using the CAF's private key. It
//! binds folio, parties, and total amount; a document without a valid
//! stamp cannot be legally issued.

use chrono::{DateTime, Utc};
use tributo_shared::types::to_peso_string;
use tributo_shared::DteError;

use crate::dte::caf::Caf;
use crate::dte::crypto;
use crate::dte::types::FiscalDocument;
use crate::dte::xml::{escape_text, truncate};

/// Maximum characters the stamp schema allows for the receiver name and
/// first item description.
const MAX_TEXT_FIELD: usize = 40;

/// A signed electronic stamp, ready to splice into the document body.
#[derive(Debug, Clone)]
pub struct Ted {
    /// The full `<TED>` element.
    pub xml: String,
}

/// Builds and signs the stamp for a document.
///
/// Field order inside `<DD>` is mandated by the authority and must never
/// change: issuer, type, folio, issue date, receiver, receiver name,
/// total, first item, CAF block, generation timestamp.
///
/// # Errors
///
/// Returns `DteError::Signing` when the CAF key is unusable or signing
/// fails. This is fatal for the document: the caller must roll the whole
/// issuance back (the reserved folio stays burnt).
pub fn stamp(
    caf: &Caf,
    folio: i64,
    document: &FiscalDocument,
    generated_at: DateTime<Utc>,
) -> Result<Ted, DteError> {
    if !caf.covers(folio) {
        return Err(DteError::Internal(format!(
            "Folio {folio} is outside CAF range [{}, {}]",
            caf.folio_start, caf.folio_end
        )));
    }

    let first_item = document
        .items
        .first()
        .map(|item| item.description.as_str())
        .unwrap_or_default();

    let dd = format!(
        "<DD><RE>{re}</RE><TD>{td}</TD><F>{folio}</F><FE>{fe}</FE>\
         <RR>{rr}</RR><RSR>{rsr}</RSR><MNT>{mnt}</MNT><IT1>{it1}</IT1>\
         {caf}<TSTED>{tsted}</TSTED></DD>",
        re = document.issuer.rut,
        td = document.dte_type.code(),
        fe = document.issue_date.format("%Y-%m-%d"),
        rr = document.receiver.rut,
        rsr = escape_text(&truncate(&document.receiver.legal_name, MAX_TEXT_FIELD)),
        mnt = to_peso_string(document.totals.total),
        it1 = escape_text(&truncate(first_item, MAX_TEXT_FIELD)),
        caf = caf.authorization_xml,
        tsted = generated_at.format("%Y-%m-%dT%H:%M:%S"),
    );

    let key = caf.signing_key()?;
    let signature = crypto::sha1_rsa_sign_b64(&key, dd.as_bytes())?;

    Ok(Ted {
        xml: format!(
            "<TED version=\"1.0\">{dd}<FRMT algoritmo=\"SHA1withRSA\">{signature}</FRMT></TED>"
        ),
    })
}
