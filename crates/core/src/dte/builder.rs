//! Document and envelope XML rendering.
//!
//! Pure, deterministic transformations: the same document and stamp always
//! produce byte-identical XML. No network or cryptographic work happens
//! here; signatures are applied afterwards by [`crate::dte::xmldsig`].

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tributo_shared::types::to_peso_string;
use tributo_shared::Rut;

use crate::dte::ted::Ted;
use crate::dte::types::FiscalDocument;
use crate::dte::xml::{escape_text, strip_declaration};

/// The authority's own receiving RUT, fixed for every envelope.
pub const AUTHORITY_RUT: &str = "60803000-K";

/// XML declaration mandated for every produced document.
const XML_DECL: &str = "<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>";

/// Renders the full document body and splices the stamp in immediately
/// before the closing tag of the `Documento` node.
#[must_use]
pub fn build(document: &FiscalDocument, folio: i64, ted: &Ted, signed_at: DateTime<Utc>) -> String {
    let type_code = document.dte_type.code();
    let mut xml = String::with_capacity(2048);

    xml.push_str(XML_DECL);
    xml.push_str("<DTE xmlns=\"http://www.sii.cl/SiiDte\" version=\"1.0\">");
    xml.push_str(&format!("<Documento ID=\"DTE-{type_code}-{folio}\">"));

    // Header: identification, issuer, receiver, totals
    xml.push_str("<Encabezado><IdDoc>");
    xml.push_str(&format!("<TipoDTE>{type_code}</TipoDTE>"));
    xml.push_str(&format!("<Folio>{folio}</Folio>"));
    xml.push_str(&format!(
        "<FchEmis>{}</FchEmis>",
        document.issue_date.format("%Y-%m-%d")
    ));
    xml.push_str("</IdDoc>");

    xml.push_str("<Emisor>");
    xml.push_str(&format!("<RUTEmisor>{}</RUTEmisor>", document.issuer.rut));
    xml.push_str(&format!(
        "<RznSoc>{}</RznSoc>",
        escape_text(&document.issuer.legal_name)
    ));
    if let Some(activity) = &document.issuer.activity {
        xml.push_str(&format!("<GiroEmis>{}</GiroEmis>", escape_text(activity)));
    }
    if let Some(address) = &document.issuer.address {
        xml.push_str(&format!("<DirOrigen>{}</DirOrigen>", escape_text(address)));
    }
    if let Some(commune) = &document.issuer.commune {
        xml.push_str(&format!(
            "<CmnaOrigen>{}</CmnaOrigen>",
            escape_text(commune)
        ));
    }
    xml.push_str("</Emisor>");

    xml.push_str("<Receptor>");
    xml.push_str(&format!("<RUTRecep>{}</RUTRecep>", document.receiver.rut));
    xml.push_str(&format!(
        "<RznSocRecep>{}</RznSocRecep>",
        escape_text(&document.receiver.legal_name)
    ));
    if let Some(address) = &document.receiver.address {
        xml.push_str(&format!("<DirRecep>{}</DirRecep>", escape_text(address)));
    }
    if let Some(commune) = &document.receiver.commune {
        xml.push_str(&format!("<CmnaRecep>{}</CmnaRecep>", escape_text(commune)));
    }
    xml.push_str("</Receptor>");

    xml.push_str("<Totales>");
    if !document.totals.net.is_zero() {
        xml.push_str(&format!(
            "<MntNeto>{}</MntNeto>",
            to_peso_string(document.totals.net)
        ));
    }
    if !document.totals.exempt.is_zero() {
        xml.push_str(&format!(
            "<MntExe>{}</MntExe>",
            to_peso_string(document.totals.exempt)
        ));
    }
    if !document.totals.tax.is_zero() {
        xml.push_str("<TasaIVA>19</TasaIVA>");
        xml.push_str(&format!("<IVA>{}</IVA>", to_peso_string(document.totals.tax)));
    }
    xml.push_str(&format!(
        "<MntTotal>{}</MntTotal>",
        to_peso_string(document.totals.total)
    ));
    xml.push_str("</Totales></Encabezado>");

    // One entry per line item, 1-based sequence numbers
    for (index, item) in document.items.iter().enumerate() {
        xml.push_str("<Detalle>");
        xml.push_str(&format!("<NroLinDet>{}</NroLinDet>", index + 1));
        if item.exempt {
            xml.push_str("<IndExe>1</IndExe>");
        }
        xml.push_str(&format!(
            "<NmbItem>{}</NmbItem>",
            escape_text(&item.description)
        ));
        xml.push_str(&format!("<QtyItem>{}</QtyItem>", decimal_str(item.quantity)));
        xml.push_str(&format!(
            "<PrcItem>{}</PrcItem>",
            decimal_str(item.unit_price)
        ));
        xml.push_str(&format!(
            "<MontoItem>{}</MontoItem>",
            to_peso_string(item.total)
        ));
        xml.push_str("</Detalle>");
    }

    // Credit/debit notes point back at the document they correct
    if let Some(reference) = &document.reference {
        xml.push_str("<Referencia><NroLinRef>1</NroLinRef>");
        xml.push_str(&format!(
            "<TpoDocRef>{}</TpoDocRef>",
            reference.referenced_type
        ));
        xml.push_str(&format!("<FolioRef>{}</FolioRef>", reference.referenced_folio));
        xml.push_str(&format!("<CodRef>{}</CodRef>", reference.reason_code));
        xml.push_str(&format!(
            "<RazonRef>{}</RazonRef>",
            escape_text(&reference.reason)
        ));
        xml.push_str("</Referencia>");
    }

    // Stamp goes immediately before the closing Documento tag
    xml.push_str(&ted.xml);
    xml.push_str(&format!(
        "<TmstFirma>{}</TmstFirma>",
        signed_at.format("%Y-%m-%dT%H:%M:%S")
    ));
    xml.push_str("</Documento></DTE>");

    xml
}

/// Batch envelope header fields.
#[derive(Debug, Clone)]
pub struct EnvelopeParams {
    /// Issuing company.
    pub issuer: Rut,
    /// Certificate holder performing the upload.
    pub sender: Rut,
    /// Authority enrollment resolution number.
    pub resolution_number: u32,
    /// Authority enrollment resolution date.
    pub resolution_date: NaiveDate,
    /// Envelope signing timestamp.
    pub signed_at: DateTime<Utc>,
}

/// Wraps signed documents into the submission envelope.
///
/// `documents` pairs each document's type code with its signed XML body;
/// per-document XML declarations are stripped because the envelope carries
/// its own.
#[must_use]
pub fn build_envelope(params: &EnvelopeParams, documents: &[(i32, &str)]) -> String {
    let mut xml = String::with_capacity(4096);

    xml.push_str(XML_DECL);
    xml.push_str("<EnvioDTE xmlns=\"http://www.sii.cl/SiiDte\" ");
    xml.push_str("xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" version=\"1.0\">");
    xml.push_str("<SetDTE ID=\"SetDoc\">");

    xml.push_str("<Caratula version=\"1.0\">");
    xml.push_str(&format!("<RutEmisor>{}</RutEmisor>", params.issuer));
    xml.push_str(&format!("<RutEnvia>{}</RutEnvia>", params.sender));
    xml.push_str(&format!("<RutReceptor>{AUTHORITY_RUT}</RutReceptor>"));
    xml.push_str(&format!(
        "<FchResol>{}</FchResol>",
        params.resolution_date.format("%Y-%m-%d")
    ));
    xml.push_str(&format!("<NroResol>{}</NroResol>", params.resolution_number));
    xml.push_str(&format!(
        "<TmstFirmaEnv>{}</TmstFirmaEnv>",
        params.signed_at.format("%Y-%m-%dT%H:%M:%S")
    ));
    for (type_code, count) in count_by_type(documents) {
        xml.push_str(&format!(
            "<SubTotDTE><TpoDTE>{type_code}</TpoDTE><NroDTE>{count}</NroDTE></SubTotDTE>"
        ));
    }
    xml.push_str("</Caratula>");

    for (_, body) in documents {
        xml.push_str(strip_declaration(body));
    }

    xml.push_str("</SetDTE></EnvioDTE>");
    xml
}

/// Counts documents per type code, preserving first-seen order.
fn count_by_type(documents: &[(i32, &str)]) -> Vec<(i32, usize)> {
    let mut counts: Vec<(i32, usize)> = Vec::new();
    for (type_code, _) in documents {
        match counts.iter_mut().find(|(t, _)| t == type_code) {
            Some((_, count)) => *count += 1,
            None => counts.push((*type_code, 1)),
        }
    }
    counts
}

/// Renders a decimal without trailing zeros.
fn decimal_str(value: Decimal) -> String {
    value.normalize().to_string()
}
