//! Enveloped XML signatures in the authority's profile.
//!
//! The authority verifies a fixed XML-DSig shape: SHA-1 digests, RSA
//! (PKCS#1 v1.5) signature values, and a `KeyInfo` carrying both the raw
//! RSA key values and the signer certificate. Three placements exist, one
//! per signed artifact, and they differ in what the `Reference` points at
//! and where the `Signature` element lands.

use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};
use tributo_shared::DteError;

use crate::dte::credentials::Credentials;
use crate::dte::crypto;
use crate::dte::xml::{find_element_raw, find_tag_text, strip_declaration};

const DSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
const C14N_ALGORITHM: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";
const ENVELOPED_TRANSFORM: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

/// Where a signature lives and what its `Reference` digests.
#[derive(Debug, Clone)]
pub enum SignatureTarget {
    /// One document: digests `<Documento ID="…">`, lands before `</DTE>`.
    DocumentRoot {
        /// The `ID` attribute of the `Documento` element.
        id: String,
    },
    /// Token request: digests the whole request with the enveloped
    /// transform (`URI=""`), lands before `</getToken>`.
    RequestRoot,
    /// Submission batch: digests `<SetDTE ID="…">`, lands before
    /// `</EnvioDTE>` as a sibling of `SetDTE`.
    Envelope {
        /// The `ID` attribute of the `SetDTE` element.
        id: String,
    },
}

impl SignatureTarget {
    fn closing_tag(&self) -> &'static str {
        match self {
            Self::DocumentRoot { .. } => "</DTE>",
            Self::RequestRoot => "</getToken>",
            Self::Envelope { .. } => "</EnvioDTE>",
        }
    }
}

/// Signs `xml` in place, returning the document with the `Signature`
/// element inserted at the target's mandated position.
///
/// # Errors
///
/// Returns `DteError::Signing` when the referenced element cannot be
/// found or the RSA operation fails. Issuance must abort; a document
/// with a broken signature is worse than no document.
pub fn sign(
    xml: &str,
    target: &SignatureTarget,
    credentials: &Credentials,
) -> Result<String, DteError> {
    let xml = canonicalize(xml);

    let (uri, digest_input, transforms) = match target {
        SignatureTarget::DocumentRoot { id } | SignatureTarget::Envelope { id } => (
            format!("#{id}"),
            find_element_by_id(&xml, id).ok_or_else(|| {
                DteError::Signing(format!("No element with ID=\"{id}\" to sign"))
            })?,
            String::new(),
        ),
        SignatureTarget::RequestRoot => (
            String::new(),
            strip_declaration(&xml).to_string(),
            format!(
                "<Transforms><Transform Algorithm=\"{ENVELOPED_TRANSFORM}\"/></Transforms>"
            ),
        ),
    };

    let digest = crypto::sha1_digest_b64(digest_input.as_bytes());

    // SignedInfo carries the dsig namespace itself so the bytes signed
    // here are the bytes a verifier reconstructs.
    let signed_info = format!(
        "<SignedInfo xmlns=\"{DSIG_NS}\">\
         <CanonicalizationMethod Algorithm=\"{C14N_ALGORITHM}\"/>\
         <SignatureMethod Algorithm=\"{DSIG_NS}rsa-sha1\"/>\
         <Reference URI=\"{uri}\">{transforms}\
         <DigestMethod Algorithm=\"{DSIG_NS}sha1\"/>\
         <DigestValue>{digest}</DigestValue>\
         </Reference></SignedInfo>"
    );

    let signature_value = crypto::sha1_rsa_sign_b64(&credentials.private_key, signed_info.as_bytes())?;

    let public = credentials.private_key.to_public_key();
    let modulus = crypto::b64(&public.n().to_bytes_be());
    let exponent = crypto::b64(&public.e().to_bytes_be());

    let signature = format!(
        "<Signature xmlns=\"{DSIG_NS}\">{signed_info}\
         <SignatureValue>{signature_value}</SignatureValue>\
         <KeyInfo><KeyValue><RSAKeyValue>\
         <Modulus>{modulus}</Modulus><Exponent>{exponent}</Exponent>\
         </RSAKeyValue></KeyValue>\
         <X509Data><X509Certificate>{certificate}</X509Certificate></X509Data>\
         </KeyInfo></Signature>",
        certificate = credentials.certificate_b64,
    );

    let closing = target.closing_tag();
    let position = xml.rfind(closing).ok_or_else(|| {
        DteError::Signing(format!("Document has no {closing} to anchor the signature"))
    })?;

    let mut signed = String::with_capacity(xml.len() + signature.len());
    signed.push_str(&xml[..position]);
    signed.push_str(&signature);
    signed.push_str(&xml[position..]);
    Ok(signed)
}

/// Verifies the signature a signed document embeds, using the key
/// material from its own `KeyInfo`.
///
/// This checks internal consistency (digest matches the referenced
/// element, `SignatureValue` verifies over `SignedInfo`), which is what
/// the receiving side checks before trusting anything else.
///
/// # Errors
///
/// Returns `DteError::Signing` when any part of the chain fails.
pub fn verify(xml: &str) -> Result<(), DteError> {
    let signature = find_element_raw(xml, "Signature")
        .ok_or_else(|| DteError::Signing("Document carries no Signature".to_string()))?;
    let signed_info = find_element_raw(&signature, "SignedInfo")
        .ok_or_else(|| DteError::Signing("Signature carries no SignedInfo".to_string()))?;

    let uri = reference_uri(&signed_info)
        .ok_or_else(|| DteError::Signing("Reference carries no URI".to_string()))?;
    let digest_input = if uri.is_empty() {
        // Enveloped transform: digest the document with the signature
        // element removed.
        strip_declaration(&xml.replacen(&signature, "", 1)).to_string()
    } else {
        let id = uri.trim_start_matches('#');
        find_element_by_id(xml, id)
            .ok_or_else(|| DteError::Signing(format!("Referenced element {uri} not found")))?
    };

    let expected = find_tag_text(&signed_info, "DigestValue")
        .ok_or_else(|| DteError::Signing("SignedInfo carries no DigestValue".to_string()))?;
    let actual = crypto::sha1_digest_b64(digest_input.as_bytes());
    if expected != actual {
        return Err(DteError::Signing(format!(
            "Digest mismatch for {uri}: expected {expected}, computed {actual}"
        )));
    }

    let signature_value = find_tag_text(&signature, "SignatureValue")
        .ok_or_else(|| DteError::Signing("Signature carries no SignatureValue".to_string()))?;
    let public = embedded_public_key(&signature)?;
    crypto::sha1_rsa_verify_b64(&public, signed_info.as_bytes(), &signature_value)
}

/// Normalizes XML before digesting or signing.
///
/// Self-produced XML is already in canonical form; this pass makes the
/// operation stable for inputs that went through transports that rewrite
/// line endings.
#[must_use]
pub fn canonicalize(xml: &str) -> String {
    xml.replace("\r\n", "\n").trim().to_string()
}

/// Reconstructs the signer's public key from `KeyInfo`'s `RSAKeyValue`.
fn embedded_public_key(signature: &str) -> Result<RsaPublicKey, DteError> {
    let modulus = find_tag_text(signature, "Modulus")
        .ok_or_else(|| DteError::Signing("KeyInfo carries no Modulus".to_string()))?;
    let exponent = find_tag_text(signature, "Exponent")
        .ok_or_else(|| DteError::Signing("KeyInfo carries no Exponent".to_string()))?;

    let n = BigUint::from_bytes_be(&crypto::b64_decode(&modulus)?);
    let e = BigUint::from_bytes_be(&crypto::b64_decode(&exponent)?);
    RsaPublicKey::new(n, e).map_err(|err| DteError::Signing(format!("Invalid RSA key values: {err}")))
}

/// Extracts the `URI` attribute of the first `Reference`.
fn reference_uri(signed_info: &str) -> Option<String> {
    let start = signed_info.find("<Reference")?;
    let tag_end = signed_info[start..].find('>')? + start;
    let tag = &signed_info[start..tag_end];
    let uri_start = tag.find("URI=\"")? + "URI=\"".len();
    let uri_end = tag[uri_start..].find('"')? + uri_start;
    Some(tag[uri_start..uri_end].to_string())
}

/// Finds the verbatim element carrying `ID="<id>"`, opening tag through
/// closing tag.
fn find_element_by_id(xml: &str, id: &str) -> Option<String> {
    let marker = format!("ID=\"{id}\"");
    let attr_pos = xml.find(&marker)?;
    let start = xml[..attr_pos].rfind('<')?;

    let name_end = xml[start + 1..]
        .find(|c: char| c.is_whitespace() || c == '>')
        .map(|i| start + 1 + i)?;
    let name = &xml[start + 1..name_end];

    let close = format!("</{name}>");
    let close_pos = xml[start..].find(&close)? + start;
    Some(xml[start..close_pos + close.len()].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dte::credentials::test_credentials;

    fn sample_document() -> String {
        "<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\
         <DTE xmlns=\"http://www.sii.cl/SiiDte\" version=\"1.0\">\
         <Documento ID=\"DTE-33-7\"><Encabezado><IdDoc><TipoDTE>33</TipoDTE>\
         <Folio>7</Folio></IdDoc></Encabezado></Documento></DTE>"
            .to_string()
    }

    fn sample_request() -> String {
        "<getToken><item><Semilla>012345678901</Semilla></item></getToken>".to_string()
    }

    fn sample_envelope() -> String {
        "<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\
         <EnvioDTE xmlns=\"http://www.sii.cl/SiiDte\" version=\"1.0\">\
         <SetDTE ID=\"SetDoc\"><Caratula version=\"1.0\">\
         <RutEmisor>76192083-9</RutEmisor></Caratula></SetDTE></EnvioDTE>"
            .to_string()
    }

    #[test]
    fn test_document_signature_placement() {
        let target = SignatureTarget::DocumentRoot {
            id: "DTE-33-7".to_string(),
        };
        let signed = sign(&sample_document(), &target, &test_credentials()).unwrap();

        let sig_pos = signed.find("<Signature ").unwrap();
        assert!(signed.find("</Documento>").unwrap() < sig_pos);
        assert!(sig_pos < signed.find("</DTE>").unwrap());
        assert!(signed.contains("URI=\"#DTE-33-7\""));
    }

    #[test]
    fn test_envelope_signature_is_sibling_of_set() {
        let target = SignatureTarget::Envelope {
            id: "SetDoc".to_string(),
        };
        let signed = sign(&sample_envelope(), &target, &test_credentials()).unwrap();

        let sig_pos = signed.find("<Signature ").unwrap();
        assert!(signed.find("</SetDTE>").unwrap() < sig_pos);
        assert!(sig_pos < signed.find("</EnvioDTE>").unwrap());
        assert!(signed.contains("URI=\"#SetDoc\""));
    }

    #[test]
    fn test_request_signature_uses_enveloped_transform() {
        let signed = sign(
            &sample_request(),
            &SignatureTarget::RequestRoot,
            &test_credentials(),
        )
        .unwrap();

        assert!(signed.contains("URI=\"\""));
        assert!(signed.contains(ENVELOPED_TRANSFORM));
        assert!(signed.find("<Signature ").unwrap() < signed.find("</getToken>").unwrap());
    }

    #[test]
    fn test_signed_documents_verify() {
        let credentials = test_credentials();
        for signed in [
            sign(
                &sample_document(),
                &SignatureTarget::DocumentRoot {
                    id: "DTE-33-7".to_string(),
                },
                &credentials,
            )
            .unwrap(),
            sign(&sample_request(), &SignatureTarget::RequestRoot, &credentials).unwrap(),
            sign(
                &sample_envelope(),
                &SignatureTarget::Envelope {
                    id: "SetDoc".to_string(),
                },
                &credentials,
            )
            .unwrap(),
        ] {
            verify(&signed).unwrap();
        }
    }

    #[test]
    fn test_verify_rejects_tampered_content() {
        let target = SignatureTarget::DocumentRoot {
            id: "DTE-33-7".to_string(),
        };
        let signed = sign(&sample_document(), &target, &test_credentials()).unwrap();
        let tampered = signed.replace("<Folio>7</Folio>", "<Folio>8</Folio>");

        assert!(matches!(verify(&tampered), Err(DteError::Signing(_))));
    }

    #[test]
    fn test_verify_rejects_swapped_signature_value() {
        let target = SignatureTarget::DocumentRoot {
            id: "DTE-33-7".to_string(),
        };
        let signed = sign(&sample_document(), &target, &test_credentials()).unwrap();

        // Replace the signature value with a validly-encoded wrong one
        let other = sign(&sample_envelope(), &SignatureTarget::Envelope { id: "SetDoc".to_string() }, &test_credentials()).unwrap();
        let value = |xml: &str| find_tag_text(xml, "SignatureValue").unwrap();
        let forged = signed.replace(&value(&signed), &value(&other));

        assert!(verify(&forged).is_err());
    }

    #[test]
    fn test_sign_unknown_id_fails() {
        let target = SignatureTarget::DocumentRoot {
            id: "DTE-99-1".to_string(),
        };
        assert!(matches!(
            sign(&sample_document(), &target, &test_credentials()),
            Err(DteError::Signing(_))
        ));
    }

    #[test]
    fn test_canonicalize_is_identity_on_canonical_input() {
        let xml = sample_document();
        assert_eq!(canonicalize(&xml), xml);
    }

    #[test]
    fn test_canonicalize_normalizes_line_endings() {
        assert_eq!(canonicalize("<A>\r\n</A>\n"), "<A>\n</A>");
    }

    #[test]
    fn test_find_element_by_id() {
        let xml = sample_document();
        let element = find_element_by_id(&xml, "DTE-33-7").unwrap();
        assert!(element.starts_with("<Documento ID=\"DTE-33-7\">"));
        assert!(element.ends_with("</Documento>"));
    }
}
