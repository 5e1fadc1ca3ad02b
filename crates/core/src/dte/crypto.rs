//! SHA1-with-RSA primitives shared by the stamp signer and the XML
//! signature engine.
//!
//! SHA-1 is not a choice: the authority's stamp and signature schemas
//! mandate it. Nothing here is used for anything but producing the exact
//! formats the authority verifies.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::{Digest, Sha1};
use tributo_shared::DteError;

/// Parses a PEM private key, accepting both PKCS#8 (`PRIVATE KEY`) and
/// PKCS#1 (`RSA PRIVATE KEY`) encodings; CAF keys ship as the latter.
///
/// # Errors
///
/// Returns `DteError::Signing` when the PEM cannot be parsed.
pub fn parse_private_key_pem(pem: &str) -> Result<RsaPrivateKey, DteError> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| DteError::Signing(format!("Cannot parse RSA private key: {e}")))
}

/// SHA-1 digest, base64-encoded (the XML-DSig `DigestValue` form).
#[must_use]
pub fn sha1_digest_b64(data: &[u8]) -> String {
    BASE64.encode(Sha1::digest(data))
}

/// Signs data with SHA1-with-RSA (PKCS#1 v1.5), returning the base64
/// signature.
///
/// # Errors
///
/// Returns `DteError::Signing` on a signing failure; the surrounding
/// document cannot be legally issued and the operation must abort.
pub fn sha1_rsa_sign_b64(key: &RsaPrivateKey, data: &[u8]) -> Result<String, DteError> {
    let digest = Sha1::digest(data);
    let signature = key
        .sign(Pkcs1v15Sign::new::<Sha1>(), &digest)
        .map_err(|e| DteError::Signing(format!("SHA1-with-RSA signing failed: {e}")))?;
    Ok(BASE64.encode(signature))
}

/// Verifies a base64 SHA1-with-RSA signature.
///
/// # Errors
///
/// Returns `DteError::Signing` if the signature is malformed base64 or
/// does not verify.
pub fn sha1_rsa_verify_b64(
    key: &RsaPublicKey,
    data: &[u8],
    signature_b64: &str,
) -> Result<(), DteError> {
    let signature = BASE64
        .decode(signature_b64.replace(['\n', '\r', ' '], ""))
        .map_err(|e| DteError::Signing(format!("Malformed base64 signature: {e}")))?;
    let digest = Sha1::digest(data);
    key.verify(Pkcs1v15Sign::new::<Sha1>(), &digest, &signature)
        .map_err(|e| DteError::Signing(format!("Signature verification failed: {e}")))
}

/// Base64-encodes arbitrary bytes (modulus/exponent key values).
#[must_use]
pub fn b64(data: &[u8]) -> String {
    BASE64.encode(data)
}

/// Decodes base64, tolerating embedded whitespace and newlines.
///
/// # Errors
///
/// Returns `DteError::Signing` on invalid input.
pub fn b64_decode(data: &str) -> Result<Vec<u8>, DteError> {
    BASE64
        .decode(data.replace(['\n', '\r', ' ', '\t'], ""))
        .map_err(|e| DteError::Signing(format!("Malformed base64: {e}")))
}

#[cfg(test)]
pub(crate) mod test_keys {
    use std::sync::OnceLock;

    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rsa::RsaPrivateKey;

    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();

    /// Deterministic 2048-bit test key, generated once per test binary.
    /// Fine for tests, never for production material.
    pub fn private_key() -> RsaPrivateKey {
        KEY.get_or_init(|| {
            let mut rng = StdRng::seed_from_u64(42);
            RsaPrivateKey::new(&mut rng, 2048).expect("test key generation")
        })
        .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::traits::PublicKeyParts;

    #[test]
    fn test_sign_verify_round_trip() {
        let key = test_keys::private_key();
        let public = key.to_public_key();
        let data = b"<DD><RE>76192083-9</RE><TD>33</TD><F>42</F></DD>";

        let signature = sha1_rsa_sign_b64(&key, data).unwrap();
        assert!(sha1_rsa_verify_b64(&public, data, &signature).is_ok());
    }

    #[test]
    fn test_verify_rejects_tampered_data() {
        let key = test_keys::private_key();
        let public = key.to_public_key();

        let signature = sha1_rsa_sign_b64(&key, b"original").unwrap();
        assert!(sha1_rsa_verify_b64(&public, b"tampered", &signature).is_err());
    }

    #[test]
    fn test_verify_tolerates_wrapped_base64() {
        let key = test_keys::private_key();
        let public = key.to_public_key();
        let data = b"payload";

        let signature = sha1_rsa_sign_b64(&key, data).unwrap();
        let wrapped: String = signature
            .chars()
            .enumerate()
            .flat_map(|(i, c)| {
                if i > 0 && i % 64 == 0 {
                    vec!['\n', c]
                } else {
                    vec![c]
                }
            })
            .collect();
        assert!(sha1_rsa_verify_b64(&public, data, &wrapped).is_ok());
    }

    #[test]
    fn test_sha1_digest_b64_known_value() {
        // SHA-1("abc") = a9993e364706816aba3e25717850c26c9cd0d89d
        assert_eq!(sha1_digest_b64(b"abc"), "qZk+NkcGgWq6PiVxeFDCbJzQ2J0=");
    }

    #[test]
    fn test_key_has_expected_size() {
        let key = test_keys::private_key();
        assert_eq!(key.to_public_key().size() * 8, 2048);
    }
}
