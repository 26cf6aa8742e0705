//! Content-Signature verification.
//!
//! A content signature is an ECDSA P-384 / SHA-384 signature over
//! `"Content-Signature:\0"` followed by the canonical JSON of the signed
//! content. The signature travels as the raw `r || s` scalars in base64.

use std::{fmt, sync::Arc};

use base64::Engine as _;
use p384::ecdsa::signature::Verifier as _;

use crate::{
    CONTENT_SIGNATURE_PREFIX, ECDSA_P384_OID, Error, OracleError,
    canonical::Value,
    records::RecordSet,
    signer::SignatureBundle,
    x509::{self, PublicKeyInfo},
};

/// Hash algorithm name carried in signature bundles.
pub const HASH_ALGORITHM: &str = "sha384";

/// Backend performing the actual ECDSA verification.
///
/// Returns `Ok(false)` when the signature does not match, and an error only
/// when the backend cannot do its job at all.
pub trait VerificationOracle: fmt::Debug + Send + Sync {
    fn verify(
        &self,
        key: &PublicKeyInfo,
        signature: &[u8],
        message: &[u8],
    ) -> Result<bool, OracleError>;
}

/// ECDSA P-384 with SHA-384, backed by the `p384` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct P384Oracle;

impl VerificationOracle for P384Oracle {
    fn verify(
        &self,
        key: &PublicKeyInfo,
        signature: &[u8],
        message: &[u8],
    ) -> Result<bool, OracleError> {
        if key.algorithm != ECDSA_P384_OID {
            log::error!("P-384 oracle given a key for {}", key.algorithm);
            return Err(OracleError::InvalidPublicKey(format!(
                "algorithm {} is not P-384",
                key.algorithm
            )));
        }

        let verifying_key: p384::ecdsa::VerifyingKey =
            match p384::ecdsa::VerifyingKey::from_sec1_bytes(&key.to_sec1_bytes()) {
                Ok(verifying_key) => verifying_key,
                Err(e) => {
                    log::error!("Public key is not a valid secp384r1 point: {e:?}");
                    return Err(OracleError::InvalidPublicKey(e.to_string()));
                }
            };

        let signature: p384::ecdsa::Signature =
            match p384::ecdsa::Signature::from_slice(signature) {
                Ok(signature) => signature,
                Err(e) => {
                    log::warn!(
                        "Signature of {} bytes is not a valid secp384r1 r || s pair: {e:?}",
                        signature.len()
                    );
                    return Ok(false);
                }
            };

        match verifying_key.verify(message, &signature) {
            Ok(()) => Ok(true),
            Err(e) => {
                log::warn!("Verification of content signature failed: {e:?}");
                Ok(false)
            }
        }
    }
}

/// Text encoding of the `r || s` signature bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureEncoding {
    /// URL-safe base64 without padding.
    #[default]
    RsBase64Url,
    /// Standard base64 with padding.
    RsBase64,
}

impl SignatureEncoding {
    /// Name used in the `signature_encoding` field of signature bundles.
    pub fn name(&self) -> &'static str {
        match self {
            SignatureEncoding::RsBase64Url => "rs_base64url",
            SignatureEncoding::RsBase64 => "rs_base64",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "rs_base64url" => Some(SignatureEncoding::RsBase64Url),
            "rs_base64" => Some(SignatureEncoding::RsBase64),
            _ => None,
        }
    }

    pub fn decode(&self, encoded: &str) -> Result<Vec<u8>, Error> {
        let result = match self {
            SignatureEncoding::RsBase64Url => {
                base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(encoded)
            }
            SignatureEncoding::RsBase64 => base64::engine::general_purpose::STANDARD.decode(encoded),
        };

        result.map_err(|e| {
            log::error!("Signature is not valid {}: {e}", self.name());
            Error::InvalidSignatureEncoding(e)
        })
    }

    pub fn encode(&self, signature: &[u8]) -> String {
        match self {
            SignatureEncoding::RsBase64Url => {
                base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(signature)
            }
            SignatureEncoding::RsBase64 => base64::engine::general_purpose::STANDARD.encode(signature),
        }
    }
}

/// Everything a single verification needs.
#[derive(Debug, Clone)]
pub struct SignedPayload {
    canonical: Vec<u8>,
    signature: Vec<u8>,
    public_key: PublicKeyInfo,
}

impl SignedPayload {
    pub fn new(canonical: &[u8], signature: Vec<u8>, public_key: PublicKeyInfo) -> Self {
        Self {
            canonical: canonical.to_vec(),
            signature,
            public_key,
        }
    }

    pub fn canonical(&self) -> &[u8] {
        &self.canonical
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn public_key(&self) -> &PublicKeyInfo {
        &self.public_key
    }

    /// The signed message, prefix followed by the canonical bytes.
    pub fn message(&self) -> Vec<u8> {
        [CONTENT_SIGNATURE_PREFIX, self.canonical.as_slice()].concat()
    }
}

#[derive(Debug, Clone)]
pub struct VerifierBuilder {
    signature_encoding: SignatureEncoding,
    oracle: Arc<dyn VerificationOracle>,
}

impl Default for VerifierBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl VerifierBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            signature_encoding: SignatureEncoding::default(),
            oracle: Arc::new(P384Oracle),
        }
    }

    #[must_use]
    pub fn signature_encoding(mut self, signature_encoding: SignatureEncoding) -> Self {
        self.signature_encoding = signature_encoding;
        self
    }

    #[must_use]
    pub fn oracle<O: VerificationOracle + 'static>(mut self, oracle: O) -> Self {
        self.oracle = Arc::new(oracle);
        self
    }

    #[must_use]
    pub fn build(self) -> Verifier {
        Verifier {
            signature_encoding: self.signature_encoding,
            oracle: self.oracle,
        }
    }
}

/// Content-Signature verifier.
///
/// # Examples
///
/// ```
/// use content_signature::{SignatureEncoding, Verifier, VerifierBuilder};
///
/// let verifier: Verifier = VerifierBuilder::new()
///     .signature_encoding(SignatureEncoding::RsBase64)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct Verifier {
    signature_encoding: SignatureEncoding,
    oracle: Arc<dyn VerificationOracle>,
}

impl Default for Verifier {
    fn default() -> Self {
        VerifierBuilder::new().build()
    }
}

impl Verifier {
    pub fn signature_encoding(&self) -> SignatureEncoding {
        self.signature_encoding
    }

    /// Verify `signature`, in the configured encoding, over `canonical`.
    pub fn verify(
        &self,
        canonical: &[u8],
        signature: &str,
        public_key: &PublicKeyInfo,
    ) -> Result<bool, Error> {
        let signature: Vec<u8> = self.signature_encoding.decode(signature)?;
        self.verify_payload(&SignedPayload::new(
            canonical,
            signature,
            public_key.clone(),
        ))
    }

    pub fn verify_payload(&self, payload: &SignedPayload) -> Result<bool, Error> {
        let message: Vec<u8> = payload.message();
        log::debug!(
            "verifying {}-byte signature over {} bytes of content",
            payload.signature.len(),
            payload.canonical.len()
        );

        let valid: bool = self
            .oracle
            .verify(&payload.public_key, &payload.signature, &message)
            .map_err(|e| {
                log::error!("Verification oracle failed: {e}");
                Error::VerificationError(e)
            })?;

        log::debug!("content signature valid: {valid}");
        Ok(valid)
    }

    /// Verify a signature bundle as produced by a signer.
    ///
    /// The bundle's own `signature_encoding` takes precedence over the
    /// configured one.
    pub fn verify_bundle(
        &self,
        canonical: &[u8],
        bundle: &SignatureBundle,
        public_key: &PublicKeyInfo,
    ) -> Result<bool, Error> {
        if bundle.hash_algorithm != HASH_ALGORITHM {
            log::error!(
                "Unsupported hash_algorithm {}, expected {HASH_ALGORITHM}",
                bundle.hash_algorithm
            );
            return Err(Error::InvalidSignatureBundle(format!(
                "unsupported hash_algorithm: {}",
                bundle.hash_algorithm
            )));
        }

        let encoding: SignatureEncoding =
            match SignatureEncoding::from_name(&bundle.signature_encoding) {
                Some(encoding) => encoding,
                None => {
                    log::error!(
                        "Unsupported signature_encoding {}",
                        bundle.signature_encoding
                    );
                    return Err(Error::InvalidSignatureBundle(format!(
                        "unsupported signature_encoding: {}",
                        bundle.signature_encoding
                    )));
                }
            };

        let signature: Vec<u8> = encoding.decode(&bundle.signature)?;
        self.verify_payload(&SignedPayload::new(
            canonical,
            signature,
            public_key.clone(),
        ))
    }

    /// Verify a collection against its signature and certificate chain.
    ///
    /// The key comes from the first certificate of `pem_chain`, the content is
    /// the canonical JSON of the live records.
    pub fn verify_records(
        &self,
        records: &[Value],
        signature: &str,
        pem_chain: &str,
    ) -> Result<bool, Error> {
        let der: Vec<u8> = x509::first_certificate_der(pem_chain)?;
        let public_key: PublicKeyInfo = x509::extract_ecdsa_p384_public_key(&der)?;
        let canonical: String = RecordSet::new(records.iter().cloned())?.canonical();
        self.verify(canonical.as_bytes(), signature, &public_key)
    }
}

/// Verify an unpadded base64url signature over `canonical` with P-384.
pub fn verify(canonical: &[u8], signature: &str, public_key: &PublicKeyInfo) -> Result<bool, Error> {
    Verifier::default().verify(canonical, signature, public_key)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Default)]
    struct RecordingOracle {
        result: Option<bool>,
        calls: Mutex<Vec<(Vec<u8>, Vec<u8>)>>,
    }

    impl VerificationOracle for RecordingOracle {
        fn verify(
            &self,
            _key: &PublicKeyInfo,
            signature: &[u8],
            message: &[u8],
        ) -> Result<bool, OracleError> {
            self.calls
                .lock()
                .unwrap()
                .push((signature.to_vec(), message.to_vec()));
            self.result
                .ok_or_else(|| OracleError::Backend("offline".to_string()))
        }
    }

    fn key() -> PublicKeyInfo {
        PublicKeyInfo {
            algorithm: ECDSA_P384_OID.to_string(),
            x: vec![0x01; 48],
            y: vec![0x02; 48],
        }
    }

    fn bundle(signature: &str) -> SignatureBundle {
        SignatureBundle {
            signature: signature.to_string(),
            hash_algorithm: HASH_ALGORITHM.to_string(),
            signature_encoding: "rs_base64url".to_string(),
            x5u: String::new(),
            content_signature: format!("x5u=;p384ecdsa={signature}"),
        }
    }

    #[test]
    fn message_is_prefixed() {
        let payload = SignedPayload::new(b"[]", vec![0; 96], key());
        assert_eq!(payload.message(), b"Content-Signature:\x00[]");
    }

    #[test]
    fn oracle_sees_decoded_signature() {
        let oracle = Arc::new(RecordingOracle {
            result: Some(true),
            ..Default::default()
        });

        #[derive(Debug)]
        struct Shared(Arc<RecordingOracle>);

        impl VerificationOracle for Shared {
            fn verify(
                &self,
                key: &PublicKeyInfo,
                signature: &[u8],
                message: &[u8],
            ) -> Result<bool, OracleError> {
                self.0.verify(key, signature, message)
            }
        }

        let verifier: Verifier = VerifierBuilder::new()
            .oracle(Shared(oracle.clone()))
            .build();

        // "_-8" is 0xFF 0xEF in URL-safe base64
        assert!(verifier.verify(b"{}", "_-8", &key()).unwrap());

        let calls = oracle.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, vec![0xFF, 0xEF]);
        assert_eq!(calls[0].1, b"Content-Signature:\x00{}");
    }

    #[test]
    fn oracle_result_is_returned_unchanged() {
        let verifier: Verifier = VerifierBuilder::new()
            .oracle(RecordingOracle {
                result: Some(false),
                ..Default::default()
            })
            .build();
        assert!(!verifier.verify(b"[]", "AAAA", &key()).unwrap());

        let verifier: Verifier = VerifierBuilder::new()
            .oracle(RecordingOracle::default())
            .build();
        assert!(matches!(
            verifier.verify(b"[]", "AAAA", &key()),
            Err(Error::VerificationError(OracleError::Backend(_)))
        ));
    }

    #[test]
    fn invalid_signature_encoding() {
        let verifier: Verifier = Verifier::default();
        assert!(matches!(
            verifier.verify(b"[]", "not base64!", &key()),
            Err(Error::InvalidSignatureEncoding(_))
        ));
        // padding is rejected by the default encoding
        assert!(matches!(
            verifier.verify(b"[]", "AA==", &key()),
            Err(Error::InvalidSignatureEncoding(_))
        ));
        // standard alphabet characters are rejected too
        assert!(matches!(
            verifier.verify(b"[]", "+/+/", &key()),
            Err(Error::InvalidSignatureEncoding(_))
        ));
    }

    #[test]
    fn rs_base64_encoding() {
        let verifier: Verifier = VerifierBuilder::new()
            .signature_encoding(SignatureEncoding::RsBase64)
            .oracle(RecordingOracle {
                result: Some(true),
                ..Default::default()
            })
            .build();
        assert_eq!(verifier.signature_encoding(), SignatureEncoding::RsBase64);
        assert!(verifier.verify(b"[]", "+/8=", &key()).unwrap());
        assert!(matches!(
            verifier.verify(b"[]", "_-8", &key()),
            Err(Error::InvalidSignatureEncoding(_))
        ));
    }

    #[test]
    fn encoding_names() {
        for encoding in [SignatureEncoding::RsBase64Url, SignatureEncoding::RsBase64] {
            assert_eq!(SignatureEncoding::from_name(encoding.name()), Some(encoding));
        }
        assert_eq!(SignatureEncoding::from_name("der_base64"), None);
    }

    #[test]
    fn bundle_rejects_unsupported_parameters() {
        let verifier: Verifier = Verifier::default();

        let mut sha256: SignatureBundle = bundle("AAAA");
        sha256.hash_algorithm = "sha256".to_string();
        assert!(matches!(
            verifier.verify_bundle(b"[]", &sha256, &key()),
            Err(Error::InvalidSignatureBundle(_))
        ));

        let mut der: SignatureBundle = bundle("AAAA");
        der.signature_encoding = "der".to_string();
        assert!(matches!(
            verifier.verify_bundle(b"[]", &der, &key()),
            Err(Error::InvalidSignatureBundle(_))
        ));
    }

    #[test]
    fn p384_oracle_rejects_point_off_curve() {
        let result = P384Oracle.verify(&key(), &[0x01; 96], b"message");
        assert!(matches!(result, Err(OracleError::InvalidPublicKey(_))));

        assert!(matches!(
            verify(b"[]", &"A".repeat(128), &key()),
            Err(Error::VerificationError(OracleError::InvalidPublicKey(_)))
        ));
    }

    #[test]
    fn p384_oracle_rejects_other_algorithms() {
        let mut p256: PublicKeyInfo = key();
        p256.algorithm = "1.2.840.10045.3.1.7".to_string();
        assert!(matches!(
            P384Oracle.verify(&p256, &[0x01; 96], b"message"),
            Err(OracleError::InvalidPublicKey(_))
        ));
    }
}
