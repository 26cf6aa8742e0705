//! Content signing, the server side of the protocol.

use std::{fmt, str::FromStr};

use p384::{
    ecdsa::signature::Signer as _,
    elliptic_curve::sec1::ToEncodedPoint as _,
    pkcs8::{DecodePrivateKey as _, EncodePrivateKey as _, EncodePublicKey as _, LineEnding},
};

use crate::{
    CONTENT_SIGNATURE_PREFIX, ECDSA_P384_OID, Error,
    verifier::{HASH_ALGORITHM, SignatureEncoding},
    x509::PublicKeyInfo,
};

/// Signature with the metadata needed to verify it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureBundle {
    pub signature: String,
    pub hash_algorithm: String,
    pub signature_encoding: String,
    /// URL of the certificate chain, may be empty.
    pub x5u: String,
    /// Value for the `Content-Signature` HTTP header.
    pub content_signature: String,
}

/// ECDSA P-384 content signer.
#[derive(Clone)]
pub struct ContentSigner {
    signing_key: p384::ecdsa::SigningKey,
    x5u: String,
}

impl fmt::Debug for ContentSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentSigner")
            .field("public_key", &self.public_key_info())
            .field("x5u", &self.x5u)
            .finish_non_exhaustive()
    }
}

impl ContentSigner {
    /// Signer with a fresh random key.
    pub fn generate() -> Self {
        Self {
            signing_key: p384::ecdsa::SigningKey::random(&mut rand::rngs::OsRng),
            x5u: String::new(),
        }
    }

    /// Load a secp384r1 private key in PKCS #8 PEM format.
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self, Error> {
        let secret_key: p384::SecretKey = match p384::SecretKey::from_pkcs8_pem(pem) {
            Ok(key) => key,
            Err(e) => {
                log::error!("Private key is not a valid secp384r1 in pkcs8 pem format: {e}");
                return Err(Error::InvalidKey(e.to_string()));
            }
        };

        Ok(Self {
            signing_key: p384::ecdsa::SigningKey::from(secret_key),
            x5u: String::new(),
        })
    }

    /// Certificate chain URL advertised in signatures.
    #[must_use]
    pub fn with_x5u<S: Into<String>>(mut self, x5u: S) -> Self {
        self.x5u = x5u.into();
        self
    }

    pub fn public_key_info(&self) -> PublicKeyInfo {
        let point = self.signing_key.verifying_key().to_encoded_point(false);
        PublicKeyInfo {
            algorithm: ECDSA_P384_OID.to_string(),
            x: point.x().map(|x| x.to_vec()).unwrap_or_default(),
            y: point.y().map(|y| y.to_vec()).unwrap_or_default(),
        }
    }

    /// Public key in SubjectPublicKeyInfo PEM format.
    pub fn public_key_pem(&self) -> Result<String, Error> {
        let public_key: p384::PublicKey = p384::PublicKey::from(self.signing_key.verifying_key());
        public_key.to_public_key_pem(LineEnding::LF).map_err(|e| {
            log::error!("Failed to encode public key: {e}");
            Error::InvalidKey(e.to_string())
        })
    }

    /// Sign `payload`, usually the canonical JSON of a record set.
    pub fn sign(&self, payload: &[u8]) -> Result<SignatureBundle, Error> {
        let message: Vec<u8> = [CONTENT_SIGNATURE_PREFIX, payload].concat();

        let signature: p384::ecdsa::Signature = match self.signing_key.try_sign(&message) {
            Ok(signature) => signature,
            Err(e) => {
                log::error!("Signing failed: {e:?}");
                return Err(Error::InvalidKey(e.to_string()));
            }
        };

        let encoding: SignatureEncoding = SignatureEncoding::RsBase64Url;
        let signature: String = encoding.encode(&signature.to_bytes());
        let header: ContentSignatureHeader = ContentSignatureHeader {
            x5u: self.x5u.clone(),
            signature: signature.clone(),
        };

        log::debug!("signed {} bytes of content", payload.len());

        Ok(SignatureBundle {
            signature,
            hash_algorithm: HASH_ALGORITHM.to_string(),
            signature_encoding: encoding.name().to_string(),
            x5u: self.x5u.clone(),
            content_signature: header.to_string(),
        })
    }
}

/// New secp384r1 key pair as (PKCS #8 private PEM, SubjectPublicKeyInfo PEM).
pub fn generate_keypair() -> Result<(String, String), Error> {
    let secret_key: p384::SecretKey = p384::SecretKey::random(&mut rand::rngs::OsRng);

    let private_pem: String = match secret_key.to_pkcs8_pem(LineEnding::LF) {
        Ok(pem) => pem.to_string(),
        Err(e) => {
            log::error!("Failed to encode private key: {e}");
            return Err(Error::InvalidKey(e.to_string()));
        }
    };

    let public_pem: String = match secret_key.public_key().to_public_key_pem(LineEnding::LF) {
        Ok(pem) => pem,
        Err(e) => {
            log::error!("Failed to encode public key: {e}");
            return Err(Error::InvalidKey(e.to_string()));
        }
    };

    Ok((private_pem, public_pem))
}

/// `Content-Signature` HTTP header, `x5u=<url>;p384ecdsa=<signature>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSignatureHeader {
    pub x5u: String,
    pub signature: String,
}

impl ContentSignatureHeader {
    pub fn parse(value: &str) -> Result<Self, Error> {
        let mut x5u: Option<&str> = None;
        let mut signature: Option<&str> = None;

        for param in value.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let Some((name, param_value)) = param.split_once('=') else {
                log::error!("Content-Signature parameter without value: {param}");
                return Err(Error::InvalidHeader(format!("parameter {param} has no value")));
            };

            let slot: &mut Option<&str> = match name.trim() {
                "x5u" => &mut x5u,
                "p384ecdsa" => &mut signature,
                other => {
                    log::warn!("Ignoring unknown Content-Signature parameter {other}");
                    continue;
                }
            };

            if slot.replace(param_value.trim()).is_some() {
                log::error!("Duplicate Content-Signature parameter {name}");
                return Err(Error::InvalidHeader(format!("duplicate parameter {name}")));
            }
        }

        match signature {
            Some(signature) if !signature.is_empty() => Ok(Self {
                x5u: x5u.unwrap_or_default().to_string(),
                signature: signature.to_string(),
            }),
            _ => {
                log::error!("Content-Signature header has no p384ecdsa signature: {value}");
                Err(Error::InvalidHeader("missing p384ecdsa".to_string()))
            }
        }
    }
}

impl FromStr for ContentSignatureHeader {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ContentSignatureHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x5u={};p384ecdsa={}", self.x5u, self.signature)
    }
}
