//! Just enough X.509 to find an ECDSA P-384 public key.
//!
//! Nothing is validated beyond the path to `subjectPublicKeyInfo`: no chain
//! of trust, no validity period, no extensions.
//!
//! # References
//!
//! - [RFC 5280 Section 4.1](https://datatracker.ietf.org/doc/html/rfc5280#section-4.1)
//! - [RFC 5480 Section 2](https://datatracker.ietf.org/doc/html/rfc5480#section-2)

use std::fmt;

use crate::{
    ECDSA_P384_OID, Error,
    asn1::{self, BitString},
    ber::{self, Identifier, Node},
};

/// Bits per P-384 field element.
pub const P384_COORDINATE_BITS: usize = 384;

/// SEC 1 uncompressed point indicator.
const UNCOMPRESSED: u8 = 0x04;

/// Public key coordinates copied out of a certificate.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKeyInfo {
    /// Named curve OID in dotted form, always [`ECDSA_P384_OID`].
    pub algorithm: String,
    pub x: Vec<u8>,
    pub y: Vec<u8>,
}

impl fmt::Debug for PublicKeyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = |bytes: &[u8]| -> String { bytes.iter().map(|b| format!("{b:02x}")).collect() };

        f.debug_struct("PublicKeyInfo")
            .field("algorithm", &self.algorithm)
            .field("x", &hex(&self.x))
            .field("y", &hex(&self.y))
            .finish()
    }
}

impl PublicKeyInfo {
    /// SEC 1 uncompressed encoding, `0x04 || x || y`.
    pub fn to_sec1_bytes(&self) -> Vec<u8> {
        let mut buf: Vec<u8> = Vec::with_capacity(1 + self.x.len() + self.y.len());
        buf.push(UNCOMPRESSED);
        buf.extend_from_slice(&self.x);
        buf.extend_from_slice(&self.y);
        buf
    }
}

fn sequence_children<'a>(field: &'static str, node: &Node<'a>) -> Result<Vec<Node<'a>>, Error> {
    if node.identifier() != Identifier::SEQUENCE {
        log::error!(
            "{field} expected a SEQUENCE got {:?} of length {}",
            node.identifier(),
            node.contents().len()
        );
        return Err(Error::NotASequence {
            field,
            class: node.class(),
            tag: node.tag(),
            structured: node.is_structured(),
        });
    }

    node.children().inspect_err(|e| log::error!("{field} children: {e}"))
}

fn expect_identifier(
    field: &'static str,
    expected: &'static str,
    identifier: Identifier,
    node: &Node<'_>,
) -> Result<(), Error> {
    if node.identifier() != identifier {
        log::error!(
            "{field} expected {expected} {identifier:?} got {:?} of length {}",
            node.identifier(),
            node.contents().len()
        );
        return Err(Error::UnexpectedTag {
            field,
            expected,
            class: node.class(),
            tag: node.tag(),
            structured: node.is_structured(),
        });
    }
    Ok(())
}

/// # References
///
/// - [RFC 5280 Section 4.1.1.2](https://datatracker.ietf.org/doc/html/rfc5280#section-4.1.1.2)
///
/// ```text
/// AlgorithmIdentifier  ::=  SEQUENCE  {
///     algorithm               OBJECT IDENTIFIER,
///     parameters              ANY DEFINED BY algorithm OPTIONAL  }
/// ```
///
/// For `id-ecPublicKey` the parameters are the named curve OID.
#[derive(Debug, Clone)]
struct AlgorithmIdentifier {
    parameters: String,
}

impl AlgorithmIdentifier {
    const FIELD: &'static str = "Certificate.tbsCertificate.subjectPublicKeyInfo.algorithm";

    fn deser(node: &Node<'_>) -> Result<Self, Error> {
        let pieces: Vec<Node> = sequence_children(Self::FIELD, node)?;

        if pieces.len() != 2 {
            log::error!(
                "{} expected 2 child objects, got {}",
                Self::FIELD,
                pieces.len()
            );
            return Err(Error::UnexpectedChildCount {
                field: Self::FIELD,
                expected: "2",
                got: pieces.len(),
            });
        }

        if pieces[0].identifier() == Identifier::OBJECT_IDENTIFIER
            && let Ok(algorithm) = asn1::decode_object_identifier(pieces[0].contents())
        {
            log::debug!("{}.algorithm is {algorithm}", Self::FIELD);
        }

        expect_identifier(
            "Certificate.tbsCertificate.subjectPublicKeyInfo.algorithm.parameters",
            "OBJECT IDENTIFIER",
            Identifier::OBJECT_IDENTIFIER,
            &pieces[1],
        )?;

        let parameters: String = asn1::decode_object_identifier(pieces[1].contents())?;

        Ok(Self { parameters })
    }
}

/// # References
///
/// - [RFC 5280 Section 4.1](https://datatracker.ietf.org/doc/html/rfc5280#section-4.1)
///
/// ```text
/// SubjectPublicKeyInfo  ::=  SEQUENCE  {
///      algorithm            AlgorithmIdentifier,
///      subjectPublicKey     BIT STRING  }
/// ```
#[derive(Debug, Clone)]
struct SubjectPublicKeyInfo<'a> {
    algorithm: AlgorithmIdentifier,
    subject_public_key: BitString<'a>,
}

impl<'a> SubjectPublicKeyInfo<'a> {
    const FIELD: &'static str = "Certificate.tbsCertificate.subjectPublicKeyInfo";

    fn deser(node: &Node<'a>) -> Result<Self, Error> {
        let pieces: Vec<Node<'a>> = sequence_children(Self::FIELD, node)?;

        if pieces.len() != 2 {
            log::error!(
                "{} expected 2 child objects, got {}",
                Self::FIELD,
                pieces.len()
            );
            return Err(Error::UnexpectedChildCount {
                field: Self::FIELD,
                expected: "2",
                got: pieces.len(),
            });
        }

        let algorithm: AlgorithmIdentifier = AlgorithmIdentifier::deser(&pieces[0])?;

        expect_identifier(
            "Certificate.tbsCertificate.subjectPublicKeyInfo.subjectPublicKey",
            "BIT STRING",
            Identifier::BIT_STRING,
            &pieces[1],
        )?;

        let subject_public_key: BitString<'a> = asn1::decode_bit_string(pieces[1].contents())?;

        Ok(Self {
            algorithm,
            subject_public_key,
        })
    }
}

/// Locates `subjectPublicKeyInfo` in a tbsCertificate.
///
/// # References
///
/// - [RFC 5280 Section 4.1](https://datatracker.ietf.org/doc/html/rfc5280#section-4.1)
///
/// ```text
/// TBSCertificate  ::=  SEQUENCE  {
///      version         [0]  EXPLICIT Version DEFAULT v1,
///      serialNumber         CertificateSerialNumber,
///      signature            AlgorithmIdentifier,
///      issuer               Name,
///      validity             Validity,
///      subject              Name,
///      subjectPublicKeyInfo SubjectPublicKeyInfo,
///      ...
///      }
/// ```
///
/// `version` is omitted for v1 certificates, leaving `subjectPublicKeyInfo`
/// as the sixth child.
fn tbs_subject_public_key_info<'a>(tbs_certificate: &Node<'a>) -> Result<Node<'a>, Error> {
    const FIELD: &str = "Certificate.tbsCertificate";

    let pieces: Vec<Node<'a>> = sequence_children(FIELD, tbs_certificate)?;

    let has_version: bool = pieces
        .first()
        .is_some_and(|piece| piece.identifier() == Identifier::CONTEXT_0);

    let (index, expected): (usize, &'static str) = if has_version {
        (6, "at least 7")
    } else {
        (5, "at least 6")
    };

    match pieces.get(index) {
        Some(spki) => Ok(*spki),
        None => {
            log::error!(
                "{FIELD} expected {expected} child objects, got {}",
                pieces.len()
            );
            Err(Error::UnexpectedChildCount {
                field: FIELD,
                expected,
                got: pieces.len(),
            })
        }
    }
}

/// Extract the ECDSA P-384 public key from a DER encoded certificate.
///
/// # References
///
/// - [RFC 5280 Section 4.1](https://datatracker.ietf.org/doc/html/rfc5280#section-4.1)
///
/// ```text
/// Certificate  ::=  SEQUENCE  {
///     tbsCertificate       TBSCertificate,
///     signatureAlgorithm   AlgorithmIdentifier,
///     signatureValue       BIT STRING  }
/// ```
///
/// `signatureAlgorithm` and `signatureValue` are counted but not checked.
pub fn extract_ecdsa_p384_public_key(der: &[u8]) -> Result<PublicKeyInfo, Error> {
    let certificate: Node = ber::decode(der)?;

    if certificate.byte_length() != der.len() {
        log::warn!(
            "Certificate contains {} bytes of data after sequence encoding",
            der.len() - certificate.byte_length()
        );
    }

    let pieces: Vec<Node> = sequence_children("Certificate", &certificate)?;

    if pieces.len() != 3 {
        log::error!(
            "Certificate expected exactly 3 child objects, got {}",
            pieces.len()
        );
        return Err(Error::UnexpectedChildCount {
            field: "Certificate",
            expected: "3",
            got: pieces.len(),
        });
    }

    let spki_node: Node = tbs_subject_public_key_info(&pieces[0])?;
    let spki: SubjectPublicKeyInfo = SubjectPublicKeyInfo::deser(&spki_node)?;

    if spki.algorithm.parameters != ECDSA_P384_OID {
        log::error!(
            "Certificate.tbsCertificate.subjectPublicKeyInfo.algorithm.parameters {} is not supported, expected secp384r1 {ECDSA_P384_OID}",
            spki.algorithm.parameters
        );
        return Err(Error::UnsupportedAlgorithm {
            oid: spki.algorithm.parameters,
        });
    }

    let (indicator, point): (u8, &[u8]) = match spki.subject_public_key.bytes.split_first() {
        Some((indicator, point)) => (*indicator, point),
        None => {
            log::error!(
                "Certificate.tbsCertificate.subjectPublicKeyInfo.subjectPublicKey contains no data"
            );
            return Err(Error::UnsupportedCompression { indicator: None });
        }
    };

    if indicator != UNCOMPRESSED {
        log::error!(
            "Certificate.tbsCertificate.subjectPublicKeyInfo.subjectPublicKey compression 0x{indicator:02x} is not supported"
        );
        return Err(Error::UnsupportedCompression {
            indicator: Some(indicator),
        });
    }

    let bits: usize = point
        .len()
        .saturating_mul(8)
        .saturating_sub(usize::from(spki.subject_public_key.unused_bits));

    if bits != 2 * P384_COORDINATE_BITS {
        log::error!(
            "Certificate.tbsCertificate.subjectPublicKeyInfo.subjectPublicKey has an invalid key size ({bits} bits)"
        );
        return Err(Error::InvalidKeySize { bits });
    }

    let (x, y) = point.split_at(point.len() / 2);

    Ok(PublicKeyInfo {
        algorithm: spki.algorithm.parameters,
        x: x.to_vec(),
        y: y.to_vec(),
    })
}

/// DER contents of the first certificate in a PEM chain.
pub fn first_certificate_der(pem_chain: &str) -> Result<Vec<u8>, Error> {
    let blocks: Vec<pem::Pem> = match pem::parse_many(pem_chain) {
        Ok(blocks) => blocks,
        Err(e) => {
            log::error!("Failed to parse certificate chain: {e}");
            return Err(Error::InvalidPem(e.to_string()));
        }
    };

    let first: pem::Pem = match blocks.into_iter().next() {
        Some(first) => first,
        None => {
            log::error!("Certificate chain contains no PEM blocks");
            return Err(Error::InvalidPem("no PEM blocks".to_string()));
        }
    };

    if first.tag() != "CERTIFICATE" {
        log::error!("Invalid PEM tag, expected CERTIFICATE got {}", first.tag());
        return Err(Error::InvalidPem(format!(
            "expected CERTIFICATE got {}",
            first.tag()
        )));
    }

    Ok(first.into_contents())
}
