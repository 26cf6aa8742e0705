//! Content-Signature verification for signed record collections.
//!
//! A collection of records is signed by serializing it to canonical JSON and
//! signing `"Content-Signature:\0"` followed by that JSON with ECDSA P-384.
//! Clients verify it with the public key of the first certificate of the
//! chain published at the signature's `x5u` URL.
//!
//! # Examples
//!
//! ```
//! use content_signature::{ContentSigner, RecordSet, Value, Verifier};
//!
//! let records: Value = Value::parse(r#"[{"id": "b"}, {"id": "a", "enabled": true}]"#)?;
//! let set: RecordSet = RecordSet::new(match records {
//!     Value::Array(items) => items,
//!     _ => Vec::new(),
//! })?;
//! assert_eq!(set.canonical(), r#"[{"enabled":true,"id":"a"},{"id":"b"}]"#);
//!
//! let signer: ContentSigner = ContentSigner::generate();
//! let bundle = signer.sign(set.canonical().as_bytes())?;
//!
//! let valid: bool = Verifier::default().verify(
//!     set.canonical().as_bytes(),
//!     &bundle.signature,
//!     &signer.public_key_info(),
//! )?;
//! assert!(valid);
//! # Ok::<(), content_signature::Error>(())
//! ```

mod asn1;
pub mod ber;
mod canonical;
mod error;
pub(crate) mod parse;
mod records;
mod signer;
mod verifier;
mod x509;

pub use asn1::{BitString, decode_bit_string, decode_object_identifier};
pub use canonical::{ToCanonical, Value, canonicalize, format_number, write_string};
pub use error::{Error, OracleError};
pub use records::{
    RecordSet, canonical_records, compute_hash, merge_changes, strip_private_fields,
};
pub use signer::{ContentSignatureHeader, ContentSigner, SignatureBundle, generate_keypair};
pub use verifier::{
    HASH_ALGORITHM, P384Oracle, SignatureEncoding, SignedPayload, VerificationOracle, Verifier,
    VerifierBuilder, verify,
};
pub use x509::{
    P384_COORDINATE_BITS, PublicKeyInfo, extract_ecdsa_p384_public_key, first_certificate_der,
};

/// secp384r1 named curve.
pub const ECDSA_P384_OID: &str = "1.3.132.0.34";

/// Domain separation prefix of every signed message.
pub const CONTENT_SIGNATURE_PREFIX: &[u8] = b"Content-Signature:\x00";
