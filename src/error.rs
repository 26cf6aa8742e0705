use crate::ber::Class;

/// Operational failure of a [`VerificationOracle`](crate::VerificationOracle).
///
/// This is distinct from a signature that does not verify, which oracles
/// report as `Ok(false)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// The public key could not be imported, e.g. the point is not on the curve.
    InvalidPublicKey(String),
    /// Any other backend failure.
    Backend(String),
}

impl std::fmt::Display for OracleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleError::InvalidPublicKey(reason) => write!(f, "invalid public key: {reason}"),
            OracleError::Backend(reason) => write!(f, "oracle backend failure: {reason}"),
        }
    }
}

impl std::error::Error for OracleError {}

#[derive(Debug)]
pub enum Error {
    /// A tag, length or contents field runs past the end of the input, or an
    /// encoded integer is malformed.
    MalformedEncoding {
        field: &'static str,
        needed: usize,
        available: usize,
    },
    /// A node that must be a universal constructed `SEQUENCE` is something else.
    NotASequence {
        field: &'static str,
        class: Class,
        tag: u32,
        structured: bool,
    },
    /// A node has the wrong primitive type.
    UnexpectedTag {
        field: &'static str,
        expected: &'static str,
        class: Class,
        tag: u32,
        structured: bool,
    },
    UnexpectedChildCount {
        field: &'static str,
        expected: &'static str,
        got: usize,
    },
    UnsupportedAlgorithm {
        oid: String,
    },
    /// The EC point is not in uncompressed form. `None` when the key is empty.
    UnsupportedCompression {
        indicator: Option<u8>,
    },
    InvalidKeySize {
        bits: usize,
    },
    InvalidSignatureEncoding(base64::DecodeError),
    VerificationError(OracleError),
    InvalidPem(String),
    InvalidRecord(String),
    InvalidSignatureBundle(String),
    InvalidHeader(String),
    InvalidKey(String),
}

impl From<base64::DecodeError> for Error {
    fn from(value: base64::DecodeError) -> Self {
        Self::InvalidSignatureEncoding(value)
    }
}

impl From<OracleError> for Error {
    fn from(value: OracleError) -> Self {
        Self::VerificationError(value)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::MalformedEncoding {
                field,
                needed,
                available,
            } => write!(
                f,
                "malformed encoding in {field}: needs {needed} bytes, {available} available"
            ),
            Error::NotASequence {
                field,
                class,
                tag,
                structured,
            } => write!(
                f,
                "{field} is not a SEQUENCE: class {class:?} tag {tag} structured {structured}"
            ),
            Error::UnexpectedTag {
                field,
                expected,
                class,
                tag,
                structured,
            } => write!(
                f,
                "{field} expected {expected}, got class {class:?} tag {tag} structured {structured}"
            ),
            Error::UnexpectedChildCount {
                field,
                expected,
                got,
            } => write!(f, "{field} expected {expected} children, got {got}"),
            Error::UnsupportedAlgorithm { oid } => {
                write!(f, "public key algorithm {oid} is not supported")
            }
            Error::UnsupportedCompression {
                indicator: Some(indicator),
            } => write!(
                f,
                "unsupported EC point compression 0x{indicator:02x}, expected 0x04"
            ),
            Error::UnsupportedCompression { indicator: None } => {
                write!(f, "EC point is empty, expected uncompressed form 0x04")
            }
            Error::InvalidKeySize { bits } => {
                write!(f, "invalid key size ({bits} bits), expected 768")
            }
            Error::InvalidSignatureEncoding(e) => write!(f, "invalid signature encoding: {e}"),
            Error::VerificationError(e) => write!(f, "verification error: {e}"),
            Error::InvalidPem(reason) => write!(f, "invalid PEM: {reason}"),
            Error::InvalidRecord(reason) => write!(f, "invalid record: {reason}"),
            Error::InvalidSignatureBundle(reason) => {
                write!(f, "invalid signature bundle: {reason}")
            }
            Error::InvalidHeader(reason) => write!(f, "invalid Content-Signature header: {reason}"),
            Error::InvalidKey(reason) => write!(f, "invalid signing key: {reason}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::InvalidSignatureEncoding(e) => Some(e),
            Error::VerificationError(e) => Some(e),
            _ => None,
        }
    }
}
