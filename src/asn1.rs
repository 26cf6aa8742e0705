//! Interpretation of primitive ASN.1 contents.

use crate::{Error, parse};

/// Decode OBJECT IDENTIFIER contents into dotted form.
///
/// # References
///
/// - X.690 Section 8.19
/// - [About Object Identifier](https://learn.microsoft.com/en-gb/windows/win32/seccertenroll/about-object-identifier)
pub fn decode_object_identifier(contents: &[u8]) -> Result<String, Error> {
    let (mut b, byte0) = match parse::u8("object identifier", contents) {
        Ok(ok) => ok,
        Err(e) => {
            log::error!("object identifier must not be empty");
            return Err(e);
        }
    };

    let mut repr: String = format!("{}.{}", byte0 / 40, byte0 % 40);

    while !b.is_empty() {
        let (local_b, arc) = parse::base128("object identifier", b)?;
        b = local_b;
        repr.push_str(&format!(".{arc}"));
    }

    Ok(repr)
}

/// BIT STRING contents.
///
/// # References
///
/// - X.690 Section 8.6
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitString<'a> {
    /// Number of low-order bits of the final byte that are padding.
    pub unused_bits: u8,
    pub bytes: &'a [u8],
}

impl BitString<'_> {
    /// Number of meaningful bits.
    pub fn bit_len(&self) -> usize {
        self.bytes
            .len()
            .saturating_mul(8)
            .saturating_sub(usize::from(self.unused_bits))
    }
}

pub fn decode_bit_string(contents: &[u8]) -> Result<BitString<'_>, Error> {
    let (bytes, unused_bits) = parse::u8("bit string unused bits", contents)?;

    // 8.6.2.2 "shall be in the range zero to seven"
    // 8.6.2.3 "if the bitstring is empty, there shall be no subsequent octets,
    // and the initial octet shall be zero"
    if unused_bits > 7 || (bytes.is_empty() && unused_bits != 0) {
        log::error!(
            "bit string has {unused_bits} unused bits with {} content bytes",
            bytes.len()
        );
        return Err(Error::MalformedEncoding {
            field: "bit string unused bits",
            needed: usize::from(unused_bits),
            available: bytes.len().saturating_mul(8),
        });
    }

    Ok(BitString { unused_bits, bytes })
}


#[cfg(test)]
mod bit_string_tests {
    use super::decode_bit_string;
    use crate::Error;

    #[test]
    fn bit_string() {
        let content: [u8; 4] = [0x00, 0x04, 0xAB, 0xCD];
        let bs = decode_bit_string(&content).unwrap();
        assert_eq!(bs.unused_bits, 0);
        assert_eq!(bs.bytes, &[0x04, 0xAB, 0xCD]);
        assert_eq!(bs.bit_len(), 24);

        // KeyUsage digitalSignature | keyCertSign
        let content: [u8; 2] = [0x02, 0x84];
        let bs = decode_bit_string(&content).unwrap();
        assert_eq!(bs.unused_bits, 2);
        assert_eq!(bs.bit_len(), 6);
    }

    #[test]
    fn empty_bit_string() {
        let bs = decode_bit_string(&[0x00]).unwrap();
        assert!(bs.bytes.is_empty());
        assert_eq!(bs.bit_len(), 0);
    }

    #[test]
    fn bit_string_malformed() {
        assert!(matches!(
            decode_bit_string(&[]),
            Err(Error::MalformedEncoding { .. })
        ));
        assert!(matches!(
            decode_bit_string(&[0x08, 0xFF]),
            Err(Error::MalformedEncoding { .. })
        ));
        assert!(matches!(
            decode_bit_string(&[0x03]),
            Err(Error::MalformedEncoding { .. })
        ));
    }
}
