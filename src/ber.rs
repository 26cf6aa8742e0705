//! Structural BER/DER decoding.
//!
//! Nothing in here knows about X.509, nodes are decoded purely from their
//! identifier and length octets.
//!
//! # References
//!
//! - [A Warm Welcome to ASN.1 and DER](https://letsencrypt.org/docs/a-warm-welcome-to-asn1-and-der/)
//! - [A Layman's Guide to a Subset of ASN.1, BER, and DER](https://luca.ntop.org/Teaching/Appunti/asn1.html)
//! - X.690 Section 8.1

use crate::{Error, parse};

/// Identifier octet class.
///
/// # References
///
/// - X.690 Section 8.1.2.2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Universal = 0b00,
    Application = 0b01,
    ContextSpecific = 0b10,
    Private = 0b11,
}

impl From<u8> for Class {
    /// Class from the top two bits of an identifier octet.
    fn from(val: u8) -> Self {
        match (val >> 6) & 0x3 {
            0b00 => Class::Universal,
            0b01 => Class::Application,
            0b10 => Class::ContextSpecific,
            _ => Class::Private,
        }
    }
}

/// Universal tag numbers used by the certificate walk.
pub mod tag {
    /// `BIT STRING` tag: `3`.
    pub const BIT_STRING: u32 = 3;
    /// `OCTET STRING` tag: `4`.
    pub const OCTET_STRING: u32 = 4;
    /// `NULL` tag: `5`.
    pub const NULL: u32 = 5;
    /// `OBJECT IDENTIFIER` tag: `6`.
    pub const OBJECT_IDENTIFIER: u32 = 6;
    /// `SEQUENCE` tag: `16`.
    pub const SEQUENCE: u32 = 16;
    /// `SET` and `SET OF` tag: `17`.
    pub const SET: u32 = 17;
}

/// Identifier octets.
///
/// # References
///
/// - X.690 Section 8.1.2 Identifier octets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identifier {
    pub class: Class,
    pub structured: bool,
    pub tag: u32,
}

impl Identifier {
    pub const SEQUENCE: Self = Self {
        class: Class::Universal,
        structured: true,
        tag: tag::SEQUENCE,
    };

    pub const BIT_STRING: Self = Self {
        class: Class::Universal,
        structured: false,
        tag: tag::BIT_STRING,
    };

    pub const OBJECT_IDENTIFIER: Self = Self {
        class: Class::Universal,
        structured: false,
        tag: tag::OBJECT_IDENTIFIER,
    };

    /// `[0] EXPLICIT`, as used by the certificate version field.
    pub const CONTEXT_0: Self = Self {
        class: Class::ContextSpecific,
        structured: true,
        tag: 0,
    };
}

/// A decoded element.
///
/// `contents` and `raw` borrow from the buffer passed to [`decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node<'a> {
    class: Class,
    tag: u32,
    structured: bool,
    contents: &'a [u8],
    raw: &'a [u8],
}

impl<'a> Node<'a> {
    pub fn class(&self) -> Class {
        self.class
    }

    pub fn tag(&self) -> u32 {
        self.tag
    }

    /// Returns `true` for constructed encodings.
    pub fn is_structured(&self) -> bool {
        self.structured
    }

    pub fn identifier(&self) -> Identifier {
        Identifier {
            class: self.class,
            structured: self.structured,
            tag: self.tag,
        }
    }

    /// Value octets, without identifier, length or end-of-contents octets.
    pub fn contents(&self) -> &'a [u8] {
        self.contents
    }

    /// Every octet consumed for this node.
    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    /// Number of octets consumed for this node, including the end-of-contents
    /// octets of an indefinite length.
    pub fn byte_length(&self) -> usize {
        self.raw.len()
    }

    /// Decodes the contents as a list of nodes.
    pub fn children(&self) -> Result<Vec<Node<'a>>, Error> {
        decode_sequence(self.contents)
    }

    /// Re-encodes the node in DER form.
    pub fn to_der(&self) -> Vec<u8> {
        encode(self.class, self.tag, self.structured, self.contents)
    }
}

/// Decode one node from the start of `bytes`.
///
/// Trailing data after the node is ignored, see [`Node::byte_length`].
pub fn decode(bytes: &[u8]) -> Result<Node<'_>, Error> {
    let (b, id) = parse::u8("identifier", bytes)?;

    let class: Class = Class::from(id);
    let structured: bool = id & 0x20 == 0x20;

    // 8.1.2.4 high tag number form
    let (b, tag): (_, u32) = if id & 0x1F == 0x1F {
        let (b, tag) = parse::base128("tag", b)?;
        match u32::try_from(tag) {
            Ok(tag) => (b, tag),
            Err(_) => {
                log::error!("tag number {tag} exceeds u32");
                return Err(Error::MalformedEncoding {
                    field: "tag",
                    needed: size_of::<u64>(),
                    available: size_of::<u32>(),
                });
            }
        }
    } else {
        (b, u32::from(id & 0x1F))
    };

    let (b, len_octet) = parse::u8("length", b)?;

    // 8.1.3 length octets
    // - short: bit 8 is zero, 7-1 encode the number of bytes in contents
    // - indefinite: 0x80, contents end at two zero octets
    // - long: bit 8 is one, 7-1 encode the number of bytes in length
    let (remain, contents) = if len_octet == 0x80 {
        parse::until_end_of_contents("contents", b)?
    } else if len_octet & 0x80 == 0x80 {
        let (b, len) = parse::be_uint("length", b, usize::from(len_octet & 0x7F))?;
        parse::n("contents", b, len)?
    } else {
        parse::n("contents", b, usize::from(len_octet))?
    };

    let byte_length: usize = bytes.len() - remain.len();

    log::trace!(
        "decoded class {class:?} tag {tag} structured {structured} contents {} total {byte_length}",
        contents.len()
    );

    Ok(Node {
        class,
        tag,
        structured,
        contents,
        raw: &bytes[..byte_length],
    })
}

/// Decode back-to-back nodes until `bytes` is exhausted.
pub fn decode_sequence(bytes: &[u8]) -> Result<Vec<Node<'_>>, Error> {
    let mut b: &[u8] = bytes;
    let mut nodes: Vec<Node<'_>> = Vec::new();

    while !b.is_empty() {
        let node: Node<'_> = decode(b)?;
        b = &b[node.byte_length()..];
        nodes.push(node);
    }

    Ok(nodes)
}

/// DER encode a node, using the shortest tag and length forms.
pub fn encode(class: Class, tag: u32, structured: bool, contents: &[u8]) -> Vec<u8> {
    let mut buf: Vec<u8> = Vec::with_capacity(contents.len().saturating_add(12));

    let mut id: u8 = (class as u8) << 6;
    if structured {
        id |= 0x20;
    }

    if tag < 0x1F {
        // cast is lossless, checked above
        buf.push(id | tag as u8);
    } else {
        buf.push(id | 0x1F);
        let mut septets: Vec<u8> = Vec::with_capacity(5);
        let mut rest: u32 = tag;
        loop {
            septets.push((rest & 0x7F) as u8);
            rest >>= 7;
            if rest == 0 {
                break;
            }
        }
        for (i, septet) in septets.iter().rev().enumerate() {
            if i + 1 == septets.len() {
                buf.push(*septet);
            } else {
                buf.push(septet | 0x80);
            }
        }
    }

    let len: usize = contents.len();
    if len < 0x80 {
        buf.push(len as u8);
    } else {
        let len_bytes: [u8; size_of::<usize>()] = len.to_be_bytes();
        let skip: usize = len_bytes.iter().take_while(|&&b| b == 0).count();
        let significant: &[u8] = &len_bytes[skip..];
        buf.push(0x80 | significant.len() as u8);
        buf.extend_from_slice(significant);
    }

    buf.extend_from_slice(contents);
    buf
}

#[cfg(test)]
mod ber_tests {
    use super::*;

    #[test]
    fn short_form() {
        let buf: [u8; 5] = [0x06, 0x03, 0x2B, 0x81, 0x04];
        let node: Node = decode(&buf).unwrap();
        assert_eq!(node.class(), Class::Universal);
        assert_eq!(node.tag(), tag::OBJECT_IDENTIFIER);
        assert!(!node.is_structured());
        assert_eq!(node.contents(), &[0x2B, 0x81, 0x04]);
        assert_eq!(node.byte_length(), 5);
        assert_eq!(node.raw(), &buf);
    }

    #[test]
    fn long_form() {
        let mut buf: Vec<u8> = vec![0x04, 0x82, 0x01, 0x00];
        buf.extend_from_slice(&[0xAB; 256]);
        buf.push(0xFF);

        let node: Node = decode(&buf).unwrap();
        assert_eq!(node.tag(), tag::OCTET_STRING);
        assert_eq!(node.contents().len(), 256);
        assert_eq!(node.byte_length(), 260);
    }

    #[test]
    fn high_tag_number() {
        // [APPLICATION 201] primitive
        let buf: [u8; 5] = [0x5F, 0x81, 0x49, 0x01, 0x00];
        let node: Node = decode(&buf).unwrap();
        assert_eq!(node.class(), Class::Application);
        assert_eq!(node.tag(), 201);
        assert_eq!(node.contents(), &[0x00]);
        assert_eq!(node.byte_length(), 5);
    }

    #[test]
    fn context_specific_structured() {
        let buf: [u8; 5] = [0xA0, 0x03, 0x02, 0x01, 0x02];
        let node: Node = decode(&buf).unwrap();
        assert_eq!(node.identifier(), Identifier::CONTEXT_0);
        let children: Vec<Node> = node.children().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].contents(), &[0x02]);
    }

    #[test]
    fn indefinite_length() {
        let buf: [u8; 8] = [0x30, 0x80, 0x05, 0x00, 0x01, 0x00, 0x00, 0x42];
        let node: Node = decode(&buf).unwrap();
        // contents stop at the first pair of zero octets, trailing data is not consumed
        assert_eq!(node.contents(), &[0x05, 0x00, 0x01]);
        assert_eq!(node.byte_length(), 7);
        assert_eq!(node.raw(), &buf[..7]);

        let buf: [u8; 7] = [0x30, 0x80, 0x04, 0x01, 0xAA, 0x00, 0x00];
        let node: Node = decode(&buf).unwrap();
        assert_eq!(node.contents(), &[0x04, 0x01, 0xAA]);
        assert_eq!(node.byte_length(), 7);
        assert_eq!(node.raw(), &buf);
    }

    #[test]
    fn indefinite_length_unterminated() {
        let buf: [u8; 5] = [0x30, 0x80, 0x04, 0x01, 0xAA];
        assert!(matches!(
            decode(&buf),
            Err(Error::MalformedEncoding {
                field: "contents",
                ..
            })
        ));
    }

    #[test]
    fn length_overruns_input() {
        let buf: [u8; 4] = [0x30, 0x05, 0x02, 0x01];
        assert!(matches!(
            decode(&buf),
            Err(Error::MalformedEncoding {
                field: "contents",
                needed: 5,
                available: 2,
            })
        ));

        // long form with a truncated length field
        let buf: [u8; 3] = [0x30, 0x82, 0x01];
        assert!(matches!(
            decode(&buf),
            Err(Error::MalformedEncoding {
                field: "length",
                ..
            })
        ));

        // huge declared length
        let buf: [u8; 7] = [0x30, 0x84, 0xFF, 0xFF, 0xFF, 0xFF, 0x00];
        assert!(matches!(
            decode(&buf),
            Err(Error::MalformedEncoding { .. })
        ));
    }

    #[test]
    fn long_form_127_length_octets() {
        let mut buf: Vec<u8> = vec![0x04, 0xFF];
        buf.extend_from_slice(&[0x00; 126]);
        buf.extend_from_slice(&[0x01, 0xAA]);

        let node: Node = decode(&buf).unwrap();
        assert_eq!(node.tag(), tag::OCTET_STRING);
        assert_eq!(node.contents(), &[0xAA]);
        assert_eq!(node.byte_length(), buf.len());

        // length field itself cut short
        assert!(matches!(
            decode(&buf[..100]),
            Err(Error::MalformedEncoding {
                field: "length",
                needed: 127,
                ..
            })
        ));
    }

    #[test]
    fn truncated_identifier() {
        assert!(matches!(
            decode(&[]),
            Err(Error::MalformedEncoding {
                field: "identifier",
                ..
            })
        ));
        assert!(matches!(
            decode(&[0x30]),
            Err(Error::MalformedEncoding {
                field: "length",
                ..
            })
        ));
        assert!(matches!(
            decode(&[0x1F, 0x81]),
            Err(Error::MalformedEncoding { field: "tag", .. })
        ));
    }

    #[test]
    fn sequence() {
        let buf: [u8; 8] = [0x02, 0x01, 0x07, 0x05, 0x00, 0x01, 0x01, 0xFF];
        let nodes: Vec<Node> = decode_sequence(&buf).unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].contents(), &[0x07]);
        assert_eq!(nodes[1].tag(), tag::NULL);
        assert!(nodes[1].contents().is_empty());
        assert_eq!(nodes[2].tag(), 1);
        assert_eq!(nodes[2].contents(), &[0xFF]);
        assert_eq!(nodes[2].byte_length(), 3);

        assert!(decode_sequence(&[]).unwrap().is_empty());
    }

    #[test]
    fn sequence_trailing_partial_node() {
        let buf: [u8; 5] = [0x02, 0x01, 0x07, 0x02, 0x02];
        assert!(matches!(
            decode_sequence(&buf),
            Err(Error::MalformedEncoding { .. })
        ));
    }

    #[test]
    fn reencode() {
        let mut long: Vec<u8> = vec![0x04, 0x81, 0x90];
        long.extend_from_slice(&[0x11; 0x90]);

        let samples: [&[u8]; 5] = [
            &[0x06, 0x05, 0x2B, 0x81, 0x04, 0x00, 0x22],
            &[0x30, 0x03, 0x02, 0x01, 0x02],
            &[0xBF, 0x87, 0x68, 0x01, 0xAA],
            &[0x05, 0x00],
            &long,
        ];

        for sample in samples {
            let node: Node = decode(sample).unwrap();
            let der: Vec<u8> = node.to_der();
            assert_eq!(der, sample);

            let again: Node = decode(&der).unwrap();
            assert_eq!(again.class(), node.class());
            assert_eq!(again.tag(), node.tag());
            assert_eq!(again.is_structured(), node.is_structured());
            assert_eq!(again.contents(), node.contents());
        }
    }

    #[test]
    fn reencode_indefinite_as_definite() {
        let buf: [u8; 7] = [0x30, 0x80, 0x04, 0x01, 0xAA, 0x00, 0x00];
        let node: Node = decode(&buf).unwrap();
        let der: Vec<u8> = node.to_der();
        assert_eq!(der, [0x30, 0x03, 0x04, 0x01, 0xAA]);

        let again: Node = decode(&der).unwrap();
        assert_eq!(again.identifier(), Identifier::SEQUENCE);
        assert_eq!(again.contents(), node.contents());
    }
}
