// every reader returns (remaining, value), mirroring how the decoders walk a
// buffer front to back

use crate::Error;

pub fn u8<'a>(field: &'static str, buf: &'a [u8]) -> Result<(&'a [u8], u8), Error> {
    match buf.split_first() {
        Some((val, remain)) => Ok((remain, *val)),
        None => {
            log::error!("{field} is missing");
            Err(Error::MalformedEncoding {
                field,
                needed: 1,
                available: 0,
            })
        }
    }
}

pub fn n<'a>(
    field: &'static str,
    buf: &'a [u8],
    len: usize,
) -> Result<(&'a [u8], &'a [u8]), Error> {
    match buf.split_at_checked(len) {
        Some((val, remain)) => Ok((remain, val)),
        None => {
            log::error!(
                "{field} does not have enough data for length {len}, {} bytes remain",
                buf.len()
            );
            Err(Error::MalformedEncoding {
                field,
                needed: len,
                available: buf.len(),
            })
        }
    }
}

/// Big-endian unsigned integer of `len` octets.
pub fn be_uint<'a>(
    field: &'static str,
    buf: &'a [u8],
    len: usize,
) -> Result<(&'a [u8], usize), Error> {
    let (remain, octets) = n(field, buf, len)?;

    let mut val: usize = 0;
    for &byte in octets {
        val = match val.checked_mul(256) {
            Some(shifted) => shifted | usize::from(byte),
            None => {
                log::error!("{field} of {len} octets overflows usize");
                return Err(Error::MalformedEncoding {
                    field,
                    needed: len,
                    available: size_of::<usize>(),
                });
            }
        };
    }

    Ok((remain, val))
}

/// Base-128 integer where every octet except the last has the top bit set.
///
/// Used by high tag numbers and OBJECT IDENTIFIER arcs.
pub fn base128<'a>(field: &'static str, buf: &'a [u8]) -> Result<(&'a [u8], u64), Error> {
    let mut val: u64 = 0;

    for (i, &byte) in buf.iter().enumerate() {
        if val > (u64::MAX >> 7) {
            log::error!("{field} overflows u64 after {i} octets");
            return Err(Error::MalformedEncoding {
                field,
                needed: i.saturating_add(1),
                available: i,
            });
        }

        val = (val << 7) | u64::from(byte & 0x7F);

        if byte & 0x80 == 0 {
            return Ok((&buf[i + 1..], val));
        }
    }

    log::error!("{field} has an unterminated multi-byte encoding");
    Err(Error::MalformedEncoding {
        field,
        needed: buf.len().saturating_add(1),
        available: buf.len(),
    })
}

/// Contents of an indefinite-length encoding, up to the first pair of zero
/// octets.
///
/// Returns the data after the terminator and the contents before it.
pub fn until_end_of_contents<'a>(
    field: &'static str,
    buf: &'a [u8],
) -> Result<(&'a [u8], &'a [u8]), Error> {
    match buf.windows(2).position(|w| w == [0x00, 0x00]) {
        Some(end) => Ok((&buf[end + 2..], &buf[..end])),
        None => {
            log::error!(
                "{field} indefinite length is missing the end-of-contents octets in {} bytes",
                buf.len()
            );
            Err(Error::MalformedEncoding {
                field,
                needed: buf.len().saturating_add(2),
                available: buf.len(),
            })
        }
    }
}
