//! BER/ASN.1 codec: the bottom layer of this crate.
//!
//! Two flavors are provided, matching the design notes:
//!
//! - [`element`] — a buffered tree ([`element::Element`]) holding a whole
//!   decoded value in memory, useful for controls and other opaque blobs.
//! - [`reader`]/[`writer`] — a streaming cursor over a byte slice that
//!   emits/consumes primitive values without materializing a full tree; this
//!   is what the protocol-op layer (`codec.rs`) uses, borrowing straight out
//!   of the slice instead of copying.
//! - [`stream`] — the generic `ByteSource`/`ByteSink` consumer contract and
//!   an incremental reader/writer pair over it, for callers that genuinely
//!   stream bytes rather than holding a whole message in memory.

pub mod element;
pub mod length;
pub mod reader;
pub mod stream;
pub mod tag;
pub mod writer;

pub use tag::{universal, Class, Tag};

/// Error type for the BER layer, independent of any LDAP semantics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BerError {
    #[error("unexpected end of stream")]
    EndOfStream,
    #[error("malformed BER: {0}")]
    Malformed(String),
    #[error("recursion limit ({limit}) exceeded")]
    RecursionLimitExceeded { limit: usize },
}

pub type BerResult<T> = Result<T, BerError>;

/// Whether to accept non-minimal INTEGER/ENUMERATED encodings on decode.
///
/// Lenient acceptance of non-minimal integers is the traditional posture for
/// LDAP client libraries (some servers are sloppy); `Strict` is offered for
/// callers that want to fail closed instead. See the Open Questions in the
/// design notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeMode {
    #[default]
    Lenient,
    Strict,
}

/// A decoded identifier + length pair: everything needed to know how many
/// content bytes follow and how to interpret them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub tag: Tag,
    pub length: usize,
}

impl Header {
    /// Decode a TLV header from the front of `input`.
    /// Returns the header and the number of bytes the identifier+length
    /// octets occupied (content starts right after).
    pub fn decode(input: &[u8]) -> BerResult<(Header, usize)> {
        let (tag, tag_len) = Tag::decode(input)?;
        let (length, len_len) = length::decode(&input[tag_len..])?;
        Ok((Header { tag, length }, tag_len + len_len))
    }

    /// Encode the identifier+length octets for a value of `content_len`
    /// bytes, appending to `out`.
    pub fn encode(tag: Tag, content_len: usize, out: &mut Vec<u8>) {
        tag.encode(out);
        length::encode(content_len, out);
    }
}

/// Verify that `bytes` is the minimum-length two's-complement encoding of an
/// integer: no leading `0x00` or `0xFF` byte that could be dropped without
/// changing the represented value. Accepted laxly on decode unless `mode` is
/// [`DecodeMode::Strict`]; always enforced on encode.
pub(crate) fn is_minimal_integer(bytes: &[u8]) -> bool {
    match bytes {
        [] => false,
        [_] => true,
        [0x00, second, ..] => second & 0x80 != 0,
        [0xff, second, ..] => second & 0x80 == 0,
        _ => true,
    }
}

/// Encode a signed big-endian two's-complement integer in minimal form.
pub(crate) fn encode_integer_bytes(mut value: i128) -> Vec<u8> {
    if value == 0 {
        return vec![0];
    }
    let mut bytes = Vec::new();
    let negative = value < 0;
    loop {
        bytes.push((value & 0xff) as u8);
        value >>= 8;
        if (negative && value == -1 && bytes.last().unwrap() & 0x80 != 0)
            || (!negative && value == 0 && bytes.last().unwrap() & 0x80 == 0)
        {
            break;
        }
    }
    bytes.reverse();
    bytes
}

/// Decode a signed big-endian two's-complement integer.
pub(crate) fn decode_integer_bytes(bytes: &[u8]) -> BerResult<i128> {
    if bytes.is_empty() {
        return Err(BerError::Malformed("empty INTEGER content".into()));
    }
    if bytes.len() > 16 {
        return Err(BerError::Malformed(
            "INTEGER too large for this implementation".into(),
        ));
    }
    let negative = bytes[0] & 0x80 != 0;
    let mut value: i128 = if negative { -1 } else { 0 };
    for b in bytes {
        value = (value << 8) | (*b as i128);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_bytes_roundtrip() {
        for v in [0i128, 1, -1, 127, 128, -128, -129, 1000000, -1000000] {
            let bytes = encode_integer_bytes(v);
            assert!(is_minimal_integer(&bytes), "not minimal: {v} -> {bytes:?}");
            assert_eq!(decode_integer_bytes(&bytes).unwrap(), v);
        }
    }

    #[test]
    fn rejects_non_minimal_integer() {
        assert!(!is_minimal_integer(&[0x00, 0x7f]));
        assert!(is_minimal_integer(&[0x00, 0x80]));
        assert!(!is_minimal_integer(&[0xff, 0x80]));
        assert!(is_minimal_integer(&[0xff, 0x7f]));
    }

    #[test]
    fn header_roundtrip() {
        let mut buf = Vec::new();
        Header::encode(Tag::application(3, true), 200, &mut buf);
        let (header, consumed) = Header::decode(&buf).unwrap();
        assert_eq!(header.length, 200);
        assert_eq!(consumed, buf.len());
        assert_eq!(header.tag, Tag::application(3, true));
    }
}
