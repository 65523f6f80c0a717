//! BER length octets: short form, long form, and the indefinite form this
//! codec refuses to accept.

use super::{BerError, BerResult};

/// Decode a length prefix from the front of `input`.
///
/// Returns the decoded length and the number of bytes the prefix occupied.
/// Rejects the indefinite-length form (`0x80`) and any long-form length
/// whose byte count exceeds 4 or whose leading byte is `0x00` (non-minimal).
pub fn decode(input: &[u8]) -> BerResult<(usize, usize)> {
    let first = *input.first().ok_or(BerError::EndOfStream)?;
    if first & 0x80 == 0 {
        return Ok((first as usize, 1));
    }
    let n = first & 0x7f;
    if n == 0 {
        return Err(BerError::Malformed(
            "indefinite length form is not accepted".into(),
        ));
    }
    if n > 4 {
        return Err(BerError::Malformed(format!(
            "long-form length uses {n} bytes, more than the 4-byte maximum"
        )));
    }
    let bytes = input
        .get(1..1 + n as usize)
        .ok_or(BerError::EndOfStream)?;
    if bytes[0] == 0x00 {
        return Err(BerError::Malformed(
            "long-form length has a non-minimal leading 0x00 byte".into(),
        ));
    }
    let mut len: usize = 0;
    for b in bytes {
        len = len
            .checked_shl(8)
            .and_then(|v| v.checked_add(*b as usize))
            .ok_or_else(|| BerError::Malformed("length overflow".into()))?;
    }
    Ok((len, 1 + n as usize))
}

/// Encode `len` in canonical (shortest) form, appending to `out`.
pub fn encode(len: usize, out: &mut Vec<u8>) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let mut bytes = Vec::new();
    let mut n = len;
    while n > 0 {
        bytes.push((n & 0xff) as u8);
        n >>= 8;
    }
    bytes.reverse();
    out.push(0x80 | bytes.len() as u8);
    out.extend_from_slice(&bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_form_roundtrip() {
        let mut buf = Vec::new();
        encode(0, &mut buf);
        assert_eq!(buf, vec![0x00]);
        assert_eq!(decode(&buf).unwrap(), (0, 1));

        let mut buf = Vec::new();
        encode(127, &mut buf);
        assert_eq!(buf, vec![0x7f]);
    }

    #[test]
    fn long_form_roundtrip() {
        let mut buf = Vec::new();
        encode(128, &mut buf);
        assert_eq!(buf, vec![0x81, 0x80]);
        assert_eq!(decode(&buf).unwrap(), (128, 2));

        let mut buf = Vec::new();
        encode(70000, &mut buf);
        let (len, consumed) = decode(&buf).unwrap();
        assert_eq!(len, 70000);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn rejects_indefinite_length() {
        assert!(matches!(decode(&[0x80]), Err(BerError::Malformed(_))));
    }

    #[test]
    fn rejects_oversized_long_form() {
        assert!(matches!(
            decode(&[0x85, 1, 2, 3, 4, 5]),
            Err(BerError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_non_minimal_long_form() {
        assert!(matches!(
            decode(&[0x82, 0x00, 0x05]),
            Err(BerError::Malformed(_))
        ));
    }
}
