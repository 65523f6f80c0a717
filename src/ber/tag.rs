//! BER tag class/number and the universal type tags LDAP relies on.

/// Tag class, the top two bits of the identifier octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Class {
    Universal,
    Application,
    ContextSpecific,
    Private,
}

impl Class {
    fn from_bits(bits: u8) -> Class {
        match bits {
            0b00 => Class::Universal,
            0b01 => Class::Application,
            0b10 => Class::ContextSpecific,
            0b11 => Class::Private,
            _ => unreachable!("2-bit value"),
        }
    }

    fn bits(self) -> u8 {
        match self {
            Class::Universal => 0b00,
            Class::Application => 0b01,
            Class::ContextSpecific => 0b10,
            Class::Private => 0b11,
        }
    }
}

/// Universal type tag numbers used by the BER codec and the LDAP grammar.
pub mod universal {
    pub const BOOLEAN: u32 = 1;
    pub const INTEGER: u32 = 2;
    pub const OCTET_STRING: u32 = 4;
    pub const NULL: u32 = 5;
    pub const ENUMERATED: u32 = 10;
    pub const SEQUENCE: u32 = 16;
    pub const SET: u32 = 17;
}

/// A decoded tag/class/constructed triple plus the byte length of the
/// identifier octets themselves (needed by callers that want to know how
/// much of the input the tag consumed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub class: Class,
    pub constructed: bool,
    pub number: u32,
}

impl Tag {
    pub fn universal(number: u32, constructed: bool) -> Tag {
        Tag {
            class: Class::Universal,
            constructed,
            number,
        }
    }

    pub fn context(number: u32, constructed: bool) -> Tag {
        Tag {
            class: Class::ContextSpecific,
            constructed,
            number,
        }
    }

    pub fn application(number: u32, constructed: bool) -> Tag {
        Tag {
            class: Class::Application,
            constructed,
            number,
        }
    }

    /// Decode an identifier octet sequence from the front of `input`.
    /// Returns the tag and the number of bytes consumed.
    pub fn decode(input: &[u8]) -> super::BerResult<(Tag, usize)> {
        let first = *input.first().ok_or(super::BerError::EndOfStream)?;
        let class = Class::from_bits((first & 0xc0) >> 6);
        let constructed = first & 0x20 != 0;
        let low = first & 0x1f;
        if low != 0x1f {
            return Ok((
                Tag {
                    class,
                    constructed,
                    number: low as u32,
                },
                1,
            ));
        }
        // Long form: a base-128 big-endian sequence of octets, high bit set
        // on every octet but the last.
        let mut number: u32 = 0;
        let mut consumed = 1;
        loop {
            let byte = *input
                .get(consumed)
                .ok_or(super::BerError::EndOfStream)?;
            number = number
                .checked_shl(7)
                .and_then(|n| n.checked_add((byte & 0x7f) as u32))
                .ok_or_else(|| super::BerError::Malformed("tag number overflow".into()))?;
            consumed += 1;
            if byte & 0x80 == 0 {
                break;
            }
        }
        Ok((
            Tag {
                class,
                constructed,
                number,
            },
            consumed,
        ))
    }

    /// Encode this tag's identifier octets, appending them to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        let class_bits = self.class.bits() << 6;
        let pc_bit = if self.constructed { 0x20 } else { 0x00 };
        if self.number < 0x1f {
            out.push(class_bits | pc_bit | self.number as u8);
            return;
        }
        out.push(class_bits | pc_bit | 0x1f);
        // Base-128, most significant group first, high bit set on all but
        // the last octet.
        let mut groups = Vec::new();
        let mut n = self.number;
        loop {
            groups.push((n & 0x7f) as u8);
            n >>= 7;
            if n == 0 {
                break;
            }
        }
        for (i, g) in groups.iter().rev().enumerate() {
            let last = i == groups.len() - 1;
            out.push(if last { *g } else { *g | 0x80 });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_form_tag_roundtrip() {
        let tag = Tag::application(3, true);
        let mut buf = Vec::new();
        tag.encode(&mut buf);
        assert_eq!(buf, vec![0x63]);
        let (decoded, consumed) = Tag::decode(&buf).unwrap();
        assert_eq!(consumed, 1);
        assert_eq!(decoded, tag);
    }

    #[test]
    fn long_form_tag_roundtrip() {
        let tag = Tag::context(31, false);
        let mut buf = Vec::new();
        tag.encode(&mut buf);
        assert_eq!(buf[0] & 0x1f, 0x1f);
        let (decoded, consumed) = Tag::decode(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded, tag);

        let big = Tag::context(200, true);
        let mut buf2 = Vec::new();
        big.encode(&mut buf2);
        let (decoded2, consumed2) = Tag::decode(&buf2).unwrap();
        assert_eq!(consumed2, buf2.len());
        assert_eq!(decoded2, big);
    }
}
