//! The buffered element model: a whole BER value tree held in memory.
//!
//! This is the coarser of the two BER flavors (see the [module docs][super]);
//! it is used for opaque control values and other blobs that are easiest to
//! reason about as a materialized tree rather than a cursor.

use super::{BerError, BerResult, Class, Header, Tag};

/// A single decoded BER element: either primitive content (raw bytes) or a
/// constructed sequence of child elements, in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    Primitive { tag: Tag, content: Vec<u8> },
    Constructed { tag: Tag, children: Vec<Element> },
}

impl Element {
    pub fn tag(&self) -> Tag {
        match self {
            Element::Primitive { tag, .. } => *tag,
            Element::Constructed { tag, .. } => *tag,
        }
    }

    /// Raw content bytes, if this is a primitive element.
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Element::Primitive { content, .. } => Some(content),
            Element::Constructed { .. } => None,
        }
    }

    /// Child elements, if this is a constructed element.
    pub fn children(&self) -> Option<&[Element]> {
        match self {
            Element::Constructed { children, .. } => Some(children),
            Element::Primitive { .. } => None,
        }
    }

    /// Decode a single element from `input`. Rejects trailing garbage after
    /// the outermost length: a caller that wants to decode a single
    /// self-contained value should see `Ok` only when `input` is exactly
    /// that value.
    pub fn decode(input: &[u8]) -> BerResult<Element> {
        let (element, consumed) = Element::decode_one(input, 0)?;
        if consumed != input.len() {
            return Err(BerError::Malformed(
                "trailing bytes after outermost BER element".into(),
            ));
        }
        Ok(element)
    }

    /// Decode a single element from the front of `input`, returning the
    /// number of bytes consumed. Used internally for constructed children,
    /// where trailing-garbage rejection does not apply (a sibling follows).
    pub fn decode_one(input: &[u8], depth: usize) -> BerResult<(Element, usize)> {
        const MAX_DEPTH: usize = 100;
        if depth > MAX_DEPTH {
            return Err(BerError::RecursionLimitExceeded { limit: MAX_DEPTH });
        }
        let (header, header_len) = Header::decode(input)?;
        let total = header_len
            .checked_add(header.length)
            .ok_or_else(|| BerError::Malformed("element length overflow".into()))?;
        let content = input
            .get(header_len..total)
            .ok_or(BerError::EndOfStream)?;
        if !header.tag.constructed {
            return Ok((
                Element::Primitive {
                    tag: header.tag,
                    content: content.to_vec(),
                },
                total,
            ));
        }
        let mut children = Vec::new();
        let mut offset = 0;
        while offset < content.len() {
            let (child, child_len) = Element::decode_one(&content[offset..], depth + 1)?;
            // A child's declared length must not run past its parent's
            // content.
            if offset + child_len > content.len() {
                return Err(BerError::Malformed(
                    "nested element length exceeds parent content length".into(),
                ));
            }
            offset += child_len;
            children.push(child);
        }
        Ok((
            Element::Constructed {
                tag: header.tag,
                children,
            },
            total,
        ))
    }

    /// Encode this element (and, recursively, its children) in canonical
    /// (shortest-length) form.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Element::Primitive { tag, content } => {
                Header::encode(*tag, content.len(), out);
                out.extend_from_slice(content);
            }
            Element::Constructed { tag, children } => {
                let mut body = Vec::new();
                for child in children {
                    child.encode_into(&mut body);
                }
                Header::encode(*tag, body.len(), out);
                out.extend_from_slice(&body);
            }
        }
    }

    pub fn new_boolean(value: bool) -> Element {
        Element::Primitive {
            tag: Tag::universal(super::universal::BOOLEAN, false),
            content: vec![if value { 0xff } else { 0x00 }],
        }
    }

    pub fn as_boolean(&self) -> BerResult<bool> {
        let content = self
            .bytes()
            .ok_or_else(|| BerError::Malformed("BOOLEAN must be primitive".into()))?;
        if content.len() != 1 {
            return Err(BerError::Malformed(
                "BOOLEAN content must be exactly one byte".into(),
            ));
        }
        Ok(content[0] != 0)
    }

    pub fn new_null() -> Element {
        Element::Primitive {
            tag: Tag::universal(super::universal::NULL, false),
            content: Vec::new(),
        }
    }

    pub fn as_null(&self) -> BerResult<()> {
        let content = self
            .bytes()
            .ok_or_else(|| BerError::Malformed("NULL must be primitive".into()))?;
        if !content.is_empty() {
            return Err(BerError::Malformed("NULL content must be empty".into()));
        }
        Ok(())
    }

    pub fn new_octet_string(bytes: &[u8]) -> Element {
        Element::Primitive {
            tag: Tag::universal(super::universal::OCTET_STRING, false),
            content: bytes.to_vec(),
        }
    }

    pub fn as_octet_string(&self) -> BerResult<&[u8]> {
        self.bytes()
            .ok_or_else(|| BerError::Malformed("OCTET STRING must be primitive".into()))
    }

    pub fn class(&self) -> Class {
        self.tag().class
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_roundtrip() {
        let e = Element::new_boolean(true);
        assert_eq!(e.encode(), vec![0x01, 0x01, 0xff]);
        assert!(Element::decode(&e.encode()).unwrap().as_boolean().unwrap());

        let e = Element::new_boolean(false);
        assert_eq!(e.encode(), vec![0x01, 0x01, 0x00]);
        assert!(!Element::decode(&e.encode()).unwrap().as_boolean().unwrap());
    }

    #[test]
    fn any_nonzero_byte_is_true() {
        let bytes = [0x01, 0x01, 0x2a];
        let element = Element::decode(&bytes).unwrap();
        assert!(element.as_boolean().unwrap());
    }

    #[test]
    fn sequence_of_children_roundtrip() {
        let seq = Element::Constructed {
            tag: Tag::universal(super::super::universal::SEQUENCE, true),
            children: vec![Element::new_boolean(true), Element::new_null()],
        };
        let bytes = seq.encode();
        let decoded = Element::decode(&bytes).unwrap();
        assert_eq!(decoded, seq);
    }

    #[test]
    fn rejects_trailing_garbage() {
        let mut bytes = Element::new_null().encode();
        bytes.push(0xaa);
        assert!(Element::decode(&bytes).is_err());
    }

    #[test]
    fn rejects_child_overrunning_parent() {
        // SEQUENCE declares length 2 but its child claims length 5.
        let bytes = [0x30, 0x02, 0x04, 0x05, 0x01, 0x02, 0x03];
        assert!(Element::decode(&bytes).is_err());
    }
}
