//! Streaming BER writer, the encode-side counterpart of [`super::reader`].
//!
//! Nested sequences are handled by the "buffer children, splice the header
//! in afterwards" strategy the design notes call out as acceptable: content
//! is appended directly to the output buffer as it is written, and
//! [`SliceWriter::end_sequence`] inserts the now-known length prefix in
//! front of it. Because handles are always closed innermost-first, the
//! splice for one handle never has to shift bytes belonging to an
//! already-closed sibling.

use super::{encode_integer_bytes, universal, Class, Header, Tag};

/// A handle returned by [`SliceWriter::begin_sequence`] / `begin_tagged`,
/// recording the tag to use and where this element's content starts in the
/// output buffer.
#[derive(Debug)]
pub struct WriteHandle {
    tag: Tag,
    content_start: usize,
}

#[derive(Default)]
pub struct SliceWriter {
    buf: Vec<u8>,
}

impl SliceWriter {
    pub fn new() -> SliceWriter {
        SliceWriter { buf: Vec::new() }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn begin_sequence(&mut self) -> WriteHandle {
        WriteHandle {
            tag: Tag::universal(universal::SEQUENCE, true),
            content_start: self.buf.len(),
        }
    }

    pub fn begin_set(&mut self) -> WriteHandle {
        WriteHandle {
            tag: Tag::universal(universal::SET, true),
            content_start: self.buf.len(),
        }
    }

    pub fn begin_tagged(&mut self, class: Class, number: u32, constructed: bool) -> WriteHandle {
        WriteHandle {
            tag: Tag {
                class,
                constructed,
                number,
            },
            content_start: self.buf.len(),
        }
    }

    /// Close a handle opened with `begin_*`, back-patching the length
    /// prefix now that the content is known.
    pub fn end_sequence(&mut self, handle: WriteHandle) {
        let content_len = self.buf.len() - handle.content_start;
        let mut header = Vec::new();
        Header::encode(handle.tag, content_len, &mut header);
        self.buf.splice(
            handle.content_start..handle.content_start,
            header.into_iter(),
        );
    }

    fn write_primitive(&mut self, tag: Tag, content: &[u8]) {
        Header::encode(tag, content.len(), &mut self.buf);
        self.buf.extend_from_slice(content);
    }

    pub fn write_integer(&mut self, value: i128) {
        let content = encode_integer_bytes(value);
        self.write_primitive(Tag::universal(universal::INTEGER, false), &content);
    }

    pub fn write_enumerated(&mut self, value: i128) {
        let content = encode_integer_bytes(value);
        self.write_primitive(Tag::universal(universal::ENUMERATED, false), &content);
    }

    /// Encode `true` as `0xFF` per the design notes' resolution of the
    /// BOOLEAN-true Open Question (some servers emit `0x01`; this codec
    /// always emits the canonical `0xFF` and accepts any non-zero byte on
    /// decode).
    pub fn write_boolean(&mut self, value: bool) {
        self.write_primitive(
            Tag::universal(universal::BOOLEAN, false),
            &[if value { 0xff } else { 0x00 }],
        );
    }

    pub fn write_octet_string(&mut self, content: &[u8]) {
        self.write_primitive(Tag::universal(universal::OCTET_STRING, false), content);
    }

    pub fn write_null(&mut self) {
        self.write_primitive(Tag::universal(universal::NULL, false), &[]);
    }

    /// Write an IMPLICIT-tagged primitive field (e.g. `[0] OCTET STRING`).
    pub fn write_tagged_primitive(&mut self, class: Class, number: u32, content: &[u8]) {
        self.write_primitive(
            Tag {
                class,
                constructed: false,
                number,
            },
            content,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ber::reader::SliceReader;

    #[test]
    fn nested_sequences_backpatch_correctly() {
        let mut w = SliceWriter::new();
        let outer = w.begin_sequence();
        w.write_integer(1);
        let inner = w.begin_sequence();
        w.write_boolean(true);
        w.write_boolean(false);
        w.end_sequence(inner);
        w.write_octet_string(b"tail");
        w.end_sequence(outer);
        let bytes = w.into_bytes();

        let mut r = SliceReader::new(&bytes);
        let outer_h = r.begin_sequence().unwrap();
        assert_eq!(r.read_integer().unwrap(), 1);
        let inner_h = r.begin_sequence().unwrap();
        assert!(r.read_boolean().unwrap());
        assert!(!r.read_boolean().unwrap());
        r.end_sequence(inner_h).unwrap();
        assert_eq!(r.read_octet_string().unwrap(), b"tail");
        r.end_sequence(outer_h).unwrap();
    }

    #[test]
    fn canonical_boolean_true_is_0xff() {
        let mut w = SliceWriter::new();
        w.write_boolean(true);
        assert_eq!(w.into_bytes(), vec![0x01, 0x01, 0xff]);
    }
}
