//! The generic byte-source/byte-sink consumer contract, and an incremental
//! reader/writer pair built on top of it.
//!
//! [`SliceReader`](super::reader::SliceReader)/[`SliceWriter`](super::writer::SliceWriter)
//! are the zero-copy fast path used throughout the protocol-op layer. This
//! module exists for callers that hold a genuine byte stream (a socket, a
//! pipe) rather than a whole message already in memory — the connection
//! layer is out of scope for this crate (see `spec.md` §1), but the
//! boundary it plugs into is not.

use super::element::Element;
use super::{BerError, BerResult};

/// A cancellable source of bytes. `read` returns `Ok(0)` on a clean
/// end-of-stream, matching `std::io::Read`'s convention.
pub trait ByteSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Best-effort hint of how many bytes are immediately available without
    /// blocking; `0` is always a legal (if uninformative) answer.
    fn available(&self) -> usize {
        0
    }
}

/// A cancellable destination for bytes.
pub trait ByteSink {
    fn write(&mut self, bytes: &[u8]) -> std::io::Result<()>;
    fn flush(&mut self) -> std::io::Result<()>;
}

impl ByteSource for &[u8] {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = buf.len().min(self.len());
        buf[..n].copy_from_slice(&self[..n]);
        *self = &self[n..];
        Ok(n)
    }

    fn available(&self) -> usize {
        self.len()
    }
}

impl ByteSink for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Adapts any `std::io::Read` into a [`ByteSource`].
pub struct IoSource<R>(pub R);

impl<R: std::io::Read> ByteSource for IoSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

/// Adapts any `std::io::Write` into a [`ByteSink`].
pub struct IoSink<W>(pub W);

impl<W: std::io::Write> ByteSink for IoSink<W> {
    fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.0.write_all(bytes)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}

fn io_err_to_ber(e: std::io::Error) -> BerError {
    if e.kind() == std::io::ErrorKind::TimedOut || e.kind() == std::io::ErrorKind::Interrupted {
        BerError::Malformed(format!("byte source cancelled or timed out: {e}"))
    } else {
        BerError::Malformed(format!("byte source I/O error: {e}"))
    }
}

/// Reads whole BER elements out of a [`ByteSource`] incrementally, without
/// requiring the caller to already have the full message buffered.
///
/// No internal buffering of complete *messages* is required by the design —
/// this reader buffers only as much as it takes to decode the element
/// currently in flight, then hands ownership of those bytes to the caller
/// via the returned [`Element`].
pub struct StreamReader<S: ByteSource> {
    source: S,
    buf: Vec<u8>,
}

impl<S: ByteSource> StreamReader<S> {
    pub fn new(source: S) -> StreamReader<S> {
        StreamReader {
            source,
            buf: Vec::new(),
        }
    }

    fn fill_at_least(&mut self, needed: usize) -> BerResult<()> {
        let mut chunk = [0u8; 4096];
        while self.buf.len() < needed {
            let n = self.source.read(&mut chunk).map_err(io_err_to_ber)?;
            if n == 0 {
                return Err(BerError::EndOfStream);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }

    /// Decode and return the next whole element, consuming its bytes from
    /// the internal buffer.
    pub fn read_element(&mut self) -> BerResult<Element> {
        // Grow the buffer until a full header parses, then until the
        // header's declared content length is available.
        loop {
            match super::Header::decode(&self.buf) {
                Ok((header, header_len)) => {
                    let total = header_len
                        .checked_add(header.length)
                        .ok_or_else(|| BerError::Malformed("element length overflow".into()))?;
                    self.fill_at_least(total)?;
                    let (element, consumed) = Element::decode_one(&self.buf, 0)?;
                    debug_assert_eq!(consumed, total);
                    self.buf.drain(..consumed);
                    return Ok(element);
                }
                Err(BerError::EndOfStream) => {
                    let before = self.buf.len();
                    self.fill_at_least(before + 1)?;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Writes whole BER elements to a [`ByteSink`], flushing after each one so
/// that (per the ordering guarantee in the design notes) messages reach the
/// sink in the order the caller submitted them.
pub struct StreamWriter<W: ByteSink> {
    sink: W,
}

impl<W: ByteSink> StreamWriter<W> {
    pub fn new(sink: W) -> StreamWriter<W> {
        StreamWriter { sink }
    }

    pub fn write_element(&mut self, element: &Element) -> BerResult<()> {
        let bytes = element.encode();
        self.sink.write(&bytes).map_err(io_err_to_ber)?;
        self.sink.flush().map_err(io_err_to_ber)
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_reader_over_slice_source() {
        let element = Element::new_octet_string(b"hello");
        let bytes = element.encode();
        let mut reader = StreamReader::new(bytes.as_slice());
        let decoded = reader.read_element().unwrap();
        assert_eq!(decoded, element);
    }

    #[test]
    fn stream_reader_handles_fragmented_source() {
        struct Fragmented<'a> {
            chunks: std::collections::VecDeque<&'a [u8]>,
        }
        impl<'a> ByteSource for Fragmented<'a> {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                match self.chunks.pop_front() {
                    Some(chunk) => {
                        let n = chunk.len().min(buf.len());
                        buf[..n].copy_from_slice(&chunk[..n]);
                        Ok(n)
                    }
                    None => Ok(0),
                }
            }
        }
        let element = Element::new_octet_string(b"streamed value");
        let bytes = element.encode();
        let mut chunks = std::collections::VecDeque::new();
        for byte in &bytes {
            chunks.push_back(std::slice::from_ref(byte));
        }
        let mut reader = StreamReader::new(Fragmented { chunks });
        let decoded = reader.read_element().unwrap();
        assert_eq!(decoded, element);
    }

    #[test]
    fn stream_writer_round_trips_through_vec_sink() {
        let element = Element::new_boolean(true);
        let mut writer = StreamWriter::new(Vec::<u8>::new());
        writer.write_element(&element).unwrap();
        let bytes = writer.into_inner();
        assert_eq!(bytes, element.encode());
    }
}
