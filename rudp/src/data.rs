//! Byte sources and sinks
//!
//! The sender pulls payload from a [`ByteSource`]; the receiver pushes
//! in-order payload into a [`ByteSink`].

use std::io::{self, ErrorKind, Read, Write};

/// Supplies payload bytes to the sender
pub trait ByteSource {
    /// Fill up to `buf.len()` bytes. Returning 0 means the source is exhausted.
    fn get_data(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Consumes payload bytes delivered by the receiver
pub trait ByteSink {
    /// Process one packet's payload, returning the number of bytes consumed
    fn process_data(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Push out anything buffered
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn get_data(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).get_data(buf)
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn get_data(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).get_data(buf)
    }
}

impl<K: ByteSink + ?Sized> ByteSink for &mut K {
    fn process_data(&mut self, data: &[u8]) -> io::Result<usize> {
        (**self).process_data(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

impl<K: ByteSink + ?Sized> ByteSink for Box<K> {
    fn process_data(&mut self, data: &[u8]) -> io::Result<usize> {
        (**self).process_data(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

/// Collects everything in memory
impl ByteSink for Vec<u8> {
    fn process_data(&mut self, data: &[u8]) -> io::Result<usize> {
        self.extend_from_slice(data);
        Ok(data.len())
    }
}

/// Endless synthetic data: every call fills the whole buffer with one
/// letter, cycling `A` through `Z`
#[derive(Debug, Default)]
pub struct DummySource {
    count: u64,
}

impl DummySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Letter used for the `n`th call
    pub fn letter(n: u64) -> u8 {
        b'A' + (n % 26) as u8
    }
}

impl ByteSource for DummySource {
    fn get_data(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        buf.fill(Self::letter(self.count));
        self.count += 1;
        Ok(buf.len())
    }
}

/// Source backed by any reader (file, stdin, ...)
///
/// Reads until the buffer is full or the reader hits end of file, so every
/// packet but the last carries a full payload.
pub struct ReaderSource<R> {
    reader: R,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        ReaderSource { reader }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> ByteSource for ReaderSource<R> {
    fn get_data(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

/// Sink backed by any writer (file, stdout, ...)
pub struct WriterSink<W> {
    writer: W,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        WriterSink { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ByteSink for WriterSink<W> {
    fn process_data(&mut self, data: &[u8]) -> io::Result<usize> {
        self.writer.write_all(data)?;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Discards everything, counting bytes
#[derive(Debug, Default)]
pub struct NullSink {
    bytes: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes discarded
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl ByteSink for NullSink {
    fn process_data(&mut self, data: &[u8]) -> io::Result<usize> {
        self.bytes += data.len() as u64;
        Ok(data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_dummy_source_cycles_letters() {
        let mut source = DummySource::new();
        let mut buf = [0u8; 4];

        source.get_data(&mut buf).unwrap();
        assert_eq!(&buf, b"AAAA");
        source.get_data(&mut buf).unwrap();
        assert_eq!(&buf, b"BBBB");

        for _ in 2..26 {
            source.get_data(&mut buf).unwrap();
        }
        assert_eq!(&buf, b"ZZZZ");
        source.get_data(&mut buf).unwrap();
        assert_eq!(&buf, b"AAAA");
    }

    #[test]
    fn test_reader_source_fills_then_exhausts() {
        let data: Vec<u8> = (0..10u8).collect();
        let mut source = ReaderSource::new(Cursor::new(data));
        let mut buf = [0u8; 4];

        assert_eq!(source.get_data(&mut buf).unwrap(), 4);
        assert_eq!(&buf, &[0, 1, 2, 3]);
        assert_eq!(source.get_data(&mut buf).unwrap(), 4);
        assert_eq!(source.get_data(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[8, 9]);
        assert_eq!(source.get_data(&mut buf).unwrap(), 0);
    }

    /// Reader that hands out one byte per call
    struct Trickle(Vec<u8>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0.is_empty() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.0.remove(0);
            Ok(1)
        }
    }

    #[test]
    fn test_reader_source_coalesces_short_reads() {
        let mut source = ReaderSource::new(Trickle(b"abcdef".to_vec()));
        let mut buf = [0u8; 4];
        assert_eq!(source.get_data(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
    }

    #[test]
    fn test_writer_sink() {
        let mut sink = WriterSink::new(Vec::new());
        assert_eq!(sink.process_data(b"hello ").unwrap(), 6);
        sink.process_data(b"world").unwrap();
        sink.flush().unwrap();
        assert_eq!(sink.into_inner(), b"hello world");
    }

    #[test]
    fn test_null_sink_counts() {
        let mut sink = NullSink::new();
        sink.process_data(&[0u8; 512]).unwrap();
        sink.process_data(&[0u8; 12]).unwrap();
        assert_eq!(sink.bytes(), 524);
    }

    #[test]
    fn test_vec_sink_through_reference() {
        let mut collected = Vec::new();
        {
            let mut sink = &mut collected;
            ByteSink::process_data(&mut sink, b"xy").unwrap();
        }
        assert_eq!(collected, b"xy");
    }
}
