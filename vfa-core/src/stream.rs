// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stream composition
//!
//! Byte streams handed out by nodes are plain `Read` / `Write` objects,
//! optionally random-access. This module adds the random-access traits and
//! the wrappers layered on top of arbitrary streams: bounded views,
//! in-memory random access, and transparent checksumming.

use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use crate::checksum::StreamDigest;
use crate::error::{VfaError, VfaResult};

/// Seekable byte reader with a known length
pub trait RandomRead: Read + Seek + Send {
    fn length(&mut self) -> io::Result<u64>;

    fn offset(&mut self) -> io::Result<u64> {
        self.stream_position()
    }

    /// Fill `buf` completely or fail with [`VfaError::EndOfInput`].
    fn read_fully(&mut self, buf: &mut [u8]) -> VfaResult<()> {
        self.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => VfaError::EndOfInput,
            _ => VfaError::Io(e),
        })
    }
}

/// Seekable byte writer whose length can be set directly
pub trait RandomWrite: Write + Seek + Send {
    fn length(&mut self) -> io::Result<u64>;

    fn offset(&mut self) -> io::Result<u64> {
        self.stream_position()
    }

    /// Grow (zero padded) or truncate. The offset is left alone unless it
    /// lies past the new end, in which case it is clamped to it.
    fn set_length(&mut self, len: u64) -> io::Result<()>;
}

impl RandomRead for File {
    fn length(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }
}

impl RandomWrite for File {
    fn length(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn set_length(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        if self.stream_position()? > len {
            self.seek(SeekFrom::Start(len))?;
        }
        Ok(())
    }
}

impl<R: RandomRead + ?Sized> RandomRead for Box<R> {
    fn length(&mut self) -> io::Result<u64> {
        (**self).length()
    }
}

impl<W: RandomWrite + ?Sized> RandomWrite for Box<W> {
    fn length(&mut self) -> io::Result<u64> {
        (**self).length()
    }

    fn set_length(&mut self, len: u64) -> io::Result<()> {
        (**self).set_length(len)
    }
}

/// Random access over an in-memory buffer
#[derive(Debug, Default, Clone)]
pub struct MemoryRandomAccess {
    cursor: Cursor<Vec<u8>>,
}

impl MemoryRandomAccess {
    pub fn new(data: Vec<u8>) -> Self {
        Self { cursor: Cursor::new(data) }
    }

    /// Buffer the whole of `reader`.
    pub fn from_reader(reader: &mut dyn Read) -> io::Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Self::new(data))
    }

    pub fn get_ref(&self) -> &[u8] {
        self.cursor.get_ref()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.cursor.into_inner()
    }
}

impl Read for MemoryRandomAccess {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Write for MemoryRandomAccess {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.cursor.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryRandomAccess {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl RandomRead for MemoryRandomAccess {
    fn length(&mut self) -> io::Result<u64> {
        Ok(self.cursor.get_ref().len() as u64)
    }
}

impl RandomWrite for MemoryRandomAccess {
    fn length(&mut self) -> io::Result<u64> {
        Ok(self.cursor.get_ref().len() as u64)
    }

    fn set_length(&mut self, len: u64) -> io::Result<()> {
        let len_usize = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length too large"))?;
        self.cursor.get_mut().resize(len_usize, 0);
        if self.cursor.position() > len {
            self.cursor.set_position(len);
        }
        Ok(())
    }
}

/// Reader that reports end of input after `limit` bytes
pub struct BoundedReader<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read> BoundedReader<R> {
    pub fn new(inner: R, limit: u64) -> Self {
        Self { inner, remaining: limit }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for BoundedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Ok(0);
        }
        let max = buf.len().min(self.remaining.min(usize::MAX as u64) as usize);
        let n = self.inner.read(&mut buf[..max])?;
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Random-access window `[start, start + len)` over another random reader
pub struct BoundedWindow<R> {
    inner: R,
    start: u64,
    len: u64,
    pos: u64,
}

impl<R: RandomRead> BoundedWindow<R> {
    pub fn new(mut inner: R, start: u64, len: u64) -> io::Result<Self> {
        let available = inner.length()?;
        if start.checked_add(len).map_or(true, |end| end > available) {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("window {start}+{len} exceeds stream length {available}"),
            ));
        }
        inner.seek(SeekFrom::Start(start))?;
        Ok(Self { inner, start, len, pos: 0 })
    }
}

impl<R: RandomRead> Read for BoundedWindow<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let left = self.len.saturating_sub(self.pos);
        if left == 0 {
            return Ok(0);
        }
        let max = buf.len().min(left.min(usize::MAX as u64) as usize);
        let n = self.inner.read(&mut buf[..max])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: RandomRead> Seek for BoundedWindow<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::End(d) => self.len.checked_add_signed(d),
            SeekFrom::Current(d) => self.pos.checked_add_signed(d),
        }
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek before start of window"))?;
        // Positions past the end are allowed and simply read as EOF.
        self.inner.seek(SeekFrom::Start(self.start + target.min(self.len)))?;
        self.pos = target;
        Ok(target)
    }
}

impl<R: RandomRead> RandomRead for BoundedWindow<R> {
    fn length(&mut self) -> io::Result<u64> {
        Ok(self.len)
    }
}

/// Reader that digests everything passing through it
pub struct ChecksumReader<R> {
    inner: R,
    digest: Box<dyn StreamDigest>,
}

impl<R: Read> ChecksumReader<R> {
    pub fn new(inner: R, digest: Box<dyn StreamDigest>) -> Self {
        Self { inner, digest }
    }

    /// Drain what is left of the stream and return the digest.
    pub fn finish(mut self) -> io::Result<String> {
        io::copy(&mut self, &mut io::sink())?;
        Ok(self.digest.finish())
    }
}

impl<R: Read> Read for ChecksumReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.digest.update(&buf[..n]);
        Ok(n)
    }
}

/// Writer that digests everything written through it
pub struct ChecksumWriter<W> {
    inner: W,
    digest: Box<dyn StreamDigest>,
}

impl<W: Write> ChecksumWriter<W> {
    pub fn new(inner: W, digest: Box<dyn StreamDigest>) -> Self {
        Self { inner, digest }
    }

    /// Flush the inner writer and return it with the digest.
    pub fn finish(mut self) -> io::Result<(W, String)> {
        self.inner.flush()?;
        Ok((self.inner, self.digest.finish()))
    }
}

impl<W: Write> Write for ChecksumWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.digest.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Pump `reader` into `writer`, returning the number of bytes copied.
pub fn copy_stream(
    reader: &mut dyn Read,
    writer: &mut dyn Write,
    buffer_size: usize,
) -> io::Result<u64> {
    let mut buf = vec![0u8; buffer_size.max(512)];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
    writer.flush()?;
    Ok(total)
}

/// Best-effort flush used on cleanup paths; failures are logged, not raised.
pub fn close_quietly(writer: &mut dyn Write, what: &dyn fmt::Display) {
    if let Err(e) = writer.flush() {
        tracing::warn!("Ignoring close failure for {}: {}", what, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::ChecksumRegistry;

    #[test]
    fn test_bounded_reader_stops_at_limit() {
        let data = b"0123456789";
        let mut reader = BoundedReader::new(&data[..], 4);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"0123");
        assert_eq!(reader.remaining(), 0);
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_window_reads_and_seeks() {
        let inner = MemoryRandomAccess::new(b"headerPAYLOADtrailer".to_vec());
        let mut window = BoundedWindow::new(inner, 6, 7).unwrap();
        assert_eq!(window.length().unwrap(), 7);

        let mut out = String::new();
        window.read_to_string(&mut out).unwrap();
        assert_eq!(out, "PAYLOAD");

        window.seek(SeekFrom::Start(3)).unwrap();
        let mut buf = [0u8; 4];
        window.read_fully(&mut buf).unwrap();
        assert_eq!(&buf, b"LOAD");
        assert_eq!(window.offset().unwrap(), 7);

        window.seek(SeekFrom::End(-2)).unwrap();
        let mut buf = [0u8; 4];
        assert!(matches!(window.read_fully(&mut buf), Err(VfaError::EndOfInput)));
    }

    #[test]
    fn test_window_rejects_out_of_range() {
        let inner = MemoryRandomAccess::new(vec![0; 10]);
        assert!(BoundedWindow::new(inner, 8, 4).is_err());
    }

    #[test]
    fn test_memory_random_access_growth() {
        let mut ra = MemoryRandomAccess::default();
        ra.write_all(&[1u8; 100]).unwrap();
        assert_eq!(RandomWrite::length(&mut ra).unwrap(), 100);
        assert_eq!(RandomWrite::offset(&mut ra).unwrap(), 100);

        ra.set_length(200).unwrap();
        assert_eq!(RandomWrite::length(&mut ra).unwrap(), 200);
        assert_eq!(RandomWrite::offset(&mut ra).unwrap(), 100);

        ra.set_length(50).unwrap();
        assert_eq!(RandomWrite::length(&mut ra).unwrap(), 50);
        assert_eq!(RandomWrite::offset(&mut ra).unwrap(), 50);
    }

    #[test]
    fn test_read_fully_short_read_is_end_of_input() {
        let mut ra = MemoryRandomAccess::new(vec![1, 2, 3]);
        let mut buf = [0u8; 8];
        assert!(matches!(ra.read_fully(&mut buf), Err(VfaError::EndOfInput)));
    }

    #[test]
    fn test_checksum_reader_and_writer_agree() {
        let registry = ChecksumRegistry::new();
        let data = vec![42u8; 10_000];

        let reader = ChecksumReader::new(&data[..], registry.digest("MD5").unwrap());
        let read_digest = reader.finish().unwrap();

        let mut writer = ChecksumWriter::new(Vec::new(), registry.digest("MD5").unwrap());
        writer.write_all(&data).unwrap();
        let (written, write_digest) = writer.finish().unwrap();

        assert_eq!(written, data);
        assert_eq!(read_digest, write_digest);
        assert_eq!(read_digest, registry.checksum_bytes("MD5", &data).unwrap());
    }

    #[test]
    fn test_copy_stream() {
        let data = vec![9u8; 70_000];
        let mut out = Vec::new();
        let n = copy_stream(&mut &data[..], &mut out, 4096).unwrap();
        assert_eq!(n, 70_000);
        assert_eq!(out, data);
    }
}
