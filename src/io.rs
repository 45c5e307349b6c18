//! Reader and writer adapters handed to the engine

use std::io::{self, Read, Seek, SeekFrom, Write};

/// How the engine sees the input while parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// Whole input as one contiguous buffer the engine indexes directly
    #[default]
    InMemory,
    /// Seekable stream queried through [`HeifReader`] callbacks
    Streaming,
}

/// Answer to [`HeifReader::wait_for_size`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeStatus {
    /// At least the requested number of bytes exist
    Available,
    /// The input ends before the requested size
    Unavailable,
    Error,
}

/// Pull-side input callbacks
pub trait HeifReader {
    /// Current read offset
    fn position(&mut self) -> u64;

    fn seek(&mut self, position: u64) -> io::Result<()>;

    /// Fill `buf` as far as the input allows; returns the byte count,
    /// which is short only at end of input
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Whether the input is at least `target` bytes long
    fn wait_for_size(&mut self, target: u64) -> SizeStatus;
}

/// Push-side output callback
pub trait HeifWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<()>;
}

impl<W: Write + ?Sized> HeifWriter for W {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.write_all(data)
    }
}

/// [`HeifReader`] over any `Read + Seek` stream
#[derive(Debug)]
pub struct StreamReader<R> {
    inner: R,
}

impl<R: Read + Seek> StreamReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> HeifReader for StreamReader<R> {
    fn position(&mut self) -> u64 {
        self.inner.stream_position().unwrap_or(0)
    }

    fn seek(&mut self, position: u64) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(position)).map(|_| ())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    fn wait_for_size(&mut self, target: u64) -> SizeStatus {
        let size = (|| {
            let current = self.inner.stream_position()?;
            let end = self.inner.seek(SeekFrom::End(0))?;
            self.inner.seek(SeekFrom::Start(current))?;
            io::Result::Ok(end)
        })();
        match size {
            Ok(end) if target <= end => SizeStatus::Available,
            Ok(_) => SizeStatus::Unavailable,
            Err(_) => SizeStatus::Error,
        }
    }
}

/// Read up to `len` bytes from the start of a stream, restoring its position
pub(crate) fn peek_prefix<R: Read + Seek>(reader: &mut R, len: usize) -> io::Result<Vec<u8>> {
    let start = reader.stream_position()?;
    reader.seek(SeekFrom::Start(0))?;
    let mut buf = Vec::with_capacity(len);
    let result = reader.by_ref().take(len as u64).read_to_end(&mut buf);
    reader.seek(SeekFrom::Start(start))?;
    result.map(|_| buf)
}
