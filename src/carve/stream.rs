//! Low-level stream primitives: endian-aware integer reads and the
//! bounded-buffer output materializer shared by both extractors.

use std::fs::File;
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::PathBuf;

use super::CarveError;

/// Chunk size used when materializing a sized dump.
const COPY_BUFFER_LEN: usize = 512 * 1024;

/// Byte order of multi-byte integers in a TIFF candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Endian {
    Little,
    Big,
}

/// Read a single byte from the stream. `None` means end of stream.
pub(crate) fn read_byte<R: Read>(input: &mut R) -> Result<Option<u8>, CarveError> {
    let mut buf = [0u8; 1];
    loop {
        match input.read(&mut buf) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(buf[0])),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(CarveError::Input(e)),
        }
    }
}

/// Read exactly two bytes as an unsigned 16-bit integer.
pub(crate) fn read_u16<R: Read>(input: &mut R, endian: Endian) -> Result<u16, CarveError> {
    let mut buf = [0u8; 2];
    fill(input, &mut buf)?;
    Ok(match endian {
        Endian::Little => u16::from_le_bytes(buf),
        Endian::Big => u16::from_be_bytes(buf),
    })
}

/// Read exactly four bytes as an unsigned 32-bit integer.
pub(crate) fn read_u32<R: Read>(input: &mut R, endian: Endian) -> Result<u32, CarveError> {
    let mut buf = [0u8; 4];
    fill(input, &mut buf)?;
    Ok(match endian {
        Endian::Little => u32::from_le_bytes(buf),
        Endian::Big => u32::from_be_bytes(buf),
    })
}

fn fill<R: Read>(input: &mut R, buf: &mut [u8]) -> Result<(), CarveError> {
    input.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => CarveError::Truncated,
        _ => CarveError::Input(e),
    })
}

/// Read up to `buf.len()` bytes, stopping early only at end of stream.
/// Returns the number of bytes actually read.
pub(crate) fn read_up_to<R: Read>(input: &mut R, buf: &mut [u8]) -> Result<usize, CarveError> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(CarveError::Input(e)),
        }
    }
    Ok(filled)
}

/// Buffered output file tracking the written length and a running BLAKE3
/// hash of everything written.
///
/// Creation failure and write failure both map to the fatal error variants:
/// an output-side environment problem will recur for every candidate.
pub(crate) struct Output {
    writer: BufWriter<File>,
    hasher: blake3::Hasher,
    written: u64,
    path: PathBuf,
}

impl Output {
    pub(crate) fn create(path: PathBuf) -> Result<Self, CarveError> {
        // Overwrites any existing file of the same name without warning.
        let file = File::create(&path).map_err(|source| CarveError::CreateOutput {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            writer: BufWriter::new(file),
            hasher: blake3::Hasher::new(),
            written: 0,
            path,
        })
    }

    pub(crate) fn write(&mut self, bytes: &[u8]) -> Result<(), CarveError> {
        self.writer
            .write_all(bytes)
            .map_err(|source| CarveError::WriteOutput {
                path: self.path.clone(),
                source,
            })?;
        self.hasher.update(bytes);
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Flush and close, returning the path, byte count and content hash.
    pub(crate) fn finish(mut self) -> Result<(PathBuf, u64, String), CarveError> {
        self.writer
            .flush()
            .map_err(|source| CarveError::WriteOutput {
                path: self.path.clone(),
                source,
            })?;
        let hash = self.hasher.finalize().to_hex().to_string();
        Ok((self.path, self.written, hash))
    }
}

/// Materialize `size` bytes from the current stream position into `path`,
/// copying in [`COPY_BUFFER_LEN`] chunks.
///
/// End of stream mid-copy is not an error: a partial dump of a truncated
/// image is still useful to the user. Returns the path, the byte count
/// actually written, and the content hash.
pub(crate) fn dump_stream<R: Read>(
    input: &mut R,
    path: PathBuf,
    size: u64,
) -> Result<(PathBuf, u64, String), CarveError> {
    let mut output = Output::create(path)?;
    let mut buf = vec![0u8; COPY_BUFFER_LEN];
    let mut remaining = size;

    while remaining > 0 {
        let want = remaining.min(COPY_BUFFER_LEN as u64) as usize;
        let got = read_up_to(input, &mut buf[..want])?;
        if got == 0 {
            tracing::debug!(remaining, "end of stream before full dump, keeping partial copy");
            break;
        }
        output.write(&buf[..got])?;
        remaining -= got as u64;
    }

    output.finish()
}
