//! TIFF/CR2 directory walker.
//!
//! A CR2 raw file is structurally a TIFF: a 2-byte byte-order mark (`II` or
//! `MM`), the magic value 42, then a chain of image file directories (IFDs)
//! whose offsets are all relative to the start of the TIFF, not to the
//! underlying stream. The walker never copies anything while parsing: it
//! first resolves the file's total byte extent from the directory entries
//! and the strip offset/length tags, then seeks back and materializes that
//! many bytes in one sized dump.

use std::io::{Read, Seek, SeekFrom};

use super::stream::{dump_stream, read_u16, read_u32, Endian};
use super::{CarveError, CarveOptions, RecoveredFile, RecoveredKind};

/// Magic value following the byte-order mark.
const TIFF_MAGIC: u16 = 42;
/// StripOffsets tag.
const STRIP_OFFSETS: u16 = 273;
/// StripByteCounts tag.
const STRIP_BYTE_COUNTS: u16 = 279;
/// TIFF LONG type code.
const TYPE_LONG: u16 = 4;
/// Directories walked before the chain is declared corrupt. Real CR2 files
/// carry a handful of IFDs; a longer chain means cyclic next-IFD offsets.
const MAX_IFD_CHAIN: u32 = 64;

/// Try to recover one TIFF/CR2 file from the current stream position, which
/// must be just past the 2-byte byte-order mark.
///
/// Returns `Ok(None)` when the candidate is rejected; the caller is expected
/// to rewind the stream in that case, since the walk may have seeked far
/// from the signature.
pub(crate) fn carve_tiff<R: Read + Seek>(
    input: &mut R,
    index: u32,
    endian: Endian,
    options: &CarveOptions,
    offset: u64,
) -> Result<Option<RecoveredFile>, CarveError> {
    // Cheap rejection: almost every false positive on the 2-byte mark dies
    // on the magic value.
    let magic = match read_u16(input, endian) {
        Ok(magic) => magic,
        Err(CarveError::Truncated) => return Ok(None),
        Err(e) => return Err(e),
    };
    if magic != TIFF_MAGIC {
        return Ok(None);
    }
    tracing::debug!(index, ?endian, "TIFF header recognized, walking directories");

    // Mark and magic make 4 bytes; the dump must include them.
    let file_start = input
        .stream_position()
        .map_err(CarveError::Input)?
        .saturating_sub(4);

    let extent = match resolve_extent(input, endian, file_start) {
        Ok(Some(extent)) => extent,
        Ok(None) => return Ok(None),
        Err(CarveError::Truncated) => {
            tracing::warn!(index, "input ended inside TIFF structure, rejecting candidate");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    let path = options.output_path(index, "cr2");
    tracing::debug!(index, extent, path = %path.display(), "TIFF structure consistent, dumping");

    input
        .seek(SeekFrom::Start(file_start))
        .map_err(CarveError::Input)?;
    let (path, size, hash) = dump_stream(input, path, extent)?;
    tracing::info!(path = %path.display(), size, "saved successfully");

    Ok(Some(RecoveredFile {
        path,
        kind: RecoveredKind::Cr2,
        offset,
        size,
        hash,
    }))
}

/// Strip metadata gathered across the whole IFD chain. Later directories
/// overwrite the offset/length values of earlier ones.
struct StripMeta {
    offsets: Option<u32>,
    lengths: Option<u32>,
    count: u32,
}

impl StripMeta {
    /// StripOffsets and StripByteCounts should agree on their element
    /// count. On mismatch the smaller count wins and extraction continues;
    /// the recovered file may come out slightly short.
    fn reconcile_count(&mut self, count: u32) {
        if self.count != 0 && self.count != count {
            tracing::warn!(
                seen = self.count,
                new = count,
                "strip offset/length counts disagree, taking the smaller"
            );
            self.count = self.count.min(count);
        } else {
            self.count = count;
        }
    }
}

/// Walk the IFD chain and compute the file's total byte extent: the maximum
/// of every entry's data-block end and the end of the strip with the
/// highest offset. `Ok(None)` rejects the candidate.
fn resolve_extent<R: Read + Seek>(
    input: &mut R,
    endian: Endian,
    file_start: u64,
) -> Result<Option<u64>, CarveError> {
    let mut extent: u64 = 0;
    let mut strips = StripMeta {
        offsets: None,
        lengths: None,
        count: 0,
    };
    let mut directories = 0u32;

    loop {
        // The four bytes at the cursor are the next-IFD offset: right after
        // the magic for the first directory, right after the entry table for
        // every later one. Zero terminates the chain.
        let ifd = read_u32(input, endian)?;
        if ifd == 0 {
            break;
        }
        directories += 1;
        if directories > MAX_IFD_CHAIN {
            tracing::warn!(directories, "IFD chain does not terminate, rejecting candidate");
            return Ok(None);
        }

        input
            .seek(SeekFrom::Start(file_start + u64::from(ifd)))
            .map_err(CarveError::Input)?;
        let entry_count = read_u16(input, endian)?;
        tracing::debug!(ifd, entry_count, "image file directory");

        for _ in 0..entry_count {
            let tag = read_u16(input, endian)?;
            let type_code = read_u16(input, endian)?;
            let count = read_u32(input, endian)?;
            let value = read_u32(input, endian)?;

            // An entry's data block may form the last bytes of the file.
            let block_end =
                u64::from(value) + u64::from(count) * u64::from(element_size(type_code));
            extent = extent.max(block_end);

            if tag == STRIP_OFFSETS || tag == STRIP_BYTE_COUNTS {
                if type_code != TYPE_LONG {
                    tracing::warn!(
                        tag,
                        type_code,
                        "strip tag is not of LONG type, rejecting candidate"
                    );
                    return Ok(None);
                }
                if tag == STRIP_OFFSETS {
                    strips.offsets = Some(value);
                } else {
                    strips.lengths = Some(value);
                }
                strips.reconcile_count(count);
            }
        }
    }

    let (Some(strip_offsets), Some(strip_lengths)) = (strips.offsets, strips.lengths) else {
        tracing::warn!("no strip offsets/lengths in any directory, cannot size file, rejecting candidate");
        return Ok(None);
    };
    if strips.count == 0 {
        tracing::warn!("strip count is zero, cannot size file, rejecting candidate");
        return Ok(None);
    }

    // The end of the strip with the highest offset usually ends the file.
    let last_strip_end = if strips.count == 1 {
        // A single strip stores literal values instead of array pointers.
        u64::from(strip_offsets) + u64::from(strip_lengths)
    } else {
        // Both fields point at arrays of LONGs. Find the strip with the
        // highest offset, then read the matching length.
        input
            .seek(SeekFrom::Start(file_start + u64::from(strip_offsets)))
            .map_err(CarveError::Input)?;
        let mut highest: u32 = 0;
        let mut highest_index: u64 = 0;
        for i in 0..strips.count {
            let strip = read_u32(input, endian)?;
            if strip > highest {
                highest = strip;
                highest_index = u64::from(i);
            }
        }
        input
            .seek(SeekFrom::Start(
                file_start + u64::from(strip_lengths) + 4 * highest_index,
            ))
            .map_err(CarveError::Input)?;
        u64::from(highest) + u64::from(read_u32(input, endian)?)
    };
    tracing::debug!(last_strip_end, "strip data end computed");

    Ok(Some(extent.max(last_strip_end)))
}

/// Per-element byte size of a TIFF entry type. Unknown types warn and size
/// to zero, so the entry cannot extend the file.
fn element_size(type_code: u16) -> u32 {
    match type_code {
        1 | 2 => 1, // BYTE, ASCII
        3 => 2,     // SHORT
        4 => 4,     // LONG
        5 => 8,     // RATIONAL, two LONGs
        _ => {
            tracing::warn!(type_code, "unrecognized TIFF entry type, assuming zero size");
            0
        }
    }
}
