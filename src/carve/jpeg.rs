//! JPEG segment extractor.
//!
//! Entered with the stream positioned just past a Start-Of-Image marker
//! (`FF D8`). Walks marker segments, copying each one verbatim into the
//! output file; on Start-Of-Scan it switches to raw copy mode and dumps the
//! entropy-coded data byte by byte until the End-Of-Image marker appears in
//! it, or a byte cap is hit.
//!
//! Failure is cheap here: an invalid marker, a hit cap, or a truncated
//! stream all abandon the candidate without consuming a recovery index. A
//! candidate that already produced output keeps its partial file on disk as
//! a best-effort recovery; the next successful candidate reuses the index
//! and overwrites it.

use std::io::Read;

use super::stream::{read_byte, read_up_to, Output};
use super::{CarveError, CarveOptions, RecoveredFile, RecoveredKind};

const MARKER_INTRO: u8 = 0xFF;
/// APP0 (JFIF) and APP1 (Exif) application markers.
const APP0: u8 = 0xE0;
const APP1: u8 = 0xE1;
/// Start-Of-Scan: entropy-coded data with no length prefix follows.
const SOS: u8 = 0xDA;
const SOI: [u8; 2] = [0xFF, 0xD8];
/// End-Of-Image as a 16-bit big-endian window over the scan data.
const EOI: u16 = 0xFFD9;

/// Try to recover one JPEG file from the current stream position.
///
/// Returns `Ok(Some(..))` when a complete file was saved, `Ok(None)` when
/// the candidate was rejected or truncated (the recovery index stays
/// unchanged). Only output-file environment failures surface as `Err`.
pub(crate) fn carve_jpeg<R: Read>(
    input: &mut R,
    index: u32,
    options: &CarveOptions,
    offset: u64,
) -> Result<Option<RecoveredFile>, CarveError> {
    // The first marker decides whether this candidate gets an output file
    // at all: a lone SOI pair in sensor data is far more common than a real
    // image, so nothing is written before the marker passes inspection.
    let Some(intro) = read_byte(input)? else {
        return Ok(None);
    };
    if intro != MARKER_INTRO {
        return Ok(None);
    }
    let Some(first_marker) = read_byte(input)? else {
        return Ok(None);
    };
    if options.require_app_marker && first_marker != APP0 && first_marker != APP1 {
        tracing::debug!(
            index,
            marker = %format!("{first_marker:02X}"),
            "first marker is not APP0/APP1, rejecting candidate"
        );
        return Ok(None);
    }

    let mut out = Output::create(options.output_path(index, "jpg"))?;
    out.write(&SOI)?;

    let mut marker = first_marker;
    loop {
        out.write(&[MARKER_INTRO, marker])?;

        // Segment length, big-endian, includes its own two bytes.
        let (Some(length_hi), Some(length_lo)) = (read_byte(input)?, read_byte(input)?) else {
            return keep_partial(out, index);
        };
        let length = u16::from_be_bytes([length_hi, length_lo]);
        if length < 2 {
            tracing::warn!(index, length, "segment length cannot cover its own field, abandoning candidate");
            out.finish()?;
            return Ok(None);
        }
        out.write(&[length_hi, length_lo])?;

        let mut body = vec![0u8; usize::from(length) - 2];
        let got = read_up_to(input, &mut body)?;
        out.write(&body[..got])?;
        if got < body.len() {
            return keep_partial(out, index);
        }
        tracing::debug!(
            index,
            marker = %format!("{marker:02X}"),
            length = u32::from(length) + 2,
            "segment"
        );

        if marker == SOS {
            return dump_scan_data(input, out, index, options, offset);
        }

        // Next marker, which must open with 0xFF.
        let Some(intro) = read_byte(input)? else {
            return keep_partial(out, index);
        };
        if intro != MARKER_INTRO {
            tracing::warn!(
                index,
                byte = %format!("{intro:02X}"),
                "invalid marker intro, abandoning candidate"
            );
            out.finish()?;
            return Ok(None);
        }
        let Some(next) = read_byte(input)? else {
            return keep_partial(out, index);
        };
        marker = next;
    }
}

/// Copy raw entropy-coded scan data until the EOI marker or the byte cap.
fn dump_scan_data<R: Read>(
    input: &mut R,
    mut out: Output,
    index: u32,
    options: &CarveOptions,
    offset: u64,
) -> Result<Option<RecoveredFile>, CarveError> {
    tracing::debug!(index, "entropy-coded scan data, dumping");

    // Last two bytes copied, as a big-endian window.
    let mut state: u16 = 0;
    let mut count: u64 = 0;

    while state != EOI {
        let Some(byte) = read_byte(input)? else {
            return keep_partial(out, index);
        };
        out.write(&[byte])?;
        state = (state << 8) | u16::from(byte);
        count += 1;

        if count > options.max_scan_bytes {
            tracing::warn!(
                index,
                cap = options.max_scan_bytes,
                "scan data exceeded cap without EOI, abandoning candidate"
            );
            out.finish()?;
            return Ok(None);
        }
    }
    tracing::debug!(index, bytes = count, "scan data complete");

    let (path, size, hash) = out.finish()?;
    tracing::info!(path = %path.display(), size, "saved successfully");
    Ok(Some(RecoveredFile {
        path,
        kind: RecoveredKind::Jpeg,
        offset,
        size,
        hash,
    }))
}

/// Truncated stream: close the output and keep whatever was written, but do
/// not consume the index.
fn keep_partial(out: Output, index: u32) -> Result<Option<RecoveredFile>, CarveError> {
    tracing::warn!(index, "premature end of stream, keeping partial output");
    out.finish()?;
    Ok(None)
}
