//! Photo carving engine - recover JPEG and CR2/TIFF files from raw byte
//! streams by signature scanning and structural parsing.
//!
//! The engine has no filesystem knowledge: the input is treated purely as a
//! sequence of bytes (a dd image, a memory card device, a damaged archive)
//! and candidate files are located by magic signatures alone, then parsed
//! just deep enough to learn their true byte extent and copy them out.
//!
//! # Design
//!
//! - **Sliding window**: the scanner reads one byte at a time and keeps the
//!   last two as a big-endian window; `FFD8` dispatches the JPEG walker,
//!   `4949`/`4D4D` the TIFF walker
//! - **Shared cursor**: extractors consume the stream cursor; after a
//!   success the scanner continues wherever the extractor stopped, after a
//!   failed TIFF candidate it rewinds to just past the byte-order mark so a
//!   JPEG thumbnail inside the rejected region is still found
//! - **Index threading**: the recovery index equals the number of files
//!   recovered so far and is never decremented; a failed attempt does not
//!   consume an index, so its partial output (if any) is overwritten by the
//!   next success
//! - **Two-tier errors**: malformed candidates, cap overruns and truncated
//!   input recover locally; only output-file environment failures abort the
//!   scan

mod jpeg;
mod stream;
mod tiff;

use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stream::{read_byte, Endian};

/// JPEG Start-Of-Image marker as a scanner window value.
pub const JPEG_SOI: u16 = 0xFFD8;
/// Little-endian TIFF byte-order mark, `II`.
pub const TIFF_LE_MARK: u16 = 0x4949;
/// Big-endian TIFF byte-order mark, `MM`.
pub const TIFF_BE_MARK: u16 = 0x4D4D;

/// Default cap on a JPEG's entropy-coded scan data, in bytes.
pub const DEFAULT_MAX_SCAN_BYTES: u64 = 8 * 1024 * 1024;

/// Errors surfaced by the carving engine.
///
/// Only environment failures escape [`Carver::scan`]: malformed candidates,
/// the scan-data cap, and truncated input are all handled locally by the
/// extractors as "no file recovered". `Truncated` exists so structural walks
/// can abort with `?`; it never crosses the scanner boundary.
#[derive(Debug, Error)]
pub enum CarveError {
    /// The input stream ended in the middle of a structure.
    #[error("input stream ended mid-structure")]
    Truncated,

    /// Reading the input stream failed with a real I/O error (not EOF).
    #[error("failed to read input stream")]
    Input(#[source] std::io::Error),

    /// An output file could not be created. The condition (permissions,
    /// full disk) will recur for every later candidate, so this is fatal.
    #[error("failed to create output file {}", path.display())]
    CreateOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing an already-created output file failed. Fatal, as above.
    #[error("failed to write output file {}", path.display())]
    WriteOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Options for a carve scan.
#[derive(Debug, Clone)]
pub struct CarveOptions {
    /// Directory recovered files are written into.
    pub output_dir: PathBuf,
    /// Filename prefix; recoveries are named `<prefix><index>.{jpg,cr2}`
    /// with the index zero-padded to five digits. May contain path
    /// separators to target a subdirectory of `output_dir`.
    pub prefix: String,
    /// Require the first marker after SOI to be APP0 or APP1. Cuts false
    /// positives on raw sensor dumps at the cost of a few headerless files.
    pub require_app_marker: bool,
    /// Abort a JPEG candidate whose entropy-coded scan data exceeds this
    /// many bytes without an EOI marker.
    pub max_scan_bytes: u64,
}

impl Default for CarveOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            prefix: "recovered".to_string(),
            require_app_marker: true,
            max_scan_bytes: DEFAULT_MAX_SCAN_BYTES,
        }
    }
}

impl CarveOptions {
    fn output_path(&self, index: u32, extension: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}{:05}.{}", self.prefix, index, extension))
    }
}

/// Format of a recovered file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveredKind {
    Jpeg,
    Cr2,
}

/// One successfully recovered file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveredFile {
    /// Where the file was written.
    pub path: PathBuf,
    pub kind: RecoveredKind,
    /// Byte offset in the source stream where the signature was found.
    pub offset: u64,
    /// Bytes written.
    pub size: u64,
    /// BLAKE3 hash of the written bytes.
    pub hash: String,
}

/// Result of a carve scan. Best-effort partial files kept after a truncated
/// candidate are visible on disk and in the trace, but never listed here:
/// their index was not consumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub files: Vec<RecoveredFile>,
    pub jpeg_recovered: usize,
    pub cr2_recovered: usize,
    /// Candidate signatures that did not survive structural parsing.
    pub candidates_rejected: usize,
    pub bytes_scanned: u64,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

/// The carving engine. Owns the scan options; one instance can scan any
/// number of streams.
pub struct Carver {
    options: CarveOptions,
}

impl Carver {
    pub fn new(options: CarveOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CarveOptions {
        &self.options
    }

    /// Scan the stream from its current position to the end, carving every
    /// recognizable JPEG and CR2/TIFF into the output directory.
    pub fn scan<R: Read + Seek>(&self, input: &mut R) -> Result<ScanReport, CarveError> {
        let start = Instant::now();
        tracing::info!(
            output_dir = %self.options.output_dir.display(),
            prefix = %self.options.prefix,
            require_app_marker = self.options.require_app_marker,
            max_scan_bytes = self.options.max_scan_bytes,
            "Starting carve scan"
        );

        let mut files: Vec<RecoveredFile> = Vec::new();
        let mut rejected = 0usize;
        let mut window: u16 = 0;

        loop {
            let Some(byte) = read_byte(input)? else {
                break;
            };
            window = (window << 8) | u16::from(byte);

            match window {
                JPEG_SOI => {
                    let index = files.len() as u32;
                    let sig_offset = position(input)?.saturating_sub(2);
                    tracing::debug!(offset = sig_offset, "JPEG SOI signature");
                    match jpeg::carve_jpeg(input, index, &self.options, sig_offset)? {
                        Some(file) => files.push(file),
                        None => rejected += 1,
                    }
                }
                TIFF_LE_MARK | TIFF_BE_MARK => {
                    let endian = if window == TIFF_LE_MARK {
                        Endian::Little
                    } else {
                        Endian::Big
                    };
                    let index = files.len() as u32;
                    let resume = position(input)?;
                    let sig_offset = resume.saturating_sub(2);
                    tracing::debug!(offset = sig_offset, ?endian, "TIFF byte-order signature");
                    match tiff::carve_tiff(input, index, endian, &self.options, sig_offset)? {
                        Some(file) => files.push(file),
                        None => {
                            rejected += 1;
                            // A rejected TIFF candidate may still hold a
                            // JPEG thumbnail past the byte-order mark;
                            // resume right after the mark so it is not
                            // skipped.
                            input
                                .seek(SeekFrom::Start(resume))
                                .map_err(CarveError::Input)?;
                        }
                    }
                }
                _ => {}
            }
        }

        let bytes_scanned = position(input)?;
        let report = ScanReport {
            jpeg_recovered: files
                .iter()
                .filter(|f| f.kind == RecoveredKind::Jpeg)
                .count(),
            cr2_recovered: files
                .iter()
                .filter(|f| f.kind == RecoveredKind::Cr2)
                .count(),
            candidates_rejected: rejected,
            bytes_scanned,
            duration_ms: start.elapsed().as_millis() as u64,
            completed_at: Utc::now(),
            files,
        };
        tracing::info!(
            jpeg_recovered = report.jpeg_recovered,
            cr2_recovered = report.cr2_recovered,
            candidates_rejected = report.candidates_rejected,
            bytes_scanned = report.bytes_scanned,
            duration_ms = report.duration_ms,
            "Carve scan complete"
        );
        Ok(report)
    }
}

fn position<R: Seek>(input: &mut R) -> Result<u64, CarveError> {
    input.stream_position().map_err(CarveError::Input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::Path;
    use tempfile::tempdir;

    fn carver(dir: &Path) -> Carver {
        Carver::new(CarveOptions {
            output_dir: dir.to_path_buf(),
            ..Default::default()
        })
    }

    fn minimal_jpeg() -> Vec<u8> {
        vec![
            0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, 0xAB, 0xCD, 0xFF, 0xDA, 0x00, 0x02, 0x12, 0x34,
            0xFF, 0xD9,
        ]
    }

    /// Little-endian single-strip TIFF, 96 bytes total extent.
    fn minimal_tiff() -> Vec<u8> {
        let mut d = Vec::new();
        d.extend_from_slice(b"II");
        d.extend_from_slice(&42u16.to_le_bytes());
        d.extend_from_slice(&8u32.to_le_bytes());
        d.extend_from_slice(&2u16.to_le_bytes());
        for &(tag, ty, count, value) in &[(273u16, 4u16, 1u32, 64u32), (279, 4, 1, 32)] {
            d.extend_from_slice(&tag.to_le_bytes());
            d.extend_from_slice(&ty.to_le_bytes());
            d.extend_from_slice(&count.to_le_bytes());
            d.extend_from_slice(&value.to_le_bytes());
        }
        d.extend_from_slice(&0u32.to_le_bytes());
        d.resize(96, 0xEE);
        d
    }

    #[test]
    fn empty_input_reports_nothing() {
        let dir = tempdir().unwrap();
        let report = carver(dir.path()).scan(&mut Cursor::new(Vec::new())).unwrap();
        assert!(report.files.is_empty());
        assert_eq!(report.bytes_scanned, 0);
        assert_eq!(report.candidates_rejected, 0);
    }

    #[test]
    fn recovers_jpeg_and_tiff_in_encounter_order() {
        let dir = tempdir().unwrap();
        let mut image = vec![0x00; 32];
        image.extend_from_slice(&minimal_jpeg());
        image.extend(vec![0x00; 17]);
        image.extend_from_slice(&minimal_tiff());
        image.extend(vec![0x00; 32]);

        let report = carver(dir.path()).scan(&mut Cursor::new(image)).unwrap();

        assert_eq!(report.files.len(), 2);
        assert_eq!(report.jpeg_recovered, 1);
        assert_eq!(report.cr2_recovered, 1);
        assert_eq!(report.files[0].path, dir.path().join("recovered00000.jpg"));
        assert_eq!(report.files[1].path, dir.path().join("recovered00001.cr2"));
        assert_eq!(report.files[0].offset, 32);
        assert_eq!(
            std::fs::read(&report.files[0].path).unwrap(),
            minimal_jpeg()
        );
        assert_eq!(
            std::fs::read(&report.files[1].path).unwrap(),
            minimal_tiff()
        );
    }

    #[test]
    fn failed_candidate_does_not_consume_an_index() {
        let dir = tempdir().unwrap();
        // An SOI pair followed by a non-APP marker, then a real JPEG.
        let mut image = vec![0xFF, 0xD8, 0xFF, 0xC4, 0x00, 0x04, 0x00, 0x00];
        image.extend(vec![0x00; 8]);
        image.extend_from_slice(&minimal_jpeg());

        let report = carver(dir.path()).scan(&mut Cursor::new(image)).unwrap();

        assert_eq!(report.files.len(), 1);
        assert!(report.candidates_rejected >= 1);
        assert_eq!(report.files[0].path, dir.path().join("recovered00000.jpg"));
    }

    #[test]
    fn next_success_overwrites_abandoned_partial() {
        let dir = tempdir().unwrap();
        // First candidate writes a partial file, then dies on a bad marker
        // intro. The second candidate reuses index 0 and overwrites it.
        let mut image = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, 0xAB, 0xCD, 0x00];
        image.extend(vec![0x00; 8]);
        image.extend_from_slice(&minimal_jpeg());

        let report = carver(dir.path()).scan(&mut Cursor::new(image)).unwrap();

        assert_eq!(report.files.len(), 1);
        assert_eq!(
            std::fs::read(dir.path().join("recovered00000.jpg")).unwrap(),
            minimal_jpeg()
        );
    }

    #[test]
    fn rejected_tiff_candidate_rewinds_to_find_embedded_jpeg() {
        let dir = tempdir().unwrap();
        // "II" with a wrong magic value: the TIFF walker rejects it, and the
        // scanner must rewind so the JPEG right behind the mark is found.
        let mut image = b"II".to_vec();
        image.extend_from_slice(&[0x00, 0x00]);
        image.extend_from_slice(&minimal_jpeg());

        let report = carver(dir.path()).scan(&mut Cursor::new(image)).unwrap();

        assert_eq!(report.jpeg_recovered, 1);
        assert_eq!(
            std::fs::read(&report.files[0].path).unwrap(),
            minimal_jpeg()
        );
    }

    #[test]
    fn successful_tiff_leaves_cursor_past_the_dump() {
        let dir = tempdir().unwrap();
        // A JPEG placed directly after the TIFF extent must also be found.
        let mut image = minimal_tiff();
        image.extend_from_slice(&minimal_jpeg());

        let report = carver(dir.path()).scan(&mut Cursor::new(image)).unwrap();
        assert_eq!(report.cr2_recovered, 1);
        assert_eq!(report.jpeg_recovered, 1);
    }
}
