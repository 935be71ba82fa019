//! camcarve library
//!
//! Carves intact JPEG and CR2/TIFF photos out of unstructured byte streams:
//! raw disk images, memory card dumps, any file with a damaged or missing
//! directory structure. No filesystem metadata is used - files are located
//! by their magic signatures and sized by structural parsing alone.
//!
//! # Features
//!
//! - **Streaming scan**: one sequential pass over the input, byte by byte;
//!   works on inputs far larger than memory
//! - **Structural sizing**: JPEG files are rebuilt segment by segment, TIFF
//!   files are sized from their IFD chain and strip metadata before a single
//!   output byte is written
//! - **Read-only safe**: the source is never modified
//! - **BLAKE3 hashes**: every recovered file is hashed as it is written
//!
//! # Example
//!
//! ```no_run
//! use camcarve::{CarveOptions, Carver};
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut input = BufReader::new(File::open("card.img")?);
//!     let report = Carver::new(CarveOptions::default()).scan(&mut input)?;
//!     println!("recovered {} files", report.files.len());
//!     Ok(())
//! }
//! ```

pub mod carve;
pub mod cli;

// Re-export commonly used types
pub use carve::{
    CarveError, CarveOptions, Carver, RecoveredFile, RecoveredKind, ScanReport,
    DEFAULT_MAX_SCAN_BYTES,
};
