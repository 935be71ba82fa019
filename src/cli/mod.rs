//! CLI module - command line interface definitions

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::carve::{CarveOptions, DEFAULT_MAX_SCAN_BYTES};

/// Longest accepted filename prefix.
pub const MAX_PREFIX_LEN: usize = 256;

/// camcarve - carve JPEG and CR2/TIFF photos out of raw disk images
///
/// Scans any byte stream (dd image, memory card device, damaged archive)
/// for JPEG and TIFF signatures and copies every structurally intact file
/// it finds into the output directory. The source is only ever read.
#[derive(Parser, Debug)]
#[command(name = "camcarve")]
#[command(version)]
#[command(about = "Carve JPEG and CR2/TIFF photos out of raw disk images", long_about = None)]
pub struct Cli {
    /// Source to scan - disk image, block device, or any file
    #[arg(required = true)]
    pub source: PathBuf,

    /// Directory recovered files are written into
    #[arg(long, short, default_value = ".")]
    pub output_dir: PathBuf,

    /// Filename prefix for recovered files (recovered00042.jpg); may
    /// contain path separators to target a subdirectory of the output
    /// directory
    #[arg(long, short, default_value = "recovered")]
    pub prefix: String,

    /// Accept JPEG candidates whose first marker is not APP0/APP1
    /// (finds more thumbnails and headerless files, at the cost of more
    /// false positives)
    #[arg(long)]
    pub any_first_marker: bool,

    /// Abort a JPEG whose entropy-coded scan data exceeds this many bytes
    /// without an EOI marker
    #[arg(long, default_value_t = DEFAULT_MAX_SCAN_BYTES)]
    pub max_scan_size: u64,

    /// Verbose output
    #[arg(long, short)]
    pub verbose: bool,

    /// Output format for the final report
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub output: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

impl Cli {
    /// Translate the CLI flags into engine options.
    pub fn carve_options(&self) -> CarveOptions {
        CarveOptions {
            output_dir: self.output_dir.clone(),
            prefix: self.prefix.clone(),
            require_app_marker: !self.any_first_marker,
            max_scan_bytes: self.max_scan_size,
        }
    }
}
