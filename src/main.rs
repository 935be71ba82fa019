//! camcarve - carve JPEG and CR2/TIFF photos out of raw disk images.
//!
//! Opens the source read-only, hands a buffered stream to the carving
//! engine, and reports what came out. Everything format-aware lives in the
//! library; this binary is argument parsing, logging setup and presentation.

use std::fs::File;
use std::io::BufReader;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use humansize::{format_size, BINARY};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use camcarve::cli::{Cli, OutputFormat, MAX_PREFIX_LEN};
use camcarve::{Carver, ScanReport};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_directive = if cli.verbose {
        "camcarve=debug"
    } else {
        "camcarve=info"
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(EnvFilter::from_default_env().add_directive(default_directive.parse()?))
        .init();

    anyhow::ensure!(
        cli.prefix.len() <= MAX_PREFIX_LEN,
        "prefix is longer than {MAX_PREFIX_LEN} characters"
    );

    std::fs::create_dir_all(&cli.output_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            cli.output_dir.display()
        )
    })?;

    // The source is evidence: opened read-only, never written.
    let file = File::open(&cli.source)
        .with_context(|| format!("Failed to open source image {}", cli.source.display()))?;
    let mut input = BufReader::new(file);

    let carver = Carver::new(cli.carve_options());
    let report = carver
        .scan(&mut input)
        .with_context(|| format!("Carve scan of {} failed", cli.source.display()))?;

    match cli.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Human => print_summary(&report),
    }

    Ok(())
}

fn print_summary(report: &ScanReport) {
    println!();
    println!("{}", style("Recovery complete").bold());
    println!(
        "  {} JPEG, {} CR2 recovered ({} scanned in {:.1}s)",
        style(report.jpeg_recovered).green(),
        style(report.cr2_recovered).green(),
        format_size(report.bytes_scanned, BINARY),
        report.duration_ms as f64 / 1000.0,
    );
    if report.candidates_rejected > 0 {
        println!(
            "  {} candidate signatures rejected",
            style(report.candidates_rejected).dim()
        );
    }
    for file in &report.files {
        println!(
            "  {}  {:>10}  {}",
            style(file.path.display()).cyan(),
            format_size(file.size, BINARY),
            style(&file.hash[..16]).dim(),
        );
    }
}
