//! End-to-end carving tests over synthetic card images.

use std::io::Cursor;
use std::path::Path;

use proptest::prelude::*;
use tempfile::tempdir;

use camcarve::{CarveOptions, Carver, ScanReport};

/// A complete JPEG with an Exif APP1 segment, a quantization table, and
/// stuffed 0xFF00 bytes in the scan data.
fn sample_jpeg(seed: u8) -> Vec<u8> {
    let mut d = vec![0xFF, 0xD8];
    d.extend_from_slice(&[0xFF, 0xE1, 0x00, 0x08, b'E', b'x', b'i', b'f', 0x00, 0x00]);
    d.extend_from_slice(&[0xFF, 0xDB, 0x00, 0x06, seed, seed, seed, seed]);
    d.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x03, 0x01]);
    d.extend_from_slice(&[0x10, 0xFF, 0x00, 0x20, seed, 0x30]);
    d.extend_from_slice(&[0xFF, 0xD9]);
    d
}

/// A little-endian CR2-style TIFF with three strips. Total extent 360: the
/// highest strip starts at 300 and runs 60 bytes.
fn sample_cr2() -> Vec<u8> {
    let offsets_at = 40usize;
    let lengths_at = 60usize;

    let mut d = Vec::new();
    d.extend_from_slice(b"II");
    d.extend_from_slice(&42u16.to_le_bytes());
    d.extend_from_slice(&8u32.to_le_bytes());
    d.extend_from_slice(&2u16.to_le_bytes());
    for &(tag, ty, count, value) in &[
        (273u16, 4u16, 3u32, offsets_at as u32),
        (279, 4, 3, lengths_at as u32),
    ] {
        d.extend_from_slice(&tag.to_le_bytes());
        d.extend_from_slice(&ty.to_le_bytes());
        d.extend_from_slice(&count.to_le_bytes());
        d.extend_from_slice(&value.to_le_bytes());
    }
    d.extend_from_slice(&0u32.to_le_bytes());
    d.resize(360, 0x33);

    for (i, v) in [100u32, 300, 200].into_iter().enumerate() {
        d[offsets_at + 4 * i..offsets_at + 4 * i + 4].copy_from_slice(&v.to_le_bytes());
    }
    for (i, v) in [40u32, 60, 50].into_iter().enumerate() {
        d[lengths_at + 4 * i..lengths_at + 4 * i + 4].copy_from_slice(&v.to_le_bytes());
    }
    d
}

/// Two JPEGs and a CR2 separated by signature-free filler.
fn card_image() -> Vec<u8> {
    let mut image = vec![0x00; 64];
    image.extend_from_slice(&sample_jpeg(0x41));
    image.extend(vec![0x11; 33]);
    image.extend_from_slice(&sample_cr2());
    image.extend(vec![0x00; 21]);
    image.extend_from_slice(&sample_jpeg(0x42));
    image.extend(vec![0x11; 64]);
    image
}

fn scan_into(dir: &Path, image: &[u8]) -> ScanReport {
    let carver = Carver::new(CarveOptions {
        output_dir: dir.to_path_buf(),
        ..Default::default()
    });
    carver.scan(&mut Cursor::new(image.to_vec())).unwrap()
}

#[test]
fn carves_full_card_image() {
    let dir = tempdir().unwrap();
    let report = scan_into(dir.path(), &card_image());

    assert_eq!(report.files.len(), 3);
    assert_eq!(report.jpeg_recovered, 2);
    assert_eq!(report.cr2_recovered, 1);

    // Index assignment follows encounter order.
    assert_eq!(report.files[0].path, dir.path().join("recovered00000.jpg"));
    assert_eq!(report.files[1].path, dir.path().join("recovered00001.cr2"));
    assert_eq!(report.files[2].path, dir.path().join("recovered00002.jpg"));

    // JPEG recoveries are byte-identical to what was embedded.
    assert_eq!(
        std::fs::read(&report.files[0].path).unwrap(),
        sample_jpeg(0x41)
    );
    assert_eq!(
        std::fs::read(&report.files[2].path).unwrap(),
        sample_jpeg(0x42)
    );

    // The CR2 is the embedded TIFF region up to its computed extent.
    assert_eq!(
        std::fs::read(&report.files[1].path).unwrap(),
        sample_cr2()
    );
}

#[test]
fn scanning_is_idempotent() {
    let image = card_image();
    let first = tempdir().unwrap();
    let second = tempdir().unwrap();

    let report_a = scan_into(first.path(), &image);
    let report_b = scan_into(second.path(), &image);

    assert_eq!(report_a.files.len(), report_b.files.len());
    for (a, b) in report_a.files.iter().zip(&report_b.files) {
        assert_eq!(a.path.file_name(), b.path.file_name());
        assert_eq!(a.hash, b.hash);
        assert_eq!(
            std::fs::read(&a.path).unwrap(),
            std::fs::read(&b.path).unwrap()
        );
    }
}

#[test]
fn prefix_may_target_a_subdirectory() {
    let dir = tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("nested")).unwrap();

    let carver = Carver::new(CarveOptions {
        output_dir: dir.path().to_path_buf(),
        prefix: "nested/run-".to_string(),
        ..Default::default()
    });
    let report = carver
        .scan(&mut Cursor::new(sample_jpeg(0x41)))
        .unwrap();

    assert_eq!(report.files.len(), 1);
    assert_eq!(
        report.files[0].path,
        dir.path().join("nested").join("run-00000.jpg")
    );
    assert!(report.files[0].path.exists());
}

#[test]
fn report_round_trips_through_json() {
    let dir = tempdir().unwrap();
    let report = scan_into(dir.path(), &card_image());

    let json = serde_json::to_string_pretty(&report).unwrap();
    let parsed: ScanReport = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed.files.len(), report.files.len());
    assert_eq!(parsed.jpeg_recovered, report.jpeg_recovered);
    assert_eq!(parsed.cr2_recovered, report.cr2_recovered);
    assert_eq!(parsed.files[0].hash, report.files[0].hash);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The scanner must survive arbitrary bytes: no panic, no fatal error,
    /// and the report stays consistent with itself.
    #[test]
    fn arbitrary_input_never_panics(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let dir = tempdir().unwrap();
        let carver = Carver::new(CarveOptions {
            output_dir: dir.path().to_path_buf(),
            ..Default::default()
        });

        let report = carver.scan(&mut Cursor::new(data)).unwrap();
        prop_assert_eq!(
            report.files.len(),
            report.jpeg_recovered + report.cr2_recovered
        );
    }
}
