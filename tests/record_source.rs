#[path = "common/mod.rs"]
mod common;

use common::*;
use serde_json::json;
use std::fs;
use subcsv::{ArchiveFormat, RecordSource};

fn ids(src: &mut RecordSource) -> Vec<String> {
    src.by_ref().map(|m| m["id"].as_str().unwrap().to_string()).collect()
}

fn id_lines(range: std::ops::Range<usize>) -> Vec<String> {
    range.map(|i| json!({"id": format!("r{i}"), "subreddit": "AIDungeon", "pad": "x".repeat(64)}).to_string()).collect()
}

/// zstd, gzip and plain NDJSON all decode to the same records.
#[test]
fn decodes_each_supported_format() {
    let dir = tempfile::tempdir().unwrap();
    let lines = id_lines(0..5);
    let zst = dir.path().join("RC_2023-01.zst");
    let gz = dir.path().join("RC_2023-02.gz");
    let plain = dir.path().join("RC_2023-03.jsonl");
    write_zst_lines(&zst, &lines);
    write_gz_lines(&gz, &lines);
    write_plain_lines(&plain, &lines);

    for (path, format) in [(&zst, ArchiveFormat::Zstd), (&gz, ArchiveFormat::Gzip), (&plain, ArchiveFormat::Plain)] {
        let mut src = RecordSource::open(path, 64 * 1024).unwrap().expect("recognized format");
        assert_eq!(src.format(), format);
        assert_eq!(ids(&mut src), ["r0", "r1", "r2", "r3", "r4"]);
        assert!(!src.truncated());
        assert_eq!(src.malformed_lines(), 0);
    }
}

/// Magic bytes win over a misleading extension.
#[test]
fn detects_by_signature_first() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("RC_2023-01.jsonl");
    write_zst_lines(&path, &id_lines(0..2));
    let mut src = RecordSource::open(&path, 64 * 1024).unwrap().unwrap();
    assert_eq!(src.format(), ArchiveFormat::Zstd);
    assert_eq!(ids(&mut src).len(), 2);

    assert_eq!(ArchiveFormat::detect(std::path::Path::new("x.ZST"), b"{\"a\""), Some(ArchiveFormat::Zstd));
    assert_eq!(ArchiveFormat::detect(std::path::Path::new("x.ndjson"), b"{\"a\""), Some(ArchiveFormat::Plain));
    assert_eq!(ArchiveFormat::detect(std::path::Path::new("x.bin"), b"{\"a\""), None);
}

/// Unknown formats are reported as `None`, not as an error.
#[test]
fn unknown_format_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    fs::write(&path, "hello\n").unwrap();
    assert!(RecordSource::open(&path, 64 * 1024).unwrap().is_none());
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(RecordSource::open(&dir.path().join("RC_2023-01.zst"), 64 * 1024).is_err());
}

/// A cut-off archive yields the records before the damage, then ends with `truncated()` set.
#[test]
fn truncated_archive_yields_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("RC_2023-01.zst");
    let complete = id_lines(0..20);
    let cut = id_lines(20..2000);
    let second_len = zst_frame(&cut).len();
    write_truncated_zst(&path, &complete, &cut, second_len / 2);

    let mut src = RecordSource::open(&path, 64 * 1024).unwrap().unwrap();
    let got = ids(&mut src);
    assert!(src.truncated(), "decode error must be reported");
    assert!(got.len() >= 20 && got.len() < 2000, "got {} records", got.len());
    let expected: Vec<String> = (0..got.len()).map(|i| format!("r{i}")).collect();
    assert_eq!(got, expected, "records must be an in-order prefix");
    // Exhausted for good.
    assert!(src.next_record().is_none());
}

/// Malformed and non-object lines are skipped and counted; blank lines are ignored.
#[test]
fn malformed_lines_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("RC_2023-01.zst");
    let lines = vec![
        json!({"id": "a"}).to_string(),
        "{\"id\": \"broken\"".to_string(),
        String::new(),
        "[1,2,3]".to_string(),
        json!({"id": "b"}).to_string(),
    ];
    write_zst_lines(&path, &lines);

    let mut src = RecordSource::open(&path, 64 * 1024).unwrap().unwrap();
    assert_eq!(ids(&mut src), ["a", "b"]);
    assert_eq!(src.malformed_lines(), 2);
    assert_eq!(src.lines_read(), 5);
    assert!(!src.truncated());
}

/// Rewinding starts over from the first record with fresh counters.
#[test]
fn rewind_restarts_stream() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("RS_2023-01.zst");
    write_zst_lines(&path, &id_lines(0..3));

    let mut src = RecordSource::open(&path, 64 * 1024).unwrap().unwrap();
    assert_eq!(ids(&mut src).len(), 3);
    src.rewind().unwrap();
    assert_eq!(src.lines_read(), 0);
    assert_eq!(src.bytes_consumed(), 0);
    assert_eq!(ids(&mut src), ["r0", "r1", "r2"]);
}

/// Consumed compressed bytes grow monotonically and reach the file size.
#[test]
fn reports_byte_progress() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("RC_2023-01.zst");
    write_zst_lines(&path, &id_lines(0..500));
    let size = fs::metadata(&path).unwrap().len();

    let mut src = RecordSource::open(&path, 8 * 1024).unwrap().unwrap();
    assert_eq!(src.total_bytes(), size);
    let mut last = 0;
    while src.next_record().is_some() {
        let now = src.bytes_consumed();
        assert!(now >= last);
        assert!(now <= size);
        last = now;
    }
    assert_eq!(src.bytes_consumed(), size);
}
