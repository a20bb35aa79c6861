#![allow(dead_code)]

use serde_json::json;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Write a compressed `.zst` file containing the provided JSONL lines.
/// This mirrors the corpus's RC_/RS_ monthly files but with tiny content.
pub fn write_zst_lines(path: &Path, lines: &[String]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, zst_frame(lines)).unwrap();
}

/// One complete zstd frame holding `lines`, newline-terminated.
pub fn zst_frame(lines: &[String]) -> Vec<u8> {
    let mut enc = zstd::stream::write::Encoder::new(Vec::new(), 3).unwrap();
    for l in lines {
        writeln!(&mut enc, "{}", l).unwrap();
    }
    enc.finish().unwrap()
}

/// Write a `.zst` file whose first frame is complete and whose second frame is
/// cut off after `keep_of_second` bytes, like a partially downloaded dump.
pub fn write_truncated_zst(path: &Path, complete: &[String], cut: &[String], keep_of_second: usize) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut bytes = zst_frame(complete);
    let second = zst_frame(cut);
    assert!(keep_of_second < second.len(), "cut must fall inside the second frame");
    bytes.extend_from_slice(&second[..keep_of_second]);
    fs::write(path, bytes).unwrap();
}

pub fn write_gz_lines(path: &Path, lines: &[String]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let f = File::create(path).unwrap();
    let mut enc = flate2::write::GzEncoder::new(f, flate2::Compression::default());
    for l in lines {
        writeln!(&mut enc, "{}", l).unwrap();
    }
    enc.finish().unwrap();
}

pub fn write_plain_lines(path: &Path, lines: &[String]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut f = File::create(path).unwrap();
    for l in lines {
        writeln!(&mut f, "{}", l).unwrap();
    }
}

/// Every physical CSV record of `path` (header lines included), ragged rows allowed.
pub fn read_csv_records(path: &Path) -> Vec<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(false).flexible(true).from_path(path).unwrap();
    rdr.records().map(|r| r.unwrap().iter().map(str::to_string).collect()).collect()
}

/// Read `path` as a single-header CSV into `column → cell` maps.
pub fn read_csv_maps(path: &Path) -> Vec<std::collections::BTreeMap<String, String>> {
    let recs = read_csv_records(path);
    let (header, rows) = recs.split_first().expect("csv has a header");
    rows.iter()
        .map(|r| {
            assert_eq!(r.len(), header.len(), "row width must match the single header");
            header.iter().cloned().zip(r.iter().cloned()).collect()
        })
        .collect()
}

/// Read a CSV that may repeat its header (incremental outputs) into
/// `column → cell` maps. A record longer than the header in force that starts
/// with that header is a new header.
pub fn read_incremental_maps(path: &Path) -> Vec<std::collections::BTreeMap<String, String>> {
    let mut header: Vec<String> = Vec::new();
    let mut rows = Vec::new();
    for rec in read_csv_records(path) {
        if header.is_empty() || (rec.len() > header.len() && rec[..header.len()] == header[..]) {
            header = rec;
            continue;
        }
        assert_eq!(rec.len(), header.len(), "data row width must match the header above it");
        rows.push(header.iter().cloned().zip(rec).collect());
    }
    rows
}

/// Build a tiny corpus with two communities, "AIDungeon" and "NovelAI":
/// - comments RC_2023-01.zst: 3 AIDungeon comments (the third brings a nested
///   `gildings` object and an `edited` column the first two lack) and 2 NovelAI comments;
/// - comments RC_2023-02.zst: 1 AIDungeon comment, 1 "aidungeon" (wrong case);
/// - submissions RS_2023-01.zst: 1 AIDungeon submission with a `media` object
///   and a list of awards, 1 NovelAI submission.
pub fn make_corpus_communities() -> PathBuf {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.into_path();

    let rc_2023_01 = vec![
        json!({"subreddit":"AIDungeon","id":"c1","author":"alice","body":"first","score":3,"created_utc":1672531200}).to_string(),
        json!({"subreddit":"NovelAI","id":"c2","author":"bob","body":"elsewhere","score":1,"created_utc":1672531300}).to_string(),
        json!({"subreddit":"AIDungeon","id":"c3","author":"carol","body":"second","score":5,"created_utc":1672531400}).to_string(),
        json!({"subreddit":"NovelAI","id":"c4","author":"dave","body":"again","score":2,"created_utc":1672531500}).to_string(),
        json!({
            "subreddit":"AIDungeon","id":"c5","author":"erin","body":"third","score":8,"created_utc":1672531600,
            "edited":1672531700,"gildings":{"gid_1":1,"gid_2":0}
        }).to_string(),
    ];
    write_zst_lines(&base.join("comments").join("RC_2023-01.zst"), &rc_2023_01);

    let rc_2023_02 = vec![
        json!({"subreddit":"AIDungeon","id":"c6","author":"frank","body":"feb","score":1,"created_utc":1675209600}).to_string(),
        json!({"subreddit":"aidungeon","id":"c7","author":"gina","body":"lowercase","score":1,"created_utc":1675209700}).to_string(),
    ];
    write_zst_lines(&base.join("comments").join("RC_2023-02.zst"), &rc_2023_02);

    let rs_2023_01 = vec![
        json!({
            "subreddit":"AIDungeon","id":"s1","name":"t3_s1","title":"Patch notes","selftext":"",
            "created_utc":1672531200,"media":{"oembed":{"type":"video","width":600}},
            "all_awardings":[{"name":"Helpful","count":2}]
        }).to_string(),
        json!({"subreddit":"NovelAI","id":"s2","name":"t3_s2","title":"Other","selftext":"x","created_utc":1672531300}).to_string(),
    ];
    write_zst_lines(&base.join("submissions").join("RS_2023-01.zst"), &rs_2023_01);

    base
}
