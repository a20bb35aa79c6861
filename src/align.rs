//! Column aligner: rewrite a set of CSV outputs under one sorted union header.
//!
//! Inputs may contain header checkpoints written by the incremental strategy:
//! a record longer than the header in force whose leading cells repeat that
//! header. Data rows never exceed the header above them, so such a record can
//! only be a new header. Aligned files always carry exactly one header.
//!
//! Rows stream straight from input to output; originals are never modified.

use ahash::{AHashMap, AHashSet};
use anyhow::{bail, Context, Result};
use csv::{QuoteStyle, ReaderBuilder, StringRecord, WriterBuilder};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::util::{create_with_backoff, open_with_backoff};

#[derive(Clone, Debug, Serialize)]
pub struct AlignReport {
    pub columns: Vec<String>,
    pub outputs: Vec<PathBuf>,
    pub rows: u64,
}

#[derive(Clone, Debug)]
pub struct ColumnAligner {
    quote_all: bool,
    read_buf_bytes: usize,
    write_buf_bytes: usize,
}

impl Default for ColumnAligner {
    fn default() -> Self {
        Self { quote_all: true, read_buf_bytes: 256 * 1024, write_buf_bytes: 256 * 1024 }
    }
}

fn is_checkpoint(header: &StringRecord, rec: &StringRecord) -> bool {
    rec.len() > header.len() && header.iter().zip(rec.iter()).all(|(a, b)| a == b)
}

impl ColumnAligner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quote_all(mut self, yes: bool) -> Self {
        self.quote_all = yes;
        self
    }

    pub fn io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self {
        self.read_buf_bytes = read_bytes.max(8 * 1024);
        self.write_buf_bytes = write_bytes.max(8 * 1024);
        self
    }

    fn reader(&self, path: &Path) -> Result<csv::Reader<File>> {
        let f = open_with_backoff(path, 16, 50).with_context(|| format!("open {}", path.display()))?;
        Ok(ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .buffer_capacity(self.read_buf_bytes)
            .from_reader(f))
    }

    /// Every column named by any header line of `path`, in first-seen order.
    pub fn collect_columns(&self, path: &Path) -> Result<Vec<String>> {
        let mut rdr = self.reader(path)?;
        let mut rec = StringRecord::new();
        let mut header: Option<StringRecord> = None;
        let mut columns = Vec::new();
        let mut seen = AHashSet::new();

        while rdr.read_record(&mut rec).with_context(|| format!("read {}", path.display()))? {
            let new_header = header.as_ref().map_or(true, |h| is_checkpoint(h, &rec));
            if new_header {
                for col in rec.iter() {
                    if seen.insert(col.to_string()) {
                        columns.push(col.to_string());
                    }
                }
                header = Some(rec.clone());
            }
        }
        Ok(columns)
    }

    /// Rewrite `files` into `out_dir` (same file names) under the sorted union of their columns.
    pub fn align_files(&self, files: &[PathBuf], out_dir: &Path) -> Result<AlignReport> {
        fs::create_dir_all(out_dir).with_context(|| format!("create {}", out_dir.display()))?;
        let out_dir_abs = fs::canonicalize(out_dir).with_context(|| format!("resolve {}", out_dir.display()))?;

        let mut union = BTreeSet::new();
        for f in files {
            union.extend(self.collect_columns(f)?);
        }
        let columns: Vec<String> = union.into_iter().collect();
        let index: AHashMap<&str, usize> = columns.iter().enumerate().map(|(i, c)| (c.as_str(), i)).collect();

        let mut outputs = Vec::with_capacity(files.len());
        let mut names = AHashSet::new();
        let mut rows = 0u64;
        for src in files {
            let name = src.file_name().with_context(|| format!("no file name in {}", src.display()))?;
            if !names.insert(name.to_os_string()) {
                bail!("two inputs share the file name {}", Path::new(name).display());
            }
            let src_abs = fs::canonicalize(src).with_context(|| format!("resolve {}", src.display()))?;
            if src_abs == out_dir_abs.join(name) {
                bail!("aligned output would overwrite its input {}", src.display());
            }
            let dst = out_dir.join(name);
            let n = self.rewrite(src, &dst, &columns, &index)?;
            tracing::info!(input = %src.display(), output = %dst.display(), rows = n, "aligned");
            rows += n;
            outputs.push(dst);
        }

        Ok(AlignReport { columns, outputs, rows })
    }

    fn rewrite(&self, src: &Path, dst: &Path, columns: &[String], index: &AHashMap<&str, usize>) -> Result<u64> {
        let mut rdr = self.reader(src)?;
        let file = create_with_backoff(dst, 16, 50).with_context(|| format!("create {}", dst.display()))?;
        let mut wtr = WriterBuilder::new()
            .quote_style(if self.quote_all { QuoteStyle::Always } else { QuoteStyle::Necessary })
            .buffer_capacity(self.write_buf_bytes)
            .from_writer(file);
        wtr.write_record(columns).with_context(|| format!("write {}", dst.display()))?;

        let mut rec = StringRecord::new();
        let mut header: Option<StringRecord> = None;
        // Unified position of each column of the header in force.
        let mut positions: Vec<usize> = Vec::new();
        let mut rows = 0u64;

        while rdr.read_record(&mut rec).with_context(|| format!("read {}", src.display()))? {
            if header.as_ref().map_or(true, |h| is_checkpoint(h, &rec)) {
                positions = rec
                    .iter()
                    .map(|c| index.get(c).copied())
                    .collect::<Option<Vec<_>>>()
                    .with_context(|| format!("{} changed while aligning", src.display()))?;
                header = Some(rec.clone());
                continue;
            }
            if rec.len() > positions.len() {
                tracing::warn!(
                    path = %src.display(),
                    line = rec.position().map(|p| p.line()),
                    extra = rec.len() - positions.len(),
                    "row has more cells than its header; extra cells dropped"
                );
            }

            let mut cells: Vec<&str> = vec![""; columns.len()];
            for (cell, &pos) in rec.iter().zip(&positions) {
                cells[pos] = cell;
            }
            wtr.write_record(&cells).with_context(|| format!("write {}", dst.display()))?;
            rows += 1;
        }

        wtr.flush().with_context(|| format!("flush {}", dst.display()))?;
        Ok(rows)
    }
}
