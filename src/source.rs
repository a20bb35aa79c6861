//! Record source: one archive file → lazy stream of JSON objects.
//!
//! The decoder is picked from the file signature (magic bytes) and, failing
//! that, the extension. Unknown formats yield `Ok(None)` so callers can skip
//! the file. A decode error mid-stream (truncated or corrupt tail) ends the
//! stream cleanly after logging; everything parsed up to that point stays valid.

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use serde_json::{Map, Value};
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use zstd::stream::read::Decoder as ZstdDecoder;

use crate::util::open_with_backoff;

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];
const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// Pushshift monthly frames need a 2 GiB window.
const ZSTD_WINDOW_LOG_MAX: u32 = 31;

/// Byte-stream formats the source knows how to decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zstd,
    Gzip,
    /// Uncompressed newline-delimited JSON.
    Plain,
}

impl ArchiveFormat {
    /// Pick a decoder from the first bytes of the file, then from its extension.
    pub fn detect(path: &Path, head: &[u8]) -> Option<Self> {
        if head.starts_with(&ZSTD_MAGIC) {
            return Some(Self::Zstd);
        }
        if head.starts_with(&GZIP_MAGIC) {
            return Some(Self::Gzip);
        }
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "zst" | "zstd" => Some(Self::Zstd),
            "gz" => Some(Self::Gzip),
            "jsonl" | "ndjson" | "json" => Some(Self::Plain),
            _ => None,
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Zstd => "zstd",
            Self::Gzip => "gzip",
            Self::Plain => "ndjson",
        })
    }
}

/// A `Read` wrapper that counts compressed bytes pulled from the file.
struct CountingReader<R: Read> {
    inner: R,
    counter: Arc<AtomicU64>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.counter.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// Lazy sequence of JSON objects decoded from one archive file.
pub struct RecordSource {
    path: PathBuf,
    format: ArchiveFormat,
    total_bytes: u64,
    read_buf_bytes: usize,
    counter: Arc<AtomicU64>,
    reader: BufReader<Box<dyn Read + Send>>,
    buf: Vec<u8>,
    lines_read: u64,
    malformed_lines: u64,
    truncated: bool,
    done: bool,
}

impl RecordSource {
    /// Open `path` and select a decoder. Returns `Ok(None)` for unrecognized formats.
    pub fn open(path: &Path, read_buf_bytes: usize) -> Result<Option<Self>> {
        let mut file = open_with_backoff(path, 16, 50).with_context(|| format!("open {}", path.display()))?;
        let total_bytes = file.metadata().with_context(|| format!("stat {}", path.display()))?.len();

        let mut head = Vec::with_capacity(4);
        (&mut file).take(4).read_to_end(&mut head).with_context(|| format!("read {}", path.display()))?;
        let Some(format) = ArchiveFormat::detect(path, &head) else {
            return Ok(None);
        };
        file.seek(SeekFrom::Start(0))?;

        let counter = Arc::new(AtomicU64::new(0));
        let reader = build_reader(file, format, counter.clone(), read_buf_bytes)
            .with_context(|| format!("init {} decoder for {}", format, path.display()))?;

        Ok(Some(Self {
            path: path.to_path_buf(),
            format,
            total_bytes,
            read_buf_bytes,
            counter,
            reader,
            buf: Vec::with_capacity(16 * 1024),
            lines_read: 0,
            malformed_lines: 0,
            truncated: false,
            done: false,
        }))
    }

    /// Restart from byte 0 of the underlying file; counters are reset.
    pub fn rewind(&mut self) -> Result<()> {
        let file = open_with_backoff(&self.path, 16, 50).with_context(|| format!("reopen {}", self.path.display()))?;
        let counter = Arc::new(AtomicU64::new(0));
        self.reader = build_reader(file, self.format, counter.clone(), self.read_buf_bytes)
            .with_context(|| format!("init {} decoder for {}", self.format, self.path.display()))?;
        self.counter = counter;
        self.lines_read = 0;
        self.malformed_lines = 0;
        self.truncated = false;
        self.done = false;
        Ok(())
    }

    /// Next JSON object, or `None` at end of stream (or after a decode error).
    pub fn next_record(&mut self) -> Option<Map<String, Value>> {
        while !self.done {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(_) => {}
                Err(e) => {
                    self.stop_truncated(&e);
                    return None;
                }
            }
            self.lines_read += 1;

            let line = trim_line_end(&self.buf);
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<Value>(line) {
                Ok(Value::Object(map)) => return Some(map),
                Ok(other) => {
                    self.malformed_lines += 1;
                    tracing::warn!(
                        path = %self.path.display(),
                        line = self.lines_read,
                        kind = json_kind(&other),
                        "skipping non-object JSON line"
                    );
                }
                Err(e) => {
                    self.malformed_lines += 1;
                    tracing::warn!(
                        path = %self.path.display(),
                        line = self.lines_read,
                        offset = self.bytes_consumed(),
                        error = %e,
                        "skipping malformed JSON line"
                    );
                }
            }
        }
        None
    }

    fn stop_truncated(&mut self, e: &io::Error) {
        self.done = true;
        self.truncated = true;
        tracing::warn!(
            path = %self.path.display(),
            format = %self.format,
            lines = self.lines_read,
            offset = self.bytes_consumed(),
            total = self.total_bytes,
            error = %e,
            "archive ended with a decode error (usually a truncated or corrupt tail); \
             keeping records read so far and moving on"
        );
    }

    /// Compressed bytes consumed so far (for progress against `total_bytes`).
    pub fn bytes_consumed(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    /// Physical lines read in the current pass, blank and malformed ones included.
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    pub fn malformed_lines(&self) -> u64 {
        self.malformed_lines
    }

    /// True once the current pass stopped on a decode error.
    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

impl Iterator for RecordSource {
    type Item = Map<String, Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record()
    }
}

fn build_reader(
    file: File,
    format: ArchiveFormat,
    counter: Arc<AtomicU64>,
    read_buf_bytes: usize,
) -> io::Result<BufReader<Box<dyn Read + Send>>> {
    let counted = CountingReader { inner: file, counter };
    let inner: Box<dyn Read + Send> = match format {
        ArchiveFormat::Zstd => {
            let mut decoder = ZstdDecoder::new(counted)?;
            decoder.window_log_max(ZSTD_WINDOW_LOG_MAX)?;
            Box::new(decoder)
        }
        ArchiveFormat::Gzip => Box::new(MultiGzDecoder::new(counted)),
        ArchiveFormat::Plain => Box::new(counted),
    };
    Ok(BufReader::with_capacity(read_buf_bytes.max(8 * 1024), inner))
}

fn trim_line_end(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.strip_suffix(b"\r").unwrap_or(buf)
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
