//! Schema-stabilizing CSV writer.
//!
//! Two strategies keep every row addressable by column name while the input
//! keeps introducing fields:
//!
//! - [`SchemaStrategy::Incremental`]: one pass. Whenever a row brings unseen
//!   keys they are appended (sorted) to the schema and a fresh header line is
//!   written before the row. A file can therefore hold several header lines;
//!   each one is a checkpoint that starts with the previous header and extends
//!   it. Rows always carry exactly as many cells as the header above them.
//!   [`crate::ColumnAligner`] folds such files into a single header.
//! - [`SchemaStrategy::TwoPass`]: a first pass over the archive only collects
//!   the union of keys, then the schema is fixed (important columns first)
//!   and written once. Exactly one header line, at the cost of decoding the
//!   archive twice.

use anyhow::{Context, Result};
use csv::{QuoteStyle, WriterBuilder};
use serde::Serialize;
use std::io::Write;

use crate::flatten::FlatRow;
use crate::schema::Schema;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaStrategy {
    /// Grow the schema as rows arrive and replay the header on growth.
    Incremental,
    /// Collect all columns first, then stream rows under one header.
    TwoPass,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Growing,
    Fixed,
}

pub struct SchemaWriter<W: Write> {
    sink: W,
    encoder: WriterBuilder,
    // One encoded record; handed to the sink whole so a failed write never
    // leaves half a record behind in the encoder.
    scratch: Vec<u8>,
    schema: Schema,
    mode: Mode,
    rows_written: u64,
    header_lines: u64,
    unknown_cells: u64,
}

fn encoder(quote_all: bool) -> WriterBuilder {
    let mut b = WriterBuilder::new();
    b.flexible(true)
        .buffer_capacity(4 * 1024)
        .quote_style(if quote_all { QuoteStyle::Always } else { QuoteStyle::Necessary });
    b
}

/// Encode one CSV record into `scratch`, then write it to `sink` in one call.
fn write_record<W, I, T>(encoder: &WriterBuilder, scratch: &mut Vec<u8>, sink: &mut W, record: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    scratch.clear();
    {
        let mut enc = encoder.from_writer(&mut *scratch);
        enc.write_record(record)?;
        enc.flush()?;
    }
    sink.write_all(&scratch[..])?;
    Ok(())
}

impl<W: Write> SchemaWriter<W> {
    fn with_schema(sink: W, schema: Schema, mode: Mode, quote_all: bool) -> Self {
        Self {
            sink,
            encoder: encoder(quote_all),
            scratch: Vec::with_capacity(4 * 1024),
            schema,
            mode,
            rows_written: 0,
            header_lines: 0,
            unknown_cells: 0,
        }
    }

    /// Incremental strategy: start with an empty schema, headers emitted on growth.
    pub fn growing(sink: W, quote_all: bool) -> Self {
        Self::with_schema(sink, Schema::new(), Mode::Growing, quote_all)
    }

    /// Two-pass strategy: the schema is final; its header is written immediately.
    pub fn fixed(sink: W, schema: Schema, quote_all: bool) -> Result<Self> {
        let mut w = Self::with_schema(sink, schema, Mode::Fixed, quote_all);
        write_record(&w.encoder, &mut w.scratch, &mut w.sink, w.schema.columns()).context("write CSV header")?;
        w.header_lines += 1;
        Ok(w)
    }

    /// Write one row under the current schema, growing it first if allowed.
    ///
    /// New columns join the schema only once their header line is written, so
    /// after an error the output stays consistent and the caller can log the
    /// row and keep going with the next one.
    pub fn write_row(&mut self, row: &FlatRow) -> Result<()> {
        match self.mode {
            Mode::Growing => {
                let added = self.schema.unseen_columns(row);
                if !added.is_empty() {
                    let header = self.schema.columns().iter().chain(added.iter());
                    write_record(&self.encoder, &mut self.scratch, &mut self.sink, header)
                        .context("write CSV header")?;
                    self.header_lines += 1;
                    tracing::debug!(added = ?added, columns = self.schema.len() + added.len(), "schema grew");
                    self.schema.append(added);
                }
            }
            Mode::Fixed => {
                let unknown = row.keys().filter(|k| !self.schema.contains(k)).count();
                if unknown > 0 {
                    // Only reachable if the archive changed between passes.
                    self.unknown_cells += unknown as u64;
                    tracing::warn!(unknown, "row has columns outside the fixed schema; dropping those cells");
                }
            }
        }
        write_record(&self.encoder, &mut self.scratch, &mut self.sink, self.schema.project(row))
            .context("write CSV row")?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Header lines emitted so far (1 for two-pass, ≥1 for incremental once rows exist).
    pub fn header_lines(&self) -> u64 {
        self.header_lines
    }

    /// Cells dropped because their column was not in a fixed schema.
    pub fn unknown_cells(&self) -> u64 {
        self.unknown_cells
    }

    /// Flush and hand back the sink.
    pub fn finish(mut self) -> Result<W> {
        self.sink.flush().context("flush CSV output")?;
        Ok(self.sink)
    }
}
