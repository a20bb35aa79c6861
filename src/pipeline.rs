use crate::align::{AlignReport, ColumnAligner};
use crate::config::{AlignScope, ExtractOptions, Sources};
use crate::date::YearMonth;
use crate::filters::{CommunityFilter, CreatedDate, RecordStage};
use crate::flatten::FlattenOptions;
use crate::paths::{output_file_name, plan_jobs, FileJob, FileKind};
use crate::progress::FileProgress;
use crate::schema::Schema;
use crate::source::RecordSource;
use crate::util::{create_with_backoff, init_tracing_once, remove_quietly};
use crate::writer::{SchemaStrategy, SchemaWriter};
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// What happened to one input file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// An output file was written.
    Written,
    /// Readable, but no record matched the community; no output file.
    Empty,
    /// Unrecognized format or unreadable; not processed.
    Skipped,
}

#[derive(Clone, Debug, Serialize)]
pub struct FileSummary {
    pub input: PathBuf,
    pub kind: FileKind,
    pub period: String,
    pub status: FileStatus,
    pub format: Option<String>,
    pub output: Option<PathBuf>,
    /// Records accepted by the community filter (= rows_written + rows_failed).
    pub accepted: u64,
    pub rows_written: u64,
    pub rows_failed: u64,
    pub columns: usize,
    pub header_lines: u64,
    pub lines_read: u64,
    pub malformed_lines: u64,
    pub truncated: bool,
}

impl FileSummary {
    fn skipped(job: &FileJob) -> Self {
        Self {
            input: job.path.clone(),
            kind: job.kind,
            period: job.period.clone(),
            status: FileStatus::Skipped,
            format: None,
            output: None,
            accepted: 0,
            rows_written: 0,
            rows_failed: 0,
            columns: 0,
            header_lines: 0,
            lines_read: 0,
            malformed_lines: 0,
            truncated: false,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct RunSummary {
    pub files: Vec<FileSummary>,
    pub accepted: u64,
    pub rows_written: u64,
    pub rows_failed: u64,
    pub aligned: Vec<AlignReport>,
}

impl RunSummary {
    fn push(&mut self, f: FileSummary) {
        self.accepted += f.accepted;
        self.rows_written += f.rows_written;
        self.rows_failed += f.rows_failed;
        self.files.push(f);
    }

    /// Output files written during the run, with their record kind.
    pub fn outputs(&self) -> Vec<(FileKind, PathBuf)> {
        self.files.iter().filter_map(|f| f.output.clone().map(|p| (f.kind, p))).collect()
    }
}

/// Counters of one write pass.
struct WriteOutcome {
    accepted: u64,
    rows_written: u64,
    rows_failed: u64,
    columns: usize,
    header_lines: u64,
}

#[derive(Clone)]
pub struct Extractor {
    pub(crate) opts: ExtractOptions,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor {
    pub fn new() -> Self {
        Self { opts: ExtractOptions::default() }
    }

    pub fn from_options(opts: ExtractOptions) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.opts
    }

    // -------- Builder methods --------
    pub fn base_dir(mut self, base: impl AsRef<Path>) -> Self { self.opts = self.opts.with_base_dir(base); self }
    pub fn comments_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_comments_dir(dir); self }
    pub fn submissions_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_submissions_dir(dir); self }
    pub fn sources(mut self, sources: Sources) -> Self { self.opts = self.opts.with_sources(sources); self }
    pub fn recursive(mut self, yes: bool) -> Self { self.opts = self.opts.with_recursive(yes); self }
    pub fn date_range(mut self, start: Option<YearMonth>, end: Option<YearMonth>) -> Self { self.opts = self.opts.with_date_range(start, end); self }
    pub fn community(mut self, community: impl AsRef<str>) -> Self { self.opts = self.opts.with_community(community); self }
    pub fn community_field(mut self, field: impl Into<String>) -> Self { self.opts = self.opts.with_community_field(field); self }
    pub fn results_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_results_dir(dir); self }
    pub fn aligned_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_aligned_dir(dir); self }
    pub fn output_prefix(mut self, prefix: impl Into<String>) -> Self { self.opts = self.opts.with_output_prefix(prefix); self }
    pub fn align_scope(mut self, scope: AlignScope) -> Self { self.opts = self.opts.with_align_scope(scope); self }
    pub fn strategy(mut self, strategy: SchemaStrategy) -> Self { self.opts = self.opts.with_strategy(strategy); self }
    pub fn important_columns<I, S>(mut self, kind: FileKind, cols: I) -> Self where I: IntoIterator<Item = S>, S: Into<String> { self.opts = self.opts.with_important_columns(kind, cols); self }
    pub fn flatten_options(mut self, flatten: FlattenOptions) -> Self { self.opts = self.opts.with_flatten(flatten); self }
    pub fn timestamp_fields<I, S>(mut self, fields: I) -> Self where I: IntoIterator<Item = S>, S: Into<String> { self.opts = self.opts.with_timestamp_fields(fields); self }
    pub fn derived_column(mut self, name: impl Into<String>) -> Self { self.opts = self.opts.with_derived_column(name); self }
    pub fn quote_all(mut self, yes: bool) -> Self { self.opts = self.opts.with_quote_all(yes); self }
    pub fn milestone_every(mut self, n: u64) -> Self { self.opts = self.opts.with_milestone_every(n); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }
    pub fn io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self { self.opts = self.opts.with_io_buffers(read_bytes, write_bytes); self }

    // -------- Operations --------

    /// Process every planned archive file, one at a time, into `results_dir`.
    pub fn run(&self) -> Result<RunSummary> {
        init_tracing_once();
        if self.opts.community.is_empty() {
            bail!("community is required");
        }
        fs::create_dir_all(&self.opts.results_dir)
            .with_context(|| format!("create results dir {}", self.opts.results_dir.display()))?;

        let jobs = plan_jobs(&self.opts);
        if jobs.is_empty() {
            tracing::warn!("No files found matching selection. Check input dirs and date range.");
        } else {
            tracing::info!("Planned {} files for processing.", jobs.len());
        }

        let mut summary = RunSummary::default();
        for (i, job) in jobs.iter().enumerate() {
            tracing::info!("Processing {} file {:>3}/{} {}", job.kind, i + 1, jobs.len(), job.path.display());
            summary.push(self.process_file(job)?);
        }
        tracing::info!(
            accepted = summary.accepted,
            written = summary.rows_written,
            failed = summary.rows_failed,
            "Done: {} {} records from {} files",
            summary.accepted,
            self.opts.community,
            summary.files.len()
        );
        Ok(summary)
    }

    /// `run`, then align the produced files into `aligned_dir`.
    pub fn run_and_align(&self) -> Result<RunSummary> {
        let mut summary = self.run()?;
        summary.aligned = self.align_outputs(&summary.outputs())?;
        Ok(summary)
    }

    /// Stream one archive file into its CSV output.
    ///
    /// Unrecognized or unreadable inputs are logged and reported as
    /// `Skipped`. Only output path failures are returned as errors.
    pub fn process_file(&self, job: &FileJob) -> Result<FileSummary> {
        let mut summary = FileSummary::skipped(job);
        let mut source = match RecordSource::open(&job.path, self.opts.read_buffer_bytes) {
            Ok(Some(source)) => source,
            Ok(None) => {
                tracing::warn!(path = %job.path.display(), "Skipping unknown file format");
                return Ok(summary);
            }
            Err(e) => {
                tracing::warn!(path = %job.path.display(), error = %format!("{e:#}"), "Skipping unreadable file");
                return Ok(summary);
            }
        };
        summary.format = Some(source.format().to_string());

        fs::create_dir_all(&self.opts.results_dir)
            .with_context(|| format!("create results dir {}", self.opts.results_dir.display()))?;
        let out_path = self.opts.results_dir.join(output_file_name(self.opts.prefix(), job.kind, &job.output_tag));

        let outcome = match self.opts.strategy {
            SchemaStrategy::Incremental => self.write_incremental(job, &mut source, &out_path)?,
            SchemaStrategy::TwoPass => self.write_two_pass(job, &mut source, &out_path)?,
        };

        summary.lines_read = source.lines_read();
        summary.malformed_lines = source.malformed_lines();
        summary.truncated = source.truncated();
        summary.accepted = outcome.accepted;
        summary.rows_written = outcome.rows_written;
        summary.rows_failed = outcome.rows_failed;
        summary.columns = outcome.columns;
        summary.header_lines = outcome.header_lines;

        if outcome.accepted == 0 {
            summary.status = FileStatus::Empty;
            tracing::info!(path = %job.path.display(), "No {} records found; no output written", self.opts.community);
        } else {
            summary.status = FileStatus::Written;
            tracing::info!("CSV file created: {}", out_path.display());
            tracing::info!("Processed {} {} from {}", outcome.accepted, job.kind, self.opts.community);
            summary.output = Some(out_path);
        }
        Ok(summary)
    }

    fn stage(&self, kind: FileKind) -> RecordStage {
        RecordStage::new(
            CommunityFilter::new(&self.opts.community_field, &self.opts.community),
            CreatedDate::new(&self.opts.timestamp_fields, &self.opts.derived_column),
            self.opts.flatten.clone(),
            kind.label(),
        )
        .milestone_every(self.opts.milestone_every)
    }

    fn create_sink(&self, out_path: &Path) -> Result<BufWriter<fs::File>> {
        let file = create_with_backoff(out_path, 16, 50).with_context(|| format!("create {}", out_path.display()))?;
        Ok(BufWriter::with_capacity(self.opts.write_buffer_bytes, file))
    }

    fn write_incremental(&self, job: &FileJob, source: &mut RecordSource, out_path: &Path) -> Result<WriteOutcome> {
        let label = format!("{} {}", job.kind, job.period);
        let progress = FileProgress::new(self.opts.progress, source.total_bytes(), 1, &label);

        let mut writer = SchemaWriter::growing(self.create_sink(out_path)?, self.opts.quote_all);
        let mut stage = self.stage(job.kind);
        let rows_failed = stream_rows(source, &mut stage, &mut writer, &progress);
        progress.finish("done");

        let outcome = finish_writer(writer, stage.accepted(), rows_failed, out_path)?;
        if outcome.accepted == 0 {
            remove_quietly(out_path);
        }
        Ok(outcome)
    }

    fn write_two_pass(&self, job: &FileJob, source: &mut RecordSource, out_path: &Path) -> Result<WriteOutcome> {
        let label = format!("{} {}", job.kind, job.period);
        let mut progress = FileProgress::new(self.opts.progress, source.total_bytes(), 2, &format!("{label} (columns)"));

        // Pass 1: union of keys only.
        let mut scan = self.stage(job.kind).milestone_every(0);
        let mut discovered = BTreeSet::new();
        while let Some(record) = source.next_record() {
            progress.set_consumed(source.bytes_consumed());
            if let Some(row) = scan.project(&record) {
                discovered.extend(row.into_keys());
            }
        }
        if scan.accepted() == 0 {
            progress.finish("no matches");
            // Same outcome as the incremental path: no file left under this name.
            remove_quietly(out_path);
            return Ok(WriteOutcome { accepted: 0, rows_written: 0, rows_failed: 0, columns: 0, header_lines: 0 });
        }
        tracing::debug!(columns = discovered.len(), accepted = scan.accepted(), "column scan complete");

        // Pass 2: stream rows under the fixed schema.
        source.rewind()?;
        progress.next_pass(&format!("{label} (rows)"));
        let schema = Schema::prioritized(self.opts.important_columns(job.kind), discovered);
        let mut writer = SchemaWriter::fixed(self.create_sink(out_path)?, schema, self.opts.quote_all)
            .with_context(|| format!("write header to {}", out_path.display()))?;
        let mut stage = self.stage(job.kind);
        let rows_failed = stream_rows(source, &mut stage, &mut writer, &progress);
        progress.finish("done");

        if stage.accepted() != scan.accepted() {
            tracing::warn!(
                path = %job.path.display(),
                first_pass = scan.accepted(),
                second_pass = stage.accepted(),
                "accepted count differs between passes"
            );
        }
        finish_writer(writer, stage.accepted(), rows_failed, out_path)
    }

    /// Align `outputs` into `aligned_dir`, grouped according to `align_scope`.
    pub fn align_outputs(&self, outputs: &[(FileKind, PathBuf)]) -> Result<Vec<AlignReport>> {
        init_tracing_once();
        let mut groups: BTreeMap<Option<FileKind>, Vec<PathBuf>> = BTreeMap::new();
        for (kind, path) in outputs {
            let key = match self.opts.align_scope {
                AlignScope::PerKind => Some(*kind),
                AlignScope::Global => None,
            };
            groups.entry(key).or_default().push(path.clone());
        }

        let aligner = ColumnAligner::new()
            .quote_all(self.opts.quote_all)
            .io_buffers(self.opts.read_buffer_bytes, self.opts.write_buffer_bytes);
        let out_dir = self.opts.aligned_dir();
        let mut reports = Vec::with_capacity(groups.len());
        for (_, mut files) in groups {
            files.sort();
            reports.push(aligner.align_files(&files, &out_dir)?);
        }
        tracing::info!("CSV files have been realigned and saved to {}", out_dir.display());
        Ok(reports)
    }

    /// Align every `<prefix>_<kind>_*.csv` already present in `results_dir`.
    pub fn align_dir(&self) -> Result<Vec<AlignReport>> {
        let prefix = self.opts.prefix();
        let mut outputs = Vec::new();
        for entry in WalkDir::new(&self.opts.results_dir).min_depth(1).max_depth(1) {
            let entry = entry.with_context(|| format!("list {}", self.opts.results_dir.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else { continue };
            if !name.ends_with(".csv") {
                continue;
            }
            let kind = [FileKind::Comments, FileKind::Submissions]
                .into_iter()
                .find(|k| name.starts_with(&format!("{}_{}_", prefix, k.label())));
            match kind {
                Some(kind) => outputs.push((kind, entry.path().to_path_buf())),
                None => tracing::debug!(file = name, "not an output of this prefix; left out of alignment"),
            }
        }
        if outputs.is_empty() {
            tracing::warn!("No {}_*.csv files found in {}", prefix, self.opts.results_dir.display());
            return Ok(Vec::new());
        }
        self.align_outputs(&outputs)
    }
}

/// Filter → flatten → write every record of the current pass.
/// Returns the number of rows the writer rejected; those are logged and skipped.
fn stream_rows<W: Write>(
    source: &mut RecordSource,
    stage: &mut RecordStage,
    writer: &mut SchemaWriter<W>,
    progress: &FileProgress,
) -> u64 {
    let mut failed = 0u64;
    while let Some(record) = source.next_record() {
        progress.set_consumed(source.bytes_consumed());
        let Some(row) = stage.project(&record) else { continue };
        if let Err(e) = writer.write_row(&row) {
            failed += 1;
            tracing::warn!(
                path = %source.path().display(),
                line = source.lines_read(),
                error = %format!("{e:#}"),
                row = ?row,
                "Error writing row; skipping it"
            );
        }
    }
    failed
}

fn finish_writer<W: Write>(writer: SchemaWriter<W>, accepted: u64, rows_failed: u64, out_path: &Path) -> Result<WriteOutcome> {
    let rows_written = writer.rows_written();
    let columns = writer.schema().len();
    let header_lines = writer.header_lines();
    let mut sink = writer.finish().with_context(|| format!("finish {}", out_path.display()))?;
    sink.flush().with_context(|| format!("flush {}", out_path.display()))?;
    Ok(WriteOutcome { accepted, rows_written, rows_failed, columns, header_lines })
}
