//! Input discovery (one job per archive file) and deterministic output naming.

use ahash::AHashSet;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

use crate::config::{ExtractOptions, Sources};
use crate::date::YearMonth;

/// Record kind of a monthly file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Comments,    // RC_YYYY-MM.zst
    Submissions, // RS_YYYY-MM.zst
}

impl FileKind {
    /// Token used in output file names.
    pub fn label(self) -> &'static str {
        match self {
            FileKind::Comments => "comments",
            FileKind::Submissions => "submissions",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Debug)]
pub struct FileJob {
    pub kind: FileKind,
    /// Text between the first `_` and the next `_`/`.` of the file name (`RC_2024-04.zst` → `2024-04`).
    pub period: String,
    pub ym: Option<YearMonth>,
    pub path: PathBuf,
    /// Token naming the output file: the period, with a `_<n>` suffix when
    /// another selected input of the same kind shares that period.
    pub output_tag: String,
}

/// Extract the period token from an archive file name, falling back to the stem.
pub fn period_token(file_name: &str) -> String {
    static PERIOD_RE: OnceLock<Regex> = OnceLock::new();
    let re = PERIOD_RE.get_or_init(|| Regex::new(r"^[^_]*_([^_.]+)").unwrap());
    if let Some(caps) = re.captures(file_name) {
        return caps[1].to_string();
    }
    Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string())
}

/// `<prefix>_<kind>_<period>.csv`
pub fn output_file_name(prefix: &str, kind: FileKind, period: &str) -> String {
    format!("{}_{}_{}.csv", prefix, kind.label(), period)
}

/// List candidate archive files of one kind. Format recognition happens later,
/// when the record source opens the file; here every regular, non-hidden file counts.
pub fn discover_jobs(dir: &Path, kind: FileKind, recursive: bool) -> Vec<FileJob> {
    let mut jobs = Vec::new();
    if !dir.exists() {
        tracing::warn!(path = %dir.display(), "input path does not exist");
        return jobs;
    }
    if dir.is_file() {
        if let Some(job) = job_for(dir, kind) {
            jobs.push(job);
        }
        return jobs;
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    for entry in WalkDir::new(dir).min_depth(1).max_depth(max_depth) {
        match entry {
            Ok(ent) if ent.file_type().is_file() => {
                if let Some(job) = job_for(ent.path(), kind) {
                    jobs.push(job);
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "skipping unreadable directory entry"),
        }
    }
    jobs.sort_by(|a, b| (&a.period, &a.path).cmp(&(&b.period, &b.path)));
    jobs
}

fn job_for(path: &Path, kind: FileKind) -> Option<FileJob> {
    let name = path.file_name()?.to_str()?;
    if name.starts_with('.') {
        return None;
    }
    let period = period_token(name);
    let ym = period.parse().ok();
    Some(FileJob { kind, output_tag: period.clone(), period, ym, path: path.to_path_buf() })
}

/// Jobs selected by `sources` and the optional date window, comments first.
pub fn plan_jobs(opts: &ExtractOptions) -> Vec<FileJob> {
    let mut jobs = Vec::new();
    let mut push_kind = |kind: FileKind, dir: &Path| {
        for job in discover_jobs(dir, kind, opts.recursive) {
            let keep = match (opts.start.is_some() || opts.end.is_some(), job.ym) {
                (false, _) => true,
                (true, Some(ym)) => ym.within(opts.start, opts.end),
                (true, None) => {
                    tracing::debug!(path = %job.path.display(), "no YYYY-MM period in file name; outside date range");
                    false
                }
            };
            if keep {
                jobs.push(job);
            }
        }
    };

    match opts.sources {
        Sources::Comments => push_kind(FileKind::Comments, &opts.comments_dir),
        Sources::Submissions => push_kind(FileKind::Submissions, &opts.submissions_dir),
        Sources::Both => {
            push_kind(FileKind::Comments, &opts.comments_dir);
            push_kind(FileKind::Submissions, &opts.submissions_dir);
        }
    }
    disambiguate_output_tags(&mut jobs);
    jobs
}

/// Give every job a distinct output name. The first input of a `(kind, period)`
/// keeps the bare period; later ones (e.g. `RC_2023-01.jsonl` next to
/// `RC_2023-01.zst`, or the same name in two subdirectories) get `_2`, `_3`, ...
fn disambiguate_output_tags(jobs: &mut [FileJob]) {
    let mut taken: AHashSet<(FileKind, String)> = jobs.iter().map(|j| (j.kind, j.period.clone())).collect();
    let mut seen: AHashSet<(FileKind, String)> = AHashSet::new();
    for job in jobs.iter_mut() {
        if seen.insert((job.kind, job.period.clone())) {
            continue;
        }
        let mut n = 2u32;
        let tag = loop {
            let candidate = format!("{}_{}", job.period, n);
            if taken.insert((job.kind, candidate.clone())) {
                break candidate;
            }
            n += 1;
        };
        tracing::warn!(
            path = %job.path.display(),
            period = %job.period,
            output_tag = %tag,
            "another input of this kind has the same period; writing to a separate output"
        );
        job.output_tag = tag;
    }
}
