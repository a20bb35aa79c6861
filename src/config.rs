use crate::date::YearMonth;
use crate::flatten::FlattenOptions;
use crate::writer::SchemaStrategy;
use std::path::{Path, PathBuf};

/// Data source toggle (comments, submissions, both).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sources {
    Comments,
    Submissions,
    Both,
}

/// How the column aligner groups output files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlignScope {
    /// One unified header per record kind.
    PerKind,
    /// One unified header across every output file.
    Global,
}

pub const DEFAULT_COMMENT_COLUMNS: &[&str] = &[
    "created_date", "author", "author_fullname", "body", "id", "link_id", "name", "parent_id", "permalink", "score", "ups",
];

pub const DEFAULT_SUBMISSION_COLUMNS: &[&str] =
    &["created_date", "name", "title", "selftext", "ups", "upvote_ratio", "author_fullname", "permalink"];

/// User-facing options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct ExtractOptions {
    pub comments_dir: PathBuf,
    pub submissions_dir: PathBuf,
    pub sources: Sources,
    pub recursive: bool,              // descend into subdirectories of the input dirs
    pub start: Option<YearMonth>,     // inclusive, matched against the file's period token
    pub end: Option<YearMonth>,       // inclusive

    pub community: String,            // exact, case-sensitive match; "r/" prefix stripped
    pub community_field: String,

    pub results_dir: PathBuf,
    pub aligned_dir: Option<PathBuf>, // if None, results_dir/aligned-csv
    pub output_prefix: Option<String>, // if None, the community name
    pub align_scope: AlignScope,

    pub strategy: SchemaStrategy,
    pub comment_columns: Vec<String>,    // two-pass column priority
    pub submission_columns: Vec<String>,
    pub flatten: FlattenOptions,
    pub timestamp_fields: Vec<String>, // first present one feeds the derived date
    pub derived_column: String,
    pub quote_all: bool,
    pub milestone_every: u64,

    pub progress: bool,
    pub read_buffer_bytes: usize,
    pub write_buffer_bytes: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        let base = PathBuf::from("../reddit");
        Self {
            comments_dir: base.join("comments"),
            submissions_dir: base.join("submissions"),
            sources: Sources::Both,
            recursive: false,
            start: None,
            end: None,

            community: String::new(),
            community_field: "subreddit".to_string(),

            results_dir: PathBuf::from("results"),
            aligned_dir: None,
            output_prefix: None,
            align_scope: AlignScope::PerKind,

            strategy: SchemaStrategy::Incremental,
            comment_columns: DEFAULT_COMMENT_COLUMNS.iter().map(|s| s.to_string()).collect(),
            submission_columns: DEFAULT_SUBMISSION_COLUMNS.iter().map(|s| s.to_string()).collect(),
            flatten: FlattenOptions::default(),
            timestamp_fields: vec!["created_utc".to_string(), "created".to_string()],
            derived_column: "created_date".to_string(),
            quote_all: true,
            milestone_every: 1000,

            progress: true,
            read_buffer_bytes: 256 * 1024,
            write_buffer_bytes: 256 * 1024,
        }
    }
}

impl ExtractOptions {
    pub fn with_base_dir(mut self, base_dir: impl AsRef<Path>) -> Self {
        let base = base_dir.as_ref();
        self.comments_dir = base.join("comments");
        self.submissions_dir = base.join("submissions");
        self
    }
    pub fn with_comments_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.comments_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_submissions_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.submissions_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_sources(mut self, sources: Sources) -> Self {
        self.sources = sources;
        self
    }
    pub fn with_recursive(mut self, yes: bool) -> Self {
        self.recursive = yes;
        self
    }
    pub fn with_date_range(mut self, start: Option<YearMonth>, end: Option<YearMonth>) -> Self {
        self.start = start;
        self.end = end;
        self
    }
    pub fn with_community(mut self, community: impl AsRef<str>) -> Self {
        let s = community.as_ref().trim();
        self.community = s.strip_prefix("r/").unwrap_or(s).to_string();
        self
    }
    pub fn with_community_field(mut self, field: impl Into<String>) -> Self {
        self.community_field = field.into();
        self
    }
    pub fn with_results_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.results_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_aligned_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.aligned_dir = Some(dir.as_ref().to_path_buf());
        self
    }
    pub fn with_output_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.output_prefix = Some(prefix.into());
        self
    }
    pub fn with_align_scope(mut self, scope: AlignScope) -> Self {
        self.align_scope = scope;
        self
    }
    pub fn with_strategy(mut self, strategy: SchemaStrategy) -> Self {
        self.strategy = strategy;
        self
    }
    pub fn with_important_columns<I, S>(mut self, kind: crate::paths::FileKind, cols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cols = cols.into_iter().map(Into::into).collect();
        match kind {
            crate::paths::FileKind::Comments => self.comment_columns = cols,
            crate::paths::FileKind::Submissions => self.submission_columns = cols,
        }
        self
    }
    pub fn with_flatten(mut self, flatten: FlattenOptions) -> Self {
        self.flatten = flatten;
        self
    }
    pub fn with_timestamp_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.timestamp_fields = fields.into_iter().map(Into::into).collect();
        self
    }
    pub fn with_derived_column(mut self, name: impl Into<String>) -> Self {
        self.derived_column = name.into();
        self
    }
    pub fn with_quote_all(mut self, yes: bool) -> Self {
        self.quote_all = yes;
        self
    }
    pub fn with_milestone_every(mut self, n: u64) -> Self {
        self.milestone_every = n;
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }

    // IO buffers tuning
    pub fn with_io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self {
        self.read_buffer_bytes = read_bytes.max(8 * 1024);
        self.write_buffer_bytes = write_bytes.max(8 * 1024);
        self
    }

    /// Output name prefix: explicit prefix, else the community.
    pub fn prefix(&self) -> &str {
        self.output_prefix.as_deref().unwrap_or(&self.community)
    }

    pub fn aligned_dir(&self) -> PathBuf {
        self.aligned_dir.clone().unwrap_or_else(|| self.results_dir.join("aligned-csv"))
    }

    pub fn important_columns(&self, kind: crate::paths::FileKind) -> &[String] {
        match kind {
            crate::paths::FileKind::Comments => &self.comment_columns,
            crate::paths::FileKind::Submissions => &self.submission_columns,
        }
    }
}
