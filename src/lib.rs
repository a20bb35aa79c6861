mod config;
mod date;
mod paths;
mod source;

mod flatten;
mod schema;
mod writer;
mod filters;

mod align;
mod progress;
mod util;
mod pipeline;

pub use crate::config::{AlignScope, ExtractOptions, Sources, DEFAULT_COMMENT_COLUMNS, DEFAULT_SUBMISSION_COLUMNS};
pub use crate::date::{format_created_date, parse_epoch_seconds, YearMonth};
pub use crate::paths::{discover_jobs, output_file_name, period_token, plan_jobs, FileJob, FileKind};
pub use crate::source::{ArchiveFormat, RecordSource};

pub use crate::flatten::{decode_long_text, flatten, flatten_with, FlatRow, FlattenOptions, LONG_TEXT_THRESHOLD, MAX_FLATTEN_DEPTH};
pub use crate::schema::Schema;
pub use crate::writer::{SchemaStrategy, SchemaWriter};
pub use crate::filters::{CommunityFilter, CreatedDate, RecordStage};

pub use crate::align::{AlignReport, ColumnAligner};
pub use crate::pipeline::{Extractor, FileStatus, FileSummary, RunSummary};

// Logging setup shared by the binary and tests.
pub use crate::util::init_tracing_once;
