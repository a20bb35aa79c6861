//! subcsv: stream one community out of the monthly comment/submission
//! archives into schema-stable CSV files.
//!
//! Usage:
//!   # Comments and submissions of r/AIDungeon under ./reddit, results in ./results
//!   subcsv extract --base-dir ./reddit --community AIDungeon
//!
//!   # Only 2023 comments, fixed single-header CSVs, aligned afterwards
//!   subcsv extract --comments-dir ./reddit/comments --sources comments \
//!       --community AIDungeon --start 2023-01 --end 2023-12 --strategy two-pass --align
//!
//!   # Re-align what is already in ./results
//!   subcsv align --community AIDungeon

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::PathBuf;
use subcsv::{init_tracing_once, AlignScope, Extractor, SchemaStrategy, Sources, YearMonth};

#[derive(Parser, Debug)]
#[command(name = "subcsv")]
#[command(about = "Extract one community from compressed NDJSON archives into CSV", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Filter, flatten and write one CSV per archive file
    Extract(ExtractArgs),
    /// Rewrite existing CSV outputs under one unified header
    Align(AlignArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SourcesArg {
    Comments,
    Submissions,
    Both,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyArg {
    /// One pass; header line replayed whenever new columns appear
    Incremental,
    /// Two passes; one header with important columns first
    TwoPass,
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Community to keep (exact, case-sensitive; a leading "r/" is ignored)
    #[arg(long, short = 'c')]
    community: String,

    /// Directory receiving the CSV outputs
    #[arg(long, default_value = "results")]
    results_dir: PathBuf,

    /// Output file prefix (default: the community name)
    #[arg(long)]
    prefix: Option<String>,

    /// Directory for aligned copies (default: <results-dir>/aligned-csv)
    #[arg(long)]
    aligned_dir: Option<PathBuf>,

    /// Align every output under one header instead of one per record kind
    #[arg(long)]
    global_align: bool,

    /// Quote only cells that need it instead of every cell
    #[arg(long)]
    minimal_quotes: bool,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    #[command(flatten)]
    out: OutputArgs,

    /// Directory holding comments/ and submissions/
    #[arg(long, default_value = "../reddit")]
    base_dir: PathBuf,

    /// Comment archives (overrides <base-dir>/comments)
    #[arg(long)]
    comments_dir: Option<PathBuf>,

    /// Submission archives (overrides <base-dir>/submissions)
    #[arg(long)]
    submissions_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = SourcesArg::Both)]
    sources: SourcesArg,

    #[arg(long, value_enum, default_value_t = StrategyArg::Incremental)]
    strategy: StrategyArg,

    /// First period to process (YYYY-MM, inclusive)
    #[arg(long)]
    start: Option<YearMonth>,

    /// Last period to process (YYYY-MM, inclusive)
    #[arg(long)]
    end: Option<YearMonth>,

    /// Descend into subdirectories of the input directories
    #[arg(long)]
    recursive: bool,

    /// Suffix appended to the column name of base64-encoded long text
    #[arg(long)]
    long_text_suffix: Option<String>,

    /// Align the outputs once extraction finishes
    #[arg(long)]
    align: bool,

    /// Disable progress bars
    #[arg(long)]
    no_progress: bool,

    /// Write the run summary as JSON to this path
    #[arg(long)]
    summary_json: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct AlignArgs {
    #[command(flatten)]
    out: OutputArgs,
}

fn extractor_for(out: &OutputArgs) -> Extractor {
    let mut etl = Extractor::new()
        .community(&out.community)
        .results_dir(&out.results_dir)
        .quote_all(!out.minimal_quotes)
        .align_scope(if out.global_align { AlignScope::Global } else { AlignScope::PerKind });
    if let Some(prefix) = &out.prefix {
        etl = etl.output_prefix(prefix.clone());
    }
    if let Some(dir) = &out.aligned_dir {
        etl = etl.aligned_dir(dir);
    }
    etl
}

fn main() -> Result<()> {
    init_tracing_once();
    let cli = Cli::parse();

    match cli.command {
        Command::Extract(args) => {
            let mut etl = extractor_for(&args.out)
                .base_dir(&args.base_dir)
                .sources(match args.sources {
                    SourcesArg::Comments => Sources::Comments,
                    SourcesArg::Submissions => Sources::Submissions,
                    SourcesArg::Both => Sources::Both,
                })
                .strategy(match args.strategy {
                    StrategyArg::Incremental => SchemaStrategy::Incremental,
                    StrategyArg::TwoPass => SchemaStrategy::TwoPass,
                })
                .date_range(args.start, args.end)
                .recursive(args.recursive)
                .progress(!args.no_progress);
            if let Some(dir) = &args.comments_dir {
                etl = etl.comments_dir(dir);
            }
            if let Some(dir) = &args.submissions_dir {
                etl = etl.submissions_dir(dir);
            }
            if let Some(suffix) = args.long_text_suffix {
                let mut flatten = etl.options().flatten.clone();
                flatten.long_text_suffix = Some(suffix);
                etl = etl.flatten_options(flatten);
            }

            let summary = if args.align { etl.run_and_align()? } else { etl.run()? };
            println!(
                "{} files, {} rows written, {} rows failed",
                summary.files.len(),
                summary.rows_written,
                summary.rows_failed
            );
            if let Some(path) = args.summary_json {
                let json = serde_json::to_vec_pretty(&summary)?;
                fs::write(&path, json).with_context(|| format!("write {}", path.display()))?;
            }
        }
        Command::Align(args) => {
            let reports = extractor_for(&args.out).align_dir()?;
            for r in &reports {
                println!("{} files aligned under {} columns ({} rows)", r.outputs.len(), r.columns.len(), r.rows);
            }
        }
    }
    Ok(())
}
