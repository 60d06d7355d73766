//! CLI tool for running uploads through the pvingest pipeline.

mod error;
mod report;

use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser, Subcommand};
use pvingest_core::formats::ARROW_FILE_MEDIA_TYPE;
use pvingest_core::{IngestOptions, JobSpec, MismatchPolicy, export_csv, ingest, read_artifact};
use snafu::ResultExt;

use crate::error::{
    BuildTimeIndexSnafu, CliResult, IngestSnafu, ParseJobSnafu, ReadInputSnafu,
    UnknownContentTypeSnafu, WriteOutputSnafu,
};
use crate::report::{write_ingest_summary, write_inspect};

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate an upload against a job and write the aligned Arrow artifact
    Ingest {
        #[arg(long)]
        input: PathBuf,

        /// Media type of the input (default: from the file extension)
        #[arg(long = "content-type")]
        content_type: Option<String>,

        /// Job description (JSON: columns + time_index)
        #[arg(long)]
        job: PathBuf,

        #[arg(long)]
        output: PathBuf,

        /// Fail instead of reporting extra or missing timestamps
        #[arg(long, default_value_t = false)]
        strict: bool,

        /// Keep columns the job does not list
        #[arg(long = "keep-extra-columns", default_value_t = false)]
        keep_extra_columns: bool,
    },

    /// Print the schema and first rows of an Arrow artifact
    Inspect {
        #[arg(long)]
        input: PathBuf,

        #[arg(long, default_value_t = 10)]
        max_rows: usize,
    },

    /// Render an Arrow artifact as CSV
    Export {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        output: PathBuf,
    },
}

#[derive(Debug, Parser)]
#[command(name = "pvingest", version, about)]
struct Cli {
    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env = env_logger::Env::default().default_filter_or(level);
    let _ = env_logger::Builder::from_env(env).try_init();
}

fn content_type_for(path: &Path) -> CliResult<&'static str> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("csv") => Ok("text/csv"),
        Some("arrow" | "feather" | "ipc") => Ok(ARROW_FILE_MEDIA_TYPE),
        _ => UnknownContentTypeSnafu { path }.fail(),
    }
}

fn read_file(path: &Path) -> CliResult<Vec<u8>> {
    std::fs::read(path).context(ReadInputSnafu { path })
}

fn write_file(path: &Path, bytes: &[u8]) -> CliResult<()> {
    std::fs::write(path, bytes).context(WriteOutputSnafu { path })
}

fn load_job(path: &Path) -> CliResult<JobSpec> {
    let bytes = read_file(path)?;
    serde_json::from_slice(&bytes).context(ParseJobSnafu { path })
}

struct IngestArgs {
    input: PathBuf,
    content_type: Option<String>,
    job: PathBuf,
    output: PathBuf,
    strict: bool,
    keep_extra_columns: bool,
}

fn cmd_ingest(args: IngestArgs) -> CliResult<()> {
    let content_type = match args.content_type {
        Some(ct) => ct,
        None => content_type_for(&args.input)?.to_string(),
    };
    let job = load_job(&args.job)?;
    let index = job
        .build_time_index()
        .context(BuildTimeIndexSnafu { path: &args.job })?;
    log::info!(
        "job expects {} columns over {} timestamps ({})",
        job.columns.len(),
        index.len(),
        index.timezone()
    );

    let options = IngestOptions {
        mismatch: if args.strict {
            MismatchPolicy::Reject
        } else {
            MismatchPolicy::Report
        },
        keep_extra_columns: args.keep_extra_columns,
    };

    let content = read_file(&args.input)?;
    let report = ingest(&content, &content_type, &job.columns, &index, &options)
        .context(IngestSnafu { path: &args.input })?;
    write_file(&args.output, &report.artifact)?;

    write_ingest_summary(&report, &args.output, &mut std::io::stdout())
}

fn cmd_inspect(input: &Path, max_rows: usize) -> CliResult<()> {
    let content = read_file(input)?;
    let batch = read_artifact(&content).context(IngestSnafu { path: input })?;
    write_inspect(&batch, max_rows, &mut std::io::stdout())
}

fn cmd_export(input: &Path, output: &Path) -> CliResult<()> {
    let content = read_file(input)?;
    let csv = export_csv(&content).context(IngestSnafu { path: input })?;
    write_file(output, &csv)?;
    println!("wrote: {} ({} bytes)", output.display(), csv.len());
    Ok(())
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.cmd {
        Command::Ingest {
            input,
            content_type,
            job,
            output,
            strict,
            keep_extra_columns,
        } => cmd_ingest(IngestArgs {
            input,
            content_type,
            job,
            output,
            strict,
            keep_extra_columns,
        }),
        Command::Inspect { input, max_rows } => cmd_inspect(&input, max_rows),
        Command::Export { input, output } => cmd_export(&input, &output),
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
