use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing::error;
use tracing_subscriber::EnvFilter;

use sizemeup::app::{self, ProgressSink, ProgressSinkKind, QueryOptions};
use sizemeup::error::SizeError;
use sizemeup::output::{JsonOutput, OutputMode, TextOutput};
use sizemeup::progress::{ConsoleProgress, NoopProgress};

#[derive(Parser)]
#[command(name = "sizemeup")]
#[command(about = "Look up the genome size of a species by name, taxid or classification file")]
#[command(version, author)]
struct Cli {
    /// Species name, NCBI taxid, or a classification file whose second
    /// line carries the species in its second column
    #[arg(short, long)]
    query: String,

    /// Sizes table produced by sizemeup-build
    #[arg(short = 'z', long, env = "SIZEMEUP_SIZES")]
    sizes: PathBuf,

    /// Directory to write the result to
    #[arg(short, long, default_value = "./")]
    outdir: String,

    /// Prefix of the result file
    #[arg(short, long, default_value = "sizemeup")]
    prefix: String,

    #[arg(long, conflicts_with = "silent")]
    verbose: bool,

    #[arg(long)]
    silent: bool,

    /// Print the result as JSON instead of a table
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(error) = report.downcast_ref::<SizeError>() {
                return ExitCode::from(map_exit_code(error));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &SizeError) -> u8 {
    match error {
        SizeError::MissingTable(_) | SizeError::MissingFile(_) => 2,
        _ => 1,
    }
}

/// Returns whether the query was found.
fn run() -> miette::Result<bool> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.silent);

    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };
    let options = QueryOptions {
        out_dir: Utf8PathBuf::from(cli.outdir),
        prefix: cli.prefix,
    };

    let console = cli
        .verbose
        .then(|| ConsoleProgress::new(ProgressSinkKind::Query));
    let sink: &dyn ProgressSink = match &console {
        Some(console) => console,
        None => &NoopProgress,
    };
    let result = app::query(&cli.query, &cli.sizes, &options, sink)?;
    if let Some(console) = &console {
        console.finish();
    }

    if !result.found {
        error!(
            "{} not found in {}",
            result.effective_query.as_deref().unwrap_or(&result.query),
            cli.sizes.display()
        );
    }

    match output_mode {
        OutputMode::Json => JsonOutput::print_query(&result).into_diagnostic()?,
        OutputMode::Text if !cli.silent => TextOutput::print_query(&result).into_diagnostic()?,
        OutputMode::Text => {}
    }
    Ok(result.found)
}

fn init_tracing(verbose: bool, silent: bool) {
    let level = if verbose {
        "debug"
    } else if silent {
        "error"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
