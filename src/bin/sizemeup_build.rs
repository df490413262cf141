use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use sizemeup::app::{App, BuildOptions, ProgressSink, ProgressSinkKind};
use sizemeup::config::{BuildOverrides, ConfigLoader};
use sizemeup::error::SizeError;
use sizemeup::fetch::HttpClient;
use sizemeup::output::{JsonOutput, OutputMode, TextOutput};
use sizemeup::progress::{ConsoleProgress, NoopProgress};
use sizemeup::store::Store;
use sizemeup::taxonomy::NcbiTaxonomyClient;

#[derive(Parser)]
#[command(name = "sizemeup-build")]
#[command(about = "Build the genome size table used by sizemeup")]
#[command(version, author)]
struct Cli {
    /// Directory to write the sizes table to
    #[arg(short, long)]
    outdir: String,

    /// NCBI API key, raises the taxonomy rate limit
    #[arg(short = 'k', long, env = "NCBI_API_KEY", hide_env_values = true)]
    ncbi_api_key: Option<String>,

    /// Number of taxons sent per taxonomy request
    #[arg(short, long)]
    chunk_size: Option<usize>,

    /// Tab-delimited file of user-provided genome sizes
    #[arg(short, long)]
    user_sizes: Option<PathBuf>,

    /// Add sizes estimated from ATB assemblies and a category column
    #[arg(long)]
    extended: bool,

    /// Minimum ATB samples a species needs before its size is estimated
    #[arg(long)]
    min_genomes: Option<usize>,

    #[arg(long)]
    atb_file_list_url: Option<String>,

    #[arg(long)]
    atb_assembly_stats_url: Option<String>,

    /// Where downloaded source files are kept between runs
    #[arg(long)]
    cache_dir: Option<String>,

    #[arg(long)]
    config: Option<String>,

    /// Download source files again even if they are cached
    #[arg(long)]
    force: bool,

    #[arg(long, conflicts_with = "silent")]
    verbose: bool,

    #[arg(long)]
    silent: bool,

    /// Print the build summary as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<SizeError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &SizeError) -> u8 {
    match error {
        SizeError::MissingFile(_) | SizeError::MissingSetting(_) => 2,
        SizeError::FetchHttp(_)
        | SizeError::FetchStatus { .. }
        | SizeError::TaxonomyHttp(_)
        | SizeError::TaxonomyStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.silent);

    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    let overrides = BuildOverrides {
        chunk_size: cli.chunk_size,
        min_genomes: cli.min_genomes,
        atb_file_list_url: cli.atb_file_list_url,
        atb_assembly_stats_url: cli.atb_assembly_stats_url,
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?.with_overrides(&overrides);

    let store = Store::new(
        Utf8PathBuf::from(cli.outdir),
        cli.cache_dir.map(Utf8PathBuf::from),
    )?;
    let remote = HttpClient::new(Duration::from_secs(config.timeout_secs))?;
    let taxonomy = NcbiTaxonomyClient::from_config(&config, cli.ncbi_api_key.as_deref())?;
    let app = App::new(store, config, remote, taxonomy)?;

    let options = BuildOptions {
        force: cli.force,
        extended: cli.extended,
        user_sizes: cli.user_sizes,
    };

    match output_mode {
        OutputMode::Json => {
            let result = app.build(&options, &JsonOutput)?;
            JsonOutput::print_build(&result).into_diagnostic()?;
        }
        OutputMode::Text => {
            let console = (!cli.silent).then(|| ConsoleProgress::new(ProgressSinkKind::Build));
            let sink: &dyn ProgressSink = match &console {
                Some(console) => console,
                None => &NoopProgress,
            };
            let result = app.build(&options, sink)?;
            if let Some(console) = &console {
                console.finish();
                TextOutput::print_build(&result).into_diagnostic()?;
            }
        }
    }
    Ok(())
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
