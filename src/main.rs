use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use daily_close::{
    config::Config,
    data::loader::Preprocessor,
    pipeline::{
        mapper::Mapper,
        reducer::{GroupOrder, Reducer},
        run_pipeline,
    },
};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

/// Daily average close price from minute bars, as a map-reduce pipeline
#[derive(Parser)]
#[command(name = "daily-close", version, about, long_about = None)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean a raw Timestamp,Open,High,Low,Close,Volume file
    Preprocess {
        /// Raw CSV to read
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Cleaned CSV to write
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Emit date<TAB>close for each CSV row on stdin
    Map {
        /// Read from a file instead of stdin
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Average date<TAB>close pairs grouped by date
    Reduce {
        /// Read from a file instead of stdin
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Sort by date before grouping instead of requiring grouped input
        #[arg(long)]
        sort: bool,
        /// Decimal digits in the averages
        #[arg(long)]
        decimals: Option<usize>,
    },
    /// Map, sort and reduce a cleaned CSV in one process
    Run {
        /// Read a cleaned CSV from a file instead of stdin
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(default_level(cli.verbose, &cli.command), cli.verbose);

    if let Err(e) = execute(cli) {
        error!("Fatal error: {e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

/// Log level used when `RUST_LOG` is unset.
///
/// `preprocess` writes to a file, so its row preview is shown without `-v`.
fn default_level(verbose: u8, command: &Commands) -> &'static str {
    match verbose {
        0 if matches!(command, Commands::Preprocess { .. }) => "info",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn init_logging(level: &str, verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries the data stream
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(verbose >= 2)
        .init();
}

/// Applies subcommand flags on top of the loaded configuration.
fn apply_overrides(config: &mut Config, command: &Commands) {
    match command {
        Commands::Preprocess { input, output } => {
            if let Some(input) = input {
                config.preprocess.input = input.clone();
            }
            if let Some(output) = output {
                config.preprocess.output = output.clone();
            }
        }
        Commands::Reduce { sort, decimals, .. } => {
            if *sort {
                config.reducer.order = GroupOrder::SortByDate;
            }
            if let Some(decimals) = decimals {
                config.reducer.decimals = *decimals;
            }
        }
        Commands::Map { .. } | Commands::Run { .. } => {}
    }
}

fn execute(cli: Cli) -> Result<()> {
    let mut config = Config::load_or_default(cli.config.as_deref())?;
    apply_overrides(&mut config, &cli.command);
    debug!(?config, "loaded configuration");

    let stdout = io::stdout();
    match cli.command {
        Commands::Preprocess { .. } => {
            let settings = &config.preprocess;
            Preprocessor::new(settings.preview_rows)
                .preprocess_file(&settings.input, &settings.output)
                .with_context(|| {
                    format!(
                        "preprocessing {} into {}",
                        settings.input.display(),
                        settings.output.display()
                    )
                })?;
        }
        Commands::Map { input } => {
            let reader = open_input(input.as_deref())?;
            Mapper::new(&config.mapper)
                .run(reader, BufWriter::new(stdout.lock()))
                .context("mapping rows")?;
        }
        Commands::Reduce { input, .. } => {
            let reader = open_input(input.as_deref())?;
            Reducer::new(config.reducer.decimals, config.reducer.order)
                .run(reader, BufWriter::new(stdout.lock()))
                .context("reducing pairs")?;
        }
        Commands::Run { input } => {
            let reader = open_input(input.as_deref())?;
            let source = input
                .as_deref()
                .map_or_else(|| "stdin".to_string(), |p| p.display().to_string());
            run_pipeline(reader, BufWriter::new(stdout.lock()), &config)
                .with_context(|| format!("running pipeline over {source}"))?;
        }
    }
    Ok(())
}

fn open_input(path: Option<&Path>) -> Result<Box<dyn BufRead>> {
    match path {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("opening {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(io::stdin()))),
    }
}
