//! CLI binary entry point for post-loader

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use post_loader::OutputFormat;
use post_loader::cli::CliError;
use post_loader::cli::commands::errors::{ErrorsArgs, handle_errors};
use post_loader::cli::commands::merge::{MergeArgs, handle_merge};
use post_loader::cli::commands::show::{ShowArgs, handle_show};
use post_loader::cli::commands::transform::{TransformArgs, handle_transform};
#[cfg(feature = "s3")]
use post_loader::cli::commands::upload::{UploadArgs, handle_upload};
use post_loader::config::{CONFIG_FILENAME, sample_config};
use post_loader::merge::diagnostics::DEFAULT_DIAGNOSTICS_LIMIT;

#[derive(Parser)]
#[command(name = "post-loader")]
#[command(about = "Load daily post partitions into the warehouse")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = CONFIG_FILENAME)]
    config: PathBuf,

    /// Log at debug level, overriding RUST_LOG
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge a partition artifact into the target table
    Merge {
        /// Partition to load (YYYYMMDD)
        partition: String,
        /// Output format (table, json, csv)
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
        /// Maximum load-error rows to report on failure
        #[arg(long, default_value_t = DEFAULT_DIAGNOSTICS_LIMIT)]
        diagnostics_limit: usize,
    },

    /// Show the most recent rows of the load-error catalog
    Errors {
        /// Number of rows
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
        /// Output format (table, json, csv)
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Print the target table
    Show {
        /// Maximum number of rows
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Output format (table, json, csv)
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Normalise harvested posts (JSON array) into a partition artifact
    Transform {
        /// JSON file of harvested posts
        input: PathBuf,
        /// Partition the posts belong to (YYYYMMDD)
        partition: String,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Upload a partition artifact to the configured bucket
    #[cfg(feature = "s3")]
    Upload {
        /// Partition to upload (YYYYMMDD)
        partition: String,
        /// Directory holding the artifact
        #[arg(short, long, default_value = ".")]
        source_dir: PathBuf,
    },

    /// Print a sample configuration file
    ConfigSample,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<i32, CliError> {
    match cli.command {
        Commands::Merge {
            partition,
            format,
            diagnostics_limit,
        } => handle_merge(&MergeArgs {
            config: cli.config,
            partition,
            format,
            diagnostics_limit,
        }),
        Commands::Errors { limit, format } => handle_errors(&ErrorsArgs {
            config: cli.config,
            limit,
            format,
        })
        .map(|_| 0),
        Commands::Show { limit, format } => handle_show(&ShowArgs {
            config: cli.config,
            limit,
            format,
        })
        .map(|_| 0),
        Commands::Transform {
            input,
            partition,
            output_dir,
        } => {
            let path = handle_transform(&TransformArgs {
                input,
                partition,
                output_dir,
            })?;
            println!("Wrote {}", path.display());
            Ok(0)
        }
        #[cfg(feature = "s3")]
        Commands::Upload {
            partition,
            source_dir,
        } => handle_upload(&UploadArgs {
            config: cli.config,
            partition,
            source_dir,
        })
        .map(|_| 0),
        Commands::ConfigSample => {
            print!("{}", sample_config());
            Ok(0)
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
