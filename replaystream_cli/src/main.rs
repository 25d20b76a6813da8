use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;

use replaystream_cli::commands::{self, OutputFormat};
use replaystream_cli::config::{self, ConfigManager};

#[derive(Parser)]
#[command(name = "replaystream")]
#[command(
    author,
    version,
    about = "Replayable, duplicable and measurable byte streams",
    long_about = None
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Configuration file (defaults to the XDG config location)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print only the bytes enclosed between a start and a stop marker
    Extract {
        /// Input file, or - for stdin
        input: PathBuf,

        /// Start marker (defaults to marker.start from the configuration)
        #[arg(short, long)]
        start: Option<String>,

        /// Stop marker; empty copies to end-of-data
        #[arg(short = 'e', long)]
        stop: Option<String>,

        /// Stop after the first region
        #[arg(long)]
        single: bool,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Copy the input to stdout and to every output file
    Tee {
        /// Input file, or - for stdin
        input: PathBuf,

        /// Files receiving a copy
        #[arg(required = true)]
        outputs: Vec<PathBuf>,

        /// Leave the output files open when the tee closes
        #[arg(long)]
        keep_open: bool,
    },

    /// Measure read throughput of the input
    Probe {
        /// Input file, or - for stdin
        input: PathBuf,

        /// Read twice through a replay buffer
        #[arg(long)]
        replay: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration
    Show {
        /// Output format
        #[arg(short, long, value_enum, default_value = "toml")]
        format: OutputFormat,
    },

    /// Get a configuration value
    Get {
        /// Configuration key (e.g., pipe.chunk_size)
        key: String,
    },

    /// Print the configuration file path
    Path,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on debug flag
    if cli.debug {
        env_logger::Builder::from_env(env_logger::Env::default())
            .filter_level(log::LevelFilter::Debug)
            .filter_module("replaystream_core", log::LevelFilter::Debug)
            .filter_module("replaystream_cli", log::LevelFilter::Debug)
            .format_timestamp_millis()
            .init();
        eprintln!("Debug logging enabled");
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    let manager = match cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new(),
    };

    match cli.command {
        Commands::Extract {
            input,
            start,
            stop,
            single,
            output,
        } => {
            let config = manager.load()?;
            let mut markers = config.marker.clone();
            if let Some(start) = start {
                markers.start = start;
            }
            if let Some(stop) = stop {
                markers.stop = stop;
            }
            markers.single_pair |= single;
            if markers.start.is_empty() && markers.stop.is_empty() {
                anyhow::bail!("No markers given; pass --start and/or --stop");
            }

            commands::extract_command(&input, output.as_deref(), &markers, &config)?;
        }

        Commands::Tee {
            input,
            outputs,
            keep_open,
        } => {
            let config = manager.load()?;
            commands::tee_command(&input, &outputs, keep_open, &config)?;
        }

        Commands::Probe {
            input,
            replay,
            format,
        } => {
            let config = manager.load()?;
            let report = commands::probe_command(&input, replay, &config)?;
            println!("{}", commands::render_probe(&report, format)?);
        }

        Commands::Config { command } => match command {
            ConfigCommand::Show { format } => {
                let config = manager.load()?;
                let rendered = match format {
                    OutputFormat::Json => config::to_json(&config)?,
                    OutputFormat::Toml | OutputFormat::Text => config::to_toml(&config)?,
                };
                println!("{}", rendered.trim_end());
            }
            ConfigCommand::Get { key } => {
                let value = manager
                    .get(&key)
                    .with_context(|| format!("Failed to read '{key}'"))?;
                println!("{value}");
            }
            ConfigCommand::Path => {
                let path = manager.config_path();
                if path.exists() {
                    println!("{}", path.display());
                } else {
                    println!("{} {}", path.display(), "(not created)".dimmed());
                }
            }
        },
    }

    Ok(())
}
