//! Command line entry point of the GTFS loader

use anyhow::{bail, Context};
use clap::Parser;
use gtfs_loader::{FeedSource, GtfsLoader, LoaderConfig};
use log::info;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gtfs-loader")]
#[command(about = "Load a GTFS feed into a SQLite database")]
#[command(version)]
struct Cli {
    /// Directory or zip archive of the GTFS files
    gtfs_path: String,
    /// SQLite database file, overrides the configuration
    #[arg(short, long)]
    database: Option<PathBuf>,
    /// Configuration file, defaults to gtfs-loader.toml if present
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Clear existing GTFS data before loading, without asking
    #[arg(long, conflicts_with = "keep")]
    clear: bool,
    /// Keep existing GTFS data, without asking
    #[arg(long)]
    keep: bool,
    /// Only check that the required files are present
    #[arg(long)]
    validate_only: bool,
    /// Maximum number of rows in one INSERT statement
    #[arg(long)]
    batch_size: Option<usize>,
    /// Do not enforce the references between tables
    #[arg(long)]
    no_foreign_keys: bool,
    /// Print the resolved configuration and exit
    #[arg(long)]
    print_config: bool,
    /// Log debug messages
    #[arg(short, long)]
    verbose: bool,
}

fn ask_clear_existing() -> anyhow::Result<bool> {
    print!("Clear existing GTFS data before loading? (y/N): ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("failed to read the answer")?;
    Ok(answer.trim().to_lowercase().starts_with('y'))
}

fn resolve_config(cli: &Cli) -> anyhow::Result<LoaderConfig> {
    let mut config =
        LoaderConfig::load(cli.config.as_deref()).context("failed to load the configuration")?;
    if let Some(database) = &cli.database {
        config.database.path = database.clone();
    }
    if let Some(batch_size) = cli.batch_size {
        config.load.batch_size = batch_size;
    }
    if cli.no_foreign_keys {
        config.database.foreign_keys = false;
    }
    config.validate()?;
    Ok(config)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = resolve_config(&cli)?;
    if cli.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let is_url = cfg!(feature = "read-url") && cli.gtfs_path.starts_with("http");
    if !is_url && !std::path::Path::new(&cli.gtfs_path).exists() {
        bail!("Directory {} does not exist", cli.gtfs_path);
    }
    let mut feed = FeedSource::new(&cli.gtfs_path)
        .with_context(|| format!("failed to open the feed {}", cli.gtfs_path))?;

    if cli.validate_only {
        GtfsLoader::validate_files(&feed)?;
        println!("{}: all required files are present", cli.gtfs_path);
        return Ok(());
    }

    let mut loader = GtfsLoader::from_config(&config).with_context(|| {
        format!(
            "failed to open the database {}",
            config.database.path.display()
        )
    })?;
    let clear_existing = if cli.clear {
        true
    } else if cli.keep {
        false
    } else {
        ask_clear_existing()?
    };
    info!(
        "Loading {} into {}",
        feed,
        config.database.path.display()
    );

    let summary = loader.load_all(&mut feed, clear_existing)?;
    println!();
    println!("{}", summary);
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
