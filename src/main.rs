//! reqtrace
//!
//! Processes a requirements project: validates templates and requirement
//! documents, resolves template inheritance and trace links, and persists
//! the normalized model to the traceability store. The accumulated
//! validation-failure list is the program's output.

use anyhow::Result;
use clap::Parser;
use reqtrace::config::ConfigLoader;
use reqtrace::db::Database;
use reqtrace::pipeline::Processor;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "reqtrace", version, about = "Requirements project processor")]
struct Cli {
    /// Project file to process
    project_file: PathBuf,

    /// Explicit config file path (overrides the tier search)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Database path override
    #[arg(long)]
    database: Option<PathBuf>,

    /// Where to store the evaluation results, default console
    #[arg(long)]
    output_file: Option<PathBuf>,

    /// Export file format, i.e. json
    #[arg(long, default_value = "json")]
    output_format: String,

    /// Print the database content after processing
    #[arg(long)]
    show_database: bool,

    /// Logging destination: 0/off, 1/stdout, 2/stderr, or a file path
    #[arg(long, default_value = "2")]
    log: String,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    match cli.log.as_str() {
        "0" | "off" => {
            // No logging
        }
        "1" | "stdout" => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(std::io::stdout)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        "2" | "stderr" => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        filename => {
            let file = OpenOptions::new().create(true).append(true).open(filename)?;
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(file)
                .with_ansi(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if cli.output_format != "json" {
        eprintln!("Only json file format allowed");
        return Ok(ExitCode::from(2));
    }

    init_logging(&cli)?;

    // Explicit config path routes through the loader's env override.
    // SAFETY: set before any other threads are spawned.
    if let Some(config_path) = &cli.config {
        unsafe {
            std::env::set_var("REQTRACE_CONFIG_PATH", config_path);
        }
    }
    let mut loader = ConfigLoader::load()?;

    let config = loader.config_mut();
    if let Some(db_path) = &cli.database {
        config.database.db_path = db_path.clone();
    }

    let config = loader.into_config();

    info!("Attempting to process project file");
    let db = if config.database.db_path.as_os_str() == ":memory:" {
        Database::open_in_memory()?
    } else {
        Database::open(&config.database.db_path)?
    };

    let processor = Processor::new(config, db.clone());
    let outcome = match processor.process_project(&cli.project_file).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("{}", e);
            db.destroy();
            return Ok(ExitCode::from(2));
        }
    };

    if cli.show_database {
        match processor.database_content() {
            Ok(content) => {
                info!("Content of database:");
                println!("{}", serde_json::to_string_pretty(&content)?);
            }
            Err(e) => error!("Failed to read database content: {}", e),
        }
    }

    let exit = if outcome.has_data {
        if let Some(output_file) = &cli.output_file {
            tokio::fs::write(output_file, &outcome.data).await?;
            info!(path = %output_file.display(), "Results written");
        } else {
            println!("{}", outcome.data);
        }
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    };

    db.destroy();
    Ok(exit)
}
