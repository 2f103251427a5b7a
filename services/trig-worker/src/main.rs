//! Isolated triangulation worker.
//!
//! Reads one triangulation request as JSON on stdin and writes the response
//! on stdout. Runs as a child of the classification engine so that a crash
//! inside the triangulation library cannot take the caller down with it.
//! Logs go to stderr, which the caller includes in its error on failure.

use std::io::{self, BufReader};

use anyhow::Result;
use clap::Parser;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "trig-worker")]
#[command(about = "Delaunay triangulation worker for the classification engine")]
struct Args {
    /// Log level
    #[arg(long, default_value = "warn", env = "TRIG_WORKER_LOG_LEVEL")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    debug!("Waiting for triangulation request");
    let stdin = io::stdin();
    let stdout = io::stdout();
    classify_engine::triangulation::worker::serve(BufReader::new(stdin.lock()), stdout.lock())?;

    Ok(())
}
