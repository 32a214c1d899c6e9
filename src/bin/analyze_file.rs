//! Run the analysis pipeline against a local file and print the markdown report.
//!
//! Shares configuration with the HTTP server. The report goes to stdout and logs go to stderr, so
//! the output can be piped straight into a file.
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use fin_analyzer::{
    config::{Config, GateMode},
    logging::{self, ConsoleTarget},
    service::{AnalysisService, DocumentUpload},
};

#[derive(Parser)]
#[command(
    name = "analyze-file",
    about = "Analyze a financial document without going through the HTTP server"
)]
struct Cli {
    /// Document to analyze.
    #[arg(long)]
    file: PathBuf,
    /// Question to answer; defaults to a full analysis request.
    #[arg(long)]
    query: Option<String>,
    /// Override `VERIFICATION_GATE` for this run.
    #[arg(long, value_parser = parse_gate)]
    gate: Option<GateMode>,
}

fn parse_gate(value: &str) -> Result<GateMode, String> {
    value
        .parse()
        .map_err(|()| format!("unknown gate mode '{value}' (expected enforce or advisory)"))
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    let mut config = Config::from_env().context("failed to load configuration")?;
    if let Some(gate) = cli.gate {
        config.verification_gate = gate;
    }
    logging::init_tracing(ConsoleTarget::Stderr);

    let bytes = tokio::fs::read(&cli.file)
        .await
        .with_context(|| format!("failed to read {}", cli.file.display()))?;
    let file_name = cli
        .file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());

    let service =
        AnalysisService::from_config(&config).context("failed to initialize analysis service")?;
    let outcome = service
        .analyze(DocumentUpload {
            query: cli.query,
            file_name,
            bytes,
        })
        .await
        .with_context(|| format!("analysis of {} failed", cli.file.display()))?;

    println!("{}", outcome.analysis);
    Ok(())
}
