//! triagent - route a support request to document search or log analysis
//!
//! Classifies the request with the configured language model, runs the
//! matching handler and prints the response.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use triagent_core::{Config, HttpLanguageModel, RequestOptions, TaskRouter};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "triagent")]
#[command(about = "Triage a request and answer it from logs or documents")]
#[command(version)]
struct Args {
    /// The request, e.g. "find last week's error logs"
    #[arg(required = true, num_args = 1..)]
    query: Vec<String>,

    /// Config file (defaults to $XDG_CONFIG_HOME/triagent/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum number of references followed per trace
    #[arg(long)]
    depth_limit: Option<u32>,

    /// Classification confidence below which the request is unknown
    #[arg(long)]
    threshold: Option<f64>,

    /// Directory holding the log sources
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Directory holding searchable documents
    #[arg(long)]
    docs_dir: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

impl Args {
    /// Apply command-line overrides on top of the loaded configuration.
    fn apply(&self, config: &mut Config) {
        if let Some(depth_limit) = self.depth_limit {
            config.analysis.depth_limit = depth_limit;
        }
        if let Some(threshold) = self.threshold {
            config.triage.confidence_threshold = threshold;
        }
        if let Some(log_dir) = &self.log_dir {
            config.analysis.log_dir = Some(log_dir.clone());
        }
        if let Some(docs_dir) = &self.docs_dir {
            config.documents.root = Some(docs_dir.clone());
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::load().context("failed to load configuration")?,
    };
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    // Initialize logging (to file, stdout carries the response).
    // The guard must outlive the request so pending lines are flushed on return.
    let _log_guard =
        triagent_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let llm_config = config
        .llm
        .clone()
        .context("no [llm] section configured; triage needs a language model")?;
    let llm = HttpLanguageModel::new(&llm_config).context("failed to create LLM client")?;

    let router =
        TaskRouter::from_config(&config, Arc::new(llm)).context("failed to build router")?;
    let options = RequestOptions::from_config(&config).context("invalid request options")?;

    let query = args.query.join(" ");
    tracing::info!(query = %query, "triagent starting request");
    let response = router.handle_request(&query, &options).await;

    match args.format {
        OutputFormat::Text => print!("{}", triagent_core::format::render_response(&response)),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&response).context("failed to encode response")?
        ),
    }

    if response.is_failure() {
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}
