//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/triagent/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/triagent/` (~/.config/triagent/)
//! - State/Logs: `$XDG_STATE_HOME/triagent/` (~/.local/state/triagent/)

use crate::error::{Error, Result};
use crate::normalize::Normalizer;
use crate::suggest::SuggestionRule;
use crate::types::Severity;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Language model used for triage and suggestions (optional)
    #[serde(default)]
    pub llm: Option<LlmConfig>,

    /// Triage configuration
    #[serde(default)]
    pub triage: TriageConfig,

    /// Log analysis configuration
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Solution suggestion configuration
    #[serde(default)]
    pub suggestions: SuggestionConfig,

    /// Document search configuration
    #[serde(default)]
    pub documents: DocumentConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// LLM provider configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Provider type
    pub provider: LlmProvider,
    /// Model to use
    pub model: String,
    /// API endpoint (optional, uses default for provider)
    pub endpoint: Option<String>,
    /// API key (can also use env var)
    pub api_key: Option<String>,
    /// HTTP request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

/// Supported LLM providers
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Ollama,
    Claude,
    OpenAI,
}

impl LlmProvider {
    /// Returns the default endpoint for this provider
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            LlmProvider::Ollama => "http://localhost:11434",
            LlmProvider::Claude => "https://api.anthropic.com",
            LlmProvider::OpenAI => "https://api.openai.com",
        }
    }

    /// Environment variable consulted when no api_key is configured
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            LlmProvider::Ollama => None,
            LlmProvider::Claude => Some("ANTHROPIC_API_KEY"),
            LlmProvider::OpenAI => Some("OPENAI_API_KEY"),
        }
    }
}

fn default_llm_timeout() -> u64 {
    30
}

/// Triage (task classification) configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TriageConfig {
    /// Below this confidence the request is classified as unknown
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Deadline for the classification call in milliseconds
    #[serde(default = "default_triage_timeout")]
    pub timeout_ms: u64,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            timeout_ms: default_triage_timeout(),
        }
    }
}

fn default_confidence_threshold() -> f64 {
    0.5
}

fn default_triage_timeout() -> u64 {
    15_000
}

/// Log analysis configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    /// Directory holding the log sources
    pub log_dir: Option<PathBuf>,

    /// Glob patterns (relative to `log_dir`) selecting the sources to scan
    #[serde(default = "default_source_patterns")]
    pub source_patterns: Vec<String>,

    /// Maximum number of references followed per trace
    #[serde(default = "default_depth_limit")]
    pub depth_limit: u32,

    /// Severities that open incidents
    #[serde(default = "default_incident_severities")]
    pub incident_severities: Vec<Severity>,

    /// Pattern overrides for the matcher
    #[serde(default)]
    pub patterns: PatternConfig,

    /// Signature normalization rule
    #[serde(default)]
    pub normalization: NormalizationConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            source_patterns: default_source_patterns(),
            depth_limit: default_depth_limit(),
            incident_severities: default_incident_severities(),
            patterns: PatternConfig::default(),
            normalization: NormalizationConfig::default(),
        }
    }
}

fn default_source_patterns() -> Vec<String> {
    vec!["**/*.log".to_string(), "**/*.log.gz".to_string()]
}

fn default_depth_limit() -> u32 {
    5
}

fn default_incident_severities() -> Vec<Severity> {
    vec![Severity::Error]
}

/// Regex overrides for the pattern matcher.
///
/// `severity` must contain a `level` group; `reference` must contain a
/// `source` group and may contain a `line` group.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct PatternConfig {
    pub severity: Option<String>,
    pub reference: Option<String>,
}

/// Signature normalization rule
#[derive(Debug, Deserialize, Clone)]
pub struct NormalizationConfig {
    /// Lowercase the text before applying replacements
    #[serde(default)]
    pub lowercase: bool,

    /// Apply the built-in volatile-token replacements
    #[serde(default = "default_true")]
    pub use_defaults: bool,

    /// Extra replacements, applied after the built-in ones
    #[serde(default)]
    pub rules: Vec<ReplacementRule>,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            lowercase: false,
            use_defaults: true,
            rules: vec![],
        }
    }
}

/// A `pattern -> replacement` pair applied during normalization
#[derive(Debug, Deserialize, Clone)]
pub struct ReplacementRule {
    pub pattern: String,
    pub replacement: String,
}

fn default_true() -> bool {
    true
}

/// Solution suggestion configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SuggestionConfig {
    /// Deadline for each model call in milliseconds
    #[serde(default = "default_suggestion_timeout")]
    pub timeout_ms: u64,

    /// Rule table consulted before the model
    #[serde(default)]
    pub rules: Vec<SuggestionRule>,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_suggestion_timeout(),
            rules: vec![],
        }
    }
}

fn default_suggestion_timeout() -> u64 {
    20_000
}

/// Document search configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DocumentConfig {
    /// Directory holding searchable documents
    pub root: Option<PathBuf>,

    /// Glob patterns (relative to `root`) selecting documents
    #[serde(default = "default_document_patterns")]
    pub patterns: Vec<String>,

    /// Maximum number of hits returned
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            root: None,
            patterns: default_document_patterns(),
            max_results: default_max_results(),
        }
    }
}

fn default_document_patterns() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

fn default_max_results() -> usize {
    10
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

fn check_threshold(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::Config(format!(
            "{name} must be between 0.0 and 1.0, got {value}"
        )));
    }
    Ok(())
}

fn check_depth_limit(depth_limit: u32) -> Result<()> {
    if depth_limit == 0 {
        return Err(Error::Config(
            "depth_limit must be at least 1".to_string(),
        ));
    }
    Ok(())
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate value ranges, returning the first problem found
    pub fn validate(&self) -> Result<()> {
        check_threshold("triage.confidence_threshold", self.triage.confidence_threshold)?;
        check_depth_limit(self.analysis.depth_limit)?;

        if self.triage.timeout_ms == 0 || self.suggestions.timeout_ms == 0 {
            return Err(Error::Config(
                "triage.timeout_ms and suggestions.timeout_ms must be positive".to_string(),
            ));
        }
        if self.analysis.incident_severities.is_empty() {
            return Err(Error::Config(
                "analysis.incident_severities must not be empty".to_string(),
            ));
        }
        if self.documents.max_results == 0 {
            return Err(Error::Config(
                "documents.max_results must be at least 1".to_string(),
            ));
        }
        if let Some(llm) = &self.llm {
            if llm.model.trim().is_empty() {
                return Err(Error::Config("llm.model must not be empty".to_string()));
            }
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/triagent/config.toml` (~/.config/triagent/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("triagent").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/triagent/` (~/.local/state/triagent/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("triagent")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/triagent/triagent.log` (~/.local/state/triagent/triagent.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("triagent.log")
    }
}

/// Per-request knobs of [`TaskRouter::handle_request`](crate::router::TaskRouter::handle_request).
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Maximum number of references followed per trace (>= 1)
    pub depth_limit: u32,
    /// Triage confidence below which the request is unknown
    pub confidence_threshold: f64,
    /// Signature normalization rule
    pub normalizer: Arc<Normalizer>,
}

impl RequestOptions {
    /// Build validated options.
    pub fn new(depth_limit: u32, confidence_threshold: f64, normalizer: Normalizer) -> Result<Self> {
        let options = Self {
            depth_limit,
            confidence_threshold,
            normalizer: Arc::new(normalizer),
        };
        options.validate()?;
        Ok(options)
    }

    /// Build options from the `[analysis]` and `[triage]` sections.
    pub fn from_config(config: &Config) -> Result<Self> {
        let normalizer = Normalizer::from_config(&config.analysis.normalization)?;
        Self::new(
            config.analysis.depth_limit,
            config.triage.confidence_threshold,
            normalizer,
        )
    }

    pub fn validate(&self) -> Result<()> {
        check_depth_limit(self.depth_limit)?;
        check_threshold("confidence_threshold", self.confidence_threshold)
    }
}
