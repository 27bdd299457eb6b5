//! # triagent-core
//!
//! Core library for triagent - a request router that triages natural-language
//! support requests and answers them from logs or documents.
//!
//! This library provides:
//! - Task classification with a language model (triage)
//! - Log analysis: pattern matching, nested trace resolution, error
//!   aggregation and solution suggestions
//! - A small document search
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! A request flows through two stages:
//! - **Triage:** [`TaskClassifier`] labels the query as document search, log
//!   analysis or unknown
//! - **Dispatch:** [`Dispatcher`] runs the matching handler and turns any
//!   handler failure into a structured [`Response::Failure`]
//!
//! [`TaskRouter`] ties both together behind `handle_request`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use triagent_core::{Config, HttpLanguageModel, RequestOptions, TaskRouter};
//!
//! # async fn run() -> triagent_core::Result<()> {
//! let config = Config::load()?;
//! let llm_config = config.llm.clone().expect("[llm] section required");
//! let llm = Arc::new(HttpLanguageModel::new(&llm_config)?);
//! let router = TaskRouter::from_config(&config, llm)?;
//!
//! let options = RequestOptions::from_config(&config)?;
//! let response = router.handle_request("find last week's error logs", &options).await;
//! println!("{}", triagent_core::format::render_response(&response));
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use aggregate::ErrorAggregator;
pub use analysis::LogAnalysisPipeline;
pub use classify::TaskClassifier;
pub use config::{Config, RequestOptions};
pub use dispatch::Dispatcher;
pub use documents::{DirectoryDocumentSearch, DocumentSearch};
pub use error::{Error, Result};
pub use llm::{HttpLanguageModel, LanguageModel};
pub use matcher::PatternMatcher;
pub use normalize::Normalizer;
pub use router::TaskRouter;
pub use source::{DirectorySource, LogSource, MemorySource};
pub use suggest::{SolutionSuggester, FALLBACK_SUGGESTION};
pub use trace::TraceResolver;
pub use types::*;

// Public modules
pub mod aggregate;
pub mod analysis;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod documents;
pub mod error;
pub mod format;
pub mod llm;
pub mod logging;
pub mod matcher;
pub mod normalize;
pub mod router;
pub mod source;
pub mod suggest;
pub mod trace;
pub mod types;
