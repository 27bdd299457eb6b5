//! Request entry point
//!
//! [`TaskRouter::handle_request`] classifies a query and dispatches it. It
//! always returns a [`Response`]; invalid options, handler failures and
//! cancellation come back as [`Response::Failure`].

use crate::analysis::LogAnalysisPipeline;
use crate::classify::TaskClassifier;
use crate::config::{Config, RequestOptions};
use crate::dispatch::Dispatcher;
use crate::documents::DirectoryDocumentSearch;
use crate::error::Result;
use crate::llm::LanguageModel;
use crate::matcher::PatternMatcher;
use crate::source::DirectorySource;
use crate::suggest::SolutionSuggester;
use crate::types::{FailureKind, Response};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Classifier plus dispatcher. Cheap to clone and safe to share.
#[derive(Clone)]
pub struct TaskRouter {
    classifier: TaskClassifier,
    dispatcher: Dispatcher,
}

impl TaskRouter {
    pub fn new(classifier: TaskClassifier, dispatcher: Dispatcher) -> Self {
        Self {
            classifier,
            dispatcher,
        }
    }

    /// Wire every component from configuration around one language model.
    ///
    /// Handlers whose section is not configured (`analysis.log_dir`,
    /// `documents.root`) are left out and fail per request.
    pub fn from_config(config: &Config, llm: Arc<dyn LanguageModel>) -> Result<Self> {
        let classifier = TaskClassifier::new(
            Arc::clone(&llm),
            Duration::from_millis(config.triage.timeout_ms),
        );

        let mut dispatcher = Dispatcher::new();

        if let Some(log_dir) = &config.analysis.log_dir {
            let source = DirectorySource::new(log_dir, config.analysis.source_patterns.clone());
            let suggester = SolutionSuggester::new(
                config.suggestions.rules.clone(),
                Some(Arc::clone(&llm)),
                Duration::from_millis(config.suggestions.timeout_ms),
            );
            let pipeline = LogAnalysisPipeline::new(
                Arc::new(source),
                Arc::new(PatternMatcher::from_config(&config.analysis.patterns)?),
                Arc::new(suggester),
            )
            .with_severities(config.analysis.incident_severities.clone());
            dispatcher = dispatcher.with_analysis(pipeline);
        }

        if config.documents.root.is_some() {
            let search = DirectoryDocumentSearch::from_config(&config.documents)?;
            dispatcher = dispatcher.with_documents(Arc::new(search));
        }

        Ok(Self::new(classifier, dispatcher))
    }

    /// Classify `query` and run the chosen handler.
    pub async fn handle_request(&self, query: &str, options: &RequestOptions) -> Response {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("request", request_id = %request_id);

        async move {
            if let Err(e) = options.validate() {
                tracing::warn!(error = %e, "Rejected request options");
                return Response::failure(FailureKind::InvalidConfiguration, None, e.to_string());
            }

            let classification = self
                .classifier
                .classify(query, options.confidence_threshold)
                .await;
            tracing::info!(
                intent = %classification.intent,
                confidence = classification.confidence,
                "Classified request"
            );

            let response = self.dispatcher.dispatch(&classification, options).await;
            tracing::info!(response = response.kind(), "Request complete");
            response
        }
        .instrument(span)
        .await
    }

    /// [`handle_request`](Self::handle_request) that gives up when `cancel` fires.
    ///
    /// In-flight model calls are dropped with the request future.
    pub async fn handle_request_with_cancel(
        &self,
        query: &str,
        options: &RequestOptions,
        cancel: CancellationToken,
    ) -> Response {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Request cancelled");
                Response::failure(FailureKind::Cancelled, None, "request cancelled")
            }
            response = self.handle_request(query, options) => response,
        }
    }
}
