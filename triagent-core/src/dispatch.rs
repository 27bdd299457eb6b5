//! Dispatch of classified requests to their handler
//!
//! Errors and panics raised inside a handler never escape: they become a
//! [`FailureKind::HandlerFailure`] response and the dispatcher stays usable.

use crate::analysis::LogAnalysisPipeline;
use crate::classify::clarification_for;
use crate::config::RequestOptions;
use crate::documents::DocumentSearch;
use crate::error::{Error, Result};
use crate::types::{ClarificationRequest, ClassificationResult, FailureKind, Intent, Response};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Routes a [`ClassificationResult`] to the matching handler.
#[derive(Clone, Default)]
pub struct Dispatcher {
    analysis: Option<Arc<LogAnalysisPipeline>>,
    documents: Option<Arc<dyn DocumentSearch>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_analysis(mut self, pipeline: LogAnalysisPipeline) -> Self {
        self.analysis = Some(Arc::new(pipeline));
        self
    }

    pub fn with_documents(mut self, search: Arc<dyn DocumentSearch>) -> Self {
        self.documents = Some(search);
        self
    }

    /// Run the handler chosen by `classification`.
    ///
    /// [`Intent::Unknown`] never reaches a handler; it yields a clarification.
    pub async fn dispatch(
        &self,
        classification: &ClassificationResult,
        options: &RequestOptions,
    ) -> Response {
        let intent = classification.intent;
        let query = classification.raw_query.as_str();

        let outcome = match intent {
            Intent::Unknown => {
                return Response::Clarification(ClarificationRequest {
                    query: query.to_string(),
                    question: clarification_for(query),
                    confidence: classification.confidence,
                });
            }
            Intent::DocumentSearch => {
                AssertUnwindSafe(self.search_documents(query))
                    .catch_unwind()
                    .await
            }
            Intent::LogAnalysis => {
                AssertUnwindSafe(self.analyse_logs(query, options))
                    .catch_unwind()
                    .await
            }
        };

        match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::warn!(handler = %intent, error = %e, "Handler failed");
                Response::failure(FailureKind::HandlerFailure, Some(intent), e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(handler = %intent, panic = %message, "Handler panicked");
                Response::failure(
                    FailureKind::HandlerFailure,
                    Some(intent),
                    format!("handler panicked: {message}"),
                )
            }
        }
    }

    async fn search_documents(&self, query: &str) -> Result<Response> {
        let search = self
            .documents
            .as_ref()
            .ok_or_else(|| Error::Handler("document search is not configured".to_string()))?;
        Ok(Response::Documents(search.search(query).await?))
    }

    async fn analyse_logs(&self, query: &str, options: &RequestOptions) -> Result<Response> {
        let pipeline = self.analysis.as_ref().ok_or_else(|| {
            Error::Handler("log analysis is not configured (set analysis.log_dir)".to_string())
        })?;
        Ok(Response::Analysis(pipeline.run(query, options).await?))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
