//! Task classification (triage)
//!
//! Asks the language model which handler owns a request. Every failure mode
//! of the model (timeout, bad JSON, unknown label, out-of-range confidence)
//! degrades to [`Intent::Unknown`]; classification itself never errors.

use crate::error::{Error, Result};
use crate::llm::{extract_json_object, with_timeout, CompletionRequest, LanguageModel};
use crate::types::{ClassificationResult, Intent};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const SYSTEM_PROMPT: &str = "You route support requests. Decide whether the request asks to search documentation (document_search) or to analyse application logs and errors (log_analysis). If neither fits, answer unknown. Return strict JSON with keys intent and confidence (a number between 0.0 and 1.0).";

fn intent_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "intent": {
                "type": "string",
                "enum": ["document_search", "log_analysis", "unknown"]
            },
            "confidence": { "type": "number", "minimum": 0.0, "maximum": 1.0 }
        },
        "required": ["intent", "confidence"]
    })
}

/// Trim and collapse internal whitespace.
pub fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a model answer into an intent and confidence.
fn parse_answer(raw: &str) -> Result<(Intent, f64)> {
    let value = extract_json_object(raw)?;
    let label = value
        .get("intent")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::MalformedResponse("missing string field `intent`".to_string()))?;
    let intent = label
        .parse::<Intent>()
        .map_err(Error::MalformedResponse)?;
    let confidence = value
        .get("confidence")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| Error::MalformedResponse("missing numeric field `confidence`".to_string()))?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(Error::MalformedResponse(format!(
            "confidence {confidence} outside [0, 1]"
        )));
    }
    Ok((intent, confidence))
}

/// Decides which handler owns a request. Stateless.
#[derive(Clone)]
pub struct TaskClassifier {
    llm: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl TaskClassifier {
    pub fn new(llm: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// Classify `query`; results below `threshold` are [`Intent::Unknown`].
    pub async fn classify(&self, query: &str, threshold: f64) -> ClassificationResult {
        let query = normalize_query(query);
        if query.is_empty() {
            return ClassificationResult::unknown(query, 0.0);
        }

        let request = CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: format!("Request: {query}\n\nReturn only JSON."),
            schema: Some(intent_schema()),
        };

        let answer = with_timeout("classification", self.timeout, self.llm.complete(&request))
            .await
            .and_then(|raw| parse_answer(&raw));

        match answer {
            Ok((intent, confidence)) if confidence < threshold => {
                tracing::debug!(
                    intent = %intent,
                    confidence,
                    threshold,
                    "Classification below threshold"
                );
                ClassificationResult::unknown(query, confidence)
            }
            Ok((intent, confidence)) => ClassificationResult {
                intent,
                confidence,
                raw_query: query,
            },
            Err(e) => {
                tracing::warn!(error = %e, "Classification failed; treating request as unknown");
                ClassificationResult::unknown(query, 0.0)
            }
        }
    }
}

/// Follow-up question for a request triage could not place.
pub fn clarification_for(query: &str) -> String {
    let q = query.to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|w| q.contains(w));

    let logs = mentions(&["log", "error", "debug", "trace", "crash", "exception", "fail"]);
    let docs = mentions(&["doc", "page", "wiki", "guide", "manual", "how to", "confluence"]);

    match (logs, docs) {
        (true, true) => "Should I analyse the application logs for this, or search the documentation?".to_string(),
        (true, false) => "Do you want me to analyse the logs? Which service or time range should I look at?".to_string(),
        (false, true) => "Which topic should I search the documentation for?".to_string(),
        (false, false) => "I couldn't tell what you need. Are you looking for documentation, or should I investigate errors in the logs?".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedModel {
        answer: Result<String>,
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn answering(raw: &str) -> Arc<Self> {
            Arc::new(Self {
                answer: Ok(raw.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                answer: Err(Error::Llm("boom".to_string())),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(request.schema.is_some());
            match &self.answer {
                Ok(raw) => Ok(raw.clone()),
                Err(e) => Err(Error::Llm(e.to_string())),
            }
        }
    }

    struct SlowModel;

    #[async_trait]
    impl LanguageModel for SlowModel {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(r#"{"intent":"log_analysis","confidence":0.9}"#.to_string())
        }
    }

    fn classifier(model: Arc<dyn LanguageModel>) -> TaskClassifier {
        TaskClassifier::new(model, Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_confident_label_is_kept() {
        let model = ScriptedModel::answering(r#"{"intent":"log_analysis","confidence":0.9}"#);
        let result = classifier(model).classify("  find last week's   error logs ", 0.5).await;
        assert_eq!(result.intent, Intent::LogAnalysis);
        assert_eq!(result.confidence, 0.9);
        assert_eq!(result.raw_query, "find last week's error logs");
    }

    #[tokio::test]
    async fn test_below_threshold_is_unknown() {
        let model = ScriptedModel::answering(r#"{"intent":"document_search","confidence":0.3}"#);
        let result = classifier(model).classify("where is the vpn guide", 0.5).await;
        assert_eq!(result.intent, Intent::Unknown);
        assert_eq!(result.confidence, 0.3);
    }

    #[tokio::test]
    async fn test_empty_query_skips_model() {
        let model = ScriptedModel::answering(r#"{"intent":"log_analysis","confidence":1.0}"#);
        let result = classifier(model.clone()).classify("   \n\t ", 0.5).await;
        assert_eq!(result.intent, Intent::Unknown);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bad_answers_degrade_to_unknown() {
        for raw in [
            "I think it's logs",
            r#"{"intent":"weather","confidence":0.9}"#,
            r#"{"intent":"log_analysis","confidence":1.7}"#,
            r#"{"intent":"log_analysis"}"#,
        ] {
            let result = classifier(ScriptedModel::answering(raw)).classify("q", 0.5).await;
            assert_eq!(result.intent, Intent::Unknown, "answer {raw:?}");
        }

        let result = classifier(ScriptedModel::failing()).classify("q", 0.5).await;
        assert_eq!(result.intent, Intent::Unknown);
    }

    #[tokio::test]
    async fn test_timeout_degrades_to_unknown() {
        let classifier = TaskClassifier::new(Arc::new(SlowModel), Duration::from_millis(20));
        let result = classifier.classify("find errors", 0.5).await;
        assert_eq!(result.intent, Intent::Unknown);
    }

    #[tokio::test]
    async fn test_fenced_answer_is_accepted() {
        let model = ScriptedModel::answering(
            "Sure:\n```json\n{\"intent\": \"document-search\", \"confidence\": 0.8}\n```",
        );
        let result = classifier(model).classify("vpn setup guide", 0.5).await;
        assert_eq!(result.intent, Intent::DocumentSearch);
    }

    #[test]
    fn test_clarification_mentions_what_was_asked() {
        assert!(clarification_for("the error page").contains("logs"));
        assert!(clarification_for("why did it crash").contains("analyse the logs"));
        assert!(clarification_for("onboarding guide").contains("documentation"));
        assert!(clarification_for("hello").contains("couldn't tell"));
    }
}
