//! Solution suggestions for incidents
//!
//! A configured rule table is consulted first; only on a miss is the language
//! model asked. Suggesting never fails: every collaborator problem collapses
//! into [`FALLBACK_SUGGESTION`].

use crate::llm::{with_timeout, CompletionRequest, LanguageModel};
use crate::types::{Incident, TraceChain};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Text returned when no rule matches and the model gives no usable answer.
pub const FALLBACK_SUGGESTION: &str = "no automated suggestion available";

const MAX_CONTEXT_CHARS: usize = 4_000;
const SYSTEM_PROMPT: &str = "You are an on-call assistant. Given an error from application logs and the chain of upstream errors it references, reply with one short, concrete remediation step. Plain text, no preamble.";

/// How a rule's pattern is compared against an incident signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleMatch {
    #[default]
    Exact,
    Prefix,
}

/// One `[[suggestions.rules]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct SuggestionRule {
    pub pattern: String,
    pub suggestion: String,
    #[serde(default)]
    pub r#match: RuleMatch,
}

impl SuggestionRule {
    pub fn exact(pattern: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            suggestion: suggestion.into(),
            r#match: RuleMatch::Exact,
        }
    }

    pub fn prefix(pattern: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            suggestion: suggestion.into(),
            r#match: RuleMatch::Prefix,
        }
    }
}

/// Produces one suggestion per incident.
#[derive(Clone)]
pub struct SolutionSuggester {
    rules: Vec<SuggestionRule>,
    llm: Option<Arc<dyn LanguageModel>>,
    timeout: Duration,
}

impl SolutionSuggester {
    pub fn new(
        rules: Vec<SuggestionRule>,
        llm: Option<Arc<dyn LanguageModel>>,
        timeout: Duration,
    ) -> Self {
        Self {
            rules,
            llm,
            timeout,
        }
    }

    /// Suggester backed by the rule table only.
    pub fn rules_only(rules: Vec<SuggestionRule>) -> Self {
        Self::new(rules, None, Duration::from_secs(1))
    }

    /// Rule lookup: an exact match wins, otherwise the longest matching prefix.
    pub fn lookup(&self, signature: &str) -> Option<&str> {
        if let Some(rule) = self
            .rules
            .iter()
            .find(|r| r.r#match == RuleMatch::Exact && r.pattern == signature)
        {
            return Some(&rule.suggestion);
        }
        self.rules
            .iter()
            .filter(|r| r.r#match == RuleMatch::Prefix && signature.starts_with(&r.pattern))
            .max_by_key(|r| r.pattern.len())
            .map(|r| r.suggestion.as_str())
    }

    /// Suggest a remediation for `incident`. Never fails.
    pub async fn suggest(&self, incident: &Incident) -> String {
        if let Some(hit) = self.lookup(&incident.signature) {
            tracing::debug!(incident = %incident.id, "Suggestion from rule table");
            return hit.to_string();
        }

        let Some(llm) = &self.llm else {
            return FALLBACK_SUGGESTION.to_string();
        };

        let request = CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: build_prompt(incident),
            schema: None,
        };
        match with_timeout("suggestion", self.timeout, llm.complete(&request)).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                tracing::warn!(incident = %incident.id, "Model returned an empty suggestion");
                FALLBACK_SUGGESTION.to_string()
            }
            Err(e) => {
                tracing::warn!(incident = %incident.id, error = %e, "Suggestion failed");
                FALLBACK_SUGGESTION.to_string()
            }
        }
    }
}

fn push_chain(out: &mut String, chain: &TraceChain) {
    for (hop, line) in chain.lines.iter().enumerate() {
        out.push_str(&format!(
            "  {hop}. [{}:{}] {}\n",
            line.source_id,
            line.sequence_number,
            line.raw_text.trim()
        ));
    }
    out.push_str(&format!("  (trace ended: {})\n", chain.stop.as_str()));
}

fn build_prompt(incident: &Incident) -> String {
    let mut prompt = format!(
        "Signature: {}\nSeverity: {}\nOccurrences: {}\n",
        incident.signature,
        incident.severity,
        incident.count()
    );
    if let Some(line) = incident.representative() {
        prompt.push_str(&format!(
            "Representative line ({}:{}): {}\n",
            line.source_id,
            line.sequence_number,
            line.raw_text.trim()
        ));
    }
    if !incident.trace_chains.is_empty() {
        prompt.push_str("Trace:\n");
        for chain in &incident.trace_chains {
            push_chain(&mut prompt, chain);
        }
    }
    if prompt.len() > MAX_CONTEXT_CHARS {
        let mut cut = MAX_CONTEXT_CHARS;
        while !prompt.is_char_boundary(cut) {
            cut -= 1;
        }
        prompt.truncate(cut);
        prompt.push_str("\n...[truncated]");
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::types::{LogLine, Severity, TraceStop};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockModel {
        response: String,
        calls: AtomicUsize,
    }

    impl MockModel {
        fn new(response: &str) -> Self {
            Self {
                response: response.to_string(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for MockModel {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(request.prompt.contains("Signature:"));
            Ok(self.response.clone())
        }
    }

    struct SlowModel;

    #[async_trait]
    impl LanguageModel for SlowModel {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok("too late".to_string())
        }
    }

    struct FailingModel;

    #[async_trait]
    impl LanguageModel for FailingModel {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
            Err(Error::Llm("connection refused".to_string()))
        }
    }

    fn incident(signature: &str) -> Incident {
        let line = LogLine {
            source_id: "app".to_string(),
            sequence_number: 3,
            timestamp: None,
            severity: Severity::Error,
            raw_text: signature.to_string(),
            message: signature.to_string(),
            reference: None,
        };
        Incident {
            id: "abc".to_string(),
            signature: signature.to_string(),
            severity: Severity::Error,
            occurrences: vec![line.clone()],
            first_seen: None,
            last_seen: None,
            trace_chains: vec![TraceChain {
                lines: vec![line],
                stop: TraceStop::NoReference,
            }],
        }
    }

    #[test]
    fn test_exact_rule_beats_prefix() {
        let suggester = SolutionSuggester::rules_only(vec![
            SuggestionRule::prefix("ERROR disk", "check disks"),
            SuggestionRule::exact("ERROR disk full", "free space"),
        ]);
        assert_eq!(suggester.lookup("ERROR disk full"), Some("free space"));
        assert_eq!(suggester.lookup("ERROR disk slow"), Some("check disks"));
        assert_eq!(suggester.lookup("ERROR network"), None);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let suggester = SolutionSuggester::rules_only(vec![
            SuggestionRule::prefix("ERROR", "generic"),
            SuggestionRule::prefix("ERROR db", "database"),
        ]);
        assert_eq!(suggester.lookup("ERROR db lock"), Some("database"));
    }

    #[tokio::test]
    async fn test_rule_hit_skips_model() {
        let model = Arc::new(MockModel::new("model says"));
        let suggester = SolutionSuggester::new(
            vec![SuggestionRule::exact("ERROR disk full", "free space")],
            Some(model.clone()),
            Duration::from_secs(1),
        );
        assert_eq!(suggester.suggest(&incident("ERROR disk full")).await, "free space");
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_model_answer_is_trimmed() {
        let model = Arc::new(MockModel::new("  restart the worker\n"));
        let suggester = SolutionSuggester::new(vec![], Some(model.clone()), Duration::from_secs(1));
        assert_eq!(suggester.suggest(&incident("ERROR x")).await, "restart the worker");
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fallbacks() {
        let no_model = SolutionSuggester::rules_only(vec![]);
        assert_eq!(no_model.suggest(&incident("ERROR x")).await, FALLBACK_SUGGESTION);

        let empty = SolutionSuggester::new(
            vec![],
            Some(Arc::new(MockModel::new("   "))),
            Duration::from_secs(1),
        );
        assert_eq!(empty.suggest(&incident("ERROR x")).await, FALLBACK_SUGGESTION);

        let failing = SolutionSuggester::new(vec![], Some(Arc::new(FailingModel)), Duration::from_secs(1));
        assert_eq!(failing.suggest(&incident("ERROR x")).await, FALLBACK_SUGGESTION);
    }

    #[tokio::test]
    async fn test_timeout_yields_fallback() {
        let slow = SolutionSuggester::new(vec![], Some(Arc::new(SlowModel)), Duration::from_millis(20));
        assert_eq!(slow.suggest(&incident("ERROR x")).await, FALLBACK_SUGGESTION);
    }

    #[test]
    fn test_prompt_carries_trace() {
        let prompt = build_prompt(&incident("ERROR lock timeout"));
        assert!(prompt.contains("Representative line (app:3)"));
        assert!(prompt.contains("trace ended: no_reference"));
    }
}
