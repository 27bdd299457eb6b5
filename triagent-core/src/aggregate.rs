//! Error aggregation
//!
//! Groups matched lines into [`Incident`]s keyed by signature. The trace
//! resolver runs once per signature, on its first occurrence; repeats only
//! extend the occurrence list and the seen window.

use crate::error::{Error, Result};
use crate::normalize::Normalizer;
use crate::trace::TraceResolver;
use crate::types::{Incident, LogLine, Severity};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

/// Short stable id for a signature (first 12 hex chars of its SHA-256).
pub fn incident_id(signature: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(signature.as_bytes());
    let mut id = hex::encode(hasher.finalize());
    id.truncate(12);
    id
}

/// Groups log lines into deduplicated incidents.
#[derive(Debug, Clone)]
pub struct ErrorAggregator {
    normalizer: Arc<Normalizer>,
    severities: Vec<Severity>,
}

impl ErrorAggregator {
    /// Aggregator opening incidents for ERROR lines only.
    pub fn new(normalizer: Arc<Normalizer>) -> Self {
        Self {
            normalizer,
            severities: vec![Severity::Error],
        }
    }

    /// Replace the set of severities that open incidents.
    pub fn with_severities(mut self, severities: Vec<Severity>) -> Self {
        self.severities = severities;
        self
    }

    pub fn severities(&self) -> &[Severity] {
        &self.severities
    }

    /// Signature of a line: its raw text with volatile tokens stripped.
    pub fn signature(&self, line: &LogLine) -> String {
        self.normalizer.normalize(&line.raw_text)
    }

    /// Group `lines` into incidents ordered by first_seen ascending.
    ///
    /// Incidents without any timestamp sort after timestamped ones; ties keep
    /// first-appearance order.
    pub fn aggregate(
        &self,
        lines: &[LogLine],
        resolver: &TraceResolver,
        depth_limit: u32,
    ) -> Result<Vec<Incident>> {
        if depth_limit == 0 {
            return Err(Error::Config(
                "depth_limit must be at least 1".to_string(),
            ));
        }

        let mut incidents: Vec<Incident> = Vec::new();
        let mut by_signature: HashMap<String, usize> = HashMap::new();

        for line in lines.iter().filter(|l| self.severities.contains(&l.severity)) {
            let signature = self.signature(line);

            if let Some(&idx) = by_signature.get(&signature) {
                let incident = &mut incidents[idx];
                incident.occurrences.push(line.clone());
                if let Some(ts) = line.timestamp {
                    incident.first_seen = Some(incident.first_seen.map_or(ts, |s| s.min(ts)));
                    incident.last_seen = Some(incident.last_seen.map_or(ts, |s| s.max(ts)));
                }
                continue;
            }

            let chain = resolver.resolve(line, depth_limit)?;
            tracing::debug!(
                signature = %signature,
                source_id = %line.source_id,
                trace_len = chain.len(),
                "New incident"
            );

            by_signature.insert(signature.clone(), incidents.len());
            incidents.push(Incident {
                id: incident_id(&signature),
                signature,
                severity: line.severity,
                occurrences: vec![line.clone()],
                first_seen: line.timestamp,
                last_seen: line.timestamp,
                trace_chains: vec![chain],
            });
        }

        // Stable: equal keys keep first-appearance order.
        incidents.sort_by_key(|i| (i.first_seen.is_none(), i.first_seen));
        Ok(incidents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::PatternMatcher;
    use crate::source::MemorySource;

    fn setup(source: MemorySource) -> (ErrorAggregator, TraceResolver, PatternMatcher) {
        let matcher = PatternMatcher::default();
        let resolver = TraceResolver::new(Arc::new(source), Arc::new(matcher.clone()));
        let aggregator = ErrorAggregator::new(Arc::new(Normalizer::default()));
        (aggregator, resolver, matcher)
    }

    fn lines(matcher: &PatternMatcher, source_id: &str, raw: &[&str]) -> Vec<LogLine> {
        let raw: Vec<String> = raw.iter().map(|s| s.to_string()).collect();
        matcher.match_source(source_id, &raw)
    }

    #[test]
    fn test_single_error_single_incident() {
        let (aggregator, resolver, matcher) = setup(MemorySource::new());
        let input = lines(&matcher, "A", &["[ERROR] disk full (src=A)", "[INFO] retry ok"]);

        let incidents = aggregator.aggregate(&input, &resolver, 5).unwrap();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].count(), 1);
        assert_eq!(incidents[0].trace_chains.len(), 1);
        assert_eq!(incidents[0].trace_chains[0].len(), 1);
        assert_eq!(incidents[0].signature, "[ERROR] disk full (src=A)");
    }

    #[test]
    fn test_volatile_tokens_collapse() {
        let (aggregator, resolver, matcher) = setup(MemorySource::new());
        let input = lines(
            &matcher,
            "app",
            &[
                "2024-03-01 10:00:00 ERROR timeout request_id=1",
                "2024-03-01 09:00:00 ERROR timeout request_id=22",
                "2024-03-01 11:00:00 ERROR timeout request_id=333",
            ],
        );

        let incidents = aggregator.aggregate(&input, &resolver, 5).unwrap();
        assert_eq!(incidents.len(), 1);
        let incident = &incidents[0];
        assert_eq!(incident.count(), 3);
        assert_eq!(incident.first_seen.unwrap().to_rfc3339(), "2024-03-01T09:00:00+00:00");
        assert_eq!(incident.last_seen.unwrap().to_rfc3339(), "2024-03-01T11:00:00+00:00");
        assert_eq!(incident.id, incident_id(&incident.signature));
    }

    #[test]
    fn test_orders_by_first_seen() {
        let (aggregator, resolver, matcher) = setup(MemorySource::new());
        let input = lines(
            &matcher,
            "app",
            &[
                "ERROR untimed failure",
                "2024-03-01 12:00:00 ERROR late failure",
                "2024-03-01 08:00:00 ERROR early failure",
            ],
        );

        let incidents = aggregator.aggregate(&input, &resolver, 5).unwrap();
        let messages: Vec<_> = incidents
            .iter()
            .map(|i| i.occurrences[0].message.as_str())
            .collect();
        assert_eq!(messages, vec!["early failure", "late failure", "untimed failure"]);
    }

    #[test]
    fn test_resolves_trace_once_per_signature() {
        let source = MemorySource::new().with_source("db", ["ERROR lock timeout"]);
        let (aggregator, resolver, matcher) = setup(source);
        let input = lines(
            &matcher,
            "api",
            &["ERROR query failed ref=db", "ERROR query failed ref=db"],
        );

        let incidents = aggregator.aggregate(&input, &resolver, 5).unwrap();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].count(), 2);
        assert_eq!(incidents[0].trace_chains.len(), 1);
        assert_eq!(incidents[0].trace_chains[0].sources(), vec!["api", "db"]);
    }

    #[test]
    fn test_aggregation_is_idempotent() {
        let (aggregator, resolver, matcher) = setup(MemorySource::new());
        let input = lines(
            &matcher,
            "app",
            &["ERROR a 1", "ERROR b", "ERROR a 2", "WARN c", "ERROR b"],
        );

        let first = aggregator.aggregate(&input, &resolver, 3).unwrap();
        let second = aggregator.aggregate(&input, &resolver, 3).unwrap();
        let summary = |incidents: &[Incident]| -> Vec<(String, usize)> {
            incidents.iter().map(|i| (i.signature.clone(), i.count())).collect()
        };
        assert_eq!(summary(&first), summary(&second));
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_warn_included_when_requested() {
        let (aggregator, resolver, matcher) = setup(MemorySource::new());
        let aggregator = aggregator.with_severities(vec![Severity::Error, Severity::Warn]);
        let input = lines(&matcher, "app", &["WARN slow", "ERROR broken", "INFO ok"]);
        let incidents = aggregator.aggregate(&input, &resolver, 1).unwrap();
        assert_eq!(incidents.len(), 2);
    }

    #[test]
    fn test_zero_depth_fails_fast() {
        let (aggregator, resolver, _) = setup(MemorySource::new());
        assert!(aggregator.aggregate(&[], &resolver, 0).is_err());
    }
}
