//! Core domain types for triagent
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Source** | A named log (usually one file) the reader can open |
//! | **LogLine** | One line of a source that carried a recognised severity marker |
//! | **Reference** | A `ref=<source>[:<line>]` pointer from one log line into another source |
//! | **TraceChain** | The causal path obtained by following references from an error |
//! | **Signature** | Error text with volatile tokens stripped, used as the dedup key |
//! | **Incident** | All occurrences of one signature within an analysis run |
//! | **Intent** | Which handler should own a request |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

// ============================================
// Log lines
// ============================================

/// Severity recognised by the pattern matcher.
///
/// Ordered so that `Info < Warn < Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ERROR" => Ok(Severity::Error),
            "WARN" | "WARNING" => Ok(Severity::Warn),
            "INFO" => Ok(Severity::Info),
            _ => Err(format!("unknown severity: {}", s)),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pointer from a log line into another source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogReference {
    /// Referenced source id
    pub source_id: String,
    /// Optional line in the referenced source the pointer was taken at
    pub line: Option<u64>,
}

/// A matched log line. Immutable once read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    /// Source the line was read from
    pub source_id: String,
    /// 1-based line number within the source
    pub sequence_number: u64,
    /// Parsed timestamp, if the line carried one
    pub timestamp: Option<DateTime<Utc>>,
    pub severity: Severity,
    /// The line exactly as read
    pub raw_text: String,
    /// Text following the severity marker
    pub message: String,
    /// Cross-reference to another source
    pub reference: Option<LogReference>,
}

impl LogLine {
    /// Referenced source id, if any.
    pub fn reference_id(&self) -> Option<&str> {
        self.reference.as_ref().map(|r| r.source_id.as_str())
    }
}

// ============================================
// Traces
// ============================================

/// Why a trace walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStop {
    /// The last line carries no reference
    NoReference,
    /// The configured number of edges was traversed
    DepthLimit,
    /// The referenced source could not be read
    SourceUnavailable,
    /// The referenced source is already part of the chain
    Cycle,
    /// The referenced source has no error on or before the reference point
    NoMatchingError,
}

impl TraceStop {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceStop::NoReference => "no_reference",
            TraceStop::DepthLimit => "depth_limit",
            TraceStop::SourceUnavailable => "source_unavailable",
            TraceStop::Cycle => "cycle",
            TraceStop::NoMatchingError => "no_matching_error",
        }
    }
}

/// Causal path from an originating error through referenced sources.
///
/// Lines are in reference order, not timestamp order. No source appears twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceChain {
    pub lines: Vec<LogLine>,
    pub stop: TraceStop,
}

impl TraceChain {
    /// The originating line.
    pub fn root(&self) -> Option<&LogLine> {
        self.lines.first()
    }

    /// Number of lines in the chain, root included.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of references followed.
    pub fn edges(&self) -> usize {
        self.lines.len().saturating_sub(1)
    }

    /// Source ids in chain order.
    pub fn sources(&self) -> Vec<&str> {
        self.lines.iter().map(|l| l.source_id.as_str()).collect()
    }

    pub fn contains_source(&self, source_id: &str) -> bool {
        self.lines.iter().any(|l| l.source_id == source_id)
    }
}

// ============================================
// Incidents
// ============================================

/// All occurrences of one error signature in an analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    /// Short stable id derived from the signature
    pub id: String,
    pub signature: String,
    /// Severity of the first occurrence
    pub severity: Severity,
    /// Occurrences in input order
    pub occurrences: Vec<LogLine>,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    /// Resolved once, from the first occurrence
    pub trace_chains: Vec<TraceChain>,
}

impl Incident {
    pub fn count(&self) -> usize {
        self.occurrences.len()
    }

    /// The occurrence handed to suggesters as context.
    pub fn representative(&self) -> Option<&LogLine> {
        self.occurrences.first()
    }
}

// ============================================
// Classification
// ============================================

/// Which handler should own a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    DocumentSearch,
    LogAnalysis,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::DocumentSearch => "document_search",
            Intent::LogAnalysis => "log_analysis",
            Intent::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match label.as_str() {
            "document_search" => Ok(Intent::DocumentSearch),
            "log_analysis" => Ok(Intent::LogAnalysis),
            "unknown" => Ok(Intent::Unknown),
            _ => Err(format!("unknown intent: {}", s)),
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of triage for one request. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub intent: Intent,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
    pub raw_query: String,
}

impl ClassificationResult {
    pub fn unknown(raw_query: impl Into<String>, confidence: f64) -> Self {
        Self {
            intent: Intent::Unknown,
            confidence,
            raw_query: raw_query.into(),
        }
    }
}

// ============================================
// Analysis reports
// ============================================

/// Span between the earliest and latest timestamp seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Relative time filter derived from the request ("last week").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Phrase the window was derived from
    pub label: String,
    /// Lines older than this are dropped
    pub since: DateTime<Utc>,
}

/// Counters collected while scanning sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub sources_scanned: usize,
    pub unavailable_sources: Vec<String>,
    pub total_lines: usize,
    pub matched_lines: usize,
    pub severity_counts: BTreeMap<Severity, usize>,
    pub time_range: Option<TimeRange>,
}

/// An hour whose line count for one severity stands out from that
/// severity's other hours (|z-score| above the detection threshold).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// Start of the hour
    pub hour: DateTime<Utc>,
    pub severity: Severity,
    pub count: usize,
    pub z_score: f64,
}

/// Final output of the log-analysis pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Ordered by first_seen ascending
    pub incidents: Vec<Incident>,
    /// Incident signature -> suggestion text
    pub suggestions: BTreeMap<String, String>,
    pub stats: AnalysisStats,
    /// Hourly volume spikes, ordered by hour then severity
    #[serde(default)]
    pub anomalies: Vec<Anomaly>,
    pub time_window: Option<TimeWindow>,
    pub summary: String,
}

impl AnalysisReport {
    pub fn suggestion_for(&self, incident: &Incident) -> Option<&str> {
        self.suggestions.get(&incident.signature).map(String::as_str)
    }
}

// ============================================
// Documents
// ============================================

/// One document matching a search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentHit {
    pub path: PathBuf,
    pub title: String,
    /// Number of query terms found
    pub score: usize,
    pub snippet: String,
}

/// Results of a document search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentResults {
    pub query: String,
    pub hits: Vec<DocumentHit>,
}

// ============================================
// Responses
// ============================================

/// Returned when triage could not pick a handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarificationRequest {
    pub query: String,
    pub question: String,
    pub confidence: f64,
}

/// Category of a structured failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Request options were rejected before any work was done
    InvalidConfiguration,
    /// The chosen handler returned an error or panicked
    HandlerFailure,
    /// The caller cancelled the request
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InvalidConfiguration => "invalid_configuration",
            FailureKind::HandlerFailure => "handler_failure",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

/// Structured failure handed back instead of an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureResponse {
    pub kind: FailureKind,
    /// Handler that failed, when one had been chosen
    pub handler: Option<Intent>,
    pub message: String,
}

/// Everything `handle_request` can return.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Analysis(AnalysisReport),
    Documents(DocumentResults),
    Clarification(ClarificationRequest),
    Failure(FailureResponse),
}

impl Response {
    pub fn failure(kind: FailureKind, handler: Option<Intent>, message: impl Into<String>) -> Self {
        Response::Failure(FailureResponse {
            kind,
            handler,
            message: message.into(),
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Response::Analysis(_) => "analysis",
            Response::Documents(_) => "documents",
            Response::Clarification(_) => "clarification",
            Response::Failure(_) => "failure",
        }
    }

    pub fn as_report(&self) -> Option<&AnalysisReport> {
        match self {
            Response::Analysis(report) => Some(report),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Response::Failure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_parse() {
        assert_eq!("ERROR".parse::<Severity>(), Ok(Severity::Error));
        assert_eq!("warning".parse::<Severity>(), Ok(Severity::Warn));
        assert!("DEBUG".parse::<Severity>().is_err());
        assert!(Severity::Error > Severity::Warn);
    }

    #[test]
    fn test_intent_parse_accepts_label_variants() {
        assert_eq!("log_analysis".parse::<Intent>(), Ok(Intent::LogAnalysis));
        assert_eq!("LOG_ANALYSIS".parse::<Intent>(), Ok(Intent::LogAnalysis));
        assert_eq!("document-search".parse::<Intent>(), Ok(Intent::DocumentSearch));
        assert!("weather".parse::<Intent>().is_err());
    }

    #[test]
    fn test_trace_chain_edges() {
        let line = LogLine {
            source_id: "a".to_string(),
            sequence_number: 1,
            timestamp: None,
            severity: Severity::Error,
            raw_text: "ERROR boom".to_string(),
            message: "boom".to_string(),
            reference: None,
        };
        let chain = TraceChain {
            lines: vec![line],
            stop: TraceStop::NoReference,
        };
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.edges(), 0);
        assert!(chain.contains_source("a"));
    }

    #[test]
    fn test_response_serializes_with_type_tag() {
        let response = Response::failure(FailureKind::Cancelled, None, "stopped");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["type"], "failure");
        assert_eq!(json["kind"], "cancelled");
    }
}
