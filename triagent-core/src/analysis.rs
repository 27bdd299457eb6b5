//! Log-analysis pipeline
//!
//! Composes the pieces behind a log-analysis request:
//!
//! ```text
//! LogSource -> PatternMatcher -> time window -> ErrorAggregator -> SolutionSuggester
//!                                                     |
//!                                               TraceResolver
//! ```
//!
//! Unreadable sources are skipped and reported in the stats; only a failure to
//! list sources at all fails the run. Hourly per-severity line counts are
//! checked for spikes and reported as [`Anomaly`] entries.

use crate::aggregate::ErrorAggregator;
use crate::config::RequestOptions;
use crate::error::Result;
use crate::matcher::PatternMatcher;
use crate::source::LogSource;
use crate::suggest::SolutionSuggester;
use crate::trace::TraceResolver;
use crate::types::{
    AnalysisReport, AnalysisStats, Anomaly, Incident, LogLine, Severity, TimeRange, TimeWindow,
};
use chrono::{DateTime, Duration, DurationRound, Utc};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;

const SUMMARY_TOP_ISSUES: usize = 3;

/// Hours whose |z-score| exceeds this are anomalies.
const ANOMALY_Z_THRESHOLD: f64 = 2.0;

/// Derive a relative time window from phrases such as "last week".
pub fn parse_time_window(query: &str, now: DateTime<Utc>) -> Option<TimeWindow> {
    let q = query.to_lowercase();
    let spans: [(&[&str], Duration); 4] = [
        (&["last hour", "past hour"], Duration::hours(1)),
        (
            &["last day", "past day", "last 24 hours", "today", "yesterday"],
            Duration::days(1),
        ),
        (&["last week", "past week", "this week"], Duration::weeks(1)),
        (&["last month", "past month", "this month"], Duration::days(30)),
    ];

    spans.iter().find_map(|(phrases, span)| {
        phrases.iter().find(|p| q.contains(*p)).map(|phrase| TimeWindow {
            label: phrase.to_string(),
            since: now - *span,
        })
    })
}

/// Whether the request asks about warnings as well as errors.
fn wants_warnings(query: &str) -> bool {
    query.to_lowercase().contains("warn")
}

/// Runs the log-analysis handler.
#[derive(Clone)]
pub struct LogAnalysisPipeline {
    source: Arc<dyn LogSource>,
    matcher: Arc<PatternMatcher>,
    severities: Vec<Severity>,
    suggester: Arc<SolutionSuggester>,
    fixed_now: Option<DateTime<Utc>>,
}

impl LogAnalysisPipeline {
    pub fn new(
        source: Arc<dyn LogSource>,
        matcher: Arc<PatternMatcher>,
        suggester: Arc<SolutionSuggester>,
    ) -> Self {
        Self {
            source,
            matcher,
            severities: vec![Severity::Error],
            suggester,
            fixed_now: None,
        }
    }

    /// Severities that open incidents before any focus from the query.
    pub fn with_severities(mut self, severities: Vec<Severity>) -> Self {
        self.severities = severities;
        self
    }

    /// Pin the clock used for relative time windows.
    pub fn with_clock(mut self, now: DateTime<Utc>) -> Self {
        self.fixed_now = Some(now);
        self
    }

    fn now(&self) -> DateTime<Utc> {
        self.fixed_now.unwrap_or_else(Utc::now)
    }

    fn incident_severities(&self, query: &str) -> Vec<Severity> {
        let mut severities = self.severities.clone();
        if wants_warnings(query) && !severities.contains(&Severity::Warn) {
            severities.push(Severity::Warn);
        }
        severities
    }

    /// Analyse every source for `query`.
    pub async fn run(&self, query: &str, options: &RequestOptions) -> Result<AnalysisReport> {
        options.validate()?;

        let source_ids = self.source.list_sources()?;
        let window = parse_time_window(query, self.now());

        let mut stats = AnalysisStats::default();
        let mut lines: Vec<LogLine> = Vec::new();

        for source_id in &source_ids {
            let raw = match self.source.read(source_id) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(source_id = %source_id, error = %e, "Skipping unreadable source");
                    stats.unavailable_sources.push(source_id.clone());
                    continue;
                }
            };
            stats.sources_scanned += 1;
            stats.total_lines += raw.len();

            let matched = self.matcher.match_source(source_id, &raw);
            lines.extend(matched.into_iter().filter(|line| in_window(line, window.as_ref())));
        }

        record_line_stats(&mut stats, &lines);
        let anomalies = detect_anomalies(&lines);
        if !anomalies.is_empty() {
            tracing::info!(count = anomalies.len(), "Detected hourly volume anomalies");
        }
        tracing::info!(
            sources = stats.sources_scanned,
            unavailable = stats.unavailable_sources.len(),
            matched = stats.matched_lines,
            window = window.as_ref().map(|w| w.label.as_str()).unwrap_or("all"),
            "Scanned log sources"
        );

        let aggregator = ErrorAggregator::new(Arc::clone(&options.normalizer))
            .with_severities(self.incident_severities(query));
        let resolver = TraceResolver::new(Arc::clone(&self.source), Arc::clone(&self.matcher));
        let incidents = aggregator.aggregate(&lines, &resolver, options.depth_limit)?;

        let answers = join_all(incidents.iter().map(|i| self.suggester.suggest(i))).await;
        let suggestions: BTreeMap<String, String> = incidents
            .iter()
            .map(|i| i.signature.clone())
            .zip(answers)
            .collect();

        let summary = summarize(&incidents, &suggestions, &stats);
        Ok(AnalysisReport {
            incidents,
            suggestions,
            stats,
            anomalies,
            time_window: window,
            summary,
        })
    }
}

fn in_window(line: &LogLine, window: Option<&TimeWindow>) -> bool {
    match (window, line.timestamp) {
        (Some(window), Some(ts)) => ts >= window.since,
        _ => true,
    }
}

fn record_line_stats(stats: &mut AnalysisStats, lines: &[LogLine]) {
    stats.matched_lines = lines.len();
    for line in lines {
        *stats.severity_counts.entry(line.severity).or_insert(0) += 1;
    }

    let mut stamps = lines.iter().filter_map(|l| l.timestamp);
    if let Some(first) = stamps.next() {
        let (start, end) = stamps.fold((first, first), |(lo, hi), ts| (lo.min(ts), hi.max(ts)));
        stats.time_range = Some(TimeRange { start, end });
    }
}

/// Flag hours whose line count for a severity is more than two standard
/// deviations from that severity's mean hourly count.
///
/// Only hours in which the severity occurs are counted, and a severity needs
/// at least two such hours. Untimed lines are ignored.
pub fn detect_anomalies(lines: &[LogLine]) -> Vec<Anomaly> {
    let mut hourly: BTreeMap<Severity, BTreeMap<DateTime<Utc>, usize>> = BTreeMap::new();
    for line in lines {
        let Some(hour) = line
            .timestamp
            .and_then(|ts| ts.duration_trunc(Duration::hours(1)).ok())
        else {
            continue;
        };
        *hourly
            .entry(line.severity)
            .or_default()
            .entry(hour)
            .or_insert(0) += 1;
    }

    let mut anomalies = Vec::new();
    for (severity, counts) in &hourly {
        if counts.len() < 2 {
            continue;
        }
        let n = counts.len() as f64;
        let mean = counts.values().map(|&c| c as f64).sum::<f64>() / n;
        let variance = counts
            .values()
            .map(|&c| (c as f64 - mean).powi(2))
            .sum::<f64>()
            / n;
        let std_dev = variance.sqrt();
        if std_dev == 0.0 {
            continue;
        }

        for (hour, &count) in counts {
            let z_score = (count as f64 - mean) / std_dev;
            if z_score.abs() > ANOMALY_Z_THRESHOLD {
                anomalies.push(Anomaly {
                    hour: *hour,
                    severity: *severity,
                    count,
                    z_score,
                });
            }
        }
    }

    anomalies.sort_by(|a, b| a.hour.cmp(&b.hour).then(a.severity.cmp(&b.severity)));
    anomalies
}

/// Human-readable digest: counts plus the most frequent issues.
fn summarize(
    incidents: &[Incident],
    suggestions: &BTreeMap<String, String>,
    stats: &AnalysisStats,
) -> String {
    if incidents.is_empty() {
        return format!(
            "No incidents found in {} source(s) ({} matched lines).",
            stats.sources_scanned, stats.matched_lines
        );
    }

    let mut summary = format!(
        "{} incident(s) across {} source(s).\n",
        incidents.len(),
        stats.sources_scanned
    );
    for (severity, count) in stats.severity_counts.iter().rev() {
        summary.push_str(&format!("- {severity}: {count} line(s)\n"));
    }

    let mut top: Vec<&Incident> = incidents.iter().collect();
    top.sort_by(|a, b| b.count().cmp(&a.count()));

    summary.push_str("\nTop issues:\n");
    for incident in top.into_iter().take(SUMMARY_TOP_ISSUES) {
        let message = incident
            .representative()
            .map(|l| l.message.as_str())
            .unwrap_or(incident.signature.as_str());
        summary.push_str(&format!("- {} (x{})\n", message, incident.count()));
        if let Some(suggestion) = suggestions.get(&incident.signature) {
            summary.push_str(&format!("  suggestion: {suggestion}\n"));
        }
    }
    summary
}
