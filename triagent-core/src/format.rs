//! Plain-text rendering of responses.

use crate::types::{AnalysisReport, DocumentResults, Response, TraceChain, TraceStop};
use chrono::{DateTime, Utc};
use std::fmt::Write;

/// Format an optional timestamp, or `-` if missing.
pub fn format_timestamp_opt(ts: Option<DateTime<Utc>>) -> String {
    match ts {
        Some(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "-".to_string(),
    }
}

fn render_chain(out: &mut String, chain: &TraceChain) {
    for (hop, line) in chain.lines.iter().enumerate() {
        let indent = "  ".repeat(hop + 2);
        let _ = writeln!(
            out,
            "{indent}{}:{} {}",
            line.source_id, line.sequence_number, line.message
        );
    }
    if chain.stop != TraceStop::NoReference {
        let _ = writeln!(out, "    (trace stop: {})", chain.stop.as_str());
    }
}

/// Multi-line text view of an analysis report.
pub fn render_report(report: &AnalysisReport) -> String {
    let mut out = String::new();
    if let Some(window) = &report.time_window {
        let _ = writeln!(
            out,
            "Window: {} (since {})",
            window.label,
            format_timestamp_opt(Some(window.since))
        );
    }

    for incident in &report.incidents {
        let _ = writeln!(
            out,
            "[{}] {} x{}  {} .. {}",
            incident.severity,
            incident.id,
            incident.count(),
            format_timestamp_opt(incident.first_seen),
            format_timestamp_opt(incident.last_seen)
        );
        let _ = writeln!(out, "  {}", incident.signature);
        for chain in &incident.trace_chains {
            if chain.edges() > 0 || chain.stop != TraceStop::NoReference {
                render_chain(&mut out, chain);
            }
        }
        if let Some(suggestion) = report.suggestion_for(incident) {
            let _ = writeln!(out, "  -> {suggestion}");
        }
        out.push('\n');
    }

    for anomaly in &report.anomalies {
        let _ = writeln!(
            out,
            "Anomaly: {} {} line(s) in the hour from {} (z={:.2})",
            anomaly.count,
            anomaly.severity,
            format_timestamp_opt(Some(anomaly.hour)),
            anomaly.z_score
        );
    }
    if !report.stats.unavailable_sources.is_empty() {
        let _ = writeln!(
            out,
            "Unavailable sources: {}",
            report.stats.unavailable_sources.join(", ")
        );
    }
    out.push_str(report.summary.trim_end());
    out.push('\n');
    out
}

fn render_documents(results: &DocumentResults) -> String {
    if results.hits.is_empty() {
        return format!("No documents matched \"{}\".\n", results.query);
    }
    let mut out = String::new();
    for hit in &results.hits {
        let _ = writeln!(out, "{} ({}) score={}", hit.title, hit.path.display(), hit.score);
        if !hit.snippet.is_empty() {
            let _ = writeln!(out, "  {}", hit.snippet);
        }
    }
    out
}

/// Text view of any [`Response`].
pub fn render_response(response: &Response) -> String {
    match response {
        Response::Analysis(report) => render_report(report),
        Response::Documents(results) => render_documents(results),
        Response::Clarification(c) => format!("{}\n", c.question),
        Response::Failure(f) => match f.handler {
            Some(handler) => format!("error ({}, {}): {}\n", f.kind.as_str(), handler, f.message),
            None => format!("error ({}): {}\n", f.kind.as_str(), f.message),
        },
    }
}
