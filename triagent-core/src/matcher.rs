//! Pattern matcher: raw text -> [`LogLine`]
//!
//! A line is kept only if it carries a recognised severity marker. Timestamps
//! and cross-source references are pulled out of kept lines on the way.

use crate::config::PatternConfig;
use crate::error::{Error, Result};
use crate::types::{LogLine, LogReference, Severity};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

/// Default severity marker: whole-word ERROR, WARN/WARNING or INFO.
pub const DEFAULT_SEVERITY_PATTERN: &str = r"\b(?P<level>ERROR|WARN(?:ING)?|INFO)\b";

/// Default reference token: `ref=<source>` or `ref=<source>:<line>`.
pub const DEFAULT_REFERENCE_PATTERN: &str = r"\bref=(?P<source>[A-Za-z0-9_./-]+)(?::(?P<line>\d+))?";

// ISO-8601 with `T` or space, optional fraction and offset. Bracketed forms
// such as `[2024-03-01 10:00:00]` match too since the search is unanchored.
const TIMESTAMP_PATTERN: &str =
    r"(?P<ts>\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?)(?P<tz>Z|[+-]\d{2}:\d{2})?";

/// Classifies raw lines against a severity pattern set.
///
/// Holds only compiled patterns; safe to share across threads.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    severity: Regex,
    reference: Regex,
    timestamp: Regex,
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self {
            severity: Regex::new(DEFAULT_SEVERITY_PATTERN).expect("valid regex literal"),
            reference: Regex::new(DEFAULT_REFERENCE_PATTERN).expect("valid regex literal"),
            timestamp: Regex::new(TIMESTAMP_PATTERN).expect("valid regex literal"),
        }
    }
}

fn has_group(regex: &Regex, name: &str) -> bool {
    regex.capture_names().flatten().any(|n| n == name)
}

impl PatternMatcher {
    /// Compile a matcher from explicit patterns.
    ///
    /// `severity` needs a `level` group, `reference` a `source` group.
    pub fn new(severity: &str, reference: &str) -> Result<Self> {
        let severity = Regex::new(severity)?;
        if !has_group(&severity, "level") {
            return Err(Error::Config(
                "severity pattern must define a `level` capture group".to_string(),
            ));
        }
        let reference = Regex::new(reference)?;
        if !has_group(&reference, "source") {
            return Err(Error::Config(
                "reference pattern must define a `source` capture group".to_string(),
            ));
        }
        Ok(Self {
            severity,
            reference,
            ..Self::default()
        })
    }

    /// Compile a matcher from the `[analysis.patterns]` section.
    pub fn from_config(config: &PatternConfig) -> Result<Self> {
        Self::new(
            config.severity.as_deref().unwrap_or(DEFAULT_SEVERITY_PATTERN),
            config.reference.as_deref().unwrap_or(DEFAULT_REFERENCE_PATTERN),
        )
    }

    /// Match one raw line. Returns `None` for lines without a severity marker.
    pub fn match_line(&self, source_id: &str, sequence_number: u64, raw: &str) -> Option<LogLine> {
        let caps = self.severity.captures(raw)?;
        let level = caps.name("level")?;
        let severity = level.as_str().parse::<Severity>().ok()?;

        let message = raw[level.end()..]
            .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, ']' | ')' | '>' | ':' | '-' | '|'))
            .trim_end();
        let message = if message.is_empty() { raw.trim() } else { message };

        Some(LogLine {
            source_id: source_id.to_string(),
            sequence_number,
            timestamp: self.parse_timestamp(raw),
            severity,
            raw_text: raw.to_string(),
            message: message.to_string(),
            reference: self.parse_reference(raw),
        })
    }

    /// Match every line of a source; sequence numbers are 1-based line numbers.
    pub fn match_source(&self, source_id: &str, lines: &[String]) -> Vec<LogLine> {
        lines
            .iter()
            .enumerate()
            .filter_map(|(idx, raw)| self.match_line(source_id, idx as u64 + 1, raw))
            .collect()
    }

    fn parse_timestamp(&self, raw: &str) -> Option<DateTime<Utc>> {
        let caps = self.timestamp.captures(raw)?;
        let ts = caps.name("ts")?.as_str().replacen(' ', "T", 1);

        match caps.name("tz") {
            Some(tz) => DateTime::parse_from_rfc3339(&format!("{}{}", ts, tz.as_str()))
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            None => NaiveDateTime::parse_from_str(&ts, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| Utc.from_utc_datetime(&naive)),
        }
    }

    fn parse_reference(&self, raw: &str) -> Option<LogReference> {
        let caps = self.reference.captures(raw)?;
        let source_id = caps.name("source")?.as_str().trim_end_matches('.');
        if source_id.is_empty() {
            return None;
        }
        let line = caps.name("line").and_then(|m| m.as_str().parse::<u64>().ok());
        Some(LogReference {
            source_id: source_id.to_string(),
            line,
        })
    }
}
