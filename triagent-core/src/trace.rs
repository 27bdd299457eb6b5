//! Nested trace resolution
//!
//! Follows `ref=` pointers from an error line into other sources, one hop at
//! a time, building a [`TraceChain`]. Each hop picks the nearest preceding
//! ERROR in the referenced source:
//!
//! 1. reference carries a line: largest sequence number at or before it
//! 2. current line has a timestamp: latest timestamp at or before it, ties
//!    broken by the smallest sequence number
//! 3. otherwise, or when no ERROR in the source carries a timestamp: the last
//!    ERROR in the source
//!
//! Sources are compared by [`LogSource::canonical_id`], so `ref=db.log` and
//! `ref=db` name the same source. The walk stops at the depth limit, on a
//! missing reference, an unreadable source, a source already in the chain, or
//! when no candidate exists.
//! Stopping early is a valid outcome, recorded in [`TraceChain::stop`].

use crate::error::{Error, Result};
use crate::matcher::PatternMatcher;
use crate::source::LogSource;
use crate::types::{LogLine, LogReference, Severity, TraceChain, TraceStop};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Resolves trace chains against a [`LogSource`].
#[derive(Clone)]
pub struct TraceResolver {
    source: Arc<dyn LogSource>,
    matcher: Arc<PatternMatcher>,
}

impl TraceResolver {
    pub fn new(source: Arc<dyn LogSource>, matcher: Arc<PatternMatcher>) -> Self {
        Self { source, matcher }
    }

    /// Build the chain rooted at `root`, following at most `depth_limit` references.
    ///
    /// Only a zero `depth_limit` is an error; every other stop yields a
    /// (possibly partial) chain.
    pub fn resolve(&self, root: &LogLine, depth_limit: u32) -> Result<TraceChain> {
        if depth_limit == 0 {
            return Err(Error::Config(
                "depth_limit must be at least 1".to_string(),
            ));
        }

        let mut lines = vec![root.clone()];
        let mut current = root.clone();

        let stop = loop {
            let Some(reference) = current.reference.clone() else {
                break TraceStop::NoReference;
            };
            if lines.len() > depth_limit as usize {
                break TraceStop::DepthLimit;
            }
            let target = self.source.canonical_id(&reference.source_id);
            if lines
                .iter()
                .any(|l| self.source.canonical_id(&l.source_id) == target)
            {
                tracing::debug!(
                    source_id = %target,
                    "Reference would revisit a source already in the chain"
                );
                break TraceStop::Cycle;
            }

            let raw = match self.source.read(&target) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(
                        source_id = %target,
                        error = %e,
                        "Referenced source unavailable; truncating trace"
                    );
                    break TraceStop::SourceUnavailable;
                }
            };

            let candidates = self.matcher.match_source(&target, &raw);
            match select_upstream(&candidates, &reference, current.timestamp) {
                Some(next) => {
                    tracing::debug!(
                        from = %current.source_id,
                        to = %next.source_id,
                        sequence_number = next.sequence_number,
                        "Followed reference"
                    );
                    lines.push(next.clone());
                    current = next.clone();
                }
                None => break TraceStop::NoMatchingError,
            }
        };

        Ok(TraceChain { lines, stop })
    }
}

/// Pick the error a reference points at.
fn select_upstream<'a>(
    candidates: &'a [LogLine],
    reference: &LogReference,
    at: Option<DateTime<Utc>>,
) -> Option<&'a LogLine> {
    let errors: Vec<&LogLine> = candidates
        .iter()
        .filter(|l| l.severity == Severity::Error)
        .collect();

    if let Some(line) = reference.line {
        return errors
            .into_iter()
            .filter(|l| l.sequence_number <= line)
            .max_by_key(|l| l.sequence_number);
    }

    let any_timed = errors.iter().any(|l| l.timestamp.is_some());
    if let (Some(at), true) = (at, any_timed) {
        return errors
            .into_iter()
            .filter_map(|l| l.timestamp.filter(|ts| *ts <= at).map(|ts| (ts, l)))
            .min_by(|(a_ts, a), (b_ts, b)| {
                b_ts.cmp(a_ts)
                    .then(a.sequence_number.cmp(&b.sequence_number))
            })
            .map(|(_, l)| l);
    }

    errors.into_iter().max_by_key(|l| l.sequence_number)
}
