//! Document search
//!
//! The router only needs [`DocumentSearch`]; [`DirectoryDocumentSearch`] is a
//! small keyword search over text files so the binary works without an
//! external search service.

use crate::config::DocumentConfig;
use crate::error::{Error, Result};
use crate::types::{DocumentHit, DocumentResults};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const SNIPPET_RADIUS: usize = 80;
const MIN_TERM_LEN: usize = 3;
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "about", "from", "that", "this", "what", "where", "how", "find",
    "search", "show", "me", "docs", "documentation", "page", "pages", "any", "are", "our",
];

/// Search over a document collection.
#[async_trait]
pub trait DocumentSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<DocumentResults>;
}

/// Query terms: lowercased words of at least three characters, stop words removed.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric() && c != '_' && c != '-')
        .map(str::to_lowercase)
        .filter(|t| t.chars().count() >= MIN_TERM_LEN && !STOP_WORDS.contains(&t.as_str()))
        .collect();
    let mut seen = HashSet::new();
    terms.retain(|t| seen.insert(t.clone()));
    terms
}

/// Keyword search over files below a directory.
#[derive(Debug, Clone)]
pub struct DirectoryDocumentSearch {
    root: PathBuf,
    patterns: Vec<String>,
    max_results: usize,
}

impl DirectoryDocumentSearch {
    pub fn new(root: impl Into<PathBuf>, patterns: Vec<String>, max_results: usize) -> Self {
        Self {
            root: root.into(),
            patterns,
            max_results,
        }
    }

    /// Build from `[documents]`; fails when no root is configured.
    pub fn from_config(config: &DocumentConfig) -> Result<Self> {
        let root = config
            .root
            .clone()
            .ok_or_else(|| Error::Config("documents.root is not configured".to_string()))?;
        Ok(Self::new(root, config.patterns.clone(), config.max_results))
    }

    fn discover(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Err(Error::source_unavailable(
                self.root.display().to_string(),
                "document directory does not exist",
            ));
        }

        let mut paths = Vec::new();
        for pattern in &self.patterns {
            let full_pattern = self.root.join(pattern);
            let entries = glob::glob(&full_pattern.to_string_lossy())
                .map_err(|e| Error::Config(format!("invalid document pattern {pattern:?}: {e}")))?;
            paths.extend(entries.flatten().filter(|p| p.is_file()));
        }
        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    fn score(&self, path: &Path, terms: &[String]) -> Option<DocumentHit> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Skipping unreadable document");
                return None;
            }
        };
        let lower = content.to_lowercase();

        let score = terms.iter().filter(|t| lower.contains(t.as_str())).count();
        if score == 0 {
            return None;
        }
        let first_hit = terms.iter().filter_map(|t| lower.find(t.as_str())).min();

        Some(DocumentHit {
            path: path.strip_prefix(&self.root).unwrap_or(path).to_path_buf(),
            title: title_of(path, &content),
            score,
            snippet: first_hit
                .map(|at| snippet(&lower, &content, at))
                .unwrap_or_default(),
        })
    }
}

/// First markdown heading, otherwise the file stem.
fn title_of(path: &Path, content: &str) -> String {
    content
        .lines()
        .find_map(|l| l.strip_prefix('#').map(|h| h.trim_start_matches('#').trim()))
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
}

/// Text around byte offset `at` of `lower`, cut from `content`.
///
/// Falls back to the start of the document when lowercasing changed byte lengths.
fn snippet(lower: &str, content: &str, at: usize) -> String {
    let at = if lower.len() == content.len() { at } else { 0 };
    let mut start = at.saturating_sub(SNIPPET_RADIUS);
    while !content.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (at + SNIPPET_RADIUS).min(content.len());
    while !content.is_char_boundary(end) {
        end += 1;
    }
    content[start..end].split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl DocumentSearch for DirectoryDocumentSearch {
    async fn search(&self, query: &str) -> Result<DocumentResults> {
        let terms = query_terms(query);
        let paths = self.discover()?;

        let mut hits: Vec<DocumentHit> = paths
            .iter()
            .filter_map(|path| self.score(path, &terms))
            .collect();
        hits.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.path.cmp(&b.path)));
        hits.truncate(self.max_results);

        tracing::debug!(
            documents = paths.len(),
            hits = hits.len(),
            terms = ?terms,
            "Document search complete"
        );
        Ok(DocumentResults {
            query: query.to_string(),
            hits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn docs() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("vpn.md"),
            "# VPN setup\n\nInstall the client, then import the VPN profile from the portal.\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("oncall.md"),
            "# On-call handbook\n\nEscalate database outages to the platform team.\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "vpn profile rotation happens monthly\n").unwrap();
        dir
    }

    fn search(dir: &TempDir) -> DirectoryDocumentSearch {
        DirectoryDocumentSearch::new(
            dir.path(),
            vec!["**/*.md".to_string(), "**/*.txt".to_string()],
            10,
        )
    }

    #[test]
    fn test_query_terms_drop_short_and_stop_words() {
        assert_eq!(
            query_terms("Find the VPN setup docs for me"),
            vec!["vpn".to_string(), "setup".to_string()]
        );
    }

    #[tokio::test]
    async fn test_repeated_terms_score_once() {
        assert_eq!(
            query_terms("vpn setup vpn"),
            vec!["vpn".to_string(), "setup".to_string()]
        );
        let dir = docs();
        let results = search(&dir).search("vpn setup vpn").await.unwrap();
        assert_eq!(results.hits[0].title, "VPN setup");
        assert_eq!(results.hits[0].score, 2);
    }

    #[tokio::test]
    async fn test_ranks_by_matched_terms() {
        let dir = docs();
        let results = search(&dir).search("vpn profile setup").await.unwrap();
        assert_eq!(results.hits.len(), 2);
        assert_eq!(results.hits[0].title, "VPN setup");
        assert_eq!(results.hits[0].score, 3);
        assert_eq!(results.hits[1].path, PathBuf::from("notes.txt"));
        assert!(results.hits[0].snippet.contains("VPN"));
    }

    #[tokio::test]
    async fn test_max_results_and_no_hits() {
        let dir = docs();
        let limited = DirectoryDocumentSearch::new(dir.path(), vec!["*.md".to_string(), "*.txt".to_string()], 1);
        assert_eq!(limited.search("vpn").await.unwrap().hits.len(), 1);
        assert!(search(&dir).search("kubernetes").await.unwrap().hits.is_empty());
    }

    #[tokio::test]
    async fn test_missing_root_is_an_error() {
        let search = DirectoryDocumentSearch::new("/definitely/not/here", vec!["*.md".to_string()], 5);
        assert!(search.search("vpn").await.is_err());
    }

    #[test]
    fn test_from_config_requires_root() {
        assert!(DirectoryDocumentSearch::from_config(&DocumentConfig::default()).is_err());
    }
}
