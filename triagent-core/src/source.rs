//! Log source readers
//!
//! A [`LogSource`] yields the raw lines of a named source. Sources are
//! addressed by id; references inside log lines (`ref=db`) use the same ids.
//!
//! - [`DirectorySource`]: plain or gzipped files under a directory, discovered
//!   with glob patterns
//! - [`MemorySource`]: in-memory sources for tests and embedding

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

/// Suffixes removed from file names to form source ids, longest first.
const LOG_SUFFIXES: [&str; 2] = [".log.gz", ".log"];

/// Reader over named log sources.
///
/// Implementations must be cheap to share; the pipeline holds them behind an
/// `Arc` and may read different sources from several tasks.
pub trait LogSource: Send + Sync {
    /// Ids of every source an analysis run should scan.
    fn list_sources(&self) -> Result<Vec<String>>;

    /// Raw lines of one source.
    ///
    /// Fails with [`Error::SourceUnavailable`] when the source cannot be opened.
    fn read(&self, source_id: &str) -> Result<Vec<String>>;

    /// The id under which `source_id` is known to this reader.
    ///
    /// Two ids naming the same source must map to the same canonical id.
    fn canonical_id(&self, source_id: &str) -> String {
        source_id.to_string()
    }
}

fn strip_log_suffix(id: &str) -> &str {
    LOG_SUFFIXES
        .iter()
        .find_map(|suffix| id.strip_suffix(suffix))
        .filter(|stem| !stem.is_empty())
        .unwrap_or(id)
}

/// Log files under a root directory.
///
/// Source ids are paths relative to the root with a trailing `.log` or
/// `.log.gz` removed, so `services/auth.log` is the source `services/auth`.
/// When both a plain and a gzipped file exist, the plain one is read.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    patterns: Vec<String>,
}

impl DirectorySource {
    /// Create a source over `root`, scanning files matching `patterns`.
    pub fn new(root: impl Into<PathBuf>, patterns: Vec<String>) -> Self {
        Self {
            root: root.into(),
            patterns,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn source_id_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        Some(self.canonical_id(&relative.to_string_lossy()))
    }

    /// Map an id to a file, refusing ids that would leave the root.
    fn path_for(&self, source_id: &str) -> Result<PathBuf> {
        let relative = Path::new(source_id);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if source_id.is_empty() || escapes {
            return Err(Error::source_unavailable(
                source_id,
                "source id must be a relative path inside the log directory",
            ));
        }

        let exact = self.root.join(relative);
        if exact.is_file() {
            return Ok(exact);
        }
        let stem = strip_log_suffix(source_id);
        for suffix in LOG_SUFFIXES.iter().rev() {
            let with_ext = self.root.join(format!("{stem}{suffix}"));
            if with_ext.is_file() {
                return Ok(with_ext);
            }
        }
        Err(Error::source_unavailable(source_id, "no such log file"))
    }
}

impl LogSource for DirectorySource {
    fn list_sources(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Err(Error::source_unavailable(
                self.root.display().to_string(),
                "log directory does not exist",
            ));
        }

        let mut ids = Vec::new();
        for pattern in &self.patterns {
            let full_pattern = self.root.join(pattern);
            let pattern_str = full_pattern.to_string_lossy();

            let entries = glob::glob(&pattern_str)
                .map_err(|e| Error::Config(format!("invalid source pattern {pattern:?}: {e}")))?;

            for entry in entries.flatten() {
                if !entry.is_file() {
                    continue;
                }
                if let Some(id) = self.source_id_for(&entry) {
                    ids.push(id);
                }
            }
        }

        ids.sort();
        ids.dedup();
        tracing::debug!(root = %self.root.display(), count = ids.len(), "Discovered log sources");
        Ok(ids)
    }

    fn canonical_id(&self, source_id: &str) -> String {
        strip_log_suffix(&source_id.replace('\\', "/")).to_string()
    }

    fn read(&self, source_id: &str) -> Result<Vec<String>> {
        let path = self.path_for(source_id)?;
        let bytes = if path.extension().is_some_and(|ext| ext == "gz") {
            let file =
                std::fs::File::open(&path).map_err(|e| Error::source_unavailable(source_id, e))?;
            let mut bytes = Vec::new();
            GzDecoder::new(file)
                .read_to_end(&mut bytes)
                .map_err(|e| Error::source_unavailable(source_id, e))?;
            bytes
        } else {
            std::fs::read(&path).map_err(|e| Error::source_unavailable(source_id, e))?
        };
        Ok(String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_string)
            .collect())
    }
}

/// In-memory sources keyed by id.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    sources: BTreeMap<String, Vec<String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with_source<I, S>(mut self, source_id: &str, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(source_id, lines);
        self
    }

    pub fn insert<I, S>(&mut self, source_id: &str, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources.insert(
            source_id.to_string(),
            lines.into_iter().map(Into::into).collect(),
        );
    }
}

impl LogSource for MemorySource {
    fn list_sources(&self) -> Result<Vec<String>> {
        Ok(self.sources.keys().cloned().collect())
    }

    fn read(&self, source_id: &str) -> Result<Vec<String>> {
        self.sources
            .get(source_id)
            .cloned()
            .ok_or_else(|| Error::source_unavailable(source_id, "no such source"))
    }
}
