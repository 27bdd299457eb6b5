//! Signature normalization
//!
//! Error lines that differ only in volatile tokens (timestamps, ids, counters)
//! must collapse to the same signature. A [`Normalizer`] applies an ordered
//! list of regex replacements followed by whitespace folding.

use crate::config::NormalizationConfig;
use crate::error::Result;
use regex::Regex;

const TIMESTAMP: &str = r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:Z|[+-]\d{2}:?\d{2})?";
const CLOCK: &str = r"\b\d{2}:\d{2}:\d{2}(?:[.,]\d+)?\b";
const UUID: &str = r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\b";
const HEX: &str = r"\b(?:0x[0-9a-fA-F]+|[0-9a-fA-F]{8,})\b";
const NUMBER: &str = r"\d+";

fn builtin_rules() -> Vec<(Regex, String)> {
    // Order matters: whole timestamps before clock times, UUIDs before hex,
    // hex before bare numbers.
    [
        (TIMESTAMP, "<TS>"),
        (CLOCK, "<TS>"),
        (UUID, "<UUID>"),
        (HEX, "<HEX>"),
        (NUMBER, "<NUM>"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| {
        (
            Regex::new(pattern).expect("valid regex literal"),
            replacement.to_string(),
        )
    })
    .collect()
}

/// Configurable volatile-token stripper.
#[derive(Debug, Clone)]
pub struct Normalizer {
    lowercase: bool,
    rules: Vec<(Regex, String)>,
    whitespace: Regex,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            lowercase: false,
            rules: builtin_rules(),
            whitespace: Regex::new(r"\s+").expect("valid regex literal"),
        }
    }
}

impl Normalizer {
    /// Build a normalizer from the `[analysis.normalization]` section.
    ///
    /// Custom rules run after the built-in ones. An invalid custom pattern is
    /// reported as [`Error::Regex`](crate::Error::Regex).
    pub fn from_config(config: &NormalizationConfig) -> Result<Self> {
        let mut rules = if config.use_defaults {
            builtin_rules()
        } else {
            Vec::new()
        };
        for rule in &config.rules {
            rules.push((Regex::new(&rule.pattern)?, rule.replacement.clone()));
        }
        Ok(Self {
            lowercase: config.lowercase,
            rules,
            ..Self::default()
        })
    }

    /// Normalize `text` into a signature.
    pub fn normalize(&self, text: &str) -> String {
        let mut normalized = if self.lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        };

        for (pattern, replacement) in &self.rules {
            normalized = pattern
                .replace_all(&normalized, replacement.as_str())
                .into_owned();
        }

        self.whitespace
            .replace_all(&normalized, " ")
            .trim()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReplacementRule;

    #[test]
    fn test_strips_timestamps_and_ids() {
        let normalizer = Normalizer::default();
        let a = normalizer.normalize("[2024-03-01 10:00:01] ERROR Processing failed request_id=879345");
        let b = normalizer.normalize("[2024-03-02 11:30:59] ERROR Processing failed request_id=12");
        assert_eq!(a, b);
        assert_eq!(a, "[<TS>] ERROR Processing failed request_id=<NUM>");
    }

    #[test]
    fn test_uuid_before_hex() {
        let normalizer = Normalizer::default();
        let normalized =
            normalizer.normalize("ERROR lost session 550e8400-e29b-41d4-a716-446655440000 at 0xdeadbeef");
        assert_eq!(normalized, "ERROR lost session <UUID> at <HEX>");
    }

    #[test]
    fn test_plain_text_is_kept() {
        let normalizer = Normalizer::default();
        assert_eq!(
            normalizer.normalize("[ERROR]   disk full (src=A) "),
            "[ERROR] disk full (src=A)"
        );
    }

    #[test]
    fn test_custom_rules_and_lowercase() {
        let config = NormalizationConfig {
            lowercase: true,
            use_defaults: false,
            rules: vec![ReplacementRule {
                pattern: r"host-[a-z]+".to_string(),
                replacement: "<HOST>".to_string(),
            }],
        };
        let normalizer = Normalizer::from_config(&config).unwrap();
        assert_eq!(
            normalizer.normalize("ERROR Timeout on HOST-alpha port 80"),
            "error timeout on <HOST> port 80"
        );
    }

    #[test]
    fn test_invalid_custom_rule_is_rejected() {
        let config = NormalizationConfig {
            rules: vec![ReplacementRule {
                pattern: "(".to_string(),
                replacement: String::new(),
            }],
            ..NormalizationConfig::default()
        };
        assert!(Normalizer::from_config(&config).is_err());
    }
}
