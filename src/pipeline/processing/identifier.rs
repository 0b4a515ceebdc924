//! Legacy tree-code rewriting.
//!
//! Codes look like `<PREFIX>-<digits>`. A legacy prefix (`MAN`) is rewritten
//! to its canonical replacement (`JJK`) and short numbers are zero-padded, so
//! `man-7`, `MAN-07` and `JJK-007` all name the same tree. Anything that does
//! not match a legacy prefix comes back untouched, which keeps the rewrite
//! idempotent.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::config::IdentifierConfig;
use crate::domain::CanonicalId;

static CODE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z]+)-(\d+)$").expect("static regex"));

static DEFAULT_NORMALIZER: Lazy<IdentifierNormalizer> =
    Lazy::new(|| IdentifierNormalizer::new(&IdentifierConfig::default()));

/// Rewrites a code with the default `MAN -> JJK` mapping.
pub fn normalize(code: &str) -> String {
    DEFAULT_NORMALIZER.normalize(code)
}

#[derive(Debug, Clone)]
pub struct IdentifierNormalizer {
    /// Upper-cased legacy prefix -> canonical prefix.
    prefixes: HashMap<String, String>,
    pad_width: usize,
}

impl IdentifierNormalizer {
    pub fn new(config: &IdentifierConfig) -> Self {
        let prefixes = config
            .legacy_prefixes
            .iter()
            .map(|(legacy, canonical)| (legacy.to_uppercase(), canonical.clone()))
            .collect();
        Self {
            prefixes,
            pad_width: config.pad_width,
        }
    }

    /// Total and idempotent: unmatched input is returned as-is.
    pub fn normalize(&self, code: &str) -> String {
        let trimmed = code.trim();
        let Some(caps) = CODE_PATTERN.captures(trimmed) else {
            return code.to_string();
        };
        let Some(canonical) = self.prefixes.get(&caps[1].to_uppercase()) else {
            return code.to_string();
        };
        let digits = &caps[2];
        format!("{}-{:0>width$}", canonical, digits, width = self.pad_width)
    }

    /// Normalizes an optional cell; blank codes have no identity and yield `None`.
    pub fn canonical_id(&self, code: Option<&str>) -> Option<CanonicalId> {
        let code = code?;
        if code.trim().is_empty() {
            return None;
        }
        Some(CanonicalId::from_normalized(self.normalize(code).trim().to_string()))
    }
}

impl Default for IdentifierNormalizer {
    fn default() -> Self {
        DEFAULT_NORMALIZER.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_and_rewrites_legacy_codes() {
        assert_eq!(normalize("MAN-7"), "JJK-007");
        assert_eq!(normalize("MAN-42"), "JJK-042");
        assert_eq!(normalize("MAN-123"), "JJK-123");
        assert_eq!(normalize("MAN-1234"), "JJK-1234");
    }

    #[test]
    fn legacy_match_is_case_insensitive_and_trimmed() {
        assert_eq!(normalize("man-7"), "JJK-007");
        assert_eq!(normalize("  Man-07 "), "JJK-007");
    }

    #[test]
    fn unmatched_codes_pass_through() {
        assert_eq!(normalize("JJK-7"), "JJK-7");
        assert_eq!(normalize("PJK-0012"), "PJK-0012");
        assert_eq!(normalize("MAN7"), "MAN7");
        assert_eq!(normalize("MAN-7a"), "MAN-7a");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("tree #5"), "tree #5");
    }

    #[test]
    fn rewrite_is_idempotent() {
        let samples = [
            "MAN-7", "man-07", "MAN-007", "JJK-007", "JJK-7", "MAN-", "-7", "", " ", "MAN-7 ",
            "ÄBC-1", "MAN--7", "MAN-99999", "abc",
        ];
        for code in samples {
            let once = normalize(code);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", code);
        }
    }

    #[test]
    fn blank_codes_have_no_canonical_id() {
        let normalizer = IdentifierNormalizer::default();
        assert!(normalizer.canonical_id(None).is_none());
        assert!(normalizer.canonical_id(Some("  ")).is_none());
        assert_eq!(
            normalizer.canonical_id(Some("MAN-7")).unwrap().as_str(),
            "JJK-007"
        );
    }

    #[test]
    fn honours_configured_prefixes_and_width() {
        let mut config = IdentifierConfig::default();
        config.legacy_prefixes.insert("OLD".into(), "NEW".into());
        config.pad_width = 4;
        let normalizer = IdentifierNormalizer::new(&config);
        assert_eq!(normalizer.normalize("old-5"), "NEW-0005");
        assert_eq!(normalizer.normalize("MAN-5"), "JJK-0005");
    }
}
