//! Regex name filters for resources and commands.
//!
//! Patterns always match the whole name: `serv` does not admit `service`.

use regex::Regex;

use crate::error::DuploMcpError;

/// Pattern that admits every name.
pub const MATCH_ALL: &str = ".*";

/// A compiled full-match name filter that remembers its source pattern.
#[derive(Debug, Clone)]
pub struct NameFilter {
    pattern: String,
    /// `None` for the match-all pattern.
    regex: Option<Regex>,
}

impl NameFilter {
    /// Compile `pattern` anchored at both ends.
    pub fn new(pattern: &str) -> crate::Result<Self> {
        if pattern == MATCH_ALL {
            return Ok(Self::match_all());
        }
        let regex = Regex::new(&format!("^(?:{})$", pattern))
            .map_err(|e| DuploMcpError::InvalidFilter(pattern.to_string(), e.to_string()))?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex: Some(regex),
        })
    }

    /// Filter that admits every name.
    pub fn match_all() -> Self {
        Self {
            pattern: MATCH_ALL.to_string(),
            regex: None,
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.as_ref().is_none_or(|r| r.is_match(name))
    }

    /// The pattern as the user wrote it.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_default(&self) -> bool {
        self.pattern == MATCH_ALL
    }
}

impl Default for NameFilter {
    fn default() -> Self {
        Self::match_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(pattern: &str) -> NameFilter {
        NameFilter::new(pattern).unwrap()
    }

    #[test]
    fn test_default_matches_everything() {
        let f = filter(".*");
        assert!(f.matches("service"));
        assert!(f.matches("tenant"));
        assert!(f.matches("anything"));
        assert!(f.is_default());
    }

    #[test]
    fn test_exact_match() {
        let f = filter("service");
        assert!(f.matches("service"));
        assert!(!f.matches("tenant"));
    }

    #[test]
    fn test_alternation() {
        let f = filter("service|lambda|s3");
        assert!(f.matches("lambda"));
        assert!(f.matches("service"));
        assert!(f.matches("s3"));
        assert!(!f.matches("tenant"));
    }

    #[test]
    fn test_alternation_is_anchored_per_branch() {
        // Without the group, "^create|delete$" would admit "created".
        let f = filter("create|delete|update");
        assert!(!f.matches("created"));
        assert!(!f.matches("undelete"));
        assert!(!f.matches("list"));
    }

    #[test]
    fn test_regex_wildcard() {
        let f = filter("batch_.*");
        assert!(f.matches("batch_compute"));
        assert!(f.matches("batch_anything"));
        assert!(!f.matches("service"));
    }

    #[test]
    fn test_partial_should_not_match() {
        assert!(!filter("serv").matches("service"));
    }

    #[test]
    fn test_pattern_preserved() {
        let f = filter("tenant|service");
        assert_eq!(f.pattern(), "tenant|service");
        assert!(!f.is_default());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let result = NameFilter::new("serv(");
        assert!(
            matches!(result, Err(DuploMcpError::InvalidFilter(p, _)) if p == "serv(")
        );
    }

    #[test]
    fn test_match_all_default() {
        let f = NameFilter::default();
        assert_eq!(f.pattern(), ".*");
        assert!(f.matches(""));
    }
}
