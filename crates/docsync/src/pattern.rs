//! Exclude-pattern matching for sub-collection names.
//!
//! A pattern containing `*` is compiled to an anchored regular expression
//! (`*` becomes `.*`, everything else is escaped); a pattern without `*`
//! matches only on exact equality. Both forms apply to the leaf collection
//! name, never to the full path.

use crate::error::{Result, SyncError};
use regex::Regex;

#[derive(Debug, Clone)]
enum Pattern {
    Exact(String),
    Glob(Regex),
}

/// A compiled exclude list. Compile once, match on every traversal step.
#[derive(Debug, Clone, Default)]
pub struct ExcludePatterns {
    patterns: Vec<Pattern>,
}

impl ExcludePatterns {
    /// Compile a list of exclude patterns.
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for p in patterns {
            if p.contains('*') {
                let regex = glob_to_regex(p)?;
                compiled.push(Pattern::Glob(regex));
            } else {
                compiled.push(Pattern::Exact(p.clone()));
            }
        }
        Ok(Self { patterns: compiled })
    }

    /// True when `name` matches any pattern in the list.
    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| match p {
            Pattern::Exact(s) => s == name,
            Pattern::Glob(r) => r.is_match(name),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Compile a `*` glob into an anchored regex. No partial matches.
fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{}$", body))
        .map_err(|e| SyncError::Config(format!("invalid exclude pattern '{}': {}", pattern, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(list: &[&str]) -> ExcludePatterns {
        let owned: Vec<String> = list.iter().map(|s| s.to_string()).collect();
        ExcludePatterns::new(&owned).unwrap()
    }

    #[test]
    fn test_glob_matches_prefix() {
        let p = patterns(&["cache*"]);
        assert!(p.matches("cache_v1"));
        assert!(!p.matches("orders"));
    }

    #[test]
    fn test_exact_match_only() {
        let p = patterns(&["logs"]);
        assert!(p.matches("logs"));
        assert!(!p.matches("logs2"));
    }

    #[test]
    fn test_glob_is_anchored() {
        // No substring matches: "*_tmp" must not match "x_tmp_y".
        let p = patterns(&["*_tmp"]);
        assert!(p.matches("sessions_tmp"));
        assert!(!p.matches("x_tmp_y"));
    }

    #[test]
    fn test_glob_escapes_regex_metacharacters() {
        let p = patterns(&["v1.0*"]);
        assert!(p.matches("v1.0-beta"));
        assert!(!p.matches("v1x0-beta"));
    }

    #[test]
    fn test_empty_list_matches_nothing() {
        let p = patterns(&[]);
        assert!(p.is_empty());
        assert!(!p.matches("anything"));
    }
}
