//! Glob-style target pattern matching.
//!
//! A pattern is literal text where `*` matches any run of characters,
//! including the empty run. Matching is anchored at both ends and
//! case-insensitive. Regex metacharacters in the pattern are literal.

use dashmap::DashMap;
use regex::{Regex, RegexBuilder};
use tracing::warn;

use crate::error::{LimiterError, Result};

/// The wildcard marker recognised in target patterns.
pub const WILDCARD: char = '*';

/// Compile a glob pattern into an anchored, case-insensitive regex.
pub fn compile_pattern(pattern: &str) -> Result<Regex> {
    let body: Vec<String> = pattern.split(WILDCARD).map(regex::escape).collect();
    let source = format!("^{}$", body.join(".*"));

    RegexBuilder::new(&source)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| LimiterError::Pattern(format!("invalid pattern {:?}: {}", pattern, e)))
}

/// Pattern matcher that memoizes compiled patterns.
///
/// Safe to share across tasks; concurrent compiles of the same pattern may
/// race and the last insert wins.
#[derive(Debug, Default)]
pub struct PatternMatcher {
    compiled: DashMap<String, Regex>,
}

impl PatternMatcher {
    /// Create an empty matcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether `target` matches `pattern`, compiling it on first use.
    pub fn matches(&self, pattern: &str, target: &str) -> bool {
        if let Some(regex) = self.compiled.get(pattern) {
            return regex.is_match(target);
        }

        match compile_pattern(pattern) {
            Ok(regex) => {
                let is_match = regex.is_match(target);
                self.compiled.insert(pattern.to_string(), regex);
                is_match
            }
            Err(e) => {
                warn!(error = %e, "Treating uncompilable pattern as non-matching");
                false
            }
        }
    }

    /// Number of compiled patterns held.
    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    /// Whether no patterns have been compiled yet.
    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}
