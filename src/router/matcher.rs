//! Route pattern compilation and matching.
//!
//! A pattern is a path with `:name` placeholders, e.g. `/users/:id/posts/:post`.
//! Each placeholder matches one run of non-`/` characters and is returned by
//! name. Trailing slashes on both the pattern and the path are ignored.
//!
//! Static segments are inserted into the regular expression as written, so
//! characters such as `.` keep their regex meaning. A pattern whose regex
//! does not compile never matches anything.

use regex::Regex;
use std::collections::HashMap;
use tracing::warn;

/// Captured path parameters, keyed by placeholder name.
pub type Params = HashMap<String, String>;

/// A route pattern compiled once and matched many times.
#[derive(Debug, Clone)]
pub struct PathPattern {
    pattern: String,
    regex: Option<Regex>,
}

impl PathPattern {
    /// Compile a route pattern.
    ///
    /// # Arguments
    ///
    /// * `pattern` - Route pattern with `:name` placeholders
    ///
    /// # Returns
    ///
    /// A compiled pattern. Compilation failures are logged and produce a
    /// pattern that only matches via exact string comparison.
    #[must_use]
    pub fn new(pattern: &str) -> Self {
        let pattern = pattern.trim_end_matches('/').to_string();
        let source = pattern_to_regex(&pattern);
        let regex = match Regex::new(&source) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Route pattern failed to compile");
                None
            }
        };
        Self { pattern, regex }
    }

    /// The pattern text with trailing slashes removed.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Match a request path against this pattern.
    ///
    /// # Returns
    ///
    /// * `Some(params)` - The captured placeholders (empty for static patterns)
    /// * `None` - The path does not match
    #[must_use]
    pub fn matches(&self, path: &str) -> Option<Params> {
        let path = path.trim_end_matches('/');
        if path == self.pattern {
            return Some(Params::new());
        }
        let re = self.regex.as_ref()?;
        let caps = re.captures(path)?;
        Some(
            re.capture_names()
                .flatten()
                .filter_map(|name| {
                    caps.name(name)
                        .map(|m| (name.to_string(), m.as_str().to_string()))
                })
                .collect(),
        )
    }
}

/// Build the regex source for a pattern: every `:name` segment becomes a
/// named group over `[^/]+`, anchored with `^...$`.
fn pattern_to_regex(pattern: &str) -> String {
    let mut source = String::with_capacity(pattern.len() + 16);
    source.push('^');
    let mut first = true;
    for segment in pattern.split('/') {
        if !first {
            source.push('/');
        }
        first = false;
        match segment.strip_prefix(':') {
            Some(name) if !name.is_empty() => {
                source.push_str("(?P<");
                source.push_str(name);
                source.push_str(">[^/]+)");
            }
            _ => source.push_str(segment),
        }
    }
    source.push('$');
    source
}

/// Match `path` against `pattern` in one step.
///
/// Compiles the pattern on every call; use [`PathPattern`] when the same
/// pattern is matched repeatedly.
#[must_use]
pub fn match_path(pattern: &str, path: &str) -> Option<Params> {
    PathPattern::new(pattern).matches(path)
}
