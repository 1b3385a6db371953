//! Named regex subscriptions.

use crate::error::{Error, Result};
use regex::{Regex, RegexBuilder};

/// A user-supplied pattern and its case-insensitive compiled form.
///
/// Two filters are equal when their raw pattern text is equal.
#[derive(Debug, Clone)]
pub struct Filter {
    raw: String,
    regex: Regex,
}

impl Filter {
    /// Compiles `pattern` case-insensitively.
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| Error::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;

        Ok(Self {
            raw: pattern.to_string(),
            regex,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for Filter {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Filter {}

/// Filters keyed by raw pattern, kept in insertion order.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    filters: Vec<Filter>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `pattern`, doing nothing if it is already present.
    ///
    /// Returns [`Error::InvalidPattern`] when the pattern does not compile; the
    /// set is left unchanged in that case.
    pub fn add(&mut self, pattern: &str) -> Result<()> {
        if self.contains(pattern) {
            return Ok(());
        }
        self.filters.push(Filter::new(pattern)?);
        Ok(())
    }

    /// Removes the filter with exactly this raw text. Returns whether one was removed.
    pub fn remove(&mut self, pattern: &str) -> bool {
        let before = self.filters.len();
        self.filters.retain(|filter| filter.raw != pattern);
        self.filters.len() != before
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.filters.iter().any(|filter| filter.raw == pattern)
    }

    /// Raw patterns of every stored filter.
    pub fn list(&self) -> Vec<String> {
        self.filters.iter().map(|filter| filter.raw.clone()).collect()
    }

    /// Raw patterns of every filter matching `line`, in list order.
    ///
    /// Matching runs against the full raw line so patterns can select on
    /// channel markers and speaker names as well as the message.
    pub fn matches(&self, line: &str) -> Vec<String> {
        self.filters
            .iter()
            .filter(|filter| filter.is_match(line))
            .map(|filter| filter.raw.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
