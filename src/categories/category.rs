//! # Category definitions.
//!
//! A [`Category`] is a named bucket inside a dimension. It matches when any of
//! its patterns matches any test string drawn from the payload, and its
//! optional async [`Validator`] agrees.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use regex::Regex;

use crate::error::CategoryError;
use crate::value::Value;

/// Dimension used when none is given.
pub const DEFAULT_DIMENSION: &str = "default";

/// Async predicate run against the testable payload after a pattern matched.
///
/// Errors count as "no match", and so does exceeding the registry's validator timeout.
pub type Validator = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<bool, String>> + Send + Sync>;

/// Pattern source, normalized into a regex at registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CategoryPattern {
    /// Literal text, matched case-insensitively anywhere in the test string.
    Literal(String),
    /// Regular expression used verbatim (add `(?i)` for case-insensitivity).
    Regex(String),
}

impl CategoryPattern {
    /// Literal pattern.
    pub fn literal(text: impl Into<String>) -> Self {
        CategoryPattern::Literal(text.into())
    }

    /// Regex pattern.
    pub fn regex(source: impl Into<String>) -> Self {
        CategoryPattern::Regex(source.into())
    }

    pub(crate) fn compile(&self, id: &str) -> Result<Regex, CategoryError> {
        let source = match self {
            CategoryPattern::Literal(text) => format!("(?i){}", regex::escape(text)),
            CategoryPattern::Regex(source) => source.clone(),
        };
        Regex::new(&source).map_err(|e| CategoryError::InvalidPattern {
            id: id.to_owned(),
            pattern: source,
            error: e.to_string(),
        })
    }
}

impl From<&str> for CategoryPattern {
    fn from(text: &str) -> Self {
        CategoryPattern::Literal(text.to_owned())
    }
}

/// Registration options.
#[derive(Clone, Default)]
pub struct CategoryOptions {
    /// Namespace; `None` → [`DEFAULT_DIMENSION`].
    pub dimension: Option<String>,
    /// Parent category id (created as a synthetic container if unknown).
    pub parent: Option<String>,
    /// Free-form metadata.
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Tie-breaker among equally matching categories (higher wins).
    pub priority: i32,
    /// Starts disabled when `true`.
    pub disabled: bool,
    /// Optional async validator.
    pub validator: Option<Validator>,
}

impl CategoryOptions {
    /// Sets the dimension.
    pub fn dimension(mut self, dimension: impl Into<String>) -> Self {
        self.dimension = Some(dimension.into());
        self
    }

    /// Sets the parent.
    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Sets the priority.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Adds one metadata entry.
    pub fn meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Registers the category disabled.
    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Sets the validator.
    pub fn validator<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> BoxFuture<'static, Result<bool, String>> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(f));
        self
    }
}

/// One registered category.
#[derive(Clone)]
pub struct Category {
    pub(crate) id: String,
    pub(crate) patterns: Vec<Regex>,
    pub(crate) dimension: String,
    pub(crate) parent: Option<String>,
    pub(crate) metadata: BTreeMap<String, serde_json::Value>,
    pub(crate) priority: i32,
    pub(crate) enabled: bool,
    pub(crate) children: BTreeSet<String>,
    pub(crate) validator: Option<Validator>,
    pub(crate) synthetic: bool,
    pub(crate) seq: u64,
}

impl Category {
    pub(crate) fn synthetic(id: &str, dimension: &str, seq: u64) -> Self {
        Self {
            id: id.to_owned(),
            patterns: Vec::new(),
            dimension: dimension.to_owned(),
            parent: None,
            metadata: BTreeMap::new(),
            priority: 0,
            enabled: true,
            children: BTreeSet::new(),
            validator: None,
            synthetic: true,
            seq,
        }
    }

    /// Category id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Dimension (namespace).
    pub fn dimension(&self) -> &str {
        &self.dimension
    }

    /// Parent id.
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Metadata.
    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    /// Priority.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Whether the category takes part in resolution.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// True for containers auto-created for an unknown parent.
    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    /// Direct children ids.
    pub fn children(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(String::as_str)
    }

    /// Compiled pattern sources.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(Regex::as_str)
    }

    /// Number of patterns matching at least one of `strings`.
    pub(crate) fn match_count(&self, strings: &[String]) -> usize {
        self.patterns
            .iter()
            .filter(|re| strings.iter().any(|s| re.is_match(s)))
            .count()
    }
}

impl fmt::Debug for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Category")
            .field("id", &self.id)
            .field("dimension", &self.dimension)
            .field("parent", &self.parent)
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .field("synthetic", &self.synthetic)
            .field("patterns", &self.patterns.len())
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_are_escaped_and_case_insensitive() {
        let re = CategoryPattern::literal("a.b").compile("x").unwrap();
        assert!(re.is_match("xx A.B yy"));
        assert!(!re.is_match("aXb"));
    }

    #[test]
    fn bad_regex_is_reported() {
        let err = CategoryPattern::regex("(").compile("broken").unwrap_err();
        assert_eq!(err.as_label(), "category_invalid_pattern");
    }
}
