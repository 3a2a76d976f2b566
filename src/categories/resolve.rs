//! Resolution strategies and results.

use crate::value::Value;

/// Keys whose string values are tested first, in this order.
pub(crate) const PREFERRED_FIELDS: [&str; 8] = [
    "event", "action", "message", "type", "url", "src", "error", "level",
];

/// How [`CategoryRegistry::resolve`](super::CategoryRegistry::resolve) picks categories.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResolveStrategy {
    /// First enabled, validator-passing match in priority order.
    First,
    /// Best-scoring validator-passing match plus the ranked list.
    #[default]
    Specific,
    /// Every pattern match, ranked; validators are not consulted.
    All,
    /// Like `All`, grouped into trees under each match's topmost ancestor.
    Hierarchical,
}

/// Restricts a resolution.
#[derive(Clone, Debug, Default)]
pub struct ResolveContext {
    /// Only categories of this dimension are considered.
    pub dimension: Option<String>,
}

impl ResolveContext {
    /// Restricts resolution to one dimension.
    pub fn in_dimension(dimension: impl Into<String>) -> Self {
        Self {
            dimension: Some(dimension.into()),
        }
    }
}

/// One matching category.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryMatch {
    /// Category id.
    pub id: String,
    /// Category dimension.
    pub dimension: String,
    /// `matching_patterns * 1000 + priority`.
    pub score: i64,
    /// Number of patterns that matched.
    pub matched_patterns: usize,
    /// Depth in the hierarchy (roots are 0).
    pub depth: usize,
}

/// Matches grouped under a common topmost ancestor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryTree {
    /// Topmost ancestor id (may be a synthetic container or a match itself).
    pub root: String,
    /// Matches below (or equal to) the root, ranked.
    pub matches: Vec<CategoryMatch>,
}

/// Outcome of a resolution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Strategy that produced this resolution.
    pub strategy: ResolveStrategy,
    /// Best match.
    pub primary: Option<CategoryMatch>,
    /// Ranked matches.
    pub matches: Vec<CategoryMatch>,
    /// Hierarchical grouping (only for [`ResolveStrategy::Hierarchical`]).
    pub trees: Vec<CategoryTree>,
}

impl Resolution {
    /// Primary category id.
    pub fn primary_id(&self) -> Option<&str> {
        self.primary.as_ref().map(|m| m.id.as_str())
    }

    /// Ranked match ids.
    pub fn ids(&self) -> Vec<&str> {
        self.matches.iter().map(|m| m.id.as_str()).collect()
    }

    /// True if `id` matched.
    pub fn contains(&self, id: &str) -> bool {
        self.matches.iter().any(|m| m.id == id)
    }
}

/// Extracts the strings a payload is tested with.
///
/// A string payload is its own test string. For objects, the preferred fields
/// come first and any other top-level string field follows.
pub(crate) fn test_strings(testable: &Value) -> Vec<String> {
    match testable {
        Value::String(s) => vec![s.clone()],
        Value::Object(map) => {
            let mut out: Vec<String> = PREFERRED_FIELDS
                .iter()
                .filter_map(|k| map.get(*k).and_then(Value::as_str))
                .map(str::to_owned)
                .collect();
            for (k, v) in map {
                if PREFERRED_FIELDS.contains(&k.as_str()) {
                    continue;
                }
                if let Some(s) = v.as_str() {
                    out.push(s.to_owned());
                }
            }
            out
        }
        Value::Shared(node) => node.with(test_strings),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn preferred_fields_come_first() {
        let v = Value::from(json!({"zeta": "z", "url": "u", "event": "e", "n": 1}));
        assert_eq!(test_strings(&v), vec!["e", "u", "z"]);
    }
}
