//! # Category registry.
//!
//! Holds every [`Category`] of one bus context, indexed by dimension and by
//! parent → children, and resolves payloads against them.
//!
//! ## Rules
//! - Linking a parent walks the ancestor chain first; a cycle is rejected before anything changes.
//! - Unknown parents are created as synthetic containers (no patterns, never match).
//! - Registering an id that exists as a synthetic container upgrades it in place.
//! - Candidates are ranked by priority (desc) then registration order.
//! - Validators run without the lock held, each under the configured timeout.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;

use super::category::{Category, CategoryOptions, CategoryPattern, DEFAULT_DIMENSION};
use super::resolve::{
    test_strings, CategoryMatch, CategoryTree, Resolution, ResolveContext, ResolveStrategy,
};
use crate::error::CategoryError;
use crate::value::Value;

/// Batch registration entry.
#[derive(Clone)]
pub struct CategoryDef {
    /// Category id.
    pub id: String,
    /// Patterns.
    pub patterns: Vec<CategoryPattern>,
    /// Options.
    pub options: CategoryOptions,
}

impl CategoryDef {
    /// Creates a definition.
    pub fn new(id: impl Into<String>, patterns: Vec<CategoryPattern>, options: CategoryOptions) -> Self {
        Self {
            id: id.into(),
            patterns,
            options,
        }
    }
}

/// Registry counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Registered categories, synthetic containers included.
    pub categories: usize,
    /// Synthetic containers.
    pub synthetic: usize,
    /// Enabled categories.
    pub enabled: usize,
    /// Number of non-empty dimensions.
    pub dimensions: usize,
    /// `resolve` calls.
    pub resolutions: u64,
    /// `resolve` calls with at least one match.
    pub resolved: u64,
    /// Validators that exceeded the timeout.
    pub validator_timeouts: u64,
}

#[derive(Default)]
struct State {
    categories: HashMap<String, Category>,
    by_dimension: BTreeMap<String, BTreeSet<String>>,
    next_seq: u64,
}

impl State {
    fn seq(&mut self) -> u64 {
        let s = self.next_seq;
        self.next_seq += 1;
        s
    }

    /// Ancestor ids, nearest first. Stops on a (never expected) cycle.
    fn ancestors(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut cur = self.categories.get(id).and_then(|c| c.parent.clone());
        while let Some(p) = cur {
            if p == id || out.contains(&p) {
                break;
            }
            cur = self.categories.get(&p).and_then(|c| c.parent.clone());
            out.push(p);
        }
        out
    }

    fn unlink(&mut self, id: &str) {
        let Some(parent) = self.categories.get(id).and_then(|c| c.parent.clone()) else {
            return;
        };
        if let Some(p) = self.categories.get_mut(&parent) {
            p.children.remove(id);
        }
    }

    fn index(&mut self, id: &str, dimension: &str) {
        for ids in self.by_dimension.values_mut() {
            ids.remove(id);
        }
        self.by_dimension.retain(|_, ids| !ids.is_empty());
        self.by_dimension
            .entry(dimension.to_owned())
            .or_default()
            .insert(id.to_owned());
    }
}

/// Registry of categories for one bus context.
pub struct CategoryRegistry {
    state: RwLock<State>,
    validator_timeout: Duration,
    resolutions: AtomicU64,
    resolved: AtomicU64,
    validator_timeouts: AtomicU64,
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl CategoryRegistry {
    /// Creates an empty registry whose validators time out after `validator_timeout`.
    pub fn new(validator_timeout: Duration) -> Self {
        Self {
            state: RwLock::new(State::default()),
            validator_timeout,
            resolutions: AtomicU64::new(0),
            resolved: AtomicU64::new(0),
            validator_timeouts: AtomicU64::new(0),
        }
    }

    /// Registers (or replaces) a category.
    pub fn register(
        &self,
        id: impl Into<String>,
        patterns: Vec<CategoryPattern>,
        options: CategoryOptions,
    ) -> Result<(), CategoryError> {
        let id = id.into();
        let compiled = patterns
            .iter()
            .map(|p| p.compile(&id))
            .collect::<Result<Vec<_>, _>>()?;
        let dimension = options
            .dimension
            .clone()
            .unwrap_or_else(|| DEFAULT_DIMENSION.to_owned());

        let mut st = self.state.write();

        if let Some(parent) = &options.parent {
            if *parent == id || st.ancestors(parent).contains(&id) {
                return Err(CategoryError::Cycle {
                    id,
                    parent: parent.clone(),
                });
            }
        }

        let existing = st.categories.get(&id).map(|c| (c.children.clone(), c.seq));
        let (children, seq) = match existing {
            Some(kept) => kept,
            None => (BTreeSet::new(), st.seq()),
        };
        st.unlink(&id);

        if let Some(parent) = &options.parent {
            if !st.categories.contains_key(parent) {
                let seq = st.seq();
                st.categories
                    .insert(parent.clone(), Category::synthetic(parent, &dimension, seq));
                st.index(parent, &dimension);
                tracing::debug!(category = %parent, "created synthetic parent category");
            }
            if let Some(p) = st.categories.get_mut(parent) {
                p.children.insert(id.clone());
            }
        }

        st.index(&id, &dimension);
        st.categories.insert(
            id.clone(),
            Category {
                id: id.clone(),
                patterns: compiled,
                dimension,
                parent: options.parent,
                metadata: options.metadata,
                priority: options.priority,
                enabled: !options.disabled,
                children,
                validator: options.validator,
                synthetic: false,
                seq,
            },
        );
        Ok(())
    }

    /// Registers several categories in order, stopping at the first error.
    pub fn register_batch(&self, defs: impl IntoIterator<Item = CategoryDef>) -> Result<usize, CategoryError> {
        let mut n = 0;
        for def in defs {
            self.register(def.id, def.patterns, def.options)?;
            n += 1;
        }
        Ok(n)
    }

    /// Returns a snapshot of one category.
    pub fn get_category(&self, id: &str) -> Option<Category> {
        self.state.read().categories.get(id).cloned()
    }

    /// Enables a category; returns `false` if unknown.
    pub fn enable_category(&self, id: &str) -> bool {
        self.set_enabled(id, |_| true).is_some()
    }

    /// Disables a category; returns `false` if unknown.
    pub fn disable_category(&self, id: &str) -> bool {
        self.set_enabled(id, |_| false).is_some()
    }

    /// Flips a category; returns the new state, `None` if unknown.
    pub fn toggle_category(&self, id: &str) -> Option<bool> {
        self.set_enabled(id, |on| !on)
    }

    fn set_enabled(&self, id: &str, f: impl FnOnce(bool) -> bool) -> Option<bool> {
        let mut st = self.state.write();
        let cat = st.categories.get_mut(id)?;
        cat.enabled = f(cat.enabled);
        Some(cat.enabled)
    }

    /// Categories of one dimension, ranked by priority then registration order.
    pub fn categories_in_dimension(&self, dimension: &str) -> Vec<Category> {
        let st = self.state.read();
        let mut out: Vec<Category> = st
            .by_dimension
            .get(dimension)
            .into_iter()
            .flatten()
            .filter_map(|id| st.categories.get(id).cloned())
            .collect();
        out.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
        out
    }

    /// Ancestor ids of `id`, nearest first.
    pub fn ancestors(&self, id: &str) -> Vec<String> {
        self.state.read().ancestors(id)
    }

    /// Direct children of `id`.
    pub fn children(&self, id: &str) -> Vec<String> {
        self.state
            .read()
            .categories
            .get(id)
            .map(|c| c.children.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Registry counters.
    pub fn stats(&self) -> RegistryStats {
        let st = self.state.read();
        RegistryStats {
            categories: st.categories.len(),
            synthetic: st.categories.values().filter(|c| c.synthetic).count(),
            enabled: st.categories.values().filter(|c| c.enabled).count(),
            dimensions: st.by_dimension.len(),
            resolutions: self.resolutions.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            validator_timeouts: self.validator_timeouts.load(Ordering::Relaxed),
        }
    }

    /// Resolves `testable` into categories.
    pub async fn resolve(
        &self,
        testable: &Value,
        strategy: ResolveStrategy,
        ctx: &ResolveContext,
    ) -> Resolution {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        let strings = test_strings(testable);

        // (category, match, ancestors) snapshot taken under the lock.
        let candidates: Vec<(Category, CategoryMatch, Vec<String>)> = {
            let st = self.state.read();
            let mut cands: Vec<&Category> = st
                .categories
                .values()
                .filter(|c| c.enabled && !c.synthetic)
                .filter(|c| ctx.dimension.as_deref().map_or(true, |d| d == c.dimension))
                .collect();
            cands.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
            cands
                .into_iter()
                .filter_map(|c| {
                    let n = c.match_count(&strings);
                    (n > 0).then(|| {
                        let ancestors = st.ancestors(&c.id);
                        let m = CategoryMatch {
                            id: c.id.clone(),
                            dimension: c.dimension.clone(),
                            score: n as i64 * 1000 + i64::from(c.priority),
                            matched_patterns: n,
                            depth: ancestors.len(),
                        };
                        (c.clone(), m, ancestors)
                    })
                })
                .collect()
        };

        let mut res = Resolution {
            strategy,
            ..Resolution::default()
        };

        match strategy {
            ResolveStrategy::First => {
                for (cat, m, _) in candidates {
                    if self.validate(&cat, testable).await {
                        res.primary = Some(m.clone());
                        res.matches = vec![m];
                        break;
                    }
                }
            }
            ResolveStrategy::Specific => {
                let mut kept = Vec::with_capacity(candidates.len());
                for (cat, m, _) in candidates {
                    if self.validate(&cat, testable).await {
                        kept.push(m);
                    }
                }
                rank(&mut kept);
                res.primary = kept.first().cloned();
                res.matches = kept;
            }
            ResolveStrategy::All | ResolveStrategy::Hierarchical => {
                let mut roots: Vec<(String, CategoryMatch)> = candidates
                    .into_iter()
                    .map(|(_, m, ancestors)| {
                        let root = ancestors.last().cloned().unwrap_or_else(|| m.id.clone());
                        (root, m)
                    })
                    .collect();
                let mut all: Vec<CategoryMatch> = roots.iter().map(|(_, m)| m.clone()).collect();
                rank(&mut all);
                res.primary = all.first().cloned();
                res.matches = all;

                if strategy == ResolveStrategy::Hierarchical {
                    roots.sort_by(|a, b| rank_order(&a.1, &b.1));
                    for (root, m) in roots {
                        match res.trees.iter_mut().find(|t| t.root == root) {
                            Some(tree) => tree.matches.push(m),
                            None => res.trees.push(CategoryTree {
                                root,
                                matches: vec![m],
                            }),
                        }
                    }
                }
            }
        }

        if !res.matches.is_empty() {
            self.resolved.fetch_add(1, Ordering::Relaxed);
        }
        res
    }

    async fn validate(&self, cat: &Category, testable: &Value) -> bool {
        let Some(validator) = &cat.validator else {
            return true;
        };
        match tokio::time::timeout(self.validator_timeout, validator(testable.clone())).await {
            Ok(Ok(pass)) => pass,
            Ok(Err(error)) => {
                tracing::debug!(category = %cat.id, %error, "category validator failed");
                false
            }
            Err(_) => {
                self.validator_timeouts.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    category = %cat.id,
                    timeout_ms = self.validator_timeout.as_millis() as u64,
                    "category validator timed out"
                );
                false
            }
        }
    }
}

/// Higher score first, then the deeper (more specific) category.
fn rank_order(a: &CategoryMatch, b: &CategoryMatch) -> std::cmp::Ordering {
    b.score.cmp(&a.score).then(b.depth.cmp(&a.depth))
}

fn rank(matches: &mut [CategoryMatch]) {
    matches.sort_by(rank_order);
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;
    use serde_json::json;

    use super::*;

    fn media_registry() -> CategoryRegistry {
        let reg = CategoryRegistry::default();
        reg.register(
            "images",
            vec![CategoryPattern::regex("(?i)image")],
            CategoryOptions::default(),
        )
        .unwrap();
        reg.register(
            "raster-images",
            vec![CategoryPattern::regex(r"(?i)\.(jpe?g|png)")],
            CategoryOptions::default().parent("images"),
        )
        .unwrap();
        reg
    }

    #[tokio::test]
    async fn specific_prefers_the_child() {
        let reg = media_registry();
        let photo = Value::from(json!({"type": "image", "src": "photo.jpg"}));

        let specific = reg
            .resolve(&photo, ResolveStrategy::Specific, &ResolveContext::default())
            .await;
        assert_eq!(specific.primary_id(), Some("raster-images"));

        let all = reg
            .resolve(&photo, ResolveStrategy::All, &ResolveContext::default())
            .await;
        assert!(all.contains("images"));
        assert!(all.contains("raster-images"));
    }

    #[tokio::test]
    async fn plain_string_resolves_child_only() {
        let reg = media_registry();
        let res = reg
            .resolve(
                &Value::from("photo.jpg"),
                ResolveStrategy::Specific,
                &ResolveContext::default(),
            )
            .await;
        assert_eq!(res.ids(), vec!["raster-images"]);
    }

    #[tokio::test]
    async fn hierarchical_groups_under_topmost_ancestor() {
        let reg = media_registry();
        let photo = Value::from(json!({"type": "image", "src": "photo.jpg"}));
        let res = reg
            .resolve(&photo, ResolveStrategy::Hierarchical, &ResolveContext::default())
            .await;
        assert_eq!(res.trees.len(), 1);
        assert_eq!(res.trees[0].root, "images");
        assert_eq!(res.trees[0].matches.len(), 2);
    }

    #[test]
    fn cycles_are_rejected() {
        let reg = CategoryRegistry::default();
        reg.register("a", vec!["a".into()], CategoryOptions::default())
            .unwrap();
        reg.register("b", vec!["b".into()], CategoryOptions::default().parent("a"))
            .unwrap();
        let err = reg
            .register("a", vec!["a".into()], CategoryOptions::default().parent("b"))
            .unwrap_err();
        assert_eq!(err.as_label(), "category_cycle");
        assert!(reg
            .register("c", vec![], CategoryOptions::default().parent("c"))
            .is_err());
        assert_eq!(reg.ancestors("b"), vec!["a".to_string()]);
    }

    #[test]
    fn unknown_parent_becomes_synthetic_and_can_be_upgraded() {
        let reg = CategoryRegistry::default();
        reg.register(
            "png",
            vec!["png".into()],
            CategoryOptions::default().parent("media"),
        )
        .unwrap();
        assert!(reg.get_category("media").unwrap().is_synthetic());
        assert_eq!(reg.children("media"), vec!["png".to_string()]);

        reg.register("media", vec!["media".into()], CategoryOptions::default())
            .unwrap();
        let media = reg.get_category("media").unwrap();
        assert!(!media.is_synthetic());
        assert_eq!(media.children().collect::<Vec<_>>(), vec!["png"]);
        assert_eq!(reg.stats().synthetic, 0);
    }

    #[tokio::test]
    async fn disabled_categories_do_not_match() {
        let reg = media_registry();
        assert!(reg.disable_category("raster-images"));
        let res = reg
            .resolve(&Value::from("photo.jpg"), ResolveStrategy::All, &ResolveContext::default())
            .await;
        assert!(res.matches.is_empty());
        assert_eq!(reg.toggle_category("raster-images"), Some(true));
        assert_eq!(reg.toggle_category("missing"), None);
    }

    #[tokio::test]
    async fn dimensions_are_isolated() {
        let reg = CategoryRegistry::default();
        reg.register(
            "err",
            vec!["error".into()],
            CategoryOptions::default().dimension("severity"),
        )
        .unwrap();
        reg.register("net", vec!["error".into()], CategoryOptions::default())
            .unwrap();
        let res = reg
            .resolve(
                &Value::from("network error"),
                ResolveStrategy::All,
                &ResolveContext::in_dimension("severity"),
            )
            .await;
        assert_eq!(res.ids(), vec!["err"]);
        assert_eq!(reg.categories_in_dimension("severity").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_validator_counts_as_no_match() {
        let reg = CategoryRegistry::new(Duration::from_secs(1));
        reg.register(
            "slow",
            vec!["x".into()],
            CategoryOptions::default().validator(|_| {
                async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok::<_, String>(true)
                }
                .boxed()
            }),
        )
        .unwrap();
        reg.register(
            "fast",
            vec!["x".into()],
            CategoryOptions::default()
                .priority(-1)
                .validator(|_| async { Ok::<_, String>(true) }.boxed()),
        )
        .unwrap();

        let res = reg
            .resolve(&Value::from("x"), ResolveStrategy::First, &ResolveContext::default())
            .await;
        assert_eq!(res.primary_id(), Some("fast"));
        assert_eq!(reg.stats().validator_timeouts, 1);
    }

    #[test]
    fn batch_registration_counts() {
        let reg = CategoryRegistry::default();
        let n = reg
            .register_batch(vec![
                CategoryDef::new("a", vec!["a".into()], CategoryOptions::default()),
                CategoryDef::new("b", vec!["b".into()], CategoryOptions::default()),
            ])
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(reg.stats().categories, 2);
    }
}
