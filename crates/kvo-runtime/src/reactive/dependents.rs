#![forbid(unsafe_code)]

//! Dependent-key graph: which composite keys derive from which base keys.
//!
//! Declarations are validated when they are made. A declaration that would
//! close a cycle is rejected and leaves the graph untouched, so propagation
//! never has to guard against runaway recursion.
//!
//! # Ordering
//!
//! Every key carries a rank: 0 for keys with no prerequisites, otherwise one
//! more than the highest-ranked prerequisite. [`DependencyGraph::affected_keys`]
//! returns dependents sorted by `(rank, name)`, which is a topological order:
//! a dependent never precedes any of its prerequisites.
//!
//! ```text
//! first ─┐
//!        ├─> fullName ─> greeting
//! last  ─┘
//! ```

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{KvoError, KvoResult};

/// Directed acyclic graph of dependent-key declarations.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// dependent -> the keys it is derived from
    prerequisites: BTreeMap<String, BTreeSet<String>>,
    /// prerequisite -> keys derived directly from it
    dependents: BTreeMap<String, BTreeSet<String>>,
    rank: BTreeMap<String, usize>,
}

impl DependencyGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `key` is derived from each key in `prerequisites`.
    ///
    /// Repeated declarations for the same key accumulate.
    ///
    /// # Errors
    ///
    /// [`KvoError::DependencyCycle`] if any new edge would make `key`
    /// (transitively) depend on itself. The graph is unchanged on error.
    pub fn declare<I, S>(&mut self, key: &str, prerequisites: I) -> KvoResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let incoming: Vec<String> = prerequisites.into_iter().map(Into::into).collect();
        for prerequisite in &incoming {
            if prerequisite == key {
                return Err(KvoError::DependencyCycle {
                    cycle: vec![key.to_owned(), key.to_owned()],
                });
            }
            // A new edge prerequisite -> key closes a cycle exactly when key
            // already reaches prerequisite.
            if let Some(mut path) = self.path_between(key, prerequisite) {
                path.push(key.to_owned());
                return Err(KvoError::DependencyCycle { cycle: path });
            }
        }

        for prerequisite in incoming {
            self.dependents
                .entry(prerequisite.clone())
                .or_default()
                .insert(key.to_owned());
            self.prerequisites
                .entry(key.to_owned())
                .or_default()
                .insert(prerequisite);
        }
        self.recompute_ranks();
        tracing::trace!(key, "declared dependent key");
        Ok(())
    }

    /// Transitive dependents of `key` in topological order, excluding `key`.
    #[must_use]
    pub fn affected_keys(&self, key: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            if let Some(direct) = self.dependents.get(current) {
                for dependent in direct {
                    if seen.insert(dependent.as_str()) {
                        stack.push(dependent);
                    }
                }
            }
        }
        let mut affected: Vec<&str> = seen.into_iter().collect();
        affected.sort_by_key(|k| (self.rank_of(k), *k));
        affected.into_iter().map(str::to_owned).collect()
    }

    /// Keys that `key` is directly derived from.
    pub fn prerequisites_of(&self, key: &str) -> impl Iterator<Item = &str> {
        self.prerequisites
            .get(key)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Keys derived directly from `key`.
    pub fn dependents_of(&self, key: &str) -> impl Iterator<Item = &str> {
        self.dependents
            .get(key)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    #[must_use]
    pub fn rank_of(&self, key: &str) -> usize {
        self.rank.get(key).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn has_dependents(&self, key: &str) -> bool {
        self.dependents.contains_key(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prerequisites.is_empty()
    }

    /// A dependency path `from -> ... -> to` following dependent edges.
    fn path_between(&self, from: &str, to: &str) -> Option<Vec<String>> {
        let mut visited = BTreeSet::new();
        let mut path = Vec::new();
        self.walk(from, to, &mut visited, &mut path).then_some(path)
    }

    fn walk<'a>(
        &'a self,
        current: &'a str,
        target: &str,
        visited: &mut BTreeSet<&'a str>,
        path: &mut Vec<String>,
    ) -> bool {
        path.push(current.to_owned());
        if current == target {
            return true;
        }
        if visited.insert(current) {
            for next in self.dependents_of(current) {
                if self.walk(next, target, visited, path) {
                    return true;
                }
            }
        }
        path.pop();
        false
    }

    fn recompute_ranks(&mut self) {
        let mut rank = BTreeMap::new();
        let keys: Vec<&String> = self.prerequisites.keys().collect();
        for key in keys {
            Self::rank_into(&self.prerequisites, key, &mut rank);
        }
        self.rank = rank;
    }

    fn rank_into(
        prerequisites: &BTreeMap<String, BTreeSet<String>>,
        key: &str,
        rank: &mut BTreeMap<String, usize>,
    ) -> usize {
        if let Some(&known) = rank.get(key) {
            return known;
        }
        let value = match prerequisites.get(key) {
            None => 0,
            Some(set) => {
                1 + set
                    .iter()
                    .map(|p| Self::rank_into(prerequisites, p, rank))
                    .max()
                    .unwrap_or(0)
            }
        };
        rank.insert(key.to_owned(), value);
        value
    }
}
