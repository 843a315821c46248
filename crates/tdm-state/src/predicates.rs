//! Static invalidation graph.
//!
//! Edges are declared once, at registry construction: "`dependent` is
//! predicated on `key`".  Setting or dropping `key` then drops every
//! dependent, transitively.  The graph is checked for cycles when built, so
//! the cascade always terminates.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::{StateError, StateResult};

/// Collects predicate edges; [`build`](Self::build) validates them.
#[derive(Default)]
pub struct PredicateGraphBuilder {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl PredicateGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `dependent` must be dropped whenever `on` changes.
    pub fn predicate(&mut self, dependent: impl Into<String>, on: impl Into<String>) -> &mut Self {
        self.edges.entry(on.into()).or_default().insert(dependent.into());
        self
    }

    /// Reject cycles (Kahn's algorithm) and freeze the graph.
    pub fn build(self) -> StateResult<PredicateGraph> {
        let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
        for (key, deps) in &self.edges {
            in_degree.entry(key.as_str()).or_insert(0);
            for d in deps {
                *in_degree.entry(d.as_str()).or_insert(0) += 1;
            }
        }

        let mut ready: VecDeque<&str> = in_degree.iter().filter(|(_, n)| **n == 0).map(|(k, _)| *k).collect();
        let mut visited = 0usize;
        while let Some(key) = ready.pop_front() {
            visited += 1;
            for d in self.edges.get(key).into_iter().flatten() {
                let n = in_degree.get_mut(d.as_str()).map(|n| {
                    *n -= 1;
                    *n
                });
                if n == Some(0) {
                    ready.push_back(d.as_str());
                }
            }
        }

        if visited != in_degree.len() {
            let cycle: Vec<String> = in_degree
                .into_iter()
                .filter(|(_, n)| *n > 0)
                .map(|(k, _)| k.to_owned())
                .collect();
            return Err(StateError::PredicateCycle(cycle));
        }
        Ok(PredicateGraph { edges: self.edges })
    }
}

/// Validated, acyclic key → dependents map.
#[derive(Default)]
pub struct PredicateGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl PredicateGraph {
    pub fn dependents(&self, key: &str) -> impl Iterator<Item = &str> {
        self.edges.get(key).into_iter().flatten().map(String::as_str)
    }

    /// Every key reachable from `key`, breadth first, each listed once.
    pub fn cascade(&self, key: &str) -> Vec<String> {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut order = Vec::new();
        let mut work: VecDeque<&str> = self.dependents(key).collect();
        while let Some(k) = work.pop_front() {
            if !seen.insert(k) {
                continue;
            }
            order.push(k.to_owned());
            work.extend(self.dependents(k));
        }
        order
    }
}
