use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Definition names mapped to their declared dependency names.
///
/// Nodes keep the order they were added in; that order breaks ties when
/// several definitions become runnable in the same pass.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<(String, Vec<String>)>,
    index: BTreeMap<String, usize>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a node. Replacing keeps the original position.
    pub fn add_node(&mut self, name: impl Into<String>, dependencies: Vec<String>) {
        let name = name.into();
        match self.index.get(&name) {
            Some(&position) => self.nodes[position].1 = dependencies,
            None => {
                self.index.insert(name.clone(), self.nodes.len());
                self.nodes.push((name, dependencies));
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn dependencies(&self, name: &str) -> Option<&[String]> {
        self.index
            .get(name)
            .map(|&position| self.nodes[position].1.as_slice())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|(_, deps)| deps.len()).sum()
    }

    /// Fail on the first dependency that names no node of the graph.
    fn ensure_complete(&self) -> Result<()> {
        for (_, dependencies) in &self.nodes {
            if let Some(missing) = dependencies.iter().find(|dep| !self.contains(dep)) {
                return Err(Error::MissingDefinition(missing.clone()));
            }
        }
        Ok(())
    }
}

impl<S: Into<String>> FromIterator<(S, Vec<String>)> for DependencyGraph {
    fn from_iter<I: IntoIterator<Item = (S, Vec<String>)>>(iter: I) -> Self {
        let mut graph = DependencyGraph::new();
        for (name, dependencies) in iter {
            graph.add_node(name, dependencies);
        }
        graph
    }
}

/// Compute an execution order for `run_only` (or every node) plus its
/// transitive dependencies.
///
/// Works as a fixpoint over scanning passes. A pass first grows the target
/// set with dependencies that are not yet targeted; only a pass that adds
/// nothing resolves names, in graph order, whose dependencies are all
/// resolved. A pass that neither grows the target nor resolves a name means
/// the remaining targets block each other.
pub fn resolve_order(graph: &DependencyGraph, run_only: Option<&[String]>) -> Result<Vec<String>> {
    graph.ensure_complete()?;

    let mut target: BTreeSet<&str> = match run_only {
        Some(names) => {
            let mut target = BTreeSet::new();
            for name in names {
                if !graph.contains(name) {
                    return Err(Error::MissingDefinition(name.clone()));
                }
                target.insert(name.as_str());
            }
            target
        }
        None => graph.names().collect(),
    };

    let mut resolved: Vec<String> = Vec::with_capacity(target.len());
    let mut done: BTreeSet<&str> = BTreeSet::new();

    while done.len() < target.len() {
        let mut grew = false;
        for (name, dependencies) in &graph.nodes {
            if !target.contains(name.as_str()) || done.contains(name.as_str()) {
                continue;
            }
            for dependency in dependencies {
                grew |= target.insert(dependency.as_str());
            }
        }
        if grew {
            continue;
        }

        let before = done.len();
        for (name, dependencies) in &graph.nodes {
            if !target.contains(name.as_str()) || done.contains(name.as_str()) {
                continue;
            }
            if dependencies.iter().all(|dep| done.contains(dep.as_str())) {
                done.insert(name.as_str());
                resolved.push(name.clone());
            }
        }

        if done.len() == before {
            let blocked = graph
                .names()
                .filter(|name| target.contains(name) && !done.contains(name))
                .map(str::to_string)
                .collect();
            return Err(Error::CircularDependency(blocked));
        }
    }

    Ok(resolved)
}

/// Summary of the dependency graph structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencySummary {
    pub nodes: usize,
    pub edges: usize,
}

/// Report for dependency ordering, used by dry runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyReport {
    pub summary: DependencySummary,
    pub order: Option<Vec<String>>,
    pub cycle: Option<Vec<String>>,
    pub missing: Option<String>,
}

/// Build a report for the graph instead of failing on the first problem.
pub fn build_dependency_report(
    graph: &DependencyGraph,
    run_only: Option<&[String]>,
) -> DependencyReport {
    let summary = DependencySummary {
        nodes: graph.len(),
        edges: graph.edge_count(),
    };

    match resolve_order(graph, run_only) {
        Ok(order) => DependencyReport {
            summary,
            order: Some(order),
            cycle: None,
            missing: None,
        },
        Err(Error::CircularDependency(names)) => DependencyReport {
            summary,
            order: None,
            cycle: Some(names),
            missing: None,
        },
        Err(err) => {
            let missing = match err {
                Error::MissingDefinition(name) => name,
                other => other.to_string(),
            };
            DependencyReport {
                summary,
                order: None,
                cycle: None,
                missing: Some(missing),
            }
        }
    }
}
