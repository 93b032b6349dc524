//! Dependency graph over a domain's foreign-key configs and topological ordering

use crate::error::{CoreError, CoreResult};
use crate::foreign_key::ForeignKeyConfig;
use crate::names::ForeignKeyName;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Directed graph of `depends_on` relationships within one domain.
///
/// Node indices follow declaration order, which is what breaks ties when
/// several configs are ready at the same time.
#[derive(Debug)]
pub struct ForeignKeyDag {
    /// Edges run from prerequisite to dependent
    graph: DiGraph<ForeignKeyName, ()>,

    /// Map from config name to node index
    node_map: HashMap<ForeignKeyName, NodeIndex>,
}

impl ForeignKeyDag {
    /// Build and validate the graph for one domain.
    ///
    /// Fails on duplicate names, unknown dependencies and cycles; nothing
    /// touches the database before this succeeds.
    pub fn build(domain: &str, configs: &[ForeignKeyConfig]) -> CoreResult<Self> {
        let mut graph = DiGraph::new();
        let mut node_map = HashMap::new();

        for fk in configs {
            if node_map.contains_key(&fk.name) {
                return Err(CoreError::DuplicateForeignKey {
                    name: fk.name.to_string(),
                    domain: domain.to_string(),
                });
            }
            let idx = graph.add_node(fk.name.clone());
            node_map.insert(fk.name.clone(), idx);
        }

        for fk in configs {
            let dependent = node_map[&fk.name];
            for dep in &fk.depends_on {
                let prerequisite =
                    *node_map
                        .get(dep)
                        .ok_or_else(|| CoreError::UnknownDependency {
                            name: fk.name.to_string(),
                            dependency: dep.to_string(),
                        })?;
                graph.update_edge(prerequisite, dependent, ());
            }
        }

        let dag = Self { graph, node_map };
        dag.resolve_order()?;
        Ok(dag)
    }

    /// Configs in dependency order (prerequisites first), via Kahn's algorithm.
    ///
    /// Among configs that are ready together, the one declared first goes first.
    pub fn resolve_order(&self) -> CoreResult<Vec<ForeignKeyName>> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|n| self.graph.neighbors_directed(n, Direction::Incoming).count())
            .collect();

        let mut ready: BTreeSet<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|n| in_degree[n.index()] == 0)
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(idx) = ready.pop_first() {
            order.push(self.graph[idx].clone());
            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                in_degree[next.index()] -= 1;
                if in_degree[next.index()] == 0 {
                    ready.insert(next);
                }
            }
        }

        if order.len() < self.graph.node_count() {
            return Err(CoreError::CircularDependency {
                cycle: self.describe_cycles(),
            });
        }
        Ok(order)
    }

    /// Names of every config on a cycle, in declaration order
    fn describe_cycles(&self) -> String {
        let mut members: Vec<NodeIndex> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]))
            .flatten()
            .collect();
        members.sort();
        members
            .iter()
            .map(|idx| self.graph[*idx].to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Direct prerequisites of a config
    pub fn dependencies(&self, name: &str) -> Vec<ForeignKeyName> {
        self.neighbors(name, Direction::Incoming)
    }

    /// Direct dependents of a config
    pub fn dependents(&self, name: &str) -> Vec<ForeignKeyName> {
        self.neighbors(name, Direction::Outgoing)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<ForeignKeyName> {
        let Some(&idx) = self.node_map.get(name) else {
            return Vec::new();
        };
        let mut out: Vec<NodeIndex> = self.graph.neighbors_directed(idx, direction).collect();
        out.sort();
        out.into_iter().map(|n| self.graph[n].clone()).collect()
    }

    /// Every config that transitively depends on `name`
    pub fn descendants(&self, name: &str) -> HashSet<ForeignKeyName> {
        let mut result = HashSet::new();
        let Some(&start) = self.node_map.get(name) else {
            return result;
        };
        let mut stack = vec![start];
        while let Some(idx) = stack.pop() {
            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if result.insert(self.graph[next].clone()) {
                    stack.push(next);
                }
            }
        }
        result
    }

    /// Check if a config exists in the graph
    pub fn contains(&self, name: &str) -> bool {
        self.node_map.contains_key(name)
    }
}

/// Order a domain's configs so every config follows all of its `depends_on`.
pub fn resolve_order<'a>(
    domain: &str,
    configs: &'a [ForeignKeyConfig],
) -> CoreResult<Vec<&'a ForeignKeyConfig>> {
    let dag = ForeignKeyDag::build(domain, configs)?;
    let by_name: HashMap<&str, &ForeignKeyConfig> =
        configs.iter().map(|fk| (fk.name.as_str(), fk)).collect();
    let order = dag.resolve_order()?;
    log::debug!(
        "Foreign key order for domain '{}': {}",
        domain,
        order
            .iter()
            .map(|n| n.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    );
    Ok(order.iter().map(|name| by_name[name.as_str()]).collect())
}

#[cfg(test)]
#[path = "resolver_test.rs"]
mod tests;
