//! The simulated resource graph.
//!
//! Once the backend finishes applying a template the graph is read-only.
//! It lives for the duration of one harness run and is dropped afterward.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;

/// One resource created in the simulated backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulatedResource {
    pub logical_id: String,
    pub resource_type: String,
    /// Deterministic identifier the backend assigned at creation.
    pub physical_id: String,
}

/// Resources created from one template; edges are declared dependencies,
/// pointing from a resource to what it depends on.
#[derive(Debug, Clone)]
pub struct SimulatedResourceGraph {
    graph: DiGraph<SimulatedResource, ()>,

    /// Map from logical id to node index
    id_to_node: HashMap<String, NodeIndex>,
}

impl SimulatedResourceGraph {
    pub fn new() -> Self {
        SimulatedResourceGraph {
            graph: DiGraph::new(),
            id_to_node: HashMap::new(),
        }
    }

    /// Add a resource. Insertion order is creation order.
    pub fn add_resource(&mut self, resource: SimulatedResource) {
        if self.id_to_node.contains_key(&resource.logical_id) {
            return;
        }
        let logical_id = resource.logical_id.clone();
        let node = self.graph.add_node(resource);
        self.id_to_node.insert(logical_id, node);
    }

    /// Add a dependency edge. Both endpoints must already be resources.
    pub fn add_dependency(&mut self, from: &str, to: &str) {
        if let (Some(&from_node), Some(&to_node)) =
            (self.id_to_node.get(from), self.id_to_node.get(to))
        {
            if !self.graph.contains_edge(from_node, to_node) {
                self.graph.add_edge(from_node, to_node, ());
            }
        }
    }

    pub fn get(&self, logical_id: &str) -> Option<&SimulatedResource> {
        self.id_to_node.get(logical_id).map(|&n| &self.graph[n])
    }

    pub fn contains(&self, logical_id: &str) -> bool {
        self.id_to_node.contains_key(logical_id)
    }

    /// Resources in creation order.
    pub fn resources(&self) -> impl Iterator<Item = &SimulatedResource> {
        self.graph.node_weights()
    }

    /// Logical ids a resource depends on.
    pub fn dependencies_of(&self, logical_id: &str) -> Vec<&str> {
        match self.id_to_node.get(logical_id) {
            Some(&node) => self
                .graph
                .neighbors(node)
                .map(|n| self.graph[n].logical_id.as_str())
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Count resources per type for CLI output.
    pub fn summary(&self) -> GraphSummary {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for resource in self.resources() {
            match counts
                .iter_mut()
                .find(|(t, _)| *t == resource.resource_type)
            {
                Some((_, n)) => *n += 1,
                None => counts.push((resource.resource_type.clone(), 1)),
            }
        }
        counts.sort();
        GraphSummary {
            resource_count: self.len(),
            type_counts: counts,
        }
    }
}

impl Default for SimulatedResourceGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Created resource count and per-type breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphSummary {
    pub resource_count: usize,
    pub type_counts: Vec<(String, usize)>,
}

impl std::fmt::Display for GraphSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} resource(s)", self.resource_count)?;
        for (type_name, count) in &self.type_counts {
            write!(f, "\n  {} x{}", type_name, count)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(id: &str, type_name: &str) -> SimulatedResource {
        SimulatedResource {
            logical_id: id.to_string(),
            resource_type: type_name.to_string(),
            physical_id: format!("sim-{}", id.to_lowercase()),
        }
    }

    #[test]
    fn test_graph_basic() {
        let mut graph = SimulatedResourceGraph::new();
        graph.add_resource(resource("Vpc", "AWS::EC2::VPC"));
        graph.add_resource(resource("Subnet", "AWS::EC2::Subnet"));
        graph.add_dependency("Subnet", "Vpc");

        assert_eq!(graph.len(), 2);
        assert!(graph.contains("Vpc"));
        assert_eq!(graph.dependencies_of("Subnet"), vec!["Vpc"]);
        assert!(graph.dependencies_of("Vpc").is_empty());
    }

    #[test]
    fn test_resources_iterate_in_creation_order() {
        let mut graph = SimulatedResourceGraph::new();
        graph.add_resource(resource("A", "AWS::S3::Bucket"));
        graph.add_resource(resource("B", "AWS::S3::Bucket"));
        graph.add_resource(resource("C", "AWS::SQS::Queue"));

        let ids: Vec<&str> = graph.resources().map(|r| r.logical_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_summary_counts_types() {
        let mut graph = SimulatedResourceGraph::new();
        graph.add_resource(resource("A", "AWS::S3::Bucket"));
        graph.add_resource(resource("B", "AWS::S3::Bucket"));
        graph.add_resource(resource("Q", "AWS::SQS::Queue"));

        let summary = graph.summary();
        assert_eq!(summary.resource_count, 3);
        assert_eq!(
            summary.type_counts,
            vec![
                ("AWS::S3::Bucket".to_string(), 2),
                ("AWS::SQS::Queue".to_string(), 1),
            ]
        );
    }
}
