use crate::domain::model::InteractionCluster;
use serde::Serialize;
use std::collections::BTreeMap;

/// Graph-level attribute recording what produced the graph.
pub const CREATED_BY_ATTRIBUTE: &str = "created by";
pub const CREATED_BY_VALUE: &str = "PSICQUIC Web Service";
/// Graph-level attribute listing the originating services.
pub const SOURCE_SERVICES_ATTRIBUTE: &str = "source services";

/// A constructed interaction network, handed to the visualization consumer.
/// The core writes it once and never reads it back.
#[derive(Debug, Clone, Serialize)]
pub struct Graph {
    pub name: String,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub interaction_type: String,
    pub source_service: String,
    pub attributes: BTreeMap<String, String>,
}

impl Graph {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Node + edge count, the figure the consumer compares against its
    /// view-size threshold.
    pub fn object_count(&self) -> usize {
        self.nodes.len() + self.edges.len()
    }
}

/// Converts an immutable cluster into a graph: one node per distinct
/// interactor id, one edge per record (a self-interaction becomes a single
/// self-loop edge). Deterministic for identical cluster contents.
#[derive(Debug, Default)]
pub struct GraphBuilder;

impl GraphBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, label: &str, cluster: &InteractionCluster) -> Graph {
        let nodes = cluster
            .interactor_ids()
            .into_iter()
            .map(|id| GraphNode { id })
            .collect();

        let edges = cluster
            .records()
            .map(|record| GraphEdge {
                source: record.interactor_a.clone(),
                target: record.interactor_b.clone(),
                interaction_type: record.interaction_type.clone(),
                source_service: record.source_service.clone(),
                attributes: record.attributes.clone(),
            })
            .collect();

        let mut attributes = BTreeMap::new();
        attributes.insert(
            CREATED_BY_ATTRIBUTE.to_string(),
            CREATED_BY_VALUE.to_string(),
        );
        let sources: Vec<String> = cluster.source_services().into_iter().collect();
        if !sources.is_empty() {
            attributes.insert(SOURCE_SERVICES_ATTRIBUTE.to_string(), sources.join(", "));
        }

        Graph {
            name: timestamped_name(label),
            nodes,
            edges,
            attributes,
        }
    }
}

/// Display name: source label plus import timestamp.
fn timestamped_name(label: &str) -> String {
    let timestamp = chrono::Local::now().format("%Y/%m/%d %H:%M:%S");
    format!("{} ({})", label, timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::InteractionRecord;
    use std::collections::BTreeMap as Map;

    fn record(a: &str, b: &str, source: &str) -> InteractionRecord {
        InteractionRecord {
            interactor_a: a.to_string(),
            interactor_b: b.to_string(),
            interaction_type: "direct interaction".to_string(),
            source_service: source.to_string(),
            attributes: Map::new(),
        }
    }

    #[test]
    fn test_empty_cluster_builds_empty_graph() {
        let graph = GraphBuilder::new().build("IntAct", &InteractionCluster::new());
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.object_count(), 0);
        assert!(graph.name.starts_with("IntAct ("));
    }

    #[test]
    fn test_self_interaction_builds_single_loop() {
        let mut cluster = InteractionCluster::new();
        cluster.append(record("P1", "P1", "svc"));

        let graph = GraphBuilder::new().build("svc", &cluster);
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.nodes[0].id, "P1");
        assert_eq!(graph.edges[0].source, "P1");
        assert_eq!(graph.edges[0].target, "P1");
    }

    #[test]
    fn test_node_set_is_distinct_interactors() {
        let mut cluster = InteractionCluster::new();
        cluster.append(record("P1", "P2", "svc"));
        cluster.append(record("P2", "P3", "svc"));
        cluster.append(record("P1", "P2", "svc"));

        let graph = GraphBuilder::new().build("svc", &cluster);
        assert_eq!(graph.node_count(), 3);
        // One edge per record, duplicates included.
        assert_eq!(graph.edge_count(), 3);
    }

    #[test]
    fn test_build_is_idempotent_on_same_cluster() {
        let mut cluster = InteractionCluster::new();
        cluster.append(record("P1", "P2", "svc-a"));
        cluster.append(record("P2", "P1", "svc-b"));

        let builder = GraphBuilder::new();
        let first = builder.build("merged", &cluster);
        let second = builder.build("merged", &cluster);

        assert_eq!(first.nodes, second.nodes);
        assert_eq!(first.edges, second.edges);
        assert_eq!(first.attributes, second.attributes);
    }

    #[test]
    fn test_provenance_attributes() {
        let mut cluster = InteractionCluster::new();
        cluster.append(record("P1", "P2", "svc-b"));
        cluster.append(record("P3", "P4", "svc-a"));

        let graph = GraphBuilder::new().build("merged", &cluster);
        assert_eq!(
            graph.attributes.get(CREATED_BY_ATTRIBUTE).unwrap(),
            CREATED_BY_VALUE
        );
        assert_eq!(
            graph.attributes.get(SOURCE_SERVICES_ATTRIBUTE).unwrap(),
            "svc-a, svc-b"
        );
    }
}
