// src/flow/session.rs

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::{
    flow::Flow,
    graph::{Graph, NodeIdAllocator},
};

/// The last clean point of a session: the graph as it was persisted (or
/// created), plus the revision it had at that moment.
#[derive(Debug, Clone)]
struct Baseline {
    revision: u64,
    graph: Graph,
}

impl Baseline {
    fn of(graph: &Graph) -> Self {
        Self { revision: graph.revision(), graph: graph.clone() }
    }
}

/// One open flow: its graph, its metadata and what it looked like when it
/// was last clean.
#[derive(Debug, Clone)]
pub struct FlowSession {
    graph: Graph,
    flow_id: Option<String>,
    name: String,
    description: String,
    created_at: Option<DateTime<Utc>>,
    node_id_prefix: String,
    baseline: Baseline,
}

impl FlowSession {
    /// An untitled session with an empty graph; the baseline is the empty graph.
    pub fn untitled(name: impl Into<String>, node_id_prefix: impl Into<String>) -> Self {
        let node_id_prefix = node_id_prefix.into();
        let graph = Graph::with_allocator(NodeIdAllocator::with_prefix(node_id_prefix.clone()));
        Self {
            baseline: Baseline::of(&graph),
            graph,
            flow_id: None,
            name: name.into(),
            description: String::new(),
            created_at: None,
            node_id_prefix,
        }
    }

    /// A clean session holding a copy of `flow`.
    pub fn from_flow(flow: &Flow, node_id_prefix: impl Into<String>) -> Self {
        let node_id_prefix = node_id_prefix.into();
        let graph = Graph::from_parts(
            flow.nodes.clone(),
            flow.edges.clone(),
            NodeIdAllocator::with_prefix(node_id_prefix.clone()),
        );
        Self {
            baseline: Baseline::of(&graph),
            graph,
            flow_id: Some(flow.id.clone()),
            name: flow.name.clone(),
            description: flow.description.clone(),
            created_at: Some(flow.created_at),
            node_id_prefix,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn flow_id(&self) -> Option<&str> {
        self.flow_id.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn node_id_prefix(&self) -> &str {
        &self.node_id_prefix
    }

    /// Whether the graph differs from the baseline.
    ///
    /// An unchanged revision means nothing was touched; otherwise the full
    /// node/edge collections are compared, so edits that net out read clean.
    pub fn is_dirty(&self) -> bool {
        if self.graph.revision() == self.baseline.revision {
            return false;
        }
        self.graph != self.baseline.graph
    }

    /// Adopts the result of a successful save: identity, metadata and a new baseline.
    pub fn mark_saved(&mut self, flow: &Flow) {
        self.flow_id = Some(flow.id.clone());
        self.name = flow.name.clone();
        self.description = flow.description.clone();
        self.created_at = Some(flow.created_at);
        self.rebase();
    }

    /// Takes the current graph as the new clean point.
    pub fn rebase(&mut self) {
        debug!(revision = self.graph.revision(), "dirty-tracking baseline rebased");
        self.baseline = Baseline::of(&self.graph);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Node, NodeContent, NodeId, Position};

    fn stored_flow() -> Flow {
        let now = Utc::now();
        Flow::new(
            "flow_1",
            "Stored",
            "from disk",
            vec![
                Node::new("node_1", Position::new(0.0, 0.0), NodeContent::message("hi")),
                Node::new("node_2", Position::new(200.0, 0.0), NodeContent::message("bye")),
            ],
            vec![Edge::new("node_1".into(), "node_2".into())],
            now,
            now,
        )
    }

    #[test]
    fn test_untitled_session_starts_clean() {
        let session = FlowSession::untitled("Untitled Flow", "node_");
        assert!(!session.is_dirty());
        assert_eq!(session.flow_id(), None);
        assert_eq!(session.name(), "Untitled Flow");
        assert!(session.graph().is_empty());
    }

    #[test]
    fn test_edits_make_session_dirty_until_rebased() {
        let mut session = FlowSession::untitled("Untitled Flow", "node_");
        session.graph_mut().add_node(Position::default());
        assert!(session.is_dirty());

        session.rebase();
        assert!(!session.is_dirty());
    }

    #[test]
    fn test_edit_that_nets_out_reads_clean() {
        let mut session = FlowSession::from_flow(&stored_flow(), "node_");
        let id = NodeId::from("node_1");

        session.graph_mut().update_node_text(&id, "changed");
        assert!(session.is_dirty());
        session.graph_mut().update_node_text(&id, "hi");
        assert!(!session.is_dirty());
    }

    #[test]
    fn test_selection_alone_is_not_an_edit() {
        let mut session = FlowSession::from_flow(&stored_flow(), "node_");
        session.graph_mut().select_node(&NodeId::from("node_2"));
        assert!(!session.is_dirty());
    }

    #[test]
    fn test_from_flow_copies_metadata_and_advances_ids() {
        let flow = stored_flow();
        let mut session = FlowSession::from_flow(&flow, "node_");

        assert_eq!(session.flow_id(), Some("flow_1"));
        assert_eq!(session.description(), "from disk");
        assert_eq!(session.created_at(), Some(flow.created_at));
        assert_eq!(session.graph_mut().add_node(Position::default()).id.as_str(), "node_3");
    }
}
