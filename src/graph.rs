// src/graph.rs

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Identity key of a node. Immutable once allocated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        NodeId(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        NodeId(id)
    }
}

/// Canvas coordinates of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// NaN and infinities have no JSON form and must never reach storage.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// The discriminant of a node. Only messages exist today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Message,
}

/// Palette entry describing how a node kind is offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeTypeConfig {
    pub kind: NodeKind,
    pub label: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub default_text: &'static str,
}

const MESSAGE_CONFIG: NodeTypeConfig = NodeTypeConfig {
    kind: NodeKind::Message,
    label: "Message",
    title: "Send Message",
    description: "Send a text message to the user",
    default_text: "Text Message",
};

impl NodeKind {
    pub const ALL: [NodeKind; 1] = [NodeKind::Message];

    pub fn config(&self) -> &'static NodeTypeConfig {
        match self {
            NodeKind::Message => &MESSAGE_CONFIG,
        }
    }
}

/// Kind-specific payload of a node: `type` names the kind, `data` carries its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum NodeContent {
    Message { text: String },
}

impl NodeContent {
    pub fn message(text: impl Into<String>) -> Self {
        NodeContent::Message { text: text.into() }
    }

    /// Default payload a freshly dropped node of `kind` starts with.
    pub fn default_for(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Message => NodeContent::message(kind.config().default_text),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            NodeContent::Message { .. } => NodeKind::Message,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            NodeContent::Message { text } => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Node {
    pub id: NodeId,
    pub position: Position,
    #[serde(flatten)]
    pub content: NodeContent,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, position: Position, content: NodeContent) -> Self {
        Self { id: id.into(), position, content }
    }

    pub fn kind(&self) -> NodeKind {
        self.content.kind()
    }

    pub fn text(&self) -> &str {
        self.content.text()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum EdgePath {
    #[default]
    SmoothStep,
    Straight,
    Bezier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ArrowMarker {
    pub closed: bool,
    pub width: u32,
    pub height: u32,
}

impl Default for ArrowMarker {
    fn default() -> Self {
        Self { closed: true, width: 20, height: 20 }
    }
}

/// How a directed link is drawn; carried along so a reloaded flow looks the same.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EdgeStyle {
    pub path: EdgePath,
    pub marker_end: ArrowMarker,
    pub stroke: String,
    pub stroke_width: u32,
}

impl Default for EdgeStyle {
    fn default() -> Self {
        Self {
            path: EdgePath::SmoothStep,
            marker_end: ArrowMarker::default(),
            stroke: "#3B82F6".to_string(),
            stroke_width: 2,
        }
    }
}

/// Directed transition from `source`'s single outgoing port to `target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Edge {
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default)]
    pub style: EdgeStyle,
}

impl Edge {
    pub fn new(source: NodeId, target: NodeId) -> Self {
        Self {
            id: Self::id_for(&source, &target),
            source,
            target,
            style: EdgeStyle::default(),
        }
    }

    /// Unique as long as every source has at most one outgoing edge.
    pub fn id_for(source: &NodeId, target: &NodeId) -> String {
        format!("edge-{}-{}", source, target)
    }

    pub fn touches(&self, node: &NodeId) -> bool {
        &self.source == node || &self.target == node
    }
}

/// Hands out `node_<n>` ids for one editing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdAllocator {
    prefix: String,
    next: u64,
}

impl Default for NodeIdAllocator {
    fn default() -> Self {
        Self::with_prefix("node_")
    }
}

impl NodeIdAllocator {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), next: 1 }
    }

    pub fn allocate(&mut self) -> NodeId {
        let id = NodeId(format!("{}{}", self.prefix, self.next));
        self.next += 1;
        id
    }

    /// Moves the counter past `id` if it is one of ours, so it is never handed out again.
    pub fn observe(&mut self, id: &NodeId) {
        let counter = id
            .as_str()
            .strip_prefix(self.prefix.as_str())
            .and_then(|n| n.parse::<u64>().ok());
        // the largest counter has no successor; it can never be allocated anyway
        if let Some(next) = counter.and_then(|n| n.checked_add(1)) {
            if next > self.next {
                self.next = next;
            }
        }
    }

    pub fn peek(&self) -> u64 {
        self.next
    }
}

/// The authoritative node/edge collections of the open flow.
///
/// Order is insertion order. Every mutation bumps `revision`, which the
/// session uses to skip structural comparisons when nothing happened.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    ids: NodeIdAllocator,
    selected: Option<NodeId>,
    revision: u64,
}

// content only: allocator state, selection and revision are session bookkeeping
impl PartialEq for Graph {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes && self.edges == other.edges
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_allocator(ids: NodeIdAllocator) -> Self {
        Self { ids, ..Self::default() }
    }

    /// Rebuilds a graph from persisted parts.
    ///
    /// Edges pointing at nodes that do not exist are dropped, and the
    /// allocator is advanced past every loaded id.
    pub fn from_parts(nodes: Vec<Node>, edges: Vec<Edge>, mut ids: NodeIdAllocator) -> Self {
        for node in &nodes {
            ids.observe(&node.id);
        }
        let (edges, dangling): (Vec<Edge>, Vec<Edge>) = edges.into_iter().partition(|e| {
            nodes.iter().any(|n| n.id == e.source) && nodes.iter().any(|n| n.id == e.target)
        });
        for edge in &dangling {
            warn!(edge = %edge.id, "dropping edge with a missing endpoint");
        }
        Self { nodes, edges, ids, selected: None, revision: 0 }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn allocator(&self) -> &NodeIdAllocator {
        &self.ids
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    /// Drops a fresh node of the only supported kind at `position`.
    pub fn add_node(&mut self, position: Position) -> Node {
        self.add_node_with(position, NodeContent::default_for(NodeKind::Message))
    }

    pub fn add_node_with(&mut self, position: Position, content: NodeContent) -> Node {
        let node = Node::new(self.ids.allocate(), position, content);
        debug!(node = %node.id, x = position.x, y = position.y, "node added");
        self.nodes.push(node.clone());
        self.touch();
        node
    }

    /// Links `source` to `target`.
    ///
    /// A source has at most one outgoing edge: any previous edge leaving
    /// `source` is evicted and the new one wins. Returns `None`, leaving the
    /// graph untouched, if either endpoint is not a node of this graph.
    pub fn connect(&mut self, source: &NodeId, target: &NodeId) -> Option<Edge> {
        if !self.contains(source) || !self.contains(target) {
            warn!(%source, %target, "refusing to connect unknown node");
            return None;
        }
        let before = self.edges.len();
        self.edges.retain(|e| &e.source != source);
        if self.edges.len() != before {
            debug!(%source, "replacing existing outgoing edge");
        }
        let edge = Edge::new(source.clone(), target.clone());
        self.edges.push(edge.clone());
        self.touch();
        Some(edge)
    }

    /// Replaces the text of `id`; unknown ids are ignored.
    pub fn update_node_text(&mut self, id: &NodeId, text: impl Into<String>) {
        let Some(node) = self.nodes.iter_mut().find(|n| &n.id == id) else {
            debug!(node = %id, "text edit for unknown node ignored");
            return;
        };
        match &mut node.content {
            NodeContent::Message { text: current } => *current = text.into(),
        }
        self.touch();
    }

    /// Removes `id` together with every edge that starts or ends at it.
    pub fn remove_node(&mut self, id: &NodeId) -> Option<Node> {
        let index = self.nodes.iter().position(|n| &n.id == id)?;
        let node = self.nodes.remove(index);
        self.edges.retain(|e| !e.touches(id));
        if self.selected.as_ref() == Some(id) {
            self.selected = None;
        }
        self.touch();
        Some(node)
    }

    pub fn remove_edge(&mut self, edge_id: &str) -> Option<Edge> {
        let index = self.edges.iter().position(|e| e.id == edge_id)?;
        let edge = self.edges.remove(index);
        self.touch();
        Some(edge)
    }

    pub fn incoming_edge_count(&self, id: &NodeId) -> usize {
        self.edges.iter().filter(|e| &e.target == id).count()
    }

    pub fn outgoing(&self, id: &NodeId) -> Option<&Edge> {
        self.edges.iter().find(|e| &e.source == id)
    }

    /// Selects `id` if it exists; returns whether the selection changed to it.
    pub fn select_node(&mut self, id: &NodeId) -> bool {
        if self.contains(id) {
            self.selected = Some(id.clone());
            true
        } else {
            false
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn selected_node(&self) -> Option<&Node> {
        self.selected.as_ref().and_then(|id| self.node(id))
    }
}
