// src/flow.rs

pub mod manager;
pub mod session;
pub mod storage;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::graph::{Edge, Node};

/// A named, persisted flow: the unit written to and read from storage.
///
/// `node_count`/`edge_count` are snapshots taken at save time so listings
/// do not have to look at the graph itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub node_count: usize,
    pub edge_count: usize,
}

impl Flow {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Flow {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            node_count: nodes.len(),
            edge_count: edges.len(),
            nodes,
            edges,
            created_at,
            updated_at,
        }
    }

    pub fn summary(&self) -> FlowSummary {
        FlowSummary::from(self)
    }
}

/// Metadata of a flow without its graph, as shown in the flow list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlowSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub node_count: usize,
    pub edge_count: usize,
}

impl From<&Flow> for FlowSummary {
    fn from(flow: &Flow) -> Self {
        FlowSummary {
            id: flow.id.clone(),
            name: flow.name.clone(),
            description: flow.description.clone(),
            created_at: flow.created_at,
            updated_at: flow.updated_at,
            node_count: flow.node_count,
            edge_count: flow.edge_count,
        }
    }
}
