//! Graph-editing, validation and local persistence for chat-bot message flows.
//!
//! A [`flow::manager::FlowManager`] owns the open flow: its node/edge
//! [`graph::Graph`], the dirty-tracking baseline and a
//! [`flow::storage::FlowStorage`] over some [`state::StateStore`].

pub mod config;
pub mod error;
pub mod flow;
pub mod graph;
pub mod logger;
pub mod schema;
pub mod state;
pub mod validation;

pub use error::{IntegrityFault, SaveError, StorageError, ValidationError};
pub use flow::{
    Flow, FlowSummary,
    manager::{AlwaysConfirm, Confirm, FlowManager, FlowState, NeverConfirm},
    storage::FlowStorage,
};
pub use graph::{Edge, Graph, Node, NodeContent, NodeId, NodeKind, Position};
