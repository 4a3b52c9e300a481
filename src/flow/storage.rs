// src/flow/storage.rs

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tracing::{debug, error, info};

use crate::{
    error::StorageError,
    flow::{Flow, FlowSummary},
    state::StateStore,
};

pub const FLOWS_STORAGE_KEY: &str = "chatbot_flows";
pub const CURRENT_FLOW_KEY: &str = "current_flow_id";

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Named flows plus the "currently open" pointer, on top of any [`StateStore`].
///
/// All flows live as one JSON array under a single key, so every write
/// replaces the whole collection or nothing. Reads never fail: a missing or
/// corrupt collection is logged and treated as empty.
#[derive(Debug, Clone)]
pub struct FlowStorage {
    store: Arc<dyn StateStore>,
    flows_key: String,
    current_key: String,
}

impl FlowStorage {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self::with_keys(store, FLOWS_STORAGE_KEY, CURRENT_FLOW_KEY)
    }

    pub fn with_keys(
        store: Arc<dyn StateStore>,
        flows_key: impl Into<String>,
        current_key: impl Into<String>,
    ) -> Self {
        Self { store, flows_key: flows_key.into(), current_key: current_key.into() }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    fn read_all(&self) -> Result<Vec<Flow>, StorageError> {
        match self.store.get(&self.flows_key)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    fn write_all(&self, flows: &[Flow]) -> Result<(), StorageError> {
        // serde_json writes NaN as `null`, which would make the whole collection unreadable
        let bad = flows.iter().flat_map(|f| &f.nodes).find(|n| !n.position.is_finite());
        if let Some(node) = bad {
            return Err(StorageError::Serialization(format!(
                "node `{}` has a non-finite position",
                node.id
            )));
        }
        let json = serde_json::to_string(flows)?;
        self.store.set(&self.flows_key, &json)
    }

    /// Every persisted flow, or an empty list if the store cannot be read.
    pub fn list_flows(&self) -> Vec<Flow> {
        self.read_all().unwrap_or_else(|e| {
            error!("Error loading flows: {}", e);
            Vec::new()
        })
    }

    pub fn list_summaries(&self) -> Vec<FlowSummary> {
        self.list_flows().iter().map(FlowSummary::from).collect()
    }

    pub fn get_flow(&self, id: &str) -> Option<Flow> {
        self.list_flows().into_iter().find(|f| f.id == id)
    }

    /// Replaces the flow with the same id, or appends it.
    ///
    /// Refuses to write when the existing collection cannot be parsed, so a
    /// corrupt store is never silently replaced by a single flow.
    pub fn save_flow(&self, flow: &Flow) -> Result<(), StorageError> {
        let mut flows = self.read_all().inspect_err(|e| error!("Error saving flow: {}", e))?;
        match flows.iter_mut().find(|f| f.id == flow.id) {
            Some(existing) => *existing = flow.clone(),
            None => flows.push(flow.clone()),
        }
        self.write_all(&flows).inspect_err(|e| error!("Error saving flow: {}", e))?;
        info!(
            flow = %flow.id,
            nodes = flow.node_count,
            edges = flow.edge_count,
            "saved flow `{}`",
            flow.name
        );
        Ok(())
    }

    /// Removes the flow with `id`; an unknown id is not an error.
    pub fn delete_flow(&self, id: &str) -> Result<(), StorageError> {
        let mut flows = self.read_all().inspect_err(|e| error!("Error deleting flow: {}", e))?;
        let before = flows.len();
        flows.retain(|f| f.id != id);
        if flows.len() == before {
            debug!(flow = id, "delete of unknown flow ignored");
            return Ok(());
        }
        self.write_all(&flows).inspect_err(|e| error!("Error deleting flow: {}", e))?;
        info!(flow = id, "deleted flow");
        Ok(())
    }

    /// Points at the flow to reopen next session; `None` clears the pointer.
    pub fn set_current_flow_id(&self, id: Option<&str>) -> Result<(), StorageError> {
        match id {
            Some(id) => self.store.set(&self.current_key, id),
            None => self.store.remove(&self.current_key),
        }
    }

    pub fn current_flow_id(&self) -> Option<String> {
        match self.store.get(&self.current_key) {
            Ok(id) => id.filter(|id| !id.is_empty()),
            Err(e) => {
                error!("Error reading current flow id: {}", e);
                None
            }
        }
    }

    /// `flow_<unix millis>_<9 random base36 chars>`.
    pub fn generate_id() -> String {
        let mut rng = rand::rng();
        let suffix: String = (0..9)
            .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
            .collect();
        format!("flow_{}_{}", Utc::now().timestamp_millis(), suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InMemoryState;
    use std::collections::HashSet;

    fn flow(id: &str, name: &str) -> Flow {
        let now = Utc::now();
        Flow::new(id, name, "", vec![], vec![], now, now)
    }

    #[test]
    fn test_save_appends_then_replaces_by_id() {
        let storage = FlowStorage::new(InMemoryState::new());
        storage.save_flow(&flow("a", "First")).unwrap();
        storage.save_flow(&flow("b", "Second")).unwrap();
        storage.save_flow(&flow("a", "First, renamed")).unwrap();

        let flows = storage.list_flows();
        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0].name, "First, renamed");
        assert_eq!(flows[1].name, "Second");
        assert_eq!(storage.get_flow("b").map(|f| f.name), Some("Second".to_string()));
        assert!(storage.get_flow("zzz").is_none());
    }

    #[test]
    fn test_corrupt_collection_reads_as_empty_but_blocks_writes() {
        let store = InMemoryState::new();
        store.set(FLOWS_STORAGE_KEY, "{not json").unwrap();
        let storage = FlowStorage::new(store.clone());

        assert!(storage.list_flows().is_empty());
        assert!(storage.get_flow("a").is_none());
        assert!(matches!(storage.save_flow(&flow("a", "x")), Err(StorageError::Serialization(_))));
        assert_eq!(store.get(FLOWS_STORAGE_KEY).unwrap().as_deref(), Some("{not json"));
    }

    #[test]
    fn test_delete_unknown_id_leaves_store_untouched() {
        let store = InMemoryState::new();
        let storage = FlowStorage::new(store.clone());
        storage.save_flow(&flow("a", "Keep")).unwrap();
        let before = store.get(FLOWS_STORAGE_KEY).unwrap();

        storage.delete_flow("missing").unwrap();

        assert_eq!(store.get(FLOWS_STORAGE_KEY).unwrap(), before);
        storage.delete_flow("a").unwrap();
        assert!(storage.list_flows().is_empty());
    }

    #[test]
    fn test_quota_failure_keeps_previous_collection() {
        let store = InMemoryState::with_quota(600);
        let storage = FlowStorage::new(store);
        storage.save_flow(&flow("a", "small")).unwrap();

        let huge = flow("b", &"x".repeat(1_000));
        let err = storage.save_flow(&huge).unwrap_err();

        assert!(matches!(err, StorageError::QuotaExceeded { .. }));
        assert_eq!(storage.list_flows().len(), 1);
    }

    #[test]
    fn test_non_finite_position_is_never_written() {
        use crate::graph::{Node, NodeContent, Position};

        let store = InMemoryState::new();
        let storage = FlowStorage::new(store.clone());
        storage.save_flow(&flow("a", "Good")).unwrap();
        let before = store.get(FLOWS_STORAGE_KEY).unwrap();

        let mut bad = flow("b", "Bad");
        let at = Position::new(f64::INFINITY, 0.0);
        let stray = Node::new("node_1", at, NodeContent::message("x"));
        bad.nodes.push(stray);
        let err = storage.save_flow(&bad).unwrap_err();

        assert!(matches!(err, StorageError::Serialization(_)));
        assert_eq!(store.get(FLOWS_STORAGE_KEY).unwrap(), before);
        assert_eq!(storage.list_flows().len(), 1);
    }

    #[test]
    fn test_current_flow_pointer() {
        let storage = FlowStorage::new(InMemoryState::new());
        assert_eq!(storage.current_flow_id(), None);

        storage.set_current_flow_id(Some("flow_1")).unwrap();
        assert_eq!(storage.current_flow_id().as_deref(), Some("flow_1"));

        storage.set_current_flow_id(None).unwrap();
        assert_eq!(storage.current_flow_id(), None);
    }

    #[test]
    fn test_custom_keys_are_isolated() {
        let store = InMemoryState::new();
        let left = FlowStorage::with_keys(store.clone(), "left_flows", "left_current");
        let right = FlowStorage::with_keys(store, "right_flows", "right_current");
        left.save_flow(&flow("a", "left")).unwrap();

        assert_eq!(left.list_flows().len(), 1);
        assert!(right.list_flows().is_empty());
    }

    #[test]
    fn test_generate_id_shape_and_uniqueness() {
        let ids: HashSet<String> = (0..100).map(|_| FlowStorage::generate_id()).collect();
        assert_eq!(ids.len(), 100);

        let id = ids.iter().next().unwrap();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "flow");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2].chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_summaries_mirror_flows() {
        let storage = FlowStorage::new(InMemoryState::new());
        storage.save_flow(&flow("a", "One")).unwrap();
        let summaries = storage.list_summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, "a");
    }
}
