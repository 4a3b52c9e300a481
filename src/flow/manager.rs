// src/flow/manager.rs

use std::{fmt, sync::Arc};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::{
    config::EditorConfig,
    error::{SaveError, StorageError, ValidationError},
    flow::{session::FlowSession, storage::FlowStorage, Flow, FlowSummary},
    graph::{Edge, Graph, Node, NodeContent, NodeId, Position},
    state::{FileState, InMemoryState, StateStore},
    validation,
};

pub const NEW_FLOW_PROMPT: &str =
    "You have unsaved changes. Are you sure you want to create a new flow?";
pub const LEAVE_PROMPT: &str = "You have unsaved changes. Are you sure you want to leave?";

/// Where the open flow stands relative to what is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    /// Never saved, nothing edited since it was created.
    Untitled,
    /// Matches the last persisted (or loaded) snapshot.
    Clean,
    /// Diverges from the last clean snapshot.
    Dirty,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlowState::Untitled => "untitled",
            FlowState::Clean => "clean",
            FlowState::Dirty => "dirty",
        };
        f.write_str(s)
    }
}

/// Asks the user to confirm discarding unsaved work.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysConfirm;

impl Confirm for AlwaysConfirm {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NeverConfirm;

impl Confirm for NeverConfirm {
    fn confirm(&self, _prompt: &str) -> bool {
        false
    }
}

/// Binds editing intent to the open graph, the validator and the flow store.
///
/// Owns exactly one [`FlowSession`]. Mutations go through the manager so the
/// session's dirty tracking sees them; the persisted side only changes on
/// `save`, `delete_flow` and the current-flow pointer updates done by
/// `new_flow` and `load_flow`.
#[derive(Debug)]
pub struct FlowManager {
    storage: FlowStorage,
    session: FlowSession,
    default_name: String,
    default_node_text: String,
    node_id_prefix: String,
}

impl FlowManager {
    /// Starts an editor over `storage`, reopening the current flow if one is recorded.
    pub fn open(storage: FlowStorage, config: &EditorConfig) -> Self {
        let mut manager = Self {
            session: FlowSession::untitled(&config.default_flow_name, &config.node_id_prefix),
            storage,
            default_name: config.default_flow_name.clone(),
            default_node_text: config.default_node_text.clone(),
            node_id_prefix: config.node_id_prefix.clone(),
        };
        match manager.storage.current_flow_id() {
            Some(id) => {
                if !manager.load_flow(&id) {
                    warn!(flow = %id, "current flow pointer names a missing flow, starting fresh");
                }
            }
            None => info!("no current flow recorded, starting untitled"),
        }
        manager
    }

    /// Builds the store described by `config` and opens an editor on it.
    pub fn from_config(config: &EditorConfig) -> Result<Self, StorageError> {
        let store: Arc<dyn StateStore> = match (&config.storage_dir, config.quota_bytes) {
            (Some(dir), _) => FileState::new(dir)?,
            (None, Some(quota)) => InMemoryState::with_quota(quota),
            (None, None) => InMemoryState::new(),
        };
        info!(store = store.name(), "opening flow editor");
        let storage = FlowStorage::with_keys(store, &config.flows_key, &config.current_flow_key);
        Ok(Self::open(storage, config))
    }

    pub fn storage(&self) -> &FlowStorage {
        &self.storage
    }

    pub fn graph(&self) -> &Graph {
        self.session.graph()
    }

    pub fn nodes(&self) -> &[Node] {
        self.session.graph().nodes()
    }

    pub fn edges(&self) -> &[Edge] {
        self.session.graph().edges()
    }

    pub fn selected_node(&self) -> Option<&Node> {
        self.session.graph().selected_node()
    }

    pub fn flow_id(&self) -> Option<&str> {
        self.session.flow_id()
    }

    pub fn name(&self) -> &str {
        self.session.name()
    }

    pub fn description(&self) -> &str {
        self.session.description()
    }

    /// `true` once the open flow has a persisted record to update.
    pub fn is_persisted(&self) -> bool {
        self.session.flow_id().is_some()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.session.is_dirty()
    }

    pub fn state(&self) -> FlowState {
        if self.session.is_dirty() {
            FlowState::Dirty
        } else if self.session.flow_id().is_none() {
            FlowState::Untitled
        } else {
            FlowState::Clean
        }
    }

    /// The prompt a host should show before discarding the session, if any.
    pub fn exit_guard(&self) -> Option<&'static str> {
        self.has_unsaved_changes().then_some(LEAVE_PROMPT)
    }

    // --- graph mutations ---

    pub fn add_node(&mut self, position: Position) -> Node {
        let content = NodeContent::message(&self.default_node_text);
        self.session.graph_mut().add_node_with(position, content)
    }

    pub fn connect(&mut self, source: &NodeId, target: &NodeId) -> Option<Edge> {
        self.session.graph_mut().connect(source, target)
    }

    pub fn update_node_text(&mut self, id: &NodeId, text: impl Into<String>) {
        self.session.graph_mut().update_node_text(id, text)
    }

    pub fn remove_node(&mut self, id: &NodeId) -> Option<Node> {
        self.session.graph_mut().remove_node(id)
    }

    pub fn remove_edge(&mut self, edge_id: &str) -> Option<Edge> {
        self.session.graph_mut().remove_edge(edge_id)
    }

    pub fn select_node(&mut self, id: &NodeId) -> bool {
        self.session.graph_mut().select_node(id)
    }

    pub fn clear_selection(&mut self) {
        self.session.graph_mut().clear_selection()
    }

    // --- lifecycle ---

    /// Replaces the session with an empty untitled one.
    ///
    /// With unsaved changes `confirm` is asked first; a refusal leaves
    /// everything as it was and returns `false`.
    pub fn new_flow(&mut self, confirm: &dyn Confirm) -> bool {
        if self.has_unsaved_changes() && !confirm.confirm(NEW_FLOW_PROMPT) {
            debug!("new flow cancelled, keeping unsaved changes");
            return false;
        }
        self.session = FlowSession::untitled(&self.default_name, &self.node_id_prefix);
        if let Err(e) = self.storage.set_current_flow_id(None) {
            error!("Error clearing current flow: {}", e);
        }
        info!("started a new flow");
        true
    }

    /// Opens the stored flow `id`. Returns `false`, changing nothing, if it does not exist.
    pub fn load_flow(&mut self, id: &str) -> bool {
        let Some(flow) = self.storage.get_flow(id) else {
            debug!(flow = id, "load of unknown flow ignored");
            return false;
        };
        self.session = FlowSession::from_flow(&flow, &self.node_id_prefix);
        if let Err(e) = self.storage.set_current_flow_id(Some(&flow.id)) {
            error!("Error updating current flow: {}", e);
        }
        info!(
            flow = %flow.id,
            nodes = flow.node_count,
            edges = flow.edge_count,
            "loaded flow `{}`",
            flow.name
        );
        true
    }

    /// Runs the pre-save structural check on the open graph.
    pub fn check_save(&self) -> Result<(), ValidationError> {
        validation::validate(self.session.graph())
    }

    /// Validates and persists the open graph under `name`.
    ///
    /// Any failure leaves both the session and the store as they were.
    pub fn save(&mut self, name: &str, description: &str) -> Result<Flow, SaveError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SaveError::EmptyName);
        }
        if let Err(e) = self.check_save() {
            warn!("save refused: {}", e);
            return Err(e.into());
        }

        let graph = self.session.graph();
        let unreachable = validation::unreachable_nodes(graph);
        if !unreachable.is_empty() {
            warn!(count = unreachable.len(), "saving flow with nodes its entry point cannot reach");
        }

        let id = match self.session.flow_id() {
            Some(id) => id.to_string(),
            None => FlowStorage::generate_id(),
        };
        let now = Utc::now();
        let created_at = self
            .session
            .created_at()
            .or_else(|| self.storage.get_flow(&id).map(|f| f.created_at))
            .unwrap_or(now);
        let flow = Flow::new(
            id,
            name,
            description.trim(),
            graph.nodes().to_vec(),
            graph.edges().to_vec(),
            created_at,
            now,
        );

        self.storage.save_flow(&flow)?;
        if let Err(e) = self.storage.set_current_flow_id(Some(&flow.id)) {
            error!("Error updating current flow: {}", e);
        }
        self.session.mark_saved(&flow);
        Ok(flow)
    }

    /// Deletes a stored flow. The open session is not touched, even if it is that flow.
    ///
    /// Only a failure to rewrite the collection is an error; a stale
    /// current-flow pointer is logged and left for startup to ignore.
    pub fn delete_flow(&mut self, id: &str) -> Result<(), StorageError> {
        self.storage.delete_flow(id)?;
        if self.storage.current_flow_id().as_deref() == Some(id) {
            if let Err(e) = self.storage.set_current_flow_id(None) {
                error!("Error clearing current flow: {}", e);
            }
        }
        Ok(())
    }

    pub fn list_flows(&self) -> Vec<Flow> {
        self.storage.list_flows()
    }

    pub fn list_summaries(&self) -> Vec<FlowSummary> {
        self.storage.list_summaries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IntegrityFault;
    use std::cell::RefCell;

    /// In-memory store whose removals always fail.
    #[derive(Debug, Default)]
    struct StickyState {
        inner: InMemoryState,
    }

    impl StateStore for StickyState {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.inner.set(key, value)
        }

        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("removal disabled".to_string()))
        }

        fn name(&self) -> &'static str {
            "StickyState"
        }
    }

    fn manager() -> FlowManager {
        FlowManager::open(FlowStorage::new(InMemoryState::new()), &EditorConfig::default())
    }

    #[test]
    fn test_fresh_manager_is_untitled_and_clean() {
        let m = manager();
        assert_eq!(m.state(), FlowState::Untitled);
        assert!(!m.has_unsaved_changes());
        assert_eq!(m.name(), "Untitled Flow");
        assert_eq!(m.exit_guard(), None);
        assert!(!m.is_persisted());
    }

    #[test]
    fn test_edit_then_save_moves_through_states() {
        let mut m = manager();
        let a = m.add_node(Position::new(0.0, 0.0)).id;
        assert_eq!(m.state(), FlowState::Dirty);
        assert_eq!(m.exit_guard(), Some(LEAVE_PROMPT));

        let flow = m.save("  Solo  ", " one node ").unwrap();
        assert_eq!(flow.name, "Solo");
        assert_eq!(flow.description, "one node");
        assert_eq!(m.state(), FlowState::Clean);
        assert_eq!(m.flow_id(), Some(flow.id.as_str()));

        m.update_node_text(&a, "Hello");
        assert_eq!(m.state(), FlowState::Dirty);
    }

    #[test]
    fn test_blank_name_is_rejected_before_validation() {
        let mut m = manager();
        m.add_node(Position::default());
        m.add_node(Position::default());

        assert_eq!(m.save("   ", ""), Err(SaveError::EmptyName));
        assert!(matches!(m.save("Two roots", ""), Err(SaveError::Validation(_))));
        assert!(m.list_flows().is_empty());
        assert_eq!(m.state(), FlowState::Dirty);
    }

    #[test]
    fn test_new_flow_asks_only_when_dirty() {
        let mut m = manager();
        let asked = RefCell::new(Vec::new());
        let recorder = |prompt: &str| {
            asked.borrow_mut().push(prompt.to_string());
            false
        };

        assert!(m.new_flow(&recorder));
        assert!(asked.borrow().is_empty());

        m.add_node(Position::default());
        assert!(!m.new_flow(&recorder));
        assert_eq!(*asked.borrow(), vec![NEW_FLOW_PROMPT.to_string()]);
        assert_eq!(m.nodes().len(), 1);

        assert!(m.new_flow(&AlwaysConfirm));
        assert!(m.nodes().is_empty());
        assert_eq!(m.state(), FlowState::Untitled);
    }

    #[test]
    fn test_new_flow_restarts_node_ids() {
        let mut m = manager();
        m.add_node(Position::default());
        m.add_node(Position::default());
        m.new_flow(&AlwaysConfirm);
        assert_eq!(m.add_node(Position::default()).id.as_str(), "node_1");
    }

    #[test]
    fn test_never_confirm_keeps_session() {
        let mut m = manager();
        m.add_node(Position::default());
        assert!(!m.new_flow(&NeverConfirm));
        assert_eq!(m.state(), FlowState::Dirty);
    }

    #[test]
    fn test_load_unknown_flow_is_a_no_op() {
        let mut m = manager();
        m.add_node(Position::default());
        assert!(!m.load_flow("flow_missing"));
        assert_eq!(m.nodes().len(), 1);
        assert_eq!(m.state(), FlowState::Dirty);
    }

    #[test]
    fn test_configured_node_text_and_prefix() {
        let config = EditorConfig {
            default_node_text: "Say something".to_string(),
            node_id_prefix: "msg-".to_string(),
            ..EditorConfig::default()
        };
        let mut m = FlowManager::open(FlowStorage::new(InMemoryState::new()), &config);
        let node = m.add_node(Position::default());
        assert_eq!(node.id.as_str(), "msg-1");
        assert_eq!(node.text(), "Say something");
    }

    #[test]
    fn test_non_finite_position_is_refused_and_earlier_flows_survive() {
        let mut m = manager();
        let a = m.add_node(Position::new(0.0, 0.0)).id;
        let b = m.add_node(Position::new(200.0, 0.0)).id;
        m.connect(&a, &b);
        let good = m.save("Good", "").unwrap();

        m.new_flow(&AlwaysConfirm);
        m.add_node(Position::new(f64::NAN, 0.0));
        let err = m.save("Bad", "").unwrap_err();

        assert!(matches!(
            err,
            SaveError::Validation(ValidationError::Integrity(IntegrityFault::NonFinitePosition(_)))
        ));
        assert_eq!(m.state(), FlowState::Dirty);
        assert_eq!(m.list_flows(), vec![good.clone()]);
        assert!(m.storage().get_flow(&good.id).is_some());

        // the store is still writable afterwards
        m.new_flow(&AlwaysConfirm);
        m.add_node(Position::new(10.0, 10.0));
        m.save("Next", "").unwrap();
        assert_eq!(m.list_flows().len(), 2);
    }

    #[test]
    fn test_delete_succeeds_when_pointer_cannot_be_cleared() {
        let store = Arc::new(StickyState::default());
        let mut m = FlowManager::open(FlowStorage::new(store.clone()), &EditorConfig::default());
        m.add_node(Position::default());
        let saved = m.save("Doomed", "").unwrap();

        assert_eq!(m.delete_flow(&saved.id), Ok(()));
        assert!(m.list_flows().is_empty());
        // the stale pointer remains, and startup copes with it
        let reopened = FlowManager::open(FlowStorage::new(store), &EditorConfig::default());
        assert_eq!(reopened.state(), FlowState::Untitled);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(FlowState::Dirty.to_string(), "dirty");
        assert_eq!(FlowState::Untitled.to_string(), "untitled");
    }
}
