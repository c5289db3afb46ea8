use serde::{Deserialize, Serialize};

use crate::operation::{OperationParams, PageSelection, WorkflowKind};
use crate::store::OrderedFileStore;

/// Opaque per-conversation identity, assigned by the external transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Conversation states a session walks through. `Idle` is both initial and
/// terminal; a session idles between workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    CollectingItems,
    ConfirmingOrder,
    ChoosingModification,
    SelectingItemToMove,
    SelectingMoveTarget,
    SelectingItemToDelete,
    SelectingInsertPosition,
    AwaitingSpecificItem,
    AwaitingOutputParameters,
    Processing,
}

/// In-flight parameters accumulated while walking a workflow. Cleared as a
/// whole on every reset.
#[derive(Debug, Clone, Default)]
pub struct PendingData {
    pub workflow: Option<WorkflowKind>,
    pub output_name: Option<String>,
    pub password: Option<String>,
    pub pages: Option<PageSelection>,
    /// Target position recorded while awaiting the file to insert.
    pub insert_position: Option<u32>,
    /// Source position recorded between picking an item and picking where
    /// it goes.
    pub move_from: Option<u32>,
}

impl PendingData {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn operation_params(&self) -> OperationParams {
        OperationParams {
            output_name: self.output_name.clone(),
            password: self.password.clone(),
            pages: self.pages.clone(),
        }
    }
}

/// The per-conversation unit of state: current machine state, pending
/// parameters, the ordered staged set, and the in-flight operation marker.
/// Owned exclusively by the session's worker task for its lifetime.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub state: SessionState,
    pub pending: PendingData,
    pub store: OrderedFileStore,
    pub active_operation: Option<WorkflowKind>,
    staged_seq: u32,
}

impl Session {
    pub fn new(id: SessionId, max_items: u32) -> Self {
        Self {
            id,
            state: SessionState::Idle,
            pending: PendingData::default(),
            store: OrderedFileStore::new(max_items),
            active_operation: None,
            staged_seq: 0,
        }
    }

    /// Monotonic counter for staged file names. Positions are freed and
    /// reused as the store is edited; this never is, so stored names stay
    /// unique for the session's lifetime.
    pub fn next_stage_seq(&mut self) -> u32 {
        self.staged_seq += 1;
        self.staged_seq
    }
}
