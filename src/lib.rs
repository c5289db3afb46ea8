// Paperflow Library - Session Workflow Engine for Staged File Batch Operations
// This exposes the core components for testing and integration

pub mod cleanup;
pub mod config;
pub mod events;
pub mod machine;
pub mod operation;
pub mod orchestrator;
pub mod registry;
pub mod session;
pub mod storage;
pub mod store;
pub mod telemetry;

// Re-export key types for easy access
pub use cleanup::CleanupService;
pub use config::PaperflowConfig;
pub use events::{Choice, Command, InboundEvent, PromptChoice, Transport};
pub use machine::{EngineError, WorkflowEngine};
pub use operation::{
    format_size, InputArity, Operation, OperationError, OperationOutput, OperationParams,
    OperationRequest, PageSelection, ParamKind, WorkflowKind,
};
pub use orchestrator::WorkflowOrchestrator;
pub use registry::SessionRegistry;
pub use session::{PendingData, Session, SessionId, SessionState};
pub use storage::{FsStorage, ItemRef, OutputRef, Storage, StorageError};
pub use store::{
    position_prefix, prefix_capacity, FileEntry, MoveOutcome, OrderedFileStore, StoreError,
};
pub use telemetry::{create_session_span, generate_correlation_id, init_telemetry};
