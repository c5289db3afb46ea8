//! Shared in-memory doubles for driving the workflow engine in tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use paperflow::events::{PromptChoice, Transport};
use paperflow::machine::WorkflowEngine;
use paperflow::operation::{Operation, OperationError, OperationOutput, OperationRequest};
use paperflow::session::SessionId;
use paperflow::storage::{ItemRef, OutputRef, Storage, StorageError};

/// In-memory staging areas keyed by session.
#[derive(Default)]
pub struct MemoryStorage {
    areas: Mutex<HashMap<SessionId, Vec<ItemRef>>>,
    fail_staging: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes every subsequent `stage` call fail.
    pub fn break_staging(&self) {
        self.fail_staging.store(true, Ordering::SeqCst);
    }

    pub fn staged_count(&self, session: &SessionId) -> usize {
        self.areas
            .lock()
            .unwrap()
            .get(session)
            .map(|items| items.len())
            .unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl Storage for MemoryStorage {
    async fn bootstrap(&self, session: &SessionId) -> Result<(), StorageError> {
        self.areas
            .lock()
            .unwrap()
            .entry(session.clone())
            .or_default();
        Ok(())
    }

    async fn area_exists(&self, session: &SessionId) -> bool {
        self.areas.lock().unwrap().contains_key(session)
    }

    async fn stage(
        &self,
        session: &SessionId,
        _source: &ItemRef,
        stored_name: &str,
    ) -> Result<ItemRef, StorageError> {
        if self.fail_staging.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("injected failure")));
        }
        let staged = ItemRef::new(format!("mem://{session}/{stored_name}"));
        let mut areas = self.areas.lock().unwrap();
        areas
            .entry(session.clone())
            .or_default()
            .push(staged.clone());
        Ok(staged)
    }

    async fn list_inputs(&self, session: &SessionId) -> Result<Vec<ItemRef>, StorageError> {
        let mut items = self
            .areas
            .lock()
            .unwrap()
            .get(session)
            .cloned()
            .unwrap_or_default();
        items.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(items)
    }

    async fn delete(&self, session: &SessionId, item: &ItemRef) -> Result<(), StorageError> {
        let mut areas = self.areas.lock().unwrap();
        let items = areas
            .get_mut(session)
            .ok_or_else(|| StorageError::NotFound(item.as_str().to_string()))?;
        let before = items.len();
        items.retain(|staged| staged != item);
        if items.len() == before {
            return Err(StorageError::NotFound(item.as_str().to_string()));
        }
        Ok(())
    }

    async fn purge(&self, session: &SessionId) -> Result<(), StorageError> {
        if let Some(items) = self.areas.lock().unwrap().get_mut(session) {
            items.clear();
        }
        Ok(())
    }
}

/// Everything the engine said, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Status(String),
    Prompt {
        text: String,
        choices: Vec<PromptChoice>,
    },
    Deliver {
        output: OutputRef,
        caption: String,
    },
}

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Outbound>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<Outbound> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<Outbound> {
        self.sent.lock().unwrap().last().cloned()
    }

    pub fn last_status(&self) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|outbound| match outbound {
                Outbound::Status(text) => Some(text.clone()),
                _ => None,
            })
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait::async_trait]
impl Transport for RecordingTransport {
    async fn status(&self, _session: &SessionId, text: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push(Outbound::Status(text.to_string()));
        Ok(())
    }

    async fn prompt(
        &self,
        _session: &SessionId,
        text: &str,
        choices: &[PromptChoice],
    ) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(Outbound::Prompt {
            text: text.to_string(),
            choices: choices.to_vec(),
        });
        Ok(())
    }

    async fn deliver(
        &self,
        _session: &SessionId,
        output: &OutputRef,
        caption: &str,
    ) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(Outbound::Deliver {
            output: output.clone(),
            caption: caption.to_string(),
        });
        Ok(())
    }
}

/// Scripted operation backend that records every request it sees.
pub struct StubOperation {
    requests: Mutex<Vec<OperationRequest>>,
    fail: AtomicBool,
    sizes: Option<(u64, u64)>,
}

impl StubOperation {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            sizes: None,
        })
    }

    pub fn with_sizes(input_bytes: u64, output_bytes: u64) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            sizes: Some((input_bytes, output_bytes)),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            fail: AtomicBool::new(true),
            sizes: None,
        })
    }

    pub fn requests(&self) -> Vec<OperationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Operation for StubOperation {
    async fn execute(&self, request: &OperationRequest) -> Result<OperationOutput, OperationError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(OperationError::Failed(request.kind));
        }
        let (input_bytes, output_bytes) = match self.sizes {
            Some((input, output)) => (Some(input), Some(output)),
            None => (None, None),
        };
        Ok(OperationOutput {
            output: OutputRef::new("mem://output/result.pdf"),
            input_bytes,
            output_bytes,
        })
    }
}

/// An engine wired to recording doubles, plus handles to inspect them.
pub struct Harness {
    pub engine: WorkflowEngine,
    pub storage: Arc<MemoryStorage>,
    pub transport: Arc<RecordingTransport>,
    pub operation: Arc<StubOperation>,
}

impl Harness {
    pub fn with_operation(operation: Arc<StubOperation>) -> Self {
        let storage = MemoryStorage::new();
        let transport = RecordingTransport::new();
        let engine = WorkflowEngine::new(
            storage.clone(),
            transport.clone(),
            operation.clone(),
            2,
        );
        Self {
            engine,
            storage,
            transport,
            operation,
        }
    }

    pub fn new() -> Self {
        Self::with_operation(StubOperation::succeeding())
    }
}
