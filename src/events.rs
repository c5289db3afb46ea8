/// Inbound event and outbound notification contract
///
/// Transport adapters decode their wire format (slash commands, callback
/// tags, uploads) into these types exactly once at the boundary; the engine
/// never sees free-text action tokens.
use serde::{Deserialize, Serialize};

use crate::operation::WorkflowKind;
use crate::session::SessionId;
use crate::storage::{ItemRef, OutputRef};

/// Commands a transport can decode from user text. `Freeform` carries plain
/// text (output names, passwords, page ranges) in the event's `arg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Start,
    Help,
    Begin(WorkflowKind),
    Done,
    Freeform,
}

/// Structured choice tags: an explicit action plus its typed argument,
/// never an encoded string token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Choice {
    ConfirmOrder,
    ModifyOrder,
    Reorder,
    DeleteItem,
    InsertItem,
    AbortWorkflow,
    /// An item picked by position (move/delete sub-flows).
    PickItem(u32),
    /// Where a picked item should go.
    MoveTarget(u32),
    /// Where a new item should be inserted, 1..=N+1.
    InsertPosition(u32),
}

/// Events delivered to a session, processed strictly in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InboundEvent {
    ItemSubmitted {
        item: ItemRef,
        display_name: String,
    },
    TextCommand {
        command: Command,
        arg: Option<String>,
    },
    ChoiceSelected(Choice),
    Cancel,
}

impl InboundEvent {
    pub fn freeform(text: impl Into<String>) -> Self {
        InboundEvent::TextCommand {
            command: Command::Freeform,
            arg: Some(text.into()),
        }
    }

    pub fn command(command: Command) -> Self {
        InboundEvent::TextCommand { command, arg: None }
    }
}

/// One selectable option attached to a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptChoice {
    pub label: String,
    pub choice: Choice,
}

impl PromptChoice {
    pub fn new(label: impl Into<String>, choice: Choice) -> Self {
        Self {
            label: label.into(),
            choice,
        }
    }
}

/// Outbound side of the conversation. Implemented by transport adapters;
/// delivery failures are the adapter's to retry, the engine only logs them.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Plain informational message.
    async fn status(&self, session: &SessionId, text: &str) -> anyhow::Result<()>;

    /// Message with a set of selectable choices.
    async fn prompt(
        &self,
        session: &SessionId,
        text: &str,
        choices: &[PromptChoice],
    ) -> anyhow::Result<()>;

    /// Hands a produced artifact back to the user.
    async fn deliver(
        &self,
        session: &SessionId,
        output: &OutputRef,
        caption: &str,
    ) -> anyhow::Result<()>;
}
