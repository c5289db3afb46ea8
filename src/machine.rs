/// Session state machine: guarded transitions over inbound events
///
/// Dispatch is one exhaustive `match` over `(state, event)`. Any pair not
/// listed is rejected: the user is told the input was not expected and
/// nothing mutates. Store and state errors are recovered locally into user
/// messages; storage failures force a full session reset because the staged
/// set's relationship to the outside world is no longer trustworthy.
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cleanup::CleanupService;
use crate::events::{Choice, Command, InboundEvent, PromptChoice, Transport};
use crate::operation::{
    InputArity, Operation, PageSelection, PageSelectionError, ParamKind, WorkflowKind,
};
use crate::orchestrator::WorkflowOrchestrator;
use crate::session::{Session, SessionId, SessionState};
use crate::store::{position_prefix, prefix_capacity, MoveOutcome, StoreError};
use crate::storage::{ItemRef, Storage, StorageError};

/// Everything that can go wrong while handling an event. All variants except
/// `Storage` are recovered locally (user message, no state change);
/// `Storage` forces a full reset.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("event not valid in state {0:?}")]
    InvalidTransition(SessionState),

    #[error("unsupported item type: {0}")]
    UnsupportedItemType(String),

    #[error("no items staged")]
    EmptyCollection,

    #[error("only one item staged")]
    SingleItemCollection,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    PageSelection(#[from] PageSelectionError),

    #[error("an operation is already in flight")]
    OperationInFlight,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl EngineError {
    /// What the user is told. Raw diagnostics stay in the logs.
    fn user_message(&self) -> String {
        match self {
            EngineError::InvalidTransition(_) => {
                "I wasn't expecting that right now. Send help if you're lost.".to_string()
            }
            EngineError::UnsupportedItemType(name) => {
                format!("`{name}` is not a file type I can work with here.")
            }
            EngineError::EmptyCollection => "You didn't send any files.".to_string(),
            EngineError::SingleItemCollection => {
                "You sent only one file. What am I supposed to combine it with?".to_string()
            }
            EngineError::Store(StoreError::OutOfRange { position, max }) => {
                format!("Position {position} doesn't exist here (valid up to {max}).")
            }
            EngineError::Store(StoreError::CapacityExceeded { max_items }) => {
                format!("I can only hold {max_items} files per batch.")
            }
            EngineError::PageSelection(err) => format!("{err}. Try something like `3-5, 7`."),
            EngineError::OperationInFlight => {
                "Hold on, I'm still working on the current operation.".to_string()
            }
            EngineError::Storage(_) => {
                "I ran into storage trouble and had to start over. Please try again.".to_string()
            }
        }
    }
}

/// The conversation engine for one or more sessions. Stateless itself; all
/// per-session state lives in the `Session` handed to `handle_event`.
pub struct WorkflowEngine {
    storage: Arc<dyn Storage>,
    transport: Arc<dyn Transport>,
    cleanup: Arc<CleanupService>,
    orchestrator: WorkflowOrchestrator,
    prefix_width: usize,
}

impl WorkflowEngine {
    pub fn new(
        storage: Arc<dyn Storage>,
        transport: Arc<dyn Transport>,
        operation: Arc<dyn Operation>,
        prefix_width: usize,
    ) -> Self {
        let cleanup = Arc::new(CleanupService::new(Arc::clone(&storage)));
        let orchestrator =
            WorkflowOrchestrator::new(Arc::clone(&transport), operation, Arc::clone(&cleanup));
        Self {
            storage,
            transport,
            cleanup,
            orchestrator,
            prefix_width,
        }
    }

    /// Largest staged set a session can hold, bounded by the position
    /// prefix width used for external file names.
    pub fn max_items(&self) -> u32 {
        prefix_capacity(self.prefix_width)
    }

    pub fn new_session(&self, id: SessionId) -> Session {
        Session::new(id, self.max_items())
    }

    /// Resets a session whose conversation went silent mid-workflow.
    /// Quiet: no outbound message, the user walked away.
    pub async fn expire(&self, session: &mut Session) {
        if session.state != SessionState::Idle || !session.store.is_empty() {
            info!(session = %session.id, state = ?session.state, "idle session expired");
            self.cleanup.reset(session).await;
        }
    }

    pub async fn handle_event(&self, session: &mut Session, event: InboundEvent) {
        let from_state = session.state;
        match (session.state, event) {
            (SessionState::Idle, InboundEvent::TextCommand { command: Command::Start, .. }) => {
                self.on_start(session).await;
            }
            (_, InboundEvent::TextCommand { command: Command::Help, .. }) => {
                self.on_help(session).await;
            }
            (
                SessionState::Idle,
                InboundEvent::TextCommand { command: Command::Begin(kind), .. },
            ) => {
                self.on_begin(session, kind).await;
            }
            (SessionState::Idle, InboundEvent::Cancel) => {
                self.say(session, "Nothing to cancel.").await;
            }
            (_, InboundEvent::Cancel) => {
                self.on_cancel(session).await;
            }
            (
                SessionState::CollectingItems,
                InboundEvent::ItemSubmitted { item, display_name },
            ) => {
                self.on_item_collected(session, item, display_name).await;
            }
            (
                SessionState::CollectingItems,
                InboundEvent::TextCommand { command: Command::Done, .. },
            ) => {
                self.on_done_collecting(session).await;
            }
            (
                SessionState::ConfirmingOrder,
                InboundEvent::ChoiceSelected(Choice::ConfirmOrder),
            ) => {
                self.prompt_next_parameter(session).await;
            }
            (SessionState::ConfirmingOrder, InboundEvent::ChoiceSelected(Choice::ModifyOrder)) => {
                self.on_modify(session).await;
            }
            (
                SessionState::ChoosingModification,
                InboundEvent::ChoiceSelected(
                    choice @ (Choice::Reorder
                    | Choice::DeleteItem
                    | Choice::InsertItem
                    | Choice::AbortWorkflow),
                ),
            ) => {
                self.on_modification_choice(session, choice).await;
            }
            (
                SessionState::SelectingItemToMove,
                InboundEvent::ChoiceSelected(Choice::PickItem(position)),
            ) => {
                self.on_pick_item_to_move(session, position).await;
            }
            (
                SessionState::SelectingMoveTarget,
                InboundEvent::ChoiceSelected(Choice::MoveTarget(position)),
            ) => {
                self.on_move_target(session, position).await;
            }
            (
                SessionState::SelectingItemToDelete,
                InboundEvent::ChoiceSelected(Choice::PickItem(position)),
            ) => {
                self.on_pick_item_to_delete(session, position).await;
            }
            (
                SessionState::SelectingInsertPosition,
                InboundEvent::ChoiceSelected(Choice::InsertPosition(position)),
            ) => {
                self.on_insert_position(session, position).await;
            }
            (
                SessionState::AwaitingSpecificItem,
                InboundEvent::ItemSubmitted { item, display_name },
            ) => {
                self.on_specific_item(session, item, display_name).await;
            }
            (
                SessionState::AwaitingOutputParameters,
                InboundEvent::TextCommand { command: Command::Freeform, arg: Some(text) },
            ) => {
                self.on_parameter(session, text).await;
            }
            (SessionState::Processing, _) => {
                self.report(session, EngineError::OperationInFlight).await;
            }
            (state, event) => {
                debug!(session = %session.id, state = ?state, event = ?event, "event rejected");
                self.report(session, EngineError::InvalidTransition(state))
                    .await;
            }
        }
        if session.state != from_state {
            info!(
                session = %session.id,
                from_state = ?from_state,
                to_state = ?session.state,
                "state transition"
            );
        }
    }

    async fn on_start(&self, session: &mut Session) {
        if let Err(err) = self.storage.bootstrap(&session.id).await {
            self.storage_failure(session, err).await;
            return;
        }
        let workflows = WorkflowKind::all()
            .iter()
            .map(|kind| format!("  {kind}"))
            .collect::<Vec<_>>()
            .join("\n");
        self.say(
            session,
            &format!(
                "Hello! I stage your files and run batch operations on them.\n\n\
                 What I can do:\n{workflows}\n\nSend help for more."
            ),
        )
        .await;
    }

    async fn on_help(&self, session: &Session) {
        self.say(
            session,
            "Pick an operation, send the file(s) it asks for, then follow the \
             prompts. You can reorder, delete, or insert staged files before \
             confirming. Cancel aborts the current operation at any point.",
        )
        .await;
    }

    async fn on_begin(&self, session: &mut Session, kind: WorkflowKind) {
        if let Err(err) = self.storage.bootstrap(&session.id).await {
            self.storage_failure(session, err).await;
            return;
        }
        session.pending.workflow = Some(kind);
        session.state = SessionState::CollectingItems;
        let text = match kind.input_arity() {
            InputArity::Many => format!(
                "Alright, send me the files you want to {kind}. \
                 Tell me you're done when you've sent them all."
            ),
            InputArity::One => format!("Alright, send me the file you want to {kind}."),
        };
        self.say(session, &text).await;
    }

    async fn on_cancel(&self, session: &mut Session) {
        info!(session = %session.id, state = ?session.state, "workflow cancelled");
        self.cleanup.reset(session).await;
        self.say(session, "Operation cancelled.").await;
    }

    async fn on_item_collected(&self, session: &mut Session, item: ItemRef, display_name: String) {
        let Some(kind) = session.pending.workflow else {
            self.report(session, EngineError::InvalidTransition(session.state))
                .await;
            return;
        };
        if !kind.accepts(&display_name) {
            self.report(session, EngineError::UnsupportedItemType(display_name))
                .await;
            return;
        }
        let position = session.store.count() + 1;
        if position > session.store.max_items() {
            self.report(
                session,
                EngineError::Store(StoreError::CapacityExceeded {
                    max_items: session.store.max_items(),
                }),
            )
            .await;
            return;
        }

        let staged = match self.stage_item(session, &item, &display_name, position).await {
            Ok(staged) => staged,
            Err(err) => {
                self.storage_failure(session, err).await;
                return;
            }
        };
        if let Err(err) = session.store.append(sanitize_name(&display_name), staged) {
            self.report(session, EngineError::Store(err)).await;
            return;
        }

        match kind.input_arity() {
            InputArity::One => self.prompt_next_parameter(session).await,
            InputArity::Many => {
                self.say(
                    session,
                    "Got it. Send more files if you have them, or tell me you're done.",
                )
                .await;
            }
        }
    }

    async fn on_done_collecting(&self, session: &mut Session) {
        match session.store.count() {
            0 => self.report(session, EngineError::EmptyCollection).await,
            1 if matches!(
                session.pending.workflow.map(|k| k.input_arity()),
                Some(InputArity::Many)
            ) =>
            {
                self.report(session, EngineError::SingleItemCollection).await;
            }
            _ => self.present_confirmation(session).await,
        }
    }

    async fn on_modify(&self, session: &mut Session) {
        session.state = SessionState::ChoosingModification;
        let choices = vec![
            PromptChoice::new("I want to rearrange the order of the files", Choice::Reorder),
            PromptChoice::new("I want to delete a file", Choice::DeleteItem),
            PromptChoice::new("I want to add another file", Choice::InsertItem),
            PromptChoice::new("I changed my mind, cancel this", Choice::AbortWorkflow),
        ];
        let text = format!(
            "Choose one of the options below.\n\n{}",
            self.numbered_list(session)
        );
        self.ask(session, &text, &choices).await;
    }

    async fn on_modification_choice(&self, session: &mut Session, choice: Choice) {
        match choice {
            Choice::Reorder => {
                session.state = SessionState::SelectingItemToMove;
                let choices = self.item_choices(session);
                self.ask(session, "Choose the file you want to move.", &choices)
                    .await;
            }
            Choice::DeleteItem => {
                session.state = SessionState::SelectingItemToDelete;
                let choices = self.item_choices(session);
                self.ask(session, "Choose the file you want to delete.", &choices)
                    .await;
            }
            Choice::InsertItem => {
                if session.store.count() >= session.store.max_items() {
                    self.report(
                        session,
                        EngineError::Store(StoreError::CapacityExceeded {
                            max_items: session.store.max_items(),
                        }),
                    )
                    .await;
                    self.present_confirmation(session).await;
                    return;
                }
                session.state = SessionState::SelectingInsertPosition;
                let choices =
                    self.position_choices(session.store.count() + 1, Choice::InsertPosition);
                self.ask(session, "Choose where to add the new file.", &choices)
                    .await;
            }
            Choice::AbortWorkflow => {
                self.on_cancel(session).await;
            }
            _ => unreachable!("guarded by the dispatch match"),
        }
    }

    async fn on_pick_item_to_move(&self, session: &mut Session, position: u32) {
        let count = session.store.count();
        if position < 1 || position > count {
            self.report(
                session,
                EngineError::Store(StoreError::OutOfRange { position, max: count }),
            )
            .await;
            return;
        }
        session.pending.move_from = Some(position);
        session.state = SessionState::SelectingMoveTarget;
        let choices = self.position_choices(count, Choice::MoveTarget);
        self.ask(session, "Choose where you want to move it.", &choices)
            .await;
    }

    async fn on_move_target(&self, session: &mut Session, position: u32) {
        let Some(from) = session.pending.move_from.take() else {
            self.report(session, EngineError::InvalidTransition(session.state))
                .await;
            return;
        };
        match session.store.move_to(from, position) {
            Ok(MoveOutcome::Moved) => {}
            Ok(MoveOutcome::NoEffect) => {
                self.say(session, "That leaves everything exactly where it was.")
                    .await;
            }
            Err(err) => {
                self.report(session, EngineError::Store(err)).await;
            }
        }
        // confirmation is never skipped after a mutation attempt
        self.present_confirmation(session).await;
    }

    async fn on_pick_item_to_delete(&self, session: &mut Session, position: u32) {
        if session.store.count() == 1 {
            // a single remaining item cannot satisfy the terminal operation
            self.say(
                session,
                "Can't let you do that. There would be nothing left for me to work with.",
            )
            .await;
            self.present_confirmation(session).await;
            return;
        }
        match session.store.delete_at(position) {
            Ok(removed) => {
                if let Err(err) = self.storage.delete(&session.id, &removed.storage_ref).await {
                    self.storage_failure(session, err).await;
                    return;
                }
                info!(session = %session.id, position, "staged file deleted");
            }
            Err(err) => {
                self.report(session, EngineError::Store(err)).await;
            }
        }
        self.present_confirmation(session).await;
    }

    async fn on_insert_position(&self, session: &mut Session, position: u32) {
        let max = session.store.count() + 1;
        if position < 1 || position > max {
            self.report(
                session,
                EngineError::Store(StoreError::OutOfRange { position, max }),
            )
            .await;
            return;
        }
        session.pending.insert_position = Some(position);
        session.state = SessionState::AwaitingSpecificItem;
        self.say(
            session,
            &format!("Alright, send me the file and I'll put it at position {position}."),
        )
        .await;
    }

    async fn on_specific_item(&self, session: &mut Session, item: ItemRef, display_name: String) {
        let Some(kind) = session.pending.workflow else {
            self.report(session, EngineError::InvalidTransition(session.state))
                .await;
            return;
        };
        if !kind.accepts(&display_name) {
            self.report(session, EngineError::UnsupportedItemType(display_name))
                .await;
            return;
        }
        let Some(position) = session.pending.insert_position.take() else {
            self.report(session, EngineError::InvalidTransition(session.state))
                .await;
            return;
        };

        let staged = match self.stage_item(session, &item, &display_name, position).await {
            Ok(staged) => staged,
            Err(err) => {
                self.storage_failure(session, err).await;
                return;
            }
        };
        if let Err(err) = session
            .store
            .insert_at(position, sanitize_name(&display_name), staged)
        {
            self.report(session, EngineError::Store(err)).await;
        }
        self.present_confirmation(session).await;
    }

    async fn on_parameter(&self, session: &mut Session, text: String) {
        let Some(kind) = session.pending.workflow else {
            self.report(session, EngineError::InvalidTransition(session.state))
                .await;
            return;
        };
        let Some(param) = next_missing_parameter(session, kind) else {
            self.report(session, EngineError::InvalidTransition(session.state))
                .await;
            return;
        };
        match param {
            ParamKind::OutputName => {
                session.pending.output_name = Some(normalize_output_name(&text));
            }
            ParamKind::Password => {
                session.pending.password = Some(text);
            }
            ParamKind::PageRange => match PageSelection::parse(&text) {
                Ok(selection) => session.pending.pages = Some(selection),
                Err(err) => {
                    self.report(session, EngineError::PageSelection(err)).await;
                    return;
                }
            },
        }
        self.prompt_next_parameter(session).await;
    }

    /// Asks for the next missing parameter, or runs the operation once the
    /// sequence is complete.
    async fn prompt_next_parameter(&self, session: &mut Session) {
        let Some(kind) = session.pending.workflow else {
            self.report(session, EngineError::InvalidTransition(session.state))
                .await;
            return;
        };
        match next_missing_parameter(session, kind) {
            Some(param) => {
                session.state = SessionState::AwaitingOutputParameters;
                let text = match param {
                    ParamKind::OutputName => "What should the output file be called?",
                    ParamKind::Password => "Type the password you want to use.",
                    ParamKind::PageRange => {
                        "Which pages do you want?\n\nExamples:\n3-5 \u{2192} pages 3, 4 and 5\n\
                         7 \u{2192} just the 7th page\n3-5, 7 \u{2192} pages 3, 4, 5 and 7"
                    }
                };
                self.say(session, text).await;
            }
            None => self.orchestrator.run(session).await,
        }
    }

    /// Re-presents the current order for a fresh yes/no confirmation.
    async fn present_confirmation(&self, session: &mut Session) {
        session.state = SessionState::ConfirmingOrder;
        let label = session
            .pending
            .workflow
            .map(|kind| kind.label())
            .unwrap_or("process");
        let text = format!(
            "Are these the files you want to {label}, in this order?\n\n{}",
            self.numbered_list(session)
        );
        let choices = vec![
            PromptChoice::new("Yes", Choice::ConfirmOrder),
            PromptChoice::new("No", Choice::ModifyOrder),
        ];
        self.ask(session, &text, &choices).await;
    }

    async fn stage_item(
        &self,
        session: &mut Session,
        item: &ItemRef,
        display_name: &str,
        position: u32,
    ) -> Result<ItemRef, StorageError> {
        // The prefix mirrors the position at staging time for readable
        // listings only. Deletes and moves free positions for reuse, so the
        // sequence number is what keeps stored names collision-free.
        let stored_name = format!(
            "{}_{:03}_{}",
            position_prefix(position, self.prefix_width),
            session.next_stage_seq(),
            sanitize_name(display_name)
        );
        self.storage.stage(&session.id, item, &stored_name).await
    }

    /// Fatal for the current workflow: the staged set can no longer be
    /// trusted, so the session is reset outright.
    async fn storage_failure(&self, session: &mut Session, err: StorageError) {
        warn!(session = %session.id, error = %err, "storage failure, resetting session");
        let message = EngineError::Storage(err).user_message();
        self.cleanup.reset(session).await;
        self.say(session, &message).await;
    }

    async fn report(&self, session: &Session, err: EngineError) {
        debug!(session = %session.id, error = %err, "recovered engine error");
        self.say(session, &err.user_message()).await;
    }

    fn numbered_list(&self, session: &Session) -> String {
        session
            .store
            .list()
            .iter()
            .map(|entry| format!("{}. {}", entry.position, entry.display_name))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn item_choices(&self, session: &Session) -> Vec<PromptChoice> {
        session
            .store
            .list()
            .iter()
            .map(|entry| PromptChoice::new(entry.display_name.clone(), Choice::PickItem(entry.position)))
            .collect()
    }

    fn position_choices(&self, count: u32, choice: impl Fn(u32) -> Choice) -> Vec<PromptChoice> {
        (1..=count)
            .map(|position| PromptChoice::new(position.to_string(), choice(position)))
            .collect()
    }

    async fn say(&self, session: &Session, text: &str) {
        if let Err(err) = self.transport.status(&session.id, text).await {
            warn!(session = %session.id, error = %err, "status delivery failed");
        }
    }

    async fn ask(&self, session: &Session, text: &str, choices: &[PromptChoice]) {
        if let Err(err) = self.transport.prompt(&session.id, text, choices).await {
            warn!(session = %session.id, error = %err, "prompt delivery failed");
        }
    }
}

fn next_missing_parameter(session: &Session, kind: WorkflowKind) -> Option<ParamKind> {
    kind.parameter_sequence()
        .iter()
        .copied()
        .find(|param| match param {
            ParamKind::OutputName => session.pending.output_name.is_none(),
            ParamKind::Password => session.pending.password.is_none(),
            ParamKind::PageRange => session.pending.pages.is_none(),
        })
}

/// Stored names must be single path components. The transport's display
/// name is cut down to its final component, leading dots and surrounding
/// whitespace dropped, inner spaces replaced with underscores.
fn sanitize_name(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .trim_start_matches('.')
        .trim();
    if base.is_empty() {
        return "file".to_string();
    }
    base.replace(' ', "_")
}

/// Output names always carry the `.pdf` extension exactly once.
fn normalize_output_name(text: &str) -> String {
    let name = sanitize_name(text.trim());
    if name.to_lowercase().ends_with(".pdf") {
        name
    } else {
        format!("{name}.pdf")
    }
}
