use std::sync::Arc;

use tracing::{info, warn};

use crate::cleanup::CleanupService;
use crate::events::Transport;
use crate::operation::{
    format_size, Operation, OperationError, OperationOutput, OperationRequest,
};
use crate::session::{Session, SessionState};

/// Binds a confirmed workflow to its single Operation invocation.
///
/// Guarantees: at most one operation in flight per session, and cleanup runs
/// after every terminal attempt, successful or not, so no session is left
/// holding stale staged items.
pub struct WorkflowOrchestrator {
    transport: Arc<dyn Transport>,
    operation: Arc<dyn Operation>,
    cleanup: Arc<CleanupService>,
}

impl WorkflowOrchestrator {
    pub fn new(
        transport: Arc<dyn Transport>,
        operation: Arc<dyn Operation>,
        cleanup: Arc<CleanupService>,
    ) -> Self {
        Self {
            transport,
            operation,
            cleanup,
        }
    }

    pub async fn run(&self, session: &mut Session) {
        if session.active_operation.is_some() {
            self.say(session, "Hold on, I'm still working on the current operation.")
                .await;
            return;
        }
        let Some(kind) = session.pending.workflow else {
            warn!(session = %session.id, "terminal confirmation without a workflow");
            return;
        };

        session.active_operation = Some(kind);
        session.state = SessionState::Processing;

        let request = OperationRequest {
            kind,
            inputs: session
                .store
                .list()
                .iter()
                .map(|entry| entry.storage_ref.clone())
                .collect(),
            params: session.pending.operation_params(),
        };

        info!(
            session = %session.id,
            workflow = %kind,
            inputs = request.inputs.len(),
            "invoking operation"
        );
        self.say(session, "Working on it, please wait.").await;

        match self.operation.execute(&request).await {
            Ok(output) => {
                let caption = delivery_caption(&output);
                if let Err(err) = self
                    .transport
                    .deliver(&session.id, &output.output, &caption)
                    .await
                {
                    warn!(session = %session.id, error = %err, "artifact delivery failed");
                } else {
                    info!(session = %session.id, workflow = %kind, "artifact delivered");
                }
            }
            Err(err) => {
                warn!(session = %session.id, workflow = %kind, error = %err, "operation failed");
                let text = match err {
                    OperationError::Rejected(reason) => reason,
                    OperationError::Failed(kind) => {
                        format!("Sorry, the {kind} operation failed. Please try again.")
                    }
                };
                self.say(session, &text).await;
            }
        }

        session.active_operation = None;
        self.cleanup.reset(session).await;
    }

    async fn say(&self, session: &Session, text: &str) {
        if let Err(err) = self.transport.status(&session.id, text).await {
            warn!(session = %session.id, error = %err, "status delivery failed");
        }
    }
}

/// Caption for the delivered artifact; includes a size report when the
/// backend measured its input and output.
fn delivery_caption(output: &OperationOutput) -> String {
    match (output.input_bytes, output.output_bytes) {
        (Some(input), Some(out)) if input > 0 => {
            let delta = ((out as f64 / input as f64 - 1.0) * 100.0).round() as i64;
            let change = if delta <= 0 {
                format!("Reduced by {}%", -delta)
            } else {
                format!("Increased by {delta}%")
            };
            format!(
                "Here you go.\n\nOriginal size: {}\nNew size: {}\n{}",
                format_size(input),
                format_size(out),
                change
            )
        }
        _ => "Here you go.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::OutputRef;

    #[test]
    fn caption_reports_size_reduction() {
        let output = OperationOutput {
            output: OutputRef::new("out.pdf"),
            input_bytes: Some(2048),
            output_bytes: Some(1024),
        };
        let caption = delivery_caption(&output);
        assert!(caption.contains("2.0 KB"));
        assert!(caption.contains("1.0 KB"));
        assert!(caption.contains("50%"));
    }

    #[test]
    fn caption_reports_size_increase() {
        let output = OperationOutput {
            output: OutputRef::new("out.pdf"),
            input_bytes: Some(1024),
            output_bytes: Some(2048),
        };
        let caption = delivery_caption(&output);
        assert!(caption.contains("Increased by 100%"));
        assert!(!caption.contains("Reduced"));
    }

    #[test]
    fn caption_is_plain_without_sizes() {
        let output = OperationOutput {
            output: OutputRef::new("out.pdf"),
            input_bytes: None,
            output_bytes: None,
        };
        assert_eq!(delivery_caption(&output), "Here you go.");
    }
}
