/// Session registry: one worker task per active session
///
/// Events for a session are queued on a bounded channel and processed
/// strictly one at a time by that session's worker, which exclusively owns
/// the `Session`. This total ordering per session is what makes the store's
/// shift arithmetic dependable; no interleaved mutation is possible. A
/// `Cancel` queues like any other event and never preempts an in-flight
/// action. Different sessions share nothing and proceed in parallel.
///
/// Workers do not live forever: one that sees no event for `idle_timeout`
/// expires its session and exits, and finished workers are swept out of the
/// map on the next dispatch. A later event for the same session id
/// transparently gets a fresh worker.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn, Instrument};

use crate::events::InboundEvent;
use crate::machine::WorkflowEngine;
use crate::session::SessionId;
use crate::telemetry::{create_session_span, generate_correlation_id};

struct SessionWorker {
    queue: mpsc::Sender<InboundEvent>,
    task: JoinHandle<()>,
}

pub struct SessionRegistry {
    engine: Arc<WorkflowEngine>,
    workers: Mutex<HashMap<SessionId, SessionWorker>>,
    queue_depth: usize,
    idle_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(engine: Arc<WorkflowEngine>, queue_depth: usize, idle_timeout: Duration) -> Self {
        Self {
            engine,
            workers: Mutex::new(HashMap::new()),
            queue_depth,
            idle_timeout,
        }
    }

    /// Routes an event to its session's queue, creating the session worker
    /// on first touch.
    pub async fn dispatch(&self, session: &SessionId, event: InboundEvent) -> anyhow::Result<()> {
        let queue = self.worker_queue(session).await;
        match queue.send(event).await {
            Ok(()) => Ok(()),
            // the worker idled out between lookup and send; hand the event
            // to a fresh one
            Err(mpsc::error::SendError(event)) => {
                let queue = self.replace_worker(session).await;
                queue
                    .send(event)
                    .await
                    .map_err(|_| anyhow::anyhow!("session {session} worker is gone"))
            }
        }
    }

    /// Sessions whose worker task is still running.
    pub async fn active_sessions(&self) -> usize {
        self.workers
            .lock()
            .await
            .values()
            .filter(|worker| !worker.task.is_finished())
            .count()
    }

    async fn worker_queue(&self, session: &SessionId) -> mpsc::Sender<InboundEvent> {
        let mut workers = self.workers.lock().await;
        workers.retain(|_, worker| !worker.task.is_finished());
        match workers.get(session) {
            Some(worker) => worker.queue.clone(),
            None => {
                let worker = self.spawn_worker(session.clone());
                let queue = worker.queue.clone();
                workers.insert(session.clone(), worker);
                queue
            }
        }
    }

    async fn replace_worker(&self, session: &SessionId) -> mpsc::Sender<InboundEvent> {
        let mut workers = self.workers.lock().await;
        let worker = self.spawn_worker(session.clone());
        let queue = worker.queue.clone();
        workers.insert(session.clone(), worker);
        queue
    }

    fn spawn_worker(&self, id: SessionId) -> SessionWorker {
        let (queue, mut events) = mpsc::channel::<InboundEvent>(self.queue_depth);
        let engine = Arc::clone(&self.engine);
        let idle_timeout = self.idle_timeout;
        let correlation = generate_correlation_id();
        info!(session = %id, correlation = %correlation, "session worker started");
        let task = tokio::spawn(async move {
            let mut session = engine.new_session(id.clone());
            loop {
                match timeout(idle_timeout, events.recv()).await {
                    Ok(Some(event)) => {
                        let span =
                            create_session_span("handle_event", Some(id.as_str()), Some(&correlation));
                        engine.handle_event(&mut session, event).instrument(span).await;
                    }
                    Ok(None) => break,
                    Err(_) => {
                        debug!(session = %id, "session worker idled out");
                        engine.expire(&mut session).await;
                        break;
                    }
                }
            }
            debug!(session = %id, "session worker stopped");
        });
        SessionWorker { queue, task }
    }

    /// Closes every session queue and waits for the workers to drain their
    /// remaining events.
    pub async fn shutdown(&self) {
        let workers: Vec<(SessionId, SessionWorker)> =
            self.workers.lock().await.drain().collect();
        info!(sessions = workers.len(), "shutting down session workers");
        for (id, worker) in workers {
            drop(worker.queue);
            if timeout(Duration::from_secs(30), worker.task).await.is_err() {
                warn!(session = %id, "session worker did not drain in time");
            }
        }
    }
}
