use std::sync::Arc;

use tracing::{info, warn};

use crate::session::{Session, SessionState};
use crate::storage::Storage;

/// Idempotent reset of a session: purge staged artifacts, clear the store
/// and pending data, force the state back to `Idle`.
///
/// Cancel, post-operation cleanup, and fatal-error recovery all share this
/// one path, so it never errors on an empty or missing session.
pub struct CleanupService {
    storage: Arc<dyn Storage>,
}

impl CleanupService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn reset(&self, session: &mut Session) {
        if !self.storage.area_exists(&session.id).await {
            // Lazy-initialization fallback for sessions that never saw the
            // normal bootstrap event.
            if let Err(err) = self.storage.bootstrap(&session.id).await {
                warn!(session = %session.id, error = %err, "bootstrap during reset failed");
            }
        } else if let Err(err) = self.storage.purge(&session.id).await {
            warn!(session = %session.id, error = %err, "purge during reset failed");
        }

        session.store.clear();
        session.pending.clear();
        session.active_operation = None;
        session.state = SessionState::Idle;
        info!(session = %session.id, "session reset to idle");
    }
}
