/// Storage collaborator for staged session files
///
/// The engine never touches the filesystem directly; everything goes through
/// the `Storage` trait so tests can swap in an in-memory double. The
/// filesystem implementation keeps one input and one output area per session
/// and names staged files with the position prefix purely as serialization --
/// order is owned by the `OrderedFileStore`, never re-parsed from names.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::session::SessionId;

/// Opaque handle to a staged input file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemRef(String);

impl ItemRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle to a produced output artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRef(String);

impl OutputRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OutputRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("staged item not found: {0}")]
    NotFound(String),
}

/// Per-session staging area operations.
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    /// Idempotently creates the session's staging area.
    async fn bootstrap(&self, session: &SessionId) -> Result<(), StorageError>;

    /// Whether the session's staging area exists at all.
    async fn area_exists(&self, session: &SessionId) -> bool;

    /// Copies the transport-provided source into the session's input area
    /// under `stored_name`, returning a handle to the staged copy.
    async fn stage(
        &self,
        session: &SessionId,
        source: &ItemRef,
        stored_name: &str,
    ) -> Result<ItemRef, StorageError>;

    /// Handles to every staged input, in stored-name order.
    async fn list_inputs(&self, session: &SessionId) -> Result<Vec<ItemRef>, StorageError>;

    /// Removes a single staged input.
    async fn delete(&self, session: &SessionId, item: &ItemRef) -> Result<(), StorageError>;

    /// Removes every staged input and output artifact, keeping the area.
    async fn purge(&self, session: &SessionId) -> Result<(), StorageError>;
}

/// Filesystem-backed staging areas: `<input_root>/<session>/` and
/// `<output_root>/<session>/`.
pub struct FsStorage {
    input_root: PathBuf,
    output_root: PathBuf,
}

impl FsStorage {
    pub fn new(input_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            input_root: input_root.into(),
            output_root: output_root.into(),
        }
    }

    fn input_dir(&self, session: &SessionId) -> PathBuf {
        self.input_root.join(session.as_str())
    }

    fn output_dir(&self, session: &SessionId) -> PathBuf {
        self.output_root.join(session.as_str())
    }

    async fn remove_dir_contents(dir: &Path) -> Result<(), StorageError> {
        if !dir.exists() {
            return Ok(());
        }
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            tokio::fs::remove_file(entry.path()).await?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Storage for FsStorage {
    async fn bootstrap(&self, session: &SessionId) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(self.input_dir(session)).await?;
        tokio::fs::create_dir_all(self.output_dir(session)).await?;
        debug!(session = %session, "staging area ready");
        Ok(())
    }

    async fn area_exists(&self, session: &SessionId) -> bool {
        self.input_dir(session).exists()
    }

    async fn stage(
        &self,
        session: &SessionId,
        source: &ItemRef,
        stored_name: &str,
    ) -> Result<ItemRef, StorageError> {
        let source_path = Path::new(source.as_str());
        if !source_path.exists() {
            return Err(StorageError::NotFound(source.as_str().to_string()));
        }
        let dest = self.input_dir(session).join(stored_name);
        tokio::fs::copy(source_path, &dest).await?;
        debug!(session = %session, name = stored_name, "staged input file");
        Ok(ItemRef::new(dest.to_string_lossy().into_owned()))
    }

    async fn list_inputs(&self, session: &SessionId) -> Result<Vec<ItemRef>, StorageError> {
        let dir = self.input_dir(session);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            paths.push(entry.path());
        }
        paths.sort();
        Ok(paths
            .into_iter()
            .map(|p| ItemRef::new(p.to_string_lossy().into_owned()))
            .collect())
    }

    async fn delete(&self, session: &SessionId, item: &ItemRef) -> Result<(), StorageError> {
        let path = Path::new(item.as_str());
        if !path.starts_with(self.input_dir(session)) {
            return Err(StorageError::NotFound(item.as_str().to_string()));
        }
        tokio::fs::remove_file(path).await?;
        debug!(session = %session, item = %item, "deleted staged input");
        Ok(())
    }

    async fn purge(&self, session: &SessionId) -> Result<(), StorageError> {
        Self::remove_dir_contents(&self.input_dir(session)).await?;
        Self::remove_dir_contents(&self.output_dir(session)).await?;
        debug!(session = %session, "purged staging area");
        Ok(())
    }
}
