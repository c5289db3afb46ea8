use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::ItemRef;

/// One staged file inside a session's ordered collection.
///
/// `position` is the authoritative 1-based rank; `display_name` is only used
/// for presentation and `storage_ref` points at the staged copy held by the
/// Storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub position: u32,
    pub display_name: String,
    pub storage_ref: ItemRef,
}

/// Errors from positional store mutations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("position {position} is out of range (valid: 1..={max})")]
    OutOfRange { position: u32, max: u32 },

    #[error("store is full ({max_items} items)")]
    CapacityExceeded { max_items: u32 },
}

/// Result of a `move_to` call. Moving an entry onto its own position is not
/// an error, but the caller is told nothing changed so it can say so.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved,
    NoEffect,
}

/// Dense 1..=N positional ordering over a session's staged files.
///
/// Invariant: after every mutation the set of `position` values of the N
/// entries is exactly {1, ..., N} -- no gaps, no duplicates. All shift
/// operations are O(N); staged sets are small (bounded by `max_items`).
#[derive(Debug, Clone)]
pub struct OrderedFileStore {
    entries: Vec<FileEntry>,
    max_items: u32,
}

impl OrderedFileStore {
    pub fn new(max_items: u32) -> Self {
        Self {
            entries: Vec::new(),
            max_items,
        }
    }

    pub fn count(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_items(&self) -> u32 {
        self.max_items
    }

    /// Ordered view of the staged entries, ascending by position.
    pub fn list(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn get(&self, position: u32) -> Option<&FileEntry> {
        if position == 0 {
            return None;
        }
        self.entries.get((position - 1) as usize)
    }

    /// Appends an entry at position N+1.
    pub fn append(
        &mut self,
        display_name: impl Into<String>,
        storage_ref: ItemRef,
    ) -> Result<u32, StoreError> {
        let position = self.count() + 1;
        if position > self.max_items {
            return Err(StoreError::CapacityExceeded {
                max_items: self.max_items,
            });
        }
        self.entries.push(FileEntry {
            position,
            display_name: display_name.into(),
            storage_ref,
        });
        Ok(position)
    }

    /// Inserts an entry at `position`, valid range 1..=N+1. Every existing
    /// entry at or above `position` shifts up by one. Shifts run highest
    /// position first so no two entries ever share a position key.
    pub fn insert_at(
        &mut self,
        position: u32,
        display_name: impl Into<String>,
        storage_ref: ItemRef,
    ) -> Result<(), StoreError> {
        let n = self.count();
        if position < 1 || position > n + 1 {
            return Err(StoreError::OutOfRange {
                position,
                max: n + 1,
            });
        }
        if n + 1 > self.max_items {
            return Err(StoreError::CapacityExceeded {
                max_items: self.max_items,
            });
        }

        let idx = (position - 1) as usize;
        for entry in self.entries[idx..].iter_mut().rev() {
            entry.position += 1;
        }
        self.entries.insert(
            idx,
            FileEntry {
                position,
                display_name: display_name.into(),
                storage_ref,
            },
        );
        Ok(())
    }

    /// Moves the entry at `from` to `to`.
    ///
    /// - `from == to`: nothing changes, reported as `NoEffect`
    /// - `from > to`: entries in [to, from-1] shift up by one
    /// - `from < to`: entries in [from+1, to] shift down by one
    ///
    /// Shifted ranges are processed in the direction away from the vacated
    /// slot, so positions stay duplicate-free throughout.
    pub fn move_to(&mut self, from: u32, to: u32) -> Result<MoveOutcome, StoreError> {
        let n = self.count();
        for position in [from, to] {
            if position < 1 || position > n {
                return Err(StoreError::OutOfRange { position, max: n });
            }
        }
        if from == to {
            return Ok(MoveOutcome::NoEffect);
        }

        let mut moved = self.entries.remove((from - 1) as usize);
        if from > to {
            // everything between the target and the vacated slot moves up
            for entry in &mut self.entries[(to - 1) as usize..(from - 1) as usize] {
                entry.position += 1;
            }
        } else {
            // everything between the vacated slot and the target moves down
            for entry in &mut self.entries[(from - 1) as usize..(to - 1) as usize] {
                entry.position -= 1;
            }
        }
        moved.position = to;
        self.entries.insert((to - 1) as usize, moved);
        Ok(MoveOutcome::Moved)
    }

    /// Removes and returns the entry at `position`; every entry above it
    /// shifts down by one, closing the gap.
    pub fn delete_at(&mut self, position: u32) -> Result<FileEntry, StoreError> {
        let n = self.count();
        if position < 1 || position > n {
            return Err(StoreError::OutOfRange { position, max: n });
        }
        let removed = self.entries.remove((position - 1) as usize);
        for entry in &mut self.entries[(position - 1) as usize..] {
            entry.position -= 1;
        }
        Ok(removed)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Checks the dense-ordering invariant. Used by tests; cheap enough to
    /// call after every mutation.
    pub fn positions_are_dense(&self) -> bool {
        self.entries
            .iter()
            .enumerate()
            .all(|(idx, entry)| entry.position == idx as u32 + 1)
    }
}

/// Renders a position as a fixed-width zero-padded decimal prefix
/// (`position_prefix(2, 2)` is `"02"`).
///
/// This is only a serialization concern for externally visible staged file
/// names; order is never derived by parsing names back.
pub fn position_prefix(position: u32, width: usize) -> String {
    format!("{position:0width$}")
}

/// Largest staged-set size a prefix of `width` digits can express
/// (two digits caps the set at 99 items).
pub fn prefix_capacity(width: usize) -> u32 {
    10u32.saturating_pow(width as u32).saturating_sub(1)
}
