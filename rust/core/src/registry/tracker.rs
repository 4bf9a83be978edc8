use crate::errors::{RegistryError, Result};
use parking_lot::RwLock;
use std::collections::HashSet;

/// **CREATION TRACKER**
///
/// **PURPOSE**: Records which identifiers are mid-construction so re-entrant
/// creation can be told apart from legitimate early-reference lookups.
/// **GUARANTEE**: `begin`/`end` pair up for every identifier that is not
/// excluded; a mismatch surfaces as `InvariantViolation`.
#[derive(Debug, Default)]
pub struct CreationTracker {
    in_creation: RwLock<HashSet<String>>,
    /// Identifiers that manage their own lifecycle and skip the reentrancy check.
    excluded: RwLock<HashSet<String>>,
}

impl CreationTracker {
    /// Tracker with nothing in flight.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` as in creation.
    pub fn begin(&self, id: &str) -> Result<()> {
        if self.is_excluded(id) {
            return Ok(());
        }
        if !self.in_creation.write().insert(id.to_string()) {
            return Err(RegistryError::CurrentlyInCreation { id: id.to_string() });
        }
        Ok(())
    }

    /// Mark `id` as in creation until the returned guard is finished or dropped.
    pub fn mark<'a>(&'a self, id: &'a str) -> Result<CreationMark<'a>> {
        self.begin(id)?;
        Ok(CreationMark {
            tracker: self,
            id,
            open: true,
        })
    }

    /// Clear the in-creation mark for `id`.
    pub fn end(&self, id: &str) -> Result<()> {
        if self.is_excluded(id) {
            return Ok(());
        }
        if !self.in_creation.write().remove(id) {
            return Err(RegistryError::invariant(format!(
                "'{}' isn't currently in creation",
                id
            )));
        }
        Ok(())
    }

    /// Raw tracker state, ignoring exclusions.
    pub fn is_in_creation(&self, id: &str) -> bool {
        self.in_creation.read().contains(id)
    }

    /// In creation and subject to the reentrancy check.
    pub fn is_checked_in_creation(&self, id: &str) -> bool {
        !self.is_excluded(id) && self.is_in_creation(id)
    }

    /// Opt `id` in or out of the reentrancy check.
    pub fn set_excluded(&self, id: &str, excluded: bool) {
        let mut exclusions = self.excluded.write();
        if excluded {
            exclusions.insert(id.to_string());
        } else {
            exclusions.remove(id);
        }
    }

    /// Whether `id` skips the reentrancy check.
    pub fn is_excluded(&self, id: &str) -> bool {
        self.excluded.read().contains(id)
    }

    /// Number of identifiers currently in creation.
    pub fn active(&self) -> usize {
        self.in_creation.read().len()
    }

    /// Forget everything in flight; exclusions survive.
    pub fn clear(&self) {
        self.in_creation.write().clear();
    }
}

/// In-creation mark that is cleared even when the marked work panics.
#[must_use = "the mark is cleared as soon as the guard is dropped"]
pub struct CreationMark<'a> {
    tracker: &'a CreationTracker,
    id: &'a str,
    open: bool,
}

impl CreationMark<'_> {
    /// Clear the mark, reporting a bookkeeping mismatch.
    pub fn finish(mut self) -> Result<()> {
        self.open = false;
        self.tracker.end(self.id)
    }
}

impl Drop for CreationMark<'_> {
    fn drop(&mut self) {
        if self.open {
            let _ = self.tracker.end(self.id);
        }
    }
}
