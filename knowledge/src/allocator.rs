//! Per-kind identifier allocation.

use serde::{Deserialize, Serialize};

use crate::entry::{EntryKind, EntryRef};
use crate::error::{CodexError, Result};

/// Hands out monotonically increasing ids, scoped per entry kind.
///
/// Allocation is split in two: [`IdAllocator::peek`] proposes the next id and
/// [`IdAllocator::commit`] records it once the entry is durably stored. A
/// proposal that is never committed leaves no hole behind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdAllocator {
    /// Highest committed error id.
    error: u32,

    /// Highest committed learning id.
    learning: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest id committed for `kind` (0 if none).
    pub fn last(&self, kind: EntryKind) -> u32 {
        match kind {
            EntryKind::Error => self.error,
            EntryKind::Learning => self.learning,
        }
    }

    fn last_mut(&mut self, kind: EntryKind) -> &mut u32 {
        match kind {
            EntryKind::Error => &mut self.error,
            EntryKind::Learning => &mut self.learning,
        }
    }

    /// The smallest id greater than every id committed for `kind`.
    ///
    /// Fails with [`CodexError::IdsExhausted`] once `u32::MAX` is taken.
    pub fn peek(&self, kind: EntryKind) -> Result<EntryRef> {
        let id = self
            .last(kind)
            .checked_add(1)
            .ok_or(CodexError::IdsExhausted(kind))?;
        Ok(EntryRef::new(kind, id))
    }

    /// Record `reference` as allocated.
    ///
    /// Fails with [`CodexError::DuplicateId`] if the id is not above the
    /// current high-water mark for its kind.
    pub fn commit(&mut self, reference: EntryRef) -> Result<()> {
        let last = self.last_mut(reference.kind);
        if reference.id <= *last {
            return Err(CodexError::DuplicateId(reference));
        }
        *last = reference.id;
        Ok(())
    }

    /// Raise the high-water mark so that it covers `reference`.
    ///
    /// Used when rebuilding from persisted entries, whose ids are already
    /// known to be unique.
    pub fn observe(&mut self, reference: EntryRef) {
        let last = self.last_mut(reference.kind);
        *last = (*last).max(reference.id);
    }
}
