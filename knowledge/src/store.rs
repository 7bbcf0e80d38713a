//! The canonical entry collection.
//!
//! `EntryStore` is the single source of truth for entry content. The main
//! index and partition files are projections rendered from it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entry::{Entry, EntryKind, EntryRef, Location};
use crate::error::{CodexError, Result};

/// Ordered collection of every entry ever submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryStore {
    entries: BTreeMap<EntryRef, Entry>,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from persisted entries.
    pub fn from_entries(entries: impl IntoIterator<Item = Entry>) -> Result<Self> {
        let mut store = Self::new();
        for entry in entries {
            store.append(entry)?;
        }
        Ok(store)
    }

    /// Append an entry whose id has already been allocated.
    pub fn append(&mut self, entry: Entry) -> Result<()> {
        if entry.body.kind() != entry.kind {
            return Err(CodexError::InvalidEntry(format!(
                "{} carries a {:?} body",
                entry.reference(),
                entry.body.kind()
            )));
        }
        let reference = entry.reference();
        if self.entries.contains_key(&reference) {
            return Err(CodexError::DuplicateId(reference));
        }
        self.entries.insert(reference, entry);
        Ok(())
    }

    pub fn get(&self, reference: EntryRef) -> Option<&Entry> {
        self.entries.get(&reference)
    }

    /// Like [`EntryStore::get`], but reports a missing entry as an error.
    pub fn lookup(&self, reference: EntryRef) -> Result<&Entry> {
        self.get(reference).ok_or(CodexError::NotFound(reference))
    }

    pub fn contains(&self, reference: EntryRef) -> bool {
        self.entries.contains_key(&reference)
    }

    /// Entries of one kind, newest first.
    pub fn of_kind(&self, kind: EntryKind) -> impl Iterator<Item = &Entry> {
        let start = EntryRef::new(kind, 0);
        let end = EntryRef::new(kind, u32::MAX);
        self.entries.range(start..=end).rev().map(|(_, e)| e)
    }

    /// All entries: errors newest first, then learnings newest first.
    pub fn all(&self) -> Vec<&Entry> {
        EntryKind::ALL
            .iter()
            .flat_map(|kind| self.of_kind(*kind))
            .collect()
    }

    /// Entries whose full record currently sits in the main index.
    pub fn inline(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values().filter(|e| e.location.is_inline())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cache the classifier's verdict on an entry.
    pub(crate) fn set_category(&mut self, reference: EntryRef, category: String) {
        if let Some(entry) = self.entries.get_mut(&reference) {
            entry.category = Some(category);
        }
    }

    /// Move an entry. Content is left untouched.
    pub(crate) fn relocate(&mut self, reference: EntryRef, location: Location) {
        if let Some(entry) = self.entries.get_mut(&reference) {
            entry.location = location;
        }
    }

    /// Current partitions, keyed by category label.
    pub fn partitions(&self) -> BTreeMap<String, Partition> {
        let mut partitions: BTreeMap<String, Partition> = BTreeMap::new();
        for kind in EntryKind::ALL {
            for entry in self.of_kind(kind) {
                if let Location::Partition { category } = &entry.location {
                    partitions
                        .entry(category.clone())
                        .or_insert_with(|| Partition::new(category.clone()))
                        .members
                        .push(entry.reference());
                }
            }
        }
        partitions
    }
}

/// A named group of entries sharing one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// Normalized category label.
    pub category: String,

    /// Member tags: errors newest first, then learnings newest first.
    pub members: Vec<EntryRef>,
}

impl Partition {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            members: Vec::new(),
        }
    }

    /// File name of this partition (`networking-codex.md`).
    pub fn file_name(&self) -> String {
        partition_file_name(&self.category)
    }

    pub fn count(&self, kind: EntryKind) -> usize {
        self.members.iter().filter(|r| r.kind == kind).count()
    }
}

/// File name for the partition holding `category`.
pub fn partition_file_name(category: &str) -> String {
    format!("{category}-codex.md")
}
