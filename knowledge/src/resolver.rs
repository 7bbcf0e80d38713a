//! Cross-reference resolution.
//!
//! A `related` edge always names its target by tag. What changes when entries
//! move is the edge's representation: the href used to render the link from
//! the file holding the source to the file holding the target.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::entry::{Entry, EntryRef, Location};
use crate::store::{EntryStore, partition_file_name};

/// Where a reference currently resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedLocation {
    pub target: EntryRef,
    pub location: Location,

    /// File holding the target's full record.
    pub file: String,

    /// In-file anchor of the record.
    pub anchor: String,
}

impl ResolvedLocation {
    /// The href to render in `source_file`.
    pub fn href_from(&self, source_file: &str) -> String {
        if source_file == self.file {
            format!("#{}", self.anchor)
        } else {
            format!("{}#{}", self.file, self.anchor)
        }
    }
}

/// A `related` edge whose target does not exist anywhere in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DanglingReference {
    pub source: EntryRef,
    pub target: EntryRef,
}

/// An edge whose rendered href changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewrittenEdge {
    pub source: EntryRef,
    pub target: EntryRef,
    pub before: Option<String>,
    pub after: String,
}

/// Outcome of rewriting or auditing edges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteReport {
    /// Number of edges looked at.
    pub examined: usize,
    pub rewritten: Vec<RewrittenEdge>,
    pub dangling: Vec<DanglingReference>,
}

impl RewriteReport {
    pub fn is_clean(&self) -> bool {
        self.dangling.is_empty()
    }
}

/// Resolves references against one state of the store.
#[derive(Debug, Clone, Copy)]
pub struct CrossReferenceResolver<'a> {
    store: &'a EntryStore,
    index_file: &'a str,
}

impl<'a> CrossReferenceResolver<'a> {
    pub fn new(store: &'a EntryStore, index_file: &'a str) -> Self {
        Self { store, index_file }
    }

    /// File name that holds full records for `location`.
    pub fn file_for(&self, location: &Location) -> String {
        match location {
            Location::MainIndex => self.index_file.to_string(),
            Location::Partition { category } => partition_file_name(category),
        }
    }

    /// Current location of `target`, or `None` if it does not exist.
    pub fn resolve(&self, target: EntryRef) -> Option<ResolvedLocation> {
        self.store.get(target).map(|entry| ResolvedLocation {
            target,
            location: entry.location.clone(),
            file: self.file_for(&entry.location),
            anchor: target.anchor(),
        })
    }

    /// Href for the edge `source -> target` as rendered in the source's file.
    pub fn href(&self, source: &Entry, target: EntryRef) -> Option<String> {
        let source_file = self.file_for(&source.location);
        self.resolve(target)
            .map(|resolved| resolved.href_from(&source_file))
    }

    /// `relocated` plus every entry with an edge pointing into it.
    pub fn affected_by(&self, relocated: &BTreeSet<EntryRef>) -> BTreeSet<EntryRef> {
        let mut affected = relocated.clone();
        for entry in self.store.all() {
            if entry.related.iter().any(|t| relocated.contains(t)) {
                affected.insert(entry.reference());
            }
        }
        affected
    }

    /// Recompute the href of every edge that starts or ends at an affected
    /// entry, comparing against `before` (the pre-relocation state).
    pub fn rewrite_all(
        &self,
        before: &CrossReferenceResolver<'_>,
        affected: &BTreeSet<EntryRef>,
    ) -> RewriteReport {
        let mut report = RewriteReport::default();
        for source in self.store.all() {
            let source_ref = source.reference();
            for &target in &source.related {
                if !affected.contains(&source_ref) && !affected.contains(&target) {
                    continue;
                }
                report.examined += 1;
                let Some(after) = self.href(source, target) else {
                    warn!("Dangling reference {source_ref} -> {target}");
                    report.dangling.push(DanglingReference {
                        source: source_ref,
                        target,
                    });
                    continue;
                };
                let previous = before
                    .store
                    .get(source_ref)
                    .and_then(|old| before.href(old, target));
                if previous.as_deref() != Some(after.as_str()) {
                    debug!("Rewrote {source_ref} -> {target}: {previous:?} => {after}");
                    report.rewritten.push(RewrittenEdge {
                        source: source_ref,
                        target,
                        before: previous,
                        after,
                    });
                }
            }
        }
        report
    }

    /// Audit every edge in the store for dangling targets.
    pub fn check_all(&self) -> RewriteReport {
        let mut report = RewriteReport::default();
        for source in self.store.all() {
            for &target in &source.related {
                report.examined += 1;
                if !self.store.contains(target) {
                    warn!("Dangling reference {} -> {target}", source.reference());
                    report.dangling.push(DanglingReference {
                        source: source.reference(),
                        target,
                    });
                }
            }
        }
        report
    }
}
