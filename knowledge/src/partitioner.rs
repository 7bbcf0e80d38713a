//! Splitting the main index into category partitions.
//!
//! The partitioner works on a copy of the store. It classifies every inline
//! entry, moves qualifying groups into partitions, rewrites cross-reference
//! representations, renders the new layout and checks that every rendered
//! link lands on an anchor. Only a fully validated [`Reorganization`] is
//! handed back for committing; the live store is never touched here.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::categorizer::{Classifier, UNCATEGORIZED, normalize_label};
use crate::entry::{EntryRef, Location};
use crate::error::{CodexError, Result};
use crate::render::Layout;
use crate::resolver::{CrossReferenceResolver, RewriteReport};
use crate::store::EntryStore;

/// Which categories an operator wants extracted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReorganizePlan {
    /// `None` extracts every eligible category.
    pub categories: Option<BTreeSet<String>>,
}

impl ReorganizePlan {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            categories: Some(
                categories
                    .into_iter()
                    .map(|c| normalize_label(c.as_ref()))
                    .collect(),
            ),
        }
    }

    fn includes(&self, category: &str) -> bool {
        self.categories
            .as_ref()
            .is_none_or(|selected| selected.contains(category))
    }
}

/// Summary of one reorganization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitReport {
    /// Partitions that did not exist before this run.
    pub partitions_created: usize,

    /// Categories that received entries, sorted.
    pub categories: Vec<String>,

    /// Total members of each touched partition after the run.
    pub entry_counts: BTreeMap<String, usize>,

    /// Entries moved out of the main index.
    pub relocated: Vec<EntryRef>,

    /// Entries still inline after the run.
    pub remaining_inline: usize,

    /// Cross-reference rewrites and dangling edges.
    pub references: RewriteReport,
}

impl SplitReport {
    /// True when the run moved nothing.
    pub fn is_noop(&self) -> bool {
        self.relocated.is_empty() && self.partitions_created == 0
    }
}

/// A validated, not yet committed, reorganization.
#[derive(Debug, Clone)]
pub struct Reorganization {
    /// The store as it will be once committed.
    pub store: EntryStore,
    pub layout: Layout,
    pub report: SplitReport,
}

impl Reorganization {
    /// True when committing would not change anything.
    pub fn is_unchanged(&self, current: &EntryStore) -> bool {
        self.store == *current
    }
}

/// Groups inline entries by category and moves them into partitions.
pub struct Partitioner<'a> {
    classifier: &'a dyn Classifier,
    min_partition_size: usize,
}

impl<'a> Partitioner<'a> {
    pub fn new(classifier: &'a dyn Classifier, min_partition_size: usize) -> Self {
        Self {
            classifier,
            min_partition_size: min_partition_size.max(1),
        }
    }

    /// Classify inline entries, caching the verdict on each. Uncategorized
    /// entries are classified afresh so newly added rules pick them up.
    fn classify_inline(&self, store: &mut EntryStore) -> BTreeMap<String, Vec<EntryRef>> {
        let mut groups: BTreeMap<String, Vec<EntryRef>> = BTreeMap::new();
        let inline: Vec<(EntryRef, Option<String>)> = store
            .inline()
            .map(|e| (e.reference(), e.category.clone()))
            .collect();

        for (reference, cached) in inline {
            let category = match cached {
                Some(category) if category != UNCATEGORIZED => category,
                previous => {
                    let Some(entry) = store.get(reference) else {
                        continue;
                    };
                    let category = self.classifier.classify(entry).category;
                    if previous.as_deref() != Some(category.as_str()) {
                        store.set_category(reference, category.clone());
                    }
                    category
                }
            };
            groups.entry(category).or_default().push(reference);
        }
        groups
    }

    /// Compute and validate a reorganization of `current`.
    pub fn reorganize(
        &self,
        current: &EntryStore,
        plan: &ReorganizePlan,
        index_file: &str,
    ) -> Result<Reorganization> {
        let mut staged = current.clone();
        let existing: BTreeSet<String> = current.partitions().into_keys().collect();
        let groups = self.classify_inline(&mut staged);

        let mut relocated = BTreeSet::new();
        let mut touched = BTreeSet::new();
        for (category, members) in &groups {
            if category == UNCATEGORIZED {
                debug!("Keeping {} uncategorized entries inline", members.len());
                continue;
            }
            // The minimum only gates creating a partition; existing ones keep
            // absorbing late entries.
            let too_small =
                members.len() < self.min_partition_size && !existing.contains(category);
            if too_small || !plan.includes(category) {
                debug!("Not extracting {category} ({} entries)", members.len());
                continue;
            }
            for &reference in members {
                debug!("Relocating {reference} to {category}");
                staged.relocate(reference, Location::partition(category.clone()));
                relocated.insert(reference);
            }
            touched.insert(category.clone());
        }

        let before = CrossReferenceResolver::new(current, index_file);
        let after = CrossReferenceResolver::new(&staged, index_file);
        let affected = after.affected_by(&relocated);
        let references = after.rewrite_all(&before, &affected);

        let layout = Layout::render(&staged, &after, index_file);
        let broken = layout.broken_links();
        if !broken.is_empty() {
            return Err(CodexError::PartialReorganization(format!(
                "cross-reference validation failed: {}",
                broken.join("; ")
            )));
        }

        let partitions = staged.partitions();
        let entry_counts = touched
            .iter()
            .map(|c| {
                let count = partitions.get(c).map_or(0, |p| p.members.len());
                (c.clone(), count)
            })
            .collect();
        let report = SplitReport {
            partitions_created: touched.iter().filter(|c| !existing.contains(*c)).count(),
            categories: touched.into_iter().collect(),
            entry_counts,
            relocated: relocated.into_iter().collect(),
            remaining_inline: staged.inline().count(),
            references,
        };

        if !report.is_noop() {
            info!(
                "Planned split: {} entries into {:?} ({} new partitions)",
                report.relocated.len(),
                report.categories,
                report.partitions_created
            );
        }

        Ok(Reorganization {
            store: staged,
            layout,
            report,
        })
    }
}
