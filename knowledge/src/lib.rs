//! # Knowledge Codex
//!
//! An append-only codex of observed errors and learnings. Entries get stable
//! per-kind tags (`E001`, `L001`), are categorized by ordered rules, and are
//! split out of the main index into per-category partition files as the
//! codex grows, without ever breaking a `related` link between entries.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Codex (session)                        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  NewEntry ──► IdAllocator ──► EntryStore ──► Layout (markdown)  │
//! │                                   │                │            │
//! │                                   ▼                ▼            │
//! │  Classifier ──► Partitioner ──► CrossReferenceResolver          │
//! │                       │                                         │
//! │                       ▼                                         │
//! │               Transaction ──► CodexFs                           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod allocator;
pub mod categorizer;
pub mod codex;
pub mod config;
pub mod entry;
pub mod error;
pub mod fs;
pub mod partitioner;
pub mod render;
pub mod resolver;
pub mod store;
pub mod transaction;

pub use allocator::IdAllocator;
pub use categorizer::{
    CategoryRule, Classification, Classifier, KeywordClassifier, KeywordRule, ManualOverride,
    RuleClassifier, RuleFamily, RuleScope, UNCATEGORIZED, normalize_label,
};
pub use codex::{Codex, CodexStats};
pub use config::{ClassifierKind, CodexConfig};
pub use entry::{Entry, EntryBody, EntryContent, EntryKind, EntryRef, Location, NewEntry};
pub use error::{CodexError, Result, StorageError};
pub use fs::{CodexFs, LocalFs};
pub use partitioner::{Partitioner, ReorganizePlan, SplitReport};
pub use render::Layout;
pub use resolver::{
    CrossReferenceResolver, DanglingReference, ResolvedLocation, RewriteReport, RewrittenEdge,
};
pub use store::{EntryStore, Partition};
pub use transaction::{CommitSummary, Transaction};
