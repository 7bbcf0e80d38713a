//! The session facade over one codex root.
//!
//! A [`Codex`] is opened once per session. Every operation takes the root's
//! lock for its whole duration, so a submission and a reorganization never
//! interleave, and the lock is released on every exit path when the guard
//! drops. New state is always built on a copy and swapped in only after the
//! files on disk have been committed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::allocator::IdAllocator;
use crate::categorizer::Classifier;
use crate::config::CodexConfig;
use crate::entry::{Entry, EntryKind, EntryRef, NewEntry};
use crate::error::{CodexError, Result, StorageError};
use crate::fs::{CodexFs, LocalFs};
use crate::partitioner::{Partitioner, ReorganizePlan, SplitReport};
use crate::render::Layout;
use crate::resolver::{CrossReferenceResolver, ResolvedLocation, RewriteReport};
use crate::store::{EntryStore, Partition};
use crate::transaction::{CommitSummary, Transaction};

/// Canonical state file inside the state directory.
pub const STATE_FILE: &str = "state.json";

const STATE_VERSION: u32 = 1;

/// Owned form of `state.json`.
#[derive(Debug, Deserialize)]
struct PersistedState {
    version: u32,
    allocator: IdAllocator,
    entries: Vec<Entry>,
}

#[derive(Serialize)]
struct PersistedStateRef<'a> {
    version: u32,
    allocator: &'a IdAllocator,
    entries: Vec<&'a Entry>,
}

#[derive(Debug, Default)]
struct CodexState {
    allocator: IdAllocator,
    store: EntryStore,
}

/// Counts describing a codex.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodexStats {
    pub errors: usize,
    pub learnings: usize,
    pub inline: usize,
    pub partitions: usize,
    pub needs_reorganization: bool,
}

/// An open knowledge codex.
pub struct Codex {
    root: PathBuf,
    config: CodexConfig,
    classifier: Box<dyn Classifier>,
    fs: Arc<dyn CodexFs>,
    state: Mutex<CodexState>,
}

impl Codex {
    /// Open the codex at `root`, reading `codex.toml` if present.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let config = CodexConfig::load(root.as_ref()).await?;
        Self::open_with_config(root, config).await
    }

    pub async fn open_with_config(root: impl AsRef<Path>, config: CodexConfig) -> Result<Self> {
        Self::open_with_fs(root, config, Arc::new(LocalFs)).await
    }

    /// Open with an explicit filesystem implementation.
    pub async fn open_with_fs(
        root: impl AsRef<Path>,
        config: CodexConfig,
        fs: Arc<dyn CodexFs>,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let classifier = config.build_classifier()?;

        let state_dir = config.state_dir(&root);
        fs.create_dir_all(&state_dir)
            .await
            .map_err(|e| StorageError::CreateDirectory(format!("{}: {e}", state_dir.display())))?;

        let state = Self::load_state(fs.as_ref(), &state_dir.join(STATE_FILE)).await?;
        info!(
            "Opened codex at {} ({} entries)",
            root.display(),
            state.store.len()
        );

        let dangling = CrossReferenceResolver::new(&state.store, &config.index_file)
            .check_all()
            .dangling
            .len();
        if dangling > 0 {
            warn!("Codex at {} has {dangling} dangling references", root.display());
        }

        Ok(Self {
            root,
            config,
            classifier,
            fs,
            state: Mutex::new(state),
        })
    }

    async fn load_state(fs: &dyn CodexFs, path: &Path) -> Result<CodexState> {
        let Some(raw) = fs
            .read(path)
            .await
            .map_err(|e| StorageError::ReadFile(format!("{}: {e}", path.display())))?
        else {
            return Ok(CodexState::default());
        };

        let persisted: PersistedState = serde_json::from_slice(&raw)?;
        if persisted.version != STATE_VERSION {
            return Err(CodexError::InvalidConfig(format!(
                "unsupported state version {} in {}",
                persisted.version,
                path.display()
            )));
        }

        let mut allocator = persisted.allocator;
        for entry in &persisted.entries {
            allocator.observe(entry.reference());
        }
        let store = EntryStore::from_entries(persisted.entries)?;
        Ok(CodexState { allocator, store })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &CodexConfig {
        &self.config
    }

    /// Path of the main index file.
    pub fn index_path(&self) -> PathBuf {
        self.root.join(&self.config.index_file)
    }

    fn state_path(&self) -> PathBuf {
        self.config.state_dir(&self.root).join(STATE_FILE)
    }

    /// Write the projections and canonical state for `store` in one
    /// transaction: partitions first, then the main index, then state.
    async fn persist(
        &self,
        store: &EntryStore,
        allocator: &IdAllocator,
        layout: &Layout,
    ) -> Result<CommitSummary> {
        let mut tx = Transaction::new();
        for (name, file) in &layout.files {
            if *name != self.config.index_file {
                tx.stage(self.root.join(name), file.text.as_bytes());
            }
        }
        if let Some(main) = layout.files.get(&self.config.index_file) {
            tx.stage(self.index_path(), main.text.as_bytes());
        }

        let state = PersistedStateRef {
            version: STATE_VERSION,
            allocator,
            entries: store.all(),
        };
        let mut json = serde_json::to_string_pretty(&state)?;
        json.push('\n');
        tx.stage(self.state_path(), json);

        tx.commit(self.fs.as_ref()).await
    }

    /// Record a new entry and return its tag.
    ///
    /// Every `related` tag must already exist. The id is allocated and the
    /// entry written in one step: if writing fails, nothing is allocated.
    pub async fn submit_entry(&self, candidate: NewEntry) -> Result<EntryRef> {
        candidate.validate()?;
        let mut state = self.state.lock().await;

        if let Some(missing) = candidate
            .related
            .iter()
            .find(|target| !state.store.contains(**target))
        {
            return Err(CodexError::UnknownReference(*missing));
        }

        let reference = state.allocator.peek(candidate.kind())?;
        let mut allocator = state.allocator.clone();
        allocator.commit(reference)?;
        let mut store = state.store.clone();
        store.append(candidate.into_entry(reference.id, Utc::now()))?;

        let resolver = CrossReferenceResolver::new(&store, &self.config.index_file);
        let layout = Layout::render(&store, &resolver, &self.config.index_file);
        self.persist(&store, &allocator, &layout).await?;

        state.allocator = allocator;
        state.store = store;
        info!("Recorded {reference}");
        Ok(reference)
    }

    /// Fetch an entry by tag.
    pub async fn lookup(&self, reference: EntryRef) -> Result<Entry> {
        let state = self.state.lock().await;
        state.store.lookup(reference).cloned()
    }

    /// Where the full record of `reference` currently lives.
    pub async fn resolve(&self, reference: EntryRef) -> Result<ResolvedLocation> {
        let state = self.state.lock().await;
        CrossReferenceResolver::new(&state.store, &self.config.index_file)
            .resolve(reference)
            .ok_or(CodexError::NotFound(reference))
    }

    /// Split every eligible category out of the main index.
    pub async fn trigger_reorganization(&self) -> Result<SplitReport> {
        self.reorganize(ReorganizePlan::all()).await
    }

    /// Split the categories selected by `plan` out of the main index.
    ///
    /// On any failure the root is left exactly as it was and the error is
    /// reported as [`CodexError::PartialReorganization`].
    pub async fn reorganize(&self, plan: ReorganizePlan) -> Result<SplitReport> {
        let mut state = self.state.lock().await;
        let partitioner =
            Partitioner::new(self.classifier.as_ref(), self.config.min_partition_size);
        let reorg = partitioner
            .reorganize(&state.store, &plan, &self.config.index_file)
            .inspect_err(|e| warn!("Reorganization aborted: {e}"))?;

        if reorg.is_unchanged(&state.store) {
            info!("Reorganization found nothing to change");
            return Ok(reorg.report);
        }

        if let Err(e) = self
            .persist(&reorg.store, &state.allocator, &reorg.layout)
            .await
        {
            warn!("Reorganization rolled back: {e}");
            return Err(CodexError::PartialReorganization(e.to_string()));
        }

        state.store = reorg.store;
        for dangling in &reorg.report.references.dangling {
            warn!("Dangling reference {} -> {}", dangling.source, dangling.target);
        }
        info!(
            "Reorganized codex: {} entries moved, {} new partitions",
            reorg.report.relocated.len(),
            reorg.report.partitions_created
        );
        Ok(reorg.report)
    }

    /// Whether the main index holds more inline entries than the threshold.
    pub async fn needs_reorganization(&self) -> bool {
        let state = self.state.lock().await;
        state.store.inline().count() > self.config.split_threshold
    }

    /// Reorganize only when the inline threshold is exceeded.
    pub async fn reorganize_if_needed(&self) -> Result<Option<SplitReport>> {
        if !self.needs_reorganization().await {
            return Ok(None);
        }
        self.trigger_reorganization().await.map(Some)
    }

    /// Audit every `related` edge.
    pub async fn check_references(&self) -> RewriteReport {
        let state = self.state.lock().await;
        CrossReferenceResolver::new(&state.store, &self.config.index_file).check_all()
    }

    /// Every entry: errors newest first, then learnings newest first.
    pub async fn entries(&self) -> Vec<Entry> {
        let state = self.state.lock().await;
        state.store.all().into_iter().cloned().collect()
    }

    pub async fn partitions(&self) -> Vec<Partition> {
        let state = self.state.lock().await;
        state.store.partitions().into_values().collect()
    }

    pub async fn stats(&self) -> CodexStats {
        let state = self.state.lock().await;
        let inline = state.store.inline().count();
        CodexStats {
            errors: state.store.of_kind(EntryKind::Error).count(),
            learnings: state.store.of_kind(EntryKind::Learning).count(),
            inline,
            partitions: state.store.partitions().len(),
            needs_reorganization: inline > self.config.split_threshold,
        }
    }
}
