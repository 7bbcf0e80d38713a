//! Configuration for a knowledge codex root.
//!
//! Read from `codex.toml` at the root; every field has a default so a
//! missing file yields a usable (if rule-less) configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use crate::categorizer::{
    CategoryRule, Classifier, KeywordClassifier, KeywordRule, ManualOverride, RuleClassifier,
};
use crate::entry::EntryRef;
use crate::error::{Result, StorageError};

/// Name of the config file looked up at the codex root.
pub const CONFIG_FILE: &str = "codex.toml";

/// Which classifier implementation to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    /// Ordered regular-expression rules.
    #[default]
    Rules,
    /// Ordered keyword groups.
    Keywords,
}

/// Operator configuration for one codex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodexConfig {
    /// Main index file name.
    pub index_file: String,

    /// Directory (relative to the root) holding canonical state.
    pub state_dir: String,

    /// Inline entry count above which a reorganization is due.
    pub split_threshold: usize,

    /// Smallest group that is split into its own partition.
    pub min_partition_size: usize,

    pub classifier: ClassifierKind,

    pub rules: Vec<CategoryRule>,

    pub keywords: Vec<KeywordRule>,

    /// Entry tag (`"E001"`) to pinned category label.
    pub overrides: BTreeMap<String, String>,
}

impl Default for CodexConfig {
    fn default() -> Self {
        Self {
            index_file: "CODEX.md".to_string(),
            state_dir: ".codex".to_string(),
            split_threshold: 50,
            min_partition_size: 1,
            classifier: ClassifierKind::Rules,
            rules: Vec::new(),
            keywords: Vec::new(),
            overrides: BTreeMap::new(),
        }
    }
}

impl CodexConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `codex.toml` from `root`, falling back to defaults if absent.
    pub async fn load(root: impl AsRef<Path>) -> Result<Self> {
        let path = root.as_ref().join(CONFIG_FILE);
        match fs::read_to_string(&path).await {
            Ok(raw) => {
                let config: Self = toml::from_str(&raw)?;
                info!(
                    "Loaded codex config from {} ({} rules, {} keyword groups)",
                    path.display(),
                    config.rules.len(),
                    config.keywords.len()
                );
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(
                    "No {CONFIG_FILE} at {}, using defaults",
                    root.as_ref().display()
                );
                Ok(Self::default())
            }
            Err(e) => Err(StorageError::ReadFile(format!("{}: {e}", path.display())).into()),
        }
    }

    /// Append a category rule. Rule order is match order.
    pub fn with_rule(mut self, rule: CategoryRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Append a keyword group and switch to keyword classification.
    pub fn with_keywords(mut self, rule: KeywordRule) -> Self {
        self.keywords.push(rule);
        self.classifier = ClassifierKind::Keywords;
        self
    }

    /// Pin an entry to a category.
    pub fn with_override(mut self, reference: EntryRef, label: impl Into<String>) -> Self {
        self.overrides.insert(reference.to_string(), label.into());
        self
    }

    pub fn with_split_threshold(mut self, threshold: usize) -> Self {
        self.split_threshold = threshold;
        self
    }

    pub fn with_min_partition_size(mut self, size: usize) -> Self {
        self.min_partition_size = size.max(1);
        self
    }

    pub fn with_index_file(mut self, name: impl Into<String>) -> Self {
        self.index_file = name.into();
        self
    }

    /// Directory holding `state.json` under `root`.
    pub fn state_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.state_dir)
    }

    /// Build the configured classifier, with manual overrides in front.
    pub fn build_classifier(&self) -> Result<Box<dyn Classifier>> {
        let base: Box<dyn Classifier> = match self.classifier {
            ClassifierKind::Rules => Box::new(RuleClassifier::new(&self.rules)?),
            ClassifierKind::Keywords => Box::new(KeywordClassifier::new(&self.keywords)?),
        };
        if self.overrides.is_empty() {
            return Ok(base);
        }
        let overrides = self
            .overrides
            .iter()
            .map(|(tag, label)| Ok((tag.parse::<EntryRef>()?, label.clone())))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(Box::new(ManualOverride::new(overrides, base)?))
    }
}
