//! Category assignment.
//!
//! A [`Classifier`] reports every category label an entry matches, in the
//! classifier's declared order. [`Classifier::classify`] then applies the
//! first-match tie-break: the earliest matching label wins, and when more
//! than one label matched the decision is logged so it can be audited later.
//! Entries matching nothing land in [`UNCATEGORIZED`], which is never split
//! out of the main index.

use std::collections::BTreeMap;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::entry::{Entry, EntryRef};
use crate::error::{CodexError, Result};

/// Reserved category for entries no rule matches.
pub const UNCATEGORIZED: &str = "uncategorized";

/// Normalize a label to lowercase kebab-case (`"App Delegate"` -> `"app-delegate"`).
pub fn normalize_label(raw: &str) -> String {
    let mut label = String::with_capacity(raw.len());
    let mut pending_dash = false;
    for c in raw.trim().chars() {
        if c.is_alphanumeric() {
            if pending_dash && !label.is_empty() {
                label.push('-');
            }
            pending_dash = false;
            label.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    label
}

/// The outcome of classifying one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// The winning label.
    pub category: String,

    /// Every label that matched, in declared order. More than one means the
    /// decision was ambiguous and resolved by order.
    pub candidates: Vec<String>,
}

impl Classification {
    pub fn is_ambiguous(&self) -> bool {
        self.candidates.len() > 1
    }

    pub fn is_uncategorized(&self) -> bool {
        self.category == UNCATEGORIZED
    }
}

/// Assigns category labels to entries.
pub trait Classifier: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// All matching labels, normalized, in declared order.
    fn matches(&self, entry: &Entry) -> Vec<String>;

    /// Pick the first matching label.
    fn classify(&self, entry: &Entry) -> Classification {
        let mut candidates = self.matches(entry);
        candidates.dedup();
        let category = candidates
            .first()
            .cloned()
            .unwrap_or_else(|| UNCATEGORIZED.to_string());

        if candidates.len() > 1 {
            warn!(
                "Ambiguous category for {}: {candidates:?} matched, chose {category} ({})",
                entry.reference(),
                self.name()
            );
        } else {
            debug!("Classified {} as {category}", entry.reference());
        }

        Classification {
            category,
            candidates,
        }
    }
}

/// The family a rule belongs to. Informational; evaluation order is the
/// order rules are declared in, regardless of family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleFamily {
    #[default]
    ProjectArea,
    Technology,
    Concept,
    FileType,
}

/// What a rule's pattern is matched against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    /// The entry's context locator.
    #[default]
    Context,
    /// The entry's title and body text.
    Text,
    /// Either of the above.
    Any,
}

/// A category rule as written by the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    /// Category label; normalized before use.
    pub label: String,

    /// Regular expression, optionally written between slashes
    /// (`/App.*Delegate/`).
    pub pattern: String,

    #[serde(default)]
    pub family: RuleFamily,

    #[serde(default)]
    pub scope: RuleScope,
}

impl CategoryRule {
    pub fn new(label: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            pattern: pattern.into(),
            family: RuleFamily::default(),
            scope: RuleScope::default(),
        }
    }

    pub fn with_family(mut self, family: RuleFamily) -> Self {
        self.family = family;
        self
    }

    pub fn with_scope(mut self, scope: RuleScope) -> Self {
        self.scope = scope;
        self
    }
}

fn checked_label(raw: &str) -> Result<String> {
    let label = normalize_label(raw);
    if label.is_empty() {
        return Err(CodexError::InvalidConfig(format!("empty category label {raw:?}")));
    }
    if label == UNCATEGORIZED {
        return Err(CodexError::InvalidConfig(format!(
            "{UNCATEGORIZED} is reserved for unmatched entries"
        )));
    }
    Ok(label)
}

/// Strip `/.../` delimiters. A pattern that does not both start and end
/// with a slash is used as written.
fn pattern_body(pattern: &str) -> &str {
    pattern
        .strip_prefix('/')
        .and_then(|rest| rest.strip_suffix('/'))
        .unwrap_or(pattern)
}

#[derive(Debug)]
struct CompiledRule {
    label: String,
    regex: Regex,
    scope: RuleScope,
}

impl CompiledRule {
    fn is_match(&self, entry: &Entry) -> bool {
        match self.scope {
            RuleScope::Context => self.regex.is_match(&entry.context),
            RuleScope::Text => self.regex.is_match(&entry.text()),
            RuleScope::Any => {
                self.regex.is_match(&entry.context) || self.regex.is_match(&entry.text())
            }
        }
    }
}

/// Ordered regular-expression rules.
#[derive(Debug)]
pub struct RuleClassifier {
    rules: Vec<CompiledRule>,
}

impl RuleClassifier {
    pub fn new(rules: &[CategoryRule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                let body = pattern_body(&rule.pattern);
                if body.is_empty() {
                    return Err(CodexError::InvalidConfig(format!(
                        "rule {} has an empty pattern",
                        rule.label
                    )));
                }
                let regex = Regex::new(body).map_err(|e| {
                    CodexError::InvalidConfig(format!("rule {}: {e}", rule.label))
                })?;
                Ok(CompiledRule {
                    label: checked_label(&rule.label)?,
                    regex,
                    scope: rule.scope,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }
}

impl Classifier for RuleClassifier {
    fn name(&self) -> &str {
        "rules"
    }

    fn matches(&self, entry: &Entry) -> Vec<String> {
        self.rules
            .iter()
            .filter(|rule| rule.is_match(entry))
            .map(|rule| rule.label.clone())
            .collect()
    }
}

/// A keyword group as written by the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub label: String,
    pub keywords: Vec<String>,
}

impl KeywordRule {
    pub fn new(label: impl Into<String>, keywords: &[&str]) -> Self {
        Self {
            label: label.into(),
            keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
        }
    }
}

/// Case-insensitive keyword matching over context and text.
#[derive(Debug)]
pub struct KeywordClassifier {
    groups: Vec<(String, Vec<String>)>,
}

impl KeywordClassifier {
    pub fn new(rules: &[KeywordRule]) -> Result<Self> {
        let groups = rules
            .iter()
            .map(|rule| {
                let keywords = rule
                    .keywords
                    .iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect();
                Ok((checked_label(&rule.label)?, keywords))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { groups })
    }
}

impl Classifier for KeywordClassifier {
    fn name(&self) -> &str {
        "keywords"
    }

    fn matches(&self, entry: &Entry) -> Vec<String> {
        let haystack = format!("{}\n{}", entry.context, entry.text()).to_lowercase();
        self.groups
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|k| haystack.contains(k.as_str())))
            .map(|(label, _)| label.clone())
            .collect()
    }
}

/// Operator-pinned categories for individual entries, in front of another
/// classifier.
pub struct ManualOverride {
    overrides: BTreeMap<EntryRef, String>,
    fallback: Box<dyn Classifier>,
}

impl ManualOverride {
    pub fn new(
        overrides: BTreeMap<EntryRef, String>,
        fallback: Box<dyn Classifier>,
    ) -> Result<Self> {
        let overrides = overrides
            .into_iter()
            .map(|(reference, label)| Ok((reference, checked_label(&label)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(Self {
            overrides,
            fallback,
        })
    }
}

impl Classifier for ManualOverride {
    fn name(&self) -> &str {
        "override"
    }

    fn matches(&self, entry: &Entry) -> Vec<String> {
        match self.overrides.get(&entry.reference()) {
            Some(label) => vec![label.clone()],
            None => self.fallback.matches(entry),
        }
    }
}
