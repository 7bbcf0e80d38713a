//! Core entry types.
//!
//! An entry is an observed error or a learning. Its tag (`E001`, `L014`) is
//! assigned once by the allocator and its content never changes afterwards;
//! only the derived `location` moves when the codex is reorganized.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CodexError;

/// The two kinds of codex entries. Identifiers are scoped per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Error,
    Learning,
}

impl EntryKind {
    /// All kinds, in the order their sections are rendered.
    pub const ALL: [EntryKind; 2] = [EntryKind::Error, EntryKind::Learning];

    /// Tag prefix used when formatting identifiers.
    pub fn prefix(self) -> char {
        match self {
            Self::Error => 'E',
            Self::Learning => 'L',
        }
    }

    /// Section heading used in rendered codex files.
    pub fn section_title(self) -> &'static str {
        match self {
            Self::Error => "Errors",
            Self::Learning => "Learnings",
        }
    }

    fn from_prefix(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'E' => Some(Self::Error),
            'L' => Some(Self::Learning),
            _ => None,
        }
    }
}

/// A `(kind, id)` pair identifying one entry for the lifetime of the store.
///
/// Formats as a kind-prefixed, zero-padded tag (`E001`). Ordering is by kind
/// first, then id, so iterating a sorted collection in reverse within one kind
/// yields newest-first order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryRef {
    pub kind: EntryKind,
    pub id: u32,
}

impl EntryRef {
    pub fn new(kind: EntryKind, id: u32) -> Self {
        Self { kind, id }
    }

    pub fn error(id: u32) -> Self {
        Self::new(EntryKind::Error, id)
    }

    pub fn learning(id: u32) -> Self {
        Self::new(EntryKind::Learning, id)
    }

    /// In-file anchor used for this entry's full record (`e001`).
    pub fn anchor(&self) -> String {
        self.to_string().to_lowercase()
    }
}

impl fmt::Display for EntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:03}", self.kind.prefix(), self.id)
    }
}

impl FromStr for EntryRef {
    type Err = CodexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        let kind = chars
            .next()
            .and_then(EntryKind::from_prefix)
            .ok_or_else(|| CodexError::InvalidReference(s.to_string()))?;
        let digits = chars.as_str();
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(CodexError::InvalidReference(s.to_string()));
        }
        let id: u32 = digits
            .parse()
            .map_err(|_| CodexError::InvalidReference(s.to_string()))?;
        if id == 0 {
            return Err(CodexError::InvalidReference(s.to_string()));
        }
        Ok(Self { kind, id })
    }
}

impl Serialize for EntryRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntryRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Kind-specific body fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryBody {
    Error {
        description: String,
        correction: String,
        prevention: String,
    },
    Learning {
        insight: String,
        application: String,
        impact: String,
    },
}

impl EntryBody {
    pub fn kind(&self) -> EntryKind {
        match self {
            Self::Error { .. } => EntryKind::Error,
            Self::Learning { .. } => EntryKind::Learning,
        }
    }

    /// Labelled fields in rendering order.
    pub fn fields(&self) -> [(&'static str, &str); 3] {
        match self {
            Self::Error {
                description,
                correction,
                prevention,
            } => [
                ("Description", description),
                ("Correction", correction),
                ("Prevention", prevention),
            ],
            Self::Learning {
                insight,
                application,
                impact,
            } => [
                ("Insight", insight),
                ("Application", application),
                ("Impact", impact),
            ],
        }
    }
}

/// Where an entry's full record currently lives.
///
/// Derived by the partitioner; never edited by hand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "in", rename_all = "snake_case")]
pub enum Location {
    /// Inline in the main index.
    #[default]
    MainIndex,
    /// Inside the partition for `category`.
    Partition { category: String },
}

impl Location {
    pub fn partition(category: impl Into<String>) -> Self {
        Self::Partition {
            category: category.into(),
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, Self::MainIndex)
    }
}

/// A candidate entry handed over by the extraction step, before an id exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub title: String,
    pub context: String,
    pub body: EntryBody,
    pub related: BTreeSet<EntryRef>,
}

impl NewEntry {
    pub fn error(
        title: impl Into<String>,
        context: impl Into<String>,
        description: impl Into<String>,
        correction: impl Into<String>,
        prevention: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            context: context.into(),
            body: EntryBody::Error {
                description: description.into(),
                correction: correction.into(),
                prevention: prevention.into(),
            },
            related: BTreeSet::new(),
        }
    }

    pub fn learning(
        title: impl Into<String>,
        context: impl Into<String>,
        insight: impl Into<String>,
        application: impl Into<String>,
        impact: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            context: context.into(),
            body: EntryBody::Learning {
                insight: insight.into(),
                application: application.into(),
                impact: impact.into(),
            },
            related: BTreeSet::new(),
        }
    }

    /// Add a related entry.
    pub fn related_to(mut self, target: EntryRef) -> Self {
        self.related.insert(target);
        self
    }

    pub fn kind(&self) -> EntryKind {
        self.body.kind()
    }

    /// Check the fields the codex relies on.
    pub fn validate(&self) -> Result<(), CodexError> {
        if self.title.trim().is_empty() {
            return Err(CodexError::InvalidEntry("title is empty".to_string()));
        }
        // Titles end up inside headings and link labels.
        if let Some(c) = self
            .title
            .chars()
            .find(|c| c.is_control() || matches!(*c, '[' | ']'))
        {
            return Err(CodexError::InvalidEntry(format!(
                "title may not contain {c:?}: {:?}",
                self.title
            )));
        }
        if self.context.chars().any(char::is_control) {
            return Err(CodexError::InvalidEntry(format!(
                "context may not contain control characters: {:?}",
                self.context
            )));
        }
        if !self.context.starts_with('/') {
            return Err(CodexError::InvalidEntry(format!(
                "context must be an absolute locator: {:?}",
                self.context
            )));
        }
        Ok(())
    }

    /// Turn the candidate into an entry under an allocated id.
    pub(crate) fn into_entry(self, id: u32, recorded: DateTime<Utc>) -> Entry {
        Entry {
            kind: self.body.kind(),
            id,
            title: self.title,
            context: self.context,
            body: self.body,
            related: self.related,
            recorded,
            category: None,
            location: Location::MainIndex,
        }
    }
}

/// A stored codex entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub kind: EntryKind,
    pub id: u32,

    /// Short display title used in headings and link records.
    pub title: String,

    /// Root-relative locator of the file, module or area concerned.
    pub context: String,

    pub body: EntryBody,

    #[serde(default)]
    pub related: BTreeSet<EntryRef>,

    pub recorded: DateTime<Utc>,

    /// Category assigned by the classifier, cached once computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default)]
    pub location: Location,
}

impl Entry {
    pub fn reference(&self) -> EntryRef {
        EntryRef::new(self.kind, self.id)
    }

    /// Title and body text, the haystack for text-scoped category rules.
    pub fn text(&self) -> String {
        let mut text = self.title.clone();
        for (_, value) in self.body.fields() {
            text.push('\n');
            text.push_str(value);
        }
        text
    }

    /// The immutable part of the entry: everything except the cached
    /// category and the derived location.
    pub fn content(&self) -> EntryContent<'_> {
        EntryContent {
            reference: self.reference(),
            title: &self.title,
            context: &self.context,
            body: &self.body,
            related: &self.related,
        }
    }
}

/// Borrowed view over an entry's immutable content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryContent<'a> {
    pub reference: EntryRef,
    pub title: &'a str,
    pub context: &'a str,
    pub body: &'a EntryBody,
    pub related: &'a BTreeSet<EntryRef>,
}
