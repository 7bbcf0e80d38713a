//! Markdown projections of the store.
//!
//! Rendering is a pure function of the store: the same state always yields
//! byte-identical files. Every anchor and link written is recorded so the
//! staged layout can be checked for broken links before it is committed.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use crate::entry::{Entry, EntryKind, Location};
use crate::resolver::CrossReferenceResolver;
use crate::store::{EntryStore, Partition};

/// A link written into a rendered file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedLink {
    /// What wrote the link, for diagnostics (`"L002 related E001"`).
    pub origin: String,
    pub href: String,
}

/// One rendered markdown file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub name: String,
    pub text: String,
    pub anchors: BTreeSet<String>,
    pub links: Vec<RenderedLink>,
}

impl RenderedFile {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: String::new(),
            anchors: BTreeSet::new(),
            links: Vec::new(),
        }
    }

    fn link(&mut self, origin: String, label: &str, href: String) -> String {
        let rendered = format!("[{label}]({href})");
        self.links.push(RenderedLink { origin, href });
        rendered
    }
}

/// The full set of projection files for one store state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Layout {
    pub files: BTreeMap<String, RenderedFile>,
}

impl Layout {
    /// Render the main index and every partition.
    pub fn render(
        store: &EntryStore,
        resolver: &CrossReferenceResolver<'_>,
        index_file: &str,
    ) -> Self {
        let partitions = store.partitions();
        let mut files = BTreeMap::new();

        let main = render_main_index(store, resolver, index_file, &partitions);
        files.insert(main.name.clone(), main);

        for partition in partitions.values() {
            let file = render_partition(store, resolver, index_file, partition);
            files.insert(file.name.clone(), file);
        }

        Self { files }
    }

    /// Every link whose file or anchor is missing from this layout.
    pub fn broken_links(&self) -> Vec<String> {
        let mut broken = Vec::new();
        for file in self.files.values() {
            for link in &file.links {
                let (target_file, anchor) = match link.href.split_once('#') {
                    Some(("", anchor)) => (file.name.as_str(), Some(anchor)),
                    Some((target, anchor)) => (target, Some(anchor)),
                    None => (link.href.as_str(), None),
                };
                let ok = match self.files.get(target_file) {
                    Some(target) => anchor.is_none_or(|a| target.anchors.contains(a)),
                    None => false,
                };
                if !ok {
                    broken.push(format!("{}: {} -> {}", file.name, link.origin, link.href));
                }
            }
        }
        broken
    }
}

fn render_main_index(
    store: &EntryStore,
    resolver: &CrossReferenceResolver<'_>,
    index_file: &str,
    partitions: &BTreeMap<String, Partition>,
) -> RenderedFile {
    let mut file = RenderedFile::new(index_file);
    let mut out = String::from("# Codex\n\n## Partitions\n\n");

    if partitions.is_empty() {
        out.push_str("_No partitions yet._\n");
    }
    for partition in partitions.values() {
        let link = file.link(
            format!("partition {}", partition.category),
            &partition.category,
            partition.file_name(),
        );
        let _ = writeln!(
            out,
            "- {link}: {} errors, {} learnings",
            partition.count(EntryKind::Error),
            partition.count(EntryKind::Learning)
        );
    }

    for kind in EntryKind::ALL {
        let _ = write!(out, "\n## {}\n", kind.section_title());
        let mut any = false;
        for entry in store.of_kind(kind) {
            any = true;
            match &entry.location {
                Location::MainIndex => render_record(&mut file, &mut out, entry, resolver),
                Location::Partition { .. } => {
                    let Some(resolved) = resolver.resolve(entry.reference()) else {
                        continue;
                    };
                    let label = format!("{}: {}", entry.reference(), entry.title);
                    let link = file.link(
                        format!("link {}", entry.reference()),
                        &label,
                        resolved.href_from(index_file),
                    );
                    let _ = writeln!(out, "\n- {link}");
                }
            }
        }
        if !any {
            out.push_str("\n_None yet._\n");
        }
    }

    file.text = out;
    file
}

fn render_partition(
    store: &EntryStore,
    resolver: &CrossReferenceResolver<'_>,
    index_file: &str,
    partition: &Partition,
) -> RenderedFile {
    let mut file = RenderedFile::new(partition.file_name());
    let mut out = format!("# {} codex\n\n", partition.category);
    let back = file.link("back link".to_string(), index_file, index_file.to_string());
    let _ = writeln!(out, "Split out of {back}.");

    for kind in EntryKind::ALL {
        let _ = write!(out, "\n## {}\n", kind.section_title());
        let mut any = false;
        for reference in partition.members.iter().filter(|r| r.kind == kind) {
            if let Some(entry) = store.get(*reference) {
                any = true;
                render_record(&mut file, &mut out, entry, resolver);
            }
        }
        if !any {
            out.push_str("\n_None yet._\n");
        }
    }

    file.text = out;
    file
}

fn render_record(
    file: &mut RenderedFile,
    out: &mut String,
    entry: &Entry,
    resolver: &CrossReferenceResolver<'_>,
) {
    let reference = entry.reference();
    let anchor = reference.anchor();
    let _ = write!(
        out,
        "\n<a id=\"{anchor}\"></a>\n### {reference}: {}\n\n",
        entry.title
    );
    file.anchors.insert(anchor);

    let _ = writeln!(out, "- **Context**: `{}`", entry.context);
    if let Some(category) = &entry.category {
        let _ = writeln!(out, "- **Category**: {category}");
    }
    for (label, value) in entry.body.fields() {
        let _ = writeln!(out, "- **{label}**: {}", value.trim().replace('\n', "\n  "));
    }
    let _ = writeln!(out, "- **Recorded**: {}", entry.recorded.format("%Y-%m-%d"));

    let related: Vec<String> = entry
        .related
        .iter()
        .map(|&target| match resolver.href(entry, target) {
            Some(href) => file.link(
                format!("{reference} related {target}"),
                &target.to_string(),
                href,
            ),
            None => format!("{target} (missing)"),
        })
        .collect();
    if related.is_empty() {
        out.push_str("- **Related**: none\n");
    } else {
        let _ = writeln!(out, "- **Related**: {}", related.join(", "));
    }
}
