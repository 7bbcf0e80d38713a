//! End-to-end tests for submitting, splitting and resolving codex entries.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use codex_knowledge::{
    CategoryRule, ClassifierKind, Codex, CodexConfig, DanglingReference, Entry, EntryContent,
    EntryRef, KeywordRule, Location, NewEntry, UNCATEGORIZED,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn scenario_config() -> CodexConfig {
    CodexConfig::default()
        .with_rule(CategoryRule::new("networking", "/Networking/"))
        .with_rule(CategoryRule::new("appdelegate", "/App.*Delegate/"))
}

/// Every file under `root`, keyed by relative path.
fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                let rel = path.strip_prefix(root).unwrap().to_path_buf();
                out.insert(rel, std::fs::read(&path).unwrap());
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

/// Immutable content of every entry, in tag order.
fn contents(entries: &[Entry]) -> Vec<EntryContent<'_>> {
    let mut out: Vec<_> = entries.iter().map(Entry::content).collect();
    out.sort_by_key(|c| c.reference);
    out
}

fn read(root: &Path, name: &str) -> String {
    std::fs::read_to_string(root.join(name)).unwrap()
}

/// Submits the four entries of the basic networking/app-delegate scenario.
async fn seed(codex: &Codex) -> [EntryRef; 4] {
    let e1 = codex
        .submit_entry(NewEntry::error(
            "Request hangs forever",
            "/Sources/Networking/APIService.swift",
            "URLSession task never completed on a dead connection",
            "Set timeoutIntervalForRequest to 30s",
            "Always configure request timeouts",
        ))
        .await
        .unwrap();
    let e2 = codex
        .submit_entry(NewEntry::error(
            "Crash on launch",
            "/Sources/App/AppDelegate.swift",
            "Force unwrap of missing config",
            "Guard and fall back to defaults",
            "Never force unwrap launch config",
        ))
        .await
        .unwrap();
    let l1 = codex
        .submit_entry(
            NewEntry::learning(
                "Timeouts belong in one place",
                "/Sources/Networking/APIClient.swift",
                "Scattered timeouts drift apart",
                "Centralize session configuration",
                "Consistent network behavior",
            )
            .related_to(e1),
        )
        .await
        .unwrap();
    let l2 = codex
        .submit_entry(NewEntry::learning(
            "Keep the app delegate thin",
            "/Sources/App/AppDelegate.swift",
            "Launch work in the delegate is hard to test",
            "Move setup into services",
            "Faster, testable launch",
        ))
        .await
        .unwrap();
    [e1, e2, l1, l2]
}

#[tokio::test]
async fn test_ids_strictly_increase_per_kind() {
    init_logging();
    let temp_dir = TempDir::new().unwrap();
    let codex = Codex::open_with_config(temp_dir.path(), scenario_config())
        .await
        .unwrap();

    let [e1, e2, l1, l2] = seed(&codex).await;
    assert_eq!(e1, EntryRef::error(1));
    assert_eq!(e2, EntryRef::error(2));
    assert_eq!(l1, EntryRef::learning(1));
    assert_eq!(l2, EntryRef::learning(2));
}

#[tokio::test]
async fn test_related_resolves_immediately_after_submission() {
    let temp_dir = TempDir::new().unwrap();
    let codex = Codex::open_with_config(temp_dir.path(), scenario_config())
        .await
        .unwrap();
    let [e1, _, l1, _] = seed(&codex).await;

    let entry = codex.lookup(l1).await.unwrap();
    for target in &entry.related {
        assert!(codex.resolve(*target).await.is_ok());
    }
    let resolved = codex.resolve(e1).await.unwrap();
    assert_eq!(resolved.location, Location::MainIndex);
    assert_eq!(resolved.file, "CODEX.md");
    assert!(read(temp_dir.path(), "CODEX.md").contains("- **Related**: [E001](#e001)"));
}

#[tokio::test]
async fn test_split_into_two_partitions() {
    init_logging();
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    let codex = Codex::open_with_config(root, scenario_config()).await.unwrap();
    let [e1, e2, l1, l2] = seed(&codex).await;

    let report = codex.trigger_reorganization().await.unwrap();
    assert_eq!(report.partitions_created, 2);
    assert_eq!(report.categories, vec!["appdelegate", "networking"]);
    assert_eq!(report.entry_counts["networking"], 2);
    assert_eq!(report.entry_counts["appdelegate"], 2);
    assert_eq!(report.remaining_inline, 0);
    assert!(report.references.dangling.is_empty());

    let partitions = codex.partitions().await;
    let members: BTreeMap<String, Vec<EntryRef>> = partitions
        .into_iter()
        .map(|p| (p.category, p.members))
        .collect();
    assert_eq!(members["networking"], vec![e1, l1]);
    assert_eq!(members["appdelegate"], vec![e2, l2]);

    let main = read(root, "CODEX.md");
    let error_links = main.lines().filter(|l| l.starts_with("- [E0")).count();
    let learning_links = main.lines().filter(|l| l.starts_with("- [L0")).count();
    assert_eq!(error_links, 2);
    assert_eq!(learning_links, 2);
    assert!(main.contains("- [E002: Crash on launch](appdelegate-codex.md#e002)"));
    assert!(!main.contains("<a id="));

    // Newest first within each section of the main index.
    let e2_pos = main.find("[E002:").unwrap();
    let e1_pos = main.find("[E001:").unwrap();
    assert!(e2_pos < e1_pos);

    let resolved = codex.resolve(e1).await.unwrap();
    assert_eq!(resolved.location, Location::partition("networking"));
    assert_eq!(resolved.file, "networking-codex.md");
    assert_eq!(resolved.anchor, "e001");

    let networking = read(root, "networking-codex.md");
    assert!(networking.contains("### L001: Timeouts belong in one place"));
    assert!(networking.contains("- **Related**: [E001](#e001)"));
    assert!(networking.contains("<a id=\"e001\"></a>"));
}

#[tokio::test]
async fn test_late_entry_resolves_into_existing_partition() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    let codex = Codex::open_with_config(root, scenario_config()).await.unwrap();
    let [e1, ..] = seed(&codex).await;
    codex.trigger_reorganization().await.unwrap();

    let e3 = codex
        .submit_entry(
            NewEntry::error(
                "Stale cache after logout",
                "/Sources/Networking/ResponseCache.swift",
                "Cached responses leaked across accounts",
                "Clear cache on logout",
                "Scope caches per account",
            )
            .related_to(e1),
        )
        .await
        .unwrap();
    assert_eq!(e3, EntryRef::error(3));

    let resolved = codex.resolve(e1).await.unwrap();
    assert_eq!(resolved.file, "networking-codex.md");
    assert_eq!(codex.resolve(e3).await.unwrap().location, Location::MainIndex);
    assert!(read(root, "CODEX.md").contains("- **Related**: [E001](networking-codex.md#e001)"));

    // A later split appends to the existing partition.
    let report = codex.trigger_reorganization().await.unwrap();
    assert_eq!(report.partitions_created, 0);
    assert_eq!(report.relocated, vec![e3]);
    assert_eq!(report.entry_counts["networking"], 3);
    let networking = read(root, "networking-codex.md");
    assert!(networking.find("### E003").unwrap() < networking.find("### E001").unwrap());
    assert!(networking.contains("- **Related**: [E001](#e001)"));
}

#[tokio::test]
async fn test_unmatched_entry_stays_inline() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    let codex = Codex::open_with_config(root, scenario_config()).await.unwrap();
    seed(&codex).await;
    let readme = codex
        .submit_entry(NewEntry::learning(
            "Document build flags",
            "/Docs/README.md",
            "New contributors missed the debug flag",
            "List flags in the README",
            "Smoother onboarding",
        ))
        .await
        .unwrap();

    let report = codex.trigger_reorganization().await.unwrap();
    assert_eq!(report.remaining_inline, 1);
    assert!(!report.relocated.contains(&readme));

    let entry = codex.lookup(readme).await.unwrap();
    assert_eq!(entry.location, Location::MainIndex);
    assert_eq!(entry.category.as_deref(), Some(UNCATEGORIZED));

    let main = read(root, "CODEX.md");
    assert!(main.contains("### L003: Document build flags"));
    assert!(main.contains("- **Category**: uncategorized"));
    assert!(!root.join("uncategorized-codex.md").exists());
}

#[tokio::test]
async fn test_rule_added_later_picks_up_uncategorized() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    {
        let codex = Codex::open_with_config(root, scenario_config()).await.unwrap();
        codex
            .submit_entry(NewEntry::error("Broken link", "/Docs/README.md", "d", "c", "p"))
            .await
            .unwrap();
        let report = codex.trigger_reorganization().await.unwrap();
        assert!(report.is_noop());
    }

    let config = scenario_config().with_rule(CategoryRule::new("docs", "^/Docs/"));
    let codex = Codex::open_with_config(root, config).await.unwrap();
    let report = codex.trigger_reorganization().await.unwrap();
    assert_eq!(report.categories, vec!["docs"]);
    assert_eq!(
        codex.lookup(EntryRef::error(1)).await.unwrap().category.as_deref(),
        Some("docs")
    );
}

#[tokio::test]
async fn test_second_reorganize_is_noop() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    let codex = Codex::open_with_config(root, scenario_config()).await.unwrap();
    seed(&codex).await;
    codex
        .submit_entry(NewEntry::error("Typo", "/Docs/README.md", "d", "c", "p"))
        .await
        .unwrap();

    let first = codex.trigger_reorganization().await.unwrap();
    assert!(!first.is_noop());
    let files = snapshot(root);
    let entries = codex.entries().await;

    let second = codex.trigger_reorganization().await.unwrap();
    assert!(second.is_noop());
    assert!(second.categories.is_empty());
    assert!(second.entry_counts.is_empty());
    assert_eq!(snapshot(root), files);
    assert_eq!(codex.entries().await, entries);
}

#[tokio::test]
async fn test_reorganize_preserves_entry_content() {
    let temp_dir = TempDir::new().unwrap();
    let codex = Codex::open_with_config(temp_dir.path(), scenario_config())
        .await
        .unwrap();
    seed(&codex).await;

    let before = codex.entries().await;
    codex.trigger_reorganization().await.unwrap();
    let after = codex.entries().await;
    assert_eq!(contents(&before), contents(&after));
    assert_ne!(before, after);
    assert!(codex.check_references().await.is_clean());
}

#[tokio::test]
async fn test_selected_categories_only() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    let codex = Codex::open_with_config(root, scenario_config()).await.unwrap();
    seed(&codex).await;

    let report = codex
        .reorganize(codex_knowledge::ReorganizePlan::only(["networking"]))
        .await
        .unwrap();
    assert_eq!(report.categories, vec!["networking"]);
    assert_eq!(report.remaining_inline, 2);
    assert!(root.join("networking-codex.md").exists());
    assert!(!root.join("appdelegate-codex.md").exists());

    // The inline app-delegate learning still renders its anchor in the index.
    assert!(read(root, "CODEX.md").contains("<a id=\"l002\"></a>"));
}

#[tokio::test]
async fn test_config_file_is_honored() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    std::fs::write(
        root.join("codex.toml"),
        r#"
index_file = "KNOWLEDGE.md"

[[rules]]
label = "Networking"
pattern = "/Networking/"
"#,
    )
    .unwrap();

    let codex = Codex::open(root).await.unwrap();
    codex
        .submit_entry(NewEntry::error("Hang", "/Sources/Networking/A.swift", "d", "c", "p"))
        .await
        .unwrap();
    codex.trigger_reorganization().await.unwrap();

    let main = read(root, "KNOWLEDGE.md");
    assert!(main.contains("- [E001: Hang](networking-codex.md#e001)"));
    assert!(
        read(root, "networking-codex.md").contains("Split out of [KNOWLEDGE.md](KNOWLEDGE.md).")
    );
}

#[tokio::test]
async fn test_late_single_entry_joins_partition_despite_minimum() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    let config = CodexConfig::default()
        .with_rule(CategoryRule::new("networking", "/Networking/"))
        .with_min_partition_size(2);
    let codex = Codex::open_with_config(root, config).await.unwrap();
    for context in ["/Sources/Networking/A.swift", "/Sources/Networking/B.swift"] {
        codex
            .submit_entry(NewEntry::error("Hang", context, "d", "c", "p"))
            .await
            .unwrap();
    }
    let first = codex.trigger_reorganization().await.unwrap();
    assert_eq!(first.partitions_created, 1);

    let e3 = codex
        .submit_entry(NewEntry::error("Retry storm", "/Networking/B.swift", "d", "c", "p"))
        .await
        .unwrap();
    let second = codex.trigger_reorganization().await.unwrap();
    assert_eq!(second.relocated, vec![e3]);
    assert_eq!(
        codex.resolve(e3).await.unwrap().location,
        Location::partition("networking")
    );
    assert!(!read(root, "CODEX.md").contains("<a id=\"e003\"></a>"));
    assert!(read(root, "networking-codex.md").contains("<a id=\"e003\"></a>"));
}

#[tokio::test]
async fn test_dangling_reference_in_state_is_reported_not_fatal() {
    init_logging();
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    {
        let codex = Codex::open_with_config(root, scenario_config()).await.unwrap();
        seed(&codex).await;
    }

    // Point L001 at an error that was never recorded.
    let state_path = root.join(".codex").join("state.json");
    let mut state: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&state_path).unwrap()).unwrap();
    for entry in state["entries"].as_array_mut().unwrap() {
        if entry["kind"] == "learning" && entry["id"] == 1 {
            entry["related"] = serde_json::json!(["E009"]);
        }
    }
    std::fs::write(&state_path, serde_json::to_string_pretty(&state).unwrap()).unwrap();

    let codex = Codex::open_with_config(root, scenario_config()).await.unwrap();
    let expected = vec![DanglingReference {
        source: EntryRef::learning(1),
        target: EntryRef::error(9),
    }];
    assert_eq!(codex.check_references().await.dangling, expected);

    let report = codex.trigger_reorganization().await.unwrap();
    assert_eq!(report.partitions_created, 2);
    assert_eq!(report.references.dangling, expected);
    assert!(read(root, "networking-codex.md").contains("- **Related**: E009 (missing)"));
    assert_eq!(
        codex.lookup(EntryRef::learning(1)).await.unwrap().related,
        [EntryRef::error(9)].into_iter().collect()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_submit_and_reorganize_do_not_interleave() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    let codex = Arc::new(Codex::open_with_config(root, scenario_config()).await.unwrap());
    seed(&codex).await;

    let submitter = {
        let codex = Arc::clone(&codex);
        tokio::spawn(async move {
            codex
                .submit_entry(
                    NewEntry::error("Retry storm", "/Sources/Networking/Retry.swift", "d", "c", "p")
                        .related_to(EntryRef::error(1)),
                )
                .await
        })
    };
    let reorganizer = {
        let codex = Arc::clone(&codex);
        tokio::spawn(async move { codex.trigger_reorganization().await })
    };
    let (submitted, reorganized) = tokio::join!(submitter, reorganizer);
    let e3 = submitted.unwrap().unwrap();
    reorganized.unwrap().unwrap();
    assert_eq!(e3, EntryRef::error(3));

    // Every record lives exactly where the store says, and nothing dangles.
    assert!(codex.check_references().await.is_clean());
    for entry in codex.entries().await {
        let resolved = codex.resolve(entry.reference()).await.unwrap();
        let anchor = format!("<a id=\"{}\"></a>", resolved.anchor);
        assert!(read(root, &resolved.file).contains(&anchor), "{}", entry.reference());
    }

    // Disk and memory agree.
    let reopened = Codex::open_with_config(root, scenario_config()).await.unwrap();
    assert_eq!(reopened.entries().await, codex.entries().await);
}

#[tokio::test]
async fn test_keyword_classifier_with_overrides_and_custom_index() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    let config = CodexConfig::default()
        .with_index_file("KB.md")
        .with_keywords(KeywordRule::new("networking", &["URLSession", "networking"]))
        .with_keywords(KeywordRule::new("launch", &["delegate"]))
        .with_override(EntryRef::error(2), "Legacy Launch");
    let codex = Codex::open_with_config(root, config).await.unwrap();
    assert_eq!(codex.root(), root);
    assert_eq!(codex.config().classifier, ClassifierKind::Keywords);
    assert_eq!(codex.index_path(), root.join("KB.md"));

    let [e1, e2, l1, l2] = seed(&codex).await;
    assert!(codex.index_path().exists());
    assert!(!root.join("CODEX.md").exists());

    let report = codex.trigger_reorganization().await.unwrap();
    assert_eq!(report.categories, vec!["launch", "legacy-launch", "networking"]);

    let members: BTreeMap<String, Vec<EntryRef>> = codex
        .partitions()
        .await
        .into_iter()
        .map(|p| (p.category, p.members))
        .collect();
    assert_eq!(members["networking"], vec![e1, l1]);
    assert_eq!(members["legacy-launch"], vec![e2]);
    assert_eq!(members["launch"], vec![l2]);
    assert!(read(root, "KB.md").contains("- [E002: Crash on launch](legacy-launch-codex.md#e002)"));
}
