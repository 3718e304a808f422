//! End-to-end runs over healthy trees

use drivemirror_core::domain::{NodeKind, Outcome, SkipReason, SyncTask};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::common::*;

/// root: a.txt (10 B), b.txt (20 B), sub/ { c.txt (5 B) }
fn scenario_tree() -> std::sync::Arc<FakeTree> {
    let tree = FakeTree::new();
    tree.folder(
        "root",
        vec![
            file("fa", "a.txt", "root", 10),
            file("fb", "b.txt", "root", 20),
            folder("sub", "sub", "root"),
        ],
    );
    tree.folder("sub", vec![file("fc", "c.txt", "sub", 5)]);
    tree.content("fa", b"aaaaaaaaaa");
    tree.content("fb", b"bbbbbbbbbbbbbbbbbbbb");
    tree.content("fc", b"ccccc");
    tree
}

#[tokio::test]
async fn test_concrete_scenario() {
    let dest = TempDir::new().unwrap();
    let sync = orchestrator(scenario_tree(), 4);

    let report = sync
        .run(SyncTask::new(id("root"), dest.path()), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.len(), 4);
    assert_eq!(report.succeeded(), 4);
    assert_eq!(report.failed(), 0);
    assert_eq!(report.skipped(), 0);
    assert_eq!(report.total_bytes(), 35);
    assert!(!report.is_cancelled());
    assert!(report.finished_at().is_some());

    let folders: Vec<_> = report
        .items()
        .iter()
        .filter(|item| item.kind == NodeKind::Folder)
        .collect();
    assert_eq!(folders.len(), 1);
    assert_eq!(folders[0].local_path, dest.path().join("sub"));

    assert_eq!(
        files_under(dest.path()),
        vec![
            std::path::PathBuf::from("a.txt"),
            "b.txt".into(),
            "sub/c.txt".into()
        ]
    );
    assert_eq!(std::fs::read(dest.path().join("sub/c.txt")).unwrap(), b"ccccc");
    assert_eq!(report.success_paths().count(), 3);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let dest = TempDir::new().unwrap();
    let tree = scenario_tree();
    let sync = orchestrator(tree, 2);

    let first = sync
        .run(SyncTask::new(id("root"), dest.path()), CancellationToken::new())
        .await
        .unwrap();
    let before: Vec<_> = files_under(dest.path())
        .into_iter()
        .map(|p| (p.clone(), std::fs::read(dest.path().join(p)).unwrap()))
        .collect();

    let second = sync
        .run(SyncTask::new(id("root"), dest.path()), CancellationToken::new())
        .await
        .unwrap();
    let after: Vec<_> = files_under(dest.path())
        .into_iter()
        .map(|p| (p.clone(), std::fs::read(dest.path().join(p)).unwrap()))
        .collect();

    assert_eq!(before, after);
    let outline = |r: &drivemirror_core::domain::SyncReport| {
        r.items()
            .iter()
            .map(|i| (i.local_path.clone(), i.outcome.clone(), i.bytes_written))
            .collect::<Vec<_>>()
    };
    assert_eq!(outline(&first), outline(&second));
}

#[tokio::test]
async fn test_paginated_listing_is_fully_walked() {
    let dest = TempDir::new().unwrap();
    let tree = FakeTree::new();
    tree.paged_folder(
        "root",
        vec![
            vec![file("p1", "one.bin", "root", 3)],
            vec![file("p2", "two.bin", "root", 3)],
            vec![file("p3", "three.bin", "root", 3)],
        ],
    );
    for name in ["p1", "p2", "p3"] {
        tree.content(name, b"xyz");
    }

    let report = orchestrator(tree.clone(), 4)
        .run(SyncTask::new(id("root"), dest.path()), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.succeeded(), 3);
    assert_eq!(tree.list_calls(), 3);
    assert_eq!(files_under(dest.path()).len(), 3);
}

#[tokio::test]
async fn test_workspace_documents_are_exported_or_skipped() {
    let dest = TempDir::new().unwrap();
    let tree = FakeTree::new();
    tree.folder(
        "root",
        vec![
            document("doc", "Notes", "application/vnd.google-apps.document", "root"),
            document("sheet", "Budget", "application/vnd.google-apps.spreadsheet", "root"),
            document("form", "Survey", "application/vnd.google-apps.form", "root"),
        ],
    );
    tree.content("doc", b"%PDF-1.7 notes");
    tree.content("sheet", b"PK-budget");

    let report = orchestrator(tree.clone(), 2)
        .run(SyncTask::new(id("root"), dest.path()), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.skipped(), 1);
    assert_eq!(
        std::fs::read(dest.path().join("Notes.pdf")).unwrap(),
        b"%PDF-1.7 notes"
    );
    assert!(dest.path().join("Budget.xlsx").exists());
    assert!(!dest.path().join("Survey").exists());

    let skipped = report
        .items()
        .iter()
        .find(|i| i.name == "Survey")
        .unwrap();
    assert_eq!(
        skipped.outcome,
        Outcome::Skipped(SkipReason::UnsupportedType {
            mime_type: "application/vnd.google-apps.form".into()
        })
    );

    let mut exports = tree.exports.lock().unwrap().clone();
    exports.sort();
    assert_eq!(
        exports,
        vec![
            (id("doc"), "application/pdf".to_string()),
            (
                id("sheet"),
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet".to_string()
            ),
        ]
    );
}

#[tokio::test]
async fn test_name_collisions_resolve_deterministically() {
    let tree = FakeTree::new();
    tree.folder(
        "root",
        vec![
            file("first", "Report.txt", "root", 5),
            file("second", "report.txt", "root", 6),
        ],
    );
    tree.content("first", b"first");
    tree.content("second", b"second");

    let mut layouts = Vec::new();
    for _ in 0..2 {
        let dest = TempDir::new().unwrap();
        let report = orchestrator(tree.clone(), 4)
            .run(SyncTask::new(id("root"), dest.path()), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.succeeded(), 2);
        assert_eq!(std::fs::read(dest.path().join("Report.txt")).unwrap(), b"first");
        assert_eq!(
            std::fs::read(dest.path().join("report (second).txt")).unwrap(),
            b"second"
        );
        layouts.push(files_under(dest.path()));
    }
    assert_eq!(layouts[0], layouts[1]);
}

#[tokio::test]
async fn test_empty_root_yields_empty_report() {
    let dest = TempDir::new().unwrap();
    let target = dest.path().join("new/mirror");

    let tree = FakeTree::new();
    tree.folder("root", vec![]);

    let report = orchestrator(tree, 4)
        .run(SyncTask::new(id("root"), &target), CancellationToken::new())
        .await
        .unwrap();

    assert!(report.is_empty());
    assert!(target.is_dir());
}

#[tokio::test]
async fn test_every_call_carries_the_access_token() {
    let dest = TempDir::new().unwrap();
    let tree = scenario_tree();

    orchestrator(tree.clone(), 4)
        .run(SyncTask::new(id("root"), dest.path()), CancellationToken::new())
        .await
        .unwrap();

    let tokens = tree.tokens.lock().unwrap();
    assert!(!tokens.is_empty());
    assert!(tokens.iter().all(|t| t == "initial-token"));
}

#[tokio::test]
async fn test_remote_partial_lookalike_survives_purge() {
    let dest = TempDir::new().unwrap();
    let tree = FakeTree::new();
    tree.folder(
        "root",
        vec![
            file("plain", "x", "root", 5),
            file("lookalike", ".x.part", "root", 6),
        ],
    );
    tree.content("plain", b"plain");
    tree.content("lookalike", b"remote");

    let report = orchestrator(tree, 2)
        .run(SyncTask::new(id("root"), dest.path()), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.succeeded(), 2);

    let removed = drivemirror_sync::status::purge_partials(dest.path())
        .await
        .unwrap();
    assert!(removed.is_empty());
    assert_eq!(std::fs::read(dest.path().join("x")).unwrap(), b"plain");
    assert_eq!(std::fs::read(dest.path().join("_x.part")).unwrap(), b"remote");
}
