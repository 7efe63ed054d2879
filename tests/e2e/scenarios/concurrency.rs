use crate::harness::TestWorkspace;
use ice_core::{CodebaseIndex, IndexHandle};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Every import edge must be mirrored by an importer edge in the same snapshot.
fn assert_graph_consistent(index: &CodebaseIndex) {
    for file in index.files() {
        for target in &file.imported_paths {
            let target_record = index
                .file(target)
                .unwrap_or_else(|| panic!("v{}: {} imports missing {}", index.version(), file.path, target));
            assert!(
                target_record.imported_by.contains(&file.path),
                "v{}: {} -> {} has no back edge",
                index.version(),
                file.path,
                target
            );
        }
        for source in &file.imported_by {
            let source_record = index.file(source).unwrap();
            assert!(source_record.imported_paths.contains(&file.path));
        }
    }
}

#[test]
fn test_search_during_updates_sees_one_version() {
    let workspace = TestWorkspace::from_fixture("default").unwrap();
    let ice = workspace.init_ice().unwrap();
    let handle: Arc<IndexHandle> = Arc::clone(ice.index());
    let config = ice.config().index.clone();
    let root = workspace.path().to_path_buf();
    let done = AtomicBool::new(false);

    thread::scope(|scope| {
        for _ in 0..3 {
            scope.spawn(|| {
                let mut seen = 0;
                while !done.load(Ordering::SeqCst) || seen == 0 {
                    let snapshot = handle.snapshot();
                    for hit in snapshot.search("CodeGenerator", 10) {
                        assert_eq!(hit.version, snapshot.version());
                        let record = snapshot.file(&hit.file.path).unwrap();
                        assert!(Arc::ptr_eq(record, &hit.file));
                    }
                    assert_graph_consistent(&snapshot);
                    seen += 1;
                }
            });
        }

        let changed = BTreeSet::from(["src/churn.py".to_string()]);
        for round in 0..20 {
            // Alternate between importing utils and not, so the graph changes.
            let content = if round % 2 == 0 {
                format!("from .utils import slugify\n\nclass CodeGenerator{}:\n    pass\n", round)
            } else {
                format!("def churn_{}():\n    pass\n", round)
            };
            workspace.write_file("src/churn.py", content.as_bytes()).unwrap();
            let published = handle.refresh(&root, &changed, &config).unwrap();
            assert_eq!(published, Some(round + 2));
        }
        done.store(true, Ordering::SeqCst);
    });

    let last = handle.snapshot();
    assert_eq!(last.version(), 21);
    assert!(!last.find_symbol("churn_19").is_empty());
    assert_graph_consistent(&last);
}

#[test]
fn test_versions_only_increase() {
    let workspace = TestWorkspace::from_fixture("default").unwrap();
    let ice = workspace.init_ice().unwrap();
    let handle = Arc::clone(ice.index());
    let config = ice.config().index.clone();

    let before = handle.snapshot();
    let stale = before.incremental_update(workspace.path(), &BTreeSet::new(), &config).unwrap();
    workspace.write_file("src/fresh.py", b"def fresh():\n    pass\n").unwrap();
    assert_eq!(handle.refresh_detected(workspace.path(), &config).unwrap(), Some(2));

    // A snapshot built from an older base does not replace a newer one.
    assert!(!handle.publish(stale));
    assert_eq!(handle.version(), 2);
    assert!(!handle.snapshot().find_symbol("fresh").is_empty());

    // Readers that took a snapshot earlier keep it.
    assert_eq!(before.version(), 1);
    assert!(before.find_symbol("fresh").is_empty());
}
