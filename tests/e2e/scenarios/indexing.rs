use crate::harness::workspace::fixture_files;
use crate::harness::{Assertion, Scenario, TestWorkspace};
use ice_core::{CodebaseIndex, IndexConfig};

#[test]
fn test_build_twice_yields_same_content() {
    let workspace = TestWorkspace::from_fixture("default").unwrap();
    let config = IndexConfig::default();

    let first = CodebaseIndex::build(workspace.path(), &config).unwrap();
    let second = first.rebuild(workspace.path(), &config).unwrap();

    assert_ne!(first.version(), second.version());
    assert_eq!(first.len(), second.len());
    assert_eq!(first.total_symbols(), second.total_symbols());
    for file in first.files() {
        let other = second.file(&file.path).unwrap();
        assert_eq!(file.symbols, other.symbols, "{}", file.path);
        assert_eq!(file.line_count, other.line_count, "{}", file.path);
        assert_eq!(file.imported_by, other.imported_by, "{}", file.path);
    }
}

#[test]
fn test_two_checkouts_index_identically() {
    let files = fixture_files("default").unwrap();
    let a = TestWorkspace::with_files(&files).unwrap();
    let b = TestWorkspace::with_files(&files).unwrap();
    let config = IndexConfig::default();

    let a = CodebaseIndex::build(a.path(), &config).unwrap();
    let b = CodebaseIndex::build(b.path(), &config).unwrap();
    assert_eq!(a.summary().languages, b.summary().languages);
    assert_eq!(a.total_lines(), b.total_lines());

    let paths = |hits: Vec<ice_core::SearchHit>| -> Vec<(String, u32)> {
        hits.into_iter().map(|h| (h.file.path.clone(), h.score)).collect()
    };
    assert_eq!(paths(a.search("render", 10)), paths(b.search("render", 10)));
}

#[test]
fn test_search_for_code_generator_is_stable() {
    Scenario::new("search_stable")
        .from_fixture("default")
        .assert(Assertion::SearchTopHit {
            query: "CodeGenerator".into(),
            path: "src/generator.py".into(),
        })
        .assert(Assertion::SearchStable {
            query: "CodeGenerator".into(),
        })
        .run()
        .expect("search should be deterministic");
}

#[test]
fn test_import_graph_links_languages() {
    Scenario::new("import_graph")
        .from_fixture("default")
        .assert(Assertion::RelatedTo {
            path: "src/generator.py".into(),
            related: "src/utils.py".into(),
        })
        .assert(Assertion::RelatedTo {
            path: "src/config.rs".into(),
            related: "src/main.rs".into(),
        })
        .assert(Assertion::RelatedTo {
            path: "web/app.ts".into(),
            related: "web/format.ts".into(),
        })
        .run()
        .unwrap();
}

#[test]
fn test_reindex_picks_up_outside_changes() {
    Scenario::new("reindex_outside_changes")
        .from_fixture("default")
        .assert_index_version(1)
        .external_write("src/extra.py", b"def brand_new_helper():\n    return 1\n")
        .reindex()
        .assert_index_version(2)
        .assert(Assertion::IndexHasSymbol("brand_new_helper".into()))
        .external_delete("src/extra.py")
        .reindex()
        .assert_index_version(3)
        .assert(Assertion::IndexLacksSymbol("brand_new_helper".into()))
        // Nothing changed: no new version.
        .reindex()
        .assert_index_version(3)
        .run()
        .unwrap();
}

#[test]
fn test_session_edits_refresh_the_index() {
    Scenario::new("edit_refreshes_index")
        .from_fixture("default")
        .turn_writing(
            "create src/dates.py",
            "src/dates.py",
            b"def parse_date(text):\n    \"\"\"Parse an ISO date.\"\"\"\n    return text\n",
        )
        .wait_for_index()
        .assert_index_version(2)
        .assert(Assertion::IndexHasSymbol("parse_date".into()))
        .assert(Assertion::SearchTopHit {
            query: "parse_date".into(),
            path: "src/dates.py".into(),
        })
        .run()
        .unwrap();
}

#[test]
fn test_restart_reuses_cache() {
    Scenario::new("restart_reuses_cache")
        .from_fixture("default")
        .external_write("src/extra.py", b"def helper():\n    pass\n")
        .reindex()
        .restart()
        .assert(Assertion::CacheWasLoaded)
        .assert_index_version(2)
        .assert(Assertion::IndexHasSymbol("helper".into()))
        .run()
        .unwrap();
}

#[test]
fn test_restart_after_outside_change_rebuilds() {
    Scenario::new("restart_rebuilds")
        .from_fixture("default")
        .restart()
        .assert(Assertion::CacheWasLoaded)
        .external_write("src/late.py", b"class LateArrival:\n    pass\n")
        .restart()
        .assert(Assertion::IndexHasSymbol("LateArrival".into()))
        .assert_index_version(2)
        .run()
        .unwrap();
}
