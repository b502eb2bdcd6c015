//! Cross-file resolution: deferred references, incremental removal, and
//! cycle analysis end to end.

use apexsense::{
    CancellationToken, CompileOptions, DetailLevel, SymbolGraph, SymbolTable, compile_layers,
};

fn compile(uri: &str, source: &str) -> SymbolTable {
    let mut table = SymbolTable::new(uri);
    compile_layers(source, &mut table, DetailLevel::Full, &CompileOptions::default())
        .expect("compile");
    table
}

#[test]
fn s3_deferred_reference_lifecycle() {
    let mut graph = SymbolGraph::new();

    // Load A first: its reference to B has nowhere to go.
    graph.add_symbol_table(compile("file://A.cls", "public class A { public B b; }"));
    let stats = graph.get_stats();
    assert!(stats.deferred_references >= 1, "expected a deferred reference on B");

    // Load B: the edge A -> B materializes without recompiling A.
    graph.add_symbol_table(compile("file://B.cls", "public class B {}"));
    let refs = graph.find_references_to("file://B.cls:class:B");
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].source_id, "file://A.cls:class:A");

    // Remove A: the edge vanishes, B itself stays addressable.
    graph.remove_file("file://A.cls");
    assert!(graph.find_references_to("file://B.cls:class:B").is_empty());
    assert_eq!(graph.get_files_for_symbol("B"), vec!["file://B.cls"]);
}

#[test]
fn eventual_consistency_is_order_independent() {
    let a_src = "public class A { public B b; }";
    let b_src = "public class B { public A a; }";

    for order in [["A", "B"], ["B", "A"]] {
        let mut graph = SymbolGraph::new();
        for name in order {
            let (uri, src) = match name {
                "A" => ("file://A.cls", a_src),
                _ => ("file://B.cls", b_src),
            };
            graph.add_symbol_table(compile(uri, src));
        }
        assert_eq!(
            graph.find_references_to("file://A.cls:class:A").len(),
            1,
            "order {order:?}"
        );
        assert_eq!(
            graph.find_references_to("file://B.cls:class:B").len(),
            1,
            "order {order:?}"
        );
    }
}

#[test]
fn s6_circular_dependency_detection() {
    let mut graph = SymbolGraph::new();
    graph.add_symbol_table(compile("file://A.cls", "public class A { public B b; }"));
    graph.add_symbol_table(compile("file://B.cls", "public class B { public A a; }"));

    let cycles = graph.detect_circular_dependencies();
    assert_eq!(cycles.len(), 1);
    assert!(cycles[0].contains(&"file://A.cls:class:A".to_string()));
    assert!(cycles[0].contains(&"file://B.cls:class:B".to_string()));

    // A third, acyclic file does not join the component.
    graph.add_symbol_table(compile("file://C.cls", "public class C { public A a; }"));
    let cycles = graph.detect_circular_dependencies();
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].len(), 2);
}

#[tokio::test]
async fn enhancement_backfills_resolution_ids() {
    let mut graph = SymbolGraph::new();
    graph.add_symbol_table(compile(
        "file://A.cls",
        "public class A { public void m() { B helper; helper = new B(); } }",
    ));
    graph.add_symbol_table(compile("file://B.cls", "public class B {}"));

    let token = CancellationToken::new();
    graph.enhance_cross_file("file://A.cls", &token).await.unwrap();

    let table = graph.table("file://A.cls").unwrap();
    assert!(table.cross_file_resolved());
    let constructor_ref = table
        .references()
        .iter()
        .find(|r| r.context == apexsense::ReferenceContext::ConstructorCall)
        .expect("constructor reference");
    assert_eq!(
        constructor_ref.resolved_symbol_id.as_deref(),
        Some("file://B.cls:class:B")
    );
}

#[tokio::test]
async fn enhancement_respects_cancellation() {
    let mut graph = SymbolGraph::new();
    let mut source = String::from("public class Big { public void m() { ");
    for i in 0..120 {
        source.push_str(&format!("Integer v{i}; v{i} = {i}; "));
    }
    source.push_str("} }");
    graph.add_symbol_table(compile("file://Big.cls", &source));

    let token = CancellationToken::new();
    token.cancel();
    let err = graph
        .enhance_cross_file("file://Big.cls", &token)
        .await
        .unwrap_err();
    assert!(matches!(err, apexsense::IndexError::Cancelled));
    // The table is still registered and usable after abandonment.
    assert!(graph.table("file://Big.cls").is_some());
    assert!(!graph.table("file://Big.cls").unwrap().cross_file_resolved());
}

#[test]
fn stats_track_every_store() {
    let mut graph = SymbolGraph::new();
    graph.add_symbol_table(compile("file://A.cls", "public class A { public B b; public Missing x; }"));
    graph.add_symbol_table(compile("file://B.cls", "public class B {}"));

    let stats = graph.get_stats();
    assert_eq!(stats.total_files, 2);
    assert!(stats.total_symbols >= 4);
    assert!(stats.total_references >= 1);
    assert_eq!(stats.deferred_references, 1); // Missing
    assert_eq!(stats.circular_dependencies, 0);
}

#[test]
fn case_insensitive_cross_file_lookup() {
    let mut graph = SymbolGraph::new();
    graph.add_symbol_table(compile("file://A.cls", "public class A { public accountHelper h; }"));
    graph.add_symbol_table(compile(
        "file://AccountHelper.cls",
        "public class AccountHelper {}",
    ));

    let refs = graph.find_references_to("file://AccountHelper.cls:class:AccountHelper");
    assert_eq!(refs.len(), 1);
    assert_eq!(
        graph.lookup_symbol_by_fqn("ACCOUNTHELPER").unwrap().name.as_ref(),
        "AccountHelper"
    );
}
