use super::*;
use crate::listener::{CompileOptions, compile_layers};
use crate::types::DetailLevel;

fn compile_table(uri: &str, source: &str) -> SymbolTable {
    let mut table = SymbolTable::new(uri);
    compile_layers(source, &mut table, DetailLevel::Full, &CompileOptions::default())
        .expect("compile");
    table
}

#[test]
fn registers_symbols_and_indexes() {
    let mut graph = SymbolGraph::new();
    graph.add_symbol_table(compile_table(
        "file://A.cls",
        "public class A { public Integer count; public void run() {} }",
    ));

    assert!(graph.get_symbol_by_id("file://A.cls:class:A").is_some());
    assert_eq!(graph.lookup_symbol_by_name("a").len(), 1);
    assert_eq!(graph.lookup_symbol_by_name("RUN").len(), 1);
    assert!(graph.lookup_symbol_by_fqn("a.run").is_some());
    assert!(graph.get_stats().total_symbols >= 3);
}

#[test]
fn deferred_reference_materializes_when_target_loads() {
    let mut graph = SymbolGraph::new();
    graph.add_symbol_table(compile_table("file://A.cls", "public class A { public B b; }"));

    assert!(graph.get_stats().deferred_references >= 1);
    assert!(graph.find_references_to("file://B.cls:class:B").is_empty());

    graph.add_symbol_table(compile_table("file://B.cls", "public class B {}"));

    let refs = graph.find_references_to("file://B.cls:class:B");
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].source_id, "file://A.cls:class:A");
    assert_eq!(refs[0].source_file, "file://A.cls");

    // The source table's reference now knows its target.
    let table = graph.table("file://A.cls").unwrap();
    let resolved = table
        .references()
        .iter()
        .find(|r| r.name.as_ref() == "B")
        .unwrap();
    assert_eq!(
        resolved.resolved_symbol_id.as_deref(),
        Some("file://B.cls:class:B")
    );
}

#[test]
fn removing_the_source_drops_the_edge_but_not_the_target() {
    let mut graph = SymbolGraph::new();
    graph.add_symbol_table(compile_table("file://A.cls", "public class A { public B b; }"));
    graph.add_symbol_table(compile_table("file://B.cls", "public class B {}"));
    assert_eq!(graph.find_references_to("file://B.cls:class:B").len(), 1);

    graph.remove_file("file://A.cls");

    assert!(graph.find_references_to("file://B.cls:class:B").is_empty());
    assert_eq!(graph.get_files_for_symbol("B"), vec!["file://B.cls"]);
    assert!(graph.get_symbols_in_file("file://A.cls").is_empty());
}

#[test]
fn remove_file_is_exact_about_counts() {
    let mut graph = SymbolGraph::new();
    graph.add_symbol_table(compile_table(
        "file://A.cls",
        "public class A { public Integer x; public Integer y; }",
    ));
    graph.add_symbol_table(compile_table("file://B.cls", "public class B {}"));

    let before = graph.get_stats();
    let a_symbols = graph.get_symbols_in_file("file://A.cls").len();
    graph.remove_file("file://A.cls");
    let after = graph.get_stats();

    assert_eq!(after.total_symbols, before.total_symbols - a_symbols);
    assert_eq!(after.total_files, before.total_files - 1);
    // No surviving edge touches a removed id.
    for symbol in graph.get_symbols_in_file("file://B.cls") {
        for edge in graph.find_references_to(&symbol.id) {
            assert!(!edge.source_id.starts_with("file://A.cls"));
        }
    }
}

#[test]
fn removed_target_edges_return_to_the_deferred_queue() {
    let mut graph = SymbolGraph::new();
    graph.add_symbol_table(compile_table("file://A.cls", "public class A { public B b; }"));
    graph.add_symbol_table(compile_table("file://B.cls", "public class B {}"));
    assert_eq!(graph.get_stats().deferred_references, 0);

    graph.remove_file("file://B.cls");
    assert!(graph.get_stats().deferred_references >= 1);

    // A replacement B satisfies the parked reference again.
    graph.add_symbol_table(compile_table("file://B2.cls", "public class B {}"));
    let refs = graph.find_references_to("file://B2.cls:class:B");
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].source_id, "file://A.cls:class:A");
}

#[test]
fn detects_two_file_cycle() {
    let mut graph = SymbolGraph::new();
    graph.add_symbol_table(compile_table("file://A.cls", "public class A { public B b; }"));
    graph.add_symbol_table(compile_table("file://B.cls", "public class B { public A a; }"));

    let cycles = graph.detect_circular_dependencies();
    assert_eq!(cycles.len(), 1);
    let cycle = &cycles[0];
    assert!(cycle.contains(&"file://A.cls:class:A".to_string()));
    assert!(cycle.contains(&"file://B.cls:class:B".to_string()));
    assert_eq!(graph.get_stats().circular_dependencies, 1);
}

#[test]
fn builtin_types_never_defer() {
    let mut graph = SymbolGraph::new();
    graph.add_symbol_table(compile_table(
        "file://A.cls",
        "public class A { public String name; public Map<Id, String> cache; }",
    ));
    assert_eq!(graph.get_stats().deferred_references, 0);
}

#[test]
fn malformed_reference_names_are_never_looked_up() {
    let mut graph = SymbolGraph::new();
    let mut table = compile_table("file://A.cls", "public class A {}");
    table.add_type_reference(crate::reference::TypeReference::new(
        "a.b.c.d",
        Range::at(1, 0, 1, 7),
        ReferenceContext::ClassReference,
    ));
    graph.add_symbol_table(table);
    assert_eq!(graph.get_stats().deferred_references, 0);
}

#[test]
fn add_reference_dedupes_and_defers() {
    let mut graph = SymbolGraph::new();
    graph.add_symbol_table(compile_table("file://A.cls", "public class A {}"));
    graph.add_symbol_table(compile_table("file://B.cls", "public class B {}"));

    let a = "file://A.cls:class:A";
    graph.add_reference(a, "B", ReferenceContext::ClassReference, Range::empty());
    graph.add_reference(a, "B", ReferenceContext::ClassReference, Range::empty());
    assert_eq!(graph.find_references_from(a).len(), 1);

    graph.add_reference(a, "Missing", ReferenceContext::ClassReference, Range::empty());
    assert_eq!(graph.get_stats().deferred_references, 1);
}

#[test]
fn impact_score_counts_dependents() {
    let mut graph = SymbolGraph::new();
    graph.add_symbol_table(compile_table("file://A.cls", "public class A { public C c; }"));
    graph.add_symbol_table(compile_table("file://B.cls", "public class B { public C c; }"));
    graph.add_symbol_table(compile_table("file://C.cls", "public class C {}"));

    let analysis = graph.analyze_dependencies("file://C.cls:class:C");
    assert_eq!(analysis.dependents.len(), 2);
    assert!(analysis.dependencies.is_empty());
    assert!(analysis.impact_score > 0.0 && analysis.impact_score <= 1.0);

    let leaf = graph.analyze_dependencies("file://A.cls:class:A");
    assert_eq!(leaf.dependencies, vec!["file://C.cls:class:C".to_string()]);
}

#[test]
fn enrichment_reregistration_keeps_single_slot() {
    let mut graph = SymbolGraph::new();
    let source = "public class A { private Integer hidden; }";

    let mut shallow = SymbolTable::new("file://A.cls");
    compile_layers(
        source,
        &mut shallow,
        DetailLevel::PublicApi,
        &CompileOptions::default(),
    )
    .unwrap();
    graph.add_symbol_table(shallow);
    let before = graph.get_stats().total_symbols;

    let mut deep = SymbolTable::new("file://A.cls");
    compile_layers(source, &mut deep, DetailLevel::Full, &CompileOptions::default()).unwrap();
    graph.add_symbol_table(deep);

    // The class slot merged; only genuinely new symbols were added.
    let class = graph.get_symbol_by_id("file://A.cls:class:A").unwrap();
    assert_eq!(class.detail_level, DetailLevel::Full);
    assert_eq!(graph.get_all_symbols_by_id("file://A.cls:class:A").len(), 1);
    assert!(graph.get_stats().total_symbols > before);
}
