//! Symbol identity and enrichment behavior across listener layers.

use apexsense::{
    CompileOptions, DetailLevel, SymbolGraph, SymbolKind, SymbolTable, Visibility, compile_layers,
    compile_pass,
};

fn compile(uri: &str, source: &str, level: DetailLevel) -> SymbolTable {
    let mut table = SymbolTable::new(uri);
    compile_layers(source, &mut table, level, &CompileOptions::default()).expect("compile");
    table
}

#[test]
fn simple_class_end_to_end() {
    // S1: one public class with one private field.
    let table = compile(
        "file://TestClass.cls",
        "public class TestClass { private String field; }",
        DetailLevel::Full,
    );

    let class = table
        .get_symbol_by_id("file://TestClass.cls:class:TestClass")
        .expect("class symbol under its canonical id");
    assert_eq!(class.parent_id, None);
    assert_eq!(class.kind, SymbolKind::Class);
    assert!(class.detail_level >= DetailLevel::Private);

    let field = table
        .get_symbol_by_id("file://TestClass.cls:class:TestClass:field:field")
        .expect("field symbol");
    assert_eq!(field.modifiers.visibility, Visibility::Private);

    let mut graph = SymbolGraph::new();
    graph.add_symbol_table(table);
    assert!(graph.get_stats().total_symbols >= 2);
}

#[test]
fn ids_survive_whitespace_edits() {
    let original = "public class A { public void m() { Integer x; } }";
    let reformatted = "public   class A {\n\n    public void m() {\n        Integer x;\n    }\n}";

    let first = compile("file://A.cls", original, DetailLevel::Full);
    let second = compile("file://A.cls", reformatted, DetailLevel::Full);

    let mut first_ids: Vec<String> = first.symbols().iter().map(|s| s.id.clone()).collect();
    let mut second_ids: Vec<String> = second.symbols().iter().map(|s| s.id.clone()).collect();
    first_ids.sort();
    second_ids.sort();
    assert_eq!(first_ids, second_ids);
}

#[test]
fn cross_file_edges_survive_a_whitespace_edit() {
    let mut graph = SymbolGraph::new();
    graph.add_symbol_table(compile(
        "file://X.cls",
        "public class X { public A dep; }",
        DetailLevel::Full,
    ));
    graph.add_symbol_table(compile(
        "file://A.cls",
        "public class A {}",
        DetailLevel::Full,
    ));
    assert_eq!(graph.find_references_to("file://A.cls:class:A").len(), 1);

    // Reindex A from a whitespace-only edit: remove, recompile, re-add.
    graph.remove_file("file://A.cls");
    graph.add_symbol_table(compile(
        "file://A.cls",
        "public class A {\n}\n",
        DetailLevel::Full,
    ));

    let refs = graph.find_references_to("file://A.cls:class:A");
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].source_id, "file://X.cls:class:X");
}

#[test]
fn enrichment_is_monotonic_and_preserves_identity() {
    let source = "public class A { private Integer hidden; public void visible() {} }";
    let mut table = SymbolTable::new("file://A.cls");
    let options = CompileOptions::default();

    compile_pass(source, &mut table, DetailLevel::PublicApi, &options).unwrap();
    assert!(table.get_symbol_by_id("file://A.cls:class:A:field:hidden").is_none());
    let class_before = table.get_symbol_by_id("file://A.cls:class:A").unwrap();
    assert_eq!(class_before.detail_level, DetailLevel::PublicApi);
    let method_parent = table
        .get_symbol_by_id("file://A.cls:class:A:method:visible")
        .unwrap()
        .parent_id
        .clone();

    for level in [DetailLevel::Protected, DetailLevel::Private, DetailLevel::Full] {
        compile_pass(source, &mut table, level, &options).unwrap();
    }

    let class_after = table.get_symbol_by_id("file://A.cls:class:A").unwrap();
    assert_eq!(class_after.detail_level, DetailLevel::Full);
    assert_eq!(class_after.parent_id, None);
    assert!(table.get_symbol_by_id("file://A.cls:class:A:field:hidden").is_some());
    assert_eq!(
        table
            .get_symbol_by_id("file://A.cls:class:A:method:visible")
            .unwrap()
            .parent_id,
        method_parent
    );

    // Replaying a lower layer afterwards changes nothing.
    compile_pass(source, &mut table, DetailLevel::PublicApi, &options).unwrap();
    assert_eq!(
        table
            .get_symbol_by_id("file://A.cls:class:A")
            .unwrap()
            .detail_level,
        DetailLevel::Full
    );
}

#[test]
fn at_most_one_symbol_per_file_has_no_parent() {
    for source in [
        "public class A { public class Inner {} public void m() { Integer x; } }",
        "public enum Season { WINTER, SPRING }",
        "Integer a; Integer b; a = b;",
    ] {
        let table = compile("file://t.cls", source, DetailLevel::Full);
        let roots = table
            .symbols()
            .iter()
            .filter(|s| s.parent_id.is_none())
            .count();
        assert!(roots <= 1, "{source:?} produced {roots} roots");
    }
}

#[test]
fn parent_chains_terminate_without_cycles() {
    let table = compile(
        "file://A.cls",
        "public class A { public void m() { if (true) { while (false) { Integer x; } } } }",
        DetailLevel::Full,
    );

    for start in table.symbols().iter().chain(table.scopes().iter()) {
        let mut hops = 0;
        let mut cursor = start.parent_id.clone();
        while let Some(id) = cursor {
            hops += 1;
            assert!(hops < 64, "parent chain from {} looks cyclic", start.id);
            cursor = table
                .get_symbol_by_id(&id)
                .and_then(|parent| parent.parent_id.clone());
        }
    }
}

#[test]
fn layered_visibility_matches_the_layer_table() {
    let source = "public class A { \
                  global Integer g; \
                  public Integer pub; \
                  protected Integer prot; \
                  private Integer priv; \
                  Integer def; }";

    let visible_at = |level: DetailLevel| -> Vec<String> {
        let table = compile("file://A.cls", source, level);
        table
            .symbols()
            .iter()
            .filter(|s| s.kind == SymbolKind::Field)
            .map(|s| s.name.to_string())
            .collect()
    };

    assert_eq!(visible_at(DetailLevel::PublicApi), vec!["g", "pub"]);
    assert_eq!(visible_at(DetailLevel::Protected), vec!["g", "pub", "prot"]);
    assert_eq!(
        visible_at(DetailLevel::Private),
        vec!["g", "pub", "prot", "priv", "def"]
    );
    assert_eq!(
        visible_at(DetailLevel::Full),
        vec!["g", "pub", "prot", "priv", "def"]
    );
}

#[test]
fn duplicate_declarations_become_queryable_lists() {
    // Same class declared twice in one file (malformed but must not
    // corrupt the table).
    let source = "public class A { public void m() {} public void m() {} }";
    let table = compile("file://A.cls", source, DetailLevel::Full);

    let copies = table.get_all_symbols_by_id("file://A.cls:class:A:method:m");
    assert_eq!(copies.len(), 2);
    // Single lookups return the first declaration.
    let first = table
        .get_symbol_by_id("file://A.cls:class:A:method:m")
        .unwrap();
    assert_eq!(first.location.identifier_range, copies[0].location.identifier_range);
}
