//! Reference classification: access kinds, qualifier correction, chains,
//! literals, and position queries.

use apexsense::{
    AccessKind, CompileOptions, DetailLevel, LiteralType, Position, ReferenceContext, SymbolTable,
    TypeReference, compile_layers,
};

fn compile_with(uri: &str, source: &str, options: &CompileOptions) -> SymbolTable {
    let mut table = SymbolTable::new(uri);
    compile_layers(source, &mut table, DetailLevel::Full, options).expect("compile");
    table
}

fn compile(uri: &str, source: &str) -> SymbolTable {
    compile_with(uri, source, &CompileOptions::default())
}

fn usages<'t>(table: &'t SymbolTable, name: &str) -> Vec<&'t TypeReference> {
    table
        .references()
        .iter()
        .filter(|r| r.context == ReferenceContext::VariableUsage && r.name.as_ref() == name)
        .collect()
}

#[test]
fn assignment_access_kinds() {
    // S4: one write and one readwrite on a, two reads on b.
    let table = compile("file://t.cls", "Integer a; Integer b; a = b; a += b;");

    let a = usages(&table, "a");
    assert_eq!(a.len(), 2);
    assert_eq!(a[0].access, Some(AccessKind::Write));
    assert_eq!(a[1].access, Some(AccessKind::ReadWrite));

    let b = usages(&table, "b");
    assert_eq!(b.len(), 2);
    assert!(b.iter().all(|r| r.access == Some(AccessKind::Read)));
}

#[test]
fn field_store_reads_object_writes_member() {
    let table = compile("file://t.cls", "Account obj; Integer y; obj.x = y;");

    let obj = usages(&table, "obj");
    assert_eq!(obj.len(), 1);
    assert_eq!(obj[0].access, Some(AccessKind::Read));

    let member = table
        .references()
        .iter()
        .find(|r| r.context == ReferenceContext::FieldAccess && r.name.as_ref() == "x")
        .expect("field access on x");
    assert_eq!(member.access, Some(AccessKind::Write));
    assert_eq!(member.qualifier.as_deref(), Some("obj"));

    let y = usages(&table, "y");
    assert_eq!(y.len(), 1);
    assert_eq!(y[0].access, Some(AccessKind::Read));
}

#[test]
fn indexed_store_is_all_reads() {
    let table = compile(
        "file://t.cls",
        "List<Integer> arr; Integer i; Integer v; arr[i] = v;",
    );

    for name in ["arr", "i", "v"] {
        let refs = usages(&table, name);
        assert_eq!(refs.len(), 1, "{name}");
        assert_eq!(refs[0].access, Some(AccessKind::Read), "{name}");
    }
}

#[test]
fn qualifier_correction_rewrites_known_types() {
    // S5: EncodingUtil is a type in the same file.
    let source = "public class Util { \
                  public class EncodingUtil { } \
                  public void run() { EncodingUtil.urlEncode('a', 'b'); } }";

    let corrected = compile("file://u.cls", source);
    let class_ref = corrected
        .references()
        .iter()
        .find(|r| r.name.as_ref() == "EncodingUtil" && r.context == ReferenceContext::ClassReference)
        .expect("corrected CLASS_REFERENCE");
    assert_eq!(class_ref.access, None);
    let call = corrected
        .references()
        .iter()
        .find(|r| r.context == ReferenceContext::MethodCall && r.name.as_ref() == "urlEncode")
        .expect("method call");
    assert_eq!(call.qualifier.as_deref(), Some("EncodingUtil"));

    // With correction disabled the qualifier stays a variable usage.
    let options = CompileOptions {
        enable_reference_correction: false,
        ..CompileOptions::default()
    };
    let uncorrected = compile_with("file://u.cls", source, &options);
    assert!(
        uncorrected
            .references()
            .iter()
            .any(|r| r.name.as_ref() == "EncodingUtil"
                && r.context == ReferenceContext::VariableUsage)
    );
    assert!(
        !uncorrected
            .references()
            .iter()
            .any(|r| r.context == ReferenceContext::ClassReference)
    );
}

#[test]
fn unknown_qualifiers_stay_variable_usages() {
    // Cross-file class not yet known: no local correction.
    let table = compile(
        "file://u.cls",
        "public class Util { public void run() { SomewhereElse.work(); } }",
    );
    assert!(
        table
            .references()
            .iter()
            .any(|r| r.name.as_ref() == "SomewhereElse"
                && r.context == ReferenceContext::VariableUsage)
    );
}

#[test]
fn multi_segment_type_names_are_chained() {
    let table = compile(
        "file://t.cls",
        "public class C { public System.Url endpoint; }",
    );

    let chained = table
        .references()
        .iter()
        .find(|r| r.context == ReferenceContext::ChainedType)
        .expect("chained type reference");
    assert_eq!(chained.name.as_ref(), "System.Url");
    assert_eq!(chained.chain_nodes.len(), 2);
    assert_eq!(chained.chain_nodes[0].name.as_ref(), "System");
    assert_eq!(chained.chain_nodes[1].name.as_ref(), "Url");
}

#[test]
fn generic_arguments_are_separate_references() {
    let table = compile(
        "file://t.cls",
        "public class C { public Map<Id, Account> cache; }",
    );

    let generic_refs: Vec<_> = table
        .references()
        .iter()
        .filter(|r| r.context == ReferenceContext::GenericParameterType)
        .collect();
    let names: Vec<&str> = generic_refs.iter().map(|r| r.name.as_ref()).collect();
    assert_eq!(names, vec!["Id", "Account"]);
}

#[test]
fn literals_carry_type_and_value() {
    let table = compile(
        "file://t.cls",
        "Integer a = 5; Long b = 10L; Decimal c = 1.5; String d = 'hi'; Boolean e = true; Object f = null;",
    );

    let literal = |value: &str| -> LiteralType {
        table
            .references()
            .iter()
            .find(|r| r.context == ReferenceContext::Literal
                && r.literal_value.as_deref() == Some(value))
            .unwrap_or_else(|| panic!("literal {value}"))
            .literal_type
            .unwrap()
    };

    assert_eq!(literal("5"), LiteralType::Integer);
    assert_eq!(literal("10L"), LiteralType::Long);
    assert_eq!(literal("1.5"), LiteralType::Decimal);
    assert_eq!(literal("'hi'"), LiteralType::String);
    assert_eq!(literal("true"), LiteralType::Boolean);
    assert_eq!(literal("null"), LiteralType::Null);
}

#[test]
fn references_round_trip_through_position_queries() {
    let source = "Account obj; obj.Name = 'x'; helper(obj);";
    let table = compile("file://t.cls", source);

    for reference in table.references() {
        let hits = table.get_references_at_position(reference.location.start);
        assert!(
            hits.iter().any(|hit| *hit == reference),
            "reference {:?} not found at its own position",
            reference.name
        );
    }
}

#[test]
fn position_queries_hit_qualifier_and_chain_spans() {
    let source = "public class C { public void m() { a.b.c(); } }";
    let table = compile("file://c.cls", source);

    let chain_ref = table
        .references()
        .iter()
        .find(|r| !r.chain_nodes.is_empty())
        .expect("chained call reference");

    // Querying at the middle chain segment finds the chained reference.
    let middle = chain_ref.chain_nodes[1].location.start;
    let hits = table.get_references_at_position(middle);
    assert!(hits.iter().any(|hit| *hit == chain_ref));
}

#[test]
fn parent_context_names_the_enclosing_method() {
    let table = compile(
        "file://t.cls",
        "public class C { public void worker() { Integer x; x = 1; } }",
    );
    let write = usages(&table, "x")
        .into_iter()
        .find(|r| r.access == Some(AccessKind::Write))
        .expect("write usage");
    assert_eq!(write.parent_context.as_deref(), Some("worker"));
}

#[test]
fn constructor_and_cast_and_instanceof_references() {
    let table = compile(
        "file://t.cls",
        "public class C { public void m(Object o) { \
         C other = new C(); \
         C cast = (C) o; \
         Boolean ok = o instanceof C; } }",
    );

    let contexts: Vec<ReferenceContext> = table
        .references()
        .iter()
        .filter(|r| r.name.as_ref() == "C")
        .map(|r| r.context)
        .collect();
    assert!(contexts.contains(&ReferenceContext::ConstructorCall));
    assert!(contexts.contains(&ReferenceContext::CastTypeReference));
    assert!(contexts.contains(&ReferenceContext::InstanceofTypeReference));
    assert!(contexts.contains(&ReferenceContext::VariableDeclaration));
}

#[test]
fn reference_collection_can_be_disabled() {
    let options = CompileOptions {
        collect_references: false,
        ..CompileOptions::default()
    };
    let table = compile_with("file://t.cls", "Integer a; a = 1;", &options);
    assert!(table.references().is_empty());
    assert!(!table.references_collected());
    assert!(
        table
            .get_references_at_position(Position::new(1, 0))
            .is_empty()
    );
}
