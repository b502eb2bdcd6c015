//! End-to-end pull/push diagnostics through the orchestrator.

use apexsense::validation::{
    Finding, Prerequisites, ValidationContext, ValidationResult, Validator, ValidatorTier,
};
use apexsense::{
    CancellationToken, DiagnosticOrchestrator, Document, DocumentStore, InMemoryDocumentStore,
    Settings, Severity, SymbolTable, ValidationError,
};
use std::sync::Arc;

fn orchestrator_with(
    docs: &[(&str, &str)],
) -> (DiagnosticOrchestrator, Arc<InMemoryDocumentStore>) {
    let store = Arc::new(InMemoryDocumentStore::new());
    for (uri, text) in docs {
        store.set_document(uri, Document::new(*text, 1, "apex"));
    }
    let orchestrator = DiagnosticOrchestrator::new(Settings::default(), store.clone());
    (orchestrator, store)
}

#[tokio::test]
async fn unresolved_types_surface_from_pull() {
    let (mut orchestrator, _store) = orchestrator_with(&[(
        "file://A.cls",
        "public class A { public Missing field; }",
    )]);

    let token = CancellationToken::new();
    let diagnostics = orchestrator.pull_diagnostics("file://A.cls", &token).await;

    let unresolved: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.code == "INVALID_UNRESOLVED_TYPE")
        .collect();
    assert_eq!(unresolved.len(), 1);
    assert!(unresolved[0].message.contains("Missing"));
    assert_eq!(unresolved[0].severity, Severity::Error);
}

#[tokio::test]
async fn known_types_produce_no_unresolved_diagnostics() {
    let (mut orchestrator, _store) = orchestrator_with(&[
        ("file://A.cls", "public class A { public B field; }"),
        ("file://B.cls", "public class B {}"),
    ]);

    let token = CancellationToken::new();
    // Register B first so A resolves.
    orchestrator.pull_diagnostics("file://B.cls", &token).await;
    let diagnostics = orchestrator.pull_diagnostics("file://A.cls", &token).await;
    assert!(diagnostics.iter().all(|d| d.code != "INVALID_UNRESOLVED_TYPE"));
}

#[tokio::test]
async fn syntax_errors_survive_validator_stages() {
    let (mut orchestrator, _store) = orchestrator_with(&[(
        "file://Broken.cls",
        "public class Broken { public void m( { }",
    )]);

    let token = CancellationToken::new();
    let diagnostics = orchestrator.pull_diagnostics("file://Broken.cls", &token).await;
    assert!(diagnostics.iter().any(|d| d.code == "SYNTAX_ERROR"));
}

#[tokio::test]
async fn semantic_listener_errors_join_the_stream() {
    let (mut orchestrator, _store) = orchestrator_with(&[(
        "file://Dup.cls",
        "public class Dup { public void m() { Integer x; Integer x; } }",
    )]);

    let token = CancellationToken::new();
    let diagnostics = orchestrator.pull_diagnostics("file://Dup.cls", &token).await;
    assert!(diagnostics.iter().any(|d| d.code == "DUPLICATE_VARIABLE"));
}

#[tokio::test]
async fn standard_library_uris_are_suppressed() {
    let (mut orchestrator, store) = orchestrator_with(&[]);
    store.set_document(
        "apexlib://System.cls",
        Document::new("public class System { broken", 1, "apex"),
    );

    let token = CancellationToken::new();
    let diagnostics = orchestrator
        .pull_diagnostics("apexlib://System.cls", &token)
        .await;
    assert!(diagnostics.is_empty());
}

#[tokio::test]
async fn unknown_documents_return_empty() {
    let (mut orchestrator, _store) = orchestrator_with(&[]);
    let token = CancellationToken::new();
    let diagnostics = orchestrator.pull_diagnostics("file://ghost.cls", &token).await;
    assert!(diagnostics.is_empty());
}

#[tokio::test]
async fn circular_dependencies_warn_from_thorough_tier() {
    let (mut orchestrator, _store) = orchestrator_with(&[
        ("file://A.cls", "public class A { public B b; }"),
        ("file://B.cls", "public class B { public A a; }"),
    ]);

    let token = CancellationToken::new();
    orchestrator.pull_diagnostics("file://B.cls", &token).await;
    let diagnostics = orchestrator.pull_diagnostics("file://A.cls", &token).await;

    let cycle: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.code == "CIRCULAR_DEPENDENCY")
        .collect();
    assert!(!cycle.is_empty());
    assert!(cycle.iter().all(|d| d.severity == Severity::Warning));
}

#[tokio::test]
async fn duplicate_method_diagnostics_from_immediate_tier() {
    let (mut orchestrator, _store) = orchestrator_with(&[(
        "file://C.cls",
        "public class C { public void run(Integer a) {} public void run(Integer b) {} }",
    )]);

    let token = CancellationToken::new();
    let diagnostics = orchestrator.pull_diagnostics("file://C.cls", &token).await;
    assert!(diagnostics.iter().any(|d| d.code == "DUPLICATE_METHOD"));
}

struct EchoValidator {
    tier: ValidatorTier,
}

impl Validator for EchoValidator {
    fn id(&self) -> &'static str {
        "echo"
    }
    fn name(&self) -> &'static str {
        "echo"
    }
    fn tier(&self) -> ValidatorTier {
        self.tier
    }
    fn priority(&self) -> u32 {
        99
    }
    fn prerequisites(&self) -> Prerequisites {
        Prerequisites::default()
    }
    fn validate(
        &self,
        table: &SymbolTable,
        _ctx: &ValidationContext,
    ) -> Result<ValidationResult, ValidationError> {
        let location = table.root_symbols().first().map(|s| s.location.identifier_range);
        Ok(ValidationResult {
            errors: vec![Finding::error("ECHO", "same finding", location)],
            warnings: vec![],
        })
    }
}

#[tokio::test]
async fn identical_findings_from_different_validators_dedupe() {
    let (mut orchestrator, _store) =
        orchestrator_with(&[("file://A.cls", "public class A {}")]);
    orchestrator.registry_mut().register(Box::new(EchoValidator {
        tier: ValidatorTier::Immediate,
    }));
    orchestrator.registry_mut().register(Box::new(EchoValidator {
        tier: ValidatorTier::Thorough,
    }));

    let token = CancellationToken::new();
    let diagnostics = orchestrator.pull_diagnostics("file://A.cls", &token).await;
    let echoes: Vec<_> = diagnostics.iter().filter(|d| d.code == "ECHO").collect();
    assert_eq!(echoes.len(), 1);
}

#[tokio::test]
async fn artifact_loading_resolves_missing_types() {
    let (orchestrator, _store) = orchestrator_with(&[(
        "file://A.cls",
        "public class A { public ExternalThing t; }",
    )]);
    let mut orchestrator = orchestrator.with_artifact_loader(Arc::new(|name: &str| {
        (name == "ExternalThing").then(|| "public class ExternalThing {}".to_string())
    }));

    let token = CancellationToken::new();
    let diagnostics = orchestrator.pull_diagnostics("file://A.cls", &token).await;

    assert!(diagnostics.iter().all(|d| d.code != "INVALID_UNRESOLVED_TYPE"));
    assert!(
        !orchestrator
            .graph()
            .get_symbols_in_file("apexlib://ExternalThing.cls")
            .is_empty()
    );
}

#[tokio::test]
async fn cancellation_returns_empty_cleanly() {
    let (mut orchestrator, _store) =
        orchestrator_with(&[("file://A.cls", "public class A {}")]);
    let token = CancellationToken::new();
    token.cancel();
    let diagnostics = orchestrator.pull_diagnostics("file://A.cls", &token).await;
    assert!(diagnostics.is_empty());
}

#[tokio::test]
async fn push_diagnostics_run_the_immediate_tier_only() {
    let (mut orchestrator, _store) = orchestrator_with(&[(
        "file://A.cls",
        "public class A { public Missing field; }",
    )]);

    let diagnostics = orchestrator.push_diagnostics("file://A.cls").await;
    // Unresolved-type checks are THOROUGH; push must not produce them.
    assert!(diagnostics.iter().all(|d| d.code != "INVALID_UNRESOLVED_TYPE"));
}

#[tokio::test]
async fn edits_reindex_without_symbol_duplication() {
    let (mut orchestrator, store) =
        orchestrator_with(&[("file://A.cls", "public class A { public Integer a; }")]);
    let token = CancellationToken::new();
    orchestrator.pull_diagnostics("file://A.cls", &token).await;
    let before = orchestrator.graph().get_symbols_in_file("file://A.cls").len();

    store.set_document(
        "file://A.cls",
        Document::new("public class A { public Integer a; public Integer b; }", 2, "apex"),
    );
    orchestrator.pull_diagnostics("file://A.cls", &token).await;

    let after = orchestrator.graph().get_symbols_in_file("file://A.cls").len();
    assert_eq!(after, before + 1);
    assert_eq!(
        orchestrator
            .graph()
            .get_all_symbols_by_id("file://A.cls:class:A")
            .len(),
        1
    );
}
