//! apexsense: symbol indexing and cross-file resolution core for Apex
//! language services.
//!
//! The crate ingests parsed Apex source and maintains three things: a
//! per-file [`table::SymbolTable`] with a precise scope hierarchy, a
//! process-wide [`graph::SymbolGraph`] linking definitions to references
//! across files (with deferred resolution for targets that arrive later),
//! and a tier-ordered [`validation::ValidatorRegistry`] driven by the
//! [`diagnostics::DiagnosticOrchestrator`]. Hover, go-to-definition,
//! find-references and diagnostics are all built on these.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod exec;
pub mod graph;
pub mod listener;
pub mod logging;
pub mod parser;
pub mod reference;
pub mod store;
pub mod symbol;
pub mod table;
pub mod types;
pub mod validation;

pub use config::Settings;
pub use diagnostics::{Diagnostic, DiagnosticOrchestrator, LoadArtifactFn, Severity};
pub use error::{CompileError, IndexError, IndexResult, ValidationError};
pub use exec::{CancellationToken, WorkBudget};
pub use graph::{DependencyAnalysis, FullReferenceEdge, GraphStats, SymbolGraph};
pub use listener::{
    CompileOptions, CompileOutcome, SemanticError, SymbolCollector, compile, compile_layers,
    compile_pass,
};
pub use reference::{AccessKind, ChainNode, LiteralType, ReferenceContext, TypeReference};
pub use store::{Document, DocumentStateCache, DocumentStore, InMemoryDocumentStore};
pub use symbol::{ParameterInfo, PathSegment, Symbol, SymbolKey, SymbolLocation, SymbolPayload};
pub use table::{SymbolSlot, SymbolTable};
pub use types::{
    CompactString, DetailLevel, ModifierFlags, Modifiers, Position, Range, ScopeType, SymbolKind,
    Visibility, case_fold,
};
pub use validation::{
    Finding, Prerequisites, ValidationContext, ValidationResult, Validator, ValidatorRegistry,
    ValidatorTier,
};
