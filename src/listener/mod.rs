//! Layered listeners and the `compile` entry point.
//!
//! The four visibility layers share one tree walker; a layer is just a
//! [`DetailLevel`] handed to [`SymbolCollector`]. Running passes in
//! ascending order against the same table makes later passes enrich the
//! symbols earlier passes created:
//!
//! | layer      | emits declarations with visibility        | locals & bodies |
//! |------------|-------------------------------------------|-----------------|
//! | public-api | global, public                            | no              |
//! | protected  | public, protected                         | no              |
//! | private    | public, protected, private, default       | no              |
//! | full       | everything                                | yes             |

pub mod collector;
pub mod references;

pub use collector::SymbolCollector;
pub use references::{collect_expr, collect_type_ref, correct_class_references};

use crate::config::Settings;
use crate::error::{CompileError, CompileResult};
use crate::parser::{self, ParseOutcome, ParseTreeListener, SyntaxError};
use crate::table::SymbolTable;
use crate::types::{DetailLevel, Range};

/// Listener-reported semantic problem (duplicate variable, conflicting
/// modifiers, ...), collected on an error sink passed into the walker.
#[derive(Debug, Clone)]
pub struct SemanticError {
    pub code: &'static str,
    pub message: String,
    pub range: Range,
}

/// Knobs recognized by [`compile`]. Mirrors the client-facing
/// configuration; see [`Settings`] for defaults.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub collect_references: bool,
    pub resolve_references: bool,
    pub enable_reference_correction: bool,
    pub include_comments: bool,
    /// 0 disables the cap.
    pub max_tokens: usize,
    /// Wall-clock budget for one compilation, in milliseconds. 0 disables.
    pub timeout_ms: u64,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            collect_references: true,
            resolve_references: true,
            enable_reference_correction: true,
            include_comments: false,
            max_tokens: 0,
            timeout_ms: 0,
        }
    }
}

impl From<&Settings> for CompileOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            collect_references: settings.compiler.collect_references,
            resolve_references: settings.compiler.resolve_references,
            enable_reference_correction: settings.compiler.enable_reference_correction,
            include_comments: false,
            max_tokens: settings.compiler.max_tokens,
            timeout_ms: 0,
        }
    }
}

/// Everything one compilation pass produced besides the table itself.
#[derive(Debug, Default)]
pub struct CompileOutcome {
    pub syntax_errors: Vec<SyntaxError>,
    pub semantic_errors: Vec<SemanticError>,
    pub comments: Vec<Range>,
    pub token_count: usize,
}

/// Parse `source` and drive `listener` over the tree. This is the raw
/// parser interface; most callers want [`compile_pass`].
pub fn compile(
    source: &str,
    file_uri: &str,
    listener: &mut dyn ParseTreeListener,
    options: &CompileOptions,
) -> CompileResult<ParseOutcome> {
    let started = std::time::Instant::now();
    let outcome = parser::parse_source(source);
    if options.max_tokens > 0 && outcome.token_count > options.max_tokens {
        return Err(CompileError::TokenLimit {
            limit: options.max_tokens,
        });
    }
    if options.timeout_ms > 0 && started.elapsed().as_millis() as u64 > options.timeout_ms {
        return Err(CompileError::Timeout {
            millis: options.timeout_ms,
        });
    }
    tracing::debug!(
        uri = file_uri,
        tokens = outcome.token_count,
        errors = outcome.errors.len(),
        "compiled source"
    );
    parser::walk_unit(listener, &outcome.unit);
    Ok(outcome)
}

/// Run one listener pass at `level` against `table`, returning the syntax
/// and semantic errors gathered along the way.
pub fn compile_pass(
    source: &str,
    table: &mut SymbolTable,
    level: DetailLevel,
    options: &CompileOptions,
) -> CompileResult<CompileOutcome> {
    let uri = table.file_uri().to_string();
    let mut semantic_errors = Vec::new();
    let outcome = {
        let mut collector = SymbolCollector::new(
            table,
            &mut semantic_errors,
            level,
            options.collect_references,
        );
        compile(source, &uri, &mut collector, options)?
    };

    if options.collect_references
        && options.resolve_references
        && options.enable_reference_correction
    {
        correct_class_references(table);
    }

    Ok(CompileOutcome {
        syntax_errors: outcome.errors,
        semantic_errors,
        comments: if options.include_comments {
            outcome.comments
        } else {
            Vec::new()
        },
        token_count: outcome.token_count,
    })
}

/// Run every layer from public-api up to `target` in ascending order.
/// Levels already applied to the table enrich monotonically, so repeating
/// a lower pass is a no-op.
pub fn compile_layers(
    source: &str,
    table: &mut SymbolTable,
    target: DetailLevel,
    options: &CompileOptions,
) -> CompileResult<CompileOutcome> {
    let mut merged = CompileOutcome::default();
    for level in [
        DetailLevel::PublicApi,
        DetailLevel::Protected,
        DetailLevel::Private,
        DetailLevel::Full,
    ] {
        if level > target {
            break;
        }
        let outcome = compile_pass(source, table, level, options)?;
        // Syntax errors are identical between passes; keep one copy.
        merged.syntax_errors = outcome.syntax_errors;
        merged.semantic_errors.extend(outcome.semantic_errors);
        merged.comments = outcome.comments;
        merged.token_count = outcome.token_count;
    }
    dedup_semantic(&mut merged.semantic_errors);
    Ok(merged)
}

fn dedup_semantic(errors: &mut Vec<SemanticError>) {
    let mut seen = std::collections::HashSet::new();
    errors.retain(|e| seen.insert((e.code, e.range.start, e.range.end, e.message.clone())));
}
