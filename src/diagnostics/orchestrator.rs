//! Pull-diagnostic pipeline: compile → cache → register → enrich →
//! resolve → validate → merge.
//!
//! No failure in here crosses the request boundary. Every fallible step
//! degrades to whatever diagnostics were gathered so far; cancellation
//! abandons cleanly at the next yield point.

use crate::config::Settings;
use crate::diagnostics::{Diagnostic, Severity, dedupe};
use crate::error::IndexError;
use crate::exec::CancellationToken;
use crate::graph::SymbolGraph;
use crate::listener::{CompileOptions, CompileOutcome, compile_layers};
use crate::store::{CachedCompilation, DocumentStateCache, DocumentStore};
use crate::table::SymbolTable;
use crate::types::DetailLevel;
use crate::validation::{ValidationContext, ValidatorRegistry, ValidatorTier};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Supplies Apex source for a type name the index does not know yet
/// (a standard-library stub, a lazily fetched artifact). Returning `None`
/// means the type is genuinely unknown.
pub type LoadArtifactFn = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub struct DiagnosticOrchestrator {
    settings: Settings,
    store: Arc<dyn DocumentStore>,
    cache: DocumentStateCache,
    graph: SymbolGraph,
    registry: ValidatorRegistry,
    load_artifact: Option<LoadArtifactFn>,
    /// Versions already compiled and registered, per URI.
    compiled_versions: std::collections::HashMap<String, i32>,
}

impl DiagnosticOrchestrator {
    pub fn new(settings: Settings, store: Arc<dyn DocumentStore>) -> Self {
        let mut registry = ValidatorRegistry::new();
        registry.init_defaults();
        let reference_correction = settings.compiler.enable_reference_correction;
        Self {
            settings,
            store,
            cache: DocumentStateCache::new(),
            graph: SymbolGraph::new().with_reference_correction(reference_correction),
            registry,
            load_artifact: None,
            compiled_versions: std::collections::HashMap::new(),
        }
    }

    pub fn with_artifact_loader(mut self, loader: LoadArtifactFn) -> Self {
        self.load_artifact = Some(loader);
        self
    }

    pub fn graph(&self) -> &SymbolGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut SymbolGraph {
        &mut self.graph
    }

    pub fn registry_mut(&mut self) -> &mut ValidatorRegistry {
        &mut self.registry
    }

    /// Standard-library documents never get diagnostics.
    pub fn should_suppress_diagnostics(uri: &str) -> bool {
        uri.starts_with("apexlib://")
    }

    /// Push diagnostics: IMMEDIATE tier only, same-file, no artifact
    /// loading.
    pub async fn push_diagnostics(&mut self, uri: &str) -> Vec<Diagnostic> {
        if Self::should_suppress_diagnostics(uri) {
            return Vec::new();
        }
        let Some(mut diagnostics) = self.compile_and_register(uri).await else {
            return Vec::new();
        };
        if let Some(table) = self.graph.table(uri) {
            let ctx = ValidationContext {
                graph: Some(&self.graph),
                settings: &self.settings,
            };
            let result = self
                .registry
                .run_validators_for_tier(ValidatorTier::Immediate, table, &ctx);
            diagnostics.extend(result.into_diagnostics());
        }
        dedupe(&mut diagnostics);
        diagnostics
    }

    /// Pull diagnostics: the full pipeline of compile, enrichment,
    /// cross-file resolution, and both validator tiers.
    pub async fn pull_diagnostics(&mut self, uri: &str, token: &CancellationToken) -> Vec<Diagnostic> {
        if Self::should_suppress_diagnostics(uri) {
            return Vec::new();
        }

        let Some(mut diagnostics) = self.compile_and_register(uri).await else {
            return Vec::new();
        };

        // Prerequisite orchestration: enrichment first, then cross-file
        // resolution (artifact loading happens inside when permitted).
        if let Err(err) = self.orchestrate_prerequisites(uri, token, &mut diagnostics).await {
            match err {
                IndexError::Cancelled => return Vec::new(),
                other => {
                    tracing::warn!(uri, error = %other, "prerequisite orchestration degraded");
                }
            }
        }

        // Re-fetch after enrichment; the pre-enrichment table is stale.
        let Some(table) = self.graph.table(uri) else {
            dedupe(&mut diagnostics);
            return diagnostics;
        };

        let ctx = ValidationContext {
            graph: Some(&self.graph),
            settings: &self.settings,
        };
        let immediate = self
            .registry
            .run_validators_for_tier(ValidatorTier::Immediate, table, &ctx);
        diagnostics.extend(immediate.into_diagnostics());

        tokio::task::yield_now().await;
        if token.is_cancelled() {
            return Vec::new();
        }

        let thorough = self.run_thorough_with_deadline(uri);
        diagnostics.extend(thorough);

        dedupe(&mut diagnostics);
        diagnostics
    }

    /// Compile the stored document if this version was not compiled yet
    /// and register the result with the graph. Returns the syntax and
    /// semantic diagnostics (cached or fresh), or `None` when the
    /// document is not in storage.
    async fn compile_and_register(&mut self, uri: &str) -> Option<Vec<Diagnostic>> {
        let document = match self.store.get_document(uri) {
            Some(doc) => doc,
            None => {
                tracing::debug!(uri, "document not in storage; aborting request");
                return None;
            }
        };

        if let Some(cached) = self.cache.get(uri, document.version) {
            return Some(cached.diagnostics);
        }

        // A table we never compiled means a concurrent didOpen is mid
        // flight; poll the cache briefly before doing the work again.
        if !self.compiled_versions.contains_key(uri) && self.graph.table(uri).is_some() {
            let interval = Duration::from_millis(self.settings.artifacts.indexing_barrier_poll_ms);
            for _ in 0..self.settings.artifacts.indexing_barrier_attempts {
                tokio::time::sleep(interval).await;
                if let Some(cached) = self.cache.get(uri, document.version) {
                    return Some(cached.diagnostics);
                }
            }
        }

        // An edited document re-registers from scratch; stale symbols and
        // edges fall out, deferred references re-link against the new ids.
        match self.compiled_versions.get(uri) {
            Some(&old_version) if old_version != document.version => {
                self.graph.remove_file(uri);
            }
            _ => {}
        }

        // Fresh compile with the public-api listener; diagnostics need no
        // private symbols until a validator asks for them.
        let mut table = SymbolTable::new(uri);
        let options = CompileOptions::from(&self.settings);
        let outcome = match compile_layers(
            document.get_text(),
            &mut table,
            DetailLevel::PublicApi,
            &options,
        ) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(uri, error = %err, "compilation failed");
                return Some(Vec::new());
            }
        };

        let diagnostics = outcome_diagnostics(&outcome);
        self.cache.put(
            uri,
            CachedCompilation {
                version: document.version,
                diagnostics: diagnostics.clone(),
                token_count: outcome.token_count,
            },
        );
        self.graph.add_symbol_table(table);
        self.compiled_versions.insert(uri.to_string(), document.version);
        Some(diagnostics)
    }

    /// Enrich the file to the level validators need and run cross-file
    /// resolution, loading missing artifacts when configured to.
    async fn orchestrate_prerequisites(
        &mut self,
        uri: &str,
        token: &CancellationToken,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<(), IndexError> {
        token.check()?;

        // Pull requests run the THOROUGH tier, whose semantic checks want
        // the full hierarchy; lower bounds come from the registry.
        let needed = self.registry.max_required_detail().max(DetailLevel::Full);
        self.ensure_detail_level(uri, needed, diagnostics)?;
        tokio::task::yield_now().await;

        if self.registry.requires_cross_file_resolution() {
            if self.settings.artifacts.enabled && self.load_artifact.is_some() {
                let deadline = Duration::from_millis(self.settings.artifacts.timeout_ms);
                match tokio::time::timeout(deadline, self.load_missing_artifacts(uri, token)).await
                {
                    Ok(result) => result?,
                    Err(_elapsed) => {
                        tracing::warn!(uri, "artifact loading timed out; continuing without");
                    }
                }
            }
            self.graph.enhance_cross_file(uri, token).await?;
        }
        Ok(())
    }

    /// Run the remaining listener layers against the registered table so
    /// its symbols reach `level`. Newly surfaced semantic errors join the
    /// diagnostic stream.
    fn ensure_detail_level(
        &mut self,
        uri: &str,
        level: DetailLevel,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<(), IndexError> {
        let current = self
            .graph
            .table(uri)
            .map(|t| t.detail_level())
            .ok_or_else(|| IndexError::FileNotIndexed {
                uri: uri.to_string(),
            })?;
        if current >= level {
            return Ok(());
        }
        let document = self
            .store
            .get_document(uri)
            .ok_or_else(|| IndexError::DocumentNotFound {
                uri: uri.to_string(),
            })?;

        let options = CompileOptions::from(&self.settings);
        let Some(table) = self.graph.table_mut(uri) else {
            return Ok(());
        };
        match compile_layers(document.get_text(), table, level, &options) {
            Ok(outcome) => {
                for error in &outcome.semantic_errors {
                    diagnostics.push(Diagnostic::new(
                        error.range,
                        error.message.clone(),
                        Severity::Error,
                        error.code,
                    ));
                }
            }
            Err(err) => {
                tracing::warn!(uri, error = %err, "enrichment failed; staying at lower detail");
            }
        }

        // Enrichment created new symbols (locals, private members); the
        // graph indexes must see them.
        let Some(table) = self.graph.table_mut(uri) else {
            return Ok(());
        };
        let enriched = std::mem::replace(table, SymbolTable::new(uri));
        self.graph.add_symbol_table(enriched);
        Ok(())
    }

    /// Load sources for unresolved type names through the artifact
    /// callback, recursively up to the configured depth and count.
    async fn load_missing_artifacts(
        &mut self,
        uri: &str,
        token: &CancellationToken,
    ) -> Result<(), IndexError> {
        let Some(loader) = self.load_artifact.clone() else {
            return Ok(());
        };
        let mut loaded = 0u32;
        let mut frontier = vec![uri.to_string()];
        let mut attempted: HashSet<String> = HashSet::new();
        let mut budget = crate::exec::WorkBudget::every(1);

        for _depth in 0..self.settings.artifacts.max_depth {
            let mut next_frontier = Vec::new();
            for file in frontier.drain(..) {
                token.check()?;
                for name in self.unresolved_type_names(&file) {
                    if !attempted.insert(name.clone()) {
                        continue;
                    }
                    if loaded >= self.settings.artifacts.max_artifacts {
                        tracing::debug!(uri, "artifact budget exhausted");
                        return Ok(());
                    }
                    let Some(source) = loader(&name) else { continue };
                    let artifact_uri = format!("apexlib://{name}.cls");
                    let mut table = SymbolTable::new(&artifact_uri);
                    let options = CompileOptions::from(&self.settings);
                    if let Err(err) =
                        compile_layers(&source, &mut table, DetailLevel::PublicApi, &options)
                    {
                        tracing::warn!(artifact = name, error = %err, "artifact failed to compile");
                        continue;
                    }
                    self.graph.add_symbol_table(table);
                    loaded += 1;
                    next_frontier.push(artifact_uri);
                    budget.tick(token).await?;
                }
            }
            if next_frontier.is_empty() {
                break;
            }
            frontier = next_frontier;
        }
        Ok(())
    }

    /// Type names in a file's references with no resolution and no
    /// builtin meaning.
    fn unresolved_type_names(&self, uri: &str) -> Vec<String> {
        let Some(table) = self.graph.table(uri) else {
            return Vec::new();
        };
        let mut names: Vec<String> = table
            .references()
            .iter()
            .filter(|r| r.context.is_type_usage())
            .filter(|r| r.resolved_symbol_id.is_none())
            .filter(|r| crate::reference::is_resolvable_name(&r.name))
            .filter(|r| !crate::reference::is_builtin_type(&r.name))
            .filter(|r| self.graph.lookup_symbol_by_name(&r.name).is_empty())
            .map(|r| r.name.to_string())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// THOROUGH tier under the configured wall-clock budget: validators
    /// already run stay in the result, the rest are skipped on expiry.
    fn run_thorough_with_deadline(&self, uri: &str) -> Vec<Diagnostic> {
        let Some(table) = self.graph.table(uri) else {
            return Vec::new();
        };
        let ctx = ValidationContext {
            graph: Some(&self.graph),
            settings: &self.settings,
        };
        let deadline = Duration::from_millis(self.settings.validation.thorough_timeout_ms);
        let started = Instant::now();

        let mut out = Vec::new();
        for validator in self
            .registry
            .validators_for_tier(ValidatorTier::Thorough, table)
        {
            if started.elapsed() > deadline {
                tracing::warn!(
                    uri,
                    skipped = validator.id(),
                    "thorough validation deadline hit; returning partial results"
                );
                break;
            }
            match validator.validate(table, &ctx) {
                Ok(result) => out.extend(result.into_diagnostics()),
                Err(err) => {
                    tracing::warn!(validator = validator.id(), error = %err, "validator failed");
                }
            }
        }
        out
    }
}

fn outcome_diagnostics(outcome: &CompileOutcome) -> Vec<Diagnostic> {
    let mut diagnostics: Vec<Diagnostic> = outcome
        .syntax_errors
        .iter()
        .map(|e| Diagnostic::new(e.range, e.message.clone(), Severity::Error, "SYNTAX_ERROR"))
        .collect();
    diagnostics.extend(outcome.semantic_errors.iter().map(|e| {
        Diagnostic::new(e.range, e.message.clone(), Severity::Error, e.code)
    }));
    diagnostics
}
