//! Validator registry: tier-ordered semantic checks gated by declared
//! prerequisites.
//!
//! A validator declares what it needs (detail level, references captured,
//! cross-file resolution done); the registry filters by what the table
//! actually has, sorts by priority, and runs what qualifies. A validator
//! failure is logged and elided so one bad check never suppresses the
//! rest of the diagnostics.

pub mod validators;

use crate::config::Settings;
use crate::diagnostics::{Diagnostic, Severity};
use crate::error::ValidationError;
use crate::graph::SymbolGraph;
use crate::table::SymbolTable;
use crate::types::{DetailLevel, Range};
use serde::Serialize;

/// Execution bucket. IMMEDIATE runs on push diagnostics, same-file only;
/// THOROUGH runs on pull diagnostics and may load artifacts on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ValidatorTier {
    Immediate = 1,
    Thorough = 2,
}

/// What must already be true about a symbol table before a validator can
/// run against it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Prerequisites {
    pub required_detail_level: DetailLevel,
    pub requires_references: bool,
    pub requires_cross_file_resolution: bool,
}

impl Prerequisites {
    pub fn satisfied_by(&self, table: &SymbolTable) -> bool {
        table.detail_level() >= self.required_detail_level
            && (!self.requires_references || table.references_collected())
            && (!self.requires_cross_file_resolution || table.cross_file_resolved())
    }
}

/// One problem a validator found. `location` prefers the identifier range
/// of the offending symbol; findings without one anchor at the file top.
#[derive(Debug, Clone)]
pub struct Finding {
    pub code: &'static str,
    pub message: String,
    pub location: Option<Range>,
    pub severity: Severity,
}

impl Finding {
    pub fn error(code: &'static str, message: impl Into<String>, location: Option<Range>) -> Self {
        Self {
            code,
            message: message.into(),
            location,
            severity: Severity::Error,
        }
    }

    pub fn warning(code: &'static str, message: impl Into<String>, location: Option<Range>) -> Self {
        Self {
            code,
            message: message.into(),
            location,
            severity: Severity::Warning,
        }
    }

    pub fn information(
        code: &'static str,
        message: impl Into<String>,
        location: Option<Range>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            location,
            severity: Severity::Information,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::new(
            self.location.unwrap_or(Range::empty()),
            self.message.clone(),
            self.severity,
            self.code,
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
}

impl ValidationResult {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Drop findings that agree on (code, location, message); different
    /// validators may legitimately re-derive the same one.
    pub fn dedupe(&mut self) {
        let key_of = |f: &Finding| (f.code, f.location, f.message.clone());
        let mut seen = std::collections::HashSet::new();
        self.errors.retain(|f| seen.insert(key_of(f)));
        let mut seen = std::collections::HashSet::new();
        self.warnings.retain(|f| seen.insert(key_of(f)));
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.errors
            .iter()
            .chain(self.warnings.iter())
            .map(Finding::to_diagnostic)
            .collect()
    }
}

/// Read-only world a validator sees beyond the table: the symbol graph
/// for cross-file questions, and settings for gates like the API version.
pub struct ValidationContext<'a> {
    pub graph: Option<&'a SymbolGraph>,
    pub settings: &'a Settings,
}

pub trait Validator: Send + Sync {
    fn id(&self) -> &'static str;
    fn name(&self) -> &'static str;
    fn tier(&self) -> ValidatorTier;
    /// Lower runs first within a tier.
    fn priority(&self) -> u32;
    fn prerequisites(&self) -> Prerequisites;
    fn validate(
        &self,
        table: &SymbolTable,
        ctx: &ValidationContext,
    ) -> Result<ValidationResult, ValidationError>;
}

/// Owns the registered validators. Construction is explicit (no globals);
/// `init_defaults` is idempotent so repeated orchestrator startups are
/// harmless, and `shutdown` resets for tests.
pub struct ValidatorRegistry {
    validators: Vec<Box<dyn Validator>>,
    initialized: bool,
}

impl Default for ValidatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self {
            validators: Vec::new(),
            initialized: false,
        }
    }

    /// Register the built-in validators once.
    pub fn init_defaults(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;
        for validator in validators::defaults() {
            self.register(validator);
        }
    }

    pub fn register(&mut self, validator: Box<dyn Validator>) {
        self.validators.push(validator);
    }

    pub fn shutdown(&mut self) {
        self.validators.clear();
        self.initialized = false;
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Validators of `tier` whose prerequisites the table meets, in
    /// priority order.
    pub fn validators_for_tier(
        &self,
        tier: ValidatorTier,
        table: &SymbolTable,
    ) -> Vec<&dyn Validator> {
        let mut selected: Vec<&dyn Validator> = self
            .validators
            .iter()
            .filter(|v| v.tier() == tier && v.prerequisites().satisfied_by(table))
            .map(|v| v.as_ref())
            .collect();
        selected.sort_by_key(|v| v.priority());
        selected
    }

    /// The deepest detail level any registered validator asks for; what
    /// prerequisite orchestration must enrich a table to.
    pub fn max_required_detail(&self) -> DetailLevel {
        self.validators
            .iter()
            .map(|v| v.prerequisites().required_detail_level)
            .max()
            .unwrap_or_default()
    }

    /// Whether any registered validator needs cross-file resolution.
    pub fn requires_cross_file_resolution(&self) -> bool {
        self.validators
            .iter()
            .any(|v| v.prerequisites().requires_cross_file_resolution)
    }

    /// Run every validator of `tier` whose prerequisites the table meets,
    /// in priority order. Failures are logged and skipped; results are
    /// concatenated.
    pub fn run_validators_for_tier(
        &self,
        tier: ValidatorTier,
        table: &SymbolTable,
        ctx: &ValidationContext,
    ) -> ValidationResult {
        let mut merged = ValidationResult::default();
        for validator in self.validators_for_tier(tier, table) {
            match validator.validate(table, ctx) {
                Ok(result) => merged.merge(result),
                Err(err) => {
                    tracing::warn!(
                        validator = validator.id(),
                        error = %err,
                        "validator failed; skipping its findings"
                    );
                }
            }
        }
        merged.dedupe();
        merged
    }
}
