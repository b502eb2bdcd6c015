//! Built-in validators.
//!
//! Each one is a pure function of the symbol table plus the injected
//! context; none of them mutate anything or load artifacts themselves
//! (the orchestrator handles loading before the THOROUGH tier runs).

use super::{
    Finding, Prerequisites, ValidationContext, ValidationResult, Validator, ValidatorTier,
};
use crate::error::ValidationError;
use crate::reference::is_builtin_type;
use crate::symbol::SymbolPayload;
use crate::table::SymbolTable;
use crate::types::{DetailLevel, ModifierFlags, SymbolKind, case_fold};
use std::collections::HashMap;

pub fn defaults() -> Vec<Box<dyn Validator>> {
    vec![
        Box::new(DuplicateMethodValidator),
        Box::new(VersionSpecificValidator),
        Box::new(UnresolvedTypeValidator),
        Box::new(InvalidSuperclassValidator),
        Box::new(CircularDependencyValidator),
        Box::new(HighImpactSymbolValidator),
    ]
}

/// Two methods on the same type with the same name and parameter types.
/// Parameter *types* define the signature; names do not.
pub struct DuplicateMethodValidator;

impl Validator for DuplicateMethodValidator {
    fn id(&self) -> &'static str {
        "duplicate-method"
    }
    fn name(&self) -> &'static str {
        "Duplicate method detection"
    }
    fn tier(&self) -> ValidatorTier {
        ValidatorTier::Immediate
    }
    fn priority(&self) -> u32 {
        10
    }
    fn prerequisites(&self) -> Prerequisites {
        Prerequisites {
            required_detail_level: DetailLevel::Private,
            ..Default::default()
        }
    }

    fn validate(
        &self,
        table: &SymbolTable,
        _ctx: &ValidationContext,
    ) -> Result<ValidationResult, ValidationError> {
        let mut result = ValidationResult::default();
        let mut seen: HashMap<(Option<String>, String, String), usize> = HashMap::new();

        for symbol in table.symbols() {
            if !matches!(symbol.kind, SymbolKind::Method | SymbolKind::Constructor) {
                continue;
            }
            let SymbolPayload::Method { parameters, .. } = &symbol.payload else {
                continue;
            };
            let signature = parameters
                .iter()
                .map(|p| case_fold(&p.type_name))
                .collect::<Vec<_>>()
                .join(",");
            let key = (
                symbol.parent_id.clone(),
                case_fold(&symbol.name),
                signature,
            );
            let count = seen.entry(key).or_insert(0);
            *count += 1;
            if *count > 1 {
                result.errors.push(Finding::error(
                    "DUPLICATE_METHOD",
                    format!("duplicate method '{}' with the same signature", symbol.name),
                    Some(symbol.location.identifier_range),
                ));
            }
        }
        Ok(result)
    }
}

/// Interfaces that need a newer API version than the file targets.
pub struct VersionSpecificValidator;

/// Minimum API major version per system interface.
const INTERFACE_MIN_VERSION: &[(&str, u32)] = &[
    ("queueable", 28),
    ("comparable", 28),
    ("callable", 46),
    ("finalizer", 74),
];

impl Validator for VersionSpecificValidator {
    fn id(&self) -> &'static str {
        "version-specific"
    }
    fn name(&self) -> &'static str {
        "API version gate"
    }
    fn tier(&self) -> ValidatorTier {
        ValidatorTier::Immediate
    }
    fn priority(&self) -> u32 {
        20
    }
    fn prerequisites(&self) -> Prerequisites {
        Prerequisites::default()
    }

    fn validate(
        &self,
        table: &SymbolTable,
        ctx: &ValidationContext,
    ) -> Result<ValidationResult, ValidationError> {
        let mut result = ValidationResult::default();
        if !ctx.settings.validation.version_specific {
            return Ok(result);
        }
        let api = ctx.settings.api_major_version();

        for symbol in table.symbols() {
            let SymbolPayload::Type { interfaces, .. } = &symbol.payload else {
                continue;
            };
            for interface in interfaces {
                let folded = case_fold(interface);
                let bare = folded.strip_prefix("system.").unwrap_or(&folded);
                if let Some((_, min)) = INTERFACE_MIN_VERSION.iter().find(|(name, _)| *name == bare)
                {
                    if api < *min {
                        result.errors.push(Finding::error(
                            "UNSUPPORTED_API_VERSION",
                            format!(
                                "'{interface}' requires API version {min}.0 or later (file targets {api}.0)"
                            ),
                            Some(symbol.location.identifier_range),
                        ));
                    }
                }
            }
        }
        Ok(result)
    }
}

/// Type references that resolved nowhere after cross-file resolution.
pub struct UnresolvedTypeValidator;

impl Validator for UnresolvedTypeValidator {
    fn id(&self) -> &'static str {
        "unresolved-type"
    }
    fn name(&self) -> &'static str {
        "Unresolved type detection"
    }
    fn tier(&self) -> ValidatorTier {
        ValidatorTier::Thorough
    }
    fn priority(&self) -> u32 {
        10
    }
    fn prerequisites(&self) -> Prerequisites {
        Prerequisites {
            requires_references: true,
            requires_cross_file_resolution: true,
            ..Default::default()
        }
    }

    fn validate(
        &self,
        table: &SymbolTable,
        _ctx: &ValidationContext,
    ) -> Result<ValidationResult, ValidationError> {
        let mut result = ValidationResult::default();
        for reference in table.references() {
            if !reference.context.is_type_usage() {
                continue;
            }
            if reference.resolved_symbol_id.is_some() {
                continue;
            }
            if !crate::reference::is_resolvable_name(&reference.name)
                || is_builtin_type(&reference.name)
            {
                continue;
            }
            result.errors.push(Finding::error(
                "INVALID_UNRESOLVED_TYPE",
                format!("type '{}' cannot be resolved", reference.name),
                Some(reference.location),
            ));
        }
        Ok(result)
    }
}

/// `extends` targets that are not extendable classes.
pub struct InvalidSuperclassValidator;

impl Validator for InvalidSuperclassValidator {
    fn id(&self) -> &'static str {
        "invalid-superclass"
    }
    fn name(&self) -> &'static str {
        "Superclass validity"
    }
    fn tier(&self) -> ValidatorTier {
        ValidatorTier::Thorough
    }
    fn priority(&self) -> u32 {
        20
    }
    fn prerequisites(&self) -> Prerequisites {
        Prerequisites {
            requires_cross_file_resolution: true,
            ..Default::default()
        }
    }

    fn validate(
        &self,
        table: &SymbolTable,
        ctx: &ValidationContext,
    ) -> Result<ValidationResult, ValidationError> {
        let mut result = ValidationResult::default();
        let Some(graph) = ctx.graph else {
            return Ok(result);
        };

        for symbol in table.symbols() {
            let SymbolPayload::Type {
                super_class: Some(super_name),
                ..
            } = &symbol.payload
            else {
                continue;
            };
            if is_builtin_type(super_name) {
                result.errors.push(Finding::error(
                    "INVALID_CLASS",
                    format!("'{super_name}' is a builtin type and cannot be extended"),
                    Some(symbol.location.identifier_range),
                ));
                continue;
            }
            let candidates = graph.lookup_symbol_by_name(super_name);
            let Some(target) = candidates.first() else {
                // Unknown superclass is the unresolved-type validator's
                // problem, not this one's.
                continue;
            };
            if target.kind != SymbolKind::Class {
                result.errors.push(Finding::error(
                    "INVALID_CLASS",
                    format!(
                        "'{super_name}' is {} and cannot be extended",
                        match target.kind {
                            SymbolKind::Interface => "an interface",
                            SymbolKind::Enum => "an enum",
                            SymbolKind::Trigger => "a trigger",
                            _ => "not a class",
                        }
                    ),
                    Some(symbol.location.identifier_range),
                ));
            } else if target.modifiers.flags.contains(ModifierFlags::FINAL) {
                result.errors.push(Finding::error(
                    "INVALID_CLASS",
                    format!("'{super_name}' is final and cannot be extended"),
                    Some(symbol.location.identifier_range),
                ));
            }
        }
        Ok(result)
    }
}

/// Reference cycles through this file's symbols.
pub struct CircularDependencyValidator;

impl Validator for CircularDependencyValidator {
    fn id(&self) -> &'static str {
        "circular-dependency"
    }
    fn name(&self) -> &'static str {
        "Circular dependency detection"
    }
    fn tier(&self) -> ValidatorTier {
        ValidatorTier::Thorough
    }
    fn priority(&self) -> u32 {
        30
    }
    fn prerequisites(&self) -> Prerequisites {
        Prerequisites {
            requires_cross_file_resolution: true,
            ..Default::default()
        }
    }

    fn validate(
        &self,
        table: &SymbolTable,
        ctx: &ValidationContext,
    ) -> Result<ValidationResult, ValidationError> {
        let mut result = ValidationResult::default();
        let Some(graph) = ctx.graph else {
            return Ok(result);
        };

        for cycle in graph.detect_circular_dependencies() {
            for id in &cycle {
                let Some(symbol) = table.get_symbol_by_id(id) else {
                    continue;
                };
                let others: Vec<&str> = cycle
                    .iter()
                    .filter(|other| *other != id)
                    .filter_map(|other| graph.get_symbol_by_id(other))
                    .map(|s| s.name.as_ref())
                    .collect();
                result.warnings.push(Finding::warning(
                    "CIRCULAR_DEPENDENCY",
                    format!(
                        "'{}' is part of a dependency cycle with {}",
                        symbol.name,
                        others.join(", ")
                    ),
                    Some(symbol.location.identifier_range),
                ));
            }
        }
        Ok(result)
    }
}

/// Symbols a large share of the index depends on; changing them is risky.
pub struct HighImpactSymbolValidator;

impl Validator for HighImpactSymbolValidator {
    fn id(&self) -> &'static str {
        "high-impact-symbol"
    }
    fn name(&self) -> &'static str {
        "High impact symbol detection"
    }
    fn tier(&self) -> ValidatorTier {
        ValidatorTier::Thorough
    }
    fn priority(&self) -> u32 {
        40
    }
    fn prerequisites(&self) -> Prerequisites {
        Prerequisites {
            requires_cross_file_resolution: true,
            ..Default::default()
        }
    }

    fn validate(
        &self,
        table: &SymbolTable,
        ctx: &ValidationContext,
    ) -> Result<ValidationResult, ValidationError> {
        let mut result = ValidationResult::default();
        let Some(graph) = ctx.graph else {
            return Ok(result);
        };
        let threshold = ctx.settings.validation.high_impact_threshold;

        for symbol in table.root_symbols() {
            let analysis = graph.analyze_dependencies(&symbol.id);
            if analysis.impact_score >= threshold && !analysis.dependents.is_empty() {
                result.warnings.push(Finding::information(
                    "HIGH_IMPACT_SYMBOL",
                    format!(
                        "'{}' is referenced by {} symbols ({:.0}% of the index); changes have wide impact",
                        symbol.name,
                        analysis.dependents.len(),
                        analysis.impact_score * 100.0
                    ),
                    Some(symbol.location.identifier_range),
                ));
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::graph::SymbolGraph;
    use crate::listener::{CompileOptions, compile_layers};

    fn compile_table(uri: &str, source: &str) -> SymbolTable {
        let mut table = SymbolTable::new(uri);
        compile_layers(source, &mut table, DetailLevel::Full, &CompileOptions::default())
            .expect("compile");
        table
    }

    fn ctx<'a>(settings: &'a Settings, graph: Option<&'a SymbolGraph>) -> ValidationContext<'a> {
        ValidationContext { graph, settings }
    }

    #[test]
    fn duplicate_methods_flagged_by_signature() {
        let table = compile_table(
            "file://t.cls",
            "public class C { \
             public void run(Integer a) {} \
             public void run(Integer b) {} \
             public void run(String s) {} }",
        );
        let settings = Settings::default();
        let result = DuplicateMethodValidator
            .validate(&table, &ctx(&settings, None))
            .unwrap();
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, "DUPLICATE_METHOD");
    }

    #[test]
    fn overloads_are_not_duplicates() {
        let table = compile_table(
            "file://t.cls",
            "public class C { public void run(Integer a) {} public void run(String a) {} }",
        );
        let settings = Settings::default();
        let result = DuplicateMethodValidator
            .validate(&table, &ctx(&settings, None))
            .unwrap();
        assert!(result.errors.is_empty());
    }

    #[test]
    fn version_gate_respects_configured_api() {
        let table = compile_table(
            "file://t.cls",
            "public class C implements Callable { }",
        );
        let mut settings = Settings::default();
        settings.runtime.version = "45.0".into();
        let result = VersionSpecificValidator
            .validate(&table, &ctx(&settings, None))
            .unwrap();
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, "UNSUPPORTED_API_VERSION");

        settings.runtime.version = "46.0".into();
        let result = VersionSpecificValidator
            .validate(&table, &ctx(&settings, None))
            .unwrap();
        assert!(result.errors.is_empty());

        settings.runtime.version = "45.0".into();
        settings.validation.version_specific = false;
        let result = VersionSpecificValidator
            .validate(&table, &ctx(&settings, None))
            .unwrap();
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn unresolved_type_only_after_resolution_ran() {
        let mut graph = SymbolGraph::new();
        graph.add_symbol_table(compile_table(
            "file://A.cls",
            "public class A { public Missing m; public String ok; }",
        ));
        let settings = Settings::default();

        // Prerequisite not met yet.
        let table = graph.table("file://A.cls").unwrap();
        assert!(!UnresolvedTypeValidator.prerequisites().satisfied_by(table));

        let token = crate::exec::CancellationToken::new();
        graph
            .enhance_cross_file("file://A.cls", &token)
            .await
            .unwrap();

        let table = graph.table("file://A.cls").unwrap();
        assert!(UnresolvedTypeValidator.prerequisites().satisfied_by(table));
        let result = UnresolvedTypeValidator
            .validate(table, &ctx(&settings, Some(&graph)))
            .unwrap();
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("Missing"));
    }

    #[test]
    fn extending_an_interface_is_invalid() {
        let mut graph = SymbolGraph::new();
        graph.add_symbol_table(compile_table("file://I.cls", "public interface I {}"));
        graph.add_symbol_table(compile_table(
            "file://C.cls",
            "public class C extends I {}",
        ));
        let settings = Settings::default();
        let table = graph.table("file://C.cls").unwrap();
        let result = InvalidSuperclassValidator
            .validate(table, &ctx(&settings, Some(&graph)))
            .unwrap();
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, "INVALID_CLASS");
    }

    #[test]
    fn cycle_warning_lands_on_this_files_symbol() {
        let mut graph = SymbolGraph::new();
        graph.add_symbol_table(compile_table("file://A.cls", "public class A { public B b; }"));
        graph.add_symbol_table(compile_table("file://B.cls", "public class B { public A a; }"));
        let settings = Settings::default();

        let table = graph.table("file://A.cls").unwrap();
        let result = CircularDependencyValidator
            .validate(table, &ctx(&settings, Some(&graph)))
            .unwrap();
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].code, "CIRCULAR_DEPENDENCY");
        assert_eq!(result.warnings[0].severity, crate::diagnostics::Severity::Warning);
        assert!(result.warnings[0].message.contains('B'));
    }

    #[test]
    fn high_impact_symbol_reports_information() {
        let mut graph = SymbolGraph::new();
        graph.add_symbol_table(compile_table("file://A.cls", "public class A { public C c; }"));
        graph.add_symbol_table(compile_table("file://B.cls", "public class B { public C c; }"));
        graph.add_symbol_table(compile_table("file://C.cls", "public class C {}"));

        let mut settings = Settings::default();
        settings.validation.high_impact_threshold = 0.1;
        let table = graph.table("file://C.cls").unwrap();
        let result = HighImpactSymbolValidator
            .validate(table, &ctx(&settings, Some(&graph)))
            .unwrap();
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(
            result.warnings[0].severity,
            crate::diagnostics::Severity::Information
        );
    }
}
