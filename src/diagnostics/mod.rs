//! Diagnostic model and the LSP boundary conversion.
//!
//! Internally positions keep the parser convention (1-based lines,
//! 0-based columns); [`Diagnostic::to_lsp`] converts to the LSP's 0-based
//! lines at the edge and nowhere else.

pub mod orchestrator;

pub use orchestrator::{DiagnosticOrchestrator, LoadArtifactFn};

use crate::types::Range;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Severity {
    Error,
    Warning,
    Information,
    Hint,
}

impl Severity {
    fn to_lsp(self) -> lsp_types::DiagnosticSeverity {
        match self {
            Self::Error => lsp_types::DiagnosticSeverity::ERROR,
            Self::Warning => lsp_types::DiagnosticSeverity::WARNING,
            Self::Information => lsp_types::DiagnosticSeverity::INFORMATION,
            Self::Hint => lsp_types::DiagnosticSeverity::HINT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub range: Range,
    pub message: String,
    pub severity: Severity,
    pub code: String,
    pub source: String,
}

impl Diagnostic {
    pub fn new(range: Range, message: impl Into<String>, severity: Severity, code: &str) -> Self {
        Self {
            range,
            message: message.into(),
            severity,
            code: code.to_string(),
            source: "apex".to_string(),
        }
    }

    /// Convert to the wire type, switching to 0-based lines.
    pub fn to_lsp(&self) -> lsp_types::Diagnostic {
        lsp_types::Diagnostic {
            range: lsp_types::Range {
                start: lsp_types::Position {
                    line: self.range.start.line.saturating_sub(1),
                    character: self.range.start.column,
                },
                end: lsp_types::Position {
                    line: self.range.end.line.saturating_sub(1),
                    character: self.range.end.column,
                },
            },
            severity: Some(self.severity.to_lsp()),
            code: Some(lsp_types::NumberOrString::String(self.code.clone())),
            source: Some(self.source.clone()),
            message: self.message.clone(),
            ..Default::default()
        }
    }
}

/// Drop diagnostics that agree on (code, range, message), keeping the
/// first. Different validators legitimately re-derive the same finding.
pub fn dedupe(diagnostics: &mut Vec<Diagnostic>) {
    let mut seen = std::collections::HashSet::new();
    diagnostics.retain(|d| seen.insert((d.code.clone(), d.range, d.message.clone())));
}
