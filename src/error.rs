//! Error types for the symbol indexing core.
//!
//! Structured errors via thiserror, one enum per subsystem plus `Result`
//! aliases. Orchestration code logs and swallows most of these; only
//! invariant corruption is allowed to surface to a caller.

use thiserror::Error;

/// Errors raised while building or mutating symbol stores.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Document '{uri}' is not in storage. Open or set it before requesting diagnostics.")]
    DocumentNotFound { uri: String },

    #[error("Symbol '{id}' is not in the graph. The owning file may have been removed.")]
    SymbolNotFound { id: String },

    #[error("File '{uri}' has no registered symbol table")]
    FileNotIndexed { uri: String },

    #[error("Symbol store corrupted: {reason}")]
    Corrupted { reason: String },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("{0}")]
    General(String),
}

/// Errors raised by the Apex front end. Syntax problems in user source are
/// *not* errors here; they flow out as diagnostics. This enum covers the
/// cases where compilation itself could not run.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Source exceeds the configured token limit ({limit} tokens)")]
    TokenLimit { limit: usize },

    #[error("Compilation timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Compilation cancelled")]
    Cancelled,
}

/// Errors raised by validator execution. Individual validator failures are
/// logged and elided by the registry, so these rarely escape it.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Validator '{id}' failed: {reason}")]
    ValidatorFailed { id: String, reason: String },

    #[error("Artifact loading failed for '{name}': {reason}")]
    ArtifactLoad { name: String, reason: String },
}

pub type IndexResult<T> = Result<T, IndexError>;
pub type CompileResult<T> = Result<T, CompileError>;
pub type ValidatorRunResult<T> = Result<T, ValidationError>;
