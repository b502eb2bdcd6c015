//! Core value types shared across the indexing system.
//!
//! Positions follow the Apex parser convention: lines are 1-based, columns
//! are 0-based. Conversion to the LSP's 0-based lines happens at the
//! protocol boundary, never here.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// A point in a source file. Line 1-based, column 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// A span between two positions, end-inclusive for containment checks,
/// matching the token spans the parser reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn at(start_line: u32, start_column: u32, end_line: u32, end_column: u32) -> Self {
        Self {
            start: Position::new(start_line, start_column),
            end: Position::new(end_line, end_column),
        }
    }

    /// Zero-width range, used as a placeholder when materializing compact
    /// edges back into full references.
    pub fn empty() -> Self {
        Self::at(1, 0, 1, 0)
    }

    pub fn contains(&self, pos: Position) -> bool {
        if pos.line < self.start.line || pos.line > self.end.line {
            return false;
        }
        if pos.line == self.start.line && pos.column < self.start.column {
            return false;
        }
        if pos.line == self.end.line && pos.column > self.end.column {
            return false;
        }
        true
    }

    /// True when `other` lies entirely within `self`.
    pub fn encloses(&self, other: &Range) -> bool {
        self.contains(other.start) && self.contains(other.end)
    }

    /// Rough span size used to pick the smallest enclosing scope.
    pub fn weight(&self) -> u64 {
        let lines = (self.end.line - self.start.line) as u64;
        lines * 10_000 + (self.end.column as u64).saturating_sub(self.start.column as u64)
    }
}

/// How deeply a symbol has been enriched by the layered listeners.
///
/// Ordering matters: enrichment is monotonic, a pass may only upgrade a
/// symbol to a strictly higher level.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "kebab-case")]
pub enum DetailLevel {
    #[default]
    PublicApi,
    Protected,
    Private,
    Full,
}

impl DetailLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PublicApi => "public-api",
            Self::Protected => "protected",
            Self::Private => "private",
            Self::Full => "full",
        }
    }

    /// Whether a declaration with `visibility` is emitted at this level.
    /// Local variables and block bodies are only walked at `Full`.
    pub fn admits(&self, visibility: Visibility) -> bool {
        match self {
            Self::PublicApi => matches!(visibility, Visibility::Global | Visibility::Public),
            Self::Protected => matches!(
                visibility,
                Visibility::Global | Visibility::Public | Visibility::Protected
            ),
            Self::Private | Self::Full => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SymbolKind {
    Class,
    Interface,
    Trigger,
    Enum,
    Method,
    Constructor,
    Property,
    Field,
    Variable,
    Parameter,
    EnumValue,
    Block,
}

impl SymbolKind {
    /// Path segment prefix used in unified symbol ids.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Trigger => "trigger",
            Self::Enum => "enum",
            Self::Method => "method",
            Self::Constructor => "constructor",
            Self::Property => "property",
            Self::Field => "field",
            Self::Variable => "variable",
            Self::Parameter => "parameter",
            Self::EnumValue => "enumValue",
            Self::Block => "block",
        }
    }

    /// Type-introducing kinds: these own a namespace segment in FQNs.
    pub fn is_type(&self) -> bool {
        matches!(
            self,
            Self::Class | Self::Interface | Self::Trigger | Self::Enum
        )
    }
}

/// The control construct a block symbol stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScopeType {
    File,
    Class,
    Method,
    Block,
    If,
    While,
    For,
    DoWhile,
    Try,
    Catch,
    Finally,
    Switch,
    When,
    RunAs,
    Getter,
    Setter,
}

impl ScopeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Class => "class",
            Self::Method => "method",
            Self::Block => "block",
            Self::If => "if",
            Self::While => "while",
            Self::For => "for",
            Self::DoWhile => "doWhile",
            Self::Try => "try",
            Self::Catch => "catch",
            Self::Finally => "finally",
            Self::Switch => "switch",
            Self::When => "when",
            Self::RunAs => "runAs",
            Self::Getter => "getter",
            Self::Setter => "setter",
        }
    }
}

/// Apex visibility. `Default` is what you get with no access modifier,
/// emitted by the private layer and up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Visibility {
    Public,
    Private,
    Protected,
    Global,
    #[default]
    Default,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Protected => "protected",
            Self::Global => "global",
            Self::Default => "default",
        }
    }
}

bitflags! {
    /// Non-visibility modifier keywords on a declaration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
    pub struct ModifierFlags: u16 {
        const STATIC      = 1 << 0;
        const FINAL       = 1 << 1;
        const ABSTRACT    = 1 << 2;
        const VIRTUAL     = 1 << 3;
        const OVERRIDE    = 1 << 4;
        const TRANSIENT   = 1 << 5;
        const TEST_METHOD = 1 << 6;
        const WEB_SERVICE = 1 << 7;
        const BUILT_IN    = 1 << 8;
    }
}

/// Visibility plus boolean modifier flags, as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Modifiers {
    pub visibility: Visibility,
    pub flags: ModifierFlags,
}

impl Modifiers {
    pub fn new(visibility: Visibility) -> Self {
        Self {
            visibility,
            flags: ModifierFlags::empty(),
        }
    }

    pub fn with_flags(visibility: Visibility, flags: ModifierFlags) -> Self {
        Self { visibility, flags }
    }

    pub fn is_static(&self) -> bool {
        self.flags.contains(ModifierFlags::STATIC)
    }
}

/// Apex is case-insensitive; every name comparison goes through this fold.
pub fn case_fold(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Compact owned string for immutable names: boxed instead of carrying
/// `String` capacity around.
pub type CompactString = Box<str>;

pub fn compact_string(s: &str) -> CompactString {
    s.into()
}
