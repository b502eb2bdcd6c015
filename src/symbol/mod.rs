//! Symbol model: named program entities with stable, path-qualified ids.
//!
//! Ids deliberately contain no line numbers, so whitespace-only edits keep
//! every id (and every cross-file edge pointing at it) intact. The id of a
//! top-level class `C` in `file://x.cls` is `file://x.cls:class:C`; nested
//! entities extend the path with one `prefix:name` segment per enclosing
//! scope.

use crate::types::{
    CompactString, DetailLevel, Modifiers, Range, ScopeType, SymbolKind, case_fold, compact_string,
};
use serde::{Deserialize, Serialize};

/// One `prefix:name` segment of a symbol path. The prefix names the
/// immediate scope kind (`class`, `method`, `if`, `block`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSegment {
    pub prefix: CompactString,
    pub name: CompactString,
}

impl PathSegment {
    pub fn new(prefix: &str, name: &str) -> Self {
        Self {
            prefix: compact_string(prefix),
            name: compact_string(name),
        }
    }
}

/// The structured form of a symbol id: file URI plus the scope path down to
/// the symbol itself. `unified_id()` renders the canonical string form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolKey {
    pub file_uri: String,
    pub scope_path: Vec<PathSegment>,
    pub kind: SymbolKind,
    pub name: CompactString,
}

impl SymbolKey {
    pub fn new(
        file_uri: impl Into<String>,
        scope_path: Vec<PathSegment>,
        kind: SymbolKind,
        name: &str,
    ) -> Self {
        Self {
            file_uri: file_uri.into(),
            scope_path,
            kind,
            name: compact_string(name),
        }
    }

    /// Canonical id: `fileUri:prefix1:name1:...:kind:name`.
    pub fn unified_id(&self) -> String {
        let mut id = String::with_capacity(self.file_uri.len() + 16 * (self.scope_path.len() + 1));
        id.push_str(&self.file_uri);
        for seg in &self.scope_path {
            id.push(':');
            id.push_str(&seg.prefix);
            id.push(':');
            id.push_str(&seg.name);
        }
        id.push(':');
        id.push_str(self.kind.as_str());
        id.push(':');
        id.push_str(&self.name);
        id
    }

    /// Path the children of this symbol inherit: this key's path plus the
    /// symbol's own segment.
    pub fn child_path(&self) -> Vec<PathSegment> {
        let mut path = self.scope_path.clone();
        path.push(PathSegment::new(self.kind.as_str(), &self.name));
        path
    }
}

/// One positional parameter of a method or constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub name: CompactString,
    pub type_name: CompactString,
}

impl ParameterInfo {
    pub fn new(name: &str, type_name: &str) -> Self {
        Self {
            name: compact_string(name),
            type_name: compact_string(type_name),
        }
    }
}

/// Kind-specific data a symbol carries beyond the common fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", tag = "payload")]
pub enum SymbolPayload {
    #[default]
    None,
    Method {
        return_type: Option<CompactString>,
        parameters: Vec<ParameterInfo>,
    },
    Type {
        super_class: Option<CompactString>,
        interfaces: Vec<CompactString>,
    },
    Enum {
        values: Vec<CompactString>,
    },
    Variable {
        type_name: CompactString,
        initializer_type: Option<CompactString>,
    },
}

/// The two spans of a declaration: the whole of it, and the name token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolLocation {
    pub symbol_range: Range,
    pub identifier_range: Range,
}

impl SymbolLocation {
    pub fn new(symbol_range: Range, identifier_range: Range) -> Self {
        Self {
            symbol_range,
            identifier_range,
        }
    }
}

/// A named program entity. Scope symbols are `kind == Block` with a
/// `scope_type`; everything else leaves `scope_type` unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Symbol {
    pub id: String,
    pub key: SymbolKey,
    pub name: CompactString,
    pub kind: SymbolKind,
    pub location: SymbolLocation,
    pub file_uri: String,
    pub parent_id: Option<String>,
    pub modifiers: Modifiers,
    pub fqn: String,
    pub detail_level: DetailLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_type: Option<ScopeType>,
    #[serde(default)]
    pub payload: SymbolPayload,
}

impl Symbol {
    pub fn new(key: SymbolKey, location: SymbolLocation, detail_level: DetailLevel) -> Self {
        let id = key.unified_id();
        let fqn = Self::fqn_for(&key);
        let name = key.name.clone();
        let kind = key.kind;
        let file_uri = key.file_uri.clone();
        Self {
            id,
            key,
            name,
            kind,
            location,
            file_uri,
            parent_id: None,
            modifiers: Modifiers::default(),
            fqn,
            detail_level,
            scope_type: None,
            payload: SymbolPayload::None,
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_payload(mut self, payload: SymbolPayload) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_scope_type(mut self, scope_type: ScopeType) -> Self {
        self.scope_type = Some(scope_type);
        self
    }

    /// Lowercase dotted name: type-introducing path segments plus the
    /// symbol's own name. Apex is case-insensitive, so the fold is part of
    /// the canonical form.
    fn fqn_for(key: &SymbolKey) -> String {
        let mut parts: Vec<&str> = key
            .scope_path
            .iter()
            .filter(|seg| {
                matches!(&*seg.prefix, "class" | "interface" | "trigger" | "enum")
            })
            .map(|seg| &*seg.name)
            .collect();
        parts.push(&key.name);
        case_fold(&parts.join("."))
    }

    /// Repair the `id == key.unified_id()` invariant. Insertion paths call
    /// this so a hand-built symbol can never poison the table.
    pub fn normalize(&mut self) {
        let unified = self.key.unified_id();
        if self.id != unified {
            self.id = unified;
        }
        if self.file_uri != self.key.file_uri {
            self.file_uri = self.key.file_uri.clone();
        }
        if self.fqn.is_empty() {
            self.fqn = Self::fqn_for(&self.key);
        }
    }

    pub fn is_scope(&self) -> bool {
        self.scope_type.is_some()
    }

    /// Merge a strictly-higher-detail copy of the same declaration into
    /// this one. Identity fields (`id`, `key`, `parent_id`) are preserved;
    /// everything the richer pass knows better replaces the stored value.
    pub fn enrich_from(&mut self, incoming: &Symbol) {
        debug_assert!(incoming.detail_level > self.detail_level);
        self.detail_level = incoming.detail_level;
        self.modifiers = incoming.modifiers;
        self.location = incoming.location;
        if !matches!(incoming.payload, SymbolPayload::None) {
            self.payload = incoming.payload.clone();
        }
        if self.scope_type.is_none() {
            self.scope_type = incoming.scope_type;
        }
    }
}
