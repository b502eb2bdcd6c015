//! Per-file symbol table: every symbol parsed from one file, its scope
//! hierarchy, and the references captured alongside.
//!
//! The table is built incrementally by the layered listeners. Re-running a
//! higher-detail pass against the same table enriches stored symbols in
//! place; ids and parentage never change once assigned. `add_symbol` is
//! total: it inserts, enriches, or records a duplicate, and never fails.
//!
//! Scope symbols live in their own store. The synthetic file root scope
//! anchors the stack but is not a symbol, so the single-root invariant
//! (exactly one symbol with no parent per file) holds over the symbol
//! store alone.

use crate::reference::TypeReference;
use crate::symbol::{PathSegment, Symbol, SymbolKey, SymbolLocation};
use crate::types::{DetailLevel, Position, Range, ScopeType, SymbolKind, case_fold};
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

/// A symbol-id slot: almost always one symbol, occasionally a short list
/// when a file declares two entities that map to the same id.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SymbolSlot {
    One(Symbol),
    Many(Vec<Symbol>),
}

impl SymbolSlot {
    pub fn first(&self) -> &Symbol {
        match self {
            Self::One(s) => s,
            Self::Many(list) => &list[0],
        }
    }

    pub fn all(&self) -> Vec<&Symbol> {
        match self {
            Self::One(s) => vec![s],
            Self::Many(list) => list.iter().collect(),
        }
    }

    pub(crate) fn push_duplicate(&mut self, symbol: Symbol) {
        match self {
            Self::One(existing) => {
                let existing = existing.clone();
                *self = Self::Many(vec![existing, symbol]);
            }
            Self::Many(list) => list.push(symbol),
        }
    }

    /// The stored copy declared at the same site as `incoming`, if any.
    /// Layered passes revisit every declaration; the site tells an
    /// enrichment apart from a true duplicate.
    pub(crate) fn find_site_mut(&mut self, incoming: &Symbol) -> Option<&mut Symbol> {
        match self {
            Self::One(stored) => (stored.location.identifier_range
                == incoming.location.identifier_range)
                .then_some(stored),
            Self::Many(list) => list
                .iter_mut()
                .find(|stored| stored.location.identifier_range == incoming.location.identifier_range),
        }
    }
}

pub struct SymbolTable {
    file_uri: String,
    symbols: HashMap<String, SymbolSlot>,
    symbol_order: Vec<String>,
    scopes: HashMap<String, Symbol>,
    scope_order: Vec<String>,
    /// Scope id -> the path its children inherit into their keys.
    scope_child_paths: HashMap<String, Vec<PathSegment>>,
    /// Parent id ("" for the file level) -> child symbol ids, insertion order.
    children: HashMap<String, Vec<String>>,
    /// Active scope stack; index 0 is always the file root scope.
    scope_stack: Vec<String>,
    file_scope_id: String,
    references: Vec<TypeReference>,
    /// (span, folded name) of every captured reference. Layered passes
    /// re-walk the same source; a site captured once stays captured once.
    seen_references: HashSet<(Position, Position, String)>,
    detail_level: DetailLevel,
    references_collected: bool,
    cross_file_resolved: bool,
}

impl SymbolTable {
    pub fn new(file_uri: impl Into<String>) -> Self {
        let file_uri = file_uri.into();
        let key = SymbolKey::new(file_uri.clone(), vec![], SymbolKind::Block, "file");
        let location = SymbolLocation::new(Range::at(1, 0, u32::MAX, 0), Range::at(1, 0, 1, 0));
        let mut file_scope =
            Symbol::new(key, location, DetailLevel::PublicApi).with_scope_type(ScopeType::File);
        file_scope.normalize();
        let file_scope_id = file_scope.id.clone();

        let mut scopes = HashMap::new();
        let mut scope_child_paths = HashMap::new();
        scopes.insert(file_scope_id.clone(), file_scope);
        scope_child_paths.insert(file_scope_id.clone(), vec![]);

        Self {
            file_uri,
            symbols: HashMap::new(),
            symbol_order: Vec::new(),
            scopes,
            scope_order: vec![file_scope_id.clone()],
            scope_child_paths,
            children: HashMap::new(),
            scope_stack: vec![file_scope_id.clone()],
            file_scope_id,
            references: Vec::new(),
            seen_references: HashSet::new(),
            detail_level: DetailLevel::PublicApi,
            references_collected: false,
            cross_file_resolved: false,
        }
    }

    pub fn file_uri(&self) -> &str {
        &self.file_uri
    }

    pub fn file_scope(&self) -> &Symbol {
        &self.scopes[&self.file_scope_id]
    }

    /// Extend the file scope to the real extent of the source once known.
    pub fn set_file_span(&mut self, range: Range) {
        if let Some(scope) = self.scopes.get_mut(&self.file_scope_id) {
            scope.location.symbol_range = range;
        }
    }

    pub fn current_scope(&self) -> &Symbol {
        let id = self.scope_stack.last().unwrap_or(&self.file_scope_id);
        &self.scopes[id]
    }

    pub fn detail_level(&self) -> DetailLevel {
        self.detail_level
    }

    /// Record that a listener pass at `level` ran against this table.
    pub fn record_pass(&mut self, level: DetailLevel) {
        if level > self.detail_level {
            self.detail_level = level;
        }
    }

    pub fn references_collected(&self) -> bool {
        self.references_collected
    }

    pub fn cross_file_resolved(&self) -> bool {
        self.cross_file_resolved
    }

    pub fn set_cross_file_resolved(&mut self, resolved: bool) {
        self.cross_file_resolved = resolved;
    }

    /// Insert a symbol. Total: inserts, enriches in place, or records a
    /// duplicate; never fails.
    ///
    /// With no explicit `parent_scope` the symbol parents to the table's
    /// current scope; at file level the parent stays `None`, keeping the
    /// single-root invariant.
    pub fn add_symbol(&mut self, mut symbol: Symbol, parent_scope: Option<&str>) -> &Symbol {
        symbol.normalize();

        if symbol.parent_id.is_none() {
            let scope_id = parent_scope
                .map(str::to_owned)
                .unwrap_or_else(|| self.current_scope().id.clone());
            if scope_id != self.file_scope_id {
                symbol.parent_id = Some(scope_id);
            }
        }

        let id = symbol.id.clone();
        if symbol.kind == SymbolKind::Block {
            // Scope symbols route to the scope store.
            if !self.scopes.contains_key(&id) {
                self.scope_order.push(id.clone());
                self.scopes.insert(id.clone(), symbol);
            }
            return &self.scopes[&id];
        }

        let parent_key = symbol.parent_id.clone().unwrap_or_default();
        match self.symbols.entry(id.clone()) {
            Entry::Vacant(slot) => {
                self.symbol_order.push(id.clone());
                self.children.entry(parent_key).or_default().push(id.clone());
                slot.insert(SymbolSlot::One(symbol));
            }
            Entry::Occupied(mut slot) => {
                let slot = slot.get_mut();
                // Same declaration site: enrich upward, otherwise the
                // stored copy wins. A different site with the same id is
                // a true duplicate; keep both copies queryable.
                if let Some(stored) = slot.find_site_mut(&symbol) {
                    if symbol.detail_level > stored.detail_level {
                        stored.enrich_from(&symbol);
                    }
                } else {
                    slot.push_duplicate(symbol);
                }
            }
        }
        self.symbols[&id].first()
    }

    /// Open a scope. Class and method scopes parent to their semantic
    /// symbol when it exists; control scopes parent to the enclosing
    /// scope. Returns a clone of the (possibly reused) scope symbol.
    pub fn enter_scope(
        &mut self,
        name: &str,
        scope_type: ScopeType,
        location: SymbolLocation,
        parent_scope: Option<&str>,
    ) -> Symbol {
        let enclosing_id = parent_scope
            .map(str::to_owned)
            .unwrap_or_else(|| self.current_scope().id.clone());

        // Re-entering the same region during a higher-detail pass reuses
        // the scope created earlier, keeping ordinals stable.
        if let Some(existing) = self.scope_order.iter().find_map(|sid| {
            let scope = &self.scopes[sid];
            (scope.scope_type == Some(scope_type)
                && scope.location.symbol_range == location.symbol_range)
                .then_some(scope)
        }) {
            let reused = existing.clone();
            self.scope_stack.push(reused.id.clone());
            return reused;
        }

        let enclosing_path = self
            .scope_child_paths
            .get(&enclosing_id)
            .cloned()
            .unwrap_or_default();

        let semantic_parent = self.semantic_symbol_for_scope(name, scope_type, &enclosing_id);

        let (scope_name, child_segment, parent_id) = match (&semantic_parent, scope_type) {
            (Some(semantic), ScopeType::Class | ScopeType::Method) => (
                scope_type.as_str().to_string(),
                PathSegment::new(semantic.kind.as_str(), name),
                Some(semantic.id.clone()),
            ),
            _ => {
                let parent = (enclosing_id != self.file_scope_id).then(|| enclosing_id.clone());
                if name.is_empty() {
                    let ordinal = self.sibling_ordinal(&enclosing_id, scope_type);
                    (
                        format!("{}[{ordinal}]", scope_type.as_str()),
                        PathSegment::new(scope_type.as_str(), &ordinal.to_string()),
                        parent,
                    )
                } else {
                    (
                        name.to_string(),
                        PathSegment::new(scope_type.as_str(), name),
                        parent,
                    )
                }
            }
        };

        let child_path = {
            let mut path = match &semantic_parent {
                Some(semantic) if matches!(scope_type, ScopeType::Class | ScopeType::Method) => {
                    semantic.key.scope_path.clone()
                }
                _ => enclosing_path,
            };
            path.push(child_segment);
            path
        };

        let key = SymbolKey::new(
            self.file_uri.clone(),
            child_path.clone(),
            SymbolKind::Block,
            &scope_name,
        );
        let mut scope = Symbol::new(key, location, self.detail_level).with_scope_type(scope_type);
        if let Some(parent) = parent_id {
            scope.parent_id = Some(parent);
        }
        scope.normalize();

        let id = scope.id.clone();
        self.scope_order.push(id.clone());
        self.scope_child_paths.insert(id.clone(), child_path);
        self.scopes.insert(id.clone(), scope.clone());
        self.scope_stack.push(id);
        scope
    }

    /// Close the innermost scope. The file root is never popped, so
    /// unmatched exits from malformed input cannot underflow the stack.
    pub fn exit_scope(&mut self) {
        if self.scope_stack.len() > 1 {
            self.scope_stack.pop();
        }
    }

    /// The path symbols declared in `scope_id` inherit into their keys.
    pub fn child_path_of(&self, scope_id: &str) -> Vec<PathSegment> {
        self.scope_child_paths
            .get(scope_id)
            .cloned()
            .unwrap_or_default()
    }

    fn sibling_ordinal(&self, enclosing_id: &str, scope_type: ScopeType) -> usize {
        self.scope_order
            .iter()
            .filter(|sid| {
                let scope = &self.scopes[*sid];
                scope.scope_type == Some(scope_type)
                    && scope.parent_id.as_deref().is_some_and(|p| p == enclosing_id)
            })
            .count()
    }

    /// Find the semantic symbol a class/method scope should parent to: a
    /// member of the enclosing scope with the scope's name and a matching
    /// kind.
    fn semantic_symbol_for_scope(
        &self,
        name: &str,
        scope_type: ScopeType,
        enclosing_id: &str,
    ) -> Option<Symbol> {
        if !matches!(scope_type, ScopeType::Class | ScopeType::Method) || name.is_empty() {
            return None;
        }
        let folded = case_fold(name);
        let parent_key = if enclosing_id == self.file_scope_id {
            String::new()
        } else {
            enclosing_id.to_string()
        };
        let kinds: &[SymbolKind] = match scope_type {
            ScopeType::Class => &[
                SymbolKind::Class,
                SymbolKind::Interface,
                SymbolKind::Trigger,
                SymbolKind::Enum,
            ],
            _ => &[
                SymbolKind::Method,
                SymbolKind::Constructor,
                SymbolKind::Property,
            ],
        };
        self.children.get(&parent_key)?.iter().rev().find_map(|id| {
            let sym = self.symbols.get(id)?.first();
            (kinds.contains(&sym.kind) && case_fold(&sym.name) == folded).then(|| sym.clone())
        })
    }

    pub fn get_symbol_by_id(&self, id: &str) -> Option<&Symbol> {
        self.symbols
            .get(id)
            .map(SymbolSlot::first)
            .or_else(|| self.scopes.get(id))
    }

    /// Every copy stored under `id`, duplicates included.
    pub fn get_all_symbols_by_id(&self, id: &str) -> Vec<&Symbol> {
        match self.symbols.get(id) {
            Some(slot) => slot.all(),
            None => self.scopes.get(id).map(|s| vec![s]).unwrap_or_default(),
        }
    }

    /// Direct children of a scope matching `name`, case-insensitive.
    pub fn find_symbol_in_scope(&self, name: &str, scope_id: &str) -> Option<&Symbol> {
        let folded = case_fold(name);
        let key = if scope_id == self.file_scope_id {
            ""
        } else {
            scope_id
        };
        self.children.get(key)?.iter().find_map(|id| {
            let sym = self.symbols.get(id)?.first();
            (case_fold(&sym.name) == folded).then_some(sym)
        })
    }

    pub fn find_symbol_in_current_scope(&self, name: &str) -> Option<&Symbol> {
        self.find_symbol_in_scope(name, &self.current_scope().id)
    }

    /// Scoped lookup: walk from `starting_scope` up through parents, then
    /// the file-level roots, then fall back to any symbol in the file.
    pub fn lookup(&self, name: &str, starting_scope: Option<&str>) -> Option<&Symbol> {
        let folded = case_fold(name);
        let mut cursor = starting_scope
            .map(str::to_owned)
            .unwrap_or_else(|| self.current_scope().id.clone());

        loop {
            if let Some(found) = self.find_symbol_in_scope(name, &cursor) {
                return Some(found);
            }
            let scope = match self.scopes.get(&cursor) {
                Some(s) => s,
                None => break,
            };
            match &scope.parent_id {
                None => break,
                Some(parent) => {
                    // A class/method scope parents to its semantic symbol;
                    // hop over it to the symbol's own enclosing scope.
                    if let Some(slot) = self.symbols.get(parent) {
                        let semantic = slot.first();
                        if case_fold(&semantic.name) == folded {
                            return self.symbols.get(parent).map(SymbolSlot::first);
                        }
                        match &semantic.parent_id {
                            Some(grand) => cursor = grand.clone(),
                            None => break,
                        }
                    } else {
                        cursor = parent.clone();
                    }
                }
            }
        }

        // File-level roots.
        if let Some(found) = self.find_symbol_in_scope(name, &self.file_scope_id) {
            return Some(found);
        }

        // Last resort: anything in the file with that name.
        self.symbol_order.iter().find_map(|id| {
            let sym = self.symbols.get(id)?.first();
            (case_fold(&sym.name) == folded).then_some(sym)
        })
    }

    /// Smallest block symbol whose span contains `pos`.
    pub fn find_containing_block_symbol(&self, pos: Position) -> Option<&Symbol> {
        self.scope_order
            .iter()
            .map(|id| &self.scopes[id])
            .filter(|scope| scope.location.symbol_range.contains(pos))
            .min_by_key(|scope| scope.location.symbol_range.weight())
    }

    /// Root-to-leaf chain of scopes containing `pos`.
    pub fn get_scope_hierarchy(&self, pos: Position) -> Vec<&Symbol> {
        let mut chain: Vec<&Symbol> = self
            .scope_order
            .iter()
            .map(|id| &self.scopes[id])
            .filter(|scope| scope.location.symbol_range.contains(pos))
            .collect();
        chain.sort_by_key(|scope| std::cmp::Reverse(scope.location.symbol_range.weight()));
        chain
    }

    pub fn add_type_reference(&mut self, reference: TypeReference) {
        self.references_collected = true;
        if self.remember_site(&reference) {
            self.references.push(reference);
        }
    }

    /// A qualified or chained reference (`obj.field`, `A.B.c()`); kept on
    /// the same stream, the extra locations make position queries hit any
    /// link.
    pub fn add_hierarchical_reference(&mut self, reference: TypeReference) {
        debug_assert!(
            reference.qualifier.is_some() || !reference.chain_nodes.is_empty(),
            "hierarchical reference without qualifier or chain"
        );
        self.references_collected = true;
        if self.remember_site(&reference) {
            self.references.push(reference);
        }
    }

    fn remember_site(&mut self, reference: &TypeReference) -> bool {
        self.seen_references.insert((
            reference.location.start,
            reference.location.end,
            case_fold(&reference.name),
        ))
    }

    /// Exact-identity matches for any reference span covering `pos`.
    pub fn get_references_at_position(&self, pos: Position) -> Vec<&TypeReference> {
        self.references.iter().filter(|r| r.covers(pos)).collect()
    }

    pub fn references(&self) -> &[TypeReference] {
        &self.references
    }

    pub fn references_mut(&mut self) -> &mut Vec<TypeReference> {
        &mut self.references
    }

    /// Symbols with no parent; the single top-level type in a well-formed
    /// file.
    pub fn root_symbols(&self) -> Vec<&Symbol> {
        self.children
            .get("")
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.symbols.get(id).map(SymbolSlot::first))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All symbols in insertion order, duplicates flattened in.
    pub fn symbols(&self) -> Vec<&Symbol> {
        self.symbol_order
            .iter()
            .flat_map(|id| self.symbols[id].all())
            .collect()
    }

    pub fn scopes(&self) -> Vec<&Symbol> {
        self.scope_order.iter().map(|id| &self.scopes[id]).collect()
    }

    pub fn symbol_count(&self) -> usize {
        self.symbol_order
            .iter()
            .map(|id| self.symbols[id].all().len())
            .sum()
    }

    /// Debug dump: a symbols array and a scopes array, insertion-ordered,
    /// convenient to diff in tests. Not a stable on-disk format.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "fileUri": self.file_uri,
            "detailLevel": self.detail_level,
            "symbols": self.symbols(),
            "scopes": self.scopes(),
        })
    }
}
