//! Process-wide symbol graph: every registered file's symbols, typed
//! reference edges between them, and the deferred-reference queue that
//! gives cross-file resolution its eventual consistency.
//!
//! Files register in any order. A reference whose target is not yet known
//! parks in the deferred queue under the target's folded name and is
//! drained the moment a matching symbol arrives, so an edge A→B
//! materializes when B loads without recompiling A.

mod analysis;

pub use analysis::DependencyAnalysis;

use crate::reference::{ReferenceContext, is_builtin_type, is_resolvable_name};
use crate::symbol::Symbol;
use crate::table::{SymbolSlot, SymbolTable};
use crate::types::{Range, case_fold};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Stored edge payload. The location is omitted (redundant with the
/// source symbol's identifier range); [`FullReferenceEdge`] materializes
/// one with a placeholder for legacy callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompactEdge {
    pub kind: ReferenceContext,
    pub source_file: String,
    pub target_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// A compact edge rehydrated with endpoints and a placeholder location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FullReferenceEdge {
    pub source_id: String,
    pub target_id: String,
    pub kind: ReferenceContext,
    pub source_file: String,
    pub target_file: String,
    pub location: Range,
}

impl FullReferenceEdge {
    pub fn from_compact(source_id: &str, target_id: &str, edge: &CompactEdge) -> Self {
        Self {
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            kind: edge.kind,
            source_file: edge.source_file.clone(),
            target_file: edge.target_file.clone(),
            location: Range::empty(),
        }
    }

    pub fn to_compact(&self) -> CompactEdge {
        CompactEdge {
            kind: self.kind,
            source_file: self.source_file.clone(),
            target_file: self.target_file.clone(),
            context: None,
        }
    }
}

/// An edge whose target did not exist when the reference was seen.
#[derive(Debug, Clone)]
struct DeferredReference {
    source_id: String,
    source_file: String,
    target_name: String,
    kind: ReferenceContext,
    /// Where the reference sits in the source table, to backfill
    /// `resolved_symbol_id` on drain.
    location: Range,
    /// Qualifier usages get rewritten to CLASS_REFERENCE on drain when the
    /// drained target turns out to be a type.
    is_qualifier: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub total_symbols: usize,
    pub total_files: usize,
    pub total_references: usize,
    pub deferred_references: usize,
    pub circular_dependencies: usize,
}

pub struct SymbolGraph {
    symbols: HashMap<String, SymbolSlot>,
    by_name: HashMap<String, Vec<String>>,
    by_fqn: HashMap<String, String>,
    file_symbols: HashMap<String, Vec<String>>,
    tables: HashMap<String, SymbolTable>,
    graph: StableDiGraph<String, CompactEdge>,
    node_map: HashMap<String, NodeIndex>,
    edge_keys: HashSet<(String, String, ReferenceContext)>,
    deferred: HashMap<String, Vec<DeferredReference>>,
    /// Permit qualifier rewriting when deferred targets resolve to types.
    reference_correction: bool,
}

impl Default for SymbolGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolGraph {
    pub fn new() -> Self {
        Self {
            symbols: HashMap::new(),
            by_name: HashMap::new(),
            by_fqn: HashMap::new(),
            file_symbols: HashMap::new(),
            tables: HashMap::new(),
            graph: StableDiGraph::new(),
            node_map: HashMap::new(),
            edge_keys: HashSet::new(),
            deferred: HashMap::new(),
            reference_correction: true,
        }
    }

    pub fn with_reference_correction(mut self, enabled: bool) -> Self {
        self.reference_correction = enabled;
        self
    }

    /// Register a file's symbol table: every symbol goes into the index,
    /// every reference either becomes an edge or parks in the deferred
    /// queue. Re-registering the same file after enrichment is safe; slots
    /// merge and edges deduplicate.
    pub fn add_symbol_table(&mut self, mut table: SymbolTable) {
        let file_uri = table.file_uri().to_string();

        for symbol in table.symbols().into_iter().cloned().collect::<Vec<_>>() {
            self.insert_symbol(symbol);
        }

        self.resolve_table_references(&mut table);
        self.tables.insert(file_uri, table);
    }

    /// The registered (and possibly enriched) table for a file. Callers
    /// holding a table reference from before enrichment must re-fetch.
    pub fn table(&self, file_uri: &str) -> Option<&SymbolTable> {
        self.tables.get(file_uri)
    }

    pub fn table_mut(&mut self, file_uri: &str) -> Option<&mut SymbolTable> {
        self.tables.get_mut(file_uri)
    }

    fn insert_symbol(&mut self, mut symbol: Symbol) {
        symbol.normalize();
        let id = symbol.id.clone();
        let folded_name = case_fold(&symbol.name);
        let folded_fqn = case_fold(&symbol.fqn);
        let file_uri = symbol.file_uri.clone();

        let is_new = match self.symbols.entry(id.clone()) {
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(SymbolSlot::One(symbol));
                true
            }
            std::collections::hash_map::Entry::Occupied(mut slot) => {
                let slot = slot.get_mut();
                if let Some(stored) = slot.find_site_mut(&symbol) {
                    if symbol.detail_level > stored.detail_level {
                        stored.enrich_from(&symbol);
                    }
                } else {
                    slot.push_duplicate(symbol);
                }
                false
            }
        };

        if is_new {
            self.by_name.entry(folded_name.clone()).or_default().push(id.clone());
            self.by_fqn.entry(folded_fqn.clone()).or_insert_with(|| id.clone());
            self.file_symbols
                .entry(file_uri)
                .or_default()
                .push(id.clone());
            self.ensure_node(&id);
            self.drain_deferred(&folded_name, &id);
            if folded_fqn != folded_name {
                self.drain_deferred(&folded_fqn, &id);
            }
        }
    }

    fn ensure_node(&mut self, id: &str) -> NodeIndex {
        if let Some(&idx) = self.node_map.get(id) {
            return idx;
        }
        let idx = self.graph.add_node(id.to_string());
        self.node_map.insert(id.to_string(), idx);
        idx
    }

    /// Materialize every deferred reference waiting on `key`.
    fn drain_deferred(&mut self, key: &str, target_id: &str) {
        let Some(pending) = self.deferred.remove(key) else {
            return;
        };
        for entry in pending {
            // The source may have been removed while the entry waited.
            if !self.symbols.contains_key(&entry.source_id) {
                continue;
            }
            let target_file = self
                .symbols
                .get(target_id)
                .map(|slot| slot.first().file_uri.clone())
                .unwrap_or_default();
            self.insert_edge(
                &entry.source_id,
                target_id,
                entry.kind,
                &entry.source_file,
                &target_file,
            );
            self.backfill_resolution(&entry, target_id);
        }
    }

    /// Write the drained resolution back onto the source table's
    /// reference: resolved id always, CLASS_REFERENCE rewriting for
    /// qualifier usages when permitted.
    fn backfill_resolution(&mut self, entry: &DeferredReference, target_id: &str) {
        let target_is_type = self
            .symbols
            .get(target_id)
            .is_some_and(|slot| slot.first().kind.is_type());
        let correct = self.reference_correction && entry.is_qualifier && target_is_type;

        if let Some(table) = self.tables.get_mut(&entry.source_file) {
            for reference in table.references_mut() {
                if reference.location == entry.location
                    && case_fold(&reference.name) == entry.target_name
                {
                    reference.resolved_symbol_id = Some(target_id.to_string());
                    if correct && reference.context == ReferenceContext::VariableUsage {
                        reference.context = ReferenceContext::ClassReference;
                        reference.access = None;
                    }
                }
            }
        }
    }

    fn insert_edge(
        &mut self,
        source_id: &str,
        target_id: &str,
        kind: ReferenceContext,
        source_file: &str,
        target_file: &str,
    ) -> bool {
        let key = (source_id.to_string(), target_id.to_string(), kind);
        if !self.edge_keys.insert(key) {
            return false;
        }
        let source = self.ensure_node(source_id);
        let target = self.ensure_node(target_id);
        self.graph.add_edge(
            source,
            target,
            CompactEdge {
                kind,
                source_file: source_file.to_string(),
                target_file: target_file.to_string(),
                context: None,
            },
        );
        true
    }

    /// Insert an edge if both endpoints are known, defer otherwise.
    /// Deduplicates by (source, target, kind).
    pub fn add_reference(
        &mut self,
        source_id: &str,
        target: &str,
        kind: ReferenceContext,
        location: Range,
    ) {
        let source_file = self
            .symbols
            .get(source_id)
            .map(|s| s.first().file_uri.clone())
            .unwrap_or_default();

        // Target may arrive as an id or as a bare name.
        let target_id = if self.symbols.contains_key(target) {
            Some(target.to_string())
        } else {
            self.find_target_id(target)
        };

        match target_id {
            Some(target_id) => {
                let target_file = self.symbols[&target_id].first().file_uri.clone();
                self.insert_edge(source_id, &target_id, kind, &source_file, &target_file);
            }
            None => {
                self.deferred
                    .entry(case_fold(target))
                    .or_default()
                    .push(DeferredReference {
                        source_id: source_id.to_string(),
                        source_file,
                        target_name: case_fold(target),
                        kind,
                        location,
                        is_qualifier: false,
                    });
            }
        }
    }

    fn find_target_id(&self, name: &str) -> Option<String> {
        let folded = case_fold(name);
        if let Some(id) = self.by_fqn.get(&folded) {
            return Some(id.clone());
        }
        self.by_name
            .get(&folded)
            .and_then(|ids| ids.first())
            .cloned()
    }

    /// Resolve a table's references against the graph. Same-file targets
    /// win; cross-file targets by name or FQN; everything else defers.
    fn resolve_table_references(&mut self, table: &mut SymbolTable) {
        let Some(ctx) = ResolutionContext::of(table) else {
            return;
        };
        let total = table.references().len();
        self.resolve_reference_slice(table, &ctx, 0, total);
    }

    /// Resolve references `start..end` of a table. The slice boundary is
    /// the yield granularity of [`Self::enhance_cross_file`].
    fn resolve_reference_slice(
        &mut self,
        table: &mut SymbolTable,
        ctx: &ResolutionContext,
        start: usize,
        end: usize,
    ) {
        let source_file = ctx.source_file.clone();
        let root_id = ctx.root_id.clone();
        let qualifier_sites = &ctx.qualifier_sites;

        let mut resolutions: Vec<(usize, String)> = Vec::new();
        let mut deferrals: Vec<DeferredReference> = Vec::new();
        let mut edges: Vec<(String, ReferenceContext)> = Vec::new();

        for (index, reference) in table.references().iter().enumerate().take(end).skip(start) {
            if reference.resolved_symbol_id.is_some() {
                continue;
            }
            let is_qualifier = qualifier_sites.contains(&reference.location)
                && reference.context == ReferenceContext::VariableUsage;
            if !reference.context.is_type_usage() && !is_qualifier {
                // Lexically scoped usage; resolvable inside the file only.
                if let Some(local) = table.lookup(&reference.name, None) {
                    resolutions.push((index, local.id.clone()));
                }
                continue;
            }
            if !is_resolvable_name(&reference.name) || is_builtin_type(&reference.name) {
                continue;
            }

            if let Some(local) = table.lookup(&reference.name, None) {
                resolutions.push((index, local.id.clone()));
                edges.push((local.id.clone(), reference.context));
                continue;
            }
            match self.find_target_id(&reference.name) {
                Some(target_id) => {
                    resolutions.push((index, target_id.clone()));
                    edges.push((target_id, reference.context));
                }
                None => deferrals.push(DeferredReference {
                    source_id: root_id.clone(),
                    source_file: source_file.clone(),
                    target_name: case_fold(&reference.name),
                    kind: reference.context,
                    location: reference.location,
                    is_qualifier,
                }),
            }
        }

        for (index, id) in resolutions {
            table.references_mut()[index].resolved_symbol_id = Some(id);
        }
        for (target_id, kind) in edges {
            let target_file = self.symbols[&target_id].first().file_uri.clone();
            self.insert_edge(&root_id, &target_id, kind, &source_file, &target_file);
        }
        for entry in deferrals {
            let queue = self.deferred.entry(entry.target_name.clone()).or_default();
            // Re-running resolution must not multiply pending entries.
            let already_queued = queue.iter().any(|existing| {
                existing.source_id == entry.source_id
                    && existing.kind == entry.kind
                    && existing.location == entry.location
            });
            if !already_queued {
                queue.push(entry);
            }
        }
    }

    /// Erase a file: its symbols, its table, every edge touching its
    /// symbols. Edges from surviving sources to removed targets fall back
    /// into the deferred queue; deferred entries keyed by the removed
    /// names stay (a later file may satisfy them).
    pub fn remove_file(&mut self, file_uri: &str) {
        let Some(ids) = self.file_symbols.remove(file_uri) else {
            return;
        };
        let removed: HashSet<&String> = ids.iter().collect();

        for id in &ids {
            if let Some(&node) = self.node_map.get(id) {
                // Surviving inbound sources become deferred again.
                let inbound: Vec<(String, CompactEdge)> = self
                    .graph
                    .edges_directed(node, petgraph::Direction::Incoming)
                    .map(|edge| (self.graph[edge.source()].clone(), edge.weight().clone()))
                    .collect();
                for (source_id, edge) in inbound {
                    if removed.contains(&source_id) {
                        continue;
                    }
                    let target_name = self
                        .symbols
                        .get(id)
                        .map(|s| case_fold(&s.first().name))
                        .unwrap_or_default();
                    self.deferred
                        .entry(target_name.clone())
                        .or_default()
                        .push(DeferredReference {
                            source_id,
                            source_file: edge.source_file.clone(),
                            target_name,
                            kind: edge.kind,
                            location: Range::empty(),
                            is_qualifier: false,
                        });
                }
            }
        }

        for id in &ids {
            if let Some(node) = self.node_map.remove(id) {
                self.graph.remove_node(node);
            }
            if let Some(slot) = self.symbols.remove(id) {
                let folded = case_fold(&slot.first().name);
                if let Some(names) = self.by_name.get_mut(&folded) {
                    names.retain(|existing| existing != id);
                    if names.is_empty() {
                        self.by_name.remove(&folded);
                    }
                }
                let folded_fqn = case_fold(&slot.first().fqn);
                if self.by_fqn.get(&folded_fqn) == Some(id) {
                    self.by_fqn.remove(&folded_fqn);
                }
            }
        }

        self.edge_keys
            .retain(|(source, target, _)| !removed.contains(source) && !removed.contains(target));
        self.tables.remove(file_uri);
        tracing::debug!(uri = file_uri, symbols = ids.len(), "removed file from graph");
    }

    // ---- lookups --------------------------------------------------------

    pub fn get_symbol_by_id(&self, id: &str) -> Option<&Symbol> {
        self.symbols.get(id).map(SymbolSlot::first)
    }

    pub fn get_all_symbols_by_id(&self, id: &str) -> Vec<&Symbol> {
        self.symbols
            .get(id)
            .map(SymbolSlot::all)
            .unwrap_or_default()
    }

    pub fn lookup_symbol_by_name(&self, name: &str) -> Vec<&Symbol> {
        self.by_name
            .get(&case_fold(name))
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.symbols.get(id).map(SymbolSlot::first))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn lookup_symbol_by_fqn(&self, fqn: &str) -> Option<&Symbol> {
        self.by_fqn
            .get(&case_fold(fqn))
            .and_then(|id| self.symbols.get(id))
            .map(SymbolSlot::first)
    }

    pub fn get_symbols_in_file(&self, file_uri: &str) -> Vec<&Symbol> {
        self.file_symbols
            .get(file_uri)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.symbols.get(id).map(SymbolSlot::first))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Files that define a symbol with this name.
    pub fn get_files_for_symbol(&self, name: &str) -> Vec<String> {
        let mut files: Vec<String> = self
            .lookup_symbol_by_name(name)
            .into_iter()
            .map(|s| s.file_uri.clone())
            .collect();
        files.sort();
        files.dedup();
        files
    }

    /// Inbound edges: who references `id`.
    pub fn find_references_to(&self, id: &str) -> Vec<FullReferenceEdge> {
        let Some(&node) = self.node_map.get(id) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(node, petgraph::Direction::Incoming)
            .map(|edge| {
                let source = &self.graph[edge.source()];
                FullReferenceEdge::from_compact(source, id, edge.weight())
            })
            .collect()
    }

    /// Outbound edges: what `id` references.
    pub fn find_references_from(&self, id: &str) -> Vec<FullReferenceEdge> {
        let Some(&node) = self.node_map.get(id) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(node, petgraph::Direction::Outgoing)
            .map(|edge| {
                let target = &self.graph[edge.target()];
                FullReferenceEdge::from_compact(id, target, edge.weight())
            })
            .collect()
    }

    pub fn get_stats(&self) -> GraphStats {
        GraphStats {
            total_symbols: self
                .symbols
                .values()
                .map(|slot| slot.all().len())
                .sum(),
            total_files: self.file_symbols.len(),
            total_references: self.graph.edge_count(),
            deferred_references: self.deferred.values().map(Vec::len).sum(),
            circular_dependencies: self.detect_circular_dependencies().len(),
        }
    }

    pub(crate) fn petgraph(&self) -> &StableDiGraph<String, CompactEdge> {
        &self.graph
    }

    pub(crate) fn node_of(&self, id: &str) -> Option<NodeIndex> {
        self.node_map.get(id).copied()
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.values().map(|slot| slot.all().len()).sum()
    }

    /// Re-run resolution for one file against everything registered since,
    /// yielding every 50 references so request handlers never starve.
    /// Marks the table cross-file resolved on completion; cancellation
    /// abandons cleanly with the table still registered.
    pub async fn enhance_cross_file(
        &mut self,
        file_uri: &str,
        token: &crate::exec::CancellationToken,
    ) -> crate::error::IndexResult<usize> {
        const CHUNK: usize = 50;

        let Some(mut table) = self.tables.remove(file_uri) else {
            return Err(crate::error::IndexError::FileNotIndexed {
                uri: file_uri.to_string(),
            });
        };

        if let Some(ctx) = ResolutionContext::of(&table) {
            let total = table.references().len();
            let mut index = 0;
            while index < total {
                if let Err(err) = token.check() {
                    self.tables.insert(file_uri.to_string(), table);
                    return Err(err);
                }
                let end = (index + CHUNK).min(total);
                self.resolve_reference_slice(&mut table, &ctx, index, end);
                index = end;
                tokio::task::yield_now().await;
            }
        }

        let resolved = table
            .references()
            .iter()
            .filter(|r| r.resolved_symbol_id.is_some())
            .count();
        table.set_cross_file_resolved(true);
        self.tables.insert(file_uri.to_string(), table);
        Ok(resolved)
    }

    /// Strongly connected components of size > 1, in insertion order.
    pub fn detect_circular_dependencies(&self) -> Vec<Vec<String>> {
        analysis::circular_dependencies(self)
    }

    pub fn analyze_dependencies(&self, id: &str) -> DependencyAnalysis {
        analysis::analyze(self, id)
    }
}

/// Immutable facts resolution needs about the table being processed.
struct ResolutionContext {
    root_id: String,
    source_file: String,
    /// Qualifier positions, to tell `Cls` in `Cls.m()` apart from a plain
    /// variable read.
    qualifier_sites: HashSet<Range>,
}

impl ResolutionContext {
    fn of(table: &SymbolTable) -> Option<Self> {
        // Anonymous units have no root symbol to anchor edges on.
        let root_id = table.root_symbols().first().map(|root| root.id.clone())?;
        Some(Self {
            root_id,
            source_file: table.file_uri().to_string(),
            qualifier_sites: table
                .references()
                .iter()
                .filter_map(|r| r.qualifier_location)
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests;
