//! The concrete tree listener that populates a [`SymbolTable`].
//!
//! One walker serves all four visibility layers: the collector is
//! parameterized by a [`DetailLevel`] that acts as the visibility
//! predicate and decides whether declarations are emitted and whether
//! bodies are walked at all. Running it repeatedly at ascending levels
//! against the same table enriches symbols in place.
//!
//! Per-declaration state (modifier checks, duplicate sets, the pending
//! body marker) is scoped to the enter/exit pair of each declaration so
//! nothing leaks to siblings.

use super::SemanticError;
use super::references::{collect_expr, collect_type_ref};
use crate::parser::{
    Accessor, AccessorKind, Block, CatchClause, CompilationUnit, Expr, FieldDecl, MethodDecl,
    ParseTreeListener, PropertyDecl, Stmt, TypeDecl, TypeDeclKind, TypeRef,
};
use crate::reference::ReferenceContext;
use crate::symbol::{ParameterInfo, Symbol, SymbolKey, SymbolLocation, SymbolPayload};
use crate::table::SymbolTable;
use crate::types::{
    DetailLevel, Modifiers, ModifierFlags, Range, ScopeType, SymbolKind, case_fold, compact_string,
};
use std::collections::HashSet;

pub struct SymbolCollector<'a> {
    table: &'a mut SymbolTable,
    errors: &'a mut Vec<SemanticError>,
    level: DetailLevel,
    collect_references: bool,
    /// Depth of enclosing type declarations below the visibility cut.
    suppressed_types: usize,
    type_entered: Vec<bool>,
    method_entered: Vec<bool>,
    property_admitted: Vec<bool>,
    accessor_entered: Vec<bool>,
    stmt_scope: Vec<bool>,
    /// Names the next walked block as a body scope.
    pending_body: Option<&'static str>,
    /// Enclosing method/constructor names, for reference parent context.
    method_names: Vec<String>,
}

impl<'a> SymbolCollector<'a> {
    pub fn new(
        table: &'a mut SymbolTable,
        errors: &'a mut Vec<SemanticError>,
        level: DetailLevel,
        collect_references: bool,
    ) -> Self {
        table.record_pass(level);
        Self {
            table,
            errors,
            level,
            collect_references,
            suppressed_types: 0,
            type_entered: Vec::new(),
            method_entered: Vec::new(),
            property_admitted: Vec::new(),
            accessor_entered: Vec::new(),
            stmt_scope: Vec::new(),
            pending_body: None,
            method_names: Vec::new(),
        }
    }

    fn parent_ctx(&self) -> Option<String> {
        self.method_names.last().cloned()
    }

    fn emit(
        &mut self,
        kind: SymbolKind,
        name: &str,
        name_range: Range,
        symbol_range: Range,
        modifiers: Modifiers,
        payload: SymbolPayload,
    ) {
        let scope_id = self.table.current_scope().id.clone();
        let path = self.table.child_path_of(&scope_id);
        let key = SymbolKey::new(self.table.file_uri().to_string(), path, kind, name);
        let symbol = Symbol::new(
            key,
            SymbolLocation::new(symbol_range, name_range),
            self.level,
        )
        .with_modifiers(modifiers)
        .with_payload(payload);
        self.table.add_symbol(symbol, None);
    }

    fn capture_type(&mut self, type_ref: &TypeRef, context: ReferenceContext) {
        if !self.collect_references {
            return;
        }
        let parent = self.parent_ctx();
        collect_type_ref(self.table, type_ref, context, parent.as_deref());
    }

    fn capture_expr(&mut self, expr: &Expr) {
        if !self.collect_references {
            return;
        }
        let parent = self.parent_ctx();
        collect_expr(self.table, expr, parent.as_deref());
    }

    fn semantic_error(&mut self, code: &'static str, message: String, range: Range) {
        self.errors.push(SemanticError {
            code,
            message,
            range,
        });
    }

    fn check_conflicting_modifiers(&mut self, modifiers: Modifiers, what: &str, range: Range) {
        if modifiers.flags.contains(ModifierFlags::FINAL | ModifierFlags::ABSTRACT) {
            self.semantic_error(
                "CONFLICTING_MODIFIERS",
                format!("{what} cannot be both 'final' and 'abstract'"),
                range,
            );
        }
    }

    fn enter_stmt_scope(&mut self, scope_type: ScopeType, range: Range) {
        self.table.enter_scope(
            "",
            scope_type,
            SymbolLocation::new(range, Range::new(range.start, range.start)),
            None,
        );
    }
}

impl ParseTreeListener for SymbolCollector<'_> {
    fn descend_into_bodies(&self) -> bool {
        self.level == DetailLevel::Full
    }

    fn exit_compilation_unit(&mut self, unit: &CompilationUnit) {
        self.table.set_file_span(unit.span);
    }

    fn enter_type(&mut self, decl: &TypeDecl) {
        let admitted =
            self.suppressed_types == 0 && self.level.admits(decl.modifiers.visibility);
        if !admitted {
            self.suppressed_types += 1;
            self.type_entered.push(false);
            return;
        }

        self.check_conflicting_modifiers(decl.modifiers, "a type", decl.name_range);

        let kind = match decl.kind {
            TypeDeclKind::Class => SymbolKind::Class,
            TypeDeclKind::Interface => SymbolKind::Interface,
            TypeDeclKind::Enum => SymbolKind::Enum,
            TypeDeclKind::Trigger => SymbolKind::Trigger,
        };
        let payload = match decl.kind {
            TypeDeclKind::Enum => {
                let mut seen = HashSet::new();
                for (value, range) in &decl.enum_values {
                    if !seen.insert(case_fold(value)) {
                        self.semantic_error(
                            "DUPLICATE_ENUM_VALUE",
                            format!("duplicate enum value '{value}'"),
                            *range,
                        );
                    }
                }
                SymbolPayload::Enum {
                    values: decl
                        .enum_values
                        .iter()
                        .map(|(v, _)| compact_string(v))
                        .collect(),
                }
            }
            _ => SymbolPayload::Type {
                super_class: decl.super_class.as_ref().map(|t| compact_string(&t.name)),
                interfaces: decl
                    .interfaces
                    .iter()
                    .map(|t| compact_string(&t.name))
                    .collect(),
            },
        };

        self.emit(
            kind,
            &decl.name,
            decl.name_range,
            decl.range,
            decl.modifiers,
            payload,
        );

        if let Some(super_class) = &decl.super_class {
            self.capture_type(super_class, ReferenceContext::TypeDeclaration);
        }
        for interface in &decl.interfaces {
            self.capture_type(interface, ReferenceContext::TypeDeclaration);
        }

        self.table.enter_scope(
            &decl.name,
            ScopeType::Class,
            SymbolLocation::new(decl.range, decl.name_range),
            None,
        );
        self.type_entered.push(true);
    }

    fn exit_type(&mut self, _decl: &TypeDecl) {
        if self.type_entered.pop().unwrap_or(false) {
            self.table.exit_scope();
        } else {
            self.suppressed_types = self.suppressed_types.saturating_sub(1);
        }
    }

    fn visit_field(&mut self, field: &FieldDecl, _owner: &TypeDecl) {
        if self.suppressed_types > 0 || !self.level.admits(field.modifiers.visibility) {
            return;
        }

        let mut seen = HashSet::new();
        for declarator in &field.declarators {
            if !seen.insert(case_fold(&declarator.name)) {
                self.semantic_error(
                    "DUPLICATE_VARIABLE",
                    format!("duplicate field '{}' in declaration", declarator.name),
                    declarator.name_range,
                );
                continue;
            }
            self.emit(
                SymbolKind::Field,
                &declarator.name,
                declarator.name_range,
                field.range,
                field.modifiers,
                SymbolPayload::Variable {
                    type_name: compact_string(&field.type_ref.name),
                    initializer_type: declarator.init.as_ref().and_then(initializer_type),
                },
            );
        }

        self.capture_type(&field.type_ref, ReferenceContext::VariableDeclaration);
        for declarator in &field.declarators {
            if let Some(init) = &declarator.init {
                self.capture_expr(init);
            }
        }
    }

    fn visit_enum_value(&mut self, name: &str, range: Range, owner: &TypeDecl) {
        if self.suppressed_types > 0 || !self.level.admits(owner.modifiers.visibility) {
            return;
        }
        self.emit(
            SymbolKind::EnumValue,
            name,
            range,
            range,
            Modifiers::default(),
            SymbolPayload::None,
        );
    }

    fn enter_method(&mut self, method: &MethodDecl, _owner: &TypeDecl) {
        let admitted =
            self.suppressed_types == 0 && self.level.admits(method.modifiers.visibility);
        if !admitted {
            self.method_entered.push(false);
            return;
        }

        self.check_conflicting_modifiers(method.modifiers, "a method", method.name_range);

        let kind = if method.is_constructor {
            SymbolKind::Constructor
        } else {
            SymbolKind::Method
        };
        self.emit(
            kind,
            &method.name,
            method.name_range,
            method.range,
            method.modifiers,
            SymbolPayload::Method {
                return_type: method.return_type.as_ref().map(|t| compact_string(&t.name)),
                parameters: method
                    .params
                    .iter()
                    .map(|p| ParameterInfo::new(&p.name, &p.type_ref.name))
                    .collect(),
            },
        );

        if let Some(return_type) = &method.return_type {
            if case_fold(&return_type.name) != "void" {
                self.capture_type(return_type, ReferenceContext::ReturnType);
            }
        }
        for param in &method.params {
            self.capture_type(&param.type_ref, ReferenceContext::ParameterType);
        }

        self.table.enter_scope(
            &method.name,
            ScopeType::Method,
            SymbolLocation::new(method.range, method.name_range),
            None,
        );
        for param in &method.params {
            self.emit(
                SymbolKind::Parameter,
                &param.name,
                param.name_range,
                param.name_range,
                Modifiers::default(),
                SymbolPayload::Variable {
                    type_name: compact_string(&param.type_ref.name),
                    initializer_type: None,
                },
            );
        }

        self.method_names.push(method.name.clone());
        self.pending_body = Some("body");
        self.method_entered.push(true);
    }

    fn exit_method(&mut self, _method: &MethodDecl, _owner: &TypeDecl) {
        if self.method_entered.pop().unwrap_or(false) {
            self.table.exit_scope();
            self.method_names.pop();
            self.pending_body = None;
        }
    }

    fn enter_property(&mut self, property: &PropertyDecl, _owner: &TypeDecl) {
        let admitted =
            self.suppressed_types == 0 && self.level.admits(property.modifiers.visibility);
        self.property_admitted.push(admitted);
        if !admitted {
            return;
        }
        self.emit(
            SymbolKind::Property,
            &property.name,
            property.name_range,
            property.range,
            property.modifiers,
            SymbolPayload::Variable {
                type_name: compact_string(&property.type_ref.name),
                initializer_type: None,
            },
        );
        self.capture_type(&property.type_ref, ReferenceContext::VariableDeclaration);
    }

    fn exit_property(&mut self, _property: &PropertyDecl, _owner: &TypeDecl) {
        self.property_admitted.pop();
    }

    fn enter_accessor(&mut self, accessor: &Accessor, property: &PropertyDecl) {
        let admitted = *self.property_admitted.last().unwrap_or(&false)
            && self.level == DetailLevel::Full;
        if !admitted {
            self.accessor_entered.push(false);
            return;
        }
        let scope_type = match accessor.kind {
            AccessorKind::Get => ScopeType::Getter,
            AccessorKind::Set => ScopeType::Setter,
        };
        self.table.enter_scope(
            &property.name,
            scope_type,
            SymbolLocation::new(accessor.range, property.name_range),
            None,
        );
        self.method_names.push(property.name.clone());
        self.pending_body = Some("body");
        self.accessor_entered.push(true);
    }

    fn exit_accessor(&mut self, _accessor: &Accessor, _property: &PropertyDecl) {
        if self.accessor_entered.pop().unwrap_or(false) {
            self.table.exit_scope();
            self.method_names.pop();
            self.pending_body = None;
        }
    }

    fn enter_initializer(&mut self, _block: &Block, _owner: &TypeDecl) {
        if self.suppressed_types == 0 {
            self.pending_body = Some("initializer");
        }
    }

    fn exit_initializer(&mut self, _block: &Block, _owner: &TypeDecl) {
        self.pending_body = None;
    }

    fn enter_block(&mut self, block: &Block) {
        let name = self.pending_body.take().unwrap_or("");
        self.table.enter_scope(
            name,
            ScopeType::Block,
            SymbolLocation::new(block.range, Range::new(block.range.start, block.range.start)),
            None,
        );
    }

    fn exit_block(&mut self, _block: &Block) {
        self.table.exit_scope();
    }

    fn enter_statement(&mut self, stmt: &Stmt) {
        let mut entered = false;
        match stmt {
            Stmt::Local(decl) => {
                let mut seen = HashSet::new();
                for declarator in &decl.declarators {
                    let folded = case_fold(&declarator.name);
                    let already_here = self
                        .table
                        .find_symbol_in_current_scope(&declarator.name)
                        .is_some_and(|s| s.kind == SymbolKind::Variable);
                    if !seen.insert(folded) || already_here {
                        self.semantic_error(
                            "DUPLICATE_VARIABLE",
                            format!("duplicate variable '{}'", declarator.name),
                            declarator.name_range,
                        );
                        continue;
                    }
                    self.emit(
                        SymbolKind::Variable,
                        &declarator.name,
                        declarator.name_range,
                        decl.range,
                        decl.modifiers,
                        SymbolPayload::Variable {
                            type_name: compact_string(&decl.type_ref.name),
                            initializer_type: declarator.init.as_ref().and_then(initializer_type),
                        },
                    );
                }
                self.capture_type(&decl.type_ref, ReferenceContext::VariableDeclaration);
                for declarator in &decl.declarators {
                    if let Some(init) = &declarator.init {
                        self.capture_expr(init);
                    }
                }
            }
            Stmt::Expr(expr) => self.capture_expr(expr),
            Stmt::If {
                condition, range, ..
            } => {
                self.enter_stmt_scope(ScopeType::If, *range);
                self.capture_expr(condition);
                entered = true;
            }
            Stmt::While {
                condition, range, ..
            } => {
                self.enter_stmt_scope(ScopeType::While, *range);
                self.capture_expr(condition);
                entered = true;
            }
            Stmt::DoWhile {
                condition, range, ..
            } => {
                self.enter_stmt_scope(ScopeType::DoWhile, *range);
                self.capture_expr(condition);
                entered = true;
            }
            Stmt::For {
                condition,
                update,
                range,
                ..
            } => {
                self.enter_stmt_scope(ScopeType::For, *range);
                if let Some(condition) = condition {
                    self.capture_expr(condition);
                }
                if let Some(update) = update {
                    self.capture_expr(update);
                }
                entered = true;
            }
            Stmt::Try { range, .. } => {
                self.enter_stmt_scope(ScopeType::Try, *range);
                entered = true;
            }
            Stmt::RunAs { user, range, .. } => {
                self.enter_stmt_scope(ScopeType::RunAs, *range);
                self.capture_expr(user);
                entered = true;
            }
            Stmt::Return { expr, .. } => {
                if let Some(expr) = expr {
                    self.capture_expr(expr);
                }
            }
            Stmt::Throw { expr, .. } => self.capture_expr(expr),
            Stmt::Break(_) | Stmt::Continue(_) | Stmt::Block(_) => {}
        }
        self.stmt_scope.push(entered);
    }

    fn exit_statement(&mut self, _stmt: &Stmt) {
        if self.stmt_scope.pop().unwrap_or(false) {
            self.table.exit_scope();
        }
    }

    fn enter_catch(&mut self, clause: &CatchClause) {
        self.enter_stmt_scope(ScopeType::Catch, clause.range);
        self.capture_type(&clause.param.type_ref, ReferenceContext::ParameterType);
        self.emit(
            SymbolKind::Parameter,
            &clause.param.name,
            clause.param.name_range,
            clause.param.name_range,
            Modifiers::default(),
            SymbolPayload::Variable {
                type_name: compact_string(&clause.param.type_ref.name),
                initializer_type: None,
            },
        );
    }

    fn exit_catch(&mut self, _clause: &CatchClause) {
        self.table.exit_scope();
    }

    fn enter_finally(&mut self, block: &Block) {
        self.enter_stmt_scope(ScopeType::Finally, block.range);
    }

    fn exit_finally(&mut self, _block: &Block) {
        self.table.exit_scope();
    }
}

/// Static type of an initializer expression, when it is obvious.
fn initializer_type(expr: &Expr) -> Option<crate::types::CompactString> {
    match expr {
        Expr::New { type_ref, .. } => Some(compact_string(&type_ref.name)),
        Expr::Cast { type_ref, .. } => Some(compact_string(&type_ref.name)),
        Expr::Literal { kind, .. } => Some(compact_string(&format!("{kind:?}"))),
        _ => None,
    }
}
