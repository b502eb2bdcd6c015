//! Typed Apex parse tree and the enter/exit walker the listeners consume.
//!
//! The tree is deliberately lossy about anything the indexing core does
//! not need (no operator precedence beyond what reference capture wants,
//! no expression types). Positions on every node use 1-based lines and
//! 0-based columns.

use crate::reference::LiteralType;
use crate::types::{ModifierFlags, Modifiers, Range, Visibility};

#[derive(Debug, Clone)]
pub struct Annotation {
    pub name: String,
    pub range: Range,
}

/// A possibly-dotted, possibly-generic type name as written in source.
#[derive(Debug, Clone)]
pub struct TypeRef {
    /// Full dotted name, e.g. `System.Url`.
    pub name: String,
    /// One entry per dotted segment with its own span.
    pub segments: Vec<(String, Range)>,
    pub generics: Vec<TypeRef>,
    pub is_array: bool,
    pub range: Range,
}

impl TypeRef {
    pub fn is_chained(&self) -> bool {
        self.segments.len() > 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeDeclKind {
    Class,
    Interface,
    Enum,
    Trigger,
}

#[derive(Debug)]
pub struct CompilationUnit {
    pub type_decl: Option<TypeDecl>,
    /// Statement soup with no surrounding type: anonymous Apex.
    pub anonymous_block: Option<Block>,
    pub span: Range,
}

#[derive(Debug)]
pub struct TypeDecl {
    pub kind: TypeDeclKind,
    pub name: String,
    pub name_range: Range,
    pub range: Range,
    pub modifiers: Modifiers,
    pub annotations: Vec<Annotation>,
    pub super_class: Option<TypeRef>,
    pub interfaces: Vec<TypeRef>,
    pub members: Vec<Member>,
    pub enum_values: Vec<(String, Range)>,
    /// Trigger bodies are bare statement blocks.
    pub trigger_block: Option<Block>,
}

#[derive(Debug)]
pub enum Member {
    Field(FieldDecl),
    Method(MethodDecl),
    Property(PropertyDecl),
    Inner(TypeDecl),
    /// Static or instance initializer block.
    Initializer(Block),
}

#[derive(Debug)]
pub struct VarDeclarator {
    pub name: String,
    pub name_range: Range,
    pub init: Option<Expr>,
}

#[derive(Debug)]
pub struct FieldDecl {
    pub modifiers: Modifiers,
    pub annotations: Vec<Annotation>,
    pub type_ref: TypeRef,
    pub declarators: Vec<VarDeclarator>,
    pub range: Range,
}

#[derive(Debug)]
pub struct Param {
    pub type_ref: TypeRef,
    pub name: String,
    pub name_range: Range,
}

#[derive(Debug)]
pub struct MethodDecl {
    pub modifiers: Modifiers,
    pub annotations: Vec<Annotation>,
    /// None for constructors.
    pub return_type: Option<TypeRef>,
    pub is_constructor: bool,
    pub name: String,
    pub name_range: Range,
    pub params: Vec<Param>,
    pub body: Option<Block>,
    pub range: Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorKind {
    Get,
    Set,
}

#[derive(Debug)]
pub struct Accessor {
    pub kind: AccessorKind,
    pub body: Option<Block>,
    pub range: Range,
}

#[derive(Debug)]
pub struct PropertyDecl {
    pub modifiers: Modifiers,
    pub annotations: Vec<Annotation>,
    pub type_ref: TypeRef,
    pub name: String,
    pub name_range: Range,
    pub accessors: Vec<Accessor>,
    pub range: Range,
}

#[derive(Debug)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub range: Range,
}

#[derive(Debug)]
pub struct LocalDecl {
    pub modifiers: Modifiers,
    pub type_ref: TypeRef,
    pub declarators: Vec<VarDeclarator>,
    pub range: Range,
}

#[derive(Debug)]
pub struct CatchClause {
    pub param: Param,
    pub block: Block,
    pub range: Range,
}

#[derive(Debug)]
pub enum Stmt {
    Local(LocalDecl),
    Expr(Expr),
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        range: Range,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
        range: Range,
    },
    DoWhile {
        body: Box<Stmt>,
        condition: Expr,
        range: Range,
    },
    For {
        init: Option<Box<Stmt>>,
        condition: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
        range: Range,
    },
    Try {
        block: Block,
        catches: Vec<CatchClause>,
        finally_block: Option<Block>,
        range: Range,
    },
    RunAs {
        user: Expr,
        block: Block,
        range: Range,
    },
    Return {
        expr: Option<Expr>,
        range: Range,
    },
    Throw {
        expr: Expr,
        range: Range,
    },
    Break(Range),
    Continue(Range),
    Block(Block),
}

impl Stmt {
    pub fn range(&self) -> Range {
        match self {
            Self::Local(decl) => decl.range,
            Self::Expr(expr) => expr.range(),
            Self::If { range, .. }
            | Self::While { range, .. }
            | Self::DoWhile { range, .. }
            | Self::For { range, .. }
            | Self::Try { range, .. }
            | Self::RunAs { range, .. }
            | Self::Return { range, .. }
            | Self::Throw { range, .. } => *range,
            Self::Break(range) | Self::Continue(range) => *range,
            Self::Block(block) => block.range,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Arithmetic,
    Comparison,
    Logical,
    Bitwise,
    Coalesce,
}

#[derive(Debug)]
pub enum Expr {
    Identifier {
        name: String,
        range: Range,
    },
    Literal {
        kind: LiteralType,
        text: String,
        range: Range,
    },
    Assign {
        target: Box<Expr>,
        /// True for `+=`-style compound assignment.
        compound: bool,
        value: Box<Expr>,
        range: Range,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
        range: Range,
    },
    Unary {
        expr: Box<Expr>,
        /// `++`/`--` mutate their operand.
        mutating: bool,
        range: Range,
    },
    Call {
        /// Identifier or FieldAccess naming the method.
        callee: Box<Expr>,
        args: Vec<Expr>,
        range: Range,
    },
    FieldAccess {
        object: Box<Expr>,
        name: String,
        name_range: Range,
        range: Range,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        range: Range,
    },
    New {
        type_ref: TypeRef,
        args: Vec<Expr>,
        range: Range,
    },
    Cast {
        type_ref: TypeRef,
        expr: Box<Expr>,
        range: Range,
    },
    InstanceOf {
        expr: Box<Expr>,
        type_ref: TypeRef,
        range: Range,
    },
    Ternary {
        condition: Box<Expr>,
        then_value: Box<Expr>,
        else_value: Box<Expr>,
        range: Range,
    },
    This(Range),
    Super(Range),
}

impl Expr {
    pub fn range(&self) -> Range {
        match self {
            Self::Identifier { range, .. }
            | Self::Literal { range, .. }
            | Self::Assign { range, .. }
            | Self::Binary { range, .. }
            | Self::Unary { range, .. }
            | Self::Call { range, .. }
            | Self::FieldAccess { range, .. }
            | Self::Index { range, .. }
            | Self::New { range, .. }
            | Self::Cast { range, .. }
            | Self::InstanceOf { range, .. }
            | Self::Ternary { range, .. } => *range,
            Self::This(range) | Self::Super(range) => *range,
        }
    }
}

/// Enter/exit callbacks over the parse tree. Default bodies are no-ops so
/// a listener only implements what it needs.
#[allow(unused_variables)]
pub trait ParseTreeListener {
    fn enter_compilation_unit(&mut self, unit: &CompilationUnit) {}
    fn exit_compilation_unit(&mut self, unit: &CompilationUnit) {}
    fn enter_type(&mut self, decl: &TypeDecl) {}
    fn exit_type(&mut self, decl: &TypeDecl) {}
    fn visit_field(&mut self, field: &FieldDecl, owner: &TypeDecl) {}
    fn visit_enum_value(&mut self, name: &str, range: Range, owner: &TypeDecl) {}
    fn enter_method(&mut self, method: &MethodDecl, owner: &TypeDecl) {}
    fn exit_method(&mut self, method: &MethodDecl, owner: &TypeDecl) {}
    fn enter_property(&mut self, property: &PropertyDecl, owner: &TypeDecl) {}
    fn exit_property(&mut self, property: &PropertyDecl, owner: &TypeDecl) {}
    fn enter_accessor(&mut self, accessor: &Accessor, property: &PropertyDecl) {}
    fn exit_accessor(&mut self, accessor: &Accessor, property: &PropertyDecl) {}
    fn enter_initializer(&mut self, block: &Block, owner: &TypeDecl) {}
    fn exit_initializer(&mut self, block: &Block, owner: &TypeDecl) {}
    fn enter_statement(&mut self, stmt: &Stmt) {}
    fn exit_statement(&mut self, stmt: &Stmt) {}
    fn enter_catch(&mut self, clause: &CatchClause) {}
    fn exit_catch(&mut self, clause: &CatchClause) {}
    fn enter_finally(&mut self, block: &Block) {}
    fn exit_finally(&mut self, block: &Block) {}
    fn enter_block(&mut self, block: &Block) {}
    fn exit_block(&mut self, block: &Block) {}

    /// Whether method/accessor/initializer bodies should be walked at all.
    /// Listeners below the full detail level skip them.
    fn descend_into_bodies(&self) -> bool {
        true
    }
}

/// Drive a listener over a compilation unit.
pub fn walk_unit(listener: &mut dyn ParseTreeListener, unit: &CompilationUnit) {
    listener.enter_compilation_unit(unit);
    if let Some(decl) = &unit.type_decl {
        walk_type(listener, decl);
    }
    if let Some(block) = &unit.anonymous_block {
        if listener.descend_into_bodies() {
            walk_block(listener, block);
        }
    }
    listener.exit_compilation_unit(unit);
}

fn walk_type(listener: &mut dyn ParseTreeListener, decl: &TypeDecl) {
    listener.enter_type(decl);
    for (name, range) in &decl.enum_values {
        listener.visit_enum_value(name, *range, decl);
    }
    for member in &decl.members {
        match member {
            Member::Field(field) => listener.visit_field(field, decl),
            Member::Method(method) => {
                listener.enter_method(method, decl);
                if let Some(body) = &method.body {
                    if listener.descend_into_bodies() {
                        walk_block(listener, body);
                    }
                }
                listener.exit_method(method, decl);
            }
            Member::Property(property) => {
                listener.enter_property(property, decl);
                for accessor in &property.accessors {
                    listener.enter_accessor(accessor, property);
                    if let Some(body) = &accessor.body {
                        if listener.descend_into_bodies() {
                            walk_block(listener, body);
                        }
                    }
                    listener.exit_accessor(accessor, property);
                }
                listener.exit_property(property, decl);
            }
            Member::Inner(inner) => walk_type(listener, inner),
            Member::Initializer(block) => {
                listener.enter_initializer(block, decl);
                if listener.descend_into_bodies() {
                    walk_block(listener, block);
                }
                listener.exit_initializer(block, decl);
            }
        }
    }
    if let Some(block) = &decl.trigger_block {
        if listener.descend_into_bodies() {
            walk_block(listener, block);
        }
    }
    listener.exit_type(decl);
}

fn walk_block(listener: &mut dyn ParseTreeListener, block: &Block) {
    listener.enter_block(block);
    for stmt in &block.statements {
        walk_stmt(listener, stmt);
    }
    listener.exit_block(block);
}

fn walk_stmt(listener: &mut dyn ParseTreeListener, stmt: &Stmt) {
    listener.enter_statement(stmt);
    match stmt {
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => {
            walk_stmt(listener, then_branch);
            if let Some(else_branch) = else_branch {
                walk_stmt(listener, else_branch);
            }
        }
        Stmt::While { body, .. } | Stmt::DoWhile { body, .. } => walk_stmt(listener, body),
        Stmt::For { init, body, .. } => {
            if let Some(init) = init {
                walk_stmt(listener, init);
            }
            walk_stmt(listener, body);
        }
        Stmt::Try {
            block,
            catches,
            finally_block,
            ..
        } => {
            walk_block(listener, block);
            for catch in catches {
                listener.enter_catch(catch);
                walk_block(listener, &catch.block);
                listener.exit_catch(catch);
            }
            if let Some(finally_block) = finally_block {
                listener.enter_finally(finally_block);
                walk_block(listener, finally_block);
                listener.exit_finally(finally_block);
            }
        }
        Stmt::RunAs { block, .. } => walk_block(listener, block),
        Stmt::Block(block) => walk_block(listener, block),
        Stmt::Local(_)
        | Stmt::Expr(_)
        | Stmt::Return { .. }
        | Stmt::Throw { .. }
        | Stmt::Break(_)
        | Stmt::Continue(_) => {}
    }
    listener.exit_statement(stmt);
}

/// Build [`Modifiers`] from keyword occurrences, reporting the visibility
/// separately from the boolean flags.
pub fn modifiers_from_parts(visibility: Option<Visibility>, flags: ModifierFlags) -> Modifiers {
    Modifiers::with_flags(visibility.unwrap_or_default(), flags)
}
