//! Reference classification: turning expressions and type annotations into
//! typed reference edges on the symbol table.
//!
//! Access-kind rules:
//! - `a = b`    → one write on `a`, one read on `b`
//! - `a += b`   → one readwrite on `a`, one read on `b`
//! - `obj.x = y` → `obj` read, `x` field-access write, `y` read
//! - `arr[i] = v` → `arr`, `i` and `v` all read

use crate::parser::{Expr, TypeRef};
use crate::reference::{
    AccessKind, ChainNode, ReferenceContext, TypeReference, MAX_CHAIN_NODES,
};
use crate::table::SymbolTable;
use crate::types::{Range, case_fold};

/// Capture a type annotation as a reference. Multi-segment names become a
/// single CHAINED_TYPE carrying the segment list; generic arguments recurse
/// as GENERIC_PARAMETER_TYPE.
pub fn collect_type_ref(
    table: &mut SymbolTable,
    type_ref: &TypeRef,
    context: ReferenceContext,
    parent: Option<&str>,
) {
    let mut reference = if type_ref.is_chained() {
        let nodes: Vec<ChainNode> = type_ref
            .segments
            .iter()
            .take(MAX_CHAIN_NODES)
            .map(|(name, range)| ChainNode::new(name, *range, ReferenceContext::ChainStep))
            .collect();
        TypeReference::new(&type_ref.name, type_ref.range, ReferenceContext::ChainedType)
            .with_chain(nodes)
    } else {
        TypeReference::new(&type_ref.name, type_ref.segments[0].1, context)
    };
    if let Some(parent) = parent {
        reference = reference.with_parent_context(parent);
    }
    if type_ref.is_chained() {
        table.add_hierarchical_reference(reference);
    } else {
        table.add_type_reference(reference);
    }

    for generic in &type_ref.generics {
        collect_type_ref(table, generic, ReferenceContext::GenericParameterType, parent);
    }
}

/// Capture every reference in an expression read in value position.
pub fn collect_expr(table: &mut SymbolTable, expr: &Expr, parent: Option<&str>) {
    collect_with_access(table, expr, AccessKind::Read, parent);
}

fn collect_with_access(
    table: &mut SymbolTable,
    expr: &Expr,
    access: AccessKind,
    parent: Option<&str>,
) {
    match expr {
        Expr::Identifier { name, range } => {
            push(
                table,
                TypeReference::new(name, *range, ReferenceContext::VariableUsage)
                    .with_access(access),
                parent,
            );
        }
        Expr::Literal { kind, text, range } => {
            push(table, TypeReference::literal(*kind, text, *range), parent);
        }
        Expr::Assign {
            target,
            compound,
            value,
            ..
        } => {
            let target_access = if *compound {
                AccessKind::ReadWrite
            } else {
                AccessKind::Write
            };
            collect_assign_target(table, target, target_access, parent);
            collect_with_access(table, value, AccessKind::Read, parent);
        }
        Expr::Binary { left, right, .. } => {
            collect_with_access(table, left, AccessKind::Read, parent);
            collect_with_access(table, right, AccessKind::Read, parent);
        }
        Expr::Unary { expr, mutating, .. } => {
            let access = if *mutating {
                AccessKind::ReadWrite
            } else {
                AccessKind::Read
            };
            collect_with_access(table, expr, access, parent);
        }
        Expr::Call { callee, args, .. } => {
            collect_call(table, callee, parent);
            for arg in args {
                collect_with_access(table, arg, AccessKind::Read, parent);
            }
        }
        Expr::FieldAccess {
            object,
            name,
            name_range,
            ..
        } => {
            collect_member_access(table, object, name, *name_range, access, parent);
        }
        Expr::Index { object, index, .. } => {
            collect_with_access(table, object, AccessKind::Read, parent);
            collect_with_access(table, index, AccessKind::Read, parent);
        }
        Expr::New { type_ref, args, .. } => {
            collect_type_ref(table, type_ref, ReferenceContext::ConstructorCall, parent);
            for arg in args {
                collect_with_access(table, arg, AccessKind::Read, parent);
            }
        }
        Expr::Cast { type_ref, expr, .. } => {
            collect_type_ref(table, type_ref, ReferenceContext::CastTypeReference, parent);
            collect_with_access(table, expr, AccessKind::Read, parent);
        }
        Expr::InstanceOf { expr, type_ref, .. } => {
            collect_with_access(table, expr, AccessKind::Read, parent);
            collect_type_ref(
                table,
                type_ref,
                ReferenceContext::InstanceofTypeReference,
                parent,
            );
        }
        Expr::Ternary {
            condition,
            then_value,
            else_value,
            ..
        } => {
            collect_with_access(table, condition, AccessKind::Read, parent);
            collect_with_access(table, then_value, AccessKind::Read, parent);
            collect_with_access(table, else_value, AccessKind::Read, parent);
        }
        Expr::This(_) | Expr::Super(_) => {}
    }
}

/// Left-hand side of an assignment.
fn collect_assign_target(
    table: &mut SymbolTable,
    target: &Expr,
    access: AccessKind,
    parent: Option<&str>,
) {
    match target {
        Expr::Identifier { name, range } => {
            push(
                table,
                TypeReference::new(name, *range, ReferenceContext::VariableUsage)
                    .with_access(access),
                parent,
            );
        }
        Expr::FieldAccess {
            object,
            name,
            name_range,
            ..
        } => {
            collect_member_access(table, object, name, *name_range, access, parent);
        }
        // `arr[i] = v`: the container and the index are both reads.
        Expr::Index { object, index, .. } => {
            collect_with_access(table, object, AccessKind::Read, parent);
            collect_with_access(table, index, AccessKind::Read, parent);
        }
        other => collect_with_access(table, other, AccessKind::Read, parent),
    }
}

/// Dotted member access, in read or write position.
fn collect_member_access(
    table: &mut SymbolTable,
    object: &Expr,
    name: &str,
    name_range: Range,
    access: AccessKind,
    parent: Option<&str>,
) {
    collect_with_access(table, object, AccessKind::Read, parent);

    let mut reference = TypeReference::new(name, name_range, ReferenceContext::FieldAccess)
        .with_access(access)
        .with_member_location(name_range);
    if let Some((qualifier, range)) = simple_qualifier(object) {
        reference = reference.with_qualifier(&qualifier, range);
    }
    if let Some(nodes) = chain_of(object, name, name_range) {
        reference = reference.with_chain(nodes);
    }
    if reference.qualifier.is_some() || !reference.chain_nodes.is_empty() {
        push_hierarchical(table, reference, parent);
    } else {
        // Computed receiver (`foo().x`): a plain field access.
        push(table, reference, parent);
    }
}

/// A method call target; the callee is an identifier or a dotted chain.
fn collect_call(table: &mut SymbolTable, callee: &Expr, parent: Option<&str>) {
    match callee {
        Expr::Identifier { name, range } => {
            push(
                table,
                TypeReference::new(name, *range, ReferenceContext::MethodCall),
                parent,
            );
        }
        Expr::FieldAccess {
            object,
            name,
            name_range,
            ..
        } => {
            // The qualifier chain is read; `Cls` qualifiers get rewritten
            // to CLASS_REFERENCE by the correction pass when the type is
            // known locally.
            collect_with_access(table, object, AccessKind::Read, parent);

            let mut reference = TypeReference::new(name, *name_range, ReferenceContext::MethodCall)
                .with_member_location(*name_range);
            if let Some((qualifier, range)) = simple_qualifier(object) {
                reference = reference.with_qualifier(&qualifier, range);
            }
            if let Some(nodes) = chain_of(object, name, *name_range) {
                reference = reference.with_chain(nodes);
            }
            if reference.qualifier.is_some() || !reference.chain_nodes.is_empty() {
                push_hierarchical(table, reference, parent);
            } else {
                push(table, reference, parent);
            }
        }
        other => collect_with_access(table, other, AccessKind::Read, parent),
    }
}

fn push(table: &mut SymbolTable, mut reference: TypeReference, parent: Option<&str>) {
    if let Some(parent) = parent {
        reference = reference.with_parent_context(parent);
    }
    table.add_type_reference(reference);
}

fn push_hierarchical(table: &mut SymbolTable, mut reference: TypeReference, parent: Option<&str>) {
    if let Some(parent) = parent {
        reference = reference.with_parent_context(parent);
    }
    table.add_hierarchical_reference(reference);
}

/// The qualifier when the object is a bare identifier (`obj.x`, `Cls.m()`).
fn simple_qualifier(object: &Expr) -> Option<(String, Range)> {
    match object {
        Expr::Identifier { name, range } => Some((name.clone(), *range)),
        _ => None,
    }
}

/// Flatten `a.b.c` + the member into chain nodes; None when the chain is
/// shorter than three segments or contains non-name links.
fn chain_of(object: &Expr, member: &str, member_range: Range) -> Option<Vec<ChainNode>> {
    let mut nodes = Vec::new();
    flatten_chain(object, &mut nodes)?;
    if nodes.len() < 2 {
        return None;
    }
    nodes.push(ChainNode::new(
        member,
        member_range,
        ReferenceContext::ChainStep,
    ));
    Some(nodes)
}

fn flatten_chain(expr: &Expr, out: &mut Vec<ChainNode>) -> Option<()> {
    match expr {
        Expr::Identifier { name, range } => {
            out.push(ChainNode::new(name, *range, ReferenceContext::ChainStep));
            Some(())
        }
        Expr::FieldAccess {
            object,
            name,
            name_range,
            ..
        } => {
            flatten_chain(object, out)?;
            out.push(ChainNode::new(name, *name_range, ReferenceContext::ChainStep));
            Some(())
        }
        _ => None,
    }
}

/// Second pass: rewrite VARIABLE_USAGE qualifiers to CLASS_REFERENCE when
/// the qualifier names a type declared in the same file. Cross-file types
/// stay VARIABLE_USAGE until graph resolution can see them.
pub fn correct_class_references(table: &mut SymbolTable) {
    let type_names: std::collections::HashSet<String> = table
        .symbols()
        .iter()
        .filter(|s| s.kind.is_type())
        .map(|s| case_fold(&s.name))
        .collect();
    if type_names.is_empty() {
        return;
    }

    // Qualifier sites whose name is a locally known type.
    let targets: Vec<(Range, String)> = table
        .references()
        .iter()
        .filter(|r| {
            matches!(
                r.context,
                ReferenceContext::MethodCall | ReferenceContext::FieldAccess
            )
        })
        .filter_map(|r| {
            let qualifier = r.qualifier.as_deref()?;
            let location = r.qualifier_location?;
            type_names
                .contains(&case_fold(qualifier))
                .then(|| (location, case_fold(qualifier)))
        })
        .collect();
    if targets.is_empty() {
        return;
    }

    for reference in table.references_mut() {
        if reference.context != ReferenceContext::VariableUsage {
            continue;
        }
        if targets
            .iter()
            .any(|(range, name)| *range == reference.location && *name == case_fold(&reference.name))
        {
            reference.context = ReferenceContext::ClassReference;
            reference.access = None;
        }
    }
}
