//! Typed reference edges from use-sites to (eventually) symbols.
//!
//! A reference starts life unresolved; the symbol graph links it to a
//! target id once one exists. Chained accesses (`a.b.c()`) carry their
//! per-segment nodes so position queries can hit any link of the chain.

use crate::types::{CompactString, Range, case_fold, compact_string};
use serde::{Deserialize, Serialize};

/// Longest dotted chain we keep per reference. Degenerate names beyond
/// this are truncated at capture time.
pub const MAX_CHAIN_NODES: usize = 8;

/// What a use-site means, syntactically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceContext {
    TypeDeclaration,
    ParameterType,
    ReturnType,
    VariableDeclaration,
    VariableUsage,
    MethodCall,
    ConstructorCall,
    FieldAccess,
    ClassReference,
    ChainedType,
    ChainStep,
    GenericParameterType,
    CastTypeReference,
    InstanceofTypeReference,
    Literal,
}

impl ReferenceContext {
    /// Contexts that name a type and therefore participate in cross-file
    /// type resolution.
    pub fn is_type_usage(&self) -> bool {
        matches!(
            self,
            Self::TypeDeclaration
                | Self::ParameterType
                | Self::ReturnType
                | Self::VariableDeclaration
                | Self::ClassReference
                | Self::ChainedType
                | Self::GenericParameterType
                | Self::CastTypeReference
                | Self::InstanceofTypeReference
                | Self::ConstructorCall
        )
    }
}

/// Read/write classification for variable and field accesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessKind {
    Read,
    Write,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum LiteralType {
    Integer,
    Long,
    Decimal,
    String,
    Boolean,
    Null,
}

/// One segment of a dotted reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainNode {
    pub name: CompactString,
    pub location: Range,
    pub context: ReferenceContext,
}

impl ChainNode {
    pub fn new(name: &str, location: Range, context: ReferenceContext) -> Self {
        Self {
            name: compact_string(name),
            location,
            context,
        }
    }
}

/// An edge from a use-site to a symbol, resolved lazily.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeReference {
    pub name: CompactString,
    pub location: Range,
    pub context: ReferenceContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<AccessKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<CompactString>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qualifier_location: Option<Range>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_location: Option<Range>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chain_nodes: Vec<ChainNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_symbol_id: Option<String>,
    /// Enclosing method or constructor name, kept for debugging output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_context: Option<CompactString>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub literal_type: Option<LiteralType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub literal_value: Option<CompactString>,
}

impl TypeReference {
    pub fn new(name: &str, location: Range, context: ReferenceContext) -> Self {
        Self {
            name: compact_string(name),
            location,
            context,
            access: None,
            qualifier: None,
            qualifier_location: None,
            member_location: None,
            chain_nodes: Vec::new(),
            resolved_symbol_id: None,
            parent_context: None,
            literal_type: None,
            literal_value: None,
        }
    }

    pub fn with_access(mut self, access: AccessKind) -> Self {
        self.access = Some(access);
        self
    }

    pub fn with_qualifier(mut self, qualifier: &str, location: Range) -> Self {
        self.qualifier = Some(compact_string(qualifier));
        self.qualifier_location = Some(location);
        self
    }

    pub fn with_member_location(mut self, location: Range) -> Self {
        self.member_location = Some(location);
        self
    }

    pub fn with_parent_context(mut self, parent: &str) -> Self {
        self.parent_context = Some(compact_string(parent));
        self
    }

    /// Attach chain nodes, truncating past [`MAX_CHAIN_NODES`].
    pub fn with_chain(mut self, mut nodes: Vec<ChainNode>) -> Self {
        if nodes.len() > MAX_CHAIN_NODES {
            tracing::debug!(
                name = &*self.name,
                dropped = nodes.len() - MAX_CHAIN_NODES,
                "truncating reference chain"
            );
            nodes.truncate(MAX_CHAIN_NODES);
        }
        self.chain_nodes = nodes;
        self
    }

    pub fn literal(
        literal_type: LiteralType,
        value: &str,
        location: Range,
    ) -> Self {
        let mut reference = Self::new(value, location, ReferenceContext::Literal);
        reference.literal_type = Some(literal_type);
        reference.literal_value = Some(compact_string(value));
        reference
    }

    /// True when any of the reference's spans covers `pos`: the identifier
    /// itself, the qualifier, the member, or any chain node.
    pub fn covers(&self, pos: crate::types::Position) -> bool {
        if self.location.contains(pos) {
            return true;
        }
        if self.qualifier_location.is_some_and(|r| r.contains(pos)) {
            return true;
        }
        if self.member_location.is_some_and(|r| r.contains(pos)) {
            return true;
        }
        self.chain_nodes.iter().any(|n| n.location.contains(pos))
    }
}

/// Names that can never resolve to a symbol: bracketed expressions, deep
/// dotted chains (more than two dots), or a trailing dot from a parse in
/// progress. Checked before any expensive lookup.
pub fn is_resolvable_name(name: &str) -> bool {
    if name.is_empty() || name.contains('[') || name.ends_with('.') {
        return false;
    }
    name.matches('.').count() <= 2
}

const BUILTIN_TYPES: &[&str] = &[
    "string", "list", "map", "integer", "long", "decimal", "boolean", "id", "blob", "date",
    "datetime", "time", "object", "void", "set", "sobject",
];

/// Builtin Apex types are considered resolved without a graph entry.
/// `System.<builtin>` counts too.
pub fn is_builtin_type(name: &str) -> bool {
    let folded = case_fold(name);
    let bare = folded.strip_prefix("system.").unwrap_or(&folded);
    BUILTIN_TYPES.contains(&bare)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Position;

    #[test]
    fn chain_is_bounded() {
        let nodes: Vec<ChainNode> = (0..12)
            .map(|i| {
                ChainNode::new(
                    &format!("seg{i}"),
                    Range::at(1, i, 1, i + 3),
                    ReferenceContext::ChainStep,
                )
            })
            .collect();
        let reference = TypeReference::new("a.b", Range::at(1, 0, 1, 40), ReferenceContext::ChainedType)
            .with_chain(nodes);
        assert_eq!(reference.chain_nodes.len(), MAX_CHAIN_NODES);
    }

    #[test]
    fn covers_checks_all_spans() {
        let reference = TypeReference::new("x", Range::at(2, 4, 2, 5), ReferenceContext::FieldAccess)
            .with_qualifier("obj", Range::at(2, 0, 2, 3))
            .with_member_location(Range::at(2, 4, 2, 5));

        assert!(reference.covers(Position::new(2, 1))); // qualifier
        assert!(reference.covers(Position::new(2, 4))); // member
        assert!(!reference.covers(Position::new(3, 0)));
    }

    #[test]
    fn name_validation_rejects_noise() {
        assert!(is_resolvable_name("Account"));
        assert!(is_resolvable_name("System.Url"));
        assert!(is_resolvable_name("a.b.c"));
        assert!(!is_resolvable_name("a.b.c.d"));
        assert!(!is_resolvable_name("arr[0]"));
        assert!(!is_resolvable_name("Account."));
        assert!(!is_resolvable_name(""));
    }

    #[test]
    fn builtins_cover_system_namespace() {
        assert!(is_builtin_type("String"));
        assert!(is_builtin_type("SOBJECT"));
        assert!(is_builtin_type("System.String"));
        assert!(!is_builtin_type("Account"));
        assert!(!is_builtin_type("System.Url"));
    }
}
