//! Apex front end: lexer, parse tree, and the error-tolerant parser.
//!
//! The rest of the crate consumes this module through [`parse_source`] and
//! the [`ast::ParseTreeListener`] walker interface; nothing downstream
//! touches tokens.

pub mod ast;
pub mod grammar;
pub mod lexer;

pub use ast::{
    Accessor, AccessorKind, Annotation, Block, CatchClause, CompilationUnit, Expr, FieldDecl,
    LocalDecl, Member, MethodDecl, Param, ParseTreeListener, PropertyDecl, Stmt, TypeDecl,
    TypeDeclKind, TypeRef, VarDeclarator, walk_unit,
};
pub use grammar::SyntaxError;
pub use lexer::{Keyword, LineIndex, Token, TokenKind, tokenize};

use crate::types::Range;

pub struct ParseOutcome {
    pub unit: CompilationUnit,
    pub errors: Vec<SyntaxError>,
    pub comments: Vec<Range>,
    pub token_count: usize,
    pub source_span: Range,
}

/// Lex and parse one source buffer. Never fails; malformed input yields a
/// partial tree plus errors.
pub fn parse_source(source: &str) -> ParseOutcome {
    let lexed = lexer::tokenize(source);
    let mut errors: Vec<SyntaxError> = lexed
        .errors
        .iter()
        .map(|e| SyntaxError {
            message: format!("unexpected character '{}'", e.text),
            range: e.range,
        })
        .collect();

    let (unit, parse_errors) = grammar::Parser::new(&lexed.tokens, lexed.source_span).parse();
    errors.extend(parse_errors);

    ParseOutcome {
        unit,
        errors,
        comments: lexed.comments,
        token_count: lexed.token_count,
        source_span: lexed.source_span,
    }
}
