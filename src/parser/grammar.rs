//! Error-tolerant recursive-descent parser for the Apex subset the
//! indexing core consumes.
//!
//! The parser never fails: malformed input produces the best tree it can
//! plus a list of syntax errors. Blocks whose closing brace is missing
//! close at end of input so scope symbols still exist for completion.

use super::ast::*;
use super::lexer::{Keyword, Token, TokenKind};
use crate::reference::LiteralType;
use crate::types::{ModifierFlags, Position, Range, Visibility, case_fold};

/// Recursion guard for statements and expressions. Deeply nested input
/// past this point is reported instead of overflowing the stack.
const MAX_NESTING_DEPTH: usize = 200;

#[derive(Debug, Clone)]
pub struct SyntaxError {
    pub message: String,
    pub range: Range,
}

pub struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    errors: Vec<SyntaxError>,
    span: Range,
}

struct ModifierParts {
    visibility: Option<Visibility>,
    flags: ModifierFlags,
    annotations: Vec<Annotation>,
    /// Span of the first modifier/annotation, to anchor declarations.
    start: Option<Position>,
}

impl<'t> Parser<'t> {
    pub fn new(tokens: &'t [Token], span: Range) -> Self {
        Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
            span,
        }
    }

    pub fn parse(mut self) -> (CompilationUnit, Vec<SyntaxError>) {
        let mods = self.parse_modifiers();
        let unit = match self.peek_keyword() {
            Some(Keyword::Class) | Some(Keyword::Interface) | Some(Keyword::Enum) => {
                let decl = self.parse_type_decl(mods);
                CompilationUnit {
                    type_decl: decl,
                    anonymous_block: None,
                    span: self.span,
                }
            }
            Some(Keyword::Trigger) => {
                let decl = self.parse_trigger(mods);
                CompilationUnit {
                    type_decl: decl,
                    anonymous_block: None,
                    span: self.span,
                }
            }
            _ => {
                // No type declaration: anonymous Apex, a bare statement list.
                let block = self.parse_statement_list_until_eof();
                CompilationUnit {
                    type_decl: None,
                    anonymous_block: Some(block),
                    span: self.span,
                }
            }
        };
        (unit, self.errors)
    }

    // ---- tokens ---------------------------------------------------------

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn peek_keyword(&self) -> Option<Keyword> {
        self.peek().and_then(Token::keyword)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek().is_some_and(|t| t.kind == kind)
    }

    fn at_keyword(&self, kw: Keyword) -> bool {
        self.peek().is_some_and(|t| t.is_keyword(kw))
    }

    fn eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.at(kind) { self.advance() } else { None }
    }

    fn eat_keyword(&mut self, kw: Keyword) -> Option<Token> {
        if self.at_keyword(kw) {
            self.advance()
        } else {
            None
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Option<Token> {
        if let Some(token) = self.eat(kind) {
            return Some(token);
        }
        self.error_here(&format!("expected {what}"));
        None
    }

    fn here(&self) -> Range {
        self.peek()
            .map(|t| t.range)
            .unwrap_or(Range::new(self.span.end, self.span.end))
    }

    fn error_here(&mut self, message: &str) {
        let range = self.here();
        self.errors.push(SyntaxError {
            message: message.to_string(),
            range,
        });
    }

    fn last_range(&self) -> Range {
        if self.pos == 0 {
            self.span
        } else {
            self.tokens[self.pos - 1].range
        }
    }

    /// Skip forward to a statement boundary after an error.
    fn synchronize(&mut self) {
        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::Semicolon => {
                    self.advance();
                    return;
                }
                TokenKind::RBrace => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ---- modifiers ------------------------------------------------------

    fn parse_modifiers(&mut self) -> ModifierParts {
        let mut parts = ModifierParts {
            visibility: None,
            flags: ModifierFlags::empty(),
            annotations: Vec::new(),
            start: None,
        };
        loop {
            if self.at(TokenKind::At) {
                let at = self.advance().unwrap();
                parts.start.get_or_insert(at.range.start);
                if let Some(name) = self.eat(TokenKind::Identifier) {
                    // Annotation arguments are irrelevant to indexing.
                    if self.at(TokenKind::LParen) {
                        self.skip_balanced(TokenKind::LParen, TokenKind::RParen);
                    }
                    parts.annotations.push(Annotation {
                        name: name.text.clone(),
                        range: Range::new(at.range.start, name.range.end),
                    });
                } else {
                    self.error_here("expected annotation name after '@'");
                }
                continue;
            }
            let Some(kw) = self.peek_keyword() else { break };
            let flag = match kw {
                Keyword::Public => {
                    parts.visibility = Some(Visibility::Public);
                    None
                }
                Keyword::Private => {
                    parts.visibility = Some(Visibility::Private);
                    None
                }
                Keyword::Protected => {
                    parts.visibility = Some(Visibility::Protected);
                    None
                }
                Keyword::Global => {
                    parts.visibility = Some(Visibility::Global);
                    None
                }
                Keyword::Static => Some(ModifierFlags::STATIC),
                Keyword::Final => Some(ModifierFlags::FINAL),
                Keyword::Abstract => Some(ModifierFlags::ABSTRACT),
                Keyword::Virtual => Some(ModifierFlags::VIRTUAL),
                Keyword::Override => Some(ModifierFlags::OVERRIDE),
                Keyword::Transient => Some(ModifierFlags::TRANSIENT),
                Keyword::TestMethod => Some(ModifierFlags::TEST_METHOD),
                Keyword::WebService => Some(ModifierFlags::WEB_SERVICE),
                _ => break,
            };
            let token = self.advance().unwrap();
            parts.start.get_or_insert(token.range.start);
            if let Some(flag) = flag {
                parts.flags |= flag;
            }
        }
        parts
    }

    fn skip_balanced(&mut self, open: TokenKind, close: TokenKind) {
        debug_assert!(self.at(open));
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            if token.kind == open {
                depth += 1;
            } else if token.kind == close {
                depth -= 1;
                if depth == 0 {
                    self.advance();
                    return;
                }
            }
            self.advance();
        }
    }

    // ---- types ----------------------------------------------------------

    fn looks_like_type_start(&self) -> bool {
        match self.peek() {
            Some(token) if token.kind == TokenKind::Identifier => match token.keyword() {
                None | Some(Keyword::Void) | Some(Keyword::Get) | Some(Keyword::Set) => true,
                _ => false,
            },
            _ => false,
        }
    }

    fn parse_type_ref(&mut self) -> Option<TypeRef> {
        let first = if self.at_keyword(Keyword::Void) {
            self.advance().unwrap()
        } else if self.looks_like_type_start() {
            self.advance().unwrap()
        } else {
            return None;
        };

        let mut segments = vec![(first.text.clone(), first.range)];
        let mut end = first.range.end;
        while self.at(TokenKind::Dot) && self.peek_at(1).is_some_and(|t| t.kind == TokenKind::Identifier)
        {
            self.advance();
            let seg = self.advance().unwrap();
            end = seg.range.end;
            segments.push((seg.text.clone(), seg.range));
        }

        let mut generics = Vec::new();
        if self.at(TokenKind::Lt) {
            self.advance();
            loop {
                match self.parse_type_ref() {
                    Some(arg) => generics.push(arg),
                    None => {
                        self.error_here("expected type argument");
                        break;
                    }
                }
                if self.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
            if let Some(gt) = self.expect(TokenKind::Gt, "'>' to close type arguments") {
                end = gt.range.end;
            }
        }

        let mut is_array = false;
        if self.at(TokenKind::LBracket) && self.peek_at(1).is_some_and(|t| t.kind == TokenKind::RBracket)
        {
            self.advance();
            let rb = self.advance().unwrap();
            end = rb.range.end;
            is_array = true;
        }

        let name = segments
            .iter()
            .map(|(s, _)| s.as_str())
            .collect::<Vec<_>>()
            .join(".");
        Some(TypeRef {
            name,
            segments,
            generics,
            is_array,
            range: Range::new(first.range.start, end),
        })
    }

    // ---- declarations ---------------------------------------------------

    fn parse_type_decl(&mut self, mods: ModifierParts) -> Option<TypeDecl> {
        let kind = match self.peek_keyword() {
            Some(Keyword::Class) => TypeDeclKind::Class,
            Some(Keyword::Interface) => TypeDeclKind::Interface,
            Some(Keyword::Enum) => TypeDeclKind::Enum,
            _ => return None,
        };
        let kw = self.advance().unwrap();
        let start = mods.start.unwrap_or(kw.range.start);

        let Some(name) = self.eat(TokenKind::Identifier) else {
            self.error_here("expected type name");
            return None;
        };

        let mut super_class = None;
        let mut interfaces = Vec::new();
        loop {
            if self.eat_keyword(Keyword::Extends).is_some() {
                super_class = self.parse_type_ref();
                if super_class.is_none() {
                    self.error_here("expected superclass name after 'extends'");
                }
            } else if self.eat_keyword(Keyword::Implements).is_some() {
                loop {
                    match self.parse_type_ref() {
                        Some(t) => interfaces.push(t),
                        None => {
                            self.error_here("expected interface name after 'implements'");
                            break;
                        }
                    }
                    if self.eat(TokenKind::Comma).is_none() {
                        break;
                    }
                }
            } else {
                break;
            }
        }

        let mut decl = TypeDecl {
            kind,
            name: name.text.clone(),
            name_range: name.range,
            range: Range::new(start, name.range.end),
            modifiers: modifiers_from_parts(mods.visibility, mods.flags),
            annotations: mods.annotations,
            super_class,
            interfaces,
            members: Vec::new(),
            enum_values: Vec::new(),
            trigger_block: None,
        };

        if self.expect(TokenKind::LBrace, "'{' to open type body").is_none() {
            return Some(decl);
        }

        if kind == TypeDeclKind::Enum {
            self.parse_enum_values(&mut decl);
        } else {
            while !self.at(TokenKind::RBrace) && !self.eof() {
                self.parse_member(&mut decl);
            }
        }

        if self.eat(TokenKind::RBrace).is_none() {
            self.error_here("unexpected end of file, '}' expected");
        }
        decl.range = Range::new(start, self.last_range().end);
        Some(decl)
    }

    fn parse_enum_values(&mut self, decl: &mut TypeDecl) {
        while !self.at(TokenKind::RBrace) && !self.eof() {
            if let Some(value) = self.eat(TokenKind::Identifier) {
                decl.enum_values.push((value.text.clone(), value.range));
            } else {
                self.error_here("expected enum value name");
                self.advance();
            }
            self.eat(TokenKind::Comma);
        }
    }

    fn parse_trigger(&mut self, mods: ModifierParts) -> Option<TypeDecl> {
        let kw = self.advance().unwrap();
        let start = mods.start.unwrap_or(kw.range.start);
        let Some(name) = self.eat(TokenKind::Identifier) else {
            self.error_here("expected trigger name");
            return None;
        };

        let mut interfaces = Vec::new();
        if self.eat_keyword(Keyword::On).is_some() {
            // The target object reads like a type reference.
            if let Some(object) = self.parse_type_ref() {
                interfaces.push(object);
            } else {
                self.error_here("expected object name after 'on'");
            }
            if self.at(TokenKind::LParen) {
                self.skip_balanced(TokenKind::LParen, TokenKind::RParen);
            }
        }

        let block = if self.at(TokenKind::LBrace) {
            Some(self.parse_block(0))
        } else {
            self.error_here("'{' expected to open trigger body");
            None
        };

        Some(TypeDecl {
            kind: TypeDeclKind::Trigger,
            name: name.text.clone(),
            name_range: name.range,
            range: Range::new(start, self.last_range().end),
            modifiers: modifiers_from_parts(mods.visibility, mods.flags),
            annotations: mods.annotations,
            super_class: None,
            interfaces,
            members: Vec::new(),
            enum_values: Vec::new(),
            trigger_block: block,
        })
    }

    fn parse_member(&mut self, decl: &mut TypeDecl) {
        // Initializer block, static or instance.
        if self.at(TokenKind::LBrace) {
            let block = self.parse_block(0);
            decl.members.push(Member::Initializer(block));
            return;
        }

        let mods = self.parse_modifiers();

        if self.at(TokenKind::LBrace) {
            let block = self.parse_block(0);
            decl.members.push(Member::Initializer(block));
            return;
        }

        match self.peek_keyword() {
            Some(Keyword::Class) | Some(Keyword::Interface) | Some(Keyword::Enum) => {
                if let Some(inner) = self.parse_type_decl(mods) {
                    decl.members.push(Member::Inner(inner));
                }
                return;
            }
            _ => {}
        }

        // Constructor: the type name followed directly by '('.
        if let Some(token) = self.peek() {
            if token.kind == TokenKind::Identifier
                && case_fold(&token.text) == case_fold(&decl.name)
                && self.peek_at(1).is_some_and(|t| t.kind == TokenKind::LParen)
            {
                let name = self.advance().unwrap();
                let method = self.parse_method_tail(mods, None, name, true);
                decl.members.push(Member::Method(method));
                return;
            }
        }

        let Some(type_ref) = self.parse_type_ref() else {
            self.error_here("expected member declaration");
            self.synchronize();
            return;
        };

        let Some(name) = self.eat(TokenKind::Identifier) else {
            self.error_here("expected member name");
            self.synchronize();
            return;
        };

        if self.at(TokenKind::LParen) {
            let method = self.parse_method_tail(mods, Some(type_ref), name, false);
            decl.members.push(Member::Method(method));
        } else if self.at(TokenKind::LBrace) {
            let property = self.parse_property_tail(mods, type_ref, name);
            decl.members.push(Member::Property(property));
        } else {
            let field = self.parse_field_tail(mods, type_ref, name);
            decl.members.push(Member::Field(field));
        }
    }

    fn parse_params(&mut self) -> Vec<Param> {
        let mut params = Vec::new();
        if self.expect(TokenKind::LParen, "'('").is_none() {
            return params;
        }
        while !self.at(TokenKind::RParen) && !self.eof() {
            let Some(type_ref) = self.parse_type_ref() else {
                self.error_here("expected parameter type");
                self.skip_balanced_rest_of_parens();
                return params;
            };
            let Some(name) = self.eat(TokenKind::Identifier) else {
                self.error_here("expected parameter name");
                self.skip_balanced_rest_of_parens();
                return params;
            };
            params.push(Param {
                type_ref,
                name: name.text.clone(),
                name_range: name.range,
            });
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')' to close parameter list");
        params
    }

    fn skip_balanced_rest_of_parens(&mut self) {
        let mut depth = 1usize;
        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        self.advance();
                        return;
                    }
                }
                _ => {}
            }
            self.advance();
        }
    }

    fn parse_method_tail(
        &mut self,
        mods: ModifierParts,
        return_type: Option<TypeRef>,
        name: Token,
        is_constructor: bool,
    ) -> MethodDecl {
        let start = mods
            .start
            .or(return_type.as_ref().map(|t| t.range.start))
            .unwrap_or(name.range.start);
        let params = self.parse_params();
        let body = if self.at(TokenKind::LBrace) {
            Some(self.parse_block(0))
        } else {
            self.expect(TokenKind::Semicolon, "';' or method body");
            None
        };
        MethodDecl {
            modifiers: modifiers_from_parts(mods.visibility, mods.flags),
            annotations: mods.annotations,
            return_type,
            is_constructor,
            name: name.text.clone(),
            name_range: name.range,
            params,
            body,
            range: Range::new(start, self.last_range().end),
        }
    }

    fn parse_property_tail(
        &mut self,
        mods: ModifierParts,
        type_ref: TypeRef,
        name: Token,
    ) -> PropertyDecl {
        let start = mods.start.unwrap_or(type_ref.range.start);
        self.advance(); // '{'
        let mut accessors = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.eof() {
            // Accessors may carry their own visibility, e.g. `private set`.
            let _accessor_mods = self.parse_modifiers();
            let kind = match self.peek_keyword() {
                Some(Keyword::Get) => AccessorKind::Get,
                Some(Keyword::Set) => AccessorKind::Set,
                _ => {
                    self.error_here("expected 'get' or 'set'");
                    self.synchronize();
                    continue;
                }
            };
            let kw = self.advance().unwrap();
            let body = if self.at(TokenKind::LBrace) {
                Some(self.parse_block(0))
            } else {
                self.expect(TokenKind::Semicolon, "';' after accessor");
                None
            };
            accessors.push(Accessor {
                kind,
                body,
                range: Range::new(kw.range.start, self.last_range().end),
            });
        }
        if self.eat(TokenKind::RBrace).is_none() {
            self.error_here("unexpected end of file, '}' expected");
        }
        PropertyDecl {
            modifiers: modifiers_from_parts(mods.visibility, mods.flags),
            annotations: mods.annotations,
            type_ref,
            name: name.text.clone(),
            name_range: name.range,
            accessors,
            range: Range::new(start, self.last_range().end),
        }
    }

    fn parse_field_tail(&mut self, mods: ModifierParts, type_ref: TypeRef, name: Token) -> FieldDecl {
        let start = mods.start.unwrap_or(type_ref.range.start);
        let mut declarators = vec![self.parse_declarator_init(name)];
        while self.eat(TokenKind::Comma).is_some() {
            match self.eat(TokenKind::Identifier) {
                Some(next) => declarators.push(self.parse_declarator_init(next)),
                None => {
                    self.error_here("expected field name after ','");
                    break;
                }
            }
        }
        self.expect(TokenKind::Semicolon, "';' after field declaration");
        FieldDecl {
            modifiers: modifiers_from_parts(mods.visibility, mods.flags),
            annotations: mods.annotations,
            type_ref,
            declarators,
            range: Range::new(start, self.last_range().end),
        }
    }

    fn parse_declarator_init(&mut self, name: Token) -> VarDeclarator {
        let init = if self.eat(TokenKind::Eq).is_some() {
            Some(self.parse_expression(0))
        } else {
            None
        };
        VarDeclarator {
            name: name.text.clone(),
            name_range: name.range,
            init,
        }
    }

    // ---- statements -----------------------------------------------------

    fn parse_statement_list_until_eof(&mut self) -> Block {
        let start = self.here().start;
        let mut statements = Vec::new();
        while !self.eof() {
            if let Some(stmt) = self.parse_statement(0) {
                statements.push(stmt);
            }
        }
        Block {
            statements,
            range: Range::new(start, self.last_range().end),
        }
    }

    fn parse_block(&mut self, depth: usize) -> Block {
        let open = self.advance().expect("caller checked '{'");
        let mut statements = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.eof() {
            if let Some(stmt) = self.parse_statement(depth + 1) {
                statements.push(stmt);
            }
        }
        if self.eat(TokenKind::RBrace).is_none() {
            self.error_here("unexpected end of file, '}' expected");
        }
        Block {
            statements,
            range: Range::new(open.range.start, self.last_range().end),
        }
    }

    fn parse_statement(&mut self, depth: usize) -> Option<Stmt> {
        if depth > MAX_NESTING_DEPTH {
            self.error_here("statement nesting too deep");
            self.synchronize();
            return None;
        }

        if self.at(TokenKind::LBrace) {
            return Some(Stmt::Block(self.parse_block(depth)));
        }

        match self.peek_keyword() {
            Some(Keyword::If) => return self.parse_if(depth),
            Some(Keyword::While) => return self.parse_while(depth),
            Some(Keyword::Do) => return self.parse_do_while(depth),
            Some(Keyword::For) => return self.parse_for(depth),
            Some(Keyword::Try) => return self.parse_try(depth),
            Some(Keyword::Return) => {
                let kw = self.advance().unwrap();
                let expr = if self.at(TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expression(depth))
                };
                self.expect(TokenKind::Semicolon, "';' after return");
                return Some(Stmt::Return {
                    expr,
                    range: Range::new(kw.range.start, self.last_range().end),
                });
            }
            Some(Keyword::Throw) => {
                let kw = self.advance().unwrap();
                let expr = self.parse_expression(depth);
                self.expect(TokenKind::Semicolon, "';' after throw");
                return Some(Stmt::Throw {
                    expr,
                    range: Range::new(kw.range.start, self.last_range().end),
                });
            }
            Some(Keyword::Break) => {
                let kw = self.advance().unwrap();
                self.expect(TokenKind::Semicolon, "';' after break");
                return Some(Stmt::Break(kw.range));
            }
            Some(Keyword::Continue) => {
                let kw = self.advance().unwrap();
                self.expect(TokenKind::Semicolon, "';' after continue");
                return Some(Stmt::Continue(kw.range));
            }
            _ => {}
        }

        // Local declaration, speculatively.
        if let Some(local) = self.try_parse_local_decl(depth) {
            return Some(local);
        }

        // Expression statement; `System.runAs(u) { ... }` is recognized by
        // shape after the fact.
        let start = self.here().start;
        let expr = self.parse_expression(depth);
        if self.at(TokenKind::LBrace) {
            if let Some(user) = runas_argument(&expr) {
                let block = self.parse_block(depth);
                return Some(Stmt::RunAs {
                    user,
                    block,
                    range: Range::new(start, self.last_range().end),
                });
            }
        }
        if self.eat(TokenKind::Semicolon).is_none() {
            self.error_here("';' expected");
            self.synchronize();
        }
        Some(Stmt::Expr(expr))
    }

    fn try_parse_local_decl(&mut self, depth: usize) -> Option<Stmt> {
        let checkpoint = self.pos;
        let error_count = self.errors.len();

        let mut flags = ModifierFlags::empty();
        if self.at_keyword(Keyword::Final) {
            self.advance();
            flags |= ModifierFlags::FINAL;
        }

        let Some(type_ref) = self.parse_type_ref() else {
            self.pos = checkpoint;
            self.errors.truncate(error_count);
            return None;
        };
        let Some(name) = self.eat(TokenKind::Identifier) else {
            self.pos = checkpoint;
            self.errors.truncate(error_count);
            return None;
        };
        let next_is_decl = matches!(
            self.peek().map(|t| t.kind),
            Some(TokenKind::Eq) | Some(TokenKind::Comma) | Some(TokenKind::Semicolon)
        );
        if !next_is_decl {
            self.pos = checkpoint;
            self.errors.truncate(error_count);
            return None;
        }

        let start = type_ref.range.start;
        let mut declarators = vec![self.parse_declarator_init(name)];
        while self.eat(TokenKind::Comma).is_some() {
            match self.eat(TokenKind::Identifier) {
                Some(next) => declarators.push(self.parse_declarator_init(next)),
                None => {
                    self.error_here("expected variable name after ','");
                    break;
                }
            }
        }
        self.expect(TokenKind::Semicolon, "';' after variable declaration");
        let _ = depth;
        Some(Stmt::Local(LocalDecl {
            modifiers: local_modifiers(flags),
            type_ref,
            declarators,
            range: Range::new(start, self.last_range().end),
        }))
    }

    fn parse_if(&mut self, depth: usize) -> Option<Stmt> {
        let kw = self.advance().unwrap();
        self.expect(TokenKind::LParen, "'(' after 'if'");
        let condition = self.parse_expression(depth);
        self.expect(TokenKind::RParen, "')' after condition");
        let then_branch = Box::new(self.parse_statement(depth + 1)?);
        let else_branch = if self.eat_keyword(Keyword::Else).is_some() {
            Some(Box::new(self.parse_statement(depth + 1)?))
        } else {
            None
        };
        Some(Stmt::If {
            condition,
            then_branch,
            else_branch,
            range: Range::new(kw.range.start, self.last_range().end),
        })
    }

    fn parse_while(&mut self, depth: usize) -> Option<Stmt> {
        let kw = self.advance().unwrap();
        self.expect(TokenKind::LParen, "'(' after 'while'");
        let condition = self.parse_expression(depth);
        self.expect(TokenKind::RParen, "')' after condition");
        let body = Box::new(self.parse_statement(depth + 1)?);
        Some(Stmt::While {
            condition,
            body,
            range: Range::new(kw.range.start, self.last_range().end),
        })
    }

    fn parse_do_while(&mut self, depth: usize) -> Option<Stmt> {
        let kw = self.advance().unwrap();
        let body = Box::new(self.parse_statement(depth + 1)?);
        if self.eat_keyword(Keyword::While).is_none() {
            self.error_here("'while' expected after do body");
        }
        self.expect(TokenKind::LParen, "'(' after 'while'");
        let condition = self.parse_expression(depth);
        self.expect(TokenKind::RParen, "')' after condition");
        self.expect(TokenKind::Semicolon, "';' after do-while");
        Some(Stmt::DoWhile {
            body,
            condition,
            range: Range::new(kw.range.start, self.last_range().end),
        })
    }

    fn parse_for(&mut self, depth: usize) -> Option<Stmt> {
        let kw = self.advance().unwrap();
        self.expect(TokenKind::LParen, "'(' after 'for'");

        let mut init = None;
        let mut condition = None;
        let mut update = None;

        if !self.at(TokenKind::Semicolon) {
            if let Some(local) = self.try_parse_for_each(depth) {
                // for (Type x : iterable)
                let (decl, iterable) = local;
                self.expect(TokenKind::RParen, "')' to close for header");
                let body = Box::new(self.parse_statement(depth + 1)?);
                return Some(Stmt::For {
                    init: Some(Box::new(Stmt::Local(decl))),
                    condition: Some(iterable),
                    update: None,
                    body,
                    range: Range::new(kw.range.start, self.last_range().end),
                });
            }
            init = self
                .try_parse_local_decl(depth)
                .map(Box::new)
                .or_else(|| {
                    let expr = self.parse_expression(depth);
                    self.expect(TokenKind::Semicolon, "';' in for header");
                    Some(Box::new(Stmt::Expr(expr)))
                });
        } else {
            self.advance();
        }

        if !self.at(TokenKind::Semicolon) && !self.at(TokenKind::RParen) {
            condition = Some(self.parse_expression(depth));
        }
        self.eat(TokenKind::Semicolon);
        if !self.at(TokenKind::RParen) {
            update = Some(self.parse_expression(depth));
        }
        self.expect(TokenKind::RParen, "')' to close for header");
        let body = Box::new(self.parse_statement(depth + 1)?);
        Some(Stmt::For {
            init,
            condition,
            update,
            body,
            range: Range::new(kw.range.start, self.last_range().end),
        })
    }

    fn try_parse_for_each(&mut self, depth: usize) -> Option<(LocalDecl, Expr)> {
        let checkpoint = self.pos;
        let error_count = self.errors.len();
        let type_ref = self.parse_type_ref()?;
        let Some(name) = self.eat(TokenKind::Identifier) else {
            self.pos = checkpoint;
            self.errors.truncate(error_count);
            return None;
        };
        if self.eat(TokenKind::Colon).is_none() {
            self.pos = checkpoint;
            self.errors.truncate(error_count);
            return None;
        }
        let iterable = self.parse_expression(depth);
        let range = Range::new(type_ref.range.start, name.range.end);
        Some((
            LocalDecl {
                modifiers: local_modifiers(ModifierFlags::empty()),
                type_ref,
                declarators: vec![VarDeclarator {
                    name: name.text.clone(),
                    name_range: name.range,
                    init: None,
                }],
                range,
            },
            iterable,
        ))
    }

    fn parse_try(&mut self, depth: usize) -> Option<Stmt> {
        let kw = self.advance().unwrap();
        if !self.at(TokenKind::LBrace) {
            self.error_here("'{' expected after 'try'");
            return None;
        }
        let block = self.parse_block(depth);
        let mut catches = Vec::new();
        while self.at_keyword(Keyword::Catch) {
            let catch_kw = self.advance().unwrap();
            self.expect(TokenKind::LParen, "'(' after 'catch'");
            let param = match (self.parse_type_ref(), self.eat(TokenKind::Identifier)) {
                (Some(type_ref), Some(name)) => Param {
                    type_ref,
                    name: name.text.clone(),
                    name_range: name.range,
                },
                _ => {
                    self.error_here("expected exception parameter");
                    self.skip_balanced_rest_of_parens();
                    continue;
                }
            };
            self.expect(TokenKind::RParen, "')' after catch parameter");
            if !self.at(TokenKind::LBrace) {
                self.error_here("'{' expected after catch");
                continue;
            }
            let catch_block = self.parse_block(depth);
            catches.push(CatchClause {
                param,
                block: catch_block,
                range: Range::new(catch_kw.range.start, self.last_range().end),
            });
        }
        let finally_block = if self.at_keyword(Keyword::Finally) {
            self.advance();
            if self.at(TokenKind::LBrace) {
                Some(self.parse_block(depth))
            } else {
                self.error_here("'{' expected after 'finally'");
                None
            }
        } else {
            None
        };
        Some(Stmt::Try {
            block,
            catches,
            finally_block,
            range: Range::new(kw.range.start, self.last_range().end),
        })
    }

    // ---- expressions ----------------------------------------------------

    fn parse_expression(&mut self, depth: usize) -> Expr {
        self.parse_assignment(depth)
    }

    fn parse_assignment(&mut self, depth: usize) -> Expr {
        if depth > MAX_NESTING_DEPTH {
            self.error_here("expression nesting too deep");
            let range = self.here();
            self.synchronize();
            return Expr::Literal {
                kind: LiteralType::Null,
                text: "null".into(),
                range,
            };
        }
        let target = self.parse_ternary(depth);
        if self.peek().is_some_and(|t| t.kind.is_assign_op()) {
            let op = self.advance().unwrap();
            let compound = op.kind != TokenKind::Eq;
            let value = self.parse_assignment(depth + 1);
            let range = Range::new(target.range().start, value.range().end);
            return Expr::Assign {
                target: Box::new(target),
                compound,
                value: Box::new(value),
                range,
            };
        }
        target
    }

    fn parse_ternary(&mut self, depth: usize) -> Expr {
        let condition = self.parse_binary(depth, 0);
        if self.eat(TokenKind::Question).is_some() {
            let then_value = self.parse_expression(depth + 1);
            self.expect(TokenKind::Colon, "':' in ternary expression");
            let else_value = self.parse_expression(depth + 1);
            let range = Range::new(condition.range().start, else_value.range().end);
            return Expr::Ternary {
                condition: Box::new(condition),
                then_value: Box::new(then_value),
                else_value: Box::new(else_value),
                range,
            };
        }
        condition
    }

    fn binary_op_at(&self) -> Option<(BinaryOp, u8)> {
        let kind = self.peek()?.kind;
        let op = match kind {
            TokenKind::QuestionQuestion => (BinaryOp::Coalesce, 1),
            TokenKind::OrOr => (BinaryOp::Logical, 2),
            TokenKind::AndAnd => (BinaryOp::Logical, 3),
            TokenKind::Pipe | TokenKind::Caret | TokenKind::Amp => (BinaryOp::Bitwise, 4),
            TokenKind::EqEq | TokenKind::NotEq => (BinaryOp::Comparison, 5),
            TokenKind::Lt | TokenKind::Gt | TokenKind::LtEq | TokenKind::GtEq => {
                (BinaryOp::Comparison, 6)
            }
            TokenKind::Plus | TokenKind::Minus => (BinaryOp::Arithmetic, 7),
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => (BinaryOp::Arithmetic, 8),
            _ => return None,
        };
        Some(op)
    }

    fn parse_binary(&mut self, depth: usize, min_prec: u8) -> Expr {
        let mut left = self.parse_unary(depth);
        loop {
            if self.at_keyword(Keyword::Instanceof) {
                self.advance();
                match self.parse_type_ref() {
                    Some(type_ref) => {
                        let range = Range::new(left.range().start, type_ref.range.end);
                        left = Expr::InstanceOf {
                            expr: Box::new(left),
                            type_ref,
                            range,
                        };
                        continue;
                    }
                    None => {
                        self.error_here("expected type after 'instanceof'");
                        break;
                    }
                }
            }
            let Some((op, prec)) = self.binary_op_at() else { break };
            if prec < min_prec {
                break;
            }
            self.advance();
            let right = self.parse_binary(depth + 1, prec + 1);
            let range = Range::new(left.range().start, right.range().end);
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
                range,
            };
        }
        left
    }

    fn parse_unary(&mut self, depth: usize) -> Expr {
        match self.peek().map(|t| t.kind) {
            Some(TokenKind::Bang) | Some(TokenKind::Minus) | Some(TokenKind::Plus) => {
                let op = self.advance().unwrap();
                let expr = self.parse_unary(depth + 1);
                let range = Range::new(op.range.start, expr.range().end);
                Expr::Unary {
                    expr: Box::new(expr),
                    mutating: false,
                    range,
                }
            }
            Some(TokenKind::PlusPlus) | Some(TokenKind::MinusMinus) => {
                let op = self.advance().unwrap();
                let expr = self.parse_unary(depth + 1);
                let range = Range::new(op.range.start, expr.range().end);
                Expr::Unary {
                    expr: Box::new(expr),
                    mutating: true,
                    range,
                }
            }
            Some(TokenKind::LParen) => {
                if let Some(cast) = self.try_parse_cast(depth) {
                    cast
                } else {
                    self.parse_postfix(depth)
                }
            }
            _ => self.parse_postfix(depth),
        }
    }

    fn try_parse_cast(&mut self, depth: usize) -> Option<Expr> {
        let checkpoint = self.pos;
        let error_count = self.errors.len();
        let open = self.advance().unwrap(); // '('
        let Some(type_ref) = self.parse_type_ref() else {
            self.pos = checkpoint;
            self.errors.truncate(error_count);
            return None;
        };
        if self.eat(TokenKind::RParen).is_none() {
            self.pos = checkpoint;
            self.errors.truncate(error_count);
            return None;
        }
        // Only treat as a cast when an operand clearly follows.
        let operand_follows = matches!(
            self.peek().map(|t| t.kind),
            Some(TokenKind::Identifier)
                | Some(TokenKind::StringLiteral)
                | Some(TokenKind::IntegerLiteral)
                | Some(TokenKind::LongLiteral)
                | Some(TokenKind::DecimalLiteral)
                | Some(TokenKind::LParen)
        );
        if !operand_follows {
            self.pos = checkpoint;
            self.errors.truncate(error_count);
            return None;
        }
        let expr = self.parse_unary(depth + 1);
        let range = Range::new(open.range.start, expr.range().end);
        Some(Expr::Cast {
            type_ref,
            expr: Box::new(expr),
            range,
        })
    }

    fn parse_postfix(&mut self, depth: usize) -> Expr {
        let mut expr = self.parse_primary(depth);
        loop {
            match self.peek().map(|t| t.kind) {
                Some(TokenKind::Dot) | Some(TokenKind::QuestionDot) => {
                    self.advance();
                    let Some(name) = self.eat(TokenKind::Identifier) else {
                        self.error_here("expected member name after '.'");
                        break;
                    };
                    let range = Range::new(expr.range().start, name.range.end);
                    expr = Expr::FieldAccess {
                        object: Box::new(expr),
                        name: name.text.clone(),
                        name_range: name.range,
                        range,
                    };
                }
                Some(TokenKind::LParen) => {
                    let args = self.parse_args(depth);
                    let range = Range::new(expr.range().start, self.last_range().end);
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        range,
                    };
                }
                Some(TokenKind::LBracket) => {
                    self.advance();
                    let index = self.parse_expression(depth + 1);
                    self.expect(TokenKind::RBracket, "']' to close index");
                    let range = Range::new(expr.range().start, self.last_range().end);
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        range,
                    };
                }
                Some(TokenKind::PlusPlus) | Some(TokenKind::MinusMinus) => {
                    let op = self.advance().unwrap();
                    let range = Range::new(expr.range().start, op.range.end);
                    expr = Expr::Unary {
                        expr: Box::new(expr),
                        mutating: true,
                        range,
                    };
                }
                _ => break,
            }
        }
        expr
    }

    fn parse_args(&mut self, depth: usize) -> Vec<Expr> {
        self.advance(); // '('
        let mut args = Vec::new();
        while !self.at(TokenKind::RParen) && !self.eof() {
            args.push(self.parse_expression(depth + 1));
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')' to close argument list");
        args
    }

    fn parse_primary(&mut self, depth: usize) -> Expr {
        let Some(token) = self.peek().cloned() else {
            self.error_here("unexpected end of expression");
            return Expr::Literal {
                kind: LiteralType::Null,
                text: "null".into(),
                range: self.here(),
            };
        };

        match token.kind {
            TokenKind::IntegerLiteral => {
                self.advance();
                Expr::Literal {
                    kind: LiteralType::Integer,
                    text: token.text,
                    range: token.range,
                }
            }
            TokenKind::LongLiteral => {
                self.advance();
                Expr::Literal {
                    kind: LiteralType::Long,
                    text: token.text,
                    range: token.range,
                }
            }
            TokenKind::DecimalLiteral => {
                self.advance();
                Expr::Literal {
                    kind: LiteralType::Decimal,
                    text: token.text,
                    range: token.range,
                }
            }
            TokenKind::StringLiteral => {
                self.advance();
                Expr::Literal {
                    kind: LiteralType::String,
                    text: token.text,
                    range: token.range,
                }
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression(depth + 1);
                self.expect(TokenKind::RParen, "')'");
                inner
            }
            TokenKind::Identifier => match token.keyword() {
                Some(Keyword::True) | Some(Keyword::False) => {
                    self.advance();
                    Expr::Literal {
                        kind: LiteralType::Boolean,
                        text: token.text,
                        range: token.range,
                    }
                }
                Some(Keyword::Null) => {
                    self.advance();
                    Expr::Literal {
                        kind: LiteralType::Null,
                        text: token.text,
                        range: token.range,
                    }
                }
                Some(Keyword::This) => {
                    self.advance();
                    Expr::This(token.range)
                }
                Some(Keyword::Super) => {
                    self.advance();
                    Expr::Super(token.range)
                }
                Some(Keyword::New) => {
                    self.advance();
                    let Some(type_ref) = self.parse_type_ref() else {
                        self.error_here("expected type after 'new'");
                        return Expr::Literal {
                            kind: LiteralType::Null,
                            text: "null".into(),
                            range: token.range,
                        };
                    };
                    let args = if self.at(TokenKind::LParen) {
                        self.parse_args(depth)
                    } else if self.at(TokenKind::LBrace) {
                        // Collection initializer: `new List<Integer>{1, 2}`.
                        self.advance();
                        let mut args = Vec::new();
                        while !self.at(TokenKind::RBrace) && !self.eof() {
                            args.push(self.parse_expression(depth + 1));
                            if self.eat(TokenKind::Comma).is_none() {
                                break;
                            }
                        }
                        self.expect(TokenKind::RBrace, "'}' to close initializer");
                        args
                    } else {
                        Vec::new()
                    };
                    let range = Range::new(token.range.start, self.last_range().end);
                    Expr::New {
                        type_ref,
                        args,
                        range,
                    }
                }
                _ => {
                    self.advance();
                    Expr::Identifier {
                        name: token.text,
                        range: token.range,
                    }
                }
            },
            _ => {
                self.error_here(&format!("unexpected token '{}'", token.text));
                self.advance();
                Expr::Literal {
                    kind: LiteralType::Null,
                    text: "null".into(),
                    range: token.range,
                }
            }
        }
    }
}

/// `System.runAs(user)` as the head of a block statement.
fn runas_argument(expr: &Expr) -> Option<Expr> {
    let Expr::Call { callee, args, .. } = expr else {
        return None;
    };
    let Expr::FieldAccess { object, name, .. } = callee.as_ref() else {
        return None;
    };
    let Expr::Identifier { name: root, .. } = object.as_ref() else {
        return None;
    };
    if case_fold(root) == "system" && case_fold(name) == "runas" {
        args.first().map(clone_expr)
    } else {
        None
    }
}

/// Expressions are tree-owned and not `Clone`; the single place that needs
/// a copy (the runAs argument) rebuilds the handful of shapes it can meet.
fn clone_expr(expr: &Expr) -> Expr {
    match expr {
        Expr::Identifier { name, range } => Expr::Identifier {
            name: name.clone(),
            range: *range,
        },
        Expr::Literal { kind, text, range } => Expr::Literal {
            kind: *kind,
            text: text.clone(),
            range: *range,
        },
        Expr::FieldAccess {
            object,
            name,
            name_range,
            range,
        } => Expr::FieldAccess {
            object: Box::new(clone_expr(object)),
            name: name.clone(),
            name_range: *name_range,
            range: *range,
        },
        Expr::Call { callee, args, range } => Expr::Call {
            callee: Box::new(clone_expr(callee)),
            args: args.iter().map(clone_expr).collect(),
            range: *range,
        },
        other => Expr::Identifier {
            name: String::new(),
            range: other.range(),
        },
    }
}

fn local_modifiers(flags: ModifierFlags) -> crate::types::Modifiers {
    crate::types::Modifiers::with_flags(Visibility::Default, flags)
}
