//! Apex token stream built on the Logos lexer generator.
//!
//! Keywords are not lexed as distinct tokens: Apex keywords are
//! case-insensitive (`PUBLIC Class Foo` is legal), so everything word-like
//! lexes as an identifier and the parser classifies keywords through
//! [`Token::keyword`].

use crate::types::{Position, Range};
use logos::Logos;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum TokenKind {
    #[regex(r"//[^\n]*")]
    LineComment,
    #[regex(r"/\*[^*]*\*+(?:[^/*][^*]*\*+)*/")]
    BlockComment,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Identifier,

    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?[dD]?")]
    DecimalLiteral,
    #[regex(r"[0-9]+[lL]")]
    LongLiteral,
    #[regex(r"[0-9]+")]
    IntegerLiteral,
    #[regex(r"'([^'\\\n]|\\.)*'")]
    StringLiteral,

    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("@")]
    At,

    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("=")]
    Eq,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("??")]
    QuestionQuestion,
    #[token("?.")]
    QuestionDot,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,
}

impl TokenKind {
    pub fn is_comment(&self) -> bool {
        matches!(self, Self::LineComment | Self::BlockComment)
    }

    pub fn is_assign_op(&self) -> bool {
        matches!(
            self,
            Self::Eq | Self::PlusEq | Self::MinusEq | Self::StarEq | Self::SlashEq
        )
    }
}

/// Keywords the parser recognizes, folded to lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Class,
    Interface,
    Enum,
    Trigger,
    Extends,
    Implements,
    Public,
    Private,
    Protected,
    Global,
    Static,
    Final,
    Abstract,
    Virtual,
    Override,
    Transient,
    TestMethod,
    WebService,
    If,
    Else,
    While,
    For,
    Do,
    Try,
    Catch,
    Finally,
    Return,
    Break,
    Continue,
    Throw,
    New,
    Instanceof,
    True,
    False,
    Null,
    Get,
    Set,
    On,
    Void,
    This,
    Super,
}

impl Keyword {
    pub fn from_ident(text: &str) -> Option<Self> {
        let kw = match text.to_ascii_lowercase().as_str() {
            "class" => Self::Class,
            "interface" => Self::Interface,
            "enum" => Self::Enum,
            "trigger" => Self::Trigger,
            "extends" => Self::Extends,
            "implements" => Self::Implements,
            "public" => Self::Public,
            "private" => Self::Private,
            "protected" => Self::Protected,
            "global" => Self::Global,
            "static" => Self::Static,
            "final" => Self::Final,
            "abstract" => Self::Abstract,
            "virtual" => Self::Virtual,
            "override" => Self::Override,
            "transient" => Self::Transient,
            "testmethod" => Self::TestMethod,
            "webservice" => Self::WebService,
            "if" => Self::If,
            "else" => Self::Else,
            "while" => Self::While,
            "for" => Self::For,
            "do" => Self::Do,
            "try" => Self::Try,
            "catch" => Self::Catch,
            "finally" => Self::Finally,
            "return" => Self::Return,
            "break" => Self::Break,
            "continue" => Self::Continue,
            "throw" => Self::Throw,
            "new" => Self::New,
            "instanceof" => Self::Instanceof,
            "true" => Self::True,
            "false" => Self::False,
            "null" => Self::Null,
            "get" => Self::Get,
            "set" => Self::Set,
            "on" => Self::On,
            "void" => Self::Void,
            "this" => Self::This,
            "super" => Self::Super,
            _ => return None,
        };
        Some(kw)
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub range: Range,
}

impl Token {
    pub fn keyword(&self) -> Option<Keyword> {
        if self.kind == TokenKind::Identifier {
            Keyword::from_ident(&self.text)
        } else {
            None
        }
    }

    pub fn is_keyword(&self, kw: Keyword) -> bool {
        self.keyword() == Some(kw)
    }
}

/// Byte-offset to line/column mapping. Lines 1-based, columns 0-based
/// (byte offsets within the line).
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    pub fn position(&self, offset: usize) -> Position {
        let line = self
            .line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1);
        Position::new(line as u32 + 1, (offset - self.line_starts[line]) as u32)
    }

    pub fn range(&self, span: std::ops::Range<usize>) -> Range {
        Range::new(self.position(span.start), self.position(span.end))
    }
}

/// A span the lexer could not tokenize, reported as a syntax error.
#[derive(Debug, Clone)]
pub struct LexError {
    pub text: String,
    pub range: Range,
}

pub struct LexOutcome {
    pub tokens: Vec<Token>,
    pub comments: Vec<Range>,
    pub errors: Vec<LexError>,
    /// Count before comment filtering, for `max_tokens` enforcement.
    pub token_count: usize,
    /// Extent of the source, for the file scope span.
    pub source_span: Range,
}

/// Tokenize `source`, splitting comments onto a side channel.
pub fn tokenize(source: &str) -> LexOutcome {
    let index = LineIndex::new(source);
    let mut lexer = TokenKind::lexer(source);
    let mut tokens = Vec::new();
    let mut comments = Vec::new();
    let mut errors = Vec::new();
    let mut token_count = 0;

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        token_count += 1;
        match result {
            Ok(kind) if kind.is_comment() => comments.push(index.range(span)),
            Ok(kind) => tokens.push(Token {
                kind,
                text: lexer.slice().to_string(),
                range: index.range(span),
            }),
            Err(()) => errors.push(LexError {
                text: lexer.slice().to_string(),
                range: index.range(span),
            }),
        }
    }

    let source_span = Range::new(Position::new(1, 0), index.position(source.len()));
    LexOutcome {
        tokens,
        comments,
        errors,
        token_count,
        source_span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_are_one_based_lines() {
        let out = tokenize("public class C {\n    Integer x;\n}");
        let class_kw = &out.tokens[1];
        assert_eq!(class_kw.text, "class");
        assert_eq!(class_kw.range.start, Position::new(1, 7));

        let integer = out
            .tokens
            .iter()
            .find(|t| t.text == "Integer")
            .unwrap();
        assert_eq!(integer.range.start, Position::new(2, 4));
    }

    #[test]
    fn keywords_fold_case() {
        let out = tokenize("PUBLIC Class c");
        assert_eq!(out.tokens[0].keyword(), Some(Keyword::Public));
        assert_eq!(out.tokens[1].keyword(), Some(Keyword::Class));
        assert_eq!(out.tokens[2].keyword(), None);
    }

    #[test]
    fn comments_go_to_the_side_channel() {
        let out = tokenize("// header\npublic /* mid */ class C {}");
        assert_eq!(out.comments.len(), 2);
        assert!(out.tokens.iter().all(|t| !t.kind.is_comment()));
    }

    #[test]
    fn literal_shapes() {
        let out = tokenize("1 12L 3.5 'a\\'b' 2.5e3");
        let kinds: Vec<_> = out.tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::IntegerLiteral,
                TokenKind::LongLiteral,
                TokenKind::DecimalLiteral,
                TokenKind::StringLiteral,
                TokenKind::DecimalLiteral,
            ]
        );
    }

    #[test]
    fn unlexable_input_is_reported_not_fatal() {
        let out = tokenize("Integer a = 1; #");
        assert_eq!(out.errors.len(), 1);
        assert!(out.tokens.len() >= 4);
    }

    #[test]
    fn compound_operators_win_over_singles() {
        let out = tokenize("a += b == c ?. d");
        let kinds: Vec<_> = out.tokens.iter().map(|t| t.kind).collect();
        assert!(kinds.contains(&TokenKind::PlusEq));
        assert!(kinds.contains(&TokenKind::EqEq));
        assert!(kinds.contains(&TokenKind::QuestionDot));
    }
}
