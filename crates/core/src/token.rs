//! Token model for the CHTL lexer.

use crate::error::Span;

/// Token kinds produced by the CHTL lexer.
///
/// Bracketed declaration keywords and the `@X` family are recognized by the
/// lexer itself so the parser never has to reassemble them from punctuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// The `text` keyword.
    KwText,
    /// The `style` keyword.
    KwStyle,
    /// The `script` keyword.
    KwScript,
    /// The `except` keyword.
    KwExcept,

    /// `[Template]`
    BracketTemplate,
    /// `[Custom]`
    BracketCustom,
    /// `[Origin]`
    BracketOrigin,
    /// `[Namespace]`
    BracketNamespace,
    /// `[Configuration]`
    BracketConfiguration,

    /// `@X` sigil keyword; the lexeme carries the full form (`@Element`, `@Style`, ...).
    AtKeyword,

    /// An identifier or bare word (includes contextual keywords such as
    /// `insert`, `delete`, `before`, `after`, `replace`, `at`, `top`, `bottom`).
    Identifier,
    /// A quoted string literal; the lexeme keeps the quotes.
    StringLit,
    /// A numeric literal.
    NumberLit,

    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `:`
    Colon,
    /// `;`
    Semicolon,
    /// `=`
    Equal,
    /// `,`
    Comma,
    /// `.`
    Dot,
    /// `&`
    Ampersand,
    /// `#`
    Hash,
    /// `-` (single; `--` opens a preserved comment)
    Minus,
    /// `+`
    Plus,
    /// `*`
    Star,
    /// `%`
    Percent,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `!`
    Bang,

    /// Verbatim body of a `text`/`script`/`[Origin]` block, braces excluded.
    ///
    /// The lexer is context-aware: after one of those openers, the brace
    /// body is captured whole instead of being tokenized as CHTL.
    RawContent,

    /// `// ...` comment (JS style, dropped from HTML output).
    LineComment,
    /// `/* ... */` comment (JS style).
    BlockComment,
    /// `-- ...` comment (CHTL-preserved, may be emitted into the output).
    PreservedComment,

    /// End of input. Always the final token of a stream.
    Eof,
}

impl TokenKind {
    /// Whether this kind is one of the three comment forms.
    pub fn is_comment(self) -> bool {
        matches!(
            self,
            TokenKind::LineComment | TokenKind::BlockComment | TokenKind::PreservedComment
        )
    }

    /// Whether this kind opens a bracketed top-level declaration.
    pub fn is_bracket_keyword(self) -> bool {
        matches!(
            self,
            TokenKind::BracketTemplate
                | TokenKind::BracketCustom
                | TokenKind::BracketOrigin
                | TokenKind::BracketNamespace
                | TokenKind::BracketConfiguration
        )
    }
}

/// A single lexed token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Classified kind.
    pub kind: TokenKind,
    /// The covered source text (quotes included for strings).
    pub lexeme: String,
    /// Byte range in the source, half-open.
    pub span: Span,
    /// 1-based line of the first character.
    pub line: usize,
    /// 1-based column of the first character, in Unicode scalar values.
    pub column: usize,
}

impl Token {
    /// Create a token.
    pub fn new(
        kind: TokenKind,
        lexeme: impl Into<String>,
        span: Span,
        line: usize,
        column: usize,
    ) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            span,
            line,
            column,
        }
    }

    /// The string content of a `StringLit` token, quotes stripped.
    pub fn string_value(&self) -> &str {
        self.lexeme
            .strip_prefix(['"', '\''])
            .and_then(|s| s.strip_suffix(['"', '\'']))
            .unwrap_or(&self.lexeme)
    }

    /// Whether this is an identifier with exactly the given lexeme.
    pub fn is_ident(&self, word: &str) -> bool {
        self.kind == TokenKind::Identifier && self.lexeme == word
    }
}
