//! Context-aware lexer for the CHTL language.
//!
//! The lexer is total: every byte of the input is covered by exactly one
//! token or one diagnostic span. It never fails; problems are recorded as
//! diagnostics and scanning resumes at the next plausible boundary.

use crate::error::{Diagnostics, Span};
use crate::source::Source;
use crate::token::{Token, TokenKind};

/// Bracketed declaration keywords recognized as single tokens.
const BRACKET_KEYWORDS: [(&str, TokenKind); 5] = [
    ("Template", TokenKind::BracketTemplate),
    ("Custom", TokenKind::BracketCustom),
    ("Origin", TokenKind::BracketOrigin),
    ("Namespace", TokenKind::BracketNamespace),
    ("Configuration", TokenKind::BracketConfiguration),
];

/// Tokenize a source, yielding the token stream (terminated by `Eof`) and
/// any diagnostics recorded along the way.
pub fn tokenize(source: &Source) -> (Vec<Token>, Diagnostics) {
    Lexer::new(source).run()
}

/// Which raw-capture discipline the next brace block uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawMode {
    /// `text { ... }` — plain brace counting.
    Text,
    /// `script { ... }` — brace counting that skips JS strings and comments.
    Script,
    /// `[Origin] ... { ... }` — plain brace counting.
    Origin,
}

struct Lexer<'a> {
    source: &'a Source,
    chars: Vec<(usize, char)>,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
    diagnostics: Diagnostics,
    pending_raw: Option<RawMode>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a Source) -> Self {
        Self {
            source,
            chars: source.text.char_indices().collect(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            diagnostics: Diagnostics::new(),
            pending_raw: None,
        }
    }

    fn run(mut self) -> (Vec<Token>, Diagnostics) {
        while !self.at_end() {
            self.scan_token();
        }
        let end = self.source.text.len();
        self.tokens.push(Token::new(
            TokenKind::Eof,
            "",
            Span::point(end),
            self.line,
            self.column,
        ));
        log::debug!(
            "lexed {}: {} tokens, {} diagnostics",
            self.source.name,
            self.tokens.len(),
            self.diagnostics.len()
        );
        (self.tokens, self.diagnostics)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|&(_, c)| c)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).map(|&(_, c)| c)
    }

    fn byte_offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map(|&(i, _)| i)
            .unwrap_or(self.source.text.len())
    }

    /// Consume one character, updating line/column bookkeeping.
    /// `\r\n` advances the line once, on the `\n`.
    fn advance(&mut self) -> Option<char> {
        let &(_, c) = self.chars.get(self.pos)?;
        self.pos += 1;
        match c {
            '\n' => {
                self.line += 1;
                self.column = 1;
            }
            '\r' => {
                // Column resets only when the \r is not part of \r\n;
                // the following \n performs the line bump either way.
                if self.peek() != Some('\n') {
                    self.line += 1;
                    self.column = 1;
                }
            }
            _ => self.column += 1,
        }
        Some(c)
    }

    fn push_token(&mut self, kind: TokenKind, start: usize, line: usize, column: usize) {
        let end = self.byte_offset();
        let lexeme = self.source.text[start..end].to_string();
        self.tokens
            .push(Token::new(kind, lexeme, Span::new(start, end), line, column));
        self.update_raw_flag(kind);
    }

    /// Carry the raw-capture flag across the tokens that may legally sit
    /// between an opener and its `{` (the origin form allows `@Lang Name`).
    fn update_raw_flag(&mut self, kind: TokenKind) {
        use TokenKind::*;
        self.pending_raw = match (self.pending_raw, kind) {
            (_, KwText) => Some(RawMode::Text),
            (_, KwScript) => Some(RawMode::Script),
            (_, BracketOrigin) => Some(RawMode::Origin),
            (mode @ Some(_), LineComment | BlockComment | PreservedComment) => mode,
            (Some(RawMode::Origin), AtKeyword | Identifier) => Some(RawMode::Origin),
            _ => None,
        };
    }

    fn error_here(&mut self, start: usize, line: usize, column: usize, message: impl Into<String>) {
        let span = Span::new(start, self.byte_offset());
        self.diagnostics.push(
            crate::error::Diagnostic::error(self.source.name.clone(), line, column, message)
                .with_span(span),
        );
    }

    fn scan_token(&mut self) {
        let start = self.byte_offset();
        let (line, column) = (self.line, self.column);
        let c = match self.peek() {
            Some(c) => c,
            None => return,
        };

        match c {
            ' ' | '\t' | '\n' | '\r' => {
                self.advance();
            }
            '{' if self.pending_raw.is_some() => self.scan_raw_block(),
            '{' => self.single(TokenKind::LBrace),
            '}' => self.single(TokenKind::RBrace),
            '[' => self.scan_bracket(start, line, column),
            ']' => self.single(TokenKind::RBracket),
            '(' => self.single(TokenKind::LParen),
            ')' => self.single(TokenKind::RParen),
            ':' => self.single(TokenKind::Colon),
            ';' => self.single(TokenKind::Semicolon),
            '=' => self.single(TokenKind::Equal),
            ',' => self.single(TokenKind::Comma),
            '.' => self.single(TokenKind::Dot),
            '&' => self.single(TokenKind::Ampersand),
            '#' => self.single(TokenKind::Hash),
            '@' => self.scan_at_keyword(start, line, column),
            '"' | '\'' => self.scan_string(start, line, column, c),
            '/' => self.scan_slash(start, line, column),
            '+' => self.single(TokenKind::Plus),
            '*' => self.single(TokenKind::Star),
            '%' => self.single(TokenKind::Percent),
            '<' => self.single(TokenKind::Lt),
            '>' => self.single(TokenKind::Gt),
            '!' => self.single(TokenKind::Bang),
            '-' if self.peek_at(1) == Some('-') => {
                // Preserved comment: runs to end of line.
                while let Some(c) = self.peek() {
                    if c == '\n' || c == '\r' {
                        break;
                    }
                    self.advance();
                }
                self.push_token(TokenKind::PreservedComment, start, line, column);
            }
            '-' => self.single(TokenKind::Minus),
            c if c.is_ascii_digit() => self.scan_number(start, line, column),
            c if is_ident_start(c) => self.scan_identifier(start, line, column),
            _ => {
                self.advance();
                self.error_here(start, line, column, format!("invalid character `{c}`"));
            }
        }
    }

    fn single(&mut self, kind: TokenKind) {
        let start = self.byte_offset();
        let (line, column) = (self.line, self.column);
        self.advance();
        self.push_token(kind, start, line, column);
    }

    /// `[` either opens one of the five declaration keywords or stands alone.
    fn scan_bracket(&mut self, start: usize, line: usize, column: usize) {
        for (word, kind) in BRACKET_KEYWORDS {
            if self.bracket_ahead(word) {
                for _ in 0..word.len() + 2 {
                    self.advance();
                }
                self.push_token(kind, start, line, column);
                return;
            }
        }
        self.advance();
        self.push_token(TokenKind::LBracket, start, line, column);
    }

    fn bracket_ahead(&self, word: &str) -> bool {
        let mut offset = 1;
        for expected in word.chars() {
            if self.peek_at(offset) != Some(expected) {
                return false;
            }
            offset += 1;
        }
        self.peek_at(offset) == Some(']')
    }

    /// `@` immediately followed by a name forms an `@X` keyword token.
    fn scan_at_keyword(&mut self, start: usize, line: usize, column: usize) {
        self.advance();
        if !self.peek().is_some_and(is_ident_start) {
            self.error_here(start, line, column, "`@` must be followed by a name");
            return;
        }
        while self.peek().is_some_and(is_ident_continue) {
            self.advance();
        }
        self.push_token(TokenKind::AtKeyword, start, line, column);
    }

    fn scan_string(&mut self, start: usize, line: usize, column: usize, quote: char) {
        self.advance();
        loop {
            match self.peek() {
                None => {
                    self.error_here(start, line, column, "unterminated string literal");
                    return;
                }
                Some('\n') | Some('\r') => {
                    self.error_here(start, line, column, "unterminated string literal");
                    return;
                }
                Some('\\') => {
                    self.advance();
                    self.advance();
                }
                Some(c) if c == quote => {
                    self.advance();
                    self.push_token(TokenKind::StringLit, start, line, column);
                    return;
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }

    fn scan_slash(&mut self, start: usize, line: usize, column: usize) {
        match self.peek_at(1) {
            Some('/') => {
                while let Some(c) = self.peek() {
                    if c == '\n' || c == '\r' {
                        break;
                    }
                    self.advance();
                }
                self.push_token(TokenKind::LineComment, start, line, column);
            }
            Some('*') => {
                self.advance();
                self.advance();
                loop {
                    match self.peek() {
                        None => {
                            self.error_here(start, line, column, "unterminated block comment");
                            return;
                        }
                        Some('*') if self.peek_at(1) == Some('/') => {
                            self.advance();
                            self.advance();
                            self.push_token(TokenKind::BlockComment, start, line, column);
                            return;
                        }
                        Some(_) => {
                            self.advance();
                        }
                    }
                }
            }
            _ => {
                self.advance();
                self.error_here(start, line, column, "invalid character `/`");
            }
        }
    }

    /// Capture `{ raw-body }` whole: emits `LBrace`, one `RawContent`
    /// token for the body, and the closing `RBrace`.
    fn scan_raw_block(&mut self) {
        let mode = self.pending_raw.take().unwrap_or(RawMode::Text);
        self.single(TokenKind::LBrace);

        let start = self.byte_offset();
        let (line, column) = (self.line, self.column);
        let mut depth = 1usize;

        loop {
            let Some(c) = self.peek() else {
                self.push_token(TokenKind::RawContent, start, line, column);
                self.error_here(start, line, column, "unterminated block");
                return;
            };
            match c {
                '{' => {
                    depth += 1;
                    self.advance();
                }
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        self.push_token(TokenKind::RawContent, start, line, column);
                        self.single(TokenKind::RBrace);
                        return;
                    }
                    self.advance();
                }
                '"' | '\'' | '`' if mode == RawMode::Script => self.skip_raw_string(c),
                '/' if mode == RawMode::Script => self.skip_raw_slash(),
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Skip a JS string so braces inside it do not affect the depth count.
    fn skip_raw_string(&mut self, quote: char) {
        self.advance();
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.advance();
                self.advance();
                continue;
            }
            // Single- and double-quoted strings end at the line break even
            // when unterminated; template literals span lines.
            if quote != '`' && (c == '\n' || c == '\r') {
                return;
            }
            self.advance();
            if c == quote {
                return;
            }
        }
    }

    /// Skip a JS comment; a lone `/` is consumed as ordinary content.
    fn skip_raw_slash(&mut self) {
        match self.peek_at(1) {
            Some('/') => {
                while let Some(c) = self.peek() {
                    if c == '\n' || c == '\r' {
                        return;
                    }
                    self.advance();
                }
            }
            Some('*') => {
                self.advance();
                self.advance();
                while let Some(c) = self.peek() {
                    if c == '*' && self.peek_at(1) == Some('/') {
                        self.advance();
                        self.advance();
                        return;
                    }
                    self.advance();
                }
            }
            _ => {
                self.advance();
            }
        }
    }

    fn scan_number(&mut self, start: usize, line: usize, column: usize) {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
            // A second fraction marks the literal invalid; consume it whole
            // so the stream still covers every byte.
            if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
                while self
                    .peek()
                    .is_some_and(|c| c.is_ascii_digit() || c == '.')
                {
                    self.advance();
                }
                self.error_here(start, line, column, "invalid numeric literal");
                return;
            }
        }
        self.push_token(TokenKind::NumberLit, start, line, column);
    }

    fn scan_identifier(&mut self, start: usize, line: usize, column: usize) {
        while self.peek().is_some_and(is_ident_continue) {
            self.advance();
        }
        let end = self.byte_offset();
        let kind = match &self.source.text[start..end] {
            "text" => TokenKind::KwText,
            "style" => TokenKind::KwStyle,
            "script" => TokenKind::KwScript,
            "except" => TokenKind::KwExcept,
            _ => TokenKind::Identifier,
        };
        self.push_token(kind, start, line, column);
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}
