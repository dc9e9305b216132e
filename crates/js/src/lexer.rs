//! Context-aware lexer for the CHTL-JS dialect.
//!
//! The lexer recognizes the CHTL-JS additions (`vir`, `->`, `{{ }}`
//! selector boundaries, state-tag angle brackets, the built-in function
//! names at call position) and passes everything else through as
//! [`JsTokenKind::JsChar`] so raw JavaScript never produces spurious
//! diagnostics. Like the CHTL lexer it is total: every byte is covered by
//! a token or a diagnostic span.

use crate::token::{BUILTIN_FUNCTIONS, JsToken, JsTokenKind};
use chtl_core::{Diagnostic, Diagnostics, Span};

/// Tokenize CHTL-JS script text. `file` names the enclosing source for
/// diagnostics.
pub fn tokenize_script(text: &str, file: &str) -> (Vec<JsToken>, Diagnostics) {
    JsLexer::new(text, file).run()
}

struct JsLexer<'a> {
    text: &'a str,
    file: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<JsToken>,
    diagnostics: Diagnostics,
}

impl<'a> JsLexer<'a> {
    fn new(text: &'a str, file: &'a str) -> Self {
        Self {
            text,
            file,
            chars: text.char_indices().collect(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    fn run(mut self) -> (Vec<JsToken>, Diagnostics) {
        while self.pos < self.chars.len() {
            self.scan_token();
        }
        let end = self.text.len();
        self.tokens.push(JsToken::new(
            JsTokenKind::Eof,
            "",
            Span::point(end),
            self.line,
            self.column,
        ));
        (self.tokens, self.diagnostics)
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
            .unwrap_or(self.text.len())
    }

    fn advance(&mut self) -> Option<char> {
        let &(_, c) = self.chars.get(self.pos)?;
        self.pos += 1;
        match c {
            '\n' => {
                self.line += 1;
                self.column = 1;
            }
            '\r' => {
                if self.peek() != Some('\n') {
                    self.line += 1;
                    self.column = 1;
                }
            }
            _ => self.column += 1,
        }
        Some(c)
    }

    fn push(&mut self, kind: JsTokenKind, start: usize, line: usize, column: usize) {
        let end = self.byte_offset();
        self.tokens.push(JsToken::new(
            kind,
            self.text[start..end].to_string(),
            Span::new(start, end),
            line,
            column,
        ));
    }

    fn single(&mut self, kind: JsTokenKind) {
        let start = self.byte_offset();
        let (line, column) = (self.line, self.column);
        self.advance();
        self.push(kind, start, line, column);
    }

    fn error_here(&mut self, start: usize, line: usize, column: usize, message: &str) {
        let span = Span::new(start, self.byte_offset());
        self.diagnostics
            .push(Diagnostic::error(self.file, line, column, message).with_span(span));
    }

    fn scan_token(&mut self) {
        let start = self.byte_offset();
        let (line, column) = (self.line, self.column);
        let Some(c) = self.peek() else { return };

        match c {
            ' ' | '\t' | '\n' | '\r' => {
                self.advance();
            }
            '{' if self.peek_at(1) == Some('{') => self.scan_selector(),
            '{' => self.single(JsTokenKind::LBrace),
            '}' => self.single(JsTokenKind::RBrace),
            '[' => self.single(JsTokenKind::LBracket),
            ']' => self.single(JsTokenKind::RBracket),
            '(' => self.single(JsTokenKind::LParen),
            ')' => self.single(JsTokenKind::RParen),
            ':' => self.single(JsTokenKind::Colon),
            ';' => self.single(JsTokenKind::Semicolon),
            ',' => self.single(JsTokenKind::Comma),
            '.' => self.single(JsTokenKind::Dot),
            '<' => self.single(JsTokenKind::Less),
            '>' => self.single(JsTokenKind::Greater),
            '=' if self.peek_at(1) == Some('>') => {
                self.advance();
                self.advance();
                self.push(JsTokenKind::FatArrow, start, line, column);
            }
            '=' => self.single(JsTokenKind::Equal),
            '-' if self.peek_at(1) == Some('>') => {
                self.advance();
                self.advance();
                self.push(JsTokenKind::Arrow, start, line, column);
            }
            '-' if self.peek_at(1) == Some('-')
                && matches!(self.peek_at(2), Some(' ') | Some('\t')) =>
            {
                // `-- text` preserved comment; `--x`/`x--` stay JS.
                while let Some(c) = self.peek() {
                    if c == '\n' || c == '\r' {
                        break;
                    }
                    self.advance();
                }
                self.push(JsTokenKind::PreservedComment, start, line, column);
            }
            '"' | '\'' => self.scan_string(start, line, column, c),
            '`' => self.scan_template(start, line, column),
            '/' if self.peek_at(1) == Some('/') => {
                while let Some(c) = self.peek() {
                    if c == '\n' || c == '\r' {
                        break;
                    }
                    self.advance();
                }
                self.push(JsTokenKind::LineComment, start, line, column);
            }
            '/' if self.peek_at(1) == Some('*') => {
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
                            self.push(JsTokenKind::BlockComment, start, line, column);
                            return;
                        }
                        Some(_) => {
                            self.advance();
                        }
                    }
                }
            }
            c if c.is_ascii_digit() => {
                while self
                    .peek()
                    .is_some_and(|c| c.is_ascii_digit() || c == '.')
                {
                    self.advance();
                }
                self.push(JsTokenKind::NumberLit, start, line, column);
            }
            c if is_ident_start(c) => self.scan_identifier(start, line, column),
            _ => {
                // Pass-through: raw JS operators and punctuation.
                self.advance();
                self.push(JsTokenKind::JsChar, start, line, column);
            }
        }
    }

    /// `{{ selector }}` captured as open / verbatim text / close.
    fn scan_selector(&mut self) {
        let start = self.byte_offset();
        let (line, column) = (self.line, self.column);
        self.advance();
        self.advance();
        self.push(JsTokenKind::SelectorOpen, start, line, column);

        let text_start = self.byte_offset();
        let (text_line, text_column) = (self.line, self.column);
        loop {
            match self.peek() {
                None => {
                    self.push(JsTokenKind::SelectorText, text_start, text_line, text_column);
                    self.error_here(start, line, column, "unterminated enhanced selector");
                    return;
                }
                Some('}') if self.peek_at(1) == Some('}') => {
                    self.push(JsTokenKind::SelectorText, text_start, text_line, text_column);
                    let close_start = self.byte_offset();
                    let (close_line, close_column) = (self.line, self.column);
                    self.advance();
                    self.advance();
                    self.push(JsTokenKind::SelectorClose, close_start, close_line, close_column);
                    return;
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
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
                    self.push(JsTokenKind::StringLit, start, line, column);
                    return;
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }

    fn scan_template(&mut self, start: usize, line: usize, column: usize) {
        self.advance();
        loop {
            match self.peek() {
                None => {
                    self.error_here(start, line, column, "unterminated template literal");
                    return;
                }
                Some('\\') => {
                    self.advance();
                    self.advance();
                }
                Some('`') => {
                    self.advance();
                    self.push(JsTokenKind::TemplateLit, start, line, column);
                    return;
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }

    fn scan_identifier(&mut self, start: usize, line: usize, column: usize) {
        while self.peek().is_some_and(is_ident_continue) {
            self.advance();
        }
        let end = self.byte_offset();
        let word = &self.text[start..end];
        let kind = match word {
            "vir" => JsTokenKind::Vir,
            "true" => JsTokenKind::True,
            "false" => JsTokenKind::False,
            _ if BUILTIN_FUNCTIONS.contains(&word) && self.call_position_ahead() => {
                JsTokenKind::BuiltinName
            }
            _ => JsTokenKind::Identifier,
        };
        self.push(kind, start, line, column);
    }

    /// Whether the next meaningful character opens a call or a state tag
    /// followed by a call (`name(...)` or `name<State>(...)`).
    fn call_position_ahead(&self) -> bool {
        let mut offset = 0;
        while matches!(self.peek_at(offset), Some(' ') | Some('\t')) {
            offset += 1;
        }
        match self.peek_at(offset) {
            Some('(') => true,
            Some('<') => {
                // Skip a short `<Ident>` run and require `(` behind it.
                let mut o = offset + 1;
                while self.peek_at(o).is_some_and(is_ident_continue) {
                    o += 1;
                }
                if self.peek_at(o) == Some('>') {
                    let mut o = o + 1;
                    while matches!(self.peek_at(o), Some(' ') | Some('\t')) {
                        o += 1;
                    }
                    self.peek_at(o) == Some('(')
                } else {
                    false
                }
            }
            _ => false,
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}
