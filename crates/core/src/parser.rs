//! Recursive-descent parser for the CHTL language.
//!
//! The parser owns a token cursor and a diagnostics list. On failure it
//! reports one diagnostic and synchronizes to the next statement boundary
//! (a semicolon, a closing brace, or a token that can begin a new
//! top-level construct), then resumes. Parsing populates the global
//! registry and drives the state machinery through scoped guards.

use crate::ast::{Anchor, Document, InsertPosition, NodeId, NodeKind, TemplateKind};
use crate::context::StateContextHelper;
use crate::error::{Diagnostics, Span};
use crate::lexer::tokenize;
use crate::registry::{
    CustomEntry, GlobalRegistry, NamespaceEntry, OriginBlock, TemplateEntry, VarBinding,
};
use crate::source::Source;
use crate::state::{CompilerState, ScopeKind};
use crate::token::{Token, TokenKind};

/// Everything the parse pass produces.
pub struct ParseResult {
    /// The parsed tree (possibly partial on errors).
    pub document: Document,
    /// Registry populated from declarations.
    pub registry: GlobalRegistry,
    /// Lexer diagnostics followed by parser diagnostics, in source order.
    pub diagnostics: Diagnostics,
}

/// Parse a source into a document tree, registry and diagnostics.
pub fn parse(source: &Source) -> ParseResult {
    let (tokens, lex_diagnostics) = tokenize(source);
    let mut parser = Parser::new(source, tokens);
    parser.diagnostics.extend(lex_diagnostics);
    parser.run()
}

struct Parser<'a> {
    source: &'a Source,
    tokens: Vec<Token>,
    pos: usize,
    doc: Document,
    registry: GlobalRegistry,
    diagnostics: Diagnostics,
    namespace_stack: Vec<String>,
    namespace_excepts: Vec<Vec<String>>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a Source, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
            doc: Document::new(Span::new(0, source.text.len())),
            registry: GlobalRegistry::new(),
            diagnostics: Diagnostics::new(),
            namespace_stack: Vec::new(),
            namespace_excepts: Vec::new(),
        }
    }

    fn run(mut self) -> ParseResult {
        // The helper lives outside `self` so guards can borrow it while
        // the parser itself stays mutably borrowable.
        let helper = StateContextHelper::new();
        let root = self.doc.root();
        {
            let _doc_guard = helper.scoped_guard(
                root,
                &NodeKind::Document,
                CompilerState::TopLevel,
                ScopeKind::Global,
                self.doc.node(root).span,
            );
            while !self.at_end() {
                self.parse_top_level_item(&helper, root);
            }
        }

        // Surface guard-recorded violations as ordinary diagnostics.
        let mut flagged: Vec<_> = helper
            .into_infos()
            .into_iter()
            .filter(|(_, info)| !info.errors.is_empty())
            .collect();
        flagged.sort_by_key(|(_, info)| info.span.start);
        for (_, info) in flagged {
            let (line, column) = self.source.line_col(info.span.start);
            for error in info.errors {
                self.diagnostics
                    .error_at(self.source.name.clone(), line, column, error);
            }
        }

        log::debug!(
            "parsed {}: {} nodes, {} diagnostics",
            self.source.name,
            self.doc.len(),
            self.diagnostics.len()
        );
        ParseResult {
            document: self.doc,
            registry: self.registry,
            diagnostics: self.diagnostics,
        }
    }

    // Cursor helpers

    fn cur(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn at_end(&self) -> bool {
        self.cur().kind == TokenKind::Eof
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.cur().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.cur().clone();
        if !self.at_end() {
            self.pos += 1;
        }
        token
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            self.error_at_current(format!("expected {what}, found `{}`", self.cur().lexeme));
            None
        }
    }

    fn error_at_current(&mut self, message: impl Into<String>) {
        let token = self.cur().clone();
        self.diagnostics.push(
            crate::error::Diagnostic::error(
                self.source.name.clone(),
                token.line,
                token.column,
                message,
            )
            .with_span(token.span),
        );
    }

    /// Skip tokens until a statement boundary that can start fresh.
    fn synchronize(&mut self) {
        while !self.at_end() {
            if self.matches(TokenKind::Semicolon) {
                return;
            }
            let kind = self.cur().kind;
            if kind == TokenKind::RBrace || kind.is_bracket_keyword() {
                return;
            }
            self.pos += 1;
        }
    }

    fn current_namespace(&self) -> Option<String> {
        self.namespace_stack.last().cloned()
    }

    /// Attach a comment token as a node and consume it.
    fn attach_comment(&mut self, parent: NodeId) {
        let token = self.advance();
        let preserved = token.kind == TokenKind::PreservedComment;
        let text = match token.kind {
            TokenKind::PreservedComment => token.lexeme.trim_start_matches('-').trim().to_string(),
            TokenKind::LineComment => token.lexeme.trim_start_matches('/').trim().to_string(),
            TokenKind::BlockComment => token
                .lexeme
                .trim_start_matches("/*")
                .trim_end_matches("*/")
                .trim()
                .to_string(),
            _ => token.lexeme.clone(),
        };
        let node = self
            .doc
            .alloc(NodeKind::Comment { text, preserved }, token.span);
        self.doc.add_child(parent, node);
    }

    // Top level

    fn parse_top_level_item(&mut self, h: &StateContextHelper, parent: NodeId) {
        match self.cur().kind {
            k if k.is_comment() => self.attach_comment(parent),
            TokenKind::BracketTemplate => self.parse_template_or_custom(h, parent, false),
            TokenKind::BracketCustom => self.parse_template_or_custom(h, parent, true),
            TokenKind::BracketOrigin => self.parse_origin(h, parent),
            TokenKind::BracketNamespace => self.parse_namespace(h, parent),
            TokenKind::BracketConfiguration => self.parse_configuration(h, parent),
            TokenKind::KwStyle => self.parse_style_block(h, parent, false),
            TokenKind::KwScript => self.parse_script_block(h, parent, false),
            TokenKind::KwExcept => self.parse_except(parent),
            TokenKind::AtKeyword => self.parse_use(h, parent),
            TokenKind::Identifier => self.parse_element(h, parent),
            TokenKind::Semicolon => {
                self.pos += 1;
            }
            _ => {
                self.error_at_current(format!(
                    "unexpected token `{}` at top level",
                    self.cur().lexeme
                ));
                self.advance();
                self.synchronize();
            }
        }
    }

    // Declarations

    fn parse_template_or_custom(
        &mut self,
        h: &StateContextHelper,
        parent: NodeId,
        is_custom: bool,
    ) {
        let open = self.advance();
        let Some(at) = self.expect(TokenKind::AtKeyword, "`@Style`, `@Element` or `@Var`") else {
            self.synchronize();
            return;
        };
        let Some(kind) = TemplateKind::from_at_keyword(&at.lexeme) else {
            self.error_at_current(format!("unknown declaration kind `{}`", at.lexeme));
            self.synchronize();
            return;
        };
        let Some(name_token) = self.expect(TokenKind::Identifier, "a declaration name") else {
            self.synchronize();
            return;
        };
        let name = name_token.lexeme.clone();

        let node_kind = if is_custom {
            NodeKind::CustomDecl {
                kind,
                name: name.clone(),
            }
        } else {
            NodeKind::TemplateDecl {
                kind,
                name: name.clone(),
            }
        };
        let node = self.doc.alloc(node_kind.clone(), open.span);
        self.doc.add_child(parent, node);

        {
            let (state, scope) = if is_custom {
                (CompilerState::InCustomDecl, ScopeKind::Custom)
            } else {
                (CompilerState::InTemplateDecl, ScopeKind::Template)
            };
            let _guard = h.scoped_guard(node, &node_kind, state, scope, open.span);

            if self.expect(TokenKind::LBrace, "`{`").is_some() {
                match kind {
                    TemplateKind::Element => {
                        while !self.check(TokenKind::RBrace) && !self.at_end() {
                            self.parse_element_content_item(h, node);
                        }
                    }
                    TemplateKind::Style | TemplateKind::Var => {
                        self.parse_style_contents(h, node);
                    }
                }
                self.expect(TokenKind::RBrace, "`}`");
            }
        }
        self.close_span(node, open.span);

        let span = self.doc.node(node).span;
        let namespace = self.current_namespace();
        let duplicate = if is_custom {
            self.registry
                .register_custom(CustomEntry {
                    kind,
                    name: name.clone(),
                    namespace,
                    node,
                    span,
                })
                .is_err()
        } else {
            self.registry
                .register_template(TemplateEntry {
                    kind,
                    name: name.clone(),
                    namespace,
                    node,
                    span,
                })
                .is_err()
        };
        if duplicate {
            let (line, column) = self.source.line_col(open.span.start);
            self.diagnostics.error_at(
                self.source.name.clone(),
                line,
                column,
                format!("duplicate definition of {kind} {name}"),
            );
        }

        if kind == TemplateKind::Var && !is_custom && !duplicate {
            let pairs = self.property_pairs(node);
            if self
                .registry
                .register_variable(VarBinding {
                    name: name.clone(),
                    pairs,
                })
                .is_err()
            {
                let (line, column) = self.source.line_col(open.span.start);
                self.diagnostics.error_at(
                    self.source.name.clone(),
                    line,
                    column,
                    format!("duplicate variable binding `{name}`"),
                );
            }
        }
    }

    /// Collect `name: value` pairs from a declaration's property children.
    fn property_pairs(&self, node: NodeId) -> Vec<(String, String)> {
        self.doc
            .children(node)
            .iter()
            .filter_map(|&child| match &self.doc.node(child).kind {
                NodeKind::StyleProperty { name, value } => Some((name.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    fn parse_origin(&mut self, h: &StateContextHelper, parent: NodeId) {
        let open = self.advance();
        let Some(lang) = self.expect(TokenKind::AtKeyword, "an origin language (`@Html`, ...)")
        else {
            self.synchronize();
            return;
        };
        let name = if self.check(TokenKind::Identifier) {
            Some(self.advance().lexeme)
        } else {
            None
        };

        // `[Origin] @Html Name;` references a previously registered block.
        if self.matches(TokenKind::Semicolon) {
            let kind = NodeKind::OriginEmbed {
                language: lang.lexeme.clone(),
                name: name.clone(),
                text: String::new(),
            };
            let node = self.doc.alloc(kind, open.span.merge(lang.span));
            self.doc.node_mut(node).set_attribute("use", "true");
            self.doc.add_child(parent, node);
            return;
        }

        let mut text = String::new();
        if self.expect(TokenKind::LBrace, "`{`").is_some() {
            if self.check(TokenKind::RawContent) {
                text = self.advance().lexeme;
            }
            self.expect(TokenKind::RBrace, "`}`");
        }
        let kind = NodeKind::OriginEmbed {
            language: lang.lexeme.clone(),
            name: name.clone(),
            text: text.clone(),
        };
        let node = self.doc.alloc(kind.clone(), open.span);
        self.doc.add_child(parent, node);
        {
            let _guard = h.scoped_guard(
                node,
                &kind,
                CompilerState::InOrigin,
                ScopeKind::Origin,
                open.span,
            );
        }
        self.close_span(node, open.span);

        if let Some(name) = name {
            self.registry.register_origin(OriginBlock {
                language: lang.lexeme,
                name,
                text,
            });
        }
    }

    fn parse_namespace(&mut self, h: &StateContextHelper, parent: NodeId) {
        let open = self.advance();
        let Some(name_token) = self.expect(TokenKind::Identifier, "a namespace name") else {
            self.synchronize();
            return;
        };
        let name = name_token.lexeme.clone();
        let kind = NodeKind::Namespace { name: name.clone() };
        let node = self.doc.alloc(kind.clone(), open.span);
        self.doc.add_child(parent, node);

        {
            let _guard = h.scoped_guard(
                node,
                &kind,
                CompilerState::InNamespace,
                ScopeKind::Namespace,
                open.span,
            );
            self.namespace_stack.push(name.clone());
            self.namespace_excepts.push(Vec::new());

            if self.expect(TokenKind::LBrace, "`{`").is_some() {
                while !self.check(TokenKind::RBrace) && !self.at_end() {
                    self.parse_top_level_item(h, node);
                }
                self.expect(TokenKind::RBrace, "`}`");
            }

            self.namespace_stack.pop();
            let excepted_tags = self.namespace_excepts.pop().unwrap_or_default();
            self.registry.register_namespace(NamespaceEntry {
                name,
                excepted_tags,
                node,
            });
        }
        self.close_span(node, open.span);
    }

    fn parse_configuration(&mut self, h: &StateContextHelper, parent: NodeId) {
        let open = self.advance();
        let mut pairs = Vec::new();
        if self.expect(TokenKind::LBrace, "`{`").is_some() {
            while !self.check(TokenKind::RBrace) && !self.at_end() {
                if self.cur().kind.is_comment() {
                    self.pos += 1;
                    continue;
                }
                let Some(key) = self.expect(TokenKind::Identifier, "an option name") else {
                    self.synchronize();
                    continue;
                };
                if !self.matches(TokenKind::Colon) && !self.matches(TokenKind::Equal) {
                    self.error_at_current("expected `:` or `=` after option name");
                    self.synchronize();
                    continue;
                }
                let value = match self.cur().kind {
                    TokenKind::Identifier | TokenKind::NumberLit => self.advance().lexeme,
                    TokenKind::StringLit => self.advance().string_value().to_string(),
                    _ => {
                        self.error_at_current("expected an option value");
                        self.synchronize();
                        continue;
                    }
                };
                pairs.push((key.lexeme, value));
                self.matches(TokenKind::Semicolon);
            }
            self.expect(TokenKind::RBrace, "`}`");
        }
        let kind = NodeKind::Configuration { pairs };
        let node = self.doc.alloc(kind.clone(), open.span);
        self.doc.add_child(parent, node);
        {
            let _guard = h.scoped_guard(
                node,
                &kind,
                CompilerState::InConfiguration,
                ScopeKind::Global,
                open.span,
            );
        }
        self.close_span(node, open.span);
    }

    // Elements

    fn parse_element(&mut self, h: &StateContextHelper, parent: NodeId) {
        let name_token = self.advance();
        let tag = name_token.lexeme.clone();
        let kind = NodeKind::Element { tag: tag.clone() };
        let node = self.doc.alloc(kind.clone(), name_token.span);
        self.doc.add_child(parent, node);

        {
            let _guard = h.scoped_guard(
                node,
                &kind,
                CompilerState::InElement,
                ScopeKind::Element,
                name_token.span,
            );
            if self.expect(TokenKind::LBrace, "`{`").is_some() {
                let _body =
                    h.frame_guard(CompilerState::InElementBody, ScopeKind::Element, &tag);
                while !self.check(TokenKind::RBrace) && !self.at_end() {
                    self.parse_element_content_item(h, node);
                }
                self.expect(TokenKind::RBrace, "`}`");
            }
        }
        self.close_span(node, name_token.span);
    }

    /// One item inside an element (or element-template) body.
    fn parse_element_content_item(&mut self, h: &StateContextHelper, parent: NodeId) {
        match self.cur().kind {
            k if k.is_comment() => self.attach_comment(parent),
            TokenKind::KwText if self.peek_kind(1) == TokenKind::LBrace => {
                self.parse_text_block(parent)
            }
            TokenKind::KwStyle if self.peek_kind(1) == TokenKind::LBrace => {
                self.parse_style_block(h, parent, true)
            }
            TokenKind::KwScript if self.peek_kind(1) == TokenKind::LBrace => {
                self.parse_script_block(h, parent, true)
            }
            TokenKind::KwExcept => self.parse_except(parent),
            TokenKind::BracketOrigin => self.parse_origin(h, parent),
            TokenKind::AtKeyword => self.parse_use(h, parent),
            TokenKind::Identifier
            | TokenKind::KwText
            | TokenKind::KwStyle
            | TokenKind::KwScript => match self.peek_kind(1) {
                TokenKind::Colon | TokenKind::Equal => self.parse_attribute(h, parent),
                TokenKind::LBrace => self.parse_element(h, parent),
                _ => {
                    self.error_at_current(format!(
                        "expected `{{`, `:` or `=` after `{}`",
                        self.cur().lexeme
                    ));
                    self.advance();
                    self.synchronize();
                }
            },
            TokenKind::Semicolon => {
                self.pos += 1;
            }
            _ => {
                self.error_at_current(format!(
                    "unexpected token `{}` in element body",
                    self.cur().lexeme
                ));
                self.advance();
                self.synchronize();
            }
        }
    }

    fn parse_attribute(&mut self, h: &StateContextHelper, parent: NodeId) {
        let name_token = self.advance();
        let _assign = self.advance(); // `:` or `=`, already checked
        let _attr = h.frame_guard(
            CompilerState::InAttribute,
            ScopeKind::Element,
            &name_token.lexeme,
        );

        let (value, value_span) = self.value_text_until_semicolon();
        let span = name_token.span.merge(value_span);
        let node = self.doc.alloc(
            NodeKind::Attribute {
                name: name_token.lexeme.clone(),
                value,
            },
            span,
        );
        self.doc.add_child(parent, node);
        self.matches(TokenKind::Semicolon);
    }

    /// Collect raw source text up to (not including) the next `;`, `}` or
    /// end of input. A single quoted string is unquoted.
    fn value_text_until_semicolon(&mut self) -> (String, Span) {
        if self.check(TokenKind::StringLit)
            && matches!(
                self.peek_kind(1),
                TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
            )
        {
            let token = self.advance();
            return (token.string_value().to_string(), token.span);
        }

        let start_span = self.cur().span;
        let mut end_span = start_span;
        let mut consumed = false;
        while !matches!(
            self.cur().kind,
            TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
        ) {
            end_span = self.cur().span;
            self.pos += 1;
            consumed = true;
        }
        if !consumed {
            self.error_at_current("expected a value");
            return (String::new(), Span::point(start_span.start));
        }
        let span = start_span.merge(end_span);
        let text = self.source.text[span.start..span.end].trim().to_string();
        (text, span)
    }

    fn parse_text_block(&mut self, parent: NodeId) {
        let open = self.advance();
        self.expect(TokenKind::LBrace, "`{`");
        let mut text = String::new();
        if self.check(TokenKind::RawContent) {
            text = self.advance().lexeme.trim().to_string();
        }
        let close = self.expect(TokenKind::RBrace, "`}`");
        let span = close.map(|c| open.span.merge(c.span)).unwrap_or(open.span);
        let node = self.doc.alloc(NodeKind::TextBlock { text }, span);
        self.doc.add_child(parent, node);
    }

    fn parse_script_block(&mut self, h: &StateContextHelper, parent: NodeId, local: bool) {
        let open = self.advance();
        self.expect(TokenKind::LBrace, "`{`");
        let mut text = String::new();
        if self.check(TokenKind::RawContent) {
            text = self.advance().lexeme;
        }
        let close = self.expect(TokenKind::RBrace, "`}`");
        let span = close.map(|c| open.span.merge(c.span)).unwrap_or(open.span);

        let kind = NodeKind::ScriptBlock { local, text };
        let node = self.doc.alloc(kind.clone(), span);
        self.doc.add_child(parent, node);
        let state = if local {
            CompilerState::InLocalScript
        } else {
            CompilerState::InGlobalScript
        };
        let _guard = h.scoped_guard(node, &kind, state, ScopeKind::ScriptBlock, span);
    }

    // Styles

    fn parse_style_block(&mut self, h: &StateContextHelper, parent: NodeId, local: bool) {
        let open = self.advance();
        let kind = NodeKind::StyleBlock { local };
        let node = self.doc.alloc(kind.clone(), open.span);
        self.doc.add_child(parent, node);

        {
            let state = if local {
                CompilerState::InLocalStyle
            } else {
                CompilerState::InGlobalStyle
            };
            let _guard = h.scoped_guard(node, &kind, state, ScopeKind::StyleBlock, open.span);
            if self.expect(TokenKind::LBrace, "`{`").is_some() {
                self.parse_style_contents(h, node);
                self.expect(TokenKind::RBrace, "`}`");
            }
        }
        self.close_span(node, open.span);
    }

    /// Properties, nested rules and use-sites inside a style body.
    fn parse_style_contents(&mut self, h: &StateContextHelper, parent: NodeId) {
        while !self.check(TokenKind::RBrace) && !self.at_end() {
            match self.cur().kind {
                k if k.is_comment() => self.attach_comment(parent),
                TokenKind::AtKeyword => self.parse_use(h, parent),
                TokenKind::Semicolon => {
                    self.pos += 1;
                }
                _ => {
                    if self.style_rule_ahead() {
                        self.parse_style_rule(h, parent);
                    } else {
                        self.parse_style_property(parent);
                    }
                }
            }
        }
    }

    /// A rule starts here iff a `{` appears before the next `;` or `}`.
    fn style_rule_ahead(&self) -> bool {
        let mut offset = 0;
        loop {
            match self.peek_kind(offset) {
                TokenKind::LBrace => return true,
                TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof => return false,
                _ => offset += 1,
            }
        }
    }

    fn parse_style_rule(&mut self, h: &StateContextHelper, parent: NodeId) {
        let start_span = self.cur().span;
        let mut end_span = start_span;
        while !self.check(TokenKind::LBrace) && !self.at_end() {
            end_span = self.cur().span;
            self.pos += 1;
        }
        let selector_span = start_span.merge(end_span);
        let selector = self.source.text[selector_span.start..selector_span.end]
            .trim()
            .to_string();
        let node = self.doc.alloc(
            NodeKind::StyleRule {
                selector: selector.clone(),
            },
            selector_span,
        );
        self.doc.add_child(parent, node);

        if self.expect(TokenKind::LBrace, "`{`").is_some() {
            self.parse_style_contents(h, node);
            self.expect(TokenKind::RBrace, "`}`");
        }
        self.close_span(node, selector_span);
    }

    fn parse_style_property(&mut self, parent: NodeId) {
        let Some(name_token) = self.expect(TokenKind::Identifier, "a property name") else {
            self.advance();
            self.synchronize();
            return;
        };
        if !self.matches(TokenKind::Colon) && !self.matches(TokenKind::Equal) {
            self.error_at_current(format!(
                "expected `:` after property `{}`",
                name_token.lexeme
            ));
            self.synchronize();
            return;
        }

        // `@Var Name` in value position becomes a reference child.
        if self.check(TokenKind::AtKeyword) && self.cur().lexeme == "@Var" {
            let at = self.advance();
            let reference = self.expect(TokenKind::Identifier, "a variable name");
            let node = self.doc.alloc(
                NodeKind::StyleProperty {
                    name: name_token.lexeme.clone(),
                    value: String::new(),
                },
                name_token.span,
            );
            self.doc.add_child(parent, node);
            if let Some(reference) = reference {
                let var = self.doc.alloc(
                    NodeKind::VarReference {
                        name: reference.lexeme.clone(),
                    },
                    at.span.merge(reference.span),
                );
                self.doc.add_child(node, var);
                self.close_span(node, name_token.span);
            }
            self.matches(TokenKind::Semicolon);
            return;
        }

        let (value, value_span) = self.value_text_until_semicolon();
        let node = self.doc.alloc(
            NodeKind::StyleProperty {
                name: name_token.lexeme.clone(),
                value,
            },
            name_token.span.merge(value_span),
        );
        self.doc.add_child(parent, node);
        self.matches(TokenKind::Semicolon);
    }

    // Use-sites and overrides

    fn parse_use(&mut self, h: &StateContextHelper, parent: NodeId) {
        let at = self.advance();
        let Some(kind) = TemplateKind::from_at_keyword(&at.lexeme) else {
            self.error_at_current(format!("unknown use keyword `{}`", at.lexeme));
            self.synchronize();
            return;
        };
        let Some(name_token) = self.expect(TokenKind::Identifier, "a template or custom name")
        else {
            self.synchronize();
            return;
        };

        let node_kind = NodeKind::Use {
            kind,
            name: name_token.lexeme.clone(),
        };
        let node = self.doc.alloc(node_kind, at.span.merge(name_token.span));
        if let Some(ns) = self.current_namespace() {
            self.doc.node_mut(node).set_attribute("namespace", ns);
        }
        self.doc.add_child(parent, node);

        if self.matches(TokenKind::LBrace) {
            while !self.check(TokenKind::RBrace) && !self.at_end() {
                self.parse_override_item(h, node);
            }
            self.expect(TokenKind::RBrace, "`}`");
        } else {
            self.matches(TokenKind::Semicolon);
        }
        self.close_span(node, at.span);
    }

    /// One item of a use-site override body.
    fn parse_override_item(&mut self, h: &StateContextHelper, parent: NodeId) {
        match self.cur().kind {
            k if k.is_comment() => self.attach_comment(parent),
            TokenKind::AtKeyword => self.parse_use(h, parent),
            TokenKind::Identifier if self.cur().lexeme == "insert" => self.parse_insert(h, parent),
            TokenKind::Identifier if self.cur().lexeme == "delete" => self.parse_delete(parent),
            TokenKind::Identifier
                if matches!(self.peek_kind(1), TokenKind::Colon | TokenKind::Equal) =>
            {
                self.parse_style_property(parent)
            }
            TokenKind::Semicolon => {
                self.pos += 1;
            }
            _ => {
                self.error_at_current(format!(
                    "unexpected token `{}` in override body",
                    self.cur().lexeme
                ));
                self.advance();
                self.synchronize();
            }
        }
    }

    fn parse_insert(&mut self, h: &StateContextHelper, parent: NodeId) {
        let open = self.advance(); // `insert`
        let Some(position) = self.parse_insert_position() else {
            self.synchronize();
            return;
        };

        let anchor = if self.check(TokenKind::LBrace) {
            // `at top` / `at bottom` need no anchor.
            Anchor {
                tag: String::new(),
                index: None,
            }
        } else {
            match self.parse_anchor() {
                Some(anchor) => anchor,
                None => {
                    self.synchronize();
                    return;
                }
            }
        };

        let node = self
            .doc
            .alloc(NodeKind::Insert { position, anchor }, open.span);
        self.doc.add_child(parent, node);

        if self.expect(TokenKind::LBrace, "`{`").is_some() {
            while !self.check(TokenKind::RBrace) && !self.at_end() {
                self.parse_element_content_item(h, node);
            }
            self.expect(TokenKind::RBrace, "`}`");
        }
        self.close_span(node, open.span);
    }

    fn parse_insert_position(&mut self) -> Option<InsertPosition> {
        let token = self.cur().clone();
        if token.kind != TokenKind::Identifier {
            self.error_at_current("expected an insert position");
            return None;
        }
        match token.lexeme.as_str() {
            "before" => {
                self.pos += 1;
                Some(InsertPosition::Before)
            }
            "after" => {
                self.pos += 1;
                Some(InsertPosition::After)
            }
            "replace" => {
                self.pos += 1;
                Some(InsertPosition::Replace)
            }
            "at" => {
                self.pos += 1;
                let which = self.cur().clone();
                match which.lexeme.as_str() {
                    "top" => {
                        self.pos += 1;
                        Some(InsertPosition::AtTop)
                    }
                    "bottom" => {
                        self.pos += 1;
                        Some(InsertPosition::AtBottom)
                    }
                    _ => {
                        self.error_at_current("expected `top` or `bottom` after `at`");
                        None
                    }
                }
            }
            _ => {
                self.error_at_current(format!("unknown insert position `{}`", token.lexeme));
                None
            }
        }
    }

    fn parse_delete(&mut self, parent: NodeId) {
        let open = self.advance(); // `delete`
        let Some(anchor) = self.parse_anchor() else {
            self.synchronize();
            return;
        };
        let node = self.doc.alloc(NodeKind::Delete { anchor }, open.span);
        self.doc.add_child(parent, node);
        self.matches(TokenKind::Semicolon);
        self.close_span(node, open.span);
    }

    /// `tag` or `tag[n]` with a 0-based n.
    fn parse_anchor(&mut self) -> Option<Anchor> {
        let tag = match self.cur().kind {
            TokenKind::Identifier
            | TokenKind::KwText
            | TokenKind::KwStyle
            | TokenKind::KwScript => self.advance().lexeme,
            _ => {
                self.error_at_current("expected an anchor tag name");
                return None;
            }
        };
        let mut index = None;
        if self.matches(TokenKind::LBracket) {
            match self.expect(TokenKind::NumberLit, "an index") {
                Some(number) => match number.lexeme.parse::<usize>() {
                    Ok(n) => index = Some(n),
                    Err(_) => self.error_at_current("anchor index must be a whole number"),
                },
                None => return None,
            }
            self.expect(TokenKind::RBracket, "`]`");
        }
        Some(Anchor { tag, index })
    }

    fn parse_except(&mut self, parent: NodeId) {
        let open = self.advance(); // `except`
        let mut tags = Vec::new();
        loop {
            match self.cur().kind {
                TokenKind::Identifier
                | TokenKind::KwText
                | TokenKind::KwStyle
                | TokenKind::KwScript => tags.push(self.advance().lexeme),
                _ => {
                    self.error_at_current("expected a tag name in except list");
                    break;
                }
            }
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.matches(TokenKind::Semicolon);

        if let Some(current) = self.namespace_excepts.last_mut() {
            current.extend(tags.iter().cloned());
        }
        let node = self.doc.alloc(NodeKind::Except { tags }, open.span);
        self.doc.add_child(parent, node);
    }

    /// Extend a node's span to the end of the previously consumed token.
    fn close_span(&mut self, node: NodeId, open: Span) {
        let end = self
            .tokens
            .get(self.pos.saturating_sub(1))
            .map(|t| t.span.end)
            .unwrap_or(open.end);
        let span = Span::new(open.start, end.max(open.end));
        self.doc.node_mut(node).span = span;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(text: &str) -> ParseResult {
        let result = parse(&Source::anonymous(text));
        assert!(
            !result.diagnostics.has_errors(),
            "unexpected diagnostics: {:?}",
            result.diagnostics.iter().collect::<Vec<_>>()
        );
        result
    }

    fn find_kind<'r>(
        result: &'r ParseResult,
        pred: impl Fn(&NodeKind) -> bool,
    ) -> Option<&'r NodeKind> {
        result
            .document
            .walk(result.document.root())
            .into_iter()
            .map(|id| &result.document.node(id).kind)
            .find(|k| pred(k))
    }

    #[test]
    fn parses_minimal_element_tree() {
        let result = parse_ok("body { div { text { Hi } } }");
        let doc = &result.document;
        let body = doc.children(doc.root())[0];
        assert!(matches!(&doc.node(body).kind, NodeKind::Element { tag } if tag == "body"));
        let div = doc.children(body)[0];
        assert!(matches!(&doc.node(div).kind, NodeKind::Element { tag } if tag == "div"));
        let text = doc.children(div)[0];
        assert!(matches!(&doc.node(text).kind, NodeKind::TextBlock { text } if text == "Hi"));
    }

    #[test]
    fn empty_source_is_empty_document_without_diagnostics() {
        let result = parse_ok("");
        assert!(result.document.children(result.document.root()).is_empty());
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn parses_attributes_in_both_forms() {
        let result = parse_ok("div { id: box; class = \"a b\"; }");
        let doc = &result.document;
        let div = doc.children(doc.root())[0];
        let attrs: Vec<_> = doc
            .children(div)
            .iter()
            .filter_map(|&c| match &doc.node(c).kind {
                NodeKind::Attribute { name, value } => Some((name.clone(), value.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(
            attrs,
            vec![
                ("id".to_string(), "box".to_string()),
                ("class".to_string(), "a b".to_string()),
            ]
        );
    }

    #[test]
    fn registers_template_declaration() {
        let result = parse_ok("[Template] @Element Card { div { text { T } } }");
        assert!(
            result
                .registry
                .template(TemplateKind::Element, "Card", None)
                .is_some()
        );
    }

    #[test]
    fn duplicate_template_reports_error_at_second_declaration() {
        let result = parse(&Source::anonymous(
            "[Template] @Element Card { div {} }\n[Template] @Element Card { p {} }",
        ));
        assert!(result.diagnostics.has_errors());
        let error = result
            .diagnostics
            .iter()
            .find(|d| d.message.contains("duplicate"))
            .unwrap();
        assert_eq!(error.line, 2);
    }

    #[test]
    fn same_template_name_with_different_kind_is_legal() {
        parse_ok("[Template] @Element Card { div {} }\n[Template] @Style Card { color: red; }");
    }

    #[test]
    fn parses_use_with_insert_and_delete_overrides() {
        let result = parse_ok(
            "[Template] @Element Card { div { text { T } } }\n\
             body { @Element Card { insert after div[0] { p { text { X } } } delete div[1]; } }",
        );
        let insert = find_kind(&result, |k| matches!(k, NodeKind::Insert { .. })).unwrap();
        match insert {
            NodeKind::Insert { position, anchor } => {
                assert_eq!(*position, InsertPosition::After);
                assert_eq!(anchor.tag, "div");
                assert_eq!(anchor.index, Some(0));
            }
            _ => unreachable!(),
        }
        let delete = find_kind(&result, |k| matches!(k, NodeKind::Delete { .. })).unwrap();
        match delete {
            NodeKind::Delete { anchor } => assert_eq!(anchor.index, Some(1)),
            _ => unreachable!(),
        }
    }

    #[test]
    fn parses_insert_at_top_without_anchor() {
        let result = parse_ok(
            "[Template] @Element Card { div {} }\n\
             body { @Element Card { insert at top { p {} } } }",
        );
        let insert = find_kind(&result, |k| matches!(k, NodeKind::Insert { .. })).unwrap();
        match insert {
            NodeKind::Insert { position, anchor } => {
                assert_eq!(*position, InsertPosition::AtTop);
                assert!(anchor.tag.is_empty());
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn parses_local_style_properties_and_nested_rule() {
        let result = parse_ok("div { style { color: red; &:hover { color: blue; } } }");
        let property = find_kind(&result, |k| {
            matches!(k, NodeKind::StyleProperty { name, .. } if name == "color")
        });
        assert!(property.is_some());
        let rule = find_kind(&result, |k| matches!(k, NodeKind::StyleRule { .. })).unwrap();
        match rule {
            NodeKind::StyleRule { selector } => assert_eq!(selector, "&:hover"),
            _ => unreachable!(),
        }
    }

    #[test]
    fn style_value_keeps_compound_text() {
        let result = parse_ok("div { style { border: 1px solid red; } }");
        let property = find_kind(&result, |k| matches!(k, NodeKind::StyleProperty { .. })).unwrap();
        match property {
            NodeKind::StyleProperty { value, .. } => assert_eq!(value, "1px solid red"),
            _ => unreachable!(),
        }
    }

    #[test]
    fn var_reference_in_style_value_becomes_child_node() {
        let result = parse_ok(
            "[Template] @Var Theme { color: teal; }\ndiv { style { color: @Var Theme; } }",
        );
        assert!(
            find_kind(
                &result,
                |k| matches!(k, NodeKind::VarReference { name } if name == "Theme")
            )
            .is_some()
        );
        assert!(result.registry.variable("Theme").is_some());
    }

    #[test]
    fn script_block_captures_verbatim_text() {
        let result = parse_ok("div { script { let x = {a: 1}; } }");
        let script = find_kind(&result, |k| matches!(k, NodeKind::ScriptBlock { .. })).unwrap();
        match script {
            NodeKind::ScriptBlock { local, text } => {
                assert!(*local);
                assert!(text.contains("let x = {a: 1};"));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn namespace_collects_except_tags_into_registry() {
        let result = parse_ok("[Namespace] ui { except span, b; p { text { ok } } }");
        let ns = result.registry.namespace("ui").unwrap();
        assert_eq!(ns.excepted_tags, vec!["span".to_string(), "b".to_string()]);
    }

    #[test]
    fn configuration_pairs_are_collected_in_order() {
        let result = parse_ok("[Configuration] { pretty_print: true; indent_size: 4; }");
        let config = find_kind(&result, |k| matches!(k, NodeKind::Configuration { .. })).unwrap();
        match config {
            NodeKind::Configuration { pairs } => {
                assert_eq!(
                    pairs,
                    &vec![
                        ("pretty_print".to_string(), "true".to_string()),
                        ("indent_size".to_string(), "4".to_string()),
                    ]
                );
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn origin_block_is_registered_and_kept_verbatim() {
        let result = parse_ok("[Origin] @Html Banner { <b>hi</b> }");
        let origin = result.registry.origin("Banner").unwrap();
        assert_eq!(origin.language, "@Html");
        assert_eq!(origin.text.trim(), "<b>hi</b>");
    }

    #[test]
    fn error_recovery_continues_after_bad_statement() {
        let result = parse(&Source::anonymous("div { ??? ; span { } }"));
        assert!(result.diagnostics.has_errors());
        // The following element still parses.
        let doc = &result.document;
        let div = doc.children(doc.root())[0];
        assert!(
            doc.children(div)
                .iter()
                .any(|&c| matches!(&doc.node(c).kind, NodeKind::Element { tag } if tag == "span"))
        );
    }

    #[test]
    fn node_spans_enclose_child_spans() {
        let result = parse_ok("body { div { text { Hi } } span { id: x; } }");
        let doc = &result.document;
        for id in doc.walk(doc.root()) {
            let parent_span = doc.node(id).span;
            for &child in doc.children(id) {
                assert!(
                    parent_span.encloses(doc.node(child).span),
                    "span of {:?} does not enclose child {:?}",
                    doc.node(id).kind,
                    doc.node(child).kind
                );
            }
        }
    }

    #[test]
    fn preserved_comment_becomes_comment_node() {
        let result = parse_ok("div { -- generated banner\n }");
        let comment = find_kind(&result, |k| matches!(k, NodeKind::Comment { .. })).unwrap();
        match comment {
            NodeKind::Comment { text, preserved } => {
                assert!(*preserved);
                assert_eq!(text, "generated banner");
            }
            _ => unreachable!(),
        }
    }
}
