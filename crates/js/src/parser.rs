//! Recursive-descent parser for the CHTL-JS dialect.
//!
//! The parser lifts the CHTL-JS constructs (enhanced selectors, `vir`
//! declarations, built-in calls, state tags, arrow access) into
//! structured nodes and passes everything else through as verbatim
//! [`JsNodeKind::JsFragment`] text. On failure it reports one diagnostic
//! and synchronizes to the next statement boundary.

use crate::ast::{CallKind, JsDocument, JsNodeId, JsNodeKind, SelectorClassification};
use crate::js_passthrough::scan_fragment;
use crate::lexer::tokenize_script;
use crate::registry::{JsRegistry, VirObject};
use crate::state::{ScriptState, ScriptStateMachine};
use crate::token::{JsToken, JsTokenKind};
use chtl_core::{Diagnostic, Diagnostics, Span};

/// Outcome of parsing one script.
pub struct JsParseResult {
    /// The parsed script tree (possibly partial on errors).
    pub document: JsDocument,
    /// Lexer diagnostics followed by parser diagnostics.
    pub diagnostics: Diagnostics,
}

/// Parse script text into a CHTL-JS document, registering vir objects,
/// selectors and state functions into `registry` along the way.
pub fn parse_script(
    text: &str,
    file: &str,
    is_local: bool,
    registry: &mut JsRegistry,
) -> JsParseResult {
    let (tokens, lex_diagnostics) = tokenize_script(text, file);
    let mut parser = JsParser {
        text,
        file,
        tokens,
        pos: 0,
        doc: JsDocument::new(is_local, Span::new(0, text.len())),
        diagnostics: Diagnostics::new(),
        registry,
    };
    parser.diagnostics.extend(lex_diagnostics);

    let machine = ScriptStateMachine::new();
    let root = parser.doc.root();
    {
        let _script = machine.enter(ScriptState::Script);
        while !parser.at_end() {
            parser.parse_statement(&machine, root);
        }
    }

    JsParseResult {
        document: parser.doc,
        diagnostics: parser.diagnostics,
    }
}

/// Statement-opening keywords whose statements end at a closing brace
/// rather than a semicolon.
const BLOCK_KEYWORDS: [&str; 8] = [
    "function", "if", "for", "while", "do", "try", "switch", "class",
];

struct JsParser<'a> {
    text: &'a str,
    file: &'a str,
    tokens: Vec<JsToken>,
    pos: usize,
    doc: JsDocument,
    diagnostics: Diagnostics,
    registry: &'a mut JsRegistry,
}

impl<'a> JsParser<'a> {
    // Cursor helpers

    fn cur(&self) -> &JsToken {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self, offset: usize) -> JsTokenKind {
        self.tokens
            .get(self.pos + offset)
            .map(|t| t.kind)
            .unwrap_or(JsTokenKind::Eof)
    }

    fn at_end(&self) -> bool {
        self.cur().kind == JsTokenKind::Eof
    }

    fn check(&self, kind: JsTokenKind) -> bool {
        self.cur().kind == kind
    }

    fn advance(&mut self) -> JsToken {
        let token = self.cur().clone();
        if !self.at_end() {
            self.pos += 1;
        }
        token
    }

    fn matches(&mut self, kind: JsTokenKind) -> bool {
        if self.check(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: JsTokenKind, what: &str) -> Option<JsToken> {
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
            Diagnostic::error(self.file, token.line, token.column, message).with_span(token.span),
        );
    }

    fn synchronize(&mut self) {
        while !self.at_end() {
            if self.matches(JsTokenKind::Semicolon) {
                return;
            }
            if matches!(self.cur().kind, JsTokenKind::Vir | JsTokenKind::RBrace) {
                return;
            }
            self.pos += 1;
        }
    }

    // Statements

    fn parse_statement(&mut self, m: &ScriptStateMachine, parent: JsNodeId) {
        match self.cur().kind {
            JsTokenKind::Semicolon => {
                self.pos += 1;
            }
            JsTokenKind::LineComment | JsTokenKind::BlockComment => {
                let token = self.advance();
                let node = self
                    .doc
                    .alloc(JsNodeKind::JsFragment { text: token.lexeme }, token.span);
                self.doc.add_child(parent, node);
            }
            JsTokenKind::PreservedComment => {
                // Preserved comments lower to JS line comments.
                let token = self.advance();
                let body = token.lexeme.trim_start_matches('-').trim();
                let node = self.doc.alloc(
                    JsNodeKind::JsFragment {
                        text: format!("// {body}"),
                    },
                    token.span,
                );
                self.doc.add_child(parent, node);
            }
            JsTokenKind::Vir => self.parse_vir_declaration(m, parent),
            _ if self.structured_statement_ahead() => {
                let start_span = self.cur().span;
                let stmt = self.doc.alloc(JsNodeKind::ExprStmt, start_span);
                self.doc.add_child(parent, stmt);
                if let Some(expr) = self.parse_expression(m) {
                    self.doc.add_child(stmt, expr);
                    // Whatever follows before the statement boundary is
                    // carried through verbatim.
                    if !matches!(
                        self.cur().kind,
                        JsTokenKind::Semicolon | JsTokenKind::Eof
                    ) {
                        let fragment = self.capture_statement_tail(m);
                        self.doc.add_child(stmt, fragment);
                    }
                    self.matches(JsTokenKind::Semicolon);
                    let end = self.prev_end(start_span);
                    self.doc.node_mut(stmt).span = Span::new(start_span.start, end);
                } else {
                    self.synchronize();
                }
            }
            _ => {
                let fragment = self.capture_fragment_statement(m);
                self.doc.add_child(parent, fragment);
            }
        }
    }

    /// Whether the upcoming tokens begin a construct worth lifting.
    fn structured_statement_ahead(&self) -> bool {
        match self.cur().kind {
            JsTokenKind::SelectorOpen | JsTokenKind::BuiltinName => true,
            JsTokenKind::Identifier => {
                let name = &self.cur().lexeme;
                if self.registry.is_vir(name) {
                    return true;
                }
                // Extension-registered call names route through the
                // generic call path.
                if self.registry.is_builtin_function(name)
                    && self.peek_kind(1) == JsTokenKind::LParen
                {
                    return true;
                }
                // `name<State>(...)` state-tagged call site.
                self.peek_kind(1) == JsTokenKind::Less
                    && self.peek_kind(2) == JsTokenKind::Identifier
                    && self.peek_kind(3) == JsTokenKind::Greater
                    && self.peek_kind(4) == JsTokenKind::LParen
            }
            _ => false,
        }
    }

    fn prev_end(&self, fallback: Span) -> usize {
        self.tokens
            .get(self.pos.saturating_sub(1))
            .map(|t| t.span.end)
            .unwrap_or(fallback.end)
    }

    // Vir declarations

    fn parse_vir_declaration(&mut self, m: &ScriptStateMachine, parent: JsNodeId) {
        let open = self.advance(); // `vir`
        let _guard = m.enter(ScriptState::VirDeclaration);

        let Some(name_token) = self.expect(JsTokenKind::Identifier, "a vir object name") else {
            self.synchronize();
            return;
        };
        let name = name_token.lexeme.clone();
        if !self.matches(JsTokenKind::Equal) {
            self.error_at_current("expected `=` in vir declaration");
            self.synchronize();
            return;
        }

        let initializer = self.parse_expression(m);
        self.matches(JsTokenKind::Semicolon);

        let mut function_keys = Vec::new();
        let mut is_never_away = false;
        if let Some(init) = initializer {
            if let JsNodeKind::Call { kind } = self.doc.node(init).kind {
                is_never_away = kind == CallKind::INeverAway;
            }
            if let Some(config) = self.call_config(init) {
                for &prop in self.doc.children(config) {
                    if let JsNodeKind::Property { key, state_tag } = &self.doc.node(prop).kind {
                        if !function_keys.contains(key) {
                            function_keys.push(key.clone());
                        }
                        // State-tagged keys of an iNeverAway group get a
                        // stable emitted name up front.
                        if is_never_away
                            && let Some(tag) = state_tag
                            && self.registry.resolve_state_function(key, tag).is_none()
                        {
                            let unique = self
                                .registry
                                .generate_unique_name(&format!("{key}_{tag}"));
                            self.registry.register_state_function(key, tag, &unique);
                        }
                    }
                }
            }
        }

        let node = self.doc.alloc(
            JsNodeKind::VirDeclaration {
                name: name.clone(),
                function_keys: function_keys.clone(),
            },
            Span::new(open.span.start, self.prev_end(open.span)),
        );
        if let Some(init) = initializer {
            self.doc.add_child(node, init);
        }
        self.doc.add_child(parent, node);

        self.registry.register_vir(VirObject {
            name,
            function_keys,
        });
    }

    /// The object-literal config of a built-in call node, when present.
    fn call_config(&self, call: JsNodeId) -> Option<JsNodeId> {
        if !matches!(self.doc.node(call).kind, JsNodeKind::Call { .. }) {
            return None;
        }
        self.doc
            .children(call)
            .iter()
            .copied()
            .find(|&c| matches!(self.doc.node(c).kind, JsNodeKind::ObjectLiteral))
    }

    // Expressions

    fn parse_expression(&mut self, m: &ScriptStateMachine) -> Option<JsNodeId> {
        let mut left = self.parse_primary(m)?;
        loop {
            match self.cur().kind {
                JsTokenKind::Arrow | JsTokenKind::Dot => {
                    let is_arrow = self.cur().kind == JsTokenKind::Arrow;
                    let op_token = self.advance();
                    left = self.parse_member(m, left, is_arrow, op_token.span)?;
                }
                JsTokenKind::LParen => {
                    // Direct call on the primary.
                    if let JsNodeKind::Identifier { name } = self.doc.node(left).kind.clone() {
                        if let Some(kind) = CallKind::from_name(&name) {
                            left = self.parse_builtin_call(m, kind, None)?;
                            continue;
                        }
                    }
                    // Generic call: stop here; the statement tail keeps
                    // the arguments verbatim.
                    break;
                }
                _ => break,
            }
        }
        Some(left)
    }

    /// `left -> member` / `left . member`, with builtin and vir handling.
    fn parse_member(
        &mut self,
        m: &ScriptStateMachine,
        left: JsNodeId,
        is_arrow: bool,
        op_span: Span,
    ) -> Option<JsNodeId> {
        let member = match self.cur().kind {
            JsTokenKind::Identifier | JsTokenKind::BuiltinName => self.advance(),
            _ => {
                self.error_at_current("expected a member name after `->`");
                return Some(left);
            }
        };

        // Vir access: `V->key` / `V.key` on a declared vir object.
        let vir_target = match &self.doc.node(left).kind {
            JsNodeKind::Identifier { name } if self.registry.is_vir(name) => Some(name.clone()),
            _ => None,
        };
        if let Some(target) = vir_target {
            let is_call = self.check(JsTokenKind::LParen);
            let node = self.doc.alloc(
                JsNodeKind::VirAccess {
                    target,
                    member: member.lexeme.clone(),
                    is_call,
                },
                Span::new(self.doc.node(left).span.start, member.span.end),
            );
            if is_call {
                let args = self.capture_balanced_parens(m);
                self.doc.add_child(node, args);
            }
            return Some(node);
        }

        // Built-in call through a receiver: `target->listen({...})`.
        if CallKind::from_name(&member.lexeme).is_some() && self.check(JsTokenKind::LParen) {
            let kind = CallKind::from_name(&member.lexeme).unwrap();
            return self.parse_builtin_call(m, kind, Some(left));
        }

        let op = self.doc.alloc(
            if is_arrow {
                JsNodeKind::ArrowOp
            } else {
                JsNodeKind::DotOp
            },
            op_span,
        );
        let member_node = self.doc.alloc(
            JsNodeKind::Identifier {
                name: member.lexeme.clone(),
            },
            member.span,
        );
        self.doc.add_child(op, left);
        self.doc.add_child(op, member_node);

        // Generic method call arguments stay verbatim.
        if self.check(JsTokenKind::LParen) {
            let args = self.capture_balanced_parens(m);
            self.doc.add_child(op, args);
        }
        Some(op)
    }

    /// `kind({ config })`, with an optional receiver as first child.
    fn parse_builtin_call(
        &mut self,
        m: &ScriptStateMachine,
        kind: CallKind,
        target: Option<JsNodeId>,
    ) -> Option<JsNodeId> {
        let _guard = m.enter(ScriptState::ChtlJsFunction);
        let open = self.expect(JsTokenKind::LParen, "`(`")?;

        let mut args = Vec::new();
        if !self.check(JsTokenKind::RParen) {
            loop {
                let arg = self.parse_config_value(m)?;
                args.push(arg);
                if !self.matches(JsTokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(JsTokenKind::RParen, "`)`");

        let config_ok = args.len() == 1
            && matches!(
                self.doc.node(args[0]).kind,
                JsNodeKind::ObjectLiteral
            );
        if !config_ok {
            self.error_at_current(format!(
                "{} expects a single object literal argument",
                kind.name()
            ));
        }

        let node = self.doc.alloc(
            JsNodeKind::Call { kind },
            Span::new(open.span.start, self.prev_end(open.span)),
        );
        if let Some(target) = target {
            self.doc.add_child(node, target);
        }
        for arg in args {
            self.doc.add_child(node, arg);
        }
        Some(node)
    }

    fn parse_primary(&mut self, m: &ScriptStateMachine) -> Option<JsNodeId> {
        match self.cur().kind {
            JsTokenKind::SelectorOpen => self.parse_enhanced_selector(m),
            JsTokenKind::BuiltinName => {
                let name_token = self.advance();
                let kind = CallKind::from_name(&name_token.lexeme);
                if self.check(JsTokenKind::LParen) {
                    match kind {
                        Some(kind) => self.parse_builtin_call(m, kind, None),
                        None => Some(self.doc.alloc(
                            JsNodeKind::Identifier {
                                name: name_token.lexeme,
                            },
                            name_token.span,
                        )),
                    }
                } else if self.check(JsTokenKind::Less) {
                    self.parse_state_call(m, name_token)
                } else {
                    Some(self.doc.alloc(
                        JsNodeKind::Identifier {
                            name: name_token.lexeme,
                        },
                        name_token.span,
                    ))
                }
            }
            JsTokenKind::Identifier => {
                let name_token = self.advance();
                if name_token.lexeme == "function" {
                    return self.parse_function_decl(m, name_token);
                }
                if self.check(JsTokenKind::Less)
                    && self.peek_kind(1) == JsTokenKind::Identifier
                    && self.peek_kind(2) == JsTokenKind::Greater
                    && self.peek_kind(3) == JsTokenKind::LParen
                {
                    return self.parse_state_call(m, name_token);
                }
                Some(self.doc.alloc(
                    JsNodeKind::Identifier {
                        name: name_token.lexeme,
                    },
                    name_token.span,
                ))
            }
            JsTokenKind::True | JsTokenKind::False => {
                let token = self.advance();
                Some(self.doc.alloc(
                    JsNodeKind::BoolLit {
                        value: token.kind == JsTokenKind::True,
                    },
                    token.span,
                ))
            }
            JsTokenKind::StringLit | JsTokenKind::TemplateLit => {
                let token = self.advance();
                Some(
                    self.doc
                        .alloc(JsNodeKind::StringLit { raw: token.lexeme }, token.span),
                )
            }
            JsTokenKind::NumberLit => {
                let token = self.advance();
                Some(
                    self.doc
                        .alloc(JsNodeKind::NumberLit { raw: token.lexeme }, token.span),
                )
            }
            JsTokenKind::LBrace => self.parse_object_literal(m),
            JsTokenKind::LBracket => self.parse_array_literal(m),
            JsTokenKind::LParen => self.parse_arrow_or_parenthesized(m),
            _ => {
                self.error_at_current(format!(
                    "unexpected token `{}` in expression",
                    self.cur().lexeme
                ));
                None
            }
        }
    }

    /// `name<State>(args)` — routed through the state-function registry.
    fn parse_state_call(
        &mut self,
        m: &ScriptStateMachine,
        name_token: JsToken,
    ) -> Option<JsNodeId> {
        self.expect(JsTokenKind::Less, "`<`")?;
        let tag = self.expect(JsTokenKind::Identifier, "a state name")?;
        self.expect(JsTokenKind::Greater, "`>`")?;

        let node = self.doc.alloc(
            JsNodeKind::FunctionWithState {
                name: name_token.lexeme.clone(),
                tag: tag.lexeme.clone(),
            },
            Span::new(name_token.span.start, tag.span.end),
        );
        if self.check(JsTokenKind::LParen) {
            let args = self.capture_balanced_parens(m);
            self.doc.add_child(node, args);
        }
        Some(node)
    }

    fn parse_enhanced_selector(&mut self, m: &ScriptStateMachine) -> Option<JsNodeId> {
        let _guard = m.enter(ScriptState::EnhancedSelector);
        let open = self.advance(); // `{{`
        let text = if self.check(JsTokenKind::SelectorText) {
            self.advance().lexeme.trim().to_string()
        } else {
            String::new()
        };
        self.expect(JsTokenKind::SelectorClose, "`}}`");

        // Optional `[index]` following the selector.
        let mut index = None;
        if self.check(JsTokenKind::LBracket) && self.peek_kind(1) == JsTokenKind::NumberLit {
            self.pos += 1;
            let number = self.advance();
            match number.lexeme.parse::<usize>() {
                Ok(n) => index = Some(n),
                Err(_) => self.error_at_current("selector index must be a whole number"),
            }
            self.expect(JsTokenKind::RBracket, "`]`");
        }

        // An `[n]` written inside the braces counts the same way.
        let (text, index) = match (split_trailing_index(&text), index) {
            ((base, Some(inner)), None) => (base, Some(inner)),
            ((_, _), index) => (text.clone(), index),
        };

        if text.is_empty() {
            self.error_at_current("empty enhanced selector");
        }
        self.registry.add_selector(&text);
        let classification = SelectorClassification::classify(&text, index.is_some());
        Some(self.doc.alloc(
            JsNodeKind::EnhancedSelector {
                text,
                classification,
                index,
            },
            Span::new(open.span.start, self.prev_end(open.span)),
        ))
    }

    fn parse_object_literal(&mut self, m: &ScriptStateMachine) -> Option<JsNodeId> {
        let open = self.advance(); // `{`
        let node = self.doc.alloc(JsNodeKind::ObjectLiteral, open.span);

        while !self.check(JsTokenKind::RBrace) && !self.at_end() {
            if self.cur().kind.is_comment() {
                self.pos += 1;
                continue;
            }
            let Some(prop) = self.parse_property(m) else {
                self.synchronize();
                break;
            };
            self.doc.add_child(node, prop);
            if !self.matches(JsTokenKind::Comma) {
                break;
            }
        }
        self.expect(JsTokenKind::RBrace, "`}`");
        let end = self.prev_end(open.span);
        self.doc.node_mut(node).span = Span::new(open.span.start, end);
        Some(node)
    }

    fn parse_array_literal(&mut self, m: &ScriptStateMachine) -> Option<JsNodeId> {
        let open = self.advance(); // `[`
        let node = self.doc.alloc(JsNodeKind::ArrayLit, open.span);

        while !self.check(JsTokenKind::RBracket) && !self.at_end() {
            if self.cur().kind.is_comment() {
                self.pos += 1;
                continue;
            }
            let Some(elem) = self.parse_expression(m) else {
                self.synchronize();
                break;
            };
            self.doc.add_child(node, elem);
            if !self.matches(JsTokenKind::Comma) {
                break;
            }
        }
        self.expect(JsTokenKind::RBracket, "`]`");
        let end = self.prev_end(open.span);
        self.doc.node_mut(node).span = Span::new(open.span.start, end);
        Some(node)
    }

    fn parse_property(&mut self, m: &ScriptStateMachine) -> Option<JsNodeId> {
        let key_token = match self.cur().kind {
            JsTokenKind::Identifier | JsTokenKind::BuiltinName | JsTokenKind::StringLit => {
                self.advance()
            }
            _ => {
                self.error_at_current("expected a property key");
                return None;
            }
        };
        let key = if key_token.kind == JsTokenKind::StringLit {
            key_token
                .lexeme
                .trim_matches(|c| c == '"' || c == '\'')
                .to_string()
        } else {
            key_token.lexeme.clone()
        };

        // `Key<State>:` attaches a state tag to the property.
        let mut state_tag = None;
        if self.check(JsTokenKind::Less)
            && self.peek_kind(1) == JsTokenKind::Identifier
            && self.peek_kind(2) == JsTokenKind::Greater
        {
            self.pos += 1;
            state_tag = Some(self.advance().lexeme);
            self.pos += 1;
        }

        let node = self.doc.alloc(
            JsNodeKind::Property {
                key,
                state_tag: state_tag.clone(),
            },
            key_token.span,
        );
        if let Some(tag) = state_tag {
            let tag_node = self
                .doc
                .alloc(JsNodeKind::StateTag { name: tag }, key_token.span);
            self.doc.add_child(node, tag_node);
        }

        if !self.matches(JsTokenKind::Colon) {
            self.error_at_current("expected `:` after property key");
            return Some(node);
        }

        let value = self.parse_config_value(m)?;
        self.doc.add_child(node, value);
        let end = self.prev_end(key_token.span);
        self.doc.node_mut(node).span = Span::new(key_token.span.start, end);
        Some(node)
    }

    /// A value inside a config object or argument list: structured when
    /// it starts with a CHTL-JS construct or a literal, verbatim
    /// otherwise.
    fn parse_config_value(&mut self, m: &ScriptStateMachine) -> Option<JsNodeId> {
        match self.cur().kind {
            JsTokenKind::SelectorOpen
            | JsTokenKind::BuiltinName
            | JsTokenKind::True
            | JsTokenKind::False
            | JsTokenKind::StringLit
            | JsTokenKind::TemplateLit
            | JsTokenKind::NumberLit
            | JsTokenKind::LBrace
            | JsTokenKind::LBracket
            | JsTokenKind::LParen => self.parse_expression(m),
            JsTokenKind::Identifier if self.cur().lexeme == "function" => self.parse_expression(m),
            JsTokenKind::Identifier if self.registry.is_vir(&self.cur().lexeme) => {
                self.parse_expression(m)
            }
            JsTokenKind::Identifier
                if self.peek_kind(1) == JsTokenKind::FatArrow =>
            {
                // Single-parameter arrow function without parentheses.
                self.parse_unparenthesized_arrow(m)
            }
            _ => Some(self.capture_value_fragment(m)),
        }
    }

    /// `x => body`
    fn parse_unparenthesized_arrow(&mut self, m: &ScriptStateMachine) -> Option<JsNodeId> {
        let param = self.advance();
        self.expect(JsTokenKind::FatArrow, "`=>`")?;
        let node = self.doc.alloc(JsNodeKind::ArrowFunction, param.span);
        let params = self.doc.alloc(
            JsNodeKind::ParamList {
                text: param.lexeme.clone(),
            },
            param.span,
        );
        self.doc.add_child(node, params);
        let body = self.parse_arrow_body(m);
        self.doc.add_child(node, body);
        let end = self.prev_end(param.span);
        self.doc.node_mut(node).span = Span::new(param.span.start, end);
        Some(node)
    }

    /// `( ... )` — an arrow function when `=>` follows, a verbatim
    /// parenthesized fragment otherwise.
    fn parse_arrow_or_parenthesized(&mut self, m: &ScriptStateMachine) -> Option<JsNodeId> {
        // Find the matching close paren by token depth.
        let mut depth = 0usize;
        let mut offset = 0usize;
        loop {
            match self.peek_kind(offset) {
                JsTokenKind::LParen => depth += 1,
                JsTokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                JsTokenKind::Eof => break,
                _ => {}
            }
            offset += 1;
        }
        let is_arrow = self.peek_kind(offset + 1) == JsTokenKind::FatArrow;

        if !is_arrow {
            return Some(self.capture_balanced_parens(m));
        }

        let open = self.advance(); // `(`
        let params_start = self.cur().span.start;
        let mut params_end = params_start;
        let mut depth = 1usize;
        while !self.at_end() {
            match self.cur().kind {
                JsTokenKind::LParen => depth += 1,
                JsTokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            params_end = self.cur().span.end;
            self.pos += 1;
        }
        self.expect(JsTokenKind::RParen, "`)`");
        self.expect(JsTokenKind::FatArrow, "`=>`")?;

        let params_text = self.text[params_start..params_end.max(params_start)]
            .trim()
            .to_string();
        let node = self.doc.alloc(JsNodeKind::ArrowFunction, open.span);
        let params = self.doc.alloc(
            JsNodeKind::ParamList { text: params_text },
            Span::new(params_start, params_end.max(params_start)),
        );
        self.doc.add_child(node, params);
        let body = self.parse_arrow_body(m);
        self.doc.add_child(node, body);
        let end = self.prev_end(open.span);
        self.doc.node_mut(node).span = Span::new(open.span.start, end);
        Some(node)
    }

    fn parse_arrow_body(&mut self, m: &ScriptStateMachine) -> JsNodeId {
        if self.check(JsTokenKind::LBrace) {
            self.capture_brace_block(m)
        } else {
            // Expression body: verbatim until the enclosing delimiter.
            self.capture_value_fragment(m)
        }
    }

    /// `function name?(params) { body }`
    fn parse_function_decl(
        &mut self,
        m: &ScriptStateMachine,
        keyword: JsToken,
    ) -> Option<JsNodeId> {
        let name = if self.check(JsTokenKind::Identifier) {
            Some(self.advance().lexeme)
        } else {
            None
        };
        self.expect(JsTokenKind::LParen, "`(`")?;
        let params_start = self.cur().span.start;
        let mut params_end = params_start;
        let mut depth = 1usize;
        while !self.at_end() {
            match self.cur().kind {
                JsTokenKind::LParen => depth += 1,
                JsTokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            params_end = self.cur().span.end;
            self.pos += 1;
        }
        self.expect(JsTokenKind::RParen, "`)`");

        let node = self.doc.alloc(JsNodeKind::FunctionDecl { name }, keyword.span);
        let params = self.doc.alloc(
            JsNodeKind::ParamList {
                text: self.text[params_start..params_end.max(params_start)]
                    .trim()
                    .to_string(),
            },
            Span::new(params_start, params_end.max(params_start)),
        );
        self.doc.add_child(node, params);
        if self.check(JsTokenKind::LBrace) {
            let body = self.capture_brace_block(m);
            self.doc.add_child(node, body);
        }
        let end = self.prev_end(keyword.span);
        self.doc.node_mut(node).span = Span::new(keyword.span.start, end);
        Some(node)
    }

    // Verbatim capture

    /// Capture a `{ ... }` block verbatim into a [`JsNodeKind::Block`].
    fn capture_brace_block(&mut self, m: &ScriptStateMachine) -> JsNodeId {
        let _guard = m.enter(ScriptState::JsFragment);
        let open = self.advance(); // `{`
        let body_start = self.cur().span.start;
        let mut body_end = body_start;
        let mut depth = 1usize;
        while !self.at_end() {
            match self.cur().kind {
                JsTokenKind::LBrace | JsTokenKind::SelectorOpen => depth += 1,
                JsTokenKind::RBrace | JsTokenKind::SelectorClose => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            body_end = self.cur().span.end;
            self.pos += 1;
        }
        self.expect(JsTokenKind::RBrace, "`}`");

        let text = self.text[body_start..body_end.max(body_start)].to_string();
        self.check_fragment(&text, open.line, open.column);
        self.doc.alloc(
            JsNodeKind::Block { text },
            Span::new(open.span.start, self.prev_end(open.span)),
        )
    }

    /// Capture `( ... )` verbatim (parentheses included) as a fragment.
    fn capture_balanced_parens(&mut self, m: &ScriptStateMachine) -> JsNodeId {
        let _guard = m.enter(ScriptState::JsFragment);
        let open = self.cur().clone();
        let start = open.span.start;
        let mut depth = 0usize;
        let mut end = start;
        while !self.at_end() {
            match self.cur().kind {
                JsTokenKind::LParen => depth += 1,
                JsTokenKind::RParen => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                    end = self.cur().span.end;
                    self.pos += 1;
                    if depth == 0 {
                        break;
                    }
                    continue;
                }
                JsTokenKind::Eof => break,
                _ => {}
            }
            end = self.cur().span.end;
            self.pos += 1;
        }
        let text = self.text[start..end.max(start)].to_string();
        self.check_fragment(&text, open.line, open.column);
        self.doc
            .alloc(JsNodeKind::JsFragment { text }, Span::new(start, end))
    }

    /// Capture a config value verbatim until `,`, `}`, `)` or `;` at
    /// depth zero.
    fn capture_value_fragment(&mut self, m: &ScriptStateMachine) -> JsNodeId {
        let _guard = m.enter(ScriptState::JsFragment);
        let first = self.cur().clone();
        let start = first.span.start;
        let mut end = start;
        let mut depth = 0usize;
        while !self.at_end() {
            let kind = self.cur().kind;
            match kind {
                JsTokenKind::LParen | JsTokenKind::LBrace | JsTokenKind::LBracket
                | JsTokenKind::SelectorOpen => depth += 1,
                JsTokenKind::RParen | JsTokenKind::RBrace | JsTokenKind::RBracket
                | JsTokenKind::SelectorClose => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                JsTokenKind::Comma | JsTokenKind::Semicolon if depth == 0 => break,
                _ => {}
            }
            end = self.cur().span.end;
            self.pos += 1;
        }
        let text = self.text[start..end.max(start)].trim_end().to_string();
        self.check_fragment(&text, first.line, first.column);
        self.doc
            .alloc(JsNodeKind::JsFragment { text }, Span::new(start, end))
    }

    /// Capture a whole raw statement (through `;`, or through the closing
    /// brace of a block-shaped statement).
    fn capture_fragment_statement(&mut self, m: &ScriptStateMachine) -> JsNodeId {
        let _guard = m.enter(ScriptState::JsFragment);
        let first = self.cur().clone();
        let start = first.span.start;
        let block_shaped = BLOCK_KEYWORDS.contains(&first.lexeme.as_str());
        let mut end = start;
        let mut depth = 0usize;
        while !self.at_end() {
            let kind = self.cur().kind;
            match kind {
                JsTokenKind::LParen | JsTokenKind::LBrace | JsTokenKind::LBracket
                | JsTokenKind::SelectorOpen => depth += 1,
                JsTokenKind::RParen | JsTokenKind::RBrace | JsTokenKind::RBracket
                | JsTokenKind::SelectorClose => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                    if depth == 0 && block_shaped && kind == JsTokenKind::RBrace {
                        end = self.cur().span.end;
                        self.pos += 1;
                        break;
                    }
                }
                JsTokenKind::Semicolon if depth == 0 => {
                    end = self.cur().span.end;
                    self.pos += 1;
                    break;
                }
                _ => {}
            }
            end = self.cur().span.end;
            self.pos += 1;
        }
        let text = self.text[start..end.max(start)].to_string();
        self.check_fragment(&text, first.line, first.column);
        self.doc
            .alloc(JsNodeKind::JsFragment { text }, Span::new(start, end))
    }

    /// The statement remainder after a structured expression.
    fn capture_statement_tail(&mut self, m: &ScriptStateMachine) -> JsNodeId {
        self.capture_fragment_statement(m)
    }

    fn check_fragment(&mut self, text: &str, line: usize, column: usize) {
        let info = scan_fragment(text);
        if let Some((_, message)) = info.error {
            self.diagnostics
                .push(Diagnostic::error(self.file, line, column, message));
        }
    }
}

/// Split a trailing `[n]` off selector text written inside the braces.
fn split_trailing_index(text: &str) -> (String, Option<usize>) {
    if let Some(open) = text.rfind('[')
        && text.ends_with(']')
    {
        let inner = &text[open + 1..text.len() - 1];
        if let Ok(n) = inner.parse::<usize>() {
            return (text[..open].trim_end().to_string(), Some(n));
        }
    }
    (text.to_string(), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(text: &str) -> (JsParseResult, JsRegistry) {
        let mut registry = JsRegistry::new();
        let result = parse_script(text, "<script>", true, &mut registry);
        assert!(
            !result.diagnostics.has_errors(),
            "unexpected diagnostics: {:?}",
            result.diagnostics.iter().collect::<Vec<_>>()
        );
        (result, registry)
    }

    fn find_kind<'r>(
        result: &'r JsParseResult,
        pred: impl Fn(&JsNodeKind) -> bool,
    ) -> Option<&'r JsNodeKind> {
        result
            .document
            .walk(result.document.root())
            .into_iter()
            .map(|id| &result.document.node(id).kind)
            .find(|k| pred(k))
    }

    #[test]
    fn enhanced_selector_is_classified_and_recorded() {
        let (result, registry) = parse_ok("{{.box}}->textContent = \"ok\";");
        let selector =
            find_kind(&result, |k| matches!(k, JsNodeKind::EnhancedSelector { .. })).unwrap();
        match selector {
            JsNodeKind::EnhancedSelector {
                text,
                classification,
                index,
            } => {
                assert_eq!(text, ".box");
                assert_eq!(*classification, SelectorClassification::Class);
                assert_eq!(*index, None);
            }
            _ => unreachable!(),
        }
        assert!(registry.selectors().contains(".box"));
    }

    #[test]
    fn selector_index_outside_braces_is_captured() {
        let (result, _) = parse_ok("{{button}}[0]->focus();");
        let selector =
            find_kind(&result, |k| matches!(k, JsNodeKind::EnhancedSelector { .. })).unwrap();
        match selector {
            JsNodeKind::EnhancedSelector { index, classification, .. } => {
                assert_eq!(*index, Some(0));
                assert_eq!(*classification, SelectorClassification::Indexed);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn selector_index_inside_braces_is_equivalent() {
        let (result, _) = parse_ok("{{button[2]}}->focus();");
        let selector =
            find_kind(&result, |k| matches!(k, JsNodeKind::EnhancedSelector { .. })).unwrap();
        match selector {
            JsNodeKind::EnhancedSelector { text, index, .. } => {
                assert_eq!(text, "button");
                assert_eq!(*index, Some(2));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn vir_declaration_records_function_keys() {
        let (result, registry) =
            parse_ok("vir Btn = listen({ click: () => { x = 1; }, hover: () => { y = 2; } });");
        let vir = find_kind(&result, |k| matches!(k, JsNodeKind::VirDeclaration { .. })).unwrap();
        match vir {
            JsNodeKind::VirDeclaration {
                name,
                function_keys,
            } => {
                assert_eq!(name, "Btn");
                assert_eq!(function_keys, &vec!["click".to_string(), "hover".to_string()]);
            }
            _ => unreachable!(),
        }
        assert!(registry.is_vir("Btn"));
        assert_eq!(
            registry.vir("Btn").unwrap().function_keys,
            vec!["click".to_string(), "hover".to_string()]
        );
    }

    #[test]
    fn vir_access_after_declaration_is_lifted() {
        let (result, _) = parse_ok("vir V = listen({ go: () => { a(); } });\nV->go();");
        let access = find_kind(&result, |k| matches!(k, JsNodeKind::VirAccess { .. })).unwrap();
        match access {
            JsNodeKind::VirAccess {
                target,
                member,
                is_call,
            } => {
                assert_eq!(target, "V");
                assert_eq!(member, "go");
                assert!(is_call);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn listen_call_on_selector_builds_call_node() {
        let (result, _) = parse_ok("{{.btn}}->listen({ click: () => { f(); } });");
        let call = find_kind(&result, |k| matches!(k, JsNodeKind::Call { .. })).unwrap();
        assert!(matches!(
            call,
            JsNodeKind::Call {
                kind: CallKind::Listen
            }
        ));
    }

    #[test]
    fn builtin_call_requires_object_literal_argument() {
        let mut registry = JsRegistry::new();
        let result = parse_script("listen(42);", "<script>", true, &mut registry);
        assert!(result.diagnostics.has_errors());
    }

    #[test]
    fn state_tagged_properties_register_state_functions() {
        let (_, registry) = parse_ok(
            "vir Guard = iNeverAway({ greet<Happy>: () => { a(); }, greet<Sad>: () => { b(); } });",
        );
        let happy = registry.resolve_state_function("greet", "Happy").unwrap();
        let sad = registry.resolve_state_function("greet", "Sad").unwrap();
        assert!(happy.starts_with("__chtljs_greet_Happy_"));
        assert!(sad.starts_with("__chtljs_greet_Sad_"));
        assert_ne!(happy, sad);
    }

    #[test]
    fn state_call_site_is_lifted() {
        let (result, _) = parse_ok(
            "vir G = iNeverAway({ greet<Happy>: () => { a(); } });\ngreet<Happy>();",
        );
        let call = find_kind(&result, |k| matches!(k, JsNodeKind::FunctionWithState { .. }))
            .unwrap();
        match call {
            JsNodeKind::FunctionWithState { name, tag } => {
                assert_eq!(name, "greet");
                assert_eq!(tag, "Happy");
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn raw_js_statement_passes_through_verbatim() {
        let (result, _) = parse_ok("let total = items.reduce((a, b) => a + b, 0);");
        let fragment = find_kind(&result, |k| matches!(k, JsNodeKind::JsFragment { .. })).unwrap();
        match fragment {
            JsNodeKind::JsFragment { text } => {
                assert_eq!(text, "let total = items.reduce((a, b) => a + b, 0);");
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn block_statement_passes_through_whole() {
        let (result, _) = parse_ok("function helper(a) { return a * 2; }\nlet x = 1;");
        let doc = &result.document;
        let children = doc.children(doc.root());
        assert_eq!(children.len(), 2);
        match &doc.node(children[0]).kind {
            JsNodeKind::JsFragment { text } => {
                assert!(text.starts_with("function helper"));
                assert!(text.ends_with('}'));
            }
            other => panic!("expected fragment, got {other:?}"),
        }
    }

    #[test]
    fn preserved_comment_lowers_to_line_comment() {
        let (result, _) = parse_ok("-- note to self\nlet x = 1;");
        let fragment = find_kind(&result, |k| {
            matches!(k, JsNodeKind::JsFragment { text } if text.starts_with("//"))
        });
        assert!(fragment.is_some());
    }

    #[test]
    fn delegate_call_with_selector_parent() {
        let (result, _) = parse_ok(
            "{{#menu}}->delegate({ target: {{.item}}, click: () => { go(); } });",
        );
        let call = find_kind(&result, |k| {
            matches!(
                k,
                JsNodeKind::Call {
                    kind: CallKind::Delegate
                }
            )
        });
        assert!(call.is_some());
    }
}
