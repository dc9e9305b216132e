//! JavaScript generator for the CHTL-JS AST.
//!
//! Walks the parsed tree and produces JS text plus a side record of
//! generated functions, vir mappings and used selectors. The runtime
//! prelude is a single constant checked into the crate; the generator
//! only emits uses of it.

use crate::ast::{CallKind, JsDocument, JsNodeId, JsNodeKind};
use crate::registry::JsRegistry;
use chtl_core::Diagnostics;
use std::collections::{BTreeMap, BTreeSet};

/// The runtime helpers every emitted script relies on.
pub const RUNTIME_PRELUDE: &str = include_str!("runtime/prelude.js");

/// Options for JS emission.
#[derive(Debug, Clone, Copy)]
pub struct JsGenOptions {
    /// Two-space-style indentation and newline-terminated statements.
    pub pretty: bool,
    /// Indent width when pretty-printing.
    pub indent_size: usize,
    /// Whether to emit the runtime prelude ahead of the statements.
    pub include_prelude: bool,
}

impl Default for JsGenOptions {
    fn default() -> Self {
        Self {
            pretty: true,
            indent_size: 2,
            include_prelude: true,
        }
    }
}

/// Output of one generation run.
pub struct JsGenerateResult {
    /// True when no error diagnostic was recorded.
    pub ok: bool,
    /// The emitted JavaScript.
    pub javascript: String,
    /// Diagnostics recorded during emission.
    pub diagnostics: Diagnostics,
    /// Names of all synthesized global functions.
    pub generated_functions: BTreeSet<String>,
    /// `Vir->key` to generated-name mappings.
    pub vir_mappings: BTreeMap<String, String>,
    /// Enhanced selectors the emitted code uses.
    pub used_selectors: BTreeSet<String>,
}

/// Generate JavaScript for a parsed script document.
pub fn generate(
    doc: &JsDocument,
    registry: &mut JsRegistry,
    options: &JsGenOptions,
) -> JsGenerateResult {
    let mut emitter = Emitter {
        doc,
        registry,
        out: String::with_capacity(4096),
        indent: 0,
        options: *options,
        diagnostics: Diagnostics::new(),
        generated_functions: BTreeSet::new(),
        vir_mappings: BTreeMap::new(),
        used_selectors: BTreeSet::new(),
    };

    if options.include_prelude {
        emitter.out.push_str(RUNTIME_PRELUDE);
        emitter.newline();
    }

    let local = doc.is_local();
    if local {
        emitter.line("(function() {");
        emitter.indent += 1;
        emitter.line("'use strict';");
    }
    for &child in doc.children(doc.root()) {
        emitter.emit_statement(child);
    }
    if local {
        emitter.indent -= 1;
        emitter.line("})();");
    }

    let ok = !emitter.diagnostics.has_errors();
    log::debug!(
        "generated {} bytes of js, {} functions, {} selectors",
        emitter.out.len(),
        emitter.generated_functions.len(),
        emitter.used_selectors.len()
    );
    JsGenerateResult {
        ok,
        javascript: emitter.out,
        diagnostics: emitter.diagnostics,
        generated_functions: emitter.generated_functions,
        vir_mappings: emitter.vir_mappings,
        used_selectors: emitter.used_selectors,
    }
}

/// The fixed global name for a vir object's generated function.
pub fn vir_function_name(vir: &str, key: &str) -> String {
    format!("__chtljs_vir_{vir}_{key}")
}

struct Emitter<'a> {
    doc: &'a JsDocument,
    registry: &'a mut JsRegistry,
    out: String,
    indent: usize,
    options: JsGenOptions,
    diagnostics: Diagnostics,
    generated_functions: BTreeSet<String>,
    vir_mappings: BTreeMap<String, String>,
    used_selectors: BTreeSet<String>,
}

impl<'a> Emitter<'a> {
    fn newline(&mut self) {
        self.out.push('\n');
    }

    fn write_indent(&mut self) {
        if self.options.pretty {
            for _ in 0..self.indent * self.options.indent_size {
                self.out.push(' ');
            }
        }
    }

    /// Emit one full line at the current indent.
    fn line(&mut self, text: &str) {
        self.write_indent();
        self.out.push_str(text);
        self.newline();
    }

    fn emit_statement(&mut self, node: JsNodeId) {
        match self.doc.node(node).kind.clone() {
            JsNodeKind::VirDeclaration {
                name,
                function_keys,
            } => {
                self.emit_vir_declaration(node, name, function_keys);
            }
            JsNodeKind::ExprStmt => {
                let children: Vec<JsNodeId> = self.doc.children(node).to_vec();
                if children.is_empty() {
                    return;
                }
                self.write_indent();
                let start = self.out.len();
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        // Verbatim tails keep a separating space; extra
                        // whitespace is harmless JS.
                        if !matches!(
                            &self.doc.node(*child).kind,
                            JsNodeKind::JsFragment { text } if text.starts_with(';')
                        ) {
                            self.out.push(' ');
                        }
                    }
                    self.emit_expr(*child);
                }
                let emitted = &self.out[start..];
                if !emitted.ends_with(';') && !emitted.ends_with('}') {
                    self.out.push(';');
                }
                self.newline();
            }
            JsNodeKind::JsFragment { text } => self.line(&text),
            _ => {
                self.write_indent();
                self.emit_expr(node);
                self.out.push(';');
                self.newline();
            }
        }
    }

    /// A vir declaration emits no binding; each declared key becomes a
    /// global function instead.
    fn emit_vir_declaration(&mut self, node: JsNodeId, name: String, function_keys: Vec<String>) {
        let initializer = self.doc.children(node).first().copied();
        let config = initializer.and_then(|init| self.call_config(init));
        let is_never_away = initializer.is_some_and(|init| {
            matches!(
                self.doc.node(init).kind,
                JsNodeKind::Call {
                    kind: CallKind::INeverAway
                }
            )
        });

        self.line(&format!("// vir {name}"));

        let mut emitted_keys: BTreeSet<String> = BTreeSet::new();
        if let Some(config) = config {
            let props: Vec<JsNodeId> = self.doc.children(config).to_vec();
            for prop in props {
                let JsNodeKind::Property { key, state_tag } = self.doc.node(prop).kind.clone()
                else {
                    continue;
                };
                let value = self
                    .doc
                    .children(prop)
                    .iter()
                    .copied()
                    .find(|&c| !matches!(self.doc.node(c).kind, JsNodeKind::StateTag { .. }));

                let function_name = match (&state_tag, is_never_away) {
                    (Some(tag), true) => match self.registry.resolve_state_function(&key, tag) {
                        Some(resolved) => resolved.to_string(),
                        None => {
                            let unique = self
                                .registry
                                .generate_unique_name(&format!("{key}_{tag}"));
                            self.registry.register_state_function(&key, tag, &unique);
                            unique
                        }
                    },
                    _ => vir_function_name(&name, &key),
                };

                self.emit_global_function(&function_name, value);
                self.generated_functions.insert(function_name.clone());
                if state_tag.is_none() {
                    self.vir_mappings
                        .insert(format!("{name}->{key}"), function_name);
                    emitted_keys.insert(key);
                }
            }
        }

        // Keys recorded at parse time but missing a config property still
        // get a stub so later accesses resolve.
        for key in function_keys {
            if !emitted_keys.contains(&key) && !self.vir_mappings.contains_key(&format!("{name}->{key}")) {
                let function_name = vir_function_name(&name, &key);
                if self.generated_functions.insert(function_name.clone()) {
                    self.line(&format!("window.{function_name} = function() {{}};"));
                }
                self.vir_mappings
                    .insert(format!("{name}->{key}"), function_name);
            }
        }
    }

    /// `window.<name> = function(params) { body };`
    fn emit_global_function(&mut self, name: &str, value: Option<JsNodeId>) {
        let rendered = match value.map(|v| self.doc.node(v).kind.clone()) {
            Some(JsNodeKind::ArrowFunction) | Some(JsNodeKind::FunctionDecl { .. }) => {
                let value = value.unwrap();
                let params = self.function_params(value);
                let body = self.function_body(value);
                format!("window.{name} = function({params}) {{ {body} }};")
            }
            Some(_) => {
                let value = value.unwrap();
                let mut expr = String::new();
                std::mem::swap(&mut self.out, &mut expr);
                self.emit_expr(value);
                std::mem::swap(&mut self.out, &mut expr);
                format!("window.{name} = function() {{ return {expr}; }};")
            }
            None => format!("window.{name} = function() {{}};"),
        };
        self.line(&rendered);
    }

    fn function_params(&self, function: JsNodeId) -> String {
        self.doc
            .children(function)
            .iter()
            .find_map(|&c| match &self.doc.node(c).kind {
                JsNodeKind::ParamList { text } => Some(text.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }

    fn function_body(&self, function: JsNodeId) -> String {
        self.doc
            .children(function)
            .iter()
            .find_map(|&c| match &self.doc.node(c).kind {
                JsNodeKind::Block { text } => Some(text.trim().to_string()),
                JsNodeKind::JsFragment { text } => Some(format!("return {};", text.trim())),
                _ => None,
            })
            .unwrap_or_default()
    }

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

    fn emit_expr(&mut self, node: JsNodeId) {
        match self.doc.node(node).kind.clone() {
            JsNodeKind::EnhancedSelector { text, index, .. } => {
                self.used_selectors.insert(text.clone());
                let literal = match index {
                    Some(i) => format!("{text}[{i}]"),
                    None => text,
                };
                self.out.push_str("__chtljs_select(");
                self.out.push_str(&js_string_literal(&literal));
                self.out.push(')');
            }
            JsNodeKind::ArrowOp | JsNodeKind::DotOp => {
                let children: Vec<JsNodeId> = self.doc.children(node).to_vec();
                if let Some(&left) = children.first() {
                    self.emit_expr(left);
                }
                // The arrow operator lowers to a dot.
                self.out.push('.');
                for &rest in children.iter().skip(1) {
                    self.emit_expr(rest);
                }
            }
            JsNodeKind::Call { kind } => self.emit_call(node, kind),
            JsNodeKind::VirAccess {
                target,
                member,
                is_call,
            } => {
                let mapping = self
                    .vir_mappings
                    .get(&format!("{target}->{member}"))
                    .cloned()
                    .or_else(|| {
                        self.registry.vir(&target).and_then(|vir| {
                            vir.function_keys
                                .contains(&member)
                                .then(|| vir_function_name(&target, &member))
                        })
                    });
                match mapping {
                    Some(name) => {
                        self.out.push_str(&name);
                        if is_call {
                            let args: Vec<JsNodeId> = self.doc.children(node).to_vec();
                            if args.is_empty() {
                                self.out.push_str("()");
                            } else {
                                for arg in args {
                                    self.emit_expr(arg);
                                }
                            }
                        }
                    }
                    None => {
                        self.out
                            .push_str(&format!("/* unresolved vir access: {target}->{member} */"));
                    }
                }
            }
            JsNodeKind::FunctionWithState { name, tag } => {
                match self.registry.resolve_state_function(&name, &tag) {
                    Some(resolved) => {
                        let resolved = resolved.to_string();
                        self.out.push_str(&resolved);
                        let args: Vec<JsNodeId> = self.doc.children(node).to_vec();
                        if args.is_empty() {
                            self.out.push_str("()");
                        } else {
                            for arg in args {
                                self.emit_expr(arg);
                            }
                        }
                    }
                    None => {
                        self.out.push_str(&format!(
                            "/* unresolved state function: {name}<{tag}> */"
                        ));
                    }
                }
            }
            JsNodeKind::ObjectLiteral => self.emit_object(node, false),
            JsNodeKind::Property { .. } => self.emit_property(node, false),
            JsNodeKind::Identifier { name } => self.out.push_str(&name),
            JsNodeKind::StringLit { raw } | JsNodeKind::NumberLit { raw } => {
                self.out.push_str(&raw)
            }
            JsNodeKind::BoolLit { value } => {
                self.out.push_str(if value { "true" } else { "false" })
            }
            JsNodeKind::ArrayLit => {
                self.out.push('[');
                let children: Vec<JsNodeId> = self.doc.children(node).to_vec();
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.emit_expr(*child);
                }
                self.out.push(']');
            }
            JsNodeKind::ArrowFunction => {
                let params = self.function_params(node);
                self.out.push('(');
                self.out.push_str(&params);
                self.out.push_str(") => ");
                let body = self
                    .doc
                    .children(node)
                    .iter()
                    .copied()
                    .find(|&c| {
                        matches!(
                            self.doc.node(c).kind,
                            JsNodeKind::Block { .. } | JsNodeKind::JsFragment { .. }
                        )
                    });
                match body.map(|b| self.doc.node(b).kind.clone()) {
                    Some(JsNodeKind::Block { text }) => {
                        self.out.push_str("{ ");
                        self.out.push_str(text.trim());
                        self.out.push_str(" }");
                    }
                    Some(JsNodeKind::JsFragment { text }) => self.out.push_str(text.trim()),
                    _ => self.out.push_str("{}"),
                }
            }
            JsNodeKind::FunctionDecl { name } => {
                let params = self.function_params(node);
                let body = self.function_body(node);
                self.out.push_str("function");
                if let Some(name) = name {
                    self.out.push(' ');
                    self.out.push_str(&name);
                }
                self.out.push('(');
                self.out.push_str(&params);
                self.out.push_str(") { ");
                self.out.push_str(&body);
                self.out.push_str(" }");
            }
            JsNodeKind::JsFragment { text } => self.out.push_str(&text),
            JsNodeKind::Block { text } => {
                self.out.push_str("{ ");
                self.out.push_str(text.trim());
                self.out.push_str(" }");
            }
            JsNodeKind::ExprStmt => {
                let children: Vec<JsNodeId> = self.doc.children(node).to_vec();
                for child in children {
                    self.emit_expr(child);
                }
            }
            JsNodeKind::StateTag { .. }
            | JsNodeKind::ParamList { .. }
            | JsNodeKind::Document { .. }
            | JsNodeKind::ScriptBlock
            | JsNodeKind::VirDeclaration { .. } => {
                log::warn!(
                    "unhandled chtl-js node in expression position: {:?}",
                    self.doc.node(node).kind
                );
            }
        }
    }

    fn emit_call(&mut self, node: JsNodeId, kind: CallKind) {
        let children: Vec<JsNodeId> = self.doc.children(node).to_vec();
        let config = children
            .iter()
            .copied()
            .find(|&c| matches!(self.doc.node(c).kind, JsNodeKind::ObjectLiteral));
        let target = children
            .iter()
            .copied()
            .find(|&c| Some(c) != config && !matches!(self.doc.node(c).kind, JsNodeKind::StateTag { .. }));

        match kind {
            CallKind::Listen => {
                self.out.push_str("__chtljs_listen(");
                match target {
                    Some(target) => self.emit_expr(target),
                    None => self.out.push_str("null"),
                }
                self.out.push_str(", ");
                match config {
                    Some(config) => self.emit_object(config, false),
                    None => self.out.push_str("{}"),
                }
                self.out.push(')');
            }
            CallKind::Delegate => {
                self.record_delegation(target, config);
                self.out.push_str("__chtljs_delegate(");
                match target {
                    Some(target) => self.emit_expr(target),
                    None => self.out.push_str("document.body"),
                }
                self.out.push_str(", ");
                match config {
                    Some(config) => self.emit_object(config, true),
                    None => self.out.push_str("{}"),
                }
                self.out.push(')');
            }
            CallKind::Animate => {
                self.out.push_str("__chtljs_animate(");
                match config {
                    Some(config) => self.emit_object(config, false),
                    None => self.out.push_str("{}"),
                }
                self.out.push(')');
            }
            CallKind::INeverAway | CallKind::PrintMyLove => {
                let name = kind.name();
                let config_text = match config {
                    Some(config) => {
                        let mut text = String::new();
                        std::mem::swap(&mut self.out, &mut text);
                        self.emit_object(config, false);
                        std::mem::swap(&mut self.out, &mut text);
                        text
                    }
                    None => "{}".to_string(),
                };
                match self.registry.synthesizer(name) {
                    Some(synthesizer) => {
                        let output = synthesizer(&config_text);
                        self.out.push_str(&output);
                    }
                    None => {
                        self.out
                            .push_str(&format!("/* {name}: no extension synthesizer installed */"));
                    }
                }
            }
        }
    }

    /// Record a delegation when the parent is an enhanced selector.
    fn record_delegation(&mut self, target: Option<JsNodeId>, config: Option<JsNodeId>) {
        let Some(target) = target else { return };
        let JsNodeKind::EnhancedSelector { text, .. } = &self.doc.node(target).kind else {
            return;
        };
        let parent_selector = text.clone();
        let mut events = Vec::new();
        if let Some(config) = config {
            for &prop in self.doc.children(config) {
                if let JsNodeKind::Property { key, .. } = &self.doc.node(prop).kind
                    && key != "target"
                {
                    events.push(key.clone());
                }
            }
        }
        self.registry.register_delegation(&parent_selector, &events);
    }

    fn emit_object(&mut self, node: JsNodeId, delegate_config: bool) {
        let children: Vec<JsNodeId> = self.doc.children(node).to_vec();
        if children.is_empty() {
            self.out.push_str("{}");
            return;
        }
        self.out.push_str("{ ");
        for (i, child) in children.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.emit_property(*child, delegate_config);
        }
        self.out.push_str(" }");
    }

    fn emit_property(&mut self, node: JsNodeId, delegate_config: bool) {
        let JsNodeKind::Property { key, .. } = self.doc.node(node).kind.clone() else {
            self.emit_expr(node);
            return;
        };
        self.out.push_str(&js_string_literal(&key));
        self.out.push_str(": ");

        let value = self
            .doc
            .children(node)
            .iter()
            .copied()
            .find(|&c| !matches!(self.doc.node(c).kind, JsNodeKind::StateTag { .. }));
        match value {
            Some(value) => {
                // Delegation targets stay selector strings so the runtime
                // can match descendants with `closest`.
                if delegate_config && key == "target" {
                    if let JsNodeKind::EnhancedSelector { text, index, .. } =
                        self.doc.node(value).kind.clone()
                    {
                        let literal = match index {
                            Some(i) => format!("{text}[{i}]"),
                            None => text.clone(),
                        };
                        self.used_selectors.insert(text);
                        self.out.push_str(&js_string_literal(&literal));
                        return;
                    }
                }
                self.emit_expr(value);
            }
            None => self.out.push_str("undefined"),
        }
    }
}

/// Convert a Rust string to a JavaScript string literal.
///
/// Uses JSON serialization to properly escape special characters.
pub fn js_string_literal(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_script;

    fn compile(text: &str) -> JsGenerateResult {
        let mut registry = JsRegistry::new();
        let parsed = parse_script(text, "<script>", true, &mut registry);
        assert!(
            !parsed.diagnostics.has_errors(),
            "parse diagnostics: {:?}",
            parsed.diagnostics.iter().collect::<Vec<_>>()
        );
        generate(&parsed.document, &mut registry, &JsGenOptions::default())
    }

    #[test]
    fn prelude_is_emitted_once_at_the_top() {
        let result = compile("{{.b}}->textContent = \"ok\";");
        assert!(result.javascript.starts_with("// chtl-js runtime"));
        assert_eq!(result.javascript.matches("__chtljs_select = function").count(), 1);
    }

    #[test]
    fn selector_lowers_to_select_call() {
        let result = compile("{{.b}}->textContent = \"ok\";");
        assert!(
            result
                .javascript
                .contains("__chtljs_select(\".b\").textContent = \"ok\";")
        );
        assert!(result.used_selectors.contains(".b"));
    }

    #[test]
    fn selector_index_folds_into_the_literal() {
        let result = compile("{{button}}[1]->focus();");
        assert!(result.javascript.contains("__chtljs_select(\"button[1]\")"));
    }

    #[test]
    fn vir_declaration_emits_global_functions_not_bindings() {
        let result = compile("vir Btn = listen({ click: () => { x = 1; } });");
        assert!(
            result
                .javascript
                .contains("window.__chtljs_vir_Btn_click = function() { x = 1; };")
        );
        assert!(!result.javascript.contains("var Btn"));
        assert!(!result.javascript.contains("let Btn"));
        assert_eq!(
            result.vir_mappings.get("Btn->click").map(String::as_str),
            Some("__chtljs_vir_Btn_click")
        );
        assert!(result.generated_functions.contains("__chtljs_vir_Btn_click"));
    }

    #[test]
    fn vir_access_calls_the_generated_function() {
        let result = compile("vir V = listen({ go: () => { a(); } });\nV->go();");
        assert!(result.javascript.contains("__chtljs_vir_V_go()"));
    }

    #[test]
    fn listen_on_selector_lowers_to_listen_helper() {
        let result = compile("{{.btn}}->listen({ click: () => { f(); } });");
        assert!(
            result
                .javascript
                .contains("__chtljs_listen(__chtljs_select(\".btn\"), { \"click\": () => { f(); } })")
        );
    }

    #[test]
    fn delegate_keeps_target_as_selector_string() {
        let result =
            compile("{{#menu}}->delegate({ target: {{.item}}, click: () => { go(); } });");
        assert!(
            result
                .javascript
                .contains("__chtljs_delegate(__chtljs_select(\"#menu\"), { \"target\": \".item\"")
        );
    }

    #[test]
    fn animate_carries_config_verbatim_shape() {
        let result = compile("animate({ target: {{.box}}, duration: 300 });");
        assert!(result.javascript.contains("__chtljs_animate({ \"target\": "));
        assert!(result.javascript.contains("\"duration\": 300"));
    }

    #[test]
    fn state_tagged_vir_uses_registered_unique_names() {
        let result = compile(
            "vir G = iNeverAway({ greet<Happy>: () => { a(); } });\ngreet<Happy>();",
        );
        // The declaration and the call site agree on the emitted name.
        let name_at_decl = result
            .generated_functions
            .iter()
            .find(|f| f.starts_with("__chtljs_greet_Happy_"))
            .expect("state function emitted");
        assert!(result.javascript.contains(&format!("{name_at_decl}()")));
    }

    #[test]
    fn print_my_love_without_extension_is_a_placeholder() {
        let result = compile("printMylove({ to: \"you\" });");
        assert!(
            result
                .javascript
                .contains("/* printMylove: no extension synthesizer installed */")
        );
    }

    #[test]
    fn extension_synthesizer_output_is_spliced() {
        let mut registry = JsRegistry::new();
        let parsed = parse_script(
            "printMylove({ to: \"you\" });",
            "<script>",
            true,
            &mut registry,
        );
        registry.register_synthesizer(
            "printMylove",
            Box::new(|config| format!("console.log({config})")),
        );
        let result = generate(&parsed.document, &mut registry, &JsGenOptions::default());
        assert!(result.javascript.contains("console.log({ \"to\": \"you\" })"));
    }

    #[test]
    fn local_document_wraps_in_iife() {
        let result = compile("let x = 1;");
        assert!(result.javascript.contains("(function() {"));
        assert!(result.javascript.contains("'use strict';"));
        assert!(result.javascript.trim_end().ends_with("})();"));
    }

    #[test]
    fn global_document_has_no_wrapper() {
        let mut registry = JsRegistry::new();
        let parsed = parse_script("let x = 1;", "<script>", false, &mut registry);
        let result = generate(&parsed.document, &mut registry, &JsGenOptions::default());
        assert!(!result.javascript.contains("'use strict';"));
    }

    #[test]
    fn raw_fragments_survive_verbatim() {
        let result = compile("const n = window.items.filter((i) => i.ok).length;");
        assert!(
            result
                .javascript
                .contains("const n = window.items.filter((i) => i.ok).length;")
        );
    }

    #[test]
    fn delegation_registry_records_parent_and_events() {
        let mut registry = JsRegistry::new();
        let parsed = parse_script(
            "{{#menu}}->delegate({ target: {{.item}}, click: () => { a(); }, keydown: () => { b(); } });",
            "<script>",
            true,
            &mut registry,
        );
        let _ = generate(&parsed.document, &mut registry, &JsGenOptions::default());
        let delegation = registry.delegation("#menu").expect("delegation recorded");
        assert_eq!(delegation.events, vec!["click".to_string(), "keydown".to_string()]);
    }
}
