//! HTML and CSS generation for the expanded CHTL tree.
//!
//! Walks the tree with an emitter context that buffers HTML, CSS and JS
//! separately. Local `style {}` blocks scope their rules through a
//! stable synthetic class; `script {}` bodies run through the CHTL-JS
//! subpipeline and land in the JS buffer.

use chtl_core::ast::{Document, NodeId, NodeKind};
use chtl_core::{CompileOptions, Diagnostic, Diagnostics, GlobalRegistry, Source};
use chtl_js::{JsGenOptions, JsRegistry, compile_script};
use once_cell::sync::Lazy;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Void elements that self-close and take no children.
static VOID_ELEMENTS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
        "source", "track", "wbr",
    ]
    .into_iter()
    .collect()
});

/// The three textual artifacts plus everything collected on the way.
pub struct GeneratedUnit {
    /// Element tree markup (no trailing style/script sections).
    pub html: String,
    /// Accumulated CSS.
    pub css: String,
    /// Accumulated JS (prelude first).
    pub js: String,
    /// Diagnostics recorded during generation.
    pub diagnostics: Diagnostics,
    /// Names of all synthesized JS functions.
    pub generated_functions: BTreeSet<String>,
    /// `Vir->key` mappings from the CHTL-JS subpipeline.
    pub vir_mappings: BTreeMap<String, String>,
    /// Enhanced selectors the emitted JS uses.
    pub used_selectors: BTreeSet<String>,
    /// Tag of the first emitted root element, for doctype handling.
    pub root_tag: Option<String>,
}

/// Generate HTML, CSS and JS for an expanded document.
pub fn generate_unit(
    document: &Document,
    registry: &GlobalRegistry,
    source: &Source,
    options: &CompileOptions,
) -> GeneratedUnit {
    let mut emitter = HtmlEmitter {
        doc: document,
        registry,
        source,
        options: *options,
        html: String::with_capacity(1024),
        css: String::new(),
        js: String::new(),
        js_registry: JsRegistry::new(),
        diagnostics: Diagnostics::new(),
        generated_functions: BTreeSet::new(),
        vir_mappings: BTreeMap::new(),
        used_selectors: BTreeSet::new(),
        class_counter: 0,
        indent: 0,
        prelude_emitted: false,
        root_tag: None,
    };

    for &child in document.children(document.root()) {
        emitter.emit_node(child);
    }

    log::debug!(
        "generated {}: {}B html, {}B css, {}B js",
        source.name,
        emitter.html.len(),
        emitter.css.len(),
        emitter.js.len()
    );
    GeneratedUnit {
        html: emitter.html,
        css: emitter.css,
        js: emitter.js,
        diagnostics: emitter.diagnostics,
        generated_functions: emitter.generated_functions,
        vir_mappings: emitter.vir_mappings,
        used_selectors: emitter.used_selectors,
        root_tag: emitter.root_tag,
    }
}

struct HtmlEmitter<'a> {
    doc: &'a Document,
    registry: &'a GlobalRegistry,
    source: &'a Source,
    options: CompileOptions,
    html: String,
    css: String,
    js: String,
    js_registry: JsRegistry,
    diagnostics: Diagnostics,
    generated_functions: BTreeSet<String>,
    vir_mappings: BTreeMap<String, String>,
    used_selectors: BTreeSet<String>,
    class_counter: usize,
    indent: usize,
    prelude_emitted: bool,
    root_tag: Option<String>,
}

impl<'a> HtmlEmitter<'a> {
    fn pretty(&self) -> bool {
        self.options.effective_pretty()
    }

    fn push_indent(&mut self) {
        if self.pretty() {
            for _ in 0..self.indent * self.options.indent_size {
                self.html.push(' ');
            }
        }
    }

    fn push_newline(&mut self) {
        if self.pretty() {
            self.html.push('\n');
        }
    }

    fn emit_node(&mut self, node: NodeId) {
        match self.doc.node(node).kind.clone() {
            NodeKind::Element { tag } => {
                if self.root_tag.is_none() && self.indent == 0 {
                    self.root_tag = Some(tag.clone());
                }
                self.emit_element(node, &tag);
            }
            NodeKind::TextBlock { text } => {
                self.push_indent();
                self.html
                    .push_str(&html_escape::encode_text(&text));
                self.push_newline();
            }
            NodeKind::StyleBlock { local: false } => self.emit_global_style(node),
            NodeKind::StyleBlock { local: true } => {
                // Local styles are consumed by their owning element.
            }
            NodeKind::ScriptBlock { local, text } => self.emit_script(node, local, &text),
            NodeKind::OriginEmbed {
                language,
                name,
                text,
            } => self.emit_origin(node, &language, name.as_deref(), &text),
            NodeKind::Comment { text, preserved } => {
                let placeholder = self.doc.node(node).attribute("placeholder").is_some();
                if placeholder || (preserved && self.options.include_comments) {
                    self.push_indent();
                    self.html.push_str("<!-- ");
                    self.html.push_str(&text);
                    self.html.push_str(" -->");
                    self.push_newline();
                }
            }
            NodeKind::Namespace { .. } => {
                // Namespace bodies contribute their content.
                for child in self.doc.children(node).to_vec() {
                    self.emit_node(child);
                }
            }
            NodeKind::TemplateDecl { .. }
            | NodeKind::CustomDecl { .. }
            | NodeKind::Configuration { .. }
            | NodeKind::Except { .. }
            | NodeKind::Attribute { .. } => {}
            NodeKind::Use { name, .. } => {
                // Only reachable when expansion was cut short.
                self.push_indent();
                self.html.push_str("<!-- unresolved: ");
                self.html.push_str(&name);
                self.html.push_str(" -->");
                self.push_newline();
            }
            other => {
                log::warn!("unhandled node kind in html generation: {}", other.label());
            }
        }
    }

    fn emit_element(&mut self, node: NodeId, tag: &str) {
        let children: Vec<NodeId> = self.doc.children(node).to_vec();

        // Attributes in declaration order.
        let mut attributes: Vec<(String, String)> = children
            .iter()
            .filter_map(|&c| match &self.doc.node(c).kind {
                NodeKind::Attribute { name, value } => Some((name.clone(), value.clone())),
                _ => None,
            })
            .collect();

        // A local style block scopes through a synthetic class.
        let local_styles: Vec<NodeId> = children
            .iter()
            .copied()
            .filter(|&c| matches!(self.doc.node(c).kind, NodeKind::StyleBlock { local: true }))
            .collect();
        if local_styles
            .iter()
            .any(|&style| !self.doc.children(style).is_empty())
        {
            let class = format!("_c{}", self.class_counter);
            self.class_counter += 1;
            for &style in &local_styles {
                self.emit_local_style(style, &class);
            }
            match attributes.iter_mut().find(|(name, _)| name == "class") {
                Some((_, value)) => {
                    value.push(' ');
                    value.push_str(&class);
                }
                None => attributes.push(("class".to_string(), class)),
            }
        }

        self.push_indent();
        self.html.push('<');
        self.html.push_str(tag);
        for (name, value) in &attributes {
            self.html.push(' ');
            self.html.push_str(name);
            self.html.push_str("=\"");
            self.html
                .push_str(&html_escape::encode_double_quoted_attribute(value));
            self.html.push('"');
        }

        if VOID_ELEMENTS.contains(tag) {
            self.html.push_str("/>");
            self.push_newline();
            return;
        }
        self.html.push('>');

        // Content children: everything except attributes and the local
        // styles consumed above.
        let content: Vec<NodeId> = children
            .iter()
            .copied()
            .filter(|&c| {
                !matches!(
                    self.doc.node(c).kind,
                    NodeKind::Attribute { .. } | NodeKind::StyleBlock { local: true }
                )
            })
            .collect();

        let inline_only = content.iter().all(|&c| {
            matches!(
                self.doc.node(c).kind,
                NodeKind::TextBlock { .. } | NodeKind::Comment { .. }
            )
        });

        if inline_only {
            for &child in &content {
                match self.doc.node(child).kind.clone() {
                    NodeKind::TextBlock { text } => {
                        self.html.push_str(&html_escape::encode_text(&text));
                    }
                    NodeKind::Comment { text, preserved } => {
                        let placeholder =
                            self.doc.node(child).attribute("placeholder").is_some();
                        if placeholder || (preserved && self.options.include_comments) {
                            self.html.push_str("<!-- ");
                            self.html.push_str(&text);
                            self.html.push_str(" -->");
                        }
                    }
                    _ => {}
                }
            }
        } else {
            self.push_newline();
            self.indent += 1;
            for &child in &content {
                self.emit_node(child);
            }
            self.indent -= 1;
            self.push_indent();
        }

        self.html.push_str("</");
        self.html.push_str(tag);
        self.html.push('>');
        self.push_newline();
    }

    // Styles

    fn emit_local_style(&mut self, style: NodeId, class: &str) {
        let mut properties: Vec<(String, String)> = Vec::new();
        for child in self.doc.children(style).to_vec() {
            match self.doc.node(child).kind.clone() {
                NodeKind::StyleProperty { name, value } => {
                    let value = self.property_value(child, &value);
                    properties.push((name, value));
                }
                NodeKind::StyleRule { selector } => {
                    let scoped = if selector.contains('&') {
                        selector.replace('&', &format!(".{class}"))
                    } else {
                        format!(".{class} {selector}")
                    };
                    self.emit_rule_properties(child, &scoped);
                }
                NodeKind::Comment { text, preserved } => {
                    if preserved && self.options.include_comments {
                        self.push_css_comment(&text);
                    }
                }
                other => {
                    log::warn!("unhandled node in local style: {}", other.label());
                }
            }
        }
        if !properties.is_empty() {
            self.push_css_rule(&format!(".{class}"), &properties);
        }
    }

    fn emit_global_style(&mut self, style: NodeId) {
        let mut bare: Vec<(String, String)> = Vec::new();
        for &child in self.doc.children(style).to_vec().iter() {
            match self.doc.node(child).kind.clone() {
                NodeKind::StyleRule { selector } => self.emit_rule_properties(child, &selector),
                NodeKind::StyleProperty { name, value } => {
                    let value = self.property_value(child, &value);
                    bare.push((name, value));
                }
                NodeKind::Comment { text, preserved } => {
                    if preserved && self.options.include_comments {
                        self.push_css_comment(&text);
                    }
                }
                other => {
                    log::warn!("unhandled node in global style: {}", other.label());
                }
            }
        }
        // Selector-less properties at the top level scope to the root.
        if !bare.is_empty() {
            self.push_css_rule(":root", &bare);
        }
    }

    fn emit_rule_properties(&mut self, rule: NodeId, selector: &str) {
        let properties: Vec<(String, String)> = self
            .doc
            .children(rule)
            .iter()
            .filter_map(|&c| match &self.doc.node(c).kind {
                NodeKind::StyleProperty { name, value } => {
                    Some((name.clone(), (c, value.clone())))
                }
                _ => None,
            })
            .map(|(name, (node, value))| {
                let value = self.property_value(node, &value);
                (name, value)
            })
            .collect();
        self.push_css_rule(selector, &properties);
    }

    /// Unresolved variable references still emit a placeholder value.
    fn property_value(&self, property: NodeId, value: &str) -> String {
        match self.doc.node(property).attribute("unresolved") {
            Some(name) => format!("/* unresolved: {name} */"),
            None => value.to_string(),
        }
    }

    fn push_css_rule(&mut self, selector: &str, properties: &[(String, String)]) {
        if properties.is_empty() {
            return;
        }
        if self.pretty() {
            self.css.push_str(selector);
            self.css.push_str(" {\n");
            for (name, value) in properties {
                for _ in 0..self.options.indent_size {
                    self.css.push(' ');
                }
                self.css.push_str(name);
                self.css.push_str(": ");
                self.css.push_str(value);
                self.css.push_str(";\n");
            }
            self.css.push_str("}\n");
        } else {
            self.css.push_str(selector);
            self.css.push('{');
            for (i, (name, value)) in properties.iter().enumerate() {
                if i > 0 {
                    self.css.push(';');
                }
                self.css.push_str(name);
                self.css.push(':');
                self.css.push_str(value);
            }
            self.css.push('}');
        }
    }

    fn push_css_comment(&mut self, text: &str) {
        self.css.push_str("/* ");
        self.css.push_str(text);
        self.css.push_str(" */");
        if self.pretty() {
            self.css.push('\n');
        }
    }

    // Scripts

    fn emit_script(&mut self, node: NodeId, local: bool, text: &str) {
        let js_options = JsGenOptions {
            pretty: true,
            indent_size: self.options.indent_size,
            include_prelude: !self.prelude_emitted,
        };
        self.prelude_emitted = true;

        let result = compile_script(text, &self.source.name, local, &mut self.js_registry, &js_options);
        self.remap_script_diagnostics(node, result.diagnostics);
        self.js.push_str(&result.javascript);
        self.generated_functions.extend(result.generated_functions);
        self.vir_mappings.extend(result.vir_mappings);
        self.used_selectors.extend(result.used_selectors);
    }

    /// Script diagnostics are 1-based within the block; shift them to the
    /// enclosing source.
    fn remap_script_diagnostics(&mut self, node: NodeId, diagnostics: Diagnostics) {
        let span = self.doc.node(node).span;
        let content_offset = self.source.text[span.start..span.end.min(self.source.text.len())]
            .find('{')
            .map(|brace| span.start + brace + 1)
            .unwrap_or(span.start);
        let (base_line, base_column) = self.source.line_col(content_offset);

        for diagnostic in diagnostics {
            let line = base_line + diagnostic.line - 1;
            let column = if diagnostic.line == 1 {
                base_column + diagnostic.column - 1
            } else {
                diagnostic.column
            };
            self.diagnostics.push(Diagnostic {
                severity: diagnostic.severity,
                file: self.source.name.clone(),
                line,
                column,
                message: diagnostic.message,
                span: diagnostic.span,
            });
        }
    }

    // Origin embeds

    fn emit_origin(&mut self, node: NodeId, language: &str, name: Option<&str>, text: &str) {
        // Reference form: splice the registered block.
        let use_form = self.doc.node(node).attribute("use").is_some();
        if !use_form && name.is_some() {
            // A named block is a registered definition; only references
            // and anonymous embeds emit.
            return;
        }
        let resolved;
        let text = if use_form {
            match name.and_then(|n| self.registry.origin(n)) {
                Some(block) => {
                    resolved = block.text.clone();
                    resolved.as_str()
                }
                None => {
                    self.push_indent();
                    self.html.push_str("<!-- unresolved: ");
                    self.html.push_str(name.unwrap_or("origin"));
                    self.html.push_str(" -->");
                    self.push_newline();
                    return;
                }
            }
        } else {
            text
        };

        match language {
            "@Html" => {
                self.push_indent();
                self.html.push_str(text.trim());
                self.push_newline();
            }
            "@Style" | "@Css" => {
                self.css.push_str(text.trim());
                if self.pretty() {
                    self.css.push('\n');
                }
            }
            "@JavaScript" | "@Js" => {
                self.js.push_str(text.trim());
                self.js.push('\n');
            }
            other => {
                let span = self.doc.node(node).span;
                let (line, column) = self.source.line_col(span.start);
                self.diagnostics.push(Diagnostic::warning(
                    self.source.name.clone(),
                    line,
                    column,
                    format!("origin language `{other}` is not routed; block skipped"),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expand::expand;
    use chtl_core::parse;

    fn generate(text: &str, options: CompileOptions) -> GeneratedUnit {
        let source = Source::anonymous(text);
        let parsed = parse(&source);
        assert!(
            !parsed.diagnostics.has_errors(),
            "parse diagnostics: {:?}",
            parsed.diagnostics.iter().collect::<Vec<_>>()
        );
        let mut document = parsed.document;
        let expand_diags = expand(&mut document, &parsed.registry, &source);
        assert!(!expand_diags.has_errors());
        generate_unit(&document, &parsed.registry, &source, &options)
    }

    #[test]
    fn minimal_element_is_exactly_nested_tags() {
        let unit = generate("body { div { text { Hi } } }", CompileOptions::default());
        assert_eq!(unit.html, "<body><div>Hi</div></body>");
        assert!(unit.css.is_empty());
        assert!(unit.js.is_empty());
    }

    #[test]
    fn attributes_render_in_declaration_order() {
        let unit = generate(
            "div { id: box; title: \"a & b\"; }",
            CompileOptions::default(),
        );
        assert_eq!(unit.html, "<div id=\"box\" title=\"a &amp; b\"></div>");
    }

    #[test]
    fn text_content_is_escaped() {
        let unit = generate("div { text { a < b } }", CompileOptions::default());
        assert_eq!(unit.html, "<div>a &lt; b</div>");
    }

    #[test]
    fn void_elements_self_close() {
        let unit = generate("div { br {} img { src: x.png; } }", CompileOptions::default());
        assert_eq!(unit.html, "<div><br/><img src=\"x.png\"/></div>");
    }

    #[test]
    fn local_style_scopes_through_synthetic_class() {
        let unit = generate(
            "div { style { color: red; } text { hi } }",
            CompileOptions::default(),
        );
        assert_eq!(unit.html, "<div class=\"_c0\">hi</div>");
        assert_eq!(unit.css, "._c0{color:red}");
    }

    #[test]
    fn synthetic_class_appends_to_existing_class() {
        let unit = generate(
            "div { class: card; style { color: red; } }",
            CompileOptions::default(),
        );
        assert_eq!(unit.html, "<div class=\"card _c0\"></div>");
    }

    #[test]
    fn synthetic_classes_are_stable_per_element() {
        let unit = generate(
            "div { style { color: red; } } p { style { color: blue; } }",
            CompileOptions::default(),
        );
        assert_eq!(unit.css, "._c0{color:red}._c1{color:blue}");
    }

    #[test]
    fn nested_rule_with_ampersand_scopes_to_class() {
        let unit = generate(
            "a { style { color: red; &:hover { color: blue; } } }",
            CompileOptions::default(),
        );
        assert!(unit.css.contains("._c0:hover{color:blue}"));
        assert!(unit.css.contains("._c0{color:red}"));
    }

    #[test]
    fn global_style_rules_emit_as_written() {
        let unit = generate(
            "style { .hero { margin: 0 auto; } } div {}",
            CompileOptions::default(),
        );
        assert_eq!(unit.css, ".hero{margin:0 auto}");
    }

    #[test]
    fn script_block_feeds_the_js_buffer_with_prelude() {
        let unit = generate(
            "div { script { {{.b}}->textContent = \"ok\"; } }",
            CompileOptions::default(),
        );
        assert!(unit.js.starts_with("// chtl-js runtime"));
        assert!(
            unit.js
                .contains("__chtljs_select(\".b\").textContent = \"ok\";")
        );
        assert!(unit.used_selectors.contains(".b"));
    }

    #[test]
    fn prelude_is_emitted_once_across_script_blocks() {
        let unit = generate(
            "div { script { let a = 1; } }\nspan { script { let b = 2; } }",
            CompileOptions::default(),
        );
        assert_eq!(unit.js.matches("__chtljs_select = function").count(), 1);
    }

    #[test]
    fn preserved_comments_emit_only_when_requested() {
        let silent = generate("div { -- banner\n }", CompileOptions::default());
        assert_eq!(silent.html, "<div></div>");

        let verbose = generate(
            "div { -- banner\n }",
            CompileOptions {
                include_comments: true,
                ..CompileOptions::default()
            },
        );
        assert_eq!(verbose.html, "<div><!-- banner --></div>");
    }

    #[test]
    fn origin_html_passes_through_unchanged() {
        let unit = generate(
            "div { [Origin] @Html { <b>raw & rough</b> } }",
            CompileOptions::default(),
        );
        assert!(unit.html.contains("<b>raw & rough</b>"));
    }

    #[test]
    fn named_origin_reference_resolves() {
        let unit = generate(
            "[Origin] @Html Banner { <b>hi</b> }\ndiv { [Origin] @Html Banner; }",
            CompileOptions::default(),
        );
        assert!(unit.html.contains("<b>hi</b>"));
    }

    #[test]
    fn pretty_printing_indents_elements() {
        let unit = generate(
            "body { div { text { Hi } } }",
            CompileOptions {
                pretty_print: true,
                ..CompileOptions::default()
            },
        );
        assert_eq!(unit.html, "<body>\n  <div>Hi</div>\n</body>\n");
    }

    #[test]
    fn minify_overrides_pretty_print() {
        let unit = generate(
            "body { div { text { Hi } } }",
            CompileOptions {
                pretty_print: true,
                minify: true,
                ..CompileOptions::default()
            },
        );
        assert_eq!(unit.html, "<body><div>Hi</div></body>");
    }

    #[test]
    fn namespace_content_is_emitted() {
        let unit = generate(
            "[Namespace] ui { p { text { ok } } }",
            CompileOptions::default(),
        );
        assert_eq!(unit.html, "<p>ok</p>");
    }

    #[test]
    fn root_tag_is_tracked_for_doctype() {
        let unit = generate("html { body {} }", CompileOptions::default());
        assert_eq!(unit.root_tag.as_deref(), Some("html"));
    }
}
