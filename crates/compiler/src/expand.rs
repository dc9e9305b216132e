//! Template and custom expansion.
//!
//! Rewrites the validated tree in place: use-sites are replaced by deep
//! copies of their canonical definitions with override operations
//! (`insert`, `delete`, nested uses, property overrides) applied in
//! source order, and `@Var` references are substituted from the
//! registry. Unresolved references leave a placeholder comment node so
//! the emitted output keeps its structure.

use chtl_core::ast::{Anchor, Document, InsertPosition, NodeId, NodeKind, TemplateKind};
use chtl_core::{Diagnostics, GlobalRegistry, Source};

/// Upper bound on use-site expansions per compilation; exceeded only by
/// cyclic definitions.
const MAX_EXPANSIONS: usize = 4096;

/// Expand all use-sites and variable references in `document`.
pub fn expand(
    document: &mut Document,
    registry: &GlobalRegistry,
    source: &Source,
) -> Diagnostics {
    let mut expander = Expander {
        registry,
        source,
        diagnostics: Diagnostics::new(),
        fuel: MAX_EXPANSIONS,
        fuel_exhausted_reported: false,
    };
    expander.expand_children(document, document.root());
    expander.diagnostics
}

struct Expander<'a> {
    registry: &'a GlobalRegistry,
    source: &'a Source,
    diagnostics: Diagnostics,
    fuel: usize,
    fuel_exhausted_reported: bool,
}

impl<'a> Expander<'a> {
    fn error_at(&mut self, document: &Document, node: NodeId, message: String) {
        let span = document.node(node).span;
        let (line, column) = self.source.line_col(span.start);
        self.diagnostics
            .error_at(self.source.name.clone(), line, column, message);
    }

    fn expand_children(&mut self, document: &mut Document, parent: NodeId) {
        let mut index = 0;
        while index < document.children(parent).len() {
            let child = document.children(parent)[index];
            let kind = document.node(child).kind.clone();
            match kind {
                // Declarations keep their bodies canonical; expansion
                // happens at use-sites only.
                NodeKind::TemplateDecl { .. } | NodeKind::CustomDecl { .. } => {
                    index += 1;
                }
                NodeKind::Use { kind, name } => {
                    if self.fuel == 0 {
                        if !self.fuel_exhausted_reported {
                            self.fuel_exhausted_reported = true;
                            self.error_at(
                                document,
                                child,
                                "template expansion exceeds the available expansion fuel \
                                 (cyclic definition?)"
                                    .to_string(),
                            );
                        }
                        index += 1;
                        continue;
                    }
                    self.fuel -= 1;
                    self.expand_use(document, parent, child, kind, &name);
                    // Do not advance: spliced nodes are reprocessed in
                    // place, so nested use-sites expand too.
                }
                NodeKind::StyleProperty { .. } => {
                    self.resolve_var_reference(document, child);
                    index += 1;
                }
                _ => {
                    self.expand_children(document, child);
                    index += 1;
                }
            }
        }
    }

    /// Replace a use-site with its expansion.
    fn expand_use(
        &mut self,
        document: &mut Document,
        parent: NodeId,
        use_node: NodeId,
        kind: TemplateKind,
        name: &str,
    ) {
        let namespace = document
            .node(use_node)
            .attribute("namespace")
            .map(str::to_string);
        let ns = namespace.as_deref();

        let definition = match kind {
            TemplateKind::Var => {
                self.expand_var_use(document, parent, use_node, name);
                return;
            }
            // Customs extend or override templates; they win the lookup.
            _ => self
                .registry
                .custom(kind, name, ns)
                .map(|c| c.node)
                .or_else(|| self.registry.template(kind, name, ns).map(|t| t.node)),
        };

        let Some(definition) = definition else {
            let placeholder = self.placeholder(document, format!("unresolved: {name}"));
            document.replace_child(parent, use_node, placeholder);
            return;
        };

        // Deep-copy the canonical body.
        let mut copies: Vec<NodeId> = Vec::new();
        for &body_child in document.children(definition).to_vec().iter() {
            if matches!(document.node(body_child).kind, NodeKind::Except { .. }) {
                continue;
            }
            copies.push(document.deep_copy(body_child));
        }

        // Apply override operations in source order; anchors resolve
        // against the list as mutated by earlier operations.
        for &override_child in document.children(use_node).to_vec().iter() {
            let override_kind = document.node(override_child).kind.clone();
            match override_kind {
                NodeKind::Insert { position, anchor } => {
                    self.apply_insert(document, override_child, &mut copies, position, &anchor);
                }
                NodeKind::Delete { anchor } => {
                    // A delete that matches nothing is silently ignored.
                    if let Some(at) = resolve_anchor(document, &copies, &anchor, false) {
                        copies.remove(at);
                    }
                }
                NodeKind::Use { .. } => {
                    // Nested uses in the override body append their
                    // expansion to the copied body.
                    let copy = document.deep_copy(override_child);
                    copies.push(copy);
                }
                NodeKind::StyleProperty { ref name, ref value } => {
                    self.apply_property_override(document, &mut copies, name, value, override_child);
                }
                NodeKind::Comment { .. } => {}
                _ => {
                    self.error_at(
                        document,
                        override_child,
                        "unsupported operation in override body".to_string(),
                    );
                }
            }
        }

        // Splice the result where the use-site stood; the caller's loop
        // revisits the spliced region.
        let position = document
            .children(parent)
            .iter()
            .position(|&c| c == use_node)
            .unwrap_or(0);
        document.remove_child(parent, use_node);
        for (offset, &copy) in copies.iter().enumerate() {
            document.insert_child_at(parent, position + offset, copy);
        }
    }

    /// `@Var Name;` in a style body inlines the binding's pairs.
    fn expand_var_use(
        &mut self,
        document: &mut Document,
        parent: NodeId,
        use_node: NodeId,
        name: &str,
    ) {
        let Some(binding) = self.registry.variable(name) else {
            let placeholder = self.placeholder(document, format!("unresolved: {name}"));
            document.replace_child(parent, use_node, placeholder);
            return;
        };
        let pairs = binding.pairs.clone();
        let span = document.node(use_node).span;

        let position = document
            .children(parent)
            .iter()
            .position(|&c| c == use_node)
            .unwrap_or(0);
        document.remove_child(parent, use_node);
        for (offset, (key, value)) in pairs.iter().enumerate() {
            let property = document.alloc(
                NodeKind::StyleProperty {
                    name: key.clone(),
                    value: value.clone(),
                },
                span,
            );
            document.insert_child_at(parent, position + offset, property);
        }
    }

    fn apply_insert(
        &mut self,
        document: &mut Document,
        insert_node: NodeId,
        copies: &mut Vec<NodeId>,
        position: InsertPosition,
        anchor: &Anchor,
    ) {
        let content: Vec<NodeId> = document
            .children(insert_node)
            .to_vec()
            .iter()
            .map(|&c| document.deep_copy(c))
            .collect();

        let at = match position {
            InsertPosition::AtTop => Some(0),
            InsertPosition::AtBottom => Some(copies.len()),
            InsertPosition::Before => resolve_anchor(document, copies, anchor, false),
            InsertPosition::After => resolve_anchor(document, copies, anchor, true).map(|i| i + 1),
            InsertPosition::Replace => resolve_anchor(document, copies, anchor, false),
        };

        let Some(mut at) = at else {
            self.error_at(
                document,
                insert_node,
                format!("insert anchor `{anchor}` is out of range"),
            );
            return;
        };
        // `after tag[n]` with n equal to the count appends.
        if at > copies.len() {
            at = copies.len();
        }

        if position == InsertPosition::Replace {
            copies.remove(at);
        }
        for (offset, node) in content.into_iter().enumerate() {
            copies.insert(at + offset, node);
        }
    }

    /// Replace a matching property by key, appending when absent.
    fn apply_property_override(
        &mut self,
        document: &mut Document,
        copies: &mut Vec<NodeId>,
        name: &str,
        value: &str,
        override_node: NodeId,
    ) {
        let existing = copies.iter().copied().find(|&copy| {
            matches!(
                &document.node(copy).kind,
                NodeKind::StyleProperty { name: existing, .. } if existing == name
            )
        });
        match existing {
            Some(copy) => {
                document.node_mut(copy).kind = NodeKind::StyleProperty {
                    name: name.to_string(),
                    value: value.to_string(),
                };
            }
            None => {
                let copy = document.deep_copy(override_node);
                copies.push(copy);
            }
        }
    }

    /// Substitute a `@Var` reference child into the property value.
    fn resolve_var_reference(&mut self, document: &mut Document, property: NodeId) {
        let reference = document
            .children(property)
            .iter()
            .copied()
            .find(|&c| matches!(document.node(c).kind, NodeKind::VarReference { .. }));
        let Some(reference) = reference else {
            return;
        };

        let NodeKind::VarReference { name } = document.node(reference).kind.clone() else {
            return;
        };
        let NodeKind::StyleProperty {
            name: property_name,
            ..
        } = document.node(property).kind.clone()
        else {
            return;
        };

        match self.registry.variable(&name) {
            Some(binding) => {
                let value = binding
                    .resolve(&property_name)
                    .unwrap_or_default()
                    .to_string();
                document.node_mut(property).kind = NodeKind::StyleProperty {
                    name: property_name,
                    value,
                };
                document.remove_child(property, reference);
            }
            None => {
                document
                    .node_mut(property)
                    .set_attribute("unresolved", name.clone());
                document.remove_child(property, reference);
            }
        }
    }

    /// An always-emitted placeholder comment node.
    fn placeholder(&mut self, document: &mut Document, text: String) -> NodeId {
        let node = document.alloc(
            NodeKind::Comment {
                text,
                preserved: true,
            },
            chtl_core::Span::default(),
        );
        document.node_mut(node).set_attribute("placeholder", "true");
        node
    }
}

/// Resolve an anchor to a position within `nodes`.
///
/// `allow_end` permits an index equal to the match count (used by
/// `after`, where it means "append").
fn resolve_anchor(
    document: &Document,
    nodes: &[NodeId],
    anchor: &Anchor,
    allow_end: bool,
) -> Option<usize> {
    let matches: Vec<usize> = nodes
        .iter()
        .enumerate()
        .filter_map(|(i, &n)| match &document.node(n).kind {
            NodeKind::Element { tag } if *tag == anchor.tag => Some(i),
            NodeKind::StyleProperty { name, .. } if *name == anchor.tag => Some(i),
            _ => None,
        })
        .collect();

    let wanted = anchor.index.unwrap_or(0);
    if let Some(&position) = matches.get(wanted) {
        return Some(position);
    }
    if allow_end && wanted == matches.len() {
        // One past the last match: anchor to the end of the list.
        return Some(nodes.len().saturating_sub(1));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chtl_core::parse;

    fn expand_source(text: &str) -> (Document, Diagnostics) {
        let source = Source::anonymous(text);
        let parsed = parse(&source);
        assert!(
            !parsed.diagnostics.has_errors(),
            "parse diagnostics: {:?}",
            parsed.diagnostics.iter().collect::<Vec<_>>()
        );
        let mut document = parsed.document;
        let diagnostics = expand(&mut document, &parsed.registry, &source);
        (document, diagnostics)
    }

    /// Tags of an element's children, in order.
    fn child_tags(document: &Document, parent: NodeId) -> Vec<String> {
        document
            .children(parent)
            .iter()
            .filter_map(|&c| match &document.node(c).kind {
                NodeKind::Element { tag } => Some(tag.clone()),
                _ => None,
            })
            .collect()
    }

    fn body_of(document: &Document) -> NodeId {
        document
            .children(document.root())
            .iter()
            .copied()
            .find(|&c| matches!(&document.node(c).kind, NodeKind::Element { tag } if tag == "body"))
            .expect("body element")
    }

    #[test]
    fn plain_use_splices_template_body() {
        let (doc, diags) = expand_source(
            "[Template] @Element Card { div { text { T } } div { text { C } } }\n\
             body { @Element Card; }",
        );
        assert!(!diags.has_errors());
        assert_eq!(child_tags(&doc, body_of(&doc)), vec!["div", "div"]);
    }

    #[test]
    fn insert_after_places_content_between_divs() {
        let (doc, diags) = expand_source(
            "[Template] @Element Card { div { text { T } } div { text { C } } }\n\
             body { @Element Card { insert after div[0] { p { text { X } } } } }",
        );
        assert!(!diags.has_errors());
        assert_eq!(child_tags(&doc, body_of(&doc)), vec!["div", "p", "div"]);
    }

    #[test]
    fn insert_before_places_content_first() {
        let (doc, _) = expand_source(
            "[Template] @Element Card { div {} }\n\
             body { @Element Card { insert before div[0] { p {} } } }",
        );
        assert_eq!(child_tags(&doc, body_of(&doc)), vec!["p", "div"]);
    }

    #[test]
    fn insert_replace_swaps_the_anchor() {
        let (doc, _) = expand_source(
            "[Template] @Element Card { div {} span {} }\n\
             body { @Element Card { insert replace div[0] { p {} } } }",
        );
        assert_eq!(child_tags(&doc, body_of(&doc)), vec!["p", "span"]);
    }

    #[test]
    fn insert_at_top_and_bottom() {
        let (doc, _) = expand_source(
            "[Template] @Element Card { div {} }\n\
             body { @Element Card { insert at top { header {} } insert at bottom { footer {} } } }",
        );
        assert_eq!(
            child_tags(&doc, body_of(&doc)),
            vec!["header", "div", "footer"]
        );
    }

    #[test]
    fn insert_after_one_past_last_appends() {
        let (doc, diags) = expand_source(
            "[Template] @Element Card { div {} div {} }\n\
             body { @Element Card { insert after div[2] { p {} } } }",
        );
        assert!(!diags.has_errors(), "{:?}", diags.iter().collect::<Vec<_>>());
        assert_eq!(child_tags(&doc, body_of(&doc)), vec!["div", "div", "p"]);
    }

    #[test]
    fn insert_past_the_end_is_an_error() {
        let (_, diags) = expand_source(
            "[Template] @Element Card { div {} div {} }\n\
             body { @Element Card { insert after div[3] { p {} } } }",
        );
        assert!(diags.has_errors());
        assert!(diags.iter().any(|d| d.message.contains("out of range")));
    }

    #[test]
    fn delete_removes_the_anchor() {
        let (doc, diags) = expand_source(
            "[Template] @Element Card { div { text { T } } div { text { C } } }\n\
             body { @Element Card { delete div[1]; } }",
        );
        assert!(!diags.has_errors());
        assert_eq!(child_tags(&doc, body_of(&doc)), vec!["div"]);
    }

    #[test]
    fn delete_without_match_is_silent() {
        let (doc, diags) = expand_source(
            "[Template] @Element Card { div {} }\n\
             body { @Element Card { delete span; } }",
        );
        assert!(!diags.has_errors());
        assert_eq!(child_tags(&doc, body_of(&doc)), vec!["div"]);
    }

    #[test]
    fn later_overrides_see_earlier_mutations() {
        // The insert shifts positions; the delete resolves against the
        // already-mutated list.
        let (doc, diags) = expand_source(
            "[Template] @Element Card { div {} span {} }\n\
             body { @Element Card { insert before div[0] { div {} } delete div[1]; } }",
        );
        assert!(!diags.has_errors());
        assert_eq!(child_tags(&doc, body_of(&doc)), vec!["div", "span"]);
    }

    #[test]
    fn unknown_use_leaves_placeholder_comment() {
        let source = Source::anonymous("body { @Element Missing; }");
        let parsed = parse(&source);
        let mut document = parsed.document;
        let _ = expand(&mut document, &parsed.registry, &source);
        let body = body_of(&document);
        let placeholder = document.children(body)[0];
        match &document.node(placeholder).kind {
            NodeKind::Comment { text, .. } => assert_eq!(text, "unresolved: Missing"),
            other => panic!("expected placeholder comment, got {other:?}"),
        }
        assert_eq!(
            document.node(placeholder).attribute("placeholder"),
            Some("true")
        );
    }

    #[test]
    fn custom_shadows_template_with_same_name() {
        let (doc, _) = expand_source(
            "[Template] @Element Card { div {} }\n\
             [Custom] @Element Card { span {} }\n\
             body { @Element Card; }",
        );
        assert_eq!(child_tags(&doc, body_of(&doc)), vec!["span"]);
    }

    #[test]
    fn nested_template_bodies_expand_recursively() {
        let (doc, diags) = expand_source(
            "[Template] @Element Inner { em {} }\n\
             [Template] @Element Outer { div { @Element Inner; } }\n\
             body { @Element Outer; }",
        );
        assert!(!diags.has_errors());
        let body = body_of(&doc);
        let div = doc.children(body)[0];
        assert_eq!(child_tags(&doc, div), vec!["em"]);
    }

    #[test]
    fn template_whose_body_is_a_use_expands_fully() {
        let (doc, diags) = expand_source(
            "[Template] @Element Leaf { em {} }\n\
             [Template] @Element Alias { @Element Leaf; }\n\
             body { @Element Alias; }",
        );
        assert!(!diags.has_errors());
        assert_eq!(child_tags(&doc, body_of(&doc)), vec!["em"]);
    }

    #[test]
    fn cyclic_templates_exhaust_expansion_fuel() {
        let source = Source::anonymous(
            "[Template] @Element Loop { div { @Element Loop; } }\nbody { @Element Loop; }",
        );
        let parsed = parse(&source);
        let mut document = parsed.document;
        let diags = expand(&mut document, &parsed.registry, &source);
        assert!(diags.has_errors());
        assert_eq!(diags.error_count(), 1);
    }

    #[test]
    fn style_group_use_inlines_properties_with_override() {
        let (doc, diags) = expand_source(
            "[Template] @Style Accent { color: red; padding: 4px; }\n\
             div { style { @Style Accent { color: blue; } } }",
        );
        assert!(!diags.has_errors());
        let div = doc
            .children(doc.root())
            .iter()
            .copied()
            .find(|&c| matches!(&doc.node(c).kind, NodeKind::Element { .. }))
            .unwrap();
        let style = doc.children(div)[0];
        let properties: Vec<(String, String)> = doc
            .children(style)
            .iter()
            .filter_map(|&c| match &doc.node(c).kind {
                NodeKind::StyleProperty { name, value } => Some((name.clone(), value.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(
            properties,
            vec![
                ("color".to_string(), "blue".to_string()),
                ("padding".to_string(), "4px".to_string()),
            ]
        );
    }

    #[test]
    fn var_reference_substitutes_by_property_name() {
        let (doc, diags) = expand_source(
            "[Template] @Var Theme { color: teal; background: white; }\n\
             div { style { color: @Var Theme; } }",
        );
        assert!(!diags.has_errors());
        let ids = doc.walk(doc.root());
        let property = ids
            .iter()
            .find_map(|&id| match &doc.node(id).kind {
                NodeKind::StyleProperty { name, value } if name == "color" => Some(value.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(property, "teal");
    }

    #[test]
    fn unresolved_var_marks_the_property() {
        let source = Source::anonymous("div { style { color: @Var Nope; } }");
        let parsed = parse(&source);
        let mut document = parsed.document;
        let _ = expand(&mut document, &parsed.registry, &source);
        let marked = document
            .walk(document.root())
            .into_iter()
            .find(|&id| document.node(id).attribute("unresolved").is_some());
        assert!(marked.is_some());
    }
}
