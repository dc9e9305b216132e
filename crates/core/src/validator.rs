//! Validation pass: walks the parsed tree with scoped guards, attaches a
//! state record to every node, and enforces the permission table plus the
//! semantic constraints (`except` lists, reference existence).
//!
//! Violations are collected as diagnostics and on the offending node's
//! record; the pass never aborts, so downstream passes still run on a
//! partial tree.

use crate::ast::{Document, NodeId, NodeKind, TemplateKind};
use crate::context::{NodeStateInfo, StateContextHelper};
use crate::error::Diagnostics;
use crate::registry::GlobalRegistry;
use crate::source::Source;
use crate::state::{CompilerState, ScopeKind};
use std::collections::HashMap;

/// Outcome of validating one document.
pub struct ValidationResult {
    /// True when no `Error`-severity diagnostic was added by this pass.
    pub valid: bool,
    /// Collected diagnostics in source order.
    pub diagnostics: Diagnostics,
    /// State record per visited node.
    pub infos: HashMap<NodeId, NodeStateInfo>,
}

/// Validate a parsed document against its registry.
pub fn validate(
    document: &Document,
    registry: &GlobalRegistry,
    source: &Source,
) -> ValidationResult {
    let helper = StateContextHelper::new();
    let mut validator = Validator {
        doc: document,
        registry,
        source,
        diagnostics: Diagnostics::new(),
        except_stack: Vec::new(),
        namespace_stack: Vec::new(),
    };

    {
        let root = document.root();
        let _guard = helper.scoped_guard(
            root,
            &NodeKind::Document,
            CompilerState::TopLevel,
            ScopeKind::Global,
            document.node(root).span,
        );
        let root_excepts = validator.collect_excepts(root);
        if !root_excepts.is_empty() {
            validator.except_stack.push(root_excepts);
        }
        for &child in document.children(root) {
            validator.visit(&helper, child);
        }
        helper.validate(root);
    }

    let valid = !validator.diagnostics.has_errors();
    log::debug!(
        "validated {}: {} diagnostics, valid={}",
        source.name,
        validator.diagnostics.len(),
        valid
    );
    ValidationResult {
        valid,
        diagnostics: validator.diagnostics,
        infos: helper.into_infos(),
    }
}

struct Validator<'a> {
    doc: &'a Document,
    registry: &'a GlobalRegistry,
    source: &'a Source,
    diagnostics: Diagnostics,
    except_stack: Vec<Vec<String>>,
    namespace_stack: Vec<String>,
}

impl<'a> Validator<'a> {
    fn visit(&mut self, helper: &StateContextHelper, node: NodeId) {
        let kind = self.doc.node(node).kind.clone();
        let span = self.doc.node(node).span;
        let (state, scope) = self.target_state(helper, &kind);

        let guard = helper.scoped_guard(node, &kind, state, scope, span);

        // Transition violations recorded by the guard surface right away
        // so diagnostics stay in source order.
        if let Some(info) = helper.info(node) {
            let (line, column) = self.source.line_col(span.start);
            for error in &info.errors {
                self.diagnostics
                    .error_at(self.source.name.clone(), line, column, error.clone());
            }
        }

        self.check_node(helper, node, &kind);

        // `except` lists constrain the whole enclosing subtree regardless
        // of where in the body they appear.
        let excepts = self.collect_excepts(node);
        let scoped_excepts = !excepts.is_empty();
        if scoped_excepts {
            self.except_stack.push(excepts);
        }
        if let NodeKind::Namespace { name } = &kind {
            self.namespace_stack.push(name.clone());
        }

        {
            // Children of an element sit in its body state, matching the
            // frames the parser pushes.
            let _body = match &kind {
                NodeKind::Element { tag } => Some(helper.frame_guard(
                    CompilerState::InElementBody,
                    ScopeKind::Element,
                    tag,
                )),
                _ => None,
            };
            for &child in self.doc.children(node) {
                self.visit(helper, child);
            }
        }

        if let NodeKind::Namespace { .. } = &kind {
            self.namespace_stack.pop();
        }
        if scoped_excepts {
            self.except_stack.pop();
        }

        drop(guard);
        helper.validate(node);
    }

    /// Which state/scope a node enters; nodes that are not constructs
    /// inherit the current frame.
    fn target_state(
        &self,
        helper: &StateContextHelper,
        kind: &NodeKind,
    ) -> (CompilerState, ScopeKind) {
        match kind {
            NodeKind::Document => (CompilerState::TopLevel, ScopeKind::Global),
            NodeKind::Element { .. } => (CompilerState::InElement, ScopeKind::Element),
            NodeKind::StyleBlock { local: true } => {
                (CompilerState::InLocalStyle, ScopeKind::StyleBlock)
            }
            NodeKind::StyleBlock { local: false } => {
                (CompilerState::InGlobalStyle, ScopeKind::StyleBlock)
            }
            NodeKind::ScriptBlock { local: true, .. } => {
                (CompilerState::InLocalScript, ScopeKind::ScriptBlock)
            }
            NodeKind::ScriptBlock { local: false, .. } => {
                (CompilerState::InGlobalScript, ScopeKind::ScriptBlock)
            }
            NodeKind::TemplateDecl { .. } => (CompilerState::InTemplateDecl, ScopeKind::Template),
            NodeKind::CustomDecl { .. } => (CompilerState::InCustomDecl, ScopeKind::Custom),
            NodeKind::OriginEmbed { .. } => (CompilerState::InOrigin, ScopeKind::Origin),
            NodeKind::Namespace { .. } => (CompilerState::InNamespace, ScopeKind::Namespace),
            NodeKind::Configuration { .. } => (CompilerState::InConfiguration, ScopeKind::Global),
            NodeKind::Attribute { .. } => (CompilerState::InAttribute, helper.current_scope()),
            _ => (helper.current_state(), helper.current_scope()),
        }
    }

    fn collect_excepts(&self, node: NodeId) -> Vec<String> {
        self.doc
            .children(node)
            .iter()
            .filter_map(|&child| match &self.doc.node(child).kind {
                NodeKind::Except { tags } => Some(tags.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn error(&mut self, helper: &StateContextHelper, node: NodeId, message: String) {
        helper.mark_error(node, message.clone());
        let span = self.doc.node(node).span;
        let (line, column) = self.source.line_col(span.start);
        self.diagnostics
            .error_at(self.source.name.clone(), line, column, message);
    }

    fn check_node(&mut self, helper: &StateContextHelper, node: NodeId, kind: &NodeKind) {
        // Permissions are those of the state the node is being entered
        // *from*; the guard for the node itself is already pushed, so the
        // node's own record carries them.
        let permissions = helper
            .info(node)
            .map(|info| info.permissions)
            .unwrap_or_else(|| crate::context::permissions_for(helper.current_state()));

        match kind {
            NodeKind::Element { tag } => {
                if let Some(list) = self.active_except(tag) {
                    self.error(
                        helper,
                        node,
                        format!("element `{tag}` is prohibited by an `except {list}` constraint"),
                    );
                }
            }
            NodeKind::Use { kind, name } => {
                let namespace = self
                    .doc
                    .node(node)
                    .attribute("namespace")
                    .map(str::to_string)
                    .or_else(|| self.namespace_stack.last().cloned());
                let ns = namespace.as_deref();
                match kind {
                    TemplateKind::Var => {
                        if !permissions.variables {
                            self.error(
                                helper,
                                node,
                                format!("variable use `@Var {name}` is not allowed here"),
                            );
                        } else if self.registry.variable(name).is_none() {
                            self.error(helper, node, format!("unknown variable `{name}`"));
                        }
                    }
                    TemplateKind::Style | TemplateKind::Element => {
                        let custom = self.registry.custom(*kind, name, ns);
                        let template = self.registry.template(*kind, name, ns);
                        if custom.is_some() {
                            if !permissions.custom_elements {
                                self.error(
                                    helper,
                                    node,
                                    format!("custom use `{kind} {name}` is not allowed here"),
                                );
                            }
                        } else if template.is_some() {
                            if !permissions.templates {
                                self.error(
                                    helper,
                                    node,
                                    format!("template use `{kind} {name}` is not allowed here"),
                                );
                            }
                        } else {
                            self.error(helper, node, format!("unknown {kind} `{name}`"));
                        }
                    }
                }
            }
            NodeKind::VarReference { name } => {
                if !permissions.variables {
                    self.error(
                        helper,
                        node,
                        format!("variable reference `{name}` is not allowed here"),
                    );
                } else if self.registry.variable(name).is_none() {
                    self.error(helper, node, format!("unknown variable `{name}`"));
                }
            }
            NodeKind::OriginEmbed { name, .. } => {
                if !permissions.origin_embedding {
                    self.error(helper, node, "origin embedding is not allowed here".into());
                } else if self.doc.node(node).attribute("use").is_some()
                    && let Some(name) = name
                    && self.registry.origin(name).is_none()
                {
                    self.error(helper, node, format!("unknown origin block `{name}`"));
                }
            }
            _ => {}
        }
    }

    /// The comma-joined except list prohibiting `tag`, if any.
    fn active_except(&self, tag: &str) -> Option<String> {
        self.except_stack
            .iter()
            .find(|list| list.iter().any(|t| t == tag))
            .map(|list| list.join(", "))
    }
}
