//! State-context helper: per-node state info, permissions, and scope guards.
//!
//! The helper wraps the state machine and hands out guards that push a
//! frame on creation and pop it on drop, so state and scope are restored
//! on every exit path, including early returns after errors. Violations
//! are collected on the offending node's info record, never thrown.

use crate::ast::{NodeId, NodeKind};
use crate::error::Span;
use crate::state::{CompilerState, ScopeKind, StateFrame, StateMachine};
use std::cell::RefCell;
use std::collections::HashMap;

/// What a given compiler state permits inside it.
///
/// This is the fixed contract the validator enforces; the rows come from
/// the constraint matrix the language defines per state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    /// CHTL constructs (elements, text/style/script blocks) are legal.
    pub chtl_syntax: bool,
    /// `@Var` references are legal.
    pub variables: bool,
    /// Template use-sites (`@Style`/`@Element` of templates) are legal.
    pub templates: bool,
    /// Custom element use-sites are legal.
    pub custom_elements: bool,
    /// `[Origin]` embeds are legal.
    pub origin_embedding: bool,
}

impl Permissions {
    const ALL: Permissions = Permissions {
        chtl_syntax: true,
        variables: true,
        templates: true,
        custom_elements: true,
        origin_embedding: true,
    };
}

/// Permission row for a compiler state.
pub fn permissions_for(state: CompilerState) -> Permissions {
    match state {
        CompilerState::InLocalStyle | CompilerState::InGlobalStyle => Permissions {
            chtl_syntax: true,
            variables: true,
            templates: true,
            custom_elements: false,
            origin_embedding: true,
        },
        CompilerState::InLocalScript => Permissions {
            chtl_syntax: true,
            variables: true,
            templates: false,
            custom_elements: false,
            origin_embedding: true,
        },
        // Global scripts pass through untouched: only origin embeds and
        // preserved comments are recognized inside them.
        CompilerState::InGlobalScript => Permissions {
            chtl_syntax: false,
            variables: false,
            templates: false,
            custom_elements: false,
            origin_embedding: true,
        },
        _ => Permissions::ALL,
    }
}

/// State record attached to every parsed node.
#[derive(Debug, Clone)]
pub struct NodeStateInfo {
    /// Short label of the node kind.
    pub node_label: &'static str,
    /// Compiler state the node was processed under.
    pub state: CompilerState,
    /// Scope the node was processed under.
    pub scope: ScopeKind,
    /// Source range of the node.
    pub span: Span,
    /// Identifier of the node itself (tag, name, ...), if any.
    pub identifier: String,
    /// Identifier of the enclosing construct.
    pub parent_identifier: String,
    /// Nesting depth at which the node sits.
    pub depth: usize,
    /// Permissions in force for the node.
    pub permissions: Permissions,
    /// Whether validation has run for the node.
    pub validated: bool,
    /// Collected violations.
    pub errors: Vec<String>,
}

/// One entry of the state-history trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// State of the frame.
    pub state: CompilerState,
    /// Scope of the frame.
    pub scope: ScopeKind,
    /// Identifier of the construct.
    pub identifier: String,
    /// True on guard entry, false on guard exit.
    pub entered: bool,
}

/// Wraps the state machine and owns per-node state records.
///
/// Interior mutability keeps guard creation ergonomic inside recursive
/// descent; a compilation is single-threaded so a `RefCell` suffices.
pub struct StateContextHelper {
    machine: RefCell<StateMachine>,
    infos: RefCell<HashMap<NodeId, NodeStateInfo>>,
    history: RefCell<Vec<HistoryEntry>>,
    trace: bool,
}

impl Default for StateContextHelper {
    fn default() -> Self {
        Self::new()
    }
}

impl StateContextHelper {
    /// Create a helper with tracing disabled.
    pub fn new() -> Self {
        Self {
            machine: RefCell::new(StateMachine::new()),
            infos: RefCell::new(HashMap::new()),
            history: RefCell::new(Vec::new()),
            trace: false,
        }
    }

    /// Create a helper that records a state-history trace.
    pub fn with_trace() -> Self {
        Self {
            trace: true,
            ..Self::new()
        }
    }

    /// Current compiler state.
    pub fn current_state(&self) -> CompilerState {
        self.machine.borrow().current_state()
    }

    /// Current scope.
    pub fn current_scope(&self) -> ScopeKind {
        self.machine.borrow().current_scope()
    }

    /// Register an additional transition rule on the wrapped machine.
    pub fn register_rule(
        &self,
        from: CompilerState,
        to: CompilerState,
        predicate: impl Fn(&NodeKind) -> bool + Send + Sync + 'static,
        description: impl Into<String>,
    ) {
        self.machine
            .borrow_mut()
            .register_rule(from, to, predicate, description);
    }

    /// Whether the wrapped machine allows the transition for the node.
    pub fn can_transition(&self, from: CompilerState, to: CompilerState, kind: &NodeKind) -> bool {
        self.machine.borrow().can_transition(from, to, kind)
    }

    /// Enter `state`/`scope` for `node`, attaching its state record.
    ///
    /// The returned guard restores the previous state and scope when it
    /// drops. Guards nest arbitrarily and release in LIFO order. An
    /// illegal transition is recorded as an error on the node's record;
    /// the frame is still pushed so parsing can continue.
    pub fn scoped_guard(
        &self,
        node: NodeId,
        kind: &NodeKind,
        state: CompilerState,
        scope: ScopeKind,
        span: Span,
    ) -> StateGuard<'_> {
        let identifier = kind.identifier().unwrap_or("").to_string();
        let (from, parent_identifier, illegal) = {
            let machine = self.machine.borrow();
            let from = machine.current_state();
            (
                from,
                machine.current_identifier().to_string(),
                !machine.can_transition(from, state, kind),
            )
        };

        self.machine.borrow_mut().push(StateFrame {
            state,
            scope,
            identifier: identifier.clone(),
        });
        let depth = self.machine.borrow().depth();

        let mut info = NodeStateInfo {
            node_label: kind.label(),
            state,
            scope,
            span,
            identifier: identifier.clone(),
            parent_identifier,
            depth,
            permissions: permissions_for(state),
            validated: false,
            errors: Vec::new(),
        };
        if illegal {
            info.errors.push(format!(
                "construct `{}` is not allowed in state {:?}",
                info.node_label, from
            ));
        }
        self.infos.borrow_mut().insert(node, info);

        if self.trace {
            self.history.borrow_mut().push(HistoryEntry {
                state,
                scope,
                identifier: identifier.clone(),
                entered: true,
            });
        }

        StateGuard {
            helper: self,
            state,
            scope,
            identifier,
        }
    }

    /// Push a frame without attaching node info, for grammar positions
    /// that are states but not nodes (an element's body, an attribute).
    pub fn frame_guard(
        &self,
        state: CompilerState,
        scope: ScopeKind,
        identifier: &str,
    ) -> StateGuard<'_> {
        self.machine.borrow_mut().push(StateFrame {
            state,
            scope,
            identifier: identifier.to_string(),
        });
        if self.trace {
            self.history.borrow_mut().push(HistoryEntry {
                state,
                scope,
                identifier: identifier.to_string(),
                entered: true,
            });
        }
        StateGuard {
            helper: self,
            state,
            scope,
            identifier: identifier.to_string(),
        }
    }

    /// Append an error to a node's record.
    pub fn mark_error(&self, node: NodeId, message: impl Into<String>) {
        if let Some(info) = self.infos.borrow_mut().get_mut(&node) {
            info.errors.push(message.into());
        }
    }

    /// Mark a node validated; returns true when its record holds no errors.
    pub fn validate(&self, node: NodeId) -> bool {
        let mut infos = self.infos.borrow_mut();
        match infos.get_mut(&node) {
            Some(info) => {
                info.validated = true;
                info.errors.is_empty()
            }
            None => true,
        }
    }

    /// Clone a node's state record.
    pub fn info(&self, node: NodeId) -> Option<NodeStateInfo> {
        self.infos.borrow().get(&node).cloned()
    }

    /// Consume the helper, returning all attached records.
    pub fn into_infos(self) -> HashMap<NodeId, NodeStateInfo> {
        self.infos.into_inner()
    }

    /// The recorded state history (empty unless tracing was enabled).
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.borrow().clone()
    }
}

/// Scope-bound frame released on drop.
pub struct StateGuard<'a> {
    helper: &'a StateContextHelper,
    state: CompilerState,
    scope: ScopeKind,
    identifier: String,
}

impl StateGuard<'_> {
    /// The state this guard entered.
    pub fn state(&self) -> CompilerState {
        self.state
    }

    /// The scope this guard entered.
    pub fn scope(&self) -> ScopeKind {
        self.scope
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        self.helper.machine.borrow_mut().pop();
        if self.helper.trace {
            self.helper.history.borrow_mut().push(HistoryEntry {
                state: self.state,
                scope: self.scope,
                identifier: std::mem::take(&mut self.identifier),
                entered: false,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Document;

    fn element_kind(tag: &str) -> NodeKind {
        NodeKind::Element {
            tag: tag.to_string(),
        }
    }

    #[test]
    fn guard_restores_state_and_scope_on_drop() {
        let helper = StateContextHelper::new();
        let mut doc = Document::new(Span::default());
        let node = doc.alloc(element_kind("div"), Span::default());

        let doc_guard = helper.scoped_guard(
            doc.root(),
            &NodeKind::Document,
            CompilerState::TopLevel,
            ScopeKind::Global,
            Span::default(),
        );
        let before = (helper.current_state(), helper.current_scope());
        {
            let _inner = helper.scoped_guard(
                node,
                &element_kind("div"),
                CompilerState::InElement,
                ScopeKind::Element,
                Span::default(),
            );
            assert_eq!(helper.current_state(), CompilerState::InElement);
        }
        assert_eq!((helper.current_state(), helper.current_scope()), before);
        drop(doc_guard);
        assert_eq!(helper.current_state(), CompilerState::Initial);
    }

    #[test]
    fn guard_restores_on_early_exit() {
        let helper = StateContextHelper::new();
        let mut doc = Document::new(Span::default());
        let node = doc.alloc(element_kind("div"), Span::default());

        fn fallible(helper: &StateContextHelper, node: NodeId) -> Result<(), ()> {
            let _guard = helper.scoped_guard(
                node,
                &NodeKind::Element {
                    tag: "div".to_string(),
                },
                CompilerState::InElement,
                ScopeKind::Element,
                Span::default(),
            );
            Err(())
        }

        let _ = fallible(&helper, node);
        assert_eq!(helper.current_state(), CompilerState::Initial);
    }

    #[test]
    fn illegal_transition_is_recorded_not_thrown() {
        let helper = StateContextHelper::new();
        let mut doc = Document::new(Span::default());
        let node = doc.alloc(element_kind("div"), Span::default());

        // Entering an element straight from Initial skips TopLevel.
        let _guard = helper.scoped_guard(
            node,
            &element_kind("div"),
            CompilerState::InElement,
            ScopeKind::Element,
            Span::default(),
        );
        let info = helper.info(node).unwrap();
        assert_eq!(info.errors.len(), 1);
        assert!(!helper.validate(node));
    }

    #[test]
    fn permissions_follow_the_fixed_table() {
        let style = permissions_for(CompilerState::InLocalStyle);
        assert!(style.templates);
        assert!(!style.custom_elements);

        let local_script = permissions_for(CompilerState::InLocalScript);
        assert!(local_script.chtl_syntax);
        assert!(!local_script.templates);

        let global_script = permissions_for(CompilerState::InGlobalScript);
        assert!(!global_script.chtl_syntax);
        assert!(!global_script.variables);
        assert!(global_script.origin_embedding);

        let body = permissions_for(CompilerState::InElementBody);
        assert!(body.custom_elements);
    }

    #[test]
    fn trace_records_lifo_exit_order() {
        let helper = StateContextHelper::with_trace();
        let mut doc = Document::new(Span::default());
        let outer = doc.alloc(element_kind("div"), Span::default());
        let inner = doc.alloc(element_kind("span"), Span::default());

        {
            let _top = helper.scoped_guard(
                doc.root(),
                &NodeKind::Document,
                CompilerState::TopLevel,
                ScopeKind::Global,
                Span::default(),
            );
            let _outer = helper.scoped_guard(
                outer,
                &element_kind("div"),
                CompilerState::InElement,
                ScopeKind::Element,
                Span::default(),
            );
            let _inner = helper.scoped_guard(
                inner,
                &element_kind("span"),
                CompilerState::InElement,
                ScopeKind::Element,
                Span::default(),
            );
        }

        let history = helper.history();
        let entries: Vec<(bool, &str)> = history
            .iter()
            .map(|h| (h.entered, h.identifier.as_str()))
            .collect();
        assert_eq!(
            entries,
            vec![
                (true, ""),
                (true, "div"),
                (true, "span"),
                (false, "span"),
                (false, "div"),
                (false, ""),
            ]
        );
    }

    #[test]
    fn info_captures_depth_and_parent_identifier() {
        let helper = StateContextHelper::new();
        let mut doc = Document::new(Span::default());
        let outer = doc.alloc(element_kind("div"), Span::default());
        let inner = doc.alloc(element_kind("span"), Span::default());

        let _top = helper.scoped_guard(
            doc.root(),
            &NodeKind::Document,
            CompilerState::TopLevel,
            ScopeKind::Global,
            Span::default(),
        );
        let _outer = helper.scoped_guard(
            outer,
            &element_kind("div"),
            CompilerState::InElement,
            ScopeKind::Element,
            Span::default(),
        );
        let _inner = helper.scoped_guard(
            inner,
            &element_kind("span"),
            CompilerState::InElement,
            ScopeKind::Element,
            Span::default(),
        );

        let info = helper.info(inner).unwrap();
        assert_eq!(info.parent_identifier, "div");
        assert_eq!(info.depth, 3);
        assert_eq!(info.identifier, "span");
    }
}
