//! Compiler state and scope tracking.
//!
//! One tagged stack carries the nested compiler state, the lexical scope
//! and the identifier of the construct being processed, with a single
//! push/pop pair. Legal entries are described by a fixed transition table;
//! host code may register additional rules.

use crate::ast::NodeKind;
use once_cell::sync::Lazy;

/// Where the compiler currently is in the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompilerState {
    /// Before any construct has been entered.
    Initial,
    /// At the top level of a document.
    TopLevel,
    /// Inside a `[Template]` declaration body.
    InTemplateDecl,
    /// Inside a `[Custom]` declaration body.
    InCustomDecl,
    /// Inside an element head (name and attributes).
    InElement,
    /// Inside a single attribute entry.
    InAttribute,
    /// Inside an element body.
    InElementBody,
    /// Inside a `style {}` block owned by an element.
    InLocalStyle,
    /// Inside a top-level `style {}` block.
    InGlobalStyle,
    /// Inside a `script {}` block owned by an element.
    InLocalScript,
    /// Inside a top-level `script {}` block.
    InGlobalScript,
    /// Inside an `[Origin]` embed.
    InOrigin,
    /// Inside a `[Namespace]` body.
    InNamespace,
    /// Inside a `[Configuration]` block.
    InConfiguration,
}

/// Lexical scope kind accompanying the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// Document-wide scope.
    Global,
    /// Body of a template declaration.
    Template,
    /// Body of a custom declaration.
    Custom,
    /// An element and its body.
    Element,
    /// A style block.
    StyleBlock,
    /// A script block.
    ScriptBlock,
    /// A namespace body.
    Namespace,
    /// An origin embed.
    Origin,
}

/// One entry of the state stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateFrame {
    /// Compiler state entered.
    pub state: CompilerState,
    /// Scope entered alongside it.
    pub scope: ScopeKind,
    /// Identifier of the construct (element tag, template name, ...).
    pub identifier: String,
}

/// A transition rule: entering `to` from `from` is legal when the node
/// being entered satisfies the predicate.
pub struct TransitionRule {
    /// State the machine must currently be in.
    pub from: CompilerState,
    /// State being entered.
    pub to: CompilerState,
    /// Predicate over the node driving the transition.
    pub predicate: fn(&NodeKind) -> bool,
    /// Human-readable description, for traces.
    pub description: &'static str,
}

/// The canonical transition table registered at construction.
static DEFAULT_RULES: Lazy<Vec<TransitionRule>> = Lazy::new(|| {
    use CompilerState::*;
    vec![
        TransitionRule {
            from: Initial,
            to: TopLevel,
            predicate: |k| matches!(k, NodeKind::Document),
            description: "document entry",
        },
        TransitionRule {
            from: TopLevel,
            to: InElement,
            predicate: |k| matches!(k, NodeKind::Element { .. }),
            description: "top level to element",
        },
        TransitionRule {
            from: TopLevel,
            to: InTemplateDecl,
            predicate: |k| matches!(k, NodeKind::TemplateDecl { .. }),
            description: "top level to template declaration",
        },
        TransitionRule {
            from: TopLevel,
            to: InCustomDecl,
            predicate: |k| matches!(k, NodeKind::CustomDecl { .. }),
            description: "top level to custom declaration",
        },
        TransitionRule {
            from: TopLevel,
            to: InOrigin,
            predicate: |k| matches!(k, NodeKind::OriginEmbed { .. }),
            description: "top level to origin embed",
        },
        TransitionRule {
            from: TopLevel,
            to: InNamespace,
            predicate: |k| matches!(k, NodeKind::Namespace { .. }),
            description: "top level to namespace",
        },
        TransitionRule {
            from: TopLevel,
            to: InConfiguration,
            predicate: |k| matches!(k, NodeKind::Configuration { .. }),
            description: "top level to configuration",
        },
        TransitionRule {
            from: TopLevel,
            to: InGlobalStyle,
            predicate: |k| matches!(k, NodeKind::StyleBlock { local: false }),
            description: "top level to global style",
        },
        TransitionRule {
            from: TopLevel,
            to: InGlobalScript,
            predicate: |k| matches!(k, NodeKind::ScriptBlock { local: false, .. }),
            description: "top level to global script",
        },
        TransitionRule {
            from: InElement,
            to: InAttribute,
            predicate: |k| matches!(k, NodeKind::Attribute { .. }),
            description: "element to attribute",
        },
        TransitionRule {
            from: InElement,
            to: InElementBody,
            predicate: |_| true,
            description: "element to element body",
        },
        TransitionRule {
            from: InElementBody,
            to: InElement,
            predicate: |k| matches!(k, NodeKind::Element { .. }),
            description: "element body to nested element",
        },
        TransitionRule {
            from: InElementBody,
            to: InLocalStyle,
            predicate: |k| matches!(k, NodeKind::StyleBlock { local: true }),
            description: "element body to local style",
        },
        TransitionRule {
            from: InElementBody,
            to: InLocalScript,
            predicate: |k| matches!(k, NodeKind::ScriptBlock { local: true, .. }),
            description: "element body to local script",
        },
        TransitionRule {
            from: InElementBody,
            to: InAttribute,
            predicate: |k| matches!(k, NodeKind::Attribute { .. }),
            description: "element body to attribute",
        },
        TransitionRule {
            from: InElementBody,
            to: InOrigin,
            predicate: |k| matches!(k, NodeKind::OriginEmbed { .. }),
            description: "element body to origin embed",
        },
        TransitionRule {
            from: InNamespace,
            to: InElement,
            predicate: |k| matches!(k, NodeKind::Element { .. }),
            description: "namespace to element",
        },
        TransitionRule {
            from: InNamespace,
            to: InTemplateDecl,
            predicate: |k| matches!(k, NodeKind::TemplateDecl { .. }),
            description: "namespace to template declaration",
        },
        TransitionRule {
            from: InNamespace,
            to: InCustomDecl,
            predicate: |k| matches!(k, NodeKind::CustomDecl { .. }),
            description: "namespace to custom declaration",
        },
        TransitionRule {
            from: InNamespace,
            to: InOrigin,
            predicate: |k| matches!(k, NodeKind::OriginEmbed { .. }),
            description: "namespace to origin embed",
        },
        TransitionRule {
            from: InNamespace,
            to: InNamespace,
            predicate: |k| matches!(k, NodeKind::Namespace { .. }),
            description: "namespace to nested namespace",
        },
        TransitionRule {
            from: InNamespace,
            to: InGlobalStyle,
            predicate: |k| matches!(k, NodeKind::StyleBlock { local: false }),
            description: "namespace to global style",
        },
        TransitionRule {
            from: InNamespace,
            to: InGlobalScript,
            predicate: |k| matches!(k, NodeKind::ScriptBlock { local: false, .. }),
            description: "namespace to global script",
        },
        TransitionRule {
            from: InNamespace,
            to: InConfiguration,
            predicate: |k| matches!(k, NodeKind::Configuration { .. }),
            description: "namespace to configuration",
        },
        TransitionRule {
            from: InTemplateDecl,
            to: InElement,
            predicate: |k| matches!(k, NodeKind::Element { .. }),
            description: "template body to element",
        },
        TransitionRule {
            from: InCustomDecl,
            to: InElement,
            predicate: |k| matches!(k, NodeKind::Element { .. }),
            description: "custom body to element",
        },
    ]
});

type DynRule = (
    CompilerState,
    CompilerState,
    Box<dyn Fn(&NodeKind) -> bool + Send + Sync>,
    String,
);

/// Stack-based state machine shared by parser and validator.
#[derive(Default)]
pub struct StateMachine {
    stack: Vec<StateFrame>,
    extra_rules: Vec<DynRule>,
}

impl StateMachine {
    /// Create a machine in the `Initial` state with global scope.
    pub fn new() -> Self {
        Self {
            stack: vec![StateFrame {
                state: CompilerState::Initial,
                scope: ScopeKind::Global,
                identifier: String::new(),
            }],
            extra_rules: Vec::new(),
        }
    }

    /// The state at the top of the stack.
    pub fn current_state(&self) -> CompilerState {
        self.stack
            .last()
            .map(|f| f.state)
            .unwrap_or(CompilerState::Initial)
    }

    /// The scope at the top of the stack.
    pub fn current_scope(&self) -> ScopeKind {
        self.stack
            .last()
            .map(|f| f.scope)
            .unwrap_or(ScopeKind::Global)
    }

    /// Identifier of the innermost frame.
    pub fn current_identifier(&self) -> &str {
        self.stack.last().map(|f| f.identifier.as_str()).unwrap_or("")
    }

    /// Identifier of the frame below the innermost one.
    pub fn parent_identifier(&self) -> &str {
        if self.stack.len() >= 2 {
            self.stack[self.stack.len() - 2].identifier.as_str()
        } else {
            ""
        }
    }

    /// Nesting depth (the initial frame does not count).
    pub fn depth(&self) -> usize {
        self.stack.len().saturating_sub(1)
    }

    /// Push a frame.
    pub fn push(&mut self, frame: StateFrame) {
        self.stack.push(frame);
    }

    /// Pop the innermost frame. The initial frame is never popped.
    pub fn pop(&mut self) -> Option<StateFrame> {
        if self.stack.len() > 1 {
            self.stack.pop()
        } else {
            None
        }
    }

    /// Register an additional transition rule.
    pub fn register_rule(
        &mut self,
        from: CompilerState,
        to: CompilerState,
        predicate: impl Fn(&NodeKind) -> bool + Send + Sync + 'static,
        description: impl Into<String>,
    ) {
        self.extra_rules
            .push((from, to, Box::new(predicate), description.into()));
    }

    /// Whether entering `to` from `from` is legal for the given node.
    ///
    /// True when any registered rule's predicate holds, or when the
    /// intrinsic rule (staying in the same state) applies.
    pub fn can_transition(&self, from: CompilerState, to: CompilerState, kind: &NodeKind) -> bool {
        if from == to {
            return true;
        }
        if DEFAULT_RULES
            .iter()
            .any(|r| r.from == from && r.to == to && (r.predicate)(kind))
        {
            return true;
        }
        self.extra_rules
            .iter()
            .any(|(f, t, p, _)| *f == from && *t == to && p(kind))
    }

    /// Description of the first default rule matching `(from, to)`, for traces.
    pub fn describe_transition(from: CompilerState, to: CompilerState) -> Option<&'static str> {
        DEFAULT_RULES
            .iter()
            .find(|r| r.from == from && r.to == to)
            .map(|r| r.description)
    }
}
