//! Arena-backed AST for the CHTL-JS dialect.
//!
//! A separate tree from the CHTL AST: the two pipelines never share
//! nodes. Same arena discipline — nodes in a flat `Vec`, `JsNodeId`
//! indices, parent side-table.

use chtl_core::Span;

/// Stable index of a node within its owning [`JsDocument`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JsNodeId(u32);

impl JsNodeId {
    /// Index into the arena vector.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Which built-in function a [`JsNodeKind::Call`] invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// `listen({...})` — event binding.
    Listen,
    /// `delegate({...})` — delegated event binding.
    Delegate,
    /// `animate({...})` — animation configuration.
    Animate,
    /// `iNeverAway({...})` — state-tagged function group.
    INeverAway,
    /// `printMylove({...})` — extension-provided output.
    PrintMyLove,
}

impl CallKind {
    /// Map a built-in function name to its call kind.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "listen" => Some(CallKind::Listen),
            "delegate" => Some(CallKind::Delegate),
            "animate" => Some(CallKind::Animate),
            "iNeverAway" => Some(CallKind::INeverAway),
            "printMylove" => Some(CallKind::PrintMyLove),
            _ => None,
        }
    }

    /// The source-level function name.
    pub fn name(self) -> &'static str {
        match self {
            CallKind::Listen => "listen",
            CallKind::Delegate => "delegate",
            CallKind::Animate => "animate",
            CallKind::INeverAway => "iNeverAway",
            CallKind::PrintMyLove => "printMylove",
        }
    }
}

/// How an enhanced selector dispatches, derived from its text shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorClassification {
    /// `.name` — class selector.
    Class,
    /// `#name` — id selector.
    Id,
    /// Bare tag name.
    Tag,
    /// Contains whitespace — descendant selector.
    Descendant,
    /// `&` — current-element placeholder.
    Current,
    /// Carries an `[n]` index.
    Indexed,
    /// Anything else; the runtime decides.
    Auto,
}

impl SelectorClassification {
    /// Classify selector text (index already split off).
    pub fn classify(text: &str, has_index: bool) -> Self {
        let trimmed = text.trim();
        if trimmed.starts_with('&') {
            SelectorClassification::Current
        } else if trimmed.starts_with('.') {
            SelectorClassification::Class
        } else if trimmed.starts_with('#') {
            SelectorClassification::Id
        } else if trimmed.contains(char::is_whitespace) {
            SelectorClassification::Descendant
        } else if has_index {
            SelectorClassification::Indexed
        } else if trimmed.chars().next().is_some_and(|c| c.is_alphabetic()) {
            SelectorClassification::Tag
        } else {
            SelectorClassification::Auto
        }
    }
}

/// Tagged CHTL-JS node variant.
#[derive(Debug, Clone, PartialEq)]
pub enum JsNodeKind {
    /// Root of a script compilation. Local documents wrap in an IIFE.
    Document {
        /// Whether the script came from an element-local block.
        is_local: bool,
    },
    /// A grouping node for a script region.
    ScriptBlock,
    /// `{{ text }}` optionally followed by `[index]`.
    EnhancedSelector {
        /// Selector text as written (index stripped).
        text: String,
        /// Dispatch classification.
        classification: SelectorClassification,
        /// 0-based index from a `[n]` suffix.
        index: Option<usize>,
    },
    /// `left->right`; semantically a dot, marked for the generator.
    ArrowOp,
    /// `left.right`
    DotOp,
    /// `{ key: value, ... }`
    ObjectLiteral,
    /// One `key: value` property; the key may carry a state tag.
    Property {
        /// Property key, state tag stripped.
        key: String,
        /// `<State>` suffix, when present.
        state_tag: Option<String>,
    },
    /// `vir name = initializer;`
    VirDeclaration {
        /// Declared name.
        name: String,
        /// Top-level property keys of the initializer config.
        function_keys: Vec<String>,
    },
    /// `name->member` / `name.member` on a declared vir object.
    VirAccess {
        /// The vir object's name.
        target: String,
        /// Accessed key.
        member: String,
        /// Whether arguments follow.
        is_call: bool,
    },
    /// A `<State>` tag node.
    StateTag {
        /// Tag name.
        name: String,
    },
    /// A call site `name<State>(...)` routed through the state registry.
    FunctionWithState {
        /// Function name.
        name: String,
        /// State tag.
        tag: String,
    },
    /// A call of one of the built-in functions.
    Call {
        /// Which built-in.
        kind: CallKind,
    },
    /// Identifier reference.
    Identifier {
        /// Name as written.
        name: String,
    },
    /// String literal, quotes included.
    StringLit {
        /// Raw literal text.
        raw: String,
    },
    /// Numeric literal.
    NumberLit {
        /// Raw literal text.
        raw: String,
    },
    /// Boolean literal.
    BoolLit {
        /// Value.
        value: bool,
    },
    /// `[ ... ]`
    ArrayLit,
    /// `(params) => body`
    ArrowFunction,
    /// `function name(params) { body }`
    FunctionDecl {
        /// Function name, when present.
        name: Option<String>,
    },
    /// Parameter list captured verbatim (parentheses stripped).
    ParamList {
        /// Raw parameter text.
        text: String,
    },
    /// Brace block captured verbatim (braces stripped).
    Block {
        /// Raw body text.
        text: String,
    },
    /// An expression statement.
    ExprStmt,
    /// Raw JavaScript passed through unchanged.
    JsFragment {
        /// Verbatim text.
        text: String,
    },
}

/// One node of the CHTL-JS arena.
#[derive(Debug, Clone)]
pub struct JsNode {
    /// Tagged variant.
    pub kind: JsNodeKind,
    /// Covered range within the script text.
    pub span: Span,
    /// Children in declaration order.
    pub children: Vec<JsNodeId>,
}

/// Arena-backed CHTL-JS document.
#[derive(Debug, Clone)]
pub struct JsDocument {
    nodes: Vec<JsNode>,
    parents: Vec<Option<JsNodeId>>,
    root: JsNodeId,
}

impl JsDocument {
    /// Create a document holding only its root.
    pub fn new(is_local: bool, span: Span) -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            parents: Vec::new(),
            root: JsNodeId(0),
        };
        doc.root = doc.alloc(JsNodeKind::Document { is_local }, span);
        doc
    }

    /// The root node id.
    pub fn root(&self) -> JsNodeId {
        self.root
    }

    /// Whether the root document is element-local.
    pub fn is_local(&self) -> bool {
        matches!(
            self.node(self.root).kind,
            JsNodeKind::Document { is_local: true }
        )
    }

    /// Number of allocated nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena holds only the root.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Allocate a detached node.
    pub fn alloc(&mut self, kind: JsNodeKind, span: Span) -> JsNodeId {
        let id = JsNodeId(self.nodes.len() as u32);
        self.nodes.push(JsNode {
            kind,
            span,
            children: Vec::new(),
        });
        self.parents.push(None);
        id
    }

    /// Borrow a node.
    pub fn node(&self, id: JsNodeId) -> &JsNode {
        &self.nodes[id.index()]
    }

    /// Mutably borrow a node.
    pub fn node_mut(&mut self, id: JsNodeId) -> &mut JsNode {
        &mut self.nodes[id.index()]
    }

    /// Parent of a node, if attached.
    pub fn parent(&self, id: JsNodeId) -> Option<JsNodeId> {
        self.parents[id.index()]
    }

    /// Children in declaration order.
    pub fn children(&self, id: JsNodeId) -> &[JsNodeId] {
        &self.node(id).children
    }

    /// Append `child` to `parent`.
    pub fn add_child(&mut self, parent: JsNodeId, child: JsNodeId) {
        self.nodes[parent.index()].children.push(child);
        self.parents[child.index()] = Some(parent);
    }

    /// Pre-order traversal of the subtree rooted at `id`.
    pub fn walk(&self, id: JsNodeId) -> Vec<JsNodeId> {
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            order.push(next);
            for &child in self.children(next).iter().rev() {
                stack.push(child);
            }
        }
        order
    }
}
