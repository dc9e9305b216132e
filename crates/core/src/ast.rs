//! Arena-backed AST for the CHTL language.
//!
//! Nodes live in a flat `Vec` and refer to each other through [`NodeId`]
//! indices; parent links are a side-table. The tree is acyclic by
//! construction and a document exclusively owns its nodes.

use crate::error::Span;
use serde::{Deserialize, Serialize};

/// Stable index of a node within its owning [`Document`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Index into the arena vector.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Which template family a declaration or use-site belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemplateKind {
    /// `@Style` — a reusable style group.
    Style,
    /// `@Element` — a reusable element fragment.
    Element,
    /// `@Var` — a named value binding.
    Var,
}

impl TemplateKind {
    /// Parse from the `@X` lexeme form.
    pub fn from_at_keyword(word: &str) -> Option<Self> {
        match word {
            "@Style" => Some(TemplateKind::Style),
            "@Element" => Some(TemplateKind::Element),
            "@Var" => Some(TemplateKind::Var),
            _ => None,
        }
    }
}

impl std::fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateKind::Style => write!(f, "@Style"),
            TemplateKind::Element => write!(f, "@Element"),
            TemplateKind::Var => write!(f, "@Var"),
        }
    }
}

/// Position specifier of an `insert` override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    /// Before the anchor.
    Before,
    /// After the anchor.
    After,
    /// In place of the anchor.
    Replace,
    /// As first child of the overridden body.
    AtTop,
    /// As last child of the overridden body.
    AtBottom,
}

/// Anchor of an `insert`/`delete` override: a tag name with an optional
/// 0-based index selecting the n-th child of that tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    /// Tag name to match.
    pub tag: String,
    /// 0-based index among children with that tag; `None` matches the first.
    pub index: Option<usize>,
}

impl std::fmt::Display for Anchor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.index {
            Some(i) => write!(f, "{}[{}]", self.tag, i),
            None => write!(f, "{}", self.tag),
        }
    }
}

/// Tagged node variant.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Root of a compilation unit.
    Document,
    /// An element declaration (`div { ... }`).
    Element {
        /// Tag name.
        tag: String,
    },
    /// An attribute entry inside an element (`name: value;`).
    Attribute {
        /// Attribute name.
        name: String,
        /// Attribute value, quotes stripped.
        value: String,
    },
    /// A `text { ... }` block.
    TextBlock {
        /// The contained text.
        text: String,
    },
    /// A `style { ... }` block. Local blocks sit inside an element body.
    StyleBlock {
        /// Whether this block is element-local.
        local: bool,
    },
    /// A `script { ... }` block; its content feeds the CHTL-JS subpipeline.
    ScriptBlock {
        /// Whether this block is element-local.
        local: bool,
        /// Verbatim script text.
        text: String,
    },
    /// `[Template] @Kind Name { ... }`
    TemplateDecl {
        /// Template family.
        kind: TemplateKind,
        /// Registered name.
        name: String,
    },
    /// `[Custom] @Kind Name { ... }`
    CustomDecl {
        /// Template family.
        kind: TemplateKind,
        /// Registered name.
        name: String,
    },
    /// `[Origin] @Lang Name? { raw }` — foreign content passed through.
    OriginEmbed {
        /// Declared language (`@Html`, `@Style`, `@JavaScript`, ...).
        language: String,
        /// Optional registered name.
        name: Option<String>,
        /// Verbatim embedded text.
        text: String,
    },
    /// A use-site `@Kind Name { override-body }`.
    Use {
        /// Template family referenced.
        kind: TemplateKind,
        /// Referenced name.
        name: String,
    },
    /// `@Var Name` reference in a value position.
    VarReference {
        /// Referenced binding name.
        name: String,
    },
    /// A selector rule inside a global style block.
    StyleRule {
        /// Selector text as written.
        selector: String,
    },
    /// A single `name: value;` style property.
    StyleProperty {
        /// Property name.
        name: String,
        /// Property value as written (may be superseded by a
        /// [`NodeKind::VarReference`] child).
        value: String,
    },
    /// `insert <position> <anchor> { ... }` override operation.
    Insert {
        /// Where to place the inserted children.
        position: InsertPosition,
        /// The child the position is relative to.
        anchor: Anchor,
    },
    /// `delete <anchor>;` override operation.
    Delete {
        /// The child to remove.
        anchor: Anchor,
    },
    /// `[Namespace] Name { ... }`
    Namespace {
        /// Namespace name.
        name: String,
    },
    /// `except a, b;` constraint list.
    Except {
        /// Prohibited tag names.
        tags: Vec<String>,
    },
    /// `[Configuration] { key: value; ... }`
    Configuration {
        /// Collected key/value pairs in source order.
        pairs: Vec<(String, String)>,
    },
    /// A comment token surfaced into the tree.
    Comment {
        /// Comment text without its delimiters.
        text: String,
        /// Whether this is the `--` preserved form.
        preserved: bool,
    },
}

impl NodeKind {
    /// Short label used in state info and logs.
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Document => "document",
            NodeKind::Element { .. } => "element",
            NodeKind::Attribute { .. } => "attribute",
            NodeKind::TextBlock { .. } => "text",
            NodeKind::StyleBlock { .. } => "style",
            NodeKind::ScriptBlock { .. } => "script",
            NodeKind::TemplateDecl { .. } => "template",
            NodeKind::CustomDecl { .. } => "custom",
            NodeKind::OriginEmbed { .. } => "origin",
            NodeKind::Use { .. } => "use",
            NodeKind::VarReference { .. } => "var",
            NodeKind::StyleRule { .. } => "style-rule",
            NodeKind::StyleProperty { .. } => "style-property",
            NodeKind::Insert { .. } => "insert",
            NodeKind::Delete { .. } => "delete",
            NodeKind::Namespace { .. } => "namespace",
            NodeKind::Except { .. } => "except",
            NodeKind::Configuration { .. } => "configuration",
            NodeKind::Comment { .. } => "comment",
        }
    }

    /// Identifier carried by the node, when it has one.
    pub fn identifier(&self) -> Option<&str> {
        match self {
            NodeKind::Element { tag } => Some(tag),
            NodeKind::Attribute { name, .. } => Some(name),
            NodeKind::TemplateDecl { name, .. } => Some(name),
            NodeKind::CustomDecl { name, .. } => Some(name),
            NodeKind::Use { name, .. } => Some(name),
            NodeKind::VarReference { name } => Some(name),
            NodeKind::StyleProperty { name, .. } => Some(name),
            NodeKind::Namespace { name } => Some(name),
            NodeKind::OriginEmbed { language, .. } => Some(language),
            _ => None,
        }
    }
}

/// One node of the arena.
#[derive(Debug, Clone)]
pub struct Node {
    /// Tagged variant.
    pub kind: NodeKind,
    /// Covered source range; encloses the spans of all children.
    pub span: Span,
    /// Children in declaration order.
    pub children: Vec<NodeId>,
    /// Auxiliary string attributes attached by passes.
    pub attributes: Vec<(String, String)>,
}

impl Node {
    fn new(kind: NodeKind, span: Span) -> Self {
        Self {
            kind,
            span,
            children: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Look up an auxiliary attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set an auxiliary attribute, replacing any previous value.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if let Some(slot) = self.attributes.iter_mut().find(|(k, _)| *k == name) {
            slot.1 = value.into();
        } else {
            self.attributes.push((name, value.into()));
        }
    }
}

/// Arena-backed document tree.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    parents: Vec<Option<NodeId>>,
    root: NodeId,
}

impl Document {
    /// Create a document holding only its root node.
    pub fn new(span: Span) -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            parents: Vec::new(),
            root: NodeId(0),
        };
        doc.root = doc.alloc(NodeKind::Document, span);
        doc
    }

    /// The root node id.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes in the arena (including detached ones).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena holds only the root.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Allocate a detached node.
    pub fn alloc(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(kind, span));
        self.parents.push(None);
        id
    }

    /// Borrow a node.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Mutably borrow a node.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// Parent of a node, if attached.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents[id.index()]
    }

    /// Children of a node in declaration order.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// Append `child` to `parent`'s children.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent.index()].children.push(child);
        self.parents[child.index()] = Some(parent);
    }

    /// Insert `child` at `index` within `parent`'s children.
    pub fn insert_child_at(&mut self, parent: NodeId, index: usize, child: NodeId) {
        let children = &mut self.nodes[parent.index()].children;
        let index = index.min(children.len());
        children.insert(index, child);
        self.parents[child.index()] = Some(parent);
    }

    /// Detach `child` from `parent`. The node stays allocated in the arena.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent.index()].children.retain(|&c| c != child);
        self.parents[child.index()] = None;
    }

    /// Replace `old` with `new` in `parent`'s child list.
    pub fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) {
        if let Some(slot) = self.nodes[parent.index()]
            .children
            .iter_mut()
            .find(|c| **c == old)
        {
            *slot = new;
            self.parents[new.index()] = Some(parent);
            self.parents[old.index()] = None;
        }
    }

    /// Deep-copy the subtree rooted at `id` into this arena, returning the
    /// detached copy's root. Used for template expansion.
    pub fn deep_copy(&mut self, id: NodeId) -> NodeId {
        let node = self.node(id);
        let kind = node.kind.clone();
        let span = node.span;
        let attributes = node.attributes.clone();
        let children = node.children.clone();

        let copy = self.alloc(kind, span);
        self.nodes[copy.index()].attributes = attributes;
        for child in children {
            let child_copy = self.deep_copy(child);
            self.add_child(copy, child_copy);
        }
        copy
    }

    /// Pre-order traversal of the subtree rooted at `id`.
    pub fn walk(&self, id: NodeId) -> Vec<NodeId> {
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

    /// Children of `id` whose element tag equals `tag`, in order.
    pub fn children_with_tag(&self, id: NodeId, tag: &str) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|&c| matches!(&self.node(c).kind, NodeKind::Element { tag: t } if t == tag))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        Document::new(Span::new(0, 0))
    }

    #[test]
    fn root_owns_added_children() {
        let mut d = doc();
        let root = d.root();
        let el = d.alloc(
            NodeKind::Element {
                tag: "div".to_string(),
            },
            Span::new(0, 5),
        );
        d.add_child(root, el);
        assert_eq!(d.children(root), &[el]);
        assert_eq!(d.parent(el), Some(root));
    }

    #[test]
    fn deep_copy_detaches_and_preserves_structure() {
        let mut d = doc();
        let root = d.root();
        let el = d.alloc(
            NodeKind::Element {
                tag: "div".to_string(),
            },
            Span::new(0, 10),
        );
        let text = d.alloc(
            NodeKind::TextBlock {
                text: "hi".to_string(),
            },
            Span::new(4, 6),
        );
        d.add_child(root, el);
        d.add_child(el, text);

        let copy = d.deep_copy(el);
        assert_eq!(d.parent(copy), None);
        assert_eq!(d.children(copy).len(), 1);
        let copied_text = d.children(copy)[0];
        assert_ne!(copied_text, text);
        assert!(matches!(
            &d.node(copied_text).kind,
            NodeKind::TextBlock { text } if text == "hi"
        ));
    }

    #[test]
    fn insert_child_at_clamps_index() {
        let mut d = doc();
        let root = d.root();
        let a = d.alloc(
            NodeKind::Element {
                tag: "a".to_string(),
            },
            Span::default(),
        );
        let b = d.alloc(
            NodeKind::Element {
                tag: "b".to_string(),
            },
            Span::default(),
        );
        d.add_child(root, a);
        d.insert_child_at(root, 99, b);
        assert_eq!(d.children(root), &[a, b]);
    }

    #[test]
    fn children_with_tag_filters_in_order() {
        let mut d = doc();
        let root = d.root();
        for tag in ["div", "p", "div"] {
            let el = d.alloc(
                NodeKind::Element {
                    tag: tag.to_string(),
                },
                Span::default(),
            );
            d.add_child(root, el);
        }
        let divs = d.children_with_tag(root, "div");
        assert_eq!(divs.len(), 2);
    }

    #[test]
    fn walk_is_preorder() {
        let mut d = doc();
        let root = d.root();
        let a = d.alloc(
            NodeKind::Element {
                tag: "a".to_string(),
            },
            Span::default(),
        );
        let b = d.alloc(
            NodeKind::Element {
                tag: "b".to_string(),
            },
            Span::default(),
        );
        let c = d.alloc(
            NodeKind::Element {
                tag: "c".to_string(),
            },
            Span::default(),
        );
        d.add_child(root, a);
        d.add_child(a, b);
        d.add_child(root, c);
        assert_eq!(d.walk(root), vec![root, a, b, c]);
    }
}
