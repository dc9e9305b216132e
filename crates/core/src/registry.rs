//! Compilation-scoped registry for templates, customs, namespaces,
//! origin blocks and variable bindings.
//!
//! A registry is created per compilation unit, populated during parsing,
//! read during validation and generation, and discarded afterward. It is
//! a plain value handed to each pass, never process-wide state.

use crate::ast::{NodeId, TemplateKind};
use crate::error::Span;
use std::collections::HashMap;

/// A registered `[Template]` definition.
#[derive(Debug, Clone)]
pub struct TemplateEntry {
    /// Template family.
    pub kind: TemplateKind,
    /// Registered name.
    pub name: String,
    /// Namespace the declaration appeared in, if any.
    pub namespace: Option<String>,
    /// Declaration node whose children form the canonical body.
    pub node: NodeId,
    /// Source range of the declaration.
    pub span: Span,
}

/// A registered `[Custom]` definition.
#[derive(Debug, Clone)]
pub struct CustomEntry {
    /// Template family.
    pub kind: TemplateKind,
    /// Registered name.
    pub name: String,
    /// Namespace the declaration appeared in, if any.
    pub namespace: Option<String>,
    /// Declaration node whose children form the canonical body.
    pub node: NodeId,
    /// Source range of the declaration.
    pub span: Span,
}

/// A registered `[Namespace]`.
#[derive(Debug, Clone)]
pub struct NamespaceEntry {
    /// Namespace name.
    pub name: String,
    /// Tags prohibited by `except` lists inside the namespace.
    pub excepted_tags: Vec<String>,
    /// Namespace node.
    pub node: NodeId,
}

/// A registered `[Origin]` block.
#[derive(Debug, Clone)]
pub struct OriginBlock {
    /// Declared language (`@Html`, `@Style`, ...).
    pub language: String,
    /// Registered name.
    pub name: String,
    /// Verbatim content.
    pub text: String,
}

/// A registered `@Var` binding: named key/value pairs.
#[derive(Debug, Clone)]
pub struct VarBinding {
    /// Binding name.
    pub name: String,
    /// Key/value pairs in declaration order.
    pub pairs: Vec<(String, String)>,
}

impl VarBinding {
    /// Value for `key`, falling back to the first pair when absent.
    pub fn resolve(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .or_else(|| self.pairs.first())
            .map(|(_, v)| v.as_str())
    }
}

type TemplateKey = (Option<String>, TemplateKind, String);

/// The CHTL global registry.
#[derive(Debug, Default)]
pub struct GlobalRegistry {
    templates: HashMap<TemplateKey, TemplateEntry>,
    customs: HashMap<TemplateKey, CustomEntry>,
    namespaces: HashMap<String, NamespaceEntry>,
    origins: HashMap<String, OriginBlock>,
    variables: HashMap<String, VarBinding>,
}

impl GlobalRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template. On a duplicate `(kind, name)` within the same
    /// namespace the previous definition's span is returned as an error.
    pub fn register_template(&mut self, entry: TemplateEntry) -> Result<(), Span> {
        let key = (entry.namespace.clone(), entry.kind, entry.name.clone());
        if let Some(previous) = self.templates.get(&key) {
            return Err(previous.span);
        }
        log::debug!("registered template {} {}", entry.kind, entry.name);
        self.templates.insert(key, entry);
        Ok(())
    }

    /// Register a custom. Duplicate handling matches templates.
    pub fn register_custom(&mut self, entry: CustomEntry) -> Result<(), Span> {
        let key = (entry.namespace.clone(), entry.kind, entry.name.clone());
        if let Some(previous) = self.customs.get(&key) {
            return Err(previous.span);
        }
        log::debug!("registered custom {} {}", entry.kind, entry.name);
        self.customs.insert(key, entry);
        Ok(())
    }

    /// Look up a template by kind and name, preferring the given namespace
    /// and falling back to the global scope (namespace shadowing).
    pub fn template(
        &self,
        kind: TemplateKind,
        name: &str,
        namespace: Option<&str>,
    ) -> Option<&TemplateEntry> {
        if let Some(ns) = namespace
            && let Some(entry) =
                self.templates
                    .get(&(Some(ns.to_string()), kind, name.to_string()))
        {
            return Some(entry);
        }
        self.templates.get(&(None, kind, name.to_string()))
    }

    /// Look up a custom by kind and name with the same shadowing rule.
    pub fn custom(
        &self,
        kind: TemplateKind,
        name: &str,
        namespace: Option<&str>,
    ) -> Option<&CustomEntry> {
        if let Some(ns) = namespace
            && let Some(entry) = self
                .customs
                .get(&(Some(ns.to_string()), kind, name.to_string()))
        {
            return Some(entry);
        }
        self.customs.get(&(None, kind, name.to_string()))
    }

    /// Register a namespace. Re-registration extends its except list.
    pub fn register_namespace(&mut self, entry: NamespaceEntry) {
        log::debug!("registered namespace {}", entry.name);
        match self.namespaces.get_mut(&entry.name) {
            Some(existing) => existing.excepted_tags.extend(entry.excepted_tags),
            None => {
                self.namespaces.insert(entry.name.clone(), entry);
            }
        }
    }

    /// Look up a namespace by name.
    pub fn namespace(&self, name: &str) -> Option<&NamespaceEntry> {
        self.namespaces.get(name)
    }

    /// Register a named origin block; later blocks shadow earlier ones.
    pub fn register_origin(&mut self, block: OriginBlock) {
        log::debug!("registered origin {} {}", block.language, block.name);
        self.origins.insert(block.name.clone(), block);
    }

    /// Look up an origin block by name.
    pub fn origin(&self, name: &str) -> Option<&OriginBlock> {
        self.origins.get(name)
    }

    /// Register a variable binding. Duplicates return the previous name.
    pub fn register_variable(&mut self, binding: VarBinding) -> Result<(), ()> {
        if self.variables.contains_key(&binding.name) {
            return Err(());
        }
        log::debug!("registered variable {}", binding.name);
        self.variables.insert(binding.name.clone(), binding);
        Ok(())
    }

    /// Look up a variable binding by name.
    pub fn variable(&self, name: &str) -> Option<&VarBinding> {
        self.variables.get(name)
    }

    /// Number of registered templates (all namespaces).
    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    /// Number of registered customs (all namespaces).
    pub fn custom_count(&self) -> usize {
        self.customs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Document, NodeKind};

    fn template(name: &str, namespace: Option<&str>, node: NodeId) -> TemplateEntry {
        TemplateEntry {
            kind: TemplateKind::Element,
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
            node,
            span: Span::new(0, 1),
        }
    }

    fn node() -> NodeId {
        let mut doc = Document::new(Span::default());
        doc.alloc(NodeKind::Document, Span::default())
    }

    #[test]
    fn duplicate_template_in_same_namespace_is_an_error() {
        let mut reg = GlobalRegistry::new();
        let n = node();
        assert!(reg.register_template(template("Card", None, n)).is_ok());
        assert!(reg.register_template(template("Card", None, n)).is_err());
    }

    #[test]
    fn same_name_in_distinct_namespaces_shadows() {
        let mut reg = GlobalRegistry::new();
        let n = node();
        assert!(reg.register_template(template("Card", None, n)).is_ok());
        assert!(reg.register_template(template("Card", Some("ui"), n)).is_ok());

        let global = reg.template(TemplateKind::Element, "Card", None).unwrap();
        assert_eq!(global.namespace, None);
        let scoped = reg
            .template(TemplateKind::Element, "Card", Some("ui"))
            .unwrap();
        assert_eq!(scoped.namespace.as_deref(), Some("ui"));
    }

    #[test]
    fn namespace_lookup_falls_back_to_global() {
        let mut reg = GlobalRegistry::new();
        let n = node();
        assert!(reg.register_template(template("Card", None, n)).is_ok());
        assert!(
            reg.template(TemplateKind::Element, "Card", Some("ui"))
                .is_some()
        );
    }

    #[test]
    fn same_name_different_kind_is_distinct() {
        let mut reg = GlobalRegistry::new();
        let n = node();
        assert!(reg.register_template(template("Card", None, n)).is_ok());
        let style = TemplateEntry {
            kind: TemplateKind::Style,
            ..template("Card", None, n)
        };
        assert!(reg.register_template(style).is_ok());
    }

    #[test]
    fn var_binding_resolves_by_key_with_fallback() {
        let binding = VarBinding {
            name: "Theme".to_string(),
            pairs: vec![
                ("color".to_string(), "red".to_string()),
                ("background".to_string(), "white".to_string()),
            ],
        };
        assert_eq!(binding.resolve("background"), Some("white"));
        assert_eq!(binding.resolve("missing"), Some("red"));
    }

    #[test]
    fn namespace_reregistration_extends_except_list() {
        let mut reg = GlobalRegistry::new();
        let n = node();
        reg.register_namespace(NamespaceEntry {
            name: "ui".to_string(),
            excepted_tags: vec!["span".to_string()],
            node: n,
        });
        reg.register_namespace(NamespaceEntry {
            name: "ui".to_string(),
            excepted_tags: vec!["b".to_string()],
            node: n,
        });
        assert_eq!(
            reg.namespace("ui").unwrap().excepted_tags,
            vec!["span".to_string(), "b".to_string()]
        );
    }
}
