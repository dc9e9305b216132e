//! CHTL-JS global registry: built-in functions, virtual objects,
//! enhanced selectors, state-tagged functions, delegation records and
//! the unique-name generator.
//!
//! Entirely separate from the CHTL registry; one instance per script
//! compilation, never shared across threads.

use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A registered virtual object.
#[derive(Debug, Clone)]
pub struct VirObject {
    /// Declared name.
    pub name: String,
    /// Top-level property keys of the initializer config.
    pub function_keys: Vec<String>,
}

/// Delegation installed against a parent selector.
#[derive(Debug, Clone, Default)]
pub struct DelegationConfig {
    /// Event types with handlers, in first-seen order.
    pub events: Vec<String>,
}

/// Synthesizer contributed by an extension for a recognized call name.
///
/// Receives the emitted text of the call's config object and returns the
/// JavaScript to splice in its place.
pub type Synthesizer = Box<dyn Fn(&str) -> String + Send + Sync>;

/// The CHTL-JS global registry.
#[derive(Default)]
pub struct JsRegistry {
    builtin_functions: BTreeSet<String>,
    vir_objects: HashMap<String, VirObject>,
    selectors: BTreeSet<String>,
    state_functions: HashMap<(String, String), String>,
    delegations: BTreeMap<String, DelegationConfig>,
    counters: HashMap<String, usize>,
    synthesizers: HashMap<String, Synthesizer>,
}

impl JsRegistry {
    /// Create a registry pre-loaded with the five built-in function names.
    pub fn new() -> Self {
        let mut registry = Self::default();
        for name in crate::token::BUILTIN_FUNCTIONS {
            registry.add_builtin_function(name);
        }
        registry
    }

    /// Register an additional recognized call name (extension point).
    pub fn add_builtin_function(&mut self, name: &str) {
        log::debug!("registered chtl-js function {name}");
        self.builtin_functions.insert(name.to_string());
    }

    /// Whether `name` is a recognized call name.
    pub fn is_builtin_function(&self, name: &str) -> bool {
        self.builtin_functions.contains(name)
    }

    /// Register a virtual object.
    pub fn register_vir(&mut self, vir: VirObject) {
        log::debug!("registered vir object {}", vir.name);
        self.vir_objects.insert(vir.name.clone(), vir);
    }

    /// Look up a virtual object by name.
    pub fn vir(&self, name: &str) -> Option<&VirObject> {
        self.vir_objects.get(name)
    }

    /// Whether `name` is a declared virtual object.
    pub fn is_vir(&self, name: &str) -> bool {
        self.vir_objects.contains_key(name)
    }

    /// Record an observed enhanced selector.
    pub fn add_selector(&mut self, selector: &str) {
        self.selectors.insert(selector.to_string());
    }

    /// All observed selectors, ordered.
    pub fn selectors(&self) -> &BTreeSet<String> {
        &self.selectors
    }

    /// Map `(function, state)` to a fixed emitted name (extension point).
    pub fn register_state_function(&mut self, function: &str, state: &str, unique_name: &str) {
        log::debug!("registered state function {function}<{state}> -> {unique_name}");
        self.state_functions.insert(
            (function.to_string(), state.to_string()),
            unique_name.to_string(),
        );
    }

    /// Resolve a state-tagged call site to its emitted name.
    pub fn resolve_state_function(&self, function: &str, state: &str) -> Option<&str> {
        self.state_functions
            .get(&(function.to_string(), state.to_string()))
            .map(String::as_str)
    }

    /// Record a delegation against a parent selector; repeated events on
    /// the same parent extend the record rather than replacing it.
    pub fn register_delegation(&mut self, parent_selector: &str, events: &[String]) {
        let config = self
            .delegations
            .entry(parent_selector.to_string())
            .or_default();
        for event in events {
            if !config.events.contains(event) {
                config.events.push(event.clone());
            }
        }
    }

    /// Delegation record for a parent selector.
    pub fn delegation(&self, parent_selector: &str) -> Option<&DelegationConfig> {
        self.delegations.get(parent_selector)
    }

    /// Whether any delegation targets the parent selector.
    pub fn has_delegation(&self, parent_selector: &str) -> bool {
        self.delegations.contains_key(parent_selector)
    }

    /// Produce a stable unique symbol `__chtljs_<prefix>_<n>`; the counter
    /// is per prefix and starts at 1.
    pub fn generate_unique_name(&mut self, prefix: &str) -> String {
        let counter = self.counters.entry(prefix.to_string()).or_insert(0);
        *counter += 1;
        format!("__chtljs_{prefix}_{counter}")
    }

    /// Install an output synthesizer for a recognized call name.
    pub fn register_synthesizer(&mut self, name: &str, synthesizer: Synthesizer) {
        self.add_builtin_function(name);
        self.synthesizers.insert(name.to_string(), synthesizer);
    }

    /// Synthesizer for a call name, when an extension contributed one.
    pub fn synthesizer(&self, name: &str) -> Option<&Synthesizer> {
        self.synthesizers.get(name)
    }
}
