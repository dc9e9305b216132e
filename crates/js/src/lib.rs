#![deny(missing_docs)]
//! CHTL-JS: the extended scripting dialect compiled to JavaScript plus a
//! runtime prelude. A fully separate pipeline from the CHTL tree; the
//! two ASTs never share nodes.

/// Arena-backed CHTL-JS AST.
pub mod ast;
/// JavaScript generator and runtime prelude.
pub mod generator;
/// Structural checks for raw JS fragments.
pub mod js_passthrough;
/// Context-aware CHTL-JS lexer.
pub mod lexer;
/// Recursive-descent CHTL-JS parser.
pub mod parser;
/// CHTL-JS registry: builtins, vir objects, selectors, state functions.
pub mod registry;
/// Script-side state tracking.
pub mod state;
/// Token model for the CHTL-JS lexer.
pub mod token;

pub use ast::{CallKind, JsDocument, JsNode, JsNodeId, JsNodeKind, SelectorClassification};
pub use generator::{
    JsGenOptions, JsGenerateResult, RUNTIME_PRELUDE, generate, js_string_literal,
    vir_function_name,
};
pub use js_passthrough::{FragmentInfo, scan_fragment};
pub use lexer::tokenize_script;
pub use parser::{JsParseResult, parse_script};
pub use registry::{DelegationConfig, JsRegistry, Synthesizer, VirObject};
pub use state::{ScriptState, ScriptStateGuard, ScriptStateMachine};
pub use token::{BUILTIN_FUNCTIONS, JsToken, JsTokenKind};

/// Compile one script block end to end: parse, then generate.
///
/// Convenience wrapper used by the CHTL generator for each `script { }`
/// body; `registry` accumulates vir objects, selectors and state
/// functions across blocks of one compilation unit.
pub fn compile_script(
    text: &str,
    file: &str,
    is_local: bool,
    registry: &mut JsRegistry,
    options: &JsGenOptions,
) -> JsGenerateResult {
    let parsed = parse_script(text, file, is_local, registry);
    let mut result = generate(&parsed.document, registry, options);
    // Parse diagnostics come first, in source order.
    let mut diagnostics = parsed.diagnostics;
    diagnostics.extend(result.diagnostics);
    result.ok = !diagnostics.has_errors();
    result.diagnostics = diagnostics;
    result
}
