#![deny(missing_docs)]
//! CHTL core: lexing, parsing, state machinery and validation for the
//! CHTL structural language.

/// Arena-backed AST for the CHTL language.
pub mod ast;
/// Compilation options and `[Configuration]` handling.
pub mod config;
/// State-context helper, per-node state info and permissions.
pub mod context;
/// Core error, span and diagnostic types.
pub mod error;
/// Context-aware CHTL lexer.
pub mod lexer;
/// Recursive-descent CHTL parser.
pub mod parser;
/// Templates, customs, namespaces, origins and variable bindings.
pub mod registry;
/// Compilation input model.
pub mod source;
/// Compiler state and scope tracking.
pub mod state;
/// Token model for the CHTL lexer.
pub mod token;
/// Validation pass over the parsed tree.
pub mod validator;

pub use ast::{Anchor, Document, InsertPosition, Node, NodeId, NodeKind, TemplateKind};
pub use config::CompileOptions;
pub use context::{NodeStateInfo, Permissions, StateContextHelper, permissions_for};
pub use error::{ChtlError, Diagnostic, Diagnostics, Severity, SourceLocation, Span};
pub use lexer::tokenize;
pub use parser::{ParseResult, parse};
pub use registry::{
    CustomEntry, GlobalRegistry, NamespaceEntry, OriginBlock, TemplateEntry, VarBinding,
};
pub use source::Source;
pub use state::{CompilerState, ScopeKind, StateFrame, StateMachine};
pub use token::{Token, TokenKind};
pub use validator::{ValidationResult, validate};
