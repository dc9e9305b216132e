//! The end-to-end compilation pipeline.
//!
//! One compilation is single-threaded and runs its passes to completion
//! in order: lex/parse, validate, expand, generate. Multiple units may
//! compile in parallel; each owns its registries and trees, and nothing
//! mutable outlives a unit.

use crate::expand::expand;
use crate::html::generate_unit;
use chtl_core::ast::NodeKind;
use chtl_core::{CompileOptions, Diagnostic, Diagnostics, Source, parse, validate};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Side record collected by the generators.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Names of all synthesized JS functions.
    pub generated_functions: BTreeSet<String>,
    /// `Vir->key` to generated-name mappings.
    pub vir_mappings: BTreeMap<String, String>,
    /// Enhanced selectors the emitted JS uses.
    pub used_selectors: BTreeSet<String>,
}

/// Everything one compilation produces.
pub struct GenerateResult {
    /// False iff any `Error`-severity diagnostic was collected.
    pub ok: bool,
    /// The composed document: optional doctype, element tree, trailing
    /// style/script sections.
    pub html: String,
    /// The CSS artifact on its own.
    pub css: String,
    /// The JS artifact on its own.
    pub js: String,
    /// All diagnostics in pass order.
    pub diagnostics: Vec<Diagnostic>,
    /// Generator side record.
    pub metadata: Metadata,
}

/// Compile one source with the given options.
///
/// An in-source `[Configuration]` block merges over `options`. Every
/// pass runs even after errors so one compile surfaces everything; the
/// artifacts are best-effort partial output in that case.
pub fn compile(source: &Source, options: CompileOptions) -> GenerateResult {
    let mut diagnostics = Diagnostics::new();
    let mut options = options;

    // Lex + parse.
    let parsed = parse(source);
    diagnostics.extend(parsed.diagnostics);
    let mut document = parsed.document;
    let registry = parsed.registry;

    // In-source configuration merges over the caller's options.
    for id in document.walk(document.root()) {
        if let NodeKind::Configuration { pairs } = &document.node(id).kind {
            let (line, column) = source.line_col(document.node(id).span.start);
            options.apply_pairs(pairs, &source.name, line, column, &mut diagnostics);
        }
    }

    // Validate on the (possibly partial) tree.
    let validation = validate(&document, &registry, source);
    diagnostics.extend(validation.diagnostics);

    // Expand templates, customs and variables.
    diagnostics.extend(expand(&mut document, &registry, source));

    // Generate HTML/CSS/JS.
    let unit = generate_unit(&document, &registry, source, &options);
    diagnostics.extend(unit.diagnostics);

    let html = assemble(&options, &unit.html, unit.root_tag.as_deref(), &unit.css, &unit.js);
    let ok = !diagnostics.has_errors();
    log::debug!("compiled {}: ok={}", source.name, ok);

    GenerateResult {
        ok,
        html,
        css: unit.css,
        js: unit.js,
        diagnostics: diagnostics.into_vec(),
        metadata: Metadata {
            generated_functions: unit.generated_functions,
            vir_mappings: unit.vir_mappings,
            used_selectors: unit.used_selectors,
        },
    }
}

/// Compile many sources on a thread pool; units are independent and the
/// result order matches the input order.
pub fn compile_many(sources: &[Source], options: CompileOptions) -> Vec<GenerateResult> {
    sources
        .par_iter()
        .map(|source| compile(source, options))
        .collect()
}

/// Compose the final document text.
fn assemble(
    options: &CompileOptions,
    body: &str,
    root_tag: Option<&str>,
    css: &str,
    js: &str,
) -> String {
    let pretty = options.effective_pretty();
    let mut out = String::with_capacity(body.len() + css.len() + js.len() + 64);

    if options.auto_doctype && root_tag == Some("html") {
        out.push_str("<!DOCTYPE html>");
        if pretty {
            out.push('\n');
        }
    }
    out.push_str(body);

    if !css.is_empty() {
        if pretty && !out.ends_with('\n') && !out.is_empty() {
            out.push('\n');
        }
        out.push_str("<style>");
        if pretty {
            out.push('\n');
        }
        out.push_str(css);
        out.push_str("</style>");
        if pretty {
            out.push('\n');
        }
    }
    if !js.is_empty() {
        if pretty && !out.ends_with('\n') && !out.is_empty() {
            out.push('\n');
        }
        out.push_str("<script>");
        if pretty {
            out.push('\n');
        }
        out.push_str(js);
        out.push_str("</script>");
        if pretty {
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_compile_is_clean() {
        let result = compile(
            &Source::anonymous("body { div { text { Hi } } }"),
            CompileOptions::default(),
        );
        assert!(result.ok);
        assert_eq!(result.html, "<body><div>Hi</div></body>");
        assert!(result.css.is_empty());
        assert!(result.js.is_empty());
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn in_source_configuration_overrides_options() {
        let result = compile(
            &Source::anonymous(
                "[Configuration] { pretty_print: true; }\nbody { div { text { Hi } } }",
            ),
            CompileOptions::default(),
        );
        assert!(result.ok);
        assert!(result.html.contains("\n"));
    }

    #[test]
    fn auto_doctype_applies_only_to_html_root() {
        let with_html = compile(
            &Source::anonymous("[Configuration] { auto_doctype: true; }\nhtml { body {} }"),
            CompileOptions::default(),
        );
        assert!(with_html.html.starts_with("<!DOCTYPE html>"));

        let without_html = compile(
            &Source::anonymous("[Configuration] { auto_doctype: true; }\ndiv {}"),
            CompileOptions::default(),
        );
        assert!(!without_html.html.contains("DOCTYPE"));
    }

    #[test]
    fn style_and_script_sections_append_when_non_empty(){
        let result = compile(
            &Source::anonymous("div { style { color: red; } script { let a = 1; } }"),
            CompileOptions::default(),
        );
        assert!(result.ok, "{:?}", result.diagnostics);
        let style_at = result.html.find("<style>").unwrap();
        let script_at = result.html.find("<script>").unwrap();
        assert!(style_at < script_at);
        assert!(result.html.starts_with("<div"));
    }

    #[test]
    fn failed_compile_still_produces_partial_output() {
        let result = compile(
            &Source::anonymous("body { @Element Missing; }"),
            CompileOptions::default(),
        );
        assert!(!result.ok);
        assert!(result.html.contains("<!-- unresolved: Missing -->"));
    }

    #[test]
    fn compile_many_preserves_input_order() {
        let sources = vec![
            Source::new("a.chtl", "div { text { A } }"),
            Source::new("b.chtl", "div { text { B } }"),
            Source::new("c.chtl", "div { text { C } }"),
        ];
        let results = compile_many(&sources, CompileOptions::default());
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].html, "<div>A</div>");
        assert_eq!(results[1].html, "<div>B</div>");
        assert_eq!(results[2].html, "<div>C</div>");
        assert!(results.iter().all(|r| r.ok));
    }

    #[test]
    fn metadata_serializes_to_json() {
        let result = compile(
            &Source::anonymous(
                "div { script { vir Btn = listen({ click: () => { x = 1; } }); } }",
            ),
            CompileOptions::default(),
        );
        let json = serde_json::to_string(&result.metadata).unwrap();
        assert!(json.contains("__chtljs_vir_Btn_click"));
    }
}
