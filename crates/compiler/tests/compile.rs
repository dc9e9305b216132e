//! End-to-end compilation scenarios.

use chtl_compiler::{CompileOptions, Severity, Source, compile};

fn compile_default(text: &str) -> chtl_compiler::GenerateResult {
    compile(&Source::new("test.chtl", text), CompileOptions::default())
}

#[test]
fn minimal_element_compiles_to_nested_tags() {
    let result = compile_default("body { div { text { Hi } } }");
    assert!(result.ok);
    assert_eq!(result.html, "<body><div>Hi</div></body>");
    assert!(result.css.is_empty());
    assert!(result.js.is_empty());
}

#[test]
fn template_expansion_with_insert_override() {
    let result = compile_default(
        "[Template] @Element Card { div { text { T } } div { text { C } } }\n\
         body { @Element Card { insert after div[0] { p { text { X } } } } }",
    );
    assert!(result.ok, "{:?}", result.diagnostics);

    let html = &result.html;
    let body_at = html.find("<body>").expect("body opens");
    let first_div = html.find("<div>T</div>").expect("first div");
    let inserted = html.find("<p>X</p>").expect("inserted paragraph");
    let second_div = html.find("<div>C</div>").expect("second div");
    let body_close = html.find("</body>").expect("body closes");
    assert!(body_at < first_div);
    assert!(first_div < inserted);
    assert!(inserted < second_div);
    assert!(second_div < body_close);
}

#[test]
fn template_expansion_with_delete_override() {
    let result = compile_default(
        "[Template] @Element Card { div { text { T } } div { text { C } } }\n\
         body { @Element Card { delete div[1]; } }",
    );
    assert!(result.ok);
    assert!(result.html.contains("<div>T</div>"));
    assert!(!result.html.contains("<div>C</div>"));
}

#[test]
fn local_style_scopes_with_synthetic_class() {
    let result = compile_default("div { style { color: red; } text { hi } }");
    assert!(result.ok);
    assert!(result.html.contains("<div class=\"_c0\">hi</div>"));
    assert!(result.html.contains("<style>._c0{color:red}</style>"));
    assert_eq!(result.css, "._c0{color:red}");
}

#[test]
fn vir_declaration_lowers_to_global_functions() {
    let result = compile_default(
        "div { script {\n\
         vir Btn = listen({ click: () => { x = 1; } });\n\
         {{.b}}->textContent = \"ok\";\n\
         } }",
    );
    assert!(result.ok, "{:?}", result.diagnostics);
    assert!(result.js.contains("window.__chtljs_select"));
    assert!(
        result
            .js
            .contains("window.__chtljs_vir_Btn_click = function() { x = 1; };")
    );
    assert!(
        result
            .js
            .contains("__chtljs_select(\".b\").textContent = \"ok\";")
    );
    assert!(
        result
            .metadata
            .generated_functions
            .contains("__chtljs_vir_Btn_click")
    );
    assert_eq!(
        result
            .metadata
            .vir_mappings
            .get("Btn->click")
            .map(String::as_str),
        Some("__chtljs_vir_Btn_click")
    );
    assert!(result.metadata.used_selectors.contains(".b"));
}

#[test]
fn except_constraint_violation_fails_but_emits() {
    let result = compile_default("[Namespace] ui { except span; span { text { x } } }");
    assert!(!result.ok);
    let errors: Vec<_> = result
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("span"));
    assert!(errors[0].line >= 1);
    // The output still contains the offending element so tooling can
    // locate it.
    assert!(result.html.contains("<span>x</span>"));
}

#[test]
fn empty_source_is_clean_and_empty() {
    let result = compile_default("");
    assert!(result.ok);
    assert!(result.html.is_empty());
    assert!(result.css.is_empty());
    assert!(result.js.is_empty());
    assert!(result.diagnostics.is_empty());
}

#[test]
fn insert_one_past_the_last_div_appends() {
    let result = compile_default(
        "[Template] @Element Card { div { text { A } } div { text { B } } }\n\
         body { @Element Card { insert after div[2] { p { text { End } } } } }",
    );
    assert!(result.ok, "{:?}", result.diagnostics);
    let b_at = result.html.find("<div>B</div>").unwrap();
    let p_at = result.html.find("<p>End</p>").unwrap();
    assert!(b_at < p_at);
}

#[test]
fn insert_past_the_end_is_an_error() {
    let result = compile_default(
        "[Template] @Element Card { div {} div {} }\n\
         body { @Element Card { insert after div[3] { p {} } } }",
    );
    assert!(!result.ok);
    assert!(
        result
            .diagnostics
            .iter()
            .any(|d| d.message.contains("out of range"))
    );
}

#[test]
fn unknown_template_use_reports_and_leaves_placeholder() {
    let result = compile_default("body { @Element Missing; }");
    assert!(!result.ok);
    assert!(
        result
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error && d.message.contains("Missing"))
    );
    assert!(result.html.contains("<!-- unresolved: Missing -->"));
    // Compilation proceeded to a structurally complete document.
    assert!(result.html.starts_with("<body>"));
    assert!(result.html.ends_with("</body>"));
}

#[test]
fn duplicate_template_definition_errors_at_second_site() {
    let result = compile_default(
        "[Template] @Element Card { div {} }\n[Template] @Element Card { p {} }",
    );
    assert!(!result.ok);
    let error = result
        .diagnostics
        .iter()
        .find(|d| d.message.contains("duplicate"))
        .expect("duplicate diagnostic");
    assert_eq!(error.line, 2);
}

#[test]
fn error_diagnostics_format_with_bracketed_location() {
    let result = compile_default("body { @Element Missing; }");
    let error = result
        .diagnostics
        .iter()
        .find(|d| d.severity == Severity::Error)
        .unwrap();
    let rendered = error.to_string();
    assert!(
        rendered.starts_with(&format!("[test.chtl:{}:{}]", error.line, error.column)),
        "unexpected format: {rendered}"
    );
}

#[test]
fn delegate_lowers_to_runtime_helper() {
    let result = compile_default(
        "div { script { {{#menu}}->delegate({ target: {{.item}}, click: () => { go(); } }); } }",
    );
    assert!(result.ok, "{:?}", result.diagnostics);
    assert!(result.js.contains("__chtljs_delegate(__chtljs_select(\"#menu\")"));
    assert!(result.js.contains("\"target\": \".item\""));
}

#[test]
fn global_script_passes_through_with_prelude() {
    let result = compile_default("script { console.log(\"boot\"); }\ndiv {}");
    assert!(result.ok, "{:?}", result.diagnostics);
    assert!(result.js.contains("console.log(\"boot\");"));
    // Global scripts do not get the local IIFE wrapper.
    assert!(!result.js.contains("'use strict';\nconsole.log"));
}

#[test]
fn full_page_with_all_artifact_kinds() {
    let result = compile(
        &Source::new(
            "page.chtl",
            "[Configuration] { auto_doctype: true; }\n\
             html {\n\
               head { title { text { Demo } } }\n\
               body {\n\
                 div { style { color: red; } text { hello } }\n\
                 script { {{.b}}->textContent = \"ok\"; }\n\
               }\n\
             }",
        ),
        CompileOptions::default(),
    );
    assert!(result.ok, "{:?}", result.diagnostics);
    assert!(result.html.starts_with("<!DOCTYPE html>"));
    assert!(result.html.contains("<title>Demo</title>"));
    let style_at = result.html.find("<style>").unwrap();
    let script_at = result.html.find("<script>").unwrap();
    assert!(style_at < script_at);
}

#[test]
fn compiles_are_independent_across_units() {
    // Identical inputs produce identical synthetic names; nothing leaks
    // between compilations.
    let text = "div { style { color: red; } script { vir V = listen({ go: () => { a(); } }); } }";
    let first = compile_default(text);
    let second = compile_default(text);
    assert_eq!(first.css, second.css);
    assert_eq!(first.js, second.js);
    assert_eq!(
        first.metadata.generated_functions,
        second.metadata.generated_functions
    );
}
