//! Compilation options and `[Configuration]` block handling.

use crate::error::Diagnostics;
use serde::{Deserialize, Serialize};

/// Options governing emitted artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompileOptions {
    /// Indent and newline emitted artifacts.
    pub pretty_print: bool,
    /// Strip insignificant whitespace; overrides `pretty_print`.
    pub minify: bool,
    /// Prepend `<!DOCTYPE html>` when the root element is `html`.
    pub auto_doctype: bool,
    /// Emit `/* */` CSS and `<!-- -->` HTML comments from source.
    pub include_comments: bool,
    /// Indent width in spaces when pretty-printing.
    pub indent_size: usize,
    /// Declare intent to emit a source map (format deferred; no artifact
    /// is produced).
    pub source_map: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            pretty_print: false,
            minify: false,
            auto_doctype: false,
            include_comments: false,
            indent_size: 2,
            source_map: false,
        }
    }
}

impl CompileOptions {
    /// Human-friendly defaults for inspecting output by hand.
    pub const fn pretty() -> Self {
        Self {
            pretty_print: true,
            minify: false,
            auto_doctype: true,
            include_comments: true,
            indent_size: 2,
            source_map: false,
        }
    }

    /// Whether pretty-printing is in force after `minify` is applied.
    pub fn effective_pretty(&self) -> bool {
        self.pretty_print && !self.minify
    }

    /// Merge the key/value pairs of an in-source `[Configuration]` block
    /// over these options. Unknown keys and malformed values produce
    /// warnings located at the block.
    pub fn apply_pairs(
        &mut self,
        pairs: &[(String, String)],
        file: &str,
        line: usize,
        column: usize,
        diagnostics: &mut Diagnostics,
    ) {
        for (key, value) in pairs {
            if key == "indent_size" {
                match value.parse::<usize>() {
                    Ok(width) => self.indent_size = width,
                    Err(_) => diagnostics.warning_at(
                        file,
                        line,
                        column,
                        format!(
                            "configuration option `indent_size` expects an integer, got `{value}`"
                        ),
                    ),
                }
                continue;
            }

            let slot = match key.as_str() {
                "pretty_print" => &mut self.pretty_print,
                "minify" => &mut self.minify,
                "auto_doctype" => &mut self.auto_doctype,
                "include_comments" => &mut self.include_comments,
                "source_map" => &mut self.source_map,
                _ => {
                    diagnostics.warning_at(
                        file,
                        line,
                        column,
                        format!("unknown configuration option `{key}`"),
                    );
                    continue;
                }
            };
            match value.as_str() {
                "true" => *slot = true,
                "false" => *slot = false,
                _ => diagnostics.warning_at(
                    file,
                    line,
                    column,
                    format!("configuration option `{key}` expects true or false, got `{value}`"),
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(entries: &[(&str, &str)]) -> Vec<(String, String)> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_are_compact_output() {
        let opts = CompileOptions::default();
        assert!(!opts.pretty_print);
        assert_eq!(opts.indent_size, 2);
    }

    #[test]
    fn pairs_override_defaults() {
        let mut opts = CompileOptions::default();
        let mut diags = Diagnostics::new();
        opts.apply_pairs(
            &pairs(&[("pretty_print", "true"), ("indent_size", "4")]),
            "a.chtl",
            1,
            1,
            &mut diags,
        );
        assert!(opts.pretty_print);
        assert_eq!(opts.indent_size, 4);
        assert!(diags.is_empty());
    }

    #[test]
    fn minify_overrides_pretty_print() {
        let mut opts = CompileOptions::default();
        let mut diags = Diagnostics::new();
        opts.apply_pairs(
            &pairs(&[("pretty_print", "true"), ("minify", "true")]),
            "a.chtl",
            1,
            1,
            &mut diags,
        );
        assert!(!opts.effective_pretty());
    }

    #[test]
    fn unknown_key_warns_without_failing() {
        let mut opts = CompileOptions::default();
        let mut diags = Diagnostics::new();
        opts.apply_pairs(&pairs(&[("shiny", "true")]), "a.chtl", 2, 3, &mut diags);
        assert_eq!(diags.len(), 1);
        assert!(!diags.has_errors());
    }

    #[test]
    fn malformed_bool_warns() {
        let mut opts = CompileOptions::default();
        let mut diags = Diagnostics::new();
        opts.apply_pairs(&pairs(&[("minify", "yes")]), "a.chtl", 1, 1, &mut diags);
        assert!(!opts.minify);
        assert_eq!(diags.len(), 1);
    }
}
