//! Structural check for raw JavaScript fragments.
//!
//! Fragments are emitted verbatim; this pass only confirms the text is
//! syntactically balanced (strings, template literals, comments, and
//! `()[]{}` nesting) and produces a stable span for diagnostics. Nothing
//! of the scan survives into generation.

use chtl_core::Span;

/// Outcome of scanning one fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentInfo {
    /// Whether the fragment is structurally balanced.
    pub balanced: bool,
    /// Byte range of the first problem, with a message, when unbalanced.
    pub error: Option<(Span, String)>,
}

impl FragmentInfo {
    fn ok() -> Self {
        Self {
            balanced: true,
            error: None,
        }
    }

    fn fail(offset: usize, message: impl Into<String>) -> Self {
        Self {
            balanced: false,
            error: Some((Span::point(offset), message.into())),
        }
    }
}

/// Scan a raw JS fragment for structural balance.
pub fn scan_fragment(text: &str) -> FragmentInfo {
    let bytes = text.as_bytes();
    let mut stack: Vec<(u8, usize)> = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                let quote = bytes[i];
                let start = i;
                i += 1;
                loop {
                    if i >= bytes.len() {
                        return FragmentInfo::fail(start, "unterminated string literal");
                    }
                    match bytes[i] {
                        b'\\' => i += 2,
                        b'\n' | b'\r' => {
                            return FragmentInfo::fail(start, "unterminated string literal");
                        }
                        b if b == quote => {
                            i += 1;
                            break;
                        }
                        _ => i += 1,
                    }
                }
            }
            b'`' => {
                let start = i;
                i += 1;
                loop {
                    if i >= bytes.len() {
                        return FragmentInfo::fail(start, "unterminated template literal");
                    }
                    match bytes[i] {
                        b'\\' => i += 2,
                        b'`' => {
                            i += 1;
                            break;
                        }
                        _ => i += 1,
                    }
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' && bytes[i] != b'\r' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let start = i;
                i += 2;
                loop {
                    if i + 1 >= bytes.len() {
                        return FragmentInfo::fail(start, "unterminated block comment");
                    }
                    if bytes[i] == b'*' && bytes[i + 1] == b'/' {
                        i += 2;
                        break;
                    }
                    i += 1;
                }
            }
            open @ (b'(' | b'[' | b'{') => {
                stack.push((open, i));
                i += 1;
            }
            close @ (b')' | b']' | b'}') => {
                let expected = match close {
                    b')' => b'(',
                    b']' => b'[',
                    _ => b'{',
                };
                match stack.pop() {
                    Some((open, _)) if open == expected => {}
                    Some((open, at)) => {
                        return FragmentInfo::fail(
                            at,
                            format!(
                                "mismatched `{}` closed by `{}`",
                                open as char, close as char
                            ),
                        );
                    }
                    None => {
                        return FragmentInfo::fail(i, format!("unmatched `{}`", close as char));
                    }
                }
                i += 1;
            }
            _ => i += 1,
        }
    }

    if let Some((open, at)) = stack.pop() {
        return FragmentInfo::fail(at, format!("unclosed `{}`", open as char));
    }
    FragmentInfo::ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_statements_are_balanced() {
        assert!(scan_fragment("let x = f(a, b[0]) + {c: 1}.c;").balanced);
    }

    #[test]
    fn braces_inside_strings_do_not_count() {
        assert!(scan_fragment("let s = \"}{\"; let t = '}';").balanced);
        assert!(scan_fragment("let u = `}} ${x} {{`;").balanced);
    }

    #[test]
    fn braces_inside_comments_do_not_count() {
        assert!(scan_fragment("// }\n/* { */ f();").balanced);
    }

    #[test]
    fn unclosed_brace_is_reported_at_the_opener() {
        let info = scan_fragment("if (x) { y();");
        assert!(!info.balanced);
        let (span, message) = info.error.unwrap();
        assert_eq!(span.start, 7);
        assert!(message.contains("unclosed"));
    }

    #[test]
    fn mismatched_pair_is_reported() {
        let info = scan_fragment("f(]");
        assert!(!info.balanced);
    }

    #[test]
    fn unterminated_string_is_reported() {
        assert!(!scan_fragment("let s = \"open").balanced);
    }

    #[test]
    fn empty_fragment_is_balanced() {
        assert!(scan_fragment("").balanced);
    }
}
