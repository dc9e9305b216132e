//! Compilation input model.

/// A named unit of CHTL source text.
///
/// Text is UTF-8; `\n` and `\r\n` line endings both count as one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Display name used in diagnostics (usually a file path).
    pub name: String,
    /// The raw source text.
    pub text: String,
}

impl Source {
    /// Create a source from a name and its text.
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    /// Create an unnamed source, for tests and embedded snippets.
    pub fn anonymous(text: impl Into<String>) -> Self {
        Self::new("<input>", text)
    }

    /// 1-based line and column (in Unicode scalar values) of a byte offset.
    ///
    /// `\r\n` counts as a single line break. Offsets past the end report
    /// the position one past the last character.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let mut line = 1;
        let mut column = 1;
        for (i, c) in self.text.char_indices() {
            if i >= offset {
                break;
            }
            match c {
                '\n' => {
                    line += 1;
                    column = 1;
                }
                '\r' => {
                    if self.text[i..].as_bytes().get(1) != Some(&b'\n') {
                        line += 1;
                        column = 1;
                    }
                }
                _ => column += 1,
            }
        }
        (line, column)
    }
}
