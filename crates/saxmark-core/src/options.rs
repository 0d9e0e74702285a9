/// Parsing options, fixed for the duration of one `parse` call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ParserOptions {
    /// GitHub-style line breaks: a single newline inside a paragraph becomes
    /// a hard line break, two or more separate paragraphs.
    pub github_line_breaks: bool,
    /// Single-underscore spans become `underline` elements instead of
    /// emphasis, and underline spans do not nest.
    pub underscore_is_underline: bool,
    /// Wrap bare URL and e-mail literals in text runs as autolinks.
    pub detect_urls: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            github_line_breaks: false,
            underscore_is_underline: false,
            detect_urls: true,
        }
    }
}
