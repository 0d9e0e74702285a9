//! Inline grammar over the text of one block.
//!
//! The scanner walks a flattened block buffer left to right and emits events
//! as soon as a construct is recognized; inline content is never collected
//! into a tree. Rule precedence at each position: code span > image > link >
//! autolink > emphasis markers > line break > plain text.

use crate::event::{Aborted, Attributes, ElementKind, Emitter};
use crate::options::ParserOptions;
use crate::reference::{ReferenceTable, unescape_punct};
use crate::scanner::Scanner;

pub(crate) struct InlineScanner<'a> {
    options: ParserOptions,
    refs: &'a ReferenceTable,
}

impl<'a> InlineScanner<'a> {
    pub(crate) fn new(options: ParserOptions, refs: &'a ReferenceTable) -> Self {
        Self { options, refs }
    }

    pub(crate) fn emit_block_text(&self, text: &str, emit: &mut Emitter) -> Result<(), Aborted> {
        self.emit_range(text, 0, text.len(), false, emit)
    }

    fn emit_range(
        &self,
        text: &str,
        start: usize,
        end: usize,
        in_underline: bool,
        emit: &mut Emitter,
    ) -> Result<(), Aborted> {
        let bytes = text.as_bytes();
        let mut run: Vec<u8> = Vec::new();
        let mut i = start;

        while i < end {
            let byte = bytes[i];
            match byte {
                b'\\' => {
                    if i + 1 < end && bytes[i + 1] == b'\n' {
                        self.flush_run(&mut run, emit)?;
                        emit.start_empty(ElementKind::HardLineBreak)?;
                        emit.end(ElementKind::HardLineBreak)?;
                        i += 2;
                        continue;
                    }
                    if i + 1 < end && bytes[i + 1].is_ascii_punctuation() {
                        run.push(bytes[i + 1]);
                        i += 2;
                        continue;
                    }
                    run.push(b'\\');
                    i += 1;
                }
                b'`' => {
                    if let Some((content, next)) = code_span(text, i, end) {
                        self.flush_run(&mut run, emit)?;
                        emit.start_empty(ElementKind::CodeSpan)?;
                        emit.characters(&content)?;
                        emit.end(ElementKind::CodeSpan)?;
                        i = next;
                        continue;
                    }
                    let len = count_run(bytes, i, end, b'`');
                    run.extend(std::iter::repeat_n(b'`', len));
                    i += len;
                }
                b'<' => {
                    if let Some((url, display, next)) = bracket_autolink(text, i, end) {
                        self.flush_run(&mut run, emit)?;
                        self.emit_autolink(&url, &display, emit)?;
                        i = next;
                        continue;
                    }
                    run.push(b'<');
                    i += 1;
                }
                b'!' => {
                    if i + 1 < end
                        && bytes[i + 1] == b'['
                        && let Some(next) = self.try_image(text, i, end, &mut run, emit)?
                    {
                        i = next;
                        continue;
                    }
                    run.push(b'!');
                    i += 1;
                }
                b'[' => {
                    if let Some(next) = self.try_link(text, i, end, in_underline, &mut run, emit)? {
                        i = next;
                        continue;
                    }
                    run.push(b'[');
                    i += 1;
                }
                b'*' | b'_' => {
                    if let Some(next) =
                        self.try_emphasis(text, i, end, byte, in_underline, &mut run, emit)?
                    {
                        i = next;
                        continue;
                    }
                    let len = count_run(bytes, i, end, byte);
                    run.extend(std::iter::repeat_n(byte, len));
                    i += len;
                }
                b'\n' => {
                    let mut trailing = 0;
                    while run.last() == Some(&b' ') {
                        run.pop();
                        trailing += 1;
                    }
                    let hard = trailing >= 2 || self.options.github_line_breaks;
                    self.flush_run(&mut run, emit)?;
                    let kind = if hard {
                        ElementKind::HardLineBreak
                    } else {
                        ElementKind::SoftLineBreak
                    };
                    emit.start_empty(kind)?;
                    emit.end(kind)?;
                    i += 1;
                }
                _ => {
                    run.push(byte);
                    i += 1;
                }
            }
        }

        self.flush_run(&mut run, emit)
    }

    fn flush_run(&self, run: &mut Vec<u8>, emit: &mut Emitter) -> Result<(), Aborted> {
        if run.is_empty() {
            return Ok(());
        }
        let bytes = std::mem::take(run);
        let text = match String::from_utf8(bytes) {
            Ok(value) => value,
            Err(err) => String::from_utf8_lossy(&err.into_bytes()).to_string(),
        };
        if self.options.detect_urls {
            self.emit_text_detecting_urls(&text, emit)
        } else {
            emit.characters(&text)
        }
    }

    fn emit_text_detecting_urls(&self, text: &str, emit: &mut Emitter) -> Result<(), Aborted> {
        let mut last = 0;
        let mut i = 0;
        while i < text.len() {
            if !text.is_char_boundary(i) {
                i += 1;
                continue;
            }
            if let Some(link) = autolink_literal(text, i) {
                if link.start > last {
                    emit.characters(&text[last..link.start])?;
                }
                self.emit_autolink(&link.url, &text[link.start..link.end], emit)?;
                i = link.end;
                last = link.end;
                continue;
            }
            i += 1;
        }
        if last < text.len() {
            emit.characters(&text[last..])?;
        }
        Ok(())
    }

    fn emit_autolink(&self, url: &str, display: &str, emit: &mut Emitter) -> Result<(), Aborted> {
        let mut attrs = Attributes::new();
        attrs.push("href", url);
        emit.start(ElementKind::Autolink, &attrs)?;
        emit.characters(display)?;
        emit.end(ElementKind::Autolink)
    }

    fn try_link(
        &self,
        text: &str,
        i: usize,
        end: usize,
        in_underline: bool,
        run: &mut Vec<u8>,
        emit: &mut Emitter,
    ) -> Result<Option<usize>, Aborted> {
        let Some(link) = match_link(text, i + 1, end, self.refs) else {
            return Ok(None);
        };
        self.flush_run(run, emit)?;
        let mut attrs = Attributes::new();
        attrs.push("href", link.url);
        if let Some(title) = link.title {
            attrs.push("title", title);
        }
        emit.start(ElementKind::Link, &attrs)?;
        self.emit_range(text, link.text_start, link.text_end, in_underline, emit)?;
        emit.end(ElementKind::Link)?;
        Ok(Some(link.next))
    }

    fn try_image(
        &self,
        text: &str,
        i: usize,
        end: usize,
        run: &mut Vec<u8>,
        emit: &mut Emitter,
    ) -> Result<Option<usize>, Aborted> {
        let Some(link) = match_link(text, i + 2, end, self.refs) else {
            return Ok(None);
        };
        self.flush_run(run, emit)?;
        let mut attrs = Attributes::new();
        attrs.push("src", link.url);
        attrs.push("alt", unescape_punct(&text[link.text_start..link.text_end]));
        if let Some(title) = link.title {
            attrs.push("title", title);
        }
        emit.start(ElementKind::Image, &attrs)?;
        emit.end(ElementKind::Image)?;
        Ok(Some(link.next))
    }

    #[allow(clippy::too_many_arguments)]
    fn try_emphasis(
        &self,
        text: &str,
        i: usize,
        end: usize,
        marker: u8,
        in_underline: bool,
        run: &mut Vec<u8>,
        emit: &mut Emitter,
    ) -> Result<Option<usize>, Aborted> {
        let bytes = text.as_bytes();
        let run_len = count_run(bytes, i, end, marker);
        let underline = marker == b'_' && self.options.underscore_is_underline;
        if underline && in_underline {
            // Underline spans do not nest.
            return Ok(None);
        }
        let (can_open, _) = delimiter_properties(text, i, run_len, marker);
        if !can_open {
            return Ok(None);
        }
        let use_len = if underline {
            1
        } else if run_len >= 2 {
            2
        } else {
            1
        };
        let content_start = i + run_len;
        let Some(closer) = find_emphasis_closer(text, content_start, end, marker, use_len, underline)
        else {
            return Ok(None);
        };

        // Marker characters beyond the consumed pair stay literal.
        run.extend(std::iter::repeat_n(marker, run_len - use_len));
        self.flush_run(run, emit)?;

        let kind = if underline {
            ElementKind::Underline
        } else if use_len == 2 {
            ElementKind::Strong
        } else {
            ElementKind::Emphasis
        };
        emit.start_empty(kind)?;
        self.emit_range(text, content_start, closer, in_underline || underline, emit)?;
        emit.end(kind)?;
        Ok(Some(closer + use_len))
    }
}

struct LinkMatch {
    url: String,
    title: Option<String>,
    text_start: usize,
    text_end: usize,
    next: usize,
}

fn match_link(
    text: &str,
    text_start: usize,
    end: usize,
    refs: &ReferenceTable,
) -> Option<LinkMatch> {
    let bytes = text.as_bytes();
    let close = find_bracket_end(bytes, text_start, end)?;
    let after = close + 1;

    if let Some((url, title, next)) = inline_destination(text, after, end) {
        return Some(LinkMatch {
            url,
            title,
            text_start,
            text_end: close,
            next,
        });
    }

    if after < end && bytes[after] == b'[' {
        let label_close = find_bracket_end(bytes, after + 1, end)?;
        let label = &text[after + 1..label_close];
        if label.is_empty() {
            return None;
        }
        let entry = refs.resolve(label)?;
        return Some(LinkMatch {
            url: entry.url.clone(),
            title: entry.title.clone(),
            text_start,
            text_end: close,
            next: label_close + 1,
        });
    }

    None
}

/// Position of the `]` matching an opening bracket, honoring nesting and
/// backslash escapes.
fn find_bracket_end(bytes: &[u8], start: usize, end: usize) -> Option<usize> {
    let mut i = start;
    let mut depth = 0usize;
    let mut escaped = false;
    while i < end {
        let byte = bytes[i];
        if escaped {
            escaped = false;
            i += 1;
            continue;
        }
        match byte {
            b'\\' => escaped = true,
            b'[' => depth += 1,
            b']' => {
                if depth == 0 {
                    return Some(i);
                }
                depth -= 1;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Parses `(url "title")` after a bracketed link text. Everything must stay
/// on one line.
fn inline_destination(text: &str, start: usize, end: usize) -> Option<(String, Option<String>, usize)> {
    let mut scanner = Scanner::with_position(&text[..end], start);
    if !scanner.eat(b'(') {
        return None;
    }
    scanner.skip_spaces();

    let url = if scanner.eat(b'<') {
        let mark = scanner.pos();
        loop {
            match scanner.advance()? {
                b'\n' => return None,
                b'\\' => {
                    scanner.advance();
                }
                b'>' => break,
                _ => {}
            }
        }
        unescape_punct(&text[mark..scanner.pos() - 1])
    } else {
        let mark = scanner.pos();
        let mut depth = 0usize;
        loop {
            let Some(byte) = scanner.peek() else { break };
            match byte {
                b' ' | b'\t' | b'\n' => break,
                b'\\' => {
                    scanner.advance();
                    scanner.advance();
                }
                b'(' => {
                    depth += 1;
                    scanner.advance();
                }
                b')' => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                    scanner.advance();
                }
                _ => {
                    scanner.advance();
                }
            }
        }
        if depth > 0 {
            return None;
        }
        unescape_punct(&text[mark..scanner.pos()])
    };

    let had_space = scanner.skip_spaces() > 0;
    if scanner.eat(b')') {
        return Some((url, None, scanner.pos()));
    }
    if !had_space {
        return None;
    }

    let close = match scanner.advance()? {
        b'"' => b'"',
        b'\'' => b'\'',
        b'(' => b')',
        _ => return None,
    };
    let mark = scanner.pos();
    loop {
        match scanner.advance()? {
            b'\n' => return None,
            b'\\' => {
                scanner.advance();
            }
            byte if byte == close => break,
            _ => {}
        }
    }
    let title = unescape_punct(&text[mark..scanner.pos() - 1]);
    scanner.skip_spaces();
    if scanner.eat(b')') {
        Some((url, Some(title), scanner.pos()))
    } else {
        None
    }
}

/// Code span: a backtick run closed by the nearest run of equal length.
fn code_span(text: &str, start: usize, end: usize) -> Option<(String, usize)> {
    let bytes = text.as_bytes();
    let run_len = count_run(bytes, start, end, b'`');
    let mut i = start + run_len;
    while i < end {
        if bytes[i] == b'`' {
            let close_len = count_run(bytes, i, end, b'`');
            if close_len == run_len {
                let mut content = text[start + run_len..i].replace('\n', " ");
                if content.starts_with(' ')
                    && content.ends_with(' ')
                    && content.len() >= 2
                    && content.bytes().any(|b| b != b' ')
                {
                    content = content[1..content.len() - 1].to_string();
                }
                return Some((content, i + close_len));
            }
            i += close_len;
            continue;
        }
        i += 1;
    }
    None
}

/// `<scheme:...>` or `<user@host>` autolink.
fn bracket_autolink(text: &str, start: usize, end: usize) -> Option<(String, String, usize)> {
    let bytes = text.as_bytes();
    let mut i = start + 1;
    while i < end {
        let byte = bytes[i];
        if byte == b'>' {
            break;
        }
        if byte == b'<' || byte.is_ascii_whitespace() {
            return None;
        }
        i += 1;
    }
    if i >= end || bytes[i] != b'>' || i == start + 1 {
        return None;
    }
    let inner = &text[start + 1..i];
    if has_autolink_scheme(inner) {
        Some((inner.to_string(), inner.to_string(), i + 1))
    } else if is_email(inner) {
        Some((format!("mailto:{inner}"), inner.to_string(), i + 1))
    } else {
        None
    }
}

fn has_autolink_scheme(text: &str) -> bool {
    let Some((scheme, _)) = text.split_once(':') else {
        return false;
    };
    let bytes = scheme.as_bytes();
    if bytes.len() < 2 || bytes.len() > 32 {
        return false;
    }
    bytes[0].is_ascii_alphabetic()
        && bytes[1..]
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.'))
}

fn is_email(text: &str) -> bool {
    const LOCAL_EXTRA: &str = ".!#$%&'*+/=?^_`{|}~-";
    let Some((local, domain)) = text.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || !domain.contains('.') {
        return false;
    }
    if !local
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || LOCAL_EXTRA.contains(c))
    {
        return false;
    }
    domain.split('.').all(|label| {
        !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

struct AutolinkLiteral {
    start: usize,
    end: usize,
    url: String,
}

/// Bare URL or e-mail literal at `start`, used when `detect_urls` is on.
fn autolink_literal(text: &str, start: usize) -> Option<AutolinkLiteral> {
    let bytes = text.as_bytes();
    let prev = if start == 0 {
        None
    } else {
        bytes.get(start - 1).copied()
    };
    if !is_autolink_boundary(prev) {
        return None;
    }
    if text[start..].starts_with("http://") || text[start..].starts_with("https://") {
        let end = scan_autolink_end(text, start);
        if end == start {
            return None;
        }
        return Some(AutolinkLiteral {
            start,
            end,
            url: text[start..end].to_string(),
        });
    }
    if text[start..].starts_with("www.") {
        let end = scan_autolink_end(text, start);
        if end <= start + 4 || !text[start + 4..end].contains('.') {
            return None;
        }
        return Some(AutolinkLiteral {
            start,
            end,
            url: format!("http://{}", &text[start..end]),
        });
    }
    let end = scan_email_end(text, start)?;
    let candidate = &text[start..end];
    if is_email(candidate) {
        return Some(AutolinkLiteral {
            start,
            end,
            url: format!("mailto:{candidate}"),
        });
    }
    None
}

fn is_autolink_boundary(prev: Option<u8>) -> bool {
    match prev {
        None => true,
        Some(byte) => {
            byte.is_ascii_whitespace() || matches!(byte, b'(' | b'[' | b'{' | b'"' | b'\'')
        }
    }
}

fn scan_autolink_end(text: &str, start: usize) -> usize {
    let bytes = text.as_bytes();
    let mut end = start;
    while end < bytes.len() {
        let byte = bytes[end];
        if byte.is_ascii_whitespace() || matches!(byte, b'<' | b'>' | b'"' | b'\'') {
            break;
        }
        end += 1;
    }
    while end > start && !text.is_char_boundary(end) {
        end -= 1;
    }
    trim_autolink_punct(text, start, end)
}

fn scan_email_end(text: &str, start: usize) -> Option<usize> {
    let end = scan_autolink_end(text, start);
    if end == start { None } else { Some(end) }
}

fn trim_autolink_punct(text: &str, start: usize, mut end: usize) -> usize {
    let bytes = text.as_bytes();
    while end > start {
        if matches!(bytes[end - 1], b'.' | b',' | b';' | b':' | b'!' | b'?') {
            end -= 1;
            continue;
        }
        break;
    }
    for (open, close) in [(b'(', b')'), (b'[', b']'), (b'{', b'}')] {
        if end > start && bytes[end - 1] == close {
            end = trim_unbalanced_brackets(bytes, start, end, open, close);
        }
    }
    end
}

fn trim_unbalanced_brackets(bytes: &[u8], start: usize, mut end: usize, open: u8, close: u8) -> usize {
    let mut opens = 0usize;
    let mut closes = 0usize;
    for byte in &bytes[start..end] {
        if *byte == open {
            opens += 1;
        } else if *byte == close {
            closes += 1;
        }
    }
    while end > start && bytes[end - 1] == close && closes > opens {
        end -= 1;
        closes -= 1;
    }
    end
}

fn count_run(bytes: &[u8], start: usize, end: usize, needle: u8) -> usize {
    let mut i = start;
    while i < end && bytes[i] == needle {
        i += 1;
    }
    i - start
}

/// Flanking classification of a delimiter run, with the underscore intraword
/// restriction.
fn delimiter_properties(text: &str, pos: usize, run_len: usize, marker: u8) -> (bool, bool) {
    let before = text[..pos].chars().next_back();
    let after = text[pos + run_len..].chars().next();

    let before_is_whitespace = before.is_none_or(|ch| ch.is_whitespace());
    let after_is_whitespace = after.is_none_or(|ch| ch.is_whitespace());
    let before_is_punctuation = before.is_some_and(is_punctuation_like);
    let after_is_punctuation = after.is_some_and(is_punctuation_like);

    let left_flanking = !after_is_whitespace
        && (!after_is_punctuation || before_is_whitespace || before_is_punctuation);
    let right_flanking = !before_is_whitespace
        && (!before_is_punctuation || after_is_whitespace || after_is_punctuation);

    if marker == b'_' {
        let can_open = left_flanking && (!right_flanking || before_is_punctuation);
        let can_close = right_flanking && (!left_flanking || after_is_punctuation);
        (can_open, can_close)
    } else {
        (left_flanking, right_flanking)
    }
}

fn is_punctuation_like(ch: char) -> bool {
    !ch.is_whitespace() && !ch.is_alphanumeric()
}

/// Scans for the nearest run that can close an emphasis span opened with
/// `use_len` markers, skipping escapes and code spans.
fn find_emphasis_closer(
    text: &str,
    from: usize,
    end: usize,
    marker: u8,
    use_len: usize,
    underline: bool,
) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut j = from;
    while j < end {
        let byte = bytes[j];
        if byte == b'\\' {
            j += 2;
            continue;
        }
        if byte == b'`' {
            if let Some((_, next)) = code_span(text, j, end) {
                j = next;
            } else {
                j += count_run(bytes, j, end, b'`');
            }
            continue;
        }
        if byte == marker {
            let closer_len = count_run(bytes, j, end, marker);
            let (_, can_close) = delimiter_properties(text, j, closer_len, marker);
            let parity_ok = if underline {
                true
            } else if use_len == 2 {
                closer_len >= 2
            } else {
                closer_len == 1
            };
            if can_close && parity_ok && j > from {
                return Some(j);
            }
            j += closer_len;
            continue;
        }
        j += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_spans_require_equal_closing_runs() {
        assert_eq!(code_span("`a`", 0, 3), Some(("a".to_string(), 3)));
        assert_eq!(code_span("``a``", 0, 5), Some(("a".to_string(), 5)));
        assert_eq!(code_span("``a`b``", 0, 7), Some(("a`b".to_string(), 7)));
        assert_eq!(code_span("`a``", 0, 4), Some(("a".to_string(), 3)));
        assert_eq!(code_span("``a`", 0, 4), None);
    }

    #[test]
    fn code_span_content_strips_one_padding_space() {
        assert_eq!(code_span("` a `", 0, 5), Some(("a".to_string(), 5)));
        assert_eq!(code_span("`  `", 0, 4), Some(("  ".to_string(), 4)));
        assert_eq!(code_span("`a\nb`", 0, 5), Some(("a b".to_string(), 5)));
    }

    #[test]
    fn bracket_autolinks_need_a_scheme_or_address() {
        assert!(bracket_autolink("<http://x>", 0, 10).is_some());
        assert_eq!(
            bracket_autolink("<a@b.com>", 0, 9).map(|(url, _, _)| url),
            Some("mailto:a@b.com".to_string())
        );
        assert!(bracket_autolink("<not a link>", 0, 12).is_none());
        assert!(bracket_autolink("<nocolonhere>", 0, 13).is_none());
    }

    #[test]
    fn bare_urls_stop_before_trailing_punctuation() {
        let link = autolink_literal("see http://x.test/a.", 4).expect("literal");
        assert_eq!(link.url, "http://x.test/a");

        let link = autolink_literal("(http://x.test/a(b))", 1).expect("literal");
        assert_eq!(link.url, "http://x.test/a(b)");
    }

    #[test]
    fn www_literals_get_a_scheme_and_need_a_second_dot() {
        let link = autolink_literal("www.example.com", 0).expect("literal");
        assert_eq!(link.url, "http://www.example.com");
        assert!(autolink_literal("www.nodot", 0).is_none());
    }

    #[test]
    fn literals_only_start_at_word_boundaries() {
        assert!(autolink_literal("xhttp://a.test", 1).is_none());
        assert!(autolink_literal("\"http://a.test\"", 1).is_some());
    }

    #[test]
    fn flanking_rules_classify_delimiter_runs() {
        // "*a*": the first run opens, the second closes.
        assert_eq!(delimiter_properties("*a*", 0, 1, b'*'), (true, false));
        assert_eq!(delimiter_properties("*a*", 2, 1, b'*'), (false, true));
        // Intraword underscores neither open nor close.
        assert_eq!(delimiter_properties("a_b", 1, 1, b'_'), (false, false));
        // Intraword asterisks may.
        assert_eq!(delimiter_properties("a*b", 1, 1, b'*'), (true, true));
    }

    #[test]
    fn closer_search_respects_parity_and_code_spans() {
        // A single-marker opener skips double runs.
        assert_eq!(find_emphasis_closer("a**b**c*", 0, 8, b'*', 1, false), Some(7));
        // Markers inside a code span cannot close.
        assert_eq!(find_emphasis_closer("`*`x*", 0, 5, b'*', 1, false), Some(4));
        assert_eq!(find_emphasis_closer("a**b", 0, 4, b'*', 1, false), None);
    }

    #[test]
    fn bracket_matching_handles_nesting_and_escapes() {
        assert_eq!(find_bracket_end(b"a]b", 0, 3), Some(1));
        assert_eq!(find_bracket_end(b"[x]]", 0, 4), Some(3));
        assert_eq!(find_bracket_end(b"\\]]", 0, 3), Some(2));
        assert_eq!(find_bracket_end(b"open", 0, 4), None);
    }

    #[test]
    fn inline_destinations_parse_urls_and_titles() {
        let (url, title, next) = inline_destination("(/u)", 0, 4).expect("destination");
        assert_eq!(url, "/u");
        assert_eq!(title, None);
        assert_eq!(next, 4);

        let (url, title, _) = inline_destination("(/u \"t\")", 0, 8).expect("destination");
        assert_eq!(url, "/u");
        assert_eq!(title.as_deref(), Some("t"));

        let (url, _, _) = inline_destination("(<a b>)", 0, 7).expect("destination");
        assert_eq!(url, "a b");

        assert!(inline_destination("(/u \"t\" x)", 0, 10).is_none());
        assert!(inline_destination("(/u", 0, 3).is_none());
    }
}
