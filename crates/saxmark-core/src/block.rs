//! Line classifiers for the block layer.
//!
//! Every function here looks at a single line of text, with container
//! prefixes already stripped by the caller. Indentation is measured in
//! columns with 4-column tab stops.

use std::collections::HashSet;

use once_cell::sync::Lazy;

use crate::reference::unescape_punct;

pub(crate) fn is_space_or_tab(byte: u8) -> bool {
    byte == b' ' || byte == b'\t'
}

pub(crate) fn is_blank(text: &str) -> bool {
    text.bytes().all(is_space_or_tab)
}

/// Next column after consuming `byte`, or `None` for non-whitespace.
pub(crate) fn advance_column(col: usize, byte: u8) -> Option<usize> {
    match byte {
        b' ' => Some(col + 1),
        b'\t' => Some(col + (4 - col % 4)),
        _ => None,
    }
}

/// Whether the line starts with at least `required` columns of whitespace.
pub(crate) fn has_indent(text: &str, required: usize) -> bool {
    let mut col = 0;
    for byte in text.bytes() {
        if col >= required {
            return true;
        }
        match advance_column(col, byte) {
            Some(next) => col = next,
            None => return false,
        }
    }
    col >= required
}

/// Removes `columns` of leading indentation, expanding a tab that straddles
/// the boundary into the spaces left over.
pub(crate) fn strip_columns(text: &str, columns: usize) -> String {
    let bytes = text.as_bytes();
    let mut col = 0;
    let mut idx = 0;
    while idx < bytes.len() && col < columns {
        match advance_column(col, bytes[idx]) {
            Some(next) => {
                idx += 1;
                if next > columns {
                    let mut out = " ".repeat(next - columns);
                    out.push_str(&text[idx..]);
                    return out;
                }
                col = next;
            }
            None => break,
        }
    }
    text[idx..].to_string()
}

/// Strips leading whitespace as long as it stays within `max_cols` columns;
/// `None` means the line is indented further than that.
pub(crate) fn strip_up_to_columns(text: &str, max_cols: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut cols = 0;
    let mut idx = 0;
    while idx < bytes.len() {
        match advance_column(cols, bytes[idx]) {
            Some(next) => {
                if next > max_cols {
                    return None;
                }
                cols = next;
                idx += 1;
            }
            None => break,
        }
    }
    Some(&text[idx..])
}

pub(crate) fn strip_leading_spaces(text: &str, max: usize) -> &str {
    let bytes = text.as_bytes();
    let mut idx = 0;
    while idx < bytes.len() && idx < max && bytes[idx] == b' ' {
        idx += 1;
    }
    &text[idx..]
}

pub(crate) fn is_thematic_break(text: &str) -> bool {
    let trimmed = match strip_up_to_columns(text, 3) {
        Some(value) => value,
        None => return false,
    };
    let mut marker: Option<u8> = None;
    let mut count = 0;
    for byte in trimmed.bytes() {
        if is_space_or_tab(byte) {
            continue;
        }
        match marker {
            None => {
                if !matches!(byte, b'-' | b'*' | b'_') {
                    return false;
                }
                marker = Some(byte);
                count += 1;
            }
            Some(m) if m == byte => count += 1,
            Some(_) => return false,
        }
    }
    count >= 3
}

/// ATX heading: level and the content slice with surrounding whitespace and
/// any closing hash run removed.
pub(crate) fn atx_heading(text: &str) -> Option<(u8, &str)> {
    let trimmed = strip_up_to_columns(text, 3)?;
    let bytes = trimmed.as_bytes();
    let mut level = 0;
    while level < bytes.len() && bytes[level] == b'#' {
        level += 1;
    }
    if level == 0 || level > 6 {
        return None;
    }
    if level < bytes.len() && !is_space_or_tab(bytes[level]) {
        return None;
    }
    let mut start = level;
    while start < bytes.len() && is_space_or_tab(bytes[start]) {
        start += 1;
    }
    let mut end = bytes.len();
    while end > start && is_space_or_tab(bytes[end - 1]) {
        end -= 1;
    }
    if end > start {
        let mut hash_start = end;
        while hash_start > start && bytes[hash_start - 1] == b'#' {
            hash_start -= 1;
        }
        if hash_start < end && (hash_start == start || is_space_or_tab(bytes[hash_start - 1])) {
            end = hash_start;
            while end > start && is_space_or_tab(bytes[end - 1]) {
                end -= 1;
            }
        }
    }
    Some((level as u8, &trimmed[start..end]))
}

/// Setext underline: a run of `=` (level 1) or `-` (level 2) with nothing
/// but trailing whitespace after it.
pub(crate) fn setext_underline(text: &str) -> Option<u8> {
    let trimmed = strip_up_to_columns(text, 3)?;
    let bytes = trimmed.as_bytes();
    let ch = *bytes.first()?;
    if ch != b'=' && ch != b'-' {
        return None;
    }
    let mut i = 0;
    while i < bytes.len() && bytes[i] == ch {
        i += 1;
    }
    if bytes[i..].iter().any(|b| !is_space_or_tab(*b)) {
        return None;
    }
    Some(if ch == b'=' { 1 } else { 2 })
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct FenceOpen {
    pub indent: usize,
    pub len: usize,
    pub marker: u8,
    pub info: String,
}

pub(crate) fn fence_open(text: &str) -> Option<FenceOpen> {
    let bytes = text.as_bytes();
    let mut idx = 0;
    while idx < bytes.len() && idx < 3 && bytes[idx] == b' ' {
        idx += 1;
    }
    if idx < bytes.len() && bytes[idx] == b' ' {
        return None;
    }
    let rest = &text[idx..];
    let marker = if rest.starts_with("```") {
        b'`'
    } else if rest.starts_with("~~~") {
        b'~'
    } else {
        return None;
    };
    let len = rest.bytes().take_while(|b| *b == marker).count();
    let info = rest[len..].trim_matches([' ', '\t']);
    if marker == b'`' && info.contains('`') {
        return None;
    }
    Some(FenceOpen {
        indent: idx,
        len,
        marker,
        info: unescape_punct(info),
    })
}

pub(crate) fn fence_close(text: &str, fence_len: usize, marker: u8) -> bool {
    let bytes = text.as_bytes();
    let mut idx = 0;
    while idx < bytes.len() && idx < 3 && bytes[idx] == b' ' {
        idx += 1;
    }
    if idx < bytes.len() && bytes[idx] == b' ' {
        return false;
    }
    let rest = &bytes[idx..];
    let mut count = 0;
    while count < rest.len() && rest[count] == marker {
        count += 1;
    }
    count >= fence_len && rest[count..].iter().all(|b| is_space_or_tab(*b))
}

/// Bytes consumed by a `>` marker with up to 3 columns of indentation and
/// one optional following space or tab.
pub(crate) fn blockquote_prefix(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut idx = 0;
    while idx < bytes.len() && idx < 3 && bytes[idx] == b' ' {
        idx += 1;
    }
    if idx < bytes.len() && bytes[idx] == b' ' {
        return None;
    }
    if bytes.get(idx) != Some(&b'>') {
        return None;
    }
    idx += 1;
    if matches!(bytes.get(idx), Some(&b' ') | Some(&b'\t')) {
        idx += 1;
    }
    Some(idx)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct ListMarker {
    pub ordered: bool,
    pub start: Option<u64>,
    pub marker: u8,
    /// Byte offset of the item's content on the marker line.
    pub content_offset: usize,
    /// Column continuation lines must reach to stay inside the item.
    pub content_indent: usize,
    pub empty: bool,
}

pub(crate) fn list_marker(text: &str) -> Option<ListMarker> {
    if is_thematic_break(text) {
        return None;
    }
    let bytes = text.as_bytes();
    let mut idx = 0;
    while idx < bytes.len() && idx < 3 && bytes[idx] == b' ' {
        idx += 1;
    }
    if idx < bytes.len() && bytes[idx] == b' ' {
        return None;
    }

    let (ordered, start, marker, marker_end) = if idx < bytes.len()
        && matches!(bytes[idx], b'-' | b'+' | b'*')
    {
        (false, None, bytes[idx], idx + 1)
    } else {
        let digit_start = idx;
        while idx < bytes.len() && bytes[idx].is_ascii_digit() {
            idx += 1;
        }
        let digits = idx - digit_start;
        if digits == 0 || digits > 9 || idx >= bytes.len() {
            return None;
        }
        let delimiter = bytes[idx];
        if delimiter != b'.' && delimiter != b')' {
            return None;
        }
        let number = text[digit_start..idx].parse::<u64>().ok();
        (true, number, delimiter, idx + 1)
    };

    // Up to here every consumed byte is one column wide.
    let base_col = marker_end;
    let mut ws_end = marker_end;
    let mut col = base_col;
    while ws_end < bytes.len() {
        match advance_column(col, bytes[ws_end]) {
            Some(next) => {
                col = next;
                ws_end += 1;
            }
            None => break,
        }
    }
    let ws_cols = col - base_col;
    let has_content = ws_end < bytes.len();

    if has_content && ws_cols == 0 {
        return None;
    }
    if !has_content {
        return Some(ListMarker {
            ordered,
            start,
            marker,
            content_offset: ws_end,
            content_indent: base_col + 1,
            empty: true,
        });
    }
    if ws_cols > 4 {
        // Content starts one column in; the rest of the whitespace belongs to
        // the item body (indented code inside the item).
        return Some(ListMarker {
            ordered,
            start,
            marker,
            content_offset: marker_end + 1,
            content_indent: base_col + 1,
            empty: false,
        });
    }
    Some(ListMarker {
        ordered,
        start,
        marker,
        content_offset: ws_end,
        content_indent: base_col + ws_cols,
        empty: false,
    })
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum HtmlBlockKind {
    Comment,
    Tag,
}

#[rustfmt::skip]
const HTML_BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "base", "basefont", "blockquote", "body",
    "caption", "center", "col", "colgroup", "dd", "details", "dialog", "dir",
    "div", "dl", "dt", "fieldset", "figcaption", "figure", "footer", "form",
    "frame", "frameset", "h1", "h2", "h3", "h4", "h5", "h6", "head", "header",
    "hr", "html", "iframe", "legend", "li", "link", "main", "menu", "menuitem",
    "nav", "noframes", "ol", "optgroup", "option", "p", "param", "search",
    "section", "source", "summary", "table", "tbody", "td", "tfoot", "th",
    "thead", "title", "tr", "track", "ul",
];

static TAG_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| HTML_BLOCK_TAGS.iter().copied().collect());

pub(crate) fn html_block_start(text: &str) -> Option<HtmlBlockKind> {
    let trimmed = strip_up_to_columns(text, 3)?;
    if trimmed.starts_with("<!--") {
        return Some(HtmlBlockKind::Comment);
    }
    let rest = trimmed.strip_prefix('<')?;
    let rest = rest.strip_prefix('/').unwrap_or(rest);
    let name_len = rest
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric())
        .count();
    if name_len == 0 {
        return None;
    }
    let name = rest[..name_len].to_ascii_lowercase();
    if !TAG_SET.contains(name.as_str()) {
        return None;
    }
    match rest.as_bytes().get(name_len).copied() {
        None | Some(b' ') | Some(b'\t') | Some(b'>') => Some(HtmlBlockKind::Tag),
        Some(b'/') if rest[name_len..].starts_with("/>") => Some(HtmlBlockKind::Tag),
        _ => None,
    }
}

pub(crate) fn html_comment_end(text: &str) -> bool {
    text.contains("-->")
}

/// Whether a line may extend an open paragraph, either directly or as a lazy
/// continuation inside a blockquote or list item.
pub(crate) fn can_continue_paragraph(text: &str) -> bool {
    if is_blank(text)
        || is_thematic_break(text)
        || atx_heading(text).is_some()
        || fence_open(text).is_some()
        || blockquote_prefix(text).is_some()
        || setext_underline(text).is_some()
        || html_block_start(text).is_some()
    {
        return false;
    }
    if let Some(marker) = list_marker(text) {
        // Only a list that could plausibly start here interrupts a paragraph:
        // non-empty items, and ordered ones only when numbered 1.
        if !marker.empty && (!marker.ordered || marker.start == Some(1)) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thematic_breaks_need_three_matching_markers() {
        assert!(is_thematic_break("***"));
        assert!(is_thematic_break(" - - -"));
        assert!(is_thematic_break("_____"));
        assert!(!is_thematic_break("**"));
        assert!(!is_thematic_break("-*-"));
        assert!(!is_thematic_break("    ---"));
    }

    #[test]
    fn atx_headings_have_levels_one_through_six() {
        assert_eq!(atx_heading("# one"), Some((1, "one")));
        assert_eq!(atx_heading("###### six"), Some((6, "six")));
        assert_eq!(atx_heading("####### seven"), None);
        assert_eq!(atx_heading("#hash"), None);
        assert_eq!(atx_heading("#"), Some((1, "")));
    }

    #[test]
    fn atx_closing_hashes_are_stripped() {
        assert_eq!(atx_heading("## two ##"), Some((2, "two")));
        assert_eq!(atx_heading("# a#"), Some((1, "a#")));
        assert_eq!(atx_heading("# a # "), Some((1, "a")));
    }

    #[test]
    fn setext_underlines_map_to_levels() {
        assert_eq!(setext_underline("==="), Some(1));
        assert_eq!(setext_underline("-"), Some(2));
        assert_eq!(setext_underline("--  "), Some(2));
        assert_eq!(setext_underline("=-"), None);
        assert_eq!(setext_underline("text"), None);
    }

    #[test]
    fn fences_open_with_three_or_more_markers() {
        let open = fence_open("```rust").expect("fence");
        assert_eq!(open.len, 3);
        assert_eq!(open.marker, b'`');
        assert_eq!(open.info, "rust");

        assert!(fence_open("~~~~").is_some());
        assert!(fence_open("``").is_none());
        assert!(fence_open("``` a`b").is_none());
        assert!(fence_open("~~~ a`b").is_some());
    }

    #[test]
    fn fence_close_requires_at_least_the_opening_length() {
        assert!(fence_close("```", 3, b'`'));
        assert!(fence_close("`````  ", 3, b'`'));
        assert!(!fence_close("``", 3, b'`'));
        assert!(!fence_close("``` trailing", 3, b'`'));
        assert!(!fence_close("~~~", 3, b'`'));
    }

    #[test]
    fn blockquote_prefix_consumes_marker_and_one_space() {
        assert_eq!(blockquote_prefix("> a"), Some(2));
        assert_eq!(blockquote_prefix(">a"), Some(1));
        assert_eq!(blockquote_prefix("   > a"), Some(5));
        assert_eq!(blockquote_prefix("    > a"), None);
        assert_eq!(blockquote_prefix("a"), None);
    }

    #[test]
    fn unordered_markers_accept_three_bullets() {
        for line in ["- a", "* a", "+ a"] {
            let marker = list_marker(line).expect("marker");
            assert!(!marker.ordered);
            assert_eq!(marker.content_offset, 2);
            assert_eq!(marker.content_indent, 2);
        }
        assert!(list_marker("-a").is_none());
    }

    #[test]
    fn ordered_markers_carry_their_start_number() {
        let marker = list_marker("7) go").expect("marker");
        assert!(marker.ordered);
        assert_eq!(marker.start, Some(7));
        assert_eq!(marker.marker, b')');
        assert_eq!(marker.content_indent, 3);

        assert!(list_marker("1234567890. too long").is_none());
    }

    #[test]
    fn empty_markers_are_flagged() {
        let marker = list_marker("-").expect("marker");
        assert!(marker.empty);
        assert_eq!(marker.content_indent, 2);
    }

    #[test]
    fn a_dash_ruler_is_not_a_list() {
        assert!(list_marker("- - -").is_none());
    }

    #[test]
    fn indent_helpers_expand_tabs_to_four_column_stops() {
        assert!(has_indent("    code", 4));
        assert!(has_indent("\tcode", 4));
        assert!(!has_indent("   x", 4));
        assert_eq!(strip_columns("    code", 4), "code");
        assert_eq!(strip_columns("\t\tcode", 4), "\tcode".to_string());
        assert_eq!(strip_columns("  \tcode", 4), "code");
    }

    #[test]
    fn html_blocks_start_with_known_tags_or_comments() {
        assert_eq!(html_block_start("<div>"), Some(HtmlBlockKind::Tag));
        assert_eq!(html_block_start("</table>"), Some(HtmlBlockKind::Tag));
        assert_eq!(html_block_start("<hr/>"), Some(HtmlBlockKind::Tag));
        assert_eq!(html_block_start("<!-- note"), Some(HtmlBlockKind::Comment));
        assert_eq!(html_block_start("<span>"), None);
        assert_eq!(html_block_start("< div>"), None);
    }

    #[test]
    fn paragraph_interruption_rules() {
        assert!(can_continue_paragraph("plain text"));
        assert!(can_continue_paragraph("2. not a fresh list"));
        assert!(can_continue_paragraph("-"));
        assert!(!can_continue_paragraph("- item"));
        assert!(!can_continue_paragraph("1. item"));
        assert!(!can_continue_paragraph("# heading"));
        assert!(!can_continue_paragraph("> quote"));
        assert!(!can_continue_paragraph("```"));
        assert!(!can_continue_paragraph(""));
    }
}
