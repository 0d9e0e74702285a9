use crate::block::{self, HtmlBlockKind};
use crate::event::{Aborted, Attributes, ElementKind, Emitter, Observer};
use crate::inline::InlineScanner;
use crate::line_index::LineIndex;
use crate::options::ParserOptions;
use crate::reference::{self, ReferenceTable};
use crate::scanner::Scanner;
use crate::span::Span;

/// Event-driven Markdown parser.
///
/// Construct it with the document text, then call [`parse`](Self::parse)
/// with an observer. Every parse builds its own line index, reference table
/// and container stack, so a parser value can be reused sequentially and two
/// parser values never share state.
pub struct MarkdownParser {
    source: String,
    options: ParserOptions,
}

impl MarkdownParser {
    pub fn new(source: impl Into<String>) -> Self {
        Self::with_options(source, ParserOptions::default())
    }

    pub fn with_options(source: impl Into<String>, options: ParserOptions) -> Self {
        Self {
            source: source.into(),
            options,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn options(&self) -> ParserOptions {
        self.options
    }

    /// Runs one parse, pushing events to `observer` in document order.
    ///
    /// Returns `false` only when the observer requested a stop; any text is
    /// otherwise parseable, so there is no failure mode for malformed input.
    pub fn parse(&self, observer: &mut dyn Observer) -> bool {
        let index = LineIndex::new(&self.source);
        let refs = collect_references(&self.source, &index);
        let mut emit = Emitter::new(observer);
        let mut scanner = BlockScanner {
            source: &self.source,
            index: &index,
            options: self.options,
            refs: &refs,
            stack: Vec::new(),
            after_blank: false,
        };
        scanner.run(&mut emit).is_ok()
    }
}

/// Pre-pass over the document that records reference definitions.
///
/// This is a restricted rendition of the block scanner: it strips blockquote
/// markers and one list marker, skips fenced-code regions, and tracks just
/// enough blank-line state to know whether a line sits at paragraph-start
/// position. Everything else is ignored.
fn collect_references(source: &str, index: &LineIndex) -> ReferenceTable {
    let mut refs = ReferenceTable::default();
    let mut fence: Option<(u8, usize)> = None;
    let mut in_paragraph = false;

    for line_idx in 0..index.count() {
        let Some(span) = index.line_at(line_idx) else {
            break;
        };
        let limit = line_content_end(source, span);
        let mut scanner = Scanner::with_position(source, span.start);
        while let Some(consumed) = block::blockquote_prefix(&source[scanner.pos()..limit]) {
            scanner.set_pos(scanner.pos() + consumed);
        }

        let rest = &source[scanner.pos()..limit];
        if let Some((marker, len)) = fence {
            if block::fence_close(rest, len, marker) {
                fence = None;
            }
            in_paragraph = false;
            continue;
        }
        if let Some(open) = block::fence_open(rest) {
            fence = Some((open.marker, open.len));
            in_paragraph = false;
            continue;
        }
        if block::is_blank(rest) {
            in_paragraph = false;
            continue;
        }
        if let Some(marker) = block::list_marker(rest)
            && !marker.empty
        {
            scanner.set_pos(scanner.pos() + marker.content_offset);
            in_paragraph = false;
        }
        if !in_paragraph
            && let Some((label, entry)) = reference::scan_definition(&mut scanner, limit)
        {
            refs.insert(&label, entry);
            continue;
        }

        let rest = &source[scanner.pos()..limit];
        in_paragraph = block::atx_heading(rest).is_none()
            && !block::is_thematic_break(rest)
            && block::html_block_start(rest).is_none();
    }
    refs
}

fn line_content_end(source: &str, span: Span) -> usize {
    let bytes = source.as_bytes();
    let mut end = span.end;
    if end > span.start && bytes[end - 1] == b'\n' {
        end -= 1;
    }
    if end > span.start && bytes[end - 1] == b'\r' {
        end -= 1;
    }
    end
}

/// One open block on the container stack. Leaves (everything that carries
/// text) only ever sit on top; containers nest below them.
enum Container {
    Blockquote,
    List { ordered: bool, marker: u8 },
    ListItem { content_indent: usize },
    Paragraph(ParagraphBuffer),
    FencedCode { marker: u8, len: usize, indent: usize },
    IndentedCode { pending_blanks: usize },
    HtmlBlock { kind: HtmlBlockKind },
}

/// Paragraph content is buffered until the paragraph closes, so a setext
/// underline can still turn it into a heading and the inline pass sees the
/// whole block at once.
#[derive(Default)]
struct ParagraphBuffer {
    lines: Vec<String>,
    last_was_lazy: bool,
}

impl ParagraphBuffer {
    fn push_line(&mut self, line: &str, lazy: bool) {
        let mut removed = 0;
        for byte in line.bytes() {
            if byte == b' ' && removed < 3 {
                removed += 1;
            } else {
                break;
            }
        }
        self.lines.push(line[removed..].to_string());
        self.last_was_lazy = lazy;
    }

    fn into_text(mut self) -> String {
        if let Some(last) = self.lines.last_mut() {
            let trimmed = last.trim_end_matches([' ', '\t']).len();
            last.truncate(trimmed);
        }
        self.lines.join("\n")
    }
}

struct BlockScanner<'a> {
    source: &'a str,
    index: &'a LineIndex,
    options: ParserOptions,
    refs: &'a ReferenceTable,
    stack: Vec<Container>,
    after_blank: bool,
}

impl<'a> BlockScanner<'a> {
    fn run(&mut self, emit: &mut Emitter) -> Result<(), Aborted> {
        let source = self.source;
        let index = self.index;
        emit.document_start()?;
        for line_idx in 0..index.count() {
            let Some(span) = index.line_at(line_idx) else {
                break;
            };
            let line = &source[span.start..line_content_end(source, span)];
            self.process_line(line, emit)?;
        }
        self.close_to(0, emit)?;
        emit.document_end()
    }

    /// Number of stack entries below the topmost leaf, i.e. how many entries
    /// a fully matching line has to satisfy with prefixes.
    fn leaf_base(&self) -> usize {
        match self.stack.last() {
            Some(
                Container::Paragraph(_)
                | Container::FencedCode { .. }
                | Container::IndentedCode { .. }
                | Container::HtmlBlock { .. },
            ) => self.stack.len() - 1,
            _ => self.stack.len(),
        }
    }

    fn process_line(&mut self, line: &str, emit: &mut Emitter) -> Result<(), Aborted> {
        // Match the open containers' prefixes, outermost first.
        let mut text = line.to_string();
        let mut matched = 0;
        for entry in &self.stack {
            match entry {
                Container::Blockquote => match block::blockquote_prefix(&text) {
                    Some(consumed) => {
                        text = text[consumed..].to_string();
                        matched += 1;
                    }
                    None => break,
                },
                Container::List { .. } => matched += 1,
                Container::ListItem { content_indent } => {
                    if block::is_blank(&text) {
                        matched += 1;
                    } else if block::has_indent(&text, *content_indent) {
                        text = block::strip_columns(&text, *content_indent);
                        matched += 1;
                    } else {
                        break;
                    }
                }
                _ => break,
            }
        }

        if block::is_blank(&text) {
            return self.process_blank(matched, emit);
        }
        let was_after_blank = self.after_blank;
        self.after_blank = false;

        if matched == self.leaf_base() {
            // Leaf continuation.
            if let Some(Container::FencedCode {
                marker,
                len,
                indent,
            }) = self.stack.last()
            {
                let (marker, len, indent) = (*marker, *len, *indent);
                if block::fence_close(&text, len, marker) {
                    self.stack.pop();
                    return emit.end(ElementKind::FencedCodeBlock);
                }
                let mut content = block::strip_leading_spaces(&text, indent).to_string();
                content.push('\n');
                return emit.characters(&content);
            }
            if let Some(Container::HtmlBlock { kind }) = self.stack.last() {
                let kind = *kind;
                emit.characters(&format!("{text}\n"))?;
                if kind == HtmlBlockKind::Comment && block::html_comment_end(&text) {
                    self.stack.pop();
                    emit.end(ElementKind::RawHtmlBlock)?;
                }
                return Ok(());
            }
            if let Some(Container::IndentedCode { .. }) = self.stack.last() {
                if block::has_indent(&text, 4) {
                    let pending = match self.stack.last_mut() {
                        Some(Container::IndentedCode { pending_blanks }) => {
                            std::mem::take(pending_blanks)
                        }
                        _ => 0,
                    };
                    for _ in 0..pending {
                        emit.characters("\n")?;
                    }
                    let mut content = block::strip_columns(&text, 4);
                    content.push('\n');
                    return emit.characters(&content);
                }
                self.stack.pop();
                emit.end(ElementKind::IndentedCodeBlock)?;
                // The line itself is classified below.
            }
            if let Some(Container::Paragraph(_)) = self.stack.last() {
                if block::is_thematic_break(&text) {
                    self.close_top(emit)?;
                } else {
                    let last_was_lazy = match self.stack.last() {
                        Some(Container::Paragraph(buffer)) => buffer.last_was_lazy,
                        _ => false,
                    };
                    if !last_was_lazy && let Some(level) = block::setext_underline(&text) {
                        return self.close_paragraph_as_heading(level, emit);
                    }
                    if block::can_continue_paragraph(&text) && !self.interrupts_open_list(&text) {
                        if let Some(Container::Paragraph(buffer)) = self.stack.last_mut() {
                            buffer.push_line(&text, false);
                        }
                        return Ok(());
                    }
                    self.close_top(emit)?;
                }
            }
        } else {
            // Unmatched containers: lazy continuation carries plain paragraph
            // text past a missing prefix; anything else unwinds.
            if !was_after_blank
                && matches!(self.stack.last(), Some(Container::Paragraph(_)))
                && block::can_continue_paragraph(&text)
                && !self.interrupts_open_list(&text)
            {
                if let Some(Container::Paragraph(buffer)) = self.stack.last_mut() {
                    buffer.push_line(&text, true);
                }
                return Ok(());
            }
            self.close_to(matched, emit)?;
        }

        self.open_blocks(text, emit)
    }

    fn process_blank(&mut self, matched: usize, emit: &mut Emitter) -> Result<(), Aborted> {
        if matched == self.leaf_base() {
            match self.stack.last_mut() {
                Some(Container::FencedCode { .. }) => {
                    // Blank lines inside a fence are content.
                    return emit.characters("\n");
                }
                Some(Container::HtmlBlock { kind }) => {
                    let kind = *kind;
                    if kind == HtmlBlockKind::Comment {
                        emit.characters("\n")?;
                    } else {
                        self.stack.pop();
                        emit.end(ElementKind::RawHtmlBlock)?;
                    }
                }
                Some(Container::IndentedCode { pending_blanks }) => {
                    *pending_blanks += 1;
                }
                Some(Container::Paragraph(_)) => {
                    self.close_top(emit)?;
                }
                _ => {}
            }
        } else {
            self.close_to(matched, emit)?;
        }
        self.after_blank = true;
        Ok(())
    }

    /// Whether a line opens another item of a list that is currently on the
    /// stack, which takes priority over continuing a paragraph.
    fn interrupts_open_list(&self, text: &str) -> bool {
        let Some(marker) = block::list_marker(text) else {
            return false;
        };
        if marker.empty {
            return false;
        }
        self.stack.iter().any(|entry| {
            matches!(entry, Container::List { ordered, marker: m }
                if *ordered == marker.ordered && *m == marker.marker)
        })
    }

    /// Classifies `text` as one or more new block openers at the current
    /// stack top, using the fixed precedence order.
    fn open_blocks(&mut self, mut text: String, emit: &mut Emitter) -> Result<(), Aborted> {
        loop {
            if block::is_blank(&text) {
                return Ok(());
            }

            // An open list only stays open for further items of its family.
            if let Some(Container::List { ordered, marker }) = self.stack.last() {
                let same_family = block::list_marker(&text)
                    .is_some_and(|m| m.ordered == *ordered && m.marker == *marker);
                if !same_family {
                    self.close_top(emit)?;
                    continue;
                }
            }

            if block::is_thematic_break(&text) {
                emit.start_empty(ElementKind::HorizontalRule)?;
                return emit.end(ElementKind::HorizontalRule);
            }
            if let Some((level, content)) = block::atx_heading(&text) {
                let mut attrs = Attributes::new();
                attrs.push("level", level.to_string());
                emit.start(ElementKind::Heading, &attrs)?;
                self.inline().emit_block_text(content, emit)?;
                return emit.end(ElementKind::Heading);
            }
            if let Some(open) = block::fence_open(&text) {
                let mut attrs = Attributes::new();
                if !open.info.is_empty() {
                    attrs.push("info", open.info.as_str());
                }
                emit.start(ElementKind::FencedCodeBlock, &attrs)?;
                self.stack.push(Container::FencedCode {
                    marker: open.marker,
                    len: open.len,
                    indent: open.indent,
                });
                return Ok(());
            }
            if let Some(consumed) = block::blockquote_prefix(&text) {
                emit.start_empty(ElementKind::Blockquote)?;
                self.stack.push(Container::Blockquote);
                text = text[consumed..].to_string();
                continue;
            }
            if let Some(marker) = block::list_marker(&text) {
                let joins_open_list = matches!(
                    self.stack.last(),
                    Some(Container::List { ordered, marker: m })
                        if *ordered == marker.ordered && *m == marker.marker
                );
                if !joins_open_list {
                    let kind = if marker.ordered {
                        ElementKind::OrderedList
                    } else {
                        ElementKind::UnorderedList
                    };
                    let mut attrs = Attributes::new();
                    if marker.ordered
                        && let Some(start) = marker.start
                        && start != 1
                    {
                        attrs.push("start", start.to_string());
                    }
                    emit.start(kind, &attrs)?;
                    self.stack.push(Container::List {
                        ordered: marker.ordered,
                        marker: marker.marker,
                    });
                }
                emit.start_empty(ElementKind::ListItem)?;
                self.stack.push(Container::ListItem {
                    content_indent: marker.content_indent,
                });
                text = text[marker.content_offset..].to_string();
                continue;
            }
            if block::has_indent(&text, 4) {
                emit.start_empty(ElementKind::IndentedCodeBlock)?;
                self.stack.push(Container::IndentedCode { pending_blanks: 0 });
                let mut content = block::strip_columns(&text, 4);
                content.push('\n');
                return emit.characters(&content);
            }
            if let Some(kind) = block::html_block_start(&text) {
                emit.start_empty(ElementKind::RawHtmlBlock)?;
                emit.characters(&format!("{text}\n"))?;
                if kind == HtmlBlockKind::Comment && block::html_comment_end(&text) {
                    return emit.end(ElementKind::RawHtmlBlock);
                }
                self.stack.push(Container::HtmlBlock { kind });
                return Ok(());
            }
            // Reference definitions occupy the paragraph position but never
            // become visible blocks; the pre-pass has already recorded them.
            if reference::scan_definition(&mut Scanner::new(&text), text.len()).is_some() {
                return Ok(());
            }

            let mut buffer = ParagraphBuffer::default();
            buffer.push_line(&text, false);
            self.stack.push(Container::Paragraph(buffer));
            return Ok(());
        }
    }

    fn close_paragraph_as_heading(&mut self, level: u8, emit: &mut Emitter) -> Result<(), Aborted> {
        let Some(Container::Paragraph(buffer)) = self.stack.pop() else {
            return Ok(());
        };
        let text = buffer.into_text();
        let mut attrs = Attributes::new();
        attrs.push("level", level.to_string());
        emit.start(ElementKind::Heading, &attrs)?;
        self.inline().emit_block_text(text.trim(), emit)?;
        emit.end(ElementKind::Heading)
    }

    fn flush_paragraph(&self, buffer: ParagraphBuffer, emit: &mut Emitter) -> Result<(), Aborted> {
        let text = buffer.into_text();
        emit.start_empty(ElementKind::Paragraph)?;
        self.inline().emit_block_text(&text, emit)?;
        emit.end(ElementKind::Paragraph)
    }

    fn inline(&self) -> InlineScanner<'_> {
        InlineScanner::new(self.options, self.refs)
    }

    fn close_top(&mut self, emit: &mut Emitter) -> Result<(), Aborted> {
        let Some(entry) = self.stack.pop() else {
            return Ok(());
        };
        match entry {
            Container::Paragraph(buffer) => self.flush_paragraph(buffer, emit),
            Container::Blockquote => emit.end(ElementKind::Blockquote),
            Container::List { ordered, .. } => emit.end(if ordered {
                ElementKind::OrderedList
            } else {
                ElementKind::UnorderedList
            }),
            Container::ListItem { .. } => emit.end(ElementKind::ListItem),
            Container::FencedCode { .. } => emit.end(ElementKind::FencedCodeBlock),
            Container::IndentedCode { .. } => emit.end(ElementKind::IndentedCodeBlock),
            Container::HtmlBlock { .. } => emit.end(ElementKind::RawHtmlBlock),
        }
    }

    /// Closes open blocks, innermost first, until `depth` entries remain.
    fn close_to(&mut self, depth: usize, emit: &mut Emitter) -> Result<(), Aborted> {
        while self.stack.len() > depth {
            self.close_top(emit)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{MarkdownParser, collect_references};
    use crate::line_index::LineIndex;

    #[test]
    fn prepass_collects_definitions_with_first_wins() {
        let source = "[a]: /one\n[A]: /two\n\n[b]: /three 'title'\n";
        let index = LineIndex::new(source);
        let refs = collect_references(source, &index);

        assert_eq!(refs.len(), 2);
        assert_eq!(refs.resolve("a").map(|e| e.url.as_str()), Some("/one"));
        assert_eq!(
            refs.resolve("B").and_then(|e| e.title.as_deref()),
            Some("title")
        );
    }

    #[test]
    fn prepass_skips_fenced_code_and_paragraph_interiors() {
        let source = "```\n[f]: /fenced\n```\ntext\n[p]: /inside\n\n[ok]: /real\n";
        let index = LineIndex::new(source);
        let refs = collect_references(source, &index);

        assert!(refs.resolve("f").is_none());
        assert!(refs.resolve("p").is_none());
        assert_eq!(refs.resolve("ok").map(|e| e.url.as_str()), Some("/real"));
    }

    #[test]
    fn prepass_sees_definitions_inside_blockquotes_and_list_items() {
        let source = "> [q]: /quoted\n\n- [l]: /listed\n";
        let index = LineIndex::new(source);
        let refs = collect_references(source, &index);

        assert_eq!(refs.resolve("q").map(|e| e.url.as_str()), Some("/quoted"));
        assert_eq!(refs.resolve("l").map(|e| e.url.as_str()), Some("/listed"));
    }

    #[test]
    fn parser_accessors_round_trip() {
        let parser = MarkdownParser::new("# hi");
        assert_eq!(parser.source(), "# hi");
        assert!(parser.options().detect_urls);
    }
}
