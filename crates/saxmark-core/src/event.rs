use std::fmt;

/// What an observer callback tells the parser to do next.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Flow {
    Continue,
    Stop,
}

impl Flow {
    pub fn is_stop(self) -> bool {
        matches!(self, Flow::Stop)
    }
}

/// Tags for the structural elements the parser reports.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ElementKind {
    Paragraph,
    Heading,
    UnorderedList,
    OrderedList,
    ListItem,
    Blockquote,
    FencedCodeBlock,
    IndentedCodeBlock,
    HorizontalRule,
    RawHtmlBlock,
    Emphasis,
    Strong,
    Underline,
    CodeSpan,
    Link,
    Image,
    Autolink,
    HardLineBreak,
    SoftLineBreak,
}

impl ElementKind {
    pub fn name(self) -> &'static str {
        match self {
            ElementKind::Paragraph => "paragraph",
            ElementKind::Heading => "heading",
            ElementKind::UnorderedList => "unordered-list",
            ElementKind::OrderedList => "ordered-list",
            ElementKind::ListItem => "list-item",
            ElementKind::Blockquote => "blockquote",
            ElementKind::FencedCodeBlock => "fenced-code-block",
            ElementKind::IndentedCodeBlock => "indented-code-block",
            ElementKind::HorizontalRule => "horizontal-rule",
            ElementKind::RawHtmlBlock => "raw-html-block",
            ElementKind::Emphasis => "emphasis",
            ElementKind::Strong => "strong",
            ElementKind::Underline => "underline",
            ElementKind::CodeSpan => "code-span",
            ElementKind::Link => "link",
            ElementKind::Image => "image",
            ElementKind::Autolink => "autolink",
            ElementKind::HardLineBreak => "hard-line-break",
            ElementKind::SoftLineBreak => "soft-line-break",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Attributes of a reported element, in insertion order.
///
/// The key set is fixed per element kind (`level`, `info`, `href`, `src`,
/// `alt`, `title`, `start`), so keys are static strings.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Attributes {
    items: Vec<(&'static str, String)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, name: &'static str, value: impl Into<String>) {
        self.items.push((name, value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        self.items.iter().map(|(key, value)| (*key, value.as_str()))
    }
}

/// Receiver for the parser's event stream.
///
/// Every method has a no-op default, so an observer implements only the
/// callbacks it cares about. Returning `Flow::Stop` from any callback makes
/// the parser stop emitting immediately; an aborted parse does not balance
/// the start events already delivered.
pub trait Observer {
    fn document_start(&mut self) -> Flow {
        Flow::Continue
    }

    fn document_end(&mut self) -> Flow {
        Flow::Continue
    }

    fn found_characters(&mut self, _text: &str) -> Flow {
        Flow::Continue
    }

    fn start_element(&mut self, _kind: ElementKind, _attributes: &Attributes) -> Flow {
        Flow::Continue
    }

    fn end_element(&mut self, _kind: ElementKind) -> Flow {
        Flow::Continue
    }
}

/// Marker for an observer-requested stop, threaded with `?` through the
/// emitting code paths.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Aborted;

pub(crate) struct Emitter<'o> {
    observer: &'o mut dyn Observer,
}

impl<'o> Emitter<'o> {
    pub(crate) fn new(observer: &'o mut dyn Observer) -> Self {
        Self { observer }
    }

    fn check(flow: Flow) -> Result<(), Aborted> {
        if flow.is_stop() { Err(Aborted) } else { Ok(()) }
    }

    pub(crate) fn document_start(&mut self) -> Result<(), Aborted> {
        Self::check(self.observer.document_start())
    }

    pub(crate) fn document_end(&mut self) -> Result<(), Aborted> {
        Self::check(self.observer.document_end())
    }

    pub(crate) fn characters(&mut self, text: &str) -> Result<(), Aborted> {
        Self::check(self.observer.found_characters(text))
    }

    pub(crate) fn start(
        &mut self,
        kind: ElementKind,
        attributes: &Attributes,
    ) -> Result<(), Aborted> {
        Self::check(self.observer.start_element(kind, attributes))
    }

    pub(crate) fn start_empty(&mut self, kind: ElementKind) -> Result<(), Aborted> {
        self.start(kind, &Attributes::new())
    }

    pub(crate) fn end(&mut self, kind: ElementKind) -> Result<(), Aborted> {
        Self::check(self.observer.end_element(kind))
    }
}
