use std::env;
use std::fs;
use std::io::{self, Read};
use std::process;

use saxmark_core::{Attributes, ElementKind, Flow, MarkdownParser, Observer, ParserOptions};

/// Prints the event stream as an indented trace, one event per line.
struct EventPrinter {
    depth: usize,
}

impl EventPrinter {
    fn new() -> Self {
        Self { depth: 0 }
    }

    fn indent(&self) -> String {
        "  ".repeat(self.depth)
    }
}

impl Observer for EventPrinter {
    fn document_start(&mut self) -> Flow {
        println!("<document>");
        self.depth = 1;
        Flow::Continue
    }

    fn document_end(&mut self) -> Flow {
        println!("</document>");
        Flow::Continue
    }

    fn found_characters(&mut self, text: &str) -> Flow {
        println!("{}{:?}", self.indent(), text);
        Flow::Continue
    }

    fn start_element(&mut self, kind: ElementKind, attributes: &Attributes) -> Flow {
        let mut line = format!("{}<{}", self.indent(), kind.name());
        for (name, value) in attributes.iter() {
            line.push_str(&format!(" {name}={value:?}"));
        }
        line.push('>');
        println!("{line}");
        self.depth += 1;
        Flow::Continue
    }

    fn end_element(&mut self, kind: ElementKind) -> Flow {
        self.depth = self.depth.saturating_sub(1);
        println!("{}</{}>", self.indent(), kind.name());
        Flow::Continue
    }
}

fn main() {
    let mut input: Option<String> = None;
    let mut options = ParserOptions::default();

    for arg in env::args().skip(1) {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                return;
            }
            "--gfm-breaks" => options.github_line_breaks = true,
            "--underline" => options.underscore_is_underline = true,
            "--no-detect-urls" => options.detect_urls = false,
            _ => {
                if input.is_none() {
                    input = Some(arg);
                } else {
                    eprintln!("unexpected argument: {arg}");
                    print_usage();
                    process::exit(2);
                }
            }
        }
    }

    let source = match input {
        Some(path) => fs::read_to_string(&path).unwrap_or_else(|err| {
            eprintln!("failed to read {path}: {err}");
            process::exit(1);
        }),
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .unwrap_or_else(|err| {
                    eprintln!("failed to read stdin: {err}");
                    process::exit(1);
                });
            buffer
        }
    };

    let parser = MarkdownParser::with_options(source, options);
    let mut printer = EventPrinter::new();
    parser.parse(&mut printer);
}

fn print_usage() {
    eprintln!("usage: saxmark [options] [file]");
    eprintln!();
    eprintln!("Parses Markdown from a file (or stdin) and prints the event stream.");
    eprintln!();
    eprintln!("options:");
    eprintln!("  --gfm-breaks       single newlines become hard line breaks");
    eprintln!("  --underline        _spans_ become underline instead of emphasis");
    eprintln!("  --no-detect-urls   leave bare URLs as plain text");
    eprintln!("  -h, --help         show this help");
}
