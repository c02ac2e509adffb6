//! HTML → markdown-ish text for one documentation page.

use scraper::{ElementRef, Html, Selector};

/// Roots tried in order; the first match holds the page's main content.
const CONTENT_ROOTS: &[&str] = &["main", "article", "[role=main]", "body"];

/// Subtrees that never contain documentation text.
const SKIPPED: &[&str] = &[
    "script", "style", "template", "noscript", "svg", "nav", "header", "footer", "form",
    "button", "iframe",
];

/// Elements whose text flows into the surrounding block.
const INLINE: &[&str] = &[
    "a", "abbr", "b", "code", "em", "i", "kbd", "mark", "small", "span", "strong", "sub", "sup",
    "u", "time",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub title: String,
    /// `# {title}` followed by the rendered content blocks. Empty when the page had no text.
    pub text: String,
}

pub fn extract(html: &str) -> ExtractedPage {
    let document = Html::parse_document(html);

    let title = first_text(&document, "title")
        .or_else(|| first_text(&document, "h1"))
        .unwrap_or_default();

    let Some(root) = content_root(&document) else {
        return ExtractedPage {
            title,
            text: String::new(),
        };
    };

    let mut blocks = BlockCollector::default();
    blocks.walk(root);
    let blocks = blocks.finish();
    if blocks.is_empty() {
        return ExtractedPage {
            title,
            text: String::new(),
        };
    }

    let text = format!("# {title}\n\n{}", blocks.join("\n\n"));
    ExtractedPage { title, text }
}

fn content_root(document: &Html) -> Option<ElementRef<'_>> {
    CONTENT_ROOTS
        .iter()
        .filter_map(|css| Selector::parse(css).ok())
        .find_map(|selector| document.select(&selector).next())
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .find(|t| !t.is_empty())
}

#[derive(Default)]
struct BlockCollector {
    blocks: Vec<String>,
    /// Loose text and inline elements waiting to become a paragraph
    pending: String,
}

impl BlockCollector {
    fn walk(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            if let Some(text) = child.value().as_text() {
                self.pending.push_str(text);
                continue;
            }
            let Some(child) = ElementRef::wrap(child) else {
                continue;
            };

            let tag = child.value().name();
            if SKIPPED.contains(&tag) {
                continue;
            }

            match tag {
                "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                    let level = tag[1..].parse::<usize>().unwrap_or(1);
                    let text = extract_text(&child);
                    self.push_block(|| format!("{} {text}", "#".repeat(level)), &text);
                }
                "li" => {
                    let text = extract_text(&child);
                    self.push_block(|| format!("- {text}"), &text);
                }
                "pre" => {
                    let text = collapse_newlines(&child.text().collect::<String>());
                    self.push_block(|| text.clone(), &text);
                }
                "p" | "blockquote" | "dt" | "dd" | "figcaption" | "caption" => {
                    let text = extract_text(&child);
                    self.push_block(|| text.clone(), &text);
                }
                "tr" => {
                    let cells: Vec<String> = child
                        .children()
                        .filter_map(ElementRef::wrap)
                        .map(|cell| extract_text(&cell))
                        .filter(|t| !t.is_empty())
                        .collect();
                    let row = cells.join(" | ");
                    self.push_block(|| row.clone(), &row);
                }
                "br" => self.pending.push(' '),
                t if INLINE.contains(&t) => {
                    self.pending.extend(child.text());
                }
                _ => {
                    self.flush_pending();
                    self.walk(child);
                    self.flush_pending();
                }
            }
        }
    }

    fn push_block(&mut self, render: impl FnOnce() -> String, text: &str) {
        self.flush_pending();
        if !text.is_empty() {
            self.blocks.push(render());
        }
    }

    fn flush_pending(&mut self) {
        let text = collapse_whitespace(&self.pending);
        self.pending.clear();
        if !text.is_empty() {
            self.blocks.push(text);
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.flush_pending();
        self.blocks
    }
}

fn extract_text(element: &ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

fn collapse_whitespace(input: &str) -> String {
    let mut buf = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_space && !buf.is_empty() {
                buf.push(' ');
            }
            last_space = true;
        } else {
            buf.push(ch);
            last_space = false;
        }
    }
    buf.trim().to_string()
}

fn collapse_newlines(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
