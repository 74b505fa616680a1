//! HTML to visible text.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html};

static HTML_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<(?:!doctype|html|head|body|div|p|a|span|br|table|ul|li|h[1-6]|section)\b")
        .expect("valid regex")
});

const SKIPPED: &[&str] = &["script", "style", "noscript", "template", "svg", "iframe"];

const BLOCKS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "footer",
    "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav", "ol", "p",
    "section", "table", "td", "th", "tr", "ul",
];

/// Whether the input looks like markup rather than plain text.
#[must_use]
pub fn looks_like_html(raw: &str) -> bool {
    HTML_TAG.is_match(raw)
}

/// Whether an element name starts a new line when rendered.
pub(crate) fn is_block(name: &str) -> bool {
    BLOCKS.contains(&name)
}

fn walk(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if SKIPPED.contains(&name) {
        return;
    }
    let block = is_block(name);
    if block {
        out.push('\n');
    }
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child) = ElementRef::wrap(child) {
            walk(child, out);
        }
    }
    if block {
        out.push('\n');
    }
}

/// Collapse runs of whitespace within lines and drop empty lines.
#[must_use]
pub fn collapse_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Rendered text of one element, scripts and styles removed.
#[must_use]
pub fn element_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    walk(element, &mut out);
    collapse_whitespace(&out)
}

/// Visible text of an HTML document with block elements on their own lines.
#[must_use]
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    element_text(document.root_element())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visible_text_skips_scripts() {
        let html = r"<html><head><style>.x{}</style><script>var a = 1;</script></head>
            <body><h1>Kontakt</h1><p>Thomas   Weber<br>Vertrieb</p><noscript>JS</noscript></body></html>";
        assert_eq!(visible_text(html), "Kontakt\nThomas Weber\nVertrieb");
    }

    #[test]
    fn test_inline_elements_stay_on_one_line() {
        let html = "<p>Tel: <span>0211</span> <b>123456</b></p>";
        assert_eq!(visible_text(html), "Tel: 0211 123456");
    }

    #[test]
    fn test_looks_like_html() {
        assert!(looks_like_html("<DIV>hallo</DIV>"));
        assert!(!looks_like_html("Vertriebsleiter Thomas Weber, Tel: 0211 / 12 34 56"));
        assert!(!looks_like_html("a < b and c > d"));
    }
}
