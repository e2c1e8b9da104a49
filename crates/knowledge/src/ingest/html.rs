//! HTML to plain text conversion for post bodies.

use scraper::{ElementRef, Html, Node};

/// Elements dropped together with their content.
const SKIPPED_ELEMENTS: [&str; 8] = [
    "script", "style", "noscript", "iframe", "header", "footer", "nav", "aside",
];

/// Strip markup from a post body.
///
/// The body is parsed as an HTML fragment, so entities are decoded and a
/// stray `<` in prose stays text. Every element boundary becomes a space,
/// comments and non-content elements are removed and whitespace is
/// collapsed.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut raw = String::with_capacity(html.len());
    collect_text(fragment.root_element(), &mut raw);
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                let Some(child) = ElementRef::wrap(child) else {
                    continue;
                };
                if SKIPPED_ELEMENTS.contains(&child.value().name()) {
                    continue;
                }
                out.push(' ');
                collect_text(child, out);
                out.push(' ');
            }
            _ => {}
        }
    }
}
