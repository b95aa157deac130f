//! Visible-text extraction shared by every strategy.
//!
//! Both the static and the rendered path run the same rule so that the
//! fallback threshold compares like with like: walk the parsed tree, keep
//! text nodes, skip subtrees rooted at non-content elements, collapse
//! whitespace.

use scraper::{ElementRef, Html};

/// Elements whose subtrees never contribute visible text.
const NON_CONTENT_ELEMENTS: &[&str] = &[
    "head", "script", "style", "noscript", "template", "svg", "iframe", "object",
];

/// Extract the visible text of an HTML document.
///
/// Text nodes are joined with single spaces and all runs of whitespace
/// are collapsed, so the result has no leading, trailing or repeated
/// whitespace.
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut words: Vec<&str> = Vec::new();
    collect(document.root_element(), &mut words);
    words.join(" ")
}

fn collect<'a>(element: ElementRef<'a>, words: &mut Vec<&'a str>) {
    if NON_CONTENT_ELEMENTS.contains(&element.value().name()) {
        return;
    }

    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            collect(child_element, words);
        } else if let Some(text) = child.value().as_text() {
            words.extend(text.split_whitespace());
        }
    }
}

/// Number of characters (not bytes) in extracted text.
pub fn char_count(text: &str) -> usize {
    text.chars().count()
}
