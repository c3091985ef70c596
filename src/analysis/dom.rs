//! HTML helpers shared by the analyzers.

use crate::error::AnalyzerError;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Elements whose text is never rendered.
const HIDDEN_CONTAINERS: &[&str] = &["script", "style", "noscript", "template", "head", "title"];

/// Elements that start a new block of text.
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "li", "dt", "dd", "td", "th", "h1", "h2", "h3", "h4", "h5", "h6", "section",
    "article", "header", "footer", "nav", "main", "aside", "blockquote", "figcaption", "pre",
    "button", "label", "caption", "body",
];

/// Parse a CSS selector that is known to be valid.
pub fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

/// Parse a document, rejecting pages with nothing to analyze.
pub fn parse(html: &str) -> Result<Html, AnalyzerError> {
    if html.trim().is_empty() {
        return Err(AnalyzerError::EmptyDocument);
    }

    let document = Html::parse_document(html);
    let has_elements = document.select(&selector("body *")).next().is_some();
    if !has_elements && visible_text(&document).trim().is_empty() {
        return Err(AnalyzerError::EmptyDocument);
    }

    Ok(document)
}

/// All rendered text of the document joined by single spaces.
pub fn visible_text(document: &Html) -> String {
    text_blocks(document).join(" ")
}

/// Rendered text grouped by nearest block-level ancestor, in document order.
pub fn text_blocks(document: &Html) -> Vec<String> {
    let mut keys = Vec::new();
    let mut blocks: Vec<String> = Vec::new();

    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| HIDDEN_CONTAINERS.contains(&el.name()))
        });
        if hidden {
            continue;
        }

        let fragment = text.trim();
        if fragment.is_empty() {
            continue;
        }

        let block = node
            .ancestors()
            .find(|a| {
                a.value()
                    .as_element()
                    .is_some_and(|el| BLOCK_ELEMENTS.contains(&el.name()))
            })
            .map(|a| a.id());

        match blocks.last_mut() {
            Some(buffer) if keys.last() == Some(&block) => {
                buffer.push(' ');
                buffer.push_str(fragment);
            }
            _ => {
                keys.push(block);
                blocks.push(fragment.to_string());
            }
        }
    }

    blocks
}

/// Words of a text: whitespace tokens containing at least one letter.
pub fn words(text: &str) -> Vec<&str> {
    text.split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|token| token.chars().any(char::is_alphabetic))
        .collect()
}

/// All CSS declared on the page: `<style>` blocks plus inline `style` attributes.
pub fn stylesheet_text(document: &Html) -> String {
    let mut css = String::new();
    for style in document.select(&selector("style")) {
        css.push_str(&style.text().collect::<String>());
        css.push('\n');
    }
    for el in document.select(&selector("[style]")) {
        if let Some(inline) = el.value().attr("style") {
            css.push_str("inline {");
            css.push_str(inline);
            css.push_str("}\n");
        }
    }
    css
}

/// Values of every `property: value` declaration in `css`, lowercased and trimmed.
pub fn declared_values(css: &str, property: &str) -> Vec<String> {
    static DECLARATION_PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = DECLARATION_PATTERN.get_or_init(|| {
        Regex::new(r"(?:^|[;{\s])([\w-]+)\s*:\s*([^;{}\n]+)").expect("valid regex")
    });

    re.captures_iter(css)
        .filter(|caps| caps[1].eq_ignore_ascii_case(property))
        .map(|caps| caps[2].trim().trim_end_matches("!important").trim().to_lowercase())
        .collect()
}

/// Distinct values of a declaration.
pub fn distinct_values(css: &str, property: &str) -> BTreeSet<String> {
    declared_values(css, property).into_iter().collect()
}

/// Whether the element can receive keyboard focus without extra attributes.
pub fn is_natively_focusable(el: &ElementRef<'_>) -> bool {
    let value = el.value();
    match value.name() {
        "a" | "area" => value.attr("href").is_some(),
        "button" | "select" | "textarea" | "summary" | "iframe" => {
            value.attr("disabled").is_none()
        }
        "input" => value.attr("type") != Some("hidden") && value.attr("disabled").is_none(),
        _ => false,
    }
}

/// Parsed `tabindex`, if present and numeric.
pub fn tabindex(el: &ElementRef<'_>) -> Option<i32> {
    el.value().attr("tabindex")?.trim().parse().ok()
}

/// Whether any ancestor of the element has the given tag name.
pub fn has_ancestor(el: &ElementRef<'_>, name: &str) -> bool {
    el.ancestors()
        .filter_map(|a| a.value().as_element())
        .any(|a| a.name() == name)
}
