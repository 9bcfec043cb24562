//! Selector-driven text extraction.
//!
//! Every element matched by an include selector contributes its text, minus
//! any subtree matched by an exclude selector. Script and style bodies never
//! contribute.

use scraper::{ElementRef, Html, Selector};

use crate::error::FetchError;

/// Returned when the selectors match nothing with text in it.
pub const NO_CONTENT: &str = "No content found";

const NON_CONTENT_TAGS: &[&str] = &["script", "style", "noscript", "template"];

pub fn parse_selector(selector: &str) -> Result<Selector, FetchError> {
    Selector::parse(selector).map_err(|e| FetchError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

pub fn validate_selector(selector: &str) -> Result<(), FetchError> {
    parse_selector(selector).map(|_| ())
}

/// Extract text from `html`. Selectors are parsed before the document so a
/// syntax error surfaces regardless of page content.
pub fn extract_text(
    html: &str,
    include: &[String],
    exclude: &[String],
) -> Result<String, FetchError> {
    let include = include
        .iter()
        .map(|s| parse_selector(s))
        .collect::<Result<Vec<_>, _>>()?;
    let exclude = exclude
        .iter()
        .map(|s| parse_selector(s))
        .collect::<Result<Vec<_>, _>>()?;

    let document = Html::parse_document(html);
    let mut blocks = Vec::new();

    for selector in &include {
        for element in document.select(selector) {
            if is_excluded(&element, &exclude) {
                continue;
            }
            let text = element_text(&element, &exclude);
            if !text.is_empty() {
                blocks.push(text);
            }
        }
    }

    if blocks.is_empty() {
        Ok(NO_CONTENT.to_string())
    } else {
        Ok(blocks.join("\n"))
    }
}

fn is_excluded(element: &ElementRef<'_>, exclude: &[Selector]) -> bool {
    exclude.iter().any(|ex| ex.matches(element))
}

/// Visible text of `root`, skipping excluded and non-content descendants.
fn element_text(root: &ElementRef<'_>, exclude: &[Selector]) -> String {
    let mut words: Vec<&str> = Vec::new();

    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let hidden = node
            .ancestors()
            .take_while(|ancestor| ancestor.id() != root.id())
            .filter_map(ElementRef::wrap)
            .any(|ancestor| {
                NON_CONTENT_TAGS.contains(&ancestor.value().name())
                    || is_excluded(&ancestor, exclude)
            });
        if hidden {
            continue;
        }

        words.extend(text.split_whitespace());
    }

    words.join(" ")
}
