//! `${name}` placeholder substitution in the viewer's own page template.
//!
//! Previewed documents are never substituted. In a template, every attribute
//! value is substituted. Text is substituted
//! only below elements with class `js-set-text`, skipping any subtree marked
//! `js-keep-text`.

use crate::context::RewriteContext;
use hp_core::PreviewResult;
use hp_dom::Document;
use hp_dom::NodeId;
use log::debug;
use std::collections::BTreeMap;

const SET_TEXT_CLASS: &str = "js-set-text";
const KEEP_TEXT_CLASS: &str = "js-keep-text";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceholderValues {
    values: BTreeMap<String, String>,
}

impl PlaceholderValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values describing the previewed document. `originalUrl` is the page
    /// the viewer was opened from, defaulting to the document's browse URL;
    /// `source` is where its raw content lives.
    pub fn from_context(context: &RewriteContext) -> PreviewResult<Self> {
        let original_url = match &context.original_url {
            Some(url) => url.clone(),
            None => context.browse_url()?,
        };
        Ok(Self::new()
            .with("host", &context.host)
            .with("repo", &context.repo)
            .with("branch", &context.branch)
            .with("file", &context.file)
            .with("source", context.raw_url()?)
            .with("originalUrl", original_url))
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Substitutes every known `${name}` in `input`. Unknown names stay as
    /// written and inserted values are not scanned again. Returns the new
    /// string and the number of substitutions, or `None` when nothing changed.
    pub fn substitute(&self, input: &str) -> Option<(String, usize)> {
        let mut out = String::with_capacity(input.len());
        let mut replaced = 0;
        let mut cursor = 0;

        while let Some(open) = input[cursor..].find("${").map(|offset| cursor + offset) {
            let Some(close) = input[open + 2..].find('}').map(|offset| open + 2 + offset) else {
                break;
            };

            out.push_str(&input[cursor..open]);
            match self.get(&input[open + 2..close]) {
                Some(value) => {
                    out.push_str(value);
                    replaced += 1;
                }
                None => out.push_str(&input[open..=close]),
            }
            cursor = close + 1;
        }

        if replaced == 0 {
            return None;
        }
        out.push_str(&input[cursor..]);
        Some((out, replaced))
    }
}

/// Applies `values` to the document in place and returns the number of
/// placeholders replaced.
pub fn substitute_placeholders(doc: &mut Document, values: &PlaceholderValues) -> usize {
    let mut replaced = 0;

    for node in doc.descendants(doc.root()) {
        let Some(element) = doc.element_mut(node) else {
            continue;
        };
        for (name, value) in &mut element.attrs {
            if let Some((substituted, count)) = values.substitute(value) {
                debug!("placeholder in <{} {name}>: {value} -> {substituted}", element.tag);
                *value = substituted;
                replaced += count;
            }
        }
    }

    let mut text_nodes = Vec::new();
    for node in doc.descendants(doc.root()) {
        if doc.element(node).is_some_and(|el| el.has_class(SET_TEXT_CLASS)) {
            collect_settable_text(doc, node, &mut text_nodes);
        }
    }

    for node in text_nodes {
        let Some(text) = doc.text_mut(node) else {
            continue;
        };
        if let Some((substituted, count)) = values.substitute(text) {
            *text = substituted;
            replaced += count;
        }
    }

    replaced
}

fn collect_settable_text(doc: &Document, parent: NodeId, out: &mut Vec<NodeId>) {
    for child in doc.children(parent) {
        match doc.element(*child) {
            // Nested `js-set-text` elements are collected on their own.
            Some(el) if el.has_class(KEEP_TEXT_CLASS) || el.has_class(SET_TEXT_CLASS) => {}
            Some(_) => collect_settable_text(doc, *child, out),
            None if doc.text(*child).is_some() => out.push(*child),
            None => {}
        }
    }
}
