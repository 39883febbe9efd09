//! Content models shared by the parser and the serializer.
//!
//! Both sides must agree on where raw text starts and where SVG or MathML
//! markup begins, otherwise serialized text can be read back as tags.

use crate::Document;
use crate::ElementData;
use crate::NodeId;

/// How the body of an HTML element is tokenized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextModel {
    Markup,
    /// Text up to the matching end tag, character references left alone.
    RawText,
    /// Text up to the matching end tag, character references decoded.
    EscapableRawText,
    /// Text up to the end of input.
    PlainText,
}

pub fn text_model(tag: &str) -> TextModel {
    match tag {
        "script" | "style" | "xmp" | "iframe" | "noembed" | "noframes" | "noscript" => {
            TextModel::RawText
        }
        "textarea" | "title" => TextModel::EscapableRawText,
        "plaintext" => TextModel::PlainText,
        _ => TextModel::Markup,
    }
}

pub fn is_void(tag: &str) -> bool {
    matches!(
        tag,
        "area"
            | "base"
            | "basefont"
            | "bgsound"
            | "br"
            | "col"
            | "embed"
            | "frame"
            | "hr"
            | "img"
            | "input"
            | "keygen"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

/// Start tags that close every open SVG/MathML element and continue as HTML.
pub fn breaks_out_of_foreign(tag: &str, attrs: &[(String, String)]) -> bool {
    match tag {
        "font" => attrs
            .iter()
            .any(|(name, _)| matches!(name.as_str(), "color" | "face" | "size")),
        "b" | "big" | "blockquote" | "body" | "br" | "center" | "code" | "dd" | "div" | "dl"
        | "dt" | "em" | "embed" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "head" | "hr" | "i"
        | "img" | "li" | "listing" | "menu" | "meta" | "nobr" | "ol" | "p" | "pre" | "ruby"
        | "s" | "small" | "span" | "strong" | "strike" | "sub" | "sup" | "table" | "tt" | "u"
        | "ul" | "var" => true,
        _ => false,
    }
}

/// Whether the children of `element` are foreign (SVG/MathML) content, given
/// whether `element` itself sits in foreign content.
pub fn children_are_foreign(inherited: bool, element: &ElementData) -> bool {
    match element.tag.as_str() {
        "svg" | "math" | "mglyph" | "malignmark" => true,
        _ if inherited && is_html_integration_point(element) => false,
        _ => inherited,
    }
}

fn is_html_integration_point(element: &ElementData) -> bool {
    match element.tag.as_str() {
        "foreignobject" | "desc" | "title" | "mi" | "mo" | "mn" | "ms" | "mtext" => true,
        "annotation-xml" => element.attr("encoding").is_some_and(|encoding| {
            encoding.eq_ignore_ascii_case("text/html")
                || encoding.eq_ignore_ascii_case("application/xhtml+xml")
        }),
        _ => false,
    }
}

impl Document {
    /// True when children of `id` are parsed as SVG or MathML markup.
    pub fn is_foreign_context(&self, id: NodeId) -> bool {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current {
            chain.push(node);
            current = self.parent(node);
        }

        chain
            .into_iter()
            .rev()
            .filter_map(|node| self.element(node))
            .fold(false, children_are_foreign)
    }
}
