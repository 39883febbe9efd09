//! HTML tokenization and tree building.
//!
//! A tolerant, non-validating parser: it never fails and lower-cases tag and
//! attribute names. Where the body of an element ends follows browser
//! tokenizer rules (raw text, RCDATA, `plaintext`, SVG/MathML markup,
//! comments closed by `-->`, `--!>` or an abrupt `>`), so the tree matches
//! what a browser would execute. An end tag closes the nearest open element
//! of that name and is dropped otherwise.

mod entities;

use entities::decode_entities;
use hp_dom::Document;
use hp_dom::ElementData;
use hp_dom::NodeId;
use hp_dom::NodeKind;
use hp_dom::TextModel;
use hp_dom::breaks_out_of_foreign;
use hp_dom::is_void;
use hp_dom::text_model;

/// Parses raw HTML into a DOM document.
#[derive(Debug, Default)]
pub struct HtmlParser;

impl HtmlParser {
    pub fn parse(&self, input: &str) -> Document {
        TreeBuilder::new(input).run()
    }
}

struct TreeBuilder<'a> {
    src: &'a str,
    pos: usize,
    doc: Document,
    /// Open elements, innermost last. The document node is implied.
    open: Vec<NodeId>,
}

impl<'a> TreeBuilder<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            doc: Document::empty(),
            open: Vec::new(),
        }
    }

    fn run(mut self) -> Document {
        while self.pos < self.src.len() {
            if self.byte(self.pos) == Some(b'<') {
                self.markup();
            } else {
                self.text_run();
            }
        }
        self.doc
    }

    fn byte(&self, at: usize) -> Option<u8> {
        self.src.as_bytes().get(at).copied()
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn current(&self) -> NodeId {
        self.open.last().copied().unwrap_or(Document::ROOT)
    }

    fn in_foreign(&self) -> bool {
        self.doc.is_foreign_context(self.current())
    }

    fn text_run(&mut self) {
        let end = self
            .rest()
            .find('<')
            .map_or(self.src.len(), |offset| self.pos + offset);
        let text = decode_entities(&self.src[self.pos..end]);
        self.push_text(&text);
        self.pos = end;
    }

    fn markup(&mut self) {
        match self.byte(self.pos + 1) {
            Some(b'!') => self.declaration(),
            Some(b'?') => self.bogus_comment(self.pos + 1),
            Some(b'/') => self.end_tag(),
            Some(byte) if byte.is_ascii_alphabetic() => self.start_tag(),
            _ => {
                self.push_text("<");
                self.pos += 1;
            }
        }
    }

    /// Appends to the current element, merging with a preceding text node.
    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let parent = self.current();
        let last = self.doc.children(parent).last().copied();
        if let Some(existing) = last.and_then(|id| self.doc.text_mut(id)) {
            existing.push_str(text);
            return;
        }
        self.doc.append_child(parent, NodeKind::Text(text.to_owned()));
    }

    fn append(&mut self, kind: NodeKind) -> NodeId {
        let parent = self.current();
        self.doc.append_child(parent, kind)
    }

    fn declaration(&mut self) {
        let body = &self.rest()[2..];
        if body.starts_with("--") {
            self.comment(self.pos + 4);
        } else if body
            .get(..7)
            .is_some_and(|keyword| keyword.eq_ignore_ascii_case("doctype"))
        {
            let start = self.pos + 9;
            let (end, resume) = until(self.src, start, ">");
            let name = self.src[start..end].trim().to_owned();
            self.append(NodeKind::Doctype(name));
            self.pos = resume;
        } else if body.starts_with("[CDATA[") && self.in_foreign() {
            let start = self.pos + 9;
            let (end, resume) = until(self.src, start, "]]>");
            let text = self.src[start..end].to_owned();
            self.push_text(&text);
            self.pos = resume;
        } else {
            self.bogus_comment(self.pos + 2);
        }
    }

    fn comment(&mut self, start: usize) {
        let body = &self.src[start..];
        let abrupt = [">", "->"].into_iter().find(|opener| body.starts_with(opener));
        if let Some(opener) = abrupt {
            self.append(NodeKind::Comment(String::new()));
            self.pos = start + opener.len();
            return;
        }

        let close = ["-->", "--!>"]
            .into_iter()
            .filter_map(|closer| body.find(closer).map(|at| (at, closer.len())))
            .min();
        let (end, resume) = match close {
            Some((at, len)) => (start + at, start + at + len),
            None => (self.src.len(), self.src.len()),
        };
        let text = self.src[start..end].to_owned();
        self.append(NodeKind::Comment(text));
        self.pos = resume;
    }

    /// `<?...>`, `<!...>` and `</` followed by a non-letter become a comment
    /// running to the next `>`.
    fn bogus_comment(&mut self, start: usize) {
        let (end, resume) = until(self.src, start, ">");
        let text = self.src[start..end].to_owned();
        self.append(NodeKind::Comment(text));
        self.pos = resume;
    }

    fn end_tag(&mut self) {
        let name_start = self.pos + 2;
        match self.byte(name_start) {
            Some(b'>') => self.pos = name_start + 1,
            Some(byte) if byte.is_ascii_alphabetic() => match scan_tag(self.src, name_start) {
                Some(tag) => {
                    self.close(&tag.name);
                    self.pos = tag.end;
                }
                None => self.pos = self.src.len(),
            },
            Some(_) => self.bogus_comment(name_start),
            None => {
                self.push_text("</");
                self.pos = self.src.len();
            }
        }
    }

    fn close(&mut self, name: &str) {
        if let Some(depth) = self
            .open
            .iter()
            .rposition(|id| self.doc.is_element(*id, name))
        {
            self.open.truncate(depth);
        }
    }

    fn start_tag(&mut self) {
        // A tag cut off by the end of input is dropped.
        let Some(tag) = scan_tag(self.src, self.pos + 1) else {
            self.pos = self.src.len();
            return;
        };
        self.pos = tag.end;

        if self.in_foreign() && breaks_out_of_foreign(&tag.name, &tag.attrs) {
            while self.in_foreign() {
                if self.open.pop().is_none() {
                    break;
                }
            }
        }

        let foreign = self.in_foreign();
        let leaf = if foreign || matches!(tag.name.as_str(), "svg" | "math") {
            tag.self_closing
        } else {
            is_void(&tag.name)
        };
        let model = text_model(&tag.name);
        let name = tag.name.clone();
        let id = self.append(NodeKind::Element(ElementData {
            tag: tag.name,
            attrs: tag.attrs,
        }));
        if leaf {
            return;
        }
        self.open.push(id);
        if foreign {
            return;
        }

        match model {
            TextModel::Markup => {}
            TextModel::RawText => self.raw_text(&name, false),
            TextModel::EscapableRawText => self.raw_text(&name, true),
            TextModel::PlainText => {
                let text = self.rest();
                self.push_text(text);
                self.pos = self.src.len();
            }
        }
    }

    /// Consumes the body of a raw text element and closes it.
    fn raw_text(&mut self, name: &str, decode: bool) {
        let body = self.rest();
        let (end, resume) = find_end_tag(body, name).unwrap_or((body.len(), body.len()));
        let text = &body[..end];
        if decode {
            self.push_text(&decode_entities(text));
        } else {
            self.push_text(text);
        }
        self.pos += resume;
        self.open.pop();
    }
}

/// Returns where `needle` starts at or after `from` and where scanning
/// resumes after it; both are the end of input when it is missing.
fn until(src: &str, from: usize, needle: &str) -> (usize, usize) {
    match src.get(from..).and_then(|rest| rest.find(needle)) {
        Some(offset) => (from + offset, from + offset + needle.len()),
        None => (src.len(), src.len()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TagScan {
    name: String,
    attrs: Vec<(String, String)>,
    self_closing: bool,
    /// Byte offset just past the closing `>`.
    end: usize,
}

/// Scans a tag from its name to the closing `>`, honouring quoted attribute
/// values. `None` when the input ends inside the tag.
fn scan_tag(src: &str, name_start: usize) -> Option<TagScan> {
    let bytes = src.as_bytes();
    let mut idx = name_start;
    while bytes
        .get(idx)
        .is_some_and(|byte| !ends_tag_name(*byte))
    {
        idx += 1;
    }
    let mut tag = TagScan {
        name: src[name_start..idx].to_ascii_lowercase(),
        attrs: Vec::new(),
        self_closing: false,
        end: 0,
    };

    loop {
        idx = skip_whitespace(bytes, idx);
        match bytes.get(idx).copied()? {
            b'>' => {
                tag.end = idx + 1;
                return Some(tag);
            }
            b'/' => {
                idx += 1;
                if bytes.get(idx).copied() == Some(b'>') {
                    tag.self_closing = true;
                    tag.end = idx + 1;
                    return Some(tag);
                }
            }
            _ => {
                // The first character of a name may be `=`.
                let attr_start = idx;
                idx += 1;
                while bytes
                    .get(idx)
                    .is_some_and(|byte| !ends_tag_name(*byte) && *byte != b'=')
                {
                    idx += 1;
                }
                let attr_name = src[attr_start..idx].to_ascii_lowercase();
                idx = skip_whitespace(bytes, idx);

                let mut value = String::new();
                if bytes.get(idx).copied() == Some(b'=') {
                    idx = skip_whitespace(bytes, idx + 1);
                    match bytes.get(idx).copied()? {
                        quote @ (b'"' | b'\'') => {
                            let value_start = idx + 1;
                            let offset = bytes[value_start..]
                                .iter()
                                .position(|byte| *byte == quote)?;
                            value = decode_entities(&src[value_start..value_start + offset]);
                            idx = value_start + offset + 1;
                        }
                        b'>' => {}
                        _ => {
                            let value_start = idx;
                            while bytes
                                .get(idx)
                                .is_some_and(|byte| !byte.is_ascii_whitespace() && *byte != b'>')
                            {
                                idx += 1;
                            }
                            bytes.get(idx)?;
                            value = decode_entities(&src[value_start..idx]);
                        }
                    }
                }

                if !tag.attrs.iter().any(|(existing, _)| *existing == attr_name) {
                    tag.attrs.push((attr_name, value));
                }
            }
        }
    }
}

/// Finds `</name` followed by whitespace, `/` or `>`, returning where it
/// starts and where the whole end tag ends. An end tag cut off by the end of
/// input still ends the text.
fn find_end_tag(haystack: &str, name: &str) -> Option<(usize, usize)> {
    let bytes = haystack.as_bytes();
    let mut from = 0;
    while let Some(offset) = haystack[from..].find("</") {
        let at = from + offset;
        let name_start = at + 2;
        let name_end = name_start + name.len();
        let same_name = haystack
            .get(name_start..name_end)
            .is_some_and(|candidate| candidate.eq_ignore_ascii_case(name));
        if same_name && bytes.get(name_end).is_some_and(|byte| ends_tag_name(*byte)) {
            let end = scan_tag(haystack, name_start).map_or(haystack.len(), |tag| tag.end);
            return Some((at, end));
        }
        from = name_start;
    }
    None
}

fn ends_tag_name(byte: u8) -> bool {
    byte.is_ascii_whitespace() || matches!(byte, b'/' | b'>')
}

fn skip_whitespace(bytes: &[u8], mut idx: usize) -> usize {
    while bytes.get(idx).is_some_and(u8::is_ascii_whitespace) {
        idx += 1;
    }
    idx
}
