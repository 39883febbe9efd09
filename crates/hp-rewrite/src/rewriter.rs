use crate::context::RewriteContext;
use hp_core::PreviewResult;
use hp_dom::Document;
use hp_dom::ElementData;
use hp_dom::NodeId;
use hp_dom::NodeKind;
use hp_url::Url;
use hp_url::parse;
use hp_url::resolve_parsed;
use log::debug;
use log::info;

/// Frame width used when the document does not ask for one.
pub const DEFAULT_VIEWPORT_WIDTH: &str = "816px";

const TOP_LEVEL_TARGET: &str = "_top";

/// What the external renderer needs to know about a removed script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptDescriptor {
    External { url: String },
    Inline { source: String },
}

/// A `<script>` element detached from the document tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantinedScript {
    /// Arena id of the detached element; still addressable in `document`.
    pub node: NodeId,
    pub descriptor: ScriptDescriptor,
}

#[derive(Debug, Clone)]
pub struct RewrittenDocument {
    pub document: Document,
    /// In original document order.
    pub quarantined: Vec<QuarantinedScript>,
    /// `<number><unit>`, e.g. `816px`.
    pub viewport_width: String,
    pub rewritten_links: usize,
    /// Inline `on*` event handler attributes removed.
    pub stripped_handlers: usize,
    /// `javascript:`/`vbscript:` URLs, `srcdoc` documents and script-bearing
    /// refreshes removed.
    pub neutralized_attributes: usize,
}

/// Makes a fetched document safe and correctly linked for embedding.
#[derive(Debug, Default)]
pub struct DocumentRewriter;

impl DocumentRewriter {
    pub fn process(
        &self,
        mut document: Document,
        context: &RewriteContext,
    ) -> PreviewResult<RewrittenDocument> {
        let content_base = parse(&context.content_base()?)?;
        let browse_base = parse(&context.browse_base()?)?;
        let page_base = parse(&context.page_url)?.without_fragment();

        let ActiveContent {
            handlers: stripped_handlers,
            attributes: neutralized_attributes,
        } = neutralize_active_content(&mut document);
        normalize_base_element(&mut document, &content_base);
        let document_base = document_base(&document, &content_base);
        let rewritten_links = rewrite_links(&mut document, &page_base, &browse_base);
        let quarantined = quarantine_scripts(&mut document, &document_base);
        let viewport_width = viewport_width(&document);

        info!(
            "rewrote {}: {rewritten_links} links, {} scripts quarantined, {stripped_handlers} handlers stripped, {neutralized_attributes} attributes neutralized, viewport {viewport_width}",
            context.file,
            quarantined.len()
        );

        Ok(RewrittenDocument {
            document,
            quarantined,
            viewport_width,
            rewritten_links,
            stripped_handlers,
            neutralized_attributes,
        })
    }
}

fn normalize_base_element(doc: &mut Document, content_base: &Url) {
    let Some(base) = doc.find_first("base") else {
        let head = ensure_head(doc);
        let element = ElementData::new("base")
            .with_attr("href", content_base.to_string())
            .with_attr("target", TOP_LEVEL_TARGET);
        doc.insert_child(head, 0, NodeKind::Element(element));
        debug!("synthesized <base href=\"{content_base}\">");
        return;
    };

    let Some(element) = doc.element_mut(base) else {
        return;
    };

    let href = match element.attr("href") {
        None => Some(content_base.to_string()),
        Some(existing) => match parse(existing) {
            Ok(url) if !url.has_host() => Some(resolve_parsed(&url, content_base).to_string()),
            Ok(_) => None,
            Err(error) => {
                debug!("leaving <base href> untouched: {error}");
                None
            }
        },
    };
    if let Some(href) = href {
        element.set_attr("href", href);
    }

    if !element.has_attr("target") {
        element.set_attr("target", TOP_LEVEL_TARGET);
    }
}

/// Base that resources resolve against: the first `<base>` element's href
/// once normalized, else the content base.
fn document_base(doc: &Document, content_base: &Url) -> Url {
    doc.find_first("base")
        .and_then(|base| doc.element(base))
        .and_then(|base| base.attr("href"))
        .and_then(|href| parse(href).ok())
        .map_or_else(
            || content_base.clone(),
            |href| resolve_parsed(&href, content_base),
        )
}

/// Returns the `<head>` element, creating it (and placing it first under
/// `<html>` or after any leading doctype) when missing.
fn ensure_head(doc: &mut Document) -> NodeId {
    if let Some(head) = doc.find_first("head") {
        return head;
    }

    let head = NodeKind::Element(ElementData::new("head"));
    if let Some(html) = doc.find_first("html") {
        return doc.insert_child(html, 0, head);
    }

    let root = doc.root();
    let is_doctype =
        |id: NodeId| matches!(doc.node(id).map(|node| &node.kind), Some(NodeKind::Doctype(_)));
    let position = doc
        .children(root)
        .iter()
        .position(|child| !is_doctype(*child))
        .unwrap_or(doc.children(root).len());
    doc.insert_child(root, position, head)
}

fn rewrite_links(doc: &mut Document, page_base: &Url, browse_base: &Url) -> usize {
    let mut rewritten = 0;

    for link in doc.elements_by_tag("a") {
        let Some(element) = doc.element_mut(link) else {
            continue;
        };
        let Some(href) = element.attr("href") else {
            continue;
        };

        let reference = match parse(href) {
            Ok(reference) => reference,
            Err(error) => {
                debug!("leaving malformed href untouched: {error}");
                continue;
            }
        };

        let target = if reference.is_fragment_only() {
            resolve_parsed(&reference, page_base)
        } else if !reference.has_host() && reference.scheme().is_none() {
            resolve_parsed(&reference, browse_base)
        } else {
            continue;
        };

        element.set_attr("href", target.to_string());
        rewritten += 1;
    }

    rewritten
}

fn quarantine_scripts(doc: &mut Document, document_base: &Url) -> Vec<QuarantinedScript> {
    let scripts = doc.elements_by_tag("script");
    let mut quarantined = Vec::with_capacity(scripts.len());

    for node in scripts {
        let src = doc.element(node).and_then(|element| element.attr("src"));
        let descriptor = match src {
            Some(src) => {
                let url = match parse(src) {
                    Ok(reference) => resolve_parsed(&reference, document_base).to_string(),
                    Err(error) => {
                        debug!("keeping unresolvable script src as-is: {error}");
                        src.to_owned()
                    }
                };
                ScriptDescriptor::External { url }
            }
            None => ScriptDescriptor::Inline {
                source: doc.text_content(node),
            },
        };

        doc.detach(node);
        quarantined.push(QuarantinedScript { node, descriptor });
    }

    quarantined
}

/// Attributes a browser fetches or navigates to.
const URL_ATTRIBUTES: &[&str] = &[
    "action",
    "background",
    "codebase",
    "data",
    "formaction",
    "href",
    "poster",
    "src",
    "xlink:href",
];

/// SVG animation values that can write into an `href`.
const ANIMATION_VALUES: &[&str] = &["by", "from", "to", "values"];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ActiveContent {
    handlers: usize,
    attributes: usize,
}

fn neutralize_active_content(doc: &mut Document) -> ActiveContent {
    let mut removed = ActiveContent::default();
    for node in doc.descendants(doc.root()) {
        let Some(element) = doc.element_mut(node) else {
            continue;
        };

        let before = element.attrs.len();
        element.attrs.retain(|(name, _)| !name.starts_with("on"));
        removed.handlers += before - element.attrs.len();

        let before = element.attrs.len();
        let refresh = is_refresh(element);
        let animates_link = matches!(element.tag.as_str(), "animate" | "set")
            && element
                .attr("attributename")
                .is_some_and(|target| target.trim().to_ascii_lowercase().ends_with("href"));
        element.attrs.retain(|(name, value)| {
            let runs_script = match name.as_str() {
                "srcdoc" => true,
                "content" if refresh => refresh_runs_script(value),
                name if animates_link && ANIMATION_VALUES.contains(&name) => {
                    value.split(';').any(is_script_url)
                }
                name => URL_ATTRIBUTES.contains(&name) && is_script_url(value),
            };
            !runs_script
        });
        let neutralized = before - element.attrs.len();
        if neutralized > 0 {
            debug!("neutralized {neutralized} script-bearing attributes on <{}>", element.tag);
        }
        removed.attributes += neutralized;
    }
    removed
}

fn is_refresh(element: &ElementData) -> bool {
    element.tag == "meta"
        && element
            .attr("http-equiv")
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("refresh"))
}

/// `0; url=javascript:...` with any spacing or quoting.
fn refresh_runs_script(content: &str) -> bool {
    content
        .split_once([';', ','])
        .map(|(_, target)| target.trim_start())
        .map(|target| match target.get(..3) {
            Some(key) if key.eq_ignore_ascii_case("url") => {
                target[3..].trim_start().trim_start_matches('=').trim_start()
            }
            _ => target,
        })
        .is_some_and(|target| is_script_url(target.trim_start_matches(['"', '\''])))
}

/// Whether a browser would run `value` as script when navigating to it.
/// Leading controls and spaces are ignored and tabs or newlines anywhere in
/// the scheme are dropped, as URL parsing does.
fn is_script_url(value: &str) -> bool {
    let cleaned = value
        .trim_start_matches(|ch: char| ch <= ' ')
        .replace(['\t', '\n', '\r'], "");
    cleaned.split_once(':').is_some_and(|(scheme, _)| {
        scheme.eq_ignore_ascii_case("javascript") || scheme.eq_ignore_ascii_case("vbscript")
    })
}

fn viewport_width(doc: &Document) -> String {
    doc.elements_by_tag("meta")
        .into_iter()
        .filter_map(|meta| doc.element(meta))
        .filter(|meta| {
            meta.attr("name")
                .is_some_and(|name| name.trim().eq_ignore_ascii_case("viewport"))
        })
        .find_map(|meta| meta.attr("content").and_then(explicit_viewport_width))
        .unwrap_or_else(|| DEFAULT_VIEWPORT_WIDTH.to_owned())
}

/// Pixel width from a viewport `content` value such as
/// `width=600, initial-scale=1`; `device-width` yields `None`.
fn explicit_viewport_width(content: &str) -> Option<String> {
    content
        .split([',', ';'])
        .filter_map(|entry| entry.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("width"))
        .and_then(|(_, value)| {
            let value = value.trim();
            let number = value
                .strip_suffix("px")
                .map(str::trim_end)
                .unwrap_or(value);
            let width = number.parse::<f64>().ok()?;
            (width.is_finite() && width > 0.0).then(|| format!("{width}px"))
        })
}

#[cfg(test)]
mod tests {
    use super::DEFAULT_VIEWPORT_WIDTH;
    use super::DocumentRewriter;
    use super::RewrittenDocument;
    use super::ScriptDescriptor;
    use super::explicit_viewport_width;
    use crate::context::RewriteContext;
    use hp_dom::Document;
    use hp_html::HtmlParser;

    fn context() -> RewriteContext {
        RewriteContext::new(
            "octo/site",
            "main",
            "docs/index.html",
            "https://preview.example/view?token=abc#old",
        )
    }

    fn process(source: &str) -> RewrittenDocument {
        let document = HtmlParser.parse(source);
        match DocumentRewriter.process(document, &context()) {
            Ok(rewritten) => rewritten,
            Err(error) => panic!("{error}"),
        }
    }

    fn attr_of(doc: &Document, tag: &str, name: &str) -> Option<String> {
        doc.find_first(tag)
            .and_then(|id| doc.element(id))
            .and_then(|element| element.attr(name))
            .map(str::to_owned)
    }

    fn hrefs(doc: &Document) -> Vec<String> {
        doc.elements_by_tag("a")
            .into_iter()
            .filter_map(|id| doc.element(id))
            .filter_map(|element| element.attr("href"))
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn synthesizes_base_when_missing() {
        let out = process("<html><head><title>t</title></head><body></body></html>");
        let doc = &out.document;
        assert_eq!(
            attr_of(doc, "base", "href").as_deref(),
            Some("https://github.com/octo/site/raw/main/docs/")
        );
        assert_eq!(attr_of(doc, "base", "target").as_deref(), Some("_top"));

        let head = doc.find_first("head");
        let first = head.and_then(|head| doc.children(head).first().copied());
        assert_eq!(first, doc.find_first("base"));
    }

    #[test]
    fn creates_head_for_bare_fragments() {
        let out = process("<!DOCTYPE html><p>hello</p>");
        let html = out.document.to_html();
        assert!(html.starts_with(
            "<!DOCTYPE html><head><base href=\"https://github.com/octo/site/raw/main/docs/\""
        ));
    }

    #[test]
    fn resolves_hostless_base_against_content_base() {
        let out = process("<head><base href=\"../assets/\"></head>");
        assert_eq!(
            attr_of(&out.document, "base", "href").as_deref(),
            Some("https://github.com/octo/site/raw/main/assets/")
        );
        assert_eq!(attr_of(&out.document, "base", "target").as_deref(), Some("_top"));
    }

    #[test]
    fn keeps_absolute_base_and_existing_target() {
        let out = process("<head><base href=\"https://cdn.example/x/\" target=\"_self\"></head>");
        assert_eq!(
            attr_of(&out.document, "base", "href").as_deref(),
            Some("https://cdn.example/x/")
        );
        assert_eq!(attr_of(&out.document, "base", "target").as_deref(), Some("_self"));
    }

    #[test]
    fn base_without_href_gets_content_base() {
        let out = process("<head><base target=\"_self\"></head>");
        assert_eq!(
            attr_of(&out.document, "base", "href").as_deref(),
            Some("https://github.com/octo/site/raw/main/docs/")
        );
        assert_eq!(attr_of(&out.document, "base", "target").as_deref(), Some("_self"));
    }

    #[test]
    fn empty_base_href_resolves_to_content_base() {
        let out = process("<head><base href=\"\"></head>");
        assert_eq!(
            attr_of(&out.document, "base", "href").as_deref(),
            Some("https://github.com/octo/site/raw/main/docs/")
        );
    }

    #[test]
    fn only_first_base_is_normalized() {
        let out = process(
            "<head><base href=\"lib/\"><base href=\"https://other.example/\"><base></head>",
        );
        let bases = out
            .document
            .elements_by_tag("base")
            .into_iter()
            .filter_map(|id| out.document.element(id))
            .map(|base| base.attrs.clone())
            .collect::<Vec<_>>();
        fn attrs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
            pairs
                .iter()
                .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
                .collect()
        }
        assert_eq!(
            bases,
            vec![
                attrs(&[
                    ("href", "https://github.com/octo/site/raw/main/docs/lib/"),
                    ("target", "_top"),
                ]),
                attrs(&[("href", "https://other.example/")]),
                attrs(&[]),
            ]
        );
    }

    #[test]
    fn script_src_follows_absolute_base() {
        let out = process(
            "<head><base href=\"https://cdn.example/lib/\"><script src=\"app.js\"></script></head>",
        );
        assert_eq!(
            out.quarantined[0].descriptor,
            ScriptDescriptor::External {
                url: "https://cdn.example/lib/app.js".to_owned()
            }
        );
    }

    #[test]
    fn script_src_follows_relative_base() {
        let out = process(
            "<head><base href=\"../assets/\"></head><body><script src=\"app.js\"></script></body>",
        );
        assert_eq!(
            out.quarantined[0].descriptor,
            ScriptDescriptor::External {
                url: "https://github.com/octo/site/raw/main/assets/app.js".to_owned()
            }
        );
    }

    #[test]
    fn script_src_falls_back_to_content_base_for_malformed_base() {
        let out = process("<base href=\"http://a.com:port/\"><script src=\"app.js\"></script>");
        assert_eq!(
            out.quarantined[0].descriptor,
            ScriptDescriptor::External {
                url: "https://github.com/octo/site/raw/main/docs/app.js".to_owned()
            }
        );
    }

    #[test]
    fn rewrites_links_by_kind() {
        let out = process(
            "<body>\
             <a href=\"#install\">jump</a>\
             <a href=\"guide.html\">guide</a>\
             <a href=\"/LICENSE\">license</a>\
             <a href=\"https://example.org/\">away</a>\
             <a href=\"mailto:me@example.org\">mail</a>\
             <a href=\"about:blank\">blank</a>\
             <a name=\"anchor\">no href</a>\
             </body>",
        );
        assert_eq!(
            hrefs(&out.document),
            vec![
                "https://preview.example/view?token=abc#install",
                "https://github.com/octo/site/blob/main/docs/guide.html",
                "https://github.com/LICENSE",
                "https://example.org/",
                "mailto:me@example.org",
                "about:blank",
            ]
        );
        assert_eq!(out.rewritten_links, 3);
    }

    #[test]
    fn malformed_href_is_left_untouched() {
        let out = process("<a href=\"http://a.com:port/\">bad</a><a href=\"x.html\">ok</a>");
        assert_eq!(
            hrefs(&out.document),
            vec![
                "http://a.com:port/",
                "https://github.com/octo/site/blob/main/docs/x.html",
            ]
        );
    }

    #[test]
    fn quarantines_every_script_in_order() {
        let out = process(
            "<head><script src=\"js/app.js\"></script></head>\
             <body><p>text</p><script>alert(1)</script>\
             <div><script type=\"module\">import x from './x.js'</script></div></body>",
        );

        assert!(out.document.elements_by_tag("script").is_empty());
        assert!(!out.document.to_html().contains("<script"));

        let descriptors = out
            .quarantined
            .iter()
            .map(|entry| entry.descriptor.clone())
            .collect::<Vec<_>>();
        assert_eq!(
            descriptors,
            vec![
                ScriptDescriptor::External {
                    url: "https://github.com/octo/site/raw/main/docs/js/app.js".to_owned()
                },
                ScriptDescriptor::Inline {
                    source: "alert(1)".to_owned()
                },
                ScriptDescriptor::Inline {
                    source: "import x from './x.js'".to_owned()
                },
            ]
        );

        let ids = out.quarantined.iter().map(|entry| entry.node).collect::<Vec<_>>();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
        for id in ids {
            assert!(!out.document.is_attached(id));
            assert_eq!(out.document.tag(id), Some("script"));
        }
    }

    #[test]
    fn strips_inline_event_handlers() {
        let out = process("<body onload=\"boot()\"><img src=x.png onerror=\"steal()\"></body>");
        assert_eq!(out.stripped_handlers, 2);
        let html = out.document.to_html();
        assert!(!html.contains("onload"));
        assert!(!html.contains("onerror"));
        assert!(html.contains("<img src=\"x.png\">"));
    }

    #[test]
    fn scripts_after_tricky_markup_are_quarantined() {
        for source in [
            "<p>x</p><!--><script>alert(1)</script>-->",
            "<style></style x><script>alert(2)</script></style>",
            "<xmp><p title=\"</xmp><script>alert(6)</script>\"></p></xmp>",
        ] {
            let out = process(source);
            assert_eq!(out.quarantined.len(), 1, "{source}");
            let html = out.document.to_html();
            assert!(!html.contains("<script"), "{html}");
            let reparsed = HtmlParser.parse(&html);
            assert!(reparsed.elements_by_tag("script").is_empty(), "{html}");
        }
    }

    #[test]
    fn script_urls_and_srcdoc_are_removed() {
        let out = process(
            "<iframe src=\"javascript:alert(3)\"></iframe>\
             <iframe srcdoc=\"<script>alert(4)</script>\"></iframe>\
             <a href=\"javascript:alert(5)\">x</a>\
             <a href=\" JaVa&#x09;script:alert(7)\">y</a>\
             <form action=\"vbscript:msgbox(1)\"><button formaction=\"javascript:go()\">b</button></form>\
             <svg><a xlink:href=\"javascript:alert(8)\"><text>z</text></a></svg>\
             <a href=\"mailto:me@example.org\">mail</a>",
        );
        assert_eq!(out.neutralized_attributes, 7);
        let html = out.document.to_html();
        assert!(!html.to_ascii_lowercase().contains("script:"), "{html}");
        assert!(!html.contains("srcdoc"), "{html}");
        assert_eq!(hrefs(&out.document), vec!["mailto:me@example.org"]);
    }

    #[test]
    fn script_base_is_replaced_by_content_base() {
        let out = process("<head><base href=\"javascript:alert(1)//\"></head>");
        assert_eq!(
            attr_of(&out.document, "base", "href").as_deref(),
            Some("https://github.com/octo/site/raw/main/docs/")
        );
    }

    #[test]
    fn script_refresh_and_animations_are_removed() {
        let out = process(
            "<meta http-equiv=\"Refresh\" content=\"0; URL = 'javascript:alert(1)'\">\
             <meta http-equiv=\"refresh\" content=\"5; url=next.html\">\
             <svg><a><animate attributeName=\"href\" values=\"#a;javascript:alert(2)\"/>\
             <set attributeName=\"xlink:href\" to=\"javascript:alert(3)\"/><text>t</text></a></svg>",
        );
        assert_eq!(out.neutralized_attributes, 3);
        let contents = out
            .document
            .elements_by_tag("meta")
            .into_iter()
            .map(|id| {
                out.document
                    .element(id)
                    .and_then(|meta| meta.attr("content"))
                    .map(str::to_owned)
            })
            .collect::<Vec<_>>();
        assert_eq!(contents, vec![None, Some("5; url=next.html".to_owned())]);
        assert!(!out.document.to_html().contains("javascript"));
    }

    #[test]
    fn viewport_defaults_without_explicit_width() {
        assert_eq!(process("<p>x</p>").viewport_width, DEFAULT_VIEWPORT_WIDTH);
        assert_eq!(
            process("<meta name=viewport content=\"width=device-width, initial-scale=1\">")
                .viewport_width,
            DEFAULT_VIEWPORT_WIDTH
        );
    }

    #[test]
    fn viewport_uses_explicit_pixel_width() {
        assert_eq!(
            process("<meta name=\"Viewport\" content=\"initial-scale=1, width = 600\">")
                .viewport_width,
            "600px"
        );
    }

    #[test]
    fn parses_viewport_width_variants() {
        assert_eq!(explicit_viewport_width("width=1024px").as_deref(), Some("1024px"));
        assert_eq!(explicit_viewport_width("width=600.5").as_deref(), Some("600.5px"));
        assert_eq!(explicit_viewport_width("width=1e3").as_deref(), Some("1000px"));
        assert_eq!(explicit_viewport_width("width=+600").as_deref(), Some("600px"));
        assert_eq!(explicit_viewport_width("width=1e999"), None);
        assert_eq!(explicit_viewport_width("width=0"), None);
        assert_eq!(explicit_viewport_width("width=wide"), None);
        assert_eq!(explicit_viewport_width("height=300"), None);
    }

    #[test]
    fn rejects_unparseable_page_url() {
        let document = HtmlParser.parse("<p>x</p>");
        let mut ctx = context();
        ctx.page_url = "https://preview.example/\tview".to_owned();
        let result = DocumentRewriter.process(document, &ctx);
        assert!(matches!(result, Err(error) if error.is_in("url.parse")));
    }
}
