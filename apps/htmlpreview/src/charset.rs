//! Byte-to-text decoding for documents read from disk.

use encoding_rs::Encoding;
use encoding_rs::UTF_8;
use hp_core::PreviewError;
use hp_core::PreviewResult;
use hp_html::HtmlParser;
use log::debug;

/// How far into the document a `<meta>` charset declaration is looked for.
const META_PREFIX_BYTES: usize = 8192;

/// Decodes `body` using the explicit `label` when given, else a byte order
/// mark, else a charset declared near the top of the document, else UTF-8.
/// Malformed sequences become U+FFFD.
pub fn decode_document(body: &[u8], label: Option<&str>) -> PreviewResult<String> {
    let encoding = match label {
        Some(label) => Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| {
            PreviewError::new("app.charset.unknown", format!("unknown charset `{label}`"))
        })?,
        None => sniff_encoding(body),
    };

    let (decoded, used, malformed) = encoding.decode(body);
    if malformed {
        debug!("replaced malformed {} sequences", used.name());
    }
    Ok(decoded.into_owned())
}

fn sniff_encoding(body: &[u8]) -> &'static Encoding {
    if let Some((encoding, _)) = Encoding::for_bom(body) {
        return encoding;
    }
    declared_encoding(&body[..body.len().min(META_PREFIX_BYTES)]).unwrap_or(UTF_8)
}

/// First known charset named by a `<meta charset>` or a Content-Type
/// `<meta http-equiv>` in `prefix`. Comments and script bodies are skipped
/// because the prefix is parsed as HTML.
fn declared_encoding(prefix: &[u8]) -> Option<&'static Encoding> {
    let document = HtmlParser.parse(&String::from_utf8_lossy(prefix));
    document
        .elements_by_tag("meta")
        .into_iter()
        .filter_map(|meta| document.element(meta))
        .filter_map(|meta| {
            if let Some(charset) = meta.attr("charset") {
                return Some(charset);
            }
            let content_type = meta
                .attr("http-equiv")
                .is_some_and(|name| name.trim().eq_ignore_ascii_case("content-type"));
            meta.attr("content")
                .filter(|_| content_type)
                .and_then(charset_parameter)
        })
        .find_map(|label| Encoding::for_label(label.trim().as_bytes()))
        // A document that reached us as bytes cannot really be UTF-16.
        .map(Encoding::output_encoding)
}

/// The `charset` parameter of a media type such as `text/html; charset=utf-8`.
fn charset_parameter(content: &str) -> Option<&str> {
    content
        .split(';')
        .skip(1)
        .filter_map(|parameter| parameter.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, value)| value.trim().trim_matches(['"', '\'']))
        .filter(|value| !value.is_empty())
}
