//! URL parsing and base-relative resolution.
//!
//! This is deliberately not a WHATWG/RFC 3986 parser. It splits a URL-like
//! string into optional components where `None` means "inherit from the base"
//! and `Some("")` means "present but empty", and resolves references by
//! inheriting field by field. The `about:` scheme is handled as an opaque,
//! non-hierarchical form that never acquires an authority.

use core::fmt;
use hp_core::PreviewError;
use hp_core::PreviewResult;

const OPAQUE_PREFIX: &str = "about:";

/// Components of a hierarchical (`scheme://authority/path`) or scheme-less
/// reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlComponents {
    pub scheme: Option<String>,
    pub username: Option<String>,
    pub host: Option<String>,
    pub port: Option<String>,
    pub path: Option<String>,
    /// Includes the leading `?`.
    pub query: Option<String>,
    /// Includes the leading `#`.
    pub fragment: Option<String>,
}

/// An `about:` URL. The authority fields do not exist for this form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpaqueUrl {
    pub path: String,
    pub query: Option<String>,
    pub fragment: Option<String>,
}

/// Result of [`parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Url {
    Hierarchical(UrlComponents),
    Opaque(OpaqueUrl),
}

impl Url {
    pub fn is_opaque(&self) -> bool {
        matches!(self, Self::Opaque(_))
    }

    pub fn scheme(&self) -> Option<&str> {
        match self {
            Self::Hierarchical(parts) => parts.scheme.as_deref(),
            Self::Opaque(_) => Some("about"),
        }
    }

    pub fn host(&self) -> Option<&str> {
        match self {
            Self::Hierarchical(parts) => parts.host.as_deref(),
            Self::Opaque(_) => None,
        }
    }

    pub fn has_host(&self) -> bool {
        self.host().is_some()
    }

    pub fn fragment(&self) -> Option<&str> {
        match self {
            Self::Hierarchical(parts) => parts.fragment.as_deref(),
            Self::Opaque(opaque) => opaque.fragment.as_deref(),
        }
    }

    /// True for references such as `#section` that carry nothing but a
    /// fragment.
    pub fn is_fragment_only(&self) -> bool {
        match self {
            Self::Hierarchical(parts) => {
                parts.scheme.is_none()
                    && parts.host.is_none()
                    && parts.path.is_none()
                    && parts.query.is_none()
                    && parts.fragment.is_some()
            }
            Self::Opaque(_) => false,
        }
    }

    pub fn without_fragment(&self) -> Self {
        let mut stripped = self.clone();
        match &mut stripped {
            Self::Hierarchical(parts) => parts.fragment = None,
            Self::Opaque(opaque) => opaque.fragment = None,
        }
        stripped
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hierarchical(parts) => parts.fmt(f),
            Self::Opaque(opaque) => opaque.fmt(f),
        }
    }
}

impl fmt::Display for UrlComponents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scheme) = &self.scheme {
            write!(f, "{scheme}:")?;
        }

        if let Some(host) = &self.host {
            f.write_str("//")?;
            if let Some(username) = self.username.as_deref().filter(|name| !name.is_empty()) {
                write!(f, "{username}@")?;
            }
            f.write_str(host)?;
            if let Some(port) = self.port.as_deref().filter(|port| !port.is_empty()) {
                write!(f, ":{port}")?;
            }
        }

        for part in [&self.path, &self.query, &self.fragment]
            .into_iter()
            .flatten()
        {
            f.write_str(part)?;
        }

        Ok(())
    }
}

impl fmt::Display for OpaqueUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(OPAQUE_PREFIX)?;
        f.write_str(&self.path)?;
        if let Some(query) = &self.query {
            f.write_str(query)?;
        }
        if let Some(fragment) = &self.fragment {
            f.write_str(fragment)?;
        }
        Ok(())
    }
}

/// Splits `raw` into URL components.
pub fn parse(raw: &str) -> PreviewResult<Url> {
    if let Some(position) = raw.find(|ch: char| ch.is_ascii_control()) {
        return Err(PreviewError::new(
            "url.parse.control_character",
            format!("control character at byte {position} in `{}`", raw.escape_debug()),
        ));
    }

    if let Some(rest) = raw.strip_prefix(OPAQUE_PREFIX) {
        return Ok(Url::Opaque(parse_opaque(rest)));
    }

    parse_hierarchical(raw).map(Url::Hierarchical)
}

/// Resolves `reference` against `base` and reassembles the result.
pub fn resolve(reference: &str, base: &str) -> PreviewResult<String> {
    let reference = parse(reference)?;
    let base = parse(base)?;
    Ok(resolve_parsed(&reference, &base).to_string())
}

/// Resolution over already parsed values.
pub fn resolve_parsed(reference: &Url, base: &Url) -> Url {
    match (reference, base) {
        (Url::Opaque(_), _) => reference.clone(),
        (Url::Hierarchical(reference), Url::Opaque(base)) => {
            if reference.scheme.is_some() {
                return Url::Hierarchical(reference.clone());
            }
            Url::Opaque(resolve_against_opaque(reference, base))
        }
        (Url::Hierarchical(reference), Url::Hierarchical(base)) => {
            Url::Hierarchical(resolve_hierarchical(reference, base))
        }
    }
}

fn parse_opaque(rest: &str) -> OpaqueUrl {
    let (rest, fragment) = split_off(rest, '#');
    let (path, query) = split_off(rest, '?');
    OpaqueUrl {
        path: path.to_owned(),
        query,
        fragment,
    }
}

/// Splits at the first `separator`; the separator stays on the tail.
fn split_off(input: &str, separator: char) -> (&str, Option<String>) {
    match input.find(separator) {
        Some(index) => (&input[..index], Some(input[index..].to_owned())),
        None => (input, None),
    }
}

fn parse_hierarchical(raw: &str) -> PreviewResult<UrlComponents> {
    let mut parts = UrlComponents::default();
    let mut rest = raw;

    if let Some(index) = rest.find([':', '/', '?', '#']) {
        let candidate = &rest[..index];
        if rest[index..].starts_with(':') && is_scheme(candidate) {
            parts.scheme = Some(candidate.to_owned());
            rest = &rest[index + 1..];
        }
    }

    if let Some(after_slashes) = rest.strip_prefix("//") {
        let end = after_slashes
            .find(['/', '?', '#'])
            .unwrap_or(after_slashes.len());
        let (username, host, port) = split_authority(&after_slashes[..end])?;
        parts.username = Some(username);
        parts.host = Some(host);
        parts.port = Some(port);
        rest = &after_slashes[end..];
    }

    let path_end = rest.find(['?', '#']).unwrap_or(rest.len());
    let path = &rest[..path_end];
    rest = &rest[path_end..];
    if !path.is_empty() {
        parts.path = Some(path.to_owned());
    } else if parts.host.is_some() {
        parts.path = Some("/".to_owned());
    }

    if rest.starts_with('?') {
        let query_end = rest.find('#').unwrap_or(rest.len());
        parts.query = Some(rest[..query_end].to_owned());
        rest = &rest[query_end..];
    }

    if rest.starts_with('#') {
        parts.fragment = Some(rest.to_owned());
    }

    Ok(parts)
}

fn is_scheme(candidate: &str) -> bool {
    let mut bytes = candidate.bytes();
    match bytes.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    bytes.all(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'+' | b'-' | b'.'))
}

/// Splits `user@host:port`. Missing pieces come back as empty strings.
fn split_authority(authority: &str) -> PreviewResult<(String, String, String)> {
    let (username, host_port) = match authority.rfind('@') {
        Some(index) => (&authority[..index], &authority[index + 1..]),
        None => ("", authority),
    };

    let port_separator = if host_port.starts_with('[') {
        // Bracketed IPv6 literals contain colons of their own.
        host_port
            .find(']')
            .and_then(|close| host_port[close..].find(':').map(|offset| close + offset))
    } else {
        host_port.rfind(':')
    };

    let (host, port) = match port_separator {
        Some(index) => (&host_port[..index], &host_port[index + 1..]),
        None => (host_port, ""),
    };

    if !port.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(PreviewError::new(
            "url.parse.invalid_port",
            format!("port `{port}` in authority `{authority}` is not numeric"),
        ));
    }

    Ok((username.to_owned(), host.to_owned(), port.to_owned()))
}

fn resolve_hierarchical(reference: &UrlComponents, base: &UrlComponents) -> UrlComponents {
    // A reference naming a different scheme is absolute (`mailto:`, `javascript:`).
    if let (Some(own), Some(base_scheme)) = (&reference.scheme, &base.scheme) {
        if !own.eq_ignore_ascii_case(base_scheme) {
            return reference.clone();
        }
    }

    let has_own_authority = reference.host.is_some();
    let mut merged = UrlComponents {
        scheme: reference.scheme.clone().or_else(|| base.scheme.clone()),
        username: reference.username.clone().or_else(|| base.username.clone()),
        host: reference.host.clone().or_else(|| base.host.clone()),
        port: reference.port.clone().or_else(|| base.port.clone()),
        path: reference.path.clone().or_else(|| base.path.clone()),
        query: reference.query.clone().or_else(|| base.query.clone()),
        fragment: reference.fragment.clone().or_else(|| base.fragment.clone()),
    };

    if let Some(own_path) = &reference.path {
        let joined = if !has_own_authority && !own_path.starts_with('/') {
            format!("{}{own_path}", directory_of(base.path.as_deref()))
        } else {
            own_path.clone()
        };
        merged.path = Some(remove_dot_segments(&joined));
    }

    if merged.path.is_none() && merged.host.is_some() {
        merged.path = Some("/".to_owned());
    }

    merged
}

fn resolve_against_opaque(reference: &UrlComponents, base: &OpaqueUrl) -> OpaqueUrl {
    let path = match reference.path.as_deref() {
        Some(own) if !own.starts_with('/') => {
            let directory = base.path.rfind('/').map_or("", |index| &base.path[..=index]);
            format!("{directory}{own}")
        }
        Some(own) => own.to_owned(),
        None => base.path.clone(),
    };

    OpaqueUrl {
        path,
        query: reference.query.clone().or_else(|| base.query.clone()),
        fragment: reference.fragment.clone().or_else(|| base.fragment.clone()),
    }
}

/// Base path up to and including its last `/`, or `/` when there is none.
fn directory_of(path: Option<&str>) -> &str {
    match path.and_then(|path| path.rfind('/').map(|index| &path[..=index])) {
        Some(directory) => directory,
        None => "/",
    }
}

fn remove_dot_segments(path: &str) -> String {
    if !path.starts_with('/') || !path.split('/').any(|segment| segment == "." || segment == "..") {
        return path.to_owned();
    }

    let segments = path.split('/').collect::<Vec<_>>();
    let last = segments.len().saturating_sub(1);
    let mut out: Vec<&str> = Vec::with_capacity(segments.len());

    for (index, segment) in segments.into_iter().enumerate() {
        match segment {
            "." => {}
            ".." => {
                // Keep the empty leading segment that anchors the root.
                if out.len() > 1 {
                    out.pop();
                }
            }
            other => {
                out.push(other);
                continue;
            }
        }
        if index == last {
            out.push("");
        }
    }

    if out.len() == 1 {
        return "/".to_owned();
    }
    out.join("/")
}
