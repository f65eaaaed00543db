//! URL splitting and joining
//!
//! Template URLs carry placeholders, so they cannot go through a URL parser.
//! Splitting only looks at separators outside `{{ }}`.

use courier_pattern::is_templated;
use url::form_urlencoded;

/// URL split into its templated parts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlParts {
    /// `scheme://host[:port]`, or a leading placeholder standing for one
    pub origin: String,
    /// Path starting with `/`
    pub pathname: String,
    /// Query pairs in order
    pub search: Vec<(String, String)>,
}

/// Byte offsets of `needle` outside placeholders
fn outside(text: &str, needle: char) -> Vec<usize> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i..].starts_with(b"{{") {
            depth += 1;
            i += 2;
            continue;
        }
        if depth > 0 && bytes[i..].starts_with(b"}}") {
            depth -= 1;
            i += 2;
            continue;
        }
        if depth == 0 && text[i..].starts_with(needle) {
            out.push(i);
        }
        i += 1;
    }
    out
}

fn first_outside(text: &str, needle: char) -> Option<usize> {
    outside(text, needle).first().copied()
}

fn split_first_outside(text: &str, needle: char) -> (&str, Option<&str>) {
    match first_outside(text, needle) {
        Some(at) => (&text[..at], Some(&text[at + needle.len_utf8()..])),
        None => (text, None),
    }
}

fn decode_component(text: &str) -> String {
    if is_templated(text) {
        return text.to_string();
    }
    form_urlencoded::parse(format!("x={text}").as_bytes())
        .next()
        .map_or_else(|| text.to_string(), |(_, v)| v.into_owned())
}

/// Split `url` into origin, pathname and search pairs
///
/// Templated query components stay raw; literal ones are percent-decoded.
#[must_use]
pub fn split_url(url: &str) -> UrlParts {
    let (location, query) = split_first_outside(url.trim(), '?');

    let (origin, pathname) = match location.find("://") {
        Some(scheme_end) => {
            let host_start = scheme_end + 3;
            match first_outside(&location[host_start..], '/') {
                Some(slash) => location.split_at(host_start + slash),
                None => (location, ""),
            }
        }
        None if location.starts_with("{{") => match location.find("}}") {
            Some(close) => location.split_at(close + 2),
            None => ("", location),
        },
        None => ("", location),
    };
    let pathname = if pathname.is_empty() && !origin.is_empty() {
        "/".to_string()
    } else {
        pathname.to_string()
    };

    let search = query
        .map(|query| {
            let mut pairs = Vec::new();
            let mut start = 0;
            let mut bounds = outside(query, '&');
            bounds.push(query.len());
            for end in bounds {
                let piece = &query[start..end];
                start = end + 1;
                if piece.is_empty() {
                    continue;
                }
                let (key, value) = split_first_outside(piece, '=');
                pairs.push((decode_component(key), decode_component(value.unwrap_or_default())));
            }
            pairs
        })
        .unwrap_or_default();

    UrlParts {
        origin: origin.to_string(),
        pathname,
        search,
    }
}

/// Join parts back into a URL
///
/// With `encode` the query is form-encoded; otherwise it is written raw so
/// placeholders stay readable.
#[must_use]
pub fn join_url(origin: &str, pathname: &str, search: &[(String, String)], encode: bool) -> String {
    let mut url = format!("{origin}{pathname}");
    if search.is_empty() {
        return url;
    }
    url.push('?');
    if encode {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in search {
            serializer.append_pair(key, value);
        }
        url.push_str(&serializer.finish());
    } else {
        let raw: Vec<String> = search.iter().map(|(k, v)| format!("{k}={v}")).collect();
        url.push_str(&raw.join("&"));
    }
    url
}
