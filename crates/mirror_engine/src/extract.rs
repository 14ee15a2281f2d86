//! Reference extraction from fetched HTML and CSS documents.
//!
//! HTML is parsed with `scraper`; every element contributes its `href` and
//! `src` attributes, the `url(...)` references of its inline `style`
//! attribute and, for `<style>` elements, those of the text content. CSS is
//! scanned as plain text. All references are resolved against the
//! document URL and returned in document order.

use std::io;

use mirror_logging::mirror_warn;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html};
use url::Url;

use crate::decode::{decode_text, DecodeError};

/// `url( 'v' )`, `url("v")` or `url(v)`; unquoted values carry no whitespace, quotes or `)`.
static CSS_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"url\(\s*(?:'([^']*)'|"([^"]*)"|([^'"\s)]+))\s*\)"#)
        .expect("css url pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Html,
    Css,
}

impl DocumentKind {
    /// Classify a `Content-Type` header value; `None` means no extraction applies.
    pub fn from_content_type(content_type: Option<&str>) -> Option<Self> {
        let mime = content_type?.split(';').next()?.trim().to_ascii_lowercase();
        match mime.as_str() {
            "text/html" | "application/xhtml+xml" => Some(DocumentKind::Html),
            "text/css" => Some(DocumentKind::Css),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("invalid base url {url}: {message}")]
    InvalidBaseUrl { url: String, message: String },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("failed to read downloaded document: {0}")]
    Read(#[from] io::Error),
    #[error("extraction worker stopped: {0}")]
    Worker(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceExtractor;

impl ReferenceExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Decode `bytes` and extract every reference of a document of `kind`.
    pub fn extract(
        &self,
        kind: DocumentKind,
        bytes: &[u8],
        content_type: Option<&str>,
        base_url: &str,
    ) -> Result<Vec<String>, ExtractionError> {
        let base = Url::parse(base_url).map_err(|err| ExtractionError::InvalidBaseUrl {
            url: base_url.to_string(),
            message: err.to_string(),
        })?;
        let decoded = decode_text(bytes, content_type)?;
        if decoded.malformed {
            mirror_warn!(
                "{} has malformed {} sequences; scanning with replacement characters",
                base_url,
                decoded.encoding_label
            );
        }
        Ok(match kind {
            DocumentKind::Html => self.extract_html(&decoded.text, &base),
            DocumentKind::Css => self.extract_css(&decoded.text, &base),
        })
    }

    pub fn extract_html(&self, html: &str, base: &Url) -> Vec<String> {
        let document = Html::parse_document(html);
        let mut refs = References::new(base);

        for node in document.root_element().descendants() {
            let Some(element) = ElementRef::wrap(node) else {
                continue;
            };
            let value = element.value();
            for attr in ["href", "src"] {
                if let Some(raw) = value.attr(attr) {
                    refs.push(raw);
                }
            }
            if let Some(style) = value.attr("style") {
                scan_css(style, &mut refs);
            }
            if value.name().eq_ignore_ascii_case("style") {
                let css: String = element.text().collect();
                scan_css(&css, &mut refs);
            }
        }

        refs.into_vec()
    }

    pub fn extract_css(&self, css: &str, base: &Url) -> Vec<String> {
        let mut refs = References::new(base);
        scan_css(css, &mut refs);
        refs.into_vec()
    }
}

fn scan_css(css: &str, refs: &mut References<'_>) {
    for caps in CSS_URL.captures_iter(css) {
        if let Some(value) = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)) {
            refs.push(value.as_str());
        }
    }
}

/// Resolve `reference` against `base` per RFC 3986.
///
/// Empty references and anything that fails to parse are dropped, as are
/// schemes other than http(s) since they cannot be fetched. The fragment is
/// removed because it never reaches the server.
pub fn resolve_reference(reference: &str, base: &Url) -> Option<Url> {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut url = base.join(trimmed).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}

struct References<'a> {
    base: &'a Url,
    urls: Vec<String>,
}

impl<'a> References<'a> {
    fn new(base: &'a Url) -> Self {
        Self {
            base,
            urls: Vec::new(),
        }
    }

    fn push(&mut self, raw: &str) {
        if let Some(url) = resolve_reference(raw, self.base) {
            self.urls.push(url.into());
        }
    }

    fn into_vec(self) -> Vec<String> {
        self.urls
    }
}
