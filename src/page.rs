//! Resolution of the page that actually embeds the widget.
//!
//! When the widget runs inside a frame, its own location is usually the
//! widget's remote origin, so the referrer stands in for the embedding site.

use crate::error::WidgetError;
use serde::{Deserialize, Serialize};
use url::Url;

/// Raw location data read from the browser at mount time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLocation {
    pub href: String,
    pub referrer: Option<String>,
    pub in_frame: bool,
}

impl PageLocation {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            referrer: None,
            in_frame: false,
        }
    }

    pub fn framed(href: impl Into<String>, referrer: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            referrer: Some(referrer.into()),
            in_frame: true,
        }
    }
}

/// `{protocol, hostname, pathname}` of the topmost visible page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContext {
    pub protocol: String,
    pub hostname: String,
    pub pathname: String,
}

impl PageContext {
    pub fn resolve(location: &PageLocation) -> Result<Self, WidgetError> {
        let raw = page_url(location);
        let url = Url::parse(raw).map_err(|err| WidgetError::invalid_url(raw, err))?;
        Ok(Self {
            protocol: format!("{}:", url.scheme()),
            hostname: url.host_str().unwrap_or_default().to_string(),
            pathname: url.path().to_string(),
        })
    }
}

/// URL of the topmost visible page: the referrer when framed, else our own href.
pub fn page_url(location: &PageLocation) -> &str {
    if location.in_frame
        && let Some(referrer) = location.referrer.as_deref()
        && !referrer.is_empty()
    {
        return referrer;
    }
    &location.href
}

/// Hostname of the topmost visible page, used for endpoint routing.
pub fn page_domain(location: &PageLocation) -> Result<String, WidgetError> {
    PageContext::resolve(location).map(|ctx| ctx.hostname)
}

/// Canonicalize to `scheme://host[/path]`, dropping query, fragment and a bare `/`.
///
/// Hostless pages (`file:///x`, `about:srcdoc`) keep their scheme and path.
pub fn format_url(raw: &str) -> Result<String, WidgetError> {
    let url = Url::parse(raw).map_err(|err| WidgetError::invalid_url(raw, err))?;
    let Some(host) = url.host_str().filter(|h| !h.is_empty()) else {
        if url.cannot_be_a_base() {
            return Ok(format!("{}:{}", url.scheme(), url.path()));
        }
        return Ok(format!("{}://{}", url.scheme(), url.path()));
    };
    let mut out = format!("{}://{}", url.scheme(), host);
    if let Some(port) = url.port() {
        out.push_str(&format!(":{port}"));
    }
    let path = url.path();
    if path != "/" {
        out.push_str(path);
    }
    Ok(out)
}
