//! Iframe construction.
//!
//! [`prepare`] computes everything the DOM needs before a single node is
//! touched, so the iframe `src` (and with it the first network request) is
//! only ever built from finished client info and page URL.

use crate::cache::{Clock, KeyValueStore, TtlCache};
use crate::client_info::{ClientEnvironment, ClientInfo, encode_component};
use crate::config::WidgetConfig;
use crate::endpoint::{Endpoint, EndpointTable};
use crate::error::WidgetError;
use crate::page::{PageLocation, format_url, page_domain, page_url};
use crate::utm::merge_utm_params;
use tracing::debug;

pub const CONTAINER_ID: &str = "hsfw-container";
pub const CONTAINER_Z_INDEX: &str = "2147483000";

pub const CONTAINER_STYLE: &[(&str, &str)] = &[
    ("width", "100%"),
    ("height", "100%"),
    ("border", "none"),
    ("background", "transparent"),
    ("position", "relative"),
    ("z-index", CONTAINER_Z_INDEX),
];

pub const IFRAME_STYLE: &[(&str, &str)] = &[
    ("width", "100%"),
    ("height", "100%"),
    ("border", "none"),
    ("background", "transparent"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPlan {
    pub form_id: String,
    pub container_id: &'static str,
    pub endpoint: Endpoint,
    pub formatted_url: String,
    pub client_info: ClientInfo,
    pub iframe_src: String,
}

/// `{base}/widget.html?formId=..&domain=..&clientInfo=..&src={base}`
pub fn iframe_src(
    base_url: &str,
    form_id: &str,
    formatted_url: &str,
    encoded_client_info: &str,
) -> String {
    format!(
        "{base_url}/widget.html?formId={}&domain={}&clientInfo={encoded_client_info}&src={base_url}",
        encode_component(form_id),
        encode_component(formatted_url),
    )
}

/// Resolve context, client info and endpoint for one widget instance.
pub fn prepare<S, C>(
    form_id: &str,
    location: &PageLocation,
    env: &ClientEnvironment,
    cache: &TtlCache<S, C>,
    config: &WidgetConfig,
    table: &EndpointTable,
) -> Result<MountPlan, WidgetError>
where
    S: KeyValueStore,
    C: Clock,
{
    let form_id = form_id.trim();
    if form_id.is_empty() {
        return Err(WidgetError::MissingFormId);
    }

    // Everything fallible runs before the utm cache is written.
    let formatted_url = format_url(page_url(location))?;
    let domain = page_domain(location)?;
    let endpoint = table.resolve(&domain, config.force_production);
    debug!(%domain, environment = ?endpoint.environment, "resolved widget endpoint");

    let query = url::Url::parse(&location.href)
        .map(|url| url.query().unwrap_or_default().to_string())
        .unwrap_or_default();
    let utm_params = merge_utm_params(&query, form_id, cache);
    let client_info = ClientInfo::collect(env, utm_params);

    let iframe_src = iframe_src(
        endpoint.base_url,
        form_id,
        &formatted_url,
        &client_info.encode()?,
    );
    Ok(MountPlan {
        form_id: form_id.to_string(),
        container_id: CONTAINER_ID,
        endpoint,
        formatted_url,
        client_info,
        iframe_src,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{DEFAULT_TTL, ManualClock, MemoryStore};
    use crate::endpoint::{Environment, PRODUCTION_BASE, QA_BASE};

    fn cache() -> TtlCache<MemoryStore, ManualClock> {
        TtlCache::new(MemoryStore::new(), ManualClock::new(0), DEFAULT_TTL)
    }

    fn env(url: &str) -> ClientEnvironment {
        ClientEnvironment {
            url: url.into(),
            title: "Home".into(),
            screen_width: 800,
            screen_height: 400,
            user_agent: "Mozilla/5.0 (iPad)".into(),
            cookies_enabled: true,
            ..Default::default()
        }
    }

    #[test]
    fn iframe_src_layout() {
        let src = iframe_src(PRODUCTION_BASE, "f1", "https://a.com/x", "%7B%7D");
        assert_eq!(
            src,
            "https://hsformwidget.azurewebsites.net/widget.html?formId=f1&domain=https%3A%2F%2Fa.com%2Fx&clientInfo=%7B%7D&src=https://hsformwidget.azurewebsites.net"
        );
    }

    #[test]
    fn iframe_src_escapes_reserved_form_id_characters() {
        let src = iframe_src(PRODUCTION_BASE, "a&b c", "https://a.com", "%7B%7D");
        assert!(src.contains("?formId=a%26b%20c&domain="));
        let plain = iframe_src(PRODUCTION_BASE, "form-42", "https://a.com", "%7B%7D");
        assert!(plain.contains("?formId=form-42&domain="));
    }

    #[test]
    fn prepare_builds_complete_plan() {
        let href = "https://shop.example.com/pricing?utm_source=google";
        let plan = prepare(
            "form-42",
            &PageLocation::new(href),
            &env(href),
            &cache(),
            &WidgetConfig::default(),
            &EndpointTable::default(),
        )
        .unwrap();
        assert_eq!(plan.endpoint.environment, Environment::Production);
        assert_eq!(plan.formatted_url, "https://shop.example.com/pricing");
        assert_eq!(plan.client_info.utm_params, "utm_source=google,");
        assert_eq!(plan.client_info.screen_min, 400);
        assert!(plan.client_info.is_mobile);
        assert!(plan.iframe_src.starts_with(
            "https://hsformwidget.azurewebsites.net/widget.html?formId=form-42&domain=https%3A%2F%2Fshop.example.com%2Fpricing&clientInfo="
        ));
        assert!(plan.iframe_src.ends_with("&src=https://hsformwidget.azurewebsites.net"));
    }

    #[test]
    fn prepare_routes_framed_widget_by_parent_domain() {
        let location = PageLocation::framed(
            "https://cdn.example.net/embed.html",
            "https://hsformwidget-test.azurewebsites.net/",
        );
        let plan = prepare(
            "f1",
            &location,
            &env(&location.href),
            &cache(),
            &WidgetConfig::default(),
            &EndpointTable::default(),
        )
        .unwrap();
        assert_eq!(plan.endpoint.base_url, QA_BASE);
        assert_eq!(plan.formatted_url, "https://hsformwidget-test.azurewebsites.net");
    }

    #[test]
    fn prepare_mounts_on_file_pages() {
        let href = "file:///home/user/landing.html?utm_source=x";
        let plan = prepare(
            "f1",
            &PageLocation::new(href),
            &env(href),
            &cache(),
            &WidgetConfig::default(),
            &EndpointTable::default(),
        )
        .unwrap();
        assert_eq!(plan.formatted_url, "file:///home/user/landing.html");
        assert_eq!(plan.endpoint.environment, Environment::Production);
        assert_eq!(plan.client_info.utm_params, "utm_source=x,");
        assert!(plan.iframe_src.contains("&domain=file%3A%2F%2F%2Fhome%2Fuser%2Flanding.html&"));
    }

    #[test]
    fn failed_prepare_leaves_utm_cache_untouched() {
        let cache = cache();
        let location = PageLocation::framed("https://a.com/?utm_source=google", "not a url");
        let err = prepare(
            "f1",
            &location,
            &env(&location.href),
            &cache,
            &WidgetConfig::default(),
            &EndpointTable::default(),
        )
        .unwrap_err();
        assert!(matches!(err, WidgetError::InvalidUrl { .. }));
        assert!(cache.store().is_empty());
    }

    #[test]
    fn prepare_requires_form_id() {
        let err = prepare(
            "  ",
            &PageLocation::new("https://a.com/"),
            &env("https://a.com/"),
            &cache(),
            &WidgetConfig::default(),
            &EndpointTable::default(),
        )
        .unwrap_err();
        assert!(matches!(err, WidgetError::MissingFormId));
    }
}
