use crate::client_info::{ClientEnvironment, ClientInfo};
use crate::endpoint::Environment;
use crate::loader;
use crate::mount::iframe_src;
use crate::page::{PageLocation, format_url, page_domain};
use crate::server::AppState;
use axum::Json;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use serde::{Deserialize, Serialize};

pub async fn serve_loader(State(state): State<AppState>) -> impl IntoResponse {
    let override_path = state.config.assets_root.join("formwidget.js");
    let script = match tokio::fs::read_to_string(&override_path).await {
        Ok(script) => script,
        Err(_) => loader::loader_script("/pkg", &state.config.widget),
    };
    let mut resp = Response::new(script);
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/javascript"),
    );
    resp
}

#[derive(Debug, Deserialize)]
pub struct DemoQuery {
    #[serde(rename = "formId")]
    pub form_id: Option<String>,
}

pub async fn demo_page(
    State(state): State<AppState>,
    Query(query): Query<DemoQuery>,
) -> impl IntoResponse {
    let form_id = query
        .form_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| state.config.demo_form_id.clone());
    Html(loader::demo_page(&form_id))
}

#[derive(Debug, Deserialize)]
pub struct EndpointQuery {
    pub domain: String,
    #[serde(default)]
    pub production: bool,
}

#[derive(Debug, Serialize)]
pub struct EndpointResponse {
    pub domain: String,
    pub environment: Environment,
    pub base_url: &'static str,
}

pub async fn resolve_endpoint(
    State(state): State<AppState>,
    Query(query): Query<EndpointQuery>,
) -> impl IntoResponse {
    let force = query.production || state.config.widget.force_production;
    let endpoint = state.endpoints.resolve(&query.domain, force);
    tracing::debug!(domain = %query.domain, environment = ?endpoint.environment, "endpoint lookup");
    Json(EndpointResponse {
        domain: query.domain,
        environment: endpoint.environment,
        base_url: endpoint.base_url,
    })
}

#[derive(Debug, Deserialize)]
pub struct IframeSrcQuery {
    #[serde(rename = "formId")]
    pub form_id: String,
    #[serde(rename = "pageUrl")]
    pub page_url: String,
    #[serde(rename = "clientInfo")]
    pub client_info: Option<String>,
}

/// Build the iframe `src` a widget mounted on `pageUrl` would request.
pub async fn build_iframe_src(
    State(state): State<AppState>,
    Query(query): Query<IframeSrcQuery>,
) -> impl IntoResponse {
    match iframe_src_for(&state, &query) {
        Ok(src) => Json(serde_json::json!({ "src": src })).into_response(),
        Err(err) => (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
    }
}

fn iframe_src_for(state: &AppState, query: &IframeSrcQuery) -> anyhow::Result<String> {
    if query.form_id.trim().is_empty() {
        return Err(crate::error::WidgetError::MissingFormId.into());
    }
    let location = PageLocation::new(query.page_url.clone());
    let formatted = format_url(&query.page_url)?;
    let domain = page_domain(&location)?;
    let endpoint = state
        .endpoints
        .resolve(&domain, state.config.widget.force_production);
    let client_info = match &query.client_info {
        Some(encoded) => encoded.clone(),
        None => ClientInfo::collect(
            &ClientEnvironment {
                url: query.page_url.clone(),
                ..Default::default()
            },
            String::new(),
        )
        .encode()?,
    };
    Ok(iframe_src(
        endpoint.base_url,
        query.form_id.trim(),
        &formatted,
        &client_info,
    ))
}
