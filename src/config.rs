use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_HEIGHT_PADDING: u32 = 200;

/// Per-element widget options, read from the element's attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WidgetConfig {
    pub force_production: bool,
    /// Empty means any origin may drive the relay.
    pub allowed_origins: Vec<String>,
    pub utm_ttl_ms: u64,
    pub height_padding: u32,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            force_production: false,
            allowed_origins: Vec::new(),
            utm_ttl_ms: crate::cache::DEFAULT_TTL.as_millis() as u64,
            height_padding: DEFAULT_HEIGHT_PADDING,
        }
    }
}

impl WidgetConfig {
    pub fn utm_ttl(&self) -> Duration {
        Duration::from_millis(self.utm_ttl_ms)
    }

    /// Parse a comma separated origin list, as given in `allowed-origins`.
    pub fn with_origin_list(mut self, raw: &str) -> Self {
        self.allowed_origins = split_list(raw);
        self
    }
}

pub(crate) fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(not(target_arch = "wasm32"))]
pub use server_config::ServerConfig;

#[cfg(not(target_arch = "wasm32"))]
mod server_config {
    use super::{WidgetConfig, split_list};
    use anyhow::Context;
    use serde::{Deserialize, Serialize};
    use std::net::SocketAddr;
    use std::path::PathBuf;

    /// Runtime configuration for the asset server.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ServerConfig {
        pub bind_addr: SocketAddr,
        pub pkg_root: PathBuf,
        pub assets_root: PathBuf,
        pub enable_cors: bool,
        pub demo_form_id: String,
        pub widget: WidgetConfig,
    }

    impl ServerConfig {
        pub fn from_env() -> anyhow::Result<Self> {
            let bind_addr: SocketAddr = std::env::var("BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
                .parse()
                .context("failed to parse BIND_ADDR")?;

            let pkg_root = PathBuf::from(std::env::var("PKG_ROOT").unwrap_or_else(|_| "pkg".to_string()));
            let assets_root =
                PathBuf::from(std::env::var("ASSETS_ROOT").unwrap_or_else(|_| "assets".to_string()));

            let enable_cors = env_flag("ENABLE_CORS");
            let demo_form_id =
                std::env::var("DEMO_FORM_ID").unwrap_or_else(|_| "demo-form".to_string());

            let mut widget = WidgetConfig {
                force_production: env_flag("FORMWIDGET_PRODUCTION"),
                allowed_origins: std::env::var("FORMWIDGET_ALLOWED_ORIGINS")
                    .map(|v| split_list(&v))
                    .unwrap_or_default(),
                ..WidgetConfig::default()
            };
            if let Some(ttl) = std::env::var("FORMWIDGET_UTM_TTL_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
            {
                widget.utm_ttl_ms = ttl;
            }

            Ok(Self {
                bind_addr,
                pkg_root,
                assets_root,
                enable_cors,
                demo_form_id,
                widget,
            })
        }
    }

    impl Default for ServerConfig {
        fn default() -> Self {
            Self {
                bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
                pkg_root: PathBuf::from("pkg"),
                assets_root: PathBuf::from("assets"),
                enable_cors: false,
                demo_form_id: "demo-form".to_string(),
                widget: WidgetConfig::default(),
            }
        }
    }

    fn env_flag(name: &str) -> bool {
        std::env::var(name)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widget_config_defaults() {
        let cfg: WidgetConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.utm_ttl(), Duration::from_millis(180_000));
        assert_eq!(cfg.height_padding, 200);
        assert!(cfg.allowed_origins.is_empty());
    }

    #[test]
    fn origin_list_is_trimmed() {
        let cfg = WidgetConfig::default().with_origin_list(" https://a.com, ,https://b.com ");
        assert_eq!(cfg.allowed_origins, vec!["https://a.com", "https://b.com"]);
    }

    #[test]
    fn camel_case_options() {
        let cfg: WidgetConfig =
            serde_json::from_str(r#"{"forceProduction":true,"heightPadding":0}"#).unwrap();
        assert!(cfg.force_production);
        assert_eq!(cfg.height_padding, 0);
    }
}
