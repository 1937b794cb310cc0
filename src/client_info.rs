use crate::error::WidgetError;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Characters left unescaped by `encodeURIComponent`.
pub const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

static MOBILE_UA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)android|webos|iphone|ipad|ipod|blackberry|iemobile|opera mini")
        .expect("mobile user-agent pattern is valid")
});

pub fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, URI_COMPONENT).to_string()
}

pub fn is_mobile(user_agent: &str) -> bool {
    MOBILE_UA.is_match(user_agent)
}

/// Screen size normalized so orientation never changes which side is smaller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenDimensions {
    pub smaller: u32,
    pub larger: u32,
}

impl ScreenDimensions {
    pub fn from_screen(width: u32, height: u32) -> Self {
        Self {
            smaller: width.min(height),
            larger: width.max(height),
        }
    }
}

/// Browser facts read once at mount time.
#[derive(Debug, Clone, Default)]
pub struct ClientEnvironment {
    pub url: String,
    pub title: String,
    pub referrer: String,
    pub screen_width: u32,
    pub screen_height: u32,
    pub platform: String,
    pub user_agent: String,
    pub app_version: String,
    pub cookies_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub url: String,
    pub title: String,
    pub previous_page: String,
    pub utm_params: String,
    pub screen_min: u32,
    pub screen_max: u32,
    pub os: String,
    pub browser: String,
    pub browser_version: String,
    pub is_mobile: bool,
    pub cookies_enabled: bool,
}

impl ClientInfo {
    pub fn collect(env: &ClientEnvironment, utm_params: String) -> Self {
        let screen = ScreenDimensions::from_screen(env.screen_width, env.screen_height);
        Self {
            url: env.url.clone(),
            title: env.title.clone(),
            previous_page: env.referrer.clone(),
            utm_params,
            screen_min: screen.smaller,
            screen_max: screen.larger,
            os: env.platform.clone(),
            browser: env.user_agent.clone(),
            browser_version: env.app_version.clone(),
            is_mobile: is_mobile(&env.user_agent),
            cookies_enabled: env.cookies_enabled,
        }
    }

    /// JSON, escaped for use as a single query parameter value.
    pub fn encode(&self) -> Result<String, WidgetError> {
        Ok(encode_component(&serde_json::to_string(self)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15";
    const DESKTOP_UA: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/126.0 Safari/537.36";

    #[test]
    fn screen_dimensions_ignore_orientation() {
        let portrait = ScreenDimensions::from_screen(400, 800);
        let landscape = ScreenDimensions::from_screen(800, 400);
        assert_eq!(portrait, landscape);
        assert_eq!(portrait.smaller, 400);
        assert_eq!(portrait.larger, 800);
    }

    #[test]
    fn mobile_detection_is_case_insensitive() {
        assert!(is_mobile(IPHONE_UA));
        assert!(is_mobile("some ANDROID build"));
        assert!(is_mobile("Opera Mini/8.0"));
        assert!(!is_mobile(DESKTOP_UA));
        assert!(!is_mobile("Opera/9.80"));
    }

    #[test]
    fn collect_copies_environment() {
        let env = ClientEnvironment {
            url: "https://a.com/x?utm_source=g".into(),
            title: "Pricing".into(),
            referrer: "https://google.com/".into(),
            screen_width: 1920,
            screen_height: 1080,
            platform: "Win32".into(),
            user_agent: DESKTOP_UA.into(),
            app_version: "5.0 (Windows)".into(),
            cookies_enabled: true,
        };
        let info = ClientInfo::collect(&env, "utm_source=g,".into());
        assert_eq!(info.previous_page, "https://google.com/");
        assert_eq!(info.screen_min, 1080);
        assert_eq!(info.screen_max, 1920);
        assert!(!info.is_mobile);
        assert_eq!(info.utm_params, "utm_source=g,");
    }

    #[test]
    fn encoded_record_is_url_safe_json() {
        let info = ClientInfo::collect(&ClientEnvironment::default(), "a=b c,".into());
        let encoded = info.encode().unwrap();
        assert!(!encoded.contains(['{', '"', ' ', '&', '=']));
        assert!(encoded.contains("%22utmParams%22%3A%22a%3Db%20c%2C%22"));
    }

    #[test]
    fn encode_component_matches_uri_component_rules() {
        assert_eq!(encode_component("https://a.com/x"), "https%3A%2F%2Fa.com%2Fx");
        assert_eq!(encode_component("a-b_c.d!~*'()"), "a-b_c.d!~*'()");
    }
}
