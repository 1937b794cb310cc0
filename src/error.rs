use thiserror::Error;

/// Errors raised while bootstrapping the widget or relaying messages.
#[derive(Debug, Error)]
pub enum WidgetError {
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("form-id attribute is missing or empty")]
    MissingFormId,
    #[error("storage unavailable: {0}")]
    Storage(String),
    #[error("dom operation failed: {0}")]
    Dom(String),
    #[error("analytics frame #{0} not found in parent document")]
    FrameNotFound(String),
    #[error("widget container #{0} not found")]
    ContainerNotFound(String),
    #[error("function {name} failed: {message}")]
    Invocation { name: String, message: String },
    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl WidgetError {
    pub fn invalid_url(url: &str, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}
