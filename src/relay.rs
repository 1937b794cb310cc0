//! postMessage relay between the widget iframe and the host page.
//!
//! Every inbound message is classified field by field; one message may
//! trigger several actions. Classification is pure ([`Relay::classify`]) and
//! side effects go through a [`HostBridge`], so the browser binding stays a
//! thin adapter.

use crate::config::WidgetConfig;
use crate::error::WidgetError;
use crate::mount::CONTAINER_ID;
use serde::Serialize;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, info, warn};

/// Iframe in the parent document that receives analytics page loads.
pub const ANALYTICS_FRAME_ID: &str = "hsfw-ga-iframe";
pub const WILDCARD_ORIGIN: &str = "*";

/// Fields the relay understands. Absent, null, empty or mistyped fields are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboundMessage {
    pub ga_id: Option<Value>,
    pub gtm_id: Option<Value>,
    pub page_to_open: Option<String>,
    pub called_function: Option<String>,
    pub function_params: Option<Value>,
    pub height: Option<f64>,
}

impl InboundMessage {
    pub fn from_value(data: &Value) -> Self {
        let Some(obj) = data.as_object() else {
            return Self::default();
        };
        let present = |key: &str| obj.get(key).filter(|v| truthy(v)).cloned();
        let text = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            ga_id: present("hs_gaID"),
            gtm_id: present("hs_gaGTMID"),
            page_to_open: text("hs_gaPageToOpen"),
            called_function: text("calledFunction"),
            function_params: obj.get("functionParams").cloned(),
            height: obj.get("hsfw_height").and_then(parse_height),
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn parse_height(value: &Value) -> Option<f64> {
    let height = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches("px").trim().parse::<f64>().ok(),
        _ => None,
    }?;
    height.is_finite().then_some(height)
}

/// Payload sent back to whichever window posted the analytics ids.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsReply {
    #[serde(rename = "hs_gaID")]
    pub ga_id: Value,
    #[serde(rename = "hs_gaGTMID")]
    pub gtm_id: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelayAction {
    ReplyToSource {
        reply: AnalyticsReply,
        target_origin: String,
    },
    NavigateFrame {
        frame_id: &'static str,
        url: String,
    },
    Invoke {
        name: String,
        params: Value,
    },
    Resize {
        container_id: &'static str,
        height: String,
    },
}

/// DOM side effects the relay needs from its host.
pub trait HostBridge {
    fn reply_to_source(&self, payload: &Value, target_origin: &str) -> Result<(), WidgetError>;
    fn set_frame_src(&self, frame_id: &str, url: &str) -> Result<(), WidgetError>;
    fn set_container_height(&self, container_id: &str, height: &str) -> Result<(), WidgetError>;
}

pub type HostFunction = Rc<dyn Fn(&Value) -> Result<(), String>>;

/// Named callbacks the iframe may invoke. Lookups fall back to the parent
/// registry, mirroring "current window, then parent window".
#[derive(Default)]
pub struct FunctionRegistry {
    functions: RefCell<HashMap<String, HostFunction>>,
    parent: Option<Rc<FunctionRegistry>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parent(parent: Rc<FunctionRegistry>) -> Self {
        Self {
            functions: RefCell::default(),
            parent: Some(parent),
        }
    }

    pub fn register<F>(&self, name: impl Into<String>, function: F)
    where
        F: Fn(&Value) -> Result<(), String> + 'static,
    {
        self.functions
            .borrow_mut()
            .insert(name.into(), Rc::new(function));
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.functions.borrow_mut().remove(name).is_some()
    }

    pub fn resolve(&self, name: &str) -> Option<HostFunction> {
        if let Some(function) = self.functions.borrow().get(name) {
            return Some(function.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.resolve(name))
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.functions.borrow().keys().cloned().collect();
        names.sort();
        f.debug_struct("FunctionRegistry")
            .field("functions", &names)
            .field("parent", &self.parent)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginPolicy {
    /// Accept every sender and reply with a `*` target origin.
    Any,
    AllowList(Vec<String>),
}

impl OriginPolicy {
    pub fn from_config(config: &WidgetConfig) -> Self {
        if config.allowed_origins.is_empty() {
            Self::Any
        } else {
            Self::AllowList(config.allowed_origins.clone())
        }
    }

    pub fn accepts(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::AllowList(origins) => origins.iter().any(|o| o == origin),
        }
    }

    fn reply_target(&self, origin: &str) -> String {
        match self {
            Self::Any => WILDCARD_ORIGIN.to_string(),
            Self::AllowList(_) => origin.to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    pub dropped: bool,
    pub completed: Vec<RelayAction>,
    pub failed: Vec<(RelayAction, WidgetError)>,
}

/// Listener-scoped relay state.
#[derive(Debug)]
pub struct Relay {
    ga_first_time: bool,
    policy: OriginPolicy,
    registry: Rc<FunctionRegistry>,
    height_padding: u32,
}

impl Relay {
    pub fn new(config: &WidgetConfig, registry: Rc<FunctionRegistry>) -> Self {
        let policy = OriginPolicy::from_config(config);
        if policy == OriginPolicy::Any {
            warn!("relay accepts messages from any origin and replies with target origin *");
        }
        Self {
            ga_first_time: true,
            policy,
            registry,
            height_padding: config.height_padding,
        }
    }

    pub fn registry(&self) -> &Rc<FunctionRegistry> {
        &self.registry
    }

    pub fn analytics_pending(&self) -> bool {
        self.ga_first_time
    }

    /// Actions for one message, in fixed order: handshake, navigation, invoke, resize.
    pub fn classify(&mut self, msg: &InboundMessage, origin: &str) -> Vec<RelayAction> {
        let mut actions = Vec::new();

        if (msg.ga_id.is_some() || msg.gtm_id.is_some()) && self.ga_first_time {
            self.ga_first_time = false;
            actions.push(RelayAction::ReplyToSource {
                reply: AnalyticsReply {
                    ga_id: msg.ga_id.clone().unwrap_or(Value::Null),
                    gtm_id: msg.gtm_id.clone().unwrap_or(Value::Null),
                },
                target_origin: self.policy.reply_target(origin),
            });
        }

        if let Some(url) = &msg.page_to_open {
            actions.push(RelayAction::NavigateFrame {
                frame_id: ANALYTICS_FRAME_ID,
                url: url.clone(),
            });
        }

        if let Some(name) = &msg.called_function {
            actions.push(RelayAction::Invoke {
                name: name.clone(),
                params: msg.function_params.clone().unwrap_or(Value::Null),
            });
        }

        if let Some(height) = msg.height {
            actions.push(RelayAction::Resize {
                container_id: CONTAINER_ID,
                height: format!("{}px", height + f64::from(self.height_padding)),
            });
        }

        actions
    }

    /// Origin check plus classification. `None` means the message was dropped.
    pub fn intake(&mut self, data: &Value, origin: &str) -> Option<Vec<RelayAction>> {
        if !self.policy.accepts(origin) {
            debug!(%origin, "dropping message from origin outside allow-list");
            return None;
        }
        Some(self.classify(&InboundMessage::from_value(data), origin))
    }

    pub fn executor(&self) -> RelayExecutor {
        RelayExecutor {
            registry: self.registry.clone(),
        }
    }

    /// Classify `data` and run the resulting actions. Failures are logged and
    /// collected; they never stop later actions.
    pub fn dispatch(&mut self, data: &Value, origin: &str, bridge: &dyn HostBridge) -> DispatchReport {
        match self.intake(data, origin) {
            Some(actions) => self.executor().run(actions, bridge),
            None => DispatchReport::dropped(),
        }
    }
}

/// Like [`Relay::dispatch`], but the relay is only borrowed while the
/// message is classified. Host functions run unborrowed and may post
/// messages that land back in the same relay.
pub fn dispatch_shared(
    relay: &RefCell<Relay>,
    data: &Value,
    origin: &str,
    bridge: &dyn HostBridge,
) -> DispatchReport {
    let (actions, executor) = {
        let mut relay = relay.borrow_mut();
        (relay.intake(data, origin), relay.executor())
    };
    match actions {
        Some(actions) => executor.run(actions, bridge),
        None => DispatchReport::dropped(),
    }
}

impl DispatchReport {
    fn dropped() -> Self {
        Self {
            dropped: true,
            ..Self::default()
        }
    }
}

/// Runs classified actions against a [`HostBridge`].
#[derive(Debug, Clone)]
pub struct RelayExecutor {
    registry: Rc<FunctionRegistry>,
}

impl RelayExecutor {
    pub fn run(&self, actions: Vec<RelayAction>, bridge: &dyn HostBridge) -> DispatchReport {
        let mut report = DispatchReport::default();
        for action in actions {
            match self.execute(&action, bridge) {
                Ok(()) => report.completed.push(action),
                Err(err) => {
                    warn!(?action, %err, "relay action failed");
                    report.failed.push((action, err));
                }
            }
        }
        report
    }

    fn execute(&self, action: &RelayAction, bridge: &dyn HostBridge) -> Result<(), WidgetError> {
        match action {
            RelayAction::ReplyToSource {
                reply,
                target_origin,
            } => {
                info!(%target_origin, "forwarding analytics ids to message source");
                bridge.reply_to_source(&serde_json::to_value(reply)?, target_origin)
            }
            RelayAction::NavigateFrame { frame_id, url } => bridge.set_frame_src(frame_id, url),
            RelayAction::Invoke { name, params } => {
                self.invoke(name, params);
                Ok(())
            }
            RelayAction::Resize {
                container_id,
                height,
            } => bridge.set_container_height(container_id, height),
        }
    }

    /// Missing functions and failing callbacks are logged, never propagated.
    fn invoke(&self, name: &str, params: &Value) {
        let Some(function) = self.registry.resolve(name) else {
            info!(function = %name, "requested function is not registered");
            return;
        };
        if let Err(message) = function(params) {
            let err = WidgetError::Invocation {
                name: name.to_string(),
                message,
            };
            warn!(%err, "host function raised an error");
        }
    }
}
