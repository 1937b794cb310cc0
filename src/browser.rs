//! DOM bindings for `wasm32-unknown-unknown`.
//!
//! The loader script defines the custom element and calls [`mount_widget`]
//! from `connectedCallback`. Everything here adapts browser objects to the
//! core traits; the decisions live in `mount` and `relay`.

use crate::cache::{Clock, KeyValueStore, MemoryStore, TtlCache};
use crate::client_info::ClientEnvironment;
use crate::config::WidgetConfig;
use crate::endpoint::EndpointTable;
use crate::error::WidgetError;
use crate::mount::{self, CONTAINER_STYLE, IFRAME_STYLE};
use crate::page::PageLocation;
use crate::relay::{FunctionRegistry, HostBridge, Relay, dispatch_shared};
use js_sys::{Function, JSON, Object, Reflect};
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{info, warn};
use wasm_bindgen::prelude::*;
use web_sys::{Document, HtmlElement, HtmlIFrameElement, MessageEvent, Storage, Window};

thread_local! {
    static PAGE_REGISTRY: Rc<FunctionRegistry> = Rc::new(FunctionRegistry::new());
}

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    init_tracing();
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(console::ConsoleMakeWriter)
        .with_ansi(false)
        .without_time()
        .with_max_level(tracing::Level::INFO)
        .try_init();
}

/// Register `function` in the page-level registry shared by every widget.
#[wasm_bindgen]
pub fn register_function(name: String, function: Function) {
    PAGE_REGISTRY.with(|registry| registry.register(name, js_callback(function)));
}

/// Handle returned to the custom element after a successful mount.
#[wasm_bindgen]
pub struct WidgetHandle {
    form_id: String,
    registry: Rc<FunctionRegistry>,
}

#[wasm_bindgen]
impl WidgetHandle {
    #[wasm_bindgen(getter)]
    pub fn form_id(&self) -> String {
        self.form_id.clone()
    }

    /// Register `function` for this widget only; it shadows page-level entries.
    pub fn register_function(&self, name: String, function: Function) {
        self.registry.register(name, js_callback(function));
    }
}

/// Mount one widget inside `host`.
#[wasm_bindgen]
pub fn mount_widget(
    host: HtmlElement,
    form_id: String,
    options: JsValue,
) -> Result<WidgetHandle, JsValue> {
    let span = tracing::info_span!("mount_widget", form_id = %form_id);
    let _guard = span.enter();
    let config = widget_config(&options);
    let window = web_sys::window().ok_or_else(|| js_error("no global window"))?;
    let document = window.document().ok_or_else(|| js_error("no document"))?;

    // A failed plan leaves the host element untouched.
    let cache = TtlCache::new(BrowserStore::open(&window), BrowserClock, config.utm_ttl());
    let plan = mount::prepare(
        &form_id,
        &page_location(&window, &document)?,
        &client_environment(&window, &document)?,
        &cache,
        &config,
        &EndpointTable::default(),
    )
    .map_err(to_js)?;

    let container = document
        .create_element("div")?
        .dyn_into::<HtmlElement>()?;
    container.set_id(plan.container_id);
    host.append_child(&container)?;
    apply_style(&container, CONTAINER_STYLE)?;

    let iframe = document
        .create_element("iframe")?
        .dyn_into::<HtmlIFrameElement>()?;
    apply_style(&iframe, IFRAME_STYLE)?;
    iframe.set_attribute("frameborder", "0")?;
    iframe.set_attribute("allowtransparency", "true")?;
    iframe.set_src(&plan.iframe_src);

    let registry = PAGE_REGISTRY.with(|page| Rc::new(FunctionRegistry::with_parent(page.clone())));
    let relay = Rc::new(RefCell::new(Relay::new(&config, registry.clone())));
    listen(&window, relay)?;

    container.append_child(&iframe)?;
    info!(environment = ?plan.endpoint.environment, "form widget mounted");
    Ok(WidgetHandle {
        form_id: plan.form_id,
        registry,
    })
}

fn listen(window: &Window, relay: Rc<RefCell<Relay>>) -> Result<(), JsValue> {
    let callback = Closure::wrap(Box::new(move |event: MessageEvent| {
        let Some(window) = web_sys::window() else {
            return;
        };
        let Some(document) = window.document() else {
            return;
        };
        let bridge = DomBridge {
            window,
            document,
            source: event.source().and_then(|s| s.dyn_into::<Window>().ok()),
        };
        let data = js_to_json(&event.data());
        dispatch_shared(&relay, &data, &event.origin(), &bridge);
    }) as Box<dyn FnMut(MessageEvent)>);
    window.add_event_listener_with_callback("message", callback.as_ref().unchecked_ref())?;
    // The listener lives as long as the page.
    callback.forget();
    Ok(())
}

struct DomBridge {
    window: Window,
    document: Document,
    source: Option<Window>,
}

impl HostBridge for DomBridge {
    fn reply_to_source(&self, payload: &Value, target_origin: &str) -> Result<(), WidgetError> {
        let Some(source) = &self.source else {
            return Err(WidgetError::Dom("message has no source window".into()));
        };
        let message = JSON::parse(&serde_json::to_string(payload)?).map_err(js_message)?;
        source
            .post_message(&message, target_origin)
            .map_err(js_message)
    }

    fn set_frame_src(&self, frame_id: &str, url: &str) -> Result<(), WidgetError> {
        let document = self.parent_document().unwrap_or_else(|| self.document.clone());
        let frame = document
            .get_element_by_id(frame_id)
            .and_then(|el| el.dyn_into::<HtmlIFrameElement>().ok())
            .ok_or_else(|| WidgetError::FrameNotFound(frame_id.to_string()))?;
        frame.set_src(url);
        Ok(())
    }

    fn set_container_height(&self, container_id: &str, height: &str) -> Result<(), WidgetError> {
        let container = self
            .document
            .get_element_by_id(container_id)
            .and_then(|el| el.dyn_into::<HtmlElement>().ok())
            .ok_or_else(|| WidgetError::ContainerNotFound(container_id.to_string()))?;
        container
            .style()
            .set_property("height", height)
            .map_err(js_message)
    }
}

impl DomBridge {
    /// Parent document when same-origin; cross-origin access yields `None`.
    fn parent_document(&self) -> Option<Document> {
        let parent = self.window.parent().ok().flatten()?;
        Reflect::get(&parent, &"document".into())
            .ok()?
            .dyn_into::<Document>()
            .ok()
    }
}

enum BrowserStore {
    Local(Storage),
    Memory(MemoryStore),
}

impl BrowserStore {
    fn open(window: &Window) -> Self {
        match window.local_storage() {
            Ok(Some(storage)) => Self::Local(storage),
            _ => {
                warn!("localStorage unavailable; utm values will not persist across pages");
                Self::Memory(MemoryStore::new())
            }
        }
    }
}

impl KeyValueStore for BrowserStore {
    fn get(&self, key: &str) -> Result<Option<String>, WidgetError> {
        match self {
            Self::Local(storage) => storage.get_item(key).map_err(storage_error),
            Self::Memory(store) => store.get(key),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), WidgetError> {
        match self {
            Self::Local(storage) => storage.set_item(key, value).map_err(storage_error),
            Self::Memory(store) => store.set(key, value),
        }
    }

    fn remove(&self, key: &str) -> Result<(), WidgetError> {
        match self {
            Self::Local(storage) => storage.remove_item(key).map_err(storage_error),
            Self::Memory(store) => store.remove(key),
        }
    }
}

struct BrowserClock;

impl Clock for BrowserClock {
    fn now_ms(&self) -> u64 {
        js_sys::Date::now() as u64
    }
}

fn page_location(window: &Window, document: &Document) -> Result<PageLocation, JsValue> {
    let in_frame = match window.top()? {
        Some(top) => !Object::is(top.as_ref(), window.as_ref()),
        None => true,
    };
    let referrer = document.referrer();
    Ok(PageLocation {
        href: window.location().href()?,
        referrer: (!referrer.is_empty()).then_some(referrer),
        in_frame,
    })
}

fn client_environment(window: &Window, document: &Document) -> Result<ClientEnvironment, JsValue> {
    let screen = window.screen()?;
    let navigator = window.navigator();
    let cookies_enabled = Reflect::get(&navigator, &"cookieEnabled".into())?
        .as_bool()
        .unwrap_or(false);
    Ok(ClientEnvironment {
        url: window.location().href()?,
        title: document.title(),
        referrer: document.referrer(),
        screen_width: screen.width()?.max(0) as u32,
        screen_height: screen.height()?.max(0) as u32,
        platform: navigator.platform()?,
        user_agent: navigator.user_agent()?,
        app_version: navigator.app_version()?,
        cookies_enabled,
    })
}

fn widget_config(options: &JsValue) -> WidgetConfig {
    if options.is_undefined() || options.is_null() {
        return WidgetConfig::default();
    }
    JSON::stringify(options)
        .ok()
        .and_then(|s| s.as_string())
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_else(|| {
            warn!("ignoring unreadable widget options");
            WidgetConfig::default()
        })
}

fn apply_style(el: &HtmlElement, style: &[(&str, &str)]) -> Result<(), JsValue> {
    let decl = el.style();
    for (property, value) in style {
        decl.set_property(property, value)?;
    }
    Ok(())
}

/// Wrap a JS function; exceptions it throws come back as `Err`.
fn js_callback(function: Function) -> impl Fn(&Value) -> Result<(), String> + 'static {
    move |params: &Value| {
        let arg = serde_json::to_string(params)
            .ok()
            .and_then(|s| JSON::parse(&s).ok())
            .unwrap_or(JsValue::NULL);
        function
            .call1(&JsValue::UNDEFINED, &arg)
            .map(|_| ())
            .map_err(|err| describe(&err))
    }
}

fn js_to_json(value: &JsValue) -> Value {
    JSON::stringify(value)
        .ok()
        .and_then(|s| s.as_string())
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(Value::Null)
}

fn describe(err: &JsValue) -> String {
    err.as_string()
        .or_else(|| {
            Reflect::get(err, &"message".into())
                .ok()
                .and_then(|m| m.as_string())
        })
        .unwrap_or_else(|| format!("{err:?}"))
}

fn storage_error(err: JsValue) -> WidgetError {
    WidgetError::Storage(describe(&err))
}

fn js_message(err: JsValue) -> WidgetError {
    WidgetError::Dom(describe(&err))
}

fn js_error(message: &str) -> JsValue {
    js_sys::Error::new(message).into()
}

fn to_js(err: WidgetError) -> JsValue {
    js_error(&err.to_string())
}

mod console {
    use std::io;
    use tracing_subscriber::fmt::MakeWriter;

    /// Buffers one formatted event and hands it to `console.log` on drop.
    pub struct ConsoleWriter(Vec<u8>);

    impl io::Write for ConsoleWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Drop for ConsoleWriter {
        fn drop(&mut self) {
            let line = String::from_utf8_lossy(&self.0);
            let line = line.trim_end();
            if !line.is_empty() {
                web_sys::console::log_1(&line.into());
            }
        }
    }

    pub struct ConsoleMakeWriter;

    impl<'a> MakeWriter<'a> for ConsoleMakeWriter {
        type Writer = ConsoleWriter;

        fn make_writer(&'a self) -> Self::Writer {
            ConsoleWriter(Vec::new())
        }
    }
}
