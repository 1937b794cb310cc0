use crate::config::WidgetConfig;

pub const ELEMENT_NAME: &str = "hs-form-widget";

/// Script defining `<hs-form-widget>`; boots the wasm package from `pkg_base`.
///
/// Server-wide widget defaults are inlined and merged under each element's
/// own attributes.
pub fn loader_script(pkg_base: &str, defaults: &WidgetConfig) -> String {
    let defaults_json = serde_json::to_string(defaults).unwrap_or_else(|_| "{}".to_string());
    let pkg_url = serde_json::to_string(&format!("{}/formwidget.js", pkg_base.trim_end_matches('/')))
        .unwrap_or_else(|_| "\"/pkg/formwidget.js\"".to_string());
    LOADER_TEMPLATE
        .replace("__PKG_URL__", &pkg_url)
        .replace("__DEFAULTS__", &defaults_json)
        .replace("__ELEMENT__", ELEMENT_NAME)
}

const LOADER_TEMPLATE: &str = r#"// Form widget loader
(function(global) {
  const pkgUrl = __PKG_URL__;
  const defaults = __DEFAULTS__;
  let ready = null;

  function load() {
    if (!ready) {
      ready = import(pkgUrl).then(async (mod) => {
        await mod.default();
        return mod;
      });
    }
    return ready;
  }

  function optionsFor(el) {
    const opts = Object.assign({}, defaults);
    if (el.hasAttribute("production")) {
      opts.forceProduction = true;
    }
    const origins = el.getAttribute("allowed-origins");
    if (origins) {
      opts.allowedOrigins = origins.split(",").map((s) => s.trim()).filter(Boolean);
    }
    return opts;
  }

  class FormWidgetElement extends HTMLElement {
    connectedCallback() {
      if (this._mounted) return;
      const formId = this.getAttribute("form-id") || "";
      this._mounted = load()
        .then((mod) => mod.mount_widget(this, formId, optionsFor(this)))
        .catch((err) => {
          console.warn("FormWidget: failed to mount", err);
          return null;
        });
    }

    async registerFunction(name, fn) {
      const handle = await (this._mounted || Promise.resolve(null));
      if (!handle) {
        console.warn("FormWidget: widget not mounted, cannot register", name);
        return false;
      }
      handle.register_function(name, fn);
      return true;
    }
  }

  if (!customElements.get("__ELEMENT__")) {
    customElements.define("__ELEMENT__", FormWidgetElement);
  }

  global.FormWidget = {
    registerFunction: (name, fn) => load().then((mod) => mod.register_function(name, fn)),
  };
})(window);
"#;

/// Minimal host page embedding one widget, for manual testing.
pub fn demo_page(form_id: &str) -> String {
    let form_id = html_attr(form_id);
    format!(
        r#"<!doctype html>
<html>
<head>
  <meta charset="utf-8">
  <title>Form widget demo</title>
  <script src="/formwidget.js"></script>
</head>
<body>
  <h1>Form widget demo</h1>
  <{ELEMENT_NAME} form-id="{form_id}"></{ELEMENT_NAME}>
</body>
</html>
"#
    )
}

fn html_attr(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
