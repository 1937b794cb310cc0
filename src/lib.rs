//! Embeddable form widget.
//!
//! The core modules are plain Rust and run anywhere. `browser` binds them to
//! the DOM when compiled for `wasm32`; `server` and `api` make up the native
//! asset server that ships the loader script and the wasm package.

pub mod cache;
pub mod client_info;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod mount;
pub mod page;
pub mod relay;
pub mod utm;

#[cfg(target_arch = "wasm32")]
pub mod browser;

#[cfg(not(target_arch = "wasm32"))]
pub mod api;
#[cfg(not(target_arch = "wasm32"))]
pub mod loader;
#[cfg(not(target_arch = "wasm32"))]
pub mod server;

pub use config::WidgetConfig;
pub use error::WidgetError;
