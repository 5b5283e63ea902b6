//! Annota WASM - Browser Annotation Widget
//!
//! Wires a YouTube IFrame player to a Phoenix channel inside the page:
//! - Player bootstrap (script injection, ready handshake, time/seek)
//! - Channel join with `last_seen_id` resume
//! - Backlog reveal synchronized to playback position
//! - Live annotations, submits and click-to-seek
//!
//! ## Integration with phoenix.js
//!
//! ```javascript
//! import { Socket } from "phoenix";
//! import init, { mount } from "@annota/wasm";
//!
//! await init();
//! const socket = new Socket("/socket", { params: { token: window.userToken } });
//! const widget = await mount(socket, document.getElementById("video"), {});
//! // later
//! widget?.destroy();
//! ```

use wasm_bindgen::prelude::*;
use web_sys::Element;

mod log;
mod phoenix;
mod player;
mod widget;

pub use player::YouTubePlayer;
pub use widget::AnnotationWidget;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    log::info("Initialized");
}

/// Library version
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Mount the annotation widget on `root`.
///
/// Resolves to the widget, or `undefined` when `root` is missing or lacks
/// the media attributes. Rejects if the player cannot be created.
#[wasm_bindgen]
pub async fn mount(socket: JsValue, root: Option<Element>, config: JsValue) -> Result<JsValue, JsValue> {
    match AnnotationWidget::mount(socket, root, config).await? {
        Some(widget) => Ok(widget.into()),
        None => Ok(JsValue::UNDEFINED),
    }
}
