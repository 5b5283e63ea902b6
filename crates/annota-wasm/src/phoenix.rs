//! phoenix.js bindings
//!
//! The page owns the `Socket`; the widget only opens one channel on it.

use js_sys::Function;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
extern "C" {
    /// `Socket` from phoenix.js
    pub type Socket;

    #[wasm_bindgen(method)]
    pub fn connect(this: &Socket);

    /// `params` may be a function, evaluated on every (re)join
    #[wasm_bindgen(method)]
    pub fn channel(this: &Socket, topic: &str, params: &JsValue) -> Channel;

    /// `Channel` from phoenix.js
    pub type Channel;

    #[wasm_bindgen(method)]
    pub fn join(this: &Channel) -> Push;

    #[wasm_bindgen(method)]
    pub fn push(this: &Channel, event: &str, payload: &JsValue) -> Push;

    /// Returns a ref usable with [`Channel::off`]
    #[wasm_bindgen(method)]
    pub fn on(this: &Channel, event: &str, callback: &Function) -> f64;

    #[wasm_bindgen(method)]
    pub fn off(this: &Channel, event: &str, reference: f64);

    #[wasm_bindgen(method)]
    pub fn leave(this: &Channel) -> Push;

    /// Pending reply of a join or push
    pub type Push;

    #[wasm_bindgen(method)]
    pub fn receive(this: &Push, status: &str, callback: &Function) -> Push;
}
