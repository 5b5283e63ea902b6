//! Console logging with the widget prefix

use web_sys::console;

const PREFIX: &str = "[Annota]";

pub fn info(message: &str) {
    console::log_1(&format!("{PREFIX} {message}").into());
}

pub fn warn(message: &str) {
    console::warn_1(&format!("{PREFIX} {message}").into());
}

pub fn error(message: &str) {
    console::error_1(&format!("{PREFIX} {message}").into());
}
