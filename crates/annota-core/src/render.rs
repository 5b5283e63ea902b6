//! Annotation rendering - time labels, escaping and the list item markup
//!
//! Rendering produces markup strings; inserting them into a document is the
//! host's job (`annota-wasm` in the browser, a text sink in the CLI).
//!
//! # Example
//!
//! ```rust
//! use annota_core::{render::render_annotation, Annotation};
//!
//! let ann = Annotation::new(1, "jose", "<b>hi</b>", 65_000);
//! let html = render_annotation(&ann);
//! assert!(html.contains("[01:05]"));
//! assert!(html.contains("&lt;b&gt;hi&lt;/b&gt;"));
//! ```

use crate::types::Annotation;
use chrono::NaiveTime;

/// Attribute carrying the seek target (milliseconds) on rendered links
pub const SEEK_ATTRIBUTE: &str = "data-seek";

const SECONDS_PER_DAY: u64 = 86_400;

/// Format a millisecond offset as `MM:SS`.
///
/// The offset is laid onto a zero time of day and the minute and second
/// fields are read back, so hours wrap: `3_600_000` formats as `00:00`.
pub fn format_time(at: u64) -> String {
    let seconds = (at / 1000) % SECONDS_PER_DAY;
    NaiveTime::from_num_seconds_from_midnight_opt(seconds as u32, 0)
        .map(|time| time.format("%M:%S").to_string())
        .unwrap_or_else(|| "00:00".to_string())
}

/// Escape text for insertion into HTML content or a quoted attribute
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Markup for one annotation: a seek link with time label, author and body.
///
/// Username and body are always escaped.
pub fn render_annotation(annotation: &Annotation) -> String {
    format!(
        r##"<a href="#" {attr}="{at}">[{time}] <b>{user}</b>: {body}</a>"##,
        attr = SEEK_ATTRIBUTE,
        at = annotation.at,
        time = format_time(annotation.at),
        user = escape_html(&annotation.user.username),
        body = escape_html(&annotation.body),
    )
}

/// Plain-text line for terminal output
pub fn render_annotation_text(annotation: &Annotation) -> String {
    format!(
        "[{}] {}: {}",
        format_time(annotation.at),
        annotation.user.username,
        annotation.body
    )
}

/// Resolve the seek target of a click inside the message list.
///
/// The clicked element wins; its immediate parent is consulted when the
/// element has no (or an empty) seek attribute, which covers clicks landing
/// on the `<b>` inside a link. Unparseable values resolve to nothing.
pub fn seek_target(target: Option<&str>, parent: Option<&str>) -> Option<u64> {
    let raw = target
        .filter(|v| !v.is_empty())
        .or(parent.filter(|v| !v.is_empty()))?;
    raw.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0), "00:00");
        assert_eq!(format_time(65_000), "01:05");
        assert_eq!(format_time(65_999), "01:05");
        assert_eq!(format_time(599_000), "09:59");
        assert_eq!(format_time(3_599_000), "59:59");
        assert_eq!(format_time(3_600_000), "00:00");
        assert_eq!(format_time(3_725_000), "02:05");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<script>"), "&lt;script&gt;");
        assert_eq!(escape_html("a & b"), "a &amp; b");
        assert_eq!(escape_html(r#""quoted" 'single'"#), "&quot;quoted&quot; &#39;single&#39;");
        assert_eq!(escape_html("&lt;"), "&amp;lt;");
    }

    #[test]
    fn test_render_escapes_body_and_username() {
        let ann = Annotation::new(1, "<img src=x>", "<script>alert(1)</script>", 42_000);
        let html = render_annotation(&ann);

        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(html.contains("<b>&lt;img src=x&gt;</b>"));
        assert!(!html.contains("<script>"));
        assert!(html.contains(r#"data-seek="42000""#));
        assert!(html.contains("[00:42]"));
    }

    #[test]
    fn test_render_text() {
        let ann = Annotation::new(1, "jose", "nice shot", 65_000);
        assert_eq!(render_annotation_text(&ann), "[01:05] jose: nice shot");
    }

    #[test]
    fn test_seek_target() {
        assert_eq!(seek_target(Some("42000"), None), Some(42_000));
        assert_eq!(seek_target(None, Some("1500")), Some(1500));
        assert_eq!(seek_target(Some(""), Some("1500")), Some(1500));
        assert_eq!(seek_target(Some("900"), Some("1500")), Some(900));
        assert_eq!(seek_target(None, None), None);
        assert_eq!(seek_target(Some("soon"), None), None);
    }
}
