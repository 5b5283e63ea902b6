//! Widget configuration

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Annotation widget configuration
///
/// Every field has a default, so partial config files and JS objects work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetConfig {
    /// Channel topic prefix; the topic is `<prefix>:<media id>`
    pub topic_prefix: String,
    /// Reveal loop period in milliseconds
    pub reveal_interval_ms: u64,
    /// Embedded player width in pixels
    pub player_width: u32,
    /// Embedded player height in pixels
    pub player_height: u32,
    /// Player bootstrap script
    pub player_script_url: String,
    /// Message list element id
    pub container_id: String,
    /// Annotation input element id
    pub input_id: String,
    /// Submit button element id
    pub submit_id: String,
    /// Timeout for join and push replies in milliseconds
    pub reply_timeout_ms: u64,
    /// Socket heartbeat interval in milliseconds
    pub heartbeat_interval_ms: u64,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            topic_prefix: "videos".to_string(),
            reveal_interval_ms: 1000,
            player_width: 420,
            player_height: 360,
            player_script_url: "https://www.youtube.com/iframe_api".to_string(),
            container_id: "msg-container".to_string(),
            input_id: "msg-input".to_string(),
            submit_id: "msg-submit".to_string(),
            reply_timeout_ms: 10_000,
            heartbeat_interval_ms: 30_000,
        }
    }
}

impl WidgetConfig {
    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.topic_prefix.is_empty() || self.topic_prefix.contains(':') {
            return Err(Error::InvalidConfig(format!(
                "topic_prefix must be non-empty and contain no ':' (got {:?})",
                self.topic_prefix
            )));
        }
        if self.reveal_interval_ms == 0 {
            return Err(Error::InvalidConfig("reveal_interval_ms must be > 0".to_string()));
        }
        if self.reply_timeout_ms == 0 || self.heartbeat_interval_ms == 0 {
            return Err(Error::InvalidConfig("timeouts must be > 0".to_string()));
        }
        if self.player_width == 0 || self.player_height == 0 {
            return Err(Error::InvalidConfig("player dimensions must be > 0".to_string()));
        }
        for (name, id) in [
            ("container_id", &self.container_id),
            ("input_id", &self.input_id),
            ("submit_id", &self.submit_id),
        ] {
            if id.is_empty() {
                return Err(Error::InvalidConfig(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }

    /// Topic for a logical media id
    pub fn topic_for(&self, media_id: &str) -> String {
        format!("{}:{}", self.topic_prefix, media_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WidgetConfig::default();
        assert_eq!(config.reveal_interval_ms, 1000);
        assert_eq!((config.player_width, config.player_height), (420, 360));
        assert_eq!(config.topic_for("7"), "videos:7");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config: WidgetConfig = serde_json::from_str(r#"{"reveal_interval_ms": 250}"#).unwrap();
        assert_eq!(config.reveal_interval_ms, 250);
        assert_eq!(config.topic_prefix, "videos");
    }

    #[test]
    fn test_validation() {
        let config = WidgetConfig {
            reveal_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = WidgetConfig {
            topic_prefix: "videos:extra".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }
}
