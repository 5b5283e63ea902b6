//! CLI command implementations

use crate::output::{annotation_line, annotation_list, format_output, OutputFormat};
use annota_core::channel::NEW_ANNOTATION;
use annota_core::{
    Annotation, AnnotationController, AnnotationView, ChannelEvent, ChannelSession, JoinParams,
    JoinReply, MediaRef, MemoryHub, NewAnnotation, PhoenixSocket, Player, SharedPlayer,
    SimulatedPlayer, Transport, WidgetConfig,
};
use anyhow::Context;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Load a TOML widget configuration, or the defaults when no path is given
pub fn load_config(path: Option<&Path>) -> anyhow::Result<WidgetConfig> {
    let config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => WidgetConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Parse a playback position given as milliseconds, `MM:SS` or `H:MM:SS`
pub fn parse_position(s: &str) -> anyhow::Result<u64> {
    let s = s.trim();
    if !s.contains(':') {
        return s
            .parse::<u64>()
            .with_context(|| format!("invalid position {s:?}"));
    }

    let parts: Vec<&str> = s.split(':').collect();
    anyhow::ensure!(parts.len() <= 3, "invalid position {s:?}");
    let mut seconds = 0u64;
    for (i, part) in parts.iter().enumerate() {
        let value: u64 = part
            .parse()
            .with_context(|| format!("invalid position {s:?}"))?;
        anyhow::ensure!(i == 0 || value < 60, "invalid position {s:?}");
        seconds = seconds
            .checked_mul(60)
            .and_then(|total| total.checked_add(value))
            .with_context(|| format!("position {s:?} out of range"))?;
    }
    seconds
        .checked_mul(1000)
        .with_context(|| format!("position {s:?} out of range"))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BacklogFile {
    List(Vec<Annotation>),
    Reply(JoinReply),
}

/// Read a backlog saved as a plain list or as a join reply
pub fn load_backlog(path: &Path) -> anyhow::Result<Vec<Annotation>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading backlog {}", path.display()))?;
    let file: BacklogFile = serde_json::from_str(&text)
        .with_context(|| format!("parsing backlog {}", path.display()))?;
    Ok(match file {
        BacklogFile::List(annotations) => annotations,
        BacklogFile::Reply(reply) => reply.annotations,
    })
}

/// Join a topic, print its backlog, then stream live annotations until Ctrl-C
pub async fn watch(
    config: &WidgetConfig,
    url: &str,
    video_id: &str,
    last_seen_id: Option<u64>,
    format: &str,
) -> anyhow::Result<()> {
    let format = OutputFormat::from(format);
    let socket = PhoenixSocket::new(url, config)?;
    socket.connect().await?;

    let topic = config.topic_for(video_id);
    let channel = socket.channel(&topic);
    let mut events = channel.events().context("event stream already taken")?;
    let mut session = ChannelSession::new(&topic).with_last_seen_id(last_seen_id);

    let reply: JoinReply = serde_json::from_value(channel.join(&session.join_params()).await?)?;
    session.acknowledge_backlog(&reply.annotations);
    info!(topic = %topic, backlog = reply.annotations.len(), "Joined");

    if format != OutputFormat::Json {
        eprintln!(
            "{} {} ({} in backlog, Ctrl-C to stop)",
            style("Watching").green().bold(),
            topic,
            reply.annotations.len()
        );
    }
    if !reply.annotations.is_empty() {
        println!("{}", annotation_list(&reply.annotations, format));
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Some(ChannelEvent::Message { event, payload }) if event == NEW_ANNOTATION => {
                    match serde_json::from_value::<Annotation>(payload) {
                        Ok(ann) => {
                            session.acknowledge(&ann);
                            println!("{}", annotation_line(&ann, format));
                        }
                        Err(e) => warn!(error = %e, "Malformed annotation"),
                    }
                }
                Some(ChannelEvent::Message { event, .. }) => debug!(event = %event, "Ignoring event"),
                Some(ChannelEvent::Closed { reason }) => {
                    warn!(reason = %reason, connected = socket.is_connected(), "Channel closed");
                    break;
                }
                None => break,
            }
        }
    }

    if let Err(e) = channel.leave().await {
        debug!(error = %e, "Leave failed");
    }
    if let Some(id) = session.last_seen_id() {
        info!(last_seen_id = id, "Resume with --last-seen-id {}", id);
    }
    Ok(())
}

/// Push one annotation and print it as stored by the server
pub async fn post(
    config: &WidgetConfig,
    url: &str,
    video_id: &str,
    at: u64,
    body: &str,
    format: &str,
) -> anyhow::Result<()> {
    let format = OutputFormat::from(format);
    let socket = PhoenixSocket::new(url, config)?;
    socket.connect().await?;

    let topic = config.topic_for(video_id);
    let channel = socket.channel(&topic);
    let mut events = channel.events().context("event stream already taken")?;
    channel.join(&JoinParams::default()).await?;

    let payload = serde_json::to_value(NewAnnotation {
        body: body.to_string(),
        at,
    })?;
    channel.push(NEW_ANNOTATION, payload).await?;

    // the broadcast echo carries the stored id and username
    let echo = tokio::time::timeout(Duration::from_millis(config.reply_timeout_ms), async {
        while let Some(event) = events.recv().await {
            if let ChannelEvent::Message { event, payload } = event {
                if event != NEW_ANNOTATION {
                    continue;
                }
                if let Ok(ann) = serde_json::from_value::<Annotation>(payload) {
                    if ann.body == body && ann.at == at {
                        return Some(ann);
                    }
                }
            }
        }
        None
    })
    .await
    .ok()
    .flatten();

    match echo {
        Some(ann) => println!("{}", annotation_line(&ann, format)),
        None => warn!(topic = %topic, "Posted, but no broadcast echo arrived"),
    }

    if let Err(e) = channel.leave().await {
        debug!(error = %e, "Leave failed");
    }
    Ok(())
}

/// Prints revealed annotations, driving a progress bar in text mode
struct ConsoleView {
    format: OutputFormat,
    progress: Option<ProgressBar>,
    revealed: AtomicUsize,
}

impl ConsoleView {
    fn new(format: OutputFormat, total: usize) -> Self {
        let progress = (format != OutputFormat::Json).then(|| {
            let bar = ProgressBar::new(total as u64);
            if let Ok(style) = ProgressStyle::with_template("{spinner} {pos}/{len} revealed {msg}") {
                bar.set_style(style);
            }
            bar
        });
        Self {
            format,
            progress,
            revealed: AtomicUsize::new(0),
        }
    }

    fn revealed(&self) -> usize {
        self.revealed.load(Ordering::SeqCst)
    }

    fn finish(&self) {
        if let Some(bar) = &self.progress {
            bar.finish_and_clear();
        }
    }
}

impl AnnotationView for ConsoleView {
    fn append(&self, annotation: &Annotation, _html: &str) {
        self.revealed.fetch_add(1, Ordering::SeqCst);
        let line = annotation_line(annotation, self.format);
        match &self.progress {
            Some(bar) => {
                bar.println(line);
                bar.inc(1);
            }
            None => println!("{line}"),
        }
    }

    fn clear_input(&self) {}
}

/// Reveal a saved backlog against a simulated player
pub async fn replay(
    config: &WidgetConfig,
    path: &Path,
    speed: f64,
    start: u64,
    format: &str,
) -> anyhow::Result<()> {
    anyhow::ensure!(speed.is_finite() && speed > 0.0, "speed must be positive");
    let format = OutputFormat::from(format);
    let backlog = load_backlog(path)?;
    let total = backlog.len();

    let media = MediaRef {
        container_id: "replay".to_string(),
        player_media_id: "replay".to_string(),
        media_id: "replay".to_string(),
    };
    let hub = MemoryHub::new("replay");
    // every annotation in the file has to come back in the join reply
    hub.set_backlog_limit(None);
    hub.seed(&config.topic_for(&media.media_id), backlog);

    let player = Arc::new(SimulatedPlayer::playing(speed));
    player.seek_to(start);

    let view = Arc::new(ConsoleView::new(format, total));
    info!(annotations = total, speed, "Replaying backlog");

    let handle = AnnotationController::initialize(
        config.clone(),
        &hub,
        Some(media),
        view.clone(),
        move |_| async move { Ok(player as SharedPlayer) },
    )
    .await?
    .context("replay widget did not start")?;

    let mut check = tokio::time::interval(Duration::from_millis(config.reveal_interval_ms));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = check.tick() => {
                if view.revealed() >= total {
                    break;
                }
            }
        }
    }

    handle.shutdown().await?;
    view.finish();
    info!(revealed = view.revealed(), total, "Replay finished");
    Ok(())
}

/// Print a saved backlog in playback order
pub fn show(path: &Path, format: &str) -> anyhow::Result<()> {
    let mut backlog = load_backlog(path)?;
    backlog.sort_by_key(|ann| (ann.at, ann.id));
    println!("{}", annotation_list(&backlog, OutputFormat::from(format)));
    Ok(())
}

/// Print the effective configuration
pub fn show_config(config: &WidgetConfig, format: &str) -> anyhow::Result<()> {
    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", format_output(config, OutputFormat::Json)),
        OutputFormat::Text | OutputFormat::Table => print!("{}", toml::to_string_pretty(config)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_position() {
        assert_eq!(parse_position("1500").unwrap(), 1500);
        assert_eq!(parse_position("01:05").unwrap(), 65_000);
        assert_eq!(parse_position("1:02:03").unwrap(), 3_723_000);
        assert!(parse_position("1:75").is_err());
        assert!(parse_position("a:b").is_err());
        assert!(parse_position("1:2:3:4").is_err());
    }

    #[test]
    fn test_parse_position_overflow() {
        assert!(parse_position("18446744073709551615:00:00").is_err());
        assert!(parse_position("18446744073709551:00").is_err());
        assert!(parse_position("18446744073709551615").is_ok());
    }

    fn backlog_file(ids: impl IntoIterator<Item = u64>) -> tempfile::NamedTempFile {
        let backlog: Vec<Annotation> = ids
            .into_iter()
            .map(|id| Annotation::new(id, "u", format!("#{id}"), 0))
            .collect();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::to_string(&backlog).unwrap()).unwrap();
        file
    }

    fn fast_config() -> WidgetConfig {
        WidgetConfig {
            reveal_interval_ms: 10,
            ..WidgetConfig::default()
        }
    }

    #[tokio::test]
    async fn test_replay_reveals_id_zero() {
        let file = backlog_file([0, 1]);
        let replayed = tokio::time::timeout(
            Duration::from_secs(5),
            replay(&fast_config(), file.path(), 100.0, 0, "json"),
        )
        .await;
        assert!(matches!(replayed, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_replay_reveals_large_backlog() {
        let file = backlog_file(1..=201);
        let replayed = tokio::time::timeout(
            Duration::from_secs(5),
            replay(&fast_config(), file.path(), 100.0, 0, "json"),
        )
        .await;
        assert!(matches!(replayed, Ok(Ok(()))));
    }

    #[test]
    fn test_load_backlog_accepts_list_and_reply() {
        let mut list = tempfile::NamedTempFile::new().unwrap();
        write!(
            list,
            r#"[{{"id":1,"body":"a","at":10,"user":{{"username":"u"}}}}]"#
        )
        .unwrap();
        assert_eq!(load_backlog(list.path()).unwrap().len(), 1);

        let mut reply = tempfile::NamedTempFile::new().unwrap();
        write!(
            reply,
            r#"{{"annotations":[{{"id":1,"body":"a","at":10,"user":{{"username":"u"}}}},{{"id":2,"body":"b","at":5,"user":{{"username":"v"}}}}]}}"#
        )
        .unwrap();
        let backlog = load_backlog(reply.path()).unwrap();
        assert_eq!(backlog.iter().map(|a| a.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_load_config_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "topic_prefix = \"clips\"\nreveal_interval_ms = 250").unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.topic_prefix, "clips");
        assert_eq!(config.reveal_interval_ms, 250);
        assert_eq!(config.container_id, "msg-container");
    }

    #[test]
    fn test_load_config_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "reveal_interval_ms = 0").unwrap();
        assert!(load_config(Some(file.path())).is_err());
        assert_eq!(load_config(None).unwrap(), WidgetConfig::default());
    }
}
