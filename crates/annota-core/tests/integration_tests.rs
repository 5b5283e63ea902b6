//! Integration tests for Annota Core

use annota_core::{
    AnnotationController, Annotation, ControllerHandle, ControllerState, MediaRef, MemoryHub,
    MemoryView, Player, SharedPlayer, SimulatedPlayer, WidgetConfig,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const TOPIC: &str = "videos:1";

fn media() -> MediaRef {
    MediaRef::from_attributes(
        Some("video".to_string()),
        Some("dQw4w9WgXcQ".to_string()),
        Some("1".to_string()),
    )
    .unwrap()
}

async fn start(
    hub: &MemoryHub,
    player: Arc<SimulatedPlayer>,
    view: Arc<MemoryView>,
) -> ControllerHandle {
    AnnotationController::initialize(
        WidgetConfig::default(),
        hub,
        Some(media()),
        view,
        move |_| async move { Ok(player as SharedPlayer) },
    )
    .await
    .unwrap()
    .expect("widget root present")
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// =============================================================================
// Backlog reveal
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_backlog_revealed_as_playback_advances() {
    let hub = MemoryHub::new("jose");
    hub.seed(
        TOPIC,
        vec![
            Annotation::new(1, "maria", "early", 500),
            Annotation::new(2, "maria", "late", 2500),
        ],
    );
    let player = Arc::new(SimulatedPlayer::playing(1.0));
    let view = Arc::new(MemoryView::new());
    let handle = start(&hub, player, view.clone()).await;

    assert_eq!(handle.state(), ControllerState::Joined);
    assert_eq!(handle.last_seen_id(), Some(2));
    assert!(view.rendered_ids().is_empty());

    // tick 1 at 1000ms
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(view.rendered_ids(), vec![1]);

    // tick 2 at 2000ms
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(view.rendered_ids(), vec![1]);

    // tick 3 at 3000ms
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(view.rendered_ids(), vec![1, 2]);

    // keeps ticking on an empty queue
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(view.rendered_ids(), vec![1, 2]);
    assert_eq!(handle.state(), ControllerState::Joined);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_paused_player_holds_backlog() {
    let hub = MemoryHub::new("jose");
    hub.seed(TOPIC, vec![Annotation::new(1, "maria", "at zero", 0), Annotation::new(2, "maria", "later", 4000)]);
    let player = Arc::new(SimulatedPlayer::new());
    let view = Arc::new(MemoryView::new());
    let handle = start(&hub, player.clone(), view.clone()).await;

    tokio::time::sleep(Duration::from_millis(10_100)).await;
    assert_eq!(view.rendered_ids(), vec![1]);

    player.seek_to(4000);
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(view.rendered_ids(), vec![1, 2]);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_empty_backlog_keeps_last_seen_unset() {
    let hub = MemoryHub::new("jose");
    let view = Arc::new(MemoryView::new());
    let handle = start(&hub, Arc::new(SimulatedPlayer::playing(1.0)), view.clone()).await;

    assert_eq!(handle.last_seen_id(), None);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(view.rendered_ids().is_empty());
    assert_eq!(handle.state(), ControllerState::Joined);

    handle.shutdown().await.unwrap();
}

// =============================================================================
// Live events and submits
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_live_annotation_rendered_once_and_acknowledged() {
    let hub = MemoryHub::new("jose");
    hub.seed(TOPIC, vec![Annotation::new(3, "maria", "backlog", 60_000)]);
    let view = Arc::new(MemoryView::new());
    let handle = start(&hub, Arc::new(SimulatedPlayer::playing(1.0)), view.clone()).await;
    assert_eq!(handle.last_seen_id(), Some(3));

    let live = hub.as_user("ana").publish(TOPIC, "ana", "<script>alert(1)</script>", 90_000);
    settle().await;

    assert_eq!(view.rendered_ids(), vec![live.id]);
    assert_eq!(handle.last_seen_id(), Some(live.id));
    let html = &view.entries()[0].html;
    assert!(html.contains("&lt;script&gt;"));
    assert!(!html.contains("<script>"));
    assert!(html.contains("[01:30]"));

    // backlog entry comes out of the reveal path only
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(view.rendered_ids(), vec![live.id, 3]);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_submit_stamps_player_time_and_clears_input() {
    let hub = MemoryHub::new("jose");
    let player = Arc::new(SimulatedPlayer::new());
    player.seek_to(65_000);
    let view = Arc::new(MemoryView::new());
    let handle = start(&hub, player, view.clone()).await;

    handle.submit("great scene");
    settle().await;

    assert_eq!(view.input_clears(), 1);
    let stored = hub.annotations(TOPIC);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].at, 65_000);
    assert_eq!(stored[0].user.username, "jose");

    // broadcast back to the submitter, rendered exactly once
    assert_eq!(view.rendered_ids(), vec![stored[0].id]);
    assert!(view.entries()[0].html.contains("[01:05]"));
    assert_eq!(handle.last_seen_id(), Some(stored[0].id));

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_rejected_push_still_clears_input() {
    let hub = MemoryHub::new("jose");
    hub.reject_pushes(json!({"errors": {"video": ["is locked"]}}));
    let view = Arc::new(MemoryView::new());
    let handle = start(&hub, Arc::new(SimulatedPlayer::new()), view.clone()).await;

    handle.submit("won't land");
    handle.submit("");
    settle().await;

    assert_eq!(view.input_clears(), 2);
    assert!(hub.annotations(TOPIC).is_empty());
    assert!(view.rendered_ids().is_empty());
    assert_eq!(handle.state(), ControllerState::Joined);

    handle.shutdown().await.unwrap();
}

// =============================================================================
// Seeking
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_list_click_seeks_player() {
    let hub = MemoryHub::new("jose");
    let player = Arc::new(SimulatedPlayer::new());
    let view = Arc::new(MemoryView::new());
    let handle = start(&hub, player.clone(), view).await;

    handle.click(Some("42000"), None);
    handle.click(None, Some("1500"));
    handle.click(None, None);
    handle.click(Some("not-a-number"), None);
    settle().await;

    assert_eq!(player.seeks(), vec![42_000, 1500]);
    assert_eq!(player.current_time_millis(), 1500);

    handle.shutdown().await.unwrap();
}

// =============================================================================
// Failures and teardown
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_join_failure_leaves_controller_inert() {
    let hub = MemoryHub::new("jose");
    hub.seed(TOPIC, vec![Annotation::new(1, "maria", "hidden", 0)]);
    hub.reject_joins(json!({"reason": "unauthorized"}));
    let player = Arc::new(SimulatedPlayer::playing(1.0));
    let view = Arc::new(MemoryView::new());
    let handle = start(&hub, player.clone(), view.clone()).await;

    assert_eq!(handle.state(), ControllerState::Inert);
    assert_eq!(handle.last_seen_id(), None);

    handle.submit("anyone?");
    handle.click(Some("3000"), None);
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert!(view.rendered_ids().is_empty());
    assert_eq!(view.input_clears(), 1);
    assert_eq!(hub.annotations(TOPIC).len(), 1);
    assert_eq!(player.seeks(), vec![3000]);

    let mut state = handle.subscribe_state();
    handle.shutdown().await.unwrap();
    assert_eq!(*state.borrow_and_update(), ControllerState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_reveal_and_leaves_channel() {
    let hub = MemoryHub::new("jose");
    hub.seed(TOPIC, vec![Annotation::new(1, "maria", "never shown", 5000)]);
    let view = Arc::new(MemoryView::new());
    let handle = start(&hub, Arc::new(SimulatedPlayer::playing(1.0)), view.clone()).await;
    assert_eq!(hub.subscriber_count(TOPIC), 1);

    let state = handle.subscribe_state();
    handle.shutdown().await.unwrap();

    assert_eq!(*state.borrow(), ControllerState::Closed);
    assert_eq!(hub.subscriber_count(TOPIC), 0);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(view.rendered_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_channel_close_keeps_reveal_running() {
    let hub = MemoryHub::new("jose");
    hub.seed(TOPIC, vec![Annotation::new(1, "maria", "still shown", 1500)]);
    let view = Arc::new(MemoryView::new());
    let handle = start(&hub, Arc::new(SimulatedPlayer::playing(1.0)), view.clone()).await;

    hub.close_topic(TOPIC, "server restart");
    tokio::time::sleep(Duration::from_millis(2100)).await;

    assert_eq!(view.rendered_ids(), vec![1]);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_invalid_config_rejected_before_connect() {
    let hub = MemoryHub::new("jose");
    let config = WidgetConfig {
        reveal_interval_ms: 0,
        ..Default::default()
    };
    let result = AnnotationController::initialize(
        config,
        &hub,
        Some(media()),
        Arc::new(MemoryView::new()),
        |_| async { Ok(Arc::new(SimulatedPlayer::new()) as SharedPlayer) },
    )
    .await;

    assert!(result.is_err());
    assert_eq!(hub.connections(), 0);
}
