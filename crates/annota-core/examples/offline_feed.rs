//! Offline feed example
//!
//! Runs the controller against an in-memory hub and a simulated player
//! playing at 10x, printing annotations as they are revealed.
//!
//! Run with: cargo run -p annota-core --example offline_feed

use annota_core::render::render_annotation_text;
use annota_core::{
    Annotation, AnnotationController, AnnotationView, MediaRef, MemoryHub, SharedPlayer,
    SimulatedPlayer, WidgetConfig,
};
use std::sync::Arc;
use std::time::Duration;

struct StdoutView;

impl AnnotationView for StdoutView {
    fn append(&self, annotation: &Annotation, _html: &str) {
        println!("{}", render_annotation_text(annotation));
    }

    fn clear_input(&self) {}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let hub = MemoryHub::new("viewer");
    hub.seed(
        "videos:1",
        vec![
            Annotation::new(1, "maria", "Intro starts", 2_000),
            Annotation::new(2, "jose", "Watch the left corner", 15_000),
            Annotation::new(3, "ana", "Best part", 31_000),
        ],
    );

    let media = MediaRef::from_attributes(
        Some("video".into()),
        Some("dQw4w9WgXcQ".into()),
        Some("1".into()),
    );

    let player = Arc::new(SimulatedPlayer::playing(10.0));
    let handle = AnnotationController::initialize(
        WidgetConfig::default(),
        &hub,
        media,
        Arc::new(StdoutView),
        move |_| async move { Ok(player as SharedPlayer) },
    )
    .await?;

    if let Some(handle) = handle {
        tokio::time::sleep(Duration::from_secs(2)).await;
        hub.as_user("maria").publish("videos:1", "maria", "live from another tab", 25_000);
        tokio::time::sleep(Duration::from_secs(2)).await;
        handle.shutdown().await?;
    }

    Ok(())
}
