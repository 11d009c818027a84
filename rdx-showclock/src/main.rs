use anyhow::Result;
use colored::Colorize;
use showclock::prelude::*;
use showclock::time::{SystemTimeSource, TimeSource};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging. RUST_LOG overrides the default level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // 2. Load configuration from `showclock.toml` (optional) and SHOWCLOCK__* variables.
    let config = ShowclockConfig::load(Some("showclock"))?;
    info!("{} v{} in {}", showclock::ENGINE_NAME, showclock::VERSION, config.timezone);

    // 3. Build a rundown around the current time of day so roll mode has
    //    something to follow.
    let now = SystemTimeSource::new(config.timezone).wall_ms();
    let store = Arc::new(RundownStore::new(demo_rundown(now)));

    // 4. Create the engine.
    let engine = ShowclockEngine::new(config, store);

    // 5. Spawn concurrent tasks to listen to the engine's streams.
    spawn_event_listeners(&engine);

    // 6. Register lifecycle hooks.
    register_lifecycle_hooks(&engine).await;

    // 7. Put the engine into roll once it is up.
    let roller = engine.clone();
    tokio::spawn(async move {
        while !roller.is_running() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        if let Err(reason) = roller.dispatch_message("roll").await {
            warn!("Could not roll: {reason}");
        }
    });

    // 8. Run the engine.
    engine.run().await?;

    Ok(())
}

/// A short show that started a minute ago, with a delay in the middle.
fn demo_rundown(now: Millis) -> Rundown {
    let minute = 60_000;
    let start = (now - minute).max(0);
    let mut keynote =
        ShowEvent::new("keynote", "Keynote", start + 2 * minute, start + 10 * minute);
    keynote.presenter = "A. Speaker".to_string();
    vec![
        RundownEntry::from(BlockEntry::new("doors", "Doors")),
        RundownEntry::from(ShowEvent::new(
            "welcome",
            "Welcome",
            start,
            start + 2 * minute,
        )),
        RundownEntry::from(DelayEntry::new("late-start", 30_000)),
        RundownEntry::from(keynote),
        RundownEntry::from(
            ShowEvent::new("break", "Break", start + 10 * minute, start + 25 * minute).skipped(),
        ),
        RundownEntry::from(ShowEvent::new(
            "panel",
            "Panel",
            start + 25 * minute,
            start + 55 * minute,
        )),
    ]
    .into_iter()
    .collect()
}

/// Spawns tasks, each subscribing to a different event stream from the engine.
fn spawn_event_listeners(engine: &ShowclockEngine) {
    let mut system_rx = engine.subscribe_system_events();
    tokio::spawn(async move {
        while let Ok(event) = system_rx.recv().await {
            info!("[SYSTEM] => {:?}", event);
        }
    });

    let mut snapshot_rx = engine.subscribe_snapshots();
    tokio::spawn(async move {
        while let Ok(snapshot) = snapshot_rx.recv().await {
            let remaining = format_millis(snapshot.remaining_ms);
            let remaining = if snapshot.overtime {
                remaining.red().bold()
            } else {
                remaining.green()
            };
            info!(
                "[CLOCK] => {} {} {}",
                snapshot.phase.to_string().cyan(),
                snapshot
                    .selected_event_id
                    .as_ref()
                    .map(EntryId::as_str)
                    .unwrap_or("-"),
                remaining
            );
        }
    });
}

async fn register_lifecycle_hooks(engine: &ShowclockEngine) {
    let _load_id = engine
        .on_lifecycle(TimerLifecycle::OnLoad, |snapshot| {
            info!("[LIFECYCLE] => Loaded {:?}", snapshot.selected_event_id);
        })
        .await;

    let _finish_id = engine
        .on_lifecycle(TimerLifecycle::OnFinish, |snapshot| {
            warn!("[LIFECYCLE] => {:?} ran out of time", snapshot.selected_event_id);
        })
        .await;
}
