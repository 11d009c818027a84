use anyhow::Result;
use chrono::{NaiveTime, Timelike};
use colored::Colorize;
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use showclock::prelude::*;
use showclock::{ENGINE_NAME, VERSION as LIB_VERSION};
use std::borrow::Cow;
use std::collections::HashMap;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Commands forwarded to the engine as-is.
const CONTROL_COMMANDS: &[&str] = &[
    "start", "play", "pause", "stop", "unload", "roll", "next", "previous", "prev", "reload",
    "go", "startnext", "load", "delay", "adddelay", "add-delay",
];

/// A custom helper struct for rustyline that highlights the command word.
#[derive(Completer, Helper, Hinter, Validator)]
struct ShellHighlighter;

impl Highlighter for ShellHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            Cow::Owned(format!("{} {}", command.yellow().bold(), rest.yellow()))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    let rule = "-".repeat(72);
    println!("{}", rule.dimmed());
    println!("{}", "  SHOWSHELL  ::  operator console".cyan().bold());
    println!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    let license_blurb = "
    This software is provided 'as is', without warranty of any kind.
    Distributed under the MIT OR Apache-2.0 license. Use at your own risk.
    ";
    println!("{}", license_blurb.dimmed());
    println!("{}", rule.dimmed());
}

/// Spawns tasks printing the engine's streams. The snapshot printer is
/// switched with `watch on|off`.
fn spawn_event_listeners(engine: &ShowclockEngine, is_watching: Arc<AtomicBool>) {
    let mut system_rx = engine.subscribe_system_events();
    tokio::spawn(async move {
        while let Ok(event) = system_rx.recv().await {
            if let SystemEvent::CommandRejected { command, reason } = &event {
                println!("<-- [REJECTED] {} ({})", command, reason.red());
            } else {
                println!("<-- [SYSTEM EVENT] {:?}", event);
            }
        }
    });

    let mut snapshot_rx = engine.subscribe_snapshots();
    tokio::spawn(async move {
        while let Ok(snapshot) = snapshot_rx.recv().await {
            if is_watching.load(Ordering::Relaxed) {
                println!("<-- {}", describe(&snapshot));
            }
        }
    });
}

fn describe(snapshot: &PlaybackSnapshot) -> String {
    let remaining = format_millis(snapshot.remaining_ms);
    let remaining = if snapshot.overtime {
        remaining.red().bold()
    } else {
        remaining.green()
    };
    let position = match snapshot.selected_index {
        Some(index) => format!("{}/{}", index + 1, snapshot.playable_count),
        None => format!("-/{}", snapshot.playable_count),
    };
    format!(
        "[{}] {} {} elapsed {} remaining {} (+{})",
        snapshot.phase.to_string().cyan(),
        snapshot
            .selected_event_id
            .as_ref()
            .map(EntryId::as_str)
            .unwrap_or("-"),
        position.dimmed(),
        format_millis(snapshot.elapsed_ms),
        remaining,
        format_millis(snapshot.added_delay_ms),
    )
}

/// Parses `HH:MM` or `HH:MM:SS` into milliseconds since midnight.
fn parse_time_of_day(text: &str) -> Option<Millis> {
    let time = NaiveTime::parse_from_str(text, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .ok()?;
    Some(Millis::from(time.num_seconds_from_midnight()) * 1_000)
}

/// Parses a signed duration in minutes, e.g. `5`, `-2`, `1.5`.
fn parse_minutes(text: &str) -> Option<Millis> {
    let minutes: f64 = text.parse().ok()?;
    minutes
        .is_finite()
        .then(|| (minutes * 60_000.0).round() as Millis)
}

async fn add_entry(store: &RundownStore, args: &[&str]) -> Result<()> {
    let entry: RundownEntry = match args {
        ["event", id, start, end, title @ ..] => {
            let (Some(start), Some(end)) = (parse_time_of_day(start), parse_time_of_day(end))
            else {
                anyhow::bail!("times must be HH:MM or HH:MM:SS");
            };
            let title = if title.is_empty() {
                id.to_string()
            } else {
                title.join(" ")
            };
            ShowEvent::new(*id, title, start, end).into()
        }
        ["delay", id, minutes] => {
            let Some(duration) = parse_minutes(minutes) else {
                anyhow::bail!("'{minutes}' is not a number of minutes");
            };
            DelayEntry::new(*id, duration).into()
        }
        ["block", id, title @ ..] => BlockEntry::new(*id, title.join(" ")).into(),
        _ => anyhow::bail!(
            "Usage: add event <ID> <START> <END> [TITLE] | add delay <ID> <MIN> | add block <ID> [TITLE]"
        ),
    };
    let change = store.insert(entry, None).await?;
    println!("--> Added {} at position {}.", change.affected_id, change.position);
    Ok(())
}

async fn toggle_skip(store: &RundownStore, id: &str) -> Result<()> {
    let rundown = store.snapshot().await;
    let Some(index) = rundown.position(&EntryId::from(id)) else {
        anyhow::bail!("no entry '{id}'");
    };
    let Some(RundownEntry::Event(event)) = rundown.get(index) else {
        anyhow::bail!("'{id}' is not an event");
    };
    let mut event = event.clone();
    event.skip = !event.skip;
    let skip = event.skip;
    store.update(event.into()).await?;
    println!("--> '{}' is now {}.", id, if skip { "skipped" } else { "playable" });
    Ok(())
}

async fn print_rundown(store: &RundownStore) {
    let rundown = store.snapshot().await;
    if rundown.is_empty() {
        println!("Rundown is empty. Use 'add' to build one.");
        return;
    }
    for (index, entry) in rundown.entries().iter().enumerate() {
        let line = match entry {
            RundownEntry::Event(event) => {
                let text = format!(
                    "{:>3}  {}  {} - {}  {}",
                    index,
                    event.id,
                    format_millis(event.time_start),
                    format_millis(event.time_end),
                    event.title
                );
                if event.skip {
                    text.dimmed().strikethrough().to_string()
                } else {
                    text
                }
            }
            RundownEntry::Delay(delay) => format!(
                "{:>3}  {}  delay {}",
                index,
                delay.id,
                format_millis(delay.duration)
            )
            .yellow()
            .to_string(),
            RundownEntry::Block(block) => {
                format!("{:>3}  {}  == {} ==", index, block.id, block.title)
                    .blue()
                    .to_string()
            }
        };
        println!("{line}");
    }
}

fn print_help() {
    println!("Playback commands:");
    println!("  load <ID> | start | pause | stop | next | previous | reload | go | roll");
    println!("  delay <MS>            - Adds ad hoc time to the running event.");
    println!("Rundown commands:");
    println!("  add event <ID> <START> <END> [TITLE]  - Times as HH:MM or HH:MM:SS.");
    println!("  add delay <ID> <MINUTES>              - Shifts every later event.");
    println!("  add block <ID> [TITLE]");
    println!("  remove <ID> | skip <ID> | move <ID> [AFTER_ID] | list");
    println!("Observing:");
    println!("  status                - Prints the latest snapshot.");
    println!("  watch on|off          - Streams snapshots as they are published.");
    println!("  hook <CYCLE>          - Prints whenever the timer crosses a lifecycle point.");
    println!("  unhook <H>            - Removes a hook by its handle.");
    println!("  exit                  - Quits the shell.");
}

fn parse_cycle(name: &str) -> Option<TimerLifecycle> {
    match name.to_ascii_lowercase().trim_start_matches("on") {
        "load" => Some(TimerLifecycle::OnLoad),
        "start" => Some(TimerLifecycle::OnStart),
        "pause" => Some(TimerLifecycle::OnPause),
        "stop" => Some(TimerLifecycle::OnStop),
        "update" => Some(TimerLifecycle::OnUpdate),
        "finish" => Some(TimerLifecycle::OnFinish),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let config = ShowclockConfig::load(Some("showclock"))?;
    let store = Arc::new(RundownStore::new(Rundown::default()));
    let engine = ShowclockEngine::new(config, store.clone());
    let engine_handle = engine.clone();

    let is_watching = Arc::new(AtomicBool::new(false));
    spawn_event_listeners(&engine_handle, is_watching.clone());

    info!("Spawning {} in the background...", ENGINE_NAME.cyan());
    tokio::spawn(async move {
        if let Err(e) = engine.run().await {
            eprintln!("\nEngine stopped with an error: {}", e);
        }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    // Shell-side handles for lifecycle hooks.
    let mut active_hooks: HashMap<usize, ListenerId> = HashMap::new();
    let mut next_handle: usize = 0;

    let mut rl = Editor::new()?;
    rl.set_helper(Some(ShellHighlighter));

    println!(
        "{} is running. Type 'help' for commands or 'exit' to quit.",
        ENGINE_NAME.cyan()
    );

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(_) => {
                println!("Exiting showshell...");
                break;
            }
        };
        rl.add_history_entry(line.as_str())?;
        let args = line.split_whitespace().collect::<Vec<_>>();
        let Some(command) = args.first() else {
            continue;
        };

        match *command {
            c if CONTROL_COMMANDS.contains(&c.to_ascii_lowercase().as_str()) => {
                match engine_handle.dispatch_message(line.trim()).await {
                    Ok(transition) if transition.changed => {
                        println!("--> {}", describe(&transition.snapshot))
                    }
                    Ok(_) => println!("--> Nothing to change."),
                    Err(reason) => println!("--> {}", reason.to_string().red()),
                }
            }
            "add" => {
                if let Err(e) = add_entry(&store, &args[1..]).await {
                    println!("Error: {e}");
                }
            }
            "remove" => match args.get(1) {
                Some(id) => match store.remove(&EntryId::from(*id)).await {
                    Ok(_) => println!("--> Removed '{}'.", id),
                    Err(e) => println!("Error: {e}"),
                },
                None => println!("Usage: remove <ID>"),
            },
            "skip" => match args.get(1) {
                Some(id) => {
                    if let Err(e) = toggle_skip(&store, id).await {
                        println!("Error: {e}");
                    }
                }
                None => println!("Usage: skip <ID>"),
            },
            "move" => match args.get(1) {
                Some(id) => {
                    let after = args.get(2).map(|after| EntryId::from(*after));
                    match store.reorder(&EntryId::from(*id), after.as_ref()).await {
                        Ok(change) => println!("--> Moved '{}' to position {}.", id, change.position),
                        Err(e) => println!("Error: {e}"),
                    }
                }
                None => println!("Usage: move <ID> [AFTER_ID]"),
            },
            "list" => print_rundown(&store).await,
            "status" => println!("{}", describe(&engine_handle.latest_snapshot())),
            "watch" => match args.get(1) {
                Some(&"on") => {
                    is_watching.store(true, Ordering::Relaxed);
                    println!("--> Streaming snapshots.");
                }
                Some(&"off") => {
                    is_watching.store(false, Ordering::Relaxed);
                    println!("--> Stopped streaming snapshots.");
                }
                _ => println!("Usage: watch on|off"),
            },
            "hook" => match args.get(1).and_then(|name| parse_cycle(name)) {
                Some(cycle) => {
                    let listener_id = engine_handle
                        .on_lifecycle(cycle, move |snapshot| {
                            println!("<-- [HOOK {:?}] {}", cycle, describe(snapshot));
                        })
                        .await;
                    let handle = next_handle;
                    active_hooks.insert(handle, listener_id);
                    next_handle += 1;
                    println!("--> Added {:?} hook with handle: #{}", cycle, handle);
                }
                None => println!("Usage: hook load|start|pause|stop|update|finish"),
            },
            "unhook" => match args.get(1).and_then(|h| h.parse::<usize>().ok()) {
                Some(handle) => match active_hooks.remove(&handle) {
                    Some(id) => {
                        if engine_handle.remove_lifecycle_listener(id).await {
                            println!("--> Hook successfully removed.");
                        } else {
                            println!("--> Error: Hook not found in engine.");
                        }
                    }
                    None => println!("Error: Invalid handle #{}.", handle),
                },
                None => println!("Usage: unhook <HANDLE>"),
            },
            "help" => print_help(),
            "exit" => break,
            _ => println!("Unknown command: '{}'. Type 'help'.", line),
        }
    }

    Ok(())
}
