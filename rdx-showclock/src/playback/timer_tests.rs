//! Tests for the timer state machine, driven through the dispatcher with a
//! hand-cranked clock.

use std::sync::Arc;

use super::{Command, CommandDispatcher, Phase};
use crate::common::{EntryId, Millis, DAY_MS};
use crate::error::RejectedCommand;
use crate::events::TimerLifecycle;
use crate::rundown::{
    BlockEntry, ChangeKind, DelayEntry, Rundown, RundownChange, RundownEntry, ShowEvent,
};
use crate::time::{ManualTimeSource, MonotonicClock};

fn dispatcher_at(entries: Vec<RundownEntry>, wall: Millis) -> (CommandDispatcher, ManualTimeSource) {
    let time = ManualTimeSource::new(0, wall);
    let clock = MonotonicClock::new(Arc::new(time.clone()));
    let dispatcher = CommandDispatcher::new(clock, Arc::new(Rundown::new(entries)));
    (dispatcher, time)
}

/// `[Event A: 0–5000], [Delay +2000], [Event B: 5000–8000]`
fn example_rundown() -> Vec<RundownEntry> {
    vec![
        ShowEvent::new("a", "A", 0, 5_000).into(),
        DelayEntry::new("d", 2_000).into(),
        ShowEvent::new("b", "B", 5_000, 8_000).into(),
    ]
}

fn three_events() -> Vec<RundownEntry> {
    vec![
        BlockEntry::new("top", "Top of show").into(),
        ShowEvent::new("a", "A", 0, 10_000).into(),
        ShowEvent::new("b", "B", 10_000, 20_000).into(),
        ShowEvent::new("c", "C", 20_000, 30_000).into(),
    ]
}

fn load(id: &str) -> Command {
    Command::Load(EntryId::from(id))
}

fn selected(dispatcher: &CommandDispatcher) -> Option<&str> {
    dispatcher.state().selected_event_id.as_ref().map(EntryId::as_str)
}

#[test]
fn pause_and_resume_accumulate_without_losing_time() {
    let (mut dispatcher, time) = dispatcher_at(three_events(), 0);
    dispatcher.dispatch(load("a")).expect("load");
    dispatcher.dispatch(Command::Start).expect("start");
    time.advance(1_200);
    dispatcher.dispatch(Command::Pause).expect("pause");

    time.advance(5_000);
    assert_eq!(dispatcher.snapshot().elapsed_ms, 1_200);

    dispatcher.dispatch(Command::Start).expect("resume");
    time.advance(800);
    let snapshot = dispatcher.tick().snapshot;
    assert_eq!(snapshot.elapsed_ms, 2_000);
    assert_eq!(snapshot.remaining_ms, 8_000);
    assert_eq!(snapshot.phase, Phase::Playing);
}

#[test]
fn worked_example_overtime_then_next_lands_on_delayed_event() {
    let (mut dispatcher, time) = dispatcher_at(example_rundown(), 0);
    dispatcher.dispatch(load("a")).expect("load");
    dispatcher.dispatch(Command::Start).expect("start");

    time.advance(5_000);
    let on_boundary = dispatcher.tick();
    assert_eq!(on_boundary.snapshot.remaining_ms, 0);
    assert!(!on_boundary.snapshot.overtime);
    assert!(!on_boundary.lifecycle.contains(&TimerLifecycle::OnFinish));

    time.advance(250);
    let beyond = dispatcher.tick();
    assert_eq!(beyond.snapshot.remaining_ms, -250);
    assert!(beyond.snapshot.overtime);
    assert_eq!(beyond.snapshot.phase, Phase::Playing);
    assert!(beyond.lifecycle.contains(&TimerLifecycle::OnFinish));

    // Overtime is reported once, not on every tick.
    time.advance(1_000);
    assert!(!dispatcher.tick().lifecycle.contains(&TimerLifecycle::OnFinish));

    let next = dispatcher.dispatch(Command::Next).expect("next");
    assert_eq!(selected(&dispatcher), Some("b"));
    assert_eq!(next.snapshot.phase, Phase::Armed);
    let timing = next.snapshot.timing.expect("timing of b");
    assert_eq!((timing.start, timing.end), (7_000, 10_000));
    assert_eq!(next.snapshot.elapsed_ms, 0);
}

#[test]
fn remaining_goes_negative_exactly_past_duration_plus_added_delay() {
    let (mut dispatcher, time) = dispatcher_at(three_events(), 0);
    dispatcher.dispatch(load("a")).expect("load");
    dispatcher.dispatch(Command::Start).expect("start");
    dispatcher.dispatch(Command::AddDelay(3_000)).expect("add delay");

    time.advance(13_000);
    assert_eq!(dispatcher.tick().snapshot.remaining_ms, 0);
    time.advance(1);
    let snapshot = dispatcher.tick().snapshot;
    assert_eq!(snapshot.remaining_ms, -1);
    assert_eq!(snapshot.phase, Phase::Playing);
    assert_eq!(snapshot.added_delay_ms, 3_000);
}

#[test]
fn added_delay_clears_overtime_latch() {
    let (mut dispatcher, time) = dispatcher_at(three_events(), 0);
    dispatcher.dispatch(load("a")).expect("load");
    dispatcher.dispatch(Command::Start).expect("start");
    time.advance(11_000);
    assert!(dispatcher.tick().lifecycle.contains(&TimerLifecycle::OnFinish));

    dispatcher.dispatch(Command::AddDelay(5_000)).expect("extend");
    assert!(!dispatcher.snapshot().overtime);

    time.advance(5_000);
    assert!(dispatcher.tick().lifecycle.contains(&TimerLifecycle::OnFinish));
}

#[test]
fn navigation_at_boundaries_is_a_structural_no_op() {
    let (mut dispatcher, _time) = dispatcher_at(three_events(), 0);
    dispatcher.dispatch(load("a")).expect("load");
    dispatcher.dispatch(Command::Start).expect("start");

    let before = dispatcher.state().clone();
    let previous = dispatcher.dispatch(Command::Previous).expect("previous at first");
    assert!(!previous.changed);
    assert_eq!(dispatcher.state(), &before);

    dispatcher.dispatch(Command::Stop).expect("stop");
    dispatcher.dispatch(load("c")).expect("load last");
    let before = dispatcher.state().clone();
    let next = dispatcher.dispatch(Command::Next).expect("next at last");
    assert!(!next.changed);
    assert_eq!(dispatcher.state(), &before);
}

#[test]
fn next_and_previous_skip_blocks_delays_and_skipped_events() {
    let entries = vec![
        ShowEvent::new("a", "A", 0, 1_000).into(),
        BlockEntry::new("blk", "Break").into(),
        ShowEvent::new("s", "Skipped", 1_000, 2_000).skipped().into(),
        DelayEntry::new("d", 500).into(),
        ShowEvent::new("b", "B", 2_000, 3_000).into(),
    ];
    let (mut dispatcher, _time) = dispatcher_at(entries, 0);
    dispatcher.dispatch(load("a")).expect("load");
    dispatcher.dispatch(Command::Next).expect("next");
    assert_eq!(selected(&dispatcher), Some("b"));

    dispatcher.dispatch(Command::Start).expect("start");
    dispatcher.dispatch(Command::Previous).expect("previous");
    assert_eq!(selected(&dispatcher), Some("a"));
    assert_eq!(dispatcher.state().phase, Phase::Armed);
}

#[test]
fn stop_clears_selection_and_elapsed() {
    let (mut dispatcher, time) = dispatcher_at(three_events(), 0);
    dispatcher.dispatch(load("b")).expect("load");
    dispatcher.dispatch(Command::Start).expect("start");
    dispatcher.dispatch(Command::AddDelay(60_000)).expect("delay");
    time.advance(42_000);

    let stopped = dispatcher.dispatch(Command::Stop).expect("stop");
    assert_eq!(stopped.snapshot.phase, Phase::Stopped);
    assert_eq!(stopped.snapshot.selected_event_id, None);
    assert_eq!(stopped.snapshot.elapsed_ms, 0);
    assert_eq!(stopped.snapshot.added_delay_ms, 0);
    assert_eq!(stopped.lifecycle, vec![TimerLifecycle::OnStop]);
}

#[test]
fn start_while_playing_is_idempotent() {
    let (mut dispatcher, time) = dispatcher_at(three_events(), 0);
    dispatcher.dispatch(load("a")).expect("load");
    dispatcher.dispatch(Command::Start).expect("start");
    time.advance(3_000);

    let again = dispatcher.dispatch(Command::Start).expect("second start");
    assert!(!again.changed);
    assert_eq!(again.snapshot.elapsed_ms, 3_000);
}

#[test]
fn reload_resets_timing_and_keeps_selection() {
    let (mut dispatcher, time) = dispatcher_at(three_events(), 0);
    dispatcher.dispatch(load("b")).expect("load");
    dispatcher.dispatch(Command::Start).expect("start");
    dispatcher.dispatch(Command::AddDelay(2_000)).expect("delay");
    time.advance(4_000);

    let reloaded = dispatcher.dispatch(Command::Reload).expect("reload");
    assert!(reloaded.changed);
    assert_eq!(reloaded.snapshot.phase, Phase::Armed);
    assert_eq!(selected(&dispatcher), Some("b"));
    assert_eq!(reloaded.snapshot.elapsed_ms, 0);
    assert_eq!(reloaded.snapshot.added_delay_ms, 0);

    let again = dispatcher.dispatch(Command::Reload).expect("reload armed");
    assert!(!again.changed);
}

#[test]
fn load_rejects_entries_that_cannot_play() {
    let entries = vec![
        BlockEntry::new("blk", "Block").into(),
        DelayEntry::new("d", 1_000).into(),
        ShowEvent::new("s", "Skipped", 0, 1_000).skipped().into(),
    ];
    let (mut dispatcher, _time) = dispatcher_at(entries, 0);

    for id in ["blk", "d", "s"] {
        assert_eq!(
            dispatcher.dispatch(load(id)).unwrap_err(),
            RejectedCommand::NotPlayable(EntryId::from(id))
        );
    }
    assert_eq!(
        dispatcher.dispatch(load("missing")).unwrap_err(),
        RejectedCommand::UnknownEntry(EntryId::from("missing"))
    );
    assert_eq!(dispatcher.state().phase, Phase::Stopped);
}

#[test]
fn illegal_commands_never_mutate_state() {
    let (mut dispatcher, time) = dispatcher_at(three_events(), 5_000);
    let script = [
        Command::Pause,
        Command::Stop,
        Command::Reload,
        Command::AddDelay(1_000),
        load("a"),
        Command::Previous,
        Command::AddDelay(1_000),
        Command::Start,
        load("b"),
        Command::Roll,
        Command::Pause,
        Command::Pause,
        Command::Next,
        Command::Go,
        Command::Stop,
        Command::Roll,
        Command::AddDelay(500),
        Command::Pause,
        Command::Start,
        Command::Previous,
        Command::Next,
        Command::Go,
        load("c"),
        Command::Reload,
        Command::Stop,
    ];

    let mut rejections = 0;
    for command in script {
        time.advance(700);
        let before = dispatcher.state().clone();
        match dispatcher.dispatch(command.clone()) {
            Ok(_) => {}
            Err(reason) => {
                rejections += 1;
                assert_eq!(dispatcher.state(), &before, "{command} changed state on rejection");
                assert_ne!(reason.reason_code(), "");
            }
        }
    }
    assert!(rejections >= 8, "script should exercise rejections, got {rejections}");
}

#[test]
fn add_delay_is_rejected_outside_playing_and_paused() {
    let (mut dispatcher, _time) = dispatcher_at(three_events(), 5_000);
    dispatcher.dispatch(load("a")).expect("load");
    assert!(matches!(
        dispatcher.dispatch(Command::AddDelay(1_000)),
        Err(RejectedCommand::IllegalTransition { command: "addDelay", phase: Phase::Armed })
    ));

    dispatcher.dispatch(Command::Stop).expect("stop");
    dispatcher.dispatch(Command::Roll).expect("roll");
    assert!(matches!(
        dispatcher.dispatch(Command::AddDelay(1_000)),
        Err(RejectedCommand::IllegalTransition { command: "addDelay", phase: Phase::Rolling })
    ));
}

#[test]
fn add_delay_beyond_a_day_is_refused_without_touching_state() {
    let (mut dispatcher, _time) = dispatcher_at(example_rundown(), 0);
    dispatcher.dispatch(load("a")).expect("load");
    dispatcher.dispatch(Command::Start).expect("start");
    let before = dispatcher.state().clone();

    let huge: Command = "addDelay 9223372036854775807".parse().expect("parses as i64");
    assert!(matches!(
        dispatcher.dispatch(huge),
        Err(RejectedCommand::InvalidArgument { command: "addDelay", .. })
    ));
    assert!(matches!(
        dispatcher.dispatch(Command::AddDelay(Millis::MIN)),
        Err(RejectedCommand::InvalidArgument { command: "addDelay", .. })
    ));
    assert_eq!(dispatcher.state(), &before);

    // Steps that are fine alone are refused once the total would reach a day.
    dispatcher.dispatch(Command::AddDelay(DAY_MS - 1)).expect("just under a day");
    assert!(matches!(
        dispatcher.dispatch(Command::AddDelay(1)),
        Err(RejectedCommand::InvalidArgument { .. })
    ));
    let snapshot = dispatcher.tick().snapshot;
    assert_eq!(snapshot.added_delay_ms, DAY_MS - 1);
    assert_eq!(snapshot.remaining_ms, 5_000 + DAY_MS - 1);
}

#[test]
fn extreme_rundown_values_saturate_instead_of_overflowing() {
    let entries: Vec<RundownEntry> = vec![
        DelayEntry::new("d1", Millis::MAX).into(),
        DelayEntry::new("d2", Millis::MAX).into(),
        ShowEvent::new("far", "Far", Millis::MAX - 10, Millis::MAX).into(),
        ShowEvent::new("wide", "Wide", Millis::MIN, Millis::MAX).into(),
    ];
    let (mut dispatcher, time) = dispatcher_at(entries, 0);
    dispatcher.dispatch(load("far")).expect("load");
    let timing = dispatcher.snapshot().timing.expect("far has timing");
    assert_eq!(timing.start, Millis::MAX);
    assert_eq!(timing.end, Millis::MAX);

    dispatcher.dispatch(Command::Next).expect("next");
    dispatcher.dispatch(Command::Start).expect("start");
    dispatcher.dispatch(Command::AddDelay(DAY_MS - 1)).expect("delay");
    time.advance(1_000);
    let snapshot = dispatcher.tick().snapshot;
    assert_eq!(snapshot.elapsed_ms, 1_000);
    assert_eq!(snapshot.remaining_ms, Millis::MAX - 1_000);

    dispatcher.dispatch(Command::Stop).expect("stop");
    dispatcher.dispatch(Command::Roll).expect("roll");
    dispatcher.tick();
}

#[test]
fn go_loads_and_starts_in_one_step() {
    let (mut dispatcher, time) = dispatcher_at(three_events(), 0);
    let first = dispatcher.dispatch(Command::Go).expect("go from stopped");
    assert_eq!(first.snapshot.phase, Phase::Playing);
    assert_eq!(selected(&dispatcher), Some("a"));
    assert_eq!(first.lifecycle, vec![TimerLifecycle::OnLoad, TimerLifecycle::OnStart]);

    time.advance(2_000);
    dispatcher.dispatch(Command::Go).expect("go");
    assert_eq!(selected(&dispatcher), Some("b"));
    assert_eq!(dispatcher.snapshot().elapsed_ms, 0);
    time.advance(1_000);
    assert_eq!(dispatcher.snapshot().elapsed_ms, 1_000);

    dispatcher.dispatch(Command::Go).expect("go to c");
    let at_end = dispatcher.dispatch(Command::Go).expect("go at last");
    assert!(!at_end.changed);
    assert_eq!(selected(&dispatcher), Some("c"));
}

#[test]
fn removing_the_selected_event_stops_playback() {
    let (mut dispatcher, _time) = dispatcher_at(three_events(), 0);
    dispatcher.dispatch(load("b")).expect("load");
    dispatcher.dispatch(Command::Start).expect("start");

    let mut entries = three_events();
    entries.remove(3);
    let unrelated = dispatcher.apply_rundown_change(&RundownChange {
        kind: ChangeKind::Remove,
        affected_id: EntryId::from("c"),
        position: 3,
        revision: None,
        rundown: Arc::new(Rundown::new(entries.clone())),
    });
    // Still playing b, but the playable count shrank so clients hear about it.
    assert!(unrelated.changed);
    assert!(unrelated.lifecycle.is_empty());
    assert_eq!(unrelated.snapshot.playable_count, 2);
    assert_eq!(dispatcher.state().phase, Phase::Playing);

    entries.remove(2);
    let removed = dispatcher.apply_rundown_change(&RundownChange {
        kind: ChangeKind::Remove,
        affected_id: EntryId::from("b"),
        position: 2,
        revision: None,
        rundown: Arc::new(Rundown::new(entries)),
    });
    assert!(removed.changed);
    assert_eq!(removed.snapshot.phase, Phase::Stopped);
    assert_eq!(removed.lifecycle, vec![TimerLifecycle::OnStop]);
}

#[test]
fn delay_inserted_mid_show_moves_the_running_event() {
    let (mut dispatcher, _time) = dispatcher_at(three_events(), 0);
    dispatcher.dispatch(load("b")).expect("load");
    let before = dispatcher.snapshot().timing.expect("timing");

    let mut entries = three_events();
    entries.insert(2, DelayEntry::new("late", 90_000).into());
    dispatcher.apply_rundown_change(&RundownChange {
        kind: ChangeKind::Insert,
        affected_id: EntryId::from("late"),
        position: 2,
        revision: Some(0),
        rundown: Arc::new(Rundown::new(entries)),
    });
    let after = dispatcher.snapshot().timing.expect("timing");
    assert_eq!(after.start, before.start + 90_000);
    assert_eq!(after.duration, before.duration);
}

#[test]
fn snapshot_reports_position_among_playable_events() {
    let (mut dispatcher, _time) = dispatcher_at(three_events(), 0);
    assert_eq!(dispatcher.snapshot().selected_index, None);
    dispatcher.dispatch(load("c")).expect("load");
    let snapshot = dispatcher.snapshot();
    assert_eq!(snapshot.selected_index, Some(2));
    assert_eq!(snapshot.playable_count, 3);
}

#[test]
fn roll_selects_the_event_on_air() {
    let (mut dispatcher, _time) = dispatcher_at(three_events(), 12_500);
    let rolled = dispatcher.dispatch(Command::Roll).expect("roll");
    assert_eq!(rolled.snapshot.phase, Phase::Rolling);
    assert_eq!(selected(&dispatcher), Some("b"));
    assert_eq!(rolled.snapshot.elapsed_ms, 2_500);
    assert_eq!(rolled.snapshot.remaining_ms, 7_500);
    assert_eq!(rolled.lifecycle, vec![TimerLifecycle::OnLoad, TimerLifecycle::OnStart]);
}

#[test]
fn roll_between_windows_selects_the_upcoming_event() {
    let entries = vec![
        ShowEvent::new("a", "A", 0, 10_000).into(),
        ShowEvent::new("b", "B", 20_000, 30_000).into(),
    ];
    let (mut dispatcher, time) = dispatcher_at(entries, 15_000);
    dispatcher.dispatch(Command::Roll).expect("roll");
    assert_eq!(selected(&dispatcher), Some("b"));
    assert_eq!(dispatcher.snapshot().elapsed_ms, 0);

    time.advance(5_000);
    let opened = dispatcher.tick();
    assert!(opened.changed);
    assert_eq!(opened.lifecycle, vec![TimerLifecycle::OnStart, TimerLifecycle::OnUpdate]);
    assert_eq!(opened.snapshot.remaining_ms, 10_000);
}

#[test]
fn roll_before_first_window_waits_with_nothing_selected() {
    let (mut dispatcher, time) = dispatcher_at(three_events(), -5_000);
    dispatcher.dispatch(Command::Roll).expect("roll");
    assert_eq!(dispatcher.state().phase, Phase::Rolling);
    assert_eq!(selected(&dispatcher), None);

    time.advance(4_000);
    assert!(!dispatcher.tick().changed);

    time.advance(1_000);
    dispatcher.tick();
    assert_eq!(selected(&dispatcher), Some("a"));
}

#[test]
fn roll_auto_advances_and_stops_when_exhausted() {
    let (mut dispatcher, time) = dispatcher_at(three_events(), 9_000);
    dispatcher.dispatch(Command::Roll).expect("roll");
    assert_eq!(selected(&dispatcher), Some("a"));

    time.advance(1_000);
    let advanced = dispatcher.tick();
    assert_eq!(selected(&dispatcher), Some("b"));
    assert_eq!(
        advanced.lifecycle,
        vec![
            TimerLifecycle::OnFinish,
            TimerLifecycle::OnLoad,
            TimerLifecycle::OnStart,
            TimerLifecycle::OnUpdate
        ]
    );

    time.advance(20_000);
    let exhausted = dispatcher.tick();
    assert_eq!(exhausted.snapshot.phase, Phase::Stopped);
    assert_eq!(exhausted.snapshot.selected_event_id, None);
}

#[test]
fn roll_after_last_window_stops_on_next_tick() {
    let (mut dispatcher, _time) = dispatcher_at(three_events(), 40_000);
    dispatcher.dispatch(Command::Roll).expect("roll");
    assert_eq!(dispatcher.state().phase, Phase::Rolling);
    assert_eq!(selected(&dispatcher), None);

    dispatcher.tick();
    assert_eq!(dispatcher.state().phase, Phase::Stopped);
}

#[test]
fn roll_follows_effective_timing_after_delays() {
    // b runs 7000-10000 once the delay is applied.
    let (mut dispatcher, _time) = dispatcher_at(example_rundown(), 9_500);
    dispatcher.dispatch(Command::Roll).expect("roll");
    assert_eq!(selected(&dispatcher), Some("b"));
    assert_eq!(dispatcher.snapshot().remaining_ms, 500);
}

#[test]
fn clock_regression_does_not_produce_negative_elapsed() {
    let (mut dispatcher, time) = dispatcher_at(three_events(), 0);
    time.set_monotonic(10_000);
    dispatcher.dispatch(load("a")).expect("load");
    dispatcher.dispatch(Command::Start).expect("start");
    time.set_monotonic(4_000);
    let snapshot = dispatcher.tick().snapshot;
    assert_eq!(snapshot.elapsed_ms, 0);
    assert_eq!(snapshot.clock_timestamp, 10_000);
}
