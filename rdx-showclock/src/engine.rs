//! The engine that owns playback and fans its state out to observers.
//!
//! `ShowclockEngine` is a cloneable handle. Commands travel over an mpsc
//! queue to a single actor task that owns the `CommandDispatcher`; ticks
//! and rundown edits reach the same actor through broadcast channels. The
//! actor is therefore the only place playback state is ever mutated.

use crate::common::ListenerId;
use crate::components::watcher::{LifecycleHook, LifecycleWatcher};
use crate::config::ShowclockConfig;
use crate::error::RejectedCommand;
use crate::events::{LifecycleEvent, PlaybackSnapshot, SystemEvent, TimerLifecycle};
use crate::playback::{Command, CommandDispatcher, Phase, Transition};
use crate::rundown::{RundownChange, RundownStore};
use crate::time::{MonotonicClock, SystemClock, SystemTimeSource, TickEvent, TimeSource};
use slotmap::SlotMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch, RwLock};
use tracing::{debug, error, info, trace, warn};

type Reply = oneshot::Sender<Result<Transition, RejectedCommand>>;

/// A command waiting in the actor's queue, with the channel its verdict goes back on.
struct Envelope {
    command: Command,
    reply: Reply,
}

/// What a stopped engine keeps between runs: the command queue, and the
/// dispatcher holding the last committed playback state once it has run.
struct Parked {
    commands: mpsc::Receiver<Envelope>,
    dispatcher: Option<CommandDispatcher>,
}

/// Receivers the actor loop reads from. Created before the actor is spawned
/// so nothing sent in between is lost.
struct ActorInputs {
    commands: mpsc::Receiver<Envelope>,
    ticks: broadcast::Receiver<Arc<TickEvent>>,
    changes: broadcast::Receiver<RundownChange>,
    shutdown: broadcast::Receiver<()>,
    /// Fired once the initial snapshot is committed.
    ready: oneshot::Sender<()>,
}

/// The main Showclock engine.
///
/// Holds the configuration, the rundown store, the outbound channels and the
/// registered lifecycle hooks. Cloning is cheap and every clone talks to the
/// same running instance.
#[derive(Clone)]
pub struct ShowclockEngine {
    config: Arc<ShowclockConfig>,
    time_source: Arc<dyn TimeSource>,
    rundown: Arc<RundownStore>,
    /// Guards the command queue. Senders hold a read lock while enqueueing,
    /// so once shutdown has flipped it under the write lock nothing new can
    /// be queued behind the actor's back.
    running: Arc<RwLock<bool>>,
    command_sender: mpsc::Sender<Envelope>,
    parked: Arc<Mutex<Option<Parked>>>,
    tick_sender: broadcast::Sender<Arc<TickEvent>>,
    snapshot_sender: broadcast::Sender<PlaybackSnapshot>,
    latest_snapshot: Arc<watch::Sender<PlaybackSnapshot>>,
    lifecycle_sender: broadcast::Sender<LifecycleEvent>,
    system_event_sender: broadcast::Sender<SystemEvent>,
    lifecycle_watchers: Arc<RwLock<SlotMap<ListenerId, LifecycleWatcher>>>,
}

// Core implementation block for internal logic.
impl ShowclockEngine {
    /// Creates a new engine that reads time from the system clock, in the
    /// configured timezone.
    pub fn new(config: ShowclockConfig, rundown: Arc<RundownStore>) -> Self {
        let time_source = Arc::new(SystemTimeSource::new(config.timezone));
        Self::with_time_source(config, rundown, time_source)
    }

    /// Creates a new engine backed by an arbitrary time source.
    pub fn with_time_source(
        config: ShowclockConfig,
        rundown: Arc<RundownStore>,
        time_source: Arc<dyn TimeSource>,
    ) -> Self {
        let (command_sender, command_receiver) = mpsc::channel(config.command_capacity.max(1));
        let capacity = config.broadcast_capacity.max(1);
        let (tick_sender, _) = broadcast::channel(capacity);
        let (snapshot_sender, _) = broadcast::channel(capacity);
        let (lifecycle_sender, _) = broadcast::channel(capacity);
        let (system_event_sender, _) = broadcast::channel(64);
        let (latest_snapshot, _) = watch::channel(PlaybackSnapshot::default());

        Self {
            config: Arc::new(config),
            time_source,
            rundown,
            running: Arc::new(RwLock::new(false)),
            command_sender,
            parked: Arc::new(Mutex::new(Some(Parked {
                commands: command_receiver,
                dispatcher: None,
            }))),
            tick_sender,
            snapshot_sender,
            latest_snapshot: Arc::new(latest_snapshot),
            lifecycle_sender,
            system_event_sender,
            lifecycle_watchers: Arc::new(RwLock::new(SlotMap::with_key())),
        }
    }

    /// Runs the engine until Ctrl+C is pressed.
    pub async fn run(&self) -> anyhow::Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {e}");
            }
        })
        .await
    }

    /// Runs the engine until `shutdown` resolves.
    ///
    /// This method will:
    /// 1. Spawn the `SystemClock` task.
    /// 2. Spawn the actor task that owns the dispatcher.
    /// 3. Wait for `shutdown`, then stop both tasks and wait for them.
    ///
    /// The last committed snapshot stays readable after shutdown. Running the
    /// engine again resumes from that state, re-read against the current
    /// rundown. A timer that was playing kept counting on the monotonic
    /// clock while the engine was down.
    ///
    /// Commands still queued when shutdown begins are answered with
    /// `EngineUnavailable`.
    pub async fn run_until<F>(&self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        let Parked {
            commands,
            dispatcher,
        } = self
            .parked
            .lock()
            .map_err(|_| anyhow::anyhow!("command queue lock poisoned"))?
            .take()
            .ok_or_else(|| anyhow::anyhow!("ShowclockEngine is already running"))?;

        info!("ShowclockEngine starting up...");
        let (shutdown_tx, _) = broadcast::channel(1);
        let (ready, actor_ready) = oneshot::channel();

        let inputs = ActorInputs {
            commands,
            ticks: self.tick_sender.subscribe(),
            changes: self.rundown.subscribe(),
            shutdown: shutdown_tx.subscribe(),
            ready,
        };
        let clock = SystemClock::new(self.config.resolution.interval(), self.tick_sender.clone());
        let clock_handle = tokio::spawn(clock.run(shutdown_tx.subscribe()));

        let rundown = self.rundown.snapshot().await;
        let (dispatcher, initial) = match dispatcher {
            Some(mut dispatcher) => {
                let resumed = dispatcher.resync(rundown);
                debug!(phase = %resumed.snapshot.phase, "Resuming from the last committed state.");
                (dispatcher, resumed)
            }
            None => {
                let mut dispatcher =
                    CommandDispatcher::new(MonotonicClock::new(self.time_source.clone()), rundown);
                let initial = Transition {
                    snapshot: dispatcher.snapshot(),
                    changed: true,
                    lifecycle: Vec::new(),
                };
                (dispatcher, initial)
            }
        };
        let actor = self.clone();
        let actor_handle =
            tokio::spawn(async move { actor.actor_loop(dispatcher, initial, inputs).await });
        if actor_ready.await.is_err() {
            error!("Actor task ended before it was ready.");
        }
        *self.running.write().await = true;

        info!(
            "Engine running at {:?} ({}).",
            self.config.resolution, self.config.timezone
        );
        shutdown.await;

        info!("Shutdown signal received. Broadcasting to all tasks...");
        // Waits for any sender that is mid-enqueue, then closes the gate.
        *self.running.write().await = false;
        if shutdown_tx.send(()).is_err() {
            error!("Failed to send shutdown signal. Some tasks may not terminate gracefully.");
        }
        clock_handle.await?;
        let parked = actor_handle.await?;
        if let Ok(mut slot) = self.parked.lock() {
            *slot = Some(parked);
        }

        self.system_event_sender
            .send(SystemEvent::EngineShutdown)
            .ok();
        info!("ShowclockEngine has shut down.");
        Ok(())
    }

    /// The actor: the only task that ever touches the dispatcher. Hands the
    /// command queue and the dispatcher back on exit so the engine can be
    /// restarted where it left off.
    #[doc(hidden)]
    async fn actor_loop(
        self,
        mut dispatcher: CommandDispatcher,
        mut initial: Transition,
        inputs: ActorInputs,
    ) -> Parked {
        let ActorInputs {
            mut commands,
            mut ticks,
            mut changes,
            mut shutdown,
            ready,
        } = inputs;

        initial.changed = true;
        self.commit(&initial).await;
        self.system_event_sender
            .send(SystemEvent::EngineStarted {
                timestamp: tokio::time::Instant::now(),
            })
            .ok();
        ready.send(()).ok();

        let mut rundown_open = true;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                change = changes.recv(), if rundown_open => match change {
                    Ok(change) => {
                        let transition = dispatcher.apply_rundown_change(&change);
                        self.commit(&transition).await;
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Missed {missed} rundown notifications. Resyncing.");
                        let rundown = self.rundown.snapshot().await;
                        let entries = rundown.len();
                        let transition = dispatcher.resync(rundown);
                        self.commit(&transition).await;
                        self.system_event_sender
                            .send(SystemEvent::RundownResynced { entries })
                            .ok();
                    }
                    Err(RecvError::Closed) => rundown_open = false,
                },
                Some(envelope) = commands.recv() => {
                    let Envelope { command, reply } = envelope;
                    let label = command.to_string();
                    let result = dispatcher.dispatch(command);
                    match &result {
                        Ok(transition) => self.commit(transition).await,
                        Err(reason) => {
                            self.system_event_sender
                                .send(SystemEvent::CommandRejected {
                                    command: label,
                                    reason: reason.reason_code(),
                                })
                                .ok();
                        }
                    }
                    if reply.send(result).is_err() {
                        debug!("Command sender went away before the reply.");
                    }
                }
                tick = ticks.recv() => match tick {
                    Ok(_) | Err(RecvError::Lagged(_)) => {
                        if let Ok(tick) = &tick {
                            trace!("Tick #{} received.", tick.tick_count);
                        }
                        if dispatcher.state().phase != Phase::Stopped {
                            let mut transition = dispatcher.tick();
                            // A running timer is pushed every tick, changed or not.
                            transition.changed = true;
                            self.commit(&transition).await;
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        let refused = refuse_queued(&mut commands);
        if refused > 0 {
            info!("Refused {refused} commands queued at shutdown.");
        }
        Parked {
            commands,
            dispatcher: Some(dispatcher),
        }
    }

    /// Publishes a transition: updates the latest snapshot, then broadcasts
    /// it and its lifecycle points if it changed anything.
    #[doc(hidden)]
    async fn commit(&self, transition: &Transition) {
        self.latest_snapshot.send_replace(transition.snapshot.clone());
        if !transition.changed {
            return;
        }
        self.snapshot_sender.send(transition.snapshot.clone()).ok();
        for cycle in &transition.lifecycle {
            let event = LifecycleEvent {
                cycle: *cycle,
                snapshot: transition.snapshot.clone(),
            };
            self.process_lifecycle_watchers(&event).await;
            self.lifecycle_sender.send(event).ok();
        }
    }

    #[doc(hidden)]
    async fn process_lifecycle_watchers(&self, event: &LifecycleEvent) {
        let mut watchers = self.lifecycle_watchers.write().await;
        for (id, watcher) in watchers.iter_mut() {
            if watcher.process(event) {
                trace!(listener = ?id, cycle = ?event.cycle, "Lifecycle hook fired.");
            }
        }
    }
}

/// Answers every command still in the queue with `EngineUnavailable`.
fn refuse_queued(commands: &mut mpsc::Receiver<Envelope>) -> usize {
    let mut refused = 0;
    while let Ok(Envelope { command, reply }) = commands.try_recv() {
        debug!(%command, "Refusing command queued at shutdown.");
        reply.send(Err(RejectedCommand::EngineUnavailable)).ok();
        refused += 1;
    }
    refused
}

// Public API for controlling playback.
impl ShowclockEngine {
    /// Sends a command to the actor and waits for its verdict.
    ///
    /// Returns `EngineUnavailable` when the engine is not running.
    pub async fn dispatch(&self, command: Command) -> Result<Transition, RejectedCommand> {
        let (reply, verdict) = oneshot::channel();
        {
            let running = self.running.read().await;
            if !*running {
                return Err(RejectedCommand::EngineUnavailable);
            }
            self.command_sender
                .send(Envelope { command, reply })
                .await
                .map_err(|_| RejectedCommand::EngineUnavailable)?;
        }
        verdict
            .await
            .map_err(|_| RejectedCommand::EngineUnavailable)?
    }

    /// Parses a textual command (`"start"`, `"/showclock/load a"`, ...)
    /// and dispatches it.
    pub async fn dispatch_message(&self, message: &str) -> Result<Transition, RejectedCommand> {
        match message.parse::<Command>() {
            Ok(command) => self.dispatch(command).await,
            Err(reason) => {
                debug!(message, %reason, "Could not parse command.");
                self.system_event_sender
                    .send(SystemEvent::CommandRejected {
                        command: message.trim().to_string(),
                        reason: reason.reason_code(),
                    })
                    .ok();
                Err(reason)
            }
        }
    }

    /// Whether the actor loop is currently accepting commands.
    pub fn is_running(&self) -> bool {
        self.running
            .try_read()
            .map(|running| *running)
            .unwrap_or(false)
    }

    /// The rundown store this engine follows.
    pub fn rundown(&self) -> &Arc<RundownStore> {
        &self.rundown
    }

    pub fn config(&self) -> &ShowclockConfig {
        &self.config
    }
}

// Public API for observing playback.
impl ShowclockEngine {
    /// The most recently committed snapshot. Never blocks on the actor.
    pub fn latest_snapshot(&self) -> PlaybackSnapshot {
        self.latest_snapshot.borrow().clone()
    }

    /// A receiver that always holds the most recently committed snapshot.
    pub fn watch_snapshot(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.latest_snapshot.subscribe()
    }

    /// Subscribes to the snapshot stream: every accepted change, and every
    /// tick while not stopped.
    pub fn subscribe_snapshots(&self) -> broadcast::Receiver<PlaybackSnapshot> {
        self.snapshot_sender.subscribe()
    }

    pub fn subscribe_lifecycle_events(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.lifecycle_sender.subscribe()
    }

    pub fn subscribe_system_events(&self) -> broadcast::Receiver<SystemEvent> {
        self.system_event_sender.subscribe()
    }

    pub fn subscribe_tick_events(&self) -> broadcast::Receiver<Arc<TickEvent>> {
        self.tick_sender.subscribe()
    }

    /// Registers a hook that runs each time playback crosses `cycle`.
    pub async fn on_lifecycle<F>(&self, cycle: TimerLifecycle, hook: F) -> ListenerId
    where
        F: FnMut(&PlaybackSnapshot) + Send + Sync + 'static,
    {
        let hook: LifecycleHook = Box::new(hook);
        let id = self
            .lifecycle_watchers
            .write()
            .await
            .insert(LifecycleWatcher::new(cycle, hook));
        info!(listener = ?id, ?cycle, "Lifecycle hook registered.");
        self.system_event_sender
            .send(SystemEvent::ListenerAdded { id })
            .ok();
        id
    }

    /// Removes a lifecycle hook. Returns `true` if it was registered.
    pub async fn remove_lifecycle_listener(&self, id: ListenerId) -> bool {
        let removed = self.lifecycle_watchers.write().await.remove(id);
        if let Some(watcher) = &removed {
            info!(listener = ?id, fired = watcher.fire_count, "Lifecycle hook removed.");
            self.system_event_sender
                .send(SystemEvent::ListenerRemoved { id })
                .ok();
        }
        removed.is_some()
    }
}
