//! Live Map View
//!
//! Runs one map view as a single task: the live poll timer, the playback
//! timer, in-flight provider requests and user commands are all serviced by
//! one `select!` loop, so the engine state needs no locks.
//!
//! ## Usage
//!
//! ```ignore
//! let (events, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let view = MapView::new(&config, DemoFleet::new(12, 7), events).spawn();
//! view.load_history("KA-01-WM-1001", range);
//! view.play();
//! while let Some(event) = rx.recv().await {
//!     draw(event);
//! }
//! ```

mod sequencer;

pub use sequencer::PollSequencer;

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::FleetConfig;
use crate::reconcile::{ReconcileResult, ReconciliationEngine, StatusFilter};
use crate::source::{FeedError, TelemetrySource};
use crate::telemetry::{live_records, TelemetryNormalizer};
use crate::track::{
    history_records, HistoryRange, PlaybackFrame, PlaybackScheduler, TrackNormalizer, TrackPoint,
};

/// Soft, user-visible conditions; none of them clear what is on the map
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Advisory {
    /// Live poll failed; markers show the last good state
    FeedUnavailable { message: String },
    /// Live poll succeeded but carried no usable vehicles
    NoLiveVehicles,
    /// History request failed; the previous track stays loaded
    HistoryUnavailable { vehicle_id: String, message: String },
    /// History request succeeded but the range holds no points
    NoHistoryInRange { vehicle_id: String },
    /// Requested playback speed is not offered
    UnsupportedSpeed { multiplier: u32 },
}

/// Output consumed by the rendering collaborator
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum RenderEvent {
    /// Marker instructions for one poll or filter change
    Reconciled(ReconcileResult),
    /// A new track replaced the playback track (redraw the polyline)
    TrackLoaded {
        vehicle_id: String,
        points: Vec<TrackPoint>,
    },
    /// Move the playback marker
    Playback(PlaybackFrame),
    Advisory(Advisory),
}

/// Receiver of render events
pub trait RenderSink: Send + 'static {
    /// Deliver one event
    fn render(&mut self, event: RenderEvent);
}

impl RenderSink for mpsc::UnboundedSender<RenderEvent> {
    fn render(&mut self, event: RenderEvent) {
        // a closed receiver means nobody is drawing any more
        let _ = self.send(event);
    }
}

/// User actions forwarded to a running view
#[derive(Debug, Clone, PartialEq)]
pub enum ViewCommand {
    /// Change the visible statuses; re-reconciles the last poll immediately
    SetFilter(StatusFilter),
    /// Poll now instead of waiting for the next interval
    RefreshNow,
    /// Fetch and load a vehicle's track
    LoadHistory {
        vehicle_id: String,
        range: HistoryRange,
    },
    Play,
    Pause,
    Scrub(usize),
    SetSpeed(u32),
    /// Tear the view down
    Shutdown,
}

enum Completion {
    Live {
        seq: u64,
        result: Result<Value, FeedError>,
    },
    History {
        seq: u64,
        vehicle_id: String,
        result: Result<Value, FeedError>,
    },
}

/// The one playback tick the view is waiting for
#[derive(Debug, Clone, Copy)]
struct PendingTick {
    generation: u64,
    due: Instant,
}

/// A live map view with trip playback
pub struct MapView<S, K> {
    id: Uuid,
    source: S,
    sink: K,
    normalizer: TelemetryNormalizer,
    tracks: TrackNormalizer,
    engine: ReconciliationEngine,
    playback: PlaybackScheduler,
    polls: PollSequencer,
    histories: PollSequencer,
    filter: StatusFilter,
    poll_interval: Duration,
    live_polling: bool,
    /// In-flight provider requests
    fetches: JoinSet<Completion>,
    pending_tick: Option<PendingTick>,
}

impl<S: TelemetrySource, K: RenderSink> MapView<S, K> {
    /// Create a view from configuration, a telemetry source and a render sink
    pub fn new(config: &FleetConfig, source: S, sink: K) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            sink,
            normalizer: TelemetryNormalizer::new(config.fields.clone(), config.classifier.clone()),
            tracks: TrackNormalizer::new(config.fields.clone()),
            engine: ReconciliationEngine::new(
                config.live.position_epsilon_deg,
                config.live.fit_bounds_padding,
            ),
            playback: PlaybackScheduler::new(
                config.playback.base_interval(),
                config.playback.speed_multipliers.clone(),
            ),
            polls: PollSequencer::new(),
            histories: PollSequencer::new(),
            filter: config.live.default_filter.clone(),
            poll_interval: config.live.poll_interval(),
            live_polling: true,
            fetches: JoinSet::new(),
            pending_tick: None,
        }
    }

    /// Disable the live poll timer (history playback only)
    pub fn without_live_polling(mut self) -> Self {
        self.live_polling = false;
        self
    }

    /// Identifier used in this view's log span
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Start the view on the current tokio runtime
    pub fn spawn(self) -> MapViewHandle {
        let (commands, receiver) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let id = self.id;

        let span = tracing::info_span!("map_view", view = %id);
        let task = tokio::spawn(self.run(receiver, cancel.clone()).instrument(span));

        MapViewHandle {
            id,
            commands,
            _guard: cancel.clone().drop_guard(),
            cancel,
            task,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<ViewCommand>,
        cancel: CancellationToken,
    ) {
        let mut poll_timer = time::interval(self.poll_interval);
        poll_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            poll_ms = self.poll_interval.as_millis() as u64,
            live = self.live_polling,
            "map view started"
        );

        loop {
            let due = self.pending_tick.map(|t| t.due);

            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                command = commands.recv() => match command {
                    Some(ViewCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },

                Some(joined) = self.fetches.join_next(), if !self.fetches.is_empty() => {
                    match joined {
                        Ok(completion) => self.on_completion(completion),
                        Err(e) if e.is_cancelled() => {}
                        Err(e) => tracing::error!("provider request task failed: {e}"),
                    }
                }

                _ = sleep_until_due(due) => self.fire_tick(),

                _ = poll_timer.tick(), if self.live_polling => self.issue_poll(),
            }
        }

        self.teardown();
    }

    fn handle_command(&mut self, command: ViewCommand) {
        match command {
            ViewCommand::SetFilter(filter) => {
                self.filter = filter.clone();
                let result = self.engine.set_filter(filter);
                self.sink.render(RenderEvent::Reconciled(result));
            }
            ViewCommand::RefreshNow => self.issue_poll(),
            ViewCommand::LoadHistory { vehicle_id, range } => self.issue_history(vehicle_id, range),
            ViewCommand::Play => {
                if self.playback.play() {
                    self.sync_tick(Instant::now());
                    self.emit_frame();
                }
            }
            ViewCommand::Pause => {
                if self.playback.pause() {
                    self.sync_tick(Instant::now());
                    self.emit_frame();
                }
            }
            ViewCommand::Scrub(index) => {
                self.playback.scrub(index);
                self.emit_frame();
            }
            ViewCommand::SetSpeed(multiplier) => match self.playback.set_speed(multiplier) {
                Ok(()) => {
                    self.sync_tick(Instant::now());
                    self.emit_frame();
                }
                Err(e) => {
                    tracing::warn!("{e}");
                    self.sink
                        .render(RenderEvent::Advisory(Advisory::UnsupportedSpeed { multiplier }));
                }
            },
            ViewCommand::Shutdown => {}
        }
    }

    fn issue_poll(&mut self) {
        let seq = self.polls.issue();
        let request = self.source.fetch_live();
        self.fetches.spawn(async move {
            Completion::Live {
                seq,
                result: request.await,
            }
        });
        tracing::debug!(seq, in_flight = self.fetches.len(), "live poll issued");
    }

    fn issue_history(&mut self, vehicle_id: String, range: HistoryRange) {
        let seq = self.histories.issue();
        let request = self.source.fetch_history(&vehicle_id, range);
        tracing::info!(seq, %vehicle_id, from_ms = range.from_ms, to_ms = range.to_ms, "history requested");
        self.fetches.spawn(async move {
            Completion::History {
                seq,
                vehicle_id,
                result: request.await,
            }
        });
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Live { seq, result } => self.apply_live(seq, result),
            Completion::History {
                seq,
                vehicle_id,
                result,
            } => self.apply_history(seq, vehicle_id, result),
        }
    }

    fn apply_live(&mut self, seq: u64, result: Result<Value, FeedError>) {
        if self.polls.is_stale(seq) {
            tracing::debug!(seq, applied = self.polls.last_applied(), "discarding stale poll");
            return;
        }

        let payload = match result {
            Ok(payload) => payload,
            Err(e) => return self.feed_unavailable(seq, e),
        };
        let Some(records) = live_records(&payload) else {
            let e = FeedError::Malformed("expected an array or an object with `data`".into());
            return self.feed_unavailable(seq, e);
        };

        let snapshots = self.normalizer.normalize_batch(records);
        self.polls.accept(seq);

        if snapshots.is_empty() {
            tracing::info!(seq, "poll returned no usable vehicles");
            self.sink.render(RenderEvent::Advisory(Advisory::NoLiveVehicles));
            return;
        }

        let result = self.engine.reconcile(&snapshots, &self.filter);
        self.sink.render(RenderEvent::Reconciled(result));
    }

    fn feed_unavailable(&mut self, seq: u64, error: FeedError) {
        tracing::warn!(seq, "live poll failed: {error}");
        self.sink
            .render(RenderEvent::Advisory(Advisory::FeedUnavailable {
                message: error.to_string(),
            }));
    }

    fn apply_history(&mut self, seq: u64, vehicle_id: String, result: Result<Value, FeedError>) {
        if self.histories.is_stale(seq) {
            tracing::debug!(seq, %vehicle_id, "discarding superseded history");
            return;
        }

        let records = match result {
            Ok(payload) => history_records(&payload).map(|records| self.tracks.build(records)),
            Err(e) => {
                tracing::warn!(seq, %vehicle_id, "history request failed: {e}");
                let advisory = Advisory::HistoryUnavailable {
                    vehicle_id,
                    message: e.to_string(),
                };
                return self.sink.render(RenderEvent::Advisory(advisory));
            }
        };
        let Some(track) = records else {
            tracing::warn!(seq, %vehicle_id, "history payload has no known record list");
            let advisory = Advisory::HistoryUnavailable {
                vehicle_id,
                message: FeedError::Malformed("no vehicleLocations, data or track list".into())
                    .to_string(),
            };
            return self.sink.render(RenderEvent::Advisory(advisory));
        };

        self.histories.accept(seq);
        if track.is_empty() {
            self.sink
                .render(RenderEvent::Advisory(Advisory::NoHistoryInRange { vehicle_id }));
            return;
        }

        tracing::info!(seq, %vehicle_id, points = track.len(), "track loaded");
        self.playback.load(track.clone());
        self.sync_tick(Instant::now());
        self.sink.render(RenderEvent::TrackLoaded {
            vehicle_id,
            points: track,
        });
        self.emit_frame();
    }

    fn fire_tick(&mut self) {
        let Some(tick) = self.pending_tick.take() else {
            return;
        };

        match self.playback.on_tick(tick.generation) {
            Ok(_) => {
                // schedule from the due time, not from now, so ticks don't drift
                self.sync_tick(tick.due);
                self.emit_frame();
            }
            Err(e) => {
                tracing::error!("playback timer fired out of turn: {e}");
                if cfg!(debug_assertions) {
                    panic!("playback timer fired out of turn: {e}");
                }
                self.sync_tick(Instant::now());
            }
        }
    }

    /// Align the pending tick with the scheduler's armed timer
    fn sync_tick(&mut self, from: Instant) {
        self.pending_tick = match (self.playback.armed(), self.pending_tick.take()) {
            (Some(armed), Some(pending)) if pending.generation == armed.generation => Some(pending),
            (Some(armed), _) => Some(PendingTick {
                generation: armed.generation,
                due: from + armed.period,
            }),
            (None, _) => None,
        };
    }

    fn emit_frame(&mut self) {
        if let Some(frame) = self.playback.frame() {
            self.sink.render(RenderEvent::Playback(frame));
        }
    }

    fn teardown(&mut self) {
        self.polls.close();
        self.histories.close();
        self.fetches.abort_all();
        self.pending_tick = None;
        self.playback.teardown();
        let removed = self.engine.clear();
        tracing::info!(markers = removed.len(), "map view torn down");
    }
}

async fn sleep_until_due(due: Option<Instant>) {
    match due {
        Some(due) => time::sleep_until(due).await,
        None => std::future::pending().await,
    }
}

/// Control handle for a spawned [`MapView`]
///
/// Dropping the handle tears the view down.
pub struct MapViewHandle {
    id: Uuid,
    commands: mpsc::UnboundedSender<ViewCommand>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    _guard: DropGuard,
}

impl MapViewHandle {
    /// Identifier of the view
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Forward a command; returns `false` if the view has stopped
    pub fn send(&self, command: ViewCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Change the visible statuses
    pub fn set_filter(&self, filter: StatusFilter) -> bool {
        self.send(ViewCommand::SetFilter(filter))
    }

    /// Poll immediately
    pub fn refresh(&self) -> bool {
        self.send(ViewCommand::RefreshNow)
    }

    /// Fetch and load a vehicle's track
    pub fn load_history(&self, vehicle_id: impl Into<String>, range: HistoryRange) -> bool {
        self.send(ViewCommand::LoadHistory {
            vehicle_id: vehicle_id.into(),
            range,
        })
    }

    /// Start or resume playback
    pub fn play(&self) -> bool {
        self.send(ViewCommand::Play)
    }

    /// Pause playback
    pub fn pause(&self) -> bool {
        self.send(ViewCommand::Pause)
    }

    /// Jump to a track point
    pub fn scrub(&self, index: usize) -> bool {
        self.send(ViewCommand::Scrub(index))
    }

    /// Change playback speed
    pub fn set_speed(&self, multiplier: u32) -> bool {
        self.send(ViewCommand::SetSpeed(multiplier))
    }

    /// Check if the view task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Tear the view down and wait for it to exit
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            if e.is_panic() {
                std::panic::resume_unwind(e.into_panic());
            }
        }
    }
}
