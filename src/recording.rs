//! # Recording Driver
//!
//! Async loop that feeds a [`LiveTracker`] from a position stream and a
//! one-second clock, and keeps a route snapshot of the recorded track up to
//! date through its own [`RouteRecalculationController`].
//!
//! Everything runs on the calling task inside one `tokio::select!` loop.
//! Routing calls are polled concurrently from a `FuturesUnordered` set and
//! resolved by sequence number, so a slow answer for an older track never
//! overwrites a newer one. Pausing or stopping drops both the position
//! subscription and the clock.
//!
//! Live figures are published on a `watch` channel after every event so a
//! host can render distance, speed and signal while the session runs.

use std::time::Duration;

use chrono::Utc;
use futures::future::{FutureExt, LocalBoxFuture};
use futures::stream::{BoxStream, FuturesUnordered, StreamExt};
use log::{debug, info, warn};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::config::{PlannerConfig, TrackerConfig};
use crate::controller::{RouteRecalculationController, RouteStatus};
use crate::error::{PositionStreamError, Result, RoutingFailure};
use crate::routing::{RouteRequest, RouteSnapshot, RoutedPath, RoutingProvider};
use crate::tracker::{LiveStats, LiveTracker, PositionSample, TrackedActivity};

/// Options passed to the position source on subscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    /// Oldest cached fix the source may return
    pub maximum_age: Duration,
    pub timeout: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self::from(&TrackerConfig::default())
    }
}

impl From<&TrackerConfig> for PositionOptions {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            high_accuracy: config.high_accuracy,
            maximum_age: Duration::from_millis(config.maximum_age_ms),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

/// Stream handed out by a [`PositionSource`].
pub type PositionStream =
    BoxStream<'static, std::result::Result<PositionSample, PositionStreamError>>;

/// A device position feed.
///
/// Errors are delivered in-band and do not end the stream. Dropping the
/// stream ends the subscription.
pub trait PositionSource {
    fn subscribe(&self, options: &PositionOptions) -> PositionStream;
}

/// Control messages for a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingCommand {
    Pause,
    Resume,
    Stop,
}

/// What a finished session hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingOutcome {
    pub activity: TrackedActivity,
    /// Last routed version of the track, if any request succeeded
    pub snapshot: Option<RouteSnapshot>,
}

/// One recording run.
pub struct RecordingSession<S, P> {
    source: S,
    provider: P,
    tracker: LiveTracker,
    controller: RouteRecalculationController,
    options: PositionOptions,
    tick_period: Duration,
    live: watch::Sender<LiveStats>,
}

impl<S: PositionSource, P: RoutingProvider> RecordingSession<S, P> {
    pub fn new(source: S, provider: P, config: &PlannerConfig) -> Self {
        let (live, _) = watch::channel(LiveStats::default());
        Self {
            source,
            provider,
            tracker: LiveTracker::new(&config.tracking),
            controller: RouteRecalculationController::new(
                config.routing.travel_mode,
                config.drag_epsilon_degrees,
            ),
            options: PositionOptions::from(&config.tracking),
            tick_period: Duration::from_millis(config.tracking.tick_interval_ms.max(1)),
            live,
        }
    }

    /// Observe the route status of the recorded track.
    pub fn subscribe_status(&self) -> watch::Receiver<RouteStatus> {
        self.controller.subscribe_status()
    }

    /// Observe live distance, speed, elapsed time and signal.
    pub fn subscribe_live(&self) -> watch::Receiver<LiveStats> {
        self.live.subscribe()
    }

    /// Record until [`RecordingCommand::Stop`] arrives or the command
    /// channel closes.
    pub async fn run(
        self,
        mut commands: mpsc::Receiver<RecordingCommand>,
    ) -> Result<RecordingOutcome> {
        let Self {
            source,
            provider,
            mut tracker,
            mut controller,
            options,
            tick_period,
            live,
        } = self;

        tracker.start(Utc::now())?;
        live.send_replace(tracker.live_stats());
        let mut positions = Some(source.subscribe(&options));
        let mut ticker = Some(new_ticker(tick_period));
        let mut in_flight: FuturesUnordered<LocalBoxFuture<'_, RoutedResponse>> =
            FuturesUnordered::new();

        loop {
            tokio::select! {
                biased;

                Some((seq, result)) = in_flight.next(), if !in_flight.is_empty() => {
                    controller.apply(seq, result);
                }

                item = next_position(&mut positions) => match item {
                    Some(Ok(sample)) => match tracker.on_position(sample) {
                        Ok(update) if update.forward_track => {
                            let track = tracker
                                .activity()
                                .map(|a| a.points.clone())
                                .unwrap_or_default();
                            let request = controller.issue(track);
                            in_flight.push(route_request(&provider, request).boxed_local());
                        }
                        Ok(_) => {}
                        Err(e) => warn!("[RecordingSession] Dropped sample: {}", e),
                    },
                    Some(Err(err)) => {
                        tracker.on_position_error(err);
                    }
                    None => {
                        warn!("[RecordingSession] Position stream ended");
                        positions = None;
                        tracker.on_position_error(PositionStreamError::Unavailable(
                            "position stream ended".to_string(),
                        ));
                    }
                },

                _ = next_tick(&mut ticker) => {
                    tracker.tick(tick_period.as_secs_f64());
                }

                command = commands.recv() => match command {
                    Some(RecordingCommand::Pause) => match tracker.pause() {
                        Ok(()) => {
                            positions = None;
                            ticker = None;
                        }
                        Err(e) => warn!("[RecordingSession] {}", e),
                    },
                    Some(RecordingCommand::Resume) => match tracker.resume() {
                        Ok(()) => {
                            positions = Some(source.subscribe(&options));
                            ticker = Some(new_ticker(tick_period));
                        }
                        Err(e) => warn!("[RecordingSession] {}", e),
                    },
                    Some(RecordingCommand::Stop) | None => break,
                },
            }

            live.send_if_modified(|stats| {
                let current = tracker.live_stats();
                let changed = *stats != current;
                *stats = current;
                changed
            });
        }

        drop(positions);
        drop(ticker);
        if !in_flight.is_empty() {
            debug!(
                "[RecordingSession] Abandoning {} routing request(s)",
                in_flight.len()
            );
        }
        drop(in_flight);

        let activity = tracker.stop(Utc::now())?;
        live.send_replace(tracker.live_stats());
        info!(
            "[RecordingSession] Finished {} with {} points",
            activity.id,
            activity.points.len()
        );
        Ok(RecordingOutcome {
            activity,
            snapshot: controller.snapshot().cloned(),
        })
    }
}

fn new_ticker(period: Duration) -> Interval {
    // First tick one period from now, not immediately
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn next_position(
    positions: &mut Option<PositionStream>,
) -> Option<std::result::Result<PositionSample, PositionStreamError>> {
    match positions {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Sequence number and provider answer.
type RoutedResponse = (u64, std::result::Result<RoutedPath, RoutingFailure>);

async fn route_request<P: RoutingProvider>(provider: &P, request: RouteRequest) -> RoutedResponse {
    let result = provider.route(&request).await;
    (request.seq, result)
}
