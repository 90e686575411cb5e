//! # Live Tracker
//!
//! Synchronous state machine behind activity recording:
//!
//! ```text
//! Idle -> Recording <-> Paused -> Stopped
//! ```
//!
//! Distance and speed are updated incrementally as position samples arrive.
//! Elapsed time only advances through [`LiveTracker::tick`] while recording,
//! so a paused activity accrues neither time nor distance. The async driver
//! lives in [`crate::recording`].

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::TrackerConfig;
use crate::error::{PlannerError, PositionStreamError, Result};
use crate::geo_utils::{haversine_distance, speed_kmh};
use crate::routing::encode_path;
use crate::GeoPoint;

/// Recording lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackerState {
    Idle,
    Recording,
    Paused,
    /// Terminal
    Stopped,
}

impl TrackerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerState::Idle => "idle",
            TrackerState::Recording => "recording",
            TrackerState::Paused => "paused",
            TrackerState::Stopped => "stopped",
        }
    }
}

/// Whether the position stream currently delivers fixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SignalStatus {
    #[default]
    Ok,
    NoSignal,
}

/// One fix from the position stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub lat: f64,
    pub lng: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: i64,
}

impl PositionSample {
    pub fn new(lat: f64, lng: f64, timestamp_ms: i64) -> Self {
        Self {
            lat,
            lng,
            timestamp_ms,
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

/// Effect of one position sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionUpdate {
    /// False when the sample arrived while paused
    pub accepted: bool,
    pub distance_meters: f64,
    pub current_speed_kmh: f64,
    pub point_count: usize,
    /// The track should be sent to the route controller now
    pub forward_track: bool,
}

/// Live figures for the recording screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStats {
    pub state: TrackerState,
    pub signal: SignalStatus,
    pub distance_meters: f64,
    pub current_speed_kmh: f64,
    pub elapsed_seconds: f64,
    /// Last accepted fix, kept on screen while there is no signal
    pub last_position: Option<GeoPoint>,
}

impl Default for LiveStats {
    fn default() -> Self {
        Self {
            state: TrackerState::Idle,
            signal: SignalStatus::Ok,
            distance_meters: 0.0,
            current_speed_kmh: 0.0,
            elapsed_seconds: 0.0,
            last_position: None,
        }
    }
}

/// A recorded ride.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedActivity {
    pub id: String,
    /// Append-only track
    pub points: Vec<GeoPoint>,
    pub elapsed_seconds: f64,
    pub distance_meters: f64,
    pub current_speed_kmh: f64,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
}

/// Display figures for a recorded ride.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySummary {
    pub distance_km: f64,
    pub elapsed_seconds: f64,
    pub average_speed_kmh: f64,
    /// `H:MM:SS`
    pub duration: String,
    pub point_count: usize,
}

impl TrackedActivity {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            id: format!("activity_{}", Uuid::new_v4().simple()),
            points: Vec::new(),
            elapsed_seconds: 0.0,
            distance_meters: 0.0,
            current_speed_kmh: 0.0,
            started_at,
            stopped_at: None,
        }
    }

    pub fn summary(&self) -> ActivitySummary {
        ActivitySummary {
            distance_km: self.distance_meters / 1000.0,
            elapsed_seconds: self.elapsed_seconds,
            average_speed_kmh: speed_kmh(self.distance_meters, self.elapsed_seconds),
            duration: format_duration(self.elapsed_seconds),
            point_count: self.points.len(),
        }
    }

    /// Track as a Google polyline (precision 5).
    pub fn encoded_track(&self) -> Option<String> {
        encode_path(&self.points)
    }
}

/// Format seconds as `H:MM:SS`.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

/// Activity recording state machine.
#[derive(Debug)]
pub struct LiveTracker {
    state: TrackerState,
    activity: Option<TrackedActivity>,
    signal: SignalStatus,
    last_error: Option<PositionStreamError>,
    reroute_every_points: usize,
    accepted_since_forward: usize,
}

impl Default for LiveTracker {
    fn default() -> Self {
        Self::new(&TrackerConfig::default())
    }
}

impl LiveTracker {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            state: TrackerState::Idle,
            activity: None,
            signal: SignalStatus::Ok,
            last_error: None,
            reroute_every_points: config.reroute_every_points.max(1),
            accepted_since_forward: 0,
        }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn activity(&self) -> Option<&TrackedActivity> {
        self.activity.as_ref()
    }

    pub fn signal(&self) -> SignalStatus {
        self.signal
    }

    pub fn last_error(&self) -> Option<&PositionStreamError> {
        self.last_error.as_ref()
    }

    pub fn live_stats(&self) -> LiveStats {
        let mut stats = LiveStats {
            state: self.state,
            signal: self.signal,
            ..LiveStats::default()
        };
        if let Some(activity) = &self.activity {
            stats.distance_meters = activity.distance_meters;
            stats.current_speed_kmh = activity.current_speed_kmh;
            stats.elapsed_seconds = activity.elapsed_seconds;
            stats.last_position = activity.points.last().copied();
        }
        stats
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Result<&TrackedActivity> {
        self.expect_state(&[TrackerState::Idle], "start")?;
        let activity = TrackedActivity::new(now);
        info!("[LiveTracker] Started {}", activity.id);
        self.state = TrackerState::Recording;
        Ok(self.activity.insert(activity))
    }

    pub fn pause(&mut self) -> Result<()> {
        self.expect_state(&[TrackerState::Recording], "pause")?;
        self.state = TrackerState::Paused;
        debug!("[LiveTracker] Paused");
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        self.expect_state(&[TrackerState::Paused], "resume")?;
        self.state = TrackerState::Recording;
        debug!("[LiveTracker] Resumed");
        Ok(())
    }

    /// Advance elapsed time. Ignored unless recording; returns whether the
    /// time was counted.
    pub fn tick(&mut self, seconds: f64) -> bool {
        if self.state != TrackerState::Recording || !(seconds > 0.0) {
            return false;
        }
        if let Some(activity) = self.activity.as_mut() {
            activity.elapsed_seconds += seconds;
            activity.current_speed_kmh =
                speed_kmh(activity.distance_meters, activity.elapsed_seconds);
            return true;
        }
        false
    }

    /// Feed one position fix.
    ///
    /// While paused the sample is dropped and reported as not accepted.
    pub fn on_position(&mut self, sample: PositionSample) -> Result<PositionUpdate> {
        self.expect_state(&[TrackerState::Recording, TrackerState::Paused], "record a position")?;
        let point = sample.point();
        if !point.is_valid() {
            return Err(PlannerError::validation(format!(
                "invalid position ({}, {})",
                sample.lat, sample.lng
            )));
        }

        let reroute_every = self.reroute_every_points;
        let recording = self.state == TrackerState::Recording;
        let Some(activity) = self.activity.as_mut() else {
            return Err(invalid_transition(TrackerState::Idle, "record a position"));
        };

        if !recording {
            return Ok(PositionUpdate {
                accepted: false,
                distance_meters: activity.distance_meters,
                current_speed_kmh: activity.current_speed_kmh,
                point_count: activity.points.len(),
                forward_track: false,
            });
        }

        if let Some(last) = activity.points.last() {
            activity.distance_meters += haversine_distance(last, &point);
        }
        activity.points.push(point);
        activity.current_speed_kmh = speed_kmh(activity.distance_meters, activity.elapsed_seconds);

        self.signal = SignalStatus::Ok;
        self.accepted_since_forward += 1;
        let forward_track =
            activity.points.len() >= 2 && self.accepted_since_forward >= reroute_every;
        if forward_track {
            self.accepted_since_forward = 0;
        }

        Ok(PositionUpdate {
            accepted: true,
            distance_meters: activity.distance_meters,
            current_speed_kmh: activity.current_speed_kmh,
            point_count: activity.points.len(),
            forward_track,
        })
    }

    /// Record a stream error. Recording continues.
    pub fn on_position_error(&mut self, err: PositionStreamError) -> SignalStatus {
        warn!("[LiveTracker] Position error: {}", err);
        if err.is_signal_loss() {
            self.signal = SignalStatus::NoSignal;
        }
        self.last_error = Some(err);
        self.signal
    }

    /// Finish the activity and return it frozen.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Result<TrackedActivity> {
        self.expect_state(&[TrackerState::Recording, TrackerState::Paused], "stop")?;
        let Some(activity) = self.activity.as_mut() else {
            return Err(invalid_transition(TrackerState::Idle, "stop"));
        };
        activity.stopped_at = Some(now);
        let frozen = activity.clone();
        self.state = TrackerState::Stopped;
        info!(
            "[LiveTracker] Stopped {}: {:.2} km in {}",
            frozen.id,
            frozen.distance_meters / 1000.0,
            format_duration(frozen.elapsed_seconds)
        );
        Ok(frozen)
    }

    fn expect_state(&self, allowed: &[TrackerState], action: &str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(invalid_transition(self.state, action))
        }
    }
}

fn invalid_transition(from: TrackerState, action: &str) -> PlannerError {
    PlannerError::InvalidTransition {
        from: from.as_str().to_string(),
        action: action.to_string(),
    }
}
