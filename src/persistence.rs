//! # Saved Routes
//!
//! Durable storage for finished routes.
//!
//! ## Layout
//!
//! Routes are stored keyed by a generated id. A second structure, the
//! recency index, orders every saved route newest first for the dashboard
//! and activity lists:
//!
//! - [`InMemoryRouteRepository`]: a map plus an id list
//! - [`SqliteRouteRepository`] (feature `persistence`): one table, waypoints
//!   as a MessagePack BLOB, an autoincrement `seq` column as the index
//!
//! Metadata is persisted in kilometres and minutes, matching what the
//! dashboard displays.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{OptionExt, PlannerError, Result};
use crate::routing::{RouteSnapshot, TravelMode};
use crate::tracker::TrackedActivity;
use crate::waypoints::Waypoint;
use crate::GeoPoint;

// ============================================================================
// Types
// ============================================================================

/// Aggregate route figures as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteMetadata {
    /// Distance in kilometres
    pub distance_km: f64,
    /// Duration in minutes
    pub duration_minutes: f64,
    pub travel_mode: TravelMode,
}

impl RouteMetadata {
    /// Build from meters/seconds.
    pub fn new(distance_meters: f64, duration_seconds: f64, travel_mode: TravelMode) -> Self {
        Self {
            distance_km: distance_meters / 1000.0,
            duration_minutes: duration_seconds / 60.0,
            travel_mode,
        }
    }

    pub fn from_snapshot(snapshot: &RouteSnapshot, travel_mode: TravelMode) -> Self {
        Self::new(snapshot.distance_meters, snapshot.duration_seconds, travel_mode)
    }

    pub fn distance_meters(&self) -> f64 {
        self.distance_km * 1000.0
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_minutes * 60.0
    }
}

/// A persisted route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedRoute {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub waypoints: Vec<Waypoint>,
    pub metadata: RouteMetadata,
    pub encoded_path: Option<String>,
}

impl SavedRoute {
    /// Stops sorted by their stored order.
    pub fn points(&self) -> Vec<GeoPoint> {
        let mut waypoints = self.waypoints.clone();
        waypoints.sort_by_key(|w| w.order);
        waypoints.iter().map(Waypoint::point).collect()
    }
}

// ============================================================================
// Repository
// ============================================================================

/// Key-value storage for saved routes plus a recency index.
pub trait RouteRepository {
    /// Store a new route at the front of the recency index.
    fn insert(&mut self, route: &SavedRoute) -> Result<()>;
    /// Overwrite an existing route, keeping its recency position.
    fn update(&mut self, route: &SavedRoute) -> Result<()>;
    fn get(&self, id: &str) -> Result<Option<SavedRoute>>;
    /// Every route, newest first.
    fn list_recent(&self) -> Result<Vec<SavedRoute>>;
    /// Returns whether a route was removed.
    fn delete(&mut self, id: &str) -> Result<bool>;
}

/// Process-local repository.
#[derive(Debug, Default)]
pub struct InMemoryRouteRepository {
    routes: HashMap<String, SavedRoute>,
    /// Ids newest first
    recency: Vec<String>,
}

impl InMemoryRouteRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RouteRepository for InMemoryRouteRepository {
    fn insert(&mut self, route: &SavedRoute) -> Result<()> {
        if self.routes.contains_key(&route.id) {
            return Err(PlannerError::persistence(format!(
                "route '{}' already exists",
                route.id
            )));
        }
        self.recency.insert(0, route.id.clone());
        self.routes.insert(route.id.clone(), route.clone());
        Ok(())
    }

    fn update(&mut self, route: &SavedRoute) -> Result<()> {
        let slot = self.routes.get_mut(&route.id).ok_or_not_found(&route.id)?;
        *slot = route.clone();
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<SavedRoute>> {
        Ok(self.routes.get(id).cloned())
    }

    fn list_recent(&self) -> Result<Vec<SavedRoute>> {
        Ok(self
            .recency
            .iter()
            .filter_map(|id| self.routes.get(id).cloned())
            .collect())
    }

    fn delete(&mut self, id: &str) -> Result<bool> {
        self.recency.retain(|r| r != id);
        Ok(self.routes.remove(id).is_some())
    }
}

// ============================================================================
// Persistence service
// ============================================================================

/// Validates, stamps and stores routes.
#[derive(Debug)]
pub struct RoutePersistence<R: RouteRepository> {
    repo: R,
}

impl<R: RouteRepository> RoutePersistence<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Save a route. A blank name becomes `Route YYYY-MM-DD`.
    pub fn save(
        &mut self,
        waypoints: &[GeoPoint],
        metadata: RouteMetadata,
        encoded_path: Option<String>,
        name: &str,
    ) -> Result<SavedRoute> {
        if waypoints.len() < 2 {
            return Err(PlannerError::validation(format!(
                "a route needs at least 2 waypoints, got {}",
                waypoints.len()
            )));
        }
        if let Some(bad) = waypoints.iter().find(|p| !p.is_valid()) {
            return Err(PlannerError::validation(format!(
                "invalid coordinate ({}, {})",
                bad.lat, bad.lng
            )));
        }

        let now = Utc::now();
        let name = if name.trim().is_empty() {
            format!("Route {}", now.format("%Y-%m-%d"))
        } else {
            name.to_string()
        };

        let route = SavedRoute {
            id: format!("route_{}", Uuid::new_v4().simple()),
            name,
            created_at: now,
            updated_at: now,
            waypoints: waypoints
                .iter()
                .enumerate()
                .map(|(i, p)| Waypoint {
                    lat: p.lat,
                    lng: p.lng,
                    order: i as u32,
                })
                .collect(),
            metadata,
            encoded_path,
        };

        self.repo.insert(&route)?;
        info!(
            "[RoutePersistence] Saved '{}' as {} ({} stops, {:.2} km)",
            route.name,
            route.id,
            route.waypoints.len(),
            route.metadata.distance_km
        );
        Ok(route)
    }

    /// Save the routed state of an editor snapshot.
    pub fn save_snapshot(
        &mut self,
        snapshot: &RouteSnapshot,
        travel_mode: TravelMode,
        name: &str,
    ) -> Result<SavedRoute> {
        self.save(
            &snapshot.waypoints,
            RouteMetadata::from_snapshot(snapshot, travel_mode),
            snapshot.encoded_path.clone(),
            name,
        )
    }

    /// Save a stopped recording with its track as the waypoint sequence.
    pub fn save_activity(
        &mut self,
        activity: &TrackedActivity,
        travel_mode: TravelMode,
        name: &str,
    ) -> Result<SavedRoute> {
        if activity.stopped_at.is_none() {
            return Err(PlannerError::validation(format!(
                "activity {} is still being recorded",
                activity.id
            )));
        }
        self.save(
            &activity.points,
            RouteMetadata::new(activity.distance_meters, activity.elapsed_seconds, travel_mode),
            activity.encoded_track(),
            name,
        )
    }

    pub fn load(&self, id: &str) -> Result<SavedRoute> {
        self.repo.get(id)?.ok_or_not_found(id)
    }

    /// Every saved route, newest first.
    pub fn list(&self) -> Result<Vec<SavedRoute>> {
        self.repo.list_recent()
    }

    pub fn rename(&mut self, id: &str, name: &str) -> Result<SavedRoute> {
        if name.trim().is_empty() {
            return Err(PlannerError::validation("route name cannot be blank"));
        }
        let mut route = self.load(id)?;
        route.name = name.to_string();
        route.updated_at = Utc::now();
        self.repo.update(&route)?;
        Ok(route)
    }

    pub fn delete(&mut self, id: &str) -> Result<()> {
        if self.repo.delete(id)? {
            info!("[RoutePersistence] Deleted {}", id);
            Ok(())
        } else {
            Err(PlannerError::NotFound { id: id.to_string() })
        }
    }
}

impl Default for RoutePersistence<InMemoryRouteRepository> {
    fn default() -> Self {
        Self::new(InMemoryRouteRepository::new())
    }
}

// ============================================================================
// SQLite repository
// ============================================================================

#[cfg(feature = "persistence")]
pub use sqlite::SqliteRouteRepository;

#[cfg(feature = "persistence")]
mod sqlite {
    use super::*;
    use rusqlite::{params, Connection, OptionalExtension};

    /// Columns in SELECT order.
    const COLUMNS: &str = "id, name, created_at, updated_at, waypoints, distance_km, \
                           duration_minutes, travel_mode, encoded_path";

    /// Row as read from SQLite, before decoding.
    struct RawRoute {
        id: String,
        name: String,
        created_at: String,
        updated_at: String,
        waypoints: Vec<u8>,
        distance_km: f64,
        duration_minutes: f64,
        travel_mode: String,
        encoded_path: Option<String>,
    }

    impl RawRoute {
        fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
            Ok(Self {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: row.get(2)?,
                updated_at: row.get(3)?,
                waypoints: row.get(4)?,
                distance_km: row.get(5)?,
                duration_minutes: row.get(6)?,
                travel_mode: row.get(7)?,
                encoded_path: row.get(8)?,
            })
        }

        fn decode(self) -> Result<SavedRoute> {
            Ok(SavedRoute {
                waypoints: rmp_serde::from_slice(&self.waypoints)?,
                created_at: parse_timestamp(&self.created_at)?,
                updated_at: parse_timestamp(&self.updated_at)?,
                metadata: RouteMetadata {
                    distance_km: self.distance_km,
                    duration_minutes: self.duration_minutes,
                    travel_mode: self
                        .travel_mode
                        .parse()
                        .map_err(PlannerError::persistence)?,
                },
                id: self.id,
                name: self.name,
                encoded_path: self.encoded_path,
            })
        }
    }

    fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| PlannerError::persistence(format!("bad timestamp '{}': {}", raw, e)))
    }

    /// Saved routes in a SQLite database.
    pub struct SqliteRouteRepository {
        db: Connection,
    }

    impl SqliteRouteRepository {
        /// Open (or create) the database at `db_path`.
        pub fn new(db_path: &str) -> Result<Self> {
            let db = Connection::open(db_path)?;
            Self::init_schema(&db)?;
            Ok(Self { db })
        }

        /// Create an in-memory database (for testing).
        pub fn in_memory() -> Result<Self> {
            Self::new(":memory:")
        }

        fn init_schema(conn: &Connection) -> Result<()> {
            conn.execute_batch(
                r#"
                -- Saved routes; seq doubles as the recency index
                CREATE TABLE IF NOT EXISTS saved_routes (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    waypoints BLOB NOT NULL,
                    waypoint_count INTEGER NOT NULL,
                    distance_km REAL NOT NULL,
                    duration_minutes REAL NOT NULL,
                    travel_mode TEXT NOT NULL,
                    encoded_path TEXT
                );

                CREATE INDEX IF NOT EXISTS idx_saved_routes_created ON saved_routes(created_at);
            "#,
            )?;
            Ok(())
        }

        /// Number of stored routes.
        pub fn count(&self) -> Result<u32> {
            let count: u32 = self
                .db
                .query_row("SELECT COUNT(*) FROM saved_routes", [], |row| row.get(0))?;
            Ok(count)
        }
    }

    impl RouteRepository for SqliteRouteRepository {
        fn insert(&mut self, route: &SavedRoute) -> Result<()> {
            let blob = rmp_serde::to_vec(&route.waypoints)?;
            self.db.execute(
                "INSERT INTO saved_routes (
                    id, name, created_at, updated_at, waypoints, waypoint_count,
                    distance_km, duration_minutes, travel_mode, encoded_path
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    route.id,
                    route.name,
                    route.created_at.to_rfc3339(),
                    route.updated_at.to_rfc3339(),
                    blob,
                    route.waypoints.len() as u32,
                    route.metadata.distance_km,
                    route.metadata.duration_minutes,
                    route.metadata.travel_mode.as_str(),
                    route.encoded_path,
                ],
            )?;
            Ok(())
        }

        fn update(&mut self, route: &SavedRoute) -> Result<()> {
            let blob = rmp_serde::to_vec(&route.waypoints)?;
            let changed = self.db.execute(
                "UPDATE saved_routes SET
                    name = ?, created_at = ?, updated_at = ?, waypoints = ?, waypoint_count = ?,
                    distance_km = ?, duration_minutes = ?, travel_mode = ?, encoded_path = ?
                 WHERE id = ?",
                params![
                    route.name,
                    route.created_at.to_rfc3339(),
                    route.updated_at.to_rfc3339(),
                    blob,
                    route.waypoints.len() as u32,
                    route.metadata.distance_km,
                    route.metadata.duration_minutes,
                    route.metadata.travel_mode.as_str(),
                    route.encoded_path,
                    route.id,
                ],
            )?;
            if changed == 0 {
                return Err(PlannerError::NotFound {
                    id: route.id.clone(),
                });
            }
            Ok(())
        }

        fn get(&self, id: &str) -> Result<Option<SavedRoute>> {
            let raw = self
                .db
                .query_row(
                    &format!("SELECT {} FROM saved_routes WHERE id = ?", COLUMNS),
                    params![id],
                    RawRoute::from_row,
                )
                .optional()?;
            raw.map(RawRoute::decode).transpose()
        }

        fn list_recent(&self) -> Result<Vec<SavedRoute>> {
            let mut stmt = self
                .db
                .prepare(&format!("SELECT {} FROM saved_routes ORDER BY seq DESC", COLUMNS))?;
            let raws = stmt
                .query_map([], RawRoute::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            raws.into_iter().map(RawRoute::decode).collect()
        }

        fn delete(&mut self, id: &str) -> Result<bool> {
            let removed = self
                .db
                .execute("DELETE FROM saved_routes WHERE id = ?", params![id])?;
            Ok(removed > 0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn morning_ride() -> (Vec<GeoPoint>, RouteMetadata) {
        (
            vec![
                GeoPoint::new(16.7516, -93.1029),
                GeoPoint::new(16.7600, -93.1100),
            ],
            RouteMetadata::new(5000.0, 900.0, TravelMode::Bicycling),
        )
    }

    fn assert_round_trip<R: RouteRepository>(persistence: &mut RoutePersistence<R>) {
        let (points, metadata) = morning_ride();
        let saved = persistence
            .save(&points, metadata, Some("enc123".to_string()), "Morning Ride")
            .unwrap();

        let listed = persistence.list().unwrap();
        assert_eq!(listed[0].id, saved.id);

        let loaded = persistence.load(&saved.id).unwrap();
        assert_eq!(loaded.points(), points);
        assert_eq!(loaded.metadata, metadata);
        assert_eq!(loaded.encoded_path.as_deref(), Some("enc123"));
        assert_eq!(loaded.name, "Morning Ride");
        assert_eq!(loaded, saved);
    }

    #[test]
    fn test_metadata_units() {
        let (_, metadata) = morning_ride();
        assert_eq!(metadata.distance_km, 5.0);
        assert_eq!(metadata.duration_minutes, 15.0);
        assert_eq!(metadata.distance_meters(), 5000.0);
        assert_eq!(metadata.duration_seconds(), 900.0);
    }

    #[test]
    fn test_in_memory_round_trip() {
        let mut persistence = RoutePersistence::default();
        assert_round_trip(&mut persistence);
    }

    #[test]
    fn test_save_requires_two_waypoints() {
        let mut persistence = RoutePersistence::default();
        let (points, metadata) = morning_ride();
        let result = persistence.save(&points[..1], metadata, None, "Too short");
        assert!(matches!(result, Err(PlannerError::Validation { .. })));
        assert!(persistence.list().unwrap().is_empty());
    }

    #[test]
    fn test_list_newest_first() {
        let mut persistence = RoutePersistence::default();
        let (points, metadata) = morning_ride();
        let a = persistence.save(&points, metadata, None, "A").unwrap();
        let b = persistence.save(&points, metadata, None, "B").unwrap();
        let c = persistence.save(&points, metadata, None, "C").unwrap();

        let ids: Vec<String> = persistence.list().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![c.id, b.id, a.id]);
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let persistence = RoutePersistence::default();
        assert!(matches!(
            persistence.load("route_missing"),
            Err(PlannerError::NotFound { .. })
        ));
    }

    #[test]
    fn test_blank_name_gets_default() {
        let mut persistence = RoutePersistence::default();
        let (points, metadata) = morning_ride();
        let saved = persistence.save(&points, metadata, None, "  ").unwrap();
        assert!(saved.name.starts_with("Route "));
        assert!(saved.id.starts_with("route_"));
    }

    #[test]
    fn test_rename_and_delete() {
        let mut persistence = RoutePersistence::default();
        let (points, metadata) = morning_ride();
        let first = persistence.save(&points, metadata, None, "First").unwrap();
        let second = persistence.save(&points, metadata, None, "Second").unwrap();

        let renamed = persistence.rename(&first.id, "Renamed").unwrap();
        assert_eq!(renamed.name, "Renamed");
        assert!(renamed.updated_at >= first.updated_at);
        assert_eq!(renamed.created_at, first.created_at);

        // Rename keeps recency position
        let ids: Vec<String> = persistence.list().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![second.id.clone(), first.id.clone()]);

        persistence.delete(&second.id).unwrap();
        assert_eq!(persistence.list().unwrap().len(), 1);
        assert!(matches!(
            persistence.delete(&second.id),
            Err(PlannerError::NotFound { .. })
        ));
    }

    #[test]
    fn test_points_sorted_by_order() {
        let route = SavedRoute {
            id: "route_x".to_string(),
            name: "x".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            waypoints: vec![
                Waypoint { lat: 2.0, lng: 2.0, order: 1 },
                Waypoint { lat: 1.0, lng: 1.0, order: 0 },
            ],
            metadata: RouteMetadata::new(0.0, 0.0, TravelMode::Bicycling),
            encoded_path: None,
        };
        assert_eq!(
            route.points(),
            vec![GeoPoint::new(1.0, 1.0), GeoPoint::new(2.0, 2.0)]
        );
    }

    #[test]
    fn test_json_shape() {
        let mut persistence = RoutePersistence::default();
        let (points, metadata) = morning_ride();
        let saved = persistence.save(&points, metadata, None, "Morning Ride").unwrap();
        let json = serde_json::to_value(&saved).unwrap();
        assert!(json.get("createdAt").is_some());
        assert_eq!(json["metadata"]["travelMode"], "BICYCLING");
        assert_eq!(json["waypoints"][1]["order"], 1);
    }

    #[test]
    fn test_save_stopped_activity() {
        use crate::tracker::{LiveTracker, PositionSample};

        let mut tracker = LiveTracker::default();
        tracker.start(Utc::now()).unwrap();
        tracker.on_position(PositionSample::new(16.7516, -93.1029, 0)).unwrap();
        tracker.on_position(PositionSample::new(16.7600, -93.1100, 1000)).unwrap();
        tracker.tick(600.0);

        let mut persistence = RoutePersistence::default();
        let recording = tracker.activity().unwrap().clone();
        assert!(persistence
            .save_activity(&recording, TravelMode::Bicycling, "Live")
            .is_err());

        let activity = tracker.stop(Utc::now()).unwrap();
        let saved = persistence
            .save_activity(&activity, TravelMode::Bicycling, "Live")
            .unwrap();
        assert_eq!(saved.points(), activity.points);
        assert_eq!(saved.metadata.duration_minutes, 10.0);
        assert_eq!(saved.encoded_path, activity.encoded_track());
    }

    #[cfg(feature = "persistence")]
    #[test]
    fn test_sqlite_round_trip() {
        let repo = SqliteRouteRepository::in_memory().unwrap();
        let mut persistence = RoutePersistence::new(repo);
        assert_round_trip(&mut persistence);
        assert_eq!(persistence.repository().count().unwrap(), 1);
    }

    #[cfg(feature = "persistence")]
    #[test]
    fn test_sqlite_recency_and_delete() {
        let repo = SqliteRouteRepository::in_memory().unwrap();
        let mut persistence = RoutePersistence::new(repo);
        let (points, metadata) = morning_ride();
        let a = persistence.save(&points, metadata, None, "A").unwrap();
        let b = persistence.save(&points, metadata, None, "B").unwrap();

        let names: Vec<String> = persistence.list().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["B", "A"]);

        persistence.rename(&a.id, "A2").unwrap();
        assert_eq!(persistence.load(&a.id).unwrap().name, "A2");

        persistence.delete(&b.id).unwrap();
        assert!(matches!(
            persistence.load(&b.id),
            Err(PlannerError::NotFound { .. })
        ));
    }
}
