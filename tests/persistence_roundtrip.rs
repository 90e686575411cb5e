//! Saved-route integration tests.
//!
//! Covers the save -> list -> load path against both repositories, including
//! reopening a SQLite database file.
//!
//! Run with: `cargo test --test persistence_roundtrip`

use std::future::Future;

use route_planner::{
    GeoPoint, PlannerError, RouteEditor, RouteMetadata, RoutePersistence, RouteRepository,
    RouteRequest, RouteStatus, RoutedPath, RoutingFailure, RoutingProvider, StraightLineRouter,
    TravelMode,
};
use tempfile::TempDir;

#[cfg(feature = "persistence")]
use route_planner::SqliteRouteRepository;

fn morning_ride() -> (Vec<GeoPoint>, RouteMetadata) {
    (
        vec![
            GeoPoint::new(16.7516, -93.1029),
            GeoPoint::new(16.7550, -93.1060),
            GeoPoint::new(16.7600, -93.1100),
        ],
        RouteMetadata::new(5000.0, 900.0, TravelMode::Bicycling),
    )
}

fn save_and_check<R: RouteRepository>(persistence: &mut RoutePersistence<R>) -> String {
    let (points, metadata) = morning_ride();
    let saved = persistence
        .save(&points, metadata, Some("enc123".to_string()), "Morning Ride")
        .expect("save failed");

    let first = persistence.list().expect("list failed").remove(0);
    assert_eq!(first.id, saved.id, "newest route should be listed first");

    let loaded = persistence.load(&saved.id).expect("load failed");
    assert_eq!(loaded.points(), points);
    assert_eq!(loaded.metadata.distance_meters(), 5000.0);
    assert_eq!(loaded.metadata.duration_seconds(), 900.0);
    assert_eq!(loaded.metadata.travel_mode, TravelMode::Bicycling);
    assert_eq!(loaded.encoded_path.as_deref(), Some("enc123"));
    assert_eq!(loaded.name, "Morning Ride");
    saved.id
}

// ============================================================================
// Test: Morning Ride round trip
// ============================================================================

#[test]
fn test_morning_ride_in_memory() {
    let mut persistence = RoutePersistence::default();
    save_and_check(&mut persistence);
}

#[cfg(feature = "persistence")]
#[test]
fn test_morning_ride_sqlite_survives_reopen() {
    let _ = env_logger::builder().is_test(true).try_init();
    let tmp_dir = TempDir::new().expect("failed to create temp dir");
    let db_path = tmp_dir.path().join("routes.db");
    let db_path = db_path.to_str().expect("temp path is not UTF-8");

    let id = {
        let repo = SqliteRouteRepository::new(db_path).expect("failed to open db");
        let mut persistence = RoutePersistence::new(repo);
        save_and_check(&mut persistence)
    };

    let repo = SqliteRouteRepository::new(db_path).expect("failed to reopen db");
    let mut persistence = RoutePersistence::new(repo);
    let loaded = persistence.load(&id).expect("route lost on reopen");
    assert_eq!(loaded.name, "Morning Ride");

    // Newer saves still go to the front after reopening
    let (points, metadata) = morning_ride();
    let evening = persistence
        .save(&points, metadata, None, "Evening Ride")
        .expect("save failed");
    let names: Vec<String> = persistence
        .list()
        .expect("list failed")
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(names, vec!["Evening Ride", "Morning Ride"]);

    persistence.delete(&evening.id).expect("delete failed");
    assert_eq!(persistence.repository().count().expect("count failed"), 1);
}

#[cfg(not(feature = "persistence"))]
#[test]
fn test_tempdir_available() {
    assert!(TempDir::new().is_ok());
}

// ============================================================================
// Test: Validation
// ============================================================================

#[test]
fn test_single_waypoint_is_rejected() {
    let mut persistence = RoutePersistence::default();
    let (points, metadata) = morning_ride();
    let err = persistence
        .save(&points[..1], metadata, None, "Lonely")
        .unwrap_err();
    assert!(matches!(err, PlannerError::Validation { .. }));
    assert!(persistence.list().unwrap().is_empty());
}

#[test]
fn test_invalid_coordinate_is_rejected() {
    let mut persistence = RoutePersistence::default();
    let (_, metadata) = morning_ride();
    let points = vec![GeoPoint::new(16.75, -93.10), GeoPoint::new(f64::NAN, -93.11)];
    assert!(persistence.save(&points, metadata, None, "Broken").is_err());
}

// ============================================================================
// Test: Editor -> persistence -> editor
// ============================================================================

#[tokio::test]
async fn test_edited_route_reloads_in_order() {
    let router = StraightLineRouter::default();
    let mut editor = RouteEditor::default();
    let (points, _) = morning_ride();
    for point in &points {
        editor.click(*point).unwrap();
    }
    editor.sync(&router).await;

    let request = editor.to_save_request().unwrap();
    let mut persistence = RoutePersistence::default();
    let saved = persistence
        .save_snapshot(editor.snapshot().unwrap(), TravelMode::Bicycling, "")
        .unwrap();
    assert!(saved.name.starts_with("Route "));
    assert_eq!(saved.metadata, request.metadata);

    let mut reopened = RouteEditor::default();
    reopened
        .load_saved(&persistence.load(&saved.id).unwrap())
        .unwrap();
    reopened.sync(&router).await;

    let snapshot = reopened.snapshot().unwrap();
    assert_eq!(snapshot.waypoints, points);
    assert!((snapshot.distance_meters - request.metadata.distance_meters()).abs() < 1e-6);
}

/// Provider that is always unreachable.
struct OfflineRouter;

impl RoutingProvider for OfflineRouter {
    fn route(
        &self,
        _request: &RouteRequest,
    ) -> impl Future<Output = Result<RoutedPath, RoutingFailure>> {
        std::future::ready(Err(RoutingFailure::Transport("offline".to_string())))
    }
}

#[tokio::test]
async fn test_loaded_route_shows_saved_figures_until_recalculated() {
    let mut persistence = RoutePersistence::default();
    let (points, metadata) = morning_ride();
    let saved = persistence
        .save(&points, metadata, Some("enc123".to_string()), "Morning Ride")
        .unwrap();
    let saved = persistence.load(&saved.id).unwrap();

    let mut editor = RouteEditor::default();
    editor.load_saved(&saved).unwrap();
    {
        let snapshot = editor.snapshot().expect("saved figures not restored");
        assert_eq!(snapshot.waypoints, points);
        assert_eq!(snapshot.distance_meters, 5000.0);
        assert_eq!(snapshot.duration_seconds, 900.0);
        assert_eq!(snapshot.encoded_path.as_deref(), Some("enc123"));
    }
    assert_eq!(editor.status(), RouteStatus::Calculating);

    // Provider down: the stored route stays on screen
    editor.sync(&OfflineRouter).await;
    assert!(matches!(editor.status(), RouteStatus::Failed(_)));
    assert_eq!(editor.snapshot().unwrap().distance_meters, 5000.0);
    assert_eq!(editor.snapshot().unwrap().encoded_path.as_deref(), Some("enc123"));

    // A successful recalculation replaces the stored figures
    editor.load_saved(&saved).unwrap();
    editor.sync(&StraightLineRouter::default()).await;
    assert_eq!(editor.status(), RouteStatus::Ready);
    let snapshot = editor.snapshot().unwrap();
    assert_eq!(snapshot.waypoints, points);
    assert!(snapshot.distance_meters < 5000.0);
    assert_ne!(snapshot.encoded_path.as_deref(), Some("enc123"));
}
