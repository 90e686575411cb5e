//! HTTP routing provider for OSRM-compatible services.
//!
//! - One `GET /route/v1/{profile}/{lng,lat;...}` per request, stops in the
//!   order given (OSRM never reorders `route` coordinates)
//! - Automatic retry with exponential backoff on 429 and transport errors
//! - Service error codes mapped onto [`RoutingFailure`]

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use log::{debug, info, warn};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::config::RoutingConfig;
use crate::error::{PlannerError, RoutingFailure};
use crate::routing::{RouteLeg, RouteRequest, RoutedPath, RoutingProvider};

/// OSRM response body. Error responses carry only `code` and `message`.
#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    #[serde(default)]
    geometry: Option<String>,
    legs: Vec<OsrmLeg>,
}

#[derive(Debug, Deserialize)]
struct OsrmLeg {
    distance: f64,
    duration: f64,
}

/// Tracks consecutive 429s for backoff
struct Backoff {
    consecutive_429s: AtomicU32,
}

impl Backoff {
    fn new() -> Self {
        Self {
            consecutive_429s: AtomicU32::new(0),
        }
    }

    fn record_success(&self) {
        self.consecutive_429s.store(0, Ordering::Relaxed);
    }

    fn record_429(&self) -> Duration {
        let count = self.consecutive_429s.fetch_add(1, Ordering::Relaxed) + 1;
        // Exponential backoff: 2s, 4s, 8s, 16s max
        let backoff_ms = 1000 * (1u64 << count.min(4));
        Duration::from_millis(backoff_ms)
    }
}

/// Routing provider backed by an OSRM HTTP API.
pub struct OsrmRouter {
    client: Client,
    base_url: String,
    max_retries: u32,
    backoff: Backoff,
}

impl OsrmRouter {
    pub fn new(config: &RoutingConfig) -> crate::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PlannerError::Config {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            backoff: Backoff::new(),
        })
    }

    /// Full request URL for `request`.
    pub fn route_url(&self, request: &RouteRequest) -> String {
        let coordinates = request
            .stops
            .iter()
            .map(|p| format!("{:.6},{:.6}", p.lng, p.lat))
            .collect::<Vec<_>>()
            .join(";");
        format!(
            "{}/route/v1/{}/{}?overview=full&geometries=polyline&steps=false",
            self.base_url,
            request.travel_mode.profile(),
            coordinates
        )
    }

    async fn fetch(&self, request: &RouteRequest) -> Result<RoutedPath, RoutingFailure> {
        if request.stops.len() < 2 {
            return Err(RoutingFailure::InvalidCoordinates(format!(
                "need at least 2 stops, got {}",
                request.stops.len()
            )));
        }

        let url = self.route_url(request);
        let mut retries = 0;

        loop {
            match self.client.get(&url).send().await {
                Ok(resp) => {
                    let status = resp.status();

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        retries += 1;
                        if retries > self.max_retries {
                            warn!(
                                "[OsrmRouter] Request #{} still rate limited after {} retries",
                                request.seq, self.max_retries
                            );
                            return Err(RoutingFailure::RateLimited);
                        }

                        let backoff = self.backoff.record_429();
                        warn!(
                            "[OsrmRouter] 429 for #{}, retry {} after {:?}",
                            request.seq, retries, backoff
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    self.backoff.record_success();
                    // OSRM reports NoRoute etc. with a 400 and a JSON body
                    let response: OsrmResponse = resp.json().await.map_err(|e| {
                        if status.is_success() {
                            RoutingFailure::InvalidResponse(format!("Parse error: {}", e))
                        } else {
                            RoutingFailure::InvalidResponse(format!("HTTP {}", status))
                        }
                    })?;
                    let path = into_path(response, request)?;

                    debug!(
                        "[OsrmRouter] #{}: {} legs, {:.0}m",
                        request.seq,
                        path.legs.len(),
                        path.total_distance_meters()
                    );
                    return Ok(path);
                }
                Err(e) => {
                    retries += 1;
                    if retries > self.max_retries {
                        return Err(RoutingFailure::Transport(e.to_string()));
                    }

                    let backoff = Duration::from_millis(500 * (1u64 << retries.min(5)));
                    warn!(
                        "[OsrmRouter] Error for #{}: {}, retry {} after {:?}",
                        request.seq, e, retries, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

impl RoutingProvider for OsrmRouter {
    async fn route(&self, request: &RouteRequest) -> Result<RoutedPath, RoutingFailure> {
        info!(
            "[OsrmRouter] Routing #{} with {} stops ({})",
            request.seq,
            request.stops.len(),
            request.travel_mode.profile()
        );
        self.fetch(request).await
    }
}

/// Turn an OSRM response into legs between consecutive request stops.
fn into_path(response: OsrmResponse, request: &RouteRequest) -> Result<RoutedPath, RoutingFailure> {
    let message = || response.message.clone().unwrap_or_else(|| response.code.clone());
    match response.code.as_str() {
        "Ok" => {}
        "NoRoute" | "NoSegment" => return Err(RoutingFailure::NoRoute),
        "InvalidQuery" | "InvalidValue" | "InvalidUrl" | "InvalidOptions" => {
            return Err(RoutingFailure::InvalidCoordinates(message()))
        }
        _ => return Err(RoutingFailure::InvalidResponse(message())),
    }

    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or(RoutingFailure::NoRoute)?;

    if route.legs.len() + 1 != request.stops.len() {
        return Err(RoutingFailure::InvalidResponse(format!(
            "expected {} legs, got {}",
            request.stops.len().saturating_sub(1),
            route.legs.len()
        )));
    }

    let legs = route
        .legs
        .iter()
        .zip(request.stops.windows(2))
        .map(|(leg, pair)| RouteLeg {
            start: pair[0],
            end: pair[1],
            distance_meters: leg.distance,
            duration_seconds: leg.duration,
        })
        .collect();

    Ok(RoutedPath {
        legs,
        encoded_path: route.geometry,
    })
}
