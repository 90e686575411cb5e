//! AI route proposals.
//!
//! The chatbot answers with free text that should contain a JSON document of
//! the form `{"message": "...", "route": {...} | null}`. This module pulls the
//! JSON out of that text, parses it, and checks the proposal lies inside the
//! service area before it is loaded into an editor.

use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, Result};
use crate::{Bounds, GeoPoint};

fn unnamed() -> String {
    "Unnamed route".to_string()
}

/// A candidate route suggested by the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteProposal {
    #[serde(default = "unnamed")]
    pub name: String,
    pub origin: GeoPoint,
    pub destination: GeoPoint,
    #[serde(default)]
    pub waypoints: Vec<GeoPoint>,
    /// Free-text hints from the assistant, display only
    #[serde(default)]
    pub distance: Option<String>,
    #[serde(default)]
    pub elevation: Option<String>,
    #[serde(default)]
    pub terrain: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl RouteProposal {
    /// Origin, intermediate waypoints, destination.
    pub fn points(&self) -> Vec<GeoPoint> {
        let mut points = Vec::with_capacity(self.waypoints.len() + 2);
        points.push(self.origin);
        points.extend_from_slice(&self.waypoints);
        points.push(self.destination);
        points
    }

    /// Reject proposals whose endpoints fall outside `area` or whose
    /// coordinates are not valid.
    pub fn validate(&self, area: &Bounds) -> Result<()> {
        if let Some(bad) = self.points().iter().find(|p| !p.is_valid()) {
            return Err(PlannerError::validation(format!(
                "proposal has invalid coordinate ({}, {})",
                bad.lat, bad.lng
            )));
        }
        if !area.contains(&self.origin) || !area.contains(&self.destination) {
            return Err(PlannerError::validation(
                "proposed route is outside the service area",
            ));
        }
        Ok(())
    }
}

/// Parsed assistant answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub route: Option<RouteProposal>,
    #[serde(default, skip_serializing)]
    error: Option<serde_json::Value>,
}

impl ProposalResponse {
    /// Parse an assistant reply that may wrap the JSON in prose or code fences.
    pub fn parse(text: &str) -> Result<Self> {
        let json = extract_json(text)?;
        let mut response: ProposalResponse = serde_json::from_str(json)
            .map_err(|e| PlannerError::validation(format!("malformed proposal: {}", e)))?;

        if let Some(err) = response.error.take() {
            response.message = match err {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            response.route = None;
        }
        Ok(response)
    }

    /// The proposal, if any, after checking it against the service area.
    pub fn validated_route(&self, area: &Bounds) -> Result<Option<&RouteProposal>> {
        match &self.route {
            Some(route) => {
                route.validate(area)?;
                Ok(Some(route))
            }
            None => Ok(None),
        }
    }
}

/// Slice from the first `{` to the last `}`. Prose and code fences around
/// the object fall outside the slice.
fn extract_json(text: &str) -> Result<&str> {
    let start = text.find('{');
    let end = text.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if end > start => Ok(text[start..=end].trim()),
        _ => Err(PlannerError::validation("no JSON object found in reply")),
    }
}
