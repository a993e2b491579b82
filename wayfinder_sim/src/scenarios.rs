//! Navigation scenarios for the harness.

use serde::Serialize;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// WF-001: Visitor follows the route within the threshold
    OnRoute,

    /// WF-002: Visitor leaves the route, reroute clears the deviation
    DetourReroute,

    /// WF-003: Terminate and register on a different map
    MapSwitch,

    /// WF-004: Events and fetches that complete after terminate
    LateEvent,

    /// WF-005: Live stream drops and is reopened with backoff
    StreamDropout,

    /// WF-006: Garbage interleaved with valid positions
    MalformedStream,

    /// WF-007: Crowd density grid with broken entries
    CrowdHeatmap,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::OnRoute,
            ScenarioId::DetourReroute,
            ScenarioId::MapSwitch,
            ScenarioId::LateEvent,
            ScenarioId::StreamDropout,
            ScenarioId::MalformedStream,
            ScenarioId::CrowdHeatmap,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::OnRoute => "on_route",
            ScenarioId::DetourReroute => "detour_reroute",
            ScenarioId::MapSwitch => "map_switch",
            ScenarioId::LateEvent => "late_event",
            ScenarioId::StreamDropout => "stream_dropout",
            ScenarioId::MalformedStream => "malformed_stream",
            ScenarioId::CrowdHeatmap => "crowd_heatmap",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::OnRoute => "Noisy walk along the route, no deviation expected",
            ScenarioId::DetourReroute => "60px detour raises deviation once, reroute clears it",
            ScenarioId::MapSwitch => "Terminate, re-register on a new map, verify clean state",
            ScenarioId::LateEvent => "Position and route response arrive after terminate",
            ScenarioId::StreamDropout => "Transport error, failed reopen, then recovery",
            ScenarioId::MalformedStream => "30% garbage payloads, valid positions still applied",
            ScenarioId::CrowdHeatmap => "Random density grid, broken entries skipped",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "on_route" | "onroute" | "wf-001" => Ok(ScenarioId::OnRoute),
            "detour_reroute" | "detour" | "wf-002" => Ok(ScenarioId::DetourReroute),
            "map_switch" | "mapswitch" | "wf-003" => Ok(ScenarioId::MapSwitch),
            "late_event" | "lateevent" | "wf-004" => Ok(ScenarioId::LateEvent),
            "stream_dropout" | "dropout" | "wf-005" => Ok(ScenarioId::StreamDropout),
            "malformed_stream" | "malformed" | "wf-006" => Ok(ScenarioId::MalformedStream),
            "crowd_heatmap" | "heatmap" | "wf-007" => Ok(ScenarioId::CrowdHeatmap),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
        }
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }
}
