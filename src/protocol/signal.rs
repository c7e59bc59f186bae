//! Signals: events and replies pushed by the simulation server.
//!
//! A signal either carries the `request_id` of an outstanding action (it is
//! that action's reply) or arrives unsolicited (ticks, broadcast entity
//! updates).
//!
//! # Format
//!
//! ```json
//! {
//!   "signal": "simulation.started",
//!   "data": { "tick_rate": 60, "speed": 1.0 },
//!   "request_id": "uuid"
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

use super::types::{
    AgentRef, AgentSnapshot, AgentState, BuildingState, DeliveryUrgency, Empty, Extra, Graph,
    MapSettings, Priority, SimulationParams,
};
use super::validate::{Validate, ValidationError, Validator};

// ============================================================================
// Signal Table
// ============================================================================

protocol_table! {
    /// Closed set of signal names.
    names SignalName;
    /// A signal with its typed data.
    payloads Signal;

    /// Simulation clock started.
    SimulationStarted => "simulation.started" (SimulationParams),
    /// Simulation stopped.
    SimulationStopped => "simulation.stopped" (Empty),
    /// Simulation resumed.
    SimulationResumed => "simulation.resumed" (Empty),
    /// Simulation paused.
    SimulationPaused => "simulation.paused" (Empty),
    /// Playback settings changed.
    SimulationUpdated => "simulation.updated" (SimulationParams),
    /// A tick began.
    TickStart => "tick.start" (TickData),
    /// A tick finished.
    TickEnd => "tick.end" (TickData),
    /// A map was generated.
    MapCreated => "map.created" (MapCreated),
    /// An agent was created.
    AgentCreated => "agent.created" (AgentSnapshot),
    /// An agent's state changed.
    AgentUpdated => "agent.updated" (AgentState),
    /// An agent was removed.
    AgentDeleted => "agent.deleted" (AgentRef),
    /// Every agent, in reply to `agent.list`.
    AgentListed => "agent.listed" (AgentListed),
    /// One agent, in reply to `agent.describe`.
    AgentDescribed => "agent.described" (AgentSnapshot),
    /// A building's state changed.
    BuildingUpdated => "building.updated" (BuildingUpdated),
    /// A site generated a package.
    PackageCreated => "package.created" (PackageCreated),
    /// Map export finished.
    MapExported => "map.exported" (FileExported),
    /// Map import finished.
    MapImported => "map.imported" (FileImported),
    /// State export finished.
    SimulationStateExported => "simulation.state_exported" (FileExported),
    /// State import finished.
    SimulationStateImported => "simulation.state_imported" (FileImported),
    /// The server rejected an action or hit an internal error.
    Error => "error" (ErrorData),
}

// ============================================================================
// Data Records
// ============================================================================

/// Data of `tick.start` and `tick.end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickData {
    pub tick: u64,
    /// Simulated seconds since the start of the day.
    pub time: f64,
    pub day: u64,
}

impl Validate for TickData {
    fn validate(&self, v: &mut Validator) {
        v.non_negative("time", self.time);
    }
}

/// Data of `map.created`: the settings echo, generation summary and graph.
///
/// Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapCreated {
    #[serde(flatten)]
    pub settings: MapSettings,
    pub generated_nodes: u64,
    pub generated_edges: u64,
    pub generated_sites: u64,
    pub generated_parkings: u64,
    pub graph: Graph,
}

impl Validate for MapCreated {
    fn validate(&self, v: &mut Validator) {
        self.settings.validate(v);
        v.record("graph", &self.graph);
    }
}

/// Data of `agent.listed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentListed {
    pub total: u64,
    pub agents: Vec<AgentSnapshot>,
    pub tick: u64,
}

impl Validate for AgentListed {
    fn validate(&self, v: &mut Validator) {
        v.each("agents", &self.agents);
    }
}

/// Data of `building.updated`. Extras kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingUpdated {
    pub building_id: String,
    pub building: BuildingState,
    pub tick: u64,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Validate for BuildingUpdated {
    fn validate(&self, v: &mut Validator) {
        v.record("building", &self.building);
    }
}

/// Data of `package.created`. Extras kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageCreated {
    pub package_id: String,
    pub origin_building_id: String,
    pub destination_building_id: String,
    pub size: f64,
    pub value_currency: f64,
    pub priority: Priority,
    pub urgency: DeliveryUrgency,
    pub pickup_deadline_tick: u64,
    pub delivery_deadline_tick: u64,
    pub created_at_tick: u64,
    pub tick: u64,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Validate for PackageCreated {
    fn validate(&self, v: &mut Validator) {
        v.non_negative("size", self.size);
        v.non_negative("value_currency", self.value_currency);
    }
}

/// Data of `map.exported` and `simulation.state_exported`.
///
/// `file_content` is the file's bytes, base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileExported {
    pub filename: String,
    pub file_content: String,
}

impl FileExported {
    /// Decodes `file_content` to bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Base64`] if the content is not valid base64.
    pub fn decode_content(&self) -> Result<Vec<u8>> {
        Ok(BASE64.decode(&self.file_content)?)
    }
}

impl Validate for FileExported {
    fn validate(&self, _v: &mut Validator) {}
}

/// Data of `map.imported` and `simulation.state_imported`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileImported {
    pub filename: String,
}

impl Validate for FileImported {
    fn validate(&self, _v: &mut Validator) {}
}

/// Data of `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    pub code: String,
    pub message: String,
}

impl Validate for ErrorData {
    fn validate(&self, _v: &mut Validator) {}
}

// ============================================================================
// SignalEnvelope
// ============================================================================

/// A decoded, validated signal frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalEnvelope {
    /// Name and data.
    pub signal: Signal,
    /// Correlation id, present on replies.
    pub request_id: Option<RequestId>,
}

impl SignalEnvelope {
    /// Creates an envelope.
    #[inline]
    #[must_use]
    pub fn new(signal: Signal, request_id: Option<RequestId>) -> Self {
        Self { signal, request_id }
    }

    /// Returns the signal name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> SignalName {
        self.signal.name()
    }

    /// Returns `true` for the `error` signal.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self.signal, Signal::Error(_))
    }

    /// Turns an `error` reply into [`Error::Server`]; passes anything else through.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Server`] if this is an `error` signal.
    pub fn into_reply(self) -> Result<Self> {
        match self.signal {
            Signal::Error(data) => Err(Error::server(data.code, data.message)),
            _ => Ok(self),
        }
    }

    /// Serializes the envelope to a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Serialize for SignalEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let len = if self.request_id.is_some() { 3 } else { 2 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("signal", &self.signal.name())?;
        map.serialize_entry("data", &self.signal)?;
        if let Some(request_id) = &self.request_id {
            map.serialize_entry("request_id", request_id)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SignalEnvelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        decode_signal(&raw).map_err(D::Error::custom)
    }
}

// ============================================================================
// Decode
// ============================================================================

/// Reads the optional `request_id` of an envelope object.
pub(crate) fn request_id_field(
    object: &Map<String, Value>,
) -> std::result::Result<Option<RequestId>, ValidationError> {
    match object.get("request_id") {
        None => Ok(None),
        Some(Value::String(id)) => Ok(Some(RequestId::new(id.as_str()))),
        Some(_) => Err(ValidationError::single("request_id", "expected a string")),
    }
}

/// Decodes and validates an untrusted signal frame.
///
/// The `signal` discriminant is resolved first; `data` is then checked
/// against that signal's schema only.
///
/// # Errors
///
/// Returns a [`ValidationError`] for an unknown name, a malformed envelope,
/// or data that fails its schema.
pub fn decode_signal(raw: &Value) -> std::result::Result<SignalEnvelope, ValidationError> {
    let object = raw
        .as_object()
        .ok_or_else(|| ValidationError::single("", "expected an object"))?;

    let name = match object.get("signal") {
        Some(Value::String(name)) => SignalName::parse(name)
            .ok_or_else(|| ValidationError::single("signal", format!("unknown signal `{name}`")))?,
        Some(_) => return Err(ValidationError::single("signal", "expected a string")),
        None => return Err(ValidationError::single("signal", "missing field")),
    };

    let request_id = request_id_field(object)?;

    let data = object
        .get("data")
        .ok_or_else(|| ValidationError::single("data", "missing field"))?;
    if !data.is_object() {
        return Err(ValidationError::single("data", "expected an object"));
    }
    let signal =
        Signal::from_value(name, data.clone()).map_err(|e| ValidationError::from_serde("data", &e))?;
    Validator::check("data", &signal)?;

    Ok(SignalEnvelope { signal, request_id })
}

/// Parses a text frame and decodes it as a signal.
///
/// # Errors
///
/// Returns [`Error::Json`] for malformed JSON, [`Error::Validation`] otherwise.
pub fn decode_signal_str(text: &str) -> Result<SignalEnvelope> {
    let raw: Value = serde_json::from_str(text)?;
    decode_signal(&raw).map_err(Error::from)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::{Building, GraphIndex, RoadClass};
    use serde_json::json;

    pub(crate) fn truck_snapshot() -> Value {
        json!({
            "id": "t1",
            "kind": "truck",
            "inbox_count": 0,
            "outbox_count": 0,
            "tags": {},
            "max_speed_kph": 80,
            "current_speed_kph": 0,
            "current_node": "n1",
            "current_edge": null,
            "edge_progress_m": 0,
            "route": [],
            "destination": null,
            "route_start_node": null,
            "route_end_node": null,
            "current_building_id": null
        })
    }

    fn map_created() -> Value {
        let mut data = serde_json::to_value(MapSettings::default()).expect("serialize");
        let extra = json!({
            "generated_nodes": 2,
            "generated_edges": 1,
            "generated_sites": 1,
            "generated_parkings": 0,
            "graph": {
                "nodes": [
                    { "id": "n1", "x": 100, "y": 100, "buildings": [
                        { "id": "s1", "type": "site", "name": "Depot", "activity_rate": 2.0 }
                    ] },
                    { "id": "n2", "x": 900, "y": 900 }
                ],
                "edges": [{
                    "id": "e1", "from_node": "n1", "to_node": "n2", "length_m": 1000,
                    "mode": 0, "road_class": "A", "lanes": 2, "max_speed_kph": 100,
                    "weight_limit_kg": null
                }]
            }
        });
        for (key, value) in extra.as_object().expect("object") {
            data[key] = value.clone();
        }
        data
    }

    #[test]
    fn test_decode_simulation_started() {
        let envelope = decode_signal(&json!({
            "signal": "simulation.started",
            "data": { "tick_rate": 30, "speed": 1.0 },
            "request_id": "req-1"
        }))
        .expect("valid");

        assert_eq!(envelope.name(), SignalName::SimulationStarted);
        assert_eq!(envelope.request_id, Some(RequestId::new("req-1")));
        assert_eq!(
            envelope.signal,
            Signal::SimulationStarted(SimulationParams {
                tick_rate: 30,
                speed: 1.0
            })
        );
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let err = decode_signal(&json!({
            "signal": "simulation.started",
            "data": { "wrong_field": 123 }
        }))
        .expect_err("missing tick_rate");
        assert!(err.has_issue_at("data"));
    }

    #[test]
    fn test_unknown_signal_is_rejected() {
        let err = decode_signal(&json!({ "signal": "totally.unknown", "data": {} }))
            .expect_err("unknown");
        assert!(err.has_issue_at("signal"));
    }

    #[test]
    fn test_non_object_data_is_rejected() {
        let err = decode_signal(&json!({ "signal": "simulation.started", "data": [60, 1.0] }))
            .expect_err("array data");
        assert!(err.has_issue_at("data"));

        for data in [json!([]), json!(null), json!("paused")] {
            let err = decode_signal(&json!({ "signal": "simulation.paused", "data": data }))
                .expect_err("non-object data");
            assert!(err.has_issue_at("data"));
        }
    }

    #[test]
    fn test_truck_snapshot_decodes() {
        let envelope = decode_signal(&json!({ "signal": "agent.created", "data": truck_snapshot() }))
            .expect("truck");

        let Signal::AgentCreated(AgentSnapshot::Truck(truck)) = envelope.signal else {
            panic!("expected truck snapshot");
        };
        assert_eq!(truck.current_node, Some(GraphIndex::Id("n1".into())));
        assert_eq!(truck.current_edge, None);
    }

    #[test]
    fn test_truck_snapshot_requires_nullable_keys() {
        let mut data = truck_snapshot();
        data.as_object_mut().expect("object").remove("destination");
        assert!(decode_signal(&json!({ "signal": "agent.created", "data": data })).is_err());
    }

    #[test]
    fn test_agent_kind_outside_union_is_rejected() {
        let mut data = truck_snapshot();
        data["kind"] = json!("drone");
        assert!(decode_signal(&json!({ "signal": "agent.created", "data": data })).is_err());
    }

    #[test]
    fn test_negative_count_is_rejected() {
        let err = decode_signal(&json!({
            "signal": "tick.start",
            "data": { "tick": -1, "time": 0.0, "day": 0 }
        }))
        .expect_err("negative tick");
        assert!(err.has_issue_at("data"));
    }

    #[test]
    fn test_tick_time_bound() {
        let err = decode_signal(&json!({
            "signal": "tick.end",
            "data": { "tick": 1, "time": -0.5, "day": 0 }
        }))
        .expect_err("negative time");
        assert!(err.has_issue_at("data.time"));
    }

    #[test]
    fn test_map_created_decodes_graph() {
        let envelope = decode_signal(&json!({ "signal": "map.created", "data": map_created() }))
            .expect("map");

        let Signal::MapCreated(map) = envelope.signal else {
            panic!("expected map.created");
        };
        assert_eq!(map.graph.nodes.len(), 2);
        assert!(matches!(map.graph.nodes[0].buildings[0], Building::Site(_)));
        assert!(map.graph.nodes[1].buildings.is_empty());
        assert_eq!(map.graph.edges[0].road_class, RoadClass::A);
        assert_eq!(map.settings.seed, 42);
    }

    #[test]
    fn test_map_created_is_strict() {
        let mut data = map_created();
        data["surprise"] = json!(1);
        let err = decode_signal(&json!({ "signal": "map.created", "data": data }))
            .expect_err("strict");
        assert!(err.has_issue_at("data.surprise"));
    }

    #[test]
    fn test_map_created_reports_nested_paths() {
        let mut data = map_created();
        data["graph"]["edges"][0]["lanes"] = json!(0);
        data["gridness"] = json!(1.5);
        let err = decode_signal(&json!({ "signal": "map.created", "data": data }))
            .expect_err("two violations");
        assert!(err.has_issue_at("data.graph.edges[0].lanes"));
        assert!(err.has_issue_at("data.gridness"));
    }

    #[test]
    fn test_agent_updated_broker() {
        let envelope = decode_signal(&json!({
            "signal": "agent.updated",
            "data": {
                "id": "b1", "kind": "broker", "balance_ducats": 100.0, "queue_size": 2,
                "assigned_count": 1, "has_active_negotiation": false,
                "agent_id": "b1", "tick": 12
            }
        }))
        .expect("broker");
        let Signal::AgentUpdated(state) = envelope.signal else {
            panic!("expected agent.updated");
        };
        assert_eq!(state.agent_id(), "b1");
    }

    #[test]
    fn test_building_updated_tagged_on_type() {
        let envelope = decode_signal(&json!({
            "signal": "building.updated",
            "data": {
                "building_id": "p1",
                "building": { "id": "p1", "type": "parking", "capacity": 10 },
                "tick": 3,
                "note": "kept"
            }
        }))
        .expect("parking");
        let Signal::BuildingUpdated(update) = envelope.signal else {
            panic!("expected building.updated");
        };
        assert_eq!(update.extra.get("note"), Some(&json!("kept")));
        assert!(matches!(update.building, BuildingState::Parking(_)));
    }

    #[test]
    fn test_package_priority_is_closed() {
        let data = json!({
            "package_id": "pk1", "origin_building_id": "s1", "destination_building_id": "s2",
            "size": 1.0, "value_currency": 10.0, "priority": "CRITICAL", "urgency": "EXPRESS",
            "pickup_deadline_tick": 5, "delivery_deadline_tick": 9, "created_at_tick": 1,
            "tick": 1
        });
        assert!(decode_signal(&json!({ "signal": "package.created", "data": data })).is_err());
    }

    #[test]
    fn test_error_reply() {
        let envelope = decode_signal(&json!({
            "signal": "error",
            "data": { "code": "FAIL", "message": "Something wrong" },
            "request_id": "req-9"
        }))
        .expect("error");
        assert!(envelope.is_error());

        let err = envelope.into_reply().expect_err("server error");
        assert!(matches!(err, Error::Server { ref code, .. } if code == "FAIL"));
    }

    #[test]
    fn test_exported_content_decodes() {
        let data = FileExported {
            filename: "map.bin".into(),
            file_content: "AAEC".into(),
        };
        assert_eq!(data.decode_content().expect("base64"), vec![0, 1, 2]);
    }

    #[test]
    fn test_envelope_serializes_without_absent_id() {
        let envelope = SignalEnvelope::new(Signal::SimulationPaused(Empty {}), None);
        assert_eq!(
            envelope.to_json().expect("serialize"),
            r#"{"signal":"simulation.paused","data":{}}"#
        );
    }

    #[test]
    fn test_every_signal_name_parses() {
        for &name in SignalName::ALL {
            assert_eq!(SignalName::parse(name.as_str()), Some(name));
        }
    }
}
