//! Actions: requests from the client to the simulation server.
//!
//! # Format
//!
//! ```json
//! {
//!   "action": "simulation.start",
//!   "params": { "tick_rate": 60, "speed": 1.0 },
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
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

use super::types::{
    AgentKind, AgentPatch, AgentRef, AgentSpec, Empty, Extra, MapSettings, SimulationParams,
};
use super::validate::{Validate, ValidationError, Validator};

// ============================================================================
// Action Table
// ============================================================================

protocol_table! {
    /// Closed set of action names.
    names ActionName;
    /// An action with its typed params.
    payloads Action;

    /// Start the simulation clock.
    SimulationStart => "simulation.start" (SimulationParams),
    /// Stop the simulation and reset the clock.
    SimulationStop => "simulation.stop" (Empty),
    /// Resume a paused simulation.
    SimulationResume => "simulation.resume" (Empty),
    /// Pause the simulation.
    SimulationPause => "simulation.pause" (Empty),
    /// Change tick rate or speed of a running simulation.
    SimulationUpdate => "simulation.update" (SimulationParams),
    /// Generate a new map.
    MapCreate => "map.create" (MapSettings),
    /// Create an agent.
    AgentCreate => "agent.create" (AgentCreateParams),
    /// Reconfigure an agent.
    AgentUpdate => "agent.update" (AgentUpdateParams),
    /// Remove an agent.
    AgentDelete => "agent.delete" (AgentRef),
    /// List every agent.
    AgentList => "agent.list" (Empty),
    /// Fetch one agent's snapshot.
    AgentDescribe => "agent.describe" (AgentRef),
    /// Export the current map as a file.
    MapExport => "map.export" (ExportParams),
    /// Replace the current map with an imported file.
    MapImport => "map.import" (ImportParams),
    /// Export the full simulation state as a file.
    SimulationExportState => "simulation.export_state" (ExportParams),
    /// Restore the simulation state from a file.
    SimulationImportState => "simulation.import_state" (ImportParams),
}

// ============================================================================
// Action - Constructors
// ============================================================================

impl Action {
    /// `simulation.start`.
    #[must_use]
    pub fn start(tick_rate: u32, speed: f64) -> Self {
        Self::SimulationStart(SimulationParams { tick_rate, speed })
    }

    /// `simulation.update`.
    #[must_use]
    pub fn update(tick_rate: u32, speed: f64) -> Self {
        Self::SimulationUpdate(SimulationParams { tick_rate, speed })
    }

    /// `simulation.stop`.
    #[must_use]
    pub fn stop() -> Self {
        Self::SimulationStop(Empty {})
    }

    /// `simulation.pause`.
    #[must_use]
    pub fn pause() -> Self {
        Self::SimulationPause(Empty {})
    }

    /// `simulation.resume`.
    #[must_use]
    pub fn resume() -> Self {
        Self::SimulationResume(Empty {})
    }

    /// `agent.list`.
    #[must_use]
    pub fn list_agents() -> Self {
        Self::AgentList(Empty {})
    }

    /// `agent.delete`.
    #[must_use]
    pub fn delete_agent(agent_id: impl Into<String>) -> Self {
        Self::AgentDelete(AgentRef::new(agent_id))
    }

    /// `agent.describe`.
    #[must_use]
    pub fn describe_agent(agent_id: impl Into<String>) -> Self {
        Self::AgentDescribe(AgentRef::new(agent_id))
    }
}

// ============================================================================
// Params
// ============================================================================

/// Params of `agent.create`. Extras kept.
///
/// `agent_data` is validated against the arm named by `agent_kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAgentCreate")]
pub struct AgentCreateParams {
    pub agent_id: String,
    pub agent_kind: AgentKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_data: Option<AgentSpec>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl AgentCreateParams {
    /// Creates params for an agent with default configuration.
    #[must_use]
    pub fn new(agent_id: impl Into<String>, agent_kind: AgentKind) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_kind,
            agent_data: None,
            extra: Extra::new(),
        }
    }

    /// Attaches kind-specific configuration.
    #[must_use]
    pub fn with_data(mut self, data: AgentSpec) -> Self {
        self.agent_data = Some(data);
        self
    }
}

/// Wire shape before `agent_data` is resolved against `agent_kind`.
#[derive(Deserialize)]
struct RawAgentCreate {
    agent_id: String,
    agent_kind: AgentKind,
    #[serde(default)]
    agent_data: Option<Value>,
    #[serde(flatten)]
    extra: Extra,
}

impl TryFrom<RawAgentCreate> for AgentCreateParams {
    type Error = String;

    fn try_from(raw: RawAgentCreate) -> std::result::Result<Self, Self::Error> {
        let agent_data = raw
            .agent_data
            .map(|value| AgentSpec::from_value(raw.agent_kind, value))
            .transpose()
            .map_err(|e| format!("agent_data: {e}"))?;

        Ok(Self {
            agent_id: raw.agent_id,
            agent_kind: raw.agent_kind,
            agent_data,
            extra: raw.extra,
        })
    }
}

impl Validate for AgentCreateParams {
    fn validate(&self, v: &mut Validator) {
        if let Some(data) = &self.agent_data {
            if data.kind() != self.agent_kind {
                v.report(
                    "agent_data",
                    format!(
                        "{} data does not match agent_kind {}",
                        data.kind().as_str(),
                        self.agent_kind.as_str()
                    ),
                );
            }
            v.record("agent_data", data);
        }
    }
}

/// Params of `agent.update`. Extras kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentUpdateParams {
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_data: Option<AgentPatch>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Validate for AgentUpdateParams {
    fn validate(&self, v: &mut Validator) {
        if let Some(data) = &self.agent_data {
            v.record("agent_data", data);
        }
    }
}

/// Params of `map.export` and `simulation.export_state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportParams {
    pub filename: String,
}

impl ExportParams {
    /// Creates export params for `filename`.
    #[must_use]
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
        }
    }
}

impl Validate for ExportParams {
    fn validate(&self, v: &mut Validator) {
        v.non_empty("filename", &self.filename);
    }
}

/// Params of `map.import` and `simulation.import_state`.
///
/// `file_content` is the file's bytes, base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportParams {
    pub file_content: String,
    pub filename: String,
}

impl ImportParams {
    /// Encodes raw file bytes for upload.
    #[must_use]
    pub fn from_bytes(filename: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            file_content: BASE64.encode(bytes),
            filename: filename.into(),
        }
    }

    /// Decodes `file_content` back to bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Base64`] if the content is not valid base64.
    pub fn decode_content(&self) -> Result<Vec<u8>> {
        Ok(BASE64.decode(&self.file_content)?)
    }
}

impl Validate for ImportParams {
    fn validate(&self, v: &mut Validator) {
        v.non_empty("file_content", &self.file_content);
        v.non_empty("filename", &self.filename);
    }
}

// ============================================================================
// ActionEnvelope
// ============================================================================

/// An action ready to go on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionEnvelope {
    /// Name and params.
    pub action: Action,
    /// Correlation id echoed by the reply.
    pub request_id: Option<RequestId>,
}

impl ActionEnvelope {
    /// Returns the action name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> ActionName {
        self.action.name()
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

impl Serialize for ActionEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let len = if self.request_id.is_some() { 3 } else { 2 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("action", &self.action.name())?;
        map.serialize_entry("params", &self.action)?;
        if let Some(request_id) = &self.request_id {
            map.serialize_entry("request_id", request_id)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ActionEnvelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        decode_action(&raw).map_err(D::Error::custom)
    }
}

// ============================================================================
// Encode / Decode
// ============================================================================

/// Builds an envelope for `action`, validating its params first.
///
/// # Errors
///
/// Returns a [`ValidationError`] if a param violates its bounds.
pub fn encode_action(
    action: Action,
    request_id: Option<RequestId>,
) -> std::result::Result<ActionEnvelope, ValidationError> {
    Validator::check("params", &action)?;
    Ok(ActionEnvelope { action, request_id })
}

/// Decodes and validates an untrusted action frame.
///
/// The `action` discriminant is resolved first; `params` is then checked
/// against that action's schema only.
///
/// # Errors
///
/// Returns a [`ValidationError`] for an unknown name, a malformed envelope,
/// or params that fail their schema.
pub fn decode_action(raw: &Value) -> std::result::Result<ActionEnvelope, ValidationError> {
    let object = raw
        .as_object()
        .ok_or_else(|| ValidationError::single("", "expected an object"))?;

    let name = match object.get("action") {
        Some(Value::String(name)) => ActionName::parse(name)
            .ok_or_else(|| ValidationError::single("action", format!("unknown action `{name}`")))?,
        Some(_) => return Err(ValidationError::single("action", "expected a string")),
        None => return Err(ValidationError::single("action", "missing field")),
    };

    let request_id = super::signal::request_id_field(object)?;

    let params = object
        .get("params")
        .ok_or_else(|| ValidationError::single("params", "missing field"))?;
    if !params.is_object() {
        return Err(ValidationError::single("params", "expected an object"));
    }
    let action = Action::from_value(name, params.clone())
        .map_err(|e| ValidationError::from_serde("params", &e))?;
    Validator::check("params", &action)?;

    Ok(ActionEnvelope { action, request_id })
}

/// Parses a text frame and decodes it as an action.
///
/// # Errors
///
/// Returns [`Error::Json`] for malformed JSON, [`Error::Validation`] otherwise.
pub fn decode_action_str(text: &str) -> Result<ActionEnvelope> {
    let raw: Value = serde_json::from_str(text)?;
    decode_action(&raw).map_err(Error::from)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::TruckSpec;
    use serde_json::json;

    fn sample(name: ActionName) -> Action {
        match name {
            ActionName::SimulationStart => Action::start(60, 1.0),
            ActionName::SimulationStop => Action::stop(),
            ActionName::SimulationResume => Action::resume(),
            ActionName::SimulationPause => Action::pause(),
            ActionName::SimulationUpdate => Action::update(30, 2.5),
            ActionName::MapCreate => Action::MapCreate(MapSettings::dense_urban()),
            ActionName::AgentCreate => Action::AgentCreate(
                AgentCreateParams::new("t1", AgentKind::Truck).with_data(AgentSpec::Truck(
                    TruckSpec {
                        risk_factor: Some(0.5),
                        capacity: Some(24.0),
                        ..TruckSpec::default()
                    },
                )),
            ),
            ActionName::AgentUpdate => Action::AgentUpdate(AgentUpdateParams {
                agent_id: "t1".into(),
                agent_data: Some(AgentPatch {
                    balance_ducats: Some(10.0),
                    ..AgentPatch::default()
                }),
                extra: Extra::new(),
            }),
            ActionName::AgentDelete => Action::delete_agent("t1"),
            ActionName::AgentList => Action::list_agents(),
            ActionName::AgentDescribe => Action::describe_agent("t1"),
            ActionName::MapExport => Action::MapExport(ExportParams::new("map.bin")),
            ActionName::MapImport => {
                Action::MapImport(ImportParams::from_bytes("map.bin", b"\x00\x01graph"))
            }
            ActionName::SimulationExportState => {
                Action::SimulationExportState(ExportParams::new("state.bin"))
            }
            ActionName::SimulationImportState => {
                Action::SimulationImportState(ImportParams::from_bytes("state.bin", b"state"))
            }
        }
    }

    #[test]
    fn test_every_action_survives_the_wire() {
        for &name in ActionName::ALL {
            let envelope =
                encode_action(sample(name), Some(RequestId::new("req-1"))).expect("valid");
            let text = envelope.to_json().expect("serialize");
            let decoded = decode_action_str(&text).expect("decode");
            assert_eq!(decoded, envelope, "{name}");
        }
    }

    #[test]
    fn test_wire_format() {
        let envelope = encode_action(Action::start(60, 1.0), Some("req-1".into())).expect("valid");
        let value = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(
            value,
            json!({
                "action": "simulation.start",
                "params": { "tick_rate": 60, "speed": 1.0 },
                "request_id": "req-1"
            })
        );

        let bare = encode_action(Action::pause(), None).expect("valid");
        assert_eq!(
            serde_json::to_value(&bare).expect("serialize"),
            json!({ "action": "simulation.pause", "params": {} })
        );
    }

    #[test]
    fn test_names_round_trip() {
        for &name in ActionName::ALL {
            assert_eq!(ActionName::parse(name.as_str()), Some(name));
        }
        assert_eq!(ActionName::parse("agent.get"), None);
    }

    #[test]
    fn test_encode_rejects_out_of_range_params() {
        let err = encode_action(Action::start(0, -1.0), None).expect_err("invalid");
        assert!(err.has_issue_at("params.tick_rate"));
        assert!(err.has_issue_at("params.speed"));
    }

    #[test]
    fn test_decode_unknown_action() {
        let err = decode_action(&json!({ "action": "map.destroy", "params": {} }))
            .expect_err("unknown");
        assert!(err.has_issue_at("action"));
    }

    #[test]
    fn test_decode_requires_params() {
        let err = decode_action(&json!({ "action": "simulation.stop" })).expect_err("missing");
        assert!(err.has_issue_at("params"));
    }

    #[test]
    fn test_decode_rejects_array_params() {
        let err = decode_action(&json!({ "action": "agent.delete", "params": ["t1"] }))
            .expect_err("array params");
        assert!(err.has_issue_at("params"));

        let err = decode_action(&json!({ "action": "simulation.stop", "params": [] }))
            .expect_err("empty array params");
        assert!(err.has_issue_at("params"));
    }

    #[test]
    fn test_map_create_is_strict() {
        let mut params = serde_json::to_value(MapSettings::default()).expect("serialize");
        params["extra_knob"] = json!(true);

        let err = decode_action(&json!({ "action": "map.create", "params": params }))
            .expect_err("strict");
        assert!(err.has_issue_at("params.extra_knob"));
    }

    #[test]
    fn test_map_create_tuple_arity() {
        let mut params = serde_json::to_value(MapSettings::default()).expect("serialize");
        params["urban_activity_rate_range"] = json!([1.0, 2.0, 3.0]);

        assert!(decode_action(&json!({ "action": "map.create", "params": params })).is_err());
    }

    #[test]
    fn test_map_create_permits_inverted_range() {
        let settings = MapSettings {
            gas_station_capacity_range: [50.0, 10.0],
            ..MapSettings::default()
        };
        assert!(encode_action(Action::MapCreate(settings), None).is_ok());
    }

    #[test]
    fn test_agent_create_keeps_extras_and_checks_kind_arm() {
        let decoded = decode_action(&json!({
            "action": "agent.create",
            "params": {
                "agent_id": "b1",
                "agent_kind": "broker",
                "agent_data": { "balance_ducats": 500.0 },
                "region": "north"
            }
        }))
        .expect("valid");

        let Action::AgentCreate(params) = decoded.action else {
            panic!("expected agent.create");
        };
        assert_eq!(params.extra.get("region"), Some(&json!("north")));
        assert!(matches!(params.agent_data, Some(AgentSpec::Broker(_))));

        let err = decode_action(&json!({
            "action": "agent.create",
            "params": {
                "agent_id": "t1",
                "agent_kind": "truck",
                "agent_data": { "risk_factor": 1.5 }
            }
        }))
        .expect_err("risk factor above 1");
        assert!(err.has_issue_at("params.agent_data.risk_factor"));
    }

    #[test]
    fn test_agent_create_rejects_unknown_kind() {
        assert!(
            decode_action(&json!({
                "action": "agent.create",
                "params": { "agent_id": "x", "agent_kind": "plane" }
            }))
            .is_err()
        );
    }

    #[test]
    fn test_mismatched_agent_data_fails_encode() {
        let params = AgentCreateParams::new("t1", AgentKind::Truck)
            .with_data(AgentSpec::Broker(Default::default()));
        let err = encode_action(Action::AgentCreate(params), None).expect_err("mismatch");
        assert!(err.has_issue_at("params.agent_data"));
    }

    #[test]
    fn test_import_requires_content() {
        let err = encode_action(
            Action::MapImport(ImportParams {
                file_content: String::new(),
                filename: "map.bin".into(),
            }),
            None,
        )
        .expect_err("empty content");
        assert!(err.has_issue_at("params.file_content"));
    }

    #[test]
    fn test_import_content_is_base64() {
        let params = ImportParams::from_bytes("state.bin", b"hello");
        assert_eq!(params.file_content, "aGVsbG8=");
        assert_eq!(params.decode_content().expect("decode"), b"hello");
    }

    #[test]
    fn test_request_id_must_be_string() {
        let err = decode_action(&json!({
            "action": "agent.list",
            "params": {},
            "request_id": 7
        }))
        .expect_err("numeric id");
        assert!(err.has_issue_at("request_id"));
    }

    #[test]
    fn test_empty_params_drop_unknown_keys() {
        let decoded = decode_action(&json!({
            "action": "simulation.stop",
            "params": { "force": true }
        }))
        .expect("stripped");
        assert_eq!(decoded.action, Action::stop());
    }
}
