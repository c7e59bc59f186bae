//! Payload records shared by actions and signals.
//!
//! Records marked "extras kept" carry a flattened `extra` map so fields the
//! server adds later survive a decode/encode cycle. Records without it drop
//! unknown keys, except [`MapSettings`] which rejects them.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::validate::{Validate, Validator, nullable};

/// Open-ended key/value bag.
pub type Extra = Map<String, Value>;

// ============================================================================
// Enumerations
// ============================================================================

/// Kind of agent the simulation can host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Freight truck.
    Truck,
    /// Building agent (site, parking, gas station).
    Building,
    /// Freight broker.
    Broker,
}

impl AgentKind {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Truck => "truck",
            Self::Building => "building",
            Self::Broker => "broker",
        }
    }
}

/// Road classification of a graph edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoadClass {
    /// Motorway.
    A,
    /// Expressway.
    S,
    /// Main accelerated road.
    #[serde(rename = "GP")]
    Gp,
    /// Main road.
    G,
    /// Collector road.
    Z,
    /// Local road.
    L,
    /// Access road.
    D,
}

/// Package priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

/// Package delivery urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryUrgency {
    Standard,
    Express,
    SameDay,
}

/// Reference to a graph node or edge: either its string id or its index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GraphIndex {
    /// String id.
    Id(String),
    /// Numeric index.
    Index(serde_json::Number),
}

impl GraphIndex {
    /// Returns the index rendered as a string key.
    #[must_use]
    pub fn to_key(&self) -> String {
        match self {
            Self::Id(id) => id.clone(),
            Self::Index(n) => n.to_string(),
        }
    }
}

// ============================================================================
// Small Records
// ============================================================================

/// Payload with no fields. Unknown keys are dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

impl Validate for Empty {
    fn validate(&self, _v: &mut Validator) {}
}

/// Playback settings (`simulation.start`, `simulation.update` and their replies).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Ticks per second, at least 1.
    pub tick_rate: u32,
    /// Speed multiplier, non-negative.
    pub speed: f64,
}

impl Validate for SimulationParams {
    fn validate(&self, v: &mut Validator) {
        v.min("tick_rate", f64::from(self.tick_rate), 1.0);
        v.non_negative("speed", self.speed);
    }
}

/// Payload naming a single agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRef {
    pub agent_id: String,
}

impl AgentRef {
    /// Creates a reference to `agent_id`.
    #[must_use]
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
        }
    }
}

impl Validate for AgentRef {
    fn validate(&self, _v: &mut Validator) {}
}

// ============================================================================
// MapSettings
// ============================================================================

/// Map generation parameters (`map.create`, echoed by `map.created`).
///
/// Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapSettings {
    pub map_width: f64,
    pub map_height: f64,
    pub num_major_centers: u32,
    pub minor_per_major: f64,
    pub center_separation: f64,
    pub urban_sprawl: f64,
    pub local_density: f64,
    pub rural_density: f64,
    pub intra_connectivity: f64,
    pub inter_connectivity: f64,
    pub arterial_ratio: f64,
    pub gridness: f64,
    pub ring_road_prob: f64,
    pub highway_curviness: f64,
    pub rural_settlement_prob: f64,
    pub urban_sites_per_km2: f64,
    pub rural_sites_per_km2: f64,
    pub urban_parkings_per_km2: f64,
    pub rural_parkings_per_km2: f64,
    pub urban_gas_stations_per_km2: f64,
    pub rural_gas_stations_per_km2: f64,
    pub urban_activity_rate_range: [f64; 2],
    pub rural_activity_rate_range: [f64; 2],
    pub gas_station_capacity_range: [f64; 2],
    pub gas_station_cost_factor_range: [f64; 2],
    pub seed: i64,

    /// Keys that matched no field; any entry fails validation.
    #[serde(flatten)]
    pub(crate) unknown: Extra,
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            map_width: 1000.0,
            map_height: 1000.0,
            num_major_centers: 3,
            minor_per_major: 2.0,
            center_separation: 2500.0,
            urban_sprawl: 800.0,
            local_density: 50.0,
            rural_density: 5.0,
            intra_connectivity: 0.3,
            inter_connectivity: 2.0,
            arterial_ratio: 0.2,
            gridness: 0.3,
            ring_road_prob: 0.1,
            highway_curviness: 0.2,
            rural_settlement_prob: 0.15,
            urban_sites_per_km2: 2.0,
            rural_sites_per_km2: 0.5,
            urban_parkings_per_km2: 2.0,
            rural_parkings_per_km2: 0.5,
            urban_gas_stations_per_km2: 1.0,
            rural_gas_stations_per_km2: 0.2,
            urban_activity_rate_range: [100.0, 400.0],
            rural_activity_rate_range: [50.0, 200.0],
            gas_station_capacity_range: [10.0, 50.0],
            gas_station_cost_factor_range: [1.0, 2.0],
            seed: 42,
            unknown: Extra::new(),
        }
    }
}

impl MapSettings {
    /// Dense urban preset: many centers, tight grid, no rural population.
    #[must_use]
    pub fn dense_urban() -> Self {
        Self {
            num_major_centers: 5,
            local_density: 80.0,
            rural_density: 0.0,
            gridness: 0.7,
            ring_road_prob: 0.1,
            ..Self::default()
        }
    }

    /// Sparse rural preset: few centers, organic roads, scattered villages.
    #[must_use]
    pub fn sparse_rural() -> Self {
        Self {
            num_major_centers: 2,
            local_density: 20.0,
            rural_density: 10.0,
            gridness: 0.0,
            rural_settlement_prob: 0.3,
            ..Self::default()
        }
    }

    /// Suggested export file name, e.g. `map_1000x1000_42`.
    #[must_use]
    pub fn export_filename(&self) -> String {
        format!("map_{}x{}_{}", self.map_width, self.map_height, self.seed)
    }
}

impl Validate for MapSettings {
    fn validate(&self, v: &mut Validator) {
        for key in self.unknown.keys() {
            v.report(key, "unknown field");
        }

        v.positive("map_width", self.map_width);
        v.positive("map_height", self.map_height);
        v.min("num_major_centers", f64::from(self.num_major_centers), 1.0);
        v.non_negative("minor_per_major", self.minor_per_major);
        v.positive("center_separation", self.center_separation);
        v.positive("urban_sprawl", self.urban_sprawl);
        v.positive("local_density", self.local_density);
        v.non_negative("rural_density", self.rural_density);
        v.probability("intra_connectivity", self.intra_connectivity);
        v.min("inter_connectivity", self.inter_connectivity, 1.0);
        v.probability("arterial_ratio", self.arterial_ratio);
        v.probability("gridness", self.gridness);
        v.probability("ring_road_prob", self.ring_road_prob);
        v.probability("highway_curviness", self.highway_curviness);
        v.probability("rural_settlement_prob", self.rural_settlement_prob);
        v.non_negative("urban_sites_per_km2", self.urban_sites_per_km2);
        v.non_negative("rural_sites_per_km2", self.rural_sites_per_km2);
        v.non_negative("urban_parkings_per_km2", self.urban_parkings_per_km2);
        v.non_negative("rural_parkings_per_km2", self.rural_parkings_per_km2);
        v.non_negative("urban_gas_stations_per_km2", self.urban_gas_stations_per_km2);
        v.non_negative("rural_gas_stations_per_km2", self.rural_gas_stations_per_km2);
        v.range_pair("urban_activity_rate_range", self.urban_activity_rate_range);
        v.range_pair("rural_activity_rate_range", self.rural_activity_rate_range);
        v.range_pair("gas_station_capacity_range", self.gas_station_capacity_range);
        v.range_pair(
            "gas_station_cost_factor_range",
            self.gas_station_cost_factor_range,
        );
    }
}

// ============================================================================
// Agent Specs (agent.create / agent.update)
// ============================================================================

/// Truck configuration for `agent.create`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TruckSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_speed_kph: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_balance_ducats: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuel_tank_capacity_l: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_fuel_l: Option<f64>,
}

impl Validate for TruckSpec {
    fn validate(&self, v: &mut Validator) {
        v.non_negative_opt("max_speed_kph", self.max_speed_kph);
        v.non_negative_opt("capacity", self.capacity);
        v.probability_opt("risk_factor", self.risk_factor);
        v.non_negative_opt("initial_balance_ducats", self.initial_balance_ducats);
        v.non_negative_opt("fuel_tank_capacity_l", self.fuel_tank_capacity_l);
        v.non_negative_opt("initial_fuel_l", self.initial_fuel_l);
    }
}

/// Broker configuration for `agent.create`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrokerSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_ducats: Option<f64>,
}

impl Validate for BrokerSpec {
    fn validate(&self, v: &mut Validator) {
        v.non_negative_opt("balance_ducats", self.balance_ducats);
    }
}

/// Kind-specific configuration for `agent.create`.
///
/// The arm is chosen by the sibling `agent_kind` field, so the wire form
/// carries no tag of its own.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AgentSpec {
    Truck(TruckSpec),
    Building(BuildingSpec),
    Broker(BrokerSpec),
}

/// Building agents take no configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildingSpec {}

impl AgentSpec {
    /// Returns the agent kind this spec configures.
    #[must_use]
    pub const fn kind(&self) -> AgentKind {
        match self {
            Self::Truck(_) => AgentKind::Truck,
            Self::Building(_) => AgentKind::Building,
            Self::Broker(_) => AgentKind::Broker,
        }
    }

    /// Deserializes `value` against the arm selected by `kind`.
    pub fn from_value(kind: AgentKind, value: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            AgentKind::Truck => Self::Truck(serde_json::from_value(value)?),
            AgentKind::Building => Self::Building(serde_json::from_value(value)?),
            AgentKind::Broker => Self::Broker(serde_json::from_value(value)?),
        })
    }
}

impl Validate for AgentSpec {
    fn validate(&self, v: &mut Validator) {
        match self {
            Self::Truck(spec) => spec.validate(v),
            Self::Building(_) => {}
            Self::Broker(spec) => spec.validate(v),
        }
    }
}

/// Partial agent configuration for `agent.update`.
///
/// `agent.update` names no kind, so every truck and broker field is
/// accepted and bounds are checked on whichever are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentPatch {
    #[serde(flatten)]
    pub truck: TruckSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_ducats: Option<f64>,
}

impl Validate for AgentPatch {
    fn validate(&self, v: &mut Validator) {
        self.truck.validate(v);
        v.non_negative_opt("balance_ducats", self.balance_ducats);
    }
}

// ============================================================================
// Graph
// ============================================================================

/// Parking lot attached to a graph node. Extras kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkingInfo {
    pub id: String,
    pub capacity: u64,
    #[serde(default)]
    pub current_agents: Vec<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Loading site attached to a graph node. Extras kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_rate: Option<f64>,
    #[serde(default)]
    pub active_packages: Vec<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Gas station attached to a graph node. Extras kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasStationInfo {
    pub id: String,
    pub capacity: u64,
    #[serde(default)]
    pub current_agents: Vec<String>,
    pub cost_factor: f64,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Building placed on a graph node, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Building {
    Parking(ParkingInfo),
    Site(SiteInfo),
    GasStation(GasStationInfo),
}

impl Building {
    /// Returns the building id.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Parking(b) => &b.id,
            Self::Site(b) => &b.id,
            Self::GasStation(b) => &b.id,
        }
    }
}

impl Validate for Building {
    fn validate(&self, v: &mut Validator) {
        match self {
            Self::Parking(_) => {}
            Self::Site(site) => v.non_negative_opt("activity_rate", site.activity_rate),
            Self::GasStation(station) => v.non_negative("cost_factor", station.cost_factor),
        }
    }
}

/// Road graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub buildings: Vec<Building>,
}

impl Validate for GraphNode {
    fn validate(&self, v: &mut Validator) {
        v.each("buildings", &self.buildings);
    }
}

/// Road graph edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: String,
    pub from_node: String,
    pub to_node: String,
    pub length_m: f64,
    pub mode: u32,
    pub road_class: RoadClass,
    pub lanes: u32,
    pub max_speed_kph: f64,
    #[serde(deserialize_with = "nullable")]
    pub weight_limit_kg: Option<f64>,
}

impl Validate for GraphEdge {
    fn validate(&self, v: &mut Validator) {
        v.min("lanes", f64::from(self.lanes), 1.0);
        v.non_negative("max_speed_kph", self.max_speed_kph);
        v.non_negative_opt("weight_limit_kg", self.weight_limit_kg);
    }
}

/// Road graph produced by map generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl Validate for Graph {
    fn validate(&self, v: &mut Validator) {
        v.each("nodes", &self.nodes);
        v.each("edges", &self.edges);
    }
}

// ============================================================================
// Agent Snapshots (agent.created / agent.described / agent.listed)
// ============================================================================

/// Building agent snapshot. Extras kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingAgentSnapshot {
    pub id: String,
    pub inbox_count: u64,
    pub outbox_count: u64,
    #[serde(default)]
    pub tags: Extra,
    pub building: BuildingRef,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Reference to the building an agent manages. Extras kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingRef {
    pub id: String,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Truck agent snapshot. Extras kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TruckSnapshot {
    pub id: String,
    pub inbox_count: u64,
    pub outbox_count: u64,
    #[serde(default)]
    pub tags: Extra,
    pub max_speed_kph: f64,
    pub current_speed_kph: f64,
    #[serde(deserialize_with = "nullable")]
    pub current_node: Option<GraphIndex>,
    #[serde(deserialize_with = "nullable")]
    pub current_edge: Option<GraphIndex>,
    pub edge_progress_m: f64,
    pub route: Vec<GraphIndex>,
    #[serde(deserialize_with = "nullable")]
    pub destination: Option<GraphIndex>,
    #[serde(deserialize_with = "nullable")]
    pub route_start_node: Option<GraphIndex>,
    #[serde(deserialize_with = "nullable")]
    pub route_end_node: Option<GraphIndex>,
    #[serde(deserialize_with = "nullable")]
    pub current_building_id: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Broker agent snapshot. Extras kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerSnapshot {
    pub id: String,
    pub inbox_count: u64,
    pub outbox_count: u64,
    #[serde(default)]
    pub tags: Extra,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_ducats: Option<f64>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Agent snapshot, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AgentSnapshot {
    Building(BuildingAgentSnapshot),
    Truck(TruckSnapshot),
    Broker(BrokerSnapshot),
}

impl AgentSnapshot {
    /// Returns the agent id.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Building(a) => &a.id,
            Self::Truck(a) => &a.id,
            Self::Broker(a) => &a.id,
        }
    }

    /// Returns the agent kind.
    #[must_use]
    pub const fn kind(&self) -> AgentKind {
        match self {
            Self::Building(_) => AgentKind::Building,
            Self::Truck(_) => AgentKind::Truck,
            Self::Broker(_) => AgentKind::Broker,
        }
    }
}

impl Validate for AgentSnapshot {
    fn validate(&self, v: &mut Validator) {
        match self {
            Self::Building(_) => {}
            Self::Truck(truck) => {
                v.non_negative("max_speed_kph", truck.max_speed_kph);
                v.non_negative("current_speed_kph", truck.current_speed_kph);
                v.non_negative("edge_progress_m", truck.edge_progress_m);
            }
            Self::Broker(broker) => v.non_negative_opt("balance_ducats", broker.balance_ducats),
        }
    }
}

// ============================================================================
// Agent State (agent.updated)
// ============================================================================

/// Full truck state pushed on every update. Extras kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TruckState {
    pub id: String,
    pub max_speed_kph: f64,
    pub capacity: f64,
    #[serde(default)]
    pub loaded_packages: Vec<String>,
    pub current_speed_kph: f64,
    #[serde(deserialize_with = "nullable")]
    pub current_node: Option<GraphIndex>,
    #[serde(deserialize_with = "nullable")]
    pub current_edge: Option<GraphIndex>,
    pub route: Vec<GraphIndex>,
    #[serde(deserialize_with = "nullable")]
    pub route_start_node: Option<GraphIndex>,
    #[serde(deserialize_with = "nullable")]
    pub route_end_node: Option<GraphIndex>,
    #[serde(deserialize_with = "nullable")]
    pub current_building_id: Option<String>,
    pub driving_time_s: f64,
    pub resting_time_s: f64,
    pub is_resting: bool,
    pub balance_ducats: f64,
    pub risk_factor: f64,
    pub is_seeking_parking: bool,
    #[serde(deserialize_with = "nullable")]
    pub original_destination: Option<GraphIndex>,
    pub fuel_tank_capacity_l: f64,
    pub current_fuel_l: f64,
    pub co2_emitted_kg: f64,
    pub is_seeking_gas_station: bool,
    pub is_fueling: bool,
    pub agent_id: String,
    pub tick: u64,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Validate for TruckState {
    fn validate(&self, v: &mut Validator) {
        v.non_negative("max_speed_kph", self.max_speed_kph);
        v.non_negative("capacity", self.capacity);
        v.non_negative("current_speed_kph", self.current_speed_kph);
        v.non_negative("driving_time_s", self.driving_time_s);
        v.non_negative("resting_time_s", self.resting_time_s);
        v.non_negative("balance_ducats", self.balance_ducats);
        v.probability("risk_factor", self.risk_factor);
        v.non_negative("fuel_tank_capacity_l", self.fuel_tank_capacity_l);
        v.non_negative("current_fuel_l", self.current_fuel_l);
        v.non_negative("co2_emitted_kg", self.co2_emitted_kg);
    }
}

/// Broker state pushed on every update. Extras kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerState {
    pub id: String,
    pub balance_ducats: f64,
    pub queue_size: u64,
    pub assigned_count: u64,
    pub has_active_negotiation: bool,
    pub agent_id: String,
    pub tick: u64,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Agent update payload, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AgentState {
    Truck(TruckState),
    Broker(BrokerState),
}

impl AgentState {
    /// Returns the id of the updated agent.
    #[must_use]
    pub fn agent_id(&self) -> &str {
        match self {
            Self::Truck(t) => &t.agent_id,
            Self::Broker(b) => &b.agent_id,
        }
    }
}

impl Validate for AgentState {
    fn validate(&self, v: &mut Validator) {
        match self {
            Self::Truck(truck) => truck.validate(v),
            Self::Broker(broker) => v.non_negative("balance_ducats", broker.balance_ducats),
        }
    }
}

// ============================================================================
// Building State (building.updated)
// ============================================================================

/// Package generation settings of a site. Extras kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageConfig {
    pub size_range: [f64; 2],
    pub value_range_currency: [f64; 2],
    pub pickup_deadline_range_ticks: [u64; 2],
    pub delivery_deadline_range_ticks: [u64; 2],
    pub priority_weights: BTreeMap<String, f64>,
    pub urgency_weights: BTreeMap<String, f64>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Validate for PackageConfig {
    fn validate(&self, v: &mut Validator) {
        v.range_pair("size_range", self.size_range);
        v.range_pair("value_range_currency", self.value_range_currency);
        v.weights("priority_weights", &self.priority_weights);
        v.weights("urgency_weights", &self.urgency_weights);
    }
}

/// Site counters. Extras kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingStatistics {
    pub packages_generated: u64,
    pub packages_picked_up: u64,
    pub packages_delivered: u64,
    pub packages_expired: u64,
    pub total_value_delivered: f64,
    pub total_value_expired: f64,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Full site state. Extras kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteState {
    pub id: String,
    pub capacity: u64,
    #[serde(default)]
    pub current_agents: Vec<String>,
    pub name: String,
    pub activity_rate: f64,
    pub loading_rate_tonnes_per_min: f64,
    pub destination_weights: BTreeMap<String, f64>,
    pub package_config: PackageConfig,
    #[serde(default)]
    pub active_packages: Vec<String>,
    pub statistics: BuildingStatistics,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Building update payload, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuildingState {
    Site(SiteState),
    Parking(ParkingInfo),
    GasStation(GasStationInfo),
}

impl Validate for BuildingState {
    fn validate(&self, v: &mut Validator) {
        match self {
            Self::Site(site) => {
                v.non_negative("activity_rate", site.activity_rate);
                v.non_negative(
                    "loading_rate_tonnes_per_min",
                    site.loading_rate_tonnes_per_min,
                );
                v.weights("destination_weights", &site.destination_weights);
                v.record("package_config", &site.package_config);
                v.nested("statistics", |v| {
                    v.non_negative(
                        "total_value_delivered",
                        site.statistics.total_value_delivered,
                    );
                    v.non_negative("total_value_expired", site.statistics.total_value_expired);
                });
            }
            Self::Parking(_) => {}
            Self::GasStation(station) => v.non_negative("cost_factor", station.cost_factor),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
