//! Net adapter: decoded signals to domain events.
//!
//! [`map_signal`] is a pure function. It flattens wire records into the
//! shapes a simulation store keeps (tables keyed by id, string graph
//! references, dynamic-field patches) and drops signals that carry no
//! domain change.
//!
//! # Mapping
//!
//! | Signal | Event |
//! |--------|-------|
//! | `simulation.*` | lifecycle variants |
//! | `tick.start` / `tick.end` | [`DomainEvent::TickStarted`] / [`DomainEvent::TickEnded`] |
//! | `map.created` | [`DomainEvent::MapCreated`] |
//! | `agent.created` | truck / building / broker created |
//! | `agent.updated` | truck / broker updated |
//! | `agent.deleted` | [`DomainEvent::AgentDeleted`] |
//! | `agent.listed` | [`DomainEvent::AgentsListed`] |
//! | `building.updated` | [`DomainEvent::BuildingUpdated`] |
//! | `package.created` | [`DomainEvent::PackageCreated`] |
//! | `error` | [`DomainEvent::ServerError`] |
//! | `agent.described`, import / export acks | none |

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::identifiers::RequestId;
use crate::protocol::types::{
    BrokerSnapshot, BrokerState, BuildingAgentSnapshot, TruckSnapshot, TruckState,
};
use crate::protocol::{
    AgentSnapshot, AgentState, Building, BuildingState, DeliveryUrgency, GraphIndex, MapCreated,
    MapSettings, PackageCreated, Priority, RoadClass, Signal, SignalEnvelope,
};

// ============================================================================
// Domain Records
// ============================================================================

/// Road graph node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub x: f64,
    pub y: f64,
    /// Ids of the buildings placed on this node.
    pub building_ids: Vec<String>,
}

/// Road graph edge topology.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: String,
    pub from_node_id: String,
    pub to_node_id: String,
    pub length_m: f64,
}

/// Road attributes of an edge, keyed by the edge id.
#[derive(Debug, Clone, PartialEq)]
pub struct Road {
    pub edge_id: String,
    pub road_class: RoadClass,
    pub lanes: u32,
    pub max_speed_kph: f64,
    pub weight_limit_kg: Option<f64>,
}

/// Truck as the store keeps it.
#[derive(Debug, Clone, PartialEq)]
pub struct Truck {
    pub id: String,
    /// Cargo capacity from the `capacity` tag, if tagged.
    pub capacity: Option<f64>,
    pub max_speed_kph: f64,
    pub current_speed_kph: f64,
    pub current_node_id: Option<String>,
    pub current_edge_id: Option<String>,
    pub edge_progress_m: f64,
    pub route: Vec<String>,
    pub destination_id: Option<String>,
    pub current_building_id: Option<String>,
}

/// Building agent.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildingAgent {
    pub id: String,
    pub building_id: String,
}

/// Broker agent.
#[derive(Debug, Clone, PartialEq)]
pub struct Broker {
    pub id: String,
    pub balance_ducats: Option<f64>,
}

/// Any agent.
#[derive(Debug, Clone, PartialEq)]
pub enum Agent {
    Truck(Truck),
    Building(BuildingAgent),
    Broker(Broker),
}

impl Agent {
    /// Returns the agent id.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Truck(t) => &t.id,
            Self::Building(b) => &b.id,
            Self::Broker(b) => &b.id,
        }
    }
}

/// Dynamic truck fields from `agent.updated`.
///
/// Static fields (max speed, capacity, tank size) are left out.
#[derive(Debug, Clone, PartialEq)]
pub struct TruckPatch {
    pub current_speed_kph: f64,
    pub current_node_id: Option<String>,
    pub current_edge_id: Option<String>,
    pub route: Vec<String>,
    pub current_building_id: Option<String>,
    pub loaded_packages: Vec<String>,
    pub is_resting: bool,
    pub is_seeking_parking: bool,
    pub is_seeking_gas_station: bool,
    pub is_fueling: bool,
    pub current_fuel_l: f64,
    pub balance_ducats: f64,
    pub co2_emitted_kg: f64,
    pub tick: u64,
}

/// Dynamic broker fields from `agent.updated`.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerPatch {
    pub balance_ducats: f64,
    pub queue_size: u64,
    pub assigned_count: u64,
    pub has_active_negotiation: bool,
    pub tick: u64,
}

/// Freight package.
#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    pub id: String,
    pub origin_building_id: String,
    pub destination_building_id: String,
    pub size: f64,
    pub value: f64,
    pub priority: Priority,
    pub urgency: DeliveryUrgency,
    pub pickup_deadline_tick: u64,
    pub delivery_deadline_tick: u64,
    pub created_at_tick: u64,
}

// ============================================================================
// DomainEvent
// ============================================================================

/// Store update derived from one signal.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    SimulationStarted { tick_rate: u32, speed: f64 },
    SimulationUpdated { tick_rate: u32, speed: f64 },
    SimulationPaused,
    SimulationResumed,
    SimulationStopped,

    TickStarted { tick: u64, time: f64, day: u64 },
    TickEnded { tick: u64, time: f64, day: u64 },

    /// New map; replaces every graph table.
    MapCreated {
        settings: Box<MapSettings>,
        nodes: FxHashMap<String, Node>,
        edges: FxHashMap<String, Edge>,
        roads: FxHashMap<String, Road>,
        buildings: FxHashMap<String, Building>,
    },

    TruckCreated { truck: Truck },
    BuildingCreated { building: BuildingAgent },
    BrokerCreated { broker: Broker },

    TruckUpdated { id: String, patch: Box<TruckPatch> },
    BrokerUpdated { id: String, patch: BrokerPatch },

    AgentDeleted { id: String },

    /// Full agent roster.
    AgentsListed {
        total: u64,
        tick: u64,
        agents: Vec<Agent>,
    },

    BuildingUpdated {
        id: String,
        tick: u64,
        building: Box<BuildingState>,
    },

    PackageCreated { package: Package, tick: u64 },

    ServerError {
        code: String,
        message: String,
        request_id: Option<RequestId>,
    },
}

// ============================================================================
// Mapping
// ============================================================================

/// Maps a decoded signal to the domain change it describes.
///
/// Returns `None` for signals with no domain effect.
#[must_use]
pub fn map_signal(envelope: &SignalEnvelope) -> Option<DomainEvent> {
    let event = match &envelope.signal {
        Signal::SimulationStarted(p) => DomainEvent::SimulationStarted {
            tick_rate: p.tick_rate,
            speed: p.speed,
        },
        Signal::SimulationUpdated(p) => DomainEvent::SimulationUpdated {
            tick_rate: p.tick_rate,
            speed: p.speed,
        },
        Signal::SimulationPaused(_) => DomainEvent::SimulationPaused,
        Signal::SimulationResumed(_) => DomainEvent::SimulationResumed,
        Signal::SimulationStopped(_) => DomainEvent::SimulationStopped,

        Signal::TickStart(t) => DomainEvent::TickStarted {
            tick: t.tick,
            time: t.time,
            day: t.day,
        },
        Signal::TickEnd(t) => DomainEvent::TickEnded {
            tick: t.tick,
            time: t.time,
            day: t.day,
        },

        Signal::MapCreated(map) => map_created(map),

        Signal::AgentCreated(snapshot) => match agent(snapshot) {
            Agent::Truck(truck) => DomainEvent::TruckCreated { truck },
            Agent::Building(building) => DomainEvent::BuildingCreated { building },
            Agent::Broker(broker) => DomainEvent::BrokerCreated { broker },
        },
        Signal::AgentUpdated(AgentState::Truck(state)) => DomainEvent::TruckUpdated {
            id: state.agent_id.clone(),
            patch: Box::new(truck_patch(state)),
        },
        Signal::AgentUpdated(AgentState::Broker(state)) => DomainEvent::BrokerUpdated {
            id: state.agent_id.clone(),
            patch: broker_patch(state),
        },
        Signal::AgentDeleted(r) => DomainEvent::AgentDeleted {
            id: r.agent_id.clone(),
        },
        Signal::AgentListed(list) => DomainEvent::AgentsListed {
            total: list.total,
            tick: list.tick,
            agents: list.agents.iter().map(agent).collect(),
        },

        Signal::BuildingUpdated(update) => DomainEvent::BuildingUpdated {
            id: update.building_id.clone(),
            tick: update.tick,
            building: Box::new(update.building.clone()),
        },
        Signal::PackageCreated(p) => DomainEvent::PackageCreated {
            package: package(p),
            tick: p.tick,
        },

        Signal::Error(e) => DomainEvent::ServerError {
            code: e.code.clone(),
            message: e.message.clone(),
            request_id: envelope.request_id.clone(),
        },

        Signal::AgentDescribed(_)
        | Signal::MapExported(_)
        | Signal::MapImported(_)
        | Signal::SimulationStateExported(_)
        | Signal::SimulationStateImported(_) => return None,
    };
    Some(event)
}

fn map_created(map: &MapCreated) -> DomainEvent {
    let graph = &map.graph;

    let mut nodes = FxHashMap::default();
    let mut buildings = FxHashMap::default();
    for node in &graph.nodes {
        for building in &node.buildings {
            buildings.insert(building.id().to_owned(), building.clone());
        }
        nodes.insert(
            node.id.clone(),
            Node {
                id: node.id.clone(),
                x: node.x,
                y: node.y,
                building_ids: node.buildings.iter().map(|b| b.id().to_owned()).collect(),
            },
        );
    }

    let mut edges = FxHashMap::default();
    let mut roads = FxHashMap::default();
    for edge in &graph.edges {
        edges.insert(
            edge.id.clone(),
            Edge {
                id: edge.id.clone(),
                from_node_id: edge.from_node.clone(),
                to_node_id: edge.to_node.clone(),
                length_m: edge.length_m,
            },
        );
        roads.insert(
            edge.id.clone(),
            Road {
                edge_id: edge.id.clone(),
                road_class: edge.road_class,
                lanes: edge.lanes,
                max_speed_kph: edge.max_speed_kph,
                weight_limit_kg: edge.weight_limit_kg,
            },
        );
    }

    DomainEvent::MapCreated {
        settings: Box::new(map.settings.clone()),
        nodes,
        edges,
        roads,
        buildings,
    }
}

fn agent(snapshot: &AgentSnapshot) -> Agent {
    match snapshot {
        AgentSnapshot::Truck(t) => Agent::Truck(truck(t)),
        AgentSnapshot::Building(b) => Agent::Building(building_agent(b)),
        AgentSnapshot::Broker(b) => Agent::Broker(broker(b)),
    }
}

fn truck(snapshot: &TruckSnapshot) -> Truck {
    Truck {
        id: snapshot.id.clone(),
        capacity: snapshot.tags.get("capacity").and_then(Value::as_f64),
        max_speed_kph: snapshot.max_speed_kph,
        current_speed_kph: snapshot.current_speed_kph,
        current_node_id: key(snapshot.current_node.as_ref()),
        current_edge_id: key(snapshot.current_edge.as_ref()),
        edge_progress_m: snapshot.edge_progress_m,
        route: snapshot.route.iter().map(GraphIndex::to_key).collect(),
        destination_id: key(snapshot.destination.as_ref()),
        current_building_id: snapshot.current_building_id.clone(),
    }
}

fn building_agent(snapshot: &BuildingAgentSnapshot) -> BuildingAgent {
    BuildingAgent {
        id: snapshot.id.clone(),
        building_id: snapshot.building.id.clone(),
    }
}

fn broker(snapshot: &BrokerSnapshot) -> Broker {
    Broker {
        id: snapshot.id.clone(),
        balance_ducats: snapshot.balance_ducats,
    }
}

fn truck_patch(state: &TruckState) -> TruckPatch {
    TruckPatch {
        current_speed_kph: state.current_speed_kph,
        current_node_id: key(state.current_node.as_ref()),
        current_edge_id: key(state.current_edge.as_ref()),
        route: state.route.iter().map(GraphIndex::to_key).collect(),
        current_building_id: state.current_building_id.clone(),
        loaded_packages: state.loaded_packages.clone(),
        is_resting: state.is_resting,
        is_seeking_parking: state.is_seeking_parking,
        is_seeking_gas_station: state.is_seeking_gas_station,
        is_fueling: state.is_fueling,
        current_fuel_l: state.current_fuel_l,
        balance_ducats: state.balance_ducats,
        co2_emitted_kg: state.co2_emitted_kg,
        tick: state.tick,
    }
}

fn broker_patch(state: &BrokerState) -> BrokerPatch {
    BrokerPatch {
        balance_ducats: state.balance_ducats,
        queue_size: state.queue_size,
        assigned_count: state.assigned_count,
        has_active_negotiation: state.has_active_negotiation,
        tick: state.tick,
    }
}

fn package(p: &PackageCreated) -> Package {
    Package {
        id: p.package_id.clone(),
        origin_building_id: p.origin_building_id.clone(),
        destination_building_id: p.destination_building_id.clone(),
        size: p.size,
        value: p.value_currency,
        priority: p.priority,
        urgency: p.urgency,
        pickup_deadline_tick: p.pickup_deadline_tick,
        delivery_deadline_tick: p.delivery_deadline_tick,
        created_at_tick: p.created_at_tick,
    }
}

#[inline]
fn key(index: Option<&GraphIndex>) -> Option<String> {
    index.map(GraphIndex::to_key)
}

// ============================================================================
// Tests
// ============================================================================
