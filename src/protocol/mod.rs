//! Wire protocol: actions, signals and their schemas.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Shape |
//! |---------|-----------|-------|
//! | Action | Client → Server | `{"action": name, "params": {..}, "request_id"?: id}` |
//! | Signal | Server → Client | `{"signal": name, "data": {..}, "request_id"?: id}` |
//!
//! Every name is declared exactly once in a table below that generates the
//! name enum, the typed payload enum and the decode dispatch together, so a
//! name cannot exist without its schema. The reply expected for each action
//! lives in [`mapping`] as an exhaustive `match`.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `action` | Action names, params and envelope |
//! | `signal` | Signal names, data and envelope |
//! | `types` | Records shared by both directions |
//! | `mapping` | Action → reply signal table and matchers |
//! | `validate` | Bound checks and [`ValidationError`] |

// ============================================================================
// Protocol Table
// ============================================================================

/// Generates a closed name enum and a typed payload enum from one table.
macro_rules! protocol_table {
    (
        $(#[$name_meta:meta])*
        names $name_ty:ident;
        $(#[$payload_meta:meta])*
        payloads $payload_ty:ident;
        $(
            $(#[$doc:meta])*
            $variant:ident => $wire:literal ($data:ty),
        )+
    ) => {
        $(#[$name_meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name_ty {
            $(
                $(#[$doc])*
                $variant,
            )+
        }

        impl $name_ty {
            /// Every name, in declaration order.
            pub const ALL: &'static [$name_ty] = &[$($name_ty::$variant),+];

            /// Returns the wire name.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }

            /// Looks up a wire name.
            #[must_use]
            pub fn parse(name: &str) -> Option<Self> {
                match name {
                    $($wire => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl ::std::fmt::Display for $name_ty {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::serde::Serialize for $name_ty {
            fn serialize<S: ::serde::Serializer>(&self, serializer: S) -> ::std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        $(#[$payload_meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub enum $payload_ty {
            $(
                $(#[$doc])*
                $variant($data),
            )+
        }

        impl $payload_ty {
            /// Returns the name this payload is sent under.
            #[must_use]
            pub const fn name(&self) -> $name_ty {
                match self {
                    $(Self::$variant(_) => $name_ty::$variant,)+
                }
            }

            /// Deserializes the payload record registered for `name`.
            pub fn from_value(
                name: $name_ty,
                value: ::serde_json::Value,
            ) -> ::std::result::Result<Self, ::serde_json::Error> {
                match name {
                    $($name_ty::$variant => Ok(Self::$variant(::serde_json::from_value(value)?)),)+
                }
            }
        }

        impl $crate::protocol::validate::Validate for $payload_ty {
            fn validate(&self, v: &mut $crate::protocol::validate::Validator) {
                match self {
                    $(Self::$variant(payload) => $crate::protocol::validate::Validate::validate(payload, v),)+
                }
            }
        }

        /// Serializes the payload record only; the name travels beside it.
        impl ::serde::Serialize for $payload_ty {
            fn serialize<S: ::serde::Serializer>(&self, serializer: S) -> ::std::result::Result<S::Ok, S::Error> {
                match self {
                    $(Self::$variant(payload) => ::serde::Serialize::serialize(payload, serializer),)+
                }
            }
        }
    };
}

// ============================================================================
// Submodules
// ============================================================================

/// Client → server requests.
pub mod action;

/// Action → reply signal mapping.
pub mod mapping;

/// Server → client events and replies.
pub mod signal;

/// Shared payload records.
pub mod types;

/// Payload validation.
pub mod validate;

// ============================================================================
// Re-exports
// ============================================================================

pub use action::{
    Action, ActionEnvelope, ActionName, AgentCreateParams, AgentUpdateParams, ExportParams,
    ImportParams, decode_action, decode_action_str, encode_action,
};
pub use mapping::{MatchPolicy, Matcher, expected_signal_for, matcher_for};
pub use signal::{
    AgentListed, BuildingUpdated, ErrorData, FileExported, FileImported, MapCreated,
    PackageCreated, Signal, SignalEnvelope, SignalName, TickData, decode_signal,
    decode_signal_str,
};
pub use types::{
    AgentKind, AgentPatch, AgentRef, AgentSnapshot, AgentSpec, AgentState, Building,
    BuildingState, DeliveryUrgency, Empty, Graph, GraphEdge, GraphIndex, GraphNode, MapSettings,
    Priority, RoadClass, SimulationParams,
};
pub use validate::{Issue, Validate, ValidationError, Validator};
