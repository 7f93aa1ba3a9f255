//! Action-related types.
//!
//! These are the values that cross every boundary of the action framework:
//! the status of a query or execute, the result handed back to callers, the
//! flag set carried by each submission, and the record written to the replay
//! log.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Money in the smallest currency unit.
pub type Money = i64;

/// A world position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coords {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Coords {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// Outcome of a query or execute phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    #[default]
    Ok,
    InvalidParameters,
    Disallowed,
    InsufficientFunds,
    NoFreeElements,
    NotFound,
    ScriptError,
    RetriesExhausted,
    Unknown,
}

impl ActionStatus {
    /// Name used in script tables and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Ok => "ok",
            ActionStatus::InvalidParameters => "invalid_parameters",
            ActionStatus::Disallowed => "disallowed",
            ActionStatus::InsufficientFunds => "insufficient_funds",
            ActionStatus::NoFreeElements => "no_free_elements",
            ActionStatus::NotFound => "not_found",
            ActionStatus::ScriptError => "script_error",
            ActionStatus::RetriesExhausted => "retries_exhausted",
            ActionStatus::Unknown => "unknown",
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ActionStatus::Ok)
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s {
            "ok" => ActionStatus::Ok,
            "invalid_parameters" => ActionStatus::InvalidParameters,
            "disallowed" => ActionStatus::Disallowed,
            "insufficient_funds" => ActionStatus::InsufficientFunds,
            "no_free_elements" => ActionStatus::NoFreeElements,
            "not_found" => ActionStatus::NotFound,
            "script_error" => ActionStatus::ScriptError,
            "retries_exhausted" => ActionStatus::RetriesExhausted,
            "unknown" => ActionStatus::Unknown,
            other => return Err(format!("Unknown action status '{}'", other)),
        };
        Ok(status)
    }
}

/// Result returned by a query or execute phase.
///
/// `cost` is only meaningful when `status` is ok.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub status: ActionStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default)]
    pub cost: Money,

    #[serde(default)]
    pub position: Coords,

    /// Identifier of an entity the action created, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<u32>,

    /// Action-specific fields, including anything a script attached.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ActionResult {
    /// A successful result with zero cost.
    pub fn ok() -> Self {
        Self::default()
    }

    /// A failed result with a caller-readable reason.
    pub fn fail(status: ActionStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_cost(mut self, cost: Money) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_position(mut self, position: Coords) -> Self {
        self.position = position;
        self
    }

    pub fn with_entity(mut self, entity_id: u32) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}

bitflags! {
    /// Flags carried by an action submission.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct ActionFlags: u32 {
        /// The caller intends the action to mutate state.
        const APPLY = 1 << 0;
        /// Preview placement, never persisted or charged.
        const GHOST = 1 << 1;
        /// Replayed from a log; must not be logged again.
        const REPLAY = 1 << 2;
        /// Arrived from a remote peer.
        const NETWORK_ORIGIN = 1 << 3;

        /// Flags a nested action takes from its parent.
        const INHERITED = Self::GHOST.bits() | Self::REPLAY.bits() | Self::NETWORK_ORIGIN.bits();
    }
}

impl ActionFlags {
    /// The subset of `self` a nested action inherits.
    pub fn inherited(self) -> Self {
        self & Self::INHERITED
    }
}

/// Type tag of an action: one of the built-ins or a script-defined id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionKind {
    RideCreate,
    RideDemolish,
    RideSetName,
    RideSetVehicle,
    RideSetSetting,
    TrackDesign,
    Custom(String),
}

impl ActionKind {
    pub fn as_str(&self) -> &str {
        match self {
            ActionKind::RideCreate => "ridecreate",
            ActionKind::RideDemolish => "ridedemolish",
            ActionKind::RideSetName => "ridesetname",
            ActionKind::RideSetVehicle => "ridesetvehicle",
            ActionKind::RideSetSetting => "ridesetsetting",
            ActionKind::TrackDesign => "trackdesign",
            ActionKind::Custom(id) => id,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, ActionKind::Custom(_))
    }
}

impl From<&str> for ActionKind {
    fn from(id: &str) -> Self {
        match id {
            "ridecreate" => ActionKind::RideCreate,
            "ridedemolish" => ActionKind::RideDemolish,
            "ridesetname" => ActionKind::RideSetName,
            "ridesetvehicle" => ActionKind::RideSetVehicle,
            "ridesetsetting" => ActionKind::RideSetSetting,
            "trackdesign" => ActionKind::TrackDesign,
            other => ActionKind::Custom(other.to_string()),
        }
    }
}

impl From<String> for ActionKind {
    fn from(id: String) -> Self {
        ActionKind::from(id.as_str())
    }
}

impl From<ActionKind> for String {
    fn from(kind: ActionKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A serialised top-level submission, enough to re-run it deterministically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub kind: ActionKind,
    pub flags: u32,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl ActionRecord {
    pub fn new(kind: ActionKind, flags: ActionFlags, params: serde_json::Value) -> Self {
        Self {
            kind,
            flags: flags.bits(),
            params,
        }
    }

    pub fn flags(&self) -> ActionFlags {
        ActionFlags::from_bits_truncate(self.flags)
    }
}
