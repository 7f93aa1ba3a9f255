//! Single-step ride actions.

use serde::{Deserialize, Serialize};
use tycoon_core::{ActionError, ActionKind, ActionResult, ActionStatus};

use crate::action::{params_of, ActionContext, GameAction};
use crate::world::{
    EntryIndex, GameState, Ride, RideId, MAX_CARS_PER_TRAIN, MAX_RIDE_NAME_LENGTH,
    MAX_TRAINS_PER_RIDE,
};

pub const ERR_NAME_IN_USE: &str = "Name is already in use";
pub const ERR_INVALID_RIDE: &str = "Invalid ride";

fn invalid_ride(ride: RideId) -> ActionResult {
    ActionResult::fail(ActionStatus::NotFound, ERR_INVALID_RIDE).with_entity(ride as u32)
}

/// Create an empty ride of a type, using `entry` or the first buildable one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RideCreate {
    pub ride_type: u8,
    #[serde(default)]
    pub entry: Option<EntryIndex>,
}

impl RideCreate {
    fn resolve(&self, world: &GameState) -> Result<(RideId, EntryIndex), ActionResult> {
        if !world.ride_entries.iter().any(|e| e.ride_type == self.ride_type) {
            return Err(ActionResult::fail(
                ActionStatus::InvalidParameters,
                format!("Invalid ride type {}", self.ride_type),
            ));
        }
        let entry = match self.entry {
            Some(index) => {
                match world.entry(index) {
                    Some(e) if e.ride_type == self.ride_type => {}
                    _ => {
                        return Err(ActionResult::fail(
                            ActionStatus::InvalidParameters,
                            format!("Invalid ride entry {}", index),
                        ))
                    }
                }
                if !world.entry_is_available(index) {
                    return Err(ActionResult::fail(
                        ActionStatus::Disallowed,
                        "Ride has not been invented yet",
                    ));
                }
                index
            }
            None => world.default_entry_for(self.ride_type).ok_or_else(|| {
                ActionResult::fail(ActionStatus::Disallowed, "Ride has not been invented yet")
            })?,
        };
        let id = world.next_free_ride_id().ok_or_else(|| {
            ActionResult::fail(ActionStatus::NoFreeElements, "Too many rides")
        })?;
        Ok((id, entry))
    }
}

impl GameAction for RideCreate {
    fn kind(&self) -> ActionKind {
        ActionKind::RideCreate
    }

    fn params(&self) -> Result<serde_json::Value, ActionError> {
        params_of(&self.kind(), self)
    }

    fn query(&self, ctx: &ActionContext<'_>) -> ActionResult {
        match ctx.with_world(|w| self.resolve(w)) {
            Ok((id, _)) => ActionResult::ok().with_entity(id as u32),
            Err(result) => result,
        }
    }

    fn execute(&self, ctx: &ActionContext<'_>) -> ActionResult {
        ctx.with_world_mut(|w| {
            let (id, entry) = match self.resolve(w) {
                Ok(resolved) => resolved,
                Err(result) => return result,
            };
            let name = w.default_ride_name(entry);
            w.rides.insert(
                id,
                Ride {
                    id,
                    ride_type: self.ride_type,
                    entry,
                    name,
                    vehicle_colour: 0,
                    mode: 0,
                    num_trains: 1,
                    cars_per_train: 1,
                    departure_flags: 0,
                    min_waiting_time: 10,
                    max_waiting_time: 60,
                    operation_option: 0,
                    lift_hill_speed: 0,
                    num_circuits: 1,
                    colour_scheme: 0,
                    entrance_style: 0,
                    custom_design: true,
                    ghost: false,
                    tiles: Vec::new(),
                },
            );
            tracing::debug!(ride = id, entry, "Created ride");
            ActionResult::ok().with_entity(id as u32)
        })
    }
}

/// Remove a ride and everything it occupies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RideDemolish {
    pub ride: RideId,
}

impl GameAction for RideDemolish {
    fn kind(&self) -> ActionKind {
        ActionKind::RideDemolish
    }

    fn params(&self) -> Result<serde_json::Value, ActionError> {
        params_of(&self.kind(), self)
    }

    fn query(&self, ctx: &ActionContext<'_>) -> ActionResult {
        if ctx.with_world(|w| w.rides.contains_key(&self.ride)) {
            ActionResult::ok()
        } else {
            invalid_ride(self.ride)
        }
    }

    fn execute(&self, ctx: &ActionContext<'_>) -> ActionResult {
        match ctx.with_world_mut(|w| w.remove_ride(self.ride)) {
            Some(_) => {
                tracing::debug!(ride = self.ride, "Demolished ride");
                ActionResult::ok()
            }
            None => invalid_ride(self.ride),
        }
    }
}

/// Rename a ride. Names are unique across the park.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RideSetName {
    pub ride: RideId,
    pub name: String,
}

impl RideSetName {
    fn validate(&self, world: &GameState) -> ActionResult {
        if !world.rides.contains_key(&self.ride) {
            return invalid_ride(self.ride);
        }
        let name = self.name.trim();
        if name.is_empty() || name.chars().count() > MAX_RIDE_NAME_LENGTH {
            return ActionResult::fail(ActionStatus::InvalidParameters, "Invalid ride name");
        }
        if world.ride_name_in_use(name, self.ride) {
            return ActionResult::fail(ActionStatus::Disallowed, ERR_NAME_IN_USE);
        }
        ActionResult::ok()
    }
}

impl GameAction for RideSetName {
    fn kind(&self) -> ActionKind {
        ActionKind::RideSetName
    }

    fn params(&self) -> Result<serde_json::Value, ActionError> {
        params_of(&self.kind(), self)
    }

    fn query(&self, ctx: &ActionContext<'_>) -> ActionResult {
        ctx.with_world(|w| self.validate(w))
    }

    fn execute(&self, ctx: &ActionContext<'_>) -> ActionResult {
        ctx.with_world_mut(|w| {
            let result = self.validate(w);
            if result.is_ok() {
                if let Some(ride) = w.rides.get_mut(&self.ride) {
                    ride.name = self.name.trim().to_string();
                }
            }
            result
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideSetVehicleType {
    NumTrains,
    NumCarsPerTrain,
    RideEntry,
}

/// Change a ride's vehicle entry, train count, or cars per train.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RideSetVehicle {
    pub ride: RideId,
    #[serde(rename = "type")]
    pub kind: RideSetVehicleType,
    pub value: u16,
    #[serde(default)]
    pub colour: u8,
}

impl RideSetVehicle {
    fn validate(&self, world: &GameState) -> ActionResult {
        let Some(ride) = world.rides.get(&self.ride) else {
            return invalid_ride(self.ride);
        };
        let ok = match self.kind {
            RideSetVehicleType::NumTrains => (1..=MAX_TRAINS_PER_RIDE as u16).contains(&self.value),
            RideSetVehicleType::NumCarsPerTrain => {
                (1..=MAX_CARS_PER_TRAIN as u16).contains(&self.value)
            }
            RideSetVehicleType::RideEntry => {
                let matches_type = world
                    .entry(self.value)
                    .map(|e| e.ride_type == ride.ride_type)
                    .unwrap_or(false);
                if matches_type && !world.entry_is_available(self.value) {
                    return ActionResult::fail(
                        ActionStatus::Disallowed,
                        "Vehicle has not been invented yet",
                    );
                }
                matches_type
            }
        };
        if ok {
            ActionResult::ok()
        } else {
            ActionResult::fail(ActionStatus::InvalidParameters, "Invalid vehicle setting")
        }
    }
}

impl GameAction for RideSetVehicle {
    fn kind(&self) -> ActionKind {
        ActionKind::RideSetVehicle
    }

    fn params(&self) -> Result<serde_json::Value, ActionError> {
        params_of(&self.kind(), self)
    }

    fn query(&self, ctx: &ActionContext<'_>) -> ActionResult {
        ctx.with_world(|w| self.validate(w))
    }

    fn execute(&self, ctx: &ActionContext<'_>) -> ActionResult {
        ctx.with_world_mut(|w| {
            let result = self.validate(w);
            if !result.is_ok() {
                return result;
            }
            if let Some(ride) = w.rides.get_mut(&self.ride) {
                match self.kind {
                    RideSetVehicleType::NumTrains => ride.num_trains = self.value as u8,
                    RideSetVehicleType::NumCarsPerTrain => ride.cars_per_train = self.value as u8,
                    RideSetVehicleType::RideEntry => {
                        ride.entry = self.value;
                        ride.vehicle_colour = self.colour;
                    }
                }
            }
            result
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideSetting {
    Mode,
    Departure,
    MinWaitingTime,
    MaxWaitingTime,
    Operation,
    LiftHillSpeed,
    NumCircuits,
}

/// Change one operating setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RideSetSetting {
    pub ride: RideId,
    pub setting: RideSetting,
    pub value: u8,
}

impl RideSetSetting {
    pub fn new(ride: RideId, setting: RideSetting, value: u8) -> Self {
        Self {
            ride,
            setting,
            value,
        }
    }

    fn validate(&self, world: &GameState) -> ActionResult {
        if !world.rides.contains_key(&self.ride) {
            return invalid_ride(self.ride);
        }
        let ok = match self.setting {
            RideSetting::MinWaitingTime | RideSetting::MaxWaitingTime => self.value <= 250,
            RideSetting::LiftHillSpeed => self.value <= 0x1F,
            RideSetting::NumCircuits => (1..=7).contains(&self.value),
            RideSetting::Mode | RideSetting::Departure | RideSetting::Operation => true,
        };
        if ok {
            ActionResult::ok()
        } else {
            ActionResult::fail(
                ActionStatus::InvalidParameters,
                format!("Invalid value {} for {:?}", self.value, self.setting),
            )
        }
    }
}

impl GameAction for RideSetSetting {
    fn kind(&self) -> ActionKind {
        ActionKind::RideSetSetting
    }

    fn params(&self) -> Result<serde_json::Value, ActionError> {
        params_of(&self.kind(), self)
    }

    fn query(&self, ctx: &ActionContext<'_>) -> ActionResult {
        ctx.with_world(|w| self.validate(w))
    }

    fn execute(&self, ctx: &ActionContext<'_>) -> ActionResult {
        ctx.with_world_mut(|w| {
            let result = self.validate(w);
            if !result.is_ok() {
                return result;
            }
            if let Some(ride) = w.rides.get_mut(&self.ride) {
                let value = self.value;
                match self.setting {
                    RideSetting::Mode => ride.mode = value,
                    RideSetting::Departure => ride.departure_flags = value,
                    RideSetting::MinWaitingTime => ride.min_waiting_time = value,
                    RideSetting::MaxWaitingTime => ride.max_waiting_time = value,
                    RideSetting::Operation => ride.operation_option = value,
                    RideSetting::LiftHillSpeed => ride.lift_hill_speed = value,
                    RideSetting::NumCircuits => ride.num_circuits = value,
                }
            }
            result
        })
    }
}
