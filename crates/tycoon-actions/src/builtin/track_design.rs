//! Build a complete ride from a saved track design.
//!
//! Composite action: every step after creating the ride is a nested action,
//! and every failure after creation demolishes the ride again so nothing is
//! left half-built.

use serde::{Deserialize, Serialize};
use tycoon_core::{ActionError, ActionKind, ActionResult, ActionStatus, Coords};

use super::ride::{
    RideCreate, RideDemolish, RideSetName, RideSetSetting, RideSetVehicle, RideSetVehicleType,
    RideSetting, ERR_NAME_IN_USE,
};
use crate::action::{params_of, ActionContext, GameAction};
use crate::world::{EntryIndex, PlaceOperation, Placement, PlacementError, RideId, TrackDesign};

pub const CANT_CONSTRUCT: &str = "Can't construct this here";
pub const CANT_CREATE_RIDE: &str = "Can't create new ride/attraction";

/// Upper bound on "Name", "Name 2", ... attempts.
pub const MAX_NAME_ATTEMPTS: u32 = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackDesignAction {
    pub location: Coords,
    pub design: TrackDesign,
}

impl TrackDesignAction {
    pub fn new(location: Coords, design: TrackDesign) -> Self {
        Self { location, design }
    }

    fn position(&self) -> Coords {
        Coords::new(
            self.location.x.saturating_add(16),
            self.location.y.saturating_add(16),
            self.location.z,
        )
    }

    fn fail(&self, status: ActionStatus, message: impl Into<String>) -> ActionResult {
        ActionResult::fail(status, message)
            .with_title(CANT_CONSTRUCT)
            .with_position(self.position())
    }

    /// Vehicle entry named by the design, if loaded and buildable.
    fn resolve_entry(&self, ctx: &ActionContext<'_>) -> Option<EntryIndex> {
        ctx.with_world(|w| {
            w.find_entry(&self.design.vehicle_object)
                .filter(|&index| w.entry_is_available(index))
        })
    }

    fn create_ride(&self, ctx: &ActionContext<'_>, entry: Option<EntryIndex>) -> Result<RideId, ActionResult> {
        let created = ctx.execute_nested(&RideCreate {
            ride_type: self.design.ride_type,
            entry,
        });
        if !created.is_ok() {
            return Err(ActionResult {
                status: ActionStatus::NoFreeElements,
                title: Some(CANT_CREATE_RIDE.to_string()),
                message: created.message,
                position: self.position(),
                ..ActionResult::default()
            });
        }
        match created.entity_id {
            Some(id) => Ok(id as RideId),
            None => {
                tracing::warn!("Ride creation reported success without a ride id");
                Err(self.fail(ActionStatus::Unknown, "Unknown error"))
            }
        }
    }

    /// Dry-run placement, dropping scenery that is not loaded.
    fn plan(&self, ctx: &ActionContext<'_>, ride: RideId) -> Result<Placement, String> {
        ctx.with_world(|w| {
            let attempt = w.plan_track(&self.design, self.location, ride, true);
            let attempt = match attempt {
                Err(PlacementError::SceneryUnavailable) => {
                    w.plan_track(&self.design, self.location, ride, false)
                }
                other => other,
            };
            attempt.map_err(|e| match e {
                PlacementError::Blocked(reason) => reason,
                PlacementError::SceneryUnavailable => "Scenery not available".to_string(),
            })
        })
    }

    /// Demolish the half-built ride and hand back `result`.
    fn abandon(&self, ctx: &ActionContext<'_>, ride: RideId, result: ActionResult) -> ActionResult {
        let demolished = ctx.execute_nested(&RideDemolish { ride });
        if !demolished.is_ok() {
            tracing::warn!(ride, "Could not demolish ride after failed track placement");
        }
        result
    }

    fn configure(&self, ctx: &ActionContext<'_>, ride: RideId, entry: Option<EntryIndex>) -> ActionResult {
        let design = &self.design;

        if let Some(entry) = entry {
            let colour = ctx.with_world(|w| w.unused_vehicle_colour(entry));
            let result = ctx.execute_nested(&RideSetVehicle {
                ride,
                kind: RideSetVehicleType::RideEntry,
                value: entry,
                colour,
            });
            if !result.is_ok() {
                return result;
            }
        }

        let num_circuits = if design.num_circuits == 0 { 1 } else { design.num_circuits };
        let steps: [&dyn GameAction; 9] = [
            &RideSetSetting::new(ride, RideSetting::Mode, design.ride_mode),
            &RideSetVehicle {
                ride,
                kind: RideSetVehicleType::NumTrains,
                value: design.number_of_trains as u16,
                colour: 0,
            },
            &RideSetVehicle {
                ride,
                kind: RideSetVehicleType::NumCarsPerTrain,
                value: design.number_of_cars_per_train as u16,
                colour: 0,
            },
            &RideSetSetting::new(ride, RideSetting::Departure, design.depart_flags),
            &RideSetSetting::new(ride, RideSetting::MinWaitingTime, design.min_waiting_time),
            &RideSetSetting::new(ride, RideSetting::MaxWaitingTime, design.max_waiting_time),
            &RideSetSetting::new(ride, RideSetting::Operation, design.operation_setting),
            &RideSetSetting::new(ride, RideSetting::LiftHillSpeed, design.lift_hill_speed & 0x1F),
            &RideSetSetting::new(ride, RideSetting::NumCircuits, num_circuits),
        ];
        for step in steps {
            let result = ctx.execute_nested(step);
            if !result.is_ok() {
                return result;
            }
        }

        ctx.with_world_mut(|w| {
            if let Some(r) = w.rides.get_mut(&ride) {
                r.custom_design = false;
                r.colour_scheme = design.colour_scheme;
                r.entrance_style = design.entrance_style;
            }
        });

        self.apply_name(ctx, ride)
    }

    /// Try "Name", "Name 2", "Name 3", ... until one is free.
    fn apply_name(&self, ctx: &ActionContext<'_>, ride: RideId) -> ActionResult {
        let base = self.design.name.trim();
        if base.is_empty() {
            return ActionResult::ok();
        }
        for attempt in 1..=MAX_NAME_ATTEMPTS {
            let name = if attempt == 1 {
                base.to_string()
            } else {
                format!("{} {}", base, attempt)
            };
            let result = ctx.execute_nested(&RideSetName { ride, name });
            if result.is_ok() {
                return result;
            }
            if result.message.as_deref() != Some(ERR_NAME_IN_USE) {
                return result;
            }
        }
        ActionResult::fail(
            ActionStatus::RetriesExhausted,
            format!("No free name after {} attempts", MAX_NAME_ATTEMPTS),
        )
    }
}

impl GameAction for TrackDesignAction {
    fn kind(&self) -> ActionKind {
        ActionKind::TrackDesign
    }

    fn params(&self) -> Result<serde_json::Value, ActionError> {
        params_of(&self.kind(), self)
    }

    fn query(&self, ctx: &ActionContext<'_>) -> ActionResult {
        if !ctx.with_world(|w| w.location_valid(self.location)) {
            return self.fail(ActionStatus::InvalidParameters, "Invalid location");
        }

        let entry = self.resolve_entry(ctx);
        let ride = match self.create_ride(ctx, entry) {
            Ok(ride) => ride,
            Err(result) => return result,
        };

        let planned = self.plan(ctx, ride);
        // The ride only existed to test placement.
        let result = match planned {
            Ok(placement) => ActionResult::ok()
                .with_cost(placement.cost)
                .with_position(self.position()),
            Err(reason) => self.fail(ActionStatus::Disallowed, reason),
        };
        self.abandon(ctx, ride, result)
    }

    fn execute(&self, ctx: &ActionContext<'_>) -> ActionResult {
        let entry = self.resolve_entry(ctx);
        let ride = match self.create_ride(ctx, entry) {
            Ok(ride) => ride,
            Err(result) => return result,
        };

        let placement = match self.plan(ctx, ride) {
            Ok(placement) => placement,
            Err(reason) => {
                return self.abandon(ctx, ride, self.fail(ActionStatus::Disallowed, reason));
            }
        };
        let op = if ctx.is_ghost() {
            PlaceOperation::Ghost
        } else {
            PlaceOperation::Place
        };
        ctx.with_world_mut(|w| w.commit_track(ride, &placement, op));

        let configured = self.configure(ctx, ride, entry);
        if !configured.is_ok() {
            tracing::debug!(ride, status = %configured.status, "Track design configuration failed");
            let failure = ActionResult {
                title: Some(CANT_CONSTRUCT.to_string()),
                position: self.position(),
                ..configured
            };
            return self.abandon(ctx, ride, failure);
        }

        ActionResult::ok()
            .with_cost(placement.cost)
            .with_position(self.position())
            .with_entity(ride as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ActionExecutor, ExecuteMode};
    use crate::world::{GameState, SceneryElement, TrackElement, TRACK_PIECE_COST};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tycoon_core::ActionFlags;

    fn executor() -> ActionExecutor {
        ActionExecutor::new(Arc::new(Mutex::new(GameState::sandbox())))
    }

    fn design(name: &str) -> TrackDesign {
        TrackDesign {
            name: name.into(),
            ride_type: 1,
            vehicle_object: "rct2.ride.wmouse".into(),
            ride_mode: 3,
            number_of_trains: 2,
            number_of_cars_per_train: 4,
            depart_flags: 1,
            min_waiting_time: 5,
            max_waiting_time: 30,
            operation_setting: 0,
            lift_hill_speed: 0x25,
            num_circuits: 0,
            colour_scheme: 1,
            entrance_style: 2,
            elements: vec![TrackElement { x: 0, y: 0 }, TrackElement { x: 1, y: 0 }],
            scenery: vec![],
        }
    }

    /// Place `d` at tile (tx, ty).
    fn place(exec: &ActionExecutor, d: TrackDesign, tx: i32, ty: i32) -> ActionResult {
        exec.submit(
            &TrackDesignAction::new(Coords::new(tx * 32, ty * 32, 0), d),
            ActionFlags::empty(),
            ExecuteMode::QueryThenApply,
        )
    }

    #[test]
    fn test_extreme_coordinates_are_invalid_parameters() {
        let exec = executor();
        let before = exec.world().lock().clone();

        let far = exec.submit(
            &TrackDesignAction::new(Coords::new(i32::MAX, i32::MAX, 0), design("Far")),
            ActionFlags::empty(),
            ExecuteMode::QueryThenApply,
        );
        assert_eq!(far.status, ActionStatus::InvalidParameters);
        assert_eq!(far.position, Coords::new(i32::MAX, i32::MAX, 0));

        let mut stretched = design("Stretched");
        stretched.elements.push(TrackElement { x: i32::MAX, y: 0 });
        let blocked = place(&exec, stretched, 4, 4);
        assert!(!blocked.is_ok());

        assert_eq!(*exec.world().lock(), before);
    }

    #[test]
    fn test_query_leaves_world_untouched() {
        let exec = executor();
        let before = exec.world().lock().clone();

        let ok = exec.submit(
            &TrackDesignAction::new(Coords::new(64, 64, 0), design("Mouse")),
            ActionFlags::empty(),
            ExecuteMode::QueryOnly,
        );
        assert!(ok.is_ok());
        assert_eq!(ok.cost, 2 * TRACK_PIECE_COST);
        assert_eq!(*exec.world().lock(), before);

        let off_map = exec.submit(
            &TrackDesignAction::new(Coords::new(63 * 32, 0, 0), design("Mouse")),
            ActionFlags::empty(),
            ExecuteMode::QueryOnly,
        );
        assert_eq!(off_map.status, ActionStatus::Disallowed);
        assert_eq!(*exec.world().lock(), before);
    }

    #[test]
    fn test_execute_builds_configured_ride() {
        let exec = executor();
        let result = place(&exec, design("Mouse"), 2, 2);
        assert!(result.is_ok(), "{:?}", result);
        assert_eq!(result.position, Coords::new(80, 80, 0));

        let world = exec.world();
        let world = world.lock();
        let ride = &world.rides[&(result.entity_id.unwrap() as RideId)];
        assert_eq!(ride.name, "Mouse");
        assert_eq!(ride.mode, 3);
        assert_eq!(ride.num_trains, 2);
        assert_eq!(ride.cars_per_train, 4);
        assert_eq!(ride.min_waiting_time, 5);
        assert_eq!(ride.max_waiting_time, 30);
        assert_eq!(ride.lift_hill_speed, 0x05);
        assert_eq!(ride.num_circuits, 1);
        assert_eq!(ride.colour_scheme, 1);
        assert!(!ride.custom_design);
        assert_eq!(ride.tiles, vec![(2, 2), (3, 2)]);
    }

    #[test]
    fn test_duplicate_names_get_suffixes() {
        let exec = executor();
        let first = place(&exec, design("Name"), 0, 0);
        let second = place(&exec, design("Name"), 0, 2);
        let third = place(&exec, design("Name"), 0, 4);

        let world = exec.world();
        let world = world.lock();
        let name = |r: &ActionResult| world.rides[&(r.entity_id.unwrap() as RideId)].name.clone();
        assert_eq!(name(&first), "Name");
        assert_eq!(name(&second), "Name 2");
        assert_eq!(name(&third), "Name 3");
    }

    #[test]
    fn test_failed_naming_rolls_back_ride() {
        let exec = executor();
        let too_long = "x".repeat(80);
        let rides_before = exec.world().lock().rides.len();
        let money_before = exec.world().lock().money;

        let result = place(&exec, design(&too_long), 1, 1);

        assert_eq!(result.status, ActionStatus::InvalidParameters);
        assert_eq!(result.title.as_deref(), Some(CANT_CONSTRUCT));
        let world = exec.world();
        let world = world.lock();
        assert_eq!(world.rides.len(), rides_before);
        assert!(world.occupied.is_empty());
        assert_eq!(world.money, money_before);
    }

    #[test]
    fn test_exhausted_names_roll_back() {
        let exec = executor();
        for i in 0..MAX_NAME_ATTEMPTS as i32 {
            assert!(place(&exec, design("Loop"), i % 16 * 2, i / 16 * 2).is_ok());
        }
        let rides_before = exec.world().lock().rides.len();

        let result = place(&exec, design("Loop"), 40, 40);

        assert_eq!(result.status, ActionStatus::RetriesExhausted);
        assert_eq!(exec.world().lock().rides.len(), rides_before);
    }

    #[test]
    fn test_blocked_placement_demolishes() {
        let exec = executor();
        assert!(place(&exec, design("A"), 5, 5).is_ok());
        let before = exec.world().lock().clone();

        let result = place(&exec, design("B"), 4, 5);

        assert_eq!(result.status, ActionStatus::Disallowed);
        assert_eq!(*exec.world().lock(), before);
    }

    #[test]
    fn test_missing_scenery_is_skipped() {
        let exec = executor();
        let mut d = design("Scenic");
        d.scenery = vec![SceneryElement {
            object: "custom.scenery.statue".into(),
            x: 0,
            y: 1,
        }];

        let result = place(&exec, d, 8, 8);
        assert!(result.is_ok());
        assert_eq!(result.cost, 2 * TRACK_PIECE_COST);
    }

    #[test]
    fn test_unresearched_vehicle_falls_back() {
        let exec = executor();
        let mut d = design("Looper");
        d.ride_type = 2;
        d.vehicle_object = "rct2.ride.arrt2".into();

        let result = place(&exec, d, 10, 10);
        assert!(result.is_ok());
        let world = exec.world();
        let world = world.lock();
        assert_eq!(world.rides[&(result.entity_id.unwrap() as RideId)].entry, 1);
    }

    #[test]
    fn test_replayed_log_rebuilds_state() {
        let exec = executor();
        place(&exec, design("Name"), 0, 0);
        place(&exec, design("Name"), 0, 2);
        let log = exec.replay_log();
        assert_eq!(log.len(), 2);

        let fresh = executor();
        let results = fresh.replay(&log);
        assert!(results.iter().all(ActionResult::is_ok));
        assert_eq!(*fresh.world().lock(), *exec.world().lock());
        assert!(fresh.replay_log().is_empty());
    }
}
