//! Minimal park model mutated by the built-in actions.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tycoon_core::{Coords, Money};

pub type RideId = u16;
pub type EntryIndex = u16;

/// World units per map tile.
pub const TILE_SIZE: i32 = 32;
pub const MAX_RIDES: usize = 255;
pub const MAX_TRAINS_PER_RIDE: u8 = 32;
pub const MAX_CARS_PER_TRAIN: u8 = 12;
pub const MAX_RIDE_NAME_LENGTH: usize = 64;
pub const TRACK_PIECE_COST: Money = 150;
pub const SCENERY_PIECE_COST: Money = 25;
pub const VEHICLE_COLOUR_PRESETS: u8 = 8;

/// A ride vehicle definition loaded into the park.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RideEntry {
    pub identifier: String,
    pub name: String,
    pub ride_type: u8,
    pub researched: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cheats {
    pub ignore_research_status: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ride {
    pub id: RideId,
    pub ride_type: u8,
    pub entry: EntryIndex,
    pub name: String,
    pub vehicle_colour: u8,
    pub mode: u8,
    pub num_trains: u8,
    pub cars_per_train: u8,
    pub departure_flags: u8,
    pub min_waiting_time: u8,
    pub max_waiting_time: u8,
    pub operation_option: u8,
    pub lift_hill_speed: u8,
    pub num_circuits: u8,
    pub colour_scheme: u8,
    pub entrance_style: u8,
    pub custom_design: bool,
    pub ghost: bool,
    pub tiles: Vec<(i32, i32)>,
}

/// One track piece, offset in tiles from the placement origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackElement {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneryElement {
    pub object: String,
    pub x: i32,
    pub y: i32,
}

/// A saved ride layout plus the operating settings it was saved with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackDesign {
    pub name: String,
    pub ride_type: u8,
    pub vehicle_object: String,
    #[serde(default)]
    pub ride_mode: u8,
    #[serde(default = "one")]
    pub number_of_trains: u8,
    #[serde(default = "one")]
    pub number_of_cars_per_train: u8,
    #[serde(default)]
    pub depart_flags: u8,
    #[serde(default)]
    pub min_waiting_time: u8,
    #[serde(default)]
    pub max_waiting_time: u8,
    #[serde(default)]
    pub operation_setting: u8,
    #[serde(default)]
    pub lift_hill_speed: u8,
    #[serde(default)]
    pub num_circuits: u8,
    #[serde(default)]
    pub colour_scheme: u8,
    #[serde(default)]
    pub entrance_style: u8,
    pub elements: Vec<TrackElement>,
    #[serde(default)]
    pub scenery: Vec<SceneryElement>,
}

fn one() -> u8 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceOperation {
    Place,
    Ghost,
}

/// Tiles and cost of a track layout that fits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub tiles: Vec<(i32, i32)>,
    pub cost: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementError {
    SceneryUnavailable,
    Blocked(String),
}

/// Everything the built-in actions read or write.
#[derive(Debug, Clone, PartialEq)]
pub struct GameState {
    pub money: Money,
    /// Map edge length in tiles.
    pub map_size: i32,
    pub rides: BTreeMap<RideId, Ride>,
    pub ride_entries: Vec<RideEntry>,
    pub scenery_objects: BTreeSet<String>,
    pub occupied: BTreeMap<(i32, i32), RideId>,
    pub cheats: Cheats,
}

impl GameState {
    pub fn new(map_size: i32, money: Money) -> Self {
        Self {
            money,
            map_size,
            rides: BTreeMap::new(),
            ride_entries: Vec::new(),
            scenery_objects: BTreeSet::new(),
            occupied: BTreeMap::new(),
            cheats: Cheats::default(),
        }
    }

    /// A small park with a handful of loaded objects.
    pub fn sandbox() -> Self {
        let mut state = Self::new(64, 50_000);
        state.ride_entries = vec![
            RideEntry {
                identifier: "rct2.ride.wmouse".into(),
                name: "Wild Mouse".into(),
                ride_type: 1,
                researched: true,
            },
            RideEntry {
                identifier: "rct2.ride.smc1".into(),
                name: "Steel Mini Coaster".into(),
                ride_type: 2,
                researched: true,
            },
            RideEntry {
                identifier: "rct2.ride.arrt2".into(),
                name: "Looping Coaster".into(),
                ride_type: 2,
                researched: false,
            },
        ];
        state.scenery_objects = ["rct2.scenery_small.tl0", "rct2.scenery_small.bench1"]
            .into_iter()
            .map(String::from)
            .collect();
        state
    }

    pub fn location_valid(&self, loc: Coords) -> bool {
        let edge = self.map_size * TILE_SIZE;
        (0..edge).contains(&loc.x) && (0..edge).contains(&loc.y) && loc.z >= 0
    }

    pub fn find_entry(&self, identifier: &str) -> Option<EntryIndex> {
        self.ride_entries
            .iter()
            .position(|e| e.identifier == identifier)
            .map(|i| i as EntryIndex)
    }

    pub fn entry(&self, index: EntryIndex) -> Option<&RideEntry> {
        self.ride_entries.get(index as usize)
    }

    /// Whether an entry may be built, honouring the research cheat.
    pub fn entry_is_available(&self, index: EntryIndex) -> bool {
        self.entry(index)
            .map(|e| e.researched || self.cheats.ignore_research_status)
            .unwrap_or(false)
    }

    /// First buildable entry for a ride type.
    pub fn default_entry_for(&self, ride_type: u8) -> Option<EntryIndex> {
        (0..self.ride_entries.len() as EntryIndex)
            .find(|&i| self.ride_entries[i as usize].ride_type == ride_type && self.entry_is_available(i))
    }

    pub fn next_free_ride_id(&self) -> Option<RideId> {
        (0..MAX_RIDES as RideId).find(|id| !self.rides.contains_key(id))
    }

    pub fn ride_name_in_use(&self, name: &str, except: RideId) -> bool {
        self.rides
            .values()
            .any(|r| r.id != except && r.name == name)
    }

    /// "<entry name> <n>" with the lowest unused n.
    pub fn default_ride_name(&self, entry: EntryIndex) -> String {
        let base = self
            .entry(entry)
            .map(|e| e.name.clone())
            .unwrap_or_else(|| "Ride".to_string());
        (1..)
            .map(|n| format!("{} {}", base, n))
            .find(|name| !self.ride_name_in_use(name, RideId::MAX))
            .unwrap_or(base)
    }

    /// Preset colour least used by rides of the same entry.
    pub fn unused_vehicle_colour(&self, entry: EntryIndex) -> u8 {
        let mut counts = [0usize; VEHICLE_COLOUR_PRESETS as usize];
        for ride in self.rides.values().filter(|r| r.entry == entry) {
            counts[(ride.vehicle_colour % VEHICLE_COLOUR_PRESETS) as usize] += 1;
        }
        counts
            .iter()
            .enumerate()
            .min_by_key(|(_, c)| **c)
            .map(|(i, _)| i as u8)
            .unwrap_or(0)
    }

    /// Dry-run a track layout at `loc` for `ride`.
    pub fn plan_track(
        &self,
        design: &TrackDesign,
        loc: Coords,
        ride: RideId,
        place_scenery: bool,
    ) -> Result<Placement, PlacementError> {
        if place_scenery
            && design
                .scenery
                .iter()
                .any(|s| !self.scenery_objects.contains(&s.object))
        {
            return Err(PlacementError::SceneryUnavailable);
        }

        let origin = (loc.x / TILE_SIZE, loc.y / TILE_SIZE);
        let mut tiles = Vec::with_capacity(design.elements.len());
        for element in &design.elements {
            let on_map = |v: i32| (0..self.map_size).contains(&v);
            let tile = match (origin.0.checked_add(element.x), origin.1.checked_add(element.y)) {
                (Some(x), Some(y)) if on_map(x) && on_map(y) => (x, y),
                _ => return Err(PlacementError::Blocked("Off edge of map".into())),
            };
            match self.occupied.get(&tile) {
                Some(&owner) if owner != ride => {
                    return Err(PlacementError::Blocked(format!(
                        "Tile ({}, {}) is in the way",
                        tile.0, tile.1
                    )));
                }
                _ => {}
            }
            if !tiles.contains(&tile) {
                tiles.push(tile);
            }
        }

        let mut cost = design.elements.len() as Money * TRACK_PIECE_COST;
        if place_scenery {
            cost += design.scenery.len() as Money * SCENERY_PIECE_COST;
        }
        Ok(Placement { tiles, cost })
    }

    /// Occupy the planned tiles with `ride`.
    pub fn commit_track(&mut self, ride: RideId, placement: &Placement, op: PlaceOperation) {
        for tile in &placement.tiles {
            self.occupied.insert(*tile, ride);
        }
        if let Some(r) = self.rides.get_mut(&ride) {
            r.tiles.extend(placement.tiles.iter().copied());
            r.ghost = op == PlaceOperation::Ghost;
        }
    }

    /// Remove a ride and release its tiles.
    pub fn remove_ride(&mut self, id: RideId) -> Option<Ride> {
        let ride = self.rides.remove(&id)?;
        self.occupied.retain(|_, owner| *owner != id);
        Some(ride)
    }
}
