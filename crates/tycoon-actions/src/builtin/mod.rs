//! Built-in actions.

mod ride;
mod track_design;

pub use ride::{
    RideCreate, RideDemolish, RideSetName, RideSetSetting, RideSetVehicle, RideSetVehicleType,
    RideSetting, ERR_INVALID_RIDE, ERR_NAME_IN_USE,
};
pub use track_design::{TrackDesignAction, CANT_CONSTRUCT, CANT_CREATE_RIDE, MAX_NAME_ATTEMPTS};
