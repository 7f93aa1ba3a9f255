//! Action id to handler lookup.
//!
//! Built-in ids are registered up front. Any id without a registered
//! constructor is treated as a script-defined action and routed through the
//! [`ScriptBridge`](crate::ScriptBridge).

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use tycoon_core::{ActionError, ActionKind};

use crate::action::GameAction;
use crate::builtin::{RideCreate, RideDemolish, RideSetName, RideSetSetting, RideSetVehicle, TrackDesignAction};
use crate::custom::CustomAction;

type Constructor = fn(serde_json::Value) -> Result<Box<dyn GameAction>, ActionError>;

pub struct ActionFactory {
    constructors: HashMap<String, Constructor>,
}

impl ActionFactory {
    /// A factory with no built-ins. Every id resolves to a custom action.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut factory = Self::empty();
        factory.register(ActionKind::RideCreate, from_params::<RideCreate>);
        factory.register(ActionKind::RideDemolish, from_params::<RideDemolish>);
        factory.register(ActionKind::RideSetName, from_params::<RideSetName>);
        factory.register(ActionKind::RideSetVehicle, from_params::<RideSetVehicle>);
        factory.register(ActionKind::RideSetSetting, from_params::<RideSetSetting>);
        factory.register(ActionKind::TrackDesign, from_params::<TrackDesignAction>);
        factory
    }

    pub fn register(&mut self, kind: ActionKind, constructor: Constructor) {
        self.constructors.insert(kind.as_str().to_string(), constructor);
    }

    pub fn is_builtin(&self, id: &str) -> bool {
        self.constructors.contains_key(id)
    }

    pub fn create(
        &self,
        kind: &ActionKind,
        params: serde_json::Value,
    ) -> Result<Box<dyn GameAction>, ActionError> {
        match self.constructors.get(kind.as_str()) {
            Some(constructor) => constructor(params),
            None => Ok(Box::new(CustomAction::new(kind.as_str(), params))),
        }
    }
}

impl Default for ActionFactory {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn from_params<A>(params: serde_json::Value) -> Result<Box<dyn GameAction>, ActionError>
where
    A: GameAction + DeserializeOwned + 'static,
{
    let action: A = serde_json::from_value(params).map_err(|e| ActionError::InvalidParameters {
        kind: std::any::type_name::<A>()
            .rsplit("::")
            .next()
            .unwrap_or_default()
            .to_string(),
        message: e.to_string(),
    })?;
    Ok(Box::new(action))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtins_are_registered() {
        let factory = ActionFactory::with_builtins();
        for id in [
            "ridecreate",
            "ridedemolish",
            "ridesetname",
            "ridesetvehicle",
            "ridesetsetting",
            "trackdesign",
        ] {
            assert!(factory.is_builtin(id), "{} missing", id);
        }
        assert!(!factory.is_builtin("myplugin.spawn"));
    }

    #[test]
    fn test_create_builtin_keeps_params() {
        let factory = ActionFactory::with_builtins();
        let action = factory
            .create(&ActionKind::RideSetName, json!({ "ride": 2, "name": "Corkscrew" }))
            .unwrap();
        assert_eq!(action.kind(), ActionKind::RideSetName);
        assert_eq!(
            action.params().unwrap(),
            json!({ "ride": 2, "name": "Corkscrew" })
        );
    }

    #[test]
    fn test_unknown_id_is_custom() {
        let factory = ActionFactory::with_builtins();
        let action = factory
            .create(&ActionKind::from("myplugin.spawn"), json!({ "count": 3 }))
            .unwrap();
        assert_eq!(action.kind(), ActionKind::Custom("myplugin.spawn".into()));
        assert_eq!(action.params().unwrap(), json!({ "count": 3 }));
    }

    #[test]
    fn test_malformed_params_rejected() {
        let factory = ActionFactory::with_builtins();
        let err = factory
            .create(&ActionKind::RideDemolish, json!({ "ride": -4 }))
            .err()
            .unwrap();
        assert!(err.to_string().contains("RideDemolish"));
    }
}
