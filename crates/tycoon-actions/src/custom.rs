//! Script-defined actions.

use tycoon_core::{ActionError, ActionKind, ActionResult, ActionStatus};

use crate::action::{ActionContext, GameAction};

/// An action whose phases are plugin callbacks reached through the bridge.
#[derive(Debug, Clone)]
pub struct CustomAction {
    id: String,
    args: serde_json::Value,
}

impl CustomAction {
    pub fn new(id: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            args,
        }
    }

    fn run(&self, ctx: &ActionContext<'_>, is_execute: bool) -> ActionResult {
        match ctx.script_bridge() {
            Some(bridge) => bridge.query_or_execute_custom(&self.id, &self.args, is_execute),
            None => ActionResult::fail(
                ActionStatus::NotFound,
                format!("Unknown action '{}'", self.id),
            ),
        }
    }
}

impl GameAction for CustomAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Custom(self.id.clone())
    }

    fn params(&self) -> Result<serde_json::Value, ActionError> {
        Ok(self.args.clone())
    }

    fn query(&self, ctx: &ActionContext<'_>) -> ActionResult {
        self.run(ctx, false)
    }

    fn execute(&self, ctx: &ActionContext<'_>) -> ActionResult {
        self.run(ctx, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{MockScriptBridge, ScriptBridge};
    use crate::executor::{ActionExecutor, ExecuteMode};
    use crate::world::GameState;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;
    use tycoon_core::ActionFlags;

    #[test]
    fn test_custom_action_routes_both_phases_through_bridge() {
        let exec = ActionExecutor::new(Arc::new(Mutex::new(GameState::sandbox())));
        let mut bridge = MockScriptBridge::new();
        bridge.expect_dispatch_action_hook().return_const(());
        bridge
            .expect_query_or_execute_custom()
            .withf(|id, args, is_execute| {
                id == "fireworks" && args["colour"] == "red" && !*is_execute
            })
            .times(1)
            .returning(|_, _, _| ActionResult::ok().with_cost(40));
        bridge
            .expect_query_or_execute_custom()
            .withf(|id, _, is_execute| id == "fireworks" && *is_execute)
            .times(1)
            .returning(|_, _, _| ActionResult::ok().with_cost(40));
        let bridge: Arc<dyn ScriptBridge> = Arc::new(bridge);
        exec.set_bridge(Arc::downgrade(&bridge));

        let result = exec.submit(
            &CustomAction::new("fireworks", json!({ "colour": "red" })),
            ActionFlags::empty(),
            ExecuteMode::QueryThenApply,
        );

        assert!(result.is_ok());
        assert_eq!(result.cost, 40);
        assert_eq!(exec.replay_log()[0].params, json!({ "colour": "red" }));
    }

    #[test]
    fn test_dropped_bridge_means_not_found() {
        let exec = ActionExecutor::new(Arc::new(Mutex::new(GameState::sandbox())));
        {
            let bridge: Arc<dyn ScriptBridge> = Arc::new(MockScriptBridge::new());
            exec.set_bridge(Arc::downgrade(&bridge));
        }

        let result = exec.submit(
            &CustomAction::new("fireworks", json!({})),
            ActionFlags::empty(),
            ExecuteMode::QueryOnly,
        );
        assert_eq!(result.status, ActionStatus::NotFound);
    }
}
