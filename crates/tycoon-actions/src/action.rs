//! The two-phase action contract.
//!
//! An action is an immutable request. The executor calls [`GameAction::query`]
//! to validate and cost it without touching durable state, then
//! [`GameAction::execute`] to apply it. Both phases receive an
//! [`ActionContext`] giving access to the world and to nested submission.

use std::sync::Arc;

use tycoon_core::{ActionError, ActionFlags, ActionKind, ActionResult};

use crate::bridge::ScriptBridge;
use crate::executor::{ActionExecutor, ExecuteMode};
use crate::world::GameState;

/// Which half of the contract is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Query,
    Execute,
}

/// A serialisable request with a query/execute contract.
pub trait GameAction {
    fn kind(&self) -> ActionKind;

    /// Full parameter set, used for the replay log and for hooks.
    fn params(&self) -> Result<serde_json::Value, ActionError>;

    /// Validate and cost. Must not mutate durable state.
    fn query(&self, ctx: &ActionContext<'_>) -> ActionResult;

    /// Apply. Only called after a successful query.
    fn execute(&self, ctx: &ActionContext<'_>) -> ActionResult;
}

/// Serialise an action's fields, mapping failure onto [`ActionError`].
pub fn params_of<T: serde::Serialize>(kind: &ActionKind, value: &T) -> Result<serde_json::Value, ActionError> {
    serde_json::to_value(value).map_err(|e| ActionError::Serialize {
        kind: kind.to_string(),
        message: e.to_string(),
    })
}

/// Per-phase view of the executor handed to an action.
pub struct ActionContext<'a> {
    executor: &'a ActionExecutor,
    flags: ActionFlags,
    phase: Phase,
}

impl<'a> ActionContext<'a> {
    pub(crate) fn new(executor: &'a ActionExecutor, flags: ActionFlags, phase: Phase) -> Self {
        Self {
            executor,
            flags,
            phase,
        }
    }

    pub fn flags(&self) -> ActionFlags {
        self.flags
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_ghost(&self) -> bool {
        self.flags.contains(ActionFlags::GHOST)
    }

    /// Read the world. The lock is released before this returns.
    pub fn with_world<R>(&self, f: impl FnOnce(&GameState) -> R) -> R {
        let world = self.executor.world();
        let guard = world.lock();
        f(&guard)
    }

    /// Mutate the world. Only valid during the execute phase.
    pub fn with_world_mut<R>(&self, f: impl FnOnce(&mut GameState) -> R) -> R {
        debug_assert_eq!(self.phase, Phase::Execute, "query phase mutated the world");
        let world = self.executor.world();
        let mut guard = world.lock();
        f(&mut guard)
    }

    /// Query then execute `action` as a child of the running action.
    pub fn execute_nested(&self, action: &dyn GameAction) -> ActionResult {
        self.executor
            .run_nested(action, self.flags, ExecuteMode::QueryThenApply)
    }

    /// Query `action` as a child of the running action.
    pub fn query_nested(&self, action: &dyn GameAction) -> ActionResult {
        self.executor
            .run_nested(action, self.flags, ExecuteMode::QueryOnly)
    }

    pub fn script_bridge(&self) -> Option<Arc<dyn ScriptBridge>> {
        self.executor.bridge()
    }
}
