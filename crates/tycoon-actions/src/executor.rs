//! Action executor.
//!
//! ## Top-level submissions
//!
//! 1. Query runs. A non-ghost query whose cost exceeds the park's money fails
//!    with `InsufficientFunds`.
//! 2. `action.query` hooks see the query result and may veto it.
//! 3. In `QueryThenApply` mode with an ok query, execute runs.
//! 4. On success the cost is charged (unless ghost) and the record is logged
//!    (unless ghost or replay).
//! 5. `action.execute` hooks see the final result.
//!
//! ## Nested submissions
//!
//! An action submitting another action from inside one of its phases gets a
//! nested run: flags are inherited, nothing is charged, logged, or hooked, and
//! failures come back as plain results. A submission that arrives while a
//! phase is running (a custom action's callback calling back into the
//! executor, for instance) is nested the same way.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tycoon_core::{ActionFlags, ActionKind, ActionRecord, ActionResult, ActionStatus};

use crate::action::{ActionContext, GameAction, Phase};
use crate::bridge::ScriptBridge;
use crate::factory::ActionFactory;
use crate::world::GameState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteMode {
    QueryOnly,
    QueryThenApply,
}

pub struct ActionExecutor {
    world: Arc<Mutex<GameState>>,
    factory: ActionFactory,
    bridge: RwLock<Option<Weak<dyn ScriptBridge>>>,
    log: Mutex<Vec<ActionRecord>>,
    /// Flags of every phase currently on the stack.
    frames: Mutex<Vec<ActionFlags>>,
}

/// Pops the frame pushed for a running phase.
struct FrameGuard<'a> {
    frames: &'a Mutex<Vec<ActionFlags>>,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.frames.lock().pop();
    }
}

impl ActionExecutor {
    pub fn new(world: Arc<Mutex<GameState>>) -> Self {
        Self::with_factory(world, ActionFactory::with_builtins())
    }

    pub fn with_factory(world: Arc<Mutex<GameState>>, factory: ActionFactory) -> Self {
        Self {
            world,
            factory,
            bridge: RwLock::new(None),
            log: Mutex::new(Vec::new()),
            frames: Mutex::new(Vec::new()),
        }
    }

    pub fn world(&self) -> Arc<Mutex<GameState>> {
        Arc::clone(&self.world)
    }

    pub fn set_bridge(&self, bridge: Weak<dyn ScriptBridge>) {
        *self.bridge.write() = Some(bridge);
    }

    pub fn clear_bridge(&self) {
        *self.bridge.write() = None;
    }

    pub(crate) fn bridge(&self) -> Option<Arc<dyn ScriptBridge>> {
        self.bridge.read().as_ref().and_then(Weak::upgrade)
    }

    /// Build an action from its id and parameters, then submit it.
    pub fn submit_request(
        &self,
        kind: ActionKind,
        params: serde_json::Value,
        flags: ActionFlags,
        mode: ExecuteMode,
    ) -> ActionResult {
        match self.factory.create(&kind, params) {
            Ok(action) => self.submit(action.as_ref(), flags, mode),
            Err(e) => {
                tracing::debug!(action = %kind, "Rejected request: {}", e);
                ActionResult::fail(ActionStatus::InvalidParameters, e.to_string())
            }
        }
    }

    /// Submit an action. Nested automatically when a phase is already running.
    pub fn submit(&self, action: &dyn GameAction, flags: ActionFlags, mode: ExecuteMode) -> ActionResult {
        let parent = self.frames.lock().last().copied();
        if let Some(parent) = parent {
            return self.run_nested(action, parent, mode);
        }

        let kind = action.kind();
        let record = match action.params() {
            Ok(params) => ActionRecord::new(kind.clone(), flags, params),
            Err(e) => return ActionResult::fail(ActionStatus::InvalidParameters, e.to_string()),
        };
        let ghost = flags.contains(ActionFlags::GHOST);
        let bridge = self.bridge();

        let mut result = self.run_phase(action, flags, Phase::Query);
        if result.is_ok() && !ghost && result.cost > 0 && result.cost > self.world.lock().money {
            result = ActionResult::fail(ActionStatus::InsufficientFunds, "Not enough cash")
                .with_cost(result.cost)
                .with_position(result.position);
        }
        if let Some(bridge) = &bridge {
            bridge.dispatch_action_hook(Phase::Query, &record, &mut result);
        }
        if !result.is_ok() {
            tracing::debug!(action = %kind, status = %result.status, "Query failed");
            return result;
        }
        if mode == ExecuteMode::QueryOnly {
            return result;
        }

        let mut result = self.run_phase(action, flags | ActionFlags::APPLY, Phase::Execute);
        if result.is_ok() {
            if !ghost {
                self.world.lock().money -= result.cost;
            }
            if !ghost && !flags.contains(ActionFlags::REPLAY) {
                self.log.lock().push(record.clone());
            }
        }
        if let Some(bridge) = &bridge {
            bridge.dispatch_action_hook(Phase::Execute, &record, &mut result);
        }
        tracing::debug!(action = %kind, status = %result.status, cost = result.cost, "Executed");
        result
    }

    pub(crate) fn run_nested(
        &self,
        action: &dyn GameAction,
        parent: ActionFlags,
        mode: ExecuteMode,
    ) -> ActionResult {
        let flags = parent.inherited();
        let result = self.run_phase(action, flags, Phase::Query);
        if !result.is_ok() || mode == ExecuteMode::QueryOnly {
            return result;
        }
        self.run_phase(action, flags | ActionFlags::APPLY, Phase::Execute)
    }

    fn run_phase(&self, action: &dyn GameAction, flags: ActionFlags, phase: Phase) -> ActionResult {
        self.frames.lock().push(flags);
        let _frame = FrameGuard {
            frames: &self.frames,
        };
        let ctx = ActionContext::new(self, flags, phase);
        match phase {
            Phase::Query => action.query(&ctx),
            Phase::Execute => action.execute(&ctx),
        }
    }

    /// Re-run logged submissions with the replay flag set.
    pub fn replay(&self, records: &[ActionRecord]) -> Vec<ActionResult> {
        records
            .iter()
            .map(|record| {
                self.submit_request(
                    record.kind.clone(),
                    record.params.clone(),
                    record.flags() | ActionFlags::REPLAY,
                    ExecuteMode::QueryThenApply,
                )
            })
            .collect()
    }

    /// Snapshot of the replay log.
    pub fn replay_log(&self) -> Vec<ActionRecord> {
        self.log.lock().clone()
    }

    pub fn take_replay_log(&self) -> Vec<ActionRecord> {
        std::mem::take(&mut *self.log.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::MockScriptBridge;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn executor() -> ActionExecutor {
        ActionExecutor::new(Arc::new(Mutex::new(GameState::sandbox())))
    }

    /// Counts calls and fails its query on demand.
    struct StubAction {
        fail_query: bool,
        cost: i64,
        queries: AtomicUsize,
        executes: AtomicUsize,
    }

    impl StubAction {
        fn new(fail_query: bool, cost: i64) -> Self {
            Self {
                fail_query,
                cost,
                queries: AtomicUsize::new(0),
                executes: AtomicUsize::new(0),
            }
        }
    }

    impl GameAction for StubAction {
        fn kind(&self) -> ActionKind {
            ActionKind::Custom("stub".into())
        }

        fn params(&self) -> Result<serde_json::Value, tycoon_core::ActionError> {
            Ok(json!({ "cost": self.cost }))
        }

        fn query(&self, _ctx: &ActionContext<'_>) -> ActionResult {
            self.queries.fetch_add(1, Ordering::SeqCst);
            if self.fail_query {
                ActionResult::fail(ActionStatus::Disallowed, "stub says no")
            } else {
                ActionResult::ok().with_cost(self.cost)
            }
        }

        fn execute(&self, _ctx: &ActionContext<'_>) -> ActionResult {
            self.executes.fetch_add(1, Ordering::SeqCst);
            ActionResult::ok().with_cost(self.cost)
        }
    }

    /// Records the flags its nested child sees.
    struct Parent {
        seen: Mutex<Vec<ActionFlags>>,
    }

    struct Child<'a> {
        seen: &'a Mutex<Vec<ActionFlags>>,
    }

    impl GameAction for Child<'_> {
        fn kind(&self) -> ActionKind {
            ActionKind::Custom("child".into())
        }
        fn params(&self) -> Result<serde_json::Value, tycoon_core::ActionError> {
            Ok(json!({}))
        }
        fn query(&self, ctx: &ActionContext<'_>) -> ActionResult {
            self.seen.lock().push(ctx.flags());
            ActionResult::ok()
        }
        fn execute(&self, ctx: &ActionContext<'_>) -> ActionResult {
            self.seen.lock().push(ctx.flags());
            ActionResult::ok().with_cost(10)
        }
    }

    impl GameAction for Parent {
        fn kind(&self) -> ActionKind {
            ActionKind::Custom("parent".into())
        }
        fn params(&self) -> Result<serde_json::Value, tycoon_core::ActionError> {
            Ok(json!({}))
        }
        fn query(&self, _ctx: &ActionContext<'_>) -> ActionResult {
            ActionResult::ok()
        }
        fn execute(&self, ctx: &ActionContext<'_>) -> ActionResult {
            ctx.execute_nested(&Child { seen: &self.seen })
        }
    }

    #[test]
    fn test_failed_query_never_executes() {
        let exec = executor();
        let before = exec.world().lock().clone();
        let stub = StubAction::new(true, 100);

        let result = exec.submit(&stub, ActionFlags::empty(), ExecuteMode::QueryThenApply);

        assert_eq!(result.status, ActionStatus::Disallowed);
        assert_eq!(stub.executes.load(Ordering::SeqCst), 0);
        assert_eq!(*exec.world().lock(), before);
        assert!(exec.replay_log().is_empty());
    }

    #[test]
    fn test_query_only_skips_execute() {
        let exec = executor();
        let stub = StubAction::new(false, 100);

        let result = exec.submit(&stub, ActionFlags::empty(), ExecuteMode::QueryOnly);

        assert!(result.is_ok());
        assert_eq!(result.cost, 100);
        assert_eq!(stub.queries.load(Ordering::SeqCst), 1);
        assert_eq!(stub.executes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_execute_charges_and_logs() {
        let exec = executor();
        let money = exec.world().lock().money;
        let stub = StubAction::new(false, 300);

        let result = exec.submit(&stub, ActionFlags::empty(), ExecuteMode::QueryThenApply);

        assert!(result.is_ok());
        assert_eq!(exec.world().lock().money, money - 300);
        let log = exec.replay_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].kind, ActionKind::Custom("stub".into()));
    }

    #[test]
    fn test_insufficient_funds() {
        let exec = executor();
        exec.world().lock().money = 50;
        let stub = StubAction::new(false, 300);

        let result = exec.submit(&stub, ActionFlags::empty(), ExecuteMode::QueryThenApply);

        assert_eq!(result.status, ActionStatus::InsufficientFunds);
        assert_eq!(stub.executes.load(Ordering::SeqCst), 0);

        let ghost = exec.submit(&stub, ActionFlags::GHOST, ExecuteMode::QueryThenApply);
        assert!(ghost.is_ok());
        assert_eq!(exec.world().lock().money, 50);
    }

    #[test]
    fn test_replay_and_ghost_are_not_logged() {
        let exec = executor();
        let stub = StubAction::new(false, 1);

        exec.submit(&stub, ActionFlags::REPLAY, ExecuteMode::QueryThenApply);
        exec.submit(&stub, ActionFlags::GHOST, ExecuteMode::QueryThenApply);

        assert!(exec.replay_log().is_empty());
        assert_eq!(stub.executes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_nested_inherits_flags_and_is_not_logged() {
        let exec = executor();
        let parent = Parent {
            seen: Mutex::new(Vec::new()),
        };

        let result = exec.submit(
            &parent,
            ActionFlags::GHOST | ActionFlags::NETWORK_ORIGIN,
            ExecuteMode::QueryThenApply,
        );

        assert!(result.is_ok());
        let seen = parent.seen.lock().clone();
        assert_eq!(
            seen,
            vec![
                ActionFlags::GHOST | ActionFlags::NETWORK_ORIGIN,
                ActionFlags::GHOST | ActionFlags::NETWORK_ORIGIN | ActionFlags::APPLY,
            ]
        );
        assert!(exec.replay_log().is_empty());
    }

    #[test]
    fn test_query_hook_can_veto() {
        let exec = executor();
        let mut bridge = MockScriptBridge::new();
        bridge
            .expect_dispatch_action_hook()
            .withf(|phase, record, _| *phase == Phase::Query && record.kind.as_str() == "stub")
            .times(1)
            .returning(|_, _, result| {
                result.status = ActionStatus::Disallowed;
                result.message = Some("vetoed".into());
            });
        let bridge: Arc<dyn ScriptBridge> = Arc::new(bridge);
        exec.set_bridge(Arc::downgrade(&bridge));
        let stub = StubAction::new(false, 5);

        let result = exec.submit(&stub, ActionFlags::empty(), ExecuteMode::QueryThenApply);

        assert_eq!(result.status, ActionStatus::Disallowed);
        assert_eq!(result.message.as_deref(), Some("vetoed"));
        assert_eq!(stub.executes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_execute_hook_sees_final_result() {
        let exec = executor();
        let mut bridge = MockScriptBridge::new();
        bridge
            .expect_dispatch_action_hook()
            .withf(|phase, _, _| *phase == Phase::Query)
            .times(1)
            .return_const(());
        bridge
            .expect_dispatch_action_hook()
            .withf(|phase, _, result| *phase == Phase::Execute && result.cost == 7)
            .times(1)
            .return_const(());
        let bridge: Arc<dyn ScriptBridge> = Arc::new(bridge);
        exec.set_bridge(Arc::downgrade(&bridge));

        let result = exec.submit(&StubAction::new(false, 7), ActionFlags::empty(), ExecuteMode::QueryThenApply);
        assert!(result.is_ok());
    }

    #[test]
    fn test_unknown_custom_action_without_bridge_is_not_found() {
        let exec = executor();
        let result = exec.submit_request(
            ActionKind::Custom("nobody.home".into()),
            json!({}),
            ActionFlags::empty(),
            ExecuteMode::QueryOnly,
        );
        assert_eq!(result.status, ActionStatus::NotFound);
    }

    #[test]
    fn test_bad_params_are_invalid_parameters() {
        let exec = executor();
        let result = exec.submit_request(
            ActionKind::RideSetName,
            json!({ "ride": "not a number" }),
            ActionFlags::empty(),
            ExecuteMode::QueryThenApply,
        );
        assert_eq!(result.status, ActionStatus::InvalidParameters);
    }
}
