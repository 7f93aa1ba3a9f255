//! Seam between the executor and the script engine.
//!
//! The executor only knows this trait. The plugin crate implements it on top
//! of the interpreter and installs it with [`ActionExecutor::set_bridge`].
//!
//! [`ActionExecutor::set_bridge`]: crate::ActionExecutor::set_bridge

use tycoon_core::{ActionRecord, ActionResult};

use crate::action::Phase;

#[cfg_attr(test, mockall::automock)]
pub trait ScriptBridge: Send + Sync {
    /// Let script hooks observe a top-level action and amend its result.
    fn dispatch_action_hook(&self, phase: Phase, record: &ActionRecord, result: &mut ActionResult);

    /// Run a script-defined action's query or execute callback.
    fn query_or_execute_custom(
        &self,
        id: &str,
        args: &serde_json::Value,
        is_execute: bool,
    ) -> ActionResult;
}
