//! Two-phase action framework.
//!
//! - [`GameAction`] - the query/execute contract
//! - [`ActionExecutor`] - top-level and nested submission, replay log
//! - [`ActionFactory`] - id to handler lookup, built-in or script-defined
//! - [`ScriptBridge`] - the executor's only view of the script engine
//! - [`GameState`] - the park the built-in actions operate on

mod action;
mod bridge;
pub mod builtin;
mod custom;
mod executor;
mod factory;
pub mod world;

pub use action::{params_of, ActionContext, GameAction, Phase};
pub use bridge::ScriptBridge;
pub use custom::CustomAction;
pub use executor::{ActionExecutor, ExecuteMode};
pub use factory::ActionFactory;
pub use world::GameState;
