//! Interval and timeout scheduling.
//!
//! An interval fires once in any update where at least `delay` ms have passed
//! since it last fired (or was added). Missed windows are not replayed.
//! Repeating intervals restart their window when they fire; one-shots are
//! removed as they fire.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::handle::{Handle, OwnedRegistry};
use crate::types::{LuaFunctionRef, Plugin, PluginId};

#[derive(Debug, Clone)]
pub struct ScriptInterval {
    pub owner: Arc<Plugin>,
    pub delay_ms: u64,
    pub last_timestamp: u64,
    pub callback: LuaFunctionRef,
    pub repeat: bool,
}

/// An interval picked to fire this update.
#[derive(Debug, Clone)]
pub struct DueInterval {
    pub handle: Handle,
    pub owner: Arc<Plugin>,
    pub callback: LuaFunctionRef,
    /// One-shot entries are already gone; the callback ref needs cleanup after the call.
    pub finished: bool,
}

#[derive(Default)]
pub struct IntervalScheduler {
    intervals: Mutex<OwnedRegistry<ScriptInterval>>,
}

impl IntervalScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &self,
        owner: Arc<Plugin>,
        delay_ms: u64,
        repeat: bool,
        callback: LuaFunctionRef,
        now_ms: u64,
    ) -> Handle {
        let owner_id = owner.id();
        let handle = self.intervals.lock().insert(
            owner_id,
            ScriptInterval {
                owner,
                delay_ms,
                last_timestamp: now_ms,
                callback,
                repeat,
            },
        );
        tracing::debug!(
            "Added {} {} for plugin {} every {}ms",
            if repeat { "interval" } else { "timeout" },
            handle.raw(),
            owner_id,
            delay_ms
        );
        handle
    }

    /// Remove one interval, if `owner` created it.
    pub fn remove(&self, owner: PluginId, handle: Handle) -> Option<ScriptInterval> {
        self.intervals.lock().remove_owned(owner, handle)
    }

    pub fn remove_plugin(&self, owner: PluginId) -> Vec<ScriptInterval> {
        self.intervals.lock().remove_owner(owner)
    }

    /// Handles of intervals whose window has elapsed, in creation order.
    pub fn due(&self, now_ms: u64) -> Vec<Handle> {
        self.intervals
            .lock()
            .iter()
            .filter(|(_, _, i)| now_ms.saturating_sub(i.last_timestamp) >= i.delay_ms)
            .map(|(h, _, _)| h)
            .collect()
    }

    /// Claim a due interval for firing.
    ///
    /// Returns `None` if it was removed since [`due`](Self::due) listed it.
    pub fn begin_fire(&self, handle: Handle, now_ms: u64) -> Option<DueInterval> {
        let mut intervals = self.intervals.lock();
        let interval = intervals.get_mut(handle)?;
        if interval.repeat {
            interval.last_timestamp = now_ms;
            return Some(DueInterval {
                handle,
                owner: Arc::clone(&interval.owner),
                callback: interval.callback.clone(),
                finished: false,
            });
        }
        let interval = intervals.remove(handle)?;
        Some(DueInterval {
            handle,
            owner: interval.owner,
            callback: interval.callback,
            finished: true,
        })
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.intervals.lock().contains(handle)
    }

    pub fn len(&self) -> usize {
        self.intervals.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plugin() -> Arc<Plugin> {
        Arc::new(Plugin::new(None, String::new()))
    }

    /// Run one update at `now`, returning how many callbacks fired.
    fn tick(scheduler: &IntervalScheduler, now: u64) -> usize {
        scheduler
            .due(now)
            .into_iter()
            .filter_map(|h| scheduler.begin_fire(h, now))
            .count()
    }

    #[test]
    fn test_repeat_fires_once_per_window() {
        let scheduler = IntervalScheduler::new();
        let t = 1_000;
        scheduler.add(plugin(), 100, true, LuaFunctionRef::new("cb".into()), t);

        assert_eq!(tick(&scheduler, t + 50), 0);
        assert_eq!(tick(&scheduler, t + 99), 0);
        assert_eq!(tick(&scheduler, t + 100), 1);
        assert_eq!(tick(&scheduler, t + 100), 0);
        assert_eq!(tick(&scheduler, t + 150), 0);
        assert_eq!(tick(&scheduler, t + 199), 0);
        assert_eq!(tick(&scheduler, t + 200), 1);
        assert_eq!(tick(&scheduler, t + 250), 0);
    }

    #[test]
    fn test_stalled_update_does_not_catch_up() {
        let scheduler = IntervalScheduler::new();
        scheduler.add(plugin(), 100, true, LuaFunctionRef::new("cb".into()), 0);

        assert_eq!(tick(&scheduler, 1_000), 1);
        assert_eq!(tick(&scheduler, 1_050), 0);
        assert_eq!(tick(&scheduler, 1_100), 1);
    }

    #[test]
    fn test_timeout_fires_once() {
        let scheduler = IntervalScheduler::new();
        let handle = scheduler.add(plugin(), 10, false, LuaFunctionRef::new("cb".into()), 0);

        let due = scheduler.due(10);
        assert_eq!(due, vec![handle]);
        let fired = scheduler.begin_fire(handle, 10).unwrap();
        assert!(fired.finished);
        assert!(scheduler.is_empty());
        assert_eq!(tick(&scheduler, 100), 0);
    }

    #[test]
    fn test_removed_between_due_and_fire() {
        let scheduler = IntervalScheduler::new();
        let owner = plugin();
        let handle = scheduler.add(Arc::clone(&owner), 0, true, LuaFunctionRef::new("cb".into()), 0);

        let due = scheduler.due(5);
        scheduler.remove(owner.id(), handle).unwrap();
        assert!(scheduler.begin_fire(due[0], 5).is_none());
    }

    #[test]
    fn test_remove_checks_owner_and_plugin_sweep() {
        let scheduler = IntervalScheduler::new();
        let a = plugin();
        let b = plugin();
        let ha = scheduler.add(Arc::clone(&a), 10, true, LuaFunctionRef::new("a".into()), 0);
        scheduler.add(Arc::clone(&b), 10, true, LuaFunctionRef::new("b".into()), 0);

        assert!(scheduler.remove(b.id(), ha).is_none());
        assert_eq!(scheduler.remove_plugin(a.id()).len(), 1);
        assert!(!scheduler.contains(ha));
        assert_eq!(scheduler.len(), 1);
    }
}
