//! File watching for hot reload.
//!
//! The notify callback runs on the watcher's own thread and only inserts into
//! a mutex-protected set of changed paths. The engine drains that set during
//! its update.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event as NotifyEvent, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

use crate::error::{PluginError, PluginResult};

pub struct PluginWatcher {
    changed: Arc<Mutex<HashSet<PathBuf>>>,
    _watcher: Option<RecommendedWatcher>,
}

impl PluginWatcher {
    /// A watcher fed only through [`mark_changed`](Self::mark_changed).
    pub fn manual() -> Self {
        Self {
            changed: Arc::new(Mutex::new(HashSet::new())),
            _watcher: None,
        }
    }

    /// Watch `dir` recursively for edited `.lua` files.
    pub fn watch(dir: &Path) -> PluginResult<Self> {
        let changed = Arc::new(Mutex::new(HashSet::new()));
        let sink = Arc::clone(&changed);

        let mut watcher =
            notify::recommended_watcher(move |res: Result<NotifyEvent, notify::Error>| match res {
                Ok(event) => record_event(&sink, event),
                Err(e) => tracing::warn!("File watcher error: {}", e),
            })
            .map_err(|e| PluginError::Watch(e.to_string()))?;

        watcher
            .watch(dir, RecursiveMode::Recursive)
            .map_err(|e| PluginError::Watch(e.to_string()))?;
        tracing::info!("Watching plugins in {}", dir.display());

        Ok(Self {
            changed,
            _watcher: Some(watcher),
        })
    }

    pub fn mark_changed(&self, path: impl Into<PathBuf>) {
        self.changed.lock().insert(path.into());
    }

    /// Take every path recorded since the last drain.
    pub fn drain(&self) -> Vec<PathBuf> {
        let mut changed = self.changed.lock();
        let mut paths: Vec<_> = changed.drain().collect();
        paths.sort();
        paths
    }

    pub fn has_changes(&self) -> bool {
        !self.changed.lock().is_empty()
    }
}

fn record_event(sink: &Mutex<HashSet<PathBuf>>, event: NotifyEvent) {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return;
    }
    let mut changed = sink.lock();
    for path in event.paths {
        if path.extension().and_then(|e| e.to_str()) == Some("lua") {
            changed.insert(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_empties_set() {
        let watcher = PluginWatcher::manual();
        watcher.mark_changed("/plugins/b.lua");
        watcher.mark_changed("/plugins/a.lua");
        watcher.mark_changed("/plugins/a.lua");

        assert!(watcher.has_changes());
        assert_eq!(
            watcher.drain(),
            vec![PathBuf::from("/plugins/a.lua"), PathBuf::from("/plugins/b.lua")]
        );
        assert!(!watcher.has_changes());
    }

    #[test]
    fn test_only_lua_edits_are_recorded() {
        let sink = Mutex::new(HashSet::new());
        record_event(
            &sink,
            NotifyEvent::new(EventKind::Modify(notify::event::ModifyKind::Any))
                .add_path(PathBuf::from("/plugins/a.lua"))
                .add_path(PathBuf::from("/plugins/notes.txt")),
        );
        record_event(
            &sink,
            NotifyEvent::new(EventKind::Remove(notify::event::RemoveKind::Any))
                .add_path(PathBuf::from("/plugins/b.lua")),
        );

        let recorded: Vec<_> = sink.into_inner().into_iter().collect();
        assert_eq!(recorded, vec![PathBuf::from("/plugins/a.lua")]);
    }

    #[test]
    fn test_watch_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PluginWatcher::watch(&dir.path().join("absent")).is_err());
    }
}
