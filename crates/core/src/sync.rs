//! Concurrency primitives shared across the workspace: deadline racing for
//! browser operations and one-shot close hooks for connection teardown.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Race a future against a deadline. The losing branch is dropped, never
/// awaited; callers that lose must re-validate any registry state they
/// intend to write back, since it may have been mutated meanwhile.
pub async fn race_with_deadline<F, T>(fut: F, deadline: Duration) -> Option<T>
where
    F: Future<Output = T>,
{
    tokio::select! {
        out = fut => Some(out),
        _ = tokio::time::sleep(deadline) => None,
    }
}

/// A composable list of close hooks guaranteed to fire exactly once,
/// regardless of which side initiates the close. Hooks run synchronously in
/// registration order; async cleanup is spawned from inside a hook.
pub struct CloseHooks {
    fired: AtomicBool,
    hooks: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl CloseHooks {
    pub fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
            hooks: Mutex::new(Vec::new()),
        }
    }

    /// Register a hook. Registration after `fire` runs the hook immediately,
    /// so late registrants cannot leak their cleanup.
    pub fn push<F: FnOnce() + Send + 'static>(&self, hook: F) {
        if self.fired.load(Ordering::SeqCst) {
            hook();
            return;
        }
        let mut hooks = self.hooks.lock().unwrap_or_else(|e| e.into_inner());
        if self.fired.load(Ordering::SeqCst) {
            drop(hooks);
            hook();
            return;
        }
        hooks.push(Box::new(hook));
    }

    /// Run all registered hooks. Subsequent calls are no-ops.
    pub fn fire(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        let hooks = {
            let mut guard = self.hooks.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };
        for hook in hooks {
            hook();
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl Default for CloseHooks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_race_winner_returns_value() {
        let result = race_with_deadline(async { 42 }, Duration::from_secs(5)).await;
        assert_eq!(result, Some(42));
    }

    #[tokio::test]
    async fn test_race_deadline_drops_loser() {
        let result = race_with_deadline(
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                42
            },
            Duration::from_millis(10),
        )
        .await;
        assert_eq!(result, None);
    }

    #[test]
    fn test_close_hooks_fire_exactly_once() {
        let hooks = CloseHooks::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        hooks.push(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        hooks.fire();
        hooks.fire();
        hooks.fire();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(hooks.has_fired());
    }

    #[test]
    fn test_close_hooks_run_in_order() {
        let hooks = CloseHooks::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let o = order.clone();
            hooks.push(move || o.lock().expect("lock").push(i));
        }
        hooks.fire();
        assert_eq!(*order.lock().expect("lock"), vec![0, 1, 2]);
    }

    #[test]
    fn test_late_registration_runs_immediately() {
        let hooks = CloseHooks::new();
        hooks.fire();
        let ran = Arc::new(AtomicBool::new(false));
        let r = ran.clone();
        hooks.push(move || r.store(true, Ordering::SeqCst));
        assert!(ran.load(Ordering::SeqCst));
    }
}
