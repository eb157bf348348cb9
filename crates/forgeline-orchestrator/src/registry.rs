use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use forgeline_core::RunState;

/// Tracks every run's mutable [`RunState`] plus a cooperative cancellation
/// flag, keyed by run id. Single source of truth for `/api/runs` and
/// `/api/runs/{run_id}`; callers always receive a cloned snapshot, never a
/// live reference.
#[derive(Clone, Default)]
pub struct RunRegistry {
    states: Arc<RwLock<HashMap<String, RunState>>>,
    cancel_flags: Arc<RwLock<HashMap<String, Arc<AtomicBool>>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, run_id: impl Into<String>) {
        let run_id = run_id.into();
        self.states
            .write()
            .expect("run registry poisoned")
            .insert(run_id.clone(), RunState::pending(run_id.clone()));
        self.cancel_flags
            .write()
            .expect("cancel flag registry poisoned")
            .insert(run_id, Arc::new(AtomicBool::new(false)));
    }

    pub fn snapshot(&self, run_id: &str) -> Option<RunState> {
        self.states
            .read()
            .expect("run registry poisoned")
            .get(run_id)
            .cloned()
    }

    pub fn snapshot_all(&self) -> Vec<RunState> {
        self.states
            .read()
            .expect("run registry poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Apply `f` to the run's state in place. A no-op if the run id is
    /// unknown (e.g. a stale handle after process restart).
    pub fn update(&self, run_id: &str, f: impl FnOnce(&mut RunState)) {
        if let Some(state) = self
            .states
            .write()
            .expect("run registry poisoned")
            .get_mut(run_id)
        {
            f(state);
        }
    }

    pub fn request_cancel(&self, run_id: &str) {
        if let Some(flag) = self
            .cancel_flags
            .read()
            .expect("cancel flag registry poisoned")
            .get(run_id)
        {
            flag.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_cancelled(&self, run_id: &str) -> bool {
        self.cancel_flags
            .read()
            .expect("cancel flag registry poisoned")
            .get(run_id)
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_creates_pending_state_and_clear_cancel_flag() {
        let registry = RunRegistry::new();
        registry.register("r1");
        let state = registry.snapshot("r1").expect("state present");
        assert_eq!(state.status, forgeline_core::RunStatus::Pending);
        assert!(!registry.is_cancelled("r1"));
    }

    #[test]
    fn request_cancel_is_observable_before_update() {
        let registry = RunRegistry::new();
        registry.register("r1");
        registry.request_cancel("r1");
        assert!(registry.is_cancelled("r1"));
    }

    #[test]
    fn update_mutates_in_place_and_snapshot_sees_it() {
        let registry = RunRegistry::new();
        registry.register("r1");
        registry.update("r1", |state| state.advance_progress(20));
        assert_eq!(registry.snapshot("r1").unwrap().progress, 20);
    }

    #[test]
    fn unknown_run_id_snapshot_is_none() {
        let registry = RunRegistry::new();
        assert!(registry.snapshot("missing").is_none());
    }
}
