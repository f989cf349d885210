//! Tree Consistency Controller
//!
//! A per-entity finite state machine armed around every structural mutation:
//! `Idle -> Mutating -> Propagating -> Idle`. While an entity's guard is
//! armed, the propagation step's own writes can never re-enter the controller
//! for that entity, and a second mutation of the same entity waits for the
//! first to finish instead of failing.
//!
//! The guard is a scoped RAII value: dropping it - on success, error, or
//! panic unwind - returns the entity to `Idle` and wakes any waiter, so an
//! entity is never left permanently locked out of future mutations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Phase of an in-flight structural mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    /// The entity's own row is being validated and written
    Mutating,
    /// Descendant path/tree-id cascades are running
    Propagating,
}

#[derive(Default)]
struct ControllerState {
    in_flight: Mutex<HashMap<i64, MutationPhase>>,
    released: Notify,
}

/// Tracks which entities have a structural mutation in flight.
///
/// Shared by value (`Clone`) across service handles; all clones observe the
/// same guard map.
#[derive(Clone, Default)]
pub struct TreeConsistencyController {
    state: Arc<ControllerState>,
}

impl TreeConsistencyController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the guard for `entity_id`, waiting while another mutation of the
    /// same entity is in flight.
    ///
    /// Mutations of distinct entities never wait on each other here;
    /// subtree-overlap serialization is the database write lock's job.
    pub async fn begin(&self, entity_id: i64) -> MutationScope {
        loop {
            // Register interest before re-checking the map; a release landing
            // between the check and the await must not be lost.
            let released = self.state.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            if let Some(scope) = self.try_begin(entity_id) {
                return scope;
            }
            released.await;
        }
    }

    /// Try to arm the guard without waiting; `None` when a mutation of this
    /// entity is already in flight (the reentrant case).
    pub fn try_begin(&self, entity_id: i64) -> Option<MutationScope> {
        let mut map = self
            .state
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match map.entry(entity_id) {
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(MutationPhase::Mutating);
                Some(MutationScope {
                    state: Arc::clone(&self.state),
                    entity_id,
                })
            }
            std::collections::hash_map::Entry::Occupied(_) => None,
        }
    }

    /// Current phase of the entity's in-flight mutation, if any.
    pub fn phase(&self, entity_id: i64) -> Option<MutationPhase> {
        self.state
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&entity_id)
            .copied()
    }
}

/// RAII scope for one armed mutation guard.
///
/// Dropping the scope releases the guard unconditionally and wakes waiters.
pub struct MutationScope {
    state: Arc<ControllerState>,
    entity_id: i64,
}

impl MutationScope {
    /// Advance the state machine into the cascade phase.
    pub fn advance_to_propagating(&self) {
        let mut map = self
            .state
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(phase) = map.get_mut(&self.entity_id) {
            *phase = MutationPhase::Propagating;
        }
    }
}

impl Drop for MutationScope {
    fn drop(&mut self) {
        let mut map = self
            .state
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.remove(&self.entity_id);
        drop(map);
        self.state.released.notify_waiters();
    }
}
