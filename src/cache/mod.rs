//! Projection cache with single-flight computation
//!
//! Entries are keyed by content fingerprint and hold the rows behind an
//! `Arc`, so every reader of the same entry shares one allocation. While a
//! fingerprint is being computed, other requests for it wait on the leader's
//! flight instead of computing again. Failed and cancelled computations are
//! never stored.

mod fingerprint;

use chrono::{DateTime, Utc};
use log::debug;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::EngineError;
use crate::projection::ProjectionRow;

pub use fingerprint::{fingerprint, Fingerprint};

/// Shared, immutable projection output
pub type SharedRows = Arc<[ProjectionRow]>;

/// A completed projection
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub rows: SharedRows,
    pub computed_at: DateTime<Utc>,
    /// Ids of the scenarios that have resolved to this entry
    pub scenarios: BTreeSet<String>,
}

/// Counters for cache effectiveness
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub in_flight: usize,
    pub hits: u64,
    pub misses: u64,
}

enum FlightState {
    Running,
    Finished(Result<SharedRows, EngineError>),
    /// The leader went away without a result (panic or early drop)
    Abandoned,
}

struct Flight {
    state: Mutex<FlightState>,
    done: Condvar,
}

impl Flight {
    fn new() -> Self {
        Self {
            state: Mutex::new(FlightState::Running),
            done: Condvar::new(),
        }
    }

    fn finish(&self, outcome: FlightState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = outcome;
        self.done.notify_all();
    }

    /// Block until the leader finishes; `None` when it abandoned the flight
    fn wait(&self) -> Option<Result<SharedRows, EngineError>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match &*state {
                FlightState::Running => {
                    state = self.done.wait(state).unwrap_or_else(PoisonError::into_inner);
                }
                FlightState::Finished(result) => return Some(result.clone()),
                FlightState::Abandoned => return None,
            }
        }
    }
}

enum Slot {
    Ready(CacheEntry),
    Pending(Arc<Flight>),
}

#[derive(Default)]
struct CacheState {
    slots: HashMap<Fingerprint, Slot>,
    hits: u64,
    misses: u64,
}

impl CacheState {
    fn remove_flight(&mut self, fingerprint: &Fingerprint, flight: &Arc<Flight>) {
        if matches!(self.slots.get(fingerprint), Some(Slot::Pending(f)) if Arc::ptr_eq(f, flight)) {
            self.slots.remove(fingerprint);
        }
    }
}

/// Thread-safe store of computed projections
#[derive(Default)]
pub struct ProjectionCache {
    state: Mutex<CacheState>,
}

impl ProjectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rows for `fingerprint`, if a completed entry exists
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<SharedRows> {
        let mut guard = self.lock();
        let state = &mut *guard;
        match state.slots.get(fingerprint) {
            Some(Slot::Ready(entry)) => {
                state.hits += 1;
                Some(Arc::clone(&entry.rows))
            }
            _ => {
                state.misses += 1;
                None
            }
        }
    }

    /// Store rows computed for `scenario_id`
    ///
    /// Rows already cached under `fingerprint` are kept; only `scenario_id`
    /// is recorded against them, so readers holding the old `Arc` and later
    /// readers see the same rows.
    pub fn put(&self, fingerprint: Fingerprint, scenario_id: &str, rows: SharedRows) {
        let mut guard = self.lock();
        let state = &mut *guard;
        match state.slots.get_mut(&fingerprint) {
            Some(Slot::Ready(entry)) => {
                entry.scenarios.insert(scenario_id.to_string());
            }
            // A running flight will store its own result
            Some(Slot::Pending(_)) => {}
            None => {
                state.slots.insert(fingerprint, Slot::Ready(new_entry(scenario_id, rows)));
            }
        }
    }

    /// Completed entry metadata for `fingerprint`
    pub fn entry(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        match self.lock().slots.get(fingerprint) {
            Some(Slot::Ready(entry)) => Some(entry.clone()),
            _ => None,
        }
    }

    /// Drop every completed entry produced for `scenario_id`; returns the
    /// number removed
    pub fn invalidate(&self, scenario_id: &str) -> usize {
        let mut state = self.lock();
        let before = state.slots.len();
        state.slots.retain(|_, slot| match slot {
            Slot::Ready(entry) => !entry.scenarios.contains(scenario_id),
            Slot::Pending(_) => true,
        });
        let removed = before - state.slots.len();
        debug!("Invalidated {} cache entries for scenario '{}'", removed, scenario_id);
        removed
    }

    /// Drop every completed entry; computations in flight are unaffected
    pub fn clear(&self) {
        let mut state = self.lock();
        state.slots.retain(|_, slot| matches!(slot, Slot::Pending(_)));
        state.hits = 0;
        state.misses = 0;
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let in_flight = state
            .slots
            .values()
            .filter(|slot| matches!(slot, Slot::Pending(_)))
            .count();
        CacheStats {
            entries: state.slots.len() - in_flight,
            in_flight,
            hits: state.hits,
            misses: state.misses,
        }
    }

    /// Return the cached rows for `fingerprint`, computing them at most once
    /// across concurrent callers
    ///
    /// The first caller becomes the leader and runs `compute`; others block
    /// until it finishes and share its result. If the leader is cancelled or
    /// goes away without a result, a waiting caller retries and may become
    /// the new leader. Errors are returned to everyone waiting but are not
    /// stored.
    pub fn get_or_compute<F>(
        &self,
        fingerprint: Fingerprint,
        scenario_id: &str,
        compute: F,
    ) -> Result<SharedRows, EngineError>
    where
        F: FnOnce() -> Result<Vec<ProjectionRow>, EngineError>,
    {
        let flight = loop {
            let waiting = {
                let mut guard = self.lock();
                let state = &mut *guard;
                match state.slots.get_mut(&fingerprint) {
                    Some(Slot::Ready(entry)) => {
                        entry.scenarios.insert(scenario_id.to_string());
                        state.hits += 1;
                        return Ok(Arc::clone(&entry.rows));
                    }
                    Some(Slot::Pending(flight)) => Arc::clone(flight),
                    None => {
                        let flight = Arc::new(Flight::new());
                        state
                            .slots
                            .insert(fingerprint, Slot::Pending(Arc::clone(&flight)));
                        state.misses += 1;
                        break flight;
                    }
                }
            };

            match waiting.wait() {
                Some(Ok(rows)) => {
                    let mut guard = self.lock();
                    let state = &mut *guard;
                    if let Some(Slot::Ready(entry)) = state.slots.get_mut(&fingerprint) {
                        entry.scenarios.insert(scenario_id.to_string());
                    }
                    state.hits += 1;
                    return Ok(rows);
                }
                Some(Err(EngineError::Cancelled)) | None => {
                    debug!("Leader for {} did not finish; retrying", fingerprint);
                }
                Some(Err(err)) => return Err(err),
            }
        };

        let mut leader = Leader {
            cache: self,
            fingerprint,
            flight: Some(flight),
        };
        let result = compute().map(SharedRows::from);
        leader.complete(scenario_id, result.clone());
        result
    }
}

fn new_entry(scenario_id: &str, rows: SharedRows) -> CacheEntry {
    CacheEntry {
        rows,
        computed_at: Utc::now(),
        scenarios: BTreeSet::from([scenario_id.to_string()]),
    }
}

/// Owns a pending flight; abandons it on drop unless completed
struct Leader<'a> {
    cache: &'a ProjectionCache,
    fingerprint: Fingerprint,
    flight: Option<Arc<Flight>>,
}

impl Leader<'_> {
    fn complete(&mut self, scenario_id: &str, result: Result<SharedRows, EngineError>) {
        let Some(flight) = self.flight.take() else {
            return;
        };
        {
            let mut state = self.cache.lock();
            match &result {
                Ok(rows) => {
                    state
                        .slots
                        .insert(self.fingerprint, Slot::Ready(new_entry(scenario_id, Arc::clone(rows))));
                }
                Err(err) => {
                    debug!("Not caching failed projection {}: {}", self.fingerprint, err);
                    state.remove_flight(&self.fingerprint, &flight);
                }
            }
        }
        flight.finish(FlightState::Finished(result));
    }
}

impl Drop for Leader<'_> {
    fn drop(&mut self) {
        if let Some(flight) = self.flight.take() {
            self.cache.lock().remove_flight(&self.fingerprint, &flight);
            flight.finish(FlightState::Abandoned);
        }
    }
}
