//! Scenario runner: the cached entry point for projections
//!
//! Builds the engine once, then serves many projection requests through a
//! shared [`ProjectionCache`]. Identical requests return the same rows
//! without recomputing.

use log::{debug, warn};
use rayon::prelude::*;
use std::sync::Arc;

use crate::cache::{fingerprint, CacheStats, ProjectionCache, SharedRows};
use crate::error::EngineError;
use crate::model::{Horizon, Scenario};
use crate::money::Money;
use crate::projection::{CancellationToken, ProjectionConfig, ProjectionEngine};

/// Cached projection runner
///
/// # Example
/// ```ignore
/// let runner = ScenarioRunner::new(ProjectionConfig::default());
/// let rows = runner.compute(&scenario, &scenario.horizon, Money::from_int(2500))?;
///
/// // Same inputs, same Arc
/// let again = runner.compute(&scenario, &scenario.horizon, Money::from_int(2500))?;
/// assert!(Arc::ptr_eq(&rows, &again));
/// ```
#[derive(Clone)]
pub struct ScenarioRunner {
    engine: ProjectionEngine,
    cache: Arc<ProjectionCache>,
}

impl ScenarioRunner {
    /// Create a runner with its own cache
    pub fn new(config: ProjectionConfig) -> Self {
        Self::with_cache(config, Arc::new(ProjectionCache::new()))
    }

    /// Create a runner that shares `cache` with other runners
    pub fn with_cache(config: ProjectionConfig, cache: Arc<ProjectionCache>) -> Self {
        Self {
            engine: ProjectionEngine::new(config),
            cache,
        }
    }

    /// Project `scenario` over `horizon`, serving repeated requests from the cache
    pub fn compute(
        &self,
        scenario: &Scenario,
        horizon: &Horizon,
        opening_balance: Money,
    ) -> Result<SharedRows, EngineError> {
        self.compute_with_cancel(scenario, horizon, opening_balance, &CancellationToken::new())
    }

    /// Like [`compute`](Self::compute), stopping with `EngineError::Cancelled`
    /// once `cancel` is set. Cancelled runs leave nothing in the cache.
    pub fn compute_with_cancel(
        &self,
        scenario: &Scenario,
        horizon: &Horizon,
        opening_balance: Money,
        cancel: &CancellationToken,
    ) -> Result<SharedRows, EngineError> {
        let key = fingerprint(scenario, horizon, opening_balance, self.engine.config())?;
        debug!("Scenario '{}' fingerprint {}", scenario.id, key);

        self.cache.get_or_compute(key, &scenario.id, || {
            self.engine
                .project_with_cancel(scenario, horizon, opening_balance, cancel)
        })
    }

    /// Project `scenario` over its own horizon
    pub fn compute_default(
        &self,
        scenario: &Scenario,
        opening_balance: Money,
    ) -> Result<SharedRows, EngineError> {
        self.compute(scenario, &scenario.horizon, opening_balance)
    }

    /// Project many scenarios in parallel, each over its own horizon
    ///
    /// Results are in input order; one failure does not affect the others.
    pub fn run_batch(
        &self,
        scenarios: &[Scenario],
        opening_balance: Money,
    ) -> Vec<Result<SharedRows, EngineError>> {
        scenarios
            .par_iter()
            .map(|scenario| {
                let result = self.compute_default(scenario, opening_balance);
                if let Err(err) = &result {
                    warn!("Scenario '{}' failed: {}", scenario.id, err);
                }
                result
            })
            .collect()
    }

    /// Drop cached projections of `scenario_id` after its definition changed
    pub fn invalidate(&self, scenario_id: &str) -> usize {
        self.cache.invalidate(scenario_id)
    }

    pub fn cache(&self) -> &Arc<ProjectionCache> {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn engine(&self) -> &ProjectionEngine {
        &self.engine
    }
}

impl Default for ScenarioRunner {
    fn default() -> Self {
        Self::new(ProjectionConfig::default())
    }
}
