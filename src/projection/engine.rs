//! Core projection engine for monthly household cash flow projections

use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::calendar::YearMonth;
use crate::error::EngineError;
use crate::formula::{FormulaSandbox, SandboxConfig};
use crate::model::{Component, Horizon, Scenario, MAX_HORIZON_MONTHS};
use crate::money::Money;

use super::aggregate::{aggregate, ExpandedSeries};
use super::cancel::CancellationToken;
use super::cascade::{component_timelines, resolve};
use super::expander::expand_timeline;
use super::rows::ProjectionRow;

/// Configuration for a projection run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    /// Hard cap on horizon length
    pub max_horizon_months: u32,

    /// Expand components on the rayon pool instead of one after another
    pub parallel_components: bool,

    /// Limits applied to every formula
    pub sandbox: SandboxConfig,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            max_horizon_months: MAX_HORIZON_MONTHS, // 50 years
            parallel_components: true,
            sandbox: SandboxConfig::default(),
        }
    }
}

/// Main projection engine
#[derive(Debug, Clone)]
pub struct ProjectionEngine {
    config: ProjectionConfig,
    sandbox: FormulaSandbox,
}

impl ProjectionEngine {
    pub fn new(config: ProjectionConfig) -> Self {
        let sandbox = FormulaSandbox::new(config.sandbox.clone());
        Self { config, sandbox }
    }

    pub fn config(&self) -> &ProjectionConfig {
        &self.config
    }

    pub fn sandbox(&self) -> &FormulaSandbox {
        &self.sandbox
    }

    /// Run a projection for `scenario` over `horizon`
    pub fn project(
        &self,
        scenario: &Scenario,
        horizon: &Horizon,
        opening_balance: Money,
    ) -> Result<Vec<ProjectionRow>, EngineError> {
        self.project_with_cancel(scenario, horizon, opening_balance, &CancellationToken::new())
    }

    /// Run a projection that stops with `EngineError::Cancelled` once
    /// `cancel` is set
    pub fn project_with_cancel(
        &self,
        scenario: &Scenario,
        horizon: &Horizon,
        opening_balance: Money,
        cancel: &CancellationToken,
    ) -> Result<Vec<ProjectionRow>, EngineError> {
        let started = Instant::now();

        scenario.validate_definition(&self.sandbox)?;
        horizon.validate(self.config.max_horizon_months)?;
        let months = horizon.months()?;

        info!(
            "Projecting scenario '{}': {} components, {} events, {} months from {}",
            scenario.id,
            scenario.components.len(),
            scenario.events.len(),
            horizon.months,
            horizon.start
        );

        let snapshots = resolve(&scenario.components, &scenario.events, &months)?;
        let timelines = component_timelines(&snapshots);

        let expand_one = |(id, timeline): &(String, Vec<Option<Arc<Component>>>)| {
            self.expand_series(id, timeline, &months, cancel)
        };
        let expansions: Vec<Result<ExpandedSeries, EngineError>> = if self.config.parallel_components {
            timelines.par_iter().map(expand_one).collect()
        } else {
            timelines.iter().map(expand_one).collect()
        };

        let rows = aggregate(&snapshots, expansions, opening_balance, cancel)?;

        debug!(
            "Scenario '{}' projected in {:.2?} ({} component series)",
            scenario.id,
            started.elapsed(),
            timelines.len()
        );
        Ok(rows)
    }

    fn expand_series(
        &self,
        component_id: &str,
        timeline: &[Option<Arc<Component>>],
        months: &[YearMonth],
        cancel: &CancellationToken,
    ) -> Result<ExpandedSeries, EngineError> {
        let values = expand_timeline(component_id, timeline, months, &self.sandbox, cancel)?;
        Ok(ExpandedSeries {
            component_id: component_id.to_string(),
            values,
        })
    }
}

impl Default for ProjectionEngine {
    fn default() -> Self {
        Self::new(ProjectionConfig::default())
    }
}
