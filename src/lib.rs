//! Household Projection - deterministic monthly projections of household finances
//!
//! This library provides:
//! - Exact fixed-point money arithmetic (`Money`)
//! - A sandboxed formula language for component values
//! - Life events that patch the component set from a given month onward
//! - Monthly expansion, aggregation and running balances
//! - A content-addressed, single-flight projection cache

pub mod cache;
pub mod calendar;
pub mod error;
pub mod formula;
pub mod model;
pub mod money;
pub mod projection;
pub mod scenario;

// Re-export commonly used types
pub use cache::{CacheStats, ProjectionCache};
pub use calendar::YearMonth;
pub use error::{EngineError, FormulaError, ValueError};
pub use formula::{FormulaSandbox, SandboxConfig};
pub use model::{Component, ComponentKind, Frequency, Horizon, LifeEvent, Scenario};
pub use money::Money;
pub use projection::{CancellationToken, ProjectionConfig, ProjectionEngine, ProjectionRow};
pub use scenario::ScenarioRunner;
