//! Projection engine: cascade, expansion and aggregation over a horizon

mod aggregate;
mod cancel;
pub mod cascade;
mod engine;
pub mod expander;
mod rows;
mod state;

pub use aggregate::{aggregate, ExpandedSeries};
pub use cancel::CancellationToken;
pub use cascade::{effective_components, EffectiveSnapshot};
pub use engine::{ProjectionConfig, ProjectionEngine};
pub use rows::{write_csv, ComponentValue, ProjectionRow, ProjectionSummary};
pub use state::ProjectionState;
