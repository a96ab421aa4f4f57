//! Scenario data structures and JSON loading

mod component;
mod event;
pub mod loader;
mod scenario;

pub use component::{Component, ComponentKind, ComponentOverrides, Frequency};
pub(crate) use component::check_window;
pub use event::{ComponentPatch, LifeEvent, PatchOperation};
pub use loader::{load_scenario, load_scenario_from_reader, LoadError};
pub use scenario::{Horizon, Scenario, MAX_HORIZON_MONTHS};
