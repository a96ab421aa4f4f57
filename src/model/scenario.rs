//! Scenario and projection horizon

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::calendar::YearMonth;
use crate::error::EngineError;
use crate::formula::FormulaSandbox;

use super::{Component, LifeEvent, PatchOperation};

/// Default hard cap on projection length (50 years)
pub const MAX_HORIZON_MONTHS: u32 = 600;

/// Contiguous run of calendar months
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Horizon {
    pub start: YearMonth,
    pub months: u32,
}

impl Horizon {
    pub fn new(start: YearMonth, months: u32) -> Self {
        Self { start, months }
    }

    pub fn validate(&self, max_months: u32) -> Result<(), EngineError> {
        if self.months == 0 {
            return Err(EngineError::invalid("horizon must cover at least one month"));
        }
        if self.months > max_months {
            return Err(EngineError::invalid(format!(
                "horizon of {} months exceeds the limit of {}",
                self.months, max_months
            )));
        }
        if self.end().is_none() {
            return Err(EngineError::invalid(format!(
                "horizon starting {} runs past the supported calendar",
                self.start
            )));
        }
        Ok(())
    }

    /// Last month of the horizon
    pub fn end(&self) -> Option<YearMonth> {
        self.months
            .checked_sub(1)
            .and_then(|offset| self.start.checked_add_months(offset))
    }

    /// Every month of the horizon in calendar order
    pub fn months(&self) -> Result<Vec<YearMonth>, EngineError> {
        (0..self.months)
            .map(|offset| {
                self.start.checked_add_months(offset).ok_or_else(|| {
                    EngineError::invalid(format!(
                        "horizon starting {} runs past the supported calendar",
                        self.start
                    ))
                })
            })
            .collect()
    }
}

/// A household plan: base components plus the life events that reshape them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Ordered base components
    pub components: Vec<Component>,

    /// Ordered life events
    #[serde(default)]
    pub events: Vec<LifeEvent>,

    /// Default horizon
    pub horizon: Horizon,
}

impl Scenario {
    pub fn new(id: impl Into<String>, name: impl Into<String>, horizon: Horizon) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            components: Vec::new(),
            events: Vec::new(),
            horizon,
        }
    }

    pub fn with_component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }

    pub fn with_event(mut self, event: LifeEvent) -> Self {
        self.events.push(event);
        self
    }

    /// Save-time validation: the stored horizon plus [`validate_definition`](Self::validate_definition)
    pub fn validate(&self, sandbox: &FormulaSandbox, max_horizon_months: u32) -> Result<(), EngineError> {
        self.horizon.validate(max_horizon_months)?;
        self.validate_definition(sandbox)
    }

    /// Unique ids, component formulas and event structure, independent of
    /// any horizon
    ///
    /// Patch targets are checked when the cascade is resolved, because they
    /// depend on which events have already applied.
    pub fn validate_definition(&self, sandbox: &FormulaSandbox) -> Result<(), EngineError> {
        if self.id.trim().is_empty() {
            return Err(EngineError::invalid("scenario id must not be empty"));
        }

        let mut ids = HashSet::new();
        for component in &self.components {
            if !ids.insert(component.id.as_str()) {
                return Err(EngineError::invalid(format!(
                    "scenario '{}' declares component '{}' more than once",
                    self.id, component.id
                )));
            }
            component.validate(sandbox)?;
        }

        let mut event_ids = HashSet::new();
        for event in &self.events {
            if !event_ids.insert(event.id.as_str()) {
                return Err(EngineError::invalid(format!(
                    "scenario '{}' declares life event '{}' more than once",
                    self.id, event.id
                )));
            }
            event.validate()?;
            for patch in &event.patches {
                if let PatchOperation::AddComponent { component } = &patch.operation {
                    component.validate(sandbox)?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ComponentKind;
    use crate::money::Money;

    fn ym(s: &str) -> YearMonth {
        s.parse().unwrap()
    }

    #[test]
    fn test_horizon_months_are_contiguous() {
        let months = Horizon::new(ym("2025-11"), 4).months().unwrap();
        assert_eq!(
            months,
            vec![ym("2025-11"), ym("2025-12"), ym("2026-01"), ym("2026-02")]
        );
        assert_eq!(Horizon::new(ym("2025-11"), 4).end(), Some(ym("2026-02")));
    }

    #[test]
    fn test_horizon_limits() {
        assert!(Horizon::new(ym("2025-01"), 0).validate(600).is_err());
        assert!(Horizon::new(ym("2025-01"), 601).validate(600).is_err());
        assert!(Horizon::new(ym("2025-01"), 600).validate(600).is_ok());
        assert!(Horizon::new(ym("9999-06"), 12).validate(600).is_err());
    }

    #[test]
    fn test_duplicate_component_ids_rejected() {
        let c = Component::new("salary", "Salary", ComponentKind::Income, "5000");
        let scenario = Scenario::new("s", "Base", Horizon::new(ym("2025-01"), 12))
            .with_component(c.clone())
            .with_component(c);
        assert!(matches!(
            scenario.validate(&FormulaSandbox::default(), MAX_HORIZON_MONTHS),
            Err(EngineError::InvalidScenarioDefinition(_))
        ));
    }

    #[test]
    fn test_definition_validation_ignores_stored_horizon() {
        let scenario = Scenario::new("s", "Long", Horizon::new(ym("2025-01"), 700)).with_component(
            Component::new("salary", "Salary", ComponentKind::Income, "5000"),
        );
        let sandbox = FormulaSandbox::default();
        assert!(scenario.validate(&sandbox, MAX_HORIZON_MONTHS).is_err());
        assert!(scenario.validate_definition(&sandbox).is_ok());
    }

    #[test]
    fn test_added_component_formula_is_validated() {
        let date = chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let bad = Component::new("car", "Car loan", ComponentKind::Expense, "-payment");
        let scenario = Scenario::new("s", "Base", Horizon::new(ym("2025-01"), 12))
            .with_component(
                Component::new("salary", "Salary", ComponentKind::Income, "pay")
                    .with_variable("pay", Money::from_int(5000)),
            )
            .with_event(
                LifeEvent::new("car", "Buy a car", date)
                    .with_patch("car", PatchOperation::AddComponent { component: bad }),
            );
        assert!(matches!(
            scenario.validate(&FormulaSandbox::default(), MAX_HORIZON_MONTHS),
            Err(EngineError::Formula { .. })
        ));
    }
}
