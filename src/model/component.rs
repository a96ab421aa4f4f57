//! Financial component definitions

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::EngineError;
use crate::formula::{is_reserved_name, is_valid_identifier, FormulaSandbox, TIME_VARIABLES};
use crate::money::Money;

/// How a component's value feeds the monthly totals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    /// Flow added to total_income
    Income,
    /// Flow added to total_expenses (normally negative)
    Expense,
    /// Level added to total_assets
    Asset,
    /// Level added to total_liabilities
    Liability,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Income => "income",
            ComponentKind::Expense => "expense",
            ComponentKind::Asset => "asset",
            ComponentKind::Liability => "liability",
        }
    }

    /// Whether the value is a monthly flow (as opposed to a balance level)
    pub fn is_flow(&self) -> bool {
        matches!(self, ComponentKind::Income | ComponentKind::Expense)
    }
}

/// Recurrence of a component within its active window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Monthly,
    /// Every 7 days from the anchor date
    Weekly,
    /// Every third month from the anchor month
    Quarterly,
    /// The anchor's month of year
    Annual,
    /// The anchor month only
    OneTime,
    /// Every `interval_days` days from the anchor date
    Custom { interval_days: u32 },
}

impl Frequency {
    /// Day interval for day-based recurrences
    pub fn interval_days(&self) -> Option<u32> {
        match self {
            Frequency::Weekly => Some(7),
            Frequency::Custom { interval_days } => Some(*interval_days),
            _ => None,
        }
    }
}

impl Default for Frequency {
    fn default() -> Self {
        Frequency::Monthly
    }
}

/// A single income, expense, asset or liability line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: String,

    #[serde(default)]
    pub label: String,

    pub kind: ComponentKind,

    /// Declared variables, sorted by name
    #[serde(default)]
    pub variables: BTreeMap<String, Money>,

    pub formula: String,

    #[serde(default)]
    pub frequency: Frequency,

    #[serde(default)]
    pub start_date: Option<NaiveDate>,

    /// Inclusive
    #[serde(default)]
    pub end_date: Option<NaiveDate>,

    /// Month of year (1-12) to multiplier
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub seasonal: BTreeMap<u32, Money>,
}

impl Component {
    /// Create a monthly component with no variables or date bounds
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        kind: ComponentKind,
        formula: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind,
            variables: BTreeMap::new(),
            formula: formula.into(),
            frequency: Frequency::Monthly,
            start_date: None,
            end_date: None,
            seasonal: BTreeMap::new(),
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: Money) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    pub fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn starting(mut self, date: NaiveDate) -> Self {
        self.start_date = Some(date);
        self
    }

    pub fn ending(mut self, date: NaiveDate) -> Self {
        self.end_date = Some(date);
        self
    }

    pub fn with_seasonal(mut self, month_of_year: u32, multiplier: Money) -> Self {
        self.seasonal.insert(month_of_year, multiplier);
        self
    }

    /// Names a formula for this component may reference
    pub fn declared_names(&self) -> impl Iterator<Item = &str> {
        self.variables
            .keys()
            .map(String::as_str)
            .chain(TIME_VARIABLES.iter().copied())
    }

    /// Save-time validation of structure and formula
    pub fn validate(&self, sandbox: &FormulaSandbox) -> Result<(), EngineError> {
        if self.id.trim().is_empty() {
            return Err(EngineError::invalid("component id must not be empty"));
        }

        for name in self.variables.keys() {
            if !is_valid_identifier(name) {
                return Err(EngineError::invalid(format!(
                    "component '{}': '{}' is not a valid variable name",
                    self.id, name
                )));
            }
            if is_reserved_name(name) {
                return Err(EngineError::invalid(format!(
                    "component '{}': variable '{}' shadows a reserved name",
                    self.id, name
                )));
            }
        }

        check_window(&self.id, self.start_date, self.end_date)?;

        if let Some(&month) = self.seasonal.keys().find(|m| !(1..=12).contains(*m)) {
            return Err(EngineError::invalid(format!(
                "component '{}': seasonal month {} is outside 1-12",
                self.id, month
            )));
        }

        if self.frequency.interval_days() == Some(0) {
            return Err(EngineError::invalid(format!(
                "component '{}': custom interval must be at least one day",
                self.id
            )));
        }

        sandbox
            .validate(&self.formula, self.declared_names())
            .map_err(|source| EngineError::Formula {
                component_id: self.id.clone(),
                source,
            })
    }

    /// Scenario-local copy of a library template with overrides applied
    pub fn with_overrides(&self, overrides: &ComponentOverrides) -> Result<Component, EngineError> {
        let mut copy = self.clone();
        for (name, value) in &overrides.variables {
            match copy.variables.get_mut(name) {
                Some(slot) => *slot = *value,
                None => {
                    return Err(EngineError::invalid(format!(
                        "override for component '{}' names undeclared variable '{}'",
                        self.id, name
                    )))
                }
            }
        }
        if overrides.start_date.is_some() {
            copy.start_date = overrides.start_date;
        }
        if overrides.end_date.is_some() {
            copy.end_date = overrides.end_date;
        }
        check_window(&copy.id, copy.start_date, copy.end_date)?;
        Ok(copy)
    }
}

pub(crate) fn check_window(
    id: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<(), EngineError> {
    match (start, end) {
        (Some(start), Some(end)) if start > end => Err(EngineError::invalid(format!(
            "component '{}': start date {} is after end date {}",
            id, start, end
        ))),
        _ => Ok(()),
    }
}

/// Per-scenario adjustments to a shared component template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentOverrides {
    #[serde(default)]
    pub variables: BTreeMap<String, Money>,

    #[serde(default)]
    pub start_date: Option<NaiveDate>,

    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn salary() -> Component {
        Component::new("salary", "Salary", ComponentKind::Income, "base_salary")
            .with_variable("base_salary", Money::from_int(5000))
    }

    #[test]
    fn test_valid_component() {
        assert!(salary().validate(&FormulaSandbox::default()).is_ok());
    }

    #[test]
    fn test_formula_may_use_time_variables() {
        let c = Component::new("rent", "Rent", ComponentKind::Expense, "-rent * 1.03 if month > 12 else -rent")
            .with_variable("rent", Money::from_int(1500));
        assert!(c.validate(&FormulaSandbox::default()).is_ok());
    }

    #[test]
    fn test_undeclared_formula_variable_fails_validation() {
        let mut c = salary();
        c.formula = "base_salary + bonus".to_string();
        match c.validate(&FormulaSandbox::default()) {
            Err(EngineError::Formula { component_id, source }) => {
                assert_eq!(component_id, "salary");
                assert!(source.hint().contains("bonus"));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_reserved_variable_name_rejected() {
        let c = salary().with_variable("month", Money::ONE);
        assert!(matches!(
            c.validate(&FormulaSandbox::default()),
            Err(EngineError::InvalidScenarioDefinition(_))
        ));
    }

    #[test]
    fn test_inverted_window_rejected() {
        let c = salary().starting(date(2025, 6, 1)).ending(date(2025, 1, 1));
        assert!(c.validate(&FormulaSandbox::default()).is_err());
    }

    #[test]
    fn test_bad_seasonal_month_rejected() {
        let c = salary().with_seasonal(13, Money::ONE);
        assert!(c.validate(&FormulaSandbox::default()).is_err());
    }

    #[test]
    fn test_overrides_produce_local_copy() {
        let template = salary();
        let overrides = ComponentOverrides {
            variables: [("base_salary".to_string(), Money::from_int(6000))].into_iter().collect(),
            start_date: Some(date(2025, 3, 1)),
            end_date: None,
        };
        let local = template.with_overrides(&overrides).unwrap();
        assert_eq!(local.variables["base_salary"], Money::from_int(6000));
        assert_eq!(local.start_date, Some(date(2025, 3, 1)));
        assert_eq!(template.variables["base_salary"], Money::from_int(5000));

        let unknown = ComponentOverrides {
            variables: [("bonus".to_string(), Money::ONE)].into_iter().collect(),
            ..Default::default()
        };
        assert!(template.with_overrides(&unknown).is_err());
    }

    #[test]
    fn test_frequency_serde_shape() {
        let json = serde_json::to_string(&Frequency::Custom { interval_days: 14 }).unwrap();
        assert_eq!(json, r#"{"custom":{"interval_days":14}}"#);
        let f: Frequency = serde_json::from_str(r#""one_time""#).unwrap();
        assert_eq!(f, Frequency::OneTime);
    }
}
