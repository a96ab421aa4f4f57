//! Life events: dated, ordered patches to the component set

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calendar::YearMonth;
use crate::error::EngineError;
use crate::money::Money;

use super::Component;

/// Change applied to one component when an event takes effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PatchOperation {
    /// Overwrite one declared variable
    ReplaceVariable { variable: String, value: Money },
    SetEndDate { end_date: NaiveDate },
    SetStartDate { start_date: NaiveDate },
    /// Add a component; the patch target must equal `component.id`
    AddComponent { component: Component },
    RemoveComponent,
}

impl PatchOperation {
    pub fn name(&self) -> &'static str {
        match self {
            PatchOperation::ReplaceVariable { .. } => "replace_variable",
            PatchOperation::SetEndDate { .. } => "set_end_date",
            PatchOperation::SetStartDate { .. } => "set_start_date",
            PatchOperation::AddComponent { .. } => "add_component",
            PatchOperation::RemoveComponent => "remove_component",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentPatch {
    /// Id of the component the operation applies to
    pub target: String,
    pub operation: PatchOperation,
}

impl ComponentPatch {
    pub fn new(target: impl Into<String>, operation: PatchOperation) -> Self {
        Self {
            target: target.into(),
            operation,
        }
    }
}

/// A dated change to the scenario (raise, move, new child, loan payoff)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifeEvent {
    pub id: String,

    #[serde(default)]
    pub label: String,

    pub effective_date: NaiveDate,

    /// Applied in order
    pub patches: Vec<ComponentPatch>,
}

impl LifeEvent {
    pub fn new(id: impl Into<String>, label: impl Into<String>, effective_date: NaiveDate) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            effective_date,
            patches: Vec::new(),
        }
    }

    pub fn with_patch(mut self, target: impl Into<String>, operation: PatchOperation) -> Self {
        self.patches.push(ComponentPatch::new(target, operation));
        self
    }

    /// First projection month the event affects
    pub fn effective_month(&self) -> YearMonth {
        YearMonth::from_date(self.effective_date)
    }

    /// Structural checks that do not depend on the working component set
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.id.trim().is_empty() {
            return Err(EngineError::invalid("life event id must not be empty"));
        }
        for patch in &self.patches {
            if let PatchOperation::AddComponent { component } = &patch.operation {
                if component.id != patch.target {
                    return Err(EngineError::invalid(format!(
                        "event '{}': add_component target '{}' does not match component id '{}'",
                        self.id, patch.target, component.id
                    )));
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

    #[test]
    fn test_patch_json_shape() {
        let json = r#"{
            "id": "raise",
            "label": "Promotion",
            "effective_date": "2025-02-01",
            "patches": [
                {"target": "salary", "operation": {"op": "replace_variable", "variable": "base_salary", "value": "6000"}},
                {"target": "gym", "operation": {"op": "remove_component"}}
            ]
        }"#;
        let event: LifeEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.effective_month().to_string(), "2025-02");
        assert_eq!(event.patches.len(), 2);
        assert_eq!(
            event.patches[0].operation,
            PatchOperation::ReplaceVariable {
                variable: "base_salary".to_string(),
                value: Money::from_int(6000),
            }
        );
        assert_eq!(event.patches[1].operation.name(), "remove_component");
    }

    #[test]
    fn test_add_component_target_must_match() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let child = Component::new("childcare", "Childcare", ComponentKind::Expense, "-800");
        let bad = LifeEvent::new("baby", "New child", date)
            .with_patch("daycare", PatchOperation::AddComponent { component: child.clone() });
        assert!(bad.validate().is_err());

        let good = LifeEvent::new("baby", "New child", date)
            .with_patch("childcare", PatchOperation::AddComponent { component: child });
        assert!(good.validate().is_ok());
    }
}
