//! Life event cascade
//!
//! Folds the ordered life events over the base component list, producing the
//! effective component set for every month of the horizon. Snapshots are
//! immutable; months with no new event share the previous month's snapshot,
//! and components untouched by a patch keep their `Arc` across snapshots.

use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

use crate::calendar::YearMonth;
use crate::error::EngineError;
use crate::model::{check_window, Component, ComponentPatch, LifeEvent, PatchOperation};

/// Effective components for one month
#[derive(Debug, Clone)]
pub struct EffectiveSnapshot {
    pub month: YearMonth,

    /// In order: base components first, added components after
    pub components: Arc<Vec<Arc<Component>>>,

    /// Ids of events applied at or before this month, in application order
    pub applied_events: Arc<Vec<String>>,
}

impl EffectiveSnapshot {
    pub fn get(&self, component_id: &str) -> Option<&Arc<Component>> {
        self.components.iter().find(|c| c.id == component_id)
    }
}

/// Events ordered by effective date; ties keep declaration order
pub fn ordered_events(events: &[LifeEvent]) -> Vec<&LifeEvent> {
    let mut ordered: Vec<&LifeEvent> = events.iter().collect();
    ordered.sort_by_key(|e| e.effective_date);
    ordered
}

/// Resolve the effective component set for each month in `months`
///
/// Events effective before the first month are applied before it; events
/// after the last month are ignored.
pub fn resolve(
    base: &[Component],
    events: &[LifeEvent],
    months: &[YearMonth],
) -> Result<Vec<EffectiveSnapshot>, EngineError> {
    let ordered = ordered_events(events);
    let mut working: Vec<Arc<Component>> = base.iter().cloned().map(Arc::new).collect();
    let mut applied: Vec<String> = Vec::new();

    let mut current = Arc::new(working.clone());
    let mut current_events = Arc::new(applied.clone());
    let mut next = 0;
    let mut snapshots = Vec::with_capacity(months.len());

    for &month in months {
        let mut changed = false;
        while let Some(event) = ordered.get(next) {
            if event.effective_month() > month {
                break;
            }
            apply_event(&mut working, event)?;
            debug!(
                "Applied life event '{}' ({} patches) entering {}",
                event.id,
                event.patches.len(),
                month
            );
            applied.push(event.id.clone());
            changed = true;
            next += 1;
        }

        if changed {
            current = Arc::new(working.clone());
            current_events = Arc::new(applied.clone());
        }

        snapshots.push(EffectiveSnapshot {
            month,
            components: Arc::clone(&current),
            applied_events: Arc::clone(&current_events),
        });
    }

    for event in ordered.iter().skip(next) {
        debug!(
            "Ignoring life event '{}' effective {}: after the horizon",
            event.id, event.effective_date
        );
    }

    Ok(snapshots)
}

/// Effective components at `month`, folding every event effective at or
/// before it over `base`
pub fn effective_components(
    base: &[Component],
    events: &[LifeEvent],
    month: YearMonth,
) -> Result<Vec<Component>, EngineError> {
    let mut working: Vec<Arc<Component>> = base.iter().cloned().map(Arc::new).collect();
    for event in ordered_events(events) {
        if event.effective_month() > month {
            break;
        }
        apply_event(&mut working, event)?;
    }
    Ok(working.into_iter().map(|c| (*c).clone()).collect())
}

/// Per-component view across the horizon: which version of the component is
/// effective each month (`None` when absent)
///
/// Components appear in order of first appearance.
pub fn component_timelines(
    snapshots: &[EffectiveSnapshot],
) -> Vec<(String, Vec<Option<Arc<Component>>>)> {
    let mut order: Vec<String> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for snapshot in snapshots {
        for component in snapshot.components.iter() {
            if !index.contains_key(&component.id) {
                index.insert(component.id.clone(), order.len());
                order.push(component.id.clone());
            }
        }
    }

    let mut timelines: Vec<Vec<Option<Arc<Component>>>> =
        vec![vec![None; snapshots.len()]; order.len()];
    for (month_idx, snapshot) in snapshots.iter().enumerate() {
        for component in snapshot.components.iter() {
            if let Some(&i) = index.get(&component.id) {
                timelines[i][month_idx] = Some(Arc::clone(component));
            }
        }
    }

    order.into_iter().zip(timelines).collect()
}

fn apply_event(working: &mut Vec<Arc<Component>>, event: &LifeEvent) -> Result<(), EngineError> {
    for patch in &event.patches {
        apply_patch(working, &event.id, patch)?;
    }
    Ok(())
}

fn position(working: &[Arc<Component>], event_id: &str, patch: &ComponentPatch) -> Result<usize, EngineError> {
    working
        .iter()
        .position(|c| c.id == patch.target)
        .ok_or_else(|| {
            EngineError::invalid(format!(
                "event '{}': {} targets component '{}', which is not in effect",
                event_id,
                patch.operation.name(),
                patch.target
            ))
        })
}

fn apply_patch(
    working: &mut Vec<Arc<Component>>,
    event_id: &str,
    patch: &ComponentPatch,
) -> Result<(), EngineError> {
    match &patch.operation {
        PatchOperation::AddComponent { component } => {
            if working.iter().any(|c| c.id == component.id) {
                return Err(EngineError::invalid(format!(
                    "event '{}': component '{}' is already in effect",
                    event_id, component.id
                )));
            }
            working.push(Arc::new(component.clone()));
        }
        PatchOperation::RemoveComponent => {
            let idx = position(working, event_id, patch)?;
            working.remove(idx);
        }
        PatchOperation::ReplaceVariable { variable, value } => {
            let idx = position(working, event_id, patch)?;
            // Copy-on-write: earlier snapshots keep the old version
            let component = Arc::make_mut(&mut working[idx]);
            let slot = component.variables.get_mut(variable).ok_or_else(|| {
                EngineError::invalid(format!(
                    "event '{}': component '{}' has no variable '{}'",
                    event_id, patch.target, variable
                ))
            })?;
            *slot = *value;
        }
        PatchOperation::SetEndDate { end_date } => {
            let idx = position(working, event_id, patch)?;
            let component = Arc::make_mut(&mut working[idx]);
            component.end_date = Some(*end_date);
            check_window(&component.id, component.start_date, component.end_date)?;
        }
        PatchOperation::SetStartDate { start_date } => {
            let idx = position(working, event_id, patch)?;
            let component = Arc::make_mut(&mut working[idx]);
            component.start_date = Some(*start_date);
            check_window(&component.id, component.start_date, component.end_date)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ComponentKind;
    use crate::money::Money;
    use chrono::NaiveDate;

    fn ym(s: &str) -> YearMonth {
        s.parse().unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn months(start: &str, n: u32) -> Vec<YearMonth> {
        let start = ym(start);
        (0..n).map(|i| start.checked_add_months(i).unwrap()).collect()
    }

    fn salary() -> Component {
        Component::new("salary", "Salary", ComponentKind::Income, "base_salary")
            .with_variable("base_salary", Money::from_int(5000))
    }

    fn raise(id: &str, when: NaiveDate, amount: i64) -> LifeEvent {
        LifeEvent::new(id, "Raise", when).with_patch(
            "salary",
            PatchOperation::ReplaceVariable {
                variable: "base_salary".to_string(),
                value: Money::from_int(amount),
            },
        )
    }

    fn salary_in(snapshot: &EffectiveSnapshot) -> Money {
        snapshot.get("salary").unwrap().variables["base_salary"]
    }

    #[test]
    fn test_event_applies_from_effective_month() {
        let snapshots = resolve(&[salary()], &[raise("raise", date(2025, 2, 15), 6000)], &months("2025-01", 3)).unwrap();
        assert_eq!(salary_in(&snapshots[0]), Money::from_int(5000));
        assert_eq!(salary_in(&snapshots[1]), Money::from_int(6000));
        assert_eq!(salary_in(&snapshots[2]), Money::from_int(6000));
        assert!(snapshots[0].applied_events.is_empty());
        assert_eq!(*snapshots[2].applied_events, vec!["raise".to_string()]);
    }

    #[test]
    fn test_unchanged_months_share_snapshot() {
        let snapshots = resolve(&[salary()], &[raise("raise", date(2025, 3, 1), 6000)], &months("2025-01", 4)).unwrap();
        assert!(Arc::ptr_eq(&snapshots[0].components, &snapshots[1].components));
        assert!(!Arc::ptr_eq(&snapshots[1].components, &snapshots[2].components));
        assert!(Arc::ptr_eq(&snapshots[2].components, &snapshots[3].components));
    }

    #[test]
    fn test_untouched_components_keep_their_arc() {
        let rent = Component::new("rent", "Rent", ComponentKind::Expense, "-1500");
        let snapshots = resolve(&[salary(), rent], &[raise("raise", date(2025, 2, 1), 6000)], &months("2025-01", 2)).unwrap();
        assert!(Arc::ptr_eq(snapshots[0].get("rent").unwrap(), snapshots[1].get("rent").unwrap()));
        assert!(!Arc::ptr_eq(snapshots[0].get("salary").unwrap(), snapshots[1].get("salary").unwrap()));
    }

    #[test]
    fn test_same_month_events_apply_in_date_order() {
        let events = vec![
            raise("late", date(2025, 2, 20), 7000),
            raise("early", date(2025, 2, 1), 6000),
        ];
        let snapshots = resolve(&[salary()], &events, &months("2025-01", 2)).unwrap();
        assert_eq!(salary_in(&snapshots[0]), Money::from_int(5000));
        assert_eq!(salary_in(&snapshots[1]), Money::from_int(7000));
        assert_eq!(*snapshots[1].applied_events, vec!["early".to_string(), "late".to_string()]);

        let folded = effective_components(&[salary()], &events, ym("2025-02")).unwrap();
        assert_eq!(folded[0].variables["base_salary"], Money::from_int(7000));
    }

    #[test]
    fn test_same_date_events_apply_in_declaration_order() {
        let events = vec![
            raise("first", date(2025, 2, 1), 7000),
            raise("second", date(2025, 2, 1), 6000),
        ];
        let snapshots = resolve(&[salary()], &events, &months("2025-01", 2)).unwrap();
        assert_eq!(salary_in(&snapshots[1]), Money::from_int(6000));
        assert_eq!(*snapshots[1].applied_events, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn test_events_sorted_by_month_across_declaration() {
        let events = vec![
            raise("later", date(2025, 3, 1), 7000),
            raise("earlier", date(2025, 2, 1), 6000),
        ];
        let snapshots = resolve(&[salary()], &events, &months("2025-01", 3)).unwrap();
        assert_eq!(salary_in(&snapshots[1]), Money::from_int(6000));
        assert_eq!(salary_in(&snapshots[2]), Money::from_int(7000));
    }

    #[test]
    fn test_events_before_horizon_apply_before_first_month() {
        let snapshots = resolve(&[salary()], &[raise("raise", date(2024, 6, 1), 6000)], &months("2025-01", 1)).unwrap();
        assert_eq!(salary_in(&snapshots[0]), Money::from_int(6000));
    }

    #[test]
    fn test_events_after_horizon_are_ignored() {
        let snapshots = resolve(&[salary()], &[raise("raise", date(2030, 1, 1), 6000)], &months("2025-01", 2)).unwrap();
        assert_eq!(salary_in(&snapshots[1]), Money::from_int(5000));
    }

    #[test]
    fn test_add_and_remove_components() {
        let car = Component::new("car", "Car loan", ComponentKind::Expense, "-350");
        let events = vec![
            LifeEvent::new("buy", "Buy car", date(2025, 2, 1))
                .with_patch("car", PatchOperation::AddComponent { component: car }),
            LifeEvent::new("payoff", "Pay off car", date(2025, 4, 1))
                .with_patch("car", PatchOperation::RemoveComponent),
        ];
        let snapshots = resolve(&[salary()], &events, &months("2025-01", 4)).unwrap();
        let ids = |s: &EffectiveSnapshot| s.components.iter().map(|c| c.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&snapshots[0]), vec!["salary"]);
        assert_eq!(ids(&snapshots[1]), vec!["salary", "car"]);
        assert_eq!(ids(&snapshots[3]), vec!["salary"]);
    }

    #[test]
    fn test_invalid_patches_fail() {
        let m = months("2025-01", 2);
        let missing = LifeEvent::new("e", "", date(2025, 2, 1)).with_patch("gym", PatchOperation::RemoveComponent);
        assert!(matches!(resolve(&[salary()], &[missing], &m), Err(EngineError::InvalidScenarioDefinition(_))));

        let undeclared = LifeEvent::new("e", "", date(2025, 2, 1)).with_patch(
            "salary",
            PatchOperation::ReplaceVariable { variable: "bonus".to_string(), value: Money::ONE },
        );
        assert!(resolve(&[salary()], &[undeclared], &m).is_err());

        let duplicate = LifeEvent::new("e", "", date(2025, 2, 1))
            .with_patch("salary", PatchOperation::AddComponent { component: salary() });
        assert!(resolve(&[salary()], &[duplicate], &m).is_err());

        let inverted = LifeEvent::new("e", "", date(2025, 2, 1))
            .with_patch("salary", PatchOperation::SetStartDate { start_date: date(2026, 1, 1) })
            .with_patch("salary", PatchOperation::SetEndDate { end_date: date(2025, 6, 30) });
        assert!(resolve(&[salary()], &[inverted], &m).is_err());
    }

    #[test]
    fn test_fold_matches_resolve_for_every_month() {
        let events = vec![
            raise("r1", date(2025, 3, 1), 5500),
            LifeEvent::new("end", "", date(2025, 5, 1))
                .with_patch("salary", PatchOperation::SetEndDate { end_date: date(2025, 8, 31) }),
            raise("r2", date(2025, 3, 9), 5800),
        ];
        let horizon = months("2025-01", 10);
        let snapshots = resolve(&[salary()], &events, &horizon).unwrap();
        for (snapshot, &month) in snapshots.iter().zip(&horizon) {
            let folded = effective_components(&[salary()], &events, month).unwrap();
            let resolved: Vec<Component> = snapshot.components.iter().map(|c| (**c).clone()).collect();
            assert_eq!(folded, resolved, "mismatch in {}", month);
        }
    }

    #[test]
    fn test_component_timelines() {
        let car = Component::new("car", "Car loan", ComponentKind::Expense, "-350");
        let events = vec![LifeEvent::new("buy", "", date(2025, 2, 1))
            .with_patch("car", PatchOperation::AddComponent { component: car })];
        let snapshots = resolve(&[salary()], &events, &months("2025-01", 3)).unwrap();
        let timelines = component_timelines(&snapshots);
        assert_eq!(timelines.len(), 2);
        assert_eq!(timelines[0].0, "salary");
        assert!(timelines[0].1.iter().all(Option::is_some));
        assert_eq!(timelines[1].0, "car");
        assert!(timelines[1].1[0].is_none());
        assert!(timelines[1].1[1].is_some());
    }
}
