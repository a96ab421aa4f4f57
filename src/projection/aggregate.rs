//! Scenario aggregation: per-month totals and the running balance

use std::collections::HashMap;

use crate::error::{EngineError, ValueError};
use crate::model::ComponentKind;
use crate::money::Money;

use super::cancel::CancellationToken;
use super::cascade::EffectiveSnapshot;
use super::rows::{ComponentValue, ProjectionRow};
use super::state::ProjectionState;

/// Expanded values of one component, index-aligned with the horizon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedSeries {
    pub component_id: String,
    pub values: Vec<Money>,
}

/// Combine expanded component series into projection rows
///
/// `expansions` are in component order; the first failure aborts the whole
/// computation. Values are signed: expenses are added as produced, assets and
/// liabilities are levels that feed `net_worth` but not the balance.
pub fn aggregate(
    snapshots: &[EffectiveSnapshot],
    expansions: Vec<Result<ExpandedSeries, EngineError>>,
    opening_balance: Money,
    cancel: &CancellationToken,
) -> Result<Vec<ProjectionRow>, EngineError> {
    let mut series: HashMap<String, Vec<Money>> = HashMap::with_capacity(expansions.len());
    for expansion in expansions {
        match expansion {
            Ok(s) => {
                series.insert(s.component_id, s.values);
            }
            Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
            Err(err) => {
                let reason = match err.component_id() {
                    Some(id) => format!("component '{}' could not be expanded", id),
                    None => "component expansion failed".to_string(),
                };
                return Err(EngineError::Aggregation {
                    reason,
                    source: Some(Box::new(err)),
                });
            }
        }
    }

    let mut state = ProjectionState::from_opening(opening_balance);
    let mut rows = Vec::with_capacity(snapshots.len());

    for (idx, snapshot) in snapshots.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let month = snapshot.month;
        let overflow = |what: &str| EngineError::Aggregation {
            reason: format!("{} overflowed in {}", what, month),
            source: None,
        };

        let mut row = ProjectionRow::new(month, idx as u32 + 1);

        for component in snapshot.components.iter() {
            let value = series
                .get(&component.id)
                .and_then(|values| values.get(idx))
                .copied()
                .ok_or_else(|| EngineError::Aggregation {
                    reason: format!("no expanded values for component '{}' in {}", component.id, month),
                    source: None,
                })?;

            let (total, name) = match component.kind {
                ComponentKind::Income => (&mut row.total_income, "total_income"),
                ComponentKind::Expense => (&mut row.total_expenses, "total_expenses"),
                ComponentKind::Asset => (&mut row.total_assets, "total_assets"),
                ComponentKind::Liability => (&mut row.total_liabilities, "total_liabilities"),
            };
            *total = total.checked_add(value).map_err(|_| overflow(name))?;

            row.components.push(ComponentValue {
                component_id: component.id.clone(),
                label: component.label.clone(),
                kind: component.kind,
                value,
            });
        }

        row.net_cash_flow = row
            .total_income
            .checked_add(row.total_expenses)
            .map_err(|_| overflow("net_cash_flow"))?;
        row.running_balance = state
            .advance_month(month, row.net_cash_flow)
            .map_err(|_| overflow("running_balance"))?;
        row.net_worth = net_worth(&row).map_err(|_| overflow("net_worth"))?;
        row.active_events = snapshot.applied_events.as_ref().clone();

        rows.push(row);
    }

    Ok(rows)
}

fn net_worth(row: &ProjectionRow) -> Result<Money, ValueError> {
    row.running_balance
        .checked_add(row.total_assets)?
        .checked_sub(row.total_liabilities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::YearMonth;
    use crate::error::FormulaError;
    use crate::model::Component;
    use crate::projection::cascade::resolve;

    fn months(start: &str, n: u32) -> Vec<YearMonth> {
        let start: YearMonth = start.parse().unwrap();
        (0..n).map(|i| start.checked_add_months(i).unwrap()).collect()
    }

    fn series(id: &str, values: &[i64]) -> Result<ExpandedSeries, EngineError> {
        Ok(ExpandedSeries {
            component_id: id.to_string(),
            values: values.iter().map(|v| Money::from_int(*v)).collect(),
        })
    }

    fn components() -> Vec<Component> {
        vec![
            Component::new("salary", "Salary", ComponentKind::Income, "0"),
            Component::new("rent", "Rent", ComponentKind::Expense, "0"),
            Component::new("savings", "Savings", ComponentKind::Asset, "0"),
            Component::new("mortgage", "Mortgage", ComponentKind::Liability, "0"),
        ]
    }

    #[test]
    fn test_totals_and_running_balance() {
        let snapshots = resolve(&components(), &[], &months("2025-01", 2)).unwrap();
        let rows = aggregate(
            &snapshots,
            vec![
                series("salary", &[5000, 5000]),
                series("rent", &[-1500, -1500]),
                series("savings", &[10000, 10500]),
                series("mortgage", &[200000, 199000]),
            ],
            Money::from_int(1000),
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(rows[0].total_income, Money::from_int(5000));
        assert_eq!(rows[0].total_expenses, Money::from_int(-1500));
        assert_eq!(rows[0].net_cash_flow, Money::from_int(3500));
        assert_eq!(rows[0].running_balance, Money::from_int(4500));
        assert_eq!(rows[1].running_balance, Money::from_int(8000));
        assert_eq!(rows[1].total_assets, Money::from_int(10500));
        assert_eq!(rows[1].total_liabilities, Money::from_int(199000));
        assert_eq!(rows[1].net_worth, Money::from_int(8000 + 10500 - 199000));
        assert_eq!(rows[1].month_number, 2);
        assert_eq!(rows[1].value_of("rent"), Some(Money::from_int(-1500)));
    }

    #[test]
    fn test_component_failure_becomes_aggregation_error() {
        let snapshots = resolve(&components()[..2], &[], &months("2025-01", 1)).unwrap();
        let failure = EngineError::ComponentEvaluation {
            component_id: "rent".to_string(),
            month: snapshots[0].month,
            cause: FormulaError::runtime("x / 0", Some(2), "division by zero"),
        };
        let err = aggregate(
            &snapshots,
            vec![series("salary", &[5000]), Err(failure.clone())],
            Money::ZERO,
            &CancellationToken::new(),
        )
        .unwrap_err();

        match err {
            EngineError::Aggregation { source: Some(inner), .. } => assert_eq!(*inner, failure),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_overflow_is_aggregation_error() {
        let snapshots = resolve(&components()[..1], &[], &months("2025-01", 1)).unwrap();
        let huge = Money::parse("5000000000000000000000000").unwrap();
        let err = aggregate(
            &snapshots,
            vec![Ok(ExpandedSeries { component_id: "salary".to_string(), values: vec![huge] })],
            huge,
            &CancellationToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Aggregation { source: None, .. }));
    }
}
