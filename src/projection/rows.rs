//! Projection output rows

use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::calendar::YearMonth;
use crate::error::ValueError;
use crate::model::ComponentKind;
use crate::money::Money;

/// One component's contribution to a month
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentValue {
    pub component_id: String,
    pub label: String,
    pub kind: ComponentKind,
    pub value: Money,
}

/// Aggregated values for a single projection month
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionRow {
    pub month: YearMonth,

    /// 1-based position within the horizon
    pub month_number: u32,

    /// Effective components in order
    pub components: Vec<ComponentValue>,

    // Flows
    pub total_income: Money,
    pub total_expenses: Money,
    pub net_cash_flow: Money,
    pub running_balance: Money,

    // Levels
    pub total_assets: Money,
    pub total_liabilities: Money,
    pub net_worth: Money,

    /// Life events applied at or before this month
    pub active_events: Vec<String>,
}

impl ProjectionRow {
    /// Create a new row with all values zeroed
    pub fn new(month: YearMonth, month_number: u32) -> Self {
        Self {
            month,
            month_number,
            components: Vec::new(),
            total_income: Money::ZERO,
            total_expenses: Money::ZERO,
            net_cash_flow: Money::ZERO,
            running_balance: Money::ZERO,
            total_assets: Money::ZERO,
            total_liabilities: Money::ZERO,
            net_worth: Money::ZERO,
            active_events: Vec::new(),
        }
    }

    /// Value of a component this month, if it is in the effective set
    pub fn value_of(&self, component_id: &str) -> Option<Money> {
        self.components
            .iter()
            .find(|c| c.component_id == component_id)
            .map(|c| c.value)
    }
}

/// Summary statistics for a projection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionSummary {
    pub total_months: u32,
    pub total_income: Money,
    pub total_expenses: Money,
    pub total_net_cash_flow: Money,
    pub final_balance: Money,
    pub final_net_worth: Money,
    pub lowest_balance: Money,
    pub lowest_balance_month: Option<YearMonth>,
}

impl ProjectionSummary {
    pub fn from_rows(rows: &[ProjectionRow]) -> Result<Self, ValueError> {
        let mut total_income = Money::ZERO;
        let mut total_expenses = Money::ZERO;
        let mut total_net_cash_flow = Money::ZERO;
        for row in rows {
            total_income = total_income.checked_add(row.total_income)?;
            total_expenses = total_expenses.checked_add(row.total_expenses)?;
            total_net_cash_flow = total_net_cash_flow.checked_add(row.net_cash_flow)?;
        }

        let lowest = rows.iter().min_by_key(|r| r.running_balance);

        Ok(Self {
            total_months: rows.len() as u32,
            total_income,
            total_expenses,
            total_net_cash_flow,
            final_balance: rows.last().map(|r| r.running_balance).unwrap_or(Money::ZERO),
            final_net_worth: rows.last().map(|r| r.net_worth).unwrap_or(Money::ZERO),
            lowest_balance: lowest.map(|r| r.running_balance).unwrap_or(Money::ZERO),
            lowest_balance_month: lowest.map(|r| r.month),
        })
    }
}

/// Flat CSV record; per-component values are not included
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    month: YearMonth,
    month_number: u32,
    total_income: Money,
    total_expenses: Money,
    net_cash_flow: Money,
    running_balance: Money,
    total_assets: Money,
    total_liabilities: Money,
    net_worth: Money,
    active_events: &'a str,
}

/// Write rows as CSV with a header line
pub fn write_csv<W: Write>(rows: &[ProjectionRow], writer: W) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        let events = row.active_events.join(";");
        wtr.serialize(CsvRow {
            month: row.month,
            month_number: row.month_number,
            total_income: row.total_income,
            total_expenses: row.total_expenses,
            net_cash_flow: row.net_cash_flow,
            running_balance: row.running_balance,
            total_assets: row.total_assets,
            total_liabilities: row.total_liabilities,
            net_worth: row.net_worth,
            active_events: &events,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(month: &str, n: u32, net: i64, balance: i64) -> ProjectionRow {
        let mut row = ProjectionRow::new(month.parse().unwrap(), n);
        row.total_income = Money::from_int(net.max(0));
        row.total_expenses = Money::from_int(net.min(0));
        row.net_cash_flow = Money::from_int(net);
        row.running_balance = Money::from_int(balance);
        row.net_worth = Money::from_int(balance);
        row
    }

    #[test]
    fn test_summary() {
        let rows = vec![row("2025-01", 1, 100, 100), row("2025-02", 2, -300, -200), row("2025-03", 3, 500, 300)];
        let summary = ProjectionSummary::from_rows(&rows).unwrap();
        assert_eq!(summary.total_months, 3);
        assert_eq!(summary.total_income, Money::from_int(600));
        assert_eq!(summary.total_expenses, Money::from_int(-300));
        assert_eq!(summary.final_balance, Money::from_int(300));
        assert_eq!(summary.lowest_balance, Money::from_int(-200));
        assert_eq!(summary.lowest_balance_month, Some("2025-02".parse().unwrap()));
    }

    #[test]
    fn test_write_csv() {
        let mut r = row("2025-01", 1, 100, 100);
        r.active_events = vec!["raise".to_string(), "move".to_string()];
        let mut out = Vec::new();
        write_csv(&[r], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("month,month_number,total_income"));
        assert_eq!(
            lines.next().unwrap(),
            "2025-01,1,100.0000,0.0000,100.0000,100.0000,0.0000,0.0000,100.0000,raise;move"
        );
    }
}
