//! Running state carried from one projection month to the next

use crate::calendar::YearMonth;
use crate::error::ValueError;
use crate::money::Money;

/// State of the household balance at a point in the projection
#[derive(Debug, Clone)]
pub struct ProjectionState {
    /// Current projection month (1-indexed, 0 before the first month)
    pub projection_month: u32,

    /// Calendar month last entered
    pub month: Option<YearMonth>,

    /// Balance before any projected flow
    pub opening_balance: Money,

    /// Balance at the end of the current month
    pub running_balance: Money,
}

impl ProjectionState {
    /// Initialize state at projection start
    pub fn from_opening(opening_balance: Money) -> Self {
        Self {
            projection_month: 0,
            month: None,
            opening_balance,
            running_balance: opening_balance,
        }
    }

    /// Enter the next month and fold its net cash flow into the balance
    pub fn advance_month(&mut self, month: YearMonth, net_cash_flow: Money) -> Result<Money, ValueError> {
        self.projection_month += 1;
        self.month = Some(month);
        self.running_balance = self.running_balance.checked_add(net_cash_flow)?;
        Ok(self.running_balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_accumulates() {
        let jan: YearMonth = "2025-01".parse().unwrap();
        let mut state = ProjectionState::from_opening(Money::from_int(100));
        assert_eq!(state.advance_month(jan, Money::from_int(50)).unwrap(), Money::from_int(150));
        let feb = jan.checked_add_months(1).unwrap();
        assert_eq!(state.advance_month(feb, Money::from_int(-200)).unwrap(), Money::from_int(-50));
        assert_eq!(state.projection_month, 2);
        assert_eq!(state.month, Some(feb));
    }
}
