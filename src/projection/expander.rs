//! Component expansion: one value per horizon month
//!
//! The steps for each month are: active window check, frequency tick (or
//! day-based occurrence count), variable binding, sandbox evaluation, then
//! the seasonal multiplier. Months outside the window or without a tick are
//! exactly zero and the formula is not evaluated for them.

use chrono::NaiveDate;
use std::sync::Arc;

use crate::calendar::YearMonth;
use crate::error::{EngineError, FormulaError, ValueError};
use crate::formula::{Binding, CompiledFormula, FormulaSandbox};
use crate::model::{Component, Frequency};
use crate::money::Money;

use super::cancel::CancellationToken;

/// Where a month sits within the projection
#[derive(Debug, Clone, Copy)]
pub struct MonthContext {
    pub month: YearMonth,

    /// 1-based projection month
    pub month_number: u32,

    /// First day of the month the component entered the effective set (the
    /// horizon's first day for base components); anchors components without
    /// a start date
    pub entry_date: NaiveDate,
}

/// Date recurrences are counted from
pub fn anchor_date(component: &Component, entry_date: NaiveDate) -> NaiveDate {
    component.start_date.unwrap_or(entry_date)
}

/// Whether `month` lies inside the component's window (month granularity,
/// both ends inclusive)
pub fn is_active(component: &Component, month: YearMonth) -> bool {
    if let Some(start) = component.start_date {
        if month < YearMonth::from_date(start) {
            return false;
        }
    }
    if let Some(end) = component.end_date {
        if month > YearMonth::from_date(end) {
            return false;
        }
    }
    true
}

/// Number of times the component recurs in `month`
///
/// Month-based frequencies yield 0 or 1; weekly and custom intervals count
/// the dates `anchor + k * interval` inside both the month and the window.
pub fn occurrences(component: &Component, month: YearMonth, entry_date: NaiveDate) -> u32 {
    if !is_active(component, month) {
        return 0;
    }

    let anchor = anchor_date(component, entry_date);
    let since = month.months_since(YearMonth::from_date(anchor));

    let tick = match component.frequency {
        Frequency::Monthly => true,
        Frequency::Quarterly => since >= 0 && since % 3 == 0,
        Frequency::Annual => since >= 0 && since % 12 == 0,
        Frequency::OneTime => since == 0,
        Frequency::Weekly | Frequency::Custom { .. } => {
            let interval = component.frequency.interval_days().unwrap_or(0);
            return count_interval_dates(component, month, anchor, interval);
        }
    };
    u32::from(tick)
}

fn count_interval_dates(component: &Component, month: YearMonth, anchor: NaiveDate, interval: u32) -> u32 {
    if interval == 0 {
        return 0;
    }

    let window_start = month.first_day().max(anchor);
    let window_end = match component.end_date {
        Some(end) => month.last_day().min(end),
        None => month.last_day(),
    };
    if window_end < window_start {
        return 0;
    }

    let interval = i64::from(interval);
    let from = (window_start - anchor).num_days();
    let to = (window_end - anchor).num_days();
    // First k with anchor + k*interval >= window_start, last with <= window_end
    let first = (from + interval - 1) / interval;
    let last = to / interval;
    if last < first {
        0
    } else {
        u32::try_from(last - first + 1).unwrap_or(u32::MAX)
    }
}

/// Variables visible to the formula for one month
pub fn month_binding(component: &Component, ctx: &MonthContext, occurrences: u32) -> Binding {
    let anchor = anchor_date(component, ctx.entry_date);
    let mut binding = component.variables.clone();
    let time = [
        ("month", i64::from(ctx.month_number)),
        ("months_since_start", ctx.month.months_since(YearMonth::from_date(anchor))),
        ("calendar_month", i64::from(ctx.month.month())),
        ("year", i64::from(ctx.month.year())),
        ("days_in_month", i64::from(ctx.month.days_in_month())),
        ("occurrences", i64::from(occurrences)),
    ];
    for (name, value) in time {
        binding.insert(name.to_string(), Money::from_int(value));
    }
    binding
}

/// Value of one component for one month
pub fn expand_month(
    component: &Component,
    compiled: &CompiledFormula,
    ctx: &MonthContext,
) -> Result<Money, FormulaError> {
    let count = occurrences(component, ctx.month, ctx.entry_date);
    if count == 0 {
        return Ok(Money::ZERO);
    }

    let binding = month_binding(component, ctx, count);
    let mut value = compiled.evaluate(&binding)?;

    let arithmetic = |e: ValueError| FormulaError::runtime(&component.formula, None, e.to_string());

    if component.frequency.interval_days().is_some() {
        value = value.checked_mul(Money::from_int(i64::from(count))).map_err(arithmetic)?;
    }
    if let Some(multiplier) = component.seasonal.get(&ctx.month.month()) {
        value = value.checked_mul(*multiplier).map_err(arithmetic)?;
    }
    Ok(value)
}

/// Expand a component over every month of `months`
pub fn expand(
    component: &Component,
    months: &[YearMonth],
    sandbox: &FormulaSandbox,
) -> Result<Vec<Money>, EngineError> {
    let version = Arc::new(component.clone());
    let timeline = vec![Some(version); months.len()];
    expand_timeline(&component.id, &timeline, months, sandbox, &CancellationToken::new())
}

/// Expand a component whose definition may change month to month
///
/// `timeline[i]` is the version in effect for `months[i]`, or `None` when
/// the component is not in the effective set (value zero). A component
/// without a start date is anchored to the month it entered the effective
/// set; leaving and re-entering anchors it again. Each distinct version is
/// compiled once.
pub fn expand_timeline(
    component_id: &str,
    timeline: &[Option<Arc<Component>>],
    months: &[YearMonth],
    sandbox: &FormulaSandbox,
    cancel: &CancellationToken,
) -> Result<Vec<Money>, EngineError> {
    let mut values = Vec::with_capacity(months.len());
    let mut compiled: Option<(Arc<Component>, CompiledFormula)> = None;
    let mut entered: Option<NaiveDate> = None;

    for (idx, (&month, version)) in months.iter().zip(timeline).enumerate() {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let Some(component) = version else {
            entered = None;
            values.push(Money::ZERO);
            continue;
        };
        let entry_date = *entered.get_or_insert_with(|| month.first_day());

        let fail = |cause: FormulaError| EngineError::ComponentEvaluation {
            component_id: component_id.to_string(),
            month,
            cause,
        };

        let entry = match compiled.take() {
            Some((seen, formula)) if Arc::ptr_eq(&seen, component) => (seen, formula),
            _ => {
                let formula = sandbox
                    .compile(&component.formula, component.declared_names())
                    .map_err(fail)?;
                (Arc::clone(component), formula)
            }
        };
        let (_, formula) = compiled.insert(entry);

        let ctx = MonthContext {
            month,
            month_number: idx as u32 + 1,
            entry_date,
        };
        values.push(expand_month(component, formula, &ctx).map_err(fail)?);
    }

    Ok(values)
}
