//! Allow-listed functions and constants
//!
//! This is the complete set of callables a formula can reach. Anything not
//! listed here is rejected by the parser.

use rust_decimal::{Decimal, MathematicalOps};

use crate::error::ValueError;
use crate::money::{underflow_to_zero, Money};

/// Built-in constant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constant {
    Pi,
    E,
}

impl Constant {
    pub fn lookup(name: &str) -> Option<Constant> {
        match name {
            "pi" => Some(Constant::Pi),
            "e" => Some(Constant::E),
            _ => None,
        }
    }

    pub fn value(&self) -> Money {
        match self {
            Constant::Pi => Money::from_decimal(Decimal::PI),
            Constant::E => Money::from_decimal(Decimal::E),
        }
    }
}

pub const CONSTANT_NAMES: [&str; 2] = ["pi", "e"];

/// Allow-listed function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Min,
    Max,
    Abs,
    Round,
    Pow,
    Sum,
    Sqrt,
    Ceil,
    Floor,
    Exp,
    Log,
    Log10,
    Pmt,
    Fv,
    Pv,
    Nper,
    Sin,
    Cos,
    Tan,
}

pub const FUNCTION_NAMES: [&str; 19] = [
    "min", "max", "abs", "round", "pow", "sum", "sqrt", "ceil", "floor", "exp", "log", "log10",
    "pmt", "fv", "pv", "nper", "sin", "cos", "tan",
];

impl Function {
    pub fn lookup(name: &str) -> Option<Function> {
        let function = match name {
            "min" => Function::Min,
            "max" => Function::Max,
            "abs" => Function::Abs,
            "round" => Function::Round,
            "pow" => Function::Pow,
            "sum" => Function::Sum,
            "sqrt" => Function::Sqrt,
            "ceil" => Function::Ceil,
            "floor" => Function::Floor,
            "exp" => Function::Exp,
            "log" => Function::Log,
            "log10" => Function::Log10,
            "pmt" => Function::Pmt,
            "fv" => Function::Fv,
            "pv" => Function::Pv,
            "nper" => Function::Nper,
            "sin" => Function::Sin,
            "cos" => Function::Cos,
            "tan" => Function::Tan,
            _ => return None,
        };
        Some(function)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::Min => "min",
            Function::Max => "max",
            Function::Abs => "abs",
            Function::Round => "round",
            Function::Pow => "pow",
            Function::Sum => "sum",
            Function::Sqrt => "sqrt",
            Function::Ceil => "ceil",
            Function::Floor => "floor",
            Function::Exp => "exp",
            Function::Log => "log",
            Function::Log10 => "log10",
            Function::Pmt => "pmt",
            Function::Fv => "fv",
            Function::Pv => "pv",
            Function::Nper => "nper",
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
        }
    }

    /// Trigonometric functions are only callable when explicitly enabled
    pub fn is_trig(&self) -> bool {
        matches!(self, Function::Sin | Function::Cos | Function::Tan)
    }

    /// Accepted argument count as (min, max); `None` means variadic
    pub fn arity(&self) -> (usize, Option<usize>) {
        match self {
            Function::Min | Function::Max | Function::Sum => (1, None),
            Function::Round | Function::Log => (1, Some(2)),
            Function::Pow => (2, Some(2)),
            Function::Pmt | Function::Fv | Function::Pv | Function::Nper => (3, Some(4)),
            _ => (1, Some(1)),
        }
    }

    pub fn accepts(&self, count: usize) -> bool {
        let (min, max) = self.arity();
        count >= min && max.map_or(true, |max| count <= max)
    }

    pub fn arity_hint(&self) -> String {
        match self.arity() {
            (min, None) => format!("{}() takes at least {} argument(s)", self.name(), min),
            (min, Some(max)) if min == max => {
                format!("{}() takes exactly {} argument(s)", self.name(), min)
            }
            (min, Some(max)) => {
                format!("{}() takes {} to {} arguments", self.name(), min, max)
            }
        }
    }

    /// Apply to already-evaluated arguments; arity was checked at parse time
    pub fn apply(&self, args: &[Money]) -> Result<Money, ValueError> {
        let first = args.first().copied().ok_or_else(|| {
            ValueError::Domain(format!("{}() called without arguments", self.name()))
        })?;
        let arg = |i: usize| args.get(i).copied();

        match self {
            Function::Min => Ok(args.iter().copied().fold(first, Money::min)),
            Function::Max => Ok(args.iter().copied().fold(first, Money::max)),
            Function::Sum => args
                .iter()
                .skip(1)
                .try_fold(first, |acc, value| acc.checked_add(*value)),
            Function::Abs => Ok(first.abs()),
            Function::Round => {
                let digits = match arg(1) {
                    None => 0,
                    Some(digits) => digits
                        .to_i64_exact()
                        .and_then(|d| u32::try_from(d).ok())
                        .ok_or_else(|| {
                            ValueError::Domain(
                                "round() digits must be a non-negative whole number".to_string(),
                            )
                        })?,
                };
                Ok(first.round_to(digits))
            }
            Function::Pow => first.checked_pow(arg(1).unwrap_or(Money::ONE)),
            Function::Sqrt => first
                .to_decimal()
                .sqrt()
                .ok_or_else(|| {
                    ValueError::Domain(format!("sqrt() of negative value {}", first))
                })
                .and_then(Money::try_from_decimal),
            Function::Ceil => Ok(first.ceil()),
            Function::Floor => Ok(first.floor()),
            Function::Exp => match first.to_decimal().checked_exp() {
                Some(value) => Money::try_from_decimal(value),
                None => underflow_to_zero(first.is_negative()),
            },
            Function::Log => {
                let ln = natural_log(first.to_decimal())?;
                match arg(1) {
                    None => Money::try_from_decimal(ln),
                    Some(base) => {
                        if base == Money::ONE {
                            return Err(ValueError::DivisionByZero);
                        }
                        let base_ln = natural_log(base.to_decimal())?;
                        ln.checked_div(base_ln)
                            .ok_or(ValueError::Overflow)
                            .and_then(Money::try_from_decimal)
                    }
                }
            }
            Function::Log10 => {
                if !first.is_positive() {
                    return Err(ValueError::Domain(format!(
                        "log10() of non-positive value {}",
                        first
                    )));
                }
                first
                    .to_decimal()
                    .checked_log10()
                    .ok_or(ValueError::Overflow)
                    .and_then(Money::try_from_decimal)
            }
            Function::Pmt => payment(first, arg(1), arg(2), arg(3)),
            Function::Fv => future_value(first, arg(1), arg(2), arg(3)),
            Function::Pv => present_value(first, arg(1), arg(2), arg(3)),
            Function::Nper => periods(first, arg(1), arg(2), arg(3)),
            Function::Sin => first
                .to_decimal()
                .checked_sin()
                .ok_or(ValueError::Overflow)
                .and_then(Money::try_from_decimal),
            Function::Cos => first
                .to_decimal()
                .checked_cos()
                .ok_or(ValueError::Overflow)
                .and_then(Money::try_from_decimal),
            Function::Tan => first
                .to_decimal()
                .checked_tan()
                .ok_or_else(|| ValueError::Domain(format!("tan() undefined at {}", first)))
                .and_then(Money::try_from_decimal),
        }
    }
}

fn natural_log(value: Decimal) -> Result<Decimal, ValueError> {
    if value <= Decimal::ZERO {
        return Err(ValueError::Domain(format!(
            "log() of non-positive value {}",
            Money::from_decimal(value)
        )));
    }
    value.checked_ln().ok_or(ValueError::Overflow)
}

fn checked(value: Option<Decimal>) -> Result<Decimal, ValueError> {
    value.ok_or(ValueError::Overflow)
}

/// Monthly rate and compound factor `(1 + rate/12)^nper`
///
/// Computed at full decimal precision; callers round once at the end.
fn compound(rate: Money, nper: Option<Money>) -> Result<(Decimal, Decimal, Decimal), ValueError> {
    let nper = nper.unwrap_or(Money::ZERO);
    let periods = nper
        .to_i64_exact()
        .filter(|n| *n >= 0)
        .ok_or_else(|| {
            ValueError::Domain(format!(
                "nper must be a non-negative whole number of months, got {}",
                nper
            ))
        })?;
    let monthly = checked(rate.to_decimal().checked_div(Decimal::from(12)))?;
    let factor = checked(checked(Decimal::ONE.checked_add(monthly))?.checked_powi(periods))?;
    Ok((monthly, factor, Decimal::from(periods)))
}

/// Annuity factor `((1 + r)^n - 1) / r`
fn annuity(monthly: Decimal, factor: Decimal) -> Result<Decimal, ValueError> {
    checked(checked(factor.checked_sub(Decimal::ONE))?.checked_div(monthly))
}

/// Level monthly payment for an annual `rate` over `nper` months
fn payment(
    rate: Money,
    nper: Option<Money>,
    pv: Option<Money>,
    fv: Option<Money>,
) -> Result<Money, ValueError> {
    let pv = pv.unwrap_or(Money::ZERO).to_decimal();
    let fv = fv.unwrap_or(Money::ZERO).to_decimal();
    let (monthly, factor, periods) = compound(rate, nper)?;

    if monthly.is_zero() {
        if periods.is_zero() {
            return Err(ValueError::DivisionByZero);
        }
        let total = checked(pv.checked_add(fv))?;
        return Money::try_from_decimal(-checked(total.checked_div(periods))?);
    }

    let numerator = checked(checked(pv.checked_mul(factor))?.checked_add(fv))?;
    let denominator = annuity(monthly, factor)?;
    if denominator.is_zero() {
        return Err(ValueError::DivisionByZero);
    }
    Money::try_from_decimal(-checked(numerator.checked_div(denominator))?)
}

/// Value after `nper` months of `pmt` contributions on top of `pv`
fn future_value(
    rate: Money,
    nper: Option<Money>,
    pmt: Option<Money>,
    pv: Option<Money>,
) -> Result<Money, ValueError> {
    let pmt = pmt.unwrap_or(Money::ZERO).to_decimal();
    let pv = pv.unwrap_or(Money::ZERO).to_decimal();
    let (monthly, factor, periods) = compound(rate, nper)?;

    if monthly.is_zero() {
        return Money::try_from_decimal(checked(
            pv.checked_add(checked(pmt.checked_mul(periods))?),
        )?);
    }

    let grown = checked(pv.checked_mul(factor))?;
    let contributions = checked(pmt.checked_mul(annuity(monthly, factor)?))?;
    Money::try_from_decimal(checked(grown.checked_add(contributions))?)
}

/// Present value of `nper` monthly `pmt` payments plus a final `fv`
fn present_value(
    rate: Money,
    nper: Option<Money>,
    pmt: Option<Money>,
    fv: Option<Money>,
) -> Result<Money, ValueError> {
    let pmt = pmt.unwrap_or(Money::ZERO).to_decimal();
    let fv = fv.unwrap_or(Money::ZERO).to_decimal();
    let (monthly, factor, periods) = compound(rate, nper)?;

    if monthly.is_zero() {
        return Money::try_from_decimal(checked(
            fv.checked_add(checked(pmt.checked_mul(periods))?),
        )?);
    }

    let total = checked(fv.checked_add(checked(pmt.checked_mul(annuity(monthly, factor)?))?))?;
    if factor.is_zero() {
        return Err(ValueError::DivisionByZero);
    }
    Money::try_from_decimal(checked(total.checked_div(factor))?)
}

/// Months needed for `pmt` payments to move `pv` to `fv` at an annual `rate`
fn periods(
    rate: Money,
    pmt: Option<Money>,
    pv: Option<Money>,
    fv: Option<Money>,
) -> Result<Money, ValueError> {
    let pmt = pmt.unwrap_or(Money::ZERO).to_decimal();
    let pv = pv.unwrap_or(Money::ZERO).to_decimal();
    let fv = fv.unwrap_or(Money::ZERO).to_decimal();

    if pmt.is_zero() && rate.is_zero() {
        return Err(ValueError::DivisionByZero);
    }
    if rate.is_zero() {
        let total = checked(pv.checked_add(fv))?;
        return Money::try_from_decimal(-checked(total.checked_div(pmt))?);
    }

    let monthly = checked(rate.to_decimal().checked_div(Decimal::from(12)))?;
    let numerator = checked(pmt.checked_sub(checked(fv.checked_mul(monthly))?))?;
    let denominator = checked(pmt.checked_add(checked(pv.checked_mul(monthly))?))?;
    if denominator.is_zero() {
        return Err(ValueError::DivisionByZero);
    }
    let ratio = checked(numerator.checked_div(denominator))?;
    if ratio <= Decimal::ZERO {
        return Err(ValueError::Domain(format!(
            "nper() has no solution: payment {} never reaches the target",
            Money::from_decimal(pmt)
        )));
    }
    let growth = natural_log(checked(Decimal::ONE.checked_add(monthly))?)?;
    if growth.is_zero() {
        return Err(ValueError::DivisionByZero);
    }
    Money::try_from_decimal(checked(natural_log(ratio)?.checked_div(growth))?)
}
