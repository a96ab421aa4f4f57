//! Fixed-point monetary amounts
//!
//! `Money` wraps an integer-backed decimal held at exactly `MONEY_SCALE`
//! fractional digits. Every operation that can produce extra digits (multiply,
//! divide, power, construction from a longer literal) rounds with
//! `ROUNDING_POLICY`. There is no conversion to or from binary floating point.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Neg;
use std::str::FromStr;

use crate::error::ValueError;

/// Number of fractional digits every amount is held at
pub const MONEY_SCALE: u32 = 4;

/// Rounding applied whenever a result has more than `MONEY_SCALE` digits
/// (round half to even, a.k.a. banker's rounding)
pub const ROUNDING_POLICY: RoundingStrategy = RoundingStrategy::MidpointNearestEven;

/// Exact decimal amount at fixed scale
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "MoneyRepr", into = "String")]
pub struct Money(Decimal);

/// Accepted serialized forms: decimal strings and whole integers. JSON
/// floats are rejected so no binary value ever enters the engine.
#[derive(Deserialize)]
#[serde(untagged)]
enum MoneyRepr {
    Text(String),
    Integer(i64),
}

impl TryFrom<MoneyRepr> for Money {
    type Error = ValueError;

    fn try_from(repr: MoneyRepr) -> Result<Self, Self::Error> {
        match repr {
            MoneyRepr::Text(text) => Money::parse(&text),
            MoneyRepr::Integer(value) => Ok(Money::from_int(value)),
        }
    }
}

impl From<Money> for String {
    fn from(value: Money) -> Self {
        value.to_string()
    }
}

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);
    pub const ONE: Money = Money(Decimal::ONE);

    /// Round an arbitrary decimal to the fixed scale
    pub fn from_decimal(value: Decimal) -> Self {
        let mut rounded = value.round_dp_with_strategy(MONEY_SCALE, ROUNDING_POLICY);
        rounded.rescale(MONEY_SCALE);
        Money(rounded)
    }

    /// Like `from_decimal`, but fails when the magnitude is too large to be
    /// held at `MONEY_SCALE`
    pub fn try_from_decimal(value: Decimal) -> Result<Self, ValueError> {
        let money = Self::from_decimal(value);
        if money.0.scale() != MONEY_SCALE {
            return Err(ValueError::Overflow);
        }
        Ok(money)
    }

    /// Whole units
    pub fn from_int(value: i64) -> Self {
        Self::from_decimal(Decimal::from(value))
    }

    /// Integer mantissa plus scale, e.g. `(150075, 2)` is 1500.75
    pub fn from_scaled(units: i64, scale: u32) -> Result<Self, ValueError> {
        let value = Decimal::try_new(units, scale).map_err(|_| ValueError::Parse {
            input: format!("{}e-{}", units, scale),
        })?;
        Self::try_from_decimal(value)
    }

    /// Parse a decimal string such as `"5000"`, `"-1500.50"` or `".25"`
    ///
    /// Digits beyond `MONEY_SCALE` are rounded with `ROUNDING_POLICY`;
    /// inputs that do not fit the underlying 96-bit mantissa are rejected
    /// rather than truncated.
    pub fn parse(input: &str) -> Result<Self, ValueError> {
        let trimmed = input.trim();
        let normalized = if let Some(rest) = trimmed.strip_prefix('.') {
            format!("0.{}", rest)
        } else if let Some(rest) = trimmed.strip_prefix("-.") {
            format!("-0.{}", rest)
        } else {
            trimmed.to_string()
        };

        let value = Decimal::from_str_exact(&normalized).map_err(|_| ValueError::Parse {
            input: input.to_string(),
        })?;
        Self::try_from_decimal(value)
    }

    /// The underlying decimal (always at `MONEY_SCALE`)
    pub fn to_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Whether the amount has no fractional part
    pub fn is_integer(&self) -> bool {
        self.0.fract().is_zero()
    }

    /// Exact integer value, if the amount is whole and fits `i64`
    pub fn to_i64_exact(&self) -> Option<i64> {
        if self.is_integer() {
            self.0.trunc().to_i64()
        } else {
            None
        }
    }

    pub fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    pub fn checked_add(&self, rhs: Money) -> Result<Money, ValueError> {
        self.0
            .checked_add(rhs.0)
            .ok_or(ValueError::Overflow)
            .and_then(Money::try_from_decimal)
    }

    pub fn checked_sub(&self, rhs: Money) -> Result<Money, ValueError> {
        self.0
            .checked_sub(rhs.0)
            .ok_or(ValueError::Overflow)
            .and_then(Money::try_from_decimal)
    }

    pub fn checked_mul(&self, rhs: Money) -> Result<Money, ValueError> {
        self.0
            .checked_mul(rhs.0)
            .ok_or(ValueError::Overflow)
            .and_then(Money::try_from_decimal)
    }

    /// Fails with `DivisionByZero` when the divisor is exactly zero
    pub fn checked_div(&self, rhs: Money) -> Result<Money, ValueError> {
        if rhs.is_zero() {
            return Err(ValueError::DivisionByZero);
        }
        self.0
            .checked_div(rhs.0)
            .ok_or(ValueError::Overflow)
            .and_then(Money::try_from_decimal)
    }

    /// Remainder with the sign of the dividend
    pub fn checked_rem(&self, rhs: Money) -> Result<Money, ValueError> {
        if rhs.is_zero() {
            return Err(ValueError::DivisionByZero);
        }
        self.0
            .checked_rem(rhs.0)
            .ok_or(ValueError::Overflow)
            .and_then(Money::try_from_decimal)
    }

    /// Raise to a power
    ///
    /// Whole exponents use repeated squaring (negative ones invert the
    /// result); fractional exponents require a positive base. A result too
    /// small to register at `MONEY_SCALE` is zero, not an overflow.
    pub fn checked_pow(&self, exponent: Money) -> Result<Money, ValueError> {
        let shrinks = (self.0.abs() < Decimal::ONE) == exponent.is_positive();

        if let Some(n) = exponent.to_i64_exact() {
            if n >= 0 {
                return match self.0.checked_powi(n) {
                    Some(value) => Money::try_from_decimal(value),
                    None => underflow_to_zero(shrinks),
                };
            }
            if self.is_zero() {
                return Err(ValueError::DivisionByZero);
            }
            let magnitude = n.checked_neg().ok_or(ValueError::Overflow)?;
            let Some(denominator) = self.0.checked_powi(magnitude) else {
                return underflow_to_zero(shrinks);
            };
            return Decimal::ONE
                .checked_div(denominator)
                .ok_or(ValueError::Overflow)
                .and_then(Money::try_from_decimal);
        }

        if !self.is_positive() {
            return Err(ValueError::Domain(format!(
                "cannot raise {} to the fractional power {}",
                self, exponent
            )));
        }
        match self.0.checked_powd(exponent.0) {
            Some(value) => Money::try_from_decimal(value),
            None => underflow_to_zero(shrinks),
        }
    }

    /// Round to `digits` fractional places (at most `MONEY_SCALE`)
    pub fn round_to(&self, digits: u32) -> Money {
        Money::from_decimal(
            self.0
                .round_dp_with_strategy(digits.min(MONEY_SCALE), ROUNDING_POLICY),
        )
    }

    pub fn floor(&self) -> Money {
        Money::from_decimal(self.0.floor())
    }

    pub fn ceil(&self) -> Money {
        Money::from_decimal(self.0.ceil())
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::ZERO
    }
}

/// Zero for a result that fell below the representable range, overflow
/// otherwise
pub(crate) fn underflow_to_zero(underflowed: bool) -> Result<Money, ValueError> {
    if underflowed {
        Ok(Money::ZERO)
    } else {
        Err(ValueError::Overflow)
    }
}

impl FromStr for Money {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::parse(s)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.*}", MONEY_SCALE as usize, self.0)
    }
}

impl fmt::Debug for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Money({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(s: &str) -> Money {
        Money::parse(s).unwrap()
    }

    #[test]
    fn test_parse_and_display_at_fixed_scale() {
        assert_eq!(m("5000").to_string(), "5000.0000");
        assert_eq!(m("-1500.5").to_string(), "-1500.5000");
        assert_eq!(m(".25").to_string(), "0.2500");
        assert_eq!(m("-.25").to_string(), "-0.2500");
        assert!(Money::parse("12abc").is_err());
        assert!(Money::parse("").is_err());
    }

    #[test]
    fn test_construction_rounds_half_to_even() {
        assert_eq!(m("0.00005"), m("0.0000"));
        assert_eq!(m("0.00015"), m("0.0002"));
        assert_eq!(m("0.00025"), m("0.0002"));
        assert_eq!(m("-0.00035"), m("-0.0004"));
    }

    #[test]
    fn test_from_scaled() {
        assert_eq!(Money::from_scaled(150075, 2).unwrap(), m("1500.75"));
        assert_eq!(Money::from_scaled(-5, 0).unwrap(), m("-5"));
        assert_eq!(Money::from_scaled(123456789, 6).unwrap(), m("123.4568"));
        assert!(Money::from_scaled(1, 40).is_err());
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(m("10").checked_div(Money::ZERO), Err(ValueError::DivisionByZero));
        assert_eq!(m("10").checked_rem(Money::ZERO), Err(ValueError::DivisionByZero));
        assert_eq!(Money::ZERO.checked_pow(m("-1")), Err(ValueError::DivisionByZero));
    }

    #[test]
    fn test_division_rounds_to_scale() {
        assert_eq!(m("100").checked_div(m("3")).unwrap(), m("33.3333"));
        assert_eq!(m("2").checked_div(m("3")).unwrap(), m("0.6667"));
        // 0.00005 exactly halfway: ties go to the even neighbour
        assert_eq!(m("0.0001").checked_div(m("2")).unwrap(), m("0.0000"));
        assert_eq!(m("0.0003").checked_div(m("2")).unwrap(), m("0.0002"));
    }

    #[test]
    fn test_addition_is_exact() {
        let mut total = Money::ZERO;
        for _ in 0..10 {
            total = total.checked_add(m("0.1")).unwrap();
        }
        assert_eq!(total, Money::ONE);
    }

    #[test]
    fn test_pow() {
        assert_eq!(m("1.5").checked_pow(m("2")).unwrap(), m("2.25"));
        assert_eq!(m("2").checked_pow(m("-2")).unwrap(), m("0.25"));
        assert_eq!(m("4").checked_pow(m("0.5")).unwrap(), m("2"));
        assert!(matches!(m("-4").checked_pow(m("0.5")), Err(ValueError::Domain(_))));
        assert_eq!(m("10").checked_pow(m("100")), Err(ValueError::Overflow));
    }

    #[test]
    fn test_overflow_is_reported() {
        let big = m("7000000000000000000000");
        assert_eq!(big.checked_mul(big), Err(ValueError::Overflow));
        // Fits the mantissa, but not at four fractional digits
        let huge = m("5000000000000000000000000");
        assert_eq!(huge.checked_add(huge), Err(ValueError::Overflow));
        assert!(Money::parse("50000000000000000000000000").is_err());
    }

    #[test]
    fn test_tiny_powers_round_to_zero() {
        assert_eq!(m("10").checked_pow(m("-30")).unwrap(), Money::ZERO);
        assert_eq!(m("0.0001").checked_pow(m("1000.5")).unwrap(), Money::ZERO);
        assert_eq!(m("0.5").checked_pow(m("200")).unwrap(), Money::ZERO);
        assert_eq!(m("10").checked_pow(m("-2")).unwrap(), m("0.01"));
        // Growth past the range is still an overflow
        assert_eq!(m("10").checked_pow(m("40")), Err(ValueError::Overflow));
        assert_eq!(m("0.5").checked_pow(m("-200")), Err(ValueError::Overflow));
    }

    #[test]
    fn test_serde_uses_decimal_strings() {
        let value = m("1234.5");
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, "\"1234.5000\"");

        let back: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);

        let from_int: Money = serde_json::from_str("42").unwrap();
        assert_eq!(from_int, m("42"));

        // Binary floats are not accepted
        assert!(serde_json::from_str::<Money>("0.1").is_err());
    }

    #[test]
    fn test_round_floor_ceil() {
        assert_eq!(m("2.345").round_to(2), m("2.34"));
        assert_eq!(m("2.355").round_to(2), m("2.36"));
        assert_eq!(m("-2.5").round_to(0), m("-2"));
        assert_eq!(m("-2.5").floor(), m("-3"));
        assert_eq!(m("-2.5").ceil(), m("-2"));
    }

    #[test]
    fn test_integer_helpers() {
        assert_eq!(m("12").to_i64_exact(), Some(12));
        assert_eq!(m("12.5").to_i64_exact(), None);
        assert!(m("-0.0001").is_negative());
        assert!(!Money::ZERO.is_negative());
        assert!(!Money::ZERO.is_positive());
    }
}
