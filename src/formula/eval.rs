//! Tree-walking evaluator with a step budget

use crate::error::{FormulaError, ValueError};
use crate::money::Money;

use super::ast::{BinaryOp, CompareOp, Expr, UnaryOp};
use super::Binding;

/// Intermediate value; comparisons produce booleans that may only feed a
/// conditional
#[derive(Debug, Clone, Copy, PartialEq)]
enum Value {
    Number(Money),
    Bool(bool),
}

pub(crate) struct Evaluator<'a> {
    formula: &'a str,
    binding: &'a Binding,
    steps: u64,
    budget: u64,
}

impl<'a> Evaluator<'a> {
    /// Evaluate `expr` against `binding`, counting one step per node visited
    pub(crate) fn run(
        formula: &'a str,
        expr: &Expr,
        binding: &'a Binding,
        budget: u64,
    ) -> Result<Money, FormulaError> {
        let mut evaluator = Evaluator {
            formula,
            binding,
            steps: 0,
            budget,
        };
        match evaluator.eval(expr)? {
            Value::Number(value) => Ok(value),
            Value::Bool(_) => Err(FormulaError::runtime(
                formula,
                None,
                "formula must produce an amount, not a comparison result",
            )),
        }
    }

    fn tick(&mut self) -> Result<(), FormulaError> {
        self.steps += 1;
        if self.steps > self.budget {
            return Err(FormulaError::Timeout {
                formula: self.formula.to_string(),
                budget: self.budget,
            });
        }
        Ok(())
    }

    fn fail(&self, position: Option<usize>, err: ValueError) -> FormulaError {
        FormulaError::runtime(self.formula, position, err.to_string())
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, FormulaError> {
        self.tick()?;

        match expr {
            Expr::Literal(value) => Ok(Value::Number(*value)),
            Expr::Constant(constant) => Ok(Value::Number(constant.value())),
            Expr::Variable { name, position } => self
                .binding
                .get(name)
                .copied()
                .map(Value::Number)
                .ok_or_else(|| {
                    FormulaError::runtime(
                        self.formula,
                        Some(*position),
                        format!("variable '{}' not defined for this component", name),
                    )
                }),
            Expr::Unary { op, operand } => {
                let value = self.number(operand)?;
                Ok(Value::Number(match op {
                    UnaryOp::Plus => value,
                    UnaryOp::Neg => -value,
                }))
            }
            Expr::Binary {
                op,
                left,
                right,
                position,
            } => {
                let lhs = self.number(left)?;
                let rhs = self.number(right)?;
                let result = match op {
                    BinaryOp::Add => lhs.checked_add(rhs),
                    BinaryOp::Sub => lhs.checked_sub(rhs),
                    BinaryOp::Mul => lhs.checked_mul(rhs),
                    BinaryOp::Div => lhs.checked_div(rhs),
                    BinaryOp::Rem => lhs.checked_rem(rhs),
                    BinaryOp::Pow => lhs.checked_pow(rhs),
                };
                result
                    .map(Value::Number)
                    .map_err(|e| self.fail(Some(*position), e))
            }
            Expr::Compare { first, rest } => {
                // Stops at the first failing pair; later operands are not evaluated
                let mut lhs = self.number(first)?;
                for (op, operand) in rest {
                    let rhs = self.number(operand)?;
                    if !compare(*op, lhs, rhs) {
                        return Ok(Value::Bool(false));
                    }
                    lhs = rhs;
                }
                Ok(Value::Bool(true))
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                let truthy = match self.eval(condition)? {
                    Value::Bool(b) => b,
                    Value::Number(n) => !n.is_zero(),
                };
                // Only the selected branch is evaluated
                if truthy {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Call {
                function,
                args,
                position,
            } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.number(arg)?);
                }
                function
                    .apply(&values)
                    .map(Value::Number)
                    .map_err(|e| self.fail(Some(*position), e))
            }
        }
    }

    fn number(&mut self, expr: &Expr) -> Result<Money, FormulaError> {
        match self.eval(expr)? {
            Value::Number(value) => Ok(value),
            Value::Bool(_) => Err(FormulaError::runtime(
                self.formula,
                None,
                "a comparison result cannot be used as an amount",
            )),
        }
    }
}

fn compare(op: CompareOp, lhs: Money, rhs: Money) -> bool {
    match op {
        CompareOp::Lt => lhs < rhs,
        CompareOp::Le => lhs <= rhs,
        CompareOp::Gt => lhs > rhs,
        CompareOp::Ge => lhs >= rhs,
        CompareOp::Eq => lhs == rhs,
        CompareOp::Ne => lhs != rhs,
    }
}
