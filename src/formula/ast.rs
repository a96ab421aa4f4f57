//! Abstract syntax tree over the closed formula grammar

use crate::money::Money;

use super::functions::{Constant, Function};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

/// Formula expression
///
/// `position` fields are byte offsets into the source text, used to point
/// runtime errors at the failing operator or name.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Money),
    Constant(Constant),
    Variable {
        name: String,
        position: usize,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        position: usize,
    },
    /// `first op operand op operand ...`; true when every adjacent pair
    /// holds, so `1 < a < 3` means `1 < a and a < 3`
    Compare {
        first: Box<Expr>,
        rest: Vec<(CompareOp, Expr)>,
    },
    /// `then if condition else otherwise`
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
        position: usize,
    },
}

impl Expr {
    /// Names of all variables referenced anywhere in the expression
    pub fn collect_variables<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Literal(_) | Expr::Constant(_) => {}
            Expr::Variable { name, .. } => out.push(name),
            Expr::Unary { operand, .. } => operand.collect_variables(out),
            Expr::Binary { left, right, .. } => {
                left.collect_variables(out);
                right.collect_variables(out);
            }
            Expr::Compare { first, rest } => {
                first.collect_variables(out);
                for (_, operand) in rest {
                    operand.collect_variables(out);
                }
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                condition.collect_variables(out);
                then.collect_variables(out);
                otherwise.collect_variables(out);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_variables(out);
                }
            }
        }
    }
}
