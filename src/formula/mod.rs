//! Formula sandbox
//!
//! Formulas are arithmetic expressions over a component's declared variables
//! and the per-month time variables. Text is lexed and parsed into a closed
//! expression tree; anything outside the grammar (member access, subscripts,
//! assignment, string literals, calls to functions not on the allow-list) is
//! rejected before evaluation. Evaluation only reads the supplied binding.

mod ast;
mod eval;
mod functions;
mod lexer;
mod parser;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::FormulaError;
use crate::money::Money;

pub use ast::{BinaryOp, CompareOp, Expr, UnaryOp};
pub use functions::{Constant, Function, CONSTANT_NAMES, FUNCTION_NAMES};

use eval::Evaluator;
use parser::{BOOLEAN_WORDS, FORBIDDEN_NAMES};

/// Variable name to value mapping supplied to a single evaluation
pub type Binding = BTreeMap<String, Money>;

/// Variables the projection binds for every month, in addition to a
/// component's own variables
pub const TIME_VARIABLES: [&str; 6] = [
    "month",
    "months_since_start",
    "calendar_month",
    "year",
    "days_in_month",
    "occurrences",
];

/// Limits applied to every formula
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Longest accepted formula text, in bytes
    pub max_formula_length: usize,
    /// Deepest accepted expression nesting
    pub max_depth: usize,
    /// Maximum number of expression nodes visited by one evaluation
    pub step_budget: u64,
    /// Allow `sin`, `cos` and `tan`
    pub enable_trig: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_formula_length: 1000,
            max_depth: 64,
            step_budget: 10_000,
            enable_trig: false,
        }
    }
}

/// Whether `name` is taken by the formula language or the time variables
/// and so cannot be declared as a component variable
pub fn is_reserved_name(name: &str) -> bool {
    name.starts_with("__")
        || name == "if"
        || name == "else"
        || TIME_VARIABLES.contains(&name)
        || FUNCTION_NAMES.contains(&name)
        || CONSTANT_NAMES.contains(&name)
        || FORBIDDEN_NAMES.contains(&name)
        || BOOLEAN_WORDS.contains(&name)
}

/// Whether `name` is usable as a variable identifier at all
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A formula that passed validation, ready to evaluate many times
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFormula {
    source: String,
    expr: Expr,
    variables: BTreeSet<String>,
    step_budget: u64,
}

impl CompiledFormula {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Variables the formula actually references
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(String::as_str)
    }

    /// Evaluate against `binding`
    ///
    /// Every referenced variable must be present in the binding; a missing
    /// one is a runtime error rather than an implicit zero.
    pub fn evaluate(&self, binding: &Binding) -> Result<Money, FormulaError> {
        if let Some(missing) = self.variables.iter().find(|v| !binding.contains_key(*v)) {
            return Err(FormulaError::runtime(
                &self.source,
                None,
                format!("unbound variable '{}'", missing),
            ));
        }
        Evaluator::run(&self.source, &self.expr, binding, self.step_budget)
    }
}

/// Outcome of one case passed to [`FormulaSandbox::test_formula`]
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaTestResult {
    /// 1-based index of the case
    pub case: usize,
    pub result: Result<Money, FormulaError>,
}

#[derive(Debug, Clone, Default)]
pub struct FormulaSandbox {
    config: SandboxConfig,
}

impl FormulaSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Check a formula against the declared variable names without
    /// evaluating it
    pub fn validate<I, S>(&self, formula: &str, declared: I) -> Result<(), FormulaError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.compile(formula, declared).map(|_| ())
    }

    /// Parse and validate a formula for repeated evaluation
    pub fn compile<I, S>(&self, formula: &str, declared: I) -> Result<CompiledFormula, FormulaError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let declared: BTreeSet<String> = declared
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect();
        let expr = parser::parse(formula, &declared, &self.config)?;

        let mut referenced = Vec::new();
        expr.collect_variables(&mut referenced);
        let variables = referenced.into_iter().map(str::to_string).collect();

        Ok(CompiledFormula {
            source: formula.to_string(),
            expr,
            variables,
            step_budget: self.config.step_budget,
        })
    }

    /// One-shot evaluation; the binding's keys are the declared names
    pub fn evaluate(&self, formula: &str, binding: &Binding) -> Result<Money, FormulaError> {
        self.compile(formula, binding.keys())?.evaluate(binding)
    }

    /// Evaluate a formula against several sample bindings
    ///
    /// Each case is independent; one failing case does not stop the rest.
    pub fn test_formula(&self, formula: &str, cases: &[Binding]) -> Vec<FormulaTestResult> {
        cases
            .iter()
            .enumerate()
            .map(|(i, binding)| FormulaTestResult {
                case: i + 1,
                result: self.evaluate(formula, binding),
            })
            .collect()
    }
}
