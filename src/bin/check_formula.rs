//! Validate and evaluate a single formula in the sandbox
//!
//! Example:
//!   check_formula "base_salary * (1 + raise_pct / 100)" --var base_salary=5000 --var raise_pct=3

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use household_projection::formula::{Binding, FormulaSandbox, SandboxConfig};
use household_projection::Money;

#[derive(Parser)]
#[command(name = "check_formula", version, about = "Validate and evaluate a component formula")]
struct Cli {
    /// Formula text
    formula: String,

    /// Variable binding as name=value; repeatable
    #[arg(short, long = "var", value_parser = parse_binding)]
    vars: Vec<(String, Money)>,

    /// Allow sin, cos and tan
    #[arg(long)]
    enable_trig: bool,

    /// Evaluation step budget
    #[arg(long)]
    step_budget: Option<u64>,
}

fn parse_binding(arg: &str) -> Result<(String, Money)> {
    let (name, value) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("expected name=value, got '{}'", arg))?;
    let value = Money::parse(value.trim()).with_context(|| format!("value for '{}'", name))?;
    Ok((name.trim().to_string(), value))
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = SandboxConfig {
        enable_trig: cli.enable_trig,
        ..Default::default()
    };
    if let Some(budget) = cli.step_budget {
        config.step_budget = budget;
    }
    let sandbox = FormulaSandbox::new(config);
    let binding: Binding = cli.vars.into_iter().collect();

    let compiled = match sandbox.compile(&cli.formula, binding.keys()) {
        Ok(compiled) => compiled,
        Err(err) => {
            eprintln!("Rejected: {}", err.hint());
            if let Some(pos) = err.position() {
                eprintln!("  {}", cli.formula);
                eprintln!("  {}^", " ".repeat(pos));
            }
            return Err(err.into());
        }
    };

    let used: Vec<&str> = compiled.variables().collect();
    println!("Formula OK");
    println!("  Variables used: {}", if used.is_empty() { "-".to_string() } else { used.join(", ") });

    let value = compiled.evaluate(&binding)?;
    println!("  Result: {}", value);
    Ok(())
}
