//! Calculator operations.
//!
//! Every successful evaluation yields an [`Evaluation`] carrying the
//! display expression and result; failures never produce history entries.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Largest factorial argument accepted.
pub const MAX_FACTORIAL: u32 = 20;

/// Why an evaluation was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalcError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("invalid number")]
    InvalidNumber,

    #[error("cannot take the square root of a negative number")]
    NegativeSquareRoot,

    #[error("factorial requires a whole number between 0 and 20")]
    FactorialOutOfRange,

    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    #[error("result is not a finite number")]
    NotFinite,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Modulo,
}

impl Operation {
    /// Symbol shown in history expressions.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "×",
            Self::Divide => "÷",
            Self::Power => "^",
            Self::Modulo => "%",
        }
    }
}

impl FromStr for Operation {
    type Err = CalcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "+" => Ok(Self::Add),
            "-" => Ok(Self::Subtract),
            "*" | "x" | "×" => Ok(Self::Multiply),
            "/" | "÷" => Ok(Self::Divide),
            "^" | "**" => Ok(Self::Power),
            "%" => Ok(Self::Modulo),
            other => Err(CalcError::UnknownOperator(other.to_string())),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A successful evaluation, ready to be recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub expression: String,
    pub result: f64,
}

fn finite(value: f64) -> Result<f64, CalcError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CalcError::InvalidNumber)
    }
}

fn checked(expression: String, result: f64) -> Result<Evaluation, CalcError> {
    if result.is_finite() {
        Ok(Evaluation { expression, result })
    } else {
        Err(CalcError::NotFinite)
    }
}

/// Evaluates `a op b`.
///
/// # Errors
///
/// Rejects non-finite operands, division or modulo by zero, and
/// non-finite results.
pub fn evaluate(a: f64, op: Operation, b: f64) -> Result<Evaluation, CalcError> {
    let (a, b) = (finite(a)?, finite(b)?);
    let result = match op {
        Operation::Add => a + b,
        Operation::Subtract => a - b,
        Operation::Multiply => a * b,
        Operation::Divide if b == 0.0 => return Err(CalcError::DivisionByZero),
        Operation::Divide => a / b,
        Operation::Power => a.powf(b),
        Operation::Modulo if b == 0.0 => return Err(CalcError::DivisionByZero),
        Operation::Modulo => a % b,
    };
    checked(format!("{a} {op} {b}"), result)
}

/// Evaluates `√a`.
///
/// # Errors
///
/// Rejects negative and non-finite input.
pub fn square_root(a: f64) -> Result<Evaluation, CalcError> {
    let a = finite(a)?;
    if a < 0.0 {
        return Err(CalcError::NegativeSquareRoot);
    }
    checked(format!("√{a}"), a.sqrt())
}

/// Evaluates `n!` for `0 <= n <= 20`.
///
/// # Errors
///
/// Rejects arguments outside the supported range.
#[allow(clippy::cast_precision_loss)]
pub fn factorial(n: i64) -> Result<Evaluation, CalcError> {
    let n = u32::try_from(n)
        .ok()
        .filter(|n| *n <= MAX_FACTORIAL)
        .ok_or(CalcError::FactorialOutOfRange)?;
    let product: u64 = (1..=u64::from(n)).product();
    checked(format!("{n}!"), product as f64)
}
