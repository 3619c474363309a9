//! Precondition predicates attached to transition rules.
//!
//! Business rules such as "a refund cannot exceed the original payment" are
//! written as predicate trees over the entity payload and evaluated by the
//! validator. Numeric comparisons use `rust_decimal::Decimal`, never f64.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::payload::{is_present, Payload};

/// A boolean expression over payload fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Predicate {
    /// The field exists and is non-empty.
    Present { field: String },
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    And { all: Vec<Predicate> },
    Or { any: Vec<Predicate> },
    Not { predicate: Box<Predicate> },
}

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operand {
    Field(String),
    Value(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

/// Errors raised while evaluating a predicate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PredicateError {
    #[error("cannot compare {left} with {right} using '{op}'")]
    TypeMismatch {
        left: String,
        op: CompareOp,
        right: String,
    },
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Field(name) => f.write_str(name),
            Operand::Value(v) => write!(f, "{}", v),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Present { field } => write!(f, "present({})", field),
            Predicate::Compare { left, op, right } => write!(f, "{} {} {}", left, op, right),
            Predicate::And { all } => write_joined(f, all, " and "),
            Predicate::Or { any } => write_joined(f, any, " or "),
            Predicate::Not { predicate } => write!(f, "not ({})", predicate),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, preds: &[Predicate], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, p) in preds.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{}", p)?;
    }
    f.write_str(")")
}

impl Predicate {
    /// Field names referenced anywhere in the tree.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Predicate::Present { field } => out.push(field.as_str()),
            Predicate::Compare { left, right, .. } => {
                for side in [left, right] {
                    if let Operand::Field(name) = side {
                        out.push(name.as_str());
                    }
                }
            }
            Predicate::And { all: preds } | Predicate::Or { any: preds } => {
                for p in preds {
                    p.collect_fields(out);
                }
            }
            Predicate::Not { predicate } => predicate.collect_fields(out),
        }
    }
}

/// Evaluate a predicate against an entity payload.
pub fn eval_predicate(pred: &Predicate, payload: &Payload) -> Result<bool, PredicateError> {
    match pred {
        Predicate::Present { field } => Ok(is_present(payload.get(field))),
        Predicate::Compare { left, op, right } => {
            let l = resolve(left, payload);
            let r = resolve(right, payload);
            compare_values(&l, *op, &r)
        }
        Predicate::And { all } => {
            for p in all {
                if !eval_predicate(p, payload)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Predicate::Or { any } => {
            for p in any {
                if eval_predicate(p, payload)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Predicate::Not { predicate } => Ok(!eval_predicate(predicate, payload)?),
    }
}

fn resolve(operand: &Operand, payload: &Payload) -> Value {
    match operand {
        Operand::Field(name) => payload.get(name).cloned().unwrap_or(Value::Null),
        Operand::Value(v) => v.clone(),
    }
}

/// Numbers and numeric strings compare as decimals.
fn as_decimal(v: &Value) -> Option<Decimal> {
    let s = match v {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&s)
        .or_else(|_| Decimal::from_scientific(&s))
        .ok()
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "record",
    }
}

fn apply(ord: Ordering, op: CompareOp) -> bool {
    match op {
        CompareOp::Eq => ord == Ordering::Equal,
        CompareOp::Ne => ord != Ordering::Equal,
        CompareOp::Lt => ord == Ordering::Less,
        CompareOp::Le => ord != Ordering::Greater,
        CompareOp::Gt => ord == Ordering::Greater,
        CompareOp::Ge => ord != Ordering::Less,
    }
}

/// Compare two JSON values.
///
/// A missing (null) operand makes every ordering comparison false; equality
/// against null is only true when both sides are null.
pub fn compare_values(left: &Value, op: CompareOp, right: &Value) -> Result<bool, PredicateError> {
    if left.is_null() || right.is_null() {
        return Ok(match op {
            CompareOp::Eq => left.is_null() && right.is_null(),
            CompareOp::Ne => !(left.is_null() && right.is_null()),
            _ => false,
        });
    }
    if let (Some(l), Some(r)) = (as_decimal(left), as_decimal(right)) {
        return Ok(apply(l.cmp(&r), op));
    }
    match (left, right) {
        (Value::String(l), Value::String(r)) => Ok(apply(l.cmp(r), op)),
        (Value::Bool(l), Value::Bool(r)) if matches!(op, CompareOp::Eq | CompareOp::Ne) => {
            Ok(apply(l.cmp(r), op))
        }
        _ => Err(PredicateError::TypeMismatch {
            left: type_name(left).to_string(),
            op,
            right: type_name(right).to_string(),
        }),
    }
}
