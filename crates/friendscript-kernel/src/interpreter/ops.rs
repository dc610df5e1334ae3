//! Arithmetic, comparison and compound-assignment rules for script values.

use std::cmp::Ordering;

use friendscript_types::Value;

use crate::ast::{AssignOp, BinaryOp, Comparator};
use crate::error::EvalError;

/// Apply an arithmetic operator.
///
/// `+` also concatenates strings, arrays and objects. `null` acts as the
/// identity for `+` and as zero elsewhere. Integer overflow is an error.
pub fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    if op == BinaryOp::Add {
        if let Some(joined) = join(left, right) {
            return Ok(joined);
        }
    }

    let left = numeric_operand(op, left)?;
    let right = numeric_operand(op, right)?;

    match (left, right) {
        (Value::Int(a), Value::Int(b)) => int_arithmetic(op, a, b),
        (a, b) => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            float_arithmetic(op, a, b)
        }
    }
}

/// Non-numeric `+`: string concatenation and collection joining.
fn join(left: &Value, right: &Value) -> Option<Value> {
    match (left, right) {
        (Value::Null, other) | (other, Value::Null) if !other.is_null() => Some(other.clone()),
        (Value::String(a), b) => Some(Value::String(format!("{a}{}", b.as_text()))),
        (a, Value::String(b)) if !matches!(a, Value::Array(_) | Value::Object(_)) => {
            Some(Value::String(format!("{}{b}", a.as_text())))
        }
        (Value::Array(a), Value::Array(b)) => {
            Some(Value::Array(a.iter().chain(b.iter()).cloned().collect()))
        }
        (Value::Array(a), item) => {
            let mut items = a.clone();
            items.push(item.clone());
            Some(Value::Array(items))
        }
        (Value::Object(a), Value::Object(b)) => {
            let mut merged = a.clone();
            merged.extend(b.iter().map(|(k, v)| (k.clone(), v.clone())));
            Some(Value::Object(merged))
        }
        _ => None,
    }
}

fn numeric_operand(op: BinaryOp, value: &Value) -> Result<Value, EvalError> {
    match value {
        Value::Int(_) | Value::Float(_) => Ok(value.clone()),
        Value::Null => Ok(Value::Int(0)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        other => Err(EvalError::Type(format!(
            "cannot apply '{op}' to {}",
            other.type_name()
        ))),
    }
}

fn int_arithmetic(op: BinaryOp, a: i64, b: i64) -> Result<Value, EvalError> {
    let overflow = || EvalError::Arithmetic(format!("integer overflow in {a} {op} {b}"));
    match op {
        BinaryOp::Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
        BinaryOp::Subtract => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
        BinaryOp::Multiply => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
        BinaryOp::Divide => {
            if b == 0 {
                return Err(EvalError::Arithmetic("division by zero".into()));
            }
            match a.checked_rem(b) {
                Some(0) => a.checked_div(b).map(Value::Int).ok_or_else(overflow),
                Some(_) => Ok(Value::Float(a as f64 / b as f64)),
                None => Err(overflow()),
            }
        }
        BinaryOp::Modulo => {
            if b == 0 {
                return Err(EvalError::Arithmetic("modulo by zero".into()));
            }
            a.checked_rem(b).map(Value::Int).ok_or_else(overflow)
        }
    }
}

fn float_arithmetic(op: BinaryOp, a: f64, b: f64) -> Result<Value, EvalError> {
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Subtract => a - b,
        BinaryOp::Multiply => a * b,
        BinaryOp::Divide => {
            if b == 0.0 {
                return Err(EvalError::Arithmetic("division by zero".into()));
            }
            a / b
        }
        BinaryOp::Modulo => {
            if b == 0.0 {
                return Err(EvalError::Arithmetic("modulo by zero".into()));
            }
            a % b
        }
    };
    Ok(Value::Float(result))
}

/// Combine the current value of an assignment target with a new value.
pub fn assign(op: AssignOp, current: Option<Value>, new: Value) -> Result<Value, EvalError> {
    let current = current.unwrap_or_default();
    match op {
        AssignOp::Assign => Ok(new),
        AssignOp::Add => arithmetic(BinaryOp::Add, &current, &new),
        AssignOp::Subtract => arithmetic(BinaryOp::Subtract, &current, &new),
        AssignOp::Multiply => arithmetic(BinaryOp::Multiply, &current, &new),
        AssignOp::Divide => arithmetic(BinaryOp::Divide, &current, &new),
        AssignOp::Append => Ok(match current {
            Value::Null => Value::Array(vec![new]),
            Value::Array(mut items) => {
                items.push(new);
                Value::Array(items)
            }
            other => Value::Array(vec![other, new]),
        }),
    }
}

/// Equality with numeric widening: `1 == 1.0`.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}

/// Evaluate `left <comparator> right`.
pub fn compare(comparator: Comparator, left: &Value, right: &Value) -> Result<bool, EvalError> {
    match comparator {
        Comparator::Eq => Ok(values_equal(left, right)),
        Comparator::NotEq => Ok(!values_equal(left, right)),
        Comparator::In => contains(right, left),
        Comparator::NotIn => contains(right, left).map(|found| !found),
        Comparator::Gt | Comparator::GtEq | Comparator::Lt | Comparator::LtEq => {
            let Some(ordering) = order(left, right)? else {
                return Ok(false);
            };
            Ok(match comparator {
                Comparator::Gt => ordering == Ordering::Greater,
                Comparator::GtEq => ordering != Ordering::Less,
                Comparator::Lt => ordering == Ordering::Less,
                _ => ordering != Ordering::Greater,
            })
        }
    }
}

/// Ordering for `<`-style comparisons. `None` means "never true" (null or NaN).
fn order(left: &Value, right: &Value) -> Result<Option<Ordering>, EvalError> {
    let mismatch = || {
        EvalError::Type(format!(
            "cannot order {} against {}",
            left.type_name(),
            right.type_name()
        ))
    };
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(None),
        (Value::String(a), Value::String(b)) => Ok(Some(a.cmp(b))),
        (Value::String(s), number) | (number, Value::String(s)) if number.as_f64().is_some() => {
            let parsed: f64 = s.trim().parse().map_err(|_| mismatch())?;
            let n = number.as_f64().unwrap_or_default();
            if matches!(left, Value::String(_)) {
                Ok(parsed.partial_cmp(&n))
            } else {
                Ok(n.partial_cmp(&parsed))
            }
        }
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Ok(a.partial_cmp(&b)),
            _ => Err(mismatch()),
        },
    }
}

/// Membership: array element, object key, or substring.
fn contains(haystack: &Value, needle: &Value) -> Result<bool, EvalError> {
    match haystack {
        Value::Array(items) => Ok(items.iter().any(|item| values_equal(item, needle))),
        Value::Object(map) => Ok(map.contains_key(&needle.as_text())),
        Value::String(s) => Ok(s.contains(&needle.as_text())),
        Value::Null => Ok(false),
        other => Err(EvalError::Type(format!(
            "cannot test membership in {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(BinaryOp::Add, Value::Int(2), Value::Int(3), Value::Int(5))]
    #[case(BinaryOp::Subtract, Value::Int(2), Value::Int(3), Value::Int(-1))]
    #[case(BinaryOp::Multiply, Value::Float(1.5), Value::Int(2), Value::Float(3.0))]
    #[case(BinaryOp::Divide, Value::Int(6), Value::Int(3), Value::Int(2))]
    #[case(BinaryOp::Divide, Value::Int(7), Value::Int(2), Value::Float(3.5))]
    #[case(BinaryOp::Modulo, Value::Int(7), Value::Int(4), Value::Int(3))]
    #[case(BinaryOp::Add, Value::from("a"), Value::Int(1), Value::from("a1"))]
    #[case(BinaryOp::Add, Value::Int(1), Value::from("a"), Value::from("1a"))]
    #[case(BinaryOp::Add, Value::Null, Value::Int(4), Value::Int(4))]
    #[case(BinaryOp::Subtract, Value::Null, Value::Int(4), Value::Int(-4))]
    fn arithmetic_cases(#[case] op: BinaryOp, #[case] a: Value, #[case] b: Value, #[case] expected: Value) {
        assert_eq!(arithmetic(op, &a, &b).expect("arithmetic"), expected);
    }

    #[test]
    fn collections_join_with_plus() {
        let joined = arithmetic(
            BinaryOp::Add,
            &Value::Array(vec![Value::Int(1)]),
            &Value::Array(vec![Value::Int(2)]),
        )
        .expect("join");
        assert_eq!(joined, Value::Array(vec![Value::Int(1), Value::Int(2)]));
    }

    #[rstest]
    #[case::divide(BinaryOp::Divide)]
    #[case::modulo(BinaryOp::Modulo)]
    fn min_by_minus_one_overflows(#[case] op: BinaryOp) {
        assert!(matches!(
            arithmetic(op, &Value::Int(i64::MIN), &Value::Int(-1)),
            Err(EvalError::Arithmetic(_))
        ));
    }

    #[test]
    fn arithmetic_errors() {
        assert!(matches!(
            arithmetic(BinaryOp::Divide, &Value::Int(1), &Value::Int(0)),
            Err(EvalError::Arithmetic(_))
        ));
        assert!(matches!(
            arithmetic(BinaryOp::Add, &Value::Int(i64::MAX), &Value::Int(1)),
            Err(EvalError::Arithmetic(_))
        ));
        assert!(matches!(
            arithmetic(BinaryOp::Multiply, &Value::from("a"), &Value::Int(2)),
            Err(EvalError::Type(_))
        ));
    }

    #[test]
    fn append_builds_arrays() {
        assert_eq!(
            assign(AssignOp::Append, None, Value::Int(1)).expect("append"),
            Value::Array(vec![Value::Int(1)])
        );
        assert_eq!(
            assign(AssignOp::Append, Some(Value::Array(vec![Value::Int(1)])), Value::Int(2)).expect("append"),
            Value::Array(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[rstest]
    #[case(Comparator::Eq, Value::Int(1), Value::Float(1.0), true)]
    #[case(Comparator::NotEq, Value::from("a"), Value::from("b"), true)]
    #[case(Comparator::Gt, Value::Int(3), Value::Int(2), true)]
    #[case(Comparator::LtEq, Value::Int(2), Value::Int(2), true)]
    #[case(Comparator::Lt, Value::from("apple"), Value::from("banana"), true)]
    #[case(Comparator::Gt, Value::Null, Value::Int(5), false)]
    #[case(Comparator::Lt, Value::Null, Value::Int(5), false)]
    #[case(Comparator::Gt, Value::from("10"), Value::Int(9), true)]
    #[case(Comparator::In, Value::Int(2), Value::Array(vec![Value::Int(1), Value::Int(2)]), true)]
    #[case(Comparator::In, Value::from("ell"), Value::from("hello"), true)]
    #[case(Comparator::NotIn, Value::from("z"), Value::from("hello"), true)]
    fn comparison_cases(#[case] op: Comparator, #[case] a: Value, #[case] b: Value, #[case] expected: bool) {
        assert_eq!(compare(op, &a, &b).expect("compare"), expected);
    }

    #[test]
    fn membership_in_objects_uses_keys() {
        let map = Value::from(serde_json::json!({"a": 1}));
        assert!(compare(Comparator::In, &Value::from("a"), &map).expect("compare"));
        assert!(!compare(Comparator::In, &Value::Int(1), &map).expect("compare"));
    }

    #[test]
    fn mismatched_ordering_is_a_type_error() {
        assert!(matches!(
            compare(Comparator::Gt, &Value::from("abc"), &Value::Int(1)),
            Err(EvalError::Type(_))
        ));
        assert!(matches!(
            compare(Comparator::Gt, &Value::Array(vec![]), &Value::Int(1)),
            Err(EvalError::Type(_))
        ));
    }
}
