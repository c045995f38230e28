//! Operator semantics, shared by constant folding at link time and by term
//! evaluation at run time so that a folded constant always equals what the
//! unfolded code would have computed.

use crate::bytecode::op::{BinaryOp, UnaryOp};
use crate::lang::value::Value;
use crate::runtime::runtime_error::{RuntimeError, division_by_zero, type_error};

pub fn unary(op: UnaryOp, value: &Value) -> Result<Value, RuntimeError> {
    match (op, value) {
        (UnaryOp::Neg, Value::Integer(n)) => Ok(Value::Integer(n.wrapping_neg())),
        (UnaryOp::Neg, Value::Float(n)) => Ok(Value::Float(-n)),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::BitNot, Value::Integer(n)) => Ok(Value::Integer(!n)),
        (op, other) => Err(type_error(op.symbol(), other.type_name())),
    }
}

pub fn binary(op: BinaryOp, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    use BinaryOp::*;

    // String concatenation wins over numeric addition.
    if op == Add {
        if let (Value::String(_), _) | (_, Value::String(_)) = (a, b) {
            return Ok(Value::String(format!("{}{}", a, b)));
        }
    }

    match op {
        Add | Sub | Mul | Div | Mod => arithmetic(op, a, b),
        Eq => Ok(Value::Bool(equals(a, b))),
        Ne => Ok(Value::Bool(!equals(a, b))),
        Lt | Gt | Le | Ge => compare(op, a, b),
        And | Or | Xor => logic(op, a, b),
        BitAnd | BitOr | Shl | Shr => bits(op, a, b),
    }
}

fn arithmetic(op: BinaryOp, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    use BinaryOp::*;

    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => {
            let (x, y) = (*x, *y);
            let result = match op {
                Add => x.wrapping_add(y),
                Sub => x.wrapping_sub(y),
                Mul => x.wrapping_mul(y),
                Div => {
                    if y == 0 {
                        return Err(division_by_zero());
                    }
                    x.wrapping_div(y)
                }
                Mod => {
                    if y == 0 {
                        return Err(division_by_zero());
                    }
                    x.wrapping_rem(y)
                }
                _ => unreachable!("arithmetic called with {:?}", op),
            };
            Ok(Value::Integer(result))
        }
        _ => {
            let (x, y) = numeric_pair(op, a, b)?;
            let result = match op {
                Add => x + y,
                Sub => x - y,
                Mul => x * y,
                Div => x / y,
                Mod => x % y,
                _ => unreachable!("arithmetic called with {:?}", op),
            };
            Ok(Value::Float(result))
        }
    }
}

fn compare(op: BinaryOp, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let ordering = match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => x.partial_cmp(y),
        (Value::String(x), Value::String(y)) => x.partial_cmp(y),
        _ => {
            let (x, y) = numeric_pair(op, a, b)?;
            x.partial_cmp(&y)
        }
    };

    // NaN compares false with everything.
    let Some(ordering) = ordering else {
        return Ok(Value::Bool(false));
    };

    let result = match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Gt => ordering.is_gt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Ge => ordering.is_ge(),
        _ => unreachable!("compare called with {:?}", op),
    };
    Ok(Value::Bool(result))
}

fn logic(op: BinaryOp, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => Ok(Value::Bool(match op {
            BinaryOp::And => *x && *y,
            BinaryOp::Or => *x || *y,
            _ => x ^ y,
        })),
        (Value::Integer(x), Value::Integer(y)) if op == BinaryOp::Xor => Ok(Value::Integer(x ^ y)),
        _ => Err(mismatch(op, a, b)),
    }
}

fn bits(op: BinaryOp, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Ok(Value::Integer(match op {
            BinaryOp::BitAnd => x & y,
            BinaryOp::BitOr => x | y,
            BinaryOp::Shl => x.wrapping_shl((*y & 63) as u32),
            _ => x.wrapping_shr((*y & 63) as u32),
        })),
        (Value::Bool(x), Value::Bool(y)) if matches!(op, BinaryOp::BitAnd | BinaryOp::BitOr) => {
            Ok(Value::Bool(if op == BinaryOp::BitAnd { *x & *y } else { *x | *y }))
        }
        _ => Err(mismatch(op, a, b)),
    }
}

fn equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Integer(x), Value::Float(y)) | (Value::Float(y), Value::Integer(x)) => {
            *x as f64 == *y
        }
        _ => a == b,
    }
}

fn numeric_pair(op: BinaryOp, a: &Value, b: &Value) -> Result<(f64, f64), RuntimeError> {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(mismatch(op, a, b)),
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(n) => Some(*n as f64),
        Value::Float(n) => Some(*n),
        _ => None,
    }
}

fn mismatch(op: BinaryOp, a: &Value, b: &Value) -> RuntimeError {
    type_error(
        op.symbol(),
        &format!("{} and {}", a.type_name(), b.type_name()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(n: i64) -> Value {
        Value::Integer(n)
    }

    #[test]
    fn test_integer_division_truncates() {
        assert_eq!(binary(BinaryOp::Div, &int(7), &int(2)), Ok(int(3)));
        assert_eq!(binary(BinaryOp::Div, &int(-7), &int(2)), Ok(int(-3)));
    }

    #[test]
    fn test_integer_division_by_zero() {
        let err = binary(BinaryOp::Div, &int(1), &int(0)).unwrap_err();
        assert_eq!(err.exception, "ArithmeticException");
        assert!(binary(BinaryOp::Mod, &int(1), &int(0)).is_err());
    }

    #[test]
    fn test_float_division_by_zero_is_infinite() {
        let result = binary(BinaryOp::Div, &Value::Float(1.0), &int(0)).unwrap();
        assert_eq!(result, Value::Float(f64::INFINITY));
    }

    #[test]
    fn test_overflow_wraps() {
        assert_eq!(
            binary(BinaryOp::Add, &int(i64::MAX), &int(1)),
            Ok(int(i64::MIN))
        );
    }

    #[test]
    fn test_string_concat() {
        let result = binary(BinaryOp::Add, &Value::from("n = "), &int(4)).unwrap();
        assert_eq!(result, Value::from("n = 4"));
    }

    #[test]
    fn test_mixed_comparison() {
        assert_eq!(
            binary(BinaryOp::Lt, &int(1), &Value::Float(1.5)),
            Ok(Value::Bool(true))
        );
        assert_eq!(binary(BinaryOp::Eq, &int(2), &Value::Float(2.0)), Ok(Value::Bool(true)));
    }

    #[test]
    fn test_type_mismatch() {
        let err = binary(BinaryOp::Sub, &Value::Bool(true), &int(1)).unwrap_err();
        assert_eq!(err.exception, "ClassCastException");
        assert!(unary(UnaryOp::Not, &int(1)).is_err());
    }

    #[test]
    fn test_unary() {
        assert_eq!(unary(UnaryOp::Neg, &int(5)), Ok(int(-5)));
        assert_eq!(unary(UnaryOp::Not, &Value::Bool(false)), Ok(Value::Bool(true)));
        assert_eq!(unary(UnaryOp::BitNot, &int(0)), Ok(int(-1)));
    }
}
