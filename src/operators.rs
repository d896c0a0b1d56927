use std::rc::Rc;

use crate::errors::RuntimeError;
use crate::expression::{BinOp, UnaryOp};
use crate::value::{Value, MAX_SEQUENCE_LEN};

#[derive(Clone, Copy)]
enum Num {
    I(i64),
    F(f64),
}

fn num(v: &Value) -> Option<Num> {
    match v {
        Value::Int(i) => Some(Num::I(*i)),
        Value::Bool(b) => Some(Num::I(*b as i64)),
        Value::Float(f) => Some(Num::F(*f)),
        _ => None,
    }
}

fn symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::FloorDiv => "//",
        BinOp::Mod => "%",
        BinOp::Pow => "**",
    }
}

fn unsupported(op: BinOp, a: &Value, b: &Value) -> RuntimeError {
    RuntimeError::Type(format!(
        "unsupported operand types for {}: '{}' and '{}'",
        symbol(op),
        a.type_name(),
        b.type_name()
    ))
}

pub fn unary_op(op: UnaryOp, v: &Value) -> Result<Value, RuntimeError> {
    match (op, num(v)) {
        (UnaryOp::Neg, Some(Num::I(i))) => i.checked_neg().map(Value::Int).ok_or(RuntimeError::Overflow),
        (UnaryOp::Neg, Some(Num::F(f))) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Some(Num::I(i))) => Ok(Value::Int(i)),
        (UnaryOp::Pos, Some(Num::F(f))) => Ok(Value::Float(f)),
        (_, None) => Err(RuntimeError::Type(format!(
            "bad operand type for unary {}: '{}'",
            if op == UnaryOp::Neg { "-" } else { "+" },
            v.type_name()
        ))),
    }
}

pub fn binary_op(op: BinOp, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    if let (Some(x), Some(y)) = (num(a), num(b)) {
        return numeric(op, x, y);
    }
    match (op, a, b) {
        (BinOp::Add, Value::Str(x), Value::Str(y)) => {
            let mut s = String::with_capacity(x.len() + y.len());
            s.push_str(x);
            s.push_str(y);
            Ok(Value::str(s))
        }
        (BinOp::Add, Value::Bytes(x), Value::Bytes(y)) => Ok(Value::bytes([&x[..], &y[..]].concat())),
        (BinOp::Add, Value::List(x), Value::List(y)) => Ok(Value::list([&x[..], &y[..]].concat())),
        (BinOp::Add, Value::Tuple(x), Value::Tuple(y)) => Ok(Value::tuple([&x[..], &y[..]].concat())),
        (BinOp::Mul, seq, Value::Int(n)) | (BinOp::Mul, Value::Int(n), seq) => repeat(seq, *n)
            .ok_or_else(|| unsupported(op, a, b))?,
        _ => Err(unsupported(op, a, b)),
    }
}

fn repeat(seq: &Value, n: i64) -> Option<Result<Value, RuntimeError>> {
    let times = usize::try_from(n.max(0)).ok()?;
    let total = |len: usize| {
        len.checked_mul(times)
            .filter(|&total| total <= MAX_SEQUENCE_LEN)
            .ok_or(RuntimeError::Overflow)
    };
    let items = |v: &Rc<Vec<Value>>| total(v.len()).map(|n| v.iter().cloned().cycle().take(n).collect::<Vec<_>>());
    Some(match seq {
        Value::Str(s) => total(s.len()).map(|_| Value::str(s.repeat(times))),
        Value::Bytes(b) => total(b.len()).map(|_| Value::bytes(b.repeat(times))),
        Value::List(v) => items(v).map(Value::list),
        Value::Tuple(v) => items(v).map(Value::tuple),
        _ => return None,
    })
}

fn numeric(op: BinOp, x: Num, y: Num) -> Result<Value, RuntimeError> {
    match (x, y) {
        (Num::I(a), Num::I(b)) => int_op(op, a, b),
        (Num::I(a), Num::F(b)) => float_op(op, a as f64, b),
        (Num::F(a), Num::I(b)) => float_op(op, a, b as f64),
        (Num::F(a), Num::F(b)) => float_op(op, a, b),
    }
}

fn int_op(op: BinOp, a: i64, b: i64) -> Result<Value, RuntimeError> {
    let overflow = RuntimeError::Overflow;
    match op {
        BinOp::Add => a.checked_add(b).map(Value::Int).ok_or(overflow),
        BinOp::Sub => a.checked_sub(b).map(Value::Int).ok_or(overflow),
        BinOp::Mul => a.checked_mul(b).map(Value::Int).ok_or(overflow),
        BinOp::Div => float_op(op, a as f64, b as f64),
        BinOp::FloorDiv => {
            if b == 0 {
                return Err(RuntimeError::ZeroDivision);
            }
            let q = a.checked_div(b).ok_or(overflow)?;
            Ok(Value::Int(if a % b != 0 && ((a < 0) != (b < 0)) { q - 1 } else { q }))
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(RuntimeError::ZeroDivision);
            }
            let r = a.checked_rem(b).ok_or(overflow)?;
            Ok(Value::Int(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r }))
        }
        BinOp::Pow => match u32::try_from(b) {
            Ok(exp) => a.checked_pow(exp).map(Value::Int).ok_or(overflow),
            Err(_) if b < 0 => float_op(op, a as f64, b as f64),
            Err(_) => Err(overflow),
        },
    }
}

fn float_op(op: BinOp, a: f64, b: f64) -> Result<Value, RuntimeError> {
    let zero_check = || if b == 0.0 { Err(RuntimeError::ZeroDivision) } else { Ok(()) };
    Ok(Value::Float(match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            zero_check()?;
            a / b
        }
        BinOp::FloorDiv => {
            zero_check()?;
            (a / b).floor()
        }
        BinOp::Mod => {
            zero_check()?;
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) { r + b } else { r }
        }
        BinOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(RuntimeError::ZeroDivision);
            }
            a.powf(b)
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn op(o: BinOp, a: Value, b: Value) -> String {
        binary_op(o, &a, &b).map(|v| v.repr()).unwrap_or_else(|e| e.to_string())
    }

    #[test]
    fn floor_semantics() {
        assert_eq!(op(BinOp::FloorDiv, Value::Int(-7), Value::Int(2)), "-4");
        assert_eq!(op(BinOp::Mod, Value::Int(-7), Value::Int(2)), "1");
        assert_eq!(op(BinOp::Mod, Value::Int(7), Value::Int(-2)), "-1");
        assert_eq!(op(BinOp::Div, Value::Int(7), Value::Int(2)), "3.5");
    }

    #[test]
    fn powers() {
        assert_eq!(op(BinOp::Pow, Value::Int(10), Value::Int(4)), "10000");
        assert_eq!(op(BinOp::Pow, Value::Int(2), Value::Int(-1)), "0.5");
        assert_eq!(op(BinOp::Pow, Value::Int(10), Value::Int(40)), "integer overflow");
    }

    #[test]
    fn sequences() {
        assert_eq!(op(BinOp::Add, Value::str("foo "), Value::str("Yep")), "'foo Yep'");
        assert_eq!(op(BinOp::Mul, Value::str("ab"), Value::Int(3)), "'ababab'");
        assert_eq!(op(BinOp::Mul, Value::Int(2), Value::list(vec![Value::Int(1)])), "[1, 1]");
        assert_eq!(op(BinOp::Mul, Value::str("ab"), Value::Int(-1)), "''");
        assert_eq!(op(BinOp::Mul, Value::tuple(vec![]), Value::Int(5)), "()");
    }

    #[test]
    fn oversized_repetition_is_refused() {
        assert_eq!(op(BinOp::Mul, Value::str("ab"), Value::Int(4611686018427387904)), "integer overflow");
        assert_eq!(op(BinOp::Mul, Value::Int(i64::MAX), Value::bytes(&b"x"[..])), "integer overflow");
        let pair = Value::list(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(op(BinOp::Mul, pair, Value::Int(30_000_000)), "integer overflow");
    }

    #[test]
    fn mismatches_are_type_errors() {
        assert_eq!(
            op(BinOp::Add, Value::str("a"), Value::bytes(&b"b"[..])),
            "type error: unsupported operand types for +: 'str' and 'bytes'"
        );
        assert_eq!(op(BinOp::Div, Value::Int(1), Value::Int(0)), "division by zero");
    }
}
