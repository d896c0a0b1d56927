use std::cmp::Ordering;
use std::rc::Rc;

use crate::errors::RuntimeError;
use crate::value::{Callable, Value};

/// `a == b`. Numbers compare across int/float/bool; other kinds only with themselves.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Str(sa), Value::Str(sb)) => sa == sb,
        (Value::Bytes(ba), Value::Bytes(bb)) => ba == bb,
        (Value::List(la), Value::List(lb)) | (Value::Tuple(la), Value::Tuple(lb)) => {
            la.len() == lb.len() && la.iter().zip(lb.iter()).all(|(x, y)| values_equal(x, y))
        }
        (Value::Dict(da), Value::Dict(db)) => {
            da.len() == db.len()
                && da
                    .iter()
                    .all(|(k, v)| db.get(k).is_some_and(|w| values_equal(v, w)))
        }
        (Value::Function(fa), Value::Function(fb)) => same_callable(fa, fb),
        (Value::Int(ia), Value::Int(ib)) => ia == ib,
        _ => match (a.as_float(), b.as_float()) {
            (Some(da), Some(db)) if is_numeric(a) && is_numeric(b) => da == db,
            _ => false,
        },
    }
}

/// `a is b`: identity for shared containers and functions, equality for scalars.
pub fn values_identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::List(la), Value::List(lb)) => Rc::ptr_eq(la, lb),
        (Value::Dict(da), Value::Dict(db)) => Rc::ptr_eq(da, db),
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Bool(_), _) | (_, Value::Bool(_)) => false,
        (Value::Int(_), Value::Float(_)) | (Value::Float(_), Value::Int(_)) => false,
        _ => values_equal(a, b),
    }
}

fn same_callable(a: &Callable, b: &Callable) -> bool {
    match (a, b) {
        (Callable::Lambda(ca), Callable::Lambda(cb)) => Rc::ptr_eq(ca, cb),
        (Callable::Builtin(na), Callable::Builtin(nb)) => na == nb,
        (Callable::Method { receiver: ra, name: na }, Callable::Method { receiver: rb, name: nb }) => {
            na == nb && values_identical(ra, rb)
        }
        _ => false,
    }
}

fn is_numeric(v: &Value) -> bool {
    matches!(v, Value::Int(_) | Value::Float(_) | Value::Bool(_))
}

/// Ordering for `<`, `<=`, `>`, `>=` and sorting. `Ok(None)` means unordered (NaN).
pub fn compare(a: &Value, b: &Value) -> Result<Option<Ordering>, RuntimeError> {
    match (a, b) {
        (Value::Int(ia), Value::Int(ib)) => Ok(Some(ia.cmp(ib))),
        (Value::Str(sa), Value::Str(sb)) => Ok(Some(sa.cmp(sb))),
        (Value::Bytes(ba), Value::Bytes(bb)) => Ok(Some(ba.cmp(bb))),
        (Value::List(la), Value::List(lb)) | (Value::Tuple(la), Value::Tuple(lb)) => {
            for (x, y) in la.iter().zip(lb.iter()) {
                if !values_equal(x, y) {
                    return compare(x, y);
                }
            }
            Ok(Some(la.len().cmp(&lb.len())))
        }
        _ if is_numeric(a) && is_numeric(b) => {
            let (da, db) = (a.as_float().unwrap_or(f64::NAN), b.as_float().unwrap_or(f64::NAN));
            Ok(da.partial_cmp(&db))
        }
        _ => Err(RuntimeError::Type(format!(
            "ordering not supported between '{}' and '{}'",
            a.type_name(),
            b.type_name()
        ))),
    }
}

/// Predicate over an ordering, in the shape of the chained comparison operators.
pub fn cmp_values<F>(a: &Value, b: &Value, pred_on_ord: F) -> Result<bool, RuntimeError>
where
    F: Fn(Ordering) -> bool,
{
    Ok(compare(a, b)?.is_some_and(pred_on_ord))
}

/// `item in container`.
pub fn contains(container: &Value, item: &Value) -> Result<bool, RuntimeError> {
    match (container, item) {
        (Value::Str(hay), Value::Str(needle)) => Ok(hay.contains(&**needle)),
        (Value::Str(_), other) => Err(RuntimeError::Type(format!(
            "'in <str>' requires str as left operand, not '{}'",
            other.type_name()
        ))),
        (Value::Bytes(hay), Value::Bytes(needle)) => Ok(needle.is_empty()
            || hay.windows(needle.len()).any(|w| w == &needle[..])),
        (Value::Bytes(hay), Value::Int(i)) => Ok(u8::try_from(*i).is_ok_and(|b| hay.contains(&b))),
        (Value::List(items) | Value::Tuple(items), _) => Ok(items.iter().any(|v| values_equal(v, item))),
        (Value::Dict(entries), Value::Str(key)) => Ok(entries.contains_key(&**key)),
        (Value::Dict(_), _) => Ok(false),
        (other, _) => Err(RuntimeError::Type(format!(
            "argument of type '{}' is not a container",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_cross_type_equality() {
        assert!(values_equal(&Value::Int(1), &Value::Float(1.0)));
        assert!(values_equal(&Value::Bool(true), &Value::Int(1)));
        assert!(!values_equal(&Value::str("1"), &Value::Int(1)));
    }

    #[test]
    fn bytes_and_text_never_equal() {
        assert!(!values_equal(&Value::str("A"), &Value::bytes(&b"A"[..])));
        assert!(values_equal(&Value::bytes(&b"A"[..]), &Value::bytes(&b"\x41"[..])));
    }

    #[test]
    fn ordering() {
        assert!(cmp_values(&Value::Int(1), &Value::Float(1.5), Ordering::is_lt).unwrap());
        assert!(cmp_values(&Value::str("b"), &Value::str("a"), Ordering::is_gt).unwrap());
        assert!(!cmp_values(&Value::Float(f64::NAN), &Value::Int(1), Ordering::is_lt).unwrap());
        assert!(compare(&Value::str("a"), &Value::Int(1)).is_err());
    }

    #[test]
    fn membership() {
        assert!(contains(&Value::str("Nope"), &Value::str("op")).unwrap());
        assert!(contains(&Value::bytes(&b"abc"[..]), &Value::bytes(&b"bc"[..])).unwrap());
        assert!(contains(&Value::list(vec![Value::Int(2)]), &Value::Float(2.0)).unwrap());
        assert!(contains(&Value::Int(3), &Value::Int(3)).is_err());
    }
}
