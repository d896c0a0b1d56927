use std::cmp::Ordering;
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;

use crate::comparison::compare;
use crate::errors::{Result, RuntimeError};
use crate::value::Value;

pub mod methods;

/// Calls back into the evaluator so builtins like `map` and `sorted(key=...)`
/// can apply user functions.
pub trait Invoke {
    fn invoke(&mut self, func: &Value, args: Vec<Value>) -> Result<Value>;
}

/// Evaluated call arguments.
#[derive(Debug, Default)]
pub struct Args {
    pub positional: Vec<Value>,
    pub keywords: Vec<(String, Value)>,
}

impl Args {
    pub fn new(positional: Vec<Value>) -> Self {
        Self { positional, keywords: Vec::new() }
    }

    pub fn get(&self, i: usize) -> Option<&Value> {
        self.positional.get(i)
    }

    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.keywords.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
    }
}

/// Trait for pluggable functions used by the expression evaluator.
pub trait Function: Send + Sync {
    fn name(&self) -> &'static str;
    fn arity(&self) -> RangeInclusive<usize>;
    /// Keyword arguments the function accepts.
    fn keywords(&self) -> &'static [&'static str] {
        &[]
    }
    fn call(&self, args: Args, rt: &mut dyn Invoke) -> Result<Value>;
}

/// Thread-safe function registry.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<HashMap<&'static str, Arc<dyn Function>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(builtins::Len);
        registry.register(builtins::Str);
        registry.register(builtins::Repr);
        registry.register(builtins::Int);
        registry.register(builtins::Float);
        registry.register(builtins::Bool);
        registry.register(builtins::List);
        registry.register(builtins::Tuple);
        registry.register(builtins::Dict);
        registry.register(builtins::Sorted);
        registry.register(builtins::Reversed);
        registry.register(builtins::Sum);
        registry.register(builtins::Min);
        registry.register(builtins::Max);
        registry.register(builtins::Abs);
        registry.register(builtins::Round);
        registry.register(builtins::Any);
        registry.register(builtins::All);
        registry.register(builtins::Map);
        registry.register(builtins::Filter);
        registry.register(builtins::Enumerate);
        registry.register(builtins::Zip);
        registry.register(builtins::Range);
        registry.register(builtins::Ordinal);
        registry.register(builtins::Chr);
        registry.register(builtins::First);
        registry.register(builtins::Unique);
        registry.register(builtins::FromJson);
        registry.register(builtins::ToJson);
        registry.register(builtins::Lower);
        registry.register(builtins::Upper);
        registry
    }

    pub fn register<F: Function + 'static>(&mut self, f: F) {
        let mut_map = Arc::make_mut(&mut self.inner);
        mut_map.insert(f.name(), Arc::new(f));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Function>> {
        self.inner.get(name).cloned()
    }

    /// Interned name of a registered function.
    pub fn resolve(&self, name: &str) -> Option<&'static str> {
        self.inner.get_key_value(name).map(|(k, _)| *k)
    }

    /// Check arity and keywords, then call.
    pub fn call(&self, name: &str, args: Args, rt: &mut dyn Invoke) -> Result<Value> {
        let f = self
            .get(name)
            .ok_or_else(|| RuntimeError::Name(name.to_string()))?;
        let arity = f.arity();
        if !arity.contains(&args.len()) {
            let expected = if arity.start() == arity.end() {
                arity.start().to_string()
            } else {
                format!("{} to {}", arity.start(), arity.end())
            };
            return Err(RuntimeError::Type(format!(
                "{name}() takes {expected} positional argument(s) but {} were given",
                args.len()
            ))
            .into());
        }
        if let Some((unknown, _)) = args.keywords.iter().find(|(k, _)| !f.keywords().contains(&k.as_str())) {
            return Err(RuntimeError::Type(format!(
                "{name}() got an unexpected keyword argument '{unknown}'"
            ))
            .into());
        }
        f.call(args, rt)
    }
}

pub(crate) fn type_error(msg: impl Into<String>) -> crate::errors::EvalError {
    RuntimeError::Type(msg.into()).into()
}

pub(crate) fn expect_str<'v>(v: &'v Value, what: &str) -> Result<&'v str> {
    v.as_str()
        .ok_or_else(|| type_error(format!("{what} must be str, not '{}'", v.type_name())))
}

pub(crate) fn expect_int(v: &Value, what: &str) -> Result<i64> {
    v.as_int()
        .ok_or_else(|| type_error(format!("{what} must be int, not '{}'", v.type_name())))
}

/// Stable sort by precomputed keys; incomparable keys surface as a type error.
pub(crate) fn sort_by_keys(items: Vec<Value>, keys: Vec<Value>, reverse: bool) -> Result<Vec<Value>> {
    let mut paired: Vec<(Value, Value)> = keys.into_iter().zip(items).collect();
    let mut failure = None;
    paired.sort_by(|(ka, _), (kb, _)| {
        let ord = match compare(ka, kb) {
            Ok(ord) => ord.unwrap_or(Ordering::Equal),
            Err(e) => {
                failure.get_or_insert(e);
                Ordering::Equal
            }
        };
        if reverse { ord.reverse() } else { ord }
    });
    if let Some(e) = failure {
        return Err(e.into());
    }
    Ok(paired.into_iter().map(|(_, v)| v).collect())
}

pub mod builtins {
    use std::rc::Rc;

    use indexmap::IndexMap;
    use itertools::Itertools;

    use super::*;
    use crate::codec;
    use crate::operators::binary_op;
    use crate::expression::BinOp;
    use crate::value::MAX_SEQUENCE_LEN;


    macro_rules! builtin {
        ($ty:ident, $name:literal, $arity:expr, |$args:ident, $rt:ident| $body:block) => {
            builtin!($ty, $name, $arity, [], |$args, $rt| $body);
        };
        ($ty:ident, $name:literal, $arity:expr, [$($kw:literal),*], |$args:ident, $rt:ident| $body:block) => {
            pub struct $ty;
            impl Function for $ty {
                fn name(&self) -> &'static str { $name }
                fn arity(&self) -> RangeInclusive<usize> { $arity }
                fn keywords(&self) -> &'static [&'static str] { &[$($kw),*] }
                #[allow(unused_mut, unused_variables)]
                fn call(&self, mut $args: Args, $rt: &mut dyn Invoke) -> Result<Value> $body
            }
        };
    }

    fn arg(args: &Args, i: usize) -> &Value {
        args.get(i).unwrap_or(&Value::None)
    }

    /// Single iterable argument, or all positional arguments when there are several.
    fn iterable_or_varargs(args: Args, name: &str) -> Result<Vec<Value>> {
        if args.len() == 1 {
            Ok(args.positional[0].iterate()?)
        } else if args.is_empty() {
            Err(type_error(format!("{name} expected at least 1 argument")))
        } else {
            Ok(args.positional)
        }
    }

    fn extreme(mut args: Args, rt: &mut dyn Invoke, name: &str, want: Ordering) -> Result<Value> {
        let key = args.keyword("key").cloned();
        let default = args.keyword("default").cloned();
        args.keywords.clear();
        let items = iterable_or_varargs(args, name)?;
        let mut best: Option<(Value, Value)> = None;
        for item in items {
            let k = match &key {
                Some(f) if !matches!(f, Value::None) => rt.invoke(f, vec![item.clone()])?,
                _ => item.clone(),
            };
            let replace = match &best {
                None => true,
                Some((best_key, _)) => compare(&k, best_key)? == Some(want),
            };
            if replace {
                best = Some((k, item));
            }
        }
        match (best, default) {
            (Some((_, v)), _) => Ok(v),
            (None, Some(d)) => Ok(d),
            (None, None) => Err(RuntimeError::Value(format!("{name}() arg is an empty sequence")).into()),
        }
    }

    builtin!(Len, "len", 1..=1, |args, rt| {
        let n = match arg(&args, 0) {
            Value::Str(s) => s.chars().count(),
            Value::Bytes(b) => b.len(),
            Value::List(v) | Value::Tuple(v) => v.len(),
            Value::Dict(d) => d.len(),
            other => return Err(type_error(format!("object of type '{}' has no len()", other.type_name()))),
        };
        Ok(Value::Int(n as i64))
    });

    builtin!(Str, "str", 0..=2, |args, rt| {
        match (args.get(0), args.get(1)) {
            (None, _) => Ok(Value::str("")),
            (Some(Value::Bytes(b)), Some(enc)) => {
                Ok(Value::str(codec::to_text(b, expect_str(enc, "encoding")?)?))
            }
            (Some(_), Some(_)) => Err(type_error("decoding to str: need a bytes-like object")),
            (Some(v @ Value::Str(_)), None) => Ok(v.clone()),
            (Some(v), None) => Ok(Value::str(v.to_string())),
        }
    });

    builtin!(Repr, "repr", 1..=1, |args, rt| {
        Ok(Value::str(arg(&args, 0).repr()))
    });

    builtin!(Int, "int", 0..=2, |args, rt| {
        let base = match args.get(1) {
            Some(b) => Some(expect_int(b, "base")?),
            None => None,
        };
        let parse = |text: &str| -> Result<Value> {
            let cleaned: String = text.trim().chars().filter(|c| *c != '_').collect();
            let radix = base.unwrap_or(10);
            if !(2..=36).contains(&radix) {
                return Err(RuntimeError::Value("int() base must be >= 2 and <= 36".into()).into());
            }
            i64::from_str_radix(&cleaned, radix as u32)
                .map(Value::Int)
                .map_err(|_| RuntimeError::Value(format!("invalid literal for int() with base {radix}: {:?}", text)).into())
        };
        match args.get(0) {
            None => Ok(Value::Int(0)),
            Some(Value::Str(s)) => parse(s),
            Some(Value::Bytes(b)) => parse(&String::from_utf8_lossy(b)),
            Some(_) if base.is_some() => Err(type_error("int() can't convert non-string with explicit base")),
            Some(Value::Int(i)) => Ok(Value::Int(*i)),
            Some(Value::Bool(b)) => Ok(Value::Int(*b as i64)),
            Some(Value::Float(f)) => {
                if !f.is_finite() || f.abs() >= 9.2e18 {
                    return Err(RuntimeError::Value(format!("cannot convert float {f} to integer")).into());
                }
                Ok(Value::Int(f.trunc() as i64))
            }
            Some(other) => Err(type_error(format!(
                "int() argument must be a string or a number, not '{}'",
                other.type_name()
            ))),
        }
    });

    builtin!(Float, "float", 0..=1, |args, rt| {
        match args.get(0) {
            None => Ok(Value::Float(0.0)),
            Some(Value::Str(s)) => {
                let t = s.trim();
                let parsed = match t.to_ascii_lowercase().as_str() {
                    "inf" | "+inf" | "infinity" => Some(f64::INFINITY),
                    "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
                    "nan" => Some(f64::NAN),
                    _ => t.replace('_', "").parse::<f64>().ok(),
                };
                parsed
                    .map(Value::Float)
                    .ok_or_else(|| RuntimeError::Value(format!("could not convert string to float: {t:?}")).into())
            }
            Some(v) => v
                .as_float()
                .map(Value::Float)
                .ok_or_else(|| type_error(format!("float() argument must be a string or a number, not '{}'", v.type_name()))),
        }
    });

    builtin!(Bool, "bool", 0..=1, |args, rt| {
        Ok(Value::Bool(args.get(0).is_some_and(Value::truthy)))
    });

    builtin!(List, "list", 0..=1, |args, rt| {
        match args.get(0) {
            None => Ok(Value::list(Vec::new())),
            Some(v) => Ok(Value::list(v.iterate()?)),
        }
    });

    builtin!(Tuple, "tuple", 0..=1, |args, rt| {
        match args.get(0) {
            None => Ok(Value::tuple(Vec::new())),
            Some(v) => Ok(Value::tuple(v.iterate()?)),
        }
    });

    builtin!(Dict, "dict", 0..=1, |args, rt| {
        let mut out = IndexMap::new();
        match args.get(0) {
            None => {}
            Some(Value::Dict(d)) => out = (**d).clone(),
            Some(v) => {
                for pair in v.iterate()? {
                    let kv = pair.iterate()?;
                    let [k, v] = <[Value; 2]>::try_from(kv)
                        .map_err(|_| RuntimeError::Value("dict() sequence elements must have length 2".into()))?;
                    out.insert(expect_str(&k, "dict key")?.to_string(), v);
                }
            }
        }
        Ok(Value::Dict(Rc::new(out)))
    });

    builtin!(Sorted, "sorted", 1..=1, ["key", "reverse"], |args, rt| {
        let items = arg(&args, 0).iterate()?;
        let reverse = args.keyword("reverse").is_some_and(Value::truthy);
        let keys = match args.keyword("key") {
            Some(f) if !matches!(f, Value::None) => items
                .iter()
                .map(|item| rt.invoke(f, vec![item.clone()]))
                .collect::<Result<Vec<_>>>()?,
            _ => items.clone(),
        };
        Ok(Value::list(sort_by_keys(items, keys, reverse)?))
    });

    builtin!(Reversed, "reversed", 1..=1, |args, rt| {
        let mut items = arg(&args, 0).iterate()?;
        items.reverse();
        Ok(Value::list(items))
    });

    builtin!(Sum, "sum", 1..=2, ["start"], |args, rt| {
        let start = args
            .get(1)
            .or_else(|| args.keyword("start"))
            .cloned()
            .unwrap_or(Value::Int(0));
        arg(&args, 0)
            .iterate()?
            .iter()
            .try_fold(start, |acc, v| binary_op(BinOp::Add, &acc, v))
            .map_err(Into::into)
    });

    builtin!(Min, "min", 1..=usize::MAX, ["key", "default"], |args, rt| {
        extreme(args, rt, "min", Ordering::Less)
    });

    builtin!(Max, "max", 1..=usize::MAX, ["key", "default"], |args, rt| {
        extreme(args, rt, "max", Ordering::Greater)
    });

    builtin!(Abs, "abs", 1..=1, |args, rt| {
        match arg(&args, 0) {
            Value::Int(i) => i.checked_abs().map(Value::Int).ok_or_else(|| RuntimeError::Overflow.into()),
            Value::Bool(b) => Ok(Value::Int(*b as i64)),
            Value::Float(f) => Ok(Value::Float(f.abs())),
            other => Err(type_error(format!("bad operand type for abs(): '{}'", other.type_name()))),
        }
    });

    builtin!(Round, "round", 1..=2, |args, rt| {
        let x = arg(&args, 0);
        let digits = match args.get(1) {
            Some(Value::None) | None => None,
            Some(d) => Some(expect_int(d, "ndigits")?),
        };
        match (x, digits) {
            (Value::Int(_) | Value::Bool(_), _) => Ok(Value::Int(x.as_int().unwrap_or_default())),
            (Value::Float(f), None) => {
                let r = f.round_ties_even();
                if !r.is_finite() || r.abs() >= 9.2e18 {
                    return Err(RuntimeError::Overflow.into());
                }
                Ok(Value::Int(r as i64))
            }
            (Value::Float(f), Some(n)) => {
                let scale = 10f64.powi(n.clamp(-308, 308) as i32);
                Ok(Value::Float((f * scale).round_ties_even() / scale))
            }
            (other, _) => Err(type_error(format!("type '{}' doesn't define __round__", other.type_name()))),
        }
    });

    builtin!(Any, "any", 1..=1, |args, rt| {
        Ok(Value::Bool(arg(&args, 0).iterate()?.iter().any(Value::truthy)))
    });

    builtin!(All, "all", 1..=1, |args, rt| {
        Ok(Value::Bool(arg(&args, 0).iterate()?.iter().all(Value::truthy)))
    });

    builtin!(Map, "map", 2..=usize::MAX, |args, rt| {
        let mut it = args.positional.into_iter();
        let f = it.next().unwrap_or(Value::None);
        let columns = it.map(|v| v.iterate()).collect::<std::result::Result<Vec<_>, _>>()?;
        let n = columns.iter().map(Vec::len).min().unwrap_or(0);
        (0..n)
            .map(|i| rt.invoke(&f, columns.iter().map(|c| c[i].clone()).collect()))
            .collect::<Result<Vec<_>>>()
            .map(Value::list)
    });

    builtin!(Filter, "filter", 2..=2, |args, rt| {
        let f = arg(&args, 0).clone();
        let mut kept = Vec::new();
        for item in arg(&args, 1).iterate()? {
            let keep = match &f {
                Value::None => item.truthy(),
                f => rt.invoke(f, vec![item.clone()])?.truthy(),
            };
            if keep {
                kept.push(item);
            }
        }
        Ok(Value::list(kept))
    });

    builtin!(Enumerate, "enumerate", 1..=2, ["start"], |args, rt| {
        let start = match args.get(1).or_else(|| args.keyword("start")) {
            Some(s) => expect_int(s, "start")?,
            None => 0,
        };
        let items = arg(&args, 0).iterate()?;
        Ok(Value::list(
            items
                .into_iter()
                .zip(start..)
                .map(|(v, i)| Value::tuple(vec![Value::Int(i), v]))
                .collect(),
        ))
    });

    builtin!(Zip, "zip", 0..=usize::MAX, |args, rt| {
        let columns = args
            .positional
            .iter()
            .map(Value::iterate)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let n = columns.iter().map(Vec::len).min().unwrap_or(0);
        Ok(Value::list(
            (0..n)
                .map(|i| Value::tuple(columns.iter().map(|c| c[i].clone()).collect()))
                .collect(),
        ))
    });

    builtin!(Range, "range", 1..=3, |args, rt| {
        let ints = args
            .positional
            .iter()
            .map(|v| expect_int(v, "range() argument"))
            .collect::<Result<Vec<_>>>()?;
        let (start, stop, step) = match ints.as_slice() {
            [stop] => (0, *stop, 1),
            [start, stop] => (*start, *stop, 1),
            [start, stop, step] => (*start, *stop, *step),
            _ => return Err(type_error("range expected 1 to 3 arguments")),
        };
        if step == 0 {
            return Err(RuntimeError::Value("range() arg 3 must not be zero".into()).into());
        }
        let span = if step > 0 { stop.saturating_sub(start) } else { start.saturating_sub(stop) };
        let len = if span <= 0 { 0 } else { (span - 1) / step.saturating_abs() + 1 };
        if usize::try_from(len).map_or(true, |len| len > MAX_SEQUENCE_LEN) {
            return Err(RuntimeError::Value(format!("range() of {len} items is too large")).into());
        }
        Ok(Value::list((0..len).map(|i| Value::Int(start + i * step)).collect()))
    });

    builtin!(Ordinal, "ord", 1..=1, |args, rt| {
        match arg(&args, 0) {
            Value::Str(s) if s.chars().count() == 1 => Ok(Value::Int(s.chars().next().map_or(0, |c| c as i64))),
            Value::Bytes(b) if b.len() == 1 => Ok(Value::Int(b[0] as i64)),
            other => Err(type_error(format!("ord() expected a character, but got {}", other.repr()))),
        }
    });

    builtin!(Chr, "chr", 1..=1, |args, rt| {
        let code = expect_int(arg(&args, 0), "chr() argument")?;
        u32::try_from(code)
            .ok()
            .and_then(char::from_u32)
            .map(|c| Value::str(c.to_string()))
            .ok_or_else(|| RuntimeError::Value(format!("chr() arg not in range: {code}")).into())
    });

    builtin!(First, "first", 1..=1, |args, rt| {
        Ok(arg(&args, 0).iterate()?.into_iter().next().unwrap_or(Value::None))
    });

    builtin!(Unique, "unique", 1..=1, |args, rt| {
        let items = arg(&args, 0).iterate()?;
        Ok(Value::list(items.into_iter().unique_by(Value::repr).collect()))
    });

    builtin!(FromJson, "from_json", 1..=1, |args, rt| {
        let parsed: serde_json::Value = match arg(&args, 0) {
            Value::Str(s) => serde_json::from_str(s),
            Value::Bytes(b) => serde_json::from_slice(b),
            other => return Err(type_error(format!("from_json() expects str or bytes, not '{}'", other.type_name()))),
        }
        .map_err(|e| RuntimeError::Value(format!("invalid JSON: {e}")))?;
        Ok(Value::from(parsed))
    });

    builtin!(ToJson, "to_json", 1..=1, |args, rt| {
        serde_json::to_string(arg(&args, 0))
            .map(Value::str)
            .map_err(|e| RuntimeError::Value(format!("cannot serialise to JSON: {e}")).into())
    });

    builtin!(Lower, "lower", 1..=1, |args, rt| {
        Ok(match arg(&args, 0) {
            Value::Str(t) => Value::str(t.to_lowercase()),
            Value::Bytes(b) => Value::bytes(b.to_ascii_lowercase()),
            other => other.clone(),
        })
    });

    builtin!(Upper, "upper", 1..=1, |args, rt| {
        Ok(match arg(&args, 0) {
            Value::Str(t) => Value::str(t.to_uppercase()),
            Value::Bytes(b) => Value::bytes(b.to_ascii_uppercase()),
            other => other.clone(),
        })
    });
}
