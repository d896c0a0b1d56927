//! Tree-walking evaluator for parsed expressions.

use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use crate::comparison::{cmp_values, contains, values_equal, values_identical};
use crate::context::{Context, Slot};
use crate::errors::{EvalError, Result, RuntimeError};
use crate::expression::{Clause, CmpOp, CompElement, Expr, LambdaDef};
use crate::functions::methods::{call_method, has_method};
use crate::functions::{type_error, Args, Invoke, Registry};
use crate::operators::{binary_op, unary_op};
use crate::value::{Callable, Closure, Value};

/// Nested lambda calls allowed before evaluation gives up.
const MAX_CALL_DEPTH: usize = 100;

type Frame = HashMap<String, Value>;

/// Evaluates expressions against one binding context at a time.
///
/// Names resolve innermost-first: lambda parameters and comprehension targets,
/// then the input bindings, then builtin functions.
pub struct Evaluator {
    registry: Registry,
    globals: Context,
    frames: Vec<Frame>,
    depth: usize,
}

enum Sink {
    Items(Vec<Value>),
    Pairs(IndexMap<String, Value>),
}

impl Evaluator {
    pub fn new(registry: Registry) -> Self {
        Self { registry, globals: Context::empty(), frames: Vec::new(), depth: 0 }
    }

    /// Evaluate `expr` with `context` bound. The context is discarded afterwards.
    pub fn evaluate(&mut self, expr: &Expr, context: Context) -> Result<Value> {
        self.globals = context;
        self.frames.clear();
        self.depth = 0;
        let result = self.eval(expr);
        self.globals = Context::empty();
        if let Ok(value) = &result {
            trace!(result_type = value.type_name(), "evaluated");
        }
        result
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(lit) => Ok(Value::from(lit)),
            Expr::Name(name) => self.lookup(name),
            Expr::Unary { op, operand } => {
                let v = self.eval(operand)?;
                Ok(unary_op(*op, &v)?)
            }
            Expr::Binary { op, left, right } => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                Ok(binary_op(*op, &l, &r)?)
            }
            Expr::And(left, right) => {
                let l = self.eval(left)?;
                if l.truthy() { self.eval(right) } else { Ok(l) }
            }
            Expr::Or(left, right) => {
                let l = self.eval(left)?;
                if l.truthy() { Ok(l) } else { self.eval(right) }
            }
            Expr::Not(operand) => Ok(Value::Bool(!self.eval(operand)?.truthy())),
            Expr::Compare { first, rest } => {
                let mut left = self.eval(first)?;
                for (op, operand) in rest {
                    let right = self.eval(operand)?;
                    if !compare_op(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::IfElse { cond, then, otherwise } => {
                if self.eval(cond)?.truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Lambda(def) => Ok(self.make_closure(def)),
            Expr::Call { func, args, kwargs } => self.eval_call(func, args, kwargs),
            Expr::Attribute { object, name } => {
                let receiver = self.eval(object)?;
                if has_method(&receiver, name) {
                    Ok(Value::Function(Callable::Method {
                        receiver: Box::new(receiver),
                        name: Rc::from(name.as_str()),
                    }))
                } else {
                    Err(RuntimeError::Attribute { type_name: receiver.type_name(), attr: name.clone() }.into())
                }
            }
            Expr::Index { object, index } => {
                let target = self.eval(object)?;
                let key = self.eval(index)?;
                index_value(&target, &key)
            }
            Expr::Slice { object, lower, upper, step } => {
                let target = self.eval(object)?;
                let lower = self.eval_bound(lower.as_deref())?;
                let upper = self.eval_bound(upper.as_deref())?;
                let step = self.eval_bound(step.as_deref())?;
                slice_value(&target, lower, upper, step)
            }
            Expr::List(items) => Ok(Value::list(self.eval_all(items)?)),
            Expr::Tuple(items) => Ok(Value::tuple(self.eval_all(items)?)),
            Expr::Dict(entries) => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (k, v) in entries {
                    let key = dict_key(self.eval(k)?)?;
                    let value = self.eval(v)?;
                    map.insert(key, value);
                }
                Ok(Value::Dict(Rc::new(map)))
            }
            Expr::Comprehension { element, clauses } => self.eval_comprehension(element, clauses),
        }
    }

    fn eval_all(&mut self, items: &[Expr]) -> Result<Vec<Value>> {
        items.iter().map(|e| self.eval(e)).collect()
    }

    fn eval_bound(&mut self, bound: Option<&Expr>) -> Result<Option<i64>> {
        match bound {
            None => Ok(None),
            Some(e) => match self.eval(e)? {
                Value::None => Ok(None),
                v => v
                    .as_int()
                    .map(Some)
                    .ok_or_else(|| type_error(format!("slice indices must be integers, not '{}'", v.type_name()))),
            },
        }
    }

    fn lookup(&self, name: &str) -> Result<Value> {
        if let Some(v) = self.frames.iter().rev().find_map(|f| f.get(name)) {
            return Ok(v.clone());
        }
        match self.globals.lookup(name) {
            Some(Slot::Ready(v)) => return Ok(v.clone()),
            Some(Slot::Failed(e)) => return Err(EvalError::Codec(e.clone())),
            None => {}
        }
        self.registry
            .resolve(name)
            .map(|builtin| Value::Function(Callable::Builtin(builtin)))
            .ok_or_else(|| RuntimeError::Name(name.to_string()).into())
    }

    fn make_closure(&self, def: &Rc<LambdaDef>) -> Value {
        let mut captured = Frame::new();
        for frame in &self.frames {
            captured.extend(frame.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Value::Function(Callable::Lambda(Rc::new(Closure { def: Rc::clone(def), captured })))
    }

    fn eval_call(&mut self, func: &Expr, args: &[Expr], kwargs: &[(String, Expr)]) -> Result<Value> {
        // `obj.method(...)` calls straight through without building a bound method.
        let callee = match func {
            Expr::Attribute { object, name } => {
                let receiver = self.eval(object)?;
                Callable::Method { receiver: Box::new(receiver), name: Rc::from(name.as_str()) }
            }
            other => match self.eval(other)? {
                Value::Function(c) => c,
                v => return Err(type_error(format!("'{}' object is not callable", v.type_name()))),
            },
        };
        let positional = self.eval_all(args)?;
        let keywords = kwargs
            .iter()
            .map(|(k, e)| Ok((k.clone(), self.eval(e)?)))
            .collect::<Result<Vec<_>>>()?;
        self.call(&callee, Args { positional, keywords })
    }

    fn call(&mut self, callee: &Callable, args: Args) -> Result<Value> {
        match callee {
            Callable::Builtin(name) => {
                let registry = self.registry.clone();
                registry.call(name, args, self)
            }
            Callable::Method { receiver, name } => call_method(receiver, name, args),
            Callable::Lambda(closure) => self.call_lambda(closure, args),
        }
    }

    fn call_lambda(&mut self, closure: &Closure, args: Args) -> Result<Value> {
        let params = &closure.def.params;
        if args.positional.len() > params.len() {
            return Err(type_error(format!(
                "<lambda>() takes {} positional argument(s) but {} were given",
                params.len(),
                args.positional.len()
            )));
        }
        let mut frame = closure.captured.clone();
        let mut bound = vec![false; params.len()];
        for (i, value) in args.positional.into_iter().enumerate() {
            frame.insert(params[i].clone(), value);
            bound[i] = true;
        }
        for (name, value) in args.keywords {
            let Some(i) = params.iter().position(|p| *p == name) else {
                return Err(type_error(format!("<lambda>() got an unexpected keyword argument '{name}'")));
            };
            if bound[i] {
                return Err(type_error(format!("<lambda>() got multiple values for argument '{name}'")));
            }
            frame.insert(name, value);
            bound[i] = true;
        }
        if let Some(i) = bound.iter().position(|b| !b) {
            return Err(type_error(format!("<lambda>() missing required argument '{}'", params[i])));
        }

        if self.depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::Recursion.into());
        }
        self.depth += 1;
        let outer = std::mem::replace(&mut self.frames, vec![frame]);
        let result = self.eval(&closure.def.body);
        self.frames = outer;
        self.depth -= 1;
        result
    }

    fn eval_comprehension(&mut self, element: &CompElement, clauses: &[Clause]) -> Result<Value> {
        let Some(first) = clauses.first() else {
            return Err(type_error("comprehension without a 'for' clause"));
        };
        let source = self.eval(&first.iter)?;
        let mut sink = match element {
            CompElement::Item(_) => Sink::Items(Vec::new()),
            CompElement::Pair(..) => Sink::Pairs(IndexMap::new()),
        };
        self.frames.push(Frame::new());
        let result = self.run_clauses(element, clauses, Some(source), &mut sink);
        self.frames.pop();
        result?;
        Ok(match sink {
            Sink::Items(items) => Value::list(items),
            Sink::Pairs(map) => Value::Dict(Rc::new(map)),
        })
    }

    fn run_clauses(
        &mut self,
        element: &CompElement,
        clauses: &[Clause],
        source: Option<Value>,
        sink: &mut Sink,
    ) -> Result<()> {
        let Some((clause, inner)) = clauses.split_first() else {
            return self.emit(element, sink);
        };
        let iterable = match source {
            Some(v) => v,
            None => self.eval(&clause.iter)?,
        };
        'items: for item in iterable.iterate()? {
            self.bind_targets(&clause.targets, item)?;
            for cond in &clause.conditions {
                if !self.eval(cond)?.truthy() {
                    continue 'items;
                }
            }
            self.run_clauses(element, inner, None, sink)?;
        }
        Ok(())
    }

    fn emit(&mut self, element: &CompElement, sink: &mut Sink) -> Result<()> {
        match (element, sink) {
            (CompElement::Item(e), Sink::Items(items)) => items.push(self.eval(e)?),
            (CompElement::Pair(k, v), Sink::Pairs(map)) => {
                let key = dict_key(self.eval(k)?)?;
                let value = self.eval(v)?;
                map.insert(key, value);
            }
            _ => return Err(type_error("comprehension element does not match its result kind")),
        }
        Ok(())
    }

    fn bind_targets(&mut self, targets: &[String], item: Value) -> Result<()> {
        let frame = self.frames.last_mut().ok_or_else(|| type_error("no comprehension scope"))?;
        if let [single] = targets {
            frame.insert(single.clone(), item);
            return Ok(());
        }
        let parts = item.iterate()?;
        if parts.len() != targets.len() {
            return Err(RuntimeError::Value(format!(
                "expected {} values to unpack, got {}",
                targets.len(),
                parts.len()
            ))
            .into());
        }
        for (name, part) in targets.iter().zip(parts) {
            frame.insert(name.clone(), part);
        }
        Ok(())
    }
}

impl Invoke for Evaluator {
    fn invoke(&mut self, func: &Value, args: Vec<Value>) -> Result<Value> {
        match func {
            Value::Function(callee) => self.call(callee, Args::new(args)),
            other => Err(type_error(format!("'{}' object is not callable", other.type_name()))),
        }
    }
}

fn compare_op(op: CmpOp, left: &Value, right: &Value) -> Result<bool> {
    Ok(match op {
        CmpOp::Eq => values_equal(left, right),
        CmpOp::Ne => !values_equal(left, right),
        CmpOp::Lt => cmp_values(left, right, |o| o.is_lt())?,
        CmpOp::Le => cmp_values(left, right, |o| o.is_le())?,
        CmpOp::Gt => cmp_values(left, right, |o| o.is_gt())?,
        CmpOp::Ge => cmp_values(left, right, |o| o.is_ge())?,
        CmpOp::In => contains(right, left)?,
        CmpOp::NotIn => !contains(right, left)?,
        CmpOp::Is => values_identical(left, right),
        CmpOp::IsNot => !values_identical(left, right),
    })
}

fn dict_key(key: Value) -> Result<String> {
    match key {
        Value::Str(s) => Ok(s.to_string()),
        other => Err(type_error(format!("dict keys must be str, not '{}'", other.type_name()))),
    }
}

/// Resolve a possibly negative index against `len`.
fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let i = if index < 0 { index + len } else { index };
    (0..len).contains(&i).then_some(i as usize)
}

fn index_value(target: &Value, key: &Value) -> Result<Value> {
    if let Value::Dict(map) = target {
        let k = key
            .as_str()
            .ok_or_else(|| RuntimeError::Key(key.repr()))?;
        return map
            .get(k)
            .cloned()
            .ok_or_else(|| RuntimeError::Key(key.repr()).into());
    }
    let i = key.as_int().ok_or_else(|| {
        type_error(format!("{} indices must be integers, not '{}'", target.type_name(), key.type_name()))
    })?;
    let out_of_range = || EvalError::from(RuntimeError::Index(format!("{} index {i}", target.type_name())));
    match target {
        Value::List(items) | Value::Tuple(items) => normalize_index(i, items.len())
            .map(|i| items[i].clone())
            .ok_or_else(out_of_range),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            normalize_index(i, chars.len())
                .map(|i| Value::str(chars[i].to_string()))
                .ok_or_else(out_of_range)
        }
        Value::Bytes(b) => normalize_index(i, b.len())
            .map(|i| Value::Int(b[i] as i64))
            .ok_or_else(out_of_range),
        other => Err(type_error(format!("'{}' object is not subscriptable", other.type_name()))),
    }
}

/// Positions selected by `[lower:upper:step]` on a sequence of length `len`.
fn slice_positions(len: usize, lower: Option<i64>, upper: Option<i64>, step: Option<i64>) -> Result<Vec<usize>> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(RuntimeError::Value("slice step cannot be zero".into()).into());
    }
    let len = len as i64;
    let clamp = |bound: i64, lo: i64, hi: i64| {
        let b = if bound < 0 { bound.saturating_add(len) } else { bound };
        b.clamp(lo, hi)
    };
    let mut out = Vec::new();
    if step > 0 {
        let start = lower.map_or(0, |b| clamp(b, 0, len));
        let stop = upper.map_or(len, |b| clamp(b, 0, len));
        let mut i = start;
        while i < stop {
            out.push(i as usize);
            let Some(next) = i.checked_add(step) else { break };
            i = next;
        }
    } else {
        let start = lower.map_or(len - 1, |b| clamp(b, -1, len - 1));
        let stop = upper.map_or(-1, |b| clamp(b, -1, len - 1));
        let mut i = start;
        while i > stop {
            out.push(i as usize);
            let Some(next) = i.checked_add(step) else { break };
            i = next;
        }
    }
    Ok(out)
}

fn slice_value(target: &Value, lower: Option<i64>, upper: Option<i64>, step: Option<i64>) -> Result<Value> {
    match target {
        Value::List(items) | Value::Tuple(items) => {
            let picked = slice_positions(items.len(), lower, upper, step)?
                .into_iter()
                .map(|i| items[i].clone())
                .collect();
            Ok(if matches!(target, Value::List(_)) { Value::list(picked) } else { Value::tuple(picked) })
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let picked: String = slice_positions(chars.len(), lower, upper, step)?
                .into_iter()
                .map(|i| chars[i])
                .collect();
            Ok(Value::str(picked))
        }
        Value::Bytes(b) => {
            let picked: Vec<u8> = slice_positions(b.len(), lower, upper, step)?
                .into_iter()
                .map(|i| b[i])
                .collect();
            Ok(Value::bytes(picked))
        }
        other => Err(type_error(format!("'{}' object is not sliceable", other.type_name()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::parse_expr;
    use crate::mode::GROUPS;
    use pretty_assertions::assert_eq;

    fn run_with(src: &str, context: Context) -> Result<Value> {
        let ast = parse_expr(src)?;
        Evaluator::new(Registry::with_builtins()).evaluate(&ast, context)
    }

    fn run(src: &str) -> String {
        run_with(src, Context::empty()).unwrap().repr()
    }

    fn line(text: &str) -> Context {
        Context::for_group(&GROUPS[2], Ok(Value::str(text)), Value::bytes(text.as_bytes()), Some(1))
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(run("1 + 2 * 3"), "7");
        assert_eq!(run("-2 ** 2"), "-4");
        assert_eq!(run("(7 // 2, 7 % -3, 7 / 2)"), "(3, -2, 3.5)");
    }

    #[test]
    fn boolean_operators_return_operands() {
        assert_eq!(run("0 or 'x'"), "'x'");
        assert_eq!(run("'' and 1"), "''");
        assert_eq!(run("not []"), "True");
    }

    #[test]
    fn chained_comparison() {
        assert_eq!(run("1 < 2 < 3"), "True");
        assert_eq!(run("1 < 3 < 2"), "False");
        assert_eq!(run("'a' in 'cat' and 3 not in [1, 2]"), "True");
    }

    #[test]
    fn short_circuit_skips_errors() {
        assert_eq!(run("False and 1 / 0"), "False");
        assert_eq!(run("1 if True else 1 / 0"), "1");
    }

    #[test]
    fn lambdas_capture_enclosing_targets() {
        assert_eq!(run("[(lambda y: x + y)(10) for x in [1, 2]]"), "[11, 12]");
    }

    #[test]
    fn lambda_keyword_arguments() {
        assert_eq!(run("(lambda a, b: a - b)(b=1, a=5)"), "4");
        let err = run_with("(lambda a: a)(1, 2)", Context::empty()).unwrap_err();
        assert!(err.to_string().contains("takes 1 positional"));
    }

    #[test]
    fn comprehensions() {
        assert_eq!(run("[x * y for x in [1, 2] for y in [10, 100] if x > 1]"), "[20, 200]");
        assert_eq!(run("{k: v for k, v in [('a', 1), ('b', 2)]}"), "{'a': 1, 'b': 2}");
        assert_eq!(run("sum(x for x in range(5))"), "10");
    }

    #[test]
    fn comprehension_targets_do_not_leak() {
        let err = run_with("[x for x in [1]] and x", Context::empty()).unwrap_err();
        assert!(matches!(err, EvalError::Runtime(RuntimeError::Name(n)) if n == "x"));
    }

    #[test]
    fn indexing_and_slicing() {
        assert_eq!(run("'hello'[-1]"), "'o'");
        assert_eq!(run("'hello'[::-1]"), "'olleh'");
        assert_eq!(run("[1, 2, 3, 4][1:3]"), "[2, 3]");
        assert_eq!(run("b'abc'[0]"), "97");
        assert_eq!(run("{'a': 1}['a']"), "1");
        assert_eq!(run("(1, 2, 3)[5:]"), "()");
    }

    #[test]
    fn huge_slice_steps_stop_at_the_end() {
        assert_eq!(run("'abc'[1::9223372036854775807]"), "'b'");
        assert_eq!(run("[1, 2, 3][1::-9223372036854775807 - 1]"), "[2]");
        assert_eq!(run("'abc'[-9223372036854775807 - 1:]"), "'abc'");
    }

    #[test]
    fn sequence_repetition() {
        assert_eq!(run("[1, 2] * 2"), "[1, 2, 1, 2]");
        assert_eq!(run("(1,) * 3"), "(1, 1, 1)");
        assert_eq!(run("0 * ['x']"), "[]");
    }

    #[test]
    fn index_errors() {
        let err = run_with("[1][3]", Context::empty()).unwrap_err();
        assert!(matches!(err, EvalError::Runtime(RuntimeError::Index(_))));
        let err = run_with("{'a': 1}['b']", Context::empty()).unwrap_err();
        assert!(matches!(err, EvalError::Runtime(RuntimeError::Key(_))));
    }

    #[test]
    fn methods_and_bound_methods() {
        assert_eq!(run_with("line.split(',')[1]", line("a,b,c")).unwrap().repr(), "'b'");
        assert_eq!(run("list(map(', '.join, [['a', 'b']]))"), "['a, b']");
    }

    #[test]
    fn builtins_call_back_into_lambdas() {
        assert_eq!(run("sorted(['bb', 'a', 'ccc'], key=lambda s: -len(s))"), "['ccc', 'bb', 'a']");
        assert_eq!(run("list(filter(lambda n: n % 2, range(6)))"), "[1, 3, 5]");
    }

    #[test]
    fn names_resolve_innermost_first() {
        assert_eq!(run_with("(lambda line: line * 2)(3)", line("x")).unwrap().repr(), "6");
        assert_eq!(run_with("len(line)", line("four")).unwrap().repr(), "4");
    }

    #[test]
    fn undefined_name() {
        let err = run_with("nope + 1", Context::empty()).unwrap_err();
        assert_eq!(err.to_string(), "runtime error: name 'nope' is not defined");
    }

    #[test]
    fn failed_text_binding_raises_only_when_read() {
        let err = crate::codec::CodecError::Decode { encoding: "UTF-8" };
        let ctx = || Context::for_group(&GROUPS[2], Err(err.clone()), Value::bytes(&b"\xff"[..]), Some(1));
        assert_eq!(run_with("len(bline)", ctx()).unwrap().repr(), "1");
        assert!(matches!(run_with("line", ctx()), Err(EvalError::Codec(_))));
    }

    #[test]
    fn runaway_recursion_is_an_error() {
        let err = run_with("(lambda f: f(f))(lambda f: f(f))", Context::empty()).unwrap_err();
        assert!(matches!(err, EvalError::Runtime(RuntimeError::Recursion)));
    }

    #[test]
    fn calling_a_non_function() {
        let err = run_with("3(1)", Context::empty()).unwrap_err();
        assert!(err.to_string().contains("not callable"));
    }
}
