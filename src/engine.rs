use std::io::BufRead;

use tracing::debug;

use crate::driver::{bindings, Bindings};
use crate::errors::Result;
use crate::evaluator::Evaluator;
use crate::expression::{parse_expr, Expr};
use crate::functions::Registry;
use crate::mode::ExecMode;
use crate::value::Value;

pub use crate::mode::detect_mode;

/// =========================
/// Public API (Execution)
/// =========================

/// Lazily produced results of [`execute`], one per evaluation.
///
/// In [`ExecMode::EachLine`] a line is read only when the next result is
/// requested. Failures on a line carry its 1-based number, and the iterator
/// can be resumed past them.
pub struct Results<R> {
    ast: Expr,
    evaluator: Evaluator,
    bindings: Bindings<R>,
}

impl<R: BufRead> Results<R> {
    pub fn mode(&self) -> ExecMode {
        self.bindings.mode()
    }
}

impl<R: BufRead> Iterator for Results<R> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        let context = match self.bindings.next()? {
            Ok(context) => context,
            Err(e) => return Some(Err(e)),
        };
        let iteration = context.iteration();
        let result = self.evaluator.evaluate(&self.ast, context);
        Some(result.map_err(|e| match iteration {
            Some(index) => e.at_iteration(index),
            None => e,
        }))
    }
}

/// Run `expression` in `mode` over `input`, decoding text with `encoding`.
///
/// The expression and the encoding are validated before any input is read.
pub fn execute<R: BufRead>(expression: &str, mode: ExecMode, input: R, encoding: &str) -> Result<Results<R>> {
    execute_with(expression, mode, input, encoding, Registry::with_builtins())
}

/// [`execute`] with a caller-supplied function registry.
pub fn execute_with<R: BufRead>(
    expression: &str,
    mode: ExecMode,
    input: R,
    encoding: &str,
    registry: Registry,
) -> Result<Results<R>> {
    let ast = parse_expr(expression)?;
    let bindings = bindings(mode, input, encoding)?;
    debug!(%mode, encoding, "executing expression");
    Ok(Results { ast, evaluator: Evaluator::new(registry), bindings })
}

/// Detect the mode of `expression`, then [`execute`] it.
pub fn run<R: BufRead>(expression: &str, input: R, encoding: &str) -> Result<Results<R>> {
    let mode = detect_mode(expression)?;
    execute(expression, mode, input, encoding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{EvalError, ErrorKind};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn reprs<R: BufRead>(results: Results<R>) -> Vec<String> {
        results.map(|r| r.unwrap().repr()).collect()
    }

    #[test]
    fn each_line_yields_one_result_per_line() {
        let out = execute("line", ExecMode::EachLine, Cursor::new("Yep\nNope\nHa"), "utf-8").unwrap();
        assert_eq!(reprs(out), vec!["'Yep'", "'Nope'", "'Ha'"]);
    }

    #[test]
    fn once_lines_single_result() {
        let expr = r#""\n".join("foo" + l for l in lines)"#;
        let out = execute(expr, ExecMode::OnceLines, Cursor::new("This\nhas\nlines"), "utf-8").unwrap();
        assert_eq!(reprs(out), vec![r"'fooThis\nfoohas\nfoolines'"]);
    }

    #[test]
    fn line_errors_are_tagged_and_resumable() {
        let mut out = run("10 // int(line)", Cursor::new("5\n0\n2\n"), "utf-8").unwrap();
        assert_eq!(out.next().unwrap().unwrap().repr(), "2");
        let err = out.next().unwrap().unwrap_err();
        assert!(matches!(err, EvalError::Iteration { index: 2, .. }));
        assert_eq!(err.kind(), ErrorKind::Evaluation);
        assert_eq!(out.next().unwrap().unwrap().repr(), "5");
        assert!(out.next().is_none());
    }

    #[test]
    fn bad_expression_fails_before_reading() {
        assert!(matches!(
            execute("line +", ExecMode::EachLine, Cursor::new("x"), "utf-8"),
            Err(EvalError::Parse(_))
        ));
        assert!(matches!(
            execute("line", ExecMode::EachLine, Cursor::new("x"), "no-such-codec"),
            Err(EvalError::Codec(_))
        ));
    }

    #[test]
    fn results_report_mode() {
        let out = run("len(blines)", Cursor::new(""), "utf-8").unwrap();
        assert_eq!(out.mode(), ExecMode::OnceLines);
    }
}
