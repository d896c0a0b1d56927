//! Free-identifier collection over a parsed expression.
//!
//! Only binders inside the expression shadow a name: lambda parameters and
//! comprehension targets. Attribute names and keyword-argument names are not
//! references.

use std::collections::BTreeSet;

use crate::errors::ParseError;
use crate::expression::{parse_expr, CompElement, Expr};

/// Parse `source` and return every identifier it references freely.
pub fn scan(source: &str) -> Result<BTreeSet<String>, ParseError> {
    let ast = parse_expr(source)?;
    Ok(free_names(&ast))
}

pub fn free_names(expr: &Expr) -> BTreeSet<String> {
    let mut walker = Walker::default();
    walker.visit(expr);
    walker.found
}

#[derive(Default)]
struct Walker {
    /// One frame per enclosing binder.
    scopes: Vec<Vec<String>>,
    found: BTreeSet<String>,
}

impl Walker {
    fn is_bound(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|frame| frame.iter().any(|n| n == name))
    }

    fn visit(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(_) => {}
            Expr::Name(name) => {
                if !self.is_bound(name) {
                    self.found.insert(name.clone());
                }
            }
            Expr::Unary { operand, .. } | Expr::Not(operand) => self.visit(operand),
            Expr::Binary { left, right, .. } | Expr::And(left, right) | Expr::Or(left, right) => {
                self.visit(left);
                self.visit(right);
            }
            Expr::Compare { first, rest } => {
                self.visit(first);
                for (_, operand) in rest {
                    self.visit(operand);
                }
            }
            Expr::IfElse { cond, then, otherwise } => {
                self.visit(cond);
                self.visit(then);
                self.visit(otherwise);
            }
            Expr::Lambda(def) => {
                self.scopes.push(def.params.clone());
                self.visit(&def.body);
                self.scopes.pop();
            }
            Expr::Call { func, args, kwargs } => {
                self.visit(func);
                args.iter().for_each(|a| self.visit(a));
                kwargs.iter().for_each(|(_, v)| self.visit(v));
            }
            Expr::Attribute { object, .. } => self.visit(object),
            Expr::Index { object, index } => {
                self.visit(object);
                self.visit(index);
            }
            Expr::Slice { object, lower, upper, step } => {
                self.visit(object);
                for part in [lower, upper, step].into_iter().flatten() {
                    self.visit(part);
                }
            }
            Expr::List(items) | Expr::Tuple(items) => items.iter().for_each(|i| self.visit(i)),
            Expr::Dict(entries) => {
                for (k, v) in entries {
                    self.visit(k);
                    self.visit(v);
                }
            }
            Expr::Comprehension { element, clauses } => {
                // The outermost iterable is evaluated in the enclosing scope.
                if let Some(first) = clauses.first() {
                    self.visit(&first.iter);
                }
                self.scopes.push(Vec::new());
                for (i, clause) in clauses.iter().enumerate() {
                    if i > 0 {
                        self.visit(&clause.iter);
                    }
                    if let Some(frame) = self.scopes.last_mut() {
                        frame.extend(clause.targets.iter().cloned());
                    }
                    clause.conditions.iter().for_each(|c| self.visit(c));
                }
                match element {
                    CompElement::Item(item) => self.visit(item),
                    CompElement::Pair(k, v) => {
                        self.visit(k);
                        self.visit(v);
                    }
                }
                self.scopes.pop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(src: &str) -> Vec<String> {
        scan(src).unwrap().into_iter().collect()
    }

    #[test]
    fn attributes_are_not_references() {
        assert_eq!(names("input.method(a, b)"), vec!["a", "b", "input"]);
    }

    #[test]
    fn lambda_parameters_shadow() {
        assert_eq!(names("map(x, lambda x: f(y).m() + x)"), vec!["f", "map", "x", "y"]);
        assert_eq!(names("lambda line: line"), Vec::<String>::new());
    }

    #[test]
    fn comprehension_targets_shadow() {
        assert_eq!(names("[line for line in data]"), vec!["data"]);
        assert_eq!(names(r#""\n".join("foo" + l for l in lines)"#), vec!["lines"]);
    }

    #[test]
    fn first_iterable_sees_outer_scope() {
        // the outer `line` in the iterable is free even though the target is also `line`
        assert_eq!(names("[line for line in line]"), vec!["line"]);
        assert_eq!(names("[a for a in xs for b in a if b]"), vec!["xs"]);
    }

    #[test]
    fn keyword_names_are_not_references() {
        assert_eq!(names("sorted(lines, key=len)"), vec!["len", "lines", "sorted"]);
    }

    #[test]
    fn parse_errors_propagate() {
        assert!(scan("input +").is_err());
    }
}
