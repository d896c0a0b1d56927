// src/expression.rs
use std::rc::Rc;

use crate::errors::ParseError;
use crate::parser::{is_ident_start, Number, Parser, StrLit};

/// Recursion budget for nested sub-expressions; each bracket level spends two.
const MAX_NESTING: usize = 200;

const KEYWORDS: &[&str] = &[
    "and", "or", "not", "in", "is", "if", "else", "for", "lambda", "True", "False", "None",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LambdaDef {
    pub params: Vec<String>,
    pub body: Expr,
}

/// One `for <targets> in <iter> [if <cond>]*` clause of a comprehension.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub targets: Vec<String>,
    pub iter: Expr,
    pub conditions: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompElement {
    Item(Box<Expr>),
    Pair(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Name(String),
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinOp, left: Box<Expr>, right: Box<Expr> },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare { first: Box<Expr>, rest: Vec<(CmpOp, Expr)> },
    IfElse { cond: Box<Expr>, then: Box<Expr>, otherwise: Box<Expr> },
    Lambda(Rc<LambdaDef>),
    Call { func: Box<Expr>, args: Vec<Expr>, kwargs: Vec<(String, Expr)> },
    Attribute { object: Box<Expr>, name: String },
    Index { object: Box<Expr>, index: Box<Expr> },
    Slice {
        object: Box<Expr>,
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Comprehension { element: CompElement, clauses: Vec<Clause> },
}

/// Parse one complete expression. Blank source parses to `None`; a bare
/// `a, b` at the top level is a tuple.
pub fn parse_expr(input: &str) -> Result<Expr, ParseError> {
    let mut p = EParser::new(input);
    p.skip_ws();
    if p.eof() {
        return Ok(Expr::Literal(Literal::None));
    }
    let first = p.parse_node()?;
    p.skip_ws();
    let node = if p.parser.peek_char() == Some(',') {
        let mut items = vec![first];
        while p.parser.consume_char(',') {
            p.skip_ws();
            if p.eof() {
                break;
            }
            items.push(p.parse_node()?);
            p.skip_ws();
        }
        Expr::Tuple(items)
    } else {
        first
    };
    if !p.eof() {
        return Err(p.parser.error("trailing input"));
    }
    Ok(node)
}

struct EParser<'a> {
    parser: Parser<'a>,
    depth: usize,
}

impl<'a> EParser<'a> {
    fn new(s: &'a str) -> Self {
        Self {
            parser: Parser::new(s),
            depth: 0,
        }
    }

    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T, ParseError>) -> Result<T, ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(self.parser.error("expression is nested too deeply"));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn parse_node(&mut self) -> Result<Expr, ParseError> {
        self.nested(Self::parse_conditional)
    }

    fn parse_conditional(&mut self) -> Result<Expr, ParseError> {
        self.skip_ws();
        if self.parser.consume_keyword("lambda") {
            return self.parse_lambda();
        }
        let node = self.parse_or()?;
        self.skip_ws();
        if self.parser.consume_keyword("if") {
            let cond = self.parse_or()?;
            self.parser.expect_keyword("else")?;
            let otherwise = self.parse_node()?;
            return Ok(Expr::IfElse {
                cond: Box::new(cond),
                then: Box::new(node),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(node)
    }

    fn parse_lambda(&mut self) -> Result<Expr, ParseError> {
        let mut params = Vec::new();
        self.skip_ws();
        if !self.parser.consume_char(':') {
            loop {
                self.skip_ws();
                let name = self.parse_name()?;
                if params.contains(&name) {
                    return Err(self.parser.error(format!("duplicate parameter '{name}'")));
                }
                params.push(name);
                self.skip_ws();
                if self.parser.consume_char(',') {
                    continue;
                }
                self.parser.expect(':')?;
                break;
            }
        }
        let body = self.parse_node()?;
        Ok(Expr::Lambda(Rc::new(LambdaDef { params, body })))
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        loop {
            self.skip_ws();
            if self.parser.consume_keyword("or") {
                let right = self.parse_and()?;
                left = Expr::Or(Box::new(left), Box::new(right));
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_not()?;
        loop {
            self.skip_ws();
            if self.parser.consume_keyword("and") {
                let right = self.parse_not()?;
                left = Expr::And(Box::new(left), Box::new(right));
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        self.skip_ws();
        if self.parser.consume_keyword("not") {
            let inner = self.nested(Self::parse_not)?;
            Ok(Expr::Not(Box::new(inner)))
        } else {
            self.parse_compare()
        }
    }

    fn parse_compare(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_arith()?;
        let mut rest = Vec::new();
        while let Some(op) = self.parse_cmp_op() {
            rest.push((op, self.parse_arith()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare { first: Box::new(first), rest })
        }
    }

    fn parse_cmp_op(&mut self) -> Option<CmpOp> {
        self.skip_ws();
        let p = &mut self.parser;
        if p.consume_str("==") {
            Some(CmpOp::Eq)
        } else if p.consume_str("!=") {
            Some(CmpOp::Ne)
        } else if p.consume_str("<=") {
            Some(CmpOp::Le)
        } else if p.consume_str(">=") {
            Some(CmpOp::Ge)
        } else if p.consume_char('<') {
            Some(CmpOp::Lt)
        } else if p.consume_char('>') {
            Some(CmpOp::Gt)
        } else if p.consume_keyword("in") {
            Some(CmpOp::In)
        } else if p.peek_keyword("not") {
            let mark = p.offset();
            p.consume_keyword("not");
            p.skip_ws();
            if p.consume_keyword("in") {
                Some(CmpOp::NotIn)
            } else {
                // `not` here can only start a new expression; leave it for the caller.
                p.reset(mark);
                None
            }
        } else if p.consume_keyword("is") {
            p.skip_ws();
            if p.consume_keyword("not") {
                Some(CmpOp::IsNot)
            } else {
                Some(CmpOp::Is)
            }
        } else {
            None
        }
    }

    fn parse_arith(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_term()?;
        loop {
            self.skip_ws();
            let op = if self.parser.consume_char('+') {
                BinOp::Add
            } else if self.parser.consume_char('-') {
                BinOp::Sub
            } else {
                break;
            };
            let right = self.parse_term()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_factor()?;
        loop {
            self.skip_ws();
            let p = &mut self.parser;
            let op = if p.peek_str("**") {
                break;
            } else if p.consume_str("//") {
                BinOp::FloorDiv
            } else if p.consume_char('*') {
                BinOp::Mul
            } else if p.consume_char('/') {
                BinOp::Div
            } else if p.consume_char('%') {
                BinOp::Mod
            } else {
                break;
            };
            let right = self.parse_factor()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr, ParseError> {
        self.nested(Self::parse_unary)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        self.skip_ws();
        let op = if self.parser.consume_char('-') {
            UnaryOp::Neg
        } else if self.parser.consume_char('+') {
            UnaryOp::Pos
        } else {
            return self.parse_power();
        };
        let operand = self.parse_factor()?;
        Ok(Expr::Unary { op, operand: Box::new(operand) })
    }

    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_postfix()?;
        self.skip_ws();
        if self.parser.consume_str("**") {
            // right-associative, binds tighter than unary minus on its left only
            let exponent = self.parse_factor()?;
            return Ok(binary(BinOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut node = self.parse_atom()?;
        loop {
            self.skip_ws();
            if self.parser.consume_char('(') {
                let (args, kwargs) = self.parse_call_args()?;
                node = Expr::Call { func: Box::new(node), args, kwargs };
            } else if self.parser.consume_char('[') {
                node = self.parse_subscript(node)?;
            } else if self.parser.consume_char('.') {
                self.skip_ws();
                let name = self.parser.parse_identifier()?;
                node = Expr::Attribute { object: Box::new(node), name };
            } else {
                break;
            }
        }
        Ok(node)
    }

    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), ParseError> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        self.skip_ws();
        if self.parser.consume_char(')') {
            return Ok((args, kwargs));
        }
        loop {
            self.skip_ws();
            if let Some(name) = self.try_keyword_arg()? {
                if kwargs.iter().any(|(k, _)| *k == name) {
                    return Err(self.parser.error(format!("repeated keyword argument '{name}'")));
                }
                let value = self.parse_node()?;
                kwargs.push((name, value));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.parser.error("positional argument follows keyword argument"));
                }
                let arg = self.parse_node()?;
                self.skip_ws();
                if self.parser.peek_keyword("for") {
                    // a lone generator argument: f(x for x in y)
                    let clauses = self.parse_clauses()?;
                    self.parser.expect(')')?;
                    if !args.is_empty() {
                        return Err(self.parser.error("generator argument must be the only argument"));
                    }
                    let gen = Expr::Comprehension { element: CompElement::Item(Box::new(arg)), clauses };
                    return Ok((vec![gen], kwargs));
                }
                args.push(arg);
            }
            self.skip_ws();
            if self.parser.consume_char(',') {
                self.skip_ws();
                if self.parser.consume_char(')') {
                    break;
                }
                continue;
            }
            self.parser.expect(')')?;
            break;
        }
        Ok((args, kwargs))
    }

    /// `name=` (but not `name==`) starts a keyword argument.
    fn try_keyword_arg(&mut self) -> Result<Option<String>, ParseError> {
        let mark = self.parser.offset();
        if !self.parser.peek_char().is_some_and(is_ident_start) || self.parser.string_prefix_len().is_some() {
            return Ok(None);
        }
        let name = self.parser.parse_identifier()?;
        self.skip_ws();
        if self.parser.peek_char() == Some('=') && !self.parser.peek_str("==") && !KEYWORDS.contains(&name.as_str()) {
            self.parser.consume_char('=');
            return Ok(Some(name));
        }
        self.parser.reset(mark);
        Ok(None)
    }

    fn parse_subscript(&mut self, object: Expr) -> Result<Expr, ParseError> {
        self.skip_ws();
        let lower = if self.parser.peek_char() == Some(':') {
            None
        } else {
            Some(Box::new(self.parse_node()?))
        };
        self.skip_ws();
        if !self.parser.consume_char(':') {
            self.parser.expect(']')?;
            let index = lower.ok_or_else(|| self.parser.error("empty subscript"))?;
            return Ok(Expr::Index { object: Box::new(object), index });
        }
        let upper = self.parse_slice_part()?;
        self.skip_ws();
        let step = if self.parser.consume_char(':') {
            self.parse_slice_part()?
        } else {
            None
        };
        self.parser.expect(']')?;
        Ok(Expr::Slice { object: Box::new(object), lower, upper, step })
    }

    fn parse_slice_part(&mut self) -> Result<Option<Box<Expr>>, ParseError> {
        self.skip_ws();
        match self.parser.peek_char() {
            Some(':') | Some(']') => Ok(None),
            _ => Ok(Some(Box::new(self.parse_node()?))),
        }
    }

    fn parse_atom(&mut self) -> Result<Expr, ParseError> {
        self.skip_ws();
        let Some(c) = self.parser.peek_char() else {
            return Err(self.parser.error("unexpected end of input"));
        };
        if self.parser.string_prefix_len().is_some() {
            return self.parse_strings();
        }
        if c.is_ascii_digit() || (c == '.' && self.next_is_digit()) {
            return Ok(match self.parser.parse_number_literal()? {
                Number::Int(i) => Expr::Literal(Literal::Int(i)),
                Number::Float(f) => Expr::Literal(Literal::Float(f)),
            });
        }
        if is_ident_start(c) {
            let start = self.parser.offset();
            let name = self.parser.parse_identifier()?;
            return match name.as_str() {
                "True" => Ok(Expr::Literal(Literal::Bool(true))),
                "False" => Ok(Expr::Literal(Literal::Bool(false))),
                "None" => Ok(Expr::Literal(Literal::None)),
                kw if KEYWORDS.contains(&kw) => {
                    Err(ParseError::new(format!("unexpected keyword '{kw}'"), start))
                }
                _ => Ok(Expr::Name(name)),
            };
        }
        match c {
            '(' => {
                self.parser.consume_char('(');
                self.parse_sequence(')')
            }
            '[' => {
                self.parser.consume_char('[');
                self.parse_sequence(']')
            }
            '{' => {
                self.parser.consume_char('{');
                self.parse_dict()
            }
            _ => Err(self.parser.error(format!("unexpected '{c}'"))),
        }
    }

    fn next_is_digit(&mut self) -> bool {
        let mark = self.parser.offset();
        self.parser.consume_char('.');
        let digit = self.parser.peek_char().is_some_and(|c| c.is_ascii_digit());
        self.parser.reset(mark);
        digit
    }

    /// Adjacent literals concatenate; text and bytes cannot be mixed.
    fn parse_strings(&mut self) -> Result<Expr, ParseError> {
        let start = self.parser.offset();
        let mut acc = self.parser.parse_quoted_string()?;
        loop {
            self.skip_ws();
            if self.parser.string_prefix_len().is_none() {
                break;
            }
            let next = self.parser.parse_quoted_string()?;
            acc = match (acc, next) {
                (StrLit::Text(mut a), StrLit::Text(b)) => {
                    a.push_str(&b);
                    StrLit::Text(a)
                }
                (StrLit::Bytes(mut a), StrLit::Bytes(b)) => {
                    a.extend(b);
                    StrLit::Bytes(a)
                }
                _ => return Err(ParseError::new("cannot mix bytes and text literals", start)),
            };
        }
        Ok(match acc {
            StrLit::Text(s) => Expr::Literal(Literal::Str(s)),
            StrLit::Bytes(b) => Expr::Literal(Literal::Bytes(b)),
        })
    }

    /// Parenthesised expression, tuple, list, or list/generator comprehension.
    fn parse_sequence(&mut self, close: char) -> Result<Expr, ParseError> {
        let is_list = close == ']';
        self.skip_ws();
        if self.parser.consume_char(close) {
            return Ok(if is_list { Expr::List(Vec::new()) } else { Expr::Tuple(Vec::new()) });
        }
        let first = self.parse_node()?;
        self.skip_ws();
        if self.parser.peek_keyword("for") {
            let clauses = self.parse_clauses()?;
            self.parser.expect(close)?;
            return Ok(Expr::Comprehension { element: CompElement::Item(Box::new(first)), clauses });
        }
        let mut items = vec![first];
        let mut trailing_comma = false;
        loop {
            self.skip_ws();
            if self.parser.consume_char(close) {
                break;
            }
            self.parser.expect(',')?;
            trailing_comma = true;
            self.skip_ws();
            if self.parser.consume_char(close) {
                break;
            }
            items.push(self.parse_node()?);
            trailing_comma = false;
        }
        if is_list {
            Ok(Expr::List(items))
        } else if items.len() == 1 && !trailing_comma {
            Ok(items.remove(0))
        } else {
            Ok(Expr::Tuple(items))
        }
    }

    fn parse_dict(&mut self) -> Result<Expr, ParseError> {
        self.skip_ws();
        if self.parser.consume_char('}') {
            return Ok(Expr::Dict(Vec::new()));
        }
        let mut entries = Vec::new();
        loop {
            let key = self.parse_node()?;
            self.skip_ws();
            if !self.parser.consume_char(':') {
                return Err(self.parser.error("set literals are not supported; expected ':'"));
            }
            let value = self.parse_node()?;
            self.skip_ws();
            if entries.is_empty() && self.parser.peek_keyword("for") {
                let clauses = self.parse_clauses()?;
                self.parser.expect('}')?;
                return Ok(Expr::Comprehension {
                    element: CompElement::Pair(Box::new(key), Box::new(value)),
                    clauses,
                });
            }
            entries.push((key, value));
            self.skip_ws();
            if self.parser.consume_char('}') {
                break;
            }
            self.parser.expect(',')?;
            self.skip_ws();
            if self.parser.consume_char('}') {
                break;
            }
        }
        Ok(Expr::Dict(entries))
    }

    fn parse_clauses(&mut self) -> Result<Vec<Clause>, ParseError> {
        let mut clauses = Vec::new();
        loop {
            self.skip_ws();
            if !self.parser.consume_keyword("for") {
                break;
            }
            let targets = self.parse_targets()?;
            self.parser.expect_keyword("in")?;
            let iter = self.parse_or()?;
            let mut conditions = Vec::new();
            loop {
                self.skip_ws();
                if !self.parser.consume_keyword("if") {
                    break;
                }
                conditions.push(self.parse_or()?);
            }
            clauses.push(Clause { targets, iter, conditions });
        }
        Ok(clauses)
    }

    fn parse_targets(&mut self) -> Result<Vec<String>, ParseError> {
        self.skip_ws();
        let parens = self.parser.consume_char('(');
        let mut targets = Vec::new();
        loop {
            self.skip_ws();
            targets.push(self.parse_name()?);
            self.skip_ws();
            if !self.parser.consume_char(',') {
                break;
            }
        }
        if parens {
            self.parser.expect(')')?;
        }
        Ok(targets)
    }

    /// Identifier that is not a reserved word.
    fn parse_name(&mut self) -> Result<String, ParseError> {
        let start = self.parser.offset();
        let name = self.parser.parse_identifier()?;
        if KEYWORDS.contains(&name.as_str()) {
            return Err(ParseError::new(format!("'{name}' is a reserved word"), start));
        }
        Ok(name)
    }

    fn skip_ws(&mut self) {
        self.parser.skip_ws();
    }

    fn eof(&self) -> bool {
        self.parser.eof()
    }
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary { op, left: Box::new(left), right: Box::new(right) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn name(n: &str) -> Expr {
        Expr::Name(n.into())
    }

    #[test]
    fn blank_is_none() {
        assert_eq!(parse_expr("  ").unwrap(), Expr::Literal(Literal::None));
    }

    #[test]
    fn precedence() {
        let ast = parse_expr("10 ** 4 + 3").unwrap();
        assert_eq!(
            ast,
            binary(
                BinOp::Add,
                binary(BinOp::Pow, Expr::Literal(Literal::Int(10)), Expr::Literal(Literal::Int(4))),
                Expr::Literal(Literal::Int(3)),
            )
        );
    }

    #[test]
    fn method_call_chain() {
        let ast = parse_expr("input.method(a, b)").unwrap();
        assert_eq!(
            ast,
            Expr::Call {
                func: Box::new(Expr::Attribute { object: Box::new(name("input")), name: "method".into() }),
                args: vec![name("a"), name("b")],
                kwargs: vec![],
            }
        );
    }

    #[test]
    fn generator_argument() {
        let ast = parse_expr(r#""\n".join("foo" + l for l in lines)"#).unwrap();
        let Expr::Call { args, .. } = ast else { panic!("expected call") };
        assert_eq!(args.len(), 1);
        assert!(matches!(&args[0], Expr::Comprehension { clauses, .. } if clauses[0].targets == vec!["l".to_string()]));
    }

    #[test]
    fn conditional_and_not_in() {
        assert!(matches!(parse_expr("'a' if x not in y else 'b'").unwrap(), Expr::IfElse { .. }));
        assert!(matches!(
            parse_expr("x not in y").unwrap(),
            Expr::Compare { ref rest, .. } if rest[0].0 == CmpOp::NotIn
        ));
    }

    #[test]
    fn keyword_arguments() {
        let Expr::Call { kwargs, .. } = parse_expr("sorted(xs, key=len, reverse=True)").unwrap() else {
            panic!("expected call")
        };
        assert_eq!(kwargs.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(), vec!["key", "reverse"]);
    }

    #[test]
    fn tuples_and_parens() {
        assert_eq!(parse_expr("(1)").unwrap(), Expr::Literal(Literal::Int(1)));
        assert!(matches!(parse_expr("(1,)").unwrap(), Expr::Tuple(ref v) if v.len() == 1));
        assert!(matches!(parse_expr("()").unwrap(), Expr::Tuple(ref v) if v.is_empty()));
        assert!(matches!(parse_expr("line, len(line)").unwrap(), Expr::Tuple(ref v) if v.len() == 2));
        assert!(matches!(parse_expr("1,").unwrap(), Expr::Tuple(ref v) if v.len() == 1));
    }

    #[test]
    fn slices() {
        assert!(matches!(parse_expr("line[::-1]").unwrap(), Expr::Slice { lower: None, upper: None, step: Some(_), .. }));
        assert!(matches!(parse_expr("line[1:]").unwrap(), Expr::Slice { lower: Some(_), upper: None, step: None, .. }));
    }

    #[test]
    fn errors_carry_offsets() {
        assert_eq!(parse_expr("1 +").unwrap_err().offset, 3);
        assert_eq!(parse_expr("a b").unwrap_err(), ParseError::new("trailing input", 2));
        assert!(parse_expr("lambda for: 1").is_err());
        assert!(parse_expr("{1, 2}").is_err());
    }

    #[test]
    fn deep_nesting_is_a_parse_error() {
        let deep = |open: &str, close: &str| format!("{}1{}", open.repeat(20_000), close.repeat(20_000));
        for src in [deep("(", ")"), deep("[", "]"), deep("-", ""), deep("not ", ""), deep("2 ** ", "")] {
            let err = parse_expr(&src).unwrap_err();
            assert_eq!(err.message, "expression is nested too deeply");
        }
        let shallow = format!("{}1{}", "(".repeat(50), ")".repeat(50));
        assert_eq!(parse_expr(&shallow).unwrap(), Expr::Literal(Literal::Int(1)));
    }
}
