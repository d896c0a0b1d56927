// src/parser.rs
use crate::errors::ParseError;

/// Numeric literal as read from source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

/// String literal as read from source; `b"..."` produces `Bytes`.
#[derive(Debug, Clone, PartialEq)]
pub enum StrLit {
    Text(String),
    Bytes(Vec<u8>),
}

/// Character cursor over the expression source.
pub struct Parser<'a> {
    s: &'a str,
    i: usize,
}

impl<'a> Parser<'a> {
    pub fn new(s: &'a str) -> Self {
        Self { s, i: 0 }
    }

    pub fn offset(&self) -> usize {
        self.i
    }

    pub fn reset(&mut self, offset: usize) {
        self.i = offset;
    }

    pub fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.i)
    }

    pub fn parse_identifier(&mut self) -> Result<String, ParseError> {
        let start = self.i;
        match self.peek_char() {
            Some(c) if is_ident_start(c) => self.i += c.len_utf8(),
            _ => return Err(self.error("identifier expected")),
        }
        while let Some(c) = self.peek_char() {
            if is_ident_continue(c) {
                self.i += c.len_utf8();
            } else {
                break;
            }
        }
        Ok(self.s[start..self.i].to_string())
    }

    /// True when the cursor sits on `kw` as a whole word.
    pub fn peek_keyword(&self, kw: &str) -> bool {
        self.peek_str(kw)
            && !self.s[self.i + kw.len()..]
                .chars()
                .next()
                .is_some_and(is_ident_continue)
    }

    pub fn consume_keyword(&mut self, kw: &str) -> bool {
        if self.peek_keyword(kw) {
            self.i += kw.len();
            true
        } else {
            false
        }
    }

    pub fn expect_keyword(&mut self, kw: &str) -> Result<(), ParseError> {
        self.skip_ws();
        if self.consume_keyword(kw) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{kw}'")))
        }
    }

    pub fn parse_number_literal(&mut self) -> Result<Number, ParseError> {
        let start = self.i;
        if self.peek_str("0x") || self.peek_str("0X") {
            return self.parse_radix(16);
        }
        if self.peek_str("0o") || self.peek_str("0O") {
            return self.parse_radix(8);
        }
        if self.peek_str("0b") || self.peek_str("0B") {
            return self.parse_radix(2);
        }
        let mut is_float = false;
        self.skip_digits();
        if self.peek_char() == Some('.') {
            let after = self.s[self.i + 1..].chars().next();
            if !after.is_some_and(|c| c == '_' || c.is_alphabetic()) {
                is_float = true;
                self.i += 1;
                self.skip_digits();
            }
        }
        if matches!(self.peek_char(), Some('e' | 'E')) {
            let mark = self.i;
            self.i += 1;
            if matches!(self.peek_char(), Some('+' | '-')) {
                self.i += 1;
            }
            if self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.skip_digits();
            } else {
                self.i = mark;
            }
        }
        let text: String = self.s[start..self.i].chars().filter(|c| *c != '_').collect();
        if text.is_empty() || text == "." {
            self.i = start;
            return Err(self.error("number expected"));
        }
        if is_float {
            text.parse::<f64>()
                .map(Number::Float)
                .map_err(|_| ParseError::new("bad float", start))
        } else {
            text.parse::<i64>()
                .map(Number::Int)
                .map_err(|_| ParseError::new("integer literal too large", start))
        }
    }

    fn parse_radix(&mut self, radix: u32) -> Result<Number, ParseError> {
        let start = self.i;
        self.i += 2;
        let digits_start = self.i;
        while let Some(c) = self.peek_char() {
            if c == '_' || c.is_digit(radix) {
                self.i += 1;
            } else {
                break;
            }
        }
        let digits: String = self.s[digits_start..self.i].chars().filter(|c| *c != '_').collect();
        i64::from_str_radix(&digits, radix)
            .map(Number::Int)
            .map_err(|_| ParseError::new("bad integer literal", start))
    }

    fn skip_digits(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() || c == '_' {
                self.i += 1;
            } else {
                break;
            }
        }
    }

    /// Length of a string prefix (`b`, `r`, `br`, `rb`, any case) if one
    /// directly precedes a quote at the cursor.
    pub fn string_prefix_len(&self) -> Option<usize> {
        let rest = &self.s[self.i..];
        let prefix_len = rest
            .chars()
            .take_while(|c| matches!(c, 'b' | 'B' | 'r' | 'R'))
            .count();
        if prefix_len > 2 {
            return None;
        }
        let prefix = rest[..prefix_len].to_ascii_lowercase();
        if prefix_len == 2 && prefix != "br" && prefix != "rb" {
            return None;
        }
        match rest[prefix_len..].chars().next() {
            Some('"' | '\'') => Some(prefix_len),
            _ => None,
        }
    }

    pub fn parse_quoted_string(&mut self) -> Result<StrLit, ParseError> {
        let start = self.i;
        let prefix_len = self.string_prefix_len().ok_or_else(|| self.error("expected quoted string"))?;
        let prefix = self.s[self.i..self.i + prefix_len].to_ascii_lowercase();
        let (bytes, raw) = (prefix.contains('b'), prefix.contains('r'));
        self.i += prefix_len;
        let quote = self.peek_char().ok_or_else(|| self.error("string"))?;
        self.i += 1;

        let mut out: Vec<u8> = Vec::new();
        let mut text = String::new();
        let push = |c: char, text: &mut String, out: &mut Vec<u8>| -> bool {
            if bytes {
                if !c.is_ascii() {
                    return false;
                }
                out.push(c as u8);
            } else {
                text.push(c);
            }
            true
        };
        while let Some(c) = self.peek_char() {
            self.i += c.len_utf8();
            if c == quote {
                return Ok(if bytes { StrLit::Bytes(out) } else { StrLit::Text(text) });
            }
            if c != '\\' {
                if !push(c, &mut text, &mut out) {
                    return Err(ParseError::new("bytes can only contain ASCII characters", self.i));
                }
                continue;
            }
            let Some(nc) = self.peek_char() else { break };
            self.i += nc.len_utf8();
            if raw {
                push('\\', &mut text, &mut out);
                if !push(nc, &mut text, &mut out) {
                    return Err(ParseError::new("bytes can only contain ASCII characters", self.i));
                }
                continue;
            }
            match nc {
                'n' => text_or_byte(bytes, &mut text, &mut out, b'\n'),
                't' => text_or_byte(bytes, &mut text, &mut out, b'\t'),
                'r' => text_or_byte(bytes, &mut text, &mut out, b'\r'),
                '0' => text_or_byte(bytes, &mut text, &mut out, 0),
                '\\' => text_or_byte(bytes, &mut text, &mut out, b'\\'),
                '"' => text_or_byte(bytes, &mut text, &mut out, b'"'),
                '\'' => text_or_byte(bytes, &mut text, &mut out, b'\''),
                'x' => {
                    let code = self.take_hex(2)?;
                    if bytes {
                        out.push(code as u8);
                    } else {
                        text.push(char::from(code as u8));
                    }
                }
                'u' if !bytes => {
                    let code = self.take_hex(4)?;
                    let c = char::from_u32(code)
                        .ok_or_else(|| self.error("invalid \\u escape"))?;
                    text.push(c);
                }
                _ => {
                    push('\\', &mut text, &mut out);
                    if !push(nc, &mut text, &mut out) {
                        return Err(ParseError::new("bytes can only contain ASCII characters", self.i));
                    }
                }
            }
        }
        Err(ParseError::new("unterminated string", start))
    }

    fn take_hex(&mut self, width: usize) -> Result<u32, ParseError> {
        let digits = self.s[self.i..].get(..width).unwrap_or("");
        if digits.len() != width || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(self.error(format!("expected {width} hex digits")));
        }
        self.i += width;
        u32::from_str_radix(digits, 16).map_err(|_| self.error("bad hex escape"))
    }

    pub fn expect(&mut self, c: char) -> Result<(), ParseError> {
        self.skip_ws();
        if self.consume_char(c) {
            Ok(())
        } else {
            match self.peek_char() {
                Some(found) => Err(self.error(format!("expected '{c}', found '{found}'"))),
                None => Err(self.error(format!("expected '{c}', found end of input"))),
            }
        }
    }

    pub fn consume_char(&mut self, c: char) -> bool {
        if self.peek_char() == Some(c) {
            self.i += c.len_utf8();
            true
        } else {
            false
        }
    }

    pub fn consume_str(&mut self, lit: &str) -> bool {
        if self.peek_str(lit) {
            self.i += lit.len();
            true
        } else {
            false
        }
    }

    pub fn peek_char(&self) -> Option<char> {
        self.s[self.i..].chars().next()
    }

    pub fn peek_str(&self, lit: &str) -> bool {
        self.s[self.i..].starts_with(lit)
    }

    pub fn skip_ws(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.i += c.len_utf8();
            } else {
                break;
            }
        }
    }

    pub fn eof(&self) -> bool {
        self.i >= self.s.len()
    }
}

fn text_or_byte(bytes: bool, text: &mut String, out: &mut Vec<u8>, b: u8) {
    if bytes {
        out.push(b);
    } else {
        text.push(char::from(b));
    }
}

pub fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

pub fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn numbers() {
        assert_eq!(Parser::new("42").parse_number_literal().unwrap(), Number::Int(42));
        assert_eq!(Parser::new("1_000").parse_number_literal().unwrap(), Number::Int(1000));
        assert_eq!(Parser::new("0x1f").parse_number_literal().unwrap(), Number::Int(31));
        assert_eq!(Parser::new("2.5").parse_number_literal().unwrap(), Number::Float(2.5));
        assert_eq!(Parser::new("1e3").parse_number_literal().unwrap(), Number::Float(1000.0));
        assert!(Parser::new("99999999999999999999").parse_number_literal().is_err());
    }

    #[test]
    fn strings_and_escapes() {
        let mut p = Parser::new(r#""a\tb\x41""#);
        assert_eq!(p.parse_quoted_string().unwrap(), StrLit::Text("a\tbA".into()));
        let mut p = Parser::new(r#"b'\x41\xff'"#);
        assert_eq!(p.parse_quoted_string().unwrap(), StrLit::Bytes(vec![0x41, 0xff]));
        let mut p = Parser::new(r#"r'\d+'"#);
        assert_eq!(p.parse_quoted_string().unwrap(), StrLit::Text("\\d+".into()));
    }

    #[test]
    fn bytes_reject_non_ascii() {
        assert!(Parser::new("b'é'").parse_quoted_string().is_err());
    }

    #[test]
    fn unterminated_string() {
        let err = Parser::new("'abc").parse_quoted_string().unwrap_err();
        assert_eq!(err, ParseError::new("unterminated string", 0));
    }

    #[test]
    fn keywords_need_word_boundary() {
        assert!(Parser::new("in x").peek_keyword("in"));
        assert!(!Parser::new("input").peek_keyword("in"));
    }
}
