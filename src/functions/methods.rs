//! Attribute calls such as `line.split(",")` and `binput.decode("latin1")`.

use std::ops::RangeInclusive;

use indexmap::IndexMap;

use super::{expect_int, expect_str, type_error, Args};
use crate::codec;
use crate::comparison::values_equal;
use crate::errors::{Result, RuntimeError};
use crate::value::{Value, MAX_SEQUENCE_LEN};

const STR_METHODS: &[&str] = &[
    "upper", "lower", "title", "strip", "lstrip", "rstrip", "split", "rsplit", "splitlines", "join",
    "replace", "startswith", "endswith", "find", "count", "encode", "isdigit", "isalpha", "isspace",
    "zfill",
];
const BYTES_METHODS: &[&str] = &[
    "decode", "hex", "strip", "split", "startswith", "endswith", "upper", "lower", "join",
];
const SEQ_METHODS: &[&str] = &["index", "count"];
const DICT_METHODS: &[&str] = &["keys", "values", "items", "get"];

const DEFAULT_ENCODING: &str = "utf-8";

pub fn has_method(receiver: &Value, name: &str) -> bool {
    let table = match receiver {
        Value::Str(_) => STR_METHODS,
        Value::Bytes(_) => BYTES_METHODS,
        Value::List(_) | Value::Tuple(_) => SEQ_METHODS,
        Value::Dict(_) => DICT_METHODS,
        _ => return false,
    };
    table.contains(&name)
}

fn no_attribute(type_name: &'static str, name: &str) -> crate::errors::EvalError {
    RuntimeError::Attribute { type_name, attr: name.to_string() }.into()
}

pub fn call_method(receiver: &Value, name: &str, args: Args) -> Result<Value> {
    if !has_method(receiver, name) {
        return Err(no_attribute(receiver.type_name(), name));
    }
    if let Some((kw, _)) = args.keywords.first() {
        return Err(type_error(format!("{name}() takes no keyword arguments (got '{kw}')")));
    }
    match receiver {
        Value::Str(s) => str_method(s, name, &args),
        Value::Bytes(b) => bytes_method(b, name, &args),
        Value::List(items) | Value::Tuple(items) => seq_method(items, name, &args),
        Value::Dict(entries) => dict_method(entries, name, &args),
        other => Err(no_attribute(other.type_name(), name)),
    }
}

fn arity(name: &str, args: &Args, range: RangeInclusive<usize>) -> Result<()> {
    if range.contains(&args.len()) {
        Ok(())
    } else {
        Err(type_error(format!(
            "{name}() takes {} to {} arguments but {} were given",
            range.start(),
            range.end(),
            args.len()
        )))
    }
}

fn opt_str<'v>(args: &'v Args, i: usize, what: &str) -> Result<Option<&'v str>> {
    match args.get(i) {
        None | Some(Value::None) => Ok(None),
        Some(v) => expect_str(v, what).map(Some),
    }
}

fn opt_int(args: &Args, i: usize, default: i64) -> Result<i64> {
    match args.get(i) {
        None => Ok(default),
        Some(v) => expect_int(v, "argument"),
    }
}

fn strings(v: &Value) -> Result<Vec<Value>> {
    match v {
        Value::Tuple(items) => Ok((**items).clone()),
        other => Ok(vec![other.clone()]),
    }
}

fn str_arity(name: &str) -> RangeInclusive<usize> {
    match name {
        "strip" | "lstrip" | "rstrip" | "encode" => 0..=1,
        "split" | "rsplit" => 0..=2,
        "join" | "find" | "count" | "zfill" | "startswith" | "endswith" => 1..=1,
        "replace" => 2..=3,
        _ => 0..=0,
    }
}

fn str_method(s: &str, name: &str, args: &Args) -> Result<Value> {
    arity(name, args, str_arity(name))?;
    let value = match name {
        "upper" => Value::str(s.to_uppercase()),
        "lower" => Value::str(s.to_lowercase()),
        "title" => Value::str(title_case(s)),
        "strip" | "lstrip" | "rstrip" => {
            let chars = opt_str(args, 0, "strip chars")?;
            let pred = |c: char| match chars {
                Some(set) => set.contains(c),
                None => c.is_whitespace(),
            };
            Value::str(match name {
                "strip" => s.trim_matches(pred),
                "lstrip" => s.trim_start_matches(pred),
                _ => s.trim_end_matches(pred),
            })
        }
        "split" | "rsplit" => {
            let sep = opt_str(args, 0, "separator")?;
            let maxsplit = opt_int(args, 1, -1)?;
            let parts = match sep {
                Some("") => return Err(RuntimeError::Value("empty separator".into()).into()),
                Some(sep) => split_on(s, sep, maxsplit, name == "rsplit"),
                None => split_whitespace(s, maxsplit, name == "rsplit"),
            };
            Value::list(parts.into_iter().map(Value::str).collect())
        }
        "splitlines" => Value::list(s.lines().map(Value::str).collect()),
        "join" => {
            let items = args.positional[0].iterate()?;
            let mut out = String::new();
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(s);
                }
                out.push_str(expect_str(item, "sequence item")?);
            }
            Value::str(out)
        }
        "replace" => {
            let old = expect_str(&args.positional[0], "old")?;
            let new = expect_str(&args.positional[1], "new")?;
            let count = opt_int(args, 2, -1)?;
            Value::str(match usize::try_from(count) {
                Ok(n) => s.replacen(old, new, n),
                Err(_) => s.replace(old, new),
            })
        }
        "startswith" | "endswith" => {
            let mut hit = false;
            for candidate in strings(&args.positional[0])? {
                let affix = expect_str(&candidate, name)?;
                hit |= if name == "startswith" { s.starts_with(affix) } else { s.ends_with(affix) };
            }
            Value::Bool(hit)
        }
        "find" => {
            let sub = expect_str(&args.positional[0], "substring")?;
            Value::Int(s.find(sub).map_or(-1, |at| s[..at].chars().count() as i64))
        }
        "count" => {
            let sub = expect_str(&args.positional[0], "substring")?;
            let n = if sub.is_empty() { s.chars().count() + 1 } else { s.matches(sub).count() };
            Value::Int(n as i64)
        }
        "encode" => {
            let encoding = opt_str(args, 0, "encoding")?.unwrap_or(DEFAULT_ENCODING);
            Value::bytes(codec::to_binary(s, encoding)?)
        }
        "isdigit" => Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_numeric())),
        "isalpha" => Value::Bool(!s.is_empty() && s.chars().all(char::is_alphabetic)),
        "isspace" => Value::Bool(!s.is_empty() && s.chars().all(char::is_whitespace)),
        "zfill" => {
            let width = usize::try_from(expect_int(&args.positional[0], "width")?).unwrap_or(0);
            if width > MAX_SEQUENCE_LEN {
                return Err(RuntimeError::Overflow.into());
            }
            let len = s.chars().count();
            if len >= width {
                Value::str(s)
            } else {
                let (sign, digits) = match s.chars().next() {
                    Some(c @ ('+' | '-')) => (c.to_string(), &s[1..]),
                    _ => (String::new(), s),
                };
                Value::str(format!("{sign}{}{digits}", "0".repeat(width - len)))
            }
        }
        _ => return Err(no_attribute("str", name)),
    };
    Ok(value)
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_cased = false;
    for c in s.chars() {
        if prev_cased {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        prev_cased = c.is_alphabetic();
    }
    out
}

fn split_on<'s>(s: &'s str, sep: &str, maxsplit: i64, from_right: bool) -> Vec<&'s str> {
    match usize::try_from(maxsplit) {
        Err(_) => s.split(sep).collect(),
        Ok(n) if from_right => {
            let mut parts: Vec<&str> = s.rsplitn(n + 1, sep).collect();
            parts.reverse();
            parts
        }
        Ok(n) => s.splitn(n + 1, sep).collect(),
    }
}

fn split_whitespace(s: &str, maxsplit: i64, from_right: bool) -> Vec<&str> {
    let Ok(limit) = usize::try_from(maxsplit) else {
        return s.split_whitespace().collect();
    };
    let mut parts = Vec::new();
    if from_right {
        let mut rest = s.trim_end();
        while !rest.is_empty() {
            if parts.len() == limit {
                parts.push(rest);
                break;
            }
            match rest.rfind(char::is_whitespace) {
                Some(at) => {
                    let ws_len = rest[at..].chars().next().map_or(1, char::len_utf8);
                    parts.push(&rest[at + ws_len..]);
                    rest = rest[..at].trim_end();
                }
                None => {
                    parts.push(rest);
                    break;
                }
            }
        }
        parts.reverse();
    } else {
        let mut rest = s.trim_start();
        while !rest.is_empty() {
            if parts.len() == limit {
                parts.push(rest);
                break;
            }
            match rest.find(char::is_whitespace) {
                Some(at) => {
                    parts.push(&rest[..at]);
                    rest = rest[at..].trim_start();
                }
                None => {
                    parts.push(rest);
                    break;
                }
            }
        }
    }
    parts
}

fn expect_bytes<'v>(v: &'v Value, what: &str) -> Result<&'v [u8]> {
    match v {
        Value::Bytes(b) => Ok(&b[..]),
        other => Err(type_error(format!("{what} must be bytes, not '{}'", other.type_name()))),
    }
}

fn bytes_method(b: &[u8], name: &str, args: &Args) -> Result<Value> {
    match name {
        "hex" | "upper" | "lower" => arity(name, args, 0..=0)?,
        "decode" | "strip" | "split" => arity(name, args, 0..=1)?,
        _ => arity(name, args, 1..=1)?,
    }
    let value = match name {
        "decode" => {
            let encoding = opt_str(args, 0, "encoding")?.unwrap_or(DEFAULT_ENCODING);
            Value::str(codec::to_text(b, encoding)?)
        }
        "hex" => Value::str(b.iter().map(|byte| format!("{byte:02x}")).collect::<String>()),
        "upper" => Value::bytes(b.to_ascii_uppercase()),
        "lower" => Value::bytes(b.to_ascii_lowercase()),
        "strip" => {
            let set: Vec<u8> = match args.get(0) {
                None | Some(Value::None) => b" \t\n\r\x0b\x0c".to_vec(),
                Some(v) => expect_bytes(v, "strip chars")?.to_vec(),
            };
            let start = b.iter().position(|c| !set.contains(c)).unwrap_or(b.len());
            let end = b.iter().rposition(|c| !set.contains(c)).map_or(start, |i| i + 1);
            Value::bytes(&b[start..end.max(start)])
        }
        "split" => {
            let parts: Vec<Value> = match args.get(0) {
                None | Some(Value::None) => b
                    .split(|c| c.is_ascii_whitespace())
                    .filter(|part| !part.is_empty())
                    .map(Value::bytes)
                    .collect(),
                Some(v) => {
                    let sep = expect_bytes(v, "separator")?;
                    if sep.is_empty() {
                        return Err(RuntimeError::Value("empty separator".into()).into());
                    }
                    split_bytes(b, sep).into_iter().map(Value::bytes).collect()
                }
            };
            Value::list(parts)
        }
        "startswith" | "endswith" => {
            let mut hit = false;
            for candidate in strings(&args.positional[0])? {
                let affix = expect_bytes(&candidate, name)?;
                hit |= if name == "startswith" { b.starts_with(affix) } else { b.ends_with(affix) };
            }
            Value::Bool(hit)
        }
        "join" => {
            let items = args.positional[0].iterate()?;
            let mut out = Vec::new();
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.extend_from_slice(b);
                }
                out.extend_from_slice(expect_bytes(item, "sequence item")?);
            }
            Value::bytes(out)
        }
        _ => return Err(no_attribute("bytes", name)),
    };
    Ok(value)
}

fn split_bytes<'b>(b: &'b [u8], sep: &[u8]) -> Vec<&'b [u8]> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i + sep.len() <= b.len() {
        if &b[i..i + sep.len()] == sep {
            parts.push(&b[start..i]);
            i += sep.len();
            start = i;
        } else {
            i += 1;
        }
    }
    parts.push(&b[start..]);
    parts
}

fn seq_method(items: &[Value], name: &str, args: &Args) -> Result<Value> {
    arity(name, args, 1..=1)?;
    let needle = &args.positional[0];
    match name {
        "index" => items
            .iter()
            .position(|v| values_equal(v, needle))
            .map(|i| Value::Int(i as i64))
            .ok_or_else(|| RuntimeError::Value(format!("{} is not in list", needle.repr())).into()),
        _ => Ok(Value::Int(items.iter().filter(|v| values_equal(v, needle)).count() as i64)),
    }
}

fn dict_method(entries: &IndexMap<String, Value>, name: &str, args: &Args) -> Result<Value> {
    match name {
        "keys" => {
            arity(name, args, 0..=0)?;
            Ok(Value::list(entries.keys().map(|k| Value::str(k.as_str())).collect()))
        }
        "values" => {
            arity(name, args, 0..=0)?;
            Ok(Value::list(entries.values().cloned().collect()))
        }
        "items" => {
            arity(name, args, 0..=0)?;
            Ok(Value::list(
                entries
                    .iter()
                    .map(|(k, v)| Value::tuple(vec![Value::str(k.as_str()), v.clone()]))
                    .collect(),
            ))
        }
        _ => {
            arity(name, args, 1..=2)?;
            let found = match &args.positional[0] {
                Value::Str(key) => entries.get(&**key).cloned(),
                _ => None,
            };
            Ok(found.unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn call(recv: Value, name: &str, args: Vec<Value>) -> String {
        call_method(&recv, name, Args::new(args))
            .map(|v| v.repr())
            .unwrap_or_else(|e| e.to_string())
    }

    #[test]
    fn splitting() {
        assert_eq!(call(Value::str(" a  b c "), "split", vec![]), "['a', 'b', 'c']");
        assert_eq!(call(Value::str("a,b,,c"), "split", vec![Value::str(",")]), "['a', 'b', '', 'c']");
        assert_eq!(call(Value::str("a b c"), "split", vec![Value::None, Value::Int(1)]), "['a', 'b c']");
        assert_eq!(call(Value::str("a b c"), "rsplit", vec![Value::None, Value::Int(1)]), "['a b', 'c']");
        assert_eq!(call(Value::str("k=v=w"), "rsplit", vec![Value::str("="), Value::Int(1)]), "['k=v', 'w']");
    }

    #[test]
    fn text_helpers() {
        assert_eq!(call(Value::str("xxhixx"), "strip", vec![Value::str("x")]), "'hi'");
        assert_eq!(call(Value::str("hello world"), "title", vec![]), "'Hello World'");
        assert_eq!(call(Value::str("-42"), "zfill", vec![Value::Int(5)]), "'-0042'");
        assert_eq!(call(Value::str("a"), "zfill", vec![Value::Int(i64::MAX)]), "runtime error: integer overflow");
        assert_eq!(call(Value::str("héllo"), "find", vec![Value::str("l")]), "2");
        assert_eq!(
            call(Value::str("foo.txt"), "endswith", vec![Value::tuple(vec![Value::str(".md"), Value::str(".txt")])]),
            "True"
        );
    }

    #[test]
    fn codec_round_trip_through_methods() {
        assert_eq!(call(Value::str("🫢"), "encode", vec![]), r"b'\xf0\x9f\xab\xa2'");
        assert_eq!(call(Value::bytes(&b"caf\xe9"[..]), "decode", vec![Value::str("latin1")]), "'café'");
        assert_eq!(
            call(Value::bytes(&b"\xff"[..]), "decode", vec![]),
            "codec error: bytes are not valid UTF-8"
        );
    }

    #[test]
    fn bytes_helpers() {
        assert_eq!(call(Value::bytes(&b" ab \n"[..]), "strip", vec![]), "b'ab'");
        assert_eq!(call(Value::bytes(&b"a--b"[..]), "split", vec![Value::bytes(&b"--"[..])]), "[b'a', b'b']");
        assert_eq!(call(Value::bytes(&b"\x01\xab"[..]), "hex", vec![]), "'01ab'");
    }

    #[test]
    fn unknown_attribute() {
        assert_eq!(
            call(Value::Int(1), "upper", vec![]),
            "runtime error: 'int' object has no attribute 'upper'"
        );
    }
}
