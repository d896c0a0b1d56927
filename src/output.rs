//! Writing evaluation results to a byte sink.

use std::io::Write;

use crate::codec;
use crate::config::OutputFormat;
use crate::errors::Result;
use crate::value::Value;

/// Write one result followed by a newline. `None` writes nothing in plain format.
///
/// Plain text is encoded with `encoding`; bytes go out untouched.
pub fn write_result<W: Write>(out: &mut W, value: &Value, format: OutputFormat, encoding: &str) -> Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer(&mut *out, value).map_err(std::io::Error::from)?;
        }
        OutputFormat::Plain => match value {
            Value::None => return Ok(()),
            Value::Bytes(raw) => out.write_all(raw)?,
            Value::Str(text) => out.write_all(&codec::to_binary(text, encoding)?)?,
            other => out.write_all(&codec::to_binary(&other.repr(), encoding)?)?,
        },
    }
    out.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn plain(value: Value, encoding: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        write_result(&mut buf, &value, OutputFormat::Plain, encoding).unwrap();
        buf
    }

    #[test]
    fn plain_strings_and_bytes_are_raw() {
        assert_eq!(plain(Value::str("foo bar"), "utf-8"), b"foo bar\n");
        assert_eq!(plain(Value::bytes(&b"\xf0\x9f"[..]), "utf-8"), b"\xf0\x9f\n");
        assert_eq!(plain(Value::str("é"), "latin1"), b"\xe9\n");
    }

    #[test]
    fn plain_none_is_silent() {
        assert_eq!(plain(Value::None, "utf-8"), b"");
    }

    #[test]
    fn plain_other_values_use_repr() {
        let v = Value::list(vec![Value::Int(1), Value::str("a"), Value::Bool(true)]);
        assert_eq!(plain(v, "utf-8"), b"[1, 'a', True]\n");
    }

    #[test]
    fn json_format() {
        let mut buf = Vec::new();
        let v = Value::list(vec![Value::None, Value::str("x")]);
        write_result(&mut buf, &v, OutputFormat::Json, "utf-8").unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "[null,\"x\"]\n");
    }

    #[test]
    fn unencodable_text_is_an_error() {
        let mut buf = Vec::new();
        assert!(write_result(&mut buf, &Value::str("🫢"), OutputFormat::Plain, "latin1").is_err());
    }
}
