//! Stream driver: turns an input stream into one binding context per evaluation.
//!
//! `ONCE_INPUT` and `ONCE_LINES` read the whole stream before yielding their
//! single context. `EACH_LINE` reads one line per `next()`, so a consumer that
//! stops early leaves the rest of the stream unread.

use std::io::BufRead;

use encoding_rs::Encoding;
use tracing::{debug, trace};

use crate::codec::{self, CodecError};
use crate::context::Context;
use crate::errors::{EvalError, Result};
use crate::mode::{ExecMode, FlavorGroup};
use crate::value::Value;

pub struct Bindings<R> {
    mode: ExecMode,
    reader: R,
    encoding: &'static Encoding,
    line_no: usize,
    done: bool,
}

/// Resolve `encoding_name` and build the driver for `mode`.
pub fn bindings<R: BufRead>(mode: ExecMode, reader: R, encoding_name: &str) -> Result<Bindings<R>> {
    let encoding = codec::lookup(encoding_name)?;
    if matches!(mode, ExecMode::OnceLines | ExecMode::EachLine) && !encoding.is_ascii_compatible() {
        return Err(CodecError::NotLineOriented { encoding: encoding.name() }.into());
    }
    Ok(Bindings::new(mode, reader, encoding))
}

impl<R: BufRead> Bindings<R> {
    pub fn new(mode: ExecMode, reader: R, encoding: &'static Encoding) -> Self {
        Self { mode, reader, encoding, line_no: 0, done: false }
    }

    pub fn mode(&self) -> ExecMode {
        self.mode
    }

    fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut raw = Vec::new();
        self.reader.read_to_end(&mut raw)?;
        debug!(bytes = raw.len(), "read whole input");
        Ok(raw)
    }

    fn whole_input(&mut self, group: &FlavorGroup) -> Result<Context> {
        let raw = self.read_all()?;
        let text = codec::decode_with(self.encoding, &raw).map(Value::str);
        Ok(Context::for_group(group, text, Value::bytes(raw), None))
    }

    fn whole_lines(&mut self, group: &FlavorGroup) -> Result<Context> {
        let raw = self.read_all()?;
        let raw_lines = split_lines(&raw);
        debug!(lines = raw_lines.len(), "split input into lines");
        let text = raw_lines
            .iter()
            .map(|line| codec::decode_with(self.encoding, line).map(Value::str))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Value::list);
        let binary = Value::list(raw_lines.into_iter().map(Value::bytes).collect());
        Ok(Context::for_group(group, text, binary, None))
    }

    fn next_line(&mut self, group: &FlavorGroup) -> Option<Result<Context>> {
        let mut raw = Vec::new();
        match self.reader.read_until(b'\n', &mut raw) {
            Ok(0) => return None,
            Ok(_) => {}
            Err(e) => {
                self.done = true;
                return Some(Err(EvalError::from(e).at_iteration(self.line_no + 1)));
            }
        }
        self.line_no += 1;
        strip_terminator(&mut raw);
        trace!(line = self.line_no, bytes = raw.len(), "read line");
        let text = codec::decode_with(self.encoding, &raw).map(Value::str);
        Some(Ok(Context::for_group(group, text, Value::bytes(raw), Some(self.line_no))))
    }
}

impl<R: BufRead> Iterator for Bindings<R> {
    type Item = Result<Context>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match (self.mode, self.mode.group()) {
            (ExecMode::EachLine, Some(group)) => {
                let item = self.next_line(group);
                if item.is_none() {
                    self.done = true;
                }
                item
            }
            (ExecMode::OnceInput, Some(group)) => {
                self.done = true;
                Some(self.whole_input(group))
            }
            (ExecMode::OnceLines, Some(group)) => {
                self.done = true;
                Some(self.whole_lines(group))
            }
            _ => {
                self.done = true;
                Some(Ok(Context::empty()))
            }
        }
    }
}

/// Drop a trailing `\n` or `\r\n`.
fn strip_terminator(line: &mut Vec<u8>) {
    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    }
}

/// Split on line terminators. A trailing terminator does not start an extra empty line.
fn split_lines(raw: &[u8]) -> Vec<Vec<u8>> {
    if raw.is_empty() {
        return Vec::new();
    }
    let body = raw.strip_suffix(b"\n").unwrap_or(raw);
    body.split(|b| *b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line).to_vec())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Slot;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn utf8() -> &'static Encoding {
        encoding_rs::UTF_8
    }

    fn text_of(ctx: &Context, name: &str) -> String {
        match ctx.lookup(name) {
            Some(Slot::Ready(v)) => v.repr(),
            other => panic!("unexpected slot {other:?}"),
        }
    }

    #[test]
    fn once_never_reads() {
        struct Exploding;
        impl std::io::Read for Exploding {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                panic!("ONCE must not read input")
            }
        }
        let reader = std::io::BufReader::new(Exploding);
        let contexts: Vec<_> = Bindings::new(ExecMode::Once, reader, utf8()).collect();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].as_ref().unwrap().names().count(), 0);
    }

    #[test]
    fn once_input_binds_whole_stream() {
        let mut it = Bindings::new(ExecMode::OnceInput, Cursor::new("a\nb\n"), utf8());
        let ctx = it.next().unwrap().unwrap();
        assert_eq!(text_of(&ctx, "input"), r"'a\nb\n'");
        assert_eq!(text_of(&ctx, "binput"), r"b'a\nb\n'");
        assert!(it.next().is_none());
    }

    #[test]
    fn once_lines_strips_terminators() {
        let mut it = Bindings::new(ExecMode::OnceLines, Cursor::new("This\r\nhas\nlines\n"), utf8());
        let ctx = it.next().unwrap().unwrap();
        assert_eq!(text_of(&ctx, "lines"), "['This', 'has', 'lines']");
        assert_eq!(text_of(&ctx, "blines"), "[b'This', b'has', b'lines']");
        assert!(it.next().is_none());
    }

    #[test]
    fn each_line_counts_iterations() {
        let contexts: Vec<_> = Bindings::new(ExecMode::EachLine, Cursor::new("Yep\nNope\nHa"), utf8())
            .map(|c| c.unwrap())
            .collect();
        assert_eq!(contexts.len(), 3);
        assert_eq!(text_of(&contexts[2], "line"), "'Ha'");
        assert_eq!(contexts[2].iteration(), Some(3));
    }

    #[test]
    fn empty_input_in_line_modes() {
        assert_eq!(Bindings::new(ExecMode::EachLine, Cursor::new(""), utf8()).count(), 0);
        let ctx = Bindings::new(ExecMode::OnceLines, Cursor::new(""), utf8()).next().unwrap().unwrap();
        assert_eq!(text_of(&ctx, "lines"), "[]");
    }

    #[test]
    fn bad_bytes_only_poison_the_text_name() {
        let ctx = Bindings::new(ExecMode::EachLine, Cursor::new(b"ok\xff\n".to_vec()), utf8())
            .next()
            .unwrap()
            .unwrap();
        assert!(matches!(ctx.lookup("line"), Some(Slot::Failed(_))));
        assert_eq!(text_of(&ctx, "bline"), r"b'ok\xff'");
    }

    #[test]
    fn utf16_rejected_for_line_modes() {
        assert!(bindings(ExecMode::EachLine, Cursor::new(""), "utf-16le").is_err());
        assert!(bindings(ExecMode::OnceInput, Cursor::new(""), "utf-16le").is_ok());
    }
}
