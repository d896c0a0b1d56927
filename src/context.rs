use std::collections::HashMap;

use crate::codec::CodecError;
use crate::mode::FlavorGroup;
use crate::value::Value;

/// A bound name's value. Text that failed to decode keeps the error, which is
/// raised only if the expression actually reads that name.
#[derive(Debug, Clone)]
pub enum Slot {
    Ready(Value),
    Failed(CodecError),
}

/// Bindings for one evaluation. Built once by the stream driver, consumed by
/// one evaluation, then dropped.
#[derive(Debug, Clone, Default)]
pub struct Context {
    bindings: HashMap<&'static str, Slot>,
    iteration: Option<usize>,
}

impl Context {
    /// A context with nothing bound.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Bind both names of `group`.
    pub fn for_group(
        group: &FlavorGroup,
        text: Result<Value, CodecError>,
        binary: Value,
        iteration: Option<usize>,
    ) -> Self {
        let mut bindings = HashMap::with_capacity(2);
        bindings.insert(
            group.text,
            match text {
                Ok(v) => Slot::Ready(v),
                Err(e) => Slot::Failed(e),
            },
        );
        bindings.insert(group.binary, Slot::Ready(binary));
        Self { bindings, iteration }
    }

    pub fn lookup(&self, name: &str) -> Option<&Slot> {
        self.bindings.get(name)
    }

    /// 1-based line number in per-line mode.
    pub fn iteration(&self) -> Option<usize> {
        self.iteration
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.bindings.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::GROUPS;

    #[test]
    fn binds_both_flavors() {
        let ctx = Context::for_group(&GROUPS[2], Ok(Value::str("Yep")), Value::bytes(&b"Yep"[..]), Some(1));
        let mut names: Vec<_> = ctx.names().collect();
        names.sort();
        assert_eq!(names, vec!["bline", "line"]);
        assert!(matches!(ctx.lookup("line"), Some(Slot::Ready(Value::Str(s))) if &**s == "Yep"));
        assert_eq!(ctx.iteration(), Some(1));
    }

    #[test]
    fn failed_decode_is_kept() {
        let err = CodecError::Decode { encoding: "UTF-8" };
        let ctx = Context::for_group(&GROUPS[0], Err(err.clone()), Value::bytes(&b"\xff"[..]), None);
        assert!(matches!(ctx.lookup("input"), Some(Slot::Failed(e)) if *e == err));
        assert!(matches!(ctx.lookup("binput"), Some(Slot::Ready(Value::Bytes(_)))));
        assert!(ctx.lookup("line").is_none());
    }
}
