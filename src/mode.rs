//! Execution modes and the variable groups that select them.

use std::collections::BTreeSet;
use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{EvalError, Result};
use crate::scanner::scan;

/// How many times the expression runs, and what it sees each time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecMode {
    /// Evaluate once with no input variable.
    Once,
    /// Evaluate once with the whole input bound.
    OnceInput,
    /// Evaluate once with the whole input bound as a list of lines.
    OnceLines,
    /// Evaluate once per input line.
    EachLine,
}

/// A text-valued name and its bytes-valued twin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlavorGroup {
    pub text: &'static str,
    pub binary: &'static str,
    pub mode: ExecMode,
}

impl FlavorGroup {
    pub fn names(&self) -> [&'static str; 2] {
        [self.text, self.binary]
    }
}

pub static GROUPS: [FlavorGroup; 3] = [
    FlavorGroup { text: "input", binary: "binput", mode: ExecMode::OnceInput },
    FlavorGroup { text: "lines", binary: "blines", mode: ExecMode::OnceLines },
    FlavorGroup { text: "line", binary: "bline", mode: ExecMode::EachLine },
];

impl ExecMode {
    /// The variable group bound in this mode; `None` for [`ExecMode::Once`].
    pub fn group(self) -> Option<&'static FlavorGroup> {
        GROUPS.iter().find(|g| g.mode == self)
    }
}

impl fmt::Display for ExecMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExecMode::Once => "ONCE",
            ExecMode::OnceInput => "ONCE_INPUT",
            ExecMode::OnceLines => "ONCE_LINES",
            ExecMode::EachLine => "EACH_LINE",
        })
    }
}

/// Map a free-identifier set to a mode. Names from two different groups abort.
pub fn classify(identifiers: &BTreeSet<String>) -> Result<ExecMode> {
    let hits: Vec<(&FlavorGroup, Vec<&'static str>)> = GROUPS
        .iter()
        .map(|group| {
            let used = group
                .names()
                .into_iter()
                .filter(|name| identifiers.contains(*name))
                .collect::<Vec<_>>();
            (group, used)
        })
        .filter(|(_, used)| !used.is_empty())
        .collect();

    match hits.as_slice() {
        [] => Ok(ExecMode::Once),
        [(group, _)] => Ok(group.mode),
        _ => {
            let conflicting = hits.iter().flat_map(|(_, used)| used.iter()).join(", ");
            Err(EvalError::Abort(format!(
                "expression mixes variables from incompatible modes: {conflicting}"
            )))
        }
    }
}

/// Scan an expression and pick its execution mode.
pub fn detect_mode(expression: &str) -> Result<ExecMode> {
    let free = scan(expression)?;
    let mode = classify(&free)?;
    debug!(%mode, free = ?free, "detected execution mode");
    Ok(mode)
}
