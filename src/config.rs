use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::errors::{EvalError, Result};

pub const DEFAULT_ENCODING: &str = "utf-8";

/// What to do when one line's evaluation fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// Stop at the first failure.
    #[default]
    Halt,
    /// Report the failure and carry on with the next line.
    Continue,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Strings and bytes written raw, everything else as its repr.
    #[default]
    Plain,
    /// One JSON document per result.
    Json,
}

/// Run options shared by the CLI and library callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub encoding: String,
    pub on_error: ErrorPolicy,
    pub format: OutputFormat,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            encoding: DEFAULT_ENCODING.to_string(),
            on_error: ErrorPolicy::default(),
            format: OutputFormat::default(),
        }
    }
}

impl RunConfig {
    /// Fails on an unknown encoding label.
    pub fn validate(&self) -> Result<()> {
        codec::lookup(&self.encoding)?;
        Ok(())
    }

    /// Whether a failed result should be skipped rather than end the run.
    /// Only failures tied to a single line can be skipped.
    pub fn should_continue(&self, err: &EvalError) -> bool {
        self.on_error == ErrorPolicy::Continue
            && matches!(err, EvalError::Iteration { source, .. } if !matches!(**source, EvalError::Io(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RuntimeError;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg: RunConfig = serde_json::from_str(r#"{"on_error": "continue"}"#).unwrap();
        assert_eq!(
            cfg,
            RunConfig { on_error: ErrorPolicy::Continue, ..RunConfig::default() }
        );
        assert_eq!(cfg.encoding, "utf-8");
    }

    #[test]
    fn validate_rejects_unknown_encoding() {
        let cfg = RunConfig { encoding: "klingon".into(), ..RunConfig::default() };
        assert!(matches!(cfg.validate(), Err(EvalError::Codec(_))));
        assert!(RunConfig::default().validate().is_ok());
    }

    #[test]
    fn only_line_failures_are_skippable() {
        let keep_going = RunConfig { on_error: ErrorPolicy::Continue, ..RunConfig::default() };
        let line_err = EvalError::from(RuntimeError::ZeroDivision).at_iteration(4);
        let whole_err = EvalError::from(RuntimeError::ZeroDivision);
        let io_err = EvalError::from(std::io::Error::other("gone")).at_iteration(2);
        assert!(keep_going.should_continue(&line_err));
        assert!(!keep_going.should_continue(&whole_err));
        assert!(!keep_going.should_continue(&io_err));
        assert!(!RunConfig::default().should_continue(&line_err));
    }
}
