pub mod codec;
pub mod config;
pub mod context;
pub mod driver;
pub mod engine;
pub mod errors;
pub mod evaluator;
pub mod expression;
pub mod functions; // builtin functions and str/bytes methods
pub mod mode;
pub mod output;
pub mod scanner;
pub mod value;
mod comparison;
mod operators;
mod parser;

use std::io;

use errors::Result;

/// Evaluate an expression that reads no input, e.g. `sum(range(10))`.
pub fn eval(expr: &str) -> Result<Value> {
    let mut results = engine::execute(expr, ExecMode::Once, io::empty(), config::DEFAULT_ENCODING)?;
    results.next().unwrap_or(Ok(Value::None))
}

pub use codec::{to_binary, to_text, CodecError};
pub use config::{ErrorPolicy, OutputFormat, RunConfig};
pub use engine::{detect_mode, execute, execute_with, run, Results};
pub use errors::{ErrorKind, EvalError, ParseError, RuntimeError};
pub use mode::ExecMode;
pub use output::write_result;
pub use value::Value;
