use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use pyline::config::DEFAULT_ENCODING;
use pyline::{detect_mode, execute, write_result, ErrorKind, ErrorPolicy, EvalError, OutputFormat, RunConfig, Value};
use tracing::{info, Level};

/// Evaluate a Python-style expression over standard input or a file.
///
/// The variables the expression uses decide how input is read:
/// `line`/`bline` run once per line, `lines`/`blines` and `input`/`binput`
/// run once over the whole input, and none of them runs once without reading.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Expression to evaluate
    expression: String,
    /// Input file (standard input when omitted or `-`)
    file: Option<PathBuf>,
    /// Encoding used to decode input and encode text output
    #[arg(short, long, env = "PYLINE_ENCODING", default_value = DEFAULT_ENCODING)]
    encoding: String,
    /// Report failing lines and keep going instead of stopping
    #[arg(short = 'k', long)]
    keep_going: bool,
    /// Print each result as JSON
    #[arg(long)]
    json: bool,
    /// Print the detected execution mode and exit without reading input
    #[arg(long)]
    mode: bool,
    /// More logging on stderr (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    // Parse CLI arguments.
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = RunConfig {
        encoding: args.encoding.clone(),
        on_error: if args.keep_going { ErrorPolicy::Continue } else { ErrorPolicy::Halt },
        format: if args.json { OutputFormat::Json } else { OutputFormat::Plain },
    };

    match run(&args, &config) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        // Downstream closed the pipe (`| head`): nothing left to do.
        Err(EvalError::Io(e)) if e.kind() == io::ErrorKind::BrokenPipe => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("pyline: {e}");
            match e.kind() {
                ErrorKind::Configuration | ErrorKind::Parse => ExitCode::from(2),
                _ => ExitCode::from(1),
            }
        }
    }
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();
}

/// Returns `Ok(false)` when some lines failed but were skipped.
fn run(args: &Args, config: &RunConfig) -> Result<bool, EvalError> {
    config.validate()?;
    let mode = detect_mode(&args.expression)?;
    if args.mode {
        println!("{mode}");
        return Ok(true);
    }

    let input: Box<dyn BufRead> = match &args.file {
        Some(path) if path.as_os_str() != "-" => Box::new(BufReader::new(File::open(path)?)),
        _ => Box::new(io::stdin().lock()),
    };
    info!(%mode, file = ?args.file, "starting");

    let results = execute(&args.expression, mode, input, &config.encoding)?;
    drain(results, &mut io::stdout().lock(), &mut io::stderr(), config)
}

/// Writes every result, reporting each skipped failure once on `diag`.
fn drain<W: Write, D: Write>(
    results: impl IntoIterator<Item = Result<Value, EvalError>>,
    out: &mut W,
    diag: &mut D,
    config: &RunConfig,
) -> Result<bool, EvalError> {
    let mut clean = true;
    for result in results {
        match result {
            Ok(value) => {
                write_result(out, &value, config.format, &config.encoding)?;
                out.flush()?;
            }
            Err(e) if config.should_continue(&e) => {
                writeln!(diag, "pyline: {e}")?;
                clean = false;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(clean)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;
    use pyline::ExecMode;

    use super::*;

    #[test]
    fn skipped_lines_are_reported_once() {
        let config = RunConfig { on_error: ErrorPolicy::Continue, ..RunConfig::default() };
        let results = execute("int(line)", ExecMode::EachLine, Cursor::new("1\nx\n3\n"), "utf-8").unwrap();
        let (mut out, mut diag) = (Vec::new(), Vec::new());
        let clean = drain(results, &mut out, &mut diag, &config).unwrap();
        assert!(!clean);
        assert_eq!(String::from_utf8(out).unwrap(), "1\n3\n");
        let diag = String::from_utf8(diag).unwrap();
        assert_eq!(diag.lines().count(), 1, "{diag}");
        assert!(diag.starts_with("pyline: line 2: runtime error"), "{diag}");
    }

    #[test]
    fn halting_stops_at_the_first_failure() {
        let config = RunConfig { on_error: ErrorPolicy::Halt, ..RunConfig::default() };
        let results = execute("int(line)", ExecMode::EachLine, Cursor::new("1\nx\n3\n"), "utf-8").unwrap();
        let (mut out, mut diag) = (Vec::new(), Vec::new());
        assert!(drain(results, &mut out, &mut diag, &config).is_err());
        assert_eq!(String::from_utf8(out).unwrap(), "1\n");
        assert!(diag.is_empty());
    }
}
