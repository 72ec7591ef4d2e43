use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use sxs::interpreter::Interpreter;
use sxs::tcs::Checker;

/// Evaluates an SLP/SXS source file.
#[derive(Parser, Debug)]
#[command(name = "sxs", version, about)]
struct Cli {
    /// Source file to evaluate.
    source: PathBuf,

    /// Additional include path for imports and kernels (repeatable).
    #[arg(long = "include", value_name = "PATH")]
    include: Vec<PathBuf>,

    /// Working directory to resolve relative paths against.
    #[arg(long = "working-dir", value_name = "PATH")]
    working_dir: Option<PathBuf>,

    /// Increase log verbosity (repeatable).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error logging.
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Type-and-scope check only; do not evaluate.
    #[arg(long = "check")]
    check_only: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    install_logging(&cli);

    if let Some(dir) = &cli.working_dir {
        if std::env::set_current_dir(dir).is_err() {
            eprintln!("error: invalid working directory: {}", dir.display());
            return ExitCode::from(2);
        }
    }

    let source = match std::fs::read_to_string(&cli.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: could not read {}: {e}", cli.source.display());
            return ExitCode::from(2);
        }
    };

    let include_paths = include_paths(&cli);

    let (cells, spans) = match sxs::parser::parse_program_with_spans(&source) {
        Ok(result) => result,
        Err(e) => {
            print_diagnostic(&e, &source);
            return ExitCode::from(1);
        }
    };

    let report = Checker::check_program_with_spans(&cells, &source, include_paths.clone(), spans).diagnostics;
    if !report.is_empty() {
        for diagnostic in &report {
            eprintln!("{}", diagnostic.render(&source, use_color()));
        }
        return ExitCode::from(1);
    }

    if cli.check_only {
        return ExitCode::SUCCESS;
    }

    let mut interpreter = Interpreter::new_root().with_include_paths(include_paths);
    match interpreter.run_source(&source) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            print_diagnostic(&e, &source);
            ExitCode::from(1)
        }
    }
}

fn include_paths(cli: &Cli) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = std::env::var("RUNTIME_INCLUDE_PATHS")
        .ok()
        .map(|v| v.split(':').map(PathBuf::from).collect())
        .unwrap_or_default();
    paths.extend(cli.include.iter().cloned());
    paths
}

fn use_color() -> bool {
    use std::io::IsTerminal;
    std::io::stderr().is_terminal()
}

fn print_diagnostic(err: &sxs::SxsError, source: &str) {
    let diagnostic = sxs::diagnostics::Diagnostic::from_error(err);
    eprintln!("{}", diagnostic.render(source, use_color()));
}

fn install_logging(cli: &Cli) {
    use tracing_subscriber::EnvFilter;

    let default_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}
