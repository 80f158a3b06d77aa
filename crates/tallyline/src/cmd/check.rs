//! Implementation of the `tally-check` command.

use crate::report;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tallyline_parser::{parse_with, Grammar, ParsedFile, ParserConfig, Severity};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Output format for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output (default)
    #[default]
    Text,
    /// JSON output for IDE/tooling integration
    Json,
}

/// A diagnostic message in JSON format.
#[derive(Debug, Serialize)]
pub struct JsonDiagnostic {
    /// Source file path
    pub file: String,
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based)
    pub column: usize,
    /// End line number (1-based)
    pub end_line: usize,
    /// End column number (1-based)
    pub end_column: usize,
    /// Severity: "error" or "warning"
    pub severity: String,
    /// Error code (e.g., "P0010", "S0032")
    pub code: String,
    /// Error message
    pub message: String,
    /// Byte range dropped from the output
    pub scope: [usize; 2],
    /// Optional hint for fixing the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Optional context information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// JSON output structure for all diagnostics.
#[derive(Debug, Serialize)]
pub struct JsonOutput {
    /// List of diagnostics
    pub diagnostics: Vec<JsonDiagnostic>,
    /// Number of directives that parsed
    pub directive_count: usize,
    /// Include paths, unresolved
    pub includes: Vec<String>,
    /// Total error count
    pub error_count: usize,
    /// Total warning count
    pub warning_count: usize,
}

/// Parse a ledger file and report diagnostics.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// The ledger file to check
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Accept only the fragment grammar (options, plugins, open, close, custom)
    #[arg(long)]
    pub fragment: bool,

    /// Refuse files larger than this many bytes
    #[arg(long, value_name = "BYTES")]
    pub max_bytes: Option<usize>,

    /// Show verbose output including timing information
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress all output (just use exit code)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format (text or json)
    #[arg(long, short = 'f', value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl Args {
    /// Parser settings selected by the flags.
    pub fn config(&self) -> ParserConfig {
        let grammar = if self.fragment {
            Grammar::Fragment
        } else {
            Grammar::Full
        };
        let config = ParserConfig::default().with_grammar(grammar);
        match self.max_bytes {
            Some(limit) => config.with_max_input_bytes(limit),
            None => config,
        }
    }
}

/// Build the JSON report for a parsed file.
pub fn json_output(file: &ParsedFile, path: &Path) -> JsonOutput {
    let path = path.display().to_string();
    let diagnostics = file
        .diagnostics
        .iter()
        .map(|diag| {
            let start = file.line_index.location(diag.span.start);
            let end = file.line_index.location(diag.span.end);
            JsonDiagnostic {
                file: path.clone(),
                line: start.line,
                column: start.column,
                end_line: end.line,
                end_column: end.column,
                severity: match diag.severity {
                    Severity::Error => "error",
                    Severity::Warning => "warning",
                }
                .to_string(),
                code: diag.code(),
                message: diag.message(),
                scope: [diag.scope.start, diag.scope.end],
                hint: diag.hint.clone(),
                context: diag.context.clone(),
            }
        })
        .collect();

    JsonOutput {
        diagnostics,
        directive_count: file.directives.len(),
        includes: file.includes.iter().map(|i| i.value.clone()).collect(),
        error_count: file.error_count(),
        warning_count: file.warning_count(),
    }
}

fn run(args: &Args) -> Result<ExitCode> {
    let mut stdout = io::stdout().lock();
    let start = std::time::Instant::now();

    let source = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    info!(path = %args.file.display(), bytes = source.len(), "checking");

    let file = parse_with(&source, &args.config())
        .with_context(|| format!("failed to parse {}", args.file.display()))?;
    debug!(
        directives = file.directives.len(),
        options = file.options.len(),
        includes = file.includes.len(),
        "parse finished"
    );

    match args.format {
        OutputFormat::Json => {
            let output = json_output(&file, &args.file);
            writeln!(stdout, "{}", serde_json::to_string_pretty(&output)?)?;
        }
        OutputFormat::Text if !args.quiet => {
            let color = io::stdout().is_terminal();
            report::report_parse_errors(
                &file.diagnostics,
                &args.file,
                &source,
                &mut stdout,
                color,
            )?;
            if args.verbose {
                writeln!(
                    stdout,
                    "\n{} directives, checked in {:.2}ms",
                    file.directives.len(),
                    start.elapsed().as_secs_f64() * 1000.0
                )?;
            }
            report::print_summary(file.error_count(), file.warning_count(), &mut stdout)?;
        }
        OutputFormat::Text => {}
    }

    if file.has_errors() {
        Ok(ExitCode::from(1))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Main entry point for the check command.
pub fn main() -> ExitCode {
    let args = Args::parse();

    if args.verbose {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }

    match run(&args) {
        Ok(exit_code) => exit_code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tallyline_parser::parse;

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from([
            "tally-check",
            "--fragment",
            "--max-bytes",
            "100",
            "-f",
            "json",
            "ledger.tally",
        ]);
        assert_eq!(args.file, PathBuf::from("ledger.tally"));
        assert_eq!(args.format, OutputFormat::Json);
        let config = args.config();
        assert_eq!(config.grammar, Grammar::Fragment);
        assert_eq!(config.max_input_bytes, Some(100));
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Args::try_parse_from(["tally-check", "-q", "-v", "x.tally"]).is_err());
    }

    #[test]
    fn test_json_output_locations() {
        let source = "include \"a.tally\"\n2024-01-01 open Assets:Cash\n2024-01-02 open Assets:Cash XX-\n";
        let file = parse(source);
        let output = json_output(&file, Path::new("main.tally"));
        assert_eq!(output.directive_count, 1);
        assert_eq!(output.includes, vec!["a.tally"]);
        assert_eq!(output.error_count, 1);
        let diag = &output.diagnostics[0];
        assert_eq!(diag.line, 3);
        assert_eq!(diag.severity, "error");
        assert!(diag.code.starts_with('S'), "{}", diag.code);

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["diagnostics"][0]["file"], "main.tally");
        assert!(json["diagnostics"][0].get("hint").is_none());
        assert_eq!(json["diagnostics"][0]["context"], "in open directive");
    }
}
