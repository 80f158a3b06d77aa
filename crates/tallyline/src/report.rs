//! Error reporting with source-annotated diagnostics.
//!
//! Uses ariadne for pretty-printed error messages with source context.

use ariadne::{Color, Config, Label, Report, ReportKind, Source};
use std::io::Write;
use std::path::Path;
use tallyline_parser::{ParseError, Severity};

/// Write one report per diagnostic. Returns how many were written.
pub fn report_parse_errors<W: Write>(
    errors: &[ParseError],
    source_path: &Path,
    source: &str,
    writer: &mut W,
    color: bool,
) -> std::io::Result<usize> {
    let path_str = source_path.display().to_string();
    let path = path_str.as_str();

    for error in errors {
        let (start, end) = error.span();
        let (kind, tint) = match error.severity {
            Severity::Error => (ReportKind::Error, Color::Red),
            Severity::Warning => (ReportKind::Warning, Color::Yellow),
        };

        let mut report = Report::build(kind, (path, start..end))
            .with_code(error.code())
            .with_message(error.message())
            .with_label(
                Label::new((path, start..end))
                    .with_message(error.label())
                    .with_color(tint),
            )
            .with_config(Config::default().with_compact(false).with_color(color));

        if error.scope != error.span && error.is_error() {
            report = report.with_label(
                Label::new((path, error.scope.start..error.scope.end))
                    .with_message("dropped from output")
                    .with_color(Color::Fixed(244))
                    .with_order(1),
            );
        }
        if let Some(hint) = &error.hint {
            report = report.with_help(hint);
        }
        if let Some(context) = &error.context {
            report = report.with_note(context);
        }

        report
            .finish()
            .write((path, Source::from(source)), &mut *writer)?;
    }

    Ok(errors.len())
}

/// Print a summary of errors and warnings.
pub fn print_summary<W: Write>(
    errors: usize,
    warnings: usize,
    writer: &mut W,
) -> std::io::Result<()> {
    if errors == 0 && warnings == 0 {
        writeln!(writer, "\x1b[32m\u{2713}\x1b[0m No errors found")?;
    } else {
        let error_text = if errors == 1 { "error" } else { "errors" };
        let warning_text = if warnings == 1 { "warning" } else { "warnings" };

        if errors > 0 && warnings > 0 {
            writeln!(
                writer,
                "\x1b[31m\u{2717}\x1b[0m {errors} {error_text}, {warnings} {warning_text}"
            )?;
        } else if errors > 0 {
            writeln!(writer, "\x1b[31m\u{2717}\x1b[0m {errors} {error_text}")?;
        } else {
            writeln!(writer, "\x1b[33m\u{26A0}\x1b[0m {warnings} {warning_text}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tallyline_parser::parse;

    #[test]
    fn test_report_contains_code_and_message() {
        let source = "2024-01-01 open Bogus:Cash\n";
        let file = parse(source);
        let mut out = Vec::new();
        let count =
            report_parse_errors(&file.diagnostics, Path::new("main.tally"), source, &mut out, false)
                .unwrap();
        assert_eq!(count, 1);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("S0030"), "{text}");
        assert!(text.contains("invalid account 'Bogus:Cash'"), "{text}");
        assert!(text.contains("main.tally"), "{text}");
        assert!(text.contains("in open directive"), "{text}");
    }

    #[test]
    fn test_summary_wording() {
        let mut out = Vec::new();
        print_summary(1, 2, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("1 error, 2 warnings"));

        let mut out = Vec::new();
        print_summary(0, 0, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("No errors found"));
    }
}
