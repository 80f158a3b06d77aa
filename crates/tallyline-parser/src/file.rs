//! Whole-file parsing.

use serde::Serialize;
use tallyline_core::{Directive, MetaValue};
use tracing::{debug, trace};

use crate::config::ParserConfig;
use crate::error::{FatalError, ParseError, ParseErrorKind, Severity};
use crate::grammar::GrammarParser;
use crate::lexer::tokenize;
use crate::line_index::{LineIndex, Location};
use crate::synth::Synthesizer;
use crate::syntax::{Entry, EntryNode};
use crate::{Span, Spanned};

/// An `option` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionEntry {
    /// Option name.
    pub name: String,
    /// Option value.
    pub value: String,
    /// The directive.
    pub span: Span,
}

/// A `plugin` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginEntry {
    /// Module name.
    pub module: String,
    /// Optional configuration string.
    pub config: Option<String>,
    /// The directive.
    pub span: Span,
}

/// Everything recovered from one source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedFile {
    /// `include` paths, unresolved.
    pub includes: Vec<Spanned<String>>,
    /// Options in source order, duplicates kept.
    pub options: Vec<OptionEntry>,
    /// Plugins in source order.
    pub plugins: Vec<PluginEntry>,
    /// Dated directives in source order.
    pub directives: Vec<Spanned<Directive>>,
    /// Errors and warnings, ordered by position.
    pub diagnostics: Vec<ParseError>,
    /// Offset to line/column lookup for this source.
    #[serde(skip)]
    pub line_index: LineIndex,
}

impl ParsedFile {
    /// Line and column of a span's start.
    pub fn locate(&self, span: Span) -> Location {
        self.line_index.locate(span)
    }

    /// Whether any diagnostic is an error.
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(ParseError::is_error)
    }

    /// Number of error diagnostics.
    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    /// Number of warning diagnostics.
    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }
}

/// Parse with the full grammar and default settings.
///
/// ```
/// let file = tallyline_parser::parse("2024-01-01 open Assets:Cash USD\n");
/// assert_eq!(file.directives.len(), 1);
/// assert!(file.diagnostics.is_empty());
/// ```
pub fn parse(source: &str) -> ParsedFile {
    build(source, &ParserConfig::default())
}

/// Parse with the fragment grammar.
pub fn parse_fragment(source: &str) -> ParsedFile {
    build(source, &ParserConfig::fragment())
}

/// Parse with explicit settings.
///
/// # Errors
///
/// Returns [`FatalError::InputTooLarge`] when `source` exceeds
/// `config.max_input_bytes`. Nothing else is fatal.
pub fn parse_with(source: &str, config: &ParserConfig) -> Result<ParsedFile, FatalError> {
    if let Some(limit) = config.max_input_bytes {
        if source.len() > limit {
            return Err(FatalError::InputTooLarge {
                size: source.len(),
                limit,
            });
        }
    }
    Ok(build(source, config))
}

fn build(source: &str, config: &ParserConfig) -> ParsedFile {
    debug!(bytes = source.len(), grammar = ?config.grammar, "parsing");

    let tokens = tokenize(source);
    let mut grammar = GrammarParser::new(config.grammar);
    let entries = grammar.parse(&tokens);

    let mut builder = FileBuilder {
        synth: Synthesizer::new(source, config),
        file: ParsedFile {
            includes: Vec::new(),
            options: Vec::new(),
            plugins: Vec::new(),
            directives: Vec::new(),
            diagnostics: grammar.into_diagnostics(),
            line_index: LineIndex::new(source),
        },
        tags: Vec::new(),
        meta: Vec::new(),
        diagnostics: Vec::new(),
    };
    for entry in entries {
        builder.push(entry);
    }
    let file = builder.finish();

    debug!(
        tokens = tokens.len(),
        directives = file.directives.len(),
        errors = file.error_count(),
        warnings = file.warning_count(),
        "parsed"
    );
    file
}

/// Applies entries in order, tracking pushed tags and metadata.
struct FileBuilder<'a> {
    synth: Synthesizer<'a>,
    file: ParsedFile,
    tags: Vec<Spanned<String>>,
    meta: Vec<(String, MetaValue)>,
    diagnostics: Vec<ParseError>,
}

impl FileBuilder<'_> {
    fn push(&mut self, entry: Entry<'_>) {
        let Entry {
            node,
            span,
            diagnostics,
        } = entry;
        match node {
            EntryNode::Dated { date, node, meta } => {
                if let Some(directive) = self.synth.directive(date, node, meta, span) {
                    let directive = self.apply_pushed(directive);
                    self.file.directives.push(Spanned::new(directive, span));
                    self.diagnostics.extend(diagnostics);
                }
            }
            EntryNode::Option { name, value } => self.file.options.push(OptionEntry {
                name: name.value,
                value: value.value,
                span,
            }),
            EntryNode::Include(path) => self.file.includes.push(Spanned::new(path.value, span)),
            EntryNode::Plugin { module, config } => self.file.plugins.push(PluginEntry {
                module: module.value,
                config: config.map(|c| c.value),
                span,
            }),
            EntryNode::Pushtag(tag) => self.tags.push(Spanned::new(tag.text.to_string(), span)),
            EntryNode::Poptag(tag) => {
                match self.tags.iter().rposition(|t| t.value == tag.text) {
                    Some(pos) => {
                        self.tags.remove(pos);
                    }
                    None => self.diagnostics.push(
                        ParseError::new(
                            ParseErrorKind::UnmatchedPoptag(tag.text.to_string()),
                            tag.span,
                        )
                        .with_scope(span),
                    ),
                }
            }
            EntryNode::Pushmeta(node) => match self.synth.meta_value(&node.value) {
                Ok(value) => self.meta.push((node.key.to_string(), value)),
                Err(err) => {
                    trace!(span = %span, error = %err, "dropping pushmeta");
                    self.diagnostics.push(err.with_scope(span));
                }
            },
            EntryNode::Popmeta(key) => match self.meta.iter().rposition(|(k, _)| k == key.text) {
                Some(pos) => {
                    self.meta.remove(pos);
                }
                None => self.diagnostics.push(
                    ParseError::new(
                        ParseErrorKind::UnmatchedPopmeta(key.text.to_string()),
                        key.span,
                    )
                    .with_scope(span),
                ),
            },
        }
    }

    /// Pushed tags go on transactions, pushed metadata on every directive
    /// that does not set the key itself.
    fn apply_pushed(&self, mut directive: Directive) -> Directive {
        if let Directive::Transaction(txn) = &mut directive {
            for tag in &self.tags {
                txn.tags.insert(tag.value.clone());
            }
        }
        let meta = directive.meta_mut();
        for (key, value) in &self.meta {
            meta.entry(key.clone()).or_insert_with(|| value.clone());
        }
        directive
    }

    fn finish(mut self) -> ParsedFile {
        for tag in &self.tags {
            self.diagnostics.push(
                ParseError::new(ParseErrorKind::UnclosedPushtag(tag.value.clone()), tag.span)
                    .warning(),
            );
        }
        let mut file = self.file;
        file.diagnostics.extend(self.synth.into_diagnostics());
        file.diagnostics.extend(self.diagnostics);
        file.diagnostics.sort_by_key(|d| (d.scope.start, d.span.start));
        file
    }
}
