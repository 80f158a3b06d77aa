//! Parser configuration.

use serde::{Deserialize, Serialize};

/// The account roots accepted by default.
pub const DEFAULT_ACCOUNT_ROOTS: [&str; 5] = ["Assets", "Liabilities", "Equity", "Income", "Expenses"];

/// Which directives a parse accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grammar {
    /// Every directive.
    #[default]
    Full,
    /// Only `option`, `include`, `plugin`, `pushtag`, `poptag`, `custom`,
    /// `open` and `close`. Used for configuration snippets.
    Fragment,
}

impl Grammar {
    /// Whether a directive introduced by `keyword` is accepted.
    pub fn allows(self, keyword: &str) -> bool {
        match self {
            Self::Full => true,
            Self::Fragment => matches!(
                keyword,
                "option" | "include" | "plugin" | "pushtag" | "poptag" | "custom" | "open" | "close"
            ),
        }
    }
}

/// Options for [`parse_with`](crate::parse_with).
///
/// ```
/// use tallyline_parser::{Grammar, ParserConfig};
///
/// let config = ParserConfig::default()
///     .with_grammar(Grammar::Fragment)
///     .with_max_input_bytes(1 << 20);
/// assert_eq!(config.account_roots.len(), 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Full or fragment grammar.
    pub grammar: Grammar,
    /// Reject inputs larger than this many bytes.
    pub max_input_bytes: Option<usize>,
    /// Allowed first segments of account names.
    pub account_roots: Vec<String>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            grammar: Grammar::Full,
            max_input_bytes: None,
            account_roots: DEFAULT_ACCOUNT_ROOTS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl ParserConfig {
    /// Config for the fragment grammar.
    pub fn fragment() -> Self {
        Self::default().with_grammar(Grammar::Fragment)
    }

    /// Set the grammar.
    #[must_use]
    pub const fn with_grammar(mut self, grammar: Grammar) -> Self {
        self.grammar = grammar;
        self
    }

    /// Set the input size limit.
    #[must_use]
    pub const fn with_max_input_bytes(mut self, limit: usize) -> Self {
        self.max_input_bytes = Some(limit);
        self
    }

    /// Replace the allowed account roots.
    #[must_use]
    pub fn with_account_roots<I, S>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.account_roots = roots.into_iter().map(Into::into).collect();
        self
    }
}
