//! TextMate grammar engine
//!
//! Loads vscode-style `tmLanguage` grammars (JSON or YAML), compiles their
//! rules on top of Oniguruma and tokenizes text one line at a time, threading
//! an opaque [`RuleStack`] from each line to the next.
//!
//!     let registry = Registry::new(source);
//!     let grammar = registry.load_grammar("source.nix")?.expect("grammar");
//!     let mut stack = RuleStack::INITIAL;
//!     for line in text.lines() {
//!         let result = grammar.tokenize_line(line, &stack)?;
//!         stack = result.rule_stack;
//!     }
//!
//! Grammar injections are parsed but not applied.

mod pattern;
pub mod raw;
mod registry;
mod rule;
mod stack;
mod tokenizer;

pub use pattern::CaptureSpans;
pub use raw::{RawGrammar, RawRule};
pub use registry::{Grammar, GrammarSource, Registry};
pub use stack::RuleStack;
pub use tokenizer::{Token, TokenizedLine};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TextMateError {
    #[error("invalid JSON grammar: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid YAML grammar: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("invalid regex `{pattern}`: {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("could not load grammar {scope}: {message}")]
    Source { scope: String, message: String },
}
