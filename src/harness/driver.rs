//! Line tokenizer driver
//!
//! Feeds a fixture through a [`LineTokenizer`] one line at a time, threading
//! the continuation state from each line into the next, and records the
//! de-duplicated scopes seen on every line.

use crate::error::HarnessError;
use crate::textmate::{Grammar, RuleStack, TextMateError};
use std::collections::HashSet;

/// Single-line tokenization with an opaque continuation state.
pub trait LineTokenizer {
    type State;

    /// State for the first line of a file.
    fn initial_state(&self) -> Self::State;

    /// Tokenize one line (without its terminator). Returns the scope list of
    /// every token plus the state to hand to the next line.
    fn tokenize_line(
        &self,
        line: &str,
        state: &Self::State,
    ) -> Result<(Vec<Vec<String>>, Self::State), TextMateError>;
}

impl LineTokenizer for Grammar {
    type State = RuleStack;

    fn initial_state(&self) -> RuleStack {
        RuleStack::INITIAL
    }

    fn tokenize_line(
        &self,
        line: &str,
        state: &RuleStack,
    ) -> Result<(Vec<Vec<String>>, RuleStack), TextMateError> {
        let result = Grammar::tokenize_line(self, line, state)?;
        let scopes = result.tokens.into_iter().map(|token| token.scopes).collect();
        Ok((scopes, result.rule_stack))
    }
}

/// Scopes observed on one fixture line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRecord {
    /// 1-based
    pub line_number: usize,
    pub text: String,
    /// Unique scope names in first-seen order
    pub scopes: Vec<String>,
}

/// Split on `\n`, dropping a `\r` right before each terminator.
///
/// A trailing terminator yields a final empty line.
pub fn split_lines(text: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = text.split('\n').collect();
    let last = lines.len() - 1;
    for line in &mut lines[..last] {
        let text: &str = *line;
        if let Some(stripped) = text.strip_suffix('\r') {
            *line = stripped;
        }
    }
    lines
}

/// Tokenize every line of `text` in order.
pub fn tokenize_fixture<T: LineTokenizer>(
    tokenizer: &T,
    text: &str,
) -> Result<Vec<LineRecord>, HarnessError> {
    let mut state = tokenizer.initial_state();
    let mut records = Vec::new();

    for (index, line) in split_lines(text).into_iter().enumerate() {
        let line_number = index + 1;
        let (tokens, next) = tokenizer
            .tokenize_line(line, &state)
            .map_err(|source| HarnessError::Tokenize {
                line: line_number,
                source,
            })?;
        state = next;

        let mut seen = HashSet::new();
        let scopes = tokens
            .into_iter()
            .flatten()
            .filter(|scope| seen.insert(scope.clone()))
            .collect();

        records.push(LineRecord {
            line_number,
            text: line.to_string(),
            scopes,
        });
    }

    Ok(records)
}
