//! Oniguruma-backed regex sources
//!
//! A grammar pattern is compiled lazily into up to four variants, one per
//! combination of "`\A` allowed" and "`\G` allowed". A disallowed anchor is
//! rewritten to U+FFFF, which never occurs in source text, so the pattern
//! simply cannot match through it.

use super::TextMateError;
use once_cell::sync::Lazy;
use once_cell::unsync::OnceCell;
use onig::{Region, RegexOptions, SearchOptions, Syntax};
use regex::Regex;
use std::fmt;
use tracing::warn;

static BACK_REFERENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\(\d+)").unwrap());

const NEVER: char = '\u{FFFF}';

/// Byte ranges of every capture group of a match, group 0 first
pub type CaptureSpans = Vec<Option<(usize, usize)>>;

pub(crate) struct RegexSource {
    source: String,
    has_anchor: bool,
    has_back_references: bool,
    compiled: [OnceCell<onig::Regex>; 4],
}

impl RegexSource {
    /// Wrap a pattern and make sure Oniguruma accepts it.
    ///
    /// Patterns with back-references can only be compiled once the begin
    /// captures are known, so those are checked later.
    pub fn new(source: &str) -> Result<Self, TextMateError> {
        let regex = Self::unchecked(source);
        if !regex.has_back_references {
            regex.variant(true, true)?;
        }
        Ok(regex)
    }

    fn unchecked(source: &str) -> Self {
        RegexSource {
            source: source.to_string(),
            has_anchor: has_anchor(source),
            has_back_references: BACK_REFERENCE.is_match(source),
            compiled: Default::default(),
        }
    }

    #[cfg(test)]
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn has_back_references(&self) -> bool {
        self.has_back_references
    }

    /// Substitute `\N` with the escaped text of begin capture `N`.
    pub fn resolve_back_references(&self, text: &str, captures: &CaptureSpans) -> RegexSource {
        let resolved = BACK_REFERENCE.replace_all(&self.source, |caps: &regex::Captures| {
            let captured = caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|index| captures.get(index).copied().flatten())
                .map(|(start, end)| &text[start..end])
                .unwrap_or("");
            escape(captured)
        });
        let regex = RegexSource::unchecked(&resolved);
        if let Err(err) = regex.variant(true, true) {
            warn!(%err, "resolved pattern does not compile, it will never match");
            return RegexSource::unchecked(&NEVER.to_string());
        }
        regex
    }

    /// Search `text` from byte offset `start`, returning all capture spans
    /// of the leftmost match.
    pub fn search(
        &self,
        text: &str,
        start: usize,
        allow_a: bool,
        allow_g: bool,
    ) -> Result<Option<CaptureSpans>, TextMateError> {
        if start > text.len() {
            return Ok(None);
        }
        let regex = self.variant(allow_a, allow_g)?;
        let mut region = Region::new();
        let found = regex.search_with_options(
            text,
            start,
            text.len(),
            SearchOptions::SEARCH_OPTION_NONE,
            Some(&mut region),
        );
        Ok(found.map(|_| (0..region.len()).map(|i| region.pos(i)).collect()))
    }

    fn variant(&self, allow_a: bool, allow_g: bool) -> Result<&onig::Regex, TextMateError> {
        let (allow_a, allow_g) = if self.has_anchor {
            (allow_a, allow_g)
        } else {
            (true, true)
        };
        let slot = (usize::from(allow_a) << 1) | usize::from(allow_g);
        self.compiled[slot].get_or_try_init(|| {
            let pattern = if self.has_anchor {
                rewrite_anchors(&self.source, allow_a, allow_g)
            } else {
                self.source.clone()
            };
            onig::Regex::with_options(
                &pattern,
                RegexOptions::REGEX_OPTION_CAPTURE_GROUP,
                Syntax::default(),
            )
            .map_err(|err| TextMateError::InvalidRegex {
                pattern: self.source.clone(),
                message: err.to_string(),
            })
        })
    }
}

impl fmt::Debug for RegexSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RegexSource").field(&self.source).finish()
    }
}

fn has_anchor(source: &str) -> bool {
    let mut chars = source.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some('A' | 'G') = chars.next() {
                return true;
            }
        }
    }
    false
}

fn rewrite_anchors(source: &str, allow_a: bool, allow_g: bool) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('A') if !allow_a => out.push(NEVER),
            Some('G') if !allow_g => out.push(NEVER),
            Some(next) => {
                out.push('\\');
                out.push(next);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Escape regex metacharacters so `text` matches literally.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    for c in text.chars() {
        if matches!(
            c,
            '-' | '\\' | '{' | '}' | '*' | '+' | '?' | '|' | '^' | '$' | '.' | ',' | '[' | ']'
                | '(' | ')' | '#'
        ) || c.is_whitespace()
        {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(regex: &RegexSource, text: &str, start: usize) -> Option<CaptureSpans> {
        regex.search(text, start, true, true).unwrap()
    }

    #[test]
    fn finds_leftmost_match_from_offset() {
        let regex = RegexSource::new(r"(e)cho").unwrap();
        let found = spans(&regex, "echo; echo", 1).unwrap();
        assert_eq!(found, vec![Some((6, 10)), Some((6, 7))]);
    }

    #[test]
    fn invalid_patterns_are_rejected_up_front() {
        let err = RegexSource::new("(unclosed").unwrap_err();
        assert!(matches!(err, TextMateError::InvalidRegex { .. }));
    }

    #[test]
    fn g_anchor_only_matches_when_allowed() {
        let regex = RegexSource::new(r"\Gfoo").unwrap();
        assert!(regex.search("xfoo", 1, false, true).unwrap().is_some());
        assert!(regex.search("xfoo", 1, false, false).unwrap().is_none());
    }

    #[test]
    fn a_anchor_only_matches_on_first_line() {
        let regex = RegexSource::new(r"\A#!").unwrap();
        assert!(regex.search("#!/bin/sh", 0, true, false).unwrap().is_some());
        assert!(regex.search("#!/bin/sh", 0, false, false).unwrap().is_none());
    }

    #[test]
    fn escaped_backslash_is_not_an_anchor() {
        assert!(!has_anchor(r"\\G"));
        assert!(has_anchor(r"x\\\G"));
    }

    #[test]
    fn back_references_resolve_to_escaped_begin_text() {
        let end = RegexSource::new(r"^\s*\1$").unwrap();
        assert!(end.has_back_references());

        let text = "<<EOF.*\n";
        let begin = vec![Some((0, 7)), Some((2, 7))];
        let resolved = end.resolve_back_references(text, &begin);
        assert_eq!(resolved.source(), r"^\s*EOF\.\*$");
        assert!(resolved.search("  EOF.*\n", 0, true, true).unwrap().is_some());
        assert!(resolved.search("  EOFxx\n", 0, true, true).unwrap().is_none());
    }
}
