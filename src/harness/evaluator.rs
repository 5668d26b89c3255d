//! Expectation evaluator
//!
//! Every check resolves to a target line through an ordered fallback over
//! `match`, `line`, `afterMatch` and `afterLine`, then asserts on the scopes
//! recorded for that line. Checks are independent: each problem becomes a
//! [`Failure`] and evaluation moves on to the next check.

use super::driver::LineRecord;
use super::expectations::{Check, Field};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Why a single check failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckError {
    #[error("could not resolve target line")]
    Unresolved,

    #[error("afterMatch not found: {0}")]
    AfterMatchNotFound(String),

    #[error("no non-empty line after afterMatch: {0}")]
    NoLineAfterMatch(String),

    #[error("no non-empty line after afterLine: {0}")]
    NoLineAfterLine(usize),

    #[error("Expected any of: {}", json_list(.expected))]
    ExpectedAny { expected: Vec<String> },

    #[error("Expected none of: {}", json_list(.expected))]
    ExpectedNone { expected: Vec<String> },

    #[error("missing hasAny/notHasAny")]
    MissingAssertion,

    #[error("invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

fn json_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_default()
}

/// The usable value of `field`, `None` when absent.
fn usable<'c, T>(field: &'c Field<T>, name: &'static str) -> Result<Option<&'c T>, CheckError> {
    match field {
        Field::Absent => Ok(None),
        Field::Value(value) => Ok(Some(value)),
        Field::Invalid(value) => Err(CheckError::InvalidField {
            field: name,
            value: value.clone(),
        }),
    }
}

/// A failed check with enough context to find the grammar defect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub index: usize,
    pub fixture: String,
    pub target: Option<usize>,
    pub note: Option<String>,
    pub scope_sample: Vec<String>,
    pub error: CheckError,
}

impl fmt::Display for Failure {
    /// Failures without a target line print as a bare message. Once a line
    /// was resolved, the full context follows:
    ///
    /// ```text
    /// check[0]: FAIL: fixture.nix: check[0] -> line 3 (note)
    /// Expected any of: ["source.bash"]
    /// Scopes sample: ["source.nix.embedded"]
    /// ```
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "check[{}]: ", self.index)?;
        let Some(line) = self.target else {
            return write!(f, "{}", self.error);
        };

        write!(f, "FAIL: {}: check[{}] -> line {line}", self.fixture, self.index)?;
        if let Some(note) = self.note.as_deref().filter(|note| !note.is_empty()) {
            write!(f, " ({note})")?;
        }
        write!(
            f,
            "\n{}\nScopes sample: {}",
            self.error,
            json_list(&self.scope_sample)
        )
    }
}

/// `needle` is present if it equals a scope or occurs inside one.
pub fn scopes_contain(scopes: &[String], needle: &str) -> bool {
    scopes
        .iter()
        .any(|scope| scope == needle || scope.contains(needle))
}

/// Evaluates checks against the line records of one fixture
pub struct Evaluator<'a> {
    fixture: String,
    records: &'a [LineRecord],
    scope_sample: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(fixture: &Path, records: &'a [LineRecord], scope_sample: usize) -> Self {
        Evaluator {
            fixture: fixture.display().to_string(),
            records,
            scope_sample,
        }
    }

    /// Evaluate all checks in order, collecting every failure.
    pub fn evaluate(&self, checks: &[Check]) -> Vec<Failure> {
        checks
            .iter()
            .enumerate()
            .filter_map(|(index, check)| self.evaluate_check(index, check))
            .collect()
    }

    fn evaluate_check(&self, index: usize, check: &Check) -> Option<Failure> {
        let target = match self.resolve_target(check) {
            Ok(target) => target,
            Err(error) => return Some(self.failure(index, check, None, error)),
        };
        let error = self.assert_scopes(check, self.scopes(target)).err()?;
        Some(self.failure(index, check, Some(target), error))
    }

    fn failure(&self, index: usize, check: &Check, target: Option<usize>, error: CheckError) -> Failure {
        let scope_sample = target
            .map(|line| self.scopes(line))
            .unwrap_or_default()
            .iter()
            .take(self.scope_sample)
            .cloned()
            .collect();
        Failure {
            index,
            fixture: self.fixture.clone(),
            target,
            note: check.note.clone(),
            scope_sample,
            error,
        }
    }

    /// Resolve the 1-based target line, trying each addressing field in turn.
    pub fn resolve_target(&self, check: &Check) -> Result<usize, CheckError> {
        if let Some(line) = check.match_.as_deref().and_then(|text| self.find_line(text)) {
            return Ok(line);
        }
        if let Some(&line) = usable(&check.line, "line")? {
            return Ok(line);
        }
        if let Some(text) = check.after_match.as_deref() {
            let found = self
                .find_line(text)
                .ok_or_else(|| CheckError::AfterMatchNotFound(text.to_string()))?;
            return self
                .next_non_blank(found)
                .ok_or_else(|| CheckError::NoLineAfterMatch(text.to_string()));
        }
        if let Some(&line) = usable(&check.after_line, "afterLine")? {
            return self
                .next_non_blank(line)
                .ok_or(CheckError::NoLineAfterLine(line));
        }
        Err(CheckError::Unresolved)
    }

    fn assert_scopes(&self, check: &Check, scopes: &[String]) -> Result<(), CheckError> {
        if let Some(any) = usable(&check.has_any, "hasAny")? {
            if !any.iter().any(|needle| scopes_contain(scopes, needle)) {
                return Err(CheckError::ExpectedAny {
                    expected: any.clone(),
                });
            }
        }
        if let Some(none) = usable(&check.not_has_any, "notHasAny")? {
            if none.iter().any(|needle| scopes_contain(scopes, needle)) {
                return Err(CheckError::ExpectedNone {
                    expected: none.clone(),
                });
            }
        }
        if check.has_any.is_absent() && check.not_has_any.is_absent() {
            return Err(CheckError::MissingAssertion);
        }
        Ok(())
    }

    /// Scopes of a 1-based line; empty when the line has no record.
    fn scopes(&self, line: usize) -> &'a [String] {
        line.checked_sub(1)
            .and_then(|index| self.records.get(index))
            .map(|record| record.scopes.as_slice())
            .unwrap_or(&[])
    }

    fn find_line(&self, text: &str) -> Option<usize> {
        self.records
            .iter()
            .find(|record| record.text.contains(text))
            .map(|record| record.line_number)
    }

    /// First non-blank line strictly after the 1-based line `after`.
    fn next_non_blank(&self, after: usize) -> Option<usize> {
        self.records
            .iter()
            .skip(after)
            .find(|record| !record.text.trim().is_empty())
            .map(|record| record.line_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn record(line_number: usize, text: &str, scopes: &[&str]) -> LineRecord {
        LineRecord {
            line_number,
            text: text.to_string(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn fixture() -> Vec<LineRecord> {
        vec![
            record(1, "{", &["source.nix.embedded"]),
            record(2, "  style = ''", &["source.nix.embedded", "string.quoted.other.nix"]),
            record(
                3,
                "    echo { color: red; }",
                &["source.nix.embedded", "source.css.embedded.nix.something"],
            ),
            record(4, "  '';", &["source.nix.embedded", "string.quoted.other.nix"]),
            record(5, "", &[]),
            record(6, "  b = 1;", &["source.nix.embedded", "constant.numeric.nix"]),
            record(7, "}", &["source.nix.embedded"]),
            record(8, "   ", &[]),
        ]
    }

    fn strings(items: &[&str]) -> Field<Vec<String>> {
        Field::Value(items.iter().map(|s| s.to_string()).collect())
    }

    fn evaluate(checks: &[Check]) -> Vec<Failure> {
        let records = fixture();
        Evaluator::new(Path::new("fixture.nix"), &records, 25).evaluate(checks)
    }

    #[rstest]
    #[case::match_wins(Check { match_: Some("echo".into()), line: Field::Value(6), ..Default::default() }, Ok(3))]
    #[case::match_miss_falls_through_to_line(Check { match_: Some("nope".into()), line: Field::Value(6), ..Default::default() }, Ok(6))]
    #[case::match_miss_falls_through_to_after_match(Check { match_: Some("nope".into()), after_match: Some("'';".into()), ..Default::default() }, Ok(6))]
    #[case::line_beats_after_match(Check { line: Field::Value(2), after_match: Some("echo".into()), ..Default::default() }, Ok(2))]
    #[case::after_match_skips_blank_lines(Check { after_match: Some("'';".into()), ..Default::default() }, Ok(6))]
    #[case::after_line(Check { after_line: Field::Value(4), ..Default::default() }, Ok(6))]
    #[case::after_line_zero_is_first_line(Check { after_line: Field::Value(0), ..Default::default() }, Ok(1))]
    #[case::line_is_taken_verbatim(Check { line: Field::Value(42), ..Default::default() }, Ok(42))]
    #[case::unresolved(Check { match_: Some("nope".into()), ..Default::default() }, Err(CheckError::Unresolved))]
    #[case::after_match_not_found(Check { after_match: Some("nope".into()), ..Default::default() }, Err(CheckError::AfterMatchNotFound("nope".into())))]
    #[case::after_match_uses_first_occurrence(Check { after_match: Some("}".into()), ..Default::default() }, Ok(4))]
    #[case::match_is_literal(Check { match_: Some("color.*".into()), ..Default::default() }, Err(CheckError::Unresolved))]
    #[case::no_line_after_after_line(Check { after_line: Field::Value(7), ..Default::default() }, Err(CheckError::NoLineAfterLine(7)))]
    fn resolves_targets(#[case] check: Check, #[case] expected: Result<usize, CheckError>) {
        let records = fixture();
        let evaluator = Evaluator::new(Path::new("fixture.nix"), &records, 25);
        assert_eq!(evaluator.resolve_target(&check), expected);
    }

    #[test]
    fn after_match_on_last_non_blank_line_fails() {
        let records = vec![record(1, "a", &[]), record(2, "last", &[]), record(3, "", &[])];
        let evaluator = Evaluator::new(Path::new("fixture.nix"), &records, 25);
        let failures = evaluator.evaluate(&[
            Check {
                after_match: Some("last".into()),
                has_any: strings(&["x"]),
                ..Default::default()
            },
            Check {
                line: Field::Value(1),
                not_has_any: strings(&["x"]),
                ..Default::default()
            },
        ]);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].error, CheckError::NoLineAfterMatch("last".into()));
        assert_eq!(
            failures[0].to_string(),
            "check[0]: no non-empty line after afterMatch: last"
        );
    }

    #[rstest]
    #[case::exact(&["source.nix.embedded"], true)]
    #[case::substring(&["source.css"], true)]
    #[case::fragment(&["css.embedded"], true)]
    #[case::any_of_several(&["source.bash", "source.css"], true)]
    #[case::absent(&["source.bash"], false)]
    fn has_any_uses_substring_containment(#[case] needles: &[&str], #[case] passes: bool) {
        let failures = evaluate(&[Check {
            match_: Some("echo".into()),
            has_any: strings(needles),
            ..Default::default()
        }]);
        assert_eq!(failures.is_empty(), passes);
    }

    #[test]
    fn not_has_any_outside_the_embedded_region() {
        let failures = evaluate(&[Check {
            after_match: Some("'';".into()),
            not_has_any: strings(&["source.css"]),
            ..Default::default()
        }]);
        assert!(failures.is_empty());

        let failures = evaluate(&[Check {
            match_: Some("echo".into()),
            not_has_any: strings(&["source.css"]),
            ..Default::default()
        }]);
        assert_eq!(
            failures[0].error,
            CheckError::ExpectedNone {
                expected: vec!["source.css".into()]
            }
        );
    }

    #[test]
    fn has_any_is_checked_before_not_has_any() {
        let failures = evaluate(&[Check {
            match_: Some("echo".into()),
            has_any: strings(&["source.bash"]),
            not_has_any: strings(&["source.css"]),
            ..Default::default()
        }]);
        assert!(matches!(failures[0].error, CheckError::ExpectedAny { .. }));
    }

    #[test]
    fn empty_has_any_never_passes() {
        let failures = evaluate(&[Check {
            line: Field::Value(1),
            has_any: Field::Value(Vec::new()),
            ..Default::default()
        }]);
        assert_eq!(failures.len(), 1);

        let failures = evaluate(&[Check {
            line: Field::Value(1),
            not_has_any: Field::Value(Vec::new()),
            ..Default::default()
        }]);
        assert!(failures.is_empty());
    }

    #[test]
    fn missing_assertion_fails_after_resolution() {
        let failures = evaluate(&[Check {
            line: Field::Value(1),
            ..Default::default()
        }]);
        assert_eq!(failures[0].error, CheckError::MissingAssertion);
        assert_eq!(failures[0].target, Some(1));
        insta::assert_snapshot!(failures[0].to_string(), @r###"
        check[0]: FAIL: fixture.nix: check[0] -> line 1
        missing hasAny/notHasAny
        Scopes sample: ["source.nix.embedded"]
        "###);
    }

    #[test]
    fn lines_without_records_have_no_scopes() {
        let failures = evaluate(&[
            Check {
                line: Field::Value(0),
                not_has_any: strings(&["source"]),
                ..Default::default()
            },
            Check {
                line: Field::Value(99),
                has_any: strings(&["source"]),
                ..Default::default()
            },
        ]);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 1);
        assert!(failures[0].scope_sample.is_empty());
    }

    #[test]
    fn failures_do_not_stop_later_checks() {
        let failures = evaluate(&[
            Check {
                match_: Some("missing".into()),
                has_any: strings(&["source"]),
                ..Default::default()
            },
            Check {
                match_: Some("echo".into()),
                has_any: strings(&["source.css"]),
                ..Default::default()
            },
            Check {
                after_line: Field::Value(7),
                has_any: strings(&["source"]),
                ..Default::default()
            },
        ]);
        let indices: Vec<usize> = failures.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(failures[0].to_string(), "check[0]: could not resolve target line");
        assert_eq!(failures[1].to_string(), "check[2]: no non-empty line after afterLine: 7");
    }

    #[test]
    fn assertion_failures_carry_full_context() {
        let failures = evaluate(&[Check {
            match_: Some("echo".into()),
            has_any: strings(&["source.bash"]),
            note: Some("inside the block".into()),
            ..Default::default()
        }]);
        insta::assert_snapshot!(failures[0].to_string(), @r###"
        check[0]: FAIL: fixture.nix: check[0] -> line 3 (inside the block)
        Expected any of: ["source.bash"]
        Scopes sample: ["source.nix.embedded","source.css.embedded.nix.something"]
        "###);
    }

    #[test]
    fn scope_sample_is_truncated() {
        let records = fixture();
        let failures = Evaluator::new(Path::new("fixture.nix"), &records, 1).evaluate(&[Check {
            line: Field::Value(3),
            has_any: strings(&["source.bash"]),
            ..Default::default()
        }]);
        assert_eq!(failures[0].scope_sample, vec!["source.nix.embedded".to_string()]);
    }

    #[rstest]
    #[case::line(Check { line: Field::Invalid("-1".into()), has_any: strings(&["source"]), ..Default::default() }, None, "line")]
    #[case::after_line(Check { after_line: Field::Invalid("2.5".into()), has_any: strings(&["source"]), ..Default::default() }, None, "afterLine")]
    #[case::has_any(Check { line: Field::Value(1), has_any: Field::Invalid("\"source\"".into()), ..Default::default() }, Some(1), "hasAny")]
    #[case::not_has_any(Check { line: Field::Value(1), not_has_any: Field::Invalid("{}".into()), ..Default::default() }, Some(1), "notHasAny")]
    fn invalid_fields_fail_only_their_check(
        #[case] broken: Check,
        #[case] target: Option<usize>,
        #[case] field: &str,
    ) {
        let failures = evaluate(&[
            broken,
            Check {
                match_: Some("echo".into()),
                has_any: strings(&["source.css"]),
                ..Default::default()
            },
        ]);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 0);
        assert_eq!(failures[0].target, target);
        assert!(matches!(&failures[0].error, CheckError::InvalidField { field: f, .. } if *f == field));
    }

    #[test]
    fn a_matching_text_address_shadows_an_invalid_line() {
        let failures = evaluate(&[Check {
            match_: Some("echo".into()),
            line: Field::Invalid("-3".into()),
            has_any: strings(&["source.css"]),
            ..Default::default()
        }]);
        assert!(failures.is_empty());
    }
}
