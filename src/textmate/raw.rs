//! Raw grammar documents
//!
//! These mirror the on-disk shape of a `tmLanguage.json` (or YAML) grammar.
//! Nothing here is validated beyond what serde enforces; regexes are checked
//! when the rules get compiled.

use super::TextMateError;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A grammar document as written by its author
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGrammar {
    #[serde(default)]
    pub scope_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub patterns: Vec<RawRule>,
    #[serde(default)]
    pub repository: HashMap<String, RawRule>,
    /// Parsed for completeness; injection grammars are not applied.
    #[serde(default)]
    pub injections: HashMap<String, RawRule>,
    #[serde(default)]
    pub injection_selector: Option<String>,
    #[serde(default)]
    pub file_types: Vec<String>,
    #[serde(default)]
    pub first_line_match: Option<String>,
}

/// One entry of `patterns`, `repository` or a capture map
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRule {
    #[serde(default)]
    pub include: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub content_name: Option<String>,
    #[serde(default, rename = "match")]
    pub match_: Option<String>,
    #[serde(default)]
    pub begin: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default, rename = "while")]
    pub while_: Option<String>,
    #[serde(default)]
    pub captures: Option<RawCaptures>,
    #[serde(default)]
    pub begin_captures: Option<RawCaptures>,
    #[serde(default)]
    pub end_captures: Option<RawCaptures>,
    #[serde(default)]
    pub while_captures: Option<RawCaptures>,
    #[serde(default)]
    pub patterns: Option<Vec<RawRule>>,
    #[serde(default)]
    pub repository: Option<HashMap<String, RawRule>>,
    #[serde(default)]
    pub apply_end_pattern_last: Option<Flag>,
    #[serde(default)]
    pub disabled: Option<Flag>,
}

/// Capture group number (as written, e.g. `"1"`) to capture rule
pub type RawCaptures = BTreeMap<String, RawRule>;

/// Grammars in the wild spell booleans both as `true` and as `1`
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Int(i64),
}

impl Flag {
    pub fn is_set(self) -> bool {
        match self {
            Flag::Bool(b) => b,
            Flag::Int(i) => i != 0,
        }
    }
}

impl RawGrammar {
    pub fn from_json(text: &str) -> Result<Self, TextMateError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_yaml(text: &str) -> Result<Self, TextMateError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Scope names of other grammars this one includes, e.g. `source.css`
    /// from `"include": "source.css#rules"`.
    pub fn external_references(&self) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let rules = self
            .patterns
            .iter()
            .chain(self.repository.values());
        for rule in rules {
            collect_references(rule, &mut found);
        }
        found
    }
}

impl RawRule {
    pub fn is_disabled(&self) -> bool {
        self.disabled.is_some_and(Flag::is_set)
    }

    pub fn applies_end_pattern_last(&self) -> bool {
        self.apply_end_pattern_last.is_some_and(Flag::is_set)
    }
}

fn collect_references(rule: &RawRule, found: &mut BTreeSet<String>) {
    if let Some(include) = &rule.include {
        if !include.starts_with('#') && !include.starts_with('$') {
            let scope = include.split('#').next().unwrap_or(include);
            if !scope.is_empty() {
                found.insert(scope.to_string());
            }
        }
    }

    for child in rule.patterns.iter().flatten() {
        collect_references(child, found);
    }
    for child in rule.repository.iter().flat_map(|repo| repo.values()) {
        collect_references(child, found);
    }
    let capture_maps = [
        &rule.captures,
        &rule.begin_captures,
        &rule.end_captures,
        &rule.while_captures,
    ];
    for capture in capture_maps.into_iter().flatten().flat_map(|map| map.values()) {
        collect_references(capture, found);
    }
}
