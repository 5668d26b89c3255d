//! Grammar registry
//!
//! A [`Registry`] asks its [`GrammarSource`] for the requested grammar, then
//! for every grammar that one embeds (transitively), and compiles the lot into
//! a single [`Grammar`].

use super::raw::RawGrammar;
use super::rule::{Compiler, RuleArena, RuleId};
use super::TextMateError;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Supplies raw grammars by scope name
///
/// `Ok(None)` means "not available". For an embedded scope that is not an
/// error, the region just stays untokenized by a nested grammar.
pub trait GrammarSource {
    fn load(&self, scope_name: &str) -> Result<Option<RawGrammar>, TextMateError>;
}

impl<F> GrammarSource for F
where
    F: Fn(&str) -> Result<Option<RawGrammar>, TextMateError>,
{
    fn load(&self, scope_name: &str) -> Result<Option<RawGrammar>, TextMateError> {
        self(scope_name)
    }
}

impl GrammarSource for HashMap<String, RawGrammar> {
    fn load(&self, scope_name: &str) -> Result<Option<RawGrammar>, TextMateError> {
        Ok(self.get(scope_name).cloned())
    }
}

/// A compiled grammar, ready to tokenize
#[derive(Debug)]
pub struct Grammar {
    scope_name: String,
    pub(crate) rules: RuleArena,
    pub(crate) root: RuleId,
}

impl Grammar {
    pub fn scope_name(&self) -> &str {
        &self.scope_name
    }
}

pub struct Registry<S> {
    source: S,
}

impl<S: GrammarSource> Registry<S> {
    pub fn new(source: S) -> Self {
        Registry { source }
    }

    /// Load and compile the grammar for `scope_name`.
    ///
    /// Returns `Ok(None)` when the source has no grammar for that scope.
    pub fn load_grammar(&self, scope_name: &str) -> Result<Option<Grammar>, TextMateError> {
        let Some(root) = self.source.load(scope_name)? else {
            return Ok(None);
        };

        let mut pending: Vec<String> = root.external_references().into_iter().collect();
        let mut grammars = HashMap::new();
        grammars.insert(scope_name.to_string(), root);
        let mut unavailable = HashSet::new();

        while let Some(scope) = pending.pop() {
            if grammars.contains_key(&scope) || unavailable.contains(&scope) {
                continue;
            }
            match self.source.load(&scope)? {
                Some(grammar) => {
                    debug!(scope = %scope, "loaded embedded grammar");
                    pending.extend(grammar.external_references());
                    grammars.insert(scope, grammar);
                }
                None => {
                    debug!(scope = %scope, "embedded grammar not available");
                    unavailable.insert(scope);
                }
            }
        }

        let (rules, root) = Compiler::new(scope_name, &grammars).compile()?;
        let Some(root) = root else {
            return Ok(None);
        };
        debug!(scope = scope_name, rules = rules.len(), grammars = grammars.len(), "compiled grammar");

        Ok(Some(Grammar {
            scope_name: scope_name.to_string(),
            rules,
            root,
        }))
    }
}
