//! Rule compilation
//!
//! Raw grammars are compiled into a flat arena of [`Rule`]s addressed by
//! [`RuleId`]. Includes are resolved at compile time:
//!
//! - `$self` / `$base`: root of the current / top-level grammar
//! - `#name`: repository lookup, innermost repository first
//! - `scope` / `scope#name`: another grammar, or an entry of its repository
//!
//! Every raw rule compiles exactly once (keyed by its address), which is what
//! lets self-recursive repositories terminate. Pattern lists of container
//! rules are flattened lazily, on first use by the tokenizer.

use super::pattern::{CaptureSpans, RegexSource};
use super::raw::{RawCaptures, RawGrammar, RawRule};
use super::TextMateError;
use once_cell::sync::Lazy;
use once_cell::unsync::OnceCell;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub type RuleId = usize;

static CAPTURE_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$(\d+)|\$\{(\d+):/(downcase|upcase)\}").unwrap());

/// A scope name that may pull text from the match, as in `entity.name.$1`
#[derive(Debug, Clone)]
pub(crate) struct ScopeTemplate {
    raw: String,
    has_captures: bool,
}

impl ScopeTemplate {
    fn new(raw: &str) -> Self {
        ScopeTemplate {
            raw: raw.to_string(),
            has_captures: CAPTURE_REFERENCE.is_match(raw),
        }
    }

    pub fn resolve(&self, text: &str, captures: &CaptureSpans) -> String {
        if !self.has_captures {
            return self.raw.clone();
        }
        CAPTURE_REFERENCE
            .replace_all(&self.raw, |caps: &regex::Captures| {
                let index = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str());
                let span = index
                    .and_then(|i| i.parse::<usize>().ok())
                    .and_then(|i| captures.get(i).copied().flatten());
                let Some((start, end)) = span else {
                    return caps[0].to_string();
                };
                let value = text[start..end].trim_start_matches('.');
                match caps.get(3).map(|m| m.as_str()) {
                    Some("downcase") => value.to_lowercase(),
                    Some("upcase") => value.to_uppercase(),
                    _ => value.to_string(),
                }
            })
            .into_owned()
    }
}

#[derive(Debug)]
pub(crate) struct CaptureRule {
    pub name: Option<ScopeTemplate>,
    pub content_name: Option<ScopeTemplate>,
    /// Container whose patterns re-tokenize the captured text
    pub retokenize: Option<RuleId>,
}

/// Capture rules indexed by group number
pub(crate) type Captures = Vec<Option<CaptureRule>>;

#[derive(Debug)]
pub(crate) enum RuleKind {
    Match {
        regex: RegexSource,
        captures: Captures,
    },
    BeginEnd {
        begin: RegexSource,
        begin_captures: Captures,
        end: RegexSource,
        end_captures: Captures,
        apply_end_pattern_last: bool,
        patterns: Vec<RuleId>,
    },
    BeginWhile {
        begin: RegexSource,
        begin_captures: Captures,
        while_: RegexSource,
        while_captures: Captures,
        patterns: Vec<RuleId>,
    },
    /// Pattern-only container: grammar roots, repository groups, capture patterns
    Include { patterns: Vec<RuleId> },
}

#[derive(Debug)]
pub(crate) struct Rule {
    pub name: Option<ScopeTemplate>,
    pub content_name: Option<ScopeTemplate>,
    pub kind: RuleKind,
    flattened: OnceCell<Vec<RuleId>>,
}

impl Rule {
    fn placeholder() -> Self {
        Rule {
            name: None,
            content_name: None,
            kind: RuleKind::Include {
                patterns: Vec::new(),
            },
            flattened: OnceCell::new(),
        }
    }

    /// The regex that starts this rule when it sits in a pattern list
    pub fn entry_regex(&self) -> Option<&RegexSource> {
        match &self.kind {
            RuleKind::Match { regex, .. } => Some(regex),
            RuleKind::BeginEnd { begin, .. } | RuleKind::BeginWhile { begin, .. } => Some(begin),
            RuleKind::Include { .. } => None,
        }
    }

    fn patterns(&self) -> &[RuleId] {
        match &self.kind {
            RuleKind::BeginEnd { patterns, .. }
            | RuleKind::BeginWhile { patterns, .. }
            | RuleKind::Include { patterns } => patterns,
            RuleKind::Match { .. } => &[],
        }
    }
}

/// Compiled rules of a grammar and every grammar it embeds
#[derive(Debug, Default)]
pub(crate) struct RuleArena {
    rules: Vec<Rule>,
}

impl RuleArena {
    pub fn get(&self, id: RuleId) -> &Rule {
        &self.rules[id]
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Matchable rules reachable from `id`'s patterns, with containers
    /// expanded in place and duplicates dropped.
    pub fn flattened(&self, id: RuleId) -> &[RuleId] {
        self.rules[id].flattened.get_or_init(|| {
            let mut out = Vec::new();
            let mut seen = HashSet::new();
            self.flatten_into(self.rules[id].patterns(), &mut seen, &mut out);
            out
        })
    }

    fn flatten_into(&self, patterns: &[RuleId], seen: &mut HashSet<RuleId>, out: &mut Vec<RuleId>) {
        for &child in patterns {
            if !seen.insert(child) {
                continue;
            }
            match &self.rules[child].kind {
                RuleKind::Include { patterns } => self.flatten_into(patterns, seen, out),
                _ => out.push(child),
            }
        }
    }
}

/// Repository chain, innermost first
struct Repositories<'r, 'g> {
    map: &'g HashMap<String, RawRule>,
    parent: Option<&'r Repositories<'r, 'g>>,
}

impl<'r, 'g> Repositories<'r, 'g> {
    fn lookup(&self, name: &str) -> Option<&'g RawRule> {
        self.map
            .get(name)
            .or_else(|| self.parent.and_then(|parent| parent.lookup(name)))
    }
}

#[derive(Clone, Copy)]
struct Context<'r, 'g> {
    /// Scope of the grammar the rule being compiled belongs to
    self_scope: &'g str,
    repositories: &'r Repositories<'r, 'g>,
}

pub(crate) struct Compiler<'g> {
    grammars: &'g HashMap<String, RawGrammar>,
    base_scope: &'g str,
    arena: RuleArena,
    compiled: HashMap<*const RawRule, RuleId>,
    roots: HashMap<String, RuleId>,
}

impl<'g> Compiler<'g> {
    pub fn new(base_scope: &'g str, grammars: &'g HashMap<String, RawGrammar>) -> Self {
        Compiler {
            grammars,
            base_scope,
            arena: RuleArena::default(),
            compiled: HashMap::new(),
            roots: HashMap::new(),
        }
    }

    /// Compile the base grammar (and everything it reaches) into an arena.
    pub fn compile(mut self) -> Result<(RuleArena, Option<RuleId>), TextMateError> {
        let root = self.grammar_root(self.base_scope)?;
        Ok((self.arena, root))
    }

    fn allocate(&mut self) -> RuleId {
        self.arena.rules.push(Rule::placeholder());
        self.arena.rules.len() - 1
    }

    fn grammar_root(&mut self, scope: &str) -> Result<Option<RuleId>, TextMateError> {
        if let Some(&id) = self.roots.get(scope) {
            return Ok(Some(id));
        }
        let grammars = self.grammars;
        let Some((scope, grammar)) = grammars.get_key_value(scope) else {
            debug!(scope, "no grammar available for include");
            return Ok(None);
        };

        let id = self.allocate();
        self.roots.insert(scope.clone(), id);
        let repositories = Repositories {
            map: &grammar.repository,
            parent: None,
        };
        let ctx = Context {
            self_scope: scope,
            repositories: &repositories,
        };
        let patterns = self.patterns(&grammar.patterns, ctx)?;
        self.arena.rules[id].kind = RuleKind::Include { patterns };
        Ok(Some(id))
    }

    fn patterns(&mut self, raw: &'g [RawRule], ctx: Context<'_, 'g>) -> Result<Vec<RuleId>, TextMateError> {
        let mut ids = Vec::with_capacity(raw.len());
        for rule in raw {
            let id = match &rule.include {
                Some(reference) => self.include(reference, ctx)?,
                None => self.rule(rule, ctx)?,
            };
            ids.extend(id);
        }
        Ok(ids)
    }

    fn include(&mut self, reference: &str, ctx: Context<'_, 'g>) -> Result<Option<RuleId>, TextMateError> {
        match reference {
            "$self" => return self.grammar_root(ctx.self_scope),
            "$base" => return self.grammar_root(self.base_scope),
            _ => {}
        }

        if let Some(name) = reference.strip_prefix('#') {
            return match ctx.repositories.lookup(name) {
                Some(rule) => self.rule(rule, ctx),
                None => {
                    debug!(scope = ctx.self_scope, include = reference, "unresolved repository include");
                    Ok(None)
                }
            };
        }

        let (scope, name) = match reference.split_once('#') {
            Some((scope, name)) => (scope, Some(name)),
            None => (reference, None),
        };
        let Some(name) = name else {
            return self.grammar_root(scope);
        };

        let grammars = self.grammars;
        let Some((scope, grammar)) = grammars.get_key_value(scope) else {
            debug!(include = reference, "no grammar available for include");
            return Ok(None);
        };
        let repositories = Repositories {
            map: &grammar.repository,
            parent: None,
        };
        match repositories.lookup(name) {
            Some(rule) => self.rule(
                rule,
                Context {
                    self_scope: scope,
                    repositories: &repositories,
                },
            ),
            None => {
                debug!(include = reference, "unresolved external repository include");
                Ok(None)
            }
        }
    }

    fn rule(&mut self, raw: &'g RawRule, ctx: Context<'_, 'g>) -> Result<Option<RuleId>, TextMateError> {
        if raw.is_disabled() {
            return Ok(None);
        }
        let key = raw as *const RawRule;
        if let Some(&id) = self.compiled.get(&key) {
            return Ok(Some(id));
        }
        let id = self.allocate();
        self.compiled.insert(key, id);

        let nested;
        let ctx = match &raw.repository {
            Some(map) => {
                nested = Repositories {
                    map,
                    parent: Some(ctx.repositories),
                };
                Context {
                    self_scope: ctx.self_scope,
                    repositories: &nested,
                }
            }
            None => ctx,
        };

        let kind = if let Some(regex) = &raw.match_ {
            RuleKind::Match {
                regex: RegexSource::new(regex)?,
                captures: self.captures(raw.captures.as_ref(), ctx)?,
            }
        } else if let Some(begin) = &raw.begin {
            let patterns = self.patterns(raw.patterns.as_deref().unwrap_or_default(), ctx)?;
            let begin = RegexSource::new(begin)?;
            let begin_captures = self.captures(raw.begin_captures.as_ref().or(raw.captures.as_ref()), ctx)?;
            match &raw.while_ {
                Some(while_) => RuleKind::BeginWhile {
                    begin,
                    begin_captures,
                    while_: RegexSource::new(while_)?,
                    while_captures: self
                        .captures(raw.while_captures.as_ref().or(raw.captures.as_ref()), ctx)?,
                    patterns,
                },
                None => RuleKind::BeginEnd {
                    begin,
                    begin_captures,
                    // A begin without an end runs to the end of the document
                    end: RegexSource::new(raw.end.as_deref().unwrap_or("\u{FFFF}"))?,
                    end_captures: self
                        .captures(raw.end_captures.as_ref().or(raw.captures.as_ref()), ctx)?,
                    apply_end_pattern_last: raw.applies_end_pattern_last(),
                    patterns,
                },
            }
        } else {
            RuleKind::Include {
                patterns: self.patterns(raw.patterns.as_deref().unwrap_or_default(), ctx)?,
            }
        };

        let rule = &mut self.arena.rules[id];
        rule.name = raw.name.as_deref().map(ScopeTemplate::new);
        rule.content_name = raw.content_name.as_deref().map(ScopeTemplate::new);
        rule.kind = kind;
        Ok(Some(id))
    }

    fn captures(&mut self, raw: Option<&'g RawCaptures>, ctx: Context<'_, 'g>) -> Result<Captures, TextMateError> {
        let Some(raw) = raw else {
            return Ok(Vec::new());
        };
        let indexed: Vec<(usize, &RawRule)> = raw
            .iter()
            .filter_map(|(key, rule)| key.parse::<usize>().ok().map(|index| (index, rule)))
            .collect();
        let Some(max) = indexed.iter().map(|(index, _)| *index).max() else {
            return Ok(Vec::new());
        };

        let mut captures: Captures = (0..=max).map(|_| None).collect();
        for (index, rule) in indexed {
            let retokenize = match &rule.patterns {
                Some(patterns) => {
                    let id = self.allocate();
                    let patterns = self.patterns(patterns, ctx)?;
                    self.arena.rules[id].kind = RuleKind::Include { patterns };
                    Some(id)
                }
                None => None,
            };
            captures[index] = Some(CaptureRule {
                name: rule.name.as_deref().map(ScopeTemplate::new),
                content_name: rule.content_name.as_deref().map(ScopeTemplate::new),
                retokenize,
            });
        }
        Ok(captures)
    }
}
