//! Line tokenizer
//!
//! Each call scans one line (with a `\n` appended, as editors feed it) and
//! returns the tokens plus the rule stack to hand to the next line. At every
//! position the candidate patterns of the innermost open rule are searched and
//! the leftmost match wins; ties go to the pattern listed first.

use super::pattern::{CaptureSpans, RegexSource};
use super::registry::Grammar;
use super::rule::{CaptureRule, RuleId, RuleKind, ScopeTemplate};
use super::stack::{RuleStack, StackFrame};
use super::TextMateError;
use std::rc::Rc;
use tracing::trace;

/// A run of text sharing one scope list, as byte offsets into the line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub start: usize,
    pub end: usize,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TokenizedLine {
    pub tokens: Vec<Token>,
    pub rule_stack: RuleStack,
}

#[derive(Debug, Default)]
struct LineTokens {
    tokens: Vec<Token>,
    last_end: usize,
}

impl LineTokens {
    /// Emit everything between the previous token and `end` with `scopes`.
    fn produce(&mut self, scopes: &[String], end: usize) {
        if end <= self.last_end {
            return;
        }
        self.tokens.push(Token {
            start: self.last_end,
            end,
            scopes: scopes.to_vec(),
        });
        self.last_end = end;
    }

    fn finish(mut self, line_len: usize, stack: &RuleStack) -> Vec<Token> {
        // Drop the token that only covers the synthetic newline
        if self.tokens.last().is_some_and(|t| t.start == line_len) {
            self.tokens.pop();
        }
        if self.tokens.is_empty() {
            self.last_end = 0;
            self.produce(stack.content_scopes(), line_len + 1);
        }
        for token in &mut self.tokens {
            token.end = token.end.min(line_len);
        }
        self.tokens
    }
}

/// What the scanner matched at the current position
enum Matched {
    /// The end pattern of the innermost open rule
    End,
    Rule(RuleId),
}

/// Mutable scan position within one line
struct Cursor {
    pos: usize,
    anchor: Option<usize>,
    first_line: bool,
}

impl Cursor {
    fn allow_g(&self) -> bool {
        self.anchor == Some(self.pos)
    }

    fn advance(&mut self, end: usize) {
        if end > self.pos {
            self.first_line = false;
        }
        self.pos = end;
    }
}

fn push_scopes(base: &[String], name: Option<String>) -> Vec<String> {
    let mut scopes = base.to_vec();
    if let Some(name) = name {
        scopes.extend(name.split_whitespace().map(str::to_string));
    }
    scopes
}

fn resolve(template: Option<&ScopeTemplate>, text: &str, captures: &CaptureSpans) -> Option<String> {
    template.map(|t| t.resolve(text, captures))
}

impl Grammar {
    /// Tokenize one line, continuing from `previous`.
    ///
    /// `line` must not contain the line terminator.
    pub fn tokenize_line(&self, line: &str, previous: &RuleStack) -> Result<TokenizedLine, TextMateError> {
        let first_line = previous.is_initial();
        let mut stack = if first_line {
            RuleStack::root(self.root, self.scope_name())
        } else {
            let mut stack = previous.clone();
            stack.reset_positions();
            stack
        };

        let text = format!("{line}\n");
        let mut out = LineTokens::default();
        let mut cursor = Cursor {
            pos: 0,
            // A begin match that ran to the end of the previous line leaves
            // `\G` usable at the start of this one
            anchor: stack.top().captured_eol.then_some(0),
            first_line,
        };

        self.check_while_conditions(&text, &mut cursor, &mut stack, &mut out)?;
        self.scan(&text, cursor, &mut stack, &mut out)?;

        let tokens = out.finish(line.len(), &stack);
        trace!(line, tokens = tokens.len(), depth = stack.depth(), "tokenized line");
        Ok(TokenizedLine {
            tokens,
            rule_stack: stack,
        })
    }

    /// Pop every begin/while rule whose while pattern no longer matches at
    /// the start of this line, outermost first.
    fn check_while_conditions(
        &self,
        text: &str,
        cursor: &mut Cursor,
        stack: &mut RuleStack,
        out: &mut LineTokens,
    ) -> Result<(), TextMateError> {
        let while_frames: Vec<usize> = stack
            .frames()
            .iter()
            .enumerate()
            .filter(|(_, frame)| matches!(self.rules.get(frame.rule).kind, RuleKind::BeginWhile { .. }))
            .map(|(index, _)| index)
            .collect();

        for index in while_frames {
            let frame = stack.frames()[index].clone();
            let RuleKind::BeginWhile {
                while_,
                while_captures,
                ..
            } = &self.rules.get(frame.rule).kind
            else {
                continue;
            };
            let regex = frame.resolved.as_deref().unwrap_or(while_);
            let Some(captures) = regex.search(text, cursor.pos, cursor.first_line, cursor.allow_g())? else {
                stack.truncate(index);
                break;
            };
            let Some((start, end)) = captures[0] else {
                continue;
            };

            out.produce(&frame.content_scopes, start);
            self.handle_captures(text, cursor.first_line, &frame.content_scopes, while_captures, &captures, out)?;
            out.produce(&frame.content_scopes, end);
            cursor.anchor = Some(end);
            cursor.advance(end);
        }
        Ok(())
    }

    fn scan(
        &self,
        text: &str,
        mut cursor: Cursor,
        stack: &mut RuleStack,
        out: &mut LineTokens,
    ) -> Result<(), TextMateError> {
        let len = text.len();
        loop {
            let Some((matched, captures)) = self.match_rule(text, &cursor, stack)? else {
                out.produce(stack.content_scopes(), len);
                return Ok(());
            };
            let Some((start, end)) = captures[0] else {
                out.produce(stack.content_scopes(), len);
                return Ok(());
            };
            let advanced = end > cursor.pos;

            match matched {
                Matched::End => {
                    let frame = stack.top().clone();
                    let end_captures: &[Option<CaptureRule>] = match &self.rules.get(frame.rule).kind {
                        RuleKind::BeginEnd { end_captures, .. } => end_captures,
                        _ => &[],
                    };
                    out.produce(&frame.content_scopes, start);
                    self.handle_captures(text, cursor.first_line, &frame.name_scopes, end_captures, &captures, out)?;
                    out.produce(&frame.name_scopes, end);

                    if !advanced && frame.enter_pos == Some(cursor.pos) {
                        // The rule was entered and would end at the same spot
                        out.produce(&frame.content_scopes, len);
                        return Ok(());
                    }
                    if let Some(popped) = stack.pop() {
                        cursor.anchor = popped.anchor_pos;
                    }
                }
                Matched::Rule(id) => {
                    let rule = self.rules.get(id);
                    out.produce(stack.content_scopes(), start);
                    let name_scopes = push_scopes(
                        stack.content_scopes(),
                        resolve(rule.name.as_ref(), text, &captures),
                    );

                    match &rule.kind {
                        RuleKind::Match {
                            captures: capture_rules,
                            ..
                        } => {
                            self.handle_captures(text, cursor.first_line, &name_scopes, capture_rules, &captures, out)?;
                            out.produce(&name_scopes, end);
                            if !advanced {
                                // An empty match can never make progress
                                stack.pop();
                                out.produce(stack.content_scopes(), len);
                                return Ok(());
                            }
                        }
                        RuleKind::BeginEnd {
                            begin_captures,
                            end: end_regex,
                            ..
                        }
                        | RuleKind::BeginWhile {
                            begin_captures,
                            while_: end_regex,
                            ..
                        } => {
                            self.handle_captures(text, cursor.first_line, &name_scopes, begin_captures, &captures, out)?;
                            out.produce(&name_scopes, end);

                            if !advanced && stack.entered_at(id, cursor.pos) {
                                out.produce(stack.content_scopes(), len);
                                return Ok(());
                            }

                            let content_scopes = push_scopes(
                                &name_scopes,
                                resolve(rule.content_name.as_ref(), text, &captures),
                            );
                            let resolved = end_regex
                                .has_back_references()
                                .then(|| Rc::new(end_regex.resolve_back_references(text, &captures)));
                            stack.push(StackFrame {
                                rule: id,
                                enter_pos: Some(cursor.pos),
                                anchor_pos: cursor.anchor,
                                captured_eol: end == len,
                                name_scopes,
                                content_scopes,
                                resolved,
                            });
                            cursor.anchor = Some(end);
                        }
                        RuleKind::Include { .. } => {
                            // Containers are flattened away before matching
                            out.produce(stack.content_scopes(), len);
                            return Ok(());
                        }
                    }
                }
            }

            cursor.advance(end);
        }
    }

    /// Leftmost match among the innermost rule's end pattern and patterns.
    fn match_rule(
        &self,
        text: &str,
        cursor: &Cursor,
        stack: &RuleStack,
    ) -> Result<Option<(Matched, CaptureSpans)>, TextMateError> {
        let frame = stack.top();
        let rule = self.rules.get(frame.rule);

        let (end_regex, end_last) = match &rule.kind {
            RuleKind::BeginEnd {
                end,
                apply_end_pattern_last,
                ..
            } => (Some(frame.resolved.as_deref().unwrap_or(end)), *apply_end_pattern_last),
            _ => (None, false),
        };

        let mut best: Option<(Matched, CaptureSpans)> = None;
        let mut consider = |matched: Matched, regex: &RegexSource| -> Result<bool, TextMateError> {
            let Some(captures) = regex.search(text, cursor.pos, cursor.first_line, cursor.allow_g())? else {
                return Ok(false);
            };
            let start = captures[0].map_or(usize::MAX, |(start, _)| start);
            let better = match &best {
                Some((_, current)) => start < current[0].map_or(usize::MAX, |(s, _)| s),
                None => true,
            };
            if better {
                best = Some((matched, captures));
            }
            // Nothing can beat a match at the current position
            Ok(start == cursor.pos)
        };

        if let (Some(end), false) = (end_regex, end_last) {
            if consider(Matched::End, end)? {
                return Ok(best);
            }
        }
        for &id in self.rules.flattened(frame.rule) {
            if let Some(regex) = self.rules.get(id).entry_regex() {
                if consider(Matched::Rule(id), regex)? {
                    return Ok(best);
                }
            }
        }
        if let (Some(end), true) = (end_regex, end_last) {
            consider(Matched::End, end)?;
        }
        Ok(best)
    }

    /// Emit tokens for the capture groups of a match. Nested groups stack
    /// their scopes on top of the enclosing group's.
    fn handle_captures(
        &self,
        text: &str,
        first_line: bool,
        base: &[String],
        rules: &[Option<CaptureRule>],
        captures: &CaptureSpans,
        out: &mut LineTokens,
    ) -> Result<(), TextMateError> {
        if rules.is_empty() {
            return Ok(());
        }

        let match_end = captures[0].map_or(0, |(_, end)| end);
        let mut open: Vec<(Vec<String>, usize)> = Vec::new();
        for (rule, span) in rules.iter().zip(captures) {
            let (Some(rule), Some((start, end))) = (rule, *span) else {
                continue;
            };
            if start == end {
                continue;
            }
            if start > match_end {
                break;
            }

            while let Some((scopes, open_end)) = open.last() {
                if *open_end > start {
                    break;
                }
                out.produce(scopes, *open_end);
                open.pop();
            }

            let enclosing = open.last().map_or(base, |(scopes, _)| scopes.as_slice());
            out.produce(enclosing, start);

            if let Some(retokenize) = rule.retokenize {
                let name_scopes = push_scopes(base, resolve(rule.name.as_ref(), text, captures));
                let content_scopes =
                    push_scopes(&name_scopes, resolve(rule.content_name.as_ref(), text, captures));
                let mut nested = RuleStack::from_frame(StackFrame {
                    rule: retokenize,
                    enter_pos: Some(start),
                    anchor_pos: None,
                    captured_eol: false,
                    name_scopes,
                    content_scopes,
                    resolved: None,
                });
                let cursor = Cursor {
                    pos: start,
                    anchor: None,
                    first_line: first_line && start == 0,
                };
                self.scan(&text[..end], cursor, &mut nested, out)?;
                continue;
            }

            if let Some(name) = resolve(rule.name.as_ref(), text, captures) {
                open.push((push_scopes(enclosing, Some(name)), end));
            }
        }

        while let Some((scopes, end)) = open.pop() {
            out.produce(&scopes, end);
        }
        Ok(())
    }
}
