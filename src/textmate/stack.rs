//! Rule stack carried from one line to the next

use super::pattern::RegexSource;
use super::rule::RuleId;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub(crate) struct StackFrame {
    pub rule: RuleId,
    /// Where the rule was entered, only meaningful on the line it was entered
    pub enter_pos: Option<usize>,
    /// Anchor to restore once this rule ends
    pub anchor_pos: Option<usize>,
    /// The begin match consumed the rest of its line
    pub captured_eol: bool,
    /// Scopes including the rule's `name`, used for begin/end captures
    pub name_scopes: Vec<String>,
    /// `name_scopes` plus `contentName`, used for everything in between
    pub content_scopes: Vec<String>,
    /// End or while pattern with back-references already substituted
    pub resolved: Option<Rc<RegexSource>>,
}

/// Opaque continuation state returned by every tokenized line
///
/// Start a file with [`RuleStack::INITIAL`] and feed each line the stack the
/// previous line returned.
#[derive(Debug, Clone, Default)]
pub struct RuleStack {
    frames: Vec<StackFrame>,
}

impl RuleStack {
    pub const INITIAL: RuleStack = RuleStack { frames: Vec::new() };

    pub(crate) fn root(rule: RuleId, scope_name: &str) -> Self {
        let scopes = vec![scope_name.to_string()];
        RuleStack {
            frames: vec![StackFrame {
                rule,
                enter_pos: None,
                anchor_pos: None,
                captured_eol: false,
                name_scopes: scopes.clone(),
                content_scopes: scopes,
                resolved: None,
            }],
        }
    }

    pub(crate) fn from_frame(frame: StackFrame) -> Self {
        RuleStack {
            frames: vec![frame],
        }
    }

    pub fn is_initial(&self) -> bool {
        self.frames.is_empty()
    }

    /// Number of nested rules currently open, the grammar root included
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Positions only make sense within the line that produced them.
    pub(crate) fn reset_positions(&mut self) {
        for frame in &mut self.frames {
            frame.enter_pos = None;
            frame.anchor_pos = None;
        }
    }

    /// Callers never tokenize with an initial stack, it is replaced by the
    /// grammar root first.
    pub(crate) fn top(&self) -> &StackFrame {
        &self.frames[self.frames.len() - 1]
    }

    pub(crate) fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    pub(crate) fn content_scopes(&self) -> &[String] {
        &self.top().content_scopes
    }

    pub(crate) fn push(&mut self, frame: StackFrame) {
        self.frames.push(frame);
    }

    pub(crate) fn pop(&mut self) -> Option<StackFrame> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.frames.truncate(len.max(1));
    }

    /// Whether `rule` was already entered at `pos` on this line, meaning
    /// pushing it again would loop forever.
    pub(crate) fn entered_at(&self, rule: RuleId, pos: usize) -> bool {
        self.frames
            .iter()
            .rev()
            .take_while(|frame| frame.enter_pos == Some(pos))
            .any(|frame| frame.rule == rule)
    }
}
