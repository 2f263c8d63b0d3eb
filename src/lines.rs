//! Logical lines and the bookkeeping that decides where they may break.
//!
//! A [`Line`] is a flat run of leaves copied out of the tree, each tagged
//! with its bracket depth. The [`BracketTracker`] attached to every line
//! records which leaves are delimiters and how strongly they bind, and the
//! [`EmptyLineTracker`] decides how many blank lines go between lines.

use crate::config::{Feature, FormatConfig, Preview, supports_feature};
use crate::grammar::{Syntax, TokenKind};
use crate::nodes::{
    child_towards, is_comparator, is_complex_subscript_start, is_math_operator, is_unpacking_parent, is_vararg,
    is_varargs_parent, whitespace,
};
use crate::strings::str_width;
use crate::tree::{NodeId, Tree};
use std::fmt;
use thiserror::Error;

pub type Priority = u8;

pub const COMPREHENSION_PRIORITY: Priority = 20;
pub const COMMA_PRIORITY: Priority = 18;
pub const TERNARY_PRIORITY: Priority = 16;
pub const LOGIC_PRIORITY: Priority = 14;
pub const STRING_PRIORITY: Priority = 12;
pub const COMPARATOR_PRIORITY: Priority = 10;
pub const DOT_PRIORITY: Priority = 1;

fn math_priority(kind: TokenKind, value: &str) -> Priority {
    match (kind, value) {
        (TokenKind::Op, "|") => 9,
        (TokenKind::Op, "^") => 8,
        (TokenKind::Op, "&") => 7,
        (TokenKind::Op, "<<" | ">>") => 6,
        (TokenKind::Op, "+" | "-") => 5,
        (TokenKind::Star | TokenKind::At, _) | (TokenKind::Op, "/" | "//" | "%" | "~") => 4,
        (TokenKind::DoubleStar, _) => 1,
        _ => 0,
    }
}

/// The parts of [`FormatConfig`] that lines and splits consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode {
    pub line_length: usize,
    pub magic_trailing_comma: bool,
    pub is_pyi: bool,
    pub string_normalization: bool,
    pub string_processing: bool,
    pub hex_codes_in_unicode_sequences: bool,
    /// Every target accepts `with (a, b):` as two context managers.
    pub parenthesized_context_managers: bool,
}

impl From<&FormatConfig> for Mode {
    fn from(config: &FormatConfig) -> Self {
        Mode {
            line_length: config.line_length,
            magic_trailing_comma: config.magic_trailing_comma,
            is_pyi: config.is_pyi,
            string_normalization: config.normalizes_strings(),
            string_processing: config.is_preview(Preview::StringProcessing),
            hex_codes_in_unicode_sequences: config.is_preview(Preview::HexCodesInUnicodeSequences),
            parenthesized_context_managers: !config.target_versions.is_empty()
                && supports_feature(&config.target_versions, Feature::ParenthesizedContextManagers),
        }
    }
}

/// A leaf as it sits on a line.
///
/// Kind, value and prefix are copied out of the tree so that a line can
/// adjust them (whitespace, made-visible parens) without touching the
/// source tree; structure questions still go through `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineLeaf {
    pub id: NodeId,
    pub kind: TokenKind,
    pub value: String,
    pub prefix: String,
    pub bracket_depth: usize,
    pub opening_bracket: Option<NodeId>,
    /// Source line, 0 for leaves the formatter created.
    pub line: usize,
}

impl LineLeaf {
    pub fn from_tree(tree: &Tree, id: NodeId) -> Option<Self> {
        let leaf = tree.leaf(id)?;
        Some(LineLeaf {
            id,
            kind: leaf.kind,
            value: leaf.value.clone(),
            prefix: leaf.prefix.clone(),
            bracket_depth: 0,
            opening_bracket: None,
            line: leaf.line,
        })
    }

    pub fn is_opening_bracket(&self) -> bool {
        self.kind.is_opening_bracket()
    }

    pub fn is_closing_bracket(&self) -> bool {
        self.kind.is_closing_bracket()
    }

    pub fn is_multiline_string(&self) -> bool {
        self.kind == TokenKind::String && crate::strings::is_multiline_string(&self.value)
    }

    fn is_type_comment(&self) -> bool {
        matches!(self.kind, TokenKind::Comment | TokenKind::StandaloneComment) && self.value.starts_with("# type:")
    }

    fn is_type_ignore_comment(&self) -> bool {
        self.is_type_comment() && self.value.starts_with("# type: ignore")
    }
}

impl fmt::Display for LineLeaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prefix, self.value)
    }
}

/// Priority of splitting right after `leaf`.
pub fn is_split_after_delimiter(leaf: &LineLeaf) -> Priority {
    if leaf.kind == TokenKind::Comma {
        COMMA_PRIORITY
    } else {
        0
    }
}

/// Priority of splitting right before `leaf`, given the leaf before it.
pub fn is_split_before_delimiter(tree: &Tree, leaf: &LineLeaf, previous: Option<&LineLeaf>) -> Priority {
    if is_vararg(tree, leaf.id, |k| is_varargs_parent(k) || is_unpacking_parent(k)) {
        // `*` and `**` unpack here rather than multiply.
        return 0;
    }
    let parent = tree.parent_syntax(leaf.id);

    if leaf.kind == TokenKind::Dot
        && parent.is_some_and(|p| !matches!(p, Syntax::ImportFrom | Syntax::DottedName))
        && previous.is_none_or(LineLeaf::is_closing_bracket)
    {
        return DOT_PRIORITY;
    }

    if is_math_operator(leaf.kind, &leaf.value) && parent.is_some_and(|p| !matches!(p, Syntax::Factor | Syntax::StarExpr)) {
        return math_priority(leaf.kind, &leaf.value);
    }

    if is_comparator(leaf.kind, &leaf.value) {
        return COMPARATOR_PRIORITY;
    }

    if leaf.kind == TokenKind::String && previous.is_some_and(|p| p.kind == TokenKind::String) {
        return STRING_PRIORITY;
    }

    if leaf.kind != TokenKind::Name {
        return 0;
    }
    let previous_is = |value: &str| previous.is_some_and(|p| p.kind == TokenKind::Name && p.value == value);

    match (leaf.value.as_str(), parent) {
        ("for", Some(Syntax::CompFor)) => {
            let after_async = tree.prev_sibling(leaf.id).is_some_and(|p| tree.is_name(p, "async"));
            if !after_async {
                return COMPREHENSION_PRIORITY;
            }
        }
        ("async", Some(Syntax::CompFor)) if tree.index_in_parent(leaf.id) == Some(0) => {
            return COMPREHENSION_PRIORITY;
        }
        ("if", Some(Syntax::CompIf)) => return COMPREHENSION_PRIORITY,
        ("if" | "else", Some(Syntax::Test)) => return TERNARY_PRIORITY,
        ("is", _) => return COMPARATOR_PRIORITY,
        ("in", Some(Syntax::CompOp | Syntax::Comparison)) if !previous_is("not") => {
            return COMPARATOR_PRIORITY;
        }
        ("not", Some(Syntax::CompOp)) if !previous_is("is") => return COMPARATOR_PRIORITY,
        ("and" | "or", Some(_)) => return LOGIC_PRIORITY,
        _ => {}
    }
    0
}

/// Tracks bracket depth and delimiter priorities as leaves are appended.
#[derive(Debug, Clone, Default)]
pub struct BracketTracker {
    pub depth: usize,
    bracket_match: Vec<((usize, TokenKind), NodeId)>,
    /// Delimiter priority keyed by the leaf after which a split may happen.
    pub delimiters: Vec<(NodeId, Priority)>,
    previous: Option<LineLeaf>,
    for_loop_depths: Vec<usize>,
    lambda_argument_depths: Vec<usize>,
    pub invisible: Vec<NodeId>,
}

impl BracketTracker {
    /// Record `leaf`: set its depth and opening bracket, note delimiters at
    /// depth zero.
    ///
    /// `for ... in` and `lambda ...:` count as brackets so that commas
    /// inside them never become top-level delimiters.
    pub fn mark(&mut self, tree: &Tree, leaf: &mut LineLeaf) {
        if leaf.kind == TokenKind::Comment {
            return;
        }
        self.maybe_decrement_after_for_loop_variable(leaf);
        self.maybe_decrement_after_lambda_parameters(leaf);
        if leaf.is_closing_bracket() {
            self.depth = self.depth.saturating_sub(1);
            let key = (self.depth, leaf.kind);
            if let Some(pos) = self.bracket_match.iter().rposition(|(k, _)| *k == key) {
                let (_, opening) = self.bracket_match.remove(pos);
                leaf.opening_bracket = Some(opening);
            }
            if leaf.value.is_empty() {
                self.invisible.push(leaf.id);
            }
        }
        leaf.bracket_depth = self.depth;
        if self.depth == 0 {
            let before = is_split_before_delimiter(tree, leaf, self.previous.as_ref());
            let after = is_split_after_delimiter(leaf);
            if before > 0
                && let Some(previous) = &self.previous
            {
                self.set_delimiter(previous.id, before);
            }
            if after > 0 {
                self.set_delimiter(leaf.id, after);
            }
        }
        if let Some(closing) = leaf.kind.closing() {
            self.bracket_match.push(((self.depth, closing), leaf.id));
            self.depth += 1;
            if leaf.value.is_empty() {
                self.invisible.push(leaf.id);
            }
        }
        self.previous = Some(leaf.clone());
        self.maybe_increment_lambda_parameters(leaf);
        self.maybe_increment_for_loop_variable(leaf);
    }

    fn set_delimiter(&mut self, id: NodeId, priority: Priority) {
        match self.delimiters.iter_mut().find(|(k, _)| *k == id) {
            Some(entry) => entry.1 = priority,
            None => self.delimiters.push((id, priority)),
        }
    }

    pub fn delimiter_priority(&self, id: NodeId) -> Priority {
        self.delimiters.iter().find(|(k, _)| *k == id).map_or(0, |(_, p)| *p)
    }

    pub fn any_open_brackets(&self) -> bool {
        !self.bracket_match.is_empty()
    }

    /// Inside `for ... in` or `lambda ...:`, which count as brackets for
    /// depth but cannot hold a line break.
    pub fn any_open_for_or_lambda(&self) -> bool {
        !self.for_loop_depths.is_empty() || !self.lambda_argument_depths.is_empty()
    }

    /// Highest delimiter priority, ignoring the delimiter after `exclude`.
    pub fn max_delimiter_priority(&self, exclude: Option<NodeId>) -> Priority {
        self.delimiters
            .iter()
            .filter(|(k, _)| Some(*k) != exclude)
            .map(|(_, p)| *p)
            .max()
            .unwrap_or(0)
    }

    pub fn delimiter_count_with_priority(&self, priority: Priority) -> usize {
        if priority == 0 {
            return 0;
        }
        self.delimiters.iter().filter(|(_, p)| *p == priority).count()
    }

    /// The innermost open `[`, if the current depth is directly inside one.
    pub fn get_open_lsqb(&self) -> Option<NodeId> {
        let key = (self.depth.checked_sub(1)?, TokenKind::RSqb);
        self.bracket_match.iter().rev().find(|(k, _)| *k == key).map(|(_, id)| *id)
    }

    fn maybe_increment_for_loop_variable(&mut self, leaf: &LineLeaf) {
        if leaf.kind == TokenKind::Name && leaf.value == "for" {
            self.depth += 1;
            self.for_loop_depths.push(self.depth);
        }
    }

    fn maybe_decrement_after_for_loop_variable(&mut self, leaf: &LineLeaf) {
        if self.for_loop_depths.last() == Some(&self.depth) && leaf.kind == TokenKind::Name && leaf.value == "in" {
            self.depth -= 1;
            self.for_loop_depths.pop();
        }
    }

    fn maybe_increment_lambda_parameters(&mut self, leaf: &LineLeaf) {
        if leaf.kind == TokenKind::Name && leaf.value == "lambda" {
            self.depth += 1;
            self.lambda_argument_depths.push(self.depth);
        }
    }

    fn maybe_decrement_after_lambda_parameters(&mut self, leaf: &LineLeaf) {
        if self.lambda_argument_depths.last() == Some(&self.depth) && leaf.kind == TokenKind::Colon {
            self.depth -= 1;
            self.lambda_argument_depths.pop();
        }
    }
}

/// A standalone comment cannot share a line with other leaves outside brackets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct InvalidAppend(&'static str);

/// One logical line of output, before splitting.
#[derive(Debug, Clone)]
pub struct Line {
    pub mode: Mode,
    pub depth: usize,
    pub leaves: Vec<LineLeaf>,
    /// Trailing comments keyed by the leaf they follow, in insertion order.
    pub comments: Vec<(NodeId, Vec<LineLeaf>)>,
    pub bracket_tracker: BracketTracker,
    pub inside_brackets: bool,
    pub should_split_rhs: bool,
    pub magic_trailing_comma: Option<NodeId>,
}

impl Line {
    pub fn new(mode: Mode, depth: usize, inside_brackets: bool) -> Self {
        Line {
            mode,
            depth,
            leaves: Vec::new(),
            comments: Vec::new(),
            bracket_tracker: BracketTracker::default(),
            inside_brackets,
            should_split_rhs: false,
            magic_trailing_comma: None,
        }
    }

    /// Same depth and flags, no leaves.
    pub fn clone_empty(&self) -> Self {
        Line {
            should_split_rhs: self.should_split_rhs,
            magic_trailing_comma: self.magic_trailing_comma,
            ..Line::new(self.mode, self.depth, self.inside_brackets)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty() && self.comments.is_empty()
    }

    /// Add a leaf, computing the whitespace in front of it unless it is
    /// `preformatted`.
    ///
    /// Inside brackets (or when `track_bracket` is set) the leaf also goes
    /// through the bracket tracker and the magic trailing comma check.
    pub fn append(&mut self, tree: &Tree, mut leaf: LineLeaf, preformatted: bool, track_bracket: bool) {
        let has_value = leaf.kind.is_bracket() || !leaf.value.trim().is_empty();
        if !has_value {
            return;
        }

        if leaf.kind == TokenKind::Colon && self.is_class_paren_empty() {
            self.leaves.truncate(self.leaves.len() - 2);
        }
        if !self.leaves.is_empty() && !preformatted {
            let complex_subscript = self.is_complex_subscript(tree, leaf.id);
            leaf.prefix.push_str(whitespace(tree, leaf.id, complex_subscript));
        }
        if self.inside_brackets || !preformatted || track_bracket {
            self.bracket_tracker.mark(tree, &mut leaf);
            if self.mode.magic_trailing_comma {
                if self.has_magic_trailing_comma(tree, &leaf, false) {
                    self.magic_trailing_comma = Some(leaf.id);
                }
            } else if self.has_magic_trailing_comma(tree, &leaf, true) {
                self.remove_trailing_comma();
            }
        }
        if let Some(leaf) = self.append_comment(tree, leaf) {
            self.leaves.push(leaf);
        }
    }

    /// Like [`Line::append`], but refuses to mix standalone comments with
    /// other leaves outside brackets or within lambda parameters and
    /// comprehension targets.
    pub fn append_safe(&mut self, tree: &Tree, leaf: LineLeaf, preformatted: bool) -> Result<(), InvalidAppend> {
        if self.bracket_tracker.depth == 0 || self.bracket_tracker.any_open_for_or_lambda() {
            if self.is_comment() {
                return Err(InvalidAppend("cannot append to standalone comments"));
            }
            if !self.leaves.is_empty() && leaf.kind == TokenKind::StandaloneComment {
                return Err(InvalidAppend("cannot append standalone comments to a populated line"));
            }
        }
        self.append(tree, leaf, preformatted, false);
        Ok(())
    }

    /// Attach a trailing comment to the last leaf. Returns the leaf back
    /// when it has to go into `leaves` instead.
    fn append_comment(&mut self, tree: &Tree, mut comment: LineLeaf) -> Option<LineLeaf> {
        if comment.kind == TokenKind::StandaloneComment && self.bracket_tracker.any_open_brackets() {
            comment.prefix.clear();
            return Some(comment);
        }
        if comment.kind != TokenKind::Comment {
            return Some(comment);
        }
        if self.leaves.is_empty() {
            comment.kind = TokenKind::StandaloneComment;
            comment.prefix.clear();
            return Some(comment);
        }

        let mut last = self.leaves.len() - 1;
        let last_leaf = &self.leaves[last];
        if last_leaf.kind == TokenKind::RPar
            && last_leaf.value.is_empty()
            && tree.parent(last_leaf.id).is_some_and(|p| tree.leaves(p).len() <= 3)
            && !comment.is_type_comment()
        {
            // Comments on invisible parens around a single leaf belong to that leaf.
            if self.leaves.len() < 2 {
                comment.kind = TokenKind::StandaloneComment;
                comment.prefix.clear();
                return Some(comment);
            }
            last -= 1;
        }
        let id = self.leaves[last].id;
        self.comments_entry(id).push(comment);
        None
    }

    fn comments_entry(&mut self, id: NodeId) -> &mut Vec<LineLeaf> {
        let pos = match self.comments.iter().position(|(k, _)| *k == id) {
            Some(pos) => pos,
            None => {
                self.comments.push((id, Vec::new()));
                self.comments.len() - 1
            }
        };
        &mut self.comments[pos].1
    }

    pub fn comments_after(&self, id: NodeId) -> &[LineLeaf] {
        self.comments
            .iter()
            .find(|(k, _)| *k == id)
            .map_or(&[], |(_, c)| c.as_slice())
    }

    /// Add comments that belonged to a leaf of another line.
    pub fn extend_comments(&mut self, id: NodeId, comments: &[LineLeaf]) {
        if !comments.is_empty() {
            self.comments_entry(id).extend_from_slice(comments);
        }
    }

    pub fn remove_trailing_comma(&mut self) {
        let Some(comma) = self.leaves.pop() else {
            return;
        };
        let moved = match self.comments.iter().position(|(k, _)| *k == comma.id) {
            Some(pos) => self.comments.remove(pos).1,
            None => Vec::new(),
        };
        if let Some(last) = self.leaves.last() {
            let id = last.id;
            self.comments_entry(id).extend(moved);
        }
    }

    /// A trailing comma before `closing` that asks for one item per line.
    ///
    /// One-tuples and single-element subscripts keep their comma without
    /// exploding; `ensure_removable` also spares subscript tuples.
    pub fn has_magic_trailing_comma(&self, tree: &Tree, closing: &LineLeaf, ensure_removable: bool) -> bool {
        if !closing.is_closing_bracket() || self.leaves.last().is_none_or(|l| l.kind != TokenKind::Comma) {
            return false;
        }

        match closing.kind {
            TokenKind::RSqb => {
                let one_sequence = || {
                    closing.opening_bracket.is_some_and(|opening| {
                        is_one_sequence_between(
                            tree,
                            opening,
                            closing,
                            &self.leaves,
                            (TokenKind::LSqb, TokenKind::RSqb),
                        )
                    })
                };
                if tree.parent_syntax(closing.id) == Some(Syntax::Trailer) && one_sequence() {
                    return false;
                }
                if !ensure_removable {
                    return true;
                }
                let Some(comma) = self.leaves.last() else {
                    return false;
                };
                let Some(comma_parent) = tree.parent_syntax(comma.id) else {
                    return false;
                };
                comma_parent != Syntax::Subscriptlist || closing.opening_bracket.is_none() || !one_sequence()
            }
            _ if self.is_import(tree) => true,
            TokenKind::RBrace => true,
            TokenKind::RPar => !closing.opening_bracket.is_some_and(|opening| {
                is_one_sequence_between(tree, opening, closing, &self.leaves, (TokenKind::LPar, TokenKind::RPar))
            }),
            _ => false,
        }
    }

    fn is_complex_subscript(&self, tree: &Tree, leaf: NodeId) -> bool {
        let Some(open_lsqb) = self.bracket_tracker.get_open_lsqb() else {
            return false;
        };
        let Some(mut subscript_start) = tree.next_sibling(open_lsqb) else {
            return false;
        };
        match tree.syntax(subscript_start) {
            Some(Syntax::Listmaker) => return false,
            Some(Syntax::Subscriptlist) => match child_towards(tree, subscript_start, leaf) {
                Some(child) => subscript_start = child,
                None => return false,
            },
            _ => {}
        }
        is_complex_subscript_start(tree, subscript_start)
    }

    pub fn is_comment(&self) -> bool {
        self.leaves.len() == 1 && self.leaves[0].kind == TokenKind::StandaloneComment
    }

    pub fn is_decorator(&self) -> bool {
        self.leaves.first().is_some_and(|l| l.kind == TokenKind::At)
    }

    pub fn is_import(&self, tree: &Tree) -> bool {
        self.leaves.first().is_some_and(|l| crate::nodes::is_import(tree, l.id))
    }

    fn first_is_name(&self, value: &str) -> bool {
        self.leaves.first().is_some_and(|l| l.kind == TokenKind::Name && l.value == value)
    }

    pub fn is_class(&self) -> bool {
        self.first_is_name("class")
    }

    fn ends_with_dots(&self) -> bool {
        self.leaves.len() >= 3 && self.leaves[self.leaves.len() - 3..].iter().all(|l| l.kind == TokenKind::Dot && l.value == ".")
    }

    pub fn is_stub_class(&self) -> bool {
        self.is_class() && self.ends_with_dots()
    }

    pub fn is_def(&self) -> bool {
        self.first_is_name("def")
            || (self.first_is_name("async")
                && self.leaves.get(1).is_some_and(|l| l.kind == TokenKind::Name && l.value == "def"))
    }

    pub fn is_stub_def(&self) -> bool {
        let n = self.leaves.len();
        self.is_def() && n >= 4 && self.leaves[n - 4].kind == TokenKind::Colon && self.ends_with_dots()
    }

    /// `class A():` before the empty parens get dropped.
    pub fn is_class_paren_empty(&self) -> bool {
        self.leaves.len() == 4
            && self.is_class()
            && self.leaves[2].kind == TokenKind::LPar
            && self.leaves[2].value == "("
            && self.leaves[3].kind == TokenKind::RPar
            && self.leaves[3].value == ")"
    }

    pub fn is_triple_quoted_string(&self) -> bool {
        self.leaves
            .first()
            .is_some_and(|l| l.kind == TokenKind::String && (l.value.starts_with("\"\"\"") || l.value.starts_with("'''")))
    }

    pub fn is_flow_control(&self) -> bool {
        self.leaves.first().is_some_and(|l| {
            l.kind == TokenKind::Name && matches!(l.value.as_str(), "return" | "raise" | "break" | "continue")
        })
    }

    pub fn opens_block(&self) -> bool {
        self.leaves.last().is_some_and(|l| l.kind == TokenKind::Colon)
    }

    pub fn contains_standalone_comments(&self, depth_limit: usize) -> bool {
        self.leaves
            .iter()
            .any(|l| l.kind == TokenKind::StandaloneComment && l.bracket_depth <= depth_limit)
    }

    pub fn contains_multiline_strings(&self) -> bool {
        self.leaves.iter().any(LineLeaf::is_multiline_string)
    }

    /// Type comments that would end up on the wrong leaf if the line were joined.
    pub fn contains_uncollapsable_type_comments(&self) -> bool {
        let mut ignored = Vec::new();
        let Some(last) = self.leaves.last() else {
            return false;
        };
        ignored.push(last.id);
        if last.kind == TokenKind::Comma || (last.kind == TokenKind::RPar && last.value.is_empty()) {
            // Added trailing commas and invisible parens keep comments where they were.
            let Some(before) = self.leaves.len().checked_sub(2).map(|i| &self.leaves[i]) else {
                return false;
            };
            ignored.push(before.id);
        }

        let mut comment_seen = false;
        for (id, comments) in &self.comments {
            for comment in comments {
                if comment.is_type_comment() {
                    if comment_seen || (!comment.is_type_ignore_comment() && !ignored.contains(id)) {
                        return true;
                    }
                }
                comment_seen = true;
            }
        }
        false
    }

    /// A `# type: ignore` on a line that was a single physical line.
    pub fn contains_unsplittable_type_ignore(&self) -> bool {
        if self.leaves.is_empty() {
            return false;
        }
        let first_line = self.leaves.iter().map(|l| l.line).find(|&n| n != 0).unwrap_or(0);
        let last_line = self.leaves.iter().rev().map(|l| l.line).find(|&n| n != 0).unwrap_or(0);
        if first_line != last_line {
            return false;
        }
        // A comma or invisible paren may have been added after the original last leaf.
        let tail = &self.leaves[self.leaves.len().saturating_sub(2)..];
        tail.iter()
            .any(|leaf| self.comments_after(leaf.id).iter().any(LineLeaf::is_type_ignore_comment))
    }

    /// `(index, width)` of each leaf including its prefix and trailing
    /// comments; stops at the first multiline string.
    pub fn enumerate_with_length(&self) -> Vec<(usize, usize)> {
        self.measure(self.leaves.iter().enumerate())
    }

    /// [`Line::enumerate_with_length`] from the last leaf backwards.
    pub fn enumerate_with_length_rev(&self) -> Vec<(usize, usize)> {
        self.measure(self.leaves.iter().enumerate().rev())
    }

    fn measure<'a>(&self, leaves: impl Iterator<Item = (usize, &'a LineLeaf)>) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        for (index, leaf) in leaves {
            if leaf.value.contains('\n') {
                break;
            }
            let mut length = leaf.prefix.chars().count() + leaf.value.chars().count();
            length += self
                .comments_after(leaf.id)
                .iter()
                .map(|c| c.value.chars().count())
                .sum::<usize>();
            out.push((index, length));
        }
        out
    }

    pub fn index_of(&self, id: NodeId) -> Option<usize> {
        self.leaves.iter().position(|l| l.id == id)
    }

    pub fn traits(&self, tree: &Tree) -> LineTraits {
        LineTraits {
            depth: self.depth,
            leaf_count: self.leaves.len(),
            is_comment: self.is_comment(),
            is_decorator: self.is_decorator(),
            is_def: self.is_def(),
            is_class: self.is_class(),
            is_stub_class: self.is_stub_class(),
            is_import: self.is_import(tree),
            is_flow_control: self.is_flow_control(),
            is_triple_quoted_string: self.is_triple_quoted_string(),
            opens_block: self.opens_block(),
        }
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some((first, rest)) = self.leaves.split_first() else {
            return f.write_str("\n");
        };
        let indent = "    ".repeat(self.depth);
        write!(f, "{}{indent}{}", first.prefix, first.value)?;
        for leaf in rest {
            write!(f, "{leaf}")?;
        }
        for comment in self.comments.iter().flat_map(|(_, c)| c) {
            write!(f, "{comment}")?;
        }
        f.write_str("\n")
    }
}

/// Whether the brackets `opening`..`closing` hold exactly one item and a comma.
pub fn is_one_sequence_between(
    tree: &Tree,
    opening: NodeId,
    closing: &LineLeaf,
    leaves: &[LineLeaf],
    brackets: (TokenKind, TokenKind),
) -> bool {
    let Some(opening_index) = leaves.iter().position(|l| l.id == opening) else {
        return false;
    };
    if (leaves[opening_index].kind, closing.kind) != brackets {
        return false;
    }

    let depth = closing.bracket_depth + 1;
    let mut commas = 0;
    for leaf in &leaves[opening_index + 1..] {
        if leaf.id == closing.id {
            break;
        }
        if leaf.bracket_depth == depth && leaf.kind == TokenKind::Comma {
            commas += 1;
            if matches!(tree.parent_syntax(leaf.id), Some(Syntax::Arglist | Syntax::Typedargslist)) {
                commas += 1;
                break;
            }
        }
    }
    commas < 2
}

/// The rendered line fits within the line length and spans one physical line.
pub fn is_line_short_enough(line: &Line, line_length: usize) -> bool {
    let rendered = line.to_string();
    let line_str = rendered.trim_matches('\n');
    str_width(line_str) <= line_length && !line_str.contains('\n') && !line.contains_standalone_comments(usize::MAX)
}

/// Copy `leaves` of `old` onto `new` with their trailing comments.
///
/// Unless `preformatted`, whitespace is computed afresh.
pub fn append_leaves(tree: &Tree, new: &mut Line, old: &Line, leaves: &[LineLeaf], preformatted: bool) {
    for leaf in leaves {
        let mut copy = leaf.clone();
        if !preformatted {
            copy.prefix.clear();
        }
        new.append(tree, copy, preformatted, false);
        for comment in old.comments_after(leaf.id) {
            new.append(tree, comment.clone(), true, false);
        }
    }
}

/// False when splitting `line` can certainly not help, such as a string
/// followed by a chain of attribute calls.
pub fn can_be_split(line: &Line) -> bool {
    let leaves = &line.leaves;
    if leaves.len() < 2 {
        return false;
    }

    if leaves[0].kind == TokenKind::String && leaves[1].kind == TokenKind::Dot {
        let mut call_count = 0;
        let mut dot_count = 0;
        let mut next = &leaves[leaves.len() - 1];
        for leaf in leaves[..leaves.len() - 1].iter().rev() {
            if leaf.is_opening_bracket() {
                if !next.is_closing_bracket() {
                    return false;
                }
                call_count += 1;
            } else if leaf.kind == TokenKind::Dot {
                dot_count += 1;
            } else if leaf.kind == TokenKind::Name {
                if !(next.kind == TokenKind::Dot || next.is_opening_bracket()) {
                    return false;
                }
            } else if !leaf.is_closing_bracket() {
                return false;
            }
            if dot_count > 1 && call_count > 1 {
                return false;
            }
            next = leaf;
        }
    }
    true
}

/// Whether the body of a right hand split can go without its invisible
/// parentheses and still produce lines that fit.
///
/// Only answers yes for shapes known to look right; a wrong yes would
/// produce lines that are too long.
pub fn can_omit_invisible_parens(tree: &Tree, line: &Line, line_length: usize) -> bool {
    // Standalone comments outside nested visible brackets need the parens to split.
    let mut closing: Option<&LineLeaf> = None;
    for leaf in line.leaves.iter().rev() {
        if let Some(c) = closing
            && Some(leaf.id) == c.opening_bracket
        {
            closing = None;
        }
        if leaf.kind == TokenKind::StandaloneComment && closing.is_none() {
            return false;
        }
        if closing.is_none()
            && leaf.is_closing_bracket()
            && !leaf.value.is_empty()
            && leaf.opening_bracket.is_some_and(|o| line.index_of(o).is_some())
        {
            closing = Some(leaf);
        }
    }

    let bt = &line.bracket_tracker;
    if bt.delimiters.is_empty() {
        // Without delimiters the optional parentheses are useless.
        return true;
    }

    let max_priority = bt.max_delimiter_priority(None);
    if bt.delimiter_count_with_priority(max_priority) > 1 {
        return false;
    }
    if max_priority == DOT_PRIORITY {
        // A single stranded method call doesn't need optional parentheses.
        return true;
    }

    if line.leaves.len() < 2 {
        return false;
    }
    let first = &line.leaves[0];
    let second = &line.leaves[1];
    if first.is_opening_bracket() && !second.is_closing_bracket() && can_omit_opening_paren(line, first.id, line_length)
    {
        return true;
    }

    let penultimate = &line.leaves[line.leaves.len() - 2];
    let last = &line.leaves[line.leaves.len() - 1];
    let last_closes = match last.kind {
        TokenKind::RPar | TokenKind::RBrace => true,
        // Indexing is not worth omitting the parens for.
        TokenKind::RSqb => tree.parent(last.id).is_some_and(|p| !tree.is_syntax(p, Syntax::Trailer)),
        _ => false,
    };
    if last_closes {
        if penultimate.is_opening_bracket() {
            // Empty brackets would fail a split.
            return false;
        }
        if first.is_multiline_string() {
            return true;
        }

        let mut length = 4 * line.depth;
        let mut seen_other_brackets = false;
        for (index, leaf_length) in line.enumerate_with_length() {
            length += leaf_length;
            let leaf = &line.leaves[index];
            if Some(leaf.id) == last.opening_bracket {
                if seen_other_brackets || length <= line_length {
                    return true;
                }
            } else if leaf.is_opening_bracket() {
                // There are brackets we can further split on.
                seen_other_brackets = true;
            }
        }
    }
    false
}

fn can_omit_opening_paren(line: &Line, first: NodeId, line_length: usize) -> bool {
    let mut remainder = false;
    let mut length = 4 * line.depth;
    let measured = line.enumerate_with_length();
    for &(index, leaf_length) in &measured {
        let leaf = &line.leaves[index];
        if leaf.is_closing_bracket() && leaf.opening_bracket == Some(first) {
            remainder = true;
        }
        if remainder {
            length += leaf_length;
            if length > line_length {
                return false;
            }
            if leaf.is_opening_bracket() {
                // There are brackets we can further split on.
                remainder = false;
            }
        }
    }
    // The whole line was measured and stayed within the limit.
    measured.len() == line.leaves.len()
}

/// What the empty line policy needs to know about a line after it is gone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineTraits {
    pub depth: usize,
    pub leaf_count: usize,
    pub is_comment: bool,
    pub is_decorator: bool,
    pub is_def: bool,
    pub is_class: bool,
    pub is_stub_class: bool,
    pub is_import: bool,
    pub is_flow_control: bool,
    pub is_triple_quoted_string: bool,
    pub opens_block: bool,
}

/// The output of one logical line: blank lines before, its physical lines,
/// blank lines after.
#[derive(Debug, Clone, Default)]
pub struct LinesBlock {
    pub before: usize,
    pub after: usize,
    pub content_lines: Vec<String>,
    previous_block: Option<usize>,
    original: LineTraits,
}

impl LinesBlock {
    pub fn all_lines(&self) -> String {
        let mut out = "\n".repeat(self.before);
        for line in &self.content_lines {
            out.push_str(line);
        }
        out.push_str(&"\n".repeat(self.after));
        out
    }
}

/// Decides the blank lines between consecutive logical lines.
///
/// Blocks stay mutable after they are produced: a comment that leads a
/// definition gets the definition's blank lines moved in front of it.
#[derive(Debug, Clone)]
pub struct EmptyLineTracker {
    mode: Mode,
    previous_line: Option<LineTraits>,
    previous_block: Option<usize>,
    previous_defs: Vec<usize>,
    semantic_leading_comment: Option<usize>,
    blocks: Vec<LinesBlock>,
}

impl EmptyLineTracker {
    pub fn new(mode: Mode) -> Self {
        EmptyLineTracker {
            mode,
            previous_line: None,
            previous_block: None,
            previous_defs: Vec::new(),
            semantic_leading_comment: None,
            blocks: Vec::new(),
        }
    }

    /// Open the block for `line` and return its index.
    ///
    /// Consumes the newlines recorded in the prefix of the line's first leaf.
    pub fn maybe_empty_lines(&mut self, tree: &Tree, line: &mut Line) -> usize {
        let current = line.traits(tree);
        let max_allowed = match (current.depth, self.mode.is_pyi) {
            (0, false) => 2,
            _ => 1,
        };
        let mut before = match line.leaves.first_mut() {
            Some(first) => {
                let count = first.prefix.matches('\n').count();
                first.prefix.clear();
                count.min(max_allowed)
            }
            None => 0,
        };
        let user_had_newlines = before > 0;
        let first_value = line.leaves.first().map(|l| l.value.clone()).unwrap_or_default();

        let depth = current.depth;
        while let Some(&def_depth) = self.previous_defs.last() {
            if def_depth < depth {
                break;
            }
            if self.mode.is_pyi {
                let previous_is_class = self.previous_line.is_some_and(|p| p.is_class);
                before = if depth > 0 && !user_had_newlines && previous_is_class { 0 } else { 1 };
            } else if depth > 0 {
                before = 1;
            } else if def_depth > 0
                && line.opens_block()
                && !matches!(first_value.as_str(), "with" | "try" | "for" | "while" | "if" | "match")
            {
                // A dependent clause such as `else:` after a conditional definition.
                before = 1;
            } else {
                before = 2;
            }
            self.previous_defs.pop();
        }

        let (before, after) = self.compute(&current, before, user_had_newlines);
        let previous_after = self.previous_block.map_or(0, |b| self.blocks[b].after);
        let mut before = match self.previous_line {
            // No blank lines at the start of the file.
            None => 0,
            Some(_) => before.saturating_sub(previous_after),
        };
        if let Some(previous) = self.previous_block
            && self.blocks[previous].previous_block.is_none()
            && self.blocks[previous].original.leaf_count == 1
            && self.blocks[previous].original.is_triple_quoted_string
            && !(current.is_class || current.is_def)
        {
            // Exactly one blank line after a module docstring.
            before = 1;
        }

        let index = self.blocks.len();
        self.blocks.push(LinesBlock {
            before,
            after,
            content_lines: Vec::new(),
            previous_block: self.previous_block,
            original: current,
        });

        if current.is_comment {
            let after_decorator = self.previous_line.is_some_and(|p| p.is_decorator);
            if self.previous_line.is_none()
                || (!after_decorator && (self.semantic_leading_comment.is_none() || before > 0))
            {
                self.semantic_leading_comment = Some(index);
            }
        } else if !current.is_decorator {
            self.semantic_leading_comment = None;
        }

        self.previous_line = Some(current);
        self.previous_block = Some(index);
        index
    }

    fn compute(&mut self, current: &LineTraits, before: usize, user_had_newlines: bool) -> (usize, usize) {
        if current.is_decorator || current.is_def || current.is_class {
            return self.for_class_or_def(current, before, user_had_newlines);
        }
        let Some(previous) = self.previous_line else {
            return (before, 0);
        };

        if previous.is_import && !current.is_import && current.depth == previous.depth {
            return (before.max(1), 0);
        }
        if previous.is_class && current.is_triple_quoted_string {
            return (0, 1);
        }
        if previous.opens_block && (previous.is_def || current.is_triple_quoted_string) {
            // Function bodies and docstrings start right below their header.
            return (0, 0);
        }
        (before, 0)
    }

    fn for_class_or_def(&mut self, current: &LineTraits, before: usize, user_had_newlines: bool) -> (usize, usize) {
        if !current.is_decorator {
            self.previous_defs.push(current.depth);
        }
        let Some(previous) = self.previous_line else {
            return (0, 0);
        };

        if previous.is_decorator {
            if self.mode.is_pyi && current.is_stub_class {
                return (0, 1);
            }
            return (0, 0);
        }

        if previous.depth < current.depth && (previous.is_class || previous.is_def) {
            if self.mode.is_pyi {
                return (0, 0);
            }
            return (usize::from(user_had_newlines), 0);
        }

        let mut comment_to_add_newlines = None;
        if previous.is_comment && previous.depth == current.depth && before == 0 {
            let leading = self.semantic_leading_comment.filter(|&slc| {
                let block = &self.blocks[slc];
                block.before <= 1
                    && block.previous_block.is_some_and(|pb| {
                        let original = &self.blocks[pb].original;
                        !original.is_class && !original.opens_block
                    })
            });
            match leading {
                Some(slc) => comment_to_add_newlines = Some(slc),
                None => return (0, 0),
            }
        }

        let mut newlines = if self.mode.is_pyi {
            if current.is_class || previous.is_class {
                usize::from(current.depth == 0)
            } else if (current.is_def || current.is_decorator) && !previous.is_def {
                if current.depth > 0 {
                    // Blank lines between attributes and methods are kept.
                    before.min(1)
                } else {
                    1
                }
            } else {
                0
            }
        } else if current.depth > 0 {
            1
        } else {
            2
        };

        if let Some(slc) = comment_to_add_newlines
            && let Some(previous_block) = self.blocks[slc].previous_block
        {
            let previous_after = self.blocks[previous_block].after;
            let block = &mut self.blocks[slc];
            block.before = block.before.max(newlines).saturating_sub(previous_after);
            newlines = 0;
        }
        (newlines, 0)
    }

    pub fn block_mut(&mut self, index: usize) -> &mut LinesBlock {
        &mut self.blocks[index]
    }

    /// All blocks; the last one never ends in blank lines.
    pub fn finish(mut self) -> Vec<LinesBlock> {
        if let Some(last) = self.blocks.last_mut() {
            last.after = 0;
        }
        self.blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use std::collections::BTreeSet;

    fn mode() -> Mode {
        Mode::from(&FormatConfig::default())
    }

    /// The leaves of the first statement, appended the way the line
    /// generator does for code inside brackets.
    fn line_of(tree: &Tree) -> Line {
        let mut line = Line::new(mode(), 0, true);
        for id in tree.leaves(tree.root()) {
            if tree.token(id).is_some_and(|k| k.is_whitespace() || k == TokenKind::EndMarker) {
                continue;
            }
            let mut leaf = LineLeaf::from_tree(tree, id).unwrap();
            leaf.prefix.clear();
            line.append(tree, leaf, false, false);
        }
        line
    }

    fn parsed(source: &str) -> Tree {
        parse(source, &BTreeSet::new()).unwrap()
    }

    #[test]
    fn renders_with_whitespace() {
        let tree = parsed("x=f(a,b[1:2])\n");
        assert_eq!(line_of(&tree).to_string(), "x = f(a, b[1:2])\n");
    }

    #[test]
    fn delimiters_by_priority() {
        let tree = parsed("a + b * c, d\n");
        let line = line_of(&tree);
        let bt = &line.bracket_tracker;
        assert_eq!(bt.max_delimiter_priority(None), COMMA_PRIORITY);
        assert_eq!(bt.delimiter_count_with_priority(COMMA_PRIORITY), 1);
        assert_eq!(bt.delimiter_count_with_priority(5), 1);
        assert_eq!(bt.delimiter_count_with_priority(4), 1);
    }

    #[test]
    fn commas_inside_brackets_are_not_delimiters() {
        let tree = parsed("f(a, b)\n");
        let line = line_of(&tree);
        assert!(line.bracket_tracker.delimiters.is_empty());
        assert!(!line.bracket_tracker.any_open_brackets());
    }

    #[test]
    fn comprehension_variables_are_not_delimiters() {
        let tree = parsed("[a for a, b in c]\n");
        let line = line_of(&tree);
        assert_eq!(line.bracket_tracker.max_delimiter_priority(None), 0);
    }

    #[test]
    fn magic_trailing_comma_detection() {
        let tree = parsed("f(a,)\n");
        assert!(line_of(&tree).magic_trailing_comma.is_some());
        let tree = parsed("(1,)\n");
        assert!(line_of(&tree).magic_trailing_comma.is_none());
        let tree = parsed("x[1,]\n");
        assert!(line_of(&tree).magic_trailing_comma.is_none());
        let tree = parsed("[1,]\n");
        assert!(line_of(&tree).magic_trailing_comma.is_some());
    }

    #[test]
    fn trailing_comment_attaches_to_last_leaf() {
        let mut tree = parsed("x = 1\n");
        let mut line = line_of(&tree);
        let comment = tree.new_leaf(TokenKind::Comment, "# note", "", (0, 0));
        line.append(&tree, LineLeaf::from_tree(&tree, comment).unwrap(), false, false);
        assert_eq!(line.to_string(), "x = 1  # note\n");
        assert_eq!(line.comments.len(), 1);
    }

    #[test]
    fn short_enough() {
        let tree = parsed("x = 1\n");
        let line = line_of(&tree);
        assert!(is_line_short_enough(&line, 5));
        assert!(!is_line_short_enough(&line, 4));
    }

    fn feed(tracker: &mut EmptyLineTracker, tree: &Tree, line: &Line) -> usize {
        tracker.maybe_empty_lines(tree, &mut line.clone())
    }

    #[test]
    fn two_blank_lines_around_top_level_defs() {
        let tree = parsed("import os\ndef f():\n    pass\nx = 1\n");
        let mut tracker = EmptyLineTracker::new(mode());
        let mut lines = Vec::new();
        let mut current = Line::new(mode(), 0, false);
        for id in tree.leaves(tree.root()) {
            match tree.token(id) {
                Some(TokenKind::Newline) => lines.push(std::mem::replace(&mut current, Line::new(mode(), 0, false))),
                Some(TokenKind::Indent) => current.depth += 1,
                Some(TokenKind::Dedent) => current.depth = current.depth.saturating_sub(1),
                Some(TokenKind::EndMarker) => {}
                _ => {
                    let mut leaf = LineLeaf::from_tree(&tree, id).unwrap();
                    leaf.prefix.clear();
                    current.append(&tree, leaf, false, false);
                }
            }
        }
        let befores: Vec<usize> = lines
            .iter()
            .map(|line| {
                let index = feed(&mut tracker, &tree, line);
                tracker.block_mut(index).before
            })
            .collect();
        assert_eq!(befores, [0, 2, 0, 2]);
    }
}
