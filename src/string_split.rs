//! String literal transforms, only active with the string processing
//! preview feature.
//!
//! Implicitly concatenated strings are merged into one literal first, so
//! that a long string can then be split again at spaces into pieces that
//! fit, wrapped in parentheses when it sits on the right of an `=`,
//! `return` or dictionary colon.

use crate::grammar::{Syntax, TokenKind};
use crate::lines::{Line, LineLeaf, append_leaves};
use crate::split::{CannotTransform, TransformResult};
use crate::strings::{count_chars_in_width, get_string_prefix, has_triple_quotes, normalize_string_quotes, str_width};
use crate::tree::{NodeId, Tree};
use log::trace;

/// Neither side of a split may be shorter than this.
const MIN_SUBSTR_SIZE: usize = 6;

/// Full-width punctuation after which a string may break even without a space.
const SPLIT_SAFE_CHARS: [char; 3] = ['\u{3001}', '\u{3002}', '\u{ff0c}'];

fn is_empty_lpar(leaf: &LineLeaf) -> bool {
    leaf.kind == TokenKind::LPar && leaf.value.is_empty()
}

fn is_empty_rpar(leaf: &LineLeaf) -> bool {
    leaf.kind == TokenKind::RPar && leaf.value.is_empty()
}

fn is_empty_par(leaf: &LineLeaf) -> bool {
    is_empty_lpar(leaf) || is_empty_rpar(leaf)
}

/// Operators that may start a line right before a string.
fn is_string_operator(leaf: &LineLeaf) -> bool {
    leaf.kind == TokenKind::Star
        || (leaf.kind == TokenKind::Op
            && matches!(leaf.value.as_str(), "==" | "!=" | ">" | ">=" | "<" | "<=" | "%" | "+"))
}

fn contains_pragma_comment(comments: &[LineLeaf]) -> bool {
    comments.iter().any(|c| {
        c.value.starts_with("# type:") || c.value.starts_with("# noqa") || c.value.starts_with("# pylint:")
    })
}

/// Strings in annotations are types, not text.
fn is_part_of_annotation(tree: &Tree, leaf: NodeId) -> bool {
    let mut current = Some(leaf);
    while let Some(node) = current {
        if tree.prev_sibling(node).is_some_and(|p| tree.is_token(p, TokenKind::RArrow)) {
            return true;
        }
        if tree.parent(node).is_some_and(|p| tree.is_syntax(p, Syntax::Tname)) {
            return true;
        }
        current = tree.parent(node);
    }
    false
}

/// Index just past the string at `string_idx` and what is bound to it:
/// `.method(...)`, `.attribute`, or `% argument`. Invisible parens are
/// passed over.
fn skip_string_trailer(leaves: &[LineLeaf], string_idx: usize) -> usize {
    #[derive(PartialEq)]
    enum State {
        Start,
        Dot,
        Name,
        Lpar,
        Percent,
        SingleFmtArg,
        Rpar,
        Done,
    }

    let mut state = State::Start;
    let mut unmatched_lpars = 0usize;
    let mut idx = string_idx + 1;
    while let Some(leaf) = leaves.get(idx) {
        if is_empty_par(leaf) {
            idx += 1;
            continue;
        }
        if leaf.kind == TokenKind::LPar {
            unmatched_lpars += 1;
        }
        state = match state {
            State::Lpar => {
                if leaf.kind == TokenKind::RPar {
                    unmatched_lpars = unmatched_lpars.saturating_sub(1);
                    if unmatched_lpars == 0 { State::Rpar } else { State::Lpar }
                } else {
                    State::Lpar
                }
            }
            State::Start if leaf.kind == TokenKind::Dot => State::Dot,
            State::Start if leaf.kind == TokenKind::Op && leaf.value == "%" => State::Percent,
            State::Dot if leaf.kind == TokenKind::Name => State::Name,
            State::Name | State::Percent if leaf.kind == TokenKind::LPar => State::Lpar,
            State::Percent => State::SingleFmtArg,
            _ => State::Done,
        };
        if state == State::Done {
            break;
        }
        idx += 1;
    }
    idx
}

/// Spans of `{...}` replacement fields in an f-string body, end exclusive.
pub(crate) fn iter_fexpr_spans(s: &[char]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut stack: Vec<usize> = Vec::new();
    let mut i = 0;
    while i < s.len() {
        match s[i] {
            '{' => {
                // Doubled braces outside an expression are literal.
                if stack.is_empty() && s.get(i + 1) == Some(&'{') {
                    i += 2;
                    continue;
                }
                stack.push(i);
                i += 1;
                continue;
            }
            '}' => {
                if let Some(start) = stack.pop()
                    && stack.is_empty()
                {
                    spans.push((start, i + 1));
                }
                i += 1;
                continue;
            }
            _ => {}
        }
        if !stack.is_empty() {
            // Skip over string literals inside the expression.
            let delim_len = if s[i..].starts_with(&['\'', '\'', '\'']) || s[i..].starts_with(&['"', '"', '"']) {
                3
            } else if s[i] == '\'' || s[i] == '"' {
                1
            } else {
                0
            };
            if delim_len > 0 {
                let delim = s[i..i + delim_len].to_vec();
                i += delim_len;
                while i < s.len() && !s[i..].starts_with(&delim) {
                    i += 1;
                }
                i += delim_len;
                continue;
            }
        }
        i += 1;
    }
    spans
}

fn fstring_contains_expr(literal: &str) -> bool {
    let chars: Vec<char> = literal.chars().collect();
    !iter_fexpr_spans(&chars).is_empty()
}

/// Drop a pointless `f` prefix from a piece that has no replacement fields.
fn normalize_f_string(literal: &str, prefix: &str) -> String {
    if !prefix.contains('f') || fstring_contains_expr(literal) {
        return literal.to_string();
    }
    let new_prefix = prefix.replace('f', "");
    let body = literal[prefix.len()..].replace("{{", "{").replace("}}", "}");
    format!("{new_prefix}{body}")
}

fn maybe_normalize_quotes(line: &Line, literal: String) -> String {
    if line.mode.string_normalization {
        normalize_string_quotes(&literal)
    } else {
        literal
    }
}

/// The body of a string literal with every unescaped `quote` escaped.
fn make_naked(literal: &str, prefix_len: usize, quote: char) -> String {
    let chars: Vec<char> = literal.chars().collect();
    let body = &chars[prefix_len + 1..chars.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut backslashes = 0;
    for &c in body {
        if c == quote && backslashes % 2 == 0 {
            out.push('\\');
        }
        backslashes = if c == '\\' { backslashes + 1 } else { 0 };
        out.push(c);
    }
    out
}

/// Merge every run of implicitly concatenated strings on the line into
/// a single literal.
pub fn merge_strings(tree: &mut Tree, line: &Line) -> TransformResult {
    let leaves = &line.leaves;
    let mut groups = Vec::new();
    let mut i = 0;
    while i < leaves.len() {
        if leaves[i].kind == TokenKind::String
            && leaves.get(i + 1).is_some_and(|n| n.kind == TokenKind::String)
            && !is_part_of_annotation(tree, leaves[i].id)
        {
            groups.push(i);
            i += 2;
            while leaves.get(i).is_some_and(|l| l.kind == TokenKind::String) {
                i += 1;
            }
        } else {
            i += 1;
        }
    }
    if groups.is_empty() {
        return Err(CannotTransform::new("this line has no strings that need merging"));
    }

    let mut merged: Vec<(usize, usize, LineLeaf)> = Vec::new();
    for start in groups {
        match merge_string_group(tree, line, start) {
            Ok(group) => merged.push(group),
            Err(reason) => trace!("string group not merged: {reason}"),
        }
    }
    if merged.is_empty() {
        return Err(CannotTransform::new("failed to merge any strings in this line"));
    }

    let mut new_line = line.clone_empty();
    let mut i = 0;
    while i < leaves.len() {
        match merged.iter().find(|(start, _, _)| *start == i) {
            Some((_, count, leaf)) => {
                new_line.append(tree, leaf.clone(), false, false);
                for old in &leaves[i..i + count] {
                    for comment in line.comments_after(old.id) {
                        new_line.append(tree, comment.clone(), true, false);
                    }
                }
                i += count;
            }
            None => {
                append_leaves(tree, &mut new_line, line, &leaves[i..=i], false);
                i += 1;
            }
        }
    }
    Ok(vec![new_line])
}

/// Merge the strings starting at `start`; returns the start, the number
/// of strings merged and the new leaf, already placed in the tree.
fn merge_string_group(
    tree: &mut Tree,
    line: &Line,
    start: usize,
) -> Result<(usize, usize, LineLeaf), CannotTransform> {
    let leaves = &line.leaves;
    let end = leaves[start..]
        .iter()
        .position(|l| l.kind != TokenKind::String)
        .map_or(leaves.len(), |p| start + p);
    let group = &leaves[start..end];

    let mut inline_comments = 0;
    let mut prefixes: Vec<String> = Vec::new();
    for leaf in group {
        if has_triple_quotes(&leaf.value) {
            return Err(CannotTransform::new("multiline strings are not merged"));
        }
        let prefix = get_string_prefix(&leaf.value).to_lowercase();
        if prefix.contains('r') {
            return Err(CannotTransform::new("raw strings are not merged"));
        }
        if !prefixes.contains(&prefix) {
            prefixes.push(prefix);
        }
        let comments = line.comments_after(leaf.id);
        if !comments.is_empty() {
            inline_comments += 1;
            if contains_pragma_comment(comments) {
                return Err(CannotTransform::new("cannot merge strings which have pragma comments"));
            }
        }
    }
    if let Some(after) = leaves.get(end)
        && after.kind == TokenKind::Comma
        && !line.comments_after(after.id).is_empty()
    {
        inline_comments += 1;
    }
    if inline_comments > 1 {
        return Err(CannotTransform::new(format!("too many inline string comments ({inline_comments})")));
    }
    if prefixes.len() > 1 && !(prefixes.len() == 2 && prefixes.iter().all(|p| p.is_empty() || p == "f")) {
        return Err(CannotTransform::new("too many different prefixes"));
    }

    let quote = group[0].value.chars().last().unwrap_or('"');
    let prefix = group
        .iter()
        .map(|l| get_string_prefix(&l.value).to_lowercase())
        .find(|p| !p.is_empty())
        .unwrap_or_default();
    let mut naked = String::new();
    for leaf in group {
        let mut value = leaf.value.clone();
        let next_prefix = get_string_prefix(&value).to_lowercase();
        if prefix.contains('f') && !next_prefix.contains('f') {
            // The merged string is an f-string; literal braces must double.
            value = value.replace('{', "{{").replace('}', "}}");
        }
        naked.push_str(&make_naked(&value, next_prefix.chars().count(), quote));
    }
    let value = maybe_normalize_quotes(line, format!("{prefix}{quote}{naked}{quote}"));

    let new_leaf = tree.new_leaf(TokenKind::String, value, "", (0, 0));
    let first = group[0].id;
    if let Some(parent) = tree.parent(first) {
        let whole_atom = tree.is_syntax(parent, Syntax::Atom) && tree.children(parent).len() == group.len();
        if whole_atom {
            tree.replace(parent, new_leaf);
        } else if let Some(index) = tree.remove(first) {
            for leaf in &group[1..] {
                tree.remove(leaf.id);
            }
            tree.insert_child(parent, index, new_leaf);
        }
    }
    let leaf = LineLeaf::from_tree(tree, new_leaf)
        .ok_or_else(|| CannotTransform::new("merged string is not a leaf"))?;
    Ok((start, group.len(), leaf))
}

/// Remove brackets around a string that only group it, as in `(("a"))`.
pub fn strip_string_parens(tree: &mut Tree, line: &Line) -> TransformResult {
    let leaves = &line.leaves;
    let mut removed: Vec<usize> = Vec::new();
    let mut idx = 0;
    while idx < leaves.len() {
        let leaf = &leaves[idx];
        let current = idx;
        idx += 1;
        if leaf.kind != TokenKind::String {
            continue;
        }
        // An expression statement of its own, such as a docstring.
        let pointless = tree
            .parent(leaf.id)
            .and_then(|p| tree.parent(p))
            .is_some_and(|gp| tree.is_syntax(gp, Syntax::SimpleStmt));
        if pointless {
            continue;
        }
        let Some(lpar_idx) = current.checked_sub(1) else {
            continue;
        };
        let lpar = &leaves[lpar_idx];
        if lpar.kind != TokenKind::LPar || is_empty_lpar(lpar) {
            continue;
        }
        // Not a call: the paren must not follow a name or a closing bracket.
        let before = lpar_idx.checked_sub(1).map(|i| &leaves[i]);
        if before.is_some_and(|b| b.kind == TokenKind::Name || b.is_closing_bracket()) {
            continue;
        }

        let rpar_idx = skip_string_trailer(leaves, current);
        if let Some(before) = before {
            let has_percent = leaves[lpar_idx..rpar_idx]
                .iter()
                .any(|l| l.kind == TokenKind::Op && l.value == "%");
            let binds_tighter = matches!(before.kind, TokenKind::Star | TokenKind::DoubleStar | TokenKind::LSqb | TokenKind::LPar)
                || (before.kind == TokenKind::Op && matches!(before.value.as_str(), "/" | "%" | "~"))
                || before.kind == TokenKind::Name && before.value == "await"
                || (before.kind == TokenKind::Op
                    && matches!(before.value.as_str(), "+" | "-")
                    && tree.parent_syntax(before.id) == Some(Syntax::Factor));
            if has_percent && binds_tighter {
                continue;
            }
        }
        let Some(rpar) = leaves.get(rpar_idx) else {
            continue;
        };
        if rpar.kind != TokenKind::RPar || is_empty_rpar(rpar) {
            continue;
        }
        let binds_to_next = leaves.get(rpar_idx + 1).is_some_and(|n| {
            matches!(n.kind, TokenKind::DoubleStar | TokenKind::LSqb | TokenKind::LPar | TokenKind::Dot)
        });
        if binds_to_next {
            continue;
        }
        // Parentheses carrying comments stay.
        if !line.comments_after(lpar.id).is_empty() || !line.comments_after(rpar.id).is_empty() {
            continue;
        }
        removed.push(lpar_idx);
        removed.push(rpar_idx);
        while leaves.get(idx).is_some_and(|l| l.kind == TokenKind::String) {
            idx += 1;
        }
    }
    if removed.is_empty() {
        return Err(CannotTransform::new("this line has no strings wrapped in parens"));
    }

    let mut new_line = line.clone_empty();
    for (i, leaf) in leaves.iter().enumerate() {
        if removed.contains(&i) {
            tree.remove(leaf.id);
            continue;
        }
        append_leaves(tree, &mut new_line, line, std::slice::from_ref(leaf), false);
    }
    Ok(vec![new_line])
}

/// Columns the rest of the line takes up around the string at `string_idx`,
/// subtracted from the line length.
fn max_string_length(line: &Line, string_idx: usize) -> usize {
    let leaves = &line.leaves;
    let width = |leaf: &LineLeaf| leaf.to_string().chars().count();
    let mut offset = line.depth * 4;

    if let Some(mut p_idx) = string_idx.checked_sub(1) {
        if is_empty_lpar(&leaves[p_idx]) && string_idx >= 2 {
            p_idx -= 1;
        }
        let p = &leaves[p_idx];
        if is_string_operator(p) {
            // A space and the operator, as in `+ STRING`.
            offset += width(p) + 1;
        }
        if p.kind == TokenKind::Comma {
            // A space, a comma and a closing bracket, as in `), STRING`.
            offset += 3;
        }
        if matches!(p.kind, TokenKind::Colon | TokenKind::Equal | TokenKind::Name)
            || (p.kind == TokenKind::Op && p.value == "+=")
        {
            // Dictionary keys, assignments, `return STRING` and `else STRING`.
            offset += 1;
            for leaf in leaves[..=p_idx].iter().rev() {
                offset += width(leaf);
                if leaf.is_closing_bracket() {
                    break;
                }
            }
        }
    }

    if let Some(mut next) = leaves.get(string_idx + 1) {
        if is_empty_rpar(next) && leaves.len() > string_idx + 2 {
            next = &leaves[string_idx + 2];
        }
        if next.kind == TokenKind::Comma {
            offset += 1;
        }
        if let Some(after) = leaves.get(string_idx + 2)
            && next.kind == TokenKind::Dot
            && after.kind == TokenKind::Name
        {
            // A method called on the string, up to its opening paren.
            offset += 1;
            if leaves.get(string_idx + 3).is_some_and(|l| l.kind == TokenKind::LPar) {
                offset += 1;
            }
            offset += after.value.chars().count();
        }
    }

    let comments = line.comments_after(leaves[string_idx].id);
    if !comments.is_empty() {
        offset += 2 + comments.iter().map(|c| c.value.chars().count()).sum::<usize>();
    }
    line.mode.line_length.saturating_sub(offset)
}

/// Conditions shared by the splitting transforms.
fn validate(tree: &Tree, line: &Line, string_idx: usize) -> Result<(), CannotTransform> {
    let leaf = &line.leaves[string_idx];
    if is_part_of_annotation(tree, leaf.id) {
        return Err(CannotTransform::new("string is part of a type annotation"));
    }
    if str_width(&leaf.value) <= max_string_length(line, string_idx) {
        return Err(CannotTransform::new("the string itself is not what makes this line too long"));
    }
    let pointless = tree.parent(leaf.id).is_none_or(|p| {
        let kinds: Vec<Option<TokenKind>> = tree.children(p).iter().map(|&c| tree.token(c)).collect();
        kinds == [Some(TokenKind::String), Some(TokenKind::Newline)]
    });
    if pointless {
        return Err(CannotTransform::new("this string is an expression statement of its own"));
    }
    if contains_pragma_comment(line.comments_after(leaf.id)) {
        return Err(CannotTransform::new("splitting the line could move an inline pragma comment"));
    }
    if has_triple_quotes(&leaf.value) {
        return Err(CannotTransform::new("multiline strings cannot be split"));
    }
    Ok(())
}

/// Indices inside f-string replacement fields and `\N{...}` escapes,
/// where a string must never be cut.
fn illegal_split_indices(string: &[char], prefix: &str) -> Vec<bool> {
    let mut illegal = vec![false; string.len() + 1];
    if prefix.contains('f') {
        for (begin, end) in iter_fexpr_spans(string) {
            for flag in &mut illegal[begin..=end.min(string.len())] {
                *flag = true;
            }
        }
    }
    let mut escaped = false;
    let mut i = 0;
    while i < string.len() {
        let c = string[i];
        if c == '\\' {
            escaped = !escaped;
            i += 1;
            continue;
        }
        if escaped && c == 'N' {
            let begin = i - 1;
            let end = string[i..].iter().position(|&c| c == '}').map_or(string.len() - 1, |p| i + p);
            for flag in &mut illegal[begin..=end] {
                *flag = true;
            }
            i = end;
        }
        escaped = false;
        i += 1;
    }
    illegal
}

/// Where to cut `string` so the left part ends at or before `max_break_idx`.
///
/// Cuts land on a space (or full-width punctuation), never on an escaped
/// character or inside an expression, and leave both sides at least
/// [`MIN_SUBSTR_SIZE`] long. If nothing fits, the first acceptable cut
/// past the limit is used.
fn get_break_idx(string: &[char], prefix: &str, max_break_idx: usize) -> Option<usize> {
    if max_break_idx >= string.len() {
        return None;
    }
    let illegal = illegal_split_indices(string, prefix);
    let passes_all_checks = |i: usize| {
        let is_space = string[i] == ' ';
        let is_split_safe = i > 0 && SPLIT_SAFE_CHARS.contains(&string[i - 1]);
        let backslashes = string[..i].iter().rev().take_while(|&&c| c == '\\').count();
        let is_big_enough = string.len() - i >= MIN_SUBSTR_SIZE && i >= MIN_SUBSTR_SIZE;
        (is_space || is_split_safe) && backslashes % 2 == 0 && is_big_enough && !illegal[i]
    };

    let mut break_idx = max_break_idx;
    while break_idx >= 1 && !passes_all_checks(break_idx) {
        break_idx -= 1;
    }
    if passes_all_checks(break_idx) {
        return Some(break_idx);
    }

    // Nothing fits; the next line will be too long, but shorter.
    let mut break_idx = max_break_idx + 1;
    while break_idx + 1 < string.len() && !passes_all_checks(break_idx) {
        break_idx += 1;
    }
    (break_idx < string.len() && passes_all_checks(break_idx)).then_some(break_idx)
}

/// Split a line that holds a single long string (possibly behind a string
/// operator and before a comma) into one line per piece.
pub fn split_string(tree: &mut Tree, line: &Line) -> TransformResult {
    let leaves = &line.leaves;
    let mut idx = 0;
    let starts_with = |i: usize, value: &str| leaves.get(i).is_some_and(|l| l.kind == TokenKind::Name && l.value == value);
    if starts_with(0, "not") && starts_with(1, "in") {
        idx = 2;
    } else if leaves.first().is_some_and(is_string_operator) || starts_with(0, "in") {
        idx = 1;
    }
    if leaves.get(idx).is_some_and(is_empty_lpar) {
        idx += 1;
    }
    if !leaves.get(idx).is_some_and(|l| l.kind == TokenKind::String) {
        return Err(CannotTransform::new("line does not start with a string"));
    }
    let string_idx = idx;
    idx = skip_string_trailer(leaves, string_idx);
    if leaves.get(idx).is_some_and(is_empty_rpar) {
        idx += 1;
    }
    if leaves.get(idx).is_some_and(|l| l.kind == TokenKind::Comma) {
        idx += 1;
    }
    if idx < leaves.len() {
        return Err(CannotTransform::new("this line does not end with a string"));
    }
    validate(tree, line, string_idx)?;

    let string_leaf = &leaves[string_idx];
    let quote = string_leaf.value.chars().last().unwrap_or('"');
    let prefix = get_string_prefix(&string_leaf.value).to_lowercase();
    let drop_pointless_f_prefix = prefix.contains('f') && fstring_contains_expr(&string_leaf.value);

    let op_leaves: Vec<LineLeaf> = leaves
        .iter()
        .take_while(|l| is_string_operator(l) || l.kind == TokenKind::Name)
        .cloned()
        .collect();
    let op_leaves_length = if op_leaves.is_empty() {
        0
    } else {
        op_leaves.iter().map(|l| l.value.chars().count()).sum::<usize>() + 1
    };
    let ends_with_comma = leaves.get(string_idx + 1).is_some_and(|l| l.kind == TokenKind::Comma);
    let max_last_string = line
        .mode
        .line_length
        .saturating_sub(line.depth * 4)
        .saturating_sub(usize::from(ends_with_comma))
        .saturating_sub(op_leaves_length);
    let Some(max_break_idx) = line.mode.line_length.checked_sub(1 + line.depth * 4) else {
        return Err(CannotTransform::new(format!(
            "unable to split a string at such a high line depth: {}",
            line.depth
        )));
    };

    let mut pieces = Vec::new();
    let mut rest_value = string_leaf.value.clone();
    while str_width(&rest_value) > max_last_string {
        let chars: Vec<char> = rest_value.chars().collect();
        let max_bidx = count_chars_in_width(&rest_value, max_break_idx).saturating_sub(op_leaves_length);
        let Some(break_idx) = get_break_idx(&chars, &prefix, max_bidx) else {
            break;
        };
        let mut next_value: String = chars[..break_idx].iter().collect();
        next_value.push(quote);
        if drop_pointless_f_prefix {
            next_value = normalize_f_string(&next_value, &prefix);
        }
        pieces.push(maybe_normalize_quotes(line, next_value));
        let rest: String = chars[break_idx..].iter().collect();
        rest_value = format!("{prefix}{quote}{rest}");
    }
    if pieces.is_empty() {
        return Err(CannotTransform::new("no good place to split this string"));
    }
    if drop_pointless_f_prefix {
        rest_value = normalize_f_string(&rest_value, &prefix);
    }
    let rest_value = maybe_normalize_quotes(line, rest_value);

    // Pieces go into the tree where the string was.
    let parent = tree.parent(string_leaf.id);
    let mut insert_at = tree.remove(string_leaf.id);
    let mut result = Vec::new();
    for (i, piece) in pieces.into_iter().enumerate() {
        let Some(next_leaf) = insert_piece(tree, parent, &mut insert_at, piece) else {
            return Err(CannotTransform::new("string piece is not a leaf"));
        };
        let mut next_line = line.clone_empty();
        if i == 0 {
            append_leaves(tree, &mut next_line, line, &op_leaves, false);
        }
        next_line.append(tree, next_leaf, false, false);
        result.push(next_line);
    }
    let Some(rest_leaf) = insert_piece(tree, parent, &mut insert_at, rest_value.clone()) else {
        return Err(CannotTransform::new("string piece is not a leaf"));
    };
    let mut last_line = line.clone_empty();

    let trailing = &leaves[string_idx + 1..];
    if trailing.is_empty() {
        last_line.append(tree, rest_leaf, false, false);
        last_line.comments = line.comments.clone();
        result.push(last_line);
        return Ok(result);
    }

    // Keep what follows the string on the last piece if it fits.
    let mut temp_value = rest_value;
    for leaf in trailing {
        temp_value.push_str(&leaf.to_string());
        if leaf.kind == TokenKind::LPar {
            break;
        }
    }
    last_line.append(tree, rest_leaf, false, false);
    if str_width(&temp_value) <= max_last_string || trailing[0].kind == TokenKind::Comma {
        append_leaves(tree, &mut last_line, line, trailing, false);
        result.push(last_line);
    } else {
        result.push(last_line);
        let mut non_string_line = line.clone_empty();
        append_leaves(tree, &mut non_string_line, line, trailing, false);
        result.push(non_string_line);
    }
    Ok(result)
}

/// A new string leaf at `index` of `parent`, which moves past it.
fn insert_piece(tree: &mut Tree, parent: Option<NodeId>, index: &mut Option<usize>, value: String) -> Option<LineLeaf> {
    let id = tree.new_leaf(TokenKind::String, value, "", (0, 0));
    if let (Some(parent), Some(index)) = (parent, index.as_mut()) {
        tree.insert_child(parent, *index, id);
        *index += 1;
    }
    LineLeaf::from_tree(tree, id)
}

/// `return STRING` and `yield STRING`.
fn return_match(tree: &Tree, leaves: &[LineLeaf]) -> Option<usize> {
    let first = leaves.first()?;
    let parent = tree.parent_syntax(first.id)?;
    if !matches!(parent, Syntax::ReturnStmt | Syntax::YieldExpr) || !matches!(first.value.as_str(), "return" | "yield") {
        return None;
    }
    let idx = if leaves.get(1).is_some_and(is_empty_par) { 2 } else { 1 };
    leaves.get(idx).is_some_and(|l| l.kind == TokenKind::String).then_some(idx)
}

/// `... else STRING` in a conditional expression.
fn else_match(tree: &Tree, leaves: &[LineLeaf]) -> Option<usize> {
    let first = leaves.first()?;
    if tree.parent_syntax(first.id) != Some(Syntax::Test) || first.kind != TokenKind::Name || first.value != "else" {
        return None;
    }
    let idx = if leaves.get(1).is_some_and(is_empty_par) { 2 } else { 1 };
    leaves.get(idx).is_some_and(|l| l.kind == TokenKind::String).then_some(idx)
}

/// A string right after `after`, followed by nothing but its trailer and
/// possibly a comma.
fn string_after(leaves: &[LineLeaf], after: usize, allow_comma: bool) -> Option<usize> {
    let idx = if leaves.get(after + 1).is_some_and(is_empty_par) { after + 2 } else { after + 1 };
    if !leaves.get(idx).is_some_and(|l| l.kind == TokenKind::String) {
        return None;
    }
    let mut end = skip_string_trailer(leaves, idx);
    if allow_comma && leaves.get(end).is_some_and(|l| l.kind == TokenKind::Comma) {
        end += 1;
    }
    (end >= leaves.len()).then_some(idx)
}

/// `assert test, STRING`.
fn assert_match(tree: &Tree, leaves: &[LineLeaf]) -> Option<usize> {
    let first = leaves.first()?;
    if tree.parent_syntax(first.id) != Some(Syntax::AssertStmt) || first.value != "assert" {
        return None;
    }
    leaves
        .iter()
        .enumerate()
        .filter(|(_, l)| l.kind == TokenKind::Comma)
        .find_map(|(i, _)| string_after(leaves, i, false))
}

/// `name = STRING`, `name += STRING`, and keyword arguments.
fn assign_match(tree: &Tree, leaves: &[LineLeaf]) -> Option<usize> {
    let first = leaves.first()?;
    let parent = tree.parent_syntax(first.id)?;
    if !matches!(parent, Syntax::ExprStmt | Syntax::Argument | Syntax::Power) || first.kind != TokenKind::Name {
        return None;
    }
    let is_argument = parent == Syntax::Argument;
    leaves
        .iter()
        .enumerate()
        .filter(|(_, l)| l.kind == TokenKind::Equal || (l.kind == TokenKind::Op && l.value == "+="))
        .find_map(|(i, _)| string_after(leaves, i, is_argument))
}

/// `key: STRING` inside a dictionary.
fn dict_match(tree: &Tree, leaves: &[LineLeaf]) -> Option<usize> {
    let first = leaves.first()?;
    let parent = tree.parent(first.id)?;
    let in_dict = tree.is_syntax(parent, Syntax::Dictsetmaker)
        || tree.parent(parent).is_some_and(|gp| tree.is_syntax(gp, Syntax::Dictsetmaker));
    if !in_dict {
        return None;
    }
    leaves
        .iter()
        .enumerate()
        .filter(|(i, l)| l.kind == TokenKind::Colon && i + 1 < leaves.len())
        .find_map(|(i, _)| string_after(leaves, i, true))
}

/// Put a long string that sits after `=`, `return`, `else`, an assert
/// comma or a dictionary colon on a line of its own inside parentheses,
/// where it can then be split.
pub fn wrap_string_in_parens(tree: &mut Tree, line: &Line) -> TransformResult {
    let leaves = &line.leaves;
    if leaves.last().is_some_and(LineLeaf::is_opening_bracket) {
        return Err(CannotTransform::new("cannot wrap parens around a line that ends in an opening bracket"));
    }
    let Some(string_idx) = return_match(tree, leaves)
        .or_else(|| else_match(tree, leaves))
        .or_else(|| assert_match(tree, leaves))
        .or_else(|| assign_match(tree, leaves))
        .or_else(|| dict_match(tree, leaves))
    else {
        return Err(CannotTransform::new("this line does not contain any non-atomic strings"));
    };

    let string_value = &leaves[string_idx].value;
    if !string_value.chars().any(|c| c == ' ' || SPLIT_SAFE_CHARS.contains(&c)) {
        let max_width = line.mode.line_length.saturating_sub((line.depth + 1) * 4);
        if str_width(string_value) > max_width {
            return Err(CannotTransform::new(
                "a string that cannot be split would still be too long in parentheses",
            ));
        }
    }
    validate(tree, line, string_idx)?;

    let ends_with_comma = leaves.last().is_some_and(|l| l.kind == TokenKind::Comma);
    let mut steal_comments_from = vec![leaves[string_idx].id];
    if ends_with_comma && let Some(comma) = leaves.last() {
        steal_comments_from.push(comma.id);
    }

    // Existing parentheses around the string, visible or not, are reused.
    let mut left = &leaves[..string_idx];
    let old_lpar = left.last().filter(|l| l.kind == TokenKind::LPar).cloned();
    if let Some(lpar) = &old_lpar {
        steal_comments_from.push(lpar.id);
        left = &left[..left.len() - 1];
    }

    let mut first_line = line.clone_empty();
    append_leaves(tree, &mut first_line, line, left, false);
    let lpar = match &old_lpar {
        Some(old) => {
            tree.set_value(old.id, "(");
            LineLeaf {
                value: "(".to_string(),
                prefix: String::new(),
                ..old.clone()
            }
        }
        None => new_paren_around(tree, leaves[string_idx].id, TokenKind::LPar, 0)?,
    };
    first_line.append(tree, lpar, false, false);
    for id in steal_comments_from {
        for comment in line.comments_after(id) {
            first_line.append(tree, comment.clone(), true, false);
        }
    }

    let mut string_line = Line::new(line.mode, line.depth + 1, true);
    string_line.should_split_rhs = line.should_split_rhs;
    string_line.magic_trailing_comma = line.magic_trailing_comma;
    let mut string_leaf = leaves[string_idx].clone();
    string_leaf.prefix.clear();
    string_line.append(tree, string_leaf, false, false);

    let mut right = &leaves[string_idx + 1..];
    if ends_with_comma && !right.is_empty() {
        right = &right[..right.len() - 1];
    }
    let mut old_rpar = None;
    if old_lpar.is_some() {
        match right.last() {
            Some(last) if last.kind == TokenKind::RPar => {
                old_rpar = Some(last.clone());
                right = &right[..right.len() - 1];
            }
            _ => return Err(CannotTransform::new("parentheses around the string do not match")),
        }
    }
    append_leaves(tree, &mut string_line, line, right, false);

    let mut last_line = line.clone_empty();
    last_line.bracket_tracker = first_line.bracket_tracker.clone();
    let rpar = match old_rpar {
        Some(old) => {
            tree.set_value(old.id, ")");
            LineLeaf {
                value: ")".to_string(),
                prefix: String::new(),
                ..old
            }
        }
        None => new_paren_around(tree, leaves[string_idx].id, TokenKind::RPar, 1)?,
    };
    last_line.append(tree, rpar, false, false);
    if ends_with_comma && let Some(comma) = leaves.last() {
        let mut comma = comma.clone();
        comma.prefix.clear();
        last_line.append(tree, comma, false, false);
    }

    Ok(vec![first_line, string_line, last_line])
}

/// A new paren next to `string` in the tree: before it for `offset` 0,
/// after it for 1.
fn new_paren_around(tree: &mut Tree, string: NodeId, kind: TokenKind, offset: usize) -> Result<LineLeaf, CannotTransform> {
    let value = if kind == TokenKind::LPar { "(" } else { ")" };
    let id = tree.new_leaf(kind, value, "", (0, 0));
    if let (Some(parent), Some(index)) = (tree.parent(string), tree.index_in_parent(string)) {
        tree.insert_child(parent, index + offset, id);
    }
    LineLeaf::from_tree(tree, id).ok_or_else(|| CannotTransform::new("new parenthesis is not a leaf"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Feature, FormatConfig, Preview};
    use crate::linegen::generate_lines;
    use crate::lines::Mode;
    use crate::parser::parse;
    use crate::split::transform_line;
    use std::collections::BTreeSet;

    fn split(source: &str) -> Vec<String> {
        let config = FormatConfig::default().with_preview(Preview::StringProcessing);
        let mode = Mode::from(&config);
        let mut tree = parse(source, &BTreeSet::new()).unwrap();
        let lines = generate_lines(&mut tree, mode, true);
        let features = BTreeSet::from([Feature::TrailingCommaInCall, Feature::TrailingCommaInDef]);
        let mut out = Vec::new();
        for line in lines {
            for line in transform_line(&mut tree, line, &features) {
                out.push(line.to_string());
            }
        }
        out
    }

    #[test]
    fn implicit_concatenation_is_merged() {
        assert_eq!(split("x = 'aaa' \"bbb\"\n"), ["x = \"aaabbb\"\n"]);
    }

    #[test]
    fn grouping_parens_around_a_string_go_away() {
        assert_eq!(split("print((\"hello\"))\n"), ["print(\"hello\")\n"]);
    }

    #[test]
    fn long_assignment_is_wrapped_and_split() {
        let words = "Lorem ipsum dolor sit amet consectetur adipiscing elit sed do eiusmod tempor ";
        let content = words.repeat(3);
        let content = content.trim_end();
        let out = split(&format!("x = \"{content}\"\n"));

        assert_eq!(out.first().map(String::as_str), Some("x = (\n"));
        assert_eq!(out.last().map(String::as_str), Some(")\n"));
        assert!(out.len() > 3);
        let mut joined = String::new();
        for piece in &out[1..out.len() - 1] {
            assert!(piece.trim_end().chars().count() <= 88, "{piece:?} is too long");
            let body = piece
                .strip_prefix("    \"")
                .and_then(|p| p.strip_suffix("\"\n"))
                .unwrap_or_else(|| panic!("{piece:?} is not an indented string"));
            joined.push_str(body);
        }
        assert_eq!(joined, content);
    }

    #[test]
    fn short_strings_are_not_touched() {
        assert_eq!(split("x = \"short\"\n"), ["x = \"short\"\n"]);
    }

    #[test]
    fn break_index_avoids_expressions() {
        let s: Vec<char> = "f\"aaaaaa {x + y} bbbbbb\"".chars().collect();
        let idx = get_break_idx(&s, "f", 12).unwrap();
        assert_eq!(s[idx], ' ');
        assert!(idx < 9 || idx > 16);
    }
}
