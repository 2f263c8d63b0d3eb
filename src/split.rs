//! Turning one logical line into physical lines that fit.
//!
//! Every split is a transform from a [`Line`] to several lines. Transforms
//! are tried in order, the first one that succeeds wins, and each line it
//! produces goes through [`transform_line`] again.

use crate::config::Feature;
use crate::grammar::{Syntax, TokenKind};
use crate::lines::{
    COMMA_PRIORITY, DOT_PRIORITY, Line, LineLeaf, can_be_split, can_omit_invisible_parens, is_line_short_enough,
    is_one_sequence_between,
};
use crate::nodes::{is_vararg, is_varargs_parent, is_unpacking_parent};
use crate::string_split;
use crate::tree::{NodeId, Tree};
use log::trace;
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

/// A transform does not apply to the line it was given.
///
/// Never reaches the user: the next transform gets its turn, and when none
/// applies the line is emitted as is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CannotTransform(String);

impl CannotTransform {
    pub fn new(reason: impl Into<String>) -> Self {
        CannotTransform(reason.into())
    }
}

pub type TransformResult = Result<Vec<Line>, CannotTransform>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transform {
    StringMerge,
    StringParenStrip,
    StringSplit,
    StringParenWrap,
    DelimiterSplit,
    StandaloneCommentSplit,
    LeftHandSplit,
    RightHandSplit,
    HugPowerOp,
}

impl Transform {
    fn apply(self, tree: &mut Tree, line: &Line, features: &BTreeSet<Feature>) -> TransformResult {
        match self {
            Transform::StringMerge => string_split::merge_strings(tree, line),
            Transform::StringParenStrip => string_split::strip_string_parens(tree, line),
            Transform::StringSplit => string_split::split_string(tree, line),
            Transform::StringParenWrap => string_split::wrap_string_in_parens(tree, line),
            Transform::DelimiterSplit => delimiter_split(tree, line, features),
            Transform::StandaloneCommentSplit => standalone_comment_split(tree, line),
            Transform::LeftHandSplit => left_hand_split(tree, line, features),
            Transform::RightHandSplit => rhs(tree, line, features),
            Transform::HugPowerOp => hug_power_op(tree, line),
        }
    }
}

/// The line as it would be printed, without the trailing newline.
pub fn line_to_string(line: &Line) -> String {
    line.to_string().trim_matches('\n').to_string()
}

/// Split `line` until every resulting line fits, or nothing more can be done.
///
/// `features` holds the trailing comma features the target versions allow.
pub fn transform_line(tree: &mut Tree, line: Line, features: &BTreeSet<Feature>) -> Vec<Line> {
    if line.is_comment() {
        return vec![line];
    }
    let line_str = line_to_string(&line);
    let mode = line.mode;

    use Transform::*;
    let mut transformers = if !line.contains_uncollapsable_type_comments()
        && !line.should_split_rhs
        && line.magic_trailing_comma.is_none()
        && (is_line_short_enough(&line, mode.line_length) || line.contains_unsplittable_type_ignore())
        && !(line.inside_brackets && line.contains_standalone_comments(usize::MAX))
    {
        if mode.string_processing {
            vec![StringMerge, StringParenStrip]
        } else {
            vec![]
        }
    } else if line.is_def() {
        vec![LeftHandSplit]
    } else if mode.string_processing {
        if line.inside_brackets {
            vec![
                StringMerge,
                StringParenStrip,
                StringSplit,
                DelimiterSplit,
                StandaloneCommentSplit,
                StringParenWrap,
                RightHandSplit,
            ]
        } else {
            vec![StringMerge, StringParenStrip, StringSplit, StringParenWrap, RightHandSplit]
        }
    } else if line.inside_brackets {
        vec![DelimiterSplit, StandaloneCommentSplit, RightHandSplit]
    } else {
        vec![RightHandSplit]
    };
    // Any line may hold a power operator to hug.
    transformers.push(HugPowerOp);

    for transform in transformers {
        match run_transformer(tree, &line, transform, features, &line_str) {
            Ok(result) => {
                trace!("{transform:?} split `{line_str}` into {} lines", result.len());
                return result;
            }
            Err(reason) => trace!("{transform:?} skipped: {reason}"),
        }
    }
    vec![line]
}

fn run_transformer(
    tree: &mut Tree,
    line: &Line,
    transform: Transform,
    features: &BTreeSet<Feature>,
    line_str: &str,
) -> TransformResult {
    let mut result = Vec::new();
    for transformed in transform.apply(tree, line, features)? {
        if line_to_string(&transformed) == line_str {
            return Err(CannotTransform::new("line transformer returned an unchanged result"));
        }
        result.extend(transform_line(tree, transformed, features));
    }

    let line_length = line.mode.line_length;
    let invisible = &line.bracket_tracker.invisible;
    let made_visible = result
        .iter()
        .flat_map(|l| &l.leaves)
        .any(|l| invisible.contains(&l.id) && !l.value.is_empty());
    let Some(first) = result.first() else {
        return Ok(result);
    };
    if transform != Transform::RightHandSplit
        || invisible.is_empty()
        || made_visible
        || line.contains_multiline_strings()
        || first.contains_uncollapsable_type_comments()
        || first.contains_unsplittable_type_ignore()
        || is_line_short_enough(first, line_length)
        || line.leaves.iter().any(|l| tree.parent(l.id).is_none())
    {
        return Ok(result);
    }

    // The split kept the optional parentheses invisible and the first line
    // is still too long; see whether using them gives lines that all fit.
    let mut forced = features.clone();
    forced.insert(Feature::ForceOptionalParentheses);
    let second_opinion = run_transformer(tree, line, transform, &forced, line_str)?;
    if second_opinion.iter().all(|l| is_line_short_enough(l, line_length)) {
        Ok(second_opinion)
    } else {
        Ok(result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Component {
    Head,
    Body,
    Tail,
}

fn ensure_visible(leaf: &mut LineLeaf) {
    match leaf.kind {
        TokenKind::LPar => leaf.value = "(".to_string(),
        TokenKind::RPar => leaf.value = ")".to_string(),
        _ => {}
    }
}

/// Split at the first opening bracket: everything up to it, the bracket
/// contents indented, and the rest starting at its closing bracket.
///
/// Used for `def` lines, where the parameters should explode before the
/// return annotation does. Type parameters stay on the first line unless
/// they carry a magic trailing comma or nothing else can be split.
fn left_hand_split(tree: &mut Tree, line: &Line, features: &BTreeSet<Feature>) -> TransformResult {
    let Some((head, body, tail, opening)) = type_params_to_keep(tree, line)
        .and_then(|skip| left_hand_components(line, Some(skip)))
        .or_else(|| left_hand_components(line, None))
    else {
        return Err(CannotTransform::new("no brackets found"));
    };

    let head = bracket_split_build_line(tree, head, line, &opening, Component::Head, features);
    let body = bracket_split_build_line(tree, body, line, &opening, Component::Body, features);
    let tail = bracket_split_build_line(tree, tail, line, &opening, Component::Tail, features);
    bracket_split_succeeded_or_raise(&body, &tail)?;
    Ok([head, body, tail].into_iter().filter(|l| !l.is_empty()).collect())
}

/// The opening bracket of type parameters without a magic trailing comma.
fn type_params_to_keep(tree: &Tree, line: &Line) -> Option<NodeId> {
    line.leaves
        .iter()
        .find(|leaf| {
            leaf.kind == TokenKind::LSqb
                && tree.parent(leaf.id).is_some_and(|p| {
                    tree.is_syntax(p, Syntax::Typeparams)
                        && !(line.mode.magic_trailing_comma && ends_with_comma(tree, p))
                })
        })
        .map(|leaf| leaf.id)
}

/// Whether the bracketed node ends in `, ]`.
fn ends_with_comma(tree: &Tree, node: NodeId) -> bool {
    let children = tree.children(node);
    children.len() >= 2 && tree.is_token(children[children.len() - 2], TokenKind::Comma)
}

type Components = (Vec<LineLeaf>, Vec<LineLeaf>, Vec<LineLeaf>, LineLeaf);

/// Head, body and tail around the first non-empty bracket pair, passing over
/// the pair opened by `skip`.
fn left_hand_components(line: &Line, skip: Option<NodeId>) -> Option<Components> {
    let mut head: Vec<LineLeaf> = Vec::new();
    let mut body: Vec<LineLeaf> = Vec::new();
    let mut tail: Vec<LineLeaf> = Vec::new();
    let mut current = Component::Head;
    let mut matching: Option<LineLeaf> = None;
    let mut skipping = false;

    for leaf in &line.leaves {
        let mut leaf = leaf.clone();
        if skipping {
            skipping = leaf.opening_bracket != skip;
            head.push(leaf);
            continue;
        }
        if current == Component::Body
            && leaf.is_closing_bracket()
            && matching.as_ref().is_some_and(|m| leaf.opening_bracket == Some(m.id))
        {
            ensure_visible(&mut leaf);
            if let Some(opening) = head.last_mut() {
                ensure_visible(opening);
            }
            current = if body.is_empty() { Component::Head } else { Component::Tail };
        }
        let is_opening = leaf.is_opening_bracket();
        if current == Component::Head && is_opening && Some(leaf.id) == skip {
            skipping = true;
            head.push(leaf);
            continue;
        }
        match current {
            Component::Head => head.push(leaf.clone()),
            Component::Body => body.push(leaf.clone()),
            Component::Tail => tail.push(leaf.clone()),
        }
        if current == Component::Head && is_opening {
            matching = Some(leaf);
            current = Component::Body;
        }
    }
    let opening = matching.filter(|_| !tail.is_empty())?;
    Some((head, body, tail, opening))
}

/// Right hand split, retried with more and more trailers glued to the
/// head until the first line fits.
fn rhs(tree: &mut Tree, line: &Line, features: &BTreeSet<Feature>) -> TransformResult {
    let line_length = line.mode.line_length;
    for omit in generate_trailers_to_omit(tree, line, line_length) {
        let lines = right_hand_split(tree, line, features, &omit)?;
        // Only the first line is known to fit here; the rest still has to
        // go through the other transforms.
        if lines.first().is_some_and(|l| is_line_short_enough(l, line_length)) {
            return Ok(lines);
        }
    }
    // All splits failed or the line is too short to need them.
    right_hand_split(tree, line, features, &HashSet::new())
}

/// Sets of closing brackets that [`right_hand_split`] should pass over,
/// starting from the trailing ones.
///
/// Empty brackets would fail a split, so they only join a set together
/// with a real pair of brackets. A pair ending in a trailing comma stops
/// the search: it has to explode.
fn generate_trailers_to_omit(tree: &Tree, line: &Line, line_length: usize) -> Vec<HashSet<NodeId>> {
    let mut out = Vec::new();
    let mut omit: HashSet<NodeId> = HashSet::new();
    if line.magic_trailing_comma.is_none() {
        out.push(omit.clone());
    }

    let mut length = 4 * line.depth;
    let mut opening_bracket: Option<NodeId> = None;
    let mut closing_bracket: Option<NodeId> = None;
    let mut inner_brackets: HashSet<NodeId> = HashSet::new();
    for (index, leaf_length) in line.enumerate_with_length_rev() {
        length += leaf_length;
        if length > line_length {
            break;
        }
        let leaf = &line.leaves[index];
        if let Some(opening) = opening_bracket {
            if leaf.id == opening {
                opening_bracket = None;
            } else if leaf.is_closing_bracket() {
                inner_brackets.insert(leaf.id);
            }
        } else if leaf.is_closing_bracket() {
            let prev = index.checked_sub(1).map(|i| &line.leaves[i]);
            if prev.is_some_and(LineLeaf::is_opening_bracket) {
                inner_brackets.insert(leaf.id);
                continue;
            }

            if let Some(closing) = closing_bracket {
                omit.insert(closing);
                omit.extend(inner_brackets.drain());
                out.push(omit.clone());
            }

            if let Some(prev) = prev
                && prev.kind == TokenKind::Comma
                && let Some(opening) = leaf.opening_bracket
                && !is_one_sequence_between(tree, opening, leaf, &line.leaves, (TokenKind::LPar, TokenKind::RPar))
            {
                break;
            }

            if !leaf.value.is_empty() {
                opening_bracket = leaf.opening_bracket;
                closing_bracket = Some(leaf.id);
            }
        }
    }
    out
}

/// Split at the last opening bracket: the head up to and including it,
/// the indented body, and the tail from its closing bracket on.
///
/// Closing brackets in `omit` are passed over. When the split lands on
/// invisible parentheses, splitting without them is tried first.
fn right_hand_split(
    tree: &mut Tree,
    line: &Line,
    features: &BTreeSet<Feature>,
    omit: &HashSet<NodeId>,
) -> TransformResult {
    let mut head: Vec<LineLeaf> = Vec::new();
    let mut body: Vec<LineLeaf> = Vec::new();
    let mut tail: Vec<LineLeaf> = Vec::new();
    let mut current = Component::Tail;
    let mut opening: Option<NodeId> = None;
    let mut closing: Option<NodeId> = None;

    for leaf in line.leaves.iter().rev() {
        if current == Component::Body && Some(leaf.id) == opening {
            current = if body.is_empty() { Component::Tail } else { Component::Head };
        }
        match current {
            Component::Head => head.push(leaf.clone()),
            Component::Body => body.push(leaf.clone()),
            Component::Tail => tail.push(leaf.clone()),
        }
        if current == Component::Tail && leaf.is_closing_bracket() && !omit.contains(&leaf.id) {
            opening = leaf.opening_bracket;
            closing = Some(leaf.id);
            current = Component::Body;
        }
    }
    if opening.is_none() || closing.is_none() || head.is_empty() {
        // Leaves without matching brackets; nothing to split on.
        return Err(CannotTransform::new("no brackets found"));
    }
    head.reverse();
    body.reverse();
    tail.reverse();
    let (Some(opening_leaf), Some(closing_leaf)) = (head.last().cloned(), tail.first().cloned()) else {
        return Err(CannotTransform::new("no brackets found"));
    };

    let line_length = line.mode.line_length;
    let mut head = bracket_split_build_line(tree, head, line, &opening_leaf, Component::Head, features);
    let body = bracket_split_build_line(tree, body, line, &opening_leaf, Component::Body, features);
    let mut tail = bracket_split_build_line(tree, tail, line, &opening_leaf, Component::Tail, features);
    bracket_split_succeeded_or_raise(&body, &tail)?;

    if !features.contains(&Feature::ForceOptionalParentheses)
        && opening_leaf.kind == TokenKind::LPar
        && opening_leaf.value.is_empty()
        && closing_leaf.kind == TokenKind::RPar
        && closing_leaf.value.is_empty()
        // Imports keep their parentheses.
        && !line.is_import(tree)
        && can_omit_invisible_parens(tree, &body, line_length)
    {
        let mut omit = omit.clone();
        omit.insert(closing_leaf.id);
        match right_hand_split(tree, line, features, &omit) {
            Ok(lines) => return Ok(lines),
            Err(reason) => {
                if !(can_be_split(&body) || is_line_short_enough(&body, line_length)) {
                    return Err(CannotTransform::new("splitting failed after omitting optional parentheses"));
                }
                trace!("keeping optional parentheses: {reason}");
            }
        }
    }

    if let Some(leaf) = head.leaves.last_mut() {
        ensure_visible(leaf);
    }
    if let Some(leaf) = tail.leaves.first_mut() {
        ensure_visible(leaf);
    }
    Ok([head, body, tail].into_iter().filter(|l| !l.is_empty()).collect())
}

fn bracket_split_succeeded_or_raise(body: &Line, tail: &Line) -> Result<(), CannotTransform> {
    let tail_len = tail.to_string().trim().chars().count();
    if body.is_empty() {
        if tail_len == 0 {
            return Err(CannotTransform::new("splitting brackets produced the same line"));
        }
        if tail_len < 3 {
            return Err(CannotTransform::new(format!(
                "splitting brackets on an empty body to save {tail_len} characters is not worth it"
            )));
        }
    }
    Ok(())
}

/// Build one of the three lines of a bracket split.
///
/// The body is indented one level. Bodies of imports, and of function
/// signatures with a single parameter, get a trailing comma so that they
/// read like every other exploded collection.
fn bracket_split_build_line(
    tree: &mut Tree,
    mut leaves: Vec<LineLeaf>,
    original: &Line,
    opening: &LineLeaf,
    component: Component,
    features: &BTreeSet<Feature>,
) -> Line {
    let mut result = Line::new(original.mode, original.depth, false);
    if component == Component::Body && !leaves.is_empty() {
        result.inside_brackets = true;
        result.depth += 1;
        leaves[0].prefix.clear();

        let has_vararg = leaves
            .iter()
            .any(|l| is_vararg(tree, l.id, |k| is_varargs_parent(k) || is_unpacking_parent(k)));
        let no_commas = original.is_def()
            && !opening.value.is_empty()
            && tree.parent_syntax(opening.id) == Some(Syntax::Parameters)
            && !leaves.iter().any(|l| l.kind == TokenKind::Comma)
            && (!has_vararg || features.contains(&Feature::TrailingCommaInDef));
        if original.is_import(tree) || no_commas {
            if let Some(i) = leaves.iter().rposition(|l| l.kind != TokenKind::StandaloneComment)
                && leaves[i].kind != TokenKind::Comma
            {
                let comma = tree.new_leaf(TokenKind::Comma, ",", "", (0, 0));
                if let Some(comma) = LineLeaf::from_tree(tree, comma) {
                    leaves.insert(i + 1, comma);
                }
            }
        }
    } else if component == Component::Body {
        result.inside_brackets = true;
        result.depth += 1;
    }

    let tracked = if component == Component::Head {
        leaves_inside_matching_brackets(&leaves)
    } else {
        HashSet::new()
    };
    for leaf in leaves {
        let id = leaf.id;
        result.append(tree, leaf, true, tracked.contains(&id));
        for comment in original.comments_after(id) {
            result.append(tree, comment.clone(), true, false);
        }
    }
    if component == Component::Body && should_split_line(tree, &result, opening) {
        result.should_split_rhs = true;
    }
    result
}

/// Leaves between matching brackets, the brackets included.
///
/// The head of a split may start or end with unmatched brackets; only
/// the matched pairs are tracked so a magic trailing comma in them counts.
fn leaves_inside_matching_brackets(leaves: &[LineLeaf]) -> HashSet<NodeId> {
    let mut ids = HashSet::new();
    let Some(start) = leaves.iter().position(LineLeaf::is_opening_bracket) else {
        return ids;
    };
    let mut stack: Vec<(TokenKind, usize)> = Vec::new();
    for (i, leaf) in leaves.iter().enumerate().skip(start) {
        if let Some(closing) = leaf.kind.closing() {
            stack.push((closing, i));
        }
        if leaf.is_closing_bracket() {
            match stack.last() {
                Some(&(kind, open)) if kind == leaf.kind => {
                    stack.pop();
                    ids.extend(leaves[open..=i].iter().map(|l| l.id));
                }
                _ => break,
            }
        }
    }
    ids
}

/// Whether a body should go straight to a one-item-per-line delimiter split.
///
/// True for collections with a magic trailing comma, and for every
/// comma-delimited literal and import.
fn should_split_line(tree: &Tree, line: &Line, opening: &LineLeaf) -> bool {
    let Some(parent) = tree.parent(opening.id) else {
        return false;
    };
    if !matches!(opening.value.as_str(), "" | "(" | "[" | "{") {
        return false;
    }
    let Some(last) = line.leaves.last() else {
        return false;
    };
    let trailing_comma = last.kind == TokenKind::Comma;
    let max_priority = line.bracket_tracker.max_delimiter_priority(Some(last.id));
    max_priority == COMMA_PRIORITY
        && ((line.mode.magic_trailing_comma && trailing_comma)
            || matches!(tree.syntax(parent), Some(Syntax::Atom | Syntax::ImportFrom)))
}

/// Append to `current`, or start a new line when a standalone comment
/// cannot share it.
fn append_to_line(tree: &Tree, current: &mut Line, result: &mut Vec<Line>, leaf: &LineLeaf) {
    if current.append_safe(tree, leaf.clone(), true).is_err() {
        let template = Line::new(current.mode, current.depth, current.inside_brackets);
        result.push(std::mem::replace(current, template));
        current.append(tree, leaf.clone(), false, false);
    }
}

/// Split lines never start with the whitespace their first leaf had.
fn dont_increase_indentation(mut lines: Vec<Line>) -> Vec<Line> {
    for line in &mut lines {
        if let Some(first) = line.leaves.first_mut() {
            first.prefix.clear();
        }
    }
    lines
}

/// Split at every delimiter of the highest priority.
///
/// A comma-delimited split gets a trailing comma, unless it unpacks with
/// `*` or `**` and the target versions cannot take a comma after that.
fn delimiter_split(tree: &mut Tree, line: &Line, features: &BTreeSet<Feature>) -> TransformResult {
    let Some(last_leaf) = line.leaves.last() else {
        return Err(CannotTransform::new("line empty"));
    };
    let bt = &line.bracket_tracker;
    let delimiter = bt.max_delimiter_priority(Some(last_leaf.id));
    if delimiter == 0 {
        return Err(CannotTransform::new("no delimiters found"));
    }
    if delimiter == DOT_PRIORITY && bt.delimiter_count_with_priority(delimiter) == 1 {
        return Err(CannotTransform::new("splitting a single attribute from its parent looks wrong"));
    }

    let mut result = Vec::new();
    let mut current = Line::new(line.mode, line.depth, line.inside_brackets);
    let mut lowest_depth = usize::MAX;
    let mut trailing_comma_safe = true;
    for leaf in &line.leaves {
        append_to_line(tree, &mut current, &mut result, leaf);
        for comment in line.comments_after(leaf.id) {
            append_to_line(tree, &mut current, &mut result, comment);
        }

        lowest_depth = lowest_depth.min(leaf.bracket_depth);
        if leaf.bracket_depth == lowest_depth {
            if is_vararg(tree, leaf.id, |k| k == Syntax::Typedargslist) {
                trailing_comma_safe &= features.contains(&Feature::TrailingCommaInDef);
            } else if is_vararg(tree, leaf.id, |k| matches!(k, Syntax::Arglist | Syntax::Argument)) {
                trailing_comma_safe &= features.contains(&Feature::TrailingCommaInCall);
            }
        }

        if bt.delimiter_priority(leaf.id) == delimiter {
            let template = Line::new(line.mode, line.depth, line.inside_brackets);
            result.push(std::mem::replace(&mut current, template));
        }
    }
    if !current.is_empty() {
        if trailing_comma_safe
            && delimiter == COMMA_PRIORITY
            && last_leaf.kind != TokenKind::Comma
            && last_leaf.kind != TokenKind::StandaloneComment
        {
            let comma = tree.new_leaf(TokenKind::Comma, ",", "", (0, 0));
            if let Some(comma) = LineLeaf::from_tree(tree, comma) {
                current.append(tree, comma, false, false);
            }
        }
        result.push(current);
    }
    Ok(dont_increase_indentation(result))
}

/// Put standalone comments at depth zero on lines of their own.
fn standalone_comment_split(tree: &Tree, line: &Line) -> TransformResult {
    if !line.contains_standalone_comments(usize::MAX) {
        return Err(CannotTransform::new("line does not have any standalone comments"));
    }
    let mut result = Vec::new();
    let mut current = Line::new(line.mode, line.depth, line.inside_brackets);
    for leaf in &line.leaves {
        append_to_line(tree, &mut current, &mut result, leaf);
        for comment in line.comments_after(leaf.id) {
            append_to_line(tree, &mut current, &mut result, comment);
        }
    }
    if !current.is_empty() {
        result.push(current);
    }
    Ok(dont_increase_indentation(result))
}

/// Remove the spaces around `**` when both operands are simple: names,
/// numbers, attribute chains, optionally behind a unary operator.
fn hug_power_op(tree: &Tree, line: &Line) -> TransformResult {
    if !line.leaves.iter().any(|l| l.kind == TokenKind::DoubleStar) {
        return Err(CannotTransform::new("no doublestar token was found in the line"));
    }

    let leaves = &line.leaves;
    let mut new_line = line.clone_empty();
    let mut should_hug = false;
    for (idx, leaf) in leaves.iter().enumerate() {
        let mut new_leaf = leaf.clone();
        if should_hug {
            new_leaf.prefix.clear();
        }
        should_hug = idx > 0
            && idx + 1 < leaves.len()
            && leaf.kind == TokenKind::DoubleStar
            && is_simple_operand(leaves, idx - 1, false)
            && leaves[idx - 1].value != "lambda"
            && is_simple_operand(leaves, idx + 1, true);
        if should_hug {
            new_leaf.prefix.clear();
        }
        new_line.append(tree, new_leaf, true, false);
        for comment in line.comments_after(leaf.id) {
            new_line.append(tree, comment.clone(), true, false);
        }
    }
    Ok(vec![new_line])
}

/// A name or number, optionally reached through dots, and not called or
/// subscripted on the side facing the operator.
fn is_simple_lookup(leaves: &[LineLeaf], mut index: usize, forward: bool) -> bool {
    while let Some(current) = leaves.get(index) {
        let disallowed = if forward {
            matches!(current.kind, TokenKind::LPar | TokenKind::LSqb)
        } else {
            matches!(current.kind, TokenKind::RPar | TokenKind::RSqb)
        };
        if disallowed {
            return false;
        }
        // Stop at anything else, including the `for` of a comprehension.
        if !matches!(current.kind, TokenKind::Name | TokenKind::Dot) || current.value == "for" {
            return true;
        }
        if forward {
            index += 1;
        } else {
            match index.checked_sub(1) {
                Some(i) => index = i,
                None => return true,
            }
        }
    }
    true
}

fn is_simple_operand(leaves: &[LineLeaf], index: usize, is_exponent: bool) -> bool {
    let start = &leaves[index];
    match start.kind {
        TokenKind::Name | TokenKind::Number => is_simple_lookup(leaves, index, is_exponent),
        TokenKind::Op if matches!(start.value.as_str(), "+" | "-" | "~") => {
            // A unary operand is always checked from its start onwards.
            leaves
                .get(index + 1)
                .is_some_and(|next| matches!(next.kind, TokenKind::Name | TokenKind::Number))
                && is_simple_lookup(leaves, index + 1, true)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FormatConfig;
    use crate::linegen::generate_lines;
    use crate::lines::Mode;
    use crate::parser::parse;

    fn split(source: &str, line_length: usize) -> Vec<String> {
        let mode = Mode {
            line_length,
            ..Mode::from(&FormatConfig::default())
        };
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
    fn short_lines_are_left_alone() {
        assert_eq!(split("x = f(a, b)\n", 88), ["x = f(a, b)\n"]);
    }

    #[test]
    fn magic_trailing_comma_explodes_parameters() {
        assert_eq!(
            split("def f(a,b,c,): pass\n", 88),
            ["def f(\n", "    a,\n", "    b,\n", "    c,\n", "):\n", "    pass\n"]
        );
    }

    #[test]
    fn long_signature_gets_trailing_comma() {
        assert_eq!(
            split("def f(argument_one, argument_two):\n    pass\n", 20),
            ["def f(\n", "    argument_one,\n", "    argument_two,\n", "):\n", "    pass\n"]
        );
        assert_eq!(
            split("def f(argument_number_one):\n    pass\n", 20),
            ["def f(\n", "    argument_number_one,\n", "):\n", "    pass\n"]
        );
    }

    #[test]
    fn call_arguments_move_to_their_own_line() {
        assert_eq!(
            split("result = function(argument_one, argument_two)\n", 30),
            ["result = function(\n", "    argument_one, argument_two\n", ")\n"]
        );
    }

    #[test]
    fn collection_literals_explode_one_item_per_line() {
        assert_eq!(
            split("x = [aaaa, bbbb, cccc]\n", 15),
            ["x = [\n", "    aaaa,\n", "    bbbb,\n", "    cccc,\n", "]\n"]
        );
    }

    #[test]
    fn standalone_comments_force_a_split() {
        assert_eq!(
            split("foo(a,\n    # comment\n    b)\n", 88),
            ["foo(\n", "    a,\n", "    # comment\n", "    b,\n", ")\n"]
        );
    }

    #[test]
    fn comment_between_lambda_parameters_and_body_stands_alone() {
        assert_eq!(
            split("(\n    lambda\n    # a comment\n    : None\n)\n", 88),
            ["(\n", "    lambda\n", "    # a comment\n", "    : None\n", ")\n"]
        );
    }

    #[test]
    fn simple_power_operands_are_hugged() {
        assert_eq!(split("x = a ** b\n", 88), ["x = a**b\n"]);
        assert_eq!(split("x = a.b ** -c\n", 88), ["x = a.b**-c\n"]);
        assert_eq!(split("x = a[1] ** 2\n", 88), ["x = a[1] ** 2\n"]);
        assert_eq!(split("x = f(a) ** 2\n", 88), ["x = f(a) ** 2\n"]);
    }

    #[test]
    fn unsplittable_lines_stay_whole() {
        let long = "x = aaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\n";
        assert_eq!(split(long, 10), [long]);
    }
}
