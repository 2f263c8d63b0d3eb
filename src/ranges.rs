//! Formatting restricted to line ranges.
//!
//! Statements that lie completely outside the requested ranges are turned
//! into standalone comments holding their source text, the same way
//! `fmt: off` regions are, so the line generator passes them through. Only
//! their first line is re-indented.
//!
//! Ranges are 1-based and inclusive. Between the two formatting passes they
//! are moved to where the first pass put their lines, see [`adjusted_lines`].

use crate::grammar::{Syntax, TokenKind};
use crate::tree::{NodeId, Tree};
use similar::{DiffOp, TextDiff};
use std::collections::BTreeSet;

pub fn is_valid_line_range((start, end): (usize, usize)) -> bool {
    start >= 1 && start <= end
}

/// Hide every statement, and every compound statement header, that does
/// not touch `ranges`.
pub fn convert_unchanged_lines(tree: &mut Tree, ranges: &[(usize, usize)]) {
    let lines: BTreeSet<usize> = ranges.iter().flat_map(|&(start, end)| start..=end).collect();
    let root = tree.root();
    convert_block(tree, root, &lines);
}

fn is_compound(kind: Syntax) -> bool {
    matches!(
        kind,
        Syntax::IfStmt
            | Syntax::WhileStmt
            | Syntax::ForStmt
            | Syntax::TryStmt
            | Syntax::WithStmt
            | Syntax::Funcdef
            | Syntax::Classdef
            | Syntax::MatchStmt
            | Syntax::CaseBlock
            | Syntax::Decorated
            | Syntax::AsyncStmt
            | Syntax::AsyncFuncdef
    )
}

/// Statements directly inside a module or suite.
fn convert_block(tree: &mut Tree, block: NodeId, lines: &BTreeSet<usize>) {
    for child in tree.children(block).to_vec() {
        let Some(kind) = tree.syntax(child) else {
            continue;
        };
        if contains_standalone_comment(tree, child) {
            // Already hidden in part by `fmt: off` or `fmt: skip`.
            if is_compound(kind) {
                convert_compound(tree, child, lines, false);
            }
            continue;
        }
        if !intersects(tree, &[child], lines) {
            convert_to_standalone(tree, &[child], None);
        } else if is_compound(kind) {
            convert_compound(tree, child, lines, true);
        }
    }
}

fn convert_compound(tree: &mut Tree, node: NodeId, lines: &BTreeSet<usize>, headers: bool) {
    match tree.syntax(node) {
        Some(Syntax::Decorated) => {
            for child in tree.children(node).to_vec() {
                match tree.syntax(child) {
                    Some(Syntax::Decorator | Syntax::Decorators) => {
                        if headers && !intersects(tree, &[child], lines) {
                            convert_to_standalone(tree, &[child], None);
                        }
                    }
                    Some(_) => convert_compound(tree, child, lines, headers),
                    None => {}
                }
            }
        }
        // `async` sits outside the statement it modifies; keep the header whole.
        Some(Syntax::AsyncStmt | Syntax::AsyncFuncdef) => {
            for child in tree.children(node).to_vec() {
                if tree.syntax(child).is_some_and(is_compound) {
                    convert_compound(tree, child, lines, false);
                }
            }
        }
        _ => {
            let children = tree.children(node).to_vec();
            let mut header = Vec::new();
            for child in children {
                if !tree.is_syntax(child, Syntax::Suite) {
                    header.push(child);
                    continue;
                }
                let newline = tree
                    .child(child, 0)
                    .filter(|&first| tree.is_token(first, TokenKind::Newline));
                if headers
                    && !header.is_empty()
                    && !intersects(tree, &header, lines)
                    && !header.iter().any(|&h| contains_standalone_comment(tree, h))
                {
                    convert_to_standalone(tree, &header, newline);
                }
                header.clear();
                convert_block(tree, child, lines);
            }
        }
    }
}

fn contains_standalone_comment(tree: &Tree, node: NodeId) -> bool {
    tree.leaves(node)
        .into_iter()
        .any(|leaf| tree.is_token(leaf, TokenKind::StandaloneComment))
}

/// First and last source line covered by `nodes`, ignoring the newline and
/// indentation tokens at their end.
fn line_span(tree: &Tree, nodes: &[NodeId]) -> Option<(usize, usize)> {
    let leaves: Vec<NodeId> = nodes.iter().flat_map(|&n| tree.leaves(n)).collect();
    let first = leaves.first().and_then(|&l| tree.leaf(l))?;
    let last = leaves
        .iter()
        .rev()
        .filter_map(|&l| tree.leaf(l))
        .find(|l| !l.kind.is_whitespace() && l.kind != TokenKind::EndMarker)?;
    Some((first.line, last.line + last.value.matches('\n').count()))
}

fn intersects(tree: &Tree, nodes: &[NodeId], lines: &BTreeSet<usize>) -> bool {
    match line_span(tree, nodes) {
        Some((start, end)) => lines.range(start..=end).next().is_some(),
        // Nothing to format in there.
        None => true,
    }
}

/// Replace `nodes` (siblings, in order) with one standalone comment holding
/// their source. The trailing comment of a header sits in the prefix of the
/// suite's `newline` and moves along.
fn convert_to_standalone(tree: &mut Tree, nodes: &[NodeId], newline: Option<NodeId>) {
    let Some(&first) = nodes.first() else {
        return;
    };
    let (Some(parent), Some(first_leaf), Some(last_leaf)) =
        (tree.parent(first), tree.first_leaf(first), nodes.last().and_then(|&n| tree.last_leaf(n)))
    else {
        return;
    };
    if nodes.len() == 1 && first_leaf == last_leaf {
        return;
    }
    let line = tree.line(first);
    let prefix = tree.prefix(first).to_string();
    tree.set_prefix(first, "");
    let mut value: String = nodes.iter().map(|&n| tree.render(n)).collect();
    if value.ends_with('\n') {
        value.pop();
    }
    if let Some(newline) = newline {
        let trailing = tree.prefix(newline).to_string();
        value.push_str(&trailing);
        tree.set_prefix(newline, "");
    }

    let mut index = None;
    for &node in nodes {
        let removed = tree.remove(node);
        index = index.or(removed);
    }
    if let Some(index) = index {
        let standalone = tree.new_leaf(TokenKind::StandaloneComment, value, prefix, (line, 0));
        tree.insert_child(parent, index, standalone);
    }
}

/// A run of lines that is either identical in both sources or replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LinesMapping {
    original_start: usize,
    original_end: usize,
    modified_start: usize,
    modified_end: usize,
    is_changed_block: bool,
}

/// Lines shared by `original` and `modified` as `(start in original,
/// start in modified, length)`, in order, ending with an empty block at the
/// two line counts.
fn matching_blocks(original: &str, modified: &str) -> Vec<(usize, usize, usize)> {
    let diff = TextDiff::from_lines(original, modified);
    let mut blocks: Vec<(usize, usize, usize)> = Vec::new();
    for op in diff.ops() {
        if let DiffOp::Equal { old_index, new_index, len } = *op {
            match blocks.last_mut() {
                Some((start_a, start_b, size)) if *start_a + *size == old_index && *start_b + *size == new_index => {
                    *size += len
                }
                _ => blocks.push((old_index, new_index, len)),
            }
        }
    }
    blocks.push((diff.old_slices().len(), diff.new_slices().len(), 0));
    blocks
}

fn lines_mappings(original: &str, modified: &str) -> Vec<LinesMapping> {
    let blocks = matching_blocks(original, modified);

    let mut mappings = Vec::new();
    for (i, &(start_a, start_b, size)) in blocks.iter().enumerate() {
        if i == 0 {
            if start_a != 0 || start_b != 0 {
                mappings.push(LinesMapping {
                    original_start: 1,
                    original_end: start_a,
                    modified_start: 1,
                    modified_end: start_b,
                    is_changed_block: true,
                });
            }
        } else {
            let (prev_a, prev_b, prev_size) = blocks[i - 1];
            mappings.push(LinesMapping {
                original_start: prev_a + prev_size + 1,
                original_end: start_a,
                modified_start: prev_b + prev_size + 1,
                modified_end: start_b,
                is_changed_block: true,
            });
        }
        if i + 1 < blocks.len() {
            mappings.push(LinesMapping {
                original_start: start_a + 1,
                original_end: start_a + size,
                modified_start: start_b + 1,
                modified_end: start_b + size,
                is_changed_block: false,
            });
        }
    }
    mappings
}

fn find_mapping(line: usize, mappings: &[LinesMapping], from: usize) -> usize {
    mappings[from.min(mappings.len())..]
        .iter()
        .position(|m| m.original_start <= line && line <= m.original_end)
        .map_or(mappings.len(), |p| from + p)
}

/// Move `ranges` given for `original` onto the matching lines of
/// `modified`. A range end inside a changed block grows to cover the
/// whole block.
pub fn adjusted_lines(ranges: &[(usize, usize)], original: &str, modified: &str) -> Vec<(usize, usize)> {
    let mappings = lines_mappings(original, modified);
    let mut sorted = ranges.to_vec();
    sorted.sort_unstable();

    let mut adjusted = Vec::new();
    let mut current = 0;
    for (start, end) in sorted {
        let start_index = find_mapping(start, &mappings, current);
        let end_index = find_mapping(end, &mappings, start_index);
        current = start_index;
        let (Some(start_mapping), Some(end_mapping)) = (mappings.get(start_index), mappings.get(end_index)) else {
            continue;
        };
        let new_start = if start_mapping.is_changed_block {
            start_mapping.modified_start
        } else {
            start - start_mapping.original_start + start_mapping.modified_start
        };
        let new_end = if end_mapping.is_changed_block {
            end_mapping.modified_end
        } else {
            end - end_mapping.original_start + end_mapping.modified_start
        };
        if is_valid_line_range((new_start, new_end)) {
            adjusted.push((new_start, new_end));
        }
    }
    adjusted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn unchanged_lines_keep_their_numbers() {
        assert_eq!(adjusted_lines(&[(2, 3)], "a\nb\nc\n", "a\nb\nc\n"), [(2, 3)]);
    }

    #[test]
    fn ranges_follow_inserted_lines() {
        let original = "a\nb\nc\n";
        let modified = "a\nx\ny\nc\n";
        assert_eq!(adjusted_lines(&[(3, 3)], original, modified), [(4, 4)]);
        // `b` was replaced; the range covers its replacement.
        assert_eq!(adjusted_lines(&[(2, 2)], original, modified), [(2, 3)]);
    }

    #[test]
    fn matching_blocks_end_with_sentinel() {
        let blocks = matching_blocks("a\nb\n", "a\nc\n");
        assert_eq!(blocks, [(0, 0, 1), (2, 2, 0)]);
    }

    #[test]
    fn matching_blocks_skip_replaced_runs() {
        let blocks = matching_blocks("a\nb\nc\nd\n", "a\nx\ny\nc\nd\n");
        assert_eq!(blocks, [(0, 0, 1), (2, 3, 2), (4, 5, 0)]);
    }

    #[test]
    fn statements_outside_ranges_become_verbatim() {
        let mut tree = parse("x=1\ny=2\n", &BTreeSet::new()).unwrap();
        convert_unchanged_lines(&mut tree, &[(2, 2)]);
        let leaves = tree.leaves(tree.root());
        let first = tree.leaf(leaves[0]).unwrap();
        assert_eq!(first.kind, TokenKind::StandaloneComment);
        assert_eq!(first.value, "x=1");
        assert!(leaves.iter().any(|&l| tree.value(l) == "y"));
    }

    #[test]
    fn statements_inside_ranges_stay_parsed() {
        let mut tree = parse("x=1\ny=2\n", &BTreeSet::new()).unwrap();
        convert_unchanged_lines(&mut tree, &[(1, 2)]);
        assert!(
            tree.leaves(tree.root())
                .iter()
                .all(|&l| !tree.is_token(l, TokenKind::StandaloneComment))
        );
    }

    #[test]
    fn range_validity() {
        assert!(is_valid_line_range((1, 1)));
        assert!(!is_valid_line_range((0, 3)));
        assert!(!is_valid_line_range((4, 3)));
    }
}
