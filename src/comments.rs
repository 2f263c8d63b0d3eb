//! Comments are not tokens of their own: they ride in the prefix of the
//! following leaf. This module pulls them back out, tells trailing comments
//! from standalone ones, and turns `fmt: off` and `fmt: skip` regions into
//! verbatim standalone comments before line generation runs.

use crate::grammar::{Syntax, TokenKind};
use crate::tree::{NodeId, Tree};
use log::debug;

pub const FMT_OFF: [&str; 3] = ["# fmt: off", "# fmt:off", "# yapf: disable"];
pub const FMT_SKIP: [&str; 2] = ["# fmt: skip", "# fmt:skip"];
pub const FMT_ON: [&str; 3] = ["# fmt: on", "# fmt:on", "# yapf: enable"];

const NON_BREAKING_SPACE: char = '\u{a0}';

/// A comment found in a prefix, before it becomes a leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoComment {
    /// [`TokenKind::Comment`] when it trails code on the same line,
    /// [`TokenKind::StandaloneComment`] otherwise.
    pub kind: TokenKind,
    pub value: String,
    /// Whitespace between the code and the `#`, as written.
    pub leading_whitespace: String,
    /// Newlines seen before the comment since the previous one.
    pub newlines: usize,
    /// Bytes of the prefix up to and including this comment's line.
    pub consumed: usize,
}

/// Comments in `prefix`, normalized, in order.
///
/// Only a comment on the very first line of the prefix trails code; a
/// backslash continuation in front of it still counts as the same line.
pub fn list_comments(prefix: &str, is_endmarker: bool) -> Vec<ProtoComment> {
    let mut result = Vec::new();
    if !prefix.contains('#') {
        return result;
    }

    let mut consumed = 0;
    let mut nlines = 0;
    let mut ignored_lines = 0;
    for (index, line) in prefix.split('\n').enumerate() {
        consumed += line.len() + 1;
        let full_line = line;
        let line = line.trim_start();
        if line.is_empty() {
            nlines += 1;
        }
        if !line.starts_with('#') {
            if line.ends_with('\\') {
                ignored_lines += 1;
            }
            continue;
        }

        let kind = if index == ignored_lines && !is_endmarker {
            TokenKind::Comment
        } else {
            TokenKind::StandaloneComment
        };
        result.push(ProtoComment {
            kind,
            value: make_comment(line),
            leading_whitespace: full_line[..full_line.len() - line.len()].to_string(),
            newlines: nlines,
            consumed,
        });
        nlines = 0;
    }
    result
}

/// Normalize a comment: trailing whitespace goes and the text after `#`
/// gets a leading space unless it is a shebang, a `#:` annotation or a
/// `##` banner.
pub fn make_comment(content: &str) -> String {
    let content = content.trim_end();
    if content.is_empty() {
        return "#".to_string();
    }

    let mut content = content.strip_prefix('#').unwrap_or(content).to_string();
    if content.starts_with(NON_BREAKING_SPACE) && !content.trim_start().starts_with("type:") {
        content = format!(" {}", &content[NON_BREAKING_SPACE.len_utf8()..]);
    }
    if content.chars().next().is_some_and(|c| !" !:#'".contains(c)) {
        content.insert(0, ' ');
    }
    format!("#{content}")
}

/// Detached comment leaves for every comment in the prefix of `leaf`.
///
/// Each new leaf's prefix holds only the newlines that preceded the
/// comment, which the empty line tracker reads later. The prefix of a
/// dedent or the end marker starts on a fresh line, so nothing in it trails.
pub fn generate_comments(tree: &mut Tree, leaf: NodeId) -> Vec<NodeId> {
    let Some(data) = tree.leaf(leaf) else {
        return Vec::new();
    };
    let starts_line = matches!(data.kind, TokenKind::EndMarker | TokenKind::Dedent);
    list_comments(&data.prefix, starts_line)
        .into_iter()
        .map(|c| tree.new_leaf(c.kind, c.value, "\n".repeat(c.newlines), (0, 0)))
        .collect()
}

/// Replace every `fmt: off` region and `fmt: skip` line with a single
/// standalone comment holding its source verbatim.
///
/// With line ranges set, an off region starting outside them keeps the
/// indentation of its opening comment.
pub fn normalize_fmt_off(tree: &mut Tree, lines: &[(usize, usize)]) {
    while convert_one_fmt_off_pair(tree, lines) {}
}

fn convert_one_fmt_off_pair(tree: &mut Tree, lines: &[(usize, usize)]) -> bool {
    for leaf in tree.leaves(tree.root()) {
        let (prefix, lineno) = match tree.leaf(leaf) {
            Some(data) => (data.prefix.clone(), data.line),
            None => continue,
        };
        let mut previous_consumed = 0;
        for comment in list_comments(&prefix, false) {
            let is_off = FMT_OFF.contains(&comment.value.as_str());
            let is_skip = FMT_SKIP.contains(&comment.value.as_str());
            if !is_off && !is_skip {
                previous_consumed = comment.consumed;
                continue;
            }
            // A trailing comment right after indentation is standalone in disguise.
            if comment.kind != TokenKind::StandaloneComment
                && let Some(prev) = tree.preceding_leaf(leaf)
            {
                let prev_is_whitespace = tree.token(prev).is_some_and(TokenKind::is_whitespace);
                if is_off && !prev_is_whitespace {
                    continue;
                }
                if is_skip && prev_is_whitespace {
                    continue;
                }
            }

            let ignored = generate_ignored_nodes(tree, leaf, &comment, is_skip);
            let Some(&first) = ignored.first() else {
                continue;
            };
            let Some(parent) = tree.parent(first) else {
                continue;
            };
            let first_prefix = tree.prefix(first).to_string();
            let mut standalone_prefix;
            if is_skip {
                tree.set_prefix(first, "");
                standalone_prefix = first_prefix.clone();
            } else {
                tree.set_prefix(first, first_prefix.get(comment.consumed..).unwrap_or(""));
                standalone_prefix = format!(
                    "{}{}",
                    first_prefix.get(..previous_consumed).unwrap_or(""),
                    "\n".repeat(comment.newlines)
                );
            }

            let mut hidden: String = ignored.iter().map(|&n| tree.render(n)).collect();
            if is_off {
                let comment_lineno = lineno.saturating_sub(comment.newlines);
                if !lines.is_empty() && !lines.iter().any(|&(s, e)| s <= comment_lineno && comment_lineno <= e) {
                    let before = first_prefix.split(comment.value.as_str()).next().unwrap_or("");
                    standalone_prefix.push_str(before.rsplit('\n').next().unwrap_or(""));
                }
                hidden = format!("{}\n{hidden}", comment.value);
            }
            if is_skip {
                hidden.push_str(&comment.leading_whitespace);
                hidden.push_str(&comment.value);
            }
            if hidden.ends_with('\n') {
                hidden.pop();
            }

            let mut first_index = None;
            for &node in &ignored {
                let index = tree.remove(node);
                if first_index.is_none() {
                    first_index = index;
                }
            }
            let Some(index) = first_index else {
                continue;
            };
            let standalone = tree.new_leaf(TokenKind::StandaloneComment, hidden, standalone_prefix, (lineno, 0));
            tree.insert_child(parent, index, standalone);
            debug!("converted `{}` region at line {lineno}", comment.value);
            return true;
        }
    }
    false
}

/// Nodes hidden by the `fmt: off` or `fmt: skip` comment in `leaf`'s prefix.
fn generate_ignored_nodes(tree: &mut Tree, leaf: NodeId, comment: &ProtoComment, is_skip: bool) -> Vec<NodeId> {
    if is_skip {
        return ignored_nodes_from_fmt_skip(tree, leaf, comment);
    }

    let mut out = Vec::new();
    let mut container = Some(container_of(tree, leaf));
    while let Some(current) = container {
        if tree.is_token(current, TokenKind::EndMarker) || is_fmt_on(tree, current) {
            break;
        }
        if children_contain_fmt_on(tree, current) {
            let children = tree.children(current).to_vec();
            for (index, &child) in children.iter().enumerate() {
                if tree.is_leaf(child) && is_fmt_on(tree, child) {
                    break;
                }
                let next_has_fmt_on = children.get(index + 1).is_some_and(|&next| children_contain_fmt_on(tree, next));
                if tree.is_token(child, TokenKind::Indent) && next_has_fmt_on {
                    break;
                }
                if children_contain_fmt_on(tree, child) {
                    break;
                }
                out.push(child);
            }
            break;
        }
        if tree.is_token(current, TokenKind::Dedent) && tree.next_sibling(current).is_none() {
            // An unmatched `fmt: off`; this dedent still closes the block.
            break;
        }
        out.push(current);
        container = tree.next_sibling(current);
    }
    out
}

/// The statement a trailing `fmt: skip` comment applies to.
fn ignored_nodes_from_fmt_skip(tree: &mut Tree, leaf: NodeId, comment: &ProtoComment) -> Vec<NodeId> {
    let prefix = tree.prefix(leaf).to_string();
    let own_comments = list_comments(&prefix, false);
    if own_comments.first().is_none_or(|c| c.value != comment.value) {
        return Vec::new();
    }

    if let Some(mut prev) = tree.prev_sibling(leaf) {
        // Inside brackets the line break after the comment is in this
        // prefix too, and the next line must not join the hidden one.
        tree.set_prefix(leaf, prefix.get(comment.consumed.saturating_sub(1)..).unwrap_or(""));
        let mut siblings = vec![prev];
        while !tree.prefix(prev).contains('\n') {
            let Some(before) = tree.prev_sibling(prev) else {
                break;
            };
            prev = before;
            siblings.insert(0, prev);
        }
        return siblings;
    }

    // `if x:  # fmt: skip` puts the comment on the suite's first NEWLINE;
    // the header before the suite is what gets hidden.
    let Some(parent) = tree.parent(leaf) else {
        return Vec::new();
    };
    if !tree.is_syntax(parent, Syntax::Suite) || !tree.is_token(leaf, TokenKind::Newline) {
        return Vec::new();
    }
    tree.set_prefix(leaf, "");
    let mut ignored = Vec::new();
    let mut sibling = tree.prev_sibling(parent);
    while let Some(node) = sibling {
        if tree.is_syntax(node, Syntax::Suite) {
            break;
        }
        ignored.insert(0, node);
        sibling = tree.prev_sibling(node);
    }
    if let Some(grandparent) = tree.parent(parent)
        && let Some(before) = tree.prev_sibling(grandparent)
        && tree.is_name(before, "async")
    {
        ignored.insert(0, before);
    }
    ignored
}

/// The outermost node starting with `leaf`, short of the module itself and
/// of anything directly inside brackets.
fn container_of(tree: &Tree, leaf: NodeId) -> NodeId {
    let same_prefix = tree.prefix(leaf);
    let mut container = leaf;
    while let Some(parent) = tree.parent(container) {
        let first_child = tree.child(parent, 0);
        if first_child.is_none_or(|c| tree.prefix(c) != same_prefix) {
            break;
        }
        if tree.is_syntax(parent, Syntax::FileInput) {
            break;
        }
        if tree
            .prev_sibling(parent)
            .and_then(|p| tree.token(p))
            .is_some_and(TokenKind::is_bracket)
        {
            break;
        }
        container = parent;
    }
    container
}

/// The last `fmt: on`/`fmt: off` comment in the node's prefix is an `on`.
fn is_fmt_on(tree: &Tree, node: NodeId) -> bool {
    let mut fmt_on = false;
    for comment in list_comments(tree.prefix(node), false) {
        if FMT_ON.contains(&comment.value.as_str()) {
            fmt_on = true;
        } else if FMT_OFF.contains(&comment.value.as_str()) {
            fmt_on = false;
        }
    }
    fmt_on
}

fn children_contain_fmt_on(tree: &Tree, node: NodeId) -> bool {
    tree.children(node)
        .iter()
        .any(|&child| tree.first_leaf(child).is_some_and(|leaf| is_fmt_on(tree, leaf)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use std::collections::BTreeSet;

    #[test]
    fn first_line_comment_trails_code() {
        let comments = list_comments("  # trailing\n\n# own line\n", false);
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].kind, TokenKind::Comment);
        assert_eq!(comments[0].value, "# trailing");
        assert_eq!(comments[1].kind, TokenKind::StandaloneComment);
        assert_eq!(comments[1].newlines, 1);
    }

    #[test]
    fn endmarker_comments_stand_alone() {
        let comments = list_comments("# last\n", true);
        assert_eq!(comments[0].kind, TokenKind::StandaloneComment);
    }

    #[test]
    fn continuation_keeps_comment_trailing() {
        let comments = list_comments(" \\\n  # after backslash", false);
        assert_eq!(comments[0].kind, TokenKind::Comment);
    }

    #[test]
    fn comment_spacing() {
        assert_eq!(make_comment("#comment"), "# comment");
        assert_eq!(make_comment("#!shebang"), "#!shebang");
        assert_eq!(make_comment("#:annotation"), "#:annotation");
        assert_eq!(make_comment("### banner  "), "### banner");
        assert_eq!(make_comment("#"), "#");
        assert_eq!(make_comment("#\u{a0}nbsp"), "# nbsp");
        assert_eq!(make_comment("#\u{a0}type: int"), "# \u{a0}type: int");
    }

    fn standalone_values(tree: &Tree) -> Vec<String> {
        tree.leaves(tree.root())
            .into_iter()
            .filter(|&l| tree.is_token(l, TokenKind::StandaloneComment))
            .map(|l| tree.value(l).to_string())
            .collect()
    }

    #[test]
    fn fmt_off_region_becomes_verbatim() {
        let source = "# fmt: off\nx = [1,2,\n  3]\n# fmt: on\ny = 1\n";
        let mut tree = parse(source, &BTreeSet::new()).unwrap();
        normalize_fmt_off(&mut tree, &[]);
        assert_eq!(standalone_values(&tree), ["# fmt: off\nx = [1,2,\n  3]"]);
    }

    #[test]
    fn fmt_skip_hides_one_statement() {
        let mut tree = parse("a  =  1  # fmt: skip\nb = 2\n", &BTreeSet::new()).unwrap();
        normalize_fmt_off(&mut tree, &[]);
        assert_eq!(standalone_values(&tree), ["a  =  1  # fmt: skip"]);
    }

    #[test]
    fn fmt_skip_inside_brackets_hides_only_its_line() {
        let source = "b = (\n    \"this is \"  # fmt: skip\n    \"not working\"  # fmt: skip\n)\n";
        let mut tree = parse(source, &BTreeSet::new()).unwrap();
        normalize_fmt_off(&mut tree, &[]);
        assert_eq!(
            standalone_values(&tree),
            ["\"this is \"  # fmt: skip\n    \"not working\"  # fmt: skip"]
        );
    }

    #[test]
    fn fmt_skip_keeps_spacing_before_comment() {
        let source = "x = [\n    1,2, # fmt: skip\n    3,\n]\n";
        let mut tree = parse(source, &BTreeSet::new()).unwrap();
        normalize_fmt_off(&mut tree, &[]);
        assert_eq!(standalone_values(&tree), ["1,2, # fmt: skip"]);
        assert!(tree.to_source().contains("# fmt: skip\n    3,"), "{}", tree.to_source());
    }

    #[test]
    fn comments_before_dedent_stand_alone() {
        let mut tree = parse("if x:\n    y\n    # end of block\nz\n", &BTreeSet::new()).unwrap();
        let dedent = tree
            .leaves(tree.root())
            .into_iter()
            .find(|&l| tree.is_token(l, TokenKind::Dedent))
            .unwrap();
        let comments = generate_comments(&mut tree, dedent);
        assert_eq!(comments.len(), 1);
        assert!(tree.is_token(comments[0], TokenKind::StandaloneComment));
    }

    #[test]
    fn trailing_fmt_off_after_code_is_ignored() {
        let mut tree = parse("x = 1  # fmt: off\n", &BTreeSet::new()).unwrap();
        normalize_fmt_off(&mut tree, &[]);
        assert!(standalone_values(&tree).is_empty());
    }
}
