//! Safety checks on formatted output.
//!
//! The formatted text is parsed again and both trees are reduced to an
//! abstract form that ignores everything formatting may legitimately
//! change: comments, whitespace, grouping parentheses, separator commas,
//! quote style and the way a string is split into literals. The two forms
//! must be equal. Separately, formatting the output again must not change
//! it.

use crate::config::FormatConfig;
use crate::error::{EquivalenceError, StabilityWarning};
use crate::formatter::format_str_once;
use crate::grammar::{Syntax, TokenKind};
use crate::parser::parse;
use crate::string_split::iter_fexpr_spans;
use crate::strings::get_string_prefix;
use crate::tree::{NodeData, NodeId, Tree};
use log::debug;

/// How many times the output is formatted again before giving up on it
/// settling.
pub const STABILITY_PASSES: usize = 2;

/// Marks the bounds of a replacement field in a decoded f-string.
const FIELD_MARK: char = '\u{1}';

/// Outcome of checking one file's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyReport {
    pub equivalent: bool,
    pub stable: bool,
    pub diagnostic: Option<String>,
}

impl SafetyReport {
    /// A report for output that was not checked or passed every check.
    pub fn ok() -> Self {
        SafetyReport {
            equivalent: true,
            stable: true,
            diagnostic: None,
        }
    }
}

/// Run the equivalence check and, unless line ranges are set, the
/// stability check on `dst`, the formatted form of `src`.
pub fn check(src: &str, dst: &str, config: &FormatConfig) -> SafetyReport {
    if let Err(err) = assert_equivalent(src, dst, config) {
        return SafetyReport {
            equivalent: false,
            stable: false,
            diagnostic: Some(err.diff_description),
        };
    }
    match assert_stable(dst, config) {
        Ok(()) => SafetyReport::ok(),
        Err(warning) => SafetyReport {
            equivalent: true,
            stable: false,
            diagnostic: Some(warning.to_string()),
        },
    }
}

/// `src` and `dst` parse to the same abstract tree.
pub fn assert_equivalent(src: &str, dst: &str, config: &FormatConfig) -> Result<(), EquivalenceError> {
    let src_tree = parse(src, &config.target_versions).map_err(|e| EquivalenceError {
        diff_description: format!("cannot parse the source for comparison: {e}"),
    })?;
    let dst_tree = parse(dst, &config.target_versions).map_err(|e| EquivalenceError {
        diff_description: format!("produced code that does not parse: {e}"),
    })?;
    let src_dump = abstract_dump(&src_tree);
    let dst_dump = abstract_dump(&dst_tree);
    if src_dump == dst_dump {
        return Ok(());
    }

    let index = src_dump
        .iter()
        .zip(&dst_dump)
        .position(|(a, b)| a != b)
        .unwrap_or(src_dump.len().min(dst_dump.len()));
    let show = |dump: &[String]| dump.get(index).map_or("<end>".to_string(), |s| s.trim().to_string());
    Err(EquivalenceError {
        diff_description: format!(
            "abstract trees differ at node {}: source has `{}`, output has `{}`",
            index + 1,
            show(&src_dump),
            show(&dst_dump)
        ),
    })
}

/// Formatting `dst` again gives `dst`.
///
/// Skipped with line ranges: the ranges would have to be moved onto the
/// formatted text first, and a second pass over them may still change
/// something.
pub fn assert_stable(dst: &str, config: &FormatConfig) -> Result<(), StabilityWarning> {
    if !config.line_ranges.is_empty() {
        return Ok(());
    }
    let mut current = dst.to_string();
    for pass in 1..=STABILITY_PASSES {
        let next = format_str_once(&current, config, &[]).map_err(|e| StabilityWarning {
            passes: pass,
            detail: format!("the output could not be formatted again: {e}"),
        })?;
        if next == current {
            if pass == 1 {
                return Ok(());
            }
            return Err(StabilityWarning {
                passes: pass,
                detail: "the output only settled on a later pass".to_string(),
            });
        }
        debug!("pass {pass} over the output changed it");
        if pass == STABILITY_PASSES {
            return Err(StabilityWarning {
                passes: pass,
                detail: first_difference(&current, &next),
            });
        }
        current = next;
    }
    Ok(())
}

fn first_difference(a: &str, b: &str) -> String {
    let index = a
        .lines()
        .zip(b.lines())
        .position(|(x, y)| x != y)
        .unwrap_or(a.lines().count().min(b.lines().count()));
    format!(
        "line {} changed from `{}` to `{}`",
        index + 1,
        a.lines().nth(index).unwrap_or(""),
        b.lines().nth(index).unwrap_or("")
    )
}

/// One line per abstract node, indented by depth.
pub fn abstract_dump(tree: &Tree) -> Vec<String> {
    let mut out = Vec::new();
    dump_node(tree, tree.root(), 0, &mut out);
    out
}

fn is_trivia(kind: TokenKind) -> bool {
    kind.is_whitespace()
        || matches!(
            kind,
            TokenKind::Comment | TokenKind::StandaloneComment | TokenKind::EndMarker | TokenKind::Semi
        )
}

/// Nodes whose commas make a tuple rather than separate items.
fn is_tuple_like(kind: Syntax) -> bool {
    matches!(
        kind,
        Syntax::TestlistGexp | Syntax::Testlist | Syntax::Exprlist | Syntax::TestlistStarExpr | Syntax::Subscriptlist
    )
}

fn dump_node(tree: &Tree, id: NodeId, depth: usize, out: &mut Vec<String>) {
    let indent = "  ".repeat(depth);
    let node = match tree.data(id) {
        NodeData::Leaf(leaf) => {
            if is_trivia(leaf.kind) || leaf.kind == TokenKind::Comma || leaf.value.is_empty() {
                return;
            }
            let text = match leaf.kind {
                TokenKind::String => string_constant(&[leaf.value.as_str()], is_string_statement(tree, id)),
                TokenKind::Number => format!("NUMBER {}", leaf.value.to_lowercase()),
                kind => format!("{kind} {}", leaf.value),
            };
            out.push(format!("{indent}{text}"));
            return;
        }
        NodeData::Interior(node) => node,
    };

    let children = significant_children(tree, id, node.kind);
    match node.kind {
        // Statement grouping is layout.
        Syntax::FileInput | Syntax::SimpleStmt | Syntax::Suite => {
            for child in children {
                dump_node(tree, child, depth, out);
            }
            return;
        }
        // `with (a, b):` holds the same two context managers as `with a, b:`.
        Syntax::WithStmt => {
            out.push(format!("{indent}{}", node.kind.name()));
            for child in children {
                match parenthesized_with_items(tree, child) {
                    Some(items) => {
                        for item in items {
                            dump_node(tree, item, depth + 1, out);
                        }
                    }
                    None => dump_node(tree, child, depth + 1, out),
                }
            }
            return;
        }
        Syntax::Atom => {
            if !children.is_empty() && children.iter().all(|&c| tree.is_token(c, TokenKind::String)) {
                let values: Vec<&str> = children.iter().map(|&c| tree.value(c)).collect();
                out.push(format!("{indent}{}", string_constant(&values, is_string_statement(tree, id))));
                return;
            }
            if let Some(inner) = grouped_expression(tree, &children) {
                dump_node(tree, inner, depth, out);
                return;
            }
            if children.len() == 2 && tree.value(children[0]) == "(" {
                out.push(format!("{indent}tuple"));
                return;
            }
        }
        _ => {}
    }

    let is_tuple = is_tuple_like(node.kind) && tree.children(id).iter().any(|&c| tree.is_token(c, TokenKind::Comma));
    if children.len() == 1 && !is_tuple {
        dump_node(tree, children[0], depth, out);
        return;
    }
    let label = if is_tuple { "tuple" } else { node.kind.name() };
    out.push(format!("{indent}{label}"));
    for child in children {
        dump_node(tree, child, depth + 1, out);
    }
}

fn significant_children(tree: &Tree, id: NodeId, kind: Syntax) -> Vec<NodeId> {
    let mut children: Vec<NodeId> = tree
        .children(id)
        .iter()
        .copied()
        .filter(|&c| {
            tree.token(c)
                .is_none_or(|k| !is_trivia(k) && k != TokenKind::Comma && !(k.is_bracket() && tree.value(c).is_empty()))
        })
        .collect();
    match kind {
        // `from a import (b, c)` and `from a import b, c` import the same.
        Syntax::ImportFrom => {
            children.retain(|&c| !tree.is_token(c, TokenKind::LPar) && !tree.is_token(c, TokenKind::RPar));
        }
        // `class A():` and `class A:` define the same class.
        Syntax::Classdef => {
            if let Some(pos) = children
                .windows(2)
                .position(|w| tree.is_token(w[0], TokenKind::LPar) && tree.is_token(w[1], TokenKind::RPar))
            {
                children.drain(pos..pos + 2);
            }
        }
        _ => {}
    }
    children
}

/// The items of a parenthesized list of `with` items.
fn parenthesized_with_items(tree: &Tree, atom: NodeId) -> Option<Vec<NodeId>> {
    if !tree.is_syntax(atom, Syntax::Atom) {
        return None;
    }
    let inner: Vec<NodeId> = tree
        .children(atom)
        .iter()
        .copied()
        .filter(|&c| !tree.token(c).is_some_and(TokenKind::is_bracket))
        .collect();
    let [list] = inner.as_slice() else {
        return None;
    };
    let is_generator = tree.children(*list).iter().any(|&c| tree.is_syntax(c, Syntax::CompFor));
    (tree.is_syntax(*list, Syntax::TestlistGexp) && !is_generator)
        .then(|| significant_children(tree, *list, Syntax::TestlistGexp))
}

/// The expression inside grouping parentheses; generator expressions keep
/// theirs.
fn grouped_expression(tree: &Tree, children: &[NodeId]) -> Option<NodeId> {
    let [open, inner, close] = children else {
        return None;
    };
    if !tree.is_token(*open, TokenKind::LPar) || !tree.is_token(*close, TokenKind::RPar) {
        return None;
    }
    let is_generator = tree.is_syntax(*inner, Syntax::TestlistGexp)
        && tree.children(*inner).iter().any(|&c| tree.is_syntax(c, Syntax::CompFor));
    (!is_generator).then_some(*inner)
}

/// A string that is a statement on its own, possibly in parentheses.
/// Only these may be re-indented as docstrings.
fn is_string_statement(tree: &Tree, id: NodeId) -> bool {
    let mut node = id;
    while let Some(parent) = tree.parent(node) {
        match tree.syntax(parent) {
            Some(Syntax::Atom) if tree.child(parent, 0).is_some_and(|c| tree.is_token(c, TokenKind::LPar)) => node = parent,
            Some(Syntax::SimpleStmt) => return true,
            _ => return false,
        }
    }
    false
}

/// The value of implicitly concatenated string literals. Lines of a
/// string statement are stripped, since docstrings are re-indented.
fn string_constant(literals: &[&str], strip_lines: bool) -> String {
    let mut is_bytes = false;
    let mut value = String::new();
    for literal in literals {
        let prefix = get_string_prefix(literal).to_lowercase();
        is_bytes |= prefix.contains('b');
        value.push_str(&decode_literal(literal, &prefix));
    }
    let label = if is_bytes { "BYTES" } else { "STRING" };
    if !strip_lines {
        return format!("{label} {value:?}");
    }
    let stripped: Vec<&str> = value.lines().map(str::trim).collect();
    format!("{label} {:?}", stripped.join("\n").trim())
}

fn decode_literal(literal: &str, prefix: &str) -> String {
    let quoted = &literal[prefix.len()..];
    let quote_len = if quoted.starts_with("\"\"\"") || quoted.starts_with("'''") { 3 } else { 1 };
    let body = quoted
        .get(quote_len..quoted.len().saturating_sub(quote_len))
        .unwrap_or_default();
    if prefix.contains('r') && !prefix.contains('f') {
        return body.to_string();
    }
    if !prefix.contains('f') {
        return decode_escapes(body, prefix.contains('b'));
    }

    // Replacement fields are kept as written; the text around them is decoded.
    let chars: Vec<char> = body.chars().collect();
    let mut out = String::new();
    let mut last = 0;
    let raw = prefix.contains('r');
    let decode = |text: String| if raw { text } else { decode_escapes(&text, false) };
    for (start, end) in iter_fexpr_spans(&chars) {
        let text: String = chars[last..start].iter().collect();
        out.push_str(&decode(text.replace("{{", "{").replace("}}", "}")));
        out.push(FIELD_MARK);
        out.extend(&chars[start..end]);
        out.push(FIELD_MARK);
        last = end;
    }
    let text: String = chars[last..].iter().collect();
    out.push_str(&decode(text.replace("{{", "{").replace("}}", "}")));
    out
}

/// Resolve backslash escapes. `\N{...}` stays symbolic, upper-cased.
fn decode_escapes(body: &str, is_bytes: bool) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(next) = chars.next() else {
            out.push('\\');
            break;
        };
        match next {
            '\n' => {}
            '\\' | '\'' | '"' => out.push(next),
            'a' => out.push('\u{7}'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\u{b}'),
            '0'..='7' => {
                let mut digits = next.to_string();
                while digits.len() < 3 && chars.peek().is_some_and(|d| ('0'..='7').contains(d)) {
                    digits.extend(chars.next());
                }
                push_code(&mut out, u32::from_str_radix(&digits, 8).ok(), &digits);
            }
            'x' | 'u' | 'U' if next == 'x' || !is_bytes => {
                let len = match next {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let digits: String = (0..len).filter_map(|_| chars.next_if(char::is_ascii_hexdigit)).collect();
                push_code(&mut out, u32::from_str_radix(&digits, 16).ok(), &digits);
            }
            'N' if !is_bytes && chars.peek() == Some(&'{') => {
                let mut name = String::new();
                for c in chars.by_ref() {
                    name.push(c);
                    if c == '}' {
                        break;
                    }
                }
                out.push_str("\\N");
                out.push_str(&name.to_uppercase());
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}

fn push_code(out: &mut String, code: Option<u32>, digits: &str) {
    match code.and_then(char::from_u32) {
        Some(c) => out.push(c),
        None => {
            out.push('\\');
            out.push_str(digits);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn equivalent(src: &str, dst: &str) -> bool {
        assert_equivalent(src, dst, &FormatConfig::default()).is_ok()
    }

    fn dump(source: &str) -> Vec<String> {
        abstract_dump(&parse(source, &BTreeSet::new()).unwrap())
    }

    #[test]
    fn layout_does_not_matter() {
        assert!(equivalent("x=1;y=2\n", "x = 1\ny = 2\n"));
        assert!(equivalent("if x: pass\n", "if x:\n    pass\n"));
        assert!(equivalent("f(a,b,)\n", "f(\n    a,\n    b,\n)\n"));
        assert!(equivalent("x = 1  # note\n", "x = 1\n"));
    }

    #[test]
    fn grouping_parens_do_not_matter() {
        assert!(equivalent("x = (y)\n", "x = y\n"));
        assert!(equivalent("print((1))\n", "print(1)\n"));
        assert!(equivalent("for (x) in y: pass\n", "for x in y:\n    pass\n"));
        assert!(equivalent("x = -2**8\n", "x = -(2**8)\n"));
        assert!(equivalent("del (a, b)\n", "del a, b\n"));
        assert!(equivalent("class A(): pass\n", "class A:\n    pass\n"));
        assert!(equivalent("from a import (b)\n", "from a import b\n"));
    }

    #[test]
    fn tuples_are_not_groups() {
        assert!(!equivalent("a = (1,)\n", "a = (1)\n"));
        assert!(!equivalent("x[1,]\n", "x[1]\n"));
        assert!(equivalent("a = 1, 2\n", "a = (1, 2)\n"));
    }

    #[test]
    fn strings_compare_by_value() {
        assert!(equivalent("x = 'a'\n", "x = \"a\"\n"));
        assert!(equivalent("x = u'a'\n", "x = \"a\"\n"));
        assert!(equivalent("x = 'a' 'b'\n", "x = (\n    \"ab\"\n)\n"));
        assert!(equivalent("x = 'it\\'s'\n", "x = \"it's\"\n"));
        assert!(equivalent("x = '\\xAB'\n", "x = '\\xab'\n"));
        assert!(equivalent("x = f'{y}' '{z}'\n", "x = f\"{y}{{z}}\"\n"));
        assert!(!equivalent("x = 'a'\n", "x = 'b'\n"));
        assert!(!equivalent("x = 'a'\n", "x = b'a'\n"));
    }

    #[test]
    fn numbers_ignore_case() {
        assert!(equivalent("x = 0XFF\n", "x = 0xFF\n"));
        assert!(equivalent("x = 1E5\n", "x = 1e5\n"));
        assert!(!equivalent("x = 1\n", "x = 2\n"));
    }

    #[test]
    fn docstring_indentation_is_ignored() {
        assert!(equivalent(
            "def f():\n  '''Doc.\n\n     More.   '''\n",
            "def f():\n    \"\"\"Doc.\n\n    More.\"\"\"\n"
        ));
    }

    #[test]
    fn only_string_statements_ignore_indentation() {
        assert!(!equivalent("x = '  a'\n", "x = 'a'\n"));
        assert!(!equivalent("f('''a\n    b''')\n", "f('''a\nb''')\n"));
        assert!(equivalent("'''  a'''\n", "'''a'''\n"));
        assert!(equivalent("('''a\n    b''')\n", "'''a\nb'''\n"));
    }

    #[test]
    fn parenthesized_with_items_are_separate_items() {
        assert!(equivalent("with (a, b):\n    pass\n", "with a, b:\n    pass\n"));
        assert!(equivalent(
            "with (open(a) as f, open(b) as g):\n    pass\n",
            "with open(a) as f, open(b) as g:\n    pass\n"
        ));
        assert!(!equivalent("with (a, b) as c:\n    pass\n", "with a, b as c:\n    pass\n"));
    }

    #[test]
    fn unparsable_output_is_reported() {
        let err = assert_equivalent("x = 1\n", "x = (\n", &FormatConfig::default()).unwrap_err();
        assert!(err.diff_description.contains("does not parse"));
    }

    #[test]
    fn difference_names_the_node() {
        let err = assert_equivalent("x = 1\n", "x = 2\n", &FormatConfig::default()).unwrap_err();
        assert!(err.diff_description.contains("NUMBER 1"));
        assert!(err.diff_description.contains("NUMBER 2"));
    }

    #[test]
    fn dump_flattens_statements() {
        assert_eq!(dump("a;b\n"), ["NAME a", "NAME b"]);
    }

    #[test]
    fn formatted_output_is_stable() {
        assert!(assert_stable("x = 1\n", &FormatConfig::default()).is_ok());
    }

    #[test]
    fn unformatted_output_is_flagged() {
        let warning = assert_stable("x=1\n", &FormatConfig::default()).unwrap_err();
        assert_eq!(warning.passes, 2);
    }

    #[test]
    fn escapes_decode() {
        assert_eq!(decode_escapes("a\\tb\\101\\u0041", false), "a\tbAA");
        assert_eq!(decode_escapes("\\N{bullet}", false), "\\N{BULLET}");
        assert_eq!(decode_escapes("\\u0041", true), "\\u0041");
    }
}
