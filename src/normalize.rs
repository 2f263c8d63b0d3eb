//! Tree rewrites applied while lines are generated.
//!
//! Each pass mutates the statement or expression it is handed and nothing
//! else, so running it twice on its own output changes nothing.

use crate::comments::{FMT_OFF, list_comments};
use crate::grammar::{Syntax, TokenKind};
use crate::lines::{BracketTracker, COMMA_PRIORITY, LineLeaf, Mode, Priority};
use crate::nodes::{
    is_atom_with_invisible_parens, is_empty_tuple, is_one_tuple, is_walrus_assignment, is_yield,
    unwrap_singleton_parenthesis,
};
use crate::strings::{fix_docstring, get_string_prefix, has_triple_quotes, normalize_string_prefix, normalize_string_quotes};
use crate::tree::{NodeId, Tree};

/// Make existing optional parentheses invisible or create new ones.
///
/// `parens_after` is the set of keywords (or `=`-like operators) after which
/// the child expression gets the treatment. Standalone comments attached to
/// the statement keep it as is.
pub fn normalize_invisible_parens(tree: &mut Tree, node: NodeId, parens_after: &[&str], mode: &Mode) {
    if list_comments(tree.prefix(node), false)
        .iter()
        .any(|pc| FMT_OFF.contains(&pc.value.as_str()))
    {
        return;
    }

    let node_kind = tree.syntax(node);
    let mut check_lpar = false;
    let children = tree.children(node).to_vec();
    for (index, child) in children.into_iter().enumerate() {
        if tree.is_syntax(child, Syntax::Annassign) {
            normalize_invisible_parens(tree, child, parens_after, mode);
        }
        // Long tuple unpacking on the left of an assignment.
        if index == 0 && tree.is_syntax(child, Syntax::TestlistStarExpr) {
            check_lpar = true;
        }

        if check_lpar {
            let is_atom = tree.is_syntax(child, Syntax::Atom);
            let after_for = tree.prev_sibling(child).is_some_and(|p| tree.is_name(p, "for"));
            if is_atom && ((node_kind == Some(Syntax::ForStmt) && after_for) || node_kind == Some(Syntax::DelStmt)) {
                if maybe_make_parens_invisible_in_atom(tree, child, node, true) {
                    wrap_in_parentheses(tree, node, child, false);
                }
            } else if node_kind == Some(Syntax::WithStmt) && !tree.is_leaf(child) {
                remove_with_parens(tree, child, node, mode.parenthesized_context_managers);
            } else if is_atom {
                if maybe_make_parens_invisible_in_atom(tree, child, node, false) {
                    wrap_in_parentheses(tree, node, child, false);
                }
            } else if node_kind == Some(Syntax::ExceptClause) && tree.is_token(child, TokenKind::Star) {
                // `except*` keeps its star; the type after it is wrapped instead.
            } else if is_one_tuple(tree, child) {
                wrap_in_parentheses(tree, node, child, true);
            } else if node_kind == Some(Syntax::ImportFrom) {
                normalize_import_from(tree, node, child, index);
                break;
            } else if !crate::nodes::is_multiline_string(tree, child) {
                wrap_in_parentheses(tree, node, child, false);
            }
        }

        check_lpar = tree.is_leaf(child) && parens_after.contains(&tree.value(child));
    }
}

fn normalize_import_from(tree: &mut Tree, parent: NodeId, child: NodeId, index: usize) {
    // `from a import (b, c)` keeps its parentheses directly on the statement.
    if tree.is_token(child, TokenKind::LPar) {
        tree.set_value(child, "");
        if let Some(&last) = tree.children(parent).last()
            && tree.is_token(last, TokenKind::RPar)
        {
            tree.set_value(last, "");
        }
    } else if !tree.is_token(child, TokenKind::Star) {
        let lpar = tree.new_leaf(TokenKind::LPar, "", "", (0, 0));
        let rpar = tree.new_leaf(TokenKind::RPar, "", "", (0, 0));
        tree.insert_child(parent, index, lpar);
        tree.append_child(parent, rpar);
    }
}

/// Hide redundant parentheses around `with` items, recursively.
///
/// Parentheses around several items stay unless every target reads them
/// as a group of context managers rather than a tuple.
fn remove_with_parens(tree: &mut Tree, node: NodeId, parent: NodeId, parenthesized_cms: bool) {
    match tree.syntax(node) {
        Some(Syntax::Atom) => {
            if maybe_make_parens_invisible_in_atom(tree, node, parent, parenthesized_cms) {
                wrap_in_parentheses(tree, parent, node, false);
            }
            if let Some(inner) = tree.child(node, 1)
                && !tree.is_leaf(inner)
            {
                remove_with_parens(tree, inner, node, parenthesized_cms);
            }
        }
        Some(Syntax::TestlistGexp) => {
            for child in tree.children(node).to_vec() {
                if tree.is_syntax(child, Syntax::Atom) {
                    remove_with_parens(tree, child, node, parenthesized_cms);
                }
            }
        }
        Some(Syntax::AsexprTest) => {
            let has_walrus = tree
                .leaves(node)
                .iter()
                .any(|&l| tree.is_token(l, TokenKind::ColonEqual));
            if let Some(first) = tree.child(node, 0)
                && !has_walrus
                && maybe_make_parens_invisible_in_atom(tree, first, node, true)
            {
                wrap_in_parentheses(tree, node, first, false);
            }
        }
        _ => {}
    }
}

/// Make the parentheses of `node` invisible when that is safe, recursively
/// for nested parentheses.
///
/// Returns whether the caller should wrap `node` in invisible parentheses
/// of its own, which is the case when `node` is not an atom at all.
pub fn maybe_make_parens_invisible_in_atom(
    tree: &mut Tree,
    node: NodeId,
    parent: NodeId,
    remove_brackets_around_comma: bool,
) -> bool {
    if !tree.is_syntax(node, Syntax::Atom)
        || is_empty_tuple(tree, node)
        || is_one_tuple(tree, node)
        || is_yield(tree, node)
        || (!remove_brackets_around_comma && max_delimiter_priority_in_atom(tree, node) >= COMMA_PRIORITY)
        || is_tuple_containing_walrus(tree, node)
    {
        return false;
    }

    // Only a condition may hold a bare `:=`.
    if is_walrus_assignment(tree, node)
        && matches!(
            tree.syntax(parent),
            Some(
                Syntax::Annassign
                    | Syntax::ExprStmt
                    | Syntax::AssertStmt
                    | Syntax::ReturnStmt
                    | Syntax::ForStmt
                    | Syntax::DelStmt
                    | Syntax::WithStmt
                    | Syntax::AsexprTest
                    | Syntax::Funcdef
                    | Syntax::Power
            )
        )
    {
        return false;
    }

    let children = tree.children(node).to_vec();
    let (Some(&first), Some(&last)) = (children.first(), children.last()) else {
        return false;
    };
    if tree.is_leaf_value(first, TokenKind::LPar, "(") && tree.is_leaf_value(last, TokenKind::RPar, ")") {
        let Some(&middle) = children.get(1) else {
            return false;
        };
        // A type comment right after the paren has to stay where it is.
        if !tree.prefix(middle).trim().starts_with("# type: ignore") {
            tree.set_value(first, "");
            tree.set_value(last, "");
        }
        maybe_make_parens_invisible_in_atom(tree, middle, parent, remove_brackets_around_comma);

        if is_atom_with_invisible_parens(tree, middle)
            && let Some(inner) = tree.child(middle, 1)
        {
            tree.replace(middle, inner);
        }
        return false;
    }

    true
}

fn is_tuple_containing_walrus(tree: &Tree, node: NodeId) -> bool {
    if !tree.is_syntax(node, Syntax::Atom) {
        return false;
    }
    unwrap_singleton_parenthesis(tree, node).is_some_and(|gexp| {
        tree.is_syntax(gexp, Syntax::TestlistGexp)
            && tree
                .children(gexp)
                .iter()
                .any(|&c| tree.is_syntax(c, Syntax::NamedexprTest))
    })
}

/// Highest delimiter priority directly inside the parentheses of `node`.
pub fn max_delimiter_priority_in_atom(tree: &Tree, node: NodeId) -> Priority {
    if !tree.is_syntax(node, Syntax::Atom) {
        return 0;
    }
    let children = tree.children(node);
    let (Some(&first), Some(&last)) = (children.first(), children.last()) else {
        return 0;
    };
    if !(tree.is_token(first, TokenKind::LPar) && tree.is_token(last, TokenKind::RPar)) {
        return 0;
    }

    let mut tracker = BracketTracker::default();
    for &child in &children[1..children.len() - 1] {
        for leaf in tree.leaves(child) {
            if let Some(mut line_leaf) = LineLeaf::from_tree(tree, leaf) {
                tracker.mark(tree, &mut line_leaf);
            }
        }
    }
    tracker.max_delimiter_priority(None)
}

/// Wrap `child` in a new atom with parentheses, moving its prefix in front
/// of the opening one.
pub fn wrap_in_parentheses(tree: &mut Tree, parent: NodeId, child: NodeId, visible: bool) {
    if tree.parent(child) != Some(parent) {
        return;
    }
    let prefix = tree.prefix(child).to_string();
    tree.set_prefix(child, "");
    let (open, close) = if visible { ("(", ")") } else { ("", "") };
    let lpar = tree.new_leaf(TokenKind::LPar, open, prefix, (0, 0));
    let rpar = tree.new_leaf(TokenKind::RPar, close, "", (0, 0));
    tree.wrap(child, Syntax::Atom, vec![lpar], vec![rpar]);
}

/// `-2 ** 8` becomes `-(2 ** 8)`.
pub fn parenthesize_power_operand(tree: &mut Tree, factor: NodeId) {
    let Some(operand) = tree.child(factor, 1) else {
        return;
    };
    let children = tree.children(operand);
    if tree.is_syntax(operand, Syntax::Power)
        && children.len() == 3
        && tree.is_token(children[1], TokenKind::DoubleStar)
    {
        wrap_in_parentheses(tree, factor, operand, true);
    }
}

/// `10 .real` becomes `(10).real`.
pub fn parenthesize_number_attribute(tree: &mut Tree, power: NodeId) {
    let children = tree.children(power).to_vec();
    for pair in children.windows(2) {
        let (leaf, next) = (pair[0], pair[1]);
        if !tree.is_token(leaf, TokenKind::Number) || !tree.is_syntax(next, Syntax::Trailer) {
            continue;
        }
        let value = tree.value(leaf).to_ascii_lowercase();
        let attribute = tree.child(next, 0).is_some_and(|c| tree.is_token(c, TokenKind::Dot));
        if attribute && !value.starts_with("0x") && !value.starts_with("0b") && !value.starts_with("0o") && !value.contains('j')
        {
            wrap_in_parentheses(tree, power, leaf, true);
        }
    }
}

/// `await (a.b())` becomes `await a.b()`.
///
/// Parentheses around anything that binds looser than a primary stay:
/// operators, `**` and a nested `await` would change meaning without them.
pub fn remove_await_parens(tree: &mut Tree, power: NodeId) {
    let Some(first) = tree.child(power, 0) else {
        return;
    };
    if !tree.is_name(first, "await") {
        return;
    }
    let Some(atom) = tree.child(power, 1) else {
        return;
    };
    if !tree.is_syntax(atom, Syntax::Atom) || !tree.child(atom, 0).is_some_and(|c| tree.is_leaf_value(c, TokenKind::LPar, "(")) {
        return;
    }
    if maybe_make_parens_invisible_in_atom(tree, atom, power, true) {
        wrap_in_parentheses(tree, power, atom, false);
    }

    let children = tree.children(atom).to_vec();
    let [open, contents, close] = children[..] else {
        return;
    };
    if tree.is_leaf(contents) {
        return;
    }
    let contents_children = tree.children(contents);
    let needs_parens = !tree.is_syntax(contents, Syntax::Power)
        || contents_children.first().is_some_and(|&c| tree.is_name(c, "await"))
        || contents_children.iter().any(|&c| tree.is_token(c, TokenKind::DoubleStar));
    if needs_parens {
        tree.set_value(open, "(");
        tree.set_value(close, ")");
    }
}

/// `def f() -> (int):` becomes `def f() -> int:`; any other annotation gets
/// invisible parentheses so that it can be split like a right-hand side.
pub fn normalize_return_annotation(tree: &mut Tree, funcdef: NodeId) {
    let children = tree.children(funcdef).to_vec();
    let Some(arrow) = children.iter().position(|&c| tree.is_token(c, TokenKind::RArrow)) else {
        return;
    };
    let Some(&annotation) = children.get(arrow + 1) else {
        return;
    };
    let parenthesized = tree.is_syntax(annotation, Syntax::Atom)
        && tree
            .child(annotation, 0)
            .is_some_and(|c| tree.is_token(c, TokenKind::LPar));
    if !parenthesized || maybe_make_parens_invisible_in_atom(tree, annotation, funcdef, false) {
        wrap_in_parentheses(tree, funcdef, annotation, false);
    }
}

/// `((a))` becomes `(a)`.
pub fn remove_double_parens(tree: &mut Tree, atom: NodeId) {
    let children = tree.children(atom);
    if children.len() != 3 || !tree.is_leaf_value(children[0], TokenKind::LPar, "(") {
        return;
    }
    let middle = children[1];
    let nested = tree
        .child(middle, 0)
        .is_some_and(|c| tree.is_syntax(middle, Syntax::Atom) && tree.is_leaf_value(c, TokenKind::LPar, "("));
    if nested && maybe_make_parens_invisible_in_atom(tree, middle, atom, false) {
        wrap_in_parentheses(tree, atom, middle, false);
    }
}

/// Keep only the newlines of a leaf prefix, unless inside brackets or after
/// a backslash continuation, where nothing survives.
///
/// Comments in the prefix were already turned into leaves, so only the
/// text after the last comment counts.
pub fn normalize_prefix(tree: &mut Tree, leaf: NodeId, inside_brackets: bool) {
    let Some(data) = tree.leaf_mut(leaf) else {
        return;
    };
    let before_comments = data.prefix.split('#').next().unwrap_or("");
    if inside_brackets || before_comments.contains('\\') {
        data.prefix.clear();
        return;
    }
    let nl_count = match data.prefix.rsplit_once('#') {
        // The newline ending the comment line itself does not count.
        Some((_, tail)) => tail.matches('\n').count().saturating_sub(1),
        None => data.prefix.matches('\n').count(),
    };
    data.prefix = "\n".repeat(nl_count);
}

/// Reformat a docstring literal found at `depth` indentation levels.
///
/// Interior lines are reindented, trailing whitespace goes, and quotes get
/// padding where the body would otherwise run into them. The closing quotes
/// move to their own line when they would push a multiline docstring past
/// the line length.
pub fn format_docstring(literal: &str, depth: usize, mode: &Mode, remove_u_prefix: bool) -> String {
    let normalized;
    let literal = if mode.string_normalization {
        normalized = normalize_string_quotes(&normalize_string_prefix(literal, remove_u_prefix));
        normalized.as_str()
    } else {
        literal
    };
    let prefix = get_string_prefix(literal);
    let body = &literal[prefix.len()..];
    let Some(quote_char) = body.chars().next() else {
        return literal.to_string();
    };
    let quote_len = if has_triple_quotes(body) && body.len() >= 6 { 3 } else { 1 };
    if body.len() < 2 * quote_len {
        return literal.to_string();
    }
    let inner = &body[quote_len..body.len() - quote_len];
    let started_empty = inner.is_empty();

    let indent = "    ".repeat(depth);
    let mut docstring = if crate::strings::is_multiline_string(literal) {
        fix_docstring(inner, &indent)
    } else {
        inner.trim().to_string()
    };

    if !docstring.is_empty() {
        if docstring.starts_with(quote_char) {
            docstring.insert(0, ' ');
        }
        if docstring.ends_with(quote_char) {
            docstring.push(' ');
        }
        if docstring.ends_with('\\') {
            let backslashes = docstring.len() - docstring.trim_end_matches('\\').len();
            if backslashes % 2 == 1 {
                // An odd count would escape the closing quote.
                docstring.push(' ');
            }
        }
    } else if !started_empty {
        docstring = " ".to_string();
    }

    let quote = quote_char.to_string().repeat(quote_len);
    if quote_len == 3 {
        let lines: Vec<&str> = docstring.lines().collect();
        let last_line_length = lines.last().map_or(indent.len(), |l| l.chars().count());
        if lines.len() > 1 && last_line_length + quote_len > mode.line_length {
            return format!("{prefix}{quote}{docstring}\n{indent}{quote}");
        }
    }
    format!("{prefix}{quote}{docstring}{quote}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FormatConfig;
    use crate::parser::parse;
    use std::collections::BTreeSet;

    fn parsed(source: &str) -> Tree {
        parse(source, &BTreeSet::new()).unwrap()
    }

    fn first_statement(tree: &Tree) -> NodeId {
        let simple = tree.children(tree.root())[0];
        tree.children(simple)[0]
    }

    fn mode() -> Mode {
        Mode::from(&FormatConfig::default())
    }

    #[test]
    fn redundant_parens_become_invisible() {
        let mut tree = parsed("x = (1)\n");
        let stmt = first_statement(&tree);
        normalize_invisible_parens(&mut tree, stmt, &["="], &mode());
        assert_eq!(tree.to_source(), "x = 1\n");
    }

    #[test]
    fn one_tuple_keeps_parens() {
        let mut tree = parsed("a = (1,)\n");
        let stmt = first_statement(&tree);
        normalize_invisible_parens(&mut tree, stmt, &["="], &mode());
        assert_eq!(tree.to_source(), "a = (1,)\n");
    }

    #[test]
    fn walrus_keeps_parens_outside_conditions() {
        for (source, keyword) in [
            ("y = (x := 0)\n", "="),
            ("y += (x := 0)\n", "+="),
            ("return (x := 3)\n", "return"),
            ("assert (x := 1)\n", "assert"),
        ] {
            let mut tree = parsed(source);
            let stmt = first_statement(&tree);
            normalize_invisible_parens(&mut tree, stmt, &[keyword], &mode());
            assert_eq!(tree.to_source(), source);
        }

        let mut tree = parsed("if (n := 1):\n    pass\n");
        let stmt = tree.children(tree.root())[0];
        normalize_invisible_parens(&mut tree, stmt, &["if"], &mode());
        assert_eq!(tree.to_source(), "if n := 1:\n    pass\n");
    }

    #[test]
    fn bare_tuple_gets_invisible_parens() {
        let mut tree = parsed("return 1, 2\n");
        let stmt = first_statement(&tree);
        normalize_invisible_parens(&mut tree, stmt, &["return"], &mode());
        let value = tree.children(stmt)[1];
        assert!(is_atom_with_invisible_parens(&tree, value));
        assert_eq!(tree.to_source(), "return 1, 2\n");
    }

    #[test]
    fn del_drops_tuple_parens() {
        let mut tree = parsed("del (a, b)\n");
        let stmt = first_statement(&tree);
        normalize_invisible_parens(&mut tree, stmt, &["del"], &mode());
        assert_eq!(tree.to_source(), "del a, b\n");
    }

    #[test]
    fn import_from_parens() {
        let mut tree = parsed("from a import (b, c)\n");
        let stmt = first_statement(&tree);
        normalize_invisible_parens(&mut tree, stmt, &["import"], &mode());
        assert_eq!(tree.to_source(), "from a import b, c\n");
    }

    #[test]
    fn atom_priority() {
        let tree = parsed("(a, b)\n");
        let atom = first_statement(&tree);
        assert_eq!(max_delimiter_priority_in_atom(&tree, atom), COMMA_PRIORITY);
    }

    #[test]
    fn unary_power_is_parenthesized() {
        let mut tree = parsed("-2**8\n");
        let factor = first_statement(&tree);
        parenthesize_power_operand(&mut tree, factor);
        assert_eq!(tree.to_source(), "-(2**8)\n");
    }

    #[test]
    fn docstrings() {
        assert_eq!(format_docstring("'''   Hello.  '''", 1, &mode(), false), "\"\"\"Hello.\"\"\"");
        assert_eq!(
            format_docstring("\"\"\"\n      Indented.\n      \"\"\"", 1, &mode(), false),
            "\"\"\"\n    Indented.\n    \"\"\""
        );
        assert_eq!(format_docstring("'''\n\n   \n'''", 1, &mode(), false), "\"\"\" \"\"\"");
    }

    #[test]
    fn prefix_keeps_newlines_only() {
        let mut tree = parsed("x = 1\n\n\ny = 2\n");
        let y = tree.leaves(tree.root())[4];
        assert_eq!(tree.value(y), "y");
        normalize_prefix(&mut tree, y, false);
        assert_eq!(tree.prefix(y), "\n\n");
        normalize_prefix(&mut tree, y, true);
        assert_eq!(tree.prefix(y), "");
    }
}
