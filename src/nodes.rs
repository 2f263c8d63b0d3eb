//! Tree predicates shared by the passes and the line builder.
//!
//! Most functions here answer a question about the shape of the tree around
//! a node. [`whitespace`] is the odd one out: it decides how much space goes
//! in front of a leaf when it is appended to a line.

use crate::grammar::{Syntax, TokenKind};
use crate::tree::{NodeId, Tree};

const NO: &str = "";
const SPACE: &str = " ";
const DOUBLESPACE: &str = "  ";

/// Statement keywords after which a value may be wrapped in invisible parens.
pub const ASSIGNMENTS: [&str; 14] = [
    "=", ":=", "+=", "-=", "*=", "@=", "/=", "%=", "&=", "|=", "^=", "<<=", ">>=", "**=",
];

/// Parents in which a `*`, `**` or `/` leaf marks arguments rather than arithmetic.
pub fn is_varargs_parent(kind: Syntax) -> bool {
    matches!(
        kind,
        Syntax::Arglist | Syntax::Argument | Syntax::Trailer | Syntax::Typedargslist | Syntax::Varargslist
    )
}

/// Parents in which a `*` or `**` leaf unpacks into a collection.
pub fn is_unpacking_parent(kind: Syntax) -> bool {
    matches!(
        kind,
        Syntax::Atom
            | Syntax::Dictsetmaker
            | Syntax::Listmaker
            | Syntax::TestlistGexp
            | Syntax::TestlistStarExpr
    )
}

/// Productions whose presence makes a subscript "complex", so that its
/// slice colons get spaces around them.
fn is_test_descendant(kind: Syntax) -> bool {
    matches!(
        kind,
        Syntax::Test
            | Syntax::Lambdef
            | Syntax::OrTest
            | Syntax::AndTest
            | Syntax::NotTest
            | Syntax::Comparison
            | Syntax::StarExpr
            | Syntax::Expr
            | Syntax::XorExpr
            | Syntax::AndExpr
            | Syntax::ShiftExpr
            | Syntax::ArithExpr
            | Syntax::Trailer
            | Syntax::Term
            | Syntax::Power
    )
}

/// Binary and unary arithmetic operators, by token kind and spelling.
pub fn is_math_operator(kind: TokenKind, value: &str) -> bool {
    match kind {
        TokenKind::Star | TokenKind::DoubleStar | TokenKind::At => true,
        TokenKind::Op => matches!(
            value,
            "|" | "^" | "&" | "<<" | ">>" | "+" | "-" | "/" | "//" | "%" | "~"
        ),
        _ => false,
    }
}

/// Comparison operators spelled with punctuation.
pub fn is_comparator(kind: TokenKind, value: &str) -> bool {
    kind == TokenKind::Op && matches!(value, "<" | ">" | "==" | "!=" | "<=" | ">=" | "<>")
}

fn is_varargs_special(tree: &Tree, id: NodeId) -> bool {
    match tree.token(id) {
        Some(TokenKind::Star | TokenKind::DoubleStar) => true,
        Some(TokenKind::Op) => tree.value(id) == "/",
        _ => false,
    }
}

/// Whether `leaf` is a `*`, `**` or `/` used for argument packing or unpacking
/// inside one of the parents accepted by `within`.
///
/// A `star_expr` is looked through, since it also appears as an assignment
/// target in extended iterable unpacking.
pub fn is_vararg(tree: &Tree, leaf: NodeId, within: impl Fn(Syntax) -> bool) -> bool {
    if !is_varargs_special(tree, leaf) {
        return false;
    }
    let Some(mut parent) = tree.parent(leaf) else {
        return false;
    };
    if tree.is_syntax(parent, Syntax::StarExpr) {
        match tree.parent(parent) {
            Some(grandparent) => parent = grandparent,
            None => return false,
        }
    }
    tree.syntax(parent).is_some_and(within)
}

fn is_vararg_anywhere(tree: &Tree, leaf: NodeId) -> bool {
    is_vararg(tree, leaf, |kind| is_varargs_parent(kind) || is_unpacking_parent(kind))
}

/// Whitespace to put in front of `leaf` when it follows other leaves on a line.
///
/// `complex_subscript` tells whether the leaf sits inside a subscript whose
/// bounds are more than plain names or numbers; slice colons there are
/// treated like binary operators.
pub fn whitespace(tree: &Tree, leaf: NodeId, complex_subscript: bool) -> &'static str {
    let Some(data) = tree.leaf(leaf) else {
        return NO;
    };
    let t = data.kind;
    let v = data.value.as_str();
    if t.is_closing_bracket() || matches!(t, TokenKind::Comma | TokenKind::StandaloneComment) {
        return NO;
    }
    if t == TokenKind::Comment {
        return DOUBLESPACE;
    }
    let Some(p) = tree.parent(leaf) else {
        return NO;
    };
    let p_kind = tree.syntax(p);
    if t == TokenKind::Colon
        && !matches!(
            p_kind,
            Some(Syntax::Subscript | Syntax::Subscriptlist | Syntax::Sliceop)
        )
    {
        return NO;
    }

    let prev = tree.prev_sibling(leaf);
    match prev {
        None => {
            let Some(prevp) = tree.preceding_leaf(p) else {
                return NO;
            };
            let prevp_kind = tree.token(prevp);
            if prevp_kind.is_some_and(TokenKind::is_opening_bracket) {
                return NO;
            }
            if t == TokenKind::Colon {
                if prevp_kind == Some(TokenKind::Colon) {
                    return NO;
                }
                if prevp_kind != Some(TokenKind::Comma) && !complex_subscript {
                    return NO;
                }
                return SPACE;
            }
            let prevp_parent = tree.parent_syntax(prevp);
            let prevp_value = tree.value(prevp);
            if prevp_kind == Some(TokenKind::Equal) {
                match prevp_parent {
                    Some(Syntax::Arglist | Syntax::Argument | Syntax::Parameters | Syntax::Varargslist) => {
                        return NO;
                    }
                    Some(Syntax::Typedargslist) => return typed_default_space(tree, prevp),
                    _ => {}
                }
            } else if is_varargs_special(tree, prevp) {
                if is_vararg_anywhere(tree, prevp) {
                    return NO;
                }
            } else if prevp_kind == Some(TokenKind::Colon) {
                if matches!(prevp_parent, Some(Syntax::Subscript | Syntax::Sliceop)) {
                    return if complex_subscript { SPACE } else { NO };
                }
            } else if prevp_kind == Some(TokenKind::At) && tree.parent_syntax(p) == Some(Syntax::Decorator) {
                return NO;
            } else if prevp_kind.is_some_and(|kind| is_math_operator(kind, prevp_value))
                && matches!(prevp_parent, Some(Syntax::Factor | Syntax::StarExpr))
            {
                return NO;
            } else if prevp_value == ">>" && prevp_parent == Some(Syntax::PrintStmt) {
                // print chevron
                return NO;
            }
        }
        Some(prev) => {
            if tree.token(prev).is_some_and(TokenKind::is_opening_bracket) {
                return NO;
            }
        }
    }

    let prev_kind = prev.and_then(|id| tree.token(id));
    let Some(p_kind) = p_kind else {
        return SPACE;
    };
    match p_kind {
        Syntax::Parameters | Syntax::Arglist => {
            if prev_kind != Some(TokenKind::Comma) {
                return NO;
            }
        }
        Syntax::Varargslist => {
            if prev.is_some() && prev_kind != Some(TokenKind::Comma) {
                return NO;
            }
        }
        Syntax::Typedargslist => {
            let Some(prev) = prev else {
                return NO;
            };
            if t == TokenKind::Equal {
                if !tree.is_syntax(prev, Syntax::Tname) {
                    return NO;
                }
            } else if prev_kind == Some(TokenKind::Equal) {
                return typed_default_space(tree, prev);
            } else if prev_kind != Some(TokenKind::Comma) {
                return NO;
            }
        }
        Syntax::Tname => {
            if prev.is_none() {
                let prevp = tree.preceding_leaf(p);
                if prevp.is_none_or(|id| !tree.is_token(id, TokenKind::Comma)) {
                    return NO;
                }
            }
        }
        Syntax::Trailer => {
            if matches!(t, TokenKind::LPar | TokenKind::RPar) {
                return NO;
            }
            match prev {
                None => {
                    if matches!(t, TokenKind::Dot | TokenKind::LSqb) {
                        return NO;
                    }
                }
                Some(_) if prev_kind != Some(TokenKind::Comma) => return NO,
                Some(_) => {}
            }
        }
        Syntax::Argument => {
            if t == TokenKind::Equal {
                return NO;
            }
            match prev {
                None => {
                    let prevp = tree.preceding_leaf(p);
                    if prevp.is_none_or(|id| tree.is_token(id, TokenKind::LPar)) {
                        return NO;
                    }
                }
                Some(prev) => {
                    if prev_kind == Some(TokenKind::Equal) || is_varargs_special(tree, prev) {
                        return NO;
                    }
                }
            }
        }
        Syntax::Decorator => return NO,
        Syntax::Typeparams => {
            if t == TokenKind::LSqb {
                return NO;
            }
        }
        Syntax::Typevartuple | Syntax::Paramspec => {
            if matches!(prev_kind, Some(TokenKind::Star | TokenKind::DoubleStar)) {
                return NO;
            }
        }
        Syntax::ExceptClause => {
            if t == TokenKind::Star {
                return NO;
            }
        }
        Syntax::DottedName => {
            if prev.is_some() {
                return NO;
            }
            let prevp = tree.preceding_leaf(p);
            if prevp.is_none_or(|id| matches!(tree.token(id), Some(TokenKind::At | TokenKind::Dot))) {
                return NO;
            }
        }
        Syntax::Classdef => {
            if t == TokenKind::LPar || prev_kind == Some(TokenKind::LPar) {
                return NO;
            }
        }
        Syntax::Subscript | Syntax::Sliceop => match prev {
            None => {
                return if tree.parent_syntax(p) == Some(Syntax::Subscriptlist) {
                    SPACE
                } else {
                    NO
                };
            }
            Some(_) if !complex_subscript => return NO,
            Some(_) => {}
        },
        Syntax::Atom => {
            if prev.is_some() && t == TokenKind::Dot {
                return NO;
            }
        }
        Syntax::Dictsetmaker => {
            if prev_kind == Some(TokenKind::DoubleStar) {
                return NO;
            }
        }
        Syntax::Factor | Syntax::StarExpr => match prev {
            None => {
                let Some(prevp) = tree.preceding_leaf(p) else {
                    return NO;
                };
                let prevp_kind = tree.token(prevp);
                if prevp_kind.is_some_and(TokenKind::is_opening_bracket) {
                    return NO;
                }
                let prevp_parent = tree.parent_syntax(prevp);
                if prevp_kind == Some(TokenKind::Colon)
                    && matches!(prevp_parent, Some(Syntax::Subscript | Syntax::Sliceop))
                {
                    return NO;
                }
                if prevp_kind == Some(TokenKind::Equal) && prevp_parent == Some(Syntax::Argument) {
                    return NO;
                }
            }
            Some(_) => {
                if matches!(t, TokenKind::Name | TokenKind::Number | TokenKind::String) {
                    return NO;
                }
            }
        },
        Syntax::ImportFrom => {
            if t == TokenKind::Dot {
                if prev_kind == Some(TokenKind::Dot) {
                    return NO;
                }
            } else if t == TokenKind::Name {
                if v == "import" {
                    return SPACE;
                }
                if prev_kind == Some(TokenKind::Dot) {
                    return NO;
                }
            }
        }
        _ => {}
    }
    SPACE
}

/// Space around a parameter default: only annotated parameters get one.
fn typed_default_space(tree: &Tree, equal: NodeId) -> &'static str {
    match tree.prev_sibling(equal) {
        Some(name) if tree.is_syntax(name, Syntax::Tname) => SPACE,
        _ => NO,
    }
}

/// Whether a leaf under the subscript starting at `subscript_start` makes it complex.
pub fn is_complex_subscript_start(tree: &Tree, subscript_start: NodeId) -> bool {
    tree.pre_order(subscript_start)
        .into_iter()
        .any(|id| tree.syntax(id).is_some_and(is_test_descendant))
}

/// The child of `ancestor` that contains `descendant`.
pub fn child_towards(tree: &Tree, ancestor: NodeId, descendant: NodeId) -> Option<NodeId> {
    let mut node = descendant;
    loop {
        let parent = tree.parent(node)?;
        if parent == ancestor {
            return Some(node);
        }
        node = parent;
    }
}

/// `( wrapped )` with visible or invisible parens: returns `wrapped`.
pub fn unwrap_singleton_parenthesis(tree: &Tree, node: NodeId) -> Option<NodeId> {
    let children = tree.children(node);
    let [lpar, wrapped, rpar] = children else {
        return None;
    };
    if tree.is_token(*lpar, TokenKind::LPar) && tree.is_token(*rpar, TokenKind::RPar) {
        Some(*wrapped)
    } else {
        None
    }
}

/// `()`
pub fn is_empty_tuple(tree: &Tree, node: NodeId) -> bool {
    let children = tree.children(node);
    tree.is_syntax(node, Syntax::Atom)
        && children.len() == 2
        && tree.is_token(children[0], TokenKind::LPar)
        && tree.is_token(children[1], TokenKind::RPar)
}

/// A tuple with one element, with or without parentheses.
pub fn is_one_tuple(tree: &Tree, node: NodeId) -> bool {
    if tree.is_syntax(node, Syntax::Atom) {
        let Some(gexp) = unwrap_singleton_parenthesis(tree, node) else {
            return false;
        };
        if !tree.is_syntax(gexp, Syntax::TestlistGexp) {
            return false;
        }
        let children = tree.children(gexp);
        return children.len() == 2 && tree.is_token(children[1], TokenKind::Comma);
    }
    let implicit_tuple = matches!(
        tree.syntax(node),
        Some(Syntax::Testlist | Syntax::TestlistStarExpr | Syntax::Exprlist)
    );
    let children = tree.children(node);
    implicit_tuple && children.len() == 2 && tree.is_token(children[1], TokenKind::Comma)
}

/// `( target := value )`
pub fn is_walrus_assignment(tree: &Tree, node: NodeId) -> bool {
    unwrap_singleton_parenthesis(tree, node).is_some_and(|inner| tree.is_syntax(inner, Syntax::NamedexprTest))
}

/// A `yield` or `yield from`, possibly inside parentheses.
pub fn is_yield(tree: &Tree, node: NodeId) -> bool {
    if tree.is_syntax(node, Syntax::YieldExpr) || tree.is_name(node, "yield") {
        return true;
    }
    if !tree.is_syntax(node, Syntax::Atom) {
        return false;
    }
    unwrap_singleton_parenthesis(tree, node).is_some_and(|inner| is_yield(tree, inner))
}

/// An atom whose parentheses have been made invisible.
pub fn is_atom_with_invisible_parens(tree: &Tree, node: NodeId) -> bool {
    if !tree.is_syntax(node, Syntax::Atom) {
        return false;
    }
    let children = tree.children(node);
    let (Some(&first), Some(&last)) = (children.first(), children.last()) else {
        return false;
    };
    tree.is_leaf_value(first, TokenKind::LPar, "") && tree.is_leaf_value(last, TokenKind::RPar, "")
}

/// A string leaf spanning several lines.
pub fn is_multiline_string(tree: &Tree, leaf: NodeId) -> bool {
    tree.is_token(leaf, TokenKind::String) && crate::strings::has_triple_quotes(tree.value(leaf)) && tree.value(leaf).contains('\n')
}

/// The string leaf is the first statement of a module, class or function body.
pub fn is_docstring(tree: &Tree, leaf: NodeId) -> bool {
    if !tree.is_token(leaf, TokenKind::String) {
        return false;
    }
    let prefix = crate::strings::get_string_prefix(tree.value(leaf));
    if prefix.contains(['b', 'B', 'f', 'F']) {
        return false;
    }
    let Some(stmt) = tree.parent(leaf) else {
        return false;
    };
    if !tree.is_syntax(stmt, Syntax::SimpleStmt) || tree.index_in_parent(leaf) != Some(0) {
        return false;
    }
    let Some(container) = tree.parent(stmt) else {
        return false;
    };
    match tree.syntax(container) {
        Some(Syntax::FileInput) => tree.prev_sibling(stmt).is_none(),
        Some(Syntax::Suite) => {
            // NEWLINE INDENT stmt
            tree.index_in_parent(stmt) == Some(2)
                && tree.child(container, 1).is_some_and(|id| tree.is_token(id, TokenKind::Indent))
        }
        _ => false,
    }
}

/// A simple statement holding only `...`.
pub fn is_stub_body(tree: &Tree, node: NodeId) -> bool {
    if !tree.is_syntax(node, Syntax::SimpleStmt) {
        return false;
    }
    let children = tree.children(node);
    if children.len() != 2 {
        return false;
    }
    let child = children[0];
    let dots = tree.children(child);
    tree.prefix(child).trim().is_empty()
        && tree.is_syntax(child, Syntax::Atom)
        && dots.len() == 3
        && dots.iter().all(|&d| tree.is_leaf_value(d, TokenKind::Dot, "."))
}

/// An indented suite whose only statement is `...`, with no comments
/// around it that collapsing would lose.
pub fn is_stub_suite(tree: &Tree, node: NodeId) -> bool {
    let children = tree.children(node);
    if children.len() != 4
        || !tree.is_token(children[0], TokenKind::Newline)
        || !tree.is_token(children[1], TokenKind::Indent)
        || !tree.is_token(children[3], TokenKind::Dedent)
    {
        return false;
    }
    if !tree.prefix(children[0]).trim().is_empty() || !tree.prefix(children[3]).trim().is_empty() {
        return false;
    }
    is_stub_body(tree, children[2])
}

/// The leaf begins an `import` or `from ... import` statement.
pub fn is_import(tree: &Tree, leaf: NodeId) -> bool {
    let Some(data) = tree.leaf(leaf) else {
        return false;
    };
    if data.kind != TokenKind::Name {
        return false;
    }
    let p = tree.parent_syntax(leaf);
    (data.value == "import" && p == Some(Syntax::ImportName))
        || (data.value == "from" && p == Some(Syntax::ImportFrom))
}

/// `# type: ...` comments, which some tools read back.
pub fn is_type_comment(tree: &Tree, leaf: NodeId) -> bool {
    matches!(
        tree.token(leaf),
        Some(TokenKind::Comment | TokenKind::StandaloneComment)
    ) && tree.value(leaf).starts_with("# type:")
}

/// `name`, `dotted.name` or either followed by a single call.
pub fn is_simple_decorator_expression(tree: &Tree, expr: NodeId) -> bool {
    if tree.is_token(expr, TokenKind::Name) {
        return true;
    }
    if tree.is_syntax(expr, Syntax::DottedName) {
        return true;
    }
    if !tree.is_syntax(expr, Syntax::Power) {
        return false;
    }
    let children = tree.children(expr);
    let Some((&head, trailers)) = children.split_first() else {
        return false;
    };
    if !tree.is_token(head, TokenKind::Name) {
        return false;
    }
    let count = trailers.len();
    trailers.iter().enumerate().all(|(i, &trailer)| {
        if !tree.is_syntax(trailer, Syntax::Trailer) {
            return false;
        }
        match tree.child(trailer, 0).and_then(|open| tree.token(open)) {
            Some(TokenKind::Dot) => true,
            Some(TokenKind::LPar) => i + 1 == count,
            _ => false,
        }
    })
}

/// Whether `node` sits directly in a parent of one of `kinds`.
pub fn has_parent(tree: &Tree, node: NodeId, kinds: &[Syntax]) -> bool {
    tree.parent_syntax(node).is_some_and(|p| kinds.contains(&p))
}

/// Number of indented suites enclosing `node`.
pub fn suite_depth(tree: &Tree, node: NodeId) -> usize {
    tree.ancestors(node)
        .filter(|&a| tree.is_syntax(a, Syntax::Suite))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use std::collections::BTreeSet;

    fn tree(source: &str) -> Tree {
        parse(source, &BTreeSet::new()).unwrap()
    }

    fn find(tree: &Tree, value: &str, nth: usize) -> NodeId {
        tree.leaves(tree.root())
            .into_iter()
            .filter(|&l| tree.value(l) == value)
            .nth(nth)
            .unwrap()
    }

    fn first_expr(tree: &Tree) -> NodeId {
        let stmt = tree.children(tree.root())[0];
        tree.children(stmt)[0]
    }

    #[test]
    fn spaces_around_binary_operators() {
        let t = tree("x = a + b\n");
        assert_eq!(whitespace(&t, find(&t, "=", 0), false), " ");
        assert_eq!(whitespace(&t, find(&t, "+", 0), false), " ");
        assert_eq!(whitespace(&t, find(&t, "b", 0), false), " ");
    }

    #[test]
    fn no_space_in_calls_and_attributes() {
        let t = tree("f(a, b=1).c[0]\n");
        assert_eq!(whitespace(&t, find(&t, "(", 0), false), "");
        assert_eq!(whitespace(&t, find(&t, "a", 0), false), "");
        assert_eq!(whitespace(&t, find(&t, ",", 0), false), "");
        assert_eq!(whitespace(&t, find(&t, "b", 0), false), " ");
        assert_eq!(whitespace(&t, find(&t, "=", 0), false), "");
        assert_eq!(whitespace(&t, find(&t, "1", 0), false), "");
        assert_eq!(whitespace(&t, find(&t, ".", 0), false), "");
        assert_eq!(whitespace(&t, find(&t, "c", 0), false), "");
        assert_eq!(whitespace(&t, find(&t, "[", 0), false), "");
    }

    #[test]
    fn defaults_spaced_only_when_annotated() {
        let t = tree("def f(a=1, b: int = 2, *args, **kw): pass\n");
        assert_eq!(whitespace(&t, find(&t, "=", 0), false), "");
        assert_eq!(whitespace(&t, find(&t, "1", 0), false), "");
        assert_eq!(whitespace(&t, find(&t, "=", 1), false), " ");
        assert_eq!(whitespace(&t, find(&t, "2", 0), false), " ");
        assert_eq!(whitespace(&t, find(&t, "args", 0), false), "");
        assert_eq!(whitespace(&t, find(&t, "kw", 0), false), "");
        assert_eq!(whitespace(&t, find(&t, ":", 0), false), "");
    }

    #[test]
    fn unary_operators_hug_operand() {
        let t = tree("x = -a\ny = [*b]\nprint(not c)\n");
        assert_eq!(whitespace(&t, find(&t, "-", 0), false), " ");
        assert_eq!(whitespace(&t, find(&t, "a", 0), false), "");
        assert_eq!(whitespace(&t, find(&t, "b", 0), false), "");
        assert_eq!(whitespace(&t, find(&t, "c", 0), false), " ");
    }

    #[test]
    fn slices_depend_on_complexity() {
        let t = tree("x[a:b]\ny[a + 1 :]\n");
        assert_eq!(whitespace(&t, find(&t, ":", 0), false), "");
        assert_eq!(whitespace(&t, find(&t, "b", 0), false), "");
        assert_eq!(whitespace(&t, find(&t, ":", 1), true), " ");
    }

    #[test]
    fn import_from_dots() {
        let t = tree("from ..a import b\n");
        assert_eq!(whitespace(&t, find(&t, ".", 0), false), " ");
        assert_eq!(whitespace(&t, find(&t, ".", 1), false), "");
        assert_eq!(whitespace(&t, find(&t, "a", 0), false), "");
        assert_eq!(whitespace(&t, find(&t, "import", 0), false), " ");
    }

    #[test]
    fn decorator_has_no_inner_spaces() {
        let t = tree("@a.b(c)\ndef f(): pass\n");
        assert_eq!(whitespace(&t, find(&t, "a", 0), false), "");
        assert_eq!(whitespace(&t, find(&t, "b", 0), false), "");
    }

    #[test]
    fn comments_get_two_spaces() {
        let mut t = tree("x\n");
        let comment = t.new_leaf(TokenKind::Comment, "# c", "", (0, 0));
        assert_eq!(whitespace(&t, comment, false), "  ");
    }

    #[test]
    fn tuple_shapes() {
        let t = tree("(1,)\n");
        assert!(is_one_tuple(&t, first_expr(&t)));
        let t = tree("()\n");
        assert!(is_empty_tuple(&t, first_expr(&t)));
        let t = tree("(1, 2)\n");
        assert!(!is_one_tuple(&t, first_expr(&t)));
        let t = tree("(x := 1)\n");
        assert!(is_walrus_assignment(&t, first_expr(&t)));
    }

    #[test]
    fn docstring_positions() {
        let t = tree("'''doc'''\nx = 'no'\ndef f():\n    'fdoc'\n    'other'\n");
        assert!(is_docstring(&t, find(&t, "'''doc'''", 0)));
        assert!(!is_docstring(&t, find(&t, "'no'", 0)));
        assert!(is_docstring(&t, find(&t, "'fdoc'", 0)));
        assert!(!is_docstring(&t, find(&t, "'other'", 0)));
    }

    #[test]
    fn stub_suites() {
        let t = tree("def f():\n    ...\n");
        let def = t.children(t.root())[0];
        let suite = *t.children(def).last().unwrap();
        assert!(is_stub_suite(&t, suite));
        assert_eq!(suite_depth(&t, find(&t, ".", 0)), 1);
    }

    #[test]
    fn decorator_expressions() {
        let t = tree("@a.b(c)\ndef f(): pass\n@a[0]\ndef g(): pass\n");
        let decorators: Vec<_> = t
            .pre_order(t.root())
            .into_iter()
            .filter(|&id| t.is_syntax(id, Syntax::Decorator))
            .collect();
        assert!(is_simple_decorator_expression(&t, t.children(decorators[0])[1]));
        assert!(!is_simple_decorator_expression(&t, t.children(decorators[1])[1]));
    }
}
