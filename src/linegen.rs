//! Walks the tree and cuts it into logical lines.
//!
//! Every statement becomes one [`Line`]; compound statements yield their
//! header and then the lines of their body one level deeper. Tree rewrites
//! from [`crate::normalize`] run on each statement right before its leaves
//! are copied out, so lines always see the normalized shape.

use crate::comments::generate_comments;
use crate::grammar::{NodeKind, Syntax, TokenKind};
use crate::lines::{Line, LineLeaf, Mode};
use crate::nodes::{ASSIGNMENTS, is_docstring, is_stub_body, is_stub_suite};
use crate::normalize::{
    format_docstring, normalize_invisible_parens, normalize_prefix, normalize_return_annotation,
    parenthesize_number_attribute, parenthesize_power_operand, remove_await_parens, remove_double_parens,
    wrap_in_parentheses,
};
use crate::strings::{
    normalize_numeric_literal, normalize_string_prefix, normalize_string_quotes, normalize_unicode_escape_sequences,
};
use crate::tree::{NodeId, Tree};
use log::trace;
use once_cell::sync::Lazy;
use regex::Regex;

static BACKSLASH_NEWLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\\s*\n").unwrap_or_else(|e| panic!("{e}")));

/// Keywords that start a new line and keywords after which the child gets
/// invisible parentheses, per statement kind.
fn statement_rules(kind: Syntax) -> Option<(&'static [&'static str], &'static [&'static str])> {
    let rules: (&[&str], &[&str]) = match kind {
        Syntax::AssertStmt => (&["assert"], &["assert", ","]),
        Syntax::IfStmt => (&["if", "else", "elif"], &["if", "elif"]),
        Syntax::WhileStmt => (&["while", "else"], &["while"]),
        Syntax::ForStmt => (&["for", "else"], &["for", "in"]),
        Syntax::TryStmt => (&["try", "except", "else", "finally"], &[]),
        Syntax::ExceptClause => (&["except"], &["except", "*"]),
        Syntax::WithStmt => (&["with"], &["with"]),
        Syntax::Classdef => (&["class"], &[]),
        Syntax::ExprStmt => (&[], &ASSIGNMENTS),
        Syntax::ReturnStmt => (&["return"], &["return"]),
        Syntax::ImportFrom => (&[], &["import"]),
        Syntax::DelStmt => (&["del"], &["del"]),
        Syntax::MatchStmt => (&["match"], &["match"]),
        Syntax::CaseBlock => (&["case"], &["case"]),
        _ => return None,
    };
    Some(rules)
}

/// Produces the logical lines of a module.
pub struct LineGenerator<'t> {
    tree: &'t mut Tree,
    mode: Mode,
    remove_u_prefix: bool,
    current_line: Line,
    lines: Vec<Line>,
}

impl<'t> LineGenerator<'t> {
    pub fn new(tree: &'t mut Tree, mode: Mode, remove_u_prefix: bool) -> Self {
        LineGenerator {
            tree,
            mode,
            remove_u_prefix,
            current_line: Line::new(mode, 0, false),
            lines: Vec::new(),
        }
    }

    /// Visit the whole tree and return its lines in order.
    pub fn generate(mut self) -> Vec<Line> {
        let root = self.tree.root();
        self.visit(root);
        self.line(0);
        self.lines
    }

    /// Close the current line and start a new one `indent` levels away.
    ///
    /// An empty current line only has its depth adjusted.
    fn line(&mut self, indent: isize) {
        if self.current_line.is_empty() {
            self.current_line.depth = self.current_line.depth.saturating_add_signed(indent);
            return;
        }
        if let [only] = self.current_line.leaves.as_slice()
            && self.is_async_keyword(only.id)
        {
            // `async` waits for the `def`, `for` or `with` it belongs to.
            return;
        }
        let depth = self.current_line.depth.saturating_add_signed(indent);
        let complete = std::mem::replace(&mut self.current_line, Line::new(self.mode, depth, false));
        self.lines.push(complete);
    }

    fn is_async_keyword(&self, leaf: NodeId) -> bool {
        self.tree.is_name(leaf, "async")
            && self
                .tree
                .parent_syntax(leaf)
                .is_some_and(|p| matches!(p, Syntax::AsyncStmt | Syntax::AsyncFuncdef))
    }

    fn visit(&mut self, node: NodeId) {
        match self.tree.kind(node) {
            NodeKind::Token(kind) => match kind {
                TokenKind::Indent => {
                    self.line(1);
                    self.visit_default(node);
                }
                TokenKind::Dedent => {
                    // Comments in the prefix of a dedent still belong to the block.
                    self.visit_default(node);
                    self.line(0);
                    self.line(-1);
                }
                TokenKind::Semi => self.line(0),
                TokenKind::EndMarker => {
                    self.visit_default(node);
                    self.line(0);
                }
                TokenKind::StandaloneComment => {
                    if !self.current_line.bracket_tracker.any_open_brackets() {
                        self.line(0);
                    }
                    self.visit_default(node);
                }
                TokenKind::String => self.visit_string(node),
                _ => self.visit_default(node),
            },
            NodeKind::Syntax(kind) => match kind {
                Syntax::Suite => self.visit_suite(node),
                Syntax::SimpleStmt => self.visit_simple_stmt(node),
                Syntax::AsyncStmt | Syntax::AsyncFuncdef => self.visit_async_stmt(node),
                Syntax::Decorated | Syntax::Decorators => self.visit_decorators(node),
                Syntax::Power => {
                    parenthesize_number_attribute(self.tree, node);
                    remove_await_parens(self.tree, node);
                    self.visit_default(node);
                }
                Syntax::Funcdef => {
                    normalize_return_annotation(self.tree, node);
                    self.visit_stmt(node, &["def"], &[]);
                }
                Syntax::Factor => {
                    parenthesize_power_operand(self.tree, node);
                    self.visit_default(node);
                }
                Syntax::Atom => {
                    remove_double_parens(self.tree, node);
                    self.visit_default(node);
                }
                _ => match statement_rules(kind) {
                    Some((keywords, parens)) => self.visit_stmt(node, keywords, parens),
                    None => self.visit_default(node),
                },
            },
        }
    }

    fn visit_children(&mut self, node: NodeId) {
        // Children may be rewrapped while visiting, so walk by index.
        let mut index = 0;
        while let Some(child) = self.tree.child(node, index) {
            self.visit(child);
            index += 1;
        }
    }

    fn visit_default(&mut self, node: NodeId) {
        if !self.tree.is_leaf(node) {
            self.visit_children(node);
            return;
        }

        let any_open_brackets = self.current_line.bracket_tracker.any_open_brackets();
        for comment in generate_comments(self.tree, node) {
            let Some(comment) = LineLeaf::from_tree(self.tree, comment) else {
                continue;
            };
            if any_open_brackets {
                // Comments inside brackets are subject to splitting.
                self.current_line.append(self.tree, comment, false, false);
            } else if comment.kind == TokenKind::Comment {
                self.current_line.append(self.tree, comment, false, false);
                self.line(0);
            } else {
                self.line(0);
                self.current_line.append(self.tree, comment, false, false);
                self.line(0);
            }
        }
        normalize_prefix(self.tree, node, any_open_brackets);

        let kind = self.tree.token(node);
        if kind == Some(TokenKind::String) && self.mode.string_normalization {
            let value = normalize_string_prefix(self.tree.value(node), self.remove_u_prefix);
            self.tree.set_value(node, normalize_string_quotes(&value));
        }
        if kind == Some(TokenKind::Number) {
            let value = normalize_numeric_literal(self.tree.value(node));
            self.tree.set_value(node, value);
        }
        if kind.is_some_and(|k| !k.is_whitespace())
            && let Some(leaf) = LineLeaf::from_tree(self.tree, node)
        {
            self.current_line.append(self.tree, leaf, false, false);
        }
    }

    fn visit_stmt(&mut self, node: NodeId, keywords: &[&str], parens: &[&str]) {
        normalize_invisible_parens(self.tree, node, parens, &self.mode);
        let mut index = 0;
        while let Some(child) = self.tree.child(node, index) {
            if self.tree.token(child) == Some(TokenKind::Name) && keywords.contains(&self.tree.value(child)) {
                self.line(0);
            }
            self.visit(child);
            index += 1;
        }
    }

    fn visit_suite(&mut self, node: NodeId) {
        if self.mode.is_pyi
            && is_stub_suite(self.tree, node)
            && let Some(body) = self.tree.child(node, 2)
        {
            self.visit(body);
        } else {
            self.visit_default(node);
        }
    }

    /// A statement without nested statements.
    fn visit_simple_stmt(&mut self, node: NodeId) {
        let mut previous: Option<TokenKind> = None;
        let mut first = true;
        for child in self.tree.children(node).to_vec() {
            let arith_like = matches!(
                self.tree.syntax(child),
                Some(Syntax::ArithExpr | Syntax::ShiftExpr | Syntax::XorExpr | Syntax::AndExpr)
            );
            if (first || previous == Some(TokenKind::Semi)) && arith_like {
                wrap_in_parentheses(self.tree, node, child, false);
            }
            previous = self.tree.token(child);
            first = false;
        }

        let parent = self.tree.parent(node);
        let is_suite_like = parent
            .and_then(|p| self.tree.syntax(p))
            .is_some_and(Syntax::is_compound_statement);
        if is_suite_like {
            if self.mode.is_pyi && is_stub_body(self.tree, node) {
                self.visit_default(node);
            } else {
                self.line(1);
                self.visit_default(node);
                self.line(-1);
            }
        } else {
            if !self.mode.is_pyi || !parent.is_some_and(|p| is_stub_suite(self.tree, p)) {
                self.line(0);
            }
            self.visit_default(node);
        }
    }

    fn visit_async_stmt(&mut self, node: NodeId) {
        self.line(0);
        self.visit_children(node);
    }

    fn visit_decorators(&mut self, node: NodeId) {
        let mut index = 0;
        while let Some(child) = self.tree.child(node, index) {
            self.line(0);
            self.visit(child);
            index += 1;
        }
    }

    fn visit_string(&mut self, leaf: NodeId) {
        if self.mode.hex_codes_in_unicode_sequences {
            let value = normalize_unicode_escape_sequences(self.tree.value(leaf));
            self.tree.set_value(leaf, value);
        }
        if is_docstring(self.tree, leaf) && !BACKSLASH_NEWLINE.is_match(self.tree.value(leaf)) {
            let value = format_docstring(
                self.tree.value(leaf),
                self.current_line.depth,
                &self.mode,
                self.remove_u_prefix,
            );
            trace!("docstring at line {} normalized", self.tree.line(leaf));
            self.tree.set_value(leaf, value);
        }
        self.visit_default(leaf);
    }
}

/// Logical lines of `tree`, applying the per-statement rewrites on the way.
pub fn generate_lines(tree: &mut Tree, mode: Mode, remove_u_prefix: bool) -> Vec<Line> {
    LineGenerator::new(tree, mode, remove_u_prefix).generate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FormatConfig;
    use crate::parser::parse;
    use std::collections::BTreeSet;

    fn rendered(source: &str) -> Vec<String> {
        let mut tree = parse(source, &BTreeSet::new()).unwrap();
        let mode = Mode::from(&FormatConfig::default());
        generate_lines(&mut tree, mode, false)
            .iter()
            .map(|line| line.to_string().trim_start_matches('\n').to_string())
            .collect()
    }

    fn rendered_pyi(source: &str) -> Vec<String> {
        let mut tree = parse(source, &BTreeSet::new()).unwrap();
        let mode = Mode::from(&FormatConfig::default().with_pyi(true));
        generate_lines(&mut tree, mode, false)
            .iter()
            .map(|line| line.to_string().trim_start_matches('\n').to_string())
            .collect()
    }

    #[test]
    fn one_line_per_statement() {
        assert_eq!(rendered("x=1;y  =  2\n"), ["x = 1\n", "y = 2\n"]);
    }

    #[test]
    fn compound_statement_bodies_are_indented() {
        assert_eq!(
            rendered("if x:\n  pass\nelse:\n  y = 1\n"),
            ["if x:\n", "    pass\n", "else:\n", "    y = 1\n"]
        );
    }

    #[test]
    fn same_line_body_moves_down() {
        assert_eq!(rendered("def f(a,b): return a\n"), ["def f(a, b):\n", "    return a\n"]);
    }

    #[test]
    fn comments_trail_or_stand_alone() {
        assert_eq!(
            rendered("#lead\nx = 1 # trail\n"),
            ["# lead\n", "x = 1  # trail\n"]
        );
    }

    #[test]
    fn comment_closing_a_block_keeps_its_own_line() {
        assert_eq!(
            rendered("if x:\n    y = 1\n    # end\nz = 2\n"),
            ["if x:\n", "    y = 1\n", "    # end\n", "z = 2\n"]
        );
    }

    #[test]
    fn stub_body_under_commented_header_is_kept() {
        assert_eq!(
            rendered_pyi("class x:  # some comment\n    ...\n"),
            ["class x:  # some comment\n", "    ...\n"]
        );
        assert_eq!(
            rendered_pyi("def f():  # type: ignore\n    ...\n"),
            ["def f():  # type: ignore\n", "    ...\n"]
        );
        assert_eq!(
            rendered_pyi("def h():\n    ...\n    # bye\n"),
            ["def h():\n", "    ...\n", "    # bye\n"]
        );
    }

    #[test]
    fn async_keyword_stays_with_def() {
        assert_eq!(
            rendered("async def f():\n    await x\n"),
            ["async def f():\n", "    await x\n"]
        );
    }

    #[test]
    fn decorators_get_their_own_lines() {
        assert_eq!(
            rendered("@dec\ndef f(): pass\n"),
            ["@dec\n", "def f():\n", "    pass\n"]
        );
    }

    #[test]
    fn strings_and_numbers_are_normalized() {
        assert_eq!(rendered("x = 'a' + 0XFF\n"), ["x = \"a\" + 0xFF\n"]);
    }

    #[test]
    fn docstring_is_reindented() {
        assert_eq!(
            rendered("def f():\n  '''  Doc.  '''\n"),
            ["def f():\n", "    \"\"\"Doc.\"\"\"\n"]
        );
    }

    #[test]
    fn await_parens_go_unless_precedence_needs_them() {
        assert_eq!(
            rendered("async def f():\n    await (a.b())\n    await ((c))\n    await (-x)\n    await (a + b)\n"),
            [
                "async def f():\n",
                "    await a.b()\n",
                "    await c\n",
                "    await (-x)\n",
                "    await (a + b)\n"
            ]
        );
    }

    #[test]
    fn return_annotation_parens_go() {
        assert_eq!(rendered("def f() -> (int):\n    pass\n"), ["def f() -> int:\n", "    pass\n"]);
        assert_eq!(rendered("def f() -> (a, b):\n    pass\n")[0], "def f() -> (a, b):\n");
    }

    #[test]
    fn redundant_parens_disappear() {
        assert_eq!(rendered("print((1))\nx = (y)\n"), ["print((1))\n", "x = y\n"]);
    }
}
