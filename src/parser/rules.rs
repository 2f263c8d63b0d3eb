//! Recursive-descent grammar rules.
//!
//! One method per production. Productions build their node through
//! [`Parser::node`], which drops single-child wrappers so the tree keeps the
//! shape the rest of the crate expects (a bare name is a leaf, `a + b` is an
//! `arith_expr`, `(a)` is an `atom`).

use super::GrammarVariant;
use crate::grammar::{Syntax, TokenKind};
use crate::tokenizer::Token;
use crate::tree::{NodeId, Tree};

/// Where and why a grammar variant gave up.
#[derive(Debug, Clone)]
pub(super) struct Failure {
    /// Index of the offending token.
    pub pos: usize,
    pub message: String,
}

type PResult<T = NodeId> = Result<T, Failure>;

const KEYWORDS: [&str; 30] = [
    "and", "as", "assert", "break", "class", "continue", "def", "del", "elif", "else", "except",
    "finally", "for", "from", "global", "if", "import", "in", "is", "lambda", "nonlocal", "not",
    "or", "pass", "raise", "return", "try", "while", "with", "yield",
];

const AUGASSIGN: [&str; 13] = [
    "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "<<=", ">>=", "**=", "//=", "@=",
];

const COMPARISON_OPS: [&str; 7] = ["<", ">", "==", ">=", "<=", "!=", "<>"];

pub(super) struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    tree: Tree,
    variant: GrammarVariant,
    async_depth: usize,
    /// Inside the patterns of a `case` block, where `as` binds any item.
    in_pattern: bool,
}

impl<'t> Parser<'t> {
    pub(super) fn new(tokens: &'t [Token], variant: GrammarVariant) -> Self {
        Self {
            tokens,
            pos: 0,
            tree: Tree::new(),
            variant,
            async_depth: 0,
            in_pattern: false,
        }
    }

    pub(super) fn parse_file(mut self) -> PResult<Tree> {
        let root = self.file_input()?;
        self.tree.set_root(root);
        Ok(self.tree)
    }

    // ----- token helpers -------------------------------------------------

    fn peek_at(&self, offset: usize) -> &'t Token {
        let tokens = self.tokens;
        let index = (self.pos + offset).min(tokens.len().saturating_sub(1));
        &tokens[index]
    }

    fn peek(&self) -> &'t Token {
        self.peek_at(0)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    /// Current token is an operator spelled `op`.
    fn at_op(&self, op: &str) -> bool {
        let tok = self.peek();
        !matches!(tok.kind, TokenKind::Name | TokenKind::String | TokenKind::Number) && tok.value == op
    }

    fn at_any_op(&self, ops: &[&str]) -> bool {
        ops.iter().any(|op| self.at_op(op))
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        self.keyword_at(0, keyword)
    }

    fn keyword_at(&self, offset: usize, keyword: &str) -> bool {
        let tok = self.peek_at(offset);
        tok.kind == TokenKind::Name && tok.value == keyword && self.is_reserved_at(offset)
    }

    /// Whether the name at `offset` is a keyword under the active grammar variant.
    fn is_reserved_at(&self, offset: usize) -> bool {
        let tok = self.peek_at(offset);
        if tok.kind != TokenKind::Name {
            return false;
        }
        let word = tok.value.as_str();
        if KEYWORDS.contains(&word) {
            return true;
        }
        match (word, self.variant) {
            ("print" | "exec", GrammarVariant::Python2) => true,
            ("async" | "await", GrammarVariant::AsyncKeywords) => true,
            ("async", GrammarVariant::AsyncIdentifiers) => {
                let next = self.peek_at(offset + 1);
                next.kind == TokenKind::Name
                    && (next.value == "def"
                        || (self.async_depth > 0 && matches!(next.value.as_str(), "for" | "with")))
            }
            ("await", GrammarVariant::AsyncIdentifiers) => self.async_depth > 0,
            _ => false,
        }
    }

    fn fail(&self, message: impl Into<String>) -> Failure {
        Failure {
            pos: self.pos,
            message: message.into(),
        }
    }

    fn unexpected(&self, expected: &str) -> Failure {
        let tok = self.peek();
        let found = match tok.kind {
            TokenKind::EndMarker => "end of file".to_string(),
            TokenKind::Newline => "end of line".to_string(),
            TokenKind::Indent => "unexpected indent".to_string(),
            TokenKind::Dedent => "dedent".to_string(),
            _ => format!("{:?}", tok.value),
        };
        self.fail(format!("expected {expected}, found {found}"))
    }

    fn bump(&mut self) -> NodeId {
        let tok = self.peek();
        let id = self
            .tree
            .new_leaf(tok.kind, tok.value.clone(), tok.prefix.clone(), tok.start);
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        id
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> PResult {
        if self.at(kind) {
            Ok(self.bump())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> PResult {
        if self.at_keyword(keyword) {
            Ok(self.bump())
        } else {
            Err(self.unexpected(&format!("'{keyword}'")))
        }
    }

    fn expect_name(&mut self) -> PResult {
        if self.at(TokenKind::Name) && !self.is_reserved_at(0) {
            Ok(self.bump())
        } else {
            Err(self.unexpected("a name"))
        }
    }

    fn node(&mut self, kind: Syntax, children: Vec<NodeId>) -> NodeId {
        if children.len() == 1 {
            children[0]
        } else {
            self.tree.new_node(kind, children)
        }
    }

    /// Whether the current token can begin an expression or list item.
    fn starts_item(&self) -> bool {
        let tok = self.peek();
        match tok.kind {
            TokenKind::Number
            | TokenKind::String
            | TokenKind::LPar
            | TokenKind::LSqb
            | TokenKind::LBrace
            | TokenKind::Star
            | TokenKind::DoubleStar
            | TokenKind::Dot => true,
            TokenKind::Op => matches!(tok.value.as_str(), "-" | "+" | "~"),
            TokenKind::Name => {
                !self.is_reserved_at(0)
                    || matches!(tok.value.as_str(), "not" | "lambda" | "await")
            }
            _ => false,
        }
    }

    fn comma_list(&mut self, kind: Syntax, item: fn(&mut Self) -> PResult) -> PResult {
        let mut children = vec![item(self)?];
        while self.at(TokenKind::Comma) {
            children.push(self.bump());
            if !self.starts_item() {
                break;
            }
            children.push(item(self)?);
        }
        Ok(self.node(kind, children))
    }

    // ----- statements ----------------------------------------------------

    fn file_input(&mut self) -> PResult {
        let mut children = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::EndMarker => {
                    children.push(self.bump());
                    break;
                }
                TokenKind::Newline => children.push(self.bump()),
                _ => children.push(self.stmt()?),
            }
        }
        Ok(self.tree.new_node(Syntax::FileInput, children))
    }

    fn stmt(&mut self) -> PResult {
        let tok = self.peek();
        match tok.kind {
            TokenKind::At => return self.decorated(),
            TokenKind::Indent => return Err(self.fail("unexpected indent")),
            TokenKind::Name => match tok.value.as_str() {
                "if" => return self.if_stmt(),
                "while" => return self.while_stmt(),
                "for" => return self.for_stmt(),
                "try" => return self.try_stmt(),
                "with" => return self.with_stmt(),
                "def" => return self.funcdef(),
                "class" => return self.classdef(),
                "async" if self.is_reserved_at(0) => return self.async_stmt(),
                "match" if self.variant != GrammarVariant::Python2 => {
                    let (pos, len) = (self.pos, self.tree.len());
                    if let Some(header) = self.match_header() {
                        return self.match_stmt(header);
                    }
                    self.pos = pos;
                    self.tree.truncate(len);
                }
                _ => {}
            },
            _ => {}
        }
        self.simple_stmt()
    }

    fn simple_stmt(&mut self) -> PResult {
        let mut children = vec![self.small_stmt()?];
        while self.at(TokenKind::Semi) {
            children.push(self.bump());
            if self.at(TokenKind::Newline) {
                break;
            }
            children.push(self.small_stmt()?);
        }
        children.push(self.expect(TokenKind::Newline, "end of line")?);
        Ok(self.tree.new_node(Syntax::SimpleStmt, children))
    }

    fn small_stmt(&mut self) -> PResult {
        let tok = self.peek();
        if tok.kind == TokenKind::Name && self.is_reserved_at(0) {
            match tok.value.as_str() {
                "pass" | "break" | "continue" => return Ok(self.bump()),
                "del" => {
                    let kw = self.bump();
                    let targets = self.exprlist()?;
                    return Ok(self.node(Syntax::DelStmt, vec![kw, targets]));
                }
                "return" => {
                    let mut children = vec![self.bump()];
                    if self.starts_item() {
                        children.push(self.testlist_star_expr()?);
                    }
                    return Ok(self.node(Syntax::ReturnStmt, children));
                }
                "raise" => return self.raise_stmt(),
                "global" | "nonlocal" => {
                    let mut children = vec![self.bump(), self.expect_name()?];
                    while self.at(TokenKind::Comma) {
                        children.push(self.bump());
                        children.push(self.expect_name()?);
                    }
                    return Ok(self.node(Syntax::GlobalStmt, children));
                }
                "import" => return self.import_name(),
                "from" => return self.import_from(),
                "assert" => {
                    let mut children = vec![self.bump(), self.test()?];
                    if self.at(TokenKind::Comma) {
                        children.push(self.bump());
                        children.push(self.test()?);
                    }
                    return Ok(self.node(Syntax::AssertStmt, children));
                }
                "yield" => return self.yield_expr(),
                "print" => return self.print_stmt(),
                "exec" => return self.exec_stmt(),
                _ => {}
            }
        }
        if tok.kind == TokenKind::Name
            && tok.value == "type"
            && self.variant != GrammarVariant::Python2
            && self.peek_at(1).kind == TokenKind::Name
            && !self.is_reserved_at(1)
        {
            return self.type_stmt();
        }
        self.expr_stmt()
    }

    fn expr_stmt(&mut self) -> PResult {
        let mut children = vec![self.testlist_star_expr()?];
        if self.at(TokenKind::Colon) {
            let mut ann = vec![self.bump(), self.test()?];
            if self.at(TokenKind::Equal) {
                ann.push(self.bump());
                ann.push(self.yield_or_testlist_star_expr()?);
            }
            let annassign = self.tree.new_node(Syntax::Annassign, ann);
            children.push(annassign);
        } else if self.at(TokenKind::Op) && self.at_any_op(&AUGASSIGN) {
            children.push(self.bump());
            children.push(self.yield_or_testlist_star_expr()?);
        } else {
            while self.at(TokenKind::Equal) {
                children.push(self.bump());
                children.push(self.yield_or_testlist_star_expr()?);
            }
        }
        Ok(self.node(Syntax::ExprStmt, children))
    }

    fn yield_or_testlist_star_expr(&mut self) -> PResult {
        if self.at_keyword("yield") {
            self.yield_expr()
        } else {
            self.testlist_star_expr()
        }
    }

    fn raise_stmt(&mut self) -> PResult {
        let mut children = vec![self.bump()];
        if self.starts_item() {
            children.push(self.test()?);
            if self.at_keyword("from") {
                children.push(self.bump());
                children.push(self.test()?);
            } else if self.variant == GrammarVariant::Python2 {
                while self.at(TokenKind::Comma) {
                    children.push(self.bump());
                    children.push(self.test()?);
                }
            }
        }
        Ok(self.node(Syntax::RaiseStmt, children))
    }

    fn print_stmt(&mut self) -> PResult {
        let mut children = vec![self.bump()];
        if self.at_op(">>") {
            children.push(self.bump());
            children.push(self.test()?);
            while self.at(TokenKind::Comma) {
                children.push(self.bump());
                if !self.starts_item() {
                    break;
                }
                children.push(self.test()?);
            }
        } else if self.starts_item() {
            children.push(self.test()?);
            while self.at(TokenKind::Comma) {
                children.push(self.bump());
                if !self.starts_item() {
                    break;
                }
                children.push(self.test()?);
            }
        }
        Ok(self.node(Syntax::PrintStmt, children))
    }

    fn exec_stmt(&mut self) -> PResult {
        let mut children = vec![self.bump(), self.expr()?];
        if self.at_keyword("in") {
            children.push(self.bump());
            children.push(self.test()?);
            if self.at(TokenKind::Comma) {
                children.push(self.bump());
                children.push(self.test()?);
            }
        }
        Ok(self.node(Syntax::ExecStmt, children))
    }

    fn dotted_name(&mut self) -> PResult {
        let mut children = vec![self.expect_name()?];
        while self.at(TokenKind::Dot) {
            children.push(self.bump());
            children.push(self.expect_name()?);
        }
        Ok(self.node(Syntax::DottedName, children))
    }

    fn dotted_as_name(&mut self) -> PResult {
        let mut children = vec![self.dotted_name()?];
        if self.at_keyword("as") {
            children.push(self.bump());
            children.push(self.expect_name()?);
        }
        Ok(self.node(Syntax::DottedAsName, children))
    }

    fn import_name(&mut self) -> PResult {
        let kw = self.bump();
        let mut names = vec![self.dotted_as_name()?];
        while self.at(TokenKind::Comma) {
            names.push(self.bump());
            names.push(self.dotted_as_name()?);
        }
        let names = self.node(Syntax::DottedAsNames, names);
        Ok(self.tree.new_node(Syntax::ImportName, vec![kw, names]))
    }

    fn import_as_name(&mut self) -> PResult {
        let mut children = vec![self.expect_name()?];
        if self.at_keyword("as") {
            children.push(self.bump());
            children.push(self.expect_name()?);
        }
        Ok(self.node(Syntax::ImportAsName, children))
    }

    fn import_as_names(&mut self) -> PResult {
        let mut children = vec![self.import_as_name()?];
        while self.at(TokenKind::Comma) {
            children.push(self.bump());
            if !self.at(TokenKind::Name) {
                break;
            }
            children.push(self.import_as_name()?);
        }
        Ok(self.node(Syntax::ImportAsNames, children))
    }

    fn import_from(&mut self) -> PResult {
        let mut children = vec![self.bump()];
        let mut has_dots = false;
        while self.at(TokenKind::Dot) {
            children.push(self.bump());
            has_dots = true;
        }
        if !self.at_keyword("import") || !has_dots {
            children.push(self.dotted_name()?);
        }
        children.push(self.expect_keyword("import")?);
        if self.at(TokenKind::Star) {
            children.push(self.bump());
        } else if self.at(TokenKind::LPar) {
            children.push(self.bump());
            children.push(self.import_as_names()?);
            children.push(self.expect(TokenKind::RPar, "')'")?);
        } else {
            children.push(self.import_as_names()?);
        }
        Ok(self.tree.new_node(Syntax::ImportFrom, children))
    }

    fn suite(&mut self) -> PResult {
        if !self.at(TokenKind::Newline) {
            return self.simple_stmt();
        }
        let mut children = vec![self.bump()];
        children.push(self.expect(TokenKind::Indent, "an indented block")?);
        loop {
            match self.peek().kind {
                TokenKind::Dedent => {
                    children.push(self.bump());
                    break;
                }
                TokenKind::EndMarker => return Err(self.unexpected("a statement")),
                _ => children.push(self.stmt()?),
            }
        }
        Ok(self.tree.new_node(Syntax::Suite, children))
    }

    /// `':' suite`, appended to `children`.
    fn colon_suite(&mut self, children: &mut Vec<NodeId>) -> PResult<()> {
        children.push(self.expect(TokenKind::Colon, "':'")?);
        children.push(self.suite()?);
        Ok(())
    }

    fn else_clause(&mut self, children: &mut Vec<NodeId>) -> PResult<()> {
        if self.at_keyword("else") {
            children.push(self.bump());
            self.colon_suite(children)?;
        }
        Ok(())
    }

    fn if_stmt(&mut self) -> PResult {
        let mut children = vec![self.bump(), self.namedexpr_test()?];
        self.colon_suite(&mut children)?;
        while self.at_keyword("elif") {
            children.push(self.bump());
            children.push(self.namedexpr_test()?);
            self.colon_suite(&mut children)?;
        }
        self.else_clause(&mut children)?;
        Ok(self.tree.new_node(Syntax::IfStmt, children))
    }

    fn while_stmt(&mut self) -> PResult {
        let mut children = vec![self.bump(), self.namedexpr_test()?];
        self.colon_suite(&mut children)?;
        self.else_clause(&mut children)?;
        Ok(self.tree.new_node(Syntax::WhileStmt, children))
    }

    fn for_stmt(&mut self) -> PResult {
        let mut children = vec![self.bump(), self.exprlist()?];
        children.push(self.expect_keyword("in")?);
        children.push(self.testlist_star_expr()?);
        self.colon_suite(&mut children)?;
        self.else_clause(&mut children)?;
        Ok(self.tree.new_node(Syntax::ForStmt, children))
    }

    fn try_stmt(&mut self) -> PResult {
        let mut children = vec![self.bump()];
        self.colon_suite(&mut children)?;
        let mut handlers = 0;
        while self.at_keyword("except") {
            children.push(self.except_clause()?);
            self.colon_suite(&mut children)?;
            handlers += 1;
        }
        if handlers > 0 {
            self.else_clause(&mut children)?;
        }
        if self.at_keyword("finally") {
            children.push(self.bump());
            self.colon_suite(&mut children)?;
        } else if handlers == 0 {
            return Err(self.unexpected("'except' or 'finally'"));
        }
        Ok(self.tree.new_node(Syntax::TryStmt, children))
    }

    fn except_clause(&mut self) -> PResult {
        let mut children = vec![self.bump()];
        if self.at(TokenKind::Star) && self.variant != GrammarVariant::Python2 {
            children.push(self.bump());
        }
        if self.starts_item() {
            children.push(self.test()?);
            if self.at_keyword("as") || (self.variant == GrammarVariant::Python2 && self.at(TokenKind::Comma)) {
                children.push(self.bump());
                children.push(self.test()?);
            }
        }
        Ok(self.node(Syntax::ExceptClause, children))
    }

    fn with_stmt(&mut self) -> PResult {
        let mut children = vec![self.bump()];
        if self.at(TokenKind::LPar) {
            let (pos, len) = (self.pos, self.tree.len());
            if let Ok(items) = self.parenthesized_with_items()
                && self.at(TokenKind::Colon)
            {
                children.push(items);
                self.colon_suite(&mut children)?;
                return Ok(self.tree.new_node(Syntax::WithStmt, children));
            }
            self.pos = pos;
            self.tree.truncate(len);
        }
        children.push(self.asexpr_test()?);
        while self.at(TokenKind::Comma) {
            children.push(self.bump());
            children.push(self.asexpr_test()?);
        }
        self.colon_suite(&mut children)?;
        Ok(self.tree.new_node(Syntax::WithStmt, children))
    }

    fn parenthesized_with_items(&mut self) -> PResult {
        let lpar = self.bump();
        let items = self.comma_list(Syntax::TestlistGexp, Self::asexpr_test)?;
        let rpar = self.expect(TokenKind::RPar, "')'")?;
        Ok(self.tree.new_node(Syntax::Atom, vec![lpar, items, rpar]))
    }

    fn asexpr_test(&mut self) -> PResult {
        let mut children = vec![self.test_or_star()?];
        if self.at_keyword("as") {
            children.push(self.bump());
            children.push(self.test_or_star()?);
        }
        Ok(self.node(Syntax::AsexprTest, children))
    }

    fn funcdef(&mut self) -> PResult {
        let mut children = vec![self.bump(), self.expect_name()?];
        if self.at(TokenKind::LSqb) {
            children.push(self.typeparams()?);
        }
        children.push(self.parameters()?);
        if self.at(TokenKind::RArrow) {
            children.push(self.bump());
            children.push(self.test()?);
        }
        self.colon_suite(&mut children)?;
        Ok(self.tree.new_node(Syntax::Funcdef, children))
    }

    fn parameters(&mut self) -> PResult {
        let mut children = vec![self.expect(TokenKind::LPar, "'('")?];
        if !self.at(TokenKind::RPar) {
            children.push(self.argument_definitions(true)?);
        }
        children.push(self.expect(TokenKind::RPar, "')'")?);
        Ok(self.tree.new_node(Syntax::Parameters, children))
    }

    /// Parameter list of a `def` (`typed`) or a `lambda`.
    fn argument_definitions(&mut self, typed: bool) -> PResult {
        let mut children = Vec::new();
        loop {
            let tok = self.peek();
            match tok.kind {
                TokenKind::Star => {
                    children.push(self.bump());
                    if self.at(TokenKind::Name) {
                        children.push(self.parameter_name(typed)?);
                    }
                }
                TokenKind::DoubleStar => {
                    children.push(self.bump());
                    children.push(self.parameter_name(typed)?);
                }
                TokenKind::Op if tok.value == "/" => children.push(self.bump()),
                TokenKind::Name => {
                    children.push(self.parameter_name(typed)?);
                    if self.at(TokenKind::Equal) {
                        children.push(self.bump());
                        children.push(self.test()?);
                    }
                }
                TokenKind::LPar if self.variant == GrammarVariant::Python2 => {
                    let lpar = self.bump();
                    let inner = self.comma_list(Syntax::Exprlist, Self::expr)?;
                    let rpar = self.expect(TokenKind::RPar, "')'")?;
                    children.push(self.tree.new_node(Syntax::Atom, vec![lpar, inner, rpar]));
                }
                _ => return Err(self.unexpected("a parameter")),
            }
            if !self.at(TokenKind::Comma) {
                break;
            }
            children.push(self.bump());
            let closes = if typed {
                self.at(TokenKind::RPar)
            } else {
                self.at(TokenKind::Colon)
            };
            if closes {
                break;
            }
        }
        let kind = if typed {
            Syntax::Typedargslist
        } else {
            Syntax::Varargslist
        };
        Ok(self.node(kind, children))
    }

    fn parameter_name(&mut self, typed: bool) -> PResult {
        let name = self.expect_name()?;
        if typed && self.at(TokenKind::Colon) {
            let colon = self.bump();
            let annotation = self.test_or_star()?;
            return Ok(self.tree.new_node(Syntax::Tname, vec![name, colon, annotation]));
        }
        Ok(name)
    }

    fn classdef(&mut self) -> PResult {
        let mut children = vec![self.bump(), self.expect_name()?];
        if self.at(TokenKind::LSqb) {
            children.push(self.typeparams()?);
        }
        if self.at(TokenKind::LPar) {
            children.push(self.bump());
            if !self.at(TokenKind::RPar) {
                children.push(self.arglist()?);
            }
            children.push(self.expect(TokenKind::RPar, "')'")?);
        }
        self.colon_suite(&mut children)?;
        Ok(self.tree.new_node(Syntax::Classdef, children))
    }

    /// `'[' type_param (',' type_param)* [','] ']'` after a definition name.
    fn typeparams(&mut self) -> PResult {
        let mut children = vec![self.bump()];
        loop {
            children.push(self.type_param()?);
            if !self.at(TokenKind::Comma) {
                break;
            }
            children.push(self.bump());
            if self.at(TokenKind::RSqb) {
                break;
            }
        }
        children.push(self.expect(TokenKind::RSqb, "']'")?);
        Ok(self.tree.new_node(Syntax::Typeparams, children))
    }

    fn type_param(&mut self) -> PResult {
        let mut children = Vec::new();
        let kind = match self.peek().kind {
            TokenKind::Star => {
                children.push(self.bump());
                Syntax::Typevartuple
            }
            TokenKind::DoubleStar => {
                children.push(self.bump());
                Syntax::Paramspec
            }
            _ => Syntax::Typevar,
        };
        children.push(self.expect_name()?);
        if kind == Syntax::Typevar && self.at(TokenKind::Colon) {
            children.push(self.bump());
            children.push(self.expr()?);
        }
        if self.at(TokenKind::Equal) {
            children.push(self.bump());
            children.push(if kind == Syntax::Typevartuple {
                self.test_or_star()?
            } else {
                self.test()?
            });
        }
        Ok(self.node(kind, children))
    }

    /// `type Name[params] = value`
    fn type_stmt(&mut self) -> PResult {
        let mut children = vec![self.bump(), self.expect_name()?];
        if self.at(TokenKind::LSqb) {
            children.push(self.typeparams()?);
        }
        children.push(self.expect(TokenKind::Equal, "'='")?);
        children.push(self.test()?);
        Ok(self.tree.new_node(Syntax::TypeStmt, children))
    }

    /// `match subject ':'`, or `None` when `match` is an ordinary name here.
    fn match_header(&mut self) -> Option<Vec<NodeId>> {
        let keyword = self.bump();
        if !self.starts_item() {
            return None;
        }
        let subject = self.comma_list(Syntax::SubjectExpr, Self::namedexpr_or_star).ok()?;
        let colon = self.at(TokenKind::Colon).then(|| self.bump())?;
        (self.at(TokenKind::Newline) && self.peek_at(1).kind == TokenKind::Indent).then_some(vec![keyword, subject, colon])
    }

    fn match_stmt(&mut self, mut children: Vec<NodeId>) -> PResult {
        let mut suite = vec![self.bump(), self.bump()];
        loop {
            match self.peek().kind {
                TokenKind::Dedent if suite.len() > 2 => {
                    suite.push(self.bump());
                    break;
                }
                TokenKind::Name if self.peek().value == "case" => suite.push(self.case_block()?),
                _ => return Err(self.unexpected("'case'")),
            }
        }
        children.push(self.tree.new_node(Syntax::Suite, suite));
        Ok(self.tree.new_node(Syntax::MatchStmt, children))
    }

    fn case_block(&mut self) -> PResult {
        let mut children = vec![self.bump()];
        let outer = std::mem::replace(&mut self.in_pattern, true);
        let patterns = self.comma_list(Syntax::Patterns, Self::pattern);
        self.in_pattern = outer;
        children.push(patterns?);
        if self.at_keyword("if") {
            let if_kw = self.bump();
            let condition = self.namedexpr_test()?;
            children.push(self.tree.new_node(Syntax::Guard, vec![if_kw, condition]));
        }
        self.colon_suite(&mut children)?;
        Ok(self.tree.new_node(Syntax::CaseBlock, children))
    }

    fn pattern(&mut self) -> PResult {
        let item = self.expr_or_star()?;
        self.bind_pattern(item)
    }

    /// Wraps `item` in `item as name` when a pattern binds it.
    fn bind_pattern(&mut self, item: NodeId) -> PResult {
        if !self.in_pattern || !self.at_keyword("as") {
            return Ok(item);
        }
        let as_kw = self.bump();
        let name = self.expect_name()?;
        Ok(self.tree.new_node(Syntax::AsPattern, vec![item, as_kw, name]))
    }

    fn async_body(&mut self) -> PResult {
        self.async_depth += 1;
        let result = self.funcdef();
        self.async_depth -= 1;
        result
    }

    fn async_stmt(&mut self) -> PResult {
        let kw = self.bump();
        let body = if self.at_keyword("def") {
            self.async_body()?
        } else if self.at_keyword("with") {
            self.with_stmt()?
        } else if self.at_keyword("for") {
            self.for_stmt()?
        } else {
            return Err(self.unexpected("'def', 'with' or 'for'"));
        };
        Ok(self.tree.new_node(Syntax::AsyncStmt, vec![kw, body]))
    }

    fn decorator(&mut self) -> PResult {
        let at = self.bump();
        let expr = self.namedexpr_test()?;
        let newline = self.expect(TokenKind::Newline, "end of line")?;
        Ok(self.tree.new_node(Syntax::Decorator, vec![at, expr, newline]))
    }

    fn decorated(&mut self) -> PResult {
        let mut decorators = Vec::new();
        while self.at(TokenKind::At) {
            decorators.push(self.decorator()?);
        }
        let decorators = self.node(Syntax::Decorators, decorators);
        let definition = if self.at_keyword("def") {
            self.funcdef()?
        } else if self.at_keyword("class") {
            self.classdef()?
        } else if self.at_keyword("async") && self.keyword_at(1, "def") {
            let kw = self.bump();
            let def = self.async_body()?;
            self.tree.new_node(Syntax::AsyncFuncdef, vec![kw, def])
        } else {
            return Err(self.unexpected("a function or class definition"));
        };
        Ok(self.tree.new_node(Syntax::Decorated, vec![decorators, definition]))
    }

    // ----- expressions ---------------------------------------------------

    fn testlist_star_expr(&mut self) -> PResult {
        self.comma_list(Syntax::TestlistStarExpr, Self::test_or_star)
    }

    fn exprlist(&mut self) -> PResult {
        self.comma_list(Syntax::Exprlist, Self::expr_or_star)
    }

    fn test_or_star(&mut self) -> PResult {
        if self.at(TokenKind::Star) {
            self.star_expr()
        } else {
            self.test()
        }
    }

    fn expr_or_star(&mut self) -> PResult {
        if self.at(TokenKind::Star) {
            self.star_expr()
        } else {
            self.expr()
        }
    }

    fn namedexpr_or_star(&mut self) -> PResult {
        if self.at(TokenKind::Star) {
            self.star_expr()
        } else {
            self.namedexpr_test()
        }
    }

    fn star_expr(&mut self) -> PResult {
        let star = self.bump();
        let operand = self.expr()?;
        Ok(self.tree.new_node(Syntax::StarExpr, vec![star, operand]))
    }

    fn namedexpr_test(&mut self) -> PResult {
        let target = self.test()?;
        if self.at(TokenKind::ColonEqual) {
            if self.variant == GrammarVariant::Python2 {
                return Err(self.fail("assignment expressions are not supported"));
            }
            let op = self.bump();
            let value = self.test()?;
            return Ok(self.tree.new_node(Syntax::NamedexprTest, vec![target, op, value]));
        }
        Ok(target)
    }

    fn test(&mut self) -> PResult {
        if self.at_keyword("lambda") {
            return self.lambdef();
        }
        let body = self.or_test()?;
        if self.at_keyword("if") {
            let if_kw = self.bump();
            let condition = self.or_test()?;
            let else_kw = self.expect_keyword("else")?;
            let orelse = self.test()?;
            return Ok(self
                .tree
                .new_node(Syntax::Test, vec![body, if_kw, condition, else_kw, orelse]));
        }
        Ok(body)
    }

    fn lambdef(&mut self) -> PResult {
        let mut children = vec![self.bump()];
        if !self.at(TokenKind::Colon) {
            children.push(self.argument_definitions(false)?);
        }
        children.push(self.expect(TokenKind::Colon, "':'")?);
        children.push(self.test()?);
        Ok(self.tree.new_node(Syntax::Lambdef, children))
    }

    fn keyword_chain(&mut self, kind: Syntax, keyword: &str, operand: fn(&mut Self) -> PResult) -> PResult {
        let mut children = vec![operand(self)?];
        while self.at_keyword(keyword) {
            children.push(self.bump());
            children.push(operand(self)?);
        }
        Ok(self.node(kind, children))
    }

    fn or_test(&mut self) -> PResult {
        self.keyword_chain(Syntax::OrTest, "or", Self::and_test)
    }

    fn and_test(&mut self) -> PResult {
        self.keyword_chain(Syntax::AndTest, "and", Self::not_test)
    }

    fn not_test(&mut self) -> PResult {
        if self.at_keyword("not") {
            let not = self.bump();
            let operand = self.not_test()?;
            return Ok(self.tree.new_node(Syntax::NotTest, vec![not, operand]));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> PResult {
        let mut children = vec![self.expr()?];
        loop {
            let op = if self.at(TokenKind::Op) && self.at_any_op(&COMPARISON_OPS) {
                if self.at_op("<>") && self.variant != GrammarVariant::Python2 {
                    return Err(self.fail("'<>' is only valid in Python 2"));
                }
                self.bump()
            } else if self.at_keyword("in") {
                self.bump()
            } else if self.at_keyword("not") && self.keyword_at(1, "in") {
                let not = self.bump();
                let in_kw = self.bump();
                self.tree.new_node(Syntax::CompOp, vec![not, in_kw])
            } else if self.at_keyword("is") {
                let is = self.bump();
                if self.at_keyword("not") {
                    let not = self.bump();
                    self.tree.new_node(Syntax::CompOp, vec![is, not])
                } else {
                    is
                }
            } else {
                break;
            };
            children.push(op);
            children.push(self.expr()?);
        }
        Ok(self.node(Syntax::Comparison, children))
    }

    fn binary(&mut self, kind: Syntax, ops: &[&str], operand: fn(&mut Self) -> PResult) -> PResult {
        let mut children = vec![operand(self)?];
        while self.at_any_op(ops) {
            children.push(self.bump());
            children.push(operand(self)?);
        }
        Ok(self.node(kind, children))
    }

    fn expr(&mut self) -> PResult {
        self.binary(Syntax::Expr, &["|"], Self::xor_expr)
    }

    fn xor_expr(&mut self) -> PResult {
        self.binary(Syntax::XorExpr, &["^"], Self::and_expr)
    }

    fn and_expr(&mut self) -> PResult {
        self.binary(Syntax::AndExpr, &["&"], Self::shift_expr)
    }

    fn shift_expr(&mut self) -> PResult {
        self.binary(Syntax::ShiftExpr, &["<<", ">>"], Self::arith_expr)
    }

    fn arith_expr(&mut self) -> PResult {
        self.binary(Syntax::ArithExpr, &["+", "-"], Self::term)
    }

    fn term(&mut self) -> PResult {
        self.binary(Syntax::Term, &["*", "/", "%", "//", "@"], Self::factor)
    }

    fn factor(&mut self) -> PResult {
        if self.at(TokenKind::Op) && self.at_any_op(&["+", "-", "~"]) {
            let op = self.bump();
            let operand = self.factor()?;
            return Ok(self.tree.new_node(Syntax::Factor, vec![op, operand]));
        }
        self.power()
    }

    fn power(&mut self) -> PResult {
        let mut children = Vec::new();
        if self.at_keyword("await") {
            children.push(self.bump());
        }
        children.push(self.atom()?);
        while matches!(
            self.peek().kind,
            TokenKind::LPar | TokenKind::LSqb | TokenKind::Dot
        ) {
            children.push(self.trailer()?);
        }
        if self.at(TokenKind::DoubleStar) {
            children.push(self.bump());
            children.push(self.factor()?);
        }
        Ok(self.node(Syntax::Power, children))
    }

    fn trailer(&mut self) -> PResult {
        let open = self.bump();
        let children = match self.tree.token(open) {
            Some(TokenKind::LPar) => {
                let mut children = vec![open];
                if !self.at(TokenKind::RPar) {
                    children.push(self.arglist()?);
                }
                children.push(self.expect(TokenKind::RPar, "')'")?);
                children
            }
            Some(TokenKind::LSqb) => {
                let subscripts = self.subscriptlist()?;
                let close = self.expect(TokenKind::RSqb, "']'")?;
                vec![open, subscripts, close]
            }
            _ => {
                if !self.at(TokenKind::Name) {
                    return Err(self.unexpected("an attribute name"));
                }
                let name = self.bump();
                vec![open, name]
            }
        };
        Ok(self.tree.new_node(Syntax::Trailer, children))
    }

    fn subscriptlist(&mut self) -> PResult {
        let mut children = vec![self.subscript()?];
        while self.at(TokenKind::Comma) {
            children.push(self.bump());
            if !self.starts_item() && !self.at(TokenKind::Colon) {
                break;
            }
            children.push(self.subscript()?);
        }
        Ok(self.node(Syntax::Subscriptlist, children))
    }

    fn subscript(&mut self) -> PResult {
        let mut children = Vec::new();
        if !self.at(TokenKind::Colon) {
            let first = self.namedexpr_or_star()?;
            if !self.at(TokenKind::Colon) {
                return Ok(first);
            }
            children.push(first);
        }
        children.push(self.bump());
        if self.starts_item() {
            children.push(self.test()?);
        }
        if self.at(TokenKind::Colon) {
            let colon = self.bump();
            if self.starts_item() {
                let step = self.test()?;
                children.push(self.tree.new_node(Syntax::Sliceop, vec![colon, step]));
            } else {
                children.push(colon);
            }
        }
        Ok(self.node(Syntax::Subscript, children))
    }

    fn atom(&mut self) -> PResult {
        let tok = self.peek();
        match tok.kind {
            TokenKind::LPar => {
                let open = self.bump();
                if self.at(TokenKind::RPar) {
                    let close = self.bump();
                    return Ok(self.tree.new_node(Syntax::Atom, vec![open, close]));
                }
                let inner = if self.at_keyword("yield") {
                    self.yield_expr()?
                } else {
                    self.collection(Syntax::TestlistGexp)?
                };
                let close = self.expect(TokenKind::RPar, "')'")?;
                Ok(self.tree.new_node(Syntax::Atom, vec![open, inner, close]))
            }
            TokenKind::LSqb => {
                let open = self.bump();
                let mut children = vec![open];
                if !self.at(TokenKind::RSqb) {
                    children.push(self.collection(Syntax::Listmaker)?);
                }
                children.push(self.expect(TokenKind::RSqb, "']'")?);
                Ok(self.tree.new_node(Syntax::Atom, children))
            }
            TokenKind::LBrace => {
                let open = self.bump();
                let mut children = vec![open];
                if !self.at(TokenKind::RBrace) {
                    children.push(self.dictsetmaker()?);
                }
                children.push(self.expect(TokenKind::RBrace, "'}'")?);
                Ok(self.tree.new_node(Syntax::Atom, children))
            }
            TokenKind::Name if !self.is_reserved_at(0) => Ok(self.bump()),
            TokenKind::Number => Ok(self.bump()),
            TokenKind::String => {
                let mut strings = vec![self.bump()];
                while self.at(TokenKind::String) {
                    strings.push(self.bump());
                }
                Ok(self.node(Syntax::Atom, strings))
            }
            TokenKind::Dot => {
                let mut dots = vec![self.bump()];
                for _ in 0..2 {
                    dots.push(self.expect(TokenKind::Dot, "'...'")?);
                }
                Ok(self.tree.new_node(Syntax::Atom, dots))
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn at_comp_for(&self) -> bool {
        let tok = self.peek();
        self.at_keyword("for")
            || (tok.kind == TokenKind::Name && tok.value == "async" && self.keyword_at(1, "for"))
    }

    /// Contents of `(...)` or `[...]`: a comprehension or a comma list.
    fn collection(&mut self, kind: Syntax) -> PResult {
        let first = self.namedexpr_or_star()?;
        let first = self.bind_pattern(first)?;
        if self.at_comp_for() {
            let comp = self.comp_for()?;
            return Ok(self.tree.new_node(kind, vec![first, comp]));
        }
        let mut children = vec![first];
        while self.at(TokenKind::Comma) {
            children.push(self.bump());
            if !self.starts_item() {
                break;
            }
            let item = self.namedexpr_or_star()?;
            children.push(self.bind_pattern(item)?);
        }
        Ok(self.node(kind, children))
    }

    fn dict_or_set_item(&mut self, children: &mut Vec<NodeId>) -> PResult<()> {
        if self.at(TokenKind::DoubleStar) {
            children.push(self.bump());
            children.push(self.expr()?);
            return Ok(());
        }
        let key = self.namedexpr_or_star()?;
        children.push(key);
        if self.at(TokenKind::Colon) {
            children.push(self.bump());
            let value = self.test()?;
            children.push(self.bind_pattern(value)?);
        }
        Ok(())
    }

    fn dictsetmaker(&mut self) -> PResult {
        let mut children = Vec::new();
        self.dict_or_set_item(&mut children)?;
        if self.at_comp_for() {
            children.push(self.comp_for()?);
            return Ok(self.tree.new_node(Syntax::Dictsetmaker, children));
        }
        while self.at(TokenKind::Comma) {
            children.push(self.bump());
            if !self.starts_item() {
                break;
            }
            self.dict_or_set_item(&mut children)?;
        }
        Ok(self.node(Syntax::Dictsetmaker, children))
    }

    fn comp_for(&mut self) -> PResult {
        let mut children = Vec::new();
        if self.peek().value == "async" {
            children.push(self.bump());
        }
        children.push(self.expect_keyword("for")?);
        children.push(self.exprlist()?);
        children.push(self.expect_keyword("in")?);
        children.push(self.or_test()?);
        if let Some(next) = self.comp_iter()? {
            children.push(next);
        }
        Ok(self.tree.new_node(Syntax::CompFor, children))
    }

    fn comp_iter(&mut self) -> PResult<Option<NodeId>> {
        if self.at_comp_for() {
            return self.comp_for().map(Some);
        }
        if self.at_keyword("if") {
            let mut children = vec![self.bump()];
            let condition = if self.at_keyword("lambda") {
                self.lambdef()?
            } else {
                self.or_test()?
            };
            children.push(condition);
            if let Some(next) = self.comp_iter()? {
                children.push(next);
            }
            return Ok(Some(self.tree.new_node(Syntax::CompIf, children)));
        }
        Ok(None)
    }

    fn arglist(&mut self) -> PResult {
        self.comma_list(Syntax::Arglist, Self::argument)
    }

    fn argument(&mut self) -> PResult {
        if self.at(TokenKind::Star) || self.at(TokenKind::DoubleStar) {
            let star = self.bump();
            let value = self.test()?;
            return Ok(self.tree.new_node(Syntax::Argument, vec![star, value]));
        }
        let first = self.test()?;
        if self.at(TokenKind::Equal) || self.at(TokenKind::ColonEqual) {
            let op = self.bump();
            let value = self.test()?;
            let value = self.bind_pattern(value)?;
            return Ok(self.tree.new_node(Syntax::Argument, vec![first, op, value]));
        }
        if self.at_comp_for() {
            let comp = self.comp_for()?;
            return Ok(self.tree.new_node(Syntax::Argument, vec![first, comp]));
        }
        self.bind_pattern(first)
    }

    fn yield_expr(&mut self) -> PResult {
        let kw = self.bump();
        if self.at_keyword("from") {
            let from = self.bump();
            let value = self.test()?;
            let arg = self.tree.new_node(Syntax::YieldArg, vec![from, value]);
            return Ok(self.tree.new_node(Syntax::YieldExpr, vec![kw, arg]));
        }
        if self.starts_item() {
            let value = self.testlist_star_expr()?;
            return Ok(self.tree.new_node(Syntax::YieldExpr, vec![kw, value]));
        }
        Ok(kw)
    }
}
