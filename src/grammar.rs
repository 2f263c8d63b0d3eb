//! Node kinds of the concrete syntax tree.
//!
//! Leaves are tagged with a [`TokenKind`], interior nodes with a [`Syntax`]
//! production. Both are closed enums so every pass matches on them
//! exhaustively instead of comparing numeric codes.

use std::fmt;

/// Lexical category of a leaf.
///
/// Brackets and the handful of operators the formatter reasons about get
/// their own variant; all other operators share [`TokenKind::Op`] and are
/// told apart by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Name,
    Number,
    String,
    Newline,
    Indent,
    Dedent,
    EndMarker,
    /// A comment that trails code on the same line.
    Comment,
    /// A comment that occupies its own line, or verbatim text that must not be reformatted.
    StandaloneComment,
    LPar,
    RPar,
    LSqb,
    RSqb,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Semi,
    Dot,
    Equal,
    At,
    RArrow,
    ColonEqual,
    Star,
    DoubleStar,
    Op,
}

impl TokenKind {
    pub fn is_opening_bracket(self) -> bool {
        matches!(self, TokenKind::LPar | TokenKind::LSqb | TokenKind::LBrace)
    }

    pub fn is_closing_bracket(self) -> bool {
        matches!(self, TokenKind::RPar | TokenKind::RSqb | TokenKind::RBrace)
    }

    pub fn is_bracket(self) -> bool {
        self.is_opening_bracket() || self.is_closing_bracket()
    }

    /// Tokens that carry layout but never any text of their own.
    pub fn is_whitespace(self) -> bool {
        matches!(
            self,
            TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent
        )
    }

    /// The closing bracket kind matching an opening one.
    pub fn closing(self) -> Option<TokenKind> {
        match self {
            TokenKind::LPar => Some(TokenKind::RPar),
            TokenKind::LSqb => Some(TokenKind::RSqb),
            TokenKind::LBrace => Some(TokenKind::RBrace),
            _ => None,
        }
    }

    /// Kind for an operator spelled `op`.
    pub fn for_operator(op: &str) -> TokenKind {
        match op {
            "(" => TokenKind::LPar,
            ")" => TokenKind::RPar,
            "[" => TokenKind::LSqb,
            "]" => TokenKind::RSqb,
            "{" => TokenKind::LBrace,
            "}" => TokenKind::RBrace,
            "," => TokenKind::Comma,
            ":" => TokenKind::Colon,
            ";" => TokenKind::Semi,
            "." => TokenKind::Dot,
            "=" => TokenKind::Equal,
            "@" => TokenKind::At,
            "->" => TokenKind::RArrow,
            ":=" => TokenKind::ColonEqual,
            "*" => TokenKind::Star,
            "**" => TokenKind::DoubleStar,
            _ => TokenKind::Op,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TokenKind::Name => "NAME",
            TokenKind::Number => "NUMBER",
            TokenKind::String => "STRING",
            TokenKind::Newline => "NEWLINE",
            TokenKind::Indent => "INDENT",
            TokenKind::Dedent => "DEDENT",
            TokenKind::EndMarker => "ENDMARKER",
            TokenKind::Comment => "COMMENT",
            TokenKind::StandaloneComment => "STANDALONE_COMMENT",
            TokenKind::LPar => "LPAR",
            TokenKind::RPar => "RPAR",
            TokenKind::LSqb => "LSQB",
            TokenKind::RSqb => "RSQB",
            TokenKind::LBrace => "LBRACE",
            TokenKind::RBrace => "RBRACE",
            TokenKind::Comma => "COMMA",
            TokenKind::Colon => "COLON",
            TokenKind::Semi => "SEMI",
            TokenKind::Dot => "DOT",
            TokenKind::Equal => "EQUAL",
            TokenKind::At => "AT",
            TokenKind::RArrow => "RARROW",
            TokenKind::ColonEqual => "COLONEQUAL",
            TokenKind::Star => "STAR",
            TokenKind::DoubleStar => "DOUBLESTAR",
            TokenKind::Op => "OP",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Grammar productions that appear as interior nodes.
///
/// A production that would have a single child is never materialized; the
/// child takes its place. So `x` alone is a `Name` leaf, not an `atom`
/// wrapping one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Syntax {
    FileInput,
    Decorator,
    Decorators,
    Decorated,
    AsyncFuncdef,
    AsyncStmt,
    Funcdef,
    Parameters,
    Typedargslist,
    Tname,
    Varargslist,
    SimpleStmt,
    ExprStmt,
    Annassign,
    PrintStmt,
    DelStmt,
    ReturnStmt,
    RaiseStmt,
    ImportName,
    ImportFrom,
    ImportAsName,
    DottedAsName,
    ImportAsNames,
    DottedAsNames,
    DottedName,
    GlobalStmt,
    ExecStmt,
    AssertStmt,
    IfStmt,
    WhileStmt,
    ForStmt,
    TryStmt,
    ExceptClause,
    WithStmt,
    AsexprTest,
    Suite,
    Test,
    Lambdef,
    OrTest,
    AndTest,
    NotTest,
    Comparison,
    CompOp,
    StarExpr,
    Expr,
    XorExpr,
    AndExpr,
    ShiftExpr,
    ArithExpr,
    Term,
    Factor,
    Power,
    Trailer,
    Atom,
    Listmaker,
    TestlistGexp,
    Subscriptlist,
    Subscript,
    Sliceop,
    Exprlist,
    Testlist,
    TestlistStarExpr,
    Dictsetmaker,
    Classdef,
    Arglist,
    Argument,
    CompFor,
    CompIf,
    YieldExpr,
    YieldArg,
    NamedexprTest,
    MatchStmt,
    SubjectExpr,
    CaseBlock,
    Guard,
    Patterns,
    AsPattern,
    TypeStmt,
    Typeparams,
    Typevar,
    Typevartuple,
    Paramspec,
}

impl Syntax {
    pub fn name(self) -> &'static str {
        match self {
            Syntax::FileInput => "file_input",
            Syntax::Decorator => "decorator",
            Syntax::Decorators => "decorators",
            Syntax::Decorated => "decorated",
            Syntax::AsyncFuncdef => "async_funcdef",
            Syntax::AsyncStmt => "async_stmt",
            Syntax::Funcdef => "funcdef",
            Syntax::Parameters => "parameters",
            Syntax::Typedargslist => "typedargslist",
            Syntax::Tname => "tname",
            Syntax::Varargslist => "varargslist",
            Syntax::SimpleStmt => "simple_stmt",
            Syntax::ExprStmt => "expr_stmt",
            Syntax::Annassign => "annassign",
            Syntax::PrintStmt => "print_stmt",
            Syntax::DelStmt => "del_stmt",
            Syntax::ReturnStmt => "return_stmt",
            Syntax::RaiseStmt => "raise_stmt",
            Syntax::ImportName => "import_name",
            Syntax::ImportFrom => "import_from",
            Syntax::ImportAsName => "import_as_name",
            Syntax::DottedAsName => "dotted_as_name",
            Syntax::ImportAsNames => "import_as_names",
            Syntax::DottedAsNames => "dotted_as_names",
            Syntax::DottedName => "dotted_name",
            Syntax::GlobalStmt => "global_stmt",
            Syntax::ExecStmt => "exec_stmt",
            Syntax::AssertStmt => "assert_stmt",
            Syntax::IfStmt => "if_stmt",
            Syntax::WhileStmt => "while_stmt",
            Syntax::ForStmt => "for_stmt",
            Syntax::TryStmt => "try_stmt",
            Syntax::ExceptClause => "except_clause",
            Syntax::WithStmt => "with_stmt",
            Syntax::AsexprTest => "asexpr_test",
            Syntax::Suite => "suite",
            Syntax::Test => "test",
            Syntax::Lambdef => "lambdef",
            Syntax::OrTest => "or_test",
            Syntax::AndTest => "and_test",
            Syntax::NotTest => "not_test",
            Syntax::Comparison => "comparison",
            Syntax::CompOp => "comp_op",
            Syntax::StarExpr => "star_expr",
            Syntax::Expr => "expr",
            Syntax::XorExpr => "xor_expr",
            Syntax::AndExpr => "and_expr",
            Syntax::ShiftExpr => "shift_expr",
            Syntax::ArithExpr => "arith_expr",
            Syntax::Term => "term",
            Syntax::Factor => "factor",
            Syntax::Power => "power",
            Syntax::Trailer => "trailer",
            Syntax::Atom => "atom",
            Syntax::Listmaker => "listmaker",
            Syntax::TestlistGexp => "testlist_gexp",
            Syntax::Subscriptlist => "subscriptlist",
            Syntax::Subscript => "subscript",
            Syntax::Sliceop => "sliceop",
            Syntax::Exprlist => "exprlist",
            Syntax::Testlist => "testlist",
            Syntax::TestlistStarExpr => "testlist_star_expr",
            Syntax::Dictsetmaker => "dictsetmaker",
            Syntax::Classdef => "classdef",
            Syntax::Arglist => "arglist",
            Syntax::Argument => "argument",
            Syntax::CompFor => "comp_for",
            Syntax::CompIf => "comp_if",
            Syntax::YieldExpr => "yield_expr",
            Syntax::YieldArg => "yield_arg",
            Syntax::NamedexprTest => "namedexpr_test",
            Syntax::MatchStmt => "match_stmt",
            Syntax::SubjectExpr => "subject_expr",
            Syntax::CaseBlock => "case_block",
            Syntax::Guard => "guard",
            Syntax::Patterns => "patterns",
            Syntax::AsPattern => "as_pattern",
            Syntax::TypeStmt => "type_stmt",
            Syntax::Typeparams => "typeparams",
            Syntax::Typevar => "typevar",
            Syntax::Typevartuple => "typevartuple",
            Syntax::Paramspec => "paramspec",
        }
    }

    /// Compound statements whose body is a suite.
    pub fn is_compound_statement(self) -> bool {
        matches!(
            self,
            Syntax::IfStmt
                | Syntax::WhileStmt
                | Syntax::ForStmt
                | Syntax::TryStmt
                | Syntax::ExceptClause
                | Syntax::WithStmt
                | Syntax::Funcdef
                | Syntax::Classdef
                | Syntax::MatchStmt
                | Syntax::CaseBlock
        )
    }

    /// Productions that hold a bracketed, comma separated collection.
    pub fn is_collection(self) -> bool {
        matches!(
            self,
            Syntax::Arglist
                | Syntax::Typedargslist
                | Syntax::Varargslist
                | Syntax::Listmaker
                | Syntax::TestlistGexp
                | Syntax::Dictsetmaker
                | Syntax::Subscriptlist
                | Syntax::ImportAsNames
        )
    }

    /// Binary and comparison expressions, the operands of `**` included.
    pub fn is_math_or_logic(self) -> bool {
        matches!(
            self,
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
                | Syntax::Term
                | Syntax::Power
        )
    }
}

impl fmt::Display for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of any node: a token for leaves, a production for interior nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Token(TokenKind),
    Syntax(Syntax),
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Token(t) => t.fmt(f),
            NodeKind::Syntax(s) => s.fmt(f),
        }
    }
}
