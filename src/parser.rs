//! Source parsing
//!
//! [`parse`] tokenizes the input once and then runs it through each grammar
//! variant that fits the requested target versions, in order, keeping the
//! first tree that parses. The variants differ only in how `async`/`await`
//! and the Python 2 statements are treated.
//!
//! # Example
//!
//! ```rust
//! use std::collections::BTreeSet;
//! use pyfmt::parser::parse;
//!
//! let tree = parse("x = 1\n", &BTreeSet::new()).unwrap();
//! assert_eq!(tree.to_source(), "x = 1\n");
//! ```

mod features;
mod rules;

pub use features::{get_features_used, get_future_imports, infer_target_versions};

use crate::config::{Feature, TargetVersion};
use crate::error::ParseError;
use crate::tokenizer::{Token, tokenize};
use crate::tree::Tree;
use log::debug;
use rules::{Failure, Parser};
use std::collections::BTreeSet;
use std::fmt;

/// Flavours of the grammar, tried in order until one accepts the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrammarVariant {
    /// Python 3.7+: `async` and `await` are reserved words.
    AsyncKeywords,
    /// Python 3.0-3.6: `async` and `await` are ordinary names outside `async def`.
    AsyncIdentifiers,
    /// Python 2.7: `print` and `exec` statements, no `async`.
    Python2,
}

impl GrammarVariant {
    /// Variants to try for `targets`, most likely first.
    pub fn for_targets(targets: &BTreeSet<TargetVersion>) -> Vec<GrammarVariant> {
        if targets.is_empty() {
            return vec![
                GrammarVariant::AsyncKeywords,
                GrammarVariant::AsyncIdentifiers,
                GrammarVariant::Python2,
            ];
        }
        if targets.iter().all(|t| t.is_python2()) {
            return vec![GrammarVariant::Python2];
        }
        let mut variants = Vec::new();
        if !targets.iter().all(|t| t.supports(Feature::AsyncIdentifiers)) {
            variants.push(GrammarVariant::AsyncKeywords);
        }
        if !targets.iter().all(|t| t.supports(Feature::AsyncKeywords)) {
            variants.push(GrammarVariant::AsyncIdentifiers);
        }
        variants
    }
}

impl fmt::Display for GrammarVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GrammarVariant::AsyncKeywords => "python3 (async keywords)",
            GrammarVariant::AsyncIdentifiers => "python3 (async identifiers)",
            GrammarVariant::Python2 => "python2",
        })
    }
}

/// Parse `source` into a lossless tree.
///
/// When every applicable grammar variant rejects the input, the error
/// reported is the one that got furthest into the token stream.
pub fn parse(source: &str, targets: &BTreeSet<TargetVersion>) -> Result<Tree, ParseError> {
    let tokens = tokenize(source).collect::<Result<Vec<Token>, _>>()?;
    let mut furthest: Option<Failure> = None;
    for variant in GrammarVariant::for_targets(targets) {
        match Parser::new(&tokens, variant).parse_file() {
            Ok(tree) => {
                debug!("parsed with the {variant} grammar");
                return Ok(tree);
            }
            Err(failure) => {
                debug!("{variant} grammar rejected input: {}", failure.message);
                if furthest.as_ref().is_none_or(|f| failure.pos > f.pos) {
                    furthest = Some(failure);
                }
            }
        }
    }
    Err(match furthest {
        Some(failure) => describe_failure(source, &tokens, failure),
        None => ParseError {
            message: "no grammar variant matches the target versions".to_string(),
            line: 1,
            column: 0,
        },
    })
}

fn describe_failure(source: &str, tokens: &[Token], failure: Failure) -> ParseError {
    let (line, column) = tokens
        .get(failure.pos)
        .or(tokens.last())
        .map_or((1, 0), |t| t.start);
    let text = source.lines().nth(line.saturating_sub(1)).unwrap_or("").trim();
    let message = if text.is_empty() {
        failure.message
    } else {
        format!("{}: {text}", failure.message)
    };
    ParseError {
        message,
        line,
        column,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{Syntax, TokenKind};

    fn targets(versions: &[TargetVersion]) -> BTreeSet<TargetVersion> {
        versions.iter().copied().collect()
    }

    fn parse_any(source: &str) -> Tree {
        match parse(source, &BTreeSet::new()) {
            Ok(tree) => tree,
            Err(err) => panic!("failed to parse {source:?}: {err}"),
        }
    }

    #[test]
    fn variants_for_targets() {
        assert_eq!(GrammarVariant::for_targets(&BTreeSet::new()).len(), 3);
        assert_eq!(
            GrammarVariant::for_targets(&targets(&[TargetVersion::Py27])),
            [GrammarVariant::Python2]
        );
        assert_eq!(
            GrammarVariant::for_targets(&targets(&[TargetVersion::Py38])),
            [GrammarVariant::AsyncKeywords]
        );
        assert_eq!(
            GrammarVariant::for_targets(&targets(&[TargetVersion::Py35])),
            [GrammarVariant::AsyncIdentifiers]
        );
        assert_eq!(
            GrammarVariant::for_targets(&targets(&[TargetVersion::Py36, TargetVersion::Py38])),
            [GrammarVariant::AsyncKeywords, GrammarVariant::AsyncIdentifiers]
        );
    }

    #[test]
    fn round_trips_source() {
        let sources = [
            "x = 1\n",
            "def f(a, *args, b: int = 2, **kw) -> None:\n    return a\n",
            "class A(B, metaclass=M):\n    '''doc'''\n    x: int = 0\n",
            "if a:\n    pass\nelif b:\n    pass\nelse:\n    pass\n",
            "try:\n    x\nexcept (A, B) as e:\n    raise X from e\nfinally:\n    y\n",
            "with open(p) as f, g:\n    pass\n",
            "from . import (a, b as c,)\nimport os.path as p\n",
            "x = [i for i in range(10) if i % 2]\n",
            "y = {k: v for k, v in d.items()}\n",
            "z = a[1:2, ::3, ...]\n",
            "lambda x, *, y=1: x + y\n",
            "async def f():\n    async with a as b:\n        await c\n",
            "@decorator.attr(1)\ndef f(): pass\n",
            "print(f'{x!r:>{width}}')\n",
            "x = (yield)\n",
            "del a, b[0]\nglobal g\nassert x, 'msg'\n",
            "if (n := len(a)) > 10: pass\n",
            "def f(a, /, b): ...\n",
            "a = not b is not c not in d\n",
            "x = 1 if y else 2\n",
            "# only a comment\n",
            "",
        ];
        for source in sources {
            assert_eq!(parse_any(source).to_source(), source, "round trip of {source:?}");
        }
    }

    #[test]
    fn collapses_single_child_productions() {
        let tree = parse_any("x\n");
        let root = tree.root();
        assert!(tree.is_syntax(root, Syntax::FileInput));
        let stmt = tree.children(root)[0];
        assert!(tree.is_syntax(stmt, Syntax::SimpleStmt));
        assert!(tree.is_token(tree.children(stmt)[0], TokenKind::Name));
    }

    #[test]
    fn async_as_identifier_falls_back() {
        let tree = parse_any("async = 1\nawait = async + 1\n");
        assert_eq!(tree.to_source(), "async = 1\nawait = async + 1\n");
        assert!(parse("async = 1\n", &targets(&[TargetVersion::Py38])).is_err());
    }

    #[test]
    fn python2_print_statement() {
        let source = "print >> sys.stderr, 'x'\nexec code in ns\n";
        let tree = parse(source, &targets(&[TargetVersion::Py27])).unwrap();
        let stmt = tree.children(tree.root())[0];
        assert!(tree.is_syntax(tree.children(stmt)[0], Syntax::PrintStmt));
        assert!(parse(source, &targets(&[TargetVersion::Py38])).is_err());
    }

    #[test]
    fn parenthesized_context_managers() {
        let source = "with (\n    open(a) as f,\n    open(b) as g,\n):\n    pass\n";
        assert_eq!(parse_any(source).to_source(), source);
        let source = "with (a, b):\n    pass\n";
        assert_eq!(parse_any(source).to_source(), source);
    }

    #[test]
    fn reports_furthest_failure() {
        let err = parse("x = 1\ny = (\n", &BTreeSet::new()).unwrap_err();
        assert!(err.message.contains("unexpected EOF"), "{}", err.message);
        let err = parse("x = = 1\n", &BTreeSet::new()).unwrap_err();
        assert_eq!((err.line, err.column), (1, 4));
        assert!(err.message.contains("x = = 1"), "{}", err.message);
    }

    #[test]
    fn rejects_invalid_syntax() {
        for source in ["def f(:\n", "  x = 1\n", "match x:\n    pass\n", "type = = 1\n"] {
            assert!(parse(source, &BTreeSet::new()).is_err(), "{source:?}");
        }
    }

    #[test]
    fn match_statement_builds_case_blocks() {
        let source = "match point:\n    case Point(x=0) as p if p:\n        pass\n    case [a, *rest]:\n        pass\n";
        let tree = parse_any(source);
        assert_eq!(tree.to_source(), source);
        let stmt = tree.children(tree.root())[0];
        assert!(tree.is_syntax(stmt, Syntax::MatchStmt));
        let suite = tree.children(stmt)[3];
        let case = tree.children(suite)[2];
        assert!(tree.is_syntax(case, Syntax::CaseBlock));
        assert!(tree.is_syntax(tree.children(case)[1], Syntax::AsPattern));
        assert!(tree.is_syntax(tree.children(case)[2], Syntax::Guard));
        assert!(parse("match x:\n    case 1:\n        pass\n", &targets(&[TargetVersion::Py27])).is_err());
    }

    #[test]
    fn soft_keywords_stay_names() {
        for source in ["match = 1\n", "match(x)\n", "match.group(0)\n", "case = 2\n", "type = str\n", "type(x)\n"] {
            let tree = parse_any(source);
            assert_eq!(tree.to_source(), source);
            let stmt = tree.children(tree.root())[0];
            assert!(tree.is_syntax(stmt, Syntax::SimpleStmt), "{source:?}");
        }
    }

    #[test]
    fn type_parameters_and_aliases() {
        let sources = [
            "def f[T: int, *Ts, **P](*args: *Ts) -> T: ...\n",
            "class C[T = int](Base): pass\n",
            "type Alias[K, V] = dict[K, V]\n",
            "try:\n    pass\nexcept* ValueError as e:\n    pass\n",
        ];
        for source in sources {
            assert_eq!(parse_any(source).to_source(), source, "round trip of {source:?}");
        }
        let tree = parse_any("type A = int\n");
        let stmt = tree.children(tree.root())[0];
        assert!(tree.is_syntax(tree.children(stmt)[0], Syntax::TypeStmt));
    }
}
