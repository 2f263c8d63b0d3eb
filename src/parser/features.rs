//! Detection of version-specific syntax in a parsed tree.

use crate::config::{Feature, TargetVersion};
use crate::grammar::{Syntax, TokenKind};
use crate::nodes::is_simple_decorator_expression;
use crate::tokenizer::nests_own_quotes;
use crate::tree::{NodeId, Tree};
use std::collections::BTreeSet;

/// Names imported from `__future__` at the top of the module.
///
/// Only the leading run of statements is inspected: a docstring may come
/// first, and the scan stops at the first statement that is neither a
/// docstring nor a `from __future__ import`.
pub fn get_future_imports(tree: &Tree) -> BTreeSet<String> {
    let mut imports = BTreeSet::new();
    for &stmt in tree.children(tree.root()) {
        if !tree.is_syntax(stmt, Syntax::SimpleStmt) {
            break;
        }
        let children = tree.children(stmt);
        let Some(&first) = children.first() else {
            break;
        };
        if tree.is_leaf(first) {
            let is_docstring = children.len() == 2
                && tree.is_token(first, TokenKind::String)
                && tree.is_token(children[1], TokenKind::Newline);
            if is_docstring {
                continue;
            }
            break;
        }
        if !tree.is_syntax(first, Syntax::ImportFrom) {
            break;
        }
        let parts = tree.children(first);
        let from_future = parts.get(1).is_some_and(|&m| tree.is_name(m, "__future__"));
        if !from_future {
            break;
        }
        for &part in parts.iter().skip(3) {
            collect_imported_names(tree, part, &mut imports);
        }
    }
    imports
}

fn collect_imported_names(tree: &Tree, node: NodeId, out: &mut BTreeSet<String>) {
    match tree.syntax(node) {
        None => {
            if tree.is_token(node, TokenKind::Name) {
                out.insert(tree.value(node).to_string());
            }
        }
        Some(Syntax::ImportAsName) => {
            if let Some(name) = tree.child(node, 0) {
                out.insert(tree.value(name).to_string());
            }
        }
        Some(Syntax::ImportAsNames) => {
            for &child in tree.children(node) {
                collect_imported_names(tree, child, out);
            }
        }
        Some(_) => {}
    }
}

/// Relatively new syntax the source relies on.
pub fn get_features_used(tree: &Tree) -> BTreeSet<Feature> {
    let mut features = BTreeSet::new();
    if get_future_imports(tree).contains("annotations") {
        features.insert(Feature::FutureAnnotations);
    }
    for id in tree.pre_order(tree.root()) {
        match tree.syntax(id) {
            None => leaf_features(tree, id, &mut features),
            Some(kind) => node_features(tree, id, kind, &mut features),
        }
    }
    features
}

fn leaf_features(tree: &Tree, id: NodeId, features: &mut BTreeSet<Feature>) {
    let Some(leaf) = tree.leaf(id) else {
        return;
    };
    match leaf.kind {
        TokenKind::String => {
            let prefix: String = leaf
                .value
                .chars()
                .take_while(|c| c.is_ascii_alphabetic())
                .collect();
            if prefix.contains(['f', 'F']) {
                features.insert(Feature::FStrings);
                if nests_own_quotes(&leaf.value) {
                    features.insert(Feature::NestedFStringQuotes);
                }
            }
        }
        TokenKind::Number if leaf.value.contains('_') => {
            features.insert(Feature::NumericUnderscores);
        }
        TokenKind::Op if leaf.value == "/" => {
            if matches!(
                tree.parent_syntax(id),
                Some(Syntax::Typedargslist | Syntax::Varargslist | Syntax::Arglist)
            ) {
                features.insert(Feature::PosOnlyArguments);
            }
        }
        TokenKind::ColonEqual => {
            features.insert(Feature::AssignmentExpressions);
        }
        TokenKind::Name if leaf.value == "async" || leaf.value == "await" => {
            match tree.parent_syntax(id) {
                Some(Syntax::AsyncStmt | Syntax::AsyncFuncdef) => {}
                Some(Syntax::Power) if tree.index_in_parent(id) == Some(0) && leaf.value == "await" => {}
                Some(Syntax::CompFor) if tree.index_in_parent(id) == Some(0) => {
                    features.insert(Feature::AsyncKeywords);
                }
                _ => {
                    features.insert(Feature::AsyncIdentifiers);
                }
            }
        }
        _ => {}
    }
}

fn node_features(tree: &Tree, id: NodeId, kind: Syntax, features: &mut BTreeSet<Feature>) {
    let children = tree.children(id);
    match kind {
        Syntax::PrintStmt => {
            features.insert(Feature::PrintStatement);
        }
        Syntax::ExecStmt => {
            features.insert(Feature::ExecStatement);
        }
        Syntax::Typedargslist | Syntax::Arglist => {
            let trailing_comma = children.last().is_some_and(|&c| tree.is_token(c, TokenKind::Comma));
            if !trailing_comma {
                return;
            }
            let has_star = children.iter().any(|&c| {
                is_star(tree, c)
                    || (tree.is_syntax(c, Syntax::Argument)
                        && tree.child(c, 0).is_some_and(|first| is_star(tree, first)))
            });
            if has_star {
                features.insert(if kind == Syntax::Typedargslist {
                    Feature::TrailingCommaInDef
                } else {
                    Feature::TrailingCommaInCall
                });
            }
        }
        Syntax::Decorator => {
            if let Some(&expr) = children.get(1)
                && !is_simple_decorator_expression(tree, expr)
            {
                features.insert(Feature::RelaxedDecorators);
            }
        }
        Syntax::ReturnStmt | Syntax::YieldExpr => {
            let unpacks = children.get(1).is_some_and(|&value| {
                tree.is_syntax(value, Syntax::TestlistStarExpr)
                    && tree
                        .children(value)
                        .iter()
                        .any(|&c| tree.is_syntax(c, Syntax::StarExpr))
            });
            if unpacks {
                features.insert(Feature::UnpackingOnFlow);
            }
        }
        Syntax::WithStmt => {
            if let Some(&items) = children.get(1)
                && tree.is_syntax(items, Syntax::Atom)
                && tree.child(items, 1).is_some_and(|inner| {
                    tree.is_syntax(inner, Syntax::AsexprTest)
                        || (tree.is_syntax(inner, Syntax::TestlistGexp)
                            && tree
                                .children(inner)
                                .iter()
                                .any(|&c| tree.is_syntax(c, Syntax::AsexprTest)))
                })
            {
                features.insert(Feature::ParenthesizedContextManagers);
            }
        }
        Syntax::MatchStmt => {
            features.insert(Feature::PatternMatching);
        }
        Syntax::ExceptClause => {
            if children.get(1).is_some_and(|&c| tree.is_token(c, TokenKind::Star)) {
                features.insert(Feature::ExceptStar);
            }
        }
        Syntax::Typeparams | Syntax::TypeStmt => {
            features.insert(Feature::TypeParams);
        }
        Syntax::StarExpr => {
            // `x[*Ts]` and `*args: *Ts`
            if matches!(
                tree.parent_syntax(id),
                Some(Syntax::Subscriptlist | Syntax::Trailer | Syntax::Tname)
            ) {
                features.insert(Feature::VariadicGenerics);
            }
        }
        _ => {}
    }
}

fn is_star(tree: &Tree, id: NodeId) -> bool {
    matches!(tree.token(id), Some(TokenKind::Star | TokenKind::DoubleStar))
}

/// Every target version that supports all of `features`.
pub fn infer_target_versions(features: &BTreeSet<Feature>) -> BTreeSet<TargetVersion> {
    TargetVersion::ALL
        .into_iter()
        .filter(|version| features.iter().all(|&f| version.supports(f)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn features(source: &str) -> BTreeSet<Feature> {
        let tree = parse(source, &BTreeSet::new()).unwrap();
        get_features_used(&tree)
    }

    #[test]
    fn detects_modern_syntax() {
        assert!(features("f'{x}'\n").contains(&Feature::FStrings));
        assert!(features("x = 1_000\n").contains(&Feature::NumericUnderscores));
        assert!(features("if (y := 1): pass\n").contains(&Feature::AssignmentExpressions));
        assert!(features("def f(a, /): pass\n").contains(&Feature::PosOnlyArguments));
        assert!(features("f(*args,)\n").contains(&Feature::TrailingCommaInCall));
        assert!(features("def f(*args,): pass\n").contains(&Feature::TrailingCommaInDef));
        assert!(features("@a[0]\ndef f(): pass\n").contains(&Feature::RelaxedDecorators));
        assert!(features("def f():\n    return *a, b\n").contains(&Feature::UnpackingOnFlow));
        assert!(features("with (a as b):\n    pass\n").contains(&Feature::ParenthesizedContextManagers));
        assert!(features("match x:\n    case 1:\n        pass\n").contains(&Feature::PatternMatching));
        assert!(features("try:\n    pass\nexcept* ValueError:\n    pass\n").contains(&Feature::ExceptStar));
        assert!(features("def f[T](a: T): pass\n").contains(&Feature::TypeParams));
        assert!(features("type Alias = int\n").contains(&Feature::TypeParams));
        assert!(features("x: tuple[*Ts]\n").contains(&Feature::VariadicGenerics));
        assert!(features("def f(*args: *Ts): pass\n").contains(&Feature::VariadicGenerics));
        assert!(!features("match = 1\n").contains(&Feature::PatternMatching));
        assert!(features("async = 1\n").contains(&Feature::AsyncIdentifiers));
    }

    #[test]
    fn plain_source_uses_nothing() {
        assert!(features("x = 1\n@a.b(c)\ndef f(a, b=1): return a\n").is_empty());
        assert!(features("async def f():\n    await x\n").is_empty());
    }

    #[test]
    fn future_imports_after_docstring() {
        let tree = parse(
            "'''doc'''\nfrom __future__ import (annotations, unicode_literals as u)\nimport os\nfrom __future__ import division\n",
            &BTreeSet::new(),
        )
        .unwrap();
        let imports = get_future_imports(&tree);
        assert_eq!(
            imports.into_iter().collect::<Vec<_>>(),
            ["annotations", "unicode_literals"]
        );
    }

    #[test]
    fn infers_versions_from_features() {
        let all = infer_target_versions(&BTreeSet::new());
        assert_eq!(all.len(), TargetVersion::ALL.len());
        let versions = infer_target_versions(&[Feature::AssignmentExpressions].into_iter().collect());
        assert_eq!(versions.first(), Some(&TargetVersion::Py38));
        assert!(!versions.contains(&TargetVersion::Py37));
    }
}
