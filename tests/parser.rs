use indoc::indoc;
use pyfmt::config::{Feature, TargetVersion};
use pyfmt::debug::dump_tree;
use pyfmt::parser::{get_features_used, get_future_imports, infer_target_versions, parse};
use std::collections::BTreeSet;

fn targets(versions: &[TargetVersion]) -> BTreeSet<TargetVersion> {
    versions.iter().copied().collect()
}

fn features(source: &str) -> BTreeSet<Feature> {
    get_features_used(&parse(source, &BTreeSet::new()).unwrap())
}

#[test]
fn module_round_trips_with_trivia() {
    let source = indoc! {r#"
        #!/usr/bin/env python
        """Module docstring."""

        import os  # trailing
        from typing import (
            List,   # odd spacing
            Dict,
        )


        @decorator
        class Thing(Base):
            # leading comment
            value = (1 +
                2)

            def method(self, *args, **kwargs) -> List[int]:
                if not args:
                    return []  # empty
                return [a for a in args]
        # trailing module comment
    "#};
    let tree = parse(source, &BTreeSet::new()).unwrap();
    assert_eq!(tree.to_source(), source);
}

#[test]
fn tab_indented_blocks_round_trip() {
    let source = "if x:\n\tif y:\n\t\tpass\n\telse:\n\t\tz = 1\n";
    assert_eq!(parse(source, &BTreeSet::new()).unwrap().to_source(), source);
}

#[test]
fn async_identifiers_need_older_grammar() {
    let source = indoc! {"
        async = 1
        print(async)
    "};
    assert!(parse(source, &BTreeSet::new()).is_ok());
    assert!(parse(source, &targets(&[TargetVersion::Py35])).is_ok());
    assert!(parse(source, &targets(&[TargetVersion::Py37])).is_err());
}

#[test]
fn python2_statements_need_python2_target() {
    let source = "print 'hello'\n";
    assert!(parse(source, &BTreeSet::new()).is_ok());
    assert!(parse(source, &targets(&[TargetVersion::Py27])).is_ok());
    assert!(parse(source, &targets(&[TargetVersion::Py36])).is_err());
}

#[test]
fn errors_carry_position() {
    let err = parse("x = 1\ny = = 2\n", &BTreeSet::new()).unwrap_err();
    assert_eq!(err.line, 2);
    assert!(err.to_string().starts_with("cannot parse 2:"), "{err}");

    let err = parse("s = 'open\n", &BTreeSet::new()).unwrap_err();
    assert_eq!(err.line, 1);
    assert!(err.message.contains("unterminated"), "{}", err.message);
}

#[test]
fn inconsistent_dedent_is_rejected() {
    let source = indoc! {"
        def f():
            a = 1
          b = 2
    "};
    let err = parse(source, &BTreeSet::new()).unwrap_err();
    assert_eq!(err.line, 3);
}

#[test]
fn detects_features_in_use() {
    assert!(features("x = f'{a}'\n").contains(&Feature::FStrings));
    assert!(features("n = 1_000\n").contains(&Feature::NumericUnderscores));
    assert!(features("if (n := 1): pass\n").contains(&Feature::AssignmentExpressions));
    assert!(features("def f(a, /): pass\n").contains(&Feature::PosOnlyArguments));
    assert!(features("f(*args,)\n").contains(&Feature::TrailingCommaInCall));
    assert!(features("def f(*args,): pass\n").contains(&Feature::TrailingCommaInDef));
    assert!(features("x = f\"{d[\"k\"]}\"\n").contains(&Feature::NestedFStringQuotes));
    assert!(!features("x = f\"{d['k']}\"\n").contains(&Feature::NestedFStringQuotes));
    assert!(features("x = 1\n").is_empty());
}

#[test]
fn inferred_targets_support_used_features() {
    let versions = infer_target_versions(&features("if (n := 1): pass\n"));
    assert!(!versions.is_empty());
    assert!(versions.iter().all(|v| v.supports(Feature::AssignmentExpressions)));
    assert!(!versions.contains(&TargetVersion::Py37));
}

#[test]
fn future_imports_are_collected() {
    let source = indoc! {"
        '''Docstring.'''
        from __future__ import unicode_literals, annotations
        from __future__ import division
        import os
    "};
    let imports = get_future_imports(&parse(source, &BTreeSet::new()).unwrap());
    let expected: BTreeSet<String> = ["annotations", "division", "unicode_literals"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(imports, expected);
}

#[test]
fn dump_lists_every_leaf() {
    let tree = parse("a.b(1)\n", &BTreeSet::new()).unwrap();
    let dump = dump_tree(&tree);
    for leaf in ["\"a\"", "\".\"", "\"b\"", "\"(\"", "\"1\"", "\")\""] {
        assert!(dump.contains(leaf), "{leaf} missing from\n{dump}");
    }
}
