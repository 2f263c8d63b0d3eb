use indoc::indoc;
use pyfmt::config::{FormatConfig, Preview};
use pyfmt::error::FormatError;
use pyfmt::formatter::{format, format_str};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

fn fmt(src: &str) -> String {
    format(src, &FormatConfig::default()).unwrap().text
}

const EXAMPLES_DIR: &str = "tests/examples";

#[derive(Debug, Clone)]
struct TestCase {
    name: String,
    input_file: PathBuf,
    expected_file: PathBuf,
}

/// Every `<name>_<n>.input` under the examples directory that has a `<name>.py` next to it.
fn find_test_cases() -> Vec<TestCase> {
    let mut test_cases: Vec<TestCase> = WalkDir::new(EXAMPLES_DIR)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| create_test_case(e.path()))
        .collect();
    test_cases.sort_by(|a, b| a.name.cmp(&b.name));
    test_cases
}

fn create_test_case(input_path: &Path) -> Option<TestCase> {
    let stem = input_path.file_name()?.to_str()?.strip_suffix(".input")?;
    // "fmt_off_1" -> "fmt_off"
    let (base_name, _) = stem.rsplit_once('_')?;
    let expected_file = input_path.with_file_name(format!("{base_name}.py"));
    if !expected_file.exists() {
        return None;
    }
    let group = input_path
        .parent()
        .and_then(|p| p.strip_prefix(EXAMPLES_DIR).ok())
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    Some(TestCase {
        name: format!("{group}/{stem}"),
        input_file: input_path.to_path_buf(),
        expected_file,
    })
}

fn run_test_case(test_case: &TestCase) -> Result<(), String> {
    let read = |path: &Path| fs::read_to_string(path).map_err(|e| format!("cannot read {}: {e}", path.display()));
    let input = read(&test_case.input_file)?;
    let expected = read(&test_case.expected_file)?;

    let formatted = format(&input, &FormatConfig::default())
        .map_err(|e| format!("{}: formatting failed: {e}", test_case.name))?
        .text;
    if formatted.trim_end() == expected.trim_end() {
        return Ok(());
    }
    Err(format!(
        "{} does not match {}\n\n--- Expected ---\n{}\n--- Got ---\n{}\n--- Diff ---\n{}",
        test_case.name,
        test_case.expected_file.display(),
        expected,
        formatted,
        create_diff(&expected, &formatted)
    ))
}

/// Line-by-line differences, numbered from 1.
fn create_diff(expected: &str, actual: &str) -> String {
    let expected_lines: Vec<&str> = expected.lines().collect();
    let actual_lines: Vec<&str> = actual.lines().collect();
    let diff: String = (0..expected_lines.len().max(actual_lines.len()))
        .filter_map(|i| {
            let want = expected_lines.get(i).copied().unwrap_or("<missing>");
            let got = actual_lines.get(i).copied().unwrap_or("<missing>");
            (want != got).then(|| format!("line {}: expected {:?}, got {:?}\n", i + 1, want, got))
        })
        .collect();
    if diff.is_empty() {
        "no line differences (trailing whitespace only)".to_string()
    } else {
        diff
    }
}

#[test]
fn example_files_formatting() {
    let test_cases = find_test_cases();
    assert!(!test_cases.is_empty(), "no test cases found in {EXAMPLES_DIR}");

    let failures: Vec<String> = test_cases.iter().filter_map(|tc| run_test_case(tc).err()).collect();
    if !failures.is_empty() {
        panic!("{} of {} cases failed:\n\n{}", failures.len(), test_cases.len(), failures.join("\n\n"));
    }
}

#[test]
fn assignment_gets_spaces() {
    assert_eq!(fmt("x=1"), "x = 1\n");
}

#[test]
fn magic_trailing_comma_explodes_parameters() {
    let input = "def f(a,b,c,): pass\n";
    let expected = indoc! {"
        def f(
            a,
            b,
            c,
        ):
            pass
    "};
    assert_eq!(fmt(input), expected);
}

#[test]
fn magic_trailing_comma_can_be_ignored() {
    let config = FormatConfig::default().with_magic_trailing_comma(false);
    assert_eq!(format_str("foo(a,b,)\n", &config).unwrap(), "foo(a, b)\n");
}

#[test]
fn fmt_off_region_is_verbatim() {
    let input = indoc! {"
        # fmt: off
        x = [1,2,
             3]
        # fmt: on
        y=1
    "};
    let expected = indoc! {"
        # fmt: off
        x = [1,2,
             3]
        # fmt: on
        y = 1
    "};
    assert_eq!(fmt(input), expected);
}

#[test]
fn fmt_skip_leaves_the_statement() {
    assert_eq!(fmt("x  =  1  # fmt: skip\ny=2\n"), "x  =  1  # fmt: skip\ny = 2\n");
}

#[test]
fn single_element_tuple_is_unchanged() {
    let formatted = format("a = (1,)\n", &FormatConfig::default()).unwrap();
    assert_eq!(formatted.text, "a = (1,)\n");
    assert!(!formatted.changed);
}

#[test]
fn long_string_is_split_under_preview() {
    let content = "word ".repeat(40);
    let content = content.trim_end();
    let input = format!("x = \"{}\"\n", content);
    let config = FormatConfig::default().with_preview(Preview::StringProcessing);
    let formatted = format(&input, &config).unwrap();

    let lines: Vec<&str> = formatted.text.lines().collect();
    assert_eq!(lines.first(), Some(&"x = ("));
    assert_eq!(lines.last(), Some(&")"));
    assert!(lines.len() > 3);
    assert!(lines.iter().all(|l| l.chars().count() <= 88));

    let rejoined: String = lines[1..lines.len() - 1]
        .iter()
        .map(|l| l.trim().trim_matches('"'))
        .collect();
    assert_eq!(rejoined, content);
}

#[test]
fn long_string_stays_without_preview() {
    let input = format!("x = \"{}\"\n", "word ".repeat(40).trim_end());
    assert_eq!(fmt(&input), input);
}

#[test]
fn long_call_is_split_at_brackets() {
    let input = "result = some_function_name(argument_number_one, argument_number_two, argument_number_three)\n";
    let expected = indoc! {"
        result = some_function_name(
            argument_number_one, argument_number_two, argument_number_three
        )
    "};
    assert_eq!(fmt(input), expected);
}

#[test]
fn blank_lines_are_normalized() {
    let input = indoc! {"
        import os
        def f():



            return 1
        x = 1
    "};
    let expected = indoc! {"
        import os


        def f():
            return 1


        x = 1
    "};
    assert_eq!(fmt(input), expected);
}

#[test]
fn string_quotes_are_normalized() {
    assert_eq!(fmt("x = 'a'\ny = 'it\"s'\n"), "x = \"a\"\ny = 'it\"s'\n");
}

#[test]
fn formatting_is_idempotent_on_examples() {
    for entry in WalkDir::new(EXAMPLES_DIR).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("py") {
            continue;
        }
        let expected = fs::read_to_string(path).unwrap();
        assert_eq!(fmt(&expected), expected, "{} is not stable", path.display());
    }
}

#[test]
fn invalid_source_is_a_parse_error() {
    let err = format("def f(:\n", &FormatConfig::default()).unwrap_err();
    assert!(matches!(err, FormatError::Parse(_)));
    assert!(!err.is_internal());
}
