//! The formatting pipeline.
//!
//! Source text is parsed into a lossless tree, `fmt: off` regions and lines
//! outside the requested ranges are hidden, the tree is walked into logical
//! lines, and each line is split until it fits. [`format_file_contents`]
//! then checks that the result means the same as the input and formats
//! the same way again.
//!
//! # Example
//!
//! ```rust
//! use pyfmt::config::FormatConfig;
//! use pyfmt::formatter::format_str;
//!
//! let formatted = format_str("x=1\n", &FormatConfig::default()).unwrap();
//! assert_eq!(formatted, "x = 1\n");
//! ```

use crate::comments::normalize_fmt_off;
use crate::config::{Feature, FormatConfig, TargetVersion, supports_feature};
use crate::error::{EquivalenceError, FormatError};
use crate::linegen::generate_lines;
use crate::lines::{EmptyLineTracker, LinesBlock, Mode};
use crate::parser::{get_features_used, get_future_imports, infer_target_versions, parse};
use crate::ranges::{adjusted_lines, convert_unchanged_lines};
use crate::split::transform_line;
use crate::tree::Tree;
use crate::verify::{self, SafetyReport};
use log::{debug, warn};
use std::collections::BTreeSet;

/// Result of formatting one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formatted {
    pub text: String,
    /// The text differs from the input.
    pub changed: bool,
    pub report: SafetyReport,
}

/// Format `source` and check the result.
pub fn format(source: &str, config: &FormatConfig) -> Result<Formatted, FormatError> {
    format_file_contents(source, config, false)
}

/// Format the contents of a file.
///
/// Unless `fast`, output that changed is checked for equivalence (an
/// [`EquivalenceError`] if it fails) and stability (a logged warning).
/// Whitespace-only input formats to nothing. Windows line endings survive.
pub fn format_file_contents(source: &str, config: &FormatConfig, fast: bool) -> Result<Formatted, FormatError> {
    config.validate()?;
    if source.trim().is_empty() {
        return Ok(Formatted {
            text: String::new(),
            changed: !source.is_empty(),
            report: SafetyReport::ok(),
        });
    }

    let (header, body) = if config.skip_source_first_line {
        source.split_at(source.find('\n').map_or(source.len(), |i| i + 1))
    } else {
        ("", source)
    };
    let crlf = body.split_once('\n').is_some_and(|(first, _)| first.ends_with('\r'));
    let body = if crlf { body.replace("\r\n", "\n") } else { body.to_string() };

    let dst = format_str(&body, config)?;
    let report = if fast || dst == body {
        SafetyReport::ok()
    } else {
        verify::check(&body, &dst, config)
    };
    if !report.equivalent {
        return Err(EquivalenceError {
            diff_description: report.diagnostic.clone().unwrap_or_default(),
        }
        .into());
    }
    if !report.stable
        && let Some(diagnostic) = &report.diagnostic
    {
        warn!("{diagnostic}");
    }

    let dst = if crlf { dst.replace('\n', "\r\n") } else { dst };
    let text = format!("{header}{dst}");
    Ok(Formatted {
        changed: text != source,
        text,
        report,
    })
}

/// Format `source` without the safety checks.
///
/// The result is formatted a second time, since trailing commas added by
/// the first pass can change what the second one does with optional
/// parentheses.
pub fn format_str(source: &str, config: &FormatConfig) -> Result<String, FormatError> {
    config.validate()?;
    let dst = format_str_once(source, config, &config.line_ranges)?;
    if dst == source {
        return Ok(dst);
    }
    if config.line_ranges.is_empty() {
        return reformat(&dst, config, &[]);
    }
    let ranges = adjusted_lines(&config.line_ranges, source, &dst);
    if ranges.is_empty() {
        return Ok(dst);
    }
    reformat(&dst, config, &ranges)
}

/// Second pass over our own output. Failing to read it back is a formatter
/// bug, not a problem with the input.
fn reformat(dst: &str, config: &FormatConfig, ranges: &[(usize, usize)]) -> Result<String, FormatError> {
    format_once(dst, config, ranges, false).map_err(|err| match err {
        FormatError::Parse(e) => EquivalenceError {
            diff_description: format!("produced code that does not parse: {e}"),
        }
        .into(),
        FormatError::Tokenize(e) => EquivalenceError {
            diff_description: format!("produced code that does not tokenize: {e}"),
        }
        .into(),
        other => other,
    })
}

/// One parse and render of `source`, restricted to `ranges` when not empty.
pub fn format_str_once(source: &str, config: &FormatConfig, ranges: &[(usize, usize)]) -> Result<String, FormatError> {
    format_once(source, config, ranges, true)
}

fn format_once(
    source: &str,
    config: &FormatConfig,
    ranges: &[(usize, usize)],
    report_unsupported: bool,
) -> Result<String, FormatError> {
    let stripped = source.trim_start();
    let skipped = source[..source.len() - stripped.len()].matches('\n').count();
    let ranges: Vec<(usize, usize)> = ranges
        .iter()
        .filter(|&&(_, end)| end > skipped)
        .map(|&(start, end)| (start.saturating_sub(skipped).max(1), end - skipped))
        .collect();
    if !config.line_ranges.is_empty() && ranges.is_empty() {
        return Ok(source.to_string());
    }

    let tree = parse(stripped, &config.target_versions)?;
    if report_unsupported {
        for feature in unsupported_features(&tree, config) {
            warn!("source uses {feature:?}, which not every target version supports");
        }
    }
    Ok(render_tree(tree, config, &ranges))
}

/// Render an already parsed tree and check the result against its source.
pub fn render(tree: Tree, config: &FormatConfig) -> Result<(String, SafetyReport), FormatError> {
    config.validate()?;
    let source = tree.to_source();
    let text = render_tree(tree, config, &config.line_ranges);
    let report = if text == source {
        SafetyReport::ok()
    } else {
        verify::check(&source, &text, config)
    };
    Ok((text, report))
}

/// Versions the output must stay valid for: the configured ones, or all
/// versions that support what the source uses.
pub fn target_versions(tree: &Tree, config: &FormatConfig) -> BTreeSet<TargetVersion> {
    if config.target_versions.is_empty() {
        infer_target_versions(&get_features_used(tree))
    } else {
        config.target_versions.clone()
    }
}

/// Features the source uses that some explicitly requested target lacks.
pub fn unsupported_features(tree: &Tree, config: &FormatConfig) -> BTreeSet<Feature> {
    if config.target_versions.is_empty() {
        return BTreeSet::new();
    }
    get_features_used(tree)
        .into_iter()
        .filter(|&feature| !supports_feature(&config.target_versions, feature))
        .collect()
}

fn render_tree(mut tree: Tree, config: &FormatConfig, ranges: &[(usize, usize)]) -> String {
    let versions = target_versions(&tree, config);
    debug!(
        "target versions: {}",
        versions.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    );
    let remove_u_prefix =
        get_future_imports(&tree).contains("unicode_literals") || versions.iter().all(|v| !v.is_python2());
    let features: BTreeSet<Feature> = [Feature::TrailingCommaInCall, Feature::TrailingCommaInDef]
        .into_iter()
        .filter(|&feature| supports_feature(&versions, feature))
        .collect();

    normalize_fmt_off(&mut tree, ranges);
    if !ranges.is_empty() {
        convert_unchanged_lines(&mut tree, ranges);
    }

    let mode = Mode {
        parenthesized_context_managers: supports_feature(&versions, Feature::ParenthesizedContextManagers),
        ..Mode::from(config)
    };
    let lines = generate_lines(&mut tree, mode, remove_u_prefix);
    let mut tracker = EmptyLineTracker::new(mode);
    for mut line in lines {
        let block = tracker.maybe_empty_lines(&tree, &mut line);
        for split in transform_line(&mut tree, line, &features) {
            tracker.block_mut(block).content_lines.push(split.to_string());
        }
    }
    tracker.finish().iter().map(LinesBlock::all_lines).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Preview;

    fn fmt(source: &str) -> String {
        format_str(source, &FormatConfig::default()).unwrap()
    }

    #[test]
    fn formats_assignment() {
        assert_eq!(fmt("x=1"), "x = 1\n");
    }

    #[test]
    fn leading_blank_lines_go() {
        assert_eq!(fmt("\n\n\nx = 1\n"), "x = 1\n");
    }

    #[test]
    fn whitespace_only_input_is_empty() {
        let formatted = format("  \n\n", &FormatConfig::default()).unwrap();
        assert_eq!(formatted.text, "");
        assert!(formatted.changed);
        let formatted = format("", &FormatConfig::default()).unwrap();
        assert!(!formatted.changed);
    }

    #[test]
    fn unchanged_input_reports_no_change() {
        let formatted = format("x = 1\n", &FormatConfig::default()).unwrap();
        assert!(!formatted.changed);
        assert_eq!(formatted.report, SafetyReport::ok());
    }

    #[test]
    fn changed_input_is_verified() {
        let formatted = format("x  =  [1,2]\n", &FormatConfig::default()).unwrap();
        assert!(formatted.changed);
        assert_eq!(formatted.text, "x = [1, 2]\n");
        assert!(formatted.report.equivalent);
        assert!(formatted.report.stable);
    }

    #[test]
    fn crlf_line_endings_are_kept() {
        let formatted = format("x=1\r\ny=2\r\n", &FormatConfig::default()).unwrap();
        assert_eq!(formatted.text, "x = 1\r\ny = 2\r\n");
    }

    #[test]
    fn first_line_can_be_skipped() {
        let config = FormatConfig {
            skip_source_first_line: true,
            ..FormatConfig::default()
        };
        let formatted = format("not python at all\nx=1\n", &config).unwrap();
        assert_eq!(formatted.text, "not python at all\nx = 1\n");
    }

    #[test]
    fn parse_errors_surface() {
        let err = format("x = (\n", &FormatConfig::default()).unwrap_err();
        assert!(matches!(err, FormatError::Parse(_)));
    }

    #[test]
    fn unreadable_own_output_is_internal() {
        let err = reformat("y = x := 0\n", &FormatConfig::default(), &[]).unwrap_err();
        assert!(err.is_internal(), "{err}");
        assert!(err.to_string().contains("does not parse"), "{err}");
    }

    #[test]
    fn fmt_off_region_closed_by_dedent_is_stable() {
        let source = "def f():\n    # fmt: off\n    ( yield hello )\n    'unformatted'\n    # fmt: on\n\ndef g(): pass\n";
        let once = fmt(source);
        assert!(once.contains("    'unformatted'\n    # fmt: on\n"), "{once}");
        assert_eq!(fmt(&once), once);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = format("x = 1\n", &FormatConfig::default().with_line_length(0)).unwrap_err();
        assert!(matches!(err, FormatError::Config(_)));
    }

    #[test]
    fn line_ranges_limit_formatting() {
        let config = FormatConfig::default().with_line_ranges(vec![(2, 2)]);
        assert_eq!(format_str("x=1\ny=2\nz=3\n", &config).unwrap(), "x=1\ny = 2\nz=3\n");
    }

    #[test]
    fn render_checks_parsed_tree() {
        let tree = parse("x=1\n", &BTreeSet::new()).unwrap();
        let (text, report) = render(tree, &FormatConfig::default()).unwrap();
        assert_eq!(text, "x = 1\n");
        assert!(report.equivalent);
    }

    #[test]
    fn targets_are_inferred() {
        let tree = parse("x = f'{y}'\n", &BTreeSet::new()).unwrap();
        let versions = target_versions(&tree, &FormatConfig::default());
        assert!(versions.iter().all(|v| v.supports(Feature::FStrings)));
    }

    #[test]
    fn with_parens_around_items_need_new_targets() {
        let source = "with (a, b):\n    pass\n";
        let py38 = FormatConfig::default().with_target_versions([TargetVersion::Py38]);
        assert_eq!(format_str(source, &py38).unwrap(), source);
        let py39 = FormatConfig::default().with_target_versions([TargetVersion::Py39]);
        assert_eq!(format_str(source, &py39).unwrap(), "with a, b:\n    pass\n");
        let formatted = format("with (open(a) as f, open(b) as g):\n    pass\n", &FormatConfig::default()).unwrap();
        assert_eq!(formatted.text, "with open(a) as f, open(b) as g:\n    pass\n");
        assert!(formatted.report.equivalent);
    }

    #[test]
    fn features_beyond_targets_are_reported() {
        let tree = parse("if (n := 1):\n    pass\n", &BTreeSet::new()).unwrap();
        let py37 = FormatConfig::default().with_target_versions([TargetVersion::Py37]);
        assert_eq!(
            unsupported_features(&tree, &py37),
            BTreeSet::from([Feature::AssignmentExpressions])
        );
        let py38 = FormatConfig::default().with_target_versions([TargetVersion::Py38]);
        assert!(unsupported_features(&tree, &py38).is_empty());
        assert!(unsupported_features(&tree, &FormatConfig::default()).is_empty());
    }

    #[test]
    fn u_prefix_dropped_for_python3() {
        let config = FormatConfig::default().with_target_versions([TargetVersion::Py38]);
        assert_eq!(format_str("x = u'a'\n", &config).unwrap(), "x = \"a\"\n");
    }

    #[test]
    fn preview_string_processing_splits_long_strings() {
        let config = FormatConfig::default().with_preview(Preview::StringProcessing);
        let words = "lorem ipsum dolor sit amet ".repeat(8);
        let source = format!("x = \"{}\"\n", words.trim_end());
        let formatted = format(&source, &config).unwrap();
        assert!(formatted.text.starts_with("x = (\n"));
        assert!(formatted.text.lines().all(|l| l.chars().count() <= 88));
        assert!(formatted.report.equivalent);
    }
}
