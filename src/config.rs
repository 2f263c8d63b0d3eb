//! Formatting configuration
//!
//! [`FormatConfig`] is built once per invocation and passed by reference
//! through the whole pipeline. It never changes while files are formatted.

use crate::error::ConfigError;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Default width budget for a physical line.
pub const DEFAULT_LINE_LENGTH: usize = 88;

/// Anything wider than this is rejected as a configuration mistake.
pub const MAX_LINE_LENGTH: usize = 10_000;

/// Language versions the output has to stay compatible with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TargetVersion {
    Py27,
    Py33,
    Py34,
    Py35,
    Py36,
    Py37,
    Py38,
    Py39,
    Py310,
    Py311,
    Py312,
}

impl TargetVersion {
    pub const ALL: [TargetVersion; 11] = [
        TargetVersion::Py27,
        TargetVersion::Py33,
        TargetVersion::Py34,
        TargetVersion::Py35,
        TargetVersion::Py36,
        TargetVersion::Py37,
        TargetVersion::Py38,
        TargetVersion::Py39,
        TargetVersion::Py310,
        TargetVersion::Py311,
        TargetVersion::Py312,
    ];

    pub fn is_python2(self) -> bool {
        self == TargetVersion::Py27
    }

    /// Features every interpreter of this version understands.
    pub fn features(self) -> &'static [Feature] {
        use Feature::*;
        match self {
            TargetVersion::Py27 => &[AsyncIdentifiers, PrintStatement, ExecStatement],
            TargetVersion::Py33 | TargetVersion::Py34 => &[UnicodeLiterals, AsyncIdentifiers],
            TargetVersion::Py35 => &[UnicodeLiterals, TrailingCommaInCall, AsyncIdentifiers],
            TargetVersion::Py36 => &[
                UnicodeLiterals,
                FStrings,
                NumericUnderscores,
                TrailingCommaInCall,
                TrailingCommaInDef,
                AsyncIdentifiers,
            ],
            TargetVersion::Py37 => &[
                UnicodeLiterals,
                FStrings,
                NumericUnderscores,
                TrailingCommaInCall,
                TrailingCommaInDef,
                AsyncKeywords,
                FutureAnnotations,
            ],
            TargetVersion::Py38 => &[
                UnicodeLiterals,
                FStrings,
                NumericUnderscores,
                TrailingCommaInCall,
                TrailingCommaInDef,
                AsyncKeywords,
                FutureAnnotations,
                AssignmentExpressions,
                PosOnlyArguments,
                UnpackingOnFlow,
            ],
            TargetVersion::Py39 => &[
                UnicodeLiterals,
                FStrings,
                NumericUnderscores,
                TrailingCommaInCall,
                TrailingCommaInDef,
                AsyncKeywords,
                FutureAnnotations,
                AssignmentExpressions,
                PosOnlyArguments,
                UnpackingOnFlow,
                RelaxedDecorators,
                ParenthesizedContextManagers,
            ],
            TargetVersion::Py310 => &[
                UnicodeLiterals,
                FStrings,
                NumericUnderscores,
                TrailingCommaInCall,
                TrailingCommaInDef,
                AsyncKeywords,
                FutureAnnotations,
                AssignmentExpressions,
                PosOnlyArguments,
                UnpackingOnFlow,
                RelaxedDecorators,
                ParenthesizedContextManagers,
                PatternMatching,
            ],
            TargetVersion::Py311 => &[
                UnicodeLiterals,
                FStrings,
                NumericUnderscores,
                TrailingCommaInCall,
                TrailingCommaInDef,
                AsyncKeywords,
                FutureAnnotations,
                AssignmentExpressions,
                PosOnlyArguments,
                UnpackingOnFlow,
                RelaxedDecorators,
                ParenthesizedContextManagers,
                PatternMatching,
                ExceptStar,
                VariadicGenerics,
            ],
            TargetVersion::Py312 => &[
                UnicodeLiterals,
                FStrings,
                NumericUnderscores,
                TrailingCommaInCall,
                TrailingCommaInDef,
                AsyncKeywords,
                FutureAnnotations,
                AssignmentExpressions,
                PosOnlyArguments,
                UnpackingOnFlow,
                RelaxedDecorators,
                ParenthesizedContextManagers,
                PatternMatching,
                ExceptStar,
                VariadicGenerics,
                TypeParams,
                NestedFStringQuotes,
            ],
        }
    }

    pub fn supports(self, feature: Feature) -> bool {
        self.features().contains(&feature)
    }
}

impl fmt::Display for TargetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TargetVersion::Py27 => "py27",
            TargetVersion::Py33 => "py33",
            TargetVersion::Py34 => "py34",
            TargetVersion::Py35 => "py35",
            TargetVersion::Py36 => "py36",
            TargetVersion::Py37 => "py37",
            TargetVersion::Py38 => "py38",
            TargetVersion::Py39 => "py39",
            TargetVersion::Py310 => "py310",
            TargetVersion::Py311 => "py311",
            TargetVersion::Py312 => "py312",
        };
        f.write_str(s)
    }
}

impl FromStr for TargetVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TargetVersion::ALL
            .into_iter()
            .find(|v| v.to_string() == s.to_ascii_lowercase())
            .ok_or_else(|| ConfigError::UnknownTargetVersion(s.to_string()))
    }
}

/// Syntax features that only some target versions understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Feature {
    UnicodeLiterals,
    FStrings,
    NumericUnderscores,
    TrailingCommaInCall,
    TrailingCommaInDef,
    AsyncKeywords,
    AsyncIdentifiers,
    FutureAnnotations,
    AssignmentExpressions,
    PosOnlyArguments,
    UnpackingOnFlow,
    RelaxedDecorators,
    ParenthesizedContextManagers,
    /// `match` statements.
    PatternMatching,
    /// `except*` clauses.
    ExceptStar,
    /// Starred expressions in subscripts and `*args` annotations.
    VariadicGenerics,
    /// `def f[T]()`, `class C[T]` and `type X = ...`.
    TypeParams,
    /// An f-string replacement field reusing the enclosing quote.
    NestedFStringQuotes,
    PrintStatement,
    ExecStatement,
    /// Not a language feature: asks the right hand split to keep optional
    /// parentheses. No target version lists it.
    ForceOptionalParentheses,
}

/// True when every version in `targets` supports `feature`.
///
/// An empty set supports everything, matching "no constraint".
pub fn supports_feature(targets: &BTreeSet<TargetVersion>, feature: Feature) -> bool {
    targets.iter().all(|v| v.supports(feature))
}

/// Experimental behaviour that is off unless explicitly requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Preview {
    /// Split long string literals into implicitly concatenated parts.
    StringProcessing,
    /// Lowercase hex digits in `\x`, `\u` and `\U` escapes, uppercase `\N{...}` names.
    HexCodesInUnicodeSequences,
}

impl Preview {
    pub const ALL: [Preview; 2] = [Preview::StringProcessing, Preview::HexCodesInUnicodeSequences];

    pub fn name(self) -> &'static str {
        match self {
            Preview::StringProcessing => "string_processing",
            Preview::HexCodesInUnicodeSequences => "hex_codes_in_unicode_sequences",
        }
    }
}

impl FromStr for Preview {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.replace('-', "_");
        Preview::ALL
            .into_iter()
            .find(|p| p.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownPreviewFeature(s.to_string()))
    }
}

/// Formatting options
///
/// # Example
///
/// ```rust
/// use pyfmt::config::FormatConfig;
///
/// let config = FormatConfig::default().with_line_length(100);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.line_length, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatConfig {
    /// Width budget for physical lines (default: 88)
    pub line_length: usize,
    /// Versions to stay compatible with; empty means "detect from source"
    pub target_versions: BTreeSet<TargetVersion>,
    /// Normalize string prefixes and quotes
    pub string_normalization: bool,
    /// Inverse spelling of `string_normalization`; when set it wins
    pub skip_string_normalization: bool,
    /// Treat a pre-existing trailing comma as a request to explode the brackets
    pub magic_trailing_comma: bool,
    /// Format as a typing stub (`.pyi`)
    pub is_pyi: bool,
    /// Pass the first physical line through untouched
    pub skip_source_first_line: bool,
    /// Enabled preview features
    pub preview: BTreeSet<Preview>,
    /// 1-based inclusive physical line ranges to format; empty means everything
    pub line_ranges: Vec<(usize, usize)>,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            line_length: DEFAULT_LINE_LENGTH,
            target_versions: BTreeSet::new(),
            string_normalization: true,
            skip_string_normalization: false,
            magic_trailing_comma: true,
            is_pyi: false,
            skip_source_first_line: false,
            preview: BTreeSet::new(),
            line_ranges: Vec::new(),
        }
    }
}

impl FormatConfig {
    pub fn with_line_length(mut self, line_length: usize) -> Self {
        self.line_length = line_length;
        self
    }

    pub fn with_target_versions<I>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = TargetVersion>,
    {
        self.target_versions = versions.into_iter().collect();
        self
    }

    pub fn with_preview(mut self, feature: Preview) -> Self {
        self.preview.insert(feature);
        self
    }

    pub fn with_line_ranges(mut self, ranges: Vec<(usize, usize)>) -> Self {
        self.line_ranges = ranges;
        self
    }

    pub fn with_magic_trailing_comma(mut self, enabled: bool) -> Self {
        self.magic_trailing_comma = enabled;
        self
    }

    pub fn with_string_normalization(mut self, enabled: bool) -> Self {
        self.string_normalization = enabled;
        self.skip_string_normalization = !enabled;
        self
    }

    pub fn with_pyi(mut self, is_pyi: bool) -> Self {
        self.is_pyi = is_pyi;
        self
    }

    /// Whether string prefixes and quotes get normalized.
    pub fn normalizes_strings(&self) -> bool {
        self.string_normalization && !self.skip_string_normalization
    }

    pub fn is_preview(&self, feature: Preview) -> bool {
        self.preview.contains(&feature)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.line_length == 0 || self.line_length > MAX_LINE_LENGTH {
            return Err(ConfigError::LineLength {
                got: self.line_length,
                max: MAX_LINE_LENGTH,
            });
        }
        for &(start, end) in &self.line_ranges {
            if start == 0 {
                return Err(ConfigError::LineRange {
                    start,
                    end,
                    reason: "lines are numbered from 1",
                });
            }
            if end < start {
                return Err(ConfigError::LineRange {
                    start,
                    end,
                    reason: "end is before start",
                });
            }
        }
        Ok(())
    }

    /// Stable textual key describing everything that affects the output.
    pub fn cache_key(&self) -> String {
        let versions = if self.target_versions.is_empty() {
            "-".to_string()
        } else {
            self.target_versions
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(",")
        };
        let preview = self
            .preview
            .iter()
            .map(|p| p.name())
            .collect::<Vec<_>>()
            .join(",");
        let ranges = self
            .line_ranges
            .iter()
            .map(|(s, e)| format!("{s}-{e}"))
            .collect::<Vec<_>>()
            .join(",");
        [
            versions,
            self.line_length.to_string(),
            u8::from(self.normalizes_strings()).to_string(),
            u8::from(self.magic_trailing_comma).to_string(),
            u8::from(self.is_pyi).to_string(),
            u8::from(self.skip_source_first_line).to_string(),
            preview,
            ranges,
        ]
        .join(".")
    }

    /// Hex SHA-256 of [`cache_key`](Self::cache_key), for external result caches.
    pub fn hash(&self) -> String {
        let digest = Sha256::digest(self.cache_key().as_bytes());
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Parse a `START-END` line range as given on the command line.
pub fn parse_line_range(s: &str) -> Result<(usize, usize), ConfigError> {
    let invalid = |reason| ConfigError::LineRange {
        start: 0,
        end: 0,
        reason,
    };
    let (start, end) = s.split_once('-').ok_or(invalid("expected START-END"))?;
    let start: usize = start
        .trim()
        .parse()
        .map_err(|_| invalid("start is not a number"))?;
    let end: usize = end
        .trim()
        .parse()
        .map_err(|_| invalid("end is not a number"))?;
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FormatConfig::default();
        assert_eq!(config.line_length, 88);
        assert!(config.target_versions.is_empty());
        assert!(config.normalizes_strings());
        assert!(config.magic_trailing_comma);
        assert!(config.preview.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_skip_string_normalization_wins() {
        let config = FormatConfig {
            skip_string_normalization: true,
            ..Default::default()
        };
        assert!(!config.normalizes_strings());
    }

    #[test]
    fn test_invalid_line_length() {
        let config = FormatConfig::default().with_line_length(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::LineLength { got: 0, .. })
        ));
    }

    #[test]
    fn test_invalid_line_range() {
        let config = FormatConfig::default().with_line_ranges(vec![(5, 2)]);
        assert!(config.validate().is_err());
        let config = FormatConfig::default().with_line_ranges(vec![(0, 2)]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cache_key_is_order_independent() {
        let a = FormatConfig::default()
            .with_target_versions([TargetVersion::Py38, TargetVersion::Py36]);
        let b = FormatConfig::default()
            .with_target_versions([TargetVersion::Py36, TargetVersion::Py38]);
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 64);
        assert!(a.cache_key().starts_with("py36,py38.88."));
    }

    #[test]
    fn test_cache_key_changes_with_options() {
        let a = FormatConfig::default();
        let b = FormatConfig::default().with_preview(Preview::StringProcessing);
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_target_version_from_str() {
        assert_eq!("py38".parse::<TargetVersion>(), Ok(TargetVersion::Py38));
        assert_eq!("PY27".parse::<TargetVersion>(), Ok(TargetVersion::Py27));
        assert!("py99".parse::<TargetVersion>().is_err());
    }

    #[test]
    fn test_supports_feature() {
        let py3: BTreeSet<_> = [TargetVersion::Py36, TargetVersion::Py38].into();
        assert!(supports_feature(&py3, Feature::FStrings));
        assert!(!supports_feature(&py3, Feature::AssignmentExpressions));
        assert!(supports_feature(&BTreeSet::new(), Feature::AssignmentExpressions));
    }

    #[test]
    fn test_parse_line_range() {
        assert_eq!(parse_line_range("3-10"), Ok((3, 10)));
        assert!(parse_line_range("3").is_err());
        assert!(parse_line_range("a-b").is_err());
    }
}
