//! # pyfmt - Deterministic Python Code Formatter
//!
//! pyfmt rewrites Python source into one canonical layout. Lines are kept
//! within a width budget by splitting at brackets and operators, blank lines
//! and comments are normalized, and string literals get consistent prefixes
//! and quotes. Every result is checked: the output must parse to the same
//! abstract tree as the input, and formatting it again must not change it.
//!
//! ## Usage
//!
//! ### As a Library
//!
//! ```rust
//! use pyfmt::config::FormatConfig;
//! use pyfmt::formatter::format;
//!
//! let source = "def f(a,b):\n  return a+b\n";
//! let formatted = format(source, &FormatConfig::default()).unwrap();
//! assert_eq!(formatted.text, "def f(a, b):\n    return a + b\n");
//! assert!(formatted.changed);
//! ```
//!
//! ### As a CLI Tool
//!
//! The `pyfmt` binary formats files and directories in place, prints to
//! stdout, or only checks. See `pyfmt --help`.
//!
//! ## Modules
//!
//! - [`tokenizer`] and [`parser`] - lossless tokenizing and parsing into a [`tree::Tree`]
//! - [`linegen`], [`lines`] and [`split`] - logical lines, blank lines and line splitting
//! - [`comments`], [`normalize`] and [`strings`] - comment handling and token normalization
//! - [`string_split`] - preview string merging and splitting
//! - [`ranges`] - formatting only selected lines
//! - [`verify`] - equivalence and stability checks
//! - [`formatter`] - the pipeline and public API

/// Error types shared across the pipeline
pub mod error;

/// Formatting options and target versions
pub mod config;

/// Lossless Python tokenizer
pub mod tokenizer;

/// Token kinds and grammar productions
pub mod grammar;

/// Arena-backed concrete syntax tree
pub mod tree;

/// Parser producing a concrete syntax tree
pub mod parser;

/// Node classification queries
pub mod nodes;

/// Comment extraction and `fmt: off` regions
pub mod comments;

/// String prefix, quote and docstring normalization
pub mod strings;

/// Invisible parentheses and numeric literals
pub mod normalize;

/// Line ranges and the lines outside them
pub mod ranges;

/// Logical lines, bracket tracking and blank lines
pub mod lines;

/// Tree to logical lines
pub mod linegen;

/// Splitting lines that do not fit
pub mod split;

/// Merging and splitting string literals
pub mod string_split;

/// Equivalence and stability checks
pub mod verify;

/// Core formatting pipeline and public API
pub mod formatter;

/// Tree dumps for troubleshooting
pub mod debug;
