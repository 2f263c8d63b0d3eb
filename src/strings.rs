//! String and number literal helpers.
//!
//! Everything here works on the literal text of a single leaf and returns the
//! rewritten text; callers decide whether to store it back into the tree.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use unicode_width::UnicodeWidthChar;

/// Characters that may precede the opening quote of a string literal.
pub const STRING_PREFIX_CHARS: &str = "furbFURB";

/// The prefix letters of a string literal, as written.
pub fn get_string_prefix(literal: &str) -> &str {
    let end = literal
        .find(|c: char| !STRING_PREFIX_CHARS.contains(c))
        .unwrap_or(literal.len());
    &literal[..end]
}

/// The literal opens with three quote characters.
pub fn has_triple_quotes(literal: &str) -> bool {
    let body = &literal[get_string_prefix(literal).len()..];
    body.starts_with("\"\"\"") || body.starts_with("'''")
}

/// A triple-quoted literal that spans more than one line.
pub fn is_multiline_string(literal: &str) -> bool {
    has_triple_quotes(literal) && literal.contains('\n')
}

/// Lowercase the prefix letters, except a capital `R`.
///
/// With `remove_u_prefix`, a `u` prefix is dropped altogether.
pub fn normalize_string_prefix(literal: &str, remove_u_prefix: bool) -> String {
    let prefix = get_string_prefix(literal);
    let mut new_prefix: String = prefix
        .chars()
        .map(|c| match c {
            'F' | 'B' | 'U' => c.to_ascii_lowercase(),
            _ => c,
        })
        .collect();
    if remove_u_prefix {
        new_prefix.retain(|c| c != 'u');
    }
    format!("{new_prefix}{}", &literal[prefix.len()..])
}

struct QuoteRewrite {
    orig_quote: &'static str,
    new_quote: &'static str,
    unescaped_new: Regex,
    escaped_new: Regex,
    escaped_orig: Regex,
}

impl QuoteRewrite {
    fn new(orig_quote: &'static str, new_quote: &'static str) -> Self {
        let compile = |pattern: String| Regex::new(&pattern).unwrap_or_else(|e| panic!("{e}"));
        Self {
            orig_quote,
            new_quote,
            unescaped_new: compile(format!(r"(([^\\]|^)(\\\\)*){new_quote}")),
            escaped_new: compile(format!(r"([^\\]|^)\\((?:\\\\)*){new_quote}")),
            escaped_orig: compile(format!(r"([^\\]|^)\\((?:\\\\)*){orig_quote}")),
        }
    }
}

static SINGLE_TO_DOUBLE: Lazy<QuoteRewrite> = Lazy::new(|| QuoteRewrite::new("'", "\""));
static DOUBLE_TO_SINGLE: Lazy<QuoteRewrite> = Lazy::new(|| QuoteRewrite::new("\"", "'"));
static TRIPLE_SINGLE_TO_DOUBLE: Lazy<QuoteRewrite> = Lazy::new(|| QuoteRewrite::new("'''", "\"\"\""));

static FSTRING_EXPRESSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:[^{]|^)\{([^{].*?)\}(?:[^}]|$)").unwrap_or_else(|e| panic!("{e}")));

/// Replace twice so that overlapping matches are all rewritten.
fn sub_twice(regex: &Regex, replacement: &str, original: &str) -> String {
    let once = regex.replace_all(original, replacement);
    regex.replace_all(&once, replacement).into_owned()
}

/// Prefer double quotes, but only if that does not add backslashes.
///
/// Escapes made unnecessary by the change of quotes are removed. Raw strings
/// are only requoted when the body holds no quote that would need escaping,
/// and f-strings are left alone when requoting would put a backslash inside a
/// replacement field.
pub fn normalize_string_quotes(literal: &str) -> String {
    let value = literal.trim_start_matches(|c| STRING_PREFIX_CHARS.contains(c));
    let rewrite: &QuoteRewrite = if value.starts_with("\"\"\"") {
        return literal.to_string();
    } else if value.starts_with("'''") {
        &TRIPLE_SINGLE_TO_DOUBLE
    } else if value.starts_with('"') {
        &DOUBLE_TO_SINGLE
    } else {
        &SINGLE_TO_DOUBLE
    };
    let (orig_quote, new_quote) = (rewrite.orig_quote, rewrite.new_quote);
    let Some(first_quote_pos) = literal.find(orig_quote) else {
        return literal.to_string();
    };
    let prefix = &literal[..first_quote_pos];
    let body_start = first_quote_pos + orig_quote.len();
    let Some(body_end) = literal.len().checked_sub(orig_quote.len()) else {
        return literal.to_string();
    };
    if body_end < body_start {
        return literal.to_string();
    }
    let mut body = literal[body_start..body_end].to_string();
    let mut current = literal.to_string();
    let new_body = if prefix.to_ascii_lowercase().contains('r') {
        if rewrite.unescaped_new.is_match(&body) {
            return current;
        }
        body.clone()
    } else {
        let unescaped = sub_twice(&rewrite.escaped_new, &format!("${{1}}${{2}}{new_quote}"), &body);
        if unescaped != body {
            body = unescaped;
            current = format!("{prefix}{orig_quote}{body}{orig_quote}");
        }
        let new_body = sub_twice(&rewrite.escaped_orig, &format!("${{1}}${{2}}{orig_quote}"), &body);
        sub_twice(&rewrite.unescaped_new, &format!("${{1}}\\{new_quote}"), &new_body)
    };
    if prefix.to_ascii_lowercase().contains('f') {
        let backslash_in_field = FSTRING_EXPRESSION
            .captures_iter(&new_body)
            .any(|m| m.get(1).is_some_and(|field| field.as_str().contains('\\')));
        if backslash_in_field {
            return current;
        }
    }
    let mut new_body = new_body;
    if new_quote == "\"\"\"" && new_body.ends_with('"') {
        new_body.pop();
        new_body.push_str("\\\"");
    }
    let orig_escape_count = body.matches('\\').count();
    let new_escape_count = new_body.matches('\\').count();
    if new_escape_count > orig_escape_count {
        return current;
    }
    if new_escape_count == orig_escape_count && orig_quote == "\"" {
        return current;
    }
    format!("{prefix}{new_quote}{new_body}{new_quote}")
}

static UNICODE_ESCAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?P<backslashes>\\+)(?P<body>x(?P<x>[a-fA-F0-9]{2})|u(?P<u>[a-fA-F0-9]{4})|U(?P<U>[a-fA-F0-9]{8})|N\{(?P<N>[^}]+)\})",
    )
    .unwrap_or_else(|e| panic!("{e}"))
});

/// Lowercase hex digits in `\x`, `\u` and `\U` escapes and uppercase `\N{...}` names.
pub fn normalize_unicode_escape_sequences(literal: &str) -> String {
    let prefix = get_string_prefix(literal).to_ascii_lowercase();
    if prefix.contains('r') {
        return literal.to_string();
    }
    let is_bytes = prefix.contains('b');
    UNICODE_ESCAPE
        .replace_all(literal, |caps: &Captures<'_>| {
            let backslashes = &caps["backslashes"];
            let body = &caps["body"];
            if backslashes.len() % 2 == 0 {
                return format!("{backslashes}{body}");
            }
            if let Some(x) = caps.name("x") {
                return format!("{backslashes}x{}", x.as_str().to_ascii_lowercase());
            }
            if is_bytes {
                return format!("{backslashes}{body}");
            }
            if let Some(u) = caps.name("u") {
                format!("{backslashes}u{}", u.as_str().to_ascii_lowercase())
            } else if let Some(u) = caps.name("U") {
                format!("{backslashes}U{}", u.as_str().to_ascii_lowercase())
            } else {
                format!("{backslashes}N{{{}}}", caps["N"].to_uppercase())
            }
        })
        .into_owned()
}

fn format_float_or_int_string(text: &str) -> String {
    match text.split_once('.') {
        None => text.to_string(),
        Some((before, after)) => {
            let before = if before.is_empty() { "0" } else { before };
            let after = if after.is_empty() { "0" } else { after };
            format!("{before}.{after}")
        }
    }
}

/// Canonical spelling of a numeric literal.
///
/// Letters are lowercased except hex digits, which are uppercased, and the
/// Python 2 long suffix, which becomes `L`. Floats get a digit on both sides
/// of the dot.
pub fn normalize_numeric_literal(literal: &str) -> String {
    let text = literal.to_ascii_lowercase();
    if text.starts_with("0b") || text.starts_with("0o") {
        text
    } else if let Some(digits) = text.strip_prefix("0x") {
        format!("0x{}", digits.to_ascii_uppercase())
    } else if let Some((before, after)) = text.split_once('e') {
        let (sign, exponent) = match after.strip_prefix('-') {
            Some(rest) => ("-", rest),
            None => ("", after.strip_prefix('+').unwrap_or(after)),
        };
        format!("{}e{sign}{exponent}", format_float_or_int_string(before))
    } else if let Some(number) = text.strip_suffix('j') {
        format!("{}j", format_float_or_int_string(number))
    } else if let Some(number) = text.strip_suffix('l') {
        format!("{}L", format_float_or_int_string(number))
    } else {
        format_float_or_int_string(&text)
    }
}

fn expand_tabs(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut column = 0;
    for c in line.chars() {
        if c == '\t' {
            let spaces = 8 - column % 8;
            out.extend(std::iter::repeat_n(' ', spaces));
            column += spaces;
        } else {
            out.push(c);
            column += 1;
        }
    }
    out
}

/// Expand tabs in the leading whitespace of each line, leaving inline tabs.
fn lines_with_leading_tabs_expanded(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| {
            let indent_end = line.find(|c: char| !c.is_whitespace()).unwrap_or(line.len());
            let (indent, rest) = line.split_at(indent_end);
            if indent.contains('\t') && !rest.is_empty() {
                format!("{}{rest}", expand_tabs(indent))
            } else {
                line.to_string()
            }
        })
        .collect()
}

/// Reindent a docstring body so that its lines start at `prefix`.
///
/// The first line is stripped; the common indentation of the remaining lines
/// is replaced with `prefix` and trailing whitespace is dropped.
pub fn fix_docstring(docstring: &str, prefix: &str) -> String {
    if docstring.is_empty() {
        return String::new();
    }
    let lines = lines_with_leading_tabs_expanded(docstring);
    let indent = lines
        .iter()
        .skip(1)
        .filter_map(|line| {
            let stripped = line.trim_start();
            (!stripped.is_empty()).then(|| line.chars().count() - stripped.chars().count())
        })
        .min();
    let mut trimmed = vec![lines.first().map_or("", |l| l.trim()).to_string()];
    if let Some(indent) = indent {
        let last_line_idx = lines.len().saturating_sub(2);
        for (i, line) in lines.iter().skip(1).enumerate() {
            let stripped_line = line.char_indices().nth(indent).map_or("", |(at, _)| &line[at..]).trim_end();
            if !stripped_line.is_empty() || i == last_line_idx {
                trimmed.push(format!("{prefix}{stripped_line}"));
            } else {
                trimmed.push(String::new());
            }
        }
    }
    trimmed.join("\n")
}

/// Display width of `text`; East Asian wide characters count as two columns.
pub fn str_width(text: &str) -> usize {
    if text.is_ascii() {
        return text.len();
    }
    text.chars().map(|c| c.width().unwrap_or(0)).sum()
}

/// Number of leading characters of `text` that fit in `max_width` columns.
pub fn count_chars_in_width(text: &str, max_width: usize) -> usize {
    let mut total = 0;
    for (count, c) in text.chars().enumerate() {
        total += c.width().unwrap_or(0);
        if total > max_width {
            return count;
        }
    }
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes() {
        assert_eq!(get_string_prefix("Rb'x'"), "Rb");
        assert_eq!(normalize_string_prefix("F'x'", false), "f'x'");
        assert_eq!(normalize_string_prefix("Rb'x'", false), "Rb'x'");
        assert_eq!(normalize_string_prefix("U'x'", true), "'x'");
        assert!(has_triple_quotes("rb'''x'''"));
        assert!(!has_triple_quotes("'x'"));
    }

    #[test]
    fn prefers_double_quotes() {
        assert_eq!(normalize_string_quotes("'hello'"), "\"hello\"");
        assert_eq!(normalize_string_quotes("'''doc'''"), "\"\"\"doc\"\"\"");
        assert_eq!(normalize_string_quotes("\"hello\""), "\"hello\"");
        assert_eq!(normalize_string_quotes("f'{x}'"), "f\"{x}\"");
    }

    #[test]
    fn never_adds_escapes() {
        assert_eq!(normalize_string_quotes("'say \"hi\"'"), "'say \"hi\"'");
        assert_eq!(normalize_string_quotes("\"it's\""), "\"it's\"");
        assert_eq!(normalize_string_quotes("'it\\'s'"), "\"it's\"");
        assert_eq!(normalize_string_quotes("r'\"'"), "r'\"'");
        assert_eq!(normalize_string_quotes("'''x\"'''"), "'''x\"'''");
    }

    #[test]
    fn unnecessary_escapes_removed() {
        assert_eq!(normalize_string_quotes("'\\\"'"), "'\"'");
        assert_eq!(normalize_string_quotes("\"\\'\""), "\"'\"");
    }

    #[test]
    fn numbers() {
        assert_eq!(normalize_numeric_literal("0XABCDEF"), "0xABCDEF");
        assert_eq!(normalize_numeric_literal("0O777"), "0o777");
        assert_eq!(normalize_numeric_literal("1E5"), "1e5");
        assert_eq!(normalize_numeric_literal("1.E+5"), "1.0e5");
        assert_eq!(normalize_numeric_literal("10l"), "10L");
        assert_eq!(normalize_numeric_literal("10J"), "10j");
        assert_eq!(normalize_numeric_literal(".5"), "0.5");
        assert_eq!(normalize_numeric_literal("1_000"), "1_000");
    }

    #[test]
    fn unicode_escapes() {
        assert_eq!(normalize_unicode_escape_sequences("'\\xAB'"), "'\\xab'");
        assert_eq!(normalize_unicode_escape_sequences("'\\N{bullet}'"), "'\\N{BULLET}'");
        assert_eq!(normalize_unicode_escape_sequences("'\\\\xAB'"), "'\\\\xAB'");
        assert_eq!(normalize_unicode_escape_sequences("r'\\xAB'"), "r'\\xAB'");
        assert_eq!(normalize_unicode_escape_sequences("b'\\uABCD'"), "b'\\uABCD'");
    }

    #[test]
    fn docstring_reindent() {
        let fixed = fix_docstring("Summary.\n\n      Details\n        more\n      ", "    ");
        assert_eq!(fixed, "Summary.\n\n    Details\n      more\n    ");
        assert_eq!(fix_docstring("  single  ", "    "), "single");
        assert_eq!(fix_docstring("a\n\tb", ""), "a\nb");
        let fixed = fix_docstring("a\n    \u{a0}   b\n\u{a0}\u{a0}\u{a0}\u{a0}\u{a0}\u{a0}\u{a0}c\n    ", "    ");
        assert_eq!(fixed, "a\n     b\n    c\n    ");
    }

    #[test]
    fn widths() {
        assert_eq!(str_width("abc"), 3);
        assert_eq!(str_width("日本"), 4);
        assert_eq!(count_chars_in_width("日本語", 4), 2);
        assert_eq!(count_chars_in_width("abc", 10), 3);
    }
}
