//! Lexical analysis
//!
//! [`tokenize`] turns source text into a lazy stream of [`Token`]s. Everything
//! between two tokens (whitespace, comments, blank lines, backslash
//! continuations) is carried as the `prefix` of the following token, so
//! concatenating `prefix + value` over the whole stream reproduces the input
//! byte for byte.
//!
//! Indentation follows the significant-whitespace rules of the language: an
//! `INDENT` token opens a block and a `DEDENT` token closes one. Comments that
//! sit between the end of a block and the next statement are split between
//! the two: lines indented at least as deep as the block being closed stay in
//! the `DEDENT` prefix, the rest move on to the next statement.

use crate::error::TokenizeError;
use crate::grammar::TokenKind;
use logos::{Lexer, Logos};
use std::collections::VecDeque;

/// One lexical token with its leading trivia.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub prefix: String,
    /// 1-based line, 0-based column (in characters).
    pub start: (usize, usize),
    pub end: (usize, usize),
}

/// Regular token classes. String bodies, indentation and bracket depth are
/// handled on top of this by [`Tokenizer`].
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
enum Lexeme {
    #[regex(r"[ \t\x0c]+")]
    Space,

    #[regex(r"\\(\r\n|\r|\n)")]
    Continuation,

    #[regex(r"#[^\r\n]*", allow_greedy = true)]
    Comment,

    #[regex(r"\r\n|\r|\n")]
    LineBreak,

    #[regex(r"[_\p{XID_Start}]\p{XID_Continue}*")]
    Name,

    #[regex(r"0[xXoObB][0-9a-fA-F_]+[lL]?")]
    #[regex(r"([0-9][0-9_]*(\.[0-9_]*)?|\.[0-9][0-9_]*)([eE][+-]?[0-9][0-9_]*)?[jJlL]?")]
    Number,

    /// String prefix and opening quote.
    #[regex(r#"([rRuUbBfF]|[bB][rR]|[rR][bB]|[fF][rR]|[rR][fF]|[uU][rR])?['"]"#)]
    StringStart,

    #[token("(")]
    #[token("[")]
    #[token("{")]
    Open,

    #[token(")")]
    #[token("]")]
    #[token("}")]
    Close,

    #[token("**=")]
    #[token("//=")]
    #[token(">>=")]
    #[token("<<=")]
    #[token("**")]
    #[token("//")]
    #[token("<<")]
    #[token(">>")]
    #[token("<=")]
    #[token(">=")]
    #[token("==")]
    #[token("!=")]
    #[token("<>")]
    #[token("->")]
    #[token("+=")]
    #[token("-=")]
    #[token("*=")]
    #[token("/=")]
    #[token("%=")]
    #[token("&=")]
    #[token("|=")]
    #[token("^=")]
    #[token("@=")]
    #[token(":=")]
    #[token("+")]
    #[token("-")]
    #[token("*")]
    #[token("/")]
    #[token("%")]
    #[token("&")]
    #[token("|")]
    #[token("^")]
    #[token("~")]
    #[token("<")]
    #[token(">")]
    #[token(",")]
    #[token(":")]
    #[token(";")]
    #[token(".")]
    #[token("=")]
    #[token("@")]
    Operator,

    /// Only valid as an f-string conversion marker.
    #[token("!")]
    Bang,
}

/// Pieces of a string literal body.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
enum Piece {
    #[regex(r"\\([^\r\n{}]|\r\n|\r|\n)")]
    Escape,

    #[regex(r#"\\N\{[^}\r\n'"]*\}"#)]
    NamedEscape,

    /// A backslash that does not escape the brace after it.
    #[token("\\")]
    Backslash,

    #[token("{{")]
    DoubledOpen,

    #[token("}}")]
    DoubledClose,

    #[token("{")]
    FieldOpen,

    #[token("}")]
    FieldClose,

    #[regex(r"'+")]
    #[regex(r#""+"#)]
    Quotes,

    #[regex(r"\r\n|\r|\n")]
    LineBreak,

    #[regex(r#"[^\\{}'"\r\n]+"#)]
    Text,
}

#[derive(Debug, Clone, Copy)]
struct IndentLevel {
    /// Width with tabs expanded to multiples of eight.
    width: usize,
    /// Width with tabs counted as one column, to detect ambiguous mixes.
    narrow: usize,
    /// Raw character count, used when splitting prefixes at a dedent.
    chars: usize,
}

/// Lazy token stream over a source string. Restartable only from scratch.
pub struct Tokenizer<'a> {
    src: &'a str,
    lexer: Lexer<'a, Lexeme>,
    line: usize,
    line_start: usize,
    indents: Vec<IndentLevel>,
    depth: usize,
    at_line_start: bool,
    prefix: String,
    pending: VecDeque<Token>,
    done: bool,
}

/// Start tokenizing `src`.
///
/// # Example
///
/// ```rust
/// use pyfmt::grammar::TokenKind;
/// use pyfmt::tokenizer::tokenize;
///
/// let kinds: Vec<TokenKind> = tokenize("x = 1\n")
///     .map(|t| t.unwrap().kind)
///     .collect();
/// assert_eq!(
///     kinds,
///     [TokenKind::Name, TokenKind::Equal, TokenKind::Number, TokenKind::Newline, TokenKind::EndMarker]
/// );
/// ```
pub fn tokenize(src: &str) -> Tokenizer<'_> {
    Tokenizer {
        src,
        lexer: Lexeme::lexer(src),
        line: 1,
        line_start: 0,
        indents: vec![IndentLevel {
            width: 0,
            narrow: 0,
            chars: 0,
        }],
        depth: 0,
        at_line_start: true,
        prefix: String::new(),
        pending: VecDeque::new(),
        done: false,
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Result<Token, TokenizeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(tok) = self.pending.pop_front() {
            return Some(Ok(tok));
        }
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(()) => self.pending.pop_front().map(Ok),
            Err(err) => {
                self.done = true;
                self.pending.clear();
                Some(Err(err))
            }
        }
    }
}

impl<'a> Tokenizer<'a> {
    fn pos(&self) -> usize {
        self.lexer.span().end
    }

    fn position_of(&self, idx: usize) -> (usize, usize) {
        let line = self.src[..idx].matches('\n').count() + 1;
        let line_start = self.src[..idx].rfind('\n').map_or(0, |i| i + 1);
        (line, self.src[line_start..idx].chars().count())
    }

    /// Position of `idx`, which must not lie past an untracked newline.
    fn here(&self, idx: usize) -> (usize, usize) {
        (self.line, self.src[self.line_start..idx].chars().count())
    }

    fn error_at(&self, idx: usize, reason: impl Into<String>) -> TokenizeError {
        let (line, column) = self.position_of(idx);
        TokenizeError {
            reason: reason.into(),
            line,
            column,
        }
    }

    fn track_lines(&mut self, from: usize, to: usize) {
        for (i, c) in self.src[from..to].char_indices() {
            if c == '\n' {
                self.line += 1;
                self.line_start = from + i + 1;
            }
        }
    }

    /// Move the lexer to `end` without lexing the text in between.
    fn bump_to(&mut self, end: usize) {
        let pos = self.pos();
        if end > pos {
            self.lexer.bump(end - pos);
        }
    }

    fn trivia(&mut self, from: usize, to: usize) {
        self.track_lines(from, to);
        self.prefix.push_str(&self.src[from..to]);
    }

    /// Queue a token with no text of its own (`INDENT`, `DEDENT`).
    fn push_marker(&mut self, kind: TokenKind, prefix: String) {
        let at = self.here(self.pos());
        self.pending.push_back(Token {
            kind,
            value: String::new(),
            prefix,
            start: at,
            end: at,
        });
    }

    fn push_text(&mut self, kind: TokenKind, from: usize, to: usize) {
        let start = self.here(from);
        self.track_lines(from, to);
        let prefix = std::mem::take(&mut self.prefix);
        self.pending.push_back(Token {
            kind,
            value: self.src[from..to].to_string(),
            prefix,
            start,
            end: self.here(to),
        });
    }

    /// Scan until at least one token is queued.
    fn advance(&mut self) -> Result<(), TokenizeError> {
        loop {
            if self.at_line_start && self.depth == 0 {
                if self.scan_line_start()? {
                    return Ok(());
                }
                continue;
            }
            let Some(lexeme) = self.lexer.next() else {
                return self.finish();
            };
            let span = self.lexer.span();
            let (from, to) = (span.start, span.end);
            match lexeme {
                Ok(Lexeme::Space | Lexeme::Continuation | Lexeme::Comment) => self.trivia(from, to),
                Ok(Lexeme::LineBreak) if self.depth > 0 => self.trivia(from, to),
                Ok(Lexeme::LineBreak) => {
                    self.push_text(TokenKind::Newline, from, to);
                    self.at_line_start = true;
                    return Ok(());
                }
                Ok(Lexeme::Name) => {
                    self.push_text(TokenKind::Name, from, to);
                    return Ok(());
                }
                Ok(Lexeme::Number) => {
                    self.push_text(TokenKind::Number, from, to);
                    return Ok(());
                }
                Ok(Lexeme::StringStart) => {
                    let mut scanner = StringScanner::new(self.src);
                    let end = scanner
                        .literal_end(from, to)
                        .map_err(|err| self.error_at(err.at, err.reason))?;
                    self.bump_to(end);
                    self.push_text(TokenKind::String, from, end);
                    return Ok(());
                }
                Ok(lexeme @ (Lexeme::Open | Lexeme::Close | Lexeme::Operator)) => {
                    match lexeme {
                        Lexeme::Open => self.depth += 1,
                        Lexeme::Close => self.depth = self.depth.saturating_sub(1),
                        _ => {}
                    }
                    let kind = TokenKind::for_operator(&self.src[from..to]);
                    self.push_text(kind, from, to);
                    return Ok(());
                }
                Ok(Lexeme::Bang) | Err(()) => {
                    let rest = &self.src[from..];
                    if rest.starts_with('\\') {
                        return Err(self.error_at(from, "unexpected character after line continuation"));
                    }
                    let c = rest.chars().next().unwrap_or('\0');
                    return Err(self.error_at(from, format!("invalid character {c:?}")));
                }
            }
        }
    }

    /// Handle indentation at the start of a logical line.
    ///
    /// Returns true when a token was queued.
    fn scan_line_start(&mut self) -> Result<bool, TokenizeError> {
        let start = self.pos();
        let mut ahead = self.lexer.clone();
        let mut next = ahead.next();
        let mut end = start;
        if next == Some(Ok(Lexeme::Space)) {
            end = ahead.span().end;
            next = ahead.next();
        }
        match next {
            None => {
                self.trivia(start, end);
                self.bump_to(end);
                self.finish()?;
                Ok(true)
            }
            Some(Ok(Lexeme::Comment | Lexeme::LineBreak)) => {
                let mut line_end = ahead.span().end;
                if next == Some(Ok(Lexeme::Comment)) && ahead.next() == Some(Ok(Lexeme::LineBreak)) {
                    line_end = ahead.span().end;
                }
                self.trivia(start, line_end);
                self.bump_to(line_end);
                Ok(false)
            }
            Some(_) => {
                self.trivia(start, end);
                self.bump_to(end);
                self.at_line_start = false;
                self.indent_to(measure_indent(&self.src[start..end]), end)
            }
        }
    }

    fn indent_to(&mut self, level: IndentLevel, at: usize) -> Result<bool, TokenizeError> {
        let top = self.indents.last().copied().unwrap_or(IndentLevel {
            width: 0,
            narrow: 0,
            chars: 0,
        });
        if (level.width > top.width) != (level.narrow > top.narrow)
            || (level.width == top.width) != (level.narrow == top.narrow)
        {
            return Err(self.error_at(at, "inconsistent use of tabs and spaces in indentation"));
        }
        if level.width > top.width {
            self.indents.push(level);
            self.push_marker(TokenKind::Indent, String::new());
            return Ok(true);
        }
        if level.width == top.width {
            return Ok(false);
        }
        if !self.indents.iter().any(|l| l.width == level.width) {
            return Err(self.error_at(at, "unindent does not match any outer indentation level"));
        }
        while self.indents.last().is_some_and(|l| l.width > level.width) {
            let Some(closed) = self.indents.pop() else {
                break;
            };
            self.push_dedent(closed);
        }
        Ok(true)
    }

    fn push_dedent(&mut self, closed: IndentLevel) {
        let (mine, rest) = partially_consume_prefix(&self.prefix, closed.chars);
        self.prefix = rest;
        self.push_marker(TokenKind::Dedent, mine);
    }

    /// End of input: close the last line and every open block.
    fn finish(&mut self) -> Result<(), TokenizeError> {
        let pos = self.pos();
        if self.depth > 0 {
            return Err(self.error_at(pos, "unexpected EOF in multi-line statement"));
        }
        if !self.at_line_start {
            self.push_text(TokenKind::Newline, pos, pos);
            self.at_line_start = true;
        }
        while self.indents.len() > 1 {
            let Some(closed) = self.indents.pop() else {
                break;
            };
            self.push_dedent(closed);
        }
        self.push_text(TokenKind::EndMarker, pos, pos);
        self.done = true;
        Ok(())
    }
}

fn measure_indent(whitespace: &str) -> IndentLevel {
    let mut level = IndentLevel {
        width: 0,
        narrow: 0,
        chars: 0,
    };
    for c in whitespace.chars() {
        match c {
            '\t' => {
                level.width = (level.width / 8 + 1) * 8;
                level.narrow += 1;
            }
            '\x0c' => {
                level.width = 0;
                level.narrow = 0;
            }
            _ => {
                level.width += 1;
                level.narrow += 1;
            }
        }
        level.chars += 1;
    }
    level
}

#[derive(Debug)]
struct ScanError {
    at: usize,
    reason: &'static str,
}

/// Quoting of one string literal, read from its prefix and opening quote.
#[derive(Debug, Clone, Copy)]
struct Quoting {
    quote: char,
    triple: bool,
    raw: bool,
    formatted: bool,
}

/// Finds where string literals end. Replacement fields of f-strings are
/// lexed as expressions, so literals nested inside them may reuse the
/// enclosing quote.
struct StringScanner<'a> {
    src: &'a str,
    /// A nested literal reused the quote of the literal around it.
    reuses_quotes: bool,
}

impl<'a> StringScanner<'a> {
    fn new(src: &'a str) -> Self {
        StringScanner {
            src,
            reuses_quotes: false,
        }
    }

    /// End of the literal at `start`, whose prefix and first quote end at `quote_end`.
    fn literal_end(&mut self, start: usize, quote_end: usize) -> Result<usize, ScanError> {
        self.quoting_and_end(start, quote_end).map(|(_, end)| end)
    }

    fn quoting_and_end(&mut self, start: usize, quote_end: usize) -> Result<(Quoting, usize), ScanError> {
        let prefix = self.src[start..quote_end - 1].to_ascii_lowercase();
        let quote = if self.src[..quote_end].ends_with('"') { '"' } else { '\'' };
        let doubled = if quote == '"' { "\"\"" } else { "''" };
        let triple = self.src[quote_end..].starts_with(doubled);
        let quoting = Quoting {
            quote,
            triple,
            raw: prefix.contains('r'),
            formatted: prefix.contains('f'),
        };
        let body = if triple { quote_end + 2 } else { quote_end };
        let end = self.body_end(body, quoting, start)?;
        Ok((quoting, end))
    }

    fn unterminated(start: usize) -> ScanError {
        ScanError {
            at: start,
            reason: "unterminated string literal",
        }
    }

    fn body_end(&mut self, mut base: usize, quoting: Quoting, start: usize) -> Result<usize, ScanError> {
        let mut pieces = Piece::lexer(&self.src[base..]);
        loop {
            let Some(piece) = pieces.next() else {
                return Err(Self::unterminated(start));
            };
            let span = pieces.span();
            let (from, to) = (base + span.start, base + span.end);
            match piece {
                Ok(Piece::Quotes) if self.src[from..].starts_with(quoting.quote) => {
                    let needed = if quoting.triple { 3 } else { 1 };
                    if to - from >= needed {
                        return Ok(from + needed);
                    }
                }
                Ok(Piece::LineBreak) if !quoting.triple => return Err(Self::unterminated(start)),
                Ok(Piece::FieldOpen) if quoting.formatted => {
                    base = self.field_end(to, quoting, start)?;
                    pieces = Piece::lexer(&self.src[base..]);
                }
                Ok(Piece::NamedEscape) if quoting.formatted && quoting.raw => {
                    // `\N` is not an escape in a raw string, so the brace opens a field.
                    base = from + 2;
                    pieces = Piece::lexer(&self.src[base..]);
                }
                _ => {}
            }
        }
    }

    /// End of a replacement field; `at` is just past its `{`.
    fn field_end(&mut self, at: usize, outer: Quoting, start: usize) -> Result<usize, ScanError> {
        let mut lexer = Lexeme::lexer(&self.src[at..]);
        let mut depth = 0usize;
        while let Some(lexeme) = lexer.next() {
            let span = lexer.span();
            let (from, to) = (at + span.start, at + span.end);
            match lexeme {
                Ok(Lexeme::StringStart) => {
                    let (nested, end) = self.quoting_and_end(from, to)?;
                    if nested.quote == outer.quote && (!outer.triple || nested.triple) {
                        self.reuses_quotes = true;
                    }
                    lexer.bump(end - to);
                }
                Ok(Lexeme::Open) => depth += 1,
                Ok(Lexeme::Close) if depth == 0 => return Ok(to),
                Ok(Lexeme::Close) => depth -= 1,
                Ok(Lexeme::Operator) if depth == 0 && self.src[from..to].starts_with(':') => {
                    return self.format_spec_end(from + 1, outer, start);
                }
                Ok(_) => {}
                Err(()) => {
                    return Err(ScanError {
                        at: from,
                        reason: "invalid character in f-string expression",
                    });
                }
            }
        }
        Err(Self::unterminated(start))
    }

    /// End of a format spec; nested fields are scanned as fields.
    fn format_spec_end(&mut self, mut base: usize, outer: Quoting, start: usize) -> Result<usize, ScanError> {
        let mut pieces = Piece::lexer(&self.src[base..]);
        loop {
            let Some(piece) = pieces.next() else {
                return Err(Self::unterminated(start));
            };
            let span = pieces.span();
            let (from, to) = (base + span.start, base + span.end);
            match piece {
                Ok(Piece::FieldClose | Piece::DoubledClose) => return Ok(from + 1),
                Ok(Piece::FieldOpen) => {
                    base = self.field_end(to, outer, start)?;
                    pieces = Piece::lexer(&self.src[base..]);
                }
                Ok(Piece::LineBreak) if !outer.triple => return Err(Self::unterminated(start)),
                _ => {}
            }
        }
    }
}

/// Whether a string literal nests literals that reuse its own quote inside
/// its replacement fields, which older grammars cannot read.
pub fn nests_own_quotes(literal: &str) -> bool {
    let mut lexer = Lexeme::lexer(literal);
    if lexer.next() != Some(Ok(Lexeme::StringStart)) {
        return false;
    }
    let mut scanner = StringScanner::new(literal);
    scanner.literal_end(0, lexer.span().end).is_ok() && scanner.reuses_quotes
}

/// Split a prefix at a dedent to `column`.
///
/// Leading comment lines indented at least `column` deep still belong to the
/// block being closed; everything from the first shallower comment on
/// belongs to whatever follows.
pub(crate) fn partially_consume_prefix(prefix: &str, column: usize) -> (String, String) {
    let mut consumed = 0;
    let mut current_column = 0;
    let mut wait_for_nl = false;
    for (i, ch) in prefix.char_indices() {
        if wait_for_nl {
            if ch == '\n' {
                if current_column < column {
                    break;
                }
                consumed = i + 1;
                current_column = 0;
                wait_for_nl = false;
            }
        } else {
            match ch {
                ' ' => current_column += 1,
                '\t' => current_column += 4,
                '\n' => current_column = 0,
                _ => wait_for_nl = true,
            }
        }
    }
    (prefix[..consumed].to_string(), prefix[consumed..].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        tokenize(src).collect::<Result<Vec<_>, _>>().unwrap()
    }

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokens(src).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn simple_assignment() {
        use TokenKind::*;
        assert_eq!(kinds("x = 1\n"), [Name, Equal, Number, Newline, EndMarker]);
    }

    #[test]
    fn round_trips_prefix_and_value() {
        let src = "# header\n\ndef f(a,  # note\n      b):\n    return a  \\\n        + b\n\n\n# tail\n";
        let out: String = tokens(src)
            .iter()
            .map(|t| format!("{}{}", t.prefix, t.value))
            .collect();
        assert_eq!(out, src);
    }

    #[test]
    fn missing_final_newline_yields_empty_newline() {
        let toks = tokens("pass");
        assert_eq!(toks[1].kind, TokenKind::Newline);
        assert_eq!(toks[1].value, "");
    }

    #[test]
    fn indent_and_dedent() {
        use TokenKind::*;
        assert_eq!(
            kinds("if x:\n    y\nz\n"),
            [Name, Name, Colon, Newline, Indent, Name, Newline, Dedent, Name, Newline, EndMarker]
        );
    }

    #[test]
    fn dedent_keeps_comments_indented_with_the_block() {
        let toks = tokens("if x:\n    y\n    # inner\n# outer\nz\n");
        let dedent = toks.iter().find(|t| t.kind == TokenKind::Dedent).unwrap();
        assert_eq!(dedent.prefix, "    # inner\n");
        let z = toks.iter().find(|t| t.value == "z").unwrap();
        assert_eq!(z.prefix, "# outer\n");
    }

    #[test]
    fn newlines_inside_brackets_are_trivia() {
        use TokenKind::*;
        assert_eq!(
            kinds("f(a,\n  b)\n"),
            [Name, LPar, Name, Comma, Name, RPar, Newline, EndMarker]
        );
    }

    #[test]
    fn string_prefixes_and_triple_quotes() {
        let toks = tokens("x = rb'a\\'b' + '''multi\nline''' + F\"{y}\"\n");
        let strings: Vec<_> = toks
            .iter()
            .filter(|t| t.kind == TokenKind::String)
            .map(|t| t.value.as_str())
            .collect();
        assert_eq!(strings, ["rb'a\\'b'", "'''multi\nline'''", "F\"{y}\""]);
        let last = toks.last().unwrap();
        assert_eq!(last.start.0, 3);
    }

    #[test]
    fn fstring_with_nested_quotes() {
        let toks = tokens("f\"{x[\"key\"]:>{width}}\"\n");
        assert_eq!(toks[0].kind, TokenKind::String);
        assert_eq!(toks[0].value, "f\"{x[\"key\"]:>{width}}\"");
    }

    #[test]
    fn fstring_fields_may_reuse_the_outer_quote() {
        for src in [
            "f\"{x[\"a\"]}\"\n",
            "f\"{f\"{x}\"}\"\n",
            "f'{1:{f'{2}'}}'\n",
            "f\"{'\\''}\"\n",
        ] {
            let toks = tokens(src);
            assert_eq!(toks[0].kind, TokenKind::String, "{src}");
            assert_eq!(toks[0].value, src.trim_end(), "{src}");
            assert_eq!(toks[1].kind, TokenKind::Newline, "{src}");
        }
    }

    #[test]
    fn backslash_before_fstring_brace_is_literal() {
        for src in ["f'{1}\\{{'\n", "f'{2} foo \\{{[\\}}'\n", "rf\"\\{\"a\"}\"\n", "fr'\\N{x}'\n"] {
            let toks = tokens(src);
            assert_eq!(toks[0].value, src.trim_end(), "{src}");
            assert_eq!(toks.len(), 3, "{src}");
        }
        let toks = tokens("f'\\N{BULLET} {x}'\n");
        assert_eq!(toks[0].value, "f'\\N{BULLET} {x}'");
    }

    #[test]
    fn colon_in_fstring_field_starts_spec_only_at_top_level() {
        assert_eq!(tokens("f\"{(x:=10)}\"\n")[0].value, "f\"{(x:=10)}\"");
        assert_eq!(tokens("f\"{x:=10}\"\n")[0].value, "f\"{x:=10}\"");
        assert_eq!(tokens("f'{d[1:2]!r:>{w}}'\n")[0].value, "f'{d[1:2]!r:>{w}}'");
    }

    #[test]
    fn fstring_field_spanning_lines() {
        let toks = tokens("x = f\"foo {\n    2 + 2\n} bar\"\ny\n");
        assert_eq!(toks[2].value, "f\"foo {\n    2 + 2\n} bar\"");
        assert_eq!(toks[2].end, (3, 6));
        let y = toks.iter().find(|t| t.value == "y").unwrap();
        assert_eq!(y.start, (4, 0));
    }

    #[test]
    fn invalid_character_in_fstring_field_is_an_error() {
        let err = tokenize("f'{a $ b}'\n").find_map(Result::err).unwrap();
        assert!(err.reason.contains("f-string"), "{}", err.reason);
        assert_eq!((err.line, err.column), (1, 5));
    }

    #[test]
    fn quote_reuse_is_detected() {
        assert!(nests_own_quotes("f\"{x[\"a\"]}\""));
        assert!(nests_own_quotes("f'{f'{x}'}'"));
        assert!(!nests_own_quotes("f\"{x['a']}\""));
        assert!(!nests_own_quotes("f\"\"\"{x[\"a\"]}\"\"\""));
        assert!(!nests_own_quotes("'plain'"));
    }

    #[test]
    fn numbers() {
        let toks = tokens("a = 0XFF + 1_000.5e-3j + .5 + 10L\n");
        let nums: Vec<_> = toks
            .iter()
            .filter(|t| t.kind == TokenKind::Number)
            .map(|t| t.value.as_str())
            .collect();
        assert_eq!(nums, ["0XFF", "1_000.5e-3j", ".5", "10L"]);
    }

    #[test]
    fn ellipsis_is_three_dots() {
        use TokenKind::*;
        assert_eq!(kinds("...\n"), [Dot, Dot, Dot, Newline, EndMarker]);
    }

    #[test]
    fn walrus_and_arrow() {
        let toks = tokens("def f() -> int: (y := 1)\n");
        assert!(toks.iter().any(|t| t.kind == TokenKind::RArrow));
        assert!(toks.iter().any(|t| t.kind == TokenKind::ColonEqual));
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = tokenize("x = 'abc\n").find_map(Result::err).unwrap();
        assert!(err.reason.contains("unterminated"));
        assert_eq!((err.line, err.column), (1, 4));
    }

    #[test]
    fn bad_dedent_is_an_error() {
        let err = tokenize("if x:\n    a\n  b\n").find_map(Result::err).unwrap();
        assert!(err.reason.contains("unindent"));
        assert_eq!(err.line, 3);
    }

    #[test]
    fn invalid_character_is_an_error() {
        let err = tokenize("a = $b\n").find_map(Result::err).unwrap();
        assert!(err.reason.contains("invalid character"));
    }

    #[test]
    fn stream_stops_after_error() {
        let items: Vec<_> = tokenize("'abc\nx = 1\n").collect();
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }

    #[test]
    fn partially_consume_splits_on_shallow_comment() {
        let (mine, rest) = partially_consume_prefix("    # a\n\n  # b\n", 4);
        assert_eq!(mine, "    # a\n");
        assert_eq!(rest, "\n  # b\n");
    }
}
