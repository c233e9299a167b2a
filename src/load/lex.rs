//! Tokenizing core-image text.
//!
//! A core image is a list of directives and quoted character strings:
//!
//! ```text
//! ; a program and its data
//! .org 333
//! "~M502602~.~}"
//! .org 501 "~AB"
//! .start 333
//! ```
//!
//! The module's key data structure is the [`Token`] enum.

use std::num::IntErrorKind;

use logos::{Lexer, Logos};

/// A unit of information in core-image text.
#[derive(Debug, Logos, PartialEq, Eq)]
#[logos(skip r"[ \t]+", error = LexErr)]
pub enum Token {
    // This regex also matches invalid tokens such as `12ab`,
    // so that they are reported as one bad number.

    /// An unsigned decimal value (e.g., `333`).
    #[regex(r"\d\w*", lex_unsigned_dec)]
    Unsigned(u16),

    /// A directive (e.g., `.org`, `.start`).
    #[regex(r"\.[A-Za-z_]\w*", |lx| lx.slice()[1..].to_ascii_lowercase())]
    Directive(String),

    /// A string of characters to load (e.g., `"~M502602"`).
    #[token(r#"""#, lex_str_literal)]
    String(String),

    /// A comment, which starts with a semicolon and spans the remaining part of the line.
    #[regex(r";.*")]
    Comment,

    /// A new line
    #[regex(r"\r?\n")]
    NewLine
}
impl Token {
    pub(crate) fn is_whitespace(&self) -> bool {
        matches!(self, Token::NewLine | Token::Comment)
    }
}

/// Any errors raised in attempting to tokenize an input stream.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub enum LexErr {
    /// Numeric literal cannot fit within the range of a u16
    DoesNotFitU16,
    /// Numeric literal has invalid digits (i.e., not 0-9)
    InvalidNumeric,
    /// Int parsing failed but the reason why is unknown
    UnknownIntErr,
    /// String literal is missing an end quotation mark.
    UnclosedStrLit,
    /// A symbol was used which does not start any token
    #[default]
    InvalidSymbol
}
impl std::fmt::Display for LexErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexErr::DoesNotFitU16  => f.write_str("numeric token does not fit 16-bit unsigned integer"),
            LexErr::InvalidNumeric => f.write_str("invalid decimal literal"),
            LexErr::UnknownIntErr  => f.write_str("could not parse integer"),
            LexErr::UnclosedStrLit => f.write_str("unclosed string literal"),
            LexErr::InvalidSymbol  => f.write_str("unrecognized symbol"),
        }
    }
}
impl std::error::Error for LexErr {}
impl crate::err::Error for LexErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            LexErr::DoesNotFitU16  => Some(format!("the range for a 16-bit unsigned integer is [{}, {}]", u16::MIN, u16::MAX).into()),
            LexErr::InvalidNumeric => Some("a decimal literal only consists of digits 0-9".into()),
            LexErr::UnknownIntErr  => None,
            LexErr::UnclosedStrLit => Some("add a quote to the end of the string literal".into()),
            LexErr::InvalidSymbol  => Some("character data must be inside a quoted string".into()),
        }
    }
}

fn lex_unsigned_dec(lx: &Lexer<'_, Token>) -> Result<u16, LexErr> {
    lx.slice()
        .parse::<u16>()
        .map_err(|e| match e.kind() {
            IntErrorKind::InvalidDigit => LexErr::InvalidNumeric,
            IntErrorKind::PosOverflow  => LexErr::DoesNotFitU16,
            _ => LexErr::UnknownIntErr,
        })
}

fn lex_str_literal(lx: &mut Lexer<'_, Token>) -> Result<String, LexErr> {
    let rem = lx.remainder()
        .lines()
        .next()
        .unwrap_or("");

    // consume up to and including the first unescaped quote
    let mut escaped = false;
    let mut end = None;
    for (i, c) in rem.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => {
                end = Some(i);
                break;
            },
            _ => {}
        }
    }
    let Some(len) = end else {
        lx.bump(rem.len());
        return Err(LexErr::UnclosedStrLit);
    };
    lx.bump(len + 1);

    // `\"` and `\\` are the only escapes; any other backslash is kept as is
    let inner = &rem[..len];
    let mut buf = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match (c, chars.clone().next()) {
            ('\\', Some(e @ ('"' | '\\'))) => {
                buf.push(e);
                chars.next();
            },
            (c, _) => buf.push(c),
        }
    }
    Ok(buf)
}
