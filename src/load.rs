//! Loading core images.
//!
//! A core image is the text form of a memory dump: `.org` sets the address the next
//! string is placed at, each quoted string is a run of characters,
//! and `.start` gives the address execution begins at.
//! In a string, `~` puts a word mark on the character after it.
//!
//! ```
//! use bcd_ensemble::load::parse_image;
//!
//! let image = parse_image(r#"
//!     .org 333
//!     "~M502602~."   ; move, then halt
//!     .org 501 "~AB"
//!     .start 333
//! "#).unwrap();
//!
//! let (start, cells) = image.blocks().next().unwrap();
//! assert_eq!((start, cells.len()), (333, 8));
//! assert!(cells[0].wm());
//! assert_eq!(image.start(), Some(333));
//! ```
//!
//! Images are placed in memory with [`Simulator::load_image`](crate::sim::Simulator::load_image).
pub mod lex;

use std::ops::Range;

use logos::{Logos, Span};

use crate::sim::addr::MAX_ADDR_SPACE;
use crate::sim::bcd;
use crate::sim::mem::Cell;
use lex::{LexErr, Token};

/// A contiguous run of cells and where it came from in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Block {
    start: u16,
    cells: Vec<Cell>,
    span: Range<usize>,
}

/// A parsed core image.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Image {
    blocks: Vec<Block>,
    start: Option<u16>,
}
impl Image {
    /// The blocks of the image, as their start addresses and cells, in source order.
    pub fn blocks(&self) -> impl Iterator<Item = (u16, &[Cell])> + '_ {
        self.blocks.iter().map(|b| (b.start, &*b.cells))
    }
    /// The source span of the first block starting at `start`.
    pub fn block_span(&self, start: u16) -> Option<Range<usize>> {
        self.blocks.iter()
            .find(|b| b.start == start)
            .map(|b| b.span.clone())
    }
    /// The address execution begins at, if the image gives one.
    pub fn start(&self) -> Option<u16> {
        self.start
    }
}

/// Kinds of errors that can occur while reading or loading a core image.
///
/// See [`LoadErr`] for this error type with span information included.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum LoadErrKind {
    /// The text could not be tokenized.
    Lex(LexErr),
    /// A directive other than `.org` and `.start`.
    UnknownDirective,
    /// A directive was not followed by an address.
    ExpectedAddress,
    /// A token appeared where a directive or string was expected.
    UnexpectedToken,
    /// A string appeared before any `.org`.
    NoOrigin,
    /// An address is beyond the largest memory.
    AddressTooLarge,
    /// A string contains a character with no character code.
    InvalidChar(char),
    /// A string ends with a `~` that marks nothing.
    DanglingWordMark,
    /// A block does not fit in the installed memory.
    OutOfMemory {
        /// Where the block starts.
        start: u16,
        /// The block's length in characters.
        len: usize,
    },
}
impl std::fmt::Display for LoadErrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lex(e)            => e.fmt(f),
            Self::UnknownDirective  => f.write_str("unknown directive"),
            Self::ExpectedAddress   => f.write_str("expected an address"),
            Self::UnexpectedToken   => f.write_str("unexpected token"),
            Self::NoOrigin          => f.write_str("string has no address"),
            Self::AddressTooLarge   => f.write_str("address is beyond the largest memory"),
            Self::InvalidChar(c)    => write!(f, "character {c:?} has no character code"),
            Self::DanglingWordMark  => f.write_str("word mark at end of string"),
            Self::OutOfMemory { start, len } => write!(f, "block of {len} characters at {start} does not fit in memory"),
        }
    }
}

/// Error from reading or loading a core image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadErr {
    kind: LoadErrKind,
    span: Range<usize>,
}
impl LoadErr {
    /// Creates a new [`LoadErr`].
    pub fn new(kind: LoadErrKind, span: Range<usize>) -> Self {
        LoadErr { kind, span }
    }
    /// The kind of error.
    pub fn kind(&self) -> LoadErrKind {
        self.kind
    }
}
impl std::fmt::Display for LoadErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.kind.fmt(f)
    }
}
impl std::error::Error for LoadErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            LoadErrKind::Lex(e) => Some(e),
            _ => None
        }
    }
}
impl crate::err::Error for LoadErr {
    fn span(&self) -> Option<crate::err::ErrSpan> {
        Some(self.span.clone())
    }

    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match &self.kind {
            LoadErrKind::Lex(e)           => crate::err::Error::help(e),
            LoadErrKind::UnknownDirective => Some("the directives are .org and .start".into()),
            LoadErrKind::ExpectedAddress  => Some("add a decimal address after the directive".into()),
            LoadErrKind::UnexpectedToken  => None,
            LoadErrKind::NoOrigin         => Some("add an .org directive before this string".into()),
            LoadErrKind::AddressTooLarge  => Some(format!("addresses must be below {MAX_ADDR_SPACE}").into()),
            LoadErrKind::InvalidChar(_)   => Some("only characters of the 64-character set can be loaded".into()),
            LoadErrKind::DanglingWordMark => Some("a ~ must be followed by the character it marks".into()),
            LoadErrKind::OutOfMemory { .. } => Some("move the block lower, or install more memory".into()),
        }
    }
}

/// Converts the text of a string token into cells.
fn to_cells(text: &str, span: &Span) -> Result<Vec<Cell>, LoadErr> {
    let mut cells = Vec::with_capacity(text.len());
    let mut wm = false;
    for ch in text.chars() {
        if ch == '~' && !wm {
            wm = true;
            continue;
        }
        let c = bcd::ascii_to_bcd(ch)
            .ok_or_else(|| LoadErr::new(LoadErrKind::InvalidChar(ch), span.clone()))?;
        cells.push(match wm {
            true  => Cell::with_wm(c),
            false => Cell::new(c),
        });
        wm = false;
    }
    match wm {
        true  => Err(LoadErr::new(LoadErrKind::DanglingWordMark, span.clone())),
        false => Ok(cells),
    }
}

/// Parses core-image text.
pub fn parse_image(src: &str) -> Result<Image, LoadErr> {
    let mut tokens = Token::lexer(src)
        .spanned()
        .filter(|(t, _)| !t.as_ref().is_ok_and(Token::is_whitespace))
        .map(|(t, span)| t.map(|t| (t, span.clone())).map_err(|e| LoadErr::new(LoadErrKind::Lex(e), span)));

    let mut image = Image::default();
    let mut cursor = None;
    while let Some(result) = tokens.next() {
        let (token, span) = result?;
        match token {
            Token::Directive(d) => {
                let addr = match tokens.next().transpose()? {
                    Some((Token::Unsigned(n), nspan)) if n >= MAX_ADDR_SPACE => {
                        return Err(LoadErr::new(LoadErrKind::AddressTooLarge, nspan));
                    },
                    Some((Token::Unsigned(n), _)) => n,
                    _ => return Err(LoadErr::new(LoadErrKind::ExpectedAddress, span)),
                };
                match &*d {
                    "org" => cursor = Some(addr),
                    "start" => image.start = Some(addr),
                    _ => return Err(LoadErr::new(LoadErrKind::UnknownDirective, span)),
                }
            },
            Token::String(text) => {
                let start = cursor.ok_or_else(|| LoadErr::new(LoadErrKind::NoOrigin, span.clone()))?;
                let cells = to_cells(&text, &span)?;
                let end = u16::try_from(cells.len()).ok()
                    .and_then(|len| start.checked_add(len))
                    .filter(|&end| end <= MAX_ADDR_SPACE)
                    .ok_or_else(|| LoadErr::new(LoadErrKind::AddressTooLarge, span.clone()))?;

                cursor = Some(end);
                image.blocks.push(Block { start, cells, span });
            },
            Token::Unsigned(_) | Token::Comment | Token::NewLine => {
                return Err(LoadErr::new(LoadErrKind::UnexpectedToken, span));
            },
        }
    }
    Ok(image)
}
