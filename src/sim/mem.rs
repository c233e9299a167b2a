//! Memory handling for the simulator.
//!
//! This module consists of:
//! - [`Cell`]: A single memory character with its word mark.
//! - [`Memory`]: The memory.
//! - [`MemInitStrategy`]: How memory is filled on creation and reset.

use std::ops::Range;

use rand::rngs::StdRng;
use rand::Rng;

use super::bcd::{self, CHAR, DIGIT, WM, ZONE};

/// A memory character.
///
/// A cell holds seven bits:
/// ```text
///   word mark
///   |  zone (B A)
///   |  |   digit (8 4 2 1)
///   V  V   V
///   W  BA  8421
/// ```
///
/// The word mark is a field boundary. It is set on the opcode of every instruction
/// and on the high-order character of most data fields.
///
/// The zone bits carry the sign of a numeric field on its units digit
/// ([`bcd::SIGN_MINUS`] alone is negative) and extend the digit into letters and symbols otherwise.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Cell(u8);

impl Cell {
    /// A blank cell with no word mark.
    pub const BLANK: Cell = Cell(0);

    /// Creates a cell from its seven bits (anything above is discarded).
    pub fn new(data: u8) -> Self {
        Self(data & (WM | CHAR))
    }
    /// Creates a cell holding the given character with a word mark.
    pub fn with_wm(c: u8) -> Self {
        Self((c & CHAR) | WM)
    }

    /// All seven bits of this cell.
    pub fn get(self) -> u8 {
        self.0
    }
    /// The six-bit character (word mark excluded).
    pub fn char(self) -> u8 {
        self.0 & CHAR
    }
    /// The digit bits.
    pub fn digit(self) -> u8 {
        self.0 & DIGIT
    }
    /// The zone bits.
    pub fn zone(self) -> u8 {
        self.0 & ZONE
    }
    /// Whether this cell carries a word mark.
    pub fn wm(self) -> bool {
        self.0 & WM != 0
    }
    /// Whether the zone on this cell denotes a negative number.
    pub fn is_minus(self) -> bool {
        self.zone() == bcd::SIGN_MINUS
    }

    /// Replaces the character, keeping the word mark.
    pub fn set_char(&mut self, c: u8) {
        self.0 = (self.0 & WM) | (c & CHAR);
    }
    /// Replaces the digit bits, keeping the zone and word mark.
    pub fn set_digit(&mut self, d: u8) {
        self.0 = (self.0 & !DIGIT) | (d & DIGIT);
    }
    /// Replaces the zone bits, keeping the digit and word mark.
    pub fn set_zone(&mut self, z: u8) {
        self.0 = (self.0 & !ZONE) | (z & ZONE);
    }
    /// Sets or clears the word mark.
    pub fn set_wm(&mut self, wm: bool) {
        match wm {
            true  => self.0 |= WM,
            false => self.0 &= !WM,
        }
    }
}
impl From<u8> for Cell {
    fn from(value: u8) -> Self {
        Cell::new(value)
    }
}
impl std::fmt::Debug for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.wm() {
            f.write_str("~")?;
        }
        write!(f, "{:?}", bcd::bcd_to_ascii(self.char()))
    }
}

/// Trait that describes types that can generate the contents of a fresh memory cell.
pub trait CellFiller {
    /// Generate the cell (the low seven bits are used).
    fn generate(&mut self) -> u8;
}
impl CellFiller for () {
    /// This creates unseeded, non-deterministic cells.
    fn generate(&mut self) -> u8 {
        rand::random::<u8>() & (WM | CHAR)
    }
}
impl CellFiller for u8 {
    /// Sets each cell to the given value.
    fn generate(&mut self) -> u8 {
        *self
    }
}
impl CellFiller for StdRng {
    /// This creates cells from the standard random number generator.
    ///
    /// This can be used to create deterministic, seeded cells.
    fn generate(&mut self) -> u8 {
        self.gen::<u8>() & (WM | CHAR)
    }
}

/// Strategy used to fill [`Memory`] when the [`Simulator`] is created or reset.
///
/// [`Simulator`]: super::Simulator
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub enum MemInitStrategy {
    /// Clears every cell to blank without a word mark, as the machine's clear-storage key does.
    #[default]
    Blank,

    /// Fills each cell randomly and non-deterministically.
    Unseeded,

    /// Fills each cell randomly and deterministically.
    Seeded {
        /// The seed the RNG was initialized with.
        seed: u64
    },

    /// Fills each cell with a known value.
    Known {
        /// The seven-bit value to fill each cell with.
        value: u8
    }
}
impl MemInitStrategy {
    pub(super) fn generator(&self) -> impl CellFiller {
        use rand::SeedableRng;

        match self {
            MemInitStrategy::Blank => MIGenerator::Known(0),
            MemInitStrategy::Unseeded => MIGenerator::Unseeded,
            MemInitStrategy::Seeded { seed } => MIGenerator::Seeded(Box::new(StdRng::seed_from_u64(*seed))),
            MemInitStrategy::Known { value } => MIGenerator::Known(*value),
        }
    }
}

enum MIGenerator {
    Unseeded,
    Seeded(Box<StdRng>),
    Known(u8)
}
impl CellFiller for MIGenerator {
    fn generate(&mut self) -> u8 {
        match self {
            MIGenerator::Unseeded  => ().generate(),
            MIGenerator::Seeded(r) => r.generate(),
            MIGenerator::Known(k)  => k.generate(),
        }
    }
}

/// Memory.
///
/// The size is fixed when the memory is created. Every address the engine touches
/// has already been checked against [`Memory::len`], so indexing with an out-of-range
/// address is a bug and panics.
///
/// ```
/// use bcd_ensemble::sim::mem::{Cell, Memory};
///
/// let mut mem = Memory::new(4000, &mut 0u8);
/// mem.write_text(500, "~AB");
/// assert_eq!(mem.text(500..502), "AB");
/// assert!(mem[500].wm());
/// assert!(!mem[501].wm());
/// ```
#[derive(Clone)]
pub struct Memory {
    data: Box<[Cell]>
}
impl Memory {
    /// Creates a new memory with the given number of cells.
    pub fn new(size: u16, filler: &mut impl CellFiller) -> Self {
        Self {
            data: std::iter::repeat_with(|| Cell::new(filler.generate()))
                .take(usize::from(size))
                .collect()
        }
    }

    /// The number of cells in memory.
    pub fn len(&self) -> u16 {
        // sizes are capped at 16000
        self.data.len() as u16
    }
    /// Whether memory has no cells.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Gets the cell at the given address, if it is inside memory.
    pub fn get(&self, addr: u16) -> Option<Cell> {
        self.data.get(usize::from(addr)).copied()
    }

    /// Gets all of memory as a slice.
    pub fn as_slice(&self) -> &[Cell] {
        &self.data
    }
    /// Gets all of memory as a mutable slice.
    pub fn as_slice_mut(&mut self) -> &mut [Cell] {
        &mut self.data
    }

    /// Copies a block of cells into memory, starting at `start`.
    ///
    /// Returns false (and writes nothing) if the block does not fit.
    pub fn copy_block(&mut self, start: u16, cells: &[Cell]) -> bool {
        let start = usize::from(start);
        match self.data.get_mut(start..start + cells.len()) {
            Some(dest) => {
                dest.copy_from_slice(cells);
                true
            },
            None => false
        }
    }

    /// Renders a range of memory as text (word marks are not shown).
    pub fn text(&self, range: Range<u16>) -> String {
        let start = usize::from(range.start).min(self.data.len());
        let end = usize::from(range.end).clamp(start, self.data.len());

        self.data[start..end].iter()
            .map(|c| bcd::bcd_to_ascii(c.char()))
            .collect()
    }

    /// Writes text into memory starting at `start`, replacing characters and word marks.
    ///
    /// A `~` sets the word mark on the character that follows it.
    /// Characters with no code are written as blanks.
    /// Writing stops at the end of memory.
    pub fn write_text(&mut self, start: u16, text: &str) {
        let mut addr = usize::from(start);
        let mut wm = false;

        for ch in text.chars() {
            if ch == '~' && !wm {
                wm = true;
                continue;
            }
            let Some(cell) = self.data.get_mut(addr) else { break };

            let c = bcd::ascii_to_bcd(ch).unwrap_or(bcd::BLANK);
            *cell = match wm {
                true  => Cell::with_wm(c),
                false => Cell::new(c),
            };
            wm = false;
            addr += 1;
        }
    }
}
impl std::ops::Index<u16> for Memory {
    type Output = Cell;

    fn index(&self, index: u16) -> &Self::Output {
        &self.data[usize::from(index)]
    }
}
impl std::ops::IndexMut<u16> for Memory {
    fn index_mut(&mut self, index: u16) -> &mut Self::Output {
        &mut self.data[usize::from(index)]
    }
}
impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}
