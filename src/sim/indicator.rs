//! The indicator latches.
//!
//! Branch instructions name an indicator by a character. The latch for that indicator
//! lives at the index of the character's code, so `B iii /` tests [`UNEQUAL`] (`/`).
//! A few indicators are reset the moment a branch tests them (see [`Indicators::test`]).

/// Carriage tape channel 9.
pub const CHANNEL_9: u8 = 0o11;
/// Carriage tape channel 12 (`@`).
pub const CHANNEL_12: u8 = 0o14;
/// Printer error (`#`).
pub const PRINTER_ERROR: u8 = 0o13;
/// Compare: unequal (`/`).
pub const UNEQUAL: u8 = 0o21;
/// Compare: equal (`S`).
pub const EQUAL: u8 = 0o22;
/// Compare: A collates below B (`T`).
pub const LOW: u8 = 0o23;
/// Compare: A collates above B (`U`).
pub const HIGH: u8 = 0o24;
/// Disk unequal address compare (`V`).
pub const DISK_ADDR_COMPARE: u8 = 0o25;
/// Divide overflow (`W`).
pub const DIVIDE_OVERFLOW: u8 = 0o26;
/// Arithmetic overflow (`Z`).
pub const OVERFLOW: u8 = 0o31;
/// Tape end of reel (`K`).
pub const END_OF_REEL: u8 = 0o42;
/// Tape error (`L`).
pub const TAPE_ERROR: u8 = 0o43;
/// Disk access inoperable (`N`).
pub const ACCESS_INOPERABLE: u8 = 0o45;
/// Inquiry request (`Q`).
pub const INQUIRY_REQUEST: u8 = 0o50;
/// Punch error (`!`).
pub const PUNCH_ERROR: u8 = 0o52;
/// Inquiry clear (`*`).
pub const INQUIRY_CLEAR: u8 = 0o54;
/// Last card (`A`).
pub const LAST_CARD: u8 = 0o61;
/// Sense switch B (switches B through G are consecutive).
pub const SENSE_B: u8 = 0o62;
/// Sense switch G.
pub const SENSE_G: u8 = 0o67;
/// Reader error (`?`).
pub const READER_ERROR: u8 = 0o72;

const AUTO_RESET: [u8; 6] = [OVERFLOW, DIVIDE_OVERFLOW, END_OF_REEL, TAPE_ERROR, DISK_ADDR_COMPARE, INQUIRY_REQUEST];

const fn build_auto_reset() -> [bool; 64] {
    let mut table = [false; 64];
    let mut i = 0;
    while i < AUTO_RESET.len() {
        table[AUTO_RESET[i] as usize] = true;
        i += 1;
    }
    table
}
static AUTO_RESET_TABLE: [bool; 64] = build_auto_reset();

/// The 64 indicator latches.
#[derive(Clone, PartialEq, Eq)]
pub struct Indicators([bool; 64]);

impl Indicators {
    /// Creates a set of indicators with every latch off.
    pub fn new() -> Self {
        Self([false; 64])
    }

    /// Reads an indicator without side effects.
    pub fn get(&self, ind: u8) -> bool {
        self.0[usize::from(ind & 0o77)]
    }
    /// Sets an indicator.
    pub fn set(&mut self, ind: u8, value: bool) {
        self.0[usize::from(ind & 0o77)] = value;
    }
    /// Tests an indicator for a branch, resetting it if it resets on test.
    pub fn test(&mut self, ind: u8) -> bool {
        let i = usize::from(ind & 0o77);
        let value = self.0[i];
        if AUTO_RESET_TABLE[i] {
            self.0[i] = false;
        }
        value
    }
    /// Whether this indicator resets when tested.
    pub fn resets_on_test(ind: u8) -> bool {
        AUTO_RESET_TABLE[usize::from(ind & 0o77)]
    }

    /// Sets the compare indicators to the equal state.
    pub fn set_equal(&mut self) {
        self.set(EQUAL, true);
        self.set(UNEQUAL, false);
        self.set(LOW, false);
        self.set(HIGH, false);
    }
    /// Sets the compare indicators to the unequal state (`low` when A collates below B).
    pub fn set_unequal(&mut self, low: bool) {
        self.set(EQUAL, false);
        self.set(UNEQUAL, true);
        self.set(LOW, low);
        self.set(HIGH, !low);
    }

    /// Turns every latch off.
    pub fn clear(&mut self) {
        self.0 = [false; 64];
    }

    /// Iterates over the codes of every latch that is on.
    pub fn iter_set(&self) -> impl Iterator<Item = u8> + '_ {
        (0u8..64).filter(|&i| self.0[usize::from(i)])
    }
}
impl Default for Indicators {
    fn default() -> Self {
        Self::new()
    }
}
impl std::fmt::Debug for Indicators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set()
            .entries(self.iter_set().map(super::bcd::bcd_to_ascii))
            .finish()
    }
}
