//! Three-character operand addresses.
//!
//! An address is written in memory as three characters (hundreds, tens, units).
//! Besides the digit each character carries, the zone bits extend the address:
//! - the hundreds zone adds 1000, 2000 or 3000 (A, B, AB),
//! - the units zone adds 4000, 8000 or 12000 (A, B, AB),
//! - the tens zone selects one of three index registers.
//!
//! Each position is looked up in its own 64-entry table ([`HUNDREDS`], [`TENS`], [`UNITS`]).
//! The tables do not reject illegal digits outright. They return the value the adder would have
//! produced and mark the entry as bad, so an address made from them is carried around as
//! invalid until an instruction actually needs it.

use super::bcd::{self, ABIT, BBIT, CHAR, DIGIT, ZONE};
use super::mem::Memory;
use super::StopReason;

/// The largest address space reachable through indexing.
pub const MAX_ADDR_SPACE: u16 = 16000;
/// Mask applied to the address registers at the start of each instruction.
pub const ADDR_MASK: u16 = 0o37777;

/// Locations of the units characters of index registers 1, 2 and 3.
pub const INDEX_REGISTERS: [u16; 3] = [89, 94, 99];

/// An operand address and whether it was legally formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Address {
    value: u16,
    valid: bool
}
impl Address {
    /// Creates a valid address.
    pub fn new(value: u16) -> Self {
        Self { value, valid: true }
    }
    /// Creates an address that is marked invalid.
    pub fn invalid(value: u16) -> Self {
        Self { value, valid: false }
    }

    /// The raw value of this address, whether it is valid or not.
    pub fn value(&self) -> u16 {
        self.value
    }
    /// Whether this address was legally formed and is inside memory.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Gets the address, raising the provided stop if it is invalid.
    pub fn get(&self, err: StopReason) -> Result<u16, StopReason> {
        match self.valid {
            true  => Ok(self.value),
            false => Err(err)
        }
    }

    /// Revalidates an address register before the next fetch.
    ///
    /// The value is masked to the address width and the address is valid again
    /// if the masked value falls inside memory.
    pub fn masked(self, mem_size: u16) -> Self {
        let value = self.value & ADDR_MASK;
        Self { value, valid: value < mem_size }
    }

    /// Steps the address down by one.
    ///
    /// Stepping below 0 leaves the address at 0, marks it invalid and raises [`StopReason::AddressWrap`].
    pub fn decrement(&mut self) -> Result<(), StopReason> {
        match self.value.checked_sub(1) {
            Some(v) => {
                self.value = v;
                Ok(())
            },
            None => {
                self.valid = false;
                Err(StopReason::AddressWrap)
            }
        }
    }

    /// Steps the address up by one.
    ///
    /// Reaching the end of memory marks it invalid and raises [`StopReason::AddressWrap`].
    pub fn increment(&mut self, mem_size: u16) -> Result<(), StopReason> {
        self.value += 1;
        match self.value < mem_size {
            true => Ok(()),
            false => {
                self.valid = false;
                Err(StopReason::AddressWrap)
            }
        }
    }
}
impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:05}", self.value)?;
        if !self.valid {
            f.write_str("?")?;
        }
        Ok(())
    }
}

/// One entry of a position table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// What this character adds to the address.
    pub value: u16,
    /// Whether the digit was illegal in an address.
    pub bad: bool,
    /// Index register selected (tens position only, 0 if none).
    pub index: u8,
}

// Digit value after the adder, and whether that digit is illegal in an address.
const fn digit_value(c: u8) -> (u16, bool) {
    match c & DIGIT {
        0  => (0, true),
        10 => (0, false),
        d @ 1..=9 => (d as u16, false),
        d  => (d as u16 - 8, true),
    }
}
const fn zone_value(c: u8) -> u16 {
    ((c & ZONE) >> 4) as u16
}

const fn build_hundreds() -> [Position; 64] {
    let mut table = [Position { value: 0, bad: false, index: 0 }; 64];
    let mut c = 0;
    while c < 64 {
        let (d, bad) = digit_value(c as u8);
        table[c] = Position { value: d * 100 + zone_value(c as u8) * 1000, bad, index: 0 };
        c += 1;
    }
    table
}
const fn build_tens() -> [Position; 64] {
    let mut table = [Position { value: 0, bad: false, index: 0 }; 64];
    let mut c = 0;
    while c < 64 {
        let (d, bad) = digit_value(c as u8);
        table[c] = Position { value: d * 10, bad, index: zone_value(c as u8) as u8 };
        c += 1;
    }
    table
}
const fn build_units() -> [Position; 64] {
    let mut table = [Position { value: 0, bad: false, index: 0 }; 64];
    let mut c = 0;
    while c < 64 {
        let (d, bad) = digit_value(c as u8);
        table[c] = Position { value: d + zone_value(c as u8) * 4000, bad, index: 0 };
        c += 1;
    }
    table
}

/// Hundreds position table.
pub static HUNDREDS: [Position; 64] = build_hundreds();
/// Tens position table.
pub static TENS: [Position; 64] = build_tens();
/// Units position table.
pub static UNITS: [Position; 64] = build_units();

/// Sums three address characters without any validity or index handling.
fn raw_sum(chars: [u8; 3]) -> (u16, bool, u8) {
    let h = HUNDREDS[usize::from(chars[0] & CHAR)];
    let t = TENS[usize::from(chars[1] & CHAR)];
    let u = UNITS[usize::from(chars[2] & CHAR)];

    (h.value + t.value + u.value, h.bad || t.bad || u.bad, t.index)
}

/// The unindexed value of three address characters, ignoring illegal digits.
pub fn value_of(chars: [u8; 3]) -> u16 {
    raw_sum(chars).0
}

/// Reads the offset held by an index register (1-3).
pub fn index_register(mem: &Memory, reg: u8) -> u16 {
    let Some(&units) = INDEX_REGISTERS.get(usize::from(reg).wrapping_sub(1)) else {
        return 0;
    };
    let chars = [mem[units - 2].char(), mem[units - 1].char(), mem[units].char()];

    // the tens zone of an index register does not select another register
    let (value, _, _) = raw_sum(chars);
    value
}

/// Resolves three address characters into an address.
///
/// If `indexing` is set and the tens character selects an index register,
/// the register's contents are added and the sum wraps at [`MAX_ADDR_SPACE`].
/// Indexing absorbs any illegal digits, so only the final bounds check can reject an indexed address.
pub fn resolve(chars: [u8; 3], mem: &Memory, indexing: bool) -> Address {
    let (mut value, mut bad, index) = raw_sum(chars);

    if indexing && index != 0 {
        value = (value + index_register(mem, index)) % MAX_ADDR_SPACE;
        bad = false;
    }

    match !bad && value < mem.len() {
        true  => Address::new(value),
        false => Address::invalid(value)
    }
}

/// Encodes an address as three address characters (hundreds, tens, units).
///
/// The tens character never carries a zone.
pub fn encode(addr: u16) -> [u8; 3] {
    let addr = addr % MAX_ADDR_SPACE;
    let thousands = (addr / 1000) as u8;
    let digit = |n: u16| bcd::binary_to_bcd((n % 10) as u8);

    let hundreds = digit(addr / 100) | zone_bits(thousands % 4);
    let tens = digit(addr / 10);
    let units = digit(addr) | zone_bits(thousands / 4);
    [hundreds, tens, units]
}

fn zone_bits(z: u8) -> u8 {
    match z {
        1 => ABIT,
        2 => BBIT,
        3 => ABIT | BBIT,
        _ => 0
    }
}

#[cfg(test)]
mod tests {
    use crate::sim::bcd::{ascii_to_bcd, BLANK, ZERO};
    use crate::sim::mem::{Cell, Memory};

    use super::*;

    fn chars(s: &str) -> [u8; 3] {
        let mut out = [0; 3];
        for (o, c) in out.iter_mut().zip(s.chars()) {
            *o = ascii_to_bcd(c).unwrap();
        }
        out
    }

    #[test]
    fn test_plain_addresses() {
        let mem = Memory::new(16000, &mut 0u8);

        assert_eq!(resolve(chars("500"), &mem, true), Address::new(500));
        assert_eq!(resolve(chars("999"), &mem, true), Address::new(999));
        assert_eq!(resolve(chars("000"), &mem, true), Address::new(0));
        // A zone on hundreds: 1000
        assert_eq!(resolve(chars("|00"), &mem, true), Address::new(1000));
        // AB zone on hundreds: 3000
        assert_eq!(resolve(chars("I99"), &mem, true), Address::new(3999));
        // A zone on units: 4000
        assert_eq!(resolve(chars("00/"), &mem, true), Address::new(4001));
        // AB units, AB hundreds: 15999
        assert_eq!(resolve(chars("I9I"), &mem, true), Address::new(15999));
    }

    #[test]
    fn test_invalid_addresses() {
        let mem = Memory::new(4000, &mut 0u8);

        // blanks are not legal address digits
        let addr = resolve([BLANK, ZERO, ZERO], &mem, true);
        assert!(!addr.is_valid());
        assert_eq!(addr.get(StopReason::InvalidA), Err(StopReason::InvalidA));

        // beyond memory
        let addr = resolve(chars("00/"), &mem, true);
        assert!(!addr.is_valid());
        assert_eq!(addr.value(), 4001);

        // # is digit 11
        assert!(!resolve(chars("5#0"), &mem, true).is_valid());
    }

    #[test]
    fn test_indexed() {
        let mut mem = Memory::new(4000, &mut 0u8);
        // X1 = 025
        for (i, c) in chars("025").into_iter().enumerate() {
            mem[87 + i as u16] = Cell::new(c);
        }

        // zero with an A zone selects X1
        let tens_x1 = ZERO | ABIT;
        let addr = resolve([chars("5")[0], tens_x1, chars("0")[0]], &mem, true);
        assert_eq!(addr, Address::new(525));

        // without indexing, the zone is ignored
        let addr = resolve([chars("5")[0], tens_x1, chars("0")[0]], &mem, false);
        assert_eq!(addr, Address::new(500));

        // indexing absorbs an illegal digit
        let addr = resolve([BLANK, tens_x1, chars("0")[0]], &mem, true);
        assert_eq!(addr, Address::new(25));
    }

    #[test]
    fn test_indexed_wraps() {
        let mut mem = Memory::new(16000, &mut 0u8);
        // X3 = 15999
        for (i, c) in chars("I9I").into_iter().enumerate() {
            mem[97 + i as u16] = Cell::new(c);
        }
        let tens_x3 = 1 | ABIT | BBIT;
        let addr = resolve([chars("0")[0], tens_x3, chars("1")[0]], &mem, true);
        assert_eq!(addr, Address::new(10));
    }

    #[test]
    fn test_encode() {
        let mem = Memory::new(16000, &mut 0u8);
        for value in [0, 1, 99, 100, 999, 1000, 3999, 4000, 8765, 15999] {
            assert_eq!(resolve(encode(value), &mem, true), Address::new(value), "{value}");
        }
    }

    #[test]
    fn test_step() {
        let mut addr = Address::new(1);
        assert_eq!(addr.decrement(), Ok(()));
        assert_eq!(addr.decrement(), Err(StopReason::AddressWrap));
        assert!(!addr.is_valid());

        let mut addr = Address::new(3998);
        assert_eq!(addr.increment(4000), Ok(()));
        assert_eq!(addr.increment(4000), Err(StopReason::AddressWrap));

        let addr = Address::invalid(0o40000 | 123).masked(4000);
        assert_eq!(addr, Address::new(123));
    }
}
