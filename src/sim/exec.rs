//! Handlers for the move, compare, branch and control instructions.
//!
//! Fields are processed from their units (rightmost) character down.
//! The A and B registers step down after every character and are left one below
//! each field, which is what lets a following 1-character instruction chain on.

use super::addr::{self, Address};
use super::bcd::{self, CHAR, DIGIT, GROUP_MARK, RECORD_MARK, ZONE};
use super::decode::Instr;
use super::mem::Cell;
use super::{Simulator, StopReason};

impl Simulator {
    /// `M` and `L`: moves characters from A to B.
    ///
    /// A move stops at the first word mark in either field and leaves B's word marks alone.
    /// A load stops at A's word mark and copies word marks too.
    pub(super) fn move_chars(&mut self, load: bool) -> Result<(), StopReason> {
        loop {
            let a = self.read(self.a_reg.value());
            let b = self.read(self.b_reg.value());

            let out = match load {
                true  => a,
                false => {
                    let mut out = b;
                    out.set_char(a.char());
                    out
                }
            };
            self.write(self.b_reg.value(), out);
            self.a_reg.decrement()?;
            self.b_reg.decrement()?;

            if a.wm() || (!load && b.wm()) {
                return Ok(());
            }
        }
    }

    /// `D` and `Y`: moves the digit or zone bits of one character.
    pub(super) fn move_part(&mut self, zone: bool) -> Result<(), StopReason> {
        let a = self.read(self.a_reg.value());
        let mut b = self.read(self.b_reg.value());
        match zone {
            true  => b.set_zone(a.zone()),
            false => b.set_digit(a.digit()),
        }
        self.write(self.b_reg.value(), b);
        self.a_reg.decrement()?;
        self.b_reg.decrement()
    }

    /// `P`: moves characters left to right up to and including a record mark
    /// or a word-marked group mark in A.
    pub(super) fn move_to_mark(&mut self) -> Result<(), StopReason> {
        let mem_size = self.mem.len();
        loop {
            let a = self.read(self.a_reg.value());
            let mut b = self.read(self.b_reg.value());
            b.set_char(a.char());
            self.write(self.b_reg.value(), b);
            self.a_reg.increment(mem_size)?;
            self.b_reg.increment(mem_size)?;

            if a.char() == RECORD_MARK || (a.char() == GROUP_MARK && a.wm()) {
                return Ok(());
            }
        }
    }

    /// `C`: compares A with B in the collating sequence.
    ///
    /// The first word mark in either field ends the compare.
    /// An A field shorter than B compares high.
    pub(super) fn compare(&mut self) -> Result<(), StopReason> {
        self.ind.set_equal();
        loop {
            let a = self.read(self.a_reg.value());
            let b = self.read(self.b_reg.value());
            if a.char() != b.char() {
                self.ind.set_unequal(bcd::collate(a.char()) < bcd::collate(b.char()));
            }
            self.a_reg.decrement()?;
            self.b_reg.decrement()?;

            if a.wm() || b.wm() {
                if a.wm() && !b.wm() {
                    self.ind.set_unequal(false);
                }
                return Ok(());
            }
        }
    }

    /// `B`: unconditional branch, branch on indicator and branch if character equal.
    pub(super) fn branch(&mut self, instr: &Instr) -> Result<(), StopReason> {
        let taken = match instr.len {
            4 => true,
            5 => instr.modifier == bcd::BLANK || self.ind.test(instr.modifier),
            _ => {
                let b = self.b_reg.get(StopReason::InvalidB)?;
                let c = self.read(b);
                self.b_reg.decrement()?;
                c.char() == instr.modifier
            }
        };
        match taken {
            true  => self.branch_to(instr.start, self.a_reg),
            false => Ok(()),
        }
    }

    /// `V`: branches on the word mark or zone of the character at B.
    ///
    /// A zoned modifier compares zones. Otherwise the modifier digit selects:
    /// `1` word mark, `2` no zone, `3` either.
    pub(super) fn branch_wm_zone(&mut self, instr: &Instr) -> Result<(), StopReason> {
        let d = instr.modifier;
        let c = self.read(self.b_reg.value());

        let taken = match d & ZONE {
            0 => match d & DIGIT {
                1 => c.wm(),
                2 => c.zone() == 0,
                3 => c.wm() || c.zone() == 0,
                _ => return Err(StopReason::InvalidModifier),
            },
            z => c.zone() == z,
        };
        self.b_reg.decrement()?;
        match taken {
            true  => self.branch_to(instr.start, self.a_reg),
            false => Ok(()),
        }
    }

    /// `W`: branches if the character at B shares any bit with the modifier.
    pub(super) fn branch_bit(&mut self, instr: &Instr) -> Result<(), StopReason> {
        let c = self.read(self.b_reg.value());
        self.b_reg.decrement()?;
        match c.char() & instr.modifier & CHAR != 0 {
            true  => self.branch_to(instr.start, self.a_reg),
            false => Ok(()),
        }
    }

    /// `,` and lozenge: sets or clears the word marks at A and B.
    pub(super) fn word_mark(&mut self, set: bool) -> Result<(), StopReason> {
        for addr in [self.a_reg.value(), self.b_reg.value()] {
            let mut cell = self.read(addr);
            cell.set_wm(set);
            self.write(addr, cell);
        }
        self.a_reg.decrement()?;
        self.b_reg.decrement()
    }

    /// `/`: clears storage from B down to the nearest hundreds boundary,
    /// then branches to A in the 7-character form.
    pub(super) fn clear_storage(&mut self, instr: &Instr) -> Result<(), StopReason> {
        let top = self.b_reg.value();
        let bottom = top - top % 100;
        for addr in (bottom..=top).rev() {
            self.write(addr, Cell::BLANK);
        }

        // clearing through 0 leaves B at the top of memory
        self.b_reg = match bottom.checked_sub(1) {
            Some(b) => Address::new(b),
            None => Address::new(self.mem.len() - 1),
        };
        match instr.len {
            7 => self.branch_to(instr.start, self.a_reg),
            _ => Ok(()),
        }
    }

    /// `.`: stops the machine. The 4- and 7-character forms branch to A on restart.
    pub(super) fn halt(&mut self, instr: &Instr) -> Result<(), StopReason> {
        if instr.len >= 4 {
            let target = self.a_reg.get(StopReason::InvalidBranch)?;
            self.halt_branch = Some((instr.start, target));
        }
        Err(StopReason::Halt)
    }

    /// Reads the three address characters ending at `units`.
    fn read_address_chars(&mut self, units: u16) -> Result<[u8; 3], StopReason> {
        let hundreds = units.checked_sub(2).ok_or(StopReason::AddressWrap)?;
        Ok([
            self.read(hundreds).char(),
            self.read(hundreds + 1).char(),
            self.read(units).char(),
        ])
    }

    /// Writes three address characters ending at `units`, keeping word marks.
    fn write_address_chars(&mut self, units: u16, chars: [u8; 3]) -> Result<(), StopReason> {
        let hundreds = units.checked_sub(2).ok_or(StopReason::AddressWrap)?;
        for (addr, c) in (hundreds..=units).zip(chars) {
            let mut cell = self.read(addr);
            cell.set_char(c);
            self.write(addr, cell);
        }
        Ok(())
    }

    /// Steps a register down past a three-character address field.
    fn skip_address_field(reg: &mut Address) -> Result<(), StopReason> {
        for _ in 0..3 {
            reg.decrement()?;
        }
        Ok(())
    }

    /// `#`: adds the address at A to the address at B, modulo the address space.
    ///
    /// The tens character at B keeps its zone, so an index tag survives.
    pub(super) fn modify_address(&mut self) -> Result<(), StopReason> {
        let a_units = self.a_reg.value();
        let b_units = self.b_reg.value();

        let a_chars = self.read_address_chars(a_units)?;
        let b_chars = self.read_address_chars(b_units)?;
        let sum = (addr::value_of(a_chars) + addr::value_of(b_chars)) % addr::MAX_ADDR_SPACE;

        let mut out = addr::encode(sum);
        out[1] |= b_chars[1] & ZONE;
        self.write_address_chars(b_units, out)?;

        Self::skip_address_field(&mut self.a_reg)?;
        Self::skip_address_field(&mut self.b_reg)
    }

    /// `Q` and `H`: stores a saved address register as three address characters ending at B.
    pub(super) fn store_register(&mut self, reg: Address) -> Result<(), StopReason> {
        let units = self.b_reg.value();
        self.write_address_chars(units, addr::encode(reg.value()))?;
        Self::skip_address_field(&mut self.b_reg)
    }
}

#[cfg(test)]
mod tests {
    use crate::load::parse_image;
    use crate::sim::indicator::{EQUAL, HIGH, LOW, UNEQUAL};

    use super::*;

    fn run(src: &str) -> Simulator {
        let mut sim = Simulator::default();
        sim.load_image(&parse_image(src).unwrap()).unwrap();
        assert_eq!(sim.run(), StopReason::Halt);
        sim
    }

    #[test]
    fn test_move_stops_at_b_word_mark() {
        let sim = run(r#"
            .org 333 "~M505603~.~}"
            .org 501 "~ABCDE"
            .org 601 "X~YZ"
            .start 333
        "#);
        assert_eq!(sim.mem.text(601..604), "XDE");
        assert!(sim.mem[602].wm());
        assert_eq!((sim.a_reg.value(), sim.b_reg.value()), (503, 601));
    }

    #[test]
    fn test_load_copies_word_marks() {
        let sim = run(r#"
            .org 333 "~L503603~.~}"
            .org 501 "~ABC"
            .org 599 "~WXYZ~Q~R"
            .start 333
        "#);
        assert_eq!(sim.mem.text(601..604), "ABC");
        assert!(sim.mem[601].wm());
        // word marks inside the field follow A, the ones outside are not touched
        assert!(!sim.mem[602].wm());
        assert!(!sim.mem[603].wm());
        assert!(sim.mem[599].wm());
        assert!(sim.mem[604].wm());
    }

    #[test]
    fn test_move_numeric_and_zone() {
        let sim = run(r#"
            .org 333 "~D501601~Y502602~.~}"
            .org 501 "~3J"
            .org 601 "A1"
            .start 333
        "#);
        // A's digit 3 under A's zone, then J's B zone over 1
        assert_eq!(sim.mem.text(601..603), "CJ");
    }

    #[test]
    fn test_move_to_mark() {
        let sim = run(r#"
            .org 333 "~P501601~.~}"
            .org 501 "ABC|XYZ"
            .start 333
        "#);
        assert_eq!(sim.mem.text(601..605), "ABC|");
        assert_eq!(sim.mem[605].char(), bcd::BLANK);
        assert_eq!((sim.a_reg.value(), sim.b_reg.value()), (505, 605));
    }

    #[test]
    fn test_move_wraps_below_zero() {
        let mut sim = Simulator::default();
        sim.mem.write_text(0, "ABC");
        sim.mem.write_text(600, "XYZ");
        sim.load_image(&parse_image(r#"
            .org 333 "~M002602~.~}"
            .start 333
        "#).unwrap()).unwrap();

        // A has no word mark, so the move runs off address 0
        assert_eq!(sim.run(), StopReason::AddressWrap);
        assert_eq!(sim.mem.text(600..603), "ABC");
        assert!(!sim.a_reg.is_valid());
        assert_eq!(sim.b_reg.value(), 600);
        assert_eq!(sim.is, 340);
    }

    #[test]
    fn test_move_to_mark_wraps_past_top() {
        let mut sim = Simulator::default();
        sim.mem.write_text(3997, "XYZ");
        sim.load_image(&parse_image(r#"
            .org 333 "~PI97600~.~}"
            .start 333
        "#).unwrap()).unwrap();

        // no record mark before the end of memory
        assert_eq!(sim.run(), StopReason::AddressWrap);
        assert_eq!(sim.mem.text(600..603), "XYZ");
        assert_eq!(sim.mem[603].char(), bcd::BLANK);
        assert!(!sim.a_reg.is_valid());
        assert_eq!(sim.a_reg.value(), 4000);
    }

    #[test]
    fn test_compare() {
        let sim = run(r#"
            .org 333 "~C503603~.~}"
            .org 501 "~123"
            .org 601 "~124"
            .start 333
        "#);
        let set: Vec<_> = sim.ind.iter_set().collect();
        assert_eq!(set, [UNEQUAL, LOW]);

        let sim = run(r#"
            .org 333 "~C503603~.~}"
            .org 501 "~ABC"
            .org 601 "~ABC"
            .start 333
        "#);
        assert!(sim.ind.get(EQUAL));

        // letters collate below digits
        let sim = run(r#"
            .org 333 "~C501601~.~}"
            .org 501 "~9"
            .org 601 "~Z"
            .start 333
        "#);
        assert!(sim.ind.get(HIGH));
    }

    #[test]
    fn test_compare_short_a_is_high() {
        let sim = run(r#"
            .org 333 "~C502603~.~}"
            .org 501 "~12"
            .org 601 "~012"
            .start 333
        "#);
        assert!(sim.ind.get(UNEQUAL) && sim.ind.get(HIGH));
    }

    #[test]
    fn test_branch_if_char_equal() {
        let sim = run(r#"
            .org 333 "~B400601X~.~}"
            .org 400 "~.~}"
            .org 601 "X"
            .start 333
        "#);
        assert_eq!(sim.is, 401);

        let sim = run(r#"
            .org 333 "~B400601Y~.~}"
            .org 400 "~.~}"
            .org 601 "X"
            .start 333
        "#);
        assert_eq!(sim.is, 342);
        assert_eq!(sim.b_reg.value(), 600);
    }

    #[test]
    fn test_branch_wm_zone() {
        // '1': word mark
        let sim = run(r#"
            .org 333 "~V4006011~.~}"
            .org 400 "~.~}"
            .org 601 "~5"
            .start 333
        "#);
        assert_eq!(sim.is, 401);

        // '2': no zone, but the character is a letter
        let sim = run(r#"
            .org 333 "~V4006012~.~}"
            .org 400 "~.~}"
            .org 601 "E"
            .start 333
        "#);
        assert_eq!(sim.is, 342);

        // zoned modifier: B zone only (J) matches N
        let sim = run(r#"
            .org 333 "~V400601J~.~}"
            .org 400 "~.~}"
            .org 601 "N"
            .start 333
        "#);
        assert_eq!(sim.is, 401);
    }

    #[test]
    fn test_branch_wm_zone_bad_modifier() {
        let mut sim = Simulator::default();
        sim.load_image(&parse_image(r#"
            .org 333 "~V4006015~.~}"
            .start 333
        "#).unwrap()).unwrap();
        assert_eq!(sim.run(), StopReason::InvalidModifier);
    }

    #[test]
    fn test_branch_bit() {
        // 'A' has the A bit and the 1 bit; '1' shares the 1 bit
        let sim = run(r#"
            .org 333 "~W4006011~.~}"
            .org 400 "~.~}"
            .org 601 "A"
            .start 333
        "#);
        assert_eq!(sim.is, 401);

        let sim = run(r#"
            .org 333 "~W4006012~.~}"
            .org 400 "~.~}"
            .org 601 "A"
            .start 333
        "#);
        assert_eq!(sim.is, 342);
    }

    #[test]
    fn test_word_marks() {
        let sim = run(r#"
            .org 333 "~,600700~)501~.~}"
            .org 501 "~X"
            .start 333
        "#);
        assert!(sim.mem[600].wm());
        assert!(sim.mem[700].wm());
        assert!(!sim.mem[501].wm());
        assert_eq!(sim.mem[501].char(), bcd::ascii_to_bcd('X').unwrap());
        assert_eq!((sim.a_reg.value(), sim.b_reg.value()), (500, 500));
    }

    #[test]
    fn test_clear_storage() {
        let mut sim = Simulator::default();
        sim.mem.write_text(690, "~ABCDEFGHIJ~K");
        sim.load_image(&parse_image(r#"
            .org 333 "~/695~.~}"
            .start 333
        "#).unwrap()).unwrap();
        assert_eq!(sim.run(), StopReason::Halt);

        assert_eq!(sim.mem.text(690..701), "      GHIJK");
        assert!(!sim.mem[690].wm());
        assert!(sim.mem[700].wm());
        assert!(sim.mem.as_slice()[600..690].iter().all(|&c| c == Cell::BLANK));
        assert_eq!(sim.b_reg.value(), 599);
    }

    #[test]
    fn test_clear_storage_wraps_and_branches() {
        let mut sim = Simulator::default();
        sim.mem.write_text(0, "ABC");
        sim.load_image(&parse_image(r#"
            .org 333 "~/400050~.~}"
            .org 400 "~.~}"
            .start 333
        "#).unwrap()).unwrap();
        assert_eq!(sim.run(), StopReason::Halt);

        assert_eq!(sim.mem.text(0..3), "   ");
        assert_eq!(sim.is, 401);
        // the branch put the return address in B
        assert_eq!(sim.b_reg.value(), 340);
    }

    #[test]
    fn test_modify_address() {
        let sim = run(r#"
            .org 333 "~#503603~.~}"
            .org 501 "~005"
            .org 601 "~3K8"
            .start 333
        "#);
        // 328 + 5 = 333 and the tens zone (B bit) stays
        assert_eq!(sim.mem.text(601..604), "3L3");
        assert_eq!((sim.a_reg.value(), sim.b_reg.value()), (500, 600));
    }

    #[test]
    fn test_store_registers() {
        let sim = run(r#"
            .org 333 "~M501601~H703~Q706~.~}"
            .org 501 "~A"
            .org 601 "~ "
            .start 333
        "#);
        // H stores B as the move left it, Q stores A as the fetch of H left it
        assert_eq!(sim.mem.text(701..704), "600");
        assert_eq!(sim.mem.text(704..707), "703");
    }
}
