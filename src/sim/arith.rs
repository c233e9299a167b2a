//! Decimal arithmetic: add, subtract, multiply and divide.
//!
//! Numbers are signed-magnitude digit strings. The sign lives in the zone of the
//! units digit: a B zone alone is minus, anything else is plus.
//! Results are written with [`SIGN_PLUS`] or [`SIGN_MINUS`] on their units digit.
//!
//! Every digit goes through the adder tables in [`bcd`](super::bcd).

use super::addr::Address;
use super::bcd::{add_digit, binary_to_bcd, to_binary_digit, SIGN_MINUS, SIGN_PLUS};
use super::decode::Op;
use super::indicator::{DIVIDE_OVERFLOW, OVERFLOW};
use super::{Simulator, StopReason};

/// The zone for a sign.
fn sign_zone(minus: bool) -> u8 {
    match minus {
        true  => SIGN_MINUS,
        false => SIGN_PLUS,
    }
}

impl Simulator {
    /// The decimal digit held at an address.
    fn digit_at(&mut self, addr: u16) -> u8 {
        to_binary_digit(self.read(addr).char())
    }

    /// Replaces the digit at an address, clearing its zone and keeping its word mark.
    fn put_digit(&mut self, addr: u16, digit: u8) {
        let mut cell = self.read(addr);
        cell.set_char(binary_to_bcd(digit));
        self.write(addr, cell);
    }

    /// Replaces the sign zone at an address.
    fn put_sign(&mut self, addr: u16, minus: bool) {
        let mut cell = self.read(addr);
        cell.set_zone(sign_zone(minus));
        self.write(addr, cell);
    }

    /// `A`, `S`, `?` and `!`: adds or subtracts A into B.
    ///
    /// The B field's word mark sets the result length. A shorter A field is extended with zeros.
    /// A carry out of an add sets the overflow indicator and is lost.
    pub(super) fn add_subtract(&mut self, op: Op) -> Result<(), StopReason> {
        let zero = matches!(op, Op::ZeroAdd | Op::ZeroSubtract);
        let negate = matches!(op, Op::Subtract | Op::ZeroSubtract);

        let b_units = self.b_reg.value();
        let a_minus = self.read(self.a_reg.value()).is_minus();
        let b_minus = !zero && self.read(b_units).is_minus();

        // signs that disagree (after the opcode) turn the add into a complement add
        let complement = !zero && (a_minus ^ b_minus ^ negate);

        let mut carry = complement;
        let mut a_done = false;
        loop {
            let a = match a_done {
                true  => 0,
                false => {
                    let cell = self.read(self.a_reg.value());
                    a_done = cell.wm();
                    self.a_reg.decrement()?;
                    to_binary_digit(cell.char())
                }
            };
            let b_cell = self.read(self.b_reg.value());
            let b = match zero {
                true  => 0,
                false => to_binary_digit(b_cell.char()),
            };
            let addend = match complement {
                true  => 9 - a,
                false => a,
            };

            let (digit, c) = add_digit(b, addend, carry);
            carry = c;
            self.put_digit(self.b_reg.value(), digit);
            self.b_reg.decrement()?;

            if b_cell.wm() {
                break;
            }
        }

        let mut minus = match zero {
            true  => a_minus ^ negate,
            false => b_minus,
        };
        if complement && !carry {
            // A was larger: the field holds the tens complement of the answer
            self.recomplement(b_units)?;
            minus = !minus;
        } else if !complement && carry {
            self.ind.set(OVERFLOW, true);
        }
        self.put_sign(b_units, minus);
        Ok(())
    }

    /// Replaces the field ending at `units` with its tens complement.
    fn recomplement(&mut self, units: u16) -> Result<(), StopReason> {
        let mut addr = Address::new(units);
        let mut carry = true;
        loop {
            let cell = self.read(addr.value());
            let (digit, c) = add_digit(0, 9 - to_binary_digit(cell.char()), carry);
            carry = c;
            self.put_digit(addr.value(), digit);

            if cell.wm() {
                return Ok(());
            }
            addr.decrement()?;
        }
    }

    /// Adds the `len`-digit field ending at `a_units` into the `len + 1` digits ending at `units`.
    ///
    /// Returns whether a carry came out of the top digit.
    fn add_window(&mut self, a_units: u16, len: u16, units: u16) -> Result<bool, StopReason> {
        let mut carry = false;
        for i in 0..=len {
            let a = match i < len {
                true  => self.digit_at(a_units - i),
                false => 0,
            };
            let pos = units.checked_sub(i).ok_or(StopReason::AddressWrap)?;
            let b = self.digit_at(pos);
            let (digit, c) = add_digit(b, a, carry);
            carry = c;
            self.put_digit(pos, digit);
        }
        Ok(carry)
    }

    /// Subtracts the `len`-digit field ending at `a_units` from the `len + 1` digits ending at `units`.
    ///
    /// Returns false if the window went negative (it then holds the tens complement).
    fn subtract_window(&mut self, a_units: u16, len: u16, units: u16) -> Result<bool, StopReason> {
        let mut carry = true;
        for i in 0..=len {
            let a = match i < len {
                true  => self.digit_at(a_units - i),
                false => 0,
            };
            let pos = units.checked_sub(i).ok_or(StopReason::AddressWrap)?;
            let b = self.digit_at(pos);
            let (digit, c) = add_digit(b, 9 - a, carry);
            carry = c;
            self.put_digit(pos, digit);
        }
        Ok(carry)
    }

    /// Counts the characters of the field ending at A, leaving A one below it.
    ///
    /// Also reports whether every digit in the field is zero.
    fn measure_a_field(&mut self) -> Result<(u16, bool), StopReason> {
        let mut len = 0;
        let mut all_zero = true;
        loop {
            let cell = self.read(self.a_reg.value());
            len += 1;
            all_zero &= to_binary_digit(cell.char()) == 0;
            self.a_reg.decrement()?;

            if cell.wm() {
                return Ok((len, all_zero));
            }
        }
    }

    /// `@`: multiplies the multiplicand at A by the multiplier at B.
    ///
    /// The product replaces the multiplier and the `len(A) + 1` characters to its right,
    /// ending at B. The multiplier's digits are consumed as the product grows into them.
    pub(super) fn multiply(&mut self) -> Result<(), StopReason> {
        let a_units = self.a_reg.value();
        let b_units = self.b_reg.value();
        let a_minus = self.read(a_units).is_minus();
        let (len, _) = self.measure_a_field()?;

        for _ in 0..=len {
            self.put_digit(self.b_reg.value(), 0);
            self.b_reg.decrement()?;
        }
        let multiplier_minus = self.read(self.b_reg.value()).is_minus();

        let mut window = b_units;
        loop {
            let m = self.read(self.b_reg.value());
            self.put_digit(self.b_reg.value(), 0);
            for _ in 0..to_binary_digit(m.char()) {
                self.add_window(a_units, len, window)?;
            }
            self.b_reg.decrement()?;

            if m.wm() {
                break;
            }
            window -= 1;
        }

        self.put_sign(b_units, a_minus ^ multiplier_minus);
        Ok(())
    }

    /// `%`: divides the dividend in B by the divisor at A.
    ///
    /// B addresses the high-order end of the dividend; the dividend's units digit
    /// is the first zoned character at or after B. Each quotient digit is formed by
    /// repeated subtraction and stored `len(A) + 1` places left of the window's units.
    /// The remainder is left in the low-order end of the dividend.
    ///
    /// A zero divisor sets the overflow and divide overflow indicators and only rewrites
    /// the dividend's sign. A quotient digit above 9 sets divide overflow and ends the
    /// instruction with the dividend as it was before that digit.
    pub(super) fn divide(&mut self) -> Result<(), StopReason> {
        let mem_size = self.mem.len();
        let a_units = self.a_reg.value();
        let divisor_minus = self.read(a_units).is_minus();
        let (len, all_zero) = self.measure_a_field()?;

        if all_zero {
            self.ind.set(OVERFLOW, true);
            self.ind.set(DIVIDE_OVERFLOW, true);
            let mut units = self.b_reg;
            loop {
                let cell = self.read(units.value());
                if cell.zone() != 0 {
                    self.put_sign(units.value(), cell.is_minus());
                    return Ok(());
                }
                units.increment(mem_size)?;
            }
        }

        let mut units = self.b_reg;
        loop {
            let u = units.value();
            let last = self.read(u);

            let mut quotient = 0;
            while self.subtract_window(a_units, len, u)? {
                quotient += 1;
                if quotient > 9 {
                    self.ind.set(DIVIDE_OVERFLOW, true);
                    for _ in 0..quotient {
                        self.add_window(a_units, len, u)?;
                    }
                    self.write(u, last);
                    return Ok(());
                }
            }
            self.add_window(a_units, len, u)?;

            let q_pos = u.checked_sub(len + 1).ok_or(StopReason::AddressWrap)?;
            self.put_digit(q_pos, quotient);

            if last.zone() != 0 {
                let dividend_minus = last.is_minus();
                self.put_sign(q_pos, divisor_minus ^ dividend_minus);
                self.put_sign(u, dividend_minus);
                self.b_reg = units;
                return Ok(());
            }
            units.increment(mem_size)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::load::parse_image;
    use crate::sim::bcd::{self, to_binary_digit};
    use crate::sim::indicator;

    use super::*;

    fn run(src: &str) -> Simulator {
        let mut sim = Simulator::default();
        sim.load_image(&parse_image(src).unwrap()).unwrap();
        assert_eq!(sim.run(), StopReason::Halt);
        sim
    }

    fn digits(sim: &Simulator, range: std::ops::Range<u16>) -> String {
        range.map(|a| char::from(b'0' + to_binary_digit(sim.mem[a].char()))).collect()
    }

    #[test]
    fn test_add() {
        let sim = run(r#"
            .org 333 "~A503603~.~}"
            .org 501 "~005"
            .org 601 "~003"
            .start 333
        "#);
        assert_eq!(digits(&sim, 601..604), "008");
        assert_eq!(sim.mem[603].zone(), SIGN_PLUS);
        assert!(sim.mem[601].wm());
        assert!(!sim.ind.get(indicator::OVERFLOW));
        assert_eq!((sim.a_reg.value(), sim.b_reg.value()), (500, 600));
    }

    #[test]
    fn test_add_carries_and_overflows() {
        let sim = run(r#"
            .org 333 "~A502603~.~}"
            .org 501 "~95"
            .org 601 "~017"
            .start 333
        "#);
        assert_eq!(digits(&sim, 601..604), "112");

        let sim = run(r#"
            .org 333 "~A502602~.~}"
            .org 501 "~95"
            .org 601 "~17"
            .start 333
        "#);
        assert_eq!(digits(&sim, 601..603), "12");
        assert!(sim.ind.get(indicator::OVERFLOW));
    }

    #[test]
    fn test_subtract() {
        // 5 - 3
        let sim = run(r#"
            .org 333 "~S501601~.~}"
            .org 501 "~3"
            .org 601 "~5"
            .start 333
        "#);
        assert_eq!(digits(&sim, 601..602), "2");
        assert!(!sim.mem[601].is_minus());

        // 3 - 5 recomplements into -2
        let sim = run(r#"
            .org 333 "~S502602~.~}"
            .org 501 "~05"
            .org 601 "~03"
            .start 333
        "#);
        assert_eq!(digits(&sim, 601..603), "02");
        assert!(sim.mem[602].is_minus());
        assert_eq!(sim.mem[602].char(), bcd::ascii_to_bcd('K').unwrap());
    }

    #[test]
    fn test_add_unlike_signs() {
        // +4 + -10 = -6 ('O' is 6 with a B zone)
        let sim = run(r#"
            .org 333 "~A502602~.~}"
            .org 501 "~04"
            .org 601 "~1!"
            .start 333
        "#);
        assert_eq!(digits(&sim, 601..603), "06");
        assert!(sim.mem[602].is_minus());
    }

    #[test]
    fn test_zero_add_and_subtract() {
        let sim = run(r#"
            .org 333 "~?503603~!503606~.~}"
            .org 501 "~12N"
            .org 601 "~999~999"
            .start 333
        "#);
        // -125 copied and negated, the old B contents do not matter
        assert_eq!(digits(&sim, 601..604), "125");
        assert!(sim.mem[603].is_minus());
        assert_eq!(digits(&sim, 604..607), "125");
        assert_eq!(sim.mem[606].zone(), SIGN_PLUS);
    }

    #[test]
    fn test_multiply() {
        let sim = run(r#"
            .org 333 "~@502605~.~}"
            .org 501 "~12"
            .org 602 "~3   "
            .start 333
        "#);
        assert_eq!(digits(&sim, 602..606), "0036");
        assert_eq!(sim.mem[605].zone(), SIGN_PLUS);
        assert!(sim.mem[602].wm());
    }

    #[test]
    fn test_multiply_signs_and_digits() {
        // 25 x -43 = -1075
        let sim = run(r#"
            .org 333 "~@502606~.~}"
            .org 501 "~25"
            .org 602 "~4L000"
            .start 333
        "#);
        assert_eq!(digits(&sim, 602..607), "01075");
        assert!(sim.mem[606].is_minus());
    }

    #[test]
    fn test_divide() {
        // 100 / 7 with the dividend's units zoned at 604
        let sim = run(r#"
            .org 333 "~%501602~.~}"
            .org 501 "~7"
            .org 601 "010?"
            .start 333
        "#);
        assert_eq!(digits(&sim, 600..605), "01402");
        assert_eq!(sim.mem[602].zone(), SIGN_PLUS);
        // remainder 2 keeps the plus sign
        assert_eq!(sim.mem[604].char(), bcd::ascii_to_bcd('B').unwrap());
        assert!(!sim.ind.get(indicator::DIVIDE_OVERFLOW));
    }

    #[test]
    fn test_divide_by_zero() {
        let sim = run(r#"
            .org 333 "~%502602~.~}"
            .org 501 "~00"
            .org 601 "0123D"
            .start 333
        "#);
        assert!(sim.ind.get(indicator::DIVIDE_OVERFLOW));
        assert!(sim.ind.get(indicator::OVERFLOW));
        // nothing but the sign changed
        assert_eq!(sim.mem.text(601..605), "0123");
        assert_eq!(sim.mem[605].zone(), SIGN_PLUS);
    }

    #[test]
    fn test_divide_overflow() {
        // 10 / 1 does not fit in one quotient digit
        let sim = run(r#"
            .org 333 "~%501602~.~}"
            .org 501 "~1"
            .org 601 "1?"
            .start 333
        "#);
        assert!(sim.ind.get(indicator::DIVIDE_OVERFLOW));
        assert!(!sim.ind.get(indicator::OVERFLOW));
        // the dividend is restored, sign included
        assert_eq!(sim.mem.text(601..603), "1?");
        assert_eq!(sim.mem[602].zone(), SIGN_PLUS);
    }
}
