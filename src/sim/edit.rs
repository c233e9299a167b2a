//! Move with zero suppression (`Z`) and move and edit (`E`).
//!
//! Both instructions make a right-to-left pass that moves the data, then a
//! left-to-right pass that removes leading zeros.
//!
//! An edit control word at B has up to three regions, scanned from the right:
//!
//! ```text
//!   ~bb,bb0.bb&CR
//!   |   body   |status
//! ```
//!
//! - The right status region (up to the first blank or zero) keeps `-`, `C` and `R`
//!   only when the data is negative. `&` becomes a blank.
//! - In the body every blank and zero takes the next data digit. The first (rightmost)
//!   zero is the zero-suppression control: leading zeros are suppressed up to it.
//! - Once the data runs out, the remaining control characters on the left are blanked.
//!
//! With expanded edit installed, a `$` or `*` just left of the zero control
//! selects a floating dollar sign or asterisk fill.

use super::bcd::{self, is_significant_digit, AMPERSAND, ASTERISK, BLANK, COMMA, DOLLAR, DIGIT, LETTER_C, LETTER_R, MINUS, PERIOD, ZERO};
use super::decode::CpuOptions;
use super::mem::Cell;
use super::{Simulator, StopReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    RightStatus,
    Body,
    LeftStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fill {
    Blank,
    FloatDollar,
    Asterisk,
}
impl Fill {
    fn char(self) -> u8 {
        match self {
            Fill::Asterisk => ASTERISK,
            Fill::Blank | Fill::FloatDollar => BLANK,
        }
    }
}

impl Simulator {
    /// `Z`: moves A to B, clearing B's word marks and the units zone,
    /// then blanks leading zeros and commas.
    ///
    /// A blank restarts suppression, so several fields can be moved and suppressed at once.
    pub(super) fn move_suppress(&mut self) -> Result<(), StopReason> {
        let b_units = self.b_reg.value();
        let mut units = true;
        loop {
            let a = self.read(self.a_reg.value());
            let c = match units {
                true  => a.char() & DIGIT,
                false => a.char(),
            };
            self.write(self.b_reg.value(), Cell::new(c));
            units = false;
            self.a_reg.decrement()?;
            self.b_reg.decrement()?;

            if a.wm() {
                break;
            }
        }

        let mut suppress = true;
        for addr in self.b_reg.value() + 1..=b_units {
            let mut cell = self.read(addr);
            match cell.char() {
                ZERO | COMMA if suppress => {
                    cell.set_char(BLANK);
                    self.write(addr, cell);
                },
                ZERO | COMMA => {},
                BLANK => suppress = true,
                _ => suppress = false,
            }
        }
        Ok(())
    }

    /// Takes the next data digit for the edit, moving A down.
    fn next_edit_digit(&mut self, region: &mut Region) -> Result<u8, StopReason> {
        let a = self.read(self.a_reg.value());
        self.a_reg.decrement()?;
        if a.wm() {
            *region = Region::LeftStatus;
        }
        Ok(a.digit())
    }

    /// `E`: edits the data at A into the control word at B.
    pub(super) fn edit(&mut self) -> Result<(), StopReason> {
        let expanded = self.flags.options.contains(CpuOptions::EXPANDED_EDIT);
        let b_units = self.b_reg.value();
        let minus = self.read(self.a_reg.value()).is_minus();

        let mut region = Region::RightStatus;
        let mut zero_control = None;
        let mut fill = Fill::Blank;

        // pass 1: right to left, move data into the control word
        loop {
            let addr = self.b_reg.value();
            let mut cell = self.read(addr);
            let c = cell.char();
            if region == Region::RightStatus && matches!(c, BLANK | ZERO) {
                region = Region::Body;
            }

            match region {
                Region::RightStatus => match c {
                    MINUS | LETTER_C | LETTER_R if !minus => cell.set_char(BLANK),
                    AMPERSAND => cell.set_char(BLANK),
                    _ => {},
                },
                Region::Body => match c {
                    BLANK | ZERO => {
                        if c == ZERO && zero_control.is_none() {
                            zero_control = Some(addr);
                        }
                        let d = self.next_edit_digit(&mut region)?;
                        cell.set_char(d);
                    },
                    DOLLAR | ASTERISK if expanded && fill == Fill::Blank && zero_control == Some(addr + 1) => {
                        fill = match c {
                            DOLLAR => Fill::FloatDollar,
                            _ => Fill::Asterisk,
                        };
                        let d = self.next_edit_digit(&mut region)?;
                        cell.set_char(d);
                    },
                    AMPERSAND => cell.set_char(BLANK),
                    _ => {},
                },
                Region::LeftStatus => if matches!(c, BLANK | ZERO | AMPERSAND) {
                    cell.set_char(BLANK);
                },
            }
            self.write(addr, cell);
            self.b_reg.decrement()?;

            if cell.wm() {
                break;
            }
        }

        let Some(zero_control) = zero_control else { return Ok(()) };
        let start = self.b_reg.value() + 1;

        // pass 2: left to right, suppress leading zeros and commas up to the zero control
        let mut suppress = true;
        let mut significant = false;
        let mut decimal = false;
        for addr in start..=b_units {
            let mut cell = self.read(addr);
            let c = cell.char();
            if is_significant_digit(c) {
                significant = true;
                suppress = false;
            } else if c == PERIOD {
                decimal = true;
                suppress = false;
            } else if suppress && matches!(c, ZERO | COMMA | BLANK) && c != fill.char() {
                cell.set_char(fill.char());
                self.write(addr, cell);
            }
            if addr == zero_control {
                suppress = false;
            }
        }

        // pass 3: an all-zero amount with a decimal point prints as fill only
        if !significant && decimal {
            for addr in start..=b_units {
                let mut cell = self.read(addr);
                if matches!(cell.char(), ZERO | COMMA | PERIOD) {
                    cell.set_char(fill.char());
                    self.write(addr, cell);
                }
            }
        }
        if fill == Fill::FloatDollar {
            for addr in (start..=zero_control).rev() {
                let mut cell = self.read(addr);
                if cell.char() == BLANK {
                    cell.set_char(bcd::DOLLAR);
                    self.write(addr, cell);
                    break;
                }
            }
        }
        Ok(())
    }
}
