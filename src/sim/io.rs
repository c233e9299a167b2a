//! I/O instructions.
//!
//! These validate their modifier, make one or more device calls through the
//! [`DeviceHandler`](super::device::DeviceHandler) and turn the device status into a stop
//! (see [`Simulator::check_io`]).
//!
//! The unit record instructions (`1`-`7`) combine write (2), read (1) and punch (4)
//! and run them in that order. Their 4- and 5-character forms branch to A afterwards,
//! even when a device call stopped the machine.
//!
//! Tape, disk and inquiry transfers use the move and load instructions with a `%` A-field:
//!
//! ```text
//!   M %U1 bbb R     read tape 1 (BCD) into bbb
//!   L %B2 bbb W     write tape 2 (binary) from bbb, with word marks
//!   M %F1 bbb R     disk operation 1
//!   M %T0 bbb W     write to the inquiry terminal
//!   U %U1 R         rewind tape 1
//! ```

use tracing::{event, Level};

use super::bcd::{self, PERCENT};
use super::decode::{Instr, Op};
use super::device::{CarriageAction, DeviceId, IoCtx, IoMode, IoStatus, TAPE_UNITS};
use super::{Simulator, StopReason};

/// Builds the [`IoCtx`] for a device call.
///
/// This borrows the fields individually, so the device handler stays free.
macro_rules! io_ctx {
    ($sim:ident, $addr:expr, $source:expr) => {
        &mut IoCtx {
            mem: &mut $sim.mem,
            ind: &mut $sim.ind,
            events: &mut $sim.events,
            addr: $addr,
            source: $source,
        }
    };
}

const DEV_TAPE: u8 = 0o24; // U
const DEV_BINARY_TAPE: u8 = 0o62; // B
const DEV_DISK: u8 = 0o66; // F
const DEV_INQUIRY: u8 = 0o23; // T

const READ: u8 = 0o51; // R
const WRITE: u8 = 0o26; // W

/// Stacker modifiers: `1` and `2` belong to the reader, `4` and `8` to the punch.
const STACKERS: [u8; 4] = [1, 2, 4, 8];

/// Tape control functions: backspace, erase, tape mark, rewind, rewind and unload.
const TAPE_FUNCTIONS: [u8; 5] = [0o62, 0o65, 0o44, 0o51, 0o24];

impl Simulator {
    /// Converts a device status into a stop.
    ///
    /// Device errors (I/O error, write lock, disk error) only stop the machine
    /// when [`SimFlags::strict_io`](super::SimFlags::strict_io) is on;
    /// the device has already set its own indicator.
    /// Everything else that is not [`IoStatus::Ok`] always stops.
    pub(super) fn check_io(&self, status: IoStatus) -> Result<(), StopReason> {
        let reason = match status {
            IoStatus::Ok => return Ok(()),
            IoStatus::NotAttached     => StopReason::NotAttached,
            IoStatus::NoCards         => StopReason::NoCards,
            IoStatus::InvalidModifier => StopReason::InvalidModifier,
            IoStatus::IoError         => StopReason::IoCheck,
            IoStatus::WriteLocked     => StopReason::WriteLocked,
            IoStatus::DiskError       => StopReason::DiskError,
        };

        let device_error = matches!(status, IoStatus::IoError | IoStatus::WriteLocked | IoStatus::DiskError);
        if device_error && !self.flags.strict_io {
            event!(Level::DEBUG, "device reported {status:?}, I/O check is off");
            return Ok(());
        }
        event!(Level::WARN, "device reported {status:?}, stopping");
        Err(reason)
    }

    /// Branches to A for the 4- and 5-character forms of the unit record and carriage instructions.
    ///
    /// The branch is taken whatever the device calls returned.
    /// A stop from the device calls is reported over one from the branch.
    fn io_branch(&mut self, instr: &Instr, result: Result<(), StopReason>) -> Result<(), StopReason> {
        match instr.len {
            4 | 5 => {
                let branched = self.branch_to(instr.start, self.a_reg);
                result.and(branched)
            },
            _ => result,
        }
    }

    /// `1`-`7`: write a line, read a card and/or punch a card.
    pub(super) fn card_io(&mut self, instr: &Instr) -> Result<(), StopReason> {
        let (len, d) = (instr.len, instr.modifier);
        if matches!(len, 2 | 5) && !STACKERS.contains(&d) {
            return Err(StopReason::InvalidModifier);
        }

        let result = self.unit_record(instr);
        self.io_branch(instr, result)
    }

    /// The device calls of a unit record instruction, in write, read, punch order.
    ///
    /// The first call that stops the machine skips the rest.
    fn unit_record(&mut self, instr: &Instr) -> Result<(), StopReason> {
        let (len, d) = (instr.len, instr.modifier);
        let code = instr.op.code();
        event!(Level::DEBUG, "unit record op {code:o} (length {len})");
        if code & 0o2 != 0 {
            let status = self.device_handler.write_line(io_ctx!(self, 0, DeviceId::Printer), len, d);
            self.check_io(status)?;
        }
        if code & 0o1 != 0 {
            let status = self.device_handler.read_card(io_ctx!(self, 0, DeviceId::Reader), len, d);
            self.check_io(status)?;
        }
        if code & 0o4 != 0 {
            let status = self.device_handler.punch_card(io_ctx!(self, 0, DeviceId::Punch), len, d);
            self.check_io(status)?;
        }
        Ok(())
    }

    /// `8`, `9`: start read/punch feed.
    ///
    /// Buffered devices have no feed timing, so these do nothing.
    pub(super) fn start_feed(&mut self, instr: &Instr) -> Result<(), StopReason> {
        event!(Level::TRACE, "start feed {:?}", instr.op);
        Ok(())
    }

    /// `F`: carriage control.
    pub(super) fn carriage(&mut self, instr: &Instr) -> Result<(), StopReason> {
        let action = CarriageAction::decode(instr.modifier).ok_or(StopReason::InvalidModifier)?;
        let status = self.device_handler.carriage_control(io_ctx!(self, 0, DeviceId::Printer), action);
        let result = self.check_io(status);
        self.io_branch(instr, result)
    }

    /// `K`: select stacker.
    pub(super) fn select_stacker(&mut self, instr: &Instr) -> Result<(), StopReason> {
        let d = instr.modifier;
        let status = match bcd::to_binary_digit(d) {
            1 | 2 if d & bcd::ZONE == 0 => self.device_handler.reader_select_stack(io_ctx!(self, 0, DeviceId::Reader), d),
            4 | 8 if d & bcd::ZONE == 0 => self.device_handler.punch_select_stack(io_ctx!(self, 0, DeviceId::Punch), d),
            _ => return Err(StopReason::InvalidModifier),
        };
        self.check_io(status)
    }

    /// Splits a `%xn` A-field into its device letter and unit number.
    fn percent_unit(instr: &Instr) -> Result<(u8, u8), StopReason> {
        match instr.a_chars {
            [PERCENT, dev, unit] => Ok((dev, bcd::to_binary_digit(unit))),
            _ => Err(StopReason::NoDevice),
        }
    }

    /// `U %xn d`: tape control.
    pub(super) fn tape_control(&mut self, instr: &Instr) -> Result<(), StopReason> {
        let (dev, unit) = Self::percent_unit(instr)?;
        if !matches!(dev, DEV_TAPE | DEV_BINARY_TAPE) || !(1..=TAPE_UNITS as u8).contains(&unit) {
            return Err(StopReason::NoDevice);
        }
        if !TAPE_FUNCTIONS.contains(&instr.modifier) {
            return Err(StopReason::InvalidModifier);
        }

        let mode = IoMode { binary: dev == DEV_BINARY_TAPE, load: false };
        event!(Level::DEBUG, "tape {unit} control {}", bcd::bcd_to_ascii(instr.modifier));
        let status = self.device_handler.mt_func(io_ctx!(self, 0, DeviceId::Tape(unit)), unit, mode, instr.modifier);
        self.check_io(status)
    }

    /// `M %xn bbb d` and `L %xn bbb d`: tape, disk and inquiry transfers.
    pub(super) fn percent_io(&mut self, instr: &Instr) -> Result<(), StopReason> {
        let (dev, unit) = Self::percent_unit(instr)?;
        let mode = IoMode {
            binary: dev == DEV_BINARY_TAPE,
            load: instr.op == Op::LoadChars,
        };
        let d = instr.modifier;
        let addr = self.b_reg.get(StopReason::InvalidB)?;
        if !matches!(d, READ | WRITE) {
            return Err(StopReason::InvalidModifier);
        }

        event!(Level::DEBUG, "%{}{unit} {} at {addr} ({mode:?})", bcd::bcd_to_ascii(dev), bcd::bcd_to_ascii(d));
        let status = match dev {
            DEV_TAPE | DEV_BINARY_TAPE if (1..=TAPE_UNITS as u8).contains(&unit) => {
                self.device_handler.mt_io(io_ctx!(self, addr, DeviceId::Tape(unit)), unit, mode, d)
            },
            DEV_DISK => self.device_handler.dp_io(io_ctx!(self, addr, DeviceId::Disk), unit, mode, d),
            DEV_INQUIRY => self.device_handler.inq_io(io_ctx!(self, addr, DeviceId::Inquiry), mode, d),
            _ => return Err(StopReason::NoDevice),
        };
        self.check_io(status)
    }
}

#[cfg(test)]
mod tests {
    use crate::load::parse_image;
    use crate::sim::device::{BufferedCardReader, BufferedInquiry, BufferedPrinter, BufferedPunch, BufferedTape};
    use crate::sim::indicator::{CHANNEL_9, READER_ERROR, TAPE_ERROR};

    use super::*;

    fn sim_with(src: &str) -> Simulator {
        let mut sim = Simulator::default();
        sim.load_image(&parse_image(src).unwrap()).unwrap();
        sim
    }

    fn reader_with(cards: &[&str]) -> BufferedCardReader {
        let reader = BufferedCardReader::default();
        reader.get_hopper().write().unwrap().extend(cards.iter().map(|c| c.to_string()));
        reader
    }

    #[test]
    fn test_read_and_print() {
        let mut sim = sim_with(r#"
            .org 333 "~1~M080280~2~.~}"
            .start 333
        "#);
        sim.mem[1].set_wm(true);
        sim.device_handler.set_reader(reader_with(&["FIRST CARD"]));
        let printer = BufferedPrinter::default();
        sim.device_handler.set_printer(printer.clone());

        assert_eq!(sim.run(), StopReason::Halt);
        assert_eq!(sim.mem.text(201..211), "FIRST CARD");
        assert_eq!(&*printer.get_lines().read().unwrap(), &["FIRST CARD"]);
    }

    #[test]
    fn test_missing_devices() {
        let mut sim = sim_with(r#"
            .org 333 "~1~.~}"
            .start 333
        "#);
        assert_eq!(sim.run(), StopReason::NotAttached);

        sim.device_handler.set_reader(reader_with(&[]));
        sim.is = 333;
        assert_eq!(sim.run(), StopReason::NoCards);
    }

    #[test]
    fn test_read_branches() {
        let mut sim = sim_with(r#"
            .org 333 "~1400~.~}"
            .org 400 "~.~}"
            .start 333
        "#);
        sim.device_handler.set_reader(reader_with(&["X"]));
        assert_eq!(sim.run(), StopReason::Halt);
        assert_eq!(sim.is, 401);
        assert_eq!(sim.b_reg.value(), 337);
    }

    #[test]
    fn test_branch_taken_after_stop() {
        let mut sim = sim_with(r#"
            .org 333 "~1400~.~}"
            .org 400 "~.~}"
            .start 333
        "#);
        sim.device_handler.set_reader(reader_with(&[]));
        assert_eq!(sim.run(), StopReason::NoCards);
        assert_eq!(sim.is, 400);
        assert_eq!(sim.b_reg.value(), 337);

        // resuming continues at the branch target
        assert_eq!(sim.run(), StopReason::Halt);
        assert_eq!(sim.is, 401);

        let mut sim = sim_with(r#"
            .org 333 "~F4009~.~}"
            .org 400 "~.~}"
            .start 333
        "#);
        assert_eq!(sim.run(), StopReason::NotAttached);
        assert_eq!(sim.is, 400);
    }

    #[test]
    fn test_reader_error_and_io_check() {
        let src = r#"
            .org 333 "~1~.~}"
            .start 333
        "#;
        let mut sim = sim_with(src);
        sim.device_handler.set_reader(reader_with(&["{"]));
        assert_eq!(sim.run(), StopReason::Halt);
        assert!(sim.ind.get(READER_ERROR));

        let mut sim = sim_with(src);
        sim.flags.strict_io = true;
        sim.device_handler.set_reader(reader_with(&["{"]));
        assert_eq!(sim.run(), StopReason::IoCheck);
    }

    #[test]
    fn test_stacker_modifiers() {
        let mut sim = sim_with(r#"
            .org 333 "~12~4~K8~.~}"
            .start 333
        "#);
        let reader = reader_with(&["A"]);
        let punch = BufferedPunch::default();
        sim.device_handler.set_reader(reader.clone());
        sim.device_handler.set_punch(punch.clone());
        assert_eq!(sim.run(), StopReason::Halt);
        assert_eq!(reader.get_stacked().read().unwrap()[0].0, 2);
        assert_eq!(punch.get_cards().read().unwrap()[0].0, 8);

        let mut sim = sim_with(r#"
            .org 333 "~13~.~}"
            .start 333
        "#);
        sim.device_handler.set_reader(reader_with(&["A"]));
        assert_eq!(sim.run(), StopReason::InvalidModifier);

        let mut sim = sim_with(r#"
            .org 333 "~K3~.~}"
            .start 333
        "#);
        assert_eq!(sim.run(), StopReason::InvalidModifier);
    }

    #[test]
    fn test_carriage_control() {
        let mut sim = sim_with(r#"
            .org 333 "~F9~.~}"
            .start 333
        "#);
        sim.device_handler.set_printer(BufferedPrinter::default());
        assert_eq!(sim.run(), StopReason::Halt);
        assert!(sim.ind.get(CHANNEL_9));

        let mut sim = sim_with(r#"
            .org 333 "~FM~.~}"
            .start 333
        "#);
        sim.device_handler.set_printer(BufferedPrinter::default());
        assert_eq!(sim.run(), StopReason::InvalidModifier);
    }

    #[test]
    fn test_tape_transfers() {
        let mut sim = sim_with(r#"
            .org 333 "~M%U1500W~U%U1R~L%U1700R~.~}"
            .org 500 "~DATA~}"
            .org 700 "~XXXXXX"
            .start 333
        "#);
        let tape = BufferedTape::default();
        assert!(sim.device_handler.attach_tape(1, tape.clone()).is_ok());

        assert_eq!(sim.run(), StopReason::Halt);
        assert_eq!(sim.mem.text(700..706), "DATA}X");
        assert!(!sim.mem[700].wm());
        assert_eq!(tape.get_records().read().unwrap().len(), 1);
    }

    #[test]
    fn test_percent_devices() {
        let mut sim = sim_with(r#"
            .org 333 "~M%X1500R~.~}"
            .start 333
        "#);
        assert_eq!(sim.run(), StopReason::NoDevice);

        let mut sim = sim_with(r#"
            .org 333 "~M%U2500R~.~}"
            .start 333
        "#);
        assert_eq!(sim.run(), StopReason::NotAttached);

        let mut sim = sim_with(r#"
            .org 333 "~M%F1500R~.~}"
            .start 333
        "#);
        assert_eq!(sim.run(), StopReason::NotAttached);

        let mut sim = sim_with(r#"
            .org 333 "~M%U1500X~.~}"
            .start 333
        "#);
        assert_eq!(sim.run(), StopReason::InvalidModifier);

        let mut sim = sim_with(r#"
            .org 333 "~U%U7R~.~}"
            .start 333
        "#);
        assert_eq!(sim.run(), StopReason::NoDevice);
    }

    #[test]
    fn test_write_lock_gating() {
        let src = r#"
            .org 333 "~M%U1500W~.~}"
            .org 500 "~}"
            .start 333
        "#;
        let mut tape = BufferedTape::default();
        tape.set_write_locked(true);

        let mut sim = sim_with(src);
        assert!(sim.device_handler.attach_tape(1, tape.clone()).is_ok());
        assert_eq!(sim.run(), StopReason::Halt);
        // the refused write still shows on the tape indicator
        assert!(sim.ind.get(TAPE_ERROR));
        assert!(tape.get_records().read().unwrap().is_empty());

        let mut sim = sim_with(src);
        sim.flags.strict_io = true;
        assert!(sim.device_handler.attach_tape(1, tape).is_ok());
        assert_eq!(sim.run(), StopReason::WriteLocked);
    }

    #[test]
    fn test_inquiry() {
        let mut sim = sim_with(r#"
            .org 333 "~M%T0500R~.~}"
            .start 333
        "#);
        let inquiry = BufferedInquiry::default();
        inquiry.get_requests().write().unwrap().push_back("QUERY".to_string());
        sim.device_handler.set_inquiry(inquiry);

        assert_eq!(sim.run(), StopReason::Halt);
        assert_eq!(sim.mem.text(500..505), "QUERY");
    }
}
