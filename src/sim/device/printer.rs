use std::sync::{Arc, RwLock};

use crossbeam_channel as cbc;
use tracing::{event, Level};

use crate::sim::bcd::{ABIT, BBIT, DIGIT, ZONE};
use crate::sim::indicator::{CHANNEL_12, CHANNEL_9, PRINTER_ERROR};

use super::{resolve_lock, ExternalDevice, IoCtx, IoStatus, LinePrinter, PRINT_AREA};

/// A carriage control directive, decoded from the modifier of an `F` instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CarriageAction {
    /// Space 1-3 lines immediately (`J`, `K`, `L`).
    SpaceNow(u8),
    /// Space 1-3 lines after the next print (`/`, `S`, `T`).
    SpaceAfter(u8),
    /// Skip to a carriage tape channel (1-12) immediately (`1`-`9`, `0`, `#`, `@`).
    SkipNow(u8),
    /// Skip to a carriage tape channel (1-12) after the next print (`A`-`I`, `?`, `.`, lozenge).
    SkipAfter(u8),
}
impl CarriageAction {
    /// Decodes a modifier character, if it is a carriage directive.
    pub fn decode(modifier: u8) -> Option<Self> {
        let n = modifier & DIGIT;
        match (modifier & ZONE, n) {
            (0, 1..=12) => Some(Self::SkipNow(n)),
            (ZONE, 1..=12) => Some(Self::SkipAfter(n)),
            (BBIT, 1..=3) => Some(Self::SpaceNow(n)),
            (ABIT, 1..=3) => Some(Self::SpaceAfter(n)),
            _ => None
        }
    }
}

/// The number of carriage tape channels.
const CHANNELS: usize = 12;

/// A printer carriage with a 12-channel carriage control tape.
///
/// Lines are numbered from 1. Moving onto the line punched for channel 9 or 12
/// turns on that channel's indicator; moving onto channel 1's line turns both off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Carriage {
    line: u16,
    form_length: u16,
    channels: [Option<u16>; CHANNELS],
    pending: Option<CarriageAction>,
}
impl Carriage {
    /// Creates a carriage for forms of `form_length` lines, with no channels punched.
    pub fn new(form_length: u16) -> Self {
        Self { line: 1, form_length: form_length.max(1), channels: [None; CHANNELS], pending: None }
    }

    /// Punches `channel` (1-12) at `line`. Out of range arguments are ignored.
    pub fn punch(&mut self, channel: u8, line: u16) {
        if (1..=self.form_length).contains(&line) {
            if let Some(slot) = usize::from(channel).checked_sub(1).and_then(|i| self.channels.get_mut(i)) {
                *slot = Some(line);
            }
        }
    }

    /// The line the carriage is at.
    pub fn line(&self) -> u16 {
        self.line
    }

    fn step(&mut self, ctx: &mut IoCtx) {
        self.line = self.line % self.form_length + 1;
        let at = |ch: usize| self.channels[ch - 1] == Some(self.line);
        if at(1) {
            ctx.ind.set(CHANNEL_9, false);
            ctx.ind.set(CHANNEL_12, false);
        }
        if at(9) {
            ctx.ind.set(CHANNEL_9, true);
        }
        if at(12) {
            ctx.ind.set(CHANNEL_12, true);
        }
    }

    fn space(&mut self, ctx: &mut IoCtx, lines: u8) -> u16 {
        for _ in 0..lines {
            self.step(ctx);
        }
        u16::from(lines)
    }

    fn skip(&mut self, ctx: &mut IoCtx, channel: u8) -> Option<u16> {
        let target = (*self.channels.get(usize::from(channel).checked_sub(1)?)?)?;
        let mut moved = 0;
        loop {
            self.step(ctx);
            moved += 1;
            if self.line == target {
                break Some(moved);
            }
        }
    }

    /// Performs an immediate action, or saves a deferred one for [`Carriage::after_print`].
    ///
    /// Returns the number of lines moved, or `None` when skipping to an unpunched channel.
    pub fn control(&mut self, ctx: &mut IoCtx, action: CarriageAction) -> Option<u16> {
        match action {
            CarriageAction::SpaceNow(n) => Some(self.space(ctx, n)),
            CarriageAction::SkipNow(ch) => self.skip(ctx, ch),
            deferred => {
                self.pending = Some(deferred);
                Some(0)
            }
        }
    }

    /// Moves the carriage after a line prints: the saved deferred action, or a single space.
    pub fn after_print(&mut self, ctx: &mut IoCtx) -> Option<u16> {
        match self.pending.take() {
            Some(CarriageAction::SpaceAfter(n)) => Some(self.space(ctx, n)),
            Some(CarriageAction::SkipAfter(ch)) => self.skip(ctx, ch),
            _ => Some(self.space(ctx, 1)),
        }
    }

    /// Returns the carriage to the top of form and forgets any deferred action.
    pub fn restore(&mut self) {
        self.line = 1;
        self.pending = None;
    }
}
impl Default for Carriage {
    /// A 66-line form with channel 1 at line 1, channel 9 at line 60 and channel 12 at line 63.
    fn default() -> Self {
        let mut carriage = Self::new(66);
        carriage.punch(1, 1);
        carriage.punch(9, 60);
        carriage.punch(12, 63);
        carriage
    }
}

/// Renders the print area as a line, with trailing blanks removed.
fn print_line(ctx: &IoCtx) -> String {
    ctx.mem.text(*PRINT_AREA.start()..*PRINT_AREA.end() + 1)
        .trim_end()
        .to_string()
}

/// Runs a carriage action on `carriage`, mapping a skip to an unpunched channel to a printer error.
fn run_carriage(carriage: &mut Carriage, ctx: &mut IoCtx, action: CarriageAction) -> IoStatus {
    match carriage.control(ctx, action) {
        Some(_) => IoStatus::Ok,
        None => {
            event!(Level::WARN, "carriage skip to unpunched channel ({action:?})");
            ctx.ind.set(PRINTER_ERROR, true);
            IoStatus::IoError
        }
    }
}

/// Line printer that appends each printed line to a buffer.
///
/// Blank lines produced by carriage movement are not recorded;
/// the carriage position can be read back with [`BufferedPrinter::get_carriage`].
#[derive(Clone)]
pub struct BufferedPrinter {
    lines: Arc<RwLock<Vec<String>>>,
    carriage: Carriage,
}
impl BufferedPrinter {
    /// Creates a new printer, wrapping it around a given buffer.
    pub fn new(lines: Arc<RwLock<Vec<String>>>) -> Self {
        Self { lines, carriage: Carriage::default() }
    }

    /// Gets a reference to the printed lines.
    pub fn get_lines(&self) -> &Arc<RwLock<Vec<String>>> {
        &self.lines
    }
    /// Gets the printer's carriage.
    pub fn get_carriage(&self) -> &Carriage {
        &self.carriage
    }
    /// Replaces the printer's carriage (for a different form or carriage tape).
    pub fn set_carriage(&mut self, carriage: Carriage) {
        self.carriage = carriage;
    }
}
impl Default for BufferedPrinter {
    fn default() -> Self {
        Self::new(Default::default())
    }
}
impl ExternalDevice for BufferedPrinter {
    fn io_reset(&mut self) {
        self.carriage.restore();
    }
}
impl LinePrinter for BufferedPrinter {
    fn write_line(&mut self, ctx: &mut IoCtx, _length: u8, _modifier: u8) -> IoStatus {
        let line = print_line(ctx);
        let Some(mut lines) = resolve_lock(self.lines.try_write()) else {
            ctx.ind.set(PRINTER_ERROR, true);
            return IoStatus::IoError;
        };
        lines.push(line);
        drop(lines);

        ctx.ind.set(PRINTER_ERROR, false);
        match self.carriage.after_print(ctx) {
            Some(_) => IoStatus::Ok,
            None => {
                ctx.ind.set(PRINTER_ERROR, true);
                IoStatus::IoError
            }
        }
    }

    fn carriage_control(&mut self, ctx: &mut IoCtx, action: CarriageAction) -> IoStatus {
        run_carriage(&mut self.carriage, ctx, action)
    }
}

/// Line printer that sends each printed line through a channel.
///
/// If the receiving end hangs up, printing fails with a printer error.
#[derive(Debug)]
pub struct ChannelPrinter {
    sender: cbc::Sender<String>,
    carriage: Carriage,
}
impl ChannelPrinter {
    /// Creates a new channel printer, returning the printer and the receiving end for its lines.
    pub fn new() -> (Self, cbc::Receiver<String>) {
        let (sender, receiver) = cbc::unbounded();
        (Self { sender, carriage: Carriage::default() }, receiver)
    }
}
impl ExternalDevice for ChannelPrinter {
    fn io_reset(&mut self) {
        self.carriage.restore();
    }
}
impl LinePrinter for ChannelPrinter {
    fn write_line(&mut self, ctx: &mut IoCtx, _length: u8, _modifier: u8) -> IoStatus {
        let sent = self.sender.send(print_line(ctx)).is_ok();
        let moved = self.carriage.after_print(ctx).is_some();

        ctx.ind.set(PRINTER_ERROR, !(sent && moved));
        match sent && moved {
            true  => IoStatus::Ok,
            false => IoStatus::IoError,
        }
    }

    fn carriage_control(&mut self, ctx: &mut IoCtx, action: CarriageAction) -> IoStatus {
        run_carriage(&mut self.carriage, ctx, action)
    }
}

#[cfg(test)]
mod tests {
    use crate::sim::bcd;
    use crate::sim::device::clock::EventQueue;
    use crate::sim::device::DeviceId;
    use crate::sim::indicator::Indicators;
    use crate::sim::mem::Memory;

    use super::*;

    fn code(ch: char) -> u8 {
        bcd::ascii_to_bcd(ch).unwrap()
    }

    #[test]
    fn test_decode() {
        assert_eq!(CarriageAction::decode(code('J')), Some(CarriageAction::SpaceNow(1)));
        assert_eq!(CarriageAction::decode(code('L')), Some(CarriageAction::SpaceNow(3)));
        assert_eq!(CarriageAction::decode(code('/')), Some(CarriageAction::SpaceAfter(1)));
        assert_eq!(CarriageAction::decode(code('T')), Some(CarriageAction::SpaceAfter(3)));
        assert_eq!(CarriageAction::decode(code('1')), Some(CarriageAction::SkipNow(1)));
        assert_eq!(CarriageAction::decode(code('0')), Some(CarriageAction::SkipNow(10)));
        assert_eq!(CarriageAction::decode(code('@')), Some(CarriageAction::SkipNow(12)));
        assert_eq!(CarriageAction::decode(code('A')), Some(CarriageAction::SkipAfter(1)));
        assert_eq!(CarriageAction::decode(code(')')), Some(CarriageAction::SkipAfter(12)));
        assert_eq!(CarriageAction::decode(code('?')), Some(CarriageAction::SkipAfter(10)));

        assert_eq!(CarriageAction::decode(code('M')), None);
        assert_eq!(CarriageAction::decode(code(' ')), None);
    }

    #[test]
    fn test_carriage_channels() {
        let mut mem = Memory::new(4000, &mut 0u8);
        let mut ind = Indicators::new();
        let mut events = EventQueue::new();
        let mut ctx = IoCtx { mem: &mut mem, ind: &mut ind, events: &mut events, addr: 0, source: DeviceId::Printer };

        let mut carriage = Carriage::default();
        assert_eq!(carriage.control(&mut ctx, CarriageAction::SkipNow(9)), Some(59));
        assert_eq!(carriage.line(), 60);
        assert!(ctx.ind.get(CHANNEL_9));

        assert_eq!(carriage.control(&mut ctx, CarriageAction::SpaceNow(3)), Some(3));
        assert!(ctx.ind.get(CHANNEL_12));

        // deferred until the next print
        assert_eq!(carriage.control(&mut ctx, CarriageAction::SkipAfter(1)), Some(0));
        assert_eq!(carriage.line(), 63);
        assert_eq!(carriage.after_print(&mut ctx), Some(4));
        assert_eq!(carriage.line(), 1);
        assert!(!ctx.ind.get(CHANNEL_9));
        assert!(!ctx.ind.get(CHANNEL_12));

        assert_eq!(carriage.control(&mut ctx, CarriageAction::SkipNow(5)), None);
    }

    #[test]
    fn test_buffered_printer() {
        let mut mem = Memory::new(4000, &mut 0u8);
        let mut ind = Indicators::new();
        let mut events = EventQueue::new();
        mem.write_text(201, "TOTAL   42");
        let mut ctx = IoCtx { mem: &mut mem, ind: &mut ind, events: &mut events, addr: 0, source: DeviceId::Printer };

        let mut printer = BufferedPrinter::default();
        assert_eq!(printer.write_line(&mut ctx, 1, bcd::BLANK), IoStatus::Ok);
        assert_eq!(printer.get_carriage().line(), 2);
        assert_eq!(printer.carriage_control(&mut ctx, CarriageAction::SkipNow(3)), IoStatus::IoError);
        assert!(ctx.ind.get(PRINTER_ERROR));

        assert_eq!(&*printer.get_lines().read().unwrap(), &["TOTAL   42"]);
    }

    #[test]
    fn test_channel_printer() {
        let mut mem = Memory::new(4000, &mut 0u8);
        let mut ind = Indicators::new();
        let mut events = EventQueue::new();
        mem.write_text(201, "LINE");
        let mut ctx = IoCtx { mem: &mut mem, ind: &mut ind, events: &mut events, addr: 0, source: DeviceId::Printer };

        let (mut printer, rx) = ChannelPrinter::new();
        assert_eq!(printer.write_line(&mut ctx, 1, bcd::BLANK), IoStatus::Ok);
        assert_eq!(rx.try_recv().as_deref(), Ok("LINE"));

        drop(rx);
        assert_eq!(printer.write_line(&mut ctx, 1, bcd::BLANK), IoStatus::IoError);
        assert!(ctx.ind.get(PRINTER_ERROR));
    }
}
