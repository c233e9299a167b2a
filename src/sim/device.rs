//! Handlers for external devices connected to the Simulator.
//!
//! Every I/O instruction goes through a device trait. Each device category has its own
//! trait with the calls the engine makes on it; all of them extend [`ExternalDevice`].
//!
//! The core types here are:
//! - [`ExternalDevice`]: The base of every device trait.
//! - [`DeviceHandler`]: The set of devices attached to the Simulator.
//! - [`IoCtx`]: What a device can see and change while it runs.
//! - [`IoStatus`]: What a device reports back.
//! - [`clock::EventQueue`]: Device work scheduled for the future.
//!
//! This module also provides some devices:
//! - [`NullDevice`]: Reports that nothing is attached.
//! - [`BufferedCardReader`], [`BufferedPunch`]: Card decks kept in memory buffers.
//! - [`BufferedPrinter`], [`ChannelPrinter`]: Line printers writing to a buffer or a channel.
//! - [`BufferedTape`]: A magnetic tape kept as a list of records.
//! - [`BufferedInquiry`]: An inquiry terminal fed from a request queue.

pub mod clock;
mod cards;
mod inquiry;
mod printer;
mod tape;

use std::sync::TryLockResult;

use tracing::{event, Level};

pub use cards::{BufferedCardReader, BufferedPunch};
pub use inquiry::BufferedInquiry;
pub use printer::{BufferedPrinter, Carriage, CarriageAction, ChannelPrinter};
pub use tape::{BufferedTape, TapeRecord};

use super::indicator::Indicators;
use super::mem::Memory;
use clock::EventQueue;

/// Card reader read area.
pub const READ_AREA: std::ops::RangeInclusive<u16> = 1..=80;
/// Card punch area.
pub const PUNCH_AREA: std::ops::RangeInclusive<u16> = 101..=180;
/// Print area.
pub const PRINT_AREA: std::ops::RangeInclusive<u16> = 201..=332;
/// The number of tape drives the machine can address.
pub const TAPE_UNITS: usize = 6;

/// The result of a device call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoStatus {
    /// The operation completed.
    Ok,
    /// No device is attached.
    NotAttached,
    /// The card reader hopper is empty.
    NoCards,
    /// The device failed (the device sets its own error indicator).
    IoError,
    /// The tape is write locked.
    WriteLocked,
    /// The disk reported an address or sector error.
    DiskError,
    /// The device does not accept this modifier.
    InvalidModifier,
}

/// How a transfer treats word marks and character codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IoMode {
    /// Binary (odd parity) tape mode instead of BCD.
    pub binary: bool,
    /// Load mode: word marks are transferred along with characters.
    pub load: bool,
}

/// Identifies one device for event scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeviceId {
    /// The card reader.
    Reader,
    /// The card punch.
    Punch,
    /// The line printer.
    Printer,
    /// A tape drive (1-6).
    Tape(u8),
    /// The disk.
    Disk,
    /// The inquiry terminal.
    Inquiry,
}

/// The machine state a device may touch during a call.
#[derive(Debug)]
pub struct IoCtx<'a> {
    /// Memory.
    pub mem: &'a mut Memory,
    /// The indicator latches.
    pub ind: &'a mut Indicators,
    /// The event queue, for scheduling later work.
    pub events: &'a mut EventQueue,
    /// The memory address the instruction named (0 if none).
    pub addr: u16,
    /// The device being called.
    pub source: DeviceId,
}
impl IoCtx<'_> {
    /// Asks for [`ExternalDevice::service`] to be called on this device after `delay` instructions.
    pub fn schedule(&mut self, delay: u32) {
        self.events.schedule(delay, self.source);
    }
}

/// An external device, which can be attached to one of the Simulator's device slots.
pub trait ExternalDevice: Send + Sync + 'static {
    /// Resets device.
    fn io_reset(&mut self) {}

    /// Called when an event this device scheduled comes due.
    fn service(&mut self, _ctx: &mut IoCtx) -> IoStatus {
        IoStatus::Ok
    }
}

/// A card reader.
pub trait CardReader: ExternalDevice {
    /// Reads the next card into the read area.
    ///
    /// `length` is the instruction length. For lengths 2 and 5, `modifier` selects the stacker.
    fn read_card(&mut self, ctx: &mut IoCtx, length: u8, modifier: u8) -> IoStatus;
    /// Selects the stacker for the last card read.
    fn select_stack(&mut self, ctx: &mut IoCtx, modifier: u8) -> IoStatus;
}

/// A card punch.
pub trait CardPunch: ExternalDevice {
    /// Punches the punch area onto the next card.
    ///
    /// `length` is the instruction length. For lengths 2 and 5, `modifier` selects the stacker.
    fn punch_card(&mut self, ctx: &mut IoCtx, length: u8, modifier: u8) -> IoStatus;
    /// Selects the stacker for the last card punched.
    fn select_stack(&mut self, ctx: &mut IoCtx, modifier: u8) -> IoStatus;
}

/// A line printer.
pub trait LinePrinter: ExternalDevice {
    /// Prints the print area.
    fn write_line(&mut self, ctx: &mut IoCtx, length: u8, modifier: u8) -> IoStatus;
    /// Moves the carriage. The modifier has already been checked with [`CarriageAction::decode`].
    fn carriage_control(&mut self, ctx: &mut IoCtx, action: CarriageAction) -> IoStatus;
}

/// A magnetic tape drive.
pub trait TapeUnit: ExternalDevice {
    /// Reads (`R`) or writes (`W`) a record at `ctx.addr`.
    fn mt_io(&mut self, ctx: &mut IoCtx, unit: u8, mode: IoMode, modifier: u8) -> IoStatus;
    /// Backspace (`B`), erase (`E`), tape mark (`M`), rewind (`R`) or rewind and unload (`U`).
    fn mt_func(&mut self, ctx: &mut IoCtx, unit: u8, mode: IoMode, modifier: u8) -> IoStatus;
}

/// A disk storage unit.
pub trait DiskUnit: ExternalDevice {
    /// Runs a disk operation. `function` is the digit after `%F`.
    fn dp_io(&mut self, ctx: &mut IoCtx, function: u8, mode: IoMode, modifier: u8) -> IoStatus;
}

/// An inquiry terminal.
pub trait InquiryTerminal: ExternalDevice {
    /// Reads (`R`) a request into memory or writes (`W`) a reply from memory.
    fn inq_io(&mut self, ctx: &mut IoCtx, mode: IoMode, modifier: u8) -> IoStatus;
}

/// Reports that nothing is attached.
///
/// This fills every empty device slot.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NullDevice;
impl ExternalDevice for NullDevice {}
impl CardReader for NullDevice {
    fn read_card(&mut self, _ctx: &mut IoCtx, _length: u8, _modifier: u8) -> IoStatus {
        IoStatus::NotAttached
    }
    fn select_stack(&mut self, _ctx: &mut IoCtx, _modifier: u8) -> IoStatus {
        IoStatus::NotAttached
    }
}
impl CardPunch for NullDevice {
    fn punch_card(&mut self, _ctx: &mut IoCtx, _length: u8, _modifier: u8) -> IoStatus {
        IoStatus::NotAttached
    }
    fn select_stack(&mut self, _ctx: &mut IoCtx, _modifier: u8) -> IoStatus {
        IoStatus::NotAttached
    }
}
impl LinePrinter for NullDevice {
    fn write_line(&mut self, _ctx: &mut IoCtx, _length: u8, _modifier: u8) -> IoStatus {
        IoStatus::NotAttached
    }
    fn carriage_control(&mut self, _ctx: &mut IoCtx, _action: CarriageAction) -> IoStatus {
        IoStatus::NotAttached
    }
}
impl TapeUnit for NullDevice {
    fn mt_io(&mut self, _ctx: &mut IoCtx, _unit: u8, _mode: IoMode, _modifier: u8) -> IoStatus {
        IoStatus::NotAttached
    }
    fn mt_func(&mut self, _ctx: &mut IoCtx, _unit: u8, _mode: IoMode, _modifier: u8) -> IoStatus {
        IoStatus::NotAttached
    }
}
impl DiskUnit for NullDevice {
    fn dp_io(&mut self, _ctx: &mut IoCtx, _function: u8, _mode: IoMode, _modifier: u8) -> IoStatus {
        IoStatus::NotAttached
    }
}
impl InquiryTerminal for NullDevice {
    fn inq_io(&mut self, _ctx: &mut IoCtx, _mode: IoMode, _modifier: u8) -> IoStatus {
        IoStatus::NotAttached
    }
}

/// The devices attached to the Simulator.
///
/// Every slot starts out holding a [`NullDevice`].
pub struct DeviceHandler {
    reader: Box<dyn CardReader>,
    punch: Box<dyn CardPunch>,
    printer: Box<dyn LinePrinter>,
    tapes: [Box<dyn TapeUnit>; TAPE_UNITS],
    disk: Box<dyn DiskUnit>,
    inquiry: Box<dyn InquiryTerminal>,
}

impl DeviceHandler {
    /// Creates a new device handler with nothing attached.
    pub fn new() -> Self {
        Self {
            reader: Box::new(NullDevice),
            punch: Box::new(NullDevice),
            printer: Box::new(NullDevice),
            tapes: std::array::from_fn(|_| Box::new(NullDevice) as Box<dyn TapeUnit>),
            disk: Box::new(NullDevice),
            inquiry: Box::new(NullDevice),
        }
    }

    /// Set the card reader.
    pub fn set_reader(&mut self, dev: impl CardReader) {
        self.reader = Box::new(dev);
    }
    /// Set the card punch.
    pub fn set_punch(&mut self, dev: impl CardPunch) {
        self.punch = Box::new(dev);
    }
    /// Set the line printer.
    pub fn set_printer(&mut self, dev: impl LinePrinter) {
        self.printer = Box::new(dev);
    }
    /// Set the disk.
    pub fn set_disk(&mut self, dev: impl DiskUnit) {
        self.disk = Box::new(dev);
    }
    /// Set the inquiry terminal.
    pub fn set_inquiry(&mut self, dev: impl InquiryTerminal) {
        self.inquiry = Box::new(dev);
    }
    /// Attach a tape drive as unit 1-6.
    ///
    /// # Errors
    /// If the unit number is out of range, the device is returned back to the user.
    pub fn attach_tape<D: TapeUnit>(&mut self, unit: u8, dev: D) -> Result<(), D> {
        match Self::tape_slot(unit) {
            Some(i) => {
                self.tapes[i] = Box::new(dev);
                Ok(())
            },
            None => Err(dev),
        }
    }
    /// Detaches the tape drive at unit 1-6, if any.
    pub fn detach_tape(&mut self, unit: u8) {
        if let Some(i) = Self::tape_slot(unit) {
            self.tapes[i] = Box::new(NullDevice);
        }
    }

    fn tape_slot(unit: u8) -> Option<usize> {
        usize::from(unit).checked_sub(1).filter(|&i| i < TAPE_UNITS)
    }

    /// Reads a card.
    pub fn read_card(&mut self, ctx: &mut IoCtx, length: u8, modifier: u8) -> IoStatus {
        self.reader.read_card(ctx, length, modifier)
    }
    /// Selects a reader stacker.
    pub fn reader_select_stack(&mut self, ctx: &mut IoCtx, modifier: u8) -> IoStatus {
        self.reader.select_stack(ctx, modifier)
    }
    /// Punches a card.
    pub fn punch_card(&mut self, ctx: &mut IoCtx, length: u8, modifier: u8) -> IoStatus {
        self.punch.punch_card(ctx, length, modifier)
    }
    /// Selects a punch stacker.
    pub fn punch_select_stack(&mut self, ctx: &mut IoCtx, modifier: u8) -> IoStatus {
        self.punch.select_stack(ctx, modifier)
    }
    /// Prints a line.
    pub fn write_line(&mut self, ctx: &mut IoCtx, length: u8, modifier: u8) -> IoStatus {
        self.printer.write_line(ctx, length, modifier)
    }
    /// Moves the printer carriage.
    pub fn carriage_control(&mut self, ctx: &mut IoCtx, action: CarriageAction) -> IoStatus {
        self.printer.carriage_control(ctx, action)
    }
    /// Reads or writes a tape record on unit 1-6.
    pub fn mt_io(&mut self, ctx: &mut IoCtx, unit: u8, mode: IoMode, modifier: u8) -> IoStatus {
        match Self::tape_slot(unit) {
            Some(i) => self.tapes[i].mt_io(ctx, unit, mode, modifier),
            None => IoStatus::NotAttached,
        }
    }
    /// Runs a tape control function on unit 1-6.
    pub fn mt_func(&mut self, ctx: &mut IoCtx, unit: u8, mode: IoMode, modifier: u8) -> IoStatus {
        match Self::tape_slot(unit) {
            Some(i) => self.tapes[i].mt_func(ctx, unit, mode, modifier),
            None => IoStatus::NotAttached,
        }
    }
    /// Runs a disk operation.
    pub fn dp_io(&mut self, ctx: &mut IoCtx, function: u8, mode: IoMode, modifier: u8) -> IoStatus {
        self.disk.dp_io(ctx, function, mode, modifier)
    }
    /// Reads or writes on the inquiry terminal.
    pub fn inq_io(&mut self, ctx: &mut IoCtx, mode: IoMode, modifier: u8) -> IoStatus {
        self.inquiry.inq_io(ctx, mode, modifier)
    }

    /// Services every device whose scheduled event has come due.
    ///
    /// Returns the first status that was not [`IoStatus::Ok`], if any.
    pub fn process_events(&mut self, mem: &mut Memory, ind: &mut Indicators, events: &mut EventQueue) -> IoStatus {
        let mut result = IoStatus::Ok;
        while let Some(source) = events.pop_due() {
            event!(Level::DEBUG, "servicing {source:?}");

            let mut ctx = IoCtx { mem: &mut *mem, ind: &mut *ind, events: &mut *events, addr: 0, source };
            let status = match source {
                DeviceId::Reader => self.reader.service(&mut ctx),
                DeviceId::Punch => self.punch.service(&mut ctx),
                DeviceId::Printer => self.printer.service(&mut ctx),
                DeviceId::Tape(unit) => match Self::tape_slot(unit) {
                    Some(i) => self.tapes[i].service(&mut ctx),
                    None => IoStatus::NotAttached,
                },
                DeviceId::Disk => self.disk.service(&mut ctx),
                DeviceId::Inquiry => self.inquiry.service(&mut ctx),
            };
            if result == IoStatus::Ok {
                result = status;
            }
        }
        result
    }

    /// Resets all the devices connected to this handler.
    pub fn io_reset(&mut self) {
        self.reader.io_reset();
        self.punch.io_reset();
        self.printer.io_reset();
        self.tapes.iter_mut().for_each(|t| t.io_reset());
        self.disk.io_reset();
        self.inquiry.io_reset();
    }
}
impl Default for DeviceHandler {
    fn default() -> Self {
        Self::new()
    }
}
impl std::fmt::Debug for DeviceHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandler").finish_non_exhaustive()
    }
}

fn resolve_lock<G>(e: TryLockResult<G>) -> Option<G> {
    use std::sync::TryLockError;

    match e {
        Ok(guard) => Some(guard),
        Err(TryLockError::WouldBlock) => None,
        Err(TryLockError::Poisoned(e)) => Some(e.into_inner())
    }
}
