//! Simulating and executing programs for the decimal machine.
//!
//! This module consists of:
//! - [`Simulator`]: The struct that holds the machine state and executes instructions.
//! - [`mem`]: Memory cells and memory initialization.
//! - [`bcd`]: Character codes and the adder and collating tables.
//! - [`addr`]: Three-character operand addresses and index registers.
//! - [`decode`]: The opcode table and the instruction fetch state machine.
//! - [`indicator`]: The indicator latches tested by branches.
//! - [`device`]: The module handling card, printer, tape, disk and inquiry devices.
//! - [`debug`]: Breakpoints and branch history.
//! - [`observer`]: Tracking which memory cells were touched.
//!
//! # Usage
//!
//! To run a program, load a core image into a simulator and run it:
//!
//! ```
//! use bcd_ensemble::load::parse_image;
//! use bcd_ensemble::sim::{Simulator, StopReason};
//!
//! let image = parse_image(r#"
//!     .org 333
//!     "~M502602~.~}"  ; move "AB" over the blanks at 601-602
//!     .org 501
//!     "~AB"
//!     .org 601
//!     "~  "
//!     .start 333
//! "#).unwrap();
//!
//! let mut sim = Simulator::new(Default::default());
//! sim.load_image(&image).unwrap();
//! assert_eq!(sim.run(), StopReason::Halt);
//! assert_eq!(sim.mem.text(601..603), "AB");
//! ```
//!
//! ## Flags
//!
//! Here, `sim` has the default flags. The machine can be configured by editing them,
//! for example to install 16,000 characters of memory and stop on any device error:
//!
//! ```
//! # use bcd_ensemble::sim::{Simulator, SimFlags};
//! let sim = Simulator::new(SimFlags { mem_size: 16000, strict_io: true, ..Default::default() });
//! assert_eq!(sim.mem.len(), 16000);
//! ```
//!
//! All of the available flags can be found in [`SimFlags`].
//!
//! ## Execution
//!
//! Beyond the basic [`Simulator::run`] (which runs until something stops the machine),
//! there are also:
//! - [`Simulator::step_in`]: manual step-by-step simulation
//! - [`Simulator::run_while`], [`Simulator::run_with_limit`]: more advanced programmatic execution
//!
//! Every one of these reports why execution ended as a [`StopReason`].
//! A stop leaves memory and registers exactly as they were when it happened,
//! so execution can resume by running again once the cause is dealt with.
//!
//! ## Debugging with breakpoints
//!
//! Breakpoints are accessible through the `breakpoints` field on [`Simulator`].
//! They are checked between instructions by every execution function except [`Simulator::step_in`].
//!
//! ## Devices
//!
//! Input and output go through the devices held in the simulator's [`DeviceHandler`].
//! Nothing is attached by default, and an instruction that uses a missing device stops
//! the machine with [`StopReason::NotAttached`].
//!
//! ```
//! use bcd_ensemble::load::parse_image;
//! use bcd_ensemble::sim::{Simulator, StopReason};
//! use bcd_ensemble::sim::device::{BufferedCardReader, BufferedPrinter};
//!
//! // read a card, copy it to the print area, print it
//! let image = parse_image(r#"
//!     .org 333
//!     "~1~L080280~2~.~}"
//!     .org 1
//!     "~ "
//!     .start 333
//! "#).unwrap();
//!
//! let mut sim = Simulator::new(Default::default());
//! sim.load_image(&image).unwrap();
//!
//! let reader = BufferedCardReader::default();
//! let printer = BufferedPrinter::default();
//! reader.get_hopper().write().unwrap().push_back("HELLO, WORLD".to_string());
//! sim.device_handler.set_reader(reader.clone());
//! sim.device_handler.set_printer(printer.clone());
//!
//! assert_eq!(sim.run(), StopReason::Halt);
//! assert_eq!(&*printer.get_lines().read().unwrap(), &["HELLO, WORLD"]);
//! ```
//!
//! [`DeviceHandler`]: device::DeviceHandler
pub mod addr;
pub mod bcd;
pub mod debug;
pub mod decode;
pub mod device;
pub mod indicator;
pub mod mem;
pub mod observer;
mod arith;
mod edit;
mod exec;
mod io;

use std::collections::HashSet;

use tracing::{event, span, Level};

use crate::load::{Image, LoadErr, LoadErrKind};
use addr::Address;
use debug::{Breakpoint, PcHistory};
use decode::{CpuOptions, Instr, Op, Registers};
use device::clock::EventQueue;
use device::DeviceHandler;
use indicator::Indicators;
use mem::{Cell, MemInitStrategy, Memory};
use observer::{AccessObserver, AccessSet};

/// Reasons the execution loop stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// The opcode is not implemented, or requires a CPU option that is not installed.
    IllegalOpcode,
    /// The character at the instruction address has no word mark.
    NoWordMark,
    /// The instruction needs its A address, which is invalid.
    InvalidA,
    /// The instruction needs its B address, which is invalid.
    InvalidB,
    /// The instruction length is not legal for this opcode.
    InvalidLength,
    /// The modifier character is not legal for this opcode.
    InvalidModifier,
    /// A branch was taken to an invalid address.
    InvalidBranch,
    /// An address stepped past either end of memory.
    AddressWrap,
    /// The instruction names a device the machine does not have.
    NoDevice,
    /// The device is not attached.
    NotAttached,
    /// A device reported an error and I/O checking is on.
    IoCheck,
    /// The card reader hopper is empty.
    NoCards,
    /// A write was attempted to a write-locked tape and I/O checking is on.
    WriteLocked,
    /// The disk reported a sector or address error and I/O checking is on.
    DiskError,
    /// A breakpoint was hit.
    Breakpoint,
    /// A halt instruction executed.
    Halt,
    /// The run limit given by the caller was reached.
    StepLimit,
}
impl StopReason {
    /// Whether this stop is a fault, as opposed to a halt, breakpoint or run limit.
    pub fn is_error(&self) -> bool {
        !matches!(self, StopReason::Breakpoint | StopReason::Halt | StopReason::StepLimit)
    }
}
impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::IllegalOpcode   => f.write_str("unimplemented or illegal opcode"),
            StopReason::NoWordMark      => f.write_str("missing word mark at instruction start"),
            StopReason::InvalidA        => f.write_str("invalid A address"),
            StopReason::InvalidB        => f.write_str("invalid B address"),
            StopReason::InvalidLength   => f.write_str("invalid instruction length"),
            StopReason::InvalidModifier => f.write_str("invalid modifier"),
            StopReason::InvalidBranch   => f.write_str("invalid branch address"),
            StopReason::AddressWrap     => f.write_str("address wrapped around memory"),
            StopReason::NoDevice        => f.write_str("no such I/O device"),
            StopReason::NotAttached     => f.write_str("device not attached"),
            StopReason::IoCheck         => f.write_str("I/O check"),
            StopReason::NoCards         => f.write_str("no cards in reader"),
            StopReason::WriteLocked     => f.write_str("tape is write locked"),
            StopReason::DiskError       => f.write_str("disk address or sector error"),
            StopReason::Breakpoint      => f.write_str("breakpoint"),
            StopReason::Halt            => f.write_str("halt instruction"),
            StopReason::StepLimit       => f.write_str("run limit reached"),
        }
    }
}
impl std::error::Error for StopReason {}

/// Configuration flags for [`Simulator`].
///
/// These can be modified after the `Simulator` is created with [`Simulator::new`].
/// `mem_size` and `mem_init` only take effect on the next [`Simulator::reset`];
/// the rest apply immediately.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct SimFlags {
    /// Installed memory, in characters.
    ///
    /// The machine comes in sizes from 4,000 to 16,000 in steps of 1,000.
    /// Other values are clamped into that range and rounded down.
    ///
    /// By default, this is 4000.
    pub mem_size: u16,

    /// Installed CPU options. See [`CpuOptions`].
    ///
    /// By default, every option is installed.
    pub options: CpuOptions,

    /// Whether device errors stop the machine (the I/O check switch).
    ///
    /// When off, a device error only sets the device's error indicator.
    /// Missing devices, empty hoppers and bad modifiers stop the machine either way.
    ///
    /// By default, this flag is `false`.
    pub strict_io: bool,

    /// The strategy used to fill memory.
    ///
    /// By default, this is [`MemInitStrategy::Blank`].
    pub mem_init: MemInitStrategy,

    /// The longest run of instructions between two checks of the device event queue.
    ///
    /// By default, this is 100.
    pub event_interval: u32,
}
impl SimFlags {
    /// The memory size actually installed for the configured `mem_size`.
    pub fn installed_mem_size(&self) -> u16 {
        self.mem_size.clamp(4000, 16000) / 1000 * 1000
    }
}
#[allow(clippy::derivable_impls)]
impl Default for SimFlags {
    fn default() -> Self {
        Self {
            mem_size: 4000,
            options: CpuOptions::default(),
            strict_io: false,
            mem_init: MemInitStrategy::default(),
            event_interval: 100,
        }
    }
}

/// Executes programs.
#[derive(Debug)]
pub struct Simulator {
    // ------------------ SIMULATION STATE ------------------
    // Calling [`Simulator::reset`] resets these values.

    /// The simulator's memory.
    pub mem: Memory,

    /// The instruction address register.
    pub is: u16,

    /// The A-address register.
    pub a_reg: Address,

    /// The B-address register.
    pub b_reg: Address,

    /// The indicator latches.
    pub ind: Indicators,

    /// Addresses of the most recent branch instructions.
    pub pc_history: PcHistory,

    /// A branch a halt instruction left behind (branch address, target),
    /// taken at the start of the next step.
    halt_branch: Option<(u16, u16)>,

    /// The number of instructions fetched since this `Simulator` was initialized.
    ///
    /// This can be set to 0 to reset the counter.
    pub instructions_run: u64,

    /// Instructions left before the event queue is next checked.
    budget: i64,
    /// The budget granted at the last check.
    budget_granted: i64,

    /// Future device work.
    pub events: EventQueue,

    /// Tracks which memory cells were accessed since the last run or step began.
    pub observer: AccessObserver,

    // ------------------ CONFIG/DEBUG STATE ------------------
    // Calling [`Simulator::reset`] does not reset these values.

    /// Configuration settings for the simulator.
    ///
    /// These are preserved between resets.
    pub flags: SimFlags,

    /// Breakpoints for the simulator.
    pub breakpoints: HashSet<Breakpoint>,

    /// All devices connected to the machine.
    pub device_handler: DeviceHandler,
}
impl Simulator where Simulator: Send + Sync {}

impl Simulator {
    /// Creates a new simulator with the provided flags and with no program loaded.
    pub fn new(flags: SimFlags) -> Self {
        let mut filler = flags.mem_init.generator();

        Self {
            mem: Memory::new(flags.installed_mem_size(), &mut filler),
            is: 1,
            a_reg: Address::new(0),
            b_reg: Address::new(0),
            ind: Indicators::new(),
            pc_history: PcHistory::new(),
            halt_branch: None,
            instructions_run: 0,
            budget: 0,
            budget_granted: 0,
            events: EventQueue::new(),
            observer: Default::default(),

            flags,
            breakpoints: Default::default(),
            device_handler: Default::default(),
        }
    }

    /// Resets the simulator.
    ///
    /// This resets the state of the `Simulator` back to before any execution calls,
    /// while preserving configuration and debug state.
    ///
    /// Note that this function preserves:
    /// - Flags
    /// - Breakpoints
    /// - Attached devices (each is told to reset itself)
    ///
    /// Programs have to be loaded again after a reset.
    pub fn reset(&mut self) {
        let flags = self.flags;
        let breakpoints = std::mem::take(&mut self.breakpoints);
        let dev_handler = std::mem::take(&mut self.device_handler);

        *self = Simulator::new(flags);
        self.breakpoints = breakpoints;
        self.device_handler = dev_handler;
        self.device_handler.io_reset();
        event!(Level::INFO, mem_size = self.mem.len(), "machine reset");
    }

    /// Loads a core image into memory and sets the instruction address to its start.
    ///
    /// Nothing is written if any block of the image falls outside memory.
    pub fn load_image(&mut self, image: &Image) -> Result<(), LoadErr> {
        let mem_size = usize::from(self.mem.len());
        let out_of_range = image.blocks()
            .find(|(start, cells)| usize::from(*start) + cells.len() > mem_size);
        if let Some((start, cells)) = out_of_range {
            let span = image.block_span(start).unwrap_or(0..0);
            return Err(LoadErr::new(LoadErrKind::OutOfMemory { start, len: cells.len() }, span));
        }

        for (start, cells) in image.blocks() {
            self.mem.copy_block(start, cells);
        }
        if let Some(start) = image.start() {
            self.is = start;
        }
        Ok(())
    }

    /// Reads a cell for execution, recording the access.
    fn read(&mut self, addr: u16) -> Cell {
        self.observer.update_mem_accesses(addr, AccessSet::READ);
        self.mem[addr]
    }
    /// Writes a cell for execution, recording the access.
    fn write(&mut self, addr: u16, cell: Cell) {
        let old = self.mem[addr];
        let mut set = AccessSet::WRITTEN;
        if old != cell {
            set |= AccessSet::MODIFIED;
        }
        if old.wm() != cell.wm() {
            set |= AccessSet::WM_CHANGED;
        }
        self.observer.update_mem_accesses(addr, set);
        self.mem[addr] = cell;
    }

    /// Takes a branch from the instruction at `from`.
    ///
    /// The B register receives the address of the next sequential instruction,
    /// which is what lets a subroutine store its return address.
    fn branch_to(&mut self, from: u16, target: Address) -> Result<(), StopReason> {
        let target = target.get(StopReason::InvalidBranch)?;
        self.pc_history.push(from);
        self.b_reg = Address::new(self.is);
        self.is = target;
        Ok(())
    }

    /// Lets devices do any work that has come due.
    fn service_events(&mut self) -> Result<(), StopReason> {
        let elapsed = u64::try_from(self.budget_granted - self.budget).unwrap_or(0);
        self.events.advance(elapsed);

        let status = self.device_handler.process_events(&mut self.mem, &mut self.ind, &mut self.events);

        let next = self.events.next_budget(self.flags.event_interval);
        self.budget = next;
        self.budget_granted = next;
        self.check_io(status)
    }

    /// Runs until the tripwire condition returns false (or any of the typical stops occur).
    ///
    /// The typical stops are:
    /// - a halt instruction
    /// - a breakpoint matches
    /// - any error in fetching or executing an instruction
    pub fn run_while(&mut self, mut tripwire: impl FnMut(&mut Simulator) -> bool) -> StopReason {
        self.observer.clear();

        let span = span!(Level::INFO, "run", start = self.is);
        let _guard = span.enter();

        // run until:
        // 1. the tripwire condition returns false
        // 2. a step stops
        // 3. any of the breakpoints are hit
        let reason = loop {
            if !tripwire(self) {
                break StopReason::StepLimit;
            }
            if let Err(reason) = self.step() {
                break reason;
            }
            if self.breakpoints.iter().any(|bp| bp.check(self)) {
                break StopReason::Breakpoint;
            }
        };

        match reason.is_error() {
            true  => event!(Level::INFO, is = self.is, "stopped: {reason}"),
            false => event!(Level::DEBUG, is = self.is, "stopped: {reason}"),
        }
        reason
    }

    /// Execute the program.
    ///
    /// This blocks until something stops the machine.
    /// If you would like to limit the maximum number of steps to execute, consider [`Simulator::run_with_limit`].
    pub fn run(&mut self) -> StopReason {
        self.run_while(|_| true)
    }

    /// Execute the program with a limit on how many steps to execute.
    ///
    /// Reaching the limit stops with [`StopReason::StepLimit`].
    pub fn run_with_limit(&mut self, max_steps: u64) -> StopReason {
        let i = self.instructions_run;
        self.run_while(|sim| sim.instructions_run.wrapping_sub(i) < max_steps)
    }

    /// Simulate one step, executing one instruction.
    ///
    /// This does not check breakpoints.
    pub fn step_in(&mut self) -> Result<(), StopReason> {
        self.observer.clear();
        self.step()
    }

    /// Simulate one step, executing one instruction.
    fn step(&mut self) -> Result<(), StopReason> {
        if let Some((from, target)) = self.halt_branch.take() {
            self.branch_to(from, Address::new(target))?;
        }
        if self.budget <= 0 {
            self.service_events()?;
        }

        let mem_size = self.mem.len();
        let saved = Registers {
            a: self.a_reg.masked(mem_size),
            b: self.b_reg.masked(mem_size),
        };
        let mut regs = saved;

        // a failed fetch leaves IS at the instruction
        let instr = decode::fetch(&self.mem, self.is, &mut regs, self.flags.options)?;
        self.a_reg = regs.a;
        self.b_reg = regs.b;
        self.is = instr.next;
        self.budget -= 1;
        self.instructions_run += 1;

        self.execute(&instr, saved)
    }

    /// Dispatches a fetched instruction to its handler.
    ///
    /// `saved` holds the address registers as they were before the fetch.
    fn execute(&mut self, instr: &Instr, saved: Registers) -> Result<(), StopReason> {
        match instr.op {
            Op::Read | Op::Write | Op::WriteRead | Op::Punch
            | Op::ReadPunch | Op::WritePunch | Op::WriteReadPunch => self.card_io(instr),
            Op::StartReadFeed | Op::StartPunchFeed => self.start_feed(instr),

            Op::Add | Op::Subtract | Op::ZeroAdd | Op::ZeroSubtract => self.add_subtract(instr.op),
            Op::Multiply => self.multiply(),
            Op::Divide => self.divide(),

            Op::MoveChars | Op::LoadChars if instr.is_percent_io() => self.percent_io(instr),
            // without a `%` A-field, the 8-character form is a plain move and the modifier is ignored
            Op::MoveChars => self.move_chars(false),
            Op::LoadChars => self.move_chars(true),
            Op::MoveSuppress => self.move_suppress(),
            Op::MoveNumeric => self.move_part(false),
            Op::MoveZone => self.move_part(true),
            Op::MoveEdit => self.edit(),
            Op::MoveToMark => self.move_to_mark(),

            Op::Compare => self.compare(),
            Op::Branch => self.branch(instr),
            Op::BranchWmZone => self.branch_wm_zone(instr),
            Op::BranchBit => self.branch_bit(instr),

            Op::SetWordMark => self.word_mark(true),
            Op::ClearWordMark => self.word_mark(false),
            Op::ClearStorage => self.clear_storage(instr),
            Op::Halt => self.halt(instr),
            Op::Nop => Ok(()),

            Op::ModifyAddress => self.modify_address(),
            Op::StoreA => self.store_register(saved.a),
            Op::StoreB => self.store_register(saved.b),

            Op::Carriage => self.carriage(instr),
            Op::SelectStacker => self.select_stacker(instr),
            Op::TapeControl => self.tape_control(instr),
        }
    }
}
impl Default for Simulator {
    fn default() -> Self {
        Self::new(Default::default())
    }
}
