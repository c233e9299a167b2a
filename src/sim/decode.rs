//! Instruction fetch and the opcode table.
//!
//! An instruction is a run of characters starting at a word-marked opcode and
//! ending just before the next word mark. Its shape is given by its length:
//!
//! | Length | Shape              |
//! |--------|--------------------|
//! | 1      | `op`               |
//! | 2      | `op d`             |
//! | 4      | `op aaa`           |
//! | 5      | `op aaa d`         |
//! | 7      | `op aaa bbb`       |
//! | 8      | `op aaa bbb d`     |
//!
//! The fetch is a character-by-character state machine ([`FetchState`]).
//! Each opcode's [`OpInfo`] row decides which lengths are legal and which operands it needs.

use tracing::{event, Level};

use super::addr::{self, Address};
use super::bcd::{self, CHAR};
use super::mem::Memory;
use super::StopReason;

/// Feature options installed on the CPU.
///
/// Opcodes that depend on an option behave as illegal opcodes when the option is absent.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CpuOptions(u16);
impl CpuOptions {
    /// No options.
    pub const NONE: Self = Self(0);
    /// Multiply and divide (`@`, `%`).
    pub const MULTIPLY_DIVIDE: Self = Self(1 << 0);
    /// Indexed addressing through the three index registers.
    pub const INDEX: Self = Self(1 << 1);
    /// Floating dollar and asterisk fill in edit.
    pub const EXPANDED_EDIT: Self = Self(1 << 2);
    /// Modify address (`#`).
    pub const MODIFY_ADDRESS: Self = Self(1 << 3);
    /// Store A and store B address registers (`Q`, `H`).
    pub const STORE_ADDRESS: Self = Self(1 << 4);
    /// Branch if bit equal (`W`).
    pub const BIT_TEST: Self = Self(1 << 5);
    /// Every option.
    pub const ALL: Self = Self(0b111111);

    /// Whether every option in `other` is present.
    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}
impl Default for CpuOptions {
    fn default() -> Self {
        Self::ALL
    }
}
impl std::ops::BitOr for CpuOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}
impl std::ops::BitOrAssign for CpuOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}
impl std::ops::Sub for CpuOptions {
    type Output = Self;

    /// Removes options.
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 & !rhs.0)
    }
}
impl std::fmt::Debug for CpuOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const NAMES: [(CpuOptions, &str); 6] = [
            (CpuOptions::MULTIPLY_DIVIDE, "MULTIPLY_DIVIDE"),
            (CpuOptions::INDEX, "INDEX"),
            (CpuOptions::EXPANDED_EDIT, "EXPANDED_EDIT"),
            (CpuOptions::MODIFY_ADDRESS, "MODIFY_ADDRESS"),
            (CpuOptions::STORE_ADDRESS, "STORE_ADDRESS"),
            (CpuOptions::BIT_TEST, "BIT_TEST"),
        ];
        f.debug_set()
            .entries(NAMES.iter().filter(|(o, _)| self.contains(*o)).map(|(_, n)| n))
            .finish()
    }
}

macro_rules! opcodes {
    ($($(#[$m:meta])* $name:ident = $code:literal),+ $(,)?) => {
        /// An operation code.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Op {
            $($(#[$m])* $name),+
        }
        impl Op {
            /// Looks up the operation for an opcode character.
            pub fn from_code(c: u8) -> Option<Self> {
                match c & CHAR {
                    $($code => Some(Self::$name)),+,
                    _ => None
                }
            }
            /// The character code of this operation.
            pub fn code(self) -> u8 {
                match self {
                    $(Self::$name => $code),+
                }
            }
        }
    };
}
opcodes! {
    /// Read a card (`1`).
    Read = 0o01,
    /// Write a line (`2`).
    Write = 0o02,
    /// Write and read (`3`).
    WriteRead = 0o03,
    /// Punch a card (`4`).
    Punch = 0o04,
    /// Read and punch (`5`).
    ReadPunch = 0o05,
    /// Write and punch (`6`).
    WritePunch = 0o06,
    /// Write, read and punch (`7`).
    WriteReadPunch = 0o07,
    /// Start read feed (`8`).
    StartReadFeed = 0o10,
    /// Start punch feed (`9`).
    StartPunchFeed = 0o11,
    /// Add (`A`).
    Add = 0o61,
    /// Subtract (`S`).
    Subtract = 0o22,
    /// Zero and add (`?`).
    ZeroAdd = 0o72,
    /// Zero and subtract (`!`).
    ZeroSubtract = 0o52,
    /// Multiply (`@`).
    Multiply = 0o14,
    /// Divide (`%`).
    Divide = 0o34,
    /// Move characters to A or B word mark (`M`).
    MoveChars = 0o44,
    /// Load characters to A word mark (`L`).
    LoadChars = 0o43,
    /// Move characters and suppress zeros (`Z`).
    MoveSuppress = 0o31,
    /// Move numeric (`D`).
    MoveNumeric = 0o64,
    /// Move zone (`Y`).
    MoveZone = 0o30,
    /// Move characters and edit (`E`).
    MoveEdit = 0o65,
    /// Move characters to record or group mark (`P`).
    MoveToMark = 0o47,
    /// Compare (`C`).
    Compare = 0o63,
    /// Branch, branch on indicator, branch if character equal (`B`).
    Branch = 0o62,
    /// Branch if word mark or zone (`V`).
    BranchWmZone = 0o25,
    /// Branch if bit equal (`W`).
    BranchBit = 0o26,
    /// Set word mark (`,`).
    SetWordMark = 0o33,
    /// Clear word mark (lozenge).
    ClearWordMark = 0o74,
    /// Clear storage (`/`).
    ClearStorage = 0o21,
    /// Halt (`.`).
    Halt = 0o73,
    /// No operation (`N`).
    Nop = 0o45,
    /// Modify address (`#`).
    ModifyAddress = 0o13,
    /// Store A address register (`Q`).
    StoreA = 0o50,
    /// Store B address register (`H`).
    StoreB = 0o70,
    /// Carriage control (`F`).
    Carriage = 0o66,
    /// Select stacker (`K`).
    SelectStacker = 0o42,
    /// Tape control (`U`).
    TapeControl = 0o24,
}

/// One row of the opcode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpInfo {
    /// The instruction lengths this opcode accepts.
    pub lengths: &'static [u8],
    /// Whether the A address must be valid.
    pub a_required: bool,
    /// Whether the B address must be valid.
    pub b_required: bool,
    /// Move/load/store shape: a 4-character form leaves the B register alone.
    pub mls: bool,
    /// Fetch continues past 8 characters to the next word mark.
    pub trailing: bool,
    /// Whether the 8-character form may address an I/O unit with a `%` A-field.
    pub io: bool,
    /// Option required for this opcode to be legal.
    pub option: Option<CpuOptions>,
}
impl OpInfo {
    const fn new(lengths: &'static [u8]) -> Self {
        Self { lengths, a_required: false, b_required: false, mls: false, trailing: false, io: false, option: None }
    }
    const fn ab(mut self) -> Self {
        self.a_required = true;
        self.b_required = true;
        self
    }
    const fn b(mut self) -> Self {
        self.b_required = true;
        self
    }
    const fn mls(mut self) -> Self {
        self.mls = true;
        self
    }
    const fn trailing(mut self) -> Self {
        self.trailing = true;
        self
    }
    const fn io(mut self) -> Self {
        self.io = true;
        self
    }
    const fn option(mut self, opt: CpuOptions) -> Self {
        self.option = Some(opt);
        self
    }

    /// Whether this opcode accepts an instruction of the given length.
    pub fn accepts_length(&self, len: u8) -> bool {
        self.lengths.contains(&len)
    }
}

const L_CARD: &[u8] = &[1, 2, 4, 5];
const L_147: &[u8] = &[1, 4, 7];
const L_1478: &[u8] = &[1, 4, 7, 8];
const L_14: &[u8] = &[1, 4];
const L_7: &[u8] = &[7];
const L_8: &[u8] = &[8];
const L_4: &[u8] = &[4];

impl Op {
    /// This opcode's row of the opcode table.
    pub const fn info(self) -> OpInfo {
        match self {
            Op::Read | Op::Write | Op::WriteRead | Op::Punch
            | Op::ReadPunch | Op::WritePunch | Op::WriteReadPunch => OpInfo::new(L_CARD),
            Op::StartReadFeed | Op::StartPunchFeed => OpInfo::new(L_14),

            Op::Add | Op::Subtract | Op::ZeroAdd | Op::ZeroSubtract => OpInfo::new(L_147).ab(),
            Op::Multiply | Op::Divide => OpInfo::new(L_7).ab().option(CpuOptions::MULTIPLY_DIVIDE),

            Op::MoveChars | Op::LoadChars => OpInfo::new(L_1478).ab().mls().io(),
            Op::MoveSuppress | Op::MoveNumeric | Op::MoveZone | Op::MoveEdit => OpInfo::new(L_147).ab().mls(),
            Op::MoveToMark => OpInfo::new(L_7).ab(),

            Op::Compare => OpInfo::new(L_147).ab(),
            Op::Branch => OpInfo::new(&[4, 5, 8]),
            Op::BranchWmZone => OpInfo::new(L_8).b(),
            Op::BranchBit => OpInfo::new(L_8).b().option(CpuOptions::BIT_TEST),

            Op::SetWordMark | Op::ClearWordMark => OpInfo::new(L_147).ab(),
            Op::ClearStorage => OpInfo::new(L_147).b(),
            Op::Halt => OpInfo::new(L_147),
            Op::Nop => OpInfo::new(&[1, 2, 4, 5, 7, 8]).trailing(),

            Op::ModifyAddress => OpInfo::new(L_7).ab().option(CpuOptions::MODIFY_ADDRESS),
            Op::StoreA | Op::StoreB => OpInfo::new(L_4).b().option(CpuOptions::STORE_ADDRESS),

            Op::Carriage => OpInfo::new(&[2, 5]),
            Op::SelectStacker => OpInfo::new(&[2]),
            Op::TapeControl => OpInfo::new(&[5]),
        }
    }
}

/// The position the fetch state machine is about to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    /// The opcode.
    Opcode,
    /// A-address hundreds (also a modifier candidate).
    AHundreds,
    /// A-address tens.
    ATens,
    /// A-address units.
    AUnits,
    /// B-address hundreds (also a modifier candidate).
    BHundreds,
    /// B-address tens.
    BTens,
    /// B-address units.
    BUnits,
    /// The modifier following a B-address.
    Modifier,
    /// Characters past the eighth.
    Trailing,
}
impl FetchState {
    fn next(self) -> Self {
        match self {
            FetchState::Opcode    => FetchState::AHundreds,
            FetchState::AHundreds => FetchState::ATens,
            FetchState::ATens     => FetchState::AUnits,
            FetchState::AUnits    => FetchState::BHundreds,
            FetchState::BHundreds => FetchState::BTens,
            FetchState::BTens     => FetchState::BUnits,
            FetchState::BUnits    => FetchState::Modifier,
            FetchState::Modifier | FetchState::Trailing => FetchState::Trailing,
        }
    }
}

/// A fetched and classified instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instr {
    /// The operation.
    pub op: Op,
    /// Length class (1, 2, 4, 5, 7 or 8).
    pub len: u8,
    /// The modifier character (meaningful for lengths 2, 5 and 8).
    pub modifier: u8,
    /// The A-address characters as fetched.
    pub a_chars: [u8; 3],
    /// The B-address characters as fetched.
    pub b_chars: [u8; 3],
    /// The address of the opcode.
    pub start: u16,
    /// The address of the next sequential instruction.
    pub next: u16,
}
impl Instr {
    /// Whether this is a `%` I/O form (`M %xn bbb d`).
    pub fn is_percent_io(&self) -> bool {
        self.op.info().io && self.len == 8 && self.a_chars[0] == bcd::PERCENT
    }
}

/// Address registers as left by a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registers {
    /// A-address register.
    pub a: Address,
    /// B-address register.
    pub b: Address,
}

/// Fetches the instruction at `is`, resolving its operands into `regs`.
///
/// On success `regs` holds the operand addresses (unchanged for a 1-character instruction,
/// so chained instructions continue where the previous one stopped).
/// On failure nothing is written to `regs`.
pub fn fetch(mem: &Memory, is: u16, regs: &mut Registers, options: CpuOptions) -> Result<Instr, StopReason> {
    let mem_size = mem.len();
    let opcode = mem.get(is).ok_or(StopReason::AddressWrap)?;
    if !opcode.wm() {
        return Err(StopReason::NoWordMark);
    }
    let op = Op::from_code(opcode.char()).ok_or(StopReason::IllegalOpcode)?;
    let info = op.info();

    let mut instr = Instr {
        op,
        len: 1,
        modifier: bcd::BLANK,
        a_chars: [0; 3],
        b_chars: [0; 3],
        start: is,
        next: is,
    };
    let mut state = FetchState::Opcode.next();
    let mut pos = is;
    let mut count = 1u32;

    instr.next = loop {
        pos = pos.checked_add(1)
            .filter(|&p| p < mem_size)
            .ok_or(StopReason::AddressWrap)?;
        let cell = mem[pos];
        if cell.wm() { break pos };

        let c = cell.char();
        match state {
            FetchState::Opcode    => unreachable!("opcode was fetched before the loop"),
            FetchState::AHundreds => { instr.modifier = c; instr.a_chars[0] = c },
            FetchState::ATens     => instr.a_chars[1] = c,
            FetchState::AUnits    => instr.a_chars[2] = c,
            FetchState::BHundreds => { instr.modifier = c; instr.b_chars[0] = c },
            FetchState::BTens     => instr.b_chars[1] = c,
            FetchState::BUnits    => instr.b_chars[2] = c,
            FetchState::Modifier | FetchState::Trailing => instr.modifier = c,
        }
        count += 1;
        state = state.next();

        if count == 8 && !info.trailing { break pos + 1 };
    };
    instr.len = count.min(8) as u8;

    if !info.accepts_length(instr.len) {
        return Err(StopReason::InvalidLength);
    }
    if info.option.is_some_and(|o| !options.contains(o)) {
        return Err(StopReason::IllegalOpcode);
    }

    let indexing = options.contains(CpuOptions::INDEX);
    let mut next_regs = *regs;
    if instr.len >= 4 {
        next_regs.a = addr::resolve(instr.a_chars, mem, indexing);
        if !info.mls {
            next_regs.b = next_regs.a;
        }
    }
    if instr.len >= 7 {
        next_regs.b = addr::resolve(instr.b_chars, mem, indexing);
    }

    if info.a_required && !instr.is_percent_io() && !next_regs.a.is_valid() {
        return Err(StopReason::InvalidA);
    }
    if info.b_required && !next_regs.b.is_valid() {
        return Err(StopReason::InvalidB);
    }

    event!(Level::TRACE, "fetched {:?} ({}) at {is}, A={}, B={}", op, instr.len, next_regs.a, next_regs.b);
    *regs = next_regs;
    Ok(instr)
}

#[cfg(test)]
mod tests {
    use crate::sim::mem::Memory;

    use super::*;

    fn mem_with(start: u16, text: &str) -> Memory {
        let mut mem = Memory::new(4000, &mut 0u8);
        mem.write_text(start, text);
        mem
    }
    fn regs() -> Registers {
        Registers { a: Address::new(0), b: Address::new(0) }
    }

    #[test]
    fn test_opcode_table_codes() {
        for c in 0..64 {
            if let Some(op) = Op::from_code(c) {
                assert_eq!(op.code(), c);
            }
        }
        assert_eq!(Op::from_code(bcd::ascii_to_bcd('M').unwrap()), Some(Op::MoveChars));
        assert_eq!(Op::from_code(bcd::ascii_to_bcd(')').unwrap()), Some(Op::ClearWordMark));
        assert_eq!(Op::from_code(bcd::ascii_to_bcd('X').unwrap()), None);
    }

    #[test]
    fn test_fetch_lengths() {
        let mem = mem_with(333, "~M500600~A500~.~B400S~,~N1~Z500600~.");
        let mut r = regs();

        let i = fetch(&mem, 333, &mut r, CpuOptions::ALL).unwrap();
        assert_eq!((i.op, i.len, i.next), (Op::MoveChars, 7, 340));
        assert_eq!((r.a.value(), r.b.value()), (500, 600));

        let i = fetch(&mem, 340, &mut r, CpuOptions::ALL).unwrap();
        assert_eq!((i.op, i.len, i.next), (Op::Add, 4, 344));
        // B defaults to A
        assert_eq!((r.a.value(), r.b.value()), (500, 500));

        let i = fetch(&mem, 344, &mut r, CpuOptions::ALL).unwrap();
        assert_eq!((i.op, i.len), (Op::Halt, 1));

        let i = fetch(&mem, 345, &mut r, CpuOptions::ALL).unwrap();
        assert_eq!((i.op, i.len, i.modifier), (Op::Branch, 5, bcd::ascii_to_bcd('S').unwrap()));
        assert_eq!(r.a.value(), 400);

        let i = fetch(&mem, 350, &mut r, CpuOptions::ALL).unwrap();
        assert_eq!((i.op, i.len), (Op::SetWordMark, 1));
        // chained instruction keeps the registers
        assert_eq!(r.a.value(), 400);

        let i = fetch(&mem, 351, &mut r, CpuOptions::ALL).unwrap();
        assert_eq!((i.op, i.len, i.modifier), (Op::Nop, 2, 1));
    }

    #[test]
    fn test_move_keeps_b_on_four_chars() {
        let mem = mem_with(333, "~M500~.");
        let mut r = Registers { a: Address::new(0), b: Address::new(777) };
        fetch(&mem, 333, &mut r, CpuOptions::ALL).unwrap();
        assert_eq!((r.a.value(), r.b.value()), (500, 777));
    }

    #[test]
    fn test_missing_word_mark() {
        let mem = mem_with(333, "M500600~.");
        let mut r = regs();
        assert_eq!(fetch(&mem, 333, &mut r, CpuOptions::ALL), Err(StopReason::NoWordMark));
    }

    #[test]
    fn test_invalid_length() {
        // multiply only has a 7-character form
        let mem = mem_with(333, "~@500~.");
        let mut r = regs();
        assert_eq!(fetch(&mem, 333, &mut r, CpuOptions::ALL), Err(StopReason::InvalidLength));
        assert_eq!(r, regs());

        let mem = mem_with(333, "~M50~.");
        assert_eq!(fetch(&mem, 333, &mut r, CpuOptions::ALL), Err(StopReason::InvalidLength));
    }

    #[test]
    fn test_option_gating() {
        let mem = mem_with(333, "~@500600~.");
        let mut r = regs();
        let options = CpuOptions::ALL - CpuOptions::MULTIPLY_DIVIDE;
        assert_eq!(fetch(&mem, 333, &mut r, options), Err(StopReason::IllegalOpcode));
        assert!(fetch(&mem, 333, &mut r, CpuOptions::ALL).is_ok());
    }

    #[test]
    fn test_required_addresses() {
        let mem = mem_with(333, "~A 00600~.");
        let mut r = regs();
        assert_eq!(fetch(&mem, 333, &mut r, CpuOptions::ALL), Err(StopReason::InvalidA));

        let mem = mem_with(333, "~A500 00~.");
        assert_eq!(fetch(&mem, 333, &mut r, CpuOptions::ALL), Err(StopReason::InvalidB));

        // branches check their target lazily
        let mem = mem_with(333, "~B 00~.");
        assert!(fetch(&mem, 333, &mut r, CpuOptions::ALL).is_ok());
        assert!(!r.a.is_valid());

        // percent forms do not need an A address
        let mem = mem_with(333, "~M%U1600W~.");
        let i = fetch(&mem, 333, &mut r, CpuOptions::ALL).unwrap();
        assert!(i.is_percent_io());
        assert_eq!(r.b.value(), 600);
    }

    #[test]
    fn test_trailing_modifier() {
        let mem = mem_with(333, "~N500600ABCD~.");
        let mut r = regs();
        let i = fetch(&mem, 333, &mut r, CpuOptions::ALL).unwrap();
        assert_eq!(i.len, 8);
        assert_eq!(i.modifier, bcd::ascii_to_bcd('D').unwrap());
        assert_eq!(i.next, 344);

        // without trailing, the fetch ends at 8 characters
        let mem = mem_with(333, "~B500600ABCD~.");
        let i = fetch(&mem, 333, &mut r, CpuOptions::ALL).unwrap();
        assert_eq!((i.len, i.next), (8, 341));
        assert_eq!(i.modifier, bcd::ascii_to_bcd('A').unwrap());
    }

    #[test]
    fn test_fetch_off_end_of_memory() {
        let mem = mem_with(3996, "~M500");
        let mut r = regs();
        assert_eq!(fetch(&mem, 3996, &mut r, CpuOptions::ALL), Err(StopReason::AddressWrap));
    }
}
