use std::sync::{Arc, RwLock};

use tracing::{event, Level};

use crate::sim::bcd::{self, GROUP_MARK};
use crate::sim::indicator::{END_OF_REEL, TAPE_ERROR};
use crate::sim::mem::{Cell, Memory};

use super::{resolve_lock, ExternalDevice, IoCtx, IoMode, IoStatus, TapeUnit};

/// One block on a tape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TapeRecord {
    /// A data record. Each entry is a character code, with the word mark bit if written in load mode.
    Data(Vec<u8>),
    /// A tape mark.
    Mark,
}
impl TapeRecord {
    /// Creates a data record from text (word marks are not set).
    pub fn from_text(text: &str) -> Self {
        TapeRecord::Data(text.chars().map(|c| bcd::ascii_to_bcd(c).unwrap_or(bcd::BLANK)).collect())
    }
}

const READ: u8 = 0o51; // R
const WRITE: u8 = 0o26; // W
const BACKSPACE: u8 = 0o62; // B
const ERASE: u8 = 0o65; // E
const TAPE_MARK: u8 = 0o44; // M
const REWIND: u8 = 0o51; // R
const UNLOAD: u8 = 0o24; // U

/// Whether this cell ends a transfer (a group mark with a word mark).
fn is_group_mark_wm(cell: Cell) -> bool {
    cell.wm() && cell.char() == GROUP_MARK
}

/// A tape drive holding its reel as a list of records.
///
/// The reel can be shared with the host through [`BufferedTape::get_records`].
/// Writing a record replaces everything after the current position.
#[derive(Debug, Default, Clone)]
pub struct BufferedTape {
    records: Arc<RwLock<Vec<TapeRecord>>>,
    pos: usize,
    write_locked: bool,
    unloaded: bool,
}
impl BufferedTape {
    /// Creates a new tape drive with the given reel mounted at load point.
    pub fn new(records: Arc<RwLock<Vec<TapeRecord>>>) -> Self {
        Self { records, ..Default::default() }
    }

    /// Gets a reference to the records on the reel.
    pub fn get_records(&self) -> &Arc<RwLock<Vec<TapeRecord>>> {
        &self.records
    }
    /// The index of the next record to be read or written.
    pub fn position(&self) -> usize {
        self.pos
    }
    /// Sets whether writes are refused (the write-enable ring is removed).
    pub fn set_write_locked(&mut self, locked: bool) {
        self.write_locked = locked;
    }
    /// Whether the reel was unloaded by a rewind and unload.
    pub fn is_unloaded(&self) -> bool {
        self.unloaded
    }
    /// Mounts the reel again after an unload.
    pub fn reload(&mut self) {
        self.unloaded = false;
        self.pos = 0;
    }

    fn read(&mut self, ctx: &mut IoCtx, mode: IoMode) -> IoStatus {
        let Some(records) = resolve_lock(self.records.try_read()) else { return IoStatus::IoError };
        let Some(record) = records.get(self.pos).cloned() else {
            drop(records);
            event!(Level::DEBUG, "read past the last record");
            ctx.ind.set(TAPE_ERROR, true);
            return IoStatus::IoError;
        };
        drop(records);
        self.pos += 1;

        let data = match record {
            TapeRecord::Data(data) => data,
            TapeRecord::Mark => {
                ctx.ind.set(END_OF_REEL, true);
                return IoStatus::Ok;
            }
        };

        let mut addr = ctx.addr;
        for c in data {
            let Some(cell) = ctx.mem.get(addr) else { return wrap_error(ctx) };
            if is_group_mark_wm(cell) {
                return IoStatus::Ok;
            }
            store(ctx.mem, addr, c, mode);
            addr += 1;
        }
        match ctx.mem.get(addr) {
            Some(cell) if is_group_mark_wm(cell) => {},
            Some(_) => store(ctx.mem, addr, GROUP_MARK, IoMode { load: false, ..mode }),
            None => return wrap_error(ctx),
        }
        IoStatus::Ok
    }

    fn write(&mut self, ctx: &mut IoCtx, mode: IoMode) -> IoStatus {
        let mut data = vec![];
        let mut addr = ctx.addr;
        loop {
            let Some(cell) = ctx.mem.get(addr) else { return wrap_error(ctx) };
            if is_group_mark_wm(cell) {
                break;
            }
            data.push(match mode.load {
                true  => cell.get(),
                false => cell.char(),
            });
            addr += 1;
        }
        self.append(ctx, TapeRecord::Data(data))
    }

    fn append(&mut self, ctx: &mut IoCtx, record: TapeRecord) -> IoStatus {
        if self.write_locked {
            ctx.ind.set(TAPE_ERROR, true);
            return IoStatus::WriteLocked;
        }
        let Some(mut records) = resolve_lock(self.records.try_write()) else {
            ctx.ind.set(TAPE_ERROR, true);
            return IoStatus::IoError;
        };
        records.truncate(self.pos);
        records.push(record);
        self.pos = records.len();
        IoStatus::Ok
    }
}

/// Writes one transferred character. Load mode replaces the word mark too.
fn store(mem: &mut Memory, addr: u16, c: u8, mode: IoMode) {
    match mode.load {
        true  => mem[addr] = Cell::new(c),
        false => mem[addr].set_char(c),
    }
}

fn wrap_error(ctx: &mut IoCtx) -> IoStatus {
    ctx.ind.set(TAPE_ERROR, true);
    IoStatus::IoError
}

impl ExternalDevice for BufferedTape {
    fn io_reset(&mut self) {
        self.pos = 0;
    }
}
impl TapeUnit for BufferedTape {
    fn mt_io(&mut self, ctx: &mut IoCtx, unit: u8, mode: IoMode, modifier: u8) -> IoStatus {
        if self.unloaded {
            return IoStatus::NotAttached;
        }
        event!(Level::DEBUG, "tape {unit} transfer at {} ({mode:?})", ctx.addr);

        ctx.ind.set(TAPE_ERROR, false);
        match modifier & bcd::CHAR {
            READ => self.read(ctx, mode),
            WRITE => self.write(ctx, mode),
            _ => IoStatus::InvalidModifier,
        }
    }

    fn mt_func(&mut self, ctx: &mut IoCtx, _unit: u8, _mode: IoMode, modifier: u8) -> IoStatus {
        if self.unloaded {
            return IoStatus::NotAttached;
        }
        match modifier & bcd::CHAR {
            BACKSPACE => {
                self.pos = self.pos.saturating_sub(1);
                IoStatus::Ok
            },
            ERASE => match self.write_locked {
                true  => {
                    ctx.ind.set(TAPE_ERROR, true);
                    IoStatus::WriteLocked
                },
                false => IoStatus::Ok,
            },
            TAPE_MARK => self.append(ctx, TapeRecord::Mark),
            REWIND => {
                self.pos = 0;
                ctx.ind.set(END_OF_REEL, false);
                IoStatus::Ok
            },
            UNLOAD => {
                self.pos = 0;
                self.unloaded = true;
                ctx.ind.set(END_OF_REEL, false);
                IoStatus::Ok
            },
            _ => IoStatus::InvalidModifier,
        }
    }
}
