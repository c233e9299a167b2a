use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use tracing::{event, Level};

use crate::sim::bcd;
use crate::sim::indicator::{LAST_CARD, READER_ERROR};

use super::{resolve_lock, CardPunch, CardReader, ExternalDevice, IoCtx, IoStatus, PUNCH_AREA, READ_AREA};

/// The stacker a card goes to when no stacker is selected.
const NORMAL_STACKER: u8 = 0;

/// The stacker number a modifier selects (1, 2, 4 or 8, plus 0 for the normal stacker).
fn stacker(modifier: u8) -> u8 {
    bcd::to_binary_digit(modifier)
}

/// Card reader that takes cards from a hopper buffer.
///
/// Each card is a line of text. Cards shorter than 80 columns are padded with blanks
/// and longer cards are cut off. A character with no card code reads as a blank
/// and sets the reader error indicator.
#[derive(Default, Clone)]
pub struct BufferedCardReader {
    hopper: Arc<RwLock<VecDeque<String>>>,
    stacked: Arc<RwLock<Vec<(u8, String)>>>,
}
impl BufferedCardReader {
    /// Creates a new reader, wrapping it around a given hopper.
    pub fn new(hopper: Arc<RwLock<VecDeque<String>>>) -> Self {
        Self { hopper, stacked: Default::default() }
    }

    /// Gets a reference to the hopper (cards waiting to be read).
    pub fn get_hopper(&self) -> &Arc<RwLock<VecDeque<String>>> {
        &self.hopper
    }
    /// Gets a reference to the cards already read, with the stacker each went to.
    pub fn get_stacked(&self) -> &Arc<RwLock<Vec<(u8, String)>>> {
        &self.stacked
    }
}
impl ExternalDevice for BufferedCardReader {
    fn io_reset(&mut self) {
        if let Some(mut stacked) = resolve_lock(self.stacked.try_write()) {
            stacked.clear();
        }
    }
}
impl CardReader for BufferedCardReader {
    fn read_card(&mut self, ctx: &mut IoCtx, length: u8, modifier: u8) -> IoStatus {
        let Some(mut hopper) = resolve_lock(self.hopper.try_write()) else { return IoStatus::IoError };
        let Some(card) = hopper.pop_front() else { return IoStatus::NoCards };
        ctx.ind.set(LAST_CARD, hopper.is_empty());
        drop(hopper);

        let mut columns = card.chars();
        let mut valid = true;
        for addr in READ_AREA {
            let code = match columns.next() {
                Some(ch) => bcd::ascii_to_bcd(ch).unwrap_or_else(|| {
                    valid = false;
                    bcd::BLANK
                }),
                None => bcd::BLANK,
            };
            ctx.mem[addr].set_char(code);
        }

        let pocket = match length {
            2 | 5 => stacker(modifier),
            _ => NORMAL_STACKER,
        };
        if let Some(mut stacked) = resolve_lock(self.stacked.try_write()) {
            stacked.push((pocket, card));
        }

        ctx.ind.set(READER_ERROR, !valid);
        match valid {
            true  => IoStatus::Ok,
            false => {
                event!(Level::WARN, "card has characters with no card code");
                IoStatus::IoError
            }
        }
    }

    fn select_stack(&mut self, _ctx: &mut IoCtx, modifier: u8) -> IoStatus {
        if let Some(mut stacked) = resolve_lock(self.stacked.try_write()) {
            if let Some((pocket, _)) = stacked.last_mut() {
                *pocket = stacker(modifier);
            }
        }
        IoStatus::Ok
    }
}

/// Card punch that punches cards into an output buffer.
///
/// Trailing blanks are left off each punched card.
#[derive(Default, Clone)]
pub struct BufferedPunch {
    cards: Arc<RwLock<Vec<(u8, String)>>>,
}
impl BufferedPunch {
    /// Creates a new punch, wrapping it around a given buffer.
    pub fn new(cards: Arc<RwLock<Vec<(u8, String)>>>) -> Self {
        Self { cards }
    }

    /// Gets a reference to the punched cards, with the stacker each went to.
    pub fn get_cards(&self) -> &Arc<RwLock<Vec<(u8, String)>>> {
        &self.cards
    }
}
impl ExternalDevice for BufferedPunch {
    fn io_reset(&mut self) {
        if let Some(mut cards) = resolve_lock(self.cards.try_write()) {
            cards.clear();
        }
    }
}
impl CardPunch for BufferedPunch {
    fn punch_card(&mut self, ctx: &mut IoCtx, length: u8, modifier: u8) -> IoStatus {
        let card = ctx.mem.text(*PUNCH_AREA.start()..*PUNCH_AREA.end() + 1);
        let pocket = match length {
            2 | 5 => stacker(modifier),
            _ => NORMAL_STACKER,
        };

        match resolve_lock(self.cards.try_write()) {
            Some(mut cards) => {
                cards.push((pocket, card.trim_end().to_string()));
                IoStatus::Ok
            },
            None => {
                ctx.ind.set(crate::sim::indicator::PUNCH_ERROR, true);
                IoStatus::IoError
            }
        }
    }

    fn select_stack(&mut self, _ctx: &mut IoCtx, modifier: u8) -> IoStatus {
        if let Some(mut cards) = resolve_lock(self.cards.try_write()) {
            if let Some((pocket, _)) = cards.last_mut() {
                *pocket = stacker(modifier);
            }
        }
        IoStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use crate::sim::device::clock::EventQueue;
    use crate::sim::device::DeviceId;
    use crate::sim::indicator::Indicators;
    use crate::sim::mem::Memory;

    use super::*;

    #[test]
    fn test_read_cards() {
        let mut mem = Memory::new(4000, &mut 0u8);
        let mut ind = Indicators::new();
        let mut events = EventQueue::new();
        mem.write_text(1, "~XXXXX");

        let mut reader = BufferedCardReader::default();
        reader.get_hopper().write().unwrap().extend(["ABC".to_string(), "12{".to_string()]);

        let mut ctx = IoCtx { mem: &mut mem, ind: &mut ind, events: &mut events, addr: 0, source: DeviceId::Reader };
        assert_eq!(reader.read_card(&mut ctx, 1, bcd::BLANK), IoStatus::Ok);
        assert_eq!(ctx.mem.text(1..6), "ABC  ");
        assert!(ctx.mem[1].wm());
        assert!(!ctx.ind.get(LAST_CARD));

        assert_eq!(reader.read_card(&mut ctx, 2, 2), IoStatus::IoError);
        assert_eq!(ctx.mem.text(1..4), "12 ");
        assert!(ctx.ind.get(LAST_CARD));
        assert!(ctx.ind.get(READER_ERROR));

        assert_eq!(reader.read_card(&mut ctx, 1, bcd::BLANK), IoStatus::NoCards);
        assert_eq!(
            &*reader.get_stacked().read().unwrap(),
            &[(0, "ABC".to_string()), (2, "12{".to_string())]
        );
    }

    #[test]
    fn test_punch_cards() {
        let mut mem = Memory::new(4000, &mut 0u8);
        let mut ind = Indicators::new();
        let mut events = EventQueue::new();
        mem.write_text(101, "PUNCH ME");
        mem.write_text(180, "X");

        let mut punch = BufferedPunch::default();
        let mut ctx = IoCtx { mem: &mut mem, ind: &mut ind, events: &mut events, addr: 0, source: DeviceId::Punch };
        assert_eq!(punch.punch_card(&mut ctx, 1, bcd::BLANK), IoStatus::Ok);
        assert_eq!(punch.select_stack(&mut ctx, 4), IoStatus::Ok);

        let cards = punch.get_cards().read().unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].0, 4);
        assert_eq!(cards[0].1.len(), 80);
        assert!(cards[0].1.starts_with("PUNCH ME "));
        assert!(cards[0].1.ends_with('X'));
    }
}
