use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use crate::sim::bcd::{self, GROUP_MARK};
use crate::sim::indicator::{INQUIRY_CLEAR, INQUIRY_REQUEST};

use super::{resolve_lock, ExternalDevice, InquiryTerminal, IoCtx, IoMode, IoStatus};

const READ: u8 = 0o51; // R
const WRITE: u8 = 0o26; // W

/// Inquiry terminal fed from a queue of operator requests.
///
/// When serviced, the terminal turns on the inquiry request indicator if a request is waiting.
/// A read (`R`) moves the oldest request into memory; with no request waiting,
/// nothing is stored and the inquiry clear indicator is set.
/// A write (`W`) sends memory up to a group mark with a word mark to the reply buffer.
#[derive(Debug, Default, Clone)]
pub struct BufferedInquiry {
    requests: Arc<RwLock<VecDeque<String>>>,
    replies: Arc<RwLock<Vec<String>>>,
}
impl BufferedInquiry {
    /// Creates a terminal, wrapping it around the given request and reply buffers.
    pub fn new(requests: Arc<RwLock<VecDeque<String>>>, replies: Arc<RwLock<Vec<String>>>) -> Self {
        Self { requests, replies }
    }

    /// Gets a reference to the requests waiting to be read.
    pub fn get_requests(&self) -> &Arc<RwLock<VecDeque<String>>> {
        &self.requests
    }
    /// Gets a reference to the replies written by the program.
    pub fn get_replies(&self) -> &Arc<RwLock<Vec<String>>> {
        &self.replies
    }

    fn pending(&self) -> bool {
        resolve_lock(self.requests.try_read()).is_some_and(|r| !r.is_empty())
    }
}
impl ExternalDevice for BufferedInquiry {
    fn service(&mut self, ctx: &mut IoCtx) -> IoStatus {
        ctx.ind.set(INQUIRY_REQUEST, self.pending());
        IoStatus::Ok
    }
}
impl InquiryTerminal for BufferedInquiry {
    fn inq_io(&mut self, ctx: &mut IoCtx, _mode: IoMode, modifier: u8) -> IoStatus {
        match modifier & bcd::CHAR {
            READ => {
                let request = resolve_lock(self.requests.try_write()).and_then(|mut r| r.pop_front());
                let Some(request) = request else {
                    ctx.ind.set(INQUIRY_CLEAR, true);
                    return IoStatus::Ok;
                };

                let mut addr = ctx.addr;
                for ch in request.chars() {
                    match ctx.mem.get(addr) {
                        Some(cell) if !(cell.wm() && cell.char() == GROUP_MARK) => {
                            ctx.mem[addr].set_char(bcd::ascii_to_bcd(ch).unwrap_or(bcd::BLANK));
                            addr += 1;
                        },
                        _ => break,
                    }
                }
                ctx.ind.set(INQUIRY_REQUEST, self.pending());
                IoStatus::Ok
            },
            WRITE => {
                let mut reply = String::new();
                let mut addr = ctx.addr;
                while let Some(cell) = ctx.mem.get(addr) {
                    if cell.wm() && cell.char() == GROUP_MARK {
                        break;
                    }
                    reply.push(bcd::bcd_to_ascii(cell.char()));
                    addr += 1;
                }
                match resolve_lock(self.replies.try_write()) {
                    Some(mut replies) => {
                        replies.push(reply);
                        IoStatus::Ok
                    },
                    None => IoStatus::IoError,
                }
            },
            _ => IoStatus::InvalidModifier,
        }
    }
}
