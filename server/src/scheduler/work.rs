use std::{
    fmt::{Display, Formatter},
    ops::Range,
};

use shared::Message;

/// Connection identifier handed out by the transport.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ConnId(pub u64);

impl Display for ConnId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a connection turned out to be, used to classify its disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnRole {
    Worker,
    Client,
}

/// A client's search. `lower` advances as chunks are carved off.
#[derive(Debug)]
pub struct ClientRequest {
    pub data: String,
    pub lower: u64,
    pub upper: u64,
    /// carved units whose result has not been folded in yet
    pub outstanding: usize,
}

impl ClientRequest {
    pub fn new(data: String, lower: u64, upper: u64) -> Self {
        Self { data, lower, upper, outstanding: 0 }
    }

    pub fn fully_carved(&self) -> bool {
        self.lower == self.upper
    }

    /// Cuts the next `[lower, lower + n)` off the remaining range.
    pub fn carve(&mut self, owner: ConnId, max_chunk_size: u64) -> Option<WorkUnit> {
        if self.fully_carved() {
            return None;
        }
        let size = max_chunk_size.min(self.upper - self.lower);
        let range = self.lower..self.lower + size;
        self.lower = range.end;
        self.outstanding += 1;
        Some(WorkUnit { owner, data: self.data.clone(), range })
    }
}

/// A bounded slice of one client's range, searched by a single worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub owner: ConnId,
    pub data: String,
    pub range: Range<u64>,
}

impl WorkUnit {
    /// Assignments travel as Request-shaped messages.
    pub fn to_message(&self) -> Message {
        Message::request(self.data.clone(), self.range.start, self.range.end)
    }
}

/// Best `(hash, nonce)` folded so far for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BestResult {
    pub hash: u64,
    pub nonce: u64,
}

impl Default for BestResult {
    fn default() -> Self {
        Self { hash: u64::MAX, nonce: u64::MAX }
    }
}

impl BestResult {
    /// Keeps the reported pair only when its hash is strictly smaller.
    pub fn fold(&mut self, hash: u64, nonce: u64) -> bool {
        if hash < self.hash {
            self.hash = hash;
            self.nonce = nonce;
            return true;
        }
        false
    }

    pub fn to_message(self) -> Message {
        Message::result(self.hash, self.nonce)
    }
}
