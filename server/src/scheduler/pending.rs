use std::collections::VecDeque;

use super::work::ConnId;

/// Rotation of clients that still have uncarved range.
///
/// The client at the back is served next; after being served it moves to the
/// front so every other pending client gets a turn first.
#[derive(Debug, Default)]
pub struct PendingQueue {
    queue: VecDeque<ConnId>,
}

impl PendingQueue {
    pub fn push_back(&mut self, id: ConnId) {
        self.queue.push_back(id);
    }

    pub fn back(&self) -> Option<ConnId> {
        self.queue.back().copied()
    }

    pub fn rotate_back_to_front(&mut self) {
        if let Some(id) = self.queue.pop_back() {
            self.queue.push_front(id);
        }
    }

    pub fn pop_back(&mut self) -> Option<ConnId> {
        self.queue.pop_back()
    }

    pub fn remove(&mut self, id: ConnId) -> bool {
        match self.queue.iter().position(|c| *c == id) {
            Some(index) => self.queue.remove(index).is_some(),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
