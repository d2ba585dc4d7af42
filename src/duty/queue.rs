
use heapless::Deque;

use crate::packet::Packet;

/// Bounded FIFO of outbound frames.
///
/// The head is always the oldest enqueued frame and
/// [`pop_head`](TxQueue::pop_head) is the only way a frame leaves the
/// queue; dropping the returned frame releases its buffer. On overflow the
/// new frame is handed back so the send fails observably.
pub struct TxQueue<const N: usize> {
    entries: Deque<Packet, N>,
}

impl<const N: usize> TxQueue<N> {
    pub const fn new() -> Self {
        Self {
            entries: Deque::new(),
        }
    }

    /// Append a frame behind any already queued.
    pub fn enqueue(&mut self, frame: Packet) -> Result<(), Packet> {
        self.entries.push_back(frame)
    }

    /// Borrow the next frame to transmit.
    pub fn head(&self) -> Option<&Packet> {
        self.entries.front()
    }

    /// Remove and return the head frame, shifting the remainder up.
    pub fn pop_head(&mut self) -> Option<Packet> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
