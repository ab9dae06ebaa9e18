//! In-process holding area for consumed envelopes awaiting persistence.

use std::collections::VecDeque;

use engine_core::Envelope;
use parking_lot::RwLock;

/// FIFO buffer shared between consumers appending and the batch writer draining.
pub struct EventBuffer {
    events: RwLock<VecDeque<Envelope>>,
    high_water_mark: usize,
}

impl EventBuffer {
    pub fn new(high_water_mark: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::new()),
            high_water_mark: high_water_mark.max(1),
        }
    }

    pub fn add(&self, envelope: Envelope) {
        self.events.write().push_back(envelope);
    }

    pub fn add_all(&self, envelopes: impl IntoIterator<Item = Envelope>) {
        self.events.write().extend(envelopes);
    }

    /// Remove and return up to `max` of the oldest envelopes.
    pub fn drain_up_to(&self, max: usize) -> Vec<Envelope> {
        let mut events = self.events.write();
        let n = max.min(events.len());
        events.drain(..n).collect()
    }

    pub fn size(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// True once the buffer reached its high-water mark.
    pub fn should_flush(&self) -> bool {
        self.size() >= self.high_water_mark
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }

    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }
}
