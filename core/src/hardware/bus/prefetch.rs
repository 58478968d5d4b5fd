//! Game Pak prefetch buffer: while the CPU performs internal cycles the bus keeps issuing
//! sequential ROM reads ahead of the fetcher, so a later matching sequential code fetch is
//! effectively free.

const CAPACITY_WORDS: u32 = 8;

#[derive(Debug, Clone)]
pub struct Prefetcher {
    pub(crate) head_address: u32,
    pub(crate) count: u32,
    pub(crate) active: bool,
}

impl Prefetcher {
    pub fn new() -> Self {
        Self { head_address: 0, count: 0, active: false }
    }

    pub fn reset(&mut self, address: u32) {
        self.head_address = address;
        self.count = 0;
        self.active = true;
    }

    pub fn invalidate(&mut self) {
        self.active = false;
        self.count = 0;
    }

    /// Advance the buffer as if `cycles` of idle bus time passed, filling up to capacity.
    pub fn advance(&mut self, cycles: u32, half_word_cost: u32) {
        if !self.active || half_word_cost == 0 {
            return;
        }
        let filled = cycles / half_word_cost;
        self.count = (self.count + filled).min(CAPACITY_WORDS);
    }

    /// Returns `Some(cost)` if `address` is satisfied by the prefetch buffer (a sequential code
    /// fetch matching `head_address + count*2`), consuming one slot. Otherwise `None`, and the
    /// caller should invalidate and pay the full access cost.
    pub fn try_satisfy(&mut self, address: u32) -> Option<u32> {
        if !self.active || self.count == 0 {
            return None;
        }
        let expected = self.head_address.wrapping_add(0); // buffer always serves the oldest slot
        if address == expected {
            self.count -= 1;
            self.head_address = self.head_address.wrapping_add(2);
            Some(1)
        } else {
            None
        }
    }
}

impl Default for Prefetcher {
    fn default() -> Self {
        Self::new()
    }
}
