/// Per-channel outbound sequence counters.
///
/// Each channel starts at 0 on first use and wraps back to 0 after 255.
#[derive(Debug, Clone)]
pub struct SequenceCounters {
    next: [Option<u8>; 256],
}

impl SequenceCounters {
    pub fn new() -> Self {
        Self { next: [None; 256] }
    }

    /// Take the next sequence number for `channel` and advance its counter.
    pub fn next(&mut self, channel: u8) -> u8 {
        let slot = &mut self.next[channel as usize];
        let seq = slot.unwrap_or(0);
        *slot = Some(seq.wrapping_add(1));
        seq
    }

    /// Sequence number the next call to [`next`](Self::next) would return.
    pub fn peek(&self, channel: u8) -> u8 {
        self.next[channel as usize].unwrap_or(0)
    }

    /// Forget all counters.
    pub fn reset(&mut self) {
        self.next = [None; 256];
    }
}

impl Default for SequenceCounters {
    fn default() -> Self {
        Self::new()
    }
}
