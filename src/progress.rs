use crate::SEGMENT_SIZE;

const DOTS_PER_TRANSFER: u64 = 60;

/// Dot cadence for the "Sending:" line: about sixty dots for a whole file,
/// none at all for files under sixty blocks.
#[derive(Debug)]
pub struct Progress {
    blocks_per_dot: u64,
    count: u64,
}

impl Progress {
    pub fn new(file_size: u64) -> Self {
        Self {
            blocks_per_dot: file_size / (SEGMENT_SIZE as u64 * DOTS_PER_TRANSFER),
            count: 0,
        }
    }

    /// Called once per fresh block; true when a dot is due.
    pub fn tick(&mut self) -> bool {
        if self.blocks_per_dot == 0 {
            return false;
        }
        self.count += 1;
        if self.count == self.blocks_per_dot {
            self.count = 0;
            true
        } else {
            false
        }
    }
}
