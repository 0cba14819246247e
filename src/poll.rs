//! Completion polling session
//!
//! A receive poll may return before the engine has filled the whole ring.
//! The [`Session`] carries what the next poll needs to resume: which
//! strategy is in progress, the range of descriptors already handed out,
//! and the last "descriptors until threshold" count seen in the status
//! register.

use crate::status::Status;

use core::ops::RangeInclusive;

/// A completed chunk of a transfer
///
/// `offset` is relative to the transfer's target address.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    /// Byte offset from the target base address
    pub offset: u32,
    /// Size in bytes
    pub size: u32,
}

/// What the next call to `rx` resumes
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// No poll in progress. `rx` picks a strategy.
    #[default]
    Idle,
    /// Waiting for a direct-mode transfer
    DirectPending,
    /// Handing out ring descriptors as they complete
    ///
    /// Abandoning this state and starting a whole-ring poll does not
    /// rewind the cursors.
    BlockPending,
    /// Waiting for a full ring pass
    BufferPending,
}

#[derive(Debug, Default)]
pub(crate) struct Session {
    pub(crate) state: PollState,
    /// First descriptor not handed out yet
    start: usize,
    /// Last descriptor handed out
    stop: usize,
    /// Last IRQ threshold count seen while block polling
    last_threshold: u32,
}

impl Session {
    /// Prepare for a new pass over a ring of `len` descriptors
    pub(crate) fn restart(&mut self, len: usize) {
        *self = Session {
            state: PollState::Idle,
            start: 0,
            stop: 0,
            last_threshold: len as u32,
        };
    }

    /// The (start, stop) cursor pair
    pub(crate) fn cursors(&self) -> (usize, usize) {
        (self.start, self.stop)
    }

    /// Number of descriptors that became ready, according to one status
    /// sample
    ///
    /// An idle engine finished the ring: everything from the start cursor
    /// through the last descriptor is ready, and the session ends.
    /// Otherwise, a drop of the threshold count says how many descriptors
    /// the engine consumed since the ring started.
    pub(crate) fn ready(&mut self, status: Status, len: usize) -> usize {
        if status.is_idle() {
            self.last_threshold = len as u32;
            self.state = PollState::Idle;
            return len.saturating_sub(self.start);
        }
        let threshold = status.irq_threshold();
        if threshold < self.last_threshold {
            self.last_threshold = threshold;
            len.saturating_sub(threshold as usize + self.start)
        } else {
            0
        }
    }

    /// Hand out `ready` descriptors from the start cursor
    ///
    /// The start cursor moves past the range, unless the range ends on the
    /// last descriptor. In that case it stays where it was until the ring
    /// is restarted.
    pub(crate) fn consume(&mut self, ready: usize, len: usize) -> RangeInclusive<usize> {
        debug_assert!(ready > 0);
        self.stop = self.start + ready - 1;
        let range = self.start..=self.stop;
        if self.stop < len - 1 {
            self.start = self.stop + 1;
        }
        range
    }
}
