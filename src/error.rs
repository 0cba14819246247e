//! DMA driver errors

use crate::status::Mode;

/// Errors reported by the driver
///
/// The precondition errors are raised synchronously by the operation that
/// was called in the wrong state; none of them are retried. Transfer
/// errors that the engine reports in its status register are *not*
/// errors here. Inspect them with [`Status`](crate::Status) and reset the
/// channel yourself.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No channel is bound to the controller
    #[error("DMA channel is not set")]
    InvalidState,
    /// The operation belongs to the other transfer mode
    #[error("DMA channel is not configured for {expected} mode")]
    ModeMismatch {
        /// The mode that the operation requires
        expected: Mode,
    },
    /// A receive-only operation was called on the transmit channel
    #[error("DMA channel is not S2MM")]
    ChannelMismatch,
    /// A scatter-gather operation was called before `init_sg`
    #[error("Scatter-Gather is not initialized")]
    NotInitialized,
    /// A poll was started while the channel is not running
    #[error("DMA channel is not running")]
    NotRunning,
    /// A descriptor index is past the end of the ring
    #[error("descriptor {index} is out of bound (ring of {len})")]
    IndexOutOfRange {
        /// The requested descriptor
        index: usize,
        /// The ring length
        len: usize,
    },
    /// A raw register offset is past the end of the engine window
    #[error("register offset {offset:#x} is outside the {len:#x} byte window")]
    OffsetOutOfRange {
        /// The requested byte offset
        offset: usize,
        /// The window size in bytes
        len: usize,
    },
    /// The block size does not fit the descriptor length field
    #[error("block size {0} does not fit a 26-bit descriptor length")]
    InvalidBlockSize(u32),
    /// The ring length does not fit the 8-bit descriptor count fields
    #[error("descriptor ring length {0} is not within 1..=255")]
    InvalidRingLength(usize),
    /// No udmabuf with this name is registered in sysfs
    #[error("sys class not found for DMA buffer {0}")]
    BufferNotFound(String),
    /// Opening or mapping a device failed
    #[error("I/O error")]
    Io(#[from] std::io::Error),
    /// A sysfs attribute held an unexpected value
    #[error("failed to parse integer from sysfs file")]
    Parse(#[from] std::num::ParseIntError),
}
