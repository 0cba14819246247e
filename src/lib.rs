//! User-space polling driver for the Xilinx AXI DMA engine
//!
//! `axi-dma` drives an AXI DMA engine from Linux user space, through
//! `/dev/mem`. It provides
//!
//! - a [`Controller`] that configures one channel of the engine, in direct
//!   (single buffer) or scatter-gather (descriptor ring) mode
//! - completion polling that sleeps between status samples, adapts its
//!   interval to the stream rate, and hands out partial ring progress
//! - [`UdmaBuffer`], a mapping of a physically contiguous udmabuf buffer
//!   to transfer into or out of
//!
//! There are no interrupts. Every poll blocks the calling thread until data
//! is ready or its timeout runs out.
//!
//! # Hardware mode
//!
//! Whether the engine runs in direct or scatter-gather mode is decided when
//! the FPGA design is built, and reported in the status register. The
//! controller checks it on every mode-specific call and fails with
//! [`Error::ModeMismatch`] if you call the wrong one.
//!
//! # Logging
//!
//! The crate logs through the [`log`](https://docs.rs/log) facade. Install
//! a logger to see configuration events at `debug` and per-sample poll
//! progress at `trace`.
//!
//! ### License
//!
//! Licensed under either of
//!
//! - [Apache License, Version 2.0](http://www.apache.org/licenses/LICENSE-2.0) ([LICENSE-APACHE](./LICENSE-APACHE))
//! - [MIT License](http://opensource.org/licenses/MIT) ([LICENSE-MIT](./LICENSE-MIT))
//!
//! at your option.
//!
//! Unless you explicitly state otherwise, any contribution intentionally submitted
//! for inclusion in the work by you, as defined in the Apache-2.0 license, shall be
//! dual licensed as above, without any additional terms or conditions.

mod buffer;
mod calibrate;
mod channel;
mod controller;
mod descriptor;
mod error;
mod mmio;
mod poll;
pub mod ral;
#[cfg(test)]
mod sim;
mod status;

pub use buffer::{BufferPaths, Owner, SyncDirection, SyncMode, UdmaBuffer};
pub use calibrate::{Calibration, WaitCalibrator};
pub use channel::{Channel, Layout};
pub use controller::Controller;
pub use descriptor::{DescriptorRing, DescriptorState};
pub use error::Error;
pub use mmio::{DevMem, MappedRegion, Mapper, Mmio, Register};
pub use poll::{Block, PollState};
pub use status::{Mode, Status};

/// A DMA result
pub type Result<T> = core::result::Result<T, Error>;
