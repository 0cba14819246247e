//! Scatter-gather block descriptor layout and fields

use core::mem::offset_of;
use ral_registers::RWRegister;

/// A block descriptor, as the engine fetches it from memory.
///
/// Descriptors must be aligned on a 64 byte boundary, which is also
/// their stride in a ring.
#[repr(C, align(64))]
pub struct RegisterBlock {
    /// Next descriptor pointer
    pub NXTDESC: RWRegister<u32>,
    /// Next descriptor pointer, upper 32 bits
    pub NXTDESC_MSB: RWRegister<u32>,
    /// Buffer address
    pub BUFFER_ADDRESS: RWRegister<u32>,
    /// Buffer address, upper 32 bits
    pub BUFFER_ADDRESS_MSB: RWRegister<u32>,
    _reserved0: [u32; 2],
    /// Control (buffer length)
    pub CONTROL: RWRegister<u32>,
    /// Status, written back by the engine
    pub STATUS: RWRegister<u32>,
    /// User application fields
    pub APP: [RWRegister<u32>; 5],
}

/// Descriptor stride in bytes
pub const STRIDE: usize = core::mem::size_of::<RegisterBlock>();

/// Offsets of each word relative to the start of a descriptor.
pub mod offsets {
    use super::{offset_of, RegisterBlock};

    pub const NXTDESC: usize = offset_of!(RegisterBlock, NXTDESC);
    pub const BUFFER_ADDRESS: usize = offset_of!(RegisterBlock, BUFFER_ADDRESS);
    pub const CONTROL: usize = offset_of!(RegisterBlock, CONTROL);
    pub const STATUS: usize = offset_of!(RegisterBlock, STATUS);
}

const _: () = assert!(STRIDE == 0x40);
const _: () = assert!(offsets::NXTDESC == 0x00);
const _: () = assert!(offsets::BUFFER_ADDRESS == 0x08);
const _: () = assert!(offsets::CONTROL == 0x18);
const _: () = assert!(offsets::STATUS == 0x1C);

/// Control word fields
pub mod CONTROL {
    crate::ral::field!(LENGTH, 0, 26);
    crate::ral::field!(TXEOF, 26, 1);
    crate::ral::field!(TXSOF, 27, 1);
}

/// Status word fields
pub mod STATUS {
    crate::ral::field!(TRANSFERRED, 0, 26);
    crate::ral::field!(RXEOF, 26, 1);
    crate::ral::field!(RXSOF, 27, 1);
    crate::ral::field!(DMA_INT_ERR, 28, 1);
    crate::ral::field!(DMA_SLV_ERR, 29, 1);
    crate::ral::field!(DMA_DEC_ERR, 30, 1);
    crate::ral::field!(CMPLT, 31, 1);
}
