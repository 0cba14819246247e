//! AXI DMA channel register block and fields
//!
//! MM2S and S2MM share this layout. The S2MM block starts at
//! [`S2MM_BASE`]; the MM2S block starts at the beginning of the window.

use core::mem::offset_of;
use ral_registers::RWRegister;

/// Byte offset of the MM2S register block in the engine window
pub const MM2S_BASE: usize = 0x00;
/// Byte offset of the S2MM register block in the engine window
pub const S2MM_BASE: usize = 0x30;

/// Size of the memory window that covers the engine registers
pub const WINDOW_SIZE: usize = 0x1_0000;

/// One channel's registers.
#[repr(C)]
pub struct RegisterBlock {
    /// DMA Control Register
    pub DMACR: RWRegister<u32>,
    /// DMA Status Register
    pub DMASR: RWRegister<u32>,
    /// Current Descriptor Pointer
    pub CURDESC: RWRegister<u32>,
    /// Current Descriptor Pointer, upper 32 bits
    pub CURDESC_MSB: RWRegister<u32>,
    /// Tail Descriptor Pointer
    pub TAILDESC: RWRegister<u32>,
    /// Tail Descriptor Pointer, upper 32 bits
    pub TAILDESC_MSB: RWRegister<u32>,
    /// Source (MM2S) or destination (S2MM) address
    pub ADDR: RWRegister<u32>,
    /// Source or destination address, upper 32 bits
    pub ADDR_MSB: RWRegister<u32>,
    _reserved0: [u32; 2],
    /// Transfer length in bytes. Writing it starts a direct transfer.
    pub LENGTH: RWRegister<u32>,
}

/// Offsets of each register relative to the start of a channel block.
pub mod offsets {
    use super::{offset_of, RegisterBlock};

    pub const DMACR: usize = offset_of!(RegisterBlock, DMACR);
    pub const DMASR: usize = offset_of!(RegisterBlock, DMASR);
    pub const CURDESC: usize = offset_of!(RegisterBlock, CURDESC);
    pub const TAILDESC: usize = offset_of!(RegisterBlock, TAILDESC);
    pub const ADDR: usize = offset_of!(RegisterBlock, ADDR);
    pub const LENGTH: usize = offset_of!(RegisterBlock, LENGTH);
}

// Did I calculate my reservations correctly?
const _: () = assert!(offsets::CURDESC == 0x08);
const _: () = assert!(offsets::TAILDESC == 0x10);
const _: () = assert!(offsets::ADDR == 0x18);
const _: () = assert!(offsets::LENGTH == 0x28);
const _: () = assert!(core::mem::size_of::<RegisterBlock>() <= S2MM_BASE - MM2S_BASE);

/// Control register fields
pub mod DMACR {
    crate::ral::field!(RS, 0, 1);
    crate::ral::field!(RESET, 2, 1);
    crate::ral::field!(CYCLIC_BD_EN, 4, 1);
    crate::ral::field!(IOC_IRQ_EN, 12, 1);
    crate::ral::field!(DLY_IRQ_EN, 13, 1);
    crate::ral::field!(ERR_IRQ_EN, 14, 1);
    crate::ral::field!(IRQ_THRESHOLD, 16, 8);
}

/// Status register fields
pub mod DMASR {
    crate::ral::field!(HALTED, 0, 1);
    crate::ral::field!(IDLE, 1, 1);
    crate::ral::field!(SG_INCLD, 3, 1);
    crate::ral::field!(DMA_INT_ERR, 4, 1);
    crate::ral::field!(DMA_SLV_ERR, 5, 1);
    crate::ral::field!(DMA_DEC_ERR, 6, 1);
    crate::ral::field!(SG_INT_ERR, 8, 1);
    crate::ral::field!(SG_SLV_ERR, 9, 1);
    crate::ral::field!(SG_DEC_ERR, 10, 1);
    crate::ral::field!(IOC_IRQ, 12, 1);
    crate::ral::field!(DLY_IRQ, 13, 1);
    crate::ral::field!(ERR_IRQ, 14, 1);
    crate::ral::field!(IRQ_THRESHOLD_STS, 16, 8);
}
