//! A RAL-like module to support AXI DMA register access
//!
//! The engine exposes two copies of the same channel register block, one
//! for MM2S and one for S2MM, and walks a ring of block descriptors that
//! live in a separate memory region. Each layout is described once as a
//! `#[repr(C)]` struct, so that byte offsets come straight from the
//! compiler, and each register carries RAL-style field modules so that
//! we can use the RAL macros against it.

#![allow(
    non_snake_case, // Compatibility with RAL
    non_upper_case_globals, // Field `offset` and `mask` constants
    dead_code, // Layout-only structs
)]

/// Declares a RAL field module with the given bit offset and width
macro_rules! field {
    ($name:ident, $offset:expr, $width:expr) => {
        pub mod $name {
            pub const offset: u32 = $offset;
            pub const mask: u32 = (((1u64 << $width) - 1) as u32) << offset;
            pub mod R {}
            pub mod W {}
            pub mod RW {}
        }
    };
}

pub(crate) use field;

pub mod axi_dma;
pub mod descriptor;

pub use ral_registers::{modify_reg, read_reg, write_reg};
