//! DMA channel

use crate::{
    mmio::{Mmio, Register},
    ral::axi_dma::{offsets, MM2S_BASE, S2MM_BASE},
};

use core::fmt::{self, Display};

/// A DMA channel direction
///
/// The engine has two independent channels with the same register
/// layout at different offsets. A controller must be bound to one of
/// them before it can do anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Channel {
    /// Memory-mapped to stream (MM2S)
    Transmit,
    /// Stream to memory-mapped (S2MM)
    Receive,
    /// No channel selected yet
    #[default]
    Unbound,
}

impl Channel {
    /// Returns the register offset table for this channel
    ///
    /// `None` for [`Unbound`](Channel::Unbound).
    pub const fn layout(self) -> Option<Layout> {
        match self {
            Channel::Transmit => Some(Layout::MM2S),
            Channel::Receive => Some(Layout::S2MM),
            Channel::Unbound => None,
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Transmit => f.write_str("MM2S"),
            Channel::Receive => f.write_str("S2MM"),
            Channel::Unbound => f.write_str("unbound"),
        }
    }
}

/// Byte offsets of one channel's registers in the engine window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Control register
    pub control: usize,
    /// Status register
    pub status: usize,
    /// Current descriptor register
    pub current_descriptor: usize,
    /// Tail descriptor register
    pub tail_descriptor: usize,
    /// Source (MM2S) or destination (S2MM) address register
    pub address: usize,
    /// Length register
    pub length: usize,
}

impl Layout {
    /// The memory-mapped to stream registers
    pub const MM2S: Layout = Layout::at(MM2S_BASE);
    /// The stream to memory-mapped registers
    pub const S2MM: Layout = Layout::at(S2MM_BASE);

    const fn at(base: usize) -> Self {
        Layout {
            control: base + offsets::DMACR,
            status: base + offsets::DMASR,
            current_descriptor: base + offsets::CURDESC,
            tail_descriptor: base + offsets::TAILDESC,
            address: base + offsets::ADDR,
            length: base + offsets::LENGTH,
        }
    }

    /// Bind the layout to a register window
    pub(crate) fn registers<'a, M: Mmio + ?Sized>(&self, window: &'a M) -> Registers<'a, M> {
        Registers {
            DMACR: Register::new(window, self.control),
            DMASR: Register::new(window, self.status),
            CURDESC: Register::new(window, self.current_descriptor),
            TAILDESC: Register::new(window, self.tail_descriptor),
            ADDR: Register::new(window, self.address),
            LENGTH: Register::new(window, self.length),
        }
    }
}

/// A channel's registers, ready for the RAL macros
#[allow(non_snake_case)] // Compatibility with RAL
pub(crate) struct Registers<'a, M: ?Sized> {
    pub DMACR: Register<'a, M>,
    pub DMASR: Register<'a, M>,
    pub CURDESC: Register<'a, M>,
    pub TAILDESC: Register<'a, M>,
    pub ADDR: Register<'a, M>,
    pub LENGTH: Register<'a, M>,
}
