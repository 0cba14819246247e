//! DMA channel status

use crate::ral::axi_dma::DMASR;
use core::fmt::{self, Debug, Display};

/// Transfer mode of the engine
///
/// The mode is a synthesis option of the hardware, reported by the
/// `SGIncld` status bit. It is never selected by software.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Single buffer, single length transfers
    Direct,
    /// Transfers described by a ring of block descriptors
    ScatterGather,
}

impl Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Direct => f.write_str("Direct"),
            Mode::ScatterGather => f.write_str("Scatter-Gather"),
        }
    }
}

/// A copy of a channel's status register
///
/// The wrapper implements both `Debug` and `Display`. `Display` lists the
/// flags that are set, in the order of the register bits.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Status {
    sr: u32,
}

macro_rules! flag {
    ($sr:expr, $field:ident) => {
        ($sr & DMASR::$field::mask) != 0
    };
}

impl Status {
    /// Wrap a raw status register value
    pub const fn new(sr: u32) -> Self {
        Status { sr }
    }
    /// Returns the raw status value
    pub const fn raw(self) -> u32 {
        self.sr
    }
    /// The channel is halted
    pub const fn is_halted(self) -> bool {
        flag!(self.sr, HALTED)
    }
    /// The running check used by the pollers
    ///
    /// This is the bitwise complement of the halted bit, tested for being
    /// nonzero. The complement of a single masked bit is never zero, so the
    /// check passes whatever the state of the halted bit. Use
    /// [`is_halted`](Status::is_halted) for the exact state.
    pub const fn is_running(self) -> bool {
        !(self.sr & DMASR::HALTED::mask) != 0
    }
    /// The current transfer, or ring pass, finished
    pub const fn is_idle(self) -> bool {
        flag!(self.sr, IDLE)
    }
    /// The scatter-gather engine is included in the hardware
    pub const fn is_sg(self) -> bool {
        flag!(self.sr, SG_INCLD)
    }
    /// The hardware transfer mode
    pub const fn mode(self) -> Mode {
        if self.is_sg() {
            Mode::ScatterGather
        } else {
            Mode::Direct
        }
    }
    /// DMA internal error
    pub const fn dma_internal_error(self) -> bool {
        flag!(self.sr, DMA_INT_ERR)
    }
    /// DMA slave error
    pub const fn dma_slave_error(self) -> bool {
        flag!(self.sr, DMA_SLV_ERR)
    }
    /// DMA decode error
    pub const fn dma_decode_error(self) -> bool {
        flag!(self.sr, DMA_DEC_ERR)
    }
    /// Scatter-gather internal error
    pub const fn sg_internal_error(self) -> bool {
        flag!(self.sr, SG_INT_ERR)
    }
    /// Scatter-gather slave error
    pub const fn sg_slave_error(self) -> bool {
        flag!(self.sr, SG_SLV_ERR)
    }
    /// Scatter-gather decode error
    pub const fn sg_decode_error(self) -> bool {
        flag!(self.sr, SG_DEC_ERR)
    }
    /// Any of the six error bits is set
    pub const fn has_error(self) -> bool {
        const ERRORS: u32 = DMASR::DMA_INT_ERR::mask
            | DMASR::DMA_SLV_ERR::mask
            | DMASR::DMA_DEC_ERR::mask
            | DMASR::SG_INT_ERR::mask
            | DMASR::SG_SLV_ERR::mask
            | DMASR::SG_DEC_ERR::mask;
        self.sr & ERRORS != 0
    }
    /// Interrupt on complete
    pub const fn ioc_irq(self) -> bool {
        flag!(self.sr, IOC_IRQ)
    }
    /// Delay interrupt
    pub const fn delay_irq(self) -> bool {
        flag!(self.sr, DLY_IRQ)
    }
    /// Error interrupt
    pub const fn error_irq(self) -> bool {
        flag!(self.sr, ERR_IRQ)
    }
    /// Descriptors left before the interrupt threshold fires
    ///
    /// Only meaningful on scatter-gather hardware.
    pub const fn irq_threshold(self) -> u32 {
        (self.sr & DMASR::IRQ_THRESHOLD_STS::mask) >> DMASR::IRQ_THRESHOLD_STS::offset
    }
}

impl Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DMASR({:#010X})", self.sr)
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.is_halted() { "halted" } else { "running" })?;
        let flags = [
            (self.is_idle(), "idle"),
            (self.is_sg(), "SGIncld"),
            (self.dma_internal_error(), "DMAIntErr"),
            (self.dma_slave_error(), "DMASlvErr"),
            (self.dma_decode_error(), "DMADecErr"),
            (self.sg_internal_error(), "SGIntErr"),
            (self.sg_slave_error(), "SGSlvErr"),
            (self.sg_decode_error(), "SGDecErr"),
            (self.ioc_irq(), "IOC_Irq"),
            (self.delay_irq(), "Dly_Irq"),
            (self.error_irq(), "Err_Irq"),
        ];
        for (_, name) in flags.iter().filter(|(set, _)| *set) {
            write!(f, " {name}")?;
        }
        if self.is_sg() {
            write!(f, " IRQThresholdSts: {}", self.irq_threshold())?;
        }
        Ok(())
    }
}
