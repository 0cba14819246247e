//! AXI DMA controller

use crate::{
    calibrate::{Calibration, WaitCalibrator},
    channel::{Channel, Layout},
    descriptor::{DescriptorRing, DescriptorState},
    mmio::{DevMem, Mapper, Mmio},
    poll::{Block, PollState, Session},
    ral::{self, axi_dma::WINDOW_SIZE, descriptor::STRIDE},
    status::{Mode, Status},
    Error, Result,
};

use core::{
    sync::atomic::{self, Ordering},
    time::Duration,
};

bitflags::bitflags! {
    /// Preconditions of an operation, on top of a bound channel
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct Require: u8 {
        /// The hardware has no scatter-gather engine
        const DIRECT = 1 << 0;
        /// The hardware has a scatter-gather engine
        const SCATTER_GATHER = 1 << 1;
        /// `init_sg` built a descriptor ring
        const RING = 1 << 2;
        /// The S2MM channel is bound
        const RECEIVE = 1 << 3;
        /// The channel reports that it runs
        const RUNNING = 1 << 4;
    }
}

/// An AXI DMA engine
///
/// The controller owns the mapping of the engine's registers and, after
/// [`init_sg`](Controller::init_sg), the mapping of the descriptor ring.
/// Bind a channel with [`set_channel`](Controller::set_channel) before
/// anything else; every other operation fails with
/// [`Error::InvalidState`] until then.
///
/// A controller drives one channel at a time. Use one controller per
/// direction if you need both, and don't share a controller across
/// threads without serializing access.
///
/// # Example
///
/// Receive a ring of 8 blocks of 1 KiB into a udmabuf.
///
/// ```no_run
/// use axi_dma::{Channel, Controller, UdmaBuffer};
///
/// # fn f() -> axi_dma::Result<()> {
/// let buffer = UdmaBuffer::open("udmabuf0", false)?;
/// let mut dma = Controller::open(0x4040_0000)?;
/// dma.set_channel(Channel::Receive);
/// dma.reset()?;
/// dma.init_sg(0x4000_0000, 8, 1024, buffer.phys_addr())?;
/// dma.run()?;
///
/// while let Some(block) = dma.rx(None)? {
///     let start = block.offset as usize;
///     let data = &buffer.as_slice()[start..start + block.size as usize];
///     # let _ = data;
/// }
/// # Ok(()) }
/// ```
pub struct Controller<M: Mapper> {
    mapper: M,
    /// Engine registers
    window: M::Region,
    channel: Channel,
    /// Offset table of the bound channel
    layout: Option<Layout>,
    /// Direct transfer length, or bytes per descriptor
    size: u32,
    ring: Option<DescriptorRing<M::Region>>,
    session: Session,
    calibrator: WaitCalibrator,
    last: Block,
}

impl Controller<DevMem> {
    /// Map the engine at physical address `base_addr` through `/dev/mem`
    pub fn open(base_addr: u32) -> Result<Self> {
        Controller::new(DevMem::open()?, base_addr)
    }
}

impl<M: Mapper> Controller<M> {
    /// Map the engine at physical address `base_addr` with `mapper`
    ///
    /// The mapper also maps the descriptor ring in
    /// [`init_sg`](Controller::init_sg).
    pub fn new(mapper: M, base_addr: u32) -> Result<Self> {
        let window = mapper.map(base_addr, WINDOW_SIZE)?;
        Ok(Controller {
            mapper,
            window,
            channel: Channel::Unbound,
            layout: None,
            size: 0,
            ring: None,
            session: Session::default(),
            calibrator: WaitCalibrator::new(Calibration::default()),
            last: Block::default(),
        })
    }

    /// Bind the controller to a channel
    ///
    /// Rebinding replaces the register offset table.
    pub fn set_channel(&mut self, channel: Channel) {
        self.channel = channel;
        self.layout = channel.layout();
        log::debug!("DMA channel set to {channel}");
    }

    /// Returns the bound channel
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Replace the polling interval bounds
    ///
    /// The interval restarts from [`Calibration::initial_wait`].
    pub fn set_calibration(&mut self, calibration: Calibration) {
        self.calibrator = WaitCalibrator::new(calibration);
    }

    /// Returns the polling interval calibrator
    pub fn calibrator(&self) -> &WaitCalibrator {
        &self.calibrator
    }

    /// Check `require` and return the bound channel's offset table
    fn require(&self, require: Require) -> Result<Layout> {
        let layout = self.layout.ok_or(Error::InvalidState)?;
        let regs = layout.registers(&self.window);
        if require.intersects(Require::DIRECT | Require::SCATTER_GATHER) {
            let sg = ral::read_reg!(crate::ral::axi_dma, &regs, DMASR, SG_INCLD == 1);
            if require.contains(Require::DIRECT) && sg {
                return Err(Error::ModeMismatch {
                    expected: Mode::Direct,
                });
            }
            if require.contains(Require::SCATTER_GATHER) && !sg {
                return Err(Error::ModeMismatch {
                    expected: Mode::ScatterGather,
                });
            }
        }
        if require.contains(Require::RING) && self.ring.is_none() {
            return Err(Error::NotInitialized);
        }
        if require.contains(Require::RECEIVE) && self.channel != Channel::Receive {
            return Err(Error::ChannelMismatch);
        }
        if require.contains(Require::RUNNING)
            && !Status::new(ral::read_reg!(crate::ral::axi_dma, &regs, DMASR)).is_running()
        {
            return Err(Error::NotRunning);
        }
        Ok(layout)
    }

    /// Write `value` to the engine register at byte `offset`
    pub fn set_register(&mut self, offset: usize, value: u32) -> Result<()> {
        self.require(Require::empty())?;
        check_window(offset)?;
        self.window.write(offset, value);
        Ok(())
    }

    /// Read the engine register at byte `offset`
    pub fn register(&self, offset: usize) -> Result<u32> {
        self.require(Require::empty())?;
        check_window(offset)?;
        Ok(self.window.read(offset))
    }

    /// Stop the channel
    pub fn halt(&mut self) -> Result<()> {
        let layout = self.require(Require::empty())?;
        ral::write_reg!(crate::ral::axi_dma, &layout.registers(&self.window), DMACR, 0);
        Ok(())
    }

    /// Soft-reset the channel
    ///
    /// This is the only way to recover from the error bits in the status
    /// register.
    pub fn reset(&mut self) -> Result<()> {
        let layout = self.require(Require::empty())?;
        ral::write_reg!(crate::ral::axi_dma, &layout.registers(&self.window), DMACR, RESET: 1);
        Ok(())
    }

    /// Start the transfer that was initialized for this hardware's mode
    pub fn run(&mut self) -> Result<()> {
        if self.is_sg()? {
            self.run_sg()
        } else {
            self.run_direct()
        }
    }

    /// Returns a copy of the status register
    pub fn status(&self) -> Result<Status> {
        let layout = self.require(Require::empty())?;
        let regs = layout.registers(&self.window);
        Ok(Status::new(ral::read_reg!(crate::ral::axi_dma, &regs, DMASR)))
    }

    /// Log the decoded status register
    pub fn log_status(&self) -> Result<()> {
        let layout = self.require(Require::empty())?;
        let status = self.status()?;
        let direction = match self.channel {
            Channel::Receive => "Stream to memory-mapped",
            _ => "Memory-mapped to stream",
        };
        log::info!(
            "{direction} status ({:#x}@{:#x}): {status}",
            status.raw(),
            layout.status
        );
        Ok(())
    }

    /// The current transfer, or ring pass, finished
    pub fn is_idle(&self) -> Result<bool> {
        let layout = self.require(Require::empty())?;
        let regs = layout.registers(&self.window);
        Ok(ral::read_reg!(crate::ral::axi_dma, &regs, DMASR, IDLE == 1))
    }

    /// See [`Status::is_running`] for what this does, and does not, tell
    pub fn is_running(&self) -> Result<bool> {
        Ok(self.status()?.is_running())
    }

    /// The channel is halted
    pub fn is_halted(&self) -> Result<bool> {
        let layout = self.require(Require::empty())?;
        let regs = layout.registers(&self.window);
        Ok(ral::read_reg!(crate::ral::axi_dma, &regs, DMASR, HALTED == 1))
    }

    /// The hardware includes the scatter-gather engine
    pub fn is_sg(&self) -> Result<bool> {
        let layout = self.require(Require::empty())?;
        let regs = layout.registers(&self.window);
        Ok(ral::read_reg!(crate::ral::axi_dma, &regs, DMASR, SG_INCLD == 1))
    }

    /// The hardware transfer mode
    pub fn mode(&self) -> Result<Mode> {
        Ok(self.status()?.mode())
    }

    /// The interrupt-on-complete flag is set
    pub fn irq_ioc(&self) -> Result<bool> {
        let layout = self.require(Require::empty())?;
        let regs = layout.registers(&self.window);
        Ok(ral::read_reg!(crate::ral::axi_dma, &regs, DMASR, IOC_IRQ == 1))
    }

    /// Clear the interrupt-on-complete flag
    ///
    /// The flag is write-one-to-clear; other status bits are left alone.
    pub fn clear_irq_ioc(&mut self) -> Result<()> {
        let layout = self.require(Require::empty())?;
        ral::write_reg!(crate::ral::axi_dma, &layout.registers(&self.window), DMASR, IOC_IRQ: 1);
        Ok(())
    }

    /// Prepare a direct-mode transfer of `block_size` bytes at `addr`
    ///
    /// `addr` is the source on MM2S, the destination on S2MM. The control
    /// register is armed with run and all three interrupt enables, so that
    /// the status bits are observable. Call [`run`](Controller::run) to
    /// start the transfer.
    pub fn init_direct(&mut self, block_size: u32, addr: u32) -> Result<()> {
        let layout = self.require(Require::DIRECT)?;
        let regs = layout.registers(&self.window);
        ral::write_reg!(crate::ral::axi_dma, &regs, ADDR, addr);
        self.size = block_size;
        ral::write_reg!(
            crate::ral::axi_dma,
            &regs,
            DMACR,
            RS: 1,
            IOC_IRQ_EN: 1,
            DLY_IRQ_EN: 1,
            ERR_IRQ_EN: 1
        );
        log::debug!("{} direct transfer of {block_size} bytes at {addr:#010x}", self.channel);
        Ok(())
    }

    /// Start a direct-mode transfer
    ///
    /// Writing the length register starts the engine.
    pub fn run_direct(&mut self) -> Result<()> {
        let layout = self.require(Require::DIRECT)?;
        atomic::fence(Ordering::SeqCst);
        ral::write_reg!(crate::ral::axi_dma, &layout.registers(&self.window), LENGTH, self.size);
        Ok(())
    }

    /// Build a ring of `len` descriptors at physical address `desc_base`
    ///
    /// Descriptor `i` covers `block_size` bytes at
    /// `target + block_size * i`. The current descriptor register points
    /// at the ring when this returns. Call [`run`](Controller::run) to
    /// start the engine.
    ///
    /// `len` must be within `1..=255`, and `block_size` must fit the
    /// 26-bit descriptor length field.
    pub fn init_sg(&mut self, desc_base: u32, len: usize, block_size: u32, target: u32) -> Result<()> {
        let layout = self.require(Require::SCATTER_GATHER)?;
        if !(1..=255).contains(&len) {
            return Err(Error::InvalidRingLength(len));
        }
        if block_size > ral::descriptor::CONTROL::LENGTH::mask {
            return Err(Error::InvalidBlockSize(block_size));
        }
        let region = self.mapper.map(desc_base, len * STRIDE)?;
        let ring = DescriptorRing::new(region, desc_base, len, block_size, target);
        ral::write_reg!(crate::ral::axi_dma, &layout.registers(&self.window), CURDESC, desc_base);

        self.size = block_size;
        self.session.restart(len);
        self.ring = Some(ring);
        log::debug!(
            "{} ring of {len} x {block_size} bytes at {desc_base:#010x}, target {target:#010x}",
            self.channel
        );
        Ok(())
    }

    /// Start the engine on the descriptor ring, in cyclic mode
    ///
    /// Resets the polling session: cursors go back to the first
    /// descriptor.
    pub fn run_sg(&mut self) -> Result<()> {
        let layout = self.require(Require::SCATTER_GATHER | Require::RING)?;
        let ring = self.ring.as_ref().ok_or(Error::NotInitialized)?;
        let regs = layout.registers(&self.window);

        atomic::fence(Ordering::SeqCst);
        ral::write_reg!(
            crate::ral::axi_dma,
            &regs,
            DMACR,
            RS: 1,
            CYCLIC_BD_EN: 1,
            IOC_IRQ_EN: 1,
            IRQ_THRESHOLD: ring.len() as u32
        );
        ral::write_reg!(crate::ral::axi_dma, &regs, TAILDESC, ring.tail());

        self.session.restart(ring.len());
        self.last = Block::default();
        Ok(())
    }

    /// Returns the descriptor ring
    pub fn ring(&self) -> Result<&DescriptorRing<M::Region>> {
        self.require(Require::RING)?;
        self.ring.as_ref().ok_or(Error::NotInitialized)
    }

    /// Move the ring to its `rotation`-th window of the target buffer
    ///
    /// See [`DescriptorRing::rotate`].
    pub fn inc_sg_desc_table(&mut self, rotation: usize) -> Result<()> {
        self.ring()?.rotate(rotation);
        log::debug!("{} ring rotated to window {rotation}", self.channel);
        Ok(())
    }

    /// Buffer address held by descriptor `index`
    pub fn sg_desc_buffer_address(&self, index: usize) -> Result<u32> {
        self.ring()?.buffer_address(index)
    }

    /// Read back descriptor `index`
    pub fn descriptor(&self, index: usize) -> Result<DescriptorState> {
        self.ring()?.descriptor(index)
    }

    /// Log every descriptor
    pub fn dump_sg_desc_table(&self) -> Result<()> {
        for bd in self.ring()?.descriptors() {
            log::info!("{bd}");
        }
        Ok(())
    }

    /// Log every descriptor's status word
    pub fn dump_sg_desc_all_status(&self) -> Result<()> {
        for bd in self.ring()?.descriptors() {
            log::info!("BD{}: STATUS {:x}", bd.index, bd.status);
        }
        Ok(())
    }

    /// Zero every descriptor's status word
    pub fn clear_sg_desc_all_status(&mut self) -> Result<()> {
        self.ring()?.clear_status();
        Ok(())
    }

    /// Offset of the last completed block, relative to the target address
    pub fn block_offset(&self) -> u32 {
        self.last.offset
    }

    /// Size of the last completed block
    pub fn block_size(&self) -> u32 {
        self.last.size
    }

    /// The last completed block
    pub fn last_block(&self) -> Block {
        self.last
    }

    /// What the next [`rx`](Controller::rx) resumes
    pub fn poll_state(&self) -> PollState {
        self.session.state
    }

    /// The (start, stop) descriptor cursors of the polling session
    pub fn cursors(&self) -> (usize, usize) {
        self.session.cursors()
    }

    /// Wait for received data
    ///
    /// `timeout` of `None` blocks until data is ready. Otherwise, the
    /// status is sampled at least once, and the call returns `Ok(None)`
    /// when the accumulated sleep reaches `timeout`. A later call picks up
    /// where the previous one left off.
    ///
    /// On direct-mode hardware, this waits for the whole transfer. On
    /// scatter-gather hardware, it resumes any poll in progress. Otherwise,
    /// it returns descriptors as they complete if the calibrated polling
    /// interval is at its maximum (a slow stream), and waits for the full
    /// ring if not.
    pub fn rx(&mut self, timeout: Option<Duration>) -> Result<Option<Block>> {
        if !self.is_sg()? {
            return self.direct_rx(timeout);
        }
        match self.session.state {
            PollState::BlockPending => self.block_rx(timeout),
            PollState::BufferPending => self.buffer_rx(timeout),
            PollState::Idle | PollState::DirectPending => {
                if self.calibrator.is_saturated() {
                    self.block_rx(timeout)
                } else {
                    self.buffer_rx(timeout)
                }
            }
        }
    }

    /// Wait for a direct-mode transfer to finish
    ///
    /// Returns the whole transfer, at offset 0.
    pub fn direct_rx(&mut self, timeout: Option<Duration>) -> Result<Option<Block>> {
        let layout = self.require(Require::DIRECT | Require::RECEIVE | Require::RUNNING)?;
        self.session.state = PollState::DirectPending;
        let block = Block {
            offset: 0,
            size: self.size,
        };
        self.wait(timeout, |this| {
            let regs = layout.registers(&this.window);
            if ral::read_reg!(crate::ral::axi_dma, &regs, DMASR, IDLE == 1) {
                this.session.state = PollState::Idle;
                this.last = block;
                Ok(Some(block))
            } else {
                Ok(None)
            }
        })
    }

    /// Wait for one or more descriptors to complete
    ///
    /// Returns the contiguous run of descriptors that completed since the
    /// previous block. When the engine goes idle, the rest of the ring is
    /// returned and the session ends.
    pub fn block_rx(&mut self, timeout: Option<Duration>) -> Result<Option<Block>> {
        let layout = self.require(
            Require::SCATTER_GATHER | Require::RING | Require::RECEIVE | Require::RUNNING,
        )?;
        self.session.state = PollState::BlockPending;
        self.wait(timeout, |this| this.sample_blocks(&layout))
    }

    fn sample_blocks(&mut self, layout: &Layout) -> Result<Option<Block>> {
        let ring = self.ring.as_ref().ok_or(Error::NotInitialized)?;
        let regs = layout.registers(&self.window);
        let status = Status::new(ral::read_reg!(crate::ral::axi_dma, &regs, DMASR));

        let len = ring.len();
        let ready = self.session.ready(status, len);
        log::trace!(
            "irq threshold {} ready {ready} cursors {:?}",
            status.irq_threshold(),
            self.session.cursors()
        );
        if ready == 0 {
            return Ok(None);
        }

        let range = self.session.consume(ready, len);
        let count = (range.end() - range.start() + 1) as u32;
        let block = Block {
            offset: ring.buffer_address(*range.start())?.wrapping_sub(ring.target()),
            size: ring.block_size().wrapping_mul(count),
        };
        log::trace!(
            "BDs ready from {} to {} - offset: {} size: {}",
            range.start(),
            range.end(),
            block.offset,
            block.size
        );
        self.last = block;
        Ok(Some(block))
    }

    /// Wait for a full pass over the descriptor ring
    ///
    /// Returns the whole ring, at offset 0.
    pub fn buffer_rx(&mut self, timeout: Option<Duration>) -> Result<Option<Block>> {
        let layout = self.require(
            Require::SCATTER_GATHER | Require::RING | Require::RECEIVE | Require::RUNNING,
        )?;
        let ring = self.ring.as_ref().ok_or(Error::NotInitialized)?;
        let block = Block {
            offset: 0,
            size: ring.block_size().wrapping_mul(ring.len() as u32),
        };
        self.session.state = PollState::BufferPending;
        self.wait(timeout, |this| {
            let regs = layout.registers(&this.window);
            if ral::read_reg!(crate::ral::axi_dma, &regs, DMASR, IDLE == 1) {
                this.session.state = PollState::Idle;
                this.last = block;
                Ok(Some(block))
            } else {
                Ok(None)
            }
        })
    }

    /// Sample with `probe` until it finds something, or until `timeout`
    ///
    /// Sleeps one step between samples. Blocking waits feed their sleep
    /// count back into the calibrator.
    fn wait<T>(
        &mut self,
        timeout: Option<Duration>,
        mut probe: impl FnMut(&mut Self) -> Result<Option<T>>,
    ) -> Result<Option<T>> {
        let step = self.calibrator.step(timeout);
        let mut loops: u32 = 0;
        let mut waited = Duration::ZERO;
        loop {
            if let Some(found) = probe(self)? {
                if timeout.is_none() {
                    self.calibrator.calibrate(loops);
                }
                return Ok(Some(found));
            }

            // relax CPU
            std::thread::sleep(step);
            waited += step;
            loops = loops.saturating_add(1);

            if let Some(timeout) = timeout {
                if waited >= timeout {
                    let status = self.status()?;
                    if status.has_error() {
                        log::warn!("{} poll timed out with errors: {status}", self.channel);
                    }
                    return Ok(None);
                }
            }
        }
    }
}

/// The word at `offset` lies within the engine window
fn check_window(offset: usize) -> Result<()> {
    match offset.checked_add(4) {
        Some(end) if end <= WINDOW_SIZE => Ok(()),
        _ => Err(Error::OffsetOutOfRange {
            offset,
            len: WINDOW_SIZE,
        }),
    }
}
