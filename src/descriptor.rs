//! Scatter-gather descriptor ring

use crate::{
    mmio::{Mmio, Register},
    ral::{
        self,
        descriptor::{offsets, STRIDE},
    },
    Error, Result,
};

use core::fmt::{self, Display};

/// A ring of block descriptors in mapped memory
///
/// Descriptor `i` lives at `base + 0x40 * i` and points at the next one.
/// The last descriptor's next pointer is zero; the engine finds its way
/// back to the start through the tail pointer and cyclic mode.
pub struct DescriptorRing<R> {
    region: R,
    base: u32,
    len: usize,
    block_size: u32,
    target: u32,
}

/// A descriptor's words, as read back from memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorState {
    /// Index in the ring
    pub index: usize,
    /// Physical address of the descriptor
    pub address: u32,
    /// Next descriptor pointer
    pub next: u32,
    /// Buffer address
    pub buffer_address: u32,
    /// Control word
    pub control: u32,
    /// Status word
    pub status: u32,
}

impl DescriptorState {
    /// The engine marked this descriptor complete
    pub fn is_complete(&self) -> bool {
        self.status & ral::descriptor::STATUS::CMPLT::mask != 0
    }
    /// Bytes the engine transferred for this descriptor
    pub fn transferred(&self) -> u32 {
        use crate::ral::descriptor::STATUS::TRANSFERRED;
        (self.status & TRANSFERRED::mask) >> TRANSFERRED::offset
    }
}

impl Display for DescriptorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BD{}: addr {:x} NXTDESC {:x}, BUFFER_ADDRESS {:x}, CONTROL {:x}, STATUS {:x}",
            self.index, self.address, self.next, self.buffer_address, self.control, self.status
        )
    }
}

/// One descriptor's words, ready for the RAL macros
#[allow(non_snake_case)] // Compatibility with RAL
struct Words<'a, R: ?Sized> {
    NXTDESC: Register<'a, R>,
    BUFFER_ADDRESS: Register<'a, R>,
    CONTROL: Register<'a, R>,
    STATUS: Register<'a, R>,
}

impl<R: Mmio> DescriptorRing<R> {
    /// Build a ring of `len` descriptors in `region`
    ///
    /// The region is zeroed, then every descriptor is linked to the next
    /// and given its own `block_size` slice of the target buffer.
    pub(crate) fn new(region: R, base: u32, len: usize, block_size: u32, target: u32) -> Self {
        for word in (0..len * STRIDE).step_by(4) {
            region.write(word, 0);
        }
        let ring = DescriptorRing {
            region,
            base,
            len,
            block_size,
            target,
        };
        for index in 0..len {
            let bd = ring.words(index);
            let next = if index + 1 < len {
                ring.address_of(index + 1)
            } else {
                0
            };
            ral::write_reg!(crate::ral::descriptor, &bd, NXTDESC, next);
            ral::write_reg!(crate::ral::descriptor, &bd, BUFFER_ADDRESS, ring.slice_address(index));
            ral::write_reg!(crate::ral::descriptor, &bd, CONTROL, LENGTH: block_size);
        }
        ring
    }

    fn words(&self, index: usize) -> Words<'_, R> {
        let at = index * STRIDE;
        Words {
            NXTDESC: Register::new(&self.region, at + offsets::NXTDESC),
            BUFFER_ADDRESS: Register::new(&self.region, at + offsets::BUFFER_ADDRESS),
            CONTROL: Register::new(&self.region, at + offsets::CONTROL),
            STATUS: Register::new(&self.region, at + offsets::STATUS),
        }
    }

    fn check(&self, index: usize) -> Result<()> {
        if index < self.len {
            Ok(())
        } else {
            Err(Error::IndexOutOfRange {
                index,
                len: self.len,
            })
        }
    }

    /// Target address of descriptor `index`'s slice, in rotation 0
    fn slice_address(&self, index: usize) -> u32 {
        self.target
            .wrapping_add(self.block_size.wrapping_mul(index as u32))
    }

    /// Physical address of descriptor `index`
    fn address_of(&self, index: usize) -> u32 {
        self.base.wrapping_add((STRIDE * index) as u32)
    }

    /// Number of descriptors
    pub fn len(&self) -> usize {
        self.len
    }

    /// The ring has no descriptors
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Physical address of the first descriptor
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Physical address of the last descriptor
    pub fn tail(&self) -> u32 {
        self.address_of(self.len - 1)
    }

    /// Transfer target address that descriptor 0 started from
    pub fn target(&self) -> u32 {
        self.target
    }

    /// Bytes per descriptor
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Buffer address currently held by descriptor `index`
    pub fn buffer_address(&self, index: usize) -> Result<u32> {
        self.check(index)?;
        Ok(ral::read_reg!(crate::ral::descriptor, &self.words(index), BUFFER_ADDRESS))
    }

    /// Point the ring at its `rotation`-th window of a larger buffer
    ///
    /// Descriptor `i` moves to `target + block_size * (len * rotation + i)`.
    /// Next pointers and lengths are untouched.
    pub fn rotate(&self, rotation: usize) {
        let span = self.len * rotation;
        for index in 0..self.len {
            let address = self
                .target
                .wrapping_add(self.block_size.wrapping_mul((span + index) as u32));
            ral::write_reg!(crate::ral::descriptor, &self.words(index), BUFFER_ADDRESS, address);
        }
    }

    /// Read back descriptor `index`
    pub fn descriptor(&self, index: usize) -> Result<DescriptorState> {
        self.check(index)?;
        let bd = self.words(index);
        Ok(DescriptorState {
            index,
            address: self.address_of(index),
            next: ral::read_reg!(crate::ral::descriptor, &bd, NXTDESC),
            buffer_address: ral::read_reg!(crate::ral::descriptor, &bd, BUFFER_ADDRESS),
            control: ral::read_reg!(crate::ral::descriptor, &bd, CONTROL),
            status: ral::read_reg!(crate::ral::descriptor, &bd, STATUS),
        })
    }

    /// Read back every descriptor, in ring order
    pub fn descriptors(&self) -> impl Iterator<Item = DescriptorState> + '_ {
        (0..self.len).flat_map(move |index| self.descriptor(index).ok())
    }

    /// Status word of descriptor `index`
    pub fn status(&self, index: usize) -> Result<u32> {
        self.check(index)?;
        Ok(ral::read_reg!(crate::ral::descriptor, &self.words(index), STATUS))
    }

    /// Zero every descriptor's status word
    ///
    /// Only needed when the ring does not run in cyclic mode, where the
    /// engine ignores the completed bit.
    pub fn clear_status(&self) {
        for index in 0..self.len {
            ral::write_reg!(crate::ral::descriptor, &self.words(index), STATUS, 0);
        }
    }
}
