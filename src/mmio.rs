//! Memory-mapped register access
//!
//! The driver talks to hardware through two traits. A [`Mapper`] turns a
//! physical address range into a mapped region, and the region exposes
//! word reads and writes through [`Mmio`]. [`DevMem`] is the Linux
//! implementation, backed by `/dev/mem`.

use crate::Result;
use ral_registers::RWRegister;

use std::{
    fs::{File, OpenOptions},
    io,
    os::unix::{fs::OpenOptionsExt, io::AsRawFd},
    ptr::NonNull,
};

/// Word access to a mapped device region
///
/// Offsets are in bytes and address the 32-bit word at `offset >> 2`.
/// Implementations must not cache, merge, elide or reorder accesses. The
/// device may change any word between two reads.
pub trait Mmio {
    /// Read the word at `offset`
    fn read(&self, offset: usize) -> u32;
    /// Write `value` to the word at `offset`
    fn write(&self, offset: usize, value: u32);
}

/// Maps physical address ranges into this process
pub trait Mapper {
    /// The mapped region type
    type Region: Mmio;
    /// Map `len` bytes starting at physical address `phys_addr`
    fn map(&self, phys_addr: u32, len: usize) -> Result<Self::Region>;
}

/// One register inside a mapped region
///
/// `Register` has the `read()` / `write()` shape of a RAL register, so it
/// works with the [`ral`](crate::ral) macros.
pub struct Register<'a, M: ?Sized> {
    window: &'a M,
    offset: usize,
}

impl<'a, M: Mmio + ?Sized> Register<'a, M> {
    pub(crate) const fn new(window: &'a M, offset: usize) -> Self {
        Register { window, offset }
    }
    /// Read the register
    #[inline]
    pub fn read(&self) -> u32 {
        self.window.read(self.offset)
    }
    /// Write the register
    #[inline]
    pub fn write(&self, value: u32) {
        self.window.write(self.offset, value)
    }
}

/// Physical memory, as seen through `/dev/mem`
pub struct DevMem {
    file: File,
}

impl DevMem {
    /// Open `/dev/mem` for synchronous, uncached access
    pub fn open() -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open("/dev/mem")?;
        Ok(DevMem { file })
    }
}

impl Mapper for DevMem {
    type Region = MappedRegion;
    fn map(&self, phys_addr: u32, len: usize) -> Result<MappedRegion> {
        let region = MappedRegion::new(&self.file, u64::from(phys_addr), len)?;
        log::debug!("mapped {len:#x} bytes of /dev/mem at {phys_addr:#010x}");
        Ok(region)
    }
}

/// A shared mapping of a device file
///
/// The mapping is released when the region drops. Accesses go through
/// volatile RAL registers.
pub struct MappedRegion {
    /// Page-aligned start of the mapping
    mapping: NonNull<libc::c_void>,
    /// Length of the mapping
    mapping_len: usize,
    /// First word of the requested range
    data: NonNull<u32>,
    /// Length of the requested range
    len: usize,
}

impl MappedRegion {
    /// Map `len` bytes of `file`, starting at byte `offset`
    ///
    /// `offset` does not need to be page aligned.
    pub(crate) fn new(file: &File, offset: u64, len: usize) -> io::Result<Self> {
        // Safety: sysconf has no memory-safety preconditions.
        let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as u64;
        let aligned = offset & !(page - 1);
        let delta = (offset - aligned) as usize;
        let mapping_len = len + delta;

        // Safety: a fresh shared mapping. The kernel picks the address, so
        // no existing memory is replaced.
        let mapping = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                mapping_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                aligned as libc::off_t,
            )
        };
        if mapping == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let mapping = NonNull::new(mapping).ok_or_else(io::Error::last_os_error)?;
        // Safety: delta is less than a page, and the mapping covers it.
        let data = unsafe { NonNull::new_unchecked(mapping.as_ptr().cast::<u8>().add(delta).cast()) };
        Ok(MappedRegion {
            mapping,
            mapping_len,
            data,
            len,
        })
    }

    /// Length of the mapped range in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// The mapped range is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Pointer to the first byte of the mapped range
    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.data.as_ptr().cast()
    }

    /// # Panics
    ///
    /// Panics if the word at `offset` is outside the mapped range.
    fn word(&self, offset: usize) -> &RWRegister<u32> {
        assert!(
            offset.checked_add(4).is_some_and(|end| end <= self.len),
            "offset {offset:#x} is outside a mapping of {:#x} bytes",
            self.len
        );
        // Safety: in bounds of the mapping, which lives as long as self.
        // RWRegister<u32> is a transparent u32 cell.
        unsafe { &*self.data.as_ptr().add(offset >> 2).cast::<RWRegister<u32>>() }
    }
}

impl Mmio for MappedRegion {
    #[inline]
    fn read(&self, offset: usize) -> u32 {
        self.word(offset).read()
    }
    #[inline]
    fn write(&self, offset: usize, value: u32) {
        self.word(offset).write(value)
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // Safety: unmapping exactly the range returned by mmap.
        unsafe { libc::munmap(self.mapping.as_ptr(), self.mapping_len) };
    }
}

// It's OK to send a mapping across threads. It's not Sync, so
// accesses stay serialized by whoever owns it.
unsafe impl Send for MappedRegion {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ral::axi_dma::WINDOW_SIZE;
    use std::{
        io::Read,
        sync::atomic::{AtomicUsize, Ordering},
    };

    /// A sized scratch file, removed on drop
    struct Scratch(std::path::PathBuf);

    impl Drop for Scratch {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    fn scratch_file(len: u64) -> (Scratch, File) {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        let path = std::env::temp_dir().join(format!(
            "axi-dma-mmio-{}-{}",
            std::process::id(),
            NEXT.fetch_add(1, Ordering::Relaxed)
        ));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .unwrap();
        file.set_len(len).unwrap();
        (Scratch(path), file)
    }

    #[test]
    fn last_word_of_the_engine_window() {
        let (scratch, file) = scratch_file(WINDOW_SIZE as u64);
        let region = MappedRegion::new(&file, 0, WINDOW_SIZE).unwrap();
        assert_eq!(region.len(), WINDOW_SIZE);

        region.write(0xFFFC, 0xA5A5_0001);
        assert_eq!(region.read(0xFFFC), 0xA5A5_0001);
        drop(region);

        let mut contents = Vec::new();
        File::open(&scratch.0)
            .unwrap()
            .read_to_end(&mut contents)
            .unwrap();
        assert_eq!(&contents[0xFFFC..], &0xA5A5_0001u32.to_ne_bytes());
    }

    #[test]
    #[should_panic(expected = "outside a mapping")]
    fn word_past_the_end_panics() {
        let (_guard, file) = scratch_file(0x1000);
        let region = MappedRegion::new(&file, 0, 0x1000).unwrap();
        region.read(usize::MAX - 1);
    }
}
