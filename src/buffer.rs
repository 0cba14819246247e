//! udmabuf DMA buffers
//!
//! [udmabuf](https://github.com/ikwzm/udmabuf) allocates physically
//! contiguous memory in the kernel and exports it as `/dev/<name>`, with
//! its attributes under `/sys/class/u-dma-buf/<name>` (or
//! `/sys/class/udmabuf/<name>` on older versions). A [`UdmaBuffer`] maps
//! the device and provides the physical address to program into the
//! engine.

use crate::{mmio::MappedRegion, Error, Result};

use std::{
    fs::{self, File, OpenOptions},
    os::unix::fs::OpenOptionsExt,
    path::{Path, PathBuf},
};

/// Where to find udmabuf devices and their attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferPaths {
    /// sysfs class directories, searched in order
    pub classes: Vec<PathBuf>,
    /// Directory of the device nodes
    pub dev: PathBuf,
}

impl Default for BufferPaths {
    fn default() -> Self {
        BufferPaths {
            classes: vec![
                PathBuf::from("/sys/class/u-dma-buf"),
                PathBuf::from("/sys/class/udmabuf"),
            ],
            dev: PathBuf::from("/dev"),
        }
    }
}

/// Direction of a manual cache sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SyncDirection {
    /// Both directions
    Bidirectional = 0,
    /// CPU to device, for MM2S transfers
    ToDevice = 1,
    /// Device to CPU, for S2MM transfers
    FromDevice = 2,
}

/// Who may access the sync area next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// The CPU reads or writes the area
    Cpu,
    /// The DMA engine reads or writes the area
    Device,
}

/// CPU cache strategy for the buffer
///
/// The first four modes depend on whether the device was opened with
/// `O_SYNC` (cache off in [`UdmaBuffer::open`]). Without `O_SYNC`, they
/// all leave the cache enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SyncMode {
    /// Cache enabled
    Cached = 0,
    /// With `O_SYNC`, cache disabled
    #[default]
    SyncNoncached = 1,
    /// With `O_SYNC`, cache disabled and writes combined
    SyncWriteCombine = 2,
    /// With `O_SYNC`, DMA coherency mode
    SyncDmaCoherent = 3,
    /// Cache enabled
    AlwaysCached = 4,
    /// Cache disabled
    AlwaysNoncached = 5,
    /// Writes combined
    AlwaysWriteCombine = 6,
    /// DMA coherency mode
    AlwaysDmaCoherent = 7,
}

/// A mapped udmabuf buffer
///
/// The mapping is released when the buffer drops.
pub struct UdmaBuffer {
    name: String,
    class: PathBuf,
    phys_addr: u32,
    region: MappedRegion,
    sync_mode: SyncMode,
    _file: File,
}

impl UdmaBuffer {
    /// Open and map the udmabuf device `name`, such as `udmabuf0`
    ///
    /// `cache_on` false opens the device with `O_SYNC`, which disables the
    /// CPU cache in the default sync mode.
    pub fn open(name: &str, cache_on: bool) -> Result<Self> {
        UdmaBuffer::open_in(&BufferPaths::default(), name, cache_on)
    }

    /// Like [`open`](UdmaBuffer::open), looking for the device in `paths`
    ///
    /// The first class directory that holds `name` wins. With the default
    /// paths, `/sys/class/u-dma-buf` is preferred over the older
    /// `/sys/class/udmabuf` when both have the buffer.
    pub fn open_in(paths: &BufferPaths, name: &str, cache_on: bool) -> Result<Self> {
        let class = paths
            .classes
            .iter()
            .map(|dir| dir.join(name))
            .find(|dir| dir.is_dir())
            .ok_or_else(|| Error::BufferNotFound(name.into()))?;

        let phys_addr = read_attribute(&class, "phys_addr")?;
        let phys_addr = u32::from_str_radix(strip_hex_prefix(&phys_addr), 16)?;
        let size: usize = read_attribute(&class, "size")?.parse()?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(if cache_on { 0 } else { libc::O_SYNC })
            .open(paths.dev.join(name))?;
        let region = MappedRegion::new(&file, 0, size)?;
        log::debug!("mapped {name}: {size:#x} bytes at {phys_addr:#010x}");

        Ok(UdmaBuffer {
            name: name.into(),
            class,
            phys_addr,
            region,
            sync_mode: SyncMode::default(),
            _file: file,
        })
    }

    /// Device name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Physical address of the buffer, for the engine
    pub fn phys_addr(&self) -> u32 {
        self.phys_addr
    }

    /// Buffer size in bytes
    pub fn size(&self) -> usize {
        self.region.len()
    }

    /// The buffer contents
    ///
    /// The engine may write the buffer while the slice is alive. Only read
    /// the ranges that a poll reported complete.
    pub fn as_slice(&self) -> &[u8] {
        // Safety: the mapping covers size() bytes and lives as long as self.
        unsafe { core::slice::from_raw_parts(self.region.as_ptr(), self.region.len()) }
    }

    /// The buffer contents, for writing
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // Safety: as above, and &mut self makes this the only slice.
        unsafe { core::slice::from_raw_parts_mut(self.region.as_ptr(), self.region.len()) }
    }

    /// Select the area and direction of the next manual cache sync
    pub fn set_sync_area(&self, offset: u32, size: u32, direction: SyncDirection) -> Result<()> {
        self.write_attribute("sync_offset", offset)?;
        self.write_attribute("sync_size", size)?;
        self.write_attribute("sync_direction", direction as u8)
    }

    /// Hand the sync area to the CPU or to the device
    ///
    /// This flushes or invalidates the CPU cache for the area, per the
    /// direction given to [`set_sync_area`](UdmaBuffer::set_sync_area).
    pub fn set_buffer_owner(&self, owner: Owner) -> Result<()> {
        let attribute = match owner {
            Owner::Cpu => "sync_for_cpu",
            Owner::Device => "sync_for_device",
        };
        self.write_attribute(attribute, 1)
    }

    /// Select the CPU cache strategy
    pub fn set_sync_mode(&mut self, mode: SyncMode) -> Result<()> {
        self.write_attribute("sync_mode", mode as u8)?;
        self.sync_mode = mode;
        Ok(())
    }

    /// The last sync mode set through this handle
    pub fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }

    /// Unmap and close the device
    pub fn close(self) {
        log::debug!("closing {}", self.name);
    }

    fn write_attribute(&self, attribute: &str, value: impl ToString) -> Result<()> {
        fs::write(self.class.join(attribute), value.to_string())?;
        Ok(())
    }
}

fn read_attribute(class: &Path, attribute: &str) -> Result<String> {
    let contents = fs::read_to_string(class.join(attribute))?;
    Ok(contents.lines().next().unwrap_or_default().trim().to_owned())
}

fn strip_hex_prefix(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A fake sysfs class and device directory
    struct Fixture {
        root: PathBuf,
        paths: BufferPaths,
    }

    impl Fixture {
        fn new() -> Self {
            static NEXT: AtomicUsize = AtomicUsize::new(0);
            let root = std::env::temp_dir().join(format!(
                "axi-dma-{}-{}",
                std::process::id(),
                NEXT.fetch_add(1, Ordering::Relaxed)
            ));
            let paths = BufferPaths {
                classes: vec![root.join("u-dma-buf"), root.join("udmabuf")],
                dev: root.join("dev"),
            };
            fs::create_dir_all(&paths.dev).unwrap();
            Fixture { root, paths }
        }

        /// Register `name` under the `class`-th class directory
        fn add(&self, class: usize, name: &str, phys_addr: &str, size: u64) -> PathBuf {
            let dir = self.paths.classes[class].join(name);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("phys_addr"), phys_addr).unwrap();
            fs::write(dir.join("size"), format!("{size}\n")).unwrap();
            File::create(self.paths.dev.join(name))
                .unwrap()
                .set_len(size)
                .unwrap();
            dir
        }

        fn attribute(dir: &Path, attribute: &str) -> String {
            fs::read_to_string(dir.join(attribute)).unwrap()
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.root);
        }
    }

    #[test]
    fn opens_and_maps() {
        let fixture = Fixture::new();
        fixture.add(1, "udmabuf0", "0x18000000\n", 8192);

        let mut buffer = UdmaBuffer::open_in(&fixture.paths, "udmabuf0", true).unwrap();
        assert_eq!(buffer.name(), "udmabuf0");
        assert_eq!(buffer.phys_addr(), 0x1800_0000);
        assert_eq!(buffer.size(), 8192);
        assert!(buffer.as_slice().iter().all(|&byte| byte == 0));

        buffer.as_mut_slice()[4096..4100].copy_from_slice(b"axis");
        assert_eq!(&buffer.as_slice()[4096..4100], b"axis");
        buffer.close();

        let contents = fs::read(fixture.paths.dev.join("udmabuf0")).unwrap();
        assert_eq!(&contents[4096..4100], b"axis");
    }

    #[test]
    fn prefers_the_first_class_directory() {
        let fixture = Fixture::new();
        fixture.add(1, "udmabuf0", "18000000", 4096);
        fixture.add(0, "udmabuf0", "1c000000", 4096);

        let buffer = UdmaBuffer::open_in(&fixture.paths, "udmabuf0", false).unwrap();
        assert_eq!(buffer.phys_addr(), 0x1C00_0000);
    }

    #[test]
    fn missing_buffer() {
        let fixture = Fixture::new();
        assert!(matches!(
            UdmaBuffer::open_in(&fixture.paths, "udmabuf3", false),
            Err(Error::BufferNotFound(name)) if name == "udmabuf3"
        ));
    }

    #[test]
    fn malformed_attribute() {
        let fixture = Fixture::new();
        fixture.add(0, "udmabuf0", "nope", 4096);
        assert!(matches!(
            UdmaBuffer::open_in(&fixture.paths, "udmabuf0", false),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn missing_device_node() {
        let fixture = Fixture::new();
        fixture.add(0, "udmabuf0", "18000000", 4096);
        fs::remove_file(fixture.paths.dev.join("udmabuf0")).unwrap();
        assert!(matches!(
            UdmaBuffer::open_in(&fixture.paths, "udmabuf0", false),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn sync_controls_write_attributes() {
        let fixture = Fixture::new();
        let dir = fixture.add(0, "udmabuf1", "0x20000000", 4096);
        let mut buffer = UdmaBuffer::open_in(&fixture.paths, "udmabuf1", false).unwrap();

        buffer
            .set_sync_area(1024, 2048, SyncDirection::FromDevice)
            .unwrap();
        assert_eq!(Fixture::attribute(&dir, "sync_offset"), "1024");
        assert_eq!(Fixture::attribute(&dir, "sync_size"), "2048");
        assert_eq!(Fixture::attribute(&dir, "sync_direction"), "2");

        buffer.set_buffer_owner(Owner::Device).unwrap();
        assert_eq!(Fixture::attribute(&dir, "sync_for_device"), "1");
        assert!(!dir.join("sync_for_cpu").exists());
        buffer.set_buffer_owner(Owner::Cpu).unwrap();
        assert_eq!(Fixture::attribute(&dir, "sync_for_cpu"), "1");

        assert_eq!(buffer.sync_mode(), SyncMode::SyncNoncached);
        buffer.set_sync_mode(SyncMode::AlwaysDmaCoherent).unwrap();
        assert_eq!(Fixture::attribute(&dir, "sync_mode"), "7");
        assert_eq!(buffer.sync_mode(), SyncMode::AlwaysDmaCoherent);
    }
}
