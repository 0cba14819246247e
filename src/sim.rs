//! Simulated device memory for tests
//!
//! A [`SimBus`] hands out [`SimRegion`]s that are plain shared word
//! arrays. Tests keep a clone of the bus to inspect what the driver wrote,
//! and script the values that the "hardware" returns on successive reads
//! of a word.

use crate::{
    mmio::{Mapper, Mmio},
    Result,
};

use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    rc::Rc,
};

#[derive(Clone, Default)]
pub(crate) struct SimBus {
    regions: Rc<RefCell<Vec<SimRegion>>>,
}

impl SimBus {
    pub(crate) fn new() -> Self {
        SimBus::default()
    }

    /// The most recent region mapped at `phys_addr`
    ///
    /// # Panics
    ///
    /// Panics if nothing was mapped at `phys_addr`.
    pub(crate) fn region(&self, phys_addr: u32) -> SimRegion {
        self.regions
            .borrow()
            .iter()
            .rev()
            .find(|region| region.0.phys_addr == phys_addr)
            .cloned()
            .unwrap_or_else(|| panic!("nothing mapped at {phys_addr:#010x}"))
    }

    /// Number of mappings made so far
    pub(crate) fn mappings(&self) -> usize {
        self.regions.borrow().len()
    }
}

impl Mapper for SimBus {
    type Region = SimRegion;
    fn map(&self, phys_addr: u32, len: usize) -> Result<SimRegion> {
        let region = SimRegion(Rc::new(SimMemory {
            phys_addr,
            words: RefCell::new(vec![0; (len + 3) / 4]),
            scripts: RefCell::default(),
            reads: RefCell::default(),
            writes: RefCell::default(),
        }));
        self.regions.borrow_mut().push(region.clone());
        Ok(region)
    }
}

struct SimMemory {
    phys_addr: u32,
    words: RefCell<Vec<u32>>,
    scripts: RefCell<HashMap<usize, VecDeque<u32>>>,
    reads: RefCell<HashMap<usize, usize>>,
    writes: RefCell<Vec<(usize, u32)>>,
}

#[derive(Clone)]
pub(crate) struct SimRegion(Rc<SimMemory>);

impl SimRegion {
    /// Store a word without recording a write
    pub(crate) fn set(&self, offset: usize, value: u32) {
        self.0.words.borrow_mut()[offset >> 2] = value;
    }

    /// Load a word without recording a read or consuming a script
    pub(crate) fn get(&self, offset: usize) -> u32 {
        self.0.words.borrow()[offset >> 2]
    }

    /// Queue values returned by the next reads of `offset`
    ///
    /// Each read pops one value and leaves it in memory, so the last value
    /// sticks once the script runs out.
    pub(crate) fn script(&self, offset: usize, values: impl IntoIterator<Item = u32>) {
        self.0
            .scripts
            .borrow_mut()
            .entry(offset >> 2)
            .or_default()
            .extend(values);
    }

    /// Number of reads of `offset`
    pub(crate) fn reads(&self, offset: usize) -> usize {
        self.0
            .reads
            .borrow()
            .get(&(offset >> 2))
            .copied()
            .unwrap_or(0)
    }

    /// Values written to `offset`, oldest first
    pub(crate) fn writes(&self, offset: usize) -> Vec<u32> {
        self.0
            .writes
            .borrow()
            .iter()
            .filter(|(word, _)| *word == offset >> 2)
            .map(|(_, value)| *value)
            .collect()
    }

    /// Number of words in the region
    pub(crate) fn words(&self) -> usize {
        self.0.words.borrow().len()
    }
}

impl Mmio for SimRegion {
    fn read(&self, offset: usize) -> u32 {
        let word = offset >> 2;
        *self.0.reads.borrow_mut().entry(word).or_default() += 1;
        let scripted = self
            .0
            .scripts
            .borrow_mut()
            .get_mut(&word)
            .and_then(VecDeque::pop_front);
        if let Some(value) = scripted {
            self.0.words.borrow_mut()[word] = value;
        }
        self.0.words.borrow()[word]
    }
    fn write(&self, offset: usize, value: u32) {
        let word = offset >> 2;
        self.0.words.borrow_mut()[word] = value;
        self.0.writes.borrow_mut().push((word, value));
    }
}
