//! Synthetic fixtures for this crate's scan/narrow tests, playing the
//! same role `synth-elf` plays for minidump tests: build a plausible
//! target image in memory instead of needing a real attached process.
//!
//! Gated behind `feature = "testutil"` so dependents can reuse these
//! fixtures in their own tests without pulling them into release builds.

use crate::reader::{BlockRead, ReaderHandle, WordPeek};
use crate::region::{CowKind, Perms, Region, RegionSet};
use crate::Result;

/// A fake target's memory: one contiguous byte image starting at `base`.
/// Reads outside the image return a short/empty read, the same as a real
/// region boundary.
pub struct SyntheticTarget {
    base: u64,
    bytes: std::cell::RefCell<Vec<u8>>,
}

impl SyntheticTarget {
    pub fn new(base: u64, bytes: Vec<u8>) -> Self {
        Self {
            base,
            bytes: std::cell::RefCell::new(bytes),
        }
    }

    pub fn end(&self) -> u64 {
        self.base + self.bytes.borrow().len() as u64
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    /// Overwrites the bytes at `addr` with `value`, simulating the target
    /// mutating between scan/narrow passes.
    pub fn poke(&self, addr: u64, value: &[u8]) {
        let offset = (addr - self.base) as usize;
        self.bytes.borrow_mut()[offset..offset + value.len()].copy_from_slice(value);
    }

    pub fn handle(&self) -> ReaderHandle<'_> {
        ReaderHandle::WordPeek(self)
    }

    pub fn handle_positional(&self) -> ReaderHandle<'_> {
        ReaderHandle::Positional(self)
    }

    /// Builds a single-region `RegionSet` covering this target's full
    /// image, readable and writable.
    pub fn region_set(&self) -> RegionSet {
        let region = Region {
            id: 1,
            start: self.base,
            end: self.end(),
            perms: Perms::READ | Perms::WRITE,
            cow: CowKind::Private,
            offset: 0,
            dev_major: 0,
            dev_minor: 0,
            inode: 0,
            pathname: String::new(),
        };
        RegionSet::from_regions(vec![region], 0x1000)
    }
}

impl BlockRead for SyntheticTarget {
    fn read_at(&self, addr: u64, buf: &mut [u8]) -> Result<usize> {
        let bytes = self.bytes.borrow();
        if addr < self.base || addr >= self.base + bytes.len() as u64 {
            return Ok(0);
        }
        let offset = (addr - self.base) as usize;
        let n = buf.len().min(bytes.len() - offset);
        buf[..n].copy_from_slice(&bytes[offset..offset + n]);
        Ok(n)
    }
}

impl WordPeek for SyntheticTarget {
    fn peek_word(&self, addr: u64) -> Result<u64> {
        let bytes = self.bytes.borrow();
        let mut word = [0u8; 8];
        if addr >= self.base && addr < self.base + bytes.len() as u64 {
            let offset = (addr - self.base) as usize;
            let avail = (bytes.len() - offset).min(8);
            word[..avail].copy_from_slice(&bytes[offset..offset + avail]);
        }
        Ok(u64::from_ne_bytes(word))
    }
}

/// Renders a synthetic `/proc/<pid>/maps` line the way the kernel does.
pub fn maps_line(start: u64, end: u64, perms: &str, pathname: &str) -> String {
    format!(
        "{:x}-{:x} {} 00000000 00:00 0{}{}",
        start,
        end,
        perms,
        if pathname.is_empty() { "" } else { "                    " },
        pathname
    )
}
