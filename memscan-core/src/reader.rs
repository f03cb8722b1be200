//! Memory readers: the two providers the scan/narrow engine can pull raw
//! bytes from, modeled as capability traits rather than a vtable of
//! single-use functions (one object per provider per pass is enough).

use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::io;
use std::os::unix::fs::FileExt;

/// A positional byte source: `/proc/<pid>/mem` in production, a plain
/// buffer in tests.
pub trait BlockRead {
    /// Reads up to `buf.len()` bytes at `addr`, returning the count
    /// actually read (a short read at the tail of a region is not an
    /// error).
    fn read_at(&self, addr: u64, buf: &mut [u8]) -> Result<usize>;
}

/// A single-native-word source: a debugger peek in production, a fake
/// memory image in tests. Never returns a short read; the caller tracks
/// region bounds itself.
pub trait WordPeek {
    fn peek_word(&self, addr: u64) -> Result<u64>;
}

/// `/proc/<pid>/mem` opened for positional reads.
pub struct ProcMem {
    file: std::fs::File,
    pid: u32,
}

impl ProcMem {
    /// Succeeds only if the pseudo-file is both present and openable under
    /// our credentials; callers fall back to `WordPeek` otherwise.
    pub fn open(pid: u32) -> io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .open(format!("/proc/{}/mem", pid))?;
        Ok(Self { file, pid })
    }
}

impl BlockRead for ProcMem {
    fn read_at(&self, addr: u64, buf: &mut [u8]) -> Result<usize> {
        match self.file.read_at(buf, addr) {
            Ok(n) => Ok(n),
            Err(e) if e.raw_os_error() == Some(libc::ESRCH) => {
                Err(Error::TargetGone { pid: self.pid })
            }
            // A read entirely past the mapped range (can happen at a
            // region's very last byte on some kernels) looks like EIO; the
            // caller only ever asks within `[region.start, region.end)`,
            // so treat it as an empty read rather than a hard failure.
            Err(e) if e.raw_os_error() == Some(libc::EIO) => Ok(0),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// A debugger peek of one native word (`PTRACE_PEEKDATA`) at `pid`.
pub struct DebuggerPeek {
    pid: libc::pid_t,
}

impl DebuggerPeek {
    pub fn new(pid: u32) -> Self {
        Self {
            pid: pid as libc::pid_t,
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
impl WordPeek for DebuggerPeek {
    fn peek_word(&self, addr: u64) -> Result<u64> {
        use nix::sys::ptrace;
        use nix::unistd::Pid;
        ptrace::read(Pid::from_raw(self.pid), addr as ptrace::AddressType)
            .map(|w| w as u64)
            .map_err(|e| {
                if e == nix::errno::Errno::ESRCH {
                    Error::TargetGone {
                        pid: self.pid as u32,
                    }
                } else {
                    Error::Io(io::Error::from_raw_os_error(e as i32))
                }
            })
    }
}

/// Which provider owns a pass. Chosen once per pass and held for its
/// duration; outlives a single region.
pub enum Provider {
    Positional(ProcMem),
    WordPeek(DebuggerPeek),
}

/// Caller override for provider selection. `Auto` is the spec's default
/// policy (§4.3: prefer the pseudo-file, fall back to the debugger peek);
/// `ForcePositional`/`ForceWordPeek` pin the pass to one provider, for
/// callers that know their target's `/proc` is unreliable (containers with
/// a restricted `/proc/<pid>/mem`) or want to exercise the word-peek path
/// deliberately. A forced provider that cannot be opened is an error, not
/// a silent substitution of the other provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ReaderPreference {
    #[default]
    Auto,
    ForcePositional,
    ForceWordPeek,
}

/// Maps a failure to open `/proc/<pid>/mem` to the engine's error type.
fn proc_mem_open_error(pid: u32, e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::PermissionDenied {
        Error::PermissionDenied { pid }
    } else {
        Error::Io(e)
    }
}

impl Provider {
    /// Prefers the pseudo-file; falls back to the debugger peek when it
    /// cannot be opened.
    pub fn select(pid: u32) -> Result<Self> {
        Self::select_with_preference(pid, ReaderPreference::Auto)
    }

    pub fn select_with_preference(pid: u32, preference: ReaderPreference) -> Result<Self> {
        match preference {
            ReaderPreference::ForceWordPeek => Ok(Provider::WordPeek(DebuggerPeek::new(pid))),
            ReaderPreference::ForcePositional => {
                ProcMem::open(pid)
                    .map(Provider::Positional)
                    .map_err(|e| proc_mem_open_error(pid, e))
            }
            ReaderPreference::Auto => match ProcMem::open(pid) {
                Ok(mem) => Ok(Provider::Positional(mem)),
                Err(_) => Ok(Provider::WordPeek(DebuggerPeek::new(pid))),
            },
        }
    }

    pub fn handle(&self) -> ReaderHandle<'_> {
        match self {
            Provider::Positional(mem) => ReaderHandle::Positional(mem),
            Provider::WordPeek(peek) => ReaderHandle::WordPeek(peek),
        }
    }
}

/// A borrowed reference to whichever provider backs a pass; this is the
/// shape both `RegionScanner` (streaming) and `read_window_at`
/// (random-access, for the narrow engine) operate against, and the shape
/// tests inject fakes through.
pub enum ReaderHandle<'a> {
    Positional(&'a dyn BlockRead),
    WordPeek(&'a dyn WordPeek),
}

const WORD_SIZE: usize = std::mem::size_of::<u64>();

/// Builds an up-to-8-byte window at an arbitrary (possibly unaligned)
/// address from one or two native-word peeks, mirroring
/// `ptrace_dumper::copy_from_process`'s word-at-a-time copy loop.
fn read_window_via_words(
    peek: &dyn WordPeek,
    addr: u64,
    want: usize,
) -> Result<([u8; 8], usize)> {
    let mut out = [0u8; 8];
    let mut copied = 0usize;
    while copied < want {
        let word_addr = addr + copied as u64;
        let aligned = word_addr - word_addr % WORD_SIZE as u64;
        let word = peek.peek_word(aligned)?;
        let word_bytes = word.to_ne_bytes();
        let offset_in_word = (word_addr - aligned) as usize;
        let take = (WORD_SIZE - offset_in_word).min(want - copied);
        out[copied..copied + take]
            .copy_from_slice(&word_bytes[offset_in_word..offset_in_word + take]);
        copied += take;
    }
    Ok((out, copied))
}

/// Reads up to 8 bytes at an arbitrary address (used by the narrow
/// engine, which re-reads individually addressed candidates rather than
/// streaming a region).
pub fn read_window_at(handle: &ReaderHandle<'_>, addr: u64, region_end: u64) -> Result<([u8; 8], usize)> {
    let want = region_end.saturating_sub(addr).min(8) as usize;
    if want == 0 {
        return Ok(([0u8; 8], 0));
    }
    match handle {
        ReaderHandle::Positional(mem) => {
            let mut buf = [0u8; 8];
            let n = mem.read_at(addr, &mut buf[..want])?;
            Ok((buf, n))
        }
        ReaderHandle::WordPeek(peek) => read_window_via_words(*peek, addr, want),
    }
}

/// A pull iterator over successive windows of a single region: the scan
/// engine's `(next_window) -> (address, bytes, n)` state object (see
/// design notes on coroutines/iterators). Aligned mode steps by
/// `WORD_SIZE`; unaligned mode steps by one byte.
pub struct RegionScanner<'a> {
    handle: ReaderHandle<'a>,
    cursor: u64,
    region_end: u64,
    step: u64,
    // Sliding cache of peeked bytes for the word-peek provider in
    // unaligned mode, so consecutive overlapping windows don't re-peek
    // bytes they already have.
    ring: VecDeque<u8>,
    ring_next_peek: u64,
}

impl<'a> RegionScanner<'a> {
    pub fn new(handle: ReaderHandle<'a>, start: u64, end: u64, aligned: bool) -> Self {
        Self {
            handle,
            cursor: start,
            region_end: end,
            step: if aligned { WORD_SIZE as u64 } else { 1 },
            ring: VecDeque::with_capacity(2 * WORD_SIZE),
            ring_next_peek: start,
        }
    }

    fn fill_ring(&mut self, peek: &dyn WordPeek, want: usize) -> Result<()> {
        while self.ring.len() < want && self.ring_next_peek < self.region_end {
            let word = peek.peek_word(self.ring_next_peek)?;
            let take = (self.region_end - self.ring_next_peek).min(WORD_SIZE as u64) as usize;
            self.ring.extend(&word.to_ne_bytes()[..take]);
            self.ring_next_peek += take as u64;
        }
        Ok(())
    }

    /// Returns `(address, window, n)` or `None` once the region is
    /// exhausted.
    pub fn next_window(&mut self) -> Result<Option<(u64, [u8; 8], usize)>> {
        if self.cursor >= self.region_end {
            return Ok(None);
        }

        let want = (self.region_end - self.cursor).min(8) as usize;

        let (window, n) = match self.handle {
            ReaderHandle::Positional(mem) => {
                let mut buf = [0u8; 8];
                let n = mem.read_at(self.cursor, &mut buf[..want])?;
                if n == 0 {
                    return Ok(None);
                }
                (buf, n)
            }
            ReaderHandle::WordPeek(peek) => {
                self.fill_ring(peek, want)?;
                if self.ring.is_empty() {
                    return Ok(None);
                }
                let n = self.ring.len().min(want);
                let mut buf = [0u8; 8];
                for (i, b) in self.ring.iter().take(n).enumerate() {
                    buf[i] = *b;
                }
                (buf, n)
            }
        };

        let addr = self.cursor;
        let advance = self.step.min(self.region_end - self.cursor);

        if let ReaderHandle::WordPeek(_) = self.handle {
            for _ in 0..advance {
                self.ring.pop_front();
            }
        }

        self.cursor += advance;
        Ok(Some((addr, window, n)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory stand-in for a mapped region, addressable both as a
    /// `BlockRead` (positional) and a `WordPeek` (debugger) source.
    struct FakeMemory {
        base: u64,
        bytes: Vec<u8>,
    }

    impl BlockRead for FakeMemory {
        fn read_at(&self, addr: u64, buf: &mut [u8]) -> Result<usize> {
            let offset = (addr - self.base) as usize;
            if offset >= self.bytes.len() {
                return Ok(0);
            }
            let n = buf.len().min(self.bytes.len() - offset);
            buf[..n].copy_from_slice(&self.bytes[offset..offset + n]);
            Ok(n)
        }
    }

    impl WordPeek for FakeMemory {
        fn peek_word(&self, addr: u64) -> Result<u64> {
            let offset = (addr - self.base) as usize;
            let mut word = [0u8; 8];
            let avail = self.bytes.len().saturating_sub(offset).min(8);
            word[..avail].copy_from_slice(&self.bytes[offset..offset + avail]);
            Ok(u64::from_ne_bytes(word))
        }
    }

    fn collect(mut scanner: RegionScanner<'_>) -> Vec<(u64, usize)> {
        let mut out = Vec::new();
        while let Some((addr, _window, n)) = scanner.next_window().unwrap() {
            out.push((addr, n));
        }
        out
    }

    #[test]
    fn positional_reader_tail_short_read() {
        let mem = FakeMemory {
            base: 0x3000,
            bytes: vec![1, 2, 3, 4, 5],
        };
        let end = mem.base + mem.bytes.len() as u64;
        let scanner = RegionScanner::new(ReaderHandle::Positional(&mem), mem.base, end, true);
        assert_eq!(collect(scanner), vec![(0x3000, 5)]);
    }

    #[test]
    fn eight_byte_region_yields_one_aligned_and_eight_unaligned_windows() {
        let mem = FakeMemory {
            base: 0x2000,
            bytes: (0u8..8).collect(),
        };
        let end = mem.base + mem.bytes.len() as u64;

        let aligned = RegionScanner::new(ReaderHandle::Positional(&mem), mem.base, end, true);
        assert_eq!(collect(aligned).len(), 1);

        let unaligned = RegionScanner::new(ReaderHandle::Positional(&mem), mem.base, end, false);
        assert_eq!(collect(unaligned).len(), 8);
    }

    #[test]
    fn word_peek_unaligned_matches_positional() {
        let mem = FakeMemory {
            base: 0x2000,
            bytes: (0u8..32).collect(),
        };
        let end = mem.base + mem.bytes.len() as u64;

        let positional =
            RegionScanner::new(ReaderHandle::Positional(&mem), mem.base, end, false);
        let word_peek = RegionScanner::new(ReaderHandle::WordPeek(&mem), mem.base, end, false);

        assert_eq!(collect(positional), collect(word_peek));
    }

    #[test]
    fn unaligned_word_window_matches_bytes() {
        let mem = FakeMemory {
            base: 0x2000,
            bytes: (0u8..16).collect(),
        };
        let (window, n) = read_window_via_words(&mem, 0x2001, 8).unwrap();
        assert_eq!(n, 8);
        assert_eq!(&window, &mem.bytes[1..9]);
    }

    /// A pid essentially guaranteed not to name a live process, so
    /// `/proc/<pid>/mem` cannot be opened.
    const NONEXISTENT_PID: u32 = u32::MAX - 1;

    #[test]
    fn force_word_peek_never_touches_proc_mem() {
        let provider =
            Provider::select_with_preference(NONEXISTENT_PID, ReaderPreference::ForceWordPeek)
                .unwrap();
        assert!(matches!(provider, Provider::WordPeek(_)));
    }

    #[test]
    fn force_positional_surfaces_open_failure_instead_of_falling_back() {
        let result = Provider::select_with_preference(
            NONEXISTENT_PID,
            ReaderPreference::ForcePositional,
        );
        assert!(result.is_err());
    }

    #[test]
    fn auto_falls_back_to_word_peek_where_force_positional_would_error() {
        let provider =
            Provider::select_with_preference(NONEXISTENT_PID, ReaderPreference::Auto).unwrap();
        assert!(matches!(provider, Provider::WordPeek(_)));
    }

    #[test]
    fn read_window_at_arbitrary_address_word_peek() {
        let mem = FakeMemory {
            base: 0x2000,
            bytes: (0u8..16).collect(),
        };
        let end = mem.base + mem.bytes.len() as u64;
        let (window, n) = read_window_at(&ReaderHandle::WordPeek(&mem), 0x2003, end).unwrap();
        assert_eq!(n, 8);
        assert_eq!(&window, &mem.bytes[3..11]);
    }
}
