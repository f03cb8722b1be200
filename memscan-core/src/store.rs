//! The match store: a sequence of fixed-capacity, array-backed chunks
//! holding candidate `{address, value, flags}` entries, with O(1)
//! swap-with-last deletion and a compaction pass that shrinks chunk count.
//!
//! Modeled on `breakpad-handler`'s `alloc::page_vec::PageVec` — an
//! array-backed container sized up front rather than grown element by
//! element — but without its custom signal-safe allocator, which this
//! engine (unlike a crash handler) has no need for.

use crate::value::{Value, ValidityFlags};

/// Capacity tiers a chunk can be allocated at, smallest first.
const TIERS: [usize; 5] = [50, 100, 200, 400, 800];

fn largest_tier() -> usize {
    *TIERS.last().unwrap()
}

/// One candidate address and the value last observed there.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchEntry {
    pub address: u64,
    pub value: Value,
    pub flags: ValidityFlags,
}

struct Chunk {
    entries: Vec<MatchEntry>,
    capacity: usize,
}

impl Chunk {
    fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    fn used(&self) -> usize {
        self.entries.len()
    }

    fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// O(1) delete: move the last entry into `slot`.
    fn delete_at(&mut self, slot: usize) {
        self.entries.swap_remove(slot);
    }
}

/// Policy for which tier a freshly allocated chunk should use, given how
/// many chunks already back the list. New chunks default to the largest
/// tier regardless of existing chunk count; smaller tiers only come into
/// play as a target for `compact()`. Kept as its own function, independent
/// of `push`, so the policy itself is unit-testable.
fn tier_for(_existing_chunks: usize) -> usize {
    largest_tier()
}

/// The ordered sequence of chunks backing a match store.
pub struct MatchList {
    chunks: Vec<Chunk>,
    size: usize,
}

/// Instruction returned by an `iterate_mut` callback for one entry.
pub enum Keep {
    Keep,
    Drop,
}

impl MatchList {
    pub fn new() -> Self {
        Self {
            chunks: Vec::new(),
            size: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Appends to the last chunk, allocating a new one at the default tier
    /// if the last is full or none exists.
    pub fn push(&mut self, entry: MatchEntry) {
        if self.chunks.last().is_none_or(|c| c.is_full()) {
            self.chunks.push(Chunk::new(tier_for(self.chunks.len())));
        }
        self.chunks.last_mut().unwrap().entries.push(entry);
        self.size += 1;
    }

    /// Read-only iteration over every live entry, in current chunk order.
    pub fn iter(&self) -> impl Iterator<Item = &MatchEntry> {
        self.chunks.iter().flat_map(|c| c.entries.iter())
    }

    /// Visits every entry; `f` decides whether it survives. Dropped entries
    /// are removed by swap-with-last without advancing past the slot that
    /// now holds the moved entry, so the slot gets revisited. Chunks whose
    /// `used` count falls to zero are unlinked. Order is preserved only in
    /// the absence of any drop.
    pub fn iterate_mut(&mut self, mut f: impl FnMut(&mut MatchEntry) -> Keep) {
        let mut new_size = 0;
        self.chunks.retain_mut(|chunk| {
            let mut i = 0;
            while i < chunk.entries.len() {
                match f(&mut chunk.entries[i]) {
                    Keep::Keep => i += 1,
                    Keep::Drop => {
                        chunk.delete_at(i);
                        // do not advance: the swapped-in entry occupies `i` now
                    }
                }
            }
            new_size += chunk.used();
            !chunk.entries.is_empty()
        });
        self.size = new_size;
    }

    /// Deletes the entry at `(chunk, slot)` via swap-with-last.
    pub fn delete_at(&mut self, chunk: usize, slot: usize) {
        self.chunks[chunk].delete_at(slot);
        self.size -= 1;
        if self.chunks[chunk].entries.is_empty() {
            self.chunks.remove(chunk);
        }
    }

    /// Reduces chunk count by moving entries out of partially-filled
    /// chunks into earlier partially-filled chunks of larger capacity.
    /// Source entries that don't fully fit move their tail into the
    /// destination up to its remaining room, then source and destination
    /// swap roles so the partly-drained source becomes the next
    /// destination candidate.
    pub fn compact(&mut self) {
        self.chunks.retain(|c| !c.entries.is_empty());

        let mut dst = 0usize;
        while dst + 1 < self.chunks.len() {
            if self.chunks[dst].is_full() {
                dst += 1;
                continue;
            }

            // Pick the partially-filled chunk with the largest capacity
            // among the rest as the move source.
            let src = match (dst + 1..self.chunks.len())
                .max_by_key(|&i| self.chunks[i].capacity)
            {
                Some(i) => i,
                None => break,
            };

            let room = self.chunks[dst].capacity - self.chunks[dst].used();
            let take = room.min(self.chunks[src].used());
            let start = self.chunks[src].entries.len() - take;
            let moved: Vec<MatchEntry> = self.chunks[src].entries.drain(start..).collect();
            self.chunks[dst].entries.extend(moved);

            if self.chunks[src].entries.is_empty() {
                self.chunks.remove(src);
            } else {
                // The source only partially drained; it becomes the next
                // destination candidate.
                dst += 1;
            }
        }

        self.chunks.retain(|c| !c.entries.is_empty());
    }

    /// Number of chunks currently backing the list; exposed for tests that
    /// exercise `compact()`.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

impl Default for MatchList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValidityFlags;

    fn entry(addr: u64) -> MatchEntry {
        MatchEntry {
            address: addr,
            value: Value::from_window(&addr.to_le_bytes(), 8),
            flags: ValidityFlags::all(),
        }
    }

    #[test]
    fn push_then_size_matches_chunk_used_sum() {
        let mut list = MatchList::new();
        for i in 0..125 {
            list.push(entry(i));
        }
        assert_eq!(list.len(), 125);
    }

    #[test]
    fn iterate_mut_drop_removes_and_shrinks_size() {
        let mut list = MatchList::new();
        for i in 0..10 {
            list.push(entry(i));
        }
        list.iterate_mut(|e| {
            if e.address % 2 == 0 {
                Keep::Drop
            } else {
                Keep::Keep
            }
        });
        assert_eq!(list.len(), 5);
        assert!(list.iter().all(|e| e.address % 2 == 1));
    }

    #[test]
    fn iterate_mut_without_drops_preserves_order() {
        let mut list = MatchList::new();
        for i in 0..10 {
            list.push(entry(i));
        }
        list.iterate_mut(|_| Keep::Keep);
        let addrs: Vec<u64> = list.iter().map(|e| e.address).collect();
        assert_eq!(addrs, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn delete_at_is_swap_with_last() {
        let mut list = MatchList::new();
        for i in 0..5 {
            list.push(entry(i));
        }
        list.delete_at(0, 0);
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn compact_reduces_chunk_count_after_deletions() {
        let mut list = MatchList::new();
        // Push enough entries to span several chunks at the largest tier.
        for i in 0..(largest_tier() as u64 * 3 + 10) {
            list.push(entry(i));
        }
        let before_chunks = list.chunk_count();
        // Drop most entries, leaving a handful per chunk.
        list.iterate_mut(|e| {
            if e.address % 50 == 0 {
                Keep::Keep
            } else {
                Keep::Drop
            }
        });
        let survivors = list.len();
        list.compact();
        assert_eq!(list.len(), survivors);
        assert!(list.chunk_count() <= before_chunks);
    }

    #[test]
    fn empty_list_has_zero_size_and_no_chunks() {
        let list = MatchList::new();
        assert_eq!(list.len(), 0);
        assert_eq!(list.chunk_count(), 0);
    }

    #[test]
    fn tier_for_always_picks_largest() {
        assert_eq!(tier_for(0), largest_tier());
        assert_eq!(tier_for(7), largest_tier());
    }
}
