use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use lru::LruCache;
use tracing::debug;

use super::block::TranslatedBlock;
use crate::fault::EmulatorError;
use crate::memory::{CodeWriteObserver, StoreId, CODE_PAGE_BITS};

/// Running totals kept by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CacheStats {
    /// Blocks inserted.
    pub compiled: u64,
    /// Blocks dropped because their code was overwritten or flushed.
    pub invalidated: u64,
    /// Blocks dropped to make room.
    pub evicted: u64,
}

/// Translated-block cache keyed by guest start address.
///
/// Blocks are also indexed by the backing-store code pages they were read
/// from, so a store through any mirror reaches every affected block.
pub struct CodeCache {
    // Unbounded: the capacity check lives in `insert` so blocks still held
    // by the dispatcher can be skipped.
    blocks: LruCache<u32, Rc<TranslatedBlock>>,
    starts: BTreeSet<u32>,
    pages: BTreeMap<(StoreId, u32), BTreeSet<u32>>,
    capacity: usize,
    max_block_bytes: u32,
    stats: CacheStats,
}

impl std::fmt::Debug for CodeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeCache")
            .field("len", &self.blocks.len())
            .field("capacity", &self.capacity)
            .field("pages", &self.pages.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl CodeCache {
    /// Creates an empty cache holding at most `capacity` blocks of at most
    /// `max_block_instructions` instructions each.
    #[must_use]
    pub fn new(capacity: usize, max_block_instructions: usize) -> Self {
        // A trailing delay slot may extend a block by one instruction.
        let max_block_bytes = u32::try_from((max_block_instructions + 1) * 2).unwrap_or(u32::MAX);
        Self {
            blocks: LruCache::unbounded(),
            starts: BTreeSet::new(),
            pages: BTreeMap::new(),
            capacity,
            max_block_bytes,
            stats: CacheStats::default(),
        }
    }

    /// Number of live blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns true when no block is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Maximum number of live blocks.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Running totals.
    #[must_use]
    pub const fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Returns the block starting at `pc` and marks it most recently used.
    pub fn lookup(&mut self, pc: u32) -> Option<Rc<TranslatedBlock>> {
        self.blocks.get(&pc).map(Rc::clone)
    }

    /// Inserts a freshly translated block, evicting the least recently used
    /// idle block when the cache is full.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::ResourceExhaustion`] when the cache is full
    /// and every block is in use.
    pub fn insert(&mut self, block: TranslatedBlock) -> Result<Rc<TranslatedBlock>, EmulatorError> {
        if let Some(old) = self.blocks.peek(&block.start()).map(Rc::clone) {
            old.invalidate();
            self.remove(&old);
        }
        while self.blocks.len() >= self.capacity {
            self.evict_one()?;
        }

        let block = Rc::new(block);
        for page in Self::code_pages(block.offset(), block.byte_len()) {
            self.pages
                .entry((block.store(), page))
                .or_default()
                .insert(block.start());
        }
        self.starts.insert(block.start());
        self.blocks.put(block.start(), Rc::clone(&block));
        self.stats.compiled += 1;
        debug!(
            start = format_args!("{:#010x}", block.start()),
            instructions = block.ops().len(),
            "block compiled"
        );
        Ok(block)
    }

    fn evict_one(&mut self) -> Result<(), EmulatorError> {
        // Walk from the least recently used end; a block the dispatcher still
        // holds has a second strong reference.
        let victim = self
            .blocks
            .iter()
            .rev()
            .map(|(_, block)| block)
            .find(|&block| Rc::strong_count(block) == 1)
            .map(Rc::clone);
        let Some(victim) = victim else {
            return Err(EmulatorError::ResourceExhaustion(format!(
                "code cache full ({} blocks) and every block is in use",
                self.capacity
            )));
        };
        self.remove(&victim);
        self.stats.evicted += 1;
        debug!(start = format_args!("{:#010x}", victim.start()), "block evicted");
        Ok(())
    }

    fn remove(&mut self, block: &TranslatedBlock) {
        self.blocks.pop(&block.start());
        self.starts.remove(&block.start());
        for page in Self::code_pages(block.offset(), block.byte_len()) {
            let key = (block.store(), page);
            if let Some(starts) = self.pages.get_mut(&key) {
                starts.remove(&block.start());
                if starts.is_empty() {
                    self.pages.remove(&key);
                }
            }
        }
    }

    /// Invalidates every block read from `store[offset..offset + len]`.
    /// Returns the number of blocks dropped.
    pub fn invalidate_range(&mut self, store: StoreId, offset: u32, len: u32) -> usize {
        let mut doomed = Vec::new();
        for page in Self::code_pages(offset, len) {
            if let Some(starts) = self.pages.get(&(store, page)) {
                doomed.extend(
                    starts
                        .iter()
                        .filter_map(|start| self.blocks.peek(start))
                        .filter(|block| block.overlaps(store, offset, len))
                        .map(Rc::clone),
                );
            }
        }
        let mut dropped = 0;
        for block in doomed {
            if !self.blocks.contains(&block.start()) {
                continue;
            }
            block.invalidate();
            self.remove(&block);
            dropped += 1;
        }
        if dropped > 0 {
            self.stats.invalidated += dropped as u64;
            debug!(offset = format_args!("{offset:#x}"), len, dropped, "code overwritten");
        }
        dropped
    }

    /// Drops every block.
    pub fn flush(&mut self) {
        let dropped = self.blocks.len();
        for (_, block) in &self.blocks {
            block.invalidate();
        }
        self.blocks.clear();
        self.starts.clear();
        self.pages.clear();
        self.stats.invalidated += dropped as u64;
        debug!(dropped, "code cache flushed");
    }

    /// Returns true when `pc` lies inside any valid cached block.
    #[must_use]
    pub fn contains_pc(&self, pc: u32) -> bool {
        let low = pc.saturating_sub(self.max_block_bytes);
        self.starts
            .range(low..=pc)
            .filter_map(|start| self.blocks.peek(start))
            .any(|block| block.is_valid() && block.covers(pc))
    }

    fn code_pages(offset: u32, len: u32) -> std::ops::RangeInclusive<u32> {
        let last = offset.saturating_add(len.max(1) - 1);
        (offset >> CODE_PAGE_BITS)..=(last >> CODE_PAGE_BITS)
    }
}

impl CodeWriteObserver for CodeCache {
    fn invalidate_code(&mut self, store: StoreId, offset: u32, len: u32) {
        self.invalidate_range(store, offset, len);
    }

    fn holds_code(&self, store: StoreId, code_page: u32) -> bool {
        self.pages.contains_key(&(store, code_page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Decoder;
    use crate::execute::handler_for;
    use crate::jit::CompiledOp;

    const BASE: u32 = 0x8c01_0000;

    fn nops(start: u32, offset: u32, count: usize) -> TranslatedBlock {
        let instr = Decoder::new().decode(0x0009).unwrap();
        let ops = (0..count)
            .map(|i| CompiledOp {
                handler: handler_for(instr.op()),
                instr,
                pc: start + 2 * i as u32,
            })
            .collect();
        TranslatedBlock::new(start, StoreId(0), offset, ops)
    }

    #[test]
    fn lookup_hits_only_exact_start() {
        let mut cache = CodeCache::new(4, 8);
        cache.insert(nops(BASE, 0x1_0000, 4)).unwrap();
        assert!(cache.lookup(BASE).is_some());
        assert!(cache.lookup(BASE + 2).is_none());
        assert!(cache.contains_pc(BASE + 6));
        assert!(!cache.contains_pc(BASE + 8));
    }

    #[test]
    fn overlapping_write_invalidates_all_views() {
        let mut cache = CodeCache::new(4, 8);
        let cached = cache.insert(nops(BASE, 0x1_0000, 4)).unwrap();
        // Same bytes reached through the uncached mirror.
        let mirror = cache.insert(nops(BASE + 0x2000_0000, 0x1_0000, 4)).unwrap();
        // Next code page of the same store.
        let other = cache.insert(nops(BASE + 0x1000, 0x1_1000, 4)).unwrap();

        assert_eq!(cache.invalidate_range(StoreId(0), 0x1_0003, 1), 2);
        assert!(!cached.is_valid());
        assert!(!mirror.is_valid());
        assert!(other.is_valid());
        assert_eq!(cache.len(), 1);
        assert!(!cache.holds_code(StoreId(0), 0x10));
        assert_eq!(cache.stats().invalidated, 2);
    }

    #[test]
    fn write_next_to_block_leaves_it_alone() {
        let mut cache = CodeCache::new(4, 8);
        let block = cache.insert(nops(BASE, 0x1_0000, 4)).unwrap();
        assert_eq!(cache.invalidate_range(StoreId(0), 0x1_0008, 4), 0);
        assert!(block.is_valid());
        assert!(cache.holds_code(StoreId(0), 0x10));
    }

    #[test]
    fn full_cache_evicts_least_recently_used() {
        let mut cache = CodeCache::new(2, 8);
        drop(cache.insert(nops(BASE, 0x1_0000, 2)).unwrap());
        drop(cache.insert(nops(BASE + 0x10, 0x1_0010, 2)).unwrap());
        cache.lookup(BASE);
        drop(cache.insert(nops(BASE + 0x20, 0x1_0020, 2)).unwrap());

        assert!(cache.lookup(BASE).is_some());
        assert!(cache.lookup(BASE + 0x10).is_none());
        assert_eq!(cache.stats().evicted, 1);
    }

    #[test]
    fn busy_oldest_block_is_skipped_for_next_oldest() {
        let mut cache = CodeCache::new(2, 8);
        let running = cache.insert(nops(BASE, 0x1_0000, 2)).unwrap();
        drop(cache.insert(nops(BASE + 0x10, 0x1_0010, 2)).unwrap());
        drop(cache.insert(nops(BASE + 0x20, 0x1_0020, 2)).unwrap());

        assert!(running.is_valid());
        assert!(cache.contains_pc(BASE + 2));
        assert!(!cache.contains_pc(BASE + 0x12));
        assert!(cache.contains_pc(BASE + 0x22));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evicted, 1);
    }

    #[test]
    fn blocks_in_use_are_never_evicted() {
        let mut cache = CodeCache::new(1, 8);
        let running = cache.insert(nops(BASE, 0x1_0000, 2)).unwrap();
        let err = cache.insert(nops(BASE + 0x10, 0x1_0010, 2)).unwrap_err();
        assert!(matches!(err, EmulatorError::ResourceExhaustion(_)));
        assert!(running.is_valid());

        drop(running);
        assert!(cache.insert(nops(BASE + 0x10, 0x1_0010, 2)).is_ok());
    }

    #[test]
    fn flush_invalidates_everything() {
        let mut cache = CodeCache::new(4, 8);
        let block = cache.insert(nops(BASE, 0x1_0000, 2)).unwrap();
        cache.flush();
        assert!(cache.is_empty());
        assert!(!block.is_valid());
        assert!(!cache.holds_code(StoreId(0), 0x10));
    }
}
