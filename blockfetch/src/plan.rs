//! Chunk planning for ranged downloads.
//!
//! A [`DownloadPlan`] tiles the content into fixed-size blocks. Every
//! block except possibly the last has exactly `block_size` bytes, and
//! the blocks cover the content contiguously with no overlap. Content
//! of zero length still plans as a single (empty) chunk so a download
//! always has at least one stream to drive.

use crate::range::ByteRange;

/// Number of blocks needed for `total_size` bytes at `block_size` each.
///
/// Always at least 1, even for empty content.
pub fn block_count(total_size: u64, block_size: u64) -> u64 {
    debug_assert!(block_size > 0, "block size must be positive");
    total_size.div_ceil(block_size).max(1)
}

/// One block of a planned download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkDescriptor {
    /// Position of this block in the plan, starting at 0.
    pub index: u64,
    /// Byte offset of the block within the content.
    pub offset: u64,
    /// Number of bytes in the block. 0 only for empty content.
    pub length: u64,
}

impl ChunkDescriptor {
    /// The byte range this chunk requests from the source.
    ///
    /// An empty chunk maps to an open-ended range so the request is
    /// still well-formed.
    pub fn range(&self) -> ByteRange {
        if self.length == 0 {
            ByteRange::from_offset(self.offset)
        } else {
            ByteRange::new(self.offset, self.length)
        }
    }
}

/// Tiling of known-size content into blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadPlan {
    total_size: u64,
    block_size: u64,
}

impl DownloadPlan {
    /// Plans `total_size` bytes in blocks of `block_size` (minimum 1).
    pub fn new(total_size: u64, block_size: u64) -> Self {
        Self {
            total_size,
            block_size: block_size.max(1),
        }
    }

    /// Total content size in bytes.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Size of one block in bytes.
    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Number of blocks in the plan.
    pub fn block_count(&self) -> u64 {
        block_count(self.total_size, self.block_size)
    }

    /// The block at `index`, which must be below [`Self::block_count`].
    pub fn chunk(&self, index: u64) -> ChunkDescriptor {
        debug_assert!(index < self.block_count(), "chunk index out of plan");
        let offset = index * self.block_size;
        let length = self.block_size.min(self.total_size.saturating_sub(offset));
        ChunkDescriptor {
            index,
            offset,
            length,
        }
    }

    /// Iterates over all blocks in order.
    pub fn chunks(&self) -> impl Iterator<Item = ChunkDescriptor> + '_ {
        (0..self.block_count()).map(|index| self.chunk(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_count_rounds_up() {
        assert_eq!(block_count(10, 4), 3);
        assert_eq!(block_count(8, 4), 2);
        assert_eq!(block_count(1, 4), 1);
        assert_eq!(block_count(4, 4), 1);
    }

    #[test]
    fn test_empty_content_plans_one_chunk() {
        let plan = DownloadPlan::new(0, 4);
        assert_eq!(plan.block_count(), 1);
        let only = plan.chunk(0);
        assert_eq!(only.offset, 0);
        assert_eq!(only.length, 0);
        assert_eq!(only.range().header_value(), "bytes=0-");
    }

    #[test]
    fn test_chunks_tile_content() {
        let plan = DownloadPlan::new(10, 4);
        let chunks: Vec<_> = plan.chunks().collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], ChunkDescriptor { index: 0, offset: 0, length: 4 });
        assert_eq!(chunks[1], ChunkDescriptor { index: 1, offset: 4, length: 4 });
        assert_eq!(chunks[2], ChunkDescriptor { index: 2, offset: 8, length: 2 });
    }

    #[test]
    fn test_chunk_range_is_inclusive() {
        let plan = DownloadPlan::new(10, 4);
        assert_eq!(plan.chunk(0).range().header_value(), "bytes=0-3");
        assert_eq!(plan.chunk(2).range().header_value(), "bytes=8-9");
    }

    #[test]
    fn test_block_size_clamped_to_one() {
        let plan = DownloadPlan::new(3, 0);
        assert_eq!(plan.block_size(), 1);
        assert_eq!(plan.block_count(), 3);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_chunks_tile_exactly(
                total_size in 0u64..100_000,
                block_size in 1u64..4096,
            ) {
                let plan = DownloadPlan::new(total_size, block_size);
                let chunks: Vec<_> = plan.chunks().collect();

                prop_assert_eq!(
                    chunks.len() as u64,
                    total_size.div_ceil(block_size).max(1)
                );

                let mut expected_offset = 0u64;
                for chunk in &chunks {
                    prop_assert_eq!(chunk.offset, expected_offset);
                    prop_assert!(chunk.length <= block_size);
                    expected_offset += chunk.length;
                }
                prop_assert_eq!(expected_offset, total_size);
            }

            #[test]
            fn test_all_but_last_chunk_full(
                total_size in 1u64..100_000,
                block_size in 1u64..4096,
            ) {
                let plan = DownloadPlan::new(total_size, block_size);
                let chunks: Vec<_> = plan.chunks().collect();
                for chunk in &chunks[..chunks.len() - 1] {
                    prop_assert_eq!(chunk.length, block_size);
                }
                prop_assert!(chunks[chunks.len() - 1].length > 0);
            }
        }
    }
}
