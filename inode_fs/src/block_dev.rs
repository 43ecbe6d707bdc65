use alloc::boxed::Box;
use alloc::vec;

use crate::BLOCK_SIZE;

/// Trait for block device
pub trait BlockDevice: Send + Sync {
    /// Number of addressable blocks
    fn num_blocks(&self) -> usize;
    /// Read block `block_id` into `buf`, which must be exactly `BLOCK_SIZE` bytes
    fn read_block(&self, block_id: usize, buf: &mut [u8]);
    /// Write `buf`, exactly `BLOCK_SIZE` bytes, to block `block_id`
    fn write_block(&mut self, block_id: usize, buf: &[u8]);
}

/// Zero-initialized in-memory block store. Contents vanish with the value.
pub struct MemDisk {
    blocks: Box<[[u8; BLOCK_SIZE]]>,
}

impl MemDisk {
    pub fn new(num_blocks: usize) -> Self {
        Self {
            blocks: vec![[0u8; BLOCK_SIZE]; num_blocks].into_boxed_slice(),
        }
    }
}

impl BlockDevice for MemDisk {
    fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        debug_assert!(block_id < self.blocks.len(), "block id {} out of range", block_id);
        debug_assert_eq!(buf.len(), BLOCK_SIZE, "not a complete block");
        buf.copy_from_slice(&self.blocks[block_id]);
    }

    fn write_block(&mut self, block_id: usize, buf: &[u8]) {
        debug_assert!(block_id < self.blocks.len(), "block id {} out of range", block_id);
        debug_assert_eq!(buf.len(), BLOCK_SIZE, "not a complete block");
        self.blocks[block_id].copy_from_slice(buf);
    }
}
