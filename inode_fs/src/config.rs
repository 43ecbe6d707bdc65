//! Store dimensions and the placement of the reserved region.
//!
//! `| boot | superblock | block bitmap | gap | inode table | data |`

use crate::error::{FsError, Result};
use crate::BLOCK_SIZE;

/// 16 MiB
pub const DISK_SIZE: usize = 1024 * 1024 * 16;
pub const BLOCK_NUM: u32 = (DISK_SIZE / BLOCK_SIZE) as u32;
pub const INODE_NUM: u32 = 1024;
/// Inodes per block, one inode owns a whole block
pub const IPB: u32 = 1;
/// Bitmap bits per block
pub const BPB: u32 = (BLOCK_SIZE * 8) as u32;

const BITMAP_START: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    block_num: u32,
    inode_num: u32,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            block_num: BLOCK_NUM,
            inode_num: INODE_NUM,
        }
    }
}

impl Geometry {
    /// Rejects stores whose reserved region would leave no data block, stores whose
    /// byte size does not fit the superblock's `u32`, and inode tables too small to
    /// hold id 0 and the root.
    pub fn new(block_num: u32, inode_num: u32) -> Result<Self> {
        if inode_num < 2 || block_num as u64 * BLOCK_SIZE as u64 > u32::MAX as u64 {
            return Err(FsError::InvalidArgument);
        }
        let geometry = Self {
            block_num,
            inode_num,
        };
        // inode_block() below must not overflow either
        let reserved = (block_num / BPB) as u64 + (inode_num / IPB) as u64 + 3;
        if reserved >= block_num as u64 {
            return Err(FsError::InvalidArgument);
        }
        Ok(geometry)
    }

    pub fn block_num(&self) -> u32 {
        self.block_num
    }

    pub fn inode_num(&self) -> u32 {
        self.inode_num
    }

    pub fn bitmap_start(&self) -> u32 {
        BITMAP_START
    }

    pub fn bitmap_blocks(&self) -> u32 {
        (self.block_num + BPB - 1) / BPB
    }

    /// Block containing the usage bit for block `b`
    pub fn bitmap_block(&self, b: u32) -> u32 {
        b / BPB + BITMAP_START
    }

    /// Block containing inode `inum`
    pub fn inode_block(&self, inum: u32) -> u32 {
        self.block_num / BPB + inum / IPB + 3
    }

    /// First block handed out by the block allocator
    pub fn data_start(&self) -> u32 {
        self.inode_block(self.inode_num)
    }

    pub fn data_blocks(&self) -> u32 {
        self.block_num - self.data_start()
    }
}
