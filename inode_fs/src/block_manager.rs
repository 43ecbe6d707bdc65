use alloc::collections::VecDeque;

use log::{debug, warn};

use crate::bitmap::Bitmap;
use crate::block_dev::{BlockDevice, MemDisk};
use crate::config::Geometry;
use crate::error::{FsError, Result};
use crate::layout::{BlockId, SuperBlock};
use crate::BLOCK_SIZE;

/// Grants and reclaims data blocks of the store it owns.
///
/// Free blocks wait in a FIFO queue: the block released first is handed out first.
/// In-use bits live in the bitmap region of the store; the reserved prefix
/// (boot, superblock, bitmap, inode table) is marked in use at construction and is
/// never queued.
pub struct BlockAllocator<D: BlockDevice = MemDisk> {
    device: D,
    geometry: Geometry,
    sb: SuperBlock,
    bitmap: Bitmap,
    free_block_list: VecDeque<BlockId>,
}

impl BlockAllocator<MemDisk> {
    pub fn new(geometry: Geometry) -> Self {
        Self::format(MemDisk::new(geometry.block_num() as usize), geometry)
    }
}

impl<D: BlockDevice> BlockAllocator<D> {
    /// Takes over `device`, whose block count becomes the store size.
    pub fn with_device(device: D, inode_num: u32) -> Result<Self> {
        let block_num =
            u32::try_from(device.num_blocks()).map_err(|_| FsError::InvalidArgument)?;
        let geometry = Geometry::new(block_num, inode_num)?;
        Ok(Self::format(device, geometry))
    }

    fn format(mut device: D, geometry: Geometry) -> Self {
        // clear the reserved region, device contents are not trusted
        let zero = [0u8; BLOCK_SIZE];
        for block_id in 0..geometry.data_start() {
            device.write_block(block_id as usize, &zero);
        }
        let bitmap = Bitmap::new(geometry);
        bitmap.set_prefix(&mut device, geometry.data_start() as usize);
        let free_block_list = (geometry.data_start()..geometry.block_num()).collect();
        debug!(
            "block allocator: {} blocks, data region starts at {}",
            geometry.block_num(),
            geometry.data_start()
        );
        Self {
            device,
            geometry,
            sb: SuperBlock::new(geometry.block_num(), geometry.inode_num()),
            bitmap,
            free_block_list,
        }
    }

    /// Allocate a free data block. Its previous contents are left in place.
    pub fn alloc_block(&mut self) -> Result<BlockId> {
        let Some(block_id) = self.free_block_list.pop_front() else {
            warn!("alloc_block: the disk is full");
            return Err(FsError::ResourceExhausted);
        };
        let was_used = self.bitmap.set(&mut self.device, block_id as usize);
        debug_assert!(!was_used, "queued block {} was marked in use", block_id);
        debug!("alloc_block: {}", block_id);
        Ok(block_id)
    }

    pub fn free_block(&mut self, block_id: BlockId) -> Result<()> {
        if block_id < self.geometry.data_start() || block_id >= self.geometry.block_num() {
            warn!("free_block: block id {} is not a data block", block_id);
            return Err(FsError::InvalidId);
        }
        if !self.bitmap.clear(&mut self.device, block_id as usize) {
            warn!("free_block: block {} is already free", block_id);
            return Err(FsError::DoubleFree);
        }
        self.free_block_list.push_back(block_id);
        debug!("free_block: {}", block_id);
        Ok(())
    }

    pub fn read_block(&self, block_id: BlockId, buf: &mut [u8]) {
        self.device.read_block(block_id as usize, buf);
    }

    pub fn write_block(&mut self, block_id: BlockId, buf: &[u8]) {
        self.device.write_block(block_id as usize, buf);
    }

    /// Whether the bitmap marks `block_id` as owned; reserved blocks always are.
    pub fn is_in_use(&self, block_id: BlockId) -> bool {
        block_id < self.geometry.block_num() && self.bitmap.test(&self.device, block_id as usize)
    }

    pub fn num_free_blocks(&self) -> usize {
        self.free_block_list.len()
    }

    /// Free blocks in the order `alloc_block` will hand them out.
    pub fn free_list(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.free_block_list.iter().copied()
    }

    /// Number of blocks the bitmap marks as in use, reserved region included.
    pub fn marked_blocks(&self) -> usize {
        self.bitmap
            .count_ones(&self.device, self.geometry.block_num() as usize)
    }

    pub fn data_start(&self) -> BlockId {
        self.geometry.data_start()
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn superblock(&self) -> &SuperBlock {
        &self.sb
    }
}
