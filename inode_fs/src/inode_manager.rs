use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::vec::Vec;

use bitvec::prelude::*;
use log::{debug, trace, warn};

use crate::block_dev::{BlockDevice, MemDisk};
use crate::block_manager::BlockAllocator;
use crate::clock::Clock;
use crate::config::Geometry;
use crate::error::{FsError, Result};
use crate::layout::{BlockId, DiskInode, IndirectBlock, InodeType, MAXFILE, MAXFILE_BYTES, NDIRECT};
use crate::BLOCK_SIZE;

/// Inode of the root directory, allocated at construction and never freed.
pub const ROOT_INUM: u32 = 1;

/// inode table, free inode queue, block addressing
pub struct InodeManager<D: BlockDevice = MemDisk> {
    pub(crate) bm: BlockAllocator<D>,
    free_inode_list: VecDeque<u32>,
    /// in-use marker per inode id
    using_inodes: BitVec,
    pub(crate) clock: Box<dyn Clock>,
}

impl InodeManager<MemDisk> {
    /// A 16 MiB store with 1024 inodes.
    pub fn new(clock: impl Clock + 'static) -> Self {
        Self::build(BlockAllocator::new(Geometry::default()), clock)
    }

    pub fn with_geometry(geometry: Geometry, clock: impl Clock + 'static) -> Self {
        Self::build(BlockAllocator::new(geometry), clock)
    }
}

impl<D: BlockDevice> InodeManager<D> {
    pub fn with_device(device: D, inode_num: u32, clock: impl Clock + 'static) -> Result<Self> {
        Ok(Self::build(BlockAllocator::with_device(device, inode_num)?, clock))
    }

    fn build(bm: BlockAllocator<D>, clock: impl Clock + 'static) -> Self {
        let inode_num = bm.geometry().inode_num();
        let mut im = Self {
            bm,
            free_inode_list: (ROOT_INUM + 1..inode_num).collect(),
            using_inodes: bitvec![0; inode_num as usize],
            clock: Box::new(clock),
        };
        // inode 0 is never handed out, the root is claimed directly
        im.using_inodes.set(ROOT_INUM as usize, true);
        let root = DiskInode::new(InodeType::Directory, im.clock.now());
        im.put_inode(ROOT_INUM, &root);
        debug!("inode manager: {} inodes, root is {}", inode_num, ROOT_INUM);
        im
    }

    pub fn root_inum(&self) -> u32 {
        ROOT_INUM
    }

    /// Hands out the inode at the front of the free queue as an empty `type_`.
    pub fn alloc_inode(&mut self, type_: InodeType) -> Result<u32> {
        if type_ == InodeType::Unused {
            warn!("alloc_inode: type {:?} is not allocatable", type_);
            return Err(FsError::InvalidArgument);
        }
        let Some(inum) = self.free_inode_list.pop_front() else {
            warn!("alloc_inode: the inode table is full");
            return Err(FsError::ResourceExhausted);
        };
        self.using_inodes.set(inum as usize, true);
        let inode = DiskInode::new(type_, self.clock.now());
        self.put_inode(inum, &inode);
        debug!("alloc_inode: {} as {:?}", inum, type_);
        Ok(inum)
    }

    /// Releases every block of inode `inum` and returns the id to the free queue.
    pub fn free_inode(&mut self, inum: u32) -> Result<()> {
        self.check_inum(inum)?;
        if inum == ROOT_INUM {
            warn!("free_inode: refusing to free the root directory");
            return Err(FsError::InvalidArgument);
        }
        if !self.using_inodes[inum as usize] {
            warn!("free_inode: inode {} is already freed", inum);
            return Err(FsError::DoubleFree);
        }
        let mut inode = self.get_inode(inum)?.ok_or(FsError::Inconsistent)?;
        // highest index first, the indirect block goes after every entry it maps
        for index in (0..inode.data_blocks()).rev() {
            self.inode_free_block_id(&mut inode, index)?;
        }
        inode.type_ = InodeType::Unused;
        inode.size = 0;
        self.put_inode(inum, &inode);
        self.using_inodes.set(inum as usize, false);
        // a released id is the next one handed out
        self.free_inode_list.push_front(inum);
        debug!("free_inode: {}", inum);
        Ok(())
    }

    fn check_inum(&self, inum: u32) -> Result<()> {
        if inum == 0 || inum >= self.bm.geometry().inode_num() {
            warn!("inode id {} is out of range", inum);
            return Err(FsError::InvalidId);
        }
        Ok(())
    }

    /// Reads the record of `inum`; `Ok(None)` when the slot is unused.
    pub(crate) fn get_inode(&self, inum: u32) -> Result<Option<DiskInode>> {
        trace!("get_inode {}", inum);
        self.check_inum(inum)?;
        let mut buf = [0u8; BLOCK_SIZE];
        self.bm.read_block(self.bm.geometry().inode_block(inum), &mut buf);
        let inode = DiskInode::decode(&buf)?;
        if inode.type_ == InodeType::Unused {
            trace!("inode {} does not exist", inum);
            return Ok(None);
        }
        Ok(Some(inode))
    }

    /// Like `get_inode`, with an unused slot reported as `InvalidId`.
    pub(crate) fn load_inode(&self, inum: u32) -> Result<DiskInode> {
        self.get_inode(inum)?.ok_or_else(|| {
            warn!("inode {} is not allocated", inum);
            FsError::InvalidId
        })
    }

    /// `inum` must already be range checked.
    pub(crate) fn put_inode(&mut self, inum: u32, inode: &DiskInode) {
        trace!("put_inode {}", inum);
        let block_id = self.bm.geometry().inode_block(inum);
        let mut buf = [0u8; BLOCK_SIZE];
        self.bm.read_block(block_id, &mut buf);
        inode.encode(&mut buf);
        self.bm.write_block(block_id, &buf);
    }

    fn read_indirect(&self, inode: &DiskInode) -> IndirectBlock {
        let mut buf = [0u8; BLOCK_SIZE];
        self.bm.read_block(inode.indirect, &mut buf);
        IndirectBlock::from_bytes(buf)
    }

    /// Physical block of logical block `index`.
    pub(crate) fn inode_get_block_id(&self, inode: &DiskInode, index: u32) -> Result<BlockId> {
        if index >= inode.data_blocks() || index as usize >= MAXFILE {
            warn!(
                "inode_get_block_id: index {} out of range, file has {} blocks",
                index,
                inode.data_blocks()
            );
            return Err(FsError::OutOfRange);
        }
        let index = index as usize;
        if index < NDIRECT {
            return Ok(inode.direct[index]);
        }
        Ok(self.read_indirect(inode).get(index - NDIRECT))
    }

    /// Backs logical block `index` with a fresh zero-filled block. Crossing into the
    /// indirect range also allocates the indirect block.
    fn inode_allocate_block(&mut self, inode: &mut DiskInode, index: u32) -> Result<()> {
        let index = index as usize;
        if index >= MAXFILE {
            warn!("inode_allocate_block: index {} is beyond {}", index, MAXFILE);
            return Err(FsError::OutOfRange);
        }
        if index == NDIRECT {
            let indirect = self.bm.alloc_block()?;
            let block_id = match self.bm.alloc_block() {
                Ok(block_id) => block_id,
                Err(e) => {
                    self.bm.free_block(indirect)?;
                    return Err(e);
                }
            };
            self.zero_block(block_id);
            let mut table = IndirectBlock::empty();
            table.set(0, block_id);
            self.bm.write_block(indirect, table.as_bytes());
            inode.indirect = indirect;
            return Ok(());
        }
        let block_id = self.bm.alloc_block()?;
        self.zero_block(block_id);
        if index < NDIRECT {
            inode.direct[index] = block_id;
        } else {
            let mut table = self.read_indirect(inode);
            table.set(index - NDIRECT, block_id);
            self.bm.write_block(inode.indirect, table.as_bytes());
        }
        Ok(())
    }

    /// Releases logical block `index`; at `NDIRECT` the indirect block goes too.
    fn inode_free_block_id(&mut self, inode: &mut DiskInode, index: u32) -> Result<()> {
        let block_id = self.inode_get_block_id(inode, index)?;
        self.bm.free_block(block_id)?;
        let index = index as usize;
        if index < NDIRECT {
            inode.direct[index] = 0;
        } else if index == NDIRECT {
            self.bm.free_block(inode.indirect)?;
            inode.indirect = 0;
        }
        Ok(())
    }

    fn zero_block(&mut self, block_id: BlockId) {
        self.bm.write_block(block_id, &[0u8; BLOCK_SIZE]);
    }

    /// Sets the type of `inum`, refreshes its timestamps, and grows or shrinks its
    /// block list to fit `new_size` bytes. An unused slot is claimed as a fresh inode.
    ///
    /// Nothing is changed when the allocator cannot supply every block a growth needs.
    pub fn resize_inode(&mut self, type_: InodeType, inum: u32, new_size: usize) -> Result<()> {
        self.check_inum(inum)?;
        if type_ == InodeType::Unused || new_size > MAXFILE_BYTES {
            warn!("resize_inode: invalid type {:?} or size {}", type_, new_size);
            return Err(FsError::InvalidArgument);
        }
        let new_size = new_size as u32;
        let now = self.clock.now();
        let claimed = !self.using_inodes[inum as usize];
        let mut inode = if claimed {
            DiskInode::new(type_, now)
        } else {
            self.load_inode(inum)?
        };

        let needed = inode.blocks_num_needed(new_size) as usize;
        if needed > self.bm.num_free_blocks() {
            warn!(
                "resize_inode: {} needs {} blocks, {} free",
                inum,
                needed,
                self.bm.num_free_blocks()
            );
            return Err(FsError::ResourceExhausted);
        }
        if claimed {
            self.free_inode_list.retain(|&id| id != inum);
            self.using_inodes.set(inum as usize, true);
        }

        inode.type_ = type_;
        inode.atime = now;
        inode.mtime = now;
        inode.ctime = now;

        let old_blocks = inode.data_blocks();
        let new_blocks = DiskInode::_data_blocks(new_size);
        debug!("resize_inode: {} from {} to {} blocks", inum, old_blocks, new_blocks);
        let tail = inode.size as usize % BLOCK_SIZE;
        if new_size > inode.size && tail != 0 {
            // stale bytes past the old end of the last block
            let block_id = self.inode_get_block_id(&inode, old_blocks - 1)?;
            let mut buf = [0u8; BLOCK_SIZE];
            self.bm.read_block(block_id, &mut buf);
            buf[tail..].fill(0);
            self.bm.write_block(block_id, &buf);
        }
        if new_blocks > old_blocks {
            for index in old_blocks..new_blocks {
                self.inode_allocate_block(&mut inode, index)?;
            }
        } else {
            for index in (new_blocks..old_blocks).rev() {
                self.inode_free_block_id(&mut inode, index)?;
            }
        }
        inode.size = new_size;
        self.put_inode(inum, &inode);
        Ok(())
    }

    pub fn is_inode_in_use(&self, inum: u32) -> bool {
        (inum as usize) < self.using_inodes.len() && self.using_inodes[inum as usize]
    }

    pub fn num_free_inodes(&self) -> usize {
        self.free_inode_list.len()
    }

    pub fn block_allocator(&self) -> &BlockAllocator<D> {
        &self.bm
    }

    /// Every block owned by `inode`: data blocks in logical order, then the indirect block.
    fn owned_blocks(&self, inode: &DiskInode) -> Result<Vec<BlockId>> {
        if inode.data_blocks() as usize > MAXFILE {
            return Err(FsError::Inconsistent);
        }
        let mut blocks = Vec::with_capacity(DiskInode::total_blocks(inode.size) as usize);
        for index in 0..inode.data_blocks() {
            blocks.push(self.inode_get_block_id(inode, index)?);
        }
        if inode.data_blocks() as usize > NDIRECT {
            blocks.push(inode.indirect);
        }
        Ok(blocks)
    }

    /// Cross-checks the free queues, in-use markers and inode block lists.
    pub fn check(&self) -> Result<()> {
        let geometry = *self.bm.geometry();
        let data_start = geometry.data_start();
        let mut owned = bitvec![0; geometry.block_num() as usize];
        let mut owned_count = 0usize;

        let fail = |what: &str| {
            warn!("check: {}", what);
            FsError::Inconsistent
        };

        for inum in 1..geometry.inode_num() {
            let record = self.get_inode(inum)?;
            let in_use = self.using_inodes[inum as usize];
            let inode = match (record, in_use) {
                (Some(inode), true) => inode,
                (None, false) => continue,
                (Some(_), false) => return Err(fail("unused inode has a live record")),
                (None, true) => return Err(fail("in-use inode has no record")),
            };
            for block_id in self.owned_blocks(&inode)? {
                if block_id < data_start || block_id >= geometry.block_num() {
                    return Err(fail("inode owns a block outside the data region"));
                }
                if owned[block_id as usize] {
                    return Err(fail("block owned twice"));
                }
                if !self.bm.is_in_use(block_id) {
                    return Err(fail("owned block is not marked in use"));
                }
                owned.set(block_id as usize, true);
                owned_count += 1;
            }
        }

        let mut queued = bitvec![0; geometry.block_num() as usize];
        for block_id in self.bm.free_list() {
            if block_id < data_start || block_id >= geometry.block_num() {
                return Err(fail("free list holds a reserved block"));
            }
            if queued[block_id as usize] || owned[block_id as usize] {
                return Err(fail("free block is queued twice or owned"));
            }
            if self.bm.is_in_use(block_id) {
                return Err(fail("free block is marked in use"));
            }
            queued.set(block_id as usize, true);
        }
        if owned_count + self.bm.num_free_blocks() != geometry.data_blocks() as usize {
            return Err(fail("blocks leaked"));
        }
        if self.bm.marked_blocks() != data_start as usize + owned_count {
            return Err(fail("bitmap disagrees with the owners"));
        }

        let mut seen = bitvec![0; geometry.inode_num() as usize];
        for &inum in self.free_inode_list.iter() {
            if inum <= ROOT_INUM || inum >= geometry.inode_num() {
                return Err(fail("free inode queue holds a reserved id"));
            }
            if seen[inum as usize] || self.using_inodes[inum as usize] {
                return Err(fail("free inode is queued twice or in use"));
            }
            seen.set(inum as usize, true);
        }
        let in_use = self.using_inodes.count_ones();
        if self.using_inodes[0] || in_use + self.free_inode_list.len() != geometry.inode_num() as usize - 1 {
            return Err(fail("inode ids leaked"));
        }
        Ok(())
    }
}
