//! On-block formats. Everything is encoded explicitly as little-endian words,
//! never by reinterpreting a block buffer in place.

use core::fmt::{Debug, Formatter};
use core::mem::size_of;

use crate::error::{FsError, Result};
use crate::BLOCK_SIZE;

pub type BlockId = u32;

/// Direct block pointers per inode
pub const NDIRECT: usize = 100;
/// Block ids held by the indirect block
pub const NINDIRECT: usize = BLOCK_SIZE / size_of::<BlockId>();
/// Largest file, in blocks
pub const MAXFILE: usize = NDIRECT + NINDIRECT;
pub const MAXFILE_BYTES: usize = MAXFILE * BLOCK_SIZE;

/// type(2) pad(2) size(4) atime(4) mtime(4) ctime(4) direct(4 * NDIRECT) indirect(4)
pub const INODE_SIZE: usize = 20 + 4 * NDIRECT + 4;

const TYPE_OFFSET: usize = 0;
const SIZE_OFFSET: usize = 4;
const ATIME_OFFSET: usize = 8;
const MTIME_OFFSET: usize = 12;
const CTIME_OFFSET: usize = 16;
const DIRECT_OFFSET: usize = 20;
const INDIRECT_OFFSET: usize = DIRECT_OFFSET + 4 * NDIRECT;

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(word)
}

fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Computed at construction and never written to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlock {
    /// Total bytes
    pub size: u32,
    pub nblocks: u32,
    pub ninodes: u32,
}

impl SuperBlock {
    pub fn new(nblocks: u32, ninodes: u32) -> Self {
        Self {
            size: nblocks * BLOCK_SIZE as u32,
            nblocks,
            ninodes,
        }
    }
}

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeType {
    Unused = 0,
    Directory = 1,
    File = 2,
}

impl TryFrom<u16> for InodeType {
    type Error = FsError;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            0 => Ok(InodeType::Unused),
            1 => Ok(InodeType::Directory),
            2 => Ok(InodeType::File),
            _ => Err(FsError::Inconsistent),
        }
    }
}

/// Inode record as stored in its dedicated inode-table block.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DiskInode {
    pub type_: InodeType,
    /// file's total bytes
    pub size: u32,
    pub atime: u32,
    pub mtime: u32,
    pub ctime: u32,
    pub direct: [BlockId; NDIRECT],
    pub indirect: BlockId,
}

impl Debug for DiskInode {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DiskInode")
            .field("type", &self.type_)
            .field("size", &self.size)
            .field("atime", &self.atime)
            .field("mtime", &self.mtime)
            .field("ctime", &self.ctime)
            .field("blocks", &self.data_blocks())
            .field("indirect", &self.indirect)
            .finish()
    }
}

impl DiskInode {
    pub fn new(type_: InodeType, now: u32) -> Self {
        Self {
            type_,
            size: 0,
            atime: now,
            mtime: now,
            ctime: now,
            direct: [0; NDIRECT],
            indirect: 0,
        }
    }

    /// Number of logical blocks holding data
    pub fn data_blocks(&self) -> u32 {
        Self::_data_blocks(self.size)
    }

    pub fn _data_blocks(size: u32) -> u32 {
        ((size as u64 + BLOCK_SIZE as u64 - 1) / BLOCK_SIZE as u64) as u32
    }

    /// Number of blocks owned at `size`, the indirect block included.
    pub fn total_blocks(size: u32) -> u32 {
        let data_blocks = Self::_data_blocks(size);
        if data_blocks as usize > NDIRECT {
            data_blocks + 1
        } else {
            data_blocks
        }
    }

    /// Blocks the allocator must supply to grow from the current size to `new_size`.
    pub fn blocks_num_needed(&self, new_size: u32) -> u32 {
        Self::total_blocks(new_size).saturating_sub(Self::total_blocks(self.size))
    }

    pub fn encode(&self, buf: &mut [u8]) {
        assert!(buf.len() >= INODE_SIZE);
        buf[TYPE_OFFSET..TYPE_OFFSET + 2].copy_from_slice(&(self.type_ as u16).to_le_bytes());
        buf[TYPE_OFFSET + 2..SIZE_OFFSET].fill(0);
        write_u32(buf, SIZE_OFFSET, self.size);
        write_u32(buf, ATIME_OFFSET, self.atime);
        write_u32(buf, MTIME_OFFSET, self.mtime);
        write_u32(buf, CTIME_OFFSET, self.ctime);
        for (i, &block_id) in self.direct.iter().enumerate() {
            write_u32(buf, DIRECT_OFFSET + 4 * i, block_id);
        }
        write_u32(buf, INDIRECT_OFFSET, self.indirect);
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        assert!(buf.len() >= INODE_SIZE);
        let type_ = InodeType::try_from(u16::from_le_bytes([buf[TYPE_OFFSET], buf[TYPE_OFFSET + 1]]))?;
        let mut direct = [0; NDIRECT];
        for (i, block_id) in direct.iter_mut().enumerate() {
            *block_id = read_u32(buf, DIRECT_OFFSET + 4 * i);
        }
        Ok(Self {
            type_,
            size: read_u32(buf, SIZE_OFFSET),
            atime: read_u32(buf, ATIME_OFFSET),
            mtime: read_u32(buf, MTIME_OFFSET),
            ctime: read_u32(buf, CTIME_OFFSET),
            direct,
            indirect: read_u32(buf, INDIRECT_OFFSET),
        })
    }
}

/// Block that stores the block ids of logical indices `NDIRECT..MAXFILE`
pub struct IndirectBlock([u8; BLOCK_SIZE]);

impl IndirectBlock {
    pub fn empty() -> Self {
        Self([0; BLOCK_SIZE])
    }

    pub fn from_bytes(bytes: [u8; BLOCK_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; BLOCK_SIZE] {
        &self.0
    }

    pub fn get(&self, entry: usize) -> BlockId {
        assert!(entry < NINDIRECT);
        read_u32(&self.0, entry * size_of::<BlockId>())
    }

    pub fn set(&mut self, entry: usize, block_id: BlockId) {
        assert!(entry < NINDIRECT);
        write_u32(&mut self.0, entry * size_of::<BlockId>(), block_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants() {
        assert_eq!(NINDIRECT, 128);
        assert_eq!(MAXFILE, 228);
        assert_eq!(MAXFILE_BYTES, 228 * 512);
        assert!(INODE_SIZE <= BLOCK_SIZE);
    }

    #[test]
    fn inode_record_layout() {
        let mut inode = DiskInode::new(InodeType::Directory, 7);
        inode.size = 0x0102_0304;
        inode.direct[0] = 1035;
        inode.direct[NDIRECT - 1] = 0xdead_beef;
        inode.indirect = 4242;
        let mut buf = [0xffu8; BLOCK_SIZE];
        inode.encode(&mut buf);

        assert_eq!(&buf[0..4], &[1, 0, 0, 0]);
        assert_eq!(&buf[4..8], &[4, 3, 2, 1]);
        assert_eq!(&buf[8..12], &7u32.to_le_bytes());
        assert_eq!(&buf[20..24], &1035u32.to_le_bytes());
        assert_eq!(&buf[INDIRECT_OFFSET..INDIRECT_OFFSET + 4], &4242u32.to_le_bytes());
        // bytes past the record are left alone
        assert_eq!(buf[INODE_SIZE], 0xff);

        assert_eq!(DiskInode::decode(&buf).unwrap(), inode);
    }

    #[test]
    fn zeroed_record_is_unused() {
        let buf = [0u8; BLOCK_SIZE];
        let inode = DiskInode::decode(&buf).unwrap();
        assert_eq!(inode.type_, InodeType::Unused);
        assert_eq!(inode.size, 0);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let mut buf = [0u8; BLOCK_SIZE];
        buf[0] = 9;
        assert_eq!(DiskInode::decode(&buf), Err(FsError::Inconsistent));
    }

    #[test]
    fn indirect_entries() {
        let mut block = IndirectBlock::empty();
        block.set(0, 1100);
        block.set(NINDIRECT - 1, 0x0a0b_0c0d);
        assert_eq!(block.get(0), 1100);
        assert_eq!(block.get(1), 0);
        assert_eq!(block.get(NINDIRECT - 1), 0x0a0b_0c0d);
        assert_eq!(&block.as_bytes()[BLOCK_SIZE - 4..], &[0x0d, 0x0c, 0x0b, 0x0a]);

        let copy = IndirectBlock::from_bytes(*block.as_bytes());
        assert_eq!(copy.get(0), 1100);
    }

    #[test]
    fn block_accounting() {
        assert_eq!(DiskInode::_data_blocks(0), 0);
        assert_eq!(DiskInode::_data_blocks(1), 1);
        assert_eq!(DiskInode::_data_blocks(512), 1);
        assert_eq!(DiskInode::_data_blocks(513), 2);
        assert_eq!(DiskInode::total_blocks((NDIRECT * BLOCK_SIZE) as u32), NDIRECT as u32);
        assert_eq!(DiskInode::total_blocks((NDIRECT * BLOCK_SIZE + 1) as u32), NDIRECT as u32 + 2);

        let mut inode = DiskInode::new(InodeType::File, 0);
        inode.size = (NDIRECT * BLOCK_SIZE) as u32;
        assert_eq!(inode.blocks_num_needed((NDIRECT * BLOCK_SIZE + 10) as u32), 2);
        assert_eq!(inode.blocks_num_needed(0), 0);
    }
}
