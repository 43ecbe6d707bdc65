//! Whole-file operations offered to the file service above, and a lock-protected
//! handle for callers that share one store.

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use log::{debug, warn};
use spin::Mutex;

use crate::block_dev::{BlockDevice, MemDisk};
use crate::error::{FsError, Result};
use crate::inode_manager::{InodeManager, ROOT_INUM};
use crate::layout::{InodeType, MAXFILE_BYTES};
use crate::BLOCK_SIZE;

/// Metadata snapshot returned by `getattr`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attr {
    pub type_: InodeType,
    pub size: u32,
    pub atime: u32,
    pub mtime: u32,
    pub ctime: u32,
}

impl<D: BlockDevice> InodeManager<D> {
    /// Whole contents of file `inum`.
    pub fn read_file(&self, inum: u32) -> Result<Vec<u8>> {
        let inode = self.load_inode(inum)?;
        let size = inode.size as usize;
        let mut buf = vec![0u8; size];
        let full_blocks = size / BLOCK_SIZE;
        let remainder = size % BLOCK_SIZE;
        for (i, chunk) in buf.chunks_exact_mut(BLOCK_SIZE).enumerate() {
            self.bm.read_block(self.inode_get_block_id(&inode, i as u32)?, chunk);
        }
        if remainder != 0 {
            let mut block = [0u8; BLOCK_SIZE];
            self.bm
                .read_block(self.inode_get_block_id(&inode, full_blocks as u32)?, &mut block);
            buf[full_blocks * BLOCK_SIZE..].copy_from_slice(&block[..remainder]);
        }
        debug!("read_file: {} bytes from inode {}", size, inum);
        Ok(buf)
    }

    /// Replaces the contents of `inum` with `data`, resizing it first. The inode is
    /// stored as a file afterwards, and an unused slot becomes a new file.
    pub fn write_file(&mut self, inum: u32, data: &[u8]) -> Result<()> {
        if data.len() > MAXFILE_BYTES {
            warn!("write_file: {} bytes exceed the file size limit", data.len());
            return Err(FsError::InvalidArgument);
        }
        self.resize_inode(InodeType::File, inum, data.len())?;
        let inode = self.load_inode(inum)?;

        let full_blocks = data.len() / BLOCK_SIZE;
        for (i, chunk) in data.chunks_exact(BLOCK_SIZE).enumerate() {
            let block_id = self.inode_get_block_id(&inode, i as u32)?;
            self.bm.write_block(block_id, chunk);
        }
        let tail = &data[full_blocks * BLOCK_SIZE..];
        if !tail.is_empty() {
            let mut block = [0u8; BLOCK_SIZE];
            block[..tail.len()].copy_from_slice(tail);
            let block_id = self.inode_get_block_id(&inode, full_blocks as u32)?;
            self.bm.write_block(block_id, &block);
        }
        debug!("write_file: {} bytes to inode {}", data.len(), inum);
        Ok(())
    }

    pub fn getattr(&self, inum: u32) -> Result<Attr> {
        let inode = self.load_inode(inum)?;
        Ok(Attr {
            type_: inode.type_,
            size: inode.size,
            atime: inode.atime,
            mtime: inode.mtime,
            ctime: inode.ctime,
        })
    }

    /// Frees the inode and its blocks. Dropping the name that led here is the
    /// caller's business.
    pub fn remove_file(&mut self, inum: u32) -> Result<()> {
        self.free_inode(inum)
    }

    pub fn into_shared(self) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(self))
    }

    pub fn root_inode(fs: &Arc<Mutex<Self>>) -> Inode<D> {
        Inode::new(ROOT_INUM, Arc::clone(fs))
    }

    /// Allocates a new inode and returns a handle to it.
    pub fn create(fs: &Arc<Mutex<Self>>, type_: InodeType) -> Result<Inode<D>> {
        let inum = fs.lock().alloc_inode(type_)?;
        Ok(Inode::new(inum, Arc::clone(fs)))
    }

    /// Handle to an existing inode.
    pub fn open(fs: &Arc<Mutex<Self>>, inum: u32) -> Result<Inode<D>> {
        fs.lock().load_inode(inum)?;
        Ok(Inode::new(inum, Arc::clone(fs)))
    }
}

/// Handle to one inode of a shared store. Every call holds the store lock for the
/// duration of a single operation.
pub struct Inode<D: BlockDevice = MemDisk> {
    inum: u32,
    fs: Arc<Mutex<InodeManager<D>>>,
}

impl<D: BlockDevice> Clone for Inode<D> {
    fn clone(&self) -> Self {
        Self::new(self.inum, Arc::clone(&self.fs))
    }
}

impl<D: BlockDevice> Inode<D> {
    fn new(inum: u32, fs: Arc<Mutex<InodeManager<D>>>) -> Self {
        Self { inum, fs }
    }

    pub fn inum(&self) -> u32 {
        self.inum
    }

    pub fn read_all(&self) -> Result<Vec<u8>> {
        self.fs.lock().read_file(self.inum)
    }

    pub fn write_all(&self, data: &[u8]) -> Result<()> {
        self.fs.lock().write_file(self.inum, data)
    }

    pub fn attr(&self) -> Result<Attr> {
        self.fs.lock().getattr(self.inum)
    }

    /// Truncates or extends, new bytes read as zero.
    pub fn set_size(&self, size: usize) -> Result<()> {
        let mut fs = self.fs.lock();
        let type_ = fs.load_inode(self.inum)?.type_;
        fs.resize_inode(type_, self.inum, size)
    }

    pub fn remove(self) -> Result<()> {
        self.fs.lock().remove_file(self.inum)
    }
}
