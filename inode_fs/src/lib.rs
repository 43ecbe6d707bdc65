//! Volatile inode-addressed block store.
//!
//! Layering, leaves first:
//! - `MemDisk`: fixed array of `BLOCK_SIZE` blocks behind the `BlockDevice` trait.
//! - `BlockAllocator`: FIFO free queue over the data region, in-use bits kept in the
//!   bitmap region of the store.
//! - `InodeManager`: inode table, direct + single indirect block addressing, whole-file
//!   read/write/resize.
//!
//! Each layer exclusively owns the one below it. Nothing here locks; wrap the manager
//! with `InodeManager::into_shared` when several callers need it.
#![no_std]
extern crate alloc;

mod bitmap;
mod block_dev;
mod block_manager;
mod clock;
mod config;
mod error;
mod inode_manager;
mod layout;
mod vfs;

pub const BLOCK_SIZE: usize = 512;

pub use block_dev::{BlockDevice, MemDisk};
pub use block_manager::BlockAllocator;
pub use clock::{Clock, ManualClock};
pub use config::*;
pub use error::{FsError, Result};
pub use inode_manager::{InodeManager, ROOT_INUM};
pub use layout::{
    BlockId, DiskInode, IndirectBlock, InodeType, SuperBlock, INODE_SIZE, MAXFILE,
    MAXFILE_BYTES, NDIRECT, NINDIRECT,
};
pub use vfs::{Attr, Inode};
