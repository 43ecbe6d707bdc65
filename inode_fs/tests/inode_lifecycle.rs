mod common;

use common::{fresh_store, payload, small_store};
use inode_fs::{FsError, InodeType, BLOCK_SIZE, INODE_NUM, NDIRECT, ROOT_INUM};

#[test]
fn ids_zero_and_one_are_never_handed_out() {
    let (mut im, _clock) = fresh_store(0);
    let mut ids = Vec::new();
    for i in 0..INODE_NUM - 2 {
        let type_ = if i % 2 == 0 { InodeType::File } else { InodeType::Directory };
        ids.push(im.alloc_inode(type_).unwrap());
    }
    assert_eq!(ids.first(), Some(&2));
    assert_eq!(ids.last(), Some(&(INODE_NUM - 1)));
    assert!(ids.iter().all(|&id| id > ROOT_INUM));
    assert_eq!(im.alloc_inode(InodeType::File), Err(FsError::ResourceExhausted));
    assert_eq!(im.num_free_inodes(), 0);
    im.check().unwrap();
}

#[test]
fn alloc_rejects_the_unused_type() {
    let (mut im, _clock) = fresh_store(0);
    assert_eq!(im.alloc_inode(InodeType::Unused), Err(FsError::InvalidArgument));
    assert_eq!(im.num_free_inodes(), INODE_NUM as usize - 2);
}

#[test]
fn fresh_inode_is_empty_and_stamped() {
    let (mut im, clock) = fresh_store(500);
    clock.advance(20);
    let inum = im.alloc_inode(InodeType::Directory).unwrap();
    let attr = im.getattr(inum).unwrap();
    assert_eq!(attr.type_, InodeType::Directory);
    assert_eq!(attr.size, 0);
    assert_eq!((attr.atime, attr.mtime, attr.ctime), (520, 520, 520));
    assert_eq!(im.read_file(inum).unwrap(), Vec::<u8>::new());

    let root = im.getattr(ROOT_INUM).unwrap();
    assert_eq!(root.type_, InodeType::Directory);
    assert_eq!(root.ctime, 500);
}

#[test]
fn freed_id_is_reused() {
    let (mut im, _clock) = fresh_store(0);
    assert_eq!(im.alloc_inode(InodeType::File), Ok(2));
    im.write_file(2, b"hello").unwrap();
    im.free_inode(2).unwrap();
    assert_eq!(im.getattr(2), Err(FsError::InvalidId));
    assert_eq!(im.read_file(2), Err(FsError::InvalidId));
    assert_eq!(im.alloc_inode(InodeType::File), Ok(2));
    assert_eq!(im.getattr(2).unwrap().size, 0);
    assert_eq!(im.alloc_inode(InodeType::File), Ok(3));
    im.check().unwrap();
}

#[test]
fn bad_frees_are_reported() {
    let (mut im, _clock) = fresh_store(0);
    assert_eq!(im.free_inode(0), Err(FsError::InvalidId));
    assert_eq!(im.free_inode(INODE_NUM), Err(FsError::InvalidId));
    assert_eq!(im.free_inode(5), Err(FsError::DoubleFree));

    let inum = im.alloc_inode(InodeType::File).unwrap();
    im.free_inode(inum).unwrap();
    assert_eq!(im.free_inode(inum), Err(FsError::DoubleFree));
    assert_eq!(im.num_free_inodes(), INODE_NUM as usize - 2);
    im.check().unwrap();
}

#[test]
fn root_cannot_be_freed() {
    let (mut im, _clock) = fresh_store(0);
    im.resize_inode(InodeType::Directory, ROOT_INUM, 700).unwrap();
    assert_eq!(im.free_inode(ROOT_INUM), Err(FsError::InvalidArgument));
    assert_eq!(im.remove_file(ROOT_INUM), Err(FsError::InvalidArgument));
    assert!(im.is_inode_in_use(ROOT_INUM));
    let root = im.getattr(ROOT_INUM).unwrap();
    assert_eq!((root.type_, root.size), (InodeType::Directory, 700));
}

#[test]
fn free_releases_direct_indirect_and_mapped_blocks() {
    let (mut im, _clock) = fresh_store(0);
    let before = im.block_allocator().num_free_blocks();
    let inum = im.alloc_inode(InodeType::File).unwrap();
    im.write_file(inum, &payload(NDIRECT * BLOCK_SIZE + 10, 1)).unwrap();
    assert_eq!(im.block_allocator().num_free_blocks(), before - (NDIRECT + 1 + 1));
    im.check().unwrap();

    im.free_inode(inum).unwrap();
    assert_eq!(im.block_allocator().num_free_blocks(), before);
    im.check().unwrap();
}

#[test]
fn remove_file_frees_like_free_inode() {
    let mut im = small_store();
    let inum = im.alloc_inode(InodeType::File).unwrap();
    im.write_file(inum, &payload(3 * BLOCK_SIZE, 2)).unwrap();
    assert_eq!(im.block_allocator().num_free_blocks(), 42);
    im.remove_file(inum).unwrap();
    assert_eq!(im.block_allocator().num_free_blocks(), 45);
    assert!(!im.is_inode_in_use(inum));
    assert_eq!(im.remove_file(inum), Err(FsError::DoubleFree));
    im.check().unwrap();
}

#[test]
fn freeing_a_large_file_keeps_bookkeeping_consistent() {
    let (mut im, _clock) = fresh_store(0);
    let a = im.alloc_inode(InodeType::File).unwrap();
    let b = im.alloc_inode(InodeType::File).unwrap();
    im.write_file(a, &payload((NDIRECT + 50) * BLOCK_SIZE, 3)).unwrap();
    im.write_file(b, &payload((NDIRECT + 1) * BLOCK_SIZE + 1, 4)).unwrap();
    im.free_inode(a).unwrap();
    im.check().unwrap();
    // b is untouched by a's release
    assert_eq!(im.read_file(b).unwrap(), payload((NDIRECT + 1) * BLOCK_SIZE + 1, 4));
}

#[test]
fn inode_table_exhaustion_on_a_small_store() {
    let mut im = small_store();
    for _ in 0..14 {
        im.alloc_inode(InodeType::File).unwrap();
    }
    assert_eq!(im.alloc_inode(InodeType::File), Err(FsError::ResourceExhausted));
    im.free_inode(9).unwrap();
    assert_eq!(im.alloc_inode(InodeType::Directory), Ok(9));
    assert_eq!(im.getattr(9).unwrap().type_, InodeType::Directory);
}
