use crate::block_dev::BlockDevice;
use crate::config::Geometry;
use crate::BLOCK_SIZE;

const BLOCK_BITS: usize = BLOCK_SIZE * 8;
const WORDS_PER_BLOCK: usize = BLOCK_SIZE / core::mem::size_of::<u64>();

/// Usage bits kept in the bitmap region of the store, bit `id` for block `id`.
pub struct Bitmap {
    geometry: Geometry,
}

/// Decoded image of one bitmap block
struct BitmapBlock([u64; WORDS_PER_BLOCK]);

impl BitmapBlock {
    fn load(block_device: &impl BlockDevice, block_id: usize) -> Self {
        let mut buf = [0u8; BLOCK_SIZE];
        block_device.read_block(block_id, &mut buf);
        let mut words = [0u64; WORDS_PER_BLOCK];
        for (word, bytes) in words.iter_mut().zip(buf.chunks_exact(8)) {
            let mut le = [0u8; 8];
            le.copy_from_slice(bytes);
            *word = u64::from_le_bytes(le);
        }
        Self(words)
    }

    fn store(&self, block_device: &mut impl BlockDevice, block_id: usize) {
        let mut buf = [0u8; BLOCK_SIZE];
        for (word, bytes) in self.0.iter().zip(buf.chunks_exact_mut(8)) {
            bytes.copy_from_slice(&word.to_le_bytes());
        }
        block_device.write_block(block_id, &buf);
    }
}

impl Bitmap {
    pub fn new(geometry: Geometry) -> Self {
        Self { geometry }
    }

    /// (block_id, bits64_pos, inner_pos)
    fn decompose(&self, id: usize) -> (usize, usize, usize) {
        assert!(
            id < self.geometry.block_num() as usize,
            "bit {} is outside the bitmap",
            id
        );
        let block_id = self.geometry.bitmap_block(id as u32) as usize;
        (block_id, (id % BLOCK_BITS) / 64, (id % BLOCK_BITS) % 64)
    }

    /// Bitmap block number `block_pos`, counted from the start of the region
    fn block_id_of(&self, block_pos: usize) -> usize {
        self.geometry.bitmap_block((block_pos * BLOCK_BITS) as u32) as usize
    }

    pub fn test(&self, block_device: &impl BlockDevice, id: usize) -> bool {
        let (block_id, bits64_pos, inner_pos) = self.decompose(id);
        let bitmap_block = BitmapBlock::load(block_device, block_id);
        bitmap_block.0[bits64_pos] & (1u64 << inner_pos) != 0
    }

    /// Sets the bit and returns its previous value.
    pub fn set(&self, block_device: &mut impl BlockDevice, id: usize) -> bool {
        self.update(block_device, id, true)
    }

    /// Clears the bit and returns its previous value.
    pub fn clear(&self, block_device: &mut impl BlockDevice, id: usize) -> bool {
        self.update(block_device, id, false)
    }

    fn update(&self, block_device: &mut impl BlockDevice, id: usize, value: bool) -> bool {
        let (block_id, bits64_pos, inner_pos) = self.decompose(id);
        let mut bitmap_block = BitmapBlock::load(block_device, block_id);
        let bits64 = &mut bitmap_block.0[bits64_pos];
        let prev = *bits64 & (1u64 << inner_pos) != 0;
        if prev != value {
            *bits64 ^= 1u64 << inner_pos;
            bitmap_block.store(block_device, block_id);
        }
        prev
    }

    /// Sets bits `0..count`, used to claim the reserved region at construction.
    pub fn set_prefix(&self, block_device: &mut impl BlockDevice, count: usize) {
        let mut block_pos = 0;
        while block_pos * BLOCK_BITS < count {
            let block_id = self.block_id_of(block_pos);
            let mut bitmap_block = BitmapBlock::load(block_device, block_id);
            let first = block_pos * BLOCK_BITS;
            for (bits64_pos, bits64) in bitmap_block.0.iter_mut().enumerate() {
                let base = first + bits64_pos * 64;
                if base >= count {
                    break;
                }
                let n = (count - base).min(64);
                *bits64 |= if n == 64 { u64::MAX } else { (1u64 << n) - 1 };
            }
            bitmap_block.store(block_device, block_id);
            block_pos += 1;
        }
    }

    /// Number of set bits among `0..count`
    pub fn count_ones(&self, block_device: &impl BlockDevice, count: usize) -> usize {
        let mut ones = 0;
        for block_pos in 0..self.geometry.bitmap_blocks() as usize {
            let first = block_pos * BLOCK_BITS;
            if first >= count {
                break;
            }
            let bitmap_block = BitmapBlock::load(block_device, self.block_id_of(block_pos));
            for (bits64_pos, bits64) in bitmap_block.0.iter().enumerate() {
                let base = first + bits64_pos * 64;
                if base >= count {
                    break;
                }
                let n = (count - base).min(64);
                let mask = if n == 64 { u64::MAX } else { (1u64 << n) - 1 };
                ones += (bits64 & mask).count_ones() as usize;
            }
        }
        ones
    }
}
