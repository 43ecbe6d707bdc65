//! Common utilities for tests
#![allow(unused)]

use std::sync::Arc;

use inode_fs::{Geometry, InodeManager, ManualClock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const ORANGE: &str = "\x1b[38;5;214m";
pub const RESET: &str = "\x1b[0m";

/// e.g. log!("wrote {}", n) -> println!("[test] wrote 3");
#[macro_export]
macro_rules! log {
    ($msg:expr) => {
        println!("{}[test] {}{}", crate::common::ORANGE, $msg, crate::common::RESET)
    };
    ($msg:expr, $($arg:tt)*) => {
        println!("{}[test] {}{}", crate::common::ORANGE, format!($msg, $($arg)*), crate::common::RESET)
    };
}

/// Default 16 MiB store; the clock handle stays with the test.
pub fn fresh_store(start: u32) -> (InodeManager, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start));
    (InodeManager::new(Arc::clone(&clock)), clock)
}

/// 64 blocks and 16 inodes, leaving 45 data blocks (19..64).
pub fn small_store() -> InodeManager {
    InodeManager::with_geometry(Geometry::new(64, 16).unwrap(), ManualClock::new(0))
}

pub fn payload(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; len];
    rng.fill(&mut data[..]);
    data
}
