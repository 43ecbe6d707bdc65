use core::sync::atomic::{AtomicU32, Ordering};

/// Source of inode timestamps, in seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> u32;
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU32);

impl ManualClock {
    pub fn new(start: u32) -> Self {
        Self(AtomicU32::new(start))
    }

    pub fn set(&self, now: u32) {
        self.0.store(now, Ordering::Relaxed);
    }

    pub fn advance(&self, secs: u32) {
        self.0.fetch_add(secs, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

impl<C: Clock + ?Sized> Clock for alloc::sync::Arc<C> {
    fn now(&self) -> u32 {
        (**self).now()
    }
}
