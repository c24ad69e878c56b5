use std::{
    sync::atomic::{AtomicU32, AtomicU64, Ordering},
    time::Duration,
};

/// Decimation step used when nothing else is configured (forward everything).
pub const DEFAULT_REPOST_STEP: u32 = 1;

/// How long an album is allowed to stay idle before it is flushed.
pub const DEFAULT_ALBUM_IDLE: Duration = Duration::from_millis(4_500);

/// Live-mutable runtime settings.
///
/// Both values may change between calls without restart: the admin surface
/// writes them while the polling loops read them. Plain atomics — no lock is
/// ever taken on the hot path.
pub struct RuntimeSettings {
    repost_step: AtomicU32,
    album_idle_ms: AtomicU64,
}

impl RuntimeSettings {
    #[must_use]
    pub fn new(repost_step: u32, album_idle: Duration) -> Self {
        Self {
            repost_step: AtomicU32::new(repost_step.max(1)),
            album_idle_ms: AtomicU64::new(album_idle.as_millis() as u64),
        }
    }

    /// Forward every Nth post. Always ≥ 1.
    pub fn repost_step(&self) -> u32 {
        self.repost_step.load(Ordering::Relaxed)
    }

    /// Values below 1 are clamped to 1.
    pub fn set_repost_step(&self, step: u32) {
        self.repost_step.store(step.max(1), Ordering::Relaxed);
    }

    pub fn album_idle(&self) -> Duration {
        Duration::from_millis(self.album_idle_ms.load(Ordering::Relaxed))
    }

    pub fn set_album_idle(&self, idle: Duration) {
        self.album_idle_ms
            .store(idle.as_millis() as u64, Ordering::Relaxed);
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::new(DEFAULT_REPOST_STEP, DEFAULT_ALBUM_IDLE)
    }
}
