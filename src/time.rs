//! Millisecond bookkeeping for the poll loop.
//!
//! Time is a free-running `u32` millisecond counter supplied by the caller on
//! every `update`. It wraps after ~49 days, so every comparison goes through
//! `wrapping_sub`.

/// Milliseconds elapsed from `since` to `now`, wrap-safe.
#[inline]
pub fn elapsed(now: u32, since: u32) -> u32 {
    now.wrapping_sub(since)
}

/// A restartable stopwatch, e.g. "time since entering this state".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stopwatch {
    started: u32,
}

impl Stopwatch {
    pub const fn started_at(now: u32) -> Self {
        Self { started: now }
    }

    pub fn restart(&mut self, now: u32) {
        self.started = now;
    }

    pub fn elapsed(&self, now: u32) -> u32 {
        elapsed(now, self.started)
    }

    /// True once more than `ms` have passed since the last restart.
    pub fn expired(&self, now: u32, ms: u32) -> bool {
        self.elapsed(now) > ms
    }

    pub fn started(&self) -> u32 {
        self.started
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_survives_wraparound() {
        assert_eq!(elapsed(5, u32::MAX - 4), 10);
        let sw = Stopwatch::started_at(u32::MAX - 10);
        assert!(!sw.expired(5, 16));
        assert!(sw.expired(6, 16));
    }
}
