//! Cooperative tick scheduling for the preview loop.

use std::time::{Duration, Instant};

/// Period of the host-health refresh.
pub const STATS_INTERVAL: Duration = Duration::from_secs(1);

/// Preview period for `fps`, truncated to whole milliseconds.
pub fn tick_interval(fps: u32) -> Duration {
    Duration::from_millis(u64::from(1000 / fps.max(1)))
}

/// A fixed-period deadline. Missed deadlines are not caught up: after a
/// late tick the next one is scheduled a full interval later.
#[derive(Debug, Clone)]
pub struct Ticker {
    interval: Duration,
    next: Instant,
}

impl Ticker {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            next: now + interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Changes the period; the next tick is one new interval from `now`.
    pub fn set_interval(&mut self, interval: Duration, now: Instant) {
        self.interval = interval;
        self.next = now + interval;
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.next.saturating_duration_since(now)
    }

    /// Returns `true` and advances the deadline when a tick is due.
    pub fn poll(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        self.next += self.interval;
        if self.next <= now {
            self.next = now + self.interval;
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickKind {
    Preview,
    Stats,
}

/// Single-threaded dispatcher for the preview and stats ticks. Ticks never
/// overlap; when both are due the preview tick goes first.
#[derive(Debug, Clone)]
pub struct Scheduler {
    preview: Ticker,
    stats: Ticker,
}

impl Scheduler {
    pub fn new(target_fps: u32) -> Self {
        let now = Instant::now();
        Self {
            preview: Ticker::new(tick_interval(target_fps), now),
            stats: Ticker::new(STATS_INTERVAL, now),
        }
    }

    pub fn preview_interval(&self) -> Duration {
        self.preview.interval()
    }

    pub fn set_target_fps(&mut self, target_fps: u32) {
        self.preview.set_interval(tick_interval(target_fps), Instant::now());
    }

    pub fn due(&mut self, now: Instant) -> Option<TickKind> {
        if self.preview.poll(now) {
            Some(TickKind::Preview)
        } else if self.stats.poll(now) {
            Some(TickKind::Stats)
        } else {
            None
        }
    }

    /// Blocks until the next tick is due.
    pub fn wait_next(&mut self) -> TickKind {
        loop {
            let now = Instant::now();
            if let Some(kind) = self.due(now) {
                return kind;
            }
            let delay = self.preview.remaining(now).min(self.stats.remaining(now));
            std::thread::sleep(delay);
        }
    }
}

/// Frames-per-second estimate refreshed about once per second.
#[derive(Debug, Clone)]
pub struct FpsMeter {
    window_start: Instant,
    count: u32,
    value: f64,
}

impl FpsMeter {
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
            value: 0.0,
        }
    }

    pub fn record(&mut self, now: Instant) {
        self.count += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= Duration::from_secs(1) {
            self.value = f64::from(self.count) / elapsed.as_secs_f64();
            self.count = 0;
            self.window_start = now;
        }
    }

    pub fn fps(&self) -> f64 {
        self.value
    }
}
