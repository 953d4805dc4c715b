//! Relative-motion coalescing and the idle heartbeat.

use std::time::{Duration, Instant};

/// Default minimum spacing between opportunistic flushes.
pub const DEFAULT_MIN_FLUSH_INTERVAL: Duration = Duration::from_micros(5_000);

/// Default idle time before a heartbeat burst starts.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default number of motion steps in one heartbeat burst.
pub const DEFAULT_HEARTBEAT_BURST: u32 = 5;

// ── Coalescer ─────────────────────────────────────────────────────────────────

/// Sums relative motion between flushes.
///
/// The accumulator is `i32` and saturates; a flush clamps it into the `i16`
/// wire field and resets it to zero.
#[derive(Debug, Clone)]
pub struct MotionCoalescer {
    dx: i32,
    dy: i32,
    last_flush: Option<Instant>,
    min_interval: Duration,
}

impl MotionCoalescer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            dx: 0,
            dy: 0,
            last_flush: None,
            min_interval,
        }
    }

    /// Adds one motion sample.
    pub fn add(&mut self, dx: i32, dy: i32) {
        self.dx = self.dx.saturating_add(dx);
        self.dy = self.dy.saturating_add(dy);
    }

    /// The unflushed delta.
    pub fn pending(&self) -> (i32, i32) {
        (self.dx, self.dy)
    }

    pub fn is_empty(&self) -> bool {
        self.dx == 0 && self.dy == 0
    }

    /// Flushes if there is motion and at least `min_interval` has passed
    /// since the previous flush.
    pub fn try_flush(&mut self, now: Instant) -> Option<(i16, i16)> {
        if self.is_empty() {
            return None;
        }
        if let Some(last) = self.last_flush {
            if now.saturating_duration_since(last) < self.min_interval {
                return None;
            }
        }
        Some(self.take(now))
    }

    /// Flushes any pending motion regardless of the interval.
    pub fn force_flush(&mut self, now: Instant) -> Option<(i16, i16)> {
        if self.is_empty() {
            return None;
        }
        Some(self.take(now))
    }

    /// Drops pending motion without emitting it.
    pub fn discard(&mut self) {
        self.dx = 0;
        self.dy = 0;
    }

    fn take(&mut self, now: Instant) -> (i16, i16) {
        let delta = (clamp_to_i16(self.dx), clamp_to_i16(self.dy));
        self.discard();
        self.last_flush = Some(now);
        delta
    }
}

impl Default for MotionCoalescer {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_FLUSH_INTERVAL)
    }
}

fn clamp_to_i16(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

// ── Heartbeat ─────────────────────────────────────────────────────────────────

/// Idle keep-alive for the target host while control is local.
///
/// After `interval` without a mode change, [`Heartbeat::poll`] yields a burst
/// of `burst_len` one-pixel moves with alternating sign, one per call.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    enabled: bool,
    interval: Duration,
    burst_len: u32,
    remaining: u32,
    last: Option<Instant>,
}

impl Heartbeat {
    pub fn new(interval: Duration, burst_len: u32) -> Self {
        Self {
            enabled: burst_len > 0,
            interval,
            burst_len,
            remaining: 0,
            last: None,
        }
    }

    /// A heartbeat that never fires.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(DEFAULT_HEARTBEAT_INTERVAL, 0)
        }
    }

    /// Returns the next burst step due at `now`, if any.
    ///
    /// The idle timer starts on the first call and restarts whenever a
    /// burst begins.
    pub fn poll(&mut self, now: Instant) -> Option<(i16, i16)> {
        if !self.enabled {
            return None;
        }
        if self.remaining == 0 {
            let last = *self.last.get_or_insert(now);
            if now.saturating_duration_since(last) < self.interval {
                return None;
            }
            self.remaining = self.burst_len;
            self.last = Some(now);
        }

        let step = if self.remaining % 2 == 0 { 1 } else { -1 };
        self.remaining -= 1;
        Some((step, step))
    }

    /// `true` while a burst has steps left.
    pub fn is_active(&self) -> bool {
        self.remaining > 0
    }

    /// Abandons any remaining burst steps.
    pub fn cancel(&mut self) {
        self.remaining = 0;
    }

    /// Abandons the burst and restarts the idle timer at `now`.
    pub fn reset(&mut self, now: Instant) {
        self.remaining = 0;
        self.last = Some(now);
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_BURST)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_sum_into_a_single_flush() {
        // Arrange
        let mut coalescer = MotionCoalescer::default();
        let t0 = Instant::now();
        for (dx, dy) in [(3, -1), (4, 2), (-2, 5), (10, 0)] {
            coalescer.add(dx, dy);
        }

        // Act
        let flushed = coalescer.try_flush(t0);

        // Assert
        assert_eq!(flushed, Some((15, 6)));
        assert!(coalescer.is_empty(), "flush must reset the accumulator");
    }

    #[test]
    fn test_flush_clamps_instead_of_wrapping() {
        let mut coalescer = MotionCoalescer::default();
        for _ in 0..5 {
            coalescer.add(10_000, -10_000);
        }
        assert_eq!(coalescer.force_flush(Instant::now()), Some((i16::MAX, i16::MIN)));
    }

    #[test]
    fn test_accumulator_saturates_at_i32_bounds() {
        let mut coalescer = MotionCoalescer::default();
        coalescer.add(i32::MAX, i32::MIN);
        coalescer.add(1, -1);
        assert_eq!(coalescer.pending(), (i32::MAX, i32::MIN));
    }

    #[test]
    fn test_try_flush_respects_min_interval() {
        // Arrange
        let mut coalescer = MotionCoalescer::new(Duration::from_micros(5_000));
        let t0 = Instant::now();
        coalescer.add(1, 1);
        assert!(coalescer.try_flush(t0).is_some());

        // Act
        coalescer.add(2, 2);
        let too_soon = coalescer.try_flush(t0 + Duration::from_micros(4_999));
        let on_time = coalescer.try_flush(t0 + Duration::from_micros(5_000));

        // Assert
        assert_eq!(too_soon, None);
        assert_eq!(on_time, Some((2, 2)));
    }

    #[test]
    fn test_force_flush_ignores_min_interval() {
        let mut coalescer = MotionCoalescer::default();
        let t0 = Instant::now();
        coalescer.add(1, 0);
        coalescer.try_flush(t0);
        coalescer.add(0, 7);
        assert_eq!(coalescer.force_flush(t0), Some((0, 7)));
    }

    #[test]
    fn test_empty_coalescer_never_flushes() {
        let mut coalescer = MotionCoalescer::default();
        assert_eq!(coalescer.try_flush(Instant::now()), None);
        assert_eq!(coalescer.force_flush(Instant::now()), None);
    }

    #[test]
    fn test_motion_that_cancels_out_is_not_flushed() {
        let mut coalescer = MotionCoalescer::default();
        coalescer.add(5, -3);
        coalescer.add(-5, 3);
        assert_eq!(coalescer.try_flush(Instant::now()), None);
    }

    #[test]
    fn test_heartbeat_waits_for_interval_then_bursts() {
        // Arrange
        let mut heartbeat = Heartbeat::new(Duration::from_secs(30), 5);
        let t0 = Instant::now();

        // Act / Assert
        assert_eq!(heartbeat.poll(t0), None);
        assert_eq!(heartbeat.poll(t0 + Duration::from_secs(29)), None);

        let start = t0 + Duration::from_secs(30);
        let burst: Vec<_> = (0..5).map(|_| heartbeat.poll(start).unwrap()).collect();
        assert_eq!(burst, vec![(-1, -1), (1, 1), (-1, -1), (1, 1), (-1, -1)]);
        assert!(!heartbeat.is_active());
        assert_eq!(heartbeat.poll(start), None, "timer restarts after a burst");
    }

    #[test]
    fn test_heartbeat_cancel_stops_burst_midway() {
        let mut heartbeat = Heartbeat::new(Duration::from_secs(1), 5);
        let t0 = Instant::now();
        heartbeat.poll(t0);
        heartbeat.poll(t0 + Duration::from_secs(1));
        assert!(heartbeat.is_active());

        heartbeat.cancel();

        assert!(!heartbeat.is_active());
        assert_eq!(heartbeat.poll(t0 + Duration::from_secs(1)), None);
    }

    #[test]
    fn test_heartbeat_reset_restarts_idle_timer() {
        let mut heartbeat = Heartbeat::new(Duration::from_secs(10), 2);
        let t0 = Instant::now();
        heartbeat.poll(t0);
        heartbeat.reset(t0 + Duration::from_secs(9));
        assert_eq!(heartbeat.poll(t0 + Duration::from_secs(10)), None);
        assert!(heartbeat.poll(t0 + Duration::from_secs(19)).is_some());
    }

    #[test]
    fn test_disabled_heartbeat_never_fires() {
        let mut heartbeat = Heartbeat::disabled();
        let t0 = Instant::now();
        heartbeat.poll(t0);
        assert_eq!(heartbeat.poll(t0 + Duration::from_secs(3_600)), None);
    }
}
