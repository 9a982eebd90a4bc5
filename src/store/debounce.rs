use std::time::Duration;

use instant::Instant;

/// Single-slot write throttle.
///
/// The first deposit arms the slot; further deposits while armed are
/// absorbed. The write fires once `interval` has passed since arming.
pub struct WriteDebouncer {
    interval: Duration,
    armed_at: Option<Instant>,
}

impl WriteDebouncer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            armed_at: None,
        }
    }

    /// Arm the slot if it is idle. Returns true if this call armed it.
    pub fn schedule(&mut self, now: Instant) -> bool {
        if self.armed_at.is_some() {
            return false;
        }
        self.armed_at = Some(now);
        true
    }

    /// True exactly once per armed slot, when the interval has elapsed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.armed_at {
            Some(at) if now.duration_since(at) >= self.interval => {
                self.armed_at = None;
                true
            }
            _ => false,
        }
    }

    /// Disarm without firing; returns whether a write was pending.
    pub fn take(&mut self) -> bool {
        self.armed_at.take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.armed_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_slot() {
        let mut d = WriteDebouncer::new(Duration::from_millis(500));
        let t0 = Instant::now();
        assert!(d.schedule(t0));
        assert!(!d.schedule(t0 + Duration::from_millis(100)));
        assert!(!d.poll(t0 + Duration::from_millis(499)));
        assert!(d.poll(t0 + Duration::from_millis(500)));
        assert!(!d.poll(t0 + Duration::from_millis(900)));
        assert!(!d.is_pending());
    }

    #[test]
    fn take_disarms() {
        let mut d = WriteDebouncer::new(Duration::from_millis(500));
        let t0 = Instant::now();
        assert!(!d.take());
        d.schedule(t0);
        assert!(d.take());
        assert!(!d.poll(t0 + Duration::from_secs(5)));
    }
}
