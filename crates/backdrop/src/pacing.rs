use std::time::Duration;

/// Longest interval a positive frame rate maps to.
pub const MAX_FRAME_INTERVAL: Duration = Duration::from_secs(60);

/// Decides which host frame callbacks are allowed to draw.
///
/// Timestamps come from the host's monotonic clock. A tick is admitted only
/// once a full interval has passed since the last admitted one. A late tick
/// carries its overshoot modulo the interval forward, so the admitted cadence
/// stays phase-locked to the target rate.
#[derive(Debug, Clone)]
pub struct FramePacer {
    interval: Option<Duration>,
    last_admitted: Option<Duration>,
}

impl FramePacer {
    /// `fps <= 0` (or not finite) admits every tick. Rates slower than one
    /// frame per [`MAX_FRAME_INTERVAL`] are clamped to it.
    pub fn new(fps: f32) -> Self {
        let interval = (fps.is_finite() && fps > 0.0).then(|| {
            Duration::try_from_secs_f64(1.0 / f64::from(fps))
                .map_or(MAX_FRAME_INTERVAL, |interval| interval.min(MAX_FRAME_INTERVAL))
        });
        // Rates too high to resolve in nanoseconds behave as uncapped.
        let interval = interval.filter(|interval| !interval.is_zero());
        Self {
            interval,
            last_admitted: None,
        }
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Forgets the last admitted frame; the next tick is admitted.
    pub fn reset(&mut self) {
        self.last_admitted = None;
    }

    pub fn admit(&mut self, timestamp: Duration) -> bool {
        let (Some(interval), Some(last)) = (self.interval, self.last_admitted) else {
            self.last_admitted = Some(timestamp);
            return true;
        };
        let elapsed = timestamp.saturating_sub(last);
        if elapsed < interval {
            return false;
        }
        let carry = Duration::from_nanos((elapsed.as_nanos() % interval.as_nanos()) as u64);
        self.last_admitted = Some(timestamp.saturating_sub(carry));
        true
    }

    /// Earliest timestamp at which the next tick would be admitted.
    pub fn next_due(&self) -> Option<Duration> {
        let interval = self.interval?;
        let last = self.last_admitted?;
        last.checked_add(interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: f64) -> Duration {
        Duration::from_secs_f64(v / 1000.0)
    }

    fn us(v: u64) -> Duration {
        Duration::from_micros(v)
    }

    #[test]
    fn first_tick_is_admitted() {
        let mut pacer = FramePacer::new(30.0);
        assert!(pacer.admit(ms(5.0)));
        assert!(!pacer.admit(ms(10.0)));
    }

    #[test]
    fn sixty_hertz_ticks_are_halved() {
        let mut pacer = FramePacer::new(30.0);
        let admitted = (0..60)
            .filter(|i| pacer.admit(us(i * 16_667)))
            .count();
        assert!((29..=31).contains(&admitted), "admitted {admitted}");
    }

    #[test]
    fn late_tick_carries_overshoot() {
        let mut pacer = FramePacer::new(10.0);
        assert!(pacer.admit(ms(0.0)));
        assert!(pacer.admit(ms(130.0)));
        // last admitted = 130 - (130 mod 100) = 100
        assert!(!pacer.admit(ms(199.9)));
        assert!(pacer.admit(ms(200.0)));
    }

    #[test]
    fn early_ticks_never_raise_the_rate() {
        let mut pacer = FramePacer::new(10.0);
        let interval = pacer.interval().expect("capped");
        // 99.9 s of ticks every 99.9 ms against a 100 ms ceiling.
        let admitted = (0..=1_000u64)
            .filter(|i| pacer.admit(us(i * 99_900)))
            .count();
        assert!(admitted <= 1_000, "admitted {admitted}");
        assert_eq!(
            pacer.next_due(),
            pacer.last_admitted.map(|last| last + interval)
        );
    }

    #[test]
    fn vanishing_rates_clamp_to_max_interval() {
        for fps in [1e-30, f32::MIN_POSITIVE, 1e-3] {
            let pacer = FramePacer::new(fps);
            assert_eq!(pacer.interval(), Some(MAX_FRAME_INTERVAL), "fps {fps}");
        }
        assert_eq!(FramePacer::new(f32::NAN).interval(), None);
        assert_eq!(FramePacer::new(f32::INFINITY).interval(), None);
        assert_eq!(FramePacer::new(f32::MAX).interval(), None);
    }

    #[test]
    fn uncapped_admits_everything() {
        let mut pacer = FramePacer::new(0.0);
        assert!(pacer.interval().is_none());
        for i in 0..10 {
            assert!(pacer.admit(ms(i as f64)));
        }
        assert!(pacer.next_due().is_none());
    }

    #[test]
    fn reset_readmits_immediately() {
        let mut pacer = FramePacer::new(30.0);
        assert!(pacer.admit(ms(0.0)));
        pacer.reset();
        assert!(pacer.admit(ms(1.0)));
        let interval = pacer.interval().expect("capped");
        assert_eq!(pacer.next_due(), Some(ms(1.0) + interval));
    }
}
