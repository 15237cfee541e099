/// Single-pole low-pass filter over the pointer position.
///
/// Each [`step`](Self::step) moves the smoothed value a fixed fraction of the
/// way towards the latest raw sample. The result never passes the target, so
/// convergence is monotone per axis.
#[derive(Debug, Clone, PartialEq)]
pub struct PointerSmoother {
    raw: [f32; 2],
    smoothed: [f32; 2],
    factor: f32,
}

impl PointerSmoother {
    /// Factors outside `(0, 1]` are clamped; non-finite ones fall back to one.
    pub fn new(factor: f32) -> Self {
        let factor = if factor.is_finite() {
            factor.clamp(f32::MIN_POSITIVE, 1.0)
        } else {
            1.0
        };
        Self {
            raw: [0.0; 2],
            smoothed: [0.0; 2],
            factor,
        }
    }

    pub fn factor(&self) -> f32 {
        self.factor
    }

    /// Records the latest pointer sample. Non-finite samples are ignored.
    pub fn set_target(&mut self, x: f32, y: f32) {
        if x.is_finite() && y.is_finite() {
            self.raw = [x, y];
        }
    }

    pub fn target(&self) -> [f32; 2] {
        self.raw
    }

    pub fn value(&self) -> [f32; 2] {
        self.smoothed
    }

    pub fn step(&mut self) -> [f32; 2] {
        for axis in 0..2 {
            let from = self.smoothed[axis];
            let to = self.raw[axis];
            let next = from + (to - from) * self.factor;
            self.smoothed[axis] = if from <= to {
                next.clamp(from, to)
            } else {
                next.clamp(to, from)
            };
        }
        self.smoothed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converges_monotonically_without_overshoot() {
        let mut smoother = PointerSmoother::new(0.05);
        smoother.set_target(400.0, -120.0);
        let mut previous = smoother.value();
        for _ in 0..500 {
            let current = smoother.step();
            assert!(current[0] >= previous[0] && current[0] <= 400.0);
            assert!(current[1] <= previous[1] && current[1] >= -120.0);
            previous = current;
        }
        assert!((previous[0] - 400.0).abs() < 1e-3);
        assert!((previous[1] + 120.0).abs() < 1e-3);
    }

    #[test]
    fn first_step_covers_the_factor() {
        let mut smoother = PointerSmoother::new(0.05);
        smoother.set_target(100.0, 0.0);
        assert_eq!(smoother.step(), [5.0, 0.0]);
    }

    #[test]
    fn factor_is_clamped() {
        assert_eq!(PointerSmoother::new(3.0).factor(), 1.0);
        assert_eq!(PointerSmoother::new(f32::NAN).factor(), 1.0);
        assert!(PointerSmoother::new(-1.0).factor() > 0.0);
    }

    #[test]
    fn non_finite_samples_are_dropped() {
        let mut smoother = PointerSmoother::new(1.0);
        smoother.set_target(10.0, 20.0);
        smoother.set_target(f32::INFINITY, 0.0);
        assert_eq!(smoother.step(), [10.0, 20.0]);
    }
}
