use crate::types::{DisplaySize, SurfaceSize};

/// Computes the backing-store resolution for a container.
///
/// Each side is `floor(display * max(1, density) * scale)`. A density below
/// one, or one that is not finite, is treated as one. A non-empty display
/// always yields at least one pixel per side so the surface stays drawable.
pub fn backing_resolution(display: DisplaySize, density: f32, scale: f32) -> SurfaceSize {
    if display.is_empty() {
        return SurfaceSize::default();
    }
    let density = if density.is_finite() { density.max(1.0) } else { 1.0 };
    let scale = if scale.is_finite() && scale > 0.0 {
        scale
    } else {
        1.0
    };
    let side = |v: f32| -> u32 {
        if !v.is_finite() {
            return 1;
        }
        let scaled = (v * density * scale).floor();
        if scaled >= u32::MAX as f32 {
            u32::MAX
        } else {
            (scaled as u32).max(1)
        }
    };
    SurfaceSize::new(side(display.width), side(display.height))
}

/// Display geometry of the element the background fills.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSurface {
    display: DisplaySize,
    density: f32,
    scale: f32,
    backing: SurfaceSize,
}

impl RenderSurface {
    pub fn new(display: DisplaySize, density: f32, scale: f32) -> Self {
        let mut surface = Self {
            display: DisplaySize::default(),
            density: 1.0,
            scale,
            backing: SurfaceSize::default(),
        };
        surface.update(display, density);
        surface
    }

    /// Records new container geometry; returns whether the backing size moved.
    pub fn update(&mut self, display: DisplaySize, density: f32) -> bool {
        let display = DisplaySize::new(sanitize(display.width), sanitize(display.height));
        let backing = backing_resolution(display, density, self.scale);
        self.display = display;
        self.density = if density.is_finite() { density.max(1.0) } else { 1.0 };
        let changed = backing != self.backing;
        self.backing = backing;
        changed
    }

    pub fn display(&self) -> DisplaySize {
        self.display
    }

    pub fn density(&self) -> f32 {
        self.density
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn backing(&self) -> SurfaceSize {
        self.backing
    }

    pub fn is_empty(&self) -> bool {
        self.backing.is_empty()
    }
}

fn sanitize(v: f32) -> f32 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn density_two_at_half_scale_matches_css_size() {
        let size = backing_resolution(DisplaySize::new(800.0, 600.0), 2.0, 0.5);
        assert_eq!(size, SurfaceSize::new(800, 600));
    }

    #[test]
    fn low_density_is_clamped_to_one() {
        let size = backing_resolution(DisplaySize::new(800.0, 600.0), 0.5, 0.5);
        assert_eq!(size, SurfaceSize::new(400, 300));
    }

    #[test]
    fn nan_density_falls_back_to_one() {
        let size = backing_resolution(DisplaySize::new(100.0, 50.0), f32::NAN, 1.0);
        assert_eq!(size, SurfaceSize::new(100, 50));
    }

    #[test]
    fn fractional_results_are_floored() {
        let size = backing_resolution(DisplaySize::new(333.0, 101.0), 1.5, 0.5);
        // 333 * 0.75 = 249.75, 101 * 0.75 = 75.75
        assert_eq!(size, SurfaceSize::new(249, 75));
    }

    #[test]
    fn tiny_display_keeps_one_pixel() {
        let size = backing_resolution(DisplaySize::new(1.0, 1.0), 1.0, 0.5);
        assert_eq!(size, SurfaceSize::new(1, 1));
    }

    #[test]
    fn negative_sizes_yield_empty_surface() {
        let mut surface = RenderSurface::new(DisplaySize::new(-10.0, 20.0), 1.0, 0.5);
        assert!(surface.is_empty());
        assert!(surface.update(DisplaySize::new(20.0, 20.0), 1.0));
        assert_eq!(surface.backing(), SurfaceSize::new(10, 10));
        assert!(!surface.update(DisplaySize::new(20.0, 20.0), 1.0));
    }
}
