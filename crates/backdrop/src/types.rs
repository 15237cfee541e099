/// Default frame-rate ceiling for the render loop.
pub const DEFAULT_TARGET_FPS: f32 = 30.0;

/// Backing-store scale applied to the raymarched background to bound per-pixel cost.
pub const SHADER_RESOLUTION_SCALE: f32 = 0.5;

/// Fraction of the remaining distance the smoothed pointer covers each frame.
pub const DEFAULT_POINTER_SMOOTHING: f32 = 0.05;

/// Container size in display (layout) pixels, before pixel-density scaling.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DisplaySize {
    pub width: f32,
    pub height: f32,
}

impl DisplaySize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// True when either side is zero, negative, or not a number.
    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

/// Backing store dimensions in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Adapter selection hint forwarded to the graphics backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerPreference {
    LowPower,
    #[default]
    HighPerformance,
}

/// Capability hints requested when acquiring a graphics context.
///
/// The defaults mirror what the background needs: no multisampling (the
/// fragment shader covers every pixel anyway), an alpha channel so the
/// surface can composite over the page, and the discrete adapter when one
/// exists.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextOptions {
    /// Passed through to the host; the wgpu backend always draws single-sampled.
    pub antialias: bool,
    pub alpha: bool,
    pub power_preference: PowerPreference,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            antialias: false,
            alpha: true,
            power_preference: PowerPreference::HighPerformance,
        }
    }
}

/// Options fixed when the background is mounted.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundConfig {
    /// Frame-rate ceiling; zero or negative renders on every scheduled frame.
    pub target_fps: f32,
    /// Multiplier applied on top of the pixel density when sizing the backing store.
    pub resolution_scale: f32,
    /// Single-pole filter coefficient for the pointer input, in `(0, 1]`.
    pub pointer_smoothing: f32,
    /// Optional style class forwarded to the host surface.
    pub class_name: Option<String>,
    pub context: ContextOptions,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            target_fps: DEFAULT_TARGET_FPS,
            resolution_scale: SHADER_RESOLUTION_SCALE,
            pointer_smoothing: DEFAULT_POINTER_SMOOTHING,
            class_name: None,
            context: ContextOptions::default(),
        }
    }
}
