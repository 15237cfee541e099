//! Procedural shader background.
//!
//! Mounts a full-surface animated "swirl" field into a host container and
//! tears it down cleanly. The flow is:
//!
//! ```text
//!   host ──mount──▶ ShaderBackground ──acquire──▶ GraphicsContext ──build──▶ ShaderProgram
//!    │                     │                                                      │
//!    ├─ resize / pointer ─▶ handle_event ─▶ RenderSurface, FrameState             │
//!    └─ frame callback ──▶ on_frame ─▶ RenderLoop::tick ─▶ uniforms + draw_arrays ◀┘
//! ```
//!
//! The host (window, page, test harness) sits behind [`HostEnvironment`] and
//! the GPU behind [`GpuDevice`]. [`window`] and [`gpu`] implement both with
//! winit and wgpu; [`headless`] implements them without a GPU for tests and
//! simulation. [`field`] evaluates the same shader on the CPU.

pub mod clock;
pub mod context;
pub mod device;
pub mod error;
pub mod field;
pub mod glsl;
pub mod gpu;
pub mod headless;
pub mod host;
pub mod lifecycle;
pub mod pacing;
pub mod pointer;
pub mod program;
pub mod quad;
pub mod render_loop;
pub mod shaders;
pub mod still;
pub mod surface;
pub mod types;
pub mod window;

pub use context::GraphicsContext;
pub use device::{DrawError, GpuDevice, ShaderStage};
pub use error::BackgroundError;
pub use field::FieldInputs;
pub use host::{EventKind, FrameToken, HostEnvironment, HostEvent, SubscriptionId};
pub use lifecycle::{BackgroundStatus, ShaderBackground};
pub use render_loop::{AnimationHandle, FrameState, LoopState, TickOutcome};
pub use still::{export_still, render_still};
pub use surface::{backing_resolution, RenderSurface};
pub use types::{
    BackgroundConfig, ContextOptions, DisplaySize, PowerPreference, SurfaceSize,
    DEFAULT_POINTER_SMOOTHING, DEFAULT_TARGET_FPS, SHADER_RESOLUTION_SCALE,
};
pub use window::{run_window, WindowOptions, WinitHost};
