//! Object-level graphics API the core drives.
//!
//! The trait follows the shape of a classic GL-style context: objects are
//! created empty, filled, linked, bound and finally deleted by handle. The
//! wgpu implementation lives in [`crate::gpu`], a resource-tracking one in
//! [`crate::headless`].

use std::fmt;

use crate::types::SurfaceSize;

macro_rules! object_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            pub fn from_raw(raw: u32) -> Self {
                Self(raw)
            }

            pub fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

object_handle!(
    /// Handle to a single compiled (or compiling) shader stage.
    ShaderId
);
object_handle!(
    /// Handle to a program object that stages are attached to and linked in.
    ProgramId
);
object_handle!(
    /// Handle to a GPU vertex buffer.
    BufferId
);
object_handle!(
    /// Handle to a vertex-layout object binding a buffer to an attribute slot.
    VertexLayoutId
);

/// Pipeline stage a shader object belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Resolved location of a uniform inside a linked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation {
    program: ProgramId,
    slot: u32,
}

impl UniformLocation {
    pub fn new(program: ProgramId, slot: u32) -> Self {
        Self { program, slot }
    }

    pub fn program(&self) -> ProgramId {
        self.program
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
}

/// Failure reported by a draw call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DrawError {
    #[error("surface lost or outdated")]
    Lost,
    #[error("timed out waiting for the next surface texture")]
    Timeout,
    #[error("out of GPU memory")]
    OutOfMemory,
    #[error("{0}")]
    Other(String),
}

/// Graphics objects and commands needed to draw a full-surface shader.
///
/// `create_*` returns `None` when the device cannot allocate the object;
/// `compile_shader` and `link_program` return the backend's diagnostic log on
/// failure. Deleting an unknown or already-deleted handle is a no-op.
pub trait GpuDevice {
    fn create_shader(&mut self, stage: ShaderStage) -> Option<ShaderId>;
    fn compile_shader(&mut self, shader: ShaderId, source: &str) -> Result<(), String>;
    fn delete_shader(&mut self, shader: ShaderId);

    fn create_program(&mut self) -> Option<ProgramId>;
    fn attach_shader(&mut self, program: ProgramId, shader: ShaderId);
    fn link_program(&mut self, program: ProgramId) -> Result<(), String>;
    fn delete_program(&mut self, program: ProgramId);

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;
    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<u32>;

    /// Uploads tightly packed `f32` vertex data.
    fn create_vertex_buffer(&mut self, data: &[f32]) -> Option<BufferId>;
    fn delete_buffer(&mut self, buffer: BufferId);

    fn create_vertex_layout(
        &mut self,
        buffer: BufferId,
        location: u32,
        components: u32,
    ) -> Option<VertexLayoutId>;
    fn delete_vertex_layout(&mut self, layout: VertexLayoutId);

    /// Resizes the backing store and sets the viewport to match, as one step.
    fn resize_surface(&mut self, size: SurfaceSize);

    fn use_program(&mut self, program: ProgramId);
    fn bind_vertex_layout(&mut self, layout: VertexLayoutId);
    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue);
    fn draw_arrays(&mut self, first: u32, count: u32) -> Result<(), DrawError>;
}
