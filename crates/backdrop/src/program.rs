use tracing::debug;

use crate::context::{GpuObject, GraphicsContext};
use crate::device::{GpuDevice, ProgramId, ShaderId, ShaderStage, UniformLocation};
use crate::error::BackgroundError;

pub const TIME_UNIFORM: &str = "time";
pub const RESOLUTION_UNIFORM: &str = "resolution";
pub const POINTER_UNIFORM: &str = "move";
pub const POSITION_ATTRIBUTE: &str = "a_position";

/// Input locations resolved once after linking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramInputs {
    pub time: UniformLocation,
    pub resolution: UniformLocation,
    pub pointer: UniformLocation,
    pub position: u32,
}

/// A linked vertex + fragment pair and its cached input locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderProgram {
    id: ProgramId,
    vertex: ShaderId,
    fragment: ShaderId,
    inputs: ProgramInputs,
}

impl ShaderProgram {
    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn vertex(&self) -> ShaderId {
        self.vertex
    }

    pub fn fragment(&self) -> ShaderId {
        self.fragment
    }

    pub fn inputs(&self) -> &ProgramInputs {
        &self.inputs
    }
}

/// Compiles both stages, links them and resolves the background's inputs.
///
/// Every object created along the way is deleted again when any step fails,
/// so a failed build leaves the context as it found it.
pub fn build<D: GpuDevice>(
    ctx: &mut GraphicsContext<D>,
    vertex_source: &str,
    fragment_source: &str,
) -> Result<ShaderProgram, BackgroundError> {
    let vertex = compile_stage(ctx, ShaderStage::Vertex, vertex_source)?;
    let fragment = match compile_stage(ctx, ShaderStage::Fragment, fragment_source) {
        Ok(shader) => shader,
        Err(err) => {
            ctx.delete(GpuObject::Shader(vertex));
            return Err(err);
        }
    };

    let discard_shaders = |ctx: &mut GraphicsContext<D>| {
        ctx.delete(GpuObject::Shader(vertex));
        ctx.delete(GpuObject::Shader(fragment));
    };

    let Some(program) = ctx.create_program() else {
        discard_shaders(ctx);
        return Err(BackgroundError::ProgramLink {
            message: "device could not allocate a program object".into(),
        });
    };
    ctx.attach_shader(program, vertex);
    ctx.attach_shader(program, fragment);

    if let Err(log) = ctx.link_program(program) {
        debug!(%log, "program link log");
        ctx.delete(GpuObject::Program(program));
        discard_shaders(ctx);
        return Err(BackgroundError::ProgramLink { message: log });
    }

    let inputs = match resolve_inputs(ctx, program) {
        Ok(inputs) => inputs,
        Err(err) => {
            ctx.delete(GpuObject::Program(program));
            discard_shaders(ctx);
            return Err(err);
        }
    };

    debug!(program = program.raw(), "shader program linked");
    Ok(ShaderProgram {
        id: program,
        vertex,
        fragment,
        inputs,
    })
}

fn compile_stage<D: GpuDevice>(
    ctx: &mut GraphicsContext<D>,
    stage: ShaderStage,
    source: &str,
) -> Result<ShaderId, BackgroundError> {
    let shader = ctx
        .create_shader(stage)
        .ok_or_else(|| BackgroundError::ShaderCompile {
            stage,
            message: "device could not allocate a shader object".into(),
        })?;
    match ctx.compile_shader(shader, source) {
        Ok(()) => Ok(shader),
        Err(log) => {
            debug!(%stage, %log, "shader compile log");
            ctx.delete(GpuObject::Shader(shader));
            Err(BackgroundError::ShaderCompile {
                stage,
                message: log,
            })
        }
    }
}

fn resolve_inputs<D: GpuDevice>(
    ctx: &GraphicsContext<D>,
    program: ProgramId,
) -> Result<ProgramInputs, BackgroundError> {
    let uniform = |name: &str| {
        ctx.uniform_location(program, name)
            .ok_or_else(|| BackgroundError::MissingInput { name: name.into() })
    };
    Ok(ProgramInputs {
        time: uniform(TIME_UNIFORM)?,
        resolution: uniform(RESOLUTION_UNIFORM)?,
        pointer: uniform(POINTER_UNIFORM)?,
        position: ctx.attribute_location(program, POSITION_ATTRIBUTE).ok_or_else(|| {
            BackgroundError::MissingInput {
                name: POSITION_ATTRIBUTE.into(),
            }
        })?,
    })
}
