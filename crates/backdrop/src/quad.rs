use crate::context::{GpuObject, GraphicsContext};
use crate::device::{BufferId, GpuDevice, VertexLayoutId};
use crate::error::BackgroundError;

/// Two triangles covering clip space, as `(x, y)` pairs.
pub const QUAD_VERTICES: [f32; 12] = [
    -1.0, -1.0, 1.0, -1.0, -1.0, 1.0, //
    -1.0, 1.0, 1.0, -1.0, 1.0, 1.0,
];

pub const QUAD_VERTEX_COUNT: u32 = 6;

/// Vertex buffer plus the layout binding it to the position attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullSurfaceQuad {
    buffer: BufferId,
    layout: VertexLayoutId,
}

impl FullSurfaceQuad {
    pub fn create<D: GpuDevice>(
        ctx: &mut GraphicsContext<D>,
        position_location: u32,
    ) -> Result<Self, BackgroundError> {
        let buffer = ctx
            .create_vertex_buffer(&QUAD_VERTICES)
            .ok_or_else(|| BackgroundError::Surface("vertex buffer allocation failed".into()))?;
        let Some(layout) = ctx.create_vertex_layout(buffer, position_location, 2) else {
            ctx.delete(GpuObject::Buffer(buffer));
            return Err(BackgroundError::Surface(
                "vertex layout allocation failed".into(),
            ));
        };
        Ok(Self { buffer, layout })
    }

    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    pub fn layout(&self) -> VertexLayoutId {
        self.layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangles_cover_clip_space_corners() {
        let corners: Vec<(f32, f32)> = QUAD_VERTICES
            .chunks_exact(2)
            .map(|pair| (pair[0], pair[1]))
            .collect();
        assert_eq!(corners.len() as u32, QUAD_VERTEX_COUNT);
        for corner in [(-1.0, -1.0), (1.0, -1.0), (-1.0, 1.0), (1.0, 1.0)] {
            assert!(corners.contains(&corner));
        }
    }
}
