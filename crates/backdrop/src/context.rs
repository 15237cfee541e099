use tracing::{debug, info};

use crate::device::{
    BufferId, DrawError, GpuDevice, ProgramId, ShaderId, ShaderStage, UniformLocation,
    UniformValue, VertexLayoutId,
};
use crate::error::BackgroundError;
use crate::host::HostEnvironment;
use crate::types::{ContextOptions, SurfaceSize};

/// GPU object recorded in the context's ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuObject {
    Program(ProgramId),
    Shader(ShaderId),
    Buffer(BufferId),
    VertexLayout(VertexLayoutId),
}

impl GpuObject {
    fn release_rank(&self) -> u8 {
        match self {
            GpuObject::Program(_) => 0,
            GpuObject::Shader(_) => 1,
            GpuObject::Buffer(_) => 2,
            GpuObject::VertexLayout(_) => 3,
        }
    }
}

/// Owns the device for one mounted background and every object allocated on it.
///
/// Deletions go through the ledger, so an object is handed to the device's
/// delete call at most once no matter how many code paths try to free it.
pub struct GraphicsContext<D: GpuDevice> {
    device: D,
    objects: Vec<GpuObject>,
    surface: SurfaceSize,
    released: bool,
}

impl<D: GpuDevice> GraphicsContext<D> {
    /// Asks the host for a device and sizes its surface.
    pub fn acquire<H>(
        host: &mut H,
        size: SurfaceSize,
        options: &ContextOptions,
    ) -> Result<Self, BackgroundError>
    where
        H: HostEnvironment<Device = D>,
    {
        let device = host
            .create_context(size, options)
            .ok_or(BackgroundError::ContextUnsupported)?;
        let mut context = Self::from_device(device);
        context.resize_surface(size);
        debug!(width = size.width, height = size.height, "graphics context acquired");
        Ok(context)
    }

    /// Wraps an already-created device. The surface starts empty.
    pub fn from_device(device: D) -> Self {
        Self {
            device,
            objects: Vec::new(),
            surface: SurfaceSize::default(),
            released: false,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn surface_size(&self) -> SurfaceSize {
        self.surface
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn live_objects(&self) -> usize {
        self.objects.len()
    }

    /// Sets backing store and viewport together. Unchanged sizes are skipped.
    pub fn resize_surface(&mut self, size: SurfaceSize) {
        if self.released || size == self.surface {
            return;
        }
        self.device.resize_surface(size);
        self.surface = size;
    }

    /// Re-applies the current size, for backends that lost their swapchain.
    pub fn reconfigure(&mut self) {
        if self.released {
            return;
        }
        self.device.resize_surface(self.surface);
    }

    pub fn create_shader(&mut self, stage: ShaderStage) -> Option<ShaderId> {
        if self.released {
            return None;
        }
        let id = self.device.create_shader(stage)?;
        self.objects.push(GpuObject::Shader(id));
        Some(id)
    }

    pub fn compile_shader(&mut self, shader: ShaderId, source: &str) -> Result<(), String> {
        self.device.compile_shader(shader, source)
    }

    pub fn create_program(&mut self) -> Option<ProgramId> {
        if self.released {
            return None;
        }
        let id = self.device.create_program()?;
        self.objects.push(GpuObject::Program(id));
        Some(id)
    }

    pub fn attach_shader(&mut self, program: ProgramId, shader: ShaderId) {
        self.device.attach_shader(program, shader);
    }

    pub fn link_program(&mut self, program: ProgramId) -> Result<(), String> {
        self.device.link_program(program)
    }

    pub fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.device.uniform_location(program, name)
    }

    pub fn attribute_location(&self, program: ProgramId, name: &str) -> Option<u32> {
        self.device.attribute_location(program, name)
    }

    pub fn create_vertex_buffer(&mut self, data: &[f32]) -> Option<BufferId> {
        if self.released {
            return None;
        }
        let id = self.device.create_vertex_buffer(data)?;
        self.objects.push(GpuObject::Buffer(id));
        Some(id)
    }

    pub fn create_vertex_layout(
        &mut self,
        buffer: BufferId,
        location: u32,
        components: u32,
    ) -> Option<VertexLayoutId> {
        if self.released {
            return None;
        }
        let id = self
            .device
            .create_vertex_layout(buffer, location, components)?;
        self.objects.push(GpuObject::VertexLayout(id));
        Some(id)
    }

    /// Deletes a tracked object. Returns false when it was already gone.
    pub fn delete(&mut self, object: GpuObject) -> bool {
        let Some(index) = self.objects.iter().position(|o| *o == object) else {
            return false;
        };
        self.objects.swap_remove(index);
        self.delete_on_device(object);
        true
    }

    pub fn use_program(&mut self, program: ProgramId) {
        self.device.use_program(program);
    }

    pub fn bind_vertex_layout(&mut self, layout: VertexLayoutId) {
        self.device.bind_vertex_layout(layout);
    }

    pub fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        self.device.set_uniform(location, value);
    }

    pub fn draw_arrays(&mut self, first: u32, count: u32) -> Result<(), DrawError> {
        if self.released {
            return Err(DrawError::Other("graphics context released".into()));
        }
        self.device.draw_arrays(first, count)
    }

    /// Deletes every remaining object: programs, shaders, buffers, then vertex layouts.
    ///
    /// Safe to call any number of times and after a partially failed build.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let mut objects = std::mem::take(&mut self.objects);
        objects.sort_by_key(GpuObject::release_rank);
        let count = objects.len();
        for object in objects {
            self.delete_on_device(object);
        }
        info!(objects = count, "graphics context released");
    }

    fn delete_on_device(&mut self, object: GpuObject) {
        match object {
            GpuObject::Program(id) => self.device.delete_program(id),
            GpuObject::Shader(id) => self.device.delete_shader(id),
            GpuObject::Buffer(id) => self.device.delete_buffer(id),
            GpuObject::VertexLayout(id) => self.device.delete_vertex_layout(id),
        }
    }
}

impl<D: GpuDevice> Drop for GraphicsContext<D> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::ManualHost;
    use crate::types::DisplaySize;

    fn host() -> ManualHost {
        ManualHost::new(DisplaySize::new(320.0, 200.0), 1.0)
    }

    #[test]
    fn acquire_sizes_the_surface_once() {
        let mut host = host();
        let ctx = GraphicsContext::acquire(
            &mut host,
            SurfaceSize::new(160, 100),
            &ContextOptions::default(),
        )
        .expect("context");
        assert_eq!(ctx.surface_size(), SurfaceSize::new(160, 100));
        assert_eq!(host.journal().borrow().resizes, vec![SurfaceSize::new(160, 100)]);
    }

    #[test]
    fn unsupported_host_yields_error() {
        let mut host = host();
        host.set_supported(false);
        let result = GraphicsContext::acquire(
            &mut host,
            SurfaceSize::new(1, 1),
            &ContextOptions::default(),
        );
        assert!(matches!(result, Err(BackgroundError::ContextUnsupported)));
    }

    #[test]
    fn release_deletes_in_kind_order_exactly_once() {
        let mut host = host();
        let mut ctx = GraphicsContext::acquire(
            &mut host,
            SurfaceSize::new(2, 2),
            &ContextOptions::default(),
        )
        .expect("context");
        let buffer = ctx.create_vertex_buffer(&[0.0, 0.0]).expect("buffer");
        ctx.create_vertex_layout(buffer, 0, 2).expect("layout");
        ctx.create_shader(ShaderStage::Vertex).expect("shader");
        ctx.create_program().expect("program");
        assert_eq!(ctx.live_objects(), 4);

        ctx.release();
        ctx.release();
        drop(ctx);

        let journal = host.journal();
        let journal = journal.borrow();
        let kinds: Vec<_> = journal
            .deletions
            .iter()
            .map(|object| match object {
                GpuObject::Program(_) => "program",
                GpuObject::Shader(_) => "shader",
                GpuObject::Buffer(_) => "buffer",
                GpuObject::VertexLayout(_) => "layout",
            })
            .collect();
        assert_eq!(kinds, ["program", "shader", "buffer", "layout"]);
        assert_eq!(journal.live_objects(), 0);
        assert_eq!(journal.double_deletes(), 0);
    }

    #[test]
    fn explicit_delete_is_not_repeated_on_release() {
        let mut host = host();
        let mut ctx = GraphicsContext::acquire(
            &mut host,
            SurfaceSize::new(2, 2),
            &ContextOptions::default(),
        )
        .expect("context");
        let shader = ctx.create_shader(ShaderStage::Fragment).expect("shader");
        assert!(ctx.delete(GpuObject::Shader(shader)));
        assert!(!ctx.delete(GpuObject::Shader(shader)));
        ctx.release();
        assert_eq!(host.journal().borrow().double_deletes(), 0);
    }

    #[test]
    fn draw_after_release_is_rejected() {
        let mut host = host();
        let mut ctx = GraphicsContext::acquire(
            &mut host,
            SurfaceSize::new(2, 2),
            &ContextOptions::default(),
        )
        .expect("context");
        ctx.release();
        assert!(ctx.draw_arrays(0, 6).is_err());
        assert!(host.journal().borrow().draws.is_empty());
    }
}
