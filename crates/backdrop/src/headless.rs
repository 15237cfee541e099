//! A scriptable host and a resource-tracking device that need no GPU.
//!
//! [`ManualHost`] hands out frame tokens and subscriptions and lets the caller
//! decide when frames are delivered and what the clock reads.
//! [`RecordingDevice`] validates the object protocol (compile before link,
//! link before draw, no use after delete) and writes every allocation,
//! deletion, resize and draw to a shared [`DeviceJournal`].

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use crate::context::GpuObject;
use crate::device::{
    BufferId, DrawError, GpuDevice, ProgramId, ShaderId, ShaderStage, UniformLocation,
    UniformValue, VertexLayoutId,
};
use crate::glsl::StageInterface;
use crate::host::{EventKind, FrameToken, HostEnvironment, SubscriptionId};
use crate::lifecycle::ShaderBackground;
use crate::render_loop::TickOutcome;
use crate::types::{ContextOptions, DisplaySize, SurfaceSize};

/// One successful draw call as the device saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub program: ProgramId,
    pub first: u32,
    pub count: u32,
    pub backing: SurfaceSize,
    pub viewport: SurfaceSize,
    pub uniforms: BTreeMap<String, UniformValue>,
}

impl DrawRecord {
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms.get(name).copied()
    }
}

/// Everything the headless device was asked to do.
#[derive(Debug, Default)]
pub struct DeviceJournal {
    pub contexts_created: usize,
    pub context_options: Vec<ContextOptions>,
    pub created: Vec<GpuObject>,
    pub deletions: Vec<GpuObject>,
    pub resizes: Vec<SurfaceSize>,
    pub draws: Vec<DrawRecord>,
    pub failed_draws: usize,
}

impl DeviceJournal {
    /// Objects created and not yet deleted.
    pub fn live_objects(&self) -> usize {
        let deleted: HashSet<_> = self.deletions.iter().collect();
        self.created
            .iter()
            .filter(|object| !deleted.contains(object))
            .count()
    }

    /// Delete calls for objects that were never created or already deleted.
    pub fn double_deletes(&self) -> usize {
        let created: HashSet<_> = self.created.iter().collect();
        let mut seen = HashSet::new();
        self.deletions
            .iter()
            .filter(|object| !created.contains(object) || !seen.insert(**object))
            .count()
    }
}

/// Failures the next device should simulate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FailurePlan {
    pub fail_compile: Option<ShaderStage>,
    pub fail_link: bool,
}

struct ShaderRecord {
    stage: ShaderStage,
    interface: Option<StageInterface>,
}

#[derive(Default)]
struct ProgramRecord {
    attached: Vec<ShaderId>,
    uniforms: Vec<String>,
    attributes: Vec<String>,
    linked: bool,
    values: HashMap<u32, UniformValue>,
}

/// [`GpuDevice`] that tracks objects instead of touching hardware.
pub struct RecordingDevice {
    journal: Rc<RefCell<DeviceJournal>>,
    draw_failures: Rc<RefCell<VecDeque<DrawError>>>,
    failures: FailurePlan,
    next_id: u32,
    shaders: HashMap<ShaderId, ShaderRecord>,
    programs: HashMap<ProgramId, ProgramRecord>,
    buffers: HashMap<BufferId, usize>,
    layouts: HashMap<VertexLayoutId, (BufferId, u32, u32)>,
    current_program: Option<ProgramId>,
    current_layout: Option<VertexLayoutId>,
    backing: SurfaceSize,
    viewport: SurfaceSize,
}

impl RecordingDevice {
    pub fn new(journal: Rc<RefCell<DeviceJournal>>, failures: FailurePlan) -> Self {
        Self {
            journal,
            draw_failures: Rc::default(),
            failures,
            next_id: 0,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            buffers: HashMap::new(),
            layouts: HashMap::new(),
            current_program: None,
            current_layout: None,
            backing: SurfaceSize::default(),
            viewport: SurfaceSize::default(),
        }
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn created(&self, object: GpuObject) {
        self.journal.borrow_mut().created.push(object);
    }

    fn deleted(&self, object: GpuObject) {
        self.journal.borrow_mut().deletions.push(object);
    }

    fn check_draw(&self, count: u32) -> Result<ProgramId, DrawError> {
        let program = self
            .current_program
            .ok_or_else(|| DrawError::Other("no program in use".into()))?;
        let record = self
            .programs
            .get(&program)
            .filter(|record| record.linked)
            .ok_or_else(|| DrawError::Other("program in use is not linked".into()))?;
        let layout = self
            .current_layout
            .and_then(|id| self.layouts.get(&id))
            .ok_or_else(|| DrawError::Other("no vertex layout bound".into()))?;
        let floats = self
            .buffers
            .get(&layout.0)
            .ok_or_else(|| DrawError::Other("vertex buffer was deleted".into()))?;
        if (count * layout.2) as usize > *floats {
            return Err(DrawError::Other("draw reads past the vertex buffer".into()));
        }
        if record.values.len() < record.uniforms.len() {
            return Err(DrawError::Other("uniform left unset".into()));
        }
        if self.backing.is_empty() {
            return Err(DrawError::Other("surface has no area".into()));
        }
        Ok(program)
    }
}

impl GpuDevice for RecordingDevice {
    fn create_shader(&mut self, stage: ShaderStage) -> Option<ShaderId> {
        let id = ShaderId::from_raw(self.next());
        self.shaders.insert(
            id,
            ShaderRecord {
                stage,
                interface: None,
            },
        );
        self.created(GpuObject::Shader(id));
        Some(id)
    }

    fn compile_shader(&mut self, shader: ShaderId, source: &str) -> Result<(), String> {
        let forced = self.failures.fail_compile;
        let record = self
            .shaders
            .get_mut(&shader)
            .ok_or_else(|| "unknown shader object".to_string())?;
        if forced == Some(record.stage) {
            return Err(format!("0:1: {} stage rejected by failure plan", record.stage));
        }
        let interface = StageInterface::parse(source)?;
        if !source.contains("void main") {
            return Err("0:0: missing entry point `main`".into());
        }
        if record.stage == ShaderStage::Vertex && !interface.outputs.is_empty() {
            return Err("0:0: vertex outputs are not supported".into());
        }
        record.interface = Some(interface);
        Ok(())
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        self.shaders.remove(&shader);
        self.deleted(GpuObject::Shader(shader));
    }

    fn create_program(&mut self) -> Option<ProgramId> {
        let id = ProgramId::from_raw(self.next());
        self.programs.insert(id, ProgramRecord::default());
        self.created(GpuObject::Program(id));
        Some(id)
    }

    fn attach_shader(&mut self, program: ProgramId, shader: ShaderId) {
        if let Some(record) = self.programs.get_mut(&program) {
            record.attached.push(shader);
        }
    }

    fn link_program(&mut self, program: ProgramId) -> Result<(), String> {
        if self.failures.fail_link {
            return Err("link rejected by failure plan".into());
        }
        let record = self
            .programs
            .get(&program)
            .ok_or_else(|| "unknown program object".to_string())?;
        let mut vertex = None;
        let mut fragment = None;
        for id in &record.attached {
            let shader = self
                .shaders
                .get(id)
                .ok_or_else(|| "attached shader was deleted".to_string())?;
            let interface = shader
                .interface
                .as_ref()
                .ok_or_else(|| format!("{} shader is not compiled", shader.stage))?;
            match shader.stage {
                ShaderStage::Vertex => vertex = Some(interface),
                ShaderStage::Fragment => fragment = Some(interface),
            }
        }
        let (Some(vertex), Some(fragment)) = (vertex, fragment) else {
            return Err("program needs one vertex and one fragment shader".into());
        };
        let mut uniforms: Vec<String> = Vec::new();
        for decl in vertex.uniforms.iter().chain(&fragment.uniforms) {
            if !uniforms.contains(&decl.name) {
                uniforms.push(decl.name.clone());
            }
        }
        let attributes = vertex.inputs.iter().map(|d| d.name.clone()).collect();

        if let Some(record) = self.programs.get_mut(&program) {
            record.uniforms = uniforms;
            record.attributes = attributes;
            record.linked = true;
        }
        Ok(())
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
        self.deleted(GpuObject::Program(program));
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let record = self.programs.get(&program).filter(|r| r.linked)?;
        let slot = record.uniforms.iter().position(|n| n == name)?;
        Some(UniformLocation::new(program, slot as u32))
    }

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<u32> {
        let record = self.programs.get(&program).filter(|r| r.linked)?;
        record
            .attributes
            .iter()
            .position(|n| n == name)
            .map(|slot| slot as u32)
    }

    fn create_vertex_buffer(&mut self, data: &[f32]) -> Option<BufferId> {
        let id = BufferId::from_raw(self.next());
        self.buffers.insert(id, data.len());
        self.created(GpuObject::Buffer(id));
        Some(id)
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
        self.deleted(GpuObject::Buffer(buffer));
    }

    fn create_vertex_layout(
        &mut self,
        buffer: BufferId,
        location: u32,
        components: u32,
    ) -> Option<VertexLayoutId> {
        if !self.buffers.contains_key(&buffer) || components == 0 {
            return None;
        }
        let id = VertexLayoutId::from_raw(self.next());
        self.layouts.insert(id, (buffer, location, components));
        self.created(GpuObject::VertexLayout(id));
        Some(id)
    }

    fn delete_vertex_layout(&mut self, layout: VertexLayoutId) {
        self.layouts.remove(&layout);
        if self.current_layout == Some(layout) {
            self.current_layout = None;
        }
        self.deleted(GpuObject::VertexLayout(layout));
    }

    fn resize_surface(&mut self, size: SurfaceSize) {
        self.backing = size;
        self.viewport = size;
        self.journal.borrow_mut().resizes.push(size);
    }

    fn use_program(&mut self, program: ProgramId) {
        self.current_program = self.programs.contains_key(&program).then_some(program);
    }

    fn bind_vertex_layout(&mut self, layout: VertexLayoutId) {
        self.current_layout = self.layouts.contains_key(&layout).then_some(layout);
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        if self.current_program != Some(location.program()) {
            return;
        }
        if let Some(record) = self.programs.get_mut(&location.program()) {
            record.values.insert(location.slot(), value);
        }
    }

    fn draw_arrays(&mut self, first: u32, count: u32) -> Result<(), DrawError> {
        if let Some(err) = self.draw_failures.borrow_mut().pop_front() {
            self.journal.borrow_mut().failed_draws += 1;
            return Err(err);
        }
        let program = self.check_draw(first + count)?;
        let uniforms = self
            .programs
            .get(&program)
            .map(|record| {
                record
                    .values
                    .iter()
                    .filter_map(|(slot, value)| {
                        record
                            .uniforms
                            .get(*slot as usize)
                            .map(|name| (name.clone(), *value))
                    })
                    .collect()
            })
            .unwrap_or_default();
        self.journal.borrow_mut().draws.push(DrawRecord {
            program,
            first,
            count,
            backing: self.backing,
            viewport: self.viewport,
            uniforms,
        });
        Ok(())
    }
}

/// Host whose clock, geometry and frame delivery are driven by the caller.
pub struct ManualHost {
    viewport: DisplaySize,
    density: f32,
    now: Duration,
    supported: bool,
    failures: FailurePlan,
    journal: Rc<RefCell<DeviceJournal>>,
    draw_failures: Rc<RefCell<VecDeque<DrawError>>>,
    issued_tokens: u64,
    pending: VecDeque<FrameToken>,
    cancelled: Vec<FrameToken>,
    issued_subscriptions: u64,
    subscriptions: Vec<(SubscriptionId, EventKind)>,
}

impl ManualHost {
    pub fn new(viewport: DisplaySize, density: f32) -> Self {
        Self {
            viewport,
            density,
            now: Duration::ZERO,
            supported: true,
            failures: FailurePlan::default(),
            journal: Rc::default(),
            draw_failures: Rc::default(),
            issued_tokens: 0,
            pending: VecDeque::new(),
            cancelled: Vec::new(),
            issued_subscriptions: 0,
            subscriptions: Vec::new(),
        }
    }

    pub fn journal(&self) -> Rc<RefCell<DeviceJournal>> {
        Rc::clone(&self.journal)
    }

    pub fn set_viewport(&mut self, viewport: DisplaySize) {
        self.viewport = viewport;
    }

    pub fn set_density(&mut self, density: f32) {
        self.density = density;
    }

    pub fn set_supported(&mut self, supported: bool) {
        self.supported = supported;
    }

    pub fn set_failures(&mut self, failures: FailurePlan) {
        self.failures = failures;
    }

    /// Makes the next draw on any device from this host fail with `err`.
    pub fn fail_next_draw(&mut self, err: DrawError) {
        self.draw_failures.borrow_mut().push_back(err);
    }

    pub fn advance(&mut self, step: Duration) {
        self.now += step;
    }

    /// Oldest frame callback that is still scheduled.
    pub fn take_pending_frame(&mut self) -> Option<FrameToken> {
        self.pending.pop_front()
    }

    pub fn pending_frames(&self) -> Vec<FrameToken> {
        self.pending.iter().copied().collect()
    }

    pub fn cancelled_frames(&self) -> &[FrameToken] {
        &self.cancelled
    }

    pub fn subscriptions(&self) -> Vec<EventKind> {
        self.subscriptions.iter().map(|(_, kind)| *kind).collect()
    }
}

impl HostEnvironment for ManualHost {
    type Device = RecordingDevice;

    fn viewport_size(&self) -> DisplaySize {
        self.viewport
    }

    fn pixel_density(&self) -> f32 {
        self.density
    }

    fn now(&self) -> Duration {
        self.now
    }

    fn subscribe(&mut self, kind: EventKind) -> SubscriptionId {
        self.issued_subscriptions += 1;
        let id = SubscriptionId(self.issued_subscriptions);
        self.subscriptions.push((id, kind));
        id
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.subscriptions.retain(|(existing, _)| *existing != id);
    }

    fn request_frame(&mut self) -> FrameToken {
        self.issued_tokens += 1;
        let token = FrameToken(self.issued_tokens);
        self.pending.push_back(token);
        token
    }

    fn cancel_frame(&mut self, token: FrameToken) {
        self.pending.retain(|pending| *pending != token);
        self.cancelled.push(token);
    }

    fn create_context(
        &mut self,
        _size: SurfaceSize,
        options: &ContextOptions,
    ) -> Option<RecordingDevice> {
        if !self.supported {
            return None;
        }
        {
            let mut journal = self.journal.borrow_mut();
            journal.contexts_created += 1;
            journal.context_options.push(options.clone());
        }
        let mut device = RecordingDevice::new(Rc::clone(&self.journal), self.failures.clone());
        device.draw_failures = Rc::clone(&self.draw_failures);
        Some(device)
    }
}

impl ShaderBackground<ManualHost> {
    /// Advances the host clock by `step` and delivers the oldest pending frame.
    pub fn pump_frame(&mut self, step: Duration) -> Option<TickOutcome> {
        self.host_mut().advance(step);
        let token = self.host_mut().take_pending_frame()?;
        let now = self.host().now();
        Some(self.on_frame(token, now))
    }
}
