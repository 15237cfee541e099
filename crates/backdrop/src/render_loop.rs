use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::context::GraphicsContext;
use crate::device::{DrawError, UniformValue};
use crate::host::{FrameToken, HostEnvironment};
use crate::pacing::FramePacer;
use crate::pointer::PointerSmoother;
use crate::program::ShaderProgram;
use crate::quad::{FullSurfaceQuad, QUAD_VERTEX_COUNT};
use crate::types::SurfaceSize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    /// Terminal; starting again hands out a fresh handle.
    Stopped,
}

/// Cancellation ticket for one run of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnimationHandle {
    id: u64,
}

impl AnimationHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// What a frame callback did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Stale token or the loop is not running; nothing was scheduled.
    Ignored,
    /// Too soon after the last drawn frame; rescheduled.
    Throttled,
    Drawn,
    /// The draw failed in a recoverable way; rescheduled.
    Dropped(DrawError),
    /// The draw failed and the loop stopped.
    Fatal(DrawError),
}

/// Inputs of the most recently drawn frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameState {
    pub elapsed: Duration,
    pub raw_pointer: [f32; 2],
    pub pointer: [f32; 2],
    pub resolution: SurfaceSize,
    pub frame_index: u64,
}

/// Drives the per-frame draw from host frame callbacks.
///
/// At most one frame token is outstanding. Every callback is checked against
/// it, so a callback that was already queued when the loop stopped does not
/// draw.
#[derive(Debug)]
pub struct RenderLoop {
    state: LoopState,
    handle: Option<AnimationHandle>,
    issued_handles: u64,
    pending: Option<FrameToken>,
    pacer: FramePacer,
    started_at: Duration,
    pointer: PointerSmoother,
    pending_resize: Option<SurfaceSize>,
    last_frame: Option<FrameState>,
    frames: u64,
}

impl RenderLoop {
    pub fn new(target_fps: f32, pointer_smoothing: f32) -> Self {
        Self {
            state: LoopState::Idle,
            handle: None,
            issued_handles: 0,
            pending: None,
            pacer: FramePacer::new(target_fps),
            started_at: Duration::ZERO,
            pointer: PointerSmoother::new(pointer_smoothing),
            pending_resize: None,
            last_frame: None,
            frames: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn pending_token(&self) -> Option<FrameToken> {
        self.pending
    }

    pub fn last_frame(&self) -> Option<&FrameState> {
        self.last_frame.as_ref()
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames
    }

    /// Begins a fresh run, stopping any current one first.
    pub fn start<H: HostEnvironment>(&mut self, now: Duration, host: &mut H) -> AnimationHandle {
        if let Some(handle) = self.handle {
            self.stop(handle, host);
        }
        self.issued_handles += 1;
        let handle = AnimationHandle {
            id: self.issued_handles,
        };
        self.handle = Some(handle);
        self.state = LoopState::Running;
        self.started_at = now;
        self.pacer.reset();
        self.frames = 0;
        self.pending = Some(host.request_frame());
        debug!(handle = handle.id, "render loop started");
        handle
    }

    /// Stops the run `handle` belongs to. Unknown or repeated handles are no-ops.
    pub fn stop<H: HostEnvironment>(&mut self, handle: AnimationHandle, host: &mut H) -> bool {
        if self.handle != Some(handle) || self.state != LoopState::Running {
            return false;
        }
        if let Some(token) = self.pending.take() {
            host.cancel_frame(token);
        }
        self.state = LoopState::Stopped;
        debug!(handle = handle.id, frames = self.frames, "render loop stopped");
        true
    }

    /// Records a new backing size, applied at the start of the next drawn frame.
    pub fn request_resize(&mut self, size: SurfaceSize) {
        self.pending_resize = Some(size);
    }

    pub fn set_pointer(&mut self, x: f32, y: f32) {
        self.pointer.set_target(x, y);
    }

    /// Host timestamp at which the next frame is worth delivering, if paced.
    pub fn next_due(&self) -> Option<Duration> {
        if self.state != LoopState::Running {
            return None;
        }
        self.pacer.next_due()
    }

    pub fn tick<H: HostEnvironment>(
        &mut self,
        token: FrameToken,
        timestamp: Duration,
        host: &mut H,
        ctx: &mut GraphicsContext<H::Device>,
        program: &ShaderProgram,
        quad: &FullSurfaceQuad,
    ) -> TickOutcome {
        if self.state != LoopState::Running || self.pending != Some(token) {
            trace!(token = token.0, "ignoring stale frame callback");
            return TickOutcome::Ignored;
        }
        self.pending = None;

        if !self.pacer.admit(timestamp) {
            self.pending = Some(host.request_frame());
            return TickOutcome::Throttled;
        }

        match self.pending_resize.take() {
            Some(size) if size == ctx.surface_size() => ctx.reconfigure(),
            Some(size) => ctx.resize_surface(size),
            None => {}
        }

        let elapsed = timestamp.saturating_sub(self.started_at);
        let pointer = self.pointer.step();
        let resolution = ctx.surface_size();
        let inputs = program.inputs();

        ctx.use_program(program.id());
        ctx.bind_vertex_layout(quad.layout());
        ctx.set_uniform(inputs.time, UniformValue::Float(elapsed.as_secs_f32()));
        ctx.set_uniform(
            inputs.resolution,
            UniformValue::Vec2([resolution.width as f32, resolution.height as f32]),
        );
        ctx.set_uniform(inputs.pointer, UniformValue::Vec2(pointer));

        let outcome = match ctx.draw_arrays(0, QUAD_VERTEX_COUNT) {
            Ok(()) => {
                self.frames += 1;
                self.last_frame = Some(FrameState {
                    elapsed,
                    raw_pointer: self.pointer.target(),
                    pointer,
                    resolution,
                    frame_index: self.frames,
                });
                TickOutcome::Drawn
            }
            Err(DrawError::OutOfMemory) => {
                self.state = LoopState::Stopped;
                return TickOutcome::Fatal(DrawError::OutOfMemory);
            }
            Err(DrawError::Lost) => {
                debug!("surface lost; reconfiguring");
                ctx.reconfigure();
                TickOutcome::Dropped(DrawError::Lost)
            }
            Err(DrawError::Timeout) => {
                debug!("surface acquire timed out; skipping frame");
                TickOutcome::Dropped(DrawError::Timeout)
            }
            Err(err) => {
                warn!(error = %err, "frame draw failed");
                TickOutcome::Dropped(err)
            }
        };
        self.pending = Some(host.request_frame());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{ManualHost, RecordingDevice};
    use crate::program;
    use crate::shaders::{FRAGMENT_SHADER, VERTEX_SHADER};
    use crate::types::{ContextOptions, DisplaySize};

    struct Rig {
        host: ManualHost,
        ctx: GraphicsContext<RecordingDevice>,
        program: ShaderProgram,
        quad: FullSurfaceQuad,
        render_loop: RenderLoop,
    }

    impl Rig {
        fn new(fps: f32) -> Self {
            let mut host = ManualHost::new(DisplaySize::new(200.0, 100.0), 1.0);
            let mut ctx = GraphicsContext::acquire(
                &mut host,
                SurfaceSize::new(100, 50),
                &ContextOptions::default(),
            )
            .expect("context");
            let program = program::build(&mut ctx, VERTEX_SHADER, FRAGMENT_SHADER).expect("build");
            let quad = FullSurfaceQuad::create(&mut ctx, program.inputs().position).expect("quad");
            Self {
                host,
                ctx,
                program,
                quad,
                render_loop: RenderLoop::new(fps, 0.05),
            }
        }

        fn start(&mut self, at: Duration) -> AnimationHandle {
            self.render_loop.start(at, &mut self.host)
        }

        fn tick_pending(&mut self, at: Duration) -> TickOutcome {
            let token = self.host.take_pending_frame().expect("pending frame");
            self.tick(token, at)
        }

        fn tick(&mut self, token: FrameToken, at: Duration) -> TickOutcome {
            self.render_loop.tick(
                token,
                at,
                &mut self.host,
                &mut self.ctx,
                &self.program,
                &self.quad,
            )
        }
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn queued_token_after_stop_does_not_draw() {
        let mut rig = Rig::new(30.0);
        let handle = rig.start(ms(0));
        let token = rig.render_loop.pending_token().expect("token");
        assert!(rig.render_loop.stop(handle, &mut rig.host));
        assert!(!rig.render_loop.stop(handle, &mut rig.host));
        assert_eq!(rig.tick(token, ms(16)), TickOutcome::Ignored);
        assert!(rig.host.journal().borrow().draws.is_empty());
        assert_eq!(rig.host.cancelled_frames(), &[token]);
        assert_eq!(rig.render_loop.state(), LoopState::Stopped);
    }

    #[test]
    fn early_tick_is_throttled_and_rescheduled() {
        let mut rig = Rig::new(30.0);
        rig.start(ms(0));
        assert_eq!(rig.tick_pending(ms(0)), TickOutcome::Drawn);
        assert_eq!(rig.tick_pending(ms(10)), TickOutcome::Throttled);
        assert!(rig.render_loop.pending_token().is_some());
        assert_eq!(rig.tick_pending(ms(34)), TickOutcome::Drawn);
        assert_eq!(rig.host.journal().borrow().draws.len(), 2);
    }

    #[test]
    fn draw_writes_elapsed_time_pointer_and_resolution() {
        let mut rig = Rig::new(0.0);
        rig.start(ms(1_000));
        rig.render_loop.set_pointer(100.0, 40.0);
        assert_eq!(rig.tick_pending(ms(1_500)), TickOutcome::Drawn);

        let journal = rig.host.journal();
        let journal = journal.borrow();
        let draw = journal.draws.last().expect("draw");
        assert_eq!(draw.count, 6);
        assert_eq!(draw.uniform("time"), Some(UniformValue::Float(0.5)));
        assert_eq!(draw.uniform("move"), Some(UniformValue::Vec2([5.0, 2.0])));
        assert_eq!(
            draw.uniform("resolution"),
            Some(UniformValue::Vec2([100.0, 50.0]))
        );
        let frame = rig.render_loop.last_frame().expect("frame");
        assert_eq!(frame.raw_pointer, [100.0, 40.0]);
        assert_eq!(frame.frame_index, 1);
    }

    #[test]
    fn resize_waits_for_the_next_drawn_frame() {
        let mut rig = Rig::new(30.0);
        rig.start(ms(0));
        assert_eq!(rig.tick_pending(ms(0)), TickOutcome::Drawn);
        rig.render_loop.request_resize(SurfaceSize::new(300, 200));
        assert_eq!(rig.tick_pending(ms(5)), TickOutcome::Throttled);
        assert_eq!(rig.ctx.surface_size(), SurfaceSize::new(100, 50));
        assert_eq!(rig.tick_pending(ms(40)), TickOutcome::Drawn);

        let journal = rig.host.journal();
        let journal = journal.borrow();
        let draw = journal.draws.last().expect("draw");
        assert_eq!(draw.backing, SurfaceSize::new(300, 200));
        assert_eq!(draw.viewport, draw.backing);
        assert_eq!(
            draw.uniform("resolution"),
            Some(UniformValue::Vec2([300.0, 200.0]))
        );
    }

    #[test]
    fn lost_surface_is_reconfigured_and_loop_continues() {
        let mut rig = Rig::new(0.0);
        rig.start(ms(0));
        rig.host.fail_next_draw(DrawError::Lost);
        assert_eq!(rig.tick_pending(ms(0)), TickOutcome::Dropped(DrawError::Lost));
        assert_eq!(
            rig.host.journal().borrow().resizes,
            vec![SurfaceSize::new(100, 50), SurfaceSize::new(100, 50)]
        );
        assert_eq!(rig.tick_pending(ms(16)), TickOutcome::Drawn);
    }

    #[test]
    fn out_of_memory_stops_the_loop() {
        let mut rig = Rig::new(0.0);
        rig.start(ms(0));
        rig.host.fail_next_draw(DrawError::OutOfMemory);
        assert_eq!(
            rig.tick_pending(ms(0)),
            TickOutcome::Fatal(DrawError::OutOfMemory)
        );
        assert_eq!(rig.render_loop.state(), LoopState::Stopped);
        assert!(rig.host.take_pending_frame().is_none());
    }

    #[test]
    fn restart_hands_out_a_fresh_handle() {
        let mut rig = Rig::new(30.0);
        let first = rig.start(ms(0));
        let stale = rig.render_loop.pending_token().expect("token");
        let second = rig.start(ms(100));
        assert_ne!(first, second);
        assert!(!rig.render_loop.stop(first, &mut rig.host));
        assert_eq!(rig.tick(stale, ms(100)), TickOutcome::Ignored);
        assert_eq!(rig.tick_pending(ms(100)), TickOutcome::Drawn);
    }
}
