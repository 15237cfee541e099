use std::time::Duration;

use tracing::{debug, info, warn};

use crate::context::GraphicsContext;
use crate::device::GpuDevice;
use crate::error::BackgroundError;
use crate::host::{EventKind, FrameToken, HostEnvironment, HostEvent, SubscriptionId};
use crate::program::{self, ShaderProgram};
use crate::quad::FullSurfaceQuad;
use crate::render_loop::{AnimationHandle, RenderLoop, TickOutcome};
use crate::shaders::{FRAGMENT_SHADER, VERTEX_SHADER};
use crate::surface::RenderSurface;
use crate::types::BackgroundConfig;

/// Where a mounted background is in its life.
#[derive(Debug, Clone, PartialEq)]
pub enum BackgroundStatus {
    /// Mounted into a zero-sized container; waiting for a resize.
    AwaitingSize,
    Running,
    /// Degraded to an empty surface.
    Unavailable(BackgroundError),
    Disposed,
}

struct MountedResources<D: GpuDevice> {
    context: GraphicsContext<D>,
    program: ShaderProgram,
    quad: FullSurfaceQuad,
}

/// A full-surface animated background mounted into a host container.
///
/// Owns everything it allocates. Dropping it (or calling
/// [`unmount`](Self::unmount)) stops the loop, detaches listeners and
/// releases the graphics context, in that order, exactly once.
pub struct ShaderBackground<H: HostEnvironment> {
    // Declared before `host` so GPU objects are gone before the host is.
    resources: Option<MountedResources<H::Device>>,
    render_loop: RenderLoop,
    animation: Option<AnimationHandle>,
    subscriptions: Vec<(SubscriptionId, EventKind)>,
    surface: RenderSurface,
    status: BackgroundStatus,
    config: BackgroundConfig,
    host: H,
}

impl<H: HostEnvironment> ShaderBackground<H> {
    pub fn mount(host: H, config: BackgroundConfig) -> Self {
        let surface = RenderSurface::new(
            host.viewport_size(),
            host.pixel_density(),
            config.resolution_scale,
        );
        let mut background = Self {
            resources: None,
            render_loop: RenderLoop::new(config.target_fps, config.pointer_smoothing),
            animation: None,
            subscriptions: Vec::new(),
            surface,
            status: BackgroundStatus::AwaitingSize,
            config,
            host,
        };

        if background.surface.is_empty() {
            info!("container has no area yet; deferring graphics setup until resize");
            background.subscribe(EventKind::Resize);
            return background;
        }
        background.initialise();
        background
    }

    pub fn status(&self) -> &BackgroundStatus {
        &self.status
    }

    pub fn config(&self) -> &BackgroundConfig {
        &self.config
    }

    pub fn class_name(&self) -> Option<&str> {
        self.config.class_name.as_deref()
    }

    pub fn surface(&self) -> &RenderSurface {
        &self.surface
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn render_loop(&self) -> &RenderLoop {
        &self.render_loop
    }

    pub fn context(&self) -> Option<&GraphicsContext<H::Device>> {
        self.resources.as_ref().map(|res| &res.context)
    }

    /// Host timestamp of the next frame worth delivering, when paced.
    pub fn next_frame_due(&self) -> Option<Duration> {
        self.render_loop.next_due()
    }

    pub fn is_subscribed(&self, kind: EventKind) -> bool {
        self.subscriptions.iter().any(|(_, k)| *k == kind)
    }

    pub fn handle_event(&mut self, event: HostEvent) {
        if !self.is_subscribed(event.kind()) {
            return;
        }
        match event {
            HostEvent::Resized => {
                let changed = self
                    .surface
                    .update(self.host.viewport_size(), self.host.pixel_density());
                match self.status {
                    BackgroundStatus::AwaitingSize if !self.surface.is_empty() => {
                        self.initialise();
                    }
                    // Same-size resizes still reconfigure; the swapchain may be stale.
                    BackgroundStatus::Running if !self.surface.is_empty() => {
                        let backing = self.surface.backing();
                        debug!(
                            width = backing.width,
                            height = backing.height,
                            changed,
                            "backing resize queued"
                        );
                        self.render_loop.request_resize(backing);
                    }
                    _ => {}
                }
            }
            HostEvent::PointerMoved { x, y } => self.render_loop.set_pointer(x, y),
        }
    }

    /// Delivers the host frame callback for `token`.
    pub fn on_frame(&mut self, token: FrameToken, timestamp: Duration) -> TickOutcome {
        let Some(resources) = self.resources.as_mut() else {
            return TickOutcome::Ignored;
        };
        let outcome = self.render_loop.tick(
            token,
            timestamp,
            &mut self.host,
            &mut resources.context,
            &resources.program,
            &resources.quad,
        );
        if let TickOutcome::Fatal(err) = &outcome {
            self.degrade(BackgroundError::Surface(err.to_string()));
        }
        outcome
    }

    /// Tears everything down. Repeated calls do nothing.
    pub fn unmount(&mut self) {
        if self.status == BackgroundStatus::Disposed {
            return;
        }
        self.teardown();
        self.status = BackgroundStatus::Disposed;
        info!("shader background unmounted");
    }

    fn initialise(&mut self) {
        match self.try_initialise() {
            Ok(()) => {
                self.subscribe(EventKind::Resize);
                self.subscribe(EventKind::PointerMove);
                self.status = BackgroundStatus::Running;
                let backing = self.surface.backing();
                info!(
                    width = backing.width,
                    height = backing.height,
                    fps = self.config.target_fps,
                    "shader background running"
                );
            }
            Err(err) => self.degrade(err),
        }
    }

    fn try_initialise(&mut self) -> Result<(), BackgroundError> {
        let mut context = GraphicsContext::acquire(
            &mut self.host,
            self.surface.backing(),
            &self.config.context,
        )?;
        let program = program::build(&mut context, VERTEX_SHADER, FRAGMENT_SHADER)
            .inspect_err(|_| context.release())?;
        let quad = FullSurfaceQuad::create(&mut context, program.inputs().position)
            .inspect_err(|_| context.release())?;
        self.resources = Some(MountedResources {
            context,
            program,
            quad,
        });
        let now = self.host.now();
        self.animation = Some(self.render_loop.start(now, &mut self.host));
        Ok(())
    }

    /// Falls back to an empty surface with a single diagnostic.
    fn degrade(&mut self, err: BackgroundError) {
        warn!(error = %err, "shader background unavailable; leaving the surface empty");
        self.teardown();
        self.status = BackgroundStatus::Unavailable(err);
    }

    fn subscribe(&mut self, kind: EventKind) {
        if self.is_subscribed(kind) {
            return;
        }
        let id = self.host.subscribe(kind);
        self.subscriptions.push((id, kind));
    }

    fn teardown(&mut self) {
        if let Some(handle) = self.animation.take() {
            self.render_loop.stop(handle, &mut self.host);
        }
        for (id, _) in self.subscriptions.drain(..) {
            self.host.unsubscribe(id);
        }
        if let Some(mut resources) = self.resources.take() {
            resources.context.release();
        }
    }
}

impl<H: HostEnvironment> Drop for ShaderBackground<H> {
    fn drop(&mut self) {
        self.unmount();
    }
}
