use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use tracing::{debug, info};
use winit::dpi::LogicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::{Window, WindowBuilder};

use crate::clock::{Clock, SystemClock};
use crate::gpu::WgpuDevice;
use crate::host::{EventKind, FrameToken, HostEnvironment, HostEvent, SubscriptionId};
use crate::lifecycle::ShaderBackground;
use crate::types::{BackgroundConfig, ContextOptions, DisplaySize, SurfaceSize};

/// Preview window settings.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowOptions {
    /// Initial inner size in logical pixels.
    pub size: (u32, u32),
    pub title: String,
}

impl Default for WindowOptions {
    fn default() -> Self {
        Self {
            size: (1280, 720),
            title: "backdrop".into(),
        }
    }
}

/// [`HostEnvironment`] backed by a winit window.
///
/// Frame requests become `RedrawRequested` events; the event loop decides
/// when to ask for them based on [`ShaderBackground::next_frame_due`].
pub struct WinitHost {
    window: Arc<Window>,
    clock: SystemClock,
    issued_tokens: u64,
    pending_frame: Option<FrameToken>,
    issued_subscriptions: u64,
    subscriptions: Vec<(SubscriptionId, EventKind)>,
}

impl WinitHost {
    pub fn new(window: Arc<Window>) -> Self {
        Self {
            window,
            clock: SystemClock::new(),
            issued_tokens: 0,
            pending_frame: None,
            issued_subscriptions: 0,
            subscriptions: Vec::new(),
        }
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn pending_frame(&self) -> Option<FrameToken> {
        self.pending_frame
    }

    fn take_frame(&mut self) -> Option<FrameToken> {
        self.pending_frame.take()
    }

    fn wants(&self, kind: EventKind) -> bool {
        self.subscriptions.iter().any(|(_, k)| *k == kind)
    }
}

impl HostEnvironment for WinitHost {
    type Device = WgpuDevice;

    fn viewport_size(&self) -> DisplaySize {
        let size = self.window.inner_size();
        let scale = self.window.scale_factor();
        DisplaySize::new(
            (f64::from(size.width) / scale) as f32,
            (f64::from(size.height) / scale) as f32,
        )
    }

    fn pixel_density(&self) -> f32 {
        self.window.scale_factor() as f32
    }

    fn now(&self) -> Duration {
        self.clock.now()
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
        self.pending_frame = Some(token);
        token
    }

    fn cancel_frame(&mut self, token: FrameToken) {
        if self.pending_frame == Some(token) {
            self.pending_frame = None;
        }
    }

    fn create_context(
        &mut self,
        size: SurfaceSize,
        options: &ContextOptions,
    ) -> Option<WgpuDevice> {
        match WgpuDevice::new(Arc::clone(&self.window), size, options) {
            Ok(device) => Some(device),
            Err(err) => {
                debug!(error = ?err, "wgpu device unavailable");
                None
            }
        }
    }
}

/// Opens a window and runs the background in it until the window closes.
pub fn run_window(options: WindowOptions, config: BackgroundConfig) -> Result<()> {
    let event_loop = EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;

    let title = match &config.class_name {
        Some(class) => format!("{} [{class}]", options.title),
        None => options.title.clone(),
    };
    let window = WindowBuilder::new()
        .with_title(title)
        .with_inner_size(LogicalSize::new(options.size.0, options.size.1))
        .with_transparent(config.context.alpha)
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create preview window: {err}"))?;
    let window = Arc::new(window);
    let window_id = window.id();

    let mut background = ShaderBackground::mount(WinitHost::new(Arc::clone(&window)), config);
    info!(status = ?background.status(), "preview window open");

    event_loop
        .run(move |event, elwt| match event {
            Event::WindowEvent { window_id: id, event } if id == window_id => match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                    background.unmount();
                    elwt.exit();
                }
                WindowEvent::CursorMoved { position, .. } => {
                    if !background.host().wants(EventKind::PointerMove) {
                        return;
                    }
                    let logical = position.to_logical::<f64>(window.scale_factor());
                    background.handle_event(HostEvent::PointerMoved {
                        x: logical.x as f32,
                        y: logical.y as f32,
                    });
                }
                WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                    background.handle_event(HostEvent::Resized);
                }
                WindowEvent::RedrawRequested => {
                    if let Some(token) = background.host_mut().take_frame() {
                        let now = background.host().now();
                        let outcome = background.on_frame(token, now);
                        tracing::trace!(?outcome, "frame callback");
                    }
                }
                _ => {}
            },
            Event::AboutToWait => {
                if background.host().pending_frame().is_none() {
                    elwt.set_control_flow(ControlFlow::Wait);
                    return;
                }
                let now = background.host().now();
                match background.next_frame_due() {
                    Some(due) if due > now => {
                        elwt.set_control_flow(ControlFlow::WaitUntil(Instant::now() + (due - now)));
                    }
                    _ => {
                        window.request_redraw();
                        elwt.set_control_flow(ControlFlow::Wait);
                    }
                }
            }
            _ => {}
        })
        .map_err(|err| anyhow!("window event loop error: {err}"))
}
