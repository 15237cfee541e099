//! Environment seam between the background and whatever embeds it.

use std::time::Duration;

use crate::device::GpuDevice;
use crate::types::{ContextOptions, DisplaySize, SurfaceSize};

/// Event classes a background can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Resize,
    PointerMove,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostEvent {
    Resized,
    /// Pointer position in display pixels, origin at the top-left of the viewport.
    PointerMoved { x: f32, y: f32 },
}

impl HostEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            HostEvent::Resized => EventKind::Resize,
            HostEvent::PointerMoved { .. } => EventKind::PointerMove,
        }
    }
}

/// Ticket for one scheduled frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameToken(pub u64);

/// Ticket for one event subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Services the background needs from its embedding.
///
/// All calls happen on one thread. Frame callbacks are delivered by the host
/// calling back into [`crate::ShaderBackground::on_frame`] with the token it
/// handed out from [`request_frame`](Self::request_frame).
pub trait HostEnvironment {
    type Device: GpuDevice;

    /// Size of the container in display pixels.
    fn viewport_size(&self) -> DisplaySize;
    /// Physical pixels per display pixel.
    fn pixel_density(&self) -> f32;
    /// Monotonic time since an arbitrary origin.
    fn now(&self) -> Duration;

    fn subscribe(&mut self, kind: EventKind) -> SubscriptionId;
    fn unsubscribe(&mut self, id: SubscriptionId);

    fn request_frame(&mut self) -> FrameToken;
    fn cancel_frame(&mut self, token: FrameToken);

    /// Creates a graphics device bound to the container, or `None` when the
    /// host cannot provide one with the requested capabilities.
    fn create_context(&mut self, size: SurfaceSize, options: &ContextOptions)
        -> Option<Self::Device>;
}
