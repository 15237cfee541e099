//! wgpu implementation of [`crate::device::GpuDevice`].
//!
//! - `context` owns instance/adapter/device/surface wiring and rebuilds the
//!   swapchain when the window resizes.
//! - `compile` rewrites GLSL ES 3.00 stages into GLSL 450 that naga accepts,
//!   synthesizing a std140 block for loose uniforms.
//! - `uniforms` lays out that block and stages its bytes between draws.
//! - `device` maps shader/program/buffer handles onto wgpu objects and
//!   presents each draw through an offscreen backing store.

mod compile;
mod context;
mod device;
mod uniforms;

pub use device::WgpuDevice;
