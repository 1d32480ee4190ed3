//! Graphics backend abstraction layer.
//!
//! The compositor never talks to a GPU API directly; it drives a
//! [`RenderBackend`] implementation. The trait covers exactly the services
//! the compositor consumes: resource creation, render-target binding,
//! resource transitions, compute dispatch and frame bracketing. Scene
//! content is *not* drawn through this trait; that is the scene renderer's
//! job (see [`crate::context::SceneRenderer`]).
//!
//! The crate ships one implementation, [`DummyBackend`], a recording no-op
//! backend used by the test suites and as a reference for real backends.

pub mod dummy;

pub use dummy::{DummyBackend, RecordedOp};

use crate::barrier::{ResourceAccess, ResourceLayout, ResourceTransition, TrackedResource};
use crate::context::ComputeJob;
use crate::definition::StencilParams;
use crate::error::CompositorError;
use crate::pass::RenderPassDesc;
use crate::resources::Texture;
use crate::types::{BufferDescriptor, TextureDescriptor, ViewportRect};

/// Handle to a backend texture resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(u64);

impl TextureHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Handle to a backend buffer resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(u64);

impl BufferHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// A UAV slot binding handed to the backend.
#[derive(Debug, Clone)]
pub struct UavBinding {
    pub slot: u32,
    pub resource: TrackedResource,
    pub access: ResourceAccess,
    pub mip_level: u32,
}

/// Capability bits that drive the compositor's fallback paths.
///
/// Missing capabilities are never errors: components switch to their
/// documented degraded-but-correct path and log it.
#[derive(Debug, Clone, Copy)]
pub struct BackendCaps {
    /// Compute shaders available.
    pub compute: bool,
    /// Tile-based GPU: clears of colour targets are free at pass start.
    pub tiler: bool,
    /// Tiler can clear a sub-region of stencil.
    pub tiler_can_clear_stencil_region: bool,
    /// Typed UAV loads available (affects IBL convolution accumulation).
    pub typed_uav_loads: bool,
    /// Explicit API (Vulkan/D3D12-style): per-resource layouts matter.
    /// Non-explicit backends only need global memory barriers.
    pub explicit_api: bool,
    /// Hardware mipmap generation available.
    pub hardware_mipmaps: bool,
}

impl Default for BackendCaps {
    fn default() -> Self {
        Self {
            compute: true,
            tiler: false,
            tiler_can_clear_stencil_region: false,
            typed_uav_loads: true,
            explicit_api: true,
            hardware_mipmaps: true,
        }
    }
}

/// Abstract GPU services consumed by the compositor.
///
/// Implementations record or submit work; the compositor guarantees it
/// calls these in a correct, fully ordered sequence from a single thread.
pub trait RenderBackend: Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &'static str;

    /// Capability bits.
    fn caps(&self) -> BackendCaps;

    /// Create a GPU texture. Failure is fatal for the owning workspace.
    fn create_texture(&self, desc: &TextureDescriptor) -> Result<TextureHandle, CompositorError>;

    /// Destroy a GPU texture.
    fn destroy_texture(&self, handle: TextureHandle);

    /// Create a GPU buffer.
    fn create_buffer(&self, desc: &BufferDescriptor) -> Result<BufferHandle, CompositorError>;

    /// Destroy a GPU buffer.
    fn destroy_buffer(&self, handle: BufferHandle);

    /// Frame bracketing.
    fn begin_frame(&self);
    fn end_frame(&self);

    /// Bind the given render targets and viewport for subsequent rendering.
    fn begin_render_pass(&self, desc: &RenderPassDesc, viewport: &ViewportRect);

    /// Unbind the current render targets.
    fn end_render_pass(&self);

    /// Clear the attachments of `desc` according to their load actions and
    /// clear values.
    fn clear(&self, desc: &RenderPassDesc);

    /// Execute the given resource transitions (emit barriers).
    fn execute_resource_transitions(&self, transitions: &[ResourceTransition]);

    /// Dispatch a compute job with its currently bound resources.
    fn dispatch_compute(&self, job: &ComputeJob);

    /// Bind UAVs for subsequent graphics passes.
    fn set_uavs(&self, starting_slot: u32, bindings: &[UavBinding]);

    /// Set the stencil reference state.
    fn set_stencil_state(&self, params: &StencilParams);

    /// Generate the full mip chain of `texture` in hardware. The backend
    /// manages its own internal barriers for this; the compositor accounts
    /// for it via `assume_texture_transition`.
    fn generate_mipmaps(&self, texture: &Texture);

    /// Copy one mip level between textures (sizes must match).
    fn copy_texture(&self, src: &Texture, src_mip: u32, dst: &Texture, dst_mip: u32);

    /// Flush the command stream now. Passes opt in via their
    /// `flush_command_buffers` flag; most backends treat this as a hint.
    fn flush(&self) {}

    /// Whether two layouts are equivalent for this backend's read
    /// semantics (e.g. `Texture` and `RenderTargetReadOnly` may coincide).
    /// Transitions between equivalent layouts are elided.
    fn is_same_layout(&self, a: ResourceLayout, b: ResourceLayout) -> bool {
        a == b
    }
}
