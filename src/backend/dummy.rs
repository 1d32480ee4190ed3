//! Dummy backend for testing and development.
//!
//! Performs no GPU work; every call is recorded into an operation log that
//! tests can inspect to verify what the compositor *would* have submitted,
//! in what order. Capabilities are configurable so fallback paths (no
//! compute, tiler clears, layout equivalences) can be exercised.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::barrier::{ResourceLayout, ResourceTransition};
use crate::context::ComputeJob;
use crate::definition::StencilParams;
use crate::error::CompositorError;
use crate::pass::RenderPassDesc;
use crate::resources::{ResourceId, Texture};
use crate::types::{BufferDescriptor, TextureDescriptor, ViewportRect};

use super::{BackendCaps, BufferHandle, RenderBackend, TextureHandle, UavBinding};

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedOp {
    CreateTexture { label: String, handle: TextureHandle },
    DestroyTexture(TextureHandle),
    CreateBuffer { label: String, handle: BufferHandle },
    DestroyBuffer(BufferHandle),
    BeginFrame,
    EndFrame,
    BeginRenderPass { num_colour: usize, has_depth: bool },
    EndRenderPass,
    Clear { num_colour: usize, has_depth: bool },
    Transition {
        resource: ResourceId,
        old_layout: ResourceLayout,
        new_layout: ResourceLayout,
    },
    DispatchCompute { job: String },
    SetUavs { starting_slot: u32, count: usize },
    SetStencilState,
    Flush,
    GenerateMipmaps { texture: ResourceId },
    CopyTexture {
        src: ResourceId,
        src_mip: u32,
        dst: ResourceId,
        dst_mip: u32,
    },
}

/// Recording no-op backend.
pub struct DummyBackend {
    caps: BackendCaps,
    next_handle: AtomicU64,
    ops: Mutex<Vec<RecordedOp>>,
    /// Layout pairs this backend treats as equivalent for reads.
    equivalent_layouts: Vec<(ResourceLayout, ResourceLayout)>,
}

impl DummyBackend {
    /// Create a dummy backend with default (fully capable) caps.
    pub fn new() -> Self {
        Self::with_caps(BackendCaps::default())
    }

    /// Create a dummy backend with specific capabilities.
    pub fn with_caps(caps: BackendCaps) -> Self {
        Self {
            caps,
            next_handle: AtomicU64::new(1),
            ops: Mutex::new(Vec::new()),
            equivalent_layouts: Vec::new(),
        }
    }

    /// Declare a pair of layouts as read-equivalent (both directions).
    pub fn with_equivalent_layouts(mut self, a: ResourceLayout, b: ResourceLayout) -> Self {
        self.equivalent_layouts.push((a, b));
        self
    }

    fn record(&self, op: RecordedOp) {
        self.ops.lock().push(op);
    }

    fn next_raw(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    /// Snapshot the recorded operation log.
    pub fn ops(&self) -> Vec<RecordedOp> {
        self.ops.lock().clone()
    }

    /// Clear the operation log (e.g. between frames in a test).
    pub fn clear_ops(&self) {
        self.ops.lock().clear();
    }

    /// Count of recorded resource transitions.
    pub fn num_transitions(&self) -> usize {
        self.ops
            .lock()
            .iter()
            .filter(|op| matches!(op, RecordedOp::Transition { .. }))
            .count()
    }

    /// Count of recorded compute dispatches.
    pub fn num_dispatches(&self) -> usize {
        self.ops
            .lock()
            .iter()
            .filter(|op| matches!(op, RecordedOp::DispatchCompute { .. }))
            .count()
    }

    /// Transitions recorded for a specific resource, in order.
    pub fn transitions_for(&self, id: ResourceId) -> Vec<(ResourceLayout, ResourceLayout)> {
        self.ops
            .lock()
            .iter()
            .filter_map(|op| match op {
                RecordedOp::Transition {
                    resource,
                    old_layout,
                    new_layout,
                } if *resource == id => Some((*old_layout, *new_layout)),
                _ => None,
            })
            .collect()
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn caps(&self) -> BackendCaps {
        self.caps
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> Result<TextureHandle, CompositorError> {
        let handle = TextureHandle::from_raw(self.next_raw());
        log::trace!(
            "DummyBackend: creating texture '{}' ({}x{}x{}, {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.depth_or_slices,
            desc.format
        );
        self.record(RecordedOp::CreateTexture {
            label: desc.label.clone(),
            handle,
        });
        Ok(handle)
    }

    fn destroy_texture(&self, handle: TextureHandle) {
        self.record(RecordedOp::DestroyTexture(handle));
    }

    fn create_buffer(&self, desc: &BufferDescriptor) -> Result<BufferHandle, CompositorError> {
        let handle = BufferHandle::from_raw(self.next_raw());
        log::trace!(
            "DummyBackend: creating buffer '{}' ({} x {} bytes)",
            desc.label,
            desc.num_elements,
            desc.bytes_per_element
        );
        self.record(RecordedOp::CreateBuffer {
            label: desc.label.clone(),
            handle,
        });
        Ok(handle)
    }

    fn destroy_buffer(&self, handle: BufferHandle) {
        self.record(RecordedOp::DestroyBuffer(handle));
    }

    fn begin_frame(&self) {
        self.record(RecordedOp::BeginFrame);
    }

    fn end_frame(&self) {
        self.record(RecordedOp::EndFrame);
    }

    fn begin_render_pass(&self, desc: &RenderPassDesc, _viewport: &ViewportRect) {
        self.record(RecordedOp::BeginRenderPass {
            num_colour: desc.colour.len(),
            has_depth: desc.depth.is_some(),
        });
    }

    fn end_render_pass(&self) {
        self.record(RecordedOp::EndRenderPass);
    }

    fn clear(&self, desc: &RenderPassDesc) {
        self.record(RecordedOp::Clear {
            num_colour: desc.colour.len(),
            has_depth: desc.depth.is_some(),
        });
    }

    fn execute_resource_transitions(&self, transitions: &[ResourceTransition]) {
        for t in transitions {
            self.record(RecordedOp::Transition {
                resource: t.resource.id(),
                old_layout: t.old_layout,
                new_layout: t.new_layout,
            });
        }
    }

    fn dispatch_compute(&self, job: &ComputeJob) {
        self.record(RecordedOp::DispatchCompute {
            job: job.name().to_string(),
        });
    }

    fn set_uavs(&self, starting_slot: u32, bindings: &[UavBinding]) {
        self.record(RecordedOp::SetUavs {
            starting_slot,
            count: bindings.len(),
        });
    }

    fn set_stencil_state(&self, _params: &StencilParams) {
        self.record(RecordedOp::SetStencilState);
    }

    fn flush(&self) {
        self.record(RecordedOp::Flush);
    }

    fn generate_mipmaps(&self, texture: &Texture) {
        self.record(RecordedOp::GenerateMipmaps {
            texture: texture.id(),
        });
    }

    fn copy_texture(&self, src: &Texture, src_mip: u32, dst: &Texture, dst_mip: u32) {
        self.record(RecordedOp::CopyTexture {
            src: src.id(),
            src_mip,
            dst: dst.id(),
            dst_mip,
        });
    }

    fn is_same_layout(&self, a: ResourceLayout, b: ResourceLayout) -> bool {
        a == b
            || self
                .equivalent_layouts
                .iter()
                .any(|&(x, y)| (x == a && y == b) || (x == b && y == a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_in_order() {
        let backend = DummyBackend::new();
        backend.begin_frame();
        backend.end_frame();
        assert_eq!(backend.ops(), vec![RecordedOp::BeginFrame, RecordedOp::EndFrame]);
    }

    #[test]
    fn test_layout_equivalence() {
        let backend = DummyBackend::new()
            .with_equivalent_layouts(ResourceLayout::Texture, ResourceLayout::RenderTargetReadOnly);
        assert!(backend.is_same_layout(
            ResourceLayout::RenderTargetReadOnly,
            ResourceLayout::Texture
        ));
        assert!(!backend.is_same_layout(ResourceLayout::Texture, ResourceLayout::Uav));
    }
}
