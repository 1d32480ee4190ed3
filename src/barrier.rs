//! Resource layout tracking and barrier resolution.
//!
//! The [`BarrierSolver`] is the single source of truth for "what layout and
//! access is resource R currently in, as far as the compositor's bookkeeping
//! is concerned". Passes call [`BarrierSolver::resolve_texture_transition`]
//! for every resource they touch, in the order they will use them, right
//! before executing their transitions; the solver appends a transition to
//! the output only when one is actually required.
//!
//! Rules, in short:
//!
//! - Two consecutive `Read` accesses never require a barrier.
//! - Any write does, even write-after-write, unless the caller explicitly
//!   allows it for that resource.
//! - Layout equivalence is backend-defined ([`RenderBackend::is_same_layout`]);
//!   equivalent layouts with compatible access are a no-op beyond bookkeeping.
//! - The first use of a never-before-seen resource transitions from the
//!   texture's initial layout. Reading a discardable resource that was never
//!   written is a configuration error, caught here.

use std::sync::Arc;

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use crate::backend::RenderBackend;
use crate::error::CompositorError;
use crate::resources::{ResourceId, Texture, UavBuffer};

/// GPU memory layout a tracked resource can be in.
///
/// Buffers have no layout; their transitions use `Undefined` on both sides
/// and carry only access/stage information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceLayout {
    /// Contents undefined; initial state of discardable resources.
    #[default]
    Undefined,
    /// Optimal for sampling in shaders.
    Texture,
    /// Optimal for colour attachment writes.
    RenderTarget,
    /// Render target bound read-only (e.g. depth tested but not written).
    RenderTargetReadOnly,
    /// Optimal for depth/stencil attachment writes.
    RenderDepth,
    /// Being cleared.
    Clear,
    /// Unordered-access read/write.
    Uav,
    /// Source of a copy.
    CopySrc,
    /// Destination of a copy.
    CopyDst,
    /// Under hardware mipmap generation.
    MipmapGen,
    /// Destination of an MSAA resolve.
    ResolveDest,
    /// Ready for presentation.
    PresentReady,
}

impl ResourceLayout {
    /// Layouts that can only ever be read from. Transitioning undefined
    /// contents into one of these is always a mistake.
    pub fn is_read_only(self) -> bool {
        matches!(
            self,
            Self::Texture | Self::RenderTargetReadOnly | Self::CopySrc
        )
    }
}

/// How a resource is accessed in a given layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceAccess {
    /// Not yet accessed.
    #[default]
    Undefined,
    Read,
    Write,
    ReadWrite,
}

impl ResourceAccess {
    /// Whether this access includes a write.
    pub fn is_write(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }

    /// Human-readable name, for error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Undefined => "Undefined",
            Self::Read => "Read",
            Self::Write => "Write",
            Self::ReadWrite => "ReadWrite",
        }
    }
}

bitflags! {
    /// Shader stages that consume a resource after a transition.
    ///
    /// Only meaningful for `Texture` and `Uav` layouts; all other layouts
    /// imply their stage (attachment output, transfer, ...).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StageMask: u8 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE = 1 << 2;
    }
}

/// A tracked resource: either a texture or a UAV buffer.
#[derive(Clone)]
pub enum TrackedResource {
    Texture(Arc<Texture>),
    Buffer(Arc<UavBuffer>),
}

impl TrackedResource {
    /// Stable identity of the underlying resource.
    pub fn id(&self) -> ResourceId {
        match self {
            Self::Texture(t) => t.id(),
            Self::Buffer(b) => b.id(),
        }
    }

    /// The texture, if this is one.
    pub fn as_texture(&self) -> Option<&Arc<Texture>> {
        match self {
            Self::Texture(t) => Some(t),
            Self::Buffer(_) => None,
        }
    }
}

impl std::fmt::Debug for TrackedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Texture(t) => write!(f, "Texture({:?})", t.name()),
            Self::Buffer(b) => write!(f, "Buffer({:?})", b.name()),
        }
    }
}

/// One resource transition, ready for the backend to turn into a barrier.
#[derive(Debug, Clone)]
pub struct ResourceTransition {
    pub resource: TrackedResource,
    pub old_layout: ResourceLayout,
    pub new_layout: ResourceLayout,
    pub old_access: ResourceAccess,
    pub new_access: ResourceAccess,
    pub old_stages: StageMask,
    pub new_stages: StageMask,
}

/// Last known layout/access/stages of a tracked resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceStatus {
    pub layout: ResourceLayout,
    pub access: ResourceAccess,
    pub stages: StageMask,
}

/// Map seeded into the solver for resources whose layout is known
/// out-of-band, e.g. persisted from the previous frame's final layouts.
pub type ResourceStatusMap = FxHashMap<ResourceId, ResourceStatus>;

/// Tracks resource state across a frame and computes minimal transitions.
#[derive(Debug, Default)]
pub struct BarrierSolver {
    resource_status: ResourceStatusMap,
}

/// Debug-build check for the legal (layout, access) pairs.
fn debug_check_layout_access(layout: ResourceLayout, access: ResourceAccess, stages: StageMask) {
    debug_assert!(
        layout == ResourceLayout::Texture || layout == ResourceLayout::Uav || stages.is_empty(),
        "stage mask must be empty when layout is neither Texture nor Uav (got {layout:?})"
    );
    let legal = match layout {
        ResourceLayout::Texture => access == ResourceAccess::Read,
        ResourceLayout::CopySrc => access == ResourceAccess::Read,
        ResourceLayout::CopyDst => access == ResourceAccess::Write,
        ResourceLayout::MipmapGen => access == ResourceAccess::ReadWrite,
        ResourceLayout::RenderTargetReadOnly => access == ResourceAccess::Read,
        _ => true,
    };
    debug_assert!(legal, "invalid layout-access pair: {layout:?} + {access:?}");
}

impl BarrierSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current bookkeeping state, keyed by resource id.
    pub fn resource_status(&self) -> &ResourceStatusMap {
        &self.resource_status
    }

    /// Last recorded status for a single resource.
    pub fn status_of(&self, id: ResourceId) -> Option<&ResourceStatus> {
        self.resource_status.get(&id)
    }

    /// Drop all bookkeeping. Next use of every resource counts as first use.
    pub fn reset(&mut self) {
        self.resource_status.clear();
    }

    /// Stop tracking a destroyed resource.
    pub fn forget(&mut self, id: ResourceId) {
        self.resource_status.remove(&id);
    }

    /// Record that `texture` must be in `new_layout` with `access` before
    /// the next GPU operation, appending a transition to `transitions` iff
    /// one is required.
    ///
    /// `allow_write_after_write` suppresses the barrier for consecutive
    /// plain writes to the same UAV; callers set it from their declared
    /// UAV dependencies.
    pub fn resolve_texture_transition(
        &mut self,
        transitions: &mut Vec<ResourceTransition>,
        texture: &Arc<Texture>,
        new_layout: ResourceLayout,
        access: ResourceAccess,
        stages: StageMask,
        allow_write_after_write: bool,
        backend: &dyn RenderBackend,
    ) -> Result<(), CompositorError> {
        debug_check_layout_access(new_layout, access, stages);

        match self.resource_status.get_mut(&texture.id()) {
            None => {
                let old_layout = texture.initial_layout();
                if old_layout == ResourceLayout::Undefined && new_layout.is_read_only() {
                    // Catches the common bug of marking a resource
                    // discardable when something actually reads it before
                    // the first write of the frame.
                    return Err(CompositorError::IllegalTransition(format!(
                        "texture '{}' has undefined contents but its first use this frame \
                         is a transition to read-only layout {:?}",
                        texture.name(),
                        new_layout
                    )));
                }

                self.resource_status.insert(
                    texture.id(),
                    ResourceStatus {
                        layout: new_layout,
                        access,
                        stages,
                    },
                );

                transitions.push(ResourceTransition {
                    resource: TrackedResource::Texture(Arc::clone(texture)),
                    old_layout,
                    new_layout,
                    old_access: ResourceAccess::Undefined,
                    new_access: access,
                    old_stages: StageMask::empty(),
                    new_stages: StageMask::empty(),
                });
            }
            Some(status) => {
                let uav_hazard = new_layout == ResourceLayout::Uav
                    && !(access == ResourceAccess::Read && status.access == ResourceAccess::Read)
                    && !(allow_write_after_write
                        && access == ResourceAccess::Write
                        && status.access == ResourceAccess::Write);

                if !backend.is_same_layout(status.layout, new_layout) || uav_hazard {
                    transitions.push(ResourceTransition {
                        resource: TrackedResource::Texture(Arc::clone(texture)),
                        old_layout: status.layout,
                        new_layout,
                        old_access: status.access,
                        new_access: access,
                        old_stages: status.stages,
                        new_stages: stages,
                    });

                    // After a barrier the accumulated stage mask restarts.
                    status.stages = StageMask::empty();
                }

                status.layout = new_layout;
                status.access = access;
                status.stages |= stages;
            }
        }

        Ok(())
    }

    /// Buffer version of [`resolve_texture_transition`]. Buffers have no
    /// layout to transition, so the first use never emits anything and
    /// later uses emit pure memory barriers on any non-read-after-read.
    ///
    /// [`resolve_texture_transition`]: Self::resolve_texture_transition
    pub fn resolve_buffer_transition(
        &mut self,
        transitions: &mut Vec<ResourceTransition>,
        buffer: &Arc<UavBuffer>,
        access: ResourceAccess,
        stages: StageMask,
        allow_write_after_write: bool,
    ) {
        match self.resource_status.get_mut(&buffer.id()) {
            None => {
                // Nothing to wait for on first sight.
                self.resource_status.insert(
                    buffer.id(),
                    ResourceStatus {
                        layout: ResourceLayout::Undefined,
                        access,
                        stages,
                    },
                );
            }
            Some(status) => {
                let hazard = !(access == ResourceAccess::Read
                    && status.access == ResourceAccess::Read)
                    && !(allow_write_after_write
                        && access == ResourceAccess::Write
                        && status.access == ResourceAccess::Write);

                if hazard {
                    transitions.push(ResourceTransition {
                        resource: TrackedResource::Buffer(Arc::clone(buffer)),
                        old_layout: ResourceLayout::Undefined,
                        new_layout: ResourceLayout::Undefined,
                        old_access: status.access,
                        new_access: access,
                        old_stages: status.stages,
                        new_stages: stages,
                    });

                    status.stages = StageMask::empty();
                }

                status.access = access;
                status.stages |= stages;
            }
        }
    }

    /// Force-set bookkeeping for a texture without emitting a barrier.
    ///
    /// Used when a resource is known to have been transitioned out-of-band,
    /// e.g. by a mipmap-generation routine that manages its own barriers.
    pub fn assume_texture_transition(
        &mut self,
        texture: &Texture,
        layout: ResourceLayout,
        access: ResourceAccess,
        stages: StageMask,
    ) {
        debug_check_layout_access(layout, access, stages);
        self.resource_status.insert(
            texture.id(),
            ResourceStatus {
                layout,
                access,
                stages,
            },
        );
    }

    /// Bulk version of [`assume_texture_transition`]; used once per frame to
    /// seed the state of resources persisted frame-to-frame.
    ///
    /// [`assume_texture_transition`]: Self::assume_texture_transition
    pub fn assume_transitions(&mut self, status: &ResourceStatusMap) {
        for (id, s) in status {
            self.resource_status.insert(*id, *s);
        }
    }

    /// Debug-only consistency check: bookkeeping must agree with the
    /// texture's externally observed layout, unless a transition queued this
    /// frame (and not yet executed) explains the difference. A mismatch
    /// means some code path mutated the resource's layout without going
    /// through the solver.
    ///
    /// Compiled out in release builds; release trusts the invariant.
    pub fn debug_verify_consistency(&self, texture: &Texture, pending: &[ResourceTransition]) {
        #[cfg(debug_assertions)]
        {
            if let Some(status) = self.resource_status.get(&texture.id()) {
                let actual = texture.current_layout();
                if status.layout != actual {
                    let explained = pending
                        .iter()
                        .any(|t| t.resource.id() == texture.id() && t.new_layout == status.layout);
                    assert!(
                        explained,
                        "barrier solver bookkeeping for texture '{}' says {:?} but the \
                         resource is in {:?}; its layout was changed without the solver",
                        texture.name(),
                        status.layout,
                        actual
                    );
                }
            }
        }
        #[cfg(not(debug_assertions))]
        {
            let _ = (texture, pending);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::types::{PixelFormat, TextureDescriptor, TextureUsage};

    fn test_texture(backend: &Arc<DummyBackend>, discardable: bool) -> Arc<Texture> {
        let mut usage = TextureUsage::RENDER_TARGET;
        if discardable {
            usage |= TextureUsage::DISCARDABLE_CONTENT;
        }
        Texture::create(
            backend.clone() as Arc<dyn RenderBackend>,
            "test_rt",
            &TextureDescriptor::new_2d(64, 64, PixelFormat::Rgba8Unorm, usage),
        )
        .unwrap()
    }

    #[test]
    fn test_first_use_transitions_from_undefined() {
        let backend = Arc::new(DummyBackend::new());
        let tex = test_texture(&backend, true);
        let mut solver = BarrierSolver::new();
        let mut transitions = Vec::new();

        solver
            .resolve_texture_transition(
                &mut transitions,
                &tex,
                ResourceLayout::RenderTarget,
                ResourceAccess::Write,
                StageMask::empty(),
                false,
                backend.as_ref(),
            )
            .unwrap();

        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].old_layout, ResourceLayout::Undefined);
        assert_eq!(transitions[0].new_layout, ResourceLayout::RenderTarget);
    }

    #[test]
    fn test_discardable_first_read_is_error() {
        let backend = Arc::new(DummyBackend::new());
        let tex = test_texture(&backend, true);
        let mut solver = BarrierSolver::new();
        let mut transitions = Vec::new();

        let result = solver.resolve_texture_transition(
            &mut transitions,
            &tex,
            ResourceLayout::Texture,
            ResourceAccess::Read,
            StageMask::FRAGMENT,
            false,
            backend.as_ref(),
        );

        assert!(matches!(result, Err(CompositorError::IllegalTransition(_))));
        assert!(transitions.is_empty());
    }

    #[test]
    fn test_no_redundant_barrier_on_repeat_read() {
        let backend = Arc::new(DummyBackend::new());
        let tex = test_texture(&backend, true);
        let mut solver = BarrierSolver::new();
        let mut transitions = Vec::new();

        solver
            .resolve_texture_transition(
                &mut transitions,
                &tex,
                ResourceLayout::RenderTarget,
                ResourceAccess::Write,
                StageMask::empty(),
                false,
                backend.as_ref(),
            )
            .unwrap();
        for _ in 0..2 {
            solver
                .resolve_texture_transition(
                    &mut transitions,
                    &tex,
                    ResourceLayout::Texture,
                    ResourceAccess::Read,
                    StageMask::FRAGMENT,
                    false,
                    backend.as_ref(),
                )
                .unwrap();
        }

        // Undefined -> RenderTarget, RenderTarget -> Texture, and nothing
        // for the second read.
        assert_eq!(transitions.len(), 2);
    }

    #[test]
    fn test_uav_write_after_write_barriers() {
        let backend = Arc::new(DummyBackend::new());
        let tex = test_texture(&backend, true);
        let mut solver = BarrierSolver::new();
        let mut transitions = Vec::new();

        for _ in 0..2 {
            solver
                .resolve_texture_transition(
                    &mut transitions,
                    &tex,
                    ResourceLayout::Uav,
                    ResourceAccess::Write,
                    StageMask::COMPUTE,
                    false,
                    backend.as_ref(),
                )
                .unwrap();
        }

        assert_eq!(transitions.len(), 2, "write-after-write must barrier");

        // Explicitly allowed write-after-write does not.
        transitions.clear();
        solver
            .resolve_texture_transition(
                &mut transitions,
                &tex,
                ResourceLayout::Uav,
                ResourceAccess::Write,
                StageMask::COMPUTE,
                true,
                backend.as_ref(),
            )
            .unwrap();
        assert!(transitions.is_empty());
    }

    #[test]
    fn test_stage_mask_accumulates_and_resets() {
        let backend = Arc::new(DummyBackend::new());
        let tex = test_texture(&backend, true);
        let mut solver = BarrierSolver::new();
        let mut transitions = Vec::new();

        solver
            .resolve_texture_transition(
                &mut transitions,
                &tex,
                ResourceLayout::RenderTarget,
                ResourceAccess::Write,
                StageMask::empty(),
                false,
                backend.as_ref(),
            )
            .unwrap();
        solver
            .resolve_texture_transition(
                &mut transitions,
                &tex,
                ResourceLayout::Texture,
                ResourceAccess::Read,
                StageMask::FRAGMENT,
                false,
                backend.as_ref(),
            )
            .unwrap();
        solver
            .resolve_texture_transition(
                &mut transitions,
                &tex,
                ResourceLayout::Texture,
                ResourceAccess::Read,
                StageMask::COMPUTE,
                false,
                backend.as_ref(),
            )
            .unwrap();

        // No third transition, but the mask remembers both consumers.
        assert_eq!(transitions.len(), 2);
        let status = solver.status_of(tex.id()).unwrap();
        assert_eq!(status.stages, StageMask::FRAGMENT | StageMask::COMPUTE);
    }

    #[test]
    fn test_assume_does_not_emit() {
        let backend = Arc::new(DummyBackend::new());
        let tex = test_texture(&backend, false);
        let mut solver = BarrierSolver::new();

        solver.assume_texture_transition(
            &tex,
            ResourceLayout::Texture,
            ResourceAccess::Read,
            StageMask::FRAGMENT,
        );

        let mut transitions = Vec::new();
        solver
            .resolve_texture_transition(
                &mut transitions,
                &tex,
                ResourceLayout::Texture,
                ResourceAccess::Read,
                StageMask::FRAGMENT,
                false,
                backend.as_ref(),
            )
            .unwrap();
        assert!(transitions.is_empty());
    }

    #[test]
    fn test_buffer_first_use_is_silent() {
        let backend = Arc::new(DummyBackend::new());
        let buf = UavBuffer::create(
            backend.clone() as Arc<dyn RenderBackend>,
            "test_buf",
            &crate::types::BufferDescriptor::new(128, 16, crate::types::BufferBindFlags::UAV),
        )
        .unwrap();
        let mut solver = BarrierSolver::new();
        let mut transitions = Vec::new();

        solver.resolve_buffer_transition(
            &mut transitions,
            &buf,
            ResourceAccess::Write,
            StageMask::COMPUTE,
            false,
        );
        assert!(transitions.is_empty());

        solver.resolve_buffer_transition(
            &mut transitions,
            &buf,
            ResourceAccess::Read,
            StageMask::COMPUTE,
            false,
        );
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].old_access, ResourceAccess::Write);
        assert_eq!(transitions[0].new_access, ResourceAccess::Read);
    }

    #[test]
    fn test_status_tracks_most_recent_call() {
        let backend = Arc::new(DummyBackend::new());
        let tex = test_texture(&backend, true);
        let mut solver = BarrierSolver::new();
        let mut transitions = Vec::new();

        for (layout, access) in [
            (ResourceLayout::RenderTarget, ResourceAccess::Write),
            (ResourceLayout::Texture, ResourceAccess::Read),
            (ResourceLayout::Uav, ResourceAccess::ReadWrite),
        ] {
            solver
                .resolve_texture_transition(
                    &mut transitions,
                    &tex,
                    layout,
                    access,
                    StageMask::empty(),
                    false,
                    backend.as_ref(),
                )
                .unwrap();
            let status = solver.status_of(tex.id()).unwrap();
            assert_eq!(status.layout, layout);
            assert_eq!(status.access, access);
        }
    }
}
