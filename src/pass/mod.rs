//! Pass instances: one atomic GPU operation each.
//!
//! A [`Pass`] pairs the immutable shared [`PassDef`] with per-instance
//! state ([`PassState`]) and a kind-specific body ([`PassBody`]). Every
//! pass runs the same two lifecycle phases per frame: **analyze** (compute
//! the resource transitions it needs) and **execute** (run the transitions,
//! then its GPU operation), wrapped in the shared preamble: the
//! passes-remaining gate and the early-pre/pre/post listener hooks.

pub mod target;

mod clear;
mod compute;
mod depth_copy;
mod ibl_specular;
mod mipmap;
mod quad;
mod scene;
mod shadows;
mod stencil;
mod uav;
mod warm_up;

pub use target::{ColourTarget, DepthTarget, RenderPassDesc, StencilTarget};

pub(crate) use clear::ClearExec;
pub(crate) use compute::ComputeExec;
pub(crate) use depth_copy::DepthCopyExec;
pub(crate) use ibl_specular::IblSpecularExec;
pub(crate) use mipmap::MipmapExec;
pub(crate) use quad::QuadExec;
pub(crate) use scene::SceneExec;
pub(crate) use shadows::ShadowsExec;
pub(crate) use stencil::StencilExec;
pub(crate) use uav::UavExec;
pub(crate) use warm_up::WarmUpExec;

use std::sync::Arc;

use crate::backend::UavBinding;
use crate::barrier::{
    BarrierSolver, ResourceAccess, ResourceLayout, ResourceTransition, StageMask, TrackedResource,
};
use crate::channel::{ChannelResolver, GlobalChannels};
use crate::context::{CameraHandle, CompositorContext};
use crate::definition::{PassCustomDef, PassDef, PassKind, PassKindDef, RtvDef};
use crate::error::CompositorError;
use crate::listener::WorkspaceListener;
use crate::name::NameId;
use crate::resources::Texture;
use crate::shadow::ShadowNodeArena;
use crate::types::ViewportRect;

/// Number of UAV slots addressable by Uav passes and UAV dependencies.
pub const NUM_UAV_SLOTS: usize = 64;

// ============================================================================
// Execution context
// ============================================================================

/// Everything a pass needs while analyzing or executing, borrowed from the
/// owning workspace for the duration of the frame walk.
pub struct ExecContext<'a> {
    pub ctx: &'a CompositorContext,
    pub solver: &'a mut BarrierSolver,
    pub listeners: &'a [Arc<dyn WorkspaceListener>],
    pub globals: &'a GlobalChannels,
    /// `None` while executing inside a shadow node; shadow nodes cannot
    /// trigger other shadow nodes.
    pub shadow_nodes: Option<&'a mut ShadowNodeArena>,
    /// UAV slots currently bound by a Uav pass, consulted by passes
    /// declaring UAV dependencies.
    pub bound_uavs: &'a mut Vec<Option<UavBinding>>,
    pub default_camera: CameraHandle,
    pub execution_mask: u8,
    pub viewport_modifier_mask: u8,
    /// Viewport offset (x, y) and scale (z, w) applied to passes whose
    /// modifier mask matches.
    pub viewport_modifier: [f32; 4],
}

// ============================================================================
// Pass creation arguments
// ============================================================================

/// Context handed to pass constructors by `Node::create_passes`.
pub(crate) struct PassCreateArgs<'a> {
    pub ctx: &'a CompositorContext,
    /// `None` while creating a shadow node's own passes.
    pub shadow_nodes: Option<&'a mut ShadowNodeArena>,
    pub globals: &'a GlobalChannels,
    pub final_target: &'a Arc<Texture>,
    pub default_camera: CameraHandle,
    /// Unique per instantiation, for naming cloned compute jobs.
    pub unique_suffix: u64,
}

// ============================================================================
// Pass state
// ============================================================================

/// Mutable per-instance state shared by all pass kinds.
///
/// This is what listeners see in their hooks.
pub struct PassState {
    def: Arc<PassDef>,
    render_pass_desc: Option<RenderPassDesc>,
    /// First valid texture of the descriptor, for size queries.
    any_target_texture: Option<(Arc<Texture>, u32)>,
    num_passes_left: u32,
    /// Transitions computed by the last analyze.
    transitions: Vec<ResourceTransition>,
    /// Channel textures this pass samples (exposed textures + kind
    /// specific additions).
    texture_dependencies: Vec<(NameId, Arc<Texture>)>,
    /// Set when a target-level barrier gathers this pass' transitions;
    /// the pass then skips its own analyze/execute of barriers.
    barriers_handled_externally: bool,
}

impl PassState {
    fn new(def: Arc<PassDef>) -> Self {
        assert!(
            def.num_initial_passes > 0,
            "definition is broken, pass would never execute"
        );
        let num_passes_left = def.num_initial_passes;
        Self {
            def,
            render_pass_desc: None,
            any_target_texture: None,
            num_passes_left,
            transitions: Vec::new(),
            texture_dependencies: Vec::new(),
            barriers_handled_externally: false,
        }
    }

    /// Resolve the RTV and fill the render pass descriptor and texture
    /// dependencies. Must be called by every pass kind; kinds without a
    /// target pass `supports_no_rtv`.
    fn initialize(
        &mut self,
        rtv: Option<&RtvDef>,
        rt_index: u32,
        resolver: &ChannelResolver,
        supports_no_rtv: bool,
        allow_resolve_without_resolve_texture: bool,
    ) -> Result<(), CompositorError> {
        match rtv {
            None if !supports_no_rtv => {
                return Err(CompositorError::InvalidParams(format!(
                    "no render target view provided to this {} pass in node '{}'; \
                     only a few pass kinds support running without one",
                    self.def.kind().as_str(),
                    resolver.node_def().name_str()
                )));
            }
            None => {}
            Some(rtv) => {
                let desc = target::setup_render_pass_desc(
                    &self.def,
                    rtv,
                    rt_index,
                    resolver,
                    allow_resolve_without_resolve_texture,
                )?;
                self.any_target_texture = desc.any_target_texture();
                self.render_pass_desc = Some(desc);
            }
        }

        self.populate_exposed_texture_dependencies(resolver)?;
        Ok(())
    }

    fn populate_exposed_texture_dependencies(
        &mut self,
        resolver: &ChannelResolver,
    ) -> Result<(), CompositorError> {
        for &name in &self.def.exposed_textures {
            let texture = resolver.texture(name)?;
            self.texture_dependencies.push((name, texture));
        }
        Ok(())
    }

    pub fn definition(&self) -> &Arc<PassDef> {
        &self.def
    }

    pub fn kind(&self) -> PassKind {
        self.def.kind()
    }

    pub fn render_pass_desc(&self) -> Option<&RenderPassDesc> {
        self.render_pass_desc.as_ref()
    }

    pub fn num_passes_left(&self) -> u32 {
        self.num_passes_left
    }

    pub fn texture_dependencies(&self) -> &[(NameId, Arc<Texture>)] {
        &self.texture_dependencies
    }

    /// Actual pixel dimensions of the pass' viewport.
    pub fn actual_dimensions(&self) -> Option<(u32, u32)> {
        let (texture, mip) = self.any_target_texture.as_ref()?;
        let vp = &self.def.viewport;
        Some((
            (((texture.width() >> mip).max(1)) as f32 * vp.width).floor() as u32,
            (((texture.height() >> mip).max(1)) as f32 * vp.height).floor() as u32,
        ))
    }

    /// Viewport with the workspace's modifier applied (when masks match).
    fn effective_viewport(&self, exec: &ExecContext) -> ViewportRect {
        let apply = exec.viewport_modifier_mask & self.def.viewport_modifier_mask != 0;
        let m = if apply {
            exec.viewport_modifier
        } else {
            [0.0, 0.0, 1.0, 1.0]
        };
        let vp = &self.def.viewport;
        ViewportRect {
            left: vp.left + m[0],
            top: vp.top + m[1],
            width: vp.width * m[2],
            height: vp.height * m[3],
            scissor_left: vp.scissor_left + m[0],
            scissor_top: vp.scissor_top + m[1],
            scissor_width: vp.scissor_width * m[2],
            scissor_height: vp.scissor_height * m[3],
        }
    }

    /// The passes-remaining gate: returns false when the pass already
    /// fired its configured number of times.
    fn begin_execution(&mut self) -> bool {
        if self.num_passes_left != u32::MAX {
            if self.num_passes_left == 0 {
                return false;
            }
            self.num_passes_left -= 1;
        }
        true
    }

    pub(crate) fn reset_num_passes_left(&mut self) {
        self.num_passes_left = self.def.num_initial_passes;
    }

    // ------------------------------------------------------------------------
    // Listener hooks
    // ------------------------------------------------------------------------

    fn fire_early_pre(&self, exec: &ExecContext) {
        for listener in exec.listeners {
            listener.pass_early_pre_execute(self);
        }
    }

    fn fire_pre(&self, exec: &ExecContext) {
        for listener in exec.listeners {
            listener.pass_pre_execute(self);
        }
    }

    fn fire_post(&self, exec: &ExecContext) {
        for listener in exec.listeners {
            listener.pass_post_execute(self);
        }
    }

    // ------------------------------------------------------------------------
    // Barrier helpers
    // ------------------------------------------------------------------------

    /// Generic analysis shared by render passes: transitions every bound
    /// attachment for rendering, every texture dependency for sampling,
    /// and every declared UAV dependency.
    fn analyze_render_targets_and_deps(
        &self,
        out: &mut Vec<ResourceTransition>,
        exec: &mut ExecContext,
    ) -> Result<(), CompositorError> {
        let backend = exec.ctx.backend().as_ref();

        if let Some(rpd) = &self.render_pass_desc {
            for colour in &rpd.colour {
                exec.solver.resolve_texture_transition(
                    out,
                    &colour.texture,
                    ResourceLayout::RenderTarget,
                    ResourceAccess::Write,
                    StageMask::empty(),
                    false,
                    backend,
                )?;
            }
            if let Some(depth) = &rpd.depth {
                let (layout, access) = if depth.read_only {
                    (ResourceLayout::RenderTargetReadOnly, ResourceAccess::Read)
                } else {
                    (ResourceLayout::RenderDepth, ResourceAccess::Write)
                };
                exec.solver.resolve_texture_transition(
                    out,
                    &depth.texture,
                    layout,
                    access,
                    StageMask::empty(),
                    false,
                    backend,
                )?;
            }
            if let Some(stencil) = &rpd.stencil {
                let shared_with_depth = rpd
                    .depth
                    .as_ref()
                    .is_some_and(|d| d.texture.id() == stencil.texture.id());
                if !shared_with_depth {
                    let (layout, access) = if stencil.read_only {
                        (ResourceLayout::RenderTargetReadOnly, ResourceAccess::Read)
                    } else {
                        (ResourceLayout::RenderDepth, ResourceAccess::Write)
                    };
                    exec.solver.resolve_texture_transition(
                        out,
                        &stencil.texture,
                        layout,
                        access,
                        StageMask::empty(),
                        false,
                        backend,
                    )?;
                }
            }
        }

        for (_, texture) in &self.texture_dependencies {
            exec.solver.resolve_texture_transition(
                out,
                texture,
                ResourceLayout::Texture,
                ResourceAccess::Read,
                StageMask::VERTEX | StageMask::FRAGMENT,
                false,
                backend,
            )?;
        }

        self.analyze_uav_dependencies(out, exec)?;
        Ok(())
    }

    /// Transition the UAVs this pass depends on (bound earlier by a Uav
    /// pass). UAVs stay hazardous even UAV-to-UAV: anything but
    /// read-after-read (or explicitly allowed write-after-write) needs a
    /// memory barrier.
    fn analyze_uav_dependencies(
        &self,
        out: &mut Vec<ResourceTransition>,
        exec: &mut ExecContext,
    ) -> Result<(), CompositorError> {
        let backend = exec.ctx.backend().as_ref();
        for dep in &self.def.uav_dependencies {
            let binding = exec
                .bound_uavs
                .get(dep.uav_slot as usize)
                .and_then(|b| b.as_ref())
                .ok_or_else(|| {
                    CompositorError::InvalidState(format!(
                        "no UAV is bound at slot {} but the {} pass marks it as used",
                        dep.uav_slot,
                        self.def.kind().as_str()
                    ))
                })?;

            let compatible = binding.access == dep.access
                || binding.access == ResourceAccess::ReadWrite;
            if !compatible {
                return Err(CompositorError::InvalidState(format!(
                    "pass marked {} access to UAV at slot {} but this UAV is bound \
                     for {} access",
                    dep.access.as_str(),
                    dep.uav_slot,
                    binding.access.as_str()
                )));
            }

            match &binding.resource {
                TrackedResource::Texture(texture) => {
                    let texture = Arc::clone(texture);
                    exec.solver.resolve_texture_transition(
                        out,
                        &texture,
                        ResourceLayout::Uav,
                        dep.access,
                        StageMask::VERTEX | StageMask::FRAGMENT,
                        dep.allow_write_after_write,
                        backend,
                    )?;
                }
                TrackedResource::Buffer(buffer) => {
                    let buffer = Arc::clone(buffer);
                    exec.solver.resolve_buffer_transition(
                        out,
                        &buffer,
                        dep.access,
                        StageMask::VERTEX | StageMask::FRAGMENT,
                        dep.allow_write_after_write,
                    );
                }
            }
        }
        Ok(())
    }

    /// Execute the transitions from the last analyze, updating each
    /// texture's externally observed layout and the solver's debug checks.
    fn execute_resource_transitions(&mut self, exec: &mut ExecContext) {
        if self.transitions.is_empty() {
            return;
        }

        for transition in &self.transitions {
            if let TrackedResource::Texture(texture) = &transition.resource {
                exec.solver.debug_verify_consistency(texture, &self.transitions);
            }
        }

        exec.ctx
            .backend()
            .execute_resource_transitions(&self.transitions);

        for transition in &self.transitions {
            if let TrackedResource::Texture(texture) = &transition.resource {
                texture.set_current_layout(transition.new_layout);
            }
        }
    }

    /// Transitions computed by the last barrier analysis; inspectable from
    /// listener hooks.
    pub fn transitions(&self) -> &[ResourceTransition] {
        &self.transitions
    }
}

/// Execute a transition batch immediately, outside a pass' cached list.
///
/// Used by passes that place additional barriers dynamically mid-execution
/// (the mipmap blur chain, the IBL copy fallback).
pub(crate) fn execute_transitions_now(exec: &mut ExecContext, transitions: &[ResourceTransition]) {
    if transitions.is_empty() {
        return;
    }
    for transition in transitions {
        if let TrackedResource::Texture(texture) = &transition.resource {
            exec.solver.debug_verify_consistency(texture, transitions);
        }
    }
    exec.ctx.backend().execute_resource_transitions(transitions);
    for transition in transitions {
        if let TrackedResource::Texture(texture) = &transition.resource {
            texture.set_current_layout(transition.new_layout);
        }
    }
}

// ============================================================================
// Custom passes
// ============================================================================

/// A user-supplied pass implementation for `PassKind::Custom`.
pub trait CustomPass {
    /// Compute the transitions this pass needs.
    fn analyze(
        &mut self,
        state: &PassState,
        out: &mut Vec<ResourceTransition>,
        resolver: &ChannelResolver,
        exec: &mut ExecContext,
    ) -> Result<(), CompositorError>;

    /// Perform the GPU operation. Barriers have already executed.
    fn execute(
        &mut self,
        state: &mut PassState,
        resolver: &ChannelResolver,
        exec: &mut ExecContext,
    ) -> Result<(), CompositorError>;
}

/// Factory for custom passes, installed on the context.
pub trait CustomPassProvider: Send + Sync {
    fn create_pass(
        &self,
        custom_def: &PassCustomDef,
        pass_def: &Arc<PassDef>,
    ) -> Result<Box<dyn CustomPass>, CompositorError>;
}

// ============================================================================
// Pass bodies and dispatch
// ============================================================================

/// Kind-specific pass body. The kind set is closed, fixed by the
/// definition format, so dispatch is a plain match.
pub(crate) enum PassBody {
    Scene(SceneExec),
    Quad(QuadExec),
    Clear(ClearExec),
    Stencil(StencilExec),
    DepthCopy(DepthCopyExec),
    Uav(UavExec),
    Mipmap(MipmapExec),
    IblSpecular(IblSpecularExec),
    Shadows(ShadowsExec),
    TargetBarrier {
        /// How many following sibling passes this barrier covers.
        num_passes: usize,
    },
    WarmUp(WarmUpExec),
    Compute(ComputeExec),
    Custom(Box<dyn CustomPass>),
}

/// One atomic GPU operation in a node's pass list.
pub struct Pass {
    state: PassState,
    body: PassBody,
    /// RTV this pass was built against, for rebuilds after target
    /// recreation.
    rtv_name: Option<NameId>,
    rt_index: u32,
}

impl Pass {
    /// Build a pass from its definition; the factory keyed on the kind tag.
    pub(crate) fn create(
        def: Arc<PassDef>,
        rtv: Option<&RtvDef>,
        rtv_name: Option<NameId>,
        rt_index: u32,
        resolver: &ChannelResolver,
        args: &mut PassCreateArgs,
    ) -> Result<Self, CompositorError> {
        let mut state = PassState::new(Arc::clone(&def));

        let body = match &def.kind_def {
            PassKindDef::Clear(clear_def) => {
                state.initialize(rtv, rt_index, resolver, false, true)?;
                PassBody::Clear(ClearExec::new(*clear_def))
            }
            PassKindDef::Scene(scene_def) => {
                state.initialize(rtv, rt_index, resolver, false, false)?;
                PassBody::Scene(SceneExec::new(scene_def, args)?)
            }
            PassKindDef::Quad(quad_def) => {
                state.initialize(rtv, rt_index, resolver, false, false)?;
                PassBody::Quad(QuadExec::new(quad_def, &mut state, resolver, args)?)
            }
            PassKindDef::Stencil(stencil_def) => {
                state.initialize(rtv, rt_index, resolver, false, false)?;
                PassBody::Stencil(StencilExec::new(*stencil_def))
            }
            PassKindDef::DepthCopy(copy_def) => {
                state.initialize(rtv, rt_index, resolver, true, false)?;
                PassBody::DepthCopy(DepthCopyExec::new(copy_def, resolver)?)
            }
            PassKindDef::Uav(uav_def) => {
                state.initialize(rtv, rt_index, resolver, true, false)?;
                PassBody::Uav(UavExec::new(uav_def.clone()))
            }
            PassKindDef::Mipmap(mipmap_def) => {
                state.initialize(rtv, rt_index, resolver, false, false)?;
                PassBody::Mipmap(MipmapExec::new(*mipmap_def, &state, resolver, args)?)
            }
            PassKindDef::IblSpecular(ibl_def) => {
                state.initialize(rtv, rt_index, resolver, true, false)?;
                PassBody::IblSpecular(IblSpecularExec::new(ibl_def, &mut state, resolver, args)?)
            }
            PassKindDef::Shadows(shadows_def) => {
                state.initialize(rtv, rt_index, resolver, true, false)?;
                PassBody::Shadows(ShadowsExec::new(shadows_def, args)?)
            }
            PassKindDef::WarmUp(warm_up_def) => {
                state.initialize(rtv, rt_index, resolver, true, false)?;
                PassBody::WarmUp(WarmUpExec::new(warm_up_def, args)?)
            }
            PassKindDef::Compute(compute_def) => {
                state.initialize(rtv, rt_index, resolver, true, false)?;
                PassBody::Compute(ComputeExec::new(compute_def.clone(), &mut state, resolver, args)?)
            }
            PassKindDef::Custom(custom_def) => {
                state.initialize(rtv, rt_index, resolver, true, false)?;
                let provider = args.ctx.custom_pass_provider().ok_or_else(|| {
                    CompositorError::InvalidState(
                        "workspace uses a Custom pass but no custom pass provider is \
                         installed on the context"
                            .to_string(),
                    )
                })?;
                PassBody::Custom(provider.create_pass(custom_def, &def)?)
            }
            PassKindDef::TargetBarrier => {
                // Target barriers are synthesized by the node, never
                // instantiated from a user definition directly.
                return Err(CompositorError::NotImplemented(
                    "TargetBarrier passes are created implicitly by enabling \
                     target_level_barrier on a target"
                        .to_string(),
                ));
            }
            PassKindDef::Resolve => {
                return Err(CompositorError::NotImplemented(
                    "standalone Resolve passes are not implemented; use a resolving \
                     store action instead"
                        .to_string(),
                ));
            }
        };

        Ok(Self {
            state,
            body,
            rtv_name,
            rt_index,
        })
    }

    /// Synthesized target-level barrier pass covering `num_passes`
    /// following passes.
    pub(crate) fn new_target_barrier(def: Arc<PassDef>, num_passes: usize) -> Self {
        Self {
            state: PassState::new(def),
            body: PassBody::TargetBarrier { num_passes },
            rtv_name: None,
            rt_index: 0,
        }
    }

    pub(crate) fn body_mut(&mut self) -> &mut PassBody {
        &mut self.body
    }

    pub fn state(&self) -> &PassState {
        &self.state
    }

    pub fn definition(&self) -> &Arc<PassDef> {
        self.state.definition()
    }

    pub fn kind(&self) -> PassKind {
        self.state.kind()
    }

    pub(crate) fn is_target_barrier(&self) -> Option<usize> {
        match &self.body {
            PassBody::TargetBarrier { num_passes } => Some(*num_passes),
            _ => None,
        }
    }

    pub(crate) fn set_barriers_handled_externally(&mut self, handled: bool) {
        self.state.barriers_handled_externally = handled;
    }

    pub(crate) fn reset_num_passes_left(&mut self) {
        self.state.reset_num_passes_left();
        if let PassBody::IblSpecular(body) = &mut self.body {
            body.reset_progress(&mut self.state);
        }
    }

    /// Analyze this pass' barriers into `out` without executing anything.
    /// Used by target-level barriers to gather a whole group's needs, and
    /// by the pass itself at execute time.
    pub(crate) fn analyze_into(
        &mut self,
        out: &mut Vec<ResourceTransition>,
        resolver: &ChannelResolver,
        exec: &mut ExecContext,
    ) -> Result<(), CompositorError> {
        let state = &mut self.state;
        match &mut self.body {
            PassBody::Clear(body) => body.analyze(state, out, exec),
            PassBody::Scene(body) => body.analyze(state, out, exec),
            PassBody::Quad(body) => body.analyze(state, out, exec),
            PassBody::Stencil(body) => body.analyze(state, out, exec),
            PassBody::DepthCopy(body) => body.analyze(state, out, exec),
            PassBody::Uav(body) => body.analyze(state, out, resolver, exec),
            PassBody::Mipmap(body) => body.analyze(state, out, exec),
            PassBody::IblSpecular(body) => body.analyze(state, out, exec),
            PassBody::WarmUp(body) => body.analyze(state, out, exec),
            // A shadows pass' barriers are handled by its shadow nodes; a
            // target barrier's by the node driving it.
            PassBody::Shadows(_) | PassBody::TargetBarrier { .. } => Ok(()),
            PassBody::Compute(body) => body.analyze(state, out, resolver, exec),
            PassBody::Custom(body) => body.analyze(state, out, resolver, exec),
        }
    }

    /// Run the pass: preamble, barriers, GPU operation.
    pub(crate) fn execute(
        &mut self,
        resolver: &ChannelResolver,
        exec: &mut ExecContext,
    ) -> Result<(), CompositorError> {
        if !self.state.begin_execution() {
            return Ok(());
        }

        log::trace!("pass '{}' executing", self.state.def.profiling_id);
        self.state.fire_early_pre(exec);

        let state = &mut self.state;
        match &mut self.body {
            PassBody::Clear(body) => body.execute(state, exec),
            PassBody::Scene(body) => body.execute(state, exec),
            PassBody::Quad(body) => body.execute(state, exec),
            PassBody::Stencil(body) => body.execute(state, exec),
            PassBody::DepthCopy(body) => body.execute(state, exec),
            PassBody::Uav(body) => body.execute(state, resolver, exec),
            PassBody::Mipmap(body) => body.execute(state, exec),
            PassBody::IblSpecular(body) => body.execute(state, exec),
            PassBody::Shadows(body) => body.execute(state, exec),
            PassBody::TargetBarrier { .. } => {
                // The owning node already gathered and executed the batch;
                // nothing left to do here.
                state.execute_resource_transitions(exec);
                state.fire_pre(exec);
                Ok(())
            }
            PassBody::WarmUp(body) => body.execute(state, exec),
            PassBody::Compute(body) => body.execute(state, resolver, exec),
            PassBody::Custom(body) => {
                if !state.barriers_handled_externally {
                    state.transitions.clear();
                    let mut transitions = std::mem::take(&mut state.transitions);
                    body.analyze(state, &mut transitions, resolver, exec)?;
                    state.transitions = transitions;
                    state.execute_resource_transitions(exec);
                }
                state.fire_pre(exec);
                body.execute(state, resolver, exec)
            }
        }?;

        if self.state.def.flush_command_buffers {
            exec.ctx.backend().flush();
        }

        self.state.fire_post(exec);
        Ok(())
    }

    /// Gather and execute the consolidated barrier batch for the
    /// `num_passes` passes following `barrier_index` in `passes`.
    ///
    /// Semantically transparent: the covered passes see their solver state
    /// already up to date and skip their own barrier work.
    pub(crate) fn run_target_barrier(
        passes: &mut [Pass],
        barrier_index: usize,
        resolver: &ChannelResolver,
        exec: &mut ExecContext,
    ) -> Result<(), CompositorError> {
        let num_passes = passes[barrier_index]
            .is_target_barrier()
            .expect("run_target_barrier called on a non-barrier pass");

        let mut batch = Vec::new();
        let end = (barrier_index + 1 + num_passes).min(passes.len());
        let (head, tail) = passes.split_at_mut(barrier_index + 1);
        let barrier = head.last_mut().unwrap();
        for pass in &mut tail[..end - barrier_index - 1] {
            pass.analyze_into(&mut batch, resolver, exec)?;
        }

        barrier.state.transitions = batch;
        barrier.execute(resolver, exec)
    }

    // ------------------------------------------------------------------------
    // Invalidation cascade
    // ------------------------------------------------------------------------

    /// A texture used by this pass was destroyed and recreated (same
    /// identity, new backing storage). Rebuilds the render pass
    /// descriptor and per-kind caches when affected. Returns whether the
    /// pass uses the texture.
    pub(crate) fn notify_recreated(
        &mut self,
        texture: &Texture,
        resolver: &ChannelResolver,
        args: &mut PassCreateArgs,
    ) -> Result<bool, CompositorError> {
        let uses_rt = self
            .state
            .render_pass_desc
            .as_ref()
            .is_some_and(|rpd| rpd.uses_texture(texture));
        let uses_dep = self
            .state
            .texture_dependencies
            .iter()
            .any(|(_, t)| t.id() == texture.id());
        let body_uses = match &self.body {
            PassBody::Mipmap(body) => body.uses_texture(texture),
            PassBody::IblSpecular(body) => body.uses_texture(texture),
            PassBody::DepthCopy(body) => body.uses_texture(texture),
            _ => false,
        };

        let used = uses_rt || uses_dep || body_uses;
        if !used {
            return Ok(false);
        }

        self.state.reset_num_passes_left();

        if uses_rt {
            if let Some(rtv_name) = self.rtv_name {
                let rtv = resolver.node_def().textures().rtv(rtv_name)?;
                let desc = target::setup_render_pass_desc(
                    &self.state.def,
                    rtv,
                    self.rt_index,
                    resolver,
                    matches!(self.body, PassBody::Clear(_)),
                )?;
                self.state.any_target_texture = desc.any_target_texture();
                self.state.render_pass_desc = Some(desc);
            }
        }

        match &mut self.body {
            PassBody::Mipmap(body) => body.rebuild(&self.state, resolver, args)?,
            PassBody::IblSpecular(body) => body.rebuild(&mut self.state, resolver, args)?,
            PassBody::Quad(body) => body.refresh_dependencies(&mut self.state, resolver)?,
            _ => {}
        }

        Ok(true)
    }

    /// A texture used by this pass is going away; drop every reference.
    /// The pass becomes unusable until the node rebuilds it.
    pub(crate) fn notify_destroyed_texture(&mut self, texture: &Texture) {
        let used = self
            .state
            .render_pass_desc
            .as_ref()
            .is_some_and(|rpd| rpd.uses_texture(texture));
        if used {
            self.state.render_pass_desc = None;
            self.state.any_target_texture = None;
        }
        self.state
            .texture_dependencies
            .retain(|(_, t)| t.id() != texture.id());
    }

    /// A buffer used by this pass is going away.
    pub(crate) fn notify_destroyed_buffer(&mut self, buffer: &crate::resources::UavBuffer) {
        if let PassBody::Compute(body) = &mut self.body {
            body.forget_buffer(buffer);
        }
    }
}
