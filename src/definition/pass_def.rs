//! Pass definitions.
//!
//! A pass definition is shared by all its instantiations (five workspaces
//! built from one file share the same `PassDef`s) and is assumed immutable
//! while instances exist. The per-kind payload lives in [`PassKindDef`];
//! everything attachment/viewport related is common.

use bitflags::bitflags;

use crate::barrier::ResourceAccess;
use crate::name::NameId;
use crate::types::{LoadAction, StoreAction, ViewportRect, MAX_COLOUR_TARGETS};

/// The closed set of pass kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    Scene,
    Quad,
    Clear,
    Stencil,
    Resolve,
    DepthCopy,
    Uav,
    Mipmap,
    IblSpecular,
    Shadows,
    TargetBarrier,
    WarmUp,
    Compute,
    Custom,
}

impl PassKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scene => "Scene",
            Self::Quad => "Quad",
            Self::Clear => "Clear",
            Self::Stencil => "Stencil",
            Self::Resolve => "Resolve",
            Self::DepthCopy => "DepthCopy",
            Self::Uav => "Uav",
            Self::Mipmap => "Mipmap",
            Self::IblSpecular => "IblSpecular",
            Self::Shadows => "Shadows",
            Self::TargetBarrier => "TargetBarrier",
            Self::WarmUp => "WarmUp",
            Self::Compute => "Compute",
            Self::Custom => "Custom",
        }
    }
}

/// When a pass owning a shadow node updates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadowNodeRecalculation {
    /// Update only when this is the first pass this frame to use the
    /// shadow node with its camera. The workspace resolves which passes
    /// actually update after the execution order is fixed.
    #[default]
    FirstOnly,
    /// Never update automatically; contents are reused as-is.
    Reuse,
    /// Update every time, no questions asked.
    Recalculate,
}

/// Stencil reference state set by a Stencil pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilParams {
    pub ref_value: u32,
    pub read_mask: u32,
    pub write_mask: u32,
}

impl Default for StencilParams {
    fn default() -> Self {
        Self {
            ref_value: 0,
            read_mask: 0xFFFF_FFFF,
            write_mask: 0xFFFF_FFFF,
        }
    }
}

/// A UAV slot this pass depends on (bound earlier by a Uav pass).
#[derive(Debug, Clone)]
pub struct UavDependency {
    /// Slot in [0, 64), ignoring the Uav pass' starting slot.
    pub uav_slot: u32,
    pub access: ResourceAccess,
    /// Two consecutive writers may skip the barrier when the author knows
    /// they touch disjoint regions.
    pub allow_write_after_write: bool,
}

// ============================================================================
// Per-kind payloads
// ============================================================================

/// Scene rendering parameters.
#[derive(Debug, Clone)]
pub struct PassSceneDef {
    /// Camera to render from; `None` uses the workspace default camera.
    pub camera_name: Option<String>,
    pub first_rq: u8,
    pub last_rq: u8,
    pub visibility_mask: u32,
    pub shadow_node: Option<NameId>,
    pub shadow_node_recalculation: ShadowNodeRecalculation,
    pub enable_forward_plus: bool,
    pub include_overlays: bool,
}

impl Default for PassSceneDef {
    fn default() -> Self {
        Self {
            camera_name: None,
            first_rq: 0,
            last_rq: u8::MAX,
            visibility_mask: u32::MAX,
            shadow_node: None,
            shadow_node_recalculation: ShadowNodeRecalculation::default(),
            enable_forward_plus: true,
            include_overlays: false,
        }
    }
}

/// Fullscreen quad parameters.
#[derive(Debug, Clone, Default)]
pub struct PassQuadDef {
    pub material_name: String,
    /// (texture unit, channel name) pairs sampled by the material.
    pub texture_sources: Vec<(u32, NameId)>,
    pub camera_name: Option<String>,
}

/// Clear parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassClearDef {
    /// Skip the explicit clear on tile-based GPUs, where the pass' load
    /// action already clears for free. Depth/stencil may still force a
    /// real clear, see the Clear pass.
    pub non_tilers_only: bool,
}

/// Stencil-state pass parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassStencilDef {
    pub params: StencilParams,
}

/// Depth copy parameters.
#[derive(Debug, Clone)]
pub struct PassDepthCopyDef {
    pub src_name: NameId,
    pub dst_name: NameId,
}

/// A texture bound by a Uav pass.
#[derive(Debug, Clone)]
pub struct UavTextureSource {
    pub slot: u32,
    pub name: NameId,
    pub access: ResourceAccess,
    pub mip_level: u32,
}

/// A buffer bound by a Uav pass.
#[derive(Debug, Clone)]
pub struct UavBufferSource {
    pub slot: u32,
    pub name: NameId,
    pub access: ResourceAccess,
    pub offset: u64,
    /// 0 = whole buffer.
    pub size_bytes: u64,
}

/// UAV binding pass parameters.
#[derive(Debug, Clone, Default)]
pub struct PassUavDef {
    pub starting_slot: u32,
    pub texture_sources: Vec<UavTextureSource>,
    pub buffer_sources: Vec<UavBufferSource>,
    /// Keep UAVs bound by a previous Uav pass in untouched slots.
    pub keep_previous_uavs: bool,
}

/// How mipmaps are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MipmapMethod {
    /// Whatever the backend does natively.
    #[default]
    ApiDefault,
    /// Gaussian blur chain in compute.
    Compute,
    /// Higher-quality compute variant.
    ComputeHq,
}

/// Mipmap generation parameters.
#[derive(Debug, Clone, Copy)]
pub struct PassMipmapDef {
    pub method: MipmapMethod,
    /// Must be even.
    pub kernel_radius: u8,
    pub gaussian_deviation_factor: f32,
}

impl Default for PassMipmapDef {
    fn default() -> Self {
        Self {
            method: MipmapMethod::ApiDefault,
            kernel_radius: 8,
            gaussian_deviation_factor: 0.5,
        }
    }
}

/// IBL specular prefilter parameters.
#[derive(Debug, Clone)]
pub struct PassIblSpecularDef {
    pub input_name: NameId,
    pub output_name: NameId,
    pub samples_per_iteration: f32,
    /// Sample count used when the backend lacks typed UAV loads and the
    /// convolution cannot accumulate across iterations.
    pub samples_single_iteration_fallback: f32,
    /// Skip compute and always use the mipmap fallback.
    pub force_mipmap_fallback: bool,
    pub ibl_correction: [f32; 4],
}

impl PassIblSpecularDef {
    pub fn new(input_name: NameId, output_name: NameId) -> Self {
        Self {
            input_name,
            output_name,
            samples_per_iteration: 128.0,
            samples_single_iteration_fallback: 128.0,
            force_mipmap_fallback: false,
            ibl_correction: [1.0, 1.0, 1.0, 1.0],
        }
    }
}

/// Shadow-map update pass parameters.
#[derive(Debug, Clone, Default)]
pub struct PassShadowsDef {
    pub shadow_nodes: Vec<NameId>,
    pub camera_name: Option<String>,
    pub recalculation: ShadowNodeRecalculation,
    pub visibility_mask: u32,
}

bitflags! {
    /// What a warm-up pass does.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WarmUpMode: u8 {
        /// Walk the scene and collect the shaders it would need.
        const COLLECT = 1 << 0;
        /// Kick compilation of everything collected so far.
        const TRIGGER = 1 << 1;
    }
}

/// Shader warm-up pass parameters.
#[derive(Debug, Clone)]
pub struct PassWarmUpDef {
    pub shadow_node: Option<NameId>,
    pub camera_name: Option<String>,
    pub recalculation: ShadowNodeRecalculation,
    pub mode: WarmUpMode,
    pub visibility_mask: u32,
    pub first_rq: u8,
    pub last_rq: u8,
}

impl Default for PassWarmUpDef {
    fn default() -> Self {
        Self {
            shadow_node: None,
            camera_name: None,
            recalculation: ShadowNodeRecalculation::default(),
            mode: WarmUpMode::COLLECT | WarmUpMode::TRIGGER,
            visibility_mask: u32::MAX,
            first_rq: 0,
            last_rq: u8::MAX,
        }
    }
}

/// A texture sampled by a compute pass.
#[derive(Debug, Clone)]
pub struct ComputeTextureSource {
    pub slot: u32,
    pub name: NameId,
    pub mip_level: u32,
}

/// A texture UAV written by a compute pass.
#[derive(Debug, Clone)]
pub struct ComputeUavSource {
    pub slot: u32,
    pub name: NameId,
    pub access: ResourceAccess,
    pub mip_level: u32,
    pub allow_write_after_write: bool,
}

/// A buffer UAV accessed by a compute pass.
#[derive(Debug, Clone)]
pub struct ComputeBufferSource {
    pub slot: u32,
    pub name: NameId,
    pub access: ResourceAccess,
    pub offset: u64,
    /// 0 = whole buffer.
    pub size_bytes: u64,
    pub allow_write_after_write: bool,
}

/// Compute dispatch pass parameters.
#[derive(Debug, Clone, Default)]
pub struct PassComputeDef {
    pub job_name: String,
    pub camera_name: Option<String>,
    pub texture_sources: Vec<ComputeTextureSource>,
    pub uav_sources: Vec<ComputeUavSource>,
    pub buffer_sources: Vec<ComputeBufferSource>,
}

impl PassComputeDef {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            ..Default::default()
        }
    }

    pub fn add_texture_source(&mut self, slot: u32, name: NameId) {
        self.texture_sources.push(ComputeTextureSource {
            slot,
            name,
            mip_level: 0,
        });
    }

    pub fn add_uav_source(&mut self, slot: u32, name: NameId, access: ResourceAccess) {
        self.uav_sources.push(ComputeUavSource {
            slot,
            name,
            access,
            mip_level: 0,
            allow_write_after_write: false,
        });
    }

    pub fn add_uav_buffer(
        &mut self,
        slot: u32,
        name: NameId,
        access: ResourceAccess,
        offset: u64,
        size_bytes: u64,
    ) {
        debug_assert!(access != ResourceAccess::Undefined);
        self.buffer_sources.push(ComputeBufferSource {
            slot,
            name,
            access,
            offset,
            size_bytes,
            allow_write_after_write: false,
        });
    }
}

/// Custom pass parameters, resolved by the context's custom pass provider.
#[derive(Debug, Clone)]
pub struct PassCustomDef {
    pub custom_id: NameId,
}

/// Per-kind definition payload.
#[derive(Debug, Clone)]
pub enum PassKindDef {
    Scene(PassSceneDef),
    Quad(PassQuadDef),
    Clear(PassClearDef),
    Stencil(PassStencilDef),
    /// Recognized but has no standalone implementation: resolves happen
    /// through store actions. Instantiating one is a configuration error.
    Resolve,
    DepthCopy(PassDepthCopyDef),
    Uav(PassUavDef),
    Mipmap(PassMipmapDef),
    IblSpecular(PassIblSpecularDef),
    Shadows(PassShadowsDef),
    TargetBarrier,
    WarmUp(PassWarmUpDef),
    Compute(PassComputeDef),
    Custom(PassCustomDef),
}

impl PassKindDef {
    pub fn kind(&self) -> PassKind {
        match self {
            Self::Scene(_) => PassKind::Scene,
            Self::Quad(_) => PassKind::Quad,
            Self::Clear(_) => PassKind::Clear,
            Self::Stencil(_) => PassKind::Stencil,
            Self::Resolve => PassKind::Resolve,
            Self::DepthCopy(_) => PassKind::DepthCopy,
            Self::Uav(_) => PassKind::Uav,
            Self::Mipmap(_) => PassKind::Mipmap,
            Self::IblSpecular(_) => PassKind::IblSpecular,
            Self::Shadows(_) => PassKind::Shadows,
            Self::TargetBarrier => PassKind::TargetBarrier,
            Self::WarmUp(_) => PassKind::WarmUp,
            Self::Compute(_) => PassKind::Compute,
            Self::Custom(_) => PassKind::Custom,
        }
    }
}

// ============================================================================
// Common pass definition
// ============================================================================

/// Shared, immutable description of one pass.
#[derive(Debug, Clone)]
pub struct PassDef {
    pub kind_def: PassKindDef,

    /// Custom value to identify the pass from listeners.
    pub identifier: u32,

    /// Number of times to perform the pass before it becomes a no-op;
    /// `u32::MAX` means never stop. Used for progressive effects.
    pub num_initial_passes: u32,

    pub viewport: ViewportRect,

    pub clear_colours: [[f32; 4]; MAX_COLOUR_TARGETS],
    pub clear_depth: f32,
    pub clear_stencil: u32,
    pub load_colour: [LoadAction; MAX_COLOUR_TARGETS],
    pub load_depth: LoadAction,
    pub load_stencil: LoadAction,
    pub store_colour: [StoreAction; MAX_COLOUR_TARGETS],
    pub store_depth: StoreAction,
    pub store_stencil: StoreAction,

    /// Ignore load/store actions and keep whatever pass semantics a
    /// previous pass opened. Only valid for Quad and Scene.
    pub skip_load_store_semantics: bool,

    pub read_only_depth: bool,
    pub read_only_stencil: bool,

    /// Flush the command buffer at the end of this pass.
    pub flush_command_buffers: bool,

    pub execution_mask: u8,
    pub viewport_modifier_mask: u8,

    /// Shadow map index, filled only for passes owned by shadow nodes.
    pub shadow_map_idx: Option<u32>,

    /// Channel textures exposed to materials while this pass runs; they
    /// become texture dependencies for barrier analysis.
    pub exposed_textures: Vec<NameId>,

    pub uav_dependencies: Vec<UavDependency>,

    pub profiling_id: String,
}

impl PassDef {
    pub fn new(kind_def: PassKindDef) -> Self {
        let profiling_id = kind_def.kind().as_str().to_string();
        Self {
            kind_def,
            identifier: 0,
            num_initial_passes: u32::MAX,
            viewport: ViewportRect::default(),
            clear_colours: [[0.0; 4]; MAX_COLOUR_TARGETS],
            clear_depth: 1.0,
            clear_stencil: 0,
            load_colour: [LoadAction::Load; MAX_COLOUR_TARGETS],
            load_depth: LoadAction::Load,
            load_stencil: LoadAction::Load,
            store_colour: [StoreAction::StoreOrResolve; MAX_COLOUR_TARGETS],
            store_depth: StoreAction::StoreOrResolve,
            store_stencil: StoreAction::StoreOrResolve,
            skip_load_store_semantics: false,
            read_only_depth: false,
            read_only_stencil: false,
            flush_command_buffers: false,
            execution_mask: 0xFF,
            viewport_modifier_mask: 0xFF,
            shadow_map_idx: None,
            exposed_textures: Vec::new(),
            uav_dependencies: Vec::new(),
            profiling_id,
        }
    }

    pub fn kind(&self) -> PassKind {
        self.kind_def.kind()
    }

    pub fn set_all_clear_colours(&mut self, colour: [f32; 4]) {
        self.clear_colours = [colour; MAX_COLOUR_TARGETS];
    }

    pub fn set_all_load_actions(&mut self, action: LoadAction) {
        self.load_colour = [action; MAX_COLOUR_TARGETS];
        self.load_depth = action;
        self.load_stencil = action;
    }

    pub fn set_all_store_actions(&mut self, action: StoreAction) {
        self.store_colour = [action; MAX_COLOUR_TARGETS];
        self.store_depth = action;
        self.store_stencil = action;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_payload() {
        let def = PassDef::new(PassKindDef::Clear(PassClearDef::default()));
        assert_eq!(def.kind(), PassKind::Clear);
        assert_eq!(def.kind().as_str(), "Clear");
    }

    #[test]
    fn test_set_all_load_actions() {
        let mut def = PassDef::new(PassKindDef::Scene(PassSceneDef::default()));
        def.set_all_load_actions(LoadAction::Clear);
        assert_eq!(def.load_depth, LoadAction::Clear);
        assert!(def.load_colour.iter().all(|&a| a == LoadAction::Clear));
    }
}
