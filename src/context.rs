//! The compositor's view of the rest of the engine.
//!
//! Everything the compositor consumes from outside — the graphics backend,
//! the scene renderer, the compute-job system — is threaded through a
//! [`CompositorContext`] built at startup and shared by all workspaces.
//! There is deliberately no ambient global state: a context plus a
//! [`DummyBackend`](crate::backend::DummyBackend) is enough to run the
//! whole compositor in a unit test.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::backend::RenderBackend;
use crate::barrier::ResourceAccess;
use crate::definition::{NodeDef, ShadowNodeDef};
use crate::error::CompositorError;
use crate::name::NameId;
use crate::resources::{SamplerBlock, SamplerBlockCache, Texture, UavBuffer};
use crate::types::PixelFormat;

/// Opaque handle to a camera owned by the scene renderer.
///
/// The compositor never inspects cameras; it only routes them to passes and
/// compares them for identity (the shadow-node first-only policy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CameraHandle(pub u64);

// ============================================================================
// Compute jobs
// ============================================================================

/// A texture bound to a compute job's sampling slot.
#[derive(Debug, Clone)]
pub struct ComputeTexSlot {
    pub texture: Arc<Texture>,
    pub mip_level: u32,
    pub array_index: u32,
    /// `Unknown` means "use the texture's own format".
    pub format: PixelFormat,
    pub sampler: Option<Arc<SamplerBlock>>,
}

impl ComputeTexSlot {
    pub fn new(texture: Arc<Texture>) -> Self {
        Self {
            texture,
            mip_level: 0,
            array_index: 0,
            format: PixelFormat::Unknown,
            sampler: None,
        }
    }
}

/// A texture bound to a compute job's UAV slot.
#[derive(Debug, Clone)]
pub struct ComputeUavSlot {
    pub texture: Arc<Texture>,
    pub access: ResourceAccess,
    pub mip_level: u32,
    pub array_index: u32,
    pub format: PixelFormat,
}

/// A buffer bound to a compute job's UAV slot.
#[derive(Debug, Clone)]
pub struct ComputeBufferSlot {
    pub buffer: Arc<UavBuffer>,
    pub access: ResourceAccess,
    pub offset: u64,
    pub size_bytes: u64,
}

/// A named shader parameter (manual constant upload).
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderParam {
    pub name: String,
    pub value: Vec<f32>,
}

/// A dispatchable compute job with its bound resources and parameters.
///
/// Jobs are owned by the external shader system; the compositor receives
/// shared handles and (re)binds resources to them every frame — bindings
/// are never assumed persistent across frames.
#[derive(Debug, Default)]
pub struct ComputeJob {
    name: String,
    textures: Vec<Option<ComputeTexSlot>>,
    uavs: Vec<Option<ComputeUavSlot>>,
    buffers: Vec<Option<ComputeBufferSlot>>,
    params: Vec<ShaderParam>,
    properties: Vec<(String, i32)>,
}

impl ComputeJob {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of UAV units the job currently exposes.
    pub fn num_uav_units(&self) -> u32 {
        self.uavs.len() as u32
    }

    /// Grow (never shrink) the UAV unit count.
    pub fn set_num_uav_units(&mut self, count: u32) {
        if count as usize > self.uavs.len() {
            self.uavs.resize(count as usize, None);
        }
    }

    pub fn set_texture(&mut self, slot: u32, binding: Option<ComputeTexSlot>) {
        let slot = slot as usize;
        if slot >= self.textures.len() {
            self.textures.resize(slot + 1, None);
        }
        self.textures[slot] = binding;
    }

    pub fn set_uav_texture(&mut self, slot: u32, binding: Option<ComputeUavSlot>) {
        let slot = slot as usize;
        if slot >= self.uavs.len() {
            self.uavs.resize(slot + 1, None);
        }
        self.uavs[slot] = binding;
    }

    pub fn set_uav_buffer(&mut self, slot: u32, binding: Option<ComputeBufferSlot>) {
        let slot = slot as usize;
        if slot >= self.buffers.len() {
            self.buffers.resize(slot + 1, None);
        }
        self.buffers[slot] = binding;
    }

    pub fn textures(&self) -> &[Option<ComputeTexSlot>] {
        &self.textures
    }

    pub fn uavs(&self) -> &[Option<ComputeUavSlot>] {
        &self.uavs
    }

    pub fn buffers(&self) -> &[Option<ComputeBufferSlot>] {
        &self.buffers
    }

    /// Set (or replace) a named manual parameter.
    pub fn set_param(&mut self, name: &str, value: &[f32]) {
        if let Some(p) = self.params.iter_mut().find(|p| p.name == name) {
            p.value = value.to_vec();
        } else {
            self.params.push(ShaderParam {
                name: name.to_string(),
                value: value.to_vec(),
            });
        }
    }

    pub fn param(&self, name: &str) -> Option<&[f32]> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_slice())
    }

    /// Remove every parameter whose name starts with `prefix`.
    pub fn remove_params_with_prefix(&mut self, prefix: &str) {
        self.params.retain(|p| !p.name.starts_with(prefix));
    }

    /// Set a preprocessor-style integer property.
    pub fn set_property(&mut self, name: &str, value: i32) {
        if let Some(p) = self.properties.iter_mut().find(|(n, _)| n == name) {
            p.1 = value;
        } else {
            self.properties.push((name.to_string(), value));
        }
    }

    pub fn property(&self, name: &str) -> Option<i32> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }
}

/// Shared, mutably borrowable compute job.
pub type ComputeJobHandle = Arc<Mutex<ComputeJob>>;

/// The external shader system's compute-job registry.
pub trait ComputeJobProvider: Send + Sync {
    /// Look up a job by name.
    fn find_job(&self, name: &str) -> Option<ComputeJobHandle>;

    /// Clone `source` under a new name (e.g. one clone per mip level).
    /// Returns `None` if the source does not exist.
    fn clone_job(&self, source: &str, clone_name: &str) -> Option<ComputeJobHandle>;

    /// Destroy a cloned job.
    fn destroy_job(&self, name: &str);
}

// ============================================================================
// Scene renderer
// ============================================================================

/// The external scene renderer.
///
/// The compositor binds targets and resolves barriers, then delegates all
/// scene content to this trait. Implementations record their draw commands
/// through whatever path they own; the compositor only guarantees correct
/// ordering around the call.
pub trait SceneRenderer: Send + Sync {
    /// Look up a camera by name.
    fn find_camera(&self, name: &str) -> Option<CameraHandle>;

    /// Render the objects visible from `camera` within the given render
    /// queue range into the currently bound target.
    fn render_visible_objects(
        &self,
        camera: CameraHandle,
        first_rq: u8,
        last_rq: u8,
        visibility_mask: u32,
    );

    /// Draw a fullscreen quad with the named material into the currently
    /// bound target.
    fn render_fullscreen_quad(&self, material: &str, camera: CameraHandle);

    /// Collect shaders that would be needed to render the given view
    /// (warm-up support). Default: nothing to collect.
    fn warm_up_shaders_collect(
        &self,
        _camera: CameraHandle,
        _visibility_mask: u32,
        _first_rq: u8,
        _last_rq: u8,
    ) {
    }

    /// Trigger compilation of previously collected shaders.
    fn warm_up_shaders_trigger(&self) {}
}

// ============================================================================
// Context
// ============================================================================

/// Dependency bundle threaded through the whole compositor.
///
/// Also owns the registries of node and shadow-node definitions that
/// workspace definitions reference by name, and the sampler-block interner.
pub struct CompositorContext {
    backend: Arc<dyn RenderBackend>,
    scene_renderer: Arc<dyn SceneRenderer>,
    compute_jobs: Arc<dyn ComputeJobProvider>,
    custom_pass_provider: Option<Arc<dyn crate::pass::CustomPassProvider>>,
    node_defs: RwLock<FxHashMap<NameId, Arc<NodeDef>>>,
    shadow_node_defs: RwLock<FxHashMap<NameId, Arc<ShadowNodeDef>>>,
    samplers: SamplerBlockCache,
}

impl CompositorContext {
    pub fn new(
        backend: Arc<dyn RenderBackend>,
        scene_renderer: Arc<dyn SceneRenderer>,
        compute_jobs: Arc<dyn ComputeJobProvider>,
    ) -> Self {
        Self {
            backend,
            scene_renderer,
            compute_jobs,
            custom_pass_provider: None,
            node_defs: RwLock::new(FxHashMap::default()),
            shadow_node_defs: RwLock::new(FxHashMap::default()),
            samplers: SamplerBlockCache::new(),
        }
    }

    /// Install a provider for `PassKind::Custom` passes.
    pub fn with_custom_pass_provider(
        mut self,
        provider: Arc<dyn crate::pass::CustomPassProvider>,
    ) -> Self {
        self.custom_pass_provider = Some(provider);
        self
    }

    pub fn backend(&self) -> &Arc<dyn RenderBackend> {
        &self.backend
    }

    pub fn scene_renderer(&self) -> &Arc<dyn SceneRenderer> {
        &self.scene_renderer
    }

    pub fn compute_jobs(&self) -> &Arc<dyn ComputeJobProvider> {
        &self.compute_jobs
    }

    pub fn custom_pass_provider(&self) -> Option<&Arc<dyn crate::pass::CustomPassProvider>> {
        self.custom_pass_provider.as_ref()
    }

    pub fn samplers(&self) -> &SamplerBlockCache {
        &self.samplers
    }

    /// Register a node definition; the name must be unique.
    pub fn register_node_definition(&self, def: Arc<NodeDef>) -> Result<(), CompositorError> {
        let mut defs = self.node_defs.write();
        if defs.contains_key(&def.name()) {
            return Err(CompositorError::DuplicateItem(format!(
                "node definition '{}' already registered",
                def.name_str()
            )));
        }
        defs.insert(def.name(), def);
        Ok(())
    }

    pub fn has_node_definition(&self, name: NameId) -> bool {
        self.node_defs.read().contains_key(&name)
    }

    pub fn node_definition(&self, name: NameId) -> Option<Arc<NodeDef>> {
        self.node_defs.read().get(&name).cloned()
    }

    /// Register a shadow node definition; the name must be unique.
    pub fn register_shadow_node_definition(
        &self,
        def: Arc<ShadowNodeDef>,
    ) -> Result<(), CompositorError> {
        let mut defs = self.shadow_node_defs.write();
        if defs.contains_key(&def.name()) {
            return Err(CompositorError::DuplicateItem(format!(
                "shadow node definition '{}' already registered",
                def.name_str()
            )));
        }
        defs.insert(def.name(), def);
        Ok(())
    }

    pub fn shadow_node_definition(&self, name: NameId) -> Option<Arc<ShadowNodeDef>> {
        self.shadow_node_defs.read().get(&name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_job_uav_units_grow_only() {
        let mut job = ComputeJob::new("blur");
        job.set_num_uav_units(2);
        assert_eq!(job.num_uav_units(), 2);
        job.set_num_uav_units(1);
        assert_eq!(job.num_uav_units(), 2);
    }

    #[test]
    fn test_compute_job_params() {
        let mut job = ComputeJob::new("ibl");
        job.set_param("params0", &[0.0, 128.0, 512.0, 0.5]);
        job.set_param("params0", &[1.0, 128.0, 512.0, 0.5]);
        assert_eq!(job.param("params0").unwrap()[0], 1.0);

        job.set_param("c_weights[0]", &[0.1, 0.2, 0.3, 0.4]);
        job.remove_params_with_prefix("c_weights[");
        assert!(job.param("c_weights[0]").is_none());
    }
}
