//! Shared fixtures for the integration suites.
//!
//! Everything runs on the recording [`DummyBackend`] plus stub
//! implementations of the external collaborators (scene renderer and
//! compute-job provider), so the full compositor can be driven without a
//! GPU and every submitted operation inspected afterwards.

// Not every suite exercises every fixture.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use compositor::context::{
    CameraHandle, CompositorContext, ComputeJob, ComputeJobHandle, ComputeJobProvider,
    SceneRenderer,
};
use compositor::{DummyBackend, PixelFormat, RenderBackend, Texture, TextureDescriptor, TextureUsage};

pub const MAIN_CAMERA: CameraHandle = CameraHandle(1);
pub const SECOND_CAMERA: CameraHandle = CameraHandle(2);

/// Scene renderer stub recording every request.
#[derive(Default)]
pub struct TestSceneRenderer {
    cameras: Mutex<HashMap<String, CameraHandle>>,
    pub scene_renders: Mutex<Vec<(CameraHandle, u8, u8, u32)>>,
    pub quads: Mutex<Vec<String>>,
    pub warm_up_collects: Mutex<usize>,
    pub warm_up_triggers: Mutex<usize>,
}

impl TestSceneRenderer {
    pub fn new() -> Self {
        let renderer = Self::default();
        renderer
            .cameras
            .lock()
            .insert("main_camera".to_string(), MAIN_CAMERA);
        renderer
            .cameras
            .lock()
            .insert("second_camera".to_string(), SECOND_CAMERA);
        renderer
    }

    pub fn num_scene_renders(&self) -> usize {
        self.scene_renders.lock().len()
    }
}

impl SceneRenderer for TestSceneRenderer {
    fn find_camera(&self, name: &str) -> Option<CameraHandle> {
        self.cameras.lock().get(name).copied()
    }

    fn render_visible_objects(
        &self,
        camera: CameraHandle,
        first_rq: u8,
        last_rq: u8,
        visibility_mask: u32,
    ) {
        self.scene_renders
            .lock()
            .push((camera, first_rq, last_rq, visibility_mask));
    }

    fn render_fullscreen_quad(&self, material: &str, _camera: CameraHandle) {
        self.quads.lock().push(material.to_string());
    }

    fn warm_up_shaders_collect(
        &self,
        _camera: CameraHandle,
        _visibility_mask: u32,
        _first_rq: u8,
        _last_rq: u8,
    ) {
        *self.warm_up_collects.lock() += 1;
    }

    fn warm_up_shaders_trigger(&self) {
        *self.warm_up_triggers.lock() += 1;
    }
}

/// Compute-job provider stub: a name -> job map plus a record of every
/// clone the compositor asked for.
#[derive(Default)]
pub struct TestComputeProvider {
    jobs: Mutex<HashMap<String, ComputeJobHandle>>,
    pub clones: Mutex<Vec<String>>,
}

impl TestComputeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str) {
        self.jobs
            .lock()
            .insert(name.to_string(), Arc::new(Mutex::new(ComputeJob::new(name))));
    }

    pub fn num_clones(&self) -> usize {
        self.clones.lock().len()
    }
}

impl ComputeJobProvider for TestComputeProvider {
    fn find_job(&self, name: &str) -> Option<ComputeJobHandle> {
        self.jobs.lock().get(name).cloned()
    }

    fn clone_job(&self, source: &str, clone_name: &str) -> Option<ComputeJobHandle> {
        if !self.jobs.lock().contains_key(source) {
            return None;
        }
        let job: ComputeJobHandle = Arc::new(Mutex::new(ComputeJob::new(clone_name)));
        self.jobs.lock().insert(clone_name.to_string(), job.clone());
        self.clones.lock().push(clone_name.to_string());
        Some(job)
    }

    fn destroy_job(&self, name: &str) {
        self.jobs.lock().remove(name);
    }
}

/// Backend + stub collaborators wired into a context.
pub struct TestContext {
    pub backend: Arc<DummyBackend>,
    pub renderer: Arc<TestSceneRenderer>,
    pub jobs: Arc<TestComputeProvider>,
    pub ctx: Arc<CompositorContext>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_backend(Arc::new(DummyBackend::new()))
    }

    /// Run the compositor against specific backend capabilities (tiler,
    /// no-compute, ...).
    pub fn with_caps(caps: compositor::BackendCaps) -> Self {
        Self::with_backend(Arc::new(DummyBackend::with_caps(caps)))
    }

    fn with_backend(backend: Arc<DummyBackend>) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let renderer = Arc::new(TestSceneRenderer::new());
        let jobs = Arc::new(TestComputeProvider::new());
        let ctx = Arc::new(CompositorContext::new(
            backend.clone(),
            renderer.clone(),
            jobs.clone(),
        ));
        Self {
            backend,
            renderer,
            jobs,
            ctx,
        }
    }

    /// An externally owned render target playing the window's role.
    pub fn window_texture(&self, width: u32, height: u32) -> Arc<Texture> {
        Texture::create(
            self.backend.clone() as Arc<dyn RenderBackend>,
            "window",
            &TextureDescriptor::new_2d(
                width,
                height,
                PixelFormat::Bgra8UnormSrgb,
                TextureUsage::default(),
            ),
        )
        .expect("window texture")
    }
}
