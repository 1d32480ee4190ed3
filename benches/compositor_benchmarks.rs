use criterion::{black_box, criterion_group, criterion_main, Criterion};

use std::sync::Arc;

use compositor::context::{
    CameraHandle, CompositorContext, ComputeJobHandle, ComputeJobProvider, SceneRenderer,
};
use compositor::definition::{PassClearDef, PassKindDef, RtvEntry};
use compositor::types::LoadAction;
use compositor::{
    BarrierSolver, DummyBackend, NameId, NodeDef, PixelFormat, RenderBackend, ResourceAccess,
    ResourceLayout, StageMask, Texture, TextureDescriptor, TextureUsage, Workspace, WorkspaceDef,
    WorkspaceOptions,
};

struct NullRenderer;

impl SceneRenderer for NullRenderer {
    fn find_camera(&self, _name: &str) -> Option<CameraHandle> {
        Some(CameraHandle(1))
    }
    fn render_visible_objects(&self, _c: CameraHandle, _f: u8, _l: u8, _v: u32) {}
    fn render_fullscreen_quad(&self, _material: &str, _camera: CameraHandle) {}
}

struct NullJobs;

impl ComputeJobProvider for NullJobs {
    fn find_job(&self, _name: &str) -> Option<ComputeJobHandle> {
        None
    }
    fn clone_job(&self, _source: &str, _clone_name: &str) -> Option<ComputeJobHandle> {
        None
    }
    fn destroy_job(&self, _name: &str) {}
}

fn bench_context() -> (Arc<CompositorContext>, Arc<dyn RenderBackend>) {
    let backend: Arc<dyn RenderBackend> = Arc::new(DummyBackend::new());
    let ctx = Arc::new(CompositorContext::new(
        backend.clone(),
        Arc::new(NullRenderer),
        Arc::new(NullJobs),
    ));
    (ctx, backend)
}

fn chain_node_def(name: &str, has_input: bool) -> NodeDef {
    let mut def = NodeDef::new(name);
    if has_input {
        def.add_input(0, "rt_in").unwrap();
    }
    {
        let tex = def.textures_mut().add_texture_definition("rt_local").unwrap();
        tex.width = 64;
        tex.height = 64;
        tex.format = PixelFormat::Rgba8Unorm;
    }
    {
        let rtv = def.textures_mut().add_rtv("rt_local_rtv").unwrap();
        rtv.colour_attachments
            .push(RtvEntry::new(NameId::new("rt_local")));
    }
    let target = def.add_target_pass(Some(NameId::new("rt_local_rtv")), 0);
    let pass = target.add_pass(PassKindDef::Clear(PassClearDef::default()));
    pass.load_colour[0] = LoadAction::Clear;
    def.map_output_channel(0, NameId::new("rt_local")).unwrap();
    def
}

// ---------------------------------------------------------------------------
// Workspace connection
// ---------------------------------------------------------------------------

fn bench_connect_chain_16(c: &mut Criterion) {
    let (ctx, backend) = bench_context();

    for i in 0..16 {
        ctx.register_node_definition(Arc::new(chain_node_def(&format!("node_{i}"), i > 0)))
            .unwrap();
    }
    let mut ws_def = WorkspaceDef::new("chain");
    for i in 1..16 {
        ws_def.connect(&format!("node_{}", i - 1), 0, &format!("node_{i}"), 0);
    }
    let ws_def = Arc::new(ws_def);

    let window = Texture::create(
        backend,
        "window",
        &TextureDescriptor::new_2d(
            1920,
            1080,
            PixelFormat::Bgra8UnormSrgb,
            TextureUsage::default(),
        ),
    )
    .unwrap();

    let mut workspace = Workspace::new(
        ws_def,
        ctx,
        vec![window],
        CameraHandle(1),
        WorkspaceOptions::default(),
    )
    .unwrap();
    assert!(workspace.is_valid());

    c.bench_function("workspace_reconnect_16_node_chain", |b| {
        b.iter(|| {
            workspace.reconnect_all_nodes().unwrap();
            black_box(workspace.is_valid());
        });
    });
}

// ---------------------------------------------------------------------------
// Barrier solver
// ---------------------------------------------------------------------------

fn bench_barrier_solver(c: &mut Criterion) {
    let backend: Arc<dyn RenderBackend> = Arc::new(DummyBackend::new());
    let textures: Vec<Arc<Texture>> = (0..64)
        .map(|i| {
            Texture::create(
                backend.clone(),
                format!("rt_{i}"),
                &TextureDescriptor::new_2d(
                    64,
                    64,
                    PixelFormat::Rgba8Unorm,
                    TextureUsage::default(),
                ),
            )
            .unwrap()
        })
        .collect();

    c.bench_function("barrier_solver_64_textures_write_read", |b| {
        b.iter(|| {
            let mut solver = BarrierSolver::new();
            let mut transitions = Vec::with_capacity(128);
            for texture in &textures {
                solver
                    .resolve_texture_transition(
                        &mut transitions,
                        texture,
                        ResourceLayout::RenderTarget,
                        ResourceAccess::Write,
                        StageMask::empty(),
                        false,
                        backend.as_ref(),
                    )
                    .unwrap();
            }
            for texture in &textures {
                solver
                    .resolve_texture_transition(
                        &mut transitions,
                        texture,
                        ResourceLayout::Texture,
                        ResourceAccess::Read,
                        StageMask::FRAGMENT,
                        false,
                        backend.as_ref(),
                    )
                    .unwrap();
            }
            black_box(transitions.len());
        });
    });
}

criterion_group!(benches, bench_connect_chain_16, bench_barrier_solver);
criterion_main!(benches);
