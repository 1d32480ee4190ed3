//! Pass behavior tests: barrier emission per pass kind, fallbacks, the
//! consolidated target barrier, shadow-node update policies.

mod common;

use std::sync::Arc;

use rstest::rstest;

use common::{TestContext, MAIN_CAMERA};
use compositor::definition::{
    PassClearDef, PassComputeDef, PassDepthCopyDef, PassIblSpecularDef, PassKindDef,
    PassMipmapDef, PassQuadDef, PassSceneDef, RtvEntry,
};
use compositor::backend::RecordedOp;
use compositor::barrier::ResourceAccess;
use compositor::definition::MipmapMethod;
use compositor::listener::WorkspaceListener;
use compositor::types::LoadAction;
use compositor::{
    CompositorError, ComputeJobProvider, NameId, NodeDef, PixelFormat, ResourceLayout,
    ShadowNodeDef, TextureKind,
    TextureUsage, Workspace, WorkspaceDef, WorkspaceOptions,
};

fn build_workspace(
    tc: &TestContext,
    node_def: NodeDef,
    window_size: (u32, u32),
) -> Workspace {
    tc.ctx
        .register_node_definition(Arc::new(node_def))
        .unwrap();
    let mut ws_def = WorkspaceDef::new("test_ws");
    ws_def.add_node_alias("main", "main").unwrap();
    let window = tc.window_texture(window_size.0, window_size.1);
    Workspace::new(
        Arc::new(ws_def),
        tc.ctx.clone(),
        vec![window],
        MAIN_CAMERA,
        WorkspaceOptions::default(),
    )
    .unwrap()
}

fn run_one_frame(workspace: &mut Workspace) {
    workspace.begin_update();
    workspace.update().unwrap();
    workspace.end_update();
}

// ============================================================================
// Clear pass
// ============================================================================

#[test]
fn test_clear_transitions_only_cleared_attachments() {
    let tc = TestContext::new();

    let mut def = NodeDef::new("main");
    for name in ["rt0", "rt1"] {
        let tex = def.textures_mut().add_texture_definition(name).unwrap();
        tex.width = 128;
        tex.height = 128;
        tex.format = PixelFormat::Rgba8Unorm;
    }
    {
        let rtv = def.textures_mut().add_rtv("mrt").unwrap();
        rtv.colour_attachments.push(RtvEntry::new(NameId::new("rt0")));
        rtv.colour_attachments.push(RtvEntry::new(NameId::new("rt1")));
    }
    let target = def.add_target_pass(Some(NameId::new("mrt")), 0);
    let pass = target.add_pass(PassKindDef::Clear(PassClearDef::default()));
    pass.load_colour[0] = LoadAction::Clear;
    pass.load_colour[1] = LoadAction::Load;

    let mut workspace = build_workspace(&tc, def, (800, 600));
    let node = workspace.find_node(NameId::new("main")).unwrap();
    let rt0 = node.local_textures()[0].clone();
    let rt1 = node.local_textures()[1].clone();

    run_one_frame(&mut workspace);

    assert_eq!(
        tc.backend.transitions_for(rt0.id()),
        vec![(ResourceLayout::Undefined, ResourceLayout::Clear)],
        "exactly one Clear transition for the cleared attachment"
    );
    assert!(
        tc.backend.transitions_for(rt1.id()).is_empty(),
        "attachments outside the clear mask get no transition"
    );
}

/// The tiler already clears for free at pass start, so a `non_tilers_only`
/// clear must do real work only on immediate-mode GPUs.
#[rstest]
#[case::immediate_mode(false, true)]
#[case::tiler(true, false)]
fn test_clear_respects_non_tilers_only(#[case] tiler: bool, #[case] expect_clear: bool) {
    let caps = compositor::BackendCaps {
        tiler,
        ..Default::default()
    };
    let tc = TestContext::with_caps(caps);

    let mut def = NodeDef::new("main");
    {
        let tex = def.textures_mut().add_texture_definition("rt0").unwrap();
        tex.width = 128;
        tex.height = 128;
        tex.format = PixelFormat::Rgba8Unorm;
    }
    {
        let rtv = def.textures_mut().add_rtv("rt0_rtv").unwrap();
        rtv.colour_attachments.push(RtvEntry::new(NameId::new("rt0")));
    }
    let target = def.add_target_pass(Some(NameId::new("rt0_rtv")), 0);
    let pass = target.add_pass(PassKindDef::Clear(PassClearDef {
        non_tilers_only: true,
    }));
    pass.load_colour[0] = LoadAction::Clear;

    let mut workspace = build_workspace(&tc, def, (800, 600));
    run_one_frame(&mut workspace);

    let cleared = tc
        .backend
        .ops()
        .iter()
        .any(|op| matches!(op, RecordedOp::Clear { .. }));
    assert_eq!(cleared, expect_clear);
}

// ============================================================================
// Quad pass + solver interplay
// ============================================================================

/// Node clearing a local texture, then sampling it in two quads rendered
/// into the window input.
fn quad_chain_node(sample_twice: bool) -> NodeDef {
    let mut def = NodeDef::new("main");
    def.add_input(0, "rt_window").unwrap();
    {
        let tex = def.textures_mut().add_texture_definition("rt_scene").unwrap();
        tex.width = 128;
        tex.height = 128;
        tex.format = PixelFormat::Rgba8Unorm;
    }
    {
        let rtv = def.textures_mut().add_rtv("rt_scene_rtv").unwrap();
        rtv.colour_attachments
            .push(RtvEntry::new(NameId::new("rt_scene")));
    }

    let target = def.add_target_pass(Some(NameId::new("rt_scene_rtv")), 0);
    let pass = target.add_pass(PassKindDef::Clear(PassClearDef::default()));
    pass.load_colour[0] = LoadAction::Clear;

    let quad_def = PassQuadDef {
        material_name: "Postprocess/Tonemap".to_string(),
        texture_sources: vec![(0, NameId::new("rt_scene"))],
        camera_name: None,
    };
    let target = def.add_target_pass(Some(NameId::new("rt_window")), 0);
    target.add_pass(PassKindDef::Quad(quad_def.clone()));
    if sample_twice {
        target.add_pass(PassKindDef::Quad(quad_def));
    }
    def
}

#[test]
fn test_quad_transitions_sampled_texture_once() {
    let tc = TestContext::new();
    let mut ws_def = WorkspaceDef::new("quad_ws");
    ws_def.connect_external(0, "main", 0);

    tc.ctx
        .register_node_definition(Arc::new(quad_chain_node(true)))
        .unwrap();
    let window = tc.window_texture(800, 600);
    let mut workspace = Workspace::new(
        Arc::new(ws_def),
        tc.ctx.clone(),
        vec![window],
        MAIN_CAMERA,
        WorkspaceOptions::default(),
    )
    .unwrap();

    let rt_scene = workspace
        .find_node(NameId::new("main"))
        .unwrap()
        .local_textures()[0]
        .clone();

    run_one_frame(&mut workspace);

    // Undefined -> Clear (the clear), Clear -> Texture (first quad) and
    // nothing for the second quad's identical read.
    assert_eq!(
        tc.backend.transitions_for(rt_scene.id()),
        vec![
            (ResourceLayout::Undefined, ResourceLayout::Clear),
            (ResourceLayout::Clear, ResourceLayout::Texture),
        ]
    );
    assert_eq!(tc.renderer.quads.lock().len(), 2);
}

#[test]
fn test_discardable_first_read_is_a_configuration_error() {
    let tc = TestContext::new();

    // Same node but the clear pass is absent: the quad reads a
    // discardable texture nothing ever wrote.
    let mut def = NodeDef::new("main");
    def.add_input(0, "rt_window").unwrap();
    {
        let tex = def.textures_mut().add_texture_definition("rt_scene").unwrap();
        tex.width = 128;
        tex.height = 128;
        tex.format = PixelFormat::Rgba8Unorm;
    }
    let quad_def = PassQuadDef {
        material_name: "Postprocess/Tonemap".to_string(),
        texture_sources: vec![(0, NameId::new("rt_scene"))],
        camera_name: None,
    };
    let target = def.add_target_pass(Some(NameId::new("rt_window")), 0);
    target.add_pass(PassKindDef::Quad(quad_def));

    let mut ws_def = WorkspaceDef::new("bad_ws");
    ws_def.connect_external(0, "main", 0);
    tc.ctx.register_node_definition(Arc::new(def)).unwrap();
    let window = tc.window_texture(800, 600);
    let mut workspace = Workspace::new(
        Arc::new(ws_def),
        tc.ctx.clone(),
        vec![window],
        MAIN_CAMERA,
        WorkspaceOptions::default(),
    )
    .unwrap();

    let result = workspace.update();
    assert!(matches!(result, Err(CompositorError::IllegalTransition(_))));
}

// ============================================================================
// Depth copy
// ============================================================================

#[test]
fn test_depth_copy_emits_copy_transitions() {
    let tc = TestContext::new();

    let mut def = NodeDef::new("main");
    for name in ["depth_src", "depth_dst"] {
        let tex = def.textures_mut().add_texture_definition(name).unwrap();
        tex.width = 256;
        tex.height = 256;
        tex.format = PixelFormat::Depth32Float;
    }
    {
        let rtv = def.textures_mut().add_rtv("depth_rtv").unwrap();
        rtv.depth_attachment = RtvEntry::new(NameId::new("depth_src"));
    }
    let target = def.add_target_pass(Some(NameId::new("depth_rtv")), 0);
    let pass = target.add_pass(PassKindDef::Clear(PassClearDef::default()));
    pass.load_depth = LoadAction::Clear;

    let copy_def = PassDepthCopyDef {
        src_name: NameId::new("depth_src"),
        dst_name: NameId::new("depth_dst"),
    };
    let target = def.add_target_pass(None, 0);
    target.add_pass(PassKindDef::DepthCopy(copy_def));

    let mut workspace = build_workspace(&tc, def, (800, 600));
    let node = workspace.find_node(NameId::new("main")).unwrap();
    let src = node.local_textures()[0].clone();
    let dst = node.local_textures()[1].clone();

    run_one_frame(&mut workspace);

    assert_eq!(
        tc.backend.transitions_for(src.id()),
        vec![
            (ResourceLayout::Undefined, ResourceLayout::Clear),
            (ResourceLayout::Clear, ResourceLayout::CopySrc),
        ]
    );
    assert_eq!(
        tc.backend.transitions_for(dst.id()),
        vec![(ResourceLayout::Undefined, ResourceLayout::CopyDst)]
    );
    assert!(tc
        .backend
        .ops()
        .iter()
        .any(|op| matches!(op, RecordedOp::CopyTexture { .. })));
}

// ============================================================================
// Compute pass
// ============================================================================

#[test]
fn test_compute_pass_grows_uav_units_and_dispatches_every_frame() {
    let tc = TestContext::new();
    tc.jobs.register("Test/Simulate");

    let mut def = NodeDef::new("main");
    {
        let tex = def.textures_mut().add_texture_definition("rt_sim").unwrap();
        tex.width = 64;
        tex.height = 64;
        tex.format = PixelFormat::Rgba16Float;
        tex.flags = TextureUsage::UAV | TextureUsage::DISCARDABLE_CONTENT;
    }
    let mut compute_def = PassComputeDef::new("Test/Simulate");
    compute_def.add_uav_source(2, NameId::new("rt_sim"), ResourceAccess::Write);
    let target = def.add_target_pass(None, 0);
    target.add_pass(PassKindDef::Compute(compute_def));

    let mut workspace = build_workspace(&tc, def, (800, 600));

    let job = tc.jobs.find_job("Test/Simulate").unwrap();
    assert!(
        job.lock().num_uav_units() >= 3,
        "UAV unit count must grow to cover slot 2"
    );

    run_one_frame(&mut workspace);
    run_one_frame(&mut workspace);
    assert_eq!(tc.backend.num_dispatches(), 2, "bindings re-issued per frame");
}

// ============================================================================
// Mipmap pass
// ============================================================================

fn mipmap_node(method: MipmapMethod) -> NodeDef {
    let mut def = NodeDef::new("main");
    {
        let tex = def.textures_mut().add_texture_definition("rt_mips").unwrap();
        tex.width = 64;
        tex.height = 64;
        tex.num_mipmaps = 3;
        tex.format = PixelFormat::Rgba8Unorm;
        tex.flags = TextureUsage::RENDER_TARGET
            | TextureUsage::UAV
            | TextureUsage::ALLOW_AUTOMIPMAPS
            | TextureUsage::DISCARDABLE_CONTENT;
    }
    {
        let rtv = def.textures_mut().add_rtv("rt_mips_rtv").unwrap();
        rtv.colour_attachments
            .push(RtvEntry::new(NameId::new("rt_mips")));
    }
    let target = def.add_target_pass(Some(NameId::new("rt_mips_rtv")), 0);
    let pass = target.add_pass(PassKindDef::Clear(PassClearDef::default()));
    pass.load_colour[0] = LoadAction::Clear;

    let target = def.add_target_pass(Some(NameId::new("rt_mips_rtv")), 0);
    target.add_pass(PassKindDef::Mipmap(PassMipmapDef {
        method,
        ..Default::default()
    }));
    def
}

#[test]
fn test_mipmap_hardware_path_requests_backend_generation() {
    let tc = TestContext::new();
    let mut workspace = build_workspace(&tc, mipmap_node(MipmapMethod::ApiDefault), (800, 600));
    run_one_frame(&mut workspace);

    assert!(tc
        .backend
        .ops()
        .iter()
        .any(|op| matches!(op, RecordedOp::GenerateMipmaps { .. })));
    assert_eq!(tc.backend.num_dispatches(), 0);
}

#[test]
fn test_mipmap_compute_path_dispatches_blur_chain() {
    let tc = TestContext::new();
    tc.jobs.register("Mipmap/GaussianBlurH");
    tc.jobs.register("Mipmap/GaussianBlurV");

    let mut workspace = build_workspace(&tc, mipmap_node(MipmapMethod::Compute), (800, 600));
    run_one_frame(&mut workspace);

    // One horizontal+vertical pair per generated mip: (3 - 1) * 2.
    assert_eq!(tc.backend.num_dispatches(), 4);
    assert!(
        tc.backend.ops().iter().any(|op| matches!(
            op,
            RecordedOp::CreateTexture { label, .. } if label.contains("mipmap_tmp")
        )),
        "blur chain allocates its half-width intermediate"
    );
}

// ============================================================================
// IBL specular pass
// ============================================================================

fn ibl_node(output_mips: u32) -> NodeDef {
    let mut def = NodeDef::new("main");
    {
        let tex = def.textures_mut().add_texture_definition("cube_env").unwrap();
        tex.kind = TextureKind::Cube;
        tex.depth_or_slices = 6;
        tex.width = 64;
        tex.height = 64;
        tex.num_mipmaps = 7;
        tex.format = PixelFormat::Rgba16Float;
        // Persisted environment capture: written out-of-band, not
        // discardable.
        tex.flags = TextureUsage::RENDER_TARGET | TextureUsage::ALLOW_AUTOMIPMAPS;
    }
    {
        let tex = def.textures_mut().add_texture_definition("cube_ibl").unwrap();
        tex.kind = TextureKind::Cube;
        tex.depth_or_slices = 6;
        tex.width = 64;
        tex.height = 64;
        tex.num_mipmaps = output_mips;
        tex.format = PixelFormat::Rgba16Float;
        tex.flags =
            TextureUsage::UAV | TextureUsage::RENDER_TARGET | TextureUsage::DISCARDABLE_CONTENT;
    }

    let ibl_def = PassIblSpecularDef::new(NameId::new("cube_env"), NameId::new("cube_ibl"));
    let target = def.add_target_pass(None, 0);
    target.add_pass(PassKindDef::IblSpecular(ibl_def));
    def
}

#[test]
fn test_ibl_single_mip_output_is_a_plain_copy() {
    let tc = TestContext::new();
    let mut workspace = build_workspace(&tc, ibl_node(1), (800, 600));

    // The environment cube was rendered/uploaded before this workspace
    // runs; tell the compositor its current layout.
    workspace
        .find_node(NameId::new("main"))
        .unwrap()
        .local_textures()[0]
        .set_current_layout(ResourceLayout::Texture);

    run_one_frame(&mut workspace);

    assert_eq!(tc.jobs.num_clones(), 0, "no compute jobs instantiated");
    assert_eq!(tc.backend.num_dispatches(), 0);
    let copies = tc
        .backend
        .ops()
        .iter()
        .filter(|op| matches!(op, RecordedOp::CopyTexture { .. }))
        .count();
    assert_eq!(copies, 1, "one copy for the single output mip");
}

#[test]
fn test_ibl_compute_path_clones_one_job_per_mip() {
    let tc = TestContext::new();
    tc.jobs.register("IblSpecular/Integrate");

    let mut workspace = build_workspace(&tc, ibl_node(4), (800, 600));
    workspace
        .find_node(NameId::new("main"))
        .unwrap()
        .local_textures()[0]
        .set_current_layout(ResourceLayout::Texture);

    assert_eq!(tc.jobs.num_clones(), 4, "one convolution job per output mip");

    run_one_frame(&mut workspace);
    assert_eq!(tc.backend.num_dispatches(), 4);

    // Roughness rises linearly with the mip level.
    let clone_names = tc.jobs.clones.lock().clone();
    let last = tc.jobs.find_job(clone_names.last().unwrap()).unwrap();
    let params0 = last.lock().param("params0").unwrap().to_vec();
    assert!((params0[3] - 1.0).abs() < 1e-6, "last mip convolves roughness 1");
}

#[test]
fn test_ibl_requires_cube_input() {
    let tc = TestContext::new();
    tc.jobs.register("IblSpecular/Integrate");

    let mut def = NodeDef::new("main");
    {
        let tex = def.textures_mut().add_texture_definition("flat_env").unwrap();
        tex.width = 64;
        tex.height = 64;
        tex.num_mipmaps = 4;
        tex.format = PixelFormat::Rgba16Float;
        tex.flags = TextureUsage::RENDER_TARGET | TextureUsage::ALLOW_AUTOMIPMAPS;
    }
    {
        let tex = def.textures_mut().add_texture_definition("cube_ibl").unwrap();
        tex.kind = TextureKind::Cube;
        tex.depth_or_slices = 6;
        tex.width = 64;
        tex.height = 64;
        tex.num_mipmaps = 4;
        tex.format = PixelFormat::Rgba16Float;
        tex.flags =
            TextureUsage::UAV | TextureUsage::RENDER_TARGET | TextureUsage::DISCARDABLE_CONTENT;
    }
    let ibl_def = PassIblSpecularDef::new(NameId::new("flat_env"), NameId::new("cube_ibl"));
    let target = def.add_target_pass(None, 0);
    target.add_pass(PassKindDef::IblSpecular(ibl_def));

    tc.ctx.register_node_definition(Arc::new(def)).unwrap();
    let mut ws_def = WorkspaceDef::new("bad_ibl");
    ws_def.add_node_alias("main", "main").unwrap();
    let window = tc.window_texture(800, 600);
    let result = Workspace::new(
        Arc::new(ws_def),
        tc.ctx.clone(),
        vec![window],
        MAIN_CAMERA,
        WorkspaceOptions::default(),
    );

    // Fail-fast configuration validation, raised at pass-creation time.
    assert!(matches!(result, Err(CompositorError::InvalidParams(_))));
}

// ============================================================================
// Target-level barrier
// ============================================================================

#[test]
fn test_target_barrier_batches_group_transitions() {
    let tc = TestContext::new();

    let mut def = NodeDef::new("main");
    {
        let tex = def.textures_mut().add_texture_definition("rt0").unwrap();
        tex.width = 128;
        tex.height = 128;
        tex.format = PixelFormat::Rgba8Unorm;
    }
    {
        let rtv = def.textures_mut().add_rtv("rt0_rtv").unwrap();
        rtv.colour_attachments.push(RtvEntry::new(NameId::new("rt0")));
    }
    let target = def.add_target_pass(Some(NameId::new("rt0_rtv")), 0);
    target.set_target_level_barrier(true);
    for _ in 0..2 {
        let pass = target.add_pass(PassKindDef::Clear(PassClearDef::default()));
        pass.load_colour[0] = LoadAction::Clear;
    }

    let mut workspace = build_workspace(&tc, def, (800, 600));
    run_one_frame(&mut workspace);

    let ops = tc.backend.ops();
    let first_transition = ops
        .iter()
        .position(|op| matches!(op, RecordedOp::Transition { .. }))
        .expect("one transition");
    let first_clear = ops
        .iter()
        .position(|op| matches!(op, RecordedOp::Clear { .. }))
        .expect("clears recorded");

    assert_eq!(tc.backend.num_transitions(), 1, "one consolidated batch");
    assert!(
        first_transition < first_clear,
        "the batch executes before any pass of the group"
    );
}

// ============================================================================
// Shadow nodes
// ============================================================================

struct ShadowUpdateCounter {
    count: parking_lot::Mutex<usize>,
}

impl WorkspaceListener for ShadowUpdateCounter {
    fn shadow_nodes_updated(&self) {
        *self.count.lock() += 1;
    }
}

fn register_shadow_node(tc: &TestContext) {
    let mut shadow_def = ShadowNodeDef::new("shadows");
    shadow_def.set_num_shadow_maps(1);
    {
        let node = shadow_def.node_mut();
        {
            let tex = node
                .textures_mut()
                .add_texture_definition("shadow_map")
                .unwrap();
            tex.width = 512;
            tex.height = 512;
            tex.format = PixelFormat::Depth32Float;
        }
        {
            let rtv = node.textures_mut().add_rtv("shadow_rtv").unwrap();
            rtv.depth_attachment = RtvEntry::new(NameId::new("shadow_map"));
        }
        let target = node.add_target_pass(Some(NameId::new("shadow_rtv")), 0);
        let clear = target.add_pass(PassKindDef::Clear(PassClearDef::default()));
        clear.load_depth = LoadAction::Clear;
        target.add_pass(PassKindDef::Scene(PassSceneDef::default()));
    }
    tc.ctx
        .register_shadow_node_definition(Arc::new(shadow_def))
        .unwrap();
}

fn scene_with_shadows(camera_name: Option<&str>) -> PassSceneDef {
    PassSceneDef {
        camera_name: camera_name.map(str::to_string),
        shadow_node: Some(NameId::new("shadows")),
        ..Default::default()
    }
}

fn shadowed_main_node(second_camera: Option<&str>) -> NodeDef {
    let mut def = NodeDef::new("main");
    def.add_input(0, "rt_window").unwrap();
    let target = def.add_target_pass(Some(NameId::new("rt_window")), 0);
    let pass = target.add_pass(PassKindDef::Scene(scene_with_shadows(None)));
    pass.load_colour[0] = LoadAction::Clear;
    let pass = target.add_pass(PassKindDef::Scene(scene_with_shadows(second_camera)));
    pass.load_colour[0] = LoadAction::Load;
    def
}

fn shadow_workspace(tc: &TestContext, second_camera: Option<&str>) -> Workspace {
    register_shadow_node(tc);
    tc.ctx
        .register_node_definition(Arc::new(shadowed_main_node(second_camera)))
        .unwrap();
    let mut ws_def = WorkspaceDef::new("shadow_ws");
    ws_def.connect_external(0, "main", 0);
    let window = tc.window_texture(800, 600);
    Workspace::new(
        Arc::new(ws_def),
        tc.ctx.clone(),
        vec![window],
        MAIN_CAMERA,
        WorkspaceOptions::default(),
    )
    .unwrap()
}

#[test]
fn test_shadow_node_first_only_updates_once_per_camera() {
    let tc = TestContext::new();
    let mut workspace = shadow_workspace(&tc, None);

    let counter = Arc::new(ShadowUpdateCounter {
        count: parking_lot::Mutex::new(0),
    });
    workspace.add_listener(counter.clone());

    run_one_frame(&mut workspace);

    // Both scene passes use the same camera: the second reuses the
    // shadow maps computed by the first.
    assert_eq!(*counter.count.lock(), 1);
    // Shadow scene render + two main scene renders.
    assert_eq!(tc.renderer.num_scene_renders(), 3);
}

#[test]
fn test_shadow_node_recalculates_when_camera_changes() {
    let tc = TestContext::new();
    let mut workspace = shadow_workspace(&tc, Some("second_camera"));

    let counter = Arc::new(ShadowUpdateCounter {
        count: parking_lot::Mutex::new(0),
    });
    workspace.add_listener(counter.clone());

    run_one_frame(&mut workspace);

    // Camera changed between the passes: the shadow node must be
    // recomputed for the second camera.
    assert_eq!(*counter.count.lock(), 2);
    assert_eq!(tc.renderer.num_scene_renders(), 4);
}
