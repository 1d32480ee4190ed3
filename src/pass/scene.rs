//! Scene rendering pass.

use std::sync::Arc;

use crate::barrier::{ResourceAccess, ResourceLayout, ResourceTransition, StageMask};
use crate::context::CameraHandle;
use crate::definition::{PassSceneDef, ShadowNodeRecalculation};
use crate::error::CompositorError;
use crate::resources::Texture;
use crate::shadow::ShadowNodeKey;

use super::quad::resolve_camera;
use super::{ExecContext, PassCreateArgs, PassState};

/// Renders the visible scene for a camera into the bound target,
/// optionally updating a shadow node first.
pub(crate) struct SceneExec {
    def: PassSceneDef,
    camera: CameraHandle,
    shadow_node: Option<ShadowNodeKey>,
    /// Whether this pass updates its shadow node this frame. For
    /// `FirstOnly` recalculation the workspace resolves this flag after
    /// fixing the execution order.
    update_shadow_node: bool,
}

impl SceneExec {
    pub(crate) fn new(
        def: &PassSceneDef,
        args: &mut PassCreateArgs,
    ) -> Result<Self, CompositorError> {
        let camera = resolve_camera(def.camera_name.as_deref(), args)?;

        let shadow_node = match def.shadow_node {
            None => None,
            Some(name) => {
                let arena = args.shadow_nodes.as_deref_mut().ok_or_else(|| {
                    CompositorError::InvalidState(
                        "scene passes inside a shadow node cannot reference shadow nodes"
                            .to_string(),
                    )
                })?;
                Some(crate::shadow::find_or_create_shadow_node(
                    arena,
                    name,
                    args.ctx,
                    args.globals,
                    args.final_target,
                    args.default_camera,
                )?)
            }
        };

        let update_shadow_node = shadow_node.is_some()
            && def.shadow_node_recalculation == ShadowNodeRecalculation::Recalculate;

        Ok(Self {
            def: def.clone(),
            camera,
            shadow_node,
            update_shadow_node,
        })
    }

    pub(crate) fn camera(&self) -> CameraHandle {
        self.camera
    }

    pub(crate) fn shadow_node(&self) -> Option<ShadowNodeKey> {
        self.shadow_node
    }

    pub(crate) fn recalculation(&self) -> ShadowNodeRecalculation {
        self.def.shadow_node_recalculation
    }

    pub(crate) fn set_update_shadow_node(&mut self, update: bool) {
        self.update_shadow_node = update;
    }

    /// Textures the scene samples from its shadow node (the shadow maps).
    fn shadow_map_textures(&self, exec: &ExecContext) -> Vec<Arc<Texture>> {
        let Some(key) = self.shadow_node else {
            return Vec::new();
        };
        exec.shadow_nodes
            .as_deref()
            .and_then(|arena| arena.get(key))
            .map(|sn| sn.shadow_map_textures().to_vec())
            .unwrap_or_default()
    }

    pub(crate) fn analyze(
        &mut self,
        state: &PassState,
        out: &mut Vec<ResourceTransition>,
        exec: &mut ExecContext,
    ) -> Result<(), CompositorError> {
        state.analyze_render_targets_and_deps(out, exec)?;

        for texture in self.shadow_map_textures(exec) {
            exec.solver.resolve_texture_transition(
                out,
                &texture,
                ResourceLayout::Texture,
                ResourceAccess::Read,
                StageMask::FRAGMENT,
                false,
                exec.ctx.backend().as_ref(),
            )?;
        }
        Ok(())
    }

    fn update_shadow_node_now(&self, exec: &mut ExecContext) -> Result<(), CompositorError> {
        let Some(key) = self.shadow_node else {
            return Ok(());
        };

        let ExecContext {
            ctx,
            solver,
            listeners,
            globals,
            shadow_nodes,
            bound_uavs,
            default_camera,
            execution_mask,
            viewport_modifier_mask,
            viewport_modifier,
        } = &mut *exec;

        let arena = shadow_nodes.as_deref_mut().ok_or_else(|| {
            CompositorError::InvalidState(
                "shadow node update requested while inside a shadow node".to_string(),
            )
        })?;
        let shadow_node = arena.get_mut(key).ok_or_else(|| {
            CompositorError::InvalidState("shadow node was destroyed".to_string())
        })?;

        if !shadow_node.enabled() {
            return Ok(());
        }

        let mut child = ExecContext {
            ctx: *ctx,
            solver: &mut **solver,
            listeners: *listeners,
            globals: *globals,
            shadow_nodes: None,
            bound_uavs: &mut **bound_uavs,
            default_camera: *default_camera,
            execution_mask: *execution_mask,
            viewport_modifier_mask: *viewport_modifier_mask,
            viewport_modifier: *viewport_modifier,
        };
        shadow_node.update(self.camera, &mut child)
    }

    pub(crate) fn execute(
        &mut self,
        state: &mut PassState,
        exec: &mut ExecContext,
    ) -> Result<(), CompositorError> {
        if self.update_shadow_node {
            if state.definition().skip_load_store_semantics {
                return Err(CompositorError::InvalidParams(
                    "skip_load_store_semantics can't be set when the pass updates its \
                     shadow node; use shadow_node reuse instead"
                        .to_string(),
                ));
            }
            self.update_shadow_node_now(exec)?;
        }

        for listener in exec.listeners {
            listener.pass_scene_after_shadow_maps(state);
        }

        if !state.barriers_handled_externally {
            state.transitions.clear();
            let mut transitions = std::mem::take(&mut state.transitions);
            self.analyze(state, &mut transitions, exec)?;
            state.transitions = transitions;
            state.execute_resource_transitions(exec);
        }

        state.fire_pre(exec);

        let skip_bind = state.definition().skip_load_store_semantics;
        if !skip_bind {
            if let Some(rpd) = state.render_pass_desc() {
                let viewport = state.effective_viewport(exec);
                exec.ctx.backend().begin_render_pass(rpd, &viewport);
            }
        }

        // External renderers doing their own culling should sync through
        // this hook before recording draws.
        for listener in exec.listeners {
            listener.after_frustum_culling(state);
        }

        exec.ctx.scene_renderer().render_visible_objects(
            self.camera,
            self.def.first_rq,
            self.def.last_rq,
            self.def.visibility_mask,
        );

        if !skip_bind {
            exec.ctx.backend().end_render_pass();
        }
        Ok(())
    }
}
