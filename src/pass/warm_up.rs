//! Shader warm-up pass.

use crate::barrier::ResourceTransition;
use crate::context::CameraHandle;
use crate::definition::{PassWarmUpDef, ShadowNodeRecalculation, WarmUpMode};
use crate::error::CompositorError;
use crate::shadow::ShadowNodeKey;

use super::quad::resolve_camera;
use super::{ExecContext, PassCreateArgs, PassState};

/// Collects and/or triggers shader compilation for a view, so the real
/// frames that follow don't hitch. Shares the shadow-node update policy
/// with the scene pass.
pub(crate) struct WarmUpExec {
    def: PassWarmUpDef,
    camera: CameraHandle,
    shadow_node: Option<ShadowNodeKey>,
    update_shadow_node: bool,
}

impl WarmUpExec {
    pub(crate) fn new(
        def: &PassWarmUpDef,
        args: &mut PassCreateArgs,
    ) -> Result<Self, CompositorError> {
        let camera = resolve_camera(def.camera_name.as_deref(), args)?;

        let shadow_node = match def.shadow_node {
            None => None,
            Some(name) => {
                let arena = args.shadow_nodes.as_deref_mut().ok_or_else(|| {
                    CompositorError::InvalidState(
                        "warm-up passes inside a shadow node cannot reference shadow nodes"
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
            && def.recalculation == ShadowNodeRecalculation::Recalculate;

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
        self.def.recalculation
    }

    pub(crate) fn set_update_shadow_node(&mut self, update: bool) {
        self.update_shadow_node = update;
    }

    pub(crate) fn analyze(
        &mut self,
        state: &PassState,
        out: &mut Vec<ResourceTransition>,
        exec: &mut ExecContext,
    ) -> Result<(), CompositorError> {
        state.analyze_render_targets_and_deps(out, exec)
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
                     shadow node"
                        .to_string(),
                ));
            }

            if let Some(key) = self.shadow_node {
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
                if let Some(shadow_node) = arena.get_mut(key).filter(|sn| sn.enabled()) {
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
                    shadow_node.update(self.camera, &mut child)?;
                }
            }
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

        if let Some(rpd) = state.render_pass_desc() {
            let viewport = state.effective_viewport(exec);
            exec.ctx.backend().begin_render_pass(rpd, &viewport);
        }

        let renderer = exec.ctx.scene_renderer();
        if self.def.mode.contains(WarmUpMode::COLLECT) {
            renderer.warm_up_shaders_collect(
                self.camera,
                self.def.visibility_mask,
                self.def.first_rq,
                self.def.last_rq,
            );
        }
        if self.def.mode.contains(WarmUpMode::TRIGGER) {
            renderer.warm_up_shaders_trigger();
        }

        if state.render_pass_desc().is_some() {
            exec.ctx.backend().end_render_pass();
        }
        Ok(())
    }
}
