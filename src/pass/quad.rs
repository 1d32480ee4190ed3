//! Fullscreen quad pass.

use crate::barrier::ResourceTransition;
use crate::channel::ChannelResolver;
use crate::context::CameraHandle;
use crate::definition::PassQuadDef;
use crate::error::CompositorError;

use super::{ExecContext, PassCreateArgs, PassState};

/// Draws a fullscreen quad with a material, sampling the pass' declared
/// input channels.
pub(crate) struct QuadExec {
    material_name: String,
    camera: CameraHandle,
    texture_sources: Vec<(u32, crate::name::NameId)>,
}

impl QuadExec {
    pub(crate) fn new(
        def: &PassQuadDef,
        state: &mut PassState,
        resolver: &ChannelResolver,
        args: &mut PassCreateArgs,
    ) -> Result<Self, CompositorError> {
        let camera = resolve_camera(def.camera_name.as_deref(), args)?;
        let body = Self {
            material_name: def.material_name.clone(),
            camera,
            texture_sources: def.texture_sources.clone(),
        };
        body.refresh_dependencies(state, resolver)?;
        Ok(body)
    }

    /// Register the quad's sampled channels as texture dependencies so
    /// the generic analysis transitions them for reading.
    pub(crate) fn refresh_dependencies(
        &self,
        state: &mut PassState,
        resolver: &ChannelResolver,
    ) -> Result<(), CompositorError> {
        for &(_, name) in &self.texture_sources {
            let texture = resolver.texture(name)?;
            let already_known = state
                .texture_dependencies
                .iter()
                .any(|(dep_name, _)| *dep_name == name);
            if !already_known {
                state.texture_dependencies.push((name, texture));
            }
        }
        Ok(())
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

        exec.ctx
            .scene_renderer()
            .render_fullscreen_quad(&self.material_name, self.camera);

        if !skip_bind {
            exec.ctx.backend().end_render_pass();
        }
        Ok(())
    }
}

/// Camera lookup shared by the pass kinds that carry one.
pub(crate) fn resolve_camera(
    camera_name: Option<&str>,
    args: &PassCreateArgs,
) -> Result<CameraHandle, CompositorError> {
    match camera_name {
        None => Ok(args.default_camera),
        Some(name) => args
            .ctx
            .scene_renderer()
            .find_camera(name)
            .ok_or_else(|| {
                CompositorError::ItemNotFound(format!("camera '{name}' not found"))
            }),
    }
}
