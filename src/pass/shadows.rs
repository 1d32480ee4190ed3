//! Explicit shadow-map update pass.

use crate::context::CameraHandle;
use crate::definition::{PassShadowsDef, ShadowNodeRecalculation};
use crate::error::CompositorError;
use crate::shadow::ShadowNodeKey;

use super::quad::resolve_camera;
use super::{ExecContext, PassCreateArgs, PassState};

pub(crate) struct ShadowEntry {
    pub key: ShadowNodeKey,
    /// Resolved by the workspace for `FirstOnly` recalculation.
    pub update: bool,
}

/// Updates one or more shadow nodes without rendering any scene content
/// itself; used to hoist shadow map generation out of scene passes.
pub(crate) struct ShadowsExec {
    recalculation: ShadowNodeRecalculation,
    camera: CameraHandle,
    entries: Vec<ShadowEntry>,
}

impl ShadowsExec {
    pub(crate) fn new(
        def: &PassShadowsDef,
        args: &mut PassCreateArgs,
    ) -> Result<Self, CompositorError> {
        let camera = resolve_camera(def.camera_name.as_deref(), args)?;

        let mut entries = Vec::with_capacity(def.shadow_nodes.len());
        for &name in &def.shadow_nodes {
            let arena = args.shadow_nodes.as_deref_mut().ok_or_else(|| {
                CompositorError::InvalidState(
                    "shadows passes cannot appear inside a shadow node".to_string(),
                )
            })?;
            let key = crate::shadow::find_or_create_shadow_node(
                arena,
                name,
                args.ctx,
                args.globals,
                args.final_target,
                args.default_camera,
            )?;
            entries.push(ShadowEntry {
                key,
                update: def.recalculation == ShadowNodeRecalculation::Recalculate,
            });
        }

        Ok(Self {
            recalculation: def.recalculation,
            camera,
            entries,
        })
    }

    pub(crate) fn camera(&self) -> CameraHandle {
        self.camera
    }

    pub(crate) fn recalculation(&self) -> ShadowNodeRecalculation {
        self.recalculation
    }

    pub(crate) fn entries(&self) -> &[ShadowEntry] {
        &self.entries
    }

    pub(crate) fn entries_mut(&mut self) -> &mut [ShadowEntry] {
        &mut self.entries
    }

    pub(crate) fn execute(
        &mut self,
        state: &mut PassState,
        exec: &mut ExecContext,
    ) -> Result<(), CompositorError> {
        state.fire_pre(exec);

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
                "shadows passes cannot appear inside a shadow node".to_string(),
            )
        })?;

        for entry in &self.entries {
            if !entry.update {
                continue;
            }
            let Some(shadow_node) = arena.get_mut(entry.key).filter(|sn| sn.enabled()) else {
                continue;
            };
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

        Ok(())
    }
}
