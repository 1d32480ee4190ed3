//! Clear pass.

use crate::barrier::{ResourceAccess, ResourceLayout, ResourceTransition, StageMask};
use crate::definition::PassClearDef;
use crate::error::CompositorError;
use crate::types::LoadAction;

use super::{ExecContext, PassState};

/// Clears the attachments selected by the pass' load actions.
///
/// On tile-based GPUs an explicit clear is normally a no-op (the tiler's
/// load action already clears for free), but depth/stencil must still be
/// cleared the non-tiler way when the backend cannot clear a stencil
/// sub-region.
pub(crate) struct ClearExec {
    def: PassClearDef,
}

impl ClearExec {
    pub(crate) fn new(def: PassClearDef) -> Self {
        Self { def }
    }

    /// Whether the explicit clear actually runs on this backend.
    fn will_clear(&self, state: &PassState, exec: &ExecContext) -> bool {
        let caps = exec.ctx.backend().caps();
        let Some(rpd) = state.render_pass_desc() else {
            return false;
        };

        let stencil_forces_clear = !caps.tiler_can_clear_stencil_region
            && rpd.has_stencil_format()
            && (state.definition().load_depth == LoadAction::Clear
                || state.definition().load_stencil == LoadAction::Clear);

        !self.def.non_tilers_only || !caps.tiler || stencil_forces_clear
    }

    pub(crate) fn analyze(
        &mut self,
        state: &PassState,
        out: &mut Vec<ResourceTransition>,
        exec: &mut ExecContext,
    ) -> Result<(), CompositorError> {
        if !self.will_clear(state, exec) {
            return Ok(());
        }
        let Some(rpd) = state.render_pass_desc() else {
            return Ok(());
        };

        let backend = exec.ctx.backend().as_ref();
        let def = state.definition();

        for (i, colour) in rpd.colour.iter().enumerate() {
            if def.load_colour[i] == LoadAction::Clear {
                exec.solver.resolve_texture_transition(
                    out,
                    &colour.texture,
                    ResourceLayout::Clear,
                    ResourceAccess::Write,
                    StageMask::empty(),
                    false,
                    backend,
                )?;
            }
        }
        if let Some(depth) = &rpd.depth {
            if def.load_depth == LoadAction::Clear {
                exec.solver.resolve_texture_transition(
                    out,
                    &depth.texture,
                    ResourceLayout::Clear,
                    ResourceAccess::Write,
                    StageMask::empty(),
                    false,
                    backend,
                )?;
            }
        }
        if let Some(stencil) = &rpd.stencil {
            let shared_with_depth = rpd
                .depth
                .as_ref()
                .is_some_and(|d| d.texture.id() == stencil.texture.id());
            if !shared_with_depth && def.load_stencil == LoadAction::Clear {
                exec.solver.resolve_texture_transition(
                    out,
                    &stencil.texture,
                    ResourceLayout::Clear,
                    ResourceAccess::Write,
                    StageMask::empty(),
                    false,
                    backend,
                )?;
            }
        }
        Ok(())
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

        if self.will_clear(state, exec) {
            if let Some(rpd) = state.render_pass_desc() {
                exec.ctx.backend().clear(rpd);
            }
        }
        Ok(())
    }
}
