//! Stencil-state pass.

use crate::barrier::ResourceTransition;
use crate::definition::PassStencilDef;
use crate::error::CompositorError;

use super::{ExecContext, PassState};

/// Sets the stencil reference state for subsequent passes on the target.
pub(crate) struct StencilExec {
    def: PassStencilDef,
}

impl StencilExec {
    pub(crate) fn new(def: PassStencilDef) -> Self {
        Self { def }
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
        exec.ctx.backend().set_stencil_state(&self.def.params);
        Ok(())
    }
}
