//! Depth copy pass.

use std::sync::Arc;

use crate::barrier::{ResourceAccess, ResourceLayout, ResourceTransition, StageMask};
use crate::channel::ChannelResolver;
use crate::definition::PassDepthCopyDef;
use crate::error::CompositorError;
use crate::resources::Texture;

use super::{ExecContext, PassState};

/// Copies one depth texture into another (mip 0).
pub(crate) struct DepthCopyExec {
    src: Arc<Texture>,
    dst: Arc<Texture>,
}

impl DepthCopyExec {
    pub(crate) fn new(
        def: &PassDepthCopyDef,
        resolver: &ChannelResolver,
    ) -> Result<Self, CompositorError> {
        let src = resolver.texture(def.src_name)?;
        let dst = resolver.texture(def.dst_name)?;
        if src.width() != dst.width() || src.height() != dst.height() {
            return Err(CompositorError::InvalidParams(format!(
                "depth copy source '{}' and destination '{}' have different resolutions",
                src.name(),
                dst.name()
            )));
        }
        Ok(Self { src, dst })
    }

    pub(crate) fn uses_texture(&self, texture: &Texture) -> bool {
        self.src.id() == texture.id() || self.dst.id() == texture.id()
    }

    pub(crate) fn analyze(
        &mut self,
        _state: &PassState,
        out: &mut Vec<ResourceTransition>,
        exec: &mut ExecContext,
    ) -> Result<(), CompositorError> {
        let backend = exec.ctx.backend().as_ref();
        exec.solver.resolve_texture_transition(
            out,
            &self.src,
            ResourceLayout::CopySrc,
            ResourceAccess::Read,
            StageMask::empty(),
            false,
            backend,
        )?;
        exec.solver.resolve_texture_transition(
            out,
            &self.dst,
            ResourceLayout::CopyDst,
            ResourceAccess::Write,
            StageMask::empty(),
            false,
            backend,
        )?;
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
        exec.ctx.backend().copy_texture(&self.src, 0, &self.dst, 0);
        Ok(())
    }
}
