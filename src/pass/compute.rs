//! Compute dispatch pass.

use crate::barrier::{ResourceAccess, ResourceLayout, ResourceTransition, StageMask};
use crate::channel::ChannelResolver;
use crate::context::{ComputeBufferSlot, ComputeJobHandle, ComputeTexSlot, ComputeUavSlot};
use crate::definition::PassComputeDef;
use crate::error::CompositorError;
use crate::resources::UavBuffer;

use super::quad::resolve_camera;
use super::{ExecContext, PassCreateArgs, PassState};

/// Dispatches an externally owned compute job with the declared texture,
/// UAV and buffer bindings.
///
/// Bindings are written to the job every frame; the shader system is not
/// assumed to keep them persistent.
pub(crate) struct ComputeExec {
    def: PassComputeDef,
    job: ComputeJobHandle,
}

impl ComputeExec {
    pub(crate) fn new(
        def: PassComputeDef,
        state: &mut PassState,
        resolver: &ChannelResolver,
        args: &mut PassCreateArgs,
    ) -> Result<Self, CompositorError> {
        debug_assert!(
            state.definition().exposed_textures.is_empty(),
            "compute passes declare their inputs as texture sources, not exposed \
             textures; barriers may not behave correctly otherwise"
        );

        let job = args
            .ctx
            .compute_jobs()
            .find_job(&def.job_name)
            .ok_or_else(|| {
                CompositorError::ItemNotFound(format!(
                    "compute job '{}' not found",
                    def.job_name
                ))
            })?;

        // Cameras only matter to the external dispatch context; resolving
        // here still validates the name early.
        resolve_camera(def.camera_name.as_deref(), args)?;

        let body = Self { def, job };

        // Ensure the job has enough UAV units for our bindings.
        {
            let max_used_slot = body
                .def
                .uav_sources
                .iter()
                .map(|s| s.slot)
                .max()
                .map(|max| max + 1)
                .unwrap_or(0);
            let mut job = body.job.lock();
            if max_used_slot > job.num_uav_units() {
                job.set_num_uav_units(max_used_slot);
            }
        }

        body.set_resources_to_job(resolver)?;
        Ok(body)
    }

    /// (Re)bind every declared resource to the job.
    fn set_resources_to_job(&self, resolver: &ChannelResolver) -> Result<(), CompositorError> {
        let mut job = self.job.lock();

        for source in &self.def.texture_sources {
            let texture = resolver.texture(source.name)?;
            let mut slot = ComputeTexSlot::new(texture);
            slot.mip_level = source.mip_level;
            job.set_texture(source.slot, Some(slot));
        }

        for source in &self.def.uav_sources {
            let texture = resolver.texture(source.name)?;
            job.set_uav_texture(
                source.slot,
                Some(ComputeUavSlot {
                    texture,
                    access: source.access,
                    mip_level: source.mip_level,
                    array_index: 0,
                    format: crate::types::PixelFormat::Unknown,
                }),
            );
        }

        for source in &self.def.buffer_sources {
            let buffer = resolver.buffer(source.name)?;
            let size_bytes = if source.size_bytes == 0 {
                buffer.size_bytes()
            } else {
                source.size_bytes
            };
            job.set_uav_buffer(
                source.slot,
                Some(ComputeBufferSlot {
                    buffer,
                    access: source.access,
                    offset: source.offset,
                    size_bytes,
                }),
            );
        }

        Ok(())
    }

    /// Drop bindings referencing a destroyed buffer.
    pub(crate) fn forget_buffer(&mut self, buffer: &UavBuffer) {
        let mut job = self.job.lock();
        let slots: Vec<u32> = job
            .buffers()
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| {
                slot.as_ref()
                    .filter(|s| s.buffer.id() == buffer.id())
                    .map(|_| i as u32)
            })
            .collect();
        for slot in slots {
            job.set_uav_buffer(slot, None);
        }
    }

    pub(crate) fn analyze(
        &mut self,
        state: &PassState,
        out: &mut Vec<ResourceTransition>,
        resolver: &ChannelResolver,
        exec: &mut ExecContext,
    ) -> Result<(), CompositorError> {
        let backend = exec.ctx.backend().as_ref();

        for source in &self.def.texture_sources {
            let texture = resolver.texture(source.name)?;
            exec.solver.resolve_texture_transition(
                out,
                &texture,
                ResourceLayout::Texture,
                ResourceAccess::Read,
                StageMask::COMPUTE,
                false,
                backend,
            )?;
        }

        for source in &self.def.uav_sources {
            let texture = resolver.texture(source.name)?;
            exec.solver.resolve_texture_transition(
                out,
                &texture,
                ResourceLayout::Uav,
                source.access,
                StageMask::COMPUTE,
                source.allow_write_after_write,
                backend,
            )?;
        }

        for source in &self.def.buffer_sources {
            let buffer = resolver.buffer(source.name)?;
            exec.solver.resolve_buffer_transition(
                out,
                &buffer,
                source.access,
                StageMask::COMPUTE,
                source.allow_write_after_write,
            );
        }

        state.analyze_uav_dependencies(out, exec)?;
        Ok(())
    }

    pub(crate) fn execute(
        &mut self,
        state: &mut PassState,
        resolver: &ChannelResolver,
        exec: &mut ExecContext,
    ) -> Result<(), CompositorError> {
        exec.ctx.backend().end_render_pass();

        if !state.barriers_handled_externally {
            state.transitions.clear();
            let mut transitions = std::mem::take(&mut state.transitions);
            self.analyze(state, &mut transitions, resolver, exec)?;
            state.transitions = transitions;
            state.execute_resource_transitions(exec);
        }

        self.set_resources_to_job(resolver)?;

        state.fire_pre(exec);
        exec.ctx.backend().dispatch_compute(&self.job.lock());
        Ok(())
    }
}
