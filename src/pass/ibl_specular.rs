//! IBL specular prefilter pass.

use std::sync::Arc;

use crate::barrier::{ResourceAccess, ResourceLayout, ResourceTransition, StageMask};
use crate::channel::ChannelResolver;
use crate::context::{ComputeJobHandle, ComputeJobProvider, ComputeTexSlot, ComputeUavSlot};
use crate::definition::PassIblSpecularDef;
use crate::error::CompositorError;
use crate::resources::{SamplerDescriptor, Texture};
use crate::types::TextureKind;

use super::{execute_transitions_now, ExecContext, PassCreateArgs, PassState};

/// Convolves a cube map into prefiltered specular mips.
///
/// Preconditions are validated up front — this is fail-fast configuration
/// checking, not a runtime retry. The pass degrades in two documented ways:
/// a plain mip-copy when the output has a single mip (nothing to convolve),
/// and mipmap-based filtering when compute is unavailable or explicitly
/// forced off.
pub(crate) struct IblSpecularExec {
    def: PassIblSpecularDef,
    input: Arc<Texture>,
    output: Arc<Texture>,
    jobs: Vec<ComputeJobHandle>,
    job_names: Vec<String>,
    provider: Arc<dyn ComputeJobProvider>,
    /// Accumulation across iterations needs typed UAV loads; without them
    /// the whole convolution runs in a single beefier iteration.
    single_iteration_fallback: bool,
}

impl IblSpecularExec {
    pub(crate) fn new(
        def: &PassIblSpecularDef,
        state: &mut PassState,
        resolver: &ChannelResolver,
        args: &mut PassCreateArgs,
    ) -> Result<Self, CompositorError> {
        let caps = args.ctx.backend().caps();

        let input = resolver.texture(def.input_name)?;
        let output = resolver.texture(def.output_name)?;

        let mut body = Self {
            def: def.clone(),
            input,
            output,
            jobs: Vec::new(),
            job_names: Vec::new(),
            provider: Arc::clone(args.ctx.compute_jobs()),
            single_iteration_fallback: !caps.typed_uav_loads,
        };

        if body.input.id() == body.output.id() {
            // Probe reuses its own cubemap; IBL is not wanted.
            return Ok(body);
        }
        if body.output.mip_level_count() == 1 {
            // Nothing to convolve; execution falls back to a plain copy.
            return Ok(body);
        }

        if body.input.kind() != TextureKind::Cube {
            return Err(CompositorError::InvalidParams(format!(
                "IBL specular requires a cube map input; '{}' is not one",
                body.input.name()
            )));
        }
        if body.input.mip_level_count() < body.output.mip_level_count() {
            return Err(CompositorError::InvalidParams(format!(
                "IBL specular input must have at least as many mipmaps as the output; \
                 input '{}' has {}, output '{}' has {}",
                body.input.name(),
                body.input.mip_level_count(),
                body.output.name(),
                body.output.mip_level_count()
            )));
        }
        if !body.input.allows_automipmaps() {
            return Err(CompositorError::InvalidParams(format!(
                "IBL specular input '{}' must be created with ALLOW_AUTOMIPMAPS",
                body.input.name()
            )));
        }
        if !body.output.is_uav() && !def.force_mipmap_fallback && caps.compute {
            return Err(CompositorError::InvalidParams(format!(
                "IBL specular output '{}' must be UAV-capable",
                body.output.name()
            )));
        }

        if !def.force_mipmap_fallback {
            body.setup_compute_shaders(state, args)?;
        }

        Ok(body)
    }

    pub(crate) fn uses_texture(&self, texture: &Texture) -> bool {
        self.input.id() == texture.id() || self.output.id() == texture.id()
    }

    /// Whether this pass created any compute jobs (false = fallback path).
    pub fn uses_compute(&self) -> bool {
        !self.jobs.is_empty()
    }

    fn destroy_compute_shaders(&mut self) {
        for name in self.job_names.drain(..) {
            self.provider.destroy_job(&name);
        }
        self.jobs.clear();
    }

    fn setup_compute_shaders(
        &mut self,
        state: &mut PassState,
        args: &mut PassCreateArgs,
    ) -> Result<(), CompositorError> {
        self.destroy_compute_shaders();

        let base = args.ctx.compute_jobs().find_job("IblSpecular/Integrate");
        if base.is_none() {
            return Err(CompositorError::InvalidParams(
                "to use IBL specular with compute shaders the IblSpecular/Integrate \
                 job must be registered"
                    .to_string(),
            ));
        }

        let caps = args.ctx.backend().caps();
        if !caps.compute {
            log::info!("compute shaders not supported; using fallback IBL specular generation");
            return Ok(());
        }

        let aniso = args
            .ctx
            .samplers()
            .get_or_create(SamplerDescriptor::anisotropic_wrap());

        let out_num_mips = self.output.mip_level_count();
        for mip in 0..out_num_mips {
            let name = format!(
                "IblSpecular/Integrate/{}/mip{}",
                args.unique_suffix, mip
            );
            let job = self
                .provider
                .clone_job("IblSpecular/Integrate", &name)
                .expect("base job exists");

            {
                let mut job = job.lock();
                job.set_property("typed_uav_loads", i32::from(caps.typed_uav_loads));

                let mut tex_slot = ComputeTexSlot::new(Arc::clone(&self.input));
                tex_slot.sampler = Some(Arc::clone(&aniso));
                job.set_texture(0, Some(tex_slot));

                job.set_uav_texture(
                    0,
                    Some(ComputeUavSlot {
                        texture: Arc::clone(&self.output),
                        access: if caps.typed_uav_loads {
                            ResourceAccess::ReadWrite
                        } else {
                            ResourceAccess::Write
                        },
                        mip_level: mip,
                        array_index: 0,
                        format: self.output.format(),
                    }),
                );

                let samples_offset = 0.0;
                let mut sample_count = self.def.samples_per_iteration;
                let mut max_samples =
                    if state.definition().num_initial_passes != u32::MAX {
                        self.def.samples_per_iteration
                            * state.definition().num_initial_passes as f32
                    } else {
                        self.def.samples_per_iteration
                    };
                // Roughness rises linearly with the mip level.
                let roughness = mip as f32 / (out_num_mips - 1) as f32;

                if !caps.typed_uav_loads && sample_count != max_samples {
                    sample_count = self.def.samples_single_iteration_fallback;
                    max_samples = self.def.samples_single_iteration_fallback;
                }

                job.set_param(
                    "params0",
                    &[samples_offset, sample_count, max_samples, roughness],
                );
                job.set_param("params1", &[mip as f32, 1.0, 0.0, 0.0]);
                job.set_param(
                    "params2",
                    &[
                        self.input.width() as f32,
                        self.input.height() as f32,
                        (self.output.width() >> mip).max(1) as f32,
                        (self.output.height() >> mip).max(1) as f32,
                    ],
                );
                job.set_param("iblCorrection", &self.def.ibl_correction);
            }

            self.jobs.push(job);
            self.job_names.push(name);
        }

        if self.single_iteration_fallback && state.num_passes_left() != u32::MAX {
            // Without typed UAV loads the pass cannot accumulate across
            // frames; everything happens in one iteration.
            state.num_passes_left = 1;
        }

        Ok(())
    }

    /// Restart the progressive convolution from sample offset zero.
    pub(crate) fn reset_progress(&mut self, state: &mut PassState) {
        for job in &self.jobs {
            let mut job = job.lock();
            if let Some(params0) = job.param("params0") {
                let mut params0: Vec<f32> = params0.to_vec();
                params0[0] = 0.0;
                job.set_param("params0", &params0);
            }
        }
        if self.single_iteration_fallback && state.num_passes_left() != u32::MAX {
            state.num_passes_left = 1;
        }
    }

    pub(crate) fn rebuild(
        &mut self,
        state: &mut PassState,
        resolver: &ChannelResolver,
        args: &mut PassCreateArgs,
    ) -> Result<(), CompositorError> {
        self.input = resolver.texture(self.def.input_name)?;
        self.output = resolver.texture(self.def.output_name)?;
        if self.input.id() != self.output.id()
            && self.output.mip_level_count() > 1
            && !self.def.force_mipmap_fallback
        {
            self.setup_compute_shaders(state, args)?;
        }
        Ok(())
    }

    pub(crate) fn analyze(
        &mut self,
        _state: &PassState,
        out: &mut Vec<ResourceTransition>,
        exec: &mut ExecContext,
    ) -> Result<(), CompositorError> {
        let backend = exec.ctx.backend().as_ref();

        if self.uses_compute() {
            exec.solver.resolve_texture_transition(
                out,
                &self.input,
                ResourceLayout::MipmapGen,
                ResourceAccess::ReadWrite,
                StageMask::empty(),
                false,
                backend,
            )?;
            exec.solver.resolve_texture_transition(
                out,
                &self.output,
                ResourceLayout::Uav,
                ResourceAccess::Write,
                StageMask::COMPUTE,
                false,
                backend,
            )?;
        } else if self.input.id() != self.output.id() {
            if self.output.mip_level_count() > 1 {
                exec.solver.resolve_texture_transition(
                    out,
                    &self.input,
                    ResourceLayout::MipmapGen,
                    ResourceAccess::ReadWrite,
                    StageMask::empty(),
                    false,
                    backend,
                )?;
            }
            exec.solver.resolve_texture_transition(
                out,
                &self.output,
                ResourceLayout::CopyDst,
                ResourceAccess::Write,
                StageMask::empty(),
                false,
                backend,
            )?;
        }
        Ok(())
    }

    pub(crate) fn execute(
        &mut self,
        state: &mut PassState,
        exec: &mut ExecContext,
    ) -> Result<(), CompositorError> {
        // Progressive convolution advances the sample offset each firing.
        if state.definition().num_initial_passes != u32::MAX {
            for job in &self.jobs {
                let mut job = job.lock();
                if let Some(params0) = job.param("params0") {
                    let mut params0: Vec<f32> = params0.to_vec();
                    params0[0] += 1.0;
                    job.set_param("params0", &params0);
                }
            }
        }

        if !state.barriers_handled_externally {
            state.transitions.clear();
            let mut transitions = std::mem::take(&mut state.transitions);
            self.analyze(state, &mut transitions, exec)?;
            state.transitions = transitions;
            state.execute_resource_transitions(exec);
        }

        state.fire_pre(exec);

        if !self.uses_compute() {
            if self.input.id() != self.output.id() {
                if self.output.mip_level_count() > 1 {
                    exec.ctx.backend().generate_mipmaps(&self.input);
                }

                // The analyze above prepared the input for mipmap
                // generation; re-prepare it for copying.
                let mut transitions = Vec::new();
                exec.solver.resolve_texture_transition(
                    &mut transitions,
                    &self.input,
                    ResourceLayout::CopySrc,
                    ResourceAccess::Read,
                    StageMask::empty(),
                    false,
                    exec.ctx.backend().as_ref(),
                )?;
                execute_transitions_now(exec, &transitions);

                for mip in 0..self.output.mip_level_count() {
                    exec.ctx
                        .backend()
                        .copy_texture(&self.input, mip, &self.output, mip);
                }
            }
        } else {
            exec.ctx.backend().end_render_pass();

            exec.ctx.backend().generate_mipmaps(&self.input);

            let mut transitions = Vec::new();
            exec.solver.resolve_texture_transition(
                &mut transitions,
                &self.input,
                ResourceLayout::Texture,
                ResourceAccess::Read,
                StageMask::COMPUTE,
                false,
                exec.ctx.backend().as_ref(),
            )?;
            execute_transitions_now(exec, &transitions);

            for job in &self.jobs {
                exec.ctx.backend().dispatch_compute(&job.lock());
            }
        }
        Ok(())
    }
}

impl Drop for IblSpecularExec {
    fn drop(&mut self) {
        self.destroy_compute_shaders();
    }
}
