//! Mipmap generation pass.

use std::sync::Arc;

use crate::barrier::{ResourceAccess, ResourceLayout, ResourceTransition, StageMask};
use crate::channel::ChannelResolver;
use crate::context::{ComputeJobHandle, ComputeJobProvider, ComputeTexSlot, ComputeUavSlot};
use crate::definition::{MipmapMethod, PassMipmapDef};
use crate::error::CompositorError;
use crate::resources::Texture;
use crate::types::TextureUsage;

use super::{execute_transitions_now, ExecContext, PassCreateArgs, PassState};

/// Generates the mip chain of the bound textures.
///
/// With hardware support this is a single backend request per texture. The
/// compute fallback is a Gaussian blur chain: one horizontal+vertical
/// dispatch pair per mip level, each level's output feeding the next — a
/// strict producer-consumer chain with one transition between each stage.
pub(crate) struct MipmapExec {
    def: PassMipmapDef,
    textures: Vec<Arc<Texture>>,
    jobs: Vec<ComputeJobHandle>,
    job_names: Vec<String>,
    tmp_textures: Vec<Arc<Texture>>,
    provider: Arc<dyn ComputeJobProvider>,
    warned_no_automipmaps: bool,
}

impl MipmapExec {
    pub(crate) fn new(
        def: PassMipmapDef,
        state: &PassState,
        _resolver: &ChannelResolver,
        args: &mut PassCreateArgs,
    ) -> Result<Self, CompositorError> {
        let mut body = Self {
            def,
            textures: Vec::new(),
            jobs: Vec::new(),
            job_names: Vec::new(),
            tmp_textures: Vec::new(),
            provider: Arc::clone(args.ctx.compute_jobs()),
            warned_no_automipmaps: false,
        };

        body.gather_textures(state)?;

        if matches!(body.def.method, MipmapMethod::Compute | MipmapMethod::ComputeHq) {
            body.setup_compute_shaders(args)?;
        }
        Ok(body)
    }

    pub(crate) fn uses_texture(&self, texture: &Texture) -> bool {
        self.textures.iter().any(|t| t.id() == texture.id())
    }

    fn gather_textures(&mut self, state: &PassState) -> Result<(), CompositorError> {
        self.textures.clear();
        let Some(rpd) = state.render_pass_desc() else {
            return Ok(());
        };

        for colour in &rpd.colour {
            if let Some(resolve) = &colour.resolve_texture {
                self.textures.push(Arc::clone(resolve));
            } else {
                if colour.texture.is_multisample() {
                    return Err(CompositorError::InvalidParams(format!(
                        "cannot generate mipmaps for MSAA texture '{}'",
                        colour.texture.name()
                    )));
                }
                if !colour.texture.is_texture() {
                    return Err(CompositorError::InvalidParams(format!(
                        "mipmap passes need textures that can be interpreted both as \
                         textures and as UAVs; '{}' cannot be sampled",
                        colour.texture.name()
                    )));
                }
                self.textures.push(Arc::clone(&colour.texture));
            }
        }
        Ok(())
    }

    fn destroy_compute_shaders(&mut self) {
        for name in self.job_names.drain(..) {
            self.provider.destroy_job(&name);
        }
        self.jobs.clear();
        self.tmp_textures.clear();
    }

    fn setup_compute_shaders(&mut self, args: &mut PassCreateArgs) -> Result<(), CompositorError> {
        self.destroy_compute_shaders();

        let provider = args.ctx.compute_jobs();
        let blur_h = provider.find_job("Mipmap/GaussianBlurH");
        let blur_v = provider.find_job("Mipmap/GaussianBlurV");
        if blur_h.is_none() || blur_v.is_none() {
            return Err(CompositorError::InvalidParams(
                "to generate mipmaps with compute shaders the Mipmap/GaussianBlurH and \
                 Mipmap/GaussianBlurV jobs must be registered"
                    .to_string(),
            ));
        }

        if !args.ctx.backend().caps().compute {
            log::info!("compute shaders not supported; using fallback mipmap generation");
            return Ok(());
        }

        let (blur_h, blur_v) = (blur_h.unwrap(), blur_v.unwrap());
        set_gaussian_filter_params(
            &blur_h,
            self.def.kernel_radius,
            self.def.gaussian_deviation_factor,
        );
        set_gaussian_filter_params(
            &blur_v,
            self.def.kernel_radius,
            self.def.gaussian_deviation_factor,
        );

        for texture in &self.textures {
            let num_mips = texture.mip_level_count();
            if num_mips <= 1 {
                continue;
            }
            if !texture.is_uav() || !texture.is_texture() {
                return Err(CompositorError::InvalidParams(format!(
                    "texture '{}' must be flagged as UAV and texture to generate \
                     mipmaps with compute shaders",
                    texture.name()
                )));
            }

            // Intermediate target for the horizontal blur, at half width.
            let mut tmp_desc = texture.descriptor();
            tmp_desc.label = format!("{}/mipmap_tmp/{}", texture.name(), args.unique_suffix);
            tmp_desc.width = (tmp_desc.width >> 1).max(1);
            tmp_desc.usage = TextureUsage::UAV | TextureUsage::DISCARDABLE_CONTENT;
            let tmp = Texture::create(
                Arc::clone(args.ctx.backend()),
                tmp_desc.label.clone(),
                &tmp_desc,
            )?;
            self.tmp_textures.push(Arc::clone(&tmp));

            let mut curr_width = texture.width();
            let mut curr_height = texture.height();

            for mip in 0..num_mips - 1 {
                let name_h = format!(
                    "Mipmap/BlurH/{}/{} mip {}",
                    texture.name(),
                    args.unique_suffix,
                    mip
                );
                let name_v = format!(
                    "Mipmap/BlurV/{}/{} mip {}",
                    texture.name(),
                    args.unique_suffix,
                    mip
                );
                let job_h = self
                    .provider
                    .clone_job("Mipmap/GaussianBlurH", &name_h)
                    .expect("blur job exists");
                let job_v = self
                    .provider
                    .clone_job("Mipmap/GaussianBlurV", &name_v)
                    .expect("blur job exists");

                {
                    let mut h = job_h.lock();
                    h.set_param("srcLodIdx", &[mip as f32]);
                    h.set_param(
                        "g_f4OutputSize",
                        &[
                            curr_width as f32,
                            curr_height as f32,
                            1.0 / curr_width as f32,
                            1.0 / curr_height as f32,
                        ],
                    );
                    h.set_param("dstLodIdx", &[mip as f32]);
                    h.set_property("width_with_lod", curr_width as i32);
                    h.set_property("height_with_lod", curr_height as i32);

                    let mut tex_slot = ComputeTexSlot::new(Arc::clone(texture));
                    tex_slot.mip_level = mip;
                    h.set_texture(0, Some(tex_slot));
                    h.set_uav_texture(
                        0,
                        Some(ComputeUavSlot {
                            texture: Arc::clone(&tmp),
                            access: ResourceAccess::Write,
                            mip_level: mip,
                            array_index: 0,
                            format: texture.format(),
                        }),
                    );
                }

                curr_width = (curr_width >> 1).max(1);

                {
                    let mut v = job_v.lock();
                    v.set_param("srcLodIdx", &[mip as f32]);
                    v.set_param(
                        "g_f4OutputSize",
                        &[
                            curr_width as f32,
                            curr_height as f32,
                            1.0 / curr_width as f32,
                            1.0 / curr_height as f32,
                        ],
                    );
                    v.set_param("dstLodIdx", &[(mip + 1) as f32]);
                    v.set_property("width_with_lod", curr_width as i32);
                    v.set_property("height_with_lod", curr_height as i32);

                    let mut tex_slot = ComputeTexSlot::new(Arc::clone(&tmp));
                    tex_slot.mip_level = mip;
                    v.set_texture(0, Some(tex_slot));
                    v.set_uav_texture(
                        0,
                        Some(ComputeUavSlot {
                            texture: Arc::clone(texture),
                            access: ResourceAccess::Write,
                            mip_level: mip + 1,
                            array_index: 0,
                            format: texture.format(),
                        }),
                    );
                }

                self.jobs.push(job_h);
                self.jobs.push(job_v);
                self.job_names.push(name_h);
                self.job_names.push(name_v);

                curr_height = (curr_height >> 1).max(1);
            }
        }

        Ok(())
    }

    /// Rebuild cached textures and the blur chain after a target texture
    /// was recreated (sizes and weights depend on the texture).
    pub(crate) fn rebuild(
        &mut self,
        state: &PassState,
        _resolver: &ChannelResolver,
        args: &mut PassCreateArgs,
    ) -> Result<(), CompositorError> {
        self.warned_no_automipmaps = false;
        self.gather_textures(state)?;
        if matches!(self.def.method, MipmapMethod::Compute | MipmapMethod::ComputeHq) {
            self.setup_compute_shaders(args)?;
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
        let uses_compute = !self.jobs.is_empty();

        for texture in &self.textures {
            if texture.mip_level_count() <= 1 {
                continue;
            }
            if uses_compute {
                exec.solver.resolve_texture_transition(
                    out,
                    texture,
                    ResourceLayout::Uav,
                    ResourceAccess::ReadWrite,
                    StageMask::COMPUTE,
                    false,
                    backend,
                )?;
            } else if texture.allows_automipmaps() {
                exec.solver.resolve_texture_transition(
                    out,
                    texture,
                    ResourceLayout::MipmapGen,
                    ResourceAccess::ReadWrite,
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

        if self.jobs.is_empty() {
            for texture in &self.textures {
                if texture.mip_level_count() <= 1 {
                    continue;
                }
                if texture.allows_automipmaps() {
                    exec.ctx.backend().generate_mipmaps(texture);
                } else if !self.warned_no_automipmaps {
                    log::warn!(
                        "mipmap generation requested for texture '{}' but it was not \
                         created with ALLOW_AUTOMIPMAPS",
                        texture.name()
                    );
                    self.warned_no_automipmaps = true;
                }
            }
        } else {
            exec.ctx.backend().end_render_pass();

            // Producer-consumer chain: each dispatch waits on the previous
            // level's output.
            for job in &self.jobs {
                let mut transitions = Vec::new();
                {
                    let job = job.lock();
                    let backend = exec.ctx.backend().as_ref();
                    for slot in job.textures().iter().flatten() {
                        exec.solver.resolve_texture_transition(
                            &mut transitions,
                            &slot.texture,
                            ResourceLayout::Texture,
                            ResourceAccess::Read,
                            StageMask::COMPUTE,
                            false,
                            backend,
                        )?;
                    }
                    for slot in job.uavs().iter().flatten() {
                        exec.solver.resolve_texture_transition(
                            &mut transitions,
                            &slot.texture,
                            ResourceLayout::Uav,
                            slot.access,
                            StageMask::COMPUTE,
                            false,
                            backend,
                        )?;
                    }
                }
                execute_transitions_now(exec, &transitions);
                exec.ctx.backend().dispatch_compute(&job.lock());
            }
        }
        Ok(())
    }
}

impl Drop for MipmapExec {
    fn drop(&mut self) {
        self.destroy_compute_shaders();
    }
}

/// Upload the normalized Gaussian kernel weights into a blur job's
/// `c_weights[...]` constants, four floats per parameter.
fn set_gaussian_filter_params(job: &ComputeJobHandle, kernel_radius: u8, deviation_factor: f32) {
    debug_assert!(kernel_radius & 0x01 == 0, "kernel radius must be even");

    let radius = kernel_radius as usize;
    let f_radius = kernel_radius as f32;
    let deviation = f_radius * deviation_factor;

    let mut weights = vec![0.0f32; radius + 1];
    let mut weight_sum = 0.0f32;
    for (i, weight) in weights.iter_mut().enumerate() {
        let val = i as f32 - f_radius;
        let mut w = 1.0 / (2.0 * std::f32::consts::PI * deviation * deviation).sqrt();
        w *= (-(val * val) / (2.0 * deviation * deviation)).exp();
        weight_sum += w;
        *weight = w;
    }

    // The kernel is symmetric; the centre tap must only count once.
    weight_sum = weight_sum * 2.0 - weights[radius];
    for weight in &mut weights {
        *weight /= weight_sum;
    }

    let mut job = job.lock();
    if job.property("kernel_radius") != Some(i32::from(kernel_radius)) {
        job.set_property("kernel_radius", i32::from(kernel_radius));
    }
    job.remove_params_with_prefix("c_weights[");
    for (param_idx, chunk) in weights.chunks(4).enumerate() {
        job.set_param(&format!("c_weights[{param_idx}]"), chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ComputeJob;
    use parking_lot::Mutex;

    #[test]
    fn test_gaussian_weights_normalized() {
        let job = Arc::new(Mutex::new(ComputeJob::new("blur")));
        set_gaussian_filter_params(&job, 8, 0.5);

        let job = job.lock();
        assert_eq!(job.property("kernel_radius"), Some(8));

        let mut sum = 0.0f32;
        let mut weights = Vec::new();
        for i in 0..3 {
            if let Some(chunk) = job.param(&format!("c_weights[{i}]")) {
                weights.extend_from_slice(chunk);
            }
        }
        assert_eq!(weights.len(), 9);
        for (i, w) in weights.iter().enumerate() {
            // Mirrored taps count twice, the centre once.
            if i == weights.len() - 1 {
                sum += w;
            } else {
                sum += 2.0 * w;
            }
        }
        assert!((sum - 1.0).abs() < 1e-4, "kernel must be normalized, got {sum}");
    }
}
