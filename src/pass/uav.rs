//! UAV binding pass.

use crate::backend::UavBinding;
use crate::barrier::{ResourceTransition, TrackedResource};
use crate::channel::ChannelResolver;
use crate::definition::PassUavDef;
use crate::error::CompositorError;

use super::{ExecContext, PassState, NUM_UAV_SLOTS};

/// Binds UAVs into slots for subsequent graphics passes.
///
/// The pass itself performs no transitions: slots are recorded into the
/// frame's bound-UAV table during analysis (so a target-level barrier sees
/// the bindings too), and dependent passes declare `UavDependency` entries
/// that resolve the actual barriers.
pub(crate) struct UavExec {
    def: PassUavDef,
    /// Bindings computed by the last analyze, handed to the backend at
    /// execute.
    bindings: Vec<UavBinding>,
}

impl UavExec {
    pub(crate) fn new(def: PassUavDef) -> Self {
        Self {
            def,
            bindings: Vec::new(),
        }
    }

    pub(crate) fn analyze(
        &mut self,
        _state: &PassState,
        _out: &mut Vec<ResourceTransition>,
        resolver: &ChannelResolver,
        exec: &mut ExecContext,
    ) -> Result<(), CompositorError> {
        self.bindings.clear();

        if !self.def.keep_previous_uavs {
            exec.bound_uavs.iter_mut().for_each(|slot| *slot = None);
        }

        for source in &self.def.texture_sources {
            let slot = self.def.starting_slot + source.slot;
            if slot as usize >= NUM_UAV_SLOTS {
                return Err(CompositorError::InvalidParams(format!(
                    "UAV texture slot {slot} out of range"
                )));
            }
            let texture = resolver.texture(source.name)?;
            if !texture.is_uav() {
                return Err(CompositorError::InvalidParams(format!(
                    "texture '{}' bound as UAV but was not created with UAV usage",
                    texture.name()
                )));
            }
            let binding = UavBinding {
                slot,
                resource: TrackedResource::Texture(texture),
                access: source.access,
                mip_level: source.mip_level,
            };
            exec.bound_uavs[slot as usize] = Some(binding.clone());
            self.bindings.push(binding);
        }

        for source in &self.def.buffer_sources {
            let slot = self.def.starting_slot + source.slot;
            if slot as usize >= NUM_UAV_SLOTS {
                return Err(CompositorError::InvalidParams(format!(
                    "UAV buffer slot {slot} out of range"
                )));
            }
            let buffer = resolver.buffer(source.name)?;
            let binding = UavBinding {
                slot,
                resource: TrackedResource::Buffer(buffer),
                access: source.access,
                mip_level: 0,
            };
            exec.bound_uavs[slot as usize] = Some(binding.clone());
            self.bindings.push(binding);
        }

        Ok(())
    }

    pub(crate) fn execute(
        &mut self,
        state: &mut PassState,
        resolver: &ChannelResolver,
        exec: &mut ExecContext,
    ) -> Result<(), CompositorError> {
        if !state.barriers_handled_externally {
            state.transitions.clear();
            let mut transitions = std::mem::take(&mut state.transitions);
            self.analyze(state, &mut transitions, resolver, exec)?;
            state.transitions = transitions;
            state.execute_resource_transitions(exec);
        }

        state.fire_pre(exec);
        exec.ctx
            .backend()
            .set_uavs(self.def.starting_slot, &self.bindings);
        Ok(())
    }
}
