//! Node definitions.

use crate::error::CompositorError;
use crate::name::NameId;

use super::pass_def::{PassDef, PassKindDef};
use super::texture_def::{ChannelSource, TextureDefSet};

/// A group of passes rendering into the same RTV.
#[derive(Debug)]
pub struct TargetDef {
    /// RTV name, local to the node. `None` for targetless passes
    /// (e.g. compute).
    rtv_name: Option<NameId>,
    /// Slice index for cubemaps and 3D textures.
    rt_index: u32,
    passes: Vec<PassDef>,
    /// When set, one consolidated barrier batch is emitted for all passes
    /// of this target instead of one batch per pass. Assumes subsequent
    /// passes change each resource at most once (or always to the same
    /// layout).
    target_level_barrier: bool,
    /// Light types this target's shadow map supports (shadow nodes only).
    shadow_map_supported_light_types: u8,
}

impl TargetDef {
    pub(crate) fn new(rtv_name: Option<NameId>, rt_index: u32) -> Self {
        Self {
            rtv_name,
            rt_index,
            passes: Vec::new(),
            target_level_barrier: false,
            shadow_map_supported_light_types: 0,
        }
    }

    pub fn rtv_name(&self) -> Option<NameId> {
        self.rtv_name
    }

    pub fn rt_index(&self) -> u32 {
        self.rt_index
    }

    /// Append a pass; returns it for configuration.
    pub fn add_pass(&mut self, kind_def: PassKindDef) -> &mut PassDef {
        self.passes.push(PassDef::new(kind_def));
        self.passes.last_mut().unwrap()
    }

    pub fn passes(&self) -> &[PassDef] {
        &self.passes
    }

    pub fn passes_mut(&mut self) -> &mut Vec<PassDef> {
        &mut self.passes
    }

    pub fn set_target_level_barrier(&mut self, enabled: bool) {
        self.target_level_barrier = enabled;
    }

    pub fn target_level_barrier(&self) -> bool {
        self.target_level_barrier
    }

    pub fn set_shadow_map_supported_light_types(&mut self, mask: u8) {
        self.shadow_map_supported_light_types = mask;
    }

    pub fn shadow_map_supported_light_types(&self) -> u8 {
        self.shadow_map_supported_light_types
    }
}

/// Declarative description of a node: its channels, local resources and
/// ordered pass list. Instantiated as [`crate::node::Node`].
#[derive(Debug)]
pub struct NodeDef {
    name: NameId,
    name_str: String,
    start_enabled: bool,
    textures: TextureDefSet,
    /// Output channel -> name of an input or local texture.
    out_channels: Vec<NameId>,
    /// Output buffer channel -> name of an input or local buffer.
    out_buffer_channels: Vec<NameId>,
    targets: Vec<TargetDef>,
}

impl NodeDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: NameId::new(name),
            name_str: name.to_string(),
            start_enabled: true,
            textures: TextureDefSet::new(ChannelSource::Local),
            out_channels: Vec::new(),
            out_buffer_channels: Vec::new(),
            targets: Vec::new(),
        }
    }

    pub fn name(&self) -> NameId {
        self.name
    }

    pub fn name_str(&self) -> &str {
        &self.name_str
    }

    pub fn start_enabled(&self) -> bool {
        self.start_enabled
    }

    pub fn set_start_enabled(&mut self, enabled: bool) {
        self.start_enabled = enabled;
    }

    /// The node's texture/buffer/RTV declarations.
    pub fn textures(&self) -> &TextureDefSet {
        &self.textures
    }

    pub fn textures_mut(&mut self) -> &mut TextureDefSet {
        &mut self.textures
    }

    /// Convenience: declare input channel `index` under `name`.
    pub fn add_input(&mut self, index: usize, name: &str) -> Result<NameId, CompositorError> {
        self.textures
            .add_texture_source_name(name, index, ChannelSource::Input)
    }

    pub fn num_input_channels(&self) -> usize {
        self.textures.num_input_channels()
    }

    pub fn num_output_channels(&self) -> usize {
        self.out_channels.len()
    }

    pub fn num_output_buffer_channels(&self) -> usize {
        self.out_buffer_channels.len()
    }

    /// Map output channel `channel` to the texture known as `name`.
    ///
    /// The name must resolve to an input or local texture; globals can be
    /// accessed by every node directly and need no channel.
    pub fn map_output_channel(
        &mut self,
        channel: usize,
        name: NameId,
    ) -> Result<(), CompositorError> {
        let (_, source) = self.textures.get_texture_source(name)?;
        if source == ChannelSource::Global {
            return Err(CompositorError::InvalidParams(format!(
                "global textures can't be mapped to output channels (node '{}')",
                self.name_str
            )));
        }
        if channel >= self.out_channels.len() {
            self.out_channels.resize(channel + 1, NameId::new(""));
        }
        self.out_channels[channel] = name;
        Ok(())
    }

    /// Map output buffer channel `channel` to the buffer known as `name`.
    pub fn map_output_buffer_channel(
        &mut self,
        channel: usize,
        name: NameId,
    ) -> Result<(), CompositorError> {
        let known = self
            .textures
            .buffer_definitions()
            .iter()
            .any(|d| d.name() == name)
            || self.textures.input_buffers().iter().flatten().any(|&n| n == name);
        if !known {
            return Err(CompositorError::ItemNotFound(format!(
                "buffer '{}' is not an input or local buffer of node '{}'",
                self.textures.name_str(name).unwrap_or("<unknown>"),
                self.name_str
            )));
        }
        if channel >= self.out_buffer_channels.len() {
            self.out_buffer_channels.resize(channel + 1, NameId::new(""));
        }
        self.out_buffer_channels[channel] = name;
        Ok(())
    }

    pub fn out_channels(&self) -> &[NameId] {
        &self.out_channels
    }

    pub fn out_buffer_channels(&self) -> &[NameId] {
        &self.out_buffer_channels
    }

    /// Start a new target block rendering into the RTV named `rtv_name`
    /// (pass `None` for targetless passes such as compute).
    pub fn add_target_pass(&mut self, rtv_name: Option<NameId>, rt_index: u32) -> &mut TargetDef {
        self.targets.push(TargetDef::new(rtv_name, rt_index));
        self.targets.last_mut().unwrap()
    }

    pub fn targets(&self) -> &[TargetDef] {
        &self.targets
    }

    pub fn targets_mut(&mut self) -> &mut [TargetDef] {
        &mut self.targets
    }

    /// Total number of pass definitions across all targets.
    pub fn pass_count(&self) -> usize {
        self.targets.iter().map(|t| t.passes().len()).sum()
    }
}

/// Definition of a shadow-map node: a node definition plus the number of
/// shadow maps it renders, used by the workspace's first-only update
/// resolution.
///
/// The inner node definition is authored through [`node_mut`] and frozen
/// once the first shadow node is instantiated from it.
///
/// [`node_mut`]: ShadowNodeDef::node_mut
#[derive(Debug)]
pub struct ShadowNodeDef {
    node: std::sync::Arc<NodeDef>,
    num_shadow_maps: u32,
    /// Bitmask of light types each shadow map supports, indexed by
    /// shadow map.
    light_type_masks: Vec<u8>,
}

impl ShadowNodeDef {
    pub fn new(name: &str) -> Self {
        Self {
            node: std::sync::Arc::new(NodeDef::new(name)),
            num_shadow_maps: 0,
            light_type_masks: Vec::new(),
        }
    }

    pub fn name(&self) -> NameId {
        self.node.name()
    }

    pub fn name_str(&self) -> &str {
        self.node.name_str()
    }

    pub fn node(&self) -> &std::sync::Arc<NodeDef> {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut NodeDef {
        std::sync::Arc::get_mut(&mut self.node)
            .expect("shadow node definition is frozen once instantiated")
    }

    pub fn num_shadow_maps(&self) -> u32 {
        self.num_shadow_maps
    }

    pub fn set_num_shadow_maps(&mut self, count: u32) {
        self.num_shadow_maps = count;
        self.light_type_masks.resize(count as usize, u8::MAX);
    }

    pub fn light_type_mask(&self, shadow_map_idx: u32) -> u8 {
        self.light_type_masks
            .get(shadow_map_idx as usize)
            .copied()
            .unwrap_or(0)
    }

    pub fn set_light_type_mask(&mut self, shadow_map_idx: u32, mask: u8) {
        if let Some(slot) = self.light_type_masks.get_mut(shadow_map_idx as usize) {
            *slot = mask;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::pass_def::PassClearDef;

    #[test]
    fn test_map_output_channel_requires_known_name() {
        let mut def = NodeDef::new("test");
        let err = def.map_output_channel(0, NameId::new("missing"));
        assert!(err.is_err());

        def.add_input(0, "rt_in").unwrap();
        def.map_output_channel(0, NameId::new("rt_in")).unwrap();
        assert_eq!(def.num_output_channels(), 1);
    }

    #[test]
    fn test_pass_count() {
        let mut def = NodeDef::new("test");
        def.textures_mut().add_texture_definition("rt0").unwrap();
        {
            let rtv = def.textures_mut().add_rtv("rt0_rtv").unwrap();
            rtv.colour_attachments
                .push(crate::definition::RtvEntry::new(NameId::new("rt0")));
        }
        let target = def.add_target_pass(Some(NameId::new("rt0_rtv")), 0);
        target.add_pass(PassKindDef::Clear(PassClearDef::default()));
        target.add_pass(PassKindDef::Clear(PassClearDef::default()));
        assert_eq!(def.pass_count(), 2);
    }
}
