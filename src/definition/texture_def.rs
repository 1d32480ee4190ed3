//! Texture, buffer and render-target-view declarations.
//!
//! Both node and workspace definitions declare resources the same way, so
//! the shared machinery lives in [`TextureDefSet`]: a name registry mapping
//! each identifier to a slot in one of three containers (input channels,
//! locally defined textures, workspace globals), plus the definitions
//! themselves and the named RTV table.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use static_assertions::const_assert;

use crate::backend::RenderBackend;
use crate::error::CompositorError;
use crate::name::{has_global_prefix, NameId};
use crate::resources::{Texture, UavBuffer};
use crate::types::{
    BufferBindFlags, BufferDescriptor, PixelFormat, TextureDescriptor, TextureKind, TextureUsage,
};

/// Which container a named texture resolves into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ChannelSource {
    /// Supplied by an upstream node connection or external injection.
    Input = 0,
    /// Owned by the defining node.
    Local = 1,
    /// Owned by the enclosing workspace, shared across nodes.
    Global = 2,
}

const NUM_CHANNEL_SOURCES: u32 = 3;

// The registry packs (index, source) into one u32: 30 bits of index,
// 2 bits of source.
const SOURCE_SHIFT: u32 = 30;
const INDEX_MASK: u32 = (1 << SOURCE_SHIFT) - 1;
const_assert!(NUM_CHANNEL_SOURCES <= 1 << 2);

fn encode_source(index: usize, source: ChannelSource) -> u32 {
    assert!(
        index as u32 <= INDEX_MASK,
        "texture source index out of supported range"
    );
    (index as u32 & INDEX_MASK) | ((source as u32) << SOURCE_SHIFT)
}

fn decode_source(encoded: u32) -> (usize, ChannelSource) {
    let source = match encoded >> SOURCE_SHIFT {
        0 => ChannelSource::Input,
        1 => ChannelSource::Local,
        2 => ChannelSource::Global,
        _ => unreachable!("corrupt channel source encoding"),
    };
    ((encoded & INDEX_MASK) as usize, source)
}

/// Declarative description of one compositor texture.
///
/// `width`/`height` of 0 mean "derive from the reference target", scaled by
/// `width_factor`/`height_factor`. `format: Unknown` and `sample_count: 0`
/// inherit from the reference target. `num_mipmaps: 0` generates the full
/// chain.
#[derive(Debug, Clone)]
pub struct TextureDefinition {
    name: NameId,
    name_str: String,
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    pub depth_or_slices: u32,
    pub num_mipmaps: u32,
    pub width_factor: f32,
    pub height_factor: f32,
    pub format: PixelFormat,
    pub sample_count: u32,
    pub flags: TextureUsage,
}

impl TextureDefinition {
    fn new(name: NameId, name_str: String) -> Self {
        Self {
            name,
            name_str,
            kind: TextureKind::D2,
            width: 0,
            height: 0,
            depth_or_slices: 1,
            num_mipmaps: 1,
            width_factor: 1.0,
            height_factor: 1.0,
            format: PixelFormat::Unknown,
            sample_count: 0,
            flags: TextureUsage::default(),
        }
    }

    pub fn name(&self) -> NameId {
        self.name
    }

    pub fn name_str(&self) -> &str {
        &self.name_str
    }

    pub(crate) fn set_name(&mut self, name: NameId, name_str: String) {
        self.name = name;
        self.name_str = name_str;
    }

    /// Whether this texture depends on the reference target's resolution
    /// and must be recreated when that target is resized.
    pub fn is_resolution_dependent(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Resolve this definition into a concrete descriptor against the
    /// reference target.
    pub fn resolve(&self, label: &str, reference: &Texture) -> TextureDescriptor {
        let width = if self.width == 0 {
            (reference.width() as f32 * self.width_factor).ceil() as u32
        } else {
            self.width
        };
        let height = if self.height == 0 {
            (reference.height() as f32 * self.height_factor).ceil() as u32
        } else {
            self.height
        };
        let format = if self.format == PixelFormat::Unknown {
            reference.format()
        } else {
            self.format
        };
        let sample_count = if self.sample_count == 0 {
            reference.sample_count()
        } else {
            self.sample_count
        };
        let mip_level_count = if self.num_mipmaps == 0 {
            PixelFormat::max_mip_count(width, height, self.depth_or_slices)
        } else {
            self.num_mipmaps
        };

        TextureDescriptor {
            label: label.to_string(),
            kind: self.kind,
            width,
            height,
            depth_or_slices: self.depth_or_slices,
            mip_level_count,
            sample_count,
            format,
            usage: self.flags,
        }
    }
}

/// Declarative description of one compositor buffer.
///
/// A `width_factor`/`height_factor` > 0 multiplies the element count by
/// the scaled reference-target dimension, making the buffer
/// resolution-dependent (e.g. one element per screen pixel).
#[derive(Debug, Clone)]
pub struct BufferDefinition {
    name: NameId,
    name_str: String,
    pub num_elements: usize,
    pub bytes_per_element: u32,
    pub bind_flags: BufferBindFlags,
    pub width_factor: f32,
    pub height_factor: f32,
}

impl BufferDefinition {
    pub fn name(&self) -> NameId {
        self.name
    }

    pub fn name_str(&self) -> &str {
        &self.name_str
    }

    pub fn is_resolution_dependent(&self) -> bool {
        self.width_factor > 0.0 || self.height_factor > 0.0
    }

    /// Resolve the final element count against the reference target.
    pub fn resolve(&self, label: &str, reference: &Texture) -> BufferDescriptor {
        let mut num_elements = self.num_elements;
        if self.width_factor > 0.0 {
            num_elements *= (self.width_factor * reference.width() as f32).ceil() as usize;
        }
        if self.height_factor > 0.0 {
            num_elements *= (self.height_factor * reference.height() as f32).ceil() as usize;
        }
        BufferDescriptor {
            label: label.to_string(),
            num_elements,
            bytes_per_element: self.bytes_per_element,
            bind_flags: self.bind_flags,
        }
    }
}

/// One attachment slot of a render-target view.
#[derive(Debug, Clone, Default)]
pub struct RtvEntry {
    pub texture_name: Option<NameId>,
    /// Must be present when the texture resolves explicitly and the store
    /// action asks for a resolve; filled automatically otherwise.
    pub resolve_texture_name: Option<NameId>,
    pub mip_level: u32,
    pub resolve_mip_level: u32,
    pub slice: u32,
    pub resolve_slice: u32,
    pub colour_all_layers: bool,
}

impl RtvEntry {
    pub fn new(texture_name: NameId) -> Self {
        Self {
            texture_name: Some(texture_name),
            ..Default::default()
        }
    }
}

/// A named render-target view: which texture occupies each attachment.
#[derive(Debug, Clone, Default)]
pub struct RtvDef {
    pub colour_attachments: Vec<RtvEntry>,
    pub depth_attachment: RtvEntry,
    pub stencil_attachment: RtvEntry,
    pub depth_read_only: bool,
    pub stencil_read_only: bool,
    /// The attachment is classified (colour vs depth) at pass-build time
    /// from the resolved texture's format. Set automatically for input
    /// channels, whose format is unknown until connection.
    runtime_analyzed: bool,
}

impl RtvDef {
    /// Force runtime analysis of the (single) attachment.
    pub fn set_runtime_analyzed(&mut self, texture_name: NameId) {
        self.colour_attachments = vec![RtvEntry::new(texture_name)];
        self.runtime_analyzed = true;
    }

    pub fn is_runtime_analyzed(&self) -> bool {
        self.runtime_analyzed
    }

    /// Set up the common case: render directly into `texture_name`.
    pub fn set_for_texture(&mut self, texture_name: NameId, def: &TextureDefinition) {
        if def.format.is_depth() {
            self.depth_attachment = RtvEntry::new(texture_name);
            if def.format.has_stencil() {
                self.stencil_attachment = RtvEntry::new(texture_name);
            }
        } else {
            self.colour_attachments.push(RtvEntry::new(texture_name));
        }
    }
}

/// Shared texture/buffer/RTV declaration machinery for node and workspace
/// definitions.
#[derive(Debug)]
pub struct TextureDefSet {
    /// `Local` for node definitions, `Global` for workspace definitions.
    default_local_source: ChannelSource,
    texture_defs: Vec<TextureDefinition>,
    buffer_defs: Vec<BufferDefinition>,
    /// Input buffer channels; `None` marks a declared gap (invalid to
    /// leave unfilled at connection time).
    input_buffers: Vec<Option<NameId>>,
    rtvs: FxHashMap<NameId, RtvDef>,
    name_to_channel: FxHashMap<NameId, u32>,
    /// Friendly names for error messages.
    name_strings: FxHashMap<NameId, String>,
}

impl TextureDefSet {
    pub fn new(default_local_source: ChannelSource) -> Self {
        assert!(
            default_local_source == ChannelSource::Local
                || default_local_source == ChannelSource::Global
        );
        Self {
            default_local_source,
            texture_defs: Vec::new(),
            buffer_defs: Vec::new(),
            input_buffers: Vec::new(),
            rtvs: FxHashMap::default(),
            name_to_channel: FxHashMap::default(),
            name_strings: FxHashMap::default(),
        }
    }

    pub fn default_local_source(&self) -> ChannelSource {
        self.default_local_source
    }

    /// Friendly name for `id`, when this set knows it.
    pub fn name_str(&self, id: NameId) -> Option<&str> {
        self.name_strings.get(&id).map(String::as_str)
    }

    /// Register that `name` resolves to slot `index` of `source`.
    ///
    /// The naming convention enforces scope: only global textures may (and
    /// must) use the `global_` prefix. Registering a name that already
    /// exists with a different resolution is an error.
    pub fn add_texture_source_name(
        &mut self,
        name: &str,
        index: usize,
        source: ChannelSource,
    ) -> Result<NameId, CompositorError> {
        if source == ChannelSource::Local && has_global_prefix(name) {
            return Err(CompositorError::InvalidParams(format!(
                "local textures can't start with the global_ prefix: '{name}'"
            )));
        }
        if source == ChannelSource::Global && !has_global_prefix(name) {
            return Err(CompositorError::InvalidParams(format!(
                "global textures must start with the global_ prefix: '{name}'"
            )));
        }

        let value = encode_source(index, source);
        let id = NameId::new(name);
        if let Some(&existing) = self.name_to_channel.get(&id) {
            if existing != value {
                return Err(CompositorError::DuplicateItem(format!(
                    "texture with the same name '{name}' in the same scope already exists"
                )));
            }
        }

        self.name_to_channel.insert(id, value);
        self.name_strings.insert(id, name.to_string());

        if source == ChannelSource::Input {
            // Input channels get an RTV analyzed at runtime: we don't know
            // yet whether the incoming texture is colour or depth.
            let rtv = self.rtvs.entry(id).or_default();
            rtv.set_runtime_analyzed(id);
        }

        Ok(id)
    }

    /// Look up which container and slot a name resolves to.
    pub fn get_texture_source(&self, name: NameId) -> Result<(usize, ChannelSource), CompositorError> {
        self.name_to_channel
            .get(&name)
            .map(|&v| decode_source(v))
            .ok_or_else(|| {
                CompositorError::ItemNotFound(format!(
                    "can't find texture with name '{}'; if it's a global texture it \
                     must be registered with add_texture_source_name first",
                    self.name_str(name).unwrap_or("<unknown>")
                ))
            })
    }

    /// Non-throwing variant of [`get_texture_source`].
    ///
    /// [`get_texture_source`]: Self::get_texture_source
    pub fn get_texture_source_no_throw(&self, name: NameId) -> Option<(usize, ChannelSource)> {
        self.name_to_channel.get(&name).map(|&v| decode_source(v))
    }

    /// Number of declared input texture channels.
    pub fn num_input_channels(&self) -> usize {
        self.name_to_channel
            .values()
            .filter(|&&v| decode_source(v).1 == ChannelSource::Input)
            .count()
    }

    /// Number of declared (non-gap) input buffer channels.
    pub fn num_input_buffer_channels(&self) -> usize {
        self.input_buffers.iter().filter(|b| b.is_some()).count()
    }

    /// Declare a locally owned texture; returns a mutable reference for
    /// filling in the details.
    pub fn add_texture_definition(
        &mut self,
        name: &str,
    ) -> Result<&mut TextureDefinition, CompositorError> {
        let id =
            self.add_texture_source_name(name, self.texture_defs.len(), self.default_local_source)?;
        self.texture_defs
            .push(TextureDefinition::new(id, name.to_string()));
        Ok(self.texture_defs.last_mut().unwrap())
    }

    /// Remove a texture by name.
    ///
    /// For locally defined textures the definition is removed and the
    /// registry's later indices are shifted down. Output channels that
    /// referenced it become stale and must be re-mapped by the caller.
    pub fn remove_texture(&mut self, name: NameId) -> Result<(), CompositorError> {
        let encoded = self.name_to_channel.remove(&name).ok_or_else(|| {
            CompositorError::ItemNotFound(format!(
                "texture '{}' does not exist",
                self.name_str(name).unwrap_or("<unknown>")
            ))
        })?;
        self.name_strings.remove(&name);

        let (index, source) = decode_source(encoded);
        if source == self.default_local_source {
            self.texture_defs.remove(index);
            for value in self.name_to_channel.values_mut() {
                let (other_index, other_source) = decode_source(*value);
                if other_source == self.default_local_source && other_index > index {
                    *value = encode_source(other_index - 1, other_source);
                }
            }
        }
        Ok(())
    }

    /// Rename a texture. The `global_` prefix cannot be gained or lost.
    pub fn rename_texture(&mut self, old_name: NameId, new_name: &str) -> Result<(), CompositorError> {
        let encoded = *self.name_to_channel.get(&old_name).ok_or_else(|| {
            CompositorError::ItemNotFound(format!(
                "texture '{}' does not exist",
                self.name_str(old_name).unwrap_or("<unknown>")
            ))
        })?;

        let (index, source) = decode_source(encoded);
        let is_global = source == ChannelSource::Global;
        if is_global != has_global_prefix(new_name) {
            return Err(CompositorError::InvalidParams(
                "can't rename a global texture without the global_ prefix, or add \
                 the global_ prefix to a non-global texture"
                    .to_string(),
            ));
        }

        let new_id = NameId::new(new_name);
        if source == self.default_local_source {
            self.texture_defs[index].set_name(new_id, new_name.to_string());
        }
        self.name_to_channel.remove(&old_name);
        self.name_strings.remove(&old_name);
        self.name_to_channel.insert(new_id, encoded);
        self.name_strings.insert(new_id, new_name.to_string());
        Ok(())
    }

    pub fn texture_definitions(&self) -> &[TextureDefinition] {
        &self.texture_defs
    }

    pub fn texture_definitions_mut(&mut self) -> &mut [TextureDefinition] {
        &mut self.texture_defs
    }

    // ========================================================================
    // RTVs
    // ========================================================================

    /// Declare a named render-target view.
    pub fn add_rtv(&mut self, name: &str) -> Result<&mut RtvDef, CompositorError> {
        let id = NameId::new(name);
        if self.rtvs.contains_key(&id) {
            return Err(CompositorError::DuplicateItem(format!(
                "RTV definition with name '{name}' already exists"
            )));
        }
        self.name_strings.insert(id, name.to_string());
        Ok(self.rtvs.entry(id).or_default())
    }

    pub fn rtv(&self, name: NameId) -> Result<&RtvDef, CompositorError> {
        self.rtvs.get(&name).ok_or_else(|| {
            CompositorError::ItemNotFound(format!(
                "could not find RTV with name '{}'",
                self.name_str(name).unwrap_or("<unknown>")
            ))
        })
    }

    pub fn rtv_no_throw(&self, name: NameId) -> Option<&RtvDef> {
        self.rtvs.get(&name)
    }

    pub fn rtv_mut(&mut self, name: NameId) -> Option<&mut RtvDef> {
        self.rtvs.get_mut(&name)
    }

    // ========================================================================
    // Buffers
    // ========================================================================

    /// Name the buffer arriving on input channel `channel`.
    ///
    /// Channels may be mapped out of order but must not leave gaps when
    /// the node is connected.
    pub fn add_buffer_input(&mut self, channel: usize, name: &str) -> Result<(), CompositorError> {
        let id = NameId::new(name);
        if self.buffer_defs.iter().any(|d| d.name() == id)
            || self.input_buffers.iter().flatten().any(|&n| n == id)
        {
            return Err(CompositorError::DuplicateItem(format!(
                "buffer with name '{name}' already defined"
            )));
        }
        if channel >= self.input_buffers.len() {
            self.input_buffers.resize(channel + 1, None);
        }
        self.input_buffers[channel] = Some(id);
        self.name_strings.insert(id, name.to_string());
        Ok(())
    }

    /// Declare a locally owned buffer.
    pub fn add_buffer_definition(
        &mut self,
        name: &str,
        num_elements: usize,
        bytes_per_element: u32,
        bind_flags: BufferBindFlags,
        width_factor: f32,
        height_factor: f32,
    ) -> Result<(), CompositorError> {
        let id = NameId::new(name);
        if self.buffer_defs.iter().any(|d| d.name() == id)
            || self.input_buffers.iter().flatten().any(|&n| n == id)
        {
            return Err(CompositorError::DuplicateItem(format!(
                "buffer with name '{name}' already defined"
            )));
        }
        self.name_strings.insert(id, name.to_string());
        self.buffer_defs.push(BufferDefinition {
            name: id,
            name_str: name.to_string(),
            num_elements,
            bytes_per_element,
            bind_flags,
            width_factor,
            height_factor,
        });
        Ok(())
    }

    pub fn buffer_definitions(&self) -> &[BufferDefinition] {
        &self.buffer_defs
    }

    pub fn input_buffers(&self) -> &[Option<NameId>] {
        &self.input_buffers
    }
}

// ============================================================================
// Instantiation helpers
// ============================================================================

/// Create every texture in `defs`, in order.
///
/// `unique_suffix` disambiguates instances sharing a definition (several
/// workspaces or node aliases instantiated from the same file).
pub fn create_textures(
    backend: &Arc<dyn RenderBackend>,
    defs: &[TextureDefinition],
    unique_suffix: u64,
    reference: &Texture,
) -> Result<Vec<Arc<Texture>>, CompositorError> {
    defs.iter()
        .map(|def| {
            let label = format!("{}/{}", def.name_str(), unique_suffix);
            let desc = def.resolve(&label, reference);
            Texture::create(Arc::clone(backend), label, &desc)
        })
        .collect()
}

/// Phase 1 of resize handling: destroy and recreate only the textures whose
/// resolution depends on the reference target. Phase 2 (notifying nodes and
/// passes holding stale descriptors) is driven by the owning node/workspace
/// once *all* textures are up to date, because attachment validation needs
/// consistent sizes across the whole set.
pub fn recreate_resizable_textures(
    defs: &[TextureDefinition],
    textures: &[Arc<Texture>],
    reference: &Texture,
) -> Result<(), CompositorError> {
    debug_assert_eq!(defs.len(), textures.len());
    for (def, texture) in defs.iter().zip(textures) {
        if def.is_resolution_dependent() {
            let desc = def.resolve(texture.name(), reference);
            texture.recreate(&desc)?;
        }
    }
    Ok(())
}

/// Create every buffer in `defs`, in order.
pub fn create_buffers(
    backend: &Arc<dyn RenderBackend>,
    defs: &[BufferDefinition],
    unique_suffix: u64,
    reference: &Texture,
) -> Result<Vec<Arc<UavBuffer>>, CompositorError> {
    defs.iter()
        .map(|def| {
            let label = format!("{}/{}", def.name_str(), unique_suffix);
            let desc = def.resolve(&label, reference);
            UavBuffer::create(Arc::clone(backend), label, &desc)
        })
        .collect()
}

/// Buffer analogue of [`recreate_resizable_textures`].
pub fn recreate_resizable_buffers(
    defs: &[BufferDefinition],
    buffers: &[Arc<UavBuffer>],
    reference: &Texture,
) -> Result<(), CompositorError> {
    debug_assert_eq!(defs.len(), buffers.len());
    for (def, buffer) in defs.iter().zip(buffers) {
        if def.is_resolution_dependent() {
            let desc = def.resolve(buffer.name(), reference);
            buffer.recreate(&desc)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;

    fn reference_target(backend: &Arc<dyn RenderBackend>) -> Arc<Texture> {
        Texture::create(
            Arc::clone(backend),
            "final_target",
            &TextureDescriptor::new_2d(
                1920,
                1080,
                PixelFormat::Bgra8UnormSrgb,
                TextureUsage::RENDER_TARGET,
            ),
        )
        .unwrap()
    }

    #[test]
    fn test_source_encoding_roundtrip() {
        for source in [ChannelSource::Input, ChannelSource::Local, ChannelSource::Global] {
            let encoded = encode_source(42, source);
            assert_eq!(decode_source(encoded), (42, source));
        }
    }

    #[test]
    fn test_global_prefix_enforced() {
        let mut set = TextureDefSet::new(ChannelSource::Local);
        assert!(set
            .add_texture_source_name("global_oops", 0, ChannelSource::Local)
            .is_err());

        let mut set = TextureDefSet::new(ChannelSource::Global);
        assert!(set
            .add_texture_source_name("not_global", 0, ChannelSource::Global)
            .is_err());
        assert!(set
            .add_texture_source_name("global_ok", 0, ChannelSource::Global)
            .is_ok());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut set = TextureDefSet::new(ChannelSource::Local);
        set.add_texture_source_name("rt0", 0, ChannelSource::Input)
            .unwrap();
        let err = set.add_texture_source_name("rt0", 1, ChannelSource::Input);
        assert!(matches!(err, Err(CompositorError::DuplicateItem(_))));
    }

    #[test]
    fn test_get_texture_source() {
        let mut set = TextureDefSet::new(ChannelSource::Local);
        let id = set
            .add_texture_source_name("rt_scene", 3, ChannelSource::Input)
            .unwrap();
        assert_eq!(set.get_texture_source(id).unwrap(), (3, ChannelSource::Input));
        assert!(set.get_texture_source(NameId::new("missing")).is_err());
        assert!(set.get_texture_source_no_throw(NameId::new("missing")).is_none());
    }

    #[test]
    fn test_input_channel_registers_runtime_rtv() {
        let mut set = TextureDefSet::new(ChannelSource::Local);
        let id = set
            .add_texture_source_name("rt_in", 0, ChannelSource::Input)
            .unwrap();
        assert!(set.rtv(id).unwrap().is_runtime_analyzed());
    }

    #[test]
    fn test_remove_texture_shifts_indices() {
        let mut set = TextureDefSet::new(ChannelSource::Local);
        set.add_texture_definition("a").unwrap();
        set.add_texture_definition("b").unwrap();
        set.add_texture_definition("c").unwrap();

        set.remove_texture(NameId::new("a")).unwrap();
        assert_eq!(
            set.get_texture_source(NameId::new("b")).unwrap(),
            (0, ChannelSource::Local)
        );
        assert_eq!(
            set.get_texture_source(NameId::new("c")).unwrap(),
            (1, ChannelSource::Local)
        );
    }

    #[test]
    fn test_rename_texture_keeps_slot() {
        let mut set = TextureDefSet::new(ChannelSource::Local);
        set.add_texture_definition("old").unwrap();
        set.rename_texture(NameId::new("old"), "new").unwrap();
        assert_eq!(
            set.get_texture_source(NameId::new("new")).unwrap(),
            (0, ChannelSource::Local)
        );
        assert!(set.get_texture_source(NameId::new("old")).is_err());

        // Prefix rules still apply on rename.
        assert!(set
            .rename_texture(NameId::new("new"), "global_new")
            .is_err());
    }

    #[test]
    fn test_resolve_fractional_size_and_inherited_format() {
        let backend: Arc<dyn RenderBackend> = Arc::new(DummyBackend::new());
        let reference = reference_target(&backend);

        let mut set = TextureDefSet::new(ChannelSource::Local);
        {
            let def = set.add_texture_definition("rt_half").unwrap();
            def.width_factor = 0.5;
            def.height_factor = 0.5;
        }
        let def = &set.texture_definitions()[0];
        let desc = def.resolve("rt_half", &reference);
        assert_eq!(desc.width, 960);
        assert_eq!(desc.height, 540);
        assert_eq!(desc.format, PixelFormat::Bgra8UnormSrgb);
        assert!(def.is_resolution_dependent());
    }

    #[test]
    fn test_full_mip_chain_resolution() {
        let backend: Arc<dyn RenderBackend> = Arc::new(DummyBackend::new());
        let reference = reference_target(&backend);

        let mut set = TextureDefSet::new(ChannelSource::Local);
        {
            let def = set.add_texture_definition("rt_mips").unwrap();
            def.width = 256;
            def.height = 256;
            def.num_mipmaps = 0;
        }
        let desc = set.texture_definitions()[0].resolve("rt_mips", &reference);
        assert_eq!(desc.mip_level_count, 9);
    }

    #[test]
    fn test_recreate_only_resolution_dependent() {
        let backend_impl = Arc::new(DummyBackend::new());
        let backend: Arc<dyn RenderBackend> = backend_impl.clone();
        let reference = reference_target(&backend);

        let mut set = TextureDefSet::new(ChannelSource::Local);
        {
            let def = set.add_texture_definition("rt_fixed").unwrap();
            def.width = 128;
            def.height = 128;
        }
        set.add_texture_definition("rt_scaled").unwrap();

        let textures =
            create_textures(&backend, set.texture_definitions(), 1, &reference).unwrap();
        let fixed_handle = textures[0].handle();
        let scaled_handle = textures[1].handle();

        let bigger = Texture::create(
            Arc::clone(&backend),
            "final_target2",
            &TextureDescriptor::new_2d(
                2560,
                1440,
                PixelFormat::Bgra8UnormSrgb,
                TextureUsage::RENDER_TARGET,
            ),
        )
        .unwrap();
        recreate_resizable_textures(set.texture_definitions(), &textures, &bigger).unwrap();

        assert_eq!(textures[0].handle(), fixed_handle, "fixed-size texture untouched");
        assert_ne!(textures[1].handle(), scaled_handle);
        assert_eq!(textures[1].width(), 2560);
    }

    #[test]
    fn test_buffer_element_scaling() {
        let backend: Arc<dyn RenderBackend> = Arc::new(DummyBackend::new());
        let reference = reference_target(&backend);

        let mut set = TextureDefSet::new(ChannelSource::Local);
        set.add_buffer_definition("per_pixel", 1, 16, BufferBindFlags::UAV, 1.0, 1.0)
            .unwrap();
        let desc = set.buffer_definitions()[0].resolve("per_pixel", &reference);
        assert_eq!(desc.num_elements, 1920 * 1080);
    }
}
