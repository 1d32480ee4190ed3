//! Channel storage and name resolution.
//!
//! A channel is a resolved pointer to a concrete GPU texture or buffer. A
//! node reaches its channels through three containers — input (connected
//! from upstream or injected externally), local (owned by the node) and
//! global (owned by the workspace) — and the [`ChannelResolver`] is the one
//! place that maps a name to the right container.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::definition::{ChannelSource, NodeDef, WorkspaceDef};
use crate::error::CompositorError;
use crate::name::NameId;
use crate::resources::{Texture, UavBuffer};

/// Per-node channel storage.
#[derive(Debug, Default)]
pub struct NodeChannels {
    /// Input texture channels; `None` = not yet connected.
    pub in_textures: Vec<Option<Arc<Texture>>>,
    /// Locally owned textures, indexed like the definition's local defs.
    pub local_textures: Vec<Arc<Texture>>,
    /// Output channels, routed onto inputs or locals by `route_outputs`.
    pub out_textures: Vec<Option<Arc<Texture>>>,
    /// Named buffers visible to this node's passes: locals, connected
    /// inputs, and (populated last) workspace globals.
    pub buffers: FxHashMap<NameId, Arc<UavBuffer>>,
    /// How many of `in_textures` are currently non-`None`.
    pub num_connected_inputs: usize,
    /// How many input buffer channels are currently connected.
    pub num_connected_buffer_inputs: usize,
}

/// Workspace-owned channels shared by all nodes.
#[derive(Default)]
pub struct GlobalChannels {
    /// The workspace definition, for global name -> slot lookups.
    pub def: Option<Arc<WorkspaceDef>>,
    pub textures: Vec<Arc<Texture>>,
    pub buffers: FxHashMap<NameId, Arc<UavBuffer>>,
}

impl GlobalChannels {
    /// Look up a global texture by its (`global_`-prefixed) name.
    pub fn texture(&self, name: NameId) -> Option<Arc<Texture>> {
        let def = self.def.as_ref()?;
        let (index, source) = def.textures().get_texture_source_no_throw(name)?;
        if source != ChannelSource::Global {
            return None;
        }
        self.textures.get(index).cloned()
    }
}

/// Resolves channel names against a node's containers and the workspace
/// globals.
pub struct ChannelResolver<'a> {
    node_def: &'a NodeDef,
    channels: &'a NodeChannels,
    globals: &'a GlobalChannels,
}

impl<'a> ChannelResolver<'a> {
    pub fn new(
        node_def: &'a NodeDef,
        channels: &'a NodeChannels,
        globals: &'a GlobalChannels,
    ) -> Self {
        Self {
            node_def,
            channels,
            globals,
        }
    }

    pub fn node_def(&self) -> &NodeDef {
        self.node_def
    }

    pub fn channels(&self) -> &NodeChannels {
        self.channels
    }

    /// Resolve a texture name registered with the node definition.
    ///
    /// The name may refer to an input channel, a local texture, or a
    /// registered global.
    pub fn texture(&self, name: NameId) -> Result<Arc<Texture>, CompositorError> {
        self.texture_no_throw(name).ok_or_else(|| {
            CompositorError::ItemNotFound(format!(
                "cannot find texture '{}' in node '{}'",
                self.node_def.textures().name_str(name).unwrap_or("<unknown>"),
                self.node_def.name_str()
            ))
        })
    }

    /// Non-throwing variant of [`texture`]; `None` for unregistered names
    /// and unconnected input channels.
    ///
    /// [`texture`]: Self::texture
    pub fn texture_no_throw(&self, name: NameId) -> Option<Arc<Texture>> {
        let (index, source) = self.node_def.textures().get_texture_source_no_throw(name)?;
        match source {
            ChannelSource::Input => self.channels.in_textures.get(index)?.clone(),
            ChannelSource::Local => self.channels.local_textures.get(index).cloned(),
            ChannelSource::Global => self.globals.texture(name),
        }
    }

    /// Resolve a buffer name. Locals and connected inputs occlude globals
    /// of the same name.
    pub fn buffer(&self, name: NameId) -> Result<Arc<UavBuffer>, CompositorError> {
        self.buffer_no_throw(name).ok_or_else(|| {
            CompositorError::ItemNotFound(format!(
                "cannot find UAV buffer '{}' in node '{}'",
                self.node_def.textures().name_str(name).unwrap_or("<unknown>"),
                self.node_def.name_str()
            ))
        })
    }

    /// Non-throwing variant of [`buffer`].
    ///
    /// [`buffer`]: Self::buffer
    pub fn buffer_no_throw(&self, name: NameId) -> Option<Arc<UavBuffer>> {
        self.channels
            .buffers
            .get(&name)
            .or_else(|| self.globals.buffers.get(&name))
            .cloned()
    }
}
