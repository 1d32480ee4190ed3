//! Compositor node instances.
//!
//! A node is an ordered list of passes sharing a set of input/output
//! texture and buffer channels. All the shared, constant parameters live
//! in the definition ([`NodeDef`]); the instance owns its local resources
//! and the pass objects.
//!
//! Nodes must be connected in dependency order: if the chain is
//! A -> B -> C and B is connected to C before A fed B, C would receive
//! null channels. The workspace solves this by only processing a node once
//! `are_all_inputs_connected` holds — the "ripple" that replaces an
//! explicit topological sort.

use std::sync::Arc;

use slotmap::new_key_type;

use crate::channel::{ChannelResolver, GlobalChannels, NodeChannels};
use crate::context::CompositorContext;
use crate::definition::{self, NodeDef, PassKind};
use crate::error::CompositorError;
use crate::name::NameId;
use crate::pass::{ExecContext, Pass, PassCreateArgs};
use crate::resources::{Texture, UavBuffer};

new_key_type! {
    /// Generation-checked handle to a node within its workspace.
    pub struct NodeKey;
}

/// An instantiated compositor node.
pub struct Node {
    /// Alias name, unique within the workspace.
    name: NameId,
    name_str: String,
    def: Arc<NodeDef>,
    enabled: bool,
    channels: NodeChannels,
    /// Local buffers in definition order (the named map in `channels`
    /// holds the same buffers, plus inputs and globals).
    local_buffers: Vec<Arc<UavBuffer>>,
    passes: Vec<Pass>,
    /// Downstream nodes we feed, one per output channel (texture channels
    /// first, then buffer channels). Used to propagate invalidation.
    connected_nodes: Vec<Option<NodeKey>>,
}

impl Node {
    /// Instantiate a node from its definition, creating local resources.
    pub(crate) fn new(
        ctx: &CompositorContext,
        alias: &str,
        def: Arc<NodeDef>,
        unique_suffix: u64,
        final_target: &Arc<Texture>,
    ) -> Result<Self, CompositorError> {
        let mut channels = NodeChannels {
            in_textures: vec![None; def.num_input_channels()],
            ..Default::default()
        };

        channels.local_textures = definition::create_textures(
            ctx.backend(),
            def.textures().texture_definitions(),
            unique_suffix,
            final_target,
        )?;
        channels.out_textures = vec![None; def.out_channels().len()];

        let local_buffers = definition::create_buffers(
            ctx.backend(),
            def.textures().buffer_definitions(),
            unique_suffix,
            final_target,
        )?;
        for (buf_def, buffer) in def
            .textures()
            .buffer_definitions()
            .iter()
            .zip(&local_buffers)
        {
            channels.buffers.insert(buf_def.name(), Arc::clone(buffer));
        }

        let connected_nodes =
            vec![None; def.out_channels().len() + def.out_buffer_channels().len()];

        let mut node = Self {
            name: NameId::new(alias),
            name_str: alias.to_string(),
            enabled: def.start_enabled(),
            channels,
            local_buffers,
            passes: Vec::new(),
            connected_nodes,
            def,
        };

        // Local textures can be routed right away; outputs fed from input
        // channels stay null until connected.
        node.route_outputs()?;
        Ok(node)
    }

    pub fn name(&self) -> NameId {
        self.name
    }

    pub fn name_str(&self) -> &str {
        &self.name_str
    }

    pub fn definition(&self) -> &Arc<NodeDef> {
        &self.def
    }

    /// Enable or disable this node.
    ///
    /// A disabled node simply doesn't execute its passes, and is exempt
    /// from the connection completeness check — useful for toggling an
    /// effect at runtime without satisfying its wiring. The workspace
    /// marks its barrier state dirty when this changes.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn local_textures(&self) -> &[Arc<Texture>] {
        &self.channels.local_textures
    }

    /// Texture currently connected to input `channel`, if any.
    pub fn input_texture(&self, channel: usize) -> Option<Arc<Texture>> {
        self.channels.in_textures.get(channel)?.clone()
    }

    pub fn local_buffers(&self) -> &[Arc<UavBuffer>] {
        &self.local_buffers
    }

    pub(crate) fn channels(&self) -> &NodeChannels {
        &self.channels
    }

    pub(crate) fn passes(&self) -> &[Pass] {
        &self.passes
    }

    pub(crate) fn passes_mut(&mut self) -> &mut [Pass] {
        &mut self.passes
    }

    /// True iff every input texture channel and every input buffer channel
    /// is connected. Passes may only be created once this holds.
    pub fn are_all_inputs_connected(&self) -> bool {
        self.channels.num_connected_inputs == self.channels.in_textures.len()
            && self.channels.num_connected_buffer_inputs
                == self.def.textures().input_buffers().len()
    }

    /// Fill the output channels from the input/local containers according
    /// to the definition's output mapping. Idempotent; call after any
    /// change to the inputs or locals.
    pub(crate) fn route_outputs(&mut self) -> Result<(), CompositorError> {
        for (channel, &name) in self.def.out_channels().iter().enumerate() {
            let (index, source) = self.def.textures().get_texture_source(name)?;
            self.channels.out_textures[channel] = match source {
                definition::ChannelSource::Local => {
                    Some(Arc::clone(&self.channels.local_textures[index]))
                }
                definition::ChannelSource::Input => self.channels.in_textures[index].clone(),
                definition::ChannelSource::Global => {
                    return Err(CompositorError::InvalidParams(format!(
                        "output channel #{channel} of node '{}' maps to a global texture",
                        self.name_str
                    )));
                }
            };
        }
        Ok(())
    }

    // ========================================================================
    // Connection primitives (driven by the workspace)
    // ========================================================================

    /// The texture flowing out of `channel`. Errors if the node was
    /// connected in the wrong order (outputs not routed yet).
    pub(crate) fn output_texture(&self, channel: usize) -> Result<Arc<Texture>, CompositorError> {
        let slot = self.channels.out_textures.get(channel).ok_or_else(|| {
            CompositorError::InvalidParams(format!(
                "there is no output channel #{channel} for node '{}'",
                self.name_str
            ))
        })?;
        slot.clone().ok_or_else(|| {
            CompositorError::InvalidState(format!(
                "output channel #{channel} of node '{}' is not routed yet; nodes got \
                 connected in the wrong order",
                self.name_str
            ))
        })
    }

    /// Connect a texture into input `channel` (from an upstream node or an
    /// external injection). Routes the outputs once the last missing input
    /// texture arrives.
    pub(crate) fn set_input_texture(
        &mut self,
        channel: usize,
        texture: Arc<Texture>,
    ) -> Result<(), CompositorError> {
        if channel >= self.channels.in_textures.len() {
            return Err(CompositorError::InvalidParams(format!(
                "there is no input channel #{channel} for node '{}'",
                self.name_str
            )));
        }

        if self.channels.in_textures[channel].is_none() {
            self.channels.num_connected_inputs += 1;
        }
        self.channels.in_textures[channel] = Some(texture);

        if self.channels.num_connected_inputs >= self.channels.in_textures.len() {
            self.route_outputs()?;
        }
        Ok(())
    }

    /// The buffer flowing out of buffer `channel`.
    pub(crate) fn output_buffer(&self, channel: usize) -> Result<Arc<UavBuffer>, CompositorError> {
        let &name = self.def.out_buffer_channels().get(channel).ok_or_else(|| {
            CompositorError::InvalidParams(format!(
                "there is no output buffer channel #{channel} for node '{}'",
                self.name_str
            ))
        })?;
        self.channels.buffers.get(&name).cloned().ok_or_else(|| {
            CompositorError::InvalidState(format!(
                "output buffer channel #{channel} of node '{}' has no buffer; nodes \
                 got connected in the wrong order",
                self.name_str
            ))
        })
    }

    /// Connect a buffer into input buffer `channel`.
    pub(crate) fn set_input_buffer(
        &mut self,
        channel: usize,
        buffer: Arc<UavBuffer>,
    ) -> Result<(), CompositorError> {
        let slot = self
            .def
            .textures()
            .input_buffers()
            .get(channel)
            .ok_or_else(|| {
                CompositorError::InvalidParams(format!(
                    "there is no input buffer channel #{channel} for node '{}'",
                    self.name_str
                ))
            })?;
        let name = slot.ok_or_else(|| {
            CompositorError::InvalidState(format!(
                "input buffer channels must not have gaps; channel #{channel} of node \
                 '{}' is not defined",
                self.name_str
            ))
        })?;

        if self.channels.buffers.contains_key(&name) {
            return Err(CompositorError::InvalidState(format!(
                "buffer '{}' is already defined in node '{}'; connecting its channel \
                 #{channel} twice?",
                self.def.textures().name_str(name).unwrap_or("<unknown>"),
                self.name_str
            )));
        }

        self.channels.buffers.insert(name, buffer);
        self.channels.num_connected_buffer_inputs += 1;
        Ok(())
    }

    /// Record that output channel `out_channel` feeds `downstream`.
    pub(crate) fn set_connected_node(&mut self, out_channel: usize, downstream: NodeKey) {
        self.connected_nodes[out_channel] = Some(downstream);
    }

    /// Record that output buffer channel `out_channel` feeds `downstream`.
    pub(crate) fn set_connected_buffer_node(&mut self, out_channel: usize, downstream: NodeKey) {
        let base = self.def.out_channels().len();
        self.connected_nodes[base + out_channel] = Some(downstream);
    }

    /// Make the workspace's global buffers visible to this node's passes.
    /// Done last so a local or input buffer of the same name occludes the
    /// global (with a warning).
    fn populate_global_buffers(&mut self, globals: &GlobalChannels) {
        for (&name, buffer) in &globals.buffers {
            match self.channels.buffers.get(&name) {
                // Already visible from a previous population.
                Some(existing) if existing.id() == buffer.id() => {}
                Some(_) => log::warn!(
                    "locally defined buffer {name:?} in node '{}' occludes the global \
                     buffer of the same name",
                    self.name_str
                ),
                None => {
                    self.channels.buffers.insert(name, Arc::clone(buffer));
                }
            }
        }
    }

    // ========================================================================
    // Pass management
    // ========================================================================

    /// Create all passes from the definition.
    ///
    /// Must be called only once every input channel is connected: building
    /// passes over null channels would bind undefined memory.
    pub(crate) fn create_passes(&mut self, args: &mut PassCreateArgs) -> Result<(), CompositorError> {
        assert!(
            self.are_all_inputs_connected(),
            "create_passes called on node '{}' with disconnected inputs",
            self.name_str
        );

        self.populate_global_buffers(args.globals);
        self.destroy_all_passes();

        let globals = args.globals;
        let mut passes = Vec::with_capacity(self.def.pass_count());

        for target in self.def.targets() {
            let rtv_name = target.rtv_name();
            let rtv = match rtv_name {
                Some(name) => Some(self.def.textures().rtv(name)?),
                None => None,
            };

            // One consolidated barrier for all of this target's passes,
            // instead of one per pass.
            let barrier_index = if target.target_level_barrier() {
                let barrier_def = Arc::new(crate::definition::PassDef::new(
                    crate::definition::PassKindDef::TargetBarrier,
                ));
                passes.push(Pass::new_target_barrier(barrier_def, target.passes().len()));
                Some(passes.len() - 1)
            } else {
                None
            };

            for pass_def in target.passes() {
                let resolver = ChannelResolver::new(&self.def, &self.channels, globals);
                let mut pass = Pass::create(
                    Arc::new(pass_def.clone()),
                    rtv,
                    rtv_name,
                    target.rt_index(),
                    &resolver,
                    args,
                )?;
                if barrier_index.is_some() {
                    pass.set_barriers_handled_externally(true);
                }
                passes.push(pass);
            }
        }

        self.passes = passes;
        Ok(())
    }

    pub(crate) fn destroy_all_passes(&mut self) {
        self.passes.clear();
    }

    /// Execute all passes in declaration order.
    pub(crate) fn update(&mut self, exec: &mut ExecContext) -> Result<(), CompositorError> {
        let globals: &GlobalChannels = exec.globals;
        let resolver = ChannelResolver::new(&self.def, &self.channels, globals);

        let mut i = 0;
        while i < self.passes.len() {
            let pass_mask = self.passes[i].definition().execution_mask;
            if exec.execution_mask & pass_mask == 0 {
                i += 1;
                continue;
            }

            if self.passes[i].is_target_barrier().is_some() {
                Pass::run_target_barrier(&mut self.passes, i, &resolver, exec)?;
            } else {
                self.passes[i].execute(&resolver, exec)?;
            }
            i += 1;
        }
        Ok(())
    }

    /// Restore the passes-remaining counter of every pass (restarts
    /// progressive effects).
    pub(crate) fn reset_all_num_passes_left(&mut self) {
        for pass in &mut self.passes {
            pass.reset_num_passes_left();
        }
    }

    /// Position of the first pass of the given kind, for diagnostics.
    pub fn first_pass_of_kind(&self, kind: PassKind) -> Option<usize> {
        self.passes.iter().position(|p| p.kind() == kind)
    }

    // ========================================================================
    // Invalidation cascade
    // ========================================================================

    /// A texture this node may reference was destroyed and recreated with
    /// the same identity (resize). Tell the passes so they rebuild their
    /// cached descriptors; returns downstream nodes sharing the channel.
    pub(crate) fn notify_recreated_texture(
        &mut self,
        texture: &Arc<Texture>,
        args: &mut PassCreateArgs,
    ) -> Result<Vec<NodeKey>, CompositorError> {
        let mut downstream = Vec::new();
        for (channel, slot) in self.channels.out_textures.iter().enumerate() {
            if slot.as_ref().is_some_and(|t| t.id() == texture.id()) {
                if let Some(key) = self.connected_nodes[channel] {
                    downstream.push(key);
                }
            }
        }

        let globals = args.globals;
        let (def, channels) = (&self.def, &self.channels);
        let resolver = ChannelResolver::new(def, channels, globals);
        for pass in &mut self.passes {
            pass.notify_recreated(texture, &resolver, args)?;
        }

        Ok(downstream)
    }

    /// A texture is going away entirely. Clears every matching input and
    /// output slot, tells the passes, and returns the downstream nodes
    /// that must be told the same (the caller drives the recursion).
    pub(crate) fn notify_destroyed_texture(&mut self, texture: &Texture) -> Vec<NodeKey> {
        // We can't early-out: the same output may be wired into several
        // input channels.
        for slot in &mut self.channels.in_textures {
            if slot.as_ref().is_some_and(|t| t.id() == texture.id()) {
                *slot = None;
                self.channels.num_connected_inputs -= 1;
            }
        }

        let mut downstream = Vec::new();
        for (channel, slot) in self.channels.out_textures.iter_mut().enumerate() {
            if slot.as_ref().is_some_and(|t| t.id() == texture.id()) {
                if let Some(key) = self.connected_nodes[channel].take() {
                    downstream.push(key);
                }
                *slot = None;
            }
        }

        for pass in &mut self.passes {
            pass.notify_destroyed_texture(texture);
        }

        downstream
    }

    /// Buffer version of [`notify_destroyed_texture`].
    ///
    /// [`notify_destroyed_texture`]: Self::notify_destroyed_texture
    pub(crate) fn notify_destroyed_buffer(&mut self, buffer: &UavBuffer) -> Vec<NodeKey> {
        let mut downstream = Vec::new();

        let names: Vec<NameId> = self
            .channels
            .buffers
            .iter()
            .filter(|(_, b)| b.id() == buffer.id())
            .map(|(&name, _)| name)
            .collect();

        if !names.is_empty() {
            let base = self.def.out_channels().len();
            for (channel, &out_name) in self.def.out_buffer_channels().iter().enumerate() {
                if names.contains(&out_name) {
                    if let Some(key) = self.connected_nodes[base + channel].take() {
                        downstream.push(key);
                    }
                }
            }

            let input_names: Vec<NameId> = self
                .def
                .textures()
                .input_buffers()
                .iter()
                .flatten()
                .copied()
                .collect();
            for name in names {
                self.channels.buffers.remove(&name);
                if input_names.contains(&name) {
                    self.channels.num_connected_buffer_inputs -= 1;
                }
            }
        }

        for pass in &mut self.passes {
            pass.notify_destroyed_buffer(buffer);
        }

        downstream
    }

    /// Zero out every connection. The caller is doing this to all nodes at
    /// once, so downstream nodes are not notified here. Destroys all
    /// passes.
    pub(crate) fn notify_cleared(&mut self) -> Result<(), CompositorError> {
        for slot in &mut self.channels.in_textures {
            *slot = None;
        }
        self.channels.num_connected_inputs = 0;

        // Input-channel buffers (and the globals populated at pass
        // creation) leave the named map; locals stay.
        let local_names: Vec<NameId> = self
            .def
            .textures()
            .buffer_definitions()
            .iter()
            .map(|d| d.name())
            .collect();
        self.channels.buffers.retain(|name, _| local_names.contains(name));
        self.channels.num_connected_buffer_inputs = 0;

        // Clears outputs that came from input channels.
        self.route_outputs()?;

        self.destroy_all_passes();

        for slot in &mut self.connected_nodes {
            *slot = None;
        }
        Ok(())
    }

    // ========================================================================
    // Resize handling
    // ========================================================================

    /// Phase 1: recreate resolution-dependent local textures.
    pub(crate) fn final_target_resized_phase1(
        &mut self,
        final_target: &Arc<Texture>,
    ) -> Result<(), CompositorError> {
        definition::recreate_resizable_textures(
            self.def.textures().texture_definitions(),
            &self.channels.local_textures,
            final_target,
        )?;
        // Output slots hold the same Arcs; re-route to be safe with any
        // future container changes.
        self.route_outputs()
    }

    /// Phase 2 helper: recreate resolution-dependent buffers. Runs after
    /// every texture reached its new size, because attachment validation
    /// needs consistent resolutions across the whole set.
    pub(crate) fn recreate_resizable_buffers(
        &mut self,
        final_target: &Arc<Texture>,
    ) -> Result<(), CompositorError> {
        definition::recreate_resizable_buffers(
            self.def.textures().buffer_definitions(),
            &self.local_buffers,
            final_target,
        )
    }
}
