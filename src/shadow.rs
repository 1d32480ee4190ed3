//! Shadow-map nodes.
//!
//! A shadow node is a node-shaped sub-graph that renders shadow maps. The
//! workspace creates them lazily, the first time a pass references one by
//! name, and reuses the instance across passes when safe (the first-only
//! policy, resolved in `Workspace::setup_shadow_node_updates`).

use std::sync::Arc;

use slotmap::{new_key_type, SlotMap};

use crate::channel::GlobalChannels;
use crate::context::{CameraHandle, CompositorContext};
use crate::definition::ShadowNodeDef;
use crate::error::CompositorError;
use crate::name::NameId;
use crate::node::Node;
use crate::pass::{ExecContext, PassCreateArgs};
use crate::resources::Texture;

new_key_type! {
    /// Generation-checked handle to a shadow node within its workspace.
    pub struct ShadowNodeKey;
}

/// Storage for a workspace's shadow nodes.
pub type ShadowNodeArena = SlotMap<ShadowNodeKey, ShadowNode>;

/// An instantiated shadow node.
pub struct ShadowNode {
    def: Arc<ShadowNodeDef>,
    node: Node,
    /// Camera of the last completed update; the first-only policy and its
    /// performance diagnostic key off this.
    last_update_camera: Option<CameraHandle>,
}

impl ShadowNode {
    pub(crate) fn new(
        ctx: &CompositorContext,
        def: Arc<ShadowNodeDef>,
        globals: &GlobalChannels,
        final_target: &Arc<Texture>,
        default_camera: CameraHandle,
        unique_suffix: u64,
    ) -> Result<Self, CompositorError> {
        let mut node = Node::new(
            ctx,
            def.name_str(),
            Arc::clone(def.node()),
            unique_suffix,
            final_target,
        )?;

        if !node.are_all_inputs_connected() {
            return Err(CompositorError::InvalidState(format!(
                "shadow node '{}' declares input channels; shadow nodes must be \
                 self-contained",
                def.name_str()
            )));
        }

        let mut args = PassCreateArgs {
            ctx,
            shadow_nodes: None,
            globals,
            final_target,
            default_camera,
            unique_suffix,
        };
        node.create_passes(&mut args)?;

        Ok(Self {
            def,
            node,
            last_update_camera: None,
        })
    }

    pub fn name(&self) -> NameId {
        self.def.name()
    }

    pub fn definition(&self) -> &Arc<ShadowNodeDef> {
        &self.def
    }

    pub fn enabled(&self) -> bool {
        self.node.enabled()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.node.set_enabled(enabled);
    }

    /// The shadow map textures (the node's local textures), sampled by
    /// scene passes using this shadow node.
    pub fn shadow_map_textures(&self) -> &[Arc<Texture>] {
        self.node.local_textures()
    }

    pub fn last_update_camera(&self) -> Option<CameraHandle> {
        self.last_update_camera
    }

    /// Recompute the shadow maps for `camera` by running the node's pass
    /// sequence.
    pub(crate) fn update(
        &mut self,
        camera: CameraHandle,
        exec: &mut ExecContext,
    ) -> Result<(), CompositorError> {
        log::trace!(
            "shadow node '{}' updating for camera {:?}",
            self.def.name_str(),
            camera
        );
        self.node.update(exec)?;
        self.last_update_camera = Some(camera);

        for listener in exec.listeners {
            listener.shadow_nodes_updated();
        }
        Ok(())
    }

    /// The node-shaped guts of this shadow node.
    pub fn node(&self) -> &Node {
        &self.node
    }

    pub(crate) fn node_mut(&mut self) -> &mut Node {
        &mut self.node
    }
}

/// Find an existing shadow node by definition name, or instantiate it.
pub(crate) fn find_or_create_shadow_node(
    arena: &mut ShadowNodeArena,
    name: NameId,
    ctx: &CompositorContext,
    globals: &GlobalChannels,
    final_target: &Arc<Texture>,
    default_camera: CameraHandle,
) -> Result<ShadowNodeKey, CompositorError> {
    if let Some((key, _)) = arena.iter().find(|(_, sn)| sn.name() == name) {
        return Ok(key);
    }

    let def = ctx.shadow_node_definition(name).ok_or_else(|| {
        CompositorError::ItemNotFound(format!(
            "shadow node definition {name:?} not registered"
        ))
    })?;
    let unique_suffix = crate::workspace::next_instance_id();
    let shadow_node = ShadowNode::new(ctx, def, globals, final_target, default_camera, unique_suffix)?;
    Ok(arena.insert(shadow_node))
}
