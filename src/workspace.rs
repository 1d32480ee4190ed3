//! Compositor workspaces: the top-level execution unit.
//!
//! A workspace owns a set of nodes plus lazily created shadow nodes,
//! resolves the inter-node connection graph into an execution order, and
//! drives the per-frame update.
//!
//! The connection algorithm is a variant of Kahn's topological sort where
//! "in-degree reaches zero" is "all input channels connected": nodes
//! become processable exactly when their last missing input channel is
//! filled. Cycles and dead zones are tolerated as long as every node left
//! over is disabled; an enabled node with dangling inputs makes the whole
//! workspace invalid, with every disconnected channel reported.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use slotmap::SlotMap;

use crate::backend::UavBinding;
use crate::barrier::{BarrierSolver, ResourceStatusMap};
use crate::channel::GlobalChannels;
use crate::context::{CameraHandle, CompositorContext};
use crate::definition::{self, ChannelRoute, ShadowNodeRecalculation, WorkspaceDef};
use crate::error::CompositorError;
use crate::listener::WorkspaceListener;
use crate::name::NameId;
use crate::node::{Node, NodeKey};
use crate::pass::{ExecContext, PassBody, PassCreateArgs, NUM_UAV_SLOTS};
use crate::resources::{Texture, UavBuffer};
use crate::shadow::{ShadowNodeArena, ShadowNodeKey};

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Engine-unique id for naming instantiated resources.
pub(crate) fn next_instance_id() -> u64 {
    NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Optional settings for [`Workspace::new`].
pub struct WorkspaceOptions {
    pub enabled: bool,
    /// Only passes whose execution mask intersects this run.
    pub execution_mask: u8,
    pub viewport_modifier_mask: u8,
    /// Viewport offset (x, y) and scale (z, w) for masked passes.
    pub viewport_modifier: [f32; 4],
    /// Externally supplied buffers, routable via
    /// `WorkspaceDef::connect_external_buffer`.
    pub external_buffers: Vec<Arc<UavBuffer>>,
    /// Layout state seeded into the barrier solver every frame, for
    /// resources persisted frame-to-frame or managed out-of-band.
    pub initial_layouts: ResourceStatusMap,
}

impl Default for WorkspaceOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            execution_mask: 0xFF,
            viewport_modifier_mask: 0,
            viewport_modifier: [0.0, 0.0, 1.0, 1.0],
            external_buffers: Vec::new(),
            initial_layouts: ResourceStatusMap::default(),
        }
    }
}

/// An instantiated workspace.
pub struct Workspace {
    def: Arc<WorkspaceDef>,
    ctx: Arc<CompositorContext>,
    valid: bool,
    enabled: bool,

    nodes: SlotMap<NodeKey, Node>,
    /// Execution order after a successful connect (disabled leftovers at
    /// the tail).
    node_order: Vec<NodeKey>,
    shadow_nodes: ShadowNodeArena,

    globals: GlobalChannels,
    /// Global buffers in definition order, for resize recreation.
    global_buffer_list: Vec<Arc<UavBuffer>>,

    external_targets: Vec<Arc<Texture>>,
    external_buffers: Vec<Arc<UavBuffer>>,

    listeners: Vec<Arc<dyn WorkspaceListener>>,
    solver: BarrierSolver,
    bound_uavs: Vec<Option<UavBinding>>,
    initial_layouts: ResourceStatusMap,

    default_camera: CameraHandle,
    execution_mask: u8,
    viewport_modifier_mask: u8,
    viewport_modifier: [f32; 4],

    current_width: u32,
    current_height: u32,
    barriers_dirty: bool,
}

impl Workspace {
    /// Instantiate a workspace. `external_targets[0]` is the final target
    /// the workspace composites into and the reference for every
    /// resolution-dependent resource.
    pub fn new(
        def: Arc<WorkspaceDef>,
        ctx: Arc<CompositorContext>,
        external_targets: Vec<Arc<Texture>>,
        default_camera: CameraHandle,
        options: WorkspaceOptions,
    ) -> Result<Self, CompositorError> {
        let final_target = external_targets.first().cloned().ok_or_else(|| {
            CompositorError::InvalidParams(format!(
                "workspace '{}' needs at least one external render target",
                def.name_str()
            ))
        })?;

        let suffix = next_instance_id();
        let global_textures = definition::create_textures(
            ctx.backend(),
            def.textures().texture_definitions(),
            suffix,
            &final_target,
        )?;
        let global_buffer_list = definition::create_buffers(
            ctx.backend(),
            def.textures().buffer_definitions(),
            suffix,
            &final_target,
        )?;

        let mut globals = GlobalChannels {
            def: Some(Arc::clone(&def)),
            textures: global_textures,
            buffers: Default::default(),
        };
        for (buf_def, buffer) in def
            .textures()
            .buffer_definitions()
            .iter()
            .zip(&global_buffer_list)
        {
            globals.buffers.insert(buf_def.name(), Arc::clone(buffer));
        }

        let current_width = final_target.width();
        let current_height = final_target.height();

        let mut workspace = Self {
            def,
            ctx,
            valid: false,
            enabled: options.enabled,
            nodes: SlotMap::with_key(),
            node_order: Vec::new(),
            shadow_nodes: ShadowNodeArena::with_key(),
            globals,
            global_buffer_list,
            external_targets,
            external_buffers: options.external_buffers,
            listeners: Vec::new(),
            solver: BarrierSolver::new(),
            bound_uavs: vec![None; NUM_UAV_SLOTS],
            initial_layouts: options.initial_layouts,
            default_camera,
            execution_mask: options.execution_mask,
            viewport_modifier_mask: options.viewport_modifier_mask,
            viewport_modifier: options.viewport_modifier,
            current_width,
            current_height,
            barriers_dirty: true,
        };

        workspace.recreate_all_nodes()?;
        Ok(workspace)
    }

    pub fn definition(&self) -> &Arc<WorkspaceDef> {
        &self.def
    }

    /// Whether the last connection attempt produced a complete graph.
    /// Invalid workspaces refuse to execute.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn final_target(&self) -> &Arc<Texture> {
        &self.external_targets[0]
    }

    pub fn add_listener(&mut self, listener: Arc<dyn WorkspaceListener>) {
        self.listeners.push(listener);
    }

    pub fn remove_listener(&mut self, listener: &Arc<dyn WorkspaceListener>) {
        self.listeners.retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Node lookup by alias name.
    pub fn find_node(&self, name: NameId) -> Option<&Node> {
        self.nodes.values().find(|n| n.name() == name)
    }

    /// Key of the node with the given alias name.
    pub fn find_node_key(&self, name: NameId) -> Option<NodeKey> {
        self.nodes
            .iter()
            .find(|(_, n)| n.name() == name)
            .map(|(k, _)| k)
    }

    /// Execution order as alias names (after a successful connect).
    pub fn execution_order(&self) -> Vec<NameId> {
        self.node_order
            .iter()
            .filter_map(|&k| self.nodes.get(k))
            .map(|n| n.name())
            .collect()
    }

    /// Shadow node lookup by definition name.
    pub fn find_shadow_node(&self, name: NameId) -> Option<&crate::shadow::ShadowNode> {
        self.shadow_nodes.values().find(|sn| sn.name() == name)
    }

    /// The global texture registered under `name`.
    pub fn global_texture(&self, name: NameId) -> Result<Arc<Texture>, CompositorError> {
        self.globals.texture(name).ok_or_else(|| {
            CompositorError::ItemNotFound(format!(
                "global texture '{}' not found in workspace '{}'",
                self.def.textures().name_str(name).unwrap_or("<unknown>"),
                self.def.name_str()
            ))
        })
    }

    /// Enable/disable a node by name. Marks barrier state dirty so the
    /// next frame re-analyzes from scratch.
    pub fn set_node_enabled(&mut self, name: NameId, enabled: bool) -> Result<(), CompositorError> {
        let key = self.find_node_key(name).ok_or_else(|| {
            CompositorError::ItemNotFound(format!("couldn't find node {name:?}"))
        })?;
        let node = &mut self.nodes[key];
        if node.enabled() != enabled {
            node.set_enabled(enabled);
            self.barriers_dirty = true;
        }
        Ok(())
    }

    /// Restart every progressive (N-iterations) pass in the workspace.
    pub fn reset_all_num_passes_left(&mut self) {
        for node in self.nodes.values_mut() {
            node.reset_all_num_passes_left();
        }
    }

    // ========================================================================
    // Graph building
    // ========================================================================

    /// Destroy and re-instantiate every node, then connect the graph.
    pub fn recreate_all_nodes(&mut self) -> Result<(), CompositorError> {
        self.create_all_nodes()?;
        self.connect_all_nodes()
    }

    /// Zero every connection and connect the graph again. Needed after
    /// changing the definition's routes or re-enabling a node.
    pub fn reconnect_all_nodes(&mut self) -> Result<(), CompositorError> {
        self.clear_all_connections()?;
        self.connect_all_nodes()
    }

    fn create_all_nodes(&mut self) -> Result<(), CompositorError> {
        self.destroy_all_nodes();

        let def = Arc::clone(&self.def);
        let final_target = Arc::clone(self.final_target());
        for alias in def.aliased_nodes() {
            let node_def = self.ctx.node_definition(alias.node_def).ok_or_else(|| {
                CompositorError::ItemNotFound(format!(
                    "can't find node definition for alias '{}'; note declaration \
                     order is important",
                    alias.alias_str
                ))
            })?;
            let node = Node::new(
                &self.ctx,
                &alias.alias_str,
                node_def,
                next_instance_id(),
                &final_target,
            )?;
            let key = self.nodes.insert(node);
            self.node_order.push(key);
        }
        Ok(())
    }

    fn destroy_all_nodes(&mut self) {
        self.valid = false;
        // Passes hold references into shadow nodes and textures; drop them
        // before the nodes and shadow nodes they point into.
        for node in self.nodes.values_mut() {
            node.destroy_all_passes();
        }
        self.nodes.clear();
        self.node_order.clear();
        self.shadow_nodes.clear();
    }

    /// Zero out all connections without destroying nodes.
    pub fn clear_all_connections(&mut self) -> Result<(), CompositorError> {
        self.valid = false;
        for node in self.nodes.values_mut() {
            node.notify_cleared()?;
        }
        self.shadow_nodes.clear();
        Ok(())
    }

    /// Resolve the connection graph; see the module docs for the
    /// algorithm. On success the node order becomes the execution order,
    /// passes are created, shadow-node update sharing is resolved and the
    /// workspace becomes valid.
    pub fn connect_all_nodes(&mut self) -> Result<(), CompositorError> {
        // External channels first; they unblock nodes with no internal
        // dependency.
        for route in self.def.external_channel_routes().to_vec() {
            if route.out_channel as usize >= self.external_targets.len() {
                return Err(CompositorError::InvalidParams(format!(
                    "workspace '{}' expects at least {} external inputs but only {} \
                     were provided",
                    self.def.name_str(),
                    route.out_channel + 1,
                    self.external_targets.len()
                )));
            }
            let key = self.require_node_key(route.in_node)?;
            let texture = Arc::clone(&self.external_targets[route.out_channel as usize]);
            self.nodes[key].set_input_texture(route.in_channel as usize, texture)?;
        }
        for route in self.def.external_buffer_channel_routes().to_vec() {
            let buffer = self
                .external_buffers
                .get(route.out_channel as usize)
                .cloned()
                .ok_or_else(|| {
                    CompositorError::InvalidParams(format!(
                        "workspace '{}' expects external buffer #{} but only {} were \
                         provided",
                        self.def.name_str(),
                        route.out_channel,
                        self.external_buffers.len()
                    ))
                })?;
            let key = self.require_node_key(route.in_node)?;
            self.nodes[key].set_input_buffer(route.in_channel as usize, buffer)?;
        }

        // Kahn-style scan: process any node whose inputs are complete,
        // apply its outgoing routes, repeat until a full scan stalls.
        let mut unprocessed = self.node_order.clone();
        let mut processed = Vec::with_capacity(unprocessed.len());

        loop {
            let mut none_processed = true;

            let mut i = 0;
            while i < unprocessed.len() {
                let key = unprocessed[i];
                if self.nodes[key].are_all_inputs_connected() {
                    let node_name = self.nodes[key].name();
                    self.apply_outgoing_routes(key, node_name)?;
                    processed.push(key);
                    unprocessed.remove(i);
                    none_processed = false;
                } else {
                    i += 1;
                }
            }

            if none_processed || unprocessed.is_empty() {
                break;
            }
        }

        let incomplete = unprocessed.iter().any(|&k| self.nodes[k].enabled());
        if incomplete {
            for &key in &unprocessed {
                let node = &self.nodes[key];
                if !node.enabled() {
                    continue;
                }
                log::warn!(
                    "node '{}' has the following channels in a disconnected state; \
                     workspace won't work until they're solved:",
                    node.name_str()
                );
                for (idx, slot) in node.channels().in_textures.iter().enumerate() {
                    if slot.is_none() {
                        log::warn!("    channel #{idx}");
                    }
                }
            }
            self.valid = false;
            return Ok(());
        }

        // Execution order fixed: processed nodes first, then the
        // incomplete-but-disabled leftovers (which get no passes).
        self.node_order.clear();
        self.node_order.extend(processed.iter().copied());

        for &key in &processed {
            let Workspace {
                nodes,
                shadow_nodes,
                globals,
                ctx,
                external_targets,
                default_camera,
                ..
            } = self;
            let mut args = PassCreateArgs {
                ctx: &**ctx,
                shadow_nodes: Some(shadow_nodes),
                globals: &*globals,
                final_target: &external_targets[0],
                default_camera: *default_camera,
                unique_suffix: next_instance_id(),
            };
            nodes[key].create_passes(&mut args)?;
        }

        self.setup_shadow_node_updates();

        self.node_order.extend(unprocessed);
        self.valid = true;
        self.barriers_dirty = true;
        Ok(())
    }

    fn require_node_key(&self, name: NameId) -> Result<NodeKey, CompositorError> {
        self.find_node_key(name).ok_or_else(|| {
            CompositorError::ItemNotFound(format!("couldn't find node with name {name:?}"))
        })
    }

    /// Apply every routing rule whose source is `node_name`.
    fn apply_outgoing_routes(
        &mut self,
        key: NodeKey,
        node_name: NameId,
    ) -> Result<(), CompositorError> {
        let routes: Vec<ChannelRoute> = self
            .def
            .channel_routes()
            .iter()
            .filter(|r| r.out_node == Some(node_name))
            .cloned()
            .collect();
        for route in routes {
            let in_key = self.require_node_key(route.in_node)?;
            let texture = self.nodes[key].output_texture(route.out_channel as usize)?;
            self.nodes[in_key].set_input_texture(route.in_channel as usize, texture)?;
            self.nodes[key].set_connected_node(route.out_channel as usize, in_key);
        }

        let buffer_routes: Vec<ChannelRoute> = self
            .def
            .buffer_channel_routes()
            .iter()
            .filter(|r| r.out_node == Some(node_name))
            .cloned()
            .collect();
        for route in buffer_routes {
            let in_key = self.require_node_key(route.in_node)?;
            let buffer = self.nodes[key].output_buffer(route.out_channel as usize)?;
            self.nodes[in_key].set_input_buffer(route.in_channel as usize, buffer)?;
            self.nodes[key].set_connected_buffer_node(route.out_channel as usize, in_key);
        }
        Ok(())
    }

    /// Resolve which passes actually update each shadow node, now that
    /// the execution order is fixed.
    ///
    /// `FirstOnly` recalculation assumes pass execution order matches
    /// camera-usage order; a shadow node reused for two different cameras
    /// is a detectable performance bug, reported (in debug builds) as a
    /// non-fatal warning.
    fn setup_shadow_node_updates(&mut self) {
        let shadow_keys: Vec<ShadowNodeKey> = self.shadow_nodes.keys().collect();
        for shadow_key in shadow_keys {
            let mut last_camera: Option<CameraHandle> = None;
            #[cfg(debug_assertions)]
            let mut used_cameras: Vec<CameraHandle> = Vec::new();

            for &node_key in &self.node_order {
                #[cfg_attr(not(debug_assertions), allow(unused_variables))]
                let node_name = self.nodes[node_key].name_str().to_string();
                for pass in self.nodes[node_key].passes_mut() {
                    match pass.body_mut() {
                        PassBody::Shadows(body) => {
                            let camera = body.camera();
                            let references_node =
                                body.entries().iter().any(|e| e.key == shadow_key);
                            if !references_node {
                                continue;
                            }
                            if body.recalculation() != ShadowNodeRecalculation::Reuse {
                                for entry in body.entries_mut() {
                                    if entry.key == shadow_key {
                                        entry.update = true;
                                    }
                                }
                                last_camera = Some(camera);
                                #[cfg(debug_assertions)]
                                {
                                    if !used_cameras.contains(&camera) {
                                        used_cameras.push(camera);
                                    }
                                }
                            }
                        }
                        PassBody::Scene(body) => {
                            if body.shadow_node() != Some(shadow_key) {
                                continue;
                            }
                            let camera = body.camera();
                            match body.recalculation() {
                                ShadowNodeRecalculation::Recalculate => {
                                    last_camera = Some(camera);
                                    #[cfg(debug_assertions)]
                                    {
                                        if !used_cameras.contains(&camera) {
                                            used_cameras.push(camera);
                                        }
                                    }
                                }
                                ShadowNodeRecalculation::FirstOnly => {
                                    if last_camera != Some(camera) {
                                        // First pass, or the camera changed:
                                        // this pass recalculates.
                                        body.set_update_shadow_node(true);
                                        last_camera = Some(camera);
                                        #[cfg(debug_assertions)]
                                        {
                                            if used_cameras.contains(&camera) {
                                                log::warn!(
                                                    "performance warning: shadow node used \
                                                     by node '{node_name}' is forced to \
                                                     recalculate twice (or more) for the \
                                                     same camera; consider cloning the \
                                                     shadow node for the pass with a \
                                                     different camera"
                                                );
                                            } else {
                                                used_cameras.push(camera);
                                            }
                                        }
                                    } else {
                                        body.set_update_shadow_node(false);
                                    }
                                }
                                ShadowNodeRecalculation::Reuse => {}
                            }
                        }
                        PassBody::WarmUp(body) => {
                            if body.shadow_node() != Some(shadow_key) {
                                continue;
                            }
                            let camera = body.camera();
                            match body.recalculation() {
                                ShadowNodeRecalculation::Recalculate => {
                                    last_camera = Some(camera);
                                    #[cfg(debug_assertions)]
                                    {
                                        if !used_cameras.contains(&camera) {
                                            used_cameras.push(camera);
                                        }
                                    }
                                }
                                ShadowNodeRecalculation::FirstOnly => {
                                    if last_camera != Some(camera) {
                                        body.set_update_shadow_node(true);
                                        last_camera = Some(camera);
                                        #[cfg(debug_assertions)]
                                        {
                                            if !used_cameras.contains(&camera) {
                                                used_cameras.push(camera);
                                            }
                                        }
                                    } else {
                                        body.set_update_shadow_node(false);
                                    }
                                }
                                ShadowNodeRecalculation::Reuse => {}
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    // ========================================================================
    // Frame update
    // ========================================================================

    /// Begin the frame on the backend. Call once per frame before
    /// [`update`], even when several workspaces share the frame.
    ///
    /// [`update`]: Self::update
    pub fn begin_update(&mut self) {
        self.ctx.backend().begin_frame();
    }

    /// End the frame on the backend.
    pub fn end_update(&mut self) {
        self.ctx.backend().end_frame();
    }

    /// Walk every enabled node in execution order, each node walking its
    /// passes in declaration order. A frame either runs the full pass
    /// sequence or — when the workspace is invalid — nothing at all.
    pub fn update(&mut self) -> Result<(), CompositorError> {
        if !self.enabled {
            return Ok(());
        }
        if !self.valid {
            log::debug!(
                "workspace '{}' is invalid; skipping frame",
                self.def.name_str()
            );
            return Ok(());
        }

        for listener in &self.listeners {
            listener.workspace_pre_update(self);
        }

        // Resize detection: the final target changed resolution, so every
        // resolution-dependent resource must be rebuilt.
        let (width, height) = (self.final_target().width(), self.final_target().height());
        if width != self.current_width || height != self.current_height {
            self.current_width = width;
            self.current_height = height;
            self.handle_final_target_resize()?;
        }

        if self.barriers_dirty {
            self.solver.reset();
            self.barriers_dirty = false;
        }
        self.solver.assume_transitions(&self.initial_layouts);

        let mut became_invalid = false;
        let order = self.node_order.clone();
        for key in order {
            let Workspace {
                nodes,
                shadow_nodes,
                globals,
                ctx,
                solver,
                bound_uavs,
                listeners,
                default_camera,
                execution_mask,
                viewport_modifier_mask,
                viewport_modifier,
                ..
            } = &mut *self;

            let Some(node) = nodes.get_mut(key) else {
                continue;
            };
            if !node.enabled() {
                continue;
            }
            if !node.are_all_inputs_connected() {
                // The node was ignored by the completeness check while
                // disabled, then re-enabled without reconnecting.
                log::error!(
                    "invalid node '{}' was re-enabled without calling \
                     clear_all_connections / reconnect_all_nodes",
                    node.name_str()
                );
                became_invalid = true;
                continue;
            }

            let mut exec = ExecContext {
                ctx: &**ctx,
                solver,
                listeners: &**listeners,
                globals: &*globals,
                shadow_nodes: Some(shadow_nodes),
                bound_uavs,
                default_camera: *default_camera,
                execution_mask: *execution_mask,
                viewport_modifier_mask: *viewport_modifier_mask,
                viewport_modifier: *viewport_modifier,
            };
            node.update(&mut exec)?;
        }

        if became_invalid {
            self.valid = false;
        }

        for listener in &self.listeners {
            listener.workspace_post_update(self);
        }
        Ok(())
    }

    // ========================================================================
    // Resize handling
    // ========================================================================

    /// Two-phase recreation of every resolution-dependent resource.
    ///
    /// Phase 1 recreates the textures; phase 2 notifies every node and
    /// pass that may hold a stale descriptor — a single missed
    /// notification is a dangling-descriptor bug, which is why the
    /// notification walks *all* nodes and shadow nodes.
    fn handle_final_target_resize(&mut self) -> Result<(), CompositorError> {
        log::debug!(
            "workspace '{}' final target resized to {}x{}; recreating resolution-\
             dependent resources",
            self.def.name_str(),
            self.current_width,
            self.current_height
        );

        let final_target = Arc::clone(self.final_target());

        // Phase 1: recreate. All textures must reach their new size before
        // any pass descriptor is rebuilt, or attachment validation would
        // see mixed resolutions.
        for node in self.nodes.values_mut() {
            node.final_target_resized_phase1(&final_target)?;
        }
        for shadow_node in self.shadow_nodes.values_mut() {
            shadow_node.node_mut().final_target_resized_phase1(&final_target)?;
        }
        definition::recreate_resizable_textures(
            self.def.textures().texture_definitions(),
            &self.globals.textures,
            &final_target,
        )?;
        definition::recreate_resizable_buffers(
            self.def.textures().buffer_definitions(),
            &self.global_buffer_list,
            &final_target,
        )?;

        // Phase 2 part 1: resolution-dependent buffers (now that every
        // texture is at its new size).
        for node in self.nodes.values_mut() {
            node.recreate_resizable_buffers(&final_target)?;
        }
        for shadow_node in self.shadow_nodes.values_mut() {
            shadow_node
                .node_mut()
                .recreate_resizable_buffers(&final_target)?;
        }

        // Phase 2 part 2: notify. Everything that might cache a stale
        // descriptor — every node, every shadow node, every pass — hears
        // about every recreated texture, including the final target itself.
        // A missed notification is a dangling-descriptor bug, so this walk
        // is deliberately exhaustive rather than clever.
        let mut recreated: Vec<Arc<Texture>> = vec![Arc::clone(&final_target)];
        for node in self.nodes.values() {
            recreated.extend(
                node.definition()
                    .textures()
                    .texture_definitions()
                    .iter()
                    .zip(node.local_textures())
                    .filter(|(def, _)| def.is_resolution_dependent())
                    .map(|(_, tex)| Arc::clone(tex)),
            );
        }
        recreated.extend(
            self.def
                .textures()
                .texture_definitions()
                .iter()
                .zip(&self.globals.textures)
                .filter(|(def, _)| def.is_resolution_dependent())
                .map(|(_, tex)| Arc::clone(tex)),
        );

        let node_keys: Vec<NodeKey> = self.nodes.keys().collect();
        for texture in &recreated {
            for &key in &node_keys {
                let Workspace {
                    nodes,
                    shadow_nodes,
                    globals,
                    ctx,
                    external_targets,
                    default_camera,
                    ..
                } = &mut *self;
                let mut args = PassCreateArgs {
                    ctx: &**ctx,
                    shadow_nodes: Some(shadow_nodes),
                    globals: &*globals,
                    final_target: &external_targets[0],
                    default_camera: *default_camera,
                    unique_suffix: next_instance_id(),
                };
                if let Some(node) = nodes.get_mut(key) {
                    node.notify_recreated_texture(texture, &mut args)?;
                }
            }

            let Workspace {
                shadow_nodes,
                globals,
                ctx,
                external_targets,
                default_camera,
                ..
            } = &mut *self;
            for shadow_node in shadow_nodes.values_mut() {
                let mut args = PassCreateArgs {
                    ctx: &**ctx,
                    shadow_nodes: None,
                    globals: &*globals,
                    final_target: &external_targets[0],
                    default_camera: *default_camera,
                    unique_suffix: next_instance_id(),
                };
                shadow_node
                    .node_mut()
                    .notify_recreated_texture(texture, &mut args)?;
            }
        }

        // Everything rebuilt; analyze barriers from a clean slate.
        self.barriers_dirty = true;
        Ok(())
    }

    // ========================================================================
    // Invalidation cascade
    // ========================================================================

    /// Propagate "this texture is gone" from `start` through every
    /// downstream node that received it over a channel, clearing every
    /// matching input/output slot and pass reference along the way. The
    /// workspace becomes invalid until reconnected.
    pub fn propagate_texture_destroyed(&mut self, start: NodeKey, texture: &Arc<Texture>) {
        self.valid = false;
        let mut worklist = vec![start];
        while let Some(key) = worklist.pop() {
            if let Some(node) = self.nodes.get_mut(key) {
                worklist.extend(node.notify_destroyed_texture(texture));
            }
        }
    }

    /// Buffer version of [`propagate_texture_destroyed`].
    ///
    /// [`propagate_texture_destroyed`]: Self::propagate_texture_destroyed
    pub fn propagate_buffer_destroyed(&mut self, start: NodeKey, buffer: &Arc<UavBuffer>) {
        self.valid = false;
        let mut worklist = vec![start];
        while let Some(key) = worklist.pop() {
            if let Some(node) = self.nodes.get_mut(key) {
                worklist.extend(node.notify_destroyed_buffer(buffer));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_ids_unique() {
        let a = next_instance_id();
        let b = next_instance_id();
        assert_ne!(a, b);
    }
}
