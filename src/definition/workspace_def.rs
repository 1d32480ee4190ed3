//! Workspace definitions: node aliases and the channel routing table.

use crate::error::CompositorError;
use crate::name::NameId;

use super::texture_def::{ChannelSource, TextureDefSet};

/// One routing rule: `out_node`'s output channel feeds `in_node`'s input
/// channel. External routes leave `out_node` as `None` and use
/// `out_channel` as the index into the externally supplied target list.
#[derive(Debug, Clone)]
pub struct ChannelRoute {
    pub out_channel: u32,
    pub out_node: Option<NameId>,
    pub in_channel: u32,
    pub in_node: NameId,
}

/// One node instantiation: the same node definition may appear several
/// times in a workspace under different aliases.
#[derive(Debug, Clone)]
pub struct NodeAlias {
    pub alias: NameId,
    pub alias_str: String,
    pub node_def: NameId,
}

/// Declarative description of a workspace: which nodes it instantiates
/// (by alias), how their channels connect, and the global textures and
/// buffers shared by all of them.
///
/// Aliases allow the same node definition to be instantiated several times
/// in one workspace under different names.
#[derive(Debug)]
pub struct WorkspaceDef {
    name: NameId,
    name_str: String,
    textures: TextureDefSet,
    /// Aliases in declaration order; instantiation order follows this
    /// list.
    aliased_nodes: Vec<NodeAlias>,
    channel_routes: Vec<ChannelRoute>,
    buffer_channel_routes: Vec<ChannelRoute>,
    external_channel_routes: Vec<ChannelRoute>,
    external_buffer_channel_routes: Vec<ChannelRoute>,
}

impl WorkspaceDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: NameId::new(name),
            name_str: name.to_string(),
            textures: TextureDefSet::new(ChannelSource::Global),
            aliased_nodes: Vec::new(),
            channel_routes: Vec::new(),
            buffer_channel_routes: Vec::new(),
            external_channel_routes: Vec::new(),
            external_buffer_channel_routes: Vec::new(),
        }
    }

    pub fn name(&self) -> NameId {
        self.name
    }

    pub fn name_str(&self) -> &str {
        &self.name_str
    }

    /// Global texture/buffer declarations (all names carry the `global_`
    /// prefix).
    pub fn textures(&self) -> &TextureDefSet {
        &self.textures
    }

    pub fn textures_mut(&mut self) -> &mut TextureDefSet {
        &mut self.textures
    }

    /// Instantiate the node definition `node_name` under `alias`.
    ///
    /// An alias equal to an existing node definition name is rejected to
    /// keep lookups unambiguous.
    pub fn add_node_alias(&mut self, alias: &str, node_name: &str) -> Result<(), CompositorError> {
        let alias_id = NameId::new(alias);
        let node_id = NameId::new(node_name);
        if alias_id != node_id && self.aliased_nodes.iter().any(|a| a.alias == node_id) {
            return Err(CompositorError::DuplicateItem(format!(
                "can't use the name of a node definition as alias: '{alias}'"
            )));
        }
        if !self.aliased_nodes.iter().any(|a| a.alias == alias_id) {
            self.aliased_nodes.push(NodeAlias {
                alias: alias_id,
                alias_str: alias.to_string(),
                node_def: node_id,
            });
        }
        Ok(())
    }

    /// Remove an alias and every route referencing it.
    pub fn remove_node_alias(&mut self, alias: &str) {
        let alias_id = NameId::new(alias);
        self.aliased_nodes.retain(|a| a.alias != alias_id);
        self.channel_routes
            .retain(|r| r.out_node != Some(alias_id) && r.in_node != alias_id);
        self.buffer_channel_routes
            .retain(|r| r.out_node != Some(alias_id) && r.in_node != alias_id);
    }

    fn create_implicit_alias(&mut self, node: &str) {
        let id = NameId::new(node);
        if !self.aliased_nodes.iter().any(|a| a.alias == id) {
            self.aliased_nodes.push(NodeAlias {
                alias: id,
                alias_str: node.to_string(),
                node_def: id,
            });
        }
    }

    /// Warn if `in_node`'s input channel already has a route. Connecting
    /// the same input twice is allowed but almost never intended: the
    /// later route wins, and two "copies" end up sharing the same memory.
    fn check_input_channel_is_empty(
        routes: &[ChannelRoute],
        external_routes: &[ChannelRoute],
        in_node: NameId,
        in_channel: u32,
        out_desc: &str,
        out_channel: u32,
    ) {
        for route in routes {
            if route.in_node == in_node && route.in_channel == in_channel {
                log::warn!(
                    "node output (channel #{}) and {} (channel #{}) are both trying to \
                     connect to input channel #{} of node {:?}; only the latter will work",
                    route.out_channel,
                    out_desc,
                    out_channel,
                    in_channel,
                    in_node,
                );
                return;
            }
        }
        for route in external_routes {
            if route.in_node == in_node && route.in_channel == in_channel {
                log::warn!(
                    "an external channel (#{}) and {} (channel #{}) are both trying to \
                     connect to input channel #{} of node {:?}; only the latter will work",
                    route.out_channel,
                    out_desc,
                    out_channel,
                    in_channel,
                    in_node,
                );
                return;
            }
        }
    }

    /// Route `out_node`'s texture output channel into `in_node`'s input
    /// channel. Missing aliases are created implicitly; whether the node
    /// definitions exist is validated at instantiation.
    pub fn connect(
        &mut self,
        out_node: &str,
        out_channel: u32,
        in_node: &str,
        in_channel: u32,
    ) {
        let in_id = NameId::new(in_node);
        Self::check_input_channel_is_empty(
            &self.channel_routes,
            &self.external_channel_routes,
            in_id,
            in_channel,
            out_node,
            out_channel,
        );
        self.create_implicit_alias(out_node);
        self.create_implicit_alias(in_node);
        self.channel_routes.push(ChannelRoute {
            out_channel,
            out_node: Some(NameId::new(out_node)),
            in_channel,
            in_node: in_id,
        });
    }

    /// Route an externally supplied render target (by index into the list
    /// passed at workspace creation) into a node input channel. Index 0 is
    /// the final target.
    pub fn connect_external(&mut self, external_idx: u32, in_node: &str, in_channel: u32) {
        let in_id = NameId::new(in_node);
        Self::check_input_channel_is_empty(
            &self.channel_routes,
            &self.external_channel_routes,
            in_id,
            in_channel,
            "connect_external",
            external_idx,
        );
        self.create_implicit_alias(in_node);
        self.external_channel_routes.push(ChannelRoute {
            out_channel: external_idx,
            out_node: None,
            in_channel,
            in_node: in_id,
        });
    }

    /// Buffer version of [`connect`].
    ///
    /// [`connect`]: Self::connect
    pub fn connect_buffer(
        &mut self,
        out_node: &str,
        out_channel: u32,
        in_node: &str,
        in_channel: u32,
    ) {
        let in_id = NameId::new(in_node);
        Self::check_input_channel_is_empty(
            &self.buffer_channel_routes,
            &self.external_buffer_channel_routes,
            in_id,
            in_channel,
            out_node,
            out_channel,
        );
        self.create_implicit_alias(out_node);
        self.create_implicit_alias(in_node);
        self.buffer_channel_routes.push(ChannelRoute {
            out_channel,
            out_node: Some(NameId::new(out_node)),
            in_channel,
            in_node: in_id,
        });
    }

    /// Buffer version of [`connect_external`].
    ///
    /// [`connect_external`]: Self::connect_external
    pub fn connect_external_buffer(&mut self, external_idx: u32, in_node: &str, in_channel: u32) {
        let in_id = NameId::new(in_node);
        Self::check_input_channel_is_empty(
            &self.buffer_channel_routes,
            &self.external_buffer_channel_routes,
            in_id,
            in_channel,
            "connect_external_buffer",
            external_idx,
        );
        self.create_implicit_alias(in_node);
        self.external_buffer_channel_routes.push(ChannelRoute {
            out_channel: external_idx,
            out_node: None,
            in_channel,
            in_node: in_id,
        });
    }

    /// Drop every node-to-node route (external routes stay).
    pub fn clear_all_inter_node_connections(&mut self) {
        self.channel_routes.clear();
        self.buffer_channel_routes.clear();
    }

    /// Drop every external route.
    pub fn clear_external_connections(&mut self) {
        self.external_channel_routes.clear();
        self.external_buffer_channel_routes.clear();
    }

    /// Drop all routes and aliases.
    pub fn clear_all(&mut self) {
        self.clear_all_inter_node_connections();
        self.clear_external_connections();
        self.aliased_nodes.clear();
    }

    pub fn aliased_nodes(&self) -> &[NodeAlias] {
        &self.aliased_nodes
    }

    pub fn channel_routes(&self) -> &[ChannelRoute] {
        &self.channel_routes
    }

    pub fn buffer_channel_routes(&self) -> &[ChannelRoute] {
        &self.buffer_channel_routes
    }

    pub fn external_channel_routes(&self) -> &[ChannelRoute] {
        &self.external_channel_routes
    }

    pub fn external_buffer_channel_routes(&self) -> &[ChannelRoute] {
        &self.external_buffer_channel_routes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_creates_implicit_aliases() {
        let mut def = WorkspaceDef::new("ws");
        def.connect("a", 0, "b", 0);
        assert_eq!(def.aliased_nodes().len(), 2);
        assert_eq!(def.channel_routes().len(), 1);
    }

    #[test]
    fn test_remove_alias_drops_routes() {
        let mut def = WorkspaceDef::new("ws");
        def.connect("a", 0, "b", 0);
        def.connect("b", 0, "c", 0);
        def.remove_node_alias("b");
        assert!(def.channel_routes().is_empty());
        assert_eq!(def.aliased_nodes().len(), 2);
    }

    #[test]
    fn test_external_route() {
        let mut def = WorkspaceDef::new("ws");
        def.connect_external(0, "final", 0);
        assert_eq!(def.external_channel_routes().len(), 1);
        assert!(def.external_channel_routes()[0].out_node.is_none());
    }
}
