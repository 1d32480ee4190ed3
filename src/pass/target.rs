//! Bound render-target descriptors.
//!
//! An [`RtvDef`] names attachments; at pass-creation time it is resolved
//! against the node's channels into a [`RenderPassDesc`] holding concrete
//! textures, final store actions and clear values. This is the descriptor
//! the backend binds.

use std::sync::Arc;

use crate::channel::ChannelResolver;
use crate::definition::{PassDef, RtvDef, RtvEntry};
use crate::error::CompositorError;
use crate::resources::Texture;
use crate::types::{LoadAction, StoreAction, MAX_COLOUR_TARGETS};

/// A bound colour attachment.
#[derive(Debug, Clone)]
pub struct ColourTarget {
    pub texture: Arc<Texture>,
    pub resolve_texture: Option<Arc<Texture>>,
    pub mip_level: u32,
    pub resolve_mip_level: u32,
    pub slice: u32,
    pub resolve_slice: u32,
    pub all_layers: bool,
    pub load_action: LoadAction,
    pub store_action: StoreAction,
    pub clear_colour: [f32; 4],
}

/// A bound depth attachment.
#[derive(Debug, Clone)]
pub struct DepthTarget {
    pub texture: Arc<Texture>,
    pub load_action: LoadAction,
    pub store_action: StoreAction,
    pub clear_depth: f32,
    pub read_only: bool,
}

/// A bound stencil attachment.
#[derive(Debug, Clone)]
pub struct StencilTarget {
    pub texture: Arc<Texture>,
    pub load_action: LoadAction,
    pub store_action: StoreAction,
    pub clear_stencil: u32,
    pub read_only: bool,
}

/// Concrete render-target state bound by a pass.
#[derive(Debug, Clone, Default)]
pub struct RenderPassDesc {
    pub colour: Vec<ColourTarget>,
    pub depth: Option<DepthTarget>,
    pub stencil: Option<StencilTarget>,
}

impl RenderPassDesc {
    /// First valid attachment texture, used as size/format reference.
    /// Could be colour, depth or stencil.
    pub fn any_target_texture(&self) -> Option<(Arc<Texture>, u32)> {
        if let Some(c) = self.colour.first() {
            return Some((Arc::clone(&c.texture), c.mip_level));
        }
        if let Some(d) = &self.depth {
            return Some((Arc::clone(&d.texture), 0));
        }
        self.stencil.as_ref().map(|s| (Arc::clone(&s.texture), 0))
    }

    /// Whether any attachment carries a stencil aspect.
    pub fn has_stencil_format(&self) -> bool {
        self.stencil.is_some()
            || self
                .depth
                .as_ref()
                .is_some_and(|d| d.texture.format().has_stencil())
    }

    /// Whether `texture` appears anywhere in this descriptor.
    pub fn uses_texture(&self, texture: &Texture) -> bool {
        self.colour.iter().any(|c| {
            c.texture.id() == texture.id()
                || c.resolve_texture
                    .as_ref()
                    .is_some_and(|r| r.id() == texture.id())
        }) || self.depth.as_ref().is_some_and(|d| d.texture.id() == texture.id())
            || self
                .stencil
                .as_ref()
                .is_some_and(|s| s.texture.id() == texture.id())
    }
}

fn resolve_colour_entry(
    def: &PassDef,
    entry: &RtvEntry,
    index: usize,
    rt_index: u32,
    resolver: &ChannelResolver,
    allow_resolve_without_resolve_texture: bool,
) -> Result<ColourTarget, CompositorError> {
    let name = entry.texture_name.ok_or_else(|| {
        CompositorError::InvalidParams(format!(
            "colour attachment #{index} of node '{}' has no texture name",
            resolver.node_def().name_str()
        ))
    })?;
    let texture = resolver.texture(name)?;

    let mut store_action = def.store_colour[index];
    let mut resolve_texture = None;

    if texture.is_multisample() {
        let wants_resolve = matches!(
            store_action,
            StoreAction::MultisampleResolve | StoreAction::StoreAndMultisampleResolve
        ) || (store_action == StoreAction::StoreOrResolve
            && (!texture.has_msaa_explicit_resolves() || entry.resolve_texture_name.is_some()));

        if wants_resolve {
            match entry.resolve_texture_name {
                None => {
                    if !allow_resolve_without_resolve_texture {
                        if texture.has_msaa_explicit_resolves() {
                            return Err(CompositorError::InvalidParams(format!(
                                "must specify a resolve texture for RTV when '{}' uses \
                                 explicit resolves and the store action resolves",
                                texture.name()
                            )));
                        }
                        // Implicitly resolved texture: resolves onto itself.
                        resolve_texture = Some(Arc::clone(&texture));
                    }
                }
                Some(resolve_name) => {
                    let resolved = resolver.texture(resolve_name)?;
                    if resolved.is_multisample() {
                        return Err(CompositorError::InvalidParams(format!(
                            "cannot resolve MSAA texture '{}' into another MSAA \
                             texture '{}'",
                            texture.name(),
                            resolved.name()
                        )));
                    }
                    resolve_texture = Some(resolved);
                }
            }
        }
    }

    if store_action == StoreAction::StoreOrResolve {
        store_action = if texture.is_multisample() && resolve_texture.is_some() {
            StoreAction::MultisampleResolve
        } else {
            StoreAction::Store
        };
    }

    // Cube/3D targets select their slice through the target block.
    let (slice, resolve_slice) = if rt_index != 0 {
        (rt_index, rt_index)
    } else {
        (entry.slice, entry.resolve_slice)
    };

    Ok(ColourTarget {
        texture,
        resolve_texture,
        mip_level: entry.mip_level,
        resolve_mip_level: entry.resolve_mip_level,
        slice,
        resolve_slice,
        all_layers: entry.colour_all_layers,
        load_action: def.load_colour[index],
        store_action,
        clear_colour: def.clear_colours[index],
    })
}

/// Resolve `rtv` into a concrete [`RenderPassDesc`] for `def`.
///
/// Runtime-analyzed RTVs (input channels) classify their single attachment
/// as colour vs depth/stencil from the now-known texture format.
pub(crate) fn setup_render_pass_desc(
    def: &PassDef,
    rtv: &RtvDef,
    rt_index: u32,
    resolver: &ChannelResolver,
    allow_resolve_without_resolve_texture: bool,
) -> Result<RenderPassDesc, CompositorError> {
    if rtv.is_runtime_analyzed() {
        let entry = &rtv.colour_attachments[0];
        let name = entry.texture_name.expect("runtime-analyzed RTV has a name");
        let texture = resolver.texture(name)?;

        let mut analyzed = RtvDef::default();
        if texture.format().is_depth() {
            analyzed.depth_attachment = entry.clone();
            if texture.format().has_stencil() {
                analyzed.stencil_attachment = entry.clone();
            }
        } else {
            analyzed.colour_attachments.push(entry.clone());
        }
        return setup_render_pass_desc(
            def,
            &analyzed,
            rt_index,
            resolver,
            allow_resolve_without_resolve_texture,
        );
    }

    if rtv.colour_attachments.len() > MAX_COLOUR_TARGETS {
        return Err(CompositorError::InvalidParams(format!(
            "cannot have more than {MAX_COLOUR_TARGETS} colour attachments for RTV in '{}'",
            resolver.node_def().name_str()
        )));
    }

    let mut desc = RenderPassDesc::default();

    for (i, entry) in rtv.colour_attachments.iter().enumerate() {
        desc.colour.push(resolve_colour_entry(
            def,
            entry,
            i,
            rt_index,
            resolver,
            allow_resolve_without_resolve_texture,
        )?);
    }

    if let Some(depth_name) = rtv.depth_attachment.texture_name {
        let texture = resolver.texture(depth_name)?;
        desc.depth = Some(DepthTarget {
            texture,
            load_action: def.load_depth,
            store_action: def.store_depth,
            clear_depth: def.clear_depth,
            read_only: rtv.depth_read_only || def.read_only_depth,
        });
    }

    // Stencil: explicit attachment wins, otherwise piggyback on a
    // depth-stencil format depth attachment.
    let stencil_texture = if let Some(stencil_name) = rtv.stencil_attachment.texture_name {
        let texture = resolver.texture(stencil_name)?;
        texture.format().has_stencil().then_some(texture)
    } else {
        desc.depth
            .as_ref()
            .filter(|d| d.texture.format().has_stencil())
            .map(|d| Arc::clone(&d.texture))
    };

    if let Some(texture) = stencil_texture {
        desc.stencil = Some(StencilTarget {
            texture,
            load_action: def.load_stencil,
            store_action: def.store_stencil,
            clear_stencil: def.clear_stencil,
            read_only: rtv.stencil_read_only || def.read_only_stencil,
        });
    }

    Ok(desc)
}
