//! Declarative definitions: value objects describing textures, buffers,
//! passes, nodes and workspaces.
//!
//! Definitions hold no GPU handles and are fully re-instantiable — the same
//! definition can back many simultaneous workspaces. Instantiated objects
//! ([`crate::node::Node`], [`crate::workspace::Workspace`]) keep an `Arc`
//! to their definition and treat it as immutable for their lifetime.

mod node_def;
mod pass_def;
mod texture_def;
mod workspace_def;

pub use node_def::{NodeDef, ShadowNodeDef, TargetDef};
pub use pass_def::{
    ComputeBufferSource, ComputeTextureSource, ComputeUavSource, MipmapMethod, PassClearDef,
    PassComputeDef, PassCustomDef, PassDef, PassDepthCopyDef, PassIblSpecularDef, PassKind,
    PassKindDef, PassMipmapDef, PassQuadDef, PassSceneDef, PassShadowsDef, PassStencilDef,
    PassUavDef, PassWarmUpDef, ShadowNodeRecalculation, StencilParams, UavBufferSource,
    UavDependency, UavTextureSource, WarmUpMode,
};
pub use texture_def::{
    create_buffers, create_textures, recreate_resizable_buffers, recreate_resizable_textures,
    BufferDefinition, ChannelSource, RtvDef, RtvEntry, TextureDefSet, TextureDefinition,
};
pub use workspace_def::{ChannelRoute, NodeAlias, WorkspaceDef};
