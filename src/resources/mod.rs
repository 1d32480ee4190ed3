//! Instantiated GPU resources owned by nodes and workspaces.

mod buffer;
mod sampler;
mod texture;

pub use buffer::UavBuffer;
pub use sampler::{AddressMode, Filtering, SamplerBlock, SamplerBlockCache, SamplerDescriptor};
pub use texture::Texture;

use std::sync::atomic::{AtomicU64, Ordering};

/// Stable identity of a compositor-tracked resource.
///
/// Identity survives destroy-and-recreate cycles (e.g. resolution-dependent
/// textures on resize): the wrapping [`Texture`]/[`UavBuffer`] object keeps
/// its id while swapping backend handles underneath. Everything that caches
/// a resource (barrier solver, passes) keys by this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_resource_id() -> ResourceId {
    ResourceId(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
}
