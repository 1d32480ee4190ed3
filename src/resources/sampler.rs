//! Interned sampler state blocks.
//!
//! Sampler state is immutable, tiny and shared by many passes, so blocks
//! are deduplicated by value: equal descriptors return the same
//! `Arc<SamplerBlock>`, and each distinct block gets a compact numeric id
//! that stays stable for as long as the cache lives. Backends can use the
//! id to index their own sampler tables.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Texture filtering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Filtering {
    Point,
    #[default]
    Bilinear,
    Trilinear,
    Anisotropic,
}

/// Texture addressing mode (all three axes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    #[default]
    Wrap,
    Mirror,
    Clamp,
    Border,
}

/// Value description of a sampler block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SamplerDescriptor {
    pub filtering: Filtering,
    pub address_mode: AddressMode,
    /// Max anisotropy; only meaningful with `Filtering::Anisotropic`.
    pub max_anisotropy: u8,
}

impl SamplerDescriptor {
    /// 16x anisotropic, wrapped — the convolution passes' sampler.
    pub fn anisotropic_wrap() -> Self {
        Self {
            filtering: Filtering::Anisotropic,
            address_mode: AddressMode::Wrap,
            max_anisotropy: 16,
        }
    }
}

/// An interned, immutable sampler state block.
#[derive(Debug)]
pub struct SamplerBlock {
    id: u16,
    desc: SamplerDescriptor,
}

impl SamplerBlock {
    /// Compact numeric id, unique per distinct descriptor within a cache.
    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn descriptor(&self) -> &SamplerDescriptor {
        &self.desc
    }
}

/// Content-addressed cache of [`SamplerBlock`]s.
///
/// Read-lock fast path for the common "already interned" case; write lock
/// only on first sight of a new descriptor.
#[derive(Debug, Default)]
pub struct SamplerBlockCache {
    cache: RwLock<FxHashMap<SamplerDescriptor, Arc<SamplerBlock>>>,
}

impl SamplerBlockCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the shared block for `desc`, interning it on first use.
    pub fn get_or_create(&self, desc: SamplerDescriptor) -> Arc<SamplerBlock> {
        if let Some(block) = self.cache.read().get(&desc) {
            return Arc::clone(block);
        }

        let mut cache = self.cache.write();
        let next_id = cache.len() as u16;
        Arc::clone(
            cache
                .entry(desc)
                .or_insert_with(|| Arc::new(SamplerBlock { id: next_id, desc })),
        )
    }

    /// Number of distinct blocks interned so far.
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_descriptors_are_deduplicated() {
        let cache = SamplerBlockCache::new();
        let a = cache.get_or_create(SamplerDescriptor::anisotropic_wrap());
        let b = cache.get_or_create(SamplerDescriptor::anisotropic_wrap());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.id(), b.id());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_distinct_descriptors_get_distinct_ids() {
        let cache = SamplerBlockCache::new();
        let a = cache.get_or_create(SamplerDescriptor::default());
        let b = cache.get_or_create(SamplerDescriptor::anisotropic_wrap());
        assert_ne!(a.id(), b.id());
        assert_eq!(cache.len(), 2);
    }
}
