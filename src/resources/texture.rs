//! Compositor-owned GPU texture.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::{RenderBackend, TextureHandle};
use crate::barrier::ResourceLayout;
use crate::error::CompositorError;
use crate::types::{PixelFormat, TextureDescriptor, TextureKind, TextureUsage};

use super::{next_resource_id, ResourceId};

#[derive(Debug)]
struct TextureInner {
    handle: TextureHandle,
    desc: TextureDescriptor,
    /// Last layout actually executed on the GPU timeline, as far as the
    /// compositor has been told. The barrier solver's debug consistency
    /// check compares its bookkeeping against this.
    current_layout: ResourceLayout,
}

/// A GPU texture tracked by the compositor.
///
/// `Texture` pairs a backend handle with its resolved descriptor. The
/// object's [`ResourceId`] identity is stable across [`recreate`] cycles,
/// which is what allows resolution-dependent textures to be destroyed and
/// recreated on resize while every cached `Arc<Texture>` stays valid.
///
/// The backend handle is freed on drop.
///
/// [`recreate`]: Texture::recreate
pub struct Texture {
    id: ResourceId,
    name: String,
    backend: Arc<dyn RenderBackend>,
    inner: RwLock<TextureInner>,
}

impl Texture {
    /// Create a texture through the backend.
    ///
    /// A creation failure propagates: a compositor cannot run with missing
    /// render targets.
    pub fn create(
        backend: Arc<dyn RenderBackend>,
        name: impl Into<String>,
        desc: &TextureDescriptor,
    ) -> Result<Arc<Self>, CompositorError> {
        let name = name.into();
        debug_assert!(
            desc.depth_or_slices > 0
                && (desc.depth_or_slices == 1 || desc.kind != TextureKind::D2)
                && (desc.depth_or_slices == 6 || desc.kind != TextureKind::Cube),
            "broken texture descriptor for '{name}'"
        );

        let handle = backend.create_texture(desc)?;
        Ok(Arc::new(Self {
            id: next_resource_id(),
            name,
            backend,
            inner: RwLock::new(TextureInner {
                handle,
                desc: desc.clone(),
                current_layout: ResourceLayout::Undefined,
            }),
        }))
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> TextureHandle {
        self.inner.read().handle
    }

    /// Resolved descriptor (a copy; the texture may be recreated later).
    pub fn descriptor(&self) -> TextureDescriptor {
        self.inner.read().desc.clone()
    }

    pub fn kind(&self) -> TextureKind {
        self.inner.read().desc.kind
    }

    pub fn width(&self) -> u32 {
        self.inner.read().desc.width
    }

    pub fn height(&self) -> u32 {
        self.inner.read().desc.height
    }

    pub fn depth_or_slices(&self) -> u32 {
        self.inner.read().desc.depth_or_slices
    }

    pub fn format(&self) -> PixelFormat {
        self.inner.read().desc.format
    }

    pub fn mip_level_count(&self) -> u32 {
        self.inner.read().desc.mip_level_count
    }

    pub fn sample_count(&self) -> u32 {
        self.inner.read().desc.sample_count
    }

    pub fn usage(&self) -> TextureUsage {
        self.inner.read().desc.usage
    }

    pub fn is_multisample(&self) -> bool {
        self.sample_count() > 1
    }

    pub fn is_uav(&self) -> bool {
        self.usage().contains(TextureUsage::UAV)
    }

    /// Whether the texture can be sampled in shaders.
    pub fn is_texture(&self) -> bool {
        !self.usage().contains(TextureUsage::NOT_TEXTURE)
    }

    pub fn allows_automipmaps(&self) -> bool {
        self.usage().contains(TextureUsage::ALLOW_AUTOMIPMAPS)
    }

    pub fn is_discardable(&self) -> bool {
        self.usage().contains(TextureUsage::DISCARDABLE_CONTENT)
    }

    pub fn has_msaa_explicit_resolves(&self) -> bool {
        self.usage().contains(TextureUsage::MSAA_EXPLICIT_RESOLVE)
    }

    /// The layout the barrier solver assumes on a texture it has never
    /// seen: `Undefined` for discardable content (nothing to preserve),
    /// otherwise whatever the texture is actually in.
    pub fn initial_layout(&self) -> ResourceLayout {
        if self.is_discardable() {
            ResourceLayout::Undefined
        } else {
            self.inner.read().current_layout
        }
    }

    /// Externally observed current layout.
    pub fn current_layout(&self) -> ResourceLayout {
        self.inner.read().current_layout
    }

    /// Record that a transition into `layout` has been executed.
    ///
    /// The compositor calls this as it executes its own transitions.
    /// External code owning the texture (asset upload, presentation)
    /// must call it too when it changes the layout out-of-band, or the
    /// solver's debug consistency check will fire.
    pub fn set_current_layout(&self, layout: ResourceLayout) {
        self.inner.write().current_layout = layout;
    }

    /// Resize the texture, destroying its contents. Meant for externally
    /// owned targets (e.g. the window); compositor-managed textures are
    /// resized through their definitions on workspace resize.
    pub fn resize(&self, width: u32, height: u32) -> Result<(), CompositorError> {
        let mut desc = self.descriptor();
        desc.width = width;
        desc.height = height;
        self.recreate(&desc)
    }

    /// Destroy the backend texture and create a fresh one with `desc`,
    /// keeping this object's identity. Contents are lost and the layout
    /// returns to `Undefined`.
    pub(crate) fn recreate(&self, desc: &TextureDescriptor) -> Result<(), CompositorError> {
        let new_handle = self.backend.create_texture(desc)?;
        let mut inner = self.inner.write();
        self.backend.destroy_texture(inner.handle);
        inner.handle = new_handle;
        inner.desc = desc.clone();
        inner.current_layout = ResourceLayout::Undefined;
        Ok(())
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        let handle = self.inner.read().handle;
        self.backend.destroy_texture(handle);
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("desc", &inner.desc)
            .field("current_layout", &inner.current_layout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;

    #[test]
    fn test_identity_survives_recreate() {
        let backend: Arc<dyn RenderBackend> = Arc::new(DummyBackend::new());
        let desc = TextureDescriptor::new_2d(
            128,
            128,
            PixelFormat::Rgba8Unorm,
            TextureUsage::default(),
        );
        let tex = Texture::create(backend, "rt", &desc).unwrap();

        let id = tex.id();
        let old_handle = tex.handle();

        tex.set_current_layout(ResourceLayout::RenderTarget);
        let bigger = TextureDescriptor::new_2d(
            256,
            256,
            PixelFormat::Rgba8Unorm,
            TextureUsage::default(),
        );
        tex.recreate(&bigger).unwrap();

        assert_eq!(tex.id(), id);
        assert_ne!(tex.handle(), old_handle);
        assert_eq!(tex.width(), 256);
        assert_eq!(tex.current_layout(), ResourceLayout::Undefined);
    }

    #[test]
    fn test_initial_layout_depends_on_discardable() {
        let backend: Arc<dyn RenderBackend> = Arc::new(DummyBackend::new());
        let desc = TextureDescriptor::new_2d(
            8,
            8,
            PixelFormat::Rgba8Unorm,
            TextureUsage::RENDER_TARGET,
        );
        let persistent = Texture::create(backend.clone(), "persistent", &desc).unwrap();
        persistent.set_current_layout(ResourceLayout::Texture);
        assert_eq!(persistent.initial_layout(), ResourceLayout::Texture);

        let desc = TextureDescriptor::new_2d(
            8,
            8,
            PixelFormat::Rgba8Unorm,
            TextureUsage::RENDER_TARGET | TextureUsage::DISCARDABLE_CONTENT,
        );
        let discardable = Texture::create(backend, "discardable", &desc).unwrap();
        discardable.set_current_layout(ResourceLayout::Texture);
        assert_eq!(discardable.initial_layout(), ResourceLayout::Undefined);
    }
}
