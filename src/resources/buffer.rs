//! Compositor-owned GPU buffer (UAV-capable).

use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::{BufferHandle, RenderBackend};
use crate::error::CompositorError;
use crate::types::{BufferBindFlags, BufferDescriptor};

use super::{next_resource_id, ResourceId};

#[derive(Debug)]
struct BufferInner {
    handle: BufferHandle,
    desc: BufferDescriptor,
}

/// A GPU buffer tracked by the compositor.
///
/// Like [`crate::resources::Texture`], identity is stable across
/// destroy-and-recreate cycles; the backend handle is freed on drop.
/// Buffers carry no layout; the barrier solver tracks only their access.
pub struct UavBuffer {
    id: ResourceId,
    name: String,
    backend: Arc<dyn RenderBackend>,
    inner: RwLock<BufferInner>,
}

impl UavBuffer {
    /// Create a buffer through the backend.
    pub fn create(
        backend: Arc<dyn RenderBackend>,
        name: impl Into<String>,
        desc: &BufferDescriptor,
    ) -> Result<Arc<Self>, CompositorError> {
        let handle = backend.create_buffer(desc)?;
        Ok(Arc::new(Self {
            id: next_resource_id(),
            name: name.into(),
            backend,
            inner: RwLock::new(BufferInner {
                handle,
                desc: desc.clone(),
            }),
        }))
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> BufferHandle {
        self.inner.read().handle
    }

    pub fn descriptor(&self) -> BufferDescriptor {
        self.inner.read().desc.clone()
    }

    pub fn num_elements(&self) -> usize {
        self.inner.read().desc.num_elements
    }

    pub fn bytes_per_element(&self) -> u32 {
        self.inner.read().desc.bytes_per_element
    }

    pub fn size_bytes(&self) -> u64 {
        self.inner.read().desc.size_bytes()
    }

    pub fn bind_flags(&self) -> BufferBindFlags {
        self.inner.read().desc.bind_flags
    }

    /// Destroy the backend buffer and create a fresh one with `desc`,
    /// keeping this object's identity. Contents are lost.
    pub(crate) fn recreate(&self, desc: &BufferDescriptor) -> Result<(), CompositorError> {
        let new_handle = self.backend.create_buffer(desc)?;
        let mut inner = self.inner.write();
        self.backend.destroy_buffer(inner.handle);
        inner.handle = new_handle;
        inner.desc = desc.clone();
        Ok(())
    }
}

impl Drop for UavBuffer {
    fn drop(&mut self) {
        let handle = self.inner.read().handle;
        self.backend.destroy_buffer(handle);
    }
}

impl std::fmt::Debug for UavBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("UavBuffer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("desc", &inner.desc)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;

    #[test]
    fn test_recreate_keeps_identity() {
        let backend: Arc<dyn RenderBackend> = Arc::new(DummyBackend::new());
        let buf = UavBuffer::create(
            backend,
            "particles",
            &BufferDescriptor::new(1024, 32, BufferBindFlags::UAV),
        )
        .unwrap();

        let id = buf.id();
        buf.recreate(&BufferDescriptor::new(2048, 32, BufferBindFlags::UAV))
            .unwrap();
        assert_eq!(buf.id(), id);
        assert_eq!(buf.num_elements(), 2048);
    }
}
