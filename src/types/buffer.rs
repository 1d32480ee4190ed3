//! Buffer types and descriptors.

use bitflags::bitflags;

bitflags! {
    /// Bind flags for compositor-managed GPU buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferBindFlags: u32 {
        /// Buffer can be bound as an unordered-access view.
        const UAV = 1 << 0;
        /// Buffer can be bound as a texel/texture buffer for sampling.
        const TEXTURE = 1 << 1;
        /// Buffer can be the source of indirect draw/dispatch arguments.
        const INDIRECT = 1 << 2;
    }
}

impl Default for BufferBindFlags {
    fn default() -> Self {
        Self::UAV
    }
}

/// Fully resolved description of a buffer, as handed to the backend.
///
/// Definitions may scale the element count by the reference target's
/// resolution; by the time this descriptor exists the count is concrete.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: String,
    /// Number of elements.
    pub num_elements: usize,
    /// Stride of a single element in bytes.
    pub bytes_per_element: u32,
    /// Bind flags.
    pub bind_flags: BufferBindFlags,
}

impl BufferDescriptor {
    /// Create a descriptor for `num_elements` elements of the given stride.
    pub fn new(num_elements: usize, bytes_per_element: u32, bind_flags: BufferBindFlags) -> Self {
        Self {
            label: String::new(),
            num_elements,
            bytes_per_element,
            bind_flags,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Total size in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.num_elements as u64 * u64::from(self.bytes_per_element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_bytes() {
        let desc = BufferDescriptor::new(512, 16, BufferBindFlags::UAV);
        assert_eq!(desc.size_bytes(), 8192);
    }
}
