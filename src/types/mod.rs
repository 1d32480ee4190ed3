//! Plain data types shared across the compositor.

mod buffer;
mod target;
mod texture;

pub use buffer::{BufferBindFlags, BufferDescriptor};
pub use target::{LoadAction, StoreAction, ViewportRect, MAX_COLOUR_TARGETS};
pub use texture::{PixelFormat, TextureDescriptor, TextureKind, TextureUsage};
