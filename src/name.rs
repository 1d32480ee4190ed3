//! Hashed resource names.
//!
//! Channels, nodes and definitions are identified by name throughout the
//! compositor. Lookups happen on hot paths (every pass resolves its textures
//! by name at creation and sometimes per frame), so names are hashed once
//! into a [`NameId`] and compared as plain integers afterwards. Definitions
//! keep the original string alongside for error messages.

use std::fmt;
use std::hash::Hasher;

use rustc_hash::FxHasher;

/// Name prefix that marks a texture as workspace-global.
///
/// The naming convention is enforced: local textures must not use the
/// prefix, global textures must.
pub const GLOBAL_PREFIX: &str = "global_";

/// A precomputed 64-bit hash of a resource/node/channel name.
///
/// `NameId` is `Copy` and cheap to compare, making it suitable as a map key
/// and as the identity stored in definitions. Two different strings hashing
/// to the same id are not detected; like any hashed-name scheme this trades
/// collision detection for speed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameId(u64);

impl NameId {
    /// Hash a name string into an id.
    pub fn new(name: &str) -> Self {
        let mut hasher = FxHasher::default();
        hasher.write(name.as_bytes());
        Self(hasher.finish())
    }

    /// Raw hash value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl From<&str> for NameId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Debug for NameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NameId({:#018x})", self.0)
    }
}

/// Check whether a name uses the `global_` prefix.
pub fn has_global_prefix(name: &str) -> bool {
    name.starts_with(GLOBAL_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_id_stable() {
        assert_eq!(NameId::new("rt0"), NameId::new("rt0"));
        assert_ne!(NameId::new("rt0"), NameId::new("rt1"));
    }

    #[test]
    fn test_global_prefix() {
        assert!(has_global_prefix("global_cubemap"));
        assert!(!has_global_prefix("rt_scene"));
    }
}
