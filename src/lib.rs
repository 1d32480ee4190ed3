//! # Compositor
//!
//! Graph-based frame compositor: a dependency-ordered execution graph of
//! render/compute passes with dynamic resource routing, explicit GPU
//! layout tracking and automatic barrier placement.
//!
//! ## Overview
//!
//! - [`WorkspaceDef`] / [`NodeDef`] — declarative, GPU-handle-free
//!   descriptions of the graph; one definition can back many instances
//! - [`Workspace`] — the top-level execution unit: resolves the node
//!   connection graph into an execution order and drives the frame
//! - [`Node`] — an ordered list of passes sharing input/output channels
//! - [`BarrierSolver`] — tracks every resource's layout/access and emits
//!   the minimal set of transitions before each GPU operation
//! - [`RenderBackend`] — the abstract graphics API; ships with a
//!   recording [`DummyBackend`] for tests
//!
//! ## Example
//!
//! ```ignore
//! let mut node_def = NodeDef::new("scene_pass");
//! node_def.add_input(0, "rt_final")?;
//! // ... declare targets and passes ...
//! ctx.register_node_definition(Arc::new(node_def))?;
//!
//! let mut ws_def = WorkspaceDef::new("main");
//! ws_def.connect_external(0, "scene_pass", 0);
//!
//! let mut workspace = Workspace::new(Arc::new(ws_def), ctx, vec![window], camera,
//!                                    WorkspaceOptions::default())?;
//! assert!(workspace.is_valid());
//! workspace.begin_update();
//! workspace.update()?;
//! workspace.end_update();
//! ```

pub mod backend;
pub mod barrier;
pub mod channel;
pub mod context;
pub mod definition;
pub mod error;
pub mod listener;
pub mod name;
pub mod node;
pub mod pass;
pub mod resources;
pub mod shadow;
pub mod types;
pub mod workspace;

// Re-export the main types for convenience.
pub use backend::{BackendCaps, DummyBackend, RenderBackend};
pub use barrier::{
    BarrierSolver, ResourceAccess, ResourceLayout, ResourceStatus, ResourceTransition, StageMask,
};
pub use context::{
    CameraHandle, CompositorContext, ComputeJob, ComputeJobHandle, ComputeJobProvider,
    SceneRenderer,
};
pub use definition::{NodeDef, PassKind, PassKindDef, ShadowNodeDef, WorkspaceDef};
pub use error::CompositorError;
pub use listener::WorkspaceListener;
pub use name::NameId;
pub use node::Node;
pub use resources::{Texture, UavBuffer};
pub use types::{PixelFormat, TextureDescriptor, TextureKind, TextureUsage};
pub use workspace::{Workspace, WorkspaceOptions};

/// Compositor library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
