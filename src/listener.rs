//! Workspace observer interface.

use crate::pass::PassState;
use crate::workspace::Workspace;

/// Callbacks fired at defined points of a workspace's frame update.
///
/// All hooks default to no-ops; implement the ones you need. Typical uses
/// are camera sync for VR, profiling and debug visualization — external
/// code reacting to the frame without modifying the compositor core.
///
/// Hooks are invoked synchronously from the frame-update call stack, in
/// listener registration order. Pass hooks receive the pass' shared state;
/// the definition's `identifier` field is the intended way to tell passes
/// apart.
#[allow(unused_variables)]
pub trait WorkspaceListener {
    /// Before any node of the workspace executes this frame.
    fn workspace_pre_update(&self, workspace: &Workspace) {}

    /// After every node of the workspace executed this frame.
    fn workspace_post_update(&self, workspace: &Workspace) {}

    /// Before a pass does anything at all (before barriers are analyzed).
    fn pass_early_pre_execute(&self, pass: &PassState) {}

    /// After a pass' barriers executed, right before its GPU operation.
    fn pass_pre_execute(&self, pass: &PassState) {}

    /// After a pass' GPU operation.
    fn pass_post_execute(&self, pass: &PassState) {}

    /// After a scene or warm-up pass finished dealing with its shadow node
    /// (fires even when the update was skipped by the first-only policy).
    fn pass_scene_after_shadow_maps(&self, pass: &PassState) {}

    /// Between frustum culling and object rendering of a scene pass.
    fn after_frustum_culling(&self, pass: &PassState) {}

    /// After a shadow node finished recomputing its shadow maps.
    fn shadow_nodes_updated(&self) {}
}
