use {
    nalgebra as na,
    std::{fmt::Debug, hash::Hash, sync::Arc},
};

/// Externally owned bone hierarchy that retargeting writes into.
///
/// Transforms are in world space. Writing a bone's world transform is
/// expected to carry its descendants along, as scene graphs do.
pub trait Rig {
    type Bone: Copy + Eq + Hash + Debug;

    /// Bone the hierarchy hangs from.
    fn root_bone(&self) -> Option<Self::Bone>;

    /// All bones of the rig, in the rig's own order.
    fn bones(&self) -> &[Self::Bone];

    fn bone_name(&self, bone: Self::Bone) -> Option<Arc<str>>;

    fn children(&self, bone: Self::Bone) -> &[Self::Bone];

    fn world_transform(&self, bone: Self::Bone) -> Option<na::Isometry3<f32>>;

    fn set_world_rotation(
        &mut self,
        bone: Self::Bone,
        rotation: na::UnitQuaternion<f32>,
    );

    fn set_world_transform(
        &mut self,
        bone: Self::Bone,
        transform: na::Isometry3<f32>,
    );
}
