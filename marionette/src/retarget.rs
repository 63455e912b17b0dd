//! Driving rig bones from the tracked skeleton.
//!
//! `plan` is a pure function from skeleton state to bone rotations.
//! `apply` writes them into the rig. `Retargeter` ties both to the per-frame
//! sensor input.

use {
    crate::{
        body::{BodySample, SharedFloorPlane},
        filter::SmoothingParameters,
        joint::{JointType, JOINT_COUNT},
        map::{MapBinding, MapError, RetargetMap},
        node::NodeId,
        rig::Rig,
        source::SourceSkeleton,
        target::{RigError, TargetSkeleton},
    },
    nalgebra as na,
    std::{fmt::Debug, hash::Hash},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RetargetMode {
    /// Every bone gets identity world rotation. Map is ignored.
    Identity,

    /// Rig is held in rest pose. Map is ignored.
    Rest,

    /// Mapped bones follow their joints.
    Mapped,
}

impl Default for RetargetMode {
    fn default() -> Self {
        RetargetMode::Mapped
    }
}

/// World rotation to assign to a bone.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoneAssignment<B> {
    pub bone: B,
    pub node: NodeId,
    pub rotation: na::UnitQuaternion<f32>,
}

/// Computes world rotations for mapped bones.
///
/// The target tree is walked from its root. Unmapped bones are passed
/// through to their children. At a mapped bone the walk follows the source
/// joint's children instead, through unmapped joints too, and continues at
/// every mapped joint it meets. A joint that is not tracked this frame stops
/// the walk for its whole subtree.
///
/// Assignments are ordered parents first.
/// Fails if `binding` was made for another target skeleton.
pub fn plan<B>(
    source: &SourceSkeleton,
    target: &TargetSkeleton<B>,
    binding: &MapBinding,
) -> Result<Vec<BoneAssignment<B>>, MapError>
where
    B: Copy + Eq + Hash + Debug,
{
    if !binding.is_bound_to(target) {
        return Err(MapError::ForeignBinding);
    }

    let mut planner = Planner {
        source,
        target,
        binding,
        visited: [false; JOINT_COUNT],
        assignments: Vec::with_capacity(binding.len()),
    };

    planner.visit_bone(target.tree().root());

    let mut assignments = planner.assignments;
    assignments.sort_by_key(|assignment| assignment.node);
    Ok(assignments)
}

struct Planner<'a, B> {
    source: &'a SourceSkeleton,
    target: &'a TargetSkeleton<B>,
    binding: &'a MapBinding,
    visited: [bool; JOINT_COUNT],
    assignments: Vec<BoneAssignment<B>>,
}

impl<B> Planner<'_, B>
where
    B: Copy + Eq + Hash + Debug,
{
    fn visit_bone(&mut self, node: NodeId) {
        match self.binding.joint(node) {
            Some(joint) => self.drive(joint),
            None => {
                let target = self.target;
                for &child in target.tree().children(node) {
                    self.visit_bone(child);
                }
            }
        }
    }

    fn drive(&mut self, joint: JointType) {
        if std::mem::replace(&mut self.visited[joint.index()], true) {
            return;
        }

        let node = match self.binding.node(joint) {
            Some(node) => node,
            None => return,
        };

        if !self.source.is_tracked(joint) {
            tracing::debug!("Joint {} is not tracked, subtree skipped", joint);
            return;
        }

        let rotation = self.rotation(joint) * self.binding.adjustment(joint);
        let rotation = na::UnitQuaternion::new_normalize(*rotation.quaternion());

        self.assignments.push(BoneAssignment {
            bone: self.target.bone(node),
            node,
            rotation,
        });

        self.visit_joint_children(joint);
    }

    fn visit_joint_children(&mut self, joint: JointType) {
        let source = self.source;
        let tree = source.tree();
        for &child in tree.children(source.node(joint)) {
            let child = *tree.key(child);
            if self.binding.is_mapped(child) {
                self.drive(child);
            } else if source.is_tracked(child) {
                self.visit_joint_children(child);
            }
        }
    }

    /// When the parent joint is unmapped its accumulated rotation is
    /// composed with this joint's local rotation, so the skipped level
    /// still contributes.
    fn rotation(&self, joint: JointType) -> na::UnitQuaternion<f32> {
        match joint.parent() {
            Some(parent) if !self.binding.is_mapped(parent) => {
                self.source.rotation(parent) * self.source.local_rotation(joint)
            }
            _ => self.source.rotation(joint),
        }
    }
}

/// Writes planned rotations into the rig. Positions are left alone.
pub fn apply<R>(assignments: &[BoneAssignment<R::Bone>], rig: &mut R)
where
    R: Rig,
{
    for assignment in assignments {
        rig.set_world_rotation(assignment.bone, assignment.rotation);
    }
}

/// Runs one retargeting pass in given mode and refreshes the target skeleton.
pub fn retarget<R>(
    source: &SourceSkeleton,
    target: &mut TargetSkeleton<R::Bone>,
    binding: &MapBinding,
    mode: RetargetMode,
    rig: &mut R,
) -> Result<(), MapError>
where
    R: Rig,
{
    match mode {
        RetargetMode::Identity => target.reset_to_identity(rig),
        RetargetMode::Rest => target.reset_to_rest_pose(rig),
        RetargetMode::Mapped => {
            let assignments = plan(source, target, binding)?;
            tracing::trace!("Assigning {} bone rotations", assignments.len());
            apply(&assignments, rig);
            target.refresh_hierarchy(rig);
        }
    }
    Ok(())
}

/// Per-frame retargeting pipeline for one rig.
pub struct Retargeter<B> {
    source: SourceSkeleton,
    target: TargetSkeleton<B>,
    map: RetargetMap,
    binding: MapBinding,
    mode: RetargetMode,
}

impl<B> Retargeter<B>
where
    B: Copy + Eq + Hash + Debug,
{
    pub fn new<R>(
        rig: &R,
        map: RetargetMap,
        params: SmoothingParameters,
        mirror: bool,
        mode: RetargetMode,
    ) -> Result<Self, RigError>
    where
        R: Rig<Bone = B>,
    {
        let target = TargetSkeleton::init(rig)?;
        let binding = map.bind(&target);

        tracing::info!(
            "Retargeting {} of {} map entries onto the rig",
            binding.len(),
            map.len()
        );

        Ok(Retargeter {
            source: SourceSkeleton::new(params, mirror),
            target,
            map,
            binding,
            mode,
        })
    }

    pub fn source(&self) -> &SourceSkeleton {
        &self.source
    }

    pub fn target(&self) -> &TargetSkeleton<B> {
        &self.target
    }

    pub fn map(&self) -> &RetargetMap {
        &self.map
    }

    pub fn mode(&self) -> RetargetMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: RetargetMode) {
        self.mode = mode;
    }

    /// Edits the map and rebinds it to the target skeleton.
    pub fn edit_map<F, T>(&mut self, f: F) -> T
    where
        F: FnOnce(&mut RetargetMap, &TargetSkeleton<B>) -> T,
    {
        let result = f(&mut self.map, &self.target);
        self.binding = self.map.bind(&self.target);
        result
    }

    /// Rediscovers the rig after its hierarchy changed.
    pub fn rebuild_target<R>(&mut self, rig: &R) -> Result<(), RigError>
    where
        R: Rig<Bone = B>,
    {
        self.target = TargetSkeleton::init(rig)?;
        self.binding = self.map.bind(&self.target);
        Ok(())
    }

    /// Runs one frame of the pipeline.
    ///
    /// Floor plane is read once for the whole frame.
    /// Returns `false` when there was no body and the frame was skipped.
    pub fn frame<R>(
        &mut self,
        rig: &mut R,
        body: Option<&BodySample>,
        floor: &SharedFloorPlane,
    ) -> bool
    where
        R: Rig<Bone = B>,
    {
        let floor = floor.snapshot();
        if !self.source.update_from_sample(body, &floor) {
            return false;
        }

        let result = retarget(
            &self.source,
            &mut self.target,
            &self.binding,
            self.mode,
            rig,
        );
        match result {
            Ok(()) => true,
            Err(err) => {
                tracing::error!("Retargeting failed: {}", err);
                false
            }
        }
    }
}
