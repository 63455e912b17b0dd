use {
    crate::{
        node::{JointTree, NodeId, TreeError},
        rig::Rig,
    },
    ahash::AHashMap,
    nalgebra as na,
    std::{
        fmt::Debug,
        hash::Hash,
        sync::{
            atomic::{AtomicU64, Ordering},
            Arc,
        },
    },
};

static NEXT_STAMP: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, thiserror::Error)]
pub enum RigError {
    #[error("Rig has no root bone")]
    NoRootBone,

    #[error("Bone {bone} has no name")]
    UnnamedBone { bone: String },

    #[error("Bone name '{name}' is used by more than one bone")]
    DuplicateBoneName { name: Arc<str> },

    #[error("Rig hierarchy is not a tree")]
    Tree(#[from] TreeError),
}

/// Mirror of an external rig's bone hierarchy.
///
/// Nodes are created in depth-first preorder from the root bone,
/// so ascending node ids put parents before children.
#[derive(Clone, Debug)]
pub struct TargetSkeleton<B> {
    tree: JointTree<B>,
    names: Vec<Arc<str>>,
    by_name: AHashMap<Arc<str>, NodeId>,
    rest: Vec<na::Isometry3<f32>>,

    /// Unique per `init` call. Bindings remember it.
    stamp: u64,
}

impl<B> TargetSkeleton<B>
where
    B: Copy + Eq + Hash + Debug,
{
    /// Discovers bones reachable from the rig's root bone
    /// and captures their current transforms as rest pose.
    pub fn init<R>(rig: &R) -> Result<Self, RigError>
    where
        R: Rig<Bone = B>,
    {
        let root = rig.root_bone().ok_or(RigError::NoRootBone)?;

        let mut skeleton = TargetSkeleton {
            tree: JointTree::new(root),
            names: Vec::new(),
            by_name: AHashMap::new(),
            rest: Vec::new(),
            stamp: NEXT_STAMP.fetch_add(1, Ordering::Relaxed),
        };

        let root_id = skeleton.tree.root();
        skeleton.capture(rig, root_id)?;
        skeleton.discover(rig, root_id)?;
        skeleton.tree.calculate_offsets();

        let unreachable = rig.bones().len().saturating_sub(skeleton.len());
        if unreachable > 0 {
            tracing::debug!(
                "{} rig bones are not reachable from the root bone",
                unreachable
            );
        }

        tracing::info!(
            "Target skeleton initialized with {} bones",
            skeleton.len()
        );

        Ok(skeleton)
    }

    fn discover<R>(&mut self, rig: &R, id: NodeId) -> Result<(), RigError>
    where
        R: Rig<Bone = B>,
    {
        let bone = *self.tree.key(id);
        for &child in rig.children(bone) {
            // Bone seen twice means a cycle and fails here.
            let child_id = self.tree.add_child(id, child)?;
            self.capture(rig, child_id)?;
            self.discover(rig, child_id)?;
        }
        Ok(())
    }

    fn capture<R>(&mut self, rig: &R, id: NodeId) -> Result<(), RigError>
    where
        R: Rig<Bone = B>,
    {
        let bone = *self.tree.key(id);
        let name = rig.bone_name(bone).ok_or_else(|| RigError::UnnamedBone {
            bone: format!("{:?}", bone),
        })?;

        if self.by_name.contains_key(&name) {
            return Err(RigError::DuplicateBoneName { name });
        }

        let rest = match rig.world_transform(bone) {
            Some(iso) => iso,
            None => {
                tracing::warn!(
                    "Bone '{}' has no transform, rest pose is identity",
                    name
                );
                na::Isometry3::identity()
            }
        };

        debug_assert_eq!(id.index(), self.names.len());
        self.by_name.insert(name.clone(), id);
        self.names.push(name);
        self.rest.push(rest);
        self.tree.set_raw(id, rest.translation.vector, rest.rotation);
        Ok(())
    }

    pub(crate) fn stamp(&self) -> u64 {
        self.stamp
    }

    pub fn tree(&self) -> &JointTree<B> {
        &self.tree
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn root_bone(&self) -> B {
        *self.tree.key(self.tree.root())
    }

    pub fn bone(&self, id: NodeId) -> B {
        *self.tree.key(id)
    }

    pub fn node_of(&self, bone: B) -> Option<NodeId> {
        self.tree.get(&bone)
    }

    pub fn by_name(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    pub fn contains_bone(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn bone_name(&self, id: NodeId) -> &str {
        &self.names[id.index()]
    }

    /// Names of discovered bones, indexed by node id.
    pub fn bone_names(&self) -> &[Arc<str>] {
        &self.names
    }

    pub fn rest_pose(&self, id: NodeId) -> &na::Isometry3<f32> {
        &self.rest[id.index()]
    }

    pub fn position(&self, id: NodeId) -> na::Vector3<f32> {
        self.tree.position(id)
    }

    pub fn rotation(&self, id: NodeId) -> na::UnitQuaternion<f32> {
        self.tree.rotation(id)
    }

    /// Sets every bone's world rotation to identity, keeping positions.
    pub fn reset_to_identity<R>(&mut self, rig: &mut R)
    where
        R: Rig<Bone = B>,
    {
        for id in self.tree.ids() {
            rig.set_world_rotation(
                *self.tree.key(id),
                na::UnitQuaternion::identity(),
            );
        }
        self.refresh_hierarchy(rig);
    }

    /// Puts every bone back to the transform captured at `init`.
    pub fn reset_to_rest_pose<R>(&mut self, rig: &mut R)
    where
        R: Rig<Bone = B>,
    {
        let ids: Vec<NodeId> = self.tree.ids().collect();
        for id in ids {
            let rest = self.rest[id.index()];
            rig.set_world_transform(*self.tree.key(id), rest);
            self.tree.set_raw(id, rest.translation.vector, rest.rotation);
        }
        self.tree.calculate_offsets();
    }

    /// Pulls current bone transforms from the rig and recomputes local state.
    /// Bones the rig no longer knows keep their previous raw state.
    pub fn refresh_hierarchy<R>(&mut self, rig: &R)
    where
        R: Rig<Bone = B>,
    {
        let ids: Vec<NodeId> = self.tree.ids().collect();
        for id in ids {
            let bone = *self.tree.key(id);
            match rig.world_transform(bone) {
                Some(iso) => {
                    self.tree.set_raw(id, iso.translation.vector, iso.rotation)
                }
                None => tracing::debug!("Bone {:?} is gone from the rig", bone),
            }
        }
        self.tree.calculate_offsets();
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::scene::{spawn_bone, spawn_root_bone, SceneRig},
        approx::assert_relative_eq,
        hecs::World,
        std::f32::consts::FRAC_PI_2,
    };

    fn at(x: f32, y: f32) -> na::Isometry3<f32> {
        na::Isometry3::translation(x, y, 0.0)
    }

    fn tilted(x: f32, y: f32) -> na::Isometry3<f32> {
        na::Isometry3::from_parts(
            na::Translation3::new(x, y, 0.0),
            na::UnitQuaternion::from_euler_angles(0.0, 0.0, 0.3),
        )
    }

    /// hips -> (spine -> head, leg)
    fn rig() -> SceneRig {
        let mut world = World::new();
        let hips = spawn_root_bone(&mut world, "hips", at(0.0, 1.0));
        let spine = spawn_bone(&mut world, "spine", hips, tilted(0.0, 0.3));
        spawn_bone(&mut world, "leg", hips, at(0.1, -0.5));
        spawn_bone(&mut world, "head", spine, at(0.0, 0.3));
        SceneRig::new(world)
    }

    #[test]
    fn discovers_bones_in_preorder() {
        let rig = rig();
        let skeleton = TargetSkeleton::init(&rig).unwrap();

        let names: Vec<&str> =
            skeleton.bone_names().iter().map(|name| &**name).collect();
        assert_eq!(names, ["hips", "spine", "head", "leg"]);

        let spine = skeleton.by_name("spine").unwrap();
        let head = skeleton.by_name("head").unwrap();
        assert_eq!(skeleton.tree().parent(head), Some(spine));
        assert_eq!(skeleton.root_bone(), rig.root_bone().unwrap());
        assert!(skeleton.contains_bone("leg"));
        assert!(!skeleton.contains_bone("tail"));
    }

    #[test]
    fn hierarchy_matches_rig_transforms() {
        let rig = rig();
        let skeleton = TargetSkeleton::init(&rig).unwrap();

        for id in skeleton.tree().ids() {
            let iso = rig.world_transform(skeleton.bone(id)).unwrap();
            assert_relative_eq!(
                skeleton.position(id),
                iso.translation.vector,
                epsilon = 1.0e-5
            );
            assert!(skeleton.rotation(id).angle_to(&iso.rotation) < 1.0e-5);
        }
    }

    #[test]
    fn rig_without_root_is_rejected() {
        let mut world = World::new();
        spawn_root_bone(&mut world, "a", at(0.0, 0.0));
        spawn_root_bone(&mut world, "b", at(1.0, 0.0));

        let rig = SceneRig::new(world);
        assert!(matches!(
            TargetSkeleton::init(&rig),
            Err(RigError::NoRootBone)
        ));
    }

    #[test]
    fn duplicate_bone_names_are_rejected() {
        let mut world = World::new();
        let root = spawn_root_bone(&mut world, "root", at(0.0, 0.0));
        spawn_bone(&mut world, "arm", root, at(1.0, 0.0));
        spawn_bone(&mut world, "arm", root, at(-1.0, 0.0));

        let rig = SceneRig::new(world);
        match TargetSkeleton::init(&rig) {
            Err(RigError::DuplicateBoneName { name }) => {
                assert_eq!(&*name, "arm")
            }
            other => panic!("Unexpected {:?}", other.map(|s| s.len())),
        }
    }

    #[test]
    fn identity_then_rest_pose() {
        let mut rig = rig();
        let mut skeleton = TargetSkeleton::init(&rig).unwrap();
        let spine = skeleton.by_name("spine").unwrap();
        let head = skeleton.by_name("head").unwrap();
        let head_rest = rig.world_transform(skeleton.bone(head)).unwrap();

        skeleton.reset_to_identity(&mut rig);
        for id in skeleton.tree().ids() {
            let iso = rig.world_transform(skeleton.bone(id)).unwrap();
            assert!(iso.rotation.angle() < 1.0e-5);
        }
        assert!(skeleton.rotation(spine).angle() < 1.0e-5);
        assert_relative_eq!(
            rig.world_transform(skeleton.bone(spine))
                .unwrap()
                .translation
                .vector,
            na::Vector3::new(0.0, 1.3, 0.0),
            epsilon = 1.0e-5
        );

        skeleton.reset_to_rest_pose(&mut rig);
        let head_now = rig.world_transform(skeleton.bone(head)).unwrap();
        assert_relative_eq!(
            head_now.translation.vector,
            head_rest.translation.vector,
            epsilon = 1.0e-5
        );
        assert!(head_now.rotation.angle_to(&head_rest.rotation) < 1.0e-5);
        assert!(
            skeleton.rotation(head).angle_to(&head_rest.rotation) < 1.0e-5
        );
    }

    #[test]
    fn refresh_picks_up_rig_changes() {
        let mut rig = rig();
        let mut skeleton = TargetSkeleton::init(&rig).unwrap();
        let spine = skeleton.by_name("spine").unwrap();
        let head = skeleton.by_name("head").unwrap();

        let quarter = na::UnitQuaternion::from_axis_angle(
            &na::Vector3::x_axis(),
            FRAC_PI_2,
        );
        rig.set_world_rotation(skeleton.bone(spine), quarter);
        skeleton.refresh_hierarchy(&rig);

        assert!(skeleton.rotation(spine).angle_to(&quarter) < 1.0e-5);
        assert!(skeleton.rotation(head).angle_to(&quarter) < 1.0e-5);
        assert_relative_eq!(
            skeleton.position(head),
            rig.world_transform(skeleton.bone(head))
                .unwrap()
                .translation
                .vector,
            epsilon = 1.0e-5
        );
    }
}
