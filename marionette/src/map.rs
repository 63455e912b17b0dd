//! Authored correspondence between sensor joints and rig bones.
//!
//! A joint appears in at most one entry and so does a bone.
//! Every mutator keeps both properties, and loading rejects maps that
//! violate them.

use {
    crate::{
        joint::{JointType, UnknownJoint, JOINT_COUNT},
        math::normalize_quaternion,
        node::NodeId,
        target::TargetSkeleton,
    },
    nalgebra as na,
    std::{
        convert::TryFrom,
        fmt::Debug,
        hash::Hash,
        path::{Path, PathBuf},
    },
};

#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("Joint {joint} is mapped more than once")]
    DuplicateJoint { joint: JointType },

    #[error("Bone '{bone}' is mapped more than once")]
    DuplicateBone { bone: String },

    #[error("Map entry for joint {joint} has degenerate adjustment")]
    DegenerateAdjustment { joint: JointType },

    #[error(transparent)]
    UnknownJoint(#[from] UnknownJoint),

    #[error("Bone '{bone}' is not in the target skeleton")]
    UnknownBone { bone: String },

    #[error("Entry index {index} is out of range, map has {len} entries")]
    EntryOutOfRange { index: usize, len: usize },

    #[error("Bone index {index} is out of range, skeleton has {len} bones")]
    BoneOutOfRange { index: usize, len: usize },

    #[error("Map binding belongs to another target skeleton")]
    ForeignBinding,

    #[error("Failed to access map file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to encode or decode map: {source}")]
    Ron {
        #[from]
        source: ron::Error,
    },
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MapEntry {
    pub joint: JointType,
    pub bone: String,

    /// Appended to the retargeted world rotation of the bone.
    /// Reconciles joint frame of the sensor with bone frame of the rig.
    #[serde(default = "identity")]
    pub adjustment: na::UnitQuaternion<f32>,
}

fn identity() -> na::UnitQuaternion<f32> {
    na::UnitQuaternion::identity()
}

impl MapEntry {
    pub fn new(joint: JointType, bone: impl Into<String>) -> Self {
        MapEntry {
            joint,
            bone: bone.into(),
            adjustment: identity(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "Vec<MapEntry>", into = "Vec<MapEntry>")]
pub struct RetargetMap {
    entries: Vec<MapEntry>,
}

impl TryFrom<Vec<MapEntry>> for RetargetMap {
    type Error = MapError;

    fn try_from(mut entries: Vec<MapEntry>) -> Result<Self, MapError> {
        // Decoded quaternions are not normalized.
        for entry in &mut entries {
            let joint = entry.joint;
            entry.adjustment = normalize_quaternion(entry.adjustment.quaternion())
                .map_err(|_| MapError::DegenerateAdjustment { joint })?;
        }

        for (index, entry) in entries.iter().enumerate() {
            let earlier = &entries[..index];
            if earlier.iter().any(|e| e.joint == entry.joint) {
                return Err(MapError::DuplicateJoint { joint: entry.joint });
            }
            if earlier.iter().any(|e| e.bone == entry.bone) {
                return Err(MapError::DuplicateBone {
                    bone: entry.bone.clone(),
                });
            }
        }

        Ok(RetargetMap { entries })
    }
}

impl From<RetargetMap> for Vec<MapEntry> {
    fn from(map: RetargetMap) -> Self {
        map.entries
    }
}

impl RetargetMap {
    pub fn new() -> Self {
        RetargetMap::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[MapEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&MapEntry> {
        self.entries.get(index)
    }

    pub fn by_joint(&self, joint: JointType) -> Option<&MapEntry> {
        self.entries.iter().find(|entry| entry.joint == joint)
    }

    pub fn by_bone(&self, bone: &str) -> Option<&MapEntry> {
        self.entries.iter().find(|entry| entry.bone == bone)
    }

    /// Maps joint to bone and returns index of the entry.
    ///
    /// Entry of another joint holding the bone is removed.
    /// Existing entry of the joint is updated in place.
    pub fn add(&mut self, joint: JointType, bone: impl Into<String>) -> usize {
        let bone = bone.into();

        if let Some(other) = self
            .entries
            .iter()
            .position(|entry| entry.bone == bone && entry.joint != joint)
        {
            let removed = self.entries.remove(other);
            tracing::debug!(
                "Bone '{}' moves from joint {} to {}",
                bone,
                removed.joint,
                joint
            );
        }

        match self.entries.iter().position(|entry| entry.joint == joint) {
            Some(index) => {
                self.entries[index].bone = bone;
                index
            }
            None => {
                self.entries.push(MapEntry::new(joint, bone));
                self.entries.len() - 1
            }
        }
    }

    /// Same as `add` but with names checked against the target skeleton.
    pub fn add_by_name<B>(
        &mut self,
        joint: &str,
        bone: &str,
        target: &TargetSkeleton<B>,
    ) -> Result<usize, MapError>
    where
        B: Copy + Eq + Hash + Debug,
    {
        let joint = joint.parse::<JointType>()?;
        if !target.contains_bone(bone) {
            return Err(MapError::UnknownBone {
                bone: bone.to_owned(),
            });
        }
        Ok(self.add(joint, bone))
    }

    /// Assigns bone to the entry.
    /// If another entry holds the bone, it gets this entry's old bone.
    pub fn update_bone(
        &mut self,
        index: usize,
        bone: impl Into<String>,
    ) -> Result<(), MapError> {
        self.check_index(index)?;
        let bone = bone.into();

        if let Some(other) =
            self.entries.iter().position(|entry| entry.bone == bone)
        {
            if other != index {
                let previous = self.entries[index].bone.clone();
                self.entries[other].bone = previous;
            }
        }

        self.entries[index].bone = bone;
        Ok(())
    }

    /// `update_bone` with bone picked from the skeleton's bone list.
    pub fn update_bone_at<B>(
        &mut self,
        index: usize,
        bone_index: usize,
        target: &TargetSkeleton<B>,
    ) -> Result<(), MapError>
    where
        B: Copy + Eq + Hash + Debug,
    {
        let bone = bone_at(bone_index, target)?;
        self.update_bone(index, bone)
    }

    pub fn remove(&mut self, index: usize) -> Result<MapEntry, MapError> {
        self.check_index(index)?;
        Ok(self.entries.remove(index))
    }

    /// Removes entry holding the bone, if any.
    pub fn remove_bone(&mut self, bone: &str) -> Option<MapEntry> {
        let index = self.entries.iter().position(|entry| entry.bone == bone)?;
        Some(self.entries.remove(index))
    }

    pub fn remove_bone_at<B>(
        &mut self,
        bone_index: usize,
        target: &TargetSkeleton<B>,
    ) -> Result<Option<MapEntry>, MapError>
    where
        B: Copy + Eq + Hash + Debug,
    {
        let bone = bone_at(bone_index, target)?;
        Ok(self.remove_bone(&bone))
    }

    pub fn set_adjustment(
        &mut self,
        index: usize,
        adjustment: na::UnitQuaternion<f32>,
    ) -> Result<(), MapError> {
        self.check_index(index)?;
        self.entries[index].adjustment = adjustment;
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<(), MapError> {
        if index < self.entries.len() {
            Ok(())
        } else {
            Err(MapError::EntryOutOfRange {
                index,
                len: self.entries.len(),
            })
        }
    }

    pub fn from_ron(source: &str) -> Result<Self, MapError> {
        Ok(ron::de::from_str(source)?)
    }

    pub fn to_ron(&self) -> Result<String, MapError> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    #[tracing::instrument]
    pub fn load(path: &Path) -> Result<Self, MapError> {
        let source =
            std::fs::read_to_string(path).map_err(|source| MapError::Io {
                path: path.to_owned(),
                source,
            })?;
        let map = RetargetMap::from_ron(&source)?;
        tracing::info!("Loaded {} map entries", map.len());
        Ok(map)
    }

    #[tracing::instrument(skip(self))]
    pub fn save(&self, path: &Path) -> Result<(), MapError> {
        let encoded = self.to_ron()?;
        std::fs::write(path, encoded).map_err(|source| MapError::Io {
            path: path.to_owned(),
            source,
        })
    }

    /// Resolves bone names against the skeleton.
    /// Entries naming bones the skeleton lacks are left out.
    pub fn bind<B>(&self, target: &TargetSkeleton<B>) -> MapBinding
    where
        B: Copy + Eq + Hash + Debug,
    {
        let mut binding = MapBinding {
            target: target.stamp(),
            by_joint: [None; JOINT_COUNT],
            by_node: vec![None; target.len()],
        };

        for entry in &self.entries {
            match target.by_name(&entry.bone) {
                Some(node) => {
                    binding.by_joint[entry.joint.index()] =
                        Some((node, entry.adjustment));
                    binding.by_node[node.index()] = Some(entry.joint);
                }
                None => tracing::warn!(
                    "Joint {} is mapped to bone '{}' missing from the rig",
                    entry.joint,
                    entry.bone
                ),
            }
        }

        binding
    }
}

fn bone_at<B>(index: usize, target: &TargetSkeleton<B>) -> Result<String, MapError>
where
    B: Copy + Eq + Hash + Debug,
{
    target
        .bone_names()
        .get(index)
        .map(|name| String::from(&**name))
        .ok_or(MapError::BoneOutOfRange {
            index,
            len: target.len(),
        })
}

/// Map resolved to target skeleton nodes.
/// Lookups in both directions are constant time.
#[derive(Clone, Debug)]
pub struct MapBinding {
    target: u64,
    by_joint: [Option<(NodeId, na::UnitQuaternion<f32>)>; JOINT_COUNT],
    by_node: Vec<Option<JointType>>,
}

impl MapBinding {
    /// Checks that the binding was made for this very skeleton.
    pub fn is_bound_to<B>(&self, target: &TargetSkeleton<B>) -> bool
    where
        B: Copy + Eq + Hash + Debug,
    {
        self.target == target.stamp() && self.by_node.len() == target.len()
    }

    pub fn is_mapped(&self, joint: JointType) -> bool {
        self.by_joint[joint.index()].is_some()
    }

    pub fn node(&self, joint: JointType) -> Option<NodeId> {
        self.by_joint[joint.index()].map(|(node, _)| node)
    }

    pub fn adjustment(&self, joint: JointType) -> na::UnitQuaternion<f32> {
        self.by_joint[joint.index()]
            .map_or_else(identity, |(_, adjustment)| adjustment)
    }

    pub fn joint(&self, node: NodeId) -> Option<JointType> {
        self.by_node.get(node.index()).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.by_joint.iter().filter(|link| link.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::scene::{spawn_bone, spawn_root_bone, SceneRig},
        hecs::{Entity, World},
    };

    fn skeleton() -> TargetSkeleton<Entity> {
        let mut world = World::new();
        let hips = spawn_root_bone(&mut world, "hips", na::Isometry3::identity());
        let spine = spawn_bone(&mut world, "spine", hips, na::Isometry3::identity());
        spawn_bone(&mut world, "head", spine, na::Isometry3::identity());
        TargetSkeleton::init(&SceneRig::new(world)).unwrap()
    }

    fn holders(map: &RetargetMap, bone: &str) -> usize {
        map.entries().iter().filter(|entry| entry.bone == bone).count()
    }

    #[test]
    fn adding_taken_bone_clears_previous_entry() {
        let mut map = RetargetMap::new();
        map.add(JointType::SpineBase, "hips");
        map.add(JointType::SpineMid, "spine");
        map.add(JointType::Neck, "spine");

        assert_eq!(holders(&map, "spine"), 1);
        assert_eq!(map.by_bone("spine").unwrap().joint, JointType::Neck);
        assert!(map.by_joint(JointType::SpineMid).is_none());
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn adding_mapped_joint_updates_its_entry() {
        let mut map = RetargetMap::new();
        let index = map.add(JointType::Head, "head");
        assert_eq!(map.add(JointType::Head, "spine"), index);

        assert_eq!(map.len(), 1);
        assert_eq!(map.by_joint(JointType::Head).unwrap().bone, "spine");
    }

    #[test]
    fn update_bone_swaps_with_holder() {
        let mut map = RetargetMap::new();
        let base = map.add(JointType::SpineBase, "hips");
        let mid = map.add(JointType::SpineMid, "spine");

        map.update_bone(base, "spine").unwrap();

        assert_eq!(map.entries()[base].bone, "spine");
        assert_eq!(map.entries()[mid].bone, "hips");
        assert!(matches!(
            map.update_bone(5, "head"),
            Err(MapError::EntryOutOfRange { index: 5, len: 2 })
        ));
    }

    #[test]
    fn editing_by_bone_list_index() {
        let skeleton = skeleton();
        let mut map = RetargetMap::new();
        let index = map.add_by_name("Head", "hips", &skeleton).unwrap();

        map.update_bone_at(index, 2, &skeleton).unwrap();
        assert_eq!(map.entries()[index].bone, "head");

        assert!(matches!(
            map.update_bone_at(index, 3, &skeleton),
            Err(MapError::BoneOutOfRange { index: 3, len: 3 })
        ));

        let removed = map.remove_bone_at(2, &skeleton).unwrap();
        assert_eq!(removed.map(|entry| entry.joint), Some(JointType::Head));
        assert!(map.is_empty());
    }

    #[test]
    fn names_are_checked() {
        let skeleton = skeleton();
        let mut map = RetargetMap::new();

        assert!(matches!(
            map.add_by_name("Tail", "hips", &skeleton),
            Err(MapError::UnknownJoint(_))
        ));
        assert!(matches!(
            map.add_by_name("Head", "tail", &skeleton),
            Err(MapError::UnknownBone { .. })
        ));
        assert!(map.is_empty());
    }

    #[test]
    fn remove_and_adjust() {
        let mut map = RetargetMap::new();
        map.add(JointType::SpineBase, "hips");
        let neck = map.add(JointType::Neck, "spine");

        let twist = na::UnitQuaternion::from_euler_angles(0.0, 0.5, 0.0);
        map.set_adjustment(neck, twist).unwrap();
        assert_eq!(map.by_bone("spine").unwrap().adjustment, twist);

        assert_eq!(map.remove(0).unwrap().joint, JointType::SpineBase);
        assert!(map.remove(1).is_err());
        assert!(map.remove_bone("hips").is_none());
        assert_eq!(map.remove_bone("spine").unwrap().joint, JointType::Neck);
    }

    #[test]
    fn loads_and_saves_ron() {
        let mut map = RetargetMap::new();
        map.add(JointType::SpineBase, "hips");
        let head = map.add(JointType::Head, "head");
        map.set_adjustment(
            head,
            na::UnitQuaternion::from_euler_angles(0.0, 0.0, 0.25),
        )
        .unwrap();

        let path = std::env::temp_dir()
            .join(format!("marionette-map-{}.ron", std::process::id()));
        map.save(&path).unwrap();
        let loaded = RetargetMap::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.entries()[0], map.entries()[0]);
        assert!(
            loaded.entries()[1]
                .adjustment
                .angle_to(&map.entries()[1].adjustment)
                < 1.0e-6
        );
    }

    #[test]
    fn duplicates_are_rejected_on_load() {
        let source = r#"[
            (joint: SpineBase, bone: "hips"),
            (joint: Neck, bone: "hips"),
        ]"#;
        assert!(RetargetMap::from_ron(source).is_err());

        let source = r#"[
            (joint: Head, bone: "head"),
            (joint: Head, bone: "neck"),
        ]"#;
        assert!(RetargetMap::from_ron(source).is_err());

        let source = r#"[(joint: Head, bone: "head")]"#;
        let map = RetargetMap::from_ron(source).unwrap();
        assert_eq!(map.by_joint(JointType::Head).unwrap().adjustment, identity());
    }

    #[test]
    fn binding_skips_missing_bones() {
        let skeleton = skeleton();
        let mut map = RetargetMap::new();
        map.add(JointType::SpineBase, "hips");
        map.add(JointType::Head, "head");
        map.add(JointType::HandLeft, "left_hand");

        let binding = map.bind(&skeleton);
        let head = skeleton.by_name("head").unwrap();

        assert_eq!(binding.len(), 2);
        assert_eq!(binding.node(JointType::Head), Some(head));
        assert_eq!(binding.joint(head), Some(JointType::Head));
        assert!(!binding.is_mapped(JointType::HandLeft));
        assert_eq!(binding.joint(skeleton.by_name("spine").unwrap()), None);
    }
}
