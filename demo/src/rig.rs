use {
    hecs::{Entity, World},
    marionette::{
        scene::{spawn_bone, spawn_root_bone},
        JointType, RetargetMap, SceneRig,
    },
    nalgebra as na,
};

/// `(bone, parent, offset from parent)` of a simple humanoid in rest pose.
const BONES: &[(&str, Option<&str>, [f32; 3])] = &[
    ("hips", None, [0.0, 0.95, 0.0]),
    ("spine", Some("hips"), [0.0, 0.15, 0.0]),
    ("chest", Some("spine"), [0.0, 0.2, 0.0]),
    ("upper_chest", Some("chest"), [0.0, 0.15, 0.0]),
    ("neck", Some("upper_chest"), [0.0, 0.1, 0.0]),
    ("head", Some("neck"), [0.0, 0.12, 0.0]),
    ("shoulder.l", Some("upper_chest"), [0.05, 0.05, 0.0]),
    ("upper_arm.l", Some("shoulder.l"), [0.12, 0.0, 0.0]),
    ("forearm.l", Some("upper_arm.l"), [0.0, -0.27, 0.0]),
    ("hand.l", Some("forearm.l"), [0.0, -0.25, 0.0]),
    ("shoulder.r", Some("upper_chest"), [-0.05, 0.05, 0.0]),
    ("upper_arm.r", Some("shoulder.r"), [-0.12, 0.0, 0.0]),
    ("forearm.r", Some("upper_arm.r"), [0.0, -0.27, 0.0]),
    ("hand.r", Some("forearm.r"), [0.0, -0.25, 0.0]),
    ("thigh.l", Some("hips"), [0.09, -0.05, 0.0]),
    ("shin.l", Some("thigh.l"), [0.0, -0.43, 0.0]),
    ("foot.l", Some("shin.l"), [0.0, -0.41, 0.0]),
    ("thigh.r", Some("hips"), [-0.09, -0.05, 0.0]),
    ("shin.r", Some("thigh.r"), [0.0, -0.43, 0.0]),
    ("foot.r", Some("shin.r"), [0.0, -0.41, 0.0]),
];

/// Map used when config names no map file.
/// Rig has more spine and shoulder bones than the sensor has joints,
/// those stay unmapped.
const DEFAULT_MAP: &[(JointType, &str)] = &[
    (JointType::SpineBase, "hips"),
    (JointType::SpineMid, "chest"),
    (JointType::SpineShoulder, "upper_chest"),
    (JointType::Neck, "neck"),
    (JointType::Head, "head"),
    (JointType::ShoulderLeft, "upper_arm.l"),
    (JointType::ElbowLeft, "forearm.l"),
    (JointType::WristLeft, "hand.l"),
    (JointType::ShoulderRight, "upper_arm.r"),
    (JointType::ElbowRight, "forearm.r"),
    (JointType::WristRight, "hand.r"),
    (JointType::HipLeft, "thigh.l"),
    (JointType::KneeLeft, "shin.l"),
    (JointType::AnkleLeft, "foot.l"),
    (JointType::HipRight, "thigh.r"),
    (JointType::KneeRight, "shin.r"),
    (JointType::AnkleRight, "foot.r"),
];

pub fn humanoid() -> SceneRig {
    let mut world = World::new();
    let mut spawned: Vec<(&str, Entity)> = Vec::with_capacity(BONES.len());

    for &(name, parent, [x, y, z]) in BONES {
        let iso = na::Isometry3::translation(x, y, z);
        let parent = parent.and_then(|parent| {
            spawned
                .iter()
                .find(|(spawned, _)| *spawned == parent)
                .map(|&(_, entity)| entity)
        });

        let entity = match parent {
            None => spawn_root_bone(&mut world, name, iso),
            Some(parent) => spawn_bone(&mut world, name, parent, iso),
        };
        spawned.push((name, entity));
    }

    SceneRig::new(world)
}

pub fn default_map() -> RetargetMap {
    let mut map = RetargetMap::new();
    for &(joint, bone) in DEFAULT_MAP {
        map.add(joint, bone);
    }
    map
}
