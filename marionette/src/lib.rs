pub mod body;
pub mod config;
pub mod filter;
pub mod joint;
pub mod map;
pub mod math;
pub mod node;
pub mod retarget;
pub mod rig;
pub mod scene;
pub mod source;
pub mod target;

pub use self::{
    body::{BodyFrame, BodySample, FloorPlane, JointSample, SharedFloorPlane},
    config::Config,
    filter::{
        DoubleExponentialFilter, JointPose, SmoothingError, SmoothingParameters,
    },
    joint::{JointType, Segment, TrackingState},
    map::{MapBinding, MapEntry, MapError, RetargetMap},
    node::{JointNode, JointTree, NodeId},
    retarget::{BoneAssignment, RetargetMode, Retargeter},
    rig::Rig,
    scene::SceneRig,
    source::SourceSkeleton,
    target::{RigError, TargetSkeleton},
};
