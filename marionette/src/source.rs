use {
    crate::{
        body::{BodySample, FloorPlane},
        filter::{DoubleExponentialFilter, JointPose, SmoothingParameters},
        joint::{JointType, TrackingState, JOINT_COUNT, TOPOLOGY},
        math::{flip_quaternion, mirror_position, QuatFlip},
        node::{JointTree, NodeId},
    },
    nalgebra as na,
};

/// Tracked skeleton with the sensor's fixed joint hierarchy.
///
/// Every frame joint samples are mirrored into the rig's handedness,
/// smoothed, corrected for the floor plane and stored as raw state of the
/// joint tree, which then recomputes parent-relative offsets.
#[derive(Clone, Debug)]
pub struct SourceSkeleton {
    tree: JointTree<JointType>,
    nodes: [NodeId; JOINT_COUNT],
    tracking: [TrackingState; JOINT_COUNT],
    filter: DoubleExponentialFilter<JointType>,
    params: SmoothingParameters,
    mirror: bool,

    /// Tracking id of the body that fed the filter history.
    body: Option<u64>,
}

impl Default for SourceSkeleton {
    fn default() -> Self {
        SourceSkeleton::new(SmoothingParameters::default(), true)
    }
}

impl SourceSkeleton {
    pub fn new(params: SmoothingParameters, mirror: bool) -> Self {
        let tree = JointTree::from_parents(TOPOLOGY.iter().copied())
            .expect("Fixed joint topology must be a tree");

        let mut nodes = [tree.root(); JOINT_COUNT];
        for (id, node) in tree.depth_first() {
            nodes[node.key().index()] = id;
        }

        SourceSkeleton {
            tree,
            nodes,
            tracking: [TrackingState::NotTracked; JOINT_COUNT],
            filter: DoubleExponentialFilter::new(),
            params,
            mirror,
            body: None,
        }
    }

    pub fn parameters(&self) -> &SmoothingParameters {
        &self.params
    }

    /// Forgets smoothing history and tracking states.
    /// Joint poses are kept until the next sample overwrites them.
    pub fn reset(&mut self) {
        self.filter.clear();
        self.tracking = [TrackingState::NotTracked; JOINT_COUNT];
        self.body = None;
    }

    pub fn tree(&self) -> &JointTree<JointType> {
        &self.tree
    }

    pub fn node(&self, joint: JointType) -> NodeId {
        self.nodes[joint.index()]
    }

    pub fn tracking_state(&self, joint: JointType) -> TrackingState {
        self.tracking[joint.index()]
    }

    pub fn is_tracked(&self, joint: JointType) -> bool {
        self.tracking_state(joint) != TrackingState::NotTracked
    }

    pub fn position(&self, joint: JointType) -> na::Vector3<f32> {
        self.tree.position(self.node(joint))
    }

    pub fn rotation(&self, joint: JointType) -> na::UnitQuaternion<f32> {
        self.tree.rotation(self.node(joint))
    }

    pub fn local_rotation(
        &self,
        joint: JointType,
    ) -> na::UnitQuaternion<f32> {
        *self.tree.node(self.node(joint)).local_rotation()
    }

    /// Pushes new body sample through the pipeline.
    ///
    /// Missing sample skips the frame and keeps previous state.
    /// Sample of another person resets smoothing history first.
    /// `floor` must be one snapshot for the whole frame.
    /// Returns `true` if the skeleton was updated.
    pub fn update_from_sample(
        &mut self,
        body: Option<&BodySample>,
        floor: &FloorPlane,
    ) -> bool {
        let body = match body {
            Some(body) => body,
            None => {
                tracing::trace!("No body sample, skeleton keeps last pose");
                return false;
            }
        };

        if self.body != Some(body.tracking_id) {
            if let Some(previous) = self.body {
                tracing::debug!(
                    "Body {} replaces body {}, smoothing restarts",
                    body.tracking_id,
                    previous
                );
            }
            self.reset();
            self.body = Some(body.tracking_id);
        }

        for (joint, sample) in body.joints() {
            self.tracking[joint.index()] = sample.state;

            if !sample.is_tracked() {
                tracing::trace!("Joint {} is not tracked", joint);
                self.filter.reset(&joint);
                continue;
            }

            let raw = if self.mirror {
                JointPose::new(
                    mirror_position(&sample.position),
                    na::UnitQuaternion::new_unchecked(flip_quaternion(
                        sample.orientation.quaternion(),
                        QuatFlip::Y | QuatFlip::Z,
                    )),
                )
            } else {
                JointPose::new(sample.position, sample.orientation)
            };

            let params = self.params.for_state(sample.state);
            let smoothed = self.filter.update(joint, raw, &params);

            let (position, rotation) =
                floor.correct(&smoothed.position, &smoothed.rotation);
            self.tree.set_raw(self.nodes[joint.index()], position, rotation);
        }

        self.tree.calculate_offsets();
        true
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::body::JointSample,
        approx::assert_relative_eq,
        std::f32::consts::FRAC_PI_2,
    };

    fn sample(
        position: na::Vector3<f32>,
        rotation: na::UnitQuaternion<f32>,
    ) -> JointSample {
        JointSample {
            position,
            orientation: rotation,
            state: TrackingState::Tracked,
        }
    }

    fn standing_body() -> BodySample {
        let mut body = BodySample::new(7);
        for (index, &joint) in JointType::ALL.iter().enumerate() {
            body.set_joint(
                joint,
                sample(
                    na::Vector3::new(0.1 * index as f32, 1.0, 2.0),
                    na::UnitQuaternion::from_euler_angles(
                        0.0,
                        0.05 * index as f32,
                        0.0,
                    ),
                ),
            );
        }
        body
    }

    #[test]
    fn builds_fixed_hierarchy() {
        let skeleton = SourceSkeleton::default();
        let tree = skeleton.tree();

        assert_eq!(tree.len(), JOINT_COUNT);
        assert_eq!(*tree.key(tree.root()), JointType::SpineBase);

        let children: Vec<_> = tree
            .children(skeleton.node(JointType::SpineBase))
            .iter()
            .map(|&id| *tree.key(id))
            .collect();
        assert_eq!(
            children,
            [JointType::HipLeft, JointType::HipRight, JointType::SpineMid]
        );

        for &joint in JointType::ALL.iter() {
            assert_eq!(*tree.key(skeleton.node(joint)), joint);
        }
    }

    #[test]
    fn missing_sample_keeps_previous_pose() {
        let mut skeleton = SourceSkeleton::default();
        assert!(skeleton.update_from_sample(
            Some(&standing_body()),
            &FloorPlane::level()
        ));
        let before = skeleton.position(JointType::HandLeft);

        assert!(!skeleton.update_from_sample(None, &FloorPlane::level()));
        assert_eq!(skeleton.position(JointType::HandLeft), before);
    }

    #[test]
    fn mirrors_sensor_handedness() {
        let mut skeleton = SourceSkeleton::default();
        let rotation = na::UnitQuaternion::from_axis_angle(
            &na::Vector3::y_axis(),
            FRAC_PI_2,
        );
        let body = BodySample::new(1).with_joint(
            JointType::SpineBase,
            sample(na::Vector3::new(0.5, 1.0, 2.0), rotation),
        );

        skeleton.update_from_sample(Some(&body), &FloorPlane::level());

        assert_relative_eq!(
            skeleton.position(JointType::SpineBase),
            na::Vector3::new(-0.5, 1.0, 2.0),
            epsilon = 1.0e-6
        );
        assert!(
            skeleton
                .rotation(JointType::SpineBase)
                .angle_to(&rotation.inverse())
                < 1.0e-5
        );
    }

    #[test]
    fn applies_floor_height() {
        let mut skeleton = SourceSkeleton::new(SmoothingParameters::default(), false);
        let floor = FloorPlane::new(na::Vector3::y(), 0.8).unwrap();

        skeleton.update_from_sample(Some(&standing_body()), &floor);

        let expected = na::Vector3::new(0.1 * 7.0, 1.8, 2.0);
        assert_relative_eq!(
            skeleton.position(JointType::HandLeft),
            expected,
            epsilon = 1.0e-5
        );
    }

    #[test]
    fn hierarchy_reconstructs_world_samples() {
        let mut skeleton = SourceSkeleton::new(SmoothingParameters::default(), false);
        let body = standing_body();
        skeleton.update_from_sample(Some(&body), &FloorPlane::level());

        for (joint, sample) in body.joints() {
            assert_relative_eq!(
                skeleton.position(joint),
                sample.position,
                epsilon = 1.0e-5
            );
            assert!(
                skeleton.rotation(joint).angle_to(&sample.orientation) < 1.0e-4
            );
        }
    }

    #[test]
    fn lost_joint_keeps_last_sample() {
        let mut skeleton = SourceSkeleton::new(SmoothingParameters::default(), false);
        skeleton.update_from_sample(Some(&standing_body()), &FloorPlane::level());
        let before = skeleton.position(JointType::FootRight);

        let mut body = standing_body();
        body.set_joint(JointType::FootRight, JointSample::not_tracked());
        skeleton.update_from_sample(Some(&body), &FloorPlane::level());

        assert!(!skeleton.is_tracked(JointType::FootRight));
        assert!(skeleton.is_tracked(JointType::AnkleRight));
        assert_relative_eq!(
            skeleton.position(JointType::FootRight),
            before,
            epsilon = 1.0e-5
        );
    }

    #[test]
    fn another_body_restarts_smoothing() {
        let mut skeleton = SourceSkeleton::new(SmoothingParameters::default(), false);
        let floor = FloorPlane::level();
        let at = |id: u64, x: f32| {
            BodySample::new(id).with_joint(
                JointType::SpineBase,
                sample(na::Vector3::new(x, 1.0, 2.0), na::UnitQuaternion::identity()),
            )
        };

        for _ in 0..10 {
            skeleton.update_from_sample(Some(&at(1, 0.0)), &floor);
        }

        // Same person jumping is smoothed towards the history.
        let mut same = skeleton.clone();
        same.update_from_sample(Some(&at(1, 1.0)), &floor);
        assert!(same.position(JointType::SpineBase).x < 0.99);

        // Another person is taken as is.
        skeleton.update_from_sample(Some(&at(2, 1.0)), &floor);
        assert_relative_eq!(
            skeleton.position(JointType::SpineBase),
            na::Vector3::new(1.0, 1.0, 2.0),
            epsilon = 1.0e-5
        );
    }

    #[test]
    fn reset_forgets_tracking_states() {
        let mut skeleton = SourceSkeleton::default();
        skeleton.update_from_sample(Some(&standing_body()), &FloorPlane::level());
        assert!(skeleton.is_tracked(JointType::Head));

        let before = skeleton.position(JointType::Head);
        skeleton.reset();

        assert!(!skeleton.is_tracked(JointType::Head));
        assert_eq!(skeleton.position(JointType::Head), before);
    }
}
