use {
    crate::{
        joint::{JointType, TrackingState, JOINT_COUNT},
        math::{floor_correction, normalize, normalize_quaternion, MathError},
    },
    nalgebra as na,
    parking_lot::RwLock,
    std::{cmp::Ordering, sync::Arc},
};

/// Position and orientation of one joint as reported by the sensor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JointSample {
    pub position: na::Vector3<f32>,
    pub orientation: na::UnitQuaternion<f32>,
    pub state: TrackingState,
}

impl JointSample {
    /// Validates raw sensor values.
    ///
    /// Sensors report zero quaternions for joints they lost track of,
    /// those are accepted only together with `TrackingState::NotTracked`.
    pub fn new(
        position: na::Vector3<f32>,
        orientation: na::Quaternion<f32>,
        state: TrackingState,
    ) -> Result<Self, MathError> {
        let orientation = match state {
            TrackingState::NotTracked => normalize_quaternion(&orientation)
                .unwrap_or_else(|_| na::UnitQuaternion::identity()),
            _ => normalize_quaternion(&orientation)?,
        };

        Ok(JointSample {
            position,
            orientation,
            state,
        })
    }

    pub fn not_tracked() -> Self {
        JointSample {
            position: na::Vector3::zeros(),
            orientation: na::UnitQuaternion::identity(),
            state: TrackingState::NotTracked,
        }
    }

    pub fn is_tracked(&self) -> bool {
        self.state != TrackingState::NotTracked
    }
}

impl Default for JointSample {
    fn default() -> Self {
        JointSample::not_tracked()
    }
}

/// All joints of one body for a single sensor frame.
#[derive(Clone, Debug)]
pub struct BodySample {
    pub tracking_id: u64,
    pub is_tracked: bool,
    joints: [JointSample; JOINT_COUNT],
}

impl BodySample {
    /// Tracked body with no joint samples yet.
    pub fn new(tracking_id: u64) -> Self {
        BodySample {
            tracking_id,
            is_tracked: true,
            joints: [JointSample::not_tracked(); JOINT_COUNT],
        }
    }

    pub fn with_joint(mut self, joint: JointType, sample: JointSample) -> Self {
        self.set_joint(joint, sample);
        self
    }

    pub fn set_joint(&mut self, joint: JointType, sample: JointSample) {
        self.joints[joint.index()] = sample;
    }

    pub fn joint(&self, joint: JointType) -> &JointSample {
        &self.joints[joint.index()]
    }

    pub fn joints(&self) -> impl Iterator<Item = (JointType, &JointSample)> {
        JointType::ALL.iter().copied().zip(self.joints.iter())
    }
}

/// Floor plane reported by the sensor, in sensor space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FloorPlane {
    normal: na::Unit<na::Vector3<f32>>,
    distance: f32,
    correction: na::UnitQuaternion<f32>,
}

impl FloorPlane {
    /// Validates the plane and derives rotation that brings its normal
    /// to world up.
    pub fn new(
        normal: na::Vector3<f32>,
        distance: f32,
    ) -> Result<Self, MathError> {
        let normal = normalize(&normal)?;
        let correction = floor_correction(&normal)?;

        Ok(FloorPlane {
            normal,
            distance,
            correction,
        })
    }

    /// Plane in `(x, y, z, w)` form with `xyz` normal and `w` distance.
    pub fn from_clip_plane(plane: na::Vector4<f32>) -> Result<Self, MathError> {
        FloorPlane::new(plane.xyz(), plane.w)
    }

    /// Horizontal floor right under the sensor origin.
    pub fn level() -> Self {
        FloorPlane {
            normal: na::Vector3::y_axis(),
            distance: 0.0,
            correction: na::UnitQuaternion::identity(),
        }
    }

    pub fn normal(&self) -> &na::Unit<na::Vector3<f32>> {
        &self.normal
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    pub fn correction(&self) -> &na::UnitQuaternion<f32> {
        &self.correction
    }

    /// Re-expresses sensor space sample relative to the floor.
    /// Height of the sensor above the floor is added along world up.
    pub fn correct(
        &self,
        position: &na::Vector3<f32>,
        rotation: &na::UnitQuaternion<f32>,
    ) -> (na::Vector3<f32>, na::UnitQuaternion<f32>) {
        let offset = self.correction * na::Vector3::y() * self.distance;
        (
            self.correction * position + offset,
            self.correction * rotation,
        )
    }
}

impl Default for FloorPlane {
    fn default() -> Self {
        FloorPlane::level()
    }
}

/// Floor plane shared between the sensor thread that publishes it
/// and the frame loop that reads a snapshot once per frame.
#[derive(Clone, Debug, Default)]
pub struct SharedFloorPlane {
    plane: Arc<RwLock<FloorPlane>>,
}

impl SharedFloorPlane {
    pub fn new(plane: FloorPlane) -> Self {
        SharedFloorPlane {
            plane: Arc::new(RwLock::new(plane)),
        }
    }

    pub fn publish(&self, plane: FloorPlane) {
        let mut current = self.plane.write();
        if *current != plane {
            *current = plane;
        }
    }

    pub fn snapshot(&self) -> FloorPlane {
        *self.plane.read()
    }
}

/// Everything the sensor produced for one frame.
#[derive(Clone, Debug, Default)]
pub struct BodyFrame {
    pub bodies: Vec<BodySample>,
    pub floor: FloorPlane,
}

impl BodyFrame {
    /// Tracked body whose root joint is nearest to the sensor.
    pub fn closest_body(&self) -> Option<&BodySample> {
        let distance =
            |body: &BodySample| body.joint(JointType::ROOT).position.norm();

        self.bodies
            .iter()
            .filter(|body| body.is_tracked)
            .min_by(|a, b| {
                distance(*a)
                    .partial_cmp(&distance(*b))
                    .unwrap_or(Ordering::Equal)
            })
    }
}
