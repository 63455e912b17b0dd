//! Synthetic body tracking sensor.
//!
//! Runs on its own thread, as real sensor callbacks do, and produces people
//! walking back and forth in front of a slightly tilted camera.

use {
    crate::config::DemoConfig,
    eyre::{Report, WrapErr as _},
    flume::{bounded, Receiver, Sender},
    marionette::{
        joint::{JOINT_COUNT, TOPOLOGY},
        BodyFrame, BodySample, FloorPlane, JointSample, JointType, Segment,
        SharedFloorPlane, TrackingState,
    },
    nalgebra as na,
    rand::{rngs::StdRng, Rng as _, SeedableRng as _},
    std::{
        f32::consts::PI,
        thread::{self, JoinHandle},
        time::Duration,
    },
};

/// Offset from the parent joint in standing pose.
fn bone_offset(joint: JointType) -> na::Vector3<f32> {
    use JointType::*;
    let (x, y, z) = match joint {
        SpineBase => (0.0, 0.0, 0.0),
        SpineMid => (0.0, 0.3, 0.0),
        SpineShoulder => (0.0, 0.25, 0.0),
        Neck => (0.0, 0.08, 0.0),
        Head => (0.0, 0.15, 0.0),
        ShoulderLeft => (-0.18, -0.05, 0.0),
        ShoulderRight => (0.18, -0.05, 0.0),
        ElbowLeft | ElbowRight => (0.0, -0.28, 0.0),
        WristLeft | WristRight => (0.0, -0.25, 0.0),
        HandLeft | HandRight => (0.0, -0.08, 0.0),
        HandTipLeft | HandTipRight => (0.0, -0.08, 0.0),
        ThumbLeft => (0.04, -0.05, 0.0),
        ThumbRight => (-0.04, -0.05, 0.0),
        HipLeft => (-0.09, -0.05, 0.0),
        HipRight => (0.09, -0.05, 0.0),
        KneeLeft | KneeRight => (0.0, -0.42, 0.0),
        AnkleLeft | AnkleRight => (0.0, -0.4, 0.0),
        FootLeft | FootRight => (0.0, -0.05, -0.12),
    };
    na::Vector3::new(x, y, z)
}

/// Swing of a joint relative to its parent at walk phase `phase`.
fn swing(joint: JointType, phase: f32) -> na::UnitQuaternion<f32> {
    let angle = match joint.segment() {
        Segment::LeftArm => 0.35 * phase.sin(),
        Segment::RightArm => -0.35 * phase.sin(),
        Segment::LeftLeg => -0.4 * phase.sin(),
        Segment::RightLeg => 0.4 * phase.sin(),
        Segment::Body => {
            return na::UnitQuaternion::from_axis_angle(
                &na::Vector3::y_axis(),
                0.1 * phase.sin(),
            )
        }
        Segment::Head | Segment::LeftHand | Segment::RightHand => 0.0,
    };
    na::UnitQuaternion::from_axis_angle(&na::Vector3::x_axis(), angle)
}

struct Walker {
    lane: f32,
    distance: f32,
    phase: f32,
}

impl Walker {
    fn sample(
        &self,
        tracking_id: u64,
        time: f32,
        jitter: f32,
        rng: &mut StdRng,
    ) -> BodySample {
        let phase = time * 2.0 * PI * 0.8 + self.phase;
        let root = na::Vector3::new(
            self.lane,
            0.1,
            self.distance + 0.6 * (time * 0.3 + self.phase).sin(),
        );

        let mut positions = [na::Vector3::zeros(); JOINT_COUNT];
        let mut rotations = [na::UnitQuaternion::identity(); JOINT_COUNT];
        let mut body = BodySample::new(tracking_id);

        // Parents precede children in the topology.
        for &(joint, parent) in TOPOLOGY.iter() {
            let (position, rotation) = match parent {
                None => (root, swing(joint, phase)),
                Some(parent) => {
                    let parent_rotation = rotations[parent.index()];
                    (
                        positions[parent.index()]
                            + parent_rotation * bone_offset(joint),
                        parent_rotation * swing(joint, phase),
                    )
                }
            };
            positions[joint.index()] = position;
            rotations[joint.index()] = rotation;

            let roll: f32 = rng.gen();
            let sample = if roll < 0.01 {
                JointSample::not_tracked()
            } else {
                let state = if roll < 0.05 {
                    TrackingState::Inferred
                } else {
                    TrackingState::Tracked
                };
                let noise = na::Vector3::new(
                    rng.gen_range(-jitter..=jitter),
                    rng.gen_range(-jitter..=jitter),
                    rng.gen_range(-jitter..=jitter),
                );
                JointSample {
                    position: position + noise,
                    orientation: rotation,
                    state,
                }
            };
            body.set_joint(joint, sample);
        }

        body
    }
}

/// Starts the sensor thread.
///
/// Sensor stops when the returned receiver is dropped.
pub fn spawn(
    config: DemoConfig,
    floor: SharedFloorPlane,
) -> Result<(JoinHandle<()>, Receiver<BodyFrame>), Report> {
    let (sender, receiver) = bounded(4);
    let handle = thread::Builder::new()
        .name("sensor".to_owned())
        .spawn(move || run(config, floor, sender))
        .wrap_err("Failed to start sensor thread")?;

    Ok((handle, receiver))
}

fn run(config: DemoConfig, shared: SharedFloorPlane, frames: Sender<BodyFrame>) {
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let tilt: f32 = 0.12;
    let normal = na::Vector3::new(0.0, tilt.cos(), tilt.sin());
    let floor = match FloorPlane::new(normal, 0.85) {
        Ok(floor) => floor,
        Err(err) => {
            tracing::error!("Invalid floor plane: {}", err);
            return;
        }
    };

    let walkers: Vec<Walker> = (0..config.bodies)
        .map(|index| Walker {
            lane: index as f32 * 0.8 - 0.4,
            distance: 2.0 + index as f32 * 0.7,
            phase: rng.gen_range(0.0..PI),
        })
        .collect();

    let period = Duration::from_secs_f32(1.0 / config.frame_rate.max(1.0));
    let jitter = config.jitter.abs();

    for frame in 0u64.. {
        let time = frame as f32 * period.as_secs_f32();
        let bodies = walkers
            .iter()
            .enumerate()
            .map(|(index, walker)| {
                walker.sample(index as u64 + 1, time, jitter, &mut rng)
            })
            .collect();

        shared.publish(floor);

        if frames.send(BodyFrame { bodies, floor }).is_err() {
            tracing::debug!("Frame loop is gone, sensor stops");
            break;
        }

        thread::sleep(period);
    }
}
