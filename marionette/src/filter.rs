//! Holt double exponential smoothing of joint samples.
//!
//! Every joint keeps its own history of raw value, filtered value and trend.
//! Filtered value is a blend of the raw sample and the trend-extrapolated
//! previous value. Output is the filtered value pushed forward along the
//! trend and then pulled back towards the raw sample when it deviates too far.

use {
    crate::joint::TrackingState,
    ahash::AHashMap,
    nalgebra as na,
    std::{convert::TryFrom, hash::Hash},
};

#[derive(Debug, thiserror::Error)]
pub enum SmoothingError {
    #[error("Smoothing parameter `{name}` must be within [0, 1], got {value}")]
    FactorOutOfRange { name: &'static str, value: f32 },

    #[error("Smoothing radius `{name}` must be finite and non-negative, got {value}")]
    InvalidRadius { name: &'static str, value: f32 },
}

/// Filter tuning. Deserialization rejects values the filter diverges on.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "SmoothingFields")]
pub struct SmoothingParameters {
    /// How much of the previous prediction is kept, `[0..1]`.
    pub smoothing: f32,

    /// How fast trend follows changes, `[0..1]`.
    pub correction: f32,

    /// How far into the future output is extrapolated along the trend,
    /// `[0..1]`.
    pub prediction: f32,

    /// Changes smaller than this are treated as jitter and damped.
    /// Meters for positions, radians for rotations.
    pub jitter_radius: f32,

    /// Output never strays farther than this from the raw sample.
    /// Meters for positions, radians for rotations.
    pub max_deviation_radius: f32,
}

impl Default for SmoothingParameters {
    fn default() -> Self {
        SmoothingParameters {
            smoothing: 0.25,
            correction: 0.25,
            prediction: 0.25,
            jitter_radius: 0.03,
            max_deviation_radius: 0.05,
        }
    }
}

impl SmoothingParameters {
    /// Checks that the filter stays bounded with these parameters.
    pub fn validated(self) -> Result<Self, SmoothingError> {
        for &(name, value) in &[
            ("smoothing", self.smoothing),
            ("correction", self.correction),
            ("prediction", self.prediction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SmoothingError::FactorOutOfRange { name, value });
            }
        }

        for &(name, value) in &[
            ("jitter_radius", self.jitter_radius),
            ("max_deviation_radius", self.max_deviation_radius),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(SmoothingError::InvalidRadius { name, value });
            }
        }

        Ok(self)
    }

    /// Inferred joints are noisier and get twice the radii.
    pub fn for_state(&self, state: TrackingState) -> Self {
        match state {
            TrackingState::Inferred => SmoothingParameters {
                jitter_radius: self.jitter_radius * 2.0,
                max_deviation_radius: self.max_deviation_radius * 2.0,
                ..*self
            },
            _ => *self,
        }
    }
}

#[derive(serde::Deserialize)]
#[serde(default)]
struct SmoothingFields {
    smoothing: f32,
    correction: f32,
    prediction: f32,
    jitter_radius: f32,
    max_deviation_radius: f32,
}

impl Default for SmoothingFields {
    fn default() -> Self {
        let params = SmoothingParameters::default();
        SmoothingFields {
            smoothing: params.smoothing,
            correction: params.correction,
            prediction: params.prediction,
            jitter_radius: params.jitter_radius,
            max_deviation_radius: params.max_deviation_radius,
        }
    }
}

impl TryFrom<SmoothingFields> for SmoothingParameters {
    type Error = SmoothingError;

    fn try_from(fields: SmoothingFields) -> Result<Self, SmoothingError> {
        SmoothingParameters {
            smoothing: fields.smoothing,
            correction: fields.correction,
            prediction: fields.prediction,
            jitter_radius: fields.jitter_radius,
            max_deviation_radius: fields.max_deviation_radius,
        }
        .validated()
    }
}

/// Position and rotation pair passing through the filter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JointPose {
    pub position: na::Vector3<f32>,
    pub rotation: na::UnitQuaternion<f32>,
}

impl JointPose {
    pub fn new(
        position: na::Vector3<f32>,
        rotation: na::UnitQuaternion<f32>,
    ) -> Self {
        JointPose { position, rotation }
    }
}

#[derive(Clone, Copy, Debug)]
struct History {
    raw: JointPose,
    filtered: JointPose,
    position_trend: na::Vector3<f32>,
    rotation_trend: na::UnitQuaternion<f32>,
    frames: u32,
}

impl History {
    fn seed(raw: JointPose) -> Self {
        History {
            raw,
            filtered: raw,
            position_trend: na::Vector3::zeros(),
            rotation_trend: na::UnitQuaternion::identity(),
            frames: 1,
        }
    }
}

/// Per-joint double exponential filter.
/// State of one key never affects another.
#[derive(Clone, Debug)]
pub struct DoubleExponentialFilter<K> {
    history: AHashMap<K, History>,
}

impl<K> Default for DoubleExponentialFilter<K>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        DoubleExponentialFilter::new()
    }
}

impl<K> DoubleExponentialFilter<K>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        DoubleExponentialFilter {
            history: AHashMap::new(),
        }
    }

    /// Forgets history of the key.
    /// Next update seeds it again from the raw sample.
    pub fn reset(&mut self, key: &K) {
        self.history.remove(key);
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    pub fn update(
        &mut self,
        key: K,
        raw: JointPose,
        params: &SmoothingParameters,
    ) -> JointPose {
        let history = match self.history.get_mut(&key) {
            None => {
                let history = History::seed(raw);
                self.history.insert(key, history);
                return predict(&history, &raw, params);
            }
            Some(history) => history,
        };

        let (position, position_trend) = if history.frames == 1 {
            let filtered = (raw.position + history.raw.position) * 0.5;
            let trend = blend(
                &(filtered - history.filtered.position),
                &history.position_trend,
                params.correction,
            );
            (filtered, trend)
        } else {
            let previous = history.filtered.position;
            let distance = (raw.position - previous).norm();

            let dejittered = if distance <= params.jitter_radius
                && params.jitter_radius > 0.0
            {
                blend(&raw.position, &previous, distance / params.jitter_radius)
            } else {
                raw.position
            };

            let filtered = blend(
                &(previous + history.position_trend),
                &dejittered,
                params.smoothing,
            );
            let trend = blend(
                &(filtered - previous),
                &history.position_trend,
                params.correction,
            );
            (filtered, trend)
        };

        let (rotation, rotation_trend) = if history.frames == 1 {
            let filtered = slerp(&history.raw.rotation, &raw.rotation, 0.5);
            let trend = slerp(
                &history.rotation_trend,
                &(filtered * history.filtered.rotation.inverse()),
                params.correction,
            );
            (filtered, trend)
        } else {
            let previous = history.filtered.rotation;
            let angle = raw.rotation.angle_to(&previous);

            let dejittered =
                if angle <= params.jitter_radius && params.jitter_radius > 0.0 {
                    slerp(&previous, &raw.rotation, angle / params.jitter_radius)
                } else {
                    raw.rotation
                };

            let filtered = slerp(
                &dejittered,
                &(history.rotation_trend * previous),
                params.smoothing,
            );
            let trend = slerp(
                &history.rotation_trend,
                &(filtered * previous.inverse()),
                params.correction,
            );
            (filtered, trend)
        };

        *history = History {
            raw,
            filtered: JointPose::new(position, rotation),
            position_trend,
            rotation_trend,
            frames: history.frames.saturating_add(1),
        };

        predict(history, &raw, params)
    }
}

fn predict(
    history: &History,
    raw: &JointPose,
    params: &SmoothingParameters,
) -> JointPose {
    let mut position = history.filtered.position
        + history.position_trend * params.prediction;

    let deviation = (position - raw.position).norm();
    if deviation > params.max_deviation_radius {
        position = blend(
            &position,
            &raw.position,
            params.max_deviation_radius / deviation,
        );
    }

    let mut rotation = slerp(
        &na::UnitQuaternion::identity(),
        &history.rotation_trend,
        params.prediction,
    ) * history.filtered.rotation;

    let deviation = rotation.angle_to(&raw.rotation);
    if deviation > params.max_deviation_radius {
        rotation = slerp(
            &raw.rotation,
            &rotation,
            params.max_deviation_radius / deviation,
        );
    }

    JointPose::new(position, rotation)
}

/// `a * t + b * (1 - t)`
fn blend(
    a: &na::Vector3<f32>,
    b: &na::Vector3<f32>,
    t: f32,
) -> na::Vector3<f32> {
    a * t + b * (1.0 - t)
}

fn slerp(
    from: &na::UnitQuaternion<f32>,
    to: &na::UnitQuaternion<f32>,
    t: f32,
) -> na::UnitQuaternion<f32> {
    match from.try_slerp(to, t, 1.0e-6) {
        Some(rotation) => rotation,
        None if t < 0.5 => *from,
        None => *to,
    }
}

#[cfg(test)]
mod tests {
    use {super::*, approx::assert_relative_eq};

    fn at(x: f32) -> JointPose {
        JointPose::new(
            na::Vector3::new(x, 1.0, 2.0),
            na::UnitQuaternion::identity(),
        )
    }

    fn total_motion(state: TrackingState) -> f32 {
        let params = SmoothingParameters::default().for_state(state);
        let mut filter = DoubleExponentialFilter::new();

        let outputs: Vec<_> = (0..60)
            .map(|frame| {
                let jitter = if frame % 2 == 0 { 0.0 } else { 0.04 };
                filter.update(0u8, at(jitter), &params).position
            })
            .collect();

        outputs.windows(2).map(|w| (w[1] - w[0]).norm()).sum()
    }

    #[test]
    fn first_sample_passes_through() {
        let mut filter = DoubleExponentialFilter::new();
        let rotation = na::UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3);
        let raw = JointPose::new(na::Vector3::new(1.0, 2.0, 3.0), rotation);

        let out = filter.update("a", raw, &SmoothingParameters::default());
        assert_eq!(out, raw);
    }

    #[test]
    fn inferred_joints_are_damped_harder() {
        let tracked = total_motion(TrackingState::Tracked);
        let inferred = total_motion(TrackingState::Inferred);

        assert!(
            inferred < tracked * 0.5,
            "inferred {} vs tracked {}",
            inferred,
            tracked
        );
    }

    #[test]
    fn keys_do_not_share_state() {
        let params = SmoothingParameters::default();
        let mut filter = DoubleExponentialFilter::new();

        for frame in 0..10 {
            filter.update(1u8, at(frame as f32 * 0.1), &params);
        }

        assert_eq!(filter.update(2u8, at(5.0), &params), at(5.0));
    }

    #[test]
    fn output_stays_near_raw_input() {
        let params = SmoothingParameters::default();
        let mut filter = DoubleExponentialFilter::new();

        for frame in 0..200 {
            let t = frame as f32 * 0.05;
            let raw = JointPose::new(
                na::Vector3::new(t.sin(), (t * 3.0).cos() * 0.2, t * 0.01),
                na::UnitQuaternion::from_euler_angles(t.sin(), t * 0.3, 0.0),
            );
            let out = filter.update((), raw, &params);

            assert!(
                (out.position - raw.position).norm()
                    <= params.max_deviation_radius + 1.0e-4
            );
            assert!(
                out.rotation.angle_to(&raw.rotation)
                    <= params.max_deviation_radius + 1.0e-3
            );
        }
    }

    #[test]
    fn converges_on_still_input() {
        let params = SmoothingParameters::default();
        let mut filter = DoubleExponentialFilter::new();
        filter.update((), at(0.0), &params);

        let mut out = at(0.0);
        for _ in 0..100 {
            out = filter.update((), at(1.0), &params);
        }

        assert_relative_eq!(out.position, at(1.0).position, epsilon = 1.0e-3);
    }

    #[test]
    fn reset_reseeds_history() {
        let params = SmoothingParameters::default();
        let mut filter = DoubleExponentialFilter::new();
        filter.update('x', at(0.0), &params);
        filter.update('x', at(0.5), &params);

        filter.reset(&'x');
        assert_eq!(filter.update('x', at(3.0), &params), at(3.0));
    }

    #[test]
    fn diverging_parameters_are_rejected() {
        let params = SmoothingParameters {
            smoothing: 2.5,
            correction: 1.9,
            ..SmoothingParameters::default()
        };
        assert!(matches!(
            params.validated(),
            Err(SmoothingError::FactorOutOfRange { name: "smoothing", .. })
        ));

        let params = SmoothingParameters {
            jitter_radius: -0.1,
            ..SmoothingParameters::default()
        };
        assert!(matches!(
            params.validated(),
            Err(SmoothingError::InvalidRadius { name: "jitter_radius", .. })
        ));

        let params = SmoothingParameters {
            prediction: f32::NAN,
            ..SmoothingParameters::default()
        };
        assert!(params.validated().is_err());

        assert!(SmoothingParameters::default().validated().is_ok());
    }

    #[test]
    fn deserialization_validates() {
        let params: SmoothingParameters =
            ron::de::from_str("(jitter_radius: 0.1)").unwrap();
        assert_eq!(params.jitter_radius, 0.1);
        assert_eq!(params.smoothing, 0.25);

        assert!(ron::de::from_str::<SmoothingParameters>(
            "(smoothing: 2.5, correction: 1.9)"
        )
        .is_err());
    }
}
