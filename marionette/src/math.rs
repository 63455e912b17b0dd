use {nalgebra as na, std::f32::consts::PI};

/// Norms below this value are treated as zero.
pub const NORM_EPSILON: f32 = 1.0e-6;

#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
pub enum MathError {
    #[error("Zero-length vector {{{vector:?}}} cannot be normalized")]
    ZeroVector { vector: na::Vector3<f32> },

    #[error("Zero-norm quaternion {{{quaternion:?}}} cannot be normalized")]
    ZeroQuaternion { quaternion: na::Quaternion<f32> },

    #[error("Vectors {{{a:?}}} and {{{b:?}}} are collinear and do not span a basis")]
    Collinear {
        a: na::Vector3<f32>,
        b: na::Vector3<f32>,
    },
}

bitflags::bitflags! {
    /// Components of a quaternion to negate when converting between
    /// coordinate system conventions.
    pub struct QuatFlip: u8 {
        const X = 0b0001;
        const Y = 0b0010;
        const Z = 0b0100;
        const W = 0b1000;
    }
}

pub fn normalize(
    vector: &na::Vector3<f32>,
) -> Result<na::Unit<na::Vector3<f32>>, MathError> {
    na::Unit::try_new(*vector, NORM_EPSILON)
        .ok_or(MathError::ZeroVector { vector: *vector })
}

pub fn normalize_quaternion(
    quaternion: &na::Quaternion<f32>,
) -> Result<na::UnitQuaternion<f32>, MathError> {
    if quaternion.norm() <= NORM_EPSILON {
        return Err(MathError::ZeroQuaternion {
            quaternion: *quaternion,
        });
    }
    Ok(na::UnitQuaternion::from_quaternion(*quaternion))
}

/// Negates selected components of the quaternion.
pub fn flip_quaternion(
    quaternion: &na::Quaternion<f32>,
    flip: QuatFlip,
) -> na::Quaternion<f32> {
    let sign = |flag: QuatFlip| -> f32 {
        if flip.contains(flag) {
            -1.0
        } else {
            1.0
        }
    };

    na::Quaternion::new(
        quaternion.w * sign(QuatFlip::W),
        quaternion.i * sign(QuatFlip::X),
        quaternion.j * sign(QuatFlip::Y),
        quaternion.k * sign(QuatFlip::Z),
    )
}

/// Mirrors position across the YZ plane.
pub fn mirror_position(position: &na::Vector3<f32>) -> na::Vector3<f32> {
    na::Vector3::new(-position.x, position.y, position.z)
}

/// Rotation whose local Z axis points along `forward`
/// and whose local Y axis is as close to `up` as possible.
pub fn look_rotation(
    forward: &na::Vector3<f32>,
    up: &na::Vector3<f32>,
) -> Result<na::UnitQuaternion<f32>, MathError> {
    let z = normalize(forward)?.into_inner();
    let x = na::Unit::try_new(up.cross(&z), NORM_EPSILON)
        .ok_or(MathError::Collinear {
            a: *forward,
            b: *up,
        })?
        .into_inner();
    let y = z.cross(&x);

    let basis = na::Matrix3::from_columns(&[x, y, z]);
    let rotation = na::Rotation3::from_matrix_unchecked(basis);
    Ok(na::UnitQuaternion::from_rotation_matrix(&rotation))
}

/// Rotation that re-expresses sensor space samples in a frame
/// where the floor normal is world up.
///
/// Right axis is `up x forward`, then forward is re-derived as `right x up`
/// so that the frame stays orthogonal when the floor is tilted.
/// Look rotation is built with forward Y and up Z negated to go from
/// the sensor's right-handed convention to the rig's one.
pub fn floor_correction(
    normal: &na::Unit<na::Vector3<f32>>,
) -> Result<na::UnitQuaternion<f32>, MathError> {
    let up = normal.into_inner();
    let right = up.cross(&na::Vector3::z());
    let forward = right.cross(&up);

    look_rotation(
        &na::Vector3::new(forward.x, -forward.y, forward.z),
        &na::Vector3::new(up.x, up.y, -up.z),
    )
}

/// Shortest arc rotation from `from` to `to`.
/// Opposite vectors are rotated by half a turn about any perpendicular axis.
pub fn from_to_rotation(
    from: &na::Vector3<f32>,
    to: &na::Vector3<f32>,
) -> Result<na::UnitQuaternion<f32>, MathError> {
    let from = normalize(from)?;
    let to = normalize(to)?;

    match na::UnitQuaternion::rotation_between_axis(&from, &to) {
        Some(rotation) => Ok(rotation),
        None => {
            let axis = match na::Unit::try_new(
                from.cross(&na::Vector3::x()),
                NORM_EPSILON,
            ) {
                Some(axis) => axis,
                None => normalize(&from.cross(&na::Vector3::y()))?,
            };
            Ok(na::UnitQuaternion::from_axis_angle(&axis, PI))
        }
    }
}

/// Rotation that maps `from_up` onto `to_up` and then turns around `to_up`
/// until rotated `from_forward` matches `to_forward` on the plane
/// perpendicular to `to_up`.
pub fn align_rotation(
    from_up: &na::Vector3<f32>,
    to_up: &na::Vector3<f32>,
    from_forward: &na::Vector3<f32>,
    to_forward: &na::Vector3<f32>,
) -> Result<na::UnitQuaternion<f32>, MathError> {
    let up_rotation = from_to_rotation(from_up, to_up)?;
    let axis = normalize(to_up)?;
    let up = axis.into_inner();

    let forward = up_rotation * from_forward;
    let aligned_from = forward - up * forward.dot(&up);
    let aligned_to = to_forward - up * to_forward.dot(&up);

    let forward_rotation = match na::UnitQuaternion::rotation_between(
        &aligned_from,
        &aligned_to,
    ) {
        Some(rotation) => rotation,
        None if aligned_from.norm() <= NORM_EPSILON
            || aligned_to.norm() <= NORM_EPSILON =>
        {
            return Err(MathError::Collinear {
                a: *from_forward,
                b: up,
            })
        }
        None => na::UnitQuaternion::from_axis_angle(&axis, PI),
    };

    Ok(forward_rotation * up_rotation)
}
