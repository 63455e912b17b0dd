use std::{fmt, str::FromStr};

pub const JOINT_COUNT: usize = 25;

/// Joints tracked by the body sensor.
/// Discriminants follow the sensor's joint numbering.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(u8)]
pub enum JointType {
    SpineBase = 0,
    SpineMid = 1,
    Neck = 2,
    Head = 3,
    ShoulderLeft = 4,
    ElbowLeft = 5,
    WristLeft = 6,
    HandLeft = 7,
    ShoulderRight = 8,
    ElbowRight = 9,
    WristRight = 10,
    HandRight = 11,
    HipLeft = 12,
    KneeLeft = 13,
    AnkleLeft = 14,
    FootLeft = 15,
    HipRight = 16,
    KneeRight = 17,
    AnkleRight = 18,
    FootRight = 19,
    SpineShoulder = 20,
    HandTipLeft = 21,
    ThumbLeft = 22,
    HandTipRight = 23,
    ThumbRight = 24,
}

/// Part of the body a joint belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Segment {
    Body,
    Head,
    LeftArm,
    LeftHand,
    RightArm,
    RightHand,
    LeftLeg,
    RightLeg,
}

/// How the sensor obtained a joint sample.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum TrackingState {
    NotTracked,
    Inferred,
    Tracked,
}

impl Default for TrackingState {
    fn default() -> Self {
        TrackingState::NotTracked
    }
}

/// Fixed skeleton hierarchy as `(joint, parent)` pairs.
/// Siblings are listed in traversal order.
pub const TOPOLOGY: [(JointType, Option<JointType>); JOINT_COUNT] = {
    use JointType::*;
    [
        (SpineBase, None),
        // left leg
        (HipLeft, Some(SpineBase)),
        (KneeLeft, Some(HipLeft)),
        (AnkleLeft, Some(KneeLeft)),
        (FootLeft, Some(AnkleLeft)),
        // right leg
        (HipRight, Some(SpineBase)),
        (KneeRight, Some(HipRight)),
        (AnkleRight, Some(KneeRight)),
        (FootRight, Some(AnkleRight)),
        // spine to head
        (SpineMid, Some(SpineBase)),
        (SpineShoulder, Some(SpineMid)),
        (Neck, Some(SpineShoulder)),
        (Head, Some(Neck)),
        // left arm
        (ShoulderLeft, Some(SpineShoulder)),
        (ElbowLeft, Some(ShoulderLeft)),
        (WristLeft, Some(ElbowLeft)),
        (HandLeft, Some(WristLeft)),
        (HandTipLeft, Some(HandLeft)),
        (ThumbLeft, Some(WristLeft)),
        // right arm
        (ShoulderRight, Some(SpineShoulder)),
        (ElbowRight, Some(ShoulderRight)),
        (WristRight, Some(ElbowRight)),
        (HandRight, Some(WristRight)),
        (HandTipRight, Some(HandRight)),
        (ThumbRight, Some(WristRight)),
    ]
};

impl JointType {
    pub const ROOT: JointType = JointType::SpineBase;

    /// All joints in numbering order.
    pub const ALL: [JointType; JOINT_COUNT] = {
        use JointType::*;
        [
            SpineBase,
            SpineMid,
            Neck,
            Head,
            ShoulderLeft,
            ElbowLeft,
            WristLeft,
            HandLeft,
            ShoulderRight,
            ElbowRight,
            WristRight,
            HandRight,
            HipLeft,
            KneeLeft,
            AnkleLeft,
            FootLeft,
            HipRight,
            KneeRight,
            AnkleRight,
            FootRight,
            SpineShoulder,
            HandTipLeft,
            ThumbLeft,
            HandTipRight,
            ThumbRight,
        ]
    };

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        use JointType::*;
        match self {
            SpineBase => "SpineBase",
            SpineMid => "SpineMid",
            Neck => "Neck",
            Head => "Head",
            ShoulderLeft => "ShoulderLeft",
            ElbowLeft => "ElbowLeft",
            WristLeft => "WristLeft",
            HandLeft => "HandLeft",
            ShoulderRight => "ShoulderRight",
            ElbowRight => "ElbowRight",
            WristRight => "WristRight",
            HandRight => "HandRight",
            HipLeft => "HipLeft",
            KneeLeft => "KneeLeft",
            AnkleLeft => "AnkleLeft",
            FootLeft => "FootLeft",
            HipRight => "HipRight",
            KneeRight => "KneeRight",
            AnkleRight => "AnkleRight",
            FootRight => "FootRight",
            SpineShoulder => "SpineShoulder",
            HandTipLeft => "HandTipLeft",
            ThumbLeft => "ThumbLeft",
            HandTipRight => "HandTipRight",
            ThumbRight => "ThumbRight",
        }
    }

    pub fn parent(self) -> Option<JointType> {
        TOPOLOGY[TOPOLOGY
            .iter()
            .position(|&(joint, _)| joint == self)
            .unwrap_or(0)]
        .1
    }

    pub fn segment(self) -> Segment {
        use JointType::*;
        match self {
            SpineBase | SpineMid | SpineShoulder => Segment::Body,
            Neck | Head => Segment::Head,
            ShoulderLeft | ElbowLeft | WristLeft => Segment::LeftArm,
            HandLeft | HandTipLeft | ThumbLeft => Segment::LeftHand,
            ShoulderRight | ElbowRight | WristRight => Segment::RightArm,
            HandRight | HandTipRight | ThumbRight => Segment::RightHand,
            HipLeft | KneeLeft | AnkleLeft | FootLeft => Segment::LeftLeg,
            HipRight | KneeRight | AnkleRight | FootRight => Segment::RightLeg,
        }
    }
}

impl fmt::Display for JointType {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("Unknown joint name '{name}'")]
pub struct UnknownJoint {
    pub name: String,
}

impl FromStr for JointType {
    type Err = UnknownJoint;

    fn from_str(name: &str) -> Result<Self, UnknownJoint> {
        JointType::ALL
            .iter()
            .copied()
            .find(|joint| joint.name() == name)
            .ok_or_else(|| UnknownJoint {
                name: name.to_owned(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbering_matches_all() {
        for (index, joint) in JointType::ALL.iter().enumerate() {
            assert_eq!(joint.index(), index);
            assert_eq!(JointType::from_index(index), Some(*joint));
        }
        assert_eq!(JointType::from_index(JOINT_COUNT), None);
    }

    #[test]
    fn names_parse_back() {
        for &joint in JointType::ALL.iter() {
            assert_eq!(joint.name().parse::<JointType>(), Ok(joint));
        }
        assert!("Tail".parse::<JointType>().is_err());
    }

    #[test]
    fn topology_declares_every_joint_once() {
        for &joint in JointType::ALL.iter() {
            let count = TOPOLOGY.iter().filter(|(j, _)| *j == joint).count();
            assert_eq!(count, 1, "{}", joint);
        }
        assert_eq!(JointType::ROOT.parent(), None);
        assert_eq!(JointType::ThumbLeft.parent(), Some(JointType::WristLeft));
        assert_eq!(
            JointType::HandTipRight.parent(),
            Some(JointType::HandRight)
        );
    }

    #[test]
    fn hands_are_separate_segments() {
        assert_eq!(JointType::WristLeft.segment(), Segment::LeftArm);
        assert_eq!(JointType::HandLeft.segment(), Segment::LeftHand);
        assert_eq!(JointType::HandRight.segment(), Segment::RightHand);
        assert_eq!(JointType::Head.segment(), Segment::Head);
        assert_eq!(JointType::FootRight.segment(), Segment::RightLeg);
    }
}
