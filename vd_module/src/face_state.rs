//! The face state record published by the Virtual Desktop Streamer.
//!
//! The streamer writes a fixed `#[repr(C)]` record into named shared memory.
//! We never hold a reference into that memory across ticks: each read copies
//! the bytes out and decodes them into an owned [`FaceState`].

use anyhow::{bail, Result};
use glam::{Quat, Vec3};

pub const EXPRESSION_COUNT: usize = 70;
pub const CONFIDENCE_COUNT: usize = 2;

/// Raw expression channels, indexed the way the streamer lays out
/// `expression_weights`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Expressions {
    BrowLowererL = 0,
    BrowLowererR,
    CheekPuffL,
    CheekPuffR,
    CheekRaiserL,
    CheekRaiserR,
    CheekSuckL,
    CheekSuckR,
    ChinRaiserB,
    ChinRaiserT,
    DimplerL,
    DimplerR,
    EyesClosedL,
    EyesClosedR,
    EyesLookDownL,
    EyesLookDownR,
    EyesLookLeftL,
    EyesLookLeftR,
    EyesLookRightL,
    EyesLookRightR,
    EyesLookUpL,
    EyesLookUpR,
    InnerBrowRaiserL,
    InnerBrowRaiserR,
    JawDrop,
    JawSidewaysLeft,
    JawSidewaysRight,
    JawThrust,
    LidTightenerL,
    LidTightenerR,
    LipCornerDepressorL,
    LipCornerDepressorR,
    LipCornerPullerL,
    LipCornerPullerR,
    LipFunnelerLb,
    LipFunnelerLt,
    LipFunnelerRb,
    LipFunnelerRt,
    LipPressorL,
    LipPressorR,
    LipPuckerL,
    LipPuckerR,
    LipStretcherL,
    LipStretcherR,
    LipSuckLb,
    LipSuckLt,
    LipSuckRb,
    LipSuckRt,
    LipTightenerL,
    LipTightenerR,
    LipsToward,
    LowerLipDepressorL,
    LowerLipDepressorR,
    MouthLeft,
    MouthRight,
    NoseWrinklerL,
    NoseWrinklerR,
    OuterBrowRaiserL,
    OuterBrowRaiserR,
    UpperLidRaiserL,
    UpperLidRaiserR,
    UpperLipRaiserL,
    UpperLipRaiserR,
    TongueTipInterdental,
    TongueTipAlveolar,
    TongueFrontDorsalPalate,
    TongueMidDorsalPalate,
    TongueBackDorsalVelar,
    TongueOut,
    TongueRetreat,
}

const _: () = assert!(Expressions::TongueRetreat as usize + 1 == EXPRESSION_COUNT);

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawPose {
    pub orientation: Quaternion,
    pub position: Vector3,
}

/// Byte-exact mirror of the streamer's record. Every field is plain old data,
/// so any bit pattern is a valid value.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawFaceState {
    pub face_is_valid: u8,
    pub is_eye_following_blendshapes_valid: u8,
    pub _padding1: [u8; 2],
    pub expression_weights: [f32; EXPRESSION_COUNT],
    pub expression_confidences: [f32; CONFIDENCE_COUNT],
    pub left_eye_is_valid: u8,
    pub right_eye_is_valid: u8,
    pub _padding2: [u8; 2],
    pub left_eye_pose: RawPose,
    pub right_eye_pose: RawPose,
    pub left_eye_confidence: f32,
    pub right_eye_confidence: f32,
}

/// Size in bytes of the shared record.
pub const FACE_STATE_SIZE: usize = std::mem::size_of::<RawFaceState>();

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub orientation: Quat,
    pub position: Vec3,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            orientation: Quat::IDENTITY,
            position: Vec3::ZERO,
        }
    }
}

impl From<RawPose> for Pose {
    fn from(raw: RawPose) -> Self {
        let q = raw.orientation;
        let p = raw.position;
        Self {
            orientation: Quat::from_xyzw(q.x, q.y, q.z, q.w),
            position: Vec3::new(p.x, p.y, p.z),
        }
    }
}

/// An owned snapshot of one streamer frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceState {
    pub face_is_valid: bool,
    pub is_eye_following_blendshapes_valid: bool,
    pub expression_weights: [f32; EXPRESSION_COUNT],
    pub expression_confidences: [f32; CONFIDENCE_COUNT],
    pub left_eye_is_valid: bool,
    pub right_eye_is_valid: bool,
    pub left_eye_pose: Pose,
    pub right_eye_pose: Pose,
    pub left_eye_confidence: f32,
    pub right_eye_confidence: f32,
}

impl Default for FaceState {
    fn default() -> Self {
        Self {
            face_is_valid: false,
            is_eye_following_blendshapes_valid: false,
            expression_weights: [0.0; EXPRESSION_COUNT],
            expression_confidences: [0.0; CONFIDENCE_COUNT],
            left_eye_is_valid: false,
            right_eye_is_valid: false,
            left_eye_pose: Pose::default(),
            right_eye_pose: Pose::default(),
            left_eye_confidence: 0.0,
            right_eye_confidence: 0.0,
        }
    }
}

impl From<RawFaceState> for FaceState {
    fn from(raw: RawFaceState) -> Self {
        Self {
            face_is_valid: raw.face_is_valid != 0,
            is_eye_following_blendshapes_valid: raw.is_eye_following_blendshapes_valid != 0,
            expression_weights: raw.expression_weights,
            expression_confidences: raw.expression_confidences,
            left_eye_is_valid: raw.left_eye_is_valid != 0,
            right_eye_is_valid: raw.right_eye_is_valid != 0,
            left_eye_pose: raw.left_eye_pose.into(),
            right_eye_pose: raw.right_eye_pose.into(),
            left_eye_confidence: raw.left_eye_confidence,
            right_eye_confidence: raw.right_eye_confidence,
        }
    }
}

impl FaceState {
    /// Decodes a copy of the shared record. Extra trailing bytes are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FACE_STATE_SIZE {
            bail!(
                "face state buffer too short: expected {} bytes, got {}",
                FACE_STATE_SIZE,
                bytes.len()
            );
        }
        // SAFETY: length checked above, RawFaceState is repr(C) POD and
        // read_unaligned makes no alignment assumption about the buffer.
        let raw = unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const RawFaceState) };
        Ok(raw.into())
    }

    pub fn weight(&self, expression: Expressions) -> f32 {
        self.expression_weights[expression as usize]
    }

    pub fn eyes_valid(&self) -> bool {
        self.left_eye_is_valid || self.right_eye_is_valid
    }

    pub fn expressions_valid(&self) -> bool {
        self.face_is_valid || self.is_eye_following_blendshapes_valid
    }

    /// Whether the streamer claims any data group is meaningful.
    pub fn is_tracking(&self) -> bool {
        self.eyes_valid() || self.expressions_valid()
    }
}
