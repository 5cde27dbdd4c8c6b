//! Static mapping from unified channels to streamer channels.
//!
//! Credit https://github.com/regzo2/VRCFaceTracking-QuestProOpenXR for the
//! conversion from OpenXR weights to unified shapes.

use crate::face_state::{Expressions, FaceState};
use api::UnifiedExpressions;
use std::sync::OnceLock;

/// `(unified, raw)` pairs. Channels absent here are unmapped and read as 0.
const VD_MAPPINGS: &[(UnifiedExpressions, Expressions)] = &[
    // Eye
    (UnifiedExpressions::EyeWideLeft, Expressions::UpperLidRaiserL),
    (UnifiedExpressions::EyeWideRight, Expressions::UpperLidRaiserR),
    (UnifiedExpressions::EyeSquintLeft, Expressions::LidTightenerL),
    (UnifiedExpressions::EyeSquintRight, Expressions::LidTightenerR),
    // Brow
    (UnifiedExpressions::BrowInnerUpLeft, Expressions::InnerBrowRaiserL),
    (UnifiedExpressions::BrowInnerUpRight, Expressions::InnerBrowRaiserR),
    (UnifiedExpressions::BrowOuterUpLeft, Expressions::OuterBrowRaiserL),
    (UnifiedExpressions::BrowOuterUpRight, Expressions::OuterBrowRaiserR),
    (UnifiedExpressions::BrowPinchLeft, Expressions::BrowLowererL),
    (UnifiedExpressions::BrowLowererLeft, Expressions::BrowLowererL),
    (UnifiedExpressions::BrowPinchRight, Expressions::BrowLowererR),
    (UnifiedExpressions::BrowLowererRight, Expressions::BrowLowererR),
    // Jaw
    (UnifiedExpressions::JawOpen, Expressions::JawDrop),
    (UnifiedExpressions::JawLeft, Expressions::JawSidewaysLeft),
    (UnifiedExpressions::JawRight, Expressions::JawSidewaysRight),
    (UnifiedExpressions::JawForward, Expressions::JawThrust),
    // Mouth
    (UnifiedExpressions::MouthClosed, Expressions::LipsToward),
    (UnifiedExpressions::MouthUpperLeft, Expressions::MouthLeft),
    (UnifiedExpressions::MouthLowerLeft, Expressions::MouthLeft),
    (UnifiedExpressions::MouthUpperRight, Expressions::MouthRight),
    (UnifiedExpressions::MouthLowerRight, Expressions::MouthRight),
    (UnifiedExpressions::MouthCornerPullLeft, Expressions::LipCornerPullerL),
    // Slant (sharp corner raiser) is baked into the corner puller.
    (UnifiedExpressions::MouthCornerSlantLeft, Expressions::LipCornerPullerL),
    (UnifiedExpressions::MouthCornerPullRight, Expressions::LipCornerPullerR),
    (UnifiedExpressions::MouthCornerSlantRight, Expressions::LipCornerPullerR),
    (UnifiedExpressions::MouthFrownLeft, Expressions::LipCornerDepressorL),
    (UnifiedExpressions::MouthFrownRight, Expressions::LipCornerDepressorR),
    (UnifiedExpressions::MouthLowerDownLeft, Expressions::LowerLipDepressorL),
    (UnifiedExpressions::MouthLowerDownRight, Expressions::LowerLipDepressorR),
    (UnifiedExpressions::MouthRaiserUpper, Expressions::ChinRaiserT),
    (UnifiedExpressions::MouthRaiserLower, Expressions::ChinRaiserB),
    (UnifiedExpressions::MouthDimpleLeft, Expressions::DimplerL),
    (UnifiedExpressions::MouthDimpleRight, Expressions::DimplerR),
    (UnifiedExpressions::MouthTightenerLeft, Expressions::LipTightenerL),
    (UnifiedExpressions::MouthTightenerRight, Expressions::LipTightenerR),
    (UnifiedExpressions::MouthPressLeft, Expressions::LipPressorL),
    (UnifiedExpressions::MouthPressRight, Expressions::LipPressorR),
    (UnifiedExpressions::MouthStretchLeft, Expressions::LipStretcherL),
    (UnifiedExpressions::MouthStretchRight, Expressions::LipStretcherR),
    // Lip
    (UnifiedExpressions::LipPuckerUpperRight, Expressions::LipPuckerR),
    (UnifiedExpressions::LipPuckerLowerRight, Expressions::LipPuckerR),
    (UnifiedExpressions::LipPuckerUpperLeft, Expressions::LipPuckerL),
    (UnifiedExpressions::LipPuckerLowerLeft, Expressions::LipPuckerL),
    (UnifiedExpressions::LipFunnelUpperLeft, Expressions::LipFunnelerLt),
    (UnifiedExpressions::LipFunnelUpperRight, Expressions::LipFunnelerRt),
    (UnifiedExpressions::LipFunnelLowerLeft, Expressions::LipFunnelerLb),
    (UnifiedExpressions::LipFunnelLowerRight, Expressions::LipFunnelerRb),
    (UnifiedExpressions::LipSuckLowerLeft, Expressions::LipSuckLb),
    (UnifiedExpressions::LipSuckLowerRight, Expressions::LipSuckRb),
    // Cheek
    (UnifiedExpressions::CheekPuffLeft, Expressions::CheekPuffL),
    (UnifiedExpressions::CheekPuffRight, Expressions::CheekPuffR),
    (UnifiedExpressions::CheekSuckLeft, Expressions::CheekSuckL),
    (UnifiedExpressions::CheekSuckRight, Expressions::CheekSuckR),
    (UnifiedExpressions::CheekSquintLeft, Expressions::CheekRaiserL),
    (UnifiedExpressions::CheekSquintRight, Expressions::CheekRaiserR),
    // Nose
    (UnifiedExpressions::NoseSneerLeft, Expressions::NoseWrinklerL),
    (UnifiedExpressions::NoseSneerRight, Expressions::NoseWrinklerR),
];

/// Total function from unified channel to raw channel (or none).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingTable {
    entries: [Option<Expressions>; UnifiedExpressions::COUNT],
}

impl MappingTable {
    pub fn build() -> Self {
        let mut entries = [None; UnifiedExpressions::COUNT];
        for &(unified, raw) in VD_MAPPINGS {
            entries[unified as usize] = Some(raw);
        }
        Self { entries }
    }

    /// The process-wide table, built on first use.
    pub fn shared() -> &'static MappingTable {
        static TABLE: OnceLock<MappingTable> = OnceLock::new();
        TABLE.get_or_init(Self::build)
    }

    pub fn source(&self, unified: UnifiedExpressions) -> Option<Expressions> {
        self.entries.get(unified as usize).copied().flatten()
    }

    pub fn lookup(&self, state: &FaceState, unified: UnifiedExpressions) -> f32 {
        self.source(unified).map_or(0.0, |raw| state.weight(raw))
    }
}

impl Default for MappingTable {
    fn default() -> Self {
        Self::build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face_state::EXPRESSION_COUNT;

    fn saturated_state() -> FaceState {
        FaceState {
            expression_weights: [1.0; EXPRESSION_COUNT],
            ..FaceState::default()
        }
    }

    #[test]
    fn unmapped_channels_always_read_zero() {
        let table = MappingTable::build();
        let state = saturated_state();
        let unmapped: Vec<_> = UnifiedExpressions::all()
            .filter(|u| table.source(*u).is_none())
            .collect();

        assert!(unmapped.contains(&UnifiedExpressions::TongueOut));
        assert!(unmapped.contains(&UnifiedExpressions::MouthUpperUpLeft));
        for unified in unmapped {
            assert_eq!(table.lookup(&state, unified), 0.0, "{:?}", unified);
        }
    }

    #[test]
    fn slant_aliases_corner_puller() {
        let table = MappingTable::build();
        let mut state = FaceState::default();
        state.expression_weights[Expressions::LipCornerPullerL as usize] = 0.6;

        assert_eq!(table.lookup(&state, UnifiedExpressions::MouthCornerPullLeft), 0.6);
        assert_eq!(table.lookup(&state, UnifiedExpressions::MouthCornerSlantLeft), 0.6);
        assert_eq!(table.lookup(&state, UnifiedExpressions::MouthCornerPullRight), 0.0);
    }

    #[test]
    fn lookup_is_independent_of_call_order() {
        let table = MappingTable::shared();
        let mut state = FaceState::default();
        for (i, w) in state.expression_weights.iter_mut().enumerate() {
            *w = i as f32 / EXPRESSION_COUNT as f32;
        }

        let forward: Vec<f32> = UnifiedExpressions::all()
            .map(|u| table.lookup(&state, u))
            .collect();
        let mut backward: Vec<f32> = UnifiedExpressions::all()
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .map(|u| table.lookup(&state, u))
            .collect();
        backward.reverse();

        assert_eq!(forward, backward);
        assert_eq!(MappingTable::build(), *table);
    }

    #[test]
    fn no_channel_is_mapped_twice() {
        let mut seen = std::collections::HashSet::new();
        for (unified, _) in VD_MAPPINGS {
            assert!(seen.insert(*unified), "{:?} mapped twice", unified);
        }
    }
}
