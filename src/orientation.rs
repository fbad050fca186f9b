use std::fmt;

use serde::de::IgnoredAny;
use serde_derive::{Deserialize, Serialize};

use crate::track::Sign;

pub const AUTO_CAMERA_CONVENTION: &str = "facing_entrance";

/// Multiplier applied to raw signed distances so that IN always maps to the
/// same oriented transition, whichever way the curve was drawn.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(try_from = "i8", into = "i8")]
pub enum Orientation {
    Positive,
    Negative,
}

impl Orientation {
    #[inline]
    pub fn value(self) -> i8 {
        match self {
            Orientation::Positive => 1,
            Orientation::Negative => -1,
        }
    }

    #[inline]
    pub fn apply(self, raw_distance: f32) -> f32 {
        match self {
            Orientation::Positive => raw_distance,
            Orientation::Negative => -raw_distance,
        }
    }

    pub fn from_sign(sign: Sign) -> Option<Self> {
        match sign {
            Sign::Positive => Some(Orientation::Positive),
            Sign::Negative => Some(Orientation::Negative),
            Sign::Zero => None,
        }
    }
}

impl From<Orientation> for i8 {
    fn from(o: Orientation) -> i8 {
        o.value()
    }
}

impl TryFrom<i8> for Orientation {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Orientation::Positive),
            -1 => Ok(Orientation::Negative),
            other => Err(format!("orientation must be 1 or -1, got {}", other)),
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+}", self.value())
    }
}

/// Which side of the curve counts as inside, as written in the config file.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InDirection {
    Auto,
    TowardCam,
    AwayFromCam,
    Left,
    Right,
}

impl Default for InDirection {
    fn default() -> Self {
        InDirection::Auto
    }
}

impl InDirection {
    /// Orientation fixed by the operator, `None` when it must be calibrated.
    pub fn manual_orientation(self) -> Option<Orientation> {
        match self {
            InDirection::Auto => None,
            InDirection::TowardCam | InDirection::Left | InDirection::Right => {
                Some(Orientation::Positive)
            }
            InDirection::AwayFromCam => Some(Orientation::Negative),
        }
    }

    #[inline]
    pub fn is_auto(self) -> bool {
        self == InDirection::Auto
    }
}

/// One track whose calibration samples ended on the other side of the curve.
///
/// Older configs store crossings as `[from_sample, to_sample, from_sign,
/// to_sign, weight]` arrays without a track; those load with `track_id`
/// unset.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(from = "CrossingRecord")]
pub struct CalibrationCrossing {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_id: Option<u64>,
    pub first_sign: i8,
    pub last_sign: i8,
    pub vote_weight: f32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CrossingRecord {
    Track {
        #[serde(default)]
        track_id: Option<u64>,
        first_sign: i8,
        last_sign: i8,
        vote_weight: f32,
    },
    Samples(IgnoredAny, IgnoredAny, f64, f64, f64),
}

impl From<CrossingRecord> for CalibrationCrossing {
    fn from(record: CrossingRecord) -> Self {
        match record {
            CrossingRecord::Track {
                track_id,
                first_sign,
                last_sign,
                vote_weight,
            } => Self {
                track_id,
                first_sign,
                last_sign,
                vote_weight,
            },
            CrossingRecord::Samples(_, _, from_sign, to_sign, weight) => Self {
                track_id: None,
                first_sign: Sign::of(from_sign as f32).value(),
                last_sign: Sign::of(to_sign as f32).value(),
                vote_weight: weight as f32,
            },
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct CandidateVotes {
    #[serde(rename = "+1")]
    pub positive: f32,
    #[serde(rename = "-1")]
    pub negative: f32,
}

impl CandidateVotes {
    #[inline]
    pub fn total(&self) -> f32 {
        self.positive + self.negative
    }

    /// The bucket with strictly more weight; `None` on a tie.
    pub fn winner(&self) -> Option<Orientation> {
        if self.positive > self.negative {
            Some(Orientation::Positive)
        } else if self.negative > self.positive {
            Some(Orientation::Negative)
        } else {
            None
        }
    }

    pub fn add(&mut self, bucket: Orientation, weight: f32) {
        match bucket {
            Orientation::Positive => self.positive += weight,
            Orientation::Negative => self.negative += weight,
        }
    }
}

/// Everything needed to audit an automatic orientation decision.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct CalibrationDiagnostics {
    #[serde(default)]
    pub num_samples: usize,
    #[serde(default)]
    pub num_tracks: usize,
    #[serde(default)]
    pub num_crossings: usize,
    #[serde(default)]
    pub crossings: Vec<CalibrationCrossing>,
    #[serde(default, alias = "candidates")]
    pub candidate_votes: CandidateVotes,
    #[serde(default)]
    pub orientation: Option<Orientation>,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Resolved orientation of a curve. Counting is suppressed while
/// `multiplier` is `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OrientationConfig {
    pub in_direction: InDirection,
    pub multiplier: Option<Orientation>,
    pub camera_orientation: Option<String>,
    pub diagnostics: Option<CalibrationDiagnostics>,
}

impl OrientationConfig {
    pub fn undetermined() -> Self {
        Self::default()
    }

    pub fn manual(in_direction: InDirection) -> Self {
        Self {
            in_direction,
            multiplier: in_direction.manual_orientation(),
            camera_orientation: None,
            diagnostics: None,
        }
    }

    pub fn calibrated(diagnostics: CalibrationDiagnostics) -> Self {
        Self {
            in_direction: InDirection::Auto,
            multiplier: diagnostics.orientation,
            camera_orientation: Some(AUTO_CAMERA_CONVENTION.to_string()),
            diagnostics: Some(diagnostics),
        }
    }

    #[inline]
    pub fn determined(&self) -> bool {
        self.multiplier.is_some()
    }
}
