use serde_derive::{Deserialize, Serialize};

/// Side of the curve a distance falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sign {
    Negative,
    Zero,
    Positive,
}

impl Sign {
    /// Strict sign: only an exact zero (or NaN) maps to `Zero`.
    #[inline]
    pub fn of(d: f32) -> Self {
        Self::with_dead_band(d, 0.0)
    }

    /// Sign with a symmetric dead band around the curve; `|d| <= band` is
    /// `Zero` for a positive band.
    #[inline]
    pub fn with_dead_band(d: f32, band: f32) -> Self {
        if band > 0.0 && d.abs() <= band {
            Sign::Zero
        } else if d > 0.0 {
            Sign::Positive
        } else if d < 0.0 {
            Sign::Negative
        } else {
            Sign::Zero
        }
    }

    #[inline]
    pub fn value(self) -> i8 {
        match self {
            Sign::Negative => -1,
            Sign::Zero => 0,
            Sign::Positive => 1,
        }
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self == Sign::Zero
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "IN",
            Self::Out => "OUT",
        }
    }
}

/// Whether a track keeps being counted after its first crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountPolicy {
    /// Every full flip emits an event.
    EveryCrossing,
    /// Only the first flip of a track emits an event.
    Once,
}

impl Default for CountPolicy {
    fn default() -> Self {
        CountPolicy::EveryCrossing
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackState {
    /// Sign of the most recent sample, zero included.
    pub last_sign: Option<Sign>,
    /// Most recent nonzero sign; flips are measured against it.
    pub baseline: Option<Sign>,
    /// Set once the track has produced an event.
    pub counted: bool,
    pub crossings: u32,
    pub last_frame: Option<u64>,
}

impl TrackState {
    pub(crate) fn advance(&mut self, current: Sign, policy: CountPolicy) -> Option<Direction> {
        let flip = match (self.baseline, current) {
            (Some(Sign::Positive), Sign::Negative) => Some(Direction::In),
            (Some(Sign::Negative), Sign::Positive) => Some(Direction::Out),
            _ => None,
        };

        let event = flip.filter(|_| policy == CountPolicy::EveryCrossing || !self.counted);
        if event.is_some() {
            self.counted = true;
            self.crossings += 1;
        }

        self.last_sign = Some(current);
        if !current.is_zero() {
            self.baseline = Some(current);
        }

        event
    }
}
