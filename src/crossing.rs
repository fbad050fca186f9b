use std::collections::HashMap;

use serde_derive::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::track::{CountPolicy, Direction, Sign, TrackState};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct CrossingEvent {
    pub track_id: u64,
    pub direction: Direction,
    pub frame_index: Option<u64>,
    pub oriented_distance: f32,
}

/// Per-track crossing detector over oriented signed distances.
///
/// A positive to negative flip is IN, negative to positive is OUT. Samples
/// that land on the curve (or inside the dead band) never become the
/// reference side, so `+, 0, -` is one crossing and `0, -` is none.
#[derive(Debug, Clone, Default)]
pub struct TrackStateMachine {
    tracks: HashMap<u64, TrackState>,
    dead_band: f32,
    policy: CountPolicy,
}

impl TrackStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// `dead_band` is the distance a track has to move past the curve before
    /// it counts as being on the other side. Zero disables it.
    pub fn with_options(dead_band: f32, policy: CountPolicy) -> Self {
        Self {
            tracks: HashMap::new(),
            dead_band: dead_band.max(0.0),
            policy,
        }
    }

    #[inline]
    pub fn dead_band(&self) -> f32 {
        self.dead_band
    }

    #[inline]
    pub fn policy(&self) -> CountPolicy {
        self.policy
    }

    /// Non-finite distances are dropped without touching the track.
    pub fn update(&mut self, track_id: u64, oriented_distance: f32) -> Option<CrossingEvent> {
        if !oriented_distance.is_finite() {
            debug!(track_id, oriented_distance, "non-finite distance ignored");
            return None;
        }

        let current = Sign::with_dead_band(oriented_distance, self.dead_band);
        let state = self.tracks.entry(track_id).or_default();

        let direction = state.advance(current, self.policy)?;
        debug!(track_id, direction = direction.as_str(), "crossing");

        Some(CrossingEvent {
            track_id,
            direction,
            frame_index: state.last_frame,
            oriented_distance,
        })
    }

    /// Like [`update`](Self::update) but rejects samples older than the last
    /// one seen for the track. A rejected sample leaves the track untouched.
    pub fn update_at(
        &mut self,
        track_id: u64,
        frame_index: u64,
        oriented_distance: f32,
    ) -> Result<Option<CrossingEvent>> {
        if let Some(last_frame) = self.tracks.get(&track_id).and_then(|s| s.last_frame) {
            if frame_index < last_frame {
                warn!(track_id, frame_index, last_frame, "out of order observation");

                return Err(Error::OutOfOrderFrame {
                    track_id,
                    frame_index,
                    last_frame,
                });
            }
        }

        if !oriented_distance.is_finite() {
            debug!(track_id, frame_index, oriented_distance, "non-finite distance ignored");
            return Ok(None);
        }

        self.tracks.entry(track_id).or_default().last_frame = Some(frame_index);

        Ok(self.update(track_id, oriented_distance))
    }

    /// Drops the state of a track the tracker no longer reports.
    pub fn remove(&mut self, track_id: u64) -> Option<TrackState> {
        self.tracks.remove(&track_id)
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    #[inline]
    pub fn state(&self, track_id: u64) -> Option<&TrackState> {
        self.tracks.get(&track_id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
