use crate::detection::{AnchorObservation, Detection};

/// Everything the tracker reported for one video frame.
pub struct Frame {
    pub frame_index: u64,
    pub observations: Vec<AnchorObservation>,
}

impl Frame {
    pub fn new(frame_index: u64, observations: Vec<AnchorObservation>) -> Self {
        Self {
            frame_index,
            observations,
        }
    }

    pub fn from_detections(frame_index: u64, detections: &[Detection]) -> Self {
        Self {
            frame_index,
            observations: detections
                .iter()
                .map(|d| d.observation(frame_index))
                .collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &AnchorObservation> {
        self.observations.iter()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    #[inline]
    pub fn track_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.observations.iter().map(|o| o.track_id)
    }
}
