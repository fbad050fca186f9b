use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

/// One tracker output: (x,y) of the bbox center, (width,height) and the
/// identity the tracker assigned to it.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    #[serde(rename = "id")]
    pub track_id: u64,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    #[serde(rename = "p", default = "full_confidence")]
    pub confidence: f32,
}

fn full_confidence() -> f32 {
    1.0
}

impl Detection {
    /// Bottom-center of the bbox, where a person touches the ground.
    #[inline(always)]
    pub fn anchor(&self) -> na::Point2<f32> {
        na::Point2::new(self.x, self.ymax())
    }

    #[inline]
    pub fn observation(&self, frame_index: u64) -> AnchorObservation {
        AnchorObservation::new(self.track_id, self.anchor(), frame_index)
    }

    #[inline(always)]
    pub fn ymax(&self) -> f32 {
        self.y + self.h / 2.
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorObservation {
    pub track_id: u64,
    pub point: na::Point2<f32>,
    pub frame_index: u64,
}

impl AnchorObservation {
    #[inline]
    pub fn new(track_id: u64, point: na::Point2<f32>, frame_index: u64) -> Self {
        Self {
            track_id,
            point,
            frame_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_is_bottom_center() {
        let det = Detection {
            track_id: 3,
            x: 100.0,
            y: 50.0,
            w: 20.0,
            h: 40.0,
            confidence: 0.9,
        };

        assert_eq!(det.anchor(), na::Point2::new(100.0, 70.0));

        let obs = det.observation(12);
        assert_eq!(obs.track_id, 3);
        assert_eq!(obs.frame_index, 12);
        assert_eq!(obs.point, det.anchor());
    }

    #[test]
    fn test_parse_tracker_dump() {
        let dets: Vec<Detection> =
            serde_json::from_str(r#"[{"id":7,"x":10,"y":20,"w":4,"h":8}]"#).unwrap();

        assert_eq!(dets[0].track_id, 7);
        assert_eq!(dets[0].confidence, 1.0);
        assert_eq!(dets[0].anchor(), na::Point2::new(10.0, 24.0));
    }
}
