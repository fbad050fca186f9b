use serde_derive::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::calibrator::{CalibrationConfig, CalibrationStatus, OrientationCalibrator};
use crate::circular_queue::CircularQueue;
use crate::crossing::{CrossingEvent, TrackStateMachine};
use crate::curve::CurveModel;
use crate::detection::AnchorObservation;
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::orientation::{Orientation, OrientationConfig};
use crate::store::ConfigStore;
use crate::track::{CountPolicy, Direction};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counters {
    pub in_count: u64,
    pub out_count: u64,
}

impl Counters {
    #[inline]
    pub fn record(&mut self, direction: Direction) {
        match direction {
            Direction::In => self.in_count += 1,
            Direction::Out => self.out_count += 1,
        }
    }

    #[inline]
    pub fn total(&self) -> u64 {
        self.in_count + self.out_count
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    /// Collecting the initial calibration window.
    Calibrating { num_samples: usize, budget: usize },
    /// The window is exhausted without a decision; still collecting.
    Undetermined {
        num_samples: usize,
        num_crossings: usize,
    },
    Counting { orientation: Orientation },
}

impl EngineStatus {
    #[inline]
    pub fn is_counting(&self) -> bool {
        matches!(self, EngineStatus::Counting { .. })
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub calibration: CalibrationConfig,
    pub dead_band: f32,
    pub policy: CountPolicy,
    /// Number of recent events kept for consumers.
    pub history: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            calibration: CalibrationConfig::default(),
            dead_band: 0.0,
            policy: CountPolicy::EveryCrossing,
            history: 64,
        }
    }
}

/// Counts IN/OUT crossings of one curve seen by one camera.
///
/// Until the orientation is known every observation goes to the calibrator
/// and nothing is counted. Once it is known, observations are oriented and
/// fed to the per-track state machine.
pub struct CountingEngine {
    curve: CurveModel,
    orientation: OrientationConfig,
    calibrator: Option<OrientationCalibrator>,
    status: EngineStatus,
    tracks: TrackStateMachine,
    counters: Counters,
    history: CircularQueue<CrossingEvent>,
    config: EngineConfig,
    unsaved: bool,
}

impl CountingEngine {
    pub fn new(curve: CurveModel, orientation: OrientationConfig, config: EngineConfig) -> Self {
        let mut engine = Self {
            curve,
            orientation: OrientationConfig::undetermined(),
            calibrator: None,
            status: EngineStatus::Calibrating {
                num_samples: 0,
                budget: 0,
            },
            tracks: TrackStateMachine::with_options(config.dead_band, config.policy),
            counters: Counters::default(),
            history: CircularQueue::with_capacity(config.history),
            config,
            unsaved: false,
        };
        engine.set_orientation(orientation);

        engine
    }

    /// Loads curve and orientation from `store`. Calibration is skipped when
    /// the stored config already resolves an orientation.
    pub fn from_store(store: &ConfigStore, config: EngineConfig) -> Result<Self> {
        let (curve, orientation) = store.load()?;

        Ok(Self::new(curve, orientation, config))
    }

    /// Like [`from_store`](Self::from_store), but a missing config is a first
    /// run: `curve` is saved to `store` with an undetermined orientation and
    /// calibration starts.
    pub fn from_store_or_new(
        store: &ConfigStore,
        curve: CurveModel,
        config: EngineConfig,
    ) -> Result<Self> {
        match Self::from_store(store, config.clone()) {
            Err(Error::ConfigNotFound(path)) => {
                info!(path = %path.display(), "no curve config, starting calibration");

                let engine = Self::new(curve, OrientationConfig::undetermined(), config);
                engine.save(store)?;

                Ok(engine)
            }
            other => other,
        }
    }

    fn set_orientation(&mut self, orientation: OrientationConfig) {
        match orientation.multiplier {
            Some(o) => {
                self.calibrator = None;
                self.status = EngineStatus::Counting { orientation: o };
            }
            None => {
                let calibrator = OrientationCalibrator::new(self.config.calibration.clone());
                self.status = EngineStatus::Calibrating {
                    num_samples: 0,
                    budget: calibrator.config().budget(),
                };
                self.calibrator = Some(calibrator);
            }
        }

        self.orientation = orientation;
    }

    #[inline]
    pub fn curve(&self) -> &CurveModel {
        &self.curve
    }

    #[inline]
    pub fn orientation_config(&self) -> &OrientationConfig {
        &self.orientation
    }

    #[inline]
    pub fn status(&self) -> EngineStatus {
        self.status
    }

    #[inline]
    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn reset_counters(&mut self) {
        self.counters = Counters::default();
        self.history.clear();
    }

    /// Newest first.
    #[inline]
    pub fn recent_events(&self) -> impl Iterator<Item = &CrossingEvent> {
        self.history.iter()
    }

    #[inline]
    pub fn tracks(&self) -> &TrackStateMachine {
        &self.tracks
    }

    pub fn observe(&mut self, obs: &AnchorObservation) -> Result<Option<CrossingEvent>> {
        let raw = self.curve.signed_distance(obs.point);

        let orientation = match self.orientation.multiplier {
            Some(o) => o,
            None => {
                self.calibrate(obs.track_id, raw);
                return Ok(None);
            }
        };

        let event = self
            .tracks
            .update_at(obs.track_id, obs.frame_index, orientation.apply(raw))?;

        if let Some(event) = event {
            self.counters.record(event.direction);
            self.history.push(event);
        }

        Ok(event)
    }

    fn calibrate(&mut self, track_id: u64, raw_distance: f32) {
        let status = match self.calibrator.as_mut() {
            Some(calibrator) => calibrator.push(track_id, raw_distance),
            None => return,
        };

        match status {
            CalibrationStatus::Collecting {
                num_samples,
                budget,
            } => {
                self.status = EngineStatus::Calibrating {
                    num_samples,
                    budget,
                };
            }
            CalibrationStatus::Undetermined(diag) => {
                self.status = EngineStatus::Undetermined {
                    num_samples: diag.num_samples,
                    num_crossings: diag.num_crossings,
                };
            }
            CalibrationStatus::Determined(orientation) => {
                self.set_orientation(orientation);
                self.unsaved = true;
            }
        }
    }

    /// Feeds every observation of a frame, skipping the ones rejected as out
    /// of order.
    pub fn process_frame(&mut self, frame: &Frame) -> Vec<CrossingEvent> {
        let mut events = Vec::new();

        for obs in frame.iter() {
            match self.observe(obs) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(err) => debug!(frame_index = frame.frame_index, %err, "observation skipped"),
            }
        }

        events
    }

    /// Called when the tracker drops `track_id`. Never emits an event.
    pub fn remove_track(&mut self, track_id: u64) {
        self.tracks.remove(track_id);
    }

    /// Swaps the curve, dropping every track and, unless the orientation was
    /// fixed by hand, the calibration.
    pub fn replace_curve(&mut self, curve: CurveModel) {
        self.curve = curve;
        self.tracks.clear();

        let in_direction = self.orientation.in_direction;
        self.unsaved = false;
        self.set_orientation(OrientationConfig::manual(in_direction));

        info!(
            segments = self.curve.num_segments(),
            status = ?self.status,
            "curve replaced"
        );
    }

    /// Discards an automatic orientation and starts a new calibration window.
    pub fn recalibrate(&mut self) {
        if self.orientation.in_direction.is_auto() {
            self.tracks.clear();
            self.unsaved = false;
            self.set_orientation(OrientationConfig::undetermined());
        }
    }

    #[inline]
    pub fn has_unsaved_calibration(&self) -> bool {
        self.unsaved
    }

    pub fn save(&self, store: &ConfigStore) -> Result<()> {
        store.save(&self.curve, &self.orientation)
    }

    /// Writes a freshly calibrated orientation to `store`, returning whether
    /// anything was written.
    pub fn persist(&mut self, store: &ConfigStore) -> Result<bool> {
        if !self.unsaved {
            return Ok(false);
        }

        self.save(store)?;
        self.unsaved = false;

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orientation::InDirection;
    use nalgebra as na;

    fn obs(track_id: u64, x: f32, y: f32, frame_index: u64) -> AnchorObservation {
        AnchorObservation::new(track_id, na::Point2::new(x, y), frame_index)
    }

    fn horizontal() -> CurveModel {
        CurveModel::from_pairs(&[[0.0, 0.0], [10.0, 0.0]]).unwrap()
    }

    fn engine_with_budget(max_samples: usize) -> CountingEngine {
        CountingEngine::new(
            horizontal(),
            OrientationConfig::undetermined(),
            EngineConfig {
                calibration: CalibrationConfig {
                    max_samples,
                    ..Default::default()
                },
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_manual_orientation_counts_immediately() {
        let mut engine = CountingEngine::new(
            horizontal(),
            OrientationConfig::manual(InDirection::TowardCam),
            EngineConfig::default(),
        );

        assert!(engine.status().is_counting());
        assert!(engine.observe(&obs(1, 5.0, 2.0, 0)).unwrap().is_none());

        let event = engine.observe(&obs(1, 5.0, -1.0, 1)).unwrap().unwrap();
        assert_eq!(event.direction, Direction::In);
        assert_eq!(
            engine.counters(),
            Counters {
                in_count: 1,
                out_count: 0
            }
        );
    }

    #[test]
    fn test_negative_orientation_flips_labels() {
        let mut engine = CountingEngine::new(
            horizontal(),
            OrientationConfig::manual(InDirection::AwayFromCam),
            EngineConfig::default(),
        );

        engine.observe(&obs(1, 5.0, 2.0, 0)).unwrap();
        let event = engine.observe(&obs(1, 5.0, -1.0, 1)).unwrap().unwrap();

        assert_eq!(event.direction, Direction::Out);
    }

    #[test]
    fn test_no_counting_while_undetermined() {
        let mut engine = engine_with_budget(4);

        for frame in 0..8 {
            let y = if frame % 2 == 0 { 3.0 } else { 4.0 };
            assert!(engine.observe(&obs(frame, 5.0, y, frame)).unwrap().is_none());
        }

        assert_eq!(
            engine.status(),
            EngineStatus::Undetermined {
                num_samples: 8,
                num_crossings: 0
            }
        );
        assert_eq!(engine.counters(), Counters::default());
        assert!(!engine.orientation_config().determined());
    }

    #[test]
    fn test_calibration_then_counting() {
        let mut engine = engine_with_budget(2);

        engine.observe(&obs(1, 5.0, 6.0, 0)).unwrap();
        assert_eq!(
            engine.status(),
            EngineStatus::Calibrating {
                num_samples: 1,
                budget: 2
            }
        );

        // track 1 walks from positive to negative raw distance
        engine.observe(&obs(1, 5.0, -4.0, 1)).unwrap();
        assert_eq!(
            engine.status(),
            EngineStatus::Counting {
                orientation: Orientation::Negative
            }
        );
        assert!(engine.has_unsaved_calibration());
        assert_eq!(engine.counters(), Counters::default());

        // the same walk is now an OUT under the inferred orientation
        engine.observe(&obs(2, 5.0, 6.0, 2)).unwrap();
        let event = engine.observe(&obs(2, 5.0, -4.0, 3)).unwrap().unwrap();
        assert_eq!(event.direction, Direction::Out);
        assert_eq!(engine.counters().out_count, 1);
    }

    #[test]
    fn test_process_frame_skips_out_of_order() {
        let mut engine = CountingEngine::new(
            horizontal(),
            OrientationConfig::manual(InDirection::Left),
            EngineConfig::default(),
        );

        engine.process_frame(&Frame::new(5, vec![obs(1, 5.0, 2.0, 5)]));
        let events = engine.process_frame(&Frame::new(4, vec![obs(1, 5.0, -2.0, 4)]));
        assert!(events.is_empty());

        let events = engine.process_frame(&Frame::new(6, vec![obs(1, 5.0, -2.0, 6)]));
        assert_eq!(events.len(), 1);
        assert_eq!(engine.recent_events().count(), 1);
    }

    #[test]
    fn test_nan_anchor_is_not_a_crossing() {
        let mut engine = CountingEngine::new(
            horizontal(),
            OrientationConfig::manual(InDirection::Left),
            EngineConfig::default(),
        );

        engine.observe(&obs(1, 5.0, -2.0, 0)).unwrap();
        assert!(engine
            .observe(&obs(1, f32::NAN, f32::NAN, 1))
            .unwrap()
            .is_none());
        assert_eq!(engine.counters(), Counters::default());
        assert_eq!(engine.tracks().state(1).unwrap().last_frame, Some(0));

        let event = engine.observe(&obs(1, 5.0, 2.0, 2)).unwrap().unwrap();
        assert_eq!(event.direction, Direction::Out);
    }

    #[test]
    fn test_remove_track_emits_nothing() {
        let mut engine = CountingEngine::new(
            horizontal(),
            OrientationConfig::manual(InDirection::Left),
            EngineConfig::default(),
        );

        engine.observe(&obs(1, 5.0, 2.0, 0)).unwrap();
        engine.remove_track(1);
        assert!(engine.tracks().is_empty());

        assert!(engine.observe(&obs(1, 5.0, -2.0, 1)).unwrap().is_none());
        assert_eq!(engine.counters().total(), 0);
    }

    #[test]
    fn test_replace_curve_restarts_calibration() {
        let mut engine = engine_with_budget(2);

        engine.observe(&obs(1, 5.0, 6.0, 0)).unwrap();
        engine.observe(&obs(1, 5.0, -4.0, 1)).unwrap();
        assert!(engine.status().is_counting());

        engine.replace_curve(CurveModel::from_pairs(&[[0.0, 5.0], [10.0, 5.0]]).unwrap());
        assert!(!engine.status().is_counting());
        assert!(!engine.has_unsaved_calibration());
        assert!(engine.tracks().is_empty());
    }

    #[test]
    fn test_first_run_starts_calibration() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("curve_config.json"));

        let engine =
            CountingEngine::from_store_or_new(&store, horizontal(), EngineConfig::default())
                .unwrap();
        assert!(matches!(engine.status(), EngineStatus::Calibrating { .. }));
        assert!(store.exists());

        // the saved curve wins over the one passed on later runs
        let other = CurveModel::from_pairs(&[[0.0, 5.0], [10.0, 5.0]]).unwrap();
        let engine =
            CountingEngine::from_store_or_new(&store, other, EngineConfig::default()).unwrap();
        assert_eq!(engine.curve(), &horizontal());
        assert!(!engine.orientation_config().determined());
    }

    #[test]
    fn test_reset_counters() {
        let mut engine = CountingEngine::new(
            horizontal(),
            OrientationConfig::manual(InDirection::Right),
            EngineConfig::default(),
        );

        engine.observe(&obs(1, 5.0, -2.0, 0)).unwrap();
        engine.observe(&obs(1, 5.0, 2.0, 1)).unwrap();
        assert_eq!(engine.counters().out_count, 1);

        engine.reset_counters();
        assert_eq!(engine.counters(), Counters::default());
        assert_eq!(engine.recent_events().count(), 0);
    }
}
