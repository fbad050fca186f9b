pub mod calibrator;
pub mod crossing;
pub mod curve;
pub mod detection;
pub mod engine;
pub mod error;
pub mod frame;
pub mod math;
pub mod orientation;
pub mod store;
pub mod track;

mod circular_queue;

pub use calibrator::{CalibrationConfig, CalibrationStatus, OrientationCalibrator};
pub use crossing::{CrossingEvent, TrackStateMachine};
pub use curve::CurveModel;
pub use detection::{AnchorObservation, Detection};
pub use engine::{CountingEngine, Counters, EngineConfig, EngineStatus};
pub use frame::Frame;
pub use orientation::{CalibrationDiagnostics, InDirection, Orientation, OrientationConfig};
pub use store::ConfigStore;
pub use track::{CountPolicy, Direction, Sign, TrackState};

use error::Error;
use std::collections::HashMap;

pub trait Counting {
    fn update(&mut self, frames: &[Frame], src: &str) -> Result<Vec<CrossingEvent>, Error>;
    fn remove_track(&mut self, track_id: u64, src: &str);
    fn counters(&self, src: &str) -> Counters;
}

/// One independent engine per camera, keyed by source name.
pub struct MultiSourceCounter {
    engines: HashMap<String, CountingEngine>,
}

impl MultiSourceCounter {
    pub fn new() -> Self {
        Self {
            engines: HashMap::new(),
        }
    }

    pub fn add_source(&mut self, src: &str, engine: CountingEngine) -> Option<CountingEngine> {
        self.engines.insert(src.to_string(), engine)
    }

    pub fn remove_source(&mut self, src: &str) -> Option<CountingEngine> {
        self.engines.remove(src)
    }

    #[inline]
    pub fn source(&self, src: &str) -> Option<&CountingEngine> {
        self.engines.get(src)
    }

    #[inline]
    pub fn source_mut(&mut self, src: &str) -> Option<&mut CountingEngine> {
        self.engines.get_mut(src)
    }

    #[inline]
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.engines.keys().map(String::as_str)
    }
}

impl Default for MultiSourceCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl crate::Counting for MultiSourceCounter {
    fn update(&mut self, frames: &[Frame], src: &str) -> Result<Vec<CrossingEvent>, Error> {
        let engine = self
            .engines
            .get_mut(src)
            .ok_or_else(|| Error::UnknownSource(src.to_string()))?;

        let mut events = Vec::new();
        for frame in frames {
            events.extend(engine.process_frame(frame));
        }

        Ok(events)
    }

    #[inline]
    fn remove_track(&mut self, track_id: u64, src: &str) {
        if let Some(engine) = self.engines.get_mut(src) {
            engine.remove_track(track_id);
        }
    }

    #[inline]
    fn counters(&self, src: &str) -> Counters {
        self.engines
            .get(src)
            .map(CountingEngine::counters)
            .unwrap_or_default()
    }
}
