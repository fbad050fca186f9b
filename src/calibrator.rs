use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::orientation::{
    CalibrationCrossing, CalibrationDiagnostics, CandidateVotes, Orientation, OrientationConfig,
};
use crate::track::Sign;

const BIAS_WARNING_CONFIDENCE: f32 = 0.95;

pub const NOTE_NOT_ENOUGH_CROSSINGS: &str = "not_enough_crossings";
pub const NOTE_TIE: &str = "tie";
pub const NOTE_UNBALANCED: &str = "unbalanced_samples";
pub const NOTE_CHECK_FOR_BIAS: &str = "high_confidence_check_for_bias";

#[derive(Debug, Clone)]
pub struct CalibrationConfig {
    /// Samples collected before the first decision is attempted.
    pub max_samples: usize,
    /// Tracks that must have ended on the other side of the curve.
    pub min_crossings: usize,
    /// Lower bound on samples regardless of `max_samples`.
    pub min_samples: usize,
    /// Samples closer to the curve than this are ignored.
    pub epsilon: f32,
    /// Refuse to decide until both candidates have some support.
    pub require_balance: bool,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            max_samples: 300,
            min_crossings: 1,
            min_samples: 1,
            epsilon: 0.0,
            require_balance: false,
        }
    }
}

impl CalibrationConfig {
    /// Samples needed before a decision is attempted.
    #[inline]
    pub fn budget(&self) -> usize {
        self.max_samples.max(self.min_samples)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationStatus {
    Collecting { num_samples: usize, budget: usize },
    /// Carries the vote summary only; `crossings` is left empty.
    /// `OrientationCalibrator::evaluate` lists them.
    Undetermined(CalibrationDiagnostics),
    Determined(OrientationConfig),
}

impl CalibrationStatus {
    #[inline]
    pub fn is_determined(&self) -> bool {
        matches!(self, CalibrationStatus::Determined(_))
    }
}

#[derive(Debug, Clone, Copy)]
struct TrackSamples {
    first: f32,
    last: f32,
}

impl TrackSamples {
    /// The bucket this track votes for and its weight, if its samples sit on
    /// opposite sides of the curve.
    fn vote(&self) -> Option<(Orientation, f32)> {
        let first = Sign::of(self.first);
        let last = Sign::of(self.last);

        if first.is_zero() || first == last {
            return None;
        }

        Orientation::from_sign(last).map(|bucket| (bucket, (self.last - self.first).abs()))
    }
}

/// Vote totals kept up to date on every sample, so deciding does not rescan
/// every track.
#[derive(Debug, Clone, Copy, Default)]
struct RunningVotes {
    positive: f64,
    negative: f64,
    num_positive: usize,
    num_negative: usize,
}

impl RunningVotes {
    fn add(&mut self, bucket: Orientation, weight: f32) {
        match bucket {
            Orientation::Positive => {
                self.positive += weight as f64;
                self.num_positive += 1;
            }
            Orientation::Negative => {
                self.negative += weight as f64;
                self.num_negative += 1;
            }
        }
    }

    fn retract(&mut self, bucket: Orientation, weight: f32) {
        match bucket {
            Orientation::Positive => {
                self.num_positive -= 1;
                self.positive = if self.num_positive == 0 {
                    0.0
                } else {
                    self.positive - weight as f64
                };
            }
            Orientation::Negative => {
                self.num_negative -= 1;
                self.negative = if self.num_negative == 0 {
                    0.0
                } else {
                    self.negative - weight as f64
                };
            }
        }
    }

    #[inline]
    fn num_crossings(&self) -> usize {
        self.num_positive + self.num_negative
    }

    #[inline]
    fn candidate_votes(&self) -> CandidateVotes {
        CandidateVotes {
            positive: self.positive as f32,
            negative: self.negative as f32,
        }
    }
}

/// Infers which sign of the raw signed distance is the inside of the curve
/// from the first tracks that walk across it.
///
/// Every track contributes its first and last sample. Tracks whose two
/// samples sit on opposite sides vote for the side they ended on, weighted by
/// how far they travelled across. The heavier side wins; a tie or too few
/// crossings leaves the orientation undetermined and the window keeps
/// growing.
///
/// The result follows the traffic seen during calibration: if everybody
/// walked the same way, that way becomes the reference. `require_balance`
/// and the diagnostics notes exist to catch this.
///
/// Each sample costs O(log n) in the number of tracks seen. Only a decision
/// walks every track to build the crossing list. While the window keeps
/// extending the first/last pair of every track is retained.
#[derive(Debug, Clone, Default)]
pub struct OrientationCalibrator {
    config: CalibrationConfig,
    num_samples: usize,
    exhausted: bool,
    decided: bool,
    tracks: BTreeMap<u64, TrackSamples>,
    votes: RunningVotes,
}

impl OrientationCalibrator {
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    #[inline]
    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    #[inline]
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Abandons the current window.
    pub fn reset(&mut self) {
        self.num_samples = 0;
        self.exhausted = false;
        self.decided = false;
        self.tracks.clear();
        self.votes = RunningVotes::default();
    }

    /// Adds the raw (un-oriented) signed distance of one anchor.
    pub fn push(&mut self, track_id: u64, raw_distance: f32) -> CalibrationStatus {
        self.num_samples += 1;

        if raw_distance.is_finite() && raw_distance.abs() >= self.config.epsilon {
            match self.tracks.entry(track_id) {
                Entry::Occupied(mut entry) => {
                    let samples = entry.get_mut();
                    if let Some((bucket, weight)) = samples.vote() {
                        self.votes.retract(bucket, weight);
                    }
                    samples.last = raw_distance;
                    if let Some((bucket, weight)) = samples.vote() {
                        self.votes.add(bucket, weight);
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert(TrackSamples {
                        first: raw_distance,
                        last: raw_distance,
                    });
                }
            }
        }

        let status = self.status();
        self.announce(&status);

        status
    }

    /// Where calibration stands after the samples pushed so far.
    pub fn status(&self) -> CalibrationStatus {
        let budget = self.config.budget();
        if self.num_samples < budget {
            return CalibrationStatus::Collecting {
                num_samples: self.num_samples,
                budget,
            };
        }

        let summary = self.summary();
        if summary.orientation.is_none() {
            return CalibrationStatus::Undetermined(summary);
        }

        let diagnostics = self.evaluate();
        match diagnostics.orientation {
            Some(_) => CalibrationStatus::Determined(OrientationConfig::calibrated(diagnostics)),
            None => CalibrationStatus::Undetermined(diagnostics),
        }
    }

    /// Logs the first decision and the first exhausted window.
    fn announce(&mut self, status: &CalibrationStatus) {
        match status {
            CalibrationStatus::Collecting { .. } => {}
            CalibrationStatus::Determined(config) => {
                if self.decided {
                    return;
                }
                self.decided = true;

                let diag = match config.diagnostics.as_ref() {
                    Some(diag) => diag,
                    None => return,
                };

                info!(
                    orientation = ?config.multiplier.map(Orientation::value),
                    num_samples = diag.num_samples,
                    num_crossings = diag.num_crossings,
                    confidence = diag.confidence,
                    "orientation calibrated"
                );

                if diag.notes.iter().any(|n| n == NOTE_CHECK_FOR_BIAS) {
                    warn!(
                        confidence = diag.confidence,
                        num_crossings = diag.num_crossings,
                        "calibration traffic is one-directional, orientation may reflect that bias"
                    );
                }
            }
            CalibrationStatus::Undetermined(diag) => {
                if !self.exhausted {
                    debug!(
                        num_samples = diag.num_samples,
                        num_crossings = diag.num_crossings,
                        notes = ?diag.notes,
                        "calibration budget exhausted, extending window"
                    );
                    self.exhausted = true;
                }
            }
        }
    }

    /// Diagnostics from the running totals, without the crossing list.
    fn summary(&self) -> CalibrationDiagnostics {
        let mut diag = CalibrationDiagnostics {
            num_samples: self.num_samples,
            num_tracks: self.tracks.len(),
            num_crossings: self.votes.num_crossings(),
            candidate_votes: self.votes.candidate_votes(),
            ..Default::default()
        };
        self.judge(&mut diag);

        diag
    }

    /// Builds diagnostics from everything collected so far.
    pub fn evaluate(&self) -> CalibrationDiagnostics {
        let mut diag = CalibrationDiagnostics {
            num_samples: self.num_samples,
            num_tracks: self.tracks.len(),
            ..Default::default()
        };

        for (&track_id, s) in &self.tracks {
            if let Some((bucket, vote_weight)) = s.vote() {
                diag.candidate_votes.add(bucket, vote_weight);
                diag.crossings.push(CalibrationCrossing {
                    track_id: Some(track_id),
                    first_sign: Sign::of(s.first).value(),
                    last_sign: Sign::of(s.last).value(),
                    vote_weight,
                });
            }
        }

        diag.num_crossings = diag.crossings.len();
        self.judge(&mut diag);

        diag
    }

    /// Fills `orientation`, `confidence` and `notes` from the vote totals.
    fn judge(&self, diag: &mut CalibrationDiagnostics) {
        let votes = diag.candidate_votes;
        let winner = votes.winner();

        if let Some(w) = winner {
            let total = votes.total();
            if total > 0.0 {
                diag.confidence = match w {
                    Orientation::Positive => votes.positive / total,
                    Orientation::Negative => votes.negative / total,
                };
            }
        }

        if diag.num_crossings < self.config.min_crossings || diag.num_crossings == 0 {
            diag.notes.push(NOTE_NOT_ENOUGH_CROSSINGS.to_string());
        } else if self.config.require_balance && (votes.positive <= 0.0 || votes.negative <= 0.0)
        {
            diag.notes.push(NOTE_UNBALANCED.to_string());
        } else if winner.is_none() {
            diag.notes.push(NOTE_TIE.to_string());
        } else {
            diag.orientation = winner;

            if diag.confidence > BIAS_WARNING_CONFIDENCE {
                diag.notes.push(NOTE_CHECK_FOR_BIAS.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn config(max_samples: usize, min_crossings: usize) -> CalibrationConfig {
        CalibrationConfig {
            max_samples,
            min_crossings,
            ..Default::default()
        }
    }

    #[test]
    fn test_collecting_until_budget() {
        let mut cal = OrientationCalibrator::new(config(3, 1));

        assert_eq!(
            cal.push(1, 5.0),
            CalibrationStatus::Collecting {
                num_samples: 1,
                budget: 3
            }
        );
        assert!(matches!(
            cal.push(1, -5.0),
            CalibrationStatus::Collecting { .. }
        ));
        assert!(cal.push(1, -6.0).is_determined());
    }

    #[test]
    fn test_single_negative_vote_resolves_to_negative() {
        let mut cal = OrientationCalibrator::new(config(2, 1));

        cal.push(4, 60.0);
        let status = cal.push(4, -54.93);

        let config = match status {
            CalibrationStatus::Determined(config) => config,
            other => panic!("expected determined, got {:?}", other),
        };

        assert_eq!(config.multiplier, Some(Orientation::Negative));
        let diag = config.diagnostics.unwrap();
        assert_eq!(diag.num_crossings, 1);
        assert_relative_eq!(diag.candidate_votes.positive, 0.0);
        assert_relative_eq!(diag.candidate_votes.negative, 114.93, epsilon = 1e-3);
        assert_relative_eq!(diag.confidence, 1.0);

        let crossing = &diag.crossings[0];
        assert_eq!(crossing.track_id, Some(4));
        assert_eq!((crossing.first_sign, crossing.last_sign), (1, -1));
        assert_relative_eq!(crossing.vote_weight, 114.93, epsilon = 1e-3);
    }

    #[test]
    fn test_no_crossings_stays_undetermined() {
        let mut cal = OrientationCalibrator::new(config(4, 1));

        for i in 0..4 {
            cal.push(i, 3.0 + i as f32);
        }

        match cal.status() {
            CalibrationStatus::Undetermined(diag) => {
                assert_eq!(diag.num_samples, 4);
                assert_eq!(diag.num_crossings, 0);
                assert_eq!(diag.orientation, None);
                assert!(diag.notes.contains(&NOTE_NOT_ENOUGH_CROSSINGS.to_string()));
            }
            other => panic!("expected undetermined, got {:?}", other),
        }

        // the window keeps extending
        assert!(!cal.push(9, 2.0).is_determined());
        assert!(cal.push(9, -2.0).is_determined());
        assert_eq!(cal.num_samples(), 6);
    }

    #[test]
    fn test_tie_is_undetermined() {
        let mut cal = OrientationCalibrator::new(config(4, 1));

        cal.push(1, 5.0);
        cal.push(1, -5.0);
        cal.push(2, -5.0);
        let status = cal.push(2, 5.0);

        match status {
            CalibrationStatus::Undetermined(diag) => {
                assert_eq!(diag.num_crossings, 2);
                assert!(diag.notes.contains(&NOTE_TIE.to_string()));
            }
            other => panic!("expected undetermined, got {:?}", other),
        }
    }

    #[test]
    fn test_min_crossings() {
        let mut cal = OrientationCalibrator::new(config(2, 2));

        cal.push(1, 5.0);
        assert!(!cal.push(1, -5.0).is_determined());

        cal.push(2, 4.0);
        assert!(cal.push(2, -4.0).is_determined());
    }

    #[test]
    fn test_heavier_side_wins() {
        let mut cal = OrientationCalibrator::new(config(6, 1));

        // two short crossings ending positive, one long ending negative
        cal.push(1, -1.0);
        cal.push(1, 1.0);
        cal.push(2, -2.0);
        cal.push(2, 2.0);
        cal.push(3, 20.0);
        let diag = cal.evaluate();

        assert_eq!(diag.num_crossings, 2);
        assert_eq!(diag.orientation, Some(Orientation::Positive));

        cal.push(3, -20.0);
        let diag = cal.evaluate();
        assert_eq!(diag.num_crossings, 3);
        assert_relative_eq!(diag.candidate_votes.positive, 6.0);
        assert_relative_eq!(diag.candidate_votes.negative, 40.0);
        assert_eq!(diag.orientation, Some(Orientation::Negative));
    }

    #[test]
    fn test_epsilon_skips_near_curve_samples() {
        let mut cal = OrientationCalibrator::new(CalibrationConfig {
            max_samples: 3,
            epsilon: 3.0,
            ..Default::default()
        });

        cal.push(1, 10.0);
        cal.push(1, -1.0);
        let status = cal.push(1, 2.5);

        assert!(!status.is_determined());
        assert_eq!(cal.evaluate().num_samples, 3);
        assert_eq!(cal.evaluate().num_crossings, 0);
    }

    #[test]
    fn test_require_balance() {
        let mut cal = OrientationCalibrator::new(CalibrationConfig {
            max_samples: 2,
            require_balance: true,
            ..Default::default()
        });

        cal.push(1, 5.0);
        match cal.push(1, -5.0) {
            CalibrationStatus::Undetermined(diag) => {
                assert!(diag.notes.contains(&NOTE_UNBALANCED.to_string()));
            }
            other => panic!("expected undetermined, got {:?}", other),
        }

        cal.push(2, -1.0);
        assert!(cal.push(2, 1.0).is_determined());
    }

    #[test]
    fn test_vote_follows_latest_sample() {
        let mut cal = OrientationCalibrator::new(config(2, 1));

        cal.push(1, 5.0);
        assert!(cal.push(1, -5.0).is_determined());

        // back on the starting side, the vote is withdrawn
        match cal.push(1, 3.0) {
            CalibrationStatus::Undetermined(diag) => {
                assert_eq!(diag.num_crossings, 0);
                assert_relative_eq!(diag.candidate_votes.negative, 0.0);
            }
            other => panic!("expected undetermined, got {:?}", other),
        }

        match cal.push(1, -8.0) {
            CalibrationStatus::Determined(config) => {
                let diag = config.diagnostics.unwrap();
                assert_relative_eq!(diag.candidate_votes.negative, 13.0);
                assert_eq!(diag.crossings.len(), 1);
            }
            other => panic!("expected determined, got {:?}", other),
        }
        assert_relative_eq!(cal.evaluate().candidate_votes.negative, 13.0);
    }

    #[test]
    fn test_status_does_not_change_state() {
        let mut cal = OrientationCalibrator::new(config(2, 1));

        cal.push(1, 5.0);
        let pushed = cal.push(1, -5.0);

        assert_eq!(cal.status(), pushed);
        assert_eq!(cal.status(), cal.status());
        assert_eq!(cal.num_samples(), 2);

        let diag = cal.evaluate();
        assert!(diag.notes.contains(&NOTE_CHECK_FOR_BIAS.to_string()));
        assert_eq!(cal.evaluate(), diag);
    }

    #[test]
    fn test_long_unbalanced_window() {
        let mut cal = OrientationCalibrator::new(CalibrationConfig {
            max_samples: 2,
            require_balance: true,
            ..Default::default()
        });

        for track_id in 0..10_000 {
            cal.push(track_id, 4.0);
            assert!(!cal.push(track_id, -4.0).is_determined());
        }

        cal.push(10_000, -1.0);
        match cal.push(10_000, 1.0) {
            CalibrationStatus::Determined(config) => {
                let diag = config.diagnostics.unwrap();
                assert_eq!(diag.num_crossings, 10_001);
                assert_eq!(diag.num_tracks, 10_001);
                assert_eq!(config.multiplier, Some(Orientation::Negative));
            }
            other => panic!("expected determined, got {:?}", other),
        }
    }

    #[test]
    fn test_reset() {
        let mut cal = OrientationCalibrator::new(config(2, 1));

        cal.push(1, 5.0);
        cal.reset();
        assert_eq!(cal.num_samples(), 0);
        assert!(matches!(
            cal.push(1, -5.0),
            CalibrationStatus::Collecting { .. }
        ));
    }
}
