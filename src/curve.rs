use nalgebra as na;

use crate::error::{Error, Result};
use crate::math;

/// Immutable polyline the crossings are counted against.
///
/// Point order is significant: it defines which segments are adjacent and
/// which side of each segment is positive. For a segment `a -> b` a point `p`
/// gets the sign of `cross(b - a, p - a)`; in image coordinates (y grows
/// downward) a left-to-right curve therefore has positive distances below it.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveModel {
    points: Vec<na::Point2<f32>>,
    // `points` with coincident neighbours merged
    vertices: Vec<na::Point2<f32>>,
}

impl CurveModel {
    pub fn new(points: Vec<na::Point2<f32>>) -> Result<Self> {
        if points.len() < 2 {
            return Err(Error::InvalidCurve(format!(
                "expected at least 2 points, got {}",
                points.len()
            )));
        }

        if let Some(p) = points.iter().find(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(Error::InvalidCurve(format!(
                "non-finite point ({}, {})",
                p.x, p.y
            )));
        }

        let mut vertices: Vec<na::Point2<f32>> = Vec::with_capacity(points.len());
        for p in &points {
            if vertices.last() != Some(p) {
                vertices.push(*p);
            }
        }

        if vertices.len() < 2 {
            return Err(Error::InvalidCurve(
                "expected at least 2 distinct points".to_string(),
            ));
        }

        Ok(Self { points, vertices })
    }

    pub fn from_pairs(pairs: &[[f32; 2]]) -> Result<Self> {
        Self::new(pairs.iter().map(|&[x, y]| na::Point2::new(x, y)).collect())
    }

    /// Points exactly as they were drawn, duplicates included.
    #[inline]
    pub fn points(&self) -> &[na::Point2<f32>] {
        &self.points
    }

    #[inline]
    pub fn to_pairs(&self) -> Vec<[f32; 2]> {
        self.points.iter().map(|p| [p.x, p.y]).collect()
    }

    #[inline]
    pub fn num_segments(&self) -> usize {
        self.vertices.len() - 1
    }

    #[inline]
    fn segments(&self) -> impl Iterator<Item = (&na::Point2<f32>, &na::Point2<f32>)> {
        self.vertices.windows(2).map(|w| (&w[0], &w[1]))
    }

    /// Distance to the nearest segment, signed by the side of that segment
    /// the point lies on.
    ///
    /// When two segments are equally close the earlier one decides the sign.
    /// That only matters for points on the outer side of a sharp bend, where
    /// the two segments can disagree.
    ///
    /// A point with a non-finite coordinate has no distance and yields NaN.
    pub fn signed_distance(&self, p: na::Point2<f32>) -> f32 {
        let mut min_dist = f32::INFINITY;
        let mut sign = 1.0;

        for (a, b) in self.segments() {
            let (proj, _) = math::project_on_segment(&p, a, b);
            let dist = na::distance(&p, &proj);

            if dist < min_dist {
                min_dist = dist;
                sign = if math::orient(a, b, &p) < 0.0 { -1.0 } else { 1.0 };
            }
        }

        if !min_dist.is_finite() {
            return f32::NAN;
        }

        min_dist * sign
    }

    #[inline]
    pub fn distance(&self, p: na::Point2<f32>) -> f32 {
        self.signed_distance(p).abs()
    }

    /// Whether the straight path between two successive anchors touches the
    /// curve.
    pub fn path_crosses(&self, from: na::Point2<f32>, to: na::Point2<f32>) -> bool {
        self.segments()
            .any(|(a, b)| math::segments_intersect(&from, &to, a, b))
    }
}
