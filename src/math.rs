use nalgebra as na;

const COLLINEAR_EPSILON: f32 = 1e-9;

/// 2D cross product of `a` and `b`.
#[inline]
pub fn cross(a: &na::Vector2<f32>, b: &na::Vector2<f32>) -> f32 {
    a.x * b.y - a.y * b.x
}

/// Orientation of `c` relative to the directed line `a -> b`.
#[inline]
pub fn orient(a: &na::Point2<f32>, b: &na::Point2<f32>, c: &na::Point2<f32>) -> f32 {
    cross(&(b - a), &(c - a))
}

/// Projects `p` onto the segment `a -> b`, returning the closest point and the
/// clamped segment parameter in `[0, 1]`.
///
/// `a` and `b` must be distinct.
#[inline]
pub fn project_on_segment(
    p: &na::Point2<f32>,
    a: &na::Point2<f32>,
    b: &na::Point2<f32>,
) -> (na::Point2<f32>, f32) {
    let dir = b - a;
    let t = ((p - a).dot(&dir) / dir.norm_squared()).clamp(0.0, 1.0);

    (a + dir * t, t)
}

#[inline]
fn on_segment(a: &na::Point2<f32>, b: &na::Point2<f32>, c: &na::Point2<f32>) -> bool {
    a.x.min(c.x) <= b.x && b.x <= a.x.max(c.x) && a.y.min(c.y) <= b.y && b.y <= a.y.max(c.y)
}

/// Segment intersection test, touching and collinear overlaps included.
pub fn segments_intersect(
    p1: &na::Point2<f32>,
    p2: &na::Point2<f32>,
    q1: &na::Point2<f32>,
    q2: &na::Point2<f32>,
) -> bool {
    let o1 = orient(p1, p2, q1);
    let o2 = orient(p1, p2, q2);
    let o3 = orient(q1, q2, p1);
    let o4 = orient(q1, q2, p2);

    if o1 * o2 < 0.0 && o3 * o4 < 0.0 {
        return true;
    }

    (o1.abs() < COLLINEAR_EPSILON && on_segment(p1, q1, p2))
        || (o2.abs() < COLLINEAR_EPSILON && on_segment(p1, q2, p2))
        || (o3.abs() < COLLINEAR_EPSILON && on_segment(q1, p1, q2))
        || (o4.abs() < COLLINEAR_EPSILON && on_segment(q1, p2, q2))
}
