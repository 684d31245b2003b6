//! Two-dimensional points and paths.
//!
//! Paths are transformed segment by segment: each segment is represented by
//! one point known to lie on it, and the transformed segment is the quadratic
//! curve through the transformed end points and the transformed
//! representative point. Straight lines are kept straight when the three
//! transformed points are colinear.
//!
//! Cubic segments are represented by their point at t = ½ only, so a cubic
//! comes out as a quadratic. For strongly twisted cubics, this is a coarse
//! approximation.

use super::MathTransform;
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Point2D {
        Point2D { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathSegment {
    MoveTo(Point2D),
    LineTo(Point2D),
    QuadTo(Point2D, Point2D),
    CubicTo(Point2D, Point2D, Point2D),
    Close,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Path {
    pub segments: Vec<PathSegment>,
}

impl Path {
    pub fn new() -> Path {
        Path::default()
    }
    pub fn move_to(mut self, x: f64, y: f64) -> Self {
        self.segments.push(PathSegment::MoveTo(Point2D::new(x, y)));
        self
    }
    pub fn line_to(mut self, x: f64, y: f64) -> Self {
        self.segments.push(PathSegment::LineTo(Point2D::new(x, y)));
        self
    }
    pub fn quad_to(mut self, cx: f64, cy: f64, x: f64, y: f64) -> Self {
        self.segments
            .push(PathSegment::QuadTo(Point2D::new(cx, cy), Point2D::new(x, y)));
        self
    }
    pub fn cubic_to(mut self, c1: Point2D, c2: Point2D, end: Point2D) -> Self {
        self.segments.push(PathSegment::CubicTo(c1, c2, end));
        self
    }
    pub fn close(mut self) -> Self {
        self.segments.push(PathSegment::Close);
        self
    }
}

// Relative tolerance for deciding that a control point lies on the chord
const COLINEARITY: f64 = 1e-9;

fn on_curve<T: MathTransform + ?Sized>(tr: &T, p: Point2D) -> Result<Point2D, Error> {
    let mut dst = [0.; 2];
    tr.transform_one(&[p.x, p.y], Some(&mut dst), false)?;
    Ok(Point2D::new(dst[0], dst[1]))
}

/// The segment from `p0` to `p2` passing through `mid` at t = ½: a quadratic
/// with control point `2·mid - (p0 + p2)/2`, or a line if that is colinear.
fn fit(p0: Point2D, mid: Point2D, p2: Point2D) -> PathSegment {
    let c = Point2D::new(2. * mid.x - (p0.x + p2.x) / 2., 2. * mid.y - (p0.y + p2.y) / 2.);
    let (dx, dy) = (p2.x - p0.x, p2.y - p0.y);
    let cross = (c.x - p0.x) * dy - (c.y - p0.y) * dx;
    let chord = dx * dx + dy * dy;
    let scale = chord.max(f64::MIN_POSITIVE);
    if cross.abs() <= COLINEARITY * scale {
        return PathSegment::LineTo(p2);
    }
    PathSegment::QuadTo(c, p2)
}

pub(crate) fn transform_path<T: MathTransform + ?Sized>(tr: &T, path: &Path) -> Result<Path, Error> {
    let mut result = Path::new();
    // Current and subpath start, in source and target space
    let mut current = (Point2D::default(), Point2D::default());
    let mut start = current;

    for segment in &path.segments {
        let (end, mid) = match *segment {
            PathSegment::MoveTo(p) => {
                let q = on_curve(tr, p)?;
                result.segments.push(PathSegment::MoveTo(q));
                current = (p, q);
                start = current;
                continue;
            }
            PathSegment::Close => {
                result.segments.push(PathSegment::Close);
                current = start;
                continue;
            }
            PathSegment::LineTo(p) => {
                let p0 = current.0;
                (p, Point2D::new((p0.x + p.x) / 2., (p0.y + p.y) / 2.))
            }
            PathSegment::QuadTo(c, p) => {
                let p0 = current.0;
                let mid = Point2D::new(
                    0.25 * (p0.x + 2. * c.x + p.x),
                    0.25 * (p0.y + 2. * c.y + p.y),
                );
                (p, mid)
            }
            PathSegment::CubicTo(c1, c2, p) => {
                let p0 = current.0;
                let mid = Point2D::new(
                    (p0.x + 3. * (c1.x + c2.x) + p.x) / 8.,
                    (p0.y + 3. * (c1.y + c2.y) + p.y) / 8.,
                );
                (p, mid)
            }
        };
        let q_end = on_curve(tr, end)?;
        let q_mid = on_curve(tr, mid)?;
        result.segments.push(fit(current.1, q_mid, q_end));
        current = (end, q_end);
    }
    Ok(result)
}

// ----- T E S T S ------------------------------------------------------------------
