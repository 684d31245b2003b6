//! The transform contract.
//!
//! Every transform implements [`MathTransform`], which is built on one
//! required primitive, [`transform_one`](MathTransform::transform_one):
//! transform a single coordinate tuple, and optionally compute the Jacobian
//! at that position. Batch transformation, derivatives, point, position and
//! shape transformation all have default implementations in terms of that
//! primitive, which implementations override when they can do better.

pub(crate) mod batch;
mod cache;
pub mod iteration;
pub mod position;
pub mod shape;

pub use cache::HashCache;
pub use cache::InverseCell;
pub use iteration::IterationStrategy;
pub use position::DirectPosition;

use crate::matrix::Matrix;
use crate::parameter::OpParameter;
use crate::parameter::ParameterValues;
use crate::Error;
use crate::TransformRef;
use shape::Path;
use shape::Point2D;
use std::any::Any;
use std::collections::hash_map::DefaultHasher;
use std::fmt::Debug;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;

/// Number of ordinates in a working block of a batch transform.
pub const MAXIMUM_BUFFER_SIZE: usize = 512;

/// Number of failed target ordinates tolerated per working block of a batch
/// transform, before the batch is aborted.
pub const MAXIMUM_FAILURES: usize = 32;

/// Strictness of transform comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonMode {
    /// Same type, same parameters, bit for bit
    Strict,
    /// Same type, same parameter values, ignoring names and other metadata
    IgnoreMetadata,
    /// Same mapping within floating point tolerance. Linear transforms of
    /// different types compare equal if their matrices do.
    Approximate,
}

/// The normalization and denormalization affines surrounding a kernel
/// transform: the user-facing operation is `denormalize ∘ kernel ∘ normalize`.
#[derive(Debug, Clone)]
pub struct Contextual {
    pub normalize: Matrix,
    pub denormalize: Matrix,
}

/// The common contract of all transforms.
///
/// Transforms are immutable: dimensions never change after construction, and
/// the mapping is a pure function of the input coordinates.
pub trait MathTransform: Debug + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;

    /// A short identifier, e.g. `"Exponential"`
    fn name(&self) -> &'static str;

    fn source_dimensions(&self) -> usize;
    fn target_dimensions(&self) -> usize;

    fn is_identity(&self) -> bool {
        false
    }

    /// Transform one coordinate tuple.
    ///
    /// Reads `source_dimensions()` ordinates from `src` and, if `dst` is
    /// given, writes `target_dimensions()` ordinates to it. If `derivate` is
    /// true, the Jacobian at `src` is returned.
    fn transform_one(
        &self,
        src: &[f64],
        dst: Option<&mut [f64]>,
        derivate: bool,
    ) -> Result<Option<Matrix>, Error>;

    // ----- B A T C H E S -----

    /// Transform `num_pts` points from `src` to a disjoint `dst`.
    ///
    /// Per-point failures are tolerated within a bounded budget: the failed
    /// points are written as NaN and [`Error::Partial`] is returned at the end.
    fn transform_pts(&self, src: &[f64], dst: &mut [f64], num_pts: usize) -> Result<(), Error> {
        batch::transform_pts(self, src, dst, num_pts)
    }

    /// Transform `num_pts` points within one buffer, reading from `src_off`
    /// and writing from `dst_off`. The two spans may overlap.
    fn transform_in_place(
        &self,
        pts: &mut [f64],
        src_off: usize,
        dst_off: usize,
        num_pts: usize,
    ) -> Result<(), Error> {
        batch::transform_in_place(self, pts, src_off, dst_off, num_pts)
    }

    fn transform_f32(&self, src: &[f32], dst: &mut [f32], num_pts: usize) -> Result<(), Error> {
        batch::transform_f32(self, src, dst, num_pts)
    }

    fn transform_f32_in_place(
        &self,
        pts: &mut [f32],
        src_off: usize,
        dst_off: usize,
        num_pts: usize,
    ) -> Result<(), Error> {
        batch::transform_f32_in_place(self, pts, src_off, dst_off, num_pts)
    }

    fn transform_f64_to_f32(
        &self,
        src: &[f64],
        dst: &mut [f32],
        num_pts: usize,
    ) -> Result<(), Error> {
        batch::transform_f64_to_f32(self, src, dst, num_pts)
    }

    fn transform_f32_to_f64(
        &self,
        src: &[f32],
        dst: &mut [f64],
        num_pts: usize,
    ) -> Result<(), Error> {
        batch::transform_f32_to_f64(self, src, dst, num_pts)
    }

    // ----- P O I N T S -----

    fn transform_point(&self, src: &[f64]) -> Result<Vec<f64>, Error> {
        check_dimension(self.name(), self.source_dimensions(), src.len())?;
        let mut dst = vec![0.; self.target_dimensions()];
        self.transform_one(src, Some(&mut dst), false)?;
        Ok(dst)
    }

    /// Transform a position. If `dst` is given, its storage is reused.
    fn transform_position(
        &self,
        src: &DirectPosition,
        dst: Option<DirectPosition>,
    ) -> Result<DirectPosition, Error> {
        position::transform(self, src, dst)
    }

    /// The Jacobian at `point`
    fn derivative(&self, point: &[f64]) -> Result<Matrix, Error> {
        check_dimension(self.name(), self.source_dimensions(), point.len())?;
        match self.transform_one(point, None, true)? {
            Some(m) => Ok(m),
            None => Err(Error::Transform(format!(
                "{}: derivative not available",
                self.name()
            ))),
        }
    }

    fn transform_1d(&self, x: f64) -> Result<f64, Error> {
        check_dimension(self.name(), 1, self.source_dimensions())?;
        check_dimension(self.name(), 1, self.target_dimensions())?;
        let mut dst = [0.];
        self.transform_one(&[x], Some(&mut dst), false)?;
        Ok(dst[0])
    }

    fn derivative_1d(&self, x: f64) -> Result<f64, Error> {
        check_dimension(self.name(), 1, self.source_dimensions())?;
        check_dimension(self.name(), 1, self.target_dimensions())?;
        Ok(self.derivative(&[x])?[(0, 0)])
    }

    fn transform_point2d(&self, p: Point2D) -> Result<Point2D, Error> {
        check_dimension(self.name(), 2, self.source_dimensions())?;
        check_dimension(self.name(), 2, self.target_dimensions())?;
        let mut dst = [0.; 2];
        self.transform_one(&[p.x, p.y], Some(&mut dst), false)?;
        Ok(Point2D::new(dst[0], dst[1]))
    }

    fn derivative_2d(&self, p: Point2D) -> Result<Matrix, Error> {
        check_dimension(self.name(), 2, self.source_dimensions())?;
        check_dimension(self.name(), 2, self.target_dimensions())?;
        self.derivative(&[p.x, p.y])
    }

    /// Transform a path of line and curve segments. Each segment is
    /// approximated by a quadratic curve through the transformed end points.
    fn transform_path(&self, path: &Path) -> Result<Path, Error> {
        check_dimension(self.name(), 2, self.source_dimensions())?;
        check_dimension(self.name(), 2, self.target_dimensions())?;
        shape::transform_path(self, path)
    }

    // ----- A L G E B R A -----

    /// The inverse transform. Fails with [`Error::NonInvertible`] if there is none.
    fn inverse(self: Arc<Self>) -> Result<TransformRef, Error>;

    /// The homogeneous matrix of a linear transform
    fn matrix(&self) -> Option<Matrix> {
        None
    }

    /// A simplified transform for the concatenation of `self` and `other`,
    /// with `other` applied first if `apply_other_first`. `None` if no
    /// simplification is known.
    fn concatenate(&self, _other: &TransformRef, _apply_other_first: bool) -> Option<TransformRef> {
        None
    }

    // ----- D E S C R I P T I O N -----

    fn parameter_descriptors(&self) -> Option<&'static [OpParameter]> {
        None
    }

    fn parameters(&self) -> Option<ParameterValues> {
        None
    }

    /// The affines this kernel expects around it, if any
    fn contextual(&self) -> Option<Contextual> {
        None
    }

    /// Give the step at `index` in a flattened chain the opportunity to
    /// rewrite its neighbors before formatting. Returns the new index of the
    /// step.
    fn before_format(&self, steps: &mut Vec<TransformRef>, index: usize) -> usize {
        match self.contextual() {
            Some(contextual) => crate::formatting::fold_contextual(&contextual, steps, index),
            None => index,
        }
    }

    fn equals(&self, other: &dyn MathTransform, mode: ComparisonMode) -> bool {
        default_equals(self, other, mode)
    }

    fn hash_code(&self) -> u64 {
        compute_hash(self)
    }
}

impl dyn MathTransform {
    /// The concrete transform behind a reference, if of type `T`
    pub fn downcast_ref<T: MathTransform>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn is<T: MathTransform>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

// ----- H E L P E R S ----------------------------------------------------------------

pub(crate) fn check_dimension(name: &str, expected: usize, found: usize) -> Result<(), Error> {
    if expected != found {
        return Err(Error::MismatchedDimension(name.to_string(), expected, found));
    }
    Ok(())
}

/// Same concrete type, same dimensions, and equal parameters per `mode`.
/// In approximate mode, linear transforms compare by matrix.
pub fn default_equals<T: MathTransform + ?Sized>(
    this: &T,
    other: &dyn MathTransform,
    mode: ComparisonMode,
) -> bool {
    if this.source_dimensions() != other.source_dimensions()
        || this.target_dimensions() != other.target_dimensions()
    {
        return false;
    }
    if mode == ComparisonMode::Approximate {
        if let (Some(a), Some(b)) = (this.matrix(), other.matrix()) {
            let tolerance = crate::IDENTITY_TOLERANCE * a.max_abs().max(b.max_abs()).max(1.);
            return a.approx_eq(&b, tolerance);
        }
    }
    if this.as_any().type_id() != other.as_any().type_id() {
        return false;
    }
    match (this.parameters(), other.parameters()) {
        (Some(a), Some(b)) => match mode {
            ComparisonMode::Strict => a == b,
            ComparisonMode::IgnoreMetadata => {
                a.real == b.real
                    && a.series == b.series
                    && a.natural == b.natural
                    && a.boolean == b.boolean
            }
            ComparisonMode::Approximate => a.approx_eq(&b, crate::IDENTITY_TOLERANCE),
        },
        (None, None) => match (this.matrix(), other.matrix()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        _ => false,
    }
}

/// Hash of the type name, dimensions and parameter values
pub fn compute_hash<T: MathTransform + ?Sized>(this: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    this.name().hash(&mut hasher);
    this.source_dimensions().hash(&mut hasher);
    this.target_dimensions().hash(&mut hasher);
    if let Some(p) = this.parameters() {
        p.name.hash(&mut hasher);
        p.boolean.hash(&mut hasher);
        p.natural.hash(&mut hasher);
        p.text.hash(&mut hasher);
        for (key, value) in &p.real {
            key.hash(&mut hasher);
            value.to_bits().hash(&mut hasher);
        }
        for (key, values) in &p.series {
            key.hash(&mut hasher);
            values.iter().for_each(|v| v.to_bits().hash(&mut hasher));
        }
    } else if let Some(m) = this.matrix() {
        m.elements().iter().for_each(|v| v.to_bits().hash(&mut hasher));
    }
    hasher.finish()
}

/// Bring `x` into the range `[-bound, +bound]`.
///
/// The number of periods is computed on the integer part of `x/bound`, which
/// avoids the rounding error of a floating point modulo. `-bound` itself is
/// not rolled to `+bound`.
pub fn roll_longitude(x: f64, bound: f64) -> f64 {
    let mut n = (x / bound) as i64;
    if n != 0 {
        if n < 0 {
            n &= !1;
            if n == -2 && x == -bound {
                return x;
            }
        } else if n & 1 != 0 {
            n += 1;
        }
        return x - n as f64 * bound;
    }
    x
}

// ----- T E S T S ------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;

    #[test]
    fn rolling() {
        assert_eq!(roll_longitude(10., 180.), 10.);
        assert_eq!(roll_longitude(-180., 180.), -180.);
        assert_eq!(roll_longitude(180., 180.), -180.);
        assert_float_eq!(roll_longitude(190., 180.), -170., abs <= 1e-12);
        assert_float_eq!(roll_longitude(-190., 180.), 170., abs <= 1e-12);
        assert_float_eq!(roll_longitude(370., 180.), 10., abs <= 1e-12);
        assert_float_eq!(roll_longitude(-370., 180.), -10., abs <= 1e-12);
        assert_float_eq!(roll_longitude(540., 180.), -180., abs <= 1e-12);
    }
}
