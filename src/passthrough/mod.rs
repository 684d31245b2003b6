//! Transforms operating on a subset of the coordinate dimensions.

mod filter;

pub use filter::DimensionFilter;

use crate::authoring::*;
use crate::linear::linear;
use crate::transform::batch;
use crate::transform::compute_hash;

/// Leading and trailing ordinates are copied unchanged, the ordinates in
/// between are handed to the sub-transform.
#[derive(Debug)]
pub struct PassThroughTransform {
    first: usize,
    sub: TransformRef,
    trailing: usize,
    inverse: InverseCell,
    hash: HashCache,
}

impl PassThroughTransform {
    /// Lift `sub` to the dimensions `first..first + sub.source_dimensions()`
    /// of a transform with `first` leading and `trailing` trailing
    /// pass-through ordinates.
    ///
    /// Returns `sub` itself when there is nothing to pass through, and a
    /// plain linear transform when `sub` is affine.
    pub fn create(first: usize, sub: TransformRef, trailing: usize) -> Result<TransformRef, Error> {
        if first == 0 && trailing == 0 {
            return Ok(sub);
        }
        if sub.is_identity() && sub.source_dimensions() == sub.target_dimensions() {
            return Ok(IdentityTransform::create(
                first + sub.source_dimensions() + trailing,
            ));
        }
        if let Some(m) = sub.matrix() {
            if m.is_affine() {
                return linear(&expand_matrix(first, &m, trailing));
            }
        }
        if let Some(inner) = sub.downcast_ref::<PassThroughTransform>() {
            return PassThroughTransform::create(
                first + inner.first,
                inner.sub.clone(),
                trailing + inner.trailing,
            );
        }
        Ok(PassThroughTransform::construct(first, sub, trailing, InverseCell::new()))
    }

    fn construct(first: usize, sub: TransformRef, trailing: usize, inverse: InverseCell) -> TransformRef {
        Arc::new(PassThroughTransform {
            first,
            sub,
            trailing,
            inverse,
            hash: HashCache::new(),
        })
    }

    pub fn first_affected_ordinate(&self) -> usize {
        self.first
    }

    pub fn num_trailing_ordinates(&self) -> usize {
        self.trailing
    }

    pub fn sub_transform(&self) -> &TransformRef {
        &self.sub
    }

    /// The source dimensions handed to the sub-transform
    pub fn modified_coordinates(&self) -> Vec<usize> {
        (self.first..self.first + self.sub.source_dimensions()).collect()
    }

    /// The matrix equivalent to the square affine `matrix` on the dimensions
    /// of the sub-transform, if `matrix` leaves the pass-through dimensions
    /// alone. `before` selects whether `matrix` applies to the source (true)
    /// or target (false) side of this transform.
    pub fn to_sub_matrix(&self, matrix: &Matrix, before: bool) -> Option<Matrix> {
        let affected = match before {
            true => self.sub.source_dimensions(),
            false => self.sub.target_dimensions(),
        };
        let dim = self.first + affected + self.trailing;
        if matrix.rows() != dim + 1 || matrix.cols() != dim + 1 {
            return None;
        }
        let first = self.first;
        let inside = |k: usize| k == dim || (k >= first && k < first + affected);
        let map = |k: usize| if k == dim { affected } else { k - first };

        let mut sub = Matrix::zeros(affected + 1, affected + 1);
        for j in 0..=dim {
            for i in 0..=dim {
                let value = matrix[(j, i)];
                if inside(j) && inside(i) {
                    sub[(map(j), map(i))] = value;
                    continue;
                }
                let expected = if i == j { 1. } else { 0. };
                if value != expected {
                    return None;
                }
            }
        }
        Some(sub)
    }

    /// Concatenate `matrix` with this transform by moving it inside, next to
    /// the sub-transform. `None` if `matrix` touches pass-through dimensions.
    pub fn absorb_matrix(&self, matrix: &Matrix, matrix_first: bool) -> Result<Option<TransformRef>, Error> {
        let sub_matrix = match self.to_sub_matrix(matrix, matrix_first) {
            Some(m) => m,
            None => return Ok(None),
        };
        let step = linear(&sub_matrix)?;
        let sub = match matrix_first {
            true => ConcatenatedTransform::create(step, self.sub.clone())?,
            false => ConcatenatedTransform::create(self.sub.clone(), step)?,
        };
        Ok(Some(PassThroughTransform::create(self.first, sub, self.trailing)?))
    }

    fn expand_derivative(&self, sub: &Matrix) -> Matrix {
        let ss = self.sub.source_dimensions();
        let st = self.sub.target_dimensions();
        let mut m = Matrix::zeros(self.target_dimensions(), self.source_dimensions());
        for i in 0..self.first {
            m[(i, i)] = 1.;
        }
        for j in 0..st {
            for i in 0..ss {
                m[(self.first + j, self.first + i)] = sub[(j, i)];
            }
        }
        for k in 0..self.trailing {
            m[(self.first + st + k, self.first + ss + k)] = 1.;
        }
        m
    }
}

/// The affine `m` embedded in identity blocks
fn expand_matrix(first: usize, m: &Matrix, trailing: usize) -> Matrix {
    let st = m.rows() - 1;
    let ss = m.cols() - 1;
    let rows = first + st + trailing;
    let cols = first + ss + trailing;
    let mut expanded = Matrix::zeros(rows + 1, cols + 1);
    for i in 0..first {
        expanded[(i, i)] = 1.;
    }
    for j in 0..st {
        for i in 0..ss {
            expanded[(first + j, first + i)] = m[(j, i)];
        }
        expanded[(first + j, cols)] = m[(j, ss)];
    }
    for k in 0..trailing {
        expanded[(first + st + k, first + ss + k)] = 1.;
    }
    expanded[(rows, cols)] = 1.;
    expanded
}

impl MathTransform for PassThroughTransform {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn name(&self) -> &'static str {
        "PassThrough"
    }
    fn source_dimensions(&self) -> usize {
        self.first + self.sub.source_dimensions() + self.trailing
    }
    fn target_dimensions(&self) -> usize {
        self.first + self.sub.target_dimensions() + self.trailing
    }
    fn is_identity(&self) -> bool {
        self.sub.is_identity() && self.sub.source_dimensions() == self.sub.target_dimensions()
    }

    fn transform_one(
        &self,
        src: &[f64],
        dst: Option<&mut [f64]>,
        derivate: bool,
    ) -> Result<Option<Matrix>, Error> {
        let first = self.first;
        let ss = self.sub.source_dimensions();
        let st = self.sub.target_dimensions();
        let sub_src = &src[first..first + ss];
        let derivative = match dst {
            Some(dst) => {
                let d = self
                    .sub
                    .transform_one(sub_src, Some(&mut dst[first..first + st]), derivate)?;
                dst[..first].copy_from_slice(&src[..first]);
                dst[first + st..first + st + self.trailing]
                    .copy_from_slice(&src[first + ss..first + ss + self.trailing]);
                d
            }
            None => self.sub.transform_one(sub_src, None, derivate)?,
        };
        Ok(derivative.map(|d| self.expand_derivative(&d)))
    }

    /// The sub-transform ordinates are gathered into a contiguous buffer, so
    /// the sub-transform gets to use its own batch implementation
    fn transform_pts(&self, src: &[f64], dst: &mut [f64], num_pts: usize) -> Result<(), Error> {
        let s = self.source_dimensions();
        let t = self.target_dimensions();
        let ss = self.sub.source_dimensions();
        let st = self.sub.target_dimensions();
        let first = self.first;
        batch::check_length("source", num_pts * s, src.len())?;
        batch::check_length("destination", num_pts * t, dst.len())?;

        let block = (MAXIMUM_BUFFER_SIZE / ss.max(st).max(1)).max(1);
        let mut input = vec![0.; block.min(num_pts) * ss];
        let mut output = vec![0.; block.min(num_pts) * st];
        let mut deferred = None;
        let mut done = 0;
        while done < num_pts {
            let n = block.min(num_pts - done);
            for p in 0..n {
                let from = (done + p) * s + first;
                input[p * ss..(p + 1) * ss].copy_from_slice(&src[from..from + ss]);
            }
            let status = self
                .sub
                .transform_pts(&input[..n * ss], &mut output[..n * st], n);
            batch::defer(&mut deferred, status)?;
            for p in 0..n {
                let i = (done + p) * s;
                let o = (done + p) * t;
                dst[o..o + first].copy_from_slice(&src[i..i + first]);
                dst[o + first..o + first + st].copy_from_slice(&output[p * st..(p + 1) * st]);
                dst[o + first + st..o + t].copy_from_slice(&src[i + first + ss..i + s]);
            }
            done += n;
        }
        batch::finish(deferred)
    }

    fn inverse(self: Arc<Self>) -> Result<TransformRef, Error> {
        let origin: TransformRef = self.clone();
        self.inverse.get_or_init(|| {
            let sub = self.sub.clone().inverse()?;
            Ok(PassThroughTransform::construct(
                self.first,
                sub,
                self.trailing,
                InverseCell::with_origin(origin),
            ))
        })
    }

    /// Two pass-throughs of the same layout merge into one
    fn concatenate(&self, other: &TransformRef, apply_other_first: bool) -> Option<TransformRef> {
        let other = other.downcast_ref::<PassThroughTransform>()?;
        if other.first != self.first || other.trailing != self.trailing {
            return None;
        }
        let sub = match apply_other_first {
            true => ConcatenatedTransform::create(other.sub.clone(), self.sub.clone()),
            false => ConcatenatedTransform::create(self.sub.clone(), other.sub.clone()),
        };
        PassThroughTransform::create(self.first, sub.ok()?, self.trailing).ok()
    }

    fn equals(&self, other: &dyn MathTransform, mode: ComparisonMode) -> bool {
        match other.downcast_ref::<PassThroughTransform>() {
            Some(o) => {
                self.first == o.first
                    && self.trailing == o.trailing
                    && self.sub.equals(o.sub.as_ref(), mode)
            }
            None => false,
        }
    }

    fn hash_code(&self) -> u64 {
        self.hash.get_or_compute(|| {
            let layout = ((self.first as u64) << 32) ^ self.trailing as u64;
            compute_hash(self) ^ self.sub.hash_code().rotate_left(7) ^ layout
        })
    }
}

// ----- T E S T S ------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;

    #[test]
    fn linear_sub_transform() -> Result<(), Error> {
        let pt = PassThroughTransform::create(1, LinearTransform1D::create(2., 0.), 0)?;
        assert!(pt.matrix().is_some());
        assert_eq!(pt.source_dimensions(), 2);
        let pt = PassThroughTransform::create(1, LinearTransform1D::create(2., 0.), 1)?;
        assert_eq!(pt.transform_point(&[10., 5., 7.])?, vec![10., 10., 7.]);

        let id = PassThroughTransform::create(2, IdentityTransform::create(1), 3)?;
        assert!(id.is_identity());
        assert_eq!(id.source_dimensions(), 6);

        let exp = ExponentialTransform1D::create(10., 1.);
        assert!(Arc::ptr_eq(&PassThroughTransform::create(0, exp.clone(), 0)?, &exp));
        Ok(())
    }

    #[test]
    fn flattening() -> Result<(), Error> {
        let exp = ExponentialTransform1D::create(10., 1.);
        let inner = PassThroughTransform::create(1, exp.clone(), 2)?;
        let outer = PassThroughTransform::create(3, inner, 1)?;
        let pt = outer
            .downcast_ref::<PassThroughTransform>()
            .ok_or(Error::Unknown)?;
        assert_eq!(pt.first_affected_ordinate(), 4);
        assert_eq!(pt.num_trailing_ordinates(), 3);
        assert!(Arc::ptr_eq(pt.sub_transform(), &exp));
        assert_eq!(pt.modified_coordinates(), vec![4]);
        Ok(())
    }

    #[test]
    fn evaluation() -> Result<(), Error> {
        let exp = ExponentialTransform1D::create(10., 1.);
        let pt = PassThroughTransform::create(1, exp, 1)?;
        let y = pt.transform_point(&[5., 2., 7.])?;
        assert_float_eq!(y[1], 100., abs <= 1e-12);
        assert_eq!((y[0], y[2]), (5., 7.));

        let d = pt.derivative(&[5., 2., 7.])?;
        assert_eq!(d[(0, 0)], 1.);
        assert_eq!(d[(2, 2)], 1.);
        assert_eq!(d[(0, 1)], 0.);
        assert_float_eq!(d[(1, 1)], 100. * 10_f64.ln(), abs <= 1e-9);

        let src = [1., 0., 2., 3., 1., 4., 5., 2., 6.];
        let mut dst = [0.; 9];
        pt.transform_pts(&src, &mut dst, 3)?;
        assert_eq!(dst[0], 1.);
        assert_float_eq!(dst[1], 1., abs <= 1e-12);
        assert_float_eq!(dst[4], 10., abs <= 1e-12);
        assert_float_eq!(dst[7], 100., abs <= 1e-12);
        assert_eq!(dst[8], 6.);

        let inv = pt.clone().inverse()?;
        let x = inv.transform_point(&y)?;
        assert_float_eq!(x[1], 2., abs <= 1e-12);
        assert!(Arc::ptr_eq(&inv.inverse()?, &pt));
        Ok(())
    }

    #[test]
    fn sub_matrix() -> Result<(), Error> {
        let exp = ExponentialTransform1D::create(10., 1.);
        let tr = PassThroughTransform::create(1, exp, 1)?;
        let pt = tr
            .downcast_ref::<PassThroughTransform>()
            .ok_or(Error::Unknown)?;

        // Scales and offsets the middle dimension only
        let m = Matrix::from_rows(&[
            [1., 0., 0., 0.],
            [0., 3., 0., 2.],
            [0., 0., 1., 0.],
            [0., 0., 0., 1.],
        ])?;
        let sub = pt.to_sub_matrix(&m, true).ok_or(Error::Unknown)?;
        assert_eq!(sub, Matrix::affine_1d(3., 2.));

        // Touches a pass-through dimension
        let mut touching = m.clone();
        touching[(0, 0)] = 2.;
        assert!(pt.to_sub_matrix(&touching, true).is_none());
        let mut mixing = m.clone();
        mixing[(1, 0)] = 1.;
        assert!(pt.to_sub_matrix(&mixing, true).is_none());

        // Absorbed into the sub-transform: 10^(3x + 2)
        let absorbed = pt.absorb_matrix(&m, true)?.ok_or(Error::Unknown)?;
        assert!(absorbed.is::<PassThroughTransform>());
        let y = absorbed.transform_point(&[1., 1., 1.])?;
        assert_float_eq!(y[1], 1e5, abs <= 1e-6);
        Ok(())
    }

    #[test]
    fn merging() -> Result<(), Error> {
        let exp = ExponentialTransform1D::create(10., 1.);
        let a = PassThroughTransform::create(1, exp.clone(), 0)?;
        let b = PassThroughTransform::create(1, exp.inverse()?, 0)?;
        let chain = ConcatenatedTransform::create(a, b)?;
        assert!(chain.is_identity());
        Ok(())
    }
}
