use crate::authoring::*;
use crate::linear::affine_parameters;
use crate::linear::linear_inverse_of;
use crate::linear::GAMUT;
use crate::matrix::Matrix;
use crate::parameter::OpParameter;
use crate::transform::batch::check_length;

/// Each target ordinate is a copy of one source ordinate. Exact, NaN safe,
/// and faster than the equivalent matrix multiplication.
#[derive(Debug)]
pub struct CopyTransform {
    source_dimensions: usize,
    /// The source dimension of each target dimension
    indices: Vec<usize>,
    inverse: InverseCell,
}

/// If every row of `matrix` copies exactly one source ordinate, unscaled and
/// unshifted, the source dimension of each row
pub(crate) fn copied_dimensions(matrix: &Matrix) -> Option<Vec<usize>> {
    if !matrix.is_affine() {
        return None;
    }
    let s = matrix.cols() - 1;
    let mut indices = Vec::with_capacity(matrix.rows() - 1);
    for j in 0..matrix.rows() - 1 {
        let row = matrix.row(j);
        if row[s] != 0. {
            return None;
        }
        let mut found = None;
        for (i, e) in row[..s].iter().enumerate() {
            if *e == 0. {
                continue;
            }
            if *e != 1. || found.is_some() {
                return None;
            }
            found = Some(i);
        }
        indices.push(found?);
    }
    Some(indices)
}

impl CopyTransform {
    pub fn new(source_dimensions: usize, indices: Vec<usize>) -> Result<CopyTransform, Error> {
        if let Some(bad) = indices.iter().find(|i| **i >= source_dimensions) {
            return Err(Error::BadParam(
                String::from("indices"),
                format!("{bad} out of range for dimension {source_dimensions}"),
            ));
        }
        Ok(CopyTransform::with_cell(source_dimensions, indices, InverseCell::new()))
    }

    /// A copy transform for `matrix`, if it is a pure copy
    pub fn try_from_matrix(matrix: &Matrix) -> Option<CopyTransform> {
        let indices = copied_dimensions(matrix)?;
        Some(CopyTransform::with_cell(matrix.cols() - 1, indices, InverseCell::new()))
    }

    pub(crate) fn with_cell(source_dimensions: usize, indices: Vec<usize>, inverse: InverseCell) -> CopyTransform {
        CopyTransform {
            source_dimensions,
            indices,
            inverse,
        }
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    fn build_matrix(&self) -> Matrix {
        let s = self.source_dimensions;
        let t = self.indices.len();
        let mut m = Matrix::zeros(t + 1, s + 1);
        for (j, i) in self.indices.iter().enumerate() {
            m[(j, *i)] = 1.;
        }
        m[(t, s)] = 1.;
        m
    }
}

impl MathTransform for CopyTransform {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn name(&self) -> &'static str {
        "CopyTransform"
    }
    fn source_dimensions(&self) -> usize {
        self.source_dimensions
    }
    fn target_dimensions(&self) -> usize {
        self.indices.len()
    }
    fn is_identity(&self) -> bool {
        self.indices.len() == self.source_dimensions
            && self.indices.iter().enumerate().all(|(j, i)| j == *i)
    }

    fn transform_one(
        &self,
        src: &[f64],
        dst: Option<&mut [f64]>,
        derivate: bool,
    ) -> Result<Option<Matrix>, Error> {
        if let Some(dst) = dst {
            for (d, i) in dst.iter_mut().zip(&self.indices) {
                *d = src[*i];
            }
        }
        Ok(derivate.then(|| {
            let mut m = Matrix::zeros(self.indices.len(), self.source_dimensions);
            for (j, i) in self.indices.iter().enumerate() {
                m[(j, *i)] = 1.;
            }
            m
        }))
    }

    fn transform_pts(&self, src: &[f64], dst: &mut [f64], num_pts: usize) -> Result<(), Error> {
        let s = self.source_dimensions;
        let t = self.indices.len();
        check_length("source", num_pts * s, src.len())?;
        check_length("destination", num_pts * t, dst.len())?;
        for k in 0..num_pts {
            let from = &src[k * s..(k + 1) * s];
            for (d, i) in dst[k * t..(k + 1) * t].iter_mut().zip(&self.indices) {
                *d = from[*i];
            }
        }
        Ok(())
    }

    fn transform_f32(&self, src: &[f32], dst: &mut [f32], num_pts: usize) -> Result<(), Error> {
        let s = self.source_dimensions;
        let t = self.indices.len();
        check_length("source", num_pts * s, src.len())?;
        check_length("destination", num_pts * t, dst.len())?;
        for k in 0..num_pts {
            let from = &src[k * s..(k + 1) * s];
            for (d, i) in dst[k * t..(k + 1) * t].iter_mut().zip(&self.indices) {
                *d = from[*i];
            }
        }
        Ok(())
    }

    /// A copy transform back, if every source dimension is copied somewhere.
    /// Otherwise a projective transform giving NaN for the lost dimensions.
    fn inverse(self: Arc<Self>) -> Result<TransformRef, Error> {
        let origin: TransformRef = self.clone();
        self.inverse.get_or_init(|| {
            let mut back = Vec::with_capacity(self.source_dimensions);
            for i in 0..self.source_dimensions {
                match self.indices.iter().position(|j| *j == i) {
                    Some(j) => back.push(j),
                    None => return linear_inverse_of(&self.build_matrix().inverse()?, origin),
                }
            }
            Ok(Arc::new(CopyTransform::with_cell(
                self.indices.len(),
                back,
                InverseCell::with_origin(origin),
            )))
        })
    }

    fn matrix(&self) -> Option<Matrix> {
        Some(self.build_matrix())
    }

    fn parameter_descriptors(&self) -> Option<&'static [OpParameter]> {
        Some(&GAMUT)
    }

    fn parameters(&self) -> Option<ParameterValues> {
        Some(affine_parameters(&self.build_matrix()))
    }
}

// ----- T E S T S ------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear::linear;
    use crate::linear::ProjectiveTransform;

    fn drop_and_swap() -> Result<TransformRef, Error> {
        // (x, y, z) -> (y, x)
        linear(&Matrix::from_rows(&[
            [0., 1., 0., 0.],
            [1., 0., 0., 0.],
            [0., 0., 0., 1.],
        ])?)
    }

    #[test]
    fn detection() -> Result<(), Error> {
        assert!(drop_and_swap()?.is::<CopyTransform>());
        let scaled = Matrix::from_rows(&[[0., 2., 0.], [1., 0., 0.], [0., 0., 1.]])?;
        assert!(CopyTransform::try_from_matrix(&scaled).is_none());
        let shifted = Matrix::from_rows(&[[0., 1., 1.], [1., 0., 0.], [0., 0., 1.]])?;
        assert!(CopyTransform::try_from_matrix(&shifted).is_none());
        assert!(CopyTransform::new(2, vec![0, 2]).is_err());
        Ok(())
    }

    #[test]
    fn lossy_inverse() -> Result<(), Error> {
        let tr = drop_and_swap()?;
        assert_eq!(tr.transform_point(&[1., 2., 3.])?, [2., 1.]);
        assert_eq!(tr.transform_point(&[f64::NAN, 2., 3.])?[0], 2.);

        let inv = tr.clone().inverse()?;
        assert!(inv.is::<ProjectiveTransform>());
        let back = inv.transform_point(&[2., 1.])?;
        assert_eq!(back[..2], [1., 2.]);
        assert!(back[2].is_nan());
        Ok(())
    }

    #[test]
    fn reordering_inverse() -> Result<(), Error> {
        // (x, y, z) -> (z, x, y, x)
        let tr: TransformRef = Arc::new(CopyTransform::new(3, vec![2, 0, 1, 0])?);
        assert_eq!(tr.transform_point(&[1., 2., 3.])?, [3., 1., 2., 1.]);
        let inv = tr.clone().inverse()?;
        assert!(inv.is::<CopyTransform>());
        assert_eq!(inv.transform_point(&[3., 1., 2., 1.])?, [1., 2., 3.]);
        assert!(Arc::ptr_eq(&inv.inverse()?, &tr));

        let mut f = [0_f32; 8];
        tr.transform_f32(&[1., 2., 3., 4., 5., 6.], &mut f, 2)?;
        assert_eq!(f, [3., 1., 2., 1., 6., 4., 5., 4.]);
        Ok(())
    }
}
