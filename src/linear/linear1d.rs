use crate::authoring::*;
use crate::linear::affine_parameters;
use crate::linear::GAMUT;
use crate::matrix::Matrix;
use crate::parameter::OpParameter;
use crate::transform::batch::check_length;

/// `y = scale·x + offset`
#[derive(Debug)]
pub struct LinearTransform1D {
    scale: f64,
    offset: f64,
    inverse: InverseCell,
}

impl LinearTransform1D {
    /// Zero scale gives a [`ConstantTransform1D`], unit scale and zero offset
    /// the shared one dimensional identity.
    pub fn create(scale: f64, offset: f64) -> TransformRef {
        if scale == 0. {
            return ConstantTransform1D::create(offset);
        }
        if scale == 1. && offset == 0. {
            return IdentityTransform::create(1);
        }
        Arc::new(LinearTransform1D::with_cell(scale, offset, InverseCell::new()))
    }

    pub(crate) fn with_cell(scale: f64, offset: f64, inverse: InverseCell) -> LinearTransform1D {
        LinearTransform1D {
            scale,
            offset,
            inverse,
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }
}

impl MathTransform for LinearTransform1D {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn name(&self) -> &'static str {
        "LinearTransform1D"
    }
    fn source_dimensions(&self) -> usize {
        1
    }
    fn target_dimensions(&self) -> usize {
        1
    }

    fn transform_one(
        &self,
        src: &[f64],
        dst: Option<&mut [f64]>,
        derivate: bool,
    ) -> Result<Option<Matrix>, Error> {
        if let Some(dst) = dst {
            dst[0] = self.scale * src[0] + self.offset;
        }
        Ok(derivate.then(|| Matrix::from_diagonal(&[self.scale])))
    }

    fn transform_pts(&self, src: &[f64], dst: &mut [f64], num_pts: usize) -> Result<(), Error> {
        check_length("source", num_pts, src.len())?;
        check_length("destination", num_pts, dst.len())?;
        for (d, s) in dst[..num_pts].iter_mut().zip(&src[..num_pts]) {
            *d = self.scale * s + self.offset;
        }
        Ok(())
    }

    fn transform_1d(&self, x: f64) -> Result<f64, Error> {
        Ok(self.scale * x + self.offset)
    }

    fn derivative_1d(&self, _x: f64) -> Result<f64, Error> {
        Ok(self.scale)
    }

    fn inverse(self: Arc<Self>) -> Result<TransformRef, Error> {
        let origin: TransformRef = self.clone();
        self.inverse.get_or_init(|| {
            Ok(Arc::new(LinearTransform1D::with_cell(
                1. / self.scale,
                -self.offset / self.scale,
                InverseCell::with_origin(origin),
            )))
        })
    }

    fn matrix(&self) -> Option<Matrix> {
        Some(Matrix::affine_1d(self.scale, self.offset))
    }

    fn parameter_descriptors(&self) -> Option<&'static [OpParameter]> {
        Some(&GAMUT)
    }

    fn parameters(&self) -> Option<ParameterValues> {
        Some(affine_parameters(&Matrix::affine_1d(self.scale, self.offset)))
    }
}

// ----- C O N S T A N T -----

/// `y = offset`, whatever `x`
#[derive(Debug)]
pub struct ConstantTransform1D {
    offset: f64,
}

impl ConstantTransform1D {
    pub fn create(offset: f64) -> TransformRef {
        Arc::new(ConstantTransform1D { offset })
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }
}

impl MathTransform for ConstantTransform1D {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn name(&self) -> &'static str {
        "ConstantTransform1D"
    }
    fn source_dimensions(&self) -> usize {
        1
    }
    fn target_dimensions(&self) -> usize {
        1
    }

    fn transform_one(
        &self,
        _src: &[f64],
        dst: Option<&mut [f64]>,
        derivate: bool,
    ) -> Result<Option<Matrix>, Error> {
        if let Some(dst) = dst {
            dst[0] = self.offset;
        }
        Ok(derivate.then(|| Matrix::zeros(1, 1)))
    }

    fn transform_pts(&self, src: &[f64], dst: &mut [f64], num_pts: usize) -> Result<(), Error> {
        check_length("source", num_pts, src.len())?;
        check_length("destination", num_pts, dst.len())?;
        dst[..num_pts].fill(self.offset);
        Ok(())
    }

    fn inverse(self: Arc<Self>) -> Result<TransformRef, Error> {
        Err(Error::NonInvertible(String::from("constant transform")))
    }

    fn matrix(&self) -> Option<Matrix> {
        Some(Matrix::affine_1d(0., self.offset))
    }

    fn parameter_descriptors(&self) -> Option<&'static [OpParameter]> {
        Some(&GAMUT)
    }

    fn parameters(&self) -> Option<ParameterValues> {
        Some(affine_parameters(&Matrix::affine_1d(0., self.offset)))
    }
}

// ----- T E S T S ------------------------------------------------------------------
