use crate::authoring::*;
use crate::linear::as_linear_1d;
use crate::matrix::Matrix;
use crate::parameter::OpParameter;

#[rustfmt::skip]
pub const GAMUT: [OpParameter; 2] = [
    OpParameter::Real { key: "base",   default: Some(10.) },
    OpParameter::Real { key: "offset", default: Some(0.) },
];

/// `y = log_base(x) + offset`
#[derive(Debug)]
pub struct LogarithmicTransform1D {
    base: f64,
    ln_base: f64,
    offset: f64,
    /// Base 10 uses the more accurate `log10`
    base10: bool,
    inverse: InverseCell,
}

impl LogarithmicTransform1D {
    /// Bases must be positive and different from 1. An infinite base gives the
    /// constant `offset`.
    pub fn create(base: f64, offset: f64) -> Result<TransformRef, Error> {
        if base.is_nan() || base <= 0. || base == 1. {
            return Err(Error::BadParam(String::from("base"), base.to_string()));
        }
        if base.is_infinite() {
            return Ok(LinearTransform1D::create(0., offset));
        }
        Ok(Arc::new(LogarithmicTransform1D::with_cell(
            base,
            offset,
            InverseCell::new(),
        )))
    }

    pub(crate) fn with_cell(base: f64, offset: f64, inverse: InverseCell) -> LogarithmicTransform1D {
        LogarithmicTransform1D {
            base,
            ln_base: base.ln(),
            offset,
            base10: base == 10.,
            inverse,
        }
    }

    pub fn base(&self) -> f64 {
        self.base
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    fn log(&self, x: f64) -> f64 {
        if self.base10 {
            return x.log10();
        }
        x.ln() / self.ln_base
    }

    fn apply(&self, x: f64) -> f64 {
        self.log(x) + self.offset
    }
}

impl MathTransform for LogarithmicTransform1D {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn name(&self) -> &'static str {
        "Logarithmic"
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
        let x = src[0];
        if let Some(dst) = dst {
            dst[0] = self.apply(x);
        }
        Ok(derivate.then(|| Matrix::from_diagonal(&[1. / (self.ln_base * x)])))
    }

    fn transform_1d(&self, x: f64) -> Result<f64, Error> {
        Ok(self.apply(x))
    }

    fn derivative_1d(&self, x: f64) -> Result<f64, Error> {
        Ok(1. / (self.ln_base * x))
    }

    /// The exponential of base `base`, scaled by `base^-offset`
    fn inverse(self: Arc<Self>) -> Result<TransformRef, Error> {
        let origin: TransformRef = self.clone();
        self.inverse.get_or_init(|| {
            Ok(Arc::new(ExponentialTransform1D::with_cell(
                self.base,
                self.base.powf(-self.offset),
                InverseCell::with_origin(origin),
            )))
        })
    }

    fn concatenate(&self, other: &TransformRef, apply_other_first: bool) -> Option<TransformRef> {
        let (s, o) = as_linear_1d(other.as_ref())?;
        if apply_other_first {
            // log(s·x) = log(x) + log(s), for positive s only
            if o == 0. && s > 0. {
                return LogarithmicTransform1D::create(self.base, self.offset + self.log(s)).ok();
            }
            return None;
        }
        // s·(log_b(x) + offset) + o = log_(b^(1/s))(x) + s·offset + o
        if s == 0. {
            return None;
        }
        LogarithmicTransform1D::create(self.base.powf(1. / s), s * self.offset + o).ok()
    }

    fn parameter_descriptors(&self) -> Option<&'static [OpParameter]> {
        Some(&GAMUT)
    }

    fn parameters(&self) -> Option<ParameterValues> {
        Some(
            ParameterValues::named("Logarithmic")
                .with_real("base", self.base)
                .with_real("offset", self.offset),
        )
    }
}

// ----- T E S T S ------------------------------------------------------------------
