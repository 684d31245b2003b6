use crate::authoring::*;
use crate::linear::as_linear_1d;
use crate::matrix::Matrix;
use crate::parameter::OpParameter;

#[rustfmt::skip]
pub const GAMUT: [OpParameter; 2] = [
    OpParameter::Real { key: "base",  default: Some(10.) },
    OpParameter::Real { key: "scale", default: Some(1.) },
];

/// `y = scale·base^x`
#[derive(Debug)]
pub struct ExponentialTransform1D {
    base: f64,
    ln_base: f64,
    scale: f64,
    inverse: InverseCell,
}

impl ExponentialTransform1D {
    /// Zero base or scale gives the constant zero, unit base the constant `scale`
    pub fn create(base: f64, scale: f64) -> TransformRef {
        if base == 0. || scale == 0. {
            return LinearTransform1D::create(0., 0.);
        }
        if base == 1. {
            return LinearTransform1D::create(0., scale);
        }
        Arc::new(ExponentialTransform1D::with_cell(base, scale, InverseCell::new()))
    }

    pub(crate) fn with_cell(base: f64, scale: f64, inverse: InverseCell) -> ExponentialTransform1D {
        ExponentialTransform1D {
            base,
            ln_base: base.ln(),
            scale,
            inverse,
        }
    }

    pub fn base(&self) -> f64 {
        self.base
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    fn apply(&self, x: f64) -> f64 {
        self.scale * self.base.powf(x)
    }
}

impl MathTransform for ExponentialTransform1D {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn name(&self) -> &'static str {
        "Exponential"
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
        let y = self.apply(src[0]);
        if let Some(dst) = dst {
            dst[0] = y;
        }
        Ok(derivate.then(|| Matrix::from_diagonal(&[self.ln_base * y])))
    }

    fn transform_1d(&self, x: f64) -> Result<f64, Error> {
        Ok(self.apply(x))
    }

    fn derivative_1d(&self, x: f64) -> Result<f64, Error> {
        Ok(self.ln_base * self.apply(x))
    }

    /// The logarithm of base `base`, offset by `-log(scale)`
    fn inverse(self: Arc<Self>) -> Result<TransformRef, Error> {
        let origin: TransformRef = self.clone();
        self.inverse.get_or_init(|| {
            let offset = -self.scale.ln() / self.ln_base;
            Ok(Arc::new(LogarithmicTransform1D::with_cell(
                self.base,
                offset,
                InverseCell::with_origin(origin),
            )))
        })
    }

    fn concatenate(&self, other: &TransformRef, apply_other_first: bool) -> Option<TransformRef> {
        if let Some((s, o)) = as_linear_1d(other.as_ref()) {
            if apply_other_first {
                // scale·base^(s·x + o) = (scale·base^o)·(base^s)^x
                return Some(ExponentialTransform1D::create(
                    self.base.powf(s),
                    self.scale * self.base.powf(o),
                ));
            }
            if o == 0. {
                return Some(ExponentialTransform1D::create(self.base, self.scale * s));
            }
            return None;
        }

        let log = other.downcast_ref::<LogarithmicTransform1D>()?;
        if apply_other_first {
            // scale·base^(log_base(x) + offset) = scale·base^offset·x
            if log.base() == self.base {
                return Some(LinearTransform1D::create(
                    self.scale * self.base.powf(log.offset()),
                    0.,
                ));
            }
            return None;
        }
        // log_B(scale·base^x) + offset = x·ln(base)/ln(B) + log_B(scale) + offset
        if !(self.scale > 0.) {
            return None;
        }
        let ln_b = log.base().ln();
        Some(LinearTransform1D::create(
            self.ln_base / ln_b,
            self.scale.ln() / ln_b + log.offset(),
        ))
    }

    fn parameter_descriptors(&self) -> Option<&'static [OpParameter]> {
        Some(&GAMUT)
    }

    fn parameters(&self) -> Option<ParameterValues> {
        Some(
            ParameterValues::named("Exponential")
                .with_real("base", self.base)
                .with_real("scale", self.scale),
        )
    }
}

// ----- T E S T S ------------------------------------------------------------------
