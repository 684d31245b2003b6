use crate::authoring::*;
use crate::linear::affine_parameters;
use crate::linear::GAMUT;
use crate::matrix::Matrix;
use crate::parameter::OpParameter;
use crate::transform::batch::check_length;
use once_cell::sync::Lazy;

/// Copies ordinates unchanged
#[derive(Debug)]
pub struct IdentityTransform {
    dimension: usize,
}

// The small ones are shared
static SHARED: Lazy<Vec<TransformRef>> = Lazy::new(|| {
    (0..=4)
        .map(|dimension| Arc::new(IdentityTransform { dimension }) as TransformRef)
        .collect()
});

impl IdentityTransform {
    pub fn create(dimension: usize) -> TransformRef {
        match SHARED.get(dimension) {
            Some(identity) => identity.clone(),
            None => Arc::new(IdentityTransform { dimension }),
        }
    }
}

impl MathTransform for IdentityTransform {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn name(&self) -> &'static str {
        "IdentityTransform"
    }
    fn source_dimensions(&self) -> usize {
        self.dimension
    }
    fn target_dimensions(&self) -> usize {
        self.dimension
    }
    fn is_identity(&self) -> bool {
        true
    }

    fn transform_one(
        &self,
        src: &[f64],
        dst: Option<&mut [f64]>,
        derivate: bool,
    ) -> Result<Option<Matrix>, Error> {
        if let Some(dst) = dst {
            dst[..self.dimension].copy_from_slice(&src[..self.dimension]);
        }
        Ok(derivate.then(|| Matrix::identity(self.dimension)))
    }

    fn transform_pts(&self, src: &[f64], dst: &mut [f64], num_pts: usize) -> Result<(), Error> {
        let n = num_pts * self.dimension;
        check_length("source", n, src.len())?;
        check_length("destination", n, dst.len())?;
        dst[..n].copy_from_slice(&src[..n]);
        Ok(())
    }

    fn transform_in_place(
        &self,
        pts: &mut [f64],
        src_off: usize,
        dst_off: usize,
        num_pts: usize,
    ) -> Result<(), Error> {
        let n = num_pts * self.dimension;
        check_length("source", src_off + n, pts.len())?;
        check_length("destination", dst_off + n, pts.len())?;
        pts.copy_within(src_off..src_off + n, dst_off);
        Ok(())
    }

    fn transform_f32(&self, src: &[f32], dst: &mut [f32], num_pts: usize) -> Result<(), Error> {
        let n = num_pts * self.dimension;
        check_length("source", n, src.len())?;
        check_length("destination", n, dst.len())?;
        dst[..n].copy_from_slice(&src[..n]);
        Ok(())
    }

    fn transform_f32_in_place(
        &self,
        pts: &mut [f32],
        src_off: usize,
        dst_off: usize,
        num_pts: usize,
    ) -> Result<(), Error> {
        let n = num_pts * self.dimension;
        check_length("source", src_off + n, pts.len())?;
        check_length("destination", dst_off + n, pts.len())?;
        pts.copy_within(src_off..src_off + n, dst_off);
        Ok(())
    }

    fn inverse(self: Arc<Self>) -> Result<TransformRef, Error> {
        Ok(self)
    }

    fn matrix(&self) -> Option<Matrix> {
        Some(Matrix::identity(self.dimension + 1))
    }

    fn parameter_descriptors(&self) -> Option<&'static [OpParameter]> {
        Some(&GAMUT)
    }

    fn parameters(&self) -> Option<ParameterValues> {
        Some(affine_parameters(&Matrix::identity(self.dimension + 1)))
    }
}

// ----- T E S T S ------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity() -> Result<(), Error> {
        let id = IdentityTransform::create(3);
        assert!(Arc::ptr_eq(&id, &IdentityTransform::create(3)));
        assert!(Arc::ptr_eq(&id, &id.clone().inverse()?));
        assert_eq!(IdentityTransform::create(7).source_dimensions(), 7);

        let p = [1.0 / 3.0, f64::MAX, -0.0];
        let q = id.transform_point(&p)?;
        assert_eq!(q[0].to_bits(), p[0].to_bits());
        assert_eq!(q[2].to_bits(), p[2].to_bits());

        let mut pts = [1., 2., 3., 4., 5., 6., 0., 0., 0.];
        id.transform_in_place(&mut pts, 0, 3, 2)?;
        assert_eq!(pts, [1., 2., 3., 1., 2., 3., 4., 5., 6.]);
        assert!(id.derivative(&p)?.is_identity());
        Ok(())
    }
}
