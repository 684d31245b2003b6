#![allow(non_snake_case)]
use crate::authoring::*;
use crate::linear::linear;
use crate::transform::Contextual;
use std::f64::consts::FRAC_PI_2;

#[rustfmt::skip]
pub const GAMUT: [OpParameter; 3] = [
    OpParameter::Real    { key: "semi_major", default: None },
    OpParameter::Real    { key: "semi_minor", default: None },
    OpParameter::Natural { key: "dim",        default: Some(3) },
];

/// Toms' correction of the Bowring parameter estimate
const AD_C: f64 = 1.0026;

/// Below cos(67.5°), the height is computed from Z to avoid cancellation
const COS_67P5: f64 = 0.382_683_432_365_089_77;

/// Discrepancy, in metres, of the inverse conversion reported by the self check
const CHECK_TOLERANCE: f64 = 0.01;

/// The ellipsoid constants, shared by all variants of a conversion
#[derive(Debug)]
struct Shape {
    a: f64,
    b: f64,
    e2: f64,
    ep2: f64,
}

impl Shape {
    fn new(a: f64, b: f64) -> Result<Shape, Error> {
        if !(a > 0. && a.is_finite()) {
            return Err(Error::BadParam(String::from("semi_major"), a.to_string()));
        }
        if !(b > 0. && b <= a) {
            return Err(Error::BadParam(String::from("semi_minor"), b.to_string()));
        }
        let a2 = a * a;
        let b2 = b * b;
        Ok(Shape {
            a,
            b,
            e2: (a2 - b2) / a2,
            ep2: (a2 - b2) / b2,
        })
    }

    /// Geographic (radians) to geocentric conversion
    fn geocentric(&self, lam: f64, phi: f64, h: f64) -> [f64; 3] {
        let (sinlam, coslam) = lam.sin_cos();
        let (sinphi, cosphi) = phi.sin_cos();
        let N = self.a / (1.0 - self.e2 * sinphi * sinphi).sqrt();
        [
            (N + h) * cosphi * coslam,
            (N + h) * cosphi * sinlam,
            (N * (1.0 - self.e2) + h) * sinphi,
        ]
    }

    /// The Jacobian of [`Shape::geocentric`], with or without the height column
    fn jacobian(&self, lam: f64, phi: f64, h: f64, with_height: bool) -> Matrix {
        let (sinlam, coslam) = lam.sin_cos();
        let (sinphi, cosphi) = phi.sin_cos();
        let w2 = 1.0 - self.e2 * sinphi * sinphi;
        let N = self.a / w2.sqrt();
        let dN = N * self.e2 * sinphi * cosphi / w2;

        // d((N+h)·cos φ)/dφ
        let dr = dN * cosphi - (N + h) * sinphi;
        let mut j = Matrix::zeros(3, if with_height { 3 } else { 2 });
        j[(0, 0)] = -(N + h) * cosphi * sinlam;
        j[(1, 0)] = (N + h) * cosphi * coslam;
        j[(0, 1)] = dr * coslam;
        j[(1, 1)] = dr * sinlam;
        j[(2, 1)] = dN * (1.0 - self.e2) * sinphi + (N * (1.0 - self.e2) + h) * cosphi;
        if with_height {
            j[(0, 2)] = cosphi * coslam;
            j[(1, 2)] = cosphi * sinlam;
            j[(2, 2)] = sinphi;
        }
        j
    }

    /// Geocentric to geographic (radians) conversion.
    ///
    /// Follows the non-iterative algorithm of
    /// Toms ([1996](crate::Bibliography::Tom96)), which uses a corrected
    /// Bowring ([1976](crate::Bibliography::Bow76)) estimate. The height is
    /// only computed if `with_height`, and is zero otherwise.
    fn geographic(&self, X: f64, Y: f64, Z: f64, with_height: bool) -> [f64; 3] {
        let W2 = X * X + Y * Y;
        let W = W2.sqrt();
        let lam = Y.atan2(X);

        // On the polar axis, the latitude follows the sign of Z
        if W < 1.0e-12 {
            let phi = FRAC_PI_2.copysign(Z);
            let h = if with_height { Z.abs() - self.b } else { 0. };
            return [lam, phi, h];
        }

        let T0 = Z * AD_C;
        let S0 = (T0 * T0 + W2).sqrt();
        let sin_B0 = T0 / S0;
        let cos_B0 = W / S0;
        let sin3_B0 = sin_B0 * sin_B0 * sin_B0;
        let T1 = Z + self.b * self.ep2 * sin3_B0;
        let sum = W - self.a * self.e2 * cos_B0 * cos_B0 * cos_B0;
        let S1 = (T1 * T1 + sum * sum).sqrt();
        let sin_p1 = T1 / S1;
        let cos_p1 = sum / S1;
        let phi = (sin_p1 / cos_p1).atan();
        if !with_height {
            return [lam, phi, 0.];
        }

        let N = self.a / (1.0 - self.e2 * sin_p1 * sin_p1).sqrt();
        let h = if cos_p1 >= COS_67P5 {
            W / cos_p1 - N
        } else if cos_p1 <= -COS_67P5 {
            W / -cos_p1 - N
        } else {
            Z / sin_p1 + N * (self.e2 - 1.0)
        };
        [lam, phi, h]
    }

    fn parameters(&self, name: &str, dim: usize) -> ParameterValues {
        ParameterValues::named(name)
            .with_real("semi_major", self.a)
            .with_real("semi_minor", self.b)
            .with_natural("dim", dim)
    }
}

fn degrees_to_radians(with_height: bool) -> Matrix {
    let r = 1f64.to_radians();
    match with_height {
        true => Matrix::scale(&[r, r, 1.]),
        false => Matrix::scale(&[r, r]),
    }
}

fn radians_to_degrees(with_height: bool) -> Matrix {
    let d = 1f64.to_degrees();
    match with_height {
        true => Matrix::scale(&[d, d, 1.]),
        false => Matrix::scale(&[d, d]),
    }
}

// ----- F O R W A R D ---------------------------------------------------------------

/// Conversion from geographic `(λ, φ [, h])` in radians and metres, to
/// geocentric `(X, Y, Z)` in metres.
///
/// [`GeocentricTransform::create`] provides the same conversion for
/// geographic coordinates in degrees.
#[derive(Debug)]
pub struct GeocentricTransform {
    shape: Arc<Shape>,
    has_height: bool,
    /// The variant with the other number of source dimensions
    sibling: InverseCell,
    inverse: InverseCell,
}

impl GeocentricTransform {
    /// The conversion kernel, in radians
    pub fn new(semi_major: f64, semi_minor: f64, has_height: bool) -> Result<GeocentricTransform, Error> {
        Ok(GeocentricTransform {
            shape: Arc::new(Shape::new(semi_major, semi_minor)?),
            has_height,
            sibling: InverseCell::new(),
            inverse: InverseCell::new(),
        })
    }

    /// The conversion from geographic degrees, i.e. a degrees-to-radians
    /// affine followed by the kernel
    pub fn create(semi_major: f64, semi_minor: f64, has_height: bool) -> Result<TransformRef, Error> {
        let kernel: TransformRef = Arc::new(GeocentricTransform::new(semi_major, semi_minor, has_height)?);
        let normalize = linear(&degrees_to_radians(has_height))?;
        ConcatenatedTransform::create(normalize, kernel)
    }

    pub fn from_ellipsoid(ellps: &Ellipsoid, has_height: bool) -> Result<TransformRef, Error> {
        GeocentricTransform::create(ellps.semimajor_axis(), ellps.semiminor_axis(), has_height)
    }

    pub fn semi_major(&self) -> f64 {
        self.shape.a
    }

    pub fn semi_minor(&self) -> f64 {
        self.shape.b
    }

    pub fn has_height(&self) -> bool {
        self.has_height
    }

    /// The kernel for 3D (`has_height`) or 2D source coordinates, sharing
    /// the ellipsoid constants of `self`
    pub fn for_dimensions(self: Arc<Self>, has_height: bool) -> Result<TransformRef, Error> {
        if has_height == self.has_height {
            return Ok(self);
        }
        let origin: TransformRef = self.clone();
        self.sibling.get_or_init(|| {
            Ok(Arc::new(GeocentricTransform {
                shape: self.shape.clone(),
                has_height,
                sibling: InverseCell::with_origin(origin),
                inverse: InverseCell::new(),
            }))
        })
    }
}

impl MathTransform for GeocentricTransform {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn name(&self) -> &'static str {
        "Geocentric"
    }
    fn source_dimensions(&self) -> usize {
        if self.has_height {
            3
        } else {
            2
        }
    }
    fn target_dimensions(&self) -> usize {
        3
    }

    fn transform_one(
        &self,
        src: &[f64],
        dst: Option<&mut [f64]>,
        derivate: bool,
    ) -> Result<Option<Matrix>, Error> {
        let lam = src[0];
        let phi = src[1];
        let h = if self.has_height { src[2] } else { 0. };
        if let Some(dst) = dst {
            dst[..3].copy_from_slice(&self.shape.geocentric(lam, phi, h));
        }
        Ok(derivate.then(|| self.shape.jacobian(lam, phi, h, self.has_height)))
    }

    fn inverse(self: Arc<Self>) -> Result<TransformRef, Error> {
        let origin: TransformRef = self.clone();
        self.inverse.get_or_init(|| {
            Ok(Arc::new(GeocentricInverse {
                shape: self.shape.clone(),
                has_height: self.has_height,
                inverse: InverseCell::with_origin(origin),
            }))
        })
    }

    fn parameter_descriptors(&self) -> Option<&'static [OpParameter]> {
        Some(&GAMUT)
    }

    fn parameters(&self) -> Option<ParameterValues> {
        Some(
            self.shape
                .parameters("Ellipsoid_To_Geocentric", self.source_dimensions()),
        )
    }

    fn contextual(&self) -> Option<Contextual> {
        Some(Contextual {
            normalize: degrees_to_radians(self.has_height),
            denormalize: Matrix::identity(4),
        })
    }
}

// ----- I N V E R S E ---------------------------------------------------------------

/// Conversion from geocentric `(X, Y, Z)` to geographic `(λ, φ [, h])` in
/// radians and metres
#[derive(Debug)]
pub struct GeocentricInverse {
    shape: Arc<Shape>,
    has_height: bool,
    inverse: InverseCell,
}

impl MathTransform for GeocentricInverse {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn name(&self) -> &'static str {
        "GeocentricInverse"
    }
    fn source_dimensions(&self) -> usize {
        3
    }
    fn target_dimensions(&self) -> usize {
        if self.has_height {
            3
        } else {
            2
        }
    }

    fn transform_one(
        &self,
        src: &[f64],
        dst: Option<&mut [f64]>,
        derivate: bool,
    ) -> Result<Option<Matrix>, Error> {
        let (x, y, z) = (src[0], src[1], src[2]);
        let geo = self.shape.geographic(x, y, z, self.has_height || derivate);

        if cfg!(debug_assertions) && self.has_height && geo.iter().all(|v| v.is_finite()) {
            let back = self.shape.geocentric(geo[0], geo[1], geo[2]);
            let error = (back[0] - x).hypot(back[1] - y).hypot(back[2] - z);
            if error > CHECK_TOLERANCE {
                warn!("geocentric inverse: round trip error {error} m at ({x}, {y}, {z})");
            }
        }

        let t = self.target_dimensions();
        if let Some(dst) = dst {
            dst[..t].copy_from_slice(&geo[..t]);
        }
        if !derivate {
            return Ok(None);
        }
        // The inverse of the Jacobian of the forward conversion
        let forward = self.shape.jacobian(geo[0], geo[1], geo[2], true);
        let inverse = forward.inverse()?;
        if self.has_height {
            return Ok(Some(inverse));
        }
        Ok(Some(Matrix::from_rows(&[inverse.row(0), inverse.row(1)])?))
    }

    fn inverse(self: Arc<Self>) -> Result<TransformRef, Error> {
        let origin: TransformRef = self.clone();
        self.inverse.get_or_init(|| {
            Ok(Arc::new(GeocentricTransform {
                shape: self.shape.clone(),
                has_height: self.has_height,
                sibling: InverseCell::new(),
                inverse: InverseCell::with_origin(origin),
            }))
        })
    }

    fn parameter_descriptors(&self) -> Option<&'static [OpParameter]> {
        Some(&GAMUT)
    }

    fn parameters(&self) -> Option<ParameterValues> {
        Some(
            self.shape
                .parameters("Geocentric_To_Ellipsoid", self.target_dimensions()),
        )
    }

    fn contextual(&self) -> Option<Contextual> {
        Some(Contextual {
            normalize: Matrix::identity(4),
            denormalize: radians_to_degrees(self.has_height),
        })
    }
}

// ----- T E S T S ------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;

    const A: f64 = 6378137.0;
    const B: f64 = 6356752.314245179;

    #[test]
    fn forward() -> Result<(), Error> {
        let tr = GeocentricTransform::create(A, B, true)?;
        let xyz = tr.transform_point(&[0., 0., 0.])?;
        assert_float_eq!(xyz[0], A, abs <= 1e-9);
        assert_float_eq!(xyz[1], 0., abs <= 1e-9);
        assert_float_eq!(xyz[2], 0., abs <= 1e-9);

        let xyz = tr.transform_point(&[0., 90., 0.])?;
        assert_float_eq!(xyz[2], B, abs <= 1e-6);

        let flat = GeocentricTransform::create(A, B, false)?;
        assert_eq!(flat.source_dimensions(), 2);
        let xyz = flat.transform_point(&[90., 0.])?;
        assert_float_eq!(xyz[1], A, abs <= 1e-9);

        assert!(GeocentricTransform::create(A, A + 1., true).is_err());
        assert!(GeocentricTransform::create(-A, B, true).is_err());
        Ok(())
    }

    #[test]
    fn roundtrip() -> Result<(), Error> {
        let tr = GeocentricTransform::create(A, B, true)?;
        let inv = tr.clone().inverse()?;
        for geo in [[12., 55., 100.], [-170., -33., 1000.], [45., 89.5, 0.], [0., 0., -50.]] {
            let back = inv.transform_point(&tr.transform_point(&geo)?)?;
            assert_float_eq!(back[0], geo[0], abs <= 1e-9);
            assert_float_eq!(back[1], geo[1], abs <= 1e-6);
            assert_float_eq!(back[2], geo[2], abs <= 0.01);
        }

        // On the polar axis
        let pole = inv.transform_point(&[0., 0., -B - 10.])?;
        assert_float_eq!(pole[1], -90., abs <= 1e-12);
        assert_float_eq!(pole[2], 10., abs <= 1e-6);
        Ok(())
    }

    #[test]
    fn derivatives() -> Result<(), Error> {
        let kernel: TransformRef = Arc::new(GeocentricTransform::new(A, B, true)?);
        let p = [0.2, 0.9, 120.];
        let d = kernel.derivative(&p)?;
        let steps = [1e-5, 1e-5, 1.];
        for (i, step) in steps.iter().enumerate() {
            let mut plus = p;
            let mut minus = p;
            plus[i] += step;
            minus[i] -= step;
            let yp = kernel.transform_point(&plus)?;
            let ym = kernel.transform_point(&minus)?;
            for j in 0..3 {
                let numeric = (yp[j] - ym[j]) / (2. * step);
                assert_float_eq!(d[(j, i)], numeric, abs <= 1e-2);
            }
        }

        // The derivative of the inverse is the inverse of the derivative
        let inverse = kernel.clone().inverse()?;
        let xyz = kernel.transform_point(&p)?;
        let product = inverse.derivative(&xyz)?.multiply(&d)?;
        assert!(product.is_identity_within(1e-6));

        let flat: TransformRef = Arc::new(GeocentricTransform::new(A, B, false)?);
        let flat = flat.inverse()?;
        assert_eq!(flat.derivative(&xyz)?.rows(), 2);
        Ok(())
    }

    #[test]
    fn variants() -> Result<(), Error> {
        let kernel = Arc::new(GeocentricTransform::new(A, B, true)?);
        let flat = kernel.clone().for_dimensions(false)?;
        assert_eq!(flat.source_dimensions(), 2);
        let same = kernel.clone().for_dimensions(false)?;
        assert!(Arc::ptr_eq(&flat, &same));
        let flat = flat
            .downcast_ref::<GeocentricTransform>()
            .ok_or(Error::Unknown)?;
        assert!(Arc::ptr_eq(&flat.shape, &kernel.shape));
        Ok(())
    }

    #[test]
    fn description() -> Result<(), Error> {
        let tr = GeocentricTransform::create(A, B, true)?;
        // The degrees-to-radians affine is folded away
        let values = tr.parameters().ok_or(Error::Unknown)?;
        assert_eq!(values.name, "Ellipsoid_To_Geocentric");
        assert_eq!(values.real("semi_major")?, A);
        assert_eq!(values.natural("dim")?, 3);

        let inv = tr.inverse()?;
        let values = inv.parameters().ok_or(Error::Unknown)?;
        assert_eq!(values.name, "Geocentric_To_Ellipsoid");
        Ok(())
    }
}
