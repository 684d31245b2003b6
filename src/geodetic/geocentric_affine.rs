//! Datum shifts in geocentric space: translations, and the 7 parameter
//! Helmert (Bursa-Wolf) transformation, in its small angle approximation.
#![allow(non_snake_case)]
use crate::authoring::*;
use crate::linear::affine_parameters;
use crate::linear::linear_inverse_of;
use crate::transform::batch::check_length;

#[rustfmt::skip]
pub const GAMUT: [OpParameter; 7] = [
    OpParameter::Real { key: "dx",  default: Some(0.) },
    OpParameter::Real { key: "dy",  default: Some(0.) },
    OpParameter::Real { key: "dz",  default: Some(0.) },
    OpParameter::Real { key: "ex",  default: Some(0.) },
    OpParameter::Real { key: "ey",  default: Some(0.) },
    OpParameter::Real { key: "ez",  default: Some(0.) },
    OpParameter::Real { key: "ppm", default: Some(0.) },
];

const ARCSEC: f64 = std::f64::consts::PI / (180. * 3600.);

/// Largest deviation from a scaled rotation accepted by
/// [`BursaWolfParameters::from_matrix`]
const ROTATION_TOLERANCE: f64 = 1e-9;

/// The sign convention of the rotation parameters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RotationConvention {
    /// Positive rotations turn the position vector counter-clockwise (EPSG 9606)
    #[default]
    PositionVector,
    /// Positive rotations turn the coordinate frame counter-clockwise (EPSG 9607)
    CoordinateFrame,
}

/// Translation (metres), rotation (arc-seconds) and scale difference (parts
/// per million) of a 7 parameter Helmert transformation
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BursaWolfParameters {
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    pub ex: f64,
    pub ey: f64,
    pub ez: f64,
    pub ppm: f64,
}

impl BursaWolfParameters {
    pub fn translation(dx: f64, dy: f64, dz: f64) -> BursaWolfParameters {
        BursaWolfParameters {
            dx,
            dy,
            dz,
            ..Default::default()
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == BursaWolfParameters::default()
    }

    /// True if only the translation is non-zero
    pub fn is_translation(&self) -> bool {
        self.ex == 0. && self.ey == 0. && self.ez == 0. && self.ppm == 0.
    }

    /// The 4×4 geocentric affine, with rotations read in `convention`
    pub fn matrix(&self, convention: RotationConvention) -> Matrix {
        let sign = match convention {
            RotationConvention::PositionVector => 1.,
            RotationConvention::CoordinateFrame => -1.,
        };
        let S = 1. + self.ppm * 1e-6;
        let R = sign * ARCSEC * S;
        let (ex, ey, ez) = (self.ex * R, self.ey * R, self.ez * R);
        let mut m = Matrix::identity(4);
        m[(0, 0)] = S;
        m[(0, 1)] = -ez;
        m[(0, 2)] = ey;
        m[(0, 3)] = self.dx;
        m[(1, 0)] = ez;
        m[(1, 1)] = S;
        m[(1, 2)] = -ex;
        m[(1, 3)] = self.dy;
        m[(2, 0)] = -ey;
        m[(2, 1)] = ex;
        m[(2, 2)] = S;
        m[(2, 3)] = self.dz;
        m
    }

    /// The parameters of a 4×4 geocentric affine. Fails unless the matrix is
    /// a scaled small angle rotation followed by a translation.
    pub fn from_matrix(matrix: &Matrix, convention: RotationConvention) -> Result<BursaWolfParameters, Error> {
        if matrix.rows() != 4 || matrix.cols() != 4 || !matrix.is_affine() {
            return Err(Error::BadParam(
                String::from("matrix"),
                String::from("not a 4×4 affine"),
            ));
        }
        let S = (matrix[(0, 0)] + matrix[(1, 1)] + matrix[(2, 2)]) / 3.;
        for i in 0..3 {
            if (matrix[(i, i)] - S).abs() > ROTATION_TOLERANCE {
                return Err(Error::BadParam(
                    String::from("matrix"),
                    String::from("unequal scale factors"),
                ));
            }
            for j in i + 1..3 {
                if (matrix[(i, j)] + matrix[(j, i)]).abs() > ROTATION_TOLERANCE {
                    return Err(Error::BadParam(
                        String::from("matrix"),
                        String::from("not a rotation"),
                    ));
                }
            }
        }
        let sign = match convention {
            RotationConvention::PositionVector => 1.,
            RotationConvention::CoordinateFrame => -1.,
        };
        let R = sign * ARCSEC * S;
        Ok(BursaWolfParameters {
            dx: matrix[(0, 3)],
            dy: matrix[(1, 3)],
            dz: matrix[(2, 3)],
            ex: (matrix[(2, 1)] - matrix[(1, 2)]) / (2. * R),
            ey: (matrix[(0, 2)] - matrix[(2, 0)]) / (2. * R),
            ez: (matrix[(1, 0)] - matrix[(0, 1)]) / (2. * R),
            ppm: (S - 1.) * 1e6,
        })
    }
}

// ----- T R A N S F O R M -------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    Translation,
    Rotation(RotationConvention),
}

impl Kind {
    fn name(self) -> &'static str {
        match self {
            Kind::Translation => "Geocentric translations",
            Kind::Rotation(RotationConvention::PositionVector) => "Position Vector transformation",
            Kind::Rotation(RotationConvention::CoordinateFrame) => "Coordinate Frame rotation",
        }
    }

    fn convention(self) -> RotationConvention {
        match self {
            Kind::Rotation(convention) => convention,
            Kind::Translation => RotationConvention::PositionVector,
        }
    }
}

/// An affine transform in geocentric space, described by its Bursa-Wolf
/// parameters rather than its matrix
#[derive(Debug)]
pub struct GeocentricAffineTransform {
    matrix: Matrix,
    kind: Kind,
    inverse: InverseCell,
    hash: HashCache,
}

impl GeocentricAffineTransform {
    pub fn create(parameters: &BursaWolfParameters, convention: RotationConvention) -> Result<TransformRef, Error> {
        if parameters.is_identity() {
            return Ok(IdentityTransform::create(3));
        }
        let kind = match parameters.is_translation() {
            true => Kind::Translation,
            false => Kind::Rotation(convention),
        };
        Ok(Arc::new(GeocentricAffineTransform {
            matrix: parameters.matrix(convention),
            kind,
            inverse: InverseCell::new(),
            hash: HashCache::new(),
        }))
    }

    /// The Bursa-Wolf parameters, if the matrix is still representable as such
    pub fn bursa_wolf_parameters(&self) -> Option<BursaWolfParameters> {
        BursaWolfParameters::from_matrix(&self.matrix, self.kind.convention()).ok()
    }

    pub fn convention(&self) -> RotationConvention {
        self.kind.convention()
    }
}

impl MathTransform for GeocentricAffineTransform {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn name(&self) -> &'static str {
        "GeocentricAffine"
    }
    fn source_dimensions(&self) -> usize {
        3
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
        let m = &self.matrix;
        if let Some(dst) = dst {
            let (x, y, z) = (src[0], src[1], src[2]);
            for (j, d) in dst.iter_mut().take(3).enumerate() {
                *d = m[(j, 0)] * x + m[(j, 1)] * y + m[(j, 2)] * z + m[(j, 3)];
            }
        }
        if !derivate {
            return Ok(None);
        }
        let rows: Vec<&[f64]> = (0..3).map(|j| &m.row(j)[..3]).collect();
        Ok(Some(Matrix::from_rows(&rows)?))
    }

    fn transform_pts(&self, src: &[f64], dst: &mut [f64], num_pts: usize) -> Result<(), Error> {
        check_length("source", num_pts * 3, src.len())?;
        check_length("destination", num_pts * 3, dst.len())?;
        for (s, d) in src.chunks_exact(3).zip(dst.chunks_exact_mut(3)) {
            self.transform_one(s, Some(d), false)?;
        }
        Ok(())
    }

    fn inverse(self: Arc<Self>) -> Result<TransformRef, Error> {
        let origin: TransformRef = self.clone();
        self.inverse.get_or_init(|| {
            let matrix = self.matrix.inverse()?;
            // A non-rotation inverse is reported as a plain affine
            if BursaWolfParameters::from_matrix(&matrix, self.kind.convention()).is_err() {
                return linear_inverse_of(&matrix, origin);
            }
            Ok(Arc::new(GeocentricAffineTransform {
                matrix,
                kind: self.kind,
                inverse: InverseCell::with_origin(origin),
                hash: HashCache::new(),
            }))
        })
    }

    fn matrix(&self) -> Option<Matrix> {
        Some(self.matrix.clone())
    }

    fn parameter_descriptors(&self) -> Option<&'static [OpParameter]> {
        Some(&GAMUT)
    }

    fn parameters(&self) -> Option<ParameterValues> {
        let p = match self.bursa_wolf_parameters() {
            Some(p) => p,
            None => return Some(affine_parameters(&self.matrix)),
        };
        let values = ParameterValues::named(self.kind.name())
            .with_real("dx", p.dx)
            .with_real("dy", p.dy)
            .with_real("dz", p.dz);
        if self.kind == Kind::Translation {
            return Some(values);
        }
        Some(
            values
                .with_real("ex", p.ex)
                .with_real("ey", p.ey)
                .with_real("ez", p.ez)
                .with_real("ppm", p.ppm),
        )
    }

    fn hash_code(&self) -> u64 {
        self.hash
            .get_or_compute(|| crate::transform::compute_hash(self))
    }
}

// ----- T E S T S ------------------------------------------------------------------
