//! Transforms interpolating in a regular grid of values.
//!
//! The grid is indexed row-major, with one bank of `width × height` values
//! per band. Real world coordinates map to grid coordinates by
//! `(x - x_origin) · x_scale`, and the same for `y`. Outside the grid, the
//! values of the nearest border cell are extrapolated.

use crate::authoring::*;
use crate::transform::compute_hash;

#[rustfmt::skip]
pub const GAMUT: [OpParameter; 7] = [
    OpParameter::Natural { key: "width",    default: None },
    OpParameter::Natural { key: "height",   default: None },
    OpParameter::Natural { key: "bands",    default: Some(2) },
    OpParameter::Real    { key: "x_origin", default: Some(0.) },
    OpParameter::Real    { key: "y_origin", default: Some(0.) },
    OpParameter::Real    { key: "x_scale",  default: Some(1.) },
    OpParameter::Real    { key: "y_scale",  default: Some(1.) },
];

/// Iterations of the inverse, before giving up
const MAX_ITERATIONS: usize = 10;

/// Convergence criterion of the inverse, in source units
const TOLERANCE: f64 = 5e-10;

/// How the interpolated grid values relate to the result
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GridType {
    /// The values are the target coordinates
    Localization,
    /// The values are added to the source coordinates
    Offset,
    /// Arc-second shifts: longitude (positive west) and latitude
    Nadcon,
    /// Arc-second shifts, with the NADCON sign convention
    Ntv2,
}

impl GridType {
    fn name(self) -> &'static str {
        match self {
            GridType::Localization => "Localization_Grid",
            GridType::Offset => "Offset_Grid",
            GridType::Nadcon => "NADCON",
            GridType::Ntv2 => "NTv2",
        }
    }
}

// ----- G R I D   D A T A -------------------------------------------------------------

/// The grid values, one bank per band, in single or double precision
#[derive(Clone, Debug, PartialEq)]
pub enum GridValues {
    Float(Vec<Vec<f32>>),
    Double(Vec<Vec<f64>>),
}

impl GridValues {
    fn bands(&self) -> usize {
        match self {
            GridValues::Float(banks) => banks.len(),
            GridValues::Double(banks) => banks.len(),
        }
    }

    fn bank_len(&self, band: usize) -> usize {
        match self {
            GridValues::Float(banks) => banks[band].len(),
            GridValues::Double(banks) => banks[band].len(),
        }
    }

    fn get(&self, band: usize, index: usize) -> f64 {
        match self {
            GridValues::Float(banks) => banks[band][index] as f64,
            GridValues::Double(banks) => banks[band][index],
        }
    }

    fn all_zero(&self) -> bool {
        match self {
            GridValues::Float(banks) => banks.iter().flatten().all(|v| *v == 0.),
            GridValues::Double(banks) => banks.iter().flatten().all(|v| *v == 0.),
        }
    }
}

/// The position of a point relative to the grid cell used for interpolating
struct Cell {
    index: usize,
    dx: f64,
    dy: f64,
}

/// A georeferenced grid of values
#[derive(Clone, Debug, PartialEq)]
pub struct GridData {
    width: usize,
    height: usize,
    values: GridValues,
    x_origin: f64,
    y_origin: f64,
    x_scale: f64,
    y_scale: f64,
}

impl GridData {
    /// A grid with origin at (0, 0) and unit cell size
    pub fn new(width: usize, height: usize, values: GridValues) -> Result<GridData, Error> {
        if width < 2 || height < 2 {
            return Err(Error::BadParam(
                String::from("size"),
                format!("{width}×{height} (need at least 2×2)"),
            ));
        }
        if values.bands() == 0 {
            return Err(Error::BadParam(String::from("bands"), String::from("0")));
        }
        for band in 0..values.bands() {
            let found = values.bank_len(band);
            if found != width * height {
                return Err(Error::MismatchedDimension(
                    format!("grid band {band}"),
                    width * height,
                    found,
                ));
            }
        }
        Ok(GridData {
            width,
            height,
            values,
            x_origin: 0.,
            y_origin: 0.,
            x_scale: 1.,
            y_scale: 1.,
        })
    }

    /// Place the grid: `origin` is the real world position of the first grid
    /// node, and `scale` the number of grid cells per real world unit
    pub fn georeferenced(mut self, origin: (f64, f64), scale: (f64, f64)) -> Result<GridData, Error> {
        for (key, value) in [("x_scale", scale.0), ("y_scale", scale.1)] {
            if value == 0. || !value.is_finite() {
                return Err(Error::BadParam(String::from(key), value.to_string()));
            }
        }
        self.x_origin = origin.0;
        self.y_origin = origin.1;
        self.x_scale = scale.0;
        self.y_scale = scale.1;
        Ok(self)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn bands(&self) -> usize {
        self.values.bands()
    }

    pub fn values(&self) -> &GridValues {
        &self.values
    }

    /// The lower left corner of the cell to interpolate in. Points outside
    /// the grid use the nearest border cell, i.e. extrapolate.
    fn locate(&self, x: f64, y: f64) -> Cell {
        let xi = (x - self.x_origin) * self.x_scale;
        let yi = (y - self.y_origin) * self.y_scale;
        let col = cell_index(xi, self.width);
        let row = cell_index(yi, self.height);
        Cell {
            index: row * self.width + col,
            dx: xi - col as f64,
            dy: yi - row as f64,
        }
    }

    /// The bilinear interpolation of `band` in `cell`, and its partial
    /// derivatives with respect to the grid coordinates
    fn sample(&self, band: usize, cell: &Cell) -> (f64, f64, f64) {
        let i = cell.index;
        let v00 = self.values.get(band, i);
        let v10 = self.values.get(band, i + 1);
        let v01 = self.values.get(band, i + self.width);
        let v11 = self.values.get(band, i + self.width + 1);
        let (dx, dy) = (cell.dx, cell.dy);

        let lower = v00 + (v10 - v00) * dx;
        let upper = v01 + (v11 - v01) * dx;
        let value = lower + (upper - lower) * dy;
        let ddx = (v10 - v00) * (1. - dy) + (v11 - v01) * dy;
        let ddy = (v01 - v00) * (1. - dx) + (v11 - v10) * dx;
        (value, ddx, ddy)
    }
}

// Written so that NaN ends up in the first cell
fn cell_index(v: f64, size: usize) -> usize {
    if !(v >= 1.) {
        return 0;
    }
    (v.floor() as usize).min(size - 2)
}

// ----- F O R W A R D ---------------------------------------------------------------

/// Bilinear interpolation in a [`GridData`], with the result interpreted
/// according to the [`GridType`]
#[derive(Debug)]
pub struct GridTransform {
    kind: GridType,
    data: Arc<GridData>,
    inverse: InverseCell,
    hash: HashCache,
}

impl GridTransform {
    /// Localization grids map to as many dimensions as there are bands. The
    /// other types shift two dimensional coordinates, and need two bands.
    pub fn create(kind: GridType, data: GridData) -> Result<TransformRef, Error> {
        if kind != GridType::Localization && data.bands() != 2 {
            return Err(Error::BadParam(
                String::from("bands"),
                format!("{} ({} grids need 2)", data.bands(), kind.name()),
            ));
        }
        Ok(Arc::new(GridTransform {
            kind,
            data: Arc::new(data),
            inverse: InverseCell::new(),
            hash: HashCache::new(),
        }))
    }

    pub fn grid_type(&self) -> GridType {
        self.kind
    }

    pub fn data(&self) -> &GridData {
        &self.data
    }

    /// The forward mapping of `(x, y)` into `dst`, and its Jacobian if `derivate`
    fn apply(&self, x: f64, y: f64, dst: &mut [f64], derivate: bool) -> Option<Matrix> {
        let data = &self.data;
        let cell = data.locate(x, y);
        let (sx, sy) = (data.x_scale, data.y_scale);

        if self.kind == GridType::Localization {
            let bands = data.bands();
            let mut jacobian = derivate.then(|| Matrix::zeros(bands, 2));
            for band in 0..bands {
                let (value, ddx, ddy) = data.sample(band, &cell);
                dst[band] = value;
                if let Some(j) = jacobian.as_mut() {
                    j[(band, 0)] = ddx * sx;
                    j[(band, 1)] = ddy * sy;
                }
            }
            return jacobian;
        }

        // The factors turning grid values into shifts
        let factors = match self.kind {
            GridType::Nadcon | GridType::Ntv2 => [-1. / 3600., 1. / 3600.],
            _ => [1., 1.],
        };
        let source = [x, y];
        let mut jacobian = derivate.then(|| Matrix::identity(2));
        for band in 0..2 {
            let (value, ddx, ddy) = data.sample(band, &cell);
            dst[band] = source[band] + factors[band] * value;
            if let Some(j) = jacobian.as_mut() {
                j[(band, 0)] += factors[band] * ddx * sx;
                j[(band, 1)] += factors[band] * ddy * sy;
            }
        }
        jacobian
    }
}

impl MathTransform for GridTransform {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn name(&self) -> &'static str {
        "Grid"
    }
    fn source_dimensions(&self) -> usize {
        2
    }
    fn target_dimensions(&self) -> usize {
        match self.kind {
            GridType::Localization => self.data.bands(),
            _ => 2,
        }
    }

    /// Shift grids with all values zero leave every coordinate unchanged
    fn is_identity(&self) -> bool {
        self.kind != GridType::Localization && self.data.values.all_zero()
    }

    fn transform_one(
        &self,
        src: &[f64],
        dst: Option<&mut [f64]>,
        derivate: bool,
    ) -> Result<Option<Matrix>, Error> {
        let mut scratch = [0.; 2];
        let mut bands;
        let dst = match dst {
            Some(dst) => dst,
            None if self.kind == GridType::Localization => {
                bands = vec![0.; self.data.bands()];
                &mut bands[..]
            }
            None => &mut scratch[..],
        };
        Ok(self.apply(src[0], src[1], dst, derivate))
    }

    fn inverse(self: Arc<Self>) -> Result<TransformRef, Error> {
        if self.kind == GridType::Localization {
            return Err(Error::NonInvertible(String::from("localization grid")));
        }
        self.inverse
            .get_or_init(|| Ok(Arc::new(GridInverse { forward: self.clone() })))
    }

    fn parameter_descriptors(&self) -> Option<&'static [OpParameter]> {
        Some(&GAMUT)
    }

    fn parameters(&self) -> Option<ParameterValues> {
        let data = &self.data;
        Some(
            ParameterValues::named(self.kind.name())
                .with_natural("width", data.width)
                .with_natural("height", data.height)
                .with_natural("bands", data.bands())
                .with_real("x_origin", data.x_origin)
                .with_real("y_origin", data.y_origin)
                .with_real("x_scale", data.x_scale)
                .with_real("y_scale", data.y_scale),
        )
    }

    /// The grid values take part in the comparison, not only the parameters
    fn equals(&self, other: &dyn MathTransform, _mode: ComparisonMode) -> bool {
        match other.downcast_ref::<GridTransform>() {
            Some(o) => self.kind == o.kind && (Arc::ptr_eq(&self.data, &o.data) || self.data == o.data),
            None => false,
        }
    }

    fn hash_code(&self) -> u64 {
        self.hash.get_or_compute(|| compute_hash(self))
    }
}

// ----- I N V E R S E ---------------------------------------------------------------

/// The inverse of a shift grid, by fixed point iteration
#[derive(Debug)]
pub struct GridInverse {
    forward: Arc<GridTransform>,
}

impl MathTransform for GridInverse {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn name(&self) -> &'static str {
        "GridInverse"
    }
    fn source_dimensions(&self) -> usize {
        2
    }
    fn target_dimensions(&self) -> usize {
        2
    }
    fn is_identity(&self) -> bool {
        self.forward.is_identity()
    }

    /// Starting from the target itself, the guess is corrected by the
    /// residual of its forward transform until the residual vanishes
    fn transform_one(
        &self,
        src: &[f64],
        dst: Option<&mut [f64]>,
        derivate: bool,
    ) -> Result<Option<Matrix>, Error> {
        let (tx, ty) = (src[0], src[1]);
        if !(tx.is_finite() && ty.is_finite()) {
            if let Some(dst) = dst {
                dst[..2].fill(f64::NAN);
            }
            return Ok(derivate.then(|| Matrix::from_diagonal(&[f64::NAN, f64::NAN])));
        }

        let (mut x, mut y) = (tx, ty);
        let mut forward = [0.; 2];
        for i in 0..MAX_ITERATIONS {
            self.forward.apply(x, y, &mut forward, false);
            let (rx, ry) = (forward[0] - tx, forward[1] - ty);
            x -= rx;
            y -= ry;
            if rx.abs() <= TOLERANCE && ry.abs() <= TOLERANCE {
                trace!("grid inverse: ({tx}, {ty}) converged after {} iterations", i + 1);
                if let Some(dst) = dst {
                    dst[0] = x;
                    dst[1] = y;
                }
                if !derivate {
                    return Ok(None);
                }
                let jacobian = self.forward.apply(x, y, &mut forward, true);
                return match jacobian {
                    Some(j) => Ok(Some(j.inverse()?)),
                    None => Ok(None),
                };
            }
        }
        Err(Error::NoConvergence(MAX_ITERATIONS, tx, ty))
    }

    fn inverse(self: Arc<Self>) -> Result<TransformRef, Error> {
        Ok(self.forward.clone())
    }

    fn parameter_descriptors(&self) -> Option<&'static [OpParameter]> {
        self.forward.parameter_descriptors()
    }

    fn parameters(&self) -> Option<ParameterValues> {
        self.forward.parameters()
    }

    fn equals(&self, other: &dyn MathTransform, mode: ComparisonMode) -> bool {
        match other.downcast_ref::<GridInverse>() {
            Some(o) => self.forward.equals(o.forward.as_ref(), mode),
            None => false,
        }
    }

    fn hash_code(&self) -> u64 {
        !self.forward.hash_code()
    }
}

// ----- T E S T S ------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;

    fn offset_grid(v0: [f64; 4], v1: [f64; 4]) -> Result<TransformRef, Error> {
        let values = GridValues::Double(vec![v0.to_vec(), v1.to_vec()]);
        GridTransform::create(GridType::Offset, GridData::new(2, 2, values)?)
    }

    #[test]
    fn zero_offsets() -> Result<(), Error> {
        let tr = offset_grid([0.; 4], [0.; 4])?;
        assert!(tr.is_identity());
        for p in [[0.5, 0.5], [-10., 3.], [1e6, -1e6]] {
            assert_eq!(tr.transform_point(&p)?, p.to_vec());
        }
        // Absorbed by concatenation
        let scale = linear(&Matrix::scale(&[2., 1.]))?;
        let chain = ConcatenatedTransform::create(tr, scale.clone())?;
        assert!(Arc::ptr_eq(&chain, &scale));
        Ok(())
    }

    #[test]
    fn localization() -> Result<(), Error> {
        // Band 0 is 2x + 3y, band 1 is xy, in grid units, on a 3×3 grid with
        // cells of size 2 starting at (10, 20)
        let mut linear = Vec::new();
        let mut product = Vec::new();
        for row in 0..3 {
            for col in 0..3 {
                linear.push(2. * col as f64 + 3. * row as f64);
                product.push((col * row) as f64);
            }
        }
        let data = GridData::new(3, 3, GridValues::Double(vec![linear, product]))?
            .georeferenced((10., 20.), (0.5, 0.5))?;
        let tr = GridTransform::create(GridType::Localization, data)?;
        assert_eq!(tr.target_dimensions(), 2);

        // Grid coordinates (0.5, 1.25)
        let y = tr.transform_point(&[11., 22.5])?;
        assert_float_eq!(y[0], 4.75, abs <= 1e-12);
        assert_float_eq!(y[1], 0.625, abs <= 1e-12);
        let d = tr.derivative(&[11., 22.5])?;
        assert_float_eq!(d[(0, 0)], 1., abs <= 1e-12);
        assert_float_eq!(d[(0, 1)], 1.5, abs <= 1e-12);
        assert_float_eq!(d[(1, 0)], 0.625, abs <= 1e-12);
        assert_float_eq!(d[(1, 1)], 0.25, abs <= 1e-12);

        // Extrapolation, grid coordinates (-1, 3)
        let y = tr.transform_point(&[8., 26.])?;
        assert_float_eq!(y[0], 7., abs <= 1e-12);
        assert_float_eq!(y[1], -3., abs <= 1e-12);

        let y = tr.transform_point(&[f64::NAN, 22.])?;
        assert!(y[0].is_nan() && y[1].is_nan());

        assert!(matches!(tr.inverse(), Err(Error::NonInvertible(_))));
        Ok(())
    }

    #[test]
    fn arc_seconds() -> Result<(), Error> {
        let values = GridValues::Float(vec![vec![36.; 4], vec![72.; 4]]);
        let tr = GridTransform::create(GridType::Nadcon, GridData::new(2, 2, values)?)?;
        let y = tr.transform_point(&[0.5, 0.5])?;
        assert_float_eq!(y[0], 0.49, abs <= 1e-12);
        assert_float_eq!(y[1], 0.52, abs <= 1e-12);
        assert!(tr.derivative(&[0.5, 0.5])?.is_identity());

        // A longitude shift of one degree per grid unit cancels the longitude
        let values = GridValues::Double(vec![vec![0., 3600., 0., 3600.], vec![0.; 4]]);
        let tr = GridTransform::create(GridType::Ntv2, GridData::new(2, 2, values)?)?;
        let d = tr.derivative(&[0.25, 0.5])?;
        assert_float_eq!(d[(0, 0)], 0., abs <= 1e-12);
        assert_float_eq!(tr.transform_point(&[0.25, 0.5])?[0], 0., abs <= 1e-12);

        let values = GridValues::Double(vec![vec![0.; 4]]);
        assert!(GridTransform::create(GridType::Nadcon, GridData::new(2, 2, values)?).is_err());
        Ok(())
    }

    #[test]
    fn inverse() -> Result<(), Error> {
        let tr = offset_grid([0., 0.01, 0.005, 0.015], [0., 0.002, 0., 0.002])?;
        let y = tr.transform_point(&[0.3, 0.7])?;
        assert_float_eq!(y[0], 0.3065, abs <= 1e-12);
        assert_float_eq!(y[1], 0.7006, abs <= 1e-12);

        let inv = tr.clone().inverse()?;
        assert!(Arc::ptr_eq(&inv.clone().inverse()?, &tr));
        let x = inv.transform_point(&y)?;
        assert_float_eq!(x[0], 0.3, abs <= 1e-9);
        assert_float_eq!(x[1], 0.7, abs <= 1e-9);

        let product = inv.derivative(&y)?.multiply(&tr.derivative(&x)?)?;
        assert!(product.is_identity_within(1e-9));

        let x = inv.transform_point(&[f64::NAN, 1.])?;
        assert!(x[0].is_nan());
        Ok(())
    }

    #[test]
    fn no_convergence() -> Result<(), Error> {
        // x' = 3x: the fixed point iteration diverges everywhere but at 0
        let tr = offset_grid([0., 2., 0., 2.], [0.; 4])?;
        let inv = tr.inverse()?;
        assert_eq!(inv.transform_point(&[0., 0.5])?, vec![0., 0.5]);
        assert!(matches!(inv.transform_point(&[1., 0.]), Err(Error::NoConvergence(10, ..))));

        // A few failures: the batch completes, with NaN for the failed points
        let src = [0., 0., 1., 0., 0., 1.];
        let mut dst = [0.; 6];
        match inv.transform_pts(&src, &mut dst, 3) {
            Err(Error::Partial { failures, .. }) => assert_eq!(failures, 1),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(dst[2].is_nan() && dst[3].is_nan());
        assert_eq!(&dst[4..], &[0., 1.]);

        // Too many failures: the batch is aborted
        let src = [1.; 40];
        let mut dst = [0.; 40];
        let status = inv.transform_pts(&src, &mut dst, 20);
        assert!(matches!(status, Err(Error::NoConvergence(..))));
        Ok(())
    }

    #[test]
    fn equality() -> Result<(), Error> {
        let a = offset_grid([0., 1., 0., 1.], [0.; 4])?;
        let b = offset_grid([0., 1., 0., 1.], [0.; 4])?;
        let c = offset_grid([0., 1., 0., 2.], [0.; 4])?;
        assert!(a.equals(b.as_ref(), ComparisonMode::Strict));
        assert!(!a.equals(c.as_ref(), ComparisonMode::Strict));

        let single = GridValues::Float(vec![vec![0., 1., 0., 1.], vec![0.; 4]]);
        let single = GridTransform::create(GridType::Offset, GridData::new(2, 2, single)?)?;
        assert_eq!(single.transform_point(&[0.5, 0.5])?, a.transform_point(&[0.5, 0.5])?);
        assert!(GridData::new(3, 2, GridValues::Double(vec![vec![0.; 4]])).is_err());
        Ok(())
    }
}
