//! The complete and abridged Molodensky datum shifts, applied directly to
//! geographic coordinates in degrees.
//!
//! Formulas from OGP Publication 373-7-2 ([Ogp7p2](crate::Bibliography::Ogp7p2))
//! and Deakin ([2004](crate::Bibliography::Dea04)).
#![allow(non_snake_case)]
use crate::authoring::*;
use std::f64::consts::FRAC_PI_2;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::Weak;

#[rustfmt::skip]
pub const GAMUT: [OpParameter; 9] = [
    OpParameter::Natural { key: "src_dim",        default: Some(3) },
    OpParameter::Natural { key: "tgt_dim",        default: Some(3) },
    OpParameter::Real    { key: "dx",             default: Some(0.) },
    OpParameter::Real    { key: "dy",             default: Some(0.) },
    OpParameter::Real    { key: "dz",             default: Some(0.) },
    OpParameter::Real    { key: "src_semi_major", default: None },
    OpParameter::Real    { key: "src_semi_minor", default: None },
    OpParameter::Real    { key: "tgt_semi_major", default: None },
    OpParameter::Real    { key: "tgt_semi_minor", default: None },
];

// ----- C O N S T A N T S -------------------------------------------------------------

/// The constants of one direction of the shift
#[derive(Debug)]
struct Datum {
    a: f64,
    b: f64,
    ta: f64,
    tb: f64,
    e2: f64,
    da: f64,
    df: f64,
    /// a·Δf + f·Δa
    adf: f64,
    dx: f64,
    dy: f64,
    dz: f64,
}

fn check_axes(a: f64, b: f64, which: &str) -> Result<(), Error> {
    if !(a > 0. && a.is_finite()) {
        return Err(Error::BadParam(format!("{which}_semi_major"), a.to_string()));
    }
    if !(b > 0. && b <= a) {
        return Err(Error::BadParam(format!("{which}_semi_minor"), b.to_string()));
    }
    Ok(())
}

impl Datum {
    fn new(source: (f64, f64), target: (f64, f64), shift: [f64; 3]) -> Datum {
        let (a, b) = source;
        let (ta, tb) = target;
        let f = (a - b) / a;
        let df = (ta - tb) / ta - f;
        let da = ta - a;
        Datum {
            a,
            b,
            ta,
            tb,
            e2: 1. - (b * b) / (a * a),
            da,
            df,
            adf: a * df + f * da,
            dx: shift[0],
            dy: shift[1],
            dz: shift[2],
        }
    }

    /// The shift `(Δλ, Δφ, Δh)`, in radians and metres, at `(λ, φ, h)`
    fn shift(&self, abridged: bool, lam: f64, phi: f64, h: f64) -> [f64; 3] {
        let (a, b, e2) = (self.a, self.b, self.e2);
        let (da, df, adf) = (self.da, self.df, self.adf);
        let (dx, dy, dz) = (self.dx, self.dy, self.dz);

        let (sinlam, coslam) = lam.sin_cos();
        let (sinphi, cosphi) = phi.sin_cos();
        let w2 = 1. - e2 * sinphi * sinphi;
        let Rn = a / w2.sqrt();
        let Rm = Rn * (1. - e2) / w2;
        let g = dy * sinlam + dx * coslam;
        let k = dy * coslam - dx * sinlam;

        if abridged {
            let dphi = (dz * cosphi - sinphi * g + adf * (2. * phi).sin()) / Rm;
            let dlam = k / (Rn * cosphi);
            let dh = dx * cosphi * coslam + dy * cosphi * sinlam + dz * sinphi + adf * sinphi * sinphi - da;
            return [dlam, dphi, dh];
        }

        let sc = sinphi * cosphi;
        let dphi = (dz * cosphi - sinphi * g
            + da * (Rn * e2 * sc) / a
            + df * (Rm * (a / b) + Rn * (b / a)) * sc)
            / (Rm + h);
        let dlam = k / ((Rn + h) * cosphi);
        let dh = dx * cosphi * coslam + dy * cosphi * sinlam + dz * sinphi - da * (a / Rn)
            + df * (b / a) * Rn * sinphi * sinphi;
        [dlam, dphi, dh]
    }

    /// The partial derivatives of [`Datum::shift`]: row `i` holds the partials
    /// of shift component `i` with respect to `(λ, φ, h)`
    fn jacobian(&self, abridged: bool, lam: f64, phi: f64, h: f64) -> [[f64; 3]; 3] {
        let (a, b, e2) = (self.a, self.b, self.e2);
        let (da, df, adf) = (self.da, self.df, self.adf);
        let (dx, dy, dz) = (self.dx, self.dy, self.dz);

        let (sinlam, coslam) = lam.sin_cos();
        let (sinphi, cosphi) = phi.sin_cos();
        let sc = sinphi * cosphi;
        let cos2phi = (2. * phi).cos();
        let sin2phi = (2. * phi).sin();
        let w2 = 1. - e2 * sinphi * sinphi;
        let Rn = a / w2.sqrt();
        let Rm = Rn * (1. - e2) / w2;
        let dRn = Rn * e2 * sc / w2;
        let dRm = 3. * Rm * e2 * sc / w2;
        let g = dy * sinlam + dx * coslam;
        let k = dy * coslam - dx * sinlam;

        if abridged {
            let N = dz * cosphi - sinphi * g + adf * sin2phi;
            let D = Rn * cosphi;
            let dD = dRn * cosphi - Rn * sinphi;
            return [
                [-g / D, -k * dD / (D * D), 0.],
                [
                    -sinphi * k / Rm,
                    (-dz * sinphi - cosphi * g + 2. * adf * cos2phi) / Rm - N * dRm / (Rm * Rm),
                    0.,
                ],
                [cosphi * k, -sinphi * g + dz * cosphi + adf * sin2phi, 0.],
            ];
        }

        let q = Rm * (a / b) + Rn * (b / a);
        let dq = dRm * (a / b) + dRn * (b / a);
        let N = dz * cosphi - sinphi * g + da * Rn * e2 * sc / a + df * q * sc;
        let dN_dlam = -sinphi * k;
        let dN_dphi = -dz * sinphi - cosphi * g
            + (da * e2 / a) * (dRn * sc + Rn * cos2phi)
            + df * (dq * sc + q * cos2phi);
        let R = Rm + h;
        let D = (Rn + h) * cosphi;
        let dD = dRn * cosphi - (Rn + h) * sinphi;
        [
            [-g / D, -k * dD / (D * D), -k * cosphi / (D * D)],
            [dN_dlam / R, dN_dphi / R - N * dRm / (R * R), -N / (R * R)],
            [
                cosphi * k,
                -sinphi * g + dz * cosphi + da * a * dRn / (Rn * Rn)
                    + df * (b / a) * (dRn * sinphi * sinphi + Rn * sin2phi),
                0.,
            ],
        ]
    }
}

// ----- F A M I L Y -------------------------------------------------------------------

/// Which member of a family a transform is
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Variant {
    source_3d: bool,
    target_3d: bool,
    inverse: bool,
}

impl Variant {
    fn index(self) -> usize {
        usize::from(self.inverse) * 4 + usize::from(self.source_3d) * 2 + usize::from(self.target_3d)
    }

    /// The inverse maps target dimensions to source dimensions
    fn inverted(self) -> Variant {
        Variant {
            source_3d: self.target_3d,
            target_3d: self.source_3d,
            inverse: !self.inverse,
        }
    }
}

/// The constants shared by the variants of a shift: both directions, all
/// combinations of 2D and 3D source and target
#[derive(Debug)]
struct Family {
    datums: [Datum; 2],
    abridged: bool,
    variants: Mutex<[Weak<MolodenskyTransform>; 8]>,
}

impl Family {
    // The table only holds idempotent data, so a poisoned lock is still usable
    fn lock(&self) -> MutexGuard<'_, [Weak<MolodenskyTransform>; 8]> {
        self.variants.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn variant(self: &Arc<Self>, variant: Variant) -> Arc<MolodenskyTransform> {
        let mut variants = self.lock();
        if let Some(existing) = variants[variant.index()].upgrade() {
            return existing;
        }
        trace!("molodensky: creating variant {variant:?}");
        let created = Arc::new(MolodenskyTransform {
            family: self.clone(),
            variant,
            hash: HashCache::new(),
        });
        variants[variant.index()] = Arc::downgrade(&created);
        created
    }
}

// ----- T R A N S F O R M -------------------------------------------------------------

/// Molodensky datum shift between geographic coordinates `(λ, φ [, h])` in
/// degrees and metres, on two different ellipsoids.
///
/// The result latitude is clamped to ±90°, and the longitude brought into
/// the range ±180°.
#[derive(Debug)]
pub struct MolodenskyTransform {
    family: Arc<Family>,
    variant: Variant,
    hash: HashCache,
}

impl MolodenskyTransform {
    /// The shift from the ellipsoid with semi-axes `source` to the one with
    /// semi-axes `target`, for geocentric translation `shift = [dx, dy, dz]`
    pub fn create(
        abridged: bool,
        source: (f64, f64),
        target: (f64, f64),
        shift: [f64; 3],
        source_3d: bool,
        target_3d: bool,
    ) -> Result<TransformRef, Error> {
        check_axes(source.0, source.1, "src")?;
        check_axes(target.0, target.1, "tgt")?;
        if let Some(bad) = shift.iter().find(|v| !v.is_finite()) {
            return Err(Error::BadParam(String::from("shift"), bad.to_string()));
        }
        if source == target && shift == [0.; 3] && source_3d == target_3d {
            return Ok(IdentityTransform::create(if source_3d { 3 } else { 2 }));
        }

        let reverse = [-shift[0], -shift[1], -shift[2]];
        let family = Arc::new(Family {
            datums: [Datum::new(source, target, shift), Datum::new(target, source, reverse)],
            abridged,
            variants: Mutex::new(Default::default()),
        });
        let variant = Variant {
            source_3d,
            target_3d,
            inverse: false,
        };
        Ok(family.variant(variant))
    }

    pub fn from_ellipsoids(
        abridged: bool,
        source: &Ellipsoid,
        target: &Ellipsoid,
        shift: [f64; 3],
        source_3d: bool,
        target_3d: bool,
    ) -> Result<TransformRef, Error> {
        let source = (source.semimajor_axis(), source.semiminor_axis());
        let target = (target.semimajor_axis(), target.semiminor_axis());
        MolodenskyTransform::create(abridged, source, target, shift, source_3d, target_3d)
    }

    pub fn is_abridged(&self) -> bool {
        self.family.abridged
    }

    /// The member of the family with the given source and target
    /// dimensionality. Variants are created once, and then shared.
    pub fn for_dimensions(&self, source_3d: bool, target_3d: bool) -> TransformRef {
        let variant = Variant {
            source_3d,
            target_3d,
            inverse: self.variant.inverse,
        };
        self.family.variant(variant)
    }

    fn datum(&self) -> &Datum {
        &self.family.datums[usize::from(self.variant.inverse)]
    }
}

impl MathTransform for MolodenskyTransform {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn name(&self) -> &'static str {
        "Molodensky"
    }
    fn source_dimensions(&self) -> usize {
        if self.variant.source_3d {
            3
        } else {
            2
        }
    }
    fn target_dimensions(&self) -> usize {
        if self.variant.target_3d {
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
        let datum = self.datum();
        let abridged = self.family.abridged;
        let lam = src[0].to_radians();
        let phi = src[1].to_radians();
        let h = if self.variant.source_3d { src[2] } else { 0. };

        if let Some(dst) = dst {
            let [dlam, dphi, dh] = datum.shift(abridged, lam, phi, h);
            let phi = phi + dphi;
            let (x, y) = if phi.abs() > FRAC_PI_2 {
                (0., 90_f64.copysign(phi))
            } else {
                (roll_longitude((lam + dlam).to_degrees(), 180.), phi.to_degrees())
            };
            dst[0] = x;
            dst[1] = y;
            if self.variant.target_3d {
                dst[2] = h + dh;
            }
        }
        if !derivate {
            return Ok(None);
        }

        // The angular partials are unit free, the mixed ones change unit
        let J = datum.jacobian(abridged, lam, phi, h);
        let rad = 1f64.to_radians();
        let (s, t) = (self.source_dimensions(), self.target_dimensions());
        let mut d = Matrix::zeros(t, s);
        for r in 0..t {
            for c in 0..s {
                d[(r, c)] = match (r == 2, c == 2) {
                    (false, false) => J[r][c] + if r == c { 1. } else { 0. },
                    (false, true) => J[r][c] / rad,
                    (true, false) => J[r][c] * rad,
                    (true, true) => 1. + J[r][c],
                };
            }
        }
        Ok(Some(d))
    }

    /// The shift with source and target swapped, and the translation negated
    fn inverse(self: Arc<Self>) -> Result<TransformRef, Error> {
        Ok(self.family.variant(self.variant.inverted()))
    }

    fn parameter_descriptors(&self) -> Option<&'static [OpParameter]> {
        Some(&GAMUT)
    }

    fn parameters(&self) -> Option<ParameterValues> {
        let datum = self.datum();
        let name = match self.family.abridged {
            true => "Abridged_Molodensky",
            false => "Molodensky",
        };
        Some(
            ParameterValues::named(name)
                .with_natural("src_dim", self.source_dimensions())
                .with_natural("tgt_dim", self.target_dimensions())
                .with_real("dx", datum.dx)
                .with_real("dy", datum.dy)
                .with_real("dz", datum.dz)
                .with_real("src_semi_major", datum.a)
                .with_real("src_semi_minor", datum.b)
                .with_real("tgt_semi_major", datum.ta)
                .with_real("tgt_semi_minor", datum.tb),
        )
    }

    fn hash_code(&self) -> u64 {
        self.hash
            .get_or_compute(|| crate::transform::compute_hash(self))
    }
}

// ----- T E S T S ------------------------------------------------------------------
