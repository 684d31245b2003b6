//! Transforms from textual definitions.
//!
//! A definition is a chain of steps separated by `|`, each step a name
//! followed by `key=value` parameters and flags, e.g.
//!
//! ```text
//! geocentric ellps=intl | helmert x=-87 y=-96 z=-120 | geocentric ellps=GRS80 inv
//! ```
//!
//! Any step may be inverted by the `inv` flag. The steps are concatenated, so
//! the usual simplifications apply.

use crate::authoring::*;
use crate::linear::linear;

type Builder = fn(&ParameterValues) -> Result<TransformRef, Error>;

struct Step {
    name: &'static str,
    gamut: &'static [OpParameter],
    build: Builder,
}

#[rustfmt::skip]
const BUILTIN_STEPS: [Step; 9] = [
    Step { name: "affine",     gamut: &AFFINE,     build: affine },
    Step { name: "axisswap",   gamut: &AXISSWAP,   build: axisswap },
    Step { name: "exp",        gamut: &EXP,        build: exponential },
    Step { name: "geocentric", gamut: &GEOCENTRIC, build: geocentric },
    Step { name: "helmert",    gamut: &HELMERT,    build: helmert },
    Step { name: "linear",     gamut: &LINEAR,     build: linear_1d },
    Step { name: "log",        gamut: &LOG,        build: logarithm },
    Step { name: "molodensky", gamut: &MOLODENSKY, build: molodensky },
    Step { name: "noop",       gamut: &NOOP,       build: noop },
];

/// The transform described by `definition`
pub fn parse(definition: &str) -> Result<TransformRef, Error> {
    let mut steps = Vec::new();
    for text in definition.split('|').map(str::trim).filter(|s| !s.is_empty()) {
        steps.push(parse_step(text)?);
    }
    if steps.is_empty() {
        return Err(Error::Syntax(format!("empty definition: '{definition}'")));
    }
    debug!("parsed {} step(s) from '{definition}'", steps.len());
    ConcatenatedTransform::create_chain(&steps)
}

fn parse_step(text: &str) -> Result<TransformRef, Error> {
    let name = text.split_whitespace().next().unwrap_or_default();
    let step = BUILTIN_STEPS
        .iter()
        .find(|s| s.name == name)
        .ok_or_else(|| Error::NotFound(String::from(name), String::from(" (unknown step)")))?;
    let values = ParameterValues::new(text, step.gamut)?;
    let tr = (step.build)(&values)?;
    if values.boolean("inv") {
        return tr.inverse();
    }
    Ok(tr)
}

// ----- S T E P S -------------------------------------------------------------------

#[rustfmt::skip]
const LINEAR: [OpParameter; 3] = [
    OpParameter::Flag { key: "inv" },
    OpParameter::Real { key: "scale",  default: Some(1.) },
    OpParameter::Real { key: "offset", default: Some(0.) },
];

fn linear_1d(values: &ParameterValues) -> Result<TransformRef, Error> {
    Ok(LinearTransform1D::create(values.real("scale")?, values.real("offset")?))
}

#[rustfmt::skip]
const EXP: [OpParameter; 3] = [
    OpParameter::Flag { key: "inv" },
    OpParameter::Real { key: "base",  default: Some(10.) },
    OpParameter::Real { key: "scale", default: Some(1.) },
];

fn exponential(values: &ParameterValues) -> Result<TransformRef, Error> {
    let base = values.real("base")?;
    if !(base > 0. && base != 1.) {
        return Err(Error::BadParam(String::from("base"), base.to_string()));
    }
    Ok(ExponentialTransform1D::create(base, values.real("scale")?))
}

#[rustfmt::skip]
const LOG: [OpParameter; 3] = [
    OpParameter::Flag { key: "inv" },
    OpParameter::Real { key: "base",   default: Some(10.) },
    OpParameter::Real { key: "offset", default: Some(0.) },
];

fn logarithm(values: &ParameterValues) -> Result<TransformRef, Error> {
    LogarithmicTransform1D::create(values.real("base")?, values.real("offset")?)
}

#[rustfmt::skip]
const AFFINE: [OpParameter; 4] = [
    OpParameter::Flag    { key: "inv" },
    OpParameter::Natural { key: "num_row",  default: None },
    OpParameter::Natural { key: "num_col",  default: None },
    OpParameter::Series  { key: "elements", default: None },
];

/// A homogeneous matrix, given row by row
fn affine(values: &ParameterValues) -> Result<TransformRef, Error> {
    let rows = values.natural("num_row")?;
    let cols = values.natural("num_col")?;
    let matrix = Matrix::new(rows, cols, values.series("elements")?.to_vec())?;
    linear(&matrix)
}

#[rustfmt::skip]
const AXISSWAP: [OpParameter; 2] = [
    OpParameter::Flag   { key: "inv" },
    OpParameter::Series { key: "order", default: Some("2,1") },
];

/// Reorder, and possibly flip, axes. `order` holds the one based source
/// axis of each target axis, negative for flipped axes.
fn axisswap(values: &ParameterValues) -> Result<TransformRef, Error> {
    let order = values.series("order")?;
    let n = order.len();
    let bad = || Error::BadParam(String::from("order"), format!("{order:?}"));
    let mut matrix = Matrix::zeros(n + 1, n + 1);
    let mut used = vec![false; n];
    for (target, &axis) in order.iter().enumerate() {
        let source = axis.abs() as usize;
        if axis.fract() != 0. || source == 0 || source > n || used[source - 1] {
            return Err(bad());
        }
        used[source - 1] = true;
        matrix[(target, source - 1)] = axis.signum();
    }
    matrix[(n, n)] = 1.;
    linear(&matrix)
}

#[rustfmt::skip]
const GEOCENTRIC: [OpParameter; 3] = [
    OpParameter::Flag    { key: "inv" },
    OpParameter::Text    { key: "ellps", default: Some("GRS80") },
    OpParameter::Natural { key: "dim",   default: Some(3) },
];

fn has_height(values: &ParameterValues, key: &'static str) -> Result<bool, Error> {
    match values.natural(key)? {
        2 => Ok(false),
        3 => Ok(true),
        other => Err(Error::BadParam(String::from(key), other.to_string())),
    }
}

fn geocentric(values: &ParameterValues) -> Result<TransformRef, Error> {
    let ellps = Ellipsoid::named(&values.text("ellps")?)?;
    GeocentricTransform::from_ellipsoid(&ellps, has_height(values, "dim")?)
}

#[rustfmt::skip]
const MOLODENSKY: [OpParameter; 9] = [
    OpParameter::Flag    { key: "inv" },
    OpParameter::Flag    { key: "abridged" },
    OpParameter::Text    { key: "ellps_0", default: Some("GRS80") },
    OpParameter::Text    { key: "ellps_1", default: Some("GRS80") },
    OpParameter::Real    { key: "dx",      default: Some(0.) },
    OpParameter::Real    { key: "dy",      default: Some(0.) },
    OpParameter::Real    { key: "dz",      default: Some(0.) },
    OpParameter::Natural { key: "src_dim", default: Some(3) },
    OpParameter::Natural { key: "tgt_dim", default: Some(3) },
];

fn molodensky(values: &ParameterValues) -> Result<TransformRef, Error> {
    let source = Ellipsoid::named(&values.text("ellps_0")?)?;
    let target = Ellipsoid::named(&values.text("ellps_1")?)?;
    let shift = [values.real("dx")?, values.real("dy")?, values.real("dz")?];
    MolodenskyTransform::from_ellipsoids(
        values.boolean("abridged"),
        &source,
        &target,
        shift,
        has_height(values, "src_dim")?,
        has_height(values, "tgt_dim")?,
    )
}

#[rustfmt::skip]
const HELMERT: [OpParameter; 9] = [
    OpParameter::Flag { key: "inv" },
    OpParameter::Real { key: "x",  default: Some(0.) },
    OpParameter::Real { key: "y",  default: Some(0.) },
    OpParameter::Real { key: "z",  default: Some(0.) },
    OpParameter::Real { key: "rx", default: Some(0.) },
    OpParameter::Real { key: "ry", default: Some(0.) },
    OpParameter::Real { key: "rz", default: Some(0.) },
    OpParameter::Real { key: "s",  default: Some(0.) },
    OpParameter::Text { key: "convention", default: Some("position_vector") },
];

fn helmert(values: &ParameterValues) -> Result<TransformRef, Error> {
    let convention = match values.text("convention")?.as_str() {
        "position_vector" => RotationConvention::PositionVector,
        "coordinate_frame" => RotationConvention::CoordinateFrame,
        other => return Err(Error::BadParam(String::from("convention"), String::from(other))),
    };
    let parameters = BursaWolfParameters {
        dx: values.real("x")?,
        dy: values.real("y")?,
        dz: values.real("z")?,
        ex: values.real("rx")?,
        ey: values.real("ry")?,
        ez: values.real("rz")?,
        ppm: values.real("s")?,
    };
    GeocentricAffineTransform::create(&parameters, convention)
}

#[rustfmt::skip]
const NOOP: [OpParameter; 2] = [
    OpParameter::Flag    { key: "inv" },
    OpParameter::Natural { key: "dim", default: Some(2) },
];

fn noop(values: &ParameterValues) -> Result<TransformRef, Error> {
    Ok(IdentityTransform::create(values.natural("dim")?))
}

// ----- T E S T S ------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;

    #[test]
    fn one_dimensional() -> Result<(), Error> {
        let tr = parse("linear scale=2 offset=3 | linear scale=0.5 offset=-1.5")?;
        assert!(tr.is_identity());

        let tr = parse("log base=10 | exp base=2")?;
        assert_float_eq!(tr.transform_point(&[100.])?[0], 4., abs <= 1e-12);

        let tr = parse("exp base=10 inv")?;
        assert_float_eq!(tr.transform_point(&[1000.])?[0], 3., abs <= 1e-12);
        Ok(())
    }

    #[test]
    fn matrices() -> Result<(), Error> {
        let tr = parse("affine num_row=3 num_col=3 elements=2,0,1, 0,3,0, 0,0,1")?;
        assert_eq!(tr.transform_point(&[1., 1.])?, vec![3., 3.]);

        let tr = parse("axisswap order=2,-1")?;
        assert_eq!(tr.transform_point(&[1., 2.])?, vec![2., -1.]);
        let tr = parse("axisswap order=2,-1 | axisswap order=2,-1 inv")?;
        assert!(tr.is_identity());
        assert!(parse("axisswap order=1,1").is_err());
        assert!(parse("axisswap order=1,3").is_err());

        assert!(parse("noop dim=4")?.is_identity());
        Ok(())
    }

    #[test]
    fn datum_shifts() -> Result<(), Error> {
        let tr = parse("geocentric ellps=intl | helmert x=-87 y=-96 z=-120 | geocentric ellps=GRS80 inv")?;
        assert_eq!(tr.source_dimensions(), 3);
        let etrs89 = tr.transform_point(&[12., 55., 0.])?;
        assert!((etrs89[0] - 12.).abs() < 0.01 && (etrs89[1] - 55.).abs() < 0.01);
        let ed50 = tr.inverse()?.transform_point(&etrs89)?;
        assert_float_eq!(ed50[0], 12., abs <= 1e-7);
        assert_float_eq!(ed50[1], 55., abs <= 1e-7);
        assert_float_eq!(ed50[2], 0., abs <= 0.01);

        let tr = parse("molodensky ellps_0=WGS84 ellps_1=intl dx=84.87 dy=96.49 dz=116.95")?;
        let ed50 = tr.transform_point(&[2.12955, 53.80939444444444, 73.])?;
        assert_float_eq!(ed50[0], 2.1309658097, abs <= 1e-7);
        assert_float_eq!(ed50[1], 53.8101570592, abs <= 1e-7);

        let tr = parse("molodensky abridged ellps_0=WGS84 ellps_1=intl src_dim=2 tgt_dim=2")?;
        assert_eq!(tr.source_dimensions(), 2);
        Ok(())
    }

    #[test]
    fn errors() {
        assert!(matches!(parse(""), Err(Error::Syntax(_))));
        assert!(matches!(parse(" | "), Err(Error::Syntax(_))));
        assert!(matches!(parse("cucumber"), Err(Error::NotFound(..))));
        assert!(matches!(parse("linear scale=banana"), Err(Error::BadParam(..))));
        assert!(matches!(parse("affine num_row=3"), Err(Error::MissingParam(_))));
        assert!(matches!(parse("geocentric ellps=potato"), Err(Error::NotFound(..))));
        assert!(matches!(parse("geocentric dim=4"), Err(Error::BadParam(..))));
        assert!(matches!(parse("linear | geocentric"), Err(Error::MismatchedDimension(..))));
        assert!(matches!(parse("helmert convention=sideways"), Err(Error::BadParam(..))));
    }
}
