use float_eq::assert_float_eq;
use mathtransform::authoring::*;
use mathtransform::definition;
use mathtransform::grid::GridValues;

// ----- U S E R   P R O V I D E D   T R A N S F O R M -------------------------------

/// A square root, failing for negative input.
///
/// Integration tests are built as independent crates, so this also shows that
/// a transform defined outside of the library gets the full batch protocol
/// from the trait defaults.
#[derive(Debug)]
struct SquareRoot;

impl MathTransform for SquareRoot {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn name(&self) -> &'static str {
        "SquareRoot"
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
        if src[0] < 0. {
            return Err(Error::Transform(format!("negative input {}", src[0])));
        }
        let root = src[0].sqrt();
        if let Some(dst) = dst {
            dst[0] = root;
        }
        Ok(derivate.then(|| Matrix::from_diagonal(&[0.5 / root])))
    }

    fn inverse(self: Arc<Self>) -> Result<TransformRef, Error> {
        Err(Error::NonInvertible(String::from("SquareRoot")))
    }
}

fn wgs84_geocentric(has_height: bool) -> Result<TransformRef, Error> {
    GeocentricTransform::create(6378137.0, 6356752.314245, has_height)
}

// ----- S C E N A R I O S -----------------------------------------------------------

#[test]
fn linear_1d() -> Result<(), Error> {
    let tr = LinearTransform1D::create(2., 3.);
    assert_eq!(tr.transform_point(&[5.])?, [13.]);
    assert_eq!(tr.inverse()?.transform_point(&[13.])?, [5.]);
    Ok(())
}

#[test]
fn exponential_inverse() -> Result<(), Error> {
    let log10 = ExponentialTransform1D::create(10., 1.).inverse()?;
    assert_float_eq!(log10.transform_point(&[100.])?[0], 2., abs <= 1e-14);
    Ok(())
}

#[test]
fn geocentric_on_the_equator() -> Result<(), Error> {
    let tr = wgs84_geocentric(true)?;
    let xyz = tr.transform_point(&[0., 0., 0.])?;
    assert_float_eq!(xyz[0], 6378137.0, abs <= 1e-6);
    assert_float_eq!(xyz[1], 0., abs <= 1e-6);
    assert_float_eq!(xyz[2], 0., abs <= 1e-6);
    Ok(())
}

#[test]
fn pass_through_middle() -> Result<(), Error> {
    let tr = PassThroughTransform::create(1, LinearTransform1D::create(2., 0.), 1)?;
    assert_eq!(tr.source_dimensions(), 3);
    assert_eq!(tr.transform_point(&[10., 5., 7.])?, [10., 10., 7.]);
    Ok(())
}

#[test]
fn axis_swap_and_drop() -> Result<(), Error> {
    let tr = linear(&Matrix::from_rows(&[
        [0., 1., 0., 0.],
        [1., 0., 0., 0.],
        [0., 0., 0., 1.],
    ])?)?;
    assert!(tr.is::<CopyTransform>());
    assert_eq!(tr.transform_point(&[1., 2., 3.])?, [2., 1.]);

    let back = tr.inverse()?.transform_point(&[2., 1.])?;
    assert_eq!(back.len(), 3);
    assert_eq!(back[..2], [1., 2.]);
    assert!(back[2].is_nan());
    Ok(())
}

#[test]
fn zero_offset_grid_is_identity() -> Result<(), Error> {
    let values = GridValues::Float(vec![vec![0.; 4], vec![0.; 4]]);
    let tr = GridTransform::create(GridType::Offset, GridData::new(2, 2, values)?)?;
    assert!(tr.is_identity());
    for p in [[0., 0.], [0.25, 0.75], [1., 1.]] {
        assert_eq!(tr.transform_point(&p)?, p);
    }
    Ok(())
}

// ----- L A W S ---------------------------------------------------------------------

#[test]
fn identity_laws() -> Result<(), Error> {
    let tr = wgs84_geocentric(true)?;
    let front = ConcatenatedTransform::create(IdentityTransform::create(3), tr.clone())?;
    let back = ConcatenatedTransform::create(tr.clone(), IdentityTransform::create(3))?;
    assert!(Arc::ptr_eq(&front, &tr));
    assert!(Arc::ptr_eq(&back, &tr));

    let id = IdentityTransform::create(4);
    let p = [1e-300, -0.1, f64::MAX, 12345.678901234];
    assert_eq!(id.transform_point(&p)?, p);
    Ok(())
}

#[test]
fn associativity() -> Result<(), Error> {
    let a = PassThroughTransform::create(0, ExponentialTransform1D::create(2., 1.), 1)?;
    let b = linear(&Matrix::from_rows(&[
        [0.5, 1., 3.],
        [-1., 2., 0.],
        [0., 0., 1.],
    ])?)?;
    let c = PassThroughTransform::create(1, LogarithmicTransform1D::create(10., 0.)?, 0)?;

    let left = ConcatenatedTransform::create(ConcatenatedTransform::create(a.clone(), b.clone())?, c.clone())?;
    let right = ConcatenatedTransform::create(a, ConcatenatedTransform::create(b, c)?)?;
    for p in [[0., 1.], [1.5, 2.], [-3., 10.], [0.25, 1.5]] {
        let l = left.transform_point(&p)?;
        let r = right.transform_point(&p)?;
        assert_float_eq!(l[0], r[0], abs <= 1e-12);
        assert_float_eq!(l[1], r[1], abs <= 1e-12);
    }
    Ok(())
}

#[test]
fn inverse_roundtrip() -> Result<(), Error> {
    let tr = definition::parse(
        "geocentric ellps=intl | helmert x=-87 y=-96 z=-120 | geocentric ellps=GRS80 inv",
    )?;
    let inv = tr.clone().inverse()?;
    for p in [[12., 55., 100.], [-71.5, -33.4, 0.], [179.9, 0.1, 2000.]] {
        let q = tr.transform_point(&p)?;
        assert!((q[0] - p[0]).abs() > 1e-5 || (q[1] - p[1]).abs() > 1e-5);
        let back = inv.transform_point(&q)?;
        assert_float_eq!(back[0], p[0], abs <= 1e-7);
        assert_float_eq!(back[1], p[1], abs <= 1e-7);
        assert_float_eq!(back[2], p[2], abs <= 0.01);
    }

    let projective = linear(&Matrix::from_rows(&[
        [2., 0.5, 1.],
        [0.1, 1., -4.],
        [0.01, 0.02, 1.],
    ])?)?;
    let back = projective
        .clone()
        .inverse()?
        .transform_point(&projective.transform_point(&[3., 7.])?)?;
    assert_float_eq!(back[0], 3., abs <= 1e-9);
    assert_float_eq!(back[1], 7., abs <= 1e-9);
    Ok(())
}

// ----- B A T C H E S ---------------------------------------------------------------

#[test]
fn batch_and_point_agree() -> Result<(), Error> {
    let transforms = [
        wgs84_geocentric(false)?,
        definition::parse("molodensky ellps_0=WGS84 ellps_1=intl dx=84.87 dy=96.49 dz=116.95")?,
        PassThroughTransform::create(1, ExponentialTransform1D::create(1.1, 2.), 1)?,
        linear(&Matrix::from_rows(&[[1., 2., 3.], [4., 5., 6.], [0., 0., 1.]])?)?,
    ];
    for tr in transforms {
        let s = tr.source_dimensions();
        let t = tr.target_dimensions();
        let p: Vec<f64> = [2.5, 53.8, 70.][..s].to_vec();
        let single = tr.transform_point(&p)?;

        let src: Vec<f64> = p.iter().cycle().take(3 * s).copied().collect();
        let mut dst = vec![0.; 3 * t];
        tr.transform_pts(&src, &mut dst, 3)?;
        for chunk in dst.chunks(t) {
            for (a, b) in chunk.iter().zip(&single) {
                assert_float_eq!(*a, *b, abs <= 1e-6, "{}", tr.name());
            }
        }
    }
    Ok(())
}

#[test]
fn aliasing() -> Result<(), Error> {
    // Two dimensional in, three dimensional out
    let tr = wgs84_geocentric(false)?;
    let points = [10., 55., 11., 56., 12., 57., -5., 40., 0., 0.];
    let n = 5;
    let mut expected = vec![0.; 3 * n];
    tr.transform_pts(&points, &mut expected, n)?;

    for (src_off, dst_off) in [(0, 0), (0, 4), (5, 0), (5, 3), (2, 2), (10, 1)] {
        let len = (src_off + 2 * n).max(dst_off + 3 * n);
        let mut buffer = vec![0.; len];
        buffer[src_off..src_off + 2 * n].copy_from_slice(&points);
        tr.transform_in_place(&mut buffer, src_off, dst_off, n)?;
        for (a, b) in buffer[dst_off..dst_off + 3 * n].iter().zip(&expected) {
            assert_float_eq!(*a, *b, abs <= 1e-6, "offsets ({src_off}, {dst_off})");
        }
    }
    Ok(())
}

#[test]
fn bounded_failures() -> Result<(), Error> {
    let tr: TransformRef = Arc::new(SquareRoot);
    let mut src: Vec<f64> = (0..100).map(|i| (i * i) as f64).collect();
    for i in [3, 17, 42, 43, 99] {
        src[i] = -1.;
    }
    let mut dst = vec![0.; 100];
    match tr.transform_pts(&src, &mut dst, 100) {
        Err(Error::Partial {
            first, failures, ..
        }) => {
            assert_eq!(failures, 5);
            assert!(matches!(*first, Error::Transform(_)));
        }
        other => panic!("expected a partial failure, got {other:?}"),
    }
    for (i, v) in dst.iter().enumerate() {
        if src[i] < 0. {
            assert!(v.is_nan());
        } else {
            assert_eq!(*v, i as f64);
        }
    }

    // Too many failures within one block abort the batch
    let src = vec![-1.; 100];
    let mut dst = vec![0.; 100];
    let err = tr.transform_pts(&src, &mut dst, 100).unwrap_err();
    assert!(!err.is_partial());
    assert!(matches!(err, Error::Transform(_)));

    // ...but are tolerated when spread over several blocks
    let mut src = vec![1.; 2048];
    for i in (0..2048).step_by(64) {
        src[i] = -1.;
    }
    let mut dst = vec![0.; 2048];
    let err = tr.transform_pts(&src, &mut dst, 2048).unwrap_err();
    assert!(err.is_partial());
    assert_eq!(dst.iter().filter(|v| v.is_nan()).count(), 32);
    Ok(())
}

#[test]
fn user_provided_in_chain() -> Result<(), Error> {
    let root: TransformRef = Arc::new(SquareRoot);
    let chain = ConcatenatedTransform::create(LinearTransform1D::create(4., 0.), root)?;
    assert_eq!(chain.transform_point(&[9.])?, [6.]);
    // A single point failure is reported as such, not as a partial batch
    assert!(matches!(chain.transform_point(&[-9.]), Err(Error::Transform(_))));
    assert!(matches!(chain.inverse(), Err(Error::NonInvertible(_))));
    Ok(())
}

#[test]
fn failures_across_stages() -> Result<(), Error> {
    let root: TransformRef = Arc::new(SquareRoot);
    // x → (x, 2x, 3x)
    let spread = linear(&Matrix::from_rows(&[[1., 0.], [2., 0.], [3., 0.], [0., 1.]])?)?;
    let n = 700;
    let failing = [5, 300, 699];
    let mut src: Vec<f64> = (0..n).map(|i| (i * i) as f64).collect();
    for i in failing {
        src[i] = -4.;
    }

    let check = |tr: &TransformRef, expected: &dyn Fn(f64) -> [f64; 3]| -> Result<(), Error> {
        let mut dst = vec![0.; 3 * n];
        match tr.transform_pts(&src, &mut dst, n) {
            Err(Error::Partial { failures, .. }) => assert_eq!(failures, 3),
            other => panic!("expected a partial failure, got {other:?}"),
        }
        for (i, p) in dst.chunks(3).enumerate() {
            if failing.contains(&i) {
                assert!(p.iter().all(|v| v.is_nan()), "point {i}");
                continue;
            }
            for (a, b) in p.iter().zip(expected(src[i])) {
                assert_float_eq!(*a, b, abs <= 1e-6, "point {i}");
            }
        }
        Ok(())
    };

    // Failing in the first stage, before the dimension increase
    let chain = ConcatenatedTransform::create(root.clone(), spread.clone())?;
    check(&chain, &|x| [x.sqrt(), 2. * x.sqrt(), 3. * x.sqrt()])?;

    // Failing in the second stage, after the dimension increase
    let chain = ConcatenatedTransform::create(spread, PassThroughTransform::create(1, root, 1)?)?;
    check(&chain, &|x| [x, (2. * x).sqrt(), 3. * x])?;
    Ok(())
}
