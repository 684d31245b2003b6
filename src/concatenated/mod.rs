//! Concatenation of transforms.
//!
//! [`ConcatenatedTransform::create`] is the one way to chain two transforms.
//! It simplifies the chain whenever it can: identities are absorbed, matrices
//! multiplied, transform/inverse pairs cancelled, affines pushed inside
//! pass-through transforms, and transform specific shortcuts (e.g.
//! exponential after logarithm) applied. Only when nothing applies is an
//! actual [`ConcatenatedTransform`] constructed.

use crate::authoring::*;
use crate::linear::linear;
use crate::matrix::Matrix;
use crate::parameter::OpParameter;
use crate::transform::batch;
use crate::transform::compute_hash;
use crate::IDENTITY_TOLERANCE;

/// `transform2 ∘ transform1`: first `transform1`, then `transform2`
#[derive(Debug)]
pub struct ConcatenatedTransform {
    transform1: TransformRef,
    transform2: TransformRef,
    /// The intermediate dimension equals the source and target dimensions,
    /// so no intermediate buffer is needed
    direct: bool,
    inverse: InverseCell,
    hash: HashCache,
}

// ----- C R E A T I O N -------------------------------------------------------------

impl ConcatenatedTransform {
    /// The concatenation of `tr1` followed by `tr2`, simplified if possible
    pub fn create(tr1: TransformRef, tr2: TransformRef) -> Result<TransformRef, Error> {
        let mid = tr1.target_dimensions();
        if mid != tr2.source_dimensions() {
            return Err(Error::MismatchedDimension(
                String::from("ConcatenatedTransform"),
                mid,
                tr2.source_dimensions(),
            ));
        }
        if let Some(simplified) = create_optimized(&tr1, &tr2)? {
            return Ok(simplified);
        }
        if let Some(regrouped) = reassociate(&tr1, &tr2)? {
            return Ok(regrouped);
        }
        Ok(ConcatenatedTransform::construct(tr1, tr2, InverseCell::new()))
    }

    /// Concatenate a whole chain, left to right
    pub fn create_chain(steps: &[TransformRef]) -> Result<TransformRef, Error> {
        let mut iter = steps.iter();
        let mut result = match iter.next() {
            Some(first) => first.clone(),
            None => return Err(Error::General("empty chain")),
        };
        for step in iter {
            result = ConcatenatedTransform::create(result, step.clone())?;
        }
        Ok(result)
    }

    fn construct(tr1: TransformRef, tr2: TransformRef, inverse: InverseCell) -> TransformRef {
        let mid = tr1.target_dimensions();
        let direct = tr1.source_dimensions() == mid && tr2.target_dimensions() == mid;
        Arc::new(ConcatenatedTransform {
            transform1: tr1,
            transform2: tr2,
            direct,
            inverse,
            hash: HashCache::new(),
        })
    }

    pub fn transform1(&self) -> &TransformRef {
        &self.transform1
    }

    pub fn transform2(&self) -> &TransformRef {
        &self.transform2
    }

    pub fn is_direct(&self) -> bool {
        self.direct
    }
}

/// Simplifications of the pair `tr1, tr2`, without looking inside
/// concatenations
fn create_optimized(tr1: &TransformRef, tr2: &TransformRef) -> Result<Option<TransformRef>, Error> {
    if tr1.is_identity() {
        return Ok(Some(tr2.clone()));
    }
    if tr2.is_identity() {
        return Ok(Some(tr1.clone()));
    }

    // Two matrices: multiply them
    if let (Some(m1), Some(m2)) = (tr1.matrix(), tr2.matrix()) {
        let product = m2.multiply(&m1)?;
        if product.is_identity_within(IDENTITY_TOLERANCE) {
            debug!("concatenation: matrices cancel");
            return Ok(Some(IdentityTransform::create(product.rows() - 1)));
        }
        debug!("concatenation: matrices multiplied");
        return Ok(Some(linear(&product)?));
    }

    // A matrix next to a pass-through: push it inside, if it only touches
    // the dimensions of the sub-transform
    if let (Some(m1), Some(pt)) = (tr1.matrix(), tr2.downcast_ref::<PassThroughTransform>()) {
        if let Some(absorbed) = pt.absorb_matrix(&m1, true)? {
            debug!("concatenation: affine moved into pass-through");
            return Ok(Some(absorbed));
        }
    }
    if let (Some(pt), Some(m2)) = (tr1.downcast_ref::<PassThroughTransform>(), tr2.matrix()) {
        if let Some(absorbed) = pt.absorb_matrix(&m2, false)? {
            debug!("concatenation: affine moved into pass-through");
            return Ok(Some(absorbed));
        }
    }

    // A transform followed by its own inverse
    if are_inverse(tr1, tr2) {
        debug!("concatenation: {} cancelled by its inverse", tr1.name());
        return Ok(Some(IdentityTransform::create(tr1.source_dimensions())));
    }

    // Transform specific shortcuts
    if let Some(folded) = tr1.concatenate(tr2, false) {
        debug!("concatenation: {} folded {}", tr1.name(), tr2.name());
        return Ok(Some(folded));
    }
    if let Some(folded) = tr2.concatenate(tr1, true) {
        debug!("concatenation: {} folded {}", tr2.name(), tr1.name());
        return Ok(Some(folded));
    }
    Ok(None)
}

fn are_inverse(tr1: &TransformRef, tr2: &TransformRef) -> bool {
    if tr1.source_dimensions() != tr2.target_dimensions() {
        return false;
    }
    match tr1.clone().inverse() {
        Ok(inverse) => {
            Arc::ptr_eq(&inverse, tr2) || inverse.equals(tr2.as_ref(), ComparisonMode::Approximate)
        }
        Err(_) => false,
    }
}

/// Flatten both operands into one chain, and merge adjacent steps until
/// nothing more merges. `None` if that does not shorten the chain.
fn reassociate(tr1: &TransformRef, tr2: &TransformRef) -> Result<Option<TransformRef>, Error> {
    if !tr1.is::<ConcatenatedTransform>() && !tr2.is::<ConcatenatedTransform>() {
        return Ok(None);
    }
    let mut steps = Vec::new();
    flatten(tr1, &mut steps);
    flatten(tr2, &mut steps);
    let original = steps.len();

    let mut merged = true;
    while merged && steps.len() > 1 {
        merged = false;
        let mut i = 0;
        while i + 1 < steps.len() {
            if let Some(simplified) = create_optimized(&steps[i], &steps[i + 1])? {
                steps[i] = simplified;
                steps.remove(i + 1);
                merged = true;
                continue;
            }
            i += 1;
        }
    }
    if steps.len() >= original {
        return Ok(None);
    }
    debug!(
        "concatenation: regrouped {original} steps into {}",
        steps.len()
    );

    let mut iter = steps.into_iter();
    let mut result = match iter.next() {
        Some(first) => first,
        None => return Ok(None),
    };
    for step in iter {
        result = ConcatenatedTransform::construct(result, step, InverseCell::new());
    }
    Ok(Some(result))
}

fn flatten(tr: &TransformRef, steps: &mut Vec<TransformRef>) {
    match tr.downcast_ref::<ConcatenatedTransform>() {
        Some(c) => {
            flatten(&c.transform1, steps);
            flatten(&c.transform2, steps);
        }
        None => steps.push(tr.clone()),
    }
}

// ----- S T E P S -------------------------------------------------------------------

impl ConcatenatedTransform {
    /// All steps, nested concatenations flattened, in order of application
    pub fn steps(&self) -> Vec<TransformRef> {
        let mut steps = Vec::new();
        flatten(&self.transform1, &mut steps);
        flatten(&self.transform2, &mut steps);
        steps
    }

    /// The steps as they should be presented: kernels with normalization
    /// affines have those folded into their neighbors
    pub fn pseudo_steps(&self) -> Vec<TransformRef> {
        let mut steps = self.steps();
        let mut i = 0;
        while i < steps.len() {
            let step = steps[i].clone();
            i = step.before_format(&mut steps, i) + 1;
        }
        steps
    }

    /// The single parameterized step of the chain, if there is exactly one
    pub fn parameterized_step(&self) -> Option<TransformRef> {
        let mut found = None;
        for step in self.pseudo_steps() {
            if step.parameters().is_none() {
                continue;
            }
            if found.is_some() {
                return None;
            }
            found = Some(step);
        }
        found
    }
}

// ----- E V A L U A T I O N ---------------------------------------------------------

impl MathTransform for ConcatenatedTransform {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn name(&self) -> &'static str {
        "ConcatenatedTransform"
    }
    fn source_dimensions(&self) -> usize {
        self.transform1.source_dimensions()
    }
    fn target_dimensions(&self) -> usize {
        self.transform2.target_dimensions()
    }
    fn is_identity(&self) -> bool {
        self.transform1.is_identity() && self.transform2.is_identity()
    }

    fn transform_one(
        &self,
        src: &[f64],
        dst: Option<&mut [f64]>,
        derivate: bool,
    ) -> Result<Option<Matrix>, Error> {
        // No intermediate buffer: the second stage runs in place in `dst`
        let dst = match (self.direct && !derivate, dst) {
            (true, Some(dst)) => {
                self.transform1.transform_one(src, Some(&mut *dst), false)?;
                return match self.transform2.transform_in_place(dst, 0, 0, 1) {
                    Err(Error::Partial { first, .. }) => Err(*first),
                    status => status.map(|_| None),
                };
            }
            (_, dst) => dst,
        };

        let mut buffer = vec![0.; self.transform1.target_dimensions()];
        let d1 = self.transform1.transform_one(src, Some(&mut buffer), derivate)?;
        let d2 = self.transform2.transform_one(&buffer, dst, derivate)?;
        if !derivate {
            return Ok(None);
        }
        match (d1, d2) {
            // Chain rule
            (Some(d1), Some(d2)) => Ok(Some(d2.multiply(&d1)?)),
            _ => Err(Error::Transform(String::from("derivative not available"))),
        }
    }

    fn transform_pts(&self, src: &[f64], dst: &mut [f64], num_pts: usize) -> Result<(), Error> {
        let s = self.source_dimensions();
        let mid = self.transform1.target_dimensions();
        let t = self.target_dimensions();
        batch::check_length("source", num_pts * s, src.len())?;
        batch::check_length("destination", num_pts * t, dst.len())?;
        let mut deferred = None;

        // The intermediate result fits in the destination
        if mid <= t {
            let status = self
                .transform1
                .transform_pts(src, &mut dst[..num_pts * mid], num_pts);
            batch::defer(&mut deferred, status)?;
            let status = self.transform2.transform_in_place(dst, 0, 0, num_pts);
            batch::defer(&mut deferred, status)?;
            return batch::finish(deferred);
        }

        // Otherwise, go through a bounded buffer
        let block = (MAXIMUM_BUFFER_SIZE / mid).max(1);
        let mut buffer = vec![0.; block * mid];
        let mut done = 0;
        while done < num_pts {
            let n = block.min(num_pts - done);
            let status = self.transform1.transform_pts(
                &src[done * s..(done + n) * s],
                &mut buffer[..n * mid],
                n,
            );
            batch::defer(&mut deferred, status)?;
            let status = self.transform2.transform_pts(
                &buffer[..n * mid],
                &mut dst[done * t..(done + n) * t],
                n,
            );
            batch::defer(&mut deferred, status)?;
            done += n;
        }
        batch::finish(deferred)
    }

    fn transform_in_place(
        &self,
        pts: &mut [f64],
        src_off: usize,
        dst_off: usize,
        num_pts: usize,
    ) -> Result<(), Error> {
        let s = self.source_dimensions();
        let mid = self.transform1.target_dimensions();
        let t = self.target_dimensions();
        batch::check_length("source", src_off + num_pts * s, pts.len())?;
        batch::check_length("destination", dst_off + num_pts * t, pts.len())?;

        // Each stage respects the overlap of its own source and destination
        if mid <= t {
            let mut deferred = None;
            let status = self
                .transform1
                .transform_in_place(pts, src_off, dst_off, num_pts);
            batch::defer(&mut deferred, status)?;
            let status = self
                .transform2
                .transform_in_place(pts, dst_off, dst_off, num_pts);
            batch::defer(&mut deferred, status)?;
            return batch::finish(deferred);
        }

        // Block by block, each block's source copied before its destination
        // is written. Point-wise safe orders are block-wise safe too.
        let descending = match IterationStrategy::suggest(src_off, s, dst_off, t, num_pts) {
            IterationStrategy::Ascending => false,
            IterationStrategy::Descending => true,
            IterationStrategy::BufferSource | IterationStrategy::BufferTarget => {
                let copy = pts[src_off..src_off + num_pts * s].to_vec();
                return self.transform_pts(&copy, &mut pts[dst_off..dst_off + num_pts * t], num_pts);
            }
        };
        let block = (MAXIMUM_BUFFER_SIZE / mid.max(s)).max(1);
        let blocks = (num_pts + block - 1) / block;
        let mut source = vec![0.; block.min(num_pts) * s];
        let mut deferred = None;
        for k in 0..blocks {
            let k = if descending { blocks - 1 - k } else { k };
            let first = k * block;
            let n = block.min(num_pts - first);
            let from = src_off + first * s;
            source[..n * s].copy_from_slice(&pts[from..from + n * s]);
            let to = dst_off + first * t;
            let status = self.transform_pts(&source[..n * s], &mut pts[to..to + n * t], n);
            batch::defer(&mut deferred, status)?;
        }
        batch::finish(deferred)
    }

    fn inverse(self: Arc<Self>) -> Result<TransformRef, Error> {
        let origin: TransformRef = self.clone();
        self.inverse.get_or_init(|| {
            let inverse1 = self.transform1.clone().inverse()?;
            let inverse2 = self.transform2.clone().inverse()?;
            let inverse = ConcatenatedTransform::create(inverse2, inverse1)?;
            match inverse.downcast_ref::<ConcatenatedTransform>() {
                Some(c) => Ok(ConcatenatedTransform::construct(
                    c.transform1.clone(),
                    c.transform2.clone(),
                    InverseCell::with_origin(origin),
                )),
                None => Ok(inverse),
            }
        })
    }

    fn parameter_descriptors(&self) -> Option<&'static [OpParameter]> {
        self.parameterized_step()?.parameter_descriptors()
    }

    fn parameters(&self) -> Option<ParameterValues> {
        self.parameterized_step()?.parameters()
    }

    fn equals(&self, other: &dyn MathTransform, mode: ComparisonMode) -> bool {
        match other.downcast_ref::<ConcatenatedTransform>() {
            Some(o) => {
                self.transform1.equals(o.transform1.as_ref(), mode)
                    && self.transform2.equals(o.transform2.as_ref(), mode)
            }
            None => false,
        }
    }

    fn hash_code(&self) -> u64 {
        self.hash.get_or_compute(|| {
            let h1 = self.transform1.hash_code();
            let h2 = self.transform2.hash_code();
            h1.rotate_left(17) ^ h2 ^ compute_hash(self)
        })
    }
}

// ----- T E S T S ------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::MathTransform;
    use float_eq::assert_float_eq;

    #[test]
    fn dimension_mismatch() {
        let a = IdentityTransform::create(2);
        let b = IdentityTransform::create(3);
        assert!(matches!(
            ConcatenatedTransform::create(a, b),
            Err(Error::MismatchedDimension(..))
        ));
    }

    #[test]
    fn identity_absorption() -> Result<(), Error> {
        let exp = ExponentialTransform1D::create(10., 2.);
        let id = IdentityTransform::create(1);
        assert!(Arc::ptr_eq(&ConcatenatedTransform::create(id.clone(), exp.clone())?, &exp));
        assert!(Arc::ptr_eq(&ConcatenatedTransform::create(exp.clone(), id)?, &exp));
        Ok(())
    }

    #[test]
    fn matrix_fusion() -> Result<(), Error> {
        let a = LinearTransform1D::create(2., 3.);
        let b = LinearTransform1D::create(5., -1.);
        let ab = ConcatenatedTransform::create(a.clone(), b)?;
        assert!(ab.is::<LinearTransform1D>());
        assert_eq!(ab.transform_1d(1.)?, 24.);

        let cancel = ConcatenatedTransform::create(a.clone(), a.clone().inverse()?)?;
        assert!(cancel.is_identity());

        // Near identity snaps to identity
        let near = LinearTransform1D::create(1. + 1e-12, 0.);
        let snapped = ConcatenatedTransform::create(near, IdentityTransform::create(1))?;
        assert!(!snapped.is_identity());
        let snapped = ConcatenatedTransform::create(
            LinearTransform1D::create(1. + 1e-12, 0.),
            LinearTransform1D::create(1., 1e-12),
        )?;
        assert!(snapped.is_identity());
        Ok(())
    }

    #[test]
    fn inverse_cancellation() -> Result<(), Error> {
        let exp = ExponentialTransform1D::create(10., 2.);
        let log = exp.clone().inverse()?;
        let id = ConcatenatedTransform::create(exp.clone(), log.clone())?;
        assert!(id.is_identity());
        let id = ConcatenatedTransform::create(log, exp)?;
        assert!(id.is_identity());
        Ok(())
    }

    #[test]
    fn unoptimized_chain() -> Result<(), Error> {
        // log10(x), then a Molodensky-free nonlinear step: no simplification
        let log = LogarithmicTransform1D::create(10., 0.)?;
        let exp = ExponentialTransform1D::create(2., 1.);
        let chain = ConcatenatedTransform::create(log.clone(), exp.clone())?;
        let c = chain
            .downcast_ref::<ConcatenatedTransform>()
            .ok_or(Error::Unknown)?;
        assert!(c.is_direct());
        assert_eq!(c.steps().len(), 2);
        // 2^log10(100) = 4
        assert_float_eq!(chain.transform_1d(100.)?, 4., abs <= 1e-12);
        // d/dx 2^log10(x) = 2^log10(x)·ln 2/(x·ln 10)
        let expected = 4. * 2_f64.ln() / (100. * 10_f64.ln());
        assert_float_eq!(chain.derivative_1d(100.)?, expected, abs <= 1e-15);

        let inv = chain.clone().inverse()?;
        assert_float_eq!(inv.transform_1d(4.)?, 100., abs <= 1e-9);
        assert!(Arc::ptr_eq(&inv.inverse()?, &chain));

        // Two parameterized steps: no parameters for the chain
        assert!(chain.parameters().is_none());
        Ok(())
    }

    #[test]
    fn regrouping() -> Result<(), Error> {
        let log = LogarithmicTransform1D::create(10., 0.)?;
        let exp = ExponentialTransform1D::create(2., 1.);
        let scale = LinearTransform1D::create(3., 0.);
        let chain = ConcatenatedTransform::create(log.clone(), exp.clone())?;

        // (log, exp), exp⁻¹  →  log
        let back = ConcatenatedTransform::create(chain.clone(), exp.clone().inverse()?)?;
        assert!(back.is::<LogarithmicTransform1D>());

        // (log, exp), scale  →  log, exp'
        let scaled = ConcatenatedTransform::create(chain.clone(), scale)?;
        let c = scaled
            .downcast_ref::<ConcatenatedTransform>()
            .ok_or(Error::Unknown)?;
        assert_eq!(c.steps().len(), 2);
        assert_float_eq!(scaled.transform_1d(100.)?, 12., abs <= 1e-12);
        Ok(())
    }

    #[test]
    fn batches() -> Result<(), Error> {
        let log = LogarithmicTransform1D::create(10., 0.)?;
        let exp = ExponentialTransform1D::create(2., 1.);
        let chain = ConcatenatedTransform::create(log, exp)?;
        let src = [1., 10., 100., 1000.];
        let mut dst = [0.; 4];
        chain.transform_pts(&src, &mut dst, 4)?;
        for (d, expected) in dst.iter().zip([1., 2., 4., 8.]) {
            assert_float_eq!(*d, expected, abs <= 1e-12);
        }
        let mut pts = [0., 1., 10., 100., 1000.];
        chain.transform_in_place(&mut pts, 1, 0, 4)?;
        for (d, expected) in pts[..4].iter().zip([1., 2., 4., 8.]) {
            assert_float_eq!(*d, expected, abs <= 1e-12);
        }
        Ok(())
    }

    #[test]
    fn direct_evaluation() -> Result<(), Error> {
        // 2 → 2 → 2: the second stage runs in the destination
        let exp = PassThroughTransform::create(0, ExponentialTransform1D::create(2., 1.), 1)?;
        let log = PassThroughTransform::create(1, LogarithmicTransform1D::create(10., 0.)?, 0)?;
        let chain = ConcatenatedTransform::create(exp, log)?;
        let c = chain
            .downcast_ref::<ConcatenatedTransform>()
            .ok_or(Error::Unknown)?;
        assert!(c.is_direct());

        let p = chain.transform_point(&[3., 100.])?;
        assert_float_eq!(p[0], 8., abs <= 1e-12);
        assert_float_eq!(p[1], 2., abs <= 1e-12);

        let d = chain.derivative(&[3., 100.])?;
        assert_float_eq!(d[(0, 0)], 8. * 2_f64.ln(), abs <= 1e-12);
        assert_float_eq!(d[(1, 1)], 1. / (100. * 10_f64.ln()), abs <= 1e-15);
        assert_eq!(d[(0, 1)], 0.);
        assert_eq!(d[(1, 0)], 0.);
        Ok(())
    }

    // Batch and in-place results must match point by point results
    fn check_batches(tr: &TransformRef, src: &[f64], n: usize) -> Result<(), Error> {
        let s = tr.source_dimensions();
        let t = tr.target_dimensions();
        let mut expected = Vec::with_capacity(n * t);
        for p in src.chunks(s) {
            expected.extend(tr.transform_point(p)?);
        }

        let mut dst = vec![0.; n * t];
        tr.transform_pts(src, &mut dst, n)?;
        for (a, b) in dst.iter().zip(&expected) {
            assert_float_eq!(*a, *b, abs <= 1e-6);
        }

        for (src_off, dst_off) in [(0, 0), (0, 7), (7, 0), (3, 3), (1, 600)] {
            let len = (src_off + n * s).max(dst_off + n * t);
            let mut pts = vec![0.; len];
            pts[src_off..src_off + n * s].copy_from_slice(src);
            tr.transform_in_place(&mut pts, src_off, dst_off, n)?;
            for (a, b) in pts[dst_off..dst_off + n * t].iter().zip(&expected) {
                assert_float_eq!(*a, *b, abs <= 1e-6, "offsets ({src_off}, {dst_off})");
            }
        }
        Ok(())
    }

    #[test]
    fn dimension_changing_batches() -> Result<(), Error> {
        let n = 700;
        let lonlat: Vec<f64> = (0..n)
            .flat_map(|i| [-180. + 0.5 * i as f64, -89. + (i % 179) as f64])
            .collect();

        // 2 → 2 → 3: the intermediate result fits in the destination
        let geo = GeocentricTransform::create(6378137.0, 6356752.314245, false)?;
        let c = geo
            .downcast_ref::<ConcatenatedTransform>()
            .ok_or(Error::Unknown)?;
        assert!(c.transform1().target_dimensions() < c.target_dimensions());
        check_batches(&geo, &lonlat, n)?;

        // 2 → 3 → 2: several blocks through the intermediate buffer
        let drop_z = linear(&Matrix::from_rows(&[
            [1., 0., 0., 0.],
            [0., 1., 0., 0.],
            [0., 0., 0., 1.],
        ])?)?;
        let chain = ConcatenatedTransform::create(geo.clone(), drop_z)?;
        let c = chain
            .downcast_ref::<ConcatenatedTransform>()
            .ok_or(Error::Unknown)?;
        assert_eq!(c.transform1().target_dimensions(), 3);
        assert_eq!(chain.target_dimensions(), 2);
        check_batches(&chain, &lonlat, n)?;

        // A pass-through around a dimension increasing sub-transform
        let pt = PassThroughTransform::create(1, geo, 2)?;
        assert_eq!((pt.source_dimensions(), pt.target_dimensions()), (5, 6));
        let src: Vec<f64> = lonlat
            .chunks(2)
            .enumerate()
            .flat_map(|(i, p)| [i as f64, p[0], p[1], -(i as f64), 2. * i as f64])
            .collect();
        check_batches(&pt, &src, n)?;
        Ok(())
    }
}
