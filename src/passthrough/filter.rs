use crate::authoring::*;
use crate::linear::linear;

/// Extracts the part of a transform operating on a subset of its source
/// dimensions.
///
/// The result maps the selected source dimensions to the target dimensions
/// depending only on them, reported by [`DimensionFilter::target_dimensions`]
/// after [`DimensionFilter::separate`].
#[derive(Debug)]
pub struct DimensionFilter {
    transform: TransformRef,
    source: Vec<usize>,
    target: Vec<usize>,
}

impl DimensionFilter {
    pub fn new(transform: TransformRef) -> DimensionFilter {
        DimensionFilter {
            transform,
            source: Vec::new(),
            target: Vec::new(),
        }
    }

    /// Select source dimensions. Selections accumulate, and are kept sorted.
    pub fn add_source_dimensions(&mut self, dimensions: &[usize]) -> Result<(), Error> {
        let available = self.transform.source_dimensions();
        for &d in dimensions {
            if d >= available {
                return Err(Error::BadParam(
                    String::from("dimension"),
                    format!("{d} (transform has {available} source dimensions)"),
                ));
            }
            if !self.source.contains(&d) {
                self.source.push(d);
            }
        }
        self.source.sort_unstable();
        Ok(())
    }

    /// Select the source dimensions `lower..upper`
    pub fn add_source_dimension_range(&mut self, lower: usize, upper: usize) -> Result<(), Error> {
        let range: Vec<usize> = (lower..upper).collect();
        self.add_source_dimensions(&range)
    }

    pub fn source_dimensions(&self) -> &[usize] {
        &self.source
    }

    /// The target dimensions of the last separated transform
    pub fn target_dimensions(&self) -> &[usize] {
        &self.target
    }

    /// The transform from the selected source dimensions (all of them, if
    /// none were selected) to the target dimensions depending only on those.
    pub fn separate(&mut self) -> Result<TransformRef, Error> {
        if self.source.is_empty() {
            self.source = (0..self.transform.source_dimensions()).collect();
        }
        let (result, target) = separate(&self.transform, &self.source)?;
        debug!(
            "separated source dimensions {:?} of {}: target dimensions {:?}",
            self.source,
            self.transform.name(),
            target
        );
        self.target = target;
        Ok(result)
    }
}

fn separate(tr: &TransformRef, dims: &[usize]) -> Result<(TransformRef, Vec<usize>), Error> {
    let s = tr.source_dimensions();
    let t = tr.target_dimensions();
    if dims.len() == s {
        return Ok((tr.clone(), (0..t).collect()));
    }
    if tr.is_identity() && s == t {
        return Ok((IdentityTransform::create(dims.len()), dims.to_vec()));
    }
    if let Some(m) = tr.matrix() {
        return separate_matrix(tr.name(), &m, dims);
    }
    if let Some(pt) = tr.downcast_ref::<PassThroughTransform>() {
        return separate_pass_through(pt, dims);
    }
    if let Some(c) = tr.downcast_ref::<ConcatenatedTransform>() {
        let (step1, between) = separate(c.transform1(), dims)?;
        let (step2, target) = separate(c.transform2(), &between)?;
        return Ok((ConcatenatedTransform::create(step1, step2)?, target));
    }
    Err(Error::Transform(format!(
        "{}: cannot separate source dimensions {dims:?}",
        tr.name()
    )))
}

// Keep the rows with no dependency on the dropped columns
fn separate_matrix(name: &str, m: &Matrix, dims: &[usize]) -> Result<(TransformRef, Vec<usize>), Error> {
    let src = m.cols() - 1;
    let tgt = m.rows() - 1;
    let independent = |r: usize| (0..src).all(|c| dims.contains(&c) || m[(r, c)] == 0.);
    if !independent(tgt) {
        return Err(Error::Transform(format!(
            "{name}: projective term depends on a dropped dimension"
        )));
    }
    let rows: Vec<usize> = (0..tgt).filter(|&r| independent(r)).collect();
    let mut columns = dims.to_vec();
    columns.push(src);

    let mut reduced = Matrix::zeros(rows.len() + 1, columns.len());
    for (j, &r) in rows.iter().chain(std::iter::once(&tgt)).enumerate() {
        for (i, &c) in columns.iter().enumerate() {
            reduced[(j, i)] = m[(r, c)];
        }
    }
    Ok((linear(&reduced)?, rows))
}

fn separate_pass_through(pt: &PassThroughTransform, dims: &[usize]) -> Result<(TransformRef, Vec<usize>), Error> {
    let first = pt.first_affected_ordinate();
    let sub = pt.sub_transform();
    let ss = sub.source_dimensions();
    let st = sub.target_dimensions();

    let leading: Vec<usize> = dims.iter().copied().filter(|&d| d < first).collect();
    let affected: Vec<usize> = dims
        .iter()
        .filter(|&&d| d >= first && d < first + ss)
        .map(|d| d - first)
        .collect();
    // Trailing dimensions shift with the dimension change of the sub-transform
    let trailing: Vec<usize> = dims
        .iter()
        .filter(|&&d| d >= first + ss)
        .map(|d| d - ss + st)
        .collect();

    if affected.is_empty() {
        let target = leading.iter().chain(&trailing).copied().collect();
        return Ok((IdentityTransform::create(dims.len()), target));
    }
    let (inner, inner_target) = separate(sub, &affected)?;
    let mut target = leading.clone();
    target.extend(inner_target.iter().map(|d| d + first));
    target.extend(&trailing);
    let result = PassThroughTransform::create(leading.len(), inner, trailing.len())?;
    Ok((result, target))
}

// ----- T E S T S ------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;

    #[test]
    fn affine() -> Result<(), Error> {
        let m = Matrix::from_rows(&[
            [2., 0., 0., 1.],
            [0., 3., 1., 0.],
            [0., 0., 4., 0.],
            [0., 0., 0., 1.],
        ])?;
        let mut filter = DimensionFilter::new(linear(&m)?);
        filter.add_source_dimensions(&[0, 2])?;
        let separated = filter.separate()?;
        // Target 1 depends on the dropped source dimension 1
        assert_eq!(filter.target_dimensions(), &[0, 2]);
        assert_eq!(separated.transform_point(&[1., 1.])?, vec![3., 4.]);
        Ok(())
    }

    #[test]
    fn pass_through() -> Result<(), Error> {
        let exp = ExponentialTransform1D::create(10., 1.);
        let pt = PassThroughTransform::create(1, exp.clone(), 1)?;

        let mut filter = DimensionFilter::new(pt.clone());
        filter.add_source_dimensions(&[1])?;
        assert!(Arc::ptr_eq(&filter.separate()?, &exp));
        assert_eq!(filter.target_dimensions(), &[1]);

        let mut filter = DimensionFilter::new(pt.clone());
        filter.add_source_dimensions(&[0, 2])?;
        assert!(filter.separate()?.is_identity());
        assert_eq!(filter.target_dimensions(), &[0, 2]);

        let mut filter = DimensionFilter::new(pt.clone());
        filter.add_source_dimension_range(1, 3)?;
        let separated = filter.separate()?;
        assert_eq!(filter.target_dimensions(), &[1, 2]);
        let y = separated.transform_point(&[2., 5.])?;
        assert_float_eq!(y[0], 100., abs <= 1e-12);
        assert_eq!(y[1], 5.);

        let mut filter = DimensionFilter::new(pt);
        assert!(filter.add_source_dimensions(&[3]).is_err());
        Ok(())
    }

    #[test]
    fn inseparable() -> Result<(), Error> {
        let chain = ConcatenatedTransform::create(
            LogarithmicTransform1D::create(10., 0.)?,
            ExponentialTransform1D::create(2., 1.),
        )?;
        let mut filter = DimensionFilter::new(chain.clone());
        assert!(Arc::ptr_eq(&filter.separate()?, &chain));

        let geocentric = GeocentricTransform::create(6378137., 6356752.314140347, true)?;
        let mut filter = DimensionFilter::new(geocentric);
        filter.add_source_dimensions(&[0])?;
        assert!(filter.separate().is_err());
        Ok(())
    }
}
