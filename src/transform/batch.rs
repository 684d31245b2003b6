//! The default batch protocol, in terms of [`MathTransform::transform_one`].

use super::IterationStrategy;
use super::MathTransform;
use super::MAXIMUM_BUFFER_SIZE;
use super::MAXIMUM_FAILURES;
use crate::Error;
use log::debug;
use log::warn;

/// Bookkeeping of per-point failures within a batch
pub(crate) struct FailureBudget {
    name: &'static str,
    first: Option<Error>,
    suppressed: Vec<Error>,
    failures: usize,
    in_block: usize,
}

impl FailureBudget {
    pub(crate) fn new(name: &'static str) -> FailureBudget {
        FailureBudget {
            name,
            first: None,
            suppressed: Vec::new(),
            failures: 0,
            in_block: 0,
        }
    }

    pub(crate) fn new_block(&mut self) {
        self.in_block = 0;
    }

    /// Register the failure of one point with `ordinates` target ordinates.
    /// Returns the first error of the batch if the block budget is exceeded.
    pub(crate) fn record(&mut self, err: Error, ordinates: usize) -> Result<(), Error> {
        debug!("{}: point failed: {err}", self.name);
        self.failures += 1;
        self.in_block += ordinates.max(1);
        if self.first.is_none() {
            self.first = Some(err);
        } else {
            self.suppressed.push(err);
        }
        if self.in_block > MAXIMUM_FAILURES {
            warn!(
                "{}: too many failures ({} points), aborting batch",
                self.name, self.failures
            );
            return Err(self.first.take().unwrap_or(Error::Unknown));
        }
        Ok(())
    }

    pub(crate) fn finish(self) -> Result<(), Error> {
        match self.first {
            None => Ok(()),
            Some(first) => {
                warn!(
                    "{}: {} point(s) could not be transformed",
                    self.name, self.failures
                );
                Err(Error::Partial {
                    first: Box::new(first),
                    suppressed: self.suppressed,
                    failures: self.failures,
                })
            }
        }
    }
}

/// Number of points in a working block of a transform
pub(crate) fn block_size<T: MathTransform + ?Sized>(tr: &T) -> usize {
    let widest = tr.source_dimensions().max(tr.target_dimensions()).max(1);
    (MAXIMUM_BUFFER_SIZE / widest).max(1)
}

pub(crate) fn check_length(what: &str, needed: usize, found: usize) -> Result<(), Error> {
    if found < needed {
        return Err(Error::MismatchedDimension(
            format!("{what} buffer"),
            needed,
            found,
        ));
    }
    Ok(())
}

// ----- D O U B L E   P R E C I S I O N -----

pub(crate) fn transform_pts<T: MathTransform + ?Sized>(
    tr: &T,
    src: &[f64],
    dst: &mut [f64],
    num_pts: usize,
) -> Result<(), Error> {
    let s = tr.source_dimensions();
    let t = tr.target_dimensions();
    check_length("source", num_pts * s, src.len())?;
    check_length("destination", num_pts * t, dst.len())?;

    let block = block_size(tr);
    let mut budget = FailureBudget::new(tr.name());
    for i in 0..num_pts {
        if i % block == 0 {
            budget.new_block();
        }
        let target = &mut dst[i * t..(i + 1) * t];
        if let Err(err) = tr.transform_one(&src[i * s..(i + 1) * s], Some(target), false) {
            dst[i * t..(i + 1) * t].fill(f64::NAN);
            budget.record(err, t)?;
        }
    }
    budget.finish()
}

pub(crate) fn transform_in_place<T: MathTransform + ?Sized>(
    tr: &T,
    pts: &mut [f64],
    src_off: usize,
    dst_off: usize,
    num_pts: usize,
) -> Result<(), Error> {
    let s = tr.source_dimensions();
    let t = tr.target_dimensions();
    check_length("source", src_off + num_pts * s, pts.len())?;
    check_length("destination", dst_off + num_pts * t, pts.len())?;
    if num_pts == 0 {
        return Ok(());
    }

    let strategy = IterationStrategy::suggest(src_off, s, dst_off, t, num_pts);
    let descending = match strategy {
        IterationStrategy::Ascending => false,
        IterationStrategy::Descending => true,
        IterationStrategy::BufferSource => {
            let copy = pts[src_off..src_off + num_pts * s].to_vec();
            return tr.transform_pts(&copy, &mut pts[dst_off..dst_off + num_pts * t], num_pts);
        }
        IterationStrategy::BufferTarget => {
            let mut result = vec![0.; num_pts * t];
            let status = tr.transform_pts(&pts[src_off..src_off + num_pts * s], &mut result, num_pts);
            if !matches!(status, Err(ref e) if !e.is_partial()) {
                pts[dst_off..dst_off + num_pts * t].copy_from_slice(&result);
            }
            return status;
        }
    };

    // Each point is read in full before it is written, so the source and
    // destination of one point may overlap.
    let block = block_size(tr);
    let mut budget = FailureBudget::new(tr.name());
    let mut point = vec![0.; s];
    for n in 0..num_pts {
        if n % block == 0 {
            budget.new_block();
        }
        let i = if descending { num_pts - 1 - n } else { n };
        let src = src_off + i * s;
        let dst = dst_off + i * t;
        point.copy_from_slice(&pts[src..src + s]);
        if let Err(err) = tr.transform_one(&point, Some(&mut pts[dst..dst + t]), false) {
            pts[dst..dst + t].fill(f64::NAN);
            budget.record(err, t)?;
        }
    }
    budget.finish()
}

// ----- M I X E D   P R E C I S I O N -----

// Keep going on partial failures, stop on anything else
pub(crate) fn defer(deferred: &mut Option<Error>, status: Result<(), Error>) -> Result<(), Error> {
    match status {
        Ok(()) => Ok(()),
        Err(err) if err.is_partial() => {
            *deferred = Some(match deferred.take() {
                None => err,
                Some(earlier) => earlier.merge_partial(err),
            });
            Ok(())
        }
        Err(err) => Err(err),
    }
}

pub(crate) fn finish(deferred: Option<Error>) -> Result<(), Error> {
    match deferred {
        None => Ok(()),
        Some(err) => Err(err),
    }
}

pub(crate) fn transform_f32<T: MathTransform + ?Sized>(
    tr: &T,
    src: &[f32],
    dst: &mut [f32],
    num_pts: usize,
) -> Result<(), Error> {
    let s = tr.source_dimensions();
    let t = tr.target_dimensions();
    check_length("source", num_pts * s, src.len())?;
    check_length("destination", num_pts * t, dst.len())?;

    let block = block_size(tr);
    let mut input = vec![0.; block * s];
    let mut output = vec![0.; block * t];
    let mut deferred = None;
    let mut done = 0;
    while done < num_pts {
        let n = block.min(num_pts - done);
        let from = &src[done * s..(done + n) * s];
        input[..n * s]
            .iter_mut()
            .zip(from)
            .for_each(|(d, s)| *d = *s as f64);
        let status = tr.transform_pts(&input[..n * s], &mut output[..n * t], n);
        defer(&mut deferred, status)?;
        dst[done * t..(done + n) * t]
            .iter_mut()
            .zip(&output[..n * t])
            .for_each(|(d, s)| *d = *s as f32);
        done += n;
    }
    finish(deferred)
}

pub(crate) fn transform_f64_to_f32<T: MathTransform + ?Sized>(
    tr: &T,
    src: &[f64],
    dst: &mut [f32],
    num_pts: usize,
) -> Result<(), Error> {
    let s = tr.source_dimensions();
    let t = tr.target_dimensions();
    check_length("source", num_pts * s, src.len())?;
    check_length("destination", num_pts * t, dst.len())?;

    let block = block_size(tr);
    let mut output = vec![0.; block * t];
    let mut deferred = None;
    let mut done = 0;
    while done < num_pts {
        let n = block.min(num_pts - done);
        let status = tr.transform_pts(&src[done * s..(done + n) * s], &mut output[..n * t], n);
        defer(&mut deferred, status)?;
        dst[done * t..(done + n) * t]
            .iter_mut()
            .zip(&output[..n * t])
            .for_each(|(d, s)| *d = *s as f32);
        done += n;
    }
    finish(deferred)
}

pub(crate) fn transform_f32_to_f64<T: MathTransform + ?Sized>(
    tr: &T,
    src: &[f32],
    dst: &mut [f64],
    num_pts: usize,
) -> Result<(), Error> {
    let s = tr.source_dimensions();
    let t = tr.target_dimensions();
    check_length("source", num_pts * s, src.len())?;
    check_length("destination", num_pts * t, dst.len())?;

    let block = block_size(tr);
    let mut input = vec![0.; block * s];
    let mut deferred = None;
    let mut done = 0;
    while done < num_pts {
        let n = block.min(num_pts - done);
        input[..n * s]
            .iter_mut()
            .zip(&src[done * s..(done + n) * s])
            .for_each(|(d, s)| *d = *s as f64);
        let status = tr.transform_pts(&input[..n * s], &mut dst[done * t..(done + n) * t], n);
        defer(&mut deferred, status)?;
        done += n;
    }
    finish(deferred)
}

pub(crate) fn transform_f32_in_place<T: MathTransform + ?Sized>(
    tr: &T,
    pts: &mut [f32],
    src_off: usize,
    dst_off: usize,
    num_pts: usize,
) -> Result<(), Error> {
    let s = tr.source_dimensions();
    let t = tr.target_dimensions();
    check_length("source", src_off + num_pts * s, pts.len())?;
    check_length("destination", dst_off + num_pts * t, pts.len())?;
    if num_pts == 0 {
        return Ok(());
    }

    let descending = match IterationStrategy::suggest(src_off, s, dst_off, t, num_pts) {
        IterationStrategy::Ascending => false,
        IterationStrategy::Descending => true,
        IterationStrategy::BufferSource | IterationStrategy::BufferTarget => {
            let copy = pts[src_off..src_off + num_pts * s].to_vec();
            return tr.transform_f32(&copy, &mut pts[dst_off..dst_off + num_pts * t], num_pts);
        }
    };

    // A whole chunk is read before any of it is written. If the order is safe
    // point by point, it is also safe chunk by chunk.
    let block = block_size(tr);
    let mut input = vec![0.; block * s];
    let mut output = vec![0.; block * t];
    let mut deferred = None;
    let mut done = 0;
    while done < num_pts {
        let n = block.min(num_pts - done);
        let first = if descending { num_pts - done - n } else { done };
        let src = src_off + first * s;
        let dst = dst_off + first * t;
        input[..n * s]
            .iter_mut()
            .zip(&pts[src..src + n * s])
            .for_each(|(d, s)| *d = *s as f64);
        let status = tr.transform_pts(&input[..n * s], &mut output[..n * t], n);
        defer(&mut deferred, status)?;
        pts[dst..dst + n * t]
            .iter_mut()
            .zip(&output[..n * t])
            .for_each(|(d, s)| *d = *s as f32);
        done += n;
    }
    finish(deferred)
}

// ----- T E S T S ------------------------------------------------------------------
