//! Matrix backed transforms.
//!
//! All linear transforms are described by a `(target+1) × (source+1)`
//! homogeneous matrix, and created through [`linear`], which picks the most
//! specialized implementation for the matrix at hand.

mod copy;
mod identity;
mod linear1d;
mod projective;

pub use copy::CopyTransform;
pub use identity::IdentityTransform;
pub use linear1d::ConstantTransform1D;
pub use linear1d::LinearTransform1D;
pub use projective::ProjectiveTransform;

use crate::matrix::Matrix;
use crate::parameter::OpParameter;
use crate::parameter::ParameterValues;
use crate::transform::InverseCell;
use crate::transform::MathTransform;
use crate::Error;
use crate::TransformRef;
use std::sync::Arc;

#[rustfmt::skip]
pub const GAMUT: [OpParameter; 3] = [
    OpParameter::Natural { key: "num_row",  default: None },
    OpParameter::Natural { key: "num_col",  default: None },
    OpParameter::Series  { key: "elements", default: None },
];

/// The parameter values of an affine, as reported by all linear transforms
pub fn affine_parameters(matrix: &Matrix) -> ParameterValues {
    ParameterValues::named("Affine")
        .with_natural("num_row", matrix.rows())
        .with_natural("num_col", matrix.cols())
        .with_series("elements", matrix.elements())
}

/// The `(scale, offset)` of a one dimensional affine transform
pub fn as_linear_1d(tr: &dyn MathTransform) -> Option<(f64, f64)> {
    if tr.source_dimensions() != 1 || tr.target_dimensions() != 1 {
        return None;
    }
    let m = tr.matrix()?;
    if !m.is_affine() {
        return None;
    }
    Some((m[(0, 0)], m[(0, 1)]))
}

/// The linear transform of a homogeneous matrix.
///
/// Identity matrices give an [`IdentityTransform`], 2×2 affines a
/// [`LinearTransform1D`], pure dimension copies a [`CopyTransform`], and
/// anything else a [`ProjectiveTransform`].
pub fn linear(matrix: &Matrix) -> Result<TransformRef, Error> {
    create(matrix, None)
}

/// As [`linear`], for a matrix computed as the inverse of `origin`. The
/// result remembers `origin` as its own inverse.
pub(crate) fn linear_inverse_of(matrix: &Matrix, origin: TransformRef) -> Result<TransformRef, Error> {
    create(matrix, Some(origin))
}

fn create(matrix: &Matrix, origin: Option<TransformRef>) -> Result<TransformRef, Error> {
    if matrix.rows() == 0 || matrix.cols() == 0 {
        return Err(Error::Matrix(String::from("empty matrix")));
    }
    if matrix.is_identity() {
        return Ok(IdentityTransform::create(matrix.rows() - 1));
    }
    let cell = || match &origin {
        Some(origin) => InverseCell::with_origin(origin.clone()),
        None => InverseCell::new(),
    };
    if matrix.rows() == 2 && matrix.cols() == 2 && matrix.is_affine() {
        let (scale, offset) = (matrix[(0, 0)], matrix[(0, 1)]);
        if scale == 0. {
            return Ok(ConstantTransform1D::create(offset));
        }
        return Ok(Arc::new(LinearTransform1D::with_cell(scale, offset, cell())));
    }
    if let Some(indices) = copy::copied_dimensions(matrix) {
        return Ok(Arc::new(CopyTransform::with_cell(
            matrix.cols() - 1,
            indices,
            cell(),
        )));
    }
    Ok(Arc::new(ProjectiveTransform::with_cell(matrix.clone(), cell())?))
}

// ----- T E S T S ------------------------------------------------------------------
