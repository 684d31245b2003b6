//! *Composable coordinate transforms*.
//!
//! A family of mathematical transforms over N-dimensional coordinate arrays:
//! affine and projective maps, 1-D linear, logarithmic and exponential maps,
//! geographic/geocentric conversion, Molodensky datum shifts, grid based
//! shifts, pass-through of dimension subsets, and concatenation of all of
//! the above.
//!
//! All transforms implement the [`MathTransform`](crate::transform::MathTransform)
//! trait, and are handed around as shared [`TransformRef`]s. Chains are built
//! with [`ConcatenatedTransform::create`](crate::concatenated::ConcatenatedTransform::create),
//! which simplifies the chain algebraically whenever possible:
//!
//! ```rust
//! use mathtransform::prelude::*;
//! # fn main() -> Result<(), Error> {
//! let a = LinearTransform1D::create(2.0, 3.0);
//! let b = a.clone().inverse()?;
//! let chain = ConcatenatedTransform::create(a, b)?;
//! assert!(chain.is_identity());
//! # Ok(())}
//! ```

pub mod concatenated;
pub mod definition;
pub mod ellipsoid;
pub mod formatting;
pub mod geodetic;
pub mod grid;
pub mod linear;
pub mod matrix;
pub mod nonlinear;
pub mod parameter;
pub mod passthrough;
pub mod transform;

use thiserror::Error;

/// The bread-and-butter, shrink-wrapped and ready to use
pub mod prelude {
    pub use crate::concatenated::ConcatenatedTransform;
    pub use crate::ellipsoid::Ellipsoid;
    pub use crate::geodetic::BursaWolfParameters;
    pub use crate::geodetic::GeocentricAffineTransform;
    pub use crate::geodetic::GeocentricTransform;
    pub use crate::geodetic::MolodenskyTransform;
    pub use crate::geodetic::RotationConvention;
    pub use crate::grid::GridData;
    pub use crate::grid::GridTransform;
    pub use crate::grid::GridType;
    pub use crate::linear::linear;
    pub use crate::linear::ConstantTransform1D;
    pub use crate::linear::CopyTransform;
    pub use crate::linear::IdentityTransform;
    pub use crate::linear::LinearTransform1D;
    pub use crate::linear::ProjectiveTransform;
    pub use crate::matrix::Matrix;
    pub use crate::nonlinear::ExponentialTransform1D;
    pub use crate::nonlinear::LogarithmicTransform1D;
    pub use crate::parameter::OpParameter;
    pub use crate::parameter::ParameterValues;
    pub use crate::passthrough::DimensionFilter;
    pub use crate::passthrough::PassThroughTransform;
    pub use crate::transform::shape::Path;
    pub use crate::transform::shape::PathSegment;
    pub use crate::transform::shape::Point2D;
    pub use crate::transform::ComparisonMode;
    pub use crate::transform::DirectPosition;
    pub use crate::transform::IterationStrategy;
    pub use crate::transform::MathTransform;
    pub use crate::Error;
    pub use crate::TransformRef;
}

/// Preamble for transform implementations (built-in or user defined)
pub mod authoring {
    pub use crate::prelude::*;

    pub use crate::transform::roll_longitude;
    pub use crate::transform::HashCache;
    pub use crate::transform::InverseCell;
    pub use crate::transform::MAXIMUM_BUFFER_SIZE;
    pub use crate::transform::MAXIMUM_FAILURES;

    pub use log::debug;
    pub use log::trace;
    pub use log::warn;

    pub use std::any::Any;
    pub use std::collections::BTreeMap;
    pub use std::sync::Arc;
}

/// A shared, immutable transform. Transforms are pure functions of their
/// coordinates, so they are freely shared between threads.
pub type TransformRef = std::sync::Arc<dyn transform::MathTransform>;

/// Tolerance used when deciding whether a computed affine is the identity.
pub const IDENTITY_TOLERANCE: f64 = 1e-9;

/// The errors of the transform engine
#[derive(Error, Debug)]
pub enum Error {
    #[error("error: {0}")]
    General(&'static str),

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("mismatched dimension for {0}: expected {1}, found {2}")]
    MismatchedDimension(String, usize, usize),

    #[error("{0} is not invertible")]
    NonInvertible(String),

    #[error("no convergence after {0} iterations at ({1}, {2})")]
    NoConvergence(usize, f64, f64),

    #[error("cannot transform point: {0}")]
    Transform(String),

    /// A batch transform completed, but some points could not be transformed.
    /// All destination ordinates were written, the failed ones as NaN.
    #[error("{failures} point(s) could not be transformed, first failure: {first}")]
    Partial {
        first: Box<Error>,
        suppressed: Vec<Error>,
        failures: usize,
    },

    #[error("operator {0} not found{1}")]
    NotFound(String, String),

    #[error("missing required parameter {0}")]
    MissingParam(String),

    #[error("malformed value for parameter {0}: {1}")]
    BadParam(String, String),

    #[error("invalid matrix: {0}")]
    Matrix(String),

    #[error("unknown error")]
    Unknown,
}

impl Error {
    /// True if the error signals that every destination ordinate was written
    /// (possibly as NaN), i.e. the batch operation ran to completion.
    pub fn is_partial(&self) -> bool {
        matches!(self, Error::Partial { .. })
    }

    /// Fold a later batch outcome into an earlier one. Used when a batch is
    /// processed in chunks or stages, and partial failures are deferred.
    pub(crate) fn merge_partial(self, later: Error) -> Error {
        match (self, later) {
            (
                Error::Partial {
                    first,
                    mut suppressed,
                    failures,
                },
                Error::Partial {
                    first: f2,
                    suppressed: s2,
                    failures: n2,
                },
            ) => {
                suppressed.push(*f2);
                suppressed.extend(s2);
                Error::Partial {
                    first,
                    suppressed,
                    failures: failures + n2,
                }
            }
            (earlier, _) => earlier,
        }
    }
}

/// Literature, that has been useful in designing and implementing this library.
pub enum Bibliography {
    /// B.R. Bowring (1976): *Transformation from spatial to geographical coordinates*.
    /// Survey Review 23(181), pp. 323–327.
    Bow76,

    /// R.E.Deakin, 2004: The Standard and Abridged Molodensky
    /// Coordinate Transformation Formulae.
    /// URL http://www.mygeodesy.id.au/documents/Molodensky%20V2.pdf
    Dea04,

    /// OGP Publication 373-7-2 – Geomatics Guidance Note, number 7, part 2.
    Ogp7p2,

    /// R.E. Toms (1996): *An improved algorithm for geocentric to geodetic
    /// coordinate conversion*. Lawrence Livermore National Laboratory, UCRL-JC-123138.
    Tom96,
}
