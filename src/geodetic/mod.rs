//! Transforms between geographic and geocentric coordinates, and datum
//! shifts in either space.
//!
//! Geographic coordinates are `(longitude, latitude [, height])`, in degrees
//! and metres. The kernels of the conversions work in radians, and are
//! wrapped in the unit conversion affines by their `create` functions.

mod geocentric;
mod geocentric_affine;
mod molodensky;

pub use geocentric::GeocentricInverse;
pub use geocentric::GeocentricTransform;
pub use geocentric_affine::BursaWolfParameters;
pub use geocentric_affine::GeocentricAffineTransform;
pub use geocentric_affine::RotationConvention;
pub use molodensky::MolodenskyTransform;
