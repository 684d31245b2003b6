//! One dimensional exponential and logarithmic transforms.
//!
//! The two are each other's inverse, and fold with neighboring one
//! dimensional affines into a single exponential, logarithmic or linear
//! transform whenever the algebra allows it.

mod exponential;
mod logarithmic;

pub use exponential::ExponentialTransform1D;
pub use logarithmic::LogarithmicTransform1D;
