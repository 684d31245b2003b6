use super::check_dimension;
use super::MathTransform;
use crate::Error;

/// A position in an N-dimensional coordinate space
#[derive(Debug, Clone, PartialEq)]
pub struct DirectPosition {
    ordinates: Vec<f64>,
}

impl DirectPosition {
    /// A position at the origin
    pub fn new(dimension: usize) -> DirectPosition {
        DirectPosition {
            ordinates: vec![0.; dimension],
        }
    }

    pub fn dimension(&self) -> usize {
        self.ordinates.len()
    }

    pub fn ordinates(&self) -> &[f64] {
        &self.ordinates
    }

    pub fn ordinates_mut(&mut self) -> &mut [f64] {
        &mut self.ordinates
    }

    pub fn get(&self, index: usize) -> f64 {
        self.ordinates[index]
    }

    pub fn set(&mut self, index: usize, value: f64) {
        self.ordinates[index] = value;
    }
}

impl From<Vec<f64>> for DirectPosition {
    fn from(ordinates: Vec<f64>) -> Self {
        DirectPosition { ordinates }
    }
}

impl From<&[f64]> for DirectPosition {
    fn from(ordinates: &[f64]) -> Self {
        DirectPosition {
            ordinates: ordinates.to_vec(),
        }
    }
}

pub(crate) fn transform<T: MathTransform + ?Sized>(
    tr: &T,
    src: &DirectPosition,
    dst: Option<DirectPosition>,
) -> Result<DirectPosition, Error> {
    check_dimension(tr.name(), tr.source_dimensions(), src.dimension())?;
    let t = tr.target_dimensions();
    let mut dst = match dst {
        Some(mut dst) => {
            dst.ordinates.resize(t, 0.);
            dst
        }
        None => DirectPosition::new(t),
    };
    tr.transform_one(src.ordinates(), Some(dst.ordinates_mut()), false)?;
    Ok(dst)
}
