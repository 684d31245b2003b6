//! Dense, row-major matrices.
//!
//! Linear transforms are backed by a `(target+1) × (source+1)` matrix in
//! homogeneous form, derivatives are plain `target × source` Jacobians. Both
//! are represented by [`Matrix`].

use crate::Error;
use std::fmt;
use std::ops::Index;
use std::ops::IndexMut;

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    /// Row-major / C-ordered matrix data.
    data: Vec<f64>,
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    fn index(&self, index: (usize, usize)) -> &Self::Output {
        &self.data[index.0 * self.cols + index.1]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, index: (usize, usize)) -> &mut Self::Output {
        &mut self.data[index.0 * self.cols + index.1]
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..self.rows {
            let row: Vec<String> = self.row(r).iter().map(|v| v.to_string()).collect();
            writeln!(f, "[{}]", row.join(", "))?;
        }
        Ok(())
    }
}

// ----- C O N S T R U C T O R S ---------------------------------------------------

impl Matrix {
    /// Row-major data
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Matrix, Error> {
        if data.len() != rows * cols {
            return Err(Error::Matrix(format!(
                "{} elements given for a {rows}×{cols} matrix",
                data.len()
            )));
        }
        Ok(Matrix { rows, cols, data })
    }

    pub fn zeros(rows: usize, cols: usize) -> Matrix {
        Matrix {
            rows,
            cols,
            data: vec![0.; rows * cols],
        }
    }

    pub fn identity(size: usize) -> Matrix {
        let mut m = Matrix::zeros(size, size);
        for i in 0..size {
            m[(i, i)] = 1.;
        }
        m
    }

    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Matrix, Error> {
        let cols = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(Error::Matrix(String::from("rows of unequal length")));
            }
            data.extend_from_slice(row);
        }
        Matrix::new(rows.len(), cols, data)
    }

    /// The homogeneous matrix of `y = scale·x + offset`
    pub fn affine_1d(scale: f64, offset: f64) -> Matrix {
        Matrix {
            rows: 2,
            cols: 2,
            data: vec![scale, offset, 0., 1.],
        }
    }

    /// Square matrix with `values` on the diagonal
    pub fn from_diagonal(values: &[f64]) -> Matrix {
        let mut m = Matrix::zeros(values.len(), values.len());
        for (i, v) in values.iter().enumerate() {
            m[(i, i)] = *v;
        }
        m
    }

    /// Diagonal scaling of `factors.len()` dimensions, in homogeneous form
    pub fn scale(factors: &[f64]) -> Matrix {
        let mut m = Matrix::identity(factors.len() + 1);
        for (i, f) in factors.iter().enumerate() {
            m[(i, i)] = *f;
        }
        m
    }
}

// ----- A C C E S S O R S ---------------------------------------------------------

impl Matrix {
    pub fn rows(&self) -> usize {
        self.rows
    }
    pub fn cols(&self) -> usize {
        self.cols
    }
    pub fn row(&self, r: usize) -> &[f64] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }
    pub fn elements(&self) -> &[f64] {
        &self.data
    }
    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// True if the last row is `[0, …, 0, 1]`
    pub fn is_affine(&self) -> bool {
        if self.rows == 0 || self.cols == 0 {
            return false;
        }
        let last = self.row(self.rows - 1);
        last[..self.cols - 1].iter().all(|v| *v == 0.) && last[self.cols - 1] == 1.
    }

    pub fn is_identity(&self) -> bool {
        self.is_identity_within(0.)
    }

    pub fn is_identity_within(&self, tolerance: f64) -> bool {
        if !self.is_square() {
            return false;
        }
        for r in 0..self.rows {
            for c in 0..self.cols {
                let expected = if r == c { 1. } else { 0. };
                // Written so that NaN fails the test
                if !((self[(r, c)] - expected).abs() <= tolerance) {
                    return false;
                }
            }
        }
        true
    }

    /// Element-wise equality within an absolute tolerance
    pub fn approx_eq(&self, other: &Matrix, tolerance: f64) -> bool {
        self.rows == other.rows
            && self.cols == other.cols
            && self
                .data
                .iter()
                .zip(&other.data)
                .all(|(a, b)| a == b || (a - b).abs() <= tolerance || (a.is_nan() && b.is_nan()))
    }

    /// Largest absolute value among the finite elements
    pub fn max_abs(&self) -> f64 {
        self.data
            .iter()
            .filter(|v| v.is_finite())
            .fold(0., |m, v| m.max(v.abs()))
    }
}

// ----- A R I T H M E T I C -------------------------------------------------------

impl Matrix {
    /// The product `self × other`
    pub fn multiply(&self, other: &Matrix) -> Result<Matrix, Error> {
        if self.cols != other.rows {
            return Err(Error::Matrix(format!(
                "cannot multiply {}×{} by {}×{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        let mut result = Matrix::zeros(self.rows, other.cols);
        for r in 0..self.rows {
            for c in 0..other.cols {
                let mut sum = 0.;
                for k in 0..self.cols {
                    let a = self[(r, k)];
                    let b = other[(k, c)];
                    // Skip zeros, so NaN in unrelated dimensions does not spread
                    if a != 0. && b != 0. {
                        sum += a * b;
                    }
                }
                result[(r, c)] = sum;
            }
        }
        Ok(result)
    }

    /// Round elements lying within `tolerance` of an integer. Translation terms
    /// (last column) use a tolerance scaled by the magnitude of their row.
    pub fn round_near_integers(&mut self, tolerance: f64) {
        let cols = self.cols;
        for r in 0..self.rows {
            let magnitude = self.row(r)[..cols.saturating_sub(1)]
                .iter()
                .fold(1.0_f64, |m, v| m.max(v.abs()));
            for c in 0..cols {
                let eps = if c + 1 == cols {
                    tolerance * magnitude
                } else {
                    tolerance
                };
                let v = self[(r, c)];
                let rounded = v.round();
                if (v - rounded).abs() <= eps {
                    self[(r, c)] = rounded;
                }
            }
        }
    }

    /// Inverse of a square matrix, or of a non-square affine matrix.
    ///
    /// For an affine map dropping source dimensions (fewer rows than columns),
    /// the source dimensions not used by any target come back as NaN. For an
    /// affine map adding target dimensions, target dimensions linearly
    /// dependent on the others (e.g. constants) are ignored.
    pub fn inverse(&self) -> Result<Matrix, Error> {
        if self.is_square() {
            return self.invert_square();
        }
        if !self.is_affine() {
            return Err(Error::NonInvertible(String::from("non-square projective matrix")));
        }
        let tgt = self.rows - 1;
        let src = self.cols - 1;
        if tgt < src {
            self.invert_reducing(tgt, src)
        } else {
            self.invert_expanding(tgt, src)
        }
    }

    // Fewer target than source dimensions: drop source columns not used by any
    // target, invert, and return the dropped dimensions as NaN.
    fn invert_reducing(&self, tgt: usize, src: usize) -> Result<Matrix, Error> {
        let unused: Vec<usize> = (0..src)
            .filter(|&c| (0..tgt).all(|r| self[(r, c)] == 0.))
            .take(src - tgt)
            .collect();
        if unused.len() < src - tgt {
            return Err(Error::NonInvertible(String::from(
                "source dimensions are mixed into fewer target dimensions",
            )));
        }
        let kept: Vec<usize> = (0..=src).filter(|c| !unused.contains(c)).collect();
        let mut square = Matrix::zeros(tgt + 1, tgt + 1);
        for r in 0..=tgt {
            for (k, &c) in kept.iter().enumerate() {
                square[(r, k)] = self[(r, c)];
            }
        }
        let inv = square.invert_square()?;

        let mut result = Matrix::zeros(src + 1, tgt + 1);
        let mut k = 0;
        for r in 0..src {
            if unused.contains(&r) {
                result[(r, tgt)] = f64::NAN;
                continue;
            }
            for c in 0..=tgt {
                result[(r, c)] = inv[(k, c)];
            }
            k += 1;
        }
        result[(src, tgt)] = 1.;
        Ok(result)
    }

    // More target than source dimensions: select a maximal set of independent
    // target rows, invert those, and ignore the rest.
    fn invert_expanding(&self, tgt: usize, src: usize) -> Result<Matrix, Error> {
        let mut selected = Vec::<usize>::with_capacity(src);
        let mut basis = Vec::<Vec<f64>>::with_capacity(src);
        for r in 0..tgt {
            if selected.len() == src {
                break;
            }
            let mut v = self.row(r)[..src].to_vec();
            let norm = v.iter().fold(0., |m: f64, x| m.max(x.abs()));
            if norm == 0. || !norm.is_finite() {
                continue;
            }
            for b in &basis {
                let dot: f64 = v.iter().zip(b).map(|(x, y)| x * y).sum();
                for (x, y) in v.iter_mut().zip(b) {
                    *x -= dot * y;
                }
            }
            let residual = v.iter().map(|x| x * x).sum::<f64>().sqrt();
            if residual <= 1e-12 * norm {
                continue;
            }
            v.iter_mut().for_each(|x| *x /= residual);
            basis.push(v);
            selected.push(r);
        }
        if selected.len() < src {
            return Err(Error::NonInvertible(String::from(
                "target dimensions do not determine all source dimensions",
            )));
        }

        let mut square = Matrix::zeros(src + 1, src + 1);
        for (k, &r) in selected.iter().chain(std::iter::once(&tgt)).enumerate() {
            for c in 0..=src {
                square[(k, c)] = self[(r, c)];
            }
        }
        let inv = square.invert_square()?;

        let mut result = Matrix::zeros(src + 1, tgt + 1);
        for r in 0..=src {
            for (k, &c) in selected.iter().chain(std::iter::once(&tgt)).enumerate() {
                result[(r, c)] = inv[(r, k)];
            }
        }
        Ok(result)
    }

    // Gauss-Jordan elimination with partial pivoting
    fn invert_square(&self) -> Result<Matrix, Error> {
        let n = self.rows;
        let mut a = self.clone();
        let mut inv = Matrix::identity(n);
        for col in 0..n {
            let mut pivot = col;
            for r in col + 1..n {
                if a[(r, col)].abs() > a[(pivot, col)].abs() {
                    pivot = r;
                }
            }
            let p = a[(pivot, col)];
            if p == 0. || !p.is_finite() {
                return Err(Error::NonInvertible(String::from("singular matrix")));
            }
            if pivot != col {
                a.swap_rows(pivot, col);
                inv.swap_rows(pivot, col);
            }
            for c in 0..n {
                a[(col, c)] /= p;
                inv[(col, c)] /= p;
            }
            for r in 0..n {
                if r == col {
                    continue;
                }
                let factor = a[(r, col)];
                if factor == 0. {
                    continue;
                }
                for c in 0..n {
                    let da = a[(col, c)];
                    let di = inv[(col, c)];
                    a[(r, c)] -= factor * da;
                    inv[(r, c)] -= factor * di;
                }
            }
        }
        if inv.data.iter().any(|v| !v.is_finite()) {
            return Err(Error::NonInvertible(String::from("ill-conditioned matrix")));
        }
        Ok(inv)
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        for c in 0..self.cols {
            self.data.swap(a * self.cols + c, b * self.cols + c);
        }
    }
}

// ----- T E S T S ------------------------------------------------------------------
