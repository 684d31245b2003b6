use crate::authoring::*;
use crate::linear::affine_parameters;
use crate::linear::linear_inverse_of;
use crate::linear::GAMUT;
use crate::matrix::Matrix;
use crate::parameter::OpParameter;
use crate::transform::batch::check_length;

/// The general case: a homogeneous matrix of any shape, with division by the
/// homogeneous ordinate when the matrix is not affine.
#[derive(Debug)]
pub struct ProjectiveTransform {
    matrix: Matrix,
    inverse: InverseCell,
    hash: HashCache,
}

impl ProjectiveTransform {
    pub fn new(matrix: Matrix) -> Result<ProjectiveTransform, Error> {
        ProjectiveTransform::with_cell(matrix, InverseCell::new())
    }

    pub(crate) fn with_cell(matrix: Matrix, inverse: InverseCell) -> Result<ProjectiveTransform, Error> {
        if matrix.rows() == 0 || matrix.cols() == 0 {
            return Err(Error::Matrix(String::from("empty matrix")));
        }
        Ok(ProjectiveTransform {
            matrix,
            inverse,
            hash: HashCache::new(),
        })
    }

    pub fn matrix_ref(&self) -> &Matrix {
        &self.matrix
    }

    // The homogeneous result of one point, in `buffer`, not yet divided.
    // Zero elements are skipped, so NaN in unused dimensions does not spread.
    fn multiply(&self, src: &[f64], buffer: &mut [f64]) {
        let s = self.matrix.cols() - 1;
        for (j, b) in buffer.iter_mut().enumerate() {
            let row = self.matrix.row(j);
            let mut sum = row[s];
            for i in 0..s {
                let e = row[i];
                if e != 0. {
                    sum += src[i] * e;
                }
            }
            *b = sum;
        }
    }

    fn apply(&self, src: &[f64], dst: &mut [f64], buffer: &mut [f64]) {
        let t = self.matrix.rows() - 1;
        self.multiply(src, buffer);
        let w = buffer[t];
        if w == 1. {
            dst[..t].copy_from_slice(&buffer[..t]);
            return;
        }
        for j in 0..t {
            dst[j] = buffer[j] / w;
        }
    }
}

impl MathTransform for ProjectiveTransform {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn name(&self) -> &'static str {
        "ProjectiveTransform"
    }
    fn source_dimensions(&self) -> usize {
        self.matrix.cols() - 1
    }
    fn target_dimensions(&self) -> usize {
        self.matrix.rows() - 1
    }
    fn is_identity(&self) -> bool {
        self.matrix.is_identity()
    }

    fn transform_one(
        &self,
        src: &[f64],
        dst: Option<&mut [f64]>,
        derivate: bool,
    ) -> Result<Option<Matrix>, Error> {
        let s = self.source_dimensions();
        let t = self.target_dimensions();
        let mut buffer = vec![0.; t + 1];
        self.multiply(src, &mut buffer);
        let w = buffer[t];

        let derivative = derivate.then(|| {
            // ∂(b_j/w)/∂x_i = (a_ji - y_j·a_wi) / w
            let mut m = Matrix::zeros(t, s);
            for j in 0..t {
                let y = buffer[j] / w;
                for i in 0..s {
                    m[(j, i)] = (self.matrix[(j, i)] - y * self.matrix[(t, i)]) / w;
                }
            }
            m
        });

        if let Some(dst) = dst {
            for j in 0..t {
                dst[j] = if w == 1. { buffer[j] } else { buffer[j] / w };
            }
        }
        Ok(derivative)
    }

    fn transform_pts(&self, src: &[f64], dst: &mut [f64], num_pts: usize) -> Result<(), Error> {
        let s = self.source_dimensions();
        let t = self.target_dimensions();
        check_length("source", num_pts * s, src.len())?;
        check_length("destination", num_pts * t, dst.len())?;
        let mut buffer = vec![0.; t + 1];
        for i in 0..num_pts {
            self.apply(
                &src[i * s..(i + 1) * s],
                &mut dst[i * t..(i + 1) * t],
                &mut buffer,
            );
        }
        Ok(())
    }

    fn inverse(self: Arc<Self>) -> Result<TransformRef, Error> {
        let origin: TransformRef = self.clone();
        self.inverse.get_or_init(|| {
            let inverse = self.matrix.inverse()?;
            linear_inverse_of(&inverse, origin)
        })
    }

    fn matrix(&self) -> Option<Matrix> {
        Some(self.matrix.clone())
    }

    fn parameter_descriptors(&self) -> Option<&'static [OpParameter]> {
        Some(&GAMUT)
    }

    fn parameters(&self) -> Option<ParameterValues> {
        Some(affine_parameters(&self.matrix))
    }

    fn hash_code(&self) -> u64 {
        self.hash
            .get_or_compute(|| crate::transform::compute_hash(self))
    }
}

// ----- T E S T S ------------------------------------------------------------------
