use nalgebra::DMatrix;
use rand::Rng;

pub fn xavier_uniform(size: usize) -> Vec<f32> {
    let limit = (6.0 / size as f32).sqrt();
    let mut rng = rand::thread_rng();
    (0..size)
        .map(|_| rng.gen_range(-limit..limit))
        .collect()
}

/// Fresh (rows x dim) factor matrix, one Xavier-initialized embedding per row.
pub fn factor_matrix(rows: usize, dim: usize) -> DMatrix<f32> {
    let mut m = DMatrix::zeros(rows, dim);
    for i in 0..rows {
        let embedding = xavier_uniform(dim);
        for (j, value) in embedding.into_iter().enumerate() {
            m[(i, j)] = value;
        }
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xavier_uniform_stays_in_range() {
        let weights = xavier_uniform(100);
        assert_eq!(weights.len(), 100);
        let limit = (6.0 / 100.0_f32).sqrt();
        for &weight in &weights {
            assert!(weight >= -limit && weight <= limit);
        }
    }

    #[test]
    fn factor_matrix_has_requested_shape() {
        let m = factor_matrix(5, 8);
        assert_eq!(m.nrows(), 5);
        assert_eq!(m.ncols(), 8);
    }
}
