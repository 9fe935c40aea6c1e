use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use std::collections::HashMap;
use tracing::info;

use crate::algorithms::initializer;
use crate::error::{RecError, Result};
use crate::models::{FactorSet, ProjectionInput, SparseMatrix};

/// Consumes the two sparse input matrices and produces dense factor
/// matrices; also projects a single fresh row or column onto the trained
/// factors without retraining.
#[async_trait::async_trait]
pub trait FactorizationEngine: Send + Sync {
    async fn factorize(&self, rows: &SparseMatrix, cols: &SparseMatrix) -> Result<FactorSet>;
    async fn project(&self, input: &ProjectionInput, factors: &FactorSet) -> Result<Vec<f32>>;
}

/// Weighted alternating least squares over observed entries. Each sweep
/// refits one side against the other via ridge-regularized normal equations.
pub struct WalsEngine {
    n_embeds: usize,
    sweeps: usize,
    regularization: f32,
}

impl WalsEngine {
    pub fn new(n_embeds: usize, sweeps: usize, regularization: f32) -> Self {
        Self {
            n_embeds,
            sweeps,
            regularization,
        }
    }

    fn group_by_row(matrix: &SparseMatrix) -> HashMap<i64, Vec<(i64, f32)>> {
        let mut grouped: HashMap<i64, Vec<(i64, f32)>> = HashMap::new();
        for (&(row, col), &val) in matrix.indices.iter().zip(&matrix.values) {
            grouped.entry(row).or_default().push((col, val));
        }
        grouped
    }

    /// Solves (Y_S^T Y_S + reg I) x = Y_S^T r over the observed set S.
    fn solve_row(
        entries: &[(i64, f32)],
        fixed: &DMatrix<f32>,
        regularization: f32,
    ) -> Result<DVector<f32>> {
        let k = fixed.ncols();
        let mut a = DMatrix::<f32>::identity(k, k) * regularization;
        let mut b = DVector::<f32>::zeros(k);
        for &(col, val) in entries {
            if col < 0 || col as usize >= fixed.nrows() {
                return Err(RecError::Solve(format!(
                    "entry index {} outside factor matrix of {} rows",
                    col,
                    fixed.nrows()
                )));
            }
            let y = fixed.row(col as usize).transpose();
            a += &y * y.transpose();
            b += y * val;
        }
        a.cholesky()
            .map(|chol| chol.solve(&b))
            .ok_or_else(|| RecError::Solve("normal equations are not positive definite".to_string()))
    }

    fn update_side(
        grouped: &HashMap<i64, Vec<(i64, f32)>>,
        fixed: &DMatrix<f32>,
        target: &mut DMatrix<f32>,
        regularization: f32,
    ) -> Result<()> {
        let solved: Vec<(i64, DVector<f32>)> = grouped
            .par_iter()
            .map(|(&row, entries)| {
                Self::solve_row(entries, fixed, regularization).map(|x| (row, x))
            })
            .collect::<Result<Vec<_>>>()?;

        for (row, x) in solved {
            if row < 0 || row as usize >= target.nrows() {
                return Err(RecError::Solve(format!(
                    "row key {} outside factor matrix of {} rows",
                    row,
                    target.nrows()
                )));
            }
            target.set_row(row as usize, &x.transpose());
        }
        Ok(())
    }

    /// Root mean squared reconstruction error over the observed entries.
    pub fn rmse(rows: &SparseMatrix, factors: &FactorSet) -> f32 {
        if rows.nnz() == 0 {
            return 0.0;
        }
        let mut sum = 0.0f64;
        for (&(u, i), &val) in rows.indices.iter().zip(&rows.values) {
            let predicted = factors
                .row_factors
                .row(u as usize)
                .dot(&factors.col_factors.row(i as usize));
            let err = (val - predicted) as f64;
            sum += err * err;
        }
        (sum / rows.nnz() as f64).sqrt() as f32
    }
}

#[async_trait::async_trait]
impl FactorizationEngine for WalsEngine {
    async fn factorize(&self, rows: &SparseMatrix, cols: &SparseMatrix) -> Result<FactorSet> {
        let (nusers, nitems) = (rows.shape.0 as usize, rows.shape.1 as usize);
        if cols.shape != (nitems as i64, nusers as i64) {
            return Err(RecError::Solve(format!(
                "row shape {:?} and column shape {:?} disagree",
                rows.shape, cols.shape
            )));
        }

        let mut factors = FactorSet {
            row_factors: initializer::factor_matrix(nusers, self.n_embeds),
            col_factors: initializer::factor_matrix(nitems, self.n_embeds),
        };

        let by_user = Self::group_by_row(rows);
        let by_item = Self::group_by_row(cols);

        for sweep in 0..self.sweeps {
            Self::update_side(
                &by_user,
                &factors.col_factors,
                &mut factors.row_factors,
                self.regularization,
            )?;
            Self::update_side(
                &by_item,
                &factors.row_factors,
                &mut factors.col_factors,
                self.regularization,
            )?;
            info!(
                "sweep {}/{}: train rmse {:.6}",
                sweep + 1,
                self.sweeps,
                Self::rmse(rows, &factors)
            );
        }

        Ok(factors)
    }

    async fn project(&self, input: &ProjectionInput, factors: &FactorSet) -> Result<Vec<f32>> {
        let (matrix, fixed) = if input.project_row {
            (&input.input_rows, &factors.col_factors)
        } else {
            (&input.input_cols, &factors.row_factors)
        };

        // The projection input holds a single logical row; every entry
        // shares its key, so only the second coordinates matter here.
        let entries: Vec<(i64, f32)> = matrix
            .indices
            .iter()
            .zip(&matrix.values)
            .map(|(&(_, col), &val)| (col, val))
            .collect();
        if entries.is_empty() {
            return Err(RecError::Solve("projection input has no entries".to_string()));
        }

        let x = Self::solve_row(&entries, fixed, self.regularization)?;
        Ok(x.iter().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense_as_sparse(dense: &[&[f32]]) -> (SparseMatrix, SparseMatrix) {
        let nusers = dense.len() as i64;
        let nitems = dense[0].len() as i64;
        let mut rows = SparseMatrix::empty((nusers, nitems));
        let mut cols = SparseMatrix::empty((nitems, nusers));
        for (u, row) in dense.iter().enumerate() {
            for (i, &val) in row.iter().enumerate() {
                if val != 0.0 {
                    rows.indices.push((u as i64, i as i64));
                    rows.values.push(val);
                    cols.indices.push((i as i64, u as i64));
                    cols.values.push(val);
                }
            }
        }
        (rows, cols)
    }

    #[tokio::test]
    async fn factorize_fits_a_low_rank_matrix() {
        // Rank-1 matrix: outer product of [1,2,3] and [1,2,1,3].
        let dense: Vec<Vec<f32>> = [1.0, 2.0, 3.0]
            .iter()
            .map(|&a| [1.0, 2.0, 1.0, 3.0].iter().map(|&b| a * b).collect())
            .collect();
        let views: Vec<&[f32]> = dense.iter().map(|r| r.as_slice()).collect();
        let (rows, cols) = dense_as_sparse(&views);

        let engine = WalsEngine::new(4, 20, 0.01);
        let factors = engine.factorize(&rows, &cols).await.unwrap();

        assert_eq!(factors.num_users(), 3);
        assert_eq!(factors.num_items(), 4);
        assert!(WalsEngine::rmse(&rows, &factors) < 0.1);
    }

    #[tokio::test]
    async fn factorize_rejects_mismatched_shapes() {
        let rows = SparseMatrix::empty((3, 4));
        let cols = SparseMatrix::empty((3, 4));
        let engine = WalsEngine::new(2, 1, 0.01);
        assert!(engine.factorize(&rows, &cols).await.is_err());
    }

    #[tokio::test]
    async fn projection_recovers_an_existing_row() {
        let dense: Vec<Vec<f32>> = [1.0, 2.0, 3.0]
            .iter()
            .map(|&a| [1.0, 2.0, 1.0, 3.0].iter().map(|&b| a * b).collect())
            .collect();
        let views: Vec<&[f32]> = dense.iter().map(|r| r.as_slice()).collect();
        let (rows, cols) = dense_as_sparse(&views);

        let engine = WalsEngine::new(4, 20, 0.01);
        let factors = engine.factorize(&rows, &cols).await.unwrap();

        // Project user 1's own interaction row; the embedding should score
        // item 3 (their strongest rating) above item 0.
        let mut input_rows = SparseMatrix::empty((3, 4));
        for (i, &val) in dense[1].iter().enumerate() {
            input_rows.indices.push((1, i as i64));
            input_rows.values.push(val);
        }
        let input = ProjectionInput {
            input_rows,
            input_cols: SparseMatrix::empty((3, 4)),
            project_row: true,
        };
        let embedding = engine.project(&input, &factors).await.unwrap();
        assert_eq!(embedding.len(), 4);

        let emb = DVector::from_vec(embedding);
        let score_item3 = factors.col_factors.row(3).transpose().dot(&emb);
        let score_item0 = factors.col_factors.row(0).transpose().dot(&emb);
        assert!(score_item3 > score_item0);
    }

    #[tokio::test]
    async fn projection_requires_entries() {
        let engine = WalsEngine::new(2, 1, 0.01);
        let factors = FactorSet {
            row_factors: DMatrix::zeros(2, 2),
            col_factors: DMatrix::zeros(2, 2),
        };
        let input = ProjectionInput {
            input_rows: SparseMatrix::empty((2, 2)),
            input_cols: SparseMatrix::empty((2, 2)),
            project_row: true,
        };
        assert!(engine.project(&input, &factors).await.is_err());
    }
}
