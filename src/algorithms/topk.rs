use nalgebra::{DMatrix, DVector};

use crate::error::{RecError, Result};
use crate::utils::top_k_indices;

/// Scores one embedding against every item factor row and returns the K
/// highest-scoring item indices. Ties resolve in item-index order.
pub fn find_top_k(user: &DVector<f32>, item_factors: &DMatrix<f32>, k: usize) -> Result<Vec<usize>> {
    let num_items = item_factors.nrows();
    if k > num_items {
        return Err(RecError::TopKRange { k, num_items });
    }
    if user.len() != item_factors.ncols() {
        return Err(RecError::Solve(format!(
            "embedding has {} dimensions but item factors have {}",
            user.len(),
            item_factors.ncols()
        )));
    }

    let scores = item_factors * user;
    Ok(top_k_indices(scores.as_slice(), k))
}
