use crate::error::{RecError, Result};
use crate::models::{SparseMatrix, SparseVector};

/// Stacks N decoded vectors into one batched sparse matrix whose first
/// coordinate is the batch-local position 0..N-1. Per-vector entry order is
/// preserved, so every position's carrier stays the last entry of its row.
pub fn batch(vectors: &[SparseVector], vocab_size: i64) -> SparseMatrix {
    let mut indices = Vec::new();
    let mut values = Vec::new();
    for (pos, vector) in vectors.iter().enumerate() {
        for &(col, val) in &vector.entries {
            indices.push((pos as i64, col));
            values.push(val);
        }
    }
    SparseMatrix {
        indices,
        values,
        shape: (vectors.len() as i64, vocab_size),
    }
}

/// Undoes the contiguous numbering introduced by batching: restores each
/// row's true matrix index from its carrier entry and drops the carriers.
///
/// Works on per-position entry counts. Each position contributed its genuine
/// entries followed by exactly one carrier, so with `size[i]` = count − 1 the
/// carrier of position `i` sits at global offset `cumsum(size)[i] + i`. The
/// carrier's second coordinate is the true key, tiled across that position's
/// genuine entries. An empty row (carrier only) tiles zero times and simply
/// vanishes from the output; that is not an error.
pub fn remap_keys(batched: &SparseMatrix, num_rows: i64) -> Result<SparseMatrix> {
    let n = batched.shape.0 as usize;

    // Group by batch position and count entries per position.
    let mut counts = vec![0usize; n];
    for &(pos, _) in &batched.indices {
        let pos = pos as usize;
        if pos >= n {
            return Err(RecError::Decode(format!(
                "batch position {} outside batch of {}",
                pos, n
            )));
        }
        counts[pos] += 1;
    }

    // Genuine data count per position; the carrier contributes the extra one.
    let mut size = Vec::with_capacity(n);
    for (pos, &count) in counts.iter().enumerate() {
        if count == 0 {
            return Err(RecError::Decode(format!(
                "batch position {} has no carrier entry",
                pos
            )));
        }
        size.push(count - 1);
    }

    // Carrier offsets: inclusive cumulative sum of sizes plus the position
    // index. Position 0 goes through the same arithmetic as every other.
    let mut carrier_offsets = Vec::with_capacity(n);
    let mut cum = 0usize;
    for (pos, &sz) in size.iter().enumerate() {
        cum += sz;
        carrier_offsets.push(cum + pos);
    }

    // The smuggled keys, read back out of the carrier entries. A key is a
    // row index of the full matrix, so it must land within num_rows.
    let keys: Vec<i64> = carrier_offsets
        .iter()
        .map(|&offset| batched.indices[offset].1)
        .collect();
    for &key in &keys {
        if key < 0 || key >= num_rows {
            return Err(RecError::Decode(format!(
                "carrier key {} outside matrix of {} rows",
                key, num_rows
            )));
        }
    }

    // Keep genuine entries only, tiling each position's key across them.
    let total: usize = size.iter().sum();
    let mut indices = Vec::with_capacity(total);
    let mut values = Vec::with_capacity(total);
    let mut next_carrier = 0usize;
    for (global, (&(pos, col), &val)) in batched.indices.iter().zip(&batched.values).enumerate() {
        if next_carrier < n && global == carrier_offsets[next_carrier] {
            next_carrier += 1;
            continue;
        }
        indices.push((keys[pos as usize], col));
        values.push(val);
    }

    Ok(SparseMatrix {
        indices,
        values,
        shape: (num_rows, batched.shape.1),
    })
}
