use crate::error::{RecError, Result};
use crate::models::{InteractionRecord, SparseVector};

/// Decodes one serialized interaction record into a sparse vector.
///
/// Batching stacks sparse vectors and drops any side-channel metadata, so the
/// record key is smuggled through as a trailing `(key, 0.0)` carrier entry.
/// The remapper strips it back out after batching.
pub fn decode_record(line: &str, vocab_size: i64) -> Result<SparseVector> {
    let record: InteractionRecord =
        serde_json::from_str(line).map_err(|e| RecError::Decode(e.to_string()))?;
    decode(&record, vocab_size)
}

pub fn decode(record: &InteractionRecord, vocab_size: i64) -> Result<SparseVector> {
    if record.indices.len() != record.values.len() {
        return Err(RecError::Decode(format!(
            "record {} has {} indices but {} values",
            record.key,
            record.indices.len(),
            record.values.len()
        )));
    }
    if record.key < 0 {
        return Err(RecError::Decode(format!("negative key {}", record.key)));
    }

    let mut entries = Vec::with_capacity(record.indices.len() + 1);
    for (&index, &value) in record.indices.iter().zip(record.values.iter()) {
        if index < 0 || index >= vocab_size {
            return Err(RecError::Decode(format!(
                "record {} index {} out of range for vocab size {}",
                record.key, index, vocab_size
            )));
        }
        entries.push((index, value));
    }

    // Carrier entry, always last. Not data; its column is the key itself.
    entries.push((record.key, 0.0));

    Ok(SparseVector {
        entries,
        dim: vocab_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_carrier_after_data() {
        let record = InteractionRecord {
            key: 7,
            indices: vec![0, 3],
            values: vec![1.5, 2.0],
        };
        let decoded = decode(&record, 4).unwrap();
        assert_eq!(decoded.dim, 4);
        assert_eq!(decoded.entries, vec![(0, 1.5), (3, 2.0), (7, 0.0)]);
    }

    #[test]
    fn empty_record_still_carries_key() {
        let record = InteractionRecord {
            key: 2,
            indices: vec![],
            values: vec![],
        };
        let decoded = decode(&record, 4).unwrap();
        assert_eq!(decoded.entries, vec![(2, 0.0)]);
    }

    #[test]
    fn data_portion_round_trips() {
        let record = InteractionRecord {
            key: 1,
            indices: vec![2, 0, 3],
            values: vec![0.5, 4.0, 1.0],
        };
        let decoded = decode(&record, 4).unwrap();
        let data = &decoded.entries[..decoded.entries.len() - 1];
        let indices: Vec<i64> = data.iter().map(|&(i, _)| i).collect();
        let values: Vec<f32> = data.iter().map(|&(_, v)| v).collect();
        assert_eq!(indices, record.indices);
        assert_eq!(values, record.values);
    }

    #[test]
    fn rejects_length_mismatch() {
        let record = InteractionRecord {
            key: 0,
            indices: vec![1, 2],
            values: vec![1.0],
        };
        assert!(matches!(decode(&record, 4), Err(RecError::Decode(_))));
    }

    #[test]
    fn rejects_out_of_range_index() {
        let record = InteractionRecord {
            key: 0,
            indices: vec![4],
            values: vec![1.0],
        };
        assert!(matches!(decode(&record, 4), Err(RecError::Decode(_))));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            decode_record("{\"key\": 1,", 4),
            Err(RecError::Decode(_))
        ));
    }
}
