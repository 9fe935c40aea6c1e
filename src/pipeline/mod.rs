pub mod decoder;
pub mod remap;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::Config;
use crate::error::{RecError, Result};
use crate::models::{SparseMatrix, SparseVector};

pub use decoder::{decode, decode_record};
pub use remap::{batch, remap_keys};

/// Dataset traversal mode: `Train` cycles the input files indefinitely,
/// `Eval` makes exactly one pass and then signals end-of-input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

/// Streams one side of the interaction matrix: decode, batch, remap.
pub struct RecordStream {
    files: Vec<PathBuf>,
    mode: Mode,
    batch_size: usize,
    vocab_size: i64,
    num_rows: i64,
    file_pos: usize,
    reader: Option<BufReader<File>>,
    exhausted: bool,
    files_since_line: usize,
}

fn files_matching(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(prefix) && entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

impl RecordStream {
    pub fn open(
        input_path: &Path,
        prefix: &str,
        mode: Mode,
        batch_size: usize,
        vocab_size: i64,
        num_rows: i64,
    ) -> Result<Self> {
        let files = files_matching(input_path, prefix)?;
        if files.is_empty() {
            return Err(RecError::Decode(format!(
                "no input files matching {}* under {}",
                prefix,
                input_path.display()
            )));
        }
        info!(
            "opened {} record file(s) matching {}* in {:?} mode",
            files.len(),
            prefix,
            mode
        );
        Ok(Self {
            files,
            mode,
            batch_size,
            vocab_size,
            num_rows,
            file_pos: 0,
            reader: None,
            exhausted: false,
            files_since_line: 0,
        })
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            if self.exhausted {
                return Ok(None);
            }
            if self.reader.is_none() {
                if self.file_pos >= self.files.len() {
                    match self.mode {
                        Mode::Train => self.file_pos = 0,
                        Mode::Eval => {
                            self.exhausted = true;
                            return Ok(None);
                        }
                    }
                }
                let file = File::open(&self.files[self.file_pos])?;
                self.reader = Some(BufReader::new(file));
            }
            let mut line = String::new();
            let read = self
                .reader
                .as_mut()
                .ok_or_else(|| RecError::Decode("record stream has no open file".to_string()))?
                .read_line(&mut line)?;
            if read == 0 {
                self.reader = None;
                self.file_pos += 1;
                self.files_since_line += 1;
                // A full cycle of files without a single record would spin
                // forever in Train mode.
                if self.files_since_line > self.files.len() {
                    return Err(RecError::Decode(
                        "record files contain no records".to_string(),
                    ));
                }
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }
            self.files_since_line = 0;
            return Ok(Some(line));
        }
    }

    /// Next batch, already remapped to true keys. The final batch of an Eval
    /// pass may be short; `None` signals end-of-input (Eval only).
    pub fn next_batch(&mut self) -> Result<Option<SparseMatrix>> {
        let mut vectors: Vec<SparseVector> = Vec::with_capacity(self.batch_size);
        while vectors.len() < self.batch_size {
            match self.next_line()? {
                Some(line) => vectors.push(decode_record(&line, self.vocab_size)?),
                None => break,
            }
        }
        if vectors.is_empty() {
            return Ok(None);
        }
        let batched = batch(&vectors, self.vocab_size);
        remap_keys(&batched, self.num_rows).map(Some)
    }
}

/// Paired row/column streams feeding the factorization engine. Each step is
/// one `(row_matrix, col_matrix)` pair passed through decode, batch, remap.
pub struct DatasetPipeline {
    pub rows: RecordStream,
    pub cols: RecordStream,
}

impl DatasetPipeline {
    pub const ROWS_PREFIX: &'static str = "items_for_user";
    pub const COLS_PREFIX: &'static str = "users_for_item";

    pub fn open(config: &Config, mode: Mode) -> Result<Self> {
        let model = &config.model;
        let rows = RecordStream::open(
            &model.input_path,
            Self::ROWS_PREFIX,
            mode,
            config.training.batch_size,
            model.nitems as i64,
            model.nusers as i64,
        )?;
        let cols = RecordStream::open(
            &model.input_path,
            Self::COLS_PREFIX,
            mode,
            config.training.batch_size,
            model.nusers as i64,
            model.nitems as i64,
        )?;
        Ok(Self { rows, cols })
    }

    /// One paired step. Ends as soon as either side is exhausted (Eval); in
    /// Train mode both sides cycle and never end.
    pub fn next_step(&mut self) -> Result<Option<(SparseMatrix, SparseMatrix)>> {
        match (self.rows.next_batch()?, self.cols.next_batch()?) {
            (Some(rows), Some(cols)) => Ok(Some((rows, cols))),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_records(dir: &Path, name: &str, records: &[(i64, Vec<i64>, Vec<f32>)]) {
        let mut file = File::create(dir.join(name)).unwrap();
        for (key, indices, values) in records {
            let record = crate::models::InteractionRecord {
                key: *key,
                indices: indices.clone(),
                values: values.clone(),
            };
            writeln!(file, "{}", serde_json::to_string(&record).unwrap()).unwrap();
        }
    }

    #[test]
    fn eval_mode_is_single_pass_with_short_final_batch() {
        let dir = tempfile::tempdir().unwrap();
        write_records(
            dir.path(),
            "items_for_user-00000",
            &[
                (0, vec![1], vec![1.0]),
                (1, vec![0, 2], vec![2.0, 3.0]),
                (2, vec![], vec![]),
            ],
        );

        let mut stream = RecordStream::open(dir.path(), "items_for_user", Mode::Eval, 2, 3, 3)
            .unwrap();

        let first = stream.next_batch().unwrap().unwrap();
        assert_eq!(first.indices, vec![(0, 1), (1, 0), (1, 2)]);

        // Final batch holds the single remaining record, an empty row.
        let second = stream.next_batch().unwrap().unwrap();
        assert_eq!(second.nnz(), 0);
        assert_eq!(second.shape, (3, 3));

        assert!(stream.next_batch().unwrap().is_none());
        assert!(stream.next_batch().unwrap().is_none());
    }

    #[test]
    fn train_mode_repeats_indefinitely() {
        let dir = tempfile::tempdir().unwrap();
        write_records(
            dir.path(),
            "items_for_user-00000",
            &[(0, vec![0], vec![1.0]), (1, vec![1], vec![2.0])],
        );

        let mut stream = RecordStream::open(dir.path(), "items_for_user", Mode::Train, 2, 2, 2)
            .unwrap();

        // Far more batches than one pass over the two records could give.
        for _ in 0..5 {
            let batch = stream.next_batch().unwrap().unwrap();
            assert_eq!(batch.nnz(), 2);
        }
    }

    #[test]
    fn spans_multiple_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_records(dir.path(), "items_for_user-00000", &[(0, vec![0], vec![1.0])]);
        write_records(dir.path(), "items_for_user-00001", &[(1, vec![1], vec![2.0])]);
        write_records(dir.path(), "unrelated.txt", &[(9, vec![0], vec![9.0])]);

        let mut stream = RecordStream::open(dir.path(), "items_for_user", Mode::Eval, 4, 2, 2)
            .unwrap();
        let batch = stream.next_batch().unwrap().unwrap();
        assert_eq!(batch.indices, vec![(0, 0), (1, 1)]);
        assert!(stream.next_batch().unwrap().is_none());
    }

    #[test]
    fn missing_files_fail_to_open() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RecordStream::open(dir.path(), "items_for_user", Mode::Eval, 2, 3, 3).is_err());
    }

    #[test]
    fn malformed_record_aborts_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = File::create(dir.path().join("items_for_user-00000")).unwrap();
        writeln!(file, "{{\"key\": 0, \"indices\": [1, 2], \"values\": [1.0]}}").unwrap();

        let mut stream = RecordStream::open(dir.path(), "items_for_user", Mode::Eval, 2, 3, 3)
            .unwrap();
        assert!(stream.next_batch().is_err());
    }
}
