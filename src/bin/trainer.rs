use anyhow::Result;
use clap::Parser;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use walsrec::algorithms::{FactorizationEngine, WalsEngine};
use walsrec::models::{Checkpoint, SparseMatrix};
use walsrec::pipeline::{DatasetPipeline, Mode};
use walsrec::services::inference::BatchInferenceDriver;
use walsrec::vocab::Vocabulary;
use walsrec::{init_tracing, Config, CHECKPOINT_FILE};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Merges one remapped batch into a (row, col) -> value accumulator. Train
/// mode revisits records across epochs; later sightings overwrite.
fn merge(acc: &mut HashMap<(i64, i64), f32>, matrix: &SparseMatrix) {
    for (&index, &value) in matrix.indices.iter().zip(&matrix.values) {
        acc.insert(index, value);
    }
}

fn assemble(acc: HashMap<(i64, i64), f32>, shape: (i64, i64)) -> SparseMatrix {
    let mut entries: Vec<((i64, i64), f32)> = acc.into_iter().collect();
    entries.sort_by_key(|&(index, _)| index);
    let (indices, values) = entries.into_iter().unzip();
    SparseMatrix {
        indices,
        values,
        shape,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    std::env::set_var("RUST_LOG", &args.log_level);
    init_tracing().await;

    info!("starting walsrec trainer");

    let config = if std::path::Path::new(&args.config).exists() {
        Config::from_file(&args.config)?
    } else {
        info!("config file not found, using default configuration");
        Config::default()
    };

    let (train_steps, steps_in_epoch) = config.train_steps();
    info!(
        "will train for {} steps, {} steps per epoch",
        train_steps, steps_in_epoch
    );

    let nusers = config.model.nusers as i64;
    let nitems = config.model.nitems as i64;

    // Stream the training input: decode, batch, remap, and fold the batches
    // into the two full input matrices for the solver.
    let mut train = DatasetPipeline::open(&config, Mode::Train)?;
    let mut row_acc: HashMap<(i64, i64), f32> = HashMap::new();
    let mut col_acc: HashMap<(i64, i64), f32> = HashMap::new();
    for step in 0..train_steps {
        match train.next_step()? {
            Some((rows, cols)) => {
                merge(&mut row_acc, &rows);
                merge(&mut col_acc, &cols);
            }
            None => {
                info!("training input exhausted after {} steps", step);
                break;
            }
        }
    }
    let input_rows = assemble(row_acc, (nusers, nitems));
    let input_cols = assemble(col_acc, (nitems, nusers));
    info!(
        "assembled {} row entries and {} column entries",
        input_rows.nnz(),
        input_cols.nnz()
    );

    let engine = WalsEngine::new(
        config.model.n_embeds,
        config.training.num_epochs,
        config.training.regularization,
    );
    let factors = engine.factorize(&input_rows, &input_cols).await?;

    std::fs::create_dir_all(&config.model.output_dir)?;
    let checkpoint = Checkpoint::from_factors(&factors);
    let checkpoint_path = config.model.output_dir.join(CHECKPOINT_FILE);
    checkpoint.save(&checkpoint_path)?;
    info!(
        "saved checkpoint {} to {}",
        checkpoint.version,
        checkpoint_path.display()
    );

    // One evaluation pass over the same records against the trained factors.
    let mut eval = DatasetPipeline::open(&config, Mode::Eval)?;
    let mut eval_acc: HashMap<(i64, i64), f32> = HashMap::new();
    while let Some((rows, _)) = eval.next_step()? {
        merge(&mut eval_acc, &rows);
    }
    let eval_rows = assemble(eval_acc, (nusers, nitems));
    info!("eval rmse: {:.6}", WalsEngine::rmse(&eval_rows, &factors));

    // Batch top-K predictions for every user.
    let user_vocab = Arc::new(Vocabulary::from_file(
        &config.model.input_path.join("vocab_users"),
    )?);
    let item_vocab = Arc::new(Vocabulary::from_file(
        &config.model.input_path.join("vocab_items"),
    )?);
    let driver = BatchInferenceDriver::new(
        Arc::new(factors),
        user_vocab,
        item_vocab,
        config.model.topk,
    );
    let output = driver.run(&config.model.output_dir)?;
    info!("batch predictions written to {}", output.display());

    Ok(())
}
