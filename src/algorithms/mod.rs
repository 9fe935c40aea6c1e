pub mod initializer;
pub mod topk;
pub mod wals;

pub use topk::find_top_k;
pub use wals::{FactorizationEngine, WalsEngine};
