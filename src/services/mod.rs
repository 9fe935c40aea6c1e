pub mod inference;
pub mod serving;
