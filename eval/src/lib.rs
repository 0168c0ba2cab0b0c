pub mod evaluator;

pub use evaluator::{evaluate_batch, evaluate_sample, BatchEvalReport};
