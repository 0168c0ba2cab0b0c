pub mod dependencies;
pub mod factory;
pub mod metrics;
pub mod pipeline;
pub mod strategies;
pub mod strategy;

pub use dependencies::Dependencies;
pub use factory::StrategyFactory;
pub use strategy::{Strategy, StrategyKind};
