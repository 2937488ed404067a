pub mod aggregator;
pub mod executor;
pub mod projector;
